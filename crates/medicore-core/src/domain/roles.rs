//! 역할 기반 접근 제어 (RBAC).
//!
//! 서버가 내려주는 사용자 역할과 각 역할의 권한 판정을 정의합니다.

use serde::{Deserialize, Serialize};

/// 사용자 역할.
///
/// 서버의 사용자 모델과 동일한 역할 집합입니다. 와이어 형식은
/// SCREAMING_SNAKE_CASE 문자열입니다 (예: `"LAB_TECH"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// 관리자
    Admin,
    /// 의사
    Doctor,
    /// 검사실 기사
    LabTech,
    /// 약사
    Pharmacist,
    /// 재무 담당
    Finance,
    /// 환자
    Patient,
}

impl Role {
    /// 쓰기 작업(환자 등록, 처방 작성 등)이 허용된 역할인지 확인.
    pub fn can_write(&self) -> bool {
        matches!(
            self,
            Role::Admin | Role::Doctor | Role::LabTech | Role::Pharmacist
        )
    }

    /// 이 역할의 기본 대시보드 경로 반환.
    ///
    /// 역할 전용 대시보드가 없는 역할은 내 정보 화면으로 보냅니다.
    pub fn dashboard_path(&self) -> &'static str {
        match self {
            Role::Admin => "/admin/dashboard",
            Role::Pharmacist => "/pharmacist/dashboard",
            Role::Doctor => "/patients",
            Role::Finance => "/finance",
            Role::LabTech | Role::Patient => "/me",
        }
    }

    /// 이 역할의 표시 이름 반환.
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Doctor => "Doctor",
            Role::LabTech => "Lab Tech",
            Role::Pharmacist => "Pharmacist",
            Role::Finance => "Finance",
            Role::Patient => "Patient",
        }
    }

    /// 문자열에서 역할 파싱 (대소문자 무시).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "DOCTOR" => Some(Role::Doctor),
            "LAB_TECH" => Some(Role::LabTech),
            "PHARMACIST" => Some(Role::Pharmacist),
            "FINANCE" => Some(Role::Finance),
            "PATIENT" => Some(Role::Patient),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Admin => "ADMIN",
            Role::Doctor => "DOCTOR",
            Role::LabTech => "LAB_TECH",
            Role::Pharmacist => "PHARMACIST",
            Role::Finance => "FINANCE",
            Role::Patient => "PATIENT",
        };
        write!(f, "{}", s)
    }
}
