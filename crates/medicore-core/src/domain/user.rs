//! 사용자 프로필.

use serde::{Deserialize, Serialize};

use super::Role;

/// 현재 로그인한 사용자의 프로필.
///
/// `GET /api/auth/me/` 응답의 와이어 형식입니다. 필드 구성은 서버가
/// 정의하며, 가드 로직이 검사하는 필드는 `role`뿐입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// 사용자 ID
    pub id: i64,
    /// 로그인 아이디
    pub username: String,
    /// 이메일
    #[serde(default)]
    pub email: String,
    /// 이름
    #[serde(default)]
    pub first_name: String,
    /// 성
    #[serde(default)]
    pub last_name: String,
    /// 사용자 역할
    pub role: Role,
    /// 최초 로그인 시 비밀번호 변경 필요 여부
    #[serde(default)]
    pub password_change_required: bool,
}
