//! 세션/인증 엔진의 에러 타입.

use thiserror::Error;

/// API 요청 및 세션 수명 주기 에러.
///
/// 갱신 코디네이터가 하나의 결과를 모든 대기자에게 복제 전달하므로
/// `Clone`이 필요합니다.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 네트워크/연결 에러 (응답을 받지 못함)
    #[error("Network error: {0}")]
    Network(String),

    /// 서버가 에러 상태 코드로 응답
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// 저장된 갱신 토큰 없음
    #[error("No refresh token available")]
    NoRefreshToken,

    /// 토큰 갱신 요청 실패
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// 세션 만료 (토큰 정리 완료, 로그인 화면으로 이동 필요)
    ///
    /// `next`는 원래 목적지가 인코딩된 로그인 경로입니다. 호출자는 이
    /// 에러를 "네비게이션으로 대체됨"으로 취급해야 합니다.
    #[error("Authentication expired, redirect to {next}")]
    AuthenticationExpired { next: String },

    /// 응답 본문 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ApiError {
    /// 인증 실패(401 계열)인지 확인.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            ApiError::Api { status: 401, .. } | ApiError::AuthenticationExpired { .. }
        )
    }

    /// 세션이 종료되어 더 이상 복구할 수 없는 에러인지 확인.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApiError::AuthenticationExpired { .. })
    }

    /// 응답을 받지 못한 네트워크 에러인지 확인.
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    /// HTTP 상태 코드 반환 (상태 코드가 있는 에러만).
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Parse(err.to_string())
    }
}
