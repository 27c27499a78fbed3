//! API 엔드포인트 경로.

/// 토큰 발급 (로그인).
pub const TOKEN: &str = "/api/token/";

/// 접근 토큰 갱신.
pub const TOKEN_REFRESH: &str = "/api/token/refresh/";

/// 현재 사용자 프로필 조회.
pub const ME: &str = "/api/auth/me/";
