//! API 엔드포인트 설정.
//!
//! API 기본 URL과 요청 타임아웃을 환경 변수에서 로드합니다.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// 환경 변수가 없을 때 사용하는 기본 API 주소.
pub const FALLBACK_API_BASE: &str = "https://medicore-e9xf.onrender.com";

/// 기본 요청 타임아웃 (초).
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// API 클라이언트 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// REST API 기본 URL (스킴 포함, 후행 슬래시 없음)
    pub base_url: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: FALLBACK_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ApiConfig {
    /// 새로운 API 설정 생성.
    ///
    /// 전달된 URL은 [`normalize_base_url`]로 정규화됩니다.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// 요청 타임아웃 설정.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// 환경 변수에서 설정 생성.
    ///
    /// # 환경 변수
    /// - `MEDICORE_API_BASE`: API 기본 URL (없으면 기본 주소 사용)
    /// - `MEDICORE_API_TIMEOUT_SECS`: 요청 타임아웃 (기본값: 30)
    pub fn from_env() -> Self {
        let base_url = match std::env::var("MEDICORE_API_BASE") {
            Ok(raw) if !raw.trim().is_empty() => normalize_base_url(&raw),
            _ => {
                warn!(
                    "MEDICORE_API_BASE is not set, falling back to {}",
                    FALLBACK_API_BASE
                );
                FALLBACK_API_BASE.to_string()
            }
        };

        let timeout_secs = std::env::var("MEDICORE_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            base_url,
            timeout_secs,
        }
    }
}

/// API 기본 URL 정규화.
///
/// 스킴이 없으면 `https://`를 앞에 붙이고, 후행 슬래시를 제거합니다.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        warn!("API base URL missing scheme, assuming https://");
        format!("https://{}", trimmed)
    };
    with_scheme.trim_end_matches('/').to_string()
}
