//! 접근 토큰 갱신 코디네이터.
//!
//! 시스템 전체에서 동시에 진행 중인 갱신 네트워크 요청이 최대 1개임을
//! 보장합니다. 여러 요청이 동시에 401을 받아도 모든 호출자는 동일한
//! 진행 중 결과를 기다리며, 서버가 갱신 토큰을 1회용으로 무효화하는
//! 경우에도 토큰 소모가 중복되지 않습니다.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::endpoints;
use crate::error::ApiError;
use crate::storage::TokenStore;

type InFlightRefresh = Shared<BoxFuture<'static, Result<String, ApiError>>>;

/// 단일 비행(single-flight) 토큰 갱신 코디네이터.
///
/// 상태 기계: `IDLE → REFRESHING → IDLE`. 진행 중 마커는 갱신이
/// 성공하든 실패하든 결과 확정 직전에 해제되므로, 실패한 갱신이
/// 코디네이터를 영구히 잠그는 일은 없습니다.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<RefreshInner>,
}

struct RefreshInner {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
    in_flight: Mutex<Option<InFlightRefresh>>,
}

impl RefreshCoordinator {
    /// 새 코디네이터 생성.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, tokens: TokenStore) -> Self {
        Self {
            inner: Arc::new(RefreshInner {
                http,
                base_url: base_url.into(),
                tokens,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// 접근 토큰 갱신.
    ///
    /// 이미 진행 중인 갱신이 있으면 그 결과를 함께 기다립니다. 저장된
    /// 갱신 토큰이 없으면 네트워크 호출 없이 즉시 실패합니다.
    ///
    /// # Errors
    /// - [`ApiError::NoRefreshToken`]: 저장된 갱신 토큰 없음
    /// - [`ApiError::RefreshFailed`]: 서버가 갱신을 거부함
    /// - [`ApiError::Network`]: 응답을 받지 못함
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let pending = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.as_ref() {
                Some(pending) => {
                    debug!("Joining in-flight token refresh");
                    pending.clone()
                }
                None => {
                    if self.inner.tokens.refresh().is_none() {
                        debug!("Refresh requested but no refresh token is stored");
                        return Err(ApiError::NoRefreshToken);
                    }

                    let inner = Arc::clone(&self.inner);
                    let pending = async move {
                        let result = inner.request_new_access_token().await;
                        // 성공/실패와 무관하게 마커 해제
                        *inner.in_flight.lock().await = None;
                        result
                    }
                    .boxed()
                    .shared();

                    *in_flight = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }
}

impl RefreshInner {
    async fn request_new_access_token(&self) -> Result<String, ApiError> {
        let refresh_token = match self.tokens.refresh() {
            Some(token) => token,
            None => return Err(ApiError::NoRefreshToken),
        };

        info!("Refreshing access token...");

        #[derive(Serialize)]
        struct RefreshRequest {
            refresh: String,
        }

        #[derive(Deserialize)]
        struct RefreshResponse {
            access: String,
        }

        let url = format!("{}{}", self.base_url, endpoints::TOKEN_REFRESH);
        let response = self
            .http
            .post(&url)
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            error!("Token refresh failed: {} - {}", status, body);
            return Err(ApiError::RefreshFailed(format!(
                "{}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: RefreshResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::Parse(format!("Failed to parse refresh response: {}", e)))?;

        self.tokens.set_access(&parsed.access);
        info!("Access token refreshed");

        Ok(parsed.access)
    }
}
