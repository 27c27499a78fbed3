//! 인증이 부착되는 공유 HTTP 요청 파이프라인.
//!
//! 요청 단계에서 저장된 접근 토큰을 bearer 자격증명으로 부착하고,
//! 응답 단계에서 401을 가로채 토큰 갱신 후 원 요청을 정확히 한 번
//! 재시도합니다. 갱신까지 실패하면 세션을 정리하고 로그인 리다이렉트
//! 정보를 담은 종결 에러를 반환합니다.

use std::sync::{Arc, RwLock};

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use medicore_core::routes::login_redirect;
use medicore_core::ApiConfig;

use crate::endpoints;
use crate::error::ApiError;
use crate::refresh::RefreshCoordinator;
use crate::storage::{KeyValueStorage, TokenStore, POST_LOGIN_REDIRECT_KEY};

/// MediCore REST API 클라이언트.
///
/// 내부 상태가 모두 `Arc`로 공유되므로 복제 비용이 낮고, 복제본은
/// 동일한 토큰 저장소와 갱신 코디네이터를 공유합니다.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: TokenStore,
    session_storage: Arc<dyn KeyValueStorage>,
    refresh: RefreshCoordinator,
    location: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    /// 새 API 클라이언트 생성.
    ///
    /// `durable_storage`에는 토큰이, `session_storage`에는 강제 로그아웃
    /// 시의 복원 경로가 저장됩니다.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ApiError::Network`를 반환합니다.
    pub fn new(
        config: &ApiConfig,
        durable_storage: Arc<dyn KeyValueStorage>,
        session_storage: Arc<dyn KeyValueStorage>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let tokens = TokenStore::new(durable_storage);
        let refresh = RefreshCoordinator::new(http.clone(), config.base_url.clone(), tokens.clone());

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            tokens,
            session_storage,
            refresh,
            location: Arc::new(RwLock::new(None)),
        })
    }

    /// 토큰 저장소 반환.
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// API 기본 URL 반환.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 갱신 코디네이터를 통해 접근 토큰 갱신.
    pub async fn refresh_access_token(&self) -> Result<String, ApiError> {
        self.refresh.refresh().await
    }

    /// 현재 화면 경로(경로+쿼리) 기록.
    ///
    /// 세션 만료 시 로그인 후 복원할 목적지로 사용됩니다.
    pub fn set_location(&self, full_path: &str) {
        let mut guard = self.location.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(full_path.to_string());
    }

    /// 기록된 현재 화면 경로 반환.
    pub fn current_location(&self) -> Option<String> {
        self.location
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 저장된 로그인 후 복원 경로를 꺼내고 삭제.
    pub fn take_post_login_redirect(&self) -> Option<String> {
        let value = self.session_storage.get(POST_LOGIN_REDIRECT_KEY);
        if value.is_some() {
            self.session_storage.remove(POST_LOGIN_REDIRECT_KEY);
        }
        value
    }

    /// 요청 실행 후 상태 코드와 응답 본문 반환.
    ///
    /// 401 응답은 토큰 엔드포인트가 아니고 아직 재시도하지 않은 경우에
    /// 한해 갱신 프로토콜을 거쳐 정확히 한 번 재시도됩니다. 그 외의 에러
    /// 상태는 그대로 호출자에게 전달되며, 응답 자체를 받지 못한 네트워크
    /// 에러는 갱신/리다이렉트 처리 없이 전파됩니다.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, String), ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .send_once(&method, &url, body, self.tokens.access())
            .await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED && !is_token_endpoint(path) {
            debug!("401 from {}, attempting token refresh", path);
            let token = match self.refresh.refresh().await {
                Ok(token) => token,
                Err(err) => {
                    warn!("Token refresh failed: {}", err);
                    return Err(self.expire_session());
                }
            };

            // 새 토큰으로 원 요청을 정확히 한 번 재시도
            let retry = self.send_once(&method, &url, body, Some(token)).await?;
            let retry_status = retry.status();
            if retry_status == StatusCode::UNAUTHORIZED {
                return Err(self.expire_session());
            }

            let retry_body = retry
                .text()
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;
            return Ok((retry_status, retry_body));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok((status, text))
    }

    /// GET 요청 후 JSON 응답 역직렬화.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request_json(Method::GET, path, None).await
    }

    /// JSON 본문과 함께 POST 요청 후 JSON 응답 역직렬화.
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Parse(e.to_string()))?;
        self.request_json(Method::POST, path, Some(value)).await
    }

    /// JSON 본문과 함께 PUT 요청 후 JSON 응답 역직렬화.
    pub async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Parse(e.to_string()))?;
        self.request_json(Method::PUT, path, Some(value)).await
    }

    /// JSON 본문과 함께 PATCH 요청 후 JSON 응답 역직렬화.
    pub async fn patch_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Parse(e.to_string()))?;
        self.request_json(Method::PATCH, path, Some(value)).await
    }

    /// DELETE 요청 (응답 본문 무시).
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let (status, body) = self.request(Method::DELETE, path, None).await?;
        if !status.is_success() {
            error!("API request failed: {} - {}", status, body);
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(())
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let (status, body) = self.request(method, path, body.as_ref()).await?;
        if !status.is_success() {
            error!("API request failed: {} - {}", status, body);
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        serde_json::from_str(&body)
            .map_err(|e| ApiError::Parse(format!("Failed to parse response: {}", e)))
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        token: Option<String>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self.http.request(method.clone(), url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))
    }

    /// 복구 불가능한 401 이후의 세션 정리.
    ///
    /// 현재 경로를 로그인 후 복원 대상으로 저장하고, 양쪽 토큰을 삭제한
    /// 뒤 로그인 리다이렉트 정보를 담은 종결 에러를 반환합니다.
    fn expire_session(&self) -> ApiError {
        let current = self.current_location();
        if let Some(path) = &current {
            self.session_storage.set(POST_LOGIN_REDIRECT_KEY, path);
        }
        self.tokens.clear();

        let next = login_redirect(current.as_deref());
        warn!("Session expired, redirecting to {}", next);
        ApiError::AuthenticationExpired { next }
    }
}

fn is_token_endpoint(path: &str) -> bool {
    path.starts_with(endpoints::TOKEN)
}
