//! 세션 스토어.
//!
//! 현재 사용자 프로필과 인증 상태를 보유하고 로그인/로그아웃/프로필
//! 조회를 수행합니다. 토큰은 저장소 기반 [`TokenStore`]가 단일 진실
//! 공급원이므로 여기서는 별도로 복제 보관하지 않습니다.
//!
//! [`TokenStore`]: crate::storage::TokenStore

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use medicore_core::UserProfile;

use crate::endpoints;
use crate::error::ApiError;
use crate::http::ApiClient;

#[derive(Debug, Clone, Default)]
struct SessionState {
    user: Option<UserProfile>,
    loading: bool,
    error: Option<String>,
}

/// 세션 스토어.
///
/// 상태 변경은 이 스토어의 작업을 통해서만 일어납니다. 저장된 접근
/// 토큰이 없으면 캐시된 프로필과 무관하게 비인증 상태로 취급합니다.
pub struct SessionStore {
    api: ApiClient,
    state: RwLock<SessionState>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenPairResponse {
    access: String,
    refresh: String,
}

/// 서버 에러 응답 본문 (DRF 형식).
#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    non_field_errors: Option<Vec<String>>,
}

impl SessionStore {
    /// 주어진 API 클라이언트 위에 세션 스토어 생성.
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            state: RwLock::new(SessionState::default()),
        }
    }

    /// 내부 API 클라이언트 반환.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// 사용자 이름과 비밀번호로 로그인.
    ///
    /// 성공 시 양쪽 토큰을 저장하고 프로필을 조회합니다. 실패 시 HTTP
    /// 상태에 따라 분류된 사용자용 에러 메시지를 스토어에 남기고 false를
    /// 반환하며, 호출자에게 에러를 던지지 않습니다.
    pub async fn login(&self, username: &str, password: &str) -> bool {
        self.with_state(|s| {
            s.loading = true;
            s.error = None;
        });

        let result = self.login_inner(username, password).await;
        let ok = match result {
            Ok(()) => {
                info!("Login succeeded for {}", username);
                true
            }
            Err(err) => {
                warn!("Login failed: {}", err);
                self.with_state(|s| s.error = Some(login_error_message(&err)));
                false
            }
        };

        self.with_state(|s| s.loading = false);
        ok
    }

    async fn login_inner(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let pair: TokenPairResponse = self
            .api
            .post_json(endpoints::TOKEN, &LoginRequest { username, password })
            .await?;

        self.api.tokens().set_access(&pair.access);
        self.api.tokens().set_refresh(&pair.refresh);

        self.fetch_me().await?;
        Ok(())
    }

    /// 접근 토큰 갱신.
    ///
    /// 갱신 실패 시 로컬 세션을 완전히 정리(`logout`)하고 false를
    /// 반환합니다. 저장된 갱신 토큰이 없으면 정리 없이 false만 반환합니다.
    pub async fn refresh_token(&self) -> bool {
        match self.api.refresh_access_token().await {
            Ok(_) => true,
            Err(ApiError::NoRefreshToken) => false,
            Err(err) => {
                debug!("Session refresh failed: {}", err);
                self.logout();
                false
            }
        }
    }

    /// 현재 사용자 프로필 조회.
    ///
    /// 인증 실패 시 한 번의 토큰 갱신과 재조회를 시도하고, 그래도
    /// 실패하면 캐시된 프로필을 비우고 에러를 다시 던집니다.
    pub async fn fetch_me(&self) -> Result<UserProfile, ApiError> {
        match self.api.get_json::<UserProfile>(endpoints::ME).await {
            Ok(user) => {
                self.with_state(|s| s.user = Some(user.clone()));
                Ok(user)
            }
            Err(err) if err.is_unauthorized() => {
                if self.refresh_token().await {
                    match self.api.get_json::<UserProfile>(endpoints::ME).await {
                        Ok(user) => {
                            self.with_state(|s| s.user = Some(user.clone()));
                            Ok(user)
                        }
                        Err(retry_err) => {
                            self.with_state(|s| s.user = None);
                            Err(retry_err)
                        }
                    }
                } else {
                    self.with_state(|s| s.user = None);
                    Err(err)
                }
            }
            Err(err) => {
                self.with_state(|s| s.user = None);
                Err(err)
            }
        }
    }

    /// 로컬 세션 정리.
    ///
    /// 프로필과 양쪽 토큰을 메모리/저장소에서 모두 삭제합니다. 멱등.
    pub fn logout(&self) {
        self.with_state(|s| s.user = None);
        self.api.tokens().clear();
        debug!("Session cleared");
    }

    /// 현재 사용자가 쓰기 가능 역할인지 확인.
    pub fn has_write_role(&self) -> bool {
        self.read_state(|s| s.user.as_ref().map(|u| u.role.can_write()).unwrap_or(false))
    }

    /// 캐시된 사용자 프로필 반환.
    pub fn user(&self) -> Option<UserProfile> {
        self.read_state(|s| s.user.clone())
    }

    /// 마지막 로그인 시도의 에러 메시지 반환.
    pub fn error(&self) -> Option<String> {
        self.read_state(|s| s.error.clone())
    }

    /// 로그인 진행 중 여부 반환.
    pub fn is_loading(&self) -> bool {
        self.read_state(|s| s.loading)
    }

    /// 저장된 접근 토큰이 있는지 확인.
    pub fn is_authenticated(&self) -> bool {
        self.api.tokens().access().is_some()
    }

    /// 강제 로그아웃 시 저장된 복원 경로를 꺼내고 삭제.
    pub fn take_post_login_redirect(&self) -> Option<String> {
        self.api.take_post_login_redirect()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    fn read_state<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }
}

/// 로그인 실패를 HTTP 상태에 따라 사용자용 메시지로 분류.
fn login_error_message(err: &ApiError) -> String {
    match err {
        ApiError::Api {
            status: 400,
            message,
        } => server_detail(message).unwrap_or_else(|| "Invalid username or password".to_string()),
        ApiError::Api { status: 401, .. } => "Invalid credentials".to_string(),
        ApiError::Network(_) => {
            "Cannot connect to server. Please check your connection.".to_string()
        }
        ApiError::Api { message, .. } => {
            server_detail(message).unwrap_or_else(|| "Login failed. Please try again.".to_string())
        }
        _ => "Login failed. Please try again.".to_string(),
    }
}

/// 서버 에러 본문에서 사람이 읽을 메시지 추출.
fn server_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    if let Some(detail) = parsed.detail {
        return Some(detail);
    }
    parsed
        .non_field_errors
        .and_then(|errors| errors.into_iter().next())
}
