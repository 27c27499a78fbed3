//! 네비게이션 가드.
//!
//! 모든 라우트 전환 전에 평가되어 허용/리다이렉트를 판정합니다. 세션
//! 상태와 대상 라우트의 메타데이터만 보고 결정하며, 먼저 일치하는
//! 리다이렉트 규칙이 우선합니다.

use std::sync::Arc;

use tracing::debug;

use medicore_core::routes::{find_route, login_redirect};
use medicore_core::Role;

use crate::session::SessionStore;

/// 라우트 전환 판정 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// 전환 허용
    Allow,
    /// 지정한 경로로 리다이렉트
    Redirect(String),
}

/// 라우트 전환 전 접근 판정을 내리는 가드.
pub struct NavigationGuard {
    session: Arc<SessionStore>,
}

impl NavigationGuard {
    /// 새 가드 생성.
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self { session }
    }

    /// 라우트 전환 전 판정.
    ///
    /// `to`는 쿼리를 포함한 대상 경로입니다. 판정 순서:
    ///
    /// 1. 접근 토큰 없이 갱신 토큰만 있으면 조용히 갱신 시도 (실패 무시)
    /// 2. 프로필이 없고 접근 토큰이 있으면 프로필 조회 시도 (실패 무시)
    /// 3. 인증 필요 라우트인데 접근 토큰이 없으면 원래 목적지를 담아
    ///    로그인으로 리다이렉트
    /// 4. 쓰기 역할 필요 라우트인데 쓰기 역할이 아니면 환자 목록으로
    /// 5. 역할 허용 목록에 현재 역할이 없으면 역할별 대시보드로
    /// 6. 그 외에는 허용
    pub async fn before_each(&self, to: &str) -> RouteDecision {
        let tokens = self.session.api().tokens().clone();

        if tokens.access().is_none() && tokens.refresh().is_some() {
            let _ = self.session.refresh_token().await;
        }

        if self.session.user().is_none() && tokens.access().is_some() {
            if let Err(err) = self.session.fetch_me().await {
                debug!("Profile fetch during navigation failed: {}", err);
            }
        }

        let meta = find_route(to).map(|route| route.meta);

        if meta.map_or(false, |m| m.auth) && tokens.access().is_none() {
            return RouteDecision::Redirect(login_redirect(Some(to)));
        }

        if meta.map_or(false, |m| m.write) && !self.session.has_write_role() {
            return RouteDecision::Redirect("/patients".to_string());
        }

        if let Some(allowed) = meta.and_then(|m| m.roles) {
            let role = self.session.user().map(|u| u.role);
            let permitted = role.map_or(false, |r| allowed.contains(&r));
            if !permitted {
                let target = match role {
                    Some(Role::Admin) => "/admin/dashboard",
                    Some(Role::Pharmacist) => "/pharmacist/dashboard",
                    _ => "/",
                };
                debug!("Role {:?} not allowed on {}, redirecting to {}", role, to, target);
                return RouteDecision::Redirect(target.to_string());
            }
        }

        self.session.api().set_location(to);
        RouteDecision::Allow
    }
}
