//! Integration tests for the 401 refresh-and-retry protocol.

use std::io::Write;
use std::sync::Arc;

use futures::future::join_all;
use mockito::Matcher;
use serde_json::json;

use medicore_client::storage::POST_LOGIN_REDIRECT_KEY;
use medicore_client::{ApiClient, ApiError, KeyValueStorage, MemoryStorage};
use medicore_core::ApiConfig;

fn client_for(server: &mockito::ServerGuard) -> (ApiClient, Arc<MemoryStorage>, Arc<MemoryStorage>) {
    let durable = Arc::new(MemoryStorage::new());
    let session_scoped = Arc::new(MemoryStorage::new());
    let config = ApiConfig::new(server.url());
    let api = ApiClient::new(&config, durable.clone(), session_scoped.clone())
        .expect("Failed to create API client");
    (api, durable, session_scoped)
}

#[tokio::test]
async fn test_transparent_refresh_retries_once() {
    let mut server = mockito::Server::new_async().await;
    let (api, _, _) = client_for(&server);
    api.tokens().set_access("stale");
    api.tokens().set_refresh("r1");

    let stale = server
        .mock("GET", "/api/patients/")
        .match_header("authorization", "Bearer stale")
        .with_status(401)
        .with_body(r#"{"detail":"token expired"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .match_body(Matcher::Json(json!({"refresh": "r1"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access":"fresh"}"#)
        .expect(1)
        .create_async()
        .await;
    let retried = server
        .mock("GET", "/api/patients/")
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let result: serde_json::Value = api.get_json("/api/patients/").await.unwrap();
    assert_eq!(result, json!([]));
    assert_eq!(api.tokens().access(), Some("fresh".to_string()));

    stale.assert_async().await;
    refresh.assert_async().await;
    retried.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_coordinator_calls_share_one_request() {
    let mut server = mockito::Server::new_async().await;
    let (api, _, _) = client_for(&server);
    api.tokens().set_refresh("r1");

    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access":"fresh"}"#)
        .expect(1)
        .create_async()
        .await;

    let results = join_all((0..16).map(|_| api.refresh_access_token())).await;
    for result in results {
        assert_eq!(result.unwrap(), "fresh");
    }

    refresh.assert_async().await;
    assert_eq!(api.tokens().access(), Some("fresh".to_string()));
}

#[tokio::test]
async fn test_concurrent_401_requests_share_one_refresh() {
    let n = 8;
    let mut server = mockito::Server::new_async().await;
    let (api, _, _) = client_for(&server);
    api.tokens().set_access("stale");
    api.tokens().set_refresh("r1");

    let stale = server
        .mock("GET", "/api/patients/")
        .match_header("authorization", "Bearer stale")
        .with_status(401)
        .with_body(r#"{"detail":"token expired"}"#)
        .expect(n)
        .create_async()
        .await;
    // 모든 401이 합류하도록 갱신 응답을 지연시킨다
    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_chunked_body(|writer| {
            std::thread::sleep(std::time::Duration::from_millis(300));
            writer.write_all(br#"{"access":"fresh"}"#)
        })
        .expect(1)
        .create_async()
        .await;
    let retried = server
        .mock("GET", "/api/patients/")
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .expect(n)
        .create_async()
        .await;

    let results =
        join_all((0..n).map(|_| api.get_json::<serde_json::Value>("/api/patients/"))).await;
    for result in results {
        assert!(result.is_ok(), "request should succeed after refresh: {:?}", result);
    }

    stale.assert_async().await;
    refresh.assert_async().await;
    retried.assert_async().await;
}

#[tokio::test]
async fn test_refresh_endpoint_401_passes_through() {
    let mut server = mockito::Server::new_async().await;
    let (api, _, _) = client_for(&server);
    api.tokens().set_access("stale");
    api.tokens().set_refresh("r1");

    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .with_status(401)
        .with_body(r#"{"detail":"Token is invalid or expired"}"#)
        .expect(1)
        .create_async()
        .await;

    let err = api
        .post_json::<serde_json::Value, _>("/api/token/refresh/", &json!({"refresh": "r1"}))
        .await
        .unwrap_err();

    // 토큰 엔드포인트의 401은 갱신 프로토콜을 타지 않고 그대로 전달된다
    assert_eq!(err.status(), Some(401));
    assert!(!err.is_terminal());

    refresh.assert_async().await;
}

#[tokio::test]
async fn test_retried_request_is_not_retried_twice() {
    let mut server = mockito::Server::new_async().await;
    let (api, _, _) = client_for(&server);
    api.tokens().set_access("stale");
    api.tokens().set_refresh("r1");

    let stale = server
        .mock("GET", "/api/patients/")
        .match_header("authorization", "Bearer stale")
        .with_status(401)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access":"fresh"}"#)
        .expect(1)
        .create_async()
        .await;
    let still_unauthorized = server
        .mock("GET", "/api/patients/")
        .match_header("authorization", "Bearer fresh")
        .with_status(401)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    let err = api
        .get_json::<serde_json::Value>("/api/patients/")
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::AuthenticationExpired { .. }));
    assert!(api.tokens().access().is_none());
    assert!(api.tokens().refresh().is_none());

    stale.assert_async().await;
    refresh.assert_async().await;
    still_unauthorized.assert_async().await;
}

#[tokio::test]
async fn test_refresh_failure_clears_session_and_builds_redirect() {
    let mut server = mockito::Server::new_async().await;
    let (api, _, session_scoped) = client_for(&server);
    api.tokens().set_access("stale");
    api.tokens().set_refresh("r1");
    api.set_location("/patients/new");

    let stale = server
        .mock("GET", "/api/patients/")
        .with_status(401)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .with_status(401)
        .with_body(r#"{"detail":"Token is blacklisted"}"#)
        .expect(1)
        .create_async()
        .await;

    let err = api
        .get_json::<serde_json::Value>("/api/patients/")
        .await
        .unwrap_err();

    match err {
        ApiError::AuthenticationExpired { next } => {
            assert_eq!(next, "/login?next=%2Fpatients%2Fnew");
        }
        other => panic!("expected AuthenticationExpired, got {:?}", other),
    }

    assert!(api.tokens().access().is_none());
    assert!(api.tokens().refresh().is_none());
    assert_eq!(
        session_scoped.get(POST_LOGIN_REDIRECT_KEY),
        Some("/patients/new".to_string())
    );

    stale.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_non_401_error_passes_through() {
    let mut server = mockito::Server::new_async().await;
    let (api, _, _) = client_for(&server);
    api.tokens().set_access("a1");
    api.tokens().set_refresh("r1");

    let failing = server
        .mock("GET", "/api/patients/")
        .with_status(500)
        .with_body("boom")
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .with_status(200)
        .with_body(r#"{"access":"fresh"}"#)
        .expect(0)
        .create_async()
        .await;

    let err = api
        .get_json::<serde_json::Value>("/api/patients/")
        .await
        .unwrap_err();

    match err {
        ApiError::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("expected Api error, got {:?}", other),
    }

    // 토큰은 그대로 유지된다
    assert_eq!(api.tokens().access(), Some("a1".to_string()));

    failing.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_network_error_passes_through_untouched() {
    let durable = Arc::new(MemoryStorage::new());
    let session_scoped = Arc::new(MemoryStorage::new());
    let config = ApiConfig::new("http://127.0.0.1:9").with_timeout(1);
    let api = ApiClient::new(&config, durable.clone(), session_scoped)
        .expect("Failed to create API client");
    api.tokens().set_access("a1");
    api.tokens().set_refresh("r1");

    let err = api
        .get_json::<serde_json::Value>("/api/patients/")
        .await
        .unwrap_err();

    assert!(err.is_network(), "expected network error, got {:?}", err);
    // 갱신/리다이렉트 처리 없이 전파되므로 토큰은 남아 있다
    assert_eq!(api.tokens().access(), Some("a1".to_string()));
    assert_eq!(api.tokens().refresh(), Some("r1".to_string()));
}

#[tokio::test]
async fn test_coordinator_returns_to_idle_after_failure() {
    let mut server = mockito::Server::new_async().await;
    let (api, _, _) = client_for(&server);
    api.tokens().set_refresh("r1");

    let failing = server
        .mock("POST", "/api/token/refresh/")
        .with_status(500)
        .with_body("oops")
        .expect(1)
        .create_async()
        .await;

    let err = api.refresh_access_token().await.unwrap_err();
    assert!(matches!(err, ApiError::RefreshFailed(_)));
    failing.assert_async().await;
    failing.remove_async().await;

    // 실패 후에도 코디네이터는 유휴 상태로 돌아와 즉시 재시도가 가능하다
    let succeeding = server
        .mock("POST", "/api/token/refresh/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access":"fresh"}"#)
        .expect(1)
        .create_async()
        .await;

    let token = api.refresh_access_token().await.unwrap();
    assert_eq!(token, "fresh");
    succeeding.assert_async().await;
}

#[tokio::test]
async fn test_coordinator_returns_to_idle_after_success() {
    let mut server = mockito::Server::new_async().await;
    let (api, _, _) = client_for(&server);
    api.tokens().set_refresh("r1");

    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access":"fresh"}"#)
        .expect(2)
        .create_async()
        .await;

    api.refresh_access_token().await.unwrap();
    api.refresh_access_token().await.unwrap();

    refresh.assert_async().await;
}
