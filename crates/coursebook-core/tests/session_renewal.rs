mod common;

use std::time::Duration;

use chrono::Utc;
use coursebook_core::auth::{MemoryTokenStore, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use coursebook_core::{ApiError, Config, SessionState};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{bearer, config_for, jwt_expiring_in, wait_for, TestSession};

#[tokio::test]
async fn test_renew_replaces_access_token_only() {
    let server = MockServer::start().await;
    let renewed = jwt_expiring_in(3600, "renewed");

    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .and(body_json(json!({"refresh": "rt1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": renewed})))
        .expect(1)
        .mount(&server)
        .await;

    let session = TestSession::new(config_for(&server));
    session.manager.set_credentials(jwt_expiring_in(7200, "first"), "rt1");

    assert!(session.manager.renew().await);
    assert_eq!(session.manager.access_token().as_deref(), Some(renewed.as_str()));
    assert_eq!(session.manager.refresh_token().as_deref(), Some("rt1"));
    assert_eq!(
        session.store.load(ACCESS_TOKEN_KEY).unwrap().as_deref(),
        Some(renewed.as_str())
    );

    // Timer re-armed against the new expiry
    let fires_at = session.manager.pending_renewal_at().expect("timer should be re-armed");
    let expected = Utc::now() + chrono::Duration::seconds(3600 - 300);
    assert!((fires_at - expected).num_seconds().abs() <= 2);
    assert_eq!(session.manager.state(), SessionState::LoggedIn);
}

#[tokio::test]
async fn test_renew_failure_clears_session_and_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Token is invalid"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = TestSession::new(config_for(&server));
    session.manager.set_credentials(jwt_expiring_in(7200, "a"), "rt1");

    assert!(!session.manager.renew().await);
    assert!(!session.manager.is_authenticated());
    assert!(session.manager.pending_renewal_at().is_none());
    assert_eq!(session.store.load(ACCESS_TOKEN_KEY).unwrap(), None);
    assert_eq!(session.store.load(REFRESH_TOKEN_KEY).unwrap(), None);
    assert_eq!(session.navigator.routes(), vec!["/login".to_string()]);
}

#[tokio::test]
async fn test_renew_transport_failure_clears_session() {
    let config = Config {
        // Nothing listens on the discard port
        api_base_url: "http://127.0.0.1:9/api".to_string(),
        request_timeout_secs: 2,
        ..Config::default()
    };
    let session = TestSession::new(config);
    session.manager.set_credentials("a1", "rt1");

    assert!(!session.manager.renew().await);
    assert!(!session.manager.is_authenticated());
    assert_eq!(session.navigator.routes(), vec!["/login".to_string()]);
}

#[tokio::test]
async fn test_authenticated_request_propagates_transport_error() {
    let config = Config {
        api_base_url: "http://127.0.0.1:9/api".to_string(),
        request_timeout_secs: 2,
        ..Config::default()
    };
    let session = TestSession::new(config);
    session.manager.set_credentials(jwt_expiring_in(3600, "live"), "rt1");

    let request = session.manager.client().get("http://127.0.0.1:9/api/profile/");
    let err = session.manager.authenticated_request(request).await.unwrap_err();

    assert!(matches!(err, ApiError::NetworkError(_)));
    assert!(session.manager.is_authenticated());
    assert_eq!(session.manager.refresh_token().as_deref(), Some("rt1"));
    assert!(session.navigator.routes().is_empty());
}

#[tokio::test]
async fn test_renew_rejects_unparseable_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let session = TestSession::new(config_for(&server));
    session.manager.set_credentials("a1", "rt1");

    assert!(!session.manager.renew().await);
    assert!(!session.manager.is_authenticated());
}

#[tokio::test]
async fn test_timer_renews_before_expiry() {
    let server = MockServer::start().await;
    let renewed = jwt_expiring_in(3600, "renewed");

    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .and(body_json(json!({"refresh": "rt1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": renewed})))
        .expect(1)
        .mount(&server)
        .await;

    // Same timeline as a ten-minute token renewed five minutes in, shortened
    // so the token enters the lead window two seconds from now
    let session = TestSession::new(config_for(&server));
    session.manager.set_credentials(jwt_expiring_in(302, "short"), "rt1");
    assert!(session.manager.pending_renewal_at().is_some());

    let manager = session.manager.clone();
    let expected = renewed.clone();
    assert!(
        wait_for(Duration::from_secs(10), || {
            manager.access_token().as_deref() == Some(expected.as_str())
        })
        .await,
        "renewal timer never fired"
    );
    assert_eq!(session.manager.refresh_token().as_deref(), Some("rt1"));
}

#[tokio::test]
async fn test_no_timer_inside_renewal_window() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "x"})))
        .expect(0)
        .mount(&server)
        .await;

    let session = TestSession::new(config_for(&server));
    session.manager.set_credentials(jwt_expiring_in(299, "late"), "rt1");
    assert!(session.manager.pending_renewal_at().is_none());
    assert!(session.manager.renewal_due());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(session.manager.is_authenticated());
}

#[tokio::test]
async fn test_clear_cancels_pending_timer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "x"})))
        .expect(0)
        .mount(&server)
        .await;

    let session = TestSession::new(config_for(&server));
    session.manager.set_credentials(jwt_expiring_in(301, "soon"), "rt1");
    assert!(session.manager.pending_renewal_at().is_some());

    session.manager.clear_credentials();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!session.manager.is_authenticated());
}

#[tokio::test]
async fn test_restored_session_arms_timer() {
    let server = MockServer::start().await;
    let store = MemoryTokenStore::with_tokens(&jwt_expiring_in(3600, "stored"), "rt1");

    let session = TestSession::with_store(config_for(&server), store);
    assert!(session.manager.is_authenticated());
    assert!(session.manager.pending_renewal_at().is_some());
}

#[tokio::test]
async fn test_state_while_renewal_in_flight() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "a2"}))
                .set_delay(Duration::from_millis(400)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = TestSession::new(config_for(&server));
    session.manager.set_credentials("a1", "rt1");

    let manager = session.manager.clone();
    let renewal = tokio::spawn(async move { manager.renew().await });

    let manager = session.manager.clone();
    assert!(wait_for(Duration::from_secs(2), || manager.state() == SessionState::RenewalInFlight).await);

    assert!(renewal.await.unwrap());
    assert_eq!(session.manager.state(), SessionState::LoggedIn);
    assert_eq!(session.manager.access_token().as_deref(), Some("a2"));
}

#[tokio::test]
async fn test_authenticated_request_retries_once_after_401() {
    let server = MockServer::start().await;
    let old = jwt_expiring_in(3600, "old");
    let new = jwt_expiring_in(3600, "new");

    Mock::given(method("GET"))
        .and(path("/api/users/profile/"))
        .and(header("authorization", bearer(&old).as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/profile/"))
        .and(header("authorization", bearer(&new).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": new})))
        .expect(1)
        .mount(&server)
        .await;

    let session = TestSession::new(config_for(&server));
    session.manager.set_credentials(old, "rt1");

    let url = format!("{}/api/users/profile/", server.uri());
    let request = session.manager.client().get(&url);
    let response = session.manager.authenticated_request(request).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(session.manager.access_token().as_deref(), Some(new.as_str()));
}

#[tokio::test]
async fn test_authenticated_request_does_not_retry_twice() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/courses/enrolled/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "a2"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = TestSession::new(config_for(&server));
    session.manager.set_credentials("a1", "rt1");

    let url = format!("{}/api/courses/enrolled/", server.uri());
    let response = session
        .manager
        .authenticated_request(session.manager.client().get(&url))
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    // Renewal itself succeeded, so the session survives
    assert_eq!(session.manager.access_token().as_deref(), Some("a2"));
}

#[tokio::test]
async fn test_authenticated_request_returns_401_when_renewal_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/profile/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let session = TestSession::new(config_for(&server));
    session.manager.set_credentials("a1", "rt1");

    let url = format!("{}/api/users/profile/", server.uri());
    let response = session
        .manager
        .authenticated_request(session.manager.client().get(&url))
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert!(!session.manager.is_authenticated());
    assert_eq!(session.navigator.routes(), vec!["/login".to_string()]);
}

#[tokio::test]
async fn test_authenticated_request_replays_json_body() {
    let server = MockServer::start().await;
    let body = json!({"content_id": 4, "progress": 100});

    Mock::given(method("POST"))
        .and(path("/api/progress/update/"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/progress/update/"))
        .and(header("authorization", "Bearer a2"))
        .and(body_json(body.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"completed": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "a2"})))
        .mount(&server)
        .await;

    let session = TestSession::new(config_for(&server));
    session.manager.set_credentials("a1", "rt1");

    let url = format!("{}/api/progress/update/", server.uri());
    let request = session.manager.client().post(&url).json(&body);
    let response = session.manager.authenticated_request(request).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_concurrent_401s_share_one_renewal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/courses/enrolled/"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/courses/enrolled/"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "a2"}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = TestSession::new(config_for(&server));
    session.manager.set_credentials("a1", "rt1");

    let url = format!("{}/api/courses/enrolled/", server.uri());
    let requests = (0..3).map(|_| {
        let manager = session.manager.clone();
        let url = url.clone();
        async move {
            let request = manager.client().get(&url);
            manager.authenticated_request(request).await
        }
    });
    let responses = futures::future::join_all(requests).await;

    for response in responses {
        assert_eq!(response.unwrap().status(), 200);
    }
}

#[tokio::test]
async fn test_renewal_discarded_when_session_replaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "stale"}))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let session = TestSession::new(config_for(&server));
    session.manager.set_credentials("a1", "rt1");

    let manager = session.manager.clone();
    let renewal = tokio::spawn(async move { manager.renew().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A fresh login lands while the old renewal is still out
    session.manager.set_credentials("b1", "rt2");

    assert!(renewal.await.unwrap());
    assert_eq!(session.manager.access_token().as_deref(), Some("b1"));
    assert_eq!(session.manager.refresh_token().as_deref(), Some("rt2"));
}
