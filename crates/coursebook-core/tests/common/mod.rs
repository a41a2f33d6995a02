//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use coursebook_core::auth::{MemoryTokenStore, RecordingNavigator, SessionManager};
use coursebook_core::Config;
use wiremock::MockServer;

/// Unsigned JWT-shaped token whose `exp` is `secs` from now. `tag` keeps
/// tokens with the same expiry distinguishable.
pub fn jwt_expiring_in(secs: i64, tag: &str) -> String {
    let payload = format!(
        r#"{{"exp":{},"jti":"{}"}}"#,
        Utc::now().timestamp() + secs,
        tag
    );
    format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", URL_SAFE_NO_PAD.encode(payload))
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

pub fn config_for(server: &MockServer) -> Config {
    Config {
        api_base_url: format!("{}/api", server.uri()),
        request_timeout_secs: 5,
        ..Config::default()
    }
}

pub struct TestSession {
    pub manager: SessionManager,
    pub navigator: Arc<RecordingNavigator>,
    pub store: Arc<MemoryTokenStore>,
}

impl TestSession {
    pub fn new(config: Config) -> Self {
        Self::with_store(config, MemoryTokenStore::new())
    }

    pub fn with_store(config: Config, store: MemoryTokenStore) -> Self {
        let store = Arc::new(store);
        let navigator = Arc::new(RecordingNavigator::new());
        let manager = SessionManager::new(config, store.clone(), navigator.clone())
            .expect("Failed to build session manager");
        Self {
            manager,
            navigator,
            store,
        }
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
