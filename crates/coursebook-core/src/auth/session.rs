use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::claims::{decode_claims, AccessClaims};
use super::navigator::Navigator;
use super::store::{TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::api::ApiError;
use crate::config::Config;

/// Renewal endpoint, relative to the API base URL
const REFRESH_PATH: &str = "/token/refresh/";

/// Access/refresh credential pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggedIn,
    RenewalInFlight,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
}

type RenewalFuture = Shared<BoxFuture<'static, bool>>;

struct PendingRenewal {
    generation: u64,
    fires_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

struct Inner {
    config: Config,
    client: Client,
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    tokens: Mutex<Option<TokenPair>>,
    timer: Mutex<Option<PendingRenewal>>,
    timer_generation: AtomicU64,
    renewal: Mutex<Option<RenewalFuture>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(pending) = lock(&self.timer).take() {
            pending.handle.abort();
        }
    }
}

/// Poisoning only means another thread panicked mid-update of plain data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Owns the token pair for one user session.
///
/// Clone is cheap and every clone refers to the same session, so one
/// manager is built at startup and handed to whatever needs authenticated
/// calls. The manager keeps at most one renewal timer alive and shares a
/// single in-flight renewal between concurrent callers.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a manager with its own HTTP client and restore any tokens
    /// already in `store`.
    pub fn new(
        config: Config,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(config, client, store, navigator))
    }

    /// Like [`SessionManager::new`] but sharing an existing connection pool.
    pub fn with_client(
        config: Config,
        client: Client,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let manager = Self {
            inner: Arc::new(Inner {
                config,
                client,
                store,
                navigator,
                tokens: Mutex::new(None),
                timer: Mutex::new(None),
                timer_generation: AtomicU64::new(0),
                renewal: Mutex::new(None),
            }),
        };
        manager.restore();
        manager
    }

    /// Load the stored pair; a half-present pair is discarded.
    fn restore(&self) {
        let access = self.load_key(ACCESS_TOKEN_KEY);
        let refresh = self.load_key(REFRESH_TOKEN_KEY);

        match (access, refresh) {
            (Some(access), Some(refresh)) => {
                debug!("Restored session from token store");
                *lock(&self.inner.tokens) = Some(TokenPair { access, refresh });
                self.schedule_renewal();
            }
            (None, None) => debug!("No stored session"),
            _ => {
                warn!("Token store holds an incomplete pair, discarding it");
                self.remove_stored();
            }
        }
    }

    fn load_key(&self, key: &str) -> Option<String> {
        match self.inner.store.load(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(error = %e, key, "Failed to read token store");
                None
            }
        }
    }

    fn remove_stored(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.inner.store.remove(key) {
                warn!(error = %e, key, "Failed to remove token from store");
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The underlying HTTP client, for building requests to pass to
    /// [`SessionManager::authenticated_request`].
    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    // ===== Credentials =====

    /// Store a new pair in memory and in the token store, then re-arm the
    /// renewal timer. Storage failures are logged and otherwise ignored.
    ///
    /// An empty token counts as absent, so a pair with one clears the session.
    pub fn set_credentials(&self, access: impl Into<String>, refresh: impl Into<String>) {
        let pair = TokenPair {
            access: access.into(),
            refresh: refresh.into(),
        };
        if pair.access.is_empty() || pair.refresh.is_empty() {
            warn!("Ignoring credentials with an empty token, clearing session");
            self.clear_credentials();
            return;
        }

        for (key, value) in [(ACCESS_TOKEN_KEY, &pair.access), (REFRESH_TOKEN_KEY, &pair.refresh)] {
            if let Err(e) = self.inner.store.save(key, value) {
                warn!(error = %e, key, "Failed to persist token");
            }
        }
        *lock(&self.inner.tokens) = Some(pair);
        info!("Session credentials updated");

        self.schedule_renewal();
    }

    /// Forget both tokens and cancel any pending renewal. Safe to call when
    /// already logged out.
    pub fn clear_credentials(&self) {
        self.cancel_timer();
        let had_tokens = lock(&self.inner.tokens).take().is_some();
        self.remove_stored();
        if had_tokens {
            info!("Session credentials cleared");
        }
    }

    pub fn access_token(&self) -> Option<String> {
        lock(&self.inner.tokens).as_ref().map(|t| t.access.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        lock(&self.inner.tokens).as_ref().map(|t| t.refresh.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        lock(&self.inner.tokens).is_some()
    }

    pub fn state(&self) -> SessionState {
        if !self.is_authenticated() {
            SessionState::LoggedOut
        } else if lock(&self.inner.renewal).is_some() {
            SessionState::RenewalInFlight
        } else {
            SessionState::LoggedIn
        }
    }

    /// Claims of the current access token, if it has decodable ones.
    pub fn claims(&self) -> Option<AccessClaims> {
        self.access_token().as_deref().and_then(decode_claims)
    }

    /// Minutes left before the access token expires (for display)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        let expires_at = self.claims()?.expires_at()?;
        Some((expires_at - Utc::now()).num_minutes().max(0))
    }

    /// True when a token is held but no timer can be armed for it because
    /// its expiry is unknown or already inside the lead window.
    pub fn renewal_due(&self) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        self.claims()
            .and_then(|c| c.renewal_delay(Utc::now(), self.inner.config.renewal_lead()))
            .is_none()
    }

    /// Clear the session and go back to the home route.
    pub fn logout(&self) {
        self.clear_credentials();
        self.inner.navigator.redirect(&self.inner.config.home_route);
    }

    /// Redirect to the login route unless a session exists.
    pub fn require_auth(&self) -> bool {
        let authenticated = self.is_authenticated();
        if !authenticated {
            self.inner.navigator.redirect(&self.inner.config.login_route);
        }
        authenticated
    }

    // ===== Renewal timer =====

    /// When the pending renewal timer will fire, if one is armed.
    pub fn pending_renewal_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.inner.timer).as_ref().map(|p| p.fires_at)
    }

    fn cancel_timer(&self) {
        if let Some(pending) = lock(&self.inner.timer).take() {
            debug!(fires_at = %pending.fires_at, "Cancelling pending renewal");
            pending.handle.abort();
        }
    }

    /// Replace any pending timer with one that renews `lead` before the
    /// current access token expires.
    ///
    /// Nothing is armed when the token has no expiry claim or is already
    /// inside the lead window; no immediate renewal is forced in that case.
    pub fn schedule_renewal(&self) {
        self.cancel_timer();

        let Some(access) = self.access_token() else {
            return;
        };
        let Some(claims) = decode_claims(&access) else {
            debug!("Access token claims not decodable, renewal not scheduled");
            return;
        };
        let now = Utc::now();
        let Some(delay) = claims.renewal_delay(now, self.inner.config.renewal_lead()) else {
            warn!(exp = ?claims.exp, "Access token inside renewal window, renewal not scheduled");
            return;
        };
        let Some(fires_at) = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
        else {
            warn!(exp = ?claims.exp, "Access token expiry out of range, renewal not scheduled");
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, renewal not scheduled");
            return;
        };

        let generation = self.inner.timer_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let weak = Arc::downgrade(&self.inner);

        // Held until the slot is filled so the task cannot fire into an empty slot
        let mut slot = lock(&self.inner.timer);
        let handle = runtime.spawn(Self::renewal_timer(weak, generation, delay));
        let replaced = slot.replace(PendingRenewal {
            generation,
            fires_at,
            handle,
        });
        if let Some(old) = replaced {
            old.handle.abort();
        }
        debug!(%fires_at, delay_secs = delay.as_secs(), "Renewal scheduled");
    }

    async fn renewal_timer(weak: Weak<Inner>, generation: u64, delay: Duration) {
        tokio::time::sleep(delay).await;

        let Some(inner) = weak.upgrade() else {
            return;
        };
        {
            let mut slot = lock(&inner.timer);
            match slot.as_ref() {
                Some(pending) if pending.generation == generation => {
                    // Detach ourselves so the reschedule after renewal doesn't abort this task
                    slot.take();
                }
                _ => return,
            }
        }

        info!("Renewal timer fired");
        let manager = SessionManager { inner };
        manager.renew().await;
    }

    // ===== Renewal =====

    /// Exchange the refresh token for a new access token.
    ///
    /// On success only the access token changes and the timer is re-armed.
    /// On failure the session is cleared and the user is sent to the login
    /// route. Concurrent callers share one request and one result.
    pub async fn renew(&self) -> bool {
        let renewal = {
            let mut slot = lock(&self.inner.renewal);
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!("Joining in-flight renewal");
                    in_flight.clone()
                }
                None => {
                    let renewal = Self::run_renewal(Arc::downgrade(&self.inner))
                        .boxed()
                        .shared();
                    *slot = Some(renewal.clone());
                    renewal
                }
            }
        };
        renewal.await
    }

    /// Body of the shared renewal future. Only a weak reference is held
    /// across the network call, so an abandoned renewal cannot keep the
    /// session alive.
    async fn run_renewal(weak: Weak<Inner>) -> bool {
        let Some(inner) = weak.upgrade() else {
            return false;
        };
        let client = inner.client.clone();
        let url = inner.config.endpoint(REFRESH_PATH);
        let refresh = lock(&inner.tokens).as_ref().map(|t| t.refresh.clone());
        drop(inner);

        let result = match refresh.as_deref() {
            Some(refresh) => Self::request_access_token(&client, &url, refresh).await,
            None => Err(ApiError::RenewalFailed("no refresh token".to_string())),
        };

        let Some(inner) = weak.upgrade() else {
            return false;
        };
        lock(&inner.renewal).take();
        SessionManager { inner }.finish_renewal(refresh, result)
    }

    fn finish_renewal(&self, used_refresh: Option<String>, result: Result<String, ApiError>) -> bool {
        let current_refresh = self.refresh_token();
        if current_refresh != used_refresh {
            // Credentials were replaced or cleared while the request was out
            debug!("Session changed during renewal, discarding result");
            return self.is_authenticated();
        }

        match result {
            Ok(access) => {
                info!("Access token renewed");
                let refresh = current_refresh.unwrap_or_default();
                self.set_credentials(access, refresh);
                true
            }
            Err(e) => {
                error!(error = %e, "Token renewal failed, logging out");
                self.clear_credentials();
                self.inner.navigator.redirect(&self.inner.config.login_route);
                false
            }
        }
    }

    async fn request_access_token(client: &Client, url: &str, refresh: &str) -> Result<String, ApiError> {
        let response = client
            .post(url)
            .json(&RefreshRequest { refresh })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::RenewalFailed(
                ApiError::from_status(status, &body).to_string(),
            ));
        }

        let parsed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("renewal response: {}", e)))?;
        if parsed.access.is_empty() {
            return Err(ApiError::InvalidResponse("renewal returned an empty access token".to_string()));
        }
        Ok(parsed.access)
    }

    // ===== Authenticated requests =====

    /// Send `request` with the current bearer token.
    ///
    /// A 401 triggers one renewal; if it succeeds the request is sent once
    /// more with the new token and that response is returned whatever its
    /// status. Requests whose body cannot be cloned are not retried.
    pub async fn authenticated_request(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let token = self.access_token().ok_or(ApiError::Unauthenticated)?;
        let retry = request.try_clone();

        let response = Self::send_with_token(request, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(url = %response.url(), "Got 401, renewing access token");
        let Some(retry) = retry else {
            warn!("Request cannot be replayed, returning 401");
            return Ok(response);
        };
        if !self.renew().await {
            return Ok(response);
        }
        let Some(token) = self.access_token() else {
            return Ok(response);
        };

        Self::send_with_token(retry, &token).await
    }

    async fn send_with_token(request: RequestBuilder, token: &str) -> Result<Response, ApiError> {
        request.bearer_auth(token).send().await.map_err(|e| {
            error!(error = %e, "Authenticated request failed");
            ApiError::NetworkError(e)
        })
    }
}
