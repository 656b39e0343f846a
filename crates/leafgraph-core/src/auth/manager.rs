//! Session orchestration: login, logout, startup refresh and the refresh timer.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::AuthError;
use super::session::SessionDescriptor;
use super::state::{AuthState, SessionPhase};
use super::store::TokenStore;
use super::{now_ms, token};
use crate::api::{ApiClient, ApiError, Auth, TokenRefresher};
use crate::config::{ClientConfig, CredentialMode};
use crate::models::{LoginData, LoginRequest, RefreshData, RefreshRequest, User};
use crate::storage::KeyValueStore;

const LOGIN_ENDPOINT: &str = "/auth/login";
const REFRESH_ENDPOINT: &str = "/auth/refresh";
const LOGOUT_ENDPOINT: &str = "/auth/logout";
const CURRENT_USER_ENDPOINT: &str = "/users/me";

type SharedRefresh = Shared<BoxFuture<'static, bool>>;

/// Milliseconds until the refresh timer should fire for a token expiring at
/// `expiry_ms`. Zero or negative means "refresh now".
pub fn refresh_delay_ms(expiry_ms: i64, now_ms: i64, margin_ms: i64) -> i64 {
    expiry_ms.saturating_sub(now_ms).saturating_sub(margin_ms)
}

/// The client-side session.
///
/// Clone is cheap; all clones drive the same session. Dropping the last
/// clone cancels the refresh timer.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

struct RefreshTimer {
    handle: JoinHandle<()>,
    fires_at_ms: i64,
}

struct SessionInner {
    config: ClientConfig,
    tokens: Arc<TokenStore>,
    api: ApiClient,
    state: watch::Sender<AuthState>,
    // Bumped on every teardown and every new login. Work started under an
    // older generation must not touch the current session.
    generation: Mutex<u64>,
    refresh_in_flight: Mutex<Option<SharedRefresh>>,
    timer: Mutex<Option<RefreshTimer>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AuthSession {
    pub fn new(config: ClientConfig, storage: Arc<dyn KeyValueStore>) -> Result<Self, ApiError> {
        let http = ApiClient::http_client(&config)?;
        Ok(Self::with_http_client(config, storage, http))
    }

    /// Create a session around an existing `reqwest::Client`.
    pub fn with_http_client(config: ClientConfig, storage: Arc<dyn KeyValueStore>, http: reqwest::Client) -> Self {
        let tokens = Arc::new(TokenStore::new(storage));
        let api = ApiClient::with_client(&config, tokens.clone(), http);
        let (state, _) = watch::channel(AuthState::default());

        let inner = Arc::new(SessionInner {
            config,
            tokens,
            api,
            state,
            generation: Mutex::new(0),
            refresh_in_flight: Mutex::new(None),
            timer: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let refresher: Weak<dyn TokenRefresher> = weak;
        inner.api.set_refresher(refresher);

        Self { inner }
    }

    // ===== Accessors =====

    /// Client for protected calls made on behalf of this session.
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.inner.tokens
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Receive every state change. This is the channel UI collaborators
    /// observe instead of reaching into shared globals.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.borrow().phase
    }

    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated
    }

    pub fn clear_error(&self) {
        self.inner.state.send_if_modified(|s| s.error.take().is_some());
    }

    /// When the armed refresh timer fires, in milliseconds since the epoch.
    pub fn next_refresh_at(&self) -> Option<i64> {
        lock(&self.inner.timer)
            .as_ref()
            .filter(|t| !t.handle.is_finished())
            .map(|t| t.fires_at_ms)
    }

    // ===== Lifecycle =====

    /// Resolve the startup phase. Runs once; later calls wait for the first
    /// one to settle and return its outcome.
    pub async fn initialize(&self) -> SessionPhase {
        let mut first = false;
        self.inner.state.send_if_modified(|s| {
            if s.phase == SessionPhase::Uninitialized {
                s.phase = SessionPhase::Initializing;
                s.loading = true;
                first = true;
                true
            } else {
                false
            }
        });

        if !first {
            let mut rx = self.subscribe();
            return match rx.wait_for(|s| s.phase != SessionPhase::Initializing).await {
                Ok(state) => state.phase,
                Err(_) => self.phase(),
            };
        }

        let _settle_on_cancel = InitializeGuard { state: &self.inner.state };
        let phase = match self.inner.config.credential_mode {
            CredentialMode::Bearer => self.initialize_bearer().await,
            CredentialMode::Cookie => self.initialize_cookie().await,
        };
        info!(?phase, "Session initialized");
        phase
    }

    async fn initialize_bearer(&self) -> SessionPhase {
        let Some(descriptor) = self.inner.tokens.session_state() else {
            debug!("No stored session");
            self.inner.tokens.clear_session();
            self.inner.sign_out();
            return SessionPhase::Anonymous;
        };

        debug!(username = %descriptor.username, "Stored session found, refreshing access token");
        // Optimistic identity for the UI; not authenticated until the refresh lands
        self.inner.state.send_modify(|s| s.user = Some(descriptor.to_user()));
        if self.refresh_access_token().await {
            self.inner.state.send_modify(|s| s.authenticate(descriptor.to_user()));
            SessionPhase::Authenticated
        } else {
            // The failed refresh already cleared storage
            self.inner.sign_out();
            SessionPhase::Anonymous
        }
    }

    async fn initialize_cookie(&self) -> SessionPhase {
        match self.inner.api.get::<User>(CURRENT_USER_ENDPOINT, Auth::Required).await.and_then(|e| e.into_data()) {
            Ok(user) => {
                self.inner.state.send_modify(|s| s.authenticate(user));
                SessionPhase::Authenticated
            }
            Err(e) => {
                debug!(error = %e, "No server session");
                self.inner.sign_out();
                SessionPhase::Anonymous
            }
        }
    }

    /// Log in with a username and password.
    ///
    /// On failure the error is also recorded in the state for display and
    /// any previous session is left as it was.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        self.inner.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        match self.inner.perform_login(username, password).await {
            Ok(user) => {
                info!(username = %user.username, "Login successful");
                self.inner.state.send_modify(|s| {
                    s.authenticate(user.clone());
                    s.failed_login_attempts = 0;
                });
                Ok(user)
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                self.inner.state.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(e.user_message());
                    s.failed_login_attempts = s.failed_login_attempts.saturating_add(1);
                });
                Err(e)
            }
        }
    }

    /// Log out. Local state is cleared first; the server is then told on a
    /// best-effort basis. Never fails.
    pub async fn logout(&self) {
        let token = self.inner.tokens.access_token();
        self.inner.teardown();
        self.inner.sign_out();
        info!("Logged out");

        let notified = match (self.inner.config.credential_mode, token) {
            (CredentialMode::Bearer, Some(token)) => self
                .inner
                .api
                .post_with_token::<Value, _>(LOGOUT_ENDPOINT, &json!({}), &token)
                .await
                .map(|_| ()),
            (CredentialMode::Bearer, None) => Ok(()),
            (CredentialMode::Cookie, _) => self
                .inner
                .api
                .post::<Value, _>(LOGOUT_ENDPOINT, &json!({}), Auth::Anonymous)
                .await
                .map(|_| ()),
        };
        if let Err(e) = notified {
            warn!(error = %e, "Server logout notification failed");
        }
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Concurrent callers share one in-flight exchange. Any failure clears
    /// the session and returns false.
    pub async fn refresh_access_token(&self) -> bool {
        SessionInner::shared_refresh(&self.inner).await
    }

    /// Fetch the current user from the API and update the session's user.
    pub async fn fetch_current_user(&self) -> Result<User, ApiError> {
        let user = self
            .inner
            .api
            .get::<User>(CURRENT_USER_ENDPOINT, Auth::Required)
            .await?
            .into_data()?;
        self.inner.state.send_if_modified(|s| {
            if s.is_authenticated && s.user.as_ref() != Some(&user) {
                s.user = Some(user.clone());
                true
            } else {
                false
            }
        });
        Ok(user)
    }
}

impl SessionInner {
    fn current_generation(&self) -> u64 {
        *lock(&self.generation)
    }

    fn sign_out(&self) {
        self.state.send_modify(|s| s.sign_out());
    }

    /// Cancel the timer and clear every credential. Anything started under
    /// the previous generation is ignored from here on.
    fn teardown(&self) {
        let mut generation = lock(&self.generation);
        *generation += 1;
        self.cancel_timer();
        self.tokens.clear_session();
    }

    fn cancel_timer(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.handle.abort();
            debug!("Refresh timer cancelled");
        }
    }

    async fn perform_login(self: &Arc<Self>, username: &str, password: &str) -> Result<User, AuthError> {
        let data = self
            .api
            .post::<LoginData, _>(LOGIN_ENDPOINT, &LoginRequest { username, password }, Auth::Anonymous)
            .await?
            .into_data()?;

        if self.config.credential_mode == CredentialMode::Cookie {
            return Ok(data.user);
        }

        let tokens = data
            .tokens
            .ok_or_else(|| AuthError::MalformedResponse("login response carried no tokens".to_string()))?;

        let now = now_ms();
        let expiry = token::expiry_or_default(&tokens.access_token, now);
        let descriptor = SessionDescriptor::for_user(&data.user, self.config.session_validity, now);

        // Last login wins: anything still running for an earlier session is
        // invalidated before the new credentials land.
        let mut generation = lock(&self.generation);
        *generation += 1;
        self.tokens.set_access_token(tokens.access_token);
        if let Err(e) = self.tokens.persist_session(&tokens.refresh_token, &descriptor) {
            warn!(error = %e, "Failed to persist session; it will not survive a restart");
        }
        self.record_token_expiry(expiry, *generation);
        drop(generation);

        Ok(data.user)
    }

    fn shared_refresh(this: &Arc<Self>) -> SharedRefresh {
        let mut slot = lock(&this.refresh_in_flight);
        if let Some(in_flight) = slot.as_ref() {
            debug!("Joining in-flight token refresh");
            return in_flight.clone();
        }

        let inner = Arc::clone(this);
        let refresh = async move {
            let refreshed = inner.exchange_refresh_token().await;
            *lock(&inner.refresh_in_flight) = None;
            refreshed
        }
        .boxed()
        .shared();

        *slot = Some(refresh.clone());
        refresh
    }

    async fn exchange_refresh_token(self: &Arc<Self>) -> bool {
        if self.config.credential_mode == CredentialMode::Cookie {
            debug!("Cookie sessions are renewed by the server");
            return false;
        }

        let started = self.current_generation();
        let Some(refresh_token) = self.tokens.refresh_token() else {
            debug!("No refresh token available");
            self.fail_refresh(started);
            return false;
        };

        let result = self
            .api
            .post::<RefreshData, _>(
                REFRESH_ENDPOINT,
                &RefreshRequest { refresh_token: &refresh_token },
                Auth::Anonymous,
            )
            .await
            .and_then(|envelope| envelope.into_data());

        match result {
            Ok(data) => {
                let generation = lock(&self.generation);
                if *generation != started {
                    debug!("Session changed during refresh, discarding new token");
                    return false;
                }
                let expiry = token::expiry_or_default(&data.access_token, now_ms());
                self.tokens.set_access_token(data.access_token);
                self.record_token_expiry(expiry, *generation);
                info!(expires_at = expiry, "Access token refreshed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing session");
                self.fail_refresh(started);
                false
            }
        }
    }

    /// Clear the session a refresh was started for, unless a newer session
    /// has replaced it in the meantime.
    fn fail_refresh(&self, started: u64) {
        {
            let mut generation = lock(&self.generation);
            if *generation != started {
                return;
            }
            *generation += 1;
            self.cancel_timer();
            self.tokens.clear_session();
        }
        self.sign_out();
    }

    /// Publish a new access-token expiry and rearm the timer for it. Called
    /// with the generation lock held.
    fn record_token_expiry(self: &Arc<Self>, expiry_ms: i64, generation: u64) {
        self.state.send_modify(|s| s.token_expiry_time = Some(expiry_ms));
        self.arm_timer(expiry_ms, generation);
    }

    fn arm_timer(self: &Arc<Self>, expiry_ms: i64, generation: u64) {
        let now = now_ms();
        let delay_ms = refresh_delay_ms(expiry_ms, now, self.config.refresh_margin.num_milliseconds()).max(0);
        let session = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
            }
            let Some(inner) = session.upgrade() else {
                return;
            };
            if inner.current_generation() != generation {
                return;
            }
            debug!("Refresh timer fired");
            // Detached so that rearming from inside the refresh cannot
            // cancel the refresh itself.
            tokio::spawn(SessionInner::shared_refresh(&inner));
        });

        debug!(delay_ms, "Refresh timer armed");
        let previous = lock(&self.timer).replace(RefreshTimer {
            handle,
            fires_at_ms: now.saturating_add(delay_ms),
        });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }
}

/// Settles an `initialize()` whose future is dropped before it resolves,
/// so callers waiting on the phase are released.
struct InitializeGuard<'a> {
    state: &'a watch::Sender<AuthState>,
}

impl Drop for InitializeGuard<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|s| {
            if s.phase != SessionPhase::Initializing {
                return false;
            }
            warn!("Session initialization cancelled, continuing signed out");
            s.sign_out();
            true
        });
    }
}

impl TokenRefresher for SessionInner {
    fn refresh(self: Arc<Self>) -> BoxFuture<'static, bool> {
        SessionInner::shared_refresh(&self).boxed()
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.handle.abort();
        }
    }
}
