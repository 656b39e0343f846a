use serde::Serialize;

use crate::models::User;

/// Consecutive failed logins after which the login form shows a security tip.
/// Cosmetic only; the server does no lockout based on it.
pub const SECURITY_TIP_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Initializing,
    Authenticated,
    Anonymous,
}

/// Snapshot of the session as the UI sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AuthState {
    pub phase: SessionPhase,
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub loading: bool,
    pub error: Option<String>,
    /// Expiry of the current access token, milliseconds since the epoch.
    pub token_expiry_time: Option<i64>,
    pub failed_login_attempts: u32,
}

impl AuthState {
    pub fn show_security_tip(&self) -> bool {
        self.failed_login_attempts >= SECURITY_TIP_THRESHOLD
    }

    pub(crate) fn authenticate(&mut self, user: User) {
        self.phase = SessionPhase::Authenticated;
        self.user = Some(user);
        self.is_authenticated = true;
        self.loading = false;
        self.error = None;
    }

    pub(crate) fn sign_out(&mut self) {
        self.phase = SessionPhase::Anonymous;
        self.user = None;
        self.is_authenticated = false;
        self.loading = false;
        self.token_expiry_time = None;
    }
}
