use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::User;

/// How long a session descriptor lets the client assume "logged in as X"
/// after a restart. Independent of the access token's lifetime.
pub const SESSION_VALIDITY_DAYS: i64 = 7;

/// Cached, non-sensitive identity snapshot.
///
/// It is a hint for rendering an authenticated shell before the refresh
/// round-trip completes, never an authorization credential: every protected
/// call still goes through the access token and the refresh-or-logout path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionDescriptor {
    pub user_id: String,
    pub username: String,
    pub role: String,
    /// Absolute ceiling in milliseconds since the epoch, chosen by the client.
    pub expires_at: i64,
}

impl SessionDescriptor {
    /// Descriptor for a freshly logged-in user, valid for `validity` from `now_ms`.
    pub fn for_user(user: &User, validity: Duration, now_ms: i64) -> Self {
        Self {
            user_id: user.id.clone(),
            username: user.username.clone(),
            role: user.role.clone(),
            expires_at: now_ms.saturating_add(validity.num_milliseconds()),
        }
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at < now_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    pub fn time_until_expiry(&self) -> Duration {
        Duration::milliseconds(self.expires_at - Utc::now().timestamp_millis())
    }

    /// Get days remaining until expiry (for display)
    pub fn days_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_days().max(0)
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.expires_at).single()
    }

    /// The identity the descriptor vouches for. Email is not cached.
    pub fn to_user(&self) -> User {
        User {
            id: self.user_id.clone(),
            username: self.username.clone(),
            email: None,
            role: self.role.clone(),
        }
    }
}
