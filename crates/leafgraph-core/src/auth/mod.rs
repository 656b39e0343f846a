//! Authentication module for the console session.
//!
//! This module provides:
//! - `TokenStore`: volatile access token, durable refresh token and session
//!   descriptor behind storage obfuscation
//! - `SessionDescriptor`: cached identity that lets a restarted client
//!   assume who is logged in while the first refresh is in flight
//! - `AuthSession`: login, logout, silent startup refresh and the refresh timer
//!
//! Descriptors stay valid for 7 days; access tokens are refreshed one minute
//! before their own `exp` claim.

pub mod error;
pub mod manager;
pub mod obfuscation;
pub mod session;
pub mod state;
pub mod store;
pub mod token;

pub use error::AuthError;
pub use manager::{refresh_delay_ms, AuthSession};
pub use session::SessionDescriptor;
pub use state::{AuthState, SessionPhase};
pub use store::TokenStore;

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
