//! Data models exchanged with the console API.
//!
//! - `User`: the authenticated identity and its role checks
//! - `ApiEnvelope`: the `{success, message, data}` wrapper every endpoint uses
//! - Auth wire types: login/refresh requests and responses
//! - `UserPreferences`, `Theme`: preference payloads

pub mod auth;
pub mod preferences;
pub mod user;

pub use auth::{ApiEnvelope, LoginData, LoginRequest, RefreshData, RefreshRequest, TokenPair};
pub use preferences::{Theme, UserPreferences};
pub use user::User;
