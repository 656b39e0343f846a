//! Core library for the LeafGraph admin console client.
//!
//! The interesting part of the console is its session lifecycle:
//!
//! - `auth::TokenStore`: volatile access token, durable (obfuscated) refresh
//!   token and session descriptor
//! - `auth::AuthSession`: login, logout, silent startup refresh and a
//!   self-rearming refresh timer
//! - `api::ApiClient`: HTTP wrapper that attaches bearer credentials and
//!   retries exactly once through a shared refresh on 401
//!
//! Everything else (preferences, theme) is a consumer of the session.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod services;
pub mod storage;

pub use api::{ApiClient, ApiError, Auth};
pub use auth::{AuthError, AuthSession, AuthState, SessionDescriptor, SessionPhase, TokenStore};
pub use config::{ClientConfig, Config, CredentialMode};
pub use models::{Theme, User, UserPreferences};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
