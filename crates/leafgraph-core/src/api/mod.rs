//! REST API client module for the console API.
//!
//! This module provides the `ApiClient` used for every HTTP call the
//! console makes. Calls marked `Auth::Required` carry the in-memory bearer
//! token and, on a 401, are replayed once after a shared token refresh.

pub mod client;
pub mod error;

pub use client::{ApiClient, Auth, TokenRefresher};
pub use error::ApiError;
