use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl AuthError {
    /// Message suitable for showing on a login form.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials(m) if !m.trim().is_empty() => m.clone(),
            AuthError::InvalidCredentials(_) => "Invalid username or password".to_string(),
            AuthError::Network(_) => "Unable to connect to server. Check your internet connection.".to_string(),
            AuthError::Timeout => "Connection timed out. Please try again.".to_string(),
            AuthError::Server(m) => m.clone(),
            AuthError::MalformedResponse(_) => "Login failed: unexpected response from server".to_string(),
        }
    }
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::AuthRequired => AuthError::InvalidCredentials(String::new()),
            ApiError::Unauthorized(m) | ApiError::Rejected(m) => AuthError::InvalidCredentials(m),
            ApiError::Server { message, .. } => AuthError::Server(message),
            ApiError::Network(e) if e.is_timeout() => AuthError::Timeout,
            ApiError::Network(e) => AuthError::Network(e.to_string()),
            ApiError::InvalidResponse(m) => AuthError::MalformedResponse(m),
        }
    }
}
