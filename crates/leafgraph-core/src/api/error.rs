use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// A protected call was rejected and the session could not be renewed.
    #[error("Authentication required")]
    AuthRequired,

    /// 401 on a call that does not use the session, e.g. bad credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Non-401 failure; the server's own message is kept unchanged.
    #[error("{message}")]
    Server { status: u16, message: String },

    /// 2xx response whose envelope reports `success: false`.
    #[error("{0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Message used when a failed response carries none of its own
pub const DEFAULT_FAILURE_MESSAGE: &str = "API request failed";

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the server's `message` (or `error`) field out of a JSON body.
    fn server_message(body: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    }

    /// Build an error from a failed response. JSON bodies contribute their
    /// message verbatim; anything else is truncated.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::server_message(body).unwrap_or_else(|| {
            if body.trim().is_empty() {
                DEFAULT_FAILURE_MESSAGE.to_string()
            } else {
                Self::truncate_body(body)
            }
        });
        match status.as_u16() {
            401 => ApiError::Unauthorized(message),
            code => ApiError::Server { status: code, message },
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::AuthRequired | ApiError::Unauthorized(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::AuthRequired | ApiError::Unauthorized(_) => Some(401),
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
