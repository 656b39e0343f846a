use serde::{Deserialize, Serialize};

use super::User;
use crate::api::ApiError;

/// Envelope shared by every console API response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Envelope for a 2xx response with no body.
    pub fn empty_success() -> Self {
        Self {
            success: true,
            message: None,
            data: None,
            error: None,
        }
    }

    /// Server-provided explanation, preferring `message` over `error`.
    pub fn reason(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }

    /// The payload of a successful envelope. `success: false` or a missing
    /// payload becomes `ApiError::Rejected` carrying the server's reason.
    pub fn into_data(self) -> Result<T, ApiError> {
        if !self.success {
            let reason = self.reason().unwrap_or("Request was not successful").to_string();
            return Err(ApiError::Rejected(reason));
        }
        let reason = self.reason().map(str::to_string);
        self.data
            .ok_or_else(|| ApiError::Rejected(reason.unwrap_or_else(|| "Response contained no data".to_string())))
    }
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    pub user: User,
    /// Absent in cookie credential mode.
    #[serde(default)]
    pub tokens: Option<TokenPair>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshData {
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_response() {
        let json = r#"{
            "success": true,
            "data": {
                "user": {"id": "1", "username": "admin", "email": "admin@example.com", "role": "admin"},
                "tokens": {"accessToken": "a.b.c", "refreshToken": "r-1"}
            }
        }"#;

        let resp: ApiEnvelope<LoginData> =
            serde_json::from_str(json).expect("Failed to parse login response");
        assert!(resp.success);
        let data = resp.data.expect("login data");
        assert_eq!(data.user.username, "admin");
        let tokens = data.tokens.expect("tokens");
        assert_eq!(tokens.access_token, "a.b.c");
        assert_eq!(tokens.refresh_token, "r-1");
    }

    #[test]
    fn test_parse_failure_envelope() {
        let json = r#"{"success": false, "message": "Invalid username or password"}"#;
        let resp: ApiEnvelope<LoginData> =
            serde_json::from_str(json).expect("Failed to parse failure envelope");
        assert!(!resp.success);
        assert!(resp.data.is_none());
        assert_eq!(resp.reason(), Some("Invalid username or password"));
    }

    #[test]
    fn test_into_data() {
        let ok: ApiEnvelope<RefreshData> =
            serde_json::from_str(r#"{"success": true, "data": {"accessToken": "a.b.c"}}"#).unwrap();
        assert_eq!(ok.into_data().unwrap().access_token, "a.b.c");

        let rejected: ApiEnvelope<RefreshData> =
            serde_json::from_str(r#"{"success": false, "error": "Refresh token revoked"}"#).unwrap();
        let err = rejected.into_data().unwrap_err();
        assert_eq!(err.to_string(), "Refresh token revoked");

        let empty: ApiEnvelope<RefreshData> = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(matches!(empty.into_data(), Err(ApiError::Rejected(_))));
    }

    #[test]
    fn test_refresh_request_shape() {
        let body = serde_json::to_value(RefreshRequest { refresh_token: "r-1" }).unwrap();
        assert_eq!(body, serde_json::json!({"refreshToken": "r-1"}));
    }
}
