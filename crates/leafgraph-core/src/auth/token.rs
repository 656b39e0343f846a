//! Access-token inspection.
//!
//! The client never validates tokens; it only reads the `exp` claim so it
//! knows when to refresh.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Fallback lifetime when a token's expiry cannot be read.
pub const DEFAULT_TOKEN_LIFETIME_MS: i64 = 3600 * 1000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not a three-part JWT")]
    NotJwt,

    #[error("token payload is not valid base64")]
    Encoding,

    #[error("token payload is not JSON: {0}")]
    Payload(String),

    #[error("token has no numeric exp claim")]
    MissingExpiry,
}

#[derive(Debug, Deserialize)]
struct Claims {
    exp: Option<serde_json::Value>,
}

/// Expiry of an access token in milliseconds since the epoch.
pub fn token_expiry_ms(token: &str) -> Result<i64, TokenError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
        _ => return Err(TokenError::NotJwt),
    };

    let trimmed = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .map_err(|_| TokenError::Encoding)?;

    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Payload(e.to_string()))?;

    let seconds = claims
        .exp
        .as_ref()
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .ok_or(TokenError::MissingExpiry)?;

    Ok(seconds.saturating_mul(1000))
}

/// Expiry in milliseconds, falling back to one hour after `now_ms` when
/// the token cannot be read.
pub fn expiry_or_default(token: &str, now_ms: i64) -> i64 {
    match token_expiry_ms(token) {
        Ok(expiry) => expiry,
        Err(e) => {
            warn!(error = %e, "Could not read access token expiry, assuming one hour");
            now_ms.saturating_add(DEFAULT_TOKEN_LIFETIME_MS)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build an unsigned JWT-shaped token with the given `exp` (seconds).
    pub(crate) fn jwt_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"1","exp":{}}}"#, exp));
        format!("{}.{}.signature", header, payload)
    }

    #[test]
    fn test_expiry_is_exp_claim_in_millis() {
        for exp in [0_i64, 1, 1_700_000_000, 4_102_444_800] {
            assert_eq!(token_expiry_ms(&jwt_with_exp(exp)), Ok(exp * 1000));
        }
    }

    #[test]
    fn test_float_exp_claim() {
        let payload = URL_SAFE_NO_PAD.encode(r#"{"exp":1700000000.5}"#);
        let token = format!("h.{}.s", payload);
        assert_eq!(token_expiry_ms(&token), Ok(1_700_000_000_000));
    }

    #[test]
    fn test_padded_payload_is_accepted() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":10}"#);
        let token = format!("h.{}.s", payload);
        assert_eq!(token_expiry_ms(&token), Ok(10_000));
    }

    #[test]
    fn test_malformed_tokens() {
        assert_eq!(token_expiry_ms("opaque"), Err(TokenError::NotJwt));
        assert_eq!(token_expiry_ms("a..c"), Err(TokenError::NotJwt));
        assert_eq!(token_expiry_ms("a.!!!.c"), Err(TokenError::Encoding));

        let no_exp = format!("h.{}.s", URL_SAFE_NO_PAD.encode(r#"{"sub":"1"}"#));
        assert_eq!(token_expiry_ms(&no_exp), Err(TokenError::MissingExpiry));

        let text_exp = format!("h.{}.s", URL_SAFE_NO_PAD.encode(r#"{"exp":"soon"}"#));
        assert_eq!(token_expiry_ms(&text_exp), Err(TokenError::MissingExpiry));
    }

    #[test]
    fn test_expiry_or_default_falls_back_to_one_hour() {
        let now = 1_000_000;
        assert_eq!(expiry_or_default("opaque", now), now + DEFAULT_TOKEN_LIFETIME_MS);
        assert_eq!(expiry_or_default(&jwt_with_exp(5_000), now), 5_000_000);
    }
}
