//! Authenticated fetch wrapper for the console API.

use std::sync::{Arc, RwLock, Weak};

use futures::future::BoxFuture;
use reqwest::{header, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::TokenStore;
use crate::config::{ClientConfig, CredentialMode};
use crate::models::ApiEnvelope;

/// Whether a call uses the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    /// Attach the bearer token; on 401 refresh once and replay.
    Required,
    /// Send without credentials; a 401 is returned to the caller as is.
    Anonymous,
}

/// Renews the access token on behalf of the client.
///
/// Implemented by the session orchestrator. Concurrent calls are expected
/// to share a single in-flight renewal.
pub trait TokenRefresher: Send + Sync {
    fn refresh(self: Arc<Self>) -> BoxFuture<'static, bool>;
}

/// API client for the console.
/// Clone is cheap - reqwest::Client and the token store are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    mode: CredentialMode,
    tokens: Arc<TokenStore>,
    refresher: Arc<RwLock<Option<Weak<dyn TokenRefresher>>>>,
}

impl ApiClient {
    /// Build the HTTP client the configuration asks for.
    pub fn http_client(config: &ClientConfig) -> Result<Client, ApiError> {
        Ok(Client::builder()
            .timeout(config.request_timeout)
            .cookie_store(config.credential_mode == CredentialMode::Cookie)
            .build()?)
    }

    pub fn new(config: &ClientConfig, tokens: Arc<TokenStore>) -> Result<Self, ApiError> {
        Ok(Self::with_client(config, tokens, Self::http_client(config)?))
    }

    /// Create a client around an existing `reqwest::Client`, sharing its
    /// connection pool.
    pub fn with_client(config: &ClientConfig, tokens: Arc<TokenStore>, client: Client) -> Self {
        Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            mode: config.credential_mode,
            tokens,
            refresher: Arc::new(RwLock::new(None)),
        }
    }

    /// Register who renews the access token after a 401. Held weakly so the
    /// client never keeps a torn-down session alive.
    pub fn set_refresher(&self, refresher: Weak<dyn TokenRefresher>) {
        match self.refresher.write() {
            Ok(mut slot) => *slot = Some(refresher),
            Err(poisoned) => *poisoned.into_inner() = Some(refresher),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn credential_mode(&self) -> CredentialMode {
        self.mode
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    // ===== Verbs =====

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str, auth: Auth) -> Result<ApiEnvelope<T>, ApiError> {
        self.send(Method::GET, endpoint, None, auth).await
    }

    pub async fn post<T, B>(&self, endpoint: &str, body: &B, auth: Auth) -> Result<ApiEnvelope<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = Self::encode_body(body)?;
        self.send(Method::POST, endpoint, Some(body), auth).await
    }

    pub async fn put<T, B>(&self, endpoint: &str, body: &B, auth: Auth) -> Result<ApiEnvelope<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = Self::encode_body(body)?;
        self.send(Method::PUT, endpoint, Some(body), auth).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str, auth: Auth) -> Result<ApiEnvelope<T>, ApiError> {
        self.send(Method::DELETE, endpoint, None, auth).await
    }

    /// POST with an explicit bearer token and no refresh on 401. Used when
    /// the session has already been torn down locally, e.g. by logout.
    pub async fn post_with_token<T, B>(&self, endpoint: &str, body: &B, token: &str) -> Result<ApiEnvelope<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(endpoint);
        let body = Self::encode_body(body)?;
        let response = self.dispatch(&Method::POST, &url, Some(&body), Some(token)).await?;
        Self::parse(response, &url).await
    }

    // ===== Plumbing =====

    fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
        serde_json::to_value(body).map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request body: {}", e)))
    }

    fn bearer_for(&self, auth: Auth) -> Option<String> {
        match (auth, self.mode) {
            (Auth::Required, CredentialMode::Bearer) => self.tokens.access_token(),
            _ => None,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        auth: Auth,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        let url = self.url(endpoint);
        let token = self.bearer_for(auth);
        let response = self.dispatch(&method, &url, body.as_ref(), token.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED || auth == Auth::Anonymous {
            return Self::parse(response, &url).await;
        }

        // One refresh, one replay. A second 401 is final.
        if self.mode == CredentialMode::Cookie {
            debug!(url = %url, "Session cookie rejected");
            return Err(ApiError::AuthRequired);
        }

        debug!(url = %url, "Access token rejected, refreshing");
        if !self.refresh_session().await {
            return Err(ApiError::AuthRequired);
        }

        let token = self.bearer_for(auth);
        let retry = self.dispatch(&method, &url, body.as_ref(), token.as_deref()).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            warn!(url = %url, "Request still unauthorized after token refresh");
            return Err(ApiError::AuthRequired);
        }
        Self::parse(retry, &url).await
    }

    async fn dispatch(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(header::ACCEPT, "application/json");

        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(|e| {
            warn!(method = %method, url = url, error = %e, "Request failed");
            ApiError::Network(e)
        })
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<ApiEnvelope<T>, ApiError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let err = ApiError::from_status(status, &body);
            debug!(url = url, status = status.as_u16(), error = %err, "API error response");
            return Err(err);
        }

        if body.trim().is_empty() {
            return Ok(ApiEnvelope::empty_success());
        }

        serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e)))
    }

    async fn refresh_session(&self) -> bool {
        let refresher = self
            .refresher
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(Weak::upgrade));

        match refresher {
            Some(refresher) => refresher.refresh().await,
            None => {
                warn!("No session available to refresh the access token");
                false
            }
        }
    }
}
