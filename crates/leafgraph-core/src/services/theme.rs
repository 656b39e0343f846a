use tokio::sync::watch;
use tracing::{debug, warn};

use super::PreferencesService;
use crate::auth::AuthSession;
use crate::models::{Theme, UserPreferences};

/// Owns the console theme.
///
/// Components receive the theme through `subscribe()` rather than reading a
/// shared global. Changes are saved for the logged-in user; a failed save
/// never reverts the local choice.
pub struct ThemeController {
    theme: watch::Sender<Theme>,
    session: AuthSession,
    preferences: PreferencesService,
}

impl ThemeController {
    pub fn new(session: AuthSession) -> Self {
        let preferences = PreferencesService::new(session.api().clone());
        let (theme, _) = watch::channel(Theme::default());
        Self {
            theme,
            session,
            preferences,
        }
    }

    pub fn current(&self) -> Theme {
        *self.theme.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Theme> {
        self.theme.subscribe()
    }

    /// Switch to `theme`. Returns false when it was already active.
    pub async fn set_theme(&self, theme: Theme) -> bool {
        if !self.theme.send_if_modified(|current| {
            let changed = *current != theme;
            *current = theme;
            changed
        }) {
            return false;
        }
        debug!(%theme, "Theme changed");

        if let Some(user) = self.session.user() {
            let prefs = UserPreferences { theme: Some(theme) };
            if !self.preferences.update_preferences(&user.id, &prefs).await {
                warn!(%theme, "Theme preference was not saved");
            }
        }
        true
    }

    pub async fn toggle(&self) -> Theme {
        let next = self.current().toggled();
        self.set_theme(next).await;
        next
    }

    /// Apply the logged-in user's saved theme, if any, without saving it back.
    pub async fn load_for_user(&self) -> Theme {
        if let Some(user) = self.session.user() {
            if let Some(theme) = self
                .preferences
                .get_preferences(&user.id)
                .await
                .and_then(|p| p.theme)
            {
                self.theme.send_replace(theme);
            }
        }
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::token::tests::jwt_with_exp;
    use crate::config::ClientConfig;
    use crate::storage::MemoryStore;

    async fn logged_in_session(server: &MockServer) -> AuthSession {
        let exp = chrono::Utc::now().timestamp() + 900;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "user": {"id": "1", "username": "admin", "role": "admin"},
                    "tokens": {"accessToken": jwt_with_exp(exp), "refreshToken": "refresh-1"}
                }
            })))
            .mount(server)
            .await;

        let config = ClientConfig::default().with_base_url(server.uri());
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        let session = AuthSession::with_http_client(config, Arc::new(MemoryStore::new()), http);
        session.login("admin", "pw").await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_anonymous_theme_change_is_not_persisted() {
        let mock_server = MockServer::start().await;
        let config = ClientConfig::default().with_base_url(mock_server.uri());
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        let session = AuthSession::with_http_client(config, Arc::new(MemoryStore::new()), http);

        let controller = ThemeController::new(session);
        let mut rx = controller.subscribe();

        assert_eq!(controller.toggle().await, Theme::Dark);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Theme::Dark);
        assert!(mock_server.received_requests().await.unwrap().is_empty());

        assert!(!controller.set_theme(Theme::Dark).await);
    }

    #[tokio::test]
    async fn test_theme_change_is_saved_for_user() {
        let mock_server = MockServer::start().await;
        let session = logged_in_session(&mock_server).await;
        Mock::given(method("PUT"))
            .and(path("/users/1/preferences"))
            .and(body_json(json!({"theme": "dark"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let controller = ThemeController::new(session);
        assert!(controller.set_theme(Theme::Dark).await);
        assert_eq!(controller.current(), Theme::Dark);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_local_theme() {
        let mock_server = MockServer::start().await;
        let session = logged_in_session(&mock_server).await;
        Mock::given(method("PUT"))
            .and(path("/users/1/preferences"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let controller = ThemeController::new(session);
        assert!(controller.set_theme(Theme::Dark).await);
        assert_eq!(controller.current(), Theme::Dark);
    }

    #[tokio::test]
    async fn test_load_for_user() {
        let mock_server = MockServer::start().await;
        let session = logged_in_session(&mock_server).await;
        Mock::given(method("GET"))
            .and(path("/users/1/preferences"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"preferences": {"theme": "dark"}}
            })))
            .mount(&mock_server)
            .await;

        let controller = ThemeController::new(session);
        assert_eq!(controller.load_for_user().await, Theme::Dark);
    }
}
