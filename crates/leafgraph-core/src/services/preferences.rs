use serde::Deserialize;
use tracing::warn;

use crate::api::{ApiClient, Auth};
use crate::models::UserPreferences;

/// Preferences arrive either wrapped or bare depending on the backend build.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PreferencesPayload {
    Wrapped { preferences: UserPreferences },
    Bare(UserPreferences),
}

impl PreferencesPayload {
    fn into_inner(self) -> UserPreferences {
        match self {
            PreferencesPayload::Wrapped { preferences } => preferences,
            PreferencesPayload::Bare(preferences) => preferences,
        }
    }
}

#[derive(Clone)]
pub struct PreferencesService {
    api: ApiClient,
}

impl PreferencesService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn endpoint(user_id: &str) -> String {
        format!("/users/{}/preferences", user_id)
    }

    /// Fetch a user's preferences. Failures are logged and read as `None`.
    pub async fn get_preferences(&self, user_id: &str) -> Option<UserPreferences> {
        let result = self
            .api
            .get::<PreferencesPayload>(&Self::endpoint(user_id), Auth::Required)
            .await
            .and_then(|envelope| envelope.into_data());

        match result {
            Ok(payload) => Some(payload.into_inner()),
            Err(e) => {
                warn!(user_id = user_id, error = %e, "Failed to fetch user preferences");
                None
            }
        }
    }

    /// Store a user's preferences. Returns whether the server accepted them.
    pub async fn update_preferences(&self, user_id: &str, preferences: &UserPreferences) -> bool {
        match self
            .api
            .put::<serde_json::Value, _>(&Self::endpoint(user_id), preferences, Auth::Required)
            .await
        {
            Ok(envelope) => envelope.success,
            Err(e) => {
                warn!(user_id = user_id, error = %e, "Failed to update user preferences");
                false
            }
        }
    }
}
