//! Collaborators that consume the session.
//!
//! - `PreferencesService`: per-user preferences over the API
//! - `ThemeController`: the current theme on an injected watch channel,
//!   persisted for the logged-in user

pub mod preferences;
pub mod theme;

pub use preferences::PreferencesService;
pub use theme::ThemeController;
