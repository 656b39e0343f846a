//! LeafGraph CLI - drive the admin console session from a terminal.
//!
//! Every invocation behaves like a page load: the access token from a
//! previous run is gone, so the stored session is resumed through a silent
//! refresh before the command runs.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use leafgraph_core::services::ThemeController;
use leafgraph_core::{AuthSession, Config, FileStore, SessionPhase, Theme};

#[derive(Parser, Debug)]
#[command(
    name = "leafgraph",
    version,
    about = "Drive the LeafGraph admin console session from a terminal",
    after_help = "Environment:\n  LEAFGRAPH_API_URL          API base URL\n  \
                  LEAFGRAPH_CREDENTIAL_MODE  bearer (default) or cookie\n  \
                  RUST_LOG                   Log filter (default: warn)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session
    Login {
        /// Defaults to the last username used
        username: Option<String>,

        /// Password for non-interactive logins; prompted for when absent
        #[arg(long, env = "LEAFGRAPH_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// End the session
    Logout,
    /// Show the current user as reported by the API
    Whoami,
    /// Show the local session state
    Status,
    /// Show or change the console theme
    Theme {
        #[arg(value_enum)]
        action: Option<ThemeAction>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ThemeAction {
    Light,
    Dark,
    Toggle,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let _log_guard = init_tracing();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: ignoring unreadable config: {:#}", e);
        Config::default()
    });
    let client_config = config.client_config();
    let storage_path = config.storage_path()?;
    debug!(base_url = %client_config.base_url, storage = %storage_path.display(), "Starting");

    let session = AuthSession::new(client_config, Arc::new(FileStore::new(storage_path)))
        .context("Failed to create HTTP client")?;
    let phase = session.initialize().await;
    info!(?phase, "Session resumed");

    match cli.command {
        Command::Login { username, password } => login(&session, &mut config, username, password).await,
        Command::Logout => logout(&session).await,
        Command::Whoami => whoami(&session).await,
        Command::Status => status(&session),
        Command::Theme { action } => theme(&session, action).await,
    }
}

async fn login(
    session: &AuthSession,
    config: &mut Config,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(username) => username,
        None => prompt_username()?,
    };
    let password = match password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ")?,
    };

    match session.login(&username, &password).await {
        Ok(user) => {
            config.last_username = Some(username);
            if let Err(e) = config.save() {
                eprintln!("Warning: failed to save config: {:#}", e);
            }
            println!("Logged in as {} ({})", user.username, user.role);
            Ok(())
        }
        Err(e) => {
            let state = session.state();
            if state.show_security_tip() {
                eprintln!("Tip: check that Caps Lock is off and that you are using the right account.");
            }
            bail!("{}", e.user_message())
        }
    }
}

async fn logout(session: &AuthSession) -> Result<()> {
    let was_authenticated = session.is_authenticated();
    session.logout().await;
    if was_authenticated {
        println!("Logged out");
    } else {
        println!("No active session");
    }
    Ok(())
}

async fn whoami(session: &AuthSession) -> Result<()> {
    if session.phase() != SessionPhase::Authenticated {
        bail!("Not logged in. Run `leafgraph login` first.");
    }
    let user = session
        .fetch_current_user()
        .await
        .context("Failed to fetch current user")?;
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

fn status(session: &AuthSession) -> Result<()> {
    let state = session.state();
    println!("{}", serde_json::to_string_pretty(&state)?);
    if let Some(descriptor) = session.tokens().session_state() {
        println!("Stored session expires in {} day(s)", descriptor.days_until_expiry());
    }
    if let Some(at) = session.next_refresh_at() {
        let secs = (at - chrono::Utc::now().timestamp_millis()).max(0) / 1000;
        println!("Next token refresh in {}s", secs);
    }
    Ok(())
}

async fn theme(session: &AuthSession, action: Option<ThemeAction>) -> Result<()> {
    let controller = ThemeController::new(session.clone());
    controller.load_for_user().await;

    let theme = match action {
        None => controller.current(),
        Some(ThemeAction::Toggle) => controller.toggle().await,
        Some(ThemeAction::Light) => set_theme(&controller, Theme::Light).await,
        Some(ThemeAction::Dark) => set_theme(&controller, Theme::Dark).await,
    };
    println!("{}", theme);
    Ok(())
}

async fn set_theme(controller: &ThemeController, theme: Theme) -> Theme {
    if !controller.set_theme(theme).await {
        debug!(%theme, "Theme already active");
    }
    theme
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    let username = username.trim().to_string();
    if username.is_empty() {
        bail!("Username required");
    }
    Ok(username)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_login_with_username() {
        let cli = Cli::try_parse_from(["leafgraph", "login", "admin", "--password", "pw"]).unwrap();
        match cli.command {
            Command::Login { username, password } => {
                assert_eq!(username.as_deref(), Some("admin"));
                assert_eq!(password.as_deref(), Some("pw"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_theme_actions() {
        let cli = Cli::try_parse_from(["leafgraph", "theme", "toggle"]).unwrap();
        assert!(matches!(cli.command, Command::Theme { action: Some(ThemeAction::Toggle) }));

        let cli = Cli::try_parse_from(["leafgraph", "theme"]).unwrap();
        assert!(matches!(cli.command, Command::Theme { action: None }));

        assert!(Cli::try_parse_from(["leafgraph", "theme", "purple"]).is_err());
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["leafgraph", "frobnicate"]).is_err());
        assert!(Cli::try_parse_from(["leafgraph"]).is_err());
    }
}
