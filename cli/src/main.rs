#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use portal::api::{ApiClient, ApiError};
use portal::config::{ConfigError, PortalConfig};
use portal::guard;
use portal::navigation::{Navigator, Route};
use portal::session::{LoginAttempt, Session, SessionManager};
use portal::storage::{FileStore, KeyValueStore, StorageError, TOKEN_KEY};
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("api client failed: {0}")]
    Api(#[from] ApiError),
    #[error("session storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("missing password; pass --password or set PORTAL_PASSWORD")]
    MissingPassword,
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error("another login is already in progress")]
    LoginBusy,
    #[error("not signed in")]
    NotSignedIn,
}

/// Flags override the matching `PORTAL_*` environment variables; anything
/// left unset falls back to the environment, then to the library defaults.
#[derive(Parser, Debug)]
#[command(name = "portal", about = "Research proposal portal session CLI")]
struct Cli {
    #[arg(long, help = "Backend base URL [env: PORTAL_API_BASE_URL]")]
    base_url: Option<String>,

    #[arg(long, help = "Session store path [env: PORTAL_SESSION_FILE]")]
    session_file: Option<PathBuf>,

    #[arg(long, help = "researcher or admin [env: PORTAL_SCOPE]")]
    scope: Option<String>,

    #[arg(long, help = "[env: PORTAL_SIGNED_IN_ROUTE]")]
    signed_in_route: Option<String>,

    #[arg(long, help = "[env: PORTAL_SIGNED_OUT_ROUTE]")]
    signed_out_route: Option<String>,

    #[arg(long, help = "[env: PORTAL_REQUEST_TIMEOUT_SECS]")]
    request_timeout_secs: Option<u64>,

    #[arg(long, help = "[env: PORTAL_CONNECT_TIMEOUT_SECS]")]
    connect_timeout_secs: Option<u64>,

    #[arg(long, short, default_value_t = false, help = "Log at debug level")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn config(&self) -> Result<PortalConfig, CliError> {
        self.config_over(|key| std::env::var(key).ok())
    }

    /// Resolve config with flags taking precedence over `env`.
    fn config_over(&self, env: impl Fn(&str) -> Option<String>) -> Result<PortalConfig, CliError> {
        PortalConfig::from_lookup(|key| self.flag(key).or_else(|| env(key))).map_err(CliError::from)
    }

    fn flag(&self, key: &str) -> Option<String> {
        match key {
            "PORTAL_API_BASE_URL" => self.base_url.clone(),
            "PORTAL_SESSION_FILE" => self.session_file.as_ref().map(|p| p.to_string_lossy().into_owned()),
            "PORTAL_SCOPE" => self.scope.clone(),
            "PORTAL_SIGNED_IN_ROUTE" => self.signed_in_route.clone(),
            "PORTAL_SIGNED_OUT_ROUTE" => self.signed_out_route.clone(),
            "PORTAL_REQUEST_TIMEOUT_SECS" => self.request_timeout_secs.map(|v| v.to_string()),
            "PORTAL_CONNECT_TIMEOUT_SECS" => self.connect_timeout_secs.map(|v| v.to_string()),
            _ => None,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session locally.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign out and clear the stored session.
    Logout,
    /// Print the restored session state.
    Status,
    /// Verify the stored session against the backend.
    Whoami,
}

/// Navigator for a terminal: announces the destination on stderr.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, _route: Route, path: &str) {
        eprintln!("-> {path}");
    }
}

struct CliContext {
    api: Arc<ApiClient>,
    store: Arc<FileStore>,
    manager: SessionManager,
}

impl CliContext {
    fn new(config: &PortalConfig) -> Result<Self, CliError> {
        let api = Arc::new(ApiClient::from_config(config)?);
        let store = Arc::new(FileStore::new(&config.session_file));
        let manager = SessionManager::new(
            api.clone(),
            store.clone(),
            Arc::new(TerminalNavigator),
            config.routes.clone(),
            config.scope,
        );
        manager.initialize();
        Ok(Self { api, store, manager })
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config()?;
    let ctx = CliContext::new(&config)?;

    match cli.command {
        Command::Login { email, password } => run_login(&ctx, &email, password).await,
        Command::Logout => run_logout(&ctx).await,
        Command::Status => print_json(&status_json(&ctx.manager.snapshot())),
        Command::Whoami => run_whoami(&ctx).await,
    }
}

async fn run_login(ctx: &CliContext, email: &str, password: Option<String>) -> Result<(), CliError> {
    let password = password.ok_or(CliError::MissingPassword)?;
    match ctx.manager.login(email, &password).await {
        LoginAttempt::SignedIn => print_json(&status_json(&ctx.manager.snapshot())),
        LoginAttempt::Busy => Err(CliError::LoginBusy),
        LoginAttempt::Failed | LoginAttempt::Superseded => {
            let session = ctx.manager.snapshot();
            let message = session.error().unwrap_or("login did not complete");
            Err(CliError::LoginFailed(message.to_owned()))
        }
    }
}

async fn run_logout(ctx: &CliContext) -> Result<(), CliError> {
    ctx.manager.logout().await;
    println!("ok");
    Ok(())
}

async fn run_whoami(ctx: &CliContext) -> Result<(), CliError> {
    if guard::require_signed_in(&ctx.manager).is_none() {
        return Err(CliError::NotSignedIn);
    }
    let token = ctx.store.get(TOKEN_KEY)?.ok_or(CliError::NotSignedIn)?;
    let user = ctx.api.current_user(&token).await?;
    print_json(&serde_json::to_value(user)?)
}

fn status_json(session: &Session) -> Value {
    json!({
        "phase": session.phase().as_str(),
        "authenticated": session.is_authenticated(),
        "user": session.user(),
        "error": session.error(),
    })
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
