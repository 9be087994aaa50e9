use super::*;

use portal::config::{DEFAULT_API_BASE_URL, HttpTimeouts};
use portal::navigation::Routes;
use portal::session::Scope;

fn no_env(_key: &str) -> Option<String> {
    None
}

#[test]
fn cli_config_uses_defaults() {
    let cli = Cli::try_parse_from(["portal", "status"]).unwrap();
    let config = cli.config_over(no_env).unwrap();
    assert_eq!(config, PortalConfig::default());
    assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
}

#[test]
fn cli_config_normalizes_base_url_flag() {
    let cli = Cli::try_parse_from(["portal", "--base-url", "http://localhost:5000/api/", "status"]).unwrap();
    let config = cli.config_over(no_env).unwrap();
    assert_eq!(config.api_base_url, "http://localhost:5000/api");
    assert_eq!(config.routes.signed_out, "/login");
    assert_eq!(config.scope, Scope::Researcher);
}

#[test]
fn cli_config_rejects_unknown_scope() {
    let cli = Cli::try_parse_from(["portal", "--scope", "dean", "status"]).unwrap();
    assert!(matches!(cli.config_over(no_env), Err(CliError::Config(ConfigError::UnknownScope(_)))));
}

#[test]
fn cli_flags_override_environment() {
    let env = |key: &str| match key {
        "PORTAL_SCOPE" => Some("dean".to_owned()),
        "PORTAL_SIGNED_OUT_ROUTE" => Some("/signin".to_owned()),
        "PORTAL_CONNECT_TIMEOUT_SECS" => Some("3".to_owned()),
        _ => None,
    };
    let cli = Cli::try_parse_from(["portal", "--scope", "admin", "--request-timeout-secs", "9", "status"]).unwrap();
    let config = cli.config_over(env).unwrap();
    assert_eq!(config.scope, Scope::Admin);
    assert_eq!(config.routes.signed_out, "/signin");
    assert_eq!(config.timeouts, HttpTimeouts { request_secs: 9, connect_secs: 3 });
}

#[test]
fn cli_parses_login_arguments() {
    let cli =
        Cli::try_parse_from(["portal", "login", "--email", "a@example.com", "--password", "pw"]).unwrap();
    match cli.command {
        Command::Login { email, password } => {
            assert_eq!(email, "a@example.com");
            assert_eq!(password.as_deref(), Some("pw"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn status_json_for_fresh_session() {
    let store = Arc::new(portal::storage::MemoryStore::new());
    let api = Arc::new(ApiClient::new("http://localhost:5000/api", HttpTimeouts::default()).unwrap());
    let manager = SessionManager::new(api, store, Arc::new(TerminalNavigator), Routes::default(), Scope::Admin);
    manager.initialize();

    let value = status_json(&manager.snapshot());
    assert_eq!(value["phase"], "signed_out");
    assert_eq!(value["authenticated"], false);
    assert!(value["user"].is_null());
    assert!(value["error"].is_null());
}
