use smartnego::agents::{AgentKind, LlmProviderType};
use smartnego::config::Settings;
use smartnego::domain::auth::AuthMode;
use smartnego::persistence::StoreBackend;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_full_config_file() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("smartnego.toml");

    let toml = r#"
[server]
host = "0.0.0.0"
port = 8088

[auth]
mode = "bearer_token"
jwt_secret = "change-me"
jwt_algorithm = "HS512"

[negotiation]
max_history_messages = 12
agent_timeout_ms = 5000
poll_interval_ms = 2000

[agent]
kind = "llm"
system_prompt = "You sell {{ item_name }} for {{ listed_price }}."

[agent.llm]
provider = "anthropic"
model = "claude-3-5-haiku-latest"
temperature = 0.3

[persistence]
backend = "database"
url = "sqlite://nego.db?mode=rwc"

[rate_limit]
requests_per_second = 20
burst_size = 40
"#;
    fs::write(&path, toml)?;

    let settings = Settings::from_file(&path)?;
    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.server.port, 8088);
    assert_eq!(settings.auth.mode, AuthMode::BearerToken);
    assert_eq!(settings.auth.jwt_algorithm.as_deref(), Some("HS512"));
    assert_eq!(settings.negotiation.max_history_messages, 12);
    assert_eq!(settings.negotiation.poll_interval_ms, 2_000);
    assert_eq!(settings.negotiation.agent_max_attempts, 3);
    assert_eq!(settings.agent.kind, AgentKind::Llm);
    let llm = settings.agent.llm.as_ref().unwrap();
    assert_eq!(llm.provider, LlmProviderType::Anthropic);
    assert_eq!(settings.persistence.backend, StoreBackend::Database);
    let rate_limit = settings.rate_limit.as_ref().unwrap();
    assert!(rate_limit.enabled);
    assert_eq!(rate_limit.burst_size, 40);

    Ok(())
}

#[test]
fn test_missing_file_uses_defaults() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let settings = Settings::from_file(&temp_dir.path().join("absent.toml"))?;

    assert_eq!(settings.server.port, 3000);
    assert_eq!(settings.auth.mode, AuthMode::Header);
    assert_eq!(settings.auth.identity_header, "x-user-id");
    assert_eq!(settings.agent.kind, AgentKind::RuleBased);
    assert_eq!(settings.persistence.backend, StoreBackend::InMemory);
    Ok(())
}

#[test]
fn test_invalid_config_reports_every_error() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("smartnego.toml");
    fs::write(
        &path,
        r#"
[server]
host = "127.0.0.1"
port = 0

[auth]
mode = "bearer_token"

[negotiation]
agent_max_attempts = 0
"#,
    )?;

    let err = Settings::from_file(&path).unwrap_err().to_string();
    assert!(err.contains("server.port"), "{}", err);
    assert!(err.contains("auth.jwt_secret"), "{}", err);
    assert!(err.contains("negotiation.agent_max_attempts"), "{}", err);
    Ok(())
}
