use clap::Parser;
use std::path::PathBuf;

/// SmartNego - negotiation workflow server with AI-drafted seller replies
#[derive(Parser, Debug, Clone)]
#[command(name = "smartnego", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "SMARTNEGO_CONFIG", default_value = "smartnego.toml")]
    pub config: PathBuf,

    /// Server host address
    #[arg(long, env = "SMARTNEGO_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, env = "SMARTNEGO_PORT")]
    pub port: Option<u16>,

    /// Database URL; switches the conversation store to the SQL backend
    #[arg(long, env = "SMARTNEGO_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Polling interval advertised to clients, in milliseconds
    #[arg(long, env = "SMARTNEGO_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["smartnego"]);
        assert_eq!(cli.config, PathBuf::from("smartnego.toml"));
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.database_url.is_none());
    }

    #[test]
    fn test_cli_with_args() {
        let cli = Cli::parse_from([
            "smartnego",
            "--config",
            "custom.toml",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
            "--database-url",
            "sqlite::memory:",
            "--poll-interval-ms",
            "1500",
        ]);
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert_eq!(cli.host, Some("0.0.0.0".to_string()));
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.database_url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(cli.poll_interval_ms, Some(1500));
    }
}
