use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use valigator::{RulesetCatalog, ValigatorConfig};

use crate::server::{self, AppState};

/// Validate API specification documents against Spectral rule sets over HTTP.
#[derive(Debug, Parser)]
#[command(name = "valigator", version, about)]
pub struct Cli {
    /// JSON configuration file; missing files fall back to built-in defaults
    #[arg(short, long, default_value = "./valigator.json")]
    pub config: PathBuf,

    /// Listen host, overrides the configuration file
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port, overrides the configuration file
    #[arg(long)]
    pub port: Option<u16>,

    /// Spectral executable, overrides the configuration file
    #[arg(long)]
    pub spectral: Option<PathBuf>,

    /// Verbosity (-v logs requests, -vv adds bodies and debug output)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Apply command line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut ValigatorConfig) {
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(spectral) = &self.spectral {
            config.spectral_path.clone_from(spectral);
        }
    }
}

/// Default log filter for a verbosity level; `RUST_LOG` takes precedence.
fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "valigator=info,valigator_cli=info",
        1 => "valigator=debug,valigator_cli=debug",
        _ => "valigator=trace,valigator_cli=trace,tower_http=debug",
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parse the command line, load configuration and rule sets, and serve.
///
/// # Errors
///
/// Returns an error if the rule set catalog cannot be built or the server
/// cannot be started.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = ValigatorConfig::load(&cli.config);
    cli.apply_overrides(&mut config);
    tracing::info!("config:\n{}", serde_json::to_string_pretty(&config)?);

    let catalog = RulesetCatalog::from_config(&config).context("failed to load rule sets")?;
    if catalog.is_empty() {
        tracing::warn!("No rule sets available; every validation request will be rejected");
    }
    tracing::info!(
        rulesets = %catalog.names().collect::<Vec<_>>().join(", "),
        "Loaded rule sets"
    );

    server::serve(AppState::new(config, catalog), cli.verbose).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["valigator"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("./valigator.json"));
        assert_eq!(cli.verbose, 0);
        assert!(cli.host.is_none());
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::try_parse_from([
            "valigator",
            "--config",
            "conf/valigator.json",
            "--host",
            "127.0.0.1",
            "--port",
            "9090",
            "--spectral",
            "/opt/spectral/bin/spectral",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);

        let mut config = ValigatorConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.bind_address(), "127.0.0.1:9090");
        assert_eq!(
            config.spectral_path,
            PathBuf::from("/opt/spectral/bin/spectral")
        );
    }

    #[test]
    fn test_port_must_be_numeric() {
        assert!(Cli::try_parse_from(["valigator", "--port", "http"]).is_err());
    }

    #[test]
    fn test_default_filter_levels() {
        assert!(default_filter(0).contains("=info"));
        assert!(default_filter(1).contains("=debug"));
        assert!(default_filter(5).contains("tower_http"));
    }
}
