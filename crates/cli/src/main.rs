//! The turnout RPC gateway binary.

use std::path::PathBuf;

use clap::Parser;
use turnout_config::GatewayConfig;

mod logging;
mod run;

/// Single-active-upstream load balancer for Ethereum JSON-RPC endpoints.
#[derive(Debug, Parser)]
#[command(name = "turnout", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    let config = GatewayConfig::from_file(&cli.config)?;

    logging::init_tracing(if config.verbose { "debug" } else { "info" })?;
    logging::log_config(&config);

    run::run(config).await
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::parse_from(["turnout"]);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
    }

    #[test]
    fn test_explicit_config_path() {
        let cli = Cli::parse_from(["turnout", "--config", "/etc/turnout.yaml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/turnout.yaml"));
    }
}
