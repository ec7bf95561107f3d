//! Command-line surface for `shellcache`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "shellcache",
    version,
    about = "Drive the offline cache worker against an on-disk store",
    long_about = None
)]
pub struct Cli {
    /// TOML config file (overridden by SHELLCACHE_* variables)
    #[arg(long, env = "SHELLCACHE_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install and activate the configured version, then report what was stored and evicted
    Install,
    /// Send one request through the worker and print the response body
    Fetch {
        /// URL to request; relative URLs resolve against the scope
        url: String,
        /// Treat the request as a top-level page load
        #[arg(long)]
        navigate: bool,
    },
    /// Post a JSON message, e.g. '{"type":"GET_VERSION"}'
    Message { json: String },
    /// List stores and their entry counts
    Stores,
    /// Show version, phase and scope
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from(["shellcache", "fetch", "/about", "--navigate"]).unwrap();
        match cli.command {
            Commands::Fetch { url, navigate } => {
                assert_eq!(url, "/about");
                assert!(navigate);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_flag() {
        let cli = Cli::try_parse_from(["shellcache", "--config", "sc.toml", "stores"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("sc.toml")));
        assert!(matches!(cli.command, Commands::Stores));
    }

    #[test]
    fn test_message_requires_json() {
        assert!(Cli::try_parse_from(["shellcache", "message"]).is_err());
    }
}
