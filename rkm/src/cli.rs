use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rkm", version, about = "Network mount failover daemon")]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, env = "RKM_LOG_JSON", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mount every group and keep the mounts healthy until interrupted
    Start {
        #[arg(short, long, env = "RKM_CONFIG")]
        config: PathBuf,
    },
    /// Check the config and mounts file, then print the mount groups
    Validate {
        #[arg(short, long, env = "RKM_CONFIG")]
        config: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["rkm", "start", "--config", "/etc/rkm/rkm.yaml"]).unwrap();
        assert!(!cli.log_json);
        match cli.command {
            Commands::Start { config } => assert_eq!(config, PathBuf::from("/etc/rkm/rkm.yaml")),
            Commands::Validate { .. } => panic!("expected start"),
        }

        let cli =
            Cli::try_parse_from(["rkm", "validate", "-c", "rkm.yaml", "--log-json"]).unwrap();
        assert!(cli.log_json);
        assert!(matches!(cli.command, Commands::Validate { .. }));

        assert!(Cli::try_parse_from(["rkm", "stop"]).is_err());
    }
}
