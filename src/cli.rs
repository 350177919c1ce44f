use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "chatrelay",
    version,
    about = "TCP chat and file relay server"
)]
pub struct Cli {
    /// Path to configuration file (also settable via CHATRELAY_CONFIG env var)
    #[arg(short, long, default_value = "chatrelay.toml", env = "CHATRELAY_CONFIG")]
    pub config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Hash a password using Argon2id for use in config
    HashPassword {
        /// Password to hash (if not provided, reads from stdin)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Validate configuration file
    CheckConfig,
    /// Print the effective configuration with secrets redacted
    ShowConfig {
        #[arg(long, value_enum, default_value_t = ConfigFormat::Toml)]
        format: ConfigFormat,
    },
    /// Start with the built-in demo accounts user1/1, user2/2, user3/3
    QuickStart {
        /// Listen address
        #[arg(long, default_value = "0.0.0.0:8888")]
        listen: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Toml,
    Json,
}
