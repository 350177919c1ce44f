use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use zeroize::Zeroizing;
use tracing::{error, info};

use chatrelay::auth::HashCost;
use chatrelay::cli::{Cli, Command, ConfigFormat};
use chatrelay::config;
use chatrelay::config::types::{AppConfig, UserConfig};
use chatrelay::logging::{LogBuffer, LogSink};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Command::HashPassword { password }) => {
            return hash_password_command(password.as_deref());
        }
        Some(Command::CheckConfig) => {
            let cfg = config::load_config(&cli.config)?;
            println!("Configuration is valid.");
            println!("  Listen: {}", cfg.server.listen);
            println!("  Users: {}", cfg.users.len());
            if cfg.metrics.enabled {
                println!("  Metrics: {}", cfg.metrics.listen);
            }
            return Ok(());
        }
        Some(Command::ShowConfig { format }) => {
            let cfg = config::load_config(&cli.config)?;
            let redacted = config::redact::redact_config(&cfg);
            match format {
                ConfigFormat::Toml => print!("{}", toml::to_string_pretty(&redacted)?),
                ConfigFormat::Json => println!("{}", serde_json::to_string_pretty(&redacted)?),
            }
            return Ok(());
        }
        Some(Command::QuickStart { listen }) => {
            let app_config = build_quick_config(listen.clone());
            let level = cli
                .log_level
                .clone()
                .unwrap_or_else(|| app_config.logging.level.to_string());

            eprintln!();
            eprintln!("=== chatrelay quick-start ===");
            eprintln!("  Listen:  {}", listen);
            eprintln!("  Users:   user1/1, user2/2, user3/3");
            eprintln!();

            return serve(app_config, &level);
        }
        None => {}
    }

    let cfg = config::load_config(&cli.config)?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| cfg.logging.level.to_string());
    serve(cfg, &level)
}

fn serve(cfg: AppConfig, level: &str) -> Result<()> {
    let log_buffer = Arc::new(LogBuffer::new(cfg.logging.buffer_max_lines));
    chatrelay::logging::setup_logging(
        level,
        cfg.logging.format,
        Some(log_buffer.clone() as Arc<dyn LogSink>),
    );
    info!(version = env!("CARGO_PKG_VERSION"), "Starting chatrelay");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        if let Err(e) = chatrelay::server::run(cfg, log_buffer).await {
            error!(error = %e, "Server error");
            return Err(e);
        }
        Ok(())
    })
}

/// Print an Argon2id PHC string for `password_hash`. Reads stdin when no
/// password is given on the command line.
fn hash_password_command(password: Option<&str>) -> Result<()> {
    let password = match password {
        Some(p) => Zeroizing::new(p.to_string()),
        None => {
            eprintln!("Enter password: ");
            let mut line = Zeroizing::new(String::new());
            std::io::stdin().read_line(&mut line)?;
            Zeroizing::new(line.trim().to_string())
        }
    };
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    println!("{}", HashCost::default().hash(&password)?);
    Ok(())
}

fn build_quick_config(listen: String) -> AppConfig {
    let mut config = AppConfig {
        users: vec![
            UserConfig::with_password("user1", "1"),
            UserConfig::with_password("user2", "2"),
            UserConfig::with_password("user3", "3"),
        ],
        ..Default::default()
    };
    config.server.listen = listen;
    config
}
