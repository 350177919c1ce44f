use chatrelay::cli::{Cli, Command, ConfigFormat};
use clap::Parser;
use std::path::PathBuf;

#[test]
fn test_default_config_path() {
    let cli = Cli::try_parse_from(["chatrelay"]).unwrap();
    // CHATRELAY_CONFIG may be set in the environment running the tests.
    if std::env::var_os("CHATRELAY_CONFIG").is_none() {
        assert_eq!(cli.config, PathBuf::from("chatrelay.toml"));
    }
}

#[test]
fn test_global_flags() {
    let cli = Cli::try_parse_from([
        "chatrelay",
        "--config",
        "/etc/chatrelay.toml",
        "--log-level",
        "debug",
    ])
    .unwrap();
    assert_eq!(cli.config, PathBuf::from("/etc/chatrelay.toml"));
    assert_eq!(cli.log_level.as_deref(), Some("debug"));
}

#[test]
fn test_quick_start_default_listen() {
    let cli = Cli::try_parse_from(["chatrelay", "quick-start"]).unwrap();
    match cli.command {
        Some(Command::QuickStart { listen }) => assert_eq!(listen, "0.0.0.0:8888"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_show_config_default_format() {
    let cli = Cli::try_parse_from(["chatrelay", "show-config"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Command::ShowConfig {
            format: ConfigFormat::Toml
        })
    ));
}

#[test]
fn test_hash_password_flag() {
    let cli = Cli::try_parse_from(["chatrelay", "hash-password", "-p", "x"]).unwrap();
    match cli.command {
        Some(Command::HashPassword { password }) => assert_eq!(password.as_deref(), Some("x")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_bad_format_rejected() {
    assert!(Cli::try_parse_from(["chatrelay", "show-config", "--format", "yaml"]).is_err());
}
