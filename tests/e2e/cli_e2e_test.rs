use assert_cmd::cargo::CommandCargoExt;
use assert_cmd::Command;
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

fn chatrelay() -> Command {
    let mut cmd = Command::cargo_bin("chatrelay").unwrap();
    cmd.env_remove("CHATRELAY_CONFIG")
        .env_remove("CHATRELAY_LISTEN")
        .env_remove("CHATRELAY_LOG_LEVEL");
    cmd
}

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const VALID: &str = r##"
[server]
listen = "127.0.0.1:8888"

[[users]]
username = "user1"
password = "topsecret"
"##;

#[test]
fn test_hash_password_prints_phc_string() {
    let output = chatrelay()
        .args(["hash-password", "--password", "hunter2"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.trim().starts_with("$argon2id$"));
}

#[test]
fn test_check_config_valid() {
    let file = write_config(VALID);
    let output = chatrelay()
        .arg("--config")
        .arg(file.path())
        .arg("check-config")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Configuration is valid."));
    assert!(stdout.contains("127.0.0.1:8888"));
}

#[test]
fn test_check_config_rejects_missing_users() {
    let file = write_config("[server]\nlisten = \"127.0.0.1:8888\"\n");
    chatrelay()
        .arg("--config")
        .arg(file.path())
        .arg("check-config")
        .assert()
        .failure();
}

#[test]
fn test_show_config_redacts_passwords() {
    let file = write_config(VALID);
    let output = chatrelay()
        .arg("--config")
        .arg(file.path())
        .args(["show-config", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(!stdout.contains("topsecret"));
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["users"][0]["password"], "***");
}

#[test]
fn test_missing_config_file_fails() {
    chatrelay()
        .args(["--config", "/nonexistent/chatrelay.toml", "check-config"])
        .assert()
        .failure();
}

#[test]
fn test_close_command_exits_cleanly() {
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let listen = format!("127.0.0.1:{port}");
    let mut child = std::process::Command::cargo_bin("chatrelay")
        .unwrap()
        .args(["quick-start", "--listen", &listen])
        .env_remove("CHATRELAY_CONFIG")
        .env_remove("CHATRELAY_LISTEN")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut stream = loop {
        match TcpStream::connect(&listen) {
            Ok(stream) => break stream,
            Err(_) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(50)),
            Err(e) => {
                let _ = child.kill();
                panic!("server never came up: {e}");
            }
        }
    };
    stream
        .write_all(&chatrelay::protocol::codec::encode_frame("/CLOSE"))
        .unwrap();

    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("server still running after /CLOSE");
        }
        std::thread::sleep(Duration::from_millis(50));
    };
    assert!(status.success(), "exit status {status}");
}
