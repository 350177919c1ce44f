#[allow(dead_code, unused_imports)]
mod helpers;

use futures::future::join_all;
use helpers::*;
use tokio::time::Duration;

#[tokio::test]
async fn test_login_success() {
    let server = start_server(abc_config()).await;
    let mut a = server.connect().await;
    assert_eq!(a.login("A", "a").await, "SUCCESS");
    assert_eq!(server.ctx.registry.count(), 1);
}

#[tokio::test]
async fn test_login_with_hashed_password() {
    let mut config = test_config(&[]);
    config.users = vec![chatrelay::config::types::UserConfig {
        username: "hashed".into(),
        password: None,
        password_hash: Some(hash_pass("s3cret")),
    }];
    let server = start_server(config).await;
    let mut client = server.connect().await;
    assert_eq!(client.login("hashed", "s3cret").await, "SUCCESS");
}

#[tokio::test]
async fn test_invalid_password_closes_connection() {
    let server = start_server(abc_config()).await;
    let mut a = server.connect().await;
    assert_eq!(a.login("A", "wrong").await, "INVALID");
    assert!(a.is_closed().await);
    assert_eq!(server.ctx.registry.count(), 0);
}

#[tokio::test]
async fn test_unknown_user_is_invalid() {
    let server = start_server(abc_config()).await;
    let mut client = server.connect().await;
    assert_eq!(client.login("mallory", "x").await, "INVALID");
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn test_duplicate_login_leaves_original_session() {
    let server = start_server(abc_config()).await;
    let mut a = server.login("A", "a").await;

    let mut imposter = server.connect().await;
    assert_eq!(imposter.login("A", "a").await, "ALREADY");
    assert!(imposter.is_closed().await);

    // The first session still receives messages.
    let mut b = server.login("B", "b").await;
    b.send("MESSAGE|A|still there?").await;
    let line = a.recv().await;
    assert!(line.ends_with("[B]: still there?"), "got {line}");
}

#[tokio::test]
async fn test_concurrent_login_race_single_winner() {
    let server = start_server(abc_config()).await;
    let mut clients = Vec::new();
    for _ in 0..8 {
        clients.push(server.connect().await);
    }

    let replies = join_all(clients.iter_mut().map(|c| c.login("A", "a"))).await;
    assert_eq!(replies.iter().filter(|r| *r == "SUCCESS").count(), 1);
    assert_eq!(replies.iter().filter(|r| *r == "ALREADY").count(), 7);

    let winner = replies.iter().position(|r| r == "SUCCESS").unwrap();
    let mut winner = clients.swap_remove(winner);
    winner.send("LOGOUT").await;
    assert!(winner.is_closed().await);

    let mut next = server.connect().await;
    assert_eq!(next.login("A", "a").await, "SUCCESS");
}

#[tokio::test]
async fn test_logout_frees_username() {
    let server = start_server(abc_config()).await;
    let mut a = server.login("A", "a").await;
    a.send("LOGOUT").await;
    assert!(a.is_closed().await);
    assert_eq!(server.ctx.registry.count(), 0);
    let _again = server.login("A", "a").await;
}

#[tokio::test]
async fn test_disconnect_frees_username() {
    let server = start_server(abc_config()).await;
    let a = server.login("A", "a").await;
    drop(a);

    let mut again = server.connect().await;
    let mut reply = again.login("A", "a").await;
    // Teardown of the dropped socket may still be in flight.
    for _ in 0..20 {
        if reply == "SUCCESS" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        again = server.connect().await;
        reply = again.login("A", "a").await;
    }
    assert_eq!(reply, "SUCCESS");
}

#[tokio::test]
async fn test_login_while_authenticated_is_rejected() {
    let server = start_server(abc_config()).await;
    let mut a = server.login("A", "a").await;
    a.send("LOGIN|B|b").await;
    assert_eq!(a.recv().await, "Already logged in as A.");
    assert!(server.ctx.registry.lookup("B").is_none());

    // Session remains usable.
    a.send("/TIME").await;
    assert!(a.recv().await.starts_with("Server time is: "));
}

#[tokio::test]
async fn test_commands_require_login() {
    let server = start_server(abc_config()).await;
    let mut client = server.connect().await;

    client.send("MESSAGE|B|hi").await;
    assert_eq!(client.recv().await, "Not logged in.");
    client.send("LOGOUT").await;
    assert_eq!(client.recv().await, "Not logged in.");

    // Still connected and able to log in.
    assert_eq!(client.login("C", "c").await, "SUCCESS");
}

#[tokio::test]
async fn test_login_log_lists_online_users() {
    use chatrelay::logging::{LogBufferLayer, LogSink};
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    let server = start_server(abc_config()).await;
    let sink = server.ctx.log_buffer.clone() as Arc<dyn LogSink>;
    let subscriber = tracing_subscriber::registry().with(LogBufferLayer::new(sink));
    let _guard = tracing::subscriber::set_default(subscriber);

    let _a = server.login("A", "a").await;
    let _b = server.login("B", "b").await;

    let lines = server.ctx.log_buffer.snapshot();
    let line = lines
        .iter()
        .find(|l| l.contains("User logged in user=B"))
        .expect("no login line for B");
    assert!(line.contains("session{conn_id="), "got {line}");
    assert!(line.ends_with(r#"online=["A", "B"]"#), "got {line}");
}
