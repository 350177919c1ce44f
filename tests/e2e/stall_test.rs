#[allow(dead_code, unused_imports)]
mod helpers;

use helpers::*;
use std::time::Instant;
use tokio::time::{sleep, Duration};

/// Park B's writer inside a file body that A never finishes.
async fn stall_b(a: &mut TestClient, b: &mut TestClient) {
    a.send("FILE|B|stall.bin|1000").await;
    a.send_raw(&[7u8; 10]).await;
    assert_eq!(b.recv().await, "FILE|A|stall.bin|1000");
}

#[tokio::test]
async fn test_sender_not_blocked_by_stalled_receiver() {
    let server = start_server(abc_config()).await;
    let mut a = server.login("A", "a").await;
    let mut b = server.login("B", "b").await;
    let mut c = server.login("C", "c").await;
    stall_b(&mut a, &mut b).await;

    // More messages than B's outbound queue holds.
    for i in 0..70 {
        c.send(&format!("MESSAGE|B|m{i}")).await;
    }
    c.send("/TIME").await;

    let mut busy = 0;
    loop {
        let reply = c.recv().await;
        if reply.starts_with("Server time is:") {
            break;
        }
        assert_eq!(reply, "Receiver [B] is busy, try again later.");
        busy += 1;
    }
    assert!(busy > 0, "queue never filled");
}

#[tokio::test]
async fn test_relogin_after_drop_while_receiver_stalled() {
    let server = start_server(abc_config()).await;
    let mut a = server.login("A", "a").await;
    let mut b = server.login("B", "b").await;
    let mut c = server.login("C", "c").await;
    stall_b(&mut a, &mut b).await;

    for i in 0..70 {
        c.send(&format!("MESSAGE|B|m{i}")).await;
    }
    drop(c);

    let deadline = Instant::now() + Duration::from_secs(2);
    while server.ctx.registry.lookup("C").is_some() {
        assert!(Instant::now() < deadline, "C never left the registry");
        sleep(Duration::from_millis(20)).await;
    }

    let mut again = loop {
        let mut client = server.connect().await;
        if client.login("C", "c").await == "SUCCESS" {
            break client;
        }
        assert!(Instant::now() < deadline, "C could not log in again");
        sleep(Duration::from_millis(50)).await;
    };
    again.send("/TIME").await;
    assert!(again.recv().await.starts_with("Server time is:"));
}

#[tokio::test]
async fn test_stalled_sender_times_out() {
    let mut config = abc_config();
    config.relay.body_timeout = 1;
    let server = start_server(config).await;
    let mut a = server.login("A", "a").await;
    let mut b = server.login("B", "b").await;
    stall_b(&mut a, &mut b).await;

    let body = b.recv_raw(1000).await;
    assert!(body[..10].iter().all(|&x| x == 7));
    assert!(body[10..].iter().all(|&x| x == 0));
    assert_eq!(b.recv().await, "FILEABORT|A|stall.bin|10");
    assert!(a.is_closed().await);

    b.send("/TIME").await;
    assert!(b.recv().await.starts_with("Server time is:"));
}
