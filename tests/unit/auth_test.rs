use chatrelay::auth::{ConfigCredentialStore, CredentialStore, HashCost};
use chatrelay::config::types::UserConfig;

fn hashed(username: &str, password: &str) -> UserConfig {
    UserConfig {
        username: username.into(),
        password: None,
        password_hash: Some(
            HashCost {
                memory_kib: 1024,
                iterations: 1,
                lanes: 1,
            }
            .hash(password)
            .unwrap(),
        ),
    }
}

#[test]
fn test_mixed_plain_and_hashed_users() {
    let store = ConfigCredentialStore::from_config(&[
        UserConfig::with_password("user1", "1"),
        hashed("user2", "2"),
    ])
    .unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.validate("user1", "1"));
    assert!(store.validate("user2", "2"));
    assert!(!store.validate("user1", "2"));
    assert!(!store.validate("user2", "1"));
}

#[test]
fn test_username_is_case_sensitive() {
    let store =
        ConfigCredentialStore::from_config(&[UserConfig::with_password("Alice", "pw")]).unwrap();
    assert!(store.validate("Alice", "pw"));
    assert!(!store.validate("alice", "pw"));
}

#[test]
fn test_empty_password_never_matches_nonempty() {
    let store =
        ConfigCredentialStore::from_config(&[UserConfig::with_password("user1", "1")]).unwrap();
    assert!(!store.validate("user1", ""));
    assert!(!store.validate("", ""));
}

#[test]
fn test_store_is_shareable_across_threads() {
    let store: std::sync::Arc<dyn CredentialStore> = std::sync::Arc::new(
        ConfigCredentialStore::from_config(&[UserConfig::with_password("user1", "1")]).unwrap(),
    );
    let threads: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            std::thread::spawn(move || store.validate("user1", "1"))
        })
        .collect();
    assert!(threads.into_iter().all(|t| t.join().unwrap()));
}
