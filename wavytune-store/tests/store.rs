//! End-to-end tests of the store lifecycle through the public API.

use std::sync::mpsc;
use std::time::Duration;

use secrecy::SecretString;
use tempfile::TempDir;

use wavytune_store::{KeyManager, PassphraseSource, Store, StoreConfig, StoreError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn key_manager(material: &str) -> KeyManager {
    KeyManager::new(PassphraseSource::Direct(SecretString::new(
        material.to_owned(),
    )))
}

async fn open(dir: &TempDir, material: &str) -> Result<Store, StoreError> {
    Store::open(
        dir.path().join("wavytune.db"),
        &key_manager(material),
        StoreConfig::default(),
    )
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn open_close_open_preserves_schema_version() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let store = open(&dir, "alpha").await.unwrap();
    let version = store.schema_version();
    assert_eq!(version, Store::supported_schema_version());
    store.settings().put("last_project", "demo.wavy").await.unwrap();
    store.close();
    // close() is idempotent, even from a teardown path.
    store.close();
    drop(store);

    let store = open(&dir, "alpha").await.unwrap();
    assert_eq!(store.schema_version(), version);
    assert_eq!(
        store.settings().get("last_project").await.unwrap().as_deref(),
        Some("demo.wavy"),
    );
    store.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wrong_passphrase_is_wrong_key() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let store = open(&dir, "alpha").await.unwrap();
    store.settings().put("theme", "dark").await.unwrap();
    store.close();
    drop(store);

    match open(&dir, "beta").await {
        Err(StoreError::WrongKey) => {}
        Err(StoreError::Corrupt { reason }) => {
            panic!("wrong passphrase must never be reported as corruption: {reason}")
        }
        other => panic!("expected WrongKey, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn second_opener_is_busy() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let store = open(&dir, "alpha").await.unwrap();
    assert!(matches!(open(&dir, "alpha").await, Err(StoreError::Busy)));
    store.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_passphrase_source_is_key_unavailable() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let keys = KeyManager::new(PassphraseSource::Prompt(Box::new(|| None)));
    let result = Store::open(
        dir.path().join("wavytune.db"),
        &keys,
        StoreConfig::default(),
    )
    .await;
    assert!(matches!(result, Err(StoreError::KeyUnavailable)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_see_pre_write_snapshot_until_commit() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let store = open(&dir, "alpha").await.unwrap();
    store
        .execute(
            "INSERT INTO wavytune_settings (key, value, updated_at)
            VALUES ('volume', '3', DATETIME('now'))",
            [],
        )
        .await
        .unwrap();

    let (in_write_tx, in_write_rx) = mpsc::channel::<()>();

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .write(move |tx| {
                    tx.execute(
                        "UPDATE wavytune_settings SET value = '9' WHERE key = 'volume'",
                        [],
                    )?;
                    in_write_tx.send(()).ok();
                    // Hold the transaction open while the reader looks.
                    std::thread::sleep(Duration::from_millis(300));
                    Ok(())
                })
                .await
        })
    };

    in_write_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("writer never started its transaction");

    // The write transaction is open but uncommitted; a concurrent reader
    // observes the pre-write snapshot.
    let during: String = store
        .read(|conn| {
            conn.query_row(
                "SELECT value FROM wavytune_settings WHERE key = 'volume'",
                [],
                |row| row.get(0),
            )
        })
        .await
        .unwrap();
    assert_eq!(during, "3");

    writer.await.unwrap().unwrap();

    let after: String = store
        .read(|conn| {
            conn.query_row(
                "SELECT value FROM wavytune_settings WHERE key = 'volume'",
                [],
                |row| row.get(0),
            )
        })
        .await
        .unwrap();
    assert_eq!(after, "9");

    store.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rotation_is_refused_while_another_connection_is_live() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let store = open(&dir, "alpha").await.unwrap();

    let (in_read_tx, in_read_rx) = mpsc::channel::<()>();
    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .read(move |conn| {
                    in_read_tx.send(()).ok();
                    std::thread::sleep(Duration::from_millis(300));
                    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                })
                .await
        })
    };

    in_read_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("reader never checked out a connection");

    let alpha = wavytune_store::Passphrase::new(SecretString::new("alpha".into()));
    let beta = wavytune_store::Passphrase::new(SecretString::new("beta".into()));
    assert!(matches!(
        store.rotate_passphrase(&alpha, &beta).await,
        Err(StoreError::RotationConflict)
    ));

    reader.await.unwrap().unwrap();

    // With the reader gone, the same rotation goes through, and the file
    // reopens only under the new passphrase.
    store.rotate_passphrase(&alpha, &beta).await.unwrap();
    store.close();
    drop(store);

    assert!(matches!(open(&dir, "alpha").await, Err(StoreError::WrongKey)));
    let store = open(&dir, "beta").await.unwrap();
    store.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_rotation_leaves_the_original_passphrase_in_effect() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let store = open(&dir, "alpha").await.unwrap();

    let (in_read_tx, in_read_rx) = mpsc::channel::<()>();
    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .read(move |conn| {
                    in_read_tx.send(()).ok();
                    std::thread::sleep(Duration::from_millis(300));
                    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                })
                .await
        })
    };

    in_read_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("reader never checked out a connection");

    let alpha = wavytune_store::Passphrase::new(SecretString::new("alpha".into()));
    let beta = wavytune_store::Passphrase::new(SecretString::new("beta".into()));
    assert!(matches!(
        store.rotate_passphrase(&alpha, &beta).await,
        Err(StoreError::RotationConflict)
    ));

    reader.await.unwrap().unwrap();
    store.close();
    drop(store);

    // The refused rotation left no trace: the attempted passphrase does not
    // open the file, the original one does.
    assert!(matches!(open(&dir, "beta").await, Err(StoreError::WrongKey)));
    let store = open(&dir, "alpha").await.unwrap();
    store.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cache_hit_after_put_needs_no_guarded_read() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let store = open(&dir, "alpha").await.unwrap();
    store.settings().put("tuning", "440").await.unwrap();

    // Closing the pool proves the hit path below never touches the guard.
    store.close();
    assert_eq!(
        store.settings().get("tuning").await.unwrap().as_deref(),
        Some("440"),
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invalidated_keys_fall_through_to_the_database() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let store = open(&dir, "alpha").await.unwrap();
    store.settings().put("theme", "dark").await.unwrap();

    // A write outside the cache's own path, e.g. a bulk import.
    store
        .execute(
            "UPDATE wavytune_settings SET value = 'light' WHERE key = 'theme'",
            [],
        )
        .await
        .unwrap();

    // Stale until invalidated.
    assert_eq!(
        store.settings().get("theme").await.unwrap().as_deref(),
        Some("dark"),
    );
    store.settings().invalidate("theme").await;
    assert_eq!(
        store.settings().get("theme").await.unwrap().as_deref(),
        Some("light"),
    );

    store.close();
}
