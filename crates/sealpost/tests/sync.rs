//! Keyring sync through the `syncHandler` channel, and persistence across
//! restarts.

use std::sync::Arc;

use sealpost::core::KeyringId;
use sealpost::store::SqliteStore;
use sealpost::sync::{StepOutcome, SyncEventKind, SyncOptions, SyncOutcome};
use sealpost::{Message, SealpostConfig};
use sealpost_testkit::{Page, TestApp};

const ALICE: &str = "Alice <alice@example.org>";

/// Wait until the handler page's instance has bound the transport.
async fn wait_bound(app: &TestApp) {
    let transport = app.app.context().channel_transport().clone();
    for _ in 0..100 {
        if transport.is_bound() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("sync handler never bound");
}

/// Answer sync events like a provider page backed by one stored blob.
async fn serve(
    app: &TestApp,
    page: &mut Page,
    stored: &mut Option<(String, String)>,
    events: usize,
) {
    for _ in 0..events {
        let Some(Message::SyncEvent {
            kind,
            id,
            payload,
            ..
        }) = page.recv().await
        else {
            panic!("sync event expected");
        };
        let done = match kind {
            SyncEventKind::Download => Message::SyncDone {
                id,
                version: stored.as_ref().map(|(v, _)| v.clone()),
                payload: stored.as_ref().map(|(_, p)| p.clone()),
                error: None,
            },
            SyncEventKind::Upload => {
                let next = stored
                    .as_ref()
                    .and_then(|(v, _)| v.trim_start_matches('v').parse::<u32>().ok())
                    .map_or(1, |n| n + 1);
                let version = format!("v{next}");
                *stored = Some((version.clone(), payload.unwrap_or_default()));
                Message::SyncDone {
                    id,
                    version: Some(version),
                    payload: None,
                    error: None,
                }
            }
            other => panic!("unexpected sync event {other:?}"),
        };
        page.send(&app.app, done);
    }
}

#[tokio::test]
async fn test_sync_round_trip_over_channel() {
    let app = TestApp::over_channel().await;
    let key = app.add_key(ALICE, "secret").await;
    app.app
        .context()
        .cache()
        .set(key.primary_key_id(), None, "secret", None, None);

    let mut handler = app.open("syncHandler-sync").unwrap();
    wait_bound(&app).await;
    let context = app.app.context().clone();
    let cycle = tokio::spawn(async move {
        context
            .trigger_sync(&KeyringId::main(), SyncOptions::default())
            .await
    });

    let mut stored = None;
    serve(&app, &mut handler, &mut stored, 2).await;

    let SyncOutcome::Completed(reports) = cycle.await.unwrap().unwrap() else {
        panic!("nothing else was running");
    };
    assert_eq!(reports[0].download, StepOutcome::NotNeeded);
    assert_eq!(reports[0].upload, StepOutcome::Applied);

    let keyring = app.app.context().default_keyring().await.unwrap();
    assert_eq!(keyring.change_log().remote_version().as_deref(), Some("v1"));
    assert!(stored.unwrap().1.starts_with("-----BEGIN SEALPOST MESSAGE-----"));
}

#[tokio::test]
async fn test_sync_handler_init_starts_a_cycle() {
    let app = TestApp::over_channel().await;
    app.add_key(ALICE, "secret").await;

    let mut handler = app.open("syncHandler-init").unwrap();
    handler.send(&app.app, Message::SyncHandlerInit);

    let Some(Message::SyncEvent { kind, id, .. }) = handler.recv().await else {
        panic!("download request expected");
    };
    assert_eq!(kind, SyncEventKind::Download);
    handler.send(
        &app.app,
        Message::SyncDone {
            id,
            version: None,
            payload: None,
            error: None,
        },
    );

    // the signing key is locked and nothing is cached: no upload
    let transport = app.app.context().channel_transport().clone();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(transport.in_flight(), 0);
    assert!(handler.drain().is_empty());
}

#[tokio::test]
async fn test_provider_error_fails_the_step() {
    let app = TestApp::over_channel().await;
    let key = app.add_key(ALICE, "secret").await;
    app.app
        .context()
        .cache()
        .set(key.primary_key_id(), None, "secret", None, None);

    let mut handler = app.open("syncHandler-err").unwrap();
    wait_bound(&app).await;
    let context = app.app.context().clone();
    let cycle = tokio::spawn(async move {
        context
            .trigger_sync(&KeyringId::main(), SyncOptions::default())
            .await
    });

    for _ in 0..2 {
        let Some(Message::SyncEvent { id, .. }) = handler.recv().await else {
            panic!("sync event expected");
        };
        handler.send(
            &app.app,
            Message::SyncDone {
                id,
                version: None,
                payload: None,
                error: Some("offline".into()),
            },
        );
    }

    let SyncOutcome::Completed(reports) = cycle.await.unwrap().unwrap() else {
        panic!("nothing else was running");
    };
    assert!(matches!(reports[0].download, StepOutcome::Failed(_)));
    assert!(matches!(reports[0].upload, StepOutcome::Failed(_)));
    // still pending for the next cycle
    let keyring = app.app.context().default_keyring().await.unwrap();
    assert!(keyring.change_log().is_modified());
}

#[tokio::test]
async fn test_without_handler_sync_fails_fast() {
    let app = TestApp::over_channel().await;
    let key = app.add_key(ALICE, "secret").await;
    app.app
        .context()
        .cache()
        .set(key.primary_key_id(), None, "secret", None, None);

    let outcome = app
        .app
        .context()
        .trigger_sync(&KeyringId::main(), SyncOptions::default())
        .await
        .unwrap();
    let SyncOutcome::Completed(reports) = outcome else {
        panic!("nothing else was running");
    };
    assert!(matches!(reports[0].download, StepOutcome::Failed(_)));
}

#[tokio::test]
async fn test_keys_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sealpost.db");

    let fingerprint = {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let app = TestApp::build(SealpostConfig::default(), store, None).await;
        let key = app.add_key(ALICE, "secret").await;
        key.fingerprint()
    };

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let app = TestApp::build(SealpostConfig::default(), store, None).await;
    let keyring = app.app.context().default_keyring().await.unwrap();
    let key = keyring.key_by_fingerprint(&fingerprint).await.unwrap().unwrap();
    assert!(key.is_private());
    assert!(keyring.change_log().change_log().get(&fingerprint).is_some());
}
