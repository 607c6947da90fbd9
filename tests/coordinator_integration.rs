//! Coordinator integration tests.
//!
//! These tests drive several coordinators sharing one store, the way
//! independent processes would share a remote key-value store.

use std::sync::Arc;

use chrono::Duration;
use kv_session::session::NullEventSink;
use kv_session::{
    Clock, CoordinatorConfig, InMemoryStore, InitState, KeyValueStore, LockOutcome, ManualClock,
    SessionCoordinator, SessionData, SessionId, SessionRecord, WriteOutcome,
};

struct Cluster {
    store: Arc<InMemoryStore>,
    clock: ManualClock,
}

impl Cluster {
    fn new() -> Self {
        let clock = ManualClock::default();
        let store = Arc::new(InMemoryStore::with_clock(Arc::new(clock.clone())));
        Self { store, clock }
    }

    fn coordinator(&self, app: &str) -> SessionCoordinator<InMemoryStore> {
        SessionCoordinator::new(Arc::clone(&self.store), CoordinatorConfig::new(app))
            .with_clock(Arc::new(self.clock.clone()))
            .with_event_sink(Arc::new(NullEventSink))
    }

    async fn record(&self, id: &str) -> Option<SessionRecord> {
        let found = self.store.get(id).await.unwrap()?;
        Some(serde_json::from_slice(&found.value).unwrap())
    }
}

fn sid(s: &str) -> SessionId {
    SessionId::new(s).unwrap()
}

// ============================================================================
// Lifecycle Scenarios
// ============================================================================

#[tokio::test]
async fn test_two_caller_handoff() {
    let cluster = Cluster::new();
    let first = cluster.coordinator("app");
    let second = cluster.coordinator("app");
    let id = sid("s1");

    assert_eq!(
        first.create_uninitialized(&id, 20).await.unwrap(),
        WriteOutcome::Ok
    );

    let token = first
        .get_item_exclusive(&id)
        .await
        .unwrap()
        .lock_token()
        .expect("first caller acquires");
    assert_eq!(token, 1);

    assert_eq!(
        second.get_item_exclusive(&id).await.unwrap(),
        LockOutcome::Locked {
            lock_age: Duration::zero(),
            lock_token: 1,
        }
    );

    let data = first.create_new(20).with_items(b"visits=1".to_vec());
    assert_eq!(
        first.set_and_release(&id, token, data, false).await.unwrap(),
        WriteOutcome::Ok
    );

    match second.get_item_exclusive(&id).await.unwrap() {
        LockOutcome::Acquired {
            data,
            lock_token,
            actions,
        } => {
            assert_eq!(lock_token, 2);
            assert_eq!(data.items.as_bytes(), b"visits=1");
            assert_eq!(actions, InitState::Initialized);
        }
        other => panic!("expected Acquired, got {other:?}"),
    }
}

#[tokio::test]
async fn test_new_session_round_trip() {
    let cluster = Cluster::new();
    let sessions = cluster.coordinator("shop");
    let id = sid("fresh");

    assert_eq!(
        sessions.get_item_exclusive(&id).await.unwrap(),
        LockOutcome::NotFound
    );

    let data = sessions.create_new(20).with_items(b"cart=[42]".to_vec());
    assert_eq!(
        sessions.set_and_release(&id, 0, data, true).await.unwrap(),
        WriteOutcome::Ok
    );

    let record = cluster.record("fresh").await.expect("record stored");
    assert_eq!(record.payload.as_bytes(), b"cart=[42]");
    assert_eq!(record.application_name, "shop");
    assert!(!record.locked);
    assert_eq!(record.expires_at, cluster.clock.now() + Duration::minutes(20));
}

#[tokio::test]
async fn test_remove_with_stale_token_keeps_lock() {
    let cluster = Cluster::new();
    let sessions = cluster.coordinator("app");
    let id = sid("s1");
    sessions.create_uninitialized(&id, 20).await.unwrap();
    sessions.get_item_exclusive(&id).await.unwrap();
    sessions.release(&id, 1).await.unwrap();
    sessions.get_item_exclusive(&id).await.unwrap();

    assert_eq!(
        sessions.remove_item(&id, 1).await.unwrap(),
        WriteOutcome::TokenMismatch
    );

    let record = cluster.record("s1").await.expect("record still present");
    assert!(record.locked);
    assert_eq!(record.lock_token, 2);
}

#[tokio::test]
async fn test_forced_release_after_abandoned_lock() {
    let cluster = Cluster::new();
    let crashed = cluster.coordinator("app");
    let survivor = cluster.coordinator("app");
    let id = sid("s1");
    crashed.create_uninitialized(&id, 20).await.unwrap();
    crashed.get_item_exclusive(&id).await.unwrap();

    // The holder never comes back; the lock ages.
    cluster.clock.advance(Duration::seconds(120));
    let (lock_age, lock_token) = match survivor.get_item_exclusive(&id).await.unwrap() {
        LockOutcome::Locked {
            lock_age,
            lock_token,
        } => (lock_age, lock_token),
        other => panic!("expected Locked, got {other:?}"),
    };
    assert_eq!(lock_age, Duration::seconds(120));

    assert_eq!(
        survivor.release(&id, lock_token).await.unwrap(),
        WriteOutcome::Ok
    );
    assert_eq!(
        survivor.get_item_exclusive(&id).await.unwrap().lock_token(),
        Some(lock_token + 1)
    );
}

#[tokio::test]
async fn test_expired_session_can_be_recreated() {
    let cluster = Cluster::new();
    let sessions = cluster.coordinator("app");
    let id = sid("s1");
    sessions.create_uninitialized(&id, 1).await.unwrap();

    cluster.clock.advance(Duration::minutes(5));
    assert_eq!(
        sessions.get_item(&id).await.unwrap(),
        LockOutcome::NotFound
    );
    assert_eq!(
        sessions
            .set_and_release(&id, 0, SessionData::new(20), true)
            .await
            .unwrap(),
        WriteOutcome::Ok
    );
}

#[tokio::test]
async fn test_reset_timeout_slides_expiry() {
    let cluster = Cluster::new();
    let sessions = cluster.coordinator("app");
    let id = sid("s1");
    sessions.create_uninitialized(&id, 10).await.unwrap();

    // Keep the session alive past its original window.
    for _ in 0..3 {
        cluster.clock.advance(Duration::minutes(8));
        assert_eq!(sessions.reset_timeout(&id).await.unwrap(), WriteOutcome::Ok);
    }

    let record = cluster.record("s1").await.expect("still alive");
    assert_eq!(record.expires_at, cluster.clock.now() + Duration::minutes(10));
}

// ============================================================================
// Contention
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_single_winner() {
    let cluster = Cluster::new();
    let id = sid("hot");
    cluster
        .coordinator("app")
        .create_uninitialized(&id, 20)
        .await
        .unwrap();

    let mut handles = vec![];
    for _ in 0..16 {
        let coordinator = cluster.coordinator("app");
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            coordinator.get_item_exclusive(&id).await.unwrap()
        }));
    }

    let mut winners = vec![];
    for handle in handles {
        let outcome = handle.await.unwrap();
        match outcome {
            LockOutcome::Acquired { lock_token, .. } => winners.push(lock_token),
            LockOutcome::Locked { .. } => {}
            LockOutcome::NotFound => panic!("session vanished"),
        }
    }

    assert_eq!(winners, vec![1]);
    let record = cluster.record("hot").await.unwrap();
    assert!(record.locked);
    assert_eq!(record.lock_token, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_contending_writers_serialize() {
    let cluster = Cluster::new();
    let id = sid("counter");
    let seed = cluster.coordinator("app");
    seed.set_and_release(&id, 0, SessionData::new(20).with_items(vec![0]), true)
        .await
        .unwrap();

    let mut handles = vec![];
    for _ in 0..8 {
        let coordinator = cluster.coordinator("app");
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            loop {
                match coordinator.get_item_exclusive(&id).await.unwrap() {
                    LockOutcome::Acquired {
                        data, lock_token, ..
                    } => {
                        let next = data.items.as_bytes()[0] + 1;
                        let data = data.with_items(vec![next]);
                        let outcome = coordinator
                            .set_and_release(&id, lock_token, data, false)
                            .await
                            .unwrap();
                        assert_eq!(outcome, WriteOutcome::Ok);
                        return;
                    }
                    LockOutcome::Locked { .. } => tokio::task::yield_now().await,
                    LockOutcome::NotFound => panic!("session vanished"),
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let record = cluster.record("counter").await.unwrap();
    assert_eq!(record.payload.as_bytes(), &[8]);
    assert_eq!(record.lock_token, 8);
    assert!(!record.locked);
}

// ============================================================================
// Application Namespaces
// ============================================================================

#[tokio::test]
async fn test_applications_do_not_see_each_other() {
    let cluster = Cluster::new();
    let shop = cluster.coordinator("shop");
    let blog = cluster.coordinator("blog");
    let id = sid("shared-id");

    shop.create_uninitialized(&id, 20).await.unwrap();

    assert_eq!(blog.get_item(&id).await.unwrap(), LockOutcome::NotFound);
    assert_eq!(blog.release(&id, 0).await.unwrap(), WriteOutcome::NotFound);
    assert_eq!(
        blog.create_uninitialized(&id, 20).await.unwrap(),
        WriteOutcome::Conflict
    );
    assert!(shop.get_item(&id).await.unwrap().lock_token().is_some());
}
