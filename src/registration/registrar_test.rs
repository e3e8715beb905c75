use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::*;
use crate::test_utils::MemoryBackend;
use crate::CoordClient;
use crate::Coordination;
use crate::MockCoordination;
use crate::NodeConfig;
use crate::StoreError;

fn node_config() -> NodeConfig {
    let mut node = NodeConfig::default();
    node.host = "test-node".to_string();
    node.registration_ttl_secs = 5;
    node
}

fn registrar_over_memory() -> (MemoryBackend, Arc<dyn Coordination>, LeaseRegistrar) {
    let backend = MemoryBackend::new();
    let client: Arc<dyn Coordination> = Arc::new(CoordClient::new(backend.clone()));
    let registrar = LeaseRegistrar::new(Arc::clone(&client), &node_config());
    (backend, client, registrar)
}

async fn wait_for_state(
    mut rx: tokio::sync::watch::Receiver<RegistrarState>,
    expected: RegistrarState,
) {
    let reached = timeout(Duration::from_secs(1), async {
        loop {
            if *rx.borrow() == expected {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    })
    .await;
    assert!(reached.is_ok(), "state {:?} not reached in time", expected);
}

#[tokio::test]
async fn register_should_write_record_and_enter_registered() {
    let (_, client, registrar) = registrar_over_memory();

    registrar.register().await.unwrap();

    assert_eq!(registrar.state(), RegistrarState::Registered);
    assert_ne!(client.lease_id(), 0);

    let entries = client
        .get_entries("/nodebeat/agent/test-node")
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].value, "nodebeat");
}

#[tokio::test]
async fn register_failure_should_revert_to_unregistered_with_context() {
    let mut mock = MockCoordination::new();
    mock.expect_register()
        .returning(|_, _, _| Err(StoreError::Unavailable("store down".into()).into()));

    let client: Arc<dyn Coordination> = Arc::new(mock);
    let registrar = LeaseRegistrar::new(client, &node_config());

    let err = registrar.register().await.unwrap_err();
    assert!(err.to_string().contains("failed to register"));
    assert_eq!(registrar.state(), RegistrarState::Unregistered);
}

#[tokio::test]
async fn lease_expiry_should_transition_registered_to_lost() {
    let (backend, client, registrar) = registrar_over_memory();

    registrar.register().await.unwrap();
    let states = registrar.subscribe();

    // the store expires the lease: keepalive channel closes
    backend.expire_lease(client.lease_id());

    wait_for_state(states, RegistrarState::Lost).await;
}

#[tokio::test]
async fn reregister_after_loss_should_succeed_with_a_fresh_lease() {
    let (backend, client, registrar) = registrar_over_memory();

    registrar.register().await.unwrap();
    let first = client.lease_id();

    backend.expire_lease(first);
    wait_for_state(registrar.subscribe(), RegistrarState::Lost).await;

    // the supervising caller decides to re-register
    registrar.register().await.unwrap();
    assert_eq!(registrar.state(), RegistrarState::Registered);
    assert_ne!(client.lease_id(), first);
}

#[tokio::test]
async fn register_on_a_live_registration_should_be_a_noop() {
    let (_, client, registrar) = registrar_over_memory();

    registrar.register().await.unwrap();
    let first = client.lease_id();

    registrar.register().await.unwrap();
    assert_eq!(registrar.state(), RegistrarState::Registered);
    assert_eq!(client.lease_id(), first, "no new lease granted");
}

#[tokio::test]
async fn quick_deregister_register_cycle_should_stay_registered() {
    let (_, client, registrar) = registrar_over_memory();

    registrar.register().await.unwrap();
    registrar.deregister().await.unwrap();
    registrar.register().await.unwrap();

    // the superseded liveness task gets a chance to observe its closed
    // keepalive channel; it must not flip the fresh registration to Lost
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(registrar.state(), RegistrarState::Registered);
    assert_ne!(client.lease_id(), 0);
}

#[tokio::test]
async fn deregister_should_be_idempotent_and_clean_up() {
    let (backend, _, registrar) = registrar_over_memory();

    registrar.register().await.unwrap();
    assert_eq!(backend.key_count(), 1);

    registrar.deregister().await.unwrap();
    assert_eq!(registrar.state(), RegistrarState::Unregistered);
    assert_eq!(backend.key_count(), 0);
    assert_eq!(backend.lease_count(), 0);

    // repeated call is a no-op
    registrar.deregister().await.unwrap();
    assert_eq!(registrar.state(), RegistrarState::Unregistered);
}

#[tokio::test]
async fn deregister_should_swallow_store_delete_failure() {
    let mut mock = MockCoordination::new();
    mock.expect_register().returning(|_, _, _| {
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        std::mem::forget(_tx);
        Ok(rx)
    });
    mock.expect_lease_id().return_const(7i64);
    mock.expect_deregister()
        .returning(|_| Err(StoreError::Unavailable("store down".into()).into()));

    let client: Arc<dyn Coordination> = Arc::new(mock);
    let registrar = LeaseRegistrar::new(client, &node_config());

    registrar.register().await.unwrap();
    // best-effort: the delete error is absorbed
    registrar.deregister().await.unwrap();
    assert_eq!(registrar.state(), RegistrarState::Unregistered);
}
