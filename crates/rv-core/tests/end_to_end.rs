//! Multi-device integration tests against `MockServer`.
//!
//! Tests cover:
//!  1. Token rotation
//!  2. Allow + register, including the double-registration rejection
//!  3. Topic creation
//!  4. Message round-trip
//!  5. File fetch, including tamper detection
//!  6. Receipt delivery
//!  7. Out-of-order chain reconciliation

use std::sync::{Arc, Mutex};

use rv_core::{AdminClient, ClientConfig, Device, DeviceEvent};
use rv_error::Error;
use rv_proto::Role;
use rv_transport::{MockServer, ServerTransport};

fn config() -> ClientConfig {
    ClientConfig::new("https://test.invalid", "rvtest")
}

async fn register_user(server: &Arc<dyn ServerTransport>, admin: &mut AdminClient, name: &str) -> Device {
    let allowed = admin.allow(name).await.unwrap();
    Device::register(server.clone(), config(), name.to_string(), allowed.pin, 10, 5).await.unwrap()
}

/// Installs an event handler that appends every event to a shared log and
/// returns a handle to read it back after the device call returns.
fn capture_events(device: &mut Device) -> Arc<Mutex<Vec<DeviceEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    device.set_event_handler(Box::new(move |event| sink.lock().unwrap().push(event)));
    log
}

#[tokio::test]
async fn token_rotation_then_allow_and_register() {
    let server: Arc<dyn ServerTransport> = Arc::new(MockServer::new());
    let mut admin = AdminClient::new(server.clone());
    let first = admin.update_admin_token().await.unwrap();
    let second = admin.update_admin_token().await.unwrap();
    assert_ne!(first, second);

    let alice = register_user(&server, &mut admin, "alice").await;
    assert_eq!(alice.user_info().name, "alice");
}

#[tokio::test]
async fn registering_the_same_username_twice_fails() {
    let server: Arc<dyn ServerTransport> = Arc::new(MockServer::new());
    let mut admin = AdminClient::new(server.clone());
    let allowed = admin.allow("bob").await.unwrap();
    Device::register(server.clone(), config(), "bob".into(), allowed.pin, 5, 2).await.unwrap();

    // The allow-list entry is consumed by the first registration; a second
    // attempt has no pin left to present and fails authentication.
    let result = Device::register(server.clone(), config(), "bob".into(), allowed.pin, 5, 2).await;
    assert!(matches!(result, Err(Error::AuthenticationFailed)));
}

#[tokio::test]
async fn topic_creation_delivers_topic_added_to_the_other_member() {
    let server: Arc<dyn ServerTransport> = Arc::new(MockServer::new());
    let mut admin = AdminClient::new(server.clone());
    let mut alice = register_user(&server, &mut admin, "alice").await;
    let mut bob = register_user(&server, &mut admin, "bob").await;

    alice.upload_topic_keys(1).await.unwrap();
    bob.upload_topic_keys(1).await.unwrap();

    let bob_bundle = alice.fetch_single_topic_key(bob.user_public_key()).await.unwrap();
    assert_eq!(bob_bundle.user_key, bob.user_public_key());

    let topic_id = alice.create_topic(&[(bob.user_public_key(), Role::Participant)]).await.unwrap();

    let events = capture_events(&mut bob);
    bob.get_messages().await.unwrap();

    let log = events.lock().unwrap();
    assert!(log.iter().any(|e| matches!(e, DeviceEvent::TopicAdded { topic_id: t } if *t == topic_id)));
    assert!(bob.topic(&topic_id).is_some());
}

#[tokio::test]
async fn message_round_trip_emits_verified_update_received() {
    let server: Arc<dyn ServerTransport> = Arc::new(MockServer::new());
    let mut admin = AdminClient::new(server.clone());
    let mut alice = register_user(&server, &mut admin, "alice").await;
    let mut bob = register_user(&server, &mut admin, "bob").await;
    bob.upload_topic_keys(1).await.unwrap();

    let topic_id = alice.create_topic(&[(bob.user_public_key(), Role::Participant)]).await.unwrap();
    bob.get_messages().await.unwrap();

    alice.upload(topic_id, &[], b"hello bob").await.unwrap();

    let events = capture_events(&mut bob);
    bob.get_messages().await.unwrap();

    let log = events.lock().unwrap();
    let update = log.iter().find_map(|e| match e {
        DeviceEvent::UpdateReceived { update, verified, .. } => Some((update, *verified)),
        _ => None,
    });
    let (update, verified) = update.expect("expected exactly one update_received event");
    assert!(verified);
    assert_eq!(update.metadata, b"hello bob");
    assert_eq!(bob.topic(&topic_id).unwrap().chain_index, 1);
}

#[tokio::test]
async fn out_of_order_updates_reconcile_in_one_batch() {
    let server: Arc<dyn ServerTransport> = Arc::new(MockServer::new());
    let mut admin = AdminClient::new(server.clone());
    let mut alice = register_user(&server, &mut admin, "alice").await;
    let mut bob = register_user(&server, &mut admin, "bob").await;
    bob.upload_topic_keys(1).await.unwrap();

    let topic_id = alice.create_topic(&[(bob.user_public_key(), Role::Participant)]).await.unwrap();
    bob.get_messages().await.unwrap();

    alice.upload(topic_id, &[], b"first").await.unwrap();
    alice.upload(topic_id, &[], b"second").await.unwrap();

    let events = capture_events(&mut bob);
    bob.get_messages().await.unwrap();

    let verified_count = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, DeviceEvent::UpdateReceived { verified: true, .. }))
        .count();
    assert_eq!(verified_count, 2);
    assert_eq!(bob.topic(&topic_id).unwrap().chain_index, 2);
}

#[tokio::test]
async fn file_round_trip_and_tamper_detection() {
    let server: Arc<dyn ServerTransport> = Arc::new(MockServer::new());
    let mut admin = AdminClient::new(server.clone());
    let mut alice = register_user(&server, &mut admin, "alice").await;
    let mut bob = register_user(&server, &mut admin, "bob").await;
    bob.upload_topic_keys(1).await.unwrap();

    let topic_id = alice.create_topic(&[(bob.user_public_key(), Role::Participant)]).await.unwrap();
    bob.get_messages().await.unwrap();

    let file_id = rv_crypto::aead::random_array::<12>();
    alice.upload(topic_id, &[(file_id, b"attachment bytes".to_vec())], b"see attached").await.unwrap();

    let events = capture_events(&mut bob);
    bob.get_messages().await.unwrap();
    let descriptor = events
        .lock()
        .unwrap()
        .iter()
        .find_map(|e| match e {
            DeviceEvent::UpdateReceived { update, .. } => update.files.first().cloned(),
            _ => None,
        })
        .expect("update carried a file descriptor");

    let plaintext = bob.get_file(topic_id, &descriptor).await.unwrap();
    assert_eq!(plaintext, b"attachment bytes");

    let mut tampered = descriptor.clone();
    tampered.hash[0] ^= 0xFF;
    let result = bob.get_file(topic_id, &tampered).await;
    assert!(matches!(result, Err(Error::InvalidFile(_))));
}

#[tokio::test]
async fn receipt_delivers_chain_state_received_to_the_other_member() {
    let server: Arc<dyn ServerTransport> = Arc::new(MockServer::new());
    let mut admin = AdminClient::new(server.clone());
    let mut alice = register_user(&server, &mut admin, "alice").await;
    let mut bob = register_user(&server, &mut admin, "bob").await;
    bob.upload_topic_keys(1).await.unwrap();

    let topic_id = alice.create_topic(&[(bob.user_public_key(), Role::Participant)]).await.unwrap();
    bob.get_messages().await.unwrap();
    alice.upload(topic_id, &[], b"hi").await.unwrap();
    bob.get_messages().await.unwrap();

    bob.send_receipt(topic_id, 1).await.unwrap();

    let events = capture_events(&mut alice);
    alice.get_messages().await.unwrap();

    let log = events.lock().unwrap();
    assert!(log.iter().any(|e| matches!(
        e,
        DeviceEvent::ChainStateReceived { chain_index: 1, sender, .. } if *sender == bob.user_public_key()
    )));
}
