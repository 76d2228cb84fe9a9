use ark_std::rand::{rngs::StdRng, SeedableRng};
use greeter_crypto::{
    CircuitArtifacts, FieldElement, Identity, IdentityManager, MemoryNullifierRegistry,
    NullifierRegistry, Signal, SignalProver, SledNullifierRegistry, DEFAULT_TREE_DEPTH,
};
use greeter_relay::{
    prove_greeting, CommitmentSnapshot, GreeterConfig, GreeterRelay, ScopePolicy,
};
use greeter_types::{GreeterError, Rejection};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

static ARTIFACTS: OnceLock<CircuitArtifacts> = OnceLock::new();

fn artifacts() -> &'static CircuitArtifacts {
    ARTIFACTS.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(0x6772_6565_7465_72);
        CircuitArtifacts::setup(DEFAULT_TREE_DEPTH, &mut rng).unwrap()
    })
}

fn prover() -> Arc<SignalProver> {
    Arc::new(SignalProver::new(artifacts()).unwrap())
}

fn member(n: u8) -> Identity {
    IdentityManager::derive(&[n; 65])
}

fn config() -> GreeterConfig {
    let dir = std::env::temp_dir().join(format!("greeter-relay-{}", uuid::Uuid::new_v4()));
    GreeterConfig::with_data_dir(dir)
}

fn relay_with(config: &GreeterConfig, registry: Arc<dyn NullifierRegistry>) -> GreeterRelay {
    GreeterRelay::new(config, artifacts(), registry).unwrap()
}

fn snapshot(members: &[Identity]) -> CommitmentSnapshot {
    CommitmentSnapshot::from_commitments(members.iter().map(|m| m.commitment()).collect())
}

async fn greet(relay: &GreeterRelay, identity: &Identity, message: &str) -> Signal {
    let tree = relay.tree().unwrap();
    let scope = relay.current_scope().unwrap();
    prove_greeting(prover(), identity, tree, message, scope).await.unwrap()
}

#[tokio::test]
async fn test_greeting_is_accepted_once_and_broadcast() {
    let members = [member(1), member(2), member(3)];
    let relay = relay_with(&config(), Arc::new(MemoryNullifierRegistry::new()));
    let root = relay.refresh_snapshot(&snapshot(&members)).unwrap();
    let mut subscription = relay.subscribe();

    let signal = greet(&relay, &members[1], "hello").await;
    assert_eq!(signal.root, root);

    let receipt = relay.submit(signal.clone()).await.unwrap();
    assert_eq!(receipt.sequence, 0);
    assert_eq!(receipt.root, root);
    // Default scope is the snapshot root.
    assert_eq!(receipt.external_nullifier, root);
    assert_eq!(receipt.nullifier_hash, members[1].nullifier_hash(root));

    let event = subscription.recv().await.unwrap();
    assert_eq!(event.message, "hello");
    assert_eq!(event.nullifier_hash, receipt.nullifier_hash);

    assert_eq!(
        relay.submit(signal).await.unwrap_err(),
        Rejection::NullifierAlreadyUsed
    );
    assert_eq!(relay.events_since(0).len(), 1);
    assert!(subscription.try_recv().is_none());
}

#[tokio::test]
async fn test_refresh_makes_old_root_stale() {
    let members = vec![member(4), member(5)];
    let relay = relay_with(&config(), Arc::new(MemoryNullifierRegistry::new()));
    let first = snapshot(&members);
    relay.refresh_snapshot(&first).unwrap();

    let signal = greet(&relay, &members[0], "early").await;
    let new_root = relay
        .refresh_snapshot(&first.with_appended(member(6).commitment()))
        .unwrap();
    assert_ne!(signal.root, new_root);
    assert_eq!(relay.root_history().len(), 0);

    assert_eq!(relay.submit(signal).await.unwrap_err(), Rejection::StaleRoot);
}

#[tokio::test]
async fn test_root_history_keeps_previous_root_trusted() {
    let members = vec![member(7), member(8)];
    let mut config = config();
    config.root_history_size = 1;
    let relay = relay_with(&config, Arc::new(MemoryNullifierRegistry::new()));
    let first = snapshot(&members);
    let old_root = relay.refresh_snapshot(&first).unwrap();

    let signal = greet(&relay, &members[1], "late").await;
    relay
        .refresh_snapshot(&first.with_appended(member(9).commitment()))
        .unwrap();
    assert_eq!(relay.root_history()[0].root, old_root);

    let receipt = relay.submit(signal).await.unwrap();
    assert_eq!(receipt.root, old_root);
    assert_eq!(relay.status().verifier.verifications_passed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replays_accept_exactly_one() {
    let members = [member(10), member(11)];
    let relay = Arc::new(relay_with(&config(), Arc::new(MemoryNullifierRegistry::new())));
    relay.refresh_snapshot(&snapshot(&members)).unwrap();
    let signal = greet(&relay, &members[0], "race").await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let relay = relay.clone();
            let signal = signal.clone();
            tokio::spawn(async move { relay.submit(signal).await })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(rejection) => assert_eq!(rejection, Rejection::NullifierAlreadyUsed),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(relay.events_since(0).len(), 1);
}

#[tokio::test]
async fn test_topic_scope_and_rotation() {
    let members = [member(12), member(13)];
    let mut config = config();
    config.external_nullifier = ScopePolicy::Topic(FieldElement::from(7u64));
    let relay = relay_with(&config, Arc::new(MemoryNullifierRegistry::new()));
    relay.refresh_snapshot(&snapshot(&members)).unwrap();
    assert_eq!(relay.current_scope(), Some(FieldElement::from(7u64)));

    let first = greet(&relay, &members[0], "one").await;
    relay.submit(first).await.unwrap();
    let second = greet(&relay, &members[0], "two").await;
    assert_eq!(
        relay.submit(second).await.unwrap_err(),
        Rejection::NullifierAlreadyUsed
    );

    assert_eq!(relay.rotate_topic(FieldElement::from(8u64)).unwrap(), 1);
    let third = greet(&relay, &members[0], "three").await;
    let receipt = relay.submit(third).await.unwrap();
    assert_eq!(receipt.external_nullifier, FieldElement::from(8u64));
    assert_eq!(receipt.sequence, 1);
}

#[tokio::test]
async fn test_sled_registry_rejects_replay() {
    let members = [member(14), member(15)];
    let registry = Arc::new(SledNullifierRegistry::temporary().unwrap());
    let relay = relay_with(&config(), registry.clone());
    relay.refresh_snapshot(&snapshot(&members)).unwrap();

    let signal = greet(&relay, &members[1], "persisted").await;
    let receipt = relay.submit(signal.clone()).await.unwrap();
    assert!(registry
        .contains(receipt.nullifier_hash, receipt.external_nullifier)
        .unwrap());
    assert_eq!(
        relay.submit(signal).await.unwrap_err(),
        Rejection::NullifierAlreadyUsed
    );
}

#[tokio::test]
async fn test_abandoned_submit_still_broadcasts() {
    let members = [member(16), member(17)];
    let relay = relay_with(&config(), Arc::new(MemoryNullifierRegistry::new()));
    relay.refresh_snapshot(&snapshot(&members)).unwrap();
    let mut subscription = relay.subscribe();
    let signal = greet(&relay, &members[0], "impatient").await;

    let abandoned = tokio::time::timeout(Duration::ZERO, relay.submit(signal.clone())).await;
    assert!(abandoned.is_err());

    let event = subscription.recv().await.unwrap();
    assert_eq!(event.message, "impatient");
    assert_eq!(relay.events_since(0).len(), 1);
    assert_eq!(
        relay.submit(signal).await.unwrap_err(),
        Rejection::NullifierAlreadyUsed
    );
}

#[tokio::test]
async fn test_expired_root_scopes_are_retired() {
    let members = vec![member(18), member(19)];
    let registry = Arc::new(MemoryNullifierRegistry::new());
    let mut config = config();
    config.root_history_size = 1;
    let relay = relay_with(&config, registry.clone());

    let first = snapshot(&members);
    let first_root = relay.refresh_snapshot(&first).unwrap();
    relay
        .submit(greet(&relay, &members[0], "epoch one").await)
        .await
        .unwrap();
    assert_eq!(registry.len_for_scope(first_root).unwrap(), 1);

    // Still inside the window after one refresh.
    let second = first.with_appended(member(20).commitment());
    relay.refresh_snapshot(&second).unwrap();
    assert_eq!(registry.len_for_scope(first_root).unwrap(), 1);

    relay
        .refresh_snapshot(&second.with_appended(member(21).commitment()))
        .unwrap();
    assert_eq!(registry.len_for_scope(first_root).unwrap(), 0);
}

#[tokio::test]
async fn test_refresh_without_window_retires_previous_scope() {
    let members = vec![member(22), member(23)];
    let registry = Arc::new(MemoryNullifierRegistry::new());
    let relay = relay_with(&config(), registry.clone());

    let first = snapshot(&members);
    let first_root = relay.refresh_snapshot(&first).unwrap();
    relay
        .submit(greet(&relay, &members[1], "short epoch").await)
        .await
        .unwrap();

    relay
        .refresh_snapshot(&first.with_appended(member(24).commitment()))
        .unwrap();
    assert_eq!(registry.len_for_scope(first_root).unwrap(), 0);
}

#[tokio::test]
async fn test_rotation_leaves_no_entries_in_old_topic() {
    let members = [member(25), member(26)];
    let old_topic = FieldElement::from(70u64);
    let registry = Arc::new(MemoryNullifierRegistry::new());
    let mut config = config();
    config.external_nullifier = ScopePolicy::Topic(old_topic);
    let relay = relay_with(&config, registry.clone());
    relay.refresh_snapshot(&snapshot(&members)).unwrap();
    let signal = greet(&relay, &members[0], "in flight").await;

    // Rotate while the verification may still be running.
    let abandoned = tokio::time::timeout(Duration::ZERO, relay.submit(signal)).await;
    assert!(abandoned.is_err());
    relay.rotate_topic(FieldElement::from(71u64)).unwrap();

    for _ in 0..500 {
        let stats = relay.status().verifier;
        if stats.verifications_passed + stats.verifications_failed == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let stats = relay.status().verifier;
    assert_eq!(stats.verifications_passed + stats.verifications_failed, 1);
    assert_eq!(registry.len_for_scope(old_topic).unwrap(), 0);
}

#[tokio::test]
async fn test_dropped_subscription_unsubscribes() {
    let relay = relay_with(&config(), Arc::new(MemoryNullifierRegistry::new()));
    let subscription = relay.subscribe();
    assert_eq!(relay.subscriber_count(), 1);
    drop(subscription);
    assert_eq!(relay.subscriber_count(), 0);
}

#[tokio::test]
async fn test_submit_without_snapshot_is_internal() {
    let relay = relay_with(&config(), Arc::new(MemoryNullifierRegistry::new()));
    let signal = Signal {
        message: b"x".to_vec(),
        root: FieldElement::from(1u64),
        nullifier_hash: FieldElement::from(2u64),
        proof: greeter_crypto::ProofBytes::from_vec(vec![0u8; 128]),
    };
    assert!(matches!(
        relay.submit(signal).await,
        Err(Rejection::Internal(_))
    ));
}

#[test]
fn test_depth_mismatch_is_config_error() {
    let mut config = config();
    config.tree_depth = 10;
    let result = GreeterRelay::new(&config, artifacts(), Arc::new(MemoryNullifierRegistry::new()));
    assert!(matches!(result, Err(GreeterError::Config(_))));
}
