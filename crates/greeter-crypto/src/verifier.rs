//! Signal verification with nullifier bookkeeping.
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. proof bytes decode ([`Rejection::MalformedProof`])
//! 2. Groth16 verification over `(root, nullifier_hash, signal_hash, external_nullifier)`
//!    ([`Rejection::InvalidProof`])
//! 3. the signal's root is the expected root or a trusted recent one
//!    ([`Rejection::StaleRoot`])
//! 4. the nullifier hash is unspent in its scope ([`Rejection::NullifierAlreadyUsed`])
//!
//! Step 4 is the registry's atomic check-and-insert, so acceptance and
//! recording happen together and a rejected signal never touches the
//! registry.

use ark_bn254::Bn254;
use ark_groth16::{Groth16, PreparedVerifyingKey};
use ark_snark::SNARK;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

use crate::artifacts::CircuitArtifacts;
use crate::circuit::public_inputs;
use crate::field::FieldElement;
use crate::nullifier::NullifierRegistry;
use crate::signal::Signal;
use greeter_types::Rejection;

/// Upper bound on the trusted-root window.
pub const MAX_TRUSTED_ROOTS: usize = 256;

/// Outcome of a successful verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accepted {
    /// Hash now recorded as spent.
    pub nullifier_hash: FieldElement,
    /// Scope it was recorded under.
    pub external_nullifier: FieldElement,
    /// Root the proof was checked against.
    pub root: FieldElement,
}

/// Counters since the verifier was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierStats {
    /// Signals accepted.
    pub verifications_passed: u64,
    /// Signals rejected for any reason.
    pub verifications_failed: u64,
    /// Superseded roots currently trusted.
    pub trusted_roots: usize,
}

/// Checks signals against a prepared verifying key.
pub struct SignalVerifier {
    prepared: PreparedVerifyingKey<Bn254>,
    /// Recently superseded roots still accepted, oldest first.
    trusted_roots: RwLock<VecDeque<FieldElement>>,
    root_window: usize,
    verifications_passed: AtomicU64,
    verifications_failed: AtomicU64,
}

impl SignalVerifier {
    /// Verifier that trusts only the root passed to each call.
    pub fn new(artifacts: &CircuitArtifacts) -> Self {
        Self::with_root_window(artifacts, 0)
    }

    /// Verifier that also accepts up to `root_window` previously trusted roots.
    pub fn with_root_window(artifacts: &CircuitArtifacts, root_window: usize) -> Self {
        let root_window = root_window.min(MAX_TRUSTED_ROOTS);
        Self {
            prepared: artifacts.prepared.clone(),
            trusted_roots: RwLock::new(VecDeque::with_capacity(root_window)),
            root_window,
            verifications_passed: AtomicU64::new(0),
            verifications_failed: AtomicU64::new(0),
        }
    }

    /// Keep accepting proofs made against `root` after it is superseded.
    ///
    /// Returns the root that stopped being trusted as a result: the oldest
    /// one once the window is full, or `root` itself with an empty window.
    pub fn trust_root(&self, root: FieldElement) -> Option<FieldElement> {
        if self.root_window == 0 {
            return Some(root);
        }
        let mut roots = self.trusted_roots.write();
        if roots.contains(&root) {
            return None;
        }
        let evicted = if roots.len() >= self.root_window {
            roots.pop_front()
        } else {
            None
        };
        roots.push_back(root);
        debug!(root = %root, window = roots.len(), "Trusting root");
        evicted
    }

    /// Whether a proof against `root` may be accepted right now.
    pub fn is_trusted(&self, root: FieldElement, expected_root: FieldElement) -> bool {
        root == expected_root || self.trusted_roots.read().contains(&root)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> VerifierStats {
        VerifierStats {
            verifications_passed: self.verifications_passed.load(Ordering::Relaxed),
            verifications_failed: self.verifications_failed.load(Ordering::Relaxed),
            trusted_roots: self.trusted_roots.read().len(),
        }
    }

    /// Verify `signal` and, on success, spend its nullifier hash in `registry`.
    pub fn verify(
        &self,
        signal: &Signal,
        expected_root: FieldElement,
        external_nullifier: FieldElement,
        registry: &dyn NullifierRegistry,
    ) -> Result<Accepted, Rejection> {
        match self.run_checks(signal, expected_root, external_nullifier, registry) {
            Ok(accepted) => {
                self.verifications_passed.fetch_add(1, Ordering::Relaxed);
                info!(
                    nullifier_hash = %accepted.nullifier_hash,
                    root = %accepted.root,
                    "Signal accepted"
                );
                Ok(accepted)
            }
            Err(rejection) => {
                self.verifications_failed.fetch_add(1, Ordering::Relaxed);
                match &rejection {
                    Rejection::Internal(detail) => {
                        error!(detail = %detail, "Signal verification failed internally")
                    }
                    other => warn!(
                        reason = other.code(),
                        nullifier_hash = %signal.nullifier_hash,
                        "Signal rejected"
                    ),
                }
                Err(rejection)
            }
        }
    }

    fn run_checks(
        &self,
        signal: &Signal,
        expected_root: FieldElement,
        external_nullifier: FieldElement,
        registry: &dyn NullifierRegistry,
    ) -> Result<Accepted, Rejection> {
        let proof = signal
            .proof
            .decode()
            .map_err(|e| Rejection::MalformedProof(e.to_string()))?;

        let inputs = public_inputs(
            signal.root,
            signal.nullifier_hash,
            signal.signal_hash(),
            external_nullifier,
        );
        let valid = Groth16::<Bn254>::verify_with_processed_vk(&self.prepared, &inputs, &proof)
            .map_err(|e| Rejection::Internal(format!("pairing check failed: {}", e)))?;
        if !valid {
            return Err(Rejection::InvalidProof);
        }

        if !self.is_trusted(signal.root, expected_root) {
            return Err(Rejection::StaleRoot);
        }

        let inserted = registry
            .check_and_insert(signal.nullifier_hash, external_nullifier)
            .map_err(|e| Rejection::Internal(e.to_string()))?;
        if !inserted {
            return Err(Rejection::NullifierAlreadyUsed);
        }

        Ok(Accepted {
            nullifier_hash: signal.nullifier_hash,
            external_nullifier,
            root: signal.root,
        })
    }
}

impl std::fmt::Debug for SignalVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalVerifier")
            .field("root_window", &self.root_window)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Identity, IdentityManager};
    use crate::merkle::MembershipTree;
    use crate::nullifier::MemoryNullifierRegistry;
    use crate::prover::SignalProver;
    use crate::signal::ProofBytes;
    use crate::test_support::artifacts;
    use greeter_types::GreeterResult;
    use std::sync::{Arc, Barrier};

    struct Fixture {
        identity: Identity,
        group: Vec<FieldElement>,
        tree: MembershipTree,
        topic: FieldElement,
        prover: SignalProver,
        verifier: SignalVerifier,
    }

    fn fixture() -> Fixture {
        let identity = IdentityManager::derive(b"verifier test signature");
        let c0 = IdentityManager::derive(b"member zero").commitment();
        let c2 = IdentityManager::derive(b"member two").commitment();
        let group = vec![c0, identity.commitment(), c2];
        let tree = MembershipTree::build(&group).unwrap();
        Fixture {
            identity,
            group,
            tree,
            topic: FieldElement::from(0x746f706963u64),
            prover: SignalProver::new(artifacts()).unwrap(),
            verifier: SignalVerifier::new(artifacts()),
        }
    }

    fn greet(f: &Fixture, message: &[u8]) -> Signal {
        let proof = f.tree.prove_inclusion(f.identity.commitment()).unwrap();
        f.prover.prove(&f.identity, &proof, message, f.topic).unwrap()
    }

    #[test]
    fn test_accept_then_replay() {
        let f = fixture();
        let registry = MemoryNullifierRegistry::new();
        let signal = greet(&f, b"Hello world");

        let accepted = f
            .verifier
            .verify(&signal, f.tree.root(), f.topic, &registry)
            .unwrap();
        assert_eq!(accepted.nullifier_hash, f.identity.nullifier_hash(f.topic));
        assert_eq!(accepted.root, f.tree.root());
        assert!(registry.contains(signal.nullifier_hash, f.topic).unwrap());

        let replay = f.verifier.verify(&signal, f.tree.root(), f.topic, &registry);
        assert_eq!(replay, Err(Rejection::NullifierAlreadyUsed));

        let stats = f.verifier.stats();
        assert_eq!(stats.verifications_passed, 1);
        assert_eq!(stats.verifications_failed, 1);
    }

    #[test]
    fn test_second_message_same_scope_rejected() {
        let f = fixture();
        let registry = MemoryNullifierRegistry::new();

        let first = greet(&f, b"first");
        let second = greet(&f, b"second");
        assert_eq!(first.nullifier_hash, second.nullifier_hash);

        // Submission order does not matter: whichever lands first wins.
        assert!(f.verifier.verify(&second, f.tree.root(), f.topic, &registry).is_ok());
        assert_eq!(
            f.verifier.verify(&first, f.tree.root(), f.topic, &registry),
            Err(Rejection::NullifierAlreadyUsed)
        );
    }

    #[test]
    fn test_message_binding() {
        let f = fixture();
        let registry = MemoryNullifierRegistry::new();
        let mut signal = greet(&f, b"Hello world");
        signal.message = b"Goodbye world".to_vec();

        assert_eq!(
            f.verifier.verify(&signal, f.tree.root(), f.topic, &registry),
            Err(Rejection::InvalidProof)
        );
        assert_eq!(registry.len_for_scope(f.topic).unwrap(), 0);
    }

    #[test]
    fn test_wrong_scope_or_nullifier_invalid() {
        let f = fixture();
        let registry = MemoryNullifierRegistry::new();
        let signal = greet(&f, b"Hello world");

        assert_eq!(
            f.verifier
                .verify(&signal, f.tree.root(), FieldElement::from(1u64), &registry),
            Err(Rejection::InvalidProof)
        );

        let mut forged = signal.clone();
        forged.nullifier_hash = FieldElement::from(1234u64);
        assert_eq!(
            f.verifier.verify(&forged, f.tree.root(), f.topic, &registry),
            Err(Rejection::InvalidProof)
        );
    }

    #[test]
    fn test_stale_root() {
        let f = fixture();
        let registry = MemoryNullifierRegistry::new();
        let signal = greet(&f, b"Hello world");

        let mut grown = f.group.clone();
        grown.push(IdentityManager::derive(b"late joiner").commitment());
        let new_tree = MembershipTree::build(&grown).unwrap();

        assert_eq!(
            f.verifier.verify(&signal, new_tree.root(), f.topic, &registry),
            Err(Rejection::StaleRoot)
        );
        assert!(!registry.contains(signal.nullifier_hash, f.topic).unwrap());

        // With the old root inside the trusted window the same signal passes.
        let windowed = SignalVerifier::with_root_window(artifacts(), 4);
        windowed.trust_root(f.tree.root());
        assert!(windowed
            .verify(&signal, new_tree.root(), f.topic, &registry)
            .is_ok());
    }

    #[test]
    fn test_invalid_proof_checked_before_root() {
        let f = fixture();
        let registry = MemoryNullifierRegistry::new();
        let mut signal = greet(&f, b"Hello world");
        signal.message = b"tampered".to_vec();

        let unrelated_root = FieldElement::from(5u64);
        assert_eq!(
            f.verifier.verify(&signal, unrelated_root, f.topic, &registry),
            Err(Rejection::InvalidProof)
        );
    }

    #[test]
    fn test_malformed_proof() {
        let f = fixture();
        let registry = MemoryNullifierRegistry::new();
        let mut signal = greet(&f, b"Hello world");

        signal.proof = ProofBytes::from_vec(signal.proof.as_bytes()[..100].to_vec());
        assert!(matches!(
            f.verifier.verify(&signal, f.tree.root(), f.topic, &registry),
            Err(Rejection::MalformedProof(_))
        ));

        signal.proof = ProofBytes::from_vec(vec![0xff; crate::signal::PROOF_SIZE]);
        assert!(matches!(
            f.verifier.verify(&signal, f.tree.root(), f.topic, &registry),
            Err(Rejection::MalformedProof(_))
        ));
    }

    #[test]
    fn test_concurrent_replay_single_winner() {
        let f = fixture();
        let signal = greet(&f, b"Hello world");
        let root = f.tree.root();
        let topic = f.topic;

        let verifier = Arc::new(f.verifier);
        let registry = Arc::new(MemoryNullifierRegistry::new());
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let verifier = verifier.clone();
                let registry = registry.clone();
                let barrier = barrier.clone();
                let signal = signal.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    verifier.verify(&signal, root, topic, registry.as_ref())
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .filter(|o| o.is_err())
            .all(|o| *o == Err(Rejection::NullifierAlreadyUsed)));
    }

    struct BrokenRegistry;

    impl NullifierRegistry for BrokenRegistry {
        fn check_and_insert(&self, _: FieldElement, _: FieldElement) -> GreeterResult<bool> {
            Err(greeter_types::GreeterError::Storage("disk full".into()))
        }
        fn contains(&self, _: FieldElement, _: FieldElement) -> GreeterResult<bool> {
            Ok(false)
        }
        fn len_for_scope(&self, _: FieldElement) -> GreeterResult<usize> {
            Ok(0)
        }
        fn retire_scope(&self, _: FieldElement) -> GreeterResult<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_registry_failure_is_internal() {
        let f = fixture();
        let signal = greet(&f, b"Hello world");
        assert!(matches!(
            f.verifier.verify(&signal, f.tree.root(), f.topic, &BrokenRegistry),
            Err(Rejection::Internal(_))
        ));
    }

    #[test]
    fn test_root_window_bounded() {
        let verifier = SignalVerifier::with_root_window(artifacts(), 2);
        assert_eq!(verifier.trust_root(FieldElement::from(1u64)), None);
        assert_eq!(verifier.trust_root(FieldElement::from(2u64)), None);
        assert_eq!(verifier.trust_root(FieldElement::from(2u64)), None);
        assert_eq!(
            verifier.trust_root(FieldElement::from(3u64)),
            Some(FieldElement::from(1u64))
        );
        let current = FieldElement::from(100u64);
        assert!(!verifier.is_trusted(FieldElement::from(1u64), current));
        assert!(verifier.is_trusted(FieldElement::from(2u64), current));
        assert!(verifier.is_trusted(FieldElement::from(3u64), current));
        assert!(verifier.is_trusted(current, current));

        let strict = SignalVerifier::new(artifacts());
        assert_eq!(
            strict.trust_root(FieldElement::from(1u64)),
            Some(FieldElement::from(1u64))
        );
        assert_eq!(strict.stats().trusted_roots, 0);
    }
}
