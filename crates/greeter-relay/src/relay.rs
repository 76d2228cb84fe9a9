//! Server side of the protocol: accepts signals, verifies them against the
//! current group snapshot and re-emits accepted greetings.

use chrono::{DateTime, Utc};
use greeter_crypto::{
    CircuitArtifacts, FieldElement, MembershipTree, NullifierRegistry, Signal, SignalVerifier,
    VerifierStats,
};
use greeter_types::{GreeterError, GreeterResult, Rejection};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{GreeterConfig, ScopePolicy};
use crate::events::{EventLog, GreetingEvent, Subscription};
use crate::snapshot::CommitmentSnapshot;

/// A root that was current at some point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootRecord {
    pub root: FieldElement,
    pub leaves: usize,
    pub replaced_at: DateTime<Utc>,
}

/// Bounded FIFO of superseded roots, oldest first.
#[derive(Debug)]
pub struct RootHistory {
    records: VecDeque<RootRecord>,
    capacity: usize,
}

impl RootHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: RootRecord) {
        if self.capacity == 0 {
            return;
        }
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn contains(&self, root: FieldElement) -> bool {
        self.records.iter().any(|r| r.root == root)
    }

    pub fn records(&self) -> Vec<RootRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Acknowledgement for an accepted signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub sequence: u64,
    pub nullifier_hash: FieldElement,
    pub external_nullifier: FieldElement,
    pub root: FieldElement,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayStatus {
    pub current_root: Option<FieldElement>,
    pub leaves: usize,
    pub scope_policy: String,
    pub events: usize,
    pub subscribers: usize,
    pub root_history: Vec<RootRecord>,
    pub verifier: VerifierStats,
}

/// What a signal is judged against. Verification holds a read guard for its
/// whole duration, so a refresh or topic rotation never interleaves with the
/// resolve-verify-record sequence of an in-flight signal.
struct Epoch {
    scope: ScopePolicy,
    tree: Option<Arc<MembershipTree>>,
}

impl Epoch {
    fn root(&self) -> Option<FieldElement> {
        self.tree.as_ref().map(|tree| tree.root())
    }
}

pub struct GreeterRelay {
    depth: usize,
    epoch: Arc<RwLock<Epoch>>,
    verifier: Arc<SignalVerifier>,
    registry: Arc<dyn NullifierRegistry>,
    history: RwLock<RootHistory>,
    events: Arc<EventLog>,
}

impl GreeterRelay {
    /// The verifier trusts the current root plus `root_history_size`
    /// superseded ones.
    pub fn new(
        config: &GreeterConfig,
        artifacts: &CircuitArtifacts,
        registry: Arc<dyn NullifierRegistry>,
    ) -> GreeterResult<Self> {
        if artifacts.tree_depth() != config.tree_depth {
            return Err(GreeterError::Config(format!(
                "keys were generated for depth {}, config uses {}",
                artifacts.tree_depth(),
                config.tree_depth
            )));
        }
        let verifier = SignalVerifier::with_root_window(artifacts, config.root_history_size);

        Ok(Self {
            depth: config.tree_depth,
            epoch: Arc::new(RwLock::new(Epoch {
                scope: config.external_nullifier,
                tree: None,
            })),
            verifier: Arc::new(verifier),
            registry,
            history: RwLock::new(RootHistory::new(config.root_history_size)),
            events: Arc::new(EventLog::new(config.event_buffer)),
        })
    }

    /// Rebuild the tree from `snapshot` and make its root current.
    ///
    /// The previous root moves into the history window. Under
    /// [`ScopePolicy::TreeRoot`] a root that drops out of the window is a
    /// closed scope, and its nullifiers are retired.
    pub fn refresh_snapshot(&self, snapshot: &CommitmentSnapshot) -> GreeterResult<FieldElement> {
        let tree = Arc::new(snapshot.build_tree(self.depth)?);
        let root = tree.root();

        let mut epoch = self.epoch.write();
        let previous = epoch.tree.replace(tree);

        if let Some(previous) = previous {
            let previous_root = previous.root();
            if previous_root != root {
                self.history.write().push(RootRecord {
                    root: previous_root,
                    leaves: previous.len(),
                    replaced_at: Utc::now(),
                });
                let expired = self.verifier.trust_root(previous_root);
                if let (ScopePolicy::TreeRoot, Some(expired)) = (epoch.scope, expired) {
                    if expired != root {
                        self.retire(expired);
                    }
                }
            }
        }

        info!(root = %root, leaves = snapshot.len(), "Group snapshot refreshed");
        Ok(root)
    }

    fn retire(&self, scope: FieldElement) {
        match self.registry.retire_scope(scope) {
            Ok(retired) => debug!(scope = %scope, retired, "Retired expired scope"),
            Err(e) => warn!(scope = %scope, error = %e, "Failed to retire expired scope"),
        }
    }

    pub fn current_root(&self) -> Option<FieldElement> {
        self.epoch.read().root()
    }

    /// The tree clients should prove against.
    pub fn tree(&self) -> Option<Arc<MembershipTree>> {
        self.epoch.read().tree.clone()
    }

    pub fn scope_policy(&self) -> ScopePolicy {
        self.epoch.read().scope
    }

    /// External nullifier a client should use for the current snapshot.
    pub fn current_scope(&self) -> Option<FieldElement> {
        let epoch = self.epoch.read();
        epoch.root().map(|root| epoch.scope.resolve(root))
    }

    /// Switch to a new fixed topic and forget the nullifiers of every scope
    /// that closes with it.
    pub fn rotate_topic(&self, topic: FieldElement) -> GreeterResult<usize> {
        let mut epoch = self.epoch.write();
        let previous = std::mem::replace(&mut epoch.scope, ScopePolicy::Topic(topic));

        let closed: Vec<FieldElement> = match previous {
            ScopePolicy::Topic(old) if old == topic => Vec::new(),
            ScopePolicy::Topic(old) => vec![old],
            ScopePolicy::TreeRoot => {
                let mut roots: Vec<FieldElement> =
                    self.history.read().records().into_iter().map(|r| r.root).collect();
                roots.extend(epoch.root());
                roots.sort_by_key(|root| root.to_bytes());
                roots.dedup();
                roots
            }
        };

        let mut retired = 0;
        for scope in closed {
            retired += self.registry.retire_scope(scope)?;
        }
        info!(topic = %topic, retired, "Rotated external nullifier");
        Ok(retired)
    }

    /// Verify `signal` and broadcast it on acceptance.
    ///
    /// Resolution, verification, recording and broadcast run as one unit on
    /// the blocking pool. Dropping the returned future does not interrupt
    /// them: a signal accepted after its caller gave up is still broadcast.
    pub async fn submit(&self, signal: Signal) -> Result<Receipt, Rejection> {
        let epoch = self.epoch.clone();
        let verifier = self.verifier.clone();
        let registry = self.registry.clone();
        let events = self.events.clone();

        tokio::task::spawn_blocking(move || -> Result<Receipt, Rejection> {
            let epoch = epoch.read();
            let expected_root = epoch
                .root()
                .ok_or_else(|| Rejection::Internal("no group snapshot loaded".into()))?;
            let external_nullifier = epoch.scope.resolve(signal.root);

            let accepted =
                verifier.verify(&signal, expected_root, external_nullifier, registry.as_ref())?;
            let event = events.append(&signal, &accepted);

            Ok(Receipt {
                sequence: event.sequence,
                nullifier_hash: accepted.nullifier_hash,
                external_nullifier: accepted.external_nullifier,
                root: accepted.root,
                accepted_at: event.accepted_at,
            })
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Verification task failed");
            Rejection::Internal(format!("verification task failed: {}", e))
        })?
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn events_since(&self, sequence: u64) -> Vec<GreetingEvent> {
        self.events.events_since(sequence)
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }

    pub fn root_history(&self) -> Vec<RootRecord> {
        self.history.read().records()
    }

    pub fn status(&self) -> RelayStatus {
        RelayStatus {
            current_root: self.current_root(),
            leaves: self.tree().map_or(0, |t| t.len()),
            scope_policy: self.scope_policy().to_string(),
            events: self.events.len(),
            subscribers: self.events.subscriber_count(),
            root_history: self.root_history(),
            verifier: self.verifier.stats(),
        }
    }
}
