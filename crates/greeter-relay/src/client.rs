//! Client side: turn an identity and a group snapshot into a signal.

use greeter_crypto::{FieldElement, Identity, MembershipTree, Signal, SignalProver};
use greeter_types::{GreeterError, GreeterResult};
use std::sync::Arc;
use tracing::{error, info};

/// Prove `message` on a blocking thread.
///
/// The tree must be the snapshot the relay will check against; proving
/// against an older one ends in a stale-root rejection. Dropping the future
/// abandons the proof without side effects.
pub async fn prove_greeting(
    prover: Arc<SignalProver>,
    identity: &Identity,
    tree: Arc<MembershipTree>,
    message: impl Into<Vec<u8>>,
    external_nullifier: FieldElement,
) -> GreeterResult<Signal> {
    let merkle_proof = tree.prove_inclusion(identity.commitment())?;
    let identity = identity.clone();
    let message = message.into();

    info!(root = %merkle_proof.root, "Creating signal proof");
    let signal = tokio::task::spawn_blocking(move || {
        prover.prove(&identity, &merkle_proof, &message, external_nullifier)
    })
    .await
    .map_err(|e| {
        error!(error = %e, "Proving task failed");
        GreeterError::Internal(format!("proving task failed: {}", e))
    })??;

    Ok(signal)
}
