//! Client-side signal generation.

use ark_bn254::Bn254;
use ark_groth16::{Groth16, ProvingKey};
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, RngCore};
use rand::thread_rng;
use std::sync::Arc;
use tracing::{debug, error};

use crate::artifacts::CircuitArtifacts;
use crate::circuit::SignalCircuit;
use crate::field::FieldElement;
use crate::identity::Identity;
use crate::merkle::MerkleProof;
use crate::signal::{hash_message, ProofBytes, Signal};
use greeter_types::{GreeterError, GreeterResult};

/// Produces [`Signal`]s with a shared proving key.
#[derive(Clone)]
pub struct SignalProver {
    proving_key: Arc<ProvingKey<Bn254>>,
    depth: usize,
}

impl SignalProver {
    /// Fails when `artifacts` were loaded without a proving key.
    pub fn new(artifacts: &CircuitArtifacts) -> GreeterResult<Self> {
        let proving_key = artifacts
            .proving_key
            .clone()
            .ok_or_else(|| GreeterError::Circuit("artifacts were loaded without a proving key".into()))?;
        Ok(Self {
            proving_key,
            depth: artifacts.tree_depth(),
        })
    }

    /// Tree depth of the proving key.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Prove membership and bind `message` under `external_nullifier`.
    ///
    /// Has no side effects; dropping the result leaves nothing behind.
    pub fn prove(
        &self,
        identity: &Identity,
        merkle_proof: &MerkleProof,
        message: &[u8],
        external_nullifier: FieldElement,
    ) -> GreeterResult<Signal> {
        self.prove_with_rng(identity, merkle_proof, message, external_nullifier, &mut thread_rng())
    }

    /// Same as [`SignalProver::prove`] with caller-supplied randomness.
    pub fn prove_with_rng<R: RngCore + CryptoRng>(
        &self,
        identity: &Identity,
        merkle_proof: &MerkleProof,
        message: &[u8],
        external_nullifier: FieldElement,
        rng: &mut R,
    ) -> GreeterResult<Signal> {
        // Groth16 proves unsatisfied witnesses without complaint, so the
        // relation is checked natively first.
        if let Err(e) = self.check_witness(identity, merkle_proof) {
            error!(error = %e, "Refusing to prove with an inconsistent witness");
            return Err(e);
        }

        let nullifier_hash = identity.nullifier_hash(external_nullifier);
        let signal_hash = hash_message(message);

        let circuit = SignalCircuit {
            depth: self.depth,
            trapdoor: Some(identity.trapdoor().to_fr()),
            nullifier_secret: Some(identity.nullifier_secret().to_fr()),
            siblings: Some(merkle_proof.siblings.iter().map(|s| s.to_fr()).collect()),
            path_indices: Some(merkle_proof.path_indices.iter().map(|b| *b == 1).collect()),
            root: Some(merkle_proof.root.to_fr()),
            nullifier_hash: Some(nullifier_hash.to_fr()),
            signal_hash: Some(signal_hash.to_fr()),
            external_nullifier: Some(external_nullifier.to_fr()),
        };

        let proof = Groth16::<Bn254>::prove(self.proving_key.as_ref(), circuit, rng).map_err(|e| {
            error!(error = %e, "Groth16 proving failed");
            GreeterError::ProofGeneration(e.to_string())
        })?;

        debug!(root = %merkle_proof.root, nullifier_hash = %nullifier_hash, "Generated signal proof");

        Ok(Signal {
            message: message.to_vec(),
            root: merkle_proof.root,
            nullifier_hash,
            proof: ProofBytes::from_proof(&proof)?,
        })
    }

    fn check_witness(&self, identity: &Identity, merkle_proof: &MerkleProof) -> GreeterResult<()> {
        if merkle_proof.depth() != self.depth || merkle_proof.path_indices.len() != self.depth {
            return Err(GreeterError::ProofGeneration(format!(
                "merkle proof depth {} does not match circuit depth {}",
                merkle_proof.depth(),
                self.depth
            )));
        }
        if merkle_proof.leaf != identity.commitment() {
            return Err(GreeterError::ProofGeneration(
                "merkle proof leaf is not the identity commitment".into(),
            ));
        }
        if !merkle_proof.verify() {
            return Err(GreeterError::ProofGeneration(
                "merkle proof does not fold to its root".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SignalProver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalProver").field("depth", &self.depth).finish()
    }
}
