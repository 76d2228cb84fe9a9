//! Groth16 key material for the signal circuit and its on-disk layout.
//!
//! A key directory holds:
//! - `signal.pk.bin`: compressed proving key
//! - `signal.vk.bin`: compressed verifying key
//! - `signal.vk.hash`: BLAKE3 hex of the verifying key bytes
//! - `signal.meta.json`: [`ArtifactMetadata`]

use ark_bn254::Bn254;
use ark_groth16::{Groth16, PreparedVerifyingKey, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::{CircuitSpecificSetupSNARK, SNARK};
use ark_std::rand::{CryptoRng, RngCore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::circuit::{SignalCircuit, CIRCUIT_NAME, CIRCUIT_VERSION, PUBLIC_INPUTS};
use crate::merkle::MAX_TREE_DEPTH;
use greeter_types::{GreeterError, GreeterResult};

/// Serialized proving key.
pub const PROVING_KEY_FILE: &str = "signal.pk.bin";
/// Serialized verifying key.
pub const VERIFYING_KEY_FILE: &str = "signal.vk.bin";
/// BLAKE3 hex digest of the verifying key file.
pub const VK_HASH_FILE: &str = "signal.vk.hash";
/// JSON [`ArtifactMetadata`].
pub const METADATA_FILE: &str = "signal.meta.json";

/// Description of a generated key pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Circuit name.
    pub circuit: String,
    /// Circuit version the keys were generated for.
    pub version: u32,
    /// Membership path length.
    pub tree_depth: usize,
    /// Public input names in allocation order.
    pub public_inputs: Vec<String>,
    /// BLAKE3 hex digest of the verifying key bytes.
    pub vk_hash: String,
    /// Proving key size in bytes, 0 when absent.
    pub pk_size: usize,
    /// Verifying key size in bytes.
    pub vk_size: usize,
    /// When setup ran.
    pub generated_at: DateTime<Utc>,
}

/// Proving and verifying keys for one tree depth.
///
/// Verifier-only deployments load without the proving key.
#[derive(Clone)]
pub struct CircuitArtifacts {
    /// `None` for verifier-only artifacts.
    pub proving_key: Option<Arc<ProvingKey<Bn254>>>,
    /// Raw verifying key.
    pub verifying_key: VerifyingKey<Bn254>,
    /// Verifying key with the pairing precomputation done.
    pub prepared: PreparedVerifyingKey<Bn254>,
    /// Provenance recorded next to the keys.
    pub metadata: ArtifactMetadata,
}

impl CircuitArtifacts {
    /// Circuit-specific setup. The toxic waste lives only in `rng`, so this
    /// is suitable for development and tests, not for a production ceremony.
    pub fn setup<R: RngCore + CryptoRng>(depth: usize, rng: &mut R) -> GreeterResult<Self> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(GreeterError::Config(format!(
                "tree depth must be between 1 and {}, got {}",
                MAX_TREE_DEPTH, depth
            )));
        }

        info!(depth, "Running Groth16 setup for signal circuit");
        let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(SignalCircuit::empty(depth), rng)
            .map_err(|e| GreeterError::Circuit(format!("setup failed: {}", e)))?;
        let prepared = Groth16::<Bn254>::process_vk(&vk)
            .map_err(|e| GreeterError::Circuit(format!("failed to process verifying key: {}", e)))?;

        let pk_bytes = serialize(&pk)?;
        let vk_bytes = serialize(&vk)?;
        let metadata = ArtifactMetadata {
            circuit: CIRCUIT_NAME.to_string(),
            version: CIRCUIT_VERSION,
            tree_depth: depth,
            public_inputs: PUBLIC_INPUTS.iter().map(|s| s.to_string()).collect(),
            vk_hash: vk_hash(&vk_bytes),
            pk_size: pk_bytes.len(),
            vk_size: vk_bytes.len(),
            generated_at: Utc::now(),
        };

        info!(vk_hash = %metadata.vk_hash, pk_size = metadata.pk_size, "Setup complete");

        Ok(Self {
            proving_key: Some(Arc::new(pk)),
            verifying_key: vk,
            prepared,
            metadata,
        })
    }

    /// Depth the circuit was compiled for.
    pub fn tree_depth(&self) -> usize {
        self.metadata.tree_depth
    }

    /// Digest identifying these keys.
    pub fn vk_hash(&self) -> &str {
        &self.metadata.vk_hash
    }

    /// Write every artifact into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> GreeterResult<()> {
        let pk = self
            .proving_key
            .as_ref()
            .ok_or_else(|| GreeterError::Circuit("no proving key to save".into()))?;

        fs::create_dir_all(dir).map_err(storage_err)?;

        let pk_bytes = serialize(pk.as_ref())?;
        let vk_bytes = serialize(&self.verifying_key)?;

        fs::write(dir.join(PROVING_KEY_FILE), &pk_bytes).map_err(storage_err)?;
        fs::write(dir.join(VERIFYING_KEY_FILE), &vk_bytes).map_err(storage_err)?;
        fs::write(dir.join(VK_HASH_FILE), format!("{}\n", vk_hash(&vk_bytes)))
            .map_err(storage_err)?;

        let meta = serde_json::to_string_pretty(&self.metadata)
            .map_err(|e| GreeterError::Serialization(e.to_string()))?;
        fs::write(dir.join(METADATA_FILE), meta).map_err(storage_err)?;

        info!(dir = %dir.display(), "Saved circuit artifacts");
        Ok(())
    }

    /// Load proving and verifying keys from `dir`.
    pub fn load(dir: &Path) -> GreeterResult<Self> {
        let mut artifacts = Self::load_verifier(dir)?;

        let pk_bytes = fs::read(dir.join(PROVING_KEY_FILE)).map_err(storage_err)?;
        let pk = ProvingKey::<Bn254>::deserialize_compressed(&pk_bytes[..])
            .map_err(|e| GreeterError::Circuit(format!("corrupt proving key: {}", e)))?;

        if serialize(&pk.vk)? != serialize(&artifacts.verifying_key)? {
            return Err(GreeterError::Circuit(
                "proving key does not match verifying key".into(),
            ));
        }

        artifacts.proving_key = Some(Arc::new(pk));
        Ok(artifacts)
    }

    /// Load only what a verifier needs.
    pub fn load_verifier(dir: &Path) -> GreeterResult<Self> {
        let meta = fs::read_to_string(dir.join(METADATA_FILE)).map_err(storage_err)?;
        let metadata: ArtifactMetadata =
            serde_json::from_str(&meta).map_err(|e| GreeterError::Serialization(e.to_string()))?;

        if metadata.circuit != CIRCUIT_NAME || metadata.version != CIRCUIT_VERSION {
            return Err(GreeterError::Circuit(format!(
                "unsupported circuit {} v{}, expected {} v{}",
                metadata.circuit, metadata.version, CIRCUIT_NAME, CIRCUIT_VERSION
            )));
        }

        let vk_bytes = fs::read(dir.join(VERIFYING_KEY_FILE)).map_err(storage_err)?;
        let actual = vk_hash(&vk_bytes);
        if actual != metadata.vk_hash {
            return Err(GreeterError::Circuit(format!(
                "verifying key hash mismatch: expected {}, got {}",
                metadata.vk_hash, actual
            )));
        }
        if let Ok(recorded) = fs::read_to_string(dir.join(VK_HASH_FILE)) {
            if recorded.trim() != actual {
                return Err(GreeterError::Circuit(format!(
                    "{} disagrees with verifying key",
                    VK_HASH_FILE
                )));
            }
        }

        let vk = VerifyingKey::<Bn254>::deserialize_compressed(&vk_bytes[..])
            .map_err(|e| GreeterError::Circuit(format!("corrupt verifying key: {}", e)))?;
        if vk.gamma_abc_g1.len() != PUBLIC_INPUTS.len() + 1 {
            return Err(GreeterError::Circuit(format!(
                "verifying key expects {} public inputs",
                vk.gamma_abc_g1.len().saturating_sub(1)
            )));
        }
        let prepared = Groth16::<Bn254>::process_vk(&vk)
            .map_err(|e| GreeterError::Circuit(format!("failed to process verifying key: {}", e)))?;

        debug!(dir = %dir.display(), vk_hash = %actual, "Loaded verifying key");

        Ok(Self {
            proving_key: None,
            verifying_key: vk,
            prepared,
            metadata,
        })
    }
}

impl std::fmt::Debug for CircuitArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitArtifacts")
            .field("has_proving_key", &self.proving_key.is_some())
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// BLAKE3 hex digest of verifying key bytes.
pub fn vk_hash(vk_bytes: &[u8]) -> String {
    hex::encode(blake3::hash(vk_bytes).as_bytes())
}

fn serialize<T: CanonicalSerialize>(value: &T) -> GreeterResult<Vec<u8>> {
    let mut bytes = Vec::new();
    value
        .serialize_compressed(&mut bytes)
        .map_err(|e| GreeterError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn storage_err(e: std::io::Error) -> GreeterError {
    GreeterError::Storage(e.to_string())
}
