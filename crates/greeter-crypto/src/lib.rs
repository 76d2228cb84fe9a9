#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

//! Anonymous signaling core: identities, membership trees, Groth16 signal
//! proofs and nullifier-based replay protection over BN254.

pub mod artifacts;
pub mod circuit;
pub mod field;
pub mod identity;
pub mod merkle;
pub mod nullifier;
pub mod poseidon;
pub mod prover;
pub mod signal;
pub mod verifier;
pub mod wallet;

pub use artifacts::{ArtifactMetadata, CircuitArtifacts};
pub use circuit::{SignalCircuit, CIRCUIT_NAME, CIRCUIT_VERSION, PUBLIC_INPUTS};
pub use field::FieldElement;
pub use identity::{Identity, IdentityManager};
pub use merkle::{MembershipTree, MerkleProof, DEFAULT_TREE_DEPTH, MAX_TREE_DEPTH};
pub use nullifier::{MemoryNullifierRegistry, NullifierRegistry, SledNullifierRegistry};
pub use poseidon::hash2 as poseidon_hash2;
pub use prover::SignalProver;
pub use signal::{hash_message, ProofBytes, Signal, PROOF_SIZE};
pub use verifier::{Accepted, SignalVerifier, VerifierStats};
pub use wallet::{LocalWallet, SigningCapability, UnavailableSigner, IDENTITY_CHALLENGE};
