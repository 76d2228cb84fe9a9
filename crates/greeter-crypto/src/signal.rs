//! The submitted artefact: a message, the nullifier hash it spends and the
//! Groth16 proof tying them to a group root.

use ark_bn254::{Bn254, Fr};
use ark_ff::PrimeField;
use ark_groth16::Proof;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;

use crate::field::FieldElement;
use greeter_types::{GreeterError, GreeterResult};

/// Size of a compressed BN254 Groth16 proof.
pub const PROOF_SIZE: usize = 128;

/// Map a message to the field: Keccak-256, shifted right by one byte.
pub fn hash_message(message: &[u8]) -> FieldElement {
    let digest: [u8; 32] = Keccak256::digest(message).into();
    let mut shifted = [0u8; 32];
    shifted[1..].copy_from_slice(&digest[..31]);
    FieldElement::from_fr(Fr::from_be_bytes_mod_order(&shifted))
}

/// Opaque proof encoding as it travels between prover and verifier.
#[derive(Clone, PartialEq, Eq)]
pub struct ProofBytes(Vec<u8>);

impl ProofBytes {
    /// Compressed encoding of `proof`.
    pub fn from_proof(proof: &Proof<Bn254>) -> GreeterResult<Self> {
        let mut bytes = Vec::with_capacity(PROOF_SIZE);
        proof
            .serialize_compressed(&mut bytes)
            .map_err(|e| GreeterError::Serialization(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Wrap raw bytes without checking them.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw encoding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no bytes are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Structural decoding. Fails on a wrong length or points off the curve.
    pub fn decode(&self) -> GreeterResult<Proof<Bn254>> {
        if self.0.len() != PROOF_SIZE {
            return Err(GreeterError::MalformedProof(format!(
                "expected {} bytes, got {}",
                PROOF_SIZE,
                self.0.len()
            )));
        }
        Proof::<Bn254>::deserialize_compressed(&self.0[..])
            .map_err(|e| GreeterError::MalformedProof(e.to_string()))
    }

    /// Base64 wire form.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.0)
    }

    /// Parse the base64 wire form. Length is checked on decode.
    pub fn from_base64(s: &str) -> GreeterResult<Self> {
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map(Self)
            .map_err(|e| GreeterError::MalformedProof(format!("invalid base64: {}", e)))
    }
}

impl fmt::Debug for ProofBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProofBytes({} bytes)", self.0.len())
    }
}

impl Serialize for ProofBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for ProofBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// A greeting ready for submission. Carries no identity material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Greeting payload, hex on the wire.
    #[serde(with = "message_hex")]
    pub message: Vec<u8>,
    /// Root the proof was generated against.
    pub root: FieldElement,
    /// Spent under the verifier's external nullifier.
    pub nullifier_hash: FieldElement,
    /// Compressed Groth16 proof.
    pub proof: ProofBytes,
}

impl Signal {
    /// Public input binding the message.
    pub fn signal_hash(&self) -> FieldElement {
        hash_message(&self.message)
    }

    /// Message as text, replacing invalid UTF-8.
    pub fn message_text(&self) -> String {
        String::from_utf8_lossy(&self.message).into_owned()
    }

    /// Pretty JSON wire form.
    pub fn to_json(&self) -> GreeterResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| GreeterError::Serialization(e.to_string()))
    }

    /// Parse the JSON wire form.
    pub fn from_json(s: &str) -> GreeterResult<Self> {
        serde_json::from_str(s).map_err(|e| GreeterError::Serialization(e.to_string()))
    }
}

/// Serde adapter for byte payloads as `0x` hex strings.
pub mod message_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Encode as `0x` hex.
    pub fn serialize<S: Serializer>(message: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(message)))
    }

    /// Decode `0x` hex or bare hex.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(digits).map_err(serde::de::Error::custom)
    }
}
