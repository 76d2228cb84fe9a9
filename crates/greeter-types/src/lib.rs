#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

//! Shared types for the greeter anonymous signaling workspace.
//!
//! Holds the error taxonomy used by every crate, the rejection reasons a
//! verifier can return, and the wallet primitives that carry the signature
//! an identity is derived from.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroize;

/// Size of a secp256k1 private key in bytes.
pub const SECP256K1_PRIVATE_KEY_SIZE: usize = 32;

/// Size of a recoverable ECDSA signature (`r || s || v`).
pub const ECDSA_SIGNATURE_SIZE: usize = 65;

/// Size of an Ethereum address in bytes.
pub const ETH_ADDRESS_SIZE: usize = 20;

/// Size of a serialized field element in bytes.
pub const FIELD_ELEMENT_SIZE: usize = 32;

/// Errors raised by identity derivation, tree construction, proving and the
/// surrounding plumbing.
#[derive(Error, Debug)]
pub enum GreeterError {
    /// The external signing capability could not produce a signature.
    #[error("Signing capability unavailable: {0}")]
    SigningUnavailable(String),

    /// More commitments than the tree has leaves.
    #[error("Tree overflow: {len} commitments exceed capacity {capacity}")]
    TreeOverflow {
        /// Number of commitments supplied.
        len: usize,
        /// Leaf capacity of the tree.
        capacity: usize,
    },

    /// The target commitment is not a leaf of the tree.
    #[error("Commitment not found in membership tree: {0}")]
    CommitmentNotFound(String),

    /// Proof bytes failed structural decoding.
    #[error("Malformed proof: {0}")]
    MalformedProof(String),

    /// The circuit rejected the witness. Indicates a defect, never retried.
    #[error("Proof generation failure: {0}")]
    ProofGeneration(String),

    /// Invalid key material.
    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    /// Invalid signature encoding.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Invalid field element encoding.
    #[error("Invalid field element: {0}")]
    InvalidFieldElement(String),

    /// Circuit artifacts missing, corrupt or mismatched.
    #[error("Circuit error: {0}")]
    Circuit(String),

    /// Persistent storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Encoding or decoding failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration failure.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result alias used across the workspace.
pub type GreeterResult<T> = Result<T, GreeterError>;

/// Why a verifier refused a signal.
///
/// Verification reports these rather than [`GreeterError`] so callers can
/// tell a protocol-level refusal from a fault. Retrying with identical inputs
/// yields the same rejection.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum Rejection {
    /// Proof bytes have the wrong size or do not decode.
    #[error("malformed proof: {0}")]
    MalformedProof(String),

    /// The proof does not verify against the public inputs.
    #[error("invalid proof")]
    InvalidProof,

    /// The proof was made against a root the verifier does not trust.
    #[error("stale root")]
    StaleRoot,

    /// The nullifier hash was already consumed in this scope.
    #[error("nullifier already used")]
    NullifierAlreadyUsed,

    /// The verifier could not complete (registry I/O and similar).
    #[error("internal verifier failure: {0}")]
    Internal(String),
}

impl Rejection {
    /// Stable short code for logs and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::MalformedProof(_) => "malformed_proof",
            Rejection::InvalidProof => "invalid_proof",
            Rejection::StaleRoot => "stale_root",
            Rejection::NullifierAlreadyUsed => "nullifier_already_used",
            Rejection::Internal(_) => "internal",
        }
    }
}

/// secp256k1 private key, wiped on drop.
#[derive(Clone)]
pub struct Secp256k1PrivateKey(pub [u8; SECP256K1_PRIVATE_KEY_SIZE]);

impl Secp256k1PrivateKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; SECP256K1_PRIVATE_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; SECP256K1_PRIVATE_KEY_SIZE] {
        &self.0
    }

    /// Parse from hex, with or without `0x`.
    pub fn from_hex(s: &str) -> GreeterResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = hex::decode(s).map_err(|e| GreeterError::InvalidKey(e.to_string()))?;
        if bytes.len() != SECP256K1_PRIVATE_KEY_SIZE {
            bytes.zeroize();
            return Err(GreeterError::InvalidKey("Invalid private key length".into()));
        }
        let mut arr = [0u8; SECP256K1_PRIVATE_KEY_SIZE];
        arr.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self(arr))
    }
}

impl fmt::Debug for Secp256k1PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secp256k1PrivateKey([REDACTED])")
    }
}

impl Drop for Secp256k1PrivateKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Recoverable ECDSA signature as produced by an Ethereum wallet.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcdsaSignature {
    /// `r` component.
    pub r: [u8; 32],
    /// `s` component.
    pub s: [u8; 32],
    /// Recovery byte (27/28).
    pub v: u8,
}

impl EcdsaSignature {
    /// Assemble from components.
    pub fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    /// Wire form `r || s || v`.
    pub fn to_bytes(&self) -> [u8; ECDSA_SIGNATURE_SIZE] {
        let mut bytes = [0u8; ECDSA_SIGNATURE_SIZE];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Parse the wire form; anything but 65 bytes is rejected.
    pub fn from_slice(bytes: &[u8]) -> GreeterResult<Self> {
        if bytes.len() != ECDSA_SIGNATURE_SIZE {
            return Err(GreeterError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                ECDSA_SIGNATURE_SIZE,
                bytes.len()
            )));
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v: bytes[64] })
    }

    /// `0x`-prefixed hex of the wire form, as `eth_sign` returns it.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for EcdsaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EcdsaSignature(v={})", self.v)
    }
}

/// 20-byte Ethereum address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EthAddress(pub [u8; ETH_ADDRESS_SIZE]);

impl EthAddress {
    /// Wrap raw address bytes.
    pub fn from_bytes(bytes: [u8; ETH_ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// EIP-55 mixed-case checksum form.
    pub fn to_checksum(&self) -> String {
        let hex_addr = hex::encode(self.0);
        let hash = Keccak256::digest(hex_addr.as_bytes());
        let hash_hex = hex::encode(hash);

        let mut checksummed = String::with_capacity(42);
        checksummed.push_str("0x");

        for (c, h) in hex_addr.chars().zip(hash_hex.chars()) {
            if c.is_ascii_alphabetic() && h >= '8' {
                checksummed.push(c.to_ascii_uppercase());
            } else {
                checksummed.push(c);
            }
        }
        checksummed
    }

    /// Lowercase `0x` hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex, with or without `0x`.
    pub fn from_hex(s: &str) -> GreeterResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| GreeterError::InvalidKey(e.to_string()))?;
        if bytes.len() != ETH_ADDRESS_SIZE {
            return Err(GreeterError::InvalidKey("Invalid address length".into()));
        }
        let mut arr = [0u8; ETH_ADDRESS_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthAddress({})", self.to_checksum())
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_checksum())
    }
}
