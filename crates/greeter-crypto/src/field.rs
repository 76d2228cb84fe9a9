//! BN254 scalar field elements as the protocol sees them.
//!
//! Commitments, roots, nullifier hashes and external nullifiers are all
//! [`FieldElement`]s. Text form is decimal (the format of published
//! commitment lists); `0x` hex is accepted on input. Byte form is 32 bytes
//! little-endian.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField, Zero};
use ark_serialize::CanonicalDeserialize;
use greeter_types::{GreeterError, GreeterResult, FIELD_ELEMENT_SIZE};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

/// An element of the BN254 scalar field.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldElement(Fr);

impl FieldElement {
    /// The additive identity. Also the empty-leaf sentinel of the tree.
    pub fn zero() -> Self {
        Self(Fr::zero())
    }

    /// True for the zero element.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Wrap an arkworks field element.
    pub fn from_fr(fr: Fr) -> Self {
        Self(fr)
    }

    /// The arkworks field element.
    pub fn to_fr(self) -> Fr {
        self.0
    }

    /// Reduce arbitrary little-endian bytes modulo the field order.
    pub fn from_le_bytes_mod_order(bytes: &[u8]) -> Self {
        Self(Fr::from_le_bytes_mod_order(bytes))
    }

    /// Parse canonical little-endian bytes. Values `>= p` are rejected.
    pub fn from_bytes(bytes: &[u8; FIELD_ELEMENT_SIZE]) -> GreeterResult<Self> {
        Fr::deserialize_compressed(&bytes[..])
            .map(Self)
            .map_err(|e| GreeterError::InvalidFieldElement(e.to_string()))
    }

    /// Canonical little-endian bytes.
    pub fn to_bytes(&self) -> [u8; FIELD_ELEMENT_SIZE] {
        let le = self.0.into_bigint().to_bytes_le();
        let mut out = [0u8; FIELD_ELEMENT_SIZE];
        out.copy_from_slice(&le[..FIELD_ELEMENT_SIZE]);
        out
    }

    /// Decimal representation.
    pub fn to_decimal(&self) -> String {
        self.0.into_bigint().to_string()
    }

    /// `0x`-prefixed big-endian hex, zero padded to 64 digits.
    pub fn to_hex(&self) -> String {
        let mut be = self.to_bytes();
        be.reverse();
        format!("0x{}", hex::encode(be))
    }

    fn from_hex(s: &str) -> GreeterResult<Self> {
        if s.is_empty() || s.len() > 2 * FIELD_ELEMENT_SIZE {
            return Err(GreeterError::InvalidFieldElement(format!(
                "hex value must have 1 to 64 digits, got {}",
                s.len()
            )));
        }
        let padded = format!("{:0>64}", s);
        let mut bytes = [0u8; FIELD_ELEMENT_SIZE];
        hex::decode_to_slice(&padded, &mut bytes)
            .map_err(|e| GreeterError::InvalidFieldElement(e.to_string()))?;
        bytes.reverse();
        Self::from_bytes(&bytes)
    }
}

impl FromStr for FieldElement {
    type Err = GreeterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex_digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return Self::from_hex(hex_digits);
        }
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(GreeterError::InvalidFieldElement(format!(
                "not a decimal integer: {:?}",
                s
            )));
        }
        let digits = s.trim_start_matches('0');
        let digits = if digits.is_empty() { "0" } else { digits };
        let element = Fr::from_str(digits).map(Self).map_err(|_| {
            GreeterError::InvalidFieldElement(format!("decimal value out of range: {}", s))
        })?;
        // Fr::from_str reduces silently; refuse values that did not round-trip.
        if element.to_decimal() != digits {
            return Err(GreeterError::InvalidFieldElement(format!(
                "decimal value not below field modulus: {}",
                s
            )));
        }
        Ok(element)
    }
}

impl Zeroize for FieldElement {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self(Fr::from(value))
    }
}

impl From<Fr> for FieldElement {
    fn from(fr: Fr) -> Self {
        Self(fr)
    }
}

impl From<FieldElement> for Fr {
    fn from(fe: FieldElement) -> Self {
        fe.0
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({})", self.to_hex())
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
