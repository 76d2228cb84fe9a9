//! Identity derivation.
//!
//! A member's identity is two secrets and the commitment that binds them.
//! It is recomputed from the wallet's signature over a fixed challenge every
//! session, so the same wallet always lands on the same group leaf.

use sha3::{Digest, Keccak256};
use std::fmt;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::field::FieldElement;
use crate::poseidon::hash2;
use crate::wallet::{recover_signer, SigningCapability, IDENTITY_CHALLENGE};
use greeter_types::GreeterResult;

const TRAPDOOR_CONTEXT: &str = "greeter-v1-identity-trapdoor";
const NULLIFIER_CONTEXT: &str = "greeter-v1-identity-nullifier";

/// Private identity material. Never serialized, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Identity {
    trapdoor: FieldElement,
    nullifier_secret: FieldElement,
    #[zeroize(skip)]
    commitment: FieldElement,
}

impl Identity {
    /// Assemble an identity from its two secrets.
    pub fn from_secrets(trapdoor: FieldElement, nullifier_secret: FieldElement) -> Self {
        Self {
            trapdoor,
            nullifier_secret,
            commitment: hash2(trapdoor, nullifier_secret),
        }
    }

    /// Secret half bound only into the commitment.
    pub fn trapdoor(&self) -> FieldElement {
        self.trapdoor
    }

    /// Secret half that also keys every nullifier hash.
    pub fn nullifier_secret(&self) -> FieldElement {
        self.nullifier_secret
    }

    /// `H(trapdoor, nullifier_secret)`, the public group leaf.
    pub fn commitment(&self) -> FieldElement {
        self.commitment
    }

    /// `H(nullifier_secret, external_nullifier)`.
    pub fn nullifier_hash(&self, external_nullifier: FieldElement) -> FieldElement {
        hash2(self.nullifier_secret, external_nullifier)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("commitment", &self.commitment)
            .finish_non_exhaustive()
    }
}

/// Derives identities from wallet signatures.
pub struct IdentityManager;

impl IdentityManager {
    /// Deterministically derive an identity from signature bytes.
    pub fn derive(signature: &[u8]) -> Identity {
        let seed: [u8; 32] = Keccak256::digest(signature).into();

        let mut trapdoor_bytes = blake3::derive_key(TRAPDOOR_CONTEXT, &seed);
        let mut nullifier_bytes = blake3::derive_key(NULLIFIER_CONTEXT, &seed);

        let identity = Identity::from_secrets(
            FieldElement::from_le_bytes_mod_order(&trapdoor_bytes),
            FieldElement::from_le_bytes_mod_order(&nullifier_bytes),
        );

        trapdoor_bytes.zeroize();
        nullifier_bytes.zeroize();

        identity
    }

    /// Ask `signer` to sign the identity challenge and derive from the result.
    ///
    /// A signature that does not recover to a signer over the challenge is
    /// refused, so a broken capability cannot silently yield a foreign
    /// identity.
    pub fn derive_with(signer: &dyn SigningCapability) -> GreeterResult<Identity> {
        let challenge = IDENTITY_CHALLENGE.as_bytes();
        let signature = signer.sign_challenge(challenge)?;
        let address = recover_signer(&signature, challenge)?;
        let identity = Self::derive(&signature.to_bytes());
        debug!(signer = %address, commitment = %identity.commitment(), "Derived identity");
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{LocalWallet, UnavailableSigner};
    use greeter_types::{EcdsaSignature, GreeterError};

    const KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    #[test]
    fn test_derive_is_deterministic() {
        let a = IdentityManager::derive(b"some signature");
        let b = IdentityManager::derive(b"some signature");
        assert_eq!(a.commitment(), b.commitment());
        assert_eq!(a.trapdoor(), b.trapdoor());
        assert_eq!(a.nullifier_secret(), b.nullifier_secret());
    }

    #[test]
    fn test_distinct_signatures_distinct_identities() {
        let a = IdentityManager::derive(b"signature one");
        let b = IdentityManager::derive(b"signature two");
        assert_ne!(a.commitment(), b.commitment());
        assert_ne!(a.trapdoor(), a.nullifier_secret());
    }

    #[test]
    fn test_commitment_binds_secrets() {
        let id = IdentityManager::derive(b"sig");
        assert_eq!(id.commitment(), hash2(id.trapdoor(), id.nullifier_secret()));
    }

    #[test]
    fn test_nullifier_hash_scoped() {
        let id = IdentityManager::derive(b"sig");
        let t1 = FieldElement::from(1u64);
        let t2 = FieldElement::from(2u64);
        assert_eq!(id.nullifier_hash(t1), id.nullifier_hash(t1));
        assert_ne!(id.nullifier_hash(t1), id.nullifier_hash(t2));
    }

    #[test]
    fn test_derive_with_wallet() {
        let wallet = LocalWallet::from_hex(KEY).unwrap();
        let a = IdentityManager::derive_with(&wallet).unwrap();
        let b = IdentityManager::derive_with(&wallet).unwrap();
        assert_eq!(a.commitment(), b.commitment());
    }

    #[test]
    fn test_derive_with_unavailable_signer() {
        let err = IdentityManager::derive_with(&UnavailableSigner::default()).unwrap_err();
        assert!(matches!(err, GreeterError::SigningUnavailable(_)));
    }

    struct GarbageSigner;

    impl SigningCapability for GarbageSigner {
        fn sign_challenge(&self, _challenge: &[u8]) -> GreeterResult<EcdsaSignature> {
            Ok(EcdsaSignature::new([1u8; 32], [2u8; 32], 40))
        }
    }

    #[test]
    fn test_derive_with_unrecoverable_signature() {
        let err = IdentityManager::derive_with(&GarbageSigner).unwrap_err();
        assert!(matches!(err, GreeterError::InvalidSignature(_)));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let id = IdentityManager::derive(b"sig");
        let debug = format!("{:?}", id);
        assert!(debug.contains("commitment"));
        assert!(!debug.contains("trapdoor"));
    }
}
