//! The external signing capability an identity is derived from.
//!
//! The browser flow asks the connected wallet to `personal_sign` a fixed
//! challenge; here the wallet is an explicit handle implementing
//! [`SigningCapability`], acquired once per session and passed to
//! [`IdentityManager::derive_with`](crate::IdentityManager::derive_with).

use greeter_types::{
    EcdsaSignature, EthAddress, GreeterError, GreeterResult, Secp256k1PrivateKey,
};
use secp256k1::{ecdsa::RecoverableSignature, ecdsa::RecoveryId, Message, PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

/// Challenge the wallet signs to produce identity material.
pub const IDENTITY_CHALLENGE: &str = "Sign this message to create your identity!";

thread_local! {
    static SECP256K1_CTX: Secp256k1<secp256k1::All> = Secp256k1::new();
}

/// Something that can sign the identity challenge deterministically.
pub trait SigningCapability: Send + Sync {
    /// Sign `challenge` as an Ethereum personal message.
    ///
    /// Fails with [`GreeterError::SigningUnavailable`] when the user rejects
    /// the request or no provider is connected.
    fn sign_challenge(&self, challenge: &[u8]) -> GreeterResult<EcdsaSignature>;
}

/// A wallet holding its secp256k1 key in process.
pub struct LocalWallet {
    private_key: Secp256k1PrivateKey,
    address: EthAddress,
}

impl LocalWallet {
    /// Build from a raw private key.
    pub fn new(private_key: Secp256k1PrivateKey) -> GreeterResult<Self> {
        let address = SECP256K1_CTX.with(|ctx| {
            let secret = SecretKey::from_slice(private_key.as_bytes())
                .map_err(|e| GreeterError::InvalidKey(e.to_string()))?;
            Ok::<_, GreeterError>(eth_address(&PublicKey::from_secret_key(ctx, &secret)))
        })?;
        Ok(Self {
            private_key,
            address,
        })
    }

    /// Build from a hex private key.
    pub fn from_hex(s: &str) -> GreeterResult<Self> {
        Self::new(Secp256k1PrivateKey::from_hex(s)?)
    }

    /// The wallet's account address.
    pub fn address(&self) -> EthAddress {
        self.address
    }
}

impl std::fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWallet").field("address", &self.address).finish()
    }
}

impl SigningCapability for LocalWallet {
    fn sign_challenge(&self, challenge: &[u8]) -> GreeterResult<EcdsaSignature> {
        sign_message(&self.private_key, &personal_message_hash(challenge))
    }
}

/// Stand-in for a wallet that is disconnected or refuses to sign.
#[derive(Debug, Clone, Default)]
pub struct UnavailableSigner {
    reason: String,
}

impl UnavailableSigner {
    /// A signer that always fails with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl SigningCapability for UnavailableSigner {
    fn sign_challenge(&self, _challenge: &[u8]) -> GreeterResult<EcdsaSignature> {
        let reason = if self.reason.is_empty() {
            "no provider connected".to_string()
        } else {
            self.reason.clone()
        };
        Err(GreeterError::SigningUnavailable(reason))
    }
}

/// EIP-191 personal message digest.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// RFC 6979 deterministic recoverable signature over a 32-byte digest.
pub fn sign_message(
    private_key: &Secp256k1PrivateKey,
    message_hash: &[u8; 32],
) -> GreeterResult<EcdsaSignature> {
    SECP256K1_CTX.with(|ctx| {
        let secret = SecretKey::from_slice(private_key.as_bytes())
            .map_err(|e| GreeterError::InvalidKey(e.to_string()))?;
        let message = Message::from_digest(*message_hash);

        let (recovery_id, signature) = ctx
            .sign_ecdsa_recoverable(&message, &secret)
            .serialize_compact();

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&signature[..32]);
        s.copy_from_slice(&signature[32..]);

        let v = recovery_id.to_i32() as u8 + 27;

        Ok(EcdsaSignature::new(r, s, v))
    })
}

/// Recover the signing address of a personal-message signature.
pub fn recover_signer(signature: &EcdsaSignature, message: &[u8]) -> GreeterResult<EthAddress> {
    let digest = personal_message_hash(message);
    SECP256K1_CTX.with(|ctx| {
        let v = if signature.v >= 27 {
            signature.v - 27
        } else {
            signature.v
        };
        let recovery_id = RecoveryId::from_i32(i32::from(v))
            .map_err(|e| GreeterError::InvalidSignature(e.to_string()))?;

        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(&signature.r);
        compact[32..].copy_from_slice(&signature.s);

        let recoverable = RecoverableSignature::from_compact(&compact, recovery_id)
            .map_err(|e| GreeterError::InvalidSignature(e.to_string()))?;
        let public_key = ctx
            .recover_ecdsa(&Message::from_digest(digest), &recoverable)
            .map_err(|e| GreeterError::InvalidSignature(e.to_string()))?;

        Ok(eth_address(&public_key))
    })
}

fn eth_address(public_key: &PublicKey) -> EthAddress {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    EthAddress::from_bytes(address)
}
