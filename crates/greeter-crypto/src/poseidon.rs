//! Poseidon hash over BN254, natively and as an R1CS gadget.
//!
//! Every commitment, nullifier hash and Merkle node in the protocol goes
//! through [`hash_fields`]; the circuit recomputes them with [`hash_var`].
//! Both are driven by the same [`config`], so native and in-circuit outputs
//! agree bit for bit.
//!
//! ## Parameters (BN254 Fr)
//! - Width: 3 (rate=2, capacity=1)
//! - Full rounds: 8
//! - Partial rounds: 57
//! - S-box: x^5
//! - Round constants and MDS: Grain LFSR (arkworks `find_poseidon_ark_and_mds`)
//!
//! Output is the first squeezed element.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_crypto_primitives::sponge::{
    poseidon::{find_poseidon_ark_and_mds, PoseidonConfig, PoseidonSponge},
    CryptographicSponge,
};
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};
use std::sync::OnceLock;

use crate::field::FieldElement;

static CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();

/// Shared Poseidon configuration, built once per process.
pub fn config() -> &'static PoseidonConfig<Fr> {
    CONFIG.get_or_init(|| {
        let rate = 2;
        let alpha = 5u64;
        let full_rounds = 8u64;
        let partial_rounds = 57u64;
        let field_bits = 254u64;

        let (ark, mds) =
            find_poseidon_ark_and_mds::<Fr>(field_bits, rate, full_rounds, partial_rounds, 0);

        PoseidonConfig {
            full_rounds: full_rounds as usize,
            partial_rounds: partial_rounds as usize,
            alpha,
            ark,
            mds,
            rate,
            capacity: 1,
        }
    })
}

/// Hash any number of field elements.
pub fn hash_fields(inputs: &[Fr]) -> Fr {
    let mut sponge = PoseidonSponge::new(config());
    for input in inputs {
        sponge.absorb(input);
    }
    let output: Vec<Fr> = sponge.squeeze_field_elements(1);
    output[0]
}

/// 2-to-1 hash used for tree nodes, commitments and nullifier hashes.
pub fn hash2(left: FieldElement, right: FieldElement) -> FieldElement {
    FieldElement::from_fr(hash_fields(&[left.to_fr(), right.to_fr()]))
}

/// In-circuit counterpart of [`hash_fields`].
pub fn hash_var(
    cs: ConstraintSystemRef<Fr>,
    inputs: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::new(cs, config());
    sponge.absorb(&inputs)?;
    let output = sponge.squeeze_field_elements(1)?;
    Ok(output[0].clone())
}
