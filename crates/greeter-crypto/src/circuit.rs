//! R1CS relation proven by every signal.
//!
//! Public inputs, in allocation order:
//! 1. `root` of the membership tree
//! 2. `nullifier_hash`
//! 3. `signal_hash` of the message
//! 4. `external_nullifier`
//!
//! Private witnesses are the two identity secrets, the sibling path and the
//! path direction bits. The relation enforces
//! `H(trapdoor, nullifier_secret)` folds up to `root`,
//! `nullifier_hash = H(nullifier_secret, external_nullifier)`, and ties
//! `signal_hash` into a constraint so the proof cannot be lifted to another
//! message.

use ark_bn254::Fr;
use ark_r1cs_std::{
    alloc::AllocVar,
    boolean::Boolean,
    eq::EqGadget,
    fields::{fp::FpVar, FieldVar},
    select::CondSelectGadget,
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use crate::field::FieldElement;
use crate::poseidon::hash_var;

/// Identifier recorded in artifact metadata.
pub const CIRCUIT_NAME: &str = "greeter-signal";

/// Bumped whenever the relation or the public-input order changes.
pub const CIRCUIT_VERSION: u32 = 1;

/// Public-input names in the order the verifier must supply them.
pub const PUBLIC_INPUTS: [&str; 4] = ["root", "nullifier_hash", "signal_hash", "external_nullifier"];

/// Assemble the public-input vector in circuit order.
pub fn public_inputs(
    root: FieldElement,
    nullifier_hash: FieldElement,
    signal_hash: FieldElement,
    external_nullifier: FieldElement,
) -> Vec<Fr> {
    vec![
        root.to_fr(),
        nullifier_hash.to_fr(),
        signal_hash.to_fr(),
        external_nullifier.to_fr(),
    ]
}

/// Membership and nullifier relation for one signal.
///
/// Witness fields are `None` during setup. Public fields are allocated as
/// inputs in [`PUBLIC_INPUTS`] order.
#[derive(Clone)]
pub struct SignalCircuit {
    /// Number of levels in the membership path.
    pub depth: usize,

    /// Private identity trapdoor.
    pub trapdoor: Option<Fr>,
    /// Private identity nullifier secret.
    pub nullifier_secret: Option<Fr>,
    /// Sibling hashes from the leaf level upward.
    pub siblings: Option<Vec<Fr>>,
    /// `true` where the path node is a right child.
    pub path_indices: Option<Vec<bool>>,

    /// Public: tree root the path folds to.
    pub root: Option<Fr>,
    /// Public: `H(nullifier_secret, external_nullifier)`.
    pub nullifier_hash: Option<Fr>,
    /// Public: hash of the greeting.
    pub signal_hash: Option<Fr>,
    /// Public: replay scope.
    pub external_nullifier: Option<Fr>,
}

impl SignalCircuit {
    /// Shape-only instance for key generation.
    pub fn empty(depth: usize) -> Self {
        Self {
            depth,
            trapdoor: None,
            nullifier_secret: None,
            siblings: None,
            path_indices: None,
            root: None,
            nullifier_hash: None,
            signal_hash: None,
            external_nullifier: None,
        }
    }
}

impl ConstraintSynthesizer<Fr> for SignalCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        if self.siblings.as_ref().is_some_and(|s| s.len() != self.depth)
            || self.path_indices.as_ref().is_some_and(|p| p.len() != self.depth)
        {
            return Err(SynthesisError::Unsatisfiable);
        }

        let root_var = FpVar::new_input(cs.clone(), || {
            self.root.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let nullifier_hash_var = FpVar::new_input(cs.clone(), || {
            self.nullifier_hash.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let signal_hash_var = FpVar::new_input(cs.clone(), || {
            self.signal_hash.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let external_nullifier_var = FpVar::new_input(cs.clone(), || {
            self.external_nullifier.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let trapdoor_var = FpVar::new_witness(cs.clone(), || {
            self.trapdoor.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let nullifier_secret_var = FpVar::new_witness(cs.clone(), || {
            self.nullifier_secret.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let commitment_var =
            hash_var(cs.clone(), &[trapdoor_var, nullifier_secret_var.clone()])?;

        let mut current = commitment_var;
        for level in 0..self.depth {
            let sibling_var = FpVar::new_witness(cs.clone(), || {
                self.siblings
                    .as_ref()
                    .map(|s| s[level])
                    .ok_or(SynthesisError::AssignmentMissing)
            })?;
            let is_right = Boolean::new_witness(cs.clone(), || {
                self.path_indices
                    .as_ref()
                    .map(|p| p[level])
                    .ok_or(SynthesisError::AssignmentMissing)
            })?;

            let left = FpVar::conditionally_select(&is_right, &sibling_var, &current)?;
            let right = FpVar::conditionally_select(&is_right, &current, &sibling_var)?;

            current = hash_var(cs.clone(), &[left, right])?;
        }
        current.enforce_equal(&root_var)?;

        let computed_nullifier_hash =
            hash_var(cs.clone(), &[nullifier_secret_var, external_nullifier_var])?;
        computed_nullifier_hash.enforce_equal(&nullifier_hash_var)?;

        // A public input that appears in no constraint is not bound by Groth16.
        let _signal_hash_squared = signal_hash_var.square()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::merkle::MembershipTree;
    use crate::signal::hash_message;
    use ark_relations::r1cs::ConstraintSystem;

    fn witness(depth: usize) -> (SignalCircuit, FieldElement) {
        let identity = Identity::from_secrets(FieldElement::from(3u64), FieldElement::from(4u64));
        let leaves = vec![
            FieldElement::from(100u64),
            identity.commitment(),
            FieldElement::from(200u64),
        ];
        let tree = MembershipTree::build_with_depth(&leaves, depth).unwrap();
        let proof = tree.prove_inclusion(identity.commitment()).unwrap();
        let topic = FieldElement::from(77u64);

        let circuit = SignalCircuit {
            depth,
            trapdoor: Some(identity.trapdoor().to_fr()),
            nullifier_secret: Some(identity.nullifier_secret().to_fr()),
            siblings: Some(proof.siblings.iter().map(|s| s.to_fr()).collect()),
            path_indices: Some(proof.path_indices.iter().map(|b| *b == 1).collect()),
            root: Some(tree.root().to_fr()),
            nullifier_hash: Some(identity.nullifier_hash(topic).to_fr()),
            signal_hash: Some(hash_message(b"Hello world").to_fr()),
            external_nullifier: Some(topic.to_fr()),
        };
        (circuit, topic)
    }

    #[test]
    fn test_valid_witness_satisfies() {
        let (circuit, _) = witness(4);
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        assert!(cs.is_satisfied().unwrap());
        assert_eq!(cs.num_instance_variables(), 1 + PUBLIC_INPUTS.len());
    }

    #[test]
    fn test_wrong_root_unsatisfied() {
        let (mut circuit, _) = witness(4);
        circuit.root = Some(Fr::from(1u64));
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_wrong_nullifier_hash_unsatisfied() {
        let (mut circuit, _) = witness(4);
        circuit.nullifier_hash = Some(Fr::from(5u64));
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_flipped_path_bit_unsatisfied() {
        let (mut circuit, _) = witness(4);
        if let Some(bits) = circuit.path_indices.as_mut() {
            bits[0] = !bits[0];
        }
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_path_length_mismatch_rejected() {
        let (mut circuit, _) = witness(4);
        circuit.depth = 5;
        let cs = ConstraintSystem::<Fr>::new_ref();
        assert!(circuit.generate_constraints(cs).is_err());
    }
}
