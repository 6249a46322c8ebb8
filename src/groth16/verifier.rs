//! Groth16 verifier: `e(−π_A, π_B)·e(cpub, γ₂)·e(π_C, δ₂)·e(α₁, β₂) = 1`
//! with `cpub = IC₀ + Σ pub_i·IC_{i+1}`.

#![forbid(unsafe_code)]

use ark_ec::{AffineRepr, CurveGroup};
use tracing::{error, info};

use super::{Proof, VerificationKey};
use crate::curve::{Fr, PairingCurve};
use crate::pcs::{msm, pairing_check};
use crate::zkey::ProtocolError;

pub fn verify<E: PairingCurve>(
    vk: &VerificationKey<E>,
    public: &[Fr<E>],
    proof: &Proof<E>,
) -> Result<bool, ProtocolError> {
    if public.len() != vk.n_public || vk.ic.len() != vk.n_public + 1 {
        return Err(ProtocolError::PublicSignals { expected: vk.n_public, got: public.len() });
    }
    let cpub = (vk.ic[0].into_group() + msm(&vk.ic[1..], public)).into_affine();
    let ok = pairing_check::<E>(&[
        (-proof.pi_a, proof.pi_b),
        (cpub, vk.gamma2),
        (proof.pi_c, vk.delta2),
        (vk.alpha1, vk.beta2),
    ]);
    if ok {
        info!("groth16 proof OK");
    } else {
        error!("groth16 pairing check failed");
    }
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::super::{export_verification_key, prover, setup, Proof, VerificationKey};
    use super::*;
    use crate::curve::{Bls12_381, Bn254};
    use crate::zkey::testutil::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::io::Cursor;

    fn prove_square<E: PairingCurve>(x: u64) -> (VerificationKey<E>, Proof<E>, Vec<Fr<E>>) {
        let mut ptau = ptau::<E>(4);
        let (bytes, _) = setup::new_zkey(&square::<E>(), &mut ptau, Cursor::new(Vec::new())).unwrap();
        let bytes = bytes.into_inner();
        let vk = export_verification_key::<E, _>(&mut zkey_reader(bytes.clone())).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let (proof, public) =
            prover::prove_with_rng(&mut zkey_reader(bytes), &square_witness::<E>(x), &mut rng).unwrap();
        (vk, proof, public)
    }

    #[test]
    fn square_circuit_completeness() {
        let (vk, proof, public) = prove_square::<Bn254>(3);
        assert_eq!(public, vec![Fr::<Bn254>::from(9u64)]);
        assert!(verify(&vk, &public, &proof).unwrap());
        assert!(!verify(&vk, &[Fr::<Bn254>::from(10u64)], &proof).unwrap());
    }

    #[test]
    fn bls12_381_completeness_and_json() {
        let (vk, proof, public) = prove_square::<Bls12_381>(5);
        let vk = VerificationKey::<Bls12_381>::from_json(&vk.to_json()).unwrap();
        let proof = Proof::<Bls12_381>::from_json(&proof.to_json()).unwrap();
        assert!(verify(&vk, &public, &proof).unwrap());
    }

    #[test]
    fn mixed_circuit_completeness() {
        let mut ptau = ptau::<Bn254>(4);
        let (bytes, _) = setup::new_zkey(&mixed::<Bn254>(), &mut ptau, Cursor::new(Vec::new())).unwrap();
        let bytes = bytes.into_inner();
        let vk = export_verification_key::<Bn254, _>(&mut zkey_reader(bytes.clone())).unwrap();
        let (proof, public) = prover::prove::<Bn254, _>(&mut zkey_reader(bytes), &mixed_witness::<Bn254>()).unwrap();
        assert_eq!(public, vec![Fr::<Bn254>::from(8u64), Fr::<Bn254>::from(1u64)]);
        assert!(verify(&vk, &public, &proof).unwrap());
    }

    #[test]
    fn monomial_h_basis_completeness() {
        super::super::with_monomial_h(|| {
            let mut ptau = ptau::<Bn254>(3);
            let (bytes, _) = setup::new_zkey(&mixed::<Bn254>(), &mut ptau, Cursor::new(Vec::new())).unwrap();
            let bytes = bytes.into_inner();
            let vk = export_verification_key::<Bn254, _>(&mut zkey_reader(bytes.clone())).unwrap();
            let mut rng = ChaCha20Rng::seed_from_u64(5);
            let (proof, public) =
                prover::prove_with_rng(&mut zkey_reader(bytes.clone()), &mixed_witness::<Bn254>(), &mut rng).unwrap();
            assert!(verify(&vk, &public, &proof).unwrap());

            let mut bad = mixed_witness::<Bn254>();
            bad[5] += Fr::<Bn254>::from(1u64);
            let (proof, public) = prover::prove_with_rng(&mut zkey_reader(bytes), &bad, &mut rng).unwrap();
            assert!(!verify(&vk, &public, &proof).unwrap());
        });
    }

    #[test]
    fn unsatisfying_witness_fails() {
        let mut ptau = ptau::<Bn254>(4);
        let (bytes, _) = setup::new_zkey(&square::<Bn254>(), &mut ptau, Cursor::new(Vec::new())).unwrap();
        let bytes = bytes.into_inner();
        let vk = export_verification_key::<Bn254, _>(&mut zkey_reader(bytes.clone())).unwrap();
        let bad = vec![Fr::<Bn254>::from(1u64), Fr::<Bn254>::from(10u64), Fr::<Bn254>::from(3u64)];
        let (proof, public) = prover::prove::<Bn254, _>(&mut zkey_reader(bytes), &bad).unwrap();
        assert!(!verify(&vk, &public, &proof).unwrap());
    }

    #[test]
    fn public_signal_count_is_checked() {
        let (vk, proof, _) = prove_square::<Bn254>(3);
        assert!(matches!(
            verify(&vk, &[], &proof),
            Err(ProtocolError::PublicSignals { expected: 1, got: 0 })
        ));
    }
}
