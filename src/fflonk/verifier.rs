//! FFLONK verifier.
//!
//! The quotient values `T0(ξ), T1(ξ), T2(ξ)` are not sent; they follow
//! from the opened values through the three identities. With
//! `q1 = αZ_T0(y)/Z_T1(y)` and `q2 = α²Z_T0(y)/Z_T2(y)`:
//!
//! ```text
//! F = [C0] + q1·[C1] + q2·[C2]
//! E = (r0(y) + q1·r1(y) + q2·r2(y))·G1
//! J = Z_T0(y)·[W1]
//!
//! e(F − E − J + y·W2, G2) = e(W2, [τ]₂)
//! ```

#![forbid(unsafe_code)]

use ark_ec::{AffineRepr, CurveGroup, Group};
use ark_ff::{Field, One};
use tracing::{error, info};

use super::{
    challenge_alpha, challenge_beta_gamma, challenge_xi_seed, challenge_y, quotient_evals, remainders_at,
    Challenges, OpeningPoints, Proof, Roots, VerificationKey,
};
use crate::curve::{Fr, G1Projective, G2Projective, PairingCurve};
use crate::domain::{pow_u64, Domain};
use crate::pcs::pairing_check;
use crate::zkey::ProtocolError;

/// Re-derive every challenge from the key, public inputs and proof.
pub fn challenges<E: PairingCurve>(
    vk: &VerificationKey<E>,
    public: &[Fr<E>],
    proof: &Proof<E>,
) -> Result<Challenges<Fr<E>>, ProtocolError> {
    let (beta, gamma) = challenge_beta_gamma::<E>(&vk.c0, public, &proof.c1)?;
    let xi_seed = challenge_xi_seed::<E>(&gamma, &proof.c2)?;
    let alpha = challenge_alpha::<E>(&xi_seed, &proof.evals)?;
    let y = challenge_y::<E>(&alpha, &proof.w1)?;
    Ok(Challenges { beta, gamma, xi_seed, alpha, y })
}

pub fn verify<E: PairingCurve>(
    vk: &VerificationKey<E>,
    public: &[Fr<E>],
    proof: &Proof<E>,
) -> Result<bool, ProtocolError> {
    if public.len() != vk.n_public {
        return Err(ProtocolError::PublicSignals { expected: vk.n_public, got: public.len() });
    }
    let domain = Domain::<Fr<E>>::from_power(vk.power)?;
    if domain.omega != vk.w || Roots::<Fr<E>>::for_domain(domain.n)? != vk.roots {
        error!("verification key roots do not belong to its domain");
        return Ok(false);
    }
    let Challenges { beta, gamma, xi_seed, alpha, y } = challenges(vk, public, proof)?;
    let pts = OpeningPoints::new(xi_seed, vk.roots.wr);
    let xi = pts.xi;
    let e = &proof.evals;

    let lag = match domain.lagrange_evals(xi, vk.n_public.max(1)) {
        Ok(l) => l,
        Err(_) => {
            error!("evaluation point falls in the domain");
            return Ok(false);
        }
    };
    let pi: Fr<E> = -public.iter().zip(&lag).map(|(s, l)| *s * l).sum::<Fr<E>>();
    let zh = domain.vanishing_at(xi);
    let Some(t) = quotient_evals(e, xi, beta, gamma, vk.k1, vk.k2, pi, lag[0], zh) else {
        error!("evaluation point falls in the domain");
        return Ok(false);
    };
    let Some([r0, r1, r2]) = remainders_at(e, &t, xi, domain.omega, y) else {
        error!("degenerate opening points");
        return Ok(false);
    };

    let y3 = pow_u64(y, 3);
    let zt0 = pow_u64(y, 8) - xi;
    let zt1 = pow_u64(y, 4) - xi;
    let zt2 = (y3 - xi) * (y3 - xi * domain.omega);
    let (Some(zt1_inv), Some(zt2_inv)) = (zt1.inverse(), zt2.inverse()) else {
        error!("y hits an opening point");
        return Ok(false);
    };
    let q1 = alpha * zt0 * zt1_inv;
    let q2 = alpha.square() * zt0 * zt2_inv;

    let f = vk.c0.into_group() + proof.c1 * q1 + proof.c2 * q2;
    let big_e = G1Projective::<E>::generator() * (r0 + q1 * r1 + q2 * r2);
    let j = proof.w1 * zt0;
    let lhs = f - big_e - j + proof.w2 * y;
    let ok = pairing_check::<E>(&[
        (lhs.into_affine(), G2Projective::<E>::generator().into_affine()),
        ((-proof.w2.into_group()).into_affine(), vk.x2),
    ]);
    if ok {
        info!("fflonk proof OK");
    } else {
        error!("fflonk pairing check failed");
    }
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::super::{export_verification_key, prover, setup};
    use super::*;
    use crate::curve::{Bls12_381, Bn254};
    use crate::r1cs::R1cs;
    use crate::zkey::testutil::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::io::Cursor;

    fn prove_and_key<E: PairingCurve>(
        r1cs: &R1cs<E>,
        witness: &[Fr<E>],
    ) -> (VerificationKey<E>, Proof<E>, Vec<Fr<E>>) {
        let mut ptau = ptau::<E>(6);
        let bytes = setup::new_zkey(r1cs, &mut ptau, Cursor::new(Vec::new())).unwrap().into_inner();
        let vk = export_verification_key::<E, _>(&mut zkey_reader(bytes.clone())).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let (proof, public) = prover::prove_with_rng(&mut zkey_reader(bytes), witness, &mut rng).unwrap();
        (vk, proof, public)
    }

    #[test]
    fn square_circuit_completeness() {
        let (vk, proof, public) = prove_and_key(&square::<Bn254>(), &square_witness::<Bn254>(3));
        assert_eq!(public, vec![Fr::<Bn254>::from(9u64)]);
        assert!(verify(&vk, &public, &proof).unwrap());
        assert!(!verify(&vk, &[Fr::<Bn254>::from(10u64)], &proof).unwrap());
    }

    #[test]
    fn mixed_circuit_completeness_and_json() {
        let (vk, proof, public) = prove_and_key(&mixed::<Bn254>(), &mixed_witness::<Bn254>());
        let vk = VerificationKey::<Bn254>::from_json(&vk.to_json()).unwrap();
        let proof = Proof::<Bn254>::from_json(&proof.to_json()).unwrap();
        assert!(verify(&vk, &public, &proof).unwrap());
    }

    #[test]
    fn bls12_381_completeness() {
        let (vk, proof, public) = prove_and_key(&square::<Bls12_381>(), &square_witness::<Bls12_381>(4));
        assert!(verify(&vk, &public, &proof).unwrap());
    }

    #[test]
    fn tampered_proof_fails() {
        let (vk, proof, public) = prove_and_key(&square::<Bn254>(), &square_witness::<Bn254>(3));
        let mut bad = proof.clone();
        bad.evals.t2w += Fr::<Bn254>::one();
        assert!(!verify(&vk, &public, &bad).unwrap());
        let mut bad = proof;
        bad.w2 = bad.w1;
        assert!(!verify(&vk, &public, &bad).unwrap());
    }

    #[test]
    fn foreign_roots_are_rejected() {
        let (mut vk, proof, public) = prove_and_key(&square::<Bn254>(), &square_witness::<Bn254>(3));
        vk.roots.wr = vk.roots.wr.square();
        assert!(!verify(&vk, &public, &proof).unwrap());
    }
}
