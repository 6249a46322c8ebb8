//! PLONK verifier.
//!
//! With `r0` the constant part of the linearisation,
//!
//! ```text
//! D = ab·[Qm] + a·[Ql] + b·[Qr] + c·[Qo] + [Qc]
//!   + (α(a+βξ+γ)(b+βk1ξ+γ)(c+βk2ξ+γ) + α²L0(ξ) + u)·[Z]
//!   − α(a+βs1+γ)(b+βs2+γ)β·zw·[S3]
//!   − Z_H(ξ)·([T1] + ξⁿ[T2] + ξ²ⁿ[T3])
//! F = D + v[A] + v²[B] + v³[C] + v⁴[S1] + v⁵[S2]
//! E = (−r0 + va + v²b + v³c + v⁴s1 + v⁵s2 + u·zw)·G1
//!
//! e(Wxi + u·Wxiw, [τ]₂) = e(ξ·Wxi + uξω·Wxiw + F − E, G2)
//! ```

#![forbid(unsafe_code)]

use ark_ec::{AffineRepr, CurveGroup, Group};
use ark_ff::{Field, One};
use tracing::{error, info};

use super::{
    challenge_alpha, challenge_beta_gamma, challenge_u, challenge_v, challenge_xi, Challenges, Proof,
    VerificationKey,
};
use crate::curve::{Fr, G1Projective, G2Projective, PairingCurve};
use crate::domain::{pow_u64, Domain};
use crate::pcs::{msm, pairing_check};
use crate::zkey::ProtocolError;

/// Re-derive every challenge from the key, public inputs and proof.
pub fn challenges<E: PairingCurve>(
    vk: &VerificationKey<E>,
    public: &[Fr<E>],
    proof: &Proof<E>,
) -> Result<Challenges<Fr<E>>, ProtocolError> {
    let key = [&vk.qm, &vk.ql, &vk.qr, &vk.qo, &vk.qc, &vk.s1, &vk.s2, &vk.s3];
    let (beta, gamma) = challenge_beta_gamma::<E>(key, public, [&proof.a, &proof.b, &proof.c])?;
    let alpha = challenge_alpha::<E>(&beta, &gamma, &proof.z)?;
    let xi = challenge_xi::<E>(&alpha, [&proof.t1, &proof.t2, &proof.t3])?;
    let v = challenge_v::<E>(
        &xi,
        [&proof.eval_a, &proof.eval_b, &proof.eval_c, &proof.eval_s1, &proof.eval_s2, &proof.eval_zw],
    )?;
    let u = challenge_u::<E>(&proof.wxi, &proof.wxiw)?;
    Ok(Challenges { beta, gamma, alpha, xi, v, u })
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
    if domain.omega != vk.w {
        error!("verification key w is not the generator of its domain");
        return Ok(false);
    }
    let ch = challenges(vk, public, proof)?;
    let Challenges { beta, gamma, alpha, xi, v, u } = ch;
    let p = proof;

    let n = domain.n as u64;
    let xin = pow_u64(xi, n);
    let zh = xin - Fr::<E>::one();
    let lag = match domain.lagrange_evals(xi, vk.n_public.max(1)) {
        Ok(l) => l,
        Err(_) => {
            error!("evaluation point falls in the domain");
            return Ok(false);
        }
    };
    let l0 = lag[0];
    let pi: Fr<E> = -public.iter().zip(&lag).map(|(s, l)| *s * l).sum::<Fr<E>>();
    let alpha2 = alpha.square();
    let e1 = p.eval_a + beta * p.eval_s1 + gamma;
    let e2 = p.eval_b + beta * p.eval_s2 + gamma;
    let r0 = pi - alpha2 * l0 - alpha * e1 * e2 * (p.eval_c + gamma) * p.eval_zw;

    let z_coef = alpha
        * (p.eval_a + beta * xi + gamma)
        * (p.eval_b + beta * vk.k1 * xi + gamma)
        * (p.eval_c + beta * vk.k2 * xi + gamma)
        + alpha2 * l0
        + u;
    let v2 = v * v;
    let v3 = v2 * v;
    let v4 = v3 * v;
    let v5 = v4 * v;
    let bases = [
        vk.qm, vk.ql, vk.qr, vk.qo, vk.qc, p.z, vk.s3, p.t1, p.t2, p.t3, p.a, p.b, p.c, vk.s1, vk.s2,
    ];
    let scalars = [
        p.eval_a * p.eval_b,
        p.eval_a,
        p.eval_b,
        p.eval_c,
        Fr::<E>::one(),
        z_coef,
        -(alpha * e1 * e2 * beta * p.eval_zw),
        -zh,
        -zh * xin,
        -zh * xin * xin,
        v,
        v2,
        v3,
        v4,
        v5,
    ];
    let f = msm(&bases, &scalars);
    let e = -r0 + v * p.eval_a + v2 * p.eval_b + v3 * p.eval_c + v4 * p.eval_s1 + v5 * p.eval_s2 + u * p.eval_zw;
    let g1 = G1Projective::<E>::generator();

    let lhs = p.wxi.into_group() + p.wxiw * u;
    let rhs = p.wxi * xi + p.wxiw * (u * xi * domain.omega) + f - g1 * e;
    let ok = pairing_check::<E>(&[
        ((-lhs).into_affine(), vk.x2),
        (rhs.into_affine(), G2Projective::<E>::generator().into_affine()),
    ]);
    if ok {
        info!("plonk proof OK");
    } else {
        error!("plonk pairing check failed");
    }
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::super::{export_verification_key, prover, setup, Proof, VerificationKey};
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
        power: u32,
    ) -> (VerificationKey<E>, Proof<E>, Vec<Fr<E>>) {
        let mut ptau = ptau::<E>(power);
        let bytes = setup::new_zkey(r1cs, &mut ptau, Cursor::new(Vec::new())).unwrap().into_inner();
        let vk = export_verification_key::<E, _>(&mut zkey_reader(bytes.clone())).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let (proof, public) = prover::prove_with_rng(&mut zkey_reader(bytes), witness, &mut rng).unwrap();
        (vk, proof, public)
    }

    #[test]
    fn square_circuit_completeness() {
        let (vk, proof, public) = prove_and_key(&square::<Bn254>(), &square_witness::<Bn254>(3), 3);
        assert_eq!(public, vec![Fr::<Bn254>::from(9u64)]);
        assert!(verify(&vk, &public, &proof).unwrap());
        assert!(!verify(&vk, &[Fr::<Bn254>::from(10u64)], &proof).unwrap());
    }

    #[test]
    fn mixed_circuit_completeness_and_json() {
        let (vk, proof, public) = prove_and_key(&mixed::<Bn254>(), &mixed_witness::<Bn254>(), 4);
        let vk = VerificationKey::<Bn254>::from_json(&vk.to_json()).unwrap();
        let proof = Proof::<Bn254>::from_json(&proof.to_json()).unwrap();
        assert!(verify(&vk, &public, &proof).unwrap());
    }

    #[test]
    fn bls12_381_completeness() {
        let (vk, proof, public) = prove_and_key(&square::<Bls12_381>(), &square_witness::<Bls12_381>(5), 3);
        assert!(verify(&vk, &public, &proof).unwrap());
    }

    #[test]
    fn tampered_evaluation_fails() {
        let (vk, mut proof, public) = prove_and_key(&square::<Bn254>(), &square_witness::<Bn254>(3), 3);
        proof.eval_zw += Fr::<Bn254>::one();
        assert!(!verify(&vk, &public, &proof).unwrap());
    }

    #[test]
    fn public_signal_count_is_checked() {
        let (vk, proof, _) = prove_and_key(&square::<Bn254>(), &square_witness::<Bn254>(3), 3);
        assert!(matches!(
            verify(&vk, &[], &proof),
            Err(ProtocolError::PublicSignals { expected: 1, got: 0 })
        ));
    }
}
