//! Polynomial commitments and pairing checks
//!
//! KZG commitments over the monomial `[τ^i]₁` points taken from a ceremony
//! file, multi-scalar multiplication for every curve sum in the crate, and
//! the two pairing predicates the ceremony and the verifiers are built on:
//!
//! - [`pairing_check`]: `∏ e(P_i, Q_i) == 1`;
//! - [`same_ratio`]: `(A, A')` and `(B, B')` were scaled by the same secret,
//!   i.e. `e(A, B') == e(A', B)`.

#![forbid(unsafe_code)]

use ark_ec::{
    short_weierstrass::{Affine, Projective, SWCurveConfig},
    AffineRepr, CurveGroup, VariableBaseMSM,
};
use ark_ff::{One, Zero};

use crate::curve::{Fr, G1Affine, G2Affine, PairingCurve};

/// Errors raised while committing.
#[derive(Debug, thiserror::Error)]
pub enum PcsError {
    #[error("polynomial has {coeffs} coefficients but only {powers} powers of tau are available")]
    TooManyCoeffs { coeffs: usize, powers: usize },
}

/// `[P(τ)]₁` from monomial powers.
pub fn commit<E: PairingCurve>(powers: &[G1Affine<E>], coeffs: &[Fr<E>]) -> Result<G1Affine<E>, PcsError> {
    let used = coeffs.iter().rposition(|c| !c.is_zero()).map_or(0, |d| d + 1);
    if used > powers.len() {
        return Err(PcsError::TooManyCoeffs { coeffs: used, powers: powers.len() });
    }
    Ok(msm(&powers[..used], &coeffs[..used]).into_affine())
}

/// `Σ s_i·P_i` over the common prefix of `bases` and `scalars`.
pub fn msm<P: SWCurveConfig>(bases: &[Affine<P>], scalars: &[P::ScalarField]) -> Projective<P> {
    let n = bases.len().min(scalars.len());
    if n == 0 {
        return Projective::zero();
    }
    Projective::<P>::msm_unchecked(&bases[..n], &scalars[..n])
}

/// `∏ e(g1_i, g2_i) == 1`.
pub fn pairing_check<E: PairingCurve>(pairs: &[(G1Affine<E>, G2Affine<E>)]) -> bool {
    let a = pairs.iter().map(|(p, _)| E::g1_for_pairing(*p));
    let b = pairs.iter().map(|(_, q)| E::g2_for_pairing(*q));
    E::multi_pairing(a, b).0.is_one()
}

/// `e(g1_s, g2_sx) == e(g1_sx, g2_s)`. Identity inputs never pass.
pub fn same_ratio<E: PairingCurve>(
    g1_s: G1Affine<E>,
    g1_sx: G1Affine<E>,
    g2_s: G2Affine<E>,
    g2_sx: G2Affine<E>,
) -> bool {
    if g1_s.is_zero() || g1_sx.is_zero() || g2_s.is_zero() || g2_sx.is_zero() {
        return false;
    }
    pairing_check::<E>(&[(-g1_s, g2_sx), (g1_sx, g2_s)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{Bls12_381, Bn254, G1Projective, G2Projective};
    use ark_ec::Group;
    use ark_ff::UniformRand;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn kzg_identity<E: PairingCurve>() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let tau = Fr::<E>::rand(&mut rng);
        let g1 = G1Projective::<E>::generator();
        let g2 = G2Projective::<E>::generator();
        let mut t = Fr::<E>::one();
        let powers: Vec<G1Affine<E>> = (0..8)
            .map(|_| {
                let p = (g1 * t).into_affine();
                t *= tau;
                p
            })
            .collect();
        let coeffs: Vec<Fr<E>> = (1..=5u64).map(Fr::<E>::from).collect();
        let c = commit::<E>(&powers, &coeffs).unwrap();
        let value = crate::polynomial::eval(&coeffs, tau);
        assert_eq!(c, (g1 * value).into_affine());
        // Opening at z: [Q(τ)]₁ with Q = (P − P(z))/(X − z) passes e(C − v·G1, G2) = e(Q, [τ − z]₂).
        let z = Fr::<E>::from(7u64);
        let (q, rem) = crate::quotient::divide_by_xm_minus_c(&coeffs, 1, z);
        let v = crate::polynomial::eval(&coeffs, z);
        assert_eq!(rem, vec![v]);
        let w = commit::<E>(&powers, &q).unwrap();
        let lhs = (c.into_group() - g1 * v).into_affine();
        let x_minus_z = (g2 * tau - g2 * z).into_affine();
        assert!(pairing_check::<E>(&[(lhs, g2.into_affine()), (-w, x_minus_z)]));

        let s = Fr::<E>::rand(&mut rng);
        let a = g1.into_affine();
        let b = g2.into_affine();
        assert!(same_ratio::<E>(a, (g1 * s).into_affine(), b, (g2 * s).into_affine()));
        assert!(!same_ratio::<E>(a, (g1 * s).into_affine(), b, (g2 * tau).into_affine()));
        assert!(!same_ratio::<E>(G1Affine::<E>::zero(), a, b, b));

        let too_long = vec![Fr::<E>::one(); 9];
        assert!(matches!(commit::<E>(&powers, &too_long), Err(PcsError::TooManyCoeffs { coeffs: 9, powers: 8 })));
    }

    #[test]
    fn bn254_kzg() {
        kzg_identity::<Bn254>();
    }

    #[test]
    fn bls12_381_kzg() {
        kzg_identity::<Bls12_381>();
    }
}
