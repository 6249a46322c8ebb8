//! Pairing-friendly curves supported by the ceremony and the provers
//!
//! Files never name their curve explicitly: the base-field prime `q` found in
//! a header identifies it. [`CurveId::from_q`] performs that lookup and
//! [`with_curve!`](crate::with_curve) turns the runtime id into a concrete
//! arkworks engine for generic code.
//!
//! All curve code in the crate is generic over [`PairingCurve`], which ties an
//! arkworks [`Pairing`] engine to the short-Weierstrass configurations of its
//! two source groups. Working on `short_weierstrass::Affine<P>` directly gives
//! us coordinate access for the on-disk encodings without going through the
//! arkworks serializers (whose BLS12-381 format differs from ours).

#![forbid(unsafe_code)]

use ark_ec::{
    pairing::Pairing,
    short_weierstrass::{Affine, Projective, SWCurveConfig},
};
use ark_ff::{BigInteger, Field, PrimeField};
use num_bigint::BigUint;

/// Errors raised while identifying or matching curves.
#[derive(Debug, thiserror::Error)]
pub enum CurveError {
    #[error("unknown curve: base field prime {0}")]
    Unknown(String),
    #[error("unknown curve name `{0}`")]
    UnknownName(String),
    #[error("curve mismatch: expected {expected}, file uses {found}")]
    Mismatch { expected: &'static str, found: String },
}

/// Runtime identifier of a supported curve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CurveId {
    /// BN254 (`alt_bn128`).
    Bn128,
    /// BLS12-381.
    Bls12381,
}

impl CurveId {
    /// Canonical lowercase name (as written in proof JSON).
    pub fn name(self) -> &'static str {
        match self {
            CurveId::Bn128 => "bn128",
            CurveId::Bls12381 => "bls12381",
        }
    }

    /// Parse a curve name; accepts a few common aliases.
    pub fn from_name(s: &str) -> Result<Self, CurveError> {
        match s.to_ascii_lowercase().as_str() {
            "bn128" | "bn254" | "alt_bn128" => Ok(CurveId::Bn128),
            "bls12381" | "bls12-381" | "bls12_381" => Ok(CurveId::Bls12381),
            _ => Err(CurveError::UnknownName(s.to_string())),
        }
    }

    /// Identify a curve from its base-field prime.
    pub fn from_q(q: &BigUint) -> Result<Self, CurveError> {
        if *q == modulus_of::<ark_bn254::Fq>() {
            Ok(CurveId::Bn128)
        } else if *q == modulus_of::<ark_bls12_381::Fq>() {
            Ok(CurveId::Bls12381)
        } else {
            Err(CurveError::Unknown(q.to_string()))
        }
    }

    /// Identify a curve from its scalar-field prime (witness files carry only `r`).
    pub fn from_r(r: &BigUint) -> Result<Self, CurveError> {
        if *r == modulus_of::<ark_bn254::Fr>() {
            Ok(CurveId::Bn128)
        } else if *r == modulus_of::<ark_bls12_381::Fr>() {
            Ok(CurveId::Bls12381)
        } else {
            Err(CurveError::Unknown(r.to_string()))
        }
    }
}

/// Modulus of a prime field as a big integer.
pub fn modulus_of<F: PrimeField>() -> BigUint {
    BigUint::from_bytes_le(&F::MODULUS.to_bytes_le())
}

/// A pairing engine together with the short-Weierstrass configs of its groups.
pub trait PairingCurve: Pairing {
    /// Name written into proofs and verification keys.
    const NAME: &'static str;
    /// Runtime id.
    const ID: CurveId;
    /// Base prime field of G1.
    type Fq: PrimeField;
    /// Quadratic extension carrying G2 coordinates.
    type Fq2: Field<BasePrimeField = Self::Fq>;
    /// G1 curve parameters.
    type G1Config: SWCurveConfig<BaseField = Self::Fq, ScalarField = Self::ScalarField>;
    /// G2 curve parameters.
    type G2Config: SWCurveConfig<BaseField = Self::Fq2, ScalarField = Self::ScalarField>;

    /// Hand a G1 point to the pairing engine.
    fn g1_for_pairing(p: G1Affine<Self>) -> Self::G1Affine;
    /// Hand a G2 point to the pairing engine.
    fn g2_for_pairing(p: G2Affine<Self>) -> Self::G2Affine;

    /// Fail unless `q` is this curve's base-field prime.
    fn check_q(q: &BigUint) -> Result<(), CurveError> {
        if *q == modulus_of::<Self::Fq>() {
            Ok(())
        } else {
            Err(CurveError::Mismatch {
                expected: Self::NAME,
                found: CurveId::from_q(q).map(|c| c.name().to_string()).unwrap_or_else(|_| q.to_string()),
            })
        }
    }

    /// Fail unless `r` is this curve's scalar-field prime.
    fn check_r(r: &BigUint) -> Result<(), CurveError> {
        if *r == modulus_of::<Self::ScalarField>() {
            Ok(())
        } else {
            Err(CurveError::Mismatch {
                expected: Self::NAME,
                found: CurveId::from_r(r).map(|c| c.name().to_string()).unwrap_or_else(|_| r.to_string()),
            })
        }
    }
}

/// BN254 engine.
pub type Bn254 = ark_bn254::Bn254;
/// BLS12-381 engine.
pub type Bls12_381 = ark_bls12_381::Bls12_381;

/// Scalar field of `E`.
pub type Fr<E> = <E as Pairing>::ScalarField;
/// Affine G1 point of `E`.
pub type G1Affine<E> = Affine<<E as PairingCurve>::G1Config>;
/// Projective G1 point of `E`.
pub type G1Projective<E> = Projective<<E as PairingCurve>::G1Config>;
/// Affine G2 point of `E`.
pub type G2Affine<E> = Affine<<E as PairingCurve>::G2Config>;
/// Projective G2 point of `E`.
pub type G2Projective<E> = Projective<<E as PairingCurve>::G2Config>;

impl PairingCurve for ark_bn254::Bn254 {
    const NAME: &'static str = "bn128";
    const ID: CurveId = CurveId::Bn128;
    type Fq = ark_bn254::Fq;
    type Fq2 = ark_bn254::Fq2;
    type G1Config = ark_bn254::g1::Config;
    type G2Config = ark_bn254::g2::Config;

    #[inline]
    fn g1_for_pairing(p: G1Affine<Self>) -> Self::G1Affine {
        p
    }
    #[inline]
    fn g2_for_pairing(p: G2Affine<Self>) -> Self::G2Affine {
        p
    }
}

impl PairingCurve for ark_bls12_381::Bls12_381 {
    const NAME: &'static str = "bls12381";
    const ID: CurveId = CurveId::Bls12381;
    type Fq = ark_bls12_381::Fq;
    type Fq2 = ark_bls12_381::Fq2;
    type G1Config = ark_bls12_381::g1::Config;
    type G2Config = ark_bls12_381::g2::Config;

    #[inline]
    fn g1_for_pairing(p: G1Affine<Self>) -> Self::G1Affine {
        p
    }
    #[inline]
    fn g2_for_pairing(p: G2Affine<Self>) -> Self::G2Affine {
        p
    }
}

/// Run `$body` with `$E` bound to the arkworks engine of a runtime [`CurveId`].
///
/// ```
/// use zkforge::{curve::{CurveId, PairingCurve}, with_curve};
/// let name = with_curve!(CurveId::Bn128, E => <E as PairingCurve>::NAME);
/// assert_eq!(name, "bn128");
/// ```
#[macro_export]
macro_rules! with_curve {
    ($id:expr, $E:ident => $body:expr) => {
        match $id {
            $crate::curve::CurveId::Bn128 => {
                type $E = $crate::curve::Bn254;
                $body
            }
            $crate::curve::CurveId::Bls12381 => {
                type $E = $crate::curve::Bls12_381;
                $body
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_curves_from_primes() {
        assert_eq!(CurveId::from_q(&modulus_of::<ark_bn254::Fq>()).unwrap(), CurveId::Bn128);
        assert_eq!(
            CurveId::from_q(&modulus_of::<ark_bls12_381::Fq>()).unwrap(),
            CurveId::Bls12381
        );
        assert_eq!(CurveId::from_r(&modulus_of::<ark_bn254::Fr>()).unwrap(), CurveId::Bn128);
        assert!(CurveId::from_q(&BigUint::from(17u32)).is_err());
    }

    #[test]
    fn mismatch_names_the_other_curve() {
        let err = Bn254::check_q(&modulus_of::<ark_bls12_381::Fq>()).unwrap_err();
        assert!(err.to_string().contains("bls12381"), "{err}");
        assert!(Bls12_381::check_r(&modulus_of::<ark_bls12_381::Fr>()).is_ok());
    }

    #[test]
    fn macro_dispatches() {
        for id in [CurveId::Bn128, CurveId::Bls12381] {
            let name = crate::with_curve!(id, E => <E as PairingCurve>::NAME);
            assert_eq!(name, id.name());
            assert_eq!(CurveId::from_name(name).unwrap(), id);
        }
    }
}
