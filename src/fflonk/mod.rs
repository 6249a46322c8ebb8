//! FFLONK proving keys, proofs and verification keys
//!
//! FFLONK commits to the same circuit polynomials as PLONK but packs them
//! into three combined polynomials so that a single pair of openings
//! suffices:
//!
//! ```text
//! C0(X) = Σ_j X^j·P_j(X^8)   P = (Ql, Qr, Qo, Qm, Qc, S1, S2, S3)   fixed
//! C1(X) = A(X^4) + X·B(X^4) + X²·C(X^4) + X³·T0(X^4)                 round 1
//! C2(X) = Z(X^3) + X·T1(X^3) + X²·T2(X^3)                            round 2
//! ```
//!
//! C0 and C1 are opened at the 8th and 4th roots of `ξ`, C2 at the cube
//! roots of both `ξ` and `ξω`.
//!
//! # zkey layout
//!
//! ```text
//! 1    protocol   u32 10
//! 2    header     n8q | q | n8r | r | u32 nVars | u32 nPublic |
//!                 u32 domainSize | u32 nAdditions | u32 nConstraints |
//!                 k1 | k2 | w3 | w4 | w8 | wr | [τ]₂ | [C0]₁
//! 3–13            as PLONK
//! 14   ptau       [τ^i]₁, i < 9·domainSize + 18
//! ```

#![forbid(unsafe_code)]

pub mod prover;
pub mod setup;
pub mod verifier;

use std::io::{Read, Seek, Write};

use ark_ff::{Field, PrimeField};
use serde_json::{json, Value};

use crate::binfile::{BinReader, BinWriter};
use crate::codec::CurveCodec;
use crate::curve::{Fr, G1Affine, G2Affine, PairingCurve};
use crate::domain::{pow_u64, root_of_unity, Domain};
use crate::plonk::{check_sizes, json_usize};
use crate::transcript::Keccak256Transcript;
use crate::zkey::{
    self, check_json_header, field, read_field_sizes, read_fr, read_g1, read_g2, write_field_sizes, write_fr,
    write_g1, write_g2, Protocol, ProtocolError, SEC_HEADER,
};

pub use crate::plonk::SEC_PTAU;

/// Ceremony points a key carries: `9·n + 18`.
pub fn ptau_points(n: usize) -> usize {
    9 * n + 18
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FflonkHeader<E: PairingCurve> {
    pub n_vars: u32,
    pub n_public: u32,
    pub domain_size: u32,
    pub n_additions: u32,
    pub n_constraints: u32,
    pub k1: Fr<E>,
    pub k2: Fr<E>,
    pub roots: Roots<Fr<E>>,
    pub x2: G2Affine<E>,
    pub c0: G1Affine<E>,
}

impl<E: PairingCurve> FflonkHeader<E> {
    pub fn power(&self) -> u32 {
        self.domain_size.trailing_zeros()
    }

    pub fn n(&self) -> usize {
        self.domain_size as usize
    }
}

/// Roots of unity fixed by the domain: `w3, w4, w8` of orders 3, 4, 8 and
/// `wr` with `wr³ = ω`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roots<F> {
    pub w3: F,
    pub w4: F,
    pub w8: F,
    pub wr: F,
}

impl<F: PrimeField> Roots<F> {
    pub fn for_domain(n: usize) -> Result<Self, ProtocolError> {
        Ok(Self {
            w3: root_of_unity(3)?,
            w4: root_of_unity(4)?,
            w8: root_of_unity(8)?,
            wr: root_of_unity(3 * n as u64)?,
        })
    }
}

/// Opening points derived from the challenge seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpeningPoints<F> {
    /// `ξ = seed^24`.
    pub xi: F,
    /// `h0^8 = ξ`.
    pub h0: F,
    /// `h1^4 = ξ`.
    pub h1: F,
    /// `h2^3 = ξ`.
    pub h2: F,
    /// `h3^3 = ξω`.
    pub h3: F,
}

impl<F: Field> OpeningPoints<F> {
    pub fn new(seed: F, wr: F) -> Self {
        let h0 = seed.square() * seed;
        let h1 = h0.square();
        let h2 = h1 * seed.square();
        Self { xi: h1.square().square(), h0, h1, h2, h3: h2 * wr }
    }
}

pub fn write_header<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
    h: &FflonkHeader<E>,
) -> Result<(), ProtocolError> {
    w.start_section(SEC_HEADER)?;
    write_field_sizes(w, codec)?;
    for v in [h.n_vars, h.n_public, h.domain_size, h.n_additions, h.n_constraints] {
        w.write_u32(v)?;
    }
    for x in [&h.k1, &h.k2, &h.roots.w3, &h.roots.w4, &h.roots.w8, &h.roots.wr] {
        write_fr(w, codec, x)?;
    }
    write_g2(w, codec, &h.x2)?;
    write_g1(w, codec, &h.c0)?;
    w.end_section()?;
    Ok(())
}

/// Check the protocol section and read the header.
pub fn read_key_header<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
) -> Result<FflonkHeader<E>, ProtocolError> {
    zkey::read_protocol(r)?.expect(Protocol::Fflonk)?;
    r.start_read_section(SEC_HEADER)?;
    read_field_sizes(r, codec)?;
    let n_vars = r.read_u32()?;
    let n_public = r.read_u32()?;
    let domain_size = r.read_u32()?;
    let n_additions = r.read_u32()?;
    let n_constraints = r.read_u32()?;
    let h = FflonkHeader {
        n_vars,
        n_public,
        domain_size,
        n_additions,
        n_constraints,
        k1: read_fr(r, codec)?,
        k2: read_fr(r, codec)?,
        roots: Roots { w3: read_fr(r, codec)?, w4: read_fr(r, codec)?, w8: read_fr(r, codec)?, wr: read_fr(r, codec)? },
        x2: read_g2(r, codec)?,
        c0: read_g1(r, codec)?,
    };
    r.end_read_section(false)?;
    check_sizes(domain_size, n_constraints, n_public, n_vars)?;
    Ok(h)
}

// ============================================================================
// Fiat–Shamir
// ============================================================================

/// Challenges in derivation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Challenges<F> {
    pub beta: F,
    pub gamma: F,
    pub xi_seed: F,
    pub alpha: F,
    pub y: F,
}

pub(crate) fn challenge_beta_gamma<E: PairingCurve>(
    c0: &G1Affine<E>,
    public: &[Fr<E>],
    c1: &G1Affine<E>,
) -> Result<(Fr<E>, Fr<E>), ProtocolError> {
    let mut t = Keccak256Transcript::<E>::new();
    t.add_point(c0);
    for s in public {
        t.add_scalar(s);
    }
    t.add_point(c1);
    let beta = t.get_challenge()?;
    t.reset();
    t.add_scalar(&beta);
    Ok((beta, t.get_challenge()?))
}

pub(crate) fn challenge_xi_seed<E: PairingCurve>(gamma: &Fr<E>, c2: &G1Affine<E>) -> Result<Fr<E>, ProtocolError> {
    let mut t = Keccak256Transcript::<E>::new();
    t.add_scalar(gamma);
    t.add_point(c2);
    Ok(t.get_challenge()?)
}

pub(crate) fn challenge_alpha<E: PairingCurve>(xi_seed: &Fr<E>, evals: &Evaluations<Fr<E>>) -> Result<Fr<E>, ProtocolError> {
    let mut t = Keccak256Transcript::<E>::new();
    t.add_scalar(xi_seed);
    for e in evals.in_order() {
        t.add_scalar(e);
    }
    Ok(t.get_challenge()?)
}

pub(crate) fn challenge_y<E: PairingCurve>(alpha: &Fr<E>, w1: &G1Affine<E>) -> Result<Fr<E>, ProtocolError> {
    let mut t = Keccak256Transcript::<E>::new();
    t.add_scalar(alpha);
    t.add_point(w1);
    Ok(t.get_challenge()?)
}

// ============================================================================
// Proof
// ============================================================================

/// Opened values: the eight fixed polynomials, wires and `z` at `ξ`, and
/// `z, T1, T2` at `ξω`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Evaluations<F> {
    pub ql: F,
    pub qr: F,
    pub qm: F,
    pub qo: F,
    pub qc: F,
    pub s1: F,
    pub s2: F,
    pub s3: F,
    pub a: F,
    pub b: F,
    pub c: F,
    pub z: F,
    pub zw: F,
    pub t1w: F,
    pub t2w: F,
}

const EVAL_NAMES: [&str; 15] =
    ["ql", "qr", "qm", "qo", "qc", "s1", "s2", "s3", "a", "b", "c", "z", "zw", "t1w", "t2w"];

impl<F> Evaluations<F> {
    /// Transcript and JSON order.
    pub fn in_order(&self) -> [&F; 15] {
        [
            &self.ql, &self.qr, &self.qm, &self.qo, &self.qc, &self.s1, &self.s2, &self.s3, &self.a, &self.b,
            &self.c, &self.z, &self.zw, &self.t1w, &self.t2w,
        ]
    }

    fn from_order([ql, qr, qm, qo, qc, s1, s2, s3, a, b, c, z, zw, t1w, t2w]: [F; 15]) -> Self {
        Self { ql, qr, qm, qo, qc, s1, s2, s3, a, b, c, z, zw, t1w, t2w }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof<E: PairingCurve> {
    pub c1: G1Affine<E>,
    pub c2: G1Affine<E>,
    pub w1: G1Affine<E>,
    pub w2: G1Affine<E>,
    pub evals: Evaluations<Fr<E>>,
}

impl<E: PairingCurve> Proof<E> {
    pub fn to_json(&self) -> Value {
        let codec = CurveCodec::<E>::new();
        let mut v = json!({
            "C1": codec.g1_to_json(&self.c1),
            "C2": codec.g1_to_json(&self.c2),
            "W1": codec.g1_to_json(&self.w1),
            "W2": codec.g1_to_json(&self.w2),
            "protocol": Protocol::Fflonk.name(),
            "curve": E::NAME,
        });
        if let Some(obj) = v.as_object_mut() {
            for (name, e) in EVAL_NAMES.iter().zip(self.evals.in_order()) {
                obj.insert(name.to_string(), codec.fr_to_json(e));
            }
        }
        v
    }

    pub fn from_json(v: &Value) -> Result<Self, ProtocolError> {
        check_json_header::<E>(v, Protocol::Fflonk)?;
        let codec = CurveCodec::<E>::new();
        let g = |name| -> Result<G1Affine<E>, ProtocolError> { Ok(codec.g1_from_json(field(v, name)?)?) };
        let mut evals = Vec::with_capacity(EVAL_NAMES.len());
        for name in EVAL_NAMES {
            evals.push(codec.fr_from_json(field(v, name)?)?);
        }
        let evals: [Fr<E>; 15] =
            evals.try_into().map_err(|_| ProtocolError::BadZkey("evaluation count".into()))?;
        Ok(Self { c1: g("C1")?, c2: g("C2")?, w1: g("W1")?, w2: g("W2")?, evals: Evaluations::from_order(evals) })
    }
}

// ============================================================================
// Verification key
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationKey<E: PairingCurve> {
    pub n_public: usize,
    pub power: u32,
    pub k1: Fr<E>,
    pub k2: Fr<E>,
    /// Generator of the domain.
    pub w: Fr<E>,
    pub roots: Roots<Fr<E>>,
    pub x2: G2Affine<E>,
    pub c0: G1Affine<E>,
}

impl<E: PairingCurve> VerificationKey<E> {
    pub fn to_json(&self) -> Value {
        let codec = CurveCodec::<E>::new();
        let f = |x: &Fr<E>| codec.fr_to_json(x);
        json!({
            "protocol": Protocol::Fflonk.name(),
            "curve": E::NAME,
            "nPublic": self.n_public,
            "power": self.power,
            "k1": f(&self.k1),
            "k2": f(&self.k2),
            "w": f(&self.w),
            "w3": f(&self.roots.w3),
            "w4": f(&self.roots.w4),
            "w8": f(&self.roots.w8),
            "wr": f(&self.roots.wr),
            "X_2": codec.g2_to_json(&self.x2),
            "C0": codec.g1_to_json(&self.c0),
        })
    }

    pub fn from_json(v: &Value) -> Result<Self, ProtocolError> {
        check_json_header::<E>(v, Protocol::Fflonk)?;
        let codec = CurveCodec::<E>::new();
        let f = |name| -> Result<Fr<E>, ProtocolError> { Ok(codec.fr_from_json(field(v, name)?)?) };
        Ok(Self {
            n_public: json_usize(v, "nPublic")?,
            power: json_usize(v, "power")? as u32,
            k1: f("k1")?,
            k2: f("k2")?,
            w: f("w")?,
            roots: Roots { w3: f("w3")?, w4: f("w4")?, w8: f("w8")?, wr: f("wr")? },
            x2: codec.g2_from_json(field(v, "X_2")?)?,
            c0: codec.g1_from_json(field(v, "C0")?)?,
        })
    }
}

/// Verification key of an FFLONK zkey (section 2).
pub fn export_verification_key<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
) -> Result<VerificationKey<E>, ProtocolError> {
    let codec = CurveCodec::<E>::new();
    let h = read_key_header(r, &codec)?;
    let domain = Domain::<Fr<E>>::new(h.n())?;
    Ok(VerificationKey {
        n_public: h.n_public as usize,
        power: h.power(),
        k1: h.k1,
        k2: h.k2,
        w: domain.omega,
        roots: h.roots,
        x2: h.x2,
        c0: h.c0,
    })
}

// ============================================================================
// Opening remainders
// ============================================================================

/// Quotient values at `ξ` recovered from the opened values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotientEvals<F> {
    pub t0: F,
    pub t1: F,
    pub t2: F,
}

/// Recompute `T0(ξ), T1(ξ), T2(ξ)` from the gate, boundary and permutation
/// identities. `pi` is `PI(ξ)`, `l0` is `L0(ξ)`, `zh` is `Z_H(ξ)`.
#[allow(clippy::too_many_arguments)]
pub fn quotient_evals<F: Field>(
    e: &Evaluations<F>,
    xi: F,
    beta: F,
    gamma: F,
    k1: F,
    k2: F,
    pi: F,
    l0: F,
    zh: F,
) -> Option<QuotientEvals<F>> {
    let zh_inv = zh.inverse()?;
    let gate = e.ql * e.a + e.qr * e.b + e.qm * e.a * e.b + e.qo * e.c + e.qc + pi;
    let boundary = l0 * (e.z - F::one());
    let perm = e.z * (e.a + beta * xi + gamma) * (e.b + beta * k1 * xi + gamma) * (e.c + beta * k2 * xi + gamma)
        - e.zw * (e.a + beta * e.s1 + gamma) * (e.b + beta * e.s2 + gamma) * (e.c + beta * e.s3 + gamma);
    Some(QuotientEvals { t0: gate * zh_inv, t1: boundary * zh_inv, t2: perm * zh_inv })
}

/// Values at `y` of the remainders `R0, R1, R2` of `C0, C1, C2` modulo
/// their vanishing polynomials.
///
/// ```text
/// R0(X) = Σ_j p_j X^j                              (X^8 = ξ)
/// R1(X) = a + bX + cX² + t0X³                      (X^4 = ξ)
/// Ra(X) = z + t1X + t2X²                           (X^3 = ξ)
/// Rw(X) = zw + t1wX + t2wX²                        (X^3 = ξω)
/// R2(X) = Ra + (X³ − ξ)(Rw − Ra)/(ξω − ξ)
/// ```
pub fn remainders_at<F: Field>(e: &Evaluations<F>, t: &QuotientEvals<F>, xi: F, omega: F, y: F) -> Option<[F; 3]> {
    let horner = |c: &[F]| c.iter().rev().fold(F::zero(), |acc, v| acc * y + v);
    let r0 = horner(&[e.ql, e.qr, e.qo, e.qm, e.qc, e.s1, e.s2, e.s3]);
    let r1 = horner(&[e.a, e.b, e.c, t.t0]);
    let ra = horner(&[e.z, t.t1, t.t2]);
    let rw = horner(&[e.zw, e.t1w, e.t2w]);
    let den = (xi * omega - xi).inverse()?;
    let r2 = ra + (pow_u64(y, 3) - xi) * (rw - ra) * den;
    Some([r0, r1, r2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{Bn254, G1Projective};
    use ark_ec::{CurveGroup, Group};
    use ark_ff::One;

    fn proof() -> Proof<Bn254> {
        let p = |k: u64| (G1Projective::<Bn254>::generator() * Fr::<Bn254>::from(k)).into_affine();
        let e: [Fr<Bn254>; 15] = std::array::from_fn(|i| Fr::<Bn254>::from(i as u64 + 10));
        Proof { c1: p(1), c2: p(2), w1: p(3), w2: p(4), evals: Evaluations::from_order(e) }
    }

    #[test]
    fn proof_json_roundtrip() {
        let p = proof();
        let v = p.to_json();
        assert_eq!(v["protocol"], "fflonk");
        assert_eq!(v["ql"], "10");
        assert_eq!(v["t2w"], "24");
        assert_eq!(Proof::<Bn254>::from_json(&v).unwrap(), p);
    }

    #[test]
    fn plonk_proof_is_rejected() {
        let mut v = proof().to_json();
        v["protocol"] = "plonk".into();
        assert!(Proof::<Bn254>::from_json(&v).is_err());
    }

    #[test]
    fn opening_points_hit_xi() {
        type F = Fr<Bn254>;
        let n = 8;
        let d = Domain::<F>::new(n).unwrap();
        let roots = Roots::<F>::for_domain(n).unwrap();
        assert_eq!(pow_u64(roots.wr, 3), d.omega);
        assert_eq!(pow_u64(roots.w3, 3), F::one());
        assert_eq!(pow_u64(roots.w8, 4), -F::one());
        let pts = OpeningPoints::new(F::from(5u64), roots.wr);
        assert_eq!(pts.xi, pow_u64(F::from(5u64), 24));
        assert_eq!(pow_u64(pts.h0, 8), pts.xi);
        assert_eq!(pow_u64(pts.h1, 4), pts.xi);
        assert_eq!(pow_u64(pts.h2, 3), pts.xi);
        assert_eq!(pow_u64(pts.h3, 3), pts.xi * d.omega);
    }
}
