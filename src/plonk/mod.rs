//! PLONK proving keys, proofs and verification keys
//!
//! # zkey layout
//!
//! ```text
//! 1   protocol     u32 2
//! 2   header       n8q | q | n8r | r | u32 nVars | u32 nPublic |
//!                  u32 domainSize | u32 nAdditions | u32 nConstraints |
//!                  k1 | k2 | [Qm] | [Ql] | [Qr] | [Qo] | [Qc] |
//!                  [S1] | [S2] | [S3] | [τ]₂
//! 3   additions    { u32 s1 | u32 s2 | Fr k1 | Fr k2 }*
//! 4–6 wire maps    u32 wire per gate for a, b, c
//! 7–11 selectors   Qm, Ql, Qr, Qo, Qc
//! 12  sigma        S1, S2, S3
//! 13  lagrange     L_i for every public signal
//! 14  ptau         [τ^i]₁, i < domainSize + 6
//! ```
//!
//! Every polynomial in sections 7–13 is stored as its `n` coefficients
//! followed by its `4n` evaluations over the extended domain.
//! Sections 3–13 are shared with FFLONK keys.

#![forbid(unsafe_code)]

pub mod circuit;
pub mod prover;
pub mod setup;
pub mod verifier;

use std::io::{Read, Seek, Write};

use serde_json::{json, Value};

use crate::binfile::{BinReader, BinWriter};
use crate::codec::{CodecError, CurveCodec};
use crate::curve::{Fr, G1Affine, G2Affine, PairingCurve};
use crate::domain::Domain;
use crate::transcript::Keccak256Transcript;
use crate::zkey::{
    self, check_json_header, field, read_field_sizes, read_fr, read_g1, read_g2, write_field_sizes, write_fr,
    write_g1, write_g2, Protocol, ProtocolError, SEC_HEADER,
};

use circuit::Addition;

pub const SEC_ADDITIONS: u32 = 3;
pub const SEC_A_MAP: u32 = 4;
pub const SEC_B_MAP: u32 = 5;
pub const SEC_C_MAP: u32 = 6;
pub const SEC_QM: u32 = 7;
pub const SEC_QL: u32 = 8;
pub const SEC_QR: u32 = 9;
pub const SEC_QO: u32 = 10;
pub const SEC_QC: u32 = 11;
pub const SEC_SIGMA: u32 = 12;
pub const SEC_LAGRANGE: u32 = 13;
pub const SEC_PTAU: u32 = 14;

/// Extra monomial points beyond the domain size a PLONK key carries.
pub const PTAU_EXTRA_POINTS: usize = 6;

/// Header fields after the field sizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlonkHeader<E: PairingCurve> {
    pub n_vars: u32,
    pub n_public: u32,
    pub domain_size: u32,
    pub n_additions: u32,
    pub n_constraints: u32,
    pub k1: Fr<E>,
    pub k2: Fr<E>,
    pub qm: G1Affine<E>,
    pub ql: G1Affine<E>,
    pub qr: G1Affine<E>,
    pub qo: G1Affine<E>,
    pub qc: G1Affine<E>,
    pub s1: G1Affine<E>,
    pub s2: G1Affine<E>,
    pub s3: G1Affine<E>,
    pub x2: G2Affine<E>,
}

impl<E: PairingCurve> PlonkHeader<E> {
    pub fn power(&self) -> u32 {
        self.domain_size.trailing_zeros()
    }

    pub fn n(&self) -> usize {
        self.domain_size as usize
    }
}

pub fn write_header<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
    h: &PlonkHeader<E>,
) -> Result<(), ProtocolError> {
    w.start_section(SEC_HEADER)?;
    write_field_sizes(w, codec)?;
    for v in [h.n_vars, h.n_public, h.domain_size, h.n_additions, h.n_constraints] {
        w.write_u32(v)?;
    }
    write_fr(w, codec, &h.k1)?;
    write_fr(w, codec, &h.k2)?;
    for p in [&h.qm, &h.ql, &h.qr, &h.qo, &h.qc, &h.s1, &h.s2, &h.s3] {
        write_g1(w, codec, p)?;
    }
    write_g2(w, codec, &h.x2)?;
    w.end_section()?;
    Ok(())
}

/// Check the protocol section and read the header.
pub fn read_key_header<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
) -> Result<PlonkHeader<E>, ProtocolError> {
    zkey::read_protocol(r)?.expect(Protocol::Plonk)?;
    r.start_read_section(SEC_HEADER)?;
    read_field_sizes(r, codec)?;
    let n_vars = r.read_u32()?;
    let n_public = r.read_u32()?;
    let domain_size = r.read_u32()?;
    let n_additions = r.read_u32()?;
    let n_constraints = r.read_u32()?;
    let h = PlonkHeader {
        n_vars,
        n_public,
        domain_size,
        n_additions,
        n_constraints,
        k1: read_fr(r, codec)?,
        k2: read_fr(r, codec)?,
        qm: read_g1(r, codec)?,
        ql: read_g1(r, codec)?,
        qr: read_g1(r, codec)?,
        qo: read_g1(r, codec)?,
        qc: read_g1(r, codec)?,
        s1: read_g1(r, codec)?,
        s2: read_g1(r, codec)?,
        s3: read_g1(r, codec)?,
        x2: read_g2(r, codec)?,
    };
    r.end_read_section(false)?;
    check_sizes(domain_size, n_constraints, n_public, n_vars)?;
    Ok(h)
}

/// Consistency of the size fields shared by PLONK and FFLONK headers.
pub(crate) fn check_sizes(domain_size: u32, n_constraints: u32, n_public: u32, n_vars: u32) -> Result<(), ProtocolError> {
    if !domain_size.is_power_of_two() || n_constraints > domain_size || n_public >= n_vars.max(1) {
        return Err(ProtocolError::BadZkey(format!(
            "inconsistent sizes: domainSize {domain_size}, nConstraints {n_constraints}, nPublic {n_public}, nVars {n_vars}"
        )));
    }
    Ok(())
}

// ============================================================================
// Circuit sections (3–13)
// ============================================================================

pub fn read_additions<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
    count: usize,
) -> Result<Vec<Addition<Fr<E>>>, ProtocolError> {
    r.start_read_section(SEC_ADDITIONS)?;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let s1 = r.read_u32()?;
        let s2 = r.read_u32()?;
        let k1 = read_fr(r, codec)?;
        let k2 = read_fr(r, codec)?;
        out.push(Addition { s1, s2, k1, k2 });
    }
    r.end_read_section(false)?;
    Ok(out)
}

pub fn write_additions<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
    additions: &[Addition<Fr<E>>],
) -> Result<(), ProtocolError> {
    w.start_section(SEC_ADDITIONS)?;
    for a in additions {
        w.write_u32(a.s1)?;
        w.write_u32(a.s2)?;
        write_fr(w, codec, &a.k1)?;
        write_fr(w, codec, &a.k2)?;
    }
    w.end_section()?;
    Ok(())
}

pub fn read_wire_map<R: Read + Seek>(r: &mut BinReader<R>, id: u32, count: usize) -> Result<Vec<u32>, ProtocolError> {
    r.start_read_section(id)?;
    let map = (0..count).map(|_| r.read_u32()).collect::<Result<Vec<_>, _>>()?;
    r.end_read_section(false)?;
    Ok(map)
}

/// A polynomial stored as `n` coefficients and `4n` extended evaluations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredPoly<F> {
    pub coeffs: Vec<F>,
    pub evals: Vec<F>,
}

impl<F: ark_ff::PrimeField> StoredPoly<F> {
    /// Evaluations over the `4n` domain `d4` of coefficients of length `n`.
    pub fn new(d4: &Domain<F>, coeffs: Vec<F>) -> Result<Self, ProtocolError> {
        let evals = d4.evaluate(&coeffs)?;
        Ok(Self { coeffs, evals })
    }
}

pub fn write_poly<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
    p: &StoredPoly<Fr<E>>,
) -> Result<(), ProtocolError> {
    let mut buf = Vec::with_capacity((p.coeffs.len() + p.evals.len()) * codec.fr_size());
    for x in p.coeffs.iter().chain(&p.evals) {
        codec.write_fr_lem(x, &mut buf);
    }
    Ok(w.write_bytes(&buf)?)
}

/// The `index`-th polynomial of a section of `n + 4n` blocks.
pub fn read_poly<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
    id: u32,
    index: usize,
    n: usize,
) -> Result<StoredPoly<Fr<E>>, ProtocolError> {
    let sz = codec.fr_size() as u64;
    let block = 5 * n as u64 * sz;
    let bytes = r.read_section_range(id, index as u64 * block, block)?;
    let mut all = codec.read_fr_lem_many(&bytes)?;
    let evals = all.split_off(n);
    Ok(StoredPoly { coeffs: all, evals })
}

/// First `count` monomial points of the key's ceremony section.
pub fn read_ptau_points<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
    count: usize,
) -> Result<Vec<G1Affine<E>>, ProtocolError> {
    let sz = codec.g1_size() as u64;
    if r.section_size(SEC_PTAU)? < count as u64 * sz {
        return Err(ProtocolError::BadZkey(format!("ceremony section holds fewer than {count} points")));
    }
    Ok(codec.read_g1_lem_many(&r.read_section_range(SEC_PTAU, 0, count as u64 * sz)?)?)
}

// ============================================================================
// Fiat–Shamir
// ============================================================================

/// Challenges in derivation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Challenges<F> {
    pub beta: F,
    pub gamma: F,
    pub alpha: F,
    pub xi: F,
    pub v: F,
    pub u: F,
}

/// `β` from the key commitments, public inputs and wire commitments; `γ`
/// from `β`.
pub(crate) fn challenge_beta_gamma<E: PairingCurve>(
    key: [&G1Affine<E>; 8],
    public: &[Fr<E>],
    wires: [&G1Affine<E>; 3],
) -> Result<(Fr<E>, Fr<E>), ProtocolError> {
    let mut t = Keccak256Transcript::<E>::new();
    for p in key {
        t.add_point(p);
    }
    for s in public {
        t.add_scalar(s);
    }
    for p in wires {
        t.add_point(p);
    }
    let beta = t.get_challenge()?;
    t.reset();
    t.add_scalar(&beta);
    Ok((beta, t.get_challenge()?))
}

pub(crate) fn challenge_alpha<E: PairingCurve>(
    beta: &Fr<E>,
    gamma: &Fr<E>,
    z: &G1Affine<E>,
) -> Result<Fr<E>, ProtocolError> {
    let mut t = Keccak256Transcript::<E>::new();
    t.add_scalar(beta);
    t.add_scalar(gamma);
    t.add_point(z);
    Ok(t.get_challenge()?)
}

pub(crate) fn challenge_xi<E: PairingCurve>(alpha: &Fr<E>, t_parts: [&G1Affine<E>; 3]) -> Result<Fr<E>, ProtocolError> {
    let mut t = Keccak256Transcript::<E>::new();
    t.add_scalar(alpha);
    for p in t_parts {
        t.add_point(p);
    }
    Ok(t.get_challenge()?)
}

/// `v` from `ξ` and `a, b, c, s1, s2, zw`.
pub(crate) fn challenge_v<E: PairingCurve>(xi: &Fr<E>, evals: [&Fr<E>; 6]) -> Result<Fr<E>, ProtocolError> {
    let mut t = Keccak256Transcript::<E>::new();
    t.add_scalar(xi);
    for e in evals {
        t.add_scalar(e);
    }
    Ok(t.get_challenge()?)
}

pub(crate) fn challenge_u<E: PairingCurve>(wxi: &G1Affine<E>, wxiw: &G1Affine<E>) -> Result<Fr<E>, ProtocolError> {
    let mut t = Keccak256Transcript::<E>::new();
    t.add_point(wxi);
    t.add_point(wxiw);
    Ok(t.get_challenge()?)
}

// ============================================================================
// Proof
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof<E: PairingCurve> {
    pub a: G1Affine<E>,
    pub b: G1Affine<E>,
    pub c: G1Affine<E>,
    pub z: G1Affine<E>,
    pub t1: G1Affine<E>,
    pub t2: G1Affine<E>,
    pub t3: G1Affine<E>,
    pub wxi: G1Affine<E>,
    pub wxiw: G1Affine<E>,
    pub eval_a: Fr<E>,
    pub eval_b: Fr<E>,
    pub eval_c: Fr<E>,
    pub eval_s1: Fr<E>,
    pub eval_s2: Fr<E>,
    pub eval_zw: Fr<E>,
}

impl<E: PairingCurve> Proof<E> {
    pub fn to_json(&self) -> Value {
        let codec = CurveCodec::<E>::new();
        let g = |p: &G1Affine<E>| codec.g1_to_json(p);
        let f = |x: &Fr<E>| codec.fr_to_json(x);
        json!({
            "A": g(&self.a),
            "B": g(&self.b),
            "C": g(&self.c),
            "Z": g(&self.z),
            "T1": g(&self.t1),
            "T2": g(&self.t2),
            "T3": g(&self.t3),
            "Wxi": g(&self.wxi),
            "Wxiw": g(&self.wxiw),
            "eval_a": f(&self.eval_a),
            "eval_b": f(&self.eval_b),
            "eval_c": f(&self.eval_c),
            "eval_s1": f(&self.eval_s1),
            "eval_s2": f(&self.eval_s2),
            "eval_zw": f(&self.eval_zw),
            "protocol": Protocol::Plonk.name(),
            "curve": E::NAME,
        })
    }

    pub fn from_json(v: &Value) -> Result<Self, ProtocolError> {
        check_json_header::<E>(v, Protocol::Plonk)?;
        let codec = CurveCodec::<E>::new();
        let g = |name| -> Result<G1Affine<E>, ProtocolError> { Ok(codec.g1_from_json(field(v, name)?)?) };
        let f = |name| -> Result<Fr<E>, ProtocolError> { Ok(codec.fr_from_json(field(v, name)?)?) };
        Ok(Self {
            a: g("A")?,
            b: g("B")?,
            c: g("C")?,
            z: g("Z")?,
            t1: g("T1")?,
            t2: g("T2")?,
            t3: g("T3")?,
            wxi: g("Wxi")?,
            wxiw: g("Wxiw")?,
            eval_a: f("eval_a")?,
            eval_b: f("eval_b")?,
            eval_c: f("eval_c")?,
            eval_s1: f("eval_s1")?,
            eval_s2: f("eval_s2")?,
            eval_zw: f("eval_zw")?,
        })
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
    pub qm: G1Affine<E>,
    pub ql: G1Affine<E>,
    pub qr: G1Affine<E>,
    pub qo: G1Affine<E>,
    pub qc: G1Affine<E>,
    pub s1: G1Affine<E>,
    pub s2: G1Affine<E>,
    pub s3: G1Affine<E>,
    pub x2: G2Affine<E>,
    /// Generator of the domain.
    pub w: Fr<E>,
}

impl<E: PairingCurve> VerificationKey<E> {
    pub fn to_json(&self) -> Value {
        let codec = CurveCodec::<E>::new();
        let g = |p: &G1Affine<E>| codec.g1_to_json(p);
        json!({
            "protocol": Protocol::Plonk.name(),
            "curve": E::NAME,
            "nPublic": self.n_public,
            "power": self.power,
            "k1": codec.fr_to_json(&self.k1),
            "k2": codec.fr_to_json(&self.k2),
            "Qm": g(&self.qm),
            "Ql": g(&self.ql),
            "Qr": g(&self.qr),
            "Qo": g(&self.qo),
            "Qc": g(&self.qc),
            "S1": g(&self.s1),
            "S2": g(&self.s2),
            "S3": g(&self.s3),
            "X_2": codec.g2_to_json(&self.x2),
            "w": codec.fr_to_json(&self.w),
        })
    }

    pub fn from_json(v: &Value) -> Result<Self, ProtocolError> {
        check_json_header::<E>(v, Protocol::Plonk)?;
        let codec = CurveCodec::<E>::new();
        let g = |name| -> Result<G1Affine<E>, ProtocolError> { Ok(codec.g1_from_json(field(v, name)?)?) };
        let f = |name| -> Result<Fr<E>, ProtocolError> { Ok(codec.fr_from_json(field(v, name)?)?) };
        Ok(Self {
            n_public: json_usize(v, "nPublic")?,
            power: json_usize(v, "power")? as u32,
            k1: f("k1")?,
            k2: f("k2")?,
            qm: g("Qm")?,
            ql: g("Ql")?,
            qr: g("Qr")?,
            qo: g("Qo")?,
            qc: g("Qc")?,
            s1: g("S1")?,
            s2: g("S2")?,
            s3: g("S3")?,
            x2: codec.g2_from_json(field(v, "X_2")?)?,
            w: f("w")?,
        })
    }
}

/// Non-negative integer field of a JSON object.
pub(crate) fn json_usize(v: &Value, name: &'static str) -> Result<usize, ProtocolError> {
    let n = field(v, name)?
        .as_u64()
        .ok_or_else(|| CodecError::BadJson(format!("{name} must be an integer")))?;
    Ok(n as usize)
}

/// Verification key of a PLONK zkey (section 2).
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
        qm: h.qm,
        ql: h.ql,
        qr: h.qr,
        qo: h.qo,
        qc: h.qc,
        s1: h.s1,
        s2: h.s2,
        s3: h.s3,
        x2: h.x2,
        w: domain.omega,
    })
}
