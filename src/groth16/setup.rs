//! Groth16 key construction from an R1CS and a prepared ceremony file.
//!
//! Every per-signal point is a sparse combination of Lagrange points of the
//! circuit's domain: `A_j = Σ_c A[c][j]·[L_c(τ)]₁`, and similarly for `B`
//! in both groups. The `C` column folds in `α` and `β`:
//! `C_j = Σ_c (β·A[c][j] + α·B[c][j] + C[c][j])·[L_c(τ)]₁`, read from the
//! `βτ` and `ατ` Lagrange sections. Public signals land in `IC`, private
//! ones in section 8. One extra `A` row per public signal binds the public
//! inputs even when a constraint never touches them.

#![forbid(unsafe_code)]

use std::io::{Read, Seek, Write};

use ark_ec::short_weierstrass::{Affine, Projective, SWCurveConfig};
use ark_ec::{AffineRepr, CurveGroup, Group};
use ark_ff::{FftField, One, Zero};
use tracing::{debug, info};

use super::{write_header, Groth16Header, HBasis, SEC_A, SEC_B1, SEC_B2, SEC_C, SEC_COEFS, SEC_H, SEC_IC, SEC_MPC};
use crate::binfile::{BinReader, BinWriter};
use crate::codec::CurveCodec;
use crate::config;
use crate::curve::{Fr, G1Affine, G1Projective, G2Projective, PairingCurve};
use crate::domain::log2_ceil;
use crate::paged::PagedVec;
use crate::pcs::msm;
use crate::ptau::{
    self, chunks, lagrange_offset, read_g1_points, read_g2_points, SEC_ALPHA_TAU_G1, SEC_BETA_G2, SEC_BETA_TAU_G1,
    SEC_LAGRANGE_ALPHA_TAU_G1, SEC_LAGRANGE_BETA_TAU_G1, SEC_LAGRANGE_TAU_G1, SEC_LAGRANGE_TAU_G2, SEC_TAU_G1,
};
use crate::r1cs::R1cs;
use crate::transcript::ChallengeHasher;
use crate::zkey::{self, Protocol, ProtocolError, ZKEY_MAGIC, ZKEY_VERSION};

/// One non-zero matrix entry.
#[derive(Clone, Copy, Debug)]
pub struct Term<F> {
    pub constraint: u32,
    pub signal: u32,
    pub value: F,
}

/// Sparse `A`, `B` and `C` columns, each sorted by constraint.
pub struct Matrices<F> {
    pub a: PagedVec<Term<F>>,
    pub b: PagedVec<Term<F>>,
    pub c: PagedVec<Term<F>>,
}

/// Flatten the constraints and append the public identity rows to `A`.
pub fn matrices<E: PairingCurve>(r1cs: &R1cs<E>) -> Matrices<Fr<E>> {
    let mut m = Matrices { a: PagedVec::new(), b: PagedVec::new(), c: PagedVec::new() };
    for (i, c) in r1cs.constraints.iter().enumerate() {
        let push = |dst: &mut PagedVec<Term<Fr<E>>>, lc: &[(u32, Fr<E>)]| {
            for (s, v) in lc {
                if !v.is_zero() {
                    dst.push(Term { constraint: i as u32, signal: *s, value: *v });
                }
            }
        };
        push(&mut m.a, &c.a);
        push(&mut m.b, &c.b);
        push(&mut m.c, &c.c);
    }
    let n_constraints = r1cs.constraints.len() as u32;
    for s in 0..=r1cs.n_public() as u32 {
        m.a.push(Term { constraint: n_constraints + s, signal: s, value: Fr::<E>::one() });
    }
    m
}

/// Domain power of a circuit: room for every constraint plus the identity rows.
pub fn circuit_power<E: PairingCurve>(r1cs: &R1cs<E>) -> Result<u32, ProtocolError> {
    let rows = r1cs.constraints.len() + r1cs.n_public() + 1;
    let power = log2_ceil(rows).max(1);
    let max = <Fr<E> as FftField>::TWO_ADICITY;
    if power > max {
        return Err(ProtocolError::CircuitTooBig { power, max });
    }
    Ok(power)
}

/// Build the key. Returns the output stream and `csHash`.
pub fn new_zkey<E: PairingCurve, R: Read + Seek, W: Write + Seek>(
    r1cs: &R1cs<E>,
    ptau: &mut BinReader<R>,
    out: W,
) -> Result<(W, [u8; 64]), ProtocolError> {
    let info = ptau::read_info::<E, R>(ptau)?;
    ptau::ensure_prepared(ptau)?;
    if info.contributions.is_empty() {
        tracing::warn!("ceremony file has no contributions; the key is not secure");
    }
    let power = circuit_power(r1cs)?;
    let basis = HBasis::for_power::<E>(power);
    let need = match basis {
        HBasis::OddCoset => power + 1,
        HBasis::Monomial => power,
    };
    if info.header.power < need {
        return Err(ProtocolError::PowerTooSmall { have: info.header.power, need });
    }
    let n = 1usize << power;
    let n_vars = r1cs.n_vars();
    let n_public = r1cs.n_public();
    info!(
        constraints = r1cs.constraints.len(),
        n_vars,
        n_public,
        domain = n,
        "building groth16 key"
    );

    let codec = CurveCodec::<E>::new();
    let g1 = G1Projective::<E>::generator().into_affine();
    let g2 = G2Projective::<E>::generator().into_affine();
    let header = Groth16Header::<E> {
        n_vars: n_vars as u32,
        n_public: n_public as u32,
        domain_size: n as u32,
        alpha1: read_g1_points(ptau, &codec, SEC_ALPHA_TAU_G1, 0, 1)?[0],
        beta1: read_g1_points(ptau, &codec, SEC_BETA_TAU_G1, 0, 1)?[0],
        beta2: read_g2_points(ptau, &codec, SEC_BETA_G2, 0, 1)?[0],
        gamma2: g2,
        delta1: g1,
        delta2: g2,
    };

    let m = matrices(r1cs);
    let level = lagrange_offset(power);
    let a1 = compose(&m.a, n_vars, n, |s, l| Ok(read_g1_points(ptau, &codec, SEC_LAGRANGE_TAU_G1, level + s, l)?))?;
    let b1 = compose(&m.b, n_vars, n, |s, l| Ok(read_g1_points(ptau, &codec, SEC_LAGRANGE_TAU_G1, level + s, l)?))?;
    let b2 = compose(&m.b, n_vars, n, |s, l| Ok(read_g2_points(ptau, &codec, SEC_LAGRANGE_TAU_G2, level + s, l)?))?;
    let mut c = compose(&m.c, n_vars, n, |s, l| Ok(read_g1_points(ptau, &codec, SEC_LAGRANGE_TAU_G1, level + s, l)?))?;
    let beta_a =
        compose(&m.a, n_vars, n, |s, l| Ok(read_g1_points(ptau, &codec, SEC_LAGRANGE_BETA_TAU_G1, level + s, l)?))?;
    let alpha_b =
        compose(&m.b, n_vars, n, |s, l| Ok(read_g1_points(ptau, &codec, SEC_LAGRANGE_ALPHA_TAU_G1, level + s, l)?))?;
    for ((ci, ba), ab) in c.iter_mut().zip(beta_a).zip(alpha_b) {
        *ci += ba + ab;
    }
    let c = G1Projective::<E>::normalize_batch(&c);
    debug!("signal points composed");

    let mut w = BinWriter::new(out, ZKEY_MAGIC, ZKEY_VERSION)?;
    let mut hasher = ChallengeHasher::new();
    zkey::write_protocol(&mut w, Protocol::Groth16)?;
    write_header(&mut w, &codec, &header)?;
    hasher.update(&header.hashed_points(&codec));

    write_g1_section(&mut w, &codec, &mut hasher, SEC_IC, &c[..=n_public])?;
    write_coefficients(&mut w, &codec, &m)?;
    write_g1_section(&mut w, &codec, &mut hasher, SEC_A, &G1Projective::<E>::normalize_batch(&a1))?;
    write_g1_section(&mut w, &codec, &mut hasher, SEC_B1, &G1Projective::<E>::normalize_batch(&b1))?;
    {
        let b2 = G2Projective::<E>::normalize_batch(&b2);
        let mut bytes = Vec::with_capacity(b2.len() * codec.g2_size());
        let mut hashed = Vec::with_capacity(b2.len() * codec.g2_size());
        for p in &b2 {
            codec.write_g2_lem(p, &mut bytes);
            codec.write_g2_uncompressed(p, &mut hashed);
        }
        w.write_section(SEC_B2, &bytes)?;
        hasher.update(&hashed);
    }
    write_g1_section(&mut w, &codec, &mut hasher, SEC_C, &c[n_public + 1..])?;

    let h = h_points(ptau, &codec, power, basis)?;
    write_g1_section(&mut w, &codec, &mut hasher, SEC_H, &h)?;

    let cs_hash = hasher.finalize();
    w.start_section(SEC_MPC)?;
    w.write_bytes(&cs_hash)?;
    w.write_u32(0)?;
    w.end_section()?;
    info!(cs_hash = %hex::encode(&cs_hash[..16]), "groth16 key written");
    Ok((w.finish()?, cs_hash))
}

/// `Σ_c value·point[c]` per signal, streaming the Lagrange level in chunks.
fn compose<P: SWCurveConfig>(
    terms: &PagedVec<Term<P::ScalarField>>,
    n_vars: usize,
    n: usize,
    mut read: impl FnMut(usize, usize) -> Result<Vec<Affine<P>>, ProtocolError>,
) -> Result<Vec<Projective<P>>, ProtocolError> {
    let mut acc = vec![Projective::<P>::zero(); n_vars];
    let mut next = 0usize;
    for (start, len) in chunks(n) {
        let points = read(start, len)?;
        let mut group: Vec<(u32, usize, P::ScalarField)> = Vec::new();
        while next < terms.len() && (terms[next].constraint as usize) < start + len {
            let t = &terms[next];
            group.push((t.signal, t.constraint as usize - start, t.value));
            next += 1;
        }
        config::memlog("groth16 compose chunk", group.len());
        group.sort_by_key(|g| g.0);
        let mut i = 0;
        while i < group.len() {
            let signal = group[i].0;
            let mut bases = Vec::new();
            let mut scalars = Vec::new();
            while i < group.len() && group[i].0 == signal {
                bases.push(points[group[i].1]);
                scalars.push(group[i].2);
                i += 1;
            }
            let slot = acc
                .get_mut(signal as usize)
                .ok_or_else(|| ProtocolError::BadZkey(format!("signal {signal} out of range")))?;
            *slot += msm(&bases, &scalars);
        }
    }
    if next != terms.len() {
        return Err(ProtocolError::BadZkey("constraint index beyond the domain".into()));
    }
    Ok(acc)
}

/// Points of the `H` section.
fn h_points<E: PairingCurve, R: Read + Seek>(
    ptau: &mut BinReader<R>,
    codec: &CurveCodec<E>,
    power: u32,
    basis: HBasis,
) -> Result<Vec<G1Affine<E>>, ProtocolError> {
    let n = 1usize << power;
    let mut out = Vec::with_capacity(n);
    match basis {
        HBasis::OddCoset => {
            let level = lagrange_offset(power + 1);
            for (start, len) in chunks(n) {
                let pts = read_g1_points(ptau, codec, SEC_LAGRANGE_TAU_G1, level + 2 * start, 2 * len)?;
                out.extend(pts.into_iter().skip(1).step_by(2));
            }
        }
        HBasis::Monomial => {
            // The ceremony stops at τ^(2n-2). deg h <= n-2, so the last term carries no weight.
            for (start, len) in chunks(n - 1) {
                let lo = read_g1_points(ptau, codec, SEC_TAU_G1, start, len)?;
                let hi = read_g1_points(ptau, codec, SEC_TAU_G1, n + start, len)?;
                let diff: Vec<G1Projective<E>> = hi.iter().zip(&lo).map(|(h, l)| h.into_group() - *l).collect();
                out.extend(G1Projective::<E>::normalize_batch(&diff));
            }
            out.push(G1Affine::<E>::zero());
        }
    }
    Ok(out)
}

fn write_g1_section<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
    hasher: &mut ChallengeHasher,
    id: u32,
    points: &[G1Affine<E>],
) -> Result<(), ProtocolError> {
    let mut bytes = Vec::with_capacity(points.len() * codec.g1_size());
    let mut hashed = Vec::with_capacity(points.len() * codec.g1_size());
    for p in points {
        codec.write_g1_lem(p, &mut bytes);
        codec.write_g1_uncompressed(p, &mut hashed);
    }
    w.write_section(id, &bytes)?;
    hasher.update(&hashed);
    Ok(())
}

fn write_coefficients<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
    m: &Matrices<Fr<E>>,
) -> Result<(), ProtocolError> {
    w.start_section(SEC_COEFS)?;
    w.write_u32((m.a.len() + m.b.len()) as u32)?;
    let mut buf = Vec::new();
    for (matrix, terms) in [(0u32, &m.a), (1, &m.b)] {
        for t in terms.iter() {
            buf.clear();
            buf.extend_from_slice(&matrix.to_le_bytes());
            buf.extend_from_slice(&t.constraint.to_le_bytes());
            buf.extend_from_slice(&t.signal.to_le_bytes());
            codec.write_fr_lem(&t.value, &mut buf);
            w.write_bytes(&buf)?;
        }
    }
    w.end_section()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::read_key_header;
    use super::*;
    use crate::curve::{Bls12_381, Bn254};
    use crate::zkey::testutil::*;
    use std::io::Cursor;

    #[test]
    fn square_circuit_layout() {
        let r1cs = square::<Bn254>();
        let mut ptau = ptau::<Bn254>(4);
        let (bytes, _) = new_zkey(&r1cs, &mut ptau, Cursor::new(Vec::new())).unwrap();
        let mut r = zkey_reader(bytes.into_inner());
        let codec = CurveCodec::<Bn254>::new();
        let h = read_key_header::<Bn254, _>(&mut r, &codec).unwrap();
        assert_eq!((h.n_vars, h.n_public, h.domain_size), (3, 1, 4));

        // a: one entry plus two identity rows, b: one entry.
        r.start_read_section(SEC_COEFS).unwrap();
        assert_eq!(r.read_u32().unwrap(), 4);
        r.end_read_section(true).unwrap();
        assert_eq!(r.section_size(SEC_IC).unwrap(), 2 * codec.g1_size() as u64);
        assert_eq!(r.section_size(SEC_C).unwrap(), codec.g1_size() as u64);
        assert_eq!(r.section_size(SEC_H).unwrap(), 4 * codec.g1_size() as u64);
        assert_eq!(r.section_size(SEC_MPC).unwrap(), 68);
    }

    #[test]
    fn cs_hash_is_deterministic() {
        let r1cs = mixed::<Bls12_381>();
        let mut ptau = ptau::<Bls12_381>(4);
        let (a, ha) = new_zkey(&r1cs, &mut ptau, Cursor::new(Vec::new())).unwrap();
        let (b, hb) = new_zkey(&r1cs, &mut ptau, Cursor::new(Vec::new())).unwrap();
        assert_eq!(ha, hb);
        assert_eq!(a.into_inner(), b.into_inner());

        let (_, other) = new_zkey(&square::<Bls12_381>(), &mut ptau, Cursor::new(Vec::new())).unwrap();
        assert_ne!(ha, other);
    }

    #[test]
    fn rejects_small_ceremony() {
        // mixed needs 4 + 2 + 1 rows: domain 8, so the ceremony needs power 4.
        let r1cs = mixed::<Bn254>();
        let mut ptau = ptau::<Bn254>(3);
        assert!(matches!(
            new_zkey(&r1cs, &mut ptau, Cursor::new(Vec::new())),
            Err(ProtocolError::PowerTooSmall { have: 3, need: 4 })
        ));
    }

    #[test]
    fn monomial_h_fits_an_exact_ceremony() {
        // Domain 8 against a power-3 ceremony: τ^0..τ^14 only.
        let codec = CurveCodec::<Bn254>::new();
        let mut ptau = ptau::<Bn254>(3);
        let (bytes, _) =
            super::super::with_monomial_h(|| new_zkey(&mixed::<Bn254>(), &mut ptau, Cursor::new(Vec::new()))).unwrap();
        let mut r = zkey_reader(bytes.into_inner());
        assert_eq!(r.section_size(SEC_H).unwrap(), 8 * codec.g1_size() as u64);

        let h = crate::zkey::read_g1_section::<Bn254, _>(&mut r, &codec, SEC_H).unwrap();
        let tau = read_g1_points(&mut ptau, &codec, SEC_TAU_G1, 0, 15).unwrap();
        for i in 0..7 {
            assert_eq!(h[i], (tau[8 + i].into_group() - tau[i]).into_affine());
        }
        assert!(h[7].xy().is_none());
    }

    #[test]
    fn unprepared_ceremony_is_rejected() {
        let mut ptau = crate::ptau::testutil::reader(crate::ptau::testutil::fresh::<Bn254>(3));
        assert!(matches!(
            new_zkey(&square::<Bn254>(), &mut ptau, Cursor::new(Vec::new())),
            Err(ProtocolError::Ptau(crate::ptau::PtauError::NotPrepared))
        ));
    }
}
