//! Powers-of-Tau ceremony files (`.ptau`)
//!
//! # Layout
//!
//! ```text
//! 1  header         u32 n8q | q[n8q] | u32 power | u32 ceremonyPower
//! 2  tauG1          [τ^i]₁        i < 2^(power+1) − 1
//! 3  tauG2          [τ^i]₂        i < 2^power
//! 4  alphaTauG1     [α·τ^i]₁      i < 2^power
//! 5  betaTauG1      [β·τ^i]₁      i < 2^power
//! 6  betaG2         [β]₂
//! 7  contributions  u32 count | record*
//! 12–15             Lagrange forms of sections 2–5, one level per domain
//!                   size 2^p (p = 0..=power); level p starts at point
//!                   index 2^p − 1
//! ```
//!
//! Points are LEM-encoded (see [`crate::codec`]).
//!
//! # Lifecycle
//!
//! [`new`](new::new_accumulator) → [`contribute`](contribute::contribute) /
//! [`beacon`](contribute::beacon) (any number of times) →
//! [`verify`](verify::verify) → [`prepare_phase2`](phase2::prepare_phase2).
//! A contribution drops any Lagrange sections because they no longer match.
//! [`truncate`](truncate::truncate) cuts a file down to a smaller power.

#![forbid(unsafe_code)]

pub mod challenge;
pub mod contribute;
pub mod new;
pub mod phase2;
pub mod truncate;
pub mod verify;

use std::io::{Read, Seek, Write};

use ark_ec::{CurveGroup, Group};
use ark_ff::FftField;
use num_bigint::BigUint;

use crate::binfile::{BinError, BinReader, BinWriter};
use crate::codec::{CodecError, CurveCodec};
use crate::config;
use crate::curve::{CurveError, CurveId, Fr, G1Affine, G1Projective, G2Affine, G2Projective, PairingCurve};
use crate::domain::DomainError;
use crate::keypair::{ContributionParams, ContributionType, KeyError, PtauPublicKey};
use crate::transcript::{blank_hash, ChallengeHasher};

pub const PTAU_MAGIC: &[u8; 4] = b"ptau";
pub const PTAU_VERSION: u32 = 1;

pub const SEC_HEADER: u32 = 1;
pub const SEC_TAU_G1: u32 = 2;
pub const SEC_TAU_G2: u32 = 3;
pub const SEC_ALPHA_TAU_G1: u32 = 4;
pub const SEC_BETA_TAU_G1: u32 = 5;
pub const SEC_BETA_G2: u32 = 6;
pub const SEC_CONTRIBUTIONS: u32 = 7;
pub const SEC_LAGRANGE_TAU_G1: u32 = 12;
pub const SEC_LAGRANGE_TAU_G2: u32 = 13;
pub const SEC_LAGRANGE_ALPHA_TAU_G1: u32 = 14;
pub const SEC_LAGRANGE_BETA_TAU_G1: u32 = 15;

/// Errors raised by ceremony operations.
#[derive(Debug, thiserror::Error)]
pub enum PtauError {
    #[error(transparent)]
    Bin(#[from] BinError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Curve(#[from] CurveError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("power {power} out of range 1..={max}")]
    BadPower { power: u32, max: u32 },
    #[error("file is not prepared for phase 2 (missing Lagrange sections)")]
    NotPrepared,
    #[error("file has power {have}, {need} required")]
    PowerTooSmall { have: u32, need: u32 },
    #[error("response does not answer the current challenge")]
    WrongResponse,
    #[error("malformed contribution record: {0}")]
    BadContribution(String),
}

/// Which group a section holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointGroup {
    G1,
    G2,
}

/// Header of a ceremony file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PtauHeader {
    pub n8q: u32,
    pub q: BigUint,
    pub power: u32,
    pub ceremony_power: u32,
}

impl PtauHeader {
    pub fn curve(&self) -> Result<CurveId, CurveError> {
        CurveId::from_q(&self.q)
    }
}

/// Largest power a ceremony over `E` supports.
pub fn max_power<E: PairingCurve>() -> u32 {
    <Fr<E> as FftField>::TWO_ADICITY
}

/// Number of points in a monomial section at `power`.
pub fn section_points(id: u32, power: u32) -> usize {
    match id {
        SEC_TAU_G1 => (1usize << (power + 1)) - 1,
        SEC_TAU_G2 | SEC_ALPHA_TAU_G1 | SEC_BETA_TAU_G1 => 1usize << power,
        SEC_BETA_G2 => 1,
        _ => 0,
    }
}

/// Group of a monomial or Lagrange section.
pub fn section_group(id: u32) -> PointGroup {
    match id {
        SEC_TAU_G2 | SEC_BETA_G2 | SEC_LAGRANGE_TAU_G2 => PointGroup::G2,
        _ => PointGroup::G1,
    }
}

/// The five point sections a contribution rewrites.
pub const POINT_SECTIONS: [u32; 5] = [SEC_TAU_G1, SEC_TAU_G2, SEC_ALPHA_TAU_G1, SEC_BETA_TAU_G1, SEC_BETA_G2];

/// `(start, len)` windows of at most `ZKFORGE_CHUNK_POINTS` points.
pub fn chunks(total: usize) -> impl Iterator<Item = (usize, usize)> {
    let step = config::settings().chunk_points.max(1);
    (0..total).step_by(step).map(move |s| (s, step.min(total - s)))
}

pub fn read_header<R: Read + Seek>(r: &mut BinReader<R>) -> Result<PtauHeader, PtauError> {
    r.start_read_section(SEC_HEADER)?;
    let n8q = r.read_u32()?;
    let q = r.read_bigint(n8q as usize)?;
    let power = r.read_u32()?;
    let ceremony_power = r.read_u32()?;
    r.end_read_section(false)?;
    Ok(PtauHeader { n8q, q, power, ceremony_power })
}

/// Read the header and fail unless it belongs to curve `E`.
pub fn read_header_for<E: PairingCurve, R: Read + Seek>(r: &mut BinReader<R>) -> Result<PtauHeader, PtauError> {
    let h = read_header(r)?;
    E::check_q(&h.q)?;
    if h.power == 0 || h.power > max_power::<E>() {
        return Err(PtauError::BadPower { power: h.power, max: max_power::<E>() });
    }
    Ok(h)
}

pub fn write_header<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    power: u32,
    ceremony_power: u32,
) -> Result<(), PtauError> {
    let codec = CurveCodec::<E>::new();
    w.start_section(SEC_HEADER)?;
    w.write_u32(codec.fq.n8() as u32)?;
    w.write_bigint(codec.fq.modulus(), codec.fq.n8())?;
    w.write_u32(power)?;
    w.write_u32(ceremony_power)?;
    w.end_section()?;
    Ok(())
}

// ============================================================================
// Point ranges
// ============================================================================

/// `count` G1 points starting at point `first` of a section.
pub fn read_g1_points<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
    id: u32,
    first: usize,
    count: usize,
) -> Result<Vec<G1Affine<E>>, PtauError> {
    let sz = codec.g1_size() as u64;
    let bytes = r.read_section_range(id, first as u64 * sz, count as u64 * sz)?;
    Ok(codec.read_g1_lem_many(&bytes)?)
}

/// `count` G2 points starting at point `first` of a section.
pub fn read_g2_points<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
    id: u32,
    first: usize,
    count: usize,
) -> Result<Vec<G2Affine<E>>, PtauError> {
    let sz = codec.g2_size() as u64;
    let bytes = r.read_section_range(id, first as u64 * sz, count as u64 * sz)?;
    Ok(codec.read_g2_lem_many(&bytes)?)
}

/// Re-encode LEM points as uncompressed bytes (the hashed form).
pub fn lem_to_uncompressed<E: PairingCurve>(
    codec: &CurveCodec<E>,
    group: PointGroup,
    lem: &[u8],
) -> Result<Vec<u8>, PtauError> {
    let mut out = Vec::with_capacity(lem.len());
    match group {
        PointGroup::G1 => {
            for p in codec.read_g1_lem_many(lem)? {
                codec.write_g1_uncompressed(&p, &mut out);
            }
        }
        PointGroup::G2 => {
            for p in codec.read_g2_lem_many(lem)? {
                codec.write_g2_uncompressed(&p, &mut out);
            }
        }
    }
    Ok(out)
}

/// Feed the uncompressed form of sections 2–6 (first `power` worth of
/// points) of a file into `hasher`.
pub fn hash_point_sections<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
    power: u32,
    hasher: &mut ChallengeHasher,
) -> Result<(), PtauError> {
    for id in POINT_SECTIONS {
        let group = section_group(id);
        let sz = match group {
            PointGroup::G1 => codec.g1_size(),
            PointGroup::G2 => codec.g2_size(),
        } as u64;
        for (start, len) in chunks(section_points(id, power)) {
            let lem = r.read_section_range(id, start as u64 * sz, len as u64 * sz)?;
            hasher.update(&lem_to_uncompressed(codec, group, &lem)?);
        }
    }
    Ok(())
}

/// Challenge of a fresh accumulator: `Blake2b(blankHash ‖ generators)`.
pub fn first_challenge<E: PairingCurve>(power: u32) -> [u8; 64] {
    let codec = CurveCodec::<E>::new();
    let g1 = codec.g1_uncompressed(&G1Projective::<E>::generator().into_affine());
    let g2 = codec.g2_uncompressed(&G2Projective::<E>::generator().into_affine());
    let mut h = ChallengeHasher::new();
    h.update(&blank_hash());
    for id in POINT_SECTIONS {
        let p = match section_group(id) {
            PointGroup::G1 => &g1,
            PointGroup::G2 => &g2,
        };
        for _ in 0..section_points(id, power) {
            h.update(p);
        }
    }
    h.finalize()
}

// ============================================================================
// Contributions
// ============================================================================

/// One contribution record of section 7.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contribution<E: PairingCurve> {
    /// `[τ]₁` after this contribution.
    pub tau_g1: G1Affine<E>,
    /// `[τ]₂` after this contribution.
    pub tau_g2: G2Affine<E>,
    /// `[α]₁` after this contribution.
    pub alpha_g1: G1Affine<E>,
    /// `[β]₁` after this contribution.
    pub beta_g1: G1Affine<E>,
    /// `[β]₂` after this contribution.
    pub beta_g2: G2Affine<E>,
    pub key: PtauPublicKey<E>,
    pub partial_hash: [u8; 64],
    pub next_challenge: [u8; 64],
    pub kind: ContributionType,
    pub params: ContributionParams,
}

impl<E: PairingCurve> Contribution<E> {
    /// `Blake2b(partialHash ‖ pubkey)`.
    pub fn response_hash(&self) -> [u8; 64] {
        response_hash(&self.partial_hash, &self.key)
    }
}

/// `Blake2b(partialHash ‖ uncompressed pubkey)`.
pub fn response_hash<E: PairingCurve>(partial: &[u8; 64], key: &PtauPublicKey<E>) -> [u8; 64] {
    let codec = CurveCodec::<E>::new();
    let mut buf = Vec::with_capacity(PtauPublicKey::<E>::size(&codec));
    key.write_uncompressed(&codec, &mut buf);
    let mut h = ChallengeHasher::resume(partial);
    h.update(&buf);
    h.finalize()
}

pub fn read_contributions<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
) -> Result<Vec<Contribution<E>>, PtauError> {
    let codec = CurveCodec::<E>::new();
    let (g1, g2) = (codec.g1_size(), codec.g2_size());
    r.start_read_section(SEC_CONTRIBUTIONS)?;
    let n = r.read_u32()?;
    let mut out = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let tau_g1 = codec.read_g1_lem(&r.read_bytes(g1)?)?;
        let tau_g2 = codec.read_g2_lem(&r.read_bytes(g2)?)?;
        let alpha_g1 = codec.read_g1_lem(&r.read_bytes(g1)?)?;
        let beta_g1 = codec.read_g1_lem(&r.read_bytes(g1)?)?;
        let beta_g2 = codec.read_g2_lem(&r.read_bytes(g2)?)?;
        let key = PtauPublicKey::read_lem(&codec, &r.read_bytes(PtauPublicKey::<E>::size(&codec))?)?;
        let mut partial_hash = [0u8; 64];
        partial_hash.copy_from_slice(&r.read_bytes(64)?);
        let mut next_challenge = [0u8; 64];
        next_challenge.copy_from_slice(&r.read_bytes(64)?);
        let kind = ContributionType::from_u32(r.read_u32()?)?;
        let params = ContributionParams::read(r)?;
        out.push(Contribution {
            tau_g1,
            tau_g2,
            alpha_g1,
            beta_g1,
            beta_g2,
            key,
            partial_hash,
            next_challenge,
            kind,
            params,
        });
    }
    r.end_read_section(false)?;
    Ok(out)
}

pub fn write_contributions<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    contributions: &[Contribution<E>],
) -> Result<(), PtauError> {
    let codec = CurveCodec::<E>::new();
    w.start_section(SEC_CONTRIBUTIONS)?;
    w.write_u32(contributions.len() as u32)?;
    for c in contributions {
        let mut buf = Vec::new();
        codec.write_g1_lem(&c.tau_g1, &mut buf);
        codec.write_g2_lem(&c.tau_g2, &mut buf);
        codec.write_g1_lem(&c.alpha_g1, &mut buf);
        codec.write_g1_lem(&c.beta_g1, &mut buf);
        codec.write_g2_lem(&c.beta_g2, &mut buf);
        c.key.write_lem(&codec, &mut buf);
        buf.extend_from_slice(&c.partial_hash);
        buf.extend_from_slice(&c.next_challenge);
        buf.extend_from_slice(&(c.kind as u32).to_le_bytes());
        w.write_bytes(&buf)?;
        c.params.write(w)?;
    }
    w.end_section()?;
    Ok(())
}

/// Challenge the next contributor must answer. The chain starts from the
/// first challenge at the ceremony power, so truncated files keep it.
pub fn current_challenge<E: PairingCurve>(ceremony_power: u32, contributions: &[Contribution<E>]) -> [u8; 64] {
    contributions.last().map_or_else(|| first_challenge::<E>(ceremony_power), |c| c.next_challenge)
}

/// Hash the previous contributor's response answered, for challenge files.
pub fn last_response_hash<E: PairingCurve>(contributions: &[Contribution<E>]) -> [u8; 64] {
    contributions.last().map_or_else(blank_hash, |c| c.response_hash())
}

/// Everything a phase-2 consumer needs to know about an opened ceremony file.
#[derive(Clone, Debug)]
pub struct PtauInfo<E: PairingCurve> {
    pub header: PtauHeader,
    pub contributions: Vec<Contribution<E>>,
}

pub fn read_info<E: PairingCurve, R: Read + Seek>(r: &mut BinReader<R>) -> Result<PtauInfo<E>, PtauError> {
    let header = read_header_for::<E, R>(r)?;
    let contributions = read_contributions::<E, R>(r)?;
    Ok(PtauInfo { header, contributions })
}

/// Start index of Lagrange level `p` inside sections 12–15.
#[inline]
pub fn lagrange_offset(p: u32) -> usize {
    (1usize << p) - 1
}

/// Fail unless the Lagrange sections are present.
pub fn ensure_prepared<R: Read + Seek>(r: &BinReader<R>) -> Result<(), PtauError> {
    for id in [SEC_LAGRANGE_TAU_G1, SEC_LAGRANGE_TAU_G2, SEC_LAGRANGE_ALPHA_TAU_G1, SEC_LAGRANGE_BETA_TAU_G1] {
        if !r.has_section(id) {
            return Err(PtauError::NotPrepared);
        }
    }
    Ok(())
}

/// Open a ceremony file from disk.
pub fn open(path: impl AsRef<std::path::Path>) -> Result<BinReader<std::io::BufReader<std::fs::File>>, PtauError> {
    Ok(crate::binfile::open_file(path, PTAU_MAGIC, PTAU_VERSION)?)
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use std::io::Cursor;

    pub type Mem = Cursor<Vec<u8>>;

    pub fn reader(bytes: Vec<u8>) -> BinReader<Mem> {
        BinReader::new(Cursor::new(bytes), PTAU_MAGIC, PTAU_VERSION).unwrap()
    }

    /// Fresh accumulator of the given power.
    pub fn fresh<E: PairingCurve>(power: u32) -> Vec<u8> {
        new::new_accumulator::<E, _>(Cursor::new(Vec::new()), power).unwrap().0.into_inner()
    }

    /// One beacon contribution on top of a fresh accumulator, prepared for phase 2.
    pub fn prepared<E: PairingCurve>(power: u32) -> Vec<u8> {
        let mut r = reader(fresh::<E>(power));
        let contributed = contribute::beacon::<E, _, _>(&mut r, Cursor::new(Vec::new()), b"test beacon", 2, Some("beacon"))
            .unwrap()
            .0
            .into_inner();
        let mut r = reader(contributed);
        phase2::prepare_phase2::<E, _, _>(&mut r, Cursor::new(Vec::new())).unwrap().into_inner()
    }
}
