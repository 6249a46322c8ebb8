//! Phase-2 preparation: Lagrange forms of the monomial sections.
//!
//! For every level `p ≤ power` the group IFFT of the first `2^p` monomial
//! points gives `[L_i(τ)]` over the size-`2^p` domain. Levels are stored
//! back to back, level `p` starting at point `2^p − 1`.
//!
//! Levels that fit in one block are transformed in memory. Larger ones go
//! through an anonymous scratch file with at most two blocks resident:
//!
//! ```text
//! gather   scratch[i] = mono[bitrev(i)]
//! local    butterfly stages of span ≤ block, one block at a time
//! cross    each wider stage pairs block (j) with block (j + half)
//! emit     scratch · n⁻¹ streamed into the output section
//! ```

#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use ark_ec::short_weierstrass::{Affine, Projective, SWCurveConfig};
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::One;
use tracing::{debug, info};

use super::{
    read_g1_points, read_g2_points, read_info, section_group, PointGroup, PtauError, PTAU_MAGIC, PTAU_VERSION,
    SEC_ALPHA_TAU_G1, SEC_BETA_TAU_G1, SEC_CONTRIBUTIONS, SEC_HEADER, SEC_LAGRANGE_ALPHA_TAU_G1,
    SEC_LAGRANGE_BETA_TAU_G1, SEC_LAGRANGE_TAU_G1, SEC_LAGRANGE_TAU_G2, SEC_TAU_G1, SEC_TAU_G2, POINT_SECTIONS,
};
use crate::binfile::{copy_section, BinReader, BinWriter};
use crate::codec::{CodecError, CurveCodec};
use crate::config;
use crate::curve::PairingCurve;
use crate::domain::{pow_u64, Domain};

/// Monomial section and the Lagrange section derived from it.
pub const LAGRANGE_SECTIONS: [(u32, u32); 4] = [
    (SEC_TAU_G1, SEC_LAGRANGE_TAU_G1),
    (SEC_TAU_G2, SEC_LAGRANGE_TAU_G2),
    (SEC_ALPHA_TAU_G1, SEC_LAGRANGE_ALPHA_TAU_G1),
    (SEC_BETA_TAU_G1, SEC_LAGRANGE_BETA_TAU_G1),
];

/// Copy sections 1–7 and append sections 12–15.
pub fn prepare_phase2<E: PairingCurve, R: Read + Seek, W: Write + Seek>(
    r: &mut BinReader<R>,
    out: W,
) -> Result<W, PtauError> {
    let info = read_info::<E, R>(r)?;
    let power = info.header.power;
    let codec = CurveCodec::<E>::new();
    let mut w = BinWriter::new(out, PTAU_MAGIC, PTAU_VERSION)?;

    copy_section(r, &mut w, SEC_HEADER)?;
    for id in POINT_SECTIONS {
        copy_section(r, &mut w, id)?;
    }
    copy_section(r, &mut w, SEC_CONTRIBUTIONS)?;

    let g1 = PointLem::<E::G1Config> {
        size: codec.g1_size(),
        encode: &|q, out| codec.write_g1_lem(q, out),
        decode: &|b| codec.read_g1_lem(b),
    };
    let g2 = PointLem::<E::G2Config> {
        size: codec.g2_size(),
        encode: &|q, out| codec.write_g2_lem(q, out),
        decode: &|b| codec.read_g2_lem_trusted(b),
    };
    for (mono, lag) in LAGRANGE_SECTIONS {
        w.start_section(lag)?;
        for p in 0..=power {
            let block = block_points(1 << p);
            let mut sink = |bytes: &[u8]| -> Result<(), PtauError> { Ok(w.write_bytes(bytes)?) };
            match section_group(mono) {
                PointGroup::G1 => lagrange_level(p, block, &g1, &mut sink, |s, l| {
                    read_g1_points::<E, R>(r, &codec, mono, s, l)
                })?,
                PointGroup::G2 => lagrange_level(p, block, &g2, &mut sink, |s, l| {
                    read_g2_points::<E, R>(r, &codec, mono, s, l)
                })?,
            }
            debug!(section = lag, level = p, block, "lagrange level written");
        }
        w.end_section()?;
        info!(section = lag, power, "lagrange section prepared");
    }
    Ok(w.finish()?)
}

/// LEM record format of one group.
struct PointLem<'a, P: SWCurveConfig> {
    size: usize,
    encode: &'a dyn Fn(&Affine<P>, &mut Vec<u8>),
    decode: &'a dyn Fn(&[u8]) -> Result<Affine<P>, CodecError>,
}

/// Largest power of two within the configured chunk, capped at `n`.
fn block_points(n: usize) -> usize {
    let c = config::settings().chunk_points.max(2);
    (1usize << c.ilog2()).min(n)
}

fn bitrev(i: usize, bits: u32) -> usize {
    if bits == 0 {
        0
    } else {
        i.reverse_bits() >> (usize::BITS - bits)
    }
}

/// Transform level `p` and hand its LEM bytes to `sink` in index order.
fn lagrange_level<P: SWCurveConfig>(
    p: u32,
    block: usize,
    lem: &PointLem<'_, P>,
    sink: &mut impl FnMut(&[u8]) -> Result<(), PtauError>,
    mut source: impl FnMut(usize, usize) -> Result<Vec<Affine<P>>, PtauError>,
) -> Result<(), PtauError> {
    let n = 1usize << p;
    config::memlog("lagrange block", block.min(n));
    if n <= block {
        let mut bytes = Vec::with_capacity(n * lem.size);
        for q in level_ifft(&source(0, n)?, p)? {
            (lem.encode)(&q, &mut bytes);
        }
        return sink(&bytes);
    }

    let domain = Domain::<P::ScalarField>::from_power(p)?;
    let mut scratch = Scratch::new(lem)?;

    for start in (0..n).step_by(block) {
        let mut pts = Vec::with_capacity(block);
        for i in start..start + block {
            pts.extend(source(bitrev(i, p), 1)?.into_iter().map(Projective::<P>::from));
        }
        let mut len = 2;
        while len <= block {
            butterflies(&mut pts, len, pow_u64(domain.omega_inv, (n / len) as u64));
            len *= 2;
        }
        scratch.store(start, &pts)?;
    }

    let mut len = 2 * block;
    while len <= n {
        let half = len / 2;
        let w_len = pow_u64(domain.omega_inv, (n / len) as u64);
        for base in (0..n).step_by(len) {
            for off in (0..half).step_by(block) {
                let mut lo = scratch.load(base + off, block)?;
                let mut hi = scratch.load(base + off + half, block)?;
                let mut w = pow_u64(w_len, off as u64);
                for (u, v) in lo.iter_mut().zip(hi.iter_mut()) {
                    let t = *v * w;
                    *v = *u - t;
                    *u += t;
                    w *= w_len;
                }
                scratch.store(base + off, &lo)?;
                scratch.store(base + off + half, &hi)?;
            }
        }
        debug!(level = p, span = len, "lagrange pass");
        len *= 2;
    }

    for start in (0..n).step_by(block) {
        let pts: Vec<Projective<P>> = scratch.load(start, block)?.into_iter().map(|q| q * domain.n_inv).collect();
        let mut bytes = Vec::with_capacity(block * lem.size);
        for q in Projective::<P>::normalize_batch(&pts) {
            (lem.encode)(&q, &mut bytes);
        }
        sink(&bytes)?;
    }
    Ok(())
}

/// Radix-2 stage of span `len` over `a`, which starts on a multiple of `len`.
fn butterflies<P: SWCurveConfig>(a: &mut [Projective<P>], len: usize, w_len: P::ScalarField) {
    let half = len / 2;
    let mut twiddles = Vec::with_capacity(half);
    let mut w = P::ScalarField::one();
    for _ in 0..half {
        twiddles.push(w);
        w *= w_len;
    }
    for chunk in a.chunks_mut(len) {
        let (lo, hi) = chunk.split_at_mut(half);
        for ((u, v), w) in lo.iter_mut().zip(hi.iter_mut()).zip(&twiddles) {
            let t = *v * *w;
            *v = *u - t;
            *u += t;
        }
    }
}

/// Fixed-size point records in an anonymous temporary file.
struct Scratch<'a, 'l, P: SWCurveConfig> {
    file: File,
    lem: &'a PointLem<'l, P>,
}

impl<'a, 'l, P: SWCurveConfig> Scratch<'a, 'l, P> {
    fn new(lem: &'a PointLem<'l, P>) -> Result<Self, PtauError> {
        Ok(Self { file: tempfile::tempfile()?, lem })
    }

    fn load(&mut self, start: usize, len: usize) -> Result<Vec<Projective<P>>, PtauError> {
        self.file.seek(SeekFrom::Start((start * self.lem.size) as u64))?;
        let mut bytes = vec![0u8; len * self.lem.size];
        self.file.read_exact(&mut bytes)?;
        bytes.chunks(self.lem.size).map(|b| Ok((self.lem.decode)(b)?.into_group())).collect()
    }

    fn store(&mut self, start: usize, pts: &[Projective<P>]) -> Result<(), PtauError> {
        let mut bytes = Vec::with_capacity(pts.len() * self.lem.size);
        for q in Projective::<P>::normalize_batch(pts) {
            (self.lem.encode)(&q, &mut bytes);
        }
        self.file.seek(SeekFrom::Start((start * self.lem.size) as u64))?;
        self.file.write_all(&bytes)?;
        Ok(())
    }
}

fn level_ifft<P: SWCurveConfig>(points: &[Affine<P>], p: u32) -> Result<Vec<Affine<P>>, PtauError> {
    let domain = Domain::<P::ScalarField>::from_power(p)?;
    let mut proj: Vec<Projective<P>> = points.iter().map(|q| (*q).into()).collect();
    domain.ifft(&mut proj)?;
    Ok(Projective::<P>::normalize_batch(&proj))
}
