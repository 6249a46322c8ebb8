//! Contributions: random (entropy-seeded) and beacon.
//!
//! A contribution samples secrets `(τ', α', β')` and rewrites
//!
//! ```text
//! tauG1[i]      ← τ'^i · tauG1[i]
//! tauG2[i]      ← τ'^i · tauG2[i]
//! alphaTauG1[i] ← α'·τ'^i · alphaTauG1[i]
//! betaTauG1[i]  ← β'·τ'^i · betaTauG1[i]
//! betaG2        ← β' · betaG2
//! ```
//!
//! then appends a record with the new singular points, the proof-of-knowledge
//! key and the hash chain (`partialHash`, `nextChallenge`).

#![forbid(unsafe_code)]

use std::io::{Read, Seek, Write};

use ark_ec::CurveGroup;
use ark_ff::{Field, One};
use rand::RngCore;
use tracing::{debug, info};

use super::{
    chunks, current_challenge, read_g1_points, read_g2_points, read_info, response_hash, section_group,
    section_points, write_contributions, write_header, Contribution, PointGroup, PtauError, POINT_SECTIONS,
    PTAU_MAGIC, PTAU_VERSION, SEC_ALPHA_TAU_G1, SEC_BETA_G2, SEC_BETA_TAU_G1, SEC_TAU_G1, SEC_TAU_G2,
};
use crate::binfile::{BinReader, BinWriter};
use crate::codec::CurveCodec;
use crate::config;
use crate::curve::{Fr, PairingCurve};
use crate::keypair::{beacon_rng, entropy_rng, ContributionParams, ContributionType, PtauKey, PtauPublicKey};
use crate::transcript::{format_hash, ChallengeHasher};

/// Hashes reported after a contribution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContributionReceipt {
    /// Identifies the contribution publicly.
    pub response_hash: [u8; 64],
    /// Challenge the next contributor answers.
    pub next_challenge: [u8; 64],
}

/// Contribute with secrets derived from `entropy` and the OS RNG.
pub fn contribute<E: PairingCurve, R: Read + Seek, W: Read + Write + Seek>(
    r: &mut BinReader<R>,
    out: W,
    entropy: &[u8],
    name: Option<&str>,
) -> Result<(W, ContributionReceipt), PtauError> {
    let mut rng = entropy_rng(entropy);
    contribute_with_rng::<E, _, _, _>(r, out, &mut rng, ContributionType::Random, ContributionParams::named(name))
}

/// Deterministic final contribution from a public beacon.
pub fn beacon<E: PairingCurve, R: Read + Seek, W: Read + Write + Seek>(
    r: &mut BinReader<R>,
    out: W,
    beacon_hash: &[u8],
    num_iterations_exp: u32,
    name: Option<&str>,
) -> Result<(W, ContributionReceipt), PtauError> {
    let mut rng = beacon_rng(beacon_hash, num_iterations_exp)?;
    let params = ContributionParams::beacon(name, beacon_hash, num_iterations_exp);
    contribute_with_rng::<E, _, _, _>(r, out, &mut rng, ContributionType::Beacon, params)
}

/// Contribution driven by an explicit RNG.
pub fn contribute_with_rng<E: PairingCurve, R: Read + Seek, W: Read + Write + Seek, G: RngCore>(
    r: &mut BinReader<R>,
    out: W,
    rng: &mut G,
    kind: ContributionType,
    params: ContributionParams,
) -> Result<(W, ContributionReceipt), PtauError> {
    let info = read_info::<E, R>(r)?;
    let power = info.header.power;
    let challenge = current_challenge(info.header.ceremony_power, &info.contributions);
    info!(
        contributions = info.contributions.len(),
        "contributing to power {power} ceremony; challenge hash:\n\t\t{}",
        format_hash(&challenge)
    );

    let key = PtauKey::<E>::create(rng, &challenge);
    let codec = CurveCodec::<E>::new();
    let mut w = BinWriter::new(out, PTAU_MAGIC, PTAU_VERSION)?;
    write_header::<E, W>(&mut w, power, info.header.ceremony_power)?;

    let mut hasher = ChallengeHasher::resume(&challenge);
    let tau = key.tau.prv;
    apply_section::<E, _, _>(r, &mut w, &codec, SEC_TAU_G1, power, tau, Fr::<E>::one(), &mut hasher)?;
    apply_section::<E, _, _>(r, &mut w, &codec, SEC_TAU_G2, power, tau, Fr::<E>::one(), &mut hasher)?;
    apply_section::<E, _, _>(r, &mut w, &codec, SEC_ALPHA_TAU_G1, power, tau, key.alpha.prv, &mut hasher)?;
    apply_section::<E, _, _>(r, &mut w, &codec, SEC_BETA_TAU_G1, power, tau, key.beta.prv, &mut hasher)?;
    apply_section::<E, _, _>(r, &mut w, &codec, SEC_BETA_G2, power, tau, key.beta.prv, &mut hasher)?;

    let partial_hash = hasher.partial_hash();
    finish_contribution(w, &codec, power, info.contributions, partial_hash, key.public(), kind, params)
}

/// Close a rewritten file: derive the response hash and the next challenge
/// from sections 2–6 as written, append the record and finish.
#[allow(clippy::too_many_arguments)]
pub(crate) fn finish_contribution<E: PairingCurve, W: Read + Write + Seek>(
    mut w: BinWriter<W>,
    codec: &CurveCodec<E>,
    power: u32,
    mut contributions: Vec<Contribution<E>>,
    partial_hash: [u8; 64],
    public: PtauPublicKey<E>,
    kind: ContributionType,
    params: ContributionParams,
) -> Result<(W, ContributionReceipt), PtauError> {
    let response = response_hash::<E>(&partial_hash, &public);

    // Second pass over what was just written.
    let mut next = ChallengeHasher::resume(&response);
    for id in POINT_SECTIONS {
        let group = section_group(id);
        let sz = point_size(codec, group) as u64;
        for (start, len) in chunks(section_points(id, power)) {
            let lem = w.read_back(id, start as u64 * sz, len as u64 * sz)?;
            next.update(&super::lem_to_uncompressed(codec, group, &lem)?);
        }
    }
    let next_challenge = next.finalize();

    let (g1, g2) = (codec.g1_size() as u64, codec.g2_size() as u64);
    let tau_g1 = codec.read_g1_lem(&w.read_back(SEC_TAU_G1, g1, g1)?)?;
    let tau_g2 = codec.read_g2_lem(&w.read_back(SEC_TAU_G2, g2, g2)?)?;
    let alpha_g1 = codec.read_g1_lem(&w.read_back(SEC_ALPHA_TAU_G1, 0, g1)?)?;
    let beta_g1 = codec.read_g1_lem(&w.read_back(SEC_BETA_TAU_G1, 0, g1)?)?;
    let beta_g2 = codec.read_g2_lem(&w.read_back(SEC_BETA_G2, 0, g2)?)?;

    contributions.push(Contribution {
        tau_g1,
        tau_g2,
        alpha_g1,
        beta_g1,
        beta_g2,
        key: public,
        partial_hash,
        next_challenge,
        kind,
        params,
    });
    write_contributions::<E, W>(&mut w, &contributions)?;

    info!("contribution response hash:\n\t\t{}", format_hash(&response));
    info!("next challenge hash:\n\t\t{}", format_hash(&next_challenge));
    Ok((w.finish()?, ContributionReceipt { response_hash: response, next_challenge }))
}

pub(crate) fn point_size<E: PairingCurve>(codec: &CurveCodec<E>, group: PointGroup) -> usize {
    match group {
        PointGroup::G1 => codec.g1_size(),
        PointGroup::G2 => codec.g2_size(),
    }
}

/// `first·step^i` for `i` in `start..start + len`.
pub(crate) fn scalar_run<F: Field>(first: F, step: F, start: usize, len: usize) -> Vec<F> {
    let mut t = first * step.pow([start as u64]);
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(t);
        t *= step;
    }
    out
}

/// Rewrite one section with `point[i] ← first·step^i · point[i]` while
/// hashing the new points.
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_section<E: PairingCurve, R: Read + Seek, W: Write + Seek>(
    r: &mut BinReader<R>,
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
    id: u32,
    power: u32,
    step: Fr<E>,
    first: Fr<E>,
    hasher: &mut ChallengeHasher,
) -> Result<(), PtauError> {
    let total = section_points(id, power);
    let group = section_group(id);
    w.start_section(id)?;
    for (start, len) in chunks(total) {
        config::memlog("contribution chunk", len);
        let scalars = scalar_run(first, step, start, len);
        let mut lem = Vec::new();
        let mut unc = Vec::new();
        match group {
            PointGroup::G1 => {
                let pts = read_g1_points::<E, R>(r, codec, id, start, len)?;
                let proj: Vec<_> = pts.iter().zip(&scalars).map(|(p, s)| *p * s).collect();
                for p in crate::curve::G1Projective::<E>::normalize_batch(&proj) {
                    codec.write_g1_lem(&p, &mut lem);
                    codec.write_g1_uncompressed(&p, &mut unc);
                }
            }
            PointGroup::G2 => {
                let pts = read_g2_points::<E, R>(r, codec, id, start, len)?;
                let proj: Vec<_> = pts.iter().zip(&scalars).map(|(p, s)| *p * s).collect();
                for p in crate::curve::G2Projective::<E>::normalize_batch(&proj) {
                    codec.write_g2_lem(&p, &mut lem);
                    codec.write_g2_uncompressed(&p, &mut unc);
                }
            }
        }
        w.write_bytes(&lem)?;
        hasher.update(&unc);
    }
    w.end_section()?;
    debug!(section = id, points = total, "section rewritten");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::*;
    use super::*;
    use crate::curve::{Bn254, G1Projective};
    use ark_ec::Group;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::io::Cursor;

    fn contribute_once(bytes: Vec<u8>, seed: u64) -> (Vec<u8>, ContributionReceipt) {
        let mut r = reader(bytes);
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let (w, receipt) = contribute_with_rng::<Bn254, _, _, _>(
            &mut r,
            Cursor::new(Vec::new()),
            &mut rng,
            ContributionType::Random,
            ContributionParams::named(Some("alice")),
        )
        .unwrap();
        (w.into_inner(), receipt)
    }

    #[test]
    fn contribution_updates_points_and_chain() {
        let (bytes, receipt) = contribute_once(fresh::<Bn254>(2), 1);
        let mut r = reader(bytes);
        let info = read_info::<Bn254, _>(&mut r).unwrap();
        assert_eq!(info.contributions.len(), 1);
        let c = &info.contributions[0];
        assert_eq!(c.next_challenge, receipt.next_challenge);
        assert_eq!(c.response_hash(), receipt.response_hash);
        assert_eq!(c.params.name.as_deref(), Some("alice"));

        let codec = CurveCodec::<Bn254>::new();
        let tau = read_g1_points(&mut r, &codec, SEC_TAU_G1, 0, 3).unwrap();
        assert_eq!(tau[0], G1Projective::<Bn254>::generator().into_affine());
        assert_eq!(tau[1], c.tau_g1);
        assert_ne!(tau[1], tau[2]);

        let (bytes2, receipt2) = contribute_once(r.into_inner().into_inner(), 2);
        let mut r2 = reader(bytes2);
        let info2 = read_info::<Bn254, _>(&mut r2).unwrap();
        assert_eq!(info2.contributions.len(), 2);
        assert_eq!(info2.contributions[0], info.contributions[0]);
        assert_eq!(info2.contributions[1].next_challenge, receipt2.next_challenge);
    }

    #[test]
    fn beacon_is_reproducible() {
        let base = fresh::<Bn254>(2);
        let run = |bytes: Vec<u8>| {
            let mut r = reader(bytes);
            beacon::<Bn254, _, _>(&mut r, Cursor::new(Vec::new()), b"0102", 3, None).unwrap().0.into_inner()
        };
        assert_eq!(run(base.clone()), run(base));
    }

    #[test]
    fn beacon_rejects_bad_exponent() {
        let mut r = reader(fresh::<Bn254>(2));
        assert!(matches!(
            beacon::<Bn254, _, _>(&mut r, Cursor::new(Vec::new()), b"01", 64, None),
            Err(PtauError::Key(_))
        ));
    }
}
