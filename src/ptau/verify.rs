//! Ceremony verification.
//!
//! Checks, in order:
//!
//! 1. every contribution against its predecessor (proofs of knowledge,
//!    same-ratio checks on the singular points, beacon keys recomputed);
//! 2. the newest contribution's `partialHash` and `nextChallenge` against the
//!    stored sections (skipped for truncated files, whose sections no longer
//!    hash to the recorded values);
//! 3. singular points: `tauG1[0] = G1`, `tauG2[0] = G2`, and the second
//!    points equal the newest record;
//! 4. that every section is a geometric sequence in `τ`, using a random
//!    geometric combination of consecutive points;
//! 5. any Lagrange levels against the monomial points.
//!
//! Soundness failures are logged and reported as `Ok(false)`.

#![forbid(unsafe_code)]

use std::io::{Read, Seek};

use ark_ec::short_weierstrass::{Affine, Projective, SWCurveConfig};
use ark_ec::{CurveGroup, Group};
use ark_ff::{batch_inversion, Field, One, UniformRand, Zero};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{error, info, warn};

use super::{
    chunks, current_challenge, hash_point_sections, lagrange_offset, read_g1_points, read_g2_points, read_info,
    section_group, section_points, Contribution, PointGroup, PtauError, POINT_SECTIONS, SEC_ALPHA_TAU_G1,
    SEC_BETA_G2, SEC_BETA_TAU_G1, SEC_LAGRANGE_ALPHA_TAU_G1, SEC_LAGRANGE_BETA_TAU_G1, SEC_LAGRANGE_TAU_G1,
    SEC_LAGRANGE_TAU_G2, SEC_TAU_G1, SEC_TAU_G2,
};
use crate::binfile::{BinError, BinReader};
use crate::codec::CurveCodec;
use crate::curve::{Fr, G1Affine, G1Projective, G2Affine, G2Projective, PairingCurve};
use crate::domain::Domain;
use crate::keypair::{beacon_rng, hash_to_g2, key_transcript, ContributionType, KeyError, PtauKey};
use crate::pcs::{msm, same_ratio};
use crate::transcript::{format_hash, ChallengeHasher};

/// Singular points after some prefix of the ceremony.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SingularPoints<E: PairingCurve> {
    pub tau_g1: G1Affine<E>,
    pub tau_g2: G2Affine<E>,
    pub alpha_g1: G1Affine<E>,
    pub beta_g1: G1Affine<E>,
    pub beta_g2: G2Affine<E>,
}

impl<E: PairingCurve> SingularPoints<E> {
    /// Before any contribution every point is a generator.
    pub fn generators() -> Self {
        let g1 = G1Projective::<E>::generator().into_affine();
        let g2 = G2Projective::<E>::generator().into_affine();
        Self { tau_g1: g1, tau_g2: g2, alpha_g1: g1, beta_g1: g1, beta_g2: g2 }
    }

    pub fn of(c: &Contribution<E>) -> Self {
        Self { tau_g1: c.tau_g1, tau_g2: c.tau_g2, alpha_g1: c.alpha_g1, beta_g1: c.beta_g1, beta_g2: c.beta_g2 }
    }
}

/// Check one contribution against the state it was applied to.
///
/// `challenge` is the hash the contributor answered.
pub fn verify_contribution<E: PairingCurve>(
    cur: &Contribution<E>,
    prev: &SingularPoints<E>,
    challenge: &[u8; 64],
) -> bool {
    let codec = CurveCodec::<E>::new();
    let key = &cur.key;
    if !key.is_well_formed() {
        error!("public key contains the identity");
        return false;
    }

    let mut sp = Vec::with_capacity(3);
    for (pers, name, part) in [(0u8, "tau", &key.tau), (1, "alpha", &key.alpha), (2, "beta", &key.beta)] {
        let g2_sp = hash_to_g2::<E>(&key_transcript(&codec, pers, challenge, &part.g1_s, &part.g1_sx));
        if !same_ratio::<E>(part.g1_s, part.g1_sx, g2_sp, part.g2_spx) {
            error!("invalid proof of knowledge for {name}");
            return false;
        }
        sp.push(g2_sp);
    }

    let checks = [
        ("tauG1", same_ratio::<E>(prev.tau_g1, cur.tau_g1, sp[0], key.tau.g2_spx)),
        ("tauG2", same_ratio::<E>(key.tau.g1_s, key.tau.g1_sx, prev.tau_g2, cur.tau_g2)),
        ("alphaTauG1", same_ratio::<E>(prev.alpha_g1, cur.alpha_g1, sp[1], key.alpha.g2_spx)),
        ("betaTauG1", same_ratio::<E>(prev.beta_g1, cur.beta_g1, sp[2], key.beta.g2_spx)),
        ("betaG2", same_ratio::<E>(key.beta.g1_s, key.beta.g1_sx, prev.beta_g2, cur.beta_g2)),
    ];
    for (what, ok) in checks {
        if !ok {
            error!("{what} is not the previous {what} scaled by the contributed secret");
            return false;
        }
    }

    if cur.kind == ContributionType::Beacon {
        let (Some(hash), Some(exp)) = (&cur.params.beacon_hash, cur.params.num_iterations_exp) else {
            error!("beacon contribution without beacon parameters");
            return false;
        };
        let mut rng = match beacon_rng(hash, exp) {
            Ok(rng) => rng,
            Err(e) => {
                error!("beacon parameters rejected: {e}");
                return false;
            }
        };
        if PtauKey::<E>::create(&mut rng, challenge).public() != cur.key {
            error!("beacon key does not match the recorded public key");
            return false;
        }
    }
    true
}

/// Verify a whole ceremony file.
pub fn verify<E: PairingCurve, R: Read + Seek>(r: &mut BinReader<R>) -> Result<bool, PtauError> {
    match verify_inner::<E, R>(r) {
        Err(PtauError::Codec(e)) => {
            error!("malformed point data: {e}");
            Ok(false)
        }
        Err(PtauError::Key(e)) if !matches!(e, KeyError::Bin(_)) => {
            error!("malformed contribution key: {e}");
            Ok(false)
        }
        other => other,
    }
}

fn verify_inner<E: PairingCurve, R: Read + Seek>(r: &mut BinReader<R>) -> Result<bool, PtauError> {
    let info = read_info::<E, R>(r)?;
    let codec = CurveCodec::<E>::new();
    let power = info.header.power;
    let ceremony_power = info.header.ceremony_power;

    for id in POINT_SECTIONS {
        let sz = match section_group(id) {
            PointGroup::G1 => codec.g1_size(),
            PointGroup::G2 => codec.g2_size(),
        } as u64;
        let expected = section_points(id, power) as u64 * sz;
        let found = r.section_size(id)?;
        if found != expected {
            return Err(BinError::SectionSize { id, expected, found }.into());
        }
    }

    let contributions = &info.contributions;
    let mut prev = SingularPoints::<E>::generators();
    if contributions.is_empty() {
        warn!("this file has no contributions; it must not be used in production");
    }
    for (i, c) in contributions.iter().enumerate() {
        let challenge = current_challenge(ceremony_power, &contributions[..i]);
        if !verify_contribution(c, &prev, &challenge) {
            error!(contribution = i + 1, "contribution #{} is invalid", i + 1);
            return Ok(false);
        }
        info!(
            "contribution #{} {}:\n\t\t{}",
            i + 1,
            c.params.name.as_deref().unwrap_or(""),
            format_hash(&c.response_hash())
        );
        prev = SingularPoints::of(c);
    }

    if let Some(last) = contributions.last() {
        if power < ceremony_power {
            warn!(power, ceremony_power, "file is truncated; newest contribution hashes not recomputed");
        } else {
            let challenge = current_challenge(ceremony_power, &contributions[..contributions.len() - 1]);
            let mut h = ChallengeHasher::resume(&challenge);
            hash_point_sections(r, &codec, power, &mut h)?;
            if h.finalize() != last.partial_hash {
                error!("stored sections do not match the newest contribution's partial hash");
                return Ok(false);
            }
            let mut h = ChallengeHasher::resume(&last.response_hash());
            hash_point_sections(r, &codec, power, &mut h)?;
            if h.finalize() != last.next_challenge {
                error!("stored sections do not match the newest contribution's next challenge");
                return Ok(false);
            }
        }
    }

    let g1 = G1Projective::<E>::generator().into_affine();
    let g2 = G2Projective::<E>::generator().into_affine();
    let tau_g1 = read_g1_points::<E, R>(r, &codec, SEC_TAU_G1, 0, 2)?;
    let tau_g2 = read_g2_points::<E, R>(r, &codec, SEC_TAU_G2, 0, 2)?;
    let alpha = read_g1_points::<E, R>(r, &codec, SEC_ALPHA_TAU_G1, 0, 1)?[0];
    let beta = read_g1_points::<E, R>(r, &codec, SEC_BETA_TAU_G1, 0, 1)?[0];
    let beta_g2 = read_g2_points::<E, R>(r, &codec, SEC_BETA_G2, 0, 1)?[0];
    if tau_g1[0] != g1 || tau_g2[0] != g2 {
        error!("first tau points are not the generators");
        return Ok(false);
    }
    let stored = SingularPoints { tau_g1: tau_g1[1], tau_g2: tau_g2[1], alpha_g1: alpha, beta_g1: beta, beta_g2 };
    if stored != prev {
        error!("singular points do not match the newest contribution");
        return Ok(false);
    }
    if !same_ratio::<E>(g1, beta, g2, beta_g2) {
        error!("betaTauG1[0] and betaG2 disagree");
        return Ok(false);
    }

    let mut rng = ChaCha20Rng::from_entropy();
    let rho = Fr::<E>::rand(&mut rng);
    let mut read_g1 = |id, s, l| read_g1_points::<E, R>(r, &codec, id, s, l);
    for id in [SEC_TAU_G1, SEC_ALPHA_TAU_G1, SEC_BETA_TAU_G1] {
        let (a, b) = consecutive_combination(&mut read_g1, id, section_points(id, power), rho)?;
        if !same_ratio::<E>(a.into_affine(), b.into_affine(), g2, tau_g2[1]) {
            error!(section = id, "G1 section is not a sequence of powers of tau");
            return Ok(false);
        }
    }
    let mut read_g2 = |id, s, l| read_g2_points::<E, R>(r, &codec, id, s, l);
    let (a, b) = consecutive_combination(&mut read_g2, SEC_TAU_G2, section_points(SEC_TAU_G2, power), rho)?;
    if !same_ratio::<E>(g1, tau_g1[1], a.into_affine(), b.into_affine()) {
        error!("tauG2 is not a sequence of powers of tau");
        return Ok(false);
    }

    let lagrange = [
        (SEC_TAU_G1, SEC_LAGRANGE_TAU_G1),
        (SEC_TAU_G2, SEC_LAGRANGE_TAU_G2),
        (SEC_ALPHA_TAU_G1, SEC_LAGRANGE_ALPHA_TAU_G1),
        (SEC_BETA_TAU_G1, SEC_LAGRANGE_BETA_TAU_G1),
    ];
    for (mono, lag) in lagrange {
        if !r.has_section(lag) {
            continue;
        }
        for p in 0..=power {
            let ok = match section_group(lag) {
                PointGroup::G1 => lagrange_level_matches(
                    &mut |id, s, l| read_g1_points::<E, R>(r, &codec, id, s, l),
                    (mono, lag),
                    p,
                    rho,
                )?,
                PointGroup::G2 => lagrange_level_matches(
                    &mut |id, s, l| read_g2_points::<E, R>(r, &codec, id, s, l),
                    (mono, lag),
                    p,
                    rho,
                )?,
            };
            if !ok {
                error!(section = lag, level = p, "Lagrange points do not match the monomial points");
                return Ok(false);
            }
        }
    }

    info!(power, contributions = contributions.len(), "powers of tau OK");
    Ok(true)
}

/// Reads `len` points of a section starting at a point index.
type ReadPoints<'a, P> = dyn FnMut(u32, usize, usize) -> Result<Vec<Affine<P>>, PtauError> + 'a;

/// `(Σ ρ^i·P_i, Σ ρ^i·P_{i+1})` over `i < count − 1`.
fn consecutive_combination<P: SWCurveConfig>(
    read: &mut ReadPoints<'_, P>,
    id: u32,
    count: usize,
    rho: P::ScalarField,
) -> Result<(Projective<P>, Projective<P>), PtauError> {
    let mut lo = Projective::<P>::zero();
    let mut hi = Projective::<P>::zero();
    let pairs = count.saturating_sub(1);
    for (start, len) in chunks(pairs) {
        let pts = read(id, start, len + 1)?;
        let mut t = rho.pow([start as u64]);
        let mut scalars = Vec::with_capacity(len);
        for _ in 0..len {
            scalars.push(t);
            t *= rho;
        }
        lo += msm(&pts[..len], &scalars);
        hi += msm(&pts[1..], &scalars);
    }
    Ok((lo, hi))
}

/// Level `p` holds `L_i = (1/n)·Σ_j ω^{−ij}·M_j`, so for any `ρ`
///
/// ```text
/// Σ_i ρ^i·L_i = Σ_j (ρ^n − 1) / (n·(ρ·ω^{−j} − 1)) · M_j
/// ```
///
/// which both sides stream without materialising the level.
fn lagrange_level_matches<P: SWCurveConfig>(
    read: &mut ReadPoints<'_, P>,
    (mono_id, lag_id): (u32, u32),
    p: u32,
    rho: P::ScalarField,
) -> Result<bool, PtauError> {
    let domain = Domain::<P::ScalarField>::from_power(p)?;
    let n = domain.n;
    let rho_n = rho.pow([n as u64]);
    if rho_n.is_one() {
        // ρ in the domain: the identity above degenerates.
        return Ok(true);
    }
    let factor = (rho_n - P::ScalarField::one()) * domain.n_inv;
    let offset = lagrange_offset(p);

    let mut lhs = Projective::<P>::zero();
    let mut rhs = Projective::<P>::zero();
    for (start, len) in chunks(n) {
        let lag = read(lag_id, offset + start, len)?;
        let mono = read(mono_id, start, len)?;
        let mut rho_i = rho.pow([start as u64]);
        let mut w = domain.omega_inv.pow([start as u64]);
        let mut powers = Vec::with_capacity(len);
        let mut coeffs = Vec::with_capacity(len);
        for _ in 0..len {
            powers.push(rho_i);
            coeffs.push(rho * w - P::ScalarField::one());
            rho_i *= rho;
            w *= domain.omega_inv;
        }
        batch_inversion(&mut coeffs);
        for c in coeffs.iter_mut() {
            *c *= factor;
        }
        lhs += msm(&lag, &powers);
        rhs += msm(&mono, &coeffs);
    }
    Ok(lhs == rhs)
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::*;
    use super::*;
    use crate::binfile::BinWriter;
    use crate::curve::{Bls12_381, Bn254};
    use std::io::Cursor;

    fn beaconed<E: PairingCurve>(power: u32) -> Vec<u8> {
        let mut r = reader(fresh::<E>(power));
        contribute::beacon::<E, _, _>(&mut r, Cursor::new(Vec::new()), b"verify me", 2, Some("b"))
            .unwrap()
            .0
            .into_inner()
    }

    #[test]
    fn fresh_file_verifies() {
        let mut r = reader(fresh::<Bn254>(2));
        assert!(verify::<Bn254, _>(&mut r).unwrap());
    }

    #[test]
    fn contributed_files_verify() {
        let once = beaconed::<Bn254>(3);
        let mut r = reader(once.clone());
        assert!(verify::<Bn254, _>(&mut r).unwrap());

        let mut r = reader(once);
        let twice = contribute::contribute::<Bn254, _, _>(&mut r, Cursor::new(Vec::new()), b"entropy", Some("c"))
            .unwrap()
            .0
            .into_inner();
        let mut r = reader(twice);
        assert!(verify::<Bn254, _>(&mut r).unwrap());
    }

    #[test]
    fn prepared_file_verifies_bls() {
        let mut r = reader(prepared::<Bls12_381>(2));
        assert!(verify::<Bls12_381, _>(&mut r).unwrap());
    }

    #[test]
    fn flipped_point_byte_fails() {
        let mut bytes = beaconed::<Bn254>(2);
        let r = reader(bytes.clone());
        let start = r.section(SEC_TAU_G1).unwrap().start as usize;
        bytes[start + 3 * 64 + 5] ^= 1;
        let mut r = reader(bytes);
        assert!(!verify::<Bn254, _>(&mut r).unwrap());
    }

    #[test]
    fn flipped_key_byte_fails() {
        let once = beaconed::<Bn254>(2);
        let mut r = reader(once);
        let mut bytes = contribute::contribute::<Bn254, _, _>(&mut r, Cursor::new(Vec::new()), b"e", None)
            .unwrap()
            .0
            .into_inner();
        let codec = CurveCodec::<Bn254>::new();
        let r = reader(bytes.clone());
        // count, then the first record's five singular points, then its key.
        let key_at = r.section(SEC_CONTRIBUTIONS).unwrap().start as usize
            + 4
            + 3 * codec.g1_size()
            + 2 * codec.g2_size();
        bytes[key_at + 7] ^= 0x55;
        let mut r = reader(bytes);
        assert!(!verify::<Bn254, _>(&mut r).unwrap());
    }

    #[test]
    fn forged_singular_point_fails() {
        let mut r = reader(beaconed::<Bn254>(2));
        let mut info = read_info::<Bn254, _>(&mut r).unwrap();
        info.contributions[0].tau_g1 = (info.contributions[0].tau_g1 * Fr::<Bn254>::from(2u64)).into_affine();

        let mut w = BinWriter::new(Cursor::new(Vec::new()), PTAU_MAGIC, PTAU_VERSION).unwrap();
        write_header::<Bn254, _>(&mut w, 2, 2).unwrap();
        for id in POINT_SECTIONS {
            crate::binfile::copy_section(&mut r, &mut w, id).unwrap();
        }
        write_contributions::<Bn254, _>(&mut w, &info.contributions).unwrap();
        let mut r = reader(w.finish().unwrap().into_inner());
        assert!(!verify::<Bn254, _>(&mut r).unwrap());
    }

    #[test]
    fn tampered_beacon_key_fails() {
        let mut r = reader(beaconed::<Bn254>(2));
        let mut info = read_info::<Bn254, _>(&mut r).unwrap();
        info.contributions[0].params.beacon_hash = Some(b"another beacon".to_vec());

        let mut w = BinWriter::new(Cursor::new(Vec::new()), PTAU_MAGIC, PTAU_VERSION).unwrap();
        write_header::<Bn254, _>(&mut w, 2, 2).unwrap();
        for id in POINT_SECTIONS {
            crate::binfile::copy_section(&mut r, &mut w, id).unwrap();
        }
        write_contributions::<Bn254, _>(&mut w, &info.contributions).unwrap();
        let mut r = reader(w.finish().unwrap().into_inner());
        assert!(!verify::<Bn254, _>(&mut r).unwrap());
    }
}
