//! Challenge/response transport for air-gapped contributors.
//!
//! ```text
//! challenge  lastResponseHash[64] | tauG1 | tauG2 | alphaTauG1 | betaTauG1 | betaG2
//! response   challengeHash[64]    | new sections (same order) | public key
//! ```
//!
//! Everything is uncompressed. The Blake2b of a challenge file is exactly
//! the challenge hash recorded in the ceremony, and the prefix of a response
//! up to the end of its sections hashes to the contribution's `partialHash`.

#![forbid(unsafe_code)]

use std::io::{Read, Seek, SeekFrom, Write};

use ark_ec::CurveGroup;
use rand::RngCore;
use tracing::{info, warn};

use super::contribute::{finish_contribution, point_size, scalar_run, ContributionReceipt};
use super::verify::{verify_contribution, SingularPoints};
use super::{
    chunks, current_challenge, last_response_hash, max_power, read_info, section_group, section_points,
    write_header, PointGroup, PtauError, POINT_SECTIONS, PTAU_MAGIC, PTAU_VERSION, SEC_BETA_G2,
};
use crate::binfile::{BinReader, BinWriter};
use crate::codec::CurveCodec;
use crate::curve::{Fr, G1Projective, G2Projective, PairingCurve};
use crate::keypair::{entropy_rng, ContributionParams, ContributionType, PtauKey, PtauPublicKey};
use crate::transcript::{format_hash, ChallengeHasher};

/// Bytes of sections 2–6 at `power`.
fn sections_len<E: PairingCurve>(codec: &CurveCodec<E>, power: u32) -> u64 {
    POINT_SECTIONS
        .iter()
        .map(|&id| (section_points(id, power) * point_size(codec, section_group(id))) as u64)
        .sum()
}

/// Power of a challenge (`extra = 0`) or response (`extra` = key size) of
/// `len` bytes.
fn power_from_len<E: PairingCurve>(codec: &CurveCodec<E>, len: u64, extra: u64) -> Result<u32, PtauError> {
    (1..=max_power::<E>())
        .find(|&p| 64 + sections_len(codec, p) + extra == len)
        .ok_or_else(|| PtauError::BadContribution(format!("{len} bytes match no ceremony power")))
}

fn read_array<R: Read>(input: &mut R) -> Result<[u8; 64], PtauError> {
    let mut h = [0u8; 64];
    input.read_exact(&mut h)?;
    Ok(h)
}

/// Write the challenge for the next contributor; returns its hash.
pub fn export_challenge<E: PairingCurve, R: Read + Seek, W: Write>(
    r: &mut BinReader<R>,
    mut out: W,
) -> Result<(W, [u8; 64]), PtauError> {
    let info = read_info::<E, R>(r)?;
    let codec = CurveCodec::<E>::new();
    let mut hasher = ChallengeHasher::new();
    let prefix = last_response_hash(&info.contributions);
    out.write_all(&prefix)?;
    hasher.update(&prefix);
    for id in POINT_SECTIONS {
        let group = section_group(id);
        let sz = point_size(&codec, group) as u64;
        for (start, len) in chunks(section_points(id, info.header.power)) {
            let lem = r.read_section_range(id, start as u64 * sz, len as u64 * sz)?;
            let bytes = super::lem_to_uncompressed(&codec, group, &lem)?;
            out.write_all(&bytes)?;
            hasher.update(&bytes);
        }
    }
    let hash = hasher.finalize();
    if hash != current_challenge(info.header.ceremony_power, &info.contributions) {
        warn!("exported challenge differs from the recorded one (truncated file?)");
    }
    info!("challenge hash:\n\t\t{}", format_hash(&hash));
    Ok((out, hash))
}

/// Answer a challenge file with entropy-seeded secrets; returns the response
/// hash.
pub fn contribute_challenge<E: PairingCurve, R: Read + Seek, W: Write>(
    input: R,
    out: W,
    entropy: &[u8],
) -> Result<(W, [u8; 64]), PtauError> {
    let mut rng = entropy_rng(entropy);
    contribute_challenge_with_rng::<E, _, _, _>(input, out, &mut rng)
}

pub fn contribute_challenge_with_rng<E: PairingCurve, R: Read + Seek, W: Write, G: RngCore>(
    mut input: R,
    mut out: W,
    rng: &mut G,
) -> Result<(W, [u8; 64]), PtauError> {
    let codec = CurveCodec::<E>::new();
    let len = input.seek(SeekFrom::End(0))?;
    let power = power_from_len(&codec, len, 0)?;

    input.seek(SeekFrom::Start(0))?;
    let mut hasher = ChallengeHasher::new();
    let mut buf = vec![0u8; 1 << 16];
    let mut left = len;
    while left > 0 {
        let n = left.min(buf.len() as u64) as usize;
        input.read_exact(&mut buf[..n])?;
        hasher.update(&buf[..n]);
        left -= n as u64;
    }
    let challenge = hasher.finalize();
    info!(power, "challenge hash:\n\t\t{}", format_hash(&challenge));

    let key = PtauKey::<E>::create(rng, &challenge);
    input.seek(SeekFrom::Start(64))?;
    out.write_all(&challenge)?;
    let mut partial = ChallengeHasher::resume(&challenge);
    let tau = key.tau.prv;
    let one = Fr::<E>::from(1u64);
    for id in POINT_SECTIONS {
        let first = match id {
            super::SEC_ALPHA_TAU_G1 => key.alpha.prv,
            super::SEC_BETA_TAU_G1 | SEC_BETA_G2 => key.beta.prv,
            _ => one,
        };
        let group = section_group(id);
        let sz = point_size(&codec, group);
        for (start, len) in chunks(section_points(id, power)) {
            let mut raw = vec![0u8; len * sz];
            input.read_exact(&mut raw)?;
            let scalars = scalar_run(first, tau, start, len);
            let mut bytes = Vec::with_capacity(raw.len());
            match group {
                PointGroup::G1 => {
                    let proj = raw
                        .chunks(sz)
                        .zip(&scalars)
                        .map(|(b, s)| Ok(codec.read_g1_uncompressed(b)? * s))
                        .collect::<Result<Vec<_>, PtauError>>()?;
                    for p in G1Projective::<E>::normalize_batch(&proj) {
                        codec.write_g1_uncompressed(&p, &mut bytes);
                    }
                }
                PointGroup::G2 => {
                    let proj = raw
                        .chunks(sz)
                        .zip(&scalars)
                        .map(|(b, s)| Ok(codec.read_g2_uncompressed(b)? * s))
                        .collect::<Result<Vec<_>, PtauError>>()?;
                    for p in G2Projective::<E>::normalize_batch(&proj) {
                        codec.write_g2_uncompressed(&p, &mut bytes);
                    }
                }
            }
            out.write_all(&bytes)?;
            partial.update(&bytes);
        }
    }

    let public = key.public();
    let mut key_bytes = Vec::with_capacity(PtauPublicKey::<E>::size(&codec));
    public.write_uncompressed(&codec, &mut key_bytes);
    out.write_all(&key_bytes)?;
    let response = super::response_hash::<E>(&partial.finalize(), &public);
    info!("response hash:\n\t\t{}", format_hash(&response));
    Ok((out, response))
}

/// Append the contribution carried by a response file to `r`.
///
/// The response must answer the ceremony's current challenge and its
/// contribution must verify against the file's singular points.
pub fn import_response<E: PairingCurve, R: Read + Seek, S: Read + Seek, W: Read + Write + Seek>(
    r: &mut BinReader<R>,
    mut response: S,
    out: W,
    name: Option<&str>,
) -> Result<(W, ContributionReceipt), PtauError> {
    let info = read_info::<E, R>(r)?;
    let codec = CurveCodec::<E>::new();
    let power = info.header.power;
    let key_size = PtauPublicKey::<E>::size(&codec) as u64;

    let len = response.seek(SeekFrom::End(0))?;
    let expected = 64 + sections_len(&codec, power) + key_size;
    if len != expected {
        return Err(PtauError::BadContribution(format!("response has {len} bytes, expected {expected}")));
    }
    response.seek(SeekFrom::Start(0))?;
    let challenge = current_challenge(info.header.ceremony_power, &info.contributions);
    if read_array(&mut response)? != challenge {
        return Err(PtauError::WrongResponse);
    }

    let mut w = BinWriter::new(out, PTAU_MAGIC, PTAU_VERSION)?;
    write_header::<E, W>(&mut w, power, info.header.ceremony_power)?;
    let mut hasher = ChallengeHasher::resume(&challenge);
    for id in POINT_SECTIONS {
        let group = section_group(id);
        let sz = point_size(&codec, group);
        w.start_section(id)?;
        for (_, len) in chunks(section_points(id, power)) {
            let mut raw = vec![0u8; len * sz];
            response.read_exact(&mut raw)?;
            hasher.update(&raw);
            let mut lem = Vec::with_capacity(raw.len());
            for b in raw.chunks(sz) {
                match group {
                    PointGroup::G1 => codec.write_g1_lem(&codec.read_g1_uncompressed(b)?, &mut lem),
                    PointGroup::G2 => codec.write_g2_lem(&codec.read_g2_uncompressed(b)?, &mut lem),
                }
            }
            w.write_bytes(&lem)?;
        }
        w.end_section()?;
    }
    let partial_hash = hasher.finalize();
    let mut key_bytes = vec![0u8; key_size as usize];
    response.read_exact(&mut key_bytes)?;
    let public = PtauPublicKey::read_uncompressed(&codec, &key_bytes)?;

    let prev = info.contributions.last().map_or_else(SingularPoints::generators, SingularPoints::of);
    let (mut out, receipt) = finish_contribution(
        w,
        &codec,
        power,
        info.contributions,
        partial_hash,
        public,
        ContributionType::Random,
        ContributionParams::named(name),
    )?;

    out.seek(SeekFrom::Start(0))?;
    let mut check = BinReader::new(out, PTAU_MAGIC, PTAU_VERSION)?;
    let imported = read_info::<E, _>(&mut check)?;
    let ok = imported.contributions.last().map_or(false, |c| verify_contribution(c, &prev, &challenge));
    if !ok {
        return Err(PtauError::BadContribution("imported contribution does not verify".into()));
    }
    Ok((check.into_inner(), receipt))
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::*;
    use super::*;
    use crate::curve::Bn254;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::io::Cursor;

    fn answer(ptau: Vec<u8>, seed: u64) -> (Vec<u8>, [u8; 64], [u8; 64]) {
        let mut r = reader(ptau);
        let (challenge, hash) = export_challenge::<Bn254, _, _>(&mut r, Vec::new()).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let (response, response_hash) =
            contribute_challenge_with_rng::<Bn254, _, _, _>(Cursor::new(challenge), Vec::new(), &mut rng).unwrap();
        (response, hash, response_hash)
    }

    #[test]
    fn challenge_hash_is_current_challenge() {
        let mut r = reader(fresh::<Bn254>(2));
        let (_, hash) = export_challenge::<Bn254, _, _>(&mut r, Vec::new()).unwrap();
        assert_eq!(hash, first_challenge::<Bn254>(2));
    }

    #[test]
    fn response_roundtrip_verifies() {
        let base = fresh::<Bn254>(2);
        let (response, _, response_hash) = answer(base.clone(), 5);
        let mut r = reader(base);
        let (out, receipt) =
            import_response::<Bn254, _, _, _>(&mut r, Cursor::new(response), Cursor::new(Vec::new()), Some("offline"))
                .unwrap();
        assert_eq!(receipt.response_hash, response_hash);

        let mut r = reader(out.into_inner());
        let info = read_info::<Bn254, _>(&mut r).unwrap();
        assert_eq!(info.contributions[0].params.name.as_deref(), Some("offline"));
        assert!(verify::verify::<Bn254, _>(&mut r).unwrap());

        // The chain continues from the imported record.
        let (_, hash, _) = answer(r.into_inner().into_inner(), 6);
        assert_eq!(hash, receipt.next_challenge);
    }

    #[test]
    fn stale_response_is_rejected() {
        let base = fresh::<Bn254>(2);
        let (mut response, _, _) = answer(base.clone(), 7);
        response[0] ^= 0xff;
        let mut r = reader(base);
        assert!(matches!(
            import_response::<Bn254, _, _, _>(&mut r, Cursor::new(response), Cursor::new(Vec::new()), None),
            Err(PtauError::WrongResponse)
        ));
    }

    #[test]
    fn truncated_response_is_rejected() {
        let base = fresh::<Bn254>(2);
        let (mut response, _, _) = answer(base.clone(), 8);
        response.truncate(response.len() - 1);
        let mut r = reader(base);
        assert!(matches!(
            import_response::<Bn254, _, _, _>(&mut r, Cursor::new(response), Cursor::new(Vec::new()), None),
            Err(PtauError::BadContribution(_))
        ));
    }
}
