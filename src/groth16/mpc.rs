//! Groth16 phase-2 ceremony on section 10.
//!
//! ```text
//! 10  csHash[64] | u32 n | { δ₁ after [G1] | g1_s | g1_sx [G1] | g2_spx [G2] |
//!                            transcript[64] | u32 type | params }*
//! ```
//!
//! A contribution samples `d`, multiplies `δ₁`, `δ₂` by `d` and divides
//! every point of sections 8 (C) and 9 (H) by it. Its key is derived from
//! the challenge `Blake2b(csHash ‖ previous contributions)`, so the chain
//! cannot be reordered. Verification rebuilds the initial key from the
//! circuit and the ceremony file and walks the chain with same-ratio checks.

#![forbid(unsafe_code)]

use std::io::{Cursor, Read, Seek, Write};

use ark_ec::{AffineRepr, CurveGroup, Group};
use ark_ff::{Field, UniformRand, Zero};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{error, info, warn};

use super::{read_header, read_key_header, setup, write_header, Groth16Header, SEC_C, SEC_H, SEC_MPC};
use crate::binfile::{copy_section, section_is_equal, BinReader, BinWriter};
use crate::codec::CurveCodec;
use crate::curve::{Fr, G1Affine, G1Projective, G2Affine, G2Projective, PairingCurve};
use crate::keypair::{
    beacon_rng, entropy_rng, hash_to_g2, key_transcript, ContributionParams, ContributionType, KeyPair, PublicKeyPart,
};
use crate::pcs::{msm, same_ratio};
use crate::ptau::chunks;
use crate::r1cs::R1cs;
use crate::transcript::ChallengeHasher;
use crate::zkey::{self, read_g1, read_g2, write_g1, write_g2, Protocol, ProtocolError, ZKEY_MAGIC, ZKEY_VERSION};

/// One phase-2 contribution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MpcContribution<E: PairingCurve> {
    pub delta_after: G1Affine<E>,
    pub key: PublicKeyPart<E>,
    pub transcript: [u8; 64],
    pub kind: ContributionType,
    pub params: ContributionParams,
}

/// Content of section 10.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MpcParams<E: PairingCurve> {
    pub cs_hash: [u8; 64],
    pub contributions: Vec<MpcContribution<E>>,
}

impl<E: PairingCurve> MpcParams<E> {
    /// Challenge answered by the next contribution.
    pub fn challenge(&self) -> [u8; 64] {
        challenge_after(&self.cs_hash, &self.contributions)
    }
}

/// `Blake2b(csHash ‖ δ₁ after ‖ g1_s ‖ g1_sx ‖ g2_spx ‖ transcript …)`.
pub fn challenge_after<E: PairingCurve>(cs_hash: &[u8; 64], contributions: &[MpcContribution<E>]) -> [u8; 64] {
    let codec = CurveCodec::<E>::new();
    let mut h = ChallengeHasher::new();
    h.update(cs_hash);
    let mut buf = Vec::new();
    for c in contributions {
        buf.clear();
        codec.write_g1_uncompressed(&c.delta_after, &mut buf);
        codec.write_g1_uncompressed(&c.key.g1_s, &mut buf);
        codec.write_g1_uncompressed(&c.key.g1_sx, &mut buf);
        codec.write_g2_uncompressed(&c.key.g2_spx, &mut buf);
        buf.extend_from_slice(&c.transcript);
        h.update(&buf);
    }
    h.finalize()
}

pub fn read_mpc_params<E: PairingCurve, R: Read + Seek>(r: &mut BinReader<R>) -> Result<MpcParams<E>, ProtocolError> {
    let codec = CurveCodec::<E>::new();
    r.start_read_section(SEC_MPC)?;
    let mut cs_hash = [0u8; 64];
    cs_hash.copy_from_slice(&r.read_bytes(64)?);
    let n = r.read_u32()?;
    let mut contributions = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let delta_after = read_g1(r, &codec)?;
        let key = PublicKeyPart { g1_s: read_g1(r, &codec)?, g1_sx: read_g1(r, &codec)?, g2_spx: read_g2(r, &codec)? };
        let mut transcript = [0u8; 64];
        transcript.copy_from_slice(&r.read_bytes(64)?);
        let kind = ContributionType::from_u32(r.read_u32()?)?;
        let params = ContributionParams::read(r)?;
        contributions.push(MpcContribution { delta_after, key, transcript, kind, params });
    }
    r.end_read_section(false)?;
    Ok(MpcParams { cs_hash, contributions })
}

pub fn write_mpc_params<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    p: &MpcParams<E>,
) -> Result<(), ProtocolError> {
    let codec = CurveCodec::<E>::new();
    w.start_section(SEC_MPC)?;
    w.write_bytes(&p.cs_hash)?;
    w.write_u32(p.contributions.len() as u32)?;
    for c in &p.contributions {
        write_g1(w, &codec, &c.delta_after)?;
        write_g1(w, &codec, &c.key.g1_s)?;
        write_g1(w, &codec, &c.key.g1_sx)?;
        write_g2(w, &codec, &c.key.g2_spx)?;
        w.write_bytes(&c.transcript)?;
        w.write_u32(c.kind as u32)?;
        c.params.write(w)?;
    }
    w.end_section()?;
    Ok(())
}

// ============================================================================
// Contributing
// ============================================================================

/// Contribute with randomness from `entropy` and the OS. Returns the output
/// and the hash identifying this contribution.
pub fn contribute<E: PairingCurve, R: Read + Seek, W: Write + Seek>(
    r: &mut BinReader<R>,
    out: W,
    entropy: &[u8],
    name: Option<&str>,
) -> Result<(W, [u8; 64]), ProtocolError> {
    let mut rng = entropy_rng(entropy);
    contribute_with_rng::<E, _, _, _>(r, out, &mut rng, ContributionType::Random, ContributionParams::named(name))
}

/// Deterministic contribution from a public beacon.
pub fn beacon<E: PairingCurve, R: Read + Seek, W: Write + Seek>(
    r: &mut BinReader<R>,
    out: W,
    beacon_hash: &[u8],
    exp: u32,
    name: Option<&str>,
) -> Result<(W, [u8; 64]), ProtocolError> {
    let mut rng = beacon_rng(beacon_hash, exp)?;
    let params = ContributionParams::beacon(name, beacon_hash, exp);
    contribute_with_rng::<E, _, _, _>(r, out, &mut rng, ContributionType::Beacon, params)
}

pub fn contribute_with_rng<E: PairingCurve, R: Read + Seek, W: Write + Seek, G: RngCore>(
    r: &mut BinReader<R>,
    out: W,
    rng: &mut G,
    kind: ContributionType,
    params: ContributionParams,
) -> Result<(W, [u8; 64]), ProtocolError> {
    let codec = CurveCodec::<E>::new();
    let header = read_key_header(r, &codec)?;
    let mut mpc = read_mpc_params::<E, R>(r)?;
    let challenge = mpc.challenge();

    let key = KeyPair::<E>::create(rng, 0, &challenge);
    let transcript = key_transcript(&codec, 0, &challenge, &key.g1_s, &key.g1_sx);
    let inv = key.prv.inverse().ok_or_else(|| ProtocolError::BadZkey("zero contribution secret".into()))?;
    let new_header = Groth16Header {
        delta1: (header.delta1 * key.prv).into_affine(),
        delta2: (header.delta2 * key.prv).into_affine(),
        ..header
    };
    mpc.contributions.push(MpcContribution {
        delta_after: new_header.delta1,
        key: key.public(),
        transcript,
        kind,
        params,
    });

    let mut w = BinWriter::new(out, ZKEY_MAGIC, ZKEY_VERSION)?;
    zkey::write_protocol(&mut w, Protocol::Groth16)?;
    write_header(&mut w, &codec, &new_header)?;
    for id in 3..=7 {
        copy_section(r, &mut w, id)?;
    }
    scale_section(r, &mut w, &codec, SEC_C, inv)?;
    scale_section(r, &mut w, &codec, SEC_H, inv)?;
    write_mpc_params(&mut w, &mpc)?;

    let hash = mpc.challenge();
    info!(
        contributions = mpc.contributions.len(),
        hash = %hex::encode(&hash[..16]),
        "zkey contribution applied"
    );
    Ok((w.finish()?, hash))
}

/// Multiply every G1 point of a section by `factor`.
fn scale_section<E: PairingCurve, R: Read + Seek, W: Write + Seek>(
    r: &mut BinReader<R>,
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
    id: u32,
    factor: Fr<E>,
) -> Result<(), ProtocolError> {
    let sz = codec.g1_size();
    let total = r.section_size(id)? as usize / sz;
    w.start_section(id)?;
    for (start, len) in chunks(total) {
        let pts = codec.read_g1_lem_many(&r.read_section_range(id, (start * sz) as u64, (len * sz) as u64)?)?;
        let scaled: Vec<G1Projective<E>> = pts.iter().map(|p| *p * factor).collect();
        let mut bytes = Vec::with_capacity(len * sz);
        for p in G1Projective::<E>::normalize_batch(&scaled) {
            codec.write_g1_lem(&p, &mut bytes);
        }
        w.write_bytes(&bytes)?;
    }
    w.end_section()?;
    Ok(())
}

// ============================================================================
// Verification
// ============================================================================

/// Check a contributed key against the circuit and ceremony it claims to
/// come from. Soundness failures are `Ok(false)`.
pub fn verify_from_init<E: PairingCurve, P: Read + Seek, R: Read + Seek>(
    r1cs: &R1cs<E>,
    ptau: &mut BinReader<P>,
    zkey: &mut BinReader<R>,
) -> Result<bool, ProtocolError> {
    let (init, _) = setup::new_zkey(r1cs, ptau, Cursor::new(Vec::new()))?;
    let mut init = BinReader::new(Cursor::new(init.into_inner()), ZKEY_MAGIC, ZKEY_VERSION)?;
    match verify_inner::<E, _, _>(&mut init, zkey) {
        Err(ProtocolError::Codec(e)) => {
            error!("zkey holds an invalid encoding: {e}");
            Ok(false)
        }
        other => other,
    }
}

fn verify_inner<E: PairingCurve, I: Read + Seek, R: Read + Seek>(
    init: &mut BinReader<I>,
    zkey: &mut BinReader<R>,
) -> Result<bool, ProtocolError> {
    let codec = CurveCodec::<E>::new();
    let h0 = read_key_header(init, &codec)?;
    zkey::read_protocol(zkey)?.expect(Protocol::Groth16)?;
    let h = read_header(zkey, &codec)?;
    if (h.n_vars, h.n_public, h.domain_size) != (h0.n_vars, h0.n_public, h0.domain_size)
        || (h.alpha1, h.beta1, h.beta2, h.gamma2) != (h0.alpha1, h0.beta1, h0.beta2, h0.gamma2)
    {
        error!("zkey header does not match the circuit and ceremony");
        return Ok(false);
    }

    let mpc0 = read_mpc_params::<E, I>(init)?;
    let mpc = read_mpc_params::<E, R>(zkey)?;
    if mpc.cs_hash != mpc0.cs_hash {
        error!("circuit hash does not match");
        return Ok(false);
    }
    for id in 3..=7 {
        if !section_is_equal(init, zkey, id)? {
            error!(section = id, "section differs from the initial key");
            return Ok(false);
        }
    }

    let g1 = G1Projective::<E>::generator().into_affine();
    let g2 = G2Projective::<E>::generator().into_affine();
    let mut prev = h0.delta1;
    for (i, c) in mpc.contributions.iter().enumerate() {
        let challenge = challenge_after(&mpc.cs_hash, &mpc.contributions[..i]);
        if !verify_contribution(&codec, c, &prev, &challenge) {
            error!(contribution = i + 1, "invalid phase-2 contribution");
            return Ok(false);
        }
        prev = c.delta_after;
    }
    if prev != h.delta1 {
        error!("δ₁ does not match the last contribution");
        return Ok(false);
    }
    if !same_ratio::<E>(g1, h.delta1, g2, h.delta2) {
        error!("δ₁ and δ₂ use different secrets");
        return Ok(false);
    }

    let mut rng = ChaCha20Rng::from_entropy();
    for id in [SEC_C, SEC_H] {
        if !divided_by_delta(init, zkey, &codec, id, &h.delta2, &mut rng)? {
            error!(section = id, "points are not the initial ones divided by δ");
            return Ok(false);
        }
    }

    if mpc.contributions.is_empty() {
        warn!("zkey has no phase-2 contributions");
    }
    for (i, c) in mpc.contributions.iter().enumerate() {
        let name = c.params.name.as_deref().unwrap_or("");
        info!(contribution = i + 1, name, kind = ?c.kind, "phase-2 contribution OK");
    }
    Ok(true)
}

/// Proof of knowledge, δ update and (for beacons) key reproduction.
fn verify_contribution<E: PairingCurve>(
    codec: &CurveCodec<E>,
    c: &MpcContribution<E>,
    prev_delta: &G1Affine<E>,
    challenge: &[u8; 64],
) -> bool {
    if !c.key.is_well_formed() {
        return false;
    }
    let transcript = key_transcript(codec, 0, challenge, &c.key.g1_s, &c.key.g1_sx);
    if transcript != c.transcript {
        error!("contribution transcript does not match its challenge");
        return false;
    }
    let g2_sp = hash_to_g2::<E>(&transcript);
    if !same_ratio::<E>(c.key.g1_s, c.key.g1_sx, g2_sp, c.key.g2_spx) {
        error!("proof of knowledge fails");
        return false;
    }
    if !same_ratio::<E>(*prev_delta, c.delta_after, g2_sp, c.key.g2_spx) {
        error!("δ was not multiplied by the contributed secret");
        return false;
    }
    if c.kind == ContributionType::Beacon {
        let (Some(hash), Some(exp)) = (&c.params.beacon_hash, c.params.num_iterations_exp) else {
            error!("beacon contribution without beacon parameters");
            return false;
        };
        let Ok(mut rng) = beacon_rng(hash, exp) else {
            return false;
        };
        if KeyPair::<E>::create(&mut rng, 0, challenge).public() != c.key {
            error!("beacon key cannot be reproduced");
            return false;
        }
    }
    true
}

/// `Σρ_i·new_i · δ₂ == Σρ_i·init_i` for random `ρ`.
fn divided_by_delta<E: PairingCurve, I: Read + Seek, R: Read + Seek>(
    init: &mut BinReader<I>,
    zkey: &mut BinReader<R>,
    codec: &CurveCodec<E>,
    id: u32,
    delta2: &G2Affine<E>,
    rng: &mut ChaCha20Rng,
) -> Result<bool, ProtocolError> {
    let sz = codec.g1_size();
    let size = init.section_size(id)?;
    if zkey.section_size(id)? != size {
        return Ok(false);
    }
    let total = size as usize / sz;
    let mut acc_new = G1Projective::<E>::zero();
    let mut acc_init = G1Projective::<E>::zero();
    for (start, len) in chunks(total) {
        let (off, n) = ((start * sz) as u64, (len * sz) as u64);
        let new = codec.read_g1_lem_many(&zkey.read_section_range(id, off, n)?)?;
        let old = codec.read_g1_lem_many(&init.read_section_range(id, off, n)?)?;
        let rho: Vec<Fr<E>> = (0..len).map(|_| Fr::<E>::rand(rng)).collect();
        acc_new += msm(&new, &rho);
        acc_init += msm(&old, &rho);
    }
    let (acc_new, acc_init) = (acc_new.into_affine(), acc_init.into_affine());
    if acc_new.is_zero() || acc_init.is_zero() {
        return Ok(acc_new.is_zero() && acc_init.is_zero());
    }
    let g2 = G2Projective::<E>::generator().into_affine();
    Ok(same_ratio::<E>(acc_new, acc_init, g2, *delta2))
}

/// MPC metadata of a zkey, for reporting.
pub fn read_contributions<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
) -> Result<MpcParams<E>, ProtocolError> {
    zkey::read_protocol(r)?.expect(Protocol::Groth16)?;
    read_mpc_params(r)
}

#[cfg(test)]
mod tests {
    use super::super::{export_verification_key, prover, verifier};
    use super::*;
    use crate::curve::Bn254;
    use crate::zkey::testutil::*;

    fn initial(ptau: &mut BinReader<Mem>) -> Vec<u8> {
        setup::new_zkey(&square::<Bn254>(), ptau, Cursor::new(Vec::new())).unwrap().0.into_inner()
    }

    fn contributed(ptau: &mut BinReader<Mem>) -> Vec<u8> {
        let z0 = initial(ptau);
        let (z1, _) = contribute::<Bn254, _, _>(&mut zkey_reader(z0), Cursor::new(Vec::new()), b"entropy", Some("alice"))
            .unwrap();
        let (z2, _) =
            beacon::<Bn254, _, _>(&mut zkey_reader(z1.into_inner()), Cursor::new(Vec::new()), b"beacon", 3, None)
                .unwrap();
        z2.into_inner()
    }

    #[test]
    fn fresh_key_verifies() {
        let mut ptau = ptau::<Bn254>(3);
        let z0 = initial(&mut ptau);
        assert!(verify_from_init(&square::<Bn254>(), &mut ptau, &mut zkey_reader(z0)).unwrap());
    }

    #[test]
    fn contributions_verify_and_still_prove() {
        let mut ptau = ptau::<Bn254>(3);
        let z = contributed(&mut ptau);
        let mpc = read_contributions::<Bn254, _>(&mut zkey_reader(z.clone())).unwrap();
        assert_eq!(mpc.contributions.len(), 2);
        assert_eq!(mpc.contributions[0].params.name.as_deref(), Some("alice"));
        assert_eq!(mpc.contributions[1].kind, ContributionType::Beacon);
        assert!(verify_from_init(&square::<Bn254>(), &mut ptau, &mut zkey_reader(z.clone())).unwrap());

        let vk = export_verification_key::<Bn254, _>(&mut zkey_reader(z.clone())).unwrap();
        let (proof, public) = prover::prove::<Bn254, _>(&mut zkey_reader(z), &square_witness::<Bn254>(3)).unwrap();
        assert!(verifier::verify(&vk, &public, &proof).unwrap());
    }

    #[test]
    fn beacon_is_reproducible() {
        let mut ptau = ptau::<Bn254>(3);
        let z0 = initial(&mut ptau);
        let a = beacon::<Bn254, _, _>(&mut zkey_reader(z0.clone()), Cursor::new(Vec::new()), b"b", 1, None).unwrap();
        let b = beacon::<Bn254, _, _>(&mut zkey_reader(z0), Cursor::new(Vec::new()), b"b", 1, None).unwrap();
        assert_eq!(a.1, b.1);
        assert_eq!(a.0.into_inner(), b.0.into_inner());
    }

    #[test]
    fn other_circuit_is_rejected() {
        let mut ptau = ptau::<Bn254>(4);
        let z = contributed(&mut ptau);
        assert!(!verify_from_init(&mixed::<Bn254>(), &mut ptau, &mut zkey_reader(z)).unwrap());
    }

    #[test]
    fn forged_delta_is_rejected() {
        let mut ptau = ptau::<Bn254>(3);
        let z = contributed(&mut ptau);
        let mut r = zkey_reader(z.clone());
        let codec = CurveCodec::<Bn254>::new();
        let h = read_key_header::<Bn254, _>(&mut r, &codec).unwrap();
        let mpc = read_mpc_params::<Bn254, _>(&mut r).unwrap();

        // Rescale δ without a matching contribution record.
        let k = Fr::<Bn254>::from(7u64);
        let forged = Groth16Header { delta1: (h.delta1 * k).into_affine(), delta2: (h.delta2 * k).into_affine(), ..h };
        let mut w = BinWriter::new(Cursor::new(Vec::new()), ZKEY_MAGIC, ZKEY_VERSION).unwrap();
        zkey::write_protocol(&mut w, Protocol::Groth16).unwrap();
        write_header(&mut w, &codec, &forged).unwrap();
        for id in 3..=9 {
            copy_section(&mut r, &mut w, id).unwrap();
        }
        write_mpc_params(&mut w, &mpc).unwrap();
        let bytes = w.finish().unwrap().into_inner();
        assert!(!verify_from_init(&square::<Bn254>(), &mut ptau, &mut zkey_reader(bytes)).unwrap());
    }

    #[test]
    fn corrupted_h_section_is_rejected() {
        let mut ptau = ptau::<Bn254>(3);
        let z = contributed(&mut ptau);
        let r = zkey_reader(z.clone());
        let start = r.section(SEC_H).unwrap().start as usize;
        let mut bytes = z;
        bytes[start + 3] ^= 1;
        assert!(!verify_from_init(&square::<Bn254>(), &mut ptau, &mut zkey_reader(bytes)).unwrap());
    }
}
