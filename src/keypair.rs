//! Contribution keys, randomness sources and the parameter block
//!
//! Every ceremony contribution (Powers-of-Tau or Groth16 phase 2) proves
//! knowledge of its secret `x` with a pair of proofs:
//!
//! ```text
//! g1_s   random G1 point          g1_sx  = x·g1_s
//! g2_sp  = hashToG2(transcript)   g2_spx = x·g2_sp
//! ```
//!
//! A verifier recomputes `g2_sp` from the public transcript and checks
//! `same_ratio(g1_s, g1_sx, g2_sp, g2_spx)`; the secret itself never leaves
//! this module.

#![forbid(unsafe_code)]

use std::io::{Read, Seek, Write};

use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{UniformRand, Zero};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

use crate::binfile::{BinError, BinReader, BinWriter};
use crate::codec::{CodecError, CurveCodec};
use crate::curve::{Fr, G1Affine, G1Projective, G2Affine, G2Projective, PairingCurve};
use crate::transcript::blake2b;

/// Errors raised while building keys or parsing parameter blocks.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error(transparent)]
    Bin(#[from] BinError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("beacon iteration exponent must be in 1..=63 (got {0})")]
    BadIterations(u32),
    #[error("beacon hash must be non-empty and at most 255 bytes (got {0})")]
    BadBeaconHash(usize),
    #[error("contribution name is longer than 64 bytes")]
    NameTooLong,
    #[error("parameter block: {0}")]
    BadParams(String),
}

/// Contribution kinds as stored on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContributionType {
    Random = 0,
    Beacon = 1,
}

impl ContributionType {
    pub fn from_u32(v: u32) -> Result<Self, KeyError> {
        match v {
            0 => Ok(Self::Random),
            1 => Ok(Self::Beacon),
            _ => Err(KeyError::BadParams(format!("unknown contribution type {v}"))),
        }
    }
}

/// One secret with its proof of knowledge.
#[derive(Clone, Debug)]
pub struct KeyPair<E: PairingCurve> {
    pub prv: Fr<E>,
    pub g1_s: G1Affine<E>,
    pub g1_sx: G1Affine<E>,
    pub g2_sp: G2Affine<E>,
    pub g2_spx: G2Affine<E>,
}

/// Public half of a [`KeyPair`], as recorded in contribution lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyPart<E: PairingCurve> {
    pub g1_s: G1Affine<E>,
    pub g1_sx: G1Affine<E>,
    pub g2_spx: G2Affine<E>,
}

impl<E: PairingCurve> KeyPair<E> {
    /// Sample a secret and its proof; `pers` personalises the hash of
    /// `challenge` that yields `g2_sp`.
    pub fn create<R: RngCore>(rng: &mut R, pers: u8, challenge: &[u8]) -> Self {
        let codec = CurveCodec::<E>::new();
        let prv = nonzero_scalar::<E, _>(rng);
        let g1_s = G1Projective::<E>::rand(rng).into_affine();
        let g1_sx = (g1_s * prv).into_affine();
        let g2_sp = hash_to_g2::<E>(&key_transcript(&codec, pers, challenge, &g1_s, &g1_sx));
        let g2_spx = (g2_sp * prv).into_affine();
        Self { prv, g1_s, g1_sx, g2_sp, g2_spx }
    }

    pub fn public(&self) -> PublicKeyPart<E> {
        PublicKeyPart { g1_s: self.g1_s, g1_sx: self.g1_sx, g2_spx: self.g2_spx }
    }
}

impl<E: PairingCurve> PublicKeyPart<E> {
    /// All three points must be proper group elements.
    pub fn is_well_formed(&self) -> bool {
        !(self.g1_s.is_zero() || self.g1_sx.is_zero() || self.g2_spx.is_zero())
    }
}

fn nonzero_scalar<E: PairingCurve, R: RngCore>(rng: &mut R) -> Fr<E> {
    loop {
        let s = Fr::<E>::rand(rng);
        if !s.is_zero() {
            return s;
        }
    }
}

/// `Blake2b-512(pers ‖ challenge ‖ g1_s ‖ g1_sx)` with uncompressed points.
pub fn key_transcript<E: PairingCurve>(
    codec: &CurveCodec<E>,
    pers: u8,
    challenge: &[u8],
    g1_s: &G1Affine<E>,
    g1_sx: &G1Affine<E>,
) -> [u8; 64] {
    let mut buf = Vec::with_capacity(1 + challenge.len() + 2 * codec.g1_size());
    buf.push(pers);
    buf.extend_from_slice(challenge);
    codec.write_g1_uncompressed(g1_s, &mut buf);
    codec.write_g1_uncompressed(g1_sx, &mut buf);
    blake2b(&buf)
}

/// Deterministic G2 point from a digest: ChaCha20 seeded with its first 32
/// bytes samples a uniformly random subgroup element.
pub fn hash_to_g2<E: PairingCurve>(digest: &[u8]) -> G2Affine<E> {
    let mut seed = [0u8; 32];
    let n = digest.len().min(32);
    seed[..n].copy_from_slice(&digest[..n]);
    let mut rng = ChaCha20Rng::from_seed(seed);
    G2Projective::<E>::rand(&mut rng).into_affine()
}

/// RNG for a random contribution: `Blake2b(entropy ‖ 64 OS bytes)[..32]`.
pub fn entropy_rng(entropy: &[u8]) -> ChaCha20Rng {
    let mut os = [0u8; 64];
    rand::rngs::OsRng.fill_bytes(&mut os);
    let mut buf = entropy.to_vec();
    buf.extend_from_slice(&os);
    let digest = blake2b(&buf);
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest[..32]);
    ChaCha20Rng::from_seed(seed)
}

/// `SHA-256` applied `2^exp` times to `beacon_hash`.
pub fn beacon_digest(beacon_hash: &[u8], exp: u32) -> Result<[u8; 32], KeyError> {
    if !(1..=63).contains(&exp) {
        return Err(KeyError::BadIterations(exp));
    }
    if beacon_hash.is_empty() || beacon_hash.len() > 255 {
        return Err(KeyError::BadBeaconHash(beacon_hash.len()));
    }
    let (inner, outer) = if exp < 32 { (1u64 << exp, 1u64) } else { (1u64 << 32, 1u64 << (exp - 32)) };
    let mut cur: Vec<u8> = beacon_hash.to_vec();
    for _ in 0..outer {
        for _ in 0..inner {
            cur = Sha256::digest(&cur).to_vec();
        }
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&cur);
    Ok(out)
}

/// RNG for a beacon contribution.
pub fn beacon_rng(beacon_hash: &[u8], exp: u32) -> Result<ChaCha20Rng, KeyError> {
    Ok(ChaCha20Rng::from_seed(beacon_digest(beacon_hash, exp)?))
}

/// Powers-of-Tau contribution key: secrets `tau`, `alpha`, `beta`.
#[derive(Clone, Debug)]
pub struct PtauKey<E: PairingCurve> {
    pub tau: KeyPair<E>,
    pub alpha: KeyPair<E>,
    pub beta: KeyPair<E>,
}

/// Public part of a [`PtauKey`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PtauPublicKey<E: PairingCurve> {
    pub tau: PublicKeyPart<E>,
    pub alpha: PublicKeyPart<E>,
    pub beta: PublicKeyPart<E>,
}

impl<E: PairingCurve> PtauKey<E> {
    pub fn create<R: RngCore>(rng: &mut R, challenge: &[u8]) -> Self {
        let tau = KeyPair::create(rng, 0, challenge);
        let alpha = KeyPair::create(rng, 1, challenge);
        let beta = KeyPair::create(rng, 2, challenge);
        Self { tau, alpha, beta }
    }

    pub fn public(&self) -> PtauPublicKey<E> {
        PtauPublicKey { tau: self.tau.public(), alpha: self.alpha.public(), beta: self.beta.public() }
    }
}

impl<E: PairingCurve> PtauPublicKey<E> {
    fn g1_points(&self) -> [&G1Affine<E>; 6] {
        [
            &self.tau.g1_s,
            &self.tau.g1_sx,
            &self.alpha.g1_s,
            &self.alpha.g1_sx,
            &self.beta.g1_s,
            &self.beta.g1_sx,
        ]
    }

    fn g2_points(&self) -> [&G2Affine<E>; 3] {
        [&self.tau.g2_spx, &self.alpha.g2_spx, &self.beta.g2_spx]
    }

    /// Uncompressed encoding (hashed into the response hash and sent in
    /// response files).
    pub fn write_uncompressed(&self, codec: &CurveCodec<E>, out: &mut Vec<u8>) {
        for p in self.g1_points() {
            codec.write_g1_uncompressed(p, out);
        }
        for p in self.g2_points() {
            codec.write_g2_uncompressed(p, out);
        }
    }

    pub fn read_uncompressed(codec: &CurveCodec<E>, b: &[u8]) -> Result<Self, KeyError> {
        let (g1, g2) = (codec.g1_size(), codec.g2_size());
        if b.len() != Self::size(codec) {
            return Err(CodecError::BadLength { expected: Self::size(codec), got: b.len() }.into());
        }
        let p1 = |i: usize| codec.read_g1_uncompressed(&b[i * g1..(i + 1) * g1]);
        let p2 = |i: usize| codec.read_g2_uncompressed(&b[6 * g1 + i * g2..6 * g1 + (i + 1) * g2]);
        Ok(Self {
            tau: PublicKeyPart { g1_s: p1(0)?, g1_sx: p1(1)?, g2_spx: p2(0)? },
            alpha: PublicKeyPart { g1_s: p1(2)?, g1_sx: p1(3)?, g2_spx: p2(1)? },
            beta: PublicKeyPart { g1_s: p1(4)?, g1_sx: p1(5)?, g2_spx: p2(2)? },
        })
    }

    /// Same order, LEM encoding (contribution section).
    pub fn write_lem(&self, codec: &CurveCodec<E>, out: &mut Vec<u8>) {
        for p in self.g1_points() {
            codec.write_g1_lem(p, out);
        }
        for p in self.g2_points() {
            codec.write_g2_lem(p, out);
        }
    }

    pub fn read_lem(codec: &CurveCodec<E>, b: &[u8]) -> Result<Self, KeyError> {
        let (g1, g2) = (codec.g1_size(), codec.g2_size());
        if b.len() != Self::size(codec) {
            return Err(CodecError::BadLength { expected: Self::size(codec), got: b.len() }.into());
        }
        let p1 = |i: usize| codec.read_g1_lem(&b[i * g1..(i + 1) * g1]);
        let p2 = |i: usize| codec.read_g2_lem(&b[6 * g1 + i * g2..6 * g1 + (i + 1) * g2]);
        Ok(Self {
            tau: PublicKeyPart { g1_s: p1(0)?, g1_sx: p1(1)?, g2_spx: p2(0)? },
            alpha: PublicKeyPart { g1_s: p1(2)?, g1_sx: p1(3)?, g2_spx: p2(1)? },
            beta: PublicKeyPart { g1_s: p1(4)?, g1_sx: p1(5)?, g2_spx: p2(2)? },
        })
    }

    /// Encoded size in bytes (both encodings have the same length).
    pub fn size(codec: &CurveCodec<E>) -> usize {
        6 * codec.g1_size() + 3 * codec.g2_size()
    }

    pub fn is_well_formed(&self) -> bool {
        self.tau.is_well_formed() && self.alpha.is_well_formed() && self.beta.is_well_formed()
    }
}

// ============================================================================
// Parameter block
// ============================================================================

const TAG_NAME: u8 = 1;
const TAG_ITERATIONS: u8 = 2;
const TAG_BEACON_HASH: u8 = 3;

/// Optional descriptive parameters of a contribution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContributionParams {
    pub name: Option<String>,
    pub num_iterations_exp: Option<u32>,
    pub beacon_hash: Option<Vec<u8>>,
}

impl ContributionParams {
    pub fn named(name: Option<&str>) -> Self {
        Self { name: name.map(str::to_string), ..Self::default() }
    }

    pub fn beacon(name: Option<&str>, beacon_hash: &[u8], exp: u32) -> Self {
        Self {
            name: name.map(str::to_string),
            num_iterations_exp: Some(exp),
            beacon_hash: Some(beacon_hash.to_vec()),
        }
    }

    /// Tagged entries in ascending tag order, prefixed by their total length.
    pub fn encode(&self) -> Result<Vec<u8>, KeyError> {
        let mut body = Vec::new();
        if let Some(name) = &self.name {
            let b = name.as_bytes();
            if b.len() > 64 {
                return Err(KeyError::NameTooLong);
            }
            body.push(TAG_NAME);
            body.push(b.len() as u8);
            body.extend_from_slice(b);
        }
        if let Some(exp) = self.num_iterations_exp {
            if !(1..=63).contains(&exp) {
                return Err(KeyError::BadIterations(exp));
            }
            body.push(TAG_ITERATIONS);
            body.push(exp as u8);
        }
        if let Some(h) = &self.beacon_hash {
            if h.is_empty() || h.len() > 255 {
                return Err(KeyError::BadBeaconHash(h.len()));
            }
            body.push(TAG_BEACON_HASH);
            body.push(h.len() as u8);
            body.extend_from_slice(h);
        }
        let mut out = (body.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn write<W: Write + Seek>(&self, w: &mut BinWriter<W>) -> Result<(), KeyError> {
        w.write_bytes(&self.encode()?)?;
        Ok(())
    }

    pub fn read<R: Read + Seek>(r: &mut BinReader<R>) -> Result<Self, KeyError> {
        let len = r.read_u32()? as usize;
        let body = r.read_bytes(len)?;
        Self::decode(&body)
    }

    pub fn decode(body: &[u8]) -> Result<Self, KeyError> {
        let mut p = Self::default();
        let mut i = 0;
        let mut last_tag = 0u8;
        fn take(body: &[u8], i: usize, n: usize) -> Result<&[u8], KeyError> {
            body.get(i..i + n).ok_or_else(|| KeyError::BadParams("truncated entry".into()))
        }
        while i < body.len() {
            let tag = body[i];
            if tag <= last_tag {
                return Err(KeyError::BadParams(format!("tag {tag} out of order")));
            }
            last_tag = tag;
            i += 1;
            match tag {
                TAG_NAME => {
                    let len = take(body, i, 1)?[0] as usize;
                    let s = take(body, i + 1, len)?;
                    p.name = Some(
                        String::from_utf8(s.to_vec()).map_err(|_| KeyError::BadParams("name is not UTF-8".into()))?,
                    );
                    i += 1 + len;
                }
                TAG_ITERATIONS => {
                    p.num_iterations_exp = Some(take(body, i, 1)?[0] as u32);
                    i += 1;
                }
                TAG_BEACON_HASH => {
                    let len = take(body, i, 1)?[0] as usize;
                    p.beacon_hash = Some(take(body, i + 1, len)?.to_vec());
                    i += 1 + len;
                }
                other => return Err(KeyError::BadParams(format!("unknown tag {other}"))),
            }
        }
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{Bls12_381, Bn254};
    use crate::pcs::same_ratio;

    fn proof_of_knowledge<E: PairingCurve>() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let challenge = [7u8; 64];
        let key = PtauKey::<E>::create(&mut rng, &challenge);
        let codec = CurveCodec::<E>::new();
        for (pers, k) in [(0u8, &key.tau), (1, &key.alpha), (2, &key.beta)] {
            let g2_sp = hash_to_g2::<E>(&key_transcript(&codec, pers, &challenge, &k.g1_s, &k.g1_sx));
            assert_eq!(g2_sp, k.g2_sp);
            assert!(same_ratio::<E>(k.g1_s, k.g1_sx, g2_sp, k.g2_spx));
        }
        let public = key.public();
        let mut u = Vec::new();
        public.write_uncompressed(&codec, &mut u);
        assert_eq!(PtauPublicKey::read_uncompressed(&codec, &u).unwrap(), public);
        let mut l = Vec::new();
        public.write_lem(&codec, &mut l);
        assert_eq!(PtauPublicKey::read_lem(&codec, &l).unwrap(), public);
        assert!(public.is_well_formed());
    }

    #[test]
    fn keys_prove_knowledge_bn254() {
        proof_of_knowledge::<Bn254>();
    }

    #[test]
    fn keys_prove_knowledge_bls12_381() {
        proof_of_knowledge::<Bls12_381>();
    }

    #[test]
    fn beacon_is_deterministic() {
        let a = beacon_digest(b"beacon", 3).unwrap();
        let mut cur = b"beacon".to_vec();
        for _ in 0..8 {
            cur = Sha256::digest(&cur).to_vec();
        }
        assert_eq!(a.to_vec(), cur);
        assert!(matches!(beacon_digest(b"beacon", 0), Err(KeyError::BadIterations(0))));
        assert!(matches!(beacon_digest(b"", 3), Err(KeyError::BadBeaconHash(0))));
    }

    #[test]
    fn params_block_roundtrip_and_ordering() {
        let p = ContributionParams::beacon(Some("final"), &[1, 2, 3], 10);
        let enc = p.encode().unwrap();
        assert_eq!(u32::from_le_bytes(enc[..4].try_into().unwrap()) as usize, enc.len() - 4);
        assert_eq!(ContributionParams::decode(&enc[4..]).unwrap(), p);
        assert_eq!(ContributionParams::default().encode().unwrap(), vec![0, 0, 0, 0]);

        // tag 2 before tag 1
        assert!(ContributionParams::decode(&[2, 5, 1, 1, b'a']).is_err());
        assert!(ContributionParams::decode(&[9, 0]).is_err());
        assert!(ContributionParams::decode(&[1, 10, b'a']).is_err());
        assert!(matches!(
            ContributionParams::named(Some(&"x".repeat(65))).encode(),
            Err(KeyError::NameTooLong)
        ));
    }
}
