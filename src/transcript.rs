//! Fiat–Shamir transcripts and ceremony hash chains
//!
//! Two hashing disciplines are in play:
//!
//! - [`Keccak256Transcript`] drives the PLONK and FFLONK provers. Items are
//!   appended in protocol order: G1 points as uncompressed big-endian
//!   `x ‖ y`, scalars as `n8r` big-endian bytes. A challenge is
//!   `Keccak-256(items) mod r`; the provers [`reset`](Keccak256Transcript::reset)
//!   between rounds and re-seed with the previous challenge, so prover and
//!   verifier replay exactly the same byte schedule.
//! - [`ChallengeHasher`] is the Blake2b-512 stream of the Powers-of-Tau and
//!   zkey ceremonies. The running state cannot be exported from Blake2b, so
//!   a *partial hash* is the 64-byte digest of the prefix and resuming starts
//!   a fresh Blake2b-512 absorbing that digest first.
//!
//! ```
//! use zkforge::transcript::Keccak256Transcript;
//! use zkforge::curve::Bn254;
//! use ark_ff::One;
//!
//! let mut t = Keccak256Transcript::<Bn254>::new();
//! t.add_scalar(&ark_bn254::Fr::one());
//! let a = t.get_challenge().unwrap();
//!
//! let mut t2 = Keccak256Transcript::<Bn254>::new();
//! t2.add_scalar(&ark_bn254::Fr::one());
//! assert_eq!(a, t2.get_challenge().unwrap());
//! ```

#![forbid(unsafe_code)]

use blake2::Blake2b512;
use sha3::{Digest, Keccak256};

use ark_ff::PrimeField;

use crate::codec::CurveCodec;
use crate::curve::{Fr, G1Affine, PairingCurve};

/// Errors raised by transcripts.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("challenge requested from an empty transcript")]
    Empty,
}

/// Keccak-256 Fiat–Shamir transcript.
#[derive(Clone, Debug)]
pub struct Keccak256Transcript<E: PairingCurve> {
    codec: CurveCodec<E>,
    data: Vec<u8>,
    items: usize,
}

impl<E: PairingCurve> Default for Keccak256Transcript<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PairingCurve> Keccak256Transcript<E> {
    pub fn new() -> Self {
        Self { codec: CurveCodec::new(), data: Vec::new(), items: 0 }
    }

    pub fn reset(&mut self) {
        self.data.clear();
        self.items = 0;
    }

    pub fn add_point(&mut self, p: &G1Affine<E>) {
        self.codec.write_g1_uncompressed(p, &mut self.data);
        self.items += 1;
    }

    pub fn add_scalar(&mut self, s: &Fr<E>) {
        self.codec.fr.write_be(s, &mut self.data);
        self.items += 1;
    }

    /// `Keccak-256(items) mod r`.
    pub fn get_challenge(&self) -> Result<Fr<E>, TranscriptError> {
        if self.items == 0 {
            return Err(TranscriptError::Empty);
        }
        let digest = Keccak256::digest(&self.data);
        Ok(Fr::<E>::from_be_bytes_mod_order(&digest))
    }
}

/// Blake2b-512 byte stream with resumable partial digests.
#[derive(Clone, Default)]
pub struct ChallengeHasher {
    inner: Blake2b512,
}

impl ChallengeHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue a stream whose prefix digest is `partial`.
    pub fn resume(partial: &[u8]) -> Self {
        let mut h = Self::new();
        h.update(partial);
        h
    }

    pub fn update(&mut self, bytes: &[u8]) {
        Digest::update(&mut self.inner, bytes);
    }

    /// Digest of everything absorbed so far, leaving the stream usable.
    pub fn partial_hash(&self) -> [u8; 64] {
        self.clone().finalize()
    }

    pub fn finalize(self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out.copy_from_slice(&Digest::finalize(self.inner));
        out
    }
}

impl std::fmt::Debug for ChallengeHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChallengeHasher(blake2b-512)")
    }
}

/// Blake2b-512 of a byte string.
pub fn blake2b(bytes: &[u8]) -> [u8; 64] {
    let mut out = [0u8; 64];
    out.copy_from_slice(&Blake2b512::digest(bytes));
    out
}

/// Hash of the empty string, the chain anchor of a fresh ceremony.
pub fn blank_hash() -> [u8; 64] {
    blake2b(&[])
}

/// Render a 64-byte hash as four rows of 16 hex bytes for logs.
pub fn format_hash(h: &[u8]) -> String {
    h.chunks(16)
        .map(|row| {
            row.chunks(4).map(hex::encode).collect::<Vec<_>>().join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n\t\t")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Bn254;
    use ark_ec::{CurveGroup, Group};
    use ark_ff::One;

    #[test]
    fn challenge_is_keccak_of_items() {
        let mut t = Keccak256Transcript::<Bn254>::new();
        assert!(matches!(t.get_challenge(), Err(TranscriptError::Empty)));
        let g = crate::curve::G1Projective::<Bn254>::generator().into_affine();
        t.add_point(&g);
        t.add_scalar(&ark_bn254::Fr::one());
        let c = t.get_challenge().unwrap();

        let mut bytes = vec![0u8; 96];
        bytes[31] = 1;
        bytes[63] = 2;
        bytes[95] = 1;
        let expected = ark_bn254::Fr::from_be_bytes_mod_order(&Keccak256::digest(&bytes));
        assert_eq!(c, expected);

        t.reset();
        t.add_scalar(&c);
        assert_ne!(t.get_challenge().unwrap(), c);
    }

    #[test]
    fn partial_hash_resumes() {
        let mut h = ChallengeHasher::new();
        h.update(b"prefix");
        let partial = h.partial_hash();
        assert_eq!(partial, blake2b(b"prefix"));
        h.update(b"suffix");
        let mut r = ChallengeHasher::resume(&partial);
        r.update(b"suffix");
        // Resuming is deterministic but is a different stream from the original.
        let resumed = r.finalize();
        let mut again = ChallengeHasher::resume(&partial);
        again.update(b"suffix");
        assert_eq!(resumed, again.finalize());
        assert_ne!(resumed, h.finalize());
    }

    #[test]
    fn blank_hash_is_stable() {
        assert_eq!(blank_hash().len(), 64);
        assert!(format_hash(&blank_hash()).contains("\n\t\t"));
    }
}
