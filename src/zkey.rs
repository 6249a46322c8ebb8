//! Proving-key files (`.zkey`)
//!
//! Every zkey starts with the same two sections:
//!
//! ```text
//! 1  protocol   u32 id (1 Groth16, 2 PLONK, 10 FFLONK)
//! 2  header     u32 n8q | q[n8q] | u32 n8r | r[n8r] | protocol fields…
//! ```
//!
//! The remaining sections are protocol specific and documented in
//! [`crate::groth16`], [`crate::plonk`] and [`crate::fflonk`]. Points and
//! scalars inside a zkey are LEM-encoded like ceremony files.
//!
//! This module also owns [`ProtocolError`], the error type shared by key
//! construction, proving and verification, and the JSON helpers for public
//! signals.

#![forbid(unsafe_code)]

use std::io::{Read, Seek, Write};

use serde_json::Value;

use crate::binfile::{BinError, BinReader, BinWriter};
use crate::codec::{CodecError, CurveCodec};
use crate::curve::{CurveError, CurveId, Fr, G1Affine, G2Affine, PairingCurve};
use crate::domain::DomainError;
use crate::keypair::KeyError;
use crate::pcs::PcsError;
use crate::ptau::PtauError;
use crate::quotient::QuotientError;
use crate::r1cs::R1csError;
use crate::transcript::TranscriptError;
use crate::wtns::WtnsError;

pub const ZKEY_MAGIC: &[u8; 4] = b"zkey";
pub const ZKEY_VERSION: u32 = 1;

pub const SEC_PROTOCOL: u32 = 1;
pub const SEC_HEADER: u32 = 2;

/// Errors raised while building keys, proving or verifying.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Bin(#[from] BinError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Curve(#[from] CurveError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Quotient(#[from] QuotientError),
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
    #[error(transparent)]
    Pcs(#[from] PcsError),
    #[error(transparent)]
    R1cs(#[from] R1csError),
    #[error(transparent)]
    Wtns(#[from] WtnsError),
    #[error(transparent)]
    Ptau(#[from] PtauError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("unsupported protocol id {0}")]
    UnsupportedProtocol(u32),
    #[error("unknown protocol {0:?}")]
    UnknownProtocol(String),
    #[error("expected a {expected} key, found {found}")]
    WrongProtocol { expected: Protocol, found: Protocol },
    #[error("circuit needs a domain of 2^{power}, the scalar field supports at most 2^{max}")]
    CircuitTooBig { power: u32, max: u32 },
    #[error("circuit needs a ceremony of power {need}, the file has {have}")]
    PowerTooSmall { have: u32, need: u32 },
    #[error("expected {expected} public signals, got {got}")]
    PublicSignals { expected: usize, got: usize },
    #[error("copy constraints do not hold")]
    CopyConstraints,
    #[error("missing JSON field {0:?}")]
    MissingField(&'static str),
    #[error("malformed zkey: {0}")]
    BadZkey(String),
}

/// Proof systems a zkey can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Groth16,
    Plonk,
    Fflonk,
}

impl Protocol {
    pub fn id(self) -> u32 {
        match self {
            Self::Groth16 => 1,
            Self::Plonk => 2,
            Self::Fflonk => 10,
        }
    }

    /// Id 3 (Baby-PLONK) is reserved and rejected like any unknown id.
    pub fn from_id(id: u32) -> Result<Self, ProtocolError> {
        match id {
            1 => Ok(Self::Groth16),
            2 => Ok(Self::Plonk),
            10 => Ok(Self::Fflonk),
            other => Err(ProtocolError::UnsupportedProtocol(other)),
        }
    }

    /// Name used in JSON files and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Self::Groth16 => "groth16",
            Self::Plonk => "plonk",
            Self::Fflonk => "fflonk",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ProtocolError> {
        match name.to_ascii_lowercase().as_str() {
            "groth16" => Ok(Self::Groth16),
            "plonk" => Ok(Self::Plonk),
            "fflonk" => Ok(Self::Fflonk),
            _ => Err(ProtocolError::UnknownProtocol(name.to_string())),
        }
    }

    /// Fail unless `self` is `expected`.
    pub fn expect(self, expected: Protocol) -> Result<(), ProtocolError> {
        if self != expected {
            return Err(ProtocolError::WrongProtocol { expected, found: self });
        }
        Ok(())
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Common sections
// ============================================================================

pub fn write_protocol<W: Write + Seek>(w: &mut BinWriter<W>, p: Protocol) -> Result<(), ProtocolError> {
    w.start_section(SEC_PROTOCOL)?;
    w.write_u32(p.id())?;
    w.end_section()?;
    Ok(())
}

pub fn read_protocol<R: Read + Seek>(r: &mut BinReader<R>) -> Result<Protocol, ProtocolError> {
    r.start_read_section(SEC_PROTOCOL)?;
    let id = r.read_u32()?;
    r.end_read_section(false)?;
    Protocol::from_id(id)
}

/// Curve of a zkey, read from the `q` field of its header.
pub fn read_curve<R: Read + Seek>(r: &mut BinReader<R>) -> Result<CurveId, ProtocolError> {
    r.start_read_section(SEC_HEADER)?;
    let n8q = r.read_u32()?;
    let q = r.read_bigint(n8q as usize)?;
    r.end_read_section(true)?;
    Ok(CurveId::from_q(&q)?)
}

/// `n8q | q | n8r | r` at the start of section 2. The caller has already
/// started the section.
pub fn write_field_sizes<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
) -> Result<(), ProtocolError> {
    w.write_u32(codec.fq.n8() as u32)?;
    w.write_bigint(codec.fq.modulus(), codec.fq.n8())?;
    w.write_u32(codec.fr.n8() as u32)?;
    w.write_bigint(codec.fr.modulus(), codec.fr.n8())?;
    Ok(())
}

/// Read and check the field sizes written by [`write_field_sizes`].
pub fn read_field_sizes<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
) -> Result<(), ProtocolError> {
    let n8q = r.read_u32()? as usize;
    let q = r.read_bigint(n8q)?;
    E::check_q(&q)?;
    let n8r = r.read_u32()? as usize;
    let rr = r.read_bigint(n8r)?;
    E::check_r(&rr)?;
    if n8q != codec.fq.n8() || n8r != codec.fr.n8() {
        return Err(ProtocolError::BadZkey(format!("field sizes {n8q}/{n8r} do not match the curve")));
    }
    Ok(())
}

// ============================================================================
// Point I/O inside a started section
// ============================================================================

pub fn read_g1<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
) -> Result<G1Affine<E>, ProtocolError> {
    Ok(codec.read_g1_lem(&r.read_bytes(codec.g1_size())?)?)
}

pub fn read_g2<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
) -> Result<G2Affine<E>, ProtocolError> {
    Ok(codec.read_g2_lem(&r.read_bytes(codec.g2_size())?)?)
}

pub fn read_fr<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
) -> Result<Fr<E>, ProtocolError> {
    Ok(codec.read_fr_lem(&r.read_bytes(codec.fr_size())?)?)
}

pub fn write_g1<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
    p: &G1Affine<E>,
) -> Result<(), ProtocolError> {
    let mut buf = Vec::with_capacity(codec.g1_size());
    codec.write_g1_lem(p, &mut buf);
    Ok(w.write_bytes(&buf)?)
}

pub fn write_g2<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
    p: &G2Affine<E>,
) -> Result<(), ProtocolError> {
    let mut buf = Vec::with_capacity(codec.g2_size());
    codec.write_g2_lem(p, &mut buf);
    Ok(w.write_bytes(&buf)?)
}

pub fn write_fr<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
    x: &Fr<E>,
) -> Result<(), ProtocolError> {
    let mut buf = Vec::with_capacity(codec.fr_size());
    codec.write_fr_lem(x, &mut buf);
    Ok(w.write_bytes(&buf)?)
}

/// A whole section of LEM G1 points.
pub fn read_g1_section<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
    id: u32,
) -> Result<Vec<G1Affine<E>>, ProtocolError> {
    Ok(codec.read_g1_lem_many(&r.read_section(id)?)?)
}

/// Open a zkey from disk.
pub fn open(path: impl AsRef<std::path::Path>) -> Result<BinReader<std::io::BufReader<std::fs::File>>, ProtocolError> {
    Ok(crate::binfile::open_file(path, ZKEY_MAGIC, ZKEY_VERSION)?)
}

// ============================================================================
// JSON helpers
// ============================================================================

/// Public signals as a JSON array of decimal strings.
pub fn public_signals_to_json<E: PairingCurve>(signals: &[Fr<E>]) -> Value {
    let codec = CurveCodec::<E>::new();
    Value::Array(signals.iter().map(|s| codec.fr_to_json(s)).collect())
}

pub fn public_signals_from_json<E: PairingCurve>(v: &Value) -> Result<Vec<Fr<E>>, ProtocolError> {
    let codec = CurveCodec::<E>::new();
    let arr = v
        .as_array()
        .ok_or_else(|| CodecError::BadJson("public signals must be an array".into()))?;
    arr.iter().map(|s| codec.fr_from_json(s).map_err(ProtocolError::from)).collect()
}

/// `obj[name]`, or [`ProtocolError::MissingField`].
pub fn field<'a>(obj: &'a Value, name: &'static str) -> Result<&'a Value, ProtocolError> {
    obj.get(name).ok_or(ProtocolError::MissingField(name))
}

/// Protocol and curve named in a proof or verification-key JSON object.
pub fn json_protocol_and_curve(obj: &Value) -> Result<(Protocol, CurveId), ProtocolError> {
    let protocol = field(obj, "protocol")?
        .as_str()
        .ok_or_else(|| CodecError::BadJson("protocol must be a string".into()))?;
    let curve = field(obj, "curve")?
        .as_str()
        .ok_or_else(|| CodecError::BadJson("curve must be a string".into()))?;
    Ok((Protocol::from_name(protocol)?, CurveId::from_name(curve)?))
}

/// Fail unless a JSON object names `protocol` and the curve `E`.
pub fn check_json_header<E: PairingCurve>(obj: &Value, protocol: Protocol) -> Result<(), ProtocolError> {
    let (p, curve) = json_protocol_and_curve(obj)?;
    p.expect(protocol)?;
    if curve != E::ID {
        return Err(CurveError::Mismatch { expected: E::NAME, found: curve.name().to_string() }.into());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Small circuits shared by the protocol tests.

    use std::io::Cursor;

    use ark_ff::{Field, One, Zero};

    use crate::binfile::BinReader;
    use crate::curve::{Fr, PairingCurve};
    use crate::ptau::testutil as ptau_util;
    use crate::ptau::{PTAU_MAGIC, PTAU_VERSION};
    use crate::r1cs::{Constraint, R1cs};

    use super::{ZKEY_MAGIC, ZKEY_VERSION};

    pub type Mem = Cursor<Vec<u8>>;

    fn lc<E: PairingCurve>(terms: &[(u32, i64)]) -> Vec<(u32, Fr<E>)> {
        terms
            .iter()
            .map(|(s, v)| {
                let f = Fr::<E>::from(v.unsigned_abs());
                (*s, if *v < 0 { -f } else { f })
            })
            .collect()
    }

    /// `x·x = y` with `y` public: signals `[1, y, x]`.
    pub fn square<E: PairingCurve>() -> R1cs<E> {
        let c = Constraint { a: lc::<E>(&[(2, 1)]), b: lc::<E>(&[(2, 1)]), c: lc::<E>(&[(1, 1)]) };
        R1cs::new(3, 1, 0, vec![c])
    }

    pub fn square_witness<E: PairingCurve>(x: u64) -> Vec<Fr<E>> {
        let x = Fr::<E>::from(x);
        vec![Fr::<E>::one(), x.square(), x]
    }

    /// Signals `[1, out, a, b, c, t]` with `out`, `a` public:
    ///
    /// ```text
    /// b·(c + a)        = t
    /// t·a              = out
    /// 0·0              = a + b + c + t − 14
    /// (b + 1)·c        = t + 1
    /// ```
    pub fn mixed<E: PairingCurve>() -> R1cs<E> {
        let constraints = vec![
            Constraint { a: lc::<E>(&[(3, 1)]), b: lc::<E>(&[(4, 1), (2, 1)]), c: lc::<E>(&[(5, 1)]) },
            Constraint { a: lc::<E>(&[(5, 1)]), b: lc::<E>(&[(2, 1)]), c: lc::<E>(&[(1, 1)]) },
            Constraint { a: vec![], b: vec![], c: lc::<E>(&[(2, 1), (3, 1), (4, 1), (5, 1), (0, -14)]) },
            Constraint { a: lc::<E>(&[(3, 1), (0, 1)]), b: lc::<E>(&[(4, 1)]), c: lc::<E>(&[(5, 1), (0, 1)]) },
        ];
        R1cs::new(6, 1, 1, constraints)
    }

    pub fn mixed_witness<E: PairingCurve>() -> Vec<Fr<E>> {
        [1u64, 8, 1, 2, 3, 8].iter().map(|v| Fr::<E>::from(*v)).collect()
    }

    /// Prepared ceremony file of the given power.
    pub fn ptau<E: PairingCurve>(power: u32) -> BinReader<Mem> {
        BinReader::new(Cursor::new(ptau_util::prepared::<E>(power)), PTAU_MAGIC, PTAU_VERSION).unwrap()
    }

    pub fn zkey_reader(bytes: Vec<u8>) -> BinReader<Mem> {
        BinReader::new(Cursor::new(bytes), ZKEY_MAGIC, ZKEY_VERSION).unwrap()
    }

    /// Check every constraint of `r1cs` against a witness.
    pub fn satisfied<E: PairingCurve>(r1cs: &R1cs<E>, w: &[Fr<E>]) -> bool {
        let eval = |lc: &[(u32, Fr<E>)]| lc.iter().fold(Fr::<E>::zero(), |acc, (s, v)| acc + *v * w[*s as usize]);
        r1cs.constraints.iter().all(|c| eval(&c.a) * eval(&c.b) == eval(&c.c))
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::curve::Bn254;
    use std::io::Cursor;

    #[test]
    fn protocol_ids() {
        for p in [Protocol::Groth16, Protocol::Plonk, Protocol::Fflonk] {
            assert_eq!(Protocol::from_id(p.id()).unwrap(), p);
            assert_eq!(Protocol::from_name(p.name()).unwrap(), p);
        }
        assert!(matches!(Protocol::from_id(3), Err(ProtocolError::UnsupportedProtocol(3))));
        assert!(Protocol::from_name("babyplonk").is_err());
        assert!(matches!(
            Protocol::Plonk.expect(Protocol::Groth16),
            Err(ProtocolError::WrongProtocol { expected: Protocol::Groth16, found: Protocol::Plonk })
        ));
    }

    #[test]
    fn header_prefix_roundtrip() {
        let codec = CurveCodec::<Bn254>::new();
        let mut w = BinWriter::new(Cursor::new(Vec::new()), ZKEY_MAGIC, ZKEY_VERSION).unwrap();
        write_protocol(&mut w, Protocol::Fflonk).unwrap();
        w.start_section(SEC_HEADER).unwrap();
        write_field_sizes(&mut w, &codec).unwrap();
        w.end_section().unwrap();
        let mut r = zkey_reader(w.finish().unwrap().into_inner());
        assert_eq!(read_protocol(&mut r).unwrap(), Protocol::Fflonk);
        assert_eq!(read_curve(&mut r).unwrap(), CurveId::Bn128);
        r.start_read_section(SEC_HEADER).unwrap();
        read_field_sizes(&mut r, &codec).unwrap();
        r.end_read_section(false).unwrap();

        r.start_read_section(SEC_HEADER).unwrap();
        assert!(read_field_sizes(&mut r, &CurveCodec::<crate::curve::Bls12_381>::new()).is_err());
    }

    #[test]
    fn test_circuits_are_satisfied() {
        assert!(satisfied(&square::<Bn254>(), &square_witness::<Bn254>(3)));
        assert!(!satisfied(&square::<Bn254>(), &[Fr::<Bn254>::from(1u64), 10u64.into(), 3u64.into()]));
        assert!(satisfied(&mixed::<Bn254>(), &mixed_witness::<Bn254>()));
    }

    #[test]
    fn public_signals_json() {
        let s = vec![Fr::<Bn254>::from(9u64), Fr::<Bn254>::from(0u64)];
        let v = public_signals_to_json::<Bn254>(&s);
        assert_eq!(v, serde_json::json!(["9", "0"]));
        assert_eq!(public_signals_from_json::<Bn254>(&v).unwrap(), s);
        assert!(public_signals_from_json::<Bn254>(&serde_json::json!("9")).is_err());
    }
}
