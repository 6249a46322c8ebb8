//! Rank-1 constraint systems (`.r1cs`)
//!
//! ```text
//! section 1  header: u32 n8 | prime[n8] | u32 nWires | u32 nPubOut |
//!                    u32 nPubIn | u32 nPrvIn | u64 nLabels | u32 nConstraints
//! section 2  constraints: (A, B, C) linear combinations, each
//!            u32 nTerms | { u32 signal | value[n8] }*
//! section 3  wire → label map: u64 per wire
//! ```
//!
//! Values are canonical little-endian integers. Signal 0 is the constant
//! one; public signals (outputs, then public inputs) follow it.

#![forbid(unsafe_code)]

use std::io::{Read, Seek, Write};

use num_bigint::BigUint;

use crate::binfile::{BinError, BinReader, BinWriter};
use crate::codec::{CodecError, FieldCodec};
use crate::curve::{CurveError, CurveId, Fr, PairingCurve};

pub const R1CS_MAGIC: &[u8; 4] = b"r1cs";
pub const R1CS_VERSION: u32 = 1;

const SEC_HEADER: u32 = 1;
const SEC_CONSTRAINTS: u32 = 2;
const SEC_WIRE2LABEL: u32 = 3;

/// Errors raised while reading or writing constraint systems.
#[derive(Debug, thiserror::Error)]
pub enum R1csError {
    #[error(transparent)]
    Bin(#[from] BinError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Curve(#[from] CurveError),
    #[error("signal {signal} out of range (nVars = {n_vars})")]
    SignalOutOfRange { signal: u32, n_vars: u32 },
}

/// Header counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct R1csHeader {
    pub n8: u32,
    pub prime: BigUint,
    pub n_vars: u32,
    pub n_outputs: u32,
    pub n_pub_inputs: u32,
    pub n_prv_inputs: u32,
    pub n_labels: u64,
    pub n_constraints: u32,
}

impl R1csHeader {
    /// Public signals: outputs followed by public inputs.
    pub fn n_public(&self) -> u32 {
        self.n_outputs + self.n_pub_inputs
    }

    pub fn curve(&self) -> Result<CurveId, CurveError> {
        CurveId::from_r(&self.prime)
    }
}

/// `Σ coeff·signal`.
pub type LinearCombination<F> = Vec<(u32, F)>;

/// `A · B = C`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraint<F> {
    pub a: LinearCombination<F>,
    pub b: LinearCombination<F>,
    pub c: LinearCombination<F>,
}

/// A complete constraint system.
#[derive(Clone, Debug)]
pub struct R1cs<E: PairingCurve> {
    pub header: R1csHeader,
    pub constraints: Vec<Constraint<Fr<E>>>,
    pub wire_to_label: Vec<u64>,
}

/// Read only the header (used to pick the curve before a typed read).
pub fn read_header<R: Read + Seek>(r: &mut BinReader<R>) -> Result<R1csHeader, R1csError> {
    r.start_read_section(SEC_HEADER)?;
    let n8 = r.read_u32()?;
    let prime = r.read_bigint(n8 as usize)?;
    let header = R1csHeader {
        n8,
        prime,
        n_vars: r.read_u32()?,
        n_outputs: r.read_u32()?,
        n_pub_inputs: r.read_u32()?,
        n_prv_inputs: r.read_u32()?,
        n_labels: r.read_u64()?,
        n_constraints: r.read_u32()?,
    };
    r.end_read_section(false)?;
    Ok(header)
}

impl<E: PairingCurve> R1cs<E> {
    pub fn read<R: Read + Seek>(r: &mut BinReader<R>) -> Result<Self, R1csError> {
        let header = read_header(r)?;
        E::check_r(&header.prime)?;
        let fr = FieldCodec::<Fr<E>>::new();
        if header.n8 as usize != fr.n8() {
            return Err(CodecError::BadLength { expected: fr.n8(), got: header.n8 as usize }.into());
        }

        r.start_read_section(SEC_CONSTRAINTS)?;
        let mut constraints = Vec::with_capacity(header.n_constraints as usize);
        for _ in 0..header.n_constraints {
            let a = read_lc(r, &fr, header.n_vars)?;
            let b = read_lc(r, &fr, header.n_vars)?;
            let c = read_lc(r, &fr, header.n_vars)?;
            constraints.push(Constraint { a, b, c });
        }
        r.end_read_section(false)?;

        let mut wire_to_label = Vec::new();
        if r.has_section(SEC_WIRE2LABEL) {
            r.start_read_section(SEC_WIRE2LABEL)?;
            for _ in 0..header.n_vars {
                wire_to_label.push(r.read_u64()?);
            }
            r.end_read_section(false)?;
        }
        Ok(Self { header, constraints, wire_to_label })
    }

    /// Build a system from constraints; header counts are derived.
    pub fn new(n_vars: u32, n_outputs: u32, n_pub_inputs: u32, constraints: Vec<Constraint<Fr<E>>>) -> Self {
        let fr = FieldCodec::<Fr<E>>::new();
        let n_public = n_outputs + n_pub_inputs;
        let header = R1csHeader {
            n8: fr.n8() as u32,
            prime: fr.modulus().clone(),
            n_vars,
            n_outputs,
            n_pub_inputs,
            n_prv_inputs: n_vars.saturating_sub(1 + n_public),
            n_labels: n_vars as u64,
            n_constraints: constraints.len() as u32,
        };
        Self { header, constraints, wire_to_label: (0..n_vars as u64).collect() }
    }

    pub fn n_public(&self) -> usize {
        self.header.n_public() as usize
    }

    pub fn n_vars(&self) -> usize {
        self.header.n_vars as usize
    }

    pub fn write<W: Write + Seek>(&self, w: W) -> Result<W, R1csError> {
        let fr = FieldCodec::<Fr<E>>::new();
        let mut w = BinWriter::new(w, R1CS_MAGIC, R1CS_VERSION)?;
        let h = &self.header;
        w.start_section(SEC_HEADER)?;
        w.write_u32(h.n8)?;
        w.write_bigint(&h.prime, h.n8 as usize)?;
        w.write_u32(h.n_vars)?;
        w.write_u32(h.n_outputs)?;
        w.write_u32(h.n_pub_inputs)?;
        w.write_u32(h.n_prv_inputs)?;
        w.write_u64(h.n_labels)?;
        w.write_u32(h.n_constraints)?;
        w.end_section()?;

        w.start_section(SEC_CONSTRAINTS)?;
        let mut buf = Vec::new();
        for c in &self.constraints {
            for lc in [&c.a, &c.b, &c.c] {
                buf.clear();
                buf.extend_from_slice(&(lc.len() as u32).to_le_bytes());
                for (s, v) in lc {
                    buf.extend_from_slice(&s.to_le_bytes());
                    fr.write_le(v, &mut buf);
                }
                w.write_bytes(&buf)?;
            }
        }
        w.end_section()?;

        w.start_section(SEC_WIRE2LABEL)?;
        for l in &self.wire_to_label {
            w.write_u64(*l)?;
        }
        w.end_section()?;
        Ok(w.finish()?)
    }
}

fn read_lc<R: Read + Seek, F: ark_ff::PrimeField>(
    r: &mut BinReader<R>,
    fr: &FieldCodec<F>,
    n_vars: u32,
) -> Result<LinearCombination<F>, R1csError> {
    let n = r.read_u32()?;
    let mut lc = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let signal = r.read_u32()?;
        if signal >= n_vars {
            return Err(R1csError::SignalOutOfRange { signal, n_vars });
        }
        let v = fr.read_le(&r.read_bytes(fr.n8())?)?;
        lc.push((signal, v));
    }
    Ok(lc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Bn254;
    use ark_bn254::Fr as F;
    use ark_ff::One;
    use std::io::Cursor;

    #[test]
    fn write_then_read() {
        let c = Constraint { a: vec![(2, F::one())], b: vec![(2, F::one())], c: vec![(1, F::from(5u64))] };
        let sys = R1cs::<Bn254>::new(3, 1, 0, vec![c.clone()]);
        let bytes = sys.write(Cursor::new(Vec::new())).unwrap().into_inner();
        let mut r = BinReader::new(Cursor::new(bytes), R1CS_MAGIC, R1CS_VERSION).unwrap();
        let back = R1cs::<Bn254>::read(&mut r).unwrap();
        assert_eq!(back.header, sys.header);
        assert_eq!(back.constraints, vec![c]);
        assert_eq!(back.n_public(), 1);
        assert_eq!(back.header.curve().unwrap(), CurveId::Bn128);
    }

    #[test]
    fn rejects_out_of_range_signals() {
        let c = Constraint { a: vec![(7, F::one())], b: vec![], c: vec![] };
        let sys = R1cs::<Bn254>::new(3, 1, 0, vec![c]);
        let bytes = sys.write(Cursor::new(Vec::new())).unwrap().into_inner();
        let mut r = BinReader::new(Cursor::new(bytes), R1CS_MAGIC, R1CS_VERSION).unwrap();
        assert!(matches!(R1cs::<Bn254>::read(&mut r), Err(R1csError::SignalOutOfRange { signal: 7, .. })));
    }

    #[test]
    fn curve_mismatch_is_reported() {
        let sys = R1cs::<Bn254>::new(2, 1, 0, vec![]);
        let bytes = sys.write(Cursor::new(Vec::new())).unwrap().into_inner();
        let mut r = BinReader::new(Cursor::new(bytes), R1CS_MAGIC, R1CS_VERSION).unwrap();
        assert!(matches!(
            R1cs::<crate::curve::Bls12_381>::read(&mut r),
            Err(R1csError::Curve(CurveError::Mismatch { .. }))
        ));
    }
}
