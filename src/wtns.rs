//! Witness files (`.wtns`)
//!
//! Section 1 carries `u32 n8 | prime[n8] | u32 nWitness`; section 2 the
//! values as canonical little-endian integers, signal 0 (the constant one)
//! first.

#![forbid(unsafe_code)]

use std::io::{Read, Seek, Write};

use ark_ff::One;

use crate::binfile::{BinError, BinReader, BinWriter};
use crate::codec::{CodecError, FieldCodec};
use crate::curve::{CurveError, CurveId, Fr, PairingCurve};

pub const WTNS_MAGIC: &[u8; 4] = b"wtns";
pub const WTNS_VERSION: u32 = 2;

/// Errors raised while reading or writing witnesses.
#[derive(Debug, thiserror::Error)]
pub enum WtnsError {
    #[error(transparent)]
    Bin(#[from] BinError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Curve(#[from] CurveError),
    #[error("witness has {got} values, expected {expected}")]
    Length { expected: usize, got: usize },
    #[error("witness signal 0 must be 1")]
    NotOne,
}

/// Identify the curve a witness file belongs to.
pub fn read_curve<R: Read + Seek>(r: &mut BinReader<R>) -> Result<CurveId, WtnsError> {
    r.start_read_section(1)?;
    let n8 = r.read_u32()?;
    let prime = r.read_bigint(n8 as usize)?;
    r.end_read_section(true)?;
    Ok(CurveId::from_r(&prime)?)
}

/// Read all witness values.
pub fn read<E: PairingCurve, R: Read + Seek>(r: &mut BinReader<R>) -> Result<Vec<Fr<E>>, WtnsError> {
    let fr = FieldCodec::<Fr<E>>::new();
    r.start_read_section(1)?;
    let n8 = r.read_u32()? as usize;
    let prime = r.read_bigint(n8)?;
    let n = r.read_u32()? as usize;
    r.end_read_section(false)?;
    E::check_r(&prime)?;
    if n8 != fr.n8() {
        return Err(CodecError::BadLength { expected: fr.n8(), got: n8 }.into());
    }
    let data = r.read_section(2)?;
    if data.len() != n * n8 {
        return Err(WtnsError::Length { expected: n, got: data.len() / n8 });
    }
    data.chunks(n8).map(|c| fr.read_le(c).map_err(WtnsError::from)).collect()
}

/// Write witness values.
pub fn write<E: PairingCurve, W: Write + Seek>(w: W, values: &[Fr<E>]) -> Result<W, WtnsError> {
    let fr = FieldCodec::<Fr<E>>::new();
    let mut w = BinWriter::new(w, WTNS_MAGIC, WTNS_VERSION)?;
    w.start_section(1)?;
    w.write_u32(fr.n8() as u32)?;
    w.write_bigint(fr.modulus(), fr.n8())?;
    w.write_u32(values.len() as u32)?;
    w.end_section()?;
    let mut buf = Vec::with_capacity(values.len() * fr.n8());
    for v in values {
        fr.write_le(v, &mut buf);
    }
    w.write_section(2, &buf)?;
    Ok(w.finish()?)
}

/// Check a witness against the expected signal count.
pub fn check<E: PairingCurve>(values: &[Fr<E>], n_vars: usize) -> Result<(), WtnsError> {
    if values.len() != n_vars {
        return Err(WtnsError::Length { expected: n_vars, got: values.len() });
    }
    if !values.first().map_or(false, |v| v.is_one()) {
        return Err(WtnsError::NotOne);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Bn254;
    use ark_bn254::Fr as F;
    use std::io::Cursor;

    #[test]
    fn roundtrip_and_checks() {
        let values = vec![F::one(), F::from(9u64), F::from(3u64)];
        let bytes = write::<Bn254, _>(Cursor::new(Vec::new()), &values).unwrap().into_inner();
        let mut r = BinReader::new(Cursor::new(bytes), WTNS_MAGIC, WTNS_VERSION).unwrap();
        assert_eq!(read_curve(&mut r).unwrap(), CurveId::Bn128);
        let back = read::<Bn254, _>(&mut r).unwrap();
        assert_eq!(back, values);
        assert!(check::<Bn254>(&back, 3).is_ok());
        assert!(matches!(check::<Bn254>(&back, 4), Err(WtnsError::Length { expected: 4, got: 3 })));
        assert!(matches!(check::<Bn254>(&back[1..], 2), Err(WtnsError::NotOne)));
    }
}
