//! Field and point encodings used on disk, in hashes and in JSON
//!
//! Three representations matter and every I/O boundary picks one explicitly:
//!
//! - **LEM** (little-endian Montgomery): `x·R mod p` as `n8` little-endian
//!   bytes with `R = 2^(8·n8)`. Every point and scalar stored in ptau/zkey
//!   sections uses it. Points are `x ‖ y`, `Fq2` coordinates `c0 ‖ c1`, and
//!   the identity is all zero bytes (no supported curve contains `(0, 0)`).
//! - **Uncompressed** (big-endian canonical): `x ‖ y`, `Fq2` as `c1 ‖ c0`,
//!   identity flagged by `0x40` in the first byte. This is the byte stream
//!   that is hashed (ceremony challenges, csHash, Keccak transcripts) and the
//!   payload of challenge/response files.
//! - **Canonical LE**: plain little-endian integers, used by `.wtns`/`.r1cs`.
//!
//! JSON uses decimal strings in projective-style triples.

#![forbid(unsafe_code)]

use std::marker::PhantomData;

use ark_ec::{short_weierstrass::Affine, AffineRepr};
use ark_ff::{BigInteger, Field, One, PrimeField, Zero};
use num_bigint::BigUint;
use serde_json::{json, Value};

use crate::curve::{modulus_of, Fr, G1Affine, G2Affine, PairingCurve};

/// Errors produced while decoding fields and points.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("expected {expected} bytes, got {got}")]
    BadLength { expected: usize, got: usize },
    #[error("field element is not reduced modulo the field prime")]
    NotCanonical,
    #[error("point is not on the curve")]
    NotOnCurve,
    #[error("point is not in the prime-order subgroup")]
    NotInSubgroup,
    #[error("bad decimal string `{0}`")]
    BadDecimal(String),
    #[error("malformed JSON point: {0}")]
    BadJson(String),
}

/// Byte-level codec for one prime field.
#[derive(Clone, Debug)]
pub struct FieldCodec<F: PrimeField> {
    n8: usize,
    r: F,
    r_inv: F,
    modulus: BigUint,
}

impl<F: PrimeField> Default for FieldCodec<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: PrimeField> FieldCodec<F> {
    pub fn new() -> Self {
        let n8 = ((F::MODULUS_BIT_SIZE as usize + 63) / 64) * 8;
        let mut two_pow = vec![0u8; n8 + 1];
        two_pow[n8] = 1;
        let r = F::from_le_bytes_mod_order(&two_pow);
        let modulus = modulus_of::<F>();
        // r^(p-2) = r^-1
        let r_inv = r.pow((&modulus - 2u32).to_u64_digits());
        Self { n8, r, r_inv, modulus }
    }

    /// Bytes per element.
    #[inline]
    pub fn n8(&self) -> usize {
        self.n8
    }

    /// Field prime.
    #[inline]
    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    pub fn write_le(&self, x: &F, out: &mut Vec<u8>) {
        out.extend_from_slice(&x.into_bigint().to_bytes_le());
    }

    pub fn write_be(&self, x: &F, out: &mut Vec<u8>) {
        out.extend_from_slice(&x.into_bigint().to_bytes_be());
    }

    pub fn write_lem(&self, x: &F, out: &mut Vec<u8>) {
        self.write_le(&(*x * self.r), out);
    }

    /// Decode canonical little-endian bytes, rejecting values `>= p`.
    pub fn read_le(&self, bytes: &[u8]) -> Result<F, CodecError> {
        self.check_len(bytes)?;
        if BigUint::from_bytes_le(bytes) >= self.modulus {
            return Err(CodecError::NotCanonical);
        }
        Ok(F::from_le_bytes_mod_order(bytes))
    }

    pub fn read_be(&self, bytes: &[u8]) -> Result<F, CodecError> {
        self.check_len(bytes)?;
        if BigUint::from_bytes_be(bytes) >= self.modulus {
            return Err(CodecError::NotCanonical);
        }
        Ok(F::from_be_bytes_mod_order(bytes))
    }

    pub fn read_lem(&self, bytes: &[u8]) -> Result<F, CodecError> {
        Ok(self.read_le(bytes)? * self.r_inv)
    }

    pub fn to_biguint(&self, x: &F) -> BigUint {
        BigUint::from_bytes_le(&x.into_bigint().to_bytes_le())
    }

    pub fn from_biguint(&self, v: &BigUint) -> Result<F, CodecError> {
        if *v >= self.modulus {
            return Err(CodecError::NotCanonical);
        }
        Ok(F::from_le_bytes_mod_order(&v.to_bytes_le()))
    }

    pub fn to_decimal(&self, x: &F) -> String {
        self.to_biguint(x).to_str_radix(10)
    }

    pub fn from_decimal(&self, s: &str) -> Result<F, CodecError> {
        let v = BigUint::parse_bytes(s.trim().as_bytes(), 10)
            .ok_or_else(|| CodecError::BadDecimal(s.to_string()))?;
        self.from_biguint(&v)
    }

    #[inline]
    fn check_len(&self, bytes: &[u8]) -> Result<(), CodecError> {
        if bytes.len() != self.n8 {
            return Err(CodecError::BadLength { expected: self.n8, got: bytes.len() });
        }
        Ok(())
    }
}

/// Point and scalar codec for a pairing curve.
#[derive(Clone, Debug)]
pub struct CurveCodec<E: PairingCurve> {
    /// Base-field codec.
    pub fq: FieldCodec<E::Fq>,
    /// Scalar-field codec.
    pub fr: FieldCodec<Fr<E>>,
    _e: PhantomData<E>,
}

impl<E: PairingCurve> Default for CurveCodec<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PairingCurve> CurveCodec<E> {
    pub fn new() -> Self {
        Self { fq: FieldCodec::new(), fr: FieldCodec::new(), _e: PhantomData }
    }

    /// Bytes of a G1 point (LEM or uncompressed).
    #[inline]
    pub fn g1_size(&self) -> usize {
        2 * self.fq.n8()
    }
    /// Bytes of a G2 point (LEM or uncompressed).
    #[inline]
    pub fn g2_size(&self) -> usize {
        4 * self.fq.n8()
    }
    /// Bytes of a scalar.
    #[inline]
    pub fn fr_size(&self) -> usize {
        self.fr.n8()
    }

    // ------------------------------ LEM ------------------------------

    pub fn write_g1_lem(&self, p: &G1Affine<E>, out: &mut Vec<u8>) {
        match p.xy() {
            None => out.resize(out.len() + self.g1_size(), 0),
            Some((x, y)) => {
                self.fq.write_lem(x, out);
                self.fq.write_lem(y, out);
            }
        }
    }

    pub fn write_g2_lem(&self, p: &G2Affine<E>, out: &mut Vec<u8>) {
        match p.xy() {
            None => out.resize(out.len() + self.g2_size(), 0),
            Some((x, y)) => {
                for c in x.to_base_prime_field_elements().chain(y.to_base_prime_field_elements()) {
                    self.fq.write_lem(&c, out);
                }
            }
        }
    }

    pub fn read_g1_lem(&self, b: &[u8]) -> Result<G1Affine<E>, CodecError> {
        expect_len(b, self.g1_size())?;
        if b.iter().all(|x| *x == 0) {
            return Ok(Affine::identity());
        }
        let n8 = self.fq.n8();
        let x = self.fq.read_lem(&b[..n8])?;
        let y = self.fq.read_lem(&b[n8..])?;
        on_curve(Affine::new_unchecked(x, y))
    }

    pub fn read_g2_lem(&self, b: &[u8]) -> Result<G2Affine<E>, CodecError> {
        in_subgroup(self.read_g2_lem_trusted(b)?)
    }

    /// On-curve check only. For points this process wrote itself.
    pub(crate) fn read_g2_lem_trusted(&self, b: &[u8]) -> Result<G2Affine<E>, CodecError> {
        expect_len(b, self.g2_size())?;
        if b.iter().all(|x| *x == 0) {
            return Ok(Affine::identity());
        }
        let n8 = self.fq.n8();
        let mut c = Vec::with_capacity(4);
        for chunk in b.chunks(n8) {
            c.push(self.fq.read_lem(chunk)?);
        }
        let x = fq2::<E>(&c[0..2])?;
        let y = fq2::<E>(&c[2..4])?;
        on_curve(Affine::new_unchecked(x, y))
    }

    pub fn write_fr_lem(&self, x: &Fr<E>, out: &mut Vec<u8>) {
        self.fr.write_lem(x, out)
    }

    pub fn read_fr_lem(&self, b: &[u8]) -> Result<Fr<E>, CodecError> {
        self.fr.read_lem(b)
    }

    /// Decode a run of concatenated G1 LEM points.
    pub fn read_g1_lem_many(&self, b: &[u8]) -> Result<Vec<G1Affine<E>>, CodecError> {
        expect_multiple(b, self.g1_size())?;
        b.chunks(self.g1_size()).map(|c| self.read_g1_lem(c)).collect()
    }

    /// Decode a run of concatenated G2 LEM points.
    pub fn read_g2_lem_many(&self, b: &[u8]) -> Result<Vec<G2Affine<E>>, CodecError> {
        expect_multiple(b, self.g2_size())?;
        b.chunks(self.g2_size()).map(|c| self.read_g2_lem(c)).collect()
    }

    /// Decode a run of concatenated LEM scalars.
    pub fn read_fr_lem_many(&self, b: &[u8]) -> Result<Vec<Fr<E>>, CodecError> {
        expect_multiple(b, self.fr_size())?;
        b.chunks(self.fr_size()).map(|c| self.fr.read_lem(c)).collect()
    }

    // -------------------------- Uncompressed --------------------------

    pub fn write_g1_uncompressed(&self, p: &G1Affine<E>, out: &mut Vec<u8>) {
        match p.xy() {
            None => push_infinity(out, self.g1_size()),
            Some((x, y)) => {
                self.fq.write_be(x, out);
                self.fq.write_be(y, out);
            }
        }
    }

    pub fn write_g2_uncompressed(&self, p: &G2Affine<E>, out: &mut Vec<u8>) {
        match p.xy() {
            None => push_infinity(out, self.g2_size()),
            Some((x, y)) => {
                for coord in [x, y] {
                    let mut c: Vec<E::Fq> = coord.to_base_prime_field_elements().collect();
                    c.reverse();
                    for e in &c {
                        self.fq.write_be(e, out);
                    }
                }
            }
        }
    }

    pub fn read_g1_uncompressed(&self, b: &[u8]) -> Result<G1Affine<E>, CodecError> {
        expect_len(b, self.g1_size())?;
        if b[0] & 0x40 != 0 {
            return Ok(Affine::identity());
        }
        let n8 = self.fq.n8();
        let x = self.fq.read_be(&b[..n8])?;
        let y = self.fq.read_be(&b[n8..])?;
        on_curve(Affine::new_unchecked(x, y))
    }

    pub fn read_g2_uncompressed(&self, b: &[u8]) -> Result<G2Affine<E>, CodecError> {
        expect_len(b, self.g2_size())?;
        if b[0] & 0x40 != 0 {
            return Ok(Affine::identity());
        }
        let n8 = self.fq.n8();
        let mut c = Vec::with_capacity(4);
        for chunk in b.chunks(n8) {
            c.push(self.fq.read_be(chunk)?);
        }
        let x = fq2::<E>(&[c[1], c[0]])?;
        let y = fq2::<E>(&[c[3], c[2]])?;
        in_subgroup(on_curve(Affine::new_unchecked(x, y))?)
    }

    pub fn g1_uncompressed(&self, p: &G1Affine<E>) -> Vec<u8> {
        let mut v = Vec::with_capacity(self.g1_size());
        self.write_g1_uncompressed(p, &mut v);
        v
    }

    pub fn g2_uncompressed(&self, p: &G2Affine<E>) -> Vec<u8> {
        let mut v = Vec::with_capacity(self.g2_size());
        self.write_g2_uncompressed(p, &mut v);
        v
    }

    // ------------------------------ JSON ------------------------------

    pub fn g1_to_json(&self, p: &G1Affine<E>) -> Value {
        match p.xy() {
            None => json!(["0", "1", "0"]),
            Some((x, y)) => json!([self.fq.to_decimal(x), self.fq.to_decimal(y), "1"]),
        }
    }

    pub fn g2_to_json(&self, p: &G2Affine<E>) -> Value {
        match p.xy() {
            None => json!([["0", "0"], ["1", "0"], ["0", "0"]]),
            Some((x, y)) => {
                let dec = |c: &E::Fq2| -> Vec<String> {
                    c.to_base_prime_field_elements().map(|e| self.fq.to_decimal(&e)).collect()
                };
                json!([dec(x), dec(y), ["1", "0"]])
            }
        }
    }

    pub fn fr_to_json(&self, x: &Fr<E>) -> Value {
        Value::String(self.fr.to_decimal(x))
    }

    /// Parse a G1 point and check subgroup membership.
    pub fn g1_from_json(&self, v: &Value) -> Result<G1Affine<E>, CodecError> {
        let c = json_strings(v, 3)?;
        let z = self.fq.from_decimal(&c[2])?;
        if z.is_zero() {
            return Ok(Affine::identity());
        }
        if !z.is_one() {
            return Err(CodecError::BadJson("G1 z coordinate must be 0 or 1".into()));
        }
        let p = Affine::new_unchecked(self.fq.from_decimal(&c[0])?, self.fq.from_decimal(&c[1])?);
        in_subgroup(on_curve(p)?)
    }

    /// Parse a G2 point and check subgroup membership.
    pub fn g2_from_json(&self, v: &Value) -> Result<G2Affine<E>, CodecError> {
        let arr = v
            .as_array()
            .filter(|a| a.len() == 3)
            .ok_or_else(|| CodecError::BadJson("G2 point must be a 3-element array".into()))?;
        let mut coords = Vec::with_capacity(3);
        for c in arr {
            let s = json_strings(c, 2)?;
            coords.push(fq2::<E>(&[self.fq.from_decimal(&s[0])?, self.fq.from_decimal(&s[1])?])?);
        }
        if coords[2].is_zero() {
            return Ok(Affine::identity());
        }
        if !coords[2].is_one() {
            return Err(CodecError::BadJson("G2 z coordinate must be 0 or 1".into()));
        }
        in_subgroup(on_curve(Affine::new_unchecked(coords[0], coords[1]))?)
    }

    pub fn fr_from_json(&self, v: &Value) -> Result<Fr<E>, CodecError> {
        let s = v.as_str().ok_or_else(|| CodecError::BadJson("scalar must be a string".into()))?;
        self.fr.from_decimal(s)
    }
}

fn json_strings(v: &Value, len: usize) -> Result<Vec<String>, CodecError> {
    let arr = v
        .as_array()
        .filter(|a| a.len() == len)
        .ok_or_else(|| CodecError::BadJson(format!("expected an array of {len} strings")))?;
    arr.iter()
        .map(|x| {
            x.as_str()
                .map(str::to_string)
                .ok_or_else(|| CodecError::BadJson("coordinate must be a string".into()))
        })
        .collect()
}

fn fq2<E: PairingCurve>(c: &[E::Fq]) -> Result<E::Fq2, CodecError> {
    E::Fq2::from_base_prime_field_elems(c).ok_or(CodecError::BadLength { expected: 2, got: c.len() })
}

fn on_curve<P: ark_ec::short_weierstrass::SWCurveConfig>(p: Affine<P>) -> Result<Affine<P>, CodecError> {
    if p.is_on_curve() {
        Ok(p)
    } else {
        Err(CodecError::NotOnCurve)
    }
}

fn in_subgroup<P: ark_ec::short_weierstrass::SWCurveConfig>(p: Affine<P>) -> Result<Affine<P>, CodecError> {
    if p.is_in_correct_subgroup_assuming_on_curve() {
        Ok(p)
    } else {
        Err(CodecError::NotInSubgroup)
    }
}

fn push_infinity(out: &mut Vec<u8>, size: usize) {
    let start = out.len();
    out.resize(start + size, 0);
    out[start] = 0x40;
}

fn expect_len(b: &[u8], n: usize) -> Result<(), CodecError> {
    if b.len() != n {
        return Err(CodecError::BadLength { expected: n, got: b.len() });
    }
    Ok(())
}

fn expect_multiple(b: &[u8], n: usize) -> Result<(), CodecError> {
    if b.len() % n != 0 {
        return Err(CodecError::BadLength { expected: (b.len() / n + 1) * n, got: b.len() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{Bls12_381, Bn254, G1Projective, G2Projective};
    use ark_ec::{CurveGroup, Group};
    use ark_ff::UniformRand;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn lem_is_montgomery_scaled() {
        let c = FieldCodec::<ark_bn254::Fr>::new();
        assert_eq!(c.n8(), 32);
        let mut one = Vec::new();
        c.write_lem(&ark_bn254::Fr::one(), &mut one);
        // LEM(1) = R mod r, which is not 1.
        assert_ne!(one[0], 1);
        assert_eq!(c.read_lem(&one).unwrap(), ark_bn254::Fr::one());
        assert_eq!(FieldCodec::<ark_bls12_381::Fq>::new().n8(), 48);
    }

    #[test]
    fn rejects_unreduced_values() {
        let c = FieldCodec::<ark_bn254::Fq>::new();
        let bytes = vec![0xffu8; 32];
        assert!(matches!(c.read_le(&bytes), Err(CodecError::NotCanonical)));
        assert!(matches!(c.read_le(&bytes[..31]), Err(CodecError::BadLength { .. })));
    }

    fn points_roundtrip<E: PairingCurve>() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let codec = CurveCodec::<E>::new();
        let p1 = G1Projective::<E>::rand(&mut rng).into_affine();
        let p2 = G2Projective::<E>::rand(&mut rng).into_affine();

        let mut buf = Vec::new();
        codec.write_g1_lem(&p1, &mut buf);
        codec.write_g2_lem(&p2, &mut buf);
        codec.write_g1_lem(&G1Affine::<E>::identity(), &mut buf);
        assert_eq!(buf.len(), 2 * codec.g1_size() + codec.g2_size());
        let g1s = codec.g1_size();
        assert_eq!(codec.read_g1_lem(&buf[..g1s]).unwrap(), p1);
        assert_eq!(codec.read_g2_lem(&buf[g1s..g1s + codec.g2_size()]).unwrap(), p2);
        assert!(codec.read_g1_lem(&buf[g1s + codec.g2_size()..]).unwrap().is_zero());

        let u = codec.g2_uncompressed(&p2);
        assert_eq!(codec.read_g2_uncompressed(&u).unwrap(), p2);
        let inf = codec.g1_uncompressed(&G1Affine::<E>::identity());
        assert_eq!(inf[0], 0x40);
        assert!(codec.read_g1_uncompressed(&inf).unwrap().is_zero());

        assert_eq!(codec.g1_from_json(&codec.g1_to_json(&p1)).unwrap(), p1);
        assert_eq!(codec.g2_from_json(&codec.g2_to_json(&p2)).unwrap(), p2);
    }

    #[test]
    fn bn254_points() {
        points_roundtrip::<Bn254>();
    }

    #[test]
    fn bls12_381_points() {
        points_roundtrip::<Bls12_381>();
    }

    #[test]
    fn uncompressed_generator_is_big_endian() {
        let codec = CurveCodec::<Bn254>::new();
        let g = G1Projective::<Bn254>::generator().into_affine();
        let u = codec.g1_uncompressed(&g);
        // BN254 G1 generator is (1, 2).
        assert_eq!(u[31], 1);
        assert_eq!(u[63], 2);
        assert!(u[..31].iter().all(|b| *b == 0));
    }

    #[test]
    fn off_curve_point_is_rejected() {
        let codec = CurveCodec::<Bn254>::new();
        let mut buf = Vec::new();
        codec.fq.write_lem(&ark_bn254::Fq::from(1u64), &mut buf);
        codec.fq.write_lem(&ark_bn254::Fq::from(3u64), &mut buf);
        assert!(matches!(codec.read_g1_lem(&buf), Err(CodecError::NotOnCurve)));
    }

    #[test]
    fn g2_point_outside_subgroup_is_rejected() {
        // BN254 G2 has a large cofactor: the first curve point over a small x is not in the r-torsion.
        let p = (1u64..)
            .filter_map(|i| G2Affine::<Bn254>::get_point_from_x_unchecked(ark_bn254::Fq2::from(i), false))
            .find(|p| !p.is_in_correct_subgroup_assuming_on_curve())
            .unwrap();
        assert!(p.is_on_curve());
        let codec = CurveCodec::<Bn254>::new();
        let mut lem = Vec::new();
        codec.write_g2_lem(&p, &mut lem);
        assert!(matches!(codec.read_g2_lem(&lem), Err(CodecError::NotInSubgroup)));
        assert!(matches!(codec.read_g2_lem_many(&lem), Err(CodecError::NotInSubgroup)));
        assert!(matches!(codec.read_g2_uncompressed(&codec.g2_uncompressed(&p)), Err(CodecError::NotInSubgroup)));
    }
}
