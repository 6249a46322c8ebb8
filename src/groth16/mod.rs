//! Groth16 proving keys, proofs and verification keys
//!
//! # zkey layout
//!
//! ```text
//! 1   protocol     u32 1
//! 2   header       n8q | q | n8r | r | u32 nVars | u32 nPublic |
//!                  u32 domainSize | α₁ | β₁ | β₂ | γ₂ | δ₁ | δ₂
//! 3   IC           nPublic + 1 G1 points
//! 4   coefficients u32 n | { u32 matrix | u32 constraint | u32 signal | Fr }*
//! 5   A            nVars G1
//! 6   B1           nVars G1
//! 7   B2           nVars G2
//! 8   C            nVars − nPublic − 1 G1 (private signals)
//! 9   H            domainSize G1
//! 10  MPC          csHash[64] | u32 n | contribution*
//! ```
//!
//! Section 4 only lists the `A` (matrix 0) and `B` (matrix 1) entries plus
//! one identity row per public signal; the prover recovers `C` on the domain
//! as the pointwise product `A·B`.
//!
//! `csHash` is the Blake2b-512 digest of the six header points followed by
//! sections 3 and 5–9, all in uncompressed form. It identifies the circuit
//! and the ceremony it was built from and is fixed across phase-2
//! contributions, which only rewrite `δ`, `C` and `H`.
//!
//! # H basis
//!
//! Below the field's 2-adicity, `H_i = [L'_{2i+1}(τ)]₁` over the domain of
//! size `2·domainSize` and the prover evaluates `A·B − C` on its odd
//! points. A circuit that uses the largest domain the field supports has no
//! such domain available; its key stores `H_i = [τ^i·Z_H(τ)]₁` instead and
//! the prover computes the coefficients of `(A·B − C)/Z_H` on a coset.

#![forbid(unsafe_code)]

pub mod mpc;
pub mod prover;
pub mod setup;
pub mod verifier;

use std::io::{Read, Seek, Write};

use ark_ff::FftField;
use serde_json::{json, Value};

use crate::binfile::{BinReader, BinWriter};
use crate::codec::CurveCodec;
use crate::curve::{Fr, G1Affine, G2Affine, PairingCurve};
use crate::zkey::{
    self, check_json_header, field, read_field_sizes, read_g1, read_g2, write_field_sizes, write_g1, write_g2,
    Protocol, ProtocolError, SEC_HEADER,
};

pub const SEC_IC: u32 = 3;
pub const SEC_COEFS: u32 = 4;
pub const SEC_A: u32 = 5;
pub const SEC_B1: u32 = 6;
pub const SEC_B2: u32 = 7;
pub const SEC_C: u32 = 8;
pub const SEC_H: u32 = 9;
pub const SEC_MPC: u32 = 10;

/// Header fields after the field sizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Groth16Header<E: PairingCurve> {
    pub n_vars: u32,
    pub n_public: u32,
    pub domain_size: u32,
    pub alpha1: G1Affine<E>,
    pub beta1: G1Affine<E>,
    pub beta2: G2Affine<E>,
    pub gamma2: G2Affine<E>,
    pub delta1: G1Affine<E>,
    pub delta2: G2Affine<E>,
}

impl<E: PairingCurve> Groth16Header<E> {
    pub fn power(&self) -> u32 {
        self.domain_size.trailing_zeros()
    }

    /// Number of private signals, the length of section 8.
    pub fn n_private(&self) -> usize {
        (self.n_vars - self.n_public - 1) as usize
    }

    /// Points in the order they enter `csHash`.
    pub fn hashed_points(&self, codec: &CurveCodec<E>) -> Vec<u8> {
        let mut out = Vec::new();
        codec.write_g1_uncompressed(&self.alpha1, &mut out);
        codec.write_g1_uncompressed(&self.beta1, &mut out);
        codec.write_g2_uncompressed(&self.beta2, &mut out);
        codec.write_g2_uncompressed(&self.gamma2, &mut out);
        codec.write_g1_uncompressed(&self.delta1, &mut out);
        codec.write_g2_uncompressed(&self.delta2, &mut out);
        out
    }
}

/// Which `H` basis a key of this power carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HBasis {
    /// Odd points of the doubled Lagrange basis.
    OddCoset,
    /// `τ^i·Z_H(τ)` from the monomial section.
    Monomial,
}

#[cfg(test)]
thread_local! {
    /// Selects the monomial basis on small domains so tests can reach it.
    static FORCE_MONOMIAL: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Run `f` with every key on this thread using the monomial `H` basis.
#[cfg(test)]
pub(crate) fn with_monomial_h<T>(f: impl FnOnce() -> T) -> T {
    struct Reset;
    impl Drop for Reset {
        fn drop(&mut self) {
            FORCE_MONOMIAL.with(|m| m.set(false));
        }
    }
    FORCE_MONOMIAL.with(|m| m.set(true));
    let _reset = Reset;
    f()
}

impl HBasis {
    pub fn for_power<E: PairingCurve>(power: u32) -> Self {
        #[cfg(test)]
        {
            if FORCE_MONOMIAL.with(|f| f.get()) {
                return Self::Monomial;
            }
        }
        if power < <Fr<E> as FftField>::TWO_ADICITY {
            Self::OddCoset
        } else {
            Self::Monomial
        }
    }
}

pub fn write_header<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
    h: &Groth16Header<E>,
) -> Result<(), ProtocolError> {
    w.start_section(SEC_HEADER)?;
    write_field_sizes(w, codec)?;
    w.write_u32(h.n_vars)?;
    w.write_u32(h.n_public)?;
    w.write_u32(h.domain_size)?;
    write_g1(w, codec, &h.alpha1)?;
    write_g1(w, codec, &h.beta1)?;
    write_g2(w, codec, &h.beta2)?;
    write_g2(w, codec, &h.gamma2)?;
    write_g1(w, codec, &h.delta1)?;
    write_g2(w, codec, &h.delta2)?;
    w.end_section()?;
    Ok(())
}

/// Read section 2 of a key already known to be Groth16.
pub fn read_header<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
) -> Result<Groth16Header<E>, ProtocolError> {
    r.start_read_section(SEC_HEADER)?;
    read_field_sizes(r, codec)?;
    let n_vars = r.read_u32()?;
    let n_public = r.read_u32()?;
    let domain_size = r.read_u32()?;
    let h = Groth16Header {
        n_vars,
        n_public,
        domain_size,
        alpha1: read_g1(r, codec)?,
        beta1: read_g1(r, codec)?,
        beta2: read_g2(r, codec)?,
        gamma2: read_g2(r, codec)?,
        delta1: read_g1(r, codec)?,
        delta2: read_g2(r, codec)?,
    };
    r.end_read_section(false)?;
    if !h.domain_size.is_power_of_two() || h.n_public + 1 > h.n_vars {
        return Err(ProtocolError::BadZkey(format!(
            "inconsistent sizes: nVars {}, nPublic {}, domainSize {}",
            h.n_vars, h.n_public, h.domain_size
        )));
    }
    Ok(h)
}

/// Check the protocol section and read the header.
pub fn read_key_header<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
    codec: &CurveCodec<E>,
) -> Result<Groth16Header<E>, ProtocolError> {
    zkey::read_protocol(r)?.expect(Protocol::Groth16)?;
    read_header(r, codec)
}

// ============================================================================
// Proof
// ============================================================================

/// `(π_A, π_B, π_C)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof<E: PairingCurve> {
    pub pi_a: G1Affine<E>,
    pub pi_b: G2Affine<E>,
    pub pi_c: G1Affine<E>,
}

impl<E: PairingCurve> Proof<E> {
    pub fn to_json(&self) -> Value {
        let codec = CurveCodec::<E>::new();
        json!({
            "pi_a": codec.g1_to_json(&self.pi_a),
            "pi_b": codec.g2_to_json(&self.pi_b),
            "pi_c": codec.g1_to_json(&self.pi_c),
            "protocol": Protocol::Groth16.name(),
            "curve": E::NAME,
        })
    }

    pub fn from_json(v: &Value) -> Result<Self, ProtocolError> {
        check_json_header::<E>(v, Protocol::Groth16)?;
        let codec = CurveCodec::<E>::new();
        Ok(Self {
            pi_a: codec.g1_from_json(field(v, "pi_a")?)?,
            pi_b: codec.g2_from_json(field(v, "pi_b")?)?,
            pi_c: codec.g1_from_json(field(v, "pi_c")?)?,
        })
    }
}

// ============================================================================
// Verification key
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationKey<E: PairingCurve> {
    pub n_public: usize,
    pub alpha1: G1Affine<E>,
    pub beta2: G2Affine<E>,
    pub gamma2: G2Affine<E>,
    pub delta2: G2Affine<E>,
    pub ic: Vec<G1Affine<E>>,
}

impl<E: PairingCurve> VerificationKey<E> {
    pub fn to_json(&self) -> Value {
        let codec = CurveCodec::<E>::new();
        json!({
            "protocol": Protocol::Groth16.name(),
            "curve": E::NAME,
            "nPublic": self.n_public,
            "vk_alpha_1": codec.g1_to_json(&self.alpha1),
            "vk_beta_2": codec.g2_to_json(&self.beta2),
            "vk_gamma_2": codec.g2_to_json(&self.gamma2),
            "vk_delta_2": codec.g2_to_json(&self.delta2),
            "IC": self.ic.iter().map(|p| codec.g1_to_json(p)).collect::<Vec<_>>(),
        })
    }

    pub fn from_json(v: &Value) -> Result<Self, ProtocolError> {
        check_json_header::<E>(v, Protocol::Groth16)?;
        let codec = CurveCodec::<E>::new();
        let n_public = field(v, "nPublic")?
            .as_u64()
            .ok_or_else(|| crate::codec::CodecError::BadJson("nPublic must be an integer".into()))?
            as usize;
        let ic = field(v, "IC")?
            .as_array()
            .ok_or_else(|| crate::codec::CodecError::BadJson("IC must be an array".into()))?
            .iter()
            .map(|p| codec.g1_from_json(p))
            .collect::<Result<Vec<_>, _>>()?;
        if ic.len() != n_public + 1 {
            return Err(ProtocolError::PublicSignals { expected: n_public + 1, got: ic.len() });
        }
        Ok(Self {
            n_public,
            alpha1: codec.g1_from_json(field(v, "vk_alpha_1")?)?,
            beta2: codec.g2_from_json(field(v, "vk_beta_2")?)?,
            gamma2: codec.g2_from_json(field(v, "vk_gamma_2")?)?,
            delta2: codec.g2_from_json(field(v, "vk_delta_2")?)?,
            ic,
        })
    }
}

/// Verification key of a Groth16 zkey (sections 2 and 3).
pub fn export_verification_key<E: PairingCurve, R: Read + Seek>(
    r: &mut BinReader<R>,
) -> Result<VerificationKey<E>, ProtocolError> {
    let codec = CurveCodec::<E>::new();
    let h = read_key_header(r, &codec)?;
    let ic = zkey::read_g1_section(r, &codec, SEC_IC)?;
    if ic.len() != h.n_public as usize + 1 {
        return Err(ProtocolError::BadZkey(format!("IC has {} points", ic.len())));
    }
    Ok(VerificationKey {
        n_public: h.n_public as usize,
        alpha1: h.alpha1,
        beta2: h.beta2,
        gamma2: h.gamma2,
        delta2: h.delta2,
        ic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{Bls12_381, Bn254, G1Projective, G2Projective};
    use crate::zkey::testutil::zkey_reader;
    use crate::zkey::{ZKEY_MAGIC, ZKEY_VERSION};
    use ark_ec::{CurveGroup, Group};
    use std::io::Cursor;

    fn header<E: PairingCurve>() -> Groth16Header<E> {
        let g1 = G1Projective::<E>::generator();
        let g2 = G2Projective::<E>::generator();
        Groth16Header {
            n_vars: 5,
            n_public: 2,
            domain_size: 8,
            alpha1: (g1 * Fr::<E>::from(2u64)).into_affine(),
            beta1: (g1 * Fr::<E>::from(3u64)).into_affine(),
            beta2: (g2 * Fr::<E>::from(3u64)).into_affine(),
            gamma2: g2.into_affine(),
            delta1: g1.into_affine(),
            delta2: g2.into_affine(),
        }
    }

    fn header_roundtrip<E: PairingCurve>() {
        let codec = CurveCodec::<E>::new();
        let h = header::<E>();
        let mut w = BinWriter::new(Cursor::new(Vec::new()), ZKEY_MAGIC, ZKEY_VERSION).unwrap();
        zkey::write_protocol(&mut w, Protocol::Groth16).unwrap();
        write_header(&mut w, &codec, &h).unwrap();
        let mut r = zkey_reader(w.finish().unwrap().into_inner());
        let back = read_key_header::<E, _>(&mut r, &codec).unwrap();
        assert_eq!(back, h);
        assert_eq!(back.power(), 3);
        assert_eq!(back.n_private(), 2);
    }

    #[test]
    fn header_roundtrip_both_curves() {
        header_roundtrip::<Bn254>();
        header_roundtrip::<Bls12_381>();
    }

    #[test]
    fn h_basis_switches_at_two_adicity() {
        assert_eq!(HBasis::for_power::<Bn254>(27), HBasis::OddCoset);
        assert_eq!(HBasis::for_power::<Bn254>(28), HBasis::Monomial);
        assert_eq!(HBasis::for_power::<Bls12_381>(32), HBasis::Monomial);
    }

    #[test]
    fn proof_json_roundtrip_and_header_check() {
        let h = header::<Bn254>();
        let proof = Proof::<Bn254> { pi_a: h.alpha1, pi_b: h.beta2, pi_c: h.beta1 };
        let v = proof.to_json();
        assert_eq!(v["protocol"], "groth16");
        assert_eq!(Proof::<Bn254>::from_json(&v).unwrap(), proof);

        let mut wrong = v.clone();
        wrong["protocol"] = json!("plonk");
        assert!(matches!(Proof::<Bn254>::from_json(&wrong), Err(ProtocolError::WrongProtocol { .. })));
        assert!(Proof::<Bls12_381>::from_json(&v).is_err());
    }
}
