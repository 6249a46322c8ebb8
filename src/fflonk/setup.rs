//! FFLONK key construction.
//!
//! The circuit is lowered exactly as for PLONK and sections 3–13 are
//! written by the same code; only the header (roots and `[C0]₁`) and the
//! size of the ceremony section differ.

#![forbid(unsafe_code)]

use std::io::{Read, Seek, Write};

use ark_ff::Field;
use tracing::{debug, info};

use super::{ptau_points, write_header, FflonkHeader, Roots};
use crate::binfile::{BinReader, BinWriter};
use crate::codec::CurveCodec;
use crate::curve::{Fr, PairingCurve};
use crate::pcs::commit;
use crate::plonk::circuit::{check_power, coset_shifts, PlonkCircuit};
use crate::plonk::setup::{ceremony_powers, write_circuit_sections, write_ptau_section, CircuitPolys};
use crate::plonk::StoredPoly;
use crate::polynomial::interleave;
use crate::r1cs::R1cs;
use crate::zkey::{self, Protocol, ProtocolError, ZKEY_MAGIC, ZKEY_VERSION};

/// `C0 = Σ_j X^j·P_j(X^8)` over `(Ql, Qr, Qo, Qm, Qc, S1, S2, S3)`, from
/// the selectors in section order `Qm, Ql, Qr, Qo, Qc` and the three sigmas.
pub fn c0_poly<F: Field>(q: &[StoredPoly<F>], sigma: &[StoredPoly<F>]) -> Result<Vec<F>, ProtocolError> {
    if q.len() != 5 || sigma.len() != 3 {
        return Err(ProtocolError::BadZkey("C0 needs five selectors and three sigmas".into()));
    }
    Ok(interleave(&[
        q[1].coeffs.as_slice(),
        &q[2].coeffs,
        &q[3].coeffs,
        &q[0].coeffs,
        &q[4].coeffs,
        &sigma[0].coeffs,
        &sigma[1].coeffs,
        &sigma[2].coeffs,
    ]))
}

/// Build an FFLONK key.
pub fn new_zkey<E: PairingCurve, R: Read + Seek, W: Write + Seek>(
    r1cs: &R1cs<E>,
    ptau: &mut BinReader<R>,
    out: W,
) -> Result<W, ProtocolError> {
    let codec = CurveCodec::<E>::new();
    let circuit = PlonkCircuit::from_r1cs(r1cs)?;
    let power = circuit.power();
    check_power::<E>(power, 2)?;
    let n = 1usize << power;
    info!(
        gates = circuit.gates.len(),
        additions = circuit.additions.len(),
        n_public = circuit.n_public,
        domain = n,
        "building fflonk key"
    );
    let roots = Roots::<Fr<E>>::for_domain(n)?;
    let (powers, x2) = ceremony_powers(ptau, &codec, ptau_points(n))?;

    let (k1, k2) = coset_shifts::<Fr<E>>(power);
    let polys = CircuitPolys::build(&circuit, power, k1, k2)?;
    let c0 = commit::<E>(&powers, &c0_poly(&polys.q, &polys.sigma)?)?;
    debug!("C0 committed");
    let header = FflonkHeader::<E> {
        n_vars: circuit.n_vars,
        n_public: circuit.n_public,
        domain_size: n as u32,
        n_additions: circuit.additions.len() as u32,
        n_constraints: circuit.gates.len() as u32,
        k1,
        k2,
        roots,
        x2,
        c0,
    };

    let mut w = BinWriter::new(out, ZKEY_MAGIC, ZKEY_VERSION)?;
    zkey::write_protocol(&mut w, Protocol::Fflonk)?;
    write_header(&mut w, &codec, &header)?;
    write_circuit_sections(&mut w, &codec, &circuit, &polys)?;
    write_ptau_section(&mut w, &codec, &powers)?;
    info!("fflonk key written");
    Ok(w.finish()?)
}

#[cfg(test)]
mod tests {
    use super::super::{read_key_header, SEC_PTAU};
    use super::*;
    use crate::curve::Bn254;
    use crate::domain::{pow_u64, Domain};
    use crate::polynomial::eval;
    use crate::zkey::testutil::*;
    use ark_bn254::Fr as F;
    use ark_ff::One;
    use std::io::Cursor;

    #[test]
    fn square_circuit_header() {
        let mut ptau = ptau::<Bn254>(6);
        let bytes = new_zkey(&square::<Bn254>(), &mut ptau, Cursor::new(Vec::new())).unwrap().into_inner();
        let mut r = zkey_reader(bytes);
        let codec = CurveCodec::<Bn254>::new();
        let h = read_key_header::<Bn254, _>(&mut r, &codec).unwrap();
        assert_eq!((h.n_vars, h.n_public, h.domain_size, h.n_constraints), (3, 1, 8, 2));
        assert_eq!(pow_u64(h.roots.wr, 3), Domain::<F>::new(8).unwrap().omega);
        assert_eq!(pow_u64(h.roots.w8, 8), F::one());
        assert_eq!(r.section_size(SEC_PTAU).unwrap(), 90 * codec.g1_size() as u64);
    }

    #[test]
    fn c0_packs_eight_polynomials() {
        let c = PlonkCircuit::from_r1cs(&mixed::<Bn254>()).unwrap();
        let (k1, k2) = coset_shifts::<F>(3);
        let polys = CircuitPolys::build(&c, 3, k1, k2).unwrap();
        let c0 = c0_poly(&polys.q, &polys.sigma).unwrap();
        // At a root of X^8 = ξ, C0 is Σ_j x^j·P_j(ξ).
        let x = F::from(3u64);
        let xi = pow_u64(x, 8);
        let [qm, ql, qr, qo, qc] = &polys.q;
        let [s1, s2, s3] = &polys.sigma;
        let p = [ql, qr, qo, qm, qc, s1, s2, s3];
        let expected: F = p.iter().enumerate().map(|(j, q)| pow_u64(x, j as u64) * eval(&q.coeffs, xi)).sum();
        assert_eq!(eval(&c0, x), expected);
    }

    #[test]
    fn needs_nine_n_points() {
        // 9·8 + 18 = 90 points need a ceremony of power 6.
        let mut ptau = ptau::<Bn254>(5);
        assert!(matches!(
            new_zkey(&square::<Bn254>(), &mut ptau, Cursor::new(Vec::new())),
            Err(ProtocolError::PowerTooSmall { have: 5, need: 6 })
        ));
    }
}
