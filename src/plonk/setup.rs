//! PLONK key construction from a circuit and a ceremony file.
//!
//! Only the monomial `[τ^i]₁` section and `[τ]₂` of the ceremony are used,
//! so the file does not need to be prepared for phase 2.

#![forbid(unsafe_code)]

use std::io::{Read, Seek, Write};

use ark_ff::{Field, PrimeField};
use tracing::{debug, info, warn};

use super::circuit::{check_power, coset_shifts, PlonkCircuit};
use super::{
    write_additions, write_header, write_poly, PlonkHeader, StoredPoly, PTAU_EXTRA_POINTS, SEC_A_MAP, SEC_B_MAP,
    SEC_C_MAP, SEC_LAGRANGE, SEC_PTAU, SEC_QC, SEC_QL, SEC_QM, SEC_QO, SEC_QR, SEC_SIGMA,
};
use crate::binfile::{BinReader, BinWriter};
use crate::codec::CurveCodec;
use crate::curve::{Fr, G1Affine, G2Affine, PairingCurve};
use crate::domain::Domain;
use crate::pcs::commit;
use crate::ptau::{self, read_g1_points, read_g2_points, section_points, SEC_TAU_G1, SEC_TAU_G2};
use crate::r1cs::R1cs;
use crate::zkey::{self, Protocol, ProtocolError, ZKEY_MAGIC, ZKEY_VERSION};

/// Selector, permutation and public-input polynomials of a lowered circuit.
#[derive(Clone, Debug)]
pub struct CircuitPolys<F> {
    /// `Qm, Ql, Qr, Qo, Qc`.
    pub q: [StoredPoly<F>; 5],
    pub sigma: [StoredPoly<F>; 3],
    pub lagrange: Vec<StoredPoly<F>>,
}

impl<F: PrimeField> CircuitPolys<F> {
    pub fn build(circuit: &PlonkCircuit<F>, power: u32, k1: F, k2: F) -> Result<Self, ProtocolError> {
        let d = Domain::<F>::from_power(power)?;
        let d4 = Domain::<F>::from_power(power + 2)?;
        let n = d.n;

        let mut cols: [Vec<F>; 5] = std::array::from_fn(|_| vec![F::zero(); n]);
        for (i, g) in circuit.gates.iter().enumerate() {
            for (col, v) in cols.iter_mut().zip([g.qm, g.ql, g.qr, g.qo, g.qc]) {
                col[i] = v;
            }
        }
        let q = try_map(cols, |evals| StoredPoly::new(&d4, d.interpolate(&evals)?))?;

        let perm = circuit.permutation(n);
        let omegas = d.elements();
        let shifts = [F::one(), k1, k2];
        let mut cols: [Vec<F>; 3] = std::array::from_fn(|_| Vec::with_capacity(n));
        for (p, target) in perm.iter().enumerate() {
            cols[p / n].push(shifts[target / n] * omegas[target % n]);
        }
        let sigma = try_map(cols, |evals| StoredPoly::new(&d4, d.interpolate(&evals)?))?;

        let mut lagrange = Vec::with_capacity(circuit.n_public as usize);
        for i in 0..circuit.n_public as usize {
            let mut evals = vec![F::zero(); n];
            evals[i] = F::one();
            lagrange.push(StoredPoly::new(&d4, d.interpolate(&evals)?)?);
        }
        Ok(Self { q, sigma, lagrange })
    }
}

fn try_map<T, U, const N: usize>(
    items: [T; N],
    f: impl FnMut(T) -> Result<U, ProtocolError>,
) -> Result<[U; N], ProtocolError> {
    let out = items.into_iter().map(f).collect::<Result<Vec<U>, _>>()?;
    out.try_into().map_err(|_| ProtocolError::BadZkey("polynomial count".into()))
}

/// Sections 3–13, shared by PLONK and FFLONK keys.
pub fn write_circuit_sections<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
    circuit: &PlonkCircuit<Fr<E>>,
    polys: &CircuitPolys<Fr<E>>,
) -> Result<(), ProtocolError> {
    write_additions(w, codec, &circuit.additions)?;
    for (id, col) in [(SEC_A_MAP, 0), (SEC_B_MAP, 1), (SEC_C_MAP, 2)] {
        w.start_section(id)?;
        for row in 0..circuit.gates.len() {
            w.write_u32(circuit.wire(row, col))?;
        }
        w.end_section()?;
    }
    for (id, p) in [SEC_QM, SEC_QL, SEC_QR, SEC_QO, SEC_QC].into_iter().zip(&polys.q) {
        w.start_section(id)?;
        write_poly(w, codec, p)?;
        w.end_section()?;
    }
    w.start_section(SEC_SIGMA)?;
    for p in &polys.sigma {
        write_poly(w, codec, p)?;
    }
    w.end_section()?;
    w.start_section(SEC_LAGRANGE)?;
    for p in &polys.lagrange {
        write_poly(w, codec, p)?;
    }
    w.end_section()?;
    Ok(())
}

/// Monomial powers `[τ^i]₁` (`count` of them) and `[τ]₂` from a ceremony
/// file, checked against the circuit power.
pub fn ceremony_powers<E: PairingCurve, R: Read + Seek>(
    ptau: &mut BinReader<R>,
    codec: &CurveCodec<E>,
    count: usize,
) -> Result<(Vec<G1Affine<E>>, G2Affine<E>), ProtocolError> {
    let info = ptau::read_info::<E, R>(ptau)?;
    if info.contributions.is_empty() {
        warn!("ceremony file has no contributions; the key is not secure");
    }
    if section_points(SEC_TAU_G1, info.header.power) < count {
        let mut need = 1;
        while section_points(SEC_TAU_G1, need) < count {
            need += 1;
        }
        return Err(ProtocolError::PowerTooSmall { have: info.header.power, need });
    }
    let powers = read_g1_points(ptau, codec, SEC_TAU_G1, 0, count)?;
    let x2 = read_g2_points(ptau, codec, SEC_TAU_G2, 1, 1)?[0];
    Ok((powers, x2))
}

pub fn write_ptau_section<E: PairingCurve, W: Write + Seek>(
    w: &mut BinWriter<W>,
    codec: &CurveCodec<E>,
    powers: &[G1Affine<E>],
) -> Result<(), ProtocolError> {
    let mut bytes = Vec::with_capacity(powers.len() * codec.g1_size());
    for p in powers {
        codec.write_g1_lem(p, &mut bytes);
    }
    Ok(w.write_section(SEC_PTAU, &bytes)?)
}

/// Build a PLONK key.
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
        "building plonk key"
    );
    let (powers, x2) = ceremony_powers(ptau, &codec, n + PTAU_EXTRA_POINTS)?;

    let (k1, k2) = coset_shifts::<Fr<E>>(power);
    let polys = CircuitPolys::build(&circuit, power, k1, k2)?;
    debug!("circuit polynomials ready");
    let c = |p: &StoredPoly<Fr<E>>| commit::<E>(&powers, &p.coeffs);
    let header = PlonkHeader::<E> {
        n_vars: circuit.n_vars,
        n_public: circuit.n_public,
        domain_size: n as u32,
        n_additions: circuit.additions.len() as u32,
        n_constraints: circuit.gates.len() as u32,
        k1,
        k2,
        qm: c(&polys.q[0])?,
        ql: c(&polys.q[1])?,
        qr: c(&polys.q[2])?,
        qo: c(&polys.q[3])?,
        qc: c(&polys.q[4])?,
        s1: c(&polys.sigma[0])?,
        s2: c(&polys.sigma[1])?,
        s3: c(&polys.sigma[2])?,
        x2,
    };

    let mut w = BinWriter::new(out, ZKEY_MAGIC, ZKEY_VERSION)?;
    zkey::write_protocol(&mut w, Protocol::Plonk)?;
    write_header(&mut w, &codec, &header)?;
    write_circuit_sections(&mut w, &codec, &circuit, &polys)?;
    write_ptau_section(&mut w, &codec, &powers)?;
    info!("plonk key written");
    Ok(w.finish()?)
}

/// `Σ_j X^j / n`, the Lagrange polynomial of `ω^0`.
pub(crate) fn first_lagrange<F: Field>(n: usize) -> Vec<F> {
    let n_inv = F::from(n as u64).inverse().unwrap_or_else(F::zero);
    vec![n_inv; n]
}

#[cfg(test)]
mod tests {
    use super::super::{read_key_header, read_poly, read_wire_map};
    use super::*;
    use crate::curve::Bn254;
    use crate::polynomial::eval;
    use crate::zkey::testutil::*;
    use ark_bn254::Fr as F;
    use ark_ff::{One, Zero};
    use std::io::Cursor;

    #[test]
    fn square_circuit_layout() {
        let mut ptau = ptau::<Bn254>(3);
        let bytes = new_zkey(&square::<Bn254>(), &mut ptau, Cursor::new(Vec::new())).unwrap().into_inner();
        let mut r = zkey_reader(bytes);
        let codec = CurveCodec::<Bn254>::new();
        let h = read_key_header::<Bn254, _>(&mut r, &codec).unwrap();
        assert_eq!((h.n_vars, h.n_public, h.domain_size, h.n_additions, h.n_constraints), (3, 1, 8, 0, 2));
        assert_eq!((h.k1, h.k2), (F::from(2u64), F::from(3u64)));
        assert_eq!(read_wire_map(&mut r, SEC_A_MAP, 2).unwrap(), vec![1, 2]);
        assert_eq!(read_wire_map(&mut r, SEC_C_MAP, 2).unwrap(), vec![0, 1]);
        assert_eq!(r.section_size(SEC_PTAU).unwrap(), 14 * codec.g1_size() as u64);

        // Qm is one on the product row and zero elsewhere.
        let d = Domain::<F>::new(8).unwrap();
        let qm = read_poly(&mut r, &codec, SEC_QM, 0, 8).unwrap();
        assert_eq!(eval(&qm.coeffs, d.element(1)), F::one());
        assert_eq!(eval(&qm.coeffs, d.element(0)), F::zero());
        let d4 = Domain::<F>::new(32).unwrap();
        assert_eq!(qm.evals[4], F::one());
        assert_eq!(qm.evals[3], eval(&qm.coeffs, d4.element(3)));

        // x appears at a and b of row 1, so S1(ω) = k1·ω and S2(ω) = ω.
        let s1 = read_poly(&mut r, &codec, SEC_SIGMA, 0, 8).unwrap();
        let s2 = read_poly(&mut r, &codec, SEC_SIGMA, 1, 8).unwrap();
        assert_eq!(eval(&s1.coeffs, d.element(1)), h.k1 * d.element(1));
        assert_eq!(eval(&s2.coeffs, d.element(1)), d.element(1));

        let l0 = read_poly(&mut r, &codec, SEC_LAGRANGE, 0, 8).unwrap();
        assert_eq!(l0.coeffs, first_lagrange::<F>(8));
        assert_eq!(h.qm, commit::<Bn254>(&read_g1_points(&mut ptau, &codec, SEC_TAU_G1, 0, 8).unwrap(), &qm.coeffs).unwrap());
    }

    #[test]
    fn sigma_is_a_permutation_of_the_cosets() {
        let c = PlonkCircuit::from_r1cs(&mixed::<Bn254>()).unwrap();
        let (k1, k2) = coset_shifts::<F>(3);
        let polys = CircuitPolys::build(&c, 3, k1, k2).unwrap();
        let d = Domain::<F>::new(8).unwrap();
        let mut ids: Vec<F> = Vec::new();
        let mut images: Vec<F> = Vec::new();
        for (col, k) in [F::one(), k1, k2].into_iter().enumerate() {
            for i in 0..8 {
                ids.push(k * d.element(i));
                images.push(eval(&polys.sigma[col].coeffs, d.element(i)));
            }
        }
        ids.sort();
        images.sort();
        assert_eq!(ids, images);
    }

    #[test]
    fn rejects_small_ceremony() {
        let mut ptau = ptau::<Bn254>(2);
        assert!(matches!(
            new_zkey(&mixed::<Bn254>(), &mut ptau, Cursor::new(Vec::new())),
            Err(ProtocolError::PowerTooSmall { have: 2, need: 3 })
        ));
    }
}
