//! PLONK prover.
//!
//! ```text
//! round 1  A, B, C     wire polynomials, blinded by (b₂ + b₁X)·Z_H etc.
//! round 2  Z           grand product of the copy permutation
//! round 3  T1, T2, T3  quotient of the gate + permutation identity
//! round 4  evaluations a, b, c, s1, s2 at ξ and z at ξω
//! round 5  Wxi, Wxiw   openings of the linearisation R and of Z
//! ```
//!
//! The quotient identity, checked on the `4n` domain in split form:
//!
//! ```text
//! T·Z_H = qm·a·b + ql·a + qr·b + qo·c + qc + PI
//!       + α·[z·(a+βX+γ)(b+βk1X+γ)(c+βk2X+γ) − zω·(a+βS1+γ)(b+βS2+γ)(c+βS3+γ)]
//!       + α²·L0·(z − 1)
//! ```

#![forbid(unsafe_code)]

use std::io::{Read, Seek};

use ark_ff::{batch_inversion, Field, One, PrimeField, UniformRand, Zero};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info};

use super::circuit::internal_witness;
use super::setup::first_lagrange;
use super::{
    challenge_alpha, challenge_beta_gamma, challenge_v, challenge_xi, read_additions, read_key_header, read_poly,
    read_ptau_points, read_wire_map, Proof, StoredPoly, PTAU_EXTRA_POINTS, SEC_A_MAP, SEC_B_MAP, SEC_C_MAP,
    SEC_LAGRANGE, SEC_QC, SEC_QL, SEC_QM, SEC_QO, SEC_QR, SEC_SIGMA,
};
use crate::binfile::BinReader;
use crate::codec::CurveCodec;
use crate::curve::{Fr, PairingCurve};
use crate::domain::{pow_u64, Domain};
use crate::pcs::commit;
use crate::polynomial::{add_scaled, blind, eval};
use crate::quotient::{
    check_degree, divide_by_linear, extend_split, quotient_from_split, vanishing_on_extended, Split,
};
use crate::wtns;
use crate::zkey::ProtocolError;

/// Prove with fresh blinding. Returns the proof and the public signals.
pub fn prove<E: PairingCurve, R: Read + Seek>(
    zkey: &mut BinReader<R>,
    witness: &[Fr<E>],
) -> Result<(Proof<E>, Vec<Fr<E>>), ProtocolError> {
    prove_with_rng(zkey, witness, &mut ChaCha20Rng::from_entropy())
}

pub fn prove_with_rng<E: PairingCurve, R: Read + Seek, G: RngCore>(
    zkey: &mut BinReader<R>,
    witness: &[Fr<E>],
    rng: &mut G,
) -> Result<(Proof<E>, Vec<Fr<E>>), ProtocolError> {
    let codec = CurveCodec::<E>::new();
    let h = read_key_header(zkey, &codec)?;
    wtns::check::<E>(witness, h.n_vars as usize)?;
    let n = h.n();
    let n_public = h.n_public as usize;
    let d = Domain::<Fr<E>>::new(n)?;
    let d4 = Domain::<Fr<E>>::new(4 * n)?;
    info!(domain = n, gates = h.n_constraints, "plonk prove");

    let additions = read_additions(zkey, &codec, h.n_additions as usize)?;
    let w = internal_witness(witness, &additions)?;
    let public = witness[1..=n_public].to_vec();
    let powers = read_ptau_points(zkey, &codec, n + PTAU_EXTRA_POINTS)?;
    let cm = |c: &[Fr<E>]| commit::<E>(&powers, c);
    let b: [Fr<E>; 12] = std::array::from_fn(|_| Fr::<E>::rand(rng));

    // Round 1: wires.
    let [a_evals, b_evals, c_evals] = wire_evals(zkey, &w, n, h.n_constraints as usize)?;
    let a_c = d.interpolate(&a_evals)?;
    let b_c = d.interpolate(&b_evals)?;
    let c_c = d.interpolate(&c_evals)?;
    let (a_blind, b_blind, c_blind) = ([b[2], b[1]], [b[4], b[3]], [b[6], b[5]]);
    let a_poly = blind(&a_c, n, &a_blind);
    let b_poly = blind(&b_c, n, &b_blind);
    let c_poly = blind(&c_c, n, &c_blind);
    let (pa, pb, pc) = (cm(&a_poly)?, cm(&b_poly)?, cm(&c_poly)?);
    let key = [&h.qm, &h.ql, &h.qr, &h.qo, &h.qc, &h.s1, &h.s2, &h.s3];
    let (beta, gamma) = challenge_beta_gamma::<E>(key, &public, [&pa, &pb, &pc])?;
    debug!("round 1 done");

    // Round 2: permutation product.
    let sigma: Vec<StoredPoly<Fr<E>>> =
        (0..3).map(|i| read_poly(zkey, &codec, SEC_SIGMA, i, n)).collect::<Result<_, _>>()?;
    let z_evals = grand_product(&d, [&a_evals, &b_evals, &c_evals], &sigma, beta, gamma, h.k1, h.k2)?;
    let z_c = d.interpolate(&z_evals)?;
    let z_blind = [b[9], b[8], b[7]];
    let z_poly = blind(&z_c, n, &z_blind);
    let pz = cm(&z_poly)?;
    let alpha = challenge_alpha::<E>(&beta, &gamma, &pz)?;
    debug!("round 2 done");

    // Round 3: quotient.
    let q: Vec<StoredPoly<Fr<E>>> = [SEC_QM, SEC_QL, SEC_QR, SEC_QO, SEC_QC]
        .into_iter()
        .map(|id| read_poly(zkey, &codec, id, 0, n))
        .collect::<Result<_, _>>()?;
    let pi = public_on_extended(zkey, &codec, &public, n)?;
    let l0 = d4.evaluate(&first_lagrange::<Fr<E>>(n))?;
    let sa = extend_split(&d4, &a_c, &a_blind)?;
    let sb = extend_split(&d4, &b_c, &b_blind)?;
    let sc = extend_split(&d4, &c_c, &c_blind)?;
    let sz = extend_split(&d4, &z_c, &z_blind)?;
    let zh = vanishing_on_extended(&d4);
    let x4 = d4.elements();
    let alpha2 = alpha.square();
    let one = Split::plain(Fr::<E>::one());
    let mut evals = Vec::with_capacity(4 * n);
    for i in 0..4 * n {
        let (a, bb, c, z) = (sa[i], sb[i], sc[i], sz[i]);
        let zw = sz[(i + 4) % (4 * n)];
        let zhi = zh[i % 4];
        let x = x4[i];

        let gate = a.mul2(bb, zhi) * q[0].evals[i]
            + a * q[1].evals[i]
            + bb * q[2].evals[i]
            + c * q[3].evals[i]
            + Split::plain(q[4].evals[i] + pi[i]);

        let e1 = a + Split::plain(beta * x + gamma);
        let e2 = bb + Split::plain(beta * h.k1 * x + gamma);
        let e3 = c + Split::plain(beta * h.k2 * x + gamma);
        let f1 = a + Split::plain(beta * sigma[0].evals[i] + gamma);
        let f2 = bb + Split::plain(beta * sigma[1].evals[i] + gamma);
        let f3 = c + Split::plain(beta * sigma[2].evals[i] + gamma);
        let perm = (z.mul4(e1, e2, e3, zhi) - zw.mul4(f1, f2, f3, zhi)) * alpha;

        let boundary = (z - one) * (l0[i] * alpha2);
        evals.push(gate + perm + boundary);
    }
    let t = quotient_from_split(&d4, n, evals, "T")?;
    check_degree(&t, 3 * n + PTAU_EXTRA_POINTS, "T")?;
    let part = |from: usize, to: usize| -> Vec<Fr<E>> {
        let mut p: Vec<Fr<E>> = t.iter().skip(from).take(to.saturating_sub(from)).copied().collect();
        p.resize(to - from, Fr::<E>::zero());
        p
    };
    let mut t1 = part(0, n);
    let mut t2 = part(n, 2 * n);
    let mut t3 = part(2 * n, t.len().max(2 * n));
    t1.push(b[10]);
    t2[0] -= b[10];
    t2.push(b[11]);
    if t3.is_empty() {
        t3.push(Fr::<E>::zero());
    }
    t3[0] -= b[11];
    let (pt1, pt2, pt3) = (cm(&t1)?, cm(&t2)?, cm(&t3)?);
    let xi = challenge_xi::<E>(&alpha, [&pt1, &pt2, &pt3])?;
    debug!("round 3 done");

    // Round 4: evaluations.
    let xiw = xi * d.omega;
    let eval_a = eval(&a_poly, xi);
    let eval_b = eval(&b_poly, xi);
    let eval_c = eval(&c_poly, xi);
    let eval_s1 = eval(&sigma[0].coeffs, xi);
    let eval_s2 = eval(&sigma[1].coeffs, xi);
    let eval_zw = eval(&z_poly, xiw);
    let v = challenge_v::<E>(&xi, [&eval_a, &eval_b, &eval_c, &eval_s1, &eval_s2, &eval_zw])?;

    // Round 5: linearisation and openings.
    let xin = pow_u64(xi, n as u64);
    let zh_xi = xin - Fr::<E>::one();
    let lag = d.lagrange_evals(xi, n_public.max(1))?;
    let pi_xi: Fr<E> = -public.iter().zip(&lag).map(|(s, l)| *s * l).sum::<Fr<E>>();
    let l0_xi = lag[0];
    let e1 = eval_a + beta * eval_s1 + gamma;
    let e2 = eval_b + beta * eval_s2 + gamma;

    let mut r = Vec::new();
    add_scaled(&mut r, &q[0].coeffs, eval_a * eval_b);
    add_scaled(&mut r, &q[1].coeffs, eval_a);
    add_scaled(&mut r, &q[2].coeffs, eval_b);
    add_scaled(&mut r, &q[3].coeffs, eval_c);
    add_scaled(&mut r, &q[4].coeffs, Fr::<E>::one());
    let z_coef = alpha
        * (eval_a + beta * xi + gamma)
        * (eval_b + beta * h.k1 * xi + gamma)
        * (eval_c + beta * h.k2 * xi + gamma)
        + alpha2 * l0_xi;
    add_scaled(&mut r, &z_poly, z_coef);
    add_scaled(&mut r, &sigma[2].coeffs, -(alpha * e1 * e2 * beta * eval_zw));
    add_scaled(&mut r, &t1, -zh_xi);
    add_scaled(&mut r, &t2, -zh_xi * xin);
    add_scaled(&mut r, &t3, -zh_xi * xin * xin);
    r[0] += pi_xi - alpha2 * l0_xi - alpha * e1 * e2 * (eval_c + gamma) * eval_zw;

    let mut wxi = r;
    let mut vk = Fr::<E>::one();
    for (p, e) in [
        (&a_poly, eval_a),
        (&b_poly, eval_b),
        (&c_poly, eval_c),
        (&sigma[0].coeffs, eval_s1),
        (&sigma[1].coeffs, eval_s2),
    ] {
        vk *= v;
        add_scaled(&mut wxi, p, vk);
        wxi[0] -= vk * e;
    }
    let wxi = divide_by_linear(&wxi, xi, "Wxi")?;
    let mut wxiw = z_poly.clone();
    wxiw[0] -= eval_zw;
    let wxiw = divide_by_linear(&wxiw, xiw, "Wxiw")?;
    let proof = Proof {
        a: pa,
        b: pb,
        c: pc,
        z: pz,
        t1: pt1,
        t2: pt2,
        t3: pt3,
        wxi: cm(&wxi)?,
        wxiw: cm(&wxiw)?,
        eval_a,
        eval_b,
        eval_c,
        eval_s1,
        eval_s2,
        eval_zw,
    };
    info!("plonk proof ready");
    Ok((proof, public))
}

/// `PI = −Σ pub_j·L_j` over the `4n` domain.
pub(crate) fn public_on_extended<E: PairingCurve, R: Read + Seek>(
    zkey: &mut BinReader<R>,
    codec: &CurveCodec<E>,
    public: &[Fr<E>],
    n: usize,
) -> Result<Vec<Fr<E>>, ProtocolError> {
    let mut pi = vec![Fr::<E>::zero(); 4 * n];
    for (j, s) in public.iter().enumerate() {
        let l = read_poly(zkey, codec, SEC_LAGRANGE, j, n)?;
        for (p, e) in pi.iter_mut().zip(&l.evals) {
            *p -= *s * e;
        }
    }
    Ok(pi)
}

/// Wire values per gate row; padding rows carry `w[0]`.
pub(crate) fn wire_evals<R: Read + Seek, F: Copy>(
    zkey: &mut BinReader<R>,
    w: &[F],
    n: usize,
    n_constraints: usize,
) -> Result<[Vec<F>; 3], ProtocolError> {
    let mut wires: [Vec<F>; 3] = Default::default();
    for (col, id) in [SEC_A_MAP, SEC_B_MAP, SEC_C_MAP].into_iter().enumerate() {
        let map = read_wire_map(zkey, id, n_constraints)?;
        let mut evals = vec![w[0]; n];
        for (row, s) in map.iter().enumerate() {
            evals[row] = *w
                .get(*s as usize)
                .ok_or_else(|| ProtocolError::BadZkey(format!("wire map references wire {s}")))?;
        }
        wires[col] = evals;
    }
    Ok(wires)
}

/// Values of the permutation product `Z` over `H`. The product must wrap
/// around to one.
pub(crate) fn grand_product<F: PrimeField>(
    d: &Domain<F>,
    wires: [&[F]; 3],
    sigma: &[StoredPoly<F>],
    beta: F,
    gamma: F,
    k1: F,
    k2: F,
) -> Result<Vec<F>, ProtocolError> {
    let n = d.n;
    let omegas = d.elements();
    let shifts = [F::one(), k1, k2];
    let mut num = vec![F::one(); n];
    let mut den = vec![F::one(); n];
    for i in 0..n {
        for col in 0..3 {
            num[i] *= wires[col][i] + beta * shifts[col] * omegas[i] + gamma;
            den[i] *= wires[col][i] + beta * sigma[col].evals[4 * i] + gamma;
        }
    }
    batch_inversion(&mut den);
    let mut z = Vec::with_capacity(n);
    let mut acc = F::one();
    for i in 0..n {
        z.push(acc);
        acc *= num[i] * den[i];
    }
    if !acc.is_one() {
        return Err(ProtocolError::CopyConstraints);
    }
    Ok(z)
}

#[cfg(test)]
mod tests {
    use super::super::setup;
    use super::*;
    use crate::curve::Bn254;
    use crate::quotient::QuotientError;
    use crate::zkey::testutil::*;
    use std::io::Cursor;

    fn key(r1cs: &crate::r1cs::R1cs<Bn254>) -> Vec<u8> {
        let mut ptau = ptau::<Bn254>(3);
        setup::new_zkey(r1cs, &mut ptau, Cursor::new(Vec::new())).unwrap().into_inner()
    }

    #[test]
    fn unsatisfied_gate_is_not_divisible() {
        let bytes = key(&square::<Bn254>());
        let bad = vec![Fr::<Bn254>::one(), Fr::<Bn254>::from(10u64), Fr::<Bn254>::from(3u64)];
        assert!(matches!(
            prove::<Bn254, _>(&mut zkey_reader(bytes), &bad),
            Err(ProtocolError::Quotient(QuotientError::NotDivisible("T")))
        ));
    }

    #[test]
    fn broken_wire_map_breaks_copy_constraints() {
        let mut bytes = key(&square::<Bn254>());
        // Point a of row 1 at y instead of x; sigma still links it to b.
        let start = zkey_reader(bytes.clone()).section(SEC_A_MAP).unwrap().start as usize;
        bytes[start + 4..start + 8].copy_from_slice(&1u32.to_le_bytes());
        assert!(matches!(
            prove::<Bn254, _>(&mut zkey_reader(bytes), &square_witness::<Bn254>(3)),
            Err(ProtocolError::CopyConstraints)
        ));
    }

    #[test]
    fn public_signals_follow_the_one() {
        let bytes = key(&mixed::<Bn254>());
        let (_, public) = prove::<Bn254, _>(&mut zkey_reader(bytes), &mixed_witness::<Bn254>()).unwrap();
        assert_eq!(public, vec![Fr::<Bn254>::from(8u64), Fr::<Bn254>::one()]);
    }
}
