//! FFLONK prover.
//!
//! ```text
//! round 1  C1 = A(X⁴) + X·B(X⁴) + X²·C(X⁴) + X³·T0(X⁴)
//! round 2  C2 = Z(X³) + X·T1(X³) + X²·T2(X³)
//! round 3  evaluations at ξ = seed^24 and ξω
//! round 4  W1 = (C0 − R0)/(X⁸ − ξ) + α(C1 − R1)/(X⁴ − ξ)
//!             + α²(C2 − R2)/((X³ − ξ)(X³ − ξω))
//! round 5  W2 = L/(X − y) with
//!          L = C0 − r0 + q1(C1 − r1) + q2(C2 − r2) − Z_T0(y)·W1,
//!          q1 = αZ_T0(y)/Z_T1(y), q2 = α²Z_T0(y)/Z_T2(y)
//! ```
//!
//! with the quotients
//!
//! ```text
//! T0·Z_H = qm·a·b + ql·a + qr·b + qo·c + qc + PI
//! T1·Z_H = L0·(z − 1)
//! T2·Z_H = z·(a+βX+γ)(b+βk1X+γ)(c+βk2X+γ) − zω·(a+βS1+γ)(b+βS2+γ)(c+βS3+γ)
//! ```

#![forbid(unsafe_code)]

use std::io::{Read, Seek};

use ark_ff::{Field, One, UniformRand};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info};

use super::setup::c0_poly;
use super::{
    challenge_alpha, challenge_beta_gamma, challenge_xi_seed, challenge_y, ptau_points, read_key_header,
    remainders_at, Evaluations, OpeningPoints, Proof, QuotientEvals,
};
use crate::binfile::BinReader;
use crate::codec::CurveCodec;
use crate::curve::{Fr, PairingCurve};
use crate::domain::{pow_u64, Domain};
use crate::pcs::commit;
use crate::plonk::circuit::internal_witness;
use crate::plonk::prover::{grand_product, public_on_extended, wire_evals};
use crate::plonk::setup::first_lagrange;
use crate::plonk::{read_additions, read_poly, read_ptau_points, StoredPoly, SEC_QC, SEC_QL, SEC_QM, SEC_QO, SEC_QR, SEC_SIGMA};
use crate::polynomial::{add_scaled, blind, eval, interleave};
use crate::quotient::{
    check_degree, divide_by_linear, divide_by_xm_minus_c, extend_split, quotient_from_split, vanishing_on_extended,
    QuotientError, Split,
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
    info!(domain = n, gates = h.n_constraints, "fflonk prove");

    let additions = read_additions(zkey, &codec, h.n_additions as usize)?;
    let w = internal_witness(witness, &additions)?;
    let public = witness[1..=n_public].to_vec();
    let powers = read_ptau_points(zkey, &codec, ptau_points(n))?;
    let cm = |c: &[Fr<E>]| commit::<E>(&powers, c);
    let b: [Fr<E>; 9] = std::array::from_fn(|_| Fr::<E>::rand(rng));
    let zh = vanishing_on_extended(&d4);

    // Round 1: wires and the gate quotient.
    let [a_evals, b_evals, c_evals] = wire_evals(zkey, &w, n, h.n_constraints as usize)?;
    let a_c = d.interpolate(&a_evals)?;
    let b_c = d.interpolate(&b_evals)?;
    let c_c = d.interpolate(&c_evals)?;
    let (a_blind, b_blind, c_blind) = ([b[1], b[0]], [b[3], b[2]], [b[5], b[4]]);
    let a_poly = blind(&a_c, n, &a_blind);
    let b_poly = blind(&b_c, n, &b_blind);
    let c_poly = blind(&c_c, n, &c_blind);

    let q: Vec<StoredPoly<Fr<E>>> = [SEC_QM, SEC_QL, SEC_QR, SEC_QO, SEC_QC]
        .into_iter()
        .map(|id| read_poly(zkey, &codec, id, 0, n))
        .collect::<Result<_, _>>()?;
    let pi = public_on_extended(zkey, &codec, &public, n)?;
    let sa = extend_split(&d4, &a_c, &a_blind)?;
    let sb = extend_split(&d4, &b_c, &b_blind)?;
    let sc = extend_split(&d4, &c_c, &c_blind)?;
    let gate: Vec<Split<Fr<E>>> = (0..4 * n)
        .map(|i| {
            sa[i].mul2(sb[i], zh[i % 4]) * q[0].evals[i]
                + sa[i] * q[1].evals[i]
                + sb[i] * q[2].evals[i]
                + sc[i] * q[3].evals[i]
                + Split::plain(q[4].evals[i] + pi[i])
        })
        .collect();
    let t0 = quotient_from_split(&d4, n, gate, "T0")?;
    check_degree(&t0, 2 * n + 2, "T0")?;
    let c1 = interleave(&[a_poly.as_slice(), &b_poly, &c_poly, &t0]);
    let pc1 = cm(&c1)?;
    let (beta, gamma) = challenge_beta_gamma::<E>(&h.c0, &public, &pc1)?;
    debug!("round 1 done");

    // Round 2: permutation product and its quotients.
    let sigma: Vec<StoredPoly<Fr<E>>> =
        (0..3).map(|i| read_poly(zkey, &codec, SEC_SIGMA, i, n)).collect::<Result<_, _>>()?;
    let z_evals = grand_product(&d, [&a_evals, &b_evals, &c_evals], &sigma, beta, gamma, h.k1, h.k2)?;
    let z_c = d.interpolate(&z_evals)?;
    let z_blind = [b[8], b[7], b[6]];
    let z_poly = blind(&z_c, n, &z_blind);

    let sz = extend_split(&d4, &z_c, &z_blind)?;
    let l0 = d4.evaluate(&first_lagrange::<Fr<E>>(n))?;
    let x4 = d4.elements();
    let one = Split::plain(Fr::<E>::one());
    let mut boundary = Vec::with_capacity(4 * n);
    let mut perm = Vec::with_capacity(4 * n);
    for i in 0..4 * n {
        let (a, bb, c, z) = (sa[i], sb[i], sc[i], sz[i]);
        let zw = sz[(i + 4) % (4 * n)];
        let x = x4[i];
        boundary.push((z - one) * l0[i]);
        let e1 = a + Split::plain(beta * x + gamma);
        let e2 = bb + Split::plain(beta * h.k1 * x + gamma);
        let e3 = c + Split::plain(beta * h.k2 * x + gamma);
        let f1 = a + Split::plain(beta * sigma[0].evals[i] + gamma);
        let f2 = bb + Split::plain(beta * sigma[1].evals[i] + gamma);
        let f3 = c + Split::plain(beta * sigma[2].evals[i] + gamma);
        perm.push(z.mul4(e1, e2, e3, zh[i % 4]) - zw.mul4(f1, f2, f3, zh[i % 4]));
    }
    let t1 = quotient_from_split(&d4, n, boundary, "T1")?;
    check_degree(&t1, n + 2, "T1")?;
    let t2 = quotient_from_split(&d4, n, perm, "T2")?;
    check_degree(&t2, 3 * n + 6, "T2")?;
    let c2 = interleave(&[z_poly.as_slice(), &t1, &t2]);
    let pc2 = cm(&c2)?;
    let xi_seed = challenge_xi_seed::<E>(&gamma, &pc2)?;
    debug!("round 2 done");

    // Round 3: evaluations.
    let pts = OpeningPoints::new(xi_seed, h.roots.wr);
    let xi = pts.xi;
    let xiw = xi * d.omega;
    let evals = Evaluations {
        ql: eval(&q[1].coeffs, xi),
        qr: eval(&q[2].coeffs, xi),
        qm: eval(&q[0].coeffs, xi),
        qo: eval(&q[3].coeffs, xi),
        qc: eval(&q[4].coeffs, xi),
        s1: eval(&sigma[0].coeffs, xi),
        s2: eval(&sigma[1].coeffs, xi),
        s3: eval(&sigma[2].coeffs, xi),
        a: eval(&a_poly, xi),
        b: eval(&b_poly, xi),
        c: eval(&c_poly, xi),
        z: eval(&z_poly, xi),
        zw: eval(&z_poly, xiw),
        t1w: eval(&t1, xiw),
        t2w: eval(&t2, xiw),
    };
    let alpha = challenge_alpha::<E>(&xi_seed, &evals)?;
    debug!("round 3 done");

    // Round 4: W1.
    let c0 = c0_poly(&q, &sigma)?;
    let (q0, _) = divide_by_xm_minus_c(&c0, 8, xi);
    let (q1, _) = divide_by_xm_minus_c(&c1, 4, xi);
    let (q2, _) = divide_by_xm_minus_c(&c2, 3, xi);
    let (q2, _) = divide_by_xm_minus_c(&q2, 3, xiw);
    let alpha2 = alpha.square();
    let mut w1 = q0;
    add_scaled(&mut w1, &q1, alpha);
    add_scaled(&mut w1, &q2, alpha2);
    let pw1 = cm(&w1)?;
    let y = challenge_y::<E>(&alpha, &pw1)?;
    debug!("round 4 done");

    // Round 5: W2.
    let t = QuotientEvals { t0: eval(&t0, xi), t1: eval(&t1, xi), t2: eval(&t2, xi) };
    let [r0, r1, r2] = remainders_at(&evals, &t, xi, d.omega, y).ok_or(QuotientError::NotDivisible("W2"))?;
    let y3 = pow_u64(y, 3);
    let zt0 = pow_u64(y, 8) - xi;
    let zt1 = pow_u64(y, 4) - xi;
    let zt2 = (y3 - xi) * (y3 - xiw);
    let (zt1_inv, zt2_inv) = zt1
        .inverse()
        .zip(zt2.inverse())
        .ok_or(QuotientError::NotDivisible("W2"))?;
    let s1 = alpha * zt0 * zt1_inv;
    let s2 = alpha2 * zt0 * zt2_inv;
    let mut l = c0;
    l[0] -= r0;
    add_scaled(&mut l, &c1, s1);
    l[0] -= s1 * r1;
    add_scaled(&mut l, &c2, s2);
    l[0] -= s2 * r2;
    add_scaled(&mut l, &w1, -zt0);
    let w2 = divide_by_linear(&l, y, "W2")?;

    let proof = Proof { c1: pc1, c2: pc2, w1: pw1, w2: cm(&w2)?, evals };
    info!("fflonk proof ready");
    Ok((proof, public))
}

#[cfg(test)]
mod tests {
    use super::super::setup;
    use super::*;
    use crate::curve::Bn254;
    use crate::zkey::testutil::*;
    use std::io::Cursor;

    fn key(r1cs: &crate::r1cs::R1cs<Bn254>) -> Vec<u8> {
        let mut ptau = ptau::<Bn254>(6);
        setup::new_zkey(r1cs, &mut ptau, Cursor::new(Vec::new())).unwrap().into_inner()
    }

    #[test]
    fn unsatisfied_gate_is_not_divisible() {
        let bytes = key(&square::<Bn254>());
        let bad = vec![Fr::<Bn254>::one(), Fr::<Bn254>::from(10u64), Fr::<Bn254>::from(3u64)];
        assert!(matches!(
            prove::<Bn254, _>(&mut zkey_reader(bytes), &bad),
            Err(ProtocolError::Quotient(QuotientError::NotDivisible("T0")))
        ));
    }

    #[test]
    fn plonk_key_is_rejected() {
        let mut ptau = ptau::<Bn254>(3);
        let bytes = crate::plonk::setup::new_zkey(&square::<Bn254>(), &mut ptau, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        assert!(matches!(
            prove::<Bn254, _>(&mut zkey_reader(bytes), &square_witness::<Bn254>(3)),
            Err(ProtocolError::WrongProtocol { .. })
        ));
    }

    #[test]
    fn blinding_follows_the_rng() {
        let bytes = key(&mixed::<Bn254>());
        let run = |seed: u64| {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            prove_with_rng::<Bn254, _, _>(&mut zkey_reader(bytes.clone()), &mixed_witness::<Bn254>(), &mut rng)
                .unwrap()
        };
        let (p1, public) = run(3);
        assert_eq!(public, vec![Fr::<Bn254>::from(8u64), Fr::<Bn254>::one()]);
        assert_eq!(run(3).0, p1);
        let (p2, _) = run(4);
        assert_ne!(p2.c1, p1.c1);
        // Fixed polynomials open to the same values only at the same point.
        assert_ne!(p2.evals.ql, p1.evals.ql);
    }
}
