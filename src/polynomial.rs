//! Dense coefficient-form helpers (low→high order)
//!
//! Polynomials are plain `Vec<F>` / `&[F]` with `c[i]` the coefficient of
//! `X^i`. Only the handful of operations the provers need live here;
//! division by `X^m − c` is in [`crate::quotient`].

#![forbid(unsafe_code)]

use ark_ff::{Field, Zero};

/// Horner evaluation.
pub fn eval<F: Field>(c: &[F], x: F) -> F {
    c.iter().rev().fold(F::zero(), |acc, v| acc * x + v)
}

/// `a += s·b`, growing `a` as needed.
pub fn add_scaled<F: Field>(a: &mut Vec<F>, b: &[F], s: F) {
    if a.len() < b.len() {
        a.resize(b.len(), F::zero());
    }
    for (x, y) in a.iter_mut().zip(b) {
        *x += s * y;
    }
}

/// `a += s·X^shift·b`.
pub fn add_scaled_shifted<F: Field>(a: &mut Vec<F>, b: &[F], s: F, shift: usize) {
    if a.len() < b.len() + shift {
        a.resize(b.len() + shift, F::zero());
    }
    for (i, y) in b.iter().enumerate() {
        a[i + shift] += s * y;
    }
}

/// `c(X) + (Σ blind_j X^j)·(X^n − 1)`: blinds a polynomial without changing
/// its values on the size-`n` domain.
pub fn blind<F: Field>(c: &[F], n: usize, blind: &[F]) -> Vec<F> {
    let mut out = c.to_vec();
    out.resize(out.len().max(n + blind.len()), F::zero());
    for (j, b) in blind.iter().enumerate() {
        out[j] -= b;
        out[j + n] += b;
    }
    out
}

/// Interleave: `Σ_j X^j · P_j(X^k)` where `k = polys.len()`.
pub fn interleave<F: Field>(polys: &[&[F]]) -> Vec<F> {
    let k = polys.len();
    let max = polys.iter().map(|p| p.len()).max().unwrap_or(0);
    let mut out = vec![F::zero(); max * k];
    for (j, p) in polys.iter().enumerate() {
        for (i, v) in p.iter().enumerate() {
            out[i * k + j] = *v;
        }
    }
    trim(&mut out);
    out
}

/// Compose with a power: `P(X^k)`.
pub fn stretch<F: Field>(c: &[F], k: usize) -> Vec<F> {
    let mut out = vec![F::zero(); c.len().saturating_sub(1) * k + 1];
    for (i, v) in c.iter().enumerate() {
        out[i * k] = *v;
    }
    out
}

/// Drop trailing zero coefficients.
pub fn trim<F: Field>(c: &mut Vec<F>) {
    while c.last().map_or(false, |x| x.is_zero()) {
        c.pop();
    }
}

/// Degree, with `None` for the zero polynomial.
pub fn degree<F: Field>(c: &[F]) -> Option<usize> {
    c.iter().rposition(|x| !x.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;
    use ark_ff::One;

    fn f(v: &[u64]) -> Vec<Fr> {
        v.iter().map(|x| Fr::from(*x)).collect()
    }

    #[test]
    fn horner_and_scaling() {
        let p = f(&[1, 2, 3]);
        assert_eq!(eval(&p, Fr::from(2u64)), Fr::from(17u64));
        let mut a = f(&[1]);
        add_scaled(&mut a, &p, Fr::from(2u64));
        assert_eq!(a, f(&[3, 4, 6]));
        add_scaled_shifted(&mut a, &f(&[1]), Fr::one(), 4);
        assert_eq!(a, f(&[3, 4, 6, 0, 1]));
    }

    #[test]
    fn blinding_vanishes_on_domain() {
        let d = crate::domain::Domain::<Fr>::new(4).unwrap();
        let p = f(&[5, 6, 7, 8]);
        let b = blind(&p, 4, &f(&[9, 10]));
        assert_eq!(degree(&b), Some(5));
        for x in d.elements() {
            assert_eq!(eval(&b, x), eval(&p, x));
        }
    }

    #[test]
    fn interleave_matches_definition() {
        let p0 = f(&[1, 2]);
        let p1 = f(&[3, 4]);
        let c = interleave(&[&p0, &p1]);
        let x = Fr::from(3u64);
        let x2 = x * x;
        assert_eq!(eval(&c, x), eval(&p0, x2) + x * eval(&p1, x2));
        let s = stretch(&p1, 3);
        assert_eq!(eval(&s, x), eval(&p1, x * x2));
    }
}
