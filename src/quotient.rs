//! Quotient construction
//!
//! We construct `Q` such that `R(X) = (X^m − c)·Q(X) + Rem(X)` with
//! `deg(Rem) < m`. The same recurrence serves every exact division in the
//! provers: by the vanishing polynomial `X^n − 1`, by the linear factors
//! `X − ξ` of the openings, and by the `X^k − ξ` factors of FFLONK.
//!
//! ## Split evaluations
//! The provers evaluate the constraint identity over the size-`4n` domain,
//! which contains `H` itself; on those points `Z_H` vanishes and a plain
//! division is impossible. Every blinded polynomial is therefore carried as
//! a pair `(e, ez)` meaning `e + Z_H·ez` (see [`Split`]). Products keep that
//! shape, so the identity arrives as `r + Z_H·rz` and
//! `T = r / Z_H + rz` where only the first division has to be exact.

#![forbid(unsafe_code)]

use std::ops::{Add, Mul, Sub};

use ark_ff::{Field, PrimeField, Zero};

use crate::domain::{Domain, DomainError};

/// Errors surfaced by the quotient builder.
#[derive(Debug, thiserror::Error)]
pub enum QuotientError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{0} polynomial is not divisible")]
    NotDivisible(&'static str),
    #[error("{what} quotient has degree {degree}, bound is {bound}")]
    DegreeTooHigh { what: &'static str, degree: usize, bound: usize },
}

/// Long division by `X^m − c` on low→high coefficients.
///
/// ```text
/// for i = deg .. m:
///    q_{i-m} += r_i
///    r_{i-m} += c * r_i
///    r_i      = 0
/// ```
/// Returns `(q, rem)` with `rem.len() == min(m, r.len())`.
pub fn divide_by_xm_minus_c<F: Field>(r: &[F], m: usize, c: F) -> (Vec<F>, Vec<F>) {
    let mut r = r.to_vec();
    if r.len() <= m {
        return (Vec::new(), r);
    }
    let mut q = vec![F::zero(); r.len() - m];
    for i in (m..r.len()).rev() {
        let coeff = r[i];
        if !coeff.is_zero() {
            q[i - m] += coeff;
            r[i - m] += c * coeff;
            r[i] = F::zero();
        }
    }
    r.truncate(m);
    (q, r)
}

/// Exact division by `X^m − c`; a non-zero remainder is an error.
pub fn divide_exact<F: Field>(r: &[F], m: usize, c: F, what: &'static str) -> Result<Vec<F>, QuotientError> {
    let (q, rem) = divide_by_xm_minus_c(r, m, c);
    if rem.iter().any(|x| !x.is_zero()) {
        return Err(QuotientError::NotDivisible(what));
    }
    Ok(q)
}

/// Exact division by `X − z`.
pub fn divide_by_linear<F: Field>(r: &[F], z: F, what: &'static str) -> Result<Vec<F>, QuotientError> {
    divide_exact(r, 1, z, what)
}

/// Value `e + Z_H·ez` at one point of the `4n` domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Split<F> {
    pub e: F,
    pub ez: F,
}

impl<F: Field> Split<F> {
    #[inline]
    pub fn new(e: F, ez: F) -> Self {
        Self { e, ez }
    }

    /// A value with no `Z_H` part.
    #[inline]
    pub fn plain(e: F) -> Self {
        Self { e, ez: F::zero() }
    }

    /// Product where `zh` is `Z_H` at the current point.
    #[inline]
    pub fn mul2(self, o: Self, zh: F) -> Self {
        Self { e: self.e * o.e, ez: self.e * o.ez + self.ez * o.e + zh * self.ez * o.ez }
    }

    #[inline]
    pub fn mul3(self, b: Self, c: Self, zh: F) -> Self {
        self.mul2(b, zh).mul2(c, zh)
    }

    #[inline]
    pub fn mul4(self, b: Self, c: Self, d: Self, zh: F) -> Self {
        self.mul2(b, zh).mul2(c, zh).mul2(d, zh)
    }

    #[inline]
    pub fn scale(self, s: F) -> Self {
        Self { e: self.e * s, ez: self.ez * s }
    }
}

impl<F: Field> Add for Split<F> {
    type Output = Self;
    fn add(self, o: Self) -> Self {
        Self { e: self.e + o.e, ez: self.ez + o.ez }
    }
}

impl<F: Field> Sub for Split<F> {
    type Output = Self;
    fn sub(self, o: Self) -> Self {
        Self { e: self.e - o.e, ez: self.ez - o.ez }
    }
}

impl<F: Field> Mul<F> for Split<F> {
    type Output = Self;
    fn mul(self, s: F) -> Self {
        self.scale(s)
    }
}

/// Values of `Z_H` on the `4n` domain; they repeat with period 4.
pub fn vanishing_on_extended<F: PrimeField>(d4: &Domain<F>) -> [F; 4] {
    let n = d4.n / 4;
    let step = d4.element(n);
    let mut out = [F::zero(); 4];
    let mut w = F::one();
    for v in out.iter_mut() {
        *v = w - F::one();
        w *= step;
    }
    out
}

/// Evaluations of `c` over the `4n` domain (zero padded).
pub fn extend<F: PrimeField>(d4: &Domain<F>, c: &[F]) -> Result<Vec<F>, QuotientError> {
    Ok(d4.evaluate(c)?)
}

/// Split evaluations over the `4n` domain of `c(X) + b(X)·Z_H(X)`, given
/// the unblinded coefficients `c` and blinding polynomial `b`.
pub fn extend_split<F: PrimeField>(d4: &Domain<F>, c: &[F], b: &[F]) -> Result<Vec<Split<F>>, QuotientError> {
    let e = d4.evaluate(c)?;
    let ez = d4.evaluate(b)?;
    Ok(e.into_iter().zip(ez).map(|(e, ez)| Split::new(e, ez)).collect())
}

/// `(r + Z_H·rz) / Z_H` from split evaluations over the `4n` domain.
pub fn quotient_from_split<F: PrimeField>(
    d4: &Domain<F>,
    n: usize,
    evals: Vec<Split<F>>,
    what: &'static str,
) -> Result<Vec<F>, QuotientError> {
    let (mut r, mut rz): (Vec<F>, Vec<F>) = evals.into_iter().map(|s| (s.e, s.ez)).unzip();
    d4.ifft(&mut r)?;
    d4.ifft(&mut rz)?;
    let mut t = divide_exact(&r, n, F::one(), what)?;
    crate::polynomial::add_scaled(&mut t, &rz, F::one());
    crate::polynomial::trim(&mut t);
    Ok(t)
}

/// Fail when `c` has a non-zero coefficient at or beyond `bound`.
pub fn check_degree<F: Field>(c: &[F], bound: usize, what: &'static str) -> Result<(), QuotientError> {
    match crate::polynomial::degree(c) {
        Some(d) if d >= bound => Err(QuotientError::DegreeTooHigh { what, degree: d, bound }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polynomial::eval;
    use ark_bn254::Fr;
    use ark_ff::One;

    fn f(v: &[u64]) -> Vec<Fr> {
        v.iter().map(|x| Fr::from(*x)).collect()
    }

    #[test]
    fn division_with_remainder() {
        // (X^3 + 2X + 5) = (X^2 − 3)·X + (5X + 5)
        let (q, rem) = divide_by_xm_minus_c(&f(&[5, 2, 0, 1]), 2, Fr::from(3u64));
        assert_eq!(q, f(&[0, 1]));
        assert_eq!(rem, f(&[5, 5]));
    }

    #[test]
    fn exact_linear_division() {
        // (X − 2)(X + 1) = X^2 − X − 2
        let p = vec![-Fr::from(2u64), -Fr::one(), Fr::one()];
        assert_eq!(divide_by_linear(&p, Fr::from(2u64), "test").unwrap(), vec![Fr::one(), Fr::one()]);
        assert!(matches!(
            divide_by_linear(&p, Fr::from(3u64), "test"),
            Err(QuotientError::NotDivisible("test"))
        ));
    }

    #[test]
    fn split_quotient_recovers_product() {
        // P = A·B with A = a + Z_H·ba on n = 4; T = (P − P mod Z_H)/Z_H.
        let n = 4;
        let d4 = Domain::<Fr>::new(4 * n).unwrap();
        let zh = vanishing_on_extended(&d4);
        let a = f(&[1, 2, 3, 4]);
        let ba = f(&[7, 1]);
        let b = f(&[5, 0, 1]);
        let sa = extend_split(&d4, &a, &ba).unwrap();
        let sb = extend_split(&d4, &b, &[]).unwrap();
        // Subtract the part that is non-zero on H so the identity vanishes there.
        let d = Domain::<Fr>::new(n).unwrap();
        let prod_on_h: Vec<Fr> = d.elements().iter().map(|x| eval(&a, *x) * eval(&b, *x)).collect();
        let low = d.interpolate(&prod_on_h).unwrap();
        let sl = extend_split(&d4, &low, &[]).unwrap();
        let evals: Vec<_> = (0..4 * n).map(|i| sa[i].mul2(sb[i], zh[i % 4]) - sl[i]).collect();
        let t = quotient_from_split(&d4, n, evals, "test").unwrap();

        let x = Fr::from(11u64);
        let full_a = eval(&a, x) + eval(&ba, x) * (d.vanishing_at(x));
        let expected = (full_a * eval(&b, x) - eval(&low, x)) / d.vanishing_at(x);
        assert_eq!(eval(&t, x), expected);
        assert!(check_degree(&t, 16, "t").is_ok());
        assert!(check_degree(&t, 2, "t").is_err());
    }
}
