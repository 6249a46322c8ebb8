//! Evaluation domains and radix-2 transforms
//!
//! A [`Domain`] is the multiplicative subgroup `H = {1, ω, …, ω^{n−1}}` of the
//! scalar field with vanishing polynomial `Z_H(X) = X^n − 1`. Roots of unity
//! are always derived from the field's multiplicative generator `g` as
//! `g^((r−1)/m)`, so roots of different orders are compatible:
//! `ω_{2n}² = ω_n`, `ω_{4n}⁴ = ω_n`, and the order-`3n` root cubes to `ω_n`.
//!
//! The transforms are generic over [`DomainElement`], which covers scalars
//! and projective curve points alike; phase-2 preparation runs the very same
//! inverse transform over G1/G2 points to obtain Lagrange bases.

#![forbid(unsafe_code)]

use std::ops::{Add, Mul, Sub};

use ark_ff::{batch_inversion, FftField, Field, PrimeField};
use num_bigint::BigUint;

use crate::curve::modulus_of;

/// Errors produced by domain construction and transforms.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("domain size must be a positive power of two (got {0})")]
    BadSize(usize),
    #[error("no root of unity of order {0} in the scalar field")]
    NoRoot(u64),
    #[error("omega is not primitive: omega^({order}/{p}) == 1")]
    NotPrimitive { order: u64, p: u64 },
    #[error("vector length must equal the domain size (len={len}, n={n})")]
    BadLen { len: usize, n: usize },
    #[error("evaluation point lies in the domain")]
    PointInDomain,
}

/// Anything the radix-2 butterflies can operate on.
pub trait DomainElement<F>: Copy + Add<Output = Self> + Sub<Output = Self> + Mul<F, Output = Self> {}

impl<T, F> DomainElement<F> for T where T: Copy + Add<Output = T> + Sub<Output = T> + Mul<F, Output = T> {}

/// Power-of-two evaluation domain.
#[derive(Clone, Debug)]
pub struct Domain<F: PrimeField> {
    /// Domain size `n`.
    pub n: usize,
    /// `log2(n)`.
    pub log_n: u32,
    /// Generator `ω`.
    pub omega: F,
    /// `ω⁻¹`.
    pub omega_inv: F,
    /// `n⁻¹`.
    pub n_inv: F,
}

#[inline]
pub fn pow_u64<F: Field>(base: F, exp: u64) -> F {
    base.pow([exp])
}

fn prime_factors(mut n: u64) -> Vec<u64> {
    let mut out = Vec::new();
    let mut p = 2u64;
    while p * p <= n {
        if n % p == 0 {
            out.push(p);
            while n % p == 0 {
                n /= p;
            }
        }
        p += if p == 2 { 1 } else { 2 };
    }
    if n > 1 {
        out.push(n);
    }
    out
}

/// Primitive root of unity of the given order, `g^((r−1)/order)`.
pub fn root_of_unity<F: PrimeField>(order: u64) -> Result<F, DomainError> {
    if order == 0 {
        return Err(DomainError::NoRoot(order));
    }
    let r_minus_1 = modulus_of::<F>() - 1u32;
    let ord = BigUint::from(order);
    if &r_minus_1 % &ord != BigUint::from(0u32) {
        return Err(DomainError::NoRoot(order));
    }
    let w = F::GENERATOR.pow((r_minus_1 / ord).to_u64_digits());
    if !pow_u64(w, order).is_one() {
        return Err(DomainError::NoRoot(order));
    }
    for p in prime_factors(order) {
        if pow_u64(w, order / p).is_one() {
            return Err(DomainError::NotPrimitive { order, p });
        }
    }
    Ok(w)
}

/// `ceil(log2(n))`, with `log2_ceil(0) = log2_ceil(1) = 0`.
pub fn log2_ceil(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

impl<F: PrimeField> Domain<F> {
    pub fn new(n: usize) -> Result<Self, DomainError> {
        if n == 0 || !n.is_power_of_two() {
            return Err(DomainError::BadSize(n));
        }
        if n.trailing_zeros() > <F as FftField>::TWO_ADICITY {
            return Err(DomainError::NoRoot(n as u64));
        }
        let omega = root_of_unity::<F>(n as u64)?;
        Ok(Self {
            n,
            log_n: n.trailing_zeros(),
            omega,
            omega_inv: omega.inverse().ok_or(DomainError::NoRoot(n as u64))?,
            n_inv: F::from(n as u64).inverse().ok_or(DomainError::BadSize(n))?,
        })
    }

    /// Domain of size `2^power`.
    pub fn from_power(power: u32) -> Result<Self, DomainError> {
        if power >= usize::BITS {
            return Err(DomainError::NoRoot(u64::MAX));
        }
        Self::new(1usize << power)
    }

    /// `ω^i`.
    #[inline]
    pub fn element(&self, i: usize) -> F {
        pow_u64(self.omega, (i % self.n) as u64)
    }

    /// All `n` domain points in order.
    pub fn elements(&self) -> Vec<F> {
        let mut out = Vec::with_capacity(self.n);
        let mut w = F::one();
        for _ in 0..self.n {
            out.push(w);
            w *= self.omega;
        }
        out
    }

    /// `Z_H(z) = z^n − 1`.
    #[inline]
    pub fn vanishing_at(&self, z: F) -> F {
        pow_u64(z, self.n as u64) - F::one()
    }

    pub fn ensure_outside(&self, z: F) -> Result<(), DomainError> {
        if self.vanishing_at(z).is_zero() {
            Err(DomainError::PointInDomain)
        } else {
            Ok(())
        }
    }

    /// First `count` Lagrange basis polynomials at `z`:
    /// `L_i(z) = ω^i (z^n − 1) / (n (z − ω^i))`.
    pub fn lagrange_evals(&self, z: F, count: usize) -> Result<Vec<F>, DomainError> {
        self.ensure_outside(z)?;
        let zh = self.vanishing_at(z);
        let mut w = F::one();
        let mut nums = Vec::with_capacity(count);
        let mut dens = Vec::with_capacity(count);
        for _ in 0..count {
            nums.push(w * zh);
            dens.push(F::from(self.n as u64) * (z - w));
            w *= self.omega;
        }
        batch_inversion(&mut dens);
        Ok(nums.into_iter().zip(dens).map(|(a, b)| a * b).collect())
    }

    /// Forward transform: coefficients to evaluations over `H`.
    pub fn fft<T: DomainElement<F>>(&self, a: &mut [T]) -> Result<(), DomainError> {
        self.check_len(a.len())?;
        ntt_in_place(a, self.omega);
        Ok(())
    }

    /// Inverse transform: evaluations over `H` to coefficients.
    pub fn ifft<T: DomainElement<F>>(&self, a: &mut [T]) -> Result<(), DomainError> {
        self.check_len(a.len())?;
        ntt_in_place(a, self.omega_inv);
        for x in a.iter_mut() {
            *x = *x * self.n_inv;
        }
        Ok(())
    }

    /// Evaluate coefficients over the coset `shift·H`.
    pub fn coset_fft(&self, a: &mut [F], shift: F) -> Result<(), DomainError> {
        self.check_len(a.len())?;
        let mut s = F::one();
        for x in a.iter_mut() {
            *x *= s;
            s *= shift;
        }
        ntt_in_place(a, self.omega);
        Ok(())
    }

    /// Interpolate evaluations over the coset `shift·H`.
    pub fn coset_ifft(&self, a: &mut [F], shift: F) -> Result<(), DomainError> {
        self.ifft(a)?;
        let shift_inv = shift.inverse().ok_or(DomainError::PointInDomain)?;
        let mut s = F::one();
        for x in a.iter_mut() {
            *x *= s;
            s *= shift_inv;
        }
        Ok(())
    }

    /// Evaluations on this domain of a coefficient vector of any length
    /// up to `n` (zero padded).
    pub fn evaluate(&self, coeffs: &[F]) -> Result<Vec<F>, DomainError> {
        if coeffs.len() > self.n {
            return Err(DomainError::BadLen { len: coeffs.len(), n: self.n });
        }
        let mut a = coeffs.to_vec();
        a.resize(self.n, F::zero());
        self.fft(&mut a)?;
        Ok(a)
    }

    /// Coefficients of the polynomial interpolating `evals` over this domain.
    pub fn interpolate(&self, evals: &[F]) -> Result<Vec<F>, DomainError> {
        let mut a = evals.to_vec();
        self.ifft(&mut a)?;
        Ok(a)
    }

    fn check_len(&self, len: usize) -> Result<(), DomainError> {
        if len != self.n {
            return Err(DomainError::BadLen { len, n: self.n });
        }
        Ok(())
    }
}

/// In-place bit-reversal followed by iterative Cooley–Tukey butterflies.
fn ntt_in_place<T: DomainElement<F>, F: Field>(a: &mut [T], root: F) {
    let n = a.len();
    debug_assert!(n.is_power_of_two());

    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            a.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let w_len = pow_u64(root, (n / len) as u64);
        let half = len / 2;
        let mut twiddles = Vec::with_capacity(half);
        let mut w = F::one();
        for _ in 0..half {
            twiddles.push(w);
            w *= w_len;
        }
        for start in (0..n).step_by(len) {
            for (i, w) in twiddles.iter().enumerate() {
                let u = a[start + i];
                let v = a[start + i + half] * *w;
                a[start + i] = u + v;
                a[start + i + half] = u - v;
            }
        }
        len <<= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{Bn254, G1Projective};
    use ark_bn254::Fr;
    use ark_ec::{CurveGroup, Group};
    use ark_ff::{UniformRand, Zero};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn roots_are_compatible_across_orders() {
        let w8: Fr = root_of_unity(8).unwrap();
        let w16: Fr = root_of_unity(16).unwrap();
        let w32: Fr = root_of_unity(32).unwrap();
        let w24: Fr = root_of_unity(24).unwrap();
        assert_eq!(w16.square(), w8);
        assert_eq!(pow_u64(w32, 4), w8);
        assert_eq!(pow_u64(w24, 3), w8);
        assert!(root_of_unity::<Fr>(7).is_err());
    }

    #[test]
    fn fft_roundtrip_and_evaluation() {
        let d = Domain::<Fr>::new(16).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let coeffs: Vec<Fr> = (0..16).map(|_| Fr::rand(&mut rng)).collect();
        let evals = d.evaluate(&coeffs).unwrap();
        for (i, x) in d.elements().into_iter().enumerate() {
            let direct = coeffs.iter().rev().fold(Fr::zero(), |acc, c| acc * x + c);
            assert_eq!(evals[i], direct);
        }
        assert_eq!(d.interpolate(&evals).unwrap(), coeffs);
        assert!(matches!(d.interpolate(&evals[..8]), Err(DomainError::BadLen { .. })));
    }

    #[test]
    fn coset_roundtrip() {
        let d = Domain::<Fr>::new(8).unwrap();
        let coeffs: Vec<Fr> = (1..=8u64).map(Fr::from).collect();
        let mut a = coeffs.clone();
        let shift = Fr::GENERATOR;
        d.coset_fft(&mut a, shift).unwrap();
        let x = shift * d.element(3);
        let direct = coeffs.iter().rev().fold(Fr::zero(), |acc, c| acc * x + c);
        assert_eq!(a[3], direct);
        d.coset_ifft(&mut a, shift).unwrap();
        assert_eq!(a, coeffs);
    }

    #[test]
    fn lagrange_basis_matches_interpolation() {
        let d = Domain::<Fr>::new(8).unwrap();
        let z = Fr::from(12345u64);
        let l = d.lagrange_evals(z, 8).unwrap();
        let evals: Vec<Fr> = (0..8u64).map(|i| Fr::from(i * i + 1)).collect();
        let coeffs = d.interpolate(&evals).unwrap();
        let direct = coeffs.iter().rev().fold(Fr::zero(), |acc, c| acc * z + c);
        let via_l: Fr = l.iter().zip(&evals).map(|(a, b)| *a * b).sum();
        assert_eq!(direct, via_l);
        assert!(d.lagrange_evals(d.element(2), 1).is_err());
    }

    #[test]
    fn group_ifft_matches_scalar_ifft() {
        let d = Domain::<Fr>::new(4).unwrap();
        let g = G1Projective::<Bn254>::generator();
        let scalars: Vec<Fr> = (3..7u64).map(Fr::from).collect();
        let mut points: Vec<_> = scalars.iter().map(|s| g * s).collect();
        let coeffs = d.interpolate(&scalars).unwrap();
        d.ifft(&mut points).unwrap();
        for (p, c) in points.iter().zip(&coeffs) {
            assert_eq!(p.into_affine(), (g * c).into_affine());
        }
    }

    #[test]
    fn log2_ceil_values() {
        assert_eq!(log2_ceil(1), 0);
        assert_eq!(log2_ceil(2), 1);
        assert_eq!(log2_ceil(5), 3);
        assert_eq!(log2_ceil(8), 3);
    }
}
