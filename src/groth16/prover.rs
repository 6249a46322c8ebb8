//! Groth16 prover.
//!
//! ```text
//! a, b      = Σ coef·w[signal] per row, from section 4
//! c         = a ∘ b                        (on H)
//! p         = A·B − C                       (odd coset or monomial, see HBasis)
//! π_A       = α₁ + Σ w_j·A_j + r·δ₁
//! π_B       = β₂ + Σ w_j·B2_j + s·δ₂
//! π_C       = Σ_priv w_j·C_j + Σ p_i·H_i + s·π_A + r·(β₁ + Σ w_j·B1_j + s·δ₁) − r·s·δ₁
//! ```

#![forbid(unsafe_code)]

use std::io::{Read, Seek};

use ark_ec::short_weierstrass::{Projective, SWCurveConfig};
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{Field, One, PrimeField, UniformRand, Zero};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info};

use super::{read_key_header, HBasis, Proof, SEC_A, SEC_B1, SEC_B2, SEC_C, SEC_COEFS, SEC_H};
use crate::binfile::BinReader;
use crate::codec::CurveCodec;
use crate::curve::{Fr, PairingCurve};
use crate::domain::{pow_u64, root_of_unity, Domain};
use crate::pcs::msm;
use crate::ptau::chunks;
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
    let n = h.domain_size as usize;
    let n_public = h.n_public as usize;
    let domain = Domain::<Fr<E>>::new(n)?;
    info!(n_vars = h.n_vars, domain = n, "groth16 prove");

    let (a, b) = evaluations(zkey, &codec, witness, n)?;
    let c: Vec<Fr<E>> = a.iter().zip(&b).map(|(x, y)| *x * y).collect();
    let p = h_scalars(&domain, a, b, c, HBasis::for_power::<E>(h.power()))?;
    debug!("quotient scalars ready");

    let sum_a = msm_g1_section(zkey, &codec, SEC_A, witness)?;
    let sum_b1 = msm_g1_section(zkey, &codec, SEC_B1, witness)?;
    let sum_b2 = msm_section(zkey, codec.g2_size(), SEC_B2, witness, |b| codec.read_g2_lem_many(b))?;
    let sum_c = msm_g1_section(zkey, &codec, SEC_C, &witness[n_public + 1..])?;
    let sum_h = msm_g1_section(zkey, &codec, SEC_H, &p)?;

    let r = Fr::<E>::rand(rng);
    let s = Fr::<E>::rand(rng);
    let pi_a = h.alpha1.into_group() + sum_a + h.delta1 * r;
    let pi_b = h.beta2.into_group() + sum_b2 + h.delta2 * s;
    let b1 = h.beta1.into_group() + sum_b1 + h.delta1 * s;
    let pi_c = sum_c + sum_h + pi_a * s + b1 * r - h.delta1 * (r * s);

    let proof = Proof { pi_a: pi_a.into_affine(), pi_b: pi_b.into_affine(), pi_c: pi_c.into_affine() };
    Ok((proof, witness[1..=n_public].to_vec()))
}

/// `A` and `B` on the domain from the coefficient section.
fn evaluations<E: PairingCurve, R: Read + Seek>(
    zkey: &mut BinReader<R>,
    codec: &CurveCodec<E>,
    witness: &[Fr<E>],
    n: usize,
) -> Result<(Vec<Fr<E>>, Vec<Fr<E>>), ProtocolError> {
    let mut a = vec![Fr::<E>::zero(); n];
    let mut b = vec![Fr::<E>::zero(); n];
    zkey.start_read_section(SEC_COEFS)?;
    let count = zkey.read_u32()?;
    for _ in 0..count {
        let matrix = zkey.read_u32()?;
        let constraint = zkey.read_u32()? as usize;
        let signal = zkey.read_u32()? as usize;
        let value = codec.read_fr_lem(&zkey.read_bytes(codec.fr_size())?)?;
        let w = witness
            .get(signal)
            .ok_or_else(|| ProtocolError::BadZkey(format!("coefficient references signal {signal}")))?;
        let dst = match matrix {
            0 => &mut a,
            1 => &mut b,
            other => return Err(ProtocolError::BadZkey(format!("coefficient matrix {other}"))),
        };
        let slot = dst
            .get_mut(constraint)
            .ok_or_else(|| ProtocolError::BadZkey(format!("coefficient row {constraint} beyond the domain")))?;
        *slot += value * w;
    }
    zkey.end_read_section(false)?;
    Ok((a, b))
}

/// Scalars paired with the `H` points, from `A`, `B`, `C` on the domain.
pub(crate) fn h_scalars<F: PrimeField>(
    domain: &Domain<F>,
    mut a: Vec<F>,
    mut b: Vec<F>,
    mut c: Vec<F>,
    basis: HBasis,
) -> Result<Vec<F>, ProtocolError> {
    let n = domain.n;
    match basis {
        HBasis::OddCoset => {
            // ω_{2n} moves the domain onto the odd points of the doubled one.
            let shift = root_of_unity::<F>(2 * n as u64)?;
            for v in [&mut a, &mut b, &mut c] {
                domain.ifft(v)?;
                domain.coset_fft(v, shift)?;
            }
            Ok(a.iter().zip(&b).zip(&c).map(|((x, y), z)| *x * y - z).collect())
        }
        HBasis::Monomial => {
            let shift = F::GENERATOR;
            for v in [&mut a, &mut b, &mut c] {
                domain.ifft(v)?;
                domain.coset_fft(v, shift)?;
            }
            let zh_inv = (pow_u64(shift, n as u64) - F::one())
                .inverse()
                .ok_or(crate::domain::DomainError::PointInDomain)?;
            let mut q: Vec<F> = a.iter().zip(&b).zip(&c).map(|((x, y), z)| (*x * y - z) * zh_inv).collect();
            domain.coset_ifft(&mut q, shift)?;
            Ok(q)
        }
    }
}

fn msm_g1_section<E: PairingCurve, R: Read + Seek>(
    zkey: &mut BinReader<R>,
    codec: &CurveCodec<E>,
    id: u32,
    scalars: &[Fr<E>],
) -> Result<Projective<E::G1Config>, ProtocolError> {
    msm_section(zkey, codec.g1_size(), id, scalars, |b| codec.read_g1_lem_many(b))
}

/// `Σ s_i·P_i` over a point section, read in bounded chunks.
fn msm_section<P: SWCurveConfig, R: Read + Seek>(
    zkey: &mut BinReader<R>,
    point_size: usize,
    id: u32,
    scalars: &[P::ScalarField],
    decode: impl Fn(&[u8]) -> Result<Vec<ark_ec::short_weierstrass::Affine<P>>, crate::codec::CodecError>,
) -> Result<Projective<P>, ProtocolError> {
    let size = zkey.section_size(id)?;
    if size != (scalars.len() * point_size) as u64 {
        return Err(ProtocolError::BadZkey(format!(
            "section {id} holds {} points, expected {}",
            size / point_size as u64,
            scalars.len()
        )));
    }
    let mut acc = Projective::<P>::zero();
    for (start, len) in chunks(scalars.len()) {
        let bytes = zkey.read_section_range(id, (start * point_size) as u64, (len * point_size) as u64)?;
        let points = decode(&bytes)?;
        acc += msm(&points, &scalars[start..start + len]);
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Bn254;
    use crate::polynomial::eval;
    use ark_bn254::Fr as F;

    /// `Σ p_i·H_i(τ)` must equal `A(τ)B(τ) − C(τ)` in both bases.
    #[test]
    fn h_scalars_match_the_quotient_identity() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let n = 8;
        let d = Domain::<F>::new(n).unwrap();
        let a: Vec<F> = (0..n).map(|_| F::rand(&mut rng)).collect();
        let b: Vec<F> = (0..n).map(|_| F::rand(&mut rng)).collect();
        let c: Vec<F> = a.iter().zip(&b).map(|(x, y)| *x * y).collect();
        let tau = F::rand(&mut rng);
        let value = |v: &[F]| eval(&d.interpolate(v).unwrap(), tau);
        let expected = value(&a) * value(&b) - value(&c);

        let odd = h_scalars(&d, a.clone(), b.clone(), c.clone(), HBasis::OddCoset).unwrap();
        let d2 = Domain::<F>::new(2 * n).unwrap();
        let l2 = d2.lagrange_evals(tau, 2 * n).unwrap();
        let got: F = odd.iter().enumerate().map(|(i, p)| *p * l2[2 * i + 1]).sum();
        assert_eq!(got, expected);

        let mono = h_scalars(&d, a, b, c, HBasis::Monomial).unwrap();
        let zh = d.vanishing_at(tau);
        let got: F = mono.iter().enumerate().map(|(i, p)| *p * pow_u64(tau, i as u64) * zh).sum();
        assert_eq!(got, expected);
    }

    #[test]
    fn wrong_witness_length_is_rejected() {
        use crate::zkey::testutil::*;
        let mut ptau = ptau::<Bn254>(3);
        let (bytes, _) = super::super::setup::new_zkey(&square::<Bn254>(), &mut ptau, std::io::Cursor::new(Vec::new()))
            .unwrap();
        let mut r = zkey_reader(bytes.into_inner());
        let short = vec![F::one(), F::from(9u64)];
        assert!(matches!(
            prove::<Bn254, _>(&mut r, &short),
            Err(ProtocolError::Wtns(crate::wtns::WtnsError::Length { expected: 3, got: 2 }))
        ));
    }
}
