//! Lowering R1CS to PLONK gates
//!
//! Every gate reads three wires `(a, b, c)` and enforces
//!
//! ```text
//! qm·a·b + ql·a + qr·b + qo·c + qc = 0
//! ```
//!
//! Rows are laid out as:
//! - one gate `a − PI = 0` per public signal, first;
//! - for each R1CS constraint, the gates of its reduction.
//!
//! A linear combination wider than the gate allows (one wire per side of a
//! product, three for a sum) is folded two terms at a time into fresh
//! *addition* wires `w = k1·s1 + k2·s2`, each with its own gate. Signal 0
//! is the constant one and folds into the constant of a combination.
//!
//! Both PLONK and FFLONK keys are built from this lowering.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, VecDeque};

use ark_ff::{FftField, Field, PrimeField};
use tracing::warn;

use crate::curve::{Fr, PairingCurve};
use crate::domain::{log2_ceil, pow_u64};
use crate::r1cs::{R1cs, R1csError};
use crate::wtns;
use crate::zkey::ProtocolError;

/// Smallest PLONK domain.
pub const MIN_POWER: u32 = 3;

/// One row of the circuit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gate<F> {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub qm: F,
    pub ql: F,
    pub qr: F,
    pub qo: F,
    pub qc: F,
}

impl<F: Field> Gate<F> {
    /// Gate that only reads signal 0 and enforces nothing.
    pub fn empty() -> Self {
        Self { a: 0, b: 0, c: 0, qm: F::zero(), ql: F::zero(), qr: F::zero(), qo: F::zero(), qc: F::zero() }
    }

    pub fn holds(&self, a: F, b: F, c: F) -> bool {
        (self.qm * a * b + self.ql * a + self.qr * b + self.qo * c + self.qc).is_zero()
    }
}

/// Internal wire `k1·w[s1] + k2·w[s2]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Addition<F> {
    pub s1: u32,
    pub s2: u32,
    pub k1: F,
    pub k2: F,
}

/// A circuit lowered to gates. Wires `< n_vars` index the witness,
/// wire `n_vars + i` is addition `i`.
#[derive(Clone, Debug)]
pub struct PlonkCircuit<F> {
    pub n_vars: u32,
    pub n_public: u32,
    pub gates: Vec<Gate<F>>,
    pub additions: Vec<Addition<F>>,
}

/// Linear combination with signal 0 split off.
#[derive(Clone, Debug)]
struct Reduced<F> {
    k: F,
    terms: VecDeque<(u32, F)>,
}

impl<F: Field> Reduced<F> {
    fn new(lc: &[(u32, F)]) -> Self {
        let mut merged = BTreeMap::new();
        for (s, v) in lc {
            *merged.entry(*s).or_insert_with(F::zero) += v;
        }
        let k = merged.remove(&0).unwrap_or_else(F::zero);
        Self { k, terms: merged.into_iter().filter(|(_, v)| !v.is_zero()).collect() }
    }

    fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// `k·self − other`.
    fn join(&self, k: F, other: &Self) -> Self {
        let mut merged = BTreeMap::new();
        for (s, v) in &self.terms {
            *merged.entry(*s).or_insert_with(F::zero) += k * v;
        }
        for (s, v) in &other.terms {
            *merged.entry(*s).or_insert_with(F::zero) -= v;
        }
        Self {
            k: k * self.k - other.k,
            terms: merged.into_iter().filter(|(_, v)| !v.is_zero()).collect(),
        }
    }

    /// `i`-th `(signal, coefficient)`, or a zero term on signal 0.
    fn term(&self, i: usize) -> (u32, F) {
        self.terms.get(i).copied().unwrap_or((0, F::zero()))
    }
}

struct Lowering<F> {
    next_wire: u32,
    gates: Vec<Gate<F>>,
    additions: Vec<Addition<F>>,
}

impl<F: Field> Lowering<F> {
    /// Fold terms into addition wires until at most `max` remain.
    fn reduce(&mut self, mut lc: Reduced<F>, max: usize) -> Reduced<F> {
        while lc.terms.len() > max {
            let (Some((s1, k1)), Some((s2, k2))) = (lc.terms.pop_front(), lc.terms.pop_front()) else {
                break;
            };
            let so = self.next_wire;
            self.next_wire += 1;
            self.gates.push(Gate { a: s1, b: s2, c: so, qm: F::zero(), ql: -k1, qr: -k2, qo: F::one(), qc: F::zero() });
            self.additions.push(Addition { s1, s2, k1, k2 });
            lc.terms.push_back((so, F::one()));
        }
        lc
    }

    /// `lc = 0`.
    fn add_sum(&mut self, lc: Reduced<F>) {
        let lc = self.reduce(lc, 3);
        let (a, ka) = lc.term(0);
        let (b, kb) = lc.term(1);
        let (c, kc) = lc.term(2);
        self.gates.push(Gate { a, b, c, qm: F::zero(), ql: ka, qr: kb, qo: kc, qc: lc.k });
    }

    /// `a·b = c` with every side reduced to one wire plus a constant.
    fn add_mul(&mut self, a: Reduced<F>, b: Reduced<F>, c: Reduced<F>) {
        let a = self.reduce(a, 1);
        let b = self.reduce(b, 1);
        let c = self.reduce(c, 1);
        let (sa, ca) = a.term(0);
        let (sb, cb) = b.term(0);
        let (sc, cc) = c.term(0);
        self.gates.push(Gate {
            a: sa,
            b: sb,
            c: sc,
            qm: ca * cb,
            ql: ca * b.k,
            qr: cb * a.k,
            qo: -cc,
            qc: a.k * b.k - c.k,
        });
    }
}

impl<F: PrimeField> PlonkCircuit<F> {
    pub fn from_r1cs<E: PairingCurve<ScalarField = F>>(r1cs: &R1cs<E>) -> Result<Self, ProtocolError> {
        let n_vars = r1cs.header.n_vars;
        let n_public = r1cs.n_public() as u32;
        let mut l = Lowering { next_wire: n_vars, gates: Vec::new(), additions: Vec::new() };
        for s in 1..=n_public {
            l.gates.push(Gate { a: s, ql: F::one(), ..Gate::empty() });
        }
        for constraint in &r1cs.constraints {
            for (signal, _) in constraint.a.iter().chain(&constraint.b).chain(&constraint.c) {
                if *signal >= n_vars {
                    return Err(R1csError::SignalOutOfRange { signal: *signal, n_vars }.into());
                }
            }
            let a = Reduced::new(&constraint.a);
            let b = Reduced::new(&constraint.b);
            let c = Reduced::new(&constraint.c);
            if a.is_constant() {
                let k = a.k;
                l.add_sum(b.join(k, &c));
            } else if b.is_constant() {
                let k = b.k;
                l.add_sum(a.join(k, &c));
            } else {
                l.add_mul(a, b, c);
            }
        }
        Ok(Self { n_vars, n_public, gates: l.gates, additions: l.additions })
    }

    /// Total number of wires, witness plus additions.
    pub fn n_wires(&self) -> usize {
        self.n_vars as usize + self.additions.len()
    }

    /// `log2` of the domain: `max(3, ceil(log2(gates)))`.
    pub fn power(&self) -> u32 {
        log2_ceil(self.gates.len()).max(MIN_POWER)
    }

    /// Wire of `row`, `col` (0 = a, 1 = b, 2 = c); padding rows read signal 0.
    pub fn wire(&self, row: usize, col: usize) -> u32 {
        self.gates.get(row).map_or(0, |g| [g.a, g.b, g.c][col])
    }

    /// Copy permutation over positions `col·n + row`: every wire's
    /// occurrences form one cycle.
    pub fn permutation(&self, n: usize) -> Vec<usize> {
        let mut sigma: Vec<usize> = (0..3 * n).collect();
        let mut first = vec![None; self.n_wires()];
        let mut last: Vec<Option<usize>> = vec![None; self.n_wires()];
        for row in 0..n {
            for col in 0..3 {
                let s = self.wire(row, col) as usize;
                let p = col * n + row;
                match last[s] {
                    None => first[s] = Some(p),
                    Some(prev) => sigma[prev] = p,
                }
                last[s] = Some(p);
            }
        }
        let mut unused = 0usize;
        for (f, l) in first.iter().zip(&last) {
            match (f, l) {
                (Some(f), Some(l)) => sigma[*l] = *f,
                _ => unused += 1,
            }
        }
        if unused > 0 {
            warn!(unused, "signals that appear in no gate");
        }
        sigma
    }

    /// Witness followed by the addition wires.
    pub fn extended_witness(&self, witness: &[F]) -> Result<Vec<F>, ProtocolError> {
        check_witness(witness, self.n_vars as usize)?;
        internal_witness(witness, &self.additions)
    }
}

fn check_witness<F: PrimeField>(witness: &[F], n_vars: usize) -> Result<(), ProtocolError> {
    if witness.len() != n_vars {
        return Err(wtns::WtnsError::Length { expected: n_vars, got: witness.len() }.into());
    }
    if !witness.first().map_or(false, |w| w.is_one()) {
        return Err(wtns::WtnsError::NotOne.into());
    }
    Ok(())
}

/// Wire values from a witness and the addition table, as the prover reads
/// them from a key.
pub fn internal_witness<F: Field>(witness: &[F], additions: &[Addition<F>]) -> Result<Vec<F>, ProtocolError> {
    let mut w = witness.to_vec();
    for (i, add) in additions.iter().enumerate() {
        let get = |s: u32| {
            w.get(s as usize)
                .copied()
                .ok_or_else(|| ProtocolError::BadZkey(format!("addition {i} reads wire {s}")))
        };
        let v = add.k1 * get(add.s1)? + add.k2 * get(add.s2)?;
        w.push(v);
    }
    Ok(w)
}

/// `k1`, `k2` with `H`, `k1·H` and `k2·H` pairwise disjoint.
pub fn coset_shifts<F: PrimeField>(power: u32) -> (F, F) {
    let n = 1u64 << power;
    let in_coset = |x: F, k: F| k.inverse().map_or(true, |inv| pow_u64(x * inv, n).is_one());
    let mut k1 = F::from(2u64);
    while in_coset(k1, F::one()) {
        k1 += F::one();
    }
    let mut k2 = k1 + F::one();
    while in_coset(k2, F::one()) || in_coset(k2, k1) {
        k2 += F::one();
    }
    (k1, k2)
}

/// Largest circuit power whose `factor·n` domain still fits the field.
pub fn check_power<E: PairingCurve>(power: u32, extension_log: u32) -> Result<(), ProtocolError> {
    let max = <Fr<E> as FftField>::TWO_ADICITY - extension_log;
    if power > max {
        return Err(ProtocolError::CircuitTooBig { power, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Bn254;
    use crate::r1cs::Constraint;
    use crate::zkey::testutil::*;
    use ark_bn254::Fr as F;
    use ark_ff::{One, Zero};

    /// Row identity including PI(ω^i) = -public_i on the leading rows.
    fn satisfied(c: &PlonkCircuit<F>, w: &[F]) -> bool {
        let w = c.extended_witness(w).unwrap();
        c.gates.iter().enumerate().all(|(i, g)| {
            let (a, b, o) = (w[g.a as usize], w[g.b as usize], w[g.c as usize]);
            let pi = if i < c.n_public as usize { -w[1 + i] } else { F::zero() };
            Gate { qc: g.qc + pi, ..*g }.holds(a, b, o)
        })
    }

    #[test]
    fn square_circuit_gates() {
        let c = PlonkCircuit::from_r1cs(&square::<Bn254>()).unwrap();
        // Public gate, then x·x − y.
        assert_eq!(c.gates.len(), 2);
        assert_eq!(c.gates[0], Gate { a: 1, ql: F::one(), ..Gate::empty() });
        assert_eq!((c.gates[1].a, c.gates[1].b, c.gates[1].c), (2, 2, 1));
        assert_eq!(c.gates[1].qo, -F::one());
        assert!(c.additions.is_empty());
        assert_eq!(c.power(), 3);
        assert!(satisfied(&c, &square_witness::<Bn254>(4)));
    }

    #[test]
    fn wide_combinations_use_additions() {
        let c = PlonkCircuit::from_r1cs(&mixed::<Bn254>()).unwrap();
        // `c + a` on one side of a product and the 4-term sum each need
        // one addition wire.
        assert_eq!(c.additions.len(), 2);
        assert_eq!(c.n_wires(), 8);
        assert_eq!(c.gates.len(), 8);
        assert!(satisfied(&c, &mixed_witness::<Bn254>()));
        let mut bad = mixed_witness::<Bn254>();
        bad[4] += F::one();
        assert!(!satisfied(&c, &bad));
    }

    #[test]
    fn constant_product_side_becomes_a_sum() {
        // 3·(x + y) = z
        let three = F::from(3u64);
        let r1cs = R1cs::<Bn254>::new(
            4,
            0,
            0,
            vec![Constraint { a: vec![(0, three)], b: vec![(1, F::one()), (2, F::one())], c: vec![(3, F::one())] }],
        );
        let c = PlonkCircuit::from_r1cs(&r1cs).unwrap();
        assert_eq!(c.gates.len(), 1);
        let g = &c.gates[0];
        assert!(g.qm.is_zero());
        assert_eq!((g.ql, g.qr, g.qo), (three, three, -F::one()));
        let w = [F::one(), F::from(2u64), F::from(5u64), F::from(21u64)];
        assert!(satisfied(&c, &w));
    }

    #[test]
    fn permutation_links_equal_wires() {
        let c = PlonkCircuit::from_r1cs(&square::<Bn254>()).unwrap();
        let n = 8;
        let sigma = c.permutation(n);
        // Follow each cycle: every position in it carries the same wire.
        for start in 0..3 * n {
            let wire = c.wire(start % n, start / n);
            let mut p = sigma[start];
            let mut steps = 0;
            while p != start {
                assert_eq!(c.wire(p % n, p / n), wire);
                p = sigma[p];
                steps += 1;
                assert!(steps <= 3 * n);
            }
        }
        // x sits at a and b of row 1.
        assert_eq!(sigma[n + 1], 1);
        assert_eq!(sigma[1], n + 1);
    }

    #[test]
    fn coset_shifts_avoid_the_domain() {
        let (k1, k2): (F, F) = coset_shifts(3);
        assert_eq!(k1, F::from(2u64));
        assert_eq!(k2, F::from(3u64));
        let n = 8u64;
        assert!(!pow_u64(k1, n).is_one());
        assert!(!pow_u64(k2, n).is_one());
        assert!(!pow_u64(k2 / k1, n).is_one());
    }

    #[test]
    fn out_of_range_signal_is_rejected() {
        let r1cs = R1cs::<Bn254>::new(2, 0, 0, vec![Constraint { a: vec![(5, F::one())], b: vec![], c: vec![] }]);
        assert!(matches!(
            PlonkCircuit::from_r1cs(&r1cs),
            Err(ProtocolError::R1cs(R1csError::SignalOutOfRange { signal: 5, n_vars: 2 }))
        ));
    }
}
