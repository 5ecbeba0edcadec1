//! RNS polynomial in `Z_Q[X]/(X^N + 1)`, one residue vector per basis prime.

use crate::context::RingContext;
use crate::ntt::{add_mod, center, mod_inv, mul_mod, reduce_signed, sub_mod};
use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::Arc;

/// Standard deviation of the error distribution.
pub const ERROR_STD_DEV: f64 = 3.19;

/// residues[i][j] = coefficient (or evaluation) j modulo `ring.moduli[basis[i]]`.
#[derive(Clone, Debug)]
pub struct Polynomial {
    ring: Arc<RingContext>,
    /// Indices into `ring.moduli` this polynomial lives over.
    pub basis: Vec<usize>,
    /// One residue vector per basis prime.
    pub residues: Vec<Vec<u64>>,
    /// Evaluation form when set, coefficient form otherwise.
    pub ntt_form: bool,
}

impl Polynomial {
    /// Zero polynomial over `basis`.
    pub fn zero(ring: &Arc<RingContext>, basis: &[usize], ntt_form: bool) -> Self {
        Self {
            ring: Arc::clone(ring),
            basis: basis.to_vec(),
            residues: vec![vec![0; ring.degree]; basis.len()],
            ntt_form,
        }
    }

    /// Coefficient-form polynomial from small signed coefficients.
    pub fn from_signed(ring: &Arc<RingContext>, basis: &[usize], coeffs: &[i64]) -> Self {
        assert_eq!(coeffs.len(), ring.degree, "coefficient count must equal ring degree");
        let residues = basis
            .iter()
            .map(|&idx| {
                let q = ring.moduli[idx];
                coeffs.iter().map(|&c| reduce_signed(i128::from(c), q)).collect()
            })
            .collect();
        Self {
            ring: Arc::clone(ring),
            basis: basis.to_vec(),
            residues,
            ntt_form: false,
        }
    }

    /// Constant polynomial `value`, directly in evaluation form.
    pub fn constant(ring: &Arc<RingContext>, basis: &[usize], value: i128) -> Self {
        let residues = basis
            .iter()
            .map(|&idx| vec![reduce_signed(value, ring.moduli[idx]); ring.degree])
            .collect();
        Self {
            ring: Arc::clone(ring),
            basis: basis.to_vec(),
            residues,
            ntt_form: true,
        }
    }

    /// Uniform polynomial, sampled in evaluation form.
    pub fn random<R: Rng>(ring: &Arc<RingContext>, basis: &[usize], rng: &mut R) -> Self {
        let residues = basis
            .iter()
            .map(|&idx| {
                let q = ring.moduli[idx];
                (0..ring.degree).map(|_| rng.gen_range(0..q)).collect()
            })
            .collect();
        Self {
            ring: Arc::clone(ring),
            basis: basis.to_vec(),
            residues,
            ntt_form: true,
        }
    }

    /// Coefficients uniform in {-1, 0, 1}, returned in evaluation form.
    pub fn ternary<R: Rng>(ring: &Arc<RingContext>, basis: &[usize], rng: &mut R) -> Self {
        let coeffs: Vec<i64> = (0..ring.degree).map(|_| rng.gen_range(-1..=1)).collect();
        let mut p = Self::from_signed(ring, basis, &coeffs);
        p.forward();
        p
    }

    /// Rounded Gaussian coefficients, returned in evaluation form.
    pub fn gaussian<R: Rng>(ring: &Arc<RingContext>, basis: &[usize], rng: &mut R) -> Self {
        let normal = Normal::new(0.0, ERROR_STD_DEV).expect("valid standard deviation");
        let coeffs: Vec<i64> = (0..ring.degree)
            .map(|_| normal.sample(rng).round() as i64)
            .collect();
        let mut p = Self::from_signed(ring, basis, &coeffs);
        p.forward();
        p
    }

    /// Prime at position `pos` of the basis.
    pub fn modulus(&self, pos: usize) -> u64 {
        self.ring.moduli[self.basis[pos]]
    }

    /// Coefficient → evaluation form (no-op if already there).
    pub fn forward(&mut self) {
        if self.ntt_form {
            return;
        }
        for (res, &idx) in self.residues.iter_mut().zip(&self.basis) {
            self.ring.table(idx).forward(res);
        }
        self.ntt_form = true;
    }

    /// Evaluation → coefficient form (no-op if already there).
    pub fn backward(&mut self) {
        if !self.ntt_form {
            return;
        }
        for (res, &idx) in self.residues.iter_mut().zip(&self.basis) {
            self.ring.table(idx).backward(res);
        }
        self.ntt_form = false;
    }

    /// Keep only the residues of `basis`, which must be a subset of ours.
    pub fn restrict(&self, basis: &[usize]) -> Self {
        let residues = basis
            .iter()
            .map(|idx| {
                let pos = self
                    .basis
                    .iter()
                    .position(|b| b == idx)
                    .expect("restricted basis must be a subset");
                self.residues[pos].clone()
            })
            .collect();
        Self {
            ring: Arc::clone(&self.ring),
            basis: basis.to_vec(),
            residues,
            ntt_form: self.ntt_form,
        }
    }

    /// Multiply by an integer constant (valid in either form).
    pub fn scalar_mul(&self, c: i128) -> Self {
        let mut out = self.clone();
        for (pos, res) in out.residues.iter_mut().enumerate() {
            let q = self.modulus(pos);
            let k = reduce_signed(c, q);
            for x in res.iter_mut() {
                *x = mul_mod(*x, k, q);
            }
        }
        out
    }

    /// Divide by the last basis prime with rounding and drop it.
    ///
    /// This is both the CKKS rescale and the mod-down by P after key switching.
    /// The result is returned in evaluation form.
    pub fn divide_by_last(&self) -> Self {
        assert!(self.basis.len() > 1, "cannot drop the only remaining prime");
        let mut coeff = self.clone();
        coeff.backward();
        let last_pos = coeff.basis.len() - 1;
        let q_last = coeff.modulus(last_pos);
        let last = coeff.residues.pop().expect("non-empty basis");
        coeff.basis.pop();

        for (pos, res) in coeff.residues.iter_mut().enumerate() {
            let q = coeff.ring.moduli[coeff.basis[pos]];
            let inv = mod_inv(q_last % q, q);
            for (x, &l) in res.iter_mut().zip(&last) {
                let l = reduce_signed(center(l, q_last), q);
                *x = mul_mod(sub_mod(*x, l, q), inv, q);
            }
        }
        coeff.forward();
        coeff
    }

    /// Lift residue `pos` (coefficient form, centred) onto `target`, in evaluation form.
    pub fn lift_residue(&self, pos: usize, target: &[usize]) -> Self {
        assert!(!self.ntt_form, "digits are taken from coefficient form");
        let q = self.modulus(pos);
        let centred: Vec<i128> = self.residues[pos].iter().map(|&v| center(v, q)).collect();
        let residues = target
            .iter()
            .map(|&idx| {
                let t = self.ring.moduli[idx];
                centred.iter().map(|&v| reduce_signed(v, t)).collect()
            })
            .collect();
        let mut lifted = Self {
            ring: Arc::clone(&self.ring),
            basis: target.to_vec(),
            residues,
            ntt_form: false,
        };
        lifted.forward();
        lifted
    }

    /// CRT-reconstructed constant coefficient, centred in (-Q/2, Q/2].
    pub fn constant_term(&self) -> BigInt {
        assert!(!self.ntt_form, "constant term needs coefficient form");
        let moduli: Vec<u64> = (0..self.basis.len()).map(|pos| self.modulus(pos)).collect();
        let big_q = moduli
            .iter()
            .fold(BigUint::from(1u32), |acc, &q| acc * BigUint::from(q));

        let mut acc = BigUint::from(0u32);
        for (pos, &q) in moduli.iter().enumerate() {
            // (Q/q)^-1 mod q
            let hat_mod_q = moduli
                .iter()
                .enumerate()
                .filter(|&(other, _)| other != pos)
                .fold(1u64, |h, (_, &p)| mul_mod(h, p % q, q));
            let coeff = mul_mod(self.residues[pos][0], mod_inv(hat_mod_q, q), q);
            acc += (&big_q / BigUint::from(q)) * BigUint::from(coeff);
        }
        let value = BigInt::from(acc.mod_floor(&big_q));
        let big_q = BigInt::from(big_q);
        if &value * 2 > big_q {
            value - big_q
        } else {
            value
        }
    }

    fn check_compatible(&self, rhs: &Polynomial) {
        assert_eq!(self.basis, rhs.basis, "moduli must match");
        assert_eq!(self.ntt_form, rhs.ntt_form, "representations must match");
    }
}

impl Add for &Polynomial {
    type Output = Polynomial;
    fn add(self, rhs: Self) -> Self::Output {
        self.check_compatible(rhs);
        let mut out = self.clone();
        for (pos, (res, other)) in out.residues.iter_mut().zip(&rhs.residues).enumerate() {
            let q = self.modulus(pos);
            for (x, &y) in res.iter_mut().zip(other) {
                *x = add_mod(*x, y, q);
            }
        }
        out
    }
}

impl Add for Polynomial {
    type Output = Polynomial;
    fn add(self, rhs: Self) -> Self::Output {
        &self + &rhs
    }
}

impl Add<&Polynomial> for Polynomial {
    type Output = Polynomial;
    fn add(self, rhs: &Polynomial) -> Self::Output {
        &self + rhs
    }
}

impl Sub for &Polynomial {
    type Output = Polynomial;
    fn sub(self, rhs: Self) -> Self::Output {
        self.check_compatible(rhs);
        let mut out = self.clone();
        for (pos, (res, other)) in out.residues.iter_mut().zip(&rhs.residues).enumerate() {
            let q = self.modulus(pos);
            for (x, &y) in res.iter_mut().zip(other) {
                *x = sub_mod(*x, y, q);
            }
        }
        out
    }
}

impl Sub for Polynomial {
    type Output = Polynomial;
    fn sub(self, rhs: Self) -> Self::Output {
        &self - &rhs
    }
}

impl<'a, 'b> Mul<&'b Polynomial> for &'a Polynomial {
    type Output = Polynomial;

    /// Pointwise product; both operands must be in evaluation form.
    fn mul(self, rhs: &'b Polynomial) -> Polynomial {
        self.check_compatible(rhs);
        assert!(self.ntt_form, "multiplication needs evaluation form");
        let mut out = self.clone();
        for (pos, (res, other)) in out.residues.iter_mut().zip(&rhs.residues).enumerate() {
            let q = self.modulus(pos);
            for (x, &y) in res.iter_mut().zip(other) {
                *x = mul_mod(*x, y, q);
            }
        }
        out
    }
}

impl Mul<Polynomial> for Polynomial {
    type Output = Polynomial;
    fn mul(self, rhs: Polynomial) -> Polynomial {
        (&self).mul(&rhs)
    }
}

impl Neg for &Polynomial {
    type Output = Polynomial;
    fn neg(self) -> Self::Output {
        let mut out = self.clone();
        for (pos, res) in out.residues.iter_mut().enumerate() {
            let q = self.modulus(pos);
            for x in res.iter_mut() {
                *x = sub_mod(0, *x, q);
            }
        }
        out
    }
}
