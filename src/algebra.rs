//! Homomorphic add / mult on RNS-CKKS ciphertexts, plus level and scale
//! bookkeeping (rescale, prime dropping, scale alignment).

use crate::{
    adapter::LeveledScheme,
    cipher::Ciphertext,
    error::{Error, Result},
    keys::SecretKey,
    polynomial::Polynomial,
    scheme::{encode_scalar, Ckks},
};
use log::trace;

/// Relative tolerance under which two scales count as equal.
const SCALE_EPSILON: f64 = 1e-9;

fn same_scale(a: f64, b: f64) -> bool {
    ((a - b) / b).abs() <= SCALE_EPSILON
}

impl Ckks {
    fn check_level(&self, level: usize) -> Result<()> {
        if level >= self.context.depth() {
            return Err(Error::DepthExhausted {
                level,
                depth: self.context.depth(),
            });
        }
        Ok(())
    }

    /// Divide by the prime of the current level and move one level down.
    fn rescale(&self, c0: &Polynomial, c1: &Polynomial, level: usize, scale: f64) -> Ciphertext {
        let q = self.context.rescale_prime(level);
        trace!("rescale: level {level} -> {}, q = {q}", level + 1);
        Ciphertext {
            c0: c0.divide_by_last(),
            c1: c1.divide_by_last(),
            level: level + 1,
            scale: scale / q as f64,
        }
    }

    /// Drop primes until `ct` sits at `level`; the scale is untouched.
    fn drop_to_level(&self, ct: &Ciphertext, level: usize) -> Ciphertext {
        debug_assert!(level >= ct.level, "cannot raise a ciphertext's level");
        if level == ct.level {
            return ct.clone();
        }
        let basis = self.context.basis_at(level);
        Ciphertext {
            c0: ct.c0.restrict(&basis),
            c1: ct.c1.restrict(&basis),
            level,
            scale: ct.scale,
        }
    }

    /// Bring `ct` to `(target_scale, level)` by multiplying with the integer
    /// `round(target_scale · q / scale)` and rescaling. Needs `ct.level < level`.
    fn adjust_scale(&self, ct: &Ciphertext, target_scale: f64, level: usize) -> Result<Ciphertext> {
        let q = self.context.rescale_prime(ct.level);
        let k = encode_scalar(target_scale / ct.scale, q as f64)?;
        let adjusted = self.rescale(
            &ct.c0.scalar_mul(k),
            &ct.c1.scalar_mul(k),
            ct.level,
            ct.scale * k as f64,
        );
        Ok(self.drop_to_level(&adjusted, level))
    }

    /// Put both operands of an addition on one level and one scale.
    fn align(&self, a: &Ciphertext, b: &Ciphertext) -> Result<(Ciphertext, Ciphertext)> {
        let (a, b) = match a.level.cmp(&b.level) {
            std::cmp::Ordering::Equal if same_scale(a.scale, b.scale) => (a.clone(), b.clone()),
            std::cmp::Ordering::Equal => {
                let level = a.level;
                self.check_level(level)?;
                (
                    self.adjust_scale(a, b.scale, level + 1)?,
                    self.drop_to_level(b, level + 1),
                )
            }
            std::cmp::Ordering::Less => (self.lift(a, b)?, b.clone()),
            std::cmp::Ordering::Greater => (a.clone(), self.lift(b, a)?),
        };
        if !same_scale(a.scale, b.scale) {
            return Err(Error::ScaleMismatch(a.scale, b.scale));
        }
        Ok((a, b))
    }

    /// Move the shallower `low` to the level and scale of `high`.
    fn lift(&self, low: &Ciphertext, high: &Ciphertext) -> Result<Ciphertext> {
        if same_scale(low.scale, high.scale) {
            Ok(self.drop_to_level(low, high.level))
        } else {
            self.adjust_scale(low, high.scale, high.level)
        }
    }

    /// Key-switch the s² component `d2` back to `(r0, r1)` under `s`.
    fn relinearize(&self, d2: &Polynomial, level: usize) -> (Polynomial, Polynomial) {
        let ctx = &self.context;
        let ext = ctx.extended_basis(level);
        let mut d2 = d2.clone();
        d2.backward();

        let mut acc0 = Polynomial::zero(ctx.ring(), &ext, true);
        let mut acc1 = Polynomial::zero(ctx.ring(), &ext, true);
        for (pos, &idx) in d2.basis.iter().enumerate() {
            let digit = d2.lift_residue(pos, &ext);
            let b = self.evaluation_key.b[idx].restrict(&ext);
            let a = self.evaluation_key.a[idx].restrict(&ext);
            acc0 = acc0 + &(&digit * &b);
            acc1 = acc1 + &(&digit * &a);
        }
        (acc0.divide_by_last(), acc1.divide_by_last())
    }

    /// (a + b), at the deeper of the two levels.
    pub fn add_cipher(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let (a, b) = self.align(a, b)?;
        Ok(Ciphertext {
            c0: &a.c0 + &b.c0,
            c1: &a.c1 + &b.c1,
            level: a.level,
            scale: b.scale,
        })
    }

    /// ct · scalar, encoding the scalar at the scale of the prime about to be dropped.
    pub fn mult_plain(&self, ct: &Ciphertext, scalar: f64) -> Result<Ciphertext> {
        self.check_level(ct.level)?;
        let q = self.context.rescale_prime(ct.level);
        let k = encode_scalar(scalar, q as f64)?;
        let mut out = self.rescale(&ct.c0.scalar_mul(k), &ct.c1.scalar_mul(k), ct.level, ct.scale);
        out.scale = ct.scale;
        Ok(out)
    }

    /// Tensor product, relinearisation and rescale.
    pub fn mult(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let level = a.level.max(b.level);
        self.check_level(level)?;
        let a = self.drop_to_level(a, level);
        let b = self.drop_to_level(b, level);

        let d0 = &a.c0 * &b.c0;
        let d1 = &(&a.c0 * &b.c1) + &(&a.c1 * &b.c0);
        let d2 = &a.c1 * &b.c1;
        let (r0, r1) = self.relinearize(&d2, level);

        Ok(self.rescale(&(d0 + &r0), &(d1 + &r1), level, a.scale * b.scale))
    }
}

impl LeveledScheme for Ckks {
    type Ciphertext = Ciphertext;
    type SecretKey = SecretKey;

    fn encrypt(&self, value: f64) -> Result<Ciphertext> {
        self.encrypt_with(value, &mut rand::thread_rng())
    }

    fn decrypt(&self, ct: &Ciphertext, secret_key: &SecretKey) -> Result<f64> {
        self.decrypt_value(ct, secret_key)
    }

    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.add_cipher(a, b)
    }

    fn multiply_plain(&self, a: &Ciphertext, scalar: f64) -> Result<Ciphertext> {
        self.mult_plain(a, scalar)
    }

    fn multiply_cipher(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.mult(a, b)
    }

    fn inner_product(&self, a: &[Ciphertext], b: &[Ciphertext], length: usize) -> Result<Ciphertext> {
        if length == 0 || a.len() != length || b.len() != length {
            return Err(Error::ShapeMismatch(format!(
                "inner product of length {length} over vectors of {} and {} handles",
                a.len(),
                b.len()
            )));
        }
        let mut terms = a.iter().zip(b).map(|(x, y)| self.mult(x, y));
        let first = terms.next().ok_or_else(|| {
            Error::ShapeMismatch("inner product over empty vectors".to_string())
        })??;
        terms.try_fold(first, |acc, term| self.add_cipher(&acc, &term?))
    }

    fn level(&self, ct: &Ciphertext) -> usize {
        ct.level
    }

    fn depth(&self) -> usize {
        self.context.depth()
    }
}
