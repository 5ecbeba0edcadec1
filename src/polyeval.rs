//! Fixed polynomial surrogates of activation functions, evaluated over ciphertexts.

use crate::adapter::LeveledScheme;
use crate::error::{Error, Result};
use crate::tensor::{par_cells, EncryptedTensor};
use itertools::Itertools;
use log::debug;
use std::collections::BTreeMap;

/// Highest power a surrogate may use.
pub const MAX_POWER: u32 = 1 << 10;

/// Σ cₖ·x^pₖ over a sparse set of powers, kept sorted by power.
#[derive(Clone, Debug, PartialEq)]
pub struct PolynomialApproximation {
    name: String,
    terms: Vec<(u32, f64)>,
}

impl PolynomialApproximation {
    /// Validate and sort `(power, coefficient)` pairs.
    ///
    /// Powers must be distinct and lie in `1..=MAX_POWER`.
    pub fn new(name: impl Into<String>, terms: &[(u32, f64)]) -> Result<Self> {
        if terms.is_empty() {
            return Err(Error::InvalidApproximation("no terms".to_string()));
        }
        if let Some((p, _)) = terms.iter().find(|(p, _)| *p == 0) {
            return Err(Error::InvalidApproximation(format!(
                "power {p} is not supported, powers start at 1"
            )));
        }
        if let Some((p, _)) = terms.iter().find(|(p, _)| *p > MAX_POWER) {
            return Err(Error::InvalidApproximation(format!(
                "power {p} is above the supported maximum {MAX_POWER}"
            )));
        }
        if let Some(p) = terms.iter().map(|(p, _)| p).duplicates().next() {
            return Err(Error::InvalidApproximation(format!("power {p} appears twice")));
        }
        let terms = terms
            .iter()
            .copied()
            .sorted_by_key(|&(p, _)| p)
            .collect();
        Ok(Self {
            name: name.into(),
            terms,
        })
    }

    /// f(x) = x².
    pub fn square() -> Self {
        Self {
            name: "square".to_string(),
            terms: vec![(2, 1.0)],
        }
    }

    /// f(x) = 0.5x + 0.25x² − x⁴/48, a low-degree SiLU surrogate.
    pub fn silu() -> Self {
        Self {
            name: "silu".to_string(),
            terms: vec![(1, 0.5), (2, 0.25), (4, -1.0 / 48.0)],
        }
    }

    /// Label used in reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `(power, coefficient)` pairs in ascending power.
    pub fn terms(&self) -> &[(u32, f64)] {
        &self.terms
    }

    /// Degree of the polynomial.
    pub fn max_power(&self) -> u32 {
        self.terms.last().map(|&(p, _)| p).unwrap_or(0)
    }

    /// Levels needed: ⌈log₂ max power⌉ for the powers, one for the coefficients.
    pub fn required_depth(&self) -> usize {
        power_depth(self.max_power()) + 1
    }

    /// f(x) in plain floating point.
    pub fn evaluate_plain(&self, x: f64) -> f64 {
        self.terms.iter().map(|&(p, c)| c * pow(x, p)).sum()
    }

    /// Largest |value| the encrypted evaluation at `x` holds on each level,
    /// counted from the level of the input.
    ///
    /// Every power up to the degree sits at ⌈log₂ p⌉. The scaled terms and
    /// their running sum all end up on the output level.
    pub fn level_peaks(&self, x: f64) -> Vec<(usize, f64)> {
        let mut peaks: Vec<(usize, f64)> = (1..=self.max_power())
            .map(|p| (power_depth(p), pow(x, p).abs()))
            .collect();
        let mut sum = 0.0;
        let mut out = 0.0f64;
        for &(p, c) in &self.terms {
            let term = c * pow(x, p);
            sum += term;
            out = out.max(term.abs()).max(sum.abs());
        }
        peaks.push((self.required_depth(), out));
        peaks
    }
}

fn pow(x: f64, p: u32) -> f64 {
    // p <= MAX_POWER
    x.powi(i32::try_from(p).unwrap_or(i32::MAX))
}

/// ⌈log₂ p⌉
fn power_depth(p: u32) -> usize {
    p.max(1).next_power_of_two().trailing_zeros() as usize
}

/// Evaluates surrogates over handles of any [`LeveledScheme`].
pub struct PolynomialEvaluator<'a, S: LeveledScheme> {
    scheme: &'a S,
}

impl<'a, S: LeveledScheme> PolynomialEvaluator<'a, S> {
    /// Evaluator borrowing `scheme`.
    pub fn new(scheme: &'a S) -> Self {
        Self { scheme }
    }

    /// Evaluate `poly` at an encrypted scalar.
    pub fn evaluate(&self, x: &S::Ciphertext, poly: &PolynomialApproximation) -> Result<S::Ciphertext> {
        let mut powers = BTreeMap::from([(1, x.clone())]);
        let mut acc: Option<S::Ciphertext> = None;
        for &(p, c) in poly.terms() {
            let xp = self.power(p, &mut powers)?;
            let term = self.scheme.multiply_plain(&xp, c)?;
            acc = Some(match acc {
                Some(sum) => self.scheme.add(&sum, &term)?,
                None => term,
            });
        }
        acc.ok_or_else(|| Error::InvalidApproximation("no terms".to_string()))
    }

    /// Apply `poly` to every element of `tensor`.
    pub fn evaluate_tensor(
        &self,
        tensor: &EncryptedTensor<S::Ciphertext>,
        poly: &PolynomialApproximation,
    ) -> Result<EncryptedTensor<S::Ciphertext>> {
        debug!(
            "evaluating {} (depth {}) over {}x{} handles",
            poly.name(),
            poly.required_depth(),
            tensor.rows(),
            tensor.cols()
        );
        let cells = par_cells(tensor.rows(), tensor.cols(), |i, j| {
            let x = tensor
                .get(i, j)
                .ok_or_else(|| Error::ShapeMismatch(format!("({i}, {j}) out of range")))?;
            self.evaluate(x, poly)
        })?;
        Ok(EncryptedTensor::from_cells(tensor.rows(), tensor.cols(), cells))
    }

    /// x^p from cached powers: squares for powers of two, otherwise the highest
    /// power of two below p times the remainder.
    fn power(&self, p: u32, cache: &mut BTreeMap<u32, S::Ciphertext>) -> Result<S::Ciphertext> {
        if let Some(ct) = cache.get(&p) {
            return Ok(ct.clone());
        }
        let ct = if p.is_power_of_two() {
            let half = self.power(p / 2, cache)?;
            self.scheme.multiply_cipher(&half, &half)?
        } else {
            let high = 1 << (31 - p.leading_zeros());
            let a = self.power(high, cache)?;
            let b = self.power(p - high, cache)?;
            self.scheme.multiply_cipher(&a, &b)?
        };
        cache.insert(p, ct.clone());
        Ok(ct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CkksContext;
    use crate::params::CkksParameters;
    use crate::scheme::Ckks;
    use std::sync::Arc;

    #[test]
    fn test_validation() {
        assert!(PolynomialApproximation::new("empty", &[]).is_err());
        assert!(matches!(
            PolynomialApproximation::new("const", &[(0, 1.0)]),
            Err(Error::InvalidApproximation(_))
        ));
        assert!(matches!(
            PolynomialApproximation::new("dup", &[(2, 1.0), (1, 1.0), (2, 3.0)]),
            Err(Error::InvalidApproximation(_))
        ));
        assert!(matches!(
            PolynomialApproximation::new("wide", &[(1, 1.0), (u32::MAX, 1.0)]),
            Err(Error::InvalidApproximation(_))
        ));
        assert!(PolynomialApproximation::new("edge", &[(MAX_POWER, 1.0)]).is_ok());
        assert!(PolynomialApproximation::new("over", &[(MAX_POWER + 1, 1.0)]).is_err());
        let p = PolynomialApproximation::new("cubic", &[(3, 1.0), (1, -1.0)]).unwrap();
        assert_eq!(p.terms(), &[(1, -1.0), (3, 1.0)]);
        assert_eq!(p.max_power(), 3);
    }

    #[test]
    fn test_required_depth() {
        assert_eq!(PolynomialApproximation::square().required_depth(), 2);
        assert_eq!(PolynomialApproximation::silu().required_depth(), 3);
        let p = PolynomialApproximation::new("p", &[(1, 1.0)]).unwrap();
        assert_eq!(p.required_depth(), 1);
        let p = PolynomialApproximation::new("p", &[(5, 1.0)]).unwrap();
        assert_eq!(p.required_depth(), 4);
    }

    #[test]
    fn test_evaluate_plain() {
        assert_eq!(PolynomialApproximation::square().evaluate_plain(-3.0), 9.0);
        let silu = PolynomialApproximation::silu();
        assert_eq!(silu.evaluate_plain(0.0), 0.0);
        assert!((silu.evaluate_plain(2.0) - (1.0 + 1.0 - 16.0 / 48.0)).abs() < 1e-12);
    }

    #[test]
    fn test_level_peaks() {
        let peaks = PolynomialApproximation::silu().level_peaks(14.0);
        assert_eq!(
            &peaks[..4],
            &[(0, 14.0), (1, 196.0), (2, 2744.0), (2, 38416.0)]
        );
        // terms 7, 49 and -800.33; the output itself is -744.33
        let (level, out) = peaks[4];
        assert_eq!(level, 3);
        assert!((out - 38416.0 / 48.0).abs() < 1e-9);
        assert_eq!(PolynomialApproximation::square().level_peaks(-3.0)[2], (2, 9.0));
    }

    #[test]
    fn test_evaluate_encrypted() {
        let ctx = CkksContext::new(CkksParameters::insecure(4, 64)).unwrap();
        let (ckks, sk) = Ckks::generate_keypair(Arc::new(ctx));
        let eval = PolynomialEvaluator::new(&ckks);
        let x = ckks.encrypt(1.5).unwrap();

        let odd = PolynomialApproximation::new("odd", &[(1, 2.0), (3, -0.5), (5, 0.125)]).unwrap();
        for poly in [PolynomialApproximation::square(), PolynomialApproximation::silu(), odd] {
            let y = eval.evaluate(&x, &poly).unwrap();
            assert_eq!(ckks.level(&y), poly.required_depth(), "{}", poly.name());
            let got = ckks.decrypt(&y, &sk).unwrap();
            let want = poly.evaluate_plain(1.5);
            assert!((got - want).abs() < 1e-6, "{}: {got} vs {want}", poly.name());
        }
    }

    #[test]
    fn test_evaluate_runs_out_of_depth() {
        let ctx = CkksContext::new(CkksParameters::insecure(2, 64)).unwrap();
        let (ckks, _) = Ckks::generate_keypair(Arc::new(ctx));
        let x = ckks.encrypt(1.5).unwrap();
        assert!(matches!(
            PolynomialEvaluator::new(&ckks).evaluate(&x, &PolynomialApproximation::silu()),
            Err(Error::DepthExhausted { .. })
        ));
    }
}
