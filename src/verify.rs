//! Decrypt, compare against plaintext ground truth, report every position.

use crate::adapter::LeveledScheme;
use crate::codec::TensorCodec;
use crate::error::{Error, Result};
use crate::tensor::{EncryptedTensor, PlaintextTensor};
use itertools::iproduct;
use log::{info, warn};
use serde::Serialize;
use std::fmt;

/// Outcome at one output position.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToleranceEntry {
    /// Output row.
    pub row: usize,
    /// Output column.
    pub col: usize,
    /// Value recovered from the ciphertext.
    pub decrypted: f64,
    /// Plaintext reference value.
    pub expected: f64,
    /// |decrypted − expected|
    pub abs_error: f64,
    /// `abs_error <= tolerance`; false for NaN.
    pub passed: bool,
}

/// One entry per output position of a verified computation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToleranceReport {
    /// Name of the computation.
    pub label: String,
    /// Absolute threshold every entry was held to.
    pub tolerance: f64,
    /// Row-major outcomes.
    pub entries: Vec<ToleranceEntry>,
}

impl ToleranceReport {
    /// Compare two equally shaped grids position by position.
    pub fn compare(
        label: impl Into<String>,
        tolerance: f64,
        decrypted: &PlaintextTensor,
        expected: &PlaintextTensor,
    ) -> Result<Self> {
        if decrypted.shape() != expected.shape() {
            return Err(Error::ShapeMismatch(format!(
                "decrypted result is {:?}, reference is {:?}",
                decrypted.shape(),
                expected.shape()
            )));
        }
        let entries = iproduct!(0..expected.rows(), 0..expected.cols())
            .map(|(row, col)| {
                let (d, e) = (decrypted.get(row, col), expected.get(row, col));
                let abs_error = (d - e).abs();
                ToleranceEntry {
                    row,
                    col,
                    decrypted: d,
                    expected: e,
                    abs_error,
                    // NaN never passes
                    passed: abs_error <= tolerance,
                }
            })
            .collect();
        Ok(Self {
            label: label.into(),
            tolerance,
            entries,
        })
    }

    /// AND over every position.
    pub fn success(&self) -> bool {
        self.entries.iter().all(|e| e.passed)
    }

    /// Entries out of tolerance.
    pub fn failures(&self) -> impl Iterator<Item = &ToleranceEntry> {
        self.entries.iter().filter(|e| !e.passed)
    }

    /// Largest absolute error, 0 for an empty report.
    pub fn max_error(&self) -> f64 {
        self.entries.iter().map(|e| e.abs_error).fold(0.0, f64::max)
    }
}

impl fmt::Display for ToleranceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (tolerance {:e})", self.label, self.tolerance)?;
        for e in &self.entries {
            writeln!(
                f,
                "  [{}][{}] decrypted {:>14.6} expected {:>14.6} error {:.3e} {}",
                e.row,
                e.col,
                e.decrypted,
                e.expected,
                e.abs_error,
                if e.passed { "ok" } else { "FAIL" }
            )?;
        }
        let failed = self.failures().count();
        if failed == 0 {
            write!(f, "{}: PASS ({} positions)", self.label, self.entries.len())
        } else {
            write!(
                f,
                "{}: FAIL ({failed} of {} positions out of tolerance)",
                self.label,
                self.entries.len()
            )
        }
    }
}

/// Holds the secret key; decrypts on the calling thread only.
pub struct VerificationHarness<'a, S: LeveledScheme> {
    codec: TensorCodec<'a, S>,
    secret_key: &'a S::SecretKey,
}

impl<'a, S: LeveledScheme> VerificationHarness<'a, S> {
    /// Harness decrypting with `secret_key`.
    pub fn new(scheme: &'a S, secret_key: &'a S::SecretKey) -> Self {
        Self {
            codec: TensorCodec::new(scheme),
            secret_key,
        }
    }

    /// Decrypt `result` and compare it with `expected` position by position.
    pub fn verify(
        &self,
        label: &str,
        result: &EncryptedTensor<S::Ciphertext>,
        expected: &PlaintextTensor,
        tolerance: f64,
    ) -> Result<ToleranceReport> {
        let decrypted = self.codec.decode(result, self.secret_key)?;
        let report = ToleranceReport::compare(label, tolerance, &decrypted, expected)?;
        for e in report.failures() {
            warn!(
                "{label}: [{}][{}] decrypted {} expected {} (error {:e} > {:e})",
                e.row, e.col, e.decrypted, e.expected, e.abs_error, tolerance
            );
        }
        info!(
            "{label}: {} positions, max error {:e}",
            report.entries.len(),
            report.max_error()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_collects_every_failure() {
        let expected = PlaintextTensor::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let decrypted = PlaintextTensor::from_rows(&[[1.0, 2.5], [3.0, f64::NAN]]).unwrap();
        let report = ToleranceReport::compare("t", 1e-3, &decrypted, &expected).unwrap();
        assert_eq!(report.entries.len(), 4);
        assert!(!report.success());
        let failed: Vec<_> = report.failures().map(|e| (e.row, e.col)).collect();
        assert_eq!(failed, vec![(0, 1), (1, 1)]);
        assert!(report.to_string().ends_with("t: FAIL (2 of 4 positions out of tolerance)"));
    }

    #[test]
    fn test_compare_shape_mismatch() {
        let a = PlaintextTensor::from_rows(&[[1.0, 2.0]]).unwrap();
        let b = PlaintextTensor::from_rows(&[[1.0], [2.0]]).unwrap();
        assert!(matches!(
            ToleranceReport::compare("t", 1.0, &a, &b),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_report_json() {
        let t = PlaintextTensor::from_rows(&[[0.5]]).unwrap();
        let report = ToleranceReport::compare("one", 1e-6, &t, &t).unwrap();
        assert!(report.success());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["label"], "one");
        assert_eq!(json["entries"][0]["passed"], true);
    }
}
