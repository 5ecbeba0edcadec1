//! Encrypted matrix multiplication and 2D convolution.
//!
//! Every output cell is an independent task on the rayon pool and consumes
//! exactly one level.

use crate::adapter::LeveledScheme;
use crate::error::{Error, Result};
use crate::tensor::{par_cells, EncryptedTensor, Kernel};
use log::debug;

/// Levels consumed by [`LinearAlgebra::matmul`].
pub const MATMUL_DEPTH: usize = 1;
/// Levels consumed by [`LinearAlgebra::conv2d`].
pub const CONV_DEPTH: usize = 1;

/// Matrix product and convolution on encrypted tensors.
pub struct LinearAlgebra<'a, S: LeveledScheme> {
    scheme: &'a S,
}

impl<'a, S: LeveledScheme> LinearAlgebra<'a, S> {
    /// Engine over `scheme`.
    pub fn new(scheme: &'a S) -> Self {
        Self { scheme }
    }

    /// C = A·B with C[i][j] = ⟨row_i(A), col_j(B)⟩.
    pub fn matmul(
        &self,
        a: &EncryptedTensor<S::Ciphertext>,
        b: &EncryptedTensor<S::Ciphertext>,
    ) -> Result<EncryptedTensor<S::Ciphertext>> {
        if a.cols() != b.rows() {
            return Err(Error::ShapeMismatch(format!(
                "cannot multiply {}x{} by {}x{}",
                a.rows(),
                a.cols(),
                b.rows(),
                b.cols()
            )));
        }
        let inner = a.cols();
        debug!(
            "matmul {}x{} · {}x{}",
            a.rows(),
            inner,
            b.rows(),
            b.cols()
        );

        // regroup once so every cell sees two equal-length handle vectors
        let rows: Vec<_> = (0..a.rows()).map(|i| a.row(i)).collect();
        let cols: Vec<_> = (0..b.cols()).map(|j| b.column(j)).collect();
        let cells = par_cells(a.rows(), b.cols(), |i, j| {
            self.scheme.inner_product(&rows[i], &cols[j], inner)
        })?;
        Ok(EncryptedTensor::from_cells(a.rows(), b.cols(), cells))
    }

    /// Valid (no padding), stride-1 correlation of `input` with a plaintext kernel.
    ///
    /// Zero weights go through `multiply_plain` like any other, so every cell has
    /// the same depth profile. Partial products are summed in row-major order.
    pub fn conv2d(
        &self,
        input: &EncryptedTensor<S::Ciphertext>,
        kernel: &Kernel,
    ) -> Result<EncryptedTensor<S::Ciphertext>> {
        let (kr, kc) = (kernel.rows(), kernel.cols());
        if kr > input.rows() || kc > input.cols() {
            return Err(Error::ShapeMismatch(format!(
                "{kr}x{kc} kernel does not fit a {}x{} input",
                input.rows(),
                input.cols()
            )));
        }
        let (out_rows, out_cols) = (input.rows() - kr + 1, input.cols() - kc + 1);
        debug!(
            "conv2d {}x{} input, {kr}x{kc} kernel -> {out_rows}x{out_cols}",
            input.rows(),
            input.cols()
        );

        let cells = par_cells(out_rows, out_cols, |i, j| {
            let mut acc: Option<S::Ciphertext> = None;
            for m in 0..kr {
                for n in 0..kc {
                    let x = input.get(i + m, j + n).ok_or_else(|| {
                        Error::ShapeMismatch(format!("window ({}, {}) out of range", i + m, j + n))
                    })?;
                    let term = self.scheme.multiply_plain(x, kernel.get(m, n))?;
                    acc = Some(match acc {
                        Some(sum) => self.scheme.add(&sum, &term)?,
                        None => term,
                    });
                }
            }
            acc.ok_or_else(|| Error::ShapeMismatch("empty kernel".to_string()))
        })?;
        Ok(EncryptedTensor::from_cells(out_rows, out_cols, cells))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TensorCodec;
    use crate::context::CkksContext;
    use crate::params::CkksParameters;
    use crate::scheme::Ckks;
    use crate::tensor::PlaintextTensor;
    use std::sync::Arc;

    fn scheme(depth: usize) -> (Ckks, crate::keys::SecretKey) {
        let ctx = CkksContext::new(CkksParameters::insecure(depth, 64)).unwrap();
        Ckks::generate_keypair(Arc::new(ctx))
    }

    #[test]
    fn test_matmul_rectangular() {
        let (ckks, sk) = scheme(1);
        let codec = TensorCodec::new(&ckks);
        let a = PlaintextTensor::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        let b = PlaintextTensor::from_rows(&[[7.0, 8.0], [9.0, 10.0], [11.0, 12.0]]).unwrap();
        let c = LinearAlgebra::new(&ckks)
            .matmul(&codec.encode(&a).unwrap(), &codec.encode(&b).unwrap())
            .unwrap();
        assert_eq!(c.shape(), (2, 2));
        assert!(c.cells().iter().all(|ct| ckks.level(ct) == MATMUL_DEPTH));

        let got = codec.decode(&c, &sk).unwrap();
        let want = a.as_matrix() * b.as_matrix();
        for (g, w) in got.as_matrix().iter().zip(want.iter()) {
            assert!((g - w).abs() < 1e-6, "expected {w}, got {g}");
        }
    }

    #[test]
    fn test_matmul_shape_mismatch() {
        let (ckks, _) = scheme(1);
        let codec = TensorCodec::new(&ckks);
        let a = codec.encode(&PlaintextTensor::from_rows(&[[1.0, 2.0]]).unwrap()).unwrap();
        assert!(matches!(
            LinearAlgebra::new(&ckks).matmul(&a, &a),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_conv2d_with_zero_weights() {
        let (ckks, sk) = scheme(1);
        let codec = TensorCodec::new(&ckks);
        let x = PlaintextTensor::from_rows(&[
            [1.0, 2.0, 3.0, 4.0],
            [5.0, 6.0, 7.0, 8.0],
            [9.0, 10.0, 11.0, 12.0],
        ])
        .unwrap();
        let k = Kernel::from_rows(&[[0.5, 0.0, -1.0]]).unwrap();
        let y = LinearAlgebra::new(&ckks)
            .conv2d(&codec.encode(&x).unwrap(), &k)
            .unwrap();
        assert_eq!(y.shape(), (3, 2));
        assert!(y.cells().iter().all(|ct| ckks.level(ct) == CONV_DEPTH));

        let got = codec.decode(&y, &sk).unwrap();
        for i in 0..3 {
            for j in 0..2 {
                let want = 0.5 * x.get(i, j) - x.get(i, j + 2);
                assert!((got.get(i, j) - want).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_conv2d_kernel_too_large() {
        let (ckks, _) = scheme(1);
        let codec = TensorCodec::new(&ckks);
        let x = codec.encode(&PlaintextTensor::from_rows(&[[1.0, 2.0]]).unwrap()).unwrap();
        let k = Kernel::from_rows(&[[1.0], [1.0]]).unwrap();
        assert!(matches!(
            LinearAlgebra::new(&ckks).conv2d(&x, &k),
            Err(Error::ShapeMismatch(_))
        ));
    }
}
