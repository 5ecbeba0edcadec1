//! Plaintext ground truth for the verification harness.

use crate::error::{Error, Result};
use crate::polyeval::PolynomialApproximation;
use crate::tensor::{Kernel, PlaintextTensor};
use nalgebra::DMatrix;

/// `a · b`, or [`Error::ShapeMismatch`] when the inner dimensions differ.
pub fn matmul(a: &PlaintextTensor, b: &PlaintextTensor) -> Result<PlaintextTensor> {
    if a.cols() != b.rows() {
        return Err(Error::ShapeMismatch(format!(
            "cannot multiply {}x{} by {}x{}",
            a.rows(),
            a.cols(),
            b.rows(),
            b.cols()
        )));
    }
    PlaintextTensor::from_matrix(a.as_matrix() * b.as_matrix())
}

/// Valid, stride-1 correlation.
pub fn conv2d(input: &PlaintextTensor, kernel: &Kernel) -> Result<PlaintextTensor> {
    let (kr, kc) = (kernel.rows(), kernel.cols());
    if kr > input.rows() || kc > input.cols() {
        return Err(Error::ShapeMismatch(format!(
            "{kr}x{kc} kernel does not fit a {}x{} input",
            input.rows(),
            input.cols()
        )));
    }
    let x = input.as_matrix();
    let k = kernel.as_tensor().as_matrix();
    let out = DMatrix::from_fn(input.rows() - kr + 1, input.cols() - kc + 1, |i, j| {
        x.view((i, j), (kr, kc)).component_mul(k).sum()
    });
    PlaintextTensor::from_matrix(out)
}

/// `poly` applied element-wise.
pub fn polynomial(input: &PlaintextTensor, poly: &PolynomialApproximation) -> PlaintextTensor {
    input.map(|x| poly.evaluate_plain(x))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_programs() {
        let a = PlaintextTensor::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let b = PlaintextTensor::from_rows(&[[5.0, 6.0], [7.0, 8.0]]).unwrap();
        let c = matmul(&a, &b).unwrap();
        assert_eq!(c, PlaintextTensor::from_rows(&[[19.0, 22.0], [43.0, 50.0]]).unwrap());

        let x = PlaintextTensor::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]])
            .unwrap();
        let k = Kernel::from_rows(&[[1.0, 0.0], [0.0, 1.0]]).unwrap();
        let y = conv2d(&x, &k).unwrap();
        assert_eq!(y, PlaintextTensor::from_rows(&[[6.0, 8.0], [12.0, 14.0]]).unwrap());

        let sq = polynomial(&y, &PolynomialApproximation::square());
        assert_eq!(sq, PlaintextTensor::from_rows(&[[36.0, 64.0], [144.0, 196.0]]).unwrap());
    }

    #[test]
    fn test_shape_errors() {
        let a = PlaintextTensor::from_rows(&[[1.0, 2.0]]).unwrap();
        assert!(matmul(&a, &a).is_err());
        let k = Kernel::from_rows(&[[1.0], [1.0]]).unwrap();
        assert!(conv2d(&a, &k).is_err());
    }
}
