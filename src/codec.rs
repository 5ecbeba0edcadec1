//! Element-wise encryption of plaintext grids, and the way back.

use crate::adapter::LeveledScheme;
use crate::error::Result;
use crate::tensor::{par_cells, EncryptedTensor, PlaintextTensor};
use log::debug;
use nalgebra::DMatrix;

/// One handle per element, grid shape preserved, no packing.
pub struct TensorCodec<'a, S: LeveledScheme> {
    scheme: &'a S,
}

impl<'a, S: LeveledScheme> TensorCodec<'a, S> {
    /// Codec over `scheme`.
    pub fn new(scheme: &'a S) -> Self {
        Self { scheme }
    }

    /// Encrypt every element in parallel.
    pub fn encode(&self, tensor: &PlaintextTensor) -> Result<EncryptedTensor<S::Ciphertext>> {
        let (rows, cols) = tensor.shape();
        debug!("encoding {rows}x{cols} tensor");
        let cells = par_cells(rows, cols, |i, j| self.scheme.encrypt(tensor.get(i, j)))?;
        Ok(EncryptedTensor::from_cells(rows, cols, cells))
    }

    /// Approximate decryption of every handle. Runs on the calling thread only.
    pub fn decode(
        &self,
        tensor: &EncryptedTensor<S::Ciphertext>,
        secret_key: &S::SecretKey,
    ) -> Result<PlaintextTensor> {
        let values = tensor
            .cells()
            .iter()
            .map(|ct| self.scheme.decrypt(ct, secret_key))
            .collect::<Result<Vec<f64>>>()?;
        PlaintextTensor::from_matrix(DMatrix::from_row_slice(
            tensor.rows(),
            tensor.cols(),
            &values,
        ))
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
    fn test_encode_decode() {
        let ctx = CkksContext::new(CkksParameters::insecure(1, 64)).unwrap();
        let (ckks, sk) = Ckks::generate_keypair(Arc::new(ctx));
        let codec = TensorCodec::new(&ckks);

        let x = PlaintextTensor::from_rows(&[[1.0, -2.5, 3.0], [0.0, 1e-3, 42.0]]).unwrap();
        let enc = codec.encode(&x).unwrap();
        assert_eq!(enc.shape(), (2, 3));
        assert!(enc.cells().iter().all(|ct| ckks.level(ct) == 0));

        let back = codec.decode(&enc, &sk).unwrap();
        assert_eq!(back.shape(), x.shape());
        for (got, want) in back.as_matrix().iter().zip(x.as_matrix().iter()) {
            assert!((got - want).abs() < 1e-9, "{want} decoded to {got}");
        }
    }
}
