//! Encrypted tensor evaluation over leveled RNS-CKKS
//!
//! Matrix multiplication, 2D convolution and polynomial activation surrogates
//! computed on ciphertexts, then decrypted and checked against a plaintext
//! reference.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, missing_docs)]

pub mod error;
pub mod ntt;
pub mod params;
pub mod context;
pub mod polynomial;
pub mod cipher;
pub mod keys;
pub mod scheme;
pub mod algebra;
pub mod adapter;
pub mod tensor;
pub mod codec;
pub mod linalg;
pub mod polyeval;
pub mod reference;
pub mod verify;
pub mod pipeline;

pub use adapter::LeveledScheme;
pub use cipher::Ciphertext;
pub use context::CkksContext;
pub use error::{Error, Result};
pub use keys::SecretKey;
pub use params::{CkksParameters, SecurityLevel};
pub use pipeline::{Pipeline, PipelineConfig, Tolerances, Workload};
pub use polyeval::{PolynomialApproximation, PolynomialEvaluator};
pub use scheme::Ckks;
pub use tensor::{EncryptedTensor, Kernel, PlaintextTensor};
pub use codec::TensorCodec;
pub use linalg::LinearAlgebra;
pub use verify::{ToleranceReport, VerificationHarness};
