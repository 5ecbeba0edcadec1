//! The boundary between the evaluation pipeline and the encryption scheme.
//!
//! Codec, engine, evaluator and harness only ever see ciphertexts through this
//! trait: encrypt, decrypt, add, plaintext-scalar multiply, ciphertext multiply,
//! inner product and level bookkeeping. Every operation is pure and returns a
//! fresh handle.

use crate::error::Result;

/// A leveled homomorphic scheme over real scalars.
pub trait LeveledScheme: Send + Sync {
    /// Opaque ciphertext handle.
    type Ciphertext: Clone + Send + Sync;
    /// Decryption key; only the verifying party holds one.
    type SecretKey;

    /// Encrypt one real value under the scheme's public key.
    fn encrypt(&self, value: f64) -> Result<Self::Ciphertext>;

    /// Approximate decryption.
    fn decrypt(&self, ct: &Self::Ciphertext, secret_key: &Self::SecretKey) -> Result<f64>;

    /// Sum of two handles; levels and scales are reconciled first.
    fn add(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Multiply by a plaintext scalar; consumes one level.
    fn multiply_plain(&self, a: &Self::Ciphertext, scalar: f64) -> Result<Self::Ciphertext>;

    /// Multiply two ciphertexts; consumes one level.
    fn multiply_cipher(&self, a: &Self::Ciphertext, b: &Self::Ciphertext)
        -> Result<Self::Ciphertext>;

    /// Σ a[k]·b[k] over `length` entries of two handle vectors.
    fn inner_product(
        &self,
        a: &[Self::Ciphertext],
        b: &[Self::Ciphertext],
        length: usize,
    ) -> Result<Self::Ciphertext>;

    /// Multiplications already consumed by `ct`.
    fn level(&self, ct: &Self::Ciphertext) -> usize;

    /// Configured multiplicative depth.
    fn depth(&self) -> usize;

    /// Levels still available to `ct`.
    fn remaining_depth(&self, ct: &Self::Ciphertext) -> usize {
        self.depth().saturating_sub(self.level(ct))
    }
}
