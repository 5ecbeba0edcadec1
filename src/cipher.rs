//! CKKS ciphertext container.

use crate::polynomial::Polynomial;

/// (c₀, c₁, level, scale): decrypts to `(c₀ + c₁·s) / scale`.
///
/// Handles are opaque outside the crate; every homomorphic operation returns a
/// new one.
#[derive(Clone, Debug)]
pub struct Ciphertext {
    pub(crate) c0: Polynomial,
    pub(crate) c1: Polynomial,
    pub(crate) level: usize, // multiplications consumed so far
    pub(crate) scale: f64,
}

impl Ciphertext {
    /// Multiplications already applied along this handle's derivation chain.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Fixed-point scale the plaintext is carried at.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Number of RNS primes still attached.
    pub fn prime_count(&self) -> usize {
        self.c0.basis.len()
    }
}
