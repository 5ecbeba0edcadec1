//! Key generation, encryption & decryption.

use crate::{
    cipher::Ciphertext,
    context::CkksContext,
    error::{Error, Result},
    keys::{EvaluationKey, PublicKey, SecretKey},
    polynomial::Polynomial,
};
use log::debug;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use rand::Rng;
use std::sync::Arc;

/// Largest |value·scale| accepted by the encoder.
const MAX_ENCODED_BITS: i32 = 120;

/// Public scheme state: context, public key and relinearisation key.
///
/// Cheap to clone and safe to share between worker threads; the matching
/// [`SecretKey`] is returned separately by [`Ckks::generate_keypair`].
#[derive(Clone, Debug)]
pub struct Ckks {
    pub(crate) context: Arc<CkksContext>,
    pub(crate) public_key: PublicKey,
    pub(crate) evaluation_key: EvaluationKey,
}

impl Ckks {
    /// Generate a fresh key set for `context`.
    pub fn generate_keypair(context: Arc<CkksContext>) -> (Self, SecretKey) {
        let mut rng = rand::thread_rng();
        let secret_key = SecretKey::generate(&context, &mut rng);
        let public_key = PublicKey::generate(&context, &secret_key, &mut rng);
        let evaluation_key = EvaluationKey::generate(&context, &secret_key, &mut rng);
        debug!(
            "generated keys: N = {}, {} relinearisation digits",
            context.ring_dim(),
            evaluation_key.digits()
        );
        (
            Self {
                context,
                public_key,
                evaluation_key,
            },
            secret_key,
        )
    }

    /// Context the keys were generated for.
    pub fn context(&self) -> &Arc<CkksContext> {
        &self.context
    }

    /// Encrypt `value` as the constant coefficient, scaled by Δ.
    pub fn encrypt_with<R: Rng>(&self, value: f64, rng: &mut R) -> Result<Ciphertext> {
        let ctx = &self.context;
        let scale = ctx.scale();
        let m = encode_scalar(value, scale)?;

        let ring = ctx.ring();
        let basis = ctx.basis_at(0);
        let u = Polynomial::ternary(ring, &basis, rng);
        let e0 = Polynomial::gaussian(ring, &basis, rng);
        let e1 = Polynomial::gaussian(ring, &basis, rng);
        let m = Polynomial::constant(ring, &basis, m);

        // c₀ = b·u + e₀ + m,  c₁ = a·u + e₁
        let c0 = &(&(&self.public_key.b * &u) + &e0) + &m;
        let c1 = &(&self.public_key.a * &u) + &e1;
        Ok(Ciphertext {
            c0,
            c1,
            level: 0,
            scale,
        })
    }

    /// Decrypt to the nearest real value: (c₀ + c₁·s)[0] / scale.
    pub fn decrypt_value(&self, ct: &Ciphertext, secret_key: &SecretKey) -> Result<f64> {
        let s = secret_key.at_level(&self.context, ct.level);
        let mut m = &ct.c0 + &(&ct.c1 * &s);
        m.backward();
        decode_coefficient(&m.constant_term(), ct.scale)
    }
}

/// coefficient / scale, as long as the coefficient is representable.
fn decode_coefficient(raw: &BigInt, scale: f64) -> Result<f64> {
    raw.to_f64()
        .filter(|v| v.is_finite())
        .map(|v| v / scale)
        .ok_or_else(|| {
            Error::Decryption(format!(
                "{}-bit plaintext coefficient does not fit an f64",
                raw.bits()
            ))
        })
}

/// round(value·scale), rejecting values the chain cannot carry.
pub(crate) fn encode_scalar(value: f64, scale: f64) -> Result<i128> {
    if !value.is_finite() {
        return Err(Error::Encoding(value, "value is not finite".to_string()));
    }
    let scaled = (value * scale).round();
    if scaled.abs() >= 2f64.powi(MAX_ENCODED_BITS) {
        return Err(Error::Encoding(
            value,
            format!("scaled magnitude exceeds 2^{MAX_ENCODED_BITS}"),
        ));
    }
    Ok(scaled as i128)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CkksParameters;

    fn scheme(depth: usize) -> (Ckks, SecretKey) {
        let ctx = CkksContext::new(CkksParameters::insecure(depth, 64)).unwrap();
        Ckks::generate_keypair(Arc::new(ctx))
    }

    #[test]
    fn test_encrypt_decrypt() {
        let (ckks, sk) = scheme(2);
        let mut rng = rand::thread_rng();
        for value in [0.0, 1.0, -3.25, 19.0, 123.456, -0.000_5] {
            let ct = ckks.encrypt_with(value, &mut rng).unwrap();
            assert_eq!(ct.level(), 0);
            assert_eq!(ct.prime_count(), 3);
            let back = ckks.decrypt_value(&ct, &sk).unwrap();
            assert!((back - value).abs() < 1e-9, "{value} decrypted to {back}");
        }
    }

    #[test]
    fn test_encrypt_is_randomised() {
        let (ckks, _) = scheme(1);
        let mut rng = rand::thread_rng();
        let a = ckks.encrypt_with(5.0, &mut rng).unwrap();
        let b = ckks.encrypt_with(5.0, &mut rng).unwrap();
        assert_ne!(a.c1.residues, b.c1.residues);
    }

    #[test]
    fn test_encode_rejects_bad_values() {
        assert!(matches!(
            encode_scalar(f64::NAN, 2f64.powi(50)),
            Err(Error::Encoding(..))
        ));
        assert!(matches!(
            encode_scalar(1e30, 2f64.powi(50)),
            Err(Error::Encoding(..))
        ));
        assert_eq!(encode_scalar(-1.5, 4.0), Ok(-6));
    }

    #[test]
    fn test_decode_rejects_oversized_coefficient() {
        let scale = 2f64.powi(50);
        assert_eq!(
            decode_coefficient(&BigInt::from(-(3i64 << 50)), scale),
            Ok(-3.0)
        );
        let huge = BigInt::from(1u8) << 1100;
        assert_eq!(
            decode_coefficient(&huge, scale),
            Err(Error::Decryption(
                "1101-bit plaintext coefficient does not fit an f64".to_string()
            ))
        );
    }
}
