//! Modulus chain and ring setup, built once per parameter set and shared read-only.

use crate::error::{Error, Result};
use crate::ntt::{NttTable, PrimeGenerator};
use crate::params::{CkksParameters, SecurityLevel};
use log::debug;
use std::sync::Arc;

/// Bits kept free above a value for encryption noise and rounding.
const HEADROOM_MARGIN_BITS: f64 = 1.0;

/// Ring degree plus the full RNS basis `[q0, q1, …, qL, P]`.
#[derive(Debug)]
pub struct RingContext {
    /// Ring degree N.
    pub degree: usize,
    /// Chain primes followed by P.
    pub moduli: Vec<u64>,
    tables: Vec<NttTable>,
}

impl RingContext {
    fn new(degree: usize, moduli: Vec<u64>) -> Option<Self> {
        let tables = moduli
            .iter()
            .map(|&q| NttTable::new(q, degree))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            degree,
            moduli,
            tables,
        })
    }

    /// NTT tables of the prime at `index`.
    pub fn table(&self, index: usize) -> &NttTable {
        &self.tables[index]
    }

    /// Index of the key-switching prime P.
    pub fn special_index(&self) -> usize {
        self.moduli.len() - 1
    }
}

/// Shared, read-only scheme state: parameters, ring and default scale.
#[derive(Debug)]
pub struct CkksContext {
    params: CkksParameters,
    ring: Arc<RingContext>,
    scale: f64,
}

impl CkksContext {
    /// Validate `params`, pick the ring dimension and draw the modulus chain.
    pub fn new(params: CkksParameters) -> Result<Self> {
        validate(&params)?;

        let ring = match (params.ring_dim, params.security_level) {
            (Some(dim), level) => {
                let ring = build_ring(dim, &params)?;
                check_security(&ring, level)?;
                ring
            }
            (None, SecurityLevel::NotSet) => build_ring(1024, &params)?,
            (None, level) => SecurityLevel::candidate_dims()
                .filter(|&dim| dim / 2 >= params.batch_size)
                .filter_map(|dim| build_ring(dim, &params).ok())
                .find(|ring| check_security(ring, level).is_ok())
                .ok_or_else(|| {
                    Error::KeyGeneration(format!(
                        "no ring dimension up to 32768 reaches {level}-bit security for ~{} modulus bits",
                        params.estimated_modulus_bits()
                    ))
                })?,
        };

        if ring.degree / 2 < params.batch_size {
            return Err(Error::KeyGeneration(format!(
                "batch size {} exceeds N/2 = {}",
                params.batch_size,
                ring.degree / 2
            )));
        }

        debug!(
            "CKKS context: N = {}, depth = {}, log2(QP) = {:.1}, moduli = {:?}",
            ring.degree,
            params.multiplicative_depth,
            modulus_bits(&ring.moduli),
            ring.moduli
        );

        let scale = 2f64.powi(params.scaling_mod_size as i32);
        Ok(Self {
            params,
            ring: Arc::new(ring),
            scale,
        })
    }

    /// Parameters the context was built from.
    pub fn params(&self) -> &CkksParameters {
        &self.params
    }

    /// Shared ring and NTT tables.
    pub fn ring(&self) -> &Arc<RingContext> {
        &self.ring
    }

    /// Ring dimension N.
    pub fn ring_dim(&self) -> usize {
        self.ring.degree
    }

    /// Multiplicative depth L.
    pub fn depth(&self) -> usize {
        self.params.multiplicative_depth
    }

    /// Scale of a fresh encoding, Δ = 2^scaling_mod_size.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// RNS basis of a ciphertext that has consumed `level` multiplications.
    pub fn basis_at(&self, level: usize) -> Vec<usize> {
        (0..=self.depth() - level).collect()
    }

    /// Ciphertext basis at `level` extended by P.
    pub fn extended_basis(&self, level: usize) -> Vec<usize> {
        let mut basis = self.basis_at(level);
        basis.push(self.ring.special_index());
        basis
    }

    /// Basis of key material: every chain prime plus P.
    pub fn key_basis(&self) -> Vec<usize> {
        (0..self.ring.moduli.len()).collect()
    }

    /// Prime removed by the rescale that takes a handle from `level` to `level + 1`.
    pub fn rescale_prime(&self, level: usize) -> u64 {
        self.ring.moduli[self.depth() - level]
    }

    /// Fail fast when a planned computation needs more levels than provisioned.
    pub fn ensure_depth(&self, required: usize) -> Result<()> {
        if required > self.depth() {
            return Err(Error::ParameterInsufficient {
                required,
                available: self.depth(),
            });
        }
        Ok(())
    }

    /// Smallest depth under which a value of size `magnitude` still decrypts
    /// correctly at `level`.
    ///
    /// At `level` a handle keeps q0 and `depth - level` scaling primes, and the
    /// centred plaintext `value·Δ` must stay below half their product. Primes
    /// past the drawn chain are counted at `scaling_mod_size` bits.
    pub fn depth_for(&self, level: usize, magnitude: f64) -> Result<usize> {
        if !magnitude.is_finite() {
            return Err(Error::Encoding(
                magnitude,
                "intermediate value is not finite".to_string(),
            ));
        }
        let needed = magnitude.max(1.0).log2() + self.scale.log2() + 1.0 + HEADROOM_MARGIN_BITS;
        let moduli = &self.ring.moduli;
        let mut bits = (moduli[0] as f64).log2();
        let mut primes = 0;
        while bits < needed {
            primes += 1;
            bits += if primes <= self.depth() {
                (moduli[primes] as f64).log2()
            } else {
                f64::from(self.params.scaling_mod_size)
            };
        }
        Ok(level + primes)
    }

    /// log2(QP) of the drawn chain.
    pub fn modulus_bits(&self) -> f64 {
        modulus_bits(&self.ring.moduli)
    }
}

fn validate(params: &CkksParameters) -> Result<()> {
    if params.multiplicative_depth == 0 {
        return Err(Error::KeyGeneration(
            "multiplicative depth must be at least 1".to_string(),
        ));
    }
    if !(20..=60).contains(&params.scaling_mod_size) {
        return Err(Error::KeyGeneration(format!(
            "scaling modulus size {} outside 20..=60 bits",
            params.scaling_mod_size
        )));
    }
    if params.first_mod_size < params.scaling_mod_size || params.first_mod_size > 60 {
        return Err(Error::KeyGeneration(format!(
            "first modulus size {} must lie between the scaling size {} and 60 bits",
            params.first_mod_size, params.scaling_mod_size
        )));
    }
    if !params.batch_size.is_power_of_two() {
        return Err(Error::KeyGeneration(format!(
            "batch size {} is not a power of two",
            params.batch_size
        )));
    }
    if let Some(dim) = params.ring_dim {
        if !dim.is_power_of_two() || !(16..=1 << 17).contains(&dim) {
            return Err(Error::KeyGeneration(format!(
                "ring dimension {dim} is not a power of two in 16..=131072"
            )));
        }
    }
    Ok(())
}

/// q0, then L scaling primes alternating above and below 2^scale, then P.
fn build_ring(degree: usize, params: &CkksParameters) -> Result<RingContext> {
    let not_enough = || {
        Error::KeyGeneration(format!(
            "not enough NTT-friendly primes for N = {degree} and the requested chain"
        ))
    };
    let mut gen = PrimeGenerator::new(degree);
    let mut moduli = Vec::with_capacity(params.multiplicative_depth + 2);
    moduli.push(gen.below(params.first_mod_size).ok_or_else(not_enough)?);
    for i in 0..params.multiplicative_depth {
        let prime = if i % 2 == 0 {
            gen.above(params.scaling_mod_size)
                .or_else(|| gen.below(params.scaling_mod_size))
        } else {
            gen.below(params.scaling_mod_size)
                .or_else(|| gen.above(params.scaling_mod_size))
        };
        moduli.push(prime.ok_or_else(not_enough)?);
    }
    moduli.push(gen.below(params.first_mod_size).ok_or_else(not_enough)?);
    RingContext::new(degree, moduli).ok_or_else(not_enough)
}

fn check_security(ring: &RingContext, level: SecurityLevel) -> Result<()> {
    if level == SecurityLevel::NotSet {
        return Ok(());
    }
    let bound = level.max_modulus_bits(ring.degree).ok_or_else(|| {
        Error::KeyGeneration(format!(
            "ring dimension {} is not covered by the {level}-bit security table",
            ring.degree
        ))
    })?;
    let bits = modulus_bits(&ring.moduli);
    if bits > f64::from(bound) {
        return Err(Error::KeyGeneration(format!(
            "log2(QP) = {bits:.1} exceeds {bound} bits allowed at N = {} for {level}-bit security",
            ring.degree
        )));
    }
    Ok(())
}

fn modulus_bits(moduli: &[u64]) -> f64 {
    moduli.iter().map(|&q| (q as f64).log2()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_layout() {
        let ctx = CkksContext::new(CkksParameters::insecure(3, 64)).unwrap();
        let moduli = &ctx.ring().moduli;
        assert_eq!(moduli.len(), 3 + 2);
        assert_eq!(64 - moduli[0].leading_zeros(), 60);
        for &q in &moduli[1..4] {
            let bits = (q as f64).log2();
            assert!((bits - 50.0).abs() < 0.01, "scaling prime {q} too far from 2^50");
        }
        assert_eq!(ctx.ring().special_index(), 4);
        assert_eq!(ctx.basis_at(0), vec![0, 1, 2, 3]);
        assert_eq!(ctx.basis_at(3), vec![0]);
        assert_eq!(ctx.extended_basis(2), vec![0, 1, 4]);
        assert_eq!(ctx.rescale_prime(0), moduli[3]);
        assert_eq!(ctx.rescale_prime(2), moduli[1]);
        assert_eq!(ctx.scale(), 2f64.powi(50));
    }

    #[test]
    fn test_picks_secure_dimension() {
        // 60 + 2*50 + 60 = 220 bits: just over the 8192 bound.
        let ctx = CkksContext::new(CkksParameters::with_depth(2)).unwrap();
        assert_eq!(ctx.ring_dim(), 16384);
        assert!(ctx.modulus_bits() <= 438.0);
    }

    #[test]
    fn test_rejects_insecure_explicit_dimension() {
        let params = CkksParameters {
            ring_dim: Some(2048),
            ..CkksParameters::with_depth(2)
        };
        assert!(matches!(
            CkksContext::new(params),
            Err(Error::KeyGeneration(_))
        ));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        for params in [
            CkksParameters::insecure(0, 64),
            CkksParameters {
                scaling_mod_size: 10,
                ..CkksParameters::insecure(2, 64)
            },
            CkksParameters {
                first_mod_size: 40,
                ..CkksParameters::insecure(2, 64)
            },
            CkksParameters {
                batch_size: 3,
                ..CkksParameters::insecure(2, 64)
            },
            CkksParameters {
                batch_size: 64,
                ..CkksParameters::insecure(2, 64)
            },
            CkksParameters::insecure(2, 100),
        ] {
            assert!(
                matches!(CkksContext::new(params.clone()), Err(Error::KeyGeneration(_))),
                "accepted {params:?}"
            );
        }
    }

    #[test]
    fn test_depth_for_magnitude() {
        let ctx = CkksContext::new(CkksParameters::insecure(2, 64)).unwrap();
        // q0 alone holds |v| up to 2^8 at a 50-bit scale
        assert_eq!(ctx.depth_for(1, 50.0), Ok(1));
        assert_eq!(ctx.depth_for(2, 200.0), Ok(2));
        assert_eq!(ctx.depth_for(1, 744.33), Ok(2));
        assert_eq!(ctx.depth_for(0, 744.33), Ok(1));
        assert_eq!(ctx.depth_for(1, 2f64.powi(60)), Ok(3));
        assert_eq!(ctx.depth_for(1, 2f64.powi(200)), Ok(5));
        assert!(matches!(
            ctx.depth_for(0, f64::INFINITY),
            Err(Error::Encoding(..))
        ));
    }

    #[test]
    fn test_ensure_depth() {
        let ctx = CkksContext::new(CkksParameters::insecure(2, 64)).unwrap();
        assert!(ctx.ensure_depth(2).is_ok());
        assert_eq!(
            ctx.ensure_depth(4),
            Err(Error::ParameterInsufficient {
                required: 4,
                available: 2
            })
        );
    }
}
