//! Scheme configuration, passed once at context setup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Security target used to pick (or check) the ring dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// 128-bit classical security.
    Classic128,
    /// 192-bit classical security.
    Classic192,
    /// 256-bit classical security.
    Classic256,
    /// No lattice-security check; the ring dimension defaults to 1024.
    NotSet,
}

impl SecurityLevel {
    /// HE-standard bound on log2(QP) for a ternary secret, indexed by ring dimension.
    pub fn max_modulus_bits(self, ring_dim: usize) -> Option<u32> {
        let table: [(usize, u32, u32, u32); 6] = [
            (1024, 27, 19, 14),
            (2048, 54, 37, 29),
            (4096, 109, 75, 58),
            (8192, 218, 152, 118),
            (16384, 438, 305, 237),
            (32768, 881, 611, 476),
        ];
        let row = table.iter().find(|row| row.0 == ring_dim)?;
        match self {
            SecurityLevel::Classic128 => Some(row.1),
            SecurityLevel::Classic192 => Some(row.2),
            SecurityLevel::Classic256 => Some(row.3),
            SecurityLevel::NotSet => None,
        }
    }

    /// Ring dimensions the standard table covers, ascending.
    pub fn candidate_dims() -> impl Iterator<Item = usize> {
        (10..=15).map(|log| 1usize << log)
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecurityLevel::Classic128 => "128",
            SecurityLevel::Classic192 => "192",
            SecurityLevel::Classic256 => "256",
            SecurityLevel::NotSet => "none",
        };
        f.write_str(s)
    }
}

impl FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "128" => Ok(SecurityLevel::Classic128),
            "192" => Ok(SecurityLevel::Classic192),
            "256" => Ok(SecurityLevel::Classic256),
            "none" | "notset" => Ok(SecurityLevel::NotSet),
            other => Err(format!("unknown security level '{other}' (expected 128, 192, 256 or none)")),
        }
    }
}

/// CKKS parameters, named as in common CKKS libraries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CkksParameters {
    /// Number of multiplications any chain may consume.
    pub multiplicative_depth: usize,
    /// Bits of fixed-point precision; also the size of every rescaling prime.
    pub scaling_mod_size: u32,
    /// Size of the base prime q0, which bounds the magnitude left at the last level.
    pub first_mod_size: u32,
    /// Slot count; validated but unused while every ciphertext holds one value.
    pub batch_size: usize,
    /// Explicit ring dimension, otherwise derived from the security level.
    pub ring_dim: Option<usize>,
    /// Target checked against the drawn modulus chain.
    pub security_level: SecurityLevel,
}

impl Default for CkksParameters {
    fn default() -> Self {
        Self {
            multiplicative_depth: 2,
            scaling_mod_size: 50,
            first_mod_size: 60,
            batch_size: 1,
            ring_dim: None,
            security_level: SecurityLevel::Classic128,
        }
    }
}

impl CkksParameters {
    /// Same defaults with an explicit depth.
    pub fn with_depth(multiplicative_depth: usize) -> Self {
        Self {
            multiplicative_depth,
            ..Self::default()
        }
    }

    /// Unchecked toy parameters used by tests and benches.
    pub fn insecure(multiplicative_depth: usize, ring_dim: usize) -> Self {
        Self {
            multiplicative_depth,
            ring_dim: Some(ring_dim),
            security_level: SecurityLevel::NotSet,
            ..Self::default()
        }
    }

    /// Bit size estimate of QP before the primes are drawn.
    pub fn estimated_modulus_bits(&self) -> u32 {
        2 * self.first_mod_size + self.scaling_mod_size * self.multiplicative_depth as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_table() {
        assert_eq!(SecurityLevel::Classic128.max_modulus_bits(8192), Some(218));
        assert_eq!(SecurityLevel::Classic256.max_modulus_bits(16384), Some(237));
        assert_eq!(SecurityLevel::Classic128.max_modulus_bits(512), None);
        assert_eq!(SecurityLevel::NotSet.max_modulus_bits(8192), None);
        let dims: Vec<usize> = SecurityLevel::candidate_dims().collect();
        assert_eq!(dims.first(), Some(&1024));
        assert_eq!(dims.last(), Some(&32768));
    }

    #[test]
    fn test_security_parse() {
        assert_eq!("128".parse::<SecurityLevel>(), Ok(SecurityLevel::Classic128));
        assert_eq!("none".parse::<SecurityLevel>(), Ok(SecurityLevel::NotSet));
        assert!("64".parse::<SecurityLevel>().is_err());
        assert_eq!(SecurityLevel::Classic192.to_string(), "192");
    }

    #[test]
    fn test_defaults() {
        let p = CkksParameters::default();
        assert_eq!(p.scaling_mod_size, 50);
        assert_eq!(p.first_mod_size, 60);
        assert_eq!(p.estimated_modulus_bits(), 220);
        assert_eq!(CkksParameters::with_depth(6).multiplicative_depth, 6);
        let toy = CkksParameters::insecure(3, 64);
        assert_eq!(toy.ring_dim, Some(64));
        assert_eq!(toy.security_level, SecurityLevel::NotSet);
    }
}
