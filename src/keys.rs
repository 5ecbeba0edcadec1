//! Key material: ternary secret, RLWE public key and the relinearisation key.

use crate::context::CkksContext;
use crate::ntt::{add_mod, mul_mod};
use crate::polynomial::Polynomial;
use rand::Rng;

/// Ternary secret `s` over the full basis (chain primes and P), evaluation form.
///
/// Never leaves the party that decrypts.
pub struct SecretKey {
    pub(crate) s: Polynomial,
}

impl SecretKey {
    pub(crate) fn generate<R: Rng>(ctx: &CkksContext, rng: &mut R) -> Self {
        Self {
            s: Polynomial::ternary(ctx.ring(), &ctx.key_basis(), rng),
        }
    }

    /// `s` restricted to the basis of a ciphertext at `level`.
    pub(crate) fn at_level(&self, ctx: &CkksContext, level: usize) -> Polynomial {
        self.s.restrict(&ctx.basis_at(level))
    }
}

/// `(b, a)` with `b = -a·s + e` over the fresh ciphertext basis.
#[derive(Clone, Debug)]
pub struct PublicKey {
    pub(crate) b: Polynomial,
    pub(crate) a: Polynomial,
}

impl PublicKey {
    pub(crate) fn generate<R: Rng>(ctx: &CkksContext, sk: &SecretKey, rng: &mut R) -> Self {
        let basis = ctx.basis_at(0);
        let s = sk.s.restrict(&basis);
        let a = Polynomial::random(ctx.ring(), &basis, rng);
        let e = Polynomial::gaussian(ctx.ring(), &basis, rng);
        let b = &(-&(&a * &s)) + &e;
        Self { b, a }
    }
}

/// Relinearisation key for hybrid key switching.
///
/// Digit `i` (one per chain prime q_i) encrypts `P·s²` on residue `i` only:
/// `b_i = -a_i·s + e_i + [P]_{q_i}·s²·δ_i` over the basis `q_0 … q_L, P`.
#[derive(Clone, Debug)]
pub struct EvaluationKey {
    pub(crate) b: Vec<Polynomial>,
    pub(crate) a: Vec<Polynomial>,
}

impl EvaluationKey {
    pub(crate) fn generate<R: Rng>(ctx: &CkksContext, sk: &SecretKey, rng: &mut R) -> Self {
        let ring = ctx.ring();
        let basis = ctx.key_basis();
        let special = ring.moduli[ring.special_index()];
        let s2 = &sk.s * &sk.s;

        let (b, a) = (0..=ctx.depth())
            .map(|i| {
                let a_i = Polynomial::random(ring, &basis, rng);
                let e_i = Polynomial::gaussian(ring, &basis, rng);
                let mut b_i = &(-&(&a_i * &sk.s)) + &e_i;
                let q = ring.moduli[i];
                let p_mod_q = special % q;
                for (x, &s2x) in b_i.residues[i].iter_mut().zip(&s2.residues[i]) {
                    *x = add_mod(*x, mul_mod(p_mod_q, s2x, q), q);
                }
                (b_i, a_i)
            })
            .unzip();
        Self { b, a }
    }

    /// Number of digits, one per chain prime.
    pub fn digits(&self) -> usize {
        self.b.len()
    }
}
