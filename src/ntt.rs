//! Word-sized modular arithmetic, NTT-friendly prime search and the negacyclic NTT.

// ------------------------------------------------------------
// Modular helpers over u64 residues (moduli < 2^61)
// ------------------------------------------------------------

#[inline]
pub(crate) fn add_mod(a: u64, b: u64, modu: u64) -> u64 {
    let s = a + b;
    if s >= modu {
        s - modu
    } else {
        s
    }
}

#[inline]
pub(crate) fn sub_mod(a: u64, b: u64, modu: u64) -> u64 {
    if a >= b {
        a - b
    } else {
        a + modu - b
    }
}

#[inline]
pub(crate) fn mul_mod(a: u64, b: u64, modu: u64) -> u64 {
    ((u128::from(a) * u128::from(b)) % u128::from(modu)) as u64
}

/// Reduce a signed value into `[0, modu)`.
#[inline]
pub(crate) fn reduce_signed(v: i128, modu: u64) -> u64 {
    v.rem_euclid(i128::from(modu)) as u64
}

/// Centred representative of `v mod modu` in `(-modu/2, modu/2]`.
#[inline]
pub(crate) fn center(v: u64, modu: u64) -> i128 {
    if v > modu / 2 {
        i128::from(v) - i128::from(modu)
    } else {
        i128::from(v)
    }
}

#[inline]
pub(crate) fn mod_pow(mut base: u64, mut exp: u64, modu: u64) -> u64 {
    let mut res = 1u64 % modu;
    base %= modu;
    while exp > 0 {
        if exp & 1 == 1 {
            res = mul_mod(res, base, modu);
        }
        base = mul_mod(base, base, modu);
        exp >>= 1;
    }
    res
}

#[inline]
pub(crate) fn mod_inv(x: u64, modu: u64) -> u64 {
    mod_pow(x, modu - 2, modu) // modu is prime
}

// ------------------------------------------------------------
// Prime search
// ------------------------------------------------------------

/// Deterministic Miller-Rabin for every `u64`.
pub fn is_prime(n: u64) -> bool {
    const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    if n < 2 {
        return false;
    }
    for &p in &WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }
    let mut d = n - 1;
    let mut r = 0;
    while d % 2 == 0 {
        d /= 2;
        r += 1;
    }
    'witness: for &a in &WITNESSES {
        let mut x = mod_pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..r {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Walks the progression `1 mod 2N` around a power of two, handing out
/// distinct NTT-friendly primes.
#[derive(Debug)]
pub struct PrimeGenerator {
    step: u64,
    used: Vec<u64>,
}

impl PrimeGenerator {
    /// Generator of primes `≡ 1 mod 2·degree`.
    pub fn new(degree: usize) -> Self {
        Self {
            step: 2 * degree as u64,
            used: Vec::new(),
        }
    }

    /// Largest unused prime `q ≡ 1 (mod 2N)` with exactly `bits` bits.
    pub fn below(&mut self, bits: u32) -> Option<u64> {
        let floor = 1u64 << (bits - 1);
        let mut cand = (1u64 << bits) - self.step + 1;
        while cand > floor {
            if !self.used.contains(&cand) && is_prime(cand) {
                self.used.push(cand);
                return Some(cand);
            }
            cand = cand.checked_sub(self.step)?;
        }
        None
    }

    /// Smallest unused prime `q ≡ 1 (mod 2N)` above `2^bits`.
    pub fn above(&mut self, bits: u32) -> Option<u64> {
        let ceiling = 1u64 << (bits + 1);
        let mut cand = (1u64 << bits) + 1;
        while cand < ceiling {
            if !self.used.contains(&cand) && is_prime(cand) {
                self.used.push(cand);
                return Some(cand);
            }
            cand += self.step;
        }
        None
    }
}

// ------------------------------------------------------------
// bit-reverse & negacyclic NTT
// ------------------------------------------------------------
fn bit_reverse(vec: &mut [u64]) {
    let n = vec.len();
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            vec.swap(i, j);
        }
    }
}

/// Primitive 2N-th root of unity ψ, i.e. ψ^N = -1.
fn find_psi(modu: u64, degree: usize) -> Option<u64> {
    let two_n = 2 * degree as u64;
    if (modu - 1) % two_n != 0 {
        return None;
    }
    let exp = (modu - 1) / two_n;
    (2..modu.min(1 << 20))
        .map(|g| mod_pow(g, exp, modu))
        .find(|&psi| mod_pow(psi, degree as u64, modu) == modu - 1)
}

/// Precomputed tables for multiplication in `Z_q[X]/(X^N + 1)`.
#[derive(Clone, Debug)]
pub struct NttTable {
    /// The prime q.
    pub modulus: u64,
    degree: usize,
    psi_powers: Vec<u64>,
    psi_inv_powers: Vec<u64>,
    n_inv: u64,
    psi: u64,
    psi_inv: u64,
}

impl NttTable {
    /// `None` when `modulus` is not ≡ 1 (mod 2N).
    pub fn new(modulus: u64, degree: usize) -> Option<Self> {
        assert!(degree.is_power_of_two(), "ring degree must be a power of two");
        let psi = find_psi(modulus, degree)?;
        let psi_inv = mod_inv(psi, modulus);
        let powers = |root: u64| {
            let mut v = Vec::with_capacity(degree);
            let mut acc = 1u64;
            for _ in 0..degree {
                v.push(acc);
                acc = mul_mod(acc, root, modulus);
            }
            v
        };
        Some(Self {
            modulus,
            degree,
            psi_powers: powers(psi),
            psi_inv_powers: powers(psi_inv),
            n_inv: mod_inv(degree as u64, modulus),
            psi,
            psi_inv,
        })
    }

    fn cyclic(&self, a: &mut [u64], invert: bool) {
        let modu = self.modulus;
        let n = self.degree;
        bit_reverse(a);

        let mut len = 2;
        while len <= n {
            // primitive len-th root: ψ^(2N/len)
            let base = if invert { self.psi_inv } else { self.psi };
            let w_len = mod_pow(base, (2 * n / len) as u64, modu);
            for i in (0..n).step_by(len) {
                let mut w = 1u64;
                for j in 0..len / 2 {
                    let u = a[i + j];
                    let v = mul_mod(a[i + j + len / 2], w, modu);
                    a[i + j] = add_mod(u, v, modu);
                    a[i + j + len / 2] = sub_mod(u, v, modu);
                    w = mul_mod(w, w_len, modu);
                }
            }
            len <<= 1;
        }
    }

    /// In-place coefficient → evaluation transform.
    pub fn forward(&self, a: &mut [u64]) {
        assert_eq!(a.len(), self.degree, "length must equal ring degree");
        for (x, &p) in a.iter_mut().zip(&self.psi_powers) {
            *x = mul_mod(*x, p, self.modulus);
        }
        self.cyclic(a, false);
    }

    /// In-place evaluation → coefficient transform.
    pub fn backward(&self, a: &mut [u64]) {
        assert_eq!(a.len(), self.degree, "length must equal ring degree");
        self.cyclic(a, true);
        for (x, &p) in a.iter_mut().zip(&self.psi_inv_powers) {
            *x = mul_mod(mul_mod(*x, self.n_inv, self.modulus), p, self.modulus);
        }
    }
}
