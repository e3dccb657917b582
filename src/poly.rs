// Copyright 2023 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Polynomial family selection and self-initialisation.
//!
//! A family is determined by a leading coefficient a = p₁²·…·p_k² whose
//! factors are primes near ((2n)/m²)^(1/4k), so that polynomial values
//! stay balanced over the sieved interval. For each a, every b with
//! b² ≡ n (mod a) and 0 < b ≤ a/2 yields a polynomial
//!
//! ```text
//! Q(t) = a·t² + 2b·t + c,     c = (b² - n)/a,
//! ```
//!
//! satisfying a·Q(t) = (a·t + b)² - n. The 2^k square roots of n modulo
//! a are obtained by Hensel-lifting the root modulo each pᵢ to pᵢ² and
//! combining sign choices through the Chinese remainder theorem; b and
//! a - b give equivalent polynomials, which halves the enumeration.
//!
//! Bibliography:
//! Robert D. Silverman, The multiple polynomial quadratic sieve,
//! Math. Comp. 48, 1987, <https://doi.org/10.1090/S0025-5718-1987-0866119-8>
//! Alford, Pomerance, Implementing the self-initializing quadratic sieve,
//! <https://math.dartmouth.edu/~carlp/implementing.pdf>

use num_integer::Roots;
use num_traits::ToPrimitive;

use crate::arith;
use crate::{Error, Int, Uint};

// Family primes must fit 31 bits so that sums of their squares stay
// inside a machine word during root lifting.
const MAX_FAMILY_PRIME: u64 = (1 << 31) - 1;

/// A sieving polynomial Q(t) = a·t² + 2b·t + c.
#[derive(Clone, Debug)]
pub struct Poly {
    pub a: Uint,
    pub b: Uint,
    pub c: Int,
    /// Decomposition of a as (prime, exponent) pairs, every exponent 2.
    pub afactors: Vec<(u64, u32)>,
}

impl Poly {
    /// Value Q(t).
    pub fn eval(&self, t: i64) -> Int {
        let t = Int::from(t);
        (Int::from_bits(self.a) * t + (Int::from_bits(self.b) << 1)) * t + self.c
    }

    /// The relation key a·t + b. Keys are kept unreduced so that
    /// deduplication only ever merges identical survivors.
    pub fn key(&self, t: i64) -> Int {
        Int::from_bits(self.a) * Int::from(t) + Int::from_bits(self.b)
    }
}

/// Generates the successive (a, {b}) polynomial families.
pub struct FamilyGenerator {
    n: Uint,
    halfwidth: u64,
    /// Prime factors of the current a, ascending.
    /// Empty while on the trivial a = 1 family (k = 0).
    factors: Vec<u64>,
}

impl FamilyGenerator {
    pub fn new(n: &Uint, k: u32, halfwidth: u64) -> Result<FamilyGenerator, Error> {
        if k >= 32 {
            return Err(Error::ParametersTooSmall("too many polynomial factors"));
        }
        let factors = if k == 0 {
            vec![]
        } else {
            select_factors(n, k, halfwidth)?
        };
        Ok(FamilyGenerator {
            n: *n,
            halfwidth,
            factors,
        })
    }

    /// The prime factors of the current leading coefficient.
    pub fn factors(&self) -> &[u64] {
        &self.factors
    }

    /// All polynomials of the current family, by increasing b.
    pub fn polynomials(&self) -> Result<Vec<Poly>, Error> {
        if self.factors.is_empty() {
            // Classical sieve: Q(t) = t² - n.
            return Ok(vec![Poly {
                a: Uint::ONE,
                b: Uint::ZERO,
                c: -Int::from_bits(self.n),
                afactors: vec![],
            }]);
        }
        enumerate_b(&self.n, &self.factors)
    }

    /// Advance to the next family. The trivial family jumps to a k = 1
    /// selection; otherwise the smallest factor is dropped and the next
    /// admissible prime above the current maximum is appended, which
    /// guarantees forward progress and family diversity.
    pub fn advance(&mut self) -> Result<(), Error> {
        if self.factors.is_empty() {
            self.factors = select_factors(&self.n, 1, self.halfwidth)?;
            return Ok(());
        }
        let next = next_family_prime(&self.n, *self.factors.last().unwrap())?;
        self.factors.remove(0);
        self.factors.push(next);
        Ok(())
    }
}

fn admissible(n: &Uint, p: u64) -> bool {
    p > 2 && arith::jacobi(arith::mod_u64(n, p), p) == 1
}

/// Select k primes around the target size ((2n)/m²)^(1/4k): half just
/// below, half just above, each a quadratic residue site fitting in a
/// machine word.
fn select_factors(n: &Uint, k: u32, halfwidth: u64) -> Result<Vec<u64>, Error> {
    if halfwidth == 0 {
        return Err(Error::ParametersTooSmall("empty sieving interval"));
    }
    let m2 = Uint::from(halfwidth) * Uint::from(halfwidth);
    let qstar = ((*n << 1u32) / m2)
        .nth_root(4 * k)
        .to_u64()
        .unwrap_or(u64::MAX);
    if qstar >= MAX_FAMILY_PRIME {
        return Err(Error::ParametersTooSmall("family primes exceed the machine word"));
    }

    let mut lows: Vec<u64> = vec![];
    let mut cursor = qstar;
    while (lows.len() as u32) < k / 2 {
        match arith::prec_prime(cursor) {
            Some(p) if p > 2 => {
                cursor = p;
                if admissible(n, p) {
                    lows.push(p);
                }
            }
            _ => break,
        }
    }
    let mut highs: Vec<u64> = vec![];
    let mut cursor = qstar;
    while lows.len() + highs.len() < k as usize {
        cursor = arith::next_prime(cursor);
        if cursor > MAX_FAMILY_PRIME {
            return Err(Error::ParametersTooSmall("family primes exceed the machine word"));
        }
        if admissible(n, cursor) {
            highs.push(cursor);
        }
    }
    lows.reverse();
    lows.append(&mut highs);
    Ok(lows)
}

fn next_family_prime(n: &Uint, above: u64) -> Result<u64, Error> {
    let mut p = above;
    loop {
        p = arith::next_prime(p);
        if p > MAX_FAMILY_PRIME {
            return Err(Error::ParametersTooSmall("family primes exceed the machine word"));
        }
        if admissible(n, p) {
            return Ok(p);
        }
    }
}

/// Enumerate the polynomials of the family with a = ∏ pᵢ².
fn enumerate_b(n: &Uint, factors: &[u64]) -> Result<Vec<Poly>, Error> {
    let k = factors.len();
    let mut a = Uint::ONE;
    for &p in factors {
        a *= Uint::from(p * p);
    }

    // Hensel lift: from r² ≡ n (mod p) to (r + s·p)² ≡ n (mod p²)
    // with s = (n - r²)/p · (2r)⁻¹ mod p.
    let mut roots = Vec::with_capacity(k);
    for &p in factors {
        let p2 = p * p;
        let r = arith::sqrt_mod(arith::mod_u64(n, p), p)
            .ok_or(Error::InternalInconsistency("family prime is not a residue site"))?;
        if r == 0 {
            return Err(Error::InternalInconsistency("family prime divides n"));
        }
        let np2 = arith::mod_u64(n, p2);
        let diff = (np2 + p2 - arith::mulmod64(r, r, p2)) % p2;
        debug_assert!(diff % p == 0);
        let rinv2 = arith::inv_mod64((2 * r) % p, p)
            .ok_or(Error::InternalInconsistency("2r is not invertible"))?;
        let s = arith::mulmod64(diff / p, rinv2, p);
        roots.push(r + s * p);
    }

    // CRT coefficients cᵢ = (a/pᵢ²)·((a/pᵢ²)⁻¹ mod pᵢ²).
    let mut crt = Vec::with_capacity(k);
    for &p in factors {
        let p2 = p * p;
        let mi = a / Uint::from(p2);
        let inv = arith::inv_mod64(arith::mod_u64(&mi, p2), p2)
            .ok_or(Error::InternalInconsistency("CRT cofactor is not invertible"))?;
        crt.push((mi * Uint::from(inv)) % a);
    }

    let half = a >> 1;
    let mut polys = vec![];
    for mask in 0_u64..(1 << k) {
        let mut b = Uint::ZERO;
        for i in 0..k {
            let p2 = factors[i] * factors[i];
            let r = if mask & (1 << i) == 0 {
                roots[i]
            } else {
                p2 - roots[i]
            };
            b = (b + crt[i] * Uint::from(r)) % a;
        }
        // b and a-b yield equivalent polynomials: keep 0 < b ≤ a/2.
        if b == Uint::ZERO || b > half {
            continue;
        }
        debug_assert!((b * b) % a == *n % a);
        let c = (Int::from_bits(b * b) - Int::from_bits(*n)) / Int::from_bits(a);
        polys.push(Poly {
            a,
            b,
            c,
            afactors: factors.iter().map(|&p| (p, 2)).collect(),
        });
    }
    debug_assert_eq!(polys.len(), 1 << (k - 1));
    polys.sort_by(|p1, p2| p1.b.cmp(&p2.b));
    Ok(polys)
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: u64 = 10967535067; // 104729 · 104723

    #[test]
    fn test_trivial_family() {
        let n = Uint::from(15_u64);
        let gen = FamilyGenerator::new(&n, 0, 7).unwrap();
        let polys = gen.polynomials().unwrap();
        assert_eq!(polys.len(), 1);
        let pol = &polys[0];
        assert_eq!(pol.a, Uint::ONE);
        assert_eq!(pol.b, Uint::ZERO);
        // Q(4) = 16 - 15 = 1
        assert_eq!(pol.eval(4), Int::from(1_i64));
        assert_eq!(pol.eval(-4), Int::from(1_i64));
        assert_eq!(pol.key(-4), Int::from(-4_i64));
    }

    #[test]
    fn test_family_polynomials() {
        let n = Uint::from(N);
        for k in [1_u32, 2, 3] {
            let gen = FamilyGenerator::new(&n, k, 2170).unwrap();
            let polys = gen.polynomials().unwrap();
            assert_eq!(polys.len(), 1 << (k - 1));
            for pol in &polys {
                // a is the square of k distinct admissible primes.
                assert_eq!(pol.afactors.len(), k as usize);
                let mut a = Uint::ONE;
                for &(p, e) in &pol.afactors {
                    assert_eq!(e, 2);
                    assert!(admissible(&n, p));
                    a *= Uint::from(p * p);
                }
                assert_eq!(a, pol.a);
                // b² ≡ n (mod a), 0 < b ≤ a/2.
                assert_eq!((pol.b * pol.b) % pol.a, n % pol.a);
                assert!(pol.b > Uint::ZERO && pol.b <= pol.a >> 1);
                // a·Q(t) = (a·t + b)² - n at a few points.
                for t in [-5_i64, -1, 0, 1, 7] {
                    let u = Int::from_bits(pol.a) * Int::from(t) + Int::from_bits(pol.b);
                    assert_eq!(
                        Int::from_bits(pol.a) * pol.eval(t),
                        u * u - Int::from_bits(n),
                    );
                }
            }
        }
    }

    #[test]
    fn test_advance() {
        let n = Uint::from(N);
        // The trivial family jumps to k = 1.
        let mut gen = FamilyGenerator::new(&n, 0, 2170).unwrap();
        assert!(gen.factors().is_empty());
        gen.advance().unwrap();
        assert_eq!(gen.factors().len(), 1);

        // Otherwise the smallest factor is dropped and a strictly larger
        // one appended.
        let mut gen = FamilyGenerator::new(&n, 3, 2170).unwrap();
        let before = gen.factors().to_vec();
        gen.advance().unwrap();
        let after = gen.factors().to_vec();
        assert_eq!(after.len(), 3);
        assert_eq!(after[..2], before[1..]);
        assert!(after[2] > before[2]);
        assert!(admissible(&n, after[2]));
    }
}
