// Copyright 2023 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Routines related to the quadratic sieve factor base.
//!
//! The factor base consists of the primes p ≤ B such that n is a
//! quadratic residue modulo p, each with a precomputed square root of n
//! and the integer log used during sieving. The implicit "prime -1"
//! tracking the sign of sieved values is not stored here: it only exists
//! in exponent vectors, where it sorts before every prime.

use crate::arith;
use crate::{Error, Uint};

/// A factor base related to an input number n. Each per-prime datum is
/// held in a separate vector, ordered by prime.
#[derive(Clone, Debug)]
pub struct FBase {
    pub primes: Vec<u64>,
    // One square root of n per prime; the second root is p - r.
    // For p = 2 there is a single root.
    pub roots: Vec<u64>,
    // ⌊log₂ p⌋ per prime.
    pub logs: Vec<u8>,
}

impl FBase {
    pub fn new(n: &Uint, bound: u64) -> Result<FBase, Error> {
        let mut primes = vec![];
        let mut roots = vec![];
        let mut logs = vec![];
        for p in small_primes(bound) {
            if p == 2 {
                // n is odd, so its square root modulo 2 is 1.
                primes.push(2);
                roots.push(1);
                logs.push(1);
                continue;
            }
            let np = arith::mod_u64(n, p);
            if arith::jacobi(np, p) != 1 {
                continue;
            }
            let r = arith::sqrt_mod(np, p)
                .ok_or(Error::InternalInconsistency("residue admits no square root"))?;
            primes.push(p);
            roots.push(r);
            logs.push((63 - p.leading_zeros()) as u8);
        }
        if primes.is_empty() {
            return Err(Error::ParametersTooSmall("factor base is empty"));
        }
        Ok(FBase {
            primes,
            roots,
            logs,
        })
    }

    pub fn len(&self) -> usize {
        self.primes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primes.is_empty()
    }

    /// The largest factor base prime.
    pub fn bound(&self) -> u64 {
        *self.primes.last().unwrap()
    }
}

/// All primes up to `bound` inclusive.
pub fn small_primes(bound: u64) -> Vec<u64> {
    if bound < 2 {
        return vec![];
    }
    let mut primes = vec![2];
    // sieve[i] says that 2i+1 is composite
    let half = (bound as usize + 1) / 2;
    let mut sieve = vec![false; half];
    for i in 1..half {
        if !sieve[i] {
            let p = 2 * i + 1;
            primes.push(p as u64);
            if p * p <= bound as usize {
                let mut j = p * p / 2;
                while j < half {
                    sieve[j] = true;
                    j += p;
                }
            }
        }
    }
    primes
}

#[test]
fn test_small_primes() {
    assert_eq!(small_primes(1), Vec::<u64>::new());
    assert_eq!(small_primes(2), vec![2]);
    assert_eq!(small_primes(10), vec![2, 3, 5, 7]);
    assert_eq!(small_primes(13), vec![2, 3, 5, 7, 11, 13]);
    let ps = small_primes(611953);
    assert_eq!(ps.len(), 50000);
    assert_eq!(ps.last(), Some(&611953));
}

#[test]
fn test_factor_base() {
    // n = 8051: quadratic residues only.
    let n = Uint::from(8051_u64);
    let fb = FBase::new(&n, 100).unwrap();
    assert_eq!(fb.primes[0], 2);
    for (i, &p) in fb.primes.iter().enumerate() {
        if p == 2 {
            assert_eq!(fb.roots[i], 1);
            continue;
        }
        assert_eq!(arith::jacobi(arith::mod_u64(&n, p), p), 1);
        let r = fb.roots[i];
        assert_eq!(arith::mulmod64(r, r, p), arith::mod_u64(&n, p));
        assert_eq!(fb.logs[i] as u32, 63 - p.leading_zeros());
    }
    // Primes with (n/p) = -1 are excluded: (8051/3) = -1.
    assert!(!fb.primes.contains(&3));

    // Too small a bound leaves no admissible prime.
    assert!(matches!(
        FBase::new(&n, 0),
        Err(Error::ParametersTooSmall(_))
    ));
    assert!(matches!(
        FBase::new(&n, 1),
        Err(Error::ParametersTooSmall(_))
    ));
}
