// Copyright 2023 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Number-theoretic primitives backing the sieve: modular square roots,
//! Jacobi symbols, modular inversion and exponentiation, prime iteration,
//! integer logarithms and trial division.
//!
//! Primes handled here always fit in a machine word; only values derived
//! from the input number use multi-precision arithmetic.

pub use bnum::types::{I1024, U1024};
pub use num_integer::sqrt as isqrt;
use num_integer::Integer;

use crate::{Int, Uint};

#[inline]
pub fn mulmod64(a: u64, b: u64, p: u64) -> u64 {
    ((a as u128 * b as u128) % p as u128) as u64
}

/// Modular exponentiation for word-sized moduli.
pub fn pow_mod64(n: u64, k: u64, p: u64) -> u64 {
    let mut res: u64 = 1;
    let mut sq = n % p;
    let mut k = k;
    while k > 0 {
        if k & 1 == 1 {
            res = mulmod64(res, sq, p);
        }
        sq = mulmod64(sq, sq, p);
        k >>= 1;
    }
    res
}

/// Modular exponentiation modulo a multi-precision integer.
pub fn pow_mod(n: Uint, k: Uint, p: Uint) -> Uint {
    let mut res = Uint::ONE;
    let mut sq = n % p;
    let mut k = k;
    while k != Uint::ZERO {
        if k.bit(0) {
            res = (res * sq) % p;
        }
        sq = (sq * sq) % p;
        k = k >> 1;
    }
    res
}

/// The Jacobi symbol (a/m) for odd m, in {-1, 0, +1}.
pub fn jacobi(a: u64, m: u64) -> i32 {
    debug_assert!(m % 2 == 1);
    let mut a = a % m;
    let mut m = m;
    let mut t: i32 = 1;
    while a != 0 {
        while a % 2 == 0 {
            a /= 2;
            if m % 8 == 3 || m % 8 == 5 {
                t = -t;
            }
        }
        std::mem::swap(&mut a, &mut m);
        if a % 4 == 3 && m % 4 == 3 {
            t = -t;
        }
        a %= m;
    }
    if m == 1 {
        t
    } else {
        0
    }
}

/// Square root modulo a prime p (Tonelli-Shanks).
/// Returns at most one root; for p = 2 the single root is n mod 2.
pub fn sqrt_mod(n: u64, p: u64) -> Option<u64> {
    let n = n % p;
    if p == 2 {
        return Some(n);
    }
    if n == 0 {
        return Some(0);
    }
    if jacobi(n, p) != 1 {
        return None;
    }
    if p % 4 == 3 {
        return Some(pow_mod64(n, (p + 1) / 4, p));
    }
    // p = 1 mod 4: write p-1 = q·2^s with q odd.
    let s = (p - 1).trailing_zeros();
    let q = (p - 1) >> s;
    let mut z = 2;
    while jacobi(z, p) != -1 {
        z += 1;
    }
    let mut m = s;
    let mut c = pow_mod64(z, q, p);
    let mut t = pow_mod64(n, q, p);
    let mut r = pow_mod64(n, (q + 1) / 2, p);
    while t != 1 {
        // Order of t is 2^i.
        let mut i = 0;
        let mut t2 = t;
        while t2 != 1 {
            t2 = mulmod64(t2, t2, p);
            i += 1;
        }
        let b = pow_mod64(c, 1_u64 << (m - i - 1), p);
        m = i;
        c = mulmod64(b, b, p);
        t = mulmod64(t, c, p);
        r = mulmod64(r, b, p);
    }
    debug_assert!(mulmod64(r, r, p) == n);
    Some(r)
}

/// Modular inversion for word-sized moduli (not necessarily prime).
pub fn inv_mod64(n: u64, p: u64) -> Option<u64> {
    let e = Integer::extended_gcd(&(n as i128), &(p as i128));
    if e.gcd == 1 {
        let x = if e.x < 0 { e.x + p as i128 } else { e.x };
        Some((x % p as i128) as u64)
    } else {
        None
    }
}

const MILLER_RABIN_BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Deterministic Miller-Rabin primality test for 64-bit integers.
pub fn is_prime64(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for &p in &MILLER_RABIN_BASES {
        if n == p {
            return true;
        }
        if n % p == 0 {
            return false;
        }
    }
    let s = (n - 1).trailing_zeros();
    let d = (n - 1) >> s;
    'witness: for &a in &MILLER_RABIN_BASES {
        let mut x = pow_mod64(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mulmod64(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Smallest prime strictly above x.
pub fn next_prime(x: u64) -> u64 {
    if x < 2 {
        return 2;
    }
    let mut p = if x % 2 == 0 { x + 1 } else { x + 2 };
    loop {
        if is_prime64(p) {
            return p;
        }
        p += 2;
    }
}

/// Largest prime strictly below x, if any.
pub fn prec_prime(x: u64) -> Option<u64> {
    if x <= 2 {
        return None;
    }
    if x == 3 {
        return Some(2);
    }
    let mut p = if x % 2 == 0 { x - 1 } else { x - 2 };
    while p > 2 {
        if is_prime64(p) {
            return Some(p);
        }
        p -= 2;
    }
    Some(2)
}

/// ⌊log₁₀ n⌋ for n > 0.
pub fn integer_log10(n: &Uint) -> u32 {
    let ten = Uint::from(10_u64);
    let mut x = *n;
    let mut l = 0;
    while x >= ten {
        x = x / ten;
        l += 1;
    }
    l
}

#[inline]
pub fn low_u64(n: &Uint) -> u64 {
    n.digits()[0]
}

/// n mod p as a machine word.
#[inline]
pub fn mod_u64(n: &Uint, p: u64) -> u64 {
    low_u64(&(n % Uint::from(p)))
}

/// x mod n mapped into [0, n) for signed x and multi-precision n.
pub fn reduce_mod(x: &Int, n: &Uint) -> Uint {
    let nn = Int::from_bits(*n);
    let r = *x % nn;
    if r.is_negative() {
        (r + nn).to_bits()
    } else {
        r.to_bits()
    }
}

/// x mod p mapped into [0, p) for signed x.
pub fn mod_int(x: &Int, p: u64) -> u64 {
    let m = mod_u64(&x.abs().to_bits(), p);
    if x.is_negative() && m != 0 {
        p - m
    } else {
        m
    }
}

/// Trial division of x by the given primes. Returns the factors with
/// exponents and the remaining cofactor.
pub fn trial_divide(primes: &[u64], x: &Uint) -> (Vec<(i64, u64)>, Uint) {
    let mut factors: Vec<(i64, u64)> = Vec::with_capacity(20);
    let mut cofactor = *x;
    for &p in primes {
        let pu = Uint::from(p);
        let mut exp = 0_u64;
        loop {
            let (q, r) = cofactor.div_rem(&pu);
            if r == Uint::ZERO {
                cofactor = q;
                exp += 1;
            } else {
                break;
            }
        }
        if exp > 0 {
            factors.push((p as i64, exp));
        }
    }
    (factors, cofactor)
}
