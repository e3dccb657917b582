//! Logarithmic sieving over the interval [-m, m].
//!
//! For each cell t the sieve starts from ⌊log₂|Q(t)|⌋ and subtracts
//! ⌊log₂ p⌋ at every offset where p divides Q, so cells keeping a small
//! residual log are likely smooth. Subtracting integer logs makes
//! survivors candidates, not certificates: exact verification happens
//! during relation extraction.
//!
//! Offset arithmetic stays in each prime's residue ring, avoiding any
//! multi-precision inversion. For a prime p coprime to a, the roots r of
//! n modulo p give the two starting offsets (m + (r - b)·a⁻¹) mod p; for
//! p dividing a the polynomial is linear modulo p and has the single root
//! -c·(2b)⁻¹. The prime 2 contributes one offset, matching the single
//! square root returned by the modular square root primitive.

use crate::arith;
use crate::fbase::FBase;
use crate::poly::Poly;
use crate::{Error, Int};

/// Sieve one polynomial over t = -m..m and return the offsets t whose
/// residual log is at most `threshold`, in ascending order.
pub fn survivors(
    pol: &Poly,
    fbase: &FBase,
    m: u64,
    threshold: u32,
) -> Result<Vec<i64>, Error> {
    let len = 2 * m as usize + 1;
    let mut cells = init_logs(pol, m as i64, len);
    for idx in 0..fbase.len() {
        let p = fbase.primes[idx];
        let logp = fbase.logs[idx] as u16;
        let am = arith::mod_u64(&pol.a, p);
        if am != 0 {
            // gcd(a, p) = 1: subtract at (m + (r - b)·a⁻¹) mod p.
            let ainv = arith::inv_mod64(am, p)
                .ok_or(Error::InternalInconsistency("prime coprime to a is not invertible"))?;
            let bm = arith::mod_u64(&pol.b, p);
            let r = fbase.roots[idx] % p;
            let pair = [r, p - r];
            let roots = if p == 2 { &pair[..1] } else { &pair[..] };
            for &r in roots {
                let i0 = (m % p + arith::mulmod64((r + p - bm) % p, ainv, p)) % p;
                subtract_stride(&mut cells, i0 as usize, p as usize, logp);
            }
        } else {
            // p divides a: Q = 2b·t + c modulo p, single root -c·(2b)⁻¹.
            let tb = arith::mod_u64(&(pol.b << 1), p);
            let binv = arith::inv_mod64(tb, p)
                .ok_or(Error::InternalInconsistency("2b vanishes modulo a factor of a"))?;
            let cm = arith::mod_int(&pol.c, p);
            let i0 = (m % p + (p - arith::mulmod64(cm, binv, p)) % p) % p;
            subtract_stride(&mut cells, i0 as usize, p as usize, logp);
        }
    }
    let m = m as i64;
    Ok(cells
        .iter()
        .enumerate()
        .filter(|&(_, &s)| s as u32 <= threshold)
        .map(|(i, _)| i as i64 - m)
        .collect())
}

#[inline]
fn subtract_stride(cells: &mut [u16], start: usize, step: usize, logp: u16) {
    let mut i = start;
    while i < cells.len() {
        cells[i] = cells[i].saturating_sub(logp);
        i += step;
    }
}

/// Initial cell values ⌊log₂|Q(t)|⌋ for t = -m..m, computed by forward
/// differences: Q(t+1) - Q(t) = a·(2t + 1) + 2b, second difference 2a.
fn init_logs(pol: &Poly, m: i64, len: usize) -> Vec<u16> {
    let mut v = pol.eval(-m);
    let two_a = Int::from_bits(pol.a) << 1;
    let mut delta =
        Int::from_bits(pol.a) * Int::from(-2 * m + 1) + (Int::from_bits(pol.b) << 1);
    let mut cells = Vec::with_capacity(len);
    for _ in 0..len {
        let bits = v.abs().to_bits().bits();
        cells.push(if bits > 0 { (bits - 1) as u16 } else { 0 });
        v += delta;
        delta += two_a;
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poly::FamilyGenerator;
    use crate::Uint;

    #[test]
    fn test_init_logs() {
        let n = Uint::from(8051_u64);
        let gen = FamilyGenerator::new(&n, 0, 100).unwrap();
        let pol = &gen.polynomials().unwrap()[0];
        let cells = init_logs(pol, 100, 201);
        for (i, &c) in cells.iter().enumerate() {
            let t = i as i64 - 100;
            let q = pol.eval(t);
            let bits = q.abs().to_bits().bits();
            assert_eq!(c as u32, bits.saturating_sub(1), "t={t}");
        }
    }

    #[test]
    fn test_survivor_residuals() {
        // The sieve must leave exactly max(0, ⌊log₂|Q|⌋ - Σ ⌊log₂ p⌋)
        // in each cell, the sum running over the base primes dividing Q.
        let n = Uint::from(8051_u64);
        let fbase = FBase::new(&n, 100).unwrap();
        let m = 500_u64;
        let gen = FamilyGenerator::new(&n, 0, m).unwrap();
        let pol = &gen.polynomials().unwrap()[0];
        let threshold = 12; // ⌊log₂ 100⌋ + 6
        let surv = survivors(pol, &fbase, m, threshold).unwrap();
        assert!(!surv.is_empty());
        // Ascending order.
        assert!(surv.windows(2).all(|w| w[0] < w[1]));
        let mut smooth_survivor = false;
        for t in -(m as i64)..=m as i64 {
            let q = pol.eval(t);
            let init = q.abs().to_bits().bits().saturating_sub(1) as u16;
            let mut sub = 0_u16;
            for (i, &p) in fbase.primes.iter().enumerate() {
                if arith::mod_int(&q, p) == 0 {
                    sub += fbase.logs[i] as u16;
                }
            }
            let residual = init.saturating_sub(sub);
            assert_eq!(
                surv.contains(&t),
                residual as u32 <= threshold,
                "t={t} residual={residual}"
            );
            if surv.contains(&t) {
                let (_, cof) = arith::trial_divide(&fbase.primes, &q.abs().to_bits());
                smooth_survivor |= cof == Uint::ONE;
            }
        }
        // e.g. Q(90) = 8100 - 8051 = 49 = 7² is exactly smooth.
        assert!(smooth_survivor);
    }

    #[test]
    fn test_survivors_divisibility() {
        // With a self-initialised family, sieved offsets really are the
        // roots of Q modulo each prime.
        let n = Uint::from(10967535067_u64);
        let fbase = FBase::new(&n, 200).unwrap();
        let m = 300_u64;
        let gen = FamilyGenerator::new(&n, 2, m).unwrap();
        for pol in gen.polynomials().unwrap() {
            for idx in 0..fbase.len() {
                let p = fbase.primes[idx];
                let am = arith::mod_u64(&pol.a, p);
                let bm = arith::mod_u64(&pol.b, p);
                let r = fbase.roots[idx] % p;
                let i0 = if am != 0 {
                    let ainv = arith::inv_mod64(am, p).unwrap();
                    (m % p + arith::mulmod64((r + p - bm) % p, ainv, p)) % p
                } else {
                    let tb = arith::mod_u64(&(pol.b << 1), p);
                    let binv = arith::inv_mod64(tb, p).unwrap();
                    let cm = arith::mod_int(&pol.c, p);
                    (m % p + (p - arith::mulmod64(cm, binv, p)) % p) % p
                };
                let t = i0 as i64 - m as i64;
                let q = pol.eval(t);
                assert_eq!(
                    arith::mod_int(&q, p),
                    0,
                    "p={p} t={t} does not divide Q(t)"
                );
            }
        }
    }
}
