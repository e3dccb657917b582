//! Automatic parameter selection.
//!
//! The defaults below are derived from the decimal size of n only, so
//! equal inputs always produce bit-identical configurations. The
//! orchestrator widens the bound and the interval when relations cannot
//! be found, keeping k and the threshold.

use num_traits::ToPrimitive;

use crate::arith;
use crate::{Config, Uint};

/// Derive (B, m, k, h) from the size of n.
pub fn auto_config(n: &Uint) -> Config {
    let l = arith::integer_log10(n);
    let b: u64 = if l < 4 {
        (*n >> 1u32).to_u64().unwrap_or(u64::MAX)
    } else if l < 8 {
        arith::isqrt(*n).to_u64().unwrap_or(u64::MAX)
    } else {
        // B ~ L_n[1/2, 1/2] with a corrective factor for mid-sized inputs.
        let le = l as f64 * std::f64::consts::LN_10;
        let scale = if l < 40 { (41 - l) as u64 } else { 1 };
        scale * (0.5 * (le * le.ln()).sqrt()).exp() as u64
    };
    Config {
        factor_base_bound: b,
        sieving_half_width: b,
        polynomial_exponent: l / 10,
        log_threshold: log2(b.max(1)) + 6,
    }
}

#[inline]
fn log2(x: u64) -> u32 {
    63 - x.leading_zeros()
}
