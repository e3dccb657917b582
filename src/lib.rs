// Copyright 2023 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Factorisation of odd composite integers through the self-initialising
//! multiple polynomial quadratic sieve (MPQS) with the single large prime
//! variation.
//!
//! The crate exposes a small API:
//! - [`factor`] and [`factor_with_config`] return a non-trivial factor of n,
//! - [`relations`] returns the underlying lazy stream of congruences
//!   x² ≡ y² (mod n) that the factor extraction consumes,
//! - [`auto_config`] derives sieving parameters from the size of n.
//!
//! The caller guarantees that n is an odd composite. Prime inputs make the
//! relation stream run forever; perfect squares are detected up front.

pub mod arith;
pub mod fbase;
pub mod matrix;
pub mod mpqs;
pub mod params;
pub mod poly;
pub mod relations;
pub mod sieve;

// We need to perform modular multiplication modulo the input number.
pub type Int = arith::I1024;
pub type Uint = arith::U1024;

pub use mpqs::{factor, factor_with_config, relations, Relations};
pub use params::auto_config;

/// Sieving parameters. All four fields are required; [`auto_config`]
/// derives a sensible set from the size of n.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Upper bound B for the factor base primes.
    pub factor_base_bound: u64,
    /// Half-width m of the sieved interval [-m, m].
    pub sieving_half_width: u64,
    /// Number k of prime factors of the leading coefficient.
    /// Zero selects the classical single polynomial sieve.
    pub polynomial_exponent: u32,
    /// Maximum residual log admitted as a sieve survivor.
    pub log_threshold: u32,
}

/// Stderr chattiness of the orchestrator. Tracing never affects outputs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    #[default]
    Silent,
    Info,
    Verbose,
    Debug,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The configuration cannot produce enough relations: the factor base
    /// is empty, the requested polynomial family does not exist, or the
    /// stream is exhausted and widening no longer makes progress.
    ParametersTooSmall(&'static str),
    /// The input is a perfect square, which the sieve cannot process
    /// (Q would vanish inside the interval).
    InputNotComposite,
    /// A sieve-time invariant was violated. This indicates a logic error
    /// or a violated precondition, such as a factor base prime dividing n.
    InternalInconsistency(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ParametersTooSmall(what) => write!(f, "parameters too small: {what}"),
            Error::InputNotComposite => write!(f, "input is not an odd composite"),
            Error::InternalInconsistency(what) => write!(f, "internal inconsistency: {what}"),
        }
    }
}

impl std::error::Error for Error {}
