// Copyright 2023 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Orchestration of the multiple polynomial quadratic sieve.
//!
//! The driver below walks the polynomial families produced by the
//! self-initialisation, sieves each polynomial over [-m, m], stores the
//! verified relations, and once the parity matrix has enough columns
//! solves it for kernel vectors. Each kernel vector is turned into a
//! congruence x² ≡ y² (mod n) and handed to the caller through a lazy
//! iterator; consumers stop pulling once gcd(x - y, n) is non-trivial.
//!
//! When a parameter set is starved (no matrix after a budget of
//! families, or all solver seeds spent) the bound and the interval are
//! widened and sieving resumes with the relation store intact. The
//! stream is unbounded as long as widening makes progress.
//!
//! Bibliography:
//! Robert D. Silverman, The multiple polynomial quadratic sieve,
//! Math. Comp. 48, 1987, <https://doi.org/10.1090/S0025-5718-1987-0866119-8>

use std::collections::HashMap;

use bitvec_simd::BitVec;
use num_integer::Integer;

use crate::arith;
use crate::fbase::FBase;
use crate::matrix;
use crate::poly::{FamilyGenerator, Poly};
use crate::relations::{self, Relation, RelationStore};
use crate::sieve;
use crate::{Config, Error, Uint, Verbosity};

/// Solver seeds tried per assembled matrix before widening.
const SOLVER_ATTEMPTS: u64 = 5;

/// Find a non-trivial factor of the odd composite n, with parameters
/// derived from its size.
pub fn factor(n: &Uint) -> Result<Uint, Error> {
    factor_with_config(n, crate::params::auto_config(n))
}

/// Find a non-trivial factor of the odd composite n.
///
/// Perfect squares are special-cased: the square root is returned
/// directly, so prime squares like 9 factor without sieving.
pub fn factor_with_config(n: &Uint, cfg: Config) -> Result<Uint, Error> {
    let r = arith::isqrt(*n);
    if r * r == *n {
        return Ok(r);
    }
    for pair in relations(n, cfg)? {
        let (x, y) = pair?;
        let diff = if x >= y { x - y } else { y - x };
        let g = diff.gcd(n);
        if !g.is_one() && g != *n {
            return Ok(g);
        }
    }
    Err(Error::ParametersTooSmall("relation stream ended"))
}

/// The lazy stream of congruences x² ≡ y² (mod n).
pub fn relations(n: &Uint, cfg: Config) -> Result<Relations, Error> {
    Relations::new(n, cfg)
}

struct Solved {
    /// Relations backing the matrix columns.
    columns: Vec<Relation>,
    basis: Vec<BitVec>,
    ncols: usize,
    attempts: u64,
}

/// Iterator over congruences x² ≡ y² (mod n). See [`relations`].
pub struct Relations {
    n: Uint,
    k: u32,
    threshold: u32,
    bound: u64,
    halfwidth: u64,
    slack: usize,
    verbosity: Verbosity,
    fbase: FBase,
    families: FamilyGenerator,
    family_advanced: bool,
    families_done: usize,
    family_budget: usize,
    queue: Vec<Poly>,
    store: RelationStore,
    target: usize,
    store_at_widen: usize,
    stalls: u32,
    next_seed: u64,
    solved: Option<Solved>,
    failed: bool,
}

impl Relations {
    pub fn new(n: &Uint, cfg: Config) -> Result<Relations, Error> {
        let r = arith::isqrt(*n);
        if r * r == *n {
            return Err(Error::InputNotComposite);
        }
        let fbase = FBase::new(n, cfg.factor_base_bound)?;
        let families =
            FamilyGenerator::new(n, cfg.polynomial_exponent, cfg.sieving_half_width)?;
        let family_budget = 8 * fbase.len() + 32;
        let target = fbase.len() * 8 / 10 + 1;
        Ok(Relations {
            n: *n,
            k: cfg.polynomial_exponent,
            threshold: cfg.log_threshold,
            bound: cfg.factor_base_bound,
            halfwidth: cfg.sieving_half_width,
            slack: 3 * (cfg.polynomial_exponent as usize + 2),
            verbosity: Verbosity::Silent,
            fbase,
            families,
            family_advanced: false,
            families_done: 0,
            family_budget,
            queue: vec![],
            store: RelationStore::new(),
            target,
            store_at_widen: usize::MAX,
            stalls: 0,
            next_seed: 0,
            solved: None,
            failed: false,
        })
    }

    pub fn with_verbosity(mut self, v: Verbosity) -> Self {
        self.verbosity = v;
        self
    }

    fn verbose(&self, v: Verbosity) -> bool {
        self.verbosity >= v
    }

    /// Largest admitted partial cofactor, matching the +6 slack of the
    /// sieve threshold.
    fn maxlarge(&self) -> u64 {
        self.bound.saturating_mul(64)
    }

    /// When the store looks large enough, rebuild the matrix and keep
    /// the kernel basis if the column excess suffices.
    fn try_assemble(&mut self) -> bool {
        if self.store.len() < self.target {
            return false;
        }
        let gap = self.store.gap();
        if gap > 0 {
            self.target = self.store.len() + gap + std::cmp::min(10, self.fbase.len() / 4);
            return false;
        }
        let build = relations::assemble(&self.store, self.slack);
        let (ncols, nrows) = (build.mat.cols.len(), build.mat.nrows);
        if ncols < nrows + self.slack {
            let deficit = nrows + self.slack - ncols;
            self.target = self.store.len() + deficit;
            return false;
        }
        let basis = matrix::kernel_basis(&build.mat);
        if self.verbose(Verbosity::Info) {
            eprintln!(
                "Found enough relations: matrix {}x{} kernel dimension {}",
                nrows,
                ncols,
                basis.len()
            );
        }
        self.solved = Some(Solved {
            columns: build.columns,
            basis,
            ncols,
            attempts: 0,
        });
        true
    }

    /// Sieve polynomial families until a matrix is ready (true) or the
    /// family budget is exhausted (false).
    fn harvest(&mut self) -> Result<bool, Error> {
        loop {
            if self.try_assemble() {
                return Ok(true);
            }
            if self.queue.is_empty() {
                if self.families_done >= self.family_budget {
                    return Ok(false);
                }
                if self.family_advanced {
                    self.families.advance()?;
                }
                self.family_advanced = true;
                let mut polys = self.families.polynomials()?;
                if self.verbose(Verbosity::Verbose) {
                    eprintln!(
                        "Sieving family a = {} ({} polynomials)",
                        polys
                            .first()
                            .map(|p| p.a.to_string())
                            .unwrap_or_else(|| "1".into()),
                        polys.len()
                    );
                }
                polys.reverse();
                self.queue = polys;
                self.families_done += 1;
            }
            let pol = self.queue.pop().expect("queue refilled above");
            let surv = sieve::survivors(&pol, &self.fbase, self.halfwidth, self.threshold)?;
            let found = relations::extract(&self.n, &pol, &self.fbase, &surv, self.maxlarge());
            for r in found {
                debug_assert!(r.verify(&self.n));
                self.store.add(r);
            }
        }
    }

    /// Enlarge the factor base bound and the interval, keeping k and the
    /// threshold, and restart the polynomial walk. The store survives.
    fn widen(&mut self) -> Result<(), Error> {
        if self.store.len() == self.store_at_widen {
            self.stalls += 1;
            if self.stalls >= 2 {
                return Err(Error::ParametersTooSmall("widening makes no progress"));
            }
        } else {
            self.stalls = 0;
        }
        self.store_at_widen = self.store.len();
        let k = self.k as u64;
        self.bound += 50 * (k + 1);
        self.halfwidth += 50 * (k + 1) * (k + 1);
        if self.verbose(Verbosity::Info) {
            eprintln!(
                "Widening parameters: bound {} interval half-width {}",
                self.bound, self.halfwidth
            );
        }
        self.fbase = FBase::new(&self.n, self.bound)?;
        self.families = FamilyGenerator::new(&self.n, self.k, self.halfwidth)?;
        self.family_advanced = false;
        self.families_done = 0;
        self.family_budget = 8 * self.fbase.len() + 32;
        self.queue.clear();
        self.target = std::cmp::max(self.store.len(), self.fbase.len() * 8 / 10) + 1;
        Ok(())
    }
}

impl Iterator for Relations {
    type Item = Result<(Uint, Uint), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(sol) = self.solved.as_mut() {
                if sol.attempts < SOLVER_ATTEMPTS && !sol.basis.is_empty() {
                    let seed = self.next_seed;
                    self.next_seed += 1;
                    sol.attempts += 1;
                    let picked = matrix::sample_kernel_vector(&sol.basis, sol.ncols, seed)
                        .expect("nonempty basis");
                    let pair = combine(&self.n, &sol.columns, &picked);
                    debug_assert!(
                        (pair.0 * pair.0) % self.n == (pair.1 * pair.1) % self.n
                    );
                    return Some(Ok(pair));
                }
                self.solved = None;
                if let Err(e) = self.widen() {
                    self.failed = true;
                    return Some(Err(e));
                }
                continue;
            }
            match self.harvest() {
                Ok(true) => continue,
                Ok(false) => {
                    if let Err(e) = self.widen() {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Reconstruct the congruence behind one kernel vector:
/// x = ∏ keys mod n, y = ∏ p^(e/2) mod n over the summed exponents.
fn combine(n: &Uint, columns: &[Relation], picked: &[usize]) -> (Uint, Uint) {
    let mut x = Uint::ONE;
    let mut exps = HashMap::<i64, u64>::new();
    for &j in picked {
        let r = &columns[j];
        x = (x * arith::reduce_mod(&r.x, n)) % n;
        for &(p, k) in r.factors.iter() {
            *exps.entry(p).or_insert(0) += k;
        }
    }
    let mut exps: Vec<(i64, u64)> = exps.into_iter().collect();
    exps.sort_unstable();
    let mut y = Uint::ONE;
    for (p, k) in exps {
        debug_assert!(k % 2 == 0, "odd exponent for {p} in a kernel vector");
        if p == -1 {
            continue;
        }
        y = (y * arith::pow_mod(Uint::from(p as u64), Uint::from(k / 2), *n)) % n;
    }
    (x, y)
}
