// Copyright 2023 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Relations describe an equation:
//! x² = product(pᵢ^kᵢ) mod n
//!
//! where pᵢ = -1 or a prime of the factor base, possibly together with a
//! single large prime. Sieve survivors are verified exactly here: the
//! polynomial is evaluated, trial divided over the base, and the
//! cofactor classified as smooth, partial (a single prime above the
//! base) or garbage. Two partials sharing their large prime combine
//! into a full relation whose large prime has even exponent.

use std::collections::HashMap;

use crate::arith;
use crate::fbase::FBase;
use crate::matrix::SparseMat;
use crate::poly::Poly;
use crate::{Int, Uint};

#[derive(Clone, Debug)]
pub struct Relation {
    /// The key x = a·t + b, unreduced (combined partials carry the
    /// product of their two keys).
    pub x: Int,
    /// Exponents of a·Q(t), sorted by prime; -1 encodes the sign.
    pub factors: Vec<(i64, u64)>,
}

impl Relation {
    pub fn verify(&self, n: &Uint) -> bool {
        let mut prod = Uint::ONE;
        for &(p, k) in self.factors.iter() {
            if p == -1 {
                if k % 2 == 1 {
                    prod = (*n - prod) % n;
                }
            } else {
                debug_assert!(p > 0);
                prod = (prod * arith::pow_mod(Uint::from(p as u64), Uint::from(k), *n)) % n;
            }
        }
        let x = arith::reduce_mod(&self.x, n);
        (x * x) % n == prod
    }
}

/// Exact smoothness verification of the sieve survivors of one
/// polynomial, followed by single-large-prime pairing within the block.
/// Smooth relations come out in ascending offset order, combined
/// partials after them.
pub fn extract(
    n: &Uint,
    pol: &Poly,
    fbase: &FBase,
    survivors: &[i64],
    maxlarge: u64,
) -> Vec<Relation> {
    let maxprime = fbase.bound();
    let mut full: Vec<Relation> = vec![];
    // large prime => partial relations sharing it, in offset order
    let mut partials: HashMap<u64, Vec<Relation>> = HashMap::new();
    for &t in survivors {
        let v = pol.eval(t);
        if v == Int::ZERO {
            // Only possible for square n, which the orchestrator refuses.
            continue;
        }
        let mut factors: Vec<(i64, u64)> = Vec::with_capacity(20);
        if v.is_negative() {
            factors.push((-1, 1));
        }
        let vabs = v.abs().to_bits();
        let (divided, cofactor) = arith::trial_divide(&fbase.primes, &vabs);
        factors.extend(divided);
        // x² = a·Q(t) mod n: merge the factorisation of a.
        for &(p, e) in &pol.afactors {
            match factors.iter_mut().find(|f| f.0 == p as i64) {
                Some(f) => f.1 += e as u64,
                None => factors.push((p as i64, e as u64)),
            }
        }
        factors.sort_unstable();
        if cofactor.bits() > 64 {
            continue;
        }
        let cof = arith::low_u64(&cofactor);
        let x = pol.key(t);
        if cof == 1 {
            full.push(Relation { x, factors });
        } else if cof > maxprime && cof <= maxlarge && arith::is_prime64(cof) {
            partials.entry(cof).or_default().push(Relation { x, factors });
        }
        // Residual primes inside the base bound were already extracted
        // in trial division; anything else is discarded.
    }
    // Pair the large prime with the most partials in this block. The
    // first partial is the pivot; it is consumed, not emitted.
    let best = partials
        .iter()
        .filter(|(_, group)| group.len() >= 2)
        .max_by_key(|&(&p, group)| (group.len(), std::cmp::Reverse(p)));
    if let Some((&lp, group)) = best {
        let pivot = &group[0];
        for other in &group[1..] {
            let mut exps = HashMap::<i64, u64>::new();
            for &(p, k) in pivot.factors.iter().chain(other.factors.iter()) {
                *exps.entry(p).or_insert(0) += k;
            }
            *exps.entry(lp as i64).or_insert(0) += 2;
            let mut factors: Vec<(i64, u64)> = exps.into_iter().collect();
            factors.sort_unstable();
            // Reduce the product key so it stays bounded by n.
            let x = (arith::reduce_mod(&pivot.x, n) * arith::reduce_mod(&other.x, n)) % n;
            full.push(Relation {
                x: Int::from_bits(x),
                factors,
            });
        }
    }
    full
}

/// Collects deduplicated relations across polynomial families. The
/// store only grows; the matrix is rebuilt on demand.
#[derive(Default)]
pub struct RelationStore {
    rels: HashMap<Int, Relation>,
}

impl RelationStore {
    pub fn new() -> Self {
        RelationStore::default()
    }

    pub fn len(&self) -> usize {
        self.rels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    /// Insert unless the key was already observed.
    pub fn add(&mut self, r: Relation) -> bool {
        if self.rels.contains_key(&r.x) {
            return false;
        }
        self.rels.insert(r.x, r);
        true
    }

    /// How many more relations are needed before the matrix can have
    /// more columns than rows (0 when none).
    pub fn gap(&self) -> usize {
        let mut occs = HashMap::<i64, u64>::new();
        for r in self.rels.values() {
            for &(p, k) in r.factors.iter() {
                if k % 2 == 1 {
                    *occs.entry(p).or_insert(0) += 1;
                }
            }
        }
        if occs.len() >= self.rels.len() {
            occs.len() + 1 - self.rels.len()
        } else {
            0
        }
    }
}

/// A pruned, densely indexed parity matrix together with the relations
/// backing each column.
pub struct MatrixBuild {
    /// Surviving relations in column order.
    pub columns: Vec<Relation>,
    pub mat: SparseMat,
}

/// Translate the store into a sparse GF(2) matrix: iteratively drop
/// relations carrying an odd prime that occurs in exactly one relation
/// (such primes can never cancel), renumber the surviving primes to
/// dense row indices ascending (-1, the sign sentinel, is row 0 when
/// present), and cap the column count at rows + slack to bound solver
/// cost. Pruning and capping alternate until both are no-ops, because
/// dropping a column can orphan a prime; the returned matrix is thus a
/// fixed point of this function and its rows are exactly the odd
/// primes of the shipped columns.
pub fn assemble(store: &RelationStore, slack: usize) -> MatrixBuild {
    let mut rels: Vec<&Relation> = store.rels.values().collect();
    rels.sort_by(|r1, r2| r1.x.cmp(&r2.x));
    let mut rows: Vec<i64>;
    loop {
        loop {
            let mut occs = HashMap::<i64, usize>::new();
            for r in &rels {
                for &(p, k) in r.factors.iter() {
                    if k % 2 == 1 {
                        *occs.entry(p).or_insert(0) += 1;
                    }
                }
            }
            let before = rels.len();
            rels.retain(|r| {
                r.factors
                    .iter()
                    .all(|&(p, k)| k % 2 == 0 || occs[&p] > 1)
            });
            if rels.len() == before {
                break;
            }
        }
        rows = vec![];
        for r in &rels {
            for &(p, k) in r.factors.iter() {
                if k % 2 == 1 {
                    rows.push(p);
                }
            }
        }
        rows.sort_unstable();
        rows.dedup();
        if rels.len() <= rows.len() + slack {
            break;
        }
        rels.truncate(rows.len() + slack);
    }
    let index: HashMap<i64, usize> = rows.iter().enumerate().map(|(i, &p)| (p, i)).collect();
    let cols = rels
        .iter()
        .map(|r| {
            let mut col: Vec<usize> = r
                .factors
                .iter()
                .filter(|&&(_, k)| k % 2 == 1)
                .map(|&(p, _)| index[&p])
                .collect();
            col.sort_unstable();
            col
        })
        .collect();
    MatrixBuild {
        columns: rels.into_iter().cloned().collect(),
        mat: SparseMat {
            nrows: rows.len(),
            cols,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fbase::FBase;
    use crate::poly::FamilyGenerator;
    use crate::sieve;

    fn harvest(n: u64, bound: u64, m: u64, k: u32, threshold: u32) -> (Uint, Vec<Relation>) {
        let n = Uint::from(n);
        let fbase = FBase::new(&n, bound).unwrap();
        let gen = FamilyGenerator::new(&n, k, m).unwrap();
        let mut rels = vec![];
        for pol in gen.polynomials().unwrap() {
            let surv = sieve::survivors(&pol, &fbase, m, threshold).unwrap();
            rels.extend(extract(&n, &pol, &fbase, &surv, bound * 64));
        }
        (n, rels)
    }

    #[test]
    fn test_extract_verifies() {
        let (n, rels) = harvest(8051, 100, 500, 0, 12);
        assert!(!rels.is_empty());
        for r in &rels {
            assert!(r.verify(&n), "invalid relation {r:?}");
        }
    }

    #[test]
    fn test_extract_family_verifies() {
        // Self-initialised families must merge the factors of a.
        let (n, rels) = harvest(10967535067, 2170, 2170, 2, 17);
        assert!(!rels.is_empty());
        for r in &rels {
            assert!(r.verify(&n), "invalid relation {r:?}");
        }
    }

    #[test]
    fn test_large_prime_pairing() {
        // Q(2) = Q(-2) = -11 for n = 15: the two partials sharing 11
        // combine into one relation with an even exponent of 11.
        let n = Uint::from(15_u64);
        let fbase = FBase::new(&n, 7).unwrap();
        let gen = FamilyGenerator::new(&n, 0, 7).unwrap();
        let pol = &gen.polynomials().unwrap()[0];
        let surv = sieve::survivors(pol, &fbase, 7, 8).unwrap();
        let rels = extract(&n, pol, &fbase, &surv, 7 * 64);
        let combined: Vec<&Relation> = rels
            .iter()
            .filter(|r| r.factors.iter().any(|&(p, _)| p == 11))
            .collect();
        assert_eq!(combined.len(), 1);
        let r = combined[0];
        assert_eq!(
            r.factors.iter().find(|&&(p, _)| p == 11),
            Some(&(11, 2))
        );
        assert!(r.verify(&n));
    }

    #[test]
    fn test_exponent_maps_are_exact() {
        // For smooth relations the recorded map reproduces |a·Q(t)|
        // exactly, and the -1 entry matches the sign.
        let n = Uint::from(8051_u64);
        let fbase = FBase::new(&n, 100).unwrap();
        let gen = FamilyGenerator::new(&n, 0, 500).unwrap();
        let pol = &gen.polynomials().unwrap()[0];
        let surv = sieve::survivors(pol, &fbase, 500, 12).unwrap();
        let rels = extract(&n, pol, &fbase, &surv, 6400);
        let mut checked = 0;
        let maxprime = fbase.bound() as i64;
        for r in &rels {
            if r.factors.iter().any(|&(p, _)| p > maxprime) {
                // Combined partials carry a large prime and a product key.
                continue;
            }
            // For the trivial family the key is the offset itself.
            let t = num_traits::ToPrimitive::to_i64(&r.x).unwrap();
            let v = pol.eval(t);
            let mut prod = Uint::ONE;
            let mut sign_odd = false;
            for &(p, k) in &r.factors {
                if p == -1 {
                    sign_odd = k % 2 == 1;
                    continue;
                }
                for _ in 0..k {
                    prod *= Uint::from(p as u64);
                }
            }
            assert_eq!(prod, v.abs().to_bits(), "t={t}");
            assert_eq!(sign_odd, v.is_negative(), "t={t}");
            checked += 1;
        }
        assert!(checked > 0);
    }

    #[test]
    fn test_store_dedup() {
        let (_n, rels) = harvest(8051, 100, 500, 0, 12);
        let mut store = RelationStore::new();
        let mut added = 0;
        for r in rels.clone() {
            if store.add(r) {
                added += 1;
            }
        }
        assert_eq!(store.len(), added);
        // Re-observing the same survivors adds nothing.
        for r in rels {
            assert!(!store.add(r));
        }
    }

    #[test]
    fn test_pruning_idempotent() {
        let (_, rels) = harvest(8051, 100, 500, 0, 12);
        let mut store = RelationStore::new();
        for r in rels {
            store.add(r);
        }
        let build = assemble(&store, 6);
        // Pruning its own output is a no-op: every odd prime of the
        // surviving set occurs at least twice.
        let mut occs = HashMap::<i64, usize>::new();
        for r in &build.columns {
            for &(p, k) in r.factors.iter() {
                if k % 2 == 1 {
                    *occs.entry(p).or_insert(0) += 1;
                }
            }
        }
        let mut store2 = RelationStore::new();
        for r in build.columns.clone() {
            store2.add(r);
        }
        let build2 = assemble(&store2, 6);
        assert_eq!(build2.columns.len(), build.columns.len());
        assert_eq!(build2.mat.nrows, build.mat.nrows);
        let keys: Vec<Int> = build.columns.iter().map(|r| r.x).collect();
        let keys2: Vec<Int> = build2.columns.iter().map(|r| r.x).collect();
        assert_eq!(keys, keys2);
    }

    #[test]
    fn test_matrix_shape() {
        let (_, rels) = harvest(8051, 100, 500, 0, 12);
        let mut store = RelationStore::new();
        for r in rels {
            store.add(r);
        }
        let build = assemble(&store, 6);
        assert_eq!(build.columns.len(), build.mat.cols.len());
        assert!(build.mat.cols.len() <= build.mat.nrows + 6);
        for col in &build.mat.cols {
            assert!(col.windows(2).all(|w| w[0] < w[1]));
            assert!(col.iter().all(|&i| i < build.mat.nrows));
        }
    }
}
