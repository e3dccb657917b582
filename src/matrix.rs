// Copyright 2023 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Kernels of sparse matrices modulo 2.
//!
//! Columns represent exponent-parity vectors of relations, rows the
//! densely renumbered primes. The kernel is computed once per matrix by
//! Gaussian elimination over dense bit vectors; a seed then selects one
//! kernel vector, so that repeated solver calls with fresh seeds explore
//! different dependencies without re-eliminating.
//!
//! Matrices coming from the quadratic sieve are heavily skewed: the
//! rows of small primes are extremely dense and density decays for
//! larger primes. Dense bitset elimination is insensitive to this and
//! comfortably handles the matrix sizes the orchestrator caps at.

use bitvec_simd::BitVec;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A sparse GF(2) matrix: each column holds the sorted row indices of
/// its nonzero entries.
#[derive(Clone, Debug)]
pub struct SparseMat {
    pub nrows: usize,
    pub cols: Vec<Vec<usize>>,
}

/// Basis of the right kernel, as combination vectors over the columns.
/// Each basis vector has its highest set bit at a distinct column, so
/// any nonempty subset XORs to a nonzero combination.
pub fn kernel_basis(mat: &SparseMat) -> Vec<BitVec> {
    let ncols = mat.cols.len();
    let mut combos: Vec<BitVec> = (0..ncols)
        .map(|j| {
            let mut v = BitVec::zeros(ncols);
            v.set(j, true);
            v
        })
        .collect();
    if mat.nrows == 0 {
        return combos;
    }
    let mut cols: Vec<BitVec> = mat
        .cols
        .iter()
        .map(|c| {
            let mut v = BitVec::zeros(mat.nrows);
            for &i in c {
                v.set(i, true);
            }
            v
        })
        .collect();
    // pivots[r] = column owning the pivot at row r
    let mut pivots: Vec<Option<usize>> = vec![None; mat.nrows];
    let mut basis = vec![];
    for j in 0..ncols {
        loop {
            let lead = cols[j].leading_zeros();
            if lead >= mat.nrows {
                basis.push(combos[j].clone());
                break;
            }
            match pivots[lead] {
                Some(i) => {
                    let pc = cols[i].clone();
                    let pk = combos[i].clone();
                    cols[j].xor_inplace(&pc);
                    combos[j].xor_inplace(&pk);
                }
                None => {
                    pivots[lead] = Some(j);
                    break;
                }
            }
        }
    }
    basis
}

/// Deterministically pick one kernel vector from a basis, as a sorted
/// set of column indices. Equal seeds give equal vectors.
pub fn sample_kernel_vector(basis: &[BitVec], ncols: usize, seed: u64) -> Option<Vec<usize>> {
    if basis.is_empty() {
        return None;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut acc = BitVec::zeros(ncols);
    let mut picked = false;
    for v in basis {
        if rng.gen::<bool>() {
            acc.xor_inplace(v);
            picked = true;
        }
    }
    if !picked {
        acc.xor_inplace(&basis[seed as usize % basis.len()]);
    }
    Some(acc.into_usizes())
}

/// The solver interface: one kernel vector per (matrix, seed).
pub fn linear_solve_gf2(mat: &SparseMat, seed: u64) -> Option<Vec<usize>> {
    let basis = kernel_basis(mat);
    sample_kernel_vector(&basis, mat.cols.len(), seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_sum(mat: &SparseMat, picked: &[usize]) -> Vec<usize> {
        let mut counts = vec![0_usize; mat.nrows];
        for &j in picked {
            for &i in &mat.cols[j] {
                counts[i] += 1;
            }
        }
        counts
    }

    #[test]
    fn test_kernel_small() {
        // Columns: c0 = {0}, c1 = {1}, c2 = {0,1}, c3 = {0} (duplicate).
        let mat = SparseMat {
            nrows: 2,
            cols: vec![vec![0], vec![1], vec![0, 1], vec![0]],
        };
        let basis = kernel_basis(&mat);
        // 4 columns, rank 2 => kernel dimension 2.
        assert_eq!(basis.len(), 2);
        for seed in 0..20 {
            let picked = linear_solve_gf2(&mat, seed).unwrap();
            assert!(!picked.is_empty());
            for c in column_sum(&mat, &picked) {
                assert_eq!(c % 2, 0, "seed {seed} gave a non-kernel vector");
            }
        }
    }

    #[test]
    fn test_kernel_trivial_only() {
        // Independent columns: empty kernel.
        let mat = SparseMat {
            nrows: 3,
            cols: vec![vec![0], vec![1], vec![0, 2]],
        };
        assert!(kernel_basis(&mat).is_empty());
        assert_eq!(linear_solve_gf2(&mat, 1), None);
    }

    #[test]
    fn test_kernel_determinism() {
        let mat = SparseMat {
            nrows: 2,
            cols: vec![vec![0], vec![1], vec![0, 1], vec![0], vec![1]],
        };
        for seed in 0..10 {
            assert_eq!(
                linear_solve_gf2(&mat, seed),
                linear_solve_gf2(&mat, seed)
            );
        }
    }

    #[test]
    fn test_kernel_excess_columns() {
        // More columns than rows always yields a nonempty kernel.
        let mut cols = vec![];
        for j in 0..12_usize {
            cols.push(vec![j % 5, (j * j + 1) % 5]);
        }
        let mat = SparseMat { nrows: 5, cols };
        let basis = kernel_basis(&mat);
        assert!(basis.len() >= 12 - 5);
        for seed in 0..20 {
            let picked = linear_solve_gf2(&mat, seed).unwrap();
            for c in column_sum(&mat, &picked) {
                assert_eq!(c % 2, 0);
            }
        }
    }
}
