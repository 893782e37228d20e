//! Block Schwarz preconditioner on CSR matrices.
//!
//! Blocks are caller-supplied index sets (typically a node plus its
//! neighbors, possibly overlapping). Each block's dense subsystem is
//! extracted and factored once with pivoted LU; an apply walks the blocks,
//! solves each against the current residual and accumulates corrections,
//! refreshing the residual between blocks.

use super::Preconditioner;
use crate::core::traits::MatVec;
use crate::matrix::{smat, CsrMatrix};
use crate::{Int, Real, SolverError};

pub struct SchwarzPc {
    a: CsrMatrix,
    blocks: Vec<Vec<usize>>,
    lu: Vec<Vec<Real>>,
    pivot: Vec<Vec<Int>>,
    /// Residual-update sweeps per apply.
    pub sweeps: usize,
}

impl SchwarzPc {
    /// Extract and factor every block subsystem. Blocks whose LU breaks
    /// down are reported and solved as identity (skip-the-block fallback).
    pub fn new(a: &CsrMatrix, blocks: Vec<Vec<usize>>) -> Result<Self, SolverError> {
        let mut lus = Vec::with_capacity(blocks.len());
        let mut pivots = Vec::with_capacity(blocks.len());
        for (bi, block) in blocks.iter().enumerate() {
            let nb = block.len();
            let sub = a.submatrix(block);
            let mut dense = vec![0.0; nb * nb];
            for (i, j, v) in sub.to_coo() {
                dense[i * nb + j] = v;
            }
            let mut piv = vec![0 as Int; nb];
            if let Err(e) = smat::lu_decomp(&mut dense, &mut piv, nb) {
                log::warn!("schwarz block {bi} is singular ({e}); using identity");
                dense = (0..nb * nb)
                    .map(|k| if k / nb == k % nb { 1.0 } else { 0.0 })
                    .collect();
                piv.iter_mut().enumerate().for_each(|(k, p)| *p = k as Int);
            }
            lus.push(dense);
            pivots.push(piv);
        }
        Ok(Self { a: a.clone(), blocks, lu: lus, pivot: pivots, sweeps: 1 })
    }

    /// Uniform contiguous partition into `nblocks` index blocks.
    pub fn with_uniform_blocks(a: &CsrMatrix, nblocks: usize) -> Result<Self, SolverError> {
        use crate::core::traits::Indexing;
        let blocks = crate::utils::partition::chunk_ranges(a.nrows(), nblocks)
            .into_iter()
            .map(|r| r.collect())
            .collect();
        Self::new(a, blocks)
    }
}

impl Preconditioner for SchwarzPc {
    fn apply(&mut self, r: &[Real], z: &mut [Real]) -> Result<(), SolverError> {
        let maxb = self.blocks.iter().map(Vec::len).max().unwrap_or(0);
        let mut res = vec![0.0; r.len()];
        let mut rloc = vec![0.0; maxb];
        let mut e = vec![0.0; maxb];
        z.fill(0.0);
        for _ in 0..self.sweeps {
            for (bi, block) in self.blocks.iter().enumerate() {
                // explicit residual of the running correction
                res.copy_from_slice(r);
                self.a.aaxpy(-1.0, z, &mut res);
                let nb = block.len();
                for (k, &i) in block.iter().enumerate() {
                    rloc[k] = res[i];
                }
                smat::lu_solve(&self.lu[bi], &rloc, &self.pivot[bi], &mut e, nb);
                for (k, &i) in block.iter().enumerate() {
                    z[i] += e[k];
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blas;
    use crate::core::traits::MatVec;

    fn laplace_1d(n: usize) -> CsrMatrix {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 2.0));
            if i > 0 {
                t.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                t.push((i, i + 1, -1.0));
            }
        }
        CsrMatrix::from_coo(n, n, &t)
    }

    #[test]
    fn single_block_is_a_direct_solve() {
        let n = 8;
        let a = laplace_1d(n);
        let mut pc = SchwarzPc::with_uniform_blocks(&a, 1).unwrap();
        let x_true: Vec<Real> = (0..n).map(|i| (i as Real + 1.0).sqrt()).collect();
        let mut b = vec![0.0; n];
        a.matvec(&x_true, &mut b);
        let mut z = vec![0.0; n];
        pc.apply(&b, &mut z).unwrap();
        for (zi, ei) in z.iter().zip(&x_true) {
            assert!((zi - ei).abs() < 1e-11);
        }
    }

    #[test]
    fn multi_block_reduces_residual() {
        let n = 16;
        let a = laplace_1d(n);
        let mut pc = SchwarzPc::with_uniform_blocks(&a, 4).unwrap();
        let b = vec![1.0; n];
        let mut z = vec![0.0; n];
        pc.apply(&b, &mut z).unwrap();
        let mut r = b.clone();
        a.aaxpy(-1.0, &z, &mut r);
        assert!(blas::norm2(&r) < blas::norm2(&b));
    }

    #[test]
    fn overlapping_blocks_accepted() {
        let n = 9;
        let a = laplace_1d(n);
        let blocks = vec![(0..5).collect::<Vec<_>>(), (4..9).collect()];
        let mut pc = SchwarzPc::new(&a, blocks).unwrap();
        pc.sweeps = 2;
        let b = vec![1.0; n];
        let mut z = vec![0.0; n];
        pc.apply(&b, &mut z).unwrap();
        let mut r = b.clone();
        a.aaxpy(-1.0, &z, &mut r);
        assert!(blas::norm2(&r) < 0.5 * blas::norm2(&b));
    }
}
