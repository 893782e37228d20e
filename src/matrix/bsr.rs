//! Block sparse row storage.
//!
//! Same invariants as CSR but over `nb x nb` dense tiles stored row-major.
//! The matvec dispatches on the block size held by the matrix: 2, 3, 5 and
//! 7 take the unrolled tile kernels, everything else the generic loops.

use crate::core::traits::{Indexing, MatTransVec, MatVec};
use crate::matrix::smat;
use crate::matrix::CsrMatrix;
use crate::Real;

#[derive(Clone, Debug, PartialEq)]
pub struct BsrMatrix {
    /// Block rows.
    pub nrowb: usize,
    /// Block columns.
    pub ncolb: usize,
    /// Block size.
    pub nb: usize,
    pub ia: Vec<usize>,
    pub ja: Vec<usize>,
    /// Tile values, `nnzb * nb * nb`, each tile row-major.
    pub val: Vec<Real>,
}

impl BsrMatrix {
    pub fn from_raw(
        nrowb: usize,
        ncolb: usize,
        nb: usize,
        ia: Vec<usize>,
        ja: Vec<usize>,
        val: Vec<Real>,
    ) -> Self {
        assert!(nb >= 1);
        assert_eq!(ia.len(), nrowb + 1);
        assert_eq!(*ia.last().unwrap(), ja.len());
        assert_eq!(val.len(), ja.len() * nb * nb);
        Self { nrowb, ncolb, nb, ia, ja, val }
    }

    pub fn nnzb(&self) -> usize {
        self.ja.len()
    }

    #[inline]
    pub fn block(&self, p: usize) -> &[Real] {
        let nb2 = self.nb * self.nb;
        &self.val[p * nb2..(p + 1) * nb2]
    }

    /// Block columns and tile values of block row `i`.
    pub fn block_row(&self, i: usize) -> (&[usize], &[Real]) {
        let lo = self.ia[i];
        let hi = self.ia[i + 1];
        let nb2 = self.nb * self.nb;
        (&self.ja[lo..hi], &self.val[lo * nb2..hi * nb2])
    }

    /// Copy of the diagonal tiles, `nrowb * nb * nb` long; missing
    /// diagonal blocks read as zero tiles.
    pub fn diagonal_blocks(&self) -> Vec<Real> {
        let nb2 = self.nb * self.nb;
        let mut d = vec![0.0; self.nrowb * nb2];
        for i in 0..self.nrowb {
            for p in self.ia[i]..self.ia[i + 1] {
                if self.ja[p] == i {
                    d[i * nb2..(i + 1) * nb2].copy_from_slice(self.block(p));
                    break;
                }
            }
        }
        d
    }

    /// Expand into scalar CSR (block order preserved within rows).
    pub fn to_csr(&self) -> CsrMatrix {
        let nb = self.nb;
        let mut triples = Vec::with_capacity(self.nnzb() * nb * nb);
        for bi in 0..self.nrowb {
            for p in self.ia[bi]..self.ia[bi + 1] {
                let bj = self.ja[p];
                let tile = self.block(p);
                for r in 0..nb {
                    for c in 0..nb {
                        let v = tile[r * nb + c];
                        if v != 0.0 {
                            triples.push((bi * nb + r, bj * nb + c, v));
                        }
                    }
                }
            }
        }
        CsrMatrix::from_coo(self.nrowb * nb, self.ncolb * nb, &triples)
    }

    /// Gather a scalar CSR whose dimensions are divisible by `nb` into
    /// tiles. A tile is kept when any of its scalar entries is nonzero.
    pub fn from_csr(a: &CsrMatrix, nb: usize) -> Self {
        assert!(a.nrows() % nb == 0 && a.ncols() % nb == 0, "dims must divide nb");
        let nrowb = a.nrows() / nb;
        let ncolb = a.ncols() / nb;
        let nb2 = nb * nb;
        let mut ia = vec![0usize; nrowb + 1];
        let mut ja = Vec::new();
        let mut val = Vec::new();
        let mut marker = vec![usize::MAX; ncolb];
        let mut slot = vec![0usize; ncolb];
        for bi in 0..nrowb {
            let row_start = ja.len();
            for r in 0..nb {
                let i = bi * nb + r;
                let (cols, vals) = a.row(i);
                for (&j, &v) in cols.iter().zip(vals) {
                    let bj = j / nb;
                    if marker[bj] != bi {
                        marker[bj] = bi;
                        slot[bj] = ja.len();
                        ja.push(bj);
                        val.extend(std::iter::repeat(0.0).take(nb2));
                    }
                    let p = slot[bj];
                    val[p * nb2 + r * nb + (j % nb)] = v;
                }
            }
            // canonical block order within the row
            let mut order: Vec<usize> = (row_start..ja.len()).collect();
            order.sort_unstable_by_key(|&p| ja[p]);
            let ja_sorted: Vec<usize> = order.iter().map(|&p| ja[p]).collect();
            let val_sorted: Vec<Real> = order
                .iter()
                .flat_map(|&p| val[p * nb2..(p + 1) * nb2].to_vec())
                .collect();
            ja[row_start..].copy_from_slice(&ja_sorted);
            val[row_start * nb2..].copy_from_slice(&val_sorted);
            ia[bi + 1] = ja.len();
        }
        Self { nrowb, ncolb, nb, ia, ja, val }
    }

    /// Block transpose: pattern transposed and every tile transposed.
    pub fn transpose(&self) -> BsrMatrix {
        let nb = self.nb;
        let nb2 = nb * nb;
        let mut count = vec![0usize; self.ncolb + 1];
        for &j in &self.ja {
            count[j + 1] += 1;
        }
        for j in 0..self.ncolb {
            count[j + 1] += count[j];
        }
        let mut ja = vec![0usize; self.nnzb()];
        let mut val = vec![0.0; self.val.len()];
        let mut next = count.clone();
        for i in 0..self.nrowb {
            for p in self.ia[i]..self.ia[i + 1] {
                let j = self.ja[p];
                let q = next[j];
                ja[q] = i;
                let src = self.block(p);
                let dst = &mut val[q * nb2..(q + 1) * nb2];
                for r in 0..nb {
                    for c in 0..nb {
                        dst[c * nb + r] = src[r * nb + c];
                    }
                }
                next[j] += 1;
            }
        }
        BsrMatrix { nrowb: self.ncolb, ncolb: self.nrowb, nb, ia: count, ja, val }
    }
}

impl Indexing for BsrMatrix {
    fn nrows(&self) -> usize {
        self.nrowb * self.nb
    }
    fn ncols(&self) -> usize {
        self.ncolb * self.nb
    }
}

impl MatVec for BsrMatrix {
    fn matvec(&self, x: &[Real], y: &mut [Real]) {
        y.fill(0.0);
        self.aaxpy(1.0, x, y);
    }

    fn aaxpy(&self, alpha: Real, x: &[Real], y: &mut [Real]) {
        assert_eq!(x.len(), self.ncols());
        assert_eq!(y.len(), self.nrows());
        let nb = self.nb;
        let mut tmp = vec![0.0; nb];
        for bi in 0..self.nrowb {
            tmp.fill(0.0);
            for p in self.ia[bi]..self.ia[bi + 1] {
                let bj = self.ja[p];
                smat::ypax(self.block(p), &x[bj * nb..(bj + 1) * nb], &mut tmp, nb);
            }
            for r in 0..nb {
                y[bi * nb + r] += alpha * tmp[r];
            }
        }
    }
}

impl MatTransVec for BsrMatrix {
    fn matvec_t(&self, x: &[Real], y: &mut [Real]) {
        assert_eq!(x.len(), self.nrows());
        assert_eq!(y.len(), self.ncols());
        let nb = self.nb;
        y.fill(0.0);
        let mut tmp = vec![0.0; nb];
        for bi in 0..self.nrowb {
            let xs = &x[bi * nb..(bi + 1) * nb];
            for p in self.ia[bi]..self.ia[bi + 1] {
                let bj = self.ja[p];
                // tile transposed on the fly
                let tile = self.block(p);
                for c in 0..nb {
                    let mut s = 0.0;
                    for r in 0..nb {
                        s += tile[r * nb + c] * xs[r];
                    }
                    tmp[c] = s;
                }
                for c in 0..nb {
                    y[bj * nb + c] += tmp[c];
                }
            }
        }
    }
}

/// Block sparse product `C = A B` over `nb x nb` tiles.
pub fn spmm(a: &BsrMatrix, b: &BsrMatrix) -> BsrMatrix {
    assert_eq!(a.ncolb, b.nrowb, "inner block dimension mismatch");
    assert_eq!(a.nb, b.nb, "block size mismatch");
    let nb = a.nb;
    let nb2 = nb * nb;
    let n = a.nrowb;
    let m = b.ncolb;
    let mut marker = vec![usize::MAX; m];
    let mut slot = vec![0usize; m];
    let mut ia = vec![0usize; n + 1];
    let mut ja: Vec<usize> = Vec::new();
    let mut val: Vec<Real> = Vec::new();
    let mut prod = vec![0.0; nb2];
    for i in 0..n {
        let row_start = ja.len();
        for p in a.ia[i]..a.ia[i + 1] {
            let k = a.ja[p];
            let atile = a.block(p);
            for q in b.ia[k]..b.ia[k + 1] {
                let j = b.ja[q];
                if marker[j] != i {
                    marker[j] = i;
                    slot[j] = ja.len();
                    ja.push(j);
                    val.extend(std::iter::repeat(0.0).take(nb2));
                }
                smat::mul(atile, b.block(q), &mut prod, nb);
                let dst = &mut val[slot[j] * nb2..(slot[j] + 1) * nb2];
                for (d, &s) in dst.iter_mut().zip(&prod) {
                    *d += s;
                }
            }
        }
        let mut order: Vec<usize> = (row_start..ja.len()).collect();
        order.sort_unstable_by_key(|&p| ja[p]);
        let ja_sorted: Vec<usize> = order.iter().map(|&p| ja[p]).collect();
        let val_sorted: Vec<Real> =
            order.iter().flat_map(|&p| val[p * nb2..(p + 1) * nb2].to_vec()).collect();
        ja[row_start..].copy_from_slice(&ja_sorted);
        val[row_start * nb2..].copy_from_slice(&val_sorted);
        ia[i + 1] = ja.len();
    }
    BsrMatrix { nrowb: n, ncolb: m, nb, ia, ja, val }
}

/// Galerkin triple product `R A P` on tiles, computed as `R (A P)` with the
/// small dense kernels doing the per-tile work.
pub fn rap(r: &BsrMatrix, a: &BsrMatrix, p: &BsrMatrix) -> BsrMatrix {
    spmm(r, &spmm(a, p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::csr;
    use approx::assert_abs_diff_eq;

    fn sample_bsr(nb: usize) -> BsrMatrix {
        // 2x2 block grid, blocks on (0,0), (0,1), (1,1)
        let nb2 = nb * nb;
        let mut val = Vec::new();
        for t in 0..3 {
            for k in 0..nb2 {
                let (r, c) = (k / nb, k % nb);
                val.push(if r == c { 4.0 + t as Real } else { 0.5 * (t as Real + 1.0) });
            }
        }
        BsrMatrix::from_raw(2, 2, nb, vec![0, 2, 3], vec![0, 1, 1], val)
    }

    #[test]
    fn bsr_matvec_matches_expanded_csr() {
        for &nb in &[2usize, 3, 4, 5, 7] {
            let b = sample_bsr(nb);
            let a = b.to_csr();
            let n = b.nrows();
            let x: Vec<Real> = (0..n).map(|i| (i as Real * 0.7).sin() + 1.5).collect();
            let mut y1 = vec![0.0; n];
            let mut y2 = vec![0.0; n];
            b.matvec(&x, &mut y1);
            a.matvec(&x, &mut y2);
            for (u, v) in y1.iter().zip(&y2) {
                assert_abs_diff_eq!(u, v, epsilon = 1e-13);
            }
            // transpose product agrees as well
            b.matvec_t(&x, &mut y1);
            a.matvec_t(&x, &mut y2);
            for (u, v) in y1.iter().zip(&y2) {
                assert_abs_diff_eq!(u, v, epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn csr_round_trip() {
        let b = sample_bsr(3);
        let back = BsrMatrix::from_csr(&b.to_csr(), 3);
        let n = b.nrows();
        let x: Vec<Real> = (0..n).map(|i| i as Real + 1.0).collect();
        let mut y1 = vec![0.0; n];
        let mut y2 = vec![0.0; n];
        b.matvec(&x, &mut y1);
        back.matvec(&x, &mut y2);
        assert_eq!(y1, y2);
    }

    #[test]
    fn block_rap_matches_scalar_rap() {
        let nb = 2;
        let a = sample_bsr(nb);
        // prolongation: 2 block rows -> 1 block col
        let p = BsrMatrix::from_raw(
            2,
            1,
            nb,
            vec![0, 1, 2],
            vec![0, 0],
            vec![1.0, 0.0, 0.0, 1.0, 0.5, 0.0, 0.0, 0.5],
        );
        let r = p.transpose();
        let coarse = rap(&r, &a, &p);
        let coarse_scalar = csr::rap(&r.to_csr(), &a.to_csr(), &p.to_csr());
        let cs = coarse.to_csr();
        let x = vec![1.0, -2.0];
        let mut y1 = vec![0.0; 2];
        let mut y2 = vec![0.0; 2];
        cs.matvec(&x, &mut y1);
        coarse_scalar.matvec(&x, &mut y2);
        for (u, v) in y1.iter().zip(&y2) {
            assert_abs_diff_eq!(u, v, epsilon = 1e-13);
        }
    }
}
