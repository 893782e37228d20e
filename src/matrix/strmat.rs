//! Structured-grid banded matrix.
//!
//! Models an operator on an `nx * ny * nz` grid with `nc` coupled unknowns
//! per node and a fixed set of off-diagonal band offsets. A band entry
//! whose target node falls outside `[0, ngrid)` is skipped (out-of-range
//! clamp), which is how boundary nodes lose neighbors.
//!
//! Storage: `diag` holds `ngrid` tiles of `nc x nc`; band `k` with offset
//! `w` holds `ngrid - |w|` tiles, indexed by `min(row, col)` node.

use crate::core::traits::{Indexing, MatTransVec, MatVec};
use crate::matrix::smat;
use crate::{Int, Real};

#[derive(Clone, Debug)]
pub struct StrMatrix {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Number of grid nodes, `nx * ny * nz`.
    pub ngrid: usize,
    /// Components per node.
    pub nc: usize,
    /// Band offsets in node units, nonzero, typically symmetric around 0.
    pub offsets: Vec<Int>,
    /// Diagonal tiles, `ngrid * nc * nc`.
    pub diag: Vec<Real>,
    /// One tile array per band, `(ngrid - |offset|) * nc * nc` each.
    pub offdiag: Vec<Vec<Real>>,
}

impl StrMatrix {
    pub fn new(
        nx: usize,
        ny: usize,
        nz: usize,
        nc: usize,
        offsets: Vec<Int>,
        diag: Vec<Real>,
        offdiag: Vec<Vec<Real>>,
    ) -> Self {
        let ngrid = nx * ny * nz;
        let nc2 = nc * nc;
        assert_eq!(diag.len(), ngrid * nc2, "diagonal storage size");
        assert_eq!(offdiag.len(), offsets.len(), "one array per band");
        for (k, band) in offdiag.iter().enumerate() {
            let w = offsets[k].unsigned_abs() as usize;
            assert!(w < ngrid, "offset out of range");
            assert_eq!(band.len(), (ngrid - w) * nc2, "band {k} storage size");
        }
        Self { nx, ny, nz, ngrid, nc, offsets, diag, offdiag }
    }

    pub fn nband(&self) -> usize {
        self.offsets.len()
    }

    /// Diagonal tile of node `i`.
    pub fn diag_block(&self, i: usize) -> &[Real] {
        let nc2 = self.nc * self.nc;
        &self.diag[i * nc2..(i + 1) * nc2]
    }

    /// Tile of band `k` at storage slot `m` (node `min(row, col)`).
    pub fn band_block(&self, k: usize, m: usize) -> &[Real] {
        let nc2 = self.nc * self.nc;
        &self.offdiag[k][m * nc2..(m + 1) * nc2]
    }
}

impl Indexing for StrMatrix {
    fn nrows(&self) -> usize {
        self.ngrid * self.nc
    }
    fn ncols(&self) -> usize {
        self.ngrid * self.nc
    }
}

impl MatVec for StrMatrix {
    fn matvec(&self, x: &[Real], y: &mut [Real]) {
        y.fill(0.0);
        self.aaxpy(1.0, x, y);
    }

    fn aaxpy(&self, alpha: Real, x: &[Real], y: &mut [Real]) {
        assert_eq!(x.len(), self.nrows());
        assert_eq!(y.len(), self.nrows());
        let nc = self.nc;
        let ngrid = self.ngrid;
        if nc == 1 {
            for point in 0..ngrid {
                let mut s = self.diag[point] * x[point];
                for (band, &w) in self.offsets.iter().enumerate() {
                    let column = point as i64 + w as i64;
                    if column < 0 || column >= ngrid as i64 {
                        continue;
                    }
                    let column = column as usize;
                    let slot = if w < 0 { column } else { point };
                    s += self.offdiag[band][slot] * x[column];
                }
                y[point] += alpha * s;
            }
        } else {
            let mut tmp = vec![0.0; nc];
            for point in 0..ngrid {
                tmp.fill(0.0);
                smat::ypax(self.diag_block(point), &x[point * nc..(point + 1) * nc], &mut tmp, nc);
                for (band, &w) in self.offsets.iter().enumerate() {
                    let column = point as i64 + w as i64;
                    if column < 0 || column >= ngrid as i64 {
                        continue;
                    }
                    let column = column as usize;
                    let slot = if w < 0 { column } else { point };
                    smat::ypax(
                        self.band_block(band, slot),
                        &x[column * nc..(column + 1) * nc],
                        &mut tmp,
                        nc,
                    );
                }
                for c in 0..nc {
                    y[point * nc + c] += alpha * tmp[c];
                }
            }
        }
    }
}

impl MatTransVec for StrMatrix {
    fn matvec_t(&self, x: &[Real], y: &mut [Real]) {
        assert_eq!(x.len(), self.nrows());
        assert_eq!(y.len(), self.nrows());
        let nc = self.nc;
        let ngrid = self.ngrid;
        y.fill(0.0);
        if nc == 1 {
            for point in 0..ngrid {
                y[point] += self.diag[point] * x[point];
                for (band, &w) in self.offsets.iter().enumerate() {
                    let column = point as i64 + w as i64;
                    if column < 0 || column >= ngrid as i64 {
                        continue;
                    }
                    let column = column as usize;
                    let slot = if w < 0 { column } else { point };
                    y[column] += self.offdiag[band][slot] * x[point];
                }
            }
        } else {
            // scatter each tile transposed
            for point in 0..ngrid {
                let xs = &x[point * nc..(point + 1) * nc];
                let d = self.diag_block(point);
                for c in 0..nc {
                    let mut s = 0.0;
                    for r in 0..nc {
                        s += d[r * nc + c] * xs[r];
                    }
                    y[point * nc + c] += s;
                }
                for (band, &w) in self.offsets.iter().enumerate() {
                    let column = point as i64 + w as i64;
                    if column < 0 || column >= ngrid as i64 {
                        continue;
                    }
                    let column = column as usize;
                    let slot = if w < 0 { column } else { point };
                    let tile = self.band_block(band, slot);
                    for c in 0..nc {
                        let mut s = 0.0;
                        for r in 0..nc {
                            s += tile[r * nc + c] * xs[r];
                        }
                        y[column * nc + c] += s;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// 1-D Laplacian as a structured matrix: offsets {-1, +1}.
    pub(crate) fn laplace_1d(n: usize) -> StrMatrix {
        StrMatrix::new(
            n,
            1,
            1,
            1,
            vec![-1, 1],
            vec![2.0; n],
            vec![vec![-1.0; n - 1], vec![-1.0; n - 1]],
        )
    }

    #[test]
    fn str_matvec_tridiagonal() {
        let a = laplace_1d(5);
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let mut y = vec![0.0; 5];
        a.matvec(&x, &mut y);
        // interior rows: -x[i-1] + 2x[i] - x[i+1] = 0; boundary clamp applies
        assert_eq!(y, vec![0.0, 0.0, 0.0, 0.0, 6.0]);
    }

    #[test]
    fn block_str_matches_scalar_expansion() {
        // nc = 2, identical 2x2 tiles on diag and bands
        let n = 4;
        let nc = 2;
        let d = [4.0, 1.0, 1.0, 4.0];
        let o = [-1.0, 0.0, 0.0, -1.0];
        let a = StrMatrix::new(
            n,
            1,
            1,
            nc,
            vec![-1, 1],
            d.iter().copied().cycle().take(n * 4).collect(),
            vec![
                o.iter().copied().cycle().take((n - 1) * 4).collect(),
                o.iter().copied().cycle().take((n - 1) * 4).collect(),
            ],
        );
        let x: Vec<Real> = (0..n * nc).map(|i| i as Real + 1.0).collect();
        let mut y = vec![0.0; n * nc];
        a.matvec(&x, &mut y);
        // node 1 row 0: -x0 + 4 x2 + x3 - x4 = -1 + 12 + 4 - 5
        assert_abs_diff_eq!(y[2], 10.0);
    }

    #[test]
    fn transpose_product_matches_symmetric_matvec() {
        // symmetric operator: A' x must equal A x
        let a = laplace_1d(6);
        let x = vec![1.0, -1.0, 2.0, 0.5, 3.0, -2.0];
        let mut y1 = vec![0.0; 6];
        let mut y2 = vec![0.0; 6];
        a.matvec(&x, &mut y1);
        a.matvec_t(&x, &mut y2);
        assert_eq!(y1, y2);
    }

    #[test]
    fn block_transpose_product_swaps_tiles() {
        let n = 3;
        let nc = 2;
        // nonsymmetric tiles so the transpose is observable
        let d = [4.0, 1.0, 0.0, 4.0];
        let o = [-1.0, 0.5, 0.0, -1.0];
        let a = StrMatrix::new(
            n,
            1,
            1,
            nc,
            vec![1],
            d.iter().copied().cycle().take(n * 4).collect(),
            vec![o.iter().copied().cycle().take((n - 1) * 4).collect()],
        );
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut yt = vec![0.0; 6];
        a.matvec_t(&x, &mut yt);
        // column block 0 receives only the transposed diagonal tile
        assert_abs_diff_eq!(yt[0], 4.0 * 1.0);
        assert_abs_diff_eq!(yt[1], 1.0 * 1.0 + 4.0 * 2.0);
        // column block 1: diag' x1 + band(0->1)' x0
        assert_abs_diff_eq!(yt[2], 4.0 * 3.0 - 1.0);
        assert_abs_diff_eq!(yt[3], (3.0 + 4.0 * 4.0) + (0.5 - 2.0));
    }
}
