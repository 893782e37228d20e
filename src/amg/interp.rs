//! Classical Ruge-Stuben interpolation weights.
//!
//! For an F row `i` the weight to a strong C-neighbor `j` is
//!
//! ```text
//! w_ij = - ( a_ij + sum_{k in Fs_i} a_ik * abar_kj / (sum_{m in Cs_i} abar_km) )
//!          / ( a_ii + sum_{n weak} a_in )
//! ```
//!
//! where `abar_kj` keeps only entries whose sign opposes `a_kk`
//! (sign-preserving scaling), strong F-F connections are distributed over
//! the common C support, and weak connections are folded into the
//! diagonal. A strong F-neighbor with no common C support is lumped into
//! the diagonal as well. For rows with zero row sum the weights add up to
//! exactly one.

use super::coarsening::{CoarseningResult, CPT, FPT};
use crate::consts::SMALL_REAL;
use crate::core::traits::Indexing;
use crate::matrix::CsrMatrix;
use crate::Real;

/// Fill the prolongation values for the pattern produced by
/// [`super::coarsening::prolongation_pattern`]. `truncation` drops weights
/// below that fraction of the row maximum and rescales so the row sum is
/// preserved.
pub fn interpolate(
    a: &CsrMatrix,
    res: &CoarseningResult,
    mut p: CsrMatrix,
    truncation: Real,
) -> CsrMatrix {
    let n = a.nrows();
    let s = &res.strength;
    let cf = &res.cf;

    // sign reference per row: the diagonal
    let diag = a.diagonal();

    // marker: coarse column -> position in the current P row
    let mut pos = vec![usize::MAX; p.ncols()];

    for i in 0..n {
        if cf[i] != FPT {
            continue;
        }
        let row_lo = p.ia[i];
        let row_hi = p.ia[i + 1];
        if row_lo == row_hi {
            continue;
        }
        for q in row_lo..row_hi {
            pos[p.ja[q]] = q;
            p.val[q] = 0.0;
        }

        let strong: &[usize] = s.row(i);
        let is_strong = |j: usize| strong.contains(&j);

        let (cols, vals) = a.row(i);
        let mut denom = 0.0; // a_ii + weak connections
        for (&j, &v) in cols.iter().zip(vals) {
            if j == i {
                denom += v;
            } else if is_strong(j) && cf[j] == CPT {
                p.val[pos[res.coarse_index[j] as usize]] += v;
            } else if is_strong(j) && cf[j] == FPT {
                // distribute a_ij over the common C support of row j
                let (jcols, jvals) = a.row(j);
                let mut dsum = 0.0;
                for (&m, &w) in jcols.iter().zip(jvals) {
                    if m != j
                        && cf[m] == CPT
                        && w * diag[j] < 0.0
                        && pos[res.coarse_index[m] as usize] != usize::MAX
                    {
                        dsum += w;
                    }
                }
                if dsum.abs() > SMALL_REAL {
                    let scale = v / dsum;
                    for (&m, &w) in jcols.iter().zip(jvals) {
                        if m != j && cf[m] == CPT && w * diag[j] < 0.0 {
                            let q = pos[res.coarse_index[m] as usize];
                            if q != usize::MAX {
                                p.val[q] += scale * w;
                            }
                        }
                    }
                } else {
                    // no usable support: lump into the diagonal
                    denom += v;
                }
            } else {
                // weak connection
                denom += v;
            }
        }

        if denom.abs() < SMALL_REAL {
            log::warn!("interpolation denominator at row {i} is {denom:e}");
            denom = if denom >= 0.0 { SMALL_REAL } else { -SMALL_REAL };
        }
        for q in row_lo..row_hi {
            p.val[q] = -p.val[q] / denom;
        }

        for q in row_lo..row_hi {
            pos[p.ja[q]] = usize::MAX;
        }
    }

    if truncation > 0.0 {
        truncate(&mut p, cf, truncation);
    }
    p
}

/// Drop F-row weights below `trunc * max|w|`, rescaling the survivors so
/// the row sum is unchanged. Entries are kept in place with zero weight to
/// avoid re-building the pattern; the Galerkin product drops exact zeros.
fn truncate(p: &mut CsrMatrix, cf: &[crate::Int], trunc: Real) {
    for i in 0..cf.len() {
        if cf[i] != FPT {
            continue;
        }
        let lo = p.ia[i];
        let hi = p.ia[i + 1];
        if lo == hi {
            continue;
        }
        let row = &p.val[lo..hi];
        let wmax = row.iter().fold(0.0 as Real, |m, v| m.max(v.abs()));
        let full: Real = row.iter().sum();
        let cut = trunc * wmax;
        let kept: Real = row.iter().filter(|v| v.abs() >= cut).sum();
        if kept.abs() < SMALL_REAL {
            continue;
        }
        let scale = full / kept;
        for v in &mut p.val[lo..hi] {
            *v = if v.abs() >= cut { *v * scale } else { 0.0 };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amg::coarsening::{coarsen, prolongation_pattern};
    use crate::config::AmgParam;
    use approx::assert_abs_diff_eq;

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

    /// Periodic 1-D Laplacian: every row sums to zero, so interpolation
    /// weights of every F row must sum to exactly one.
    #[test]
    fn zero_row_sum_rows_interpolate_to_one() {
        let n = 12;
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 2.0));
            t.push((i, (i + 1) % n, -1.0));
            t.push((i, (i + n - 1) % n, -1.0));
        }
        let a = CsrMatrix::from_coo(n, n, &t);
        let res = coarsen(&a, &AmgParam::default()).unwrap();
        let p = interpolate(&a, &res, prolongation_pattern(&res), 0.0);
        for i in 0..n {
            if res.cf[i] == super::FPT {
                let (_, vals) = p.row(i);
                if !vals.is_empty() {
                    let sum: Real = vals.iter().sum();
                    assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
                }
            }
        }
    }

    /// On the 1-D Dirichlet Laplacian an interior F point between two C
    /// points gets the half-half average.
    #[test]
    fn interior_f_point_gets_half_weights() {
        let n = 9;
        let a = laplace_1d(n);
        let res = coarsen(&a, &AmgParam::default()).unwrap();
        let p = interpolate(&a, &res, prolongation_pattern(&res), 0.0);
        for i in 1..n - 1 {
            if res.cf[i] == super::FPT {
                let (_, vals) = p.row(i);
                if vals.len() == 2 {
                    assert_abs_diff_eq!(vals[0], 0.5, epsilon = 1e-12);
                    assert_abs_diff_eq!(vals[1], 0.5, epsilon = 1e-12);
                }
            }
        }
    }

    fn laplace_2d(nx: usize) -> CsrMatrix {
        let n = nx * nx;
        let mut t = Vec::new();
        for i in 0..nx {
            for j in 0..nx {
                let p = i * nx + j;
                t.push((p, p, 4.0));
                if j > 0 {
                    t.push((p, p - 1, -1.0));
                }
                if j + 1 < nx {
                    t.push((p, p + 1, -1.0));
                }
                if i > 0 {
                    t.push((p, p - nx, -1.0));
                }
                if i + 1 < nx {
                    t.push((p, p + nx, -1.0));
                }
            }
        }
        CsrMatrix::from_coo(n, n, &t)
    }

    #[test]
    fn truncation_preserves_row_sums() {
        let a = laplace_2d(8);
        let res = coarsen(&a, &AmgParam::default()).unwrap();
        let p_full = interpolate(&a, &res, prolongation_pattern(&res), 0.0);
        let p_trunc = interpolate(&a, &res, prolongation_pattern(&res), 0.2);
        for i in 0..a.nrows() {
            let s_full: Real = p_full.row(i).1.iter().sum();
            let s_trunc: Real = p_trunc.row(i).1.iter().sum();
            assert_abs_diff_eq!(s_full, s_trunc, epsilon = 1e-12);
        }
    }
}
