//! Smoothers on scalar CSR matrices.
//!
//! Each routine performs a bounded number of cheap relaxation sweeps that
//! damp the high-frequency part of the residual. A zero (or sub-epsilon)
//! diagonal is reported through `log::warn!` and replaced by a guarded
//! value; that is a warning, not a fatal error.

use super::{CfFirst, SweepOrder};
use crate::consts::SMALL_REAL;
use crate::core::traits::{Indexing, MatVec};
use crate::matrix::CsrMatrix;
use crate::{blas, Int, Real};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Diagonal of `A`, inverted, with the zero-diagonal substitution applied.
pub fn guarded_inv_diag(a: &CsrMatrix) -> Vec<Real> {
    a.diagonal()
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            if d.abs() < SMALL_REAL {
                log::warn!("zero diagonal at row {i}, substituting {SMALL_REAL:e}");
                1.0 / SMALL_REAL
            } else {
                1.0 / d
            }
        })
        .collect()
}

/// Weighted Jacobi: `u += omega * D^-1 (b - A u)`. Order-independent.
pub fn jacobi(a: &CsrMatrix, b: &[Real], u: &mut [Real], omega: Real, sweeps: usize) {
    let n = u.len();
    let dinv = guarded_inv_diag(a);
    let mut r = vec![0.0; n];
    for _ in 0..sweeps {
        r.copy_from_slice(b);
        a.aaxpy(-1.0, u, &mut r);
        #[cfg(feature = "parallel")]
        {
            u.par_iter_mut()
                .zip(r.par_iter())
                .zip(dinv.par_iter())
                .for_each(|((ui, &ri), &di)| *ui += omega * di * ri);
        }
        #[cfg(not(feature = "parallel"))]
        for i in 0..n {
            u[i] += omega * dinv[i] * r[i];
        }
    }
}

#[inline]
fn relax_point(a: &CsrMatrix, b: &[Real], u: &mut [Real], i: usize, omega: Real) {
    let (cols, vals) = a.row(i);
    let mut sigma = b[i];
    let mut diag = 0.0;
    for (&j, &v) in cols.iter().zip(vals) {
        if j == i {
            diag = v;
        } else {
            sigma -= v * u[j];
        }
    }
    if diag.abs() < SMALL_REAL {
        log::warn!("zero diagonal at row {i}, substituting {SMALL_REAL:e}");
        diag = SMALL_REAL;
    }
    let unew = sigma / diag;
    u[i] = (1.0 - omega) * u[i] + omega * unew;
}

fn sweep(a: &CsrMatrix, b: &[Real], u: &mut [Real], order: SweepOrder<'_>, omega: Real) {
    let n = u.len();
    match order {
        SweepOrder::Ascend => {
            for i in 0..n {
                relax_point(a, b, u, i, omega);
            }
        }
        SweepOrder::Descend => {
            for i in (0..n).rev() {
                relax_point(a, b, u, i, omega);
            }
        }
        SweepOrder::User(mark) => {
            assert_eq!(mark.len(), n, "ordering must cover every row");
            for &i in mark {
                relax_point(a, b, u, i as usize, omega);
            }
        }
        SweepOrder::Cf(cf, first) => {
            assert_eq!(cf.len(), n);
            let (first_val, second_val) = match first {
                CfFirst::CThenF => (1, 0),
                CfFirst::FThenC => (0, 1),
            };
            for i in (0..n).filter(|&i| cf[i] == first_val) {
                relax_point(a, b, u, i, omega);
            }
            for i in (0..n).filter(|&i| cf[i] == second_val) {
                relax_point(a, b, u, i, omega);
            }
        }
    }
}

/// Gauss-Seidel in the requested traversal order.
pub fn gauss_seidel(a: &CsrMatrix, b: &[Real], u: &mut [Real], order: SweepOrder<'_>, sweeps: usize) {
    for _ in 0..sweeps {
        sweep(a, b, u, order, 1.0);
    }
}

/// Composite Gauss-Seidel sweep: forward and/or backward per `flags`.
/// `SweepFlags::SYMMETRIC` gives one forward-then-backward pass per sweep.
pub fn gauss_seidel_flags(
    a: &CsrMatrix,
    b: &[Real],
    u: &mut [Real],
    flags: super::SweepFlags,
    sweeps: usize,
) {
    for _ in 0..sweeps {
        if flags.contains(super::SweepFlags::FORWARD) {
            sweep(a, b, u, SweepOrder::Ascend, 1.0);
        }
        if flags.contains(super::SweepFlags::BACKWARD) {
            sweep(a, b, u, SweepOrder::Descend, 1.0);
        }
    }
}

/// SOR: Gauss-Seidel mixed as `(1-omega) u_old + omega u_new`.
pub fn sor(
    a: &CsrMatrix,
    b: &[Real],
    u: &mut [Real],
    omega: Real,
    order: SweepOrder<'_>,
    sweeps: usize,
) {
    for _ in 0..sweeps {
        sweep(a, b, u, order, omega);
    }
}

/// Gauss-Seidel restricted to rows with `marker[i] == class`, leaving every
/// other unknown untouched. Compatible-relaxation coarsening uses this with
/// the F class and zeroed C values.
pub fn gauss_seidel_cr(
    a: &CsrMatrix,
    b: &[Real],
    u: &mut [Real],
    marker: &[Int],
    class: Int,
    sweeps: usize,
) {
    for _ in 0..sweeps {
        for i in (0..u.len()).filter(|&i| marker[i] == class) {
            relax_point(a, b, u, i, 1.0);
        }
    }
}

/// Infinity norm of `D^-1 A`, the spectral bound behind the polynomial
/// smoother coefficients.
fn dinv_a_norminf(a: &CsrMatrix, dinv: &[Real]) -> Real {
    let mut norm: Real = 0.0;
    for i in 0..a.nrows() {
        let (_, vals) = a.row(i);
        let rowsum: Real = vals.iter().map(|v| v.abs()).sum();
        norm = norm.max(rowsum * dinv[i].abs());
    }
    norm
}

/// Lower bound on the polynomial degree needed to damp the smoothing range
/// `[smin, smax]`, with `smin = smax / kappa_ratio`. The ratio is a
/// heuristic knob, default 8.
pub fn poly_auto_degree(a: &CsrMatrix, requested: usize, kappa_ratio: Real) -> usize {
    let mut smax: Real = 0.0;
    for i in 0..a.nrows() {
        let (_, vals) = a.row(i);
        smax = smax.max(vals.iter().map(|v| v.abs()).sum());
    }
    if smax <= 0.0 {
        return requested.max(1);
    }
    let smin = smax / kappa_ratio;
    let delinv = (smax + smin) / (smax - smin);
    let th = delinv + (delinv * delinv - 1.0).sqrt();
    let th1 = 1.0 / th;
    let sq = (th - th1) * (th - th1);
    let ndeg0 = ((2.0 * (2.0 + th + th1) / sq).ln() / th.ln() + 1.0).floor() as usize;
    ndeg0.max(requested).max(1)
}

/// Polynomial (Chebyshev-like) smoother: applies `q_m(D^-1 A) D^-1` to the
/// residual, with the smoothing interval `[mu0, 4 mu0]` taken from
/// `mu0 = 1 / ||D^-1 A||_inf` and the classical three-term recurrence.
/// Order-independent, so every inner loop is data-parallel.
pub fn poly(a: &CsrMatrix, b: &[Real], u: &mut [Real], degree: usize, sweeps: usize) {
    let n = u.len();
    let dinv = guarded_inv_diag(a);

    let mu0 = 1.0 / dinv_a_norminf(a, &dinv);
    let mu1 = 4.0 * mu0;
    let (smu0, smu1) = (mu0.sqrt(), mu1.sqrt());
    let k1 = (mu0 + mu1) / 2.0;
    let k2 = (smu0 + smu1) * (smu0 + smu1) / 2.0;
    let k3 = mu0 * mu1;
    let k4 = 2.0 * k3 / k2;
    let k5 = (mu1 - 2.0 * smu0 * smu1 + mu0) / (mu1 + 2.0 * smu0 * smu1 + mu0);

    let mut r = vec![0.0; n];
    let mut rbar = vec![0.0; n];
    let mut v0 = vec![0.0; n];
    let mut v1 = vec![0.0; n];
    let mut vnew = vec![0.0; n];

    for _ in 0..sweeps {
        // r = b - A u
        r.copy_from_slice(b);
        a.aaxpy(-1.0, u, &mut r);

        // rbar = D^-1 r, v1 = D^-1 A rbar
        for i in 0..n {
            rbar[i] = dinv[i] * r[i];
        }
        a.matvec(&rbar, &mut v1);
        for i in 0..n {
            v1[i] *= dinv[i];
        }
        for i in 0..n {
            v0[i] = k1 * rbar[i];
            v1[i] = k2 * rbar[i] - k3 * v1[i];
        }

        for _ in 1..degree {
            a.matvec(&v1, &mut rbar);
            #[cfg(feature = "parallel")]
            {
                vnew.par_iter_mut()
                    .zip(rbar.par_iter_mut())
                    .enumerate()
                    .for_each(|(i, (vn, rb))| {
                        *rb = (r[i] - *rb) * dinv[i];
                        *vn = v1[i] + k5 * (v1[i] - v0[i]) + k4 * *rb;
                    });
            }
            #[cfg(not(feature = "parallel"))]
            for i in 0..n {
                rbar[i] = (r[i] - rbar[i]) * dinv[i];
                vnew[i] = v1[i] + k5 * (v1[i] - v0[i]) + k4 * rbar[i];
            }
            std::mem::swap(&mut v0, &mut v1);
            std::mem::swap(&mut v1, &mut vnew);
        }

        blas::axpy(1.0, &v1, u);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CsrMatrix;
    use approx::assert_abs_diff_eq;

    fn laplace_1d(n: usize) -> CsrMatrix {
        let mut triples = Vec::new();
        for i in 0..n {
            triples.push((i, i, 2.0));
            if i > 0 {
                triples.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                triples.push((i, i + 1, -1.0));
            }
        }
        CsrMatrix::from_coo(n, n, &triples)
    }

    fn residual_norm(a: &CsrMatrix, b: &[Real], u: &[Real]) -> Real {
        let mut r = b.to_vec();
        a.aaxpy(-1.0, u, &mut r);
        blas::norm2(&r)
    }

    #[test]
    fn each_smoother_reduces_residual() {
        let n = 32;
        let a = laplace_1d(n);
        let b = vec![1.0; n];
        let r0 = residual_norm(&a, &b, &vec![0.0; n]);

        let mut u = vec![0.0; n];
        jacobi(&a, &b, &mut u, 0.8, 5);
        assert!(residual_norm(&a, &b, &u) < r0);

        let mut u = vec![0.0; n];
        gauss_seidel(&a, &b, &mut u, SweepOrder::Ascend, 5);
        assert!(residual_norm(&a, &b, &u) < r0);

        let mut u = vec![0.0; n];
        gauss_seidel(&a, &b, &mut u, SweepOrder::Descend, 5);
        assert!(residual_norm(&a, &b, &u) < r0);

        let mut u = vec![0.0; n];
        sor(&a, &b, &mut u, 1.3, SweepOrder::Ascend, 5);
        assert!(residual_norm(&a, &b, &u) < r0);

        let mut u = vec![0.0; n];
        poly(&a, &b, &mut u, 3, 3);
        assert!(residual_norm(&a, &b, &u) < r0);
    }

    #[test]
    fn user_order_matches_ascend_for_identity_permutation() {
        let n = 16;
        let a = laplace_1d(n);
        let b: Vec<Real> = (0..n).map(|i| (i as Real).cos()).collect();
        let perm: Vec<Int> = (0..n as Int).collect();
        let mut u1 = vec![0.0; n];
        let mut u2 = vec![0.0; n];
        gauss_seidel(&a, &b, &mut u1, SweepOrder::Ascend, 2);
        gauss_seidel(&a, &b, &mut u2, SweepOrder::User(&perm), 2);
        assert_eq!(u1, u2);
    }

    #[test]
    fn cf_sweep_visits_both_classes() {
        let n = 8;
        let a = laplace_1d(n);
        let b = vec![1.0; n];
        let cf: Vec<Int> = (0..n).map(|i| (i % 2 == 0) as Int).collect();
        let mut u = vec![0.0; n];
        gauss_seidel(&a, &b, &mut u, SweepOrder::Cf(&cf, CfFirst::CThenF), 1);
        assert!(u.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn cr_sweep_leaves_other_class_untouched() {
        let n = 8;
        let a = laplace_1d(n);
        let b = vec![1.0; n];
        let marker: Vec<Int> = (0..n).map(|i| (i < 4) as Int).collect();
        let mut u = vec![0.0; n];
        gauss_seidel_cr(&a, &b, &mut u, &marker, 1, 2);
        assert!(u[..4].iter().all(|&v| v != 0.0));
        assert!(u[4..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zero_diagonal_is_substituted_not_nan() {
        let a = CsrMatrix::from_coo(2, 2, &[(0, 0, 0.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 2.0)]);
        let b = vec![1.0, 1.0];
        let mut u = vec![0.0, 0.0];
        gauss_seidel(&a, &b, &mut u, SweepOrder::Ascend, 1);
        assert!(u.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn auto_degree_at_least_requested() {
        let a = laplace_1d(16);
        assert!(poly_auto_degree(&a, 3, 8.0) >= 3);
        assert!(poly_auto_degree(&a, 1, 8.0) >= 1);
    }

    #[test]
    fn jacobi_exact_on_diagonal_system() {
        let a = CsrMatrix::from_coo(3, 3, &[(0, 0, 2.0), (1, 1, 4.0), (2, 2, 8.0)]);
        let b = vec![2.0, 4.0, 8.0];
        let mut u = vec![0.0; 3];
        jacobi(&a, &b, &mut u, 1.0, 1);
        for &ui in &u {
            assert_abs_diff_eq!(ui, 1.0, epsilon = 1e-14);
        }
    }
}
