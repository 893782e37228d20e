//! Structural invariants of the multigrid hierarchy: C/F disjointness,
//! Galerkin consistency, interpolation row sums and the quality of the
//! coarsest-grid solve.

use amgsolve::amg::coarsening::{coarsen, prolongation_pattern};
use amgsolve::amg::{AmgHierarchy, CPT, FPT, ISPT};
use amgsolve::core::traits::{Indexing, MatVec};
use amgsolve::matrix::{csr, CsrMatrix};
use amgsolve::{AmgParam, Real};
use approx::assert_abs_diff_eq;

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

fn periodic_laplace_1d(n: usize) -> CsrMatrix {
    let mut t = Vec::new();
    for i in 0..n {
        t.push((i, i, 2.0));
        t.push((i, (i + 1) % n, -1.0));
        t.push((i, (i + n - 1) % n, -1.0));
    }
    CsrMatrix::from_coo(n, n, &t)
}

/// Every vertex is exactly one of C, F or isolated.
#[test]
fn cf_marker_is_a_partition() {
    for kind in [
        amgsolve::config::CoarseningKind::Modified,
        amgsolve::config::CoarseningKind::RsNegative,
        amgsolve::config::CoarseningKind::RsAbsolute,
        amgsolve::config::CoarseningKind::CompatibleRelaxation,
    ] {
        let a = laplace_2d(10);
        let param = AmgParam { coarsening: kind, ..Default::default() };
        let res = coarsen(&a, &param).unwrap();
        let mut counts = [0usize; 3];
        for &c in &res.cf {
            match c {
                c if c == FPT => counts[0] += 1,
                c if c == CPT => counts[1] += 1,
                c if c == ISPT => counts[2] += 1,
                other => panic!("{kind:?}: unexpected marker {other}"),
            }
        }
        assert_eq!(counts.iter().sum::<usize>(), a.nrows());
        assert_eq!(counts[1], res.ncoarse, "{kind:?}: C count mismatch");
    }
}

/// Stored coarse operators equal the explicit Galerkin triple product.
#[test]
fn galerkin_consistency_across_levels() {
    let a = laplace_2d(14);
    let param = AmgParam { coarse_dof: 10, ..Default::default() };
    let h = AmgHierarchy::setup(&a, &param).unwrap();
    assert!(h.num_levels() >= 3, "want a deep enough hierarchy");
    for l in 0..h.num_levels() - 1 {
        let lev = &h.levels[l];
        let expect = csr::rap(lev.r.as_ref().unwrap(), &lev.a, lev.p.as_ref().unwrap());
        let got = &h.levels[l + 1].a;
        let n = got.ncols();
        for probe in 0..3 {
            let x: Vec<Real> = (0..n).map(|k| ((k + probe * 13) % 7) as Real - 3.0).collect();
            let mut y1 = vec![0.0; n];
            let mut y2 = vec![0.0; n];
            expect.matvec(&x, &mut y1);
            got.matvec(&x, &mut y2);
            for (u, v) in y1.iter().zip(&y2) {
                assert_abs_diff_eq!(u, v, epsilon = 1e-9);
            }
        }
    }
}

/// Restriction is the transpose of prolongation.
#[test]
fn restriction_is_prolongation_transpose() {
    let a = laplace_2d(12);
    let param = AmgParam { coarse_dof: 12, ..Default::default() };
    let h = AmgHierarchy::setup(&a, &param).unwrap();
    for lev in &h.levels[..h.num_levels() - 1] {
        let p = lev.p.as_ref().unwrap();
        let r = lev.r.as_ref().unwrap();
        let mut pt = p.transpose();
        pt.sort_rows();
        let mut rs = r.clone();
        rs.sort_rows();
        assert_eq!(pt, rs);
    }
}

/// On a zero-row-sum operator the Ruge-Stuben weights of every
/// interpolated row add to one.
#[test]
fn prolongation_rows_sum_to_one_on_zero_row_sums() {
    let a = periodic_laplace_1d(16);
    let res = coarsen(&a, &AmgParam::default()).unwrap();
    let p = amgsolve::amg::interp::interpolate(&a, &res, prolongation_pattern(&res), 0.0);
    for i in 0..a.nrows() {
        let (_, vals) = p.row(i);
        if res.cf[i] == FPT && !vals.is_empty() {
            let sum: Real = vals.iter().sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
        }
    }
}

/// The direct coarsest-grid solver leaves a residual at machine scale.
#[test]
fn coarse_direct_solve_is_idempotent() {
    let a = laplace_2d(5);
    let param = AmgParam { coarse_dof: 500, ..Default::default() };
    let mut h = AmgHierarchy::setup(&a, &param).unwrap();
    assert_eq!(h.num_levels(), 1);
    let n = a.nrows();
    let b: Vec<Real> = (0..n).map(|i| ((i * 5 + 1) % 9) as Real - 4.0).collect();
    let mut x = vec![0.0; n];
    h.solve(&b, &mut x, 1e-13, 3).unwrap();
    let mut r = b.clone();
    a.aaxpy(-1.0, &x, &mut r);
    let bn: Real = b.iter().map(|v| v * v).sum::<Real>().sqrt();
    let rn: Real = r.iter().map(|v| v * v).sum::<Real>().sqrt();
    assert!(rn <= 1e-12 * bn.max(1.0), "direct solve residual {rn:e}");
}

/// Hierarchies never exceed the configured level budget and always
/// shrink strictly from level to level.
#[test]
fn level_counts_and_sizes_are_sane() {
    let a = laplace_2d(16);
    for max_levels in [2usize, 4, 10] {
        let param = AmgParam { max_levels, coarse_dof: 4, ..Default::default() };
        let h = AmgHierarchy::setup(&a, &param).unwrap();
        assert!(h.num_levels() <= max_levels);
        for w in h.levels.windows(2) {
            assert!(w[1].a.nrows() < w[0].a.nrows());
        }
    }
}
