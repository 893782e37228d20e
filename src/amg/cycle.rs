//! Multilevel cycles: V, W, F and nonlinear AMLI, plus the coarsest-grid
//! solve.

use super::data::{AmgLevel, CoarseSolverData};
use crate::config::{AmgCycleKind, AmgParam, SmootherKind};
use crate::consts::SMALL_REAL;
use crate::core::traits::MatVec;
use crate::matrix::smat;
use crate::smoother::csr as sm;
use crate::smoother::{CfFirst, SweepFlags, SweepOrder};
use crate::{blas, Real, SolverError};

/// One cycle rooted at level `l`, improving `levels[l].x` toward the
/// solution of `A_l x = b_l`.
pub(crate) fn mg_cycle(
    levels: &mut [AmgLevel],
    coarse: &mut CoarseSolverData,
    param: &AmgParam,
    l: usize,
    kind: AmgCycleKind,
) -> Result<(), SolverError> {
    let nl = levels.len();
    if l + 1 == nl {
        return coarse_solve(&mut levels[l], coarse);
    }

    smooth(&mut levels[l], param, true)?;

    // restrict the residual: b_{l+1} = R (b_l - A_l x_l), x_{l+1} = 0
    {
        let (head, tail) = levels.split_at_mut(l + 1);
        let lev = &mut head[l];
        let next = &mut tail[0];
        lev.w.copy_from_slice(&lev.b);
        lev.a.aaxpy(-1.0, &lev.x, &mut lev.w);
        let r = lev.r.as_ref().expect("restriction on a non-coarsest level");
        r.matvec(&lev.w, &mut next.b);
        next.x.fill(0.0);
    }

    match kind {
        AmgCycleKind::V => mg_cycle(levels, coarse, param, l + 1, kind)?,
        AmgCycleKind::W => {
            mg_cycle(levels, coarse, param, l + 1, kind)?;
            mg_cycle(levels, coarse, param, l + 1, kind)?;
        }
        AmgCycleKind::F => {
            // recurse once deeper as F, then clean up with a V pass
            mg_cycle(levels, coarse, param, l + 1, AmgCycleKind::F)?;
            mg_cycle(levels, coarse, param, l + 1, AmgCycleKind::V)?;
        }
        AmgCycleKind::Amli => {
            if l + 2 == nl {
                mg_cycle(levels, coarse, param, l + 1, AmgCycleKind::V)?;
            } else {
                amli_inner(levels, coarse, param, l + 1)?;
            }
        }
    }

    // prolong and correct, optionally damping the coarse correction
    {
        let (head, tail) = levels.split_at_mut(l + 1);
        let lev = &mut head[l];
        let next = &tail[0];
        let p = lev.p.as_ref().expect("prolongation on a non-coarsest level");
        let e = &next.x;
        let alpha = if param.coarse_scaling {
            let denom = next.a.vmv(e, e);
            if denom.abs() > SMALL_REAL {
                blas::dot(e, &next.b) / denom
            } else {
                1.0
            }
        } else {
            1.0
        };
        p.aaxpy(alpha, e, &mut lev.x);
    }

    smooth(&mut levels[l], param, false)
}

/// Nonlinear AMLI at level `l1`: one recursive cycle as the initial
/// correction, then `amli_degree` iterations of flexible GCG on
/// `A_{l1} x = b_{l1}`, each preconditioned by a fresh cycle rooted one
/// level deeper. The preconditioner changes per iteration, hence the
/// flexible method.
fn amli_inner(
    levels: &mut [AmgLevel],
    coarse: &mut CoarseSolverData,
    param: &AmgParam,
    l1: usize,
) -> Result<(), SolverError> {
    let b = levels[l1].b.clone();
    let n = b.len();

    levels[l1].x.fill(0.0);
    mg_cycle(levels, coarse, param, l1, AmgCycleKind::Amli)?;
    let mut x = levels[l1].x.clone();

    let mut dirs: Vec<Vec<Real>> = Vec::new();
    let mut adirs: Vec<Vec<Real>> = Vec::new();
    let mut pap: Vec<Real> = Vec::new();
    let mut r = vec![0.0; n];
    let mut az = vec![0.0; n];

    for _ in 0..param.amli_degree {
        r.copy_from_slice(&b);
        levels[l1].a.aaxpy(-1.0, &x, &mut r);
        if blas::norm2(&r) < SMALL_REAL {
            break;
        }

        // z = one deeper cycle applied to the residual
        levels[l1].b.copy_from_slice(&r);
        levels[l1].x.fill(0.0);
        mg_cycle(levels, coarse, param, l1, AmgCycleKind::Amli)?;
        let z = levels[l1].x.clone();

        levels[l1].a.matvec(&z, &mut az);
        let mut p = z;
        let mut ap = az.clone();
        for i in 0..dirs.len() {
            let beta = blas::dot(&az, &dirs[i]) / pap[i];
            blas::axpy(-beta, &dirs[i], &mut p);
            blas::axpy(-beta, &adirs[i], &mut ap);
        }
        let papk = blas::dot(&p, &ap);
        if papk.abs() < SMALL_REAL {
            break;
        }
        let alpha = blas::dot(&r, &p) / papk;
        blas::axpy(alpha, &p, &mut x);
        dirs.push(p);
        adirs.push(ap);
        pap.push(papk);
    }

    levels[l1].b.copy_from_slice(&b);
    levels[l1].x.copy_from_slice(&x);
    Ok(())
}

/// Apply the level's configured smoother. Gauss-Seidel-like smoothers run
/// forward before the coarse correction and backward after it.
fn smooth(lev: &mut AmgLevel, param: &AmgParam, pre: bool) -> Result<(), SolverError> {
    let sweeps = if pre { param.presmooth_iter } else { param.postsmooth_iter };
    if sweeps == 0 {
        return Ok(());
    }
    match param.smoother {
        SmootherKind::Jacobi => {
            sm::jacobi(&lev.a, &lev.b, &mut lev.x, param.relaxation, sweeps)
        }
        SmootherKind::GaussSeidel => {
            let order = if pre { SweepOrder::Ascend } else { SweepOrder::Descend };
            sm::gauss_seidel(&lev.a, &lev.b, &mut lev.x, order, sweeps);
        }
        SmootherKind::SymmetricGaussSeidel => {
            sm::gauss_seidel_flags(&lev.a, &lev.b, &mut lev.x, SweepFlags::SYMMETRIC, sweeps)
        }
        SmootherKind::Sor => {
            let order = if pre { SweepOrder::Ascend } else { SweepOrder::Descend };
            sm::sor(&lev.a, &lev.b, &mut lev.x, param.relaxation, order, sweeps);
        }
        SmootherKind::CfGaussSeidel => {
            use crate::core::traits::Indexing;
            if lev.cf.len() == lev.a.nrows() {
                let first = if pre { CfFirst::CThenF } else { CfFirst::FThenC };
                sm::gauss_seidel(
                    &lev.a,
                    &lev.b,
                    &mut lev.x,
                    SweepOrder::Cf(&lev.cf, first),
                    sweeps,
                );
            } else {
                sm::gauss_seidel(&lev.a, &lev.b, &mut lev.x, SweepOrder::Ascend, sweeps);
            }
        }
        SmootherKind::Poly => {
            let degree = sm::poly_auto_degree(&lev.a, param.poly_degree, param.poly_kappa_ratio);
            sm::poly(&lev.a, &lev.b, &mut lev.x, degree, sweeps)
        }
        SmootherKind::Ilu => {
            if let Some(ilu) = &lev.ilu {
                for _ in 0..sweeps {
                    lev.w.copy_from_slice(&lev.b);
                    lev.a.aaxpy(-1.0, &lev.x, &mut lev.w);
                    let mut z = vec![0.0; lev.w.len()];
                    ilu.solve(&lev.w, &mut z);
                    blas::axpy(1.0, &z, &mut lev.x);
                }
            } else {
                sm::gauss_seidel(&lev.a, &lev.b, &mut lev.x, SweepOrder::Ascend, sweeps);
            }
        }
        SmootherKind::Schwarz => {
            if let Some(schwarz) = lev.schwarz.as_mut() {
                use crate::preconditioner::Preconditioner;
                for _ in 0..sweeps {
                    lev.w.copy_from_slice(&lev.b);
                    lev.a.aaxpy(-1.0, &lev.x, &mut lev.w);
                    let mut z = vec![0.0; lev.w.len()];
                    schwarz.apply(&lev.w, &mut z)?;
                    blas::axpy(1.0, &z, &mut lev.x);
                }
            } else {
                sm::gauss_seidel(&lev.a, &lev.b, &mut lev.x, SweepOrder::Ascend, sweeps);
            }
        }
    }
    Ok(())
}

/// Solve the coarsest system. The direct path must leave a residual at
/// machine-precision scale relative to `b`.
fn coarse_solve(lev: &mut AmgLevel, coarse: &mut CoarseSolverData) -> Result<(), SolverError> {
    match coarse {
        CoarseSolverData::Lu { n, lu, pivot } => {
            smat::lu_solve(lu, &lev.b, pivot, &mut lev.x, *n);
            Ok(())
        }
        CoarseSolverData::Iterative { pc } => {
            let solver = crate::solver::pcg::PcgSolver::new(1e-12, 4 * lev.b.len().max(16));
            lev.x.fill(0.0);
            match solver.solve(&lev.a, &lev.b, &mut lev.x, Some(pc)) {
                Ok(_) => {}
                Err(e) => log::warn!("coarsest-grid iteration fell short: {e}"),
            }
            Ok(())
        }
    }
}
