//! Preconditioned conjugate gradient with the shared safety spine:
//! stagnation restarts, false-convergence re-checks, solution-stagnation
//! and divide-by-small guards.

use crate::config::{ItsParam, PrintLevel};
use crate::consts::{MAX_RESTART, MAX_STAG, SMALL_REAL, STAG_RATIO};
use crate::core::traits::MatVec;
use crate::preconditioner::Preconditioner;
use crate::utils::convergence::{guard, print_final, print_itinfo, SolveStats, StopType};
use crate::{blas, Real, SolverError};

pub struct PcgSolver {
    pub tol: Real,
    pub maxit: usize,
    pub stop: StopType,
    pub print: PrintLevel,
}

impl PcgSolver {
    pub fn new(tol: Real, maxit: usize) -> Self {
        Self { tol, maxit, stop: StopType::RelRes, print: PrintLevel::None }
    }

    pub fn from_param(param: &ItsParam) -> Self {
        Self { tol: param.tol, maxit: param.maxit, stop: param.stop, print: param.print }
    }

    pub fn with_stop(mut self, stop: StopType) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_print(mut self, print: PrintLevel) -> Self {
        self.print = print;
        self
    }

    /// Solve `A x = b`, overwriting `x`. Returns the iteration stats or
    /// the failure taxonomy code.
    pub fn solve<A: MatVec>(
        &self,
        a: &A,
        b: &[Real],
        x: &mut [Real],
        mut pc: Option<&mut dyn Preconditioner>,
    ) -> Result<SolveStats, SolverError> {
        let m = b.len();
        assert_eq!(x.len(), m, "rhs/solution length mismatch");
        let maxdiff = self.tol * STAG_RATIO;

        let mut stag = 1usize;
        let mut more_step = 1usize;

        let mut r = b.to_vec();
        a.aaxpy(-1.0, x, &mut r);
        let mut z = vec![0.0; m];
        let mut p = vec![0.0; m];
        let mut ap = vec![0.0; m];

        use super::apply_pc;

        // initial residual per stopping criterion
        let (mut absres0, normr0, mut normu);
        match self.stop {
            StopType::RelRes => {
                absres0 = blas::norm2(&r);
                normr0 = guard(absres0);
                normu = guard(blas::norm2(x));
            }
            StopType::RelPrecRes => {
                apply_pc(&mut pc, &r, &mut z)?;
                absres0 = blas::dot(&r, &z).abs().sqrt();
                normr0 = guard(absres0);
                normu = guard(blas::norm2(x));
            }
            StopType::ModRelRes => {
                absres0 = blas::norm2(&r);
                normr0 = guard(absres0);
                normu = guard(blas::norm2(x));
            }
        }
        let mut relres = match self.stop {
            StopType::ModRelRes => absres0 / normu,
            _ => absres0 / normr0,
        };

        if relres < self.tol || absres0 < SMALL_REAL {
            print_final(self.print, "PCG", 0, relres, "initial residual below tolerance");
            return Ok(SolveStats::new(0, absres0, relres, true));
        }

        if !matches!(self.stop, StopType::RelPrecRes) {
            apply_pc(&mut pc, &r, &mut z)?;
        }
        p.copy_from_slice(&z);
        let mut temp1 = blas::dot(&z, &r);
        let mut absres = absres0;

        let mut iter = 0usize;
        while iter < self.maxit {
            iter += 1;

            a.matvec(&p, &mut ap);
            let temp2 = blas::dot(&ap, &p);
            if temp2.abs() < SMALL_REAL {
                print_final(self.print, "PCG", iter, relres, "breakdown");
                return Err(SolverError::Breakdown("<A p, p> near zero in CG"));
            }
            let alpha = temp1 / temp2;

            blas::axpy(alpha, &p, x);
            blas::axpy(-alpha, &ap, &mut r);

            // residual per stopping criterion
            match self.stop {
                StopType::RelRes => {
                    absres = blas::norm2(&r);
                    relres = absres / normr0;
                }
                StopType::RelPrecRes => {
                    apply_pc(&mut pc, &r, &mut z)?;
                    absres = blas::dot(&r, &z).abs().sqrt();
                    relres = absres / normr0;
                }
                StopType::ModRelRes => {
                    absres = blas::norm2(&r);
                    normu = guard(blas::norm2(x));
                    relres = absres / normu;
                }
            }
            print_itinfo(self.print, self.stop, iter, relres, absres, absres / guard(absres0));
            absres0 = absres;

            // Check I: the iterate itself vanished
            let infnormx = blas::norminf(x);
            if infnormx <= SMALL_REAL {
                print_final(self.print, "PCG", iter, relres, "solution close to zero");
                return Err(SolverError::SolutionStagnation { iterations: iter });
            }

            // Check II: stagnation; recompute the true residual, restart
            let reldiff = alpha.abs() * blas::norm2(&p) / guard(blas::norm2(x));
            if stag <= MAX_STAG && reldiff < maxdiff {
                if self.print >= PrintLevel::More {
                    log::debug!("PCG stagnates: ||dx||/||x|| = {reldiff:.3e}, restarting");
                }
                r.copy_from_slice(b);
                a.aaxpy(-1.0, x, &mut r);
                match self.stop {
                    StopType::RelPrecRes => {
                        apply_pc(&mut pc, &r, &mut z)?;
                        absres = blas::dot(&r, &z).abs().sqrt();
                        relres = absres / normr0;
                    }
                    StopType::ModRelRes => {
                        absres = blas::norm2(&r);
                        relres = absres / guard(blas::norm2(x));
                    }
                    StopType::RelRes => {
                        absres = blas::norm2(&r);
                        relres = absres / normr0;
                    }
                }
                if relres < self.tol {
                    break;
                }
                if stag >= MAX_STAG {
                    print_final(self.print, "PCG", iter, relres, "stagnation");
                    return Err(SolverError::Stagnation { iterations: iter, restarts: stag, relres });
                }
                stag += 1;
                // restart the search direction from the fresh residual
                if !matches!(self.stop, StopType::RelPrecRes) {
                    apply_pc(&mut pc, &r, &mut z)?;
                }
                p.copy_from_slice(&z);
                temp1 = blas::dot(&z, &r);
                continue;
            }

            // Check III: the running residual converged; trust only the
            // explicitly recomputed one
            if relres < self.tol {
                r.copy_from_slice(b);
                a.aaxpy(-1.0, x, &mut r);
                match self.stop {
                    StopType::RelPrecRes => {
                        apply_pc(&mut pc, &r, &mut z)?;
                        absres = blas::dot(&r, &z).abs().sqrt();
                        relres = absres / normr0;
                    }
                    StopType::ModRelRes => {
                        absres = blas::norm2(&r);
                        relres = absres / guard(blas::norm2(x));
                    }
                    StopType::RelRes => {
                        absres = blas::norm2(&r);
                        relres = absres / normr0;
                    }
                }
                if relres < self.tol {
                    break;
                }
                if self.print >= PrintLevel::More {
                    log::debug!("PCG false convergence at iter {iter}, true relres {relres:.3e}");
                }
                if more_step >= MAX_RESTART {
                    print_final(self.print, "PCG", iter, relres, "tolerance unreachable");
                    return Err(SolverError::ToleranceTooSmall {
                        iterations: iter,
                        restarts: more_step,
                        tol: self.tol,
                    });
                }
                more_step += 1;
                if !matches!(self.stop, StopType::RelPrecRes) {
                    apply_pc(&mut pc, &r, &mut z)?;
                }
                p.copy_from_slice(&z);
                temp1 = blas::dot(&z, &r);
                continue;
            }

            // next direction
            if !matches!(self.stop, StopType::RelPrecRes) {
                apply_pc(&mut pc, &r, &mut z)?;
            }
            let temp2 = blas::dot(&z, &r);
            let beta = temp2 / temp1;
            temp1 = temp2;
            blas::axpby(1.0, &z, beta, &mut p);
        }

        if relres < self.tol {
            print_final(self.print, "PCG", iter, relres, "converged");
            Ok(SolveStats::new(iter, absres, relres, true))
        } else {
            print_final(self.print, "PCG", iter, relres, "max iterations");
            Err(SolverError::MaxIterations { maxit: self.maxit, relres })
        }
    }
}
