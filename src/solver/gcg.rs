//! Generalized conjugate gradient (Concus-Golub-O'Leary): every new
//! search direction is A-orthogonalized against all previous ones, so
//! memory grows linearly with the iteration count. Tolerates a
//! nonsymmetric preconditioner; the nonlinear AMLI cycle is the main
//! consumer.

use crate::config::{ItsParam, PrintLevel};
use crate::consts::SMALL_REAL;
use crate::core::traits::MatVec;
use crate::preconditioner::Preconditioner;
use crate::utils::convergence::{guard, print_final, print_itinfo, SolveStats, StopType};
use crate::{blas, Real, SolverError};

pub struct GcgSolver {
    pub tol: Real,
    pub maxit: usize,
    pub print: PrintLevel,
}

impl GcgSolver {
    pub fn new(tol: Real, maxit: usize) -> Self {
        Self { tol, maxit, print: PrintLevel::None }
    }

    pub fn from_param(param: &ItsParam) -> Self {
        Self { tol: param.tol, maxit: param.maxit, print: param.print }
    }

    pub fn with_print(mut self, print: PrintLevel) -> Self {
        self.print = print;
        self
    }

    pub fn solve<A: MatVec>(
        &self,
        a: &A,
        b: &[Real],
        x: &mut [Real],
        mut pc: Option<&mut dyn Preconditioner>,
    ) -> Result<SolveStats, SolverError> {
        use super::apply_pc;

        let m = b.len();
        assert_eq!(x.len(), m, "rhs/solution length mismatch");

        let normb = guard(blas::norm2(b));
        let mut r = b.to_vec();
        a.aaxpy(-1.0, x, &mut r);
        let mut absres = blas::norm2(&r);
        let mut relres = absres / normb;
        if relres < self.tol || absres < SMALL_REAL {
            print_final(self.print, "GCG", 0, relres, "initial residual below tolerance");
            return Ok(SolveStats::new(0, absres, relres, true));
        }

        // all prior directions and their A-images
        let mut dirs: Vec<Vec<Real>> = Vec::new();
        let mut adirs: Vec<Vec<Real>> = Vec::new();
        let mut pap: Vec<Real> = Vec::new();

        let mut br = vec![0.0; m];
        let mut abr = vec![0.0; m];
        let mut absres0 = absres;

        let mut iter = 0usize;
        while iter < self.maxit {
            iter += 1;

            // candidate direction from the preconditioned residual
            apply_pc(&mut pc, &r, &mut br)?;
            a.matvec(&br, &mut abr);

            let mut p = br.clone();
            let mut ap = abr.clone();
            for i in 0..dirs.len() {
                let beta = -blas::dot(&abr, &dirs[i]) / pap[i];
                blas::axpy(beta, &dirs[i], &mut p);
                blas::axpy(beta, &adirs[i], &mut ap);
            }

            let papk = blas::dot(&p, &ap);
            if papk.abs() < SMALL_REAL {
                print_final(self.print, "GCG", iter, relres, "breakdown");
                return Err(SolverError::Breakdown("<p, A p> near zero in GCG"));
            }
            let alpha = blas::dot(&r, &p) / papk;

            blas::axpy(alpha, &p, x);
            blas::axpy(-alpha, &ap, &mut r);

            absres = blas::norm2(&r);
            relres = absres / normb;
            print_itinfo(self.print, StopType::RelRes, iter, relres, absres, absres / guard(absres0));
            absres0 = absres;

            if blas::norminf(x) <= SMALL_REAL {
                print_final(self.print, "GCG", iter, relres, "solution close to zero");
                return Err(SolverError::SolutionStagnation { iterations: iter });
            }

            if relres < self.tol {
                // explicit recomputation before declaring success
                r.copy_from_slice(b);
                a.aaxpy(-1.0, x, &mut r);
                absres = blas::norm2(&r);
                relres = absres / normb;
                if relres < self.tol {
                    print_final(self.print, "GCG", iter, relres, "converged");
                    return Ok(SolveStats::new(iter, absres, relres, true));
                }
            }

            dirs.push(p);
            adirs.push(ap);
            pap.push(papk);
        }

        print_final(self.print, "GCG", iter, relres, "max iterations");
        Err(SolverError::MaxIterations { maxit: self.maxit, relres })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CsrMatrix;
    use crate::preconditioner::DiagPc;
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

    #[test]
    fn gcg_solves_spd_system() {
        let n = 15;
        let a = laplace_1d(n);
        let x_true: Vec<Real> = (0..n).map(|i| 1.0 + (i % 4) as Real).collect();
        let mut b = vec![0.0; n];
        a.matvec(&x_true, &mut b);
        let mut x = vec![0.0; n];
        let mut pc = DiagPc::new(&a);
        let stats = GcgSolver::new(1e-10, 200).solve(&a, &b, &mut x, Some(&mut pc)).unwrap();
        assert!(stats.converged);
        for (xi, ei) in x.iter().zip(&x_true) {
            assert_abs_diff_eq!(xi, ei, epsilon = 1e-7);
        }
    }

    #[test]
    fn gcg_handles_mild_nonsymmetry() {
        let n = 20;
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 4.0));
            if i > 0 {
                t.push((i, i - 1, -1.2));
            }
            if i + 1 < n {
                t.push((i, i + 1, -0.8));
            }
        }
        let a = CsrMatrix::from_coo(n, n, &t);
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        let stats = GcgSolver::new(1e-9, 200).solve(&a, &b, &mut x, None).unwrap();
        assert!(stats.converged);
        let mut r = b.clone();
        a.aaxpy(-1.0, &x, &mut r);
        assert!(blas::norm2(&r) <= 1e-9 * blas::norm2(&b) * 10.0);
    }
}
