//! Flexible GMRES: the preconditioned vectors are stored explicitly, so
//! the preconditioner may change from one iteration to the next. Required
//! when the preconditioner is itself an iterative process, e.g. the
//! nonlinear AMLI cycle.

use crate::config::{ItsParam, PrintLevel};
use crate::consts::SMALL_REAL;
use crate::core::traits::MatVec;
use crate::preconditioner::Preconditioner;
use crate::utils::convergence::{guard, print_final, print_itinfo, SolveStats, StopType};
use crate::{blas, Real, SolverError};

pub struct FgmresSolver {
    pub tol: Real,
    pub maxit: usize,
    pub restart: usize,
    pub print: PrintLevel,
}

impl FgmresSolver {
    pub fn new(tol: Real, maxit: usize, restart: usize) -> Self {
        Self { tol, maxit, restart: restart.max(1), print: PrintLevel::None }
    }

    pub fn from_param(param: &ItsParam) -> Self {
        Self {
            tol: param.tol,
            maxit: param.maxit,
            restart: param.restart.max(1),
            print: param.print,
        }
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

        let n = b.len();
        assert_eq!(x.len(), n, "rhs/solution length mismatch");
        let restart = self.restart.min(n.max(1));

        let mut v: Vec<Vec<Real>> = vec![vec![0.0; n]; restart + 1];
        // preconditioned basis, one slot per Arnoldi vector
        let mut z: Vec<Vec<Real>> = vec![vec![0.0; n]; restart];
        let mut hh: Vec<Vec<Real>> = vec![vec![0.0; restart]; restart + 1];
        let mut c = vec![0.0; restart];
        let mut s = vec![0.0; restart];
        let mut rs = vec![0.0; restart + 1];
        let mut r_vec = vec![0.0; n];

        v[0].copy_from_slice(b);
        a.aaxpy(-1.0, x, &mut v[0]);
        let b_norm = blas::norm2(b);
        let mut r_norm = blas::norm2(&v[0]);
        let den_norm = if b_norm > 0.0 { b_norm } else { guard(r_norm) };
        let epsilon = self.tol * den_norm;

        let mut iter = 0usize;
        let mut converged = false;

        'outer: while iter < self.maxit {
            if r_norm < SMALL_REAL || r_norm <= epsilon {
                r_vec.copy_from_slice(b);
                a.aaxpy(-1.0, x, &mut r_vec);
                r_norm = blas::norm2(&r_vec);
                if r_norm <= epsilon || r_norm < SMALL_REAL {
                    converged = true;
                    break;
                }
                v[0].copy_from_slice(&r_vec);
            }

            rs[0] = r_norm;
            let t = 1.0 / r_norm;
            for vi in v[0].iter_mut() {
                *vi *= t;
            }

            let mut i = 0usize;
            while i < restart && iter < self.maxit {
                i += 1;
                iter += 1;

                // z_{i-1} = M_i v_{i-1}, possibly a different M every time
                {
                    let (zcur, vcur) = (&mut z[i - 1], &v[i - 1]);
                    apply_pc(&mut pc, vcur, zcur)?;
                }
                let (head, tail) = v.split_at_mut(i);
                a.matvec(&z[i - 1], &mut tail[0]);
                for (j, vj) in head.iter().enumerate() {
                    hh[j][i - 1] = blas::dot(vj, &tail[0]);
                    blas::axpy(-hh[j][i - 1], vj, &mut tail[0]);
                }
                let t = blas::norm2(&tail[0]);
                hh[i][i - 1] = t;
                if t != 0.0 {
                    let tinv = 1.0 / t;
                    for vi in tail[0].iter_mut() {
                        *vi *= tinv;
                    }
                }

                for j in 1..i {
                    let t = hh[j - 1][i - 1];
                    hh[j - 1][i - 1] = s[j - 1] * hh[j][i - 1] + c[j - 1] * t;
                    hh[j][i - 1] = -s[j - 1] * t + c[j - 1] * hh[j][i - 1];
                }
                let gamma =
                    guard((hh[i][i - 1] * hh[i][i - 1] + hh[i - 1][i - 1] * hh[i - 1][i - 1]).sqrt());
                c[i - 1] = hh[i - 1][i - 1] / gamma;
                s[i - 1] = hh[i][i - 1] / gamma;
                rs[i] = -s[i - 1] * rs[i - 1];
                rs[i - 1] *= c[i - 1];
                hh[i - 1][i - 1] = s[i - 1] * hh[i][i - 1] + c[i - 1] * hh[i - 1][i - 1];
                r_norm = rs[i].abs();

                print_itinfo(
                    self.print,
                    StopType::RelRes,
                    iter,
                    r_norm / den_norm,
                    r_norm,
                    0.0,
                );
                if r_norm <= epsilon {
                    break;
                }
            }

            rs[i - 1] /= hh[i - 1][i - 1];
            for k in (0..i - 1).rev() {
                let mut t = 0.0;
                for j in k + 1..i {
                    t -= hh[k][j] * rs[j];
                }
                rs[k] = (t + rs[k]) / hh[k][k];
            }

            // x += sum rs_j z_j; the stored preconditioned basis carries
            // the per-iteration preconditioners
            for j in 0..i {
                blas::axpy(rs[j], &z[j], x);
            }

            r_vec.copy_from_slice(b);
            a.aaxpy(-1.0, x, &mut r_vec);
            r_norm = blas::norm2(&r_vec);
            if r_norm <= epsilon {
                converged = true;
                break 'outer;
            }
            v[0].copy_from_slice(&r_vec);
        }

        let relres = r_norm / den_norm;
        if converged {
            print_final(self.print, "FGMRES", iter, relres, "converged");
            Ok(SolveStats::new(iter, r_norm, relres, true))
        } else {
            print_final(self.print, "FGMRES", iter, relres, "max iterations");
            Err(SolverError::MaxIterations { maxit: self.maxit, relres })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CsrMatrix;
    use crate::preconditioner::DiagPc;
    use approx::assert_abs_diff_eq;

    fn nonsym(n: usize) -> CsrMatrix {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 3.0));
            if i > 0 {
                t.push((i, i - 1, -1.3));
            }
            if i + 1 < n {
                t.push((i, i + 1, -0.7));
            }
        }
        CsrMatrix::from_coo(n, n, &t)
    }

    #[test]
    fn matches_reference_solution() {
        let n = 25;
        let a = nonsym(n);
        let x_true: Vec<Real> = (0..n).map(|i| (i as Real * 0.2).sin() + 2.0).collect();
        let mut b = vec![0.0; n];
        a.matvec(&x_true, &mut b);
        let mut x = vec![0.0; n];
        let mut pc = DiagPc::new(&a);
        let stats = FgmresSolver::new(1e-10, 300, 10)
            .solve(&a, &b, &mut x, Some(&mut pc))
            .unwrap();
        assert!(stats.converged);
        for (xi, ei) in x.iter().zip(&x_true) {
            assert_abs_diff_eq!(xi, ei, epsilon = 1e-7);
        }
    }

    /// A deliberately iteration-dependent preconditioner: FGMRES must
    /// still converge because it stores the preconditioned vectors.
    #[test]
    fn tolerates_changing_preconditioner() {
        struct WobblyPc {
            inner: DiagPc,
            count: usize,
        }
        impl crate::preconditioner::Preconditioner for WobblyPc {
            fn apply(&mut self, r: &[Real], z: &mut [Real]) -> Result<(), SolverError> {
                self.inner.apply(r, z)?;
                self.count += 1;
                let w = 1.0 + 0.3 * ((self.count % 3) as Real);
                for zi in z.iter_mut() {
                    *zi *= w;
                }
                Ok(())
            }
        }

        let n = 30;
        let a = nonsym(n);
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        let mut pc = WobblyPc { inner: DiagPc::new(&a), count: 0 };
        let stats = FgmresSolver::new(1e-9, 400, 15)
            .solve(&a, &b, &mut x, Some(&mut pc))
            .unwrap();
        assert!(stats.converged);
        let mut r = b.clone();
        a.aaxpy(-1.0, &x, &mut r);
        assert!(blas::norm2(&r) <= 1e-9 * blas::norm2(&b) * 10.0);
    }
}
