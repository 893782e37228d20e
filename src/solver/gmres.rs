//! Right-preconditioned restarted GMRES with modified Gram-Schmidt and
//! Givens rotations, plus the variable-restart variant that shortens the
//! Krylov cycle when a restart made no progress.
//!
//! The convergence measure is the unpreconditioned residual against
//! `||b||` (or `||r0||` for a zero right-hand side); right preconditioning
//! leaves that residual directly observable.

use crate::config::{ItsParam, PrintLevel};
use crate::consts::SMALL_REAL;
use crate::core::traits::MatVec;
use crate::preconditioner::Preconditioner;
use crate::utils::convergence::{guard, print_final, print_itinfo, SolveStats, StopType};
use crate::{blas, Real, SolverError};

/// Restart shrink step when a cycle stagnates.
const RESTART_STEP: usize = 3;
/// Smallest restart the variable variant will shrink to.
const RESTART_MIN: usize = 5;
/// A restart cycle with residual reduction above this counts as stagnant.
const CR_MAX: Real = 0.99;
/// A cycle reducing below this is converging fast enough to re-grow.
const CR_MIN: Real = 0.174;

pub struct GmresSolver {
    pub tol: Real,
    pub maxit: usize,
    pub restart: usize,
    /// Shrink the restart length adaptively on stagnant cycles.
    pub variable_restart: bool,
    pub print: PrintLevel,
}

impl GmresSolver {
    pub fn new(tol: Real, maxit: usize, restart: usize) -> Self {
        Self { tol, maxit, restart: restart.max(1), variable_restart: false, print: PrintLevel::None }
    }

    pub fn from_param(param: &ItsParam) -> Self {
        Self {
            tol: param.tol,
            maxit: param.maxit,
            restart: param.restart.max(1),
            variable_restart: false,
            print: param.print,
        }
    }

    pub fn with_variable_restart(mut self, flag: bool) -> Self {
        self.variable_restart = flag;
        self
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
        let restart_max = self.restart.min(n.max(1));
        let mut restart = restart_max;

        // Krylov basis and the Hessenberg/Givens workspace, sized once for
        // the largest restart
        let mut p: Vec<Vec<Real>> = vec![vec![0.0; n]; restart_max + 1];
        let mut hh: Vec<Vec<Real>> = vec![vec![0.0; restart_max]; restart_max + 1];
        let mut c = vec![0.0; restart_max];
        let mut s = vec![0.0; restart_max];
        let mut rs = vec![0.0; restart_max + 1];
        let mut w = vec![0.0; n];
        let mut zw = vec![0.0; n];
        let mut r_vec = vec![0.0; n];

        // initial residual
        p[0].copy_from_slice(b);
        a.aaxpy(-1.0, x, &mut p[0]);
        let b_norm = blas::norm2(b);
        let mut r_norm = blas::norm2(&p[0]);
        let den_norm = if b_norm > 0.0 { b_norm } else { guard(r_norm) };
        let epsilon = self.tol * den_norm;

        let mut iter = 0usize;
        let mut converged = false;

        'outer: while iter < self.maxit {
            rs[0] = r_norm;
            if r_norm < SMALL_REAL {
                converged = true;
                break;
            }

            if r_norm <= epsilon {
                // trust only the explicitly recomputed residual
                r_vec.copy_from_slice(b);
                a.aaxpy(-1.0, x, &mut r_vec);
                r_norm = blas::norm2(&r_vec);
                if r_norm <= epsilon {
                    converged = true;
                    break;
                }
                if self.print >= PrintLevel::Some {
                    log::debug!("GMRES false convergence, true residual {r_norm:.3e}");
                }
                p[0].copy_from_slice(&r_vec);
                rs[0] = r_norm;
            }

            let cycle_start_norm = r_norm;
            let t = 1.0 / r_norm;
            for v in p[0].iter_mut() {
                *v *= t;
            }

            // Arnoldi with modified Gram-Schmidt over A M^-1
            let mut i = 0usize;
            while i < restart && iter < self.maxit {
                i += 1;
                iter += 1;

                apply_pc(&mut pc, &p[i - 1], &mut w)?;
                let (head, tail) = p.split_at_mut(i);
                a.matvec(&w, &mut tail[0]);
                for (j, pj) in head.iter().enumerate() {
                    hh[j][i - 1] = blas::dot(pj, &tail[0]);
                    blas::axpy(-hh[j][i - 1], pj, &mut tail[0]);
                }
                let t = blas::norm2(&tail[0]);
                hh[i][i - 1] = t;
                if t != 0.0 {
                    let tinv = 1.0 / t;
                    for v in tail[0].iter_mut() {
                        *v *= tinv;
                    }
                }

                // previous rotations, then a new one to annihilate the
                // subdiagonal
                for j in 1..i {
                    let t = hh[j - 1][i - 1];
                    hh[j - 1][i - 1] = s[j - 1] * hh[j][i - 1] + c[j - 1] * t;
                    hh[j][i - 1] = -s[j - 1] * t + c[j - 1] * hh[j][i - 1];
                }
                let t = hh[i][i - 1] * hh[i][i - 1] + hh[i - 1][i - 1] * hh[i - 1][i - 1];
                let gamma = guard(t.sqrt());
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
                    if rs[i - 1].abs() > 0.0 { r_norm / rs[i - 1].abs() } else { 0.0 },
                );
                if r_norm <= epsilon {
                    break;
                }
            }

            // back-substitution for the least-squares coefficients
            rs[i - 1] /= hh[i - 1][i - 1];
            for k in (0..i - 1).rev() {
                let mut t = 0.0;
                for j in k + 1..i {
                    t -= hh[k][j] * rs[j];
                }
                rs[k] = (t + rs[k]) / hh[k][k];
            }

            // correction: x += M^-1 (sum rs_j p_j)
            w.copy_from_slice(&p[i - 1]);
            for v in w.iter_mut() {
                *v *= rs[i - 1];
            }
            for j in (0..i - 1).rev() {
                blas::axpy(rs[j], &p[j], &mut w);
            }
            apply_pc(&mut pc, &w, &mut zw)?;
            blas::axpy(1.0, &zw, x);

            if r_norm <= epsilon {
                r_vec.copy_from_slice(b);
                a.aaxpy(-1.0, x, &mut r_vec);
                r_norm = blas::norm2(&r_vec);
                if r_norm <= epsilon {
                    converged = true;
                    break 'outer;
                }
                if self.print >= PrintLevel::Some {
                    log::debug!("GMRES false convergence, true residual {r_norm:.3e}");
                }
                p[0].copy_from_slice(&r_vec);
                continue 'outer;
            }

            // rebuild the residual vector from the rotations, avoiding an
            // extra matrix product at the restart boundary
            for j in (1..=i).rev() {
                rs[j - 1] = -s[j - 1] * rs[j];
                rs[j] *= c[j - 1];
            }
            if i > 0 {
                let (head, tail) = p.split_at_mut(i);
                let pi = &mut tail[0];
                let ri = rs[i];
                for v in pi.iter_mut() {
                    *v *= ri;
                }
                for j in (1..i).rev() {
                    blas::axpy(rs[j], &head[j], pi);
                }
                let r0 = rs[0];
                for v in head[0].iter_mut() {
                    *v *= r0;
                }
                blas::axpy(1.0, pi, &mut head[0]);
            }

            // variable restart: shrink when the whole cycle stalled,
            // re-grow toward the configured length when it converged fast
            if self.variable_restart {
                let cr = r_norm / guard(cycle_start_norm);
                if cr > CR_MAX && restart > RESTART_MIN {
                    restart = restart.saturating_sub(RESTART_STEP).max(RESTART_MIN);
                    if self.print >= PrintLevel::More {
                        log::debug!("GMRES cycle rate {cr:.3}; restart shrunk to {restart}");
                    }
                } else if cr < CR_MIN && restart < restart_max {
                    restart = (restart + RESTART_STEP).min(restart_max);
                }
            }
        }

        let relres = r_norm / den_norm;
        if converged {
            print_final(self.print, "GMRES", iter, relres, "converged");
            Ok(SolveStats::new(iter, r_norm, relres, true))
        } else {
            print_final(self.print, "GMRES", iter, relres, "max iterations");
            Err(SolverError::MaxIterations { maxit: self.maxit, relres })
        }
    }
}
