//! The multilevel hierarchy and its per-level data.

use crate::config::{AmgParam, PrintLevel};
use crate::consts::SMALL_REAL;
use crate::core::traits::MatVec;
use crate::matrix::CsrMatrix;
use crate::preconditioner::{DiagPc, IluData, SchwarzPc};
use crate::utils::convergence::{guard, print_final, print_itinfo, SolveStats, StopType};
use crate::{blas, Int, Real, SolverError};

/// One level of the hierarchy. Level 0 is the finest. The coarsest level
/// has no prolongation or restriction.
pub struct AmgLevel {
    pub a: CsrMatrix,
    pub p: Option<CsrMatrix>,
    pub r: Option<CsrMatrix>,
    /// Right-hand side of this level's correction system.
    pub b: Vec<Real>,
    /// Iterate of this level's correction system.
    pub x: Vec<Real>,
    /// Residual scratch.
    pub w: Vec<Real>,
    /// C/F marker from the coarsening that produced the next level.
    pub cf: Vec<Int>,
    /// ILU factor when the level smoother needs one.
    pub ilu: Option<IluData>,
    /// Block Schwarz data when the level smoother needs it.
    pub schwarz: Option<SchwarzPc>,
}

impl AmgLevel {
    pub(crate) fn new(a: CsrMatrix) -> Self {
        use crate::core::traits::Indexing;
        let n = a.nrows();
        Self {
            a,
            p: None,
            r: None,
            b: vec![0.0; n],
            x: vec![0.0; n],
            w: vec![0.0; n],
            cf: Vec::new(),
            ilu: None,
            schwarz: None,
        }
    }
}

/// Coarsest-grid solver state.
pub(crate) enum CoarseSolverData {
    /// Dense LU with partial pivoting, factored once at setup.
    Lu { n: usize, lu: Vec<Real>, pivot: Vec<Int> },
    /// Internal PCG with a diagonal preconditioner.
    Iterative { pc: DiagPc },
}

/// The assembled hierarchy. Work vectors are owned per level, so one
/// `&mut` borrower runs cycles at a time; concurrent cycling on a shared
/// hierarchy is rejected at compile time.
pub struct AmgHierarchy {
    pub levels: Vec<AmgLevel>,
    pub param: AmgParam,
    pub(crate) coarse: CoarseSolverData,
}

impl AmgHierarchy {
    /// Levels actually built (never more than `param.max_levels`).
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// One multilevel cycle on `levels[0]`, using the level's `b` and `x`
    /// in place.
    pub fn cycle(&mut self) -> Result<(), SolverError> {
        super::cycle::mg_cycle(
            &mut self.levels,
            &mut self.coarse,
            &self.param,
            0,
            self.param.cycle,
        )
    }

    /// Preconditioner contract: starting from zero, run `ncycles` cycles
    /// against the residual `r` and return the correction in `z`.
    pub fn apply_correction(
        &mut self,
        r: &[Real],
        z: &mut [Real],
        ncycles: usize,
    ) -> Result<(), SolverError> {
        let lev0 = &mut self.levels[0];
        lev0.b.copy_from_slice(r);
        lev0.x.fill(0.0);
        for _ in 0..ncycles.max(1) {
            self.cycle()?;
        }
        z.copy_from_slice(&self.levels[0].x);
        Ok(())
    }

    /// Stand-alone AMG iteration: cycle until the relative residual drops
    /// below `tol` or `maxit` cycles are spent.
    pub fn solve(
        &mut self,
        b: &[Real],
        x: &mut [Real],
        tol: Real,
        maxit: usize,
    ) -> Result<SolveStats, SolverError> {
        let print = self.param.print;
        let mut r = b.to_vec();
        self.levels[0].a.aaxpy(-1.0, x, &mut r);
        let absres_init = blas::norm2(&r);
        let normr0 = guard(absres_init);
        let mut absres0 = normr0;
        let mut relres = absres_init / normr0;

        if absres_init < SMALL_REAL || relres < tol {
            return Ok(SolveStats::new(0, absres_init, relres, true));
        }

        for iter in 1..=maxit {
            let lev0 = &mut self.levels[0];
            lev0.b.copy_from_slice(b);
            lev0.x.copy_from_slice(x);
            self.cycle()?;
            x.copy_from_slice(&self.levels[0].x);

            r.copy_from_slice(b);
            self.levels[0].a.aaxpy(-1.0, x, &mut r);
            let absres = blas::norm2(&r);
            relres = absres / normr0;
            print_itinfo(print, StopType::RelRes, iter, relres, absres, absres / absres0);
            absres0 = absres;
            if relres < tol {
                print_final(print, "AMG", iter, relres, "converged");
                return Ok(SolveStats::new(iter, absres, relres, true));
            }
        }
        print_final(print, "AMG", maxit, relres, "max cycles reached");
        Err(SolverError::MaxIterations { maxit, relres })
    }

    /// Emit a one-line complexity summary when the print level allows.
    pub fn log_complexity(&self) {
        if self.param.print >= PrintLevel::Min {
            let fine_nnz = self.levels[0].a.nnz() as Real;
            let total: usize = self.levels.iter().map(|l| l.a.nnz()).sum();
            log::info!(
                "AMG hierarchy: {} levels, operator complexity {:.2}",
                self.levels.len(),
                total as Real / fine_nnz
            );
        }
    }
}
