//! Parameter bundles for the iterative solvers, the AMG hierarchy and the
//! ILU factorizations.

use crate::solver::ItsolverKind;
use crate::utils::convergence::StopType;
use crate::Real;

/// How much the drivers report through the `log` facade.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PrintLevel {
    #[default]
    None,
    /// Summary line per termination.
    Min,
    /// Plus per-iteration residual trace.
    Some,
    /// Plus restart/stagnation diagnostics.
    More,
}

/// Iterative-solver parameters.
#[derive(Clone, Debug)]
pub struct ItsParam {
    pub itsolver: ItsolverKind,
    pub stop: StopType,
    pub maxit: usize,
    pub tol: Real,
    /// Restart length for the GMRES family.
    pub restart: usize,
    pub print: PrintLevel,
}

impl Default for ItsParam {
    fn default() -> Self {
        Self {
            itsolver: ItsolverKind::Pcg,
            stop: StopType::RelRes,
            maxit: 500,
            tol: 1e-8,
            restart: 25,
            print: PrintLevel::None,
        }
    }
}

impl ItsParam {
    pub fn new(itsolver: ItsolverKind, tol: Real, maxit: usize) -> Self {
        Self { itsolver, tol, maxit, ..Default::default() }
    }
    pub fn with_stop(mut self, stop: StopType) -> Self {
        self.stop = stop;
        self
    }
    pub fn with_restart(mut self, restart: usize) -> Self {
        self.restart = restart;
        self
    }
    pub fn with_print(mut self, print: PrintLevel) -> Self {
        self.print = print;
        self
    }
}

/// Multilevel cycle shapes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum AmgCycleKind {
    #[default]
    V,
    W,
    F,
    /// Nonlinear AMLI: coarse correction wrapped in a short flexible
    /// Krylov run preconditioned by the next level.
    Amli,
}

/// C/F splitting strategies.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum CoarseningKind {
    /// Modified Ruge-Stuben: strength from `min_j a_ij` row scaling with a
    /// row-sum filter.
    #[default]
    Modified,
    /// Classical RS on strong negative couplings.
    RsNegative,
    /// Classical RS on strong absolute couplings.
    RsAbsolute,
    /// Compatible relaxation.
    CompatibleRelaxation,
}

/// Relaxation methods usable inside the AMG cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum SmootherKind {
    Jacobi,
    #[default]
    GaussSeidel,
    /// Symmetric GS: forward sweep pre-smoothing, backward post-smoothing.
    SymmetricGaussSeidel,
    Sor,
    /// C/F-ordered GS (C first on descent, F first on ascent).
    CfGaussSeidel,
    Poly,
    Ilu,
    Schwarz,
}

/// Coarsest-level solve.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum CoarseSolverKind {
    /// Dense LU with partial pivoting.
    #[default]
    DirectLu,
    /// Internal iterative solve (PCG, tight tolerance).
    Iterative,
}

/// AMG parameters. Defaults follow common classical-AMG practice for
/// scalar elliptic problems.
#[derive(Clone, Debug)]
pub struct AmgParam {
    pub cycle: AmgCycleKind,
    pub coarsening: CoarseningKind,
    /// Strong-coupling threshold.
    pub strong_threshold: Real,
    /// Rows whose `|row sum|/|a_ii|` exceeds this become all-weak.
    pub max_row_sum: Real,
    /// Relative truncation threshold for interpolation weights; 0 keeps
    /// every weight.
    pub truncation: Real,
    pub smoother: SmootherKind,
    pub presmooth_iter: usize,
    pub postsmooth_iter: usize,
    /// Relaxation weight for Jacobi/SOR.
    pub relaxation: Real,
    /// Polynomial smoother degree.
    pub poly_degree: usize,
    /// Condition-number ratio `smax/smin` fed to the polynomial degree
    /// bound; a heuristic, not a law.
    pub poly_kappa_ratio: Real,
    pub max_levels: usize,
    /// Stop coarsening at or below this many unknowns.
    pub coarse_dof: usize,
    pub coarse_solver: CoarseSolverKind,
    /// Inner Krylov iterations per level in the nonlinear AMLI cycle.
    pub amli_degree: usize,
    /// Damp the coarse correction by `<e,b>/<e,Ae>` before prolongation.
    pub coarse_scaling: bool,
    /// ILU fill level for the ILU smoother.
    pub ilu_fill: usize,
    // Compatible-relaxation controls.
    /// Relaxation sweeps per CR stage.
    pub cr_sweeps: usize,
    /// Target convergence rate; CR stops once `rho <= cr_rate`.
    pub cr_rate: Real,
    /// First-stage candidate threshold base (`base^sweeps`).
    pub cr_first_threshold: Real,
    /// Candidate threshold for later stages.
    pub cr_later_threshold: Real,
    pub print: PrintLevel,
}

impl Default for AmgParam {
    fn default() -> Self {
        Self {
            cycle: AmgCycleKind::V,
            coarsening: CoarseningKind::Modified,
            strong_threshold: 0.25,
            max_row_sum: 0.9,
            truncation: 0.0,
            smoother: SmootherKind::GaussSeidel,
            presmooth_iter: 2,
            postsmooth_iter: 2,
            relaxation: 1.0,
            poly_degree: 3,
            poly_kappa_ratio: 8.0,
            max_levels: 20,
            coarse_dof: 500,
            coarse_solver: CoarseSolverKind::DirectLu,
            amli_degree: 2,
            coarse_scaling: false,
            ilu_fill: 0,
            cr_sweeps: 3,
            cr_rate: 0.8,
            cr_first_threshold: 0.3,
            cr_later_threshold: 0.5,
            print: PrintLevel::None,
        }
    }
}

/// ILU factorization flavors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum IluKind {
    #[default]
    Ilu0,
    /// Level-of-fill ILU(k).
    Iluk,
    /// Dual-threshold ILUT.
    Ilut,
}

#[derive(Clone, Debug)]
pub struct IluParam {
    pub kind: IluKind,
    /// Fill level for ILU(k) / row fill bound for ILUT.
    pub fill_level: usize,
    /// Drop tolerance for ILUT.
    pub droptol: Real,
    /// Diagonal compensation weight (MILU-style) applied to dropped mass.
    pub relax: Real,
    /// Pivot threshold; accepted for interface compatibility, the current
    /// factorizations do not pivot.
    pub permtol: Real,
}

impl Default for IluParam {
    fn default() -> Self {
        Self { kind: IluKind::Ilu0, fill_level: 0, droptol: 1e-3, relax: 0.0, permtol: 0.0 }
    }
}
