//! Krylov drivers and the format-generic dispatch layer.

use crate::config::{AmgParam, IluParam, ItsParam};
use crate::core::traits::MatVec;
use crate::matrix::{BlockCsrMatrix, BsrMatrix, CsrMatrix, StrMatrix};
use crate::preconditioner::{
    AmgPc, BlockDiagPc, BsrDiagPc, DiagPc, IluPc, Preconditioner, SchwarzPc, StrDiagPc,
};
use crate::utils::convergence::SolveStats;
use crate::{Real, SolverError};

pub mod bicgstab;
pub mod fgmres;
pub mod gcg;
pub mod gmres;
pub mod pcg;

pub use bicgstab::BiCgStabSolver;
pub use fgmres::FgmresSolver;
pub use gcg::GcgSolver;
pub use gmres::GmresSolver;
pub use pcg::PcgSolver;

/// Apply the optional preconditioner, defaulting to the identity.
pub(crate) fn apply_pc(
    pc: &mut Option<&mut dyn Preconditioner>,
    r: &[Real],
    z: &mut [Real],
) -> Result<(), SolverError> {
    match pc {
        Some(pc) => pc.apply(r, z),
        None => {
            z.copy_from_slice(r);
            Ok(())
        }
    }
}

/// Which Krylov driver a parameter bundle selects.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ItsolverKind {
    #[default]
    Pcg,
    BiCgStab,
    Gmres,
    /// GMRES with an adaptive restart length.
    VGmres,
    /// Flexible GMRES; mandatory over nonlinear preconditioners.
    Fgmres,
    Gcg,
}

/// Run the selected driver on any matrix format implementing [`MatVec`].
pub fn solve_itsolver<A: MatVec>(
    a: &A,
    b: &[Real],
    x: &mut [Real],
    pc: Option<&mut dyn Preconditioner>,
    param: &ItsParam,
) -> Result<SolveStats, SolverError> {
    if param.maxit == 0 || param.tol <= 0.0 {
        return Err(SolverError::UnknownType("maxit and tol must be positive"));
    }
    match param.itsolver {
        ItsolverKind::Pcg => pcg::PcgSolver::from_param(param).solve(a, b, x, pc),
        ItsolverKind::BiCgStab => bicgstab::BiCgStabSolver::from_param(param).solve(a, b, x, pc),
        ItsolverKind::Gmres => gmres::GmresSolver::from_param(param).solve(a, b, x, pc),
        ItsolverKind::VGmres => gmres::GmresSolver::from_param(param)
            .with_variable_restart(true)
            .solve(a, b, x, pc),
        ItsolverKind::Fgmres => fgmres::FgmresSolver::from_param(param).solve(a, b, x, pc),
        ItsolverKind::Gcg => gcg::GcgSolver::from_param(param).solve(a, b, x, pc),
    }
}

/// Krylov solve without preconditioning.
pub fn solve_krylov(
    a: &CsrMatrix,
    b: &[Real],
    x: &mut [Real],
    param: &ItsParam,
) -> Result<SolveStats, SolverError> {
    solve_itsolver(a, b, x, None, param)
}

/// Krylov solve with the diagonal preconditioner.
pub fn solve_krylov_diag(
    a: &CsrMatrix,
    b: &[Real],
    x: &mut [Real],
    param: &ItsParam,
) -> Result<SolveStats, SolverError> {
    let mut pc = DiagPc::new(a);
    solve_itsolver(a, b, x, Some(&mut pc), param)
}

/// Krylov solve preconditioned by an incomplete factorization.
pub fn solve_krylov_ilu(
    a: &CsrMatrix,
    b: &[Real],
    x: &mut [Real],
    param: &ItsParam,
    ilu: &IluParam,
) -> Result<SolveStats, SolverError> {
    let mut pc = IluPc::new(a, ilu)?;
    solve_itsolver(a, b, x, Some(&mut pc), param)
}

/// Krylov solve preconditioned by block Schwarz over uniform row blocks.
pub fn solve_krylov_schwarz(
    a: &CsrMatrix,
    b: &[Real],
    x: &mut [Real],
    param: &ItsParam,
    nblocks: usize,
) -> Result<SolveStats, SolverError> {
    let mut pc = SchwarzPc::with_uniform_blocks(a, nblocks)?;
    solve_itsolver(a, b, x, Some(&mut pc), param)
}

/// Krylov solve preconditioned by one AMG cycle per application. A
/// hierarchy whose coarsening stalled on the finest level degenerates to
/// the coarse-grid solve, which is the documented fallback.
pub fn solve_krylov_amg(
    a: &CsrMatrix,
    b: &[Real],
    x: &mut [Real],
    param: &ItsParam,
    amg: &AmgParam,
) -> Result<SolveStats, SolverError> {
    let mut pc = AmgPc::new(a, amg)?;
    solve_itsolver(a, b, x, Some(&mut pc), param)
}

/// Stand-alone AMG solve: cycle until the tolerance or the budget is hit.
pub fn solve_amg(
    a: &CsrMatrix,
    b: &[Real],
    x: &mut [Real],
    amg: &AmgParam,
    tol: Real,
    maxit: usize,
) -> Result<SolveStats, SolverError> {
    let mut h = crate::amg::AmgHierarchy::setup(a, amg)?;
    h.solve(b, x, tol, maxit)
}

/// Krylov solve on a BSR system with the blockwise diagonal
/// preconditioner.
pub fn solve_bsr_krylov_diag(
    a: &BsrMatrix,
    b: &[Real],
    x: &mut [Real],
    param: &ItsParam,
) -> Result<SolveStats, SolverError> {
    let mut pc = BsrDiagPc::new(a);
    solve_itsolver(a, b, x, Some(&mut pc), param)
}

/// Krylov solve on a BSR system with the block ILU(0) preconditioner.
pub fn solve_bsr_krylov_ilu(
    a: &BsrMatrix,
    b: &[Real],
    x: &mut [Real],
    param: &ItsParam,
) -> Result<SolveStats, SolverError> {
    let mut pc = IluPc::from_bsr(a)?;
    solve_itsolver(a, b, x, Some(&mut pc), param)
}

/// Krylov solve on a 2 x 2 block saddle-point system with the
/// Stokes-style block-diagonal preconditioner: an AMG hierarchy on the
/// elliptic (0,0) block, the inverted diagonal of the supplied pressure
/// mass matrix on the second block. Flexible or right-preconditioned
/// outer methods are the intended callers.
pub fn solve_bdcsr_krylov_stokes(
    a: &BlockCsrMatrix,
    pressure_mass: &CsrMatrix,
    b: &[Real],
    x: &mut [Real],
    param: &ItsParam,
    amg: &AmgParam,
) -> Result<SolveStats, SolverError> {
    assert_eq!(a.brow, 2, "Stokes preconditioning expects a 2 x 2 block system");
    let a00 = a
        .block(0, 0)
        .ok_or(SolverError::UnknownType("missing elliptic (0,0) block"))?;
    let mut pc = BlockDiagPc::new(
        a.row_offsets.clone(),
        vec![
            Box::new(AmgPc::new(a00, amg)?),
            Box::new(DiagPc::new(pressure_mass)),
        ],
    );
    solve_itsolver(a, b, x, Some(&mut pc), param)
}

/// Krylov solve on a structured system with the blockwise diagonal
/// preconditioner.
pub fn solve_str_krylov_diag(
    a: &StrMatrix,
    b: &[Real],
    x: &mut [Real],
    param: &ItsParam,
) -> Result<SolveStats, SolverError> {
    let mut pc = StrDiagPc::new(a);
    solve_itsolver(a, b, x, Some(&mut pc), param)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::convergence::StopType;

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
    fn dispatch_runs_every_driver() {
        let n = 16;
        let a = laplace_1d(n);
        let b = vec![1.0; n];
        for kind in [
            ItsolverKind::Pcg,
            ItsolverKind::BiCgStab,
            ItsolverKind::Gmres,
            ItsolverKind::VGmres,
            ItsolverKind::Fgmres,
            ItsolverKind::Gcg,
        ] {
            let mut x = vec![0.0; n];
            let param = ItsParam { itsolver: kind, tol: 1e-8, maxit: 400, ..Default::default() };
            let stats = solve_krylov_diag(&a, &b, &mut x, &param)
                .unwrap_or_else(|e| panic!("{kind:?} failed: {e}"));
            assert!(stats.converged, "{kind:?} did not converge");
        }
    }

    #[test]
    fn invalid_params_are_rejected() {
        let a = laplace_1d(4);
        let b = vec![1.0; 4];
        let mut x = vec![0.0; 4];
        let param = ItsParam { maxit: 0, ..Default::default() };
        assert!(matches!(
            solve_krylov(&a, &b, &mut x, &param),
            Err(SolverError::UnknownType(_))
        ));
    }

    #[test]
    fn standalone_amg_front_end() {
        let n = 64;
        let a = laplace_1d(n);
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        let amg = AmgParam { coarse_dof: 8, ..Default::default() };
        let stats = solve_amg(&a, &b, &mut x, &amg, 1e-8, 100).unwrap();
        assert!(stats.converged);
        let mut r = b.clone();
        a.aaxpy(-1.0, &x, &mut r);
        let rn: Real = r.iter().map(|v| v * v).sum::<Real>().sqrt();
        assert!(rn <= 1e-7 * (n as Real).sqrt());
    }

    #[test]
    fn stop_types_all_converge() {
        let n = 20;
        let a = laplace_1d(n);
        let b = vec![1.0; n];
        for stop in [StopType::RelRes, StopType::RelPrecRes, StopType::ModRelRes] {
            let mut x = vec![0.0; n];
            let param = ItsParam {
                itsolver: ItsolverKind::Pcg,
                stop,
                tol: 1e-9,
                maxit: 300,
                ..Default::default()
            };
            let stats = solve_krylov_diag(&a, &b, &mut x, &param).unwrap();
            assert!(stats.converged, "{stop:?} did not converge");
        }
    }
}
