//! amgsolve: algebraic multigrid and Krylov solvers for sparse linear systems
//!
//! The crate solves `A x = b` for large sparse `A` coming from discretized
//! PDEs. It combines classical Ruge-Stuben algebraic multigrid (setup and
//! V/W/F/nonlinear-AMLI cycling), a family of smoothers (Jacobi,
//! Gauss-Seidel, SOR, ILU, polynomial, block Schwarz) and numerically
//! guarded Krylov drivers (PCG, BiCGStab with safe net, restarted GMRES,
//! flexible GMRES, GCG) over CSR, BSR and structured-grid matrix formats.

pub mod amg;
pub mod blas;
pub mod config;
pub mod consts;
pub mod core;
pub mod error;
pub mod io;
pub mod matrix;
pub mod preconditioner;
pub mod smoother;
pub mod solver;
pub mod utils;

/// Floating-point scalar, fixed at build time.
pub type Real = f64;

/// Signed index type for markers, orderings, pivots and on-disk payloads.
/// Must be wide enough to hold `nnz` of any matrix the build handles.
pub type Int = i32;

// Re-exports for convenience
pub use config::{AmgParam, IluParam, ItsParam};
pub use error::SolverError;
pub use matrix::{BsrMatrix, CsrMatrix, StrMatrix};
pub use preconditioner::Preconditioner;
pub use solver::{solve_itsolver, ItsolverKind};
pub use utils::convergence::{SolveStats, StopType};
