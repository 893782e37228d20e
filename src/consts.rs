//! Shared numeric constants for the iterative solvers.

use crate::Real;

/// Smallest magnitude treated as nonzero in denominators and diagonals.
pub const SMALL_REAL: Real = 1e-20;

/// Sentinel for "worse than any residual".
pub const BIG_REAL: Real = 1e20;

/// Near-singular determinant threshold for the small dense inverses.
pub const SMALL_DET: Real = 1e-22;

/// Consecutive stagnation restarts allowed before giving up.
pub const MAX_STAG: usize = 20;

/// False-convergence restarts allowed before declaring the tolerance
/// unreachable.
pub const MAX_RESTART: usize = 20;

/// Stagnation tolerance ratio: an update with
/// `||dx||/||x|| < tol * STAG_RATIO` counts as stagnation.
pub const STAG_RATIO: Real = 1e-4;
