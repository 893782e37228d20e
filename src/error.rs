use thiserror::Error;

// Unified error taxonomy for amgsolve. Success is an `Ok(SolveStats)` with
// `iterations >= 0`; everything here is a terminal failure of the current
// operation.

#[derive(Error, Debug)]
pub enum SolverError {
    /// The iterate stopped moving before reaching the tolerance.
    #[error("solver stagnated after {restarts} restarts ({iterations} iterations, relres {relres:.3e})")]
    Stagnation {
        iterations: usize,
        restarts: usize,
        relres: f64,
    },

    /// `||x||_inf` fell below the zero-solution tolerance while the
    /// residual did not.
    #[error("solution norm dropped below tolerance after {iterations} iterations")]
    SolutionStagnation { iterations: usize },

    /// Repeated false convergence: the requested tolerance cannot be
    /// reached in floating point.
    #[error("tolerance {tol:.3e} unreachable after {restarts} restarts ({iterations} iterations)")]
    ToleranceTooSmall {
        iterations: usize,
        restarts: usize,
        tol: f64,
    },

    /// Iteration budget exhausted without convergence.
    #[error("no convergence within {maxit} iterations (relres {relres:.3e})")]
    MaxIterations { maxit: usize, relres: f64 },

    /// Numerical breakdown: a denominator below the divide-by-small guard,
    /// or a NaN in the iterate.
    #[error("numerical breakdown: {0}")]
    Breakdown(&'static str),

    /// Unknown solver kind, stopping type or smoother selection.
    #[error("unknown method or stopping type: {0}")]
    UnknownType(&'static str),

    /// Coarsening produced no strong connections or no new coarse points
    /// on the finest level.
    #[error("coarsening failed: {0}")]
    CoarseningFailed(&'static str),

    /// A dense (sub)system was singular beyond the pivot guard.
    #[error("singular pivot in dense factorization at index {0}")]
    Singular(usize),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed matrix or vector file.
    #[error("parse error: {0}")]
    Parse(String),
}
