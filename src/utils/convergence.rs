//! Stopping criteria, residual bookkeeping and the per-iteration trace.

use crate::config::PrintLevel;
use crate::consts::SMALL_REAL;
use crate::Real;

/// How the relative residual is measured.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum StopType {
    /// `||r|| / max(eps, ||r0||)`.
    #[default]
    RelRes,
    /// `sqrt(|<r, M r>|) / max(eps, sqrt(|<r0, M r0>|))`.
    RelPrecRes,
    /// `||r|| / max(eps, ||x||)`.
    ModRelRes,
}

/// Outcome of a driver run.
#[derive(Clone, Debug, PartialEq)]
pub struct SolveStats {
    /// Iterations used.
    pub iterations: usize,
    /// Final absolute residual norm (per the stop type in effect).
    pub final_residual: Real,
    /// Final relative residual.
    pub relres: Real,
    pub converged: bool,
}

impl SolveStats {
    pub fn new(iterations: usize, final_residual: Real, relres: Real, converged: bool) -> Self {
        Self { iterations, final_residual, relres, converged }
    }
}

/// Guard a relative-residual denominator against zero.
#[inline]
pub fn guard(den: Real) -> Real {
    den.max(SMALL_REAL)
}

/// One trace line per iteration, at most one summary line per termination
/// (the library never prints; consumers configure a `log` backend).
pub fn print_itinfo(
    print: PrintLevel,
    stop: StopType,
    iter: usize,
    relres: Real,
    absres: Real,
    factor: Real,
) {
    if print >= PrintLevel::Some {
        let label = match stop {
            StopType::RelRes => "||r||/||r0||",
            StopType::RelPrecRes => "||r||_M/||r0||_M",
            StopType::ModRelRes => "||r||/||x||",
        };
        log::debug!("it {iter:5}  {label} = {relres:.6e}  ||r|| = {absres:.6e}  conv. factor = {factor:.4}");
    }
}

/// The single human-readable summary line per termination event.
pub fn print_final(print: PrintLevel, method: &str, iter: usize, relres: Real, reason: &str) {
    if print > PrintLevel::None {
        log::info!("{method}: iter = {iter}, relres = {relres:.6e}, {reason}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_keeps_positive_denominators() {
        assert_eq!(guard(2.0), 2.0);
        assert!(guard(0.0) > 0.0);
    }
}
