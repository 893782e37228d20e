//! Preconditioners for the Krylov drivers.

use crate::core::traits::MatVec;
use crate::matrix::CsrMatrix;
use crate::{Real, SolverError};

pub mod amg_pc;
pub mod blockdiag;
pub mod diagonal;
pub mod ilu;
pub mod schwarz;

pub use amg_pc::AmgPc;
pub use blockdiag::BlockDiagPc;
pub use diagonal::{BsrDiagPc, DiagPc, StrDiagPc};
pub use ilu::{IluData, IluPc};
pub use schwarz::SchwarzPc;

/// A preconditioner `M` approximating `A^-1`: given a residual `r`,
/// produce `z ~ A^-1 r`.
///
/// `apply` takes `&mut self` because some variants (the AMG cycle in
/// particular) own per-level work vectors they mutate during an apply;
/// that also rules out concurrent cycle calls on one hierarchy at compile
/// time. Drivers that need an unchanging preconditioner simply never
/// observe the internal scratch.
pub trait Preconditioner {
    /// z = M^-1 r.
    fn apply(&mut self, r: &[Real], z: &mut [Real]) -> Result<(), SolverError>;
}

/// The do-nothing preconditioner: `z = r`.
pub struct IdentityPc;

impl Preconditioner for IdentityPc {
    fn apply(&mut self, r: &[Real], z: &mut [Real]) -> Result<(), SolverError> {
        z.copy_from_slice(r);
        Ok(())
    }
}

/// How a [`CompositePc`] combines its two components.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompositeMode {
    /// `z = M1 r + M2 r`.
    Additive,
    /// `z1 = M1 r`, then `z = z1 + M2 (r - A z1)`; one extra SpMV per
    /// apply.
    Multiplicative,
}

/// Two preconditioners combined additively or multiplicatively.
pub struct CompositePc {
    pub first: Box<dyn Preconditioner>,
    pub second: Box<dyn Preconditioner>,
    pub mode: CompositeMode,
    /// System matrix, needed for the residual update in multiplicative
    /// mode.
    a: CsrMatrix,
}

impl CompositePc {
    pub fn new(
        a: &CsrMatrix,
        first: Box<dyn Preconditioner>,
        second: Box<dyn Preconditioner>,
        mode: CompositeMode,
    ) -> Self {
        Self { first, second, mode, a: a.clone() }
    }
}

impl Preconditioner for CompositePc {
    fn apply(&mut self, r: &[Real], z: &mut [Real]) -> Result<(), SolverError> {
        let n = r.len();
        match self.mode {
            CompositeMode::Additive => {
                let mut z2 = vec![0.0; n];
                self.first.apply(r, z)?;
                self.second.apply(r, &mut z2)?;
                crate::blas::axpy(1.0, &z2, z);
            }
            CompositeMode::Multiplicative => {
                self.first.apply(r, z)?;
                let mut r2 = r.to_vec();
                self.a.aaxpy(-1.0, z, &mut r2);
                let mut z2 = vec![0.0; n];
                self.second.apply(&r2, &mut z2)?;
                crate::blas::axpy(1.0, &z2, z);
            }
        }
        Ok(())
    }
}
