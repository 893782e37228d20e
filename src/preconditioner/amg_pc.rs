//! AMG-cycle preconditioner: a fixed number of multilevel cycles against
//! the residual, starting from zero.

use super::Preconditioner;
use crate::amg::AmgHierarchy;
use crate::config::AmgParam;
use crate::matrix::CsrMatrix;
use crate::{Real, SolverError};

pub struct AmgPc {
    pub hierarchy: AmgHierarchy,
    /// Cycles per apply; one is the usual choice.
    pub maxit_inner: usize,
}

impl AmgPc {
    /// Run the AMG setup for `A` and wrap the hierarchy as a
    /// preconditioner.
    pub fn new(a: &CsrMatrix, param: &AmgParam) -> Result<Self, SolverError> {
        Ok(Self { hierarchy: AmgHierarchy::setup(a, param)?, maxit_inner: 1 })
    }

    pub fn from_hierarchy(hierarchy: AmgHierarchy, maxit_inner: usize) -> Self {
        Self { hierarchy, maxit_inner: maxit_inner.max(1) }
    }
}

impl Preconditioner for AmgPc {
    fn apply(&mut self, r: &[Real], z: &mut [Real]) -> Result<(), SolverError> {
        self.hierarchy.apply_correction(r, z, self.maxit_inner)
    }
}
