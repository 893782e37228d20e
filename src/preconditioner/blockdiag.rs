//! Block-diagonal preconditioner for block-structured systems: each
//! diagonal block gets its own component preconditioner applied to its
//! slice of the residual. The Stokes-style setup pairs an AMG hierarchy
//! on the elliptic block with a mass-matrix diagonal on the pressure
//! block.

use super::Preconditioner;
use crate::{Real, SolverError};

pub struct BlockDiagPc {
    /// Scalar offsets of the diagonal blocks, `components + 1` entries.
    pub offsets: Vec<usize>,
    pub components: Vec<Box<dyn Preconditioner>>,
}

impl BlockDiagPc {
    pub fn new(offsets: Vec<usize>, components: Vec<Box<dyn Preconditioner>>) -> Self {
        assert_eq!(offsets.len(), components.len() + 1, "one offset pair per component");
        debug_assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        Self { offsets, components }
    }
}

impl Preconditioner for BlockDiagPc {
    fn apply(&mut self, r: &[Real], z: &mut [Real]) -> Result<(), SolverError> {
        assert_eq!(r.len(), *self.offsets.last().unwrap());
        for (k, pc) in self.components.iter_mut().enumerate() {
            let lo = self.offsets[k];
            let hi = self.offsets[k + 1];
            pc.apply(&r[lo..hi], &mut z[lo..hi])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CsrMatrix;
    use crate::preconditioner::{DiagPc, IdentityPc};

    #[test]
    fn components_act_on_their_slices() {
        let a = CsrMatrix::from_coo(2, 2, &[(0, 0, 2.0), (1, 1, 4.0)]);
        let mut pc = BlockDiagPc::new(
            vec![0, 2, 4],
            vec![Box::new(DiagPc::new(&a)), Box::new(IdentityPc)],
        );
        let r = vec![2.0, 4.0, 5.0, 6.0];
        let mut z = vec![0.0; 4];
        pc.apply(&r, &mut z).unwrap();
        assert_eq!(z, vec![1.0, 1.0, 5.0, 6.0]);
    }
}
