//! Diagonal (Jacobi) preconditioners: scalar for CSR, blockwise for BSR
//! and structured matrices.

use super::Preconditioner;
use crate::matrix::{smat, BsrMatrix, CsrMatrix, StrMatrix};
use crate::smoother::csr::guarded_inv_diag;
use crate::{Real, SolverError};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// `z = D^-1 r` with the scalar diagonal of a CSR matrix.
pub struct DiagPc {
    inv_diag: Vec<Real>,
}

impl DiagPc {
    pub fn new(a: &CsrMatrix) -> Self {
        Self { inv_diag: guarded_inv_diag(a) }
    }
}

impl Preconditioner for DiagPc {
    fn apply(&mut self, r: &[Real], z: &mut [Real]) -> Result<(), SolverError> {
        assert_eq!(r.len(), self.inv_diag.len());
        #[cfg(feature = "parallel")]
        {
            z.par_iter_mut()
                .zip(r.par_iter())
                .zip(self.inv_diag.par_iter())
                .for_each(|((zi, &ri), &di)| *zi = di * ri);
        }
        #[cfg(not(feature = "parallel"))]
        for i in 0..r.len() {
            z[i] = self.inv_diag[i] * r[i];
        }
        Ok(())
    }
}

/// Blockwise diagonal preconditioner for BSR: every diagonal tile is
/// inverted once at setup, the apply is one tile-vector product per block
/// row. The tile kernels dispatch on `nb` internally.
pub struct BsrDiagPc {
    nb: usize,
    inv_blocks: Vec<Real>,
}

impl BsrDiagPc {
    pub fn new(a: &BsrMatrix) -> Self {
        let nb = a.nb;
        let nb2 = nb * nb;
        let mut inv_blocks = a.diagonal_blocks();
        for i in 0..a.nrowb {
            let _ = smat::inv(&mut inv_blocks[i * nb2..(i + 1) * nb2], nb);
        }
        Self { nb, inv_blocks }
    }
}

impl Preconditioner for BsrDiagPc {
    fn apply(&mut self, r: &[Real], z: &mut [Real]) -> Result<(), SolverError> {
        let nb = self.nb;
        let nb2 = nb * nb;
        let m = self.inv_blocks.len() / nb2;
        assert_eq!(r.len(), m * nb);
        for i in 0..m {
            smat::mxv(
                &self.inv_blocks[i * nb2..(i + 1) * nb2],
                &r[i * nb..(i + 1) * nb],
                &mut z[i * nb..(i + 1) * nb],
                nb,
            );
        }
        Ok(())
    }
}

/// Blockwise diagonal preconditioner for structured matrices (`nc` coupled
/// unknowns per grid node).
pub struct StrDiagPc {
    nc: usize,
    inv_blocks: Vec<Real>,
}

impl StrDiagPc {
    pub fn new(a: &StrMatrix) -> Self {
        Self { nc: a.nc, inv_blocks: crate::smoother::strsm::block_diag_inv(a) }
    }
}

impl Preconditioner for StrDiagPc {
    fn apply(&mut self, r: &[Real], z: &mut [Real]) -> Result<(), SolverError> {
        let nc = self.nc;
        if nc == 1 {
            for (i, zi) in z.iter_mut().enumerate() {
                *zi = self.inv_blocks[i] * r[i];
            }
        } else {
            let nc2 = nc * nc;
            let m = self.inv_blocks.len() / nc2;
            for i in 0..m {
                smat::mxv(
                    &self.inv_blocks[i * nc2..(i + 1) * nc2],
                    &r[i * nc..(i + 1) * nc],
                    &mut z[i * nc..(i + 1) * nc],
                    nc,
                );
            }
        }
        Ok(())
    }
}
