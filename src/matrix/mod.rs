//! Sparse matrix formats: CSR, block-sparse (BSR), structured-grid (STR),
//! plus the small dense tile kernels they share.

pub mod blockcsr;
pub mod bsr;
pub mod csr;
pub mod smat;
pub mod strmat;

pub use blockcsr::BlockCsrMatrix;
pub use bsr::BsrMatrix;
pub use csr::CsrMatrix;
pub use strmat::StrMatrix;
