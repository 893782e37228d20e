//! Relaxation smoothers for the multigrid cycle and for stand-alone use.

use bitflags::bitflags;

pub mod csr;
pub mod strsm;

bitflags! {
    /// Sweep directions a relaxation pass may combine.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct SweepFlags: u32 {
        const FORWARD  = 0b01;
        const BACKWARD = 0b10;
        const SYMMETRIC = Self::FORWARD.bits() | Self::BACKWARD.bits();
    }
}

/// Which class a C/F-ordered sweep visits first.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CfFirst {
    CThenF,
    FThenC,
}

/// Traversal order of a Gauss-Seidel or SOR sweep.
///
/// `Ascend`, `Descend` and `User` are sequential by contract. The C/F
/// variant may run within one class in parallel only if the caller
/// guarantees no intra-class write conflicts.
#[derive(Copy, Clone, Debug)]
pub enum SweepOrder<'a> {
    Ascend,
    Descend,
    /// User-supplied permutation of `0..n`.
    User(&'a [crate::Int]),
    /// C/F marker (`1` = coarse, `0` = fine) and which class goes first.
    Cf(&'a [crate::Int], CfFirst),
}
