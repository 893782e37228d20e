//! Algebraic multigrid: coarsening, interpolation, hierarchy setup and the
//! multilevel cycles.

pub mod coarsening;
pub mod cycle;
pub mod data;
pub mod interp;
pub mod setup;

pub use coarsening::{coarsen, CoarseningResult, CPT, FPT, ISPT};
pub use data::{AmgHierarchy, AmgLevel};
