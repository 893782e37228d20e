pub mod convergence;
pub mod partition;
