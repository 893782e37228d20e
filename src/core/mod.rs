pub mod traits;

pub use traits::{Indexing, MatTransVec, MatVec};
