pub mod params;

pub use params::{
    AmgCycleKind, AmgParam, CoarseSolverKind, CoarseningKind, IluKind, IluParam, ItsParam,
    PrintLevel, SmootherKind,
};
