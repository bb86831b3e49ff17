//! Passes over a [Program](lipton_ir::Program) and its analyses.
mod collect;
mod instrument;
mod liptonize;
mod well_formed;

pub use collect::{Collect, Collected};
pub use instrument::{
    Action, ConflictCheck, Instrument, Instrumentation, InstrumentationPlan,
    Phase, ThreadPlan,
};
pub use liptonize::{
    BlockKind, BlockStart, BlockStarts, Filed, Liptonize, LiptonizeResult, Mode,
    Placement,
};
pub use well_formed::WellFormed;
