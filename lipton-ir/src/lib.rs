//! Program model consumed by the Lipton reduction analyses.
//!
//! A [Program] is a set of [Procedure]s. Each procedure owns a list of
//! [Block]s, and each block owns a straight-line sequence of [Operation]s
//! whose last element is the block's terminator. Everything is stored in
//! dense [IndexedMap](lipton_idx::maps::IndexedMap)s on the program and
//! referred to through the typed indices [ProcIdx], [BlockIdx] and [OpIdx].
//!
//! Programs are either assembled with a [ProgramBuilder] or lowered from the
//! JSON description in [ast] by [from_ast::ast_to_ir].

mod builder;
mod common;
mod operation;
mod printer;
mod program;
mod structure;

/// Serializable description of a program.
pub mod ast;
/// Lowering of [ast] programs into the IR.
pub mod from_ast;

pub use builder::{ProgramBuilder, validate};
pub use common::{BlockIdx, OpIdx, ProcIdx};
pub use lipton_utils::{GetName, Id};
pub use operation::{
    AccessKind, Callee, LibCall, LibKind, Location, OpKind, Operation,
    Terminator,
};
pub use printer::Printer;
pub use program::Program;
pub use structure::{Block, Procedure};
