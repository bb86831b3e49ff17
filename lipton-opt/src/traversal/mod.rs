//! Helpers for walking the control flow of threads and for configuring
//! passes.
mod construct;
mod point;
mod walk;

pub use construct::{ConstructPass, Named, ParseVal, PassOpt};
pub use point::{Area, Edge, Point};
pub use walk::{Processor, Step, Successors, first_point, walk};
