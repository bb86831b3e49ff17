//! Lipton reduction of multi-threaded programs.
//!
//! [pipeline::Analysis] computes the whole-program oracles, the
//! [passes::Liptonize] pass tracks the commit phase of every thread and
//! [passes::Instrument] turns its block-start requests into a plan of yields
//! and phase updates.
pub mod analysis;
pub mod passes;
pub mod pipeline;
pub mod traversal;
