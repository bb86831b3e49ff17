//! # Lipton
//!
//! This crate plumbs together the Lipton crates and provides the command-line
//! interface. Depend on [`lipton_ir`] and [`lipton_opt`] instead if you want
//! to drive the analyses from your own code.
pub mod cmdline;
pub mod driver;
