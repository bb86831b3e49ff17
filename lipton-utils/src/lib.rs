//! Shared utilities for the Lipton reduction tools.
mod errors;
mod id;
mod out_file;

pub use errors::{Error, ErrorKind, LiptonResult};
pub use id::{GSym, GetName, Id};
pub use out_file::OutputFile;
