//! Errors generated by the analysis.
use crate::Id;
use itertools::Itertools;

/// Convenience wrapper to represent success or a meaningful analysis error.
pub type LiptonResult<T> = std::result::Result<T, Error>;

/// Errors generated by the analysis. Every error aborts the run: none of them
/// describe a situation the analysis can recover from.
pub struct Error {
    kind: Box<ErrorKind>,
    post_msg: Option<String>,
}

/// The category of an [Error].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Procedures that (transitively) call or spawn each other.
    Recursion(Vec<Id>),
    /// The program does not define the `main` procedure.
    MissingMain,
    /// An operation is reachable from more than one thread.
    DuplicateOwner {
        op: String,
        first: Id,
        second: Id,
    },
    /// An atomic-begin marker with a path that never reaches its atomic-end.
    UnmatchedAtomic(String),
    /// A quotient-graph link was issued out of post-order.
    OrderingViolation(String),
    /// The program model itself is ill-formed.
    MalformedProgram(String),
    /// The input could not be read or decoded.
    InvalidFile(String),
    /// Miscellaneous error message
    Misc(String),
}

impl Error {
    pub fn with_post_msg(mut self, msg: Option<String>) -> Self {
        self.post_msg = msg;
        self
    }

    fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
            post_msg: None,
        }
    }

    pub fn recursion(procs: Vec<Id>) -> Self {
        Self::new(ErrorKind::Recursion(procs))
    }
    pub fn missing_main() -> Self {
        Self::new(ErrorKind::MissingMain)
    }
    pub fn duplicate_owner<S: ToString>(op: S, first: Id, second: Id) -> Self {
        Self::new(ErrorKind::DuplicateOwner {
            op: op.to_string(),
            first,
            second,
        })
    }
    pub fn unmatched_atomic<S: ToString>(op: S) -> Self {
        Self::new(ErrorKind::UnmatchedAtomic(op.to_string()))
    }
    pub fn ordering<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::OrderingViolation(msg.to_string()))
    }
    pub fn malformed_program<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::MalformedProgram(msg.to_string()))
    }
    pub fn invalid_file<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::InvalidFile(msg.to_string()))
    }
    pub fn misc<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Misc(msg.to_string()))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use ErrorKind::*;
        match self {
            Recursion(procs) => {
                write!(
                    f,
                    "Precondition violation: recursion between procedures {}. Recursive programs are not supported.",
                    procs.iter().map(|p| format!("`{p}'")).join(", ")
                )
            }
            MissingMain => {
                write!(f, "Precondition violation: program has no `main' procedure")
            }
            DuplicateOwner { op, first, second } => {
                write!(
                    f,
                    "Precondition violation: operation {op} is reachable from thread `{first}' and thread `{second}'"
                )
            }
            UnmatchedAtomic(op) => {
                write!(
                    f,
                    "Precondition violation: atomic region started at {op} has a path without a matching atomic end"
                )
            }
            OrderingViolation(msg) => {
                write!(f, "Reachability ordering violation: {msg}")
            }
            MalformedProgram(msg) => write!(f, "Malformed program: {msg}"),
            InvalidFile(msg) => write!(f, "{msg}"),
            Misc(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(post) = &self.post_msg {
            write!(f, "\n{post}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for Error {}

// Conversions from other error types to our error type so that
// we can use `?` in all the places.
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::invalid_file(format!("IO Error: {e}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::invalid_file(format!("JSON Error: {e}"))
    }
}

impl From<std::fmt::Error> for Error {
    fn from(_: std::fmt::Error) -> Self {
        Error::misc("formatting error")
    }
}
