use crate::{BlockIdx, Id, ProcIdx};

/// One static program action.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Block that owns this operation.
    pub block: BlockIdx,
    /// Ordinal position of the operation in its block.
    pub position: u32,
    pub kind: OpKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    /// Access to (possibly shared) memory.
    Memory { access: AccessKind, loc: Location },
    /// A call to a procedure or a library function.
    Call(Callee),
    /// Pure computation on thread-local values.
    Local,
    /// Debug-only operation, ignored by every analysis.
    Debug,
    /// The last operation of every block.
    Terminator(Terminator),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    ReadWrite,
    /// Atomic increment/decrement style update. Two such updates commute even
    /// when they touch the same location.
    AtomicUpdate,
}

/// Storage touched by a memory operation or identifying a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    Named(Id),
    /// The location could not be determined statically.
    Unknown,
}

impl Location {
    pub fn named<S: AsRef<str>>(name: S) -> Self {
        Location::Named(Id::new(name))
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Named(name) => write!(f, "{name}"),
            Location::Unknown => write!(f, "?"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// Transfer control to one of the block's successors.
    Branch,
    /// Return from the enclosing procedure.
    Return,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    /// A procedure with a body in the program.
    Procedure(ProcIdx),
    /// A body-less procedure, classified by name.
    Library(LibCall),
}

/// Library calls recognized by the analysis. Lock-family calls carry the
/// location of the lock object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibCall {
    Yield,
    ThreadCreate(ProcIdx),
    ThreadJoin,
    MutexLock(Location),
    MutexUnlock(Location),
    ReadLock(Location),
    WriteLock(Location),
    RwUnlock(Location),
    MutexInit(Location),
    AtomicBegin,
    AtomicEnd,
    Assert,
    /// Any other body-less callee.
    Unknown(Id),
}

/// The name-level classification of a library call, before its arguments are
/// resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibKind {
    Yield,
    ThreadCreate,
    ThreadJoin,
    MutexLock,
    MutexUnlock,
    ReadLock,
    WriteLock,
    RwUnlock,
    MutexInit,
    AtomicBegin,
    AtomicEnd,
    Assert,
}

const RECOGNIZED: &[(&str, LibKind)] = &[
    ("pthread_yield", LibKind::Yield),
    ("sched_yield", LibKind::Yield),
    ("thrd_yield", LibKind::Yield),
    ("pthread_create", LibKind::ThreadCreate),
    ("thrd_create", LibKind::ThreadCreate),
    ("pthread_join", LibKind::ThreadJoin),
    ("thrd_join", LibKind::ThreadJoin),
    ("pthread_mutex_lock", LibKind::MutexLock),
    ("mtx_lock", LibKind::MutexLock),
    ("pthread_mutex_unlock", LibKind::MutexUnlock),
    ("mtx_unlock", LibKind::MutexUnlock),
    ("pthread_rwlock_rdlock", LibKind::ReadLock),
    ("pthread_rwlock_wrlock", LibKind::WriteLock),
    ("pthread_rwlock_unlock", LibKind::RwUnlock),
    ("pthread_mutex_init", LibKind::MutexInit),
    ("pthread_rwlock_init", LibKind::MutexInit),
    ("mtx_init", LibKind::MutexInit),
    ("__VERIFIER_atomic_begin", LibKind::AtomicBegin),
    ("__VERIFIER_atomic_end", LibKind::AtomicEnd),
    ("__VERIFIER_assert", LibKind::Assert),
    ("__assert_fail", LibKind::Assert),
    ("assert", LibKind::Assert),
];

impl LibKind {
    /// Classify a body-less callee by its name.
    pub fn from_name(name: &str) -> Option<LibKind> {
        RECOGNIZED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, kind)| *kind)
    }

    /// Canonical name used when printing calls of this kind.
    pub fn canonical_name(&self) -> &'static str {
        RECOGNIZED
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(n, _)| *n)
            .unwrap_or_else(|| unreachable!("every kind has a name"))
    }
}

impl LibCall {
    pub fn kind(&self) -> Option<LibKind> {
        Some(match self {
            LibCall::Yield => LibKind::Yield,
            LibCall::ThreadCreate(_) => LibKind::ThreadCreate,
            LibCall::ThreadJoin => LibKind::ThreadJoin,
            LibCall::MutexLock(_) => LibKind::MutexLock,
            LibCall::MutexUnlock(_) => LibKind::MutexUnlock,
            LibCall::ReadLock(_) => LibKind::ReadLock,
            LibCall::WriteLock(_) => LibKind::WriteLock,
            LibCall::RwUnlock(_) => LibKind::RwUnlock,
            LibCall::MutexInit(_) => LibKind::MutexInit,
            LibCall::AtomicBegin => LibKind::AtomicBegin,
            LibCall::AtomicEnd => LibKind::AtomicEnd,
            LibCall::Assert => LibKind::Assert,
            LibCall::Unknown(_) => return None,
        })
    }
}

impl Operation {
    /// Does this operation touch memory?
    pub fn is_memory(&self) -> bool {
        matches!(self.kind, OpKind::Memory { .. })
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self.kind, OpKind::Terminator(_))
    }

    /// Procedure entered by this operation: the callee of a call or the
    /// target of a thread creation.
    pub fn call_edge(&self) -> Option<ProcIdx> {
        match &self.kind {
            OpKind::Call(Callee::Procedure(p))
            | OpKind::Call(Callee::Library(LibCall::ThreadCreate(p))) => {
                Some(*p)
            }
            _ => None,
        }
    }

    /// Callee if this is a call to a procedure with a body.
    pub fn callee(&self) -> Option<ProcIdx> {
        match &self.kind {
            OpKind::Call(Callee::Procedure(p)) => Some(*p),
            _ => None,
        }
    }

    pub fn lib_call(&self) -> Option<&LibCall> {
        match &self.kind {
            OpKind::Call(Callee::Library(lc)) => Some(lc),
            _ => None,
        }
    }
}
