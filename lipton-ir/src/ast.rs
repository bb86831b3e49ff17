//! The JSON program description.
//!
//! ```json
//! {
//!   "procedures": [{
//!     "name": "main",
//!     "blocks": [
//!       { "name": "entry",
//!         "ops": [ { "op": "call", "callee": "pthread_create", "arg": "worker" },
//!                  { "op": "update", "loc": "x" } ],
//!         "succs": ["exit"] },
//!       { "name": "exit", "ops": [] }
//!     ]
//!   }]
//! }
//! ```
//!
//! Blocks list their body only. The terminator is implied: a block with
//! successors ends in a branch, a block without successors returns.
use serde::{Deserialize, Serialize};

fn default_main() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramDef {
    /// Procedure started as thread 0.
    #[serde(default = "default_main")]
    pub main: String,
    pub procedures: Vec<ProcDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcDef {
    pub name: String,
    /// The first block is the entry block.
    pub blocks: Vec<BlockDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDef {
    pub name: String,
    #[serde(default)]
    pub ops: Vec<OpDef>,
    #[serde(default)]
    pub succs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpDef {
    /// A missing location means the location is not known statically.
    Read { loc: Option<String> },
    Write { loc: Option<String> },
    Update { loc: Option<String> },
    AtomicUpdate { loc: Option<String> },
    Local,
    Debug,
    /// Call to a procedure of the program or to a library function. `arg`
    /// names the lock object of lock-family calls and the started procedure
    /// of thread creations.
    Call {
        callee: String,
        #[serde(default)]
        arg: Option<String>,
    },
}

impl ProgramDef {
    pub fn from_json(input: &str) -> serde_json::Result<Self> {
        serde_json::from_str(input)
    }
}
