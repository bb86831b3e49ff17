use crate::ast::{self, OpDef};
use crate::{
    AccessKind, BlockIdx, Callee, Id, LibCall, LibKind, Location, OpKind,
    ProcIdx, Program, ProgramBuilder,
};
use lipton_utils::{Error, LiptonResult};
use std::collections::HashMap;

/// Lower a [ast::ProgramDef] into a validated [Program].
pub fn ast_to_ir(def: ast::ProgramDef) -> LiptonResult<Program> {
    let mut builder = ProgramBuilder::new().entrypoint(&def.main);

    // Declare every procedure first so that calls can be resolved in any
    // order.
    let mut procs: HashMap<Id, ProcIdx> = HashMap::new();
    for pd in &def.procedures {
        let name = Id::new(&pd.name);
        if procs.insert(name, builder.add_proc(name)).is_some() {
            return Err(Error::malformed_program(format!(
                "procedure `{name}` is defined more than once"
            )));
        }
    }

    for pd in &def.procedures {
        let proc = procs[&Id::new(&pd.name)];
        if pd.blocks.is_empty() {
            return Err(Error::malformed_program(format!(
                "procedure `{}` has no blocks",
                pd.name
            )));
        }
        let mut blocks: HashMap<Id, BlockIdx> = HashMap::new();
        for bd in &pd.blocks {
            let name = Id::new(&bd.name);
            if blocks.insert(name, builder.add_block(proc, name)).is_some() {
                return Err(Error::malformed_program(format!(
                    "block `{}.{name}` is defined more than once",
                    pd.name
                )));
            }
        }
        for bd in &pd.blocks {
            let block = blocks[&Id::new(&bd.name)];
            for od in &bd.ops {
                let kind = op_kind(od, &procs)?;
                builder.push(block, kind);
            }
            if bd.succs.is_empty() {
                builder.ret(block);
            } else {
                let succs = bd
                    .succs
                    .iter()
                    .map(|s| {
                        blocks.get(&Id::new(s)).copied().ok_or_else(|| {
                            Error::malformed_program(format!(
                                "block `{}.{}` branches to unknown block `{s}`",
                                pd.name, bd.name
                            ))
                        })
                    })
                    .collect::<LiptonResult<Vec<_>>>()?;
                builder.branch(block, &succs);
            }
        }
    }

    builder.finish()
}

fn location(loc: &Option<String>) -> Location {
    match loc {
        Some(name) => Location::named(name),
        None => Location::Unknown,
    }
}

fn op_kind(
    od: &OpDef,
    procs: &HashMap<Id, ProcIdx>,
) -> LiptonResult<OpKind> {
    let memory = |access, loc| OpKind::Memory {
        access,
        loc: location(loc),
    };
    Ok(match od {
        OpDef::Read { loc } => memory(AccessKind::Read, loc),
        OpDef::Write { loc } => memory(AccessKind::Write, loc),
        OpDef::Update { loc } => memory(AccessKind::ReadWrite, loc),
        OpDef::AtomicUpdate { loc } => memory(AccessKind::AtomicUpdate, loc),
        OpDef::Local => OpKind::Local,
        OpDef::Debug => OpKind::Debug,
        OpDef::Call { callee, arg } => {
            let name = Id::new(callee);
            if let Some(p) = procs.get(&name) {
                OpKind::Call(Callee::Procedure(*p))
            } else {
                OpKind::Call(Callee::Library(lib_call(name, arg, procs)?))
            }
        }
    })
}

/// Classify a body-less callee and resolve its argument.
fn lib_call(
    name: Id,
    arg: &Option<String>,
    procs: &HashMap<Id, ProcIdx>,
) -> LiptonResult<LibCall> {
    let Some(kind) = LibKind::from_name(name.as_str()) else {
        return Ok(LibCall::Unknown(name));
    };
    let loc = location(arg);
    Ok(match kind {
        LibKind::Yield => LibCall::Yield,
        LibKind::ThreadCreate => {
            let target = arg
                .as_ref()
                .and_then(|a| procs.get(&Id::new(a)))
                .ok_or_else(|| {
                    Error::malformed_program(format!(
                        "`{name}` must name a procedure of the program, found {arg:?}"
                    ))
                })?;
            LibCall::ThreadCreate(*target)
        }
        LibKind::ThreadJoin => LibCall::ThreadJoin,
        LibKind::MutexLock => LibCall::MutexLock(loc),
        LibKind::MutexUnlock => LibCall::MutexUnlock(loc),
        LibKind::ReadLock => LibCall::ReadLock(loc),
        LibKind::WriteLock => LibCall::WriteLock(loc),
        LibKind::RwUnlock => LibCall::RwUnlock(loc),
        LibKind::MutexInit => LibCall::MutexInit(loc),
        LibKind::AtomicBegin => LibCall::AtomicBegin,
        LibKind::AtomicEnd => LibCall::AtomicEnd,
        LibKind::Assert => LibCall::Assert,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ProgramDef;

    const TWO_THREADS: &str = r#"{
        "procedures": [
          { "name": "main",
            "blocks": [
              { "name": "entry",
                "ops": [ { "op": "call", "callee": "pthread_create", "arg": "worker" },
                         { "op": "call", "callee": "pthread_mutex_lock", "arg": "m" },
                         { "op": "update", "loc": "x" },
                         { "op": "call", "callee": "pthread_mutex_unlock", "arg": "m" },
                         { "op": "call", "callee": "printf" } ],
                "succs": ["exit"] },
              { "name": "exit" } ] },
          { "name": "worker",
            "blocks": [ { "name": "entry", "ops": [ { "op": "read" } ] } ] }
        ]
    }"#;

    #[test]
    fn lowers_library_calls() {
        let def = ProgramDef::from_json(TWO_THREADS).unwrap();
        let prog = ast_to_ir(def).unwrap();
        let main = prog.main().unwrap();
        let worker = prog.find_proc("worker").unwrap();
        let entry = &prog.blocks[prog.procs[main].entry];
        let kinds: Vec<_> =
            entry.ops.iter().map(|op| prog.ops[*op].kind.clone()).collect();
        assert_eq!(
            kinds[0],
            OpKind::Call(Callee::Library(LibCall::ThreadCreate(worker)))
        );
        assert_eq!(
            kinds[1],
            OpKind::Call(Callee::Library(LibCall::MutexLock(
                Location::named("m")
            )))
        );
        assert_eq!(
            kinds[4],
            OpKind::Call(Callee::Library(LibCall::Unknown(Id::new("printf"))))
        );
        // Implicit terminators.
        assert_eq!(entry.ops.len(), 6);
        let w = prog.entry_op(worker);
        assert_eq!(
            prog.ops[w].kind,
            OpKind::Memory {
                access: AccessKind::Read,
                loc: Location::Unknown
            }
        );
    }

    #[test]
    fn unknown_successor() {
        let def = ProgramDef::from_json(
            r#"{ "procedures": [ { "name": "main", "blocks": [
                 { "name": "entry", "succs": ["nowhere"] } ] } ] }"#,
        )
        .unwrap();
        assert!(ast_to_ir(def).is_err());
    }

    #[test]
    fn thread_create_needs_a_procedure() {
        let def = ProgramDef::from_json(
            r#"{ "procedures": [ { "name": "main", "blocks": [
                 { "name": "entry", "ops": [
                   { "op": "call", "callee": "pthread_create", "arg": "nope" } ] } ] } ] }"#,
        )
        .unwrap();
        assert!(ast_to_ir(def).is_err());
    }
}
