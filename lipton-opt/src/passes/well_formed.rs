use crate::analysis::CallGraph;
use crate::traversal::Named;
use lipton_ir::{Program, validate};
use lipton_utils::LiptonResult;

/// Structural checks run before any analysis.
pub struct WellFormed;

impl Named for WellFormed {
    fn name() -> &'static str {
        "well-formed"
    }

    fn description() -> &'static str {
        "check that the program is well-formed and has an entrypoint"
    }
}

impl WellFormed {
    /// Fails on malformed programs and missing entrypoints. Procedures that
    /// neither the entrypoint nor any thread can reach are only reported.
    pub fn check(program: &Program) -> LiptonResult<()> {
        validate(program)?;
        let main = program.main()?;
        let live = CallGraph::from(program).reachable_from(main);
        for (idx, proc) in program.procs.iter() {
            if !live.contains(&idx) {
                log::warn!("procedure `{}` is never executed", proc.name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lipton_ir::ProgramBuilder;
    use lipton_utils::ErrorKind;

    #[test]
    fn missing_entrypoint() {
        let mut b = ProgramBuilder::new();
        let p = b.add_proc("worker");
        let entry = b.add_block(p, "entry");
        b.ret(entry);
        let program = b.finish().unwrap();
        let err = WellFormed::check(&program).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingMain));
    }

    #[test]
    fn unreachable_procedures_are_allowed() {
        let mut b = ProgramBuilder::new();
        for name in ["main", "dead"] {
            let p = b.add_proc(name);
            let entry = b.add_block(p, "entry");
            b.ret(entry);
        }
        let program = b.finish().unwrap();
        WellFormed::check(&program).unwrap();
    }
}
