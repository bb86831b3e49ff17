//! Driver for the Lipton reduction tool.
use crate::cmdline::{Format, Opts};
use lipton_ir::{Printer, Program, ast, from_ast};
use lipton_opt::pipeline::{self, Reduction};
use lipton_utils::{Error, LiptonResult};
use itertools::Itertools;
use std::io::Write;
use std::path::Path;

/// Read a JSON program from `path` and lower it.
pub fn load_program(
    path: &Path,
    entrypoint: Option<&str>,
    extra_opts: Vec<String>,
) -> LiptonResult<Program> {
    let input = std::fs::read_to_string(path).map_err(|e| {
        Error::invalid_file(format!("failed to read {}: {e}", path.display()))
    })?;
    let mut def = ast::ProgramDef::from_json(&input)
        .map_err(|e| Error::invalid_file(format!("{}: {e}", path.display())))?;
    if let Some(main) = entrypoint {
        def.main = main.to_string();
    }
    let mut program = from_ast::ast_to_ir(def)?;
    program.extra_opts = extra_opts;
    Ok(program)
}

/// Print the program with the area of every operation and the actions
/// planned around it.
pub fn write_annotated<F: Write>(
    program: &Program,
    red: &Reduction,
    f: &mut F,
) -> LiptonResult<()> {
    let actions = red
        .plan
        .threads
        .iter()
        .flat_map(|t| t.actions.iter())
        .into_group_map_by(|a| a.op);
    Printer::write_annotated(
        program,
        |op| {
            let area = red.result.area(op)?;
            let mut note = area.to_string();
            for action in actions.get(&op).into_iter().flatten() {
                note.push_str(&format!(" | {} {}", action.placement, action.action));
            }
            Some(note)
        },
        f,
    )?;
    Ok(())
}

/// Run the tool from the command line.
pub fn run_lipton() -> LiptonResult<()> {
    let opts: Opts = argh::from_env();

    // enable tracing
    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(opts.log_level)
        .target(env_logger::Target::Stderr)
        .init();

    // list all the available pass options when flag --list-passes is enabled
    if opts.list_passes {
        print!("{}", pipeline::complete_help());
        return Ok(());
    }

    let Some(file) = &opts.file else {
        return Err(Error::misc("no input file given, see --help"));
    };
    let program =
        load_program(file, opts.entrypoint.as_deref(), opts.extra_opts.clone())?;
    let red = pipeline::run(&program, opts.mode)?;

    let out = &mut opts.output.get_write()?;
    match opts.format {
        Format::Text => red.plan.write_text(out)?,
        Format::Json => red.plan.write_json(out)?,
        Format::Program => write_annotated(&program, &red, out)?,
    }
    out.flush()?;
    Ok(())
}
