//! Command line parsing for the Lipton reduction tool.
use argh::FromArgs;
use lipton_opt::passes::Mode;
use lipton_utils::OutputFile;
use std::path::PathBuf;
use std::str::FromStr;

/// What to write to the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human readable instrumentation plan.
    #[default]
    Text,
    /// Instrumentation plan as JSON.
    Json,
    /// The program with every operation annotated by its area and the
    /// instrumentation spliced next to it.
    Program,
}

impl FromStr for Format {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            "program" => Ok(Format::Program),
            _ => Err(format!(
                "unknown format `{s}`, expected one of: text, json, program"
            )),
        }
    }
}

#[derive(FromArgs)]
#[argh(help_triggers("-h", "--help"))]
/// Lipton reduction of multi-threaded programs
pub struct Opts {
    /// input program in JSON
    #[argh(positional)]
    pub file: Option<PathBuf>,

    /// instrumentation mode: static or dynamic
    #[argh(option, short = 'm', default = "Mode::Static")]
    pub mode: Mode,

    /// output file, default is stdout
    #[argh(
        option,
        short = 'o',
        long = "output",
        default = "OutputFile::Stdout"
    )]
    pub output: OutputFile,

    /// output format: text, json or program
    #[argh(option, short = 'f', default = "Format::Text")]
    pub format: Format,

    /// procedure to start from instead of the one named in the input
    #[argh(option, short = 'e')]
    pub entrypoint: Option<String>,

    /// extra options passed to the passes, as `pass:opt` or `pass:opt=val`
    #[argh(option, short = 'x', long = "extra-opt")]
    pub extra_opts: Vec<String>,

    /// logging level
    #[argh(option, long = "log", default = "log::LevelFilter::Warn")]
    pub log_level: log::LevelFilter,

    /// list all passes and their options
    #[argh(switch, long = "list-passes")]
    pub list_passes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let opts = Opts::from_args(
            &["lipton"],
            &[
                "prog.json",
                "-m",
                "dynamic",
                "-f",
                "json",
                "-x",
                "liptonize:no-conflict-check",
                "--log",
                "info",
            ],
        )
        .unwrap();
        assert_eq!(opts.file, Some(PathBuf::from("prog.json")));
        assert_eq!(opts.mode, Mode::Dynamic);
        assert_eq!(opts.format, Format::Json);
        assert_eq!(opts.output, OutputFile::Stdout);
        assert_eq!(opts.extra_opts, vec!["liptonize:no-conflict-check"]);
        assert_eq!(opts.log_level, log::LevelFilter::Info);
        assert!(!opts.list_passes);
    }

    #[test]
    fn rejects_unknown_formats() {
        assert!("dot".parse::<Format>().is_err());
        assert!(
            Opts::from_args(&["lipton"], &["prog.json", "-m", "eager"]).is_err()
        );
    }
}
