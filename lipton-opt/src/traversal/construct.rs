use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use lipton_ir::Program;
use lipton_utils::OutputFile;

#[derive(Clone, Debug)]
/// The value returned from parsing an option.
pub enum ParseVal {
    /// A boolean option.
    Bool(bool),
    /// An output stream (stdout, stderr, file name)
    OutStream(OutputFile),
}

impl ParseVal {
    pub fn bool(&self) -> bool {
        let ParseVal::Bool(b) = self else {
            panic!("Expected bool, got {self}");
        };
        *b
    }

    /// Returns an output stream if it is not the null stream
    pub fn not_null_outstream(&self) -> Option<OutputFile> {
        match self {
            ParseVal::OutStream(OutputFile::Null) => None,
            ParseVal::OutStream(o) => Some(o.clone()),
            _ => panic!("Expected output stream, got {self}"),
        }
    }
}

impl std::fmt::Display for ParseVal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseVal::Bool(b) => write!(f, "{b}"),
            ParseVal::OutStream(o) => write!(f, "{o}"),
        }
    }
}

/// Option that can be passed to a pass with `-x pass:opt` or
/// `-x pass:opt=val`.
pub struct PassOpt {
    name: &'static str,
    description: &'static str,
    default: ParseVal,
    parse: fn(&str) -> Option<ParseVal>,
}

impl PassOpt {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        default: ParseVal,
        parse: fn(&str) -> Option<ParseVal>,
    ) -> Self {
        Self {
            name,
            description,
            default,
            parse,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn description(&self) -> &'static str {
        self.description
    }

    pub const fn default(&self) -> &ParseVal {
        &self.default
    }

    fn parse(&self, s: &str) -> Option<ParseVal> {
        (self.parse)(s)
    }

    pub fn parse_bool(s: &str) -> Option<ParseVal> {
        match s {
            "true" => Some(ParseVal::Bool(true)),
            "false" => Some(ParseVal::Bool(false)),
            _ => None,
        }
    }

    pub fn parse_outstream(s: &str) -> Option<ParseVal> {
        s.parse::<OutputFile>().ok().map(ParseVal::OutStream)
    }
}

/// Trait that describes named things: passes and their options.
pub trait Named {
    /// The name of a pass. Is used for identifying passes.
    fn name() -> &'static str;
    /// A short description of the pass.
    fn description() -> &'static str;
    /// Set of options that can be passed to the pass.
    fn opts() -> Vec<PassOpt> {
        vec![]
    }
}

/// Reads the options of a [Named] pass out of the program's extra options.
pub trait ConstructPass: Named {
    fn get_opts(program: &Program) -> LinkedHashMap<&'static str, ParseVal> {
        let opts = Self::opts();
        let n = Self::name();
        let mut values: LinkedHashMap<&'static str, ParseVal> = program
            .extra_opts
            .iter()
            .filter_map(|opt| {
                // The format is either -x pass:opt or -x pass:opt=val
                let mut splits = opt.split(':');
                if splits.next()? != n {
                    return None;
                }
                let mut splits = splits.next()?.split('=');
                let opt = splits.next()?;
                let Some(opt) = opts.iter().find(|o| o.name == opt) else {
                    log::warn!("Ignoring unknown option for pass `{n}`: {opt}");
                    return None;
                };
                let val = match splits.next() {
                    Some(v) => {
                        let Some(v) = opt.parse(v) else {
                            log::warn!(
                                "Ignoring invalid value for option `{n}:{}`: {v}",
                                opt.name(),
                            );
                            return None;
                        };
                        v
                    }
                    None => ParseVal::Bool(true),
                };
                Some((opt.name(), val))
            })
            .collect();

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "Extra options for {}: {}",
                Self::name(),
                values.iter().map(|(o, v)| format!("{o}->{v}")).join(", ")
            );
        }

        // For all options that were not provided with values, fill in the defaults.
        for opt in opts {
            if !values.contains_key(opt.name()) {
                values.insert(opt.name(), opt.default.clone());
            }
        }

        values
    }
}

impl<T: Named> ConstructPass for T {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;
    impl Named for Dummy {
        fn name() -> &'static str {
            "dummy"
        }
        fn description() -> &'static str {
            "does nothing"
        }
        fn opts() -> Vec<PassOpt> {
            vec![
                PassOpt::new(
                    "flag",
                    "a flag",
                    ParseVal::Bool(false),
                    PassOpt::parse_bool,
                ),
                PassOpt::new(
                    "dump",
                    "where to dump",
                    ParseVal::OutStream(OutputFile::Null),
                    PassOpt::parse_outstream,
                ),
            ]
        }
    }

    #[test]
    fn parses_flags_and_values() {
        let program = Program {
            extra_opts: vec![
                "dummy:flag".to_string(),
                "dummy:dump=<err>".to_string(),
                "other:flag=false".to_string(),
                "dummy:bogus".to_string(),
            ],
            ..Program::default()
        };
        let opts = Dummy::get_opts(&program);
        assert!(opts["flag"].bool());
        assert_eq!(opts["dump"].not_null_outstream(), Some(OutputFile::Stderr));
        assert_eq!(opts.len(), 2);
    }

    #[test]
    fn defaults_fill_in() {
        let opts = Dummy::get_opts(&Program::default());
        assert!(!opts["flag"].bool());
        assert!(opts["dump"].not_null_outstream().is_none());
    }
}
