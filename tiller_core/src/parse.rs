//! The POSIX/GNU argument parser.

use std::any::Any;

use chrono::{DateTime, Local};

#[cfg(feature = "debug")]
use tracing::debug;

use crate::error::Error;
use crate::indexer::FlagFinder;

/// Handles an error raised while parsing `args[pos]`.
///
/// Return `None` to ignore the error and continue parsing from the next
/// token, or `Some(err)` to abort with `err`.
pub type ParseErrorHandler<'a> =
    Box<dyn Fn(&ParseOptions, &[String], usize, Error) -> Option<Error> + 'a>;

/// Options threaded through flag parsing.
#[derive(Default)]
pub struct ParseOptions<'a> {
    /// Assumed to be the time parsing started; month, year and partial time
    /// values resolve against it. Falls back to the current time.
    pub start_time: Option<DateTime<Local>>,

    /// Called on flag parsing errors; absent means the first error aborts.
    pub handle_parse_error: Option<ParseErrorHandler<'a>>,

    /// Arg values that initiate a help request.
    ///
    /// - `None` is equivalent to `--help`, `-h`, `help`.
    /// - `Some(vec![])` disables the help system.
    /// - anything else matches args against the supplied tokens.
    pub help_args: Option<Vec<String>>,

    /// Extra custom data.
    pub extra: Option<Box<dyn Any>>,
}

impl ParseOptions<'_> {
    /// The reference time for month/year and partial time resolution.
    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time.unwrap_or_else(Local::now)
    }

    /// True if `x` is supposed to be an arg requesting help.
    pub fn is_help_arg(&self, x: &str) -> bool {
        match &self.help_args {
            None => matches!(x, "--help" | "-h" | "help"),
            Some(tokens) => tokens.iter().any(|t| t == x),
        }
    }
}

/// Behavior switches for one [`parse_flags_low_level`] pass.
#[derive(Debug, Clone, Copy)]
pub struct ParsePass {
    /// Index into the arg vector to start from.
    pub offset: usize,
    /// Append positional args to the caller's buffer.
    pub append_pos_args: bool,
    /// Return upon reaching the first positional arg (not consumed).
    pub stop_at_first_pos_arg: bool,
    /// Decode flag values with `set = true`; otherwise validate only.
    pub set_flag_values: bool,
}

/// The outcome of one [`parse_flags_low_level`] pass.
#[derive(Debug, Default)]
pub struct ParseReport {
    /// Count of args parsed, including the bad flag when `error` is set.
    pub parsed: usize,
    /// Index of the `--` terminator, if one was reached.
    pub dash_at: Option<usize>,
    /// Whether a positional arg was encountered.
    pub found_pos_arg: bool,
    /// Index of the arg that triggered a help request, if any.
    pub help_at: Option<usize>,
    /// The error that stopped parsing, if any.
    pub error: Option<Error>,
}

/// Parses `args` (usually `env::args().skip(1)`) against `flags`.
///
/// Positional args are appended to `pos_buf`; the returned slice holds the
/// dash args (everything after the first `--`).
///
/// Known limitations:
///
/// - A flag with an implied value cannot consume a valid standalone value
///   with a hyphen prefix; `--foo=-1` works where `--foo -1` is ambiguous.
/// - A standalone `--` can never become a flag value or positional arg;
///   `--flag=--` works for values.
pub fn parse_flags<'x>(
    args: &'x [String],
    flags: &dyn FlagFinder,
    opts: &ParseOptions,
    pos_buf: &mut Vec<String>,
) -> Result<&'x [String], Error> {
    let report = parse_flags_low_level(
        args,
        flags,
        opts,
        ParsePass {
            offset: 0,
            append_pos_args: true,
            stop_at_first_pos_arg: false,
            set_flag_values: true,
        },
        pos_buf,
    );

    if let Some(err) = report.error {
        return Err(err);
    }

    Ok(match report.dash_at {
        Some(dash) => &args[dash + 1..],
        None => &[],
    })
}

/// The low-level parsing pass with full behavior control.
///
/// Classifies each token in order as positional, dash terminator, long flag
/// or shorthand cluster, resolves flag identity against `flags`, and decodes
/// values through each flag's VP. Never panics on malformed input; the error
/// policy is controlled by [`ParseOptions::handle_parse_error`].
pub fn parse_flags_low_level(
    args: &[String],
    flags: &dyn FlagFinder,
    opts: &ParseOptions,
    pass: ParsePass,
    pos_buf: &mut Vec<String>,
) -> ParseReport {
    let mut report = ParseReport::default();
    let mut i = pass.offset;

    while i < args.len() {
        let arg = &args[i];

        if arg.is_empty() || !arg.starts_with('-') || arg == "-" {
            // positional
            report.found_pos_arg = true;
            if pass.append_pos_args {
                pos_buf.push(arg.clone());
            }

            let is_help = opts.is_help_arg(arg);
            if is_help || pass.stop_at_first_pos_arg {
                if is_help {
                    report.help_at = Some(i);
                }

                // do not include the positional itself
                report.parsed = i - pass.offset;
                return report;
            }

            i += 1;
            continue;
        }

        let (shift_next, err) = if arg.as_bytes()[1] == b'-' {
            if arg.len() == 2 {
                // dash terminator
                report.parsed = args.len() - pass.offset;
                report.dash_at = Some(i);
                return report;
            }

            if opts.is_help_arg(arg) {
                #[cfg(feature = "debug")]
                debug!(arg = %arg, at = i, "help requested via long flag");

                report.help_at = Some(i);
                if flags.find_flag(&arg[2..]).is_some() {
                    // a real help flag; decode it as the application may
                    // expect its value getting set
                    let (_, err) = parse_long_flag(flags, opts, args, i, pass.set_flag_values);
                    report.error = err;
                }

                report.parsed = i + 1 - pass.offset;
                return report;
            }

            parse_long_flag(flags, opts, args, i, pass.set_flag_values)
        } else {
            if opts.is_help_arg(arg) {
                #[cfg(feature = "debug")]
                debug!(arg = %arg, at = i, "help requested via shorthand");

                report.help_at = Some(i);
                if flags.find_flag(&arg[1..]).is_some() {
                    let (_, err) = parse_short_flags(flags, opts, args, i, pass.set_flag_values);
                    report.error = err;
                }

                report.parsed = i + 1 - pass.offset;
                return report;
            }

            // a shorthand cluster; length unchecked since it may contain
            // multiple shorthands (e.g. `-vvv`)
            parse_short_flags(flags, opts, args, i, pass.set_flag_values)
        };

        if let Some(err) = err {
            match &opts.handle_parse_error {
                None => {
                    report.parsed = i + 1 - pass.offset;
                    report.error = Some(err);
                    return report;
                }
                Some(handler) => {
                    if let Some(err) = handler(opts, args, i, err) {
                        report.parsed = i + 1 - pass.offset;
                        report.error = Some(err);
                        return report;
                    }
                    // error ignored
                }
            }
        }

        if shift_next {
            i += 1;
        }
        i += 1;
    }

    report.parsed = i - pass.offset;
    report
}

fn next_value_token(args: &[String], i: usize) -> Option<&String> {
    args.get(i + 1).filter(|a| a.as_str() != "--")
}

// args[i] is the long flag with the `--` prefix.
fn parse_long_flag(
    flags: &dyn FlagFinder,
    opts: &ParseOptions,
    args: &[String],
    i: usize,
    set: bool,
) -> (bool, Option<Error>) {
    let body = &args[i][2..];
    let (name, explicit) = match body.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (body, None),
    };

    let Some(flag) = flags.find_flag(name) else {
        return (
            false,
            Some(Error::FlagUndefined {
                name: name.to_string(),
                at: Some(i),
            }),
        );
    };

    if let Some(value) = explicit {
        // --foo=bar
        if let Err(err) = flag.decode(opts, name, value, set) {
            return (
                false,
                Some(Error::FlagValueInvalid {
                    name: name.to_string(),
                    value: value.to_string(),
                    name_at: i,
                    value_at: Some(i),
                    reason: Some(Box::new(err)),
                }),
            );
        }

        return (false, None);
    }

    // --foo
    let mut validation_err = None;
    if let Some(value) = next_value_token(args, i) {
        match flag.decode(opts, name, value, false) {
            Ok(()) => {
                // can consume the next arg
                if value.starts_with('-') && flag.imply_value().is_some() {
                    return (
                        true,
                        Some(Error::AmbiguousArgs {
                            name: name.to_string(),
                            value: value.clone(),
                            at: i,
                        }),
                    );
                }

                if set {
                    if let Err(err) = flag.decode(opts, name, value, true) {
                        return (
                            true,
                            Some(Error::FlagValueInvalid {
                                name: name.to_string(),
                                value: value.clone(),
                                name_at: i,
                                value_at: Some(i + 1),
                                reason: Some(Box::new(err)),
                            }),
                        );
                    }
                }

                return (true, None);
            }
            Err(err) => validation_err = Some(err),
        }
    }

    // cannot consume the next arg; try the implied value
    if let Some(implied) = flag.imply_value() {
        #[cfg(feature = "debug")]
        debug!(name, implied, "falling back to implied flag value");

        if let Err(err) = flag.decode(opts, name, implied, set) {
            return (
                false,
                Some(Error::FlagValueInvalid {
                    name: name.to_string(),
                    value: implied.to_string(),
                    name_at: i,
                    value_at: None,
                    reason: Some(Box::new(err)),
                }),
            );
        }

        return (false, None);
    }

    // no implied value either
    match next_value_token(args, i) {
        None => (
            false,
            Some(Error::FlagValueMissing {
                name: name.to_string(),
                at: i,
            }),
        ),
        Some(value) => (
            false,
            Some(Error::FlagValueInvalid {
                name: name.to_string(),
                value: value.clone(),
                name_at: i,
                value_at: Some(i + 1),
                reason: validation_err.map(Box::new),
            }),
        ),
    }
}

// args[i] is the shorthand cluster with the `-` prefix.
fn parse_short_flags(
    flags: &dyn FlagFinder,
    opts: &ParseOptions,
    args: &[String],
    i: usize,
    set: bool,
) -> (bool, Option<Error>) {
    let body = &args[i][1..];
    let (cluster, explicit) = match body.split_once('=') {
        Some((cluster, value)) => (cluster, Some(value)),
        None => (body, None),
    };

    let mut offset = 0;
    while offset < cluster.len() {
        let width = cluster[offset..]
            .chars()
            .next()
            .map(char::len_utf8)
            .unwrap_or(1);
        let name = &cluster[offset..offset + width];

        let Some(flag) = flags.find_flag(name) else {
            return (
                false,
                Some(Error::FlagUndefined {
                    name: name.to_string(),
                    at: Some(i),
                }),
            );
        };

        offset += width;

        if offset == cluster.len() {
            // the last shorthand follows the long-flag discipline
            if let Some(value) = explicit {
                if let Err(err) = flag.decode(opts, name, value, set) {
                    return (
                        false,
                        Some(Error::FlagValueInvalid {
                            name: name.to_string(),
                            value: value.to_string(),
                            name_at: i,
                            value_at: Some(i),
                            reason: Some(Box::new(err)),
                        }),
                    );
                }

                return (false, None);
            }

            let mut validation_err = None;
            if let Some(value) = next_value_token(args, i) {
                match flag.decode(opts, name, value, false) {
                    Ok(()) => {
                        if value.starts_with('-') && flag.imply_value().is_some() {
                            return (
                                true,
                                Some(Error::AmbiguousArgs {
                                    name: name.to_string(),
                                    value: value.clone(),
                                    at: i,
                                }),
                            );
                        }

                        if set {
                            if let Err(err) = flag.decode(opts, name, value, true) {
                                return (
                                    true,
                                    Some(Error::FlagValueInvalid {
                                        name: name.to_string(),
                                        value: value.clone(),
                                        name_at: i,
                                        value_at: Some(i + 1),
                                        reason: Some(Box::new(err)),
                                    }),
                                );
                            }
                        }

                        return (true, None);
                    }
                    Err(err) => validation_err = Some(err),
                }
            }

            if let Some(implied) = flag.imply_value() {
                if let Err(err) = flag.decode(opts, name, implied, set) {
                    return (
                        false,
                        Some(Error::FlagValueInvalid {
                            name: name.to_string(),
                            value: implied.to_string(),
                            name_at: i,
                            value_at: None,
                            reason: Some(Box::new(err)),
                        }),
                    );
                }

                return (false, None);
            }

            return match next_value_token(args, i) {
                None => (
                    false,
                    Some(Error::FlagValueMissing {
                        name: name.to_string(),
                        at: i,
                    }),
                ),
                Some(value) => (
                    false,
                    Some(Error::FlagValueInvalid {
                        name: name.to_string(),
                        value: value.clone(),
                        name_at: i,
                        value_at: Some(i + 1),
                        reason: validation_err.map(Box::new),
                    }),
                ),
            };
        }

        // not the last shorthand; flags in between prefer the implied value
        if let Some(implied) = flag.imply_value() {
            if let Err(err) = flag.decode(opts, name, implied, set) {
                return (false, Some(err));
            }

            continue;
        }

        // Without an implied value the remainder of the cluster is the
        // value (`-tfile` == `-t file`), but `-abc=file` is rejected when
        // we are not the final shorthand: assigning the explicit value to
        // a middle flag is not intuitive.
        if let Some(value) = explicit {
            return (
                false,
                Some(Error::ShorthandMiddleValue {
                    shorthand: name.to_string(),
                    cluster: cluster.to_string(),
                    value: value.to_string(),
                }),
            );
        }

        let rest = &cluster[offset..];
        if let Err(err) = flag.decode(opts, name, rest, set) {
            return (
                false,
                Some(Error::FlagValueInvalid {
                    name: String::new(),
                    value: rest.to_string(),
                    name_at: i,
                    value_at: Some(i),
                    reason: Some(Box::new(err)),
                }),
            );
        }

        return (false, None);
    }

    (false, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::{BoolFlagV, IntFlagV, IntSumFlagV, StrFlagV};
    use crate::indexer::MapIndexer;
    use assert_matches::assert_matches;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn long_flag_with_explicit_value() {
        let name = StrFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&name, &["name", "n"]);

        let argv = args(&["--name=alice"]);
        let mut pos = Vec::new();
        let dash = parse_flags(&argv, &flags, &ParseOptions::default(), &mut pos).unwrap();
        assert!(dash.is_empty());
        assert!(pos.is_empty());
        assert_eq!(name.get(), "alice");
    }

    #[test]
    fn long_flag_consumes_next_token() {
        let name = StrFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&name, &["name"]);

        let argv = args(&["--name", "bob", "rest"]);
        let mut pos = Vec::new();
        parse_flags(&argv, &flags, &ParseOptions::default(), &mut pos).unwrap();
        assert_eq!(name.get(), "bob");
        assert_eq!(pos, vec!["rest".to_string()]);
    }

    #[test]
    fn bool_flag_implied() {
        let verbose = BoolFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&verbose, &["verbose", "v"]);

        let argv = args(&["--verbose"]);
        let mut pos = Vec::new();
        parse_flags(&argv, &flags, &ParseOptions::default(), &mut pos).unwrap();
        assert!(verbose.get());
    }

    #[test]
    fn bool_flag_keeps_valid_next_token() {
        let verbose = BoolFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&verbose, &["verbose"]);

        let argv = args(&["--verbose", "no"]);
        let mut pos = Vec::new();
        parse_flags(&argv, &flags, &ParseOptions::default(), &mut pos).unwrap();
        assert!(!verbose.get());
        assert!(pos.is_empty());
    }

    #[test]
    fn sum_flag_repeats_and_assigns() {
        let level = IntSumFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&level, &["V"]);

        let argv = args(&["-VV", "-V=3"]);
        let mut pos = Vec::new();
        parse_flags(&argv, &flags, &ParseOptions::default(), &mut pos).unwrap();
        assert_eq!(level.get(), 5);
    }

    #[test]
    fn cluster_with_tail_value() {
        let a = IntSumFlagV::default();
        let b_sum = IntSumFlagV::default();
        let b = IntFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&a, &["A"]);
        flags.add(&b_sum, &["B"]);
        flags.add(&b, &["b"]);

        let argv = args(&["-ABb=200"]);
        let mut pos = Vec::new();
        parse_flags(&argv, &flags, &ParseOptions::default(), &mut pos).unwrap();
        assert_eq!(a.get(), 1);
        assert_eq!(b_sum.get(), 1);
        assert_eq!(b.get(), 200);
    }

    #[test]
    fn cluster_tail_as_inline_value() {
        let typ = StrFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&typ, &["t"]);

        let argv = args(&["-tfile"]);
        let mut pos = Vec::new();
        parse_flags(&argv, &flags, &ParseOptions::default(), &mut pos).unwrap();
        assert_eq!(typ.get(), "file");
    }

    #[test]
    fn cluster_rejects_middle_explicit_value() {
        let t = StrFlagV::default();
        let v = BoolFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&t, &["t"]);
        flags.add(&v, &["v"]);

        // `t` has no implied value and is not last
        let argv = args(&["-tv=x"]);
        let mut pos = Vec::new();
        let err = parse_flags(&argv, &flags, &ParseOptions::default(), &mut pos).unwrap_err();
        assert_matches!(err, Error::ShorthandMiddleValue { shorthand, .. } if shorthand == "t");
    }

    #[test]
    fn ambiguous_hyphen_value() {
        let sum = IntSumFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&sum, &["IntSum"]);

        let argv = args(&["--IntSum", "-1"]);
        let mut pos = Vec::new();
        let err = parse_flags(&argv, &flags, &ParseOptions::default(), &mut pos).unwrap_err();
        assert_matches!(
            err,
            Error::AmbiguousArgs { name, value, .. } if name == "IntSum" && value == "-1"
        );

        let argv = args(&["--IntSum=-1"]);
        let mut pos = Vec::new();
        parse_flags(&argv, &flags, &ParseOptions::default(), &mut pos).unwrap();
        assert_eq!(sum.get(), -1);
    }

    #[test]
    fn dash_terminator() {
        let flags = MapIndexer::new();
        let argv = args(&["a", "b", "--", "c", "--not-a-flag"]);
        let mut pos = Vec::new();
        let dash = parse_flags(&argv, &flags, &ParseOptions::default(), &mut pos).unwrap();
        assert_eq!(pos, args(&["a", "b"]));
        assert_eq!(dash, &args(&["c", "--not-a-flag"])[..]);
    }

    #[test]
    fn undefined_flag() {
        let flags = MapIndexer::new();
        let argv = args(&["--nope"]);
        let mut pos = Vec::new();
        let err = parse_flags(&argv, &flags, &ParseOptions::default(), &mut pos).unwrap_err();
        assert_matches!(err, Error::FlagUndefined { name, at: Some(0) } if name == "nope");
    }

    #[test]
    fn value_missing() {
        let name = StrFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&name, &["name"]);

        let argv = args(&["--name"]);
        let mut pos = Vec::new();
        let err = parse_flags(&argv, &flags, &ParseOptions::default(), &mut pos).unwrap_err();
        assert_matches!(err, Error::FlagValueMissing { name, at: 0 } if name == "name");

        // a dash terminator can never become a value
        let argv = args(&["--name", "--"]);
        let mut pos = Vec::new();
        let err = parse_flags(&argv, &flags, &ParseOptions::default(), &mut pos).unwrap_err();
        assert_matches!(err, Error::FlagValueMissing { .. });
    }

    #[test]
    fn error_handler_continues() {
        let verbose = BoolFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&verbose, &["verbose"]);

        let opts = ParseOptions {
            handle_parse_error: Some(Box::new(|_, _, _, _| None)),
            ..ParseOptions::default()
        };

        let argv = args(&["--nope", "--verbose"]);
        let mut pos = Vec::new();
        parse_flags(&argv, &flags, &opts, &mut pos).unwrap();
        assert!(verbose.get());
    }

    #[test]
    fn error_handler_replaces() {
        let flags = MapIndexer::new();
        let opts = ParseOptions {
            handle_parse_error: Some(Box::new(|_, _, _, _| Some(Error::Timeout))),
            ..ParseOptions::default()
        };

        let argv = args(&["--nope"]);
        let mut pos = Vec::new();
        let err = parse_flags(&argv, &flags, &opts, &mut pos).unwrap_err();
        assert_matches!(err, Error::Timeout);
    }

    #[test]
    fn help_arg_detection() {
        let flags = MapIndexer::new();
        let argv = args(&["--help"]);
        let mut pos = Vec::new();
        let report = parse_flags_low_level(
            &argv,
            &flags,
            &ParseOptions::default(),
            ParsePass {
                offset: 0,
                append_pos_args: false,
                stop_at_first_pos_arg: false,
                set_flag_values: true,
            },
            &mut pos,
        );
        assert_eq!(report.help_at, Some(0));
        assert!(report.error.is_none());

        // a positional help token is recorded too
        let argv = args(&["help"]);
        let report = parse_flags_low_level(
            &argv,
            &flags,
            &ParseOptions::default(),
            ParsePass {
                offset: 0,
                append_pos_args: false,
                stop_at_first_pos_arg: false,
                set_flag_values: true,
            },
            &mut pos,
        );
        assert_eq!(report.help_at, Some(0));
    }

    #[test]
    fn help_disabled_by_empty_set() {
        let opts = ParseOptions {
            help_args: Some(Vec::new()),
            ..ParseOptions::default()
        };
        assert!(!opts.is_help_arg("--help"));

        let opts = ParseOptions {
            help_args: Some(vec!["assist".to_string()]),
            ..ParseOptions::default()
        };
        assert!(opts.is_help_arg("assist"));
        assert!(!opts.is_help_arg("-h"));
    }

    #[test]
    fn stop_at_first_positional() {
        let verbose = BoolFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&verbose, &["verbose"]);

        let argv = args(&["--verbose", "sub", "--more"]);
        let mut pos = Vec::new();
        let report = parse_flags_low_level(
            &argv,
            &flags,
            &ParseOptions::default(),
            ParsePass {
                offset: 0,
                append_pos_args: false,
                stop_at_first_pos_arg: true,
                set_flag_values: true,
            },
            &mut pos,
        );
        assert!(report.found_pos_arg);
        assert!(report.error.is_none());
        // the positional itself is not counted
        assert_eq!(report.parsed, 1);
        assert!(verbose.get());
    }
}
