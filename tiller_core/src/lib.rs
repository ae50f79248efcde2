//! Core engine for `tiller`: POSIX & GNU style flag parsing, command
//! routing and shell completion.
//!
//! # Terminology
//!
//! - *args*: all strings provided to a command; for a root command in the
//!   real world this is usually `env::args().skip(1)`.
//! - *flags*: before the first dash, strings interpreted as flag names and
//!   flag values per the POSIX and GNU style guides.
//! - *subcmds*: before the first dash, consecutive args matching a chain of
//!   command patterns.
//! - *positional args*: before the first dash, strings that are neither
//!   flags nor subcmds.
//! - *dash args*: all strings after the first standalone `--`.
//!
//! Illustration without subcmds:
//!
//! ```text
//!                       dash
//!                         |
//!     posArg  flag name   |
//!        |        |       |
//! ./foo xxx -i --join bar -- other args
//!           |          |    [all args after the dash are dash args]
//!           |          |
//!           |      flag value
//!           |
//!   flag shorthand, with implied value
//! ```
//!
//! See the `tiller` facade crate for the full user-facing documentation.

mod bind;
mod cmd;
mod comp;
mod compfmt;
mod compsh;
mod dynvp;
mod error;
mod flag;
pub mod help;
mod indexer;
mod parse;
mod route;
mod rules;
mod scan;
mod vp;
mod vptype;

pub use bind::{BindIndexer, Binding, FieldDesc};
pub use cmd::{
    assign_default_values, ArgErrorHandler, Cmd, CmdOptions, CmdState, HelpFn, OutHandle,
    PostRunFn, PreRunFn, RunFn,
};
pub use comp::{
    CompAction, CompDirs, CompDisable, CompFiles, CompFunc, CompItem, CompKind, CompState,
    CompStatic, CompTask,
};
pub use compfmt::{CompFmt, CompFmtBash, CompFmtPwsh, CompFmtZsh};
pub use compsh::{substitute_placeholders, write_completions, CompShells};
pub use dynvp::{
    CellKind, DefaultDynVpFactory, DynCell, DynMapValVp, DynScalarVp, DynVp, DynVpFactory,
    FieldShape, MapValShape,
};
pub use error::Error;
pub use flag::{
    is_shorthand, BoolFlag, BoolFlagV, BoolSliceFlagV, DurationFlag, DurationFlagV,
    DurationSumFlagV, Flag, FlagCell, FlagState, FlagVal, FloatFlag, FloatFlagV, FloatSumFlagV,
    IntFlag, IntFlagV, IntSliceFlagV, IntSumFlag, IntSumFlagV, RegexpFlagV, RegexpNocaseFlagV,
    SizeFlag, SizeFlagV, SizeSumFlagV, StrFlag, StrFlagV, StrMapFlagV, StrSliceFlag,
    StrSliceFlagV, TimeFlagV, UintFlag, UintFlagV, UintSumFlagV, UnixMicroFlagV, UnixMilliFlagV,
    UnixNanoFlagV, UnixSecFlagV,
};
pub use help::{handle_arg_error_as_help, handle_help_request, CmdHelp, FlagHelp};
pub use indexer::{
    find_flag_among, FlagFinder, FlagInfo, FlagIter, FlagLevel, FuncEntry, FuncIndexer,
    LevelIndexer, MapIndexer, MultiIndexer,
};
pub use parse::{
    parse_flags, parse_flags_low_level, ParseErrorHandler, ParseOptions, ParsePass, ParseReport,
};
pub use route::{format_route, Route};
pub use rules::{
    merge_rules, rule_contains_any, rule_requires_any, AllOf, AllOrNone, AnyOf, AnyRule, Depends,
    Inspector, MultiRule, OneOf, Rule, Violation, ViolationCode,
};
pub use vp::{
    BoolVp, DurationVp, FloatStorage, FloatVp, IntStorage, IntVp, MapVp, OptionVp,
    RegexpNocaseVp, RegexpVp, SizeVp, SliceVp, StrVp, SumStorage, SumVp, TimeVp, UintVp,
    UnixMicroVp, UnixMilliVp, UnixNanoVp, UnixSecVp, Vp,
};
pub use vptype::{MapValueVariant, ScalarType, Variant, VpType};

#[cfg(test)]
pub(crate) mod test {
    macro_rules! assert_contains {
        ($base:expr, $sub:expr) => {
            assert!(
                $base.contains($sub),
                "'{b}' does not contain '{s}'",
                b = $base,
                s = $sub,
            );
        };
    }

    pub(crate) use assert_contains;
}
