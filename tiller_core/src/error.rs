use thiserror::Error;

use crate::flag::is_shorthand;
use crate::rules::ViolationCode;

/// Every failure surfaced by this crate.
///
/// The `Display` text of each variant is stable: shell driver scripts and
/// calling applications may match on it. Long flag names render with a `--`
/// prefix, shorthands with a single `-`.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// A flag rule reported a violation during dispatch.
    #[error("flag rule violation found on `{}`: {}", flag_ref(.key), .code.reason())]
    FlagViolation {
        /// The rule key (a flag name) the violation is about.
        key: String,
        /// Why the key is in violation.
        code: ViolationCode,
    },

    /// A flag marked set-at-most-once received a second successful set.
    #[error("flag can only be set at most once")]
    FlagSetAtMostOnce,

    /// A route operation was attempted on an empty route.
    #[error("empty route")]
    EmptyRoute,

    /// An implicit-value flag was followed by a token that is both a valid
    /// value and a potential flag (hyphen prefixed).
    #[error("ambiguous arg combination `{} {value}`: implicit flag followed by potential flag", flag_ref(.name))]
    AmbiguousArgs {
        /// Name of the flag (without hyphen prefix).
        name: String,
        /// The ambiguous token.
        value: String,
        /// Index of the flag arg in the full arg list.
        at: usize,
    },

    /// `=value` was attached to a shorthand cluster whose explicit-value
    /// flag is not the last member (e.g. `-abc=x` where `b` takes a value).
    #[error(
        "non-implicit flag -{shorthand} cannot use value specified with `=` in middle of shorthands (-{cluster}={value})"
    )]
    ShorthandMiddleValue {
        /// The offending shorthand.
        shorthand: String,
        /// The whole cluster (without the hyphen prefix).
        cluster: String,
        /// The explicit value.
        value: String,
    },

    /// Construction-time: a flag name was registered twice in one indexer.
    #[error("duplicate flag {}", flag_ref(.name))]
    DuplicateFlag {
        /// The name registered twice.
        name: String,
    },

    /// A name could not be resolved against the active flag finder.
    #[error("undefined flag {}{}", flag_ref(.name), fmt_at(.at))]
    FlagUndefined {
        /// The unresolvable name.
        name: String,
        /// Arg index when found during parsing, `None` otherwise.
        at: Option<usize>,
    },

    /// A flag without an implied value got no value token.
    #[error("missing value for flag {} (index: {at})", flag_ref(.name))]
    FlagValueMissing {
        /// Name of the flag (without hyphen prefix).
        name: String,
        /// Index of the flag arg in the full arg list.
        at: usize,
    },

    /// A value was present but the flag's codec rejected it.
    #[error(
        "invalid value for flag {} (index: {name_at}, value index: {}){}",
        flag_ref(.name),
        fmt_value_at(.value_at),
        fmt_reason(.reason)
    )]
    FlagValueInvalid {
        /// Name of the flag (without hyphen prefix).
        name: String,
        /// The rejected value.
        value: String,
        /// Index of the arg containing the flag name.
        name_at: usize,
        /// Index of the arg containing the value; `None` when the value was
        /// implied by the flag itself.
        value_at: Option<usize>,
        /// The codec error that caused the rejection.
        reason: Option<Box<Error>>,
    },

    /// The dispatch target has no run hook.
    #[error("command {name} is not runnable (no run function)")]
    NotRunnable {
        /// Name of the target command.
        name: String,
    },

    /// A help token was recognized but no help handler is configured.
    #[error("help requested by arg `{arg}` (index: {at}) but not handled")]
    HelpPending {
        /// The arg that requested help.
        arg: String,
        /// Its index in the full arg list.
        at: usize,
    },

    /// Sentinel: a help request was dispatched successfully.
    #[error("help request handled")]
    HelpHandled,

    /// The completion request did not finish within its time limit.
    #[error("timeout")]
    Timeout,

    /// A text value does not parse as the expected type.
    #[error("{}", fmt_invalid_value(.type_name, .value, .partial))]
    InvalidValue {
        /// The type or format the value was supposed to be.
        type_name: String,
        /// The offending value.
        value: String,
        /// True when only a part of the value is invalid.
        partial: bool,
    },

    /// The binding factory cannot derive a codec for a field.
    #[error("{}", fmt_unsupported(.type_name, .key_hint, .value_hint))]
    UnsupportedType {
        /// Description of the field type.
        type_name: String,
        /// The `key=` hint, empty when absent.
        key_hint: String,
        /// The `value=` hint, empty when absent.
        value_hint: String,
    },
}

impl Error {
    /// Convenience constructor for [`Error::InvalidValue`].
    pub fn invalid_value(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Error::InvalidValue {
            type_name: type_name.into(),
            value: value.into(),
            partial: false,
        }
    }

    /// Convenience constructor for a partial [`Error::InvalidValue`].
    pub fn invalid_part(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Error::InvalidValue {
            type_name: type_name.into(),
            value: value.into(),
            partial: true,
        }
    }
}

fn flag_ref(name: &str) -> String {
    if is_shorthand(name) {
        format!("-{name}")
    } else {
        format!("--{name}")
    }
}

fn fmt_at(at: &Option<usize>) -> String {
    match at {
        Some(i) => format!(" (index: {i})"),
        None => String::new(),
    }
}

// The implied-value sentinel keeps the original wire text, index -1.
fn fmt_value_at(value_at: &Option<usize>) -> String {
    match value_at {
        Some(i) => i.to_string(),
        None => "-1".to_string(),
    }
}

fn fmt_reason(reason: &Option<Box<Error>>) -> String {
    match reason {
        Some(err) => format!(": {err}"),
        None => String::new(),
    }
}

fn fmt_invalid_value(type_name: &str, value: &str, partial: &bool) -> String {
    if *partial {
        format!("{value} contains invalid {type_name} value")
    } else {
        format!("{value} is not a valid {type_name} value")
    }
}

fn fmt_unsupported(type_name: &str, key_hint: &str, value_hint: &str) -> String {
    match (key_hint.is_empty(), value_hint.is_empty()) {
        (true, true) => format!("unsupported type: {type_name}"),
        (false, true) => format!("unsupported type (key={key_hint}): {type_name}"),
        (true, false) => format!("unsupported type (value={value_hint}): {type_name}"),
        (false, false) => {
            format!("unsupported type (key={key_hint}, value={value_hint}): {type_name}")
        }
    }
}
