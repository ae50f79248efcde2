//! The derive API: bind the tagged fields of a struct as flags.
//!
//! Deriving [`Binding`] turns every field carrying a `#[cli("…")]`
//! attribute into a flag served by a [`BindIndexer`](crate::BindIndexer);
//! untagged fields are ignored. The indexer parses the tags at
//! construction and creates each field's codec lazily on first use.
//!
//! ```
//! use std::collections::HashMap;
//! use tiller::derive::Binding;
//! use tiller::{BindIndexer, Flag, FlagFinder, ParseOptions};
//!
//! #[derive(Default, Binding)]
//! struct Config {
//!     #[cli("v|verbosity,value=sum#how chatty to be")]
//!     verbosity: i64,
//!     #[cli("l|limit,value=size,def=1G#memory limit per job")]
//!     limit: u64,
//!     #[cli("label,once")]
//!     labels: HashMap<String, String>,
//! }
//!
//! let mut config = Config::default();
//! let flags = BindIndexer::new(&mut config);
//!
//! let flag = flags.find_flag("limit").expect("bound by the tag");
//! flag.decode(&ParseOptions::default(), "limit", "2G", true).unwrap();
//! drop(flags);
//!
//! assert_eq!(config.limit, 2 * 1024 * 1024 * 1024);
//! ```
//!
//! # The tag grammar
//!
//! ```text
//! <names>[,<options>][#<brief usage>]
//! ```
//!
//! `<names>` is pipe-separated; a long name is two or more code points not
//! starting with `-`, a shorthand is exactly one code point and not `-`.
//!
//! The options are comma-separated:
//!
//! | option            | effect                                              |
//! |-------------------|-----------------------------------------------------|
//! | `comp=<v>`        | preset completion suggestion (repeatable)           |
//! | `value=<t>`       | codec hint for the scalar / element / map value     |
//! | `key=<t>`         | codec hint for the map key                          |
//! | `def=<v>`         | default value; repeats wrap into `[v1, v2, …]`      |
//! | `hide`            | sets the hidden state bit                           |
//! | `once`            | sets the set-at-most-once state bit                 |
//!
//! Recognized `value=` hints: `size`, `dur`, `sum`, `ssum`, `dsum`,
//! `regexp`, `regexp-nocase`, `time`, `unix-ts`, `unix-ms`, `unix-us`,
//! `unix-ns`. The `key=` hints are the same set minus the sum variants and
//! the regexps. A hint that does not fit the field's storage type fails
//! with [`Error::UnsupportedType`](crate::Error::UnsupportedType) when the
//! flag is first used.
//!
//! # Supported field types
//!
//! `String`, `bool`, the fixed-width integers, `f32`/`f64`,
//! `chrono::DateTime<Local>` and `regex::Regex` (plain or
//! `Option`-wrapped), `Option`/`Box` wrapped scalars, `Vec<scalar>`, and
//! `HashMap<key, scalar | Vec<scalar>>` with string or integer keys.
//! Anything else is rejected at compile time.

pub use tiller_derive::Binding;
