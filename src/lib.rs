//! `tiller` is a POSIX & GNU style command line library for Rust: flag
//! parsing into typed values, nested command dispatch, declarative
//! inter-flag rules, and shell completion for partially typed command
//! lines.
//!
//! Where most argument crates generate a parser from a declaration,
//! `tiller` keeps the pieces separate and caller-owned: *flags* bind your
//! variables to text codecs, *indexers* collect flags under names,
//! *commands* form a tree that routes an argument vector to a target, and
//! the *completion engine* reuses the same tree to suggest what comes
//! next. Nothing global, nothing hidden; every piece can be used on its
//! own.
//!
//! # Flags and values
//!
//! A flag pairs a storage cell with a value peeker (VP) that parses,
//! validates and renders it. Storage is either borrowed from the caller
//! ([`FlagCell`]) or embedded ([`FlagVal`]); the VP decides the accepted
//! grammar: booleans (`yes`, `off`, `1`, …), base-0 integers, floats,
//! byte sizes (`1G1M`), durations (`1h30m`, `2.5m`, `1yr`), civil times,
//! unix timestamps, and regular expressions, plus slices, maps
//! (`key=value`) and accumulating sums of each.
//!
//! # Commands
//!
//! ```no_run
//! use tiller::{BoolFlagV, Cmd, CmdOptions, MapIndexer, StrFlagV};
//!
//! fn main() -> Result<(), tiller::Error> {
//!     let verbose = BoolFlagV::default().brief("print more details");
//!     let name = StrFlagV::new("world".to_string()).brief("who to greet");
//!
//!     let mut flags = MapIndexer::new();
//!     flags
//!         .add(&verbose, &["verbose", "v"])
//!         .add(&name, &["name", "n"]);
//!
//!     let root = Cmd {
//!         pattern: "greet".to_string(),
//!         brief_usage: "greets people".to_string(),
//!         flags: Some(&flags),
//!         run: Some(Box::new(|_opts, _route, _pos, _dash| {
//!             // flag storage has been decoded by now
//!             Ok(())
//!         })),
//!         ..Cmd::default()
//!     };
//!
//!     let args: Vec<String> = std::env::args().skip(1).collect();
//!     let opts = CmdOptions::default();
//!     root.exec(&opts, &args)
//! }
//! ```
//!
//! Parsing follows the POSIX/GNU conventions: `--name value`,
//! `--name=value`, shorthand clusters (`-vvv`, `-tfile`, `-ab=x`), the
//! `--` terminator, and implied values (`--verbose` alone means `true`; a
//! sum flag counts its occurrences). A flag whose implied value could
//! swallow a hyphen-prefixed token reports an ambiguity instead of
//! guessing; spell it `--flag=-1`.
//!
//! Sub-commands are just child [`Cmd`]s; the dispatcher walks the tree,
//! decodes flags against the active [`Route`] (target-local flags first,
//! then each ancestor's shared flags), assigns defaults, checks
//! [flag rules](Rule), and runs the pre-run/run/post-run hooks in
//! root→target / target→root order.
//!
//! # Rules
//!
//! Inter-flag constraints are declared, not hand-checked: [`AllOf`],
//! [`AnyOf`], [`OneOf`], [`AllOrNone`], the conditional [`Depends`], and
//! [`MultiRule`] to combine them. The first violation aborts the dispatch
//! with a [`Error::FlagViolation`] naming the key and the reason.
//!
//! # Struct binding
//!
//! The [`derive`] module binds the tagged fields of a struct as flags at
//! once, the tag grammar carrying names, codec hints, defaults and
//! completion values; see [`derive`](crate::derive) for details.
//!
//! # Completion
//!
//! [`CompShells`] wires a `completion` command with `bash`, `zsh` and
//! `pwsh` sub-commands into your tree. Each emits its driver script when
//! invoked directly, and answers the script's `complete` requests by
//! classifying the token under the cursor and composing suggestions from
//! the tree, the flags, their default values, and any custom
//! [`CompAction`] providers.
//!
//! ```no_run
//! use tiller::{Cmd, CmdOptions, CompShells};
//!
//! fn main() -> Result<(), tiller::Error> {
//!     let shells = CompShells::default();
//!     let root = Cmd {
//!         pattern: "greet".to_string(),
//!         children: vec![shells.command("", false)],
//!         ..Cmd::default()
//!     };
//!
//!     let args: Vec<String> = std::env::args().skip(1).collect();
//!     let opts = CmdOptions::default();
//!     root.exec(&opts, &args)
//! }
//! ```
//!
//! # Buffers and allocation
//!
//! The dispatcher threads caller-supplied buffers where it matters:
//! [`Cmd::resolve_target`] and [`Cmd::exec_with`] take the route and the
//! positional buffer by `&mut`, so a long-running process can reuse them
//! across dispatches.
//!
//! # Features
//!
//! * `debug`: emit `tracing` events from the parser and the completion
//!   engine.

pub mod derive;

pub use tiller_core::*;
