//! Commands and the dispatcher walking their tree.

use std::any::Any;
use std::cell::{Cell, RefCell, RefMut};
use std::io;
use std::ops::{BitOr, BitOrAssign};

use crate::comp::CompAction;
use crate::error::Error;
use crate::flag::Flag;
use crate::indexer::{find_flag_among, FlagFinder, FlagIter};
use crate::parse::{parse_flags_low_level, ParseOptions, ParsePass};
use crate::route::Route;
use crate::rules::Rule;

/// Pre-run hook.
///
/// Receives the options, the full route, the index of the owning command in
/// the route, and the positional/dash args meant for the target. An error
/// cancels all subsequent pre-run calls and the run hook.
pub type PreRunFn<'a> =
    Box<dyn Fn(&CmdOptions, &Route, usize, &[String], &[String]) -> Result<(), Error> + 'a>;

/// Run hook; only invoked on the target command.
pub type RunFn<'a> = Box<dyn Fn(&CmdOptions, &Route, &[String], &[String]) -> Result<(), Error> + 'a>;

/// Post-run hook.
///
/// Receives the latest dispatch error by value; its own return value
/// replaces it. An `Err` return cancels all subsequent post-run calls.
pub type PostRunFn<'a> =
    Box<dyn Fn(&CmdOptions, &Route, usize, Option<Error>) -> Result<(), Error> + 'a>;

/// Help request handler.
///
/// `help_at` is the index of the arg that initiated the request; `None`
/// when invoked as the fallback of an argument error.
pub type HelpFn<'a> =
    Box<dyn Fn(&CmdOptions, &Route, &[String], Option<usize>) -> Result<(), Error> + 'a>;

/// Handles errors during target resolution.
///
/// `bad_arg_at` indexes the offending arg when known. Return `None` to
/// ignore the error.
pub type ArgErrorHandler<'a> =
    Box<dyn Fn(&CmdOptions, &Route, &[String], Option<usize>, Error) -> Option<Error> + 'a>;

/// Bits describing a command's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CmdState(u32);

impl CmdState {
    /// Hides the command from completion.
    pub const HIDDEN: CmdState = CmdState(1);
    /// The pre-run hook runs at most once across dispatches.
    pub const PRE_RUN_ONCE: CmdState = CmdState(1 << 1);
    /// The pre-run hook has been invoked.
    pub const PRE_RUN_CALLED: CmdState = CmdState(1 << 2);
    /// The post-run hook runs at most once across dispatches.
    pub const POST_RUN_ONCE: CmdState = CmdState(1 << 3);
    /// The post-run hook has been invoked.
    pub const POST_RUN_CALLED: CmdState = CmdState(1 << 4);

    /// True when all bits of `other` are set.
    pub fn contains(self, other: CmdState) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when the hidden bit is set.
    pub fn hidden(self) -> bool {
        self.contains(CmdState::HIDDEN)
    }

    /// True when the pre-run-once bit is set.
    pub fn pre_run_once(self) -> bool {
        self.contains(CmdState::PRE_RUN_ONCE)
    }

    /// True when the pre-run hook has been invoked.
    pub fn pre_run_called(self) -> bool {
        self.contains(CmdState::PRE_RUN_CALLED)
    }

    /// True when the post-run-once bit is set.
    pub fn post_run_once(self) -> bool {
        self.contains(CmdState::POST_RUN_ONCE)
    }

    /// True when the post-run hook has been invoked.
    pub fn post_run_called(self) -> bool {
        self.contains(CmdState::POST_RUN_CALLED)
    }
}

impl BitOr for CmdState {
    type Output = CmdState;

    fn bitor(self, rhs: CmdState) -> CmdState {
        CmdState(self.0 | rhs.0)
    }
}

impl BitOrAssign for CmdState {
    fn bitor_assign(&mut self, rhs: CmdState) {
        self.0 |= rhs.0;
    }
}

/// Options for command execution.
#[derive(Default)]
pub struct CmdOptions<'a> {
    /// Flag parsing options.
    pub parse: ParseOptions<'a>,

    /// Stdout override; defaults to the process stdout.
    pub stdout: Option<RefCell<Box<dyn io::Write + 'a>>>,

    /// Stderr override; defaults to the process stderr.
    pub stderr: Option<RefCell<Box<dyn io::Write + 'a>>>,

    /// Called on errors during target resolution.
    pub handle_arg_error: Option<ArgErrorHandler<'a>>,

    /// The fallback help handler, consulted when the target command has no
    /// help hook of its own. With neither present, no help is provided.
    pub handle_help_request: Option<HelpFn<'a>>,

    /// Extra custom data.
    pub extra: Option<Box<dyn Any>>,

    /// Skips the post-run chain.
    pub skip_post_run: bool,

    /// Parses without mutating flag storage (validation only).
    pub do_not_set_flags: bool,
}

/// A write handle resolved from [`CmdOptions`]: either the configured
/// override or the process stream.
pub enum OutHandle<'h, 'a> {
    /// The configured override stream.
    Override(RefMut<'h, Box<dyn io::Write + 'a>>),
    /// The process stdout.
    Stdout(io::Stdout),
    /// The process stderr.
    Stderr(io::Stderr),
}

impl io::Write for OutHandle<'_, '_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutHandle::Override(w) => w.write(buf),
            OutHandle::Stdout(w) => w.write(buf),
            OutHandle::Stderr(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutHandle::Override(w) => w.flush(),
            OutHandle::Stdout(w) => w.flush(),
            OutHandle::Stderr(w) => w.flush(),
        }
    }
}

impl<'a> CmdOptions<'a> {
    /// Routes stdout into `w`.
    pub fn with_stdout(mut self, w: impl io::Write + 'a) -> Self {
        self.stdout = Some(RefCell::new(Box::new(w)));
        self
    }

    /// Routes stderr into `w`.
    pub fn with_stderr(mut self, w: impl io::Write + 'a) -> Self {
        self.stderr = Some(RefCell::new(Box::new(w)));
        self
    }

    /// The effective stdout.
    pub fn stdout(&self) -> OutHandle<'_, 'a> {
        match &self.stdout {
            Some(w) => OutHandle::Override(w.borrow_mut()),
            None => OutHandle::Stdout(io::stdout()),
        }
    }

    /// The effective stderr.
    pub fn stderr(&self) -> OutHandle<'_, 'a> {
        match &self.stderr {
            Some(w) => OutHandle::Override(w.borrow_mut()),
            None => OutHandle::Stderr(io::stderr()),
        }
    }
}

/// A command: a named node in the dispatch tree.
#[derive(Default)]
pub struct Cmd<'a> {
    /// The one-line usage pattern.
    ///
    /// Text before the first space names the command; multiple names join
    /// with a pipe (`foo|f`). The remainder is a usage hint, e.g.:
    ///
    /// ```text
    /// foo|f [-F file | -D dir]... profile
    /// ```
    pub pattern: String,

    /// Introduces the command briefly.
    pub brief_usage: String,

    /// Flags accessible from this command and all its children.
    pub flags: Option<&'a dyn FlagFinder>,

    /// Flags only accessible from this command; preferred for lookup.
    pub local_flags: Option<&'a dyn FlagFinder>,

    /// The constraint enforced over flags at dispatch.
    pub flag_rule: Option<&'a dyn Rule>,

    /// Invoked root→target before the run hook.
    pub pre_run: Option<PreRunFn<'a>>,

    /// Invoked on the target only.
    pub run: Option<RunFn<'a>>,

    /// Invoked target→root after the run hook returned.
    pub post_run: Option<PostRunFn<'a>>,

    /// Command-specific help handling; falls back to
    /// [`CmdOptions::handle_help_request`].
    pub help: Option<HelpFn<'a>>,

    /// Suggests args for this command during completion.
    pub completion: Option<&'a dyn CompAction>,

    /// Application specific custom data.
    pub extra: Option<Box<dyn Any>>,

    /// Sub-commands belonging to this command.
    pub children: Vec<Cmd<'a>>,

    /// The command's current state.
    pub state: Cell<CmdState>,
}

impl<'a> Cmd<'a> {
    /// The first name in the pattern.
    pub fn name(&self) -> &str {
        let names = self.pattern.split(' ').next().unwrap_or("");
        names.split('|').next().unwrap_or("")
    }

    /// True when `s` is one of this command's names.
    pub fn is(&self, s: &str) -> bool {
        let names = self.pattern.split(' ').next().unwrap_or("");
        !names.is_empty() && names.split('|').any(|name| name == s)
    }

    /// Walks the command tree from this command to the target selected by
    /// `args`, pushing each step onto `route`.
    ///
    /// Flags are decoded along the way (unless
    /// [`CmdOptions::do_not_set_flags`]), positional args are appended to
    /// `pos_buf`, and the returned slice holds the dash args.
    pub fn resolve_target<'c, 'x>(
        &'c self,
        opts: &CmdOptions<'a>,
        route: &mut Route<'c, 'a>,
        pos_buf: &mut Vec<String>,
        args: &'x [String],
    ) -> Result<&'x [String], Error> {
        route.clear();

        let popts = &opts.parse;
        let set_flag_values = !opts.do_not_set_flags;
        let mut cur: &'c Cmd<'a> = self;
        let mut offset = 0;

        loop {
            route.push(cur);
            if cur.children.is_empty() {
                break;
            }

            let report = parse_flags_low_level(
                args,
                route,
                popts,
                ParsePass {
                    offset,
                    append_pos_args: false,
                    stop_at_first_pos_arg: true,
                    set_flag_values,
                },
                pos_buf,
            );

            let parsed = report.parsed;
            let help_at = report.help_at;
            let found_pos_arg = report.found_pos_arg;
            if let Some(err) = report.error {
                if let Some(err) = arg_error(cur, opts, route, args, offset + parsed, help_at, err)
                {
                    return Err(err);
                }
                // dismissed; resolution continues past the bad arg
            }

            offset += parsed;
            if !found_pos_arg || offset >= args.len() {
                // exhausted all args
                if let Some(at) = help_at {
                    return help_request(cur, opts, route, args, at);
                }

                break;
            }

            let expected = &args[offset];
            match cur.children.iter().find(|child| child.is(expected)) {
                None => {
                    if let Some(at) = help_at {
                        return help_request(cur, opts, route, args, at);
                    }

                    // this arg is a positional for the current command
                    break;
                }
                Some(child) => {
                    cur = child;
                    if let Some(at) = help_at {
                        return help_request(cur, opts, route, args, at);
                    }

                    offset += 1;
                }
            }
        }

        let report = parse_flags_low_level(
            args,
            route,
            popts,
            ParsePass {
                offset,
                append_pos_args: true,
                stop_at_first_pos_arg: false,
                set_flag_values,
            },
            pos_buf,
        );

        if let Some(err) = report.error {
            let after_bad = offset + report.parsed;
            if let Some(err) = arg_error(cur, opts, route, args, after_bad, report.help_at, err) {
                return Err(err);
            }
        }

        if let Some(at) = report.help_at {
            return help_request(cur, opts, route, args, at);
        }

        Ok(match report.dash_at {
            Some(dash) => &args[dash + 1..],
            None => &[],
        })
    }

    /// Resolves the target and runs the dispatch: default values, rule
    /// checks and pre-run hooks root→target, the target's run hook, then
    /// post-run hooks target→root.
    pub fn exec(&self, opts: &CmdOptions<'a>, args: &[String]) -> Result<(), Error> {
        let mut route = Route::new();
        let mut pos_buf = Vec::new();
        self.exec_with(opts, &mut route, &mut pos_buf, args)
    }

    /// [`Cmd::exec`] with caller-supplied route and positional buffers.
    pub fn exec_with<'c>(
        &'c self,
        opts: &CmdOptions<'a>,
        route: &mut Route<'c, 'a>,
        pos_buf: &mut Vec<String>,
        args: &[String],
    ) -> Result<(), Error> {
        let dash_args = self.resolve_target(opts, route, pos_buf, args)?;
        let route = &*route;
        let pos_args: &[String] = pos_buf;
        let popts = &opts.parse;

        for (i, cmd) in route.iter().enumerate() {
            if let Some(flags) = cmd.local_flags {
                assign_default_values(flags, popts)?;
            }
            if let Some(flags) = cmd.flags {
                assign_default_values(flags, popts)?;
            }

            if let Some(rule) = cmd.flag_rule {
                if let Some(violation) = rule.nth_violation(route, 0) {
                    return Err(Error::FlagViolation {
                        key: violation.key,
                        code: violation.code,
                    });
                }
            }

            let Some(pre_run) = &cmd.pre_run else {
                continue;
            };

            let state = cmd.state.get();
            if state.pre_run_once() && state.pre_run_called() {
                continue;
            }

            cmd.state.set(state | CmdState::PRE_RUN_CALLED);
            pre_run(opts, route, i, pos_args, dash_args)?;
        }

        let target = route.target().ok_or(Error::EmptyRoute)?;
        let Some(run) = &target.run else {
            let err = Error::NotRunnable {
                name: target.name().to_string(),
            };

            if let Some(handler) = &opts.handle_arg_error {
                return match handler(opts, route, args, None, err) {
                    Some(err) => Err(err),
                    None => Ok(()),
                };
            }

            if let Some(help) = target.help.as_ref().or(opts.handle_help_request.as_ref()) {
                let _ = help(opts, route, args, None);
            }

            return Err(err);
        };

        let mut pending = run(opts, route, pos_args, dash_args).err();
        if opts.skip_post_run {
            return match pending {
                Some(err) => Err(err),
                None => Ok(()),
            };
        }

        for i in (0..route.len()).rev() {
            let Some(cmd) = route.get(i) else {
                continue;
            };
            let Some(post_run) = &cmd.post_run else {
                continue;
            };

            let state = cmd.state.get();
            if state.post_run_once() && state.post_run_called() {
                continue;
            }

            cmd.state.set(state | CmdState::POST_RUN_CALLED);
            match post_run(opts, route, i, pending.take()) {
                Ok(()) => {}
                Err(err) => return Err(err),
            }
        }

        match pending {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn pick_help<'h, 'a>(
    cmd: &'h Cmd<'a>,
    opts: &'h CmdOptions<'a>,
) -> Option<&'h HelpFn<'a>> {
    cmd.help.as_ref().or(opts.handle_help_request.as_ref())
}

fn help_request<'a, T>(
    cmd: &Cmd<'a>,
    opts: &CmdOptions<'a>,
    route: &Route,
    args: &[String],
    help_at: usize,
) -> Result<T, Error> {
    match pick_help(cmd, opts) {
        Some(help) => match help(opts, route, args, Some(help_at)) {
            Ok(()) => Err(Error::HelpHandled),
            Err(err) => Err(err),
        },
        None => Err(Error::HelpPending {
            arg: args.get(help_at).cloned().unwrap_or_default(),
            at: help_at,
        }),
    }
}

// Returns the error that should abort resolution, or `None` when the
// configured handler dismissed it.
fn arg_error<'a>(
    cmd: &Cmd<'a>,
    opts: &CmdOptions<'a>,
    route: &Route,
    args: &[String],
    after_bad: usize,
    help_at: Option<usize>,
    err: Error,
) -> Option<Error> {
    match &opts.handle_arg_error {
        None => {
            if let Some(help) = pick_help(cmd, opts) {
                let _ = help(opts, route, args, help_at);
            }

            Some(err)
        }
        Some(handler) => handler(opts, route, args, after_bad.checked_sub(1), err),
    }
}

/// Iterates all flags of `flags` and decodes the default text (from
/// [`FlagInfo::default_value`](crate::FlagInfo)) into every flag whose value
/// has not been changed yet. A bracketed `[e1, e2, …]` default is decoded
/// element by element.
pub fn assign_default_values(flags: &dyn FlagFinder, opts: &ParseOptions) -> Result<(), Error> {
    let Some(iter) = flags.as_iter() else {
        return Ok(());
    };

    for i in 0.. {
        let Some(info) = iter.nth_flag(i) else {
            break;
        };

        if info.default_value.is_empty() || info.state.value_changed() {
            continue;
        }

        let Some((name, flag)) = find_flag_among(flags, &[&info.name, &info.shorthand]) else {
            let name = if info.name.is_empty() {
                info.shorthand
            } else {
                info.name
            };

            return Err(Error::FlagUndefined { name, at: None });
        };

        if flag.state().value_changed() {
            continue;
        }

        let def = info.default_value.as_str();
        if def.starts_with('[') && def.ends_with(']') {
            let inner = &def[1..def.len() - 1];
            if inner.is_empty() {
                continue;
            }

            for element in inner.split(", ") {
                flag.decode(opts, &name, element, true)?;
            }
        } else {
            flag.decode(opts, &name, def, true)?;
        }
    }

    Ok(())
}
