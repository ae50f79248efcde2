//! The completion engine: classifies the token under the cursor and
//! composes ranked suggestions.

use std::cell::RefCell;
use std::io;
use std::ops::{BitOr, BitOrAssign};

#[cfg(feature = "debug")]
use tracing::debug;

use crate::cmd::{Cmd, CmdOptions};
use crate::error::Error;
use crate::flag::{is_shorthand, Flag};
use crate::indexer::FlagIter;
use crate::route::Route;
use crate::scan::is_similar;
use crate::vp::write_str;

/// Bits managing a completion task's accumulated result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompState(u32);

impl CompState {
    /// Do not use any completion at all.
    pub const FAILED: CompState = CompState(1);
    /// Do not add further items.
    pub const DONE: CompState = CompState(1 << 1);
    /// Flag names have been added.
    pub const HAS_FLAG_NAMES: CompState = CompState(1 << 2);
    /// Flag values have been added.
    pub const HAS_FLAG_VALUES: CompState = CompState(1 << 3);
    /// Sub-command names have been added.
    pub const HAS_SUBCMDS: CompState = CompState(1 << 4);
    /// A file-matching request has been added.
    pub const HAS_FILES: CompState = CompState(1 << 5);
    /// A dir-matching request has been added.
    pub const HAS_DIRS: CompState = CompState(1 << 6);
    /// Shell option: do not append a space after insertion.
    pub const OPTION_NOSPACE: CompState = CompState(1 << 7);
    /// Shell option: do not sort the suggestions.
    pub const OPTION_NOSORT: CompState = CompState(1 << 8);

    /// True when all bits of `other` are set.
    pub fn contains(self, other: CompState) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set.
    pub fn intersects(self, other: CompState) -> bool {
        self.0 & other.0 != 0
    }

    /// True when the failed bit is set.
    pub fn failed(self) -> bool {
        self.contains(CompState::FAILED)
    }

    /// True when the done bit is set.
    pub fn done(self) -> bool {
        self.contains(CompState::DONE)
    }

    /// True when flag values are wanted/added.
    pub fn has_flag_values(self) -> bool {
        self.contains(CompState::HAS_FLAG_VALUES)
    }

    /// True when flag names are wanted/added.
    pub fn has_flag_names(self) -> bool {
        self.contains(CompState::HAS_FLAG_NAMES)
    }

    /// True when sub-commands are wanted/added.
    pub fn has_subcmds(self) -> bool {
        self.contains(CompState::HAS_SUBCMDS)
    }

    /// True when file matching was requested.
    pub fn has_files(self) -> bool {
        self.contains(CompState::HAS_FILES)
    }

    /// True when dir matching was requested.
    pub fn has_dirs(self) -> bool {
        self.contains(CompState::HAS_DIRS)
    }

    /// True when the nospace option is set.
    pub fn option_nospace(self) -> bool {
        self.contains(CompState::OPTION_NOSPACE)
    }

    /// True when the nosort option is set.
    pub fn option_nosort(self) -> bool {
        self.contains(CompState::OPTION_NOSORT)
    }
}

impl BitOr for CompState {
    type Output = CompState;

    fn bitor(self, rhs: CompState) -> CompState {
        CompState(self.0 | rhs.0)
    }
}

impl BitOrAssign for CompState {
    fn bitor_assign(&mut self, rhs: CompState) {
        self.0 |= rhs.0;
    }
}

/// The type of a [`CompItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompKind {
    /// Plain text (e.g. a sub-command name).
    #[default]
    Text,
    /// A flag name; emitters add the hyphen prefix.
    FlagName,
    /// A flag value; emitters add the recorded value prefix.
    FlagValue,
    /// A filesystem file-matching request; the value is a glob pattern.
    Files,
    /// A filesystem dir-matching request; the value is a glob pattern.
    Dirs,
}

/// One completion suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompItem {
    /// The suggested text (or glob pattern for file/dir requests).
    pub value: String,
    /// Help text for the value.
    pub description: String,
    /// What the value is.
    pub kind: CompKind,
}

/// A completion provider: adds possible items according to the task.
pub trait CompAction {
    /// Adds suggestions, returning the count added and state bits to merge
    /// into the task.
    fn suggest(&self, tsk: &mut CompTask) -> (usize, CompState);
}

/// Marks the task failed; disables the default completion behavior.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompDisable;

impl CompAction for CompDisable {
    fn suggest(&self, tsk: &mut CompTask) -> (usize, CompState) {
        tsk.fail();
        (0, CompState::FAILED)
    }
}

/// Adds a predefined suggestion list.
#[derive(Debug, Default, Clone)]
pub struct CompStatic {
    /// The predefined suggestions; prefix-filtered on add.
    pub suggestions: Vec<CompItem>,
    /// When non-zero, only suggest if the task wants any of these bits.
    pub want: CompState,
    /// State bits to merge into the task after adding.
    pub state: CompState,
}

impl CompAction for CompStatic {
    fn suggest(&self, tsk: &mut CompTask) -> (usize, CompState) {
        if self.want != CompState::default() && !tsk.want().intersects(self.want) {
            return (0, CompState::default());
        }

        (tsk.add_matched(false, &self.suggestions), self.state)
    }
}

/// Wraps a function as a completion provider.
pub struct CompFunc<F>(pub F)
where
    F: Fn(&mut CompTask) -> (usize, CompState);

impl<F> CompAction for CompFunc<F>
where
    F: Fn(&mut CompTask) -> (usize, CompState),
{
    fn suggest(&self, tsk: &mut CompTask) -> (usize, CompState) {
        (self.0)(tsk)
    }
}

/// Requests filesystem file matching.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompFiles;

impl CompAction for CompFiles {
    fn suggest(&self, tsk: &mut CompTask) -> (usize, CompState) {
        (tsk.add_files(false, &[]), CompState::default())
    }
}

/// Requests filesystem dir matching.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompDirs;

impl CompAction for CompDirs {
    fn suggest(&self, tsk: &mut CompTask) -> (usize, CompState) {
        (tsk.add_dirs(false, &[]), CompState::default())
    }
}

/// The ambient record of one completion request.
#[derive(Default)]
pub struct CompTask<'c, 'a> {
    debug: RefCell<Option<Box<dyn io::Write + 'a>>>,
    result: Vec<CompItem>,

    // fields below are set by init()

    /// Path of the executable that requested this completion.
    pub executable_path: String,

    /// All args present on the command line, including args after the one
    /// requesting the completion.
    pub args: Vec<String>,

    /// Position of the arg to complete. `at == args.len()` suggests the
    /// next arg; smaller values complete a partial arg.
    pub at: usize,

    /// The value being completed, after stripping any flag-name/value
    /// prefix (for `--foo=s` with `foo` known, this holds `s`).
    pub to_complete: String,

    /// The command route up to the arg to complete.
    pub route: Route<'c, 'a>,

    /// Positional args found before the arg to complete.
    pub pos_args: Vec<String>,

    /// Dash args found before the arg to complete.
    pub dash_args: Vec<String>,

    /// The flag right before the arg to complete that is missing its
    /// value, if any.
    pub flag_missing_value: Option<&'a dyn Flag>,

    /// The prefix emitters re-attach in front of flag-value suggestions
    /// (e.g. `--foo=`).
    pub flag_value_prefix: String,

    state: CompState,
    want: CompState,
}

impl<'c, 'a> CompTask<'c, 'a> {
    /// A fresh task; call [`CompTask::init`] before adding suggestions.
    pub fn new() -> Self {
        CompTask::default()
    }

    /// The unprocessed arg value to complete.
    pub fn raw_to_complete(&self) -> &str {
        self.args.get(self.at).map(String::as_str).unwrap_or("")
    }

    /// Sets the sink [`CompTask::debug`] writes to.
    pub fn set_debug_output(&mut self, out: Box<dyn io::Write + 'a>) {
        *self.debug.borrow_mut() = Some(out);
    }

    /// The wanted-kinds bits established by [`CompTask::init`], consulted
    /// by [`CompTask::add_default`].
    pub fn want(&self) -> CompState {
        self.want
    }

    /// Marks the task failed: it should produce no completion at all.
    pub fn fail(&mut self) {
        self.state |= CompState::FAILED;
    }

    /// Marks the task finished: no more items unless forced.
    pub fn done(&mut self) {
        self.state |= CompState::DONE;
    }

    /// The task's current state bits.
    pub fn state(&self) -> CompState {
        self.state
    }

    /// Writes space-joined messages to the debug sink, if one is set.
    pub fn debug(&self, msgs: &[&str]) {
        let mut sink = self.debug.borrow_mut();
        let Some(out) = sink.as_mut() else {
            return;
        };

        let _ = write_str(out.as_mut(), "[app]");
        for msg in msgs {
            let _ = write_str(out.as_mut(), " ");
            let _ = write_str(out.as_mut(), msg);
        }
        let _ = write_str(out.as_mut(), "\n");
    }

    /// The `i`-th item added so far.
    pub fn nth(&self, i: usize) -> Option<&CompItem> {
        self.result.get(i)
    }

    /// Initializes the task from the command line.
    ///
    /// `args[0]` is expected to be the executable path; `at` is the 0-based
    /// cursor index into `args`. The target is resolved over the args before
    /// the cursor; pass options with
    /// [`do_not_set_flags`](CmdOptions::do_not_set_flags) to keep flag
    /// storage untouched.
    pub fn init(&mut self, root: &'c Cmd<'a>, opts: &CmdOptions<'a>, at: usize, args: &[String]) {
        if args.is_empty() {
            self.executable_path = String::new();
            self.args = Vec::new();
            self.at = 0;
        } else {
            // shift one: the executable path is never completed
            self.executable_path = args[0].clone();
            self.args = args[1..].to_vec();
            self.at = if at == 0 { self.args.len() } else { at - 1 };
        }

        self.to_complete = self.args.get(self.at).cloned().unwrap_or_default();

        let end = self.at.min(self.args.len());
        let resolved = root.resolve_target(opts, &mut self.route, &mut self.pos_args, {
            // resolve over the args before the cursor only
            &self.args[..end]
        });

        match resolved {
            Ok(dash) => self.dash_args = dash.to_vec(),
            Err(Error::FlagValueMissing { name, at }) if end > 0 && at == end - 1 => {
                // the arg before the cursor is a flag missing its value:
                // we are completing that flag's value
                if let Some(flag) = self.route.lookup(&name) {
                    self.want = CompState::HAS_FLAG_VALUES;
                    self.flag_missing_value = Some(flag);
                    return;
                }
            }
            Err(_) => {}
        }

        let to_complete = self.to_complete.clone();
        self.want = match to_complete.as_str() {
            "" => CompState::HAS_FLAG_NAMES | CompState::HAS_SUBCMDS,
            tc if !tc.starts_with('-') => CompState::HAS_SUBCMDS,
            tc if tc.len() > 1 => match tc.find('=') {
                // maybe a sub-command name with a hyphen prefix
                None => CompState::HAS_SUBCMDS | CompState::HAS_FLAG_NAMES,
                Some(pos) => {
                    let (flag_part, value) = (&tc[..pos], &tc[pos + 1..]);
                    let name = if flag_part.as_bytes().get(1).copied() != Some(b'-') {
                        // assume a shorthand (maybe a cluster): its last rune
                        flag_part
                            .char_indices()
                            .last()
                            .map(|(i, _)| &flag_part[i..])
                            .filter(|_| flag_part.len() >= 2)
                    } else if flag_part.len() > 2 && !is_shorthand(&flag_part[2..]) {
                        Some(&flag_part[2..])
                    } else {
                        None
                    };

                    match name.and_then(|n| self.route.lookup(n)) {
                        Some(flag) => {
                            self.flag_missing_value = Some(flag);
                            self.flag_value_prefix = tc[..pos + 1].to_string();
                            self.to_complete = value.to_string();
                            CompState::HAS_FLAG_VALUES
                        }
                        None => CompState::HAS_SUBCMDS,
                    }
                }
            },
            // just a hyphen; maybe a sub-command name with a hyphen prefix
            _ => CompState::HAS_SUBCMDS | CompState::HAS_FLAG_NAMES,
        };

        #[cfg(feature = "debug")]
        debug!(to_complete = %self.to_complete, want = ?self.want, "classified completion cursor");
    }

    /// Adds items without prefix matching.
    pub fn add(&mut self, force: bool, items: &[CompItem]) -> usize {
        if !force && self.state.intersects(CompState::FAILED | CompState::DONE) {
            return 0;
        }

        self.result.extend_from_slice(items);
        items.len()
    }

    /// Adds only the items whose value begins with the completion prefix.
    pub fn add_matched(&mut self, force: bool, items: &[CompItem]) -> usize {
        if !force && self.state.intersects(CompState::FAILED | CompState::DONE) {
            return 0;
        }

        let mut added = 0;
        for item in items {
            if item.value.starts_with(self.to_complete.as_str()) {
                self.result.push(item.clone());
                added += 1;
            }
        }

        added
    }

    /// Composes the default suggestions indicated by [`CompTask::init`]:
    /// the target's provider, then flag values, flag names and sub-command
    /// names as wanted. Each category is added at most once.
    pub fn add_default(&mut self) -> usize {
        let mut added = 0;

        if let Some(action) = self.route.target().and_then(|c| c.completion) {
            let (n, state) = action.suggest(self);
            added += n;
            self.state |= state;
        }

        if self.want.has_flag_values() {
            let flag = self.flag_missing_value;
            let def = flag.map(|f| self.default_value_of(f)).unwrap_or_default();
            added += self.add_flag_values(false, flag, &def, true);
        }

        if self.want.has_flag_names() {
            added += self.add_flag_names(false, true);
        }

        if self.want.has_subcmds() {
            added += self.add_subcmds(false, None, true);
        }

        added
    }

    // The default-value text the route knows for `flag`, empty when the
    // route carries no info entry resolving back to the same flag.
    fn default_value_of(&self, flag: &dyn Flag) -> String {
        for i in 0.. {
            let Some(info) = self.route.nth_flag(i) else {
                break;
            };

            if info.default_value.is_empty() {
                continue;
            }

            let hit = [info.name.as_str(), info.shorthand.as_str()]
                .iter()
                .filter(|n| !n.is_empty())
                .any(|n| {
                    self.route
                        .lookup(n)
                        .is_some_and(|f| std::ptr::eq(f as *const _ as *const (), flag as *const _ as *const ()))
                });

            if hit {
                return info.default_value;
            }
        }

        String::new()
    }

    /// Adds sub-command names of `cmd` (the route target when `None`),
    /// filtered by prefix or similarity against the completion prefix.
    pub fn add_subcmds(&mut self, force: bool, cmd: Option<&Cmd>, descr: bool) -> usize {
        if !force
            && self.state.intersects(
                CompState::HAS_SUBCMDS | CompState::FAILED | CompState::DONE,
            )
        {
            return 0;
        }

        self.state |= CompState::HAS_SUBCMDS;

        let mut candidates: Vec<CompItem> = Vec::new();
        {
            let children = match cmd {
                Some(cmd) => &cmd.children,
                None => match self.route.target() {
                    Some(target) => &target.children,
                    None => return 0,
                },
            };

            for child in children {
                if child.state.get().hidden() {
                    continue;
                }

                let names = child.pattern.split(' ').next().unwrap_or("");
                for name in names.split('|') {
                    if name.is_empty() {
                        continue;
                    }

                    if !name.starts_with(self.to_complete.as_str())
                        && !is_similar(name, &self.to_complete, true)
                    {
                        continue;
                    }

                    candidates.push(CompItem {
                        value: name.to_string(),
                        description: if descr {
                            child.brief_usage.clone()
                        } else {
                            String::new()
                        },
                        kind: CompKind::Text,
                    });
                }
            }
        }

        self.add(force, &candidates)
    }

    /// Adds flag names known to the route, filtered by prefix or
    /// similarity. The completion prefix is expected to be empty or carry a
    /// `-`/`--` prefix.
    pub fn add_flag_names(&mut self, force: bool, descr: bool) -> usize {
        if !force
            && self.state.intersects(
                CompState::HAS_FLAG_NAMES | CompState::FAILED | CompState::DONE,
            )
        {
            return 0;
        }

        self.state |= CompState::HAS_FLAG_NAMES;

        let to_complete = self.to_complete.clone();
        let mut candidates: Vec<CompItem> = Vec::new();

        for i in 0.. {
            let Some(info) = self.route.nth_flag(i) else {
                break;
            };

            let Some((_, flag)) =
                crate::indexer::find_flag_among(&self.route, &[&info.name, &info.shorthand])
            else {
                continue;
            };

            if flag.state().hidden() {
                continue;
            }

            let description = if descr {
                flag.usage().to_string()
            } else {
                String::new()
            };

            if to_complete.is_empty() || to_complete == "-" {
                // every flag name and shorthand qualifies
                if !info.name.is_empty() && !is_shorthand(&info.name) {
                    candidates.push(CompItem {
                        value: info.name.clone(),
                        description: description.clone(),
                        kind: CompKind::FlagName,
                    });
                }

                if is_shorthand(&info.shorthand) {
                    candidates.push(CompItem {
                        value: info.shorthand.clone(),
                        description,
                        kind: CompKind::FlagName,
                    });
                }
            } else if let Some(partial) = to_complete.strip_prefix("--") {
                // long names only
                if info.name.is_empty() || is_shorthand(&info.name) {
                    continue;
                }

                if !info.name.starts_with(partial) && !is_similar(&info.name, partial, true) {
                    continue;
                }

                candidates.push(CompItem {
                    value: info.name.clone(),
                    description,
                    kind: CompKind::FlagName,
                });
            } else if to_complete.starts_with('-') {
                // a shorthand cluster: confirm membership of the shorthand
                let shorthand = if is_shorthand(&info.shorthand) {
                    info.shorthand.as_str()
                } else if is_shorthand(&info.name) {
                    info.name.as_str()
                } else {
                    continue;
                };

                if !to_complete.contains(shorthand) {
                    continue;
                }

                candidates.push(CompItem {
                    value: shorthand.to_string(),
                    description,
                    kind: CompKind::FlagName,
                });
            }
        }

        self.add(force, &candidates)
    }

    /// Adds matched values for `flag`: its completion provider first, then
    /// (with `add_defaults`) the `def` default text (bracketed lists
    /// element-wise) and the value deduced from an unchanged flag that
    /// still prints one.
    pub fn add_flag_values(
        &mut self,
        force: bool,
        flag: Option<&dyn Flag>,
        def: &str,
        add_defaults: bool,
    ) -> usize {
        let Some(flag) = flag else {
            return 0;
        };

        if !force
            && self.state.intersects(
                CompState::HAS_FLAG_VALUES | CompState::FAILED | CompState::DONE,
            )
        {
            return 0;
        }

        self.state |= CompState::HAS_FLAG_VALUES;

        let mut added = 0;
        if let Some(action) = flag.completion() {
            let (n, state) = action.suggest(self);
            added += n;
            self.state |= state;
        }

        if !add_defaults {
            return added;
        }

        if !def.is_empty() {
            if def.starts_with('[') && def.ends_with(']') {
                let changed = flag.state().value_changed();
                for (i, element) in def[1..def.len() - 1].split(", ").enumerate() {
                    if changed && i == 0 {
                        continue;
                    }

                    added += self.add_matched(
                        force,
                        &[CompItem {
                            value: element.to_string(),
                            description: "default value".to_string(),
                            kind: CompKind::FlagValue,
                        }],
                    );
                }
            } else if !flag.state().value_changed() {
                added += self.add_matched(
                    force,
                    &[CompItem {
                        value: def.to_string(),
                        description: "default value".to_string(),
                        kind: CompKind::FlagValue,
                    }],
                );
            }
        }

        // deduce a default from the unchanged current value
        if !flag.state().value_changed() && flag.has_value() {
            let mut buf = Vec::new();
            if flag.print_value(&mut buf).is_ok() {
                if let Ok(value) = String::from_utf8(buf) {
                    added += self.add_matched(
                        force,
                        &[CompItem {
                            value,
                            description: "default value".to_string(),
                            kind: CompKind::FlagValue,
                        }],
                    );
                }
            }
        }

        added
    }

    /// Adds a request to match filesystem files, optionally glob-filtered.
    pub fn add_files(&mut self, force: bool, globs: &[&str]) -> usize {
        if !force
            && self
                .state
                .intersects(CompState::HAS_FILES | CompState::FAILED | CompState::DONE)
        {
            return 0;
        }

        self.state |= CompState::HAS_FILES;
        self.add_fs_requests(force, globs, CompKind::Files)
    }

    /// Adds a request to match filesystem dirs, optionally glob-filtered.
    pub fn add_dirs(&mut self, force: bool, globs: &[&str]) -> usize {
        if !force
            && self
                .state
                .intersects(CompState::HAS_DIRS | CompState::FAILED | CompState::DONE)
        {
            return 0;
        }

        self.state |= CompState::HAS_DIRS;
        self.add_fs_requests(force, globs, CompKind::Dirs)
    }

    fn add_fs_requests(&mut self, force: bool, globs: &[&str], kind: CompKind) -> usize {
        let mut added = 0;
        for glob in globs {
            if glob.is_empty() {
                continue;
            }

            added += self.add(
                force,
                &[CompItem {
                    value: glob.to_string(),
                    description: String::new(),
                    kind,
                }],
            );
        }

        if added == 0 {
            added += self.add(
                force,
                &[CompItem {
                    kind,
                    ..CompItem::default()
                }],
            );
        }

        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::{BoolFlagV, StrFlagV};
    use crate::indexer::MapIndexer;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn comp_opts<'o>() -> CmdOptions<'o> {
        CmdOptions {
            do_not_set_flags: true,
            parse: crate::parse::ParseOptions {
                help_args: Some(Vec::new()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn values(tsk: &CompTask) -> Vec<String> {
        (0..)
            .map_while(|i| tsk.nth(i))
            .map(|item| item.value.clone())
            .collect()
    }

    fn tree<'a>(flags: &'a MapIndexer<'a>) -> Cmd<'a> {
        Cmd {
            pattern: "root".to_string(),
            flags: Some(flags),
            children: vec![
                Cmd {
                    pattern: "completion".to_string(),
                    brief_usage: "shell completion".to_string(),
                    ..Cmd::default()
                },
                Cmd {
                    pattern: "generic|gen".to_string(),
                    brief_usage: "generic things".to_string(),
                    ..Cmd::default()
                },
                Cmd {
                    pattern: "secret".to_string(),
                    state: std::cell::Cell::new(crate::cmd::CmdState::HIDDEN),
                    ..Cmd::default()
                },
            ],
            ..Cmd::default()
        }
    }

    #[test]
    fn subcmd_prefix() {
        let flags = MapIndexer::new();
        let root = tree(&flags);

        let mut tsk = CompTask::new();
        tsk.init(&root, &comp_opts(), 1, &args(&["/bin/app", "c"]));
        assert_eq!(tsk.to_complete, "c");
        assert!(tsk.want().has_subcmds());
        assert!(!tsk.want().has_flag_names());

        tsk.add_default();
        assert_eq!(values(&tsk), vec!["completion".to_string()]);
        assert_eq!(tsk.nth(0).unwrap().description, "shell completion");
    }

    #[test]
    fn empty_token_wants_flags_and_subcmds() {
        let s = StrFlagV::default();
        let hidden = BoolFlagV::default().hidden();
        let mut flags = MapIndexer::new();
        flags.add(&s, &["string", "s"]);
        flags.add(&hidden, &["ghost"]);
        let root = tree(&flags);

        let mut tsk = CompTask::new();
        tsk.init(&root, &comp_opts(), 1, &args(&["/bin/app", ""]));
        assert!(tsk.want().has_subcmds() && tsk.want().has_flag_names());

        tsk.add_default();
        let got = values(&tsk);
        assert!(got.contains(&"string".to_string()));
        assert!(got.contains(&"s".to_string()));
        assert!(got.contains(&"completion".to_string()));
        assert!(got.contains(&"generic".to_string()));
        assert!(got.contains(&"gen".to_string()));
        // hidden flags and commands never suggest
        assert!(!got.contains(&"ghost".to_string()));
        assert!(!got.contains(&"secret".to_string()));
    }

    #[test]
    fn add_default_is_idempotent() {
        let s = StrFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&s, &["string", "s"]);
        let root = tree(&flags);

        let mut tsk = CompTask::new();
        tsk.init(&root, &comp_opts(), 1, &args(&["/bin/app", ""]));
        let first = tsk.add_default();
        assert!(first > 0);
        assert_eq!(tsk.add_default(), 0);
        assert_eq!(values(&tsk).len(), first);
    }

    #[test]
    fn long_flag_value_position() {
        let s = StrFlagV::default().completion(CompStatic {
            suggestions: vec![
                CompItem {
                    value: "alpha".to_string(),
                    ..CompItem::default()
                },
                CompItem {
                    value: "beta".to_string(),
                    ..CompItem::default()
                },
            ],
            ..CompStatic::default()
        });
        let mut flags = MapIndexer::new();
        flags.add(&s, &["string", "s"]);
        let root = tree(&flags);

        let mut tsk = CompTask::new();
        tsk.init(&root, &comp_opts(), 1, &args(&["/bin/app", "--string=a"]));
        assert!(tsk.want().has_flag_values());
        assert_eq!(tsk.to_complete, "a");
        assert_eq!(tsk.flag_value_prefix, "--string=");

        tsk.add_default();
        assert_eq!(values(&tsk), vec!["alpha".to_string()]);
    }

    #[test]
    fn unknown_long_flag_value_wants_subcmds() {
        let flags = MapIndexer::new();
        let root = tree(&flags);

        let mut tsk = CompTask::new();
        tsk.init(&root, &comp_opts(), 1, &args(&["/bin/app", "--nope=x"]));
        assert!(tsk.want().has_subcmds());
        assert!(!tsk.want().has_flag_values());
    }

    #[test]
    fn cluster_tail_flag_value() {
        let s = StrFlagV::default();
        let v = BoolFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&s, &["string", "s"]);
        flags.add(&v, &["verbose", "v"]);
        let root = tree(&flags);

        let mut tsk = CompTask::new();
        tsk.init(&root, &comp_opts(), 1, &args(&["/bin/app", "-vs=x"]));
        assert!(tsk.want().has_flag_values());
        assert_eq!(tsk.flag_value_prefix, "-vs=");
        assert_eq!(tsk.to_complete, "x");
    }

    #[test]
    fn missing_value_shifts_to_flag_values() {
        let s = StrFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&s, &["string", "s"]);
        let root = tree(&flags);

        let mut tsk = CompTask::new();
        tsk.init(&root, &comp_opts(), 2, &args(&["/bin/app", "--string", ""]));
        assert!(tsk.want().has_flag_values());
        assert!(tsk.flag_missing_value.is_some());
    }

    #[test]
    fn long_prefix_filters_flag_names() {
        let s = StrFlagV::default();
        let v = BoolFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&s, &["string", "s"]);
        flags.add(&v, &["verbose", "v"]);
        let root = tree(&flags);

        let mut tsk = CompTask::new();
        tsk.init(&root, &comp_opts(), 1, &args(&["/bin/app", "--st"]));
        tsk.add_default();
        assert_eq!(values(&tsk), vec!["string".to_string()]);
    }

    #[test]
    fn disable_marks_failed() {
        let mut tsk = CompTask::new();
        let (_, state) = CompDisable.suggest(&mut tsk);
        assert!(state.failed());
        assert!(tsk.state().failed());
        assert_eq!(
            tsk.add(
                false,
                &[CompItem {
                    value: "x".to_string(),
                    ..CompItem::default()
                }]
            ),
            0
        );
        assert_eq!(
            tsk.add(
                true,
                &[CompItem {
                    value: "x".to_string(),
                    ..CompItem::default()
                }]
            ),
            1
        );
    }

    #[test]
    fn fs_requests() {
        let mut tsk = CompTask::new();
        assert_eq!(tsk.add_files(false, &["*.rs", "*.toml"]), 2);
        // a second request of the same category is suppressed
        assert_eq!(tsk.add_files(false, &[]), 0);
        assert_eq!(tsk.add_dirs(false, &[]), 1);

        assert_eq!(tsk.nth(0).unwrap().kind, CompKind::Files);
        assert_eq!(tsk.nth(2).unwrap().kind, CompKind::Dirs);
        assert_eq!(tsk.nth(2).unwrap().value, "");
    }
}
