//! The `completion` command subtree: per-shell script generation and the
//! `complete` operation speaking the completion wire protocol.

use std::cell::Cell;
use std::fs::OpenOptions;
use std::io;
use std::time::{Duration, Instant};

use crate::cmd::{Cmd, CmdOptions, CmdState};
use crate::comp::CompTask;
use crate::compfmt::{CompFmt, CompFmtBash, CompFmtPwsh, CompFmtZsh};
use crate::error::Error;
use crate::flag::{DurationFlagV, Flag, StrFlagV, UintFlagV};
use crate::indexer::{FlagFinder, FlagInfo, FlagIter};
use crate::parse::ParseOptions;
use crate::route::Route;
use crate::rules::AllOf;
use crate::vp::write_str;

const DEFAULT_TIMEOUT_NANOS: i64 = 5_000_000_000;

/// Wires up the shell completion commands:
///
/// - `bash {,complete}`
/// - `zsh {,complete}`
/// - `pwsh {,complete}`
///
/// The command returned by [`CompShells::command`] should become a direct
/// child of the application's root command. Invoking a shell command
/// without the `complete` operation emits the driver script for that shell.
pub struct CompShells {
    at: UintFlagV,
    timeout: DurationFlagV,
    debug_file: StrFlagV,
    rule: AllOf,
}

impl Default for CompShells {
    fn default() -> Self {
        CompShells::new(DEFAULT_TIMEOUT_NANOS)
    }
}

impl CompShells {
    /// Prepares the completion flags. A negative `default_timeout_nanos`
    /// selects the 5s default; zero disables the time limit.
    pub fn new(default_timeout_nanos: i64) -> Self {
        let timeout = if default_timeout_nanos < 0 {
            DEFAULT_TIMEOUT_NANOS
        } else {
            default_timeout_nanos
        };

        CompShells {
            at: UintFlagV::default().brief("set arg index the cursor currently at"),
            timeout: DurationFlagV::new(timeout)
                .brief("set the duration to wait for a completion task"),
            debug_file: StrFlagV::default().brief("write internal debug messages to this file"),
            rule: AllOf::new(["at"]),
        }
    }

    /// Builds the completion command subtree. An empty `name` selects
    /// `completion`; `hide` keeps the command out of completion output.
    pub fn command<'s>(&'s self, name: &str, hide: bool) -> Cmd<'s> {
        let name = if name.is_empty() { "completion" } else { name };
        let mut state = CmdState::default();
        if hide {
            state |= CmdState::HIDDEN;
        }

        Cmd {
            pattern: name.to_string(),
            brief_usage: "shell completion".to_string(),
            state: Cell::new(state),
            children: vec![
                self.shell_command(Shell::Bash),
                self.shell_command(Shell::Zsh),
                self.shell_command(Shell::Pwsh),
            ],
            ..Cmd::default()
        }
    }

    fn shell_command(&self, shell: Shell) -> Cmd<'_> {
        Cmd {
            pattern: shell.name().to_string(),
            run: Some(Box::new(move |opts, route, _pos, _dash| {
                write_script(opts, route, shell.script())
            })),
            help: Some(Box::new(move |opts, route, _args, _at| {
                write_script(opts, route, shell.usage())
            })),
            children: vec![self.complete_command()],
            ..Cmd::default()
        }
    }

    fn complete_command(&self) -> Cmd<'_> {
        Cmd {
            pattern: "complete".to_string(),
            brief_usage: "Handle shell completion request".to_string(),
            flag_rule: Some(&self.rule),
            local_flags: Some(self),
            run: Some(Box::new(move |opts, route, pos, dash| {
                self.run_complete(opts, route, pos, dash)
            })),
            ..Cmd::default()
        }
    }

    fn run_complete(
        &self,
        opts: &CmdOptions,
        route: &Route,
        pos_args: &[String],
        dash_args: &[String],
    ) -> Result<(), Error> {
        let shell = route
            .parent()
            .map(|c| c.name().to_string())
            .unwrap_or_default();

        let mut tsk = CompTask::new();

        let debug_file = self.debug_file.get();
        if !debug_file.is_empty() {
            match OpenOptions::new().create(true).append(true).open(&debug_file) {
                Ok(file) => tsk.set_debug_output(Box::new(file)),
                Err(_) => tsk.set_debug_output(Box::new(io::stderr())),
            }
        }

        let fmt: Box<dyn CompFmt> = match shell.as_str() {
            "bash" => {
                let (cols, comp_type) = parse_bash_env(&tsk, pos_args);
                Box::new(CompFmtBash { cols, comp_type })
            }
            "zsh" => Box::new(CompFmtZsh),
            _ => {
                let mode = pos_args.first().cloned().unwrap_or_default();
                tsk.debug(&["mode =", &mode]);
                Box::new(CompFmtPwsh { mode })
            }
        };

        // the engine must not mutate application flag storage, and the
        // completed command line gets no help handling
        let ctx = CmdOptions {
            do_not_set_flags: true,
            parse: ParseOptions {
                start_time: opts.parse.start_time,
                help_args: Some(Vec::new()),
                ..ParseOptions::default()
            },
            ..CmdOptions::default()
        };

        let root = route.root().ok_or(Error::EmptyRoute)?;
        tsk.init(root, &ctx, self.at.get() as usize, dash_args);

        let timeout = self.timeout.get();
        let deadline = (timeout > 0)
            .then(|| Instant::now().checked_add(Duration::from_nanos(timeout as u64)))
            .flatten();

        tsk.add_default();

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                let mut text = Vec::new();
                let _ = crate::scan::write_duration(&mut text, timeout as u64);
                tsk.debug(&[
                    "timeout after",
                    String::from_utf8_lossy(&text).as_ref(),
                ]);
                return Err(Error::Timeout);
            }
        }

        let mut out = opts.stdout();
        if let Err(err) = write_completions(&mut out, &tsk, fmt.as_ref()) {
            tsk.debug(&["error writing completion result:", &err.to_string()]);
            return Ok(());
        }

        tsk.debug(&["done."]);
        Ok(())
    }
}

impl FlagFinder for CompShells {
    fn find_flag(&self, name: &str) -> Option<&dyn Flag> {
        match name {
            "at" => Some(&self.at),
            "timeout" => Some(&self.timeout),
            "debug-file" => Some(&self.debug_file),
            _ => None,
        }
    }

    fn as_iter(&self) -> Option<&dyn FlagIter> {
        Some(self)
    }
}

impl FlagIter for CompShells {
    fn nth_flag(&self, i: usize) -> Option<FlagInfo> {
        let (name, flag): (&str, &dyn Flag) = match i {
            0 => ("at", &self.at),
            1 => ("timeout", &self.timeout),
            2 => ("debug-file", &self.debug_file),
            _ => return None,
        };

        Some(FlagInfo {
            name: name.to_string(),
            state: flag.state(),
            ..FlagInfo::default()
        })
    }
}

#[derive(Clone, Copy)]
enum Shell {
    Bash,
    Zsh,
    Pwsh,
}

impl Shell {
    fn name(self) -> &'static str {
        match self {
            Shell::Bash => "bash",
            Shell::Zsh => "zsh",
            Shell::Pwsh => "pwsh",
        }
    }

    fn script(self) -> &'static str {
        match self {
            Shell::Bash => include_str!("../scripts/bash-comp.sh"),
            Shell::Zsh => include_str!("../scripts/zsh-comp.sh"),
            Shell::Pwsh => include_str!("../scripts/pwsh-comp.ps1"),
        }
    }

    fn usage(self) -> &'static str {
        match self {
            Shell::Bash => include_str!("../scripts/bash-usage.txt"),
            Shell::Zsh => include_str!("../scripts/zsh-usage.txt"),
            Shell::Pwsh => include_str!("../scripts/pwsh-usage.txt"),
        }
    }
}

// The bash driver passes "$COLUMNS,$COMP_TYPE" as its only positional.
fn parse_bash_env(tsk: &CompTask, pos_args: &[String]) -> (usize, u32) {
    let Some(arg) = pos_args.first() else {
        tsk.debug(&["cols = 80 compType = 9"]);
        return (80, 9);
    };

    let Some((cols_text, type_text)) = arg.split_once(',') else {
        tsk.debug(&["bad cols,compType arg", arg]);
        return (80, 9);
    };

    let cols = cols_text.parse().unwrap_or(80);
    let comp_type = if type_text.is_empty() {
        9
    } else {
        type_text.parse().unwrap_or(9)
    };

    tsk.debug(&["cols =", cols_text, "compType =", type_text]);
    (cols, comp_type)
}

fn write_script(opts: &CmdOptions, route: &Route, template: &str) -> Result<(), Error> {
    let root_name = route.root().map(|c| c.name()).unwrap_or_default();
    let comp_name = route.get(1).map(|c| c.name()).unwrap_or("completion");

    let mut out = opts.stdout();
    let _ = substitute_placeholders(&mut out, template, root_name, comp_name);
    Ok(())
}

/// Writes `template` with the `<ROOT_NAME>`, `<ROOT_IDENT>` and
/// `<COMP_CMD>` placeholders substituted.
///
/// `<ROOT_IDENT>` is the root name with every character outside
/// `[a-zA-Z0-9_]` replaced by an underscore.
pub fn substitute_placeholders(
    out: &mut dyn io::Write,
    template: &str,
    root_name: &str,
    comp_cmd_name: &str,
) -> io::Result<usize> {
    let ident: String = root_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let text = template
        .replace("<ROOT_IDENT>", &ident)
        .replace("<ROOT_NAME>", root_name)
        .replace("<COMP_CMD>", comp_cmd_name);

    write_str(out, &text)
}

/// Writes the completion wire output: one line of comma-separated options
/// (`nospace`, `nosort`), then the shell-formatted suggestion lines. A
/// failed task writes nothing.
pub fn write_completions(
    out: &mut dyn io::Write,
    tsk: &CompTask,
    fmt: &dyn CompFmt,
) -> io::Result<()> {
    let state = tsk.state();
    if state.failed() {
        return Ok(());
    }

    let mut wrote = false;
    if state.option_nospace() {
        write_str(out, "nospace")?;
        tsk.debug(&["add option: nospace"]);
        wrote = true;
    }

    if state.option_nosort() {
        if wrote {
            write_str(out, ",")?;
        }

        write_str(out, "nosort")?;
        tsk.debug(&["add option: nosort"]);
    }

    write_str(out, "\n")?;

    tsk.debug(&["done adding options, now adding completions"]);
    fmt.format(out, tsk)
}
