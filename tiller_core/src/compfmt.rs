//! Shell-specific completion result emitters.

use std::io;

use crate::comp::{CompItem, CompKind, CompTask};
use crate::flag::is_shorthand;
use crate::vp::write_str;

/// A completion result formatter for one shell dialect.
pub trait CompFmt {
    /// Writes one item per line with shell specific escaping.
    fn format(&self, out: &mut dyn io::Write, tsk: &CompTask) -> io::Result<()>;
}

fn first_line(s: &str) -> &str {
    s.split('\n').next().unwrap_or("")
}

fn write_line(out: &mut dyn io::Write, s: &str) -> io::Result<usize> {
    write_str(out, first_line(s))
}

fn write_spaces(out: &mut dyn io::Write, count: usize) -> io::Result<()> {
    for _ in 0..count {
        write_str(out, " ")?;
    }
    Ok(())
}

fn flag_name_prefix(value: &str) -> &'static str {
    if is_shorthand(value) {
        "-"
    } else {
        "--"
    }
}

/// The bash emitter.
///
/// Produces two kinds of lines:
/// - `' <value>'` (space prefixed): arguments to the bash `_filedir`
///   function. No other line can carry this prefix.
/// - everything else: a COMPREPLY element, with an optional description
///   aligned past the longest value.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompFmtBash {
    /// `$COLUMNS` of the completing shell.
    pub cols: usize,

    /// `$COMP_TYPE` of the completing shell:
    ///
    /// - `'\t'` (9) normal completion
    /// - `'?'` (63) listing after successive tabs
    /// - `'!'` (33) listing alternatives on partial word completion
    /// - `'@'` (64) listing if the word is not unmodified
    /// - `'%'` (37) menu completion
    /// - `'*'` (42) insert completion
    pub comp_type: u32,
}

impl CompFmtBash {
    fn escape_spaces(&self, out: &mut dyn io::Write, s: &str) -> io::Result<usize> {
        let mut n = 0;
        for c in first_line(s).chars() {
            if c == ' ' {
                n += write_str(out, "\\ ")?;
            } else {
                let mut buf = [0u8; 4];
                n += write_str(out, c.encode_utf8(&mut buf))?;
            }
        }
        Ok(n)
    }
}

// display width of a value once spaces are backslash-escaped, plus the
// hyphen prefix of flag names
fn bash_cell_width(item: &CompItem) -> usize {
    let mut width = item.value.chars().count() + item.value.matches(' ').count();
    if item.kind == CompKind::FlagName {
        width += flag_name_prefix(&item.value).len();
    }
    width
}

impl CompFmt for CompFmtBash {
    fn format(&self, out: &mut dyn io::Write, tsk: &CompTask) -> io::Result<()> {
        let omit_description = matches!(self.comp_type, 37 | 42);

        let mut indent = 0;
        if !omit_description {
            // align to the longest value, assuming a monospace font
            for i in 0.. {
                let Some(item) = tsk.nth(i) else {
                    break;
                };

                indent = indent.max(bash_cell_width(item));
            }

            indent += 4;
        }

        let mut want_files = false;
        let mut want_dirs = false;

        for i in 0.. {
            let Some(item) = tsk.nth(i) else {
                break;
            };

            match item.kind {
                CompKind::Files => {
                    want_files = true;
                    continue;
                }
                CompKind::Dirs => {
                    want_dirs = true;
                    continue;
                }
                CompKind::FlagValue => {
                    if item.value.is_empty() {
                        continue;
                    }

                    self.escape_spaces(out, &tsk.flag_value_prefix)?;
                }
                CompKind::FlagName => {
                    if item.value.is_empty() {
                        continue;
                    }

                    write_str(out, flag_name_prefix(&item.value))?;
                }
                CompKind::Text => {
                    if item.value.is_empty() {
                        continue;
                    }
                }
            }

            self.escape_spaces(out, &item.value)?;

            if !omit_description && !item.description.is_empty() {
                // a single suggestion needs no explanation
                let lonely = i == 0 && tsk.nth(1).is_none();
                let desc_cap = self.cols.saturating_sub(indent);

                if !lonely && desc_cap > 0 {
                    // the pad counts the escaped value only, never the
                    // hyphen prefix of flag names
                    let value_width =
                        item.value.chars().count() + item.value.matches(' ').count();
                    write_spaces(out, indent.saturating_sub(value_width))?;

                    let desc_len = item.description.chars().count();
                    if desc_len <= desc_cap {
                        write_line(out, &item.description)?;
                    } else {
                        let cut: String = first_line(&item.description)
                            .chars()
                            .take(desc_cap.saturating_sub(3))
                            .collect();
                        write_str(out, &cut)?;
                        write_str(out, "...")?;
                    }
                }
            }

            write_str(out, "\n")?;
        }

        // the space prefix is unreachable by any other line
        if want_files {
            tsk.debug(&["add", "file", "matching"]);
            write_str(out, "\x20")?;
        } else if want_dirs {
            tsk.debug(&["add", "dir", "matching"]);
            write_str(out, "\x20-d")?;
        }

        if want_files || want_dirs {
            write_fs_filters(out, tsk, "\x20'", "'\n")?;
        }

        Ok(())
    }
}

fn write_fs_filters(
    out: &mut dyn io::Write,
    tsk: &CompTask,
    open: &str,
    close: &str,
) -> io::Result<()> {
    let mut has_filter = false;
    for i in 0.. {
        let Some(item) = tsk.nth(i) else {
            break;
        };

        if !matches!(item.kind, CompKind::Files | CompKind::Dirs) || item.value.is_empty() {
            continue;
        }

        if has_filter {
            write_str(out, "|")?;
        } else {
            has_filter = true;
            write_str(out, open)?;
        }

        write_line(out, &item.value)?;
    }

    if has_filter {
        write_str(out, close)?;
    } else {
        write_str(out, "\n")?;
    }

    Ok(())
}

/// The zsh emitter.
///
/// Produces two kinds of lines:
/// - `<value>:<description>` for the zsh `_describe` function, colons
///   backslash-escaped in both fields.
/// - `:<argument-spec>` (colon prefixed) for the zsh `_arguments` function,
///   used for filename and dirname completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompFmtZsh;

impl CompFmtZsh {
    fn escape_colons(&self, out: &mut dyn io::Write, s: &str) -> io::Result<usize> {
        let mut n = 0;
        for c in first_line(s).chars() {
            if c == ':' {
                n += write_str(out, "\\:")?;
            } else {
                let mut buf = [0u8; 4];
                n += write_str(out, c.encode_utf8(&mut buf))?;
            }
        }
        Ok(n)
    }
}

impl CompFmt for CompFmtZsh {
    fn format(&self, out: &mut dyn io::Write, tsk: &CompTask) -> io::Result<()> {
        let mut want_files = false;
        let mut want_dirs = false;

        for i in 0.. {
            let Some(item) = tsk.nth(i) else {
                break;
            };

            match item.kind {
                CompKind::Files => {
                    want_files = true;
                    continue;
                }
                CompKind::Dirs => {
                    want_dirs = true;
                    continue;
                }
                CompKind::FlagValue => {
                    if item.value.is_empty() {
                        continue;
                    }

                    self.escape_colons(out, &tsk.flag_value_prefix)?;
                }
                CompKind::FlagName => {
                    if item.value.is_empty() {
                        continue;
                    }

                    write_str(out, flag_name_prefix(&item.value))?;
                }
                CompKind::Text => {
                    if item.value.is_empty() {
                        continue;
                    }
                }
            }

            self.escape_colons(out, &item.value)?;

            if !item.description.is_empty() {
                write_str(out, ":")?;
                self.escape_colons(out, &item.description)?;
            }

            write_str(out, "\n")?;
        }

        // the colon prefix is unreachable by any other line
        if want_files {
            write_str(out, ":*:filename:_files")?;
        } else if want_dirs {
            write_str(out, ":*:dirname:_files -/")?;
        }

        if want_files || want_dirs {
            write_fs_filters(out, tsk, " -g (", ")\n")?;
        }

        Ok(())
    }
}

/// The powershell emitter.
///
/// Produces two kinds of lines:
/// - `<value> ;<description>` (note the unescaped semi-colon) for creating
///   CompletionResult items.
/// - `;<argument-spec>` (semi-colon prefixed) for filesystem completion.
#[derive(Debug, Default, Clone)]
pub struct CompFmtPwsh {
    /// The PowerShell completion mode: `TabCompleteNext` (default windows
    /// style), `Complete` (works like bash) or `MenuComplete` (works like
    /// zsh).
    pub mode: String,
}

fn is_pwsh_special(c: char) -> bool {
    matches!(
        c,
        '\t' | ' '
            | '\r'
            | '\n'
            | '\0'
            | '{'
            | '}'
            | '('
            | ')'
            | '<'
            | '>'
            | '#'
            | '@'
            | '$'
            | ';'
            | ','
            | '\''
            | '"'
            | '`'
            | '\\'
            | '&'
            | '|'
    )
}

impl CompFmtPwsh {
    fn escape_special(&self, out: &mut dyn io::Write, s: &str) -> io::Result<usize> {
        let mut n = 0;
        for c in first_line(s).chars() {
            if is_pwsh_special(c) {
                n += write_str(out, "`")?;
            }

            let mut buf = [0u8; 4];
            n += write_str(out, c.encode_utf8(&mut buf))?;
        }
        Ok(n)
    }
}

impl CompFmt for CompFmtPwsh {
    fn format(&self, out: &mut dyn io::Write, tsk: &CompTask) -> io::Result<()> {
        let aligned = self.mode == "Complete";

        let mut indent = 0;
        if aligned {
            for i in 0.. {
                let Some(item) = tsk.nth(i) else {
                    break;
                };

                let mut width = item.value.chars().count();
                if item.kind == CompKind::FlagName {
                    width += flag_name_prefix(&item.value).len();
                }

                indent = indent.max(width);
            }

            indent += 4;
        }

        let mut want_files = false;
        let mut want_dirs = false;

        for i in 0.. {
            let Some(item) = tsk.nth(i) else {
                break;
            };

            match item.kind {
                CompKind::Files => {
                    want_files = true;
                    continue;
                }
                CompKind::Dirs => {
                    want_dirs = true;
                    continue;
                }
                CompKind::FlagValue => {
                    if item.value.is_empty() {
                        continue;
                    }

                    self.escape_special(out, &tsk.flag_value_prefix)?;
                }
                CompKind::FlagName => {
                    if item.value.is_empty() {
                        continue;
                    }

                    write_str(out, flag_name_prefix(&item.value))?;
                }
                CompKind::Text => {
                    if item.value.is_empty() {
                        continue;
                    }
                }
            }

            self.escape_special(out, &item.value)?;

            if !item.description.is_empty() {
                write_str(out, " ;")?;

                let lonely = i == 0 && tsk.nth(1).is_none();
                if aligned && lonely {
                    // a single suggestion needs no explanation
                } else {
                    if aligned {
                        write_spaces(out, indent.saturating_sub(item.value.chars().count()))?;
                    }

                    write_line(out, &item.description)?;
                }
            }

            write_str(out, "\n")?;
        }

        if want_files || want_dirs {
            // the semi-colon prefix is unreachable by any other line
            write_str(out, ";")?;

            let mut has_filter = false;
            for i in 0.. {
                let Some(item) = tsk.nth(i) else {
                    break;
                };

                if !matches!(item.kind, CompKind::Files | CompKind::Dirs)
                    || item.value.is_empty()
                {
                    continue;
                }

                if has_filter {
                    write_str(out, "|")?;
                } else {
                    has_filter = true;
                    write_str(out, "'(")?;
                }

                write_line(out, &item.value)?;
            }

            if has_filter {
                write_str(out, ")'\n")?;
            } else {
                write_str(out, "'")?;
                write_str(out, &tsk.to_complete)?;
                write_str(out, "*'\n")?;
            }
        }

        Ok(())
    }
}
