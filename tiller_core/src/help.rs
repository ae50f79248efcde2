//! Default help handlers: route line, brief usage, sub-command list and an
//! aligned flags table written to stderr.

use std::io;

use crate::cmd::{Cmd, CmdOptions};
use crate::comp::{CompAction, CompState, CompTask};
use crate::error::Error;
use crate::flag::{is_shorthand, Flag};
use crate::indexer::{find_flag_among, FlagInfo, FlagIter};
use crate::route::{format_route, Route};
use crate::rules::{rule_contains_any, rule_requires_any};
use crate::vp::write_str;

/// Commonly used command metadata, carried via [`Cmd::extra`] for
/// documentation purposes. All values should come without leading or
/// trailing whitespace and without their own `DEPRECATED:`-style prefixes.
#[derive(Default)]
pub struct CmdHelp {
    /// Typical use cases of the command.
    pub example: String,

    /// The detailed description of the command.
    pub long_description: String,

    /// Why the command is experimental.
    pub experimental: String,

    /// The deprecation message of the command.
    pub deprecation: String,

    /// Upgrade notice of the command.
    pub changelog: String,
}

/// Commonly used flag metadata, carried via a flag's extra payload.
#[derive(Default)]
pub struct FlagHelp {
    /// Why the flag is experimental.
    pub experimental: String,

    /// The deprecation message of the flag.
    pub deprecation: String,

    /// Upgrade notice of the flag.
    pub changelog: String,

    /// Suggests values for the flag.
    pub completion: Option<Box<dyn CompAction>>,
}

impl CompAction for FlagHelp {
    fn suggest(&self, tsk: &mut CompTask) -> (usize, CompState) {
        match &self.completion {
            Some(action) => action.suggest(tsk),
            None => (0, CompState::default()),
        }
    }
}

/// The stock help handler: prints the usage text of the target command to
/// stderr. Suitable for [`CmdOptions::handle_help_request`].
pub fn handle_help_request(
    opts: &CmdOptions,
    route: &Route,
    args: &[String],
    help_at: Option<usize>,
) -> Result<(), Error> {
    let _ = (args, help_at);
    let mut out = opts.stderr();
    let _ = write_usage(&mut out, route, None);
    Ok(())
}

/// An arg-error handler printing the error followed by the target command's
/// usage text to stderr; the error is kept. The closure form for
/// [`CmdOptions::handle_arg_error`]:
///
/// ```ignore
/// opts.handle_arg_error = Some(Box::new(|opts, route, args, at, err| {
///     tiller_core::help::handle_arg_error_as_help(opts, route, args, at, err)
/// }));
/// ```
pub fn handle_arg_error_as_help(
    opts: &CmdOptions,
    route: &Route,
    _args: &[String],
    _bad_arg_at: Option<usize>,
    err: Error,
) -> Option<Error> {
    let mut out = opts.stderr();
    let _ = write_usage(&mut out, route, Some(&err));
    Some(err)
}

fn write_when(
    out: &mut dyn io::Write,
    content: &str,
    suffix: &str,
    prefixes: &[&str],
) -> io::Result<usize> {
    if content.is_empty() {
        return Ok(0);
    }

    let mut n = 0;
    for prefix in prefixes {
        if !prefix.is_empty() {
            n += write_str(out, prefix)?;
        }
    }

    n += write_str(out, content)?;
    if !suffix.is_empty() {
        n += write_str(out, suffix)?;
    }

    Ok(n)
}

fn write_spaces(out: &mut dyn io::Write, count: usize) -> io::Result<usize> {
    for _ in 0..count {
        write_str(out, " ")?;
    }
    Ok(count)
}

fn has_route_line(route: &Route) -> bool {
    route.iter().any(|cmd| !cmd.name().is_empty())
}

fn write_usage(out: &mut dyn io::Write, route: &Route, err: Option<&Error>) -> io::Result<()> {
    let Some(target) = route.target() else {
        return Ok(());
    };

    if let Some(err) = err {
        // keep the error line whole even if the rest fails
        let _ = write_str(out, "Error: ");
        let _ = write_str(out, &err.to_string());
        let _ = write_str(out, "\n\n");
    }

    if let Some(help) = target
        .extra
        .as_ref()
        .and_then(|extra| extra.downcast_ref::<CmdHelp>())
    {
        write_cmd_help(out, route, help)?;
        return Ok(());
    }

    if has_route_line(route) {
        format_route(out, route, " ")?;
    }

    write_when(out, &target.brief_usage, "", &["\n\n"])?;
    write_subcmds(out, &target.children)?;
    write_target_flags(out, route)?;
    Ok(())
}

fn write_cmd_help(out: &mut dyn io::Write, route: &Route, help: &CmdHelp) -> io::Result<()> {
    let Some(target) = route.target() else {
        return Ok(());
    };

    if has_route_line(route) {
        format_route(out, route, " ")?;
    }

    write_when(out, &target.brief_usage, "", &["\n\n"])?;
    write_when(out, &help.long_description, "", &["\n\n"])?;
    write_subcmds(out, &target.children)?;
    write_when(out, &help.deprecation, "", &["\n\n", "DEPRECATED: "])?;
    write_when(out, &help.experimental, "", &["\n\n", "EXPERIMENTAL: "])?;
    write_when(out, &help.example, "", &["\n\n", "Example:\n\n"])?;
    write_target_flags(out, route)?;
    write_when(out, &help.changelog, "\n\n", &["\nChanges:\n\n"])?;
    Ok(())
}

fn write_subcmds(out: &mut dyn io::Write, children: &[Cmd]) -> io::Result<usize> {
    let mut n = 0;
    let mut wrote = false;

    for child in children {
        if child.pattern.is_empty() {
            continue;
        }

        if !wrote {
            wrote = true;
            n += write_str(out, "\n\nSub-Commands:")?;
        }

        n += write_when(out, &child.pattern, "", &["\n", "- "])?;
    }

    Ok(n)
}

// Number of columns a flag's name cell occupies: `-s --name type`.
fn name_cell_width(route: &Route, info: &FlagInfo) -> usize {
    let mut width = info.name.chars().count();
    if width > 1 {
        width += 2; // `--`
    } else {
        // either empty or not a valid long name
        width = 0;
    }

    if is_shorthand(&info.shorthand) {
        if width != 0 {
            width += 1; // separator space
        }
        width += 2; // `-f`
    }

    if width == 0 {
        return 0;
    }

    if let Some((_, flag)) = find_flag_among(route, &[&info.name, &info.shorthand]) {
        if let Some(type_name) = flag.type_name() {
            width += type_name.chars().count() + 1;
        }
    }

    width
}

/// Writes the usage lines of every flag accessible from the route's target,
/// descriptions aligned past the longest name cell.
pub fn write_target_flags(out: &mut dyn io::Write, route: &Route) -> io::Result<usize> {
    let mut indent = 0;
    let mut group_has_shorthand = false;

    for i in 0.. {
        let Some(info) = route.nth_flag(i) else {
            break;
        };

        if is_shorthand(&info.shorthand) {
            group_has_shorthand = true;
        }

        indent = indent.max(name_cell_width(route, &info));
    }

    if indent == 0 {
        return write_str(out, "\n");
    }

    indent += 2;

    let mut n = write_str(out, "\n\nFlags:\n")?;
    for i in 0.. {
        let Some(info) = route.nth_flag(i) else {
            break;
        };

        n += write_flag_line(out, route, "  ", indent, &info, group_has_shorthand)?;
    }

    Ok(n)
}

fn write_flag_line(
    out: &mut dyn io::Write,
    route: &Route,
    line_prefix: &str,
    indent: usize,
    info: &FlagInfo,
    group_has_shorthand: bool,
) -> io::Result<usize> {
    let valid_long = !info.name.is_empty() && !is_shorthand(&info.name);
    let valid_short = is_shorthand(&info.shorthand);
    if !valid_long && !valid_short {
        return Ok(0);
    }

    let Some((_, flag)) = find_flag_among(route, &[&info.name, &info.shorthand]) else {
        return Ok(0);
    };

    let mut n = write_str(out, line_prefix)?;
    let mut cursor = 0;

    if valid_short {
        n += write_str(out, "-")?;
        n += write_str(out, &info.shorthand)?;
        cursor += 2;
    }

    if valid_long {
        if valid_short {
            n += write_str(out, " --")?;
            cursor += 3;
        } else if group_has_shorthand {
            n += write_str(out, "   --")?;
            cursor += 5;
        } else {
            n += write_str(out, "--")?;
            cursor += 2;
        }

        n += write_str(out, &info.name)?;
        cursor += info.name.chars().count();
    }

    if let Some(type_name) = flag.type_name() {
        n += write_str(out, " ")?;
        n += write_str(out, &type_name)?;
        cursor += 1 + type_name.chars().count();
    }

    let (tag_cursor, x) = write_flag_tags(out, route, info, indent, cursor)?;
    cursor = tag_cursor;
    n += x;

    let usage = flag.usage();
    if !usage.is_empty() {
        n += write_spaces(out, indent.saturating_sub(cursor))?;
        n += write_str(out, usage)?;
    }

    if !info.default_value.is_empty() {
        n += write_when(out, &info.default_value, ")", &[" (default: "])?;
    } else if !flag.state().value_changed() && flag.has_value() {
        // default value implied by the unchanged current value
        n += write_str(out, " (default: ")?;
        n += flag.print_value(out)?;
        n += write_str(out, ")")?;
    }

    // trailing deprecation/experimental notes supplied via the extra payload
    if let Some(help) = flag
        .extra()
        .and_then(|extra| extra.downcast_ref::<FlagHelp>())
    {
        n += write_when(out, &help.deprecation, "", &["\n", line_prefix, "DEPRECATED: "])?;
        n += write_when(
            out,
            &help.experimental,
            "",
            &["\n", line_prefix, "EXPERIMENTAL: "],
        )?;
    }

    n += write_str(out, "\n")?;
    Ok(n)
}

// Writes `(required)` or the renderings of every rule concerning the flag.
fn write_flag_tags(
    out: &mut dyn io::Write,
    route: &Route,
    info: &FlagInfo,
    indent: usize,
    cursor: usize,
) -> io::Result<(usize, usize)> {
    let mut n = 0;
    let mut cursor = cursor;
    let names = [info.name.as_str(), info.shorthand.as_str()];

    let Some((_, flag)) = find_flag_among(route, &names) else {
        return Ok((cursor, n));
    };

    if flag.state().hidden() {
        n += write_spaces(out, indent.saturating_sub(cursor))?;
        cursor = indent;
        n += write_str(out, "(hidden")?;
        cursor += 7;
    }

    let mut has_tag = false;
    for i in (0..route.len()).rev() {
        let Some(rule) = route.get(i).and_then(|c| c.flag_rule) else {
            continue;
        };

        if rule_requires_any(rule, &names) {
            if cursor > indent {
                n += write_str(out, ", ")?;
                cursor += 2;
            } else {
                n += write_spaces(out, indent.saturating_sub(cursor))?;
                cursor = indent;
                n += write_str(out, "(")?;
                cursor += 1;
            }

            n += write_str(out, "required) ")?;
            cursor += 10;
            return Ok((cursor, n));
        }

        if !has_tag && rule_contains_any(rule, &names) {
            has_tag = true;
        }
    }

    if has_tag {
        // not required: render every rule concerning the flag
        for i in (0..route.len()).rev() {
            let Some(rule) = route.get(i).and_then(|c| c.flag_rule) else {
                continue;
            };

            if !rule_contains_any(rule, &names) {
                continue;
            }

            if cursor > indent {
                n += write_str(out, ", ")?;
                cursor += 2;
            } else {
                n += write_spaces(out, indent.saturating_sub(cursor))?;
                cursor = indent;
                n += write_str(out, "(")?;
                cursor += 1;
            }

            let x = rule.write_rule(out, &names)?;
            n += x;
            cursor += x;
        }
    }

    if cursor > indent {
        n += write_str(out, ") ")?;
        cursor += 2;
    }

    Ok((cursor, n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::Cmd;
    use crate::flag::{BoolFlagV, StrFlagV};
    use crate::indexer::MapIndexer;
    use crate::rules::AllOf;
    use crate::test::assert_contains;

    fn render(route: &Route, err: Option<&Error>) -> String {
        let mut buf = Vec::new();
        write_usage(&mut buf, route, err).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn usage_lists_route_subcmds_and_flags() {
        let verbose = BoolFlagV::default().brief("print more details");
        let name = StrFlagV::default().brief("the name to use");
        let mut flags = MapIndexer::new();
        flags.add(&verbose, &["verbose", "v"]);
        flags.add_with_default("anon", &name, &["name"]);

        let rule = AllOf::new(["name"]);
        let root = Cmd {
            pattern: "app".to_string(),
            brief_usage: "does app things".to_string(),
            flags: Some(&flags),
            flag_rule: Some(&rule),
            children: vec![Cmd {
                pattern: "sub x [y]".to_string(),
                ..Cmd::default()
            }],
            ..Cmd::default()
        };

        let mut route = Route::new();
        route.push(&root);

        let out = render(&route, None);
        assert_contains!(out, "app");
        assert_contains!(out, "does app things");
        assert_contains!(out, "Sub-Commands:");
        assert_contains!(out, "- sub x [y]");
        assert_contains!(out, "Flags:");
        assert_contains!(out, "-v --verbose bool");
        assert_contains!(out, "print more details");
        assert_contains!(out, "--name str");
        assert_contains!(out, "(required)");
        assert_contains!(out, "(default: anon)");
    }

    #[test]
    fn usage_with_error_line() {
        let root = Cmd {
            pattern: "app".to_string(),
            ..Cmd::default()
        };
        let mut route = Route::new();
        route.push(&root);

        let out = render(&route, Some(&Error::Timeout));
        assert!(out.starts_with("Error: timeout\n\n"));
    }

    #[test]
    fn cmd_help_extra_sections() {
        let root = Cmd {
            pattern: "app".to_string(),
            brief_usage: "brief".to_string(),
            extra: Some(Box::new(CmdHelp {
                deprecation: "use app2 instead".to_string(),
                example: "app --verbose".to_string(),
                ..CmdHelp::default()
            })),
            ..Cmd::default()
        };
        let mut route = Route::new();
        route.push(&root);

        let out = render(&route, None);
        assert_contains!(out, "DEPRECATED: use app2 instead");
        assert_contains!(out, "Example:\n\napp --verbose");
    }

    #[test]
    fn flags_without_any_entries_write_blank_line() {
        let root = Cmd {
            pattern: "app".to_string(),
            ..Cmd::default()
        };
        let mut route = Route::new();
        route.push(&root);

        let mut buf = Vec::new();
        write_target_flags(&mut buf, &route).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "\n");
    }

    #[test]
    fn rule_tags_render_for_non_required_flags() {
        let left = BoolFlagV::default();
        let right = BoolFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&left, &["left"]);
        flags.add(&right, &["right"]);

        let rule = crate::rules::OneOf::new(["left", "right"]);
        let root = Cmd {
            pattern: "app".to_string(),
            flags: Some(&flags),
            flag_rule: Some(&rule),
            ..Cmd::default()
        };
        let mut route = Route::new();
        route.push(&root);

        let out = render(&route, None);
        assert_contains!(out, "oneof[--left, --right]");
    }
}
