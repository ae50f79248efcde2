//! The route: the ordered path from the root command to the resolved
//! target, and the ambient flag context during parsing.

use std::io;

use crate::cmd::Cmd;
use crate::error::Error;
use crate::flag::Flag;
use crate::indexer::{capped_len, FlagFinder, FlagInfo, FlagIter};
use crate::rules::Inspector;
use crate::vp::write_str;

/// The path from the root command to the currently resolved target.
///
/// A route doubles as the ambient flag finder and iterator while parsing:
/// find-by-name searches the target's local flags first, then the shared
/// flags of every command from the target back to the root.
#[derive(Default)]
pub struct Route<'c, 'a> {
    cmds: Vec<&'c Cmd<'a>>,
}

impl<'c, 'a> Route<'c, 'a> {
    /// An empty route.
    pub fn new() -> Self {
        Route::default()
    }

    /// An empty route with space for `capacity` commands, for dispatches
    /// that want to avoid growth allocations.
    pub fn with_capacity(capacity: usize) -> Self {
        Route {
            cmds: Vec::with_capacity(capacity),
        }
    }

    /// Appends a command to the route.
    pub fn push(&mut self, cmd: &'c Cmd<'a>) {
        self.cmds.push(cmd);
    }

    pub(crate) fn clear(&mut self) {
        self.cmds.clear();
    }

    /// Number of commands in the route.
    pub fn len(&self) -> usize {
        self.cmds.len()
    }

    /// True when the route holds no commands.
    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    /// The `i`-th command from the root.
    pub fn get(&self, i: usize) -> Option<&'c Cmd<'a>> {
        self.cmds.get(i).copied()
    }

    /// The first command of the route.
    pub fn root(&self) -> Option<&'c Cmd<'a>> {
        self.cmds.first().copied()
    }

    /// The last command of the route.
    pub fn target(&self) -> Option<&'c Cmd<'a>> {
        self.cmds.last().copied()
    }

    /// The command right above the target.
    pub fn parent(&self) -> Option<&'c Cmd<'a>> {
        match self.cmds.len() {
            0 | 1 => None,
            n => Some(self.cmds[n - 2]),
        }
    }

    /// Iterates the route root→target.
    pub fn iter(&self) -> impl Iterator<Item = &'c Cmd<'a>> + '_ {
        self.cmds.iter().copied()
    }

    /// Searches the route's flag context: the target's local flags first,
    /// then the shared flags from the target back to the root.
    pub fn lookup(&self, name: &str) -> Option<&'a dyn Flag> {
        if let Some(flags) = self.target().and_then(|c| c.local_flags) {
            if let Some(flag) = flags.find_flag(name) {
                return Some(flag);
            }
        }

        for cmd in self.cmds.iter().rev() {
            if let Some(flags) = cmd.flags {
                if let Some(flag) = flags.find_flag(name) {
                    return Some(flag);
                }
            }
        }

        None
    }
}

impl FlagFinder for Route<'_, '_> {
    fn find_flag(&self, name: &str) -> Option<&dyn Flag> {
        self.lookup(name)
    }

    fn as_iter(&self) -> Option<&dyn FlagIter> {
        Some(self)
    }
}

impl FlagIter for Route<'_, '_> {
    fn nth_flag(&self, i: usize) -> Option<FlagInfo> {
        let target = self.target()?;
        let mut i = i;

        if let Some(iter) = target.local_flags.and_then(|f| f.as_iter()) {
            if let Some(info) = iter.nth_flag(i) {
                return Some(info);
            }

            i -= capped_len(iter, i);
        }

        for cmd in self.cmds.iter().rev() {
            let Some(iter) = cmd.flags.and_then(|f| f.as_iter()) else {
                continue;
            };

            if let Some(info) = iter.nth_flag(i) {
                return Some(info);
            }

            i -= capped_len(iter, i);
        }

        None
    }
}

impl Inspector for Route<'_, '_> {
    /// Panics when `key` names a flag unknown to the route; a rule key
    /// always refers to a registered flag.
    fn value_changed(&self, key: &str) -> bool {
        match self.lookup(key) {
            Some(flag) => flag.state().value_changed(),
            None => panic!(
                "{}",
                Error::FlagUndefined {
                    name: key.to_string(),
                    at: None,
                }
            ),
        }
    }
}

/// Writes every command name in the route with `sep` in between; the target
/// contributes its complete pattern.
pub fn format_route(out: &mut dyn io::Write, route: &Route, sep: &str) -> io::Result<usize> {
    let Some(target) = route.target() else {
        return Ok(0);
    };

    let mut n = 0;
    for i in 0..route.len() - 1 {
        if let Some(cmd) = route.get(i) {
            n += write_str(out, cmd.name())?;
            n += write_str(out, sep)?;
        }
    }

    n += write_str(out, &target.pattern)?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::{BoolFlagV, StrFlagV};
    use crate::indexer::MapIndexer;

    #[test]
    fn navigation() {
        let root = Cmd {
            pattern: "root".to_string(),
            ..Cmd::default()
        };
        let mid = Cmd {
            pattern: "mid".to_string(),
            ..Cmd::default()
        };
        let leaf = Cmd {
            pattern: "leaf and usage".to_string(),
            ..Cmd::default()
        };

        let mut route = Route::new();
        assert!(route.is_empty());
        assert!(route.target().is_none());
        assert!(route.parent().is_none());

        route.push(&root);
        route.push(&mid);
        route.push(&leaf);

        assert_eq!(route.len(), 3);
        assert_eq!(route.root().unwrap().name(), "root");
        assert_eq!(route.target().unwrap().name(), "leaf");
        assert_eq!(route.parent().unwrap().name(), "mid");

        let mut buf = Vec::new();
        format_route(&mut buf, &route, " ").unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "root mid leaf and usage");
    }

    #[test]
    fn lookup_prefers_target_local() {
        let shared = StrFlagV::default();
        let local = BoolFlagV::default();
        let shadowed = StrFlagV::default();

        let mut root_flags = MapIndexer::new();
        root_flags.add(&shared, &["name"]).add(&shadowed, &["dup"]);
        let mut leaf_local = MapIndexer::new();
        leaf_local.add(&local, &["dup"]);

        let root = Cmd {
            pattern: "root".to_string(),
            flags: Some(&root_flags),
            ..Cmd::default()
        };
        let leaf = Cmd {
            pattern: "leaf".to_string(),
            local_flags: Some(&leaf_local),
            ..Cmd::default()
        };

        let mut route = Route::new();
        route.push(&root);
        route.push(&leaf);

        // target-local wins over the root's shared flag
        let hit = route.lookup("dup").unwrap();
        assert_eq!(hit.type_name().as_deref(), Some("bool"));
        assert!(route.lookup("name").is_some());
        assert!(route.lookup("nope").is_none());
    }

    #[test]
    fn iteration_concatenates_local_then_rootward() {
        let a = StrFlagV::default();
        let b = StrFlagV::default();
        let c = StrFlagV::default();

        let mut root_flags = MapIndexer::new();
        root_flags.add(&a, &["root-flag"]);
        let mut mid_flags = MapIndexer::new();
        mid_flags.add(&b, &["mid-flag"]);
        let mut leaf_local = MapIndexer::new();
        leaf_local.add(&c, &["leaf-flag"]);

        let root = Cmd {
            pattern: "root".to_string(),
            flags: Some(&root_flags),
            ..Cmd::default()
        };
        let mid = Cmd {
            pattern: "mid".to_string(),
            flags: Some(&mid_flags),
            ..Cmd::default()
        };
        let leaf = Cmd {
            pattern: "leaf".to_string(),
            local_flags: Some(&leaf_local),
            ..Cmd::default()
        };

        let mut route = Route::new();
        route.push(&root);
        route.push(&mid);
        route.push(&leaf);

        let names: Vec<String> = (0..)
            .map_while(|i| route.nth_flag(i))
            .map(|info| info.name)
            .collect();
        assert_eq!(names, vec!["leaf-flag", "mid-flag", "root-flag"]);
    }

    #[test]
    fn inspector_reads_flag_state() {
        let flag = StrFlagV::default();
        let mut flags = MapIndexer::new();
        flags.add(&flag, &["name"]);

        let root = Cmd {
            pattern: "root".to_string(),
            flags: Some(&flags),
            ..Cmd::default()
        };
        let mut route = Route::new();
        route.push(&root);

        assert!(!route.value_changed("name"));
        flag.decode(&crate::parse::ParseOptions::default(), "name", "x", true)
            .unwrap();
        assert!(route.value_changed("name"));
    }

    #[test]
    #[should_panic(expected = "undefined flag --ghost")]
    fn inspector_panics_on_unknown_key() {
        let root = Cmd::default();
        let mut route = Route::new();
        route.push(&root);
        route.value_changed("ghost");
    }
}
