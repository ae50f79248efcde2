//! Flag indexers: collections of flags supporting find-by-name and
//! (optionally) iterate-by-index.

use std::collections::HashMap;

use crate::error::Error;
use crate::flag::{is_shorthand, Flag, FlagState};

/// A pack of flag name, shorthand, default value and current state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagInfo {
    /// The long flag name.
    pub name: String,

    /// The flag shorthand.
    pub shorthand: String,

    /// The default value used for the flag.
    ///
    /// Non-scalar defaults use the bracketed form `[e1, e2, …]`; during
    /// dispatch such a default is split around `, ` and decoded element by
    /// element.
    pub default_value: String,

    /// The current state of the flag.
    pub state: FlagState,
}

/// Iterate-by-index capability of an indexer.
pub trait FlagIter {
    /// The `i`-th flag's info this iterator can find.
    ///
    /// Once this returns `None` for some `i`, every greater index returns
    /// `None` as well.
    fn nth_flag(&self, i: usize) -> Option<FlagInfo>;
}

/// Find-by-name capability of an indexer.
pub trait FlagFinder {
    /// Searches flags known to this finder by name.
    ///
    /// The name can be either a full flag name or a shorthand, without the
    /// POSIX/GNU hyphen prefix.
    fn find_flag(&self, name: &str) -> Option<&dyn Flag>;

    /// The iterate capability, when this finder has one.
    fn as_iter(&self) -> Option<&dyn FlagIter> {
        None
    }
}

/// Tries each name in order against `flags`; on a hit, returns the name
/// used together with the flag.
pub fn find_flag_among<'f>(
    flags: &'f dyn FlagFinder,
    names: &[&str],
) -> Option<(String, &'f dyn Flag)> {
    for name in names {
        if name.is_empty() {
            continue;
        }

        if let Some(flag) = flags.find_flag(name) {
            return Some((name.to_string(), flag));
        }
    }

    None
}

// Count of flags an iterator yields, capped at `cap`, discovered by a
// binary probe that stops at the first None.
pub(crate) fn capped_len(iter: &dyn FlagIter, cap: usize) -> usize {
    let (mut lo, mut hi) = (0, cap);
    while lo < hi {
        let mid = (lo + hi) / 2;
        if iter.nth_flag(mid).is_some() {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }

    lo
}

struct MapEntry<'a> {
    flag: &'a dyn Flag,
    info: FlagInfo,
}

/// An insertion-ordered indexer backed by a name map.
///
/// Registering a duplicate name is a construction-time fatal error.
#[derive(Default)]
pub struct MapIndexer<'a> {
    names: HashMap<String, usize>,
    entries: Vec<MapEntry<'a>>,
}

impl<'a> MapIndexer<'a> {
    /// An empty indexer.
    pub fn new() -> Self {
        MapIndexer::default()
    }

    /// Registers a flag under its names.
    ///
    /// Panics when `names` is empty, contains an empty name, or contains a
    /// name already registered.
    pub fn add(&mut self, flag: &'a dyn Flag, names: &[&str]) -> &mut Self {
        self.add_with_default("", flag, names)
    }

    /// [`MapIndexer::add`] with a default value for the flag.
    pub fn add_with_default(
        &mut self,
        default_value: &str,
        flag: &'a dyn Flag,
        names: &[&str],
    ) -> &mut Self {
        assert!(!names.is_empty(), "invalid empty name list");

        let index = self.entries.len();
        let mut info = FlagInfo {
            default_value: default_value.to_string(),
            ..FlagInfo::default()
        };

        for name in names {
            assert!(!name.is_empty(), "invalid empty name");

            if self.names.contains_key(*name) {
                panic!(
                    "{}",
                    Error::DuplicateFlag {
                        name: name.to_string(),
                    }
                );
            }

            self.names.insert(name.to_string(), index);
            if is_shorthand(name) {
                if info.shorthand.is_empty() {
                    info.shorthand = name.to_string();
                }
            } else if info.name.is_empty() {
                info.name = name.to_string();
            }
        }

        self.entries.push(MapEntry { flag, info });
        self
    }
}

impl FlagFinder for MapIndexer<'_> {
    fn find_flag(&self, name: &str) -> Option<&dyn Flag> {
        self.names
            .get(name)
            .and_then(|i| self.entries.get(*i))
            .map(|e| e.flag)
    }

    fn as_iter(&self) -> Option<&dyn FlagIter> {
        Some(self)
    }
}

impl FlagIter for MapIndexer<'_> {
    fn nth_flag(&self, i: usize) -> Option<FlagInfo> {
        self.entries.get(i).map(|e| {
            let mut info = e.info.clone();
            info.state = e.flag.state();
            info
        })
    }
}

/// One hit returned by a [`FuncIndexer`] callback.
pub struct FuncEntry<'a> {
    /// The flag, expected for find queries.
    pub flag: Option<&'a dyn Flag>,
    /// The flag info, expected for iterate queries.
    pub info: FlagInfo,
}

/// Wraps a single callback as an indexer.
///
/// `index < 0` queries find-by-name, `index >= 0` queries iterate.
pub struct FuncIndexer<'a, F>
where
    F: Fn(&str, isize) -> Option<FuncEntry<'a>>,
{
    func: F,
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a, F> FuncIndexer<'a, F>
where
    F: Fn(&str, isize) -> Option<FuncEntry<'a>>,
{
    /// Wraps `func`.
    pub fn new(func: F) -> Self {
        FuncIndexer {
            func,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<'a, F> FlagFinder for FuncIndexer<'a, F>
where
    F: Fn(&str, isize) -> Option<FuncEntry<'a>>,
{
    fn find_flag(&self, name: &str) -> Option<&dyn Flag> {
        (self.func)(name, -1).and_then(|entry| entry.flag)
    }

    fn as_iter(&self) -> Option<&dyn FlagIter> {
        Some(self)
    }
}

impl<'a, F> FlagIter for FuncIndexer<'a, F>
where
    F: Fn(&str, isize) -> Option<FuncEntry<'a>>,
{
    fn nth_flag(&self, i: usize) -> Option<FlagInfo> {
        (self.func)("", i as isize).map(|entry| entry.info)
    }
}

/// Combines multiple finders; find falls through linearly, iteration
/// concatenates the members that support it.
#[derive(Default)]
pub struct MultiIndexer<'a> {
    /// The member finders, searched in order.
    pub finders: Vec<&'a dyn FlagFinder>,
}

impl<'a> MultiIndexer<'a> {
    /// Combines `finders`.
    pub fn new(finders: Vec<&'a dyn FlagFinder>) -> Self {
        MultiIndexer { finders }
    }
}

impl FlagFinder for MultiIndexer<'_> {
    fn find_flag(&self, name: &str) -> Option<&dyn Flag> {
        self.finders.iter().find_map(|f| f.find_flag(name))
    }

    fn as_iter(&self) -> Option<&dyn FlagIter> {
        Some(self)
    }
}

impl FlagIter for MultiIndexer<'_> {
    fn nth_flag(&self, i: usize) -> Option<FlagInfo> {
        let mut i = i;
        for finder in &self.finders {
            let Some(iter) = finder.as_iter() else {
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

/// A level in a flag name hierarchy.
pub trait FlagLevel {
    /// Strips every ancestor prefix (and this level's own) from `name`.
    fn trim_level_prefixes<'s>(&self, name: &'s str) -> &'s str;

    /// Adds this level's prefix (and every ancestor's) to `name`.
    /// Shorthands pass through unchanged.
    fn full_flag_name(&self, name: &str) -> String;
}

/// A finder wrapper building a multi-level flag hierarchy by name prefix.
pub struct LevelIndexer<'a> {
    /// The level above, if any.
    pub up: Option<&'a dyn FlagLevel>,

    /// The prefix identifying this level; empty only for a root level.
    pub prefix: String,

    /// The wrapped finder.
    pub flags: Option<&'a dyn FlagFinder>,
}

impl FlagLevel for LevelIndexer<'_> {
    fn trim_level_prefixes<'s>(&self, name: &'s str) -> &'s str {
        let name = match self.up {
            Some(up) => up.trim_level_prefixes(name),
            None => name,
        };

        name.strip_prefix(self.prefix.as_str()).unwrap_or(name)
    }

    fn full_flag_name(&self, name: &str) -> String {
        if is_shorthand(name) {
            return name.to_string();
        }

        let mut full = if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}{}", self.prefix, name)
        };

        if let Some(up) = self.up {
            full = up.full_flag_name(&full);
        }

        full
    }
}

impl FlagFinder for LevelIndexer<'_> {
    fn find_flag(&self, name: &str) -> Option<&dyn Flag> {
        let flags = self.flags?;

        if is_shorthand(name) {
            return flags.find_flag(name);
        }

        flags.find_flag(self.trim_level_prefixes(name))
    }

    fn as_iter(&self) -> Option<&dyn FlagIter> {
        Some(self)
    }
}

impl FlagIter for LevelIndexer<'_> {
    fn nth_flag(&self, i: usize) -> Option<FlagInfo> {
        let mut info = self.flags?.as_iter()?.nth_flag(i)?;
        if !info.name.is_empty() {
            info.name = self.full_flag_name(&info.name);
        }

        Some(info)
    }
}
