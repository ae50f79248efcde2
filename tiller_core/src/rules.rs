//! Declarative inter-flag constraints evaluated during dispatch.

use std::io;

use crate::flag::is_shorthand;
use crate::vp::write_str;

/// Why a rule key is in violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationCode {
    /// No violation.
    NoViolation,
    /// All-of group: none of the keys is set.
    EmptyAllOf,
    /// All-of group: at least one key is set but not all.
    PartialAllOf,
    /// All-or-none group: at least one key is set but not all.
    PartialAllOrNone,
    /// One-of group: more than one key is set.
    ExcessiveOneOf,
    /// One-of group: none of the keys is set.
    EmptyOneOf,
    /// Any-of group: none of the keys is set.
    EmptyAnyOf,
}

impl ViolationCode {
    /// A short human-readable description of the violation.
    pub fn reason(self) -> &'static str {
        match self {
            ViolationCode::NoViolation => "no violation",
            ViolationCode::EmptyAllOf => "all flags in the group are required, but none set",
            ViolationCode::PartialAllOf | ViolationCode::PartialAllOrNone => {
                "not set along with other flags in the same group"
            }
            ViolationCode::ExcessiveOneOf => "conflict with other flags in the same group",
            ViolationCode::EmptyOneOf | ViolationCode::EmptyAnyOf => {
                "at least one flag in the group must be set"
            }
        }
    }
}

/// A (key, code) pair produced by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// The rule key, a flag name.
    pub key: String,
    /// Why the key violates the rule.
    pub code: ViolationCode,
}

/// Answers whether a flag's value has been changed; supplied to rule
/// evaluation by the dispatcher (the route implements it).
pub trait Inspector {
    /// True when the flag named `key` has its value-changed bit set.
    fn value_changed(&self, key: &str) -> bool;
}

/// A declarative constraint over a set of flag keys.
pub trait Rule {
    /// True when this rule requires `key`'s value to be changed to avoid a
    /// violation.
    fn requires(&self, key: &str) -> bool;

    /// True when the rule has something to do with `key`.
    fn contains(&self, key: &str) -> bool;

    /// The `i`-th violation under `inspector`, if any. Enumeration is
    /// deterministic in declaration order.
    fn nth_violation(&self, inspector: &dyn Inspector, i: usize) -> Option<Violation>;

    /// Writes the text representation of the rule.
    ///
    /// A non-empty `keys` filter limits output to the sub-rules concerning
    /// at least one of the given keys.
    fn write_rule(&self, out: &mut dyn io::Write, keys: &[&str]) -> io::Result<usize>;
}

/// True when the rule contains any of `keys`.
pub fn rule_contains_any(rule: &dyn Rule, keys: &[&str]) -> bool {
    keys.iter().any(|k| rule.contains(k))
}

/// True when the rule requires any of `keys`.
pub fn rule_requires_any(rule: &dyn Rule, keys: &[&str]) -> bool {
    keys.iter().any(|k| rule.requires(k))
}

/// Merges rules: zero rules become [`AnyRule`], one passes through, more
/// combine into a [`MultiRule`].
pub fn merge_rules(mut rules: Vec<Box<dyn Rule>>) -> Box<dyn Rule> {
    match rules.len() {
        0 => Box::new(AnyRule),
        1 => rules.remove(0),
        _ => Box::new(MultiRule { rules }),
    }
}

fn keys_of(keys: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    keys.into_iter().map(Into::into).collect()
}

fn contains_key(keys: &[String], key: &str) -> bool {
    keys.iter().any(|k| k == key)
}

// True when every non-empty key of `keys` appears in `filter` (and there is
// at least one).
fn single_require(keys: &[String], filter: &str) -> bool {
    let mut has_key = false;
    for key in keys {
        if key.is_empty() {
            continue;
        }

        if key != filter {
            return false;
        }

        has_key = true;
    }

    has_key
}

fn write_rule_tags(
    out: &mut dyn io::Write,
    prefix: &str,
    suffix: &str,
    keys: &[String],
) -> io::Result<usize> {
    let mut n = write_str(out, prefix)?;
    let mut wrote = false;

    for key in keys {
        if key.is_empty() {
            continue;
        }

        if wrote {
            n += write_str(out, ", ")?;
        } else {
            wrote = true;
        }

        if is_shorthand(key) {
            n += write_str(out, "-")?;
        } else {
            n += write_str(out, "--")?;
        }
        n += write_str(out, key)?;
    }

    n += write_str(out, suffix)?;
    Ok(n)
}

/// The vacuous rule: never violated, contains nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyRule;

impl Rule for AnyRule {
    fn requires(&self, _key: &str) -> bool {
        false
    }

    fn contains(&self, _key: &str) -> bool {
        false
    }

    fn nth_violation(&self, _inspector: &dyn Inspector, _i: usize) -> Option<Violation> {
        None
    }

    fn write_rule(&self, _out: &mut dyn io::Write, _keys: &[&str]) -> io::Result<usize> {
        Ok(0)
    }
}

/// Every key must be set.
#[derive(Debug, Clone)]
pub struct AllOf {
    /// The required keys.
    pub keys: Vec<String>,
}

impl AllOf {
    /// A rule requiring every one of `keys`.
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        AllOf { keys: keys_of(keys) }
    }
}

impl Rule for AllOf {
    fn requires(&self, key: &str) -> bool {
        contains_key(&self.keys, key)
    }

    fn contains(&self, key: &str) -> bool {
        contains_key(&self.keys, key)
    }

    fn nth_violation(&self, inspector: &dyn Inspector, i: usize) -> Option<Violation> {
        let some_set = self.keys.iter().any(|k| inspector.value_changed(k));
        let code = if some_set {
            ViolationCode::PartialAllOf
        } else {
            ViolationCode::EmptyAllOf
        };

        self.keys
            .iter()
            .filter(|k| !inspector.value_changed(k))
            .nth(i)
            .map(|key| Violation {
                key: key.clone(),
                code,
            })
    }

    fn write_rule(&self, out: &mut dyn io::Write, keys: &[&str]) -> io::Result<usize> {
        if keys.is_empty() || rule_contains_any(self, keys) {
            return write_rule_tags(out, "allof[", "]", &self.keys);
        }

        Ok(0)
    }
}

/// Either every key is set or none is.
#[derive(Debug, Clone)]
pub struct AllOrNone {
    /// The grouped keys.
    pub keys: Vec<String>,
}

impl AllOrNone {
    /// A rule requiring `keys` to be set all together or not at all.
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        AllOrNone { keys: keys_of(keys) }
    }
}

impl Rule for AllOrNone {
    fn requires(&self, _key: &str) -> bool {
        false
    }

    fn contains(&self, key: &str) -> bool {
        contains_key(&self.keys, key)
    }

    fn nth_violation(&self, inspector: &dyn Inspector, i: usize) -> Option<Violation> {
        let some_set = self.keys.iter().any(|k| inspector.value_changed(k));
        let some_unset = self.keys.iter().any(|k| !inspector.value_changed(k));
        if !(some_set && some_unset) {
            return None;
        }

        self.keys
            .iter()
            .filter(|k| !inspector.value_changed(k))
            .nth(i)
            .map(|key| Violation {
                key: key.clone(),
                code: ViolationCode::PartialAllOrNone,
            })
    }

    fn write_rule(&self, out: &mut dyn io::Write, keys: &[&str]) -> io::Result<usize> {
        if keys.is_empty() || rule_contains_any(self, keys) {
            return write_rule_tags(out, "allOrNone[", "]", &self.keys);
        }

        Ok(0)
    }
}

/// Exactly one key must be set.
#[derive(Debug, Clone)]
pub struct OneOf {
    /// The mutually exclusive keys.
    pub keys: Vec<String>,
}

impl OneOf {
    /// A rule requiring exactly one of `keys`.
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        OneOf { keys: keys_of(keys) }
    }
}

impl Rule for OneOf {
    fn requires(&self, key: &str) -> bool {
        single_require(&self.keys, key)
    }

    fn contains(&self, key: &str) -> bool {
        contains_key(&self.keys, key)
    }

    fn nth_violation(&self, inspector: &dyn Inspector, i: usize) -> Option<Violation> {
        let mut set = self.keys.iter().filter(|k| inspector.value_changed(k));

        if set.next().is_none() {
            // none set: each key is an empty-one-of violation
            return self.keys.get(i).map(|key| Violation {
                key: key.clone(),
                code: ViolationCode::EmptyOneOf,
            });
        }

        // second onward are excessive
        set.nth(i).map(|key| Violation {
            key: key.clone(),
            code: ViolationCode::ExcessiveOneOf,
        })
    }

    fn write_rule(&self, out: &mut dyn io::Write, keys: &[&str]) -> io::Result<usize> {
        if keys.is_empty() || rule_contains_any(self, keys) {
            return write_rule_tags(out, "oneof[", "]", &self.keys);
        }

        Ok(0)
    }
}

/// At least one key must be set.
#[derive(Debug, Clone)]
pub struct AnyOf {
    /// The grouped keys.
    pub keys: Vec<String>,
}

impl AnyOf {
    /// A rule requiring at least one of `keys`.
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        AnyOf { keys: keys_of(keys) }
    }
}

impl Rule for AnyOf {
    fn requires(&self, key: &str) -> bool {
        single_require(&self.keys, key)
    }

    fn contains(&self, key: &str) -> bool {
        contains_key(&self.keys, key)
    }

    fn nth_violation(&self, inspector: &dyn Inspector, i: usize) -> Option<Violation> {
        if self.keys.iter().any(|k| inspector.value_changed(k)) {
            return None;
        }

        self.keys.get(i).map(|key| Violation {
            key: key.clone(),
            code: ViolationCode::EmptyAnyOf,
        })
    }

    fn write_rule(&self, out: &mut dyn io::Write, keys: &[&str]) -> io::Result<usize> {
        if keys.is_empty() || rule_contains_any(self, keys) {
            return write_rule_tags(out, "anyof[", "]", &self.keys);
        }

        Ok(0)
    }
}

/// Conditional rule: when `if_rule` produces no violation, `then_rule` is
/// evaluated, otherwise `else_rule`.
///
/// An [`AnyRule`] condition is valid and always selects `then_rule`.
#[derive(Debug, Clone)]
pub struct Depends<X, Y, Z> {
    /// The condition rule.
    pub if_rule: X,
    /// Evaluated when the condition holds.
    pub then_rule: Y,
    /// Evaluated when the condition is violated.
    pub else_rule: Z,
}

impl<X: Rule, Y: Rule, Z: Rule> Depends<X, Y, Z> {
    /// Builds the conditional from its three parts.
    pub fn new(if_rule: X, then_rule: Y, else_rule: Z) -> Self {
        Depends {
            if_rule,
            then_rule,
            else_rule,
        }
    }
}

impl<X: Rule, Y: Rule, Z: Rule> Rule for Depends<X, Y, Z> {
    fn requires(&self, key: &str) -> bool {
        self.then_rule.requires(key) && self.else_rule.requires(key)
    }

    fn contains(&self, key: &str) -> bool {
        self.if_rule.contains(key)
            || self.then_rule.contains(key)
            || self.else_rule.contains(key)
    }

    fn nth_violation(&self, inspector: &dyn Inspector, i: usize) -> Option<Violation> {
        // only the presence of a violation matters for the condition
        if self.if_rule.nth_violation(inspector, 0).is_none() {
            self.then_rule.nth_violation(inspector, i)
        } else {
            self.else_rule.nth_violation(inspector, i)
        }
    }

    fn write_rule(&self, out: &mut dyn io::Write, keys: &[&str]) -> io::Result<usize> {
        let mut n = write_str(out, "(if ")?;

        let mut x = self.if_rule.write_rule(out, keys)?;
        if x == 0 {
            x = write_str(out, "nop")?;
        }
        n += x;

        n += write_str(out, "; then ")?;
        let mut x = self.then_rule.write_rule(out, keys)?;
        if x == 0 {
            x = write_str(out, "nop")?;
        }
        n += x;

        n += write_str(out, "; else ")?;
        let mut x = self.else_rule.write_rule(out, &[])?;
        if x == 0 {
            x = write_str(out, "nop")?;
        }
        n += x;

        n += write_str(out, ")")?;
        Ok(n)
    }
}

/// Concatenates the violations of its members in declaration order.
#[derive(Default)]
pub struct MultiRule {
    /// The member rules.
    pub rules: Vec<Box<dyn Rule>>,
}

impl Rule for MultiRule {
    fn requires(&self, key: &str) -> bool {
        self.rules.iter().any(|r| r.requires(key))
    }

    fn contains(&self, key: &str) -> bool {
        self.rules.iter().any(|r| r.contains(key))
    }

    fn nth_violation(&self, inspector: &dyn Inspector, i: usize) -> Option<Violation> {
        let mut i = i;
        for rule in &self.rules {
            let mut j = 0;
            while let Some(violation) = rule.nth_violation(inspector, j) {
                if i == 0 {
                    return Some(violation);
                }

                i -= 1;
                j += 1;
            }
        }

        None
    }

    fn write_rule(&self, out: &mut dyn io::Write, keys: &[&str]) -> io::Result<usize> {
        let mut n = 0;
        let mut last = 0;
        for rule in &self.rules {
            if !keys.is_empty() && !rule_contains_any(rule.as_ref(), keys) {
                last = 0;
                continue;
            }

            if last > 0 {
                n += write_str(out, " & ")?;
            }

            last = rule.write_rule(out, keys)?;
            n += last;
        }

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Changed(HashSet<&'static str>);

    impl Changed {
        fn of(keys: &[&'static str]) -> Self {
            Changed(keys.iter().copied().collect())
        }
    }

    impl Inspector for Changed {
        fn value_changed(&self, key: &str) -> bool {
            self.0.contains(key)
        }
    }

    fn violations(rule: &dyn Rule, inspector: &dyn Inspector) -> Vec<Violation> {
        let mut out = Vec::new();
        for i in 0.. {
            match rule.nth_violation(inspector, i) {
                Some(v) => out.push(v),
                None => break,
            }
        }
        out
    }

    fn rendered(rule: &dyn Rule, keys: &[&str]) -> String {
        let mut buf = Vec::new();
        rule.write_rule(&mut buf, keys).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn all_of() {
        let rule = AllOf::new(["a", "bee", "c"]);
        assert!(rule.requires("a"));
        assert!(rule.contains("bee"));
        assert!(!rule.contains("d"));

        // none set: one empty-all-of per key
        let got = violations(&rule, &Changed::of(&[]));
        assert_eq!(got.len(), 3);
        assert!(got
            .iter()
            .all(|v| v.code == ViolationCode::EmptyAllOf));
        assert_eq!(got[0].key, "a");

        // partially set: unchanged keys only
        let got = violations(&rule, &Changed::of(&["bee"]));
        assert_eq!(
            got,
            vec![
                Violation {
                    key: "a".to_string(),
                    code: ViolationCode::PartialAllOf
                },
                Violation {
                    key: "c".to_string(),
                    code: ViolationCode::PartialAllOf
                },
            ]
        );

        assert!(violations(&rule, &Changed::of(&["a", "bee", "c"])).is_empty());
        assert_eq!(rendered(&rule, &[]), "allof[-a, --bee, -c]");
        assert_eq!(rendered(&rule, &["nope"]), "");
        assert_eq!(rendered(&rule, &["a"]), "allof[-a, --bee, -c]");
    }

    #[test]
    fn all_or_none() {
        let rule = AllOrNone::new(["x", "y"]);
        assert!(!rule.requires("x"));

        assert!(violations(&rule, &Changed::of(&[])).is_empty());
        assert!(violations(&rule, &Changed::of(&["x", "y"])).is_empty());

        let got = violations(&rule, &Changed::of(&["x"]));
        assert_eq!(
            got,
            vec![Violation {
                key: "y".to_string(),
                code: ViolationCode::PartialAllOrNone
            }]
        );
    }

    #[test]
    fn one_of() {
        let rule = OneOf::new(["left", "right"]);

        let got = violations(&rule, &Changed::of(&[]));
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|v| v.code == ViolationCode::EmptyOneOf));

        assert!(violations(&rule, &Changed::of(&["left"])).is_empty());

        let got = violations(&rule, &Changed::of(&["left", "right"]));
        assert_eq!(
            got,
            vec![Violation {
                key: "right".to_string(),
                code: ViolationCode::ExcessiveOneOf
            }]
        );

        assert_eq!(rendered(&rule, &[]), "oneof[--left, --right]");
    }

    #[test]
    fn any_of() {
        let rule = AnyOf::new(["a", "b"]);

        let got = violations(&rule, &Changed::of(&[]));
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|v| v.code == ViolationCode::EmptyAnyOf));

        assert!(violations(&rule, &Changed::of(&["b"])).is_empty());
    }

    #[test]
    fn depends() {
        // if --remote is set, --url is required, otherwise --path is
        let rule = Depends::new(
            AllOf::new(["remote"]),
            AllOf::new(["url"]),
            AllOf::new(["path"]),
        );

        // condition holds (remote set): then-branch applies
        let got = violations(&rule, &Changed::of(&["remote"]));
        assert_eq!(got[0].key, "url");

        // condition violated: else-branch applies
        let got = violations(&rule, &Changed::of(&[]));
        assert_eq!(got[0].key, "path");

        assert!(violations(&rule, &Changed::of(&["remote", "url"])).is_empty());
        assert!(violations(&rule, &Changed::of(&["path"])).is_empty());

        assert!(rule.requires("url") == false);
        assert!(rule.contains("remote") && rule.contains("path"));

        assert_eq!(
            rendered(&rule, &[]),
            "(if allof[--remote]; then allof[--url]; else allof[--path])"
        );
    }

    #[test]
    fn multi_concatenates_in_order() {
        let rule = MultiRule {
            rules: vec![
                Box::new(AllOf::new(["a"])),
                Box::new(AnyOf::new(["b", "c"])),
            ],
        };

        let got = violations(&rule, &Changed::of(&[]));
        assert_eq!(
            got.iter().map(|v| v.key.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert_eq!(got[0].code, ViolationCode::EmptyAllOf);
        assert_eq!(got[1].code, ViolationCode::EmptyAnyOf);

        assert_eq!(rendered(&rule, &[]), "allof[-a] & anyof[-b, -c]");
        assert_eq!(rendered(&rule, &["b"]), "anyof[-b, -c]");
    }

    #[test]
    fn merge_shapes() {
        assert!(merge_rules(Vec::new())
            .nth_violation(&Changed::of(&[]), 0)
            .is_none());

        let merged = merge_rules(vec![Box::new(AllOf::new(["k"]))]);
        assert!(merged.requires("k"));
    }
}
