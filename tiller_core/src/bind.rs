//! The struct-binding indexer: fields of a derived struct become flags.

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use crate::comp::{CompAction, CompItem, CompKind, CompState, CompTask};
use crate::dynvp::{DefaultDynVpFactory, DynCell, DynVp, DynVpFactory, FieldShape};
use crate::error::Error;
use crate::flag::{is_shorthand, Flag, FlagState};
use crate::indexer::{FlagFinder, FlagInfo, FlagIter};
use crate::parse::ParseOptions;

/// A struct whose tagged fields can be bound as flags.
///
/// Derive it:
///
/// ```ignore
/// #[derive(Binding)]
/// struct Config {
///     #[cli("f|filematch,value=regexp,comp=x=.*#match files by name")]
///     file_match: HashMap<String, Vec<Regex>>,
/// }
/// ```
///
/// The tag grammar is `<names>[,<options>][#<brief usage>]` with
/// pipe-separated names (long names are two or more code points, a
/// shorthand exactly one) and these options:
///
/// - `comp=<v>` (repeatable): preset completion suggestions.
/// - `value=<t>`: codec hint for the scalar / element / map value; one of
///   `size`, `dur`, `sum`, `ssum`, `dsum`, `regexp`, `regexp-nocase`,
///   `time`, `unix-ts`, `unix-ms`, `unix-us`, `unix-ns`.
/// - `key=<t>`: codec hint for the map key (the same set minus the sum
///   variants and the regexps).
/// - `def=<v>` (repeatable): default value; repeated defaults wrap into
///   `[v1, v2, …]`.
/// - `hide`: sets the hidden state bit.
/// - `once`: sets the set-at-most-once state bit.
pub trait Binding {
    /// The field descriptors, in declaration order.
    fn fields() -> &'static [FieldDesc<Self>]
    where
        Self: Sized;
}

/// One bound field, emitted by the derive macro.
pub struct FieldDesc<S: ?Sized> {
    /// The raw tag text of the field's `#[cli("…")]` attribute.
    pub tag: &'static str,

    /// The storage shape of the field.
    pub shape: FieldShape,

    /// Loads the field into an erased cell.
    pub load: fn(&S) -> DynCell,

    /// Stores an erased cell back into the field.
    pub store: fn(&mut S, &DynCell),
}

struct BindRef {
    field: usize,
    info: FlagInfo,
    usage: String,
    comp: Vec<String>,
    key_hint: String,
    value_hint: String,
}

/// An indexer binding the tagged fields of a [`Binding`] struct as flags.
///
/// Tag metadata is scanned at construction; the codec and flag object of a
/// field are created on its first use and cached for the lifetime of the
/// indexer.
pub struct BindIndexer<'a, S: Binding> {
    value: Rc<RefCell<&'a mut S>>,
    factory: Box<dyn DynVpFactory>,
    refs: Vec<BindRef>,
    names: HashMap<String, usize>,
    flags: Vec<OnceCell<BindFlag<'a, S>>>,
}

impl<'a, S: Binding + 'static> BindIndexer<'a, S> {
    /// Binds `value` using the [`DefaultDynVpFactory`].
    pub fn new(value: &'a mut S) -> Self {
        BindIndexer::with_factory(Box::new(DefaultDynVpFactory), value)
    }

    /// Binds `value`, deriving codecs through `factory`.
    pub fn with_factory(factory: Box<dyn DynVpFactory>, value: &'a mut S) -> Self {
        let mut refs = Vec::with_capacity(S::fields().len());
        let mut names = HashMap::new();

        for (index, desc) in S::fields().iter().enumerate() {
            let parsed = parse_tag(index, desc.tag);
            for name in desc.tag.split(['#', ',']).next().unwrap_or("").split('|') {
                if !name.is_empty() {
                    names.insert(name.to_string(), index);
                }
            }

            refs.push(parsed);
        }

        let flags = (0..refs.len()).map(|_| OnceCell::new()).collect();

        BindIndexer {
            value: Rc::new(RefCell::new(value)),
            factory,
            refs,
            names,
            flags,
        }
    }

    // Creates (on first use) and returns the flag of the i-th tagged field.
    //
    // Panics when the factory cannot derive a codec for the field; binding
    // an unsupported field is a construction-time error.
    fn flag_at(&self, index: usize) -> &BindFlag<'a, S> {
        self.flags[index].get_or_init(|| {
            let bind_ref = &self.refs[index];
            let desc = &S::fields()[bind_ref.field];

            let vp = self
                .factory
                .vp_for(&desc.shape, &bind_ref.key_hint, &bind_ref.value_hint)
                .unwrap_or_else(|err| panic!("{err}"));

            BindFlag {
                value: Rc::clone(&self.value),
                field: bind_ref.field,
                vp,
                usage: bind_ref.usage.clone(),
                comp: bind_ref.comp.clone(),
                state: Cell::new(bind_ref.info.state),
            }
        })
    }
}

impl<S: Binding + 'static> FlagFinder for BindIndexer<'_, S> {
    fn find_flag(&self, name: &str) -> Option<&dyn Flag> {
        let index = *self.names.get(name)?;
        Some(self.flag_at(index))
    }

    fn as_iter(&self) -> Option<&dyn FlagIter> {
        Some(self)
    }
}

impl<S: Binding + 'static> FlagIter for BindIndexer<'_, S> {
    fn nth_flag(&self, i: usize) -> Option<FlagInfo> {
        let bind_ref = self.refs.get(i)?;
        let mut info = bind_ref.info.clone();
        if let Some(flag) = self.flags[i].get() {
            info.state = flag.state();
        }

        Some(info)
    }
}

struct BindFlag<'a, S> {
    value: Rc<RefCell<&'a mut S>>,
    field: usize,
    vp: DynVp,
    usage: String,
    comp: Vec<String>,
    state: Cell<FlagState>,
}

impl<S: Binding + 'static> Flag for BindFlag<'_, S> {
    fn type_name(&self) -> Option<String> {
        let t = self.vp.vp_type();
        (!t.is_unknown()).then(|| t.to_string())
    }

    fn imply_value(&self) -> Option<&'static str> {
        self.vp.implied_value()
    }

    fn decode(&self, opts: &ParseOptions, _name: &str, arg: &str, set: bool) -> Result<(), Error> {
        let state = self.state.get();
        if state.set_at_most_once() && state.value_changed() && set {
            return Err(Error::FlagSetAtMostOnce);
        }

        let mut value = self.value.borrow_mut();
        let mut cell = (S::fields()[self.field].load)(&**value);
        self.vp.parse(opts, arg, &mut cell, set)?;

        if set {
            (S::fields()[self.field].store)(&mut **value, &cell);
            self.state.set(state | FlagState::VALUE_CHANGED);
        }

        Ok(())
    }

    fn state(&self) -> FlagState {
        self.state.get()
    }

    fn has_value(&self) -> bool {
        let value = self.value.borrow();
        let cell = (S::fields()[self.field].load)(&**value);
        self.vp.has_value(&cell)
    }

    fn print_value(&self, out: &mut dyn io::Write) -> io::Result<usize> {
        let value = self.value.borrow();
        let cell = (S::fields()[self.field].load)(&**value);
        self.vp.print(out, &cell)
    }

    fn usage(&self) -> &str {
        &self.usage
    }

    fn completion(&self) -> Option<&dyn CompAction> {
        (!self.comp.is_empty()).then_some(self as &dyn CompAction)
    }
}

impl<S: Binding> CompAction for BindFlag<'_, S> {
    fn suggest(&self, tsk: &mut CompTask) -> (usize, CompState) {
        let mut added = 0;
        for value in &self.comp {
            added += tsk.add_matched(
                false,
                &[CompItem {
                    value: value.clone(),
                    description: String::new(),
                    kind: CompKind::FlagValue,
                }],
            );
        }

        (added, CompState::default())
    }
}

// Parses the tag grammar `<names>[,<options>][#<brief usage>]`.
fn parse_tag(field: usize, tag: &str) -> BindRef {
    let (head, usage) = match tag.split_once('#') {
        Some((head, usage)) => (head, usage),
        None => (tag, ""),
    };

    let (names, options) = match head.split_once(',') {
        Some((names, options)) => (names, options),
        None => (head, ""),
    };

    let mut info = FlagInfo::default();
    for name in names.split('|') {
        if name.is_empty() {
            continue;
        }

        if is_shorthand(name) {
            if info.shorthand.is_empty() {
                info.shorthand = name.to_string();
            }
        } else if info.name.is_empty() {
            info.name = name.to_string();
        }
    }

    let mut comp = Vec::new();
    let mut key_hint = String::new();
    let mut value_hint = String::new();
    let mut defaults: Vec<&str> = Vec::new();

    for option in options.split(',') {
        if option.is_empty() {
            continue;
        }

        let (key, value) = match option.split_once('=') {
            Some((key, value)) => (key, value),
            None => (option, ""),
        };

        match key {
            "comp" => {
                if !value.is_empty() {
                    comp.push(value.to_string());
                }
            }
            "value" => {
                assert!(
                    value_hint.is_empty(),
                    "invalid multiple value types: {option}"
                );
                value_hint = value.to_string();
            }
            "key" => {
                assert!(key_hint.is_empty(), "invalid multiple key types: {option}");
                key_hint = value.to_string();
            }
            "def" => defaults.push(value),
            "hide" => {
                assert!(
                    !info.state.hidden(),
                    "invalid duplicate `hide` option"
                );
                info.state |= FlagState::HIDDEN;
            }
            "once" => {
                assert!(
                    !info.state.set_at_most_once(),
                    "invalid duplicate `once` option"
                );
                info.state |= FlagState::SET_AT_MOST_ONCE;
            }
            _ => {}
        }
    }

    info.default_value = match defaults.len() {
        0 => String::new(),
        1 => defaults[0].to_string(),
        _ => format!("[{}]", defaults.join(", ")),
    };

    BindRef {
        field,
        info,
        usage: usage.to_string(),
        comp,
        key_hint,
        value_hint,
    }
}
