//! Flags: named, stateful holders pairing a value peeker with a storage
//! cell.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::ops::{BitOr, BitOrAssign};
use std::rc::Rc;

use chrono::{DateTime, Local};
use regex::Regex;

use crate::comp::CompAction;
use crate::error::Error;
use crate::parse::ParseOptions;
use crate::vp::{
    BoolVp, DurationVp, FloatVp, IntVp, MapVp, RegexpNocaseVp, RegexpVp, SizeVp, SliceVp, StrVp,
    SumVp, TimeVp, UintVp, UnixMicroVp, UnixMilliVp, UnixNanoVp, UnixSecVp, Vp,
};

/// True if `s` is a single code point and not a hyphen: a flag shorthand.
pub fn is_shorthand(s: &str) -> bool {
    let mut chars = s.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c != '-')
}

/// Bits describing a flag's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagState(u32);

impl FlagState {
    /// The flag's value has been changed by a successful set.
    pub const VALUE_CHANGED: FlagState = FlagState(1);
    /// The flag is hidden from completion and help.
    pub const HIDDEN: FlagState = FlagState(1 << 1);
    /// The flag may enjoy at most one successful set.
    pub const SET_AT_MOST_ONCE: FlagState = FlagState(1 << 2);

    /// True when all bits of `other` are set.
    pub fn contains(self, other: FlagState) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when the value-changed bit is set.
    pub fn value_changed(self) -> bool {
        self.contains(FlagState::VALUE_CHANGED)
    }

    /// True when the hidden bit is set.
    pub fn hidden(self) -> bool {
        self.contains(FlagState::HIDDEN)
    }

    /// True when the set-at-most-once bit is set.
    pub fn set_at_most_once(self) -> bool {
        self.contains(FlagState::SET_AT_MOST_ONCE)
    }
}

impl BitOr for FlagState {
    type Output = FlagState;

    fn bitor(self, rhs: FlagState) -> FlagState {
        FlagState(self.0 | rhs.0)
    }
}

impl BitOrAssign for FlagState {
    fn bitor_assign(&mut self, rhs: FlagState) {
        self.0 |= rhs.0;
    }
}

/// The interface the parser, indexers and dispatcher speak to a flag.
///
/// A flag's default value is carried by [`FlagInfo`](crate::FlagInfo) and is
/// only assigned during dispatch.
pub trait Flag {
    /// `(type name, true)` equivalent: the VP type rendering, `None` when
    /// there is no type information.
    fn type_name(&self) -> Option<String>;

    /// The text implied by the presence of the flag name alone; `None`
    /// when the flag has no implied value.
    fn imply_value(&self) -> Option<&'static str>;

    /// Decodes a text argument into the flag value. With `set = false` the
    /// storage is only validated, never mutated.
    fn decode(&self, opts: &ParseOptions, name: &str, arg: &str, set: bool) -> Result<(), Error>;

    /// User-defined extra payload.
    fn extra(&self) -> Option<&dyn Any> {
        None
    }

    /// The flag's current state bits.
    fn state(&self) -> FlagState;

    /// True if [`Flag::print_value`] would write a non-empty value.
    fn has_value(&self) -> bool;

    /// Writes the text representation of the current value.
    fn print_value(&self, out: &mut dyn io::Write) -> io::Result<usize>;

    /// The brief usage of the flag.
    fn usage(&self) -> &str {
        ""
    }

    /// The completion provider suggesting values for this flag, if any.
    fn completion(&self) -> Option<&dyn CompAction> {
        None
    }
}

fn decode_with<T, P: Vp<T>>(
    vp: &P,
    value: &mut T,
    state: &Cell<FlagState>,
    opts: &ParseOptions,
    arg: &str,
    set: bool,
) -> Result<(), Error> {
    let current = state.get();
    if current.set_at_most_once() && current.value_changed() && set {
        return Err(Error::FlagSetAtMostOnce);
    }

    vp.parse_value(opts, arg, value, set)?;

    if set {
        state.set(current | FlagState::VALUE_CHANGED);
    }
    Ok(())
}

/// A flag bound to caller-owned storage.
pub struct FlagCell<'a, T, P> {
    vp: P,
    value: Rc<RefCell<&'a mut T>>,
    state: Cell<FlagState>,
    usage: String,
    comp: Option<Box<dyn CompAction>>,
    extra: Option<Box<dyn Any>>,
}

impl<'a, T, P: Vp<T> + Default> FlagCell<'a, T, P> {
    /// Binds `value` as the flag's storage cell.
    pub fn new(value: &'a mut T) -> Self {
        FlagCell {
            vp: P::default(),
            value: Rc::new(RefCell::new(value)),
            state: Cell::new(FlagState::default()),
            usage: String::new(),
            comp: None,
            extra: None,
        }
    }

    /// Sets the brief usage text.
    pub fn brief(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    /// Marks the flag hidden.
    pub fn hidden(self) -> Self {
        self.state.set(self.state.get() | FlagState::HIDDEN);
        self
    }

    /// Allows at most one successful set.
    pub fn at_most_once(self) -> Self {
        self.state.set(self.state.get() | FlagState::SET_AT_MOST_ONCE);
        self
    }

    /// Attaches a completion provider for the flag's values.
    pub fn completion(mut self, comp: impl CompAction + 'static) -> Self {
        self.comp = Some(Box::new(comp));
        self
    }

    /// Attaches extra custom payload.
    pub fn extra(mut self, extra: impl Any) -> Self {
        self.extra = Some(Box::new(extra));
        self
    }
}

impl<T, P: Vp<T>> Flag for FlagCell<'_, T, P> {
    fn type_name(&self) -> Option<String> {
        let t = self.vp.vp_type();
        (!t.is_unknown()).then(|| t.to_string())
    }

    fn imply_value(&self) -> Option<&'static str> {
        self.vp.vp_type().implied_value()
    }

    fn decode(&self, opts: &ParseOptions, _name: &str, arg: &str, set: bool) -> Result<(), Error> {
        let mut value = self.value.borrow_mut();
        decode_with(&self.vp, &mut **value, &self.state, opts, arg, set)
    }

    fn extra(&self) -> Option<&dyn Any> {
        self.extra.as_deref()
    }

    fn state(&self) -> FlagState {
        self.state.get()
    }

    fn has_value(&self) -> bool {
        self.vp.has_value(&**self.value.borrow())
    }

    fn print_value(&self, out: &mut dyn io::Write) -> io::Result<usize> {
        self.vp.print_value(out, &**self.value.borrow())
    }

    fn usage(&self) -> &str {
        &self.usage
    }

    fn completion(&self) -> Option<&dyn CompAction> {
        self.comp.as_deref()
    }
}

/// A flag embedding its value.
pub struct FlagVal<T, P> {
    vp: P,
    value: RefCell<T>,
    state: Cell<FlagState>,
    usage: String,
    comp: Option<Box<dyn CompAction>>,
    extra: Option<Box<dyn Any>>,
}

impl<T, P: Vp<T> + Default> FlagVal<T, P> {
    /// Embeds `value` as the flag's storage.
    pub fn new(value: T) -> Self {
        FlagVal {
            vp: P::default(),
            value: RefCell::new(value),
            state: Cell::new(FlagState::default()),
            usage: String::new(),
            comp: None,
            extra: None,
        }
    }

    /// Sets the brief usage text.
    pub fn brief(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    /// Marks the flag hidden.
    pub fn hidden(self) -> Self {
        self.state.set(self.state.get() | FlagState::HIDDEN);
        self
    }

    /// Allows at most one successful set.
    pub fn at_most_once(self) -> Self {
        self.state.set(self.state.get() | FlagState::SET_AT_MOST_ONCE);
        self
    }

    /// Attaches a completion provider for the flag's values.
    pub fn completion(mut self, comp: impl CompAction + 'static) -> Self {
        self.comp = Some(Box::new(comp));
        self
    }

    /// Attaches extra custom payload.
    pub fn extra(mut self, extra: impl Any) -> Self {
        self.extra = Some(Box::new(extra));
        self
    }
}

impl<T: Clone, P> FlagVal<T, P> {
    /// A copy of the embedded value.
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }
}

impl<T: Default, P: Vp<T> + Default> Default for FlagVal<T, P> {
    fn default() -> Self {
        FlagVal::new(T::default())
    }
}

impl<T, P: Vp<T>> Flag for FlagVal<T, P> {
    fn type_name(&self) -> Option<String> {
        let t = self.vp.vp_type();
        (!t.is_unknown()).then(|| t.to_string())
    }

    fn imply_value(&self) -> Option<&'static str> {
        self.vp.vp_type().implied_value()
    }

    fn decode(&self, opts: &ParseOptions, _name: &str, arg: &str, set: bool) -> Result<(), Error> {
        let mut value = self.value.borrow_mut();
        decode_with(&self.vp, &mut *value, &self.state, opts, arg, set)
    }

    fn extra(&self) -> Option<&dyn Any> {
        self.extra.as_deref()
    }

    fn state(&self) -> FlagState {
        self.state.get()
    }

    fn has_value(&self) -> bool {
        self.vp.has_value(&*self.value.borrow())
    }

    fn print_value(&self, out: &mut dyn io::Write) -> io::Result<usize> {
        self.vp.print_value(out, &*self.value.borrow())
    }

    fn usage(&self) -> &str {
        &self.usage
    }

    fn completion(&self) -> Option<&dyn CompAction> {
        self.comp.as_deref()
    }
}

/// String flag bound to caller storage.
pub type StrFlag<'a> = FlagCell<'a, String, StrVp>;
/// String flag with embedded storage.
pub type StrFlagV = FlagVal<String, StrVp>;
/// Bool flag bound to caller storage.
pub type BoolFlag<'a> = FlagCell<'a, bool, BoolVp>;
/// Bool flag with embedded storage.
pub type BoolFlagV = FlagVal<bool, BoolVp>;
/// `i64` flag bound to caller storage.
pub type IntFlag<'a> = FlagCell<'a, i64, IntVp<i64>>;
/// `i64` flag with embedded storage.
pub type IntFlagV = FlagVal<i64, IntVp<i64>>;
/// `u64` flag bound to caller storage.
pub type UintFlag<'a> = FlagCell<'a, u64, UintVp<u64>>;
/// `u64` flag with embedded storage.
pub type UintFlagV = FlagVal<u64, UintVp<u64>>;
/// `f64` flag bound to caller storage.
pub type FloatFlag<'a> = FlagCell<'a, f64, FloatVp<f64>>;
/// `f64` flag with embedded storage.
pub type FloatFlagV = FlagVal<f64, FloatVp<f64>>;
/// Size flag (bytes in an `i64`) bound to caller storage.
pub type SizeFlag<'a> = FlagCell<'a, i64, SizeVp<i64>>;
/// Size flag with embedded storage.
pub type SizeFlagV = FlagVal<i64, SizeVp<i64>>;
/// Duration flag (nanoseconds in an `i64`) bound to caller storage.
pub type DurationFlag<'a> = FlagCell<'a, i64, DurationVp<i64>>;
/// Duration flag with embedded storage.
pub type DurationFlagV = FlagVal<i64, DurationVp<i64>>;
/// Civil time flag with embedded storage.
pub type TimeFlagV = FlagVal<Option<DateTime<Local>>, TimeVp>;
/// Unix-seconds flag with embedded storage.
pub type UnixSecFlagV = FlagVal<i64, UnixSecVp>;
/// Unix-milliseconds flag with embedded storage.
pub type UnixMilliFlagV = FlagVal<i64, UnixMilliVp>;
/// Unix-microseconds flag with embedded storage.
pub type UnixMicroFlagV = FlagVal<i64, UnixMicroVp>;
/// Unix-nanoseconds flag with embedded storage.
pub type UnixNanoFlagV = FlagVal<i64, UnixNanoVp>;
/// Regexp flag with embedded storage.
pub type RegexpFlagV = FlagVal<Option<Regex>, RegexpVp>;
/// Case-insensitive regexp flag with embedded storage.
pub type RegexpNocaseFlagV = FlagVal<Option<Regex>, RegexpNocaseVp>;
/// Summing `i64` flag bound to caller storage.
pub type IntSumFlag<'a> = FlagCell<'a, i64, SumVp<i64, IntVp<i64>>>;
/// Summing `i64` flag with embedded storage.
pub type IntSumFlagV = FlagVal<i64, SumVp<i64, IntVp<i64>>>;
/// Summing `u64` flag with embedded storage.
pub type UintSumFlagV = FlagVal<u64, SumVp<u64, UintVp<u64>>>;
/// Summing `f64` flag with embedded storage.
pub type FloatSumFlagV = FlagVal<f64, SumVp<f64, FloatVp<f64>>>;
/// Summing size flag with embedded storage.
pub type SizeSumFlagV = FlagVal<i64, SumVp<i64, SizeVp<i64>>>;
/// Summing duration flag with embedded storage.
pub type DurationSumFlagV = FlagVal<i64, SumVp<i64, DurationVp<i64>>>;
/// String slice flag bound to caller storage.
pub type StrSliceFlag<'a> = FlagCell<'a, Vec<String>, SliceVp<String, StrVp>>;
/// String slice flag with embedded storage.
pub type StrSliceFlagV = FlagVal<Vec<String>, SliceVp<String, StrVp>>;
/// Bool slice flag with embedded storage.
pub type BoolSliceFlagV = FlagVal<Vec<bool>, SliceVp<bool, BoolVp>>;
/// `i64` slice flag with embedded storage.
pub type IntSliceFlagV = FlagVal<Vec<i64>, SliceVp<i64, IntVp<i64>>>;
/// String-to-string map flag with embedded storage.
pub type StrMapFlagV = FlagVal<HashMap<String, String>, MapVp<String, String, StrVp, StrVp>>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn opts() -> ParseOptions<'static> {
        ParseOptions::default()
    }

    fn printed(flag: &dyn Flag) -> String {
        let mut buf = Vec::new();
        flag.print_value(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[rstest]
    #[case("a", true)]
    #[case("Z", true)]
    #[case("é", true)]
    #[case("-", false)]
    #[case("", false)]
    #[case("ab", false)]
    #[case("--", false)]
    fn shorthands(#[case] s: &str, #[case] expected: bool) {
        assert_eq!(is_shorthand(s), expected);
    }

    #[test]
    fn bound_storage_mutates_caller_value() {
        let mut count = 0i64;
        {
            let flag = IntSumFlag::new(&mut count);
            flag.decode(&opts(), "V", "1", true).unwrap();
            flag.decode(&opts(), "V", "3", true).unwrap();
            assert!(flag.state().value_changed());
        }
        assert_eq!(count, 4);
    }

    #[test]
    fn embedded_storage() {
        let flag = DurationFlagV::new(61 * 1_000_000_000);
        assert_eq!(flag.type_name().as_deref(), Some("dur"));
        assert_eq!(printed(&flag), "1m1s");
        assert!(flag.has_value());
        assert_eq!(flag.imply_value(), None);
    }

    #[test]
    fn implied_values() {
        let b = BoolFlagV::default();
        assert_eq!(b.imply_value(), Some("true"));

        let sum = IntSumFlagV::default();
        assert_eq!(sum.imply_value(), Some("1"));

        let dsum = DurationSumFlagV::default();
        assert_eq!(dsum.imply_value(), Some("1s"));

        let s = StrFlagV::default();
        assert_eq!(s.imply_value(), None);
    }

    #[test]
    fn at_most_once() {
        let flag = IntFlagV::default().at_most_once();
        flag.decode(&opts(), "n", "1", true).unwrap();
        assert_matches!(
            flag.decode(&opts(), "n", "2", true),
            Err(Error::FlagSetAtMostOnce)
        );
        // validation is still fine
        flag.decode(&opts(), "n", "3", false).unwrap();
        assert_eq!(flag.get(), 1);
    }

    #[test]
    fn validate_never_marks_changed() {
        let flag = StrFlagV::default();
        flag.decode(&opts(), "s", "x", false).unwrap();
        assert!(!flag.state().value_changed());
        flag.decode(&opts(), "s", "x", true).unwrap();
        assert!(flag.state().value_changed());
    }

    #[test]
    fn hidden_builder() {
        let flag = StrFlagV::default().hidden().brief("internal");
        assert!(flag.state().hidden());
        assert_eq!(Flag::usage(&flag), "internal");
    }

    #[test]
    fn slice_flag_appends() {
        let flag = StrSliceFlagV::new(vec!["seed".to_string()]);
        flag.decode(&opts(), "items", "a", true).unwrap();
        flag.decode(&opts(), "items", "b", true).unwrap();
        assert_eq!(printed(&flag), "[seed, a, b]");
        assert_eq!(flag.type_name().as_deref(), Some("[]str"));
    }

    #[test]
    fn map_flag_type() {
        let flag = StrMapFlagV::default();
        assert_eq!(flag.type_name().as_deref(), Some("map[str]str"));
        flag.decode(&opts(), "m", "k=v", true).unwrap();
        assert_eq!(printed(&flag), "[k=v]");
    }
}
