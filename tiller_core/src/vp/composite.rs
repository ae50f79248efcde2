//! Composite value peekers wrapping other VPs.

use std::collections::HashMap;
use std::hash::Hash;
use std::io;
use std::marker::PhantomData;

use crate::error::Error;
use crate::parse::ParseOptions;
use crate::vp::storage::SumStorage;
use crate::vp::{write_str, Vp};
use crate::vptype::{Variant, VpType};

/// VP for `Vec<E>`: each set appends one element parsed by the inner VP.
#[derive(Debug, Clone, Copy)]
pub struct SliceVp<E, P> {
    elem: P,
    _marker: PhantomData<fn() -> E>,
}

impl<E, P: Default> Default for SliceVp<E, P> {
    fn default() -> Self {
        SliceVp {
            elem: P::default(),
            _marker: PhantomData,
        }
    }
}

impl<E: Default, P: Vp<E>> Vp<Vec<E>> for SliceVp<E, P> {
    fn vp_type(&self) -> VpType {
        let inner = self.elem.vp_type();
        match (inner.variant(), inner.elem_scalar()) {
            (Some(Variant::Scalar), Some(elem)) => VpType::slice(elem),
            _ => VpType::UNKNOWN,
        }
    }

    fn has_value(&self, value: &Vec<E>) -> bool {
        !value.is_empty()
    }

    fn parse_value(
        &self,
        opts: &ParseOptions,
        arg: &str,
        out: &mut Vec<E>,
        set: bool,
    ) -> Result<(), Error> {
        let mut elem = E::default();
        self.elem.parse_value(opts, arg, &mut elem, set)?;
        if set {
            out.push(elem);
        }
        Ok(())
    }

    fn print_value(&self, out: &mut dyn io::Write, value: &Vec<E>) -> io::Result<usize> {
        let mut n = write_str(out, "[")?;
        for (i, elem) in value.iter().enumerate() {
            if i != 0 {
                n += write_str(out, ", ")?;
            }
            n += self.elem.print_value(out, elem)?;
        }
        n += write_str(out, "]")?;
        Ok(n)
    }
}

/// VP adding each newly parsed value onto the existing one. Numeric storage
/// only; integer accumulation wraps.
#[derive(Debug, Clone, Copy)]
pub struct SumVp<T, P> {
    inner: P,
    _marker: PhantomData<fn() -> T>,
}

impl<T, P: Default> Default for SumVp<T, P> {
    fn default() -> Self {
        SumVp {
            inner: P::default(),
            _marker: PhantomData,
        }
    }
}

impl<T: SumStorage, P: Vp<T>> Vp<T> for SumVp<T, P> {
    fn vp_type(&self) -> VpType {
        let inner = self.inner.vp_type();
        match (inner.variant(), inner.elem_scalar()) {
            (Some(Variant::Scalar), Some(elem)) => VpType::sum(elem),
            _ => VpType::UNKNOWN,
        }
    }

    fn has_value(&self, value: &T) -> bool {
        *value != T::default()
    }

    fn parse_value(
        &self,
        opts: &ParseOptions,
        arg: &str,
        out: &mut T,
        set: bool,
    ) -> Result<(), Error> {
        let mut step = T::default();
        self.inner.parse_value(opts, arg, &mut step, set)?;
        if set {
            *out = out.accumulate(step);
        }
        Ok(())
    }

    fn print_value(&self, out: &mut dyn io::Write, value: &T) -> io::Result<usize> {
        self.inner.print_value(out, value)
    }
}

/// VP for `HashMap<K, V>`, parsing `key=value` pairs split on the first `=`.
///
/// A missing `=` is an invalid-value error. When the value side is a sum,
/// the existing entry serves as the accumulator base.
#[derive(Debug, Clone, Copy)]
pub struct MapVp<K, V, KP, VP> {
    /// The key codec.
    pub key: KP,
    /// The value codec.
    pub value: VP,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, KP: Default, VP: Default> Default for MapVp<K, V, KP, VP> {
    fn default() -> Self {
        MapVp::new(KP::default(), VP::default())
    }
}

impl<K, V, KP, VP> MapVp<K, V, KP, VP> {
    /// Composes a map VP from its key and value codecs.
    pub fn new(key: KP, value: VP) -> Self {
        MapVp {
            key,
            value,
            _marker: PhantomData,
        }
    }
}

impl<K, V, KP, VP> Vp<HashMap<K, V>> for MapVp<K, V, KP, VP>
where
    K: Eq + Hash + Default,
    V: Default + Clone,
    KP: Vp<K>,
    VP: Vp<V>,
{
    fn vp_type(&self) -> VpType {
        let key = self.key.vp_type();
        match (key.variant(), key.elem_scalar()) {
            // keys can only be plain scalars
            (Some(Variant::Scalar), Some(key_scalar)) => {
                VpType::map(key_scalar, self.value.vp_type())
            }
            _ => VpType::UNKNOWN,
        }
    }

    fn has_value(&self, value: &HashMap<K, V>) -> bool {
        !value.is_empty()
    }

    fn parse_value(
        &self,
        opts: &ParseOptions,
        arg: &str,
        out: &mut HashMap<K, V>,
        set: bool,
    ) -> Result<(), Error> {
        let Some((key_text, value_text)) = arg.split_once('=') else {
            return Err(Error::invalid_value("map", arg));
        };

        let mut key = K::default();
        self.key.parse_value(opts, key_text, &mut key, set)?;

        let mut value = if set {
            out.get(&key).cloned().unwrap_or_default()
        } else {
            V::default()
        };
        self.value.parse_value(opts, value_text, &mut value, set)?;

        if set {
            out.insert(key, value);
        }
        Ok(())
    }

    fn print_value(&self, out: &mut dyn io::Write, value: &HashMap<K, V>) -> io::Result<usize> {
        let mut n = write_str(out, "[")?;
        for (i, (k, v)) in value.iter().enumerate() {
            if i != 0 {
                n += write_str(out, ", ")?;
            }
            n += self.key.print_value(out, k)?;
            n += write_str(out, "=")?;
            n += self.value.print_value(out, v)?;
        }
        n += write_str(out, "]")?;
        Ok(n)
    }
}

/// Transparent wrapper for `Option<T>` storage: the target is initialized
/// only on the first successful set.
#[derive(Debug, Clone, Copy)]
pub struct OptionVp<T, P> {
    inner: P,
    _marker: PhantomData<fn() -> T>,
}

impl<T, P: Default> Default for OptionVp<T, P> {
    fn default() -> Self {
        OptionVp {
            inner: P::default(),
            _marker: PhantomData,
        }
    }
}

impl<T: Default, P: Vp<T>> Vp<Option<T>> for OptionVp<T, P> {
    fn vp_type(&self) -> VpType {
        self.inner.vp_type()
    }

    fn has_value(&self, value: &Option<T>) -> bool {
        value.as_ref().is_some_and(|v| self.inner.has_value(v))
    }

    fn parse_value(
        &self,
        opts: &ParseOptions,
        arg: &str,
        out: &mut Option<T>,
        set: bool,
    ) -> Result<(), Error> {
        if set {
            if let Some(existing) = out.as_mut() {
                return self.inner.parse_value(opts, arg, existing, true);
            }

            let mut fresh = T::default();
            self.inner.parse_value(opts, arg, &mut fresh, true)?;
            *out = Some(fresh);
            return Ok(());
        }

        let mut scratch = T::default();
        self.inner.parse_value(opts, arg, &mut scratch, false)
    }

    fn print_value(&self, out: &mut dyn io::Write, value: &Option<T>) -> io::Result<usize> {
        match value {
            Some(v) => self.inner.print_value(out, v),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vp::scalar::{BoolVp, DurationVp, IntVp, StrVp, UintVp};
    use crate::vptype::ScalarType;

    fn opts() -> ParseOptions<'static> {
        ParseOptions::default()
    }

    fn print<T>(vp: &impl Vp<T>, value: &T) -> String {
        let mut buf = Vec::new();
        vp.print_value(&mut buf, value).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn slice_appends() {
        let vp = SliceVp::<i64, IntVp<i64>>::default();
        let mut value = vec![1i64];
        vp.parse_value(&opts(), "2", &mut value, true).unwrap();
        vp.parse_value(&opts(), "3", &mut value, true).unwrap();
        assert_eq!(value, vec![1, 2, 3]);
        assert_eq!(print(&vp, &value), "[1, 2, 3]");
        assert_eq!(vp.vp_type().to_string(), "[]int");
    }

    #[test]
    fn slice_validate_leaves_storage() {
        let vp = SliceVp::<bool, BoolVp>::default();
        let mut value = Vec::new();
        vp.parse_value(&opts(), "true", &mut value, false).unwrap();
        assert!(value.is_empty());
        assert!(vp.parse_value(&opts(), "nope", &mut value, false).is_err());
    }

    #[test]
    fn sum_accumulates() {
        let vp = SumVp::<i64, IntVp<i64>>::default();
        let mut value = 0i64;
        vp.parse_value(&opts(), "1", &mut value, true).unwrap();
        vp.parse_value(&opts(), "3", &mut value, true).unwrap();
        vp.parse_value(&opts(), "-1", &mut value, true).unwrap();
        assert_eq!(value, 3);
        assert_eq!(vp.vp_type().to_string(), "isum");
        assert_eq!(vp.vp_type().implied_value(), Some("1"));
    }

    #[test]
    fn duration_sum_implies_one_second() {
        let vp = SumVp::<i64, DurationVp<i64>>::default();
        assert_eq!(vp.vp_type().to_string(), "dsum");
        assert_eq!(vp.vp_type().implied_value(), Some("1s"));

        let mut value = 0i64;
        vp.parse_value(&opts(), "1s", &mut value, true).unwrap();
        vp.parse_value(&opts(), "1s", &mut value, true).unwrap();
        assert_eq!(value, 2_000_000_000);
    }

    #[test]
    fn map_inserts_and_accumulates() {
        let vp = MapVp::<String, u64, StrVp, SumVp<u64, UintVp<u64>>>::default();
        let mut value = HashMap::new();
        vp.parse_value(&opts(), "hits=2", &mut value, true).unwrap();
        vp.parse_value(&opts(), "hits=3", &mut value, true).unwrap();
        assert_eq!(value.get("hits"), Some(&5));
        assert_eq!(vp.vp_type().to_string(), "map[str]usum");
    }

    #[test]
    fn map_requires_separator() {
        let vp = MapVp::<String, String, StrVp, StrVp>::default();
        let mut value = HashMap::new();
        assert_matches::assert_matches!(
            vp.parse_value(&opts(), "no-separator", &mut value, true),
            Err(Error::InvalidValue { .. })
        );

        vp.parse_value(&opts(), "k=a=b", &mut value, true).unwrap();
        assert_eq!(value.get("k").map(String::as_str), Some("a=b"));
        assert_eq!(print(&vp, &value), "[k=a=b]");
    }

    #[test]
    fn option_lazily_initializes() {
        let vp = OptionVp::<i64, IntVp<i64>>::default();
        let mut value: Option<i64> = None;

        vp.parse_value(&opts(), "5", &mut value, false).unwrap();
        assert_eq!(value, None);

        vp.parse_value(&opts(), "5", &mut value, true).unwrap();
        assert_eq!(value, Some(5));
        assert!(vp.has_value(&value));
        assert!(!vp.has_value(&Some(0)));
        assert!(!vp.has_value(&None));
    }

    #[test]
    fn composite_type_validation() {
        // slice of slice has no descriptor
        let vp = SliceVp::<Vec<i64>, SliceVp<i64, IntVp<i64>>>::default();
        assert!(vp.vp_type().is_unknown());

        let t = MapVp::<String, Vec<i64>, StrVp, SliceVp<i64, IntVp<i64>>>::default().vp_type();
        assert_eq!(t.elem_scalar(), Some(ScalarType::Int));
        assert_eq!(t.to_string(), "map[str][]int");
    }
}
