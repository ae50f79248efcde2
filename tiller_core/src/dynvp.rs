//! The tag-union codec behind the struct-binding indexer.
//!
//! The generic [`Vp`](crate::Vp) implementations are monomorphized per
//! storage type; the binding path instead works on an erased value cell
//! ([`DynCell`]) driven by a codec ([`DynVp`]) a factory selects from the
//! bound field's shape and the tag hints.

use std::fmt;
use std::io;

use chrono::{DateTime, Local};
use regex::Regex;

use crate::error::Error;
use crate::parse::ParseOptions;
use crate::scan;
use crate::vp::write_str;
use crate::vptype::{ScalarType, VpType};

/// An erased value cell holding one bound field's value while decoding.
#[derive(Debug, Clone, Default)]
pub enum DynCell {
    /// Text.
    #[default]
    Empty,
    /// A string value.
    Str(String),
    /// A bool value.
    Bool(bool),
    /// A signed integer value, any width.
    Int(i64),
    /// An unsigned integer value, any width.
    Uint(u64),
    /// A float value, any width.
    Float(f64),
    /// A civil time value.
    Time(Option<DateTime<Local>>),
    /// A compiled regular expression.
    Regex(Option<Regex>),
    /// A sequence of scalar cells.
    Seq(Vec<DynCell>),
    /// Key/value pairs of scalar keys and scalar/sequence values.
    Map(Vec<(DynCell, DynCell)>),
}

impl PartialEq for DynCell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DynCell::Empty, DynCell::Empty) => true,
            (DynCell::Str(a), DynCell::Str(b)) => a == b,
            (DynCell::Bool(a), DynCell::Bool(b)) => a == b,
            (DynCell::Int(a), DynCell::Int(b)) => a == b,
            (DynCell::Uint(a), DynCell::Uint(b)) => a == b,
            (DynCell::Float(a), DynCell::Float(b)) => a == b,
            (DynCell::Time(a), DynCell::Time(b)) => a == b,
            (DynCell::Regex(a), DynCell::Regex(b)) => {
                a.as_ref().map(Regex::as_str) == b.as_ref().map(Regex::as_str)
            }
            (DynCell::Seq(a), DynCell::Seq(b)) => a == b,
            (DynCell::Map(a), DynCell::Map(b)) => a == b,
            _ => false,
        }
    }
}

/// The storage kind of one bound scalar, as reported by the derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// `String`.
    Str,
    /// `bool`.
    Bool,
    /// `i8`.
    I8,
    /// `i16`.
    I16,
    /// `i32`.
    I32,
    /// `i64`.
    I64,
    /// `u8`.
    U8,
    /// `u16`.
    U16,
    /// `u32`.
    U32,
    /// `u64`.
    U64,
    /// `f32`.
    F32,
    /// `f64`.
    F64,
    /// `chrono::DateTime<Local>`, possibly `Option`-wrapped.
    Time,
    /// `regex::Regex`, possibly `Option`-wrapped.
    Regex,
}

impl CellKind {
    fn bits(self) -> u32 {
        match self {
            CellKind::I8 | CellKind::U8 => 8,
            CellKind::I16 | CellKind::U16 => 16,
            CellKind::I32 | CellKind::U32 | CellKind::F32 => 32,
            CellKind::I64 | CellKind::U64 | CellKind::F64 => 64,
            _ => 0,
        }
    }

    fn is_signed_int(self) -> bool {
        matches!(
            self,
            CellKind::I8 | CellKind::I16 | CellKind::I32 | CellKind::I64
        )
    }

    fn is_unsigned_int(self) -> bool {
        matches!(
            self,
            CellKind::U8 | CellKind::U16 | CellKind::U32 | CellKind::U64
        )
    }

    fn is_int(self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    fn is_float(self) -> bool {
        matches!(self, CellKind::F32 | CellKind::F64)
    }

    fn rust_name(self) -> &'static str {
        match self {
            CellKind::Str => "String",
            CellKind::Bool => "bool",
            CellKind::I8 => "i8",
            CellKind::I16 => "i16",
            CellKind::I32 => "i32",
            CellKind::I64 => "i64",
            CellKind::U8 => "u8",
            CellKind::U16 => "u16",
            CellKind::U32 => "u32",
            CellKind::U64 => "u64",
            CellKind::F32 => "f32",
            CellKind::F64 => "f64",
            CellKind::Time => "DateTime<Local>",
            CellKind::Regex => "Regex",
        }
    }

    /// The empty cell of this kind.
    pub fn empty_cell(self) -> DynCell {
        match self {
            CellKind::Str => DynCell::Str(String::new()),
            CellKind::Bool => DynCell::Bool(false),
            kind if kind.is_signed_int() => DynCell::Int(0),
            kind if kind.is_unsigned_int() => DynCell::Uint(0),
            kind if kind.is_float() => DynCell::Float(0.0),
            CellKind::Time => DynCell::Time(None),
            _ => DynCell::Regex(None),
        }
    }
}

/// The shape of a bound field, as reported by the derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// A single scalar field.
    Scalar(CellKind),
    /// A `Vec` of scalars.
    Seq(CellKind),
    /// A map from scalar keys to scalar or `Vec` values.
    Map(CellKind, MapValShape),
}

/// The value side of a bound map field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapValShape {
    /// Scalar values.
    Scalar(CellKind),
    /// `Vec` values.
    Seq(CellKind),
}

impl fmt::Display for FieldShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldShape::Scalar(kind) => f.write_str(kind.rust_name()),
            FieldShape::Seq(kind) => write!(f, "Vec<{}>", kind.rust_name()),
            FieldShape::Map(key, MapValShape::Scalar(value)) => {
                write!(f, "HashMap<{}, {}>", key.rust_name(), value.rust_name())
            }
            FieldShape::Map(key, MapValShape::Seq(value)) => {
                write!(f, "HashMap<{}, Vec<{}>>", key.rust_name(), value.rust_name())
            }
        }
    }
}

/// The scalar codec of the binding path.
#[derive(Debug, Clone, Copy)]
pub struct DynScalarVp {
    scalar: ScalarType,
    cell: CellKind,
}

fn fit_int(cell: CellKind, neg: bool, magnitude: u64, arg: &str, kind: &str) -> Result<DynCell, Error> {
    let err = || Error::invalid_value(kind, arg);

    if cell.is_signed_int() {
        let wide = if neg {
            -(magnitude as i128)
        } else {
            magnitude as i128
        };

        let bits = cell.bits();
        let min = -(1i128 << (bits - 1));
        let max = (1i128 << (bits - 1)) - 1;
        if wide < min || wide > max {
            return Err(err());
        }

        Ok(DynCell::Int(wide as i64))
    } else if cell.is_unsigned_int() {
        // a sign prefix is not permitted, not even on zero
        if neg {
            return Err(err());
        }

        let bits = cell.bits();
        if bits < 64 && magnitude >> bits != 0 {
            return Err(err());
        }

        Ok(DynCell::Uint(magnitude))
    } else {
        Err(err())
    }
}

impl DynScalarVp {
    fn vp_type(&self) -> VpType {
        VpType::scalar(self.scalar)
    }

    fn has_value(&self, cell: &DynCell) -> bool {
        match cell {
            DynCell::Empty => false,
            DynCell::Str(s) => !s.is_empty(),
            DynCell::Bool(b) => *b,
            DynCell::Int(v) => *v != 0,
            DynCell::Uint(v) => *v != 0,
            DynCell::Float(v) => *v != 0.0,
            DynCell::Time(t) => t.is_some(),
            DynCell::Regex(re) => re.as_ref().is_some_and(|re| !re.as_str().is_empty()),
            DynCell::Seq(items) => !items.is_empty(),
            DynCell::Map(pairs) => !pairs.is_empty(),
        }
    }

    fn parse(&self, opts: &ParseOptions, arg: &str, out: &mut DynCell, set: bool) -> Result<(), Error> {
        let parsed = match self.scalar {
            ScalarType::Str => DynCell::Str(arg.to_string()),
            ScalarType::Bool => match arg {
                "true" | "yes" | "y" | "on" | "1" => DynCell::Bool(true),
                "false" | "no" | "n" | "off" | "0" => DynCell::Bool(false),
                _ => return Err(Error::invalid_value("bool", arg)),
            },
            ScalarType::Int | ScalarType::Uint => {
                let kind = if self.scalar == ScalarType::Int {
                    "int"
                } else {
                    "uint"
                };
                let (neg, magnitude) =
                    scan::parse_int(arg).ok_or_else(|| Error::invalid_value(kind, arg))?;
                if self.scalar == ScalarType::Uint && neg {
                    return Err(Error::invalid_value(kind, arg));
                }

                fit_int(self.cell, neg, magnitude, arg, kind)?
            }
            ScalarType::Float => {
                let wide: f64 = arg
                    .parse()
                    .map_err(|_| Error::invalid_value("float", arg))?;
                if self.cell == CellKind::F32
                    && wide.is_finite()
                    && ((wide as f32) as f64 - wide).abs() > 0.1
                {
                    return Err(Error::invalid_value("float", arg));
                }

                DynCell::Float(wide)
            }
            ScalarType::Size => {
                let (neg, magnitude) = scan::parse_size(arg)?;
                fit_int(self.cell, neg, magnitude, arg, "size")?
            }
            ScalarType::Duration => {
                let (neg, magnitude) = scan::parse_duration(arg, opts.start_time())?;
                fit_int(self.cell, neg, magnitude, arg, "duration")?
            }
            ScalarType::Time => DynCell::Time(Some(scan::parse_time(arg, opts.start_time())?)),
            ScalarType::UnixSec => {
                DynCell::Int(scan::parse_time(arg, opts.start_time())?.timestamp())
            }
            ScalarType::UnixMilli => {
                DynCell::Int(scan::parse_time(arg, opts.start_time())?.timestamp_millis())
            }
            ScalarType::UnixMicro => {
                DynCell::Int(scan::parse_time(arg, opts.start_time())?.timestamp_micros())
            }
            ScalarType::UnixNano => DynCell::Int(
                scan::parse_time(arg, opts.start_time())?
                    .timestamp_nanos_opt()
                    .unwrap_or(0),
            ),
            ScalarType::Regexp => DynCell::Regex(Some(
                Regex::new(arg).map_err(|_| Error::invalid_value("regexp", arg))?,
            )),
            ScalarType::RegexpNocase => DynCell::Regex(Some(
                Regex::new(&format!("(?i:{arg})"))
                    .map_err(|_| Error::invalid_value("regexp", arg))?,
            )),
        };

        if set {
            *out = parsed;
        }
        Ok(())
    }

    fn print(&self, out: &mut dyn io::Write, cell: &DynCell) -> io::Result<usize> {
        match (self.scalar, cell) {
            (_, DynCell::Str(s)) => write_str(out, s),
            (_, DynCell::Bool(b)) => write_str(out, if *b { "true" } else { "false" }),
            (ScalarType::Size, DynCell::Int(v)) => {
                let mut n = 0;
                if *v < 0 {
                    n += write_str(out, "-")?;
                }
                n += scan::write_size(out, v.unsigned_abs())?;
                Ok(n)
            }
            (ScalarType::Size, DynCell::Uint(v)) => scan::write_size(out, *v),
            (ScalarType::Duration, DynCell::Int(v)) => {
                let mut n = 0;
                if *v < 0 {
                    n += write_str(out, "-")?;
                }
                n += scan::write_duration(out, v.unsigned_abs())?;
                Ok(n)
            }
            (ScalarType::Duration, DynCell::Uint(v)) => scan::write_duration(out, *v),
            (
                ScalarType::UnixSec
                | ScalarType::UnixMilli
                | ScalarType::UnixMicro
                | ScalarType::UnixNano,
                DynCell::Int(v),
            ) => {
                let (secs, nanos) = match self.scalar {
                    ScalarType::UnixSec => (*v, 0),
                    ScalarType::UnixMilli => {
                        (v.div_euclid(1_000), (v.rem_euclid(1_000) * 1_000_000) as u32)
                    }
                    ScalarType::UnixMicro => {
                        (v.div_euclid(1_000_000), (v.rem_euclid(1_000_000) * 1_000) as u32)
                    }
                    _ => (
                        v.div_euclid(1_000_000_000),
                        v.rem_euclid(1_000_000_000) as u32,
                    ),
                };
                let t = chrono::TimeZone::timestamp_opt(&Local, secs, nanos).single();

                match t {
                    Some(t) => write_str(
                        out,
                        &t.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
                    ),
                    None => Ok(0),
                }
            }
            (_, DynCell::Int(v)) => write_str(out, &v.to_string()),
            (_, DynCell::Uint(v)) => write_str(out, &v.to_string()),
            (_, DynCell::Float(v)) => {
                if self.cell == CellKind::F32 {
                    write_str(out, &(*v as f32).to_string())
                } else {
                    write_str(out, &v.to_string())
                }
            }
            (_, DynCell::Time(Some(t))) => write_str(
                out,
                &t.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            ),
            (ScalarType::RegexpNocase, DynCell::Regex(Some(re))) => {
                let pattern = re.as_str();
                let stripped = pattern
                    .strip_prefix("(?i:")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .unwrap_or(pattern);
                write_str(out, stripped)
            }
            (_, DynCell::Regex(Some(re))) => write_str(out, re.as_str()),
            _ => Ok(0),
        }
    }

    fn accumulate(&self, base: &DynCell, step: DynCell) -> DynCell {
        match (base, &step) {
            (DynCell::Int(a), DynCell::Int(b)) => DynCell::Int(a.wrapping_add(*b)),
            (DynCell::Uint(a), DynCell::Uint(b)) => DynCell::Uint(a.wrapping_add(*b)),
            (DynCell::Float(a), DynCell::Float(b)) => DynCell::Float(a + b),
            (DynCell::Empty, _) => step,
            _ => step,
        }
    }
}

/// The erased-value codec: the binding-path rendition of the generic VPs.
#[derive(Debug, Clone)]
pub enum DynVp {
    /// A scalar codec.
    Scalar(DynScalarVp),
    /// A sequence codec appending one element per set.
    Seq(DynScalarVp),
    /// A numeric codec accumulating over repeated sets.
    Sum(DynScalarVp),
    /// A map codec parsing `key=value` pairs.
    Map {
        /// The key codec.
        key: DynScalarVp,
        /// The value codec.
        value: DynMapValVp,
    },
}

/// The value-side codec of a bound map.
#[derive(Debug, Clone)]
pub enum DynMapValVp {
    /// Scalar values.
    Scalar(DynScalarVp),
    /// Sequence values.
    Seq(DynScalarVp),
    /// Summed values.
    Sum(DynScalarVp),
}

impl DynVp {
    /// The packed descriptor of the handled type.
    pub fn vp_type(&self) -> VpType {
        match self {
            DynVp::Scalar(vp) => vp.vp_type(),
            DynVp::Seq(vp) => VpType::slice(vp.scalar),
            DynVp::Sum(vp) => VpType::sum(vp.scalar),
            DynVp::Map { key, value } => {
                let value_type = match value {
                    DynMapValVp::Scalar(vp) => vp.vp_type(),
                    DynMapValVp::Seq(vp) => VpType::slice(vp.scalar),
                    DynMapValVp::Sum(vp) => VpType::sum(vp.scalar),
                };

                VpType::map(key.scalar, value_type)
            }
        }
    }

    /// The text implied by the flag name alone, if any.
    pub fn implied_value(&self) -> Option<&'static str> {
        self.vp_type().implied_value()
    }

    /// True when printing `cell` would emit a non-empty representation.
    pub fn has_value(&self, cell: &DynCell) -> bool {
        match self {
            DynVp::Scalar(vp) | DynVp::Seq(vp) | DynVp::Sum(vp) => vp.has_value(cell),
            DynVp::Map { key, .. } => key.has_value(cell),
        }
    }

    /// Parses `arg` into `cell`; with `set = false` only validates.
    pub fn parse(
        &self,
        opts: &ParseOptions,
        arg: &str,
        cell: &mut DynCell,
        set: bool,
    ) -> Result<(), Error> {
        match self {
            DynVp::Scalar(vp) => vp.parse(opts, arg, cell, set),
            DynVp::Seq(vp) => {
                let mut element = vp.cell.empty_cell();
                vp.parse(opts, arg, &mut element, set)?;
                if set {
                    match cell {
                        DynCell::Seq(items) => items.push(element),
                        _ => *cell = DynCell::Seq(vec![element]),
                    }
                }
                Ok(())
            }
            DynVp::Sum(vp) => {
                let mut step = vp.cell.empty_cell();
                vp.parse(opts, arg, &mut step, set)?;
                if set {
                    *cell = vp.accumulate(cell, step);
                }
                Ok(())
            }
            DynVp::Map { key, value } => {
                let Some((key_text, value_text)) = arg.split_once('=') else {
                    return Err(Error::invalid_value("map", arg));
                };

                let mut key_cell = key.cell.empty_cell();
                key.parse(opts, key_text, &mut key_cell, set)?;

                if !set {
                    let mut scratch = match value {
                        DynMapValVp::Scalar(vp) | DynMapValVp::Sum(vp) => vp.cell.empty_cell(),
                        DynMapValVp::Seq(_) => DynCell::Seq(Vec::new()),
                    };
                    return self.parse_map_value(opts, value_text, &mut scratch, false, value);
                }

                let pairs = match cell {
                    DynCell::Map(pairs) => pairs,
                    _ => {
                        *cell = DynCell::Map(Vec::new());
                        match cell {
                            DynCell::Map(pairs) => pairs,
                            _ => unreachable!(),
                        }
                    }
                };

                match pairs.iter().position(|(k, _)| *k == key_cell) {
                    Some(index) => {
                        let mut updated = pairs[index].1.clone();
                        self.parse_map_value(opts, value_text, &mut updated, true, value)?;
                        pairs[index].1 = updated;
                    }
                    None => {
                        let mut fresh = match value {
                            DynMapValVp::Scalar(vp) | DynMapValVp::Sum(vp) => vp.cell.empty_cell(),
                            DynMapValVp::Seq(_) => DynCell::Seq(Vec::new()),
                        };
                        self.parse_map_value(opts, value_text, &mut fresh, true, value)?;
                        pairs.push((key_cell, fresh));
                    }
                }

                Ok(())
            }
        }
    }

    fn parse_map_value(
        &self,
        opts: &ParseOptions,
        text: &str,
        cell: &mut DynCell,
        set: bool,
        value: &DynMapValVp,
    ) -> Result<(), Error> {
        match value {
            DynMapValVp::Scalar(vp) => vp.parse(opts, text, cell, set),
            DynMapValVp::Sum(vp) => {
                let mut step = vp.cell.empty_cell();
                vp.parse(opts, text, &mut step, set)?;
                if set {
                    *cell = vp.accumulate(cell, step);
                }
                Ok(())
            }
            DynMapValVp::Seq(vp) => {
                let mut element = vp.cell.empty_cell();
                vp.parse(opts, text, &mut element, set)?;
                if set {
                    match cell {
                        DynCell::Seq(items) => items.push(element),
                        _ => *cell = DynCell::Seq(vec![element]),
                    }
                }
                Ok(())
            }
        }
    }

    /// Writes the text representation of `cell`.
    pub fn print(&self, out: &mut dyn io::Write, cell: &DynCell) -> io::Result<usize> {
        match (self, cell) {
            (DynVp::Scalar(vp), _) | (DynVp::Sum(vp), _) => vp.print(out, cell),
            (DynVp::Seq(vp), DynCell::Seq(items)) => print_seq(out, vp, items),
            (DynVp::Seq(vp), _) => vp.print(out, cell),
            (DynVp::Map { key, value }, DynCell::Map(pairs)) => {
                let mut n = write_str(out, "[")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i != 0 {
                        n += write_str(out, ", ")?;
                    }
                    n += key.print(out, k)?;
                    n += write_str(out, "=")?;
                    n += match (value, v) {
                        (DynMapValVp::Seq(vp), DynCell::Seq(items)) => print_seq(out, vp, items)?,
                        (DynMapValVp::Scalar(vp), _) | (DynMapValVp::Sum(vp), _) => {
                            vp.print(out, v)?
                        }
                        (DynMapValVp::Seq(vp), _) => vp.print(out, v)?,
                    };
                }
                n += write_str(out, "]")?;
                Ok(n)
            }
            (DynVp::Map { .. }, _) => Ok(0),
        }
    }
}

fn print_seq(out: &mut dyn io::Write, vp: &DynScalarVp, items: &[DynCell]) -> io::Result<usize> {
    let mut n = write_str(out, "[")?;
    for (i, item) in items.iter().enumerate() {
        if i != 0 {
            n += write_str(out, ", ")?;
        }
        n += vp.print(out, item)?;
    }
    n += write_str(out, "]")?;
    Ok(n)
}

/// Derives a [`DynVp`] codec for a bound field.
pub trait DynVpFactory {
    /// The codec for a field of `shape` under the tag's `key=`/`value=`
    /// hints (empty strings when absent).
    fn vp_for(&self, shape: &FieldShape, key_hint: &str, value_hint: &str) -> Result<DynVp, Error>;
}

/// The stock factory recognizing the hint set of the tag grammar:
/// `size`, `dur`, `sum`, `ssum`, `dsum`, `regexp`, `regexp-nocase`, `time`,
/// `unix-ts`, `unix-ms`, `unix-us`, `unix-ns` for values; the same set
/// minus the sum variants and regexps for keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDynVpFactory;

// (semantic scalar, wants sum) for a hint over a storage kind; None when
// the combination is unsupported.
fn scalar_for(hint: &str, cell: CellKind) -> Option<(ScalarType, bool)> {
    match hint {
        "dur" | "dsum" => cell
            .is_int()
            .then_some((ScalarType::Duration, hint == "dsum")),
        "size" | "ssum" => cell.is_int().then_some((ScalarType::Size, hint == "ssum")),
        "unix-ts" => (cell == CellKind::I64).then_some((ScalarType::UnixSec, false)),
        "unix-ms" => (cell == CellKind::I64).then_some((ScalarType::UnixMilli, false)),
        "unix-us" => (cell == CellKind::I64).then_some((ScalarType::UnixMicro, false)),
        "unix-ns" => (cell == CellKind::I64).then_some((ScalarType::UnixNano, false)),
        "time" => (cell == CellKind::Time).then_some((ScalarType::Time, false)),
        "regexp" => (cell == CellKind::Regex).then_some((ScalarType::Regexp, false)),
        "regexp-nocase" => (cell == CellKind::Regex).then_some((ScalarType::RegexpNocase, false)),
        // time and regexp storages always need an explicit hint
        "" | "sum" => {
            let scalar = match cell {
                CellKind::Str => ScalarType::Str,
                CellKind::Bool => ScalarType::Bool,
                CellKind::Time | CellKind::Regex => return None,
                kind if kind.is_signed_int() => ScalarType::Int,
                kind if kind.is_unsigned_int() => ScalarType::Uint,
                _ => ScalarType::Float,
            };

            if hint == "sum"
                && !matches!(scalar, ScalarType::Int | ScalarType::Uint | ScalarType::Float)
            {
                return None;
            }

            Some((scalar, hint == "sum"))
        }
        _ => None,
    }
}

fn key_scalar_for(hint: &str, cell: CellKind) -> Option<ScalarType> {
    match hint {
        "sum" | "ssum" | "dsum" | "regexp" | "regexp-nocase" => None,
        _ => scalar_for(hint, cell).map(|(scalar, _)| scalar),
    }
}

impl DynVpFactory for DefaultDynVpFactory {
    fn vp_for(&self, shape: &FieldShape, key_hint: &str, value_hint: &str) -> Result<DynVp, Error> {
        let unsupported = || Error::UnsupportedType {
            type_name: shape.to_string(),
            key_hint: key_hint.to_string(),
            value_hint: value_hint.to_string(),
        };

        match shape {
            FieldShape::Scalar(cell) => {
                let (scalar, sum) = scalar_for(value_hint, *cell).ok_or_else(unsupported)?;
                let vp = DynScalarVp {
                    scalar,
                    cell: *cell,
                };

                Ok(if sum { DynVp::Sum(vp) } else { DynVp::Scalar(vp) })
            }
            FieldShape::Seq(cell) => {
                let (scalar, sum) = scalar_for(value_hint, *cell).ok_or_else(unsupported)?;
                if sum {
                    return Err(unsupported());
                }

                Ok(DynVp::Seq(DynScalarVp {
                    scalar,
                    cell: *cell,
                }))
            }
            FieldShape::Map(key_cell, value_shape) => {
                let key_scalar = key_scalar_for(key_hint, *key_cell).ok_or_else(unsupported)?;
                let key = DynScalarVp {
                    scalar: key_scalar,
                    cell: *key_cell,
                };

                let value = match value_shape {
                    MapValShape::Scalar(cell) => {
                        let (scalar, sum) =
                            scalar_for(value_hint, *cell).ok_or_else(unsupported)?;
                        let vp = DynScalarVp {
                            scalar,
                            cell: *cell,
                        };

                        if sum {
                            DynMapValVp::Sum(vp)
                        } else {
                            DynMapValVp::Scalar(vp)
                        }
                    }
                    MapValShape::Seq(cell) => {
                        let (scalar, sum) =
                            scalar_for(value_hint, *cell).ok_or_else(unsupported)?;
                        if sum {
                            return Err(unsupported());
                        }

                        DynMapValVp::Seq(DynScalarVp {
                            scalar,
                            cell: *cell,
                        })
                    }
                };

                Ok(DynVp::Map { key, value })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn opts() -> ParseOptions<'static> {
        ParseOptions::default()
    }

    fn printed(vp: &DynVp, cell: &DynCell) -> String {
        let mut buf = Vec::new();
        vp.print(&mut buf, cell).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn make(shape: FieldShape, key_hint: &str, value_hint: &str) -> DynVp {
        DefaultDynVpFactory
            .vp_for(&shape, key_hint, value_hint)
            .unwrap()
    }

    #[rstest]
    #[case(FieldShape::Scalar(CellKind::Str), "", "str")]
    #[case(FieldShape::Scalar(CellKind::Bool), "", "bool")]
    #[case(FieldShape::Scalar(CellKind::I32), "", "int")]
    #[case(FieldShape::Scalar(CellKind::U16), "", "uint")]
    #[case(FieldShape::Scalar(CellKind::F64), "", "float")]
    #[case(FieldShape::Scalar(CellKind::I64), "dur", "dur")]
    #[case(FieldShape::Scalar(CellKind::I64), "dsum", "dsum")]
    #[case(FieldShape::Scalar(CellKind::U64), "ssum", "ssum")]
    #[case(FieldShape::Scalar(CellKind::I32), "sum", "isum")]
    #[case(FieldShape::Seq(CellKind::Str), "", "[]str")]
    #[case(FieldShape::Seq(CellKind::U8), "", "[]uint")]
    fn factory_types(
        #[case] shape: FieldShape,
        #[case] value_hint: &str,
        #[case] expected: &str,
    ) {
        let vp = make(shape, "", value_hint);
        assert_eq!(vp.vp_type().to_string(), expected);
    }

    #[test]
    fn factory_map_types() {
        let vp = make(
            FieldShape::Map(CellKind::Str, MapValShape::Seq(CellKind::Regex)),
            "",
            "regexp",
        );
        assert_eq!(vp.vp_type().to_string(), "map[str][]regexp");

        let vp = make(
            FieldShape::Map(CellKind::I64, MapValShape::Scalar(CellKind::U32)),
            "dur",
            "sum",
        );
        assert_eq!(vp.vp_type().to_string(), "map[dur]usum");
    }

    #[rstest]
    #[case(FieldShape::Scalar(CellKind::Bool), "", "sum")]
    #[case(FieldShape::Scalar(CellKind::Str), "", "dur")]
    #[case(FieldShape::Scalar(CellKind::I32), "", "unix-ts")]
    #[case(FieldShape::Scalar(CellKind::I64), "", "nonsense")]
    #[case(FieldShape::Seq(CellKind::I64), "", "sum")]
    #[case(FieldShape::Map(CellKind::Str, MapValShape::Scalar(CellKind::I64)), "regexp", "")]
    fn factory_rejects(
        #[case] shape: FieldShape,
        #[case] key_hint: &str,
        #[case] value_hint: &str,
    ) {
        assert_matches!(
            DefaultDynVpFactory.vp_for(&shape, key_hint, value_hint),
            Err(Error::UnsupportedType { .. })
        );
    }

    #[test]
    fn int_width_checks() {
        let vp = make(FieldShape::Scalar(CellKind::I8), "", "");
        let mut cell = DynCell::Int(0);
        vp.parse(&opts(), "-128", &mut cell, true).unwrap();
        assert_eq!(cell, DynCell::Int(-128));
        assert!(vp.parse(&opts(), "128", &mut cell, true).is_err());

        let vp = make(FieldShape::Scalar(CellKind::U8), "", "");
        let mut cell = DynCell::Uint(0);
        assert!(vp.parse(&opts(), "256", &mut cell, true).is_err());
        // the sign prefix is rejected even on zero
        assert!(vp.parse(&opts(), "-0", &mut cell, true).is_err());
        vp.parse(&opts(), "255", &mut cell, true).unwrap();
        assert_eq!(cell, DynCell::Uint(255));
    }

    #[test]
    fn sum_accumulates() {
        let vp = make(FieldShape::Scalar(CellKind::I64), "", "sum");
        let mut cell = DynCell::Int(0);
        vp.parse(&opts(), "1", &mut cell, true).unwrap();
        vp.parse(&opts(), "41", &mut cell, true).unwrap();
        assert_eq!(cell, DynCell::Int(42));

        // validation leaves the cell alone
        vp.parse(&opts(), "5", &mut cell, false).unwrap();
        assert_eq!(cell, DynCell::Int(42));
    }

    #[test]
    fn seq_appends() {
        let vp = make(FieldShape::Seq(CellKind::Str), "", "");
        let mut cell = DynCell::Seq(Vec::new());
        vp.parse(&opts(), "a", &mut cell, true).unwrap();
        vp.parse(&opts(), "b", &mut cell, true).unwrap();
        assert_eq!(printed(&vp, &cell), "[a, b]");
    }

    #[test]
    fn map_upserts_and_sums() {
        let vp = make(
            FieldShape::Map(CellKind::Str, MapValShape::Scalar(CellKind::I64)),
            "",
            "sum",
        );
        let mut cell = DynCell::Map(Vec::new());
        vp.parse(&opts(), "hits=2", &mut cell, true).unwrap();
        vp.parse(&opts(), "hits=3", &mut cell, true).unwrap();
        vp.parse(&opts(), "miss=1", &mut cell, true).unwrap();
        assert_eq!(printed(&vp, &cell), "[hits=5, miss=1]");

        assert_matches!(
            vp.parse(&opts(), "no-separator", &mut cell, true),
            Err(Error::InvalidValue { .. })
        );
    }

    #[test]
    fn map_seq_values() {
        let vp = make(
            FieldShape::Map(CellKind::Str, MapValShape::Seq(CellKind::Regex)),
            "",
            "regexp",
        );
        let mut cell = DynCell::Map(Vec::new());
        vp.parse(&opts(), "x=.*", &mut cell, true).unwrap();
        vp.parse(&opts(), "x=foo", &mut cell, true).unwrap();
        assert_eq!(printed(&vp, &cell), "[x=[.*, foo]]");
    }

    #[test]
    fn duration_cells_render_like_the_generic_vp() {
        let vp = make(FieldShape::Scalar(CellKind::I64), "", "dur");
        let mut cell = DynCell::Int(0);
        vp.parse(&opts(), "1m1s", &mut cell, true).unwrap();
        assert_eq!(cell, DynCell::Int(61_000_000_000));
        assert_eq!(printed(&vp, &cell), "1m1s");
        assert_eq!(vp.vp_type().to_string(), "dur");
    }

    #[test]
    fn implied_values() {
        assert_eq!(
            make(FieldShape::Scalar(CellKind::Bool), "", "").implied_value(),
            Some("true")
        );
        assert_eq!(
            make(FieldShape::Scalar(CellKind::I64), "", "sum").implied_value(),
            Some("1")
        );
        assert_eq!(
            make(FieldShape::Scalar(CellKind::I64), "", "dsum").implied_value(),
            Some("1s")
        );
        assert_eq!(
            make(FieldShape::Scalar(CellKind::Str), "", "").implied_value(),
            None
        );
    }
}
