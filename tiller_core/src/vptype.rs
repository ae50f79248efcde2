//! The packed type descriptor shared by every value peeker.

use std::fmt;

/// The scalar kind stored in the low bits of a [`VpType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ScalarType {
    /// Plain text.
    Str = 1,
    /// Boolean.
    Bool,
    /// Signed integer.
    Int,
    /// Unsigned integer.
    Uint,
    /// Floating point.
    Float,
    /// Byte size (`1G1M`).
    Size,
    /// Duration in nanoseconds (`1h30m`).
    Duration,
    /// Civil time.
    Time,
    /// Seconds since the unix epoch.
    UnixSec,
    /// Milliseconds since the unix epoch.
    UnixMilli,
    /// Microseconds since the unix epoch.
    UnixMicro,
    /// Nanoseconds since the unix epoch.
    UnixNano,
    /// Regular expression.
    Regexp,
    /// Case-insensitive regular expression.
    RegexpNocase,
}

impl ScalarType {
    fn from_bits(bits: u32) -> Option<ScalarType> {
        Some(match bits {
            1 => ScalarType::Str,
            2 => ScalarType::Bool,
            3 => ScalarType::Int,
            4 => ScalarType::Uint,
            5 => ScalarType::Float,
            6 => ScalarType::Size,
            7 => ScalarType::Duration,
            8 => ScalarType::Time,
            9 => ScalarType::UnixSec,
            10 => ScalarType::UnixMilli,
            11 => ScalarType::UnixMicro,
            12 => ScalarType::UnixNano,
            13 => ScalarType::Regexp,
            14 => ScalarType::RegexpNocase,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            ScalarType::Str => "str",
            ScalarType::Bool => "bool",
            ScalarType::Int => "int",
            ScalarType::Uint => "uint",
            ScalarType::Float => "float",
            ScalarType::Size => "size",
            ScalarType::Duration => "dur",
            ScalarType::Time
            | ScalarType::UnixSec
            | ScalarType::UnixMilli
            | ScalarType::UnixMicro
            | ScalarType::UnixNano => "time",
            ScalarType::Regexp | ScalarType::RegexpNocase => "regexp",
        }
    }

    fn sum_name(self) -> Option<&'static str> {
        Some(match self {
            ScalarType::Int => "isum",
            ScalarType::Uint => "usum",
            ScalarType::Float => "fsum",
            ScalarType::Size => "ssum",
            ScalarType::Duration => "dsum",
            _ => return None,
        })
    }

    fn summable(self) -> bool {
        self.sum_name().is_some()
    }
}

/// The outer shape of a [`VpType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// A single scalar.
    Scalar,
    /// A sequence of scalars.
    Slice,
    /// A scalar accumulating over repeated sets.
    Sum,
    /// Scalar keys mapping to scalar/slice/sum values.
    Map,
}

/// The shape of a map's value side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapValueVariant {
    /// Scalar values.
    Scalar,
    /// Slice values.
    Slice,
    /// Sum values.
    Sum,
}

const ELEM_SCALAR_MASK: u32 = 0x0000_0fff;
const VARIANT_MASK: u32 = 0x0000_f000;
const VARIANT_SLICE: u32 = 0x0000_1000;
const VARIANT_SUM: u32 = 0x0000_2000;
const VARIANT_MAP: u32 = 0x0000_3000;
const KEY_SCALAR_MASK: u32 = 0x0fff_0000;
const KEY_SCALAR_SHIFT: u32 = 16;
const MAP_VALUE_MASK: u32 = 0xf000_0000;
const MAP_VALUE_SLICE: u32 = 0x1000_0000;
const MAP_VALUE_SUM: u32 = 0x2000_0000;

/// A 32-bit packed descriptor of the value type a VP handles.
///
/// Layout: bits 0–11 hold the element scalar, bits 12–15 the outer variant,
/// bits 16–27 the map key scalar, bits 28–31 the map value variant. Use the
/// typed constructors and getters; the raw layout is not public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VpType(u32);

impl VpType {
    /// The descriptor for types this crate cannot represent.
    pub const UNKNOWN: VpType = VpType(0);

    /// A scalar type.
    pub const fn scalar(elem: ScalarType) -> VpType {
        VpType(elem as u32)
    }

    /// A slice of scalars.
    pub const fn slice(elem: ScalarType) -> VpType {
        VpType(elem as u32 | VARIANT_SLICE)
    }

    /// A summed scalar. Only the numeric scalars (int, uint, float, size,
    /// duration) can sum; everything else yields [`VpType::UNKNOWN`].
    pub fn sum(elem: ScalarType) -> VpType {
        if elem.summable() {
            VpType(elem as u32 | VARIANT_SUM)
        } else {
            VpType::UNKNOWN
        }
    }

    /// A map with scalar keys. The value descriptor must itself be a scalar,
    /// slice or sum; anything else yields [`VpType::UNKNOWN`].
    pub fn map(key: ScalarType, value: VpType) -> VpType {
        let value_bits = match value.variant() {
            Some(Variant::Scalar) => 0,
            Some(Variant::Slice) => MAP_VALUE_SLICE,
            Some(Variant::Sum) => MAP_VALUE_SUM,
            _ => return VpType::UNKNOWN,
        };

        VpType(VARIANT_MAP | (key as u32) << KEY_SCALAR_SHIFT | value_bits | value.0 & ELEM_SCALAR_MASK)
    }

    /// True when this descriptor carries no type information.
    pub fn is_unknown(self) -> bool {
        self.elem_scalar().is_none()
    }

    /// The element scalar (map value scalar for map types).
    pub fn elem_scalar(self) -> Option<ScalarType> {
        ScalarType::from_bits(self.0 & ELEM_SCALAR_MASK)
    }

    /// The outer variant, `None` for unknown descriptors.
    pub fn variant(self) -> Option<Variant> {
        if self.is_unknown() {
            return None;
        }

        Some(match self.0 & VARIANT_MASK {
            0 => Variant::Scalar,
            VARIANT_SLICE => Variant::Slice,
            VARIANT_SUM => Variant::Sum,
            VARIANT_MAP => Variant::Map,
            _ => return None,
        })
    }

    /// The map key scalar; only set for map types.
    pub fn key_scalar(self) -> Option<ScalarType> {
        if self.0 & VARIANT_MASK != VARIANT_MAP {
            return None;
        }

        ScalarType::from_bits((self.0 & KEY_SCALAR_MASK) >> KEY_SCALAR_SHIFT)
    }

    /// The map value variant; only set for map types.
    pub fn map_value_variant(self) -> Option<MapValueVariant> {
        if self.0 & VARIANT_MASK != VARIANT_MAP {
            return None;
        }

        Some(match self.0 & MAP_VALUE_MASK {
            0 => MapValueVariant::Scalar,
            MAP_VALUE_SLICE => MapValueVariant::Slice,
            MAP_VALUE_SUM => MapValueVariant::Sum,
            _ => return None,
        })
    }

    /// The text the presence of a flag name alone stands for, if the type
    /// has one (e.g. `true` for bool, `1` for numeric sums, `1s` for
    /// duration sums).
    pub fn implied_value(self) -> Option<&'static str> {
        match (self.variant()?, self.elem_scalar()?) {
            (Variant::Sum, ScalarType::Int)
            | (Variant::Sum, ScalarType::Uint)
            | (Variant::Sum, ScalarType::Float)
            | (Variant::Sum, ScalarType::Size) => Some("1"),
            (Variant::Sum, ScalarType::Duration) => Some("1s"),
            (Variant::Slice, ScalarType::Bool) => Some("true"),
            (Variant::Scalar, ScalarType::Bool) => Some("true"),
            _ => None,
        }
    }
}

impl fmt::Display for VpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(elem) = self.elem_scalar() else {
            return f.write_str("unknown");
        };

        match self.variant() {
            Some(Variant::Scalar) => f.write_str(elem.name()),
            Some(Variant::Slice) => write!(f, "[]{}", elem.name()),
            Some(Variant::Sum) => match elem.sum_name() {
                Some(name) => f.write_str(name),
                None => f.write_str("unknown"),
            },
            Some(Variant::Map) => {
                let Some(key) = self.key_scalar() else {
                    return f.write_str("unknown");
                };

                match self.map_value_variant() {
                    Some(MapValueVariant::Scalar) => {
                        write!(f, "map[{}]{}", key.name(), elem.name())
                    }
                    Some(MapValueVariant::Slice) => {
                        write!(f, "map[{}][]{}", key.name(), elem.name())
                    }
                    Some(MapValueVariant::Sum) => match elem.sum_name() {
                        Some(name) => write!(f, "map[{}]{}", key.name(), name),
                        None => f.write_str("unknown"),
                    },
                    None => f.write_str("unknown"),
                }
            }
            None => f.write_str("unknown"),
        }
    }
}
