//! Sealed storage traits giving the numeric VPs width awareness.

mod sealed {
    pub trait Sealed {}
}

/// An integer storage cell: any primitive integer, signed or unsigned.
///
/// Sealed; implemented for the primitive integer types.
pub trait IntStorage: Copy + Default + PartialEq + sealed::Sealed {
    /// Whether the storage is signed.
    const SIGNED: bool;

    /// Builds the storage value from a sign and magnitude, `None` when the
    /// result does not fit the storage width.
    fn from_magnitude(neg: bool, magnitude: u64) -> Option<Self>;

    /// Splits the value into sign and magnitude.
    fn magnitude(self) -> (bool, u64);
}

/// A storage cell a sum VP can accumulate into.
///
/// Sealed; implemented for the primitive integers (wrapping) and floats.
pub trait SumStorage: Copy + Default + PartialEq + sealed::Sealed {
    /// Adds `other` onto `self`.
    fn accumulate(self, other: Self) -> Self;
}

/// A floating point storage cell.
///
/// Sealed; implemented for `f32` and `f64`.
pub trait FloatStorage: Copy + Default + PartialEq + sealed::Sealed {
    /// Widens to `f64`.
    fn to_f64(self) -> f64;

    /// Narrows from `f64`.
    fn from_f64(v: f64) -> Self;

    /// The shortest round-trip decimal rendering at the storage width.
    fn render(self) -> String;
}

macro_rules! impl_signed_storage {
    ($($t:ty),*) => {$(
        impl sealed::Sealed for $t {}

        impl IntStorage for $t {
            const SIGNED: bool = true;

            fn from_magnitude(neg: bool, magnitude: u64) -> Option<Self> {
                let wide = if neg {
                    -(magnitude as i128)
                } else {
                    magnitude as i128
                };
                <$t>::try_from(wide).ok()
            }

            fn magnitude(self) -> (bool, u64) {
                (self < 0, self.unsigned_abs() as u64)
            }
        }

        impl SumStorage for $t {
            fn accumulate(self, other: Self) -> Self {
                self.wrapping_add(other)
            }
        }
    )*};
}

macro_rules! impl_unsigned_storage {
    ($($t:ty),*) => {$(
        impl sealed::Sealed for $t {}

        impl IntStorage for $t {
            const SIGNED: bool = false;

            fn from_magnitude(neg: bool, magnitude: u64) -> Option<Self> {
                if neg && magnitude != 0 {
                    return None;
                }
                <$t>::try_from(magnitude).ok()
            }

            fn magnitude(self) -> (bool, u64) {
                (false, self as u64)
            }
        }

        impl SumStorage for $t {
            fn accumulate(self, other: Self) -> Self {
                self.wrapping_add(other)
            }
        }
    )*};
}

impl_signed_storage!(i8, i16, i32, i64, isize);
impl_unsigned_storage!(u8, u16, u32, u64, usize);

macro_rules! impl_float_storage {
    ($($t:ty),*) => {$(
        impl sealed::Sealed for $t {}

        impl FloatStorage for $t {
            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(v: f64) -> Self {
                v as $t
            }

            fn render(self) -> String {
                self.to_string()
            }
        }

        impl SumStorage for $t {
            fn accumulate(self, other: Self) -> Self {
                self + other
            }
        }
    )*};
}

impl_float_storage!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_bounds() {
        assert_eq!(i8::from_magnitude(false, 127), Some(127));
        assert_eq!(i8::from_magnitude(false, 128), None);
        assert_eq!(i8::from_magnitude(true, 128), Some(-128));
        assert_eq!(i8::from_magnitude(true, 129), None);
        assert_eq!(i64::from_magnitude(true, u64::MAX), None);
        assert_eq!(i64::from_magnitude(false, i64::MAX as u64), Some(i64::MAX));
    }

    #[test]
    fn unsigned_bounds() {
        assert_eq!(u8::from_magnitude(false, 255), Some(255));
        assert_eq!(u8::from_magnitude(false, 256), None);
        assert_eq!(u8::from_magnitude(true, 1), None);
        assert_eq!(u8::from_magnitude(true, 0), Some(0));
    }

    #[test]
    fn magnitudes() {
        assert_eq!((-5i32).magnitude(), (true, 5));
        assert_eq!(5u16.magnitude(), (false, 5));
        assert_eq!(i64::MIN.magnitude(), (true, 1 << 63));
    }

    #[test]
    fn accumulate_wraps() {
        assert_eq!(255u8.accumulate(1), 0);
        assert_eq!(1.5f64.accumulate(2.25), 3.75);
    }
}
