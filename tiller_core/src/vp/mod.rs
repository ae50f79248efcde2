//! Value peekers: the polymorphic codecs every flag value goes through.
//!
//! A VP parses, validates and renders one storage type. Scalars cover the
//! textual grammars (numbers, sizes, durations, times, regexps); composites
//! wrap other VPs for slices, sums, maps and lazily-initialized options.

mod composite;
mod scalar;
mod storage;

pub use composite::{MapVp, OptionVp, SliceVp, SumVp};
pub use scalar::{
    BoolVp, DurationVp, FloatVp, IntVp, RegexpNocaseVp, RegexpVp, SizeVp, StrVp, TimeVp, UintVp,
    UnixMicroVp, UnixMilliVp, UnixNanoVp, UnixSecVp,
};
pub use storage::{FloatStorage, IntStorage, SumStorage};

use std::io;

use crate::error::Error;
use crate::parse::ParseOptions;
use crate::vptype::VpType;

/// A value peeker bound to the storage type `T`.
pub trait Vp<T> {
    /// The packed descriptor of the handled type; [`VpType::UNKNOWN`] for
    /// combinations the descriptor cannot represent.
    fn vp_type(&self) -> VpType;

    /// True when printing `value` would emit a non-empty representation.
    fn has_value(&self, value: &T) -> bool;

    /// Parses `arg` into `out`.
    ///
    /// With `set = false` this only validates: the storage cell is never
    /// mutated. Sum-typed VPs rely on this dual mode to let the parser
    /// disambiguate implicit from explicit values.
    fn parse_value(&self, opts: &ParseOptions, arg: &str, out: &mut T, set: bool)
        -> Result<(), Error>;

    /// Writes the text representation of `value`, returning the byte count.
    fn print_value(&self, out: &mut dyn io::Write, value: &T) -> io::Result<usize>;
}

pub(crate) fn write_str(out: &mut dyn io::Write, s: &str) -> io::Result<usize> {
    out.write_all(s.as_bytes())?;
    Ok(s.len())
}
