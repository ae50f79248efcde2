//! Scalar value peekers.

use std::io;
use std::marker::PhantomData;

use chrono::{DateTime, Local, SecondsFormat, TimeZone};
use regex::Regex;

use crate::error::Error;
use crate::parse::ParseOptions;
use crate::scan;
use crate::vp::storage::{FloatStorage, IntStorage};
use crate::vp::{write_str, Vp};
use crate::vptype::{ScalarType, VpType};

/// VP for plain strings. Every arg is accepted.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrVp;

impl Vp<String> for StrVp {
    fn vp_type(&self) -> VpType {
        VpType::scalar(ScalarType::Str)
    }

    fn has_value(&self, value: &String) -> bool {
        !value.is_empty()
    }

    fn parse_value(
        &self,
        _opts: &ParseOptions,
        arg: &str,
        out: &mut String,
        set: bool,
    ) -> Result<(), Error> {
        if set {
            out.clear();
            out.push_str(arg);
        }
        Ok(())
    }

    fn print_value(&self, out: &mut dyn io::Write, value: &String) -> io::Result<usize> {
        write_str(out, value)
    }
}

/// VP for booleans.
///
/// True: `true`, `yes`, `y`, `on`, `1`. False: `false`, `no`, `n`, `off`,
/// `0`. Anything else is invalid.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoolVp;

impl Vp<bool> for BoolVp {
    fn vp_type(&self) -> VpType {
        VpType::scalar(ScalarType::Bool)
    }

    fn has_value(&self, value: &bool) -> bool {
        *value
    }

    fn parse_value(
        &self,
        _opts: &ParseOptions,
        arg: &str,
        out: &mut bool,
        set: bool,
    ) -> Result<(), Error> {
        let parsed = match arg {
            "true" | "yes" | "y" | "on" | "1" => true,
            "false" | "no" | "n" | "off" | "0" => false,
            _ => return Err(Error::invalid_value("bool", arg)),
        };

        if set {
            *out = parsed;
        }
        Ok(())
    }

    fn print_value(&self, out: &mut dyn io::Write, value: &bool) -> io::Result<usize> {
        write_str(out, if *value { "true" } else { "false" })
    }
}

fn write_int(out: &mut dyn io::Write, neg: bool, magnitude: u64) -> io::Result<usize> {
    let mut n = 0;
    if neg {
        n += write_str(out, "-")?;
    }
    n += write_str(out, &magnitude.to_string())?;
    Ok(n)
}

/// VP for signed integers, parsed in base 0 (decimal, `0x` hex, octal,
/// binary) and range-checked against the storage width.
#[derive(Debug, Clone, Copy)]
pub struct IntVp<T>(PhantomData<T>);

impl<T> Default for IntVp<T> {
    fn default() -> Self {
        IntVp(PhantomData)
    }
}

impl<T: IntStorage> Vp<T> for IntVp<T> {
    fn vp_type(&self) -> VpType {
        VpType::scalar(ScalarType::Int)
    }

    fn has_value(&self, value: &T) -> bool {
        *value != T::default()
    }

    fn parse_value(
        &self,
        _opts: &ParseOptions,
        arg: &str,
        out: &mut T,
        set: bool,
    ) -> Result<(), Error> {
        let parsed = scan::parse_int(arg)
            .and_then(|(neg, magnitude)| T::from_magnitude(neg, magnitude))
            .ok_or_else(|| Error::invalid_value("int", arg))?;

        if set {
            *out = parsed;
        }
        Ok(())
    }

    fn print_value(&self, out: &mut dyn io::Write, value: &T) -> io::Result<usize> {
        let (neg, magnitude) = value.magnitude();
        write_int(out, neg, magnitude)
    }
}

/// VP for unsigned integers, parsed in base 0 and range-checked against the
/// storage width.
#[derive(Debug, Clone, Copy)]
pub struct UintVp<T>(PhantomData<T>);

impl<T> Default for UintVp<T> {
    fn default() -> Self {
        UintVp(PhantomData)
    }
}

impl<T: IntStorage> Vp<T> for UintVp<T> {
    fn vp_type(&self) -> VpType {
        VpType::scalar(ScalarType::Uint)
    }

    fn has_value(&self, value: &T) -> bool {
        *value != T::default()
    }

    fn parse_value(
        &self,
        _opts: &ParseOptions,
        arg: &str,
        out: &mut T,
        set: bool,
    ) -> Result<(), Error> {
        // a sign prefix is not permitted, not even on zero
        let parsed = scan::parse_int(arg)
            .filter(|(neg, _)| !neg)
            .and_then(|(neg, magnitude)| T::from_magnitude(neg, magnitude))
            .ok_or_else(|| Error::invalid_value("uint", arg))?;

        if set {
            *out = parsed;
        }
        Ok(())
    }

    fn print_value(&self, out: &mut dyn io::Write, value: &T) -> io::Result<usize> {
        let (neg, magnitude) = value.magnitude();
        write_int(out, neg, magnitude)
    }
}

/// VP for floating point values.
///
/// A value whose round-trip through the storage width loses more than 0.1
/// absolute precision is rejected (NaN and the infinities are exempt).
#[derive(Debug, Clone, Copy)]
pub struct FloatVp<T>(PhantomData<T>);

impl<T> Default for FloatVp<T> {
    fn default() -> Self {
        FloatVp(PhantomData)
    }
}

impl<T: FloatStorage> Vp<T> for FloatVp<T> {
    fn vp_type(&self) -> VpType {
        VpType::scalar(ScalarType::Float)
    }

    fn has_value(&self, value: &T) -> bool {
        *value != T::default()
    }

    fn parse_value(
        &self,
        _opts: &ParseOptions,
        arg: &str,
        out: &mut T,
        set: bool,
    ) -> Result<(), Error> {
        let wide: f64 = arg
            .parse()
            .map_err(|_| Error::invalid_value("float", arg))?;

        let narrowed = T::from_f64(wide);
        if wide.is_finite() && (narrowed.to_f64() - wide).abs() > 0.1 {
            return Err(Error::invalid_value("float", arg));
        }

        if set {
            *out = narrowed;
        }
        Ok(())
    }

    fn print_value(&self, out: &mut dyn io::Write, value: &T) -> io::Result<usize> {
        write_str(out, &value.render())
    }
}

/// VP for byte sizes with `B`/`KB`/`MB`/`GB`/`TB`/`PB`/`EB` suffixes, stored
/// as bytes in any integer storage; overflow is an error.
#[derive(Debug, Clone, Copy)]
pub struct SizeVp<T>(PhantomData<T>);

impl<T> Default for SizeVp<T> {
    fn default() -> Self {
        SizeVp(PhantomData)
    }
}

impl<T: IntStorage> Vp<T> for SizeVp<T> {
    fn vp_type(&self) -> VpType {
        VpType::scalar(ScalarType::Size)
    }

    fn has_value(&self, value: &T) -> bool {
        *value != T::default()
    }

    fn parse_value(
        &self,
        _opts: &ParseOptions,
        arg: &str,
        out: &mut T,
        set: bool,
    ) -> Result<(), Error> {
        let (neg, magnitude) = scan::parse_size(arg)?;
        let parsed =
            T::from_magnitude(neg, magnitude).ok_or_else(|| Error::invalid_value("size", arg))?;

        if set {
            *out = parsed;
        }
        Ok(())
    }

    fn print_value(&self, out: &mut dyn io::Write, value: &T) -> io::Result<usize> {
        let (neg, magnitude) = value.magnitude();
        let mut n = 0;
        if neg {
            n += write_str(out, "-")?;
        }
        n += scan::write_size(out, magnitude)?;
        Ok(n)
    }
}

/// VP for durations, stored as nanoseconds in any integer storage.
///
/// Month and year segments resolve against the parse start time; overflow
/// is an error.
#[derive(Debug, Clone, Copy)]
pub struct DurationVp<T>(PhantomData<T>);

impl<T> Default for DurationVp<T> {
    fn default() -> Self {
        DurationVp(PhantomData)
    }
}

impl<T: IntStorage> Vp<T> for DurationVp<T> {
    fn vp_type(&self) -> VpType {
        VpType::scalar(ScalarType::Duration)
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
        let (neg, magnitude) = scan::parse_duration(arg, opts.start_time())?;
        let parsed = T::from_magnitude(neg, magnitude)
            .ok_or_else(|| Error::invalid_value("duration", arg))?;

        if set {
            *out = parsed;
        }
        Ok(())
    }

    fn print_value(&self, out: &mut dyn io::Write, value: &T) -> io::Result<usize> {
        let (neg, magnitude) = value.magnitude();
        let mut n = 0;
        if neg {
            n += write_str(out, "-")?;
        }
        n += scan::write_duration(out, magnitude)?;
        Ok(n)
    }
}

fn write_rfc3339(out: &mut dyn io::Write, t: DateTime<Local>) -> io::Result<usize> {
    write_str(out, &t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// VP for civil time values; missing date or time parts are filled from the
/// parse start time.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeVp;

impl Vp<Option<DateTime<Local>>> for TimeVp {
    fn vp_type(&self) -> VpType {
        VpType::scalar(ScalarType::Time)
    }

    fn has_value(&self, value: &Option<DateTime<Local>>) -> bool {
        value.is_some()
    }

    fn parse_value(
        &self,
        opts: &ParseOptions,
        arg: &str,
        out: &mut Option<DateTime<Local>>,
        set: bool,
    ) -> Result<(), Error> {
        let t = scan::parse_time(arg, opts.start_time())?;
        if set {
            *out = Some(t);
        }
        Ok(())
    }

    fn print_value(
        &self,
        out: &mut dyn io::Write,
        value: &Option<DateTime<Local>>,
    ) -> io::Result<usize> {
        match value {
            Some(t) => write_rfc3339(out, *t),
            None => Ok(0),
        }
    }
}

macro_rules! unix_vp {
    ($(#[$doc:meta])* $name:ident, $scalar:ident, $to:ident, $from:ident) => {
        $(#[$doc])*
        #[derive(Debug, Default, Clone, Copy)]
        pub struct $name;

        impl Vp<i64> for $name {
            fn vp_type(&self) -> VpType {
                VpType::scalar(ScalarType::$scalar)
            }

            fn has_value(&self, value: &i64) -> bool {
                *value != 0
            }

            fn parse_value(
                &self,
                opts: &ParseOptions,
                arg: &str,
                out: &mut i64,
                set: bool,
            ) -> Result<(), Error> {
                let t = scan::parse_time(arg, opts.start_time())?;
                if set {
                    *out = t.$to();
                }
                Ok(())
            }

            fn print_value(&self, out: &mut dyn io::Write, value: &i64) -> io::Result<usize> {
                match Local.$from(*value) {
                    chrono::LocalResult::Single(t) => write_rfc3339(out, t),
                    _ => Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "timestamp out of range",
                    )),
                }
            }
        }
    };
}

unix_vp!(
    /// VP for time values stored as seconds since the unix epoch.
    UnixSecVp,
    UnixSec,
    timestamp,
    timestamp_opt_secs
);
unix_vp!(
    /// VP for time values stored as milliseconds since the unix epoch.
    UnixMilliVp,
    UnixMilli,
    timestamp_millis,
    timestamp_millis_opt
);
unix_vp!(
    /// VP for time values stored as microseconds since the unix epoch.
    UnixMicroVp,
    UnixMicro,
    timestamp_micros,
    timestamp_micros_opt2
);
unix_vp!(
    /// VP for time values stored as nanoseconds since the unix epoch.
    UnixNanoVp,
    UnixNano,
    timestamp_nanos_or_zero,
    timestamp_nanos_opt2
);

// Uniform LocalResult-shaped adapters for the unix_vp macro.
trait TimestampExt {
    fn timestamp_opt_secs(&self, v: i64) -> chrono::LocalResult<DateTime<Local>>;
    fn timestamp_micros_opt2(&self, v: i64) -> chrono::LocalResult<DateTime<Local>>;
    fn timestamp_nanos_opt2(&self, v: i64) -> chrono::LocalResult<DateTime<Local>>;
}

impl TimestampExt for Local {
    fn timestamp_opt_secs(&self, v: i64) -> chrono::LocalResult<DateTime<Local>> {
        self.timestamp_opt(v, 0)
    }

    fn timestamp_micros_opt2(&self, v: i64) -> chrono::LocalResult<DateTime<Local>> {
        self.timestamp_opt(v.div_euclid(1_000_000), (v.rem_euclid(1_000_000) * 1_000) as u32)
    }

    fn timestamp_nanos_opt2(&self, v: i64) -> chrono::LocalResult<DateTime<Local>> {
        self.timestamp_opt(
            v.div_euclid(1_000_000_000),
            v.rem_euclid(1_000_000_000) as u32,
        )
    }
}

trait ToEpochExt {
    fn timestamp_nanos_or_zero(&self) -> i64;
}

impl ToEpochExt for DateTime<Local> {
    fn timestamp_nanos_or_zero(&self) -> i64 {
        self.timestamp_nanos_opt().unwrap_or(0)
    }
}

/// VP for regular expressions, compiled on parse.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexpVp;

impl Vp<Option<Regex>> for RegexpVp {
    fn vp_type(&self) -> VpType {
        VpType::scalar(ScalarType::Regexp)
    }

    fn has_value(&self, value: &Option<Regex>) -> bool {
        value.as_ref().is_some_and(|re| !re.as_str().is_empty())
    }

    fn parse_value(
        &self,
        _opts: &ParseOptions,
        arg: &str,
        out: &mut Option<Regex>,
        set: bool,
    ) -> Result<(), Error> {
        let re = Regex::new(arg).map_err(|_| Error::invalid_value("regexp", arg))?;
        if set {
            *out = Some(re);
        }
        Ok(())
    }

    fn print_value(&self, out: &mut dyn io::Write, value: &Option<Regex>) -> io::Result<usize> {
        match value {
            Some(re) => write_str(out, re.as_str()),
            None => Ok(0),
        }
    }
}

/// [`RegexpVp`] compiling the pattern case-insensitively by wrapping it in
/// `(?i:…)`; printing strips the wrapper again.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexpNocaseVp;

impl Vp<Option<Regex>> for RegexpNocaseVp {
    fn vp_type(&self) -> VpType {
        VpType::scalar(ScalarType::RegexpNocase)
    }

    fn has_value(&self, value: &Option<Regex>) -> bool {
        value.as_ref().is_some_and(|re| !re.as_str().is_empty())
    }

    fn parse_value(
        &self,
        _opts: &ParseOptions,
        arg: &str,
        out: &mut Option<Regex>,
        set: bool,
    ) -> Result<(), Error> {
        let re =
            Regex::new(&format!("(?i:{arg})")).map_err(|_| Error::invalid_value("regexp", arg))?;
        if set {
            *out = Some(re);
        }
        Ok(())
    }

    fn print_value(&self, out: &mut dyn io::Write, value: &Option<Regex>) -> io::Result<usize> {
        match value {
            Some(re) => {
                let pattern = re.as_str();
                let stripped = pattern
                    .strip_prefix("(?i:")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .unwrap_or(pattern);
                write_str(out, stripped)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn opts() -> ParseOptions<'static> {
        ParseOptions {
            start_time: Some(Local.with_ymd_and_hms(2022, 11, 4, 18, 0, 0).unwrap()),
            ..ParseOptions::default()
        }
    }

    fn print<T>(vp: &impl Vp<T>, value: &T) -> String {
        let mut buf = Vec::new();
        vp.print_value(&mut buf, value).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[rstest]
    #[case("true", true)]
    #[case("yes", true)]
    #[case("y", true)]
    #[case("on", true)]
    #[case("1", true)]
    #[case("false", false)]
    #[case("no", false)]
    #[case("n", false)]
    #[case("off", false)]
    #[case("0", false)]
    fn bool_words(#[case] arg: &str, #[case] expected: bool) {
        let mut value = !expected;
        BoolVp.parse_value(&opts(), arg, &mut value, true).unwrap();
        assert_eq!(value, expected);
    }

    #[test]
    fn bool_rejects() {
        let mut value = false;
        assert_matches!(
            BoolVp.parse_value(&opts(), "maybe", &mut value, true),
            Err(Error::InvalidValue { .. })
        );
    }

    #[test]
    fn validate_does_not_mutate() {
        let mut value = 7i64;
        IntVp::default()
            .parse_value(&opts(), "42", &mut value, false)
            .unwrap();
        assert_eq!(value, 7);
    }

    #[rstest]
    #[case::decimal("-123", -123)]
    #[case::hex("0x10", 16)]
    #[case::octal("010", 8)]
    fn int_bases(#[case] arg: &str, #[case] expected: i64) {
        let mut value = 0i64;
        IntVp::default()
            .parse_value(&opts(), arg, &mut value, true)
            .unwrap();
        assert_eq!(value, expected);
    }

    #[test]
    fn int_width_range() {
        let mut value = 0i8;
        let vp = IntVp::<i8>::default();
        vp.parse_value(&opts(), "-128", &mut value, true).unwrap();
        assert_eq!(value, -128);
        assert!(vp.parse_value(&opts(), "128", &mut value, true).is_err());
    }

    #[test]
    fn uint_rejects_negative() {
        let mut value = 0u32;
        let vp = UintVp::<u32>::default();
        assert!(vp.parse_value(&opts(), "-1", &mut value, true).is_err());
        // the sign prefix is rejected even on zero
        assert!(vp.parse_value(&opts(), "-0", &mut value, true).is_err());
        assert!(vp.parse_value(&opts(), "-0x0", &mut value, true).is_err());
        vp.parse_value(&opts(), "4294967295", &mut value, true)
            .unwrap();
        assert_eq!(value, u32::MAX);
    }

    #[test]
    fn float_precision() {
        let mut value = 0f32;
        let vp = FloatVp::<f32>::default();
        vp.parse_value(&opts(), "1.5", &mut value, true).unwrap();
        assert_eq!(value, 1.5);

        // representable in f64 only; drops far more than 0.1 in f32
        assert!(vp
            .parse_value(&opts(), "1e300", &mut value, true)
            .is_err());

        // infinities are exempt from the precision check
        vp.parse_value(&opts(), "inf", &mut value, true).unwrap();
        assert!(value.is_infinite());
    }

    #[test]
    fn int_print() {
        assert_eq!(print(&IntVp::<i64>::default(), &-123), "-123");
        assert_eq!(print(&UintVp::<u64>::default(), &123), "123");
    }

    #[test]
    fn size_round_trip() {
        let vp = SizeVp::<i64>::default();
        let mut value = 0i64;
        vp.parse_value(&opts(), "1M1KB", &mut value, true).unwrap();
        assert_eq!(value, 1024 * 1024 + 1024);
        assert_eq!(print(&vp, &value), "1MB1KB");
    }

    #[test]
    fn size_range() {
        let vp = SizeVp::<u8>::default();
        let mut value = 0u8;
        assert!(vp.parse_value(&opts(), "1k", &mut value, true).is_err());
        assert!(vp.parse_value(&opts(), "-1", &mut value, true).is_err());
    }

    #[test]
    fn duration_round_trip() {
        let vp = DurationVp::<i64>::default();
        let mut value = 0i64;
        vp.parse_value(&opts(), "1m1s", &mut value, true).unwrap();
        assert_eq!(value, 61 * 1_000_000_000);
        assert_eq!(print(&vp, &value), "1m1s");

        vp.parse_value(&opts(), "-2s", &mut value, true).unwrap();
        assert_eq!(value, -2_000_000_000);
        assert_eq!(print(&vp, &value), "-2s");
    }

    #[test]
    fn time_fills_from_start_time() {
        let vp = TimeVp;
        let mut value = None;
        vp.parse_value(&opts(), "17:30", &mut value, true).unwrap();
        let t = value.unwrap();
        assert_eq!(
            t,
            Local.with_ymd_and_hms(2022, 11, 4, 17, 30, 0).unwrap()
        );
    }

    #[test]
    fn unix_sec_converts() {
        let vp = UnixSecVp;
        let mut value = 0i64;
        vp.parse_value(&opts(), "2026-12-26T00:00:00", &mut value, true)
            .unwrap();
        assert_eq!(
            value,
            Local
                .with_ymd_and_hms(2026, 12, 26, 0, 0, 0)
                .unwrap()
                .timestamp()
        );
    }

    #[test]
    fn unix_milli_converts() {
        let vp = UnixMilliVp;
        let mut value = 0i64;
        vp.parse_value(&opts(), "17:00", &mut value, true).unwrap();
        assert_eq!(
            value,
            Local
                .with_ymd_and_hms(2022, 11, 4, 17, 0, 0)
                .unwrap()
                .timestamp_millis()
        );
    }

    #[test]
    fn regexp_compile_and_print() {
        let vp = RegexpVp;
        let mut value = None;
        vp.parse_value(&opts(), "a+b", &mut value, true).unwrap();
        assert!(vp.has_value(&value));
        assert_eq!(print(&vp, &value), "a+b");

        assert!(vp.parse_value(&opts(), "(", &mut value, true).is_err());
    }

    #[test]
    fn regexp_nocase_wraps() {
        let vp = RegexpNocaseVp;
        let mut value = None;
        vp.parse_value(&opts(), "a+b", &mut value, true).unwrap();
        assert_eq!(value.as_ref().unwrap().as_str(), "(?i:a+b)");
        assert_eq!(print(&vp, &value), "a+b");
        assert!(value.unwrap().is_match("AAB"));
    }

    #[test]
    fn str_replaces() {
        let mut value = "old".to_string();
        StrVp
            .parse_value(&opts(), "new", &mut value, true)
            .unwrap();
        assert_eq!(value, "new");
        assert!(StrVp.has_value(&value));
        assert!(!StrVp.has_value(&String::new()));
    }
}
