//! Text grammars shared by the value peekers: base-0 numbers, byte sizes,
//! durations, civil time, and the similarity check used by completion.

use std::io;

use chrono::{DateTime, Local, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use crate::error::Error;

pub(crate) const NANOS_PER_SEC: u64 = 1_000_000_000;
const NANOS_PER_MINUTE: u64 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u64 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: u64 = 24 * NANOS_PER_HOUR;
const NANOS_PER_WEEK: u64 = 7 * NANOS_PER_DAY;

/// A numeric literal inside a size or duration segment.
enum NumLit {
    Int(u64),
    Float(f64),
}

fn parse_num(segment: &str, whole: &str) -> Result<NumLit, Error> {
    if segment.is_empty() {
        return Err(Error::invalid_part("numeric", whole));
    }

    if segment.contains('.') {
        match segment.parse::<f64>() {
            Ok(f) if f.is_finite() && f >= 0.0 => Ok(NumLit::Float(f)),
            _ => Err(Error::invalid_part("numeric", whole)),
        }
    } else {
        segment
            .parse::<u64>()
            .map(NumLit::Int)
            .map_err(|_| Error::invalid_part("numeric", whole))
    }
}

fn parse_int_segment(segment: &str, whole: &str, unit: &str) -> Result<u64, Error> {
    match parse_num(segment, whole)? {
        NumLit::Int(v) => Ok(v),
        NumLit::Float(_) => Err(Error::invalid_part(unit, whole)),
    }
}

/// Parses a base-0 integer literal: decimal, `0x` hex, `0o` octal, `0b`
/// binary, or legacy leading-zero octal. Returns the sign and magnitude.
pub(crate) fn parse_int(s: &str) -> Option<(bool, u64)> {
    let (neg, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    if rest.is_empty() {
        return None;
    }

    let lower = rest.as_bytes();
    let (radix, body) = if lower.len() > 2 && lower[0] == b'0' {
        match lower[1] {
            b'x' | b'X' => (16, &rest[2..]),
            b'o' | b'O' => (8, &rest[2..]),
            b'b' | b'B' => (2, &rest[2..]),
            _ => (8, &rest[1..]),
        }
    } else if lower.len() > 1 && lower[0] == b'0' {
        (8, &rest[1..])
    } else {
        (10, rest)
    };

    u64::from_str_radix(body, radix).ok().map(|v| (neg, v))
}

fn size_unit(c: u8) -> u64 {
    const KB: u64 = 1024;

    match c {
        b'B' | b'b' => 1,
        b'K' | b'k' => KB,
        b'M' | b'm' => KB * KB,
        b'G' | b'g' => KB * KB * KB,
        b'T' | b't' => KB * KB * KB * KB,
        b'P' | b'p' => KB * KB * KB * KB * KB,
        b'E' | b'e' => KB * KB * KB * KB * KB * KB,
        _ => 0,
    }
}

fn add_scaled(total: u64, lit: NumLit, unit: u64, whole: &str, kind: &str) -> Result<u64, Error> {
    let amount = match lit {
        NumLit::Int(v) => v.checked_mul(unit),
        NumLit::Float(f) => {
            let scaled = f * unit as f64;
            if scaled.is_finite() && scaled < u64::MAX as f64 {
                Some(scaled as u64)
            } else {
                None
            }
        }
    };

    amount
        .and_then(|a| total.checked_add(a))
        .ok_or_else(|| Error::invalid_value(kind, whole))
}

/// Parses a size string like `1G1M`, `2.25KB` or `-5kb` into a magnitude in
/// bytes plus a sign. Suffixes are case-insensitive, the trailing `B` is
/// optional, segments concatenate, and a bare number means bytes.
pub(crate) fn parse_size(s: &str) -> Result<(bool, u64), Error> {
    let b = s.as_bytes();
    let n = b.len();
    let (neg, mut start) = match b.first() {
        Some(&b'-') => (true, 1),
        _ => (false, 0),
    };

    let mut total: u64 = 0;
    let mut i = start;
    while i < n {
        match b[i] {
            b'0'..=b'9' | b'.' => {
                if i + 1 == n {
                    // no unit at the end, assume bytes
                    let lit = parse_num(&s[start..], s)?;
                    total = add_scaled(total, lit, 1, s, "size")?;
                    start = n;
                }
                i += 1;
            }
            c @ (b'B' | b'b' | b'K' | b'k' | b'M' | b'm' | b'G' | b'g' | b'T' | b't' | b'P'
            | b'p' | b'E' | b'e') => {
                let lit = parse_num(&s[start..i], s)?;
                total = add_scaled(total, lit, size_unit(c), s, "size")?;

                i += 1;
                if matches!(b.get(i), Some(b'B' | b'b')) && c != b'B' && c != b'b' {
                    i += 1;
                }
                start = i;
            }
            _ => return Err(Error::invalid_part("numeric", s)),
        }
    }

    if start < n {
        // trailing bare dot or similar
        return Err(Error::invalid_part("numeric", s));
    }

    Ok((neg, total))
}

fn add_months(
    cur: DateTime<Local>,
    total: u64,
    months: u64,
    whole: &str,
) -> Result<(DateTime<Local>, u64), Error> {
    let months = u32::try_from(months).map_err(|_| Error::invalid_value("duration", whole))?;
    let next = cur
        .checked_add_months(Months::new(months))
        .ok_or_else(|| Error::invalid_value("duration", whole))?;
    let delta = next
        .signed_duration_since(cur)
        .num_nanoseconds()
        .ok_or_else(|| Error::invalid_value("duration", whole))?;

    let total = total
        .checked_add(delta as u64)
        .ok_or_else(|| Error::invalid_value("duration", whole))?;

    Ok((next, total))
}

/// Parses a duration string like `1h30m`, `2.5m`, `1yr4mt1w` or `-10s` into
/// a magnitude in nanoseconds plus a sign.
///
/// A bare trailing number means seconds. Months and years are
/// non-deterministic and resolve against `base`; they must be integers.
pub(crate) fn parse_duration(s: &str, base: DateTime<Local>) -> Result<(bool, u64), Error> {
    let b = s.as_bytes();
    let n = b.len();
    let (neg, mut start) = match b.first() {
        Some(&b'-') => (true, 1),
        _ => (false, 0),
    };

    let mut total: u64 = 0;
    let mut cur = base;
    let mut i = start;
    while i < n {
        match b[i] {
            b'0'..=b'9' | b'.' => {
                if i + 1 == n {
                    // no unit at the end, assume seconds
                    let lit = parse_num(&s[start..], s)?;
                    total = add_scaled(total, lit, NANOS_PER_SEC, s, "duration")?;
                    start = n;
                }
                i += 1;
            }
            b'y' => {
                let years = parse_int_segment(&s[start..i], s, "year (integer-only)")?;
                let months = years
                    .checked_mul(12)
                    .ok_or_else(|| Error::invalid_value("duration", s))?;
                (cur, total) = add_months(cur, total, months, s)?;

                i += 1;
                if b.get(i) == Some(&b'r') {
                    i += 1;
                }
                start = i;
            }
            b'M' => {
                let months = parse_int_segment(&s[start..i], s, "month (integer-only)")?;
                (cur, total) = add_months(cur, total, months, s)?;
                i += 1;
                start = i;
            }
            b'm' => match b.get(i + 1) {
                Some(b's') => {
                    let lit = parse_num(&s[start..i], s)?;
                    total = add_scaled(total, lit, NANOS_PER_SEC / 1_000, s, "duration")?;
                    i += 2;
                    start = i;
                }
                Some(b't') => {
                    let months = parse_int_segment(&s[start..i], s, "month (integer-only)")?;
                    (cur, total) = add_months(cur, total, months, s)?;
                    i += 2;
                    start = i;
                }
                _ => {
                    let lit = parse_num(&s[start..i], s)?;
                    total = add_scaled(total, lit, NANOS_PER_MINUTE, s, "duration")?;
                    i += 1;
                    start = i;
                }
            },
            b's' => {
                let lit = parse_num(&s[start..i], s)?;
                total = add_scaled(total, lit, NANOS_PER_SEC, s, "duration")?;
                i += 1;
                start = i;
            }
            b'n' => {
                if b.get(i + 1) != Some(&b's') {
                    return Err(Error::invalid_part("unit (ns)", s));
                }
                let lit = parse_num(&s[start..i], s)?;
                total = add_scaled(total, lit, 1, s, "duration")?;
                i += 2;
                start = i;
            }
            b'u' => {
                if b.get(i + 1) != Some(&b's') {
                    return Err(Error::invalid_part("unit (us)", s));
                }
                let lit = parse_num(&s[start..i], s)?;
                total = add_scaled(total, lit, 1_000, s, "duration")?;
                i += 2;
                start = i;
            }
            b'h' => {
                let lit = parse_num(&s[start..i], s)?;
                total = add_scaled(total, lit, NANOS_PER_HOUR, s, "duration")?;
                i += 1;
                if b.get(i) == Some(&b'r') {
                    i += 1;
                }
                start = i;
            }
            b'd' => {
                let lit = parse_num(&s[start..i], s)?;
                total = add_scaled(total, lit, NANOS_PER_DAY, s, "duration")?;
                i += 1;
                start = i;
            }
            b'w' => {
                let lit = parse_num(&s[start..i], s)?;
                total = add_scaled(total, lit, NANOS_PER_WEEK, s, "duration")?;
                i += 1;
                start = i;
            }
            _ => return Err(Error::invalid_part("numeric", s)),
        }
    }

    if start < n {
        return Err(Error::invalid_part("numeric", s));
    }

    Ok((neg, total))
}

fn local_datetime(ndt: NaiveDateTime, s: &str) -> Result<DateTime<Local>, Error> {
    Local
        .from_local_datetime(&ndt)
        .earliest()
        .ok_or_else(|| Error::invalid_value("time", s))
}

fn at_clock(base: DateTime<Local>, t: NaiveTime, s: &str) -> Result<DateTime<Local>, Error> {
    local_datetime(base.date_naive().and_time(t), s)
}

/// Parses a time string, trying each accepted form in order:
///
/// - `HH:MM`
/// - `YYYY-MM-DD`
/// - `YYYY-MM-DDTHH:MM:SS`
/// - RFC 3339 with offset
/// - `HH:MM:SS`
/// - `HH`
///
/// Missing date or time parts are filled from `base`.
pub(crate) fn parse_time(s: &str, base: DateTime<Local>) -> Result<DateTime<Local>, Error> {
    if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M") {
        return at_clock(base, t, s);
    }

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return local_datetime(d.and_time(NaiveTime::MIN), s);
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return local_datetime(dt, s);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Local));
    }

    if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M:%S") {
        return at_clock(base, t, s);
    }

    // bare hour
    if !s.is_empty() && s.len() <= 2 && s.bytes().all(|c| c.is_ascii_digit()) {
        if let Some(t) = s
            .parse::<u32>()
            .ok()
            .filter(|h| *h < 24)
            .and_then(|h| NaiveTime::from_hms_opt(h, 0, 0))
        {
            return at_clock(base, t, s);
        }
    }

    Err(Error::invalid_value("time", s))
}

/// Writes a size magnitude in the `1MB1KB` segment form (`5B` for plain
/// bytes). Zero writes nothing.
pub(crate) fn write_size(out: &mut dyn io::Write, magnitude: u64) -> io::Result<usize> {
    let mut chunks = [0u64; 7];
    let mut rest = magnitude;
    for chunk in chunks.iter_mut() {
        *chunk = rest % 1024;
        rest /= 1024;
    }

    const UNITS: [&str; 7] = ["", "K", "M", "G", "T", "P", "E"];
    let mut text = String::new();
    for i in (0..chunks.len()).rev() {
        if chunks[i] == 0 {
            continue;
        }

        text.push_str(&chunks[i].to_string());
        text.push_str(UNITS[i]);
        text.push('B');
    }

    out.write_all(text.as_bytes())?;
    Ok(text.len())
}

fn push_fraction(text: &mut String, whole: u64, rem: u64, scale: u64, unit: &str) {
    text.push_str(&whole.to_string());
    if rem != 0 {
        let digits = scale.ilog10() as usize;
        let mut frac = format!("{rem:0width$}", width = digits);
        while frac.ends_with('0') {
            frac.pop();
        }
        text.push('.');
        text.push_str(&frac);
    }
    text.push_str(unit);
}

/// Writes a duration magnitude in the compound unit form (`1m1s`, `1.5ms`,
/// `2h0m10s`). Zero writes `0s`.
pub(crate) fn write_duration(out: &mut dyn io::Write, nanos: u64) -> io::Result<usize> {
    let mut text = String::new();

    if nanos == 0 {
        text.push_str("0s");
    } else if nanos < 1_000 {
        text.push_str(&nanos.to_string());
        text.push_str("ns");
    } else if nanos < 1_000_000 {
        push_fraction(&mut text, nanos / 1_000, nanos % 1_000, 1_000, "us");
    } else if nanos < NANOS_PER_SEC {
        push_fraction(
            &mut text,
            nanos / 1_000_000,
            nanos % 1_000_000,
            1_000_000,
            "ms",
        );
    } else {
        let hours = nanos / NANOS_PER_HOUR;
        let mut rest = nanos % NANOS_PER_HOUR;
        if hours > 0 {
            text.push_str(&hours.to_string());
            text.push('h');
        }

        let minutes = rest / NANOS_PER_MINUTE;
        rest %= NANOS_PER_MINUTE;
        if minutes > 0 || hours > 0 {
            text.push_str(&minutes.to_string());
            text.push('m');
        }

        push_fraction(
            &mut text,
            rest / NANOS_PER_SEC,
            rest % NANOS_PER_SEC,
            NANOS_PER_SEC,
            "s",
        );
    }

    out.write_all(text.as_bytes())?;
    Ok(text.len())
}

const SIMILARITY_CAP: usize = 64;

/// True when the Levenshtein distance between `known` and `to_compare` is
/// less than `min(3, known.len())`. Comparison is bounded: both sides at or
/// beyond 64 bytes never match.
pub(crate) fn is_similar(known: &str, to_compare: &str, nocase: bool) -> bool {
    if known.is_empty() {
        return to_compare.is_empty();
    }
    if to_compare.is_empty() {
        return known.len() < 3;
    }
    if known.len() >= SIMILARITY_CAP && to_compare.len() >= SIMILARITY_CAP {
        return false;
    }

    levenshtein(known, to_compare, nocase) < known.len().min(3)
}

fn chars_eq(a: char, b: char, nocase: bool) -> bool {
    a == b || (nocase && a.to_lowercase().eq(b.to_lowercase()))
}

fn levenshtein(a: &str, b: &str, nocase: bool) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=a.len()).collect();
    let mut cur: Vec<usize> = vec![0; a.len() + 1];

    for (row, bc) in b.iter().enumerate() {
        cur[0] = row + 1;
        for (col, ac) in a.iter().enumerate() {
            if chars_eq(*ac, *bc, nocase) {
                cur[col + 1] = prev[col];
            } else {
                cur[col + 1] = prev[col].min(cur[col]).min(prev[col + 1]) + 1;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    prev[a.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const NS: u64 = 1;
    const US: u64 = 1_000;
    const MS: u64 = 1_000_000;
    const SECOND: u64 = NANOS_PER_SEC;
    const MINUTE: u64 = NANOS_PER_MINUTE;
    const HOUR: u64 = NANOS_PER_HOUR;
    const DAY: u64 = NANOS_PER_DAY;
    const WEEK: u64 = NANOS_PER_WEEK;

    fn base() -> DateTime<Local> {
        Local.with_ymd_and_hms(2022, 11, 4, 18, 0, 0).unwrap()
    }

    #[rstest]
    #[case("", 0)]
    #[case("1", SECOND)]
    #[case("10s", 10 * SECOND)]
    #[case("2.5m", 150 * SECOND)]
    #[case("1.1h", 66 * MINUTE)]
    #[case("1mt", 30 * DAY)]
    #[case("2M", (30 + 31) * DAY)]
    #[case("3mt", (30 + 31 + 31) * DAY)]
    #[case("1y", 365 * DAY)]
    #[case("3yr", (365 + 365 + 366) * DAY)]
    #[case("2d", 2 * DAY)]
    #[case("3w", 3 * WEEK)]
    #[case(
        "1yr4mt1w1d1hr1m1s1ms1us1ns",
        365 * DAY + (30 + 31 + 31 + 29) * DAY + WEEK + DAY + HOUR + MINUTE + SECOND + MS + US + NS
    )]
    fn duration_good(#[case] input: &str, #[case] expected: u64) {
        let (neg, got) = parse_duration(input, base()).unwrap();
        assert!(!neg);
        assert_eq!(got, expected);
    }

    #[test]
    fn duration_negative() {
        let (neg, got) = parse_duration("-1m30s", base()).unwrap();
        assert!(neg);
        assert_eq!(got, 90 * SECOND);
    }

    #[rstest]
    #[case("xxx")]
    #[case("1nx")]
    #[case("1ux")]
    #[case("2hh")]
    #[case("1.1y")]
    #[case("1.1M")]
    #[case("1.1.1")]
    fn duration_bad(#[case] input: &str) {
        assert!(parse_duration(input, base()).is_err());
    }

    const B: u64 = 1;
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    const TB: u64 = 1024 * GB;
    const PB: u64 = 1024 * TB;
    const EB: u64 = 1024 * PB;

    #[rstest]
    #[case("", 0)]
    #[case("10", 10 * B)]
    #[case("100B", 100 * B)]
    #[case("100b", 100 * B)]
    #[case("2kb", 2 * KB)]
    #[case("2.25KB", 2 * KB + 256 * B)]
    #[case("1Mb", MB)]
    #[case("1.5m", MB + 512 * KB)]
    #[case("1G", GB)]
    #[case("1.5gB", GB + 512 * MB)]
    #[case("10T", 10 * TB)]
    #[case("1.5t", TB + 512 * GB)]
    #[case("1.5p", PB + 512 * TB)]
    #[case("1p1T1gB1m1kb1b", PB + TB + GB + MB + KB + B)]
    #[case("1eb", EB)]
    fn size_good(#[case] input: &str, #[case] expected: u64) {
        let (neg, got) = parse_size(input).unwrap();
        assert!(!neg);
        assert_eq!(got, expected);
    }

    #[test]
    fn size_negative() {
        let (neg, got) = parse_size("-2kb").unwrap();
        assert!(neg);
        assert_eq!(got, 2 * KB);
    }

    #[rstest]
    #[case("xxx")]
    #[case("pp")]
    #[case("p2p")]
    #[case("1.1.1")]
    fn size_bad(#[case] input: &str) {
        assert!(parse_size(input).is_err());
    }

    #[test]
    fn time_forms() {
        let base = base();

        let t = parse_time("17", base).unwrap();
        assert_eq!(t, base - chrono::Duration::hours(1));

        let t = parse_time("17:01", base).unwrap();
        assert_eq!(
            t,
            base - chrono::Duration::hours(1) + chrono::Duration::minutes(1)
        );

        let t = parse_time("17:00:01", base).unwrap();
        assert_eq!(
            t,
            base - chrono::Duration::hours(1) + chrono::Duration::seconds(1)
        );

        let t = parse_time("2026-12-26", base).unwrap();
        assert_eq!(t, Local.with_ymd_and_hms(2026, 12, 26, 0, 0, 0).unwrap());

        let t = parse_time("2026-12-26T17:01:01", base).unwrap();
        assert_eq!(t, Local.with_ymd_and_hms(2026, 12, 26, 17, 1, 1).unwrap());

        let t = parse_time("2026-12-26T17:01:01+08:00", base).unwrap();
        let expected = DateTime::parse_from_rfc3339("2026-12-26T17:01:01+08:00").unwrap();
        assert_eq!(t.timestamp(), expected.timestamp());

        assert!(parse_time("", base).is_err());
        assert!(parse_time("xx", base).is_err());
        assert!(parse_time("25", base).is_err());
    }

    #[rstest]
    #[case("0", Some((false, 0)))]
    #[case("123", Some((false, 123)))]
    #[case("-123", Some((true, 123)))]
    #[case("+7", Some((false, 7)))]
    #[case("0x10", Some((false, 16)))]
    #[case("0o17", Some((false, 15)))]
    #[case("017", Some((false, 15)))]
    #[case("0b101", Some((false, 5)))]
    #[case("", None)]
    #[case("-", None)]
    #[case("0x", None)]
    #[case("12a", None)]
    fn base0_integers(#[case] input: &str, #[case] expected: Option<(bool, u64)>) {
        assert_eq!(parse_int(input), expected);
    }

    #[rstest]
    #[case(0, "")]
    #[case(5, "5B")]
    #[case(MB + KB, "1MB1KB")]
    #[case(2 * GB + 10 * MB, "2GB10MB")]
    #[case(1023, "1023B")]
    fn size_text(#[case] magnitude: u64, #[case] expected: &str) {
        let mut buf = Vec::new();
        let n = write_size(&mut buf, magnitude).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), expected);
        assert_eq!(n, expected.len());
    }

    #[rstest]
    #[case(0, "0s")]
    #[case(123, "123ns")]
    #[case(1_500, "1.5us")]
    #[case(2 * MS, "2ms")]
    #[case(MINUTE + SECOND, "1m1s")]
    #[case(HOUR + SECOND, "1h0m1s")]
    #[case(90 * MINUTE, "1h30m0s")]
    #[case(SECOND + SECOND / 2, "1.5s")]
    fn duration_text(#[case] nanos: u64, #[case] expected: &str) {
        let mut buf = Vec::new();
        write_duration(&mut buf, nanos).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), expected);
    }

    #[test]
    fn duration_text_round_trips() {
        for nanos in [
            0u64,
            1,
            999,
            1_500,
            MS,
            SECOND,
            MINUTE + SECOND,
            HOUR + SECOND,
            36 * HOUR + 15 * MINUTE + 9 * SECOND,
        ] {
            let mut buf = Vec::new();
            write_duration(&mut buf, nanos).unwrap();
            let text = String::from_utf8(buf).unwrap();
            let (neg, got) = parse_duration(&text, base()).unwrap();
            assert!(!neg);
            assert_eq!(got, nanos, "round-trip of {text}");
        }
    }

    #[rstest]
    #[case("", "", true)]
    #[case("ab", "", true)]
    #[case("abc", "", false)]
    #[case("complete", "complte", true)]
    #[case("complete", "ComPlete", true)]
    #[case("complete", "xyz", false)]
    #[case("at", "a", true)]
    #[case("at", "xy", false)]
    fn similarity(#[case] known: &str, #[case] to_compare: &str, #[case] expected: bool) {
        assert_eq!(is_similar(known, to_compare, true), expected);
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting", false), 3);
        assert_eq!(levenshtein("abc", "abc", false), 0);
        assert_eq!(levenshtein("abc", "ABC", true), 0);
        assert_eq!(levenshtein("", "abc", false), 3);
    }
}
