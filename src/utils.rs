use std::sync::LazyLock;

use regex::Regex;

/// Course lengths at or above this are taken to be in metres, not kilometres
pub const MIN_COURSE_LENGTH_METRES: f64 = 500.0;

/// Shown in place of a missing time
pub const NULL_TIME_PLACEHOLDER: &str = "-----";

/// Shown in place of a dubious (NaN) time
pub const DUBIOUS_TIME_PLACEHOLDER: &str = "???";

static TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+:)?\d+:\d\d([,.]\d+)?$").unwrap());

static LEADING_FLOAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").unwrap());

static LEADING_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[+-]?\d+").unwrap());

// ============================================================================
// NUMBER PARSING
// ============================================================================

/// Parses the numeric prefix of a string, ignoring leading whitespace and any
/// trailing text (so "4.5km" gives 4.5)
pub fn parse_leading_float(s: &str) -> Option<f64> {
    let m = LEADING_FLOAT.find(s.trim_start())?;
    m.as_str().parse::<f64>().ok()
}

/// Parses the integer prefix of a string, ignoring leading whitespace and any
/// trailing text
pub fn parse_leading_int(s: &str) -> Option<i64> {
    let m = LEADING_INT.find(s.trim_start())?;
    m.as_str().parse::<i64>().ok()
}

/// Parses a course length in kilometres or metres, with either '.' or ','
/// as the decimal separator. The result is always in kilometres.
pub fn parse_course_length(s: &str) -> Option<f64> {
    let length = parse_leading_float(&s.replacen(',', ".", 1))?;
    if !length.is_finite() {
        return None;
    }

    if length >= MIN_COURSE_LENGTH_METRES {
        Some(length / 1000.0)
    } else {
        Some(length)
    }
}

/// Parses a course climb, a whole number of metres
pub fn parse_course_climb(s: &str) -> Option<i64> {
    parse_leading_int(s)
}

/// Converts CRLF and lone CR line endings to LF
pub fn normalise_line_endings(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

// ============================================================================
// TIME PARSING AND FORMATTING
// ============================================================================

/// Parses a time of the form MM:SS or H:MM:SS, optionally with fractional
/// seconds after '.' or ','. Anything unrecognised is a missed punch and
/// gives None.
pub fn parse_time(s: &str) -> Option<f64> {
    let s = s.trim();
    if !TIME_PATTERN.is_match(s) {
        return None;
    }

    s.replacen(',', ".", 1)
        .split(':')
        .try_fold(0.0, |total, part| part.parse::<f64>().ok().map(|p| total * 60.0 + p))
}

/// Whether a string is empty or a time `parse_time` accepts
pub fn is_blank_or_time(s: &str) -> bool {
    s.trim().is_empty() || parse_time(s).is_some()
}

/// Formats a number of seconds as [-][h:]mm:ss.ss
///
/// With no precision given, fractional seconds are rounded to two decimal
/// places and trailing zeros dropped.
pub fn format_time(seconds: Option<f64>, precision: Option<usize>) -> String {
    let Some(mut seconds) = seconds else {
        return NULL_TIME_PLACEHOLDER.to_string();
    };
    if seconds.is_nan() {
        return DUBIOUS_TIME_PLACEHOLDER.to_string();
    }

    let mut result = String::new();
    if seconds < 0.0 {
        result.push('-');
        seconds = -seconds;
    }

    let hours = (seconds / 3600.0).floor();
    let mins = (seconds / 60.0).floor() % 60.0;
    let secs = seconds % 60.0;

    if hours > 0.0 {
        result.push_str(&format!("{}:", hours));
    }
    result.push_str(&format!("{:02}:", mins as u32));
    if secs < 10.0 {
        result.push('0');
    }

    match precision {
        Some(p) => result.push_str(&format!("{:.*}", p, secs)),
        None => result.push_str(&format!("{}", (secs * 100.0).round() / 100.0)),
    }

    result
}

// ============================================================================
// NULL-SAFE ARITHMETIC
// ============================================================================

/// True if the value is present and not NaN
pub fn is_not_null_nor_nan(value: Option<f64>) -> bool {
    matches!(value, Some(v) if !v.is_nan())
}

/// a + b, or None if either is None
pub fn add_if_not_null(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? + b?)
}

/// a - b, or None if either is None
pub fn subtract_if_not_null(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? - b?)
}

/// Whether two optional times hold the same value, treating NaN as equal to NaN
pub fn times_equal(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => false,
    }
}

/// Compares two vectors of optional times element by element, NaN-aware
pub fn time_lists_equal(a: &[Option<f64>], b: &[Option<f64>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| times_equal(*x, *y))
}
