//! PHP type juggling and conversion
//!
//! Implements PHP's automatic type conversion following Zend semantics.
//!
//! ## PHP Type Juggling Rules
//!
//! ### Numeric strings
//! A string is *numeric* when, after optional leading whitespace, it holds an
//! optional sign, digits with an optional fraction and an optional exponent,
//! followed only by whitespace. When garbage follows a valid prefix the string
//! is *leading-numeric* (`"12abc"`) and arithmetic uses the prefix with a
//! warning. Anything else is non-numeric and counts as `0`.
//!
//! ### To Integer
//! - `true` → 1, `false` → 0, null → 0
//! - Floats truncated toward zero; NaN and infinities become 0, out-of-range
//!   values wrap modulo 2^64
//! - Numeric strings parsed; float-shaped strings saturate at the int bounds
//!
//! ### To String
//! - Floats are rendered with `precision` significant digits (14 by default),
//!   switching to exponent notation like `1.0E+25`
//! - true → "1", false → "", null → ""
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_operators.c` - conversion functions
//! - Zend: `$PHP_SRC_PATH/Zend/zend_operators.h` - zend_dval_to_lval
//! - Zend: `$PHP_SRC_PATH/main/snprintf.c` - php_gcvt
//! - PHP Manual: https://www.php.net/manual/en/language.types.numeric-strings.php

use crate::core::value::Val;
use std::cmp::Ordering;

/// Result of numeric interpretation: PHP's `IS_LONG` / `IS_DOUBLE`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn to_float(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn to_int(self) -> i64 {
        match self {
            Number::Int(i) => i,
            Number::Float(f) => float_to_int(f),
        }
    }

    pub fn to_val(self) -> Val {
        match self {
            Number::Int(i) => Val::Int(i),
            Number::Float(f) => Val::Float(f),
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    /// Numeric ordering; NaN compares as unordered
    pub fn partial_cmp_num(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.to_float().partial_cmp(&b.to_float()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    /// Whole string is a number (surrounding whitespace allowed)
    Numeric,
    /// A number followed by other characters
    LeadingNumeric,
    NonNumeric,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericPrefix {
    pub number: Number,
    pub kind: NumericKind,
    /// Bytes consumed by the numeric prefix, including leading whitespace
    pub len: usize,
}

#[inline]
fn is_php_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Scan the longest numeric prefix of `s`
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - _is_numeric_string_ex
pub fn parse_numeric_prefix(s: &[u8]) -> NumericPrefix {
    let non_numeric = NumericPrefix {
        number: Number::Int(0),
        kind: NumericKind::NonNumeric,
        len: 0,
    };

    let mut pos = 0;
    while pos < s.len() && is_php_whitespace(s[pos]) {
        pos += 1;
    }
    let negative = match s.get(pos) {
        Some(b'-') => {
            pos += 1;
            true
        }
        Some(b'+') => {
            pos += 1;
            false
        }
        _ => false,
    };

    let int_start = pos;
    while pos < s.len() && s[pos].is_ascii_digit() {
        pos += 1;
    }
    let int_digits = &s[int_start..pos];

    let mut frac_digits: &[u8] = &[];
    let mut is_float = false;
    if s.get(pos) == Some(&b'.') {
        let frac_start = pos + 1;
        let mut end = frac_start;
        while end < s.len() && s[end].is_ascii_digit() {
            end += 1;
        }
        if !int_digits.is_empty() || end > frac_start {
            frac_digits = &s[frac_start..end];
            pos = end;
            is_float = true;
        }
    }

    if int_digits.is_empty() && !is_float {
        return non_numeric;
    }

    // Exponent only counts when at least one digit follows
    let mut exponent: &[u8] = &[];
    if matches!(s.get(pos), Some(b'e') | Some(b'E')) {
        let mut end = pos + 1;
        if matches!(s.get(end), Some(b'-') | Some(b'+')) {
            end += 1;
        }
        let digits_start = end;
        while end < s.len() && s[end].is_ascii_digit() {
            end += 1;
        }
        if end > digits_start {
            exponent = &s[pos + 1..end];
            pos = end;
            is_float = true;
        }
    }

    let number_end = pos;
    while pos < s.len() && is_php_whitespace(s[pos]) {
        pos += 1;
    }
    let kind = if pos == s.len() {
        NumericKind::Numeric
    } else {
        NumericKind::LeadingNumeric
    };

    let number = if is_float {
        Number::Float(digits_to_float(negative, int_digits, frac_digits, exponent))
    } else {
        match parse_decimal_digits(negative, int_digits) {
            Some(i) => Number::Int(i),
            None => Number::Float(digits_to_float(negative, int_digits, &[], &[])),
        }
    };

    NumericPrefix {
        number,
        kind,
        len: number_end,
    }
}

fn parse_decimal_digits(negative: bool, digits: &[u8]) -> Option<i64> {
    let mut acc: i64 = 0;
    for &d in digits {
        let digit = (d - b'0') as i64;
        acc = acc.checked_mul(10)?;
        acc = if negative {
            acc.checked_sub(digit)?
        } else {
            acc.checked_add(digit)?
        };
    }
    Some(acc)
}

fn digits_to_float(negative: bool, int_digits: &[u8], frac_digits: &[u8], exponent: &[u8]) -> f64 {
    let mut text = String::with_capacity(int_digits.len() + frac_digits.len() + exponent.len() + 4);
    if negative {
        text.push('-');
    }
    if int_digits.is_empty() {
        text.push('0');
    } else {
        text.extend(int_digits.iter().map(|&b| b as char));
    }
    if !frac_digits.is_empty() {
        text.push('.');
        text.extend(frac_digits.iter().map(|&b| b as char));
    }
    if !exponent.is_empty() {
        text.push('e');
        text.extend(exponent.iter().map(|&b| b as char));
    }
    // Only ASCII digits, sign, '.' and 'e' reach this point
    text.parse::<f64>().unwrap_or(0.0)
}

/// Interpret a string as a number
pub fn to_number(s: &[u8]) -> (Number, NumericKind) {
    let prefix = parse_numeric_prefix(s);
    (prefix.number, prefix.kind)
}

/// `is_numeric()` for strings
pub fn is_numeric_str(s: &[u8]) -> bool {
    parse_numeric_prefix(s).kind == NumericKind::Numeric
}

/// Truncate a float toward zero the way `(int)` does on 64-bit builds
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.h - zend_dval_to_lval
pub fn float_to_int(f: f64) -> i64 {
    if !f.is_finite() {
        return 0;
    }
    let t = f.trunc();
    if t >= -9.223_372_036_854_775_808e18 && t < 9.223_372_036_854_775_808e18 {
        return t as i64;
    }
    // Modular arithmetic: dmod = fmod(d, 2^64), shifted into the signed range
    let two_pow_64 = 18_446_744_073_709_551_616.0_f64;
    let mut dmod = t % two_pow_64;
    if dmod < 0.0 {
        // Negative values wrap from the top
        dmod += two_pow_64;
        if dmod >= two_pow_64 {
            return 0;
        }
    }
    if dmod >= 9.223_372_036_854_775_808e18 {
        dmod -= two_pow_64;
    }
    dmod as i64
}

/// Saturating variant used for float-shaped numeric strings
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.h - zend_dval_to_lval_cap
pub fn float_to_int_cap(f: f64) -> i64 {
    if f.is_nan() {
        return 0;
    }
    // `as` saturates at the bounds and maps infinities to them
    f as i64
}

/// Whether a float survives conversion to int unchanged
pub fn float_is_integral(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && float_to_int(f) as f64 == f
}

/// Convert any value to integer following PHP rules
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - zval_get_long
pub fn to_int(val: &Val) -> i64 {
    match val {
        Val::Null => 0,
        Val::Bool(b) => *b as i64,
        Val::Int(i) => *i,
        Val::Float(f) => float_to_int(*f),
        Val::String(s) => match to_number(s).0 {
            Number::Int(i) => i,
            Number::Float(f) => float_to_int_cap(f),
        },
        Val::Array(arr) => !arr.is_empty() as i64,
        Val::Object(_) => 1,
    }
}

/// Convert any value to float following PHP rules
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - zval_get_double
pub fn to_float(val: &Val) -> f64 {
    match val {
        Val::Null => 0.0,
        Val::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Val::Int(i) => *i as f64,
        Val::Float(f) => *f,
        Val::String(s) => to_number(s).0.to_float(),
        Val::Array(arr) => {
            if arr.is_empty() {
                0.0
            } else {
                1.0
            }
        }
        Val::Object(_) => 1.0,
    }
}

pub fn to_bool(val: &Val) -> bool {
    val.to_bool()
}

/// Numeric view of a value for arithmetic (`+`, `++`, comparisons)
pub fn to_numeric(val: &Val) -> Number {
    match val {
        Val::Int(i) => Number::Int(*i),
        Val::Float(f) => Number::Float(*f),
        Val::String(s) => to_number(s).0,
        other => Number::Int(to_int(other)),
    }
}

/// String conversion (`(string)`, `echo`, concatenation)
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - zval_get_string
pub fn to_php_string(val: &Val, precision: i32) -> Vec<u8> {
    match val {
        Val::Null => Vec::new(),
        Val::Bool(true) => b"1".to_vec(),
        Val::Bool(false) => Vec::new(),
        Val::Int(i) => i.to_string().into_bytes(),
        Val::Float(f) => format_float(*f, precision, b'E').into_bytes(),
        Val::String(s) => s.as_ref().clone(),
        Val::Array(_) => b"Array".to_vec(),
        Val::Object(obj) => obj.class_name().as_bytes().to_vec(),
    }
}

/// Integer addition promoting to float on overflow
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.h - fast_long_add_function
pub fn add_int_overflow(a: i64, b: i64) -> Number {
    match a.checked_add(b) {
        Some(r) => Number::Int(r),
        None => Number::Float(a as f64 + b as f64),
    }
}

pub fn sub_int_overflow(a: i64, b: i64) -> Number {
    match a.checked_sub(b) {
        Some(r) => Number::Int(r),
        None => Number::Float(a as f64 - b as f64),
    }
}

/// Parse a PHP integer literal (`123`, `0x1F`, `0b101`, `0o17`, `017`,
/// `1_000`). Literals beyond the int range become floats.
/// Reference: $PHP_SRC_PATH/Zend/zend_language_scanner.l - T_LNUMBER
pub fn parse_int_literal(literal: &str) -> Option<Number> {
    let cleaned: String = literal.chars().filter(|&c| c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();

    let (radix, digits) = if let Some(rest) = lower.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (2, rest)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (8, rest)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (8, &lower[1..])
    } else {
        (10, lower.as_str())
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    match i64::from_str_radix(digits, radix) {
        Ok(i) => Some(Number::Int(i)),
        Err(_) => {
            let f = if radix == 10 {
                digits.parse::<f64>().ok()?
            } else {
                digits
                    .chars()
                    .filter_map(|c| c.to_digit(radix))
                    .fold(0.0_f64, |acc, d| acc * radix as f64 + d as f64)
            };
            Some(Number::Float(f))
        }
    }
}

/// Unary minus as applied to a literal: `-PHP_INT_MAX - 1` is only reachable
/// through arithmetic, the literal `-9223372036854775808` is already a float.
pub fn negate_number(n: Number) -> Number {
    match n {
        Number::Int(i) => match i.checked_neg() {
            Some(r) => Number::Int(r),
            None => Number::Float(-(i as f64)),
        },
        Number::Float(f) => Number::Float(-f),
    }
}

/// Decimal digits and exponent of a finite, non-zero `|f|`: value is
/// `0.DIGITS * 10^decpt`. `precision == None` yields the shortest
/// round-trip digits.
fn float_digits(f: f64, precision: Option<usize>) -> (String, i32) {
    let formatted = match precision {
        Some(p) => format!("{:.*e}", p.saturating_sub(1), f.abs()),
        None => format!("{:e}", f.abs()),
    };
    let (mantissa, exp) = formatted.split_once('e').unwrap_or((formatted.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let mut digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    while digits.len() > 1 && digits.ends_with('0') {
        digits.pop();
    }
    (digits, exp + 1)
}

/// Render a float the way `zend_gcvt` does.
///
/// `precision` is the number of significant digits; `-1` selects the shortest
/// representation that round-trips (the `serialize_precision` default used by
/// `var_dump`, `var_export`, `serialize` and `json_encode`). `exp_char` is
/// `E` for string conversion and `e` for JSON.
/// Reference: $PHP_SRC_PATH/main/snprintf.c - php_gcvt
pub fn format_float(f: f64, precision: i32, exp_char: u8) -> String {
    if f.is_nan() {
        return "NAN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "INF" } else { "-INF" }.to_string();
    }

    let mut out = String::new();
    if f.is_sign_negative() {
        out.push('-');
    }
    if f == 0.0 {
        out.push('0');
        return out;
    }

    let (digits, decpt, ndigit) = if precision < 0 {
        let (d, e) = float_digits(f, None);
        (d, e, 17)
    } else {
        let p = precision.max(1) as usize;
        let (d, e) = float_digits(f, Some(p));
        (d, e, p as i32)
    };
    let bytes = digits.as_bytes();

    let exponential = if decpt < 0 { decpt < -3 } else { decpt > ndigit };
    if exponential {
        let exp = decpt - 1;
        out.push(bytes[0] as char);
        out.push('.');
        if bytes.len() == 1 {
            out.push('0');
        } else {
            out.push_str(&digits[1..]);
        }
        out.push(exp_char as char);
        out.push(if exp < 0 { '-' } else { '+' });
        out.push_str(&exp.abs().to_string());
    } else if decpt <= 0 {
        out.push_str("0.");
        for _ in decpt..0 {
            out.push('0');
        }
        out.push_str(&digits);
    } else {
        let decpt = decpt as usize;
        for i in 0..decpt {
            out.push(bytes.get(i).map(|&b| b as char).unwrap_or('0'));
        }
        if bytes.len() > decpt {
            out.push('.');
            out.push_str(&digits[decpt..]);
        }
    }
    out
}

/// Shortest round-trip rendering used by var_dump/var_export/serialize
pub fn format_float_repr(f: f64) -> String {
    format_float(f, -1, b'E')
}
