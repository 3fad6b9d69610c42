//! Array key normalization
//!
//! PHP arrays have exactly two key kinds. Every subscript value is folded into
//! one of them before it touches the hash table.
//!
//! | Subscript            | Key                                 |
//! |----------------------|-------------------------------------|
//! | `int`                | itself                              |
//! | `bool`               | `0` / `1`                           |
//! | `null`               | `""`                                |
//! | `float`              | truncated toward zero (wraps, NaN→0) |
//! | canonical int string | the integer (`"12"`, `"-3"`, `"0"`)  |
//! | any other string     | the string verbatim (`"08"`, `"-0"`) |
//!
//! Reference: $PHP_SRC_PATH/Zend/zend_hash.h - ZEND_HANDLE_NUMERIC_STR_EX

use crate::core::value::Val;
use crate::vm::type_conversion::float_to_int;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum ArrayKey {
    Int(i64),
    Str(Rc<Vec<u8>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Arrays and objects cannot be used as keys
    IllegalOffsetType(&'static str),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::IllegalOffsetType(ty) => write!(f, "Illegal offset type: {}", ty),
        }
    }
}

impl std::error::Error for KeyError {}

impl ArrayKey {
    /// Build a string key, folding canonical integer strings into int keys
    pub fn from_bytes(bytes: &[u8]) -> ArrayKey {
        match parse_canonical_int(bytes) {
            Some(i) => ArrayKey::Int(i),
            None => ArrayKey::Str(Rc::new(bytes.to_vec())),
        }
    }

    pub fn to_val(&self) -> Val {
        match self {
            ArrayKey::Int(i) => Val::Int(*i),
            ArrayKey::Str(s) => Val::String(s.clone()),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ArrayKey::Int(i) => i.to_string().into_bytes(),
            ArrayKey::Str(s) => s.as_ref().clone(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArrayKey::Int(i) => Some(*i),
            ArrayKey::Str(_) => None,
        }
    }
}

impl From<i64> for ArrayKey {
    fn from(i: i64) -> Self {
        ArrayKey::Int(i)
    }
}

impl From<&str> for ArrayKey {
    fn from(s: &str) -> Self {
        ArrayKey::from_bytes(s.as_bytes())
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKey::Int(i) => write!(f, "{}", i),
            ArrayKey::Str(s) => write!(f, "{}", String::from_utf8_lossy(s)),
        }
    }
}

/// Normalize a subscript value into an array key
pub fn normalize_key(val: &Val) -> Result<ArrayKey, KeyError> {
    match val {
        Val::Int(i) => Ok(ArrayKey::Int(*i)),
        Val::Bool(b) => Ok(ArrayKey::Int(*b as i64)),
        Val::Null => Ok(ArrayKey::Str(Rc::new(Vec::new()))),
        Val::Float(f) => Ok(ArrayKey::Int(float_to_int(*f))),
        Val::String(s) => Ok(match parse_canonical_int(s) {
            Some(i) => ArrayKey::Int(i),
            None => ArrayKey::Str(s.clone()),
        }),
        Val::Array(_) => Err(KeyError::IllegalOffsetType("array")),
        Val::Object(_) => Err(KeyError::IllegalOffsetType("object")),
    }
}

/// Parse a canonical decimal integer string: `0`, or an optional `-` followed
/// by a non-zero digit and more digits, within the i64 range.
/// Reference: $PHP_SRC_PATH/Zend/zend_hash.c - _zend_handle_numeric_str_ex
pub fn parse_canonical_int(s: &[u8]) -> Option<i64> {
    let (negative, digits) = match s.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some(_) => (false, s),
        None => return None,
    };

    match digits {
        [] => return None,
        [b'0'] => return if negative { None } else { Some(0) },
        [b'0', ..] => return None,
        _ => {}
    }
    // Longer than "9223372036854775808" can never fit
    if digits.len() > 19 || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

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

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: Val) -> ArrayKey {
        normalize_key(&v).unwrap()
    }

    #[test]
    fn test_canonical_strings_become_ints() {
        assert_eq!(key(Val::from("0")), ArrayKey::Int(0));
        assert_eq!(key(Val::from("-1")), ArrayKey::Int(-1));
        assert_eq!(key(Val::from("123")), ArrayKey::Int(123));
        assert_eq!(
            key(Val::from("9223372036854775807")),
            ArrayKey::Int(i64::MAX)
        );
        assert_eq!(
            key(Val::from("-9223372036854775808")),
            ArrayKey::Int(i64::MIN)
        );
    }

    #[test]
    fn test_non_canonical_strings_stay_strings() {
        for s in ["08", "00", "-0", "+1", " 1", "1 ", "1.0", "", "1e3", "9223372036854775808"] {
            assert_eq!(key(Val::from(s)), ArrayKey::Str(Rc::new(s.as_bytes().to_vec())), "{:?}", s);
        }
    }

    #[test]
    fn test_scalar_keys() {
        assert_eq!(key(Val::Bool(true)), ArrayKey::Int(1));
        assert_eq!(key(Val::Bool(false)), ArrayKey::Int(0));
        assert_eq!(key(Val::Null), ArrayKey::Str(Rc::new(Vec::new())));
        assert_eq!(key(Val::Float(1.9)), ArrayKey::Int(1));
        assert_eq!(key(Val::Float(-1.9)), ArrayKey::Int(-1));
        assert_eq!(key(Val::Float(f64::NAN)), ArrayKey::Int(0));
        assert_eq!(key(Val::Float(f64::INFINITY)), ArrayKey::Int(0));
        assert_eq!(key(Val::Int(4294967295)), ArrayKey::Int(4294967295));
    }

    #[test]
    fn test_illegal_offset_types() {
        assert_eq!(
            normalize_key(&Val::empty_array()),
            Err(KeyError::IllegalOffsetType("array"))
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let samples = vec![
            Val::from("08"),
            Val::from("8"),
            Val::Float(3.7),
            Val::Null,
            Val::Bool(true),
            Val::Int(i64::MIN),
            Val::from("-9223372036854775809"),
        ];
        for v in samples {
            let k = key(v);
            assert_eq!(key(k.to_val()), k);
        }
    }
}
