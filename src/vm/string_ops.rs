//! String offsets
//!
//! Byte-indexed access into strings (`$s[1]`, `$s[-1]`, `$s[5] = 'x'`).
//!
//! ## PHP Semantics
//!
//! - Non-negative offsets count from the start, negative ones from the end.
//! - Reading out of range yields `""` with `Uninitialized string offset N`.
//! - Writing past the end pads the gap, then stores one byte. Writing an
//!   empty string is rejected and leaves the string untouched; a longer value
//!   stores its first byte only.
//! - Offsets are coerced: ints as is, integer strings parsed, and
//!   float/bool/null cast with `String offset cast occurred`.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_execute.c` - zend_fetch_dimension_str
//! - Zend: `$PHP_SRC_PATH/Zend/zend_execute.c` - zend_assign_to_string_offset
//! - Zend: `$PHP_SRC_PATH/Zend/zend_execute.c` - zend_isset_dim_slow

use crate::builtins::exception::PhpException;
use crate::core::value::Val;
use crate::vm::error::{ErrorHandler, ErrorLevel, VmError};
use crate::vm::type_conversion::{Number, NumericKind, parse_numeric_prefix, to_int, to_php_string};

/// Map a signed offset onto a byte index
#[inline]
pub fn resolve_offset(len: usize, offset: i64) -> Option<usize> {
    let len = len as i64;
    let index = if offset < 0 { len.checked_add(offset)? } else { offset };
    if index >= 0 && index < len {
        Some(index as usize)
    } else {
        None
    }
}

/// Byte at a signed offset
pub fn offset_get(s: &[u8], offset: i64) -> Option<u8> {
    resolve_offset(s.len(), offset).map(|i| s[i])
}

fn illegal_offset(offset: &Val) -> VmError {
    VmError::Exception(PhpException::with_class(
        "TypeError",
        format!("Cannot access offset of type {} on string", offset.type_name()),
    ))
}

/// Coerce an offset value to an integer for reads and writes
pub fn string_offset(offset: &Val, errors: &mut dyn ErrorHandler) -> Result<i64, VmError> {
    match offset {
        Val::Int(i) => Ok(*i),
        Val::String(s) => {
            let prefix = parse_numeric_prefix(s);
            match (prefix.number, prefix.kind) {
                (Number::Int(i), NumericKind::Numeric) => Ok(i),
                (Number::Int(i), NumericKind::LeadingNumeric) => {
                    errors.report(
                        ErrorLevel::Warning,
                        &format!("Illegal string offset \"{}\"", String::from_utf8_lossy(s)),
                    );
                    Ok(i)
                }
                _ => Err(illegal_offset(offset)),
            }
        }
        Val::Float(_) | Val::Bool(_) | Val::Null => {
            errors.report(ErrorLevel::Warning, "String offset cast occurred");
            Ok(to_int(offset))
        }
        Val::Array(_) | Val::Object(_) => Err(illegal_offset(offset)),
    }
}

/// `$s[$offset]` in read context
pub fn fetch_offset(s: &[u8], offset: &Val, errors: &mut dyn ErrorHandler) -> Result<Val, VmError> {
    let index = string_offset(offset, errors)?;
    match offset_get(s, index) {
        Some(byte) => Ok(Val::string(vec![byte])),
        None => {
            errors.report(
                ErrorLevel::Warning,
                &format!("Uninitialized string offset {}", index),
            );
            Ok(Val::from(""))
        }
    }
}

/// `isset($s[$offset])`: silent, only integer-like offsets qualify
pub fn isset_offset(s: &[u8], offset: &Val) -> bool {
    let index = match offset {
        Val::Int(i) => *i,
        Val::Null | Val::Bool(_) | Val::Float(_) => to_int(offset),
        Val::String(text) => match parse_numeric_prefix(text) {
            prefix if prefix.kind == NumericKind::Numeric => match prefix.number {
                Number::Int(i) => i,
                Number::Float(_) => return false,
            },
            _ => return false,
        },
        Val::Array(_) | Val::Object(_) => return false,
    };
    resolve_offset(s.len(), index).is_some()
}

/// `$s[$offset] = $value` on a byte buffer. Returns the byte written, or
/// `None` when the assignment was rejected.
pub fn assign_offset(
    buf: &mut Vec<u8>,
    offset: i64,
    value: &[u8],
    pad: u8,
    errors: &mut dyn ErrorHandler,
) -> Option<u8> {
    let len = buf.len() as i64;
    if offset < -len {
        errors.report(
            ErrorLevel::Warning,
            &format!("Illegal string offset {}", offset),
        );
        return None;
    }
    let index = (if offset < 0 { offset + len } else { offset }) as usize;

    let byte = match value {
        [] => {
            errors.report(
                ErrorLevel::Warning,
                "Cannot assign an empty string to a string offset",
            );
            return None;
        }
        [b] => *b,
        [b, ..] => {
            errors.report(
                ErrorLevel::Warning,
                "Only the first byte will be assigned to the string offset",
            );
            *b
        }
    };

    if index >= buf.len() {
        buf.resize(index + 1, pad);
    }
    buf[index] = byte;
    Some(byte)
}

/// Value-level assignment: coerces the offset and the assigned value
pub fn assign_offset_val(
    buf: &mut Vec<u8>,
    offset: &Val,
    value: &Val,
    pad: u8,
    errors: &mut dyn ErrorHandler,
) -> Result<Option<u8>, VmError> {
    let index = string_offset(offset, errors)?;
    let bytes = match value {
        Val::String(s) => s.as_ref().clone(),
        other => to_php_string(other, 14),
    };
    Ok(assign_offset(buf, index, &bytes, pad, errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::error::CollectingErrorHandler;

    #[test]
    fn test_negative_offsets() {
        let s = b"3896";
        assert_eq!(offset_get(s, -1), Some(b'6'));
        assert_eq!(offset_get(s, 0), Some(b'3'));
        assert_eq!(offset_get(s, -4), Some(b'3'));
        assert_eq!(offset_get(s, -5), None);
        assert_eq!(offset_get(s, 4), None);
        assert!(isset_offset(s, &Val::Int(-1)));
        assert!(!isset_offset(s, &Val::Int(-10)));
        assert!(isset_offset(s, &Val::from("1")));
        assert!(!isset_offset(s, &Val::from("1.0")));
        assert!(!isset_offset(s, &Val::from("x")));
    }

    #[test]
    fn test_fetch_out_of_range_warns() {
        let mut errors = CollectingErrorHandler::new();
        let v = fetch_offset(b"abc", &Val::Int(5), &mut errors).unwrap();
        assert_eq!(v, Val::from(""));
        assert_eq!(errors.messages(), vec!["Uninitialized string offset 5"]);
    }

    #[test]
    fn test_fetch_offset_casts() {
        let mut errors = CollectingErrorHandler::new();
        assert_eq!(
            fetch_offset(b"abc", &Val::Float(1.7), &mut errors).unwrap(),
            Val::from("b")
        );
        assert_eq!(errors.messages(), vec!["String offset cast occurred"]);
        assert!(fetch_offset(b"abc", &Val::from("x"), &mut errors).is_err());
    }

    #[test]
    fn test_assign_pads_with_nul() {
        let mut errors = CollectingErrorHandler::new();
        let mut buf = b"ab".to_vec();
        assert_eq!(assign_offset(&mut buf, 5, b"z", b'\0', &mut errors), Some(b'z'));
        assert_eq!(buf, b"ab\0\0\0z");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_assign_empty_string_is_noop() {
        let mut errors = CollectingErrorHandler::new();
        let mut buf = b"abc".to_vec();
        assert_eq!(assign_offset(&mut buf, 1, b"", b'\0', &mut errors), None);
        assert_eq!(buf, b"abc");
        assert_eq!(
            errors.messages(),
            vec!["Cannot assign an empty string to a string offset"]
        );
    }

    #[test]
    fn test_assign_negative_offsets() {
        let mut errors = CollectingErrorHandler::new();
        let mut buf = b"abc".to_vec();
        assign_offset(&mut buf, -1, b"xy", b'\0', &mut errors);
        assert_eq!(buf, b"abx");
        assert_eq!(assign_offset(&mut buf, -4, b"q", b'\0', &mut errors), None);
        assert_eq!(
            errors.messages(),
            vec![
                "Only the first byte will be assigned to the string offset",
                "Illegal string offset -4"
            ]
        );
    }

    #[test]
    fn test_assign_value_coercion() {
        let mut errors = CollectingErrorHandler::new();
        let mut buf = b"000".to_vec();
        assign_offset_val(&mut buf, &Val::from("1"), &Val::Int(7), b' ', &mut errors).unwrap();
        assert_eq!(buf, b"070");
    }
}
