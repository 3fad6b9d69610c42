//! `++` and `--`
//!
//! ## PHP Semantics
//!
//! - Integers overflow into floats at the `i64` boundary.
//! - Numeric strings step as numbers. Other strings use the Perl-style
//!   alphanumeric carry on `++` and are left untouched by `--`.
//! - `null++` is `1`, `null--` stays `null`. Booleans never change.
//! - Diagnostics follow PHP 8.3.
//!
//! ## References
//!
//! - `$PHP_SRC_PATH/Zend/zend_operators.c` - increment_function, decrement_function
use crate::builtins::exception::PhpException;
use crate::core::value::Val;
use crate::vm::error::{ErrorHandler, ErrorLevel, VmError};
use crate::vm::type_conversion::{Number, NumericKind, add_int_overflow, sub_int_overflow, to_number};
use std::rc::Rc;

/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - increment_function
pub fn increment_value(val: Val, errors: &mut dyn ErrorHandler) -> Result<Val, VmError> {
    match val {
        Val::Int(i) => Ok(add_int_overflow(i, 1).to_val()),

        Val::Float(f) => Ok(Val::Float(f + 1.0)),

        Val::Null => Ok(Val::Int(1)),

        Val::String(s) => increment_string(s, errors),

        Val::Bool(_) => {
            errors.report(
                ErrorLevel::Warning,
                "Increment on type bool has no effect, this will change in the next major version of PHP",
            );
            Ok(val)
        }

        Val::Array(_) => Err(cannot("increment", "array")),
        Val::Object(obj) => Err(cannot("increment", &obj.class_name())),
    }
}

/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - decrement_function
pub fn decrement_value(val: Val, errors: &mut dyn ErrorHandler) -> Result<Val, VmError> {
    match val {
        Val::Int(i) => Ok(sub_int_overflow(i, 1).to_val()),

        Val::Float(f) => Ok(Val::Float(f - 1.0)),

        Val::String(s) => decrement_string(s, errors),

        Val::Null => {
            errors.report(
                ErrorLevel::Warning,
                "Decrement on type null has no effect, this will change in the next major version of PHP",
            );
            Ok(Val::Null)
        }

        Val::Bool(_) => {
            errors.report(
                ErrorLevel::Warning,
                "Decrement on type bool has no effect, this will change in the next major version of PHP",
            );
            Ok(val)
        }

        Val::Array(_) => Err(cannot("decrement", "array")),
        Val::Object(obj) => Err(cannot("decrement", &obj.class_name())),
    }
}

fn cannot(op: &str, type_name: &str) -> VmError {
    VmError::Exception(PhpException::with_class(
        "TypeError",
        format!("Cannot {} {}", op, type_name),
    ))
}

#[derive(Clone, Copy)]
enum CharClass {
    Lower,
    Upper,
    Digit,
}

/// Perl-style alphanumeric increment of a non-numeric string.
///
/// The rightmost character is bumped and carries propagate left through
/// letters and digits of the same class (`z`→`a`, `Z`→`A`, `9`→`0`). A carry
/// out of the first character prepends `a`, `A` or `1`. Scanning stops at the
/// first non-alphanumeric byte, so `"a-"` stays `"a-"`.
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - increment_string
pub fn increment_alphanumeric(s: &[u8]) -> Vec<u8> {
    if s.is_empty() {
        return b"1".to_vec();
    }

    let mut result = s.to_vec();
    let mut carry = false;
    let mut last = CharClass::Digit;

    for pos in (0..result.len()).rev() {
        let ch = result[pos];
        let (class, wrap_from, wrap_to) = match ch {
            b'a'..=b'z' => (CharClass::Lower, b'z', b'a'),
            b'A'..=b'Z' => (CharClass::Upper, b'Z', b'A'),
            b'0'..=b'9' => (CharClass::Digit, b'9', b'0'),
            _ => {
                carry = false;
                break;
            }
        };
        last = class;
        if ch == wrap_from {
            result[pos] = wrap_to;
            carry = true;
        } else {
            result[pos] = ch + 1;
            carry = false;
            break;
        }
    }

    if carry {
        let first = match last {
            CharClass::Digit => b'1',
            CharClass::Upper => b'A',
            CharClass::Lower => b'a',
        };
        result.insert(0, first);
    }
    result
}

fn increment_string(s: Rc<Vec<u8>>, errors: &mut dyn ErrorHandler) -> Result<Val, VmError> {
    if s.is_empty() {
        return Ok(Val::from("1"));
    }

    match to_number(&s) {
        (Number::Int(i), NumericKind::Numeric) => return Ok(add_int_overflow(i, 1).to_val()),
        (Number::Float(f), NumericKind::Numeric) => return Ok(Val::Float(f + 1.0)),
        _ => {}
    }

    errors.report(
        ErrorLevel::Deprecated,
        "Increment on non-numeric string is deprecated, use str_increment() instead",
    );
    Ok(Val::String(Rc::new(increment_alphanumeric(&s))))
}

/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - decrement_function
fn decrement_string(s: Rc<Vec<u8>>, errors: &mut dyn ErrorHandler) -> Result<Val, VmError> {
    if s.is_empty() {
        errors.report(
            ErrorLevel::Deprecated,
            "Decrement on empty string is deprecated as non-numeric",
        );
        return Ok(Val::Int(-1));
    }

    match to_number(&s) {
        (Number::Int(i), NumericKind::Numeric) => Ok(sub_int_overflow(i, 1).to_val()),
        (Number::Float(f), NumericKind::Numeric) => Ok(Val::Float(f - 1.0)),
        _ => {
            errors.report(
                ErrorLevel::Deprecated,
                "Decrement on non-numeric string has no effect and is deprecated",
            );
            Ok(Val::String(s))
        }
    }
}
