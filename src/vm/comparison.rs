//! Comparison operations
//!
//! Implements PHP 8 comparison following Zend semantics.
//!
//! ## PHP Semantics
//!
//! PHP supports two types of equality:
//! - **Loose equality** (`==`): Compares after type juggling
//! - **Strict equality** (`===`): Compares types and values
//!
//! Type juggling rules for comparisons:
//! - Two numeric strings compare as numbers, other strings byte-wise
//! - int/float against a non-numeric string compares the number's string form
//! - Boolean comparisons convert the other side to bool first
//! - null against a string compares `""` with the string
//! - Arrays compare by length, then key-by-key; a key missing on the right
//!   makes the pair uncomparable (reported as greater)
//! - An array is greater than any scalar
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_operators.c` - zend_compare
//! - Zend: `$PHP_SRC_PATH/Zend/zend_hash.c` - zend_hash_compare
//! - PHP Manual: https://www.php.net/manual/en/language.operators.comparison.php

use crate::core::array::{ArrayData, MAX_NESTING, same_cell};
use crate::core::value::{ObjectRef, Val};
use crate::vm::type_conversion::{Number, NumericKind, format_float, to_number, to_numeric};
use std::cmp::Ordering;
use std::rc::Rc;

#[inline]
fn normalize(ord: Ordering) -> i32 {
    match ord {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// ZEND_THREEWAY_COMPARE for doubles: NaN on either side yields 1
#[inline]
fn compare_floats(a: f64, b: f64) -> i32 {
    if a == b {
        0
    } else if a < b {
        -1
    } else {
        1
    }
}

fn compare_numbers(a: Number, b: Number) -> i32 {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => normalize(x.cmp(&y)),
        (x, y) => compare_floats(x.to_float(), y.to_float()),
    }
}

/// Byte-wise comparison, shorter prefix first
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - zend_binary_strcmp
pub fn binary_strcmp(a: &[u8], b: &[u8]) -> i32 {
    normalize(a.cmp(b))
}

fn numeric_string(s: &[u8]) -> Option<Number> {
    match to_number(s) {
        (n, NumericKind::Numeric) => Some(n),
        _ => None,
    }
}

/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - zendi_smart_strcmp
pub fn smart_strcmp(a: &[u8], b: &[u8]) -> i32 {
    match (numeric_string(a), numeric_string(b)) {
        (Some(x), Some(y)) => compare_numbers(x, y),
        _ => binary_strcmp(a, b),
    }
}

/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - compare_longs_to_string
fn compare_number_to_string(n: Number, s: &[u8]) -> i32 {
    if let Some(sn) = numeric_string(s) {
        return compare_numbers(n, sn);
    }
    let rendered = match n {
        Number::Int(i) => i.to_string(),
        Number::Float(f) => format_float(f, 14, b'E'),
    };
    binary_strcmp(rendered.as_bytes(), s)
}

/// Reference: $PHP_SRC_PATH/Zend/zend_hash.c - zend_hash_compare (unordered)
fn compare_arrays(a: &ArrayData, b: &ArrayData, depth: usize) -> i32 {
    if std::ptr::eq(a, b) {
        return 0;
    }
    if a.len() != b.len() {
        return normalize(a.len().cmp(&b.len()));
    }
    // Too deep to be anything but a recursive structure: uncomparable
    if depth >= MAX_NESTING {
        return 1;
    }
    for (key, left) in a.slots() {
        let Some(right) = b.get_slot(key) else {
            return 1;
        };
        if same_cell(left, right) {
            continue;
        }
        let result = compare_at(&left.value(), &right.value(), depth + 1);
        if result != 0 {
            return result;
        }
    }
    0
}

/// Reference: $PHP_SRC_PATH/Zend/zend_object_handlers.c - zend_std_compare_objects
fn compare_objects(a: &ObjectRef, b: &ObjectRef, depth: usize) -> i32 {
    if a.ptr_eq(b) {
        return 0;
    }
    if a.class_name() != b.class_name() {
        return 1;
    }
    let left = a.borrow();
    let right = b.borrow();
    compare_arrays(&left.properties, &right.properties, depth)
}

/// PHP comparison function (`<=>`): returns -1, 0, or 1
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - zend_compare
pub fn compare(a: &Val, b: &Val) -> i32 {
    compare_at(a, b, 0)
}

fn compare_at(a: &Val, b: &Val, depth: usize) -> i32 {
    match (a, b) {
        (Val::Int(x), Val::Int(y)) => normalize(x.cmp(y)),
        (Val::Int(x), Val::Float(y)) => compare_floats(*x as f64, *y),
        (Val::Float(x), Val::Int(y)) => compare_floats(*x, *y as f64),
        (Val::Float(x), Val::Float(y)) => compare_floats(*x, *y),

        (Val::Array(x), Val::Array(y)) => compare_arrays(x, y, depth),

        (Val::Null, Val::Null) => 0,
        (Val::Null, Val::Bool(y)) => normalize(false.cmp(y)),
        (Val::Bool(x), Val::Null) => normalize(x.cmp(&false)),
        (Val::Bool(x), Val::Bool(y)) => normalize(x.cmp(y)),

        (Val::String(x), Val::String(y)) => {
            if Rc::ptr_eq(x, y) {
                0
            } else {
                smart_strcmp(x, y)
            }
        }
        (Val::Null, Val::String(y)) => {
            if y.is_empty() {
                0
            } else {
                -1
            }
        }
        (Val::String(x), Val::Null) => {
            if x.is_empty() {
                0
            } else {
                1
            }
        }

        (Val::Int(x), Val::String(y)) => compare_number_to_string(Number::Int(*x), y),
        (Val::String(x), Val::Int(y)) => -compare_number_to_string(Number::Int(*y), x),
        (Val::Float(x), Val::String(y)) => {
            if x.is_nan() {
                1
            } else {
                compare_number_to_string(Number::Float(*x), y)
            }
        }
        (Val::String(x), Val::Float(y)) => {
            if y.is_nan() {
                1
            } else {
                -compare_number_to_string(Number::Float(*y), x)
            }
        }

        (Val::Object(x), Val::Object(y)) => compare_objects(x, y, depth),
        (Val::Object(_), Val::Null) => 1,
        (Val::Null, Val::Object(_)) => -1,

        // Null/false on the left: anything truthy is greater
        (Val::Null, _) | (Val::Bool(false), _) => {
            if b.to_bool() {
                -1
            } else {
                0
            }
        }
        (Val::Bool(true), _) => {
            if b.to_bool() {
                0
            } else {
                1
            }
        }
        (_, Val::Null) | (_, Val::Bool(false)) => {
            if a.to_bool() {
                1
            } else {
                0
            }
        }
        (_, Val::Bool(true)) => {
            if a.to_bool() {
                0
            } else {
                -1
            }
        }

        (Val::Array(_), _) => 1,
        (_, Val::Array(_)) => -1,

        // Objects against numbers/strings fall back to numeric juggling
        _ => compare_numbers(to_numeric(a), to_numeric(b)),
    }
}

/// PHP loose equality (==) with type juggling
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - zend_is_equal
pub fn loose_equals(a: &Val, b: &Val) -> bool {
    match (a, b) {
        (Val::Float(x), Val::Float(y)) => x == y,
        (Val::Int(x), Val::Float(y)) | (Val::Float(y), Val::Int(x)) => *x as f64 == *y,
        (Val::String(x), Val::String(y)) => x == y || smart_strcmp(x, y) == 0,
        _ => compare(a, b) == 0,
    }
}

/// PHP strict equality (===)
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - zend_is_identical
pub fn identical(a: &Val, b: &Val) -> bool {
    a == b
}

/// `compare` as an `Ordering`, for sort callbacks
pub fn compare_ordering(a: &Val, b: &Val) -> Ordering {
    compare(a, b).cmp(&0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Val {
        Val::from(v)
    }

    #[test]
    fn test_equal_with_type_juggling() {
        assert!(loose_equals(&Val::Int(42), &s("42")));
        assert!(loose_equals(&s("1e3"), &s("1000")));
        assert!(loose_equals(&s("abc"), &s("abc")));
        assert!(!loose_equals(&Val::Int(0), &s("a")));
        assert!(loose_equals(&Val::Int(42), &s(" 42")));
        assert!(!loose_equals(&s("abc"), &Val::Int(0)));
    }

    #[test]
    fn test_null_comparisons() {
        assert!(loose_equals(&Val::Null, &Val::Bool(false)));
        assert!(loose_equals(&Val::Null, &s("")));
        assert!(!loose_equals(&Val::Null, &s("0")));
        assert!(loose_equals(&Val::Null, &Val::Int(0)));
        assert!(loose_equals(&Val::Null, &Val::empty_array()));
        assert_eq!(compare(&Val::Null, &s("a")), -1);
    }

    #[test]
    fn test_bool_comparisons() {
        assert!(loose_equals(&Val::Bool(true), &s("abc")));
        assert!(loose_equals(&Val::Bool(false), &s("0")));
        assert_eq!(compare(&Val::Bool(true), &Val::Bool(false)), 1);
    }

    #[test]
    fn test_nan_never_equal() {
        let nan = Val::Float(f64::NAN);
        assert!(!loose_equals(&nan, &nan));
        assert_eq!(compare(&nan, &Val::Float(1.0)), 1);
    }

    #[test]
    fn test_spaceship_strings() {
        assert_eq!(compare(&s("a"), &s("b")), -1);
        assert_eq!(compare(&s("abc"), &s("ab")), 1);
        assert_eq!(compare(&s("10"), &s("9")), 1);
        assert_eq!(compare(&s("10"), &s("9a")), -1);
    }

    #[test]
    fn test_arrays() {
        let a = Val::array(ArrayData::from_values(vec![Val::Int(1), Val::Int(2)]));
        let b = Val::array(ArrayData::from_values(vec![Val::Int(1), Val::Int(3)]));
        let c = Val::array(ArrayData::from_values(vec![Val::Int(1)]));
        assert_eq!(compare(&a, &b), -1);
        assert_eq!(compare(&a, &c), 1);
        assert_eq!(compare(&a, &Val::Int(100)), 1);
        assert!(loose_equals(&a, &a.clone()));
    }

    #[test]
    fn test_identical() {
        assert!(identical(&Val::Int(1), &Val::Int(1)));
        assert!(!identical(&Val::Int(1), &Val::Float(1.0)));
    }
}
