mod common;

use common::s;
use php_zval::core::value::Val;
use php_zval::vm::comparison::{compare, identical, loose_equals};
use php_zval::vm::error::CollectingErrorHandler;
use php_zval::vm::inc_dec::{decrement_value, increment_alphanumeric, increment_value};
use php_zval::vm::type_conversion::{
    Number, NumericKind, float_to_int, format_float, parse_int_literal, to_int, to_number,
    to_php_string,
};

#[test]
fn test_int_literal_boundaries() {
    assert_eq!(parse_int_literal("4294967295"), Some(Number::Int(4294967295)));
    assert_eq!(
        parse_int_literal("9223372036854775807"),
        Some(Number::Int(i64::MAX))
    );
    assert!(matches!(
        parse_int_literal("9223372036854775808"),
        Some(Number::Float(_))
    ));
    assert!(matches!(
        parse_int_literal("0x10000000000000000"),
        Some(Number::Float(f)) if f == 18446744073709551616.0
    ));
    assert_eq!(parse_int_literal("0x7FFFFFFFFFFFFFFF"), Some(Number::Int(i64::MAX)));
}

#[test]
fn test_int_literal_radixes() {
    assert_eq!(parse_int_literal("0x1F"), Some(Number::Int(31)));
    assert_eq!(parse_int_literal("0b101"), Some(Number::Int(5)));
    assert_eq!(parse_int_literal("0o17"), Some(Number::Int(15)));
    assert_eq!(parse_int_literal("017"), Some(Number::Int(15)));
    assert_eq!(parse_int_literal("1_000_000"), Some(Number::Int(1_000_000)));
    assert_eq!(parse_int_literal("0"), Some(Number::Int(0)));
    assert_eq!(parse_int_literal("09"), None);
    assert_eq!(parse_int_literal("0x"), None);
}

#[test]
fn test_numeric_string_kinds() {
    assert_eq!(to_number(b" 42"), (Number::Int(42), NumericKind::Numeric));
    assert_eq!(to_number(b"42abc"), (Number::Int(42), NumericKind::LeadingNumeric));
    assert_eq!(to_number(b"1e3"), (Number::Float(1000.0), NumericKind::Numeric));
    assert_eq!(to_number(b"abc").1, NumericKind::NonNumeric);
    assert_eq!(to_number(b"").1, NumericKind::NonNumeric);
    assert_eq!(to_number(b".").1, NumericKind::NonNumeric);
}

#[test]
fn test_string_increment_sequences() {
    let cases = [
        ("asdasd", "asdase"),
        ("0as0dasd0", "0as0dasd1"),
        ("Az", "Ba"),
        ("zz", "aaa"),
        ("Zz", "AAa"),
        ("a9", "b0"),
        ("9z", "10a"),
    ];
    for (input, expected) in cases {
        assert_eq!(
            increment_alphanumeric(input.as_bytes()),
            expected.as_bytes(),
            "increment of {:?}",
            input
        );
    }
}

#[test]
fn test_increment_values() {
    let mut errors = CollectingErrorHandler::new();
    assert_eq!(increment_value(Val::Null, &mut errors).unwrap(), Val::Int(1));
    assert_eq!(increment_value(s(""), &mut errors).unwrap(), s("1"));
    assert_eq!(increment_value(s("41"), &mut errors).unwrap(), Val::Int(42));
    assert_eq!(increment_value(s("1.5"), &mut errors).unwrap(), Val::Float(2.5));
    assert_eq!(
        increment_value(Val::Int(i64::MAX), &mut errors).unwrap(),
        Val::Float(9223372036854775808.0)
    );
    assert!(errors.is_empty());

    assert_eq!(increment_value(s("a"), &mut errors).unwrap(), s("b"));
    assert_eq!(
        errors.messages(),
        vec!["Increment on non-numeric string is deprecated, use str_increment() instead"]
    );
    assert!(increment_value(Val::empty_array(), &mut errors).is_err());
}

#[test]
fn test_decrement_values() {
    let mut errors = CollectingErrorHandler::new();
    assert_eq!(decrement_value(Val::Int(0), &mut errors).unwrap(), Val::Int(-1));
    assert_eq!(
        decrement_value(Val::Int(i64::MIN), &mut errors).unwrap(),
        Val::Float(-9223372036854775808.0)
    );
    assert_eq!(decrement_value(s("10"), &mut errors).unwrap(), Val::Int(9));
    assert!(errors.is_empty());

    assert_eq!(decrement_value(Val::Null, &mut errors).unwrap(), Val::Null);
    assert_eq!(decrement_value(s("abc"), &mut errors).unwrap(), s("abc"));
    assert_eq!(errors.messages().len(), 2);
}

#[test]
fn test_float_to_int_conversions() {
    assert_eq!(float_to_int(3.99), 3);
    assert_eq!(float_to_int(-3.99), -3);
    assert_eq!(float_to_int(f64::NAN), 0);
    assert_eq!(float_to_int(f64::INFINITY), 0);
    assert_eq!(to_int(&s("12abc")), 12);
    assert_eq!(to_int(&Val::Bool(true)), 1);
}

#[test]
fn test_float_rendering() {
    assert_eq!(format_float(0.1 + 0.2, -1, b'E'), "0.30000000000000004");
    assert_eq!(format_float(0.1 + 0.2, 14, b'E'), "0.3");
    assert_eq!(format_float(-0.0, -1, b'E'), "-0");
    assert_eq!(format_float(1.5e-7, -1, b'E'), "1.5E-7");
    assert_eq!(to_php_string(&Val::Float(2.0), 14), b"2");
    assert_eq!(to_php_string(&Val::Bool(false), 14), b"");
}

#[test]
fn test_loose_comparison_table() {
    assert!(loose_equals(&s("1"), &s("01")));
    assert!(loose_equals(&s("10"), &s("1e1")));
    assert!(loose_equals(&Val::Int(100), &s("1e2")));
    assert!(!loose_equals(&Val::Int(0), &s("abc")));
    assert!(loose_equals(&Val::Null, &Val::Bool(false)));
    assert!(loose_equals(&Val::empty_array(), &Val::Bool(false)));
    assert!(!loose_equals(&s("abc"), &s("ABC")));
    assert!(!identical(&Val::Int(1), &Val::Float(1.0)));
}

#[test]
fn test_spaceship() {
    assert_eq!(compare(&Val::Int(1), &Val::Int(2)), -1);
    assert_eq!(compare(&s("abc"), &s("abd")), -1);
    assert_eq!(compare(&s("10"), &s("9")), 1);
    assert_eq!(compare(&Val::Float(1.5), &Val::Int(1)), 1);
    assert_eq!(compare(&Val::Null, &s("")), 0);
}
