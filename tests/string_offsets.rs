mod common;

use common::s;
use php_zval::core::value::Val;
use php_zval::vm::array_access::{assign_dim, fetch_dim, isset_dim};
use php_zval::vm::error::{CollectingErrorHandler, VmError};
use php_zval::vm::string_ops::{assign_offset, isset_offset, offset_get};
use php_zval::vm::variable_ops::SymbolTable;

#[test]
fn test_negative_offset_reads() {
    let mut errors = CollectingErrorHandler::new();
    let a = s("3896");
    assert!(isset_dim(&a, &Val::Int(-1)));
    assert_eq!(fetch_dim(&a, &Val::Int(-1), &mut errors).unwrap(), s("6"));
    assert!(!isset_dim(&a, &Val::Int(-10)));
    assert!(errors.is_empty());
}

#[test]
fn test_out_of_range_read_warns() {
    let mut errors = CollectingErrorHandler::new();
    let a = s("3896");
    assert_eq!(fetch_dim(&a, &Val::Int(-10), &mut errors).unwrap(), s(""));
    assert_eq!(errors.messages(), vec!["Uninitialized string offset -10"]);
}

#[test]
fn test_write_past_end_pads_with_nul() {
    let mut errors = CollectingErrorHandler::new();
    let mut v = s("ab");
    assign_dim(&mut v, Some(&Val::Int(5)), s("z"), b'\0', &mut errors).unwrap();
    assert_eq!(v, Val::from(&b"ab\0\0\0z"[..]));
    assert!(errors.is_empty());
}

#[test]
fn test_write_past_end_pads_with_configured_byte() {
    let mut errors = CollectingErrorHandler::new();
    let mut buf = b"ab".to_vec();
    assert_eq!(assign_offset(&mut buf, 4, b"z", b' ', &mut errors), Some(b'z'));
    assert_eq!(buf, b"ab  z");
}

#[test]
fn test_empty_string_write_is_rejected() {
    let mut errors = CollectingErrorHandler::new();
    let mut v = s("");
    assign_dim(&mut v, Some(&Val::Int(3)), s(""), b'\0', &mut errors).unwrap();
    assert_eq!(v, s(""));
    assert_eq!(
        errors.messages(),
        vec!["Cannot assign an empty string to a string offset"]
    );
}

#[test]
fn test_multibyte_value_keeps_first_byte() {
    let mut errors = CollectingErrorHandler::new();
    let mut v = s("abc");
    assign_dim(&mut v, Some(&Val::Int(-1)), s("xyz"), b'\0', &mut errors).unwrap();
    assert_eq!(v, s("abx"));
    assert_eq!(
        errors.messages(),
        vec!["Only the first byte will be assigned to the string offset"]
    );
}

#[test]
fn test_negative_write_out_of_range() {
    let mut errors = CollectingErrorHandler::new();
    let mut buf = b"abc".to_vec();
    assert_eq!(assign_offset(&mut buf, -4, b"x", b'\0', &mut errors), None);
    assert_eq!(buf, b"abc");
    assert_eq!(errors.messages(), vec!["Illegal string offset -4"]);
}

#[test]
fn test_string_offset_write_does_not_leak_into_copy() {
    let mut table = SymbolTable::new();
    let mut errors = CollectingErrorHandler::new();
    table.assign(b"a", s("hello"));
    let copy = table.get(b"a").unwrap();
    table.assign(b"b", copy);
    table
        .assign_dim(b"b", Some(&Val::Int(0)), s("j"), b'\0', &mut errors)
        .unwrap();
    assert_eq!(table.get(b"a"), Some(s("hello")));
    assert_eq!(table.get(b"b"), Some(s("jello")));
}

#[test]
fn test_append_to_string_is_an_error() {
    let mut errors = CollectingErrorHandler::new();
    let mut v = s("abc");
    match assign_dim(&mut v, None, s("d"), b'\0', &mut errors) {
        Err(VmError::Exception(e)) => {
            assert_eq!(e.get_message(), "[] operator not supported for strings")
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_offset_coercions() {
    let mut errors = CollectingErrorHandler::new();
    let a = s("abc");
    assert_eq!(fetch_dim(&a, &s("1"), &mut errors).unwrap(), s("b"));
    assert!(errors.is_empty());
    assert_eq!(fetch_dim(&a, &Val::Bool(true), &mut errors).unwrap(), s("b"));
    assert_eq!(errors.messages(), vec!["String offset cast occurred"]);
    assert!(fetch_dim(&a, &s("x"), &mut errors).is_err());
}

#[test]
fn test_raw_offset_helpers() {
    assert_eq!(offset_get(b"", 0), None);
    assert_eq!(offset_get(b"a", -1), Some(b'a'));
    assert!(isset_offset(b"ab", &Val::Float(1.9)));
    assert!(!isset_offset(b"ab", &s(" 1x")));
}
