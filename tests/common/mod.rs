//! Common test helpers for php-zval integration tests
//!
//! Builds runtime states whose output and diagnostics are captured, plus
//! small constructors for arrays so tests read like the PHP they mirror.

#![allow(dead_code)]

use php_zval::core::array::ArrayData;
use php_zval::core::array_key::ArrayKey;
use php_zval::core::value::Val;
use php_zval::runtime::context::{RuntimeBuilder, RuntimeState};
use php_zval::vm::error::{BufferWriter, CapturingErrorHandler, ErrorLevel};
use std::cell::RefCell;
use std::rc::Rc;

pub type Diagnostics = Rc<RefCell<Vec<(ErrorLevel, String)>>>;

/// A runtime whose echo output and diagnostics are kept for inspection
pub fn test_state() -> (RuntimeState, BufferWriter, Diagnostics) {
    let output = BufferWriter::new();
    let seen: Diagnostics = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let state = RuntimeBuilder::new()
        .output(output.clone())
        .error_handler(CapturingErrorHandler::new(move |level, msg: &str| {
            sink.borrow_mut().push((level, msg.to_string()))
        }))
        .build();
    (state, output, seen)
}

pub fn messages(diagnostics: &Diagnostics) -> Vec<String> {
    diagnostics.borrow().iter().map(|(_, m)| m.clone()).collect()
}

pub fn s(text: &str) -> Val {
    Val::from(text)
}

/// `[v0, v1, ...]`
pub fn list(values: Vec<Val>) -> Val {
    Val::array(ArrayData::from_values(values))
}

/// `[k0 => v0, ...]` in the given order
pub fn map(entries: Vec<(ArrayKey, Val)>) -> Val {
    Val::array(entries.into_iter().collect())
}

pub fn ik(i: i64) -> ArrayKey {
    ArrayKey::Int(i)
}

pub fn sk(key: &str) -> ArrayKey {
    ArrayKey::from(key)
}

pub fn keys_of(v: &Val) -> Vec<ArrayKey> {
    v.as_array()
        .map(|a| a.keys().cloned().collect())
        .unwrap_or_default()
}

pub fn values_of(v: &Val) -> Vec<Val> {
    v.as_array()
        .map(|a| a.values().collect())
        .unwrap_or_default()
}
