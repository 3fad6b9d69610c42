//! Array functions over `ArrayData`
//!
//! ## PHP Semantics
//!
//! - Functions that build lists (`array_values`, `array_merge`, `sort`,
//!   `array_pad`) renumber integer keys from 0 and keep string keys.
//! - Sorts are stable (PHP 8) and compare with the engine's `<=>` rules unless
//!   a flag selects numeric or string comparison.
//! - Searching (`in_array`, `array_search`, `array_keys` with a filter) uses
//!   `==` by default and `===` in strict mode.
//!
//! ## References
//!
//! - `$PHP_SRC_PATH/ext/standard/array.c`

use crate::builtins::exception::PhpException;
use crate::core::array::ArrayData;
use crate::core::array_key::{ArrayKey, normalize_key};
use crate::core::value::Val;
use crate::vm::comparison::{binary_strcmp, compare, identical, loose_equals};
use crate::vm::error::VmError;
use crate::vm::type_conversion::{Number, to_numeric, to_php_string};
use std::cmp::Ordering;

pub const COUNT_NORMAL: i64 = 0;
pub const COUNT_RECURSIVE: i64 = 1;

pub const SORT_REGULAR: i64 = 0;
pub const SORT_NUMERIC: i64 = 1;
pub const SORT_STRING: i64 = 2;

const MAX_PAD: i64 = 1_048_576;

fn type_error(message: String) -> VmError {
    VmError::Exception(PhpException::with_class("TypeError", message))
}

fn value_error(message: &str) -> VmError {
    VmError::Exception(PhpException::with_class("ValueError", message))
}

fn count_recursive(arr: &ArrayData) -> i64 {
    let mut total = arr.len() as i64;
    for value in arr.values() {
        if let Val::Array(inner) = value {
            total += count_recursive(&inner);
        }
    }
    total
}

/// count(Countable|array $value, int $mode = COUNT_NORMAL): int
pub fn count(value: &Val, mode: i64) -> Result<i64, VmError> {
    match value {
        Val::Array(arr) if mode == COUNT_RECURSIVE => Ok(count_recursive(arr)),
        Val::Array(arr) => Ok(arr.len() as i64),
        other => Err(type_error(format!(
            "count(): Argument #1 ($value) must be of type Countable|array, {} given",
            other.type_name()
        ))),
    }
}

/// array_key_exists(mixed $key, array $array): bool
pub fn array_key_exists(key: &Val, arr: &ArrayData) -> Result<bool, VmError> {
    match normalize_key(key) {
        Ok(k) => Ok(arr.contains_key(&k)),
        Err(_) => Err(type_error(format!(
            "Illegal offset type for array_key_exists(): {}",
            key.type_name()
        ))),
    }
}

pub fn array_key_first(arr: &ArrayData) -> Val {
    arr.first_key().map_or(Val::Null, ArrayKey::to_val)
}

pub fn array_key_last(arr: &ArrayData) -> Val {
    arr.last_key().map_or(Val::Null, ArrayKey::to_val)
}

fn matches(needle: &Val, candidate: &Val, strict: bool) -> bool {
    if strict {
        identical(needle, candidate)
    } else {
        loose_equals(needle, candidate)
    }
}

/// array_keys(array $array, mixed $filter_value, bool $strict = false): array
pub fn array_keys(arr: &ArrayData, filter: Option<&Val>, strict: bool) -> ArrayData {
    let mut out = ArrayData::with_capacity(arr.len());
    for (key, value) in arr.iter() {
        if filter.is_none_or(|needle| matches(needle, &value, strict)) {
            out.push(key.to_val());
        }
    }
    out
}

/// array_values(array $array): array
pub fn array_values(arr: &ArrayData) -> ArrayData {
    ArrayData::from_values(arr.values())
}

/// array_push(array &$array, mixed ...$values): int
pub fn array_push(arr: &mut ArrayData, values: &[Val]) -> Result<i64, VmError> {
    for value in values {
        if arr.append(value.clone()).is_none() {
            return Err(VmError::Exception(PhpException::with_class(
                "Error",
                "Cannot add element to the array as the next element is already occupied",
            )));
        }
    }
    Ok(arr.len() as i64)
}

/// array_pop(array &$array): mixed
pub fn array_pop(arr: &mut ArrayData) -> Val {
    arr.pop_last().map_or(Val::Null, |(_, slot)| slot.value())
}

/// array_shift(array &$array): mixed. Integer keys are renumbered.
pub fn array_shift(arr: &mut ArrayData) -> Val {
    let Some((_, slot)) = arr.shift() else {
        return Val::Null;
    };
    *arr = arr.renumber();
    slot.value()
}

/// array_pad(array $array, int $length, mixed $value): array
///
/// Returns the input untouched when `|length|` does not exceed its size.
/// Otherwise the result is renumbered and padded at the end (positive
/// `length`) or the front (negative `length`).
pub fn array_pad(arr: &ArrayData, length: i64, value: &Val) -> Result<ArrayData, VmError> {
    let input_len = arr.len() as i64;
    let target = length.unsigned_abs().min(i64::MAX as u64) as i64;
    if target <= input_len {
        return Ok(arr.clone());
    }
    if target - input_len > MAX_PAD {
        return Err(value_error(
            "array_pad(): Argument #2 ($length) must be less than or equal to 1048576",
        ));
    }

    let padding = (target - input_len) as usize;
    let mut out = ArrayData::with_capacity(target as usize);
    if length < 0 {
        for _ in 0..padding {
            out.push(value.clone());
        }
    }
    for (key, slot) in arr.slots() {
        match key {
            ArrayKey::Int(_) => {
                let _ = out.append_slot(slot.clone());
            }
            ArrayKey::Str(_) => out.set_slot(key.clone(), slot.clone()),
        }
    }
    if length > 0 {
        for _ in 0..padding {
            out.push(value.clone());
        }
    }
    Ok(out)
}

/// array_merge(array ...$arrays): array
pub fn array_merge(arrays: &[&ArrayData]) -> ArrayData {
    let mut out = ArrayData::new();
    for arr in arrays {
        for (key, value) in arr.iter() {
            match key {
                ArrayKey::Int(_) => out.push(value),
                ArrayKey::Str(_) => out.set(key.clone(), value),
            }
        }
    }
    out
}

/// `$a + $b`
pub fn array_plus(left: &ArrayData, right: &ArrayData) -> ArrayData {
    left.plus(right)
}

/// in_array(mixed $needle, array $haystack, bool $strict = false): bool
pub fn in_array(needle: &Val, haystack: &ArrayData, strict: bool) -> bool {
    haystack.values().any(|v| matches(needle, &v, strict))
}

/// array_search(mixed $needle, array $haystack, bool $strict = false): int|string|false
pub fn array_search(needle: &Val, haystack: &ArrayData, strict: bool) -> Val {
    haystack
        .iter()
        .find(|(_, v)| matches(needle, v, strict))
        .map_or(Val::Bool(false), |(k, _)| k.to_val())
}

/// array_is_list(array $array): bool
pub fn array_is_list(arr: &ArrayData) -> bool {
    arr.is_list()
}

/// Value comparison selected by a SORT_* flag
/// Reference: $PHP_SRC_PATH/ext/standard/array.c - php_get_data_compare_func
fn compare_by_flag(a: &Val, b: &Val, flags: i64) -> Ordering {
    match flags & !8 {
        SORT_NUMERIC => {
            let (x, y) = (to_numeric(a), to_numeric(b));
            match (x, y) {
                (Number::Int(i), Number::Int(j)) => i.cmp(&j),
                _ => x.to_float().partial_cmp(&y.to_float()).unwrap_or(Ordering::Equal),
            }
        }
        SORT_STRING => binary_strcmp(&to_php_string(a, 14), &to_php_string(b, 14)).cmp(&0),
        _ => compare(a, b).cmp(&0),
    }
}

fn sort_values(arr: &mut ArrayData, flags: i64, reverse: bool) {
    arr.sort_by(|(_, x), (_, y)| {
        let ord = compare_by_flag(&x.value(), &y.value(), flags);
        if reverse { ord.reverse() } else { ord }
    });
}

fn sort_keys(arr: &mut ArrayData, flags: i64, reverse: bool) {
    arr.sort_by(|(k1, _), (k2, _)| {
        let ord = compare_by_flag(&k1.to_val(), &k2.to_val(), flags);
        if reverse { ord.reverse() } else { ord }
    });
}

/// sort(array &$array, int $flags = SORT_REGULAR): true
pub fn sort(arr: &mut ArrayData, flags: i64) {
    sort_values(arr, flags, false);
    *arr = array_values(arr);
}

/// rsort(array &$array, int $flags = SORT_REGULAR): true
pub fn rsort(arr: &mut ArrayData, flags: i64) {
    sort_values(arr, flags, true);
    *arr = array_values(arr);
}

/// asort(): sort by value, keeping keys
pub fn asort(arr: &mut ArrayData, flags: i64) {
    sort_values(arr, flags, false);
}

/// arsort(): reverse sort by value, keeping keys
pub fn arsort(arr: &mut ArrayData, flags: i64) {
    sort_values(arr, flags, true);
}

/// ksort(): sort by key
pub fn ksort(arr: &mut ArrayData, flags: i64) {
    sort_keys(arr, flags, false);
}

/// krsort(): reverse sort by key
pub fn krsort(arr: &mut ArrayData, flags: i64) {
    sort_keys(arr, flags, true);
}

/// usort(array &$array, callable $callback): true
///
/// `callback` returns the user comparator's integer result.
pub fn usort<F>(arr: &mut ArrayData, mut callback: F)
where
    F: FnMut(&Val, &Val) -> i64,
{
    arr.sort_by(|(_, x), (_, y)| callback(&x.value(), &y.value()).cmp(&0));
    *arr = array_values(arr);
}

/// uasort(): user comparator over values, keeping keys
pub fn uasort<F>(arr: &mut ArrayData, mut callback: F)
where
    F: FnMut(&Val, &Val) -> i64,
{
    arr.sort_by(|(_, x), (_, y)| callback(&x.value(), &y.value()).cmp(&0));
}

/// uksort(): user comparator over keys
pub fn uksort<F>(arr: &mut ArrayData, mut callback: F)
where
    F: FnMut(&Val, &Val) -> i64,
{
    arr.sort_by(|(k1, _), (k2, _)| callback(&k1.to_val(), &k2.to_val()).cmp(&0));
}
