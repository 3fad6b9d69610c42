//! Dimension access (`$c[$k]`) on arbitrary containers
//!
//! Dispatches subscript reads, writes and unsets on whatever value sits in the
//! container slot, following Zend engine semantics:
//!
//! - arrays use normalized keys; reading a missing key warns and yields null
//! - strings use byte offsets (see [`string_ops`](crate::vm::string_ops))
//! - null (and, deprecated, false) autovivify into an empty array on write
//! - other scalars cannot be written as arrays; reading them warns
//!
//! Reference: $PHP_SRC_PATH/Zend/zend_execute.c - zend_fetch_dimension_address_*

use crate::builtins::exception::PhpException;
use crate::core::array::ArrayData;
use crate::core::array_key::{ArrayKey, KeyError, normalize_key};
use crate::core::value::{Val, Zval};
use crate::vm::error::{ErrorHandler, ErrorLevel, VmError};
use crate::vm::string_ops;
use crate::vm::type_conversion::{float_is_integral, format_float};

fn throw(class: &str, message: String) -> VmError {
    VmError::Exception(PhpException::with_class(class, message))
}

fn undefined_key_message(key: &ArrayKey) -> String {
    match key {
        ArrayKey::Int(i) => format!("Undefined array key {}", i),
        ArrayKey::Str(s) => format!("Undefined array key \"{}\"", String::from_utf8_lossy(s)),
    }
}

/// Normalize a subscript, warning about lossy float keys
/// Reference: $PHP_SRC_PATH/Zend/zend_execute.c - zend_fetch_dimension_address_inner
pub fn array_key(dim: &Val, errors: &mut dyn ErrorHandler) -> Result<ArrayKey, VmError> {
    if let Val::Float(f) = dim {
        if !float_is_integral(*f) {
            errors.report(
                ErrorLevel::Deprecated,
                &format!(
                    "Implicit conversion from float {} to int loses precision",
                    format_float(*f, -1, b'E')
                ),
            );
        }
    }
    normalize_key(dim).map_err(|e| match e {
        KeyError::IllegalOffsetType(type_name) => VmError::IllegalOffset { type_name },
    })
}

/// Read `$container[$dim]`
pub fn fetch_dim(container: &Val, dim: &Val, errors: &mut dyn ErrorHandler) -> Result<Val, VmError> {
    match container {
        Val::Array(arr) => {
            let key = array_key(dim, errors)?;
            match arr.get(&key) {
                Some(v) => Ok(v),
                None => {
                    errors.report(ErrorLevel::Warning, &undefined_key_message(&key));
                    Ok(Val::Null)
                }
            }
        }
        Val::String(s) => string_ops::fetch_offset(s, dim, errors),
        Val::Object(obj) => Err(throw(
            "Error",
            format!("Cannot use object of type {} as array", obj.class_name()),
        )),
        other => {
            errors.report(
                ErrorLevel::Warning,
                &format!(
                    "Trying to access array offset on value of type {}",
                    other.type_name()
                ),
            );
            Ok(Val::Null)
        }
    }
}

/// `isset($container[$dim])`: silent, null elements count as unset
pub fn isset_dim(container: &Val, dim: &Val) -> bool {
    match container {
        Val::Array(arr) => match normalize_key(dim) {
            Ok(key) => matches!(arr.get(&key), Some(v) if !v.is_null()),
            Err(_) => false,
        },
        Val::String(s) => string_ops::isset_offset(s, dim),
        _ => false,
    }
}

/// Turn a null/false container into an array before a write
fn autovivify(container: &mut Val, errors: &mut dyn ErrorHandler) -> Result<(), VmError> {
    match container {
        Val::Null => {
            *container = Val::empty_array();
            Ok(())
        }
        Val::Bool(false) => {
            errors.report(
                ErrorLevel::Deprecated,
                "Automatic conversion of false to array is deprecated",
            );
            *container = Val::empty_array();
            Ok(())
        }
        Val::Array(_) | Val::String(_) => Ok(()),
        Val::Object(obj) => Err(throw(
            "Error",
            format!("Cannot use object of type {} as array", obj.class_name()),
        )),
        _ => Err(throw(
            "Error",
            "Cannot use a scalar value as an array".to_string(),
        )),
    }
}

fn next_element_occupied() -> VmError {
    throw(
        "Error",
        "Cannot add element to the array as the next element is already occupied".to_string(),
    )
}

/// `$container[$dim] = $value`, or `$container[] = $value` when `dim` is `None`
pub fn assign_dim(
    container: &mut Val,
    dim: Option<&Val>,
    value: Val,
    pad: u8,
    errors: &mut dyn ErrorHandler,
) -> Result<(), VmError> {
    autovivify(container, errors)?;
    if let Val::String(_) = container {
        let Some(dim) = dim else {
            return Err(throw("Error", "[] operator not supported for strings".to_string()));
        };
        if let Some(buf) = container.bytes_mut() {
            string_ops::assign_offset_val(buf, dim, &value, pad, errors)?;
        }
        return Ok(());
    }

    let key = match dim {
        Some(d) => Some(array_key(d, errors)?),
        None => None,
    };
    let arr = array_of(container)?;
    match key {
        Some(key) => arr.set(key, value),
        None => {
            if arr.append(value).is_none() {
                return Err(next_element_occupied());
            }
        }
    }
    Ok(())
}

fn array_of(container: &mut Val) -> Result<&mut ArrayData, VmError> {
    container
        .array_mut()
        .ok_or_else(|| VmError::RuntimeError("container is not an array".into()))
}

/// Fetch the element slot for writing (`$container[$dim][...] = ...`,
/// `&$container[$dim]`), creating a null element when missing
pub fn dim_slot_mut<'a>(
    container: &'a mut Val,
    dim: Option<&Val>,
    errors: &mut dyn ErrorHandler,
) -> Result<&'a mut Zval, VmError> {
    autovivify(container, errors)?;
    if matches!(container, Val::String(_)) {
        return Err(throw(
            "Error",
            "Cannot use string offset as an array".to_string(),
        ));
    }
    let key = match dim {
        Some(d) => array_key(d, errors)?,
        None => {
            let arr = array_of(container)?;
            arr.append(Val::Null).ok_or_else(next_element_occupied)?
        }
    };
    Ok(array_of(container)?.entry_slot(key))
}

/// `$container[$dim] = &$cell`: rebind the element to a reference
pub fn assign_dim_ref(
    container: &mut Val,
    dim: Option<&Val>,
    slot: Zval,
    errors: &mut dyn ErrorHandler,
) -> Result<(), VmError> {
    autovivify(container, errors)?;
    if matches!(container, Val::String(_)) {
        return Err(throw(
            "Error",
            "Cannot create references to/from string offsets".to_string(),
        ));
    }
    let key = match dim {
        Some(d) => Some(array_key(d, errors)?),
        None => None,
    };
    let arr = array_of(container)?;
    match key {
        Some(key) => arr.set_slot(key, slot),
        None => {
            arr.append_slot(slot).ok_or_else(next_element_occupied)?;
        }
    }
    Ok(())
}

/// `unset($container[$dim])`
pub fn unset_dim(container: &mut Val, dim: &Val, errors: &mut dyn ErrorHandler) -> Result<(), VmError> {
    if let Val::Object(obj) = container {
        return Err(throw(
            "Error",
            format!("Cannot use object of type {} as array", obj.class_name()),
        ));
    }
    if let Val::String(_) = container {
        return Err(throw("Error", "Cannot unset string offsets".to_string()));
    }
    let key = array_key(dim, errors)?;
    // unset on null and scalars is silently ignored
    if let Some(arr) = container.array_mut() {
        arr.unset(&key);
    }
    Ok(())
}
