//! Exception values
//!
//! A thrown PHP exception travelling through Rust code. It keeps the fields
//! `Exception::__construct` stores (`message`, `code`, `previous`) together with
//! the throw location, and can be materialized as an object value when a
//! script catches it.
//!
//! Reference: $PHP_SRC_PATH/Zend/zend_exceptions.c

use crate::core::array::ArrayData;
use crate::core::array_key::ArrayKey;
use crate::core::value::{Handle, ObjectRef, Val};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct PhpException {
    pub class: Rc<str>,
    pub message: String,
    pub code: i64,
    pub file: String,
    pub line: u32,
    pub previous: Option<Box<PhpException>>,
}

impl PhpException {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_class("Exception", message)
    }

    pub fn with_class(class: &str, message: impl Into<String>) -> Self {
        Self {
            class: Rc::from(class),
            message: message.into(),
            code: 0,
            file: String::new(),
            line: 0,
            previous: None,
        }
    }

    pub fn code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = file.into();
        self.line = line;
        self
    }

    pub fn previous(mut self, previous: PhpException) -> Self {
        self.previous = Some(Box::new(previous));
        self
    }

    /// Exception::getMessage()
    pub fn get_message(&self) -> &str {
        &self.message
    }

    /// Exception::getCode()
    pub fn get_code(&self) -> i64 {
        self.code
    }

    /// Exception::getFile()
    pub fn get_file(&self) -> &str {
        &self.file
    }

    /// Exception::getLine()
    pub fn get_line(&self) -> u32 {
        self.line
    }

    /// Exception::getPrevious()
    pub fn get_previous(&self) -> Option<&PhpException> {
        self.previous.as_deref()
    }

    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// Build the object a `catch` block would see. `next_id` hands out object
    /// ids for this exception and its `previous` chain.
    pub fn to_object(&self, next_id: &mut dyn FnMut() -> Handle) -> Val {
        let mut props = ArrayData::new();
        props.set(ArrayKey::from("message"), Val::from(self.message.as_str()));
        props.set(ArrayKey::from("code"), Val::Int(self.code));
        props.set(ArrayKey::from("file"), Val::from(self.file.as_str()));
        props.set(ArrayKey::from("line"), Val::Int(self.line as i64));
        let previous = match &self.previous {
            Some(prev) => prev.to_object(next_id),
            None => Val::Null,
        };
        props.set(ArrayKey::from("previous"), previous);
        Val::Object(ObjectRef::with_properties(next_id(), &self.class, props))
    }

    /// Recover an exception from an object value (the inverse of `to_object`)
    pub fn from_object(obj: &ObjectRef) -> Self {
        let data = obj.borrow();
        let props = &data.properties;
        let text = |name: &str| match props.get(&ArrayKey::from(name)) {
            Some(Val::String(s)) => String::from_utf8_lossy(&s).into_owned(),
            _ => String::new(),
        };
        let int = |name: &str| match props.get(&ArrayKey::from(name)) {
            Some(Val::Int(i)) => i,
            _ => 0,
        };
        let previous = match props.get(&ArrayKey::from("previous")) {
            Some(Val::Object(prev)) => Some(Box::new(PhpException::from_object(&prev))),
            _ => None,
        };
        PhpException {
            class: data.class.clone(),
            message: text("message"),
            code: int("code"),
            file: text("file"),
            line: int("line").clamp(0, u32::MAX as i64) as u32,
            previous,
        }
    }
}

impl fmt::Display for PhpException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)?;
        if !self.file.is_empty() {
            write!(f, " in {}:{}", self.file, self.line)?;
        }
        Ok(())
    }
}

impl std::error::Error for PhpException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.previous
            .as_deref()
            .map(|p| p as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_and_display() {
        let e = PhpException::new("boom").code(7).at("fork.php", 12);
        assert_eq!(e.get_message(), "boom");
        assert_eq!(e.get_code(), 7);
        assert_eq!(e.get_file(), "fork.php");
        assert_eq!(e.get_line(), 12);
        assert_eq!(e.to_string(), "Exception: boom in fork.php:12");
    }

    #[test]
    fn test_object_round_trip() {
        let inner = PhpException::with_class("LogicException", "inner");
        let e = PhpException::with_class("RuntimeException", "outer")
            .code(3)
            .previous(inner);
        let mut id = 0;
        let obj = e.to_object(&mut || {
            id += 1;
            Handle(id)
        });
        let Val::Object(obj) = obj else {
            panic!("expected object");
        };
        assert_eq!(&*obj.class_name(), "RuntimeException");
        assert_eq!(PhpException::from_object(&obj), e);
    }
}
