//! Errors, diagnostics and output sinks
//!
//! Two channels leave the runtime:
//!
//! - **Hard errors** ([`VmError`]) abort the current operation and travel up
//!   through `Result`. Thrown PHP exceptions ride along as
//!   [`VmError::Exception`].
//! - **Diagnostics** (notices, warnings, deprecations) never interrupt
//!   execution. They are handed to an [`ErrorHandler`] and the operation
//!   carries on with PHP's fallback value.
//!
//! Script output (`echo`, `var_dump`, `print_r`) goes through [`OutputWriter`].
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_errors.h` - E_* constants
//! - Zend: `$PHP_SRC_PATH/main/main.c` - php_error_cb

use crate::builtins::exception::PhpException;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

#[derive(Debug)]
pub enum VmError {
    /// Reading a variable that is not bound, where PHP would throw
    UndefinedVariable { name: String },
    /// Array or object used as an array key
    IllegalOffset { type_name: &'static str },
    /// Host-side failure (output sink, broken container invariant)
    RuntimeError(String),
    /// Thrown PHP exception (`Error`, `TypeError`, `ValueError`, ...)
    Exception(PhpException),
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VmError::UndefinedVariable { name } => write!(f, "Undefined variable ${}", name),
            VmError::IllegalOffset { type_name } => write!(f, "Cannot access offset of type {} on array", type_name),
            VmError::RuntimeError(msg) => f.write_str(msg),
            VmError::Exception(e) => write!(f, "Uncaught {}", e),
        }
    }
}

impl std::error::Error for VmError {}

impl From<PhpException> for VmError {
    fn from(e: PhpException) -> Self {
        VmError::Exception(e)
    }
}

/// Diagnostic severities the value model raises. Discriminants are the
/// Zend `E_*` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorLevel {
    Warning = 2,
    Notice = 8,
    Deprecated = 8192,
}

/// E_ALL as of PHP 8
pub const E_ALL: u32 = 32767;

impl ErrorLevel {
    /// Bit tested against `error_reporting`
    pub fn to_bitmask(self) -> u32 {
        self as u32
    }

    /// Prefix PHP prints in front of the message
    pub fn label(self) -> &'static str {
        match self {
            ErrorLevel::Warning => "Warning",
            ErrorLevel::Notice => "Notice",
            ErrorLevel::Deprecated => "Deprecated",
        }
    }
}

/// Sink for notices, warnings and deprecations
pub trait ErrorHandler {
    fn report(&mut self, level: ErrorLevel, message: &str);
}

/// Default error handler that writes to stderr
pub struct StderrErrorHandler {
    stderr: io::Stderr,
}

impl Default for StderrErrorHandler {
    fn default() -> Self {
        Self {
            stderr: io::stderr(),
        }
    }
}

impl ErrorHandler for StderrErrorHandler {
    fn report(&mut self, level: ErrorLevel, message: &str) {
        let _ = writeln!(self.stderr, "{}: {}", level.label(), message);
        let _ = self.stderr.flush();
    }
}

/// Forwards each diagnostic to a closure
pub struct CapturingErrorHandler<F: FnMut(ErrorLevel, &str)> {
    callback: F,
}

impl<F: FnMut(ErrorLevel, &str)> CapturingErrorHandler<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: FnMut(ErrorLevel, &str)> ErrorHandler for CapturingErrorHandler<F> {
    fn report(&mut self, level: ErrorLevel, message: &str) {
        (self.callback)(level, message);
    }
}

/// Keeps every diagnostic in order
#[derive(Debug, Default)]
pub struct CollectingErrorHandler {
    pub diagnostics: Vec<(ErrorLevel, String)>,
}

impl CollectingErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<&str> {
        self.diagnostics.iter().map(|(_, m)| m.as_str()).collect()
    }

    pub fn count(&self, level: ErrorLevel) -> usize {
        self.diagnostics.iter().filter(|(l, _)| *l == level).count()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

impl ErrorHandler for CollectingErrorHandler {
    fn report(&mut self, level: ErrorLevel, message: &str) {
        self.diagnostics.push((level, message.to_string()));
    }
}

pub trait OutputWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), VmError>;
    fn flush(&mut self) -> Result<(), VmError> {
        Ok(())
    }
}

/// Process stdout
pub struct StdoutWriter {
    stdout: io::Stdout,
}

impl Default for StdoutWriter {
    fn default() -> Self {
        Self {
            stdout: io::stdout(),
        }
    }
}

impl OutputWriter for StdoutWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        self.stdout
            .write_all(bytes)
            .map_err(|e| VmError::RuntimeError(format!("write to stdout failed: {}", e)))
    }

    fn flush(&mut self) -> Result<(), VmError> {
        self.stdout
            .flush()
            .map_err(|e| VmError::RuntimeError(format!("flush of stdout failed: {}", e)))
    }
}

/// In-memory writer whose buffer stays readable after the writer is handed off
#[derive(Debug, Clone, Default)]
pub struct BufferWriter {
    buffer: Rc<RefCell<Vec<u8>>>,
}

impl BufferWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buffer.borrow().clone()
    }

    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buffer.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.buffer.borrow_mut().clear();
    }
}

impl OutputWriter for BufferWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        self.buffer.borrow_mut().extend_from_slice(bytes);
        Ok(())
    }
}
