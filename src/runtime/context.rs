//! Runtime configuration and process-wide state
//!
//! Everything a script can observe globally lives in one [`RuntimeState`]
//! value that the embedder owns and passes around explicitly: the global
//! symbol table, function static locals, ini settings, the diagnostic sink,
//! the output writer and the JSON/PCRE error slots. The value-model types
//! (`Val`, `ArrayData`) hold no global state of their own.
//!
//! # Example
//! ```ignore
//! let mut state = RuntimeBuilder::new()
//!     .precision(17)
//!     .error_handler(CollectingErrorHandler::new())
//!     .build();
//! ```

use crate::builtins::json::JsonError;
use crate::builtins::pcre::Pattern;
use crate::core::value::{Handle, Reference, Val};
use crate::vm::error::{
    E_ALL, ErrorHandler, ErrorLevel, OutputWriter, StderrErrorHandler, StdoutWriter, VmError,
};
use crate::vm::variable_ops::SymbolTable;
use std::collections::HashMap;
use std::rc::Rc;

/// ini settings the value model depends on
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// `precision`: significant digits for float to string conversion
    pub precision: i32,
    /// `serialize_precision`: `-1` selects the shortest round-trip form
    pub serialize_precision: i32,
    pub error_reporting: u32,
    /// Byte used to fill the gap when writing past the end of a string
    pub offset_pad_byte: u8,
    pub json_max_depth: usize,
    /// `unserialize_max_depth`: nesting limit for arrays and objects, 0 selects the default
    pub unserialize_max_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            precision: 14,
            serialize_precision: -1,
            error_reporting: E_ALL,
            offset_pad_byte: b'\0',
            json_max_depth: 512,
            unserialize_max_depth: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub level: ErrorLevel,
    pub message: String,
}

/// Diagnostic sink honoring `error_reporting`
pub struct Diagnostics {
    handler: Box<dyn ErrorHandler>,
    pub error_reporting: u32,
    pub last_error: Option<ErrorInfo>,
}

impl Diagnostics {
    pub fn new(handler: Box<dyn ErrorHandler>, error_reporting: u32) -> Self {
        Self {
            handler,
            error_reporting,
            last_error: None,
        }
    }
}

impl ErrorHandler for Diagnostics {
    /// Reference: $PHP_SRC_PATH/main/main.c - php_error_cb
    fn report(&mut self, level: ErrorLevel, message: &str) {
        // error_get_last() sees diagnostics even when they are not displayed
        self.last_error = Some(ErrorInfo {
            level,
            message: message.to_string(),
        });
        if self.error_reporting & level.to_bitmask() != 0 {
            self.handler.report(level, message);
        }
    }
}

pub struct RuntimeState {
    pub config: RuntimeConfig,
    pub globals: SymbolTable,
    /// `static $x` cells keyed by function name and variable name
    statics: HashMap<(Rc<str>, Vec<u8>), Reference>,
    pub diagnostics: Diagnostics,
    pub output: Box<dyn OutputWriter>,
    next_object_id: u32,
    pub json_last_error: JsonError,
    /// preg_last_error() code
    pub preg_last_error: i64,
    /// Compiled patterns keyed by their source bytes
    pub(crate) pcre_cache: HashMap<Vec<u8>, Rc<Pattern>>,
}

impl RuntimeState {
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    /// Report a diagnostic through the `error_reporting` filter
    pub fn report(&mut self, level: ErrorLevel, message: &str) {
        self.diagnostics.report(level, message);
    }

    pub fn warning(&mut self, message: &str) {
        self.report(ErrorLevel::Warning, message);
    }

    pub fn notice(&mut self, message: &str) {
        self.report(ErrorLevel::Notice, message);
    }

    pub fn deprecated(&mut self, message: &str) {
        self.report(ErrorLevel::Deprecated, message);
    }

    /// error_get_last()
    pub fn error_get_last(&self) -> Option<&ErrorInfo> {
        self.diagnostics.last_error.as_ref()
    }

    /// error_clear_last()
    pub fn error_clear_last(&mut self) {
        self.diagnostics.last_error = None;
    }

    /// Write script output (`echo`)
    pub fn echo(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        self.output.write(bytes)
    }

    /// Allocate the next object id (`spl_object_id`)
    pub fn next_object_id(&mut self) -> Handle {
        self.next_object_id += 1;
        Handle(self.next_object_id)
    }

    /// Cell behind `static $name = init;` inside `func`. The initializer only
    /// runs on first use; later calls see the value left by the previous call.
    pub fn static_var(&mut self, func: &str, name: &[u8], init: impl FnOnce() -> Val) -> Reference {
        self.statics
            .entry((Rc::from(func), name.to_vec()))
            .or_insert_with(|| Reference::new(init()))
            .clone()
    }

    /// Global table and diagnostic sink borrowed together, for operations
    /// that mutate globals while reporting
    pub fn globals_mut(&mut self) -> (&mut SymbolTable, &mut Diagnostics) {
        (&mut self.globals, &mut self.diagnostics)
    }

    /// ini_get()
    /// Reference: $PHP_SRC_PATH/main/main.c - PHP_INI_BEGIN
    pub fn ini_get(&self, name: &str) -> Option<String> {
        match name {
            "precision" => Some(self.config.precision.to_string()),
            "serialize_precision" => Some(self.config.serialize_precision.to_string()),
            "error_reporting" => Some(self.diagnostics.error_reporting.to_string()),
            "unserialize_max_depth" => Some(self.config.unserialize_max_depth.to_string()),
            _ => None,
        }
    }

    /// ini_set(): returns the previous value, or `None` for unknown settings
    /// and values that do not parse
    pub fn ini_set(&mut self, name: &str, value: &str) -> Option<String> {
        let old = self.ini_get(name)?;
        let value = value.trim();
        match name {
            "precision" => self.config.precision = value.parse().ok()?,
            "serialize_precision" => self.config.serialize_precision = value.parse().ok()?,
            "error_reporting" => {
                let level: u32 = value.parse().ok()?;
                self.config.error_reporting = level;
                self.diagnostics.error_reporting = level;
            }
            "unserialize_max_depth" => self.config.unserialize_max_depth = value.parse().ok()?,
            _ => return None,
        }
        Some(old)
    }

    /// error_reporting($level): returns the previous mask
    pub fn set_error_reporting(&mut self, level: u32) -> u32 {
        let old = self.diagnostics.error_reporting;
        self.config.error_reporting = level;
        self.diagnostics.error_reporting = level;
        old
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing a RuntimeState
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    handler: Option<Box<dyn ErrorHandler>>,
    output: Option<Box<dyn OutputWriter>>,
}

impl RuntimeBuilder {
    /// Create a builder with PHP's default ini values
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            handler: None,
            output: None,
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn precision(mut self, precision: i32) -> Self {
        self.config.precision = precision;
        self
    }

    pub fn serialize_precision(mut self, precision: i32) -> Self {
        self.config.serialize_precision = precision;
        self
    }

    pub fn error_reporting(mut self, level: u32) -> Self {
        self.config.error_reporting = level;
        self
    }

    pub fn offset_pad_byte(mut self, byte: u8) -> Self {
        self.config.offset_pad_byte = byte;
        self
    }

    pub fn json_max_depth(mut self, depth: usize) -> Self {
        self.config.json_max_depth = depth;
        self
    }

    pub fn unserialize_max_depth(mut self, depth: usize) -> Self {
        self.config.unserialize_max_depth = depth;
        self
    }

    pub fn error_handler<H: ErrorHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn output<W: OutputWriter + 'static>(mut self, output: W) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    pub fn build(self) -> RuntimeState {
        let handler = self
            .handler
            .unwrap_or_else(|| Box::new(StderrErrorHandler::default()));
        let output = self
            .output
            .unwrap_or_else(|| Box::new(StdoutWriter::default()));
        RuntimeState {
            diagnostics: Diagnostics::new(handler, self.config.error_reporting),
            config: self.config,
            globals: SymbolTable::new(),
            statics: HashMap::new(),
            output,
            next_object_id: 0,
            json_last_error: JsonError::None,
            preg_last_error: 0,
            pcre_cache: HashMap::new(),
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
