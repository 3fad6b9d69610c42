//! JSON Extension - RFC 8259 Implementation
//!
//! - json_encode() - Serialize PHP values to JSON strings
//! - json_decode() - Parse JSON strings into PHP values
//! - json_last_error() / json_last_error_msg()
//! - json_validate() - Validate JSON syntax (PHP 8.3+)
//!
//! # Architecture
//!
//! - **Encoding**: Val → JSON. Arrays whose keys are exactly `0..N-1` in
//!   order become JSON arrays, everything else becomes an object.
//! - **Decoding**: JSON → Val (recursive descent parser)
//! - **Error State**: `RuntimeState::json_last_error`, untouched when
//!   `JSON_THROW_ON_ERROR` is given
//!
//! # References
//!
//! - PHP Source: $PHP_SRC_PATH/ext/json/json.c
//! - RFC 8259: JSON Data Interchange Format
//! - Zend Encoder: $PHP_SRC_PATH/ext/json/json_encoder.c
//! - Zend Parser: $PHP_SRC_PATH/ext/json/json_parser.y

use crate::builtins::exception::PhpException;
use crate::core::array::ArrayData;
use crate::core::array_key::ArrayKey;
use crate::core::value::{Handle, ObjectRef, Val};
use crate::runtime::context::RuntimeState;
use crate::vm::error::VmError;
use crate::vm::type_conversion::{Number, format_float, to_number, is_numeric_str};
use std::collections::HashSet;

pub const JSON_HEX_TAG: i64 = 1;
pub const JSON_HEX_AMP: i64 = 2;
pub const JSON_HEX_APOS: i64 = 4;
pub const JSON_HEX_QUOT: i64 = 8;
pub const JSON_FORCE_OBJECT: i64 = 16;
pub const JSON_NUMERIC_CHECK: i64 = 32;
pub const JSON_UNESCAPED_SLASHES: i64 = 64;
pub const JSON_PRETTY_PRINT: i64 = 128;
pub const JSON_UNESCAPED_UNICODE: i64 = 256;
pub const JSON_PARTIAL_OUTPUT_ON_ERROR: i64 = 512;
pub const JSON_PRESERVE_ZERO_FRACTION: i64 = 1024;
pub const JSON_UNESCAPED_LINE_TERMINATORS: i64 = 2048;
pub const JSON_OBJECT_AS_ARRAY: i64 = 1;
pub const JSON_BIGINT_AS_STRING: i64 = 2;
pub const JSON_INVALID_UTF8_IGNORE: i64 = 1_048_576;
pub const JSON_INVALID_UTF8_SUBSTITUTE: i64 = 2_097_152;
pub const JSON_THROW_ON_ERROR: i64 = 4_194_304;

/// JSON error codes matching PHP constants
/// Reference: $PHP_SRC_PATH/ext/json/php_json.h
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonError {
    #[default]
    None = 0,
    Depth = 1,
    StateMismatch = 2,
    CtrlChar = 3,
    Syntax = 4,
    Utf8 = 5,
    Recursion = 6,
    InfOrNan = 7,
    UnsupportedType = 8,
    InvalidPropertyName = 9,
    Utf16 = 10,
}

impl JsonError {
    pub fn code(&self) -> i64 {
        *self as i64
    }

    pub fn message(&self) -> &'static str {
        match self {
            JsonError::None => "No error",
            JsonError::Depth => "Maximum stack depth exceeded",
            JsonError::StateMismatch => "State mismatch (invalid or malformed JSON)",
            JsonError::CtrlChar => "Control character error, possibly incorrectly encoded",
            JsonError::Syntax => "Syntax error",
            JsonError::Utf8 => "Malformed UTF-8 characters, possibly incorrectly encoded",
            JsonError::Recursion => "Recursion detected",
            JsonError::InfOrNan => "Inf and NaN cannot be JSON encoded",
            JsonError::UnsupportedType => "Type is not supported",
            JsonError::InvalidPropertyName => "The decoded property name is invalid",
            JsonError::Utf16 => "Single unpaired UTF-16 surrogate in unicode escape",
        }
    }

    /// The `JsonException` thrown under `JSON_THROW_ON_ERROR`
    pub fn to_exception(self) -> PhpException {
        PhpException::with_class("JsonException", self.message()).code(self.code())
    }
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for JsonError {}

/// JSON encoding options (bitwise flags)
/// Reference: $PHP_SRC_PATH/ext/json/php_json.h
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEncodeOptions {
    pub hex_tag: bool,
    pub hex_amp: bool,
    pub hex_apos: bool,
    pub hex_quot: bool,
    pub force_object: bool,
    pub numeric_check: bool,
    pub unescaped_slashes: bool,
    pub pretty_print: bool,
    pub unescaped_unicode: bool,
    pub partial_output_on_error: bool,
    pub preserve_zero_fraction: bool,
    pub unescaped_line_terminators: bool,
    pub throw_on_error: bool,
}

impl JsonEncodeOptions {
    pub fn from_flags(flags: i64) -> Self {
        Self {
            hex_tag: flags & JSON_HEX_TAG != 0,
            hex_amp: flags & JSON_HEX_AMP != 0,
            hex_apos: flags & JSON_HEX_APOS != 0,
            hex_quot: flags & JSON_HEX_QUOT != 0,
            force_object: flags & JSON_FORCE_OBJECT != 0,
            numeric_check: flags & JSON_NUMERIC_CHECK != 0,
            unescaped_slashes: flags & JSON_UNESCAPED_SLASHES != 0,
            pretty_print: flags & JSON_PRETTY_PRINT != 0,
            unescaped_unicode: flags & JSON_UNESCAPED_UNICODE != 0,
            partial_output_on_error: flags & JSON_PARTIAL_OUTPUT_ON_ERROR != 0,
            preserve_zero_fraction: flags & JSON_PRESERVE_ZERO_FRACTION != 0,
            unescaped_line_terminators: flags & JSON_UNESCAPED_LINE_TERMINATORS != 0,
            throw_on_error: flags & JSON_THROW_ON_ERROR != 0,
        }
    }
}

/// JSON decoding options (bitwise flags)
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecodeOptions {
    pub object_as_array: bool,
    pub bigint_as_string: bool,
    pub throw_on_error: bool,
    pub invalid_utf8_ignore: bool,
    pub invalid_utf8_substitute: bool,
}

impl JsonDecodeOptions {
    pub fn from_flags(flags: i64) -> Self {
        Self {
            object_as_array: flags & JSON_OBJECT_AS_ARRAY != 0,
            bigint_as_string: flags & JSON_BIGINT_AS_STRING != 0,
            throw_on_error: flags & JSON_THROW_ON_ERROR != 0,
            invalid_utf8_ignore: flags & JSON_INVALID_UTF8_IGNORE != 0,
            invalid_utf8_substitute: flags & JSON_INVALID_UTF8_SUBSTITUTE != 0,
        }
    }
}

/// Encoding context with recursion tracking
/// Reference: $PHP_SRC_PATH/ext/json/json_encoder.c - php_json_encode_ex
struct Encoder {
    options: JsonEncodeOptions,
    precision: i32,
    depth: usize,
    max_depth: usize,
    visited: HashSet<Handle>,
    /// First error swallowed under `JSON_PARTIAL_OUTPUT_ON_ERROR`
    partial_error: Option<JsonError>,
}

impl Encoder {
    fn fail(&mut self, err: JsonError, substitute: &str, out: &mut String) -> Result<(), JsonError> {
        if self.options.partial_output_on_error {
            self.partial_error.get_or_insert(err);
            out.push_str(substitute);
            Ok(())
        } else {
            Err(err)
        }
    }

    fn newline(&self, out: &mut String) {
        if self.options.pretty_print {
            out.push('\n');
            for _ in 0..self.depth {
                out.push_str("    ");
            }
        }
    }

    fn encode(&mut self, val: &Val, out: &mut String) -> Result<(), JsonError> {
        match val {
            Val::Null => out.push_str("null"),
            Val::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Val::Int(i) => out.push_str(&i.to_string()),
            Val::Float(f) => self.encode_float(*f, out)?,
            Val::String(s) => {
                if self.options.numeric_check && is_numeric_str(s) {
                    match to_number(s).0 {
                        Number::Int(i) => out.push_str(&i.to_string()),
                        Number::Float(f) => self.encode_float(f, out)?,
                    }
                } else {
                    self.encode_string(s, out)?;
                }
            }
            Val::Array(arr) => {
                let as_list = !self.options.force_object && arr.is_list();
                self.encode_entries(arr, as_list, out)?;
            }
            Val::Object(obj) => {
                let id = obj.id();
                if !self.visited.insert(id) {
                    return self.fail(JsonError::Recursion, "null", out);
                }
                let props = obj.borrow().properties.clone();
                let result = self.encode_entries(&props, false, out);
                self.visited.remove(&id);
                result?;
            }
        }
        Ok(())
    }

    fn encode_float(&mut self, f: f64, out: &mut String) -> Result<(), JsonError> {
        if !f.is_finite() {
            return self.fail(JsonError::InfOrNan, "0", out);
        }
        let text = format_float(f, self.precision, b'e');
        out.push_str(&text);
        if self.options.preserve_zero_fraction && !text.contains(['.', 'e']) {
            out.push_str(".0");
        }
        Ok(())
    }

    /// Reference: $PHP_SRC_PATH/ext/json/json_encoder.c - php_json_escape_string
    fn encode_string(&mut self, bytes: &[u8], out: &mut String) -> Result<(), JsonError> {
        let Ok(s) = std::str::from_utf8(bytes) else {
            return self.fail(JsonError::Utf8, "null", out);
        };
        let opts = self.options;
        out.push('"');
        for ch in s.chars() {
            match ch {
                '"' if opts.hex_quot => out.push_str("\\u0022"),
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '/' if !opts.unescaped_slashes => out.push_str("\\/"),
                '\x08' => out.push_str("\\b"),
                '\x0C' => out.push_str("\\f"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                '<' if opts.hex_tag => out.push_str("\\u003C"),
                '>' if opts.hex_tag => out.push_str("\\u003E"),
                '&' if opts.hex_amp => out.push_str("\\u0026"),
                '\'' if opts.hex_apos => out.push_str("\\u0027"),
                c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
                '\u{2028}' | '\u{2029}'
                    if opts.unescaped_unicode && !opts.unescaped_line_terminators =>
                {
                    out.push_str(&format!("\\u{:04x}", ch as u32));
                }
                c if !opts.unescaped_unicode && (c as u32) > 0x7F => {
                    let mut units = [0u16; 2];
                    for unit in c.encode_utf16(&mut units) {
                        out.push_str(&format!("\\u{:04x}", unit));
                    }
                }
                c => out.push(c),
            }
        }
        out.push('"');
        Ok(())
    }

    fn encode_entries(&mut self, arr: &ArrayData, as_list: bool, out: &mut String) -> Result<(), JsonError> {
        if self.depth >= self.max_depth {
            return self.fail(JsonError::Depth, "null", out);
        }
        let (open, close) = if as_list { ('[', ']') } else { ('{', '}') };
        out.push(open);
        if arr.is_empty() {
            out.push(close);
            return Ok(());
        }

        self.depth += 1;
        for (i, (key, value)) in arr.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            self.newline(out);
            if !as_list {
                let name = key.to_bytes();
                self.encode_string(&name, out)?;
                out.push(':');
                if self.options.pretty_print {
                    out.push(' ');
                }
            }
            self.encode(&value, out)?;
        }
        self.depth -= 1;
        self.newline(out);
        out.push(close);
        Ok(())
    }
}

/// Encode without touching runtime state. Returns the text and, under
/// `JSON_PARTIAL_OUTPUT_ON_ERROR`, the error that was papered over.
pub fn encode(
    value: &Val,
    options: JsonEncodeOptions,
    max_depth: usize,
    precision: i32,
) -> Result<(String, JsonError), JsonError> {
    let mut encoder = Encoder {
        options,
        precision,
        depth: 0,
        max_depth,
        visited: HashSet::new(),
        partial_error: None,
    };
    let mut out = String::new();
    encoder.encode(value, &mut out)?;
    Ok((out, encoder.partial_error.unwrap_or_default()))
}

/// json_encode(mixed $value, int $flags = 0, int $depth = 512): string|false
///
/// Floats follow `serialize_precision`.
/// Reference: $PHP_SRC_PATH/ext/json/json.c - PHP_FUNCTION(json_encode)
pub fn json_encode(state: &mut RuntimeState, value: &Val, flags: i64, depth: usize) -> Result<Val, VmError> {
    let options = JsonEncodeOptions::from_flags(flags);
    let result = encode(value, options, depth, state.config.serialize_precision);
    match result {
        Ok((text, err)) => {
            if !options.throw_on_error {
                state.json_last_error = err;
            }
            Ok(Val::string(text.into_bytes()))
        }
        Err(err) if options.throw_on_error => Err(VmError::Exception(err.to_exception())),
        Err(err) => {
            state.json_last_error = err;
            Ok(Val::Bool(false))
        }
    }
}

/// Recursive descent parser
/// Reference: $PHP_SRC_PATH/ext/json/json_parser.y, json_scanner.re
struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
    max_depth: usize,
    assoc: bool,
    options: JsonDecodeOptions,
    next_id: &'a mut dyn FnMut() -> Handle,
}

impl<'a> Parser<'a> {
    fn skip_ws(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.input.get(self.pos) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect_literal(&mut self, literal: &[u8], value: Val) -> Result<Val, JsonError> {
        if self.input[self.pos..].starts_with(literal) {
            self.pos += literal.len();
            Ok(value)
        } else {
            Err(JsonError::Syntax)
        }
    }

    fn parse_document(&mut self) -> Result<Val, JsonError> {
        self.skip_ws();
        let value = self.parse_value()?;
        self.skip_ws();
        if self.pos != self.input.len() {
            return Err(JsonError::Syntax);
        }
        Ok(value)
    }

    fn parse_value(&mut self) -> Result<Val, JsonError> {
        match self.peek() {
            Some(b'{') => self.parse_object(),
            Some(b'[') => self.parse_array(),
            Some(b'"') => Ok(Val::string(self.parse_string()?)),
            Some(b't') => self.expect_literal(b"true", Val::Bool(true)),
            Some(b'f') => self.expect_literal(b"false", Val::Bool(false)),
            Some(b'n') => self.expect_literal(b"null", Val::Null),
            Some(b'-' | b'0'..=b'9') => self.parse_number(),
            _ => Err(JsonError::Syntax),
        }
    }

    fn enter(&mut self) -> Result<(), JsonError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(JsonError::Depth);
        }
        Ok(())
    }

    fn parse_array(&mut self) -> Result<Val, JsonError> {
        self.enter()?;
        self.pos += 1;
        let mut arr = ArrayData::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            self.depth -= 1;
            return Ok(Val::array(arr));
        }
        loop {
            self.skip_ws();
            let value = self.parse_value()?;
            arr.push(value);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(JsonError::Syntax),
            }
        }
        self.depth -= 1;
        Ok(Val::array(arr))
    }

    fn parse_object(&mut self) -> Result<Val, JsonError> {
        self.enter()?;
        self.pos += 1;
        let mut props = ArrayData::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
        } else {
            loop {
                self.skip_ws();
                if self.peek() != Some(b'"') {
                    return Err(JsonError::Syntax);
                }
                let name = self.parse_string()?;
                self.skip_ws();
                if self.peek() != Some(b':') {
                    return Err(JsonError::Syntax);
                }
                self.pos += 1;
                self.skip_ws();
                let value = self.parse_value()?;
                if !self.assoc && name.first() == Some(&0) {
                    return Err(JsonError::InvalidPropertyName);
                }
                // assoc arrays use symtable semantics: "1" becomes int key 1
                props.set(ArrayKey::from_bytes(&name), value);
                self.skip_ws();
                match self.peek() {
                    Some(b',') => self.pos += 1,
                    Some(b'}') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(JsonError::Syntax),
                }
            }
        }
        self.depth -= 1;
        if self.assoc {
            Ok(Val::array(props))
        } else {
            let id = (self.next_id)();
            Ok(Val::Object(ObjectRef::with_properties(id, "stdClass", props)))
        }
    }

    fn parse_hex4(&mut self) -> Result<u16, JsonError> {
        let digits = self.input.get(self.pos..self.pos + 4).ok_or(JsonError::Syntax)?;
        let text = std::str::from_utf8(digits).map_err(|_| JsonError::Syntax)?;
        let unit = u16::from_str_radix(text, 16).map_err(|_| JsonError::Syntax)?;
        self.pos += 4;
        Ok(unit)
    }

    fn parse_string(&mut self) -> Result<Vec<u8>, JsonError> {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            let Some(b) = self.peek() else {
                return Err(JsonError::Syntax);
            };
            self.pos += 1;
            match b {
                b'"' => return Ok(out),
                b'\\' => {
                    let esc = self.peek().ok_or(JsonError::Syntax)?;
                    self.pos += 1;
                    match esc {
                        b'"' => out.push(b'"'),
                        b'\\' => out.push(b'\\'),
                        b'/' => out.push(b'/'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'u' => {
                            let ch = self.parse_unicode_escape()?;
                            let mut buf = [0u8; 4];
                            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                        }
                        _ => return Err(JsonError::Syntax),
                    }
                }
                0x00..=0x1F => return Err(JsonError::CtrlChar),
                _ => out.push(b),
            }
        }
    }

    fn parse_unicode_escape(&mut self) -> Result<char, JsonError> {
        let first = self.parse_hex4()?;
        match first {
            0xD800..=0xDBFF => {
                if !self.input[self.pos..].starts_with(b"\\u") {
                    return Err(JsonError::Utf16);
                }
                self.pos += 2;
                let second = self.parse_hex4()?;
                if !(0xDC00..=0xDFFF).contains(&second) {
                    return Err(JsonError::Utf16);
                }
                let code = 0x10000 + (((first as u32) - 0xD800) << 10) + ((second as u32) - 0xDC00);
                char::from_u32(code).ok_or(JsonError::Utf16)
            }
            0xDC00..=0xDFFF => Err(JsonError::Utf16),
            unit => char::from_u32(unit as u32).ok_or(JsonError::Utf16),
        }
    }

    fn parse_number(&mut self) -> Result<Val, JsonError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'0') => self.pos += 1,
            Some(b'1'..=b'9') => {
                while let Some(b'0'..=b'9') = self.peek() {
                    self.pos += 1;
                }
            }
            _ => return Err(JsonError::Syntax),
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') {
            is_float = true;
            self.pos += 1;
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(JsonError::Syntax);
            }
            while let Some(b'0'..=b'9') = self.peek() {
                self.pos += 1;
            }
        }
        if let Some(b'e' | b'E') = self.peek() {
            is_float = true;
            self.pos += 1;
            if let Some(b'+' | b'-') = self.peek() {
                self.pos += 1;
            }
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(JsonError::Syntax);
            }
            while let Some(b'0'..=b'9') = self.peek() {
                self.pos += 1;
            }
        }

        let literal = &self.input[start..self.pos];
        let text = std::str::from_utf8(literal).map_err(|_| JsonError::Syntax)?;
        if !is_float {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Val::Int(i));
            }
            if self.options.bigint_as_string {
                return Ok(Val::string(literal.to_vec()));
            }
        }
        text.parse::<f64>().map(Val::Float).map_err(|_| JsonError::Syntax)
    }
}

fn scrub_utf8(input: &[u8], options: JsonDecodeOptions) -> Result<Vec<u8>, JsonError> {
    if std::str::from_utf8(input).is_ok() {
        return Ok(input.to_vec());
    }
    if options.invalid_utf8_substitute {
        return Ok(String::from_utf8_lossy(input).into_owned().into_bytes());
    }
    if !options.invalid_utf8_ignore {
        return Err(JsonError::Utf8);
    }
    let mut out = Vec::with_capacity(input.len());
    let mut rest = input;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.extend_from_slice(valid.as_bytes());
                return Ok(out);
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                out.extend_from_slice(valid);
                let skip = e.error_len().unwrap_or(after.len());
                rest = &after[skip..];
            }
        }
    }
}

/// Decode without touching runtime state. `next_id` numbers the `stdClass`
/// objects built when `assoc` is false.
pub fn decode(
    input: &[u8],
    assoc: bool,
    max_depth: usize,
    options: JsonDecodeOptions,
    next_id: &mut dyn FnMut() -> Handle,
) -> Result<Val, JsonError> {
    let text = scrub_utf8(input, options)?;
    let mut parser = Parser {
        input: &text,
        pos: 0,
        depth: 0,
        max_depth,
        assoc: assoc || options.object_as_array,
        options,
        next_id,
    };
    parser.parse_document()
}

/// json_decode(string $json, ?bool $associative = null, int $depth = 512, int $flags = 0): mixed
/// Reference: $PHP_SRC_PATH/ext/json/json.c - PHP_FUNCTION(json_decode)
pub fn json_decode(
    state: &mut RuntimeState,
    input: &[u8],
    assoc: bool,
    depth: usize,
    flags: i64,
) -> Result<Val, VmError> {
    let options = JsonDecodeOptions::from_flags(flags);
    let result = if input.is_empty() {
        Err(JsonError::Syntax)
    } else {
        decode(input, assoc, depth, options, &mut || state.next_object_id())
    };
    match result {
        Ok(value) => {
            if !options.throw_on_error {
                state.json_last_error = JsonError::None;
            }
            Ok(value)
        }
        Err(err) if options.throw_on_error => Err(VmError::Exception(err.to_exception())),
        Err(err) => {
            state.json_last_error = err;
            Ok(Val::Null)
        }
    }
}

/// json_validate(string $json, int $depth = 512, int $flags = 0): bool
pub fn json_validate(state: &mut RuntimeState, input: &[u8], depth: usize) -> bool {
    let result = if input.is_empty() {
        Err(JsonError::Syntax)
    } else {
        decode(input, true, depth, JsonDecodeOptions::default(), &mut || Handle(0))
    };
    state.json_last_error = result.as_ref().err().copied().unwrap_or_default();
    result.is_ok()
}

/// json_last_error(): int
pub fn json_last_error(state: &RuntimeState) -> i64 {
    state.json_last_error.code()
}

/// json_last_error_msg(): string
pub fn json_last_error_msg(state: &RuntimeState) -> &'static str {
    state.json_last_error.message()
}
