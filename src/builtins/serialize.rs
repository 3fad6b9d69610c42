//! serialize() / unserialize()
//!
//! ## PHP Semantics
//!
//! Format:
//! - `N;` `b:0;` `b:1;` `i:N;` `d:F;` (`INF`, `-INF`, `NAN` spelled out)
//! - `s:len:"bytes";` with `len` counted in bytes
//! - `a:N:{key;value...}` with keys restricted to `i:` and `s:`
//! - `O:len:"Class":N:{name;value...}`
//! - `r:N;` back-reference to the N-th serialized value (1-based, every value
//!   counts), emitted for repeated objects
//! - `R:N;` emitted when a reference cell is reached a second time, which is
//!   how `$a[0] = &$a` serializes; it is not counted itself
//!
//! `unserialize` rejects anything malformed with the notice
//! `unserialize(): Error at offset X of Y bytes` and returns `false`. A valid
//! value followed by more bytes is returned with a warning. Non-empty arrays
//! and objects nested deeper than `unserialize_max_depth` (4096) fail with a
//! warning before the notice.
//!
//! ## References
//!
//! - `$PHP_SRC_PATH/ext/standard/var.c` - php_var_serialize_intern
//! - `$PHP_SRC_PATH/ext/standard/var_unserializer.re`

use crate::core::array::ArrayData;
use crate::core::array_key::ArrayKey;
use crate::core::value::{Handle, ObjectRef, Reference, Val, Zval};
use crate::runtime::context::RuntimeState;
use crate::vm::type_conversion::format_float;
use memchr::memchr;

struct Serializer {
    out: Vec<u8>,
    precision: i32,
    /// Values emitted so far, the numbering `r:N;` refers to
    counter: usize,
    objects: Vec<(Handle, usize)>,
    references: Vec<(Reference, usize)>,
}

impl Serializer {
    fn write(&mut self, value: &Val) {
        self.counter += 1;
        match value {
            Val::Null => self.out.extend_from_slice(b"N;"),
            Val::Bool(b) => {
                self.out
                    .extend_from_slice(if *b { b"b:1;" } else { b"b:0;" })
            }
            Val::Int(i) => self.out.extend_from_slice(format!("i:{};", i).as_bytes()),
            Val::Float(f) => {
                let rendered = format_float(*f, self.precision, b'E');
                self.out.extend_from_slice(format!("d:{};", rendered).as_bytes());
            }
            Val::String(s) => self.write_string(s),
            Val::Array(arr) => {
                self.out
                    .extend_from_slice(format!("a:{}:{{", arr.len()).as_bytes());
                self.write_entries(arr);
                self.out.push(b'}');
            }
            Val::Object(obj) => {
                let id = obj.id();
                if let Some(&(_, index)) = self.objects.iter().find(|(h, _)| *h == id) {
                    self.out.extend_from_slice(format!("r:{};", index).as_bytes());
                    return;
                }
                self.objects.push((id, self.counter));
                let class = obj.class_name();
                let properties = obj.borrow().properties.clone();
                self.out.extend_from_slice(
                    format!("O:{}:\"{}\":{}:{{", class.len(), class, properties.len()).as_bytes(),
                );
                self.write_entries(&properties);
                self.out.push(b'}');
            }
        }
    }

    fn write_string(&mut self, s: &[u8]) {
        self.out
            .extend_from_slice(format!("s:{}:\"", s.len()).as_bytes());
        self.out.extend_from_slice(s);
        self.out.extend_from_slice(b"\";");
    }

    fn write_entries(&mut self, arr: &ArrayData) {
        for (key, slot) in arr.slots() {
            match key {
                ArrayKey::Int(i) => self.out.extend_from_slice(format!("i:{};", i).as_bytes()),
                ArrayKey::Str(s) => self.write_string(s),
            }
            match slot {
                Zval::Value(v) => self.write(v),
                Zval::Reference(r) => self.write_reference(r),
            }
        }
    }

    /// Reference: $PHP_SRC_PATH/ext/standard/var.c - php_add_var_hash
    fn write_reference(&mut self, r: &Reference) {
        let value = r.get();
        if !matches!(value, Val::Object(_)) {
            if let Some(&(_, index)) = self.references.iter().find(|(seen, _)| seen.ptr_eq(r)) {
                self.out.extend_from_slice(format!("R:{};", index).as_bytes());
                return;
            }
            self.references.push((r.clone(), self.counter + 1));
        }
        self.write(&value);
    }
}

/// Serialize with an explicit float precision
pub fn serialize_value(value: &Val, serialize_precision: i32) -> Vec<u8> {
    let mut serializer = Serializer {
        out: Vec::new(),
        precision: serialize_precision,
        counter: 0,
        objects: Vec::new(),
        references: Vec::new(),
    };
    serializer.write(value);
    serializer.out
}

/// serialize(mixed $value): string
pub fn serialize(state: &RuntimeState, value: &Val) -> Val {
    Val::string(serialize_value(value, state.config.serialize_precision))
}

// ---------------------------------------------------------------------------
// unserialize
// ---------------------------------------------------------------------------

/// Default for `unserialize_max_depth`
pub const DEFAULT_MAX_DEPTH: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnserializeError {
    /// Malformed input; `offset` is where parsing stopped
    Syntax { offset: usize },
    /// A non-empty array or object nested past `limit`
    MaxDepth { offset: usize, limit: usize },
}

impl UnserializeError {
    pub fn offset(&self) -> usize {
        match self {
            UnserializeError::Syntax { offset } | UnserializeError::MaxDepth { offset, .. } => *offset,
        }
    }
}

struct Parser<'a, 'b> {
    input: &'a [u8],
    pos: usize,
    /// Every value in parse order, for `r:N;`
    values: Vec<Val>,
    next_id: &'b mut dyn FnMut() -> Handle,
    depth: usize,
    max_depth: usize,
}

impl<'a, 'b> Parser<'a, 'b> {
    fn fail<T>(&self, offset: usize) -> Result<T, UnserializeError> {
        Err(UnserializeError::Syntax { offset })
    }

    /// Reference: $PHP_SRC_PATH/ext/standard/var_unserializer.re - process_nested_array_data
    fn enter_nested(&mut self) -> Result<(), UnserializeError> {
        if self.depth >= self.max_depth {
            return Err(UnserializeError::MaxDepth {
                offset: self.pos,
                limit: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Entries take at least four bytes each
    fn capacity_hint(&self, count: usize) -> usize {
        count.min((self.input.len() - self.pos) / 4)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8, token_start: usize) -> Result<(), UnserializeError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            self.fail(token_start)
        }
    }

    /// Digits up to (not including) `terminator`
    fn digits_until(&mut self, terminator: u8, signed: bool) -> Option<&'a [u8]> {
        let start = self.pos;
        let mut end = start;
        if signed && matches!(self.input.get(end), Some(b'+') | Some(b'-')) {
            end += 1;
        }
        let digits_start = end;
        while self.input.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
        if end == digits_start || self.input.get(end) != Some(&terminator) {
            return None;
        }
        self.pos = end + 1;
        Some(&self.input[start..end])
    }

    fn parse_uint(&mut self, terminator: u8, token_start: usize) -> Result<usize, UnserializeError> {
        let digits = self
            .digits_until(terminator, false)
            .ok_or(UnserializeError::Syntax { offset: token_start })?;
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(UnserializeError::Syntax { offset: token_start })
    }

    fn parse_int(&mut self, token_start: usize) -> Result<i64, UnserializeError> {
        let digits = self
            .digits_until(b';', true)
            .ok_or(UnserializeError::Syntax { offset: token_start })?;
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(UnserializeError::Syntax { offset: token_start })
    }

    fn parse_float(&mut self, token_start: usize) -> Result<f64, UnserializeError> {
        let rest = &self.input[self.pos..];
        let len = memchr(b';', rest).ok_or(UnserializeError::Syntax { offset: token_start })?;
        let text = &rest[..len];
        let value = match text {
            b"INF" => f64::INFINITY,
            b"-INF" => f64::NEG_INFINITY,
            b"NAN" => f64::NAN,
            _ if !text.is_empty()
                && text
                    .iter()
                    .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) =>
            {
                std::str::from_utf8(text)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or(UnserializeError::Syntax { offset: token_start })?
            }
            _ => return self.fail(token_start),
        };
        self.pos += len + 1;
        Ok(value)
    }

    /// `len:"bytes"` after the type tag; leaves the cursor after the closing quote
    fn parse_counted_bytes(&mut self, token_start: usize) -> Result<&'a [u8], UnserializeError> {
        let len = self.parse_uint(b':', token_start)?;
        self.expect(b'"', token_start)?;
        let body_start = self.pos;
        if self.input.len() - body_start < len {
            return self.fail(token_start + 2);
        }
        let end = body_start + len;
        if self.input.get(end) != Some(&b'"') {
            return self.fail(end);
        }
        self.pos = end + 1;
        Ok(&self.input[body_start..end])
    }

    fn parse_string(&mut self, token_start: usize) -> Result<&'a [u8], UnserializeError> {
        let bytes = self.parse_counted_bytes(token_start)?;
        if self.peek() != Some(b';') {
            return self.fail(self.pos);
        }
        self.pos += 1;
        Ok(bytes)
    }

    fn parse_key(&mut self) -> Result<ArrayKey, UnserializeError> {
        let start = self.pos;
        match self.input.get(start..start + 2) {
            Some(b"i:") => {
                self.pos += 2;
                Ok(ArrayKey::Int(self.parse_int(start)?))
            }
            Some(b"s:") => {
                self.pos += 2;
                Ok(ArrayKey::from_bytes(self.parse_string(start)?))
            }
            _ => self.fail(start),
        }
    }

    /// One value, or the header of an array/object whose entries follow
    fn parse_item(&mut self) -> Result<Item, UnserializeError> {
        let start = self.pos;
        let tag = match self.input.get(start..start + 2) {
            Some([b'N', b';']) => {
                self.pos += 2;
                self.values.push(Val::Null);
                return Ok(Item::Value(Val::Null));
            }
            Some([tag, b':']) => *tag,
            _ => return self.fail(start),
        };
        self.pos += 2;

        let value = match tag {
            b'b' => {
                let value = match self.input.get(self.pos..self.pos + 2) {
                    Some(b"0;") => false,
                    Some(b"1;") => true,
                    _ => return self.fail(start),
                };
                self.pos += 2;
                Val::Bool(value)
            }
            b'i' => Val::Int(self.parse_int(start)?),
            b'd' => Val::Float(self.parse_float(start)?),
            b's' => Val::string(self.parse_string(start)?),
            b'r' | b'R' => {
                let index = self.parse_uint(b';', start)?;
                let value = match index.checked_sub(1).and_then(|i| self.values.get(i)) {
                    Some(v) => v.clone(),
                    None => return self.fail(start),
                };
                // R: aliases an earlier slot and takes no number of its own
                if tag == b'R' {
                    return Ok(Item::Value(value));
                }
                value
            }
            b'a' => {
                let count = self.parse_uint(b':', start)?;
                self.expect(b'{', start)?;
                if count > 0 {
                    self.enter_nested()?;
                }
                let slot = self.values.len();
                self.values.push(Val::Null);
                return Ok(Item::Open(Frame {
                    kind: FrameKind::Array { slot },
                    entries: ArrayData::with_capacity(self.capacity_hint(count)),
                    remaining: count,
                    nested: count > 0,
                }));
            }
            b'O' => {
                let class = self.parse_counted_bytes(start)?;
                self.expect(b':', start)?;
                let class = std::str::from_utf8(class)
                    .map_err(|_| UnserializeError::Syntax { offset: start })?;
                let count = self.parse_uint(b':', start)?;
                self.expect(b'{', start)?;
                if count > 0 {
                    self.enter_nested()?;
                }
                let obj = ObjectRef::new((self.next_id)(), class);
                self.values.push(Val::Object(obj.clone()));
                return Ok(Item::Open(Frame {
                    kind: FrameKind::Object(obj),
                    entries: ArrayData::with_capacity(self.capacity_hint(count)),
                    remaining: count,
                    nested: count > 0,
                }));
            }
            _ => return self.fail(start),
        };
        self.values.push(value.clone());
        Ok(Item::Value(value))
    }

    /// Containers are kept on an explicit stack so nesting never grows the
    /// native call stack.
    fn parse_value(&mut self) -> Result<Val, UnserializeError> {
        let mut stack: Vec<(Frame, Option<ArrayKey>)> = Vec::new();
        loop {
            let closing = matches!(stack.last(), Some((frame, _)) if frame.remaining == 0);
            let value = if closing {
                if self.peek() != Some(b'}') {
                    return self.fail(self.pos);
                }
                self.pos += 1;
                let Some((frame, _)) = stack.pop() else {
                    return self.fail(self.pos);
                };
                if frame.nested {
                    self.depth -= 1;
                }
                frame.close(&mut self.values)
            } else {
                if let Some((_, key)) = stack.last_mut() {
                    *key = Some(self.parse_key()?);
                }
                match self.parse_item()? {
                    Item::Value(v) => v,
                    Item::Open(frame) => {
                        stack.push((frame, None));
                        continue;
                    }
                }
            };
            match stack.last_mut() {
                None => return Ok(value),
                Some((frame, key)) => {
                    if let Some(key) = key.take() {
                        frame.entries.set(key, value);
                    }
                    frame.remaining -= 1;
                }
            }
        }
    }
}

enum Item {
    Value(Val),
    Open(Frame),
}

enum FrameKind {
    /// Index of the placeholder in `Parser::values`
    Array { slot: usize },
    Object(ObjectRef),
}

/// An array or object whose entries are still being read
struct Frame {
    kind: FrameKind,
    entries: ArrayData,
    remaining: usize,
    /// Counted against the depth limit
    nested: bool,
}

impl Frame {
    fn close(self, values: &mut [Val]) -> Val {
        match self.kind {
            FrameKind::Array { slot } => {
                let arr = Val::array(self.entries);
                if let Some(placeholder) = values.get_mut(slot) {
                    *placeholder = arr.clone();
                }
                arr
            }
            FrameKind::Object(obj) => {
                obj.borrow_mut().properties = self.entries;
                Val::Object(obj)
            }
        }
    }
}

/// Parse one serialized value, returning it with the number of bytes consumed
pub fn unserialize_value(
    input: &[u8],
    next_id: &mut dyn FnMut() -> Handle,
) -> Result<(Val, usize), UnserializeError> {
    unserialize_value_with_depth(input, DEFAULT_MAX_DEPTH, next_id)
}

/// `unserialize_value` with an explicit nesting limit; 0 selects the default
pub fn unserialize_value_with_depth(
    input: &[u8],
    max_depth: usize,
    next_id: &mut dyn FnMut() -> Handle,
) -> Result<(Val, usize), UnserializeError> {
    let mut parser = Parser {
        input,
        pos: 0,
        values: Vec::new(),
        next_id,
        depth: 0,
        max_depth: if max_depth == 0 { DEFAULT_MAX_DEPTH } else { max_depth },
    };
    let value = parser.parse_value()?;
    Ok((value, parser.pos))
}

/// unserialize(string $data): mixed
pub fn unserialize(state: &mut RuntimeState, input: &[u8]) -> Val {
    let total = input.len();
    let max_depth = state.config.unserialize_max_depth;
    let result = unserialize_value_with_depth(input, max_depth, &mut || state.next_object_id());
    match result {
        Ok((value, consumed)) => {
            if consumed < total {
                state.warning(&format!(
                    "unserialize(): Extra data starting at offset {} of {} bytes",
                    consumed, total
                ));
            }
            value
        }
        Err(e) => {
            if let UnserializeError::MaxDepth { limit, .. } = e {
                state.warning(&format!(
                    "unserialize(): Maximum depth of {} exceeded. The depth limit can be changed \
                     using the max_depth unserialize() option or the unserialize_max_depth ini setting",
                    limit
                ));
            }
            state.notice(&format!(
                "unserialize(): Error at offset {} of {} bytes",
                e.offset(),
                total
            ));
            Val::Bool(false)
        }
    }
}
