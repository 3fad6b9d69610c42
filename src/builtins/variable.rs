//! Value output: var_dump, print_r, var_export, gettype
//!
//! ## PHP Semantics
//!
//! - All three walk arrays in insertion order.
//! - `var_dump` and `var_export` render floats with `serialize_precision`
//!   (`-1` = shortest round trip), `print_r` uses the string conversion and so
//!   `precision`.
//! - `var_dump` prefixes `&` to elements whose reference cell is shared.
//! - Cycles can only form through objects or reference cells; they print as
//!   `*RECURSION*`, and `var_export` gives up with a warning.
//!
//! ## References
//!
//! - `$PHP_SRC_PATH/ext/standard/var.c`
//! - `$PHP_SRC_PATH/Zend/zend.c` - print_hash, zend_print_zval_r_to_buf

use crate::core::array::ArrayData;
use crate::core::array_key::ArrayKey;
use crate::core::value::{Handle, ObjectRef, Reference, Val, Zval};
use crate::runtime::context::RuntimeState;
use crate::vm::error::VmError;
use crate::vm::type_conversion::{format_float, to_php_string};

/// gettype(mixed $value): string
pub fn gettype(value: &Val) -> &'static str {
    value.gettype()
}

/// Tracks the containers currently being printed
#[derive(Default)]
struct Visited {
    objects: Vec<Handle>,
    references: Vec<Reference>,
}

impl Visited {
    fn enter_object(&mut self, obj: &ObjectRef) -> bool {
        let id = obj.id();
        if self.objects.contains(&id) {
            return false;
        }
        self.objects.push(id);
        true
    }

    fn leave_object(&mut self) {
        self.objects.pop();
    }

    fn enter_reference(&mut self, r: &Reference) -> bool {
        if self.references.iter().any(|seen| seen.ptr_eq(r)) {
            return false;
        }
        self.references.push(r.clone());
        true
    }

    fn leave_reference(&mut self) {
        self.references.pop();
    }
}

fn push_spaces(out: &mut Vec<u8>, count: usize) {
    out.resize(out.len() + count, b' ');
}

// ---------------------------------------------------------------------------
// var_dump
// ---------------------------------------------------------------------------

struct Dumper {
    out: Vec<u8>,
    precision: i32,
    visited: Visited,
}

impl Dumper {
    fn new(precision: i32) -> Self {
        Self {
            out: Vec::new(),
            precision,
            visited: Visited::default(),
        }
    }

    /// Reference: $PHP_SRC_PATH/ext/standard/var.c - php_var_dump
    fn dump(&mut self, value: &Val, level: usize, is_ref: bool) {
        if level > 1 {
            push_spaces(&mut self.out, level - 1);
        }
        let amp = if is_ref { "&" } else { "" };
        match value {
            Val::Null => self.out.extend_from_slice(format!("{}NULL\n", amp).as_bytes()),
            Val::Bool(b) => self
                .out
                .extend_from_slice(format!("{}bool({})\n", amp, b).as_bytes()),
            Val::Int(i) => self
                .out
                .extend_from_slice(format!("{}int({})\n", amp, i).as_bytes()),
            Val::Float(f) => {
                let rendered = format_float(*f, self.precision, b'E');
                self.out
                    .extend_from_slice(format!("{}float({})\n", amp, rendered).as_bytes());
            }
            Val::String(s) => {
                self.out
                    .extend_from_slice(format!("{}string({}) \"", amp, s.len()).as_bytes());
                self.out.extend_from_slice(s);
                self.out.extend_from_slice(b"\"\n");
            }
            Val::Array(arr) => {
                self.out
                    .extend_from_slice(format!("{}array({}) {{\n", amp, arr.len()).as_bytes());
                self.dump_entries(arr, level);
                self.close(level);
            }
            Val::Object(obj) => {
                if !self.visited.enter_object(obj) {
                    self.out.extend_from_slice(b"*RECURSION*\n");
                    return;
                }
                let data = obj.borrow();
                self.out.extend_from_slice(
                    format!(
                        "{}object({})#{} ({}) {{\n",
                        amp,
                        data.class,
                        data.id.0,
                        data.properties.len()
                    )
                    .as_bytes(),
                );
                let properties = data.properties.clone();
                drop(data);
                self.dump_entries(&properties, level);
                self.close(level);
                self.visited.leave_object();
            }
        }
    }

    fn dump_entries(&mut self, arr: &ArrayData, level: usize) {
        for (key, slot) in arr.slots() {
            push_spaces(&mut self.out, level + 1);
            match key {
                ArrayKey::Int(i) => self.out.extend_from_slice(format!("[{}]=>\n", i).as_bytes()),
                ArrayKey::Str(s) => {
                    self.out.extend_from_slice(b"[\"");
                    self.out.extend_from_slice(s);
                    self.out.extend_from_slice(b"\"]=>\n");
                }
            }
            self.dump_slot(slot, level + 2);
        }
    }

    fn dump_slot(&mut self, slot: &Zval, level: usize) {
        match slot {
            Zval::Value(v) => self.dump(v, level, false),
            Zval::Reference(r) => {
                if !self.visited.enter_reference(r) {
                    push_spaces(&mut self.out, level - 1);
                    self.out.extend_from_slice(b"*RECURSION*\n");
                    return;
                }
                let shared = r.alias_count() > 1;
                let inner = r.get();
                self.dump(&inner, level, shared);
                self.visited.leave_reference();
            }
        }
    }

    fn close(&mut self, level: usize) {
        if level > 1 {
            push_spaces(&mut self.out, level - 1);
        }
        self.out.extend_from_slice(b"}\n");
    }
}

/// Render one value the way var_dump() prints it
pub fn var_dump_to_string(value: &Val, serialize_precision: i32) -> Vec<u8> {
    let mut dumper = Dumper::new(serialize_precision);
    dumper.dump(value, 1, false);
    dumper.out
}

/// var_dump(mixed $value, mixed ...$values): void
pub fn var_dump(state: &mut RuntimeState, values: &[Val]) -> Result<(), VmError> {
    let precision = state.config.serialize_precision;
    for value in values {
        let rendered = var_dump_to_string(value, precision);
        state.echo(&rendered)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// print_r
// ---------------------------------------------------------------------------

const PRINT_ZVAL_INDENT: usize = 4;

struct Printer {
    out: Vec<u8>,
    precision: i32,
    visited: Visited,
}

impl Printer {
    /// Reference: $PHP_SRC_PATH/Zend/zend.c - zend_print_zval_r_to_buf
    fn print(&mut self, value: &Val, indent: usize) {
        match value {
            Val::Array(arr) => {
                self.out.extend_from_slice(b"Array\n");
                self.print_hash(arr, indent);
            }
            Val::Object(obj) => {
                self.out.extend_from_slice(obj.class_name().as_bytes());
                self.out.extend_from_slice(b" Object\n");
                if !self.visited.enter_object(obj) {
                    self.out.extend_from_slice(b" *RECURSION*");
                    return;
                }
                let properties = obj.borrow().properties.clone();
                self.print_hash(&properties, indent);
                self.visited.leave_object();
            }
            other => self.out.extend(to_php_string(other, self.precision)),
        }
    }

    fn print_hash(&mut self, arr: &ArrayData, indent: usize) {
        push_spaces(&mut self.out, indent);
        self.out.extend_from_slice(b"(\n");
        let inner = indent + PRINT_ZVAL_INDENT;
        for (key, slot) in arr.slots() {
            push_spaces(&mut self.out, inner);
            self.out.push(b'[');
            self.out.extend(key.to_bytes());
            self.out.extend_from_slice(b"] => ");
            match slot {
                Zval::Value(v) => self.print(v, inner + PRINT_ZVAL_INDENT),
                Zval::Reference(r) => {
                    if self.visited.enter_reference(r) {
                        let v = r.get();
                        self.print(&v, inner + PRINT_ZVAL_INDENT);
                        self.visited.leave_reference();
                    } else {
                        self.out.extend_from_slice(b"Array\n *RECURSION*");
                    }
                }
            }
            self.out.push(b'\n');
        }
        push_spaces(&mut self.out, indent);
        self.out.extend_from_slice(b")\n");
    }
}

/// Render one value the way print_r() prints it
pub fn print_r_to_string(value: &Val, precision: i32) -> Vec<u8> {
    let mut printer = Printer {
        out: Vec::new(),
        precision,
        visited: Visited::default(),
    };
    printer.print(value, 0);
    printer.out
}

/// print_r(mixed $value, bool $return = false): string|true
pub fn print_r(state: &mut RuntimeState, value: &Val, return_output: bool) -> Result<Val, VmError> {
    let rendered = print_r_to_string(value, state.config.precision);
    if return_output {
        return Ok(Val::string(rendered));
    }
    state.echo(&rendered)?;
    Ok(Val::Bool(true))
}

// ---------------------------------------------------------------------------
// var_export
// ---------------------------------------------------------------------------

struct Exporter {
    out: Vec<u8>,
    precision: i32,
    visited: Visited,
    circular: bool,
}

impl Exporter {
    /// Reference: $PHP_SRC_PATH/ext/standard/var.c - php_var_export_ex
    fn export(&mut self, value: &Val, level: usize) {
        match value {
            Val::Null => self.out.extend_from_slice(b"NULL"),
            Val::Bool(true) => self.out.extend_from_slice(b"true"),
            Val::Bool(false) => self.out.extend_from_slice(b"false"),
            Val::Int(i) => self.out.extend_from_slice(i.to_string().as_bytes()),
            Val::Float(f) => self.out.extend_from_slice(export_float(*f, self.precision).as_bytes()),
            Val::String(s) => export_string(&mut self.out, s),
            Val::Array(arr) => {
                if level > 1 {
                    self.out.push(b'\n');
                    push_spaces(&mut self.out, level - 1);
                }
                self.out.extend_from_slice(b"array (\n");
                for (key, slot) in arr.slots() {
                    push_spaces(&mut self.out, level + 1);
                    self.export_key(key);
                    self.export_slot(slot, level + 2);
                    self.out.extend_from_slice(b",\n");
                }
                if level > 1 {
                    push_spaces(&mut self.out, level - 1);
                }
                self.out.push(b')');
            }
            Val::Object(obj) => {
                if !self.visited.enter_object(obj) {
                    self.circular = true;
                    self.out.extend_from_slice(b"NULL");
                    return;
                }
                if level > 1 {
                    self.out.push(b'\n');
                    push_spaces(&mut self.out, level - 1);
                }
                let class = obj.class_name();
                let is_std = &*class == "stdClass";
                if is_std {
                    self.out.extend_from_slice(b"(object) array(\n");
                } else {
                    self.out.push(b'\\');
                    self.out.extend_from_slice(class.as_bytes());
                    self.out.extend_from_slice(b"::__set_state(array(\n");
                }
                let properties = obj.borrow().properties.clone();
                for (key, slot) in properties.slots() {
                    push_spaces(&mut self.out, level + 2);
                    self.export_key(key);
                    self.export_slot(slot, level + 2);
                    self.out.extend_from_slice(b",\n");
                }
                if level > 1 {
                    push_spaces(&mut self.out, level - 1);
                }
                self.out.extend_from_slice(if is_std { b")" } else { b"))" });
                self.visited.leave_object();
            }
        }
    }

    fn export_key(&mut self, key: &ArrayKey) {
        match key {
            ArrayKey::Int(i) => self.out.extend_from_slice(i.to_string().as_bytes()),
            ArrayKey::Str(s) => export_string(&mut self.out, s),
        }
        self.out.extend_from_slice(b" => ");
    }

    fn export_slot(&mut self, slot: &Zval, level: usize) {
        match slot {
            Zval::Value(v) => self.export(v, level),
            Zval::Reference(r) => {
                if !self.visited.enter_reference(r) {
                    self.circular = true;
                    self.out.extend_from_slice(b"NULL");
                    return;
                }
                let v = r.get();
                self.export(&v, level);
                self.visited.leave_reference();
            }
        }
    }
}

/// Floats always carry a fraction or exponent so they read back as floats
fn export_float(f: f64, precision: i32) -> String {
    let mut rendered = format_float(f, precision, b'E');
    if f.is_finite() && !rendered.contains(&['.', 'e', 'E'][..]) {
        rendered.push_str(".0");
    }
    rendered
}

/// Single-quoted literal; NUL bytes are spliced in as `"\0"`
fn export_string(out: &mut Vec<u8>, s: &[u8]) {
    out.push(b'\'');
    for &b in s {
        match b {
            b'\'' => out.extend_from_slice(b"\\'"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            0 => out.extend_from_slice(b"' . \"\\0\" . '"),
            _ => out.push(b),
        }
    }
    out.push(b'\'');
}

fn export_value(value: &Val, serialize_precision: i32) -> (Vec<u8>, bool) {
    let mut exporter = Exporter {
        out: Vec::new(),
        precision: serialize_precision,
        visited: Visited::default(),
        circular: false,
    };
    exporter.export(value, 1);
    (exporter.out, exporter.circular)
}

/// Render one value as var_export() does (cycles become `NULL`)
pub fn var_export_to_string(value: &Val, serialize_precision: i32) -> Vec<u8> {
    export_value(value, serialize_precision).0
}

/// var_export(mixed $value, bool $return = false): ?string
pub fn var_export(state: &mut RuntimeState, value: &Val, return_output: bool) -> Result<Val, VmError> {
    let (rendered, circular) = export_value(value, state.config.serialize_precision);
    if circular {
        state.warning("var_export does not handle circular references");
    }
    if return_output {
        return Ok(Val::string(rendered));
    }
    state.echo(&rendered)?;
    Ok(Val::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::RuntimeBuilder;
    use crate::vm::error::BufferWriter;

    fn dump(v: &Val) -> String {
        String::from_utf8(var_dump_to_string(v, -1)).unwrap()
    }

    fn export(v: &Val) -> String {
        String::from_utf8(var_export_to_string(v, -1)).unwrap()
    }

    fn sample() -> Val {
        let mut inner = ArrayData::new();
        inner.push(Val::Int(2));
        let mut arr = ArrayData::new();
        arr.push(Val::Int(1));
        arr.set(ArrayKey::from("a"), Val::array(inner));
        arr.set(ArrayKey::from("s"), Val::from("x"));
        Val::array(arr)
    }

    #[test]
    fn test_var_dump_scalars() {
        assert_eq!(dump(&Val::Null), "NULL\n");
        assert_eq!(dump(&Val::Bool(false)), "bool(false)\n");
        assert_eq!(dump(&Val::Int(-3)), "int(-3)\n");
        assert_eq!(dump(&Val::Float(0.1)), "float(0.1)\n");
        assert_eq!(dump(&Val::Float(1.0)), "float(1)\n");
        assert_eq!(dump(&Val::Float(-0.0)), "float(-0)\n");
        assert_eq!(dump(&Val::Float(1e25)), "float(1.0E+25)\n");
        assert_eq!(dump(&Val::Float(f64::NAN)), "float(NAN)\n");
        assert_eq!(dump(&Val::from("héllo")), "string(6) \"héllo\"\n");
    }

    #[test]
    fn test_var_dump_nested() {
        let expected = "array(3) {\n  [0]=>\n  int(1)\n  [\"a\"]=>\n  array(1) {\n    [0]=>\n    int(2)\n  }\n  [\"s\"]=>\n  string(1) \"x\"\n}\n";
        assert_eq!(dump(&sample()), expected);
        assert_eq!(dump(&Val::empty_array()), "array(0) {\n}\n");
    }

    #[test]
    fn test_var_dump_shared_reference() {
        let mut arr = ArrayData::new();
        arr.push(Val::Int(1));
        let cell = arr.entry_slot(ArrayKey::Int(0)).make_ref();
        assert_eq!(dump(&Val::array(arr.clone())), "array(1) {\n  [0]=>\n  &int(1)\n}\n");
        drop(cell);
        assert_eq!(dump(&Val::array(arr)), "array(1) {\n  [0]=>\n  int(1)\n}\n");
    }

    #[test]
    fn test_var_dump_object_recursion() {
        let obj = ObjectRef::new(Handle(1), "stdClass");
        obj.borrow_mut()
            .properties
            .set(ArrayKey::from("self"), Val::Object(obj.clone()));
        let expected = "object(stdClass)#1 (1) {\n  [\"self\"]=>\n  *RECURSION*\n}\n";
        assert_eq!(dump(&Val::Object(obj)), expected);
    }

    #[test]
    fn test_print_r_layout() {
        let out = String::from_utf8(print_r_to_string(&sample(), 14)).unwrap();
        let expected = "Array\n(\n    [0] => 1\n    [a] => Array\n        (\n            [0] => 2\n        )\n\n    [s] => x\n)\n";
        assert_eq!(out, expected);
        assert_eq!(print_r_to_string(&Val::Float(0.1 + 0.2), 14), b"0.3");
        assert_eq!(print_r_to_string(&Val::Bool(false), 14), b"");
    }

    #[test]
    fn test_print_r_object() {
        let obj = ObjectRef::new(Handle(4), "Point");
        obj.borrow_mut().properties.set(ArrayKey::from("x"), Val::Int(1));
        let out = String::from_utf8(print_r_to_string(&Val::Object(obj), 14)).unwrap();
        assert_eq!(out, "Point Object\n(\n    [x] => 1\n)\n");
    }

    #[test]
    fn test_var_export_layout() {
        let expected = "array (\n  0 => 1,\n  'a' => \n  array (\n    0 => 2,\n  ),\n  's' => 'x',\n)";
        assert_eq!(export(&sample()), expected);
    }

    #[test]
    fn test_var_export_scalars() {
        assert_eq!(export(&Val::Float(1.0)), "1.0");
        assert_eq!(export(&Val::Float(-0.0)), "-0.0");
        assert_eq!(export(&Val::Float(0.1)), "0.1");
        assert_eq!(export(&Val::Float(1e25)), "1.0E+25");
        assert_eq!(export(&Val::Float(f64::INFINITY)), "INF");
        assert_eq!(export(&Val::Bool(true)), "true");
        assert_eq!(export(&Val::Null), "NULL");
        assert_eq!(export(&Val::from("it's \\")), r"'it\'s \\'");
        assert_eq!(export(&Val::string(b"a\0b".to_vec())), r#"'a' . "\0" . 'b'"#);
    }

    #[test]
    fn test_var_export_objects() {
        let obj = ObjectRef::new(Handle(1), "stdClass");
        obj.borrow_mut().properties.set(ArrayKey::from("a"), Val::Int(1));
        assert_eq!(export(&Val::Object(obj)), "(object) array(\n   'a' => 1,\n)");

        let obj = ObjectRef::new(Handle(2), "Foo");
        obj.borrow_mut().properties.set(ArrayKey::from("b"), Val::Int(2));
        assert_eq!(
            export(&Val::Object(obj)),
            "\\Foo::__set_state(array(\n   'b' => 2,\n))"
        );
    }

    #[test]
    fn test_var_export_circular_warns() {
        let buffer = BufferWriter::new();
        let mut state = RuntimeBuilder::new().output(buffer.clone()).build();
        let obj = ObjectRef::new(Handle(1), "stdClass");
        obj.borrow_mut()
            .properties
            .set(ArrayKey::from("me"), Val::Object(obj.clone()));
        var_export(&mut state, &Val::Object(obj), false).unwrap();
        assert_eq!(
            state.error_get_last().map(|e| e.message.as_str()),
            Some("var_export does not handle circular references")
        );
        assert_eq!(
            buffer.contents_lossy(),
            "(object) array(\n   'me' => NULL,\n)"
        );
    }

    #[test]
    fn test_output_goes_to_writer() {
        let buffer = BufferWriter::new();
        let mut state = RuntimeBuilder::new().output(buffer.clone()).build();
        var_dump(&mut state, &[Val::Int(1), Val::Bool(true)]).unwrap();
        assert_eq!(print_r(&mut state, &Val::Int(5), true).unwrap(), Val::from("5"));
        print_r(&mut state, &Val::Int(5), false).unwrap();
        assert_eq!(buffer.contents_lossy(), "int(1)\nbool(true)\n5");
        assert_eq!(gettype(&Val::Float(1.0)), "double");
    }
}
