use crate::core::array::ArrayData;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt::Debug;
use std::rc::Rc;

/// Object identifier, as reported by `spl_object_id()` and `var_dump` (`#N`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub u32);

/// The dynamic PHP value (zval payload).
///
/// Strings and arrays are reference counted and copied on write: cloning a
/// `Val` never copies bytes or entries. Objects are handles, so clones alias
/// the same instance.
#[derive(Debug, Clone)]
pub enum Val {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<Vec<u8>>), // PHP strings are byte arrays (COW)
    Array(Rc<ArrayData>), // Ordered hash map with cached next index (COW)
    Object(ObjectRef),
}

/// PHP identity (`===`)
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - zend_is_identical
impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Null, Val::Null) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a == b,
            (Val::String(a), Val::String(b)) => a == b,
            (Val::Array(a), Val::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            (Val::Object(a), Val::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Val {
    /// Type name as used in PHP error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Bool(_) => "bool",
            Val::Int(_) => "int",
            Val::Float(_) => "float",
            Val::String(_) => "string",
            Val::Array(_) => "array",
            Val::Object(_) => "object",
        }
    }

    /// Type name as returned by gettype()
    pub fn gettype(&self) -> &'static str {
        match self {
            Val::Null => "NULL",
            Val::Bool(_) => "boolean",
            Val::Int(_) => "integer",
            Val::Float(_) => "double",
            Val::String(_) => "string",
            Val::Array(_) => "array",
            Val::Object(_) => "object",
        }
    }

    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Val::String(Rc::new(bytes.into()))
    }

    pub fn array(data: ArrayData) -> Self {
        Val::Array(Rc::new(data))
    }

    pub fn empty_array() -> Self {
        Val::Array(Rc::new(ArrayData::new()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Val::Null)
    }

    pub fn as_array(&self) -> Option<&ArrayData> {
        match self {
            Val::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Val::String(s) => Some(s.as_slice()),
            _ => None,
        }
    }

    /// Separate and borrow the array for writing.
    ///
    /// The first write to an array shared with another value clones its top
    /// level; nested arrays stay shared until they are written themselves.
    pub fn array_mut(&mut self) -> Option<&mut ArrayData> {
        match self {
            Val::Array(arr) => Some(Rc::make_mut(arr)),
            _ => None,
        }
    }

    /// Separate and borrow the string buffer for writing
    pub fn bytes_mut(&mut self) -> Option<&mut Vec<u8>> {
        match self {
            Val::String(s) => Some(Rc::make_mut(s)),
            _ => None,
        }
    }

    /// Convert to boolean following PHP rules
    /// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - zend_is_true
    pub fn to_bool(&self) -> bool {
        match self {
            Val::Null => false,
            Val::Bool(b) => *b,
            Val::Int(i) => *i != 0,
            Val::Float(f) => *f != 0.0,
            Val::String(s) => !s.is_empty() && s.as_slice() != b"0",
            Val::Array(arr) => !arr.is_empty(),
            Val::Object(_) => true,
        }
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}

impl From<i64> for Val {
    fn from(i: i64) -> Self {
        Val::Int(i)
    }
}

impl From<f64> for Val {
    fn from(f: f64) -> Self {
        Val::Float(f)
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::String(Rc::new(s.as_bytes().to_vec()))
    }
}

impl From<&[u8]> for Val {
    fn from(s: &[u8]) -> Self {
        Val::String(Rc::new(s.to_vec()))
    }
}

impl From<Vec<u8>> for Val {
    fn from(s: Vec<u8>) -> Self {
        Val::String(Rc::new(s))
    }
}

impl From<ArrayData> for Val {
    fn from(arr: ArrayData) -> Self {
        Val::Array(Rc::new(arr))
    }
}

#[derive(Debug, Clone)]
pub struct ObjectData {
    pub id: Handle,
    pub class: Rc<str>,
    pub properties: ArrayData,
}

/// Shared object handle; cloning aliases the same instance
#[derive(Debug, Clone)]
pub struct ObjectRef(Rc<RefCell<ObjectData>>);

impl ObjectRef {
    pub fn new(id: Handle, class: &str) -> Self {
        Self::with_properties(id, class, ArrayData::new())
    }

    pub fn with_properties(id: Handle, class: &str, properties: ArrayData) -> Self {
        ObjectRef(Rc::new(RefCell::new(ObjectData {
            id,
            class: Rc::from(class),
            properties,
        })))
    }

    pub fn id(&self) -> Handle {
        self.0.borrow().id
    }

    pub fn class_name(&self) -> Rc<str> {
        self.0.borrow().class.clone()
    }

    pub fn borrow(&self) -> Ref<'_, ObjectData> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, ObjectData> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A PHP reference cell (`zend_reference`): every alias of `&$x` holds one.
#[derive(Debug, Clone)]
pub struct Reference(Rc<RefCell<Val>>);

impl Reference {
    pub fn new(val: Val) -> Self {
        Reference(Rc::new(RefCell::new(val)))
    }

    pub fn get(&self) -> Val {
        self.0.borrow().clone()
    }

    pub fn set(&self, val: Val) {
        *self.0.borrow_mut() = val;
    }

    pub fn borrow(&self) -> Ref<'_, Val> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Val> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &Reference) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of slots (variables, array elements, captured handles) aliasing this cell
    pub fn alias_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

// The Container (Zval equivalent): a storage slot in a symbol table or array
#[derive(Debug, Clone)]
pub enum Zval {
    Value(Val),
    Reference(Reference), // Explicit Reference (&$a)
}

impl Zval {
    /// Dereferenced value
    pub fn value(&self) -> Val {
        match self {
            Zval::Value(v) => v.clone(),
            Zval::Reference(r) => r.get(),
        }
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Zval::Reference(_))
    }

    /// Assign, writing through the reference cell if the slot is one
    pub fn assign(&mut self, val: Val) {
        match self {
            Zval::Value(v) => *v = val,
            Zval::Reference(r) => r.set(val),
        }
    }

    /// Turn the slot into a reference (if it is not one yet) and return the cell
    pub fn make_ref(&mut self) -> Reference {
        match self {
            Zval::Reference(r) => r.clone(),
            Zval::Value(v) => {
                let r = Reference::new(std::mem::replace(v, Val::Null));
                *self = Zval::Reference(r.clone());
                r
            }
        }
    }

    /// Run `f` against the dereferenced value in place
    pub fn with_value_mut<R>(&mut self, f: impl FnOnce(&mut Val) -> R) -> R {
        match self {
            Zval::Value(v) => f(v),
            Zval::Reference(r) => f(&mut r.borrow_mut()),
        }
    }
}

impl From<Val> for Zval {
    fn from(val: Val) -> Self {
        Zval::Value(val)
    }
}
