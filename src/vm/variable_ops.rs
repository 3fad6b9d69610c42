//! Variable operations module
//!
//! Symbol tables and the reference graph built on top of them.
//!
//! ## PHP Variable Semantics
//!
//! - Variables are created on first assignment
//! - Undefined variables produce warnings and read as null
//! - References allow multiple names for the same value
//!
//! ## Reference Handling
//!
//! ```php
//! $a = &$b;  // $a and $b share one reference cell
//! $a = 5;    // Both $a and $b now equal 5
//! unset($a); // only the name goes away, $b keeps the cell
//! ```
//!
//! Every slot is a [`Zval`]: a plain value, or a [`Reference`] cell shared by
//! all aliases. Assigning to a slot that holds a reference writes through the
//! cell; `bind` replaces the slot itself. Array elements follow the same model,
//! which is what makes `foreach ($a as &$v)` and `$x = &$a['k']` work.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_execute.c` - ZEND_FETCH_*/ZEND_ASSIGN_*
//! - Zend: `$PHP_SRC_PATH/Zend/zend_vm_def.h` - ZEND_FE_FETCH_RW
//! - Zend: `$PHP_SRC_PATH/Zend/zend_variables.c` - Variable management

use crate::core::array_key::ArrayKey;
use crate::core::value::{Reference, Val, Zval};
use crate::vm::array_access;
use crate::vm::error::{ErrorHandler, ErrorLevel, VmError};
use indexmap::IndexMap;

/// A scope's variables in declaration order
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    vars: IndexMap<Vec<u8>, Zval>,
}

fn display_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn report_undefined(name: &[u8], errors: &mut dyn ErrorHandler) {
    errors.report(
        ErrorLevel::Warning,
        &format!("Undefined variable ${}", display_name(name)),
    );
}

fn foreach_type_warning(val: &Val, errors: &mut dyn ErrorHandler) {
    errors.report(
        ErrorLevel::Warning,
        &format!(
            "foreach() argument must be of type array|object, {} given",
            val.type_name()
        ),
    );
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            vars: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn contains(&self, name: &[u8]) -> bool {
        self.vars.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.vars.keys().map(|k| k.as_slice())
    }

    pub fn slot(&self, name: &[u8]) -> Option<&Zval> {
        self.vars.get(name)
    }

    /// Slot for `name`, created as null when undefined
    pub fn slot_mut(&mut self, name: &[u8]) -> &mut Zval {
        self.vars
            .entry(name.to_vec())
            .or_insert(Zval::Value(Val::Null))
    }

    /// Value of a defined variable
    pub fn get(&self, name: &[u8]) -> Option<Val> {
        self.vars.get(name).map(Zval::value)
    }

    /// Read in value context: undefined variables warn and yield null
    /// Reference: $PHP_SRC_PATH/Zend/zend_execute.c - zval_undefined_cv
    pub fn read(&self, name: &[u8], errors: &mut dyn ErrorHandler) -> Val {
        match self.get(name) {
            Some(v) => v,
            None => {
                report_undefined(name, errors);
                Val::Null
            }
        }
    }

    /// Strict read used where PHP 8 throws (`compact`, `$$name` in strict mode)
    pub fn require(&self, name: &[u8]) -> Result<Val, VmError> {
        self.get(name).ok_or_else(|| VmError::UndefinedVariable {
            name: display_name(name),
        })
    }

    /// `isset($name)`
    pub fn isset(&self, name: &[u8]) -> bool {
        matches!(self.get(name), Some(v) if !v.is_null())
    }

    /// `$name = value`; writes through a reference cell when bound to one
    pub fn assign(&mut self, name: &[u8], val: Val) {
        match self.vars.get_mut(name) {
            Some(slot) => slot.assign(val),
            None => {
                self.vars.insert(name.to_vec(), Zval::Value(val));
            }
        }
    }

    /// `&$name`: promote the slot to a reference (creating null if missing)
    /// and return the shared cell
    pub fn make_ref(&mut self, name: &[u8]) -> Reference {
        self.slot_mut(name).make_ref()
    }

    /// Point `name` at an existing cell (by-reference parameter, `global`,
    /// `static`, `$name = &...`)
    pub fn bind(&mut self, name: &[u8], cell: Reference) {
        self.vars.insert(name.to_vec(), Zval::Reference(cell));
    }

    /// `$dst = &$src`
    pub fn assign_ref(&mut self, dst: &[u8], src: &[u8]) {
        let cell = self.make_ref(src);
        self.bind(dst, cell);
    }

    /// `unset($name)`: drops the name only; other aliases keep the cell
    pub fn unbind(&mut self, name: &[u8]) -> bool {
        self.vars.shift_remove(name).is_some()
    }

    /// Whether two names alias the same cell
    pub fn is_alias(&self, a: &[u8], b: &[u8]) -> bool {
        match (self.vars.get(a), self.vars.get(b)) {
            (Some(Zval::Reference(x)), Some(Zval::Reference(y))) => x.ptr_eq(y),
            _ => false,
        }
    }

    /// `$name[$dim]` in read context
    pub fn fetch_dim(&self, name: &[u8], dim: &Val, errors: &mut dyn ErrorHandler) -> Result<Val, VmError> {
        let container = self.read(name, errors);
        array_access::fetch_dim(&container, dim, errors)
    }

    /// `$name[$d0][$d1]...` in read context
    pub fn fetch_dim_path(
        &self,
        name: &[u8],
        path: &[Val],
        errors: &mut dyn ErrorHandler,
    ) -> Result<Val, VmError> {
        let mut current = self.read(name, errors);
        for dim in path {
            current = array_access::fetch_dim(&current, dim, errors)?;
        }
        Ok(current)
    }

    /// `isset($name[$dim])`
    pub fn isset_dim(&self, name: &[u8], dim: &Val) -> bool {
        match self.get(name) {
            Some(container) => array_access::isset_dim(&container, dim),
            None => false,
        }
    }

    /// `$name[$dim] = value` (`dim == None` appends). Null or undefined
    /// variables become arrays; string variables take a byte at the offset.
    pub fn assign_dim(
        &mut self,
        name: &[u8],
        dim: Option<&Val>,
        val: Val,
        pad: u8,
        errors: &mut dyn ErrorHandler,
    ) -> Result<(), VmError> {
        self.slot_mut(name)
            .with_value_mut(|container| array_access::assign_dim(container, dim, val, pad, errors))
    }

    /// `$name[$d0][$d1]... = value`. `None` entries in the path append.
    pub fn assign_dim_path(
        &mut self,
        name: &[u8],
        path: &[Option<Val>],
        val: Val,
        pad: u8,
        errors: &mut dyn ErrorHandler,
    ) -> Result<(), VmError> {
        let slot = self.slot_mut(name);
        assign_path(slot, path, val, pad, errors)
    }

    /// `&$name[$d0]...`: the element becomes a reference (created as null
    /// when missing) and its cell is returned
    pub fn make_dim_ref(
        &mut self,
        name: &[u8],
        path: &[Option<Val>],
        errors: &mut dyn ErrorHandler,
    ) -> Result<Reference, VmError> {
        let slot = self.slot_mut(name);
        make_path_ref(slot, path, errors)
    }

    /// `$name[$dim] = &$cell`
    pub fn assign_dim_ref(
        &mut self,
        name: &[u8],
        dim: Option<&Val>,
        cell: Reference,
        errors: &mut dyn ErrorHandler,
    ) -> Result<(), VmError> {
        self.slot_mut(name).with_value_mut(|container| {
            array_access::assign_dim_ref(container, dim, Zval::Reference(cell), errors)
        })
    }

    /// `unset($name[$dim])`
    pub fn unset_dim(&mut self, name: &[u8], dim: &Val, errors: &mut dyn ErrorHandler) -> Result<(), VmError> {
        match self.vars.get_mut(name) {
            Some(slot) => slot.with_value_mut(|container| array_access::unset_dim(container, dim, errors)),
            None => Ok(()),
        }
    }

    /// `foreach ($array_var as $key => $value_var)`.
    ///
    /// Iterates a snapshot: the array is shared copy-on-write, so writes to
    /// `$array_var` inside the body do not affect the iteration.
    pub fn foreach_by_value<F>(
        &mut self,
        array_var: &[u8],
        value_var: &[u8],
        errors: &mut dyn ErrorHandler,
        mut body: F,
    ) -> Result<(), VmError>
    where
        F: FnMut(&mut SymbolTable, &ArrayKey, &mut dyn ErrorHandler) -> Result<(), VmError>,
    {
        let snapshot = self.read(array_var, errors);
        let Some(arr) = snapshot.as_array() else {
            foreach_type_warning(&snapshot, errors);
            return Ok(());
        };
        for (key, value) in arr.iter() {
            self.assign(value_var, value);
            body(self, key, &mut *errors)?;
        }
        Ok(())
    }

    /// `foreach ($array_var as $key => &$value_var)`.
    ///
    /// Walks the live array. Each element is turned into a reference and
    /// `$value_var` is bound to it, so writes through `$value_var` land in the
    /// array. The position is recomputed after every iteration from the
    /// nearest visited entry still in place: unsetting the current or earlier
    /// elements keeps the order of the rest, removed elements that were not
    /// reached yet are skipped, and appended or re-added elements are visited. After the loop `$value_var` still
    /// aliases the last element.
    /// Reference: $PHP_SRC_PATH/Zend/zend_vm_def.h - ZEND_FE_FETCH_RW
    pub fn foreach_by_ref<F>(
        &mut self,
        array_var: &[u8],
        value_var: &[u8],
        errors: &mut dyn ErrorHandler,
        mut body: F,
    ) -> Result<(), VmError>
    where
        F: FnMut(&mut SymbolTable, &ArrayKey, &mut dyn ErrorHandler) -> Result<(), VmError>,
    {
        match self.get(array_var) {
            Some(Val::Array(_)) => {}
            Some(other) => {
                foreach_type_warning(&other, errors);
                return Ok(());
            }
            None => {
                report_undefined(array_var, errors);
                foreach_type_warning(&Val::Null, errors);
                return Ok(());
            }
        }

        // Visited entries with the cell each was bound to. An entry whose slot
        // no longer holds that cell was removed, possibly re-added at the end.
        let mut visited: Vec<(ArrayKey, Reference)> = Vec::new();
        let mut pos = 0usize;
        loop {
            // Fetch the element at `pos` and promote it to a reference
            let step = self.slot_mut(array_var).with_value_mut(|container| {
                let arr = container.array_mut()?;
                let key = arr.get_index(pos).map(|(k, _)| k.clone())?;
                let cell = arr.get_slot_mut(&key)?.make_ref();
                Some((key, cell))
            });
            let Some((key, cell)) = step else {
                break;
            };

            self.bind(value_var, cell.clone());
            visited.push((key.clone(), cell));
            body(self, &key, &mut *errors)?;

            let Some(container) = self.get(array_var) else {
                break;
            };
            let Some(arr) = container.as_array() else {
                break;
            };
            let surviving = |(k, cell): &(ArrayKey, Reference)| {
                let i = arr.index_of(k)?;
                match arr.get_slot(k) {
                    Some(Zval::Reference(r)) if r.ptr_eq(cell) => Some(i),
                    _ => None,
                }
            };
            pos = visited.iter().rev().find_map(surviving).map_or(0, |i| i + 1);
        }
        Ok(())
    }
}

fn assign_path(
    slot: &mut Zval,
    path: &[Option<Val>],
    val: Val,
    pad: u8,
    errors: &mut dyn ErrorHandler,
) -> Result<(), VmError> {
    match path {
        [] => {
            slot.assign(val);
            Ok(())
        }
        [last] => slot.with_value_mut(|container| {
            array_access::assign_dim(container, last.as_ref(), val, pad, errors)
        }),
        [first, rest @ ..] => slot.with_value_mut(|container| {
            let inner = array_access::dim_slot_mut(container, first.as_ref(), errors)?;
            assign_path(inner, rest, val, pad, errors)
        }),
    }
}

fn make_path_ref(
    slot: &mut Zval,
    path: &[Option<Val>],
    errors: &mut dyn ErrorHandler,
) -> Result<Reference, VmError> {
    match path {
        [] => Ok(slot.make_ref()),
        [first, rest @ ..] => slot.with_value_mut(|container| {
            let inner = array_access::dim_slot_mut(container, first.as_ref(), errors)?;
            make_path_ref(inner, rest, errors)
        }),
    }
}
