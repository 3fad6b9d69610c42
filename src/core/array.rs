//! Insertion-ordered PHP array
//!
//! Backed by `IndexMap` so iteration (`foreach`, `var_dump`, `print_r`) sees
//! entries in insertion order. Updating an existing key keeps its position;
//! `unset` removes the entry and closes the gap.
//!
//! Reference: $PHP_SRC_PATH/Zend/zend_hash.c

use crate::core::array_key::ArrayKey;
use crate::core::value::{Val, Zval};
use indexmap::IndexMap;
use std::cmp::Ordering;

/// Nesting depth at which comparisons treat arrays as recursive
pub const MAX_NESTING: usize = 256;

/// Array storage with cached metadata
/// Reference: $PHP_SRC_PATH/Zend/zend_hash.h - HashTable::nNextFreeElement
#[derive(Debug, Default)]
pub struct ArrayData {
    map: IndexMap<ArrayKey, Zval>,
    next_free: i64, // Next auto-increment index; never decreases
}

/// Separation copy. References only this array holds are dropped back to plain
/// values, the rest keep aliasing the same cell.
/// Reference: $PHP_SRC_PATH/Zend/zend_hash.c - zend_array_dup_element
impl Clone for ArrayData {
    fn clone(&self) -> Self {
        let map = self
            .map
            .iter()
            .map(|(k, slot)| {
                let slot = match slot {
                    Zval::Reference(r) if r.alias_count() == 1 => Zval::Value(r.get()),
                    other => other.clone(),
                };
                (k.clone(), slot)
            })
            .collect();
        Self {
            map,
            next_free: self.next_free,
        }
    }
}

impl ArrayData {
    pub fn new() -> Self {
        Self {
            map: IndexMap::new(),
            next_free: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: IndexMap::with_capacity(capacity),
            next_free: 0,
        }
    }

    /// Build a list (`[v0, v1, ...]`)
    pub fn from_values(values: impl IntoIterator<Item = Val>) -> Self {
        let mut arr = Self::new();
        for v in values {
            arr.push(v);
        }
        arr
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Dereferenced value stored under `key`
    pub fn get(&self, key: &ArrayKey) -> Option<Val> {
        self.map.get(key).map(Zval::value)
    }

    pub fn get_slot(&self, key: &ArrayKey) -> Option<&Zval> {
        self.map.get(key)
    }

    pub fn get_slot_mut(&mut self, key: &ArrayKey) -> Option<&mut Zval> {
        self.map.get_mut(key)
    }

    pub fn contains_key(&self, key: &ArrayKey) -> bool {
        self.map.contains_key(key)
    }

    fn note_int_key(&mut self, key: &ArrayKey) {
        if let ArrayKey::Int(i) = key {
            if *i >= self.next_free {
                self.next_free = i.saturating_add(1);
            }
        }
    }

    /// `$a[key] = value`: existing entries are updated in place (through the
    /// reference if the element is one), new keys are appended to the order.
    /// Reference: $PHP_SRC_PATH/Zend/zend_hash.c - _zend_hash_index_add_or_update_i
    pub fn set(&mut self, key: ArrayKey, value: Val) {
        if let Some(slot) = self.map.get_mut(&key) {
            slot.assign(value);
            return;
        }
        self.note_int_key(&key);
        self.map.insert(key, Zval::Value(value));
    }

    /// Replace the slot itself (`$a[key] = &$x` rebinds the element)
    pub fn set_slot(&mut self, key: ArrayKey, slot: Zval) {
        self.note_int_key(&key);
        self.map.insert(key, slot);
    }

    /// Slot for `key`, inserting `null` when missing (write context fetch)
    pub fn entry_slot(&mut self, key: ArrayKey) -> &mut Zval {
        self.note_int_key(&key);
        self.map.entry(key).or_insert(Zval::Value(Val::Null))
    }

    /// Next auto-increment key, if it is still free
    /// Reference: $PHP_SRC_PATH/Zend/zend_hash.c - zend_hash_next_free_element
    pub fn next_free_index(&self) -> i64 {
        self.next_free
    }

    fn next_key(&self) -> Option<ArrayKey> {
        let key = ArrayKey::Int(self.next_free);
        if self.map.contains_key(&key) {
            // Only reachable once i64::MAX itself has been used
            None
        } else {
            Some(key)
        }
    }

    /// `$a[] = value`. Returns the key used, or `None` when the next element
    /// is already occupied.
    pub fn append(&mut self, value: Val) -> Option<ArrayKey> {
        self.append_slot(Zval::Value(value))
    }

    pub fn append_slot(&mut self, slot: Zval) -> Option<ArrayKey> {
        let key = self.next_key()?;
        self.note_int_key(&key);
        self.map.insert(key.clone(), slot);
        Some(key)
    }

    /// Append ignoring the occupied case (list construction)
    pub fn push(&mut self, value: Val) {
        let _ = self.append(value);
    }

    /// `unset($a[key])`. The next free index is left untouched.
    pub fn unset(&mut self, key: &ArrayKey) -> Option<Zval> {
        self.map.shift_remove(key)
    }

    pub fn pop(&mut self) -> Option<(ArrayKey, Zval)> {
        self.map.pop()
    }

    /// array_pop(): like `pop`, but hands the auto-increment key back when the
    /// popped element held the last one
    /// Reference: $PHP_SRC_PATH/ext/standard/array.c - PHP_FUNCTION(array_pop)
    pub fn pop_last(&mut self) -> Option<(ArrayKey, Zval)> {
        let (key, slot) = self.map.pop()?;
        if let ArrayKey::Int(i) = key {
            if i >= 0 && i.checked_add(1) == Some(self.next_free) {
                self.next_free = i;
            }
        }
        Some((key, slot))
    }

    pub fn shift(&mut self) -> Option<(ArrayKey, Zval)> {
        self.map.shift_remove_index(0)
    }

    /// Entries in insertion order, dereferenced
    pub fn iter(&self) -> impl Iterator<Item = (&ArrayKey, Val)> + '_ {
        self.map.iter().map(|(k, slot)| (k, slot.value()))
    }

    /// Raw slots in insertion order
    pub fn slots(&self) -> impl Iterator<Item = (&ArrayKey, &Zval)> + '_ {
        self.map.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ArrayKey> + '_ {
        self.map.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = Val> + '_ {
        self.map.values().map(Zval::value)
    }

    pub fn get_index(&self, index: usize) -> Option<(&ArrayKey, &Zval)> {
        self.map.get_index(index)
    }

    pub fn get_index_mut(&mut self, index: usize) -> Option<(&ArrayKey, &mut Zval)> {
        self.map.get_index_mut(index)
    }

    pub fn index_of(&self, key: &ArrayKey) -> Option<usize> {
        self.map.get_index_of(key)
    }

    pub fn first_key(&self) -> Option<&ArrayKey> {
        self.map.first().map(|(k, _)| k)
    }

    pub fn last_key(&self) -> Option<&ArrayKey> {
        self.map.last().map(|(k, _)| k)
    }

    /// Keys are exactly 0..N-1 in order (what json_encode emits as a list)
    /// Reference: $PHP_SRC_PATH/Zend/zend_hash.h - zend_array_is_list
    pub fn is_list(&self) -> bool {
        self.map
            .keys()
            .enumerate()
            .all(|(i, k)| matches!(k, ArrayKey::Int(n) if *n == i as i64))
    }

    /// Array union (`$a + $b`): keys of `self` win, `other` contributes only
    /// keys missing from `self`, in its own order.
    /// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - add_function_array
    pub fn plus(&self, other: &ArrayData) -> ArrayData {
        let mut result = self.clone();
        for (key, slot) in other.map.iter() {
            if !result.map.contains_key(key) {
                result.set_slot(key.clone(), slot.clone());
            }
        }
        result
    }

    /// Drop all entries and reset the next index
    pub fn clear(&mut self) {
        self.map.clear();
        self.next_free = 0;
    }

    /// Rebuild with sequential int keys (string keys kept), as array_merge,
    /// sort() and array_values() leave their results
    pub fn renumber(&self) -> ArrayData {
        let mut out = ArrayData::with_capacity(self.len());
        for (key, slot) in self.map.iter() {
            match key {
                ArrayKey::Int(_) => {
                    let _ = out.append_slot(slot.clone());
                }
                ArrayKey::Str(_) => out.set_slot(key.clone(), slot.clone()),
            }
        }
        out
    }

    /// Reorder entries with a comparator (stable, keys kept)
    ///
    /// PHP comparators need not be a total order (NAN, mixed string/number
    /// operands, user callbacks), so this never trusts the comparator to be
    /// consistent. Any answer it gives still yields a permutation.
    /// Reference: $PHP_SRC_PATH/Zend/zend_sort.c - zend_sort
    pub fn sort_by<F>(&mut self, mut cmp: F)
    where
        F: FnMut((&ArrayKey, &Zval), (&ArrayKey, &Zval)) -> Ordering,
    {
        let mut entries: Vec<(ArrayKey, Zval)> = std::mem::take(&mut self.map).into_iter().collect();
        merge_sort(&mut entries, &mut |a, b| cmp((&a.0, &a.1), (&b.0, &b.1)));
        self.map = entries.into_iter().collect();
    }
}

const INSERTION_SORT_THRESHOLD: usize = 16;

/// Stable sort that only moves elements on `Greater`
fn merge_sort<T, F>(items: &mut Vec<T>, cmp: &mut F)
where
    F: FnMut(&T, &T) -> Ordering,
{
    if items.len() <= INSERTION_SORT_THRESHOLD {
        insertion_sort(items, cmp);
        return;
    }
    let mut right = items.split_off(items.len() / 2);
    merge_sort(items, cmp);
    merge_sort(&mut right, cmp);

    let left = std::mem::take(items);
    items.reserve(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        let next = if cmp(l, r) == Ordering::Greater {
            right.next()
        } else {
            left.next()
        };
        items.extend(next);
    }
    items.extend(left);
    items.extend(right);
}

fn insertion_sort<T, F>(items: &mut [T], cmp: &mut F)
where
    F: FnMut(&T, &T) -> Ordering,
{
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && cmp(&items[j - 1], &items[j]) == Ordering::Greater {
            items.swap(j - 1, j);
            j -= 1;
        }
    }
}

impl FromIterator<(ArrayKey, Val)> for ArrayData {
    fn from_iter<I: IntoIterator<Item = (ArrayKey, Val)>>(iter: I) -> Self {
        let mut arr = ArrayData::new();
        for (k, v) in iter {
            arr.set(k, v);
        }
        arr
    }
}

/// Identity comparison (`===`): same entries in the same order
impl PartialEq for ArrayData {
    fn eq(&self, other: &Self) -> bool {
        self.identical_within(other, 0)
    }
}

impl ArrayData {
    /// `===` at nesting level `depth`. Past `MAX_NESTING` the arrays are
    /// taken to be recursive and reported unequal.
    /// Reference: $PHP_SRC_PATH/Zend/zend_hash.c - zend_hash_compare
    pub(crate) fn identical_within(&self, other: &ArrayData, depth: usize) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if depth >= MAX_NESTING {
            return false;
        }
        // next_free is cached metadata, not part of the value
        self.map.len() == other.map.len()
            && self
                .map
                .iter()
                .zip(other.map.iter())
                .all(|((k1, s1), (k2, s2))| {
                    k1 == k2 && (same_cell(s1, s2) || identical_at(&s1.value(), &s2.value(), depth + 1))
                })
    }
}

/// Two slots bound to one reference cell
pub(crate) fn same_cell(a: &Zval, b: &Zval) -> bool {
    matches!((a, b), (Zval::Reference(x), Zval::Reference(y)) if x.ptr_eq(y))
}

fn identical_at(a: &Val, b: &Val, depth: usize) -> bool {
    match (a, b) {
        (Val::Array(x), Val::Array(y)) => x.identical_within(y, depth),
        _ => a == b,
    }
}
