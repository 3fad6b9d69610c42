mod common;

use common::{ik, keys_of, list, values_of};
use php_zval::core::array::ArrayData;
use php_zval::core::value::{Reference, Val, Zval};
use php_zval::vm::comparison::{compare, identical, loose_equals};
use php_zval::vm::error::CollectingErrorHandler;
use php_zval::vm::variable_ops::SymbolTable;

fn ints(values: &[i64]) -> Val {
    list(values.iter().map(|&i| Val::Int(i)).collect())
}

#[test]
fn test_alias_write_is_visible_through_both_names() {
    let mut table = SymbolTable::new();
    table.assign(b"x", Val::Int(1));
    table.assign_ref(b"y", b"x");
    table.assign(b"y", Val::from("changed"));
    assert_eq!(table.get(b"x"), Some(Val::from("changed")));
    table.assign(b"x", Val::Int(7));
    assert_eq!(table.get(b"y"), Some(Val::Int(7)));
}

#[test]
fn test_reference_to_undefined_creates_null() {
    let mut table = SymbolTable::new();
    table.assign_ref(b"a", b"missing");
    assert!(table.contains(b"missing"));
    assert_eq!(table.get(b"missing"), Some(Val::Null));
    assert!(!table.isset(b"a"));
}

#[test]
fn test_rebinding_breaks_old_alias() {
    let mut table = SymbolTable::new();
    table.assign(b"a", Val::Int(1));
    table.assign(b"c", Val::Int(3));
    table.assign_ref(b"b", b"a");
    table.assign_ref(b"b", b"c");
    table.assign(b"b", Val::Int(30));
    assert_eq!(table.get(b"a"), Some(Val::Int(1)));
    assert_eq!(table.get(b"c"), Some(Val::Int(30)));
    assert!(table.is_alias(b"b", b"c"));
    assert!(!table.is_alias(b"a", b"b"));
}

#[test]
fn test_cell_shared_with_array_element() {
    let mut table = SymbolTable::new();
    let mut errors = CollectingErrorHandler::new();
    table.assign(b"v", Val::Int(1));
    let cell = table.make_ref(b"v");
    table
        .assign_dim_ref(b"arr", None, cell, &mut errors)
        .unwrap();
    table.assign(b"v", Val::Int(2));
    assert_eq!(table.get(b"arr"), Some(ints(&[2])));
    assert!(errors.is_empty());
}

#[test]
fn test_array_copy_keeps_shared_element_reference() {
    // $r = &$a[0]; $b = $a; $r = 5;  -> $b[0] is 5 as well
    let mut table = SymbolTable::new();
    let mut errors = CollectingErrorHandler::new();
    table.assign(b"a", ints(&[1, 2]));
    let cell = table
        .make_dim_ref(b"a", &[Some(Val::Int(0))], &mut errors)
        .unwrap();
    table.bind(b"r", cell);
    let copy = table.get(b"a").unwrap();
    table.assign(b"b", copy);
    table.assign(b"r", Val::Int(5));
    assert_eq!(table.get(b"b"), Some(ints(&[5, 2])));
}

#[test]
fn test_separation_drops_unshared_reference() {
    let reference = Reference::new(Val::Int(1));
    let mut arr = ArrayData::new();
    arr.set_slot(ik(0), Zval::Reference(reference.clone()));
    drop(reference);

    let copy = arr.clone();
    assert!(!copy.get_slot(&ik(0)).unwrap().is_ref());
    assert!(arr.get_slot(&ik(0)).unwrap().is_ref());
}

#[test]
fn test_foreach_by_ref_then_by_value() {
    // The classic dangling reference: the second loop writes into $a[2]
    let mut table = SymbolTable::new();
    let mut errors = CollectingErrorHandler::new();
    table.assign(b"a", ints(&[1, 2, 3]));
    table
        .foreach_by_ref(b"a", b"v", &mut errors, |_, _, _| Ok(()))
        .unwrap();
    table
        .foreach_by_value(b"a", b"v", &mut errors, |_, _, _| Ok(()))
        .unwrap();
    assert_eq!(table.get(b"a"), Some(ints(&[1, 2, 2])));
    assert!(errors.is_empty());
}

#[test]
fn test_foreach_by_ref_sees_appended_elements() {
    let mut table = SymbolTable::new();
    let mut errors = CollectingErrorHandler::new();
    table.assign(b"a", ints(&[1, 2]));
    let mut seen = Vec::new();
    table
        .foreach_by_ref(b"a", b"v", &mut errors, |t, key, errors| {
            seen.push(key.clone());
            if t.get(b"a").map(|a| keys_of(&a).len()).unwrap_or(0) < 4 {
                t.assign_dim(b"a", None, Val::Int(0), b'\0', errors)?;
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(seen, vec![ik(0), ik(1), ik(2), ik(3)]);
}

#[test]
fn test_foreach_by_ref_skips_removed_elements() {
    let mut table = SymbolTable::new();
    let mut errors = CollectingErrorHandler::new();
    table.assign(b"a", ints(&[1, 2, 3, 4]));
    let mut seen = Vec::new();
    table
        .foreach_by_ref(b"a", b"v", &mut errors, |t, key, errors| {
            seen.push(key.clone());
            if *key == ik(0) {
                t.unset_dim(b"a", &Val::Int(1), errors)?;
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(seen, vec![ik(0), ik(2), ik(3)]);
    assert_eq!(values_of(&table.get(b"a").unwrap()).len(), 3);
}

#[test]
fn test_foreach_by_value_over_undefined_warns() {
    let mut table = SymbolTable::new();
    let mut errors = CollectingErrorHandler::new();
    table
        .foreach_by_value(b"nope", b"v", &mut errors, |_, _, _| Ok(()))
        .unwrap();
    assert_eq!(
        errors.messages(),
        vec![
            "Undefined variable $nope",
            "foreach() argument must be of type array|object, null given"
        ]
    );
}

#[test]
fn test_unset_one_alias_keeps_value() {
    let mut table = SymbolTable::new();
    table.assign(b"a", ints(&[1]));
    table.assign_ref(b"b", b"a");
    table.unbind(b"a");
    assert_eq!(table.get(b"b"), Some(ints(&[1])));
    assert_eq!(table.len(), 1);
}

#[test]
fn test_self_referencing_arrays_compare_without_looping() {
    // $a = []; $a[0] = &$a; and the same for $b
    let mut table = SymbolTable::new();
    let mut errors = CollectingErrorHandler::new();
    for name in [b"a".as_slice(), b"b".as_slice()] {
        table.assign(name, Val::empty_array());
        let cell = table.make_ref(name);
        table
            .assign_dim_ref(name, Some(&Val::Int(0)), cell, &mut errors)
            .unwrap();
    }
    let a = table.get(b"a").unwrap();
    let b = table.get(b"b").unwrap();

    assert!(identical(&a, &a.clone()));
    assert_eq!(compare(&a, &a), 0);
    assert!(!identical(&a, &b));
    assert_eq!(compare(&a, &b), 1);
    assert!(!loose_equals(&a, &b));
    assert!(errors.is_empty());
}

#[test]
fn test_foreach_by_ref_visits_re_added_key_last() {
    let mut table = SymbolTable::new();
    let mut errors = CollectingErrorHandler::new();
    table.assign(b"a", list(vec![Val::from("a"), Val::from("b"), Val::from("c")]));
    let mut seen = Vec::new();
    table
        .foreach_by_ref(b"a", b"v", &mut errors, |t, key, errors| {
            seen.push(key.clone());
            if seen.len() == 1 {
                t.unset_dim(b"a", &Val::Int(0), errors)?;
                t.assign_dim(b"a", Some(&Val::Int(0)), Val::from("z"), b'\0', errors)?;
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(seen, vec![ik(0), ik(1), ik(2), ik(0)]);
    assert_eq!(keys_of(&table.get(b"a").unwrap()), vec![ik(1), ik(2), ik(0)]);
    assert!(errors.is_empty());
}
