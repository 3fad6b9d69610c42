mod common;

use common::{messages, test_state};
use php_zval::builtins::serialize::{
    UnserializeError, serialize, serialize_value, unserialize, unserialize_value,
};
use php_zval::core::array::ArrayData;
use php_zval::core::array_key::ArrayKey;
use php_zval::core::value::{Handle, ObjectRef, Val};
use php_zval::vm::error::CollectingErrorHandler;
use php_zval::vm::variable_ops::SymbolTable;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_bytes(rng: &mut StdRng) -> Vec<u8> {
    let len = rng.gen_range(0..12);
    (0..len).map(|_| rng.r#gen::<u8>()).collect()
}

fn random_key(rng: &mut StdRng) -> ArrayKey {
    match rng.gen_range(0..3) {
        0 => ArrayKey::Int(rng.gen_range(-50..50)),
        1 => ArrayKey::from_bytes(rng.gen_range(0..200i64).to_string().as_bytes()),
        _ => ArrayKey::from_bytes(&random_bytes(rng)),
    }
}

fn random_value(rng: &mut StdRng, depth: u32) -> Val {
    let upper = if depth == 0 { 6 } else { 7 };
    match rng.gen_range(0..upper) {
        0 => Val::Null,
        1 => Val::Bool(rng.gen_bool(0.5)),
        2 => Val::Int(rng.r#gen::<i64>()),
        3 => Val::Float(rng.gen_range(-1.0e6..1.0e6)),
        4 => Val::Float(rng.r#gen::<f64>() * 1e-9),
        5 => Val::string(random_bytes(rng)),
        _ => {
            let mut arr = ArrayData::new();
            for _ in 0..rng.gen_range(0..5) {
                if rng.gen_bool(0.5) {
                    arr.push(random_value(rng, depth - 1));
                } else {
                    arr.set(random_key(rng), random_value(rng, depth - 1));
                }
            }
            Val::array(arr)
        }
    }
}

fn fresh_ids() -> impl FnMut() -> Handle {
    let mut next = 0;
    move || {
        next += 1;
        Handle(next)
    }
}

#[test]
fn test_randomized_round_trip() {
    let mut rng = StdRng::seed_from_u64(0x5e71a1);
    for _ in 0..300 {
        let value = random_value(&mut rng, 3);
        let bytes = serialize_value(&value, -1);
        let mut ids = fresh_ids();
        let (back, consumed) = unserialize_value(&bytes, &mut ids)
            .unwrap_or_else(|e| panic!("{:?} failed at {}", String::from_utf8_lossy(&bytes), e.offset()));
        assert_eq!(consumed, bytes.len());
        assert_eq!(back, value, "round trip of {}", String::from_utf8_lossy(&bytes));
    }
}

#[test]
fn test_round_trip_keeps_next_index() {
    let mut arr = ArrayData::new();
    arr.push(Val::Int(1));
    arr.set(ArrayKey::Int(10), Val::Int(2));
    let bytes = serialize_value(&Val::array(arr), -1);
    let mut ids = fresh_ids();
    let (back, _) = unserialize_value(&bytes, &mut ids).unwrap();
    assert_eq!(back.as_array().unwrap().next_free_index(), 11);
}

#[test]
fn test_object_graph_round_trip() {
    let shared = ObjectRef::new(Handle(7), "Point");
    shared
        .borrow_mut()
        .properties
        .set(ArrayKey::from("x"), Val::Int(3));
    let mut arr = ArrayData::new();
    arr.push(Val::Object(shared.clone()));
    arr.set(ArrayKey::from("again"), Val::Object(shared));

    let bytes = serialize_value(&Val::array(arr), -1);
    assert_eq!(
        String::from_utf8(bytes.clone()).unwrap(),
        "a:2:{i:0;O:5:\"Point\":1:{s:1:\"x\";i:3;}s:5:\"again\";r:2;}"
    );

    let mut ids = fresh_ids();
    let (back, _) = unserialize_value(&bytes, &mut ids).unwrap();
    let arr = back.as_array().unwrap();
    match (arr.get(&ArrayKey::Int(0)), arr.get(&ArrayKey::from("again"))) {
        (Some(Val::Object(a)), Some(Val::Object(b))) => {
            assert!(a.ptr_eq(&b));
            assert_eq!(a.id(), Handle(1));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_state_wrappers_report_diagnostics() {
    let (mut state, _out, diagnostics) = test_state();
    let text = serialize(&state, &Val::Float(0.1));
    assert_eq!(text, Val::from("d:0.1;"));

    assert_eq!(unserialize(&mut state, b"a:1:{i:0;}"), Val::Bool(false));
    assert_eq!(unserialize(&mut state, b"b:1;;"), Val::Bool(true));
    let seen = messages(&diagnostics);
    assert_eq!(seen.len(), 2);
    assert!(seen[0].starts_with("unserialize(): Error at offset"));
    assert_eq!(
        seen[1],
        "unserialize(): Extra data starting at offset 4 of 5 bytes"
    );
}

#[test]
fn test_deeply_nested_input_fails_cleanly() {
    let levels = 200_000;
    let mut text = "a:1:{i:0;".repeat(levels);
    text.push_str("N;");
    text.push_str(&"}".repeat(levels));

    let mut ids = fresh_ids();
    match unserialize_value(text.as_bytes(), &mut ids) {
        Err(UnserializeError::MaxDepth { limit, .. }) => assert_eq!(limit, 4096),
        other => panic!("unexpected {:?}", other.map(|(_, n)| n)),
    }

    let (mut state, _out, diagnostics) = test_state();
    assert_eq!(unserialize(&mut state, text.as_bytes()), Val::Bool(false));
    let seen = messages(&diagnostics);
    assert_eq!(seen.len(), 2);
    assert!(seen[0].starts_with("unserialize(): Maximum depth of 4096 exceeded."));
    assert_eq!(
        seen[1],
        format!("unserialize(): Error at offset {} of {} bytes", 4096 * 9 + 5, text.len())
    );
}

#[test]
fn test_depth_limit_follows_ini() {
    let nested = |levels: usize| {
        let mut text = "a:1:{i:0;".repeat(levels);
        text.push_str("i:1;");
        text.push_str(&"}".repeat(levels));
        text
    };
    let (mut state, _out, diagnostics) = test_state();
    assert_eq!(state.ini_set("unserialize_max_depth", "16"), Some("4096".to_string()));
    assert!(unserialize(&mut state, nested(16).as_bytes()).as_array().is_some());
    assert!(diagnostics.borrow().is_empty());

    assert_eq!(unserialize(&mut state, nested(17).as_bytes()), Val::Bool(false));
    assert!(messages(&diagnostics)[0].starts_with("unserialize(): Maximum depth of 16 exceeded."));
}

#[test]
fn test_self_referencing_variable() {
    // $a = []; $a[0] = &$a;
    let mut table = SymbolTable::new();
    let mut errors = CollectingErrorHandler::new();
    table.assign(b"a", Val::empty_array());
    let cell = table.make_ref(b"a");
    table
        .assign_dim_ref(b"a", Some(&Val::Int(0)), cell, &mut errors)
        .unwrap();

    let value = table.get(b"a").unwrap();
    assert_eq!(serialize_value(&value, -1), b"a:1:{i:0;a:1:{i:0;R:2;}}".to_vec());
    assert!(errors.is_empty());
}
