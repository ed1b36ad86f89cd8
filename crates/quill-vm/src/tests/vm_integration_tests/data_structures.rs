use super::helpers::*;
use crate::config::VmConfig;
use crate::error::VmError;
use crate::opcode::OpCode;
use crate::value::{Value, ValueMap};

// ============================================================================
// Arrays
// ============================================================================

#[test]
fn test_array_index() {
    let mut p = Program::new();
    p.int(10).int(20).int(30).op(OpCode::Array, &[3]);
    p.int(1).op(OpCode::Index, &[]).op(OpCode::SetGlobal, &[0]);
    assert_eq!(run_global(p).unwrap(), Value::Int(20));
}

#[test]
fn test_array_index_out_of_range_is_undefined() {
    let mut p = Program::new();
    p.int(1).op(OpCode::Array, &[1]);
    p.int(5).op(OpCode::Index, &[]).op(OpCode::SetGlobal, &[0]);
    p.int(1).op(OpCode::Array, &[1]);
    p.int(-1).op(OpCode::Index, &[]).op(OpCode::SetGlobal, &[1]);

    let (vm, result) = run_with_config(p, VmConfig::default());
    result.unwrap();
    assert_eq!(vm.global(0), Value::Undefined);
    assert_eq!(vm.global(1), Value::Undefined);
}

#[test]
fn test_array_index_assignment() {
    // arr := [1, 2, 3]; arr[2] = 7
    let mut p = Program::with_locals(1);
    p.int(1).int(2).int(3).op(OpCode::Array, &[3]).op(OpCode::DefineLocal, &[0]);
    p.int(7).int(2).op(OpCode::SetSelLocal, &[0, 1]);
    p.op(OpCode::GetLocal, &[0]).op(OpCode::SetGlobal, &[0]);
    assert_eq!(run_global(p).unwrap(), ints(&[1, 2, 7]));
}

#[test]
fn test_array_assignment_out_of_bounds() {
    let mut p = Program::with_locals(1);
    p.int(1).op(OpCode::Array, &[1]).op(OpCode::DefineLocal, &[0]);
    p.int(7).int(3).op(OpCode::SetSelLocal, &[0, 1]);
    assert_eq!(run_error(p), VmError::IndexOutOfBounds);
}

#[test]
fn test_immutable_array_rejects_assignment() {
    let mut p = Program::with_locals(1);
    p.int(1)
        .int(2)
        .op(OpCode::Array, &[2])
        .op(OpCode::Immutable, &[])
        .op(OpCode::DefineLocal, &[0]);
    p.int(9).int(0).op(OpCode::SetSelLocal, &[0, 1]);
    assert_eq!(
        run_error(p),
        VmError::NotIndexAssignable("immutable-array".into())
    );
}

#[test]
fn test_immutable_map_rejects_assignment() {
    let mut p = Program::with_locals(1);
    p.str("a")
        .int(1)
        .op(OpCode::Map, &[2])
        .op(OpCode::Immutable, &[])
        .op(OpCode::DefineLocal, &[0]);
    p.int(2).str("a").op(OpCode::SetSelLocal, &[0, 1]);
    assert_eq!(
        run_error(p),
        VmError::NotIndexAssignable("immutable-map".into())
    );
}

#[test]
fn test_immutable_array_still_readable() {
    let mut p = Program::new();
    p.int(4).op(OpCode::Array, &[1]).op(OpCode::Immutable, &[]);
    p.int(0).op(OpCode::Index, &[]).op(OpCode::SetGlobal, &[0]);
    assert_eq!(run_global(p).unwrap(), Value::Int(4));
}

#[test]
fn test_slice() {
    let mut p = Program::new();
    p.int(0).int(1).int(2).int(3).int(4).op(OpCode::Array, &[5]);
    p.int(1).int(3).op(OpCode::SliceIndex, &[]).op(OpCode::SetGlobal, &[0]);
    p.str("hello").op(OpCode::Null, &[]).int(2);
    p.op(OpCode::SliceIndex, &[]).op(OpCode::SetGlobal, &[1]);

    let (vm, result) = run_with_config(p, VmConfig::default());
    result.unwrap();
    assert_eq!(vm.global(0), ints(&[1, 2]));
    assert_eq!(vm.global(1), Value::from("he"));
}

#[test]
fn test_slice_with_inverted_bounds() {
    let mut p = Program::new();
    p.int(0).int(1).op(OpCode::Array, &[2]);
    p.int(3).int(1).op(OpCode::SliceIndex, &[]);
    assert_eq!(run_error(p), VmError::InvalidSliceIndex { low: 3, high: 1 });
}

// ============================================================================
// Strings, maps and errors
// ============================================================================

#[test]
fn test_string_index_is_char() {
    let mut p = Program::new();
    p.str("añb").int(1).op(OpCode::Index, &[]).op(OpCode::SetGlobal, &[0]);
    assert_eq!(run_global(p).unwrap(), Value::Char('ñ'));
}

#[test]
fn test_map_get_and_set() {
    // m := {a: 1}; m.b = 2; g0 = m.a; g1 = m.missing
    let mut p = Program::with_locals(1);
    p.str("a").int(1).op(OpCode::Map, &[2]).op(OpCode::DefineLocal, &[0]);
    p.int(2).str("b").op(OpCode::SetSelLocal, &[0, 1]);
    p.op(OpCode::GetLocal, &[0])
        .str("a")
        .op(OpCode::Index, &[])
        .op(OpCode::SetGlobal, &[0]);
    p.op(OpCode::GetLocal, &[0])
        .str("missing")
        .op(OpCode::Index, &[])
        .op(OpCode::SetGlobal, &[1]);
    p.op(OpCode::GetLocal, &[0]).op(OpCode::SetGlobal, &[2]);

    let (vm, result) = run_with_config(p, VmConfig::default());
    result.unwrap();
    assert_eq!(vm.global(0), Value::Int(1));
    assert_eq!(vm.global(1), Value::Undefined);

    let mut expected = ValueMap::new();
    expected.insert("a".into(), Value::Int(1));
    expected.insert("b".into(), Value::Int(2));
    assert_eq!(vm.global(2), Value::map(expected));
}

#[test]
fn test_nested_selector_assignment() {
    // m := {inner: [0, 0]}; m.inner[1] = 5
    let mut p = Program::with_locals(1);
    p.str("inner").int(0).int(0).op(OpCode::Array, &[2]);
    p.op(OpCode::Map, &[2]).op(OpCode::DefineLocal, &[0]);
    p.int(5).int(1).str("inner").op(OpCode::SetSelLocal, &[0, 2]);
    p.op(OpCode::GetLocal, &[0])
        .str("inner")
        .op(OpCode::Index, &[])
        .op(OpCode::SetGlobal, &[0]);
    assert_eq!(run_global(p).unwrap(), ints(&[0, 5]));
}

#[test]
fn test_map_key_must_be_defined() {
    let mut p = Program::new();
    p.op(OpCode::Null, &[]).int(1).op(OpCode::Map, &[2]);
    assert_eq!(run_error(p), VmError::InvalidIndexType("undefined".into()));
}

#[test]
fn test_error_value() {
    let mut p = Program::with_locals(1);
    p.str("boom").op(OpCode::Error, &[]).op(OpCode::DefineLocal, &[0]);
    p.op(OpCode::GetLocal, &[0])
        .str("value")
        .op(OpCode::Index, &[])
        .op(OpCode::SetGlobal, &[0]);
    assert_eq!(run_global(p).unwrap(), Value::from("boom"));

    let mut p = Program::new();
    p.str("boom").op(OpCode::Error, &[]);
    p.str("message").op(OpCode::Index, &[]);
    assert_eq!(run_error(p), VmError::InvalidIndexOnError);
}

#[test]
fn test_index_non_indexable() {
    let mut p = Program::new();
    p.int(3).int(0).op(OpCode::Index, &[]);
    assert_eq!(run_error(p), VmError::NotIndexable("int".into()));
}

// ============================================================================
// copy and delete builtins
// ============================================================================

#[test]
fn test_delete_map_keys() {
    let mut p = Program::with_locals(1);
    p.str("a").int(1).str("b").int(2).str("c").int(3);
    p.op(OpCode::Map, &[6]).op(OpCode::DefineLocal, &[0]);
    p.builtin("delete")
        .op(OpCode::GetLocal, &[0])
        .str("a")
        .str("c")
        .call(3)
        .op(OpCode::Pop, &[]);
    p.op(OpCode::GetLocal, &[0]).op(OpCode::SetGlobal, &[0]);

    let mut expected = ValueMap::new();
    expected.insert("b".into(), Value::Int(2));
    assert_eq!(run_global(p).unwrap(), Value::map(expected));
}

#[test]
fn test_delete_from_array_fails() {
    let mut p = Program::new();
    p.builtin("delete");
    p.int(1).op(OpCode::Array, &[1]).int(0).call(2);
    assert!(matches!(run_error(p), VmError::NotIndexDeletable(t) if t == "array"));
}

#[test]
fn test_copy_is_independent() {
    // a := [[1, 2]]; b := copy(a); b[0][1] = 9
    let mut p = Program::with_locals(2);
    p.int(1)
        .int(2)
        .op(OpCode::Array, &[2])
        .op(OpCode::Array, &[1])
        .op(OpCode::DefineLocal, &[0]);
    p.builtin("copy")
        .op(OpCode::GetLocal, &[0])
        .call(1)
        .op(OpCode::DefineLocal, &[1]);
    p.int(9).int(1).int(0).op(OpCode::SetSelLocal, &[1, 2]);
    p.op(OpCode::GetLocal, &[0]).op(OpCode::SetGlobal, &[0]);
    p.op(OpCode::GetLocal, &[1]).op(OpCode::SetGlobal, &[1]);

    let (vm, result) = run_with_config(p, VmConfig::default());
    result.unwrap();
    assert_eq!(vm.global(0), Value::array(vec![ints(&[1, 2])]));
    assert_eq!(vm.global(1), Value::array(vec![ints(&[1, 9])]));
}

#[test]
fn test_shared_reference_without_copy() {
    let mut p = Program::with_locals(2);
    p.int(1).op(OpCode::Array, &[1]).op(OpCode::DefineLocal, &[0]);
    p.op(OpCode::GetLocal, &[0]).op(OpCode::DefineLocal, &[1]);
    p.int(5).int(0).op(OpCode::SetSelLocal, &[1, 1]);
    p.op(OpCode::GetLocal, &[0]).op(OpCode::SetGlobal, &[0]);
    assert_eq!(run_global(p).unwrap(), ints(&[5]));
}

#[test]
fn test_copy_of_self_containing_map() {
    // m := {}; m.self = m; c := copy(m)
    let mut p = Program::with_locals(2);
    p.op(OpCode::Map, &[0]).op(OpCode::DefineLocal, &[0]);
    p.op(OpCode::GetLocal, &[0])
        .str("self")
        .op(OpCode::SetSelLocal, &[0, 1]);
    p.builtin("copy")
        .op(OpCode::GetLocal, &[0])
        .call(1)
        .op(OpCode::DefineLocal, &[1]);
    p.op(OpCode::GetLocal, &[1]).op(OpCode::SetGlobal, &[0]);
    p.op(OpCode::GetLocal, &[0])
        .op(OpCode::GetLocal, &[1])
        .op(OpCode::Equal, &[])
        .op(OpCode::SetGlobal, &[1]);
    // c.x = 1 leaves m alone
    p.int(1).str("x").op(OpCode::SetSelLocal, &[1, 1]);
    p.op(OpCode::GetLocal, &[0])
        .str("x")
        .op(OpCode::Index, &[])
        .op(OpCode::SetGlobal, &[2]);

    let (vm, result) = run_with_config(p, VmConfig::default());
    result.unwrap();
    let Value::Map(copy) = vm.global(0) else {
        panic!("expected a map");
    };
    let inner = copy.borrow()["self"].clone();
    assert!(matches!(&inner, Value::Map(m) if std::rc::Rc::ptr_eq(m, &copy)));
    assert_eq!(vm.global(1), Value::Bool(true));
    assert_eq!(vm.global(2), Value::Undefined);
}
