use super::helpers::*;
use crate::config::VmConfig;
use crate::error::VmError;
use crate::opcode::{BinaryOp, OpCode};
use crate::value::Value;

// ============================================================================
// Type definitions and instances
// ============================================================================

/// inc := func(this) { this.n += 1 }
fn inc_method(p: &mut Program) -> Value {
    let n = p.constant(Value::from("n"));
    let one = p.constant(Value::Int(1));
    function(
        body(&[
            (OpCode::GetLocal, &[0]),
            (OpCode::Constant, &[n]),
            (OpCode::Index, &[]),
            (OpCode::Constant, &[one]),
            (OpCode::BinaryOp, &[bin(BinaryOp::Add)]),
            (OpCode::Constant, &[n]),
            (OpCode::SetSelLocal, &[0, 1]),
            (OpCode::Return, &[0]),
        ]),
        |code| code.with_args(1).method(),
    )
}

/// Emit `fields(name=default)`
fn fields_of(p: &mut Program, name: &str, default: i64) {
    p.builtin("fields")
        .str(name)
        .int(default)
        .op(OpCode::Map, &[2])
        .call_kw(0);
}

/// Emit `obj.name`
fn member(p: &mut Program, local: usize, name: &str) {
    p.op(OpCode::GetLocal, &[local]).str(name).op(OpCode::Index, &[]);
}

#[test]
fn test_counter_type_with_method() {
    // Counter := type("Counter", fields(n=10), methods(inc=inc))
    // c := Counter(); c.inc(); c.inc(); c.inc()
    let mut p = Program::with_locals(2);
    let inc = inc_method(&mut p);

    p.builtin("type").str("Counter");
    fields_of(&mut p, "n", 10);
    p.builtin("methods")
        .str("inc")
        .push(inc)
        .op(OpCode::Map, &[2])
        .call_kw(0);
    p.call(3).op(OpCode::DefineLocal, &[0]);

    p.op(OpCode::GetLocal, &[0]).call(0).op(OpCode::DefineLocal, &[1]);
    for _ in 0..3 {
        member(&mut p, 1, "inc");
        p.call(0).op(OpCode::Pop, &[]);
    }
    member(&mut p, 1, "n");
    p.op(OpCode::SetGlobal, &[0]);

    assert_eq!(run_global(p).unwrap(), Value::Int(13));
}

#[test]
fn test_instances_do_not_share_field_storage() {
    let mut p = Program::with_locals(3);
    p.builtin("type").str("Point");
    fields_of(&mut p, "x", 0);
    p.call(2).op(OpCode::DefineLocal, &[0]);
    p.op(OpCode::GetLocal, &[0]).call(0).op(OpCode::DefineLocal, &[1]);
    p.op(OpCode::GetLocal, &[0]).call(0).op(OpCode::DefineLocal, &[2]);
    p.int(4).str("x").op(OpCode::SetSelLocal, &[1, 1]);
    member(&mut p, 2, "x");
    p.op(OpCode::SetGlobal, &[0]);

    assert_eq!(run_global(p).unwrap(), Value::Int(0));
}

#[test]
fn test_constructor_receives_instance() {
    // Counter := type("Counter", func(this, n) { this.n = n }, fields(n=0))
    let mut p = Program::with_locals(2);
    let n = p.constant(Value::from("n"));
    let ctor = function(
        body(&[
            (OpCode::GetLocal, &[1]),
            (OpCode::Constant, &[n]),
            (OpCode::SetSelLocal, &[0, 1]),
            (OpCode::Return, &[0]),
        ]),
        |code| code.with_args(2),
    );

    p.builtin("type").str("Counter").push(ctor);
    fields_of(&mut p, "n", 0);
    p.call(3).op(OpCode::DefineLocal, &[0]);
    p.op(OpCode::GetLocal, &[0]).int(7).call(1).op(OpCode::DefineLocal, &[1]);
    member(&mut p, 1, "n");
    p.op(OpCode::SetGlobal, &[0]);

    assert_eq!(run_global(p).unwrap(), Value::Int(7));
}

#[test]
fn test_keyword_overlay_without_constructor() {
    let mut p = Program::with_locals(2);
    p.builtin("type").str("Point");
    fields_of(&mut p, "x", 0);
    p.call(2).op(OpCode::DefineLocal, &[0]);
    p.op(OpCode::GetLocal, &[0])
        .str("x")
        .int(5)
        .op(OpCode::Map, &[2])
        .call_kw(0)
        .op(OpCode::DefineLocal, &[1]);
    member(&mut p, 1, "x");
    p.op(OpCode::SetGlobal, &[0]);

    assert_eq!(run_global(p).unwrap(), Value::Int(5));
}

#[test]
fn test_positional_args_need_constructor() {
    let mut p = Program::new();
    p.builtin("type").str("Point").call(1);
    p.int(1).call(1);
    assert_eq!(run_error(p), VmError::WrongNumArguments { want: 0, got: 1 });
}

// ============================================================================
// Properties
// ============================================================================

/// Box := type("Box", fields(n=4), properties(double=property(get=...)))
fn box_type(p: &mut Program) {
    let n = p.constant(Value::from("n"));
    let two = p.constant(Value::Int(2));
    let getter = function(
        body(&[
            (OpCode::GetLocal, &[0]),
            (OpCode::Constant, &[n]),
            (OpCode::Index, &[]),
            (OpCode::Constant, &[two]),
            (OpCode::BinaryOp, &[bin(BinaryOp::Mul)]),
            (OpCode::Return, &[1]),
        ]),
        |code| code.with_args(1),
    );

    p.builtin("type").str("Box");
    fields_of(p, "n", 4);
    p.builtin("properties").str("double");
    p.builtin("property")
        .str("get")
        .push(getter)
        .op(OpCode::Map, &[2])
        .call_kw(0);
    p.op(OpCode::Map, &[2]).call_kw(0);
    p.call(3).op(OpCode::DefineLocal, &[0]);
    p.op(OpCode::GetLocal, &[0]).call(0).op(OpCode::DefineLocal, &[1]);
}

#[test]
fn test_property_getter() {
    let mut p = Program::with_locals(2);
    box_type(&mut p);
    member(&mut p, 1, "double");
    p.op(OpCode::SetGlobal, &[0]);
    assert_eq!(run_global(p).unwrap(), Value::Int(8));
}

#[test]
fn test_property_without_setter_is_read_only() {
    let mut p = Program::with_locals(2);
    box_type(&mut p);
    p.int(1).str("double").op(OpCode::SetSelLocal, &[1, 1]);
    assert_eq!(run_error(p), VmError::ReadOnlyProperty("double".into()));
}

// ============================================================================
// typeof, type(map) and __map__
// ============================================================================

#[test]
fn test_typeof_returns_defining_type() {
    let mut p = Program::with_locals(2);
    p.builtin("type").str("T").call(1).op(OpCode::DefineLocal, &[0]);
    p.op(OpCode::GetLocal, &[0]).call(0).op(OpCode::DefineLocal, &[1]);
    p.builtin("typeof").op(OpCode::GetLocal, &[1]).call(1);
    p.op(OpCode::GetLocal, &[0])
        .op(OpCode::Equal, &[])
        .op(OpCode::SetGlobal, &[0]);
    assert_eq!(run_global(p).unwrap(), Value::Bool(true));
}

#[test]
fn test_type_name_errors() {
    let mut p = Program::new();
    p.builtin("type").str("").call(1);
    assert_eq!(run_error(p), VmError::EmptyTypeName);

    let mut p = Program::new();
    p.builtin("type").int(5).call(1);
    assert_eq!(
        run_error(p),
        VmError::InvalidArgumentTypeInCall {
            name: "arg #0".into(),
            callee: "builtin-function:type".into(),
            expected: "string|map".into(),
            found: "int".into(),
        }
    );
}

#[test]
fn test_type_from_map() {
    // type({name: "Point", fields: {x: 3}})
    let mut p = Program::with_locals(1);
    p.builtin("type");
    p.str("name").str("Point");
    p.str("fields").str("x").int(3).op(OpCode::Map, &[2]);
    p.op(OpCode::Map, &[4]).call(1);
    p.call(0).op(OpCode::DefineLocal, &[0]);
    member(&mut p, 0, "x");
    p.op(OpCode::SetGlobal, &[0]);
    member(&mut p, 0, "__type__");
    p.str("name").op(OpCode::Index, &[]).op(OpCode::SetGlobal, &[1]);

    let (vm, result) = run_with_config(p, VmConfig::default());
    result.unwrap();
    assert_eq!(vm.global(0), Value::Int(3));
    assert_eq!(vm.global(1), Value::from("Point"));
}

#[test]
fn test_instance_map_shares_storage() {
    // p := Point(); p.__map__.x = 9
    let mut p = Program::with_locals(2);
    p.builtin("type").str("Point");
    fields_of(&mut p, "x", 0);
    p.call(2).call(0).op(OpCode::DefineLocal, &[0]);
    p.int(9).str("x").str("__map__").op(OpCode::SetSelLocal, &[0, 2]);
    member(&mut p, 0, "x");
    p.op(OpCode::SetGlobal, &[0]);

    assert_eq!(run_global(p).unwrap(), Value::Int(9));
}

#[test]
fn test_unknown_member_is_undefined() {
    let mut p = Program::with_locals(1);
    p.builtin("type").str("T").call(1).call(0).op(OpCode::DefineLocal, &[0]);
    p.int(1).op(OpCode::SetGlobal, &[0]);
    member(&mut p, 0, "nope");
    p.op(OpCode::SetGlobal, &[0]);
    assert_eq!(run_global(p).unwrap(), Value::Undefined);
}

// ============================================================================
// Accessor precedence and the method cache
// ============================================================================

/// Meter := type("Meter", fields(raw=0, hits=0),
///     properties(n=property(set=func(this, v) { this.raw = v * 10 }),
///                count=property(get=func(this) { this.hits += 1; return this.hits })))
/// m := Meter()
fn meter(p: &mut Program) {
    let raw = p.constant(Value::from("raw"));
    let hits = p.constant(Value::from("hits"));
    let one = p.constant(Value::Int(1));
    let ten = p.constant(Value::Int(10));
    let setter = function(
        body(&[
            (OpCode::GetLocal, &[1]),
            (OpCode::Constant, &[ten]),
            (OpCode::BinaryOp, &[bin(BinaryOp::Mul)]),
            (OpCode::Constant, &[raw]),
            (OpCode::SetSelLocal, &[0, 1]),
            (OpCode::Return, &[0]),
        ]),
        |code| code.with_args(2),
    );
    let counter = function(
        body(&[
            (OpCode::GetLocal, &[0]),
            (OpCode::Constant, &[hits]),
            (OpCode::Index, &[]),
            (OpCode::Constant, &[one]),
            (OpCode::BinaryOp, &[bin(BinaryOp::Add)]),
            (OpCode::Constant, &[hits]),
            (OpCode::SetSelLocal, &[0, 1]),
            (OpCode::GetLocal, &[0]),
            (OpCode::Constant, &[hits]),
            (OpCode::Index, &[]),
            (OpCode::Return, &[1]),
        ]),
        |code| code.with_args(1),
    );

    p.builtin("type").str("Meter");
    p.builtin("fields")
        .str("n")
        .int(0)
        .str("raw")
        .int(0)
        .str("hits")
        .int(0)
        .op(OpCode::Map, &[6])
        .call_kw(0);
    p.builtin("properties").str("n");
    p.builtin("property")
        .str("set")
        .push(setter)
        .op(OpCode::Map, &[2])
        .call_kw(0);
    p.str("count");
    p.builtin("property")
        .str("get")
        .push(counter)
        .op(OpCode::Map, &[2])
        .call_kw(0);
    p.op(OpCode::Map, &[4]).call_kw(0);
    p.call(3).call(0).op(OpCode::DefineLocal, &[0]);
}

#[test]
fn test_setter_takes_precedence_over_field() {
    // m.n = 2
    let mut p = Program::with_locals(1);
    meter(&mut p);
    p.int(2).str("n").op(OpCode::SetSelLocal, &[0, 1]);
    member(&mut p, 0, "raw");
    p.op(OpCode::SetGlobal, &[0]);
    member(&mut p, 0, "__map__");
    p.str("n").op(OpCode::Index, &[]).op(OpCode::SetGlobal, &[1]);
    // write-only property reads as Undefined, not as the field
    member(&mut p, 0, "n");
    p.op(OpCode::SetGlobal, &[2]);

    let (vm, result) = run_with_config(p, VmConfig::default());
    result.unwrap();
    assert_eq!(vm.global(0), Value::Int(20));
    assert_eq!(vm.global(1), Value::Int(0));
    assert_eq!(vm.global(2), Value::Undefined);
}

#[test]
fn test_getter_runs_on_every_read() {
    let mut p = Program::with_locals(1);
    meter(&mut p);
    member(&mut p, 0, "count");
    p.op(OpCode::SetGlobal, &[0]);
    member(&mut p, 0, "count");
    p.op(OpCode::SetGlobal, &[1]);

    let (vm, result) = run_with_config(p, VmConfig::default());
    result.unwrap();
    assert_eq!(vm.global(0), Value::Int(1));
    assert_eq!(vm.global(1), Value::Int(2));
}

#[test]
fn test_bound_methods_are_cached_per_instance() {
    // c.inc == c.inc; c.inc == d.inc
    let mut p = Program::with_locals(3);
    let inc = inc_method(&mut p);
    p.builtin("type").str("Counter");
    fields_of(&mut p, "n", 0);
    p.builtin("methods")
        .str("inc")
        .push(inc)
        .op(OpCode::Map, &[2])
        .call_kw(0);
    p.call(3).op(OpCode::DefineLocal, &[0]);
    p.op(OpCode::GetLocal, &[0]).call(0).op(OpCode::DefineLocal, &[1]);
    p.op(OpCode::GetLocal, &[0]).call(0).op(OpCode::DefineLocal, &[2]);

    member(&mut p, 1, "inc");
    member(&mut p, 1, "inc");
    p.op(OpCode::Equal, &[]).op(OpCode::SetGlobal, &[0]);
    member(&mut p, 1, "inc");
    member(&mut p, 2, "inc");
    p.op(OpCode::Equal, &[]).op(OpCode::SetGlobal, &[1]);

    let (vm, result) = run_with_config(p, VmConfig::default());
    result.unwrap();
    assert_eq!(vm.global(0), Value::Bool(true));
    assert_eq!(vm.global(1), Value::Bool(false));
}

// ============================================================================
// Accessor and constructor nesting
// ============================================================================

/// func(this) { return this.<name> }
fn read_member(p: &mut Program, name: &str) -> Value {
    let key = p.constant(Value::from(name));
    function(
        body(&[
            (OpCode::GetLocal, &[0]),
            (OpCode::Constant, &[key]),
            (OpCode::Index, &[]),
            (OpCode::Return, &[1]),
        ]),
        |code| code.with_args(1),
    )
}

/// Emit `property(get=getter)`
fn getter_property(p: &mut Program, getter: Value) {
    p.builtin("property")
        .str("get")
        .push(getter)
        .op(OpCode::Map, &[2])
        .call_kw(0);
}

#[test]
fn test_getter_reading_itself_is_rejected() {
    // Loop := type("Loop", properties(x=property(get=func(this) { return this.x })))
    // Loop().x
    let mut p = Program::with_locals(1);
    let getter = read_member(&mut p, "x");
    p.builtin("type").str("Loop");
    p.builtin("properties").str("x");
    getter_property(&mut p, getter);
    p.op(OpCode::Map, &[2]).call_kw(0);
    p.call(2).call(0).op(OpCode::DefineLocal, &[0]);
    member(&mut p, 0, "x");

    assert_eq!(run_error(p), VmError::FunctionRunning);
}

#[test]
fn test_constructor_building_its_own_type_is_rejected() {
    // T := type("T", func(this) { T() }); T()
    let mut p = Program::new();
    let ctor = function(
        body(&[
            (OpCode::GetGlobal, &[0]),
            (OpCode::Call, &[0, 0, 0, 0]),
            (OpCode::Pop, &[]),
            (OpCode::Return, &[0]),
        ]),
        |code| code.with_args(1),
    );
    p.builtin("type").str("T").push(ctor).call(2);
    p.op(OpCode::SetGlobal, &[0]);
    p.op(OpCode::GetGlobal, &[0]).call(0);

    assert_eq!(run_error(p), VmError::FunctionRunning);
}

/// Chain := type("Chain", properties(a=property(get=func(this) { return this.b }),
///                                   b=property(get=func(this) { return 1 })))
fn chained_getters() -> Program {
    let mut p = Program::with_locals(1);
    let outer = read_member(&mut p, "b");
    let one = p.constant(Value::Int(1));
    let inner = function(
        body(&[(OpCode::Constant, &[one]), (OpCode::Return, &[1])]),
        |code| code.with_args(1),
    );
    p.builtin("type").str("Chain");
    p.builtin("properties").str("a");
    getter_property(&mut p, outer);
    p.str("b");
    getter_property(&mut p, inner);
    p.op(OpCode::Map, &[4]).call_kw(0);
    p.call(2).call(0).op(OpCode::DefineLocal, &[0]);
    member(&mut p, 0, "a");
    p.op(OpCode::SetGlobal, &[0]);
    p
}

#[test]
fn test_nested_accessor_calls_are_bounded() {
    assert_eq!(run_global(chained_getters()).unwrap(), Value::Int(1));

    let config = VmConfig::default().with_max_nested_calls(1);
    let (_, result) = run_with_config(chained_getters(), config);
    assert_eq!(result.unwrap_err().error, VmError::StackOverflow);
}

#[test]
fn test_accessor_frames_count_toward_frame_limit() {
    // main, then one trampoline and one getter frame per accessor
    let (vm, result) = run_with_config(chained_getters(), VmConfig::default().with_max_frames(5));
    result.unwrap();
    assert_eq!(vm.global(0), Value::Int(1));

    let (_, result) = run_with_config(chained_getters(), VmConfig::default().with_max_frames(4));
    assert_eq!(result.unwrap_err().error, VmError::StackOverflow);
}

// ============================================================================
// Self-referencing tags
// ============================================================================

#[test]
fn test_type_tagged_with_itself() {
    // T := type("T"); T.tags = T; T.tags.name
    let mut p = Program::with_locals(1);
    p.builtin("type").str("T").call(1).op(OpCode::DefineLocal, &[0]);
    p.op(OpCode::GetLocal, &[0])
        .str("tags")
        .op(OpCode::SetSelLocal, &[0, 1]);
    member(&mut p, 0, "tags");
    p.str("name").op(OpCode::Index, &[]).op(OpCode::SetGlobal, &[0]);

    assert_eq!(run_global(p).unwrap(), Value::from("T"));
}

#[test]
fn test_field_tagged_with_itself() {
    // fs := fields(x=1); f := fs.x; f.tags = f; f.tags.value
    let mut p = Program::with_locals(2);
    fields_of(&mut p, "x", 1);
    p.op(OpCode::DefineLocal, &[0]);
    member(&mut p, 0, "x");
    p.op(OpCode::DefineLocal, &[1]);
    p.op(OpCode::GetLocal, &[1])
        .str("tags")
        .op(OpCode::SetSelLocal, &[1, 1]);
    member(&mut p, 1, "tags");
    p.str("value").op(OpCode::Index, &[]).op(OpCode::SetGlobal, &[0]);

    assert_eq!(run_global(p).unwrap(), Value::Int(1));
}

#[test]
fn test_property_entry_tagged_with_its_table() {
    // ps := properties(); ps.x = {get: g, tags: ps}; ps.x.tags
    let mut p = Program::with_locals(1);
    let getter = read_member(&mut p, "y");
    p.builtin("properties").call(0).op(OpCode::DefineLocal, &[0]);
    p.str("get")
        .push(getter)
        .str("tags")
        .op(OpCode::GetLocal, &[0])
        .op(OpCode::Map, &[4]);
    p.str("x").op(OpCode::SetSelLocal, &[0, 1]);
    member(&mut p, 0, "x");
    p.str("tags").op(OpCode::Index, &[]).op(OpCode::SetGlobal, &[0]);

    let tags = run_global(p).unwrap();
    assert!(matches!(&tags, Value::Map(m) if m.borrow().is_empty()));
}
