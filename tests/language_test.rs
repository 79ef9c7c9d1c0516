use sable::{compile, errors::VMError, interpret, verify::check_stack_heights, RuntimeError, Value};

fn eval(source: &str) -> Value {
    match compile(source) {
        Ok(prototype) => assert_eq!(check_stack_heights(&prototype), Ok(()), "{}", source),
        Err(e) => panic!("{} failed to compile: {}", source, e),
    }
    match interpret(source) {
        Ok(value) => value,
        Err(e) => panic!("{} failed: {}", source, e),
    }
}

fn list(values: &[i64]) -> Value {
    Value::list(values.iter().copied().map(Value::int).collect())
}

#[test]
fn definitions_yield_the_last_value() {
    assert_eq!(eval("var x = 1, y = 2; x + y"), Value::int(3));
    assert_eq!(eval("var x = 4"), Value::int(4));
    assert_eq!(eval(""), Value::Null);
}

#[test]
fn if_branches() {
    assert_eq!(eval("if true 1 el 2"), Value::int(1));
    assert_eq!(eval("if false 1 el 2"), Value::int(2));
    assert_eq!(eval("if false 1"), Value::Null);
    assert_eq!(eval("var c = 0; if c 1 el \"no\""), Value::string("no"));
    assert_eq!(eval("var c = 0; if not c 1 el 2"), Value::int(1));
}

#[test]
fn match_dispatch() {
    let source = |input: &str| format!("var m = {}; match m {{ 1: \"a\", 2: \"b\", _: \"z\" }}", input);
    assert_eq!(eval(&source("2")), Value::string("b"));
    assert_eq!(eval(&source("99")), Value::string("z"));
    assert_eq!(eval(&source("\"a\"")), Value::string("z"));
    assert_eq!(eval("match 3 { 1: 10 }"), Value::Null);
    assert_eq!(eval("match null { null: 1, true: 2 }"), Value::int(1));
    assert_eq!(eval("match \"k\" { \"k\": 1, _: 2 }"), Value::int(1));
}

#[test]
fn duplicate_match_cases_do_not_compile() {
    assert!(matches!(
        interpret("match 1 { 1: 1, 1: 2 }"),
        Err(VMError::CompileError { .. })
    ));
}

#[test]
fn references_write_through() {
    assert_eq!(eval("var x = 0; var r = ref x; deref r = 5; x"), Value::int(5));
    assert_eq!(eval("var x = 1; var r = ref x; x = 7; deref r"), Value::int(7));
    assert_eq!(eval("var l = [1, 2]; var r = ref l[1]; deref r = 9; l"), list(&[1, 9]));
    assert_eq!(eval("var x = 2; var r = ref x; r + 1"), Value::int(3));
}

#[test]
fn stores_redirect_through_a_held_reference() {
    let source = "
        var x = 1
        var l = [ref x]
        l[0] = 4
        x
    ";
    assert_eq!(eval(source), Value::int(4));
}

#[test]
fn declarations_do_not_write_through_a_stale_slot() {
    assert_eq!(eval("var x = 1; { var r = ref x }; var y = 5; [x, y]"), list(&[1, 5]));
}

#[test]
fn references_to_globals() {
    let source = "
        fn g() 1
        var r = ref g
        deref r = 2
        g
    ";
    assert_eq!(eval(source), Value::int(2));
}

#[test]
fn compound_assignment_evaluates_the_target_once() {
    let index = "
        var calls = 0
        var l = [1, 2]
        fn at() { calls = calls + 1; 1 }
        l[at()] += 10
        var out = [l[1], calls]
        out
    ";
    assert_eq!(eval(index), list(&[12, 1]));
    let field = "
        type Box { ctor() this.n = 1 }
        var made = 0
        var b = Box()
        fn pass(x) { made = made + 1; x }
        pass(b).n *= 6
        var out = [b.n, made]
        out
    ";
    assert_eq!(eval(field), list(&[6, 1]));
    assert_eq!(eval("var x = 1; var r = ref x; deref r += 4; x"), Value::int(5));
    assert_eq!(eval("var x = 1; x -= 3"), Value::int(-2));
}

#[test]
fn self_containing_lists_print_and_compare() {
    assert_eq!(eval("var l = [1]; l.append(l); str(l)"), Value::string("[1, [...]]"));
    assert_eq!(eval("var a = [1]; a.append(a); var b = [1]; b.append(b); a == b"), Value::Bool(true));
}

#[test]
fn variadic_parameters_collect_the_rest() {
    assert_eq!(eval("fn f(a, b..) b; f(1, 2, 3, 4)"), list(&[2, 3, 4]));
    assert_eq!(eval("fn f(a, b..) a; f(1, 2, 3, 4)"), Value::int(1));
    assert_eq!(eval("fn f(a, b..) b; f(1)"), list(&[]));
}

#[test]
fn arity_is_strict() {
    match interpret("fn f(a) a; f(1, 2)") {
        Err(VMError::RuntimeError(e)) => assert!(matches!(e.kind(), RuntimeError::BadArity { got: 2, .. })),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(interpret("fn f(a, b..) a; f()"), Err(VMError::RuntimeError(_))));
}

#[test]
fn while_collects_body_values() {
    assert_eq!(eval("var i = 0; while i < 3 { i = i + 1; i * 10 }"), list(&[10, 20, 30]));
    assert_eq!(eval("var i = 5; while i < 3 i = i + 1 el \"never\""), Value::string("never"));
    assert_eq!(eval("var i = 0; while i < 3 i = i + 1; i"), Value::int(3));
}

#[test]
fn short_circuit_keeps_the_deciding_value() {
    assert_eq!(eval("0 or \"x\""), Value::string("x"));
    assert_eq!(eval("0 and \"x\""), Value::int(0));
    assert_eq!(eval("var n = 0; fn bump() { n = 1 }; false and bump(); n"), Value::int(0));
    assert_eq!(eval("not 0"), Value::Bool(true));
}

#[test]
fn early_return() {
    assert_eq!(eval("fn f(x) { if x ret 1; 2 }; f(true)"), Value::int(1));
    assert_eq!(eval("fn f(x) { if x ret 1; 2 }; f(false)"), Value::int(2));
    assert_eq!(eval("fn f() ret; f()"), Value::Null);
}

#[test]
fn user_types() {
    let source = "
        type Vec2 {
            ctor(x, y) { this.x = x; this.y = y }
            fn sum() this.x + this.y
            infix +(o) Vec2(this.x + o.x, this.y + o.y)
            prefix -() Vec2(-this.x, -this.y)
            invoke(k) this.x * k
        }
        var v = Vec2(1, 2) + Vec2(3, 4)
        var w = -v
        var out = [v.sum(), w.x, v(10)]
        out
    ";
    assert_eq!(eval(source), list(&[10, -4, 40]));
}

#[test]
fn builtin_descriptors_can_be_extended() {
    let source = "
        Int.double = fn() this * 2
        21.double()
    ";
    assert_eq!(eval(source), Value::int(42));
    assert_eq!(eval("var l = [1]; l.append(2); l.length()"), Value::int(2));
    assert_eq!(eval("\"abc\".upper()"), Value::string("ABC"));
}

#[test]
fn descriptor_extensions_stay_in_their_state() {
    assert_eq!(eval("Int.triple = fn() this * 3; 2.triple()"), Value::int(6));
    match interpret("2.triple()") {
        Err(VMError::RuntimeError(e)) => assert!(matches!(e.kind(), RuntimeError::MissingField { .. })),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn control_flow_shapes_keep_the_stack_balanced() {
    let sources = [
        "fn f(n) { var i = 0; while true { i = i + 1; if i == n ret i } }; f(3)",
        "var m = 5; match m { 1: 1 }; m",
        "var m = 5; var out = match m { 5: \"five\" }; out",
        "var i = 0; var fs = while i < 2 { var j = i; i = i + 1; fn() j }; fs[1]()",
        "var i = 9; while i < 2 i = i + 1 el 7",
    ];
    let expected = [Value::int(3), Value::int(5), Value::string("five"), Value::int(1), Value::int(7)];
    for (source, expected) in sources.iter().zip(expected) {
        assert_eq!(eval(source), expected, "{}", source);
    }
}

#[test]
fn indexing_is_zero_based() {
    assert_eq!(eval("var l = [5, 6, 7]; l[2]"), Value::int(7));
    assert_eq!(eval("var t = (5, 6); t[0]"), Value::int(5));
    match interpret("var l = [1]; l[1]") {
        Err(VMError::RuntimeError(e)) => {
            assert_eq!(e.kind(), &RuntimeError::IndexOutOfBounds { index: 1, len: 1 })
        },
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn invalid_assignment_targets_do_not_compile() {
    assert!(matches!(interpret("1 = 2"), Err(VMError::CompileError { .. })));
    assert!(matches!(interpret("var a = ref 1"), Err(VMError::CompileError { .. })));
    assert!(matches!(interpret("fn f() { var a = 1; var a = 2 }"), Err(VMError::CompileError { .. })));
}

#[test]
fn missing_fields_are_runtime_errors() {
    match interpret("var l = [1]; l.nope") {
        Err(VMError::RuntimeError(e)) => assert!(matches!(e.kind(), RuntimeError::MissingField { .. })),
        other => panic!("unexpected {:?}", other),
    }
}
