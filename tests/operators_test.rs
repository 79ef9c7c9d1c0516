use proptest::prelude::*;
use sable::{errors::VMError, interpret, RuntimeError, Value};

fn binary(a: &str, op: &str, b: &str) -> Result<Value, VMError> {
    interpret(&format!("var a = {}, b = {}; a {} b", a, b, op))
}

fn typed(value: Value, kind: &str) -> Value {
    assert_eq!(value.type_name(), kind, "{:?}", value);
    value
}

fn eval_binary(a: impl ToString, op: &str, b: impl ToString) -> Value {
    let (a, b) = (a.to_string(), b.to_string());
    match binary(&a, op, &b) {
        Ok(value) => value,
        Err(e) => panic!("{} {} {} failed: {}", a, op, b, e),
    }
}

proptest! {
    #[test]
    fn int_arithmetic_matches_host(a in -10_000i64..10_000, b in -10_000i64..10_000) {
        prop_assert_eq!(eval_binary(a, "+", b), Value::int(a + b));
        prop_assert_eq!(eval_binary(a, "-", b), Value::int(a - b));
        prop_assert_eq!(eval_binary(a, "*", b), Value::int(a * b));
    }

    #[test]
    fn floor_division_rounds_down(a in -10_000i64..10_000, b in -100i64..100) {
        prop_assume!(b != 0);
        let expected = (a as f64 / b as f64).floor() as i64;
        prop_assert_eq!(eval_binary(a, "//", b), Value::int(expected));
    }

    #[test]
    fn int_division_truncates(a in -10_000i64..10_000, b in -100i64..100) {
        prop_assume!(b != 0);
        let quotient = eval_binary(a, "/", b);
        prop_assert_eq!(quotient.type_name(), "int");
        prop_assert_eq!(quotient, Value::int(a / b));
    }

    #[test]
    fn three_way_comparison(a in -1_000i64..1_000, b in -1_000i64..1_000) {
        let expected = match a.cmp(&b) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        };
        prop_assert_eq!(eval_binary(a, "<=>", b), Value::int(expected));
        prop_assert_eq!(eval_binary(a, "<", b), Value::Bool(a < b));
        prop_assert_eq!(eval_binary(a, ">=", b), Value::Bool(a >= b));
    }

    #[test]
    fn ranges_have_the_distance_as_length(a in -50i64..50, b in -50i64..50) {
        let range = eval_binary(a, "->", b);
        match range {
            Value::List(list) => {
                let list = list.borrow();
                prop_assert_eq!(list.len() as i64, (a - b).abs());
                if let Some(first) = list.first() {
                    prop_assert_eq!(first, &Value::int(a));
                }
            },
            other => prop_assert!(false, "expected a list, got {:?}", other),
        }
    }

    #[test]
    fn bitwise_ops_match_host(a in any::<i32>(), b in any::<i32>()) {
        let (a, b) = (a as i64, b as i64);
        prop_assert_eq!(eval_binary(a, "&", b), Value::int(a & b));
        prop_assert_eq!(eval_binary(a, "|", b), Value::int(a | b));
        prop_assert_eq!(eval_binary(a, "~", b), Value::int(a ^ b));
    }
}

#[test]
fn overflow_promotes_to_float() {
    let max = i64::MAX;
    assert_eq!(typed(eval_binary(max, "+", 1), "float"), Value::float(max as f64 + 1.0));
    assert_eq!(typed(eval_binary(max, "*", 2), "float"), Value::float(max as f64 * 2.0));
}

#[test]
fn mixed_operands_promote() {
    assert_eq!(eval_binary(1, "+", "0.5"), Value::float(1.5));
    assert_eq!(typed(eval_binary(7, "/", 2), "int"), Value::int(3));
    assert_eq!(typed(eval_binary(-7, "/", 2), "int"), Value::int(-3));
    assert_eq!(typed(eval_binary(7, "/", "2.0"), "float"), Value::float(3.5));
    assert_eq!(typed(eval_binary("7.5", "//", 2), "int"), Value::int(3));
    assert_eq!(eval_binary(7, "%", 3), Value::int(1));
    assert_eq!(eval_binary(-7, "%", 3), Value::int(-1));
    assert_eq!(typed(eval_binary("7.5", "%", 2), "float"), Value::float(1.5));
}

#[test]
fn powers() {
    assert_eq!(typed(eval_binary(2, "^", 10), "int"), Value::int(1024));
    assert_eq!(typed(eval_binary(2, "^", -2), "float"), Value::float(0.25));
    assert_eq!(typed(eval_binary("2.0", "^", 3), "float"), Value::float(8.0));
    assert_eq!(typed(eval_binary(2, "^", 64), "float"), Value::float(18446744073709551616.0));
}

#[test]
fn shifts() {
    assert_eq!(eval_binary(1, "<<", 4), Value::int(16));
    assert_eq!(eval_binary(-16, ">>", 2), Value::int(-4));
    assert_eq!(eval_binary(-1, ">>>", 60), Value::int(15));
}

#[test]
fn integer_division_by_zero_faults() {
    for op in ["/", "//", "%"] {
        match binary("1", op, "0") {
            Err(VMError::RuntimeError(e)) => assert_eq!(e.kind(), &RuntimeError::DivisionByZero),
            other => panic!("{} by zero gave {:?}", op, other),
        }
    }
}

#[test]
fn strings_and_lists() {
    assert_eq!(eval_binary("\"ab\"", "+", 1), Value::string("ab1"));
    assert_eq!(eval_binary("\"ab\"", "*", 3), Value::string("ababab"));
    match binary("\"ab\"", "*", &i64::MAX.to_string()) {
        Err(VMError::RuntimeError(e)) => assert!(matches!(e.kind(), RuntimeError::Custom(_))),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(eval_binary("\"a\"", "<=>", "\"b\""), Value::int(-1));
    assert_eq!(eval_binary("[1]", "+", "[2]"), Value::list(vec![Value::int(1), Value::int(2)]));
    assert_eq!(eval_binary("1", "<>", "\"x\""), Value::string("1x"));
    assert_eq!(eval_binary("[1, 2]", "==", "[1, 2]"), Value::Bool(true));
    assert_eq!(eval_binary("1", "==", "1.0"), Value::Bool(true));
}

#[test]
fn unsupported_operands_name_both_kinds() {
    match binary("\"a\"", "-", "null") {
        Err(VMError::RuntimeError(e)) => assert_eq!(
            e.kind(),
            &RuntimeError::InvalidOperator { op: "-".to_string(), operands: "string and null".to_string() }
        ),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn prefix_operators() {
    assert_eq!(interpret("var a = 5; -a").unwrap(), Value::int(-5));
    assert_eq!(interpret("var a = 5; ~a").unwrap(), Value::int(!5));
    assert!(interpret("var a = \"s\"; -a").is_err());
}
