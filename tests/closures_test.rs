use sable::{compile, interpret, verify::check_stack_heights, Value};

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

const COUNTER: &str = "
    fn counter() {
        var n = 0
        fn() {
            n = n + 1
            n
        }
    }
";

#[test]
fn returned_closure_keeps_its_capture() {
    let source = format!("{}
        var a = counter()
        a()
        a()
        var third = a()
        third
    ", COUNTER);
    assert_eq!(eval(&source), Value::int(3));
}

#[test]
fn each_call_gets_a_fresh_capture() {
    let source = format!("{}
        var a = counter()
        var b = counter()
        a()
        a()
        var out = [a(), b()]
        out
    ", COUNTER);
    assert_eq!(eval(&source), list(&[3, 1]));
}

#[test]
fn sibling_closures_share_one_cell() {
    let source = "
        fn pair() {
            var n = 0
            var inc = fn() n = n + 1
            var get = fn() n
            var both = (inc, get)
            both
        }
        var p = pair()
        var inc = p[0], get = p[1]
        inc()
        inc()
        get()
    ";
    assert_eq!(eval(source), Value::int(2));
}

#[test]
fn captures_through_two_levels() {
    let source = "
        fn outer() {
            var x = 1
            fn middle() {
                fn() {
                    x = x * 10
                    x
                }
            }
            var f = middle()
            f()
            x
        }
        outer()
    ";
    assert_eq!(eval(source), Value::int(10));
}

#[test]
fn loop_scopes_close_their_captures() {
    let source = "
        var fns = []
        var i = 0
        while i < 3 {
            var j = i
            fns.append(fn() j)
            i = i + 1
        }
        var out = [fns[0](), fns[1](), fns[2]()]
        out
    ";
    assert_eq!(eval(source), list(&[0, 1, 2]));
}

#[test]
fn reference_outlives_its_scope() {
    let source = "
        fn make() {
            var x = 5
            ref x
        }
        var r = make()
        deref r = 6
        deref r
    ";
    assert_eq!(eval(source), Value::int(6));
}

#[test]
fn recursion_through_a_global() {
    let source = "
        fn fib(n) if n < 2 n el fib(n - 1) + fib(n - 2)
        fib(15)
    ";
    assert_eq!(eval(source), Value::int(610));
}
