//! The standard kit: printing, conversions, time and randomness.

use std::{
    cell::RefCell,
    io::{self, BufRead, Write},
    rc::Rc,
    sync::OnceLock,
    time::{Duration, Instant},
};

use rand::Rng;

use crate::{
    errors::RuntimeError,
    object::Kit,
    reference::deref,
    state::SharedState,
    value::{Number, Value},
};

pub const STD_KIT: &str = "std";

pub type Output = Rc<RefCell<dyn Write>>;

fn plain_args(args: &[Value]) -> Result<Vec<Value>, RuntimeError> {
    args.iter().cloned().map(deref).collect()
}

fn joined(args: &[Value]) -> String {
    let mut value = String::new();
    for arg in args {
        value.push_str(&arg.to_string());
    }
    value
}

fn write_out(output: &Output, text: &str) -> Result<(), RuntimeError> {
    let mut output = output.borrow_mut();
    output
        .write_all(text.as_bytes())
        .and_then(|_| output.flush())
        .map_err(|e| RuntimeError::custom(format!("Error while writing output: {}.", e)))
}

/// Standard kit for `state`, writing to stdout.
pub fn std_kit(state: &SharedState) -> Kit {
    std_kit_with_output(state, Rc::new(RefCell::new(io::stdout())))
}

/// Standard kit for `state`. The type names it exposes are the state's own
/// built-in descriptors.
pub fn std_kit_with_output(state: &SharedState, output: Output) -> Kit {
    let kit = Kit::new(STD_KIT);

    macro_rules! native_with_arity {
        ($name:expr, $arity:expr, $func:expr) => {
            kit.set_function($name, |_vm, _this, args| {
                if args.len() != $arity {
                    return Err(RuntimeError::bad_arity($name, $arity, args.len()));
                }
                let args = plain_args(args)?;
                #[allow(clippy::redundant_closure_call)]
                {
                    $func(args.as_slice())
                }
            });
        };
    }

    native_with_arity!("clock", 0, |_args: &[Value]| {
        static START_TIME: OnceLock<Instant> = OnceLock::new();
        let start = START_TIME.get_or_init(Instant::now);
        Ok(Value::int(start.elapsed().as_millis() as i64))
    });
    native_with_arity!("sleep", 1, |args: &[Value]| match &args[0] {
        Value::Num(Number::Int(i)) if *i >= 0 => {
            std::thread::sleep(Duration::from_millis(*i as u64));
            Ok(Value::Null)
        },
        _ => Err(RuntimeError::custom("Expected a non-negative int as argument.")),
    });
    native_with_arity!("random", 2, |args: &[Value]| match (&args[0], &args[1]) {
        (Value::Num(Number::Int(a)), Value::Num(Number::Int(b))) if a < b => {
            let mut rng = rand::thread_rng();
            Ok(Value::int(rng.gen_range(*a..*b)))
        },
        (Value::Num(Number::Int(_)), Value::Num(Number::Int(_))) => {
            Err(RuntimeError::custom("Expected the lower bound to be below the upper bound."))
        },
        _ => Err(RuntimeError::custom("Expected two integers.")),
    });
    native_with_arity!("int", 1, |args: &[Value]| match &args[0] {
        Value::Num(Number::Int(i)) => Ok(Value::int(*i)),
        Value::Num(Number::Float(f)) => Ok(Value::int(*f as i64)),
        Value::Str(s) => s
            .trim()
            .parse()
            .map(Value::int)
            .map_err(|_| RuntimeError::custom(format!("Invalid int literal {:?}.", s))),
        Value::Bool(b) => Ok(Value::int(*b as i64)),
        _ => Err(RuntimeError::custom("Expected a number, string or boolean.")),
    });
    native_with_arity!("float", 1, |args: &[Value]| match &args[0] {
        Value::Num(n) => Ok(Value::float(n.as_f64())),
        Value::Str(s) => s
            .trim()
            .parse()
            .map(Value::float)
            .map_err(|_| RuntimeError::custom(format!("Invalid float literal {:?}.", s))),
        Value::Bool(b) => Ok(Value::float(*b as i64 as f64)),
        _ => Err(RuntimeError::custom("Expected a number, string or boolean.")),
    });
    native_with_arity!("bool", 1, |args: &[Value]| Ok(Value::Bool(args[0].as_bool())));
    native_with_arity!("str", 1, |args: &[Value]| Ok(Value::string(&args[0].to_string())));
    native_with_arity!("typeof", 1, |args: &[Value]| Ok(Value::string(&args[0].type_name())));

    kit.set_function("format", |_vm, _this, args| {
        let args = plain_args(args)?;
        Ok(Value::string(&joined(&args)))
    });
    let out = output.clone();
    kit.set_function("print", move |_vm, _this, args| {
        let args = plain_args(args)?;
        write_out(&out, &joined(&args))?;
        Ok(Value::Null)
    });
    let out = output.clone();
    kit.set_function("println", move |_vm, _this, args| {
        let args = plain_args(args)?;
        let mut line = joined(&args);
        line.push('\n');
        write_out(&out, &line)?;
        Ok(Value::Null)
    });
    let out = output;
    kit.set_function("input", move |_vm, _this, args| {
        let args = plain_args(args)?;
        write_out(&out, &joined(&args))?;
        let mut input = String::new();
        if io::stdin().lock().read_line(&mut input).is_err() {
            return Err(RuntimeError::custom("Error while reading input."));
        }
        Ok(Value::string(input.trim_end_matches(['\r', '\n'])))
    });

    for (name, type_def) in state.builtins().named_types() {
        kit.set(name, Value::Type(type_def));
    }
    kit
}

/// Registers `kit` and copies all of its fields into the globals.
pub fn install(state: &SharedState, kit: Kit) -> Result<(), RuntimeError> {
    let kit = state.register_kit(kit);
    state.use_all(&kit.name)
}
