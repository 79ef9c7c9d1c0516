use std::{cell::RefCell, cmp::Ordering, fmt, ops, rc::Rc};

use crate::{
    object::{Callback, Closure, Kit, Object, TypeDef},
    reference::Reference,
};

#[derive(Debug, Copy, Clone)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_bool(&self) -> bool {
        match self {
            Number::Int(i) => *i != 0,
            Number::Float(f) => *f != 0.0,
        }
    }
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }
    /// Floor division, always integral. `None` on integer division by zero.
    pub fn floor_div(self, other: Number) -> Option<Number> {
        match (self, other) {
            (Number::Int(_), Number::Int(0)) => None,
            (Number::Int(a), Number::Int(b)) => {
                let q = a.wrapping_div(b);
                let r = a.wrapping_rem(b);
                if r != 0 && ((r < 0) != (b < 0)) {
                    Some(Number::Int(q - 1))
                }
                else {
                    Some(Number::Int(q))
                }
            },
            (a, b) => Some(Number::Int((a.as_f64() / b.as_f64()).floor() as i64)),
        }
    }
    pub fn pow(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(base), Number::Int(exp)) if exp >= 0 => {
                match u32::try_from(exp).ok().and_then(|exp| base.checked_pow(exp)) {
                    Some(n) => Number::Int(n),
                    None => Number::Float((base as f64).powf(exp as f64)),
                }
            },
            (Number::Int(base), Number::Int(exp)) => {
                Number::Float(1.0 / (base as f64).powf(exp.unsigned_abs() as f64))
            },
            (a, b) => Number::Float(a.as_f64().powf(b.as_f64())),
        }
    }
    /// Three-way comparison yielding -1, 0 or 1.
    pub fn compare(self, other: Number) -> i64 {
        let ordering = match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.cmp(&b),
            (a, b) => a.as_f64().total_cmp(&b.as_f64()),
        };
        match ordering {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }
    pub fn shl(self, other: Number) -> Option<Number> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(Number::Int(a.wrapping_shl(b as u32))),
            _ => None,
        }
    }
    pub fn shr(self, other: Number) -> Option<Number> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(Number::Int(a.wrapping_shr(b as u32))),
            _ => None,
        }
    }
    /// Logical shift: the sign bit is not extended.
    pub fn ushr(self, other: Number) -> Option<Number> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(Number::Int((a as u64).wrapping_shr(b as u32) as i64)),
            _ => None,
        }
    }
}

impl ops::Add for Number {
    type Output = Number;
    fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => match a.checked_add(b) {
                Some(n) => Number::Int(n),
                None => Number::Float(a as f64 + b as f64),
            },
            (a, b) => Number::Float(a.as_f64() + b.as_f64()),
        }
    }
}

impl ops::Sub for Number {
    type Output = Number;
    fn sub(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => match a.checked_sub(b) {
                Some(n) => Number::Int(n),
                None => Number::Float(a as f64 - b as f64),
            },
            (a, b) => Number::Float(a.as_f64() - b.as_f64()),
        }
    }
}

impl ops::Mul for Number {
    type Output = Number;
    fn mul(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => match a.checked_mul(b) {
                Some(n) => Number::Int(n),
                None => Number::Float(a as f64 * b as f64),
            },
            (a, b) => Number::Float(a.as_f64() * b.as_f64()),
        }
    }
}

impl ops::Div for Number {
    type Output = Option<Number>;
    fn div(self, other: Number) -> Option<Number> {
        match (self, other) {
            (Number::Int(_), Number::Int(0)) => None,
            (Number::Int(a), Number::Int(b)) => match a.checked_div(b) {
                Some(n) => Some(Number::Int(n)),
                None => Some(Number::Float(a as f64 / b as f64)),
            },
            (a, b) => Some(Number::Float(a.as_f64() / b.as_f64())),
        }
    }
}

impl ops::Rem for Number {
    type Output = Option<Number>;
    fn rem(self, other: Number) -> Option<Number> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => match a.checked_rem(b) {
                Some(n) => Some(Number::Int(n)),
                None if b == -1 => Some(Number::Int(0)),
                None => None,
            },
            (a, b) => Some(Number::Float(a.as_f64() % b.as_f64())),
        }
    }
}

impl ops::Neg for Number {
    type Output = Number;

    fn neg(self) -> Number {
        match self {
            Number::Int(a) => match a.checked_neg() {
                Some(n) => Number::Int(n),
                None => Number::Float(-(a as f64)),
            },
            Number::Float(f) => Number::Float(-f),
        }
    }
}

macro_rules! build_bitwise_ops {
    ($type:ident, $func:ident, $op:tt) => {
        impl ops::$type for Number {
            type Output = Option<Number>;
            fn $func(self, other: Number) -> Option<Number> {
                match (self, other) {
                    (Number::Int(a), Number::Int(b)) => Some(Number::Int(a $op b)),
                    _ => None,
                }
            }
        }
    };
}

build_bitwise_ops!(BitOr, bitor, |);
build_bitwise_ops!(BitXor, bitxor, ^);
build_bitwise_ops!(BitAnd, bitand, &);

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (Number::Float(a), Number::Float(b)) => a == b,
            (Number::Int(a), Number::Float(b)) => (*a as f64) == *b,
            (Number::Float(a), Number::Int(b)) => *a == (*b as f64),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.partial_cmp(b),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(n) => write!(f, "{}", {
                if n.fract() == 0.0 && n.is_finite() {
                    format!("{:.1}", n)
                }
                else {
                    n.to_string()
                }
            }),
        }
    }
}

pub type List = Rc<RefCell<Vec<Value>>>;
type ListPtr = *const RefCell<Vec<Value>>;

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Num(Number),
    Str(Rc<str>),
    List(List),
    Tuple(Rc<[Value]>),
    Closure(Rc<Closure>),
    Callback(Rc<Callback>),
    Type(Rc<TypeDef>),
    Object(Rc<Object>),
    Kit(Rc<Kit>),
    Reference(Rc<Reference>),
}

impl Value {
    pub fn int(i: i64) -> Value {
        Value::Num(Number::Int(i))
    }
    pub fn float(f: f64) -> Value {
        Value::Num(Number::Float(f))
    }
    pub fn string(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }
    pub fn list(values: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(values)))
    }
    pub fn tuple(values: Vec<Value>) -> Value {
        Value::Tuple(Rc::from(values))
    }

    /// Truthiness of an already dereferenced value.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => n.as_bool(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Num(Number::Int(i)) => Some(*i),
            _ => None,
        }
    }
    pub fn is_invocable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Callback(_) | Value::Type(_))
            || matches!(self, Value::Object(o) if o.type_def.invoke().is_some())
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Num(Number::Int(_)) => "int".to_string(),
            Value::Num(Number::Float(_)) => "float".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Tuple(_) => "tuple".to_string(),
            Value::Closure(_) => "closure".to_string(),
            Value::Callback(_) => "callback".to_string(),
            Value::Type(_) => "type".to_string(),
            Value::Object(o) => o.type_def.name.to_string(),
            Value::Kit(_) => "kit".to_string(),
            Value::Reference(_) => "reference".to_string(),
        }
    }

    /// Structural equality for data, identity for functions, types and objects.
    pub fn equals(&self, other: &Value) -> bool {
        self.equals_in(other, &mut vec![])
    }

    /// Pairs of lists already being compared count as equal, so cyclic lists terminate.
    fn equals_in(&self, other: &Value, comparing: &mut Vec<(ListPtr, ListPtr)>) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                let pair = (Rc::as_ptr(a), Rc::as_ptr(b));
                if Rc::ptr_eq(a, b) || comparing.contains(&pair) {
                    return true;
                }
                comparing.push(pair);
                let (x, y) = (a.borrow(), b.borrow());
                let equal = x.len() == y.len() && x.iter().zip(y.iter()).all(|(x, y)| x.equals_in(y, comparing));
                comparing.pop();
                equal
            },
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals_in(y, comparing))
            },
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Callback(a), Value::Callback(b)) => Rc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Kit(a), Value::Kit(b)) => Rc::ptr_eq(a, b),
            (Value::Reference(a), Value::Reference(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Quoted form used for elements nested inside lists and tuples.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", s),
            other => other.to_string(),
        }
    }
}

/// Writes `value`, quoting strings when `quoted`. Lists on `open` are being
/// written further up and print as `[...]`.
fn write_value(f: &mut fmt::Formatter, value: &Value, quoted: bool, open: &mut Vec<ListPtr>) -> fmt::Result {
    match value {
        Value::Str(s) if quoted => write!(f, "{:?}", s),
        Value::List(l) => {
            if open.contains(&Rc::as_ptr(l)) {
                return write!(f, "[...]");
            }
            let values = match l.try_borrow() {
                Ok(values) => values,
                Err(_) => return write!(f, "[...]"),
            };
            open.push(Rc::as_ptr(l));
            let written = write_sequence(f, "[", &values, "]", open);
            open.pop();
            written
        },
        Value::Tuple(t) if t.len() == 1 => {
            write!(f, "(")?;
            write_value(f, &t[0], true, open)?;
            write!(f, ",)")
        },
        Value::Tuple(t) => write_sequence(f, "(", t, ")", open),
        Value::Null => write!(f, "null"),
        Value::Bool(b) => write!(f, "{}", b),
        Value::Num(n) => write!(f, "{}", n),
        Value::Str(s) => write!(f, "{}", s),
        Value::Closure(c) => write!(f, "fn {}", c.prototype.display_name()),
        Value::Callback(c) => write!(f, "callback {}", c.name),
        Value::Type(t) => write!(f, "type {}", t.name),
        Value::Object(o) => write!(f, "{} object", o.type_def.name),
        Value::Kit(k) => write!(f, "kit {}", k.name),
        Value::Reference(r) => write!(f, "{} reference", r.kind_name()),
    }
}

fn write_sequence(
    f: &mut fmt::Formatter,
    start: &str,
    values: &[Value],
    end: &str,
    open: &mut Vec<ListPtr>,
) -> fmt::Result {
    write!(f, "{}", start)?;
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write_value(f, value, true, open)?;
    }
    write!(f, "{}", end)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_value(f, self, false, &mut vec![])
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}
