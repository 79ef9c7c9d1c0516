use std::{fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    chunk::{Instruction, LineTable},
    value::{Number, Value},
};

/// Constant pool entry. Floats compare by bit pattern so the pool can be
/// deduplicated without NaN breaking equality.
#[derive(Debug, Clone)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(Rc<str>),
}

impl Constant {
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Int(i) => Value::Num(Number::Int(*i)),
            Constant::Float(f) => Value::Num(Number::Float(*f)),
            Constant::Str(s) => Value::Str(s.clone()),
        }
    }
    pub fn as_str(&self) -> Option<&Rc<str>> {
        match self {
            Constant::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Str(a), Constant::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Constant::Int(i) => write!(f, "{}", i),
            Constant::Float(n) => write!(f, "{}", Number::Float(*n)),
            Constant::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// End offset of a local that was captured by a closure.
pub const CAPTURED: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalValueInfo {
    pub name: Rc<str>,
    pub slot: u32,
    pub start_op: u32,
    pub end_op: u32,
}

impl LocalValueInfo {
    pub fn is_captured(&self) -> bool {
        self.end_op == CAPTURED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OuterKind {
    LocalInParent,
    OuterInParent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OuterValueInfo {
    pub name: Rc<str>,
    pub position: u32,
    pub kind: OuterKind,
}

/// Compile-time description of a user type. Member fields index into the
/// owning prototype's nested prototypes.
#[derive(Debug, Clone, Default)]
pub struct TypePrototype {
    pub name: Rc<str>,
    pub ctor: Option<u32>,
    pub methods: Vec<(Rc<str>, u32)>,
    pub prefix: Vec<(Rc<str>, u32)>,
    pub infix: Vec<(Rc<str>, u32)>,
    pub invoke: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchKey {
    Null,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    Default,
}

impl MatchKey {
    /// Key for a runtime scrutinee; values of other kinds only hit the default arm.
    pub fn of(value: &Value) -> Option<MatchKey> {
        match value {
            Value::Null => Some(MatchKey::Null),
            Value::Bool(b) => Some(MatchKey::Bool(*b)),
            Value::Num(Number::Int(i)) => Some(MatchKey::Int(*i)),
            Value::Num(Number::Float(f)) if f.fract() == 0.0 && f.is_finite() => Some(MatchKey::Int(*f as i64)),
            Value::Str(s) => Some(MatchKey::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MatchKey::Null => write!(f, "null"),
            MatchKey::Bool(b) => write!(f, "{}", b),
            MatchKey::Int(i) => write!(f, "{}", i),
            MatchKey::Str(s) => write!(f, "{:?}", s),
            MatchKey::Default => write!(f, "_"),
        }
    }
}

/// Target offsets of one `MATCH` instruction. Always holds a `Default` entry
/// once the compiler is done with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JumpTable {
    pub cases: IndexMap<MatchKey, u32>,
}

impl JumpTable {
    pub fn target(&self, key: Option<MatchKey>) -> Option<u32> {
        key.and_then(|key| self.cases.get(&key))
            .or_else(|| self.cases.get(&MatchKey::Default))
            .copied()
    }
}

/// Immutable compiled function, shared by every closure created from it.
#[derive(Debug)]
pub struct FunctionPrototype {
    pub name: Option<Rc<str>>,
    pub code: Box<[Instruction]>,
    pub num_params: u32,
    pub variadic: bool,
    pub max_locals: usize,
    pub max_stack: usize,
    pub constants: Box<[Constant]>,
    pub outers: Box<[OuterValueInfo]>,
    pub nested: Box<[Rc<FunctionPrototype>]>,
    pub types: Box<[TypePrototype]>,
    pub jump_tables: Box<[JumpTable]>,
    pub locals: Box<[LocalValueInfo]>,
    pub lines: LineTable,
}

impl FunctionPrototype {
    pub fn line(&self, ip: usize) -> u32 {
        self.lines.line(ip)
    }
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
    /// Number of arguments a call must supply at minimum.
    pub fn required_args(&self) -> usize {
        if self.variadic {
            self.num_params.saturating_sub(1) as usize
        }
        else {
            self.num_params as usize
        }
    }
}
