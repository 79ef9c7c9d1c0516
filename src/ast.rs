use crate::diagnostics::Location;

/// An expression node. Every construct in the language is an expression;
/// `is_result_required` is assigned by the normalizer and tells the compiler
/// whether the value must be left on the operand stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub location: Location,
    pub is_result_required: bool,
}

impl Node {
    pub fn new(kind: NodeKind, location: Location) -> Self {
        Self {
            kind,
            location,
            is_result_required: false,
        }
    }

    /// Truthiness of a literal node, `None` for anything that is not a literal.
    pub fn literal_truth(&self) -> Option<bool> {
        match &self.kind {
            NodeKind::Null => Some(false),
            NodeKind::Bool(b) => Some(*b),
            NodeKind::Int(i) => Some(*i != 0),
            NodeKind::Float(f) => Some(*f != 0.0),
            NodeKind::Str(s) => Some(!s.is_empty()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Identifier(String),
    This,

    Prefix { op: String, operand: Box<Node> },
    Infix { op: String, left: Box<Node>, right: Box<Node> },
    And { left: Box<Node>, right: Box<Node> },
    Or { left: Box<Node>, right: Box<Node> },
    Not(Box<Node>),

    Scope(Vec<Node>),
    VarDef(Vec<(String, Node)>),
    FnDef { name: String, function: FunctionData },
    Fn(FunctionData),
    TypeDef(TypeData),

    Assign { target: Box<Node>, value: Box<Node> },
    /// `target op= value`; the target's operands are evaluated once.
    CompoundAssign { op: String, target: Box<Node>, value: Box<Node> },
    Invoke { target: Box<Node>, args: Vec<Node> },
    Index { target: Box<Node>, index: Box<Node> },
    Field { target: Box<Node>, name: String },

    If { condition: Box<Node>, pass: Box<Node>, fail: Option<Box<Node>> },
    While { condition: Box<Node>, body: Box<Node>, el: Option<Box<Node>> },
    Match { scrutinee: Box<Node>, arms: Vec<MatchArm> },

    Ref(Box<Node>),
    Deref(Box<Node>),
    List(Vec<Node>),
    Tuple(Vec<Node>),
    Ret(Option<Box<Node>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionData {
    pub params: Vec<String>,
    pub variadic: bool,
    pub body: Box<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeData {
    pub name: String,
    pub ctor: Option<FunctionData>,
    pub methods: Vec<(String, FunctionData)>,
    pub prefix: Vec<(String, FunctionData)>,
    pub infix: Vec<(String, FunctionData)>,
    pub invoke: Option<FunctionData>,
}

impl TypeData {
    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut FunctionData> {
        self.ctor
            .iter_mut()
            .chain(self.methods.iter_mut().map(|(_, f)| f))
            .chain(self.prefix.iter_mut().map(|(_, f)| f))
            .chain(self.infix.iter_mut().map(|(_, f)| f))
            .chain(self.invoke.iter_mut())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchPattern {
    Literal(Node),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: MatchPattern,
    pub body: Node,
    pub location: Location,
}
