//! Instruction set and packed encoding.
//!
//! Every instruction is one `u32`: the low 8 bits hold the opcode, the rest
//! hold the operands in one of two layouts chosen per opcode. `Wide` keeps a
//! single 24-bit operand `c`, `Split` keeps two 12-bit operands `a` and `b`.

pub const OP_BITS: u32 = 8;
pub const C_BITS: u32 = 24;
pub const A_BITS: u32 = 12;
pub const B_BITS: u32 = 12;

pub const MAX_C: u32 = (1 << C_BITS) - 1;
pub const MAX_A: u32 = (1 << A_BITS) - 1;
pub const MAX_B: u32 = (1 << B_BITS) - 1;

const OP_MASK: u32 = (1 << OP_BITS) - 1;
const A_SHIFT: u32 = OP_BITS;
const B_SHIFT: u32 = OP_BITS + A_BITS;
const C_SHIFT: u32 = OP_BITS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    None,
    Wide,
    Split,
}

macro_rules! generate_opcode {
    ($($name:ident: $layout:ident),+ $(,)?) => {
        #[allow(non_camel_case_types)]
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum OpCode {
            $($name),+
        }

        impl OpCode {
            const ALL: &'static [OpCode] = &[$(OpCode::$name),+];

            pub fn from_u8(byte: u8) -> Option<OpCode> {
                OpCode::ALL.get(byte as usize).copied()
            }
            pub fn name(self) -> &'static str {
                match self {
                    $(OpCode::$name => stringify!($name)),+
                }
            }
            pub fn layout(self) -> Layout {
                match self {
                    $(OpCode::$name => Layout::$layout),+
                }
            }
        }
    };
}

generate_opcode!(
    POP: None,
    DUP: None,
    DUP2: None,
    CLOSE_OUTERS: Wide,

    JUMP: Wide,
    JUMP_TRUE: Wide,
    JUMP_FALSE: Wide,
    AND: Wide,
    OR: Wide,

    LOAD_LOCAL: Wide,
    STORE_LOCAL: Wide,
    INIT_LOCAL: Wide,
    LOAD_OUTER: Wide,
    STORE_OUTER: Wide,
    LOAD_GLOBAL: Wide,
    STORE_GLOBAL: Wide,
    LOAD_INDEX: None,
    STORE_INDEX: None,
    LOAD_FIELD: Wide,
    STORE_FIELD: Wide,

    NULL: None,
    TRUE: None,
    FALSE: None,
    CONST: Wide,
    INT_M1: None,
    INT_0: None,
    INT_1: None,
    INT_2: None,
    INT_3: None,
    INT_4: None,
    INT_5: None,
    FLOAT_M1: None,
    FLOAT_0: None,
    FLOAT_1: None,
    FLOAT_2: None,
    FLOAT_3: None,
    FLOAT_4: None,
    FLOAT_5: None,

    LIST: Wide,
    TUPLE: Wide,
    CLOSURE: Wide,
    TYPE: Wide,
    THIS: None,

    INVOKE: Wide,
    INVOKE_METHOD: Split,
    PREFIX: Wide,
    INFIX: Wide,
    EQ: None,
    NEQ: None,
    NOT: None,

    MATCH: Wide,
    REF: Split,
    DEREF: None,
    STORE_DEREF: None,
    RET: None,
);

/// Reference kind codes carried in the `a` operand of `REF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RefKind {
    Global = 0,
    Local = 1,
    Outer = 2,
    Index = 3,
    Field = 4,
}

impl RefKind {
    pub fn from_u32(code: u32) -> Option<RefKind> {
        match code {
            0 => Some(RefKind::Global),
            1 => Some(RefKind::Local),
            2 => Some(RefKind::Outer),
            3 => Some(RefKind::Index),
            4 => Some(RefKind::Field),
            _ => None,
        }
    }
}

/// Emission-time form of an instruction. For `Wide` opcodes the operand lives
/// in `a`; packing moves it to the 24-bit field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insn {
    pub op: OpCode,
    pub a: u32,
    pub b: u32,
}

impl Insn {
    pub fn simple(op: OpCode) -> Self {
        Self { op, a: 0, b: 0 }
    }
    pub fn wide(op: OpCode, c: u32) -> Self {
        Self { op, a: c, b: 0 }
    }
    pub fn split(op: OpCode, a: u32, b: u32) -> Self {
        Self { op, a, b }
    }
    pub fn fits(&self) -> bool {
        match self.op.layout() {
            Layout::None => true,
            Layout::Wide => self.a <= MAX_C,
            Layout::Split => self.a <= MAX_A && self.b <= MAX_B,
        }
    }
    pub fn pack(&self) -> u32 {
        let op = self.op as u32;
        match self.op.layout() {
            Layout::None => op,
            Layout::Wide => op | ((self.a & MAX_C) << C_SHIFT),
            Layout::Split => op | ((self.a & MAX_A) << A_SHIFT) | ((self.b & MAX_B) << B_SHIFT),
        }
    }
}

/// A packed instruction word as stored in a prototype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction(pub u32);

impl Instruction {
    pub fn op(self) -> Option<OpCode> {
        OpCode::from_u8((self.0 & OP_MASK) as u8)
    }
    pub fn c(self) -> u32 {
        self.0 >> C_SHIFT
    }
    pub fn a(self) -> u32 {
        (self.0 >> A_SHIFT) & MAX_A
    }
    pub fn b(self) -> u32 {
        (self.0 >> B_SHIFT) & MAX_B
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LineEncoding {
    amount: u32,
    line: u32,
}

/// Run-length encoded source lines, one entry per emitted instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineTable {
    lines: Vec<LineEncoding>,
}

impl LineTable {
    pub fn new() -> Self {
        Self { lines: vec![] }
    }
    pub fn line(&self, i: usize) -> u32 {
        let mut current_line: u32 = 0;
        for l in &self.lines {
            current_line += l.amount;
            if current_line as usize > i {
                return l.line;
            }
        }
        0
    }
    pub fn add_line(&mut self, line: u32) {
        if let Some(last) = self.lines.last_mut() {
            if last.line == line {
                last.amount += 1;
                return;
            }
        }
        self.lines.push(LineEncoding { amount: 1, line });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_operand_round_trips() {
        let word = Instruction(Insn::wide(OpCode::JUMP, MAX_C).pack());
        assert_eq!(word.op(), Some(OpCode::JUMP));
        assert_eq!(word.c(), MAX_C);
    }

    #[test]
    fn split_operands_do_not_overlap() {
        let word = Instruction(Insn::split(OpCode::INVOKE_METHOD, 3, MAX_B).pack());
        assert_eq!(word.op(), Some(OpCode::INVOKE_METHOD));
        assert_eq!(word.a(), 3);
        assert_eq!(word.b(), MAX_B);
    }

    #[test]
    fn oversized_operands_do_not_fit() {
        assert!(!Insn::wide(OpCode::CONST, MAX_C + 1).fits());
        assert!(!Insn::split(OpCode::REF, MAX_A + 1, 0).fits());
        assert!(Insn::simple(OpCode::POP).fits());
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        assert_eq!(Instruction(0xFF).op(), None);
    }

    #[test]
    fn line_table_is_run_length_encoded() {
        let mut table = LineTable::new();
        for line in [1, 1, 1, 2, 4, 4] {
            table.add_line(line);
        }
        assert_eq!(table.lines.len(), 3);
        assert_eq!(table.line(2), 1);
        assert_eq!(table.line(3), 2);
        assert_eq!(table.line(5), 4);
        assert_eq!(table.line(6), 0);
    }
}
