//! Engine code
//!
//! Each rule compiles to two programs for the engine's stack machine:
//!     a constraint program that decides whether the rule may fire,
//!     and an action program that performs the rule's effects.
//! Both are sequences of big-endian bytes: an opcode followed by its operands.

mod compiler;
mod disasm;

pub use compiler::{compile_rule, min_version, RuleContext};
pub use disasm::{disassemble, DisasmError, Instruction, Operand};

/// An engine opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    PushByte = 1,
    PushByteU = 2,
    PushShort = 3,
    PushShortU = 4,
    PushLong = 5,
    Add = 6,
    Sub = 7,
    Mul = 8,
    Div = 9,
    Min = 10,
    Max = 11,
    Neg = 12,
    Trunc8 = 13,
    Trunc16 = 14,
    Cond = 15,
    And = 16,
    Or = 17,
    Not = 18,
    Equal = 19,
    NotEq = 20,
    Less = 21,
    Gtr = 22,
    LessEq = 23,
    GtrEq = 24,
    Next = 25,
    NextN = 26,
    CopyNext = 27,
    PutGlyphV1_2 = 28,
    PutSubsV1_2 = 29,
    PutCopy = 30,
    Insert = 31,
    Delete = 32,
    Assoc = 33,
    CntxtItem = 34,
    AttrSet = 35,
    AttrAdd = 36,
    AttrSub = 37,
    AttrSetSlot = 38,
    IAttrSetSlot = 39,
    PushSlotAttr = 40,
    PushGlyphAttrV1_2 = 41,
    PushGlyphMetric = 42,
    PushFeat = 43,
    PushISlotAttr = 46,
    PopRet = 48,
    RetZero = 49,
    RetTrue = 50,
    IAttrSet = 51,
    IAttrAdd = 52,
    IAttrSub = 53,
    PushProcState = 54,
    PushVersion = 55,
    PutSubs = 56,
    PutGlyph = 59,
    PushGlyphAttr = 60,
    BitOr = 62,
    BitAnd = 63,
    BitNot = 64,
}

/// Kind of an instruction operand.
///
/// [OperandKind::Slots] is the counted list of the `Assoc` instruction:
///     a `u8` count followed by that many `i8` slot offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    Slots,
}

impl Opcode {
    const ALL: [Opcode; 59] = {
        use Opcode::*;
        [
            Nop,
            PushByte,
            PushByteU,
            PushShort,
            PushShortU,
            PushLong,
            Add,
            Sub,
            Mul,
            Div,
            Min,
            Max,
            Neg,
            Trunc8,
            Trunc16,
            Cond,
            And,
            Or,
            Not,
            Equal,
            NotEq,
            Less,
            Gtr,
            LessEq,
            GtrEq,
            Next,
            NextN,
            CopyNext,
            PutGlyphV1_2,
            PutSubsV1_2,
            PutCopy,
            Insert,
            Delete,
            Assoc,
            CntxtItem,
            AttrSet,
            AttrAdd,
            AttrSub,
            AttrSetSlot,
            IAttrSetSlot,
            PushSlotAttr,
            PushGlyphAttrV1_2,
            PushGlyphMetric,
            PushFeat,
            PushISlotAttr,
            PopRet,
            RetZero,
            RetTrue,
            IAttrSet,
            IAttrAdd,
            IAttrSub,
            PushProcState,
            PushVersion,
            PutSubs,
            PutGlyph,
            PushGlyphAttr,
            BitOr,
            BitAnd,
            BitNot,
        ]
    };

    pub fn from_byte(b: u8) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| *op as u8 == b)
    }

    pub fn name(&self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "Nop",
            PushByte => "PushByte",
            PushByteU => "PushByteU",
            PushShort => "PushShort",
            PushShortU => "PushShortU",
            PushLong => "PushLong",
            Add => "Add",
            Sub => "Sub",
            Mul => "Mul",
            Div => "Div",
            Min => "Min",
            Max => "Max",
            Neg => "Neg",
            Trunc8 => "Trunc8",
            Trunc16 => "Trunc16",
            Cond => "Cond",
            And => "And",
            Or => "Or",
            Not => "Not",
            Equal => "Equal",
            NotEq => "NotEq",
            Less => "Less",
            Gtr => "Gtr",
            LessEq => "LessEq",
            GtrEq => "GtrEq",
            Next => "Next",
            NextN => "NextN",
            CopyNext => "CopyNext",
            PutGlyphV1_2 => "PutGlyphV1_2",
            PutSubsV1_2 => "PutSubsV1_2",
            PutCopy => "PutCopy",
            Insert => "Insert",
            Delete => "Delete",
            Assoc => "Assoc",
            CntxtItem => "CntxtItem",
            AttrSet => "AttrSet",
            AttrAdd => "AttrAdd",
            AttrSub => "AttrSub",
            AttrSetSlot => "AttrSetSlot",
            IAttrSetSlot => "IAttrSetSlot",
            PushSlotAttr => "PushSlotAttr",
            PushGlyphAttrV1_2 => "PushGlyphAttrV1_2",
            PushGlyphMetric => "PushGlyphMetric",
            PushFeat => "PushFeat",
            PushISlotAttr => "PushISlotAttr",
            PopRet => "PopRet",
            RetZero => "RetZero",
            RetTrue => "RetTrue",
            IAttrSet => "IAttrSet",
            IAttrAdd => "IAttrAdd",
            IAttrSub => "IAttrSub",
            PushProcState => "PushProcState",
            PushVersion => "PushVersion",
            PutSubs => "PutSubs",
            PutGlyph => "PutGlyph",
            PushGlyphAttr => "PushGlyphAttr",
            BitOr => "BitOr",
            BitAnd => "BitAnd",
            BitNot => "BitNot",
        }
    }

    /// Operands that follow the opcode, in order.
    pub fn operands(&self) -> &'static [OperandKind] {
        use OperandKind::*;
        use Opcode::*;
        match self {
            PushByte | NextN | PutCopy => &[I8],
            PushByteU | PutGlyphV1_2 | AttrSet | AttrAdd | AttrSub | AttrSetSlot
            | PushProcState => &[U8],
            PushShort => &[I16],
            PushShortU | PutGlyph => &[U16],
            PushLong => &[I32],
            PutSubsV1_2 => &[I8, U8, U8],
            Assoc => &[Slots],
            CntxtItem => &[I8, U8],
            IAttrSetSlot | IAttrSet | IAttrAdd | IAttrSub => &[U8, U8],
            PushSlotAttr | PushGlyphAttrV1_2 | PushFeat => &[U8, I8],
            PushGlyphMetric => &[U8, I8, I8],
            PushISlotAttr => &[U8, I8, U8],
            PutSubs => &[I8, U16, U16],
            PushGlyphAttr => &[U16, I8],
            _ => &[],
        }
    }

    /// Whether the opcode can appear in a constraint program.
    ///
    /// Constraints cannot modify the glyph stream.
    pub fn allowed_in_constraints(&self) -> bool {
        use Opcode::*;
        !matches!(
            self,
            Next | NextN
                | CopyNext
                | PutGlyphV1_2
                | PutSubsV1_2
                | PutCopy
                | Insert
                | Delete
                | Assoc
                | AttrSet
                | AttrAdd
                | AttrSub
                | AttrSetSlot
                | IAttrSetSlot
                | IAttrSet
                | IAttrAdd
                | IAttrSub
                | PutSubs
                | PutGlyph
        )
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Buffer that engine code is written into.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CodeBuffer {
    bytes: Vec<u8>,
}

impl CodeBuffer {
    pub fn op(&mut self, op: Opcode) {
        self.bytes.push(op as u8);
    }

    pub fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    pub fn i8(&mut self, v: i8) {
        self.bytes.push(v as u8);
    }

    pub fn u16(&mut self, v: u16) {
        self.bytes.extend(v.to_be_bytes());
    }

    /// Pushes an integer literal using the shortest encoding.
    pub fn push_int(&mut self, v: i32) {
        if let Ok(v) = i8::try_from(v) {
            self.op(Opcode::PushByte);
            self.i8(v);
        } else if let Ok(v) = u8::try_from(v) {
            self.op(Opcode::PushByteU);
            self.u8(v);
        } else if let Ok(v) = i16::try_from(v) {
            self.op(Opcode::PushShort);
            self.bytes.extend(v.to_be_bytes());
        } else if let Ok(v) = u16::try_from(v) {
            self.op(Opcode::PushShortU);
            self.u16(v);
        } else {
            self.op(Opcode::PushLong);
            self.bytes.extend(v.to_be_bytes());
        }
    }

    /// Writes a zero byte to be filled in later with [CodeBuffer::patch_u8].
    pub fn placeholder_u8(&mut self) -> usize {
        self.bytes.push(0);
        self.bytes.len() - 1
    }

    pub fn patch_u8(&mut self, at: usize, v: u8) {
        self.bytes[at] = v;
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Compiled code of one rule.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RuleCode {
    /// Constraint program. Empty means the rule can always fire.
    pub constraints: Vec<u8>,
    pub actions: Vec<u8>,
}

/// Error generating code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeError {
    /// A relative slot operand does not fit in a signed byte.
    SlotOffsetOutOfRange(i32),
    /// A string literal can't be evaluated by the engine.
    StringInExpression,
    /// A slot reference was not given a stream index.
    UnresolvedSlotRef(usize),
    /// An operand is too large for the encoding available in the target version.
    OperandTooWide(u32),
    /// A guarded constraint is longer than the guard's skip distance can express.
    ConstraintTooLong(usize),
    /// A setting's value has the wrong shape for its attribute.
    InvalidValue(crate::attr::SlotAttr),
    /// A class used by a substitution was not given a replacement class ID.
    MissingClassId(crate::rule::ClassId),
    /// An item has more associations than the count operand can hold.
    TooManyAssociations(usize),
}

impl std::fmt::Display for CodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeError::SlotOffsetOutOfRange(offset) => {
                write!(f, "slot offset {offset} does not fit in one byte")
            }
            CodeError::StringInExpression => write!(f, "string literal in expression"),
            CodeError::UnresolvedSlotRef(item) => {
                write!(f, "slot reference @{} was never resolved", item + 1)
            }
            CodeError::OperandTooWide(v) => {
                write!(f, "operand {v} is too large for the target version")
            }
            CodeError::ConstraintTooLong(len) => {
                write!(f, "constraint is {len} bytes long; the limit is 255")
            }
            CodeError::InvalidValue(attr) => write!(f, "invalid value for {attr}"),
            CodeError::MissingClassId(class) => {
                write!(f, "class {class} has no replacement class ID")
            }
            CodeError::TooManyAssociations(count) => {
                write!(f, "{count} associations; the limit is 255")
            }
        }
    }
}

impl std::error::Error for CodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! push_int_tests {
        ( $( ($name: ident, $value: expr, $want: expr), )+ ) => {
            $(
                #[test]
                fn $name() {
                    let mut buf = CodeBuffer::default();
                    buf.push_int($value);
                    let want: Vec<u8> = $want;
                    assert_eq!(buf.into_bytes(), want);
                }
            )+
        };
    }

    push_int_tests!(
        (push_small, 5, vec![1, 5]),
        (push_negative, -1, vec![1, 0xFF]),
        (push_unsigned_byte, 200, vec![2, 200]),
        (push_short, -300, vec![3, 0xFE, 0xD4]),
        (push_unsigned_short, 40000, vec![4, 0x9C, 0x40]),
        (push_long, 70000, vec![5, 0, 1, 0x11, 0x70]),
    );

    #[test]
    fn opcode_bytes_round_trip() {
        for b in 0..=255_u8 {
            if let Some(op) = Opcode::from_byte(b) {
                assert_eq!(op as u8, b);
            }
        }
        assert_eq!(Opcode::from_byte(44), None);
        assert_eq!(Opcode::from_byte(59), Some(Opcode::PutGlyph));
        assert_eq!(Opcode::from_byte(64), Some(Opcode::BitNot));
    }

    #[test]
    fn placeholder_is_patched() {
        let mut buf = CodeBuffer::default();
        buf.op(Opcode::CntxtItem);
        buf.i8(0);
        let at = buf.placeholder_u8();
        buf.push_int(1);
        let len = buf.len() - at - 1;
        buf.patch_u8(at, len as u8);
        assert_eq!(buf.into_bytes(), vec![34, 0, 2, 1, 1]);
    }
}
