//! Disassembler for engine code

use super::{Opcode, OperandKind};

/// A decoded operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    Slots(Vec<i8>),
}

impl Operand {
    /// The value of a scalar operand; [None] for a slot list.
    pub fn value(&self) -> Option<i32> {
        match self {
            Operand::I8(v) => Some(*v as i32),
            Operand::U8(v) => Some(*v as i32),
            Operand::I16(v) => Some(*v as i32),
            Operand::U16(v) => Some(*v as i32),
            Operand::I32(v) => Some(*v),
            Operand::Slots(_) => None,
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Slots(slots) => {
                write!(f, "[")?;
                for (i, slot) in slots.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{slot}")?;
                }
                write!(f, "]")
            }
            scalar => write!(f, "{}", scalar.value().unwrap_or_default()),
        }
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Byte offset of the opcode.
    pub offset: usize,
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    /// Encoded length in bytes, opcode included.
    pub len: usize,
}

impl Instruction {
    /// Value of the `i`-th scalar operand.
    pub fn operand(&self, i: usize) -> Option<i32> {
        self.operands.get(i).and_then(Operand::value)
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>4}: {}", self.offset, self.opcode)?;
        for operand in &self.operands {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisasmError {
    UnknownOpcode { offset: usize, byte: u8 },
    Truncated { offset: usize, opcode: Opcode },
}

impl std::fmt::Display for DisasmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisasmError::UnknownOpcode { offset, byte } => {
                write!(f, "unknown opcode {byte} at offset {offset}")
            }
            DisasmError::Truncated { offset, opcode } => {
                write!(f, "{opcode} at offset {offset} is missing operands")
            }
        }
    }
}

impl std::error::Error for DisasmError {}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let chunk = self.bytes.get(self.pos..self.pos + N)?;
        self.pos += N;
        chunk.try_into().ok()
    }

    fn operand(&mut self, kind: OperandKind) -> Option<Operand> {
        Some(match kind {
            OperandKind::I8 => Operand::I8(i8::from_be_bytes(self.take()?)),
            OperandKind::U8 => Operand::U8(u8::from_be_bytes(self.take()?)),
            OperandKind::I16 => Operand::I16(i16::from_be_bytes(self.take()?)),
            OperandKind::U16 => Operand::U16(u16::from_be_bytes(self.take()?)),
            OperandKind::I32 => Operand::I32(i32::from_be_bytes(self.take()?)),
            OperandKind::Slots => {
                let [count] = self.take()?;
                let mut slots = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    slots.push(i8::from_be_bytes(self.take()?));
                }
                Operand::Slots(slots)
            }
        })
    }
}

/// Decodes a program into instructions.
pub fn disassemble(bytes: &[u8]) -> Result<Vec<Instruction>, DisasmError> {
    let mut reader = Reader { bytes, pos: 0 };
    let mut instructions = vec![];
    while reader.pos < bytes.len() {
        let offset = reader.pos;
        let byte = bytes[offset];
        let opcode = Opcode::from_byte(byte).ok_or(DisasmError::UnknownOpcode { offset, byte })?;
        reader.pos += 1;
        let mut operands = vec![];
        for kind in opcode.operands() {
            let operand = reader
                .operand(*kind)
                .ok_or(DisasmError::Truncated { offset, opcode })?;
            operands.push(operand);
        }
        instructions.push(Instruction {
            offset,
            opcode,
            operands,
            len: reader.pos - offset,
        });
    }
    Ok(instructions)
}
