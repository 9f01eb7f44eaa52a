//! Tag grammar of the envelope field loop.

use bitcoin::{
    Opcode,
    opcodes::all::{OP_PUSHNUM_1, OP_PUSHNUM_16, OP_PUSHNUM_NEG1},
    script::Instruction,
};

/// Semantic role of a tag/value pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldCode {
    /// File body.  Terminates the field loop.
    Content,

    /// Media type of the body.
    ContentType,

    /// Outpoint of a parent item.
    Parent,

    /// Any other code.  Ignored on decode.
    Unknown(i16),
}

impl FieldCode {
    /// Maps a numeric tag to its field code.
    pub fn from_code(code: i16) -> Self {
        match code {
            0 => Self::Content,
            1 => Self::ContentType,
            3 => Self::Parent,
            other => Self::Unknown(other),
        }
    }

    /// Numeric value of the code.
    pub fn code(self) -> i16 {
        match self {
            Self::Content => 0,
            Self::ContentType => 1,
            Self::Parent => 3,
            Self::Unknown(code) => code,
        }
    }
}

/// An instruction that is allowed in tag or value position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operand<'a> {
    /// `OP_PUSHNUM_NEG1` or `OP_PUSHNUM_1` through `OP_PUSHNUM_16`.
    SmallInt(i16),

    /// Data push of any length, including `OP_0`.
    Push(&'a [u8]),
}

/// Resolved meaning of a tag operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tag<'a> {
    Field(FieldCode),

    /// Multi-byte tag, candidate extension key.
    Extension(&'a [u8]),
}

impl<'a> Operand<'a> {
    /// Classifies an instruction, returning `None` for anything that cannot
    /// appear in tag or value position.
    pub(crate) fn from_instruction(ins: &Instruction<'a>) -> Option<Self> {
        match *ins {
            Instruction::PushBytes(bytes) => Some(Self::Push(bytes.as_bytes())),
            Instruction::Op(op) => small_int(op).map(Self::SmallInt),
        }
    }

    /// Data carried when used as a value.  Small integers carry none.
    pub(crate) fn data(&self) -> &'a [u8] {
        match *self {
            Self::SmallInt(_) => &[],
            Self::Push(bytes) => bytes,
        }
    }

    /// Resolves this operand as a tag.
    ///
    /// A zero-length push is field code 0 and a one-byte push is the byte's
    /// unsigned value.
    pub(crate) fn to_tag(&self) -> Tag<'a> {
        match *self {
            Self::SmallInt(n) => Tag::Field(FieldCode::from_code(n)),
            Self::Push([]) => Tag::Field(FieldCode::Content),
            Self::Push([b]) => Tag::Field(FieldCode::from_code(i16::from(*b))),
            Self::Push(bytes) => Tag::Extension(bytes),
        }
    }
}

/// Value of a small integer opcode, if `op` is one.
pub(crate) fn small_int(op: Opcode) -> Option<i16> {
    let byte = op.to_u8();
    if op == OP_PUSHNUM_NEG1 {
        Some(-1)
    } else if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&byte) {
        Some(i16::from(byte - OP_PUSHNUM_1.to_u8()) + 1)
    } else {
        None
    }
}
