//! Instruction set of the target VM and the operand shape of each opcode.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::{Display, EnumIter, EnumString};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// VM opcodes. The discriminant is the encoded opcode byte.
#[allow(non_camel_case_types, missing_docs)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive, EnumString, Display, EnumIter,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Opcode {
    NOP = 0,
    IADD,
    ISUB,
    IMUL,
    IDIV,
    IMOD,
    INOT,
    INEG,
    IEQ,
    INE,
    IGT,
    IGE,
    ILT,
    ILE,
    FADD,
    FSUB,
    FMUL,
    FDIV,
    FMOD,
    FNEG,
    FEQ,
    FNE,
    FGT,
    FGE,
    FLT,
    FLE,
    VADD,
    VSUB,
    VMUL,
    VDIV,
    VNEG,
    IAND,
    IOR,
    IXOR,
    I2F,
    F2I,
    F2V,
    PUSH_CONST_U8,
    PUSH_CONST_U8_U8,
    PUSH_CONST_U8_U8_U8,
    PUSH_CONST_U32,
    PUSH_CONST_F,
    DUP,
    DROP,
    NATIVE,
    ENTER,
    LEAVE,
    LOAD,
    STORE,
    STORE_REV,
    LOAD_N,
    STORE_N,
    ARRAY_U8,
    ARRAY_U8_LOAD,
    ARRAY_U8_STORE,
    LOCAL_U8,
    LOCAL_U8_LOAD,
    LOCAL_U8_STORE,
    STATIC_U8,
    STATIC_U8_LOAD,
    STATIC_U8_STORE,
    IADD_U8,
    IMUL_U8,
    IOFFSET,
    IOFFSET_U8,
    IOFFSET_U8_LOAD,
    IOFFSET_U8_STORE,
    PUSH_CONST_S16,
    IADD_S16,
    IMUL_S16,
    IOFFSET_S16,
    IOFFSET_S16_LOAD,
    IOFFSET_S16_STORE,
    ARRAY_U16,
    ARRAY_U16_LOAD,
    ARRAY_U16_STORE,
    LOCAL_U16,
    LOCAL_U16_LOAD,
    LOCAL_U16_STORE,
    STATIC_U16,
    STATIC_U16_LOAD,
    STATIC_U16_STORE,
    GLOBAL_U16,
    GLOBAL_U16_LOAD,
    GLOBAL_U16_STORE,
    J,
    JZ,
    IEQ_JZ,
    INE_JZ,
    IGT_JZ,
    IGE_JZ,
    ILT_JZ,
    ILE_JZ,
    CALL,
    GLOBAL_U24,
    GLOBAL_U24_LOAD,
    GLOBAL_U24_STORE,
    PUSH_CONST_U24,
    SWITCH,
    STRING,
    STRINGHASH,
    TEXT_LABEL_ASSIGN_STRING,
    TEXT_LABEL_ASSIGN_INT,
    TEXT_LABEL_APPEND_STRING,
    TEXT_LABEL_APPEND_INT,
    TEXT_LABEL_COPY,
    CATCH,
    THROW,
    CALLINDIRECT,
    PUSH_CONST_M1,
    PUSH_CONST_0,
    PUSH_CONST_1,
    PUSH_CONST_2,
    PUSH_CONST_3,
    PUSH_CONST_4,
    PUSH_CONST_5,
    PUSH_CONST_6,
    PUSH_CONST_7,
    PUSH_CONST_FM1,
    PUSH_CONST_F0,
    PUSH_CONST_F1,
    PUSH_CONST_F2,
    PUSH_CONST_F3,
    PUSH_CONST_F4,
    PUSH_CONST_F5,
    PUSH_CONST_F6,
    PUSH_CONST_F7,
}

/// Kind of one fixed-position operand field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// 1 byte.
    U8,
    /// 2 bytes, little-endian.
    U16,
    /// 3 bytes, little-endian.
    U24,
    /// 4 bytes, little-endian.
    U32,
    /// 2 bytes, little-endian, signed.
    S16,
    /// 4 bytes, IEEE-754 little-endian.
    F32,
    /// 2-byte signed offset relative to the end of the field.
    Label,
    /// 3-byte absolute IP of a function.
    Function,
}

impl OperandKind {
    /// Encoded width in bytes.
    pub const fn size(self) -> u32 {
        match self {
            Self::U8 => 1,
            Self::U16 | Self::S16 | Self::Label => 2,
            Self::U24 | Self::Function => 3,
            Self::U32 | Self::F32 => 4,
        }
    }

    /// Field name used in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U24 => "u24",
            Self::U32 => "u32",
            Self::S16 => "s16",
            Self::F32 => "f32",
            Self::Label => "label",
            Self::Function => "function",
        }
    }
}

/// Operand layout of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// A fixed sequence of fields.
    Fixed(&'static [OperandKind]),
    /// `u8 args, u16 frame, u8 name_len, name bytes`.
    Enter,
    /// Packed `(argc << 2) | returns`, then a big-endian `u16` slot.
    Native,
    /// `u8 count` then `count` pairs of `(u32 value, label)`.
    Switch,
}

use OperandKind as K;

const NONE: &[K] = &[];
const U8: &[K] = &[K::U8];
const U8_U8: &[K] = &[K::U8, K::U8];
const U8_U8_U8: &[K] = &[K::U8, K::U8, K::U8];
const U16: &[K] = &[K::U16];
const U24: &[K] = &[K::U24];
const U32: &[K] = &[K::U32];
const S16: &[K] = &[K::S16];
const F32: &[K] = &[K::F32];
const LABEL: &[K] = &[K::Label];
const FUNCTION: &[K] = &[K::Function];

impl Opcode {
    /// Decodes an opcode byte.
    pub fn from_byte(byte: u8) -> Option<Self> { Self::try_from(byte).ok() }

    /// Encoded opcode byte.
    pub fn byte(self) -> u8 { self.into() }

    /// Whether the VM may switch pages after executing this instruction.
    pub const fn is_control_flow(self) -> bool {
        matches!(
            self,
            Self::J
                | Self::JZ
                | Self::IEQ_JZ
                | Self::INE_JZ
                | Self::IGT_JZ
                | Self::IGE_JZ
                | Self::ILT_JZ
                | Self::ILE_JZ
                | Self::CALL
                | Self::LEAVE
                | Self::SWITCH
                | Self::THROW
                | Self::CALLINDIRECT
        )
    }

    /// Operand layout.
    pub const fn shape(self) -> OperandShape {
        use Opcode::*;
        let fields = match self {
            ENTER => return OperandShape::Enter,
            NATIVE => return OperandShape::Native,
            SWITCH => return OperandShape::Switch,

            PUSH_CONST_U8 | ARRAY_U8 | ARRAY_U8_LOAD | ARRAY_U8_STORE | LOCAL_U8 | LOCAL_U8_LOAD | LOCAL_U8_STORE
            | STATIC_U8 | STATIC_U8_LOAD | STATIC_U8_STORE | IADD_U8 | IMUL_U8 | IOFFSET_U8 | IOFFSET_U8_LOAD
            | IOFFSET_U8_STORE | TEXT_LABEL_ASSIGN_STRING | TEXT_LABEL_ASSIGN_INT | TEXT_LABEL_APPEND_STRING
            | TEXT_LABEL_APPEND_INT => U8,
            PUSH_CONST_U8_U8 | LEAVE => U8_U8,
            PUSH_CONST_U8_U8_U8 => U8_U8_U8,
            PUSH_CONST_U32 => U32,
            PUSH_CONST_F => F32,
            PUSH_CONST_S16 | IADD_S16 | IMUL_S16 | IOFFSET_S16 | IOFFSET_S16_LOAD | IOFFSET_S16_STORE => S16,
            ARRAY_U16 | ARRAY_U16_LOAD | ARRAY_U16_STORE | LOCAL_U16 | LOCAL_U16_LOAD | LOCAL_U16_STORE | STATIC_U16
            | STATIC_U16_LOAD | STATIC_U16_STORE | GLOBAL_U16 | GLOBAL_U16_LOAD | GLOBAL_U16_STORE => U16,
            GLOBAL_U24 | GLOBAL_U24_LOAD | GLOBAL_U24_STORE | PUSH_CONST_U24 => U24,
            J | JZ | IEQ_JZ | INE_JZ | IGT_JZ | IGE_JZ | ILT_JZ | ILE_JZ => LABEL,
            CALL => FUNCTION,
            _ => NONE,
        };
        OperandShape::Fixed(fields)
    }

    /// Encoded size when the shape is fixed.
    pub fn fixed_size(self) -> Option<u32> {
        match self.shape() {
            OperandShape::Fixed(fields) => Some(1 + fields.iter().map(|k| k.size()).sum::<u32>()),
            _ => None,
        }
    }
}
