//! Operand values shared by the assembler and the disassembler.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One instruction operand: an immediate or a symbolic reference.
///
/// Operands are positional. The disassembler yields them in the order the
/// encoding table writes them, which is the order the assembler consumes them.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Operand {
    /// 8-bit unsigned immediate.
    U8(u8),
    /// 16-bit unsigned immediate.
    U16(u16),
    /// 24-bit unsigned immediate (upper byte always zero).
    U24(u32),
    /// 32-bit unsigned immediate.
    U32(u32),
    /// 16-bit signed immediate.
    S16(i16),
    /// 32-bit float immediate.
    F32(f32),
    /// Label or function name.
    Identifier(String),
    /// One `(value, label)` entry of a switch table.
    SwitchCase {
        /// Matched value.
        value: u32,
        /// Label jumped to.
        label: String,
    },
}

impl Operand {
    /// Builds an identifier operand.
    pub fn ident(name: impl Into<String>) -> Self { Self::Identifier(name.into()) }

    /// Builds a switch case operand.
    pub fn case(value: u32, label: impl Into<String>) -> Self {
        Self::SwitchCase { value, label: label.into() }
    }

    /// Integer value, sign-extended for `S16`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::U8(v) => Some(i64::from(v)),
            Self::U16(v) => Some(i64::from(v)),
            Self::U24(v) | Self::U32(v) => Some(i64::from(v)),
            Self::S16(v) => Some(i64::from(v)),
            _ => None,
        }
    }

    /// Float value.
    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Self::F32(v) => Some(v),
            _ => None,
        }
    }

    /// Identifier text.
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Self::Identifier(s) => Some(s),
            _ => None,
        }
    }

    /// Switch case contents.
    pub fn as_switch_case(&self) -> Option<(u32, &str)> {
        match self {
            Self::SwitchCase { value, label } => Some((*value, label)),
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U24(_) => "u24",
            Self::U32(_) => "u32",
            Self::S16(_) => "s16",
            Self::F32(_) => "f32",
            Self::Identifier(_) => "identifier",
            Self::SwitchCase { .. } => "switch case",
        }
    }
}

// Floats compare by bit pattern so decoded operands equal their source.
impl PartialEq for Operand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::U8(a), Self::U8(b)) => a == b,
            (Self::U16(a), Self::U16(b)) => a == b,
            (Self::U24(a), Self::U24(b)) | (Self::U32(a), Self::U32(b)) => a == b,
            (Self::S16(a), Self::S16(b)) => a == b,
            (Self::F32(a), Self::F32(b)) => a.to_bits() == b.to_bits(),
            (Self::Identifier(a), Self::Identifier(b)) => a == b,
            (Self::SwitchCase { value: va, label: la }, Self::SwitchCase { value: vb, label: lb }) => {
                va == vb && la == lb
            }
            _ => false,
        }
    }
}

impl Eq for Operand {}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U24(v) | Self::U32(v) => write!(f, "{v}"),
            Self::S16(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v:?}"),
            Self::Identifier(s) => f.write_str(s),
            Self::SwitchCase { value, label } => write!(f, "{value}:{label}"),
        }
    }
}

impl From<u8> for Operand {
    fn from(v: u8) -> Self { Self::U8(v) }
}

impl From<u16> for Operand {
    fn from(v: u16) -> Self { Self::U16(v) }
}

impl From<u32> for Operand {
    fn from(v: u32) -> Self { Self::U32(v) }
}

impl From<i16> for Operand {
    fn from(v: i16) -> Self { Self::S16(v) }
}

impl From<f32> for Operand {
    fn from(v: f32) -> Self { Self::F32(v) }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self { Self::Identifier(s.to_owned()) }
}

impl From<String> for Operand {
    fn from(s: String) -> Self { Self::Identifier(s) }
}
