//! Pseudo-instructions expanded into native opcodes.
//!
//! Expansion picks the narrowest opcode form for each operand and consults
//! the unit's tables through [`HighLevelSink`]. It never touches addresses:
//! anything needing a fixup goes through [`HighLevelSink::emit`].

use scasm_core::{Opcode, Operand};
use strum::{Display, EnumIter, EnumString};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{CodeGenError, CodeGenResult};

/// Macro sink: what pseudo-instruction expansion may call.
pub trait HighLevelSink {
    /// Assembles one native instruction.
    fn emit(&mut self, opcode: Opcode, operands: &[Operand]) -> CodeGenResult<()>;
    /// Offset of `s` in the string heap.
    fn add_or_get_string(&mut self, s: &str) -> CodeGenResult<u32>;
    /// Hash of the native called `name`.
    fn native_hash(&self, name: &str) -> CodeGenResult<u64>;
    /// Slot of a native hash.
    fn add_or_get_native(&mut self, hash: u64) -> CodeGenResult<u16>;
    /// Offset of a static variable.
    fn static_offset(&self, name: &str) -> CodeGenResult<u32>;
    /// Offset of an argument or local of the current function.
    fn local_offset(&self, name: &str) -> CodeGenResult<u32>;
}

/// Pseudo-instructions.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HighLevelOp {
    /// `(int | float)`: pushes a constant.
    PUSH_CONST,
    /// `(identifier)`: pushes a string from the heap.
    PUSH_STRING,
    /// `(identifier, argc, returns)`: calls a native by name or `0x` hash.
    CALL_NATIVE,
    /// `(identifier)`: address of a local.
    LOCAL,
    /// `(identifier)`: loads a local.
    LOCAL_LOAD,
    /// `(identifier)`: stores into a local.
    LOCAL_STORE,
    /// `(identifier)`: address of a static.
    STATIC,
    /// `(identifier)`: loads a static.
    STATIC_LOAD,
    /// `(identifier)`: stores into a static.
    STATIC_STORE,
    /// `(int)`: address of a global.
    GLOBAL,
    /// `(int)`: loads a global.
    GLOBAL_LOAD,
    /// `(int)`: stores into a global.
    GLOBAL_STORE,
    /// `(item size)`: address of an array item.
    ARRAY,
    /// `(item size)`: loads an array item.
    ARRAY_LOAD,
    /// `(item size)`: stores into an array item.
    ARRAY_STORE,
    /// `(int)`: offsets an address.
    IOFFSET,
    /// `(int)`: loads at an offset.
    IOFFSET_LOAD,
    /// `(int)`: stores at an offset.
    IOFFSET_STORE,
    /// `(int)`: adds a constant.
    IADD_K,
    /// `(int)`: multiplies by a constant.
    IMUL_K,
}

/// Opcode forms of one access, by operand width.
struct Forms {
    u8: Option<Opcode>,
    u16: Option<Opcode>,
    s16: Option<Opcode>,
    u24: Option<Opcode>,
}

impl Forms {
    const fn unsigned(u8: Opcode, u16: Opcode) -> Self { Self { u8: Some(u8), u16: Some(u16), s16: None, u24: None } }
    const fn global(u16: Opcode, u24: Opcode) -> Self { Self { u8: None, u16: Some(u16), s16: None, u24: Some(u24) } }
    const fn signed(u8: Opcode, s16: Opcode) -> Self { Self { u8: Some(u8), u16: None, s16: Some(s16), u24: None } }
}

impl HighLevelOp {
    /// Expands into native instructions on `sink`.
    pub fn expand<S>(self, operands: &[Operand], sink: &mut S) -> CodeGenResult<()>
    where
        S: HighLevelSink + ?Sized,
    {
        use Opcode as O;
        match self {
            Self::PUSH_CONST => {
                self.arity(operands, 1)?;
                push_const(self, &operands[0], sink)
            }
            Self::PUSH_STRING => {
                self.arity(operands, 1)?;
                let index = sink.add_or_get_string(self.identifier(operands, 0)?)?;
                push_int(self, i64::from(index), sink)?;
                sink.emit(O::STRING, &[])
            }
            Self::CALL_NATIVE => {
                self.arity(operands, 3)?;
                let hash = sink.native_hash(self.identifier(operands, 0)?)?;
                let slot = sink.add_or_get_native(hash)?;
                sink.emit(O::NATIVE, &[operands[1].clone(), operands[2].clone(), Operand::U16(slot)])
            }
            Self::LOCAL | Self::LOCAL_LOAD | Self::LOCAL_STORE => {
                self.arity(operands, 1)?;
                let offset = sink.local_offset(self.identifier(operands, 0)?)?;
                let forms = match self {
                    Self::LOCAL => Forms::unsigned(O::LOCAL_U8, O::LOCAL_U16),
                    Self::LOCAL_LOAD => Forms::unsigned(O::LOCAL_U8_LOAD, O::LOCAL_U16_LOAD),
                    _ => Forms::unsigned(O::LOCAL_U8_STORE, O::LOCAL_U16_STORE),
                };
                self.narrowest(i64::from(offset), &forms, sink)
            }
            Self::STATIC | Self::STATIC_LOAD | Self::STATIC_STORE => {
                self.arity(operands, 1)?;
                let offset = sink.static_offset(self.identifier(operands, 0)?)?;
                let forms = match self {
                    Self::STATIC => Forms::unsigned(O::STATIC_U8, O::STATIC_U16),
                    Self::STATIC_LOAD => Forms::unsigned(O::STATIC_U8_LOAD, O::STATIC_U16_LOAD),
                    _ => Forms::unsigned(O::STATIC_U8_STORE, O::STATIC_U16_STORE),
                };
                self.narrowest(i64::from(offset), &forms, sink)
            }
            Self::GLOBAL | Self::GLOBAL_LOAD | Self::GLOBAL_STORE => {
                self.arity(operands, 1)?;
                let forms = match self {
                    Self::GLOBAL => Forms::global(O::GLOBAL_U16, O::GLOBAL_U24),
                    Self::GLOBAL_LOAD => Forms::global(O::GLOBAL_U16_LOAD, O::GLOBAL_U24_LOAD),
                    _ => Forms::global(O::GLOBAL_U16_STORE, O::GLOBAL_U24_STORE),
                };
                self.narrowest(self.integer(operands, 0)?, &forms, sink)
            }
            Self::ARRAY | Self::ARRAY_LOAD | Self::ARRAY_STORE => {
                self.arity(operands, 1)?;
                let forms = match self {
                    Self::ARRAY => Forms::unsigned(O::ARRAY_U8, O::ARRAY_U16),
                    Self::ARRAY_LOAD => Forms::unsigned(O::ARRAY_U8_LOAD, O::ARRAY_U16_LOAD),
                    _ => Forms::unsigned(O::ARRAY_U8_STORE, O::ARRAY_U16_STORE),
                };
                self.narrowest(self.integer(operands, 0)?, &forms, sink)
            }
            Self::IOFFSET | Self::IOFFSET_LOAD | Self::IOFFSET_STORE => {
                self.arity(operands, 1)?;
                let forms = match self {
                    Self::IOFFSET => Forms::signed(O::IOFFSET_U8, O::IOFFSET_S16),
                    Self::IOFFSET_LOAD => Forms::signed(O::IOFFSET_U8_LOAD, O::IOFFSET_S16_LOAD),
                    _ => Forms::signed(O::IOFFSET_U8_STORE, O::IOFFSET_S16_STORE),
                };
                self.narrowest(self.integer(operands, 0)?, &forms, sink)
            }
            Self::IADD_K | Self::IMUL_K => {
                self.arity(operands, 1)?;
                let (forms, generic) = if self == Self::IADD_K {
                    (Forms::signed(O::IADD_U8, O::IADD_S16), O::IADD)
                } else {
                    (Forms::signed(O::IMUL_U8, O::IMUL_S16), O::IMUL)
                };
                let value = self.integer(operands, 0)?;
                if i16::try_from(value).is_ok() {
                    self.narrowest(value, &forms, sink)
                } else {
                    push_int(self, value, sink)?;
                    sink.emit(generic, &[])
                }
            }
        }
    }

    fn arity(self, operands: &[Operand], n: usize) -> CodeGenResult<()> {
        if operands.len() == n {
            Ok(())
        } else {
            Err(CodeGenError::expansion(self, format!("expected {n} operand(s), got {}", operands.len())))
        }
    }

    fn identifier(self, operands: &[Operand], index: usize) -> CodeGenResult<&str> {
        operands[index]
            .as_identifier()
            .ok_or_else(|| CodeGenError::expansion(self, format!("operand #{index} must be an identifier")))
    }

    fn integer(self, operands: &[Operand], index: usize) -> CodeGenResult<i64> {
        operands[index]
            .as_i64()
            .ok_or_else(|| CodeGenError::expansion(self, format!("operand #{index} must be an integer")))
    }

    fn narrowest<S>(self, value: i64, forms: &Forms, sink: &mut S) -> CodeGenResult<()>
    where
        S: HighLevelSink + ?Sized,
    {
        let (opcode, operand) = if let (Some(op), Ok(v)) = (forms.u8, u8::try_from(value)) {
            (op, Operand::U8(v))
        } else if let (Some(op), Ok(v)) = (forms.u16, u16::try_from(value)) {
            (op, Operand::U16(v))
        } else if let (Some(op), Ok(v)) = (forms.s16, i16::try_from(value)) {
            (op, Operand::S16(v))
        } else if let Some(op) = forms.u24.filter(|_| (0..=0xFF_FFFF).contains(&value)) {
            (op, Operand::U24(value as u32))
        } else {
            return Err(CodeGenError::expansion(self, format!("{value} fits no operand form")));
        };
        sink.emit(opcode, &[operand])
    }
}

fn push_int<S>(op: HighLevelOp, value: i64, sink: &mut S) -> CodeGenResult<()>
where
    S: HighLevelSink + ?Sized,
{
    match value {
        -1 => sink.emit(Opcode::PUSH_CONST_M1, &[]),
        0..=7 => sink.emit(small_form(Opcode::PUSH_CONST_0, value), &[]),
        8..=0xFF => sink.emit(Opcode::PUSH_CONST_U8, &[Operand::U8(value as u8)]),
        -0x8000..=0x7FFF => sink.emit(Opcode::PUSH_CONST_S16, &[Operand::S16(value as i16)]),
        0..=0xFF_FFFF => sink.emit(Opcode::PUSH_CONST_U24, &[Operand::U24(value as u32)]),
        _ => match i32::try_from(value).map(|v| v as u32).or_else(|_| u32::try_from(value)) {
            Ok(bits) => sink.emit(Opcode::PUSH_CONST_U32, &[Operand::U32(bits)]),
            Err(_) => Err(CodeGenError::expansion(op, format!("{value} does not fit in 32 bits"))),
        },
    }
}

fn push_const<S>(op: HighLevelOp, operand: &Operand, sink: &mut S) -> CodeGenResult<()>
where
    S: HighLevelSink + ?Sized,
{
    if let Some(v) = operand.as_i64() {
        return push_int(op, v, sink);
    }
    let Some(f) = operand.as_f32() else {
        return Err(CodeGenError::expansion(op, format!("cannot push a {}", operand.kind_name())));
    };
    if f == -1.0 {
        return sink.emit(Opcode::PUSH_CONST_FM1, &[]);
    }
    // -0.0 keeps its sign bit through the generic form
    if f.is_sign_positive() && (0.0..=7.0).contains(&f) && f.fract() == 0.0 {
        return sink.emit(small_form(Opcode::PUSH_CONST_F0, f as i64), &[]);
    }
    sink.emit(Opcode::PUSH_CONST_F, &[Operand::F32(f)])
}

/// `base + n` for the `PUSH_CONST_0..7` and `PUSH_CONST_F0..7` runs.
fn small_form(base: Opcode, n: i64) -> Opcode {
    Opcode::from_byte(base.byte() + n as u8).unwrap_or(base)
}
