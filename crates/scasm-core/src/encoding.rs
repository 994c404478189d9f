//! Instruction encoding table.
//!
//! [`Opcode::assemble`] turns an operand list into a sequence of writes on an
//! [`InstructionSink`]; [`Opcode::decode`] reads the same layout back through an
//! [`InstructionDecoder`]. Both sides walk [`Opcode::shape`], so they cannot
//! disagree on widths or order.

use std::borrow::Cow;

use crate::opcode::{Opcode, OperandKind, OperandShape};
use crate::operand::Operand;
use crate::page::PageRead;
use crate::CoreError;

/// Raw instruction sink: the byte-level side of the assembler.
///
/// Multi-byte writes are little-endian. Label and function targets reserve
/// their field and leave the patching to the implementor.
pub trait InstructionSink {
    /// Error type of the sink.
    type Error: From<CoreError>;

    /// Writes the opcode byte.
    fn opcode(&mut self, opcode: Opcode) -> Result<(), Self::Error> { self.u8(opcode.byte()) }
    /// Writes one byte.
    fn u8(&mut self, v: u8) -> Result<(), Self::Error>;
    /// Writes two bytes.
    fn u16(&mut self, v: u16) -> Result<(), Self::Error>;
    /// Writes the low three bytes of `v`.
    fn u24(&mut self, v: u32) -> Result<(), Self::Error>;
    /// Writes four bytes.
    fn u32(&mut self, v: u32) -> Result<(), Self::Error>;
    /// Writes a signed 16-bit value.
    fn s16(&mut self, v: i16) -> Result<(), Self::Error> { self.u16(v as u16) }
    /// Writes a float as its bit pattern.
    fn f32(&mut self, v: f32) -> Result<(), Self::Error> { self.u32(v.to_bits()) }
    /// Reserves a 2-byte relative branch to `label` in the current function.
    fn label_target(&mut self, label: &str) -> Result<(), Self::Error>;
    /// Reserves a 3-byte absolute reference to `function`.
    fn function_target(&mut self, function: &str) -> Result<(), Self::Error>;
}

/// Operand decoder: the reading side of the encoding table.
///
/// Offsets are relative to the IP of the instruction being decoded.
pub trait InstructionDecoder {
    /// Error type of the decoder.
    type Error: From<CoreError>;

    /// IP of the instruction being decoded.
    fn ip(&self) -> u32;
    /// Reads a fixed-width value at `ip() + offset`.
    fn get<T: PageRead>(&self, offset: u32) -> Result<T, Self::Error>;

    /// Reads a 24-bit value at `ip() + offset`.
    fn get_u24(&self, offset: u32) -> Result<u32, Self::Error> {
        let lo = self.get::<u16>(offset)?;
        let hi = self.get::<u8>(offset + 2)?;
        Ok(u32::from(lo) | (u32::from(hi) << 16))
    }

    /// Records a `u8` operand.
    fn u8(&mut self, v: u8);
    /// Records a `u16` operand.
    fn u16(&mut self, v: u16);
    /// Records a `u24` operand.
    fn u24(&mut self, v: u32);
    /// Records a `u32` operand.
    fn u32(&mut self, v: u32);
    /// Records an `s16` operand.
    fn s16(&mut self, v: i16);
    /// Records an `f32` operand.
    fn f32(&mut self, v: f32);
    /// Records a literal identifier carried in the bytecode.
    fn identifier(&mut self, name: String);
    /// Resolves `ip` to a label of the current function.
    fn label_target(&mut self, ip: u32) -> Result<(), Self::Error>;
    /// Resolves `ip` to a function start.
    fn function_target(&mut self, ip: u32) -> Result<(), Self::Error>;
    /// Resolves `ip` to a label and records the `(value, label)` pair.
    fn switch_case(&mut self, value: u32, ip: u32) -> Result<(), Self::Error>;
}

/// Signed offset stored in a branch field at `field_ip` to reach `target`.
///
/// The VM adds it to the IP following the 2-byte field. `None` when the
/// distance does not fit in 16 bits.
pub fn relative_branch(field_ip: u32, target: u32) -> Option<i16> {
    let rel = i64::from(target) - (i64::from(field_ip) + 2);
    i16::try_from(rel).ok()
}

/// Absolute target of the branch field at `ip + field_offset` holding `rel`.
pub fn relative_target(ip: u32, field_offset: u32, rel: i16) -> Result<u32, CoreError> {
    let target = i64::from(ip) + i64::from(field_offset) + 2 + i64::from(rel);
    u32::try_from(target).map_err(|_| CoreError::MalformedTarget { ip, target })
}

/* ─────────────────────────── Assemblage ─────────────────────────── */

impl Opcode {
    /// Writes this opcode and its operands to `sink`.
    pub fn assemble<S>(self, operands: &[Operand], sink: &mut S) -> Result<(), S::Error>
    where
        S: InstructionSink + ?Sized,
    {
        sink.opcode(self)?;
        match self.shape() {
            OperandShape::Fixed(fields) => {
                if operands.len() != fields.len() {
                    return Err(arity(self, fields.len().to_string(), operands.len()).into());
                }
                for (index, (kind, operand)) in fields.iter().zip(operands).enumerate() {
                    write_field(self, index, *kind, operand, sink)?;
                }
            }
            OperandShape::Enter => {
                if !(2..=3).contains(&operands.len()) {
                    return Err(arity(self, "2 or 3", operands.len()).into());
                }
                write_field(self, 0, OperandKind::U8, &operands[0], sink)?;
                write_field(self, 1, OperandKind::U16, &operands[1], sink)?;
                let name = match operands.get(2) {
                    Some(op) => expect_identifier(self, 2, op)?,
                    None => "",
                };
                let len = u8::try_from(name.len()).map_err(|_| CoreError::OutOfRange {
                    opcode: self,
                    index: 2,
                    value: name.len() as i64,
                    field: "u8 name length",
                })?;
                sink.u8(len)?;
                for b in name.bytes() {
                    sink.u8(b)?;
                }
            }
            OperandShape::Native => {
                if operands.len() != 3 {
                    return Err(arity(self, "3", operands.len()).into());
                }
                let argc = int_in(self, 0, &operands[0], 0, 63, "6-bit argument count")?;
                let returns = int_in(self, 1, &operands[1], 0, 3, "2-bit return count")?;
                let slot = int_in(self, 2, &operands[2], 0, i64::from(u16::MAX), "u16")?;
                sink.u8(((argc << 2) | returns) as u8)?;
                sink.u8((slot >> 8) as u8)?;
                sink.u8((slot & 0xFF) as u8)?;
            }
            OperandShape::Switch => {
                let count = u8::try_from(operands.len()).map_err(|_| arity(self, "at most 255", operands.len()))?;
                sink.u8(count)?;
                for (index, operand) in operands.iter().enumerate() {
                    let (value, label) = operand.as_switch_case().ok_or(CoreError::OperandMismatch {
                        opcode: self,
                        index,
                        expected: "switch case",
                        got: operand.kind_name(),
                    })?;
                    sink.u32(value)?;
                    sink.label_target(label)?;
                }
            }
        }
        Ok(())
    }

    /// Reads the operands of the instruction at `decoder.ip()`.
    ///
    /// Returns the size of the instruction, opcode byte included.
    pub fn decode<D>(self, decoder: &mut D) -> Result<u32, D::Error>
    where
        D: InstructionDecoder + ?Sized,
    {
        let mut at = 1u32;
        match self.shape() {
            OperandShape::Fixed(fields) => {
                for kind in fields {
                    read_field(*kind, at, decoder)?;
                    at += kind.size();
                }
            }
            OperandShape::Enter => {
                let args = decoder.get::<u8>(1)?;
                let frame = decoder.get::<u16>(2)?;
                let len = u32::from(decoder.get::<u8>(4)?);
                decoder.u8(args);
                decoder.u16(frame);
                at = 5;
                if len > 0 {
                    let mut name = Vec::with_capacity(len as usize);
                    for i in 0..len {
                        name.push(decoder.get::<u8>(at + i)?);
                    }
                    decoder.identifier(String::from_utf8_lossy(&name).into_owned());
                }
                at += len;
            }
            OperandShape::Native => {
                let packed = decoder.get::<u8>(1)?;
                let hi = decoder.get::<u8>(2)?;
                let lo = decoder.get::<u8>(3)?;
                decoder.u8(packed >> 2);
                decoder.u8(packed & 0x3);
                decoder.u16((u16::from(hi) << 8) | u16::from(lo));
                at = 4;
            }
            OperandShape::Switch => {
                let count = decoder.get::<u8>(1)?;
                at = 2;
                for _ in 0..count {
                    let value = decoder.get::<u32>(at)?;
                    let rel = decoder.get::<i16>(at + 4)?;
                    let target = relative_target(decoder.ip(), at + 4, rel)?;
                    decoder.switch_case(value, target)?;
                    at += 6;
                }
            }
        }
        Ok(at)
    }
}

fn arity(opcode: Opcode, expected: impl Into<Cow<'static, str>>, got: usize) -> CoreError {
    CoreError::Arity { opcode, expected: expected.into(), got }
}

fn expect_identifier(opcode: Opcode, index: usize, operand: &Operand) -> Result<&str, CoreError> {
    operand.as_identifier().ok_or(CoreError::OperandMismatch {
        opcode,
        index,
        expected: "identifier",
        got: operand.kind_name(),
    })
}

fn int_in(opcode: Opcode, index: usize, operand: &Operand, min: i64, max: i64, field: &'static str) -> Result<i64, CoreError> {
    let value = operand.as_i64().ok_or(CoreError::OperandMismatch {
        opcode,
        index,
        expected: "integer",
        got: operand.kind_name(),
    })?;
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(CoreError::OutOfRange { opcode, index, value, field })
    }
}

fn write_field<S>(opcode: Opcode, index: usize, kind: OperandKind, operand: &Operand, sink: &mut S) -> Result<(), S::Error>
where
    S: InstructionSink + ?Sized,
{
    let name = kind.name();
    match kind {
        OperandKind::U8 => sink.u8(int_in(opcode, index, operand, 0, 0xFF, name)? as u8),
        OperandKind::U16 => sink.u16(int_in(opcode, index, operand, 0, 0xFFFF, name)? as u16),
        OperandKind::U24 => sink.u24(int_in(opcode, index, operand, 0, 0xFF_FFFF, name)? as u32),
        // negative values keep their two's complement bit pattern
        OperandKind::U32 => sink.u32(int_in(opcode, index, operand, i64::from(i32::MIN), i64::from(u32::MAX), name)? as u32),
        OperandKind::S16 => sink.s16(int_in(opcode, index, operand, i64::from(i16::MIN), i64::from(i16::MAX), name)? as i16),
        OperandKind::F32 => {
            let v = operand.as_f32().ok_or(CoreError::OperandMismatch {
                opcode,
                index,
                expected: "f32",
                got: operand.kind_name(),
            })?;
            sink.f32(v)
        }
        OperandKind::Label => sink.label_target(expect_identifier(opcode, index, operand)?),
        OperandKind::Function => sink.function_target(expect_identifier(opcode, index, operand)?),
    }
}

fn read_field<D>(kind: OperandKind, at: u32, decoder: &mut D) -> Result<(), D::Error>
where
    D: InstructionDecoder + ?Sized,
{
    match kind {
        OperandKind::U8 => {
            let v = decoder.get::<u8>(at)?;
            decoder.u8(v);
        }
        OperandKind::U16 => {
            let v = decoder.get::<u16>(at)?;
            decoder.u16(v);
        }
        OperandKind::U24 => {
            let v = decoder.get_u24(at)?;
            decoder.u24(v);
        }
        OperandKind::U32 => {
            let v = decoder.get::<u32>(at)?;
            decoder.u32(v);
        }
        OperandKind::S16 => {
            let v = decoder.get::<i16>(at)?;
            decoder.s16(v);
        }
        OperandKind::F32 => {
            let v = decoder.get::<f32>(at)?;
            decoder.f32(v);
        }
        OperandKind::Label => {
            let rel = decoder.get::<i16>(at)?;
            let target = relative_target(decoder.ip(), at, rel)?;
            decoder.label_target(target)?;
        }
        OperandKind::Function => {
            let target = decoder.get_u24(at)?;
            decoder.function_target(target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// Records writes as bytes, targets as markers.
    #[derive(Default)]
    struct Bytes {
        out: Vec<u8>,
        labels: Vec<String>,
        functions: Vec<String>,
    }

    impl InstructionSink for Bytes {
        type Error = CoreError;
        fn u8(&mut self, v: u8) -> Result<(), CoreError> {
            self.out.push(v);
            Ok(())
        }
        fn u16(&mut self, v: u16) -> Result<(), CoreError> {
            self.out.extend_from_slice(&v.to_le_bytes());
            Ok(())
        }
        fn u24(&mut self, v: u32) -> Result<(), CoreError> {
            self.out.extend_from_slice(&v.to_le_bytes()[..3]);
            Ok(())
        }
        fn u32(&mut self, v: u32) -> Result<(), CoreError> {
            self.out.extend_from_slice(&v.to_le_bytes());
            Ok(())
        }
        fn label_target(&mut self, label: &str) -> Result<(), CoreError> {
            self.labels.push(label.to_owned());
            self.out.extend_from_slice(&[0, 0]);
            Ok(())
        }
        fn function_target(&mut self, function: &str) -> Result<(), CoreError> {
            self.functions.push(function.to_owned());
            self.out.extend_from_slice(&[0, 0, 0]);
            Ok(())
        }
    }

    fn encode(op: Opcode, operands: &[Operand]) -> Result<Vec<u8>, CoreError> {
        let mut sink = Bytes::default();
        op.assemble(operands, &mut sink)?;
        Ok(sink.out)
    }

    #[test]
    fn fixed_shapes() -> Result<(), CoreError> {
        assert_eq!(encode(Opcode::NOP, &[])?, vec![0]);
        assert_eq!(encode(Opcode::LOCAL_U16_STORE, &[Operand::U32(0x1234)])?, vec![78, 0x34, 0x12]);
        assert_eq!(encode(Opcode::PUSH_CONST_S16, &[Operand::S16(-2)])?, vec![67, 0xFE, 0xFF]);
        assert_eq!(encode(Opcode::PUSH_CONST_U24, &[Operand::U24(0x0A_0B0C)])?, vec![97, 0x0C, 0x0B, 0x0A]);
        assert_eq!(encode(Opcode::PUSH_CONST_F, &[Operand::F32(1.0)])?, vec![41, 0x00, 0x00, 0x80, 0x3F]);
        Ok(())
    }

    #[test]
    fn enter_with_and_without_name() -> Result<(), CoreError> {
        assert_eq!(encode(Opcode::ENTER, &[Operand::U8(1), Operand::U16(5)])?, vec![45, 1, 5, 0, 0]);
        assert_eq!(
            encode(Opcode::ENTER, &[Operand::U8(0), Operand::U16(2), Operand::ident("ab")])?,
            vec![45, 0, 2, 0, 2, b'a', b'b']
        );
        Ok(())
    }

    #[test]
    fn native_is_packed_and_big_endian() -> Result<(), CoreError> {
        let bytes = encode(Opcode::NATIVE, &[Operand::U8(3), Operand::U8(1), Operand::U16(0x0102)])?;
        assert_eq!(bytes, vec![44, (3 << 2) | 1, 0x01, 0x02]);
        Ok(())
    }

    #[test]
    fn switch_records_labels_in_order() -> Result<(), CoreError> {
        let mut sink = Bytes::default();
        Opcode::SWITCH.assemble(&[Operand::case(7, "a"), Operand::case(9, "b")], &mut sink)?;
        assert_eq!(sink.out.len(), 2 + 2 * 6);
        assert_eq!(sink.out[1], 2);
        assert_eq!(&sink.out[2..6], &7u32.to_le_bytes());
        assert_eq!(sink.labels, vec!["a".to_owned(), "b".to_owned()]);
        Ok(())
    }

    #[test]
    fn rejects_bad_operands() {
        assert!(matches!(encode(Opcode::J, &[]), Err(CoreError::Arity { .. })));
        assert!(matches!(
            encode(Opcode::LOCAL_U8, &[Operand::U32(256)]),
            Err(CoreError::OutOfRange { value: 256, .. })
        ));
        assert!(matches!(
            encode(Opcode::CALL, &[Operand::U8(1)]),
            Err(CoreError::OperandMismatch { expected: "identifier", .. })
        ));
        assert!(matches!(
            encode(Opcode::NATIVE, &[Operand::U8(64), Operand::U8(0), Operand::U16(0)]),
            Err(CoreError::OutOfRange { index: 0, .. })
        ));
    }

    #[test]
    fn branch_arithmetic_examples() {
        assert_eq!(relative_branch(10, 20), Some(8));
        assert_eq!(relative_branch(10, 0), Some(-12));
        assert_eq!(relative_branch(0, 0x1_0000), None);
        assert_eq!(relative_target(100, 1, -103), Ok(0));
        assert!(relative_target(0, 1, -4).is_err());
    }

    proptest! {
        #[test]
        fn branch_offset_matches_field_convention(field in 0u32..0x10_0000, delta in -32_000i64..32_000) {
            let target = i64::from(field) + 2 + delta;
            prop_assume!(target >= 0);
            let target = target as u32;
            let rel = relative_branch(field, target).unwrap();
            prop_assert_eq!(i64::from(rel), i64::from(target) - (i64::from(field) + 2));
            // the decoder sees the same field one byte after the opcode
            prop_assert_eq!(relative_target(field - field.min(1), field.min(1), rel).unwrap(), target);
        }
    }
}
