//! Per-instruction operand decoding.
//!
//! [`OperandsDecoder`] is the reading mirror of the assembler's raw sink: the
//! encoding table drives it field by field, and it turns branch and call
//! targets back into names using the function table.

use scasm_core::{CoreError, FunctionInfo, InstructionDecoder, Opcode, Operand, PageRead, PagedCode};
use tracing::trace;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{DisasmError, DisasmResult};

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecodedInstruction {
    /// Address of the opcode byte.
    pub ip: u32,
    /// Opcode.
    pub opcode: Opcode,
    /// Encoded size, opcode byte included.
    pub size: u32,
    /// Operands in encoding order, targets resolved to names.
    pub operands: Vec<Operand>,
}

/// Reads a value at `ip + offset` from `code`.
fn read_at<T: PageRead>(code: &PagedCode, ip: u32, offset: u32) -> Result<T, CoreError> {
    let at = ip
        .checked_add(offset)
        .ok_or(CoreError::OutOfBounds { ip, size: T::SIZE, length: code.length() })?;
    code.read::<T>(at)
}

/// Decoder bound to one code image and its function table.
#[derive(Debug)]
pub struct OperandsDecoder<'a> {
    code: &'a PagedCode,
    functions: &'a [FunctionInfo],
    function: Option<usize>,
    ip: u32,
    operands: Vec<Operand>,
}

impl<'a> OperandsDecoder<'a> {
    /// New decoder. Label targets resolve against `functions[i].labels`.
    pub fn new(code: &'a PagedCode, functions: &'a [FunctionInfo]) -> Self {
        Self { code, functions, function: None, ip: 0, operands: Vec::new() }
    }

    /// Starts decoding the instruction at `ip`, inside function `function`.
    pub fn begin_instruction(&mut self, function: usize, ip: u32) -> DisasmResult<()> {
        if self.function.is_some() {
            return Err(DisasmError::InstructionAlreadyOpen);
        }
        if function >= self.functions.len() {
            return Err(DisasmError::NoSuchFunction(function));
        }
        self.function = Some(function);
        self.ip = ip;
        self.operands.clear();
        Ok(())
    }

    /// Ends the instruction and hands back its operands.
    pub fn end_instruction(&mut self) -> DisasmResult<Vec<Operand>> {
        self.function.take().ok_or(DisasmError::NoOpenInstruction)?;
        Ok(std::mem::take(&mut self.operands))
    }

    /// Decodes the whole instruction at `ip`.
    pub fn decode(&mut self, function: usize, ip: u32) -> DisasmResult<DecodedInstruction> {
        self.begin_instruction(function, ip)?;
        match self.decode_open() {
            Ok((opcode, size)) => {
                let operands = self.end_instruction()?;
                Ok(DecodedInstruction { ip, opcode, size, operands })
            }
            Err(e) => {
                self.function = None;
                self.operands.clear();
                Err(e)
            }
        }
    }

    fn decode_open(&mut self) -> DisasmResult<(Opcode, u32)> {
        let byte = self.get::<u8>(0)?;
        let opcode = Opcode::from_byte(byte).ok_or(CoreError::InvalidOpcode { byte, ip: self.ip })?;
        let size = opcode.decode(self)?;
        Ok((opcode, size))
    }

    fn current(&self) -> DisasmResult<&'a FunctionInfo> {
        let index = self.function.ok_or(DisasmError::NoOpenInstruction)?;
        self.functions.get(index).ok_or(DisasmError::NoSuchFunction(index))
    }

    fn label_name(&self, ip: u32) -> DisasmResult<&'a str> {
        let function = self.current()?;
        function
            .label_at(ip)
            .ok_or_else(|| DisasmError::UnknownLabelTarget { function: function.name.clone(), ip })
    }
}

impl InstructionDecoder for OperandsDecoder<'_> {
    type Error = DisasmError;

    fn ip(&self) -> u32 { self.ip }

    fn get<T: PageRead>(&self, offset: u32) -> DisasmResult<T> { Ok(read_at(self.code, self.ip, offset)?) }

    fn u8(&mut self, v: u8) { self.operands.push(Operand::U8(v)); }
    fn u16(&mut self, v: u16) { self.operands.push(Operand::U16(v)); }
    fn u24(&mut self, v: u32) { self.operands.push(Operand::U24(v)); }
    fn u32(&mut self, v: u32) { self.operands.push(Operand::U32(v)); }
    fn s16(&mut self, v: i16) { self.operands.push(Operand::S16(v)); }
    fn f32(&mut self, v: f32) { self.operands.push(Operand::F32(v)); }
    fn identifier(&mut self, name: String) { self.operands.push(Operand::Identifier(name)); }

    fn label_target(&mut self, ip: u32) -> DisasmResult<()> {
        let name = self.label_name(ip)?;
        self.operands.push(Operand::ident(name));
        Ok(())
    }

    fn function_target(&mut self, ip: u32) -> DisasmResult<()> {
        let function = self
            .functions
            .iter()
            .find(|f| f.start == ip)
            .ok_or(DisasmError::UnknownFunctionTarget { ip })?;
        self.operands.push(Operand::ident(function.name.as_str()));
        Ok(())
    }

    fn switch_case(&mut self, value: u32, ip: u32) -> DisasmResult<()> {
        let name = self.label_name(ip)?;
        self.operands.push(Operand::case(value, name));
        Ok(())
    }
}

/* ─────────────────────────── Pré-passe ─────────────────────────── */

/// Instruction size and raw targets, decoded without any symbol table.
#[derive(Debug, Default)]
pub(crate) struct RawInstruction {
    pub opcode: Option<Opcode>,
    pub size: u32,
    pub label_targets: Vec<u32>,
    pub call_targets: Vec<u32>,
}

struct TargetScanner<'a> {
    code: &'a PagedCode,
    ip: u32,
    out: RawInstruction,
}

impl InstructionDecoder for TargetScanner<'_> {
    type Error = DisasmError;

    fn ip(&self) -> u32 { self.ip }

    fn get<T: PageRead>(&self, offset: u32) -> DisasmResult<T> { Ok(read_at(self.code, self.ip, offset)?) }

    fn u8(&mut self, _: u8) {}
    fn u16(&mut self, _: u16) {}
    fn u24(&mut self, _: u32) {}
    fn u32(&mut self, _: u32) {}
    fn s16(&mut self, _: i16) {}
    fn f32(&mut self, _: f32) {}
    fn identifier(&mut self, _: String) {}

    fn label_target(&mut self, ip: u32) -> DisasmResult<()> {
        self.out.label_targets.push(ip);
        Ok(())
    }

    fn function_target(&mut self, ip: u32) -> DisasmResult<()> {
        self.out.call_targets.push(ip);
        Ok(())
    }

    fn switch_case(&mut self, _value: u32, ip: u32) -> DisasmResult<()> {
        self.out.label_targets.push(ip);
        Ok(())
    }
}

/// Decodes the instruction at `ip` without resolving anything.
pub(crate) fn scan_instruction(code: &PagedCode, ip: u32) -> DisasmResult<RawInstruction> {
    let byte = read_at::<u8>(code, ip, 0)?;
    let opcode = Opcode::from_byte(byte).ok_or(CoreError::InvalidOpcode { byte, ip })?;
    let mut scanner = TargetScanner { code, ip, out: RawInstruction::default() };
    scanner.out.size = opcode.decode(&mut scanner)?;
    scanner.out.opcode = Some(opcode);
    trace!(ip, %opcode, size = scanner.out.size, "scanned");
    Ok(scanner.out)
}
