//! Paged bytecode assembler.
//!
//! Instructions are buffered one at a time and committed whole. An
//! instruction never straddles a page: when it does not fit, the rest of the
//! page is skipped (with a `J` to the next page when room allows) and the
//! fixups recorded inside the instruction move with it.
//!
//! References are resolved at [`CodeBuilder::to_pages`]:
//! - function targets: 3-byte absolute IP, low byte first;
//! - label targets: 2-byte signed offset from the end of the field.

use indexmap::IndexMap;
use tracing::{debug, trace};

use scasm_core::{
    page_index, page_offset, page_start, relative_branch, CoreError, FunctionInfo, InstructionSink, LabelInfo,
    Opcode, Operand, PagedCode, MAX_INSTRUCTION_LEN, PAGE_SIZE,
};

use crate::context::AssemblerContext;
use crate::error::{CodeGenError, CodeGenResult};
use crate::function::{FunctionDef, FRAME_HEADER_SIZE};
use crate::highlevel::{HighLevelOp, HighLevelSink};
use crate::types::{ScalarValue, TypeDef};
use crate::CodeGenOptions;

/// Size of the `J` written at a page end.
const JUMP_SIZE: usize = 3;

/// Largest IP a 24-bit function reference can hold.
const MAX_FUNCTION_IP: u32 = 0xFF_FFFF;

/// Address bookkeeping for one declared function.
#[derive(Debug, Clone)]
struct FunctionRecord {
    start: u32,
    end: Option<u32>,
    labels: IndexMap<String, u32>,
}

/// The function currently being assembled.
#[derive(Debug)]
struct OpenFunction {
    /// Index into `CodeBuilder::functions`.
    id: usize,
    def: FunctionDef,
}

#[derive(Debug, Clone)]
struct FunctionFixup {
    target: String,
    ip: u32,
}

#[derive(Debug, Clone)]
struct LabelFixup {
    function: usize,
    label: String,
    ip: u32,
}

/// Assembler for one compilation unit.
#[derive(Debug)]
pub struct CodeBuilder {
    context: AssemblerContext,

    pages: Vec<Vec<u8>>,
    length: u32,

    // current instruction
    buffer: Vec<u8>,
    in_instruction: bool,
    function_fixups_in_instruction: Vec<usize>,
    label_fixups_in_instruction: Vec<usize>,

    current: Option<OpenFunction>,
    functions: IndexMap<String, FunctionRecord>,

    function_fixups: Vec<FunctionFixup>,
    label_fixups: Vec<LabelFixup>,
}

impl CodeBuilder {
    /// New assembler consulting `context`.
    pub fn new(context: AssemblerContext) -> Self {
        Self {
            context,
            pages: Vec::new(),
            length: 0,
            buffer: Vec::with_capacity(64),
            in_instruction: false,
            function_fixups_in_instruction: Vec::new(),
            label_fixups_in_instruction: Vec::new(),
            current: None,
            functions: IndexMap::new(),
            function_fixups: Vec::new(),
            label_fixups: Vec::new(),
        }
    }

    /// Assembly context.
    pub const fn context(&self) -> &AssemblerContext { &self.context }

    /// Mutable assembly context (declare statics, register natives...).
    pub fn context_mut(&mut self) -> &mut AssemblerContext { &mut self.context }

    /// Code generation options.
    pub const fn options(&self) -> &CodeGenOptions { &self.context.options }

    /// Logical length of the code emitted so far; the IP of the next instruction.
    pub const fn current_ip(&self) -> u32 { self.length }

    /// Whether a function is open.
    pub const fn is_in_function(&self) -> bool { self.current.is_some() }

    /// Drops all code and symbols, keeping the context.
    pub fn reset(&mut self) {
        self.pages.clear();
        self.length = 0;
        self.buffer.clear();
        self.in_instruction = false;
        self.function_fixups_in_instruction.clear();
        self.label_fixups_in_instruction.clear();
        self.current = None;
        self.functions.clear();
        self.function_fixups.clear();
        self.label_fixups.clear();
    }

    /* ─────────────────────────── Fonctions ─────────────────────────── */

    /// Opens `def` at the current IP and emits its prologue unless naked.
    pub fn begin_function(&mut self, def: FunctionDef) -> CodeGenResult<()> {
        if let Some(open) = &self.current {
            return Err(CodeGenError::FunctionAlreadyOpen(open.def.name.clone()));
        }
        if def.name.trim().is_empty() {
            return Err(CodeGenError::EmptyFunctionName);
        }
        if self.functions.contains_key(&def.name) {
            return Err(CodeGenError::DuplicateFunction(def.name));
        }

        let record = FunctionRecord { start: self.length, end: None, labels: IndexMap::new() };
        let (id, _) = self.functions.insert_full(def.name.clone(), record);
        debug!(function = %def.name, ip = self.length, naked = def.naked, "begin function");

        let prologue = (!def.naked).then(|| def.clone());
        self.current = Some(OpenFunction { id, def });
        if let Some(def) = prologue {
            self.emit_prologue(&def)?;
        }
        Ok(())
    }

    /// Emits the epilogue unless naked and closes the function.
    pub fn end_function(&mut self) -> CodeGenResult<()> {
        let open = self.current.as_ref().ok_or(CodeGenError::NoOpenFunction)?;
        if self.in_instruction {
            return Err(CodeGenError::InstructionAlreadyOpen);
        }
        if !open.def.naked {
            let operands = [Operand::U32(open.def.args_size()), Operand::U32(open.def.return_size())];
            self.emit(Opcode::LEAVE, &operands)?;
        }

        if let Some(open) = self.current.take() {
            if let Some((name, record)) = self.functions.get_index_mut(open.id) {
                record.end = Some(self.length);
                debug!(function = %name, start = record.start, end = self.length, "end function");
            }
        }
        Ok(())
    }

    /// Frame offset of an argument or local of the open function.
    ///
    /// Arguments come first, then the frame header, then locals.
    pub fn local_offset(&self, name: &str) -> CodeGenResult<u32> {
        let def = &self.current.as_ref().ok_or(CodeGenError::NoOpenFunction)?.def;
        if def.naked {
            return Err(CodeGenError::NakedLocals(def.name.clone()));
        }

        let mut offset = 0;
        for arg in &def.args {
            if arg.name == name {
                return Ok(offset);
            }
            offset += arg.ty.size();
        }

        offset += FRAME_HEADER_SIZE;
        for local in &def.locals {
            if local.name == name {
                return Ok(offset);
            }
            offset += local.ty.size();
        }

        Err(CodeGenError::UnknownLocal { function: def.name.clone(), name: name.to_owned() })
    }

    fn emit_prologue(&mut self, def: &FunctionDef) -> CodeGenResult<()> {
        let args_size = def.args_size();
        let mut operands = vec![Operand::U32(args_size), Operand::U32(def.frame_size())];
        if self.context.options.embed_function_names {
            operands.push(Operand::ident(def.name.as_str()));
        }
        self.emit(Opcode::ENTER, &operands)?;

        let mut offset = args_size + FRAME_HEADER_SIZE;
        for local in &def.locals {
            self.emit_initializer(offset, &local.ty, local.initial)?;
            offset += local.ty.size();
        }
        Ok(())
    }

    fn emit_initializer(&mut self, offset: u32, ty: &TypeDef, initial: Option<ScalarValue>) -> CodeGenResult<()> {
        match ty {
            TypeDef::Scalar => {
                if let Some(value) = initial {
                    self.emit_high_level(HighLevelOp::PUSH_CONST, &[value.to_operand()])?;
                    self.emit_local_store(offset)?;
                }
            }
            TypeDef::Array(array) => {
                // length prefix, then each item
                self.emit_high_level(HighLevelOp::PUSH_CONST, &[Operand::U32(array.length())])?;
                self.emit_local_store(offset)?;
                let item_size = array.item().size();
                for i in 0..array.length() {
                    self.emit_initializer(offset + 1 + i * item_size, array.item(), None)?;
                }
            }
            TypeDef::Struct(s) => {
                for (field, field_offset) in s.fields().iter().zip(s.offsets()) {
                    self.emit_initializer(offset + field_offset, &field.ty, field.initial)?;
                }
            }
        }
        Ok(())
    }

    fn emit_local_store(&mut self, offset: u32) -> CodeGenResult<()> {
        let opcode = if offset <= u32::from(u8::MAX) { Opcode::LOCAL_U8_STORE } else { Opcode::LOCAL_U16_STORE };
        self.emit(opcode, &[Operand::U32(offset)])
    }

    /// Binds `name` to the current IP in the open function.
    pub fn add_label(&mut self, name: &str) -> CodeGenResult<()> {
        let open = self.current.as_ref().ok_or(CodeGenError::NoOpenFunction)?;
        if self.in_instruction {
            return Err(CodeGenError::InstructionAlreadyOpen);
        }
        if name.trim().is_empty() {
            return Err(CodeGenError::EmptyLabel);
        }
        let Some((function, record)) = self.functions.get_index_mut(open.id) else {
            return Err(CodeGenError::NoOpenFunction);
        };
        if record.labels.contains_key(name) {
            return Err(CodeGenError::DuplicateLabel { function: function.clone(), label: name.to_owned() });
        }
        record.labels.insert(name.to_owned(), self.length);
        trace!(function = %function, label = name, ip = self.length, "label");
        Ok(())
    }

    /* ─────────────────────────── Instructions ─────────────────────────── */

    /// Assembles one instruction.
    pub fn emit(&mut self, opcode: Opcode, operands: &[Operand]) -> CodeGenResult<()> {
        self.begin_instruction()?;
        if let Err(e) = opcode.assemble(operands, self) {
            self.abort_instruction();
            return Err(e);
        }
        self.end_instruction()
    }

    /// Expands a pseudo-instruction.
    pub fn emit_high_level(&mut self, op: HighLevelOp, operands: &[Operand]) -> CodeGenResult<()> {
        if self.current.is_none() {
            return Err(CodeGenError::NoOpenFunction);
        }
        op.expand(operands, self)
    }

    /// Opens an instruction in the scratch buffer.
    pub fn begin_instruction(&mut self) -> CodeGenResult<()> {
        if self.current.is_none() {
            return Err(CodeGenError::NoOpenFunction);
        }
        if self.in_instruction {
            return Err(CodeGenError::InstructionAlreadyOpen);
        }
        self.buffer.clear();
        self.in_instruction = true;
        Ok(())
    }

    /// Drops the open instruction and the fixups it recorded.
    fn abort_instruction(&mut self) {
        if let Some(&first) = self.function_fixups_in_instruction.first() {
            self.function_fixups.truncate(first);
        }
        if let Some(&first) = self.label_fixups_in_instruction.first() {
            self.label_fixups.truncate(first);
        }
        self.function_fixups_in_instruction.clear();
        self.label_fixups_in_instruction.clear();
        self.buffer.clear();
        self.in_instruction = false;
    }

    fn write(&mut self, bytes: &[u8]) -> CodeGenResult<()> {
        if !self.in_instruction {
            return Err(CodeGenError::NoOpenInstruction);
        }
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() >= MAX_INSTRUCTION_LEN {
            return Err(CodeGenError::InstructionTooLong { len: self.buffer.len(), max: MAX_INSTRUCTION_LEN });
        }
        Ok(())
    }

    /// IP the next buffered byte would land at, before any page relocation.
    fn buffer_ip(&self) -> u32 { self.length + self.buffer.len() as u32 }

    /// Commits the buffered instruction, moving it to the next page if needed.
    pub fn end_instruction(&mut self) -> CodeGenResult<()> {
        if self.current.is_none() {
            return Err(CodeGenError::NoOpenFunction);
        }
        if !self.in_instruction {
            return Err(CodeGenError::NoOpenInstruction);
        }
        let Some(&first) = self.buffer.first() else {
            return Err(CodeGenError::EmptyInstruction);
        };
        let opcode = Opcode::from_byte(first).ok_or(CoreError::InvalidOpcode { byte: first, ip: self.length })?;

        self.ensure_page(page_index(self.length));

        // The VM only changes page after a control-flow instruction or a NOP,
        // so anything else must leave at least one byte before the page end.
        let needs_nop = !opcode.is_control_flow() && opcode != Opcode::NOP;
        let page_len = PAGE_SIZE as usize;
        let offset = page_offset(self.length) as usize;

        if offset + self.buffer.len() > page_len - usize::from(needs_nop) {
            let remaining = page_len - offset;
            let next_page = page_index(self.length) + 1;
            let jumped = remaining >= JUMP_SIZE;
            if jumped {
                self.write_jump(page_start(next_page))?;
            }

            let skipped = remaining as u32;
            self.length += skipped;
            for &i in &self.function_fixups_in_instruction {
                self.function_fixups[i].ip += skipped;
            }
            for &i in &self.label_fixups_in_instruction {
                self.label_fixups[i].ip += skipped;
            }
            trace!(%opcode, skipped, jumped, ip = self.length, "instruction moved to next page");

            self.ensure_page(next_page);
        }

        let offset = page_offset(self.length) as usize;
        let page = &mut self.pages[page_index(self.length) as usize];
        page[offset..offset + self.buffer.len()].copy_from_slice(&self.buffer);
        self.length += self.buffer.len() as u32;

        self.function_fixups_in_instruction.clear();
        self.label_fixups_in_instruction.clear();
        self.in_instruction = false;
        Ok(())
    }

    /// Writes a `J` at the current IP, bypassing the instruction buffer.
    fn write_jump(&mut self, target: u32) -> CodeGenResult<()> {
        let ip = self.length;
        let rel = relative_branch(ip + 1, target)
            .ok_or(CoreError::MalformedTarget { ip, target: i64::from(target) })?;
        let [lo, hi] = rel.to_le_bytes();
        self.patch(ip, &[Opcode::J.byte(), lo, hi])
    }

    fn ensure_page(&mut self, index: u32) {
        while self.pages.len() <= index as usize {
            self.pages.push(vec![0; PAGE_SIZE as usize]);
        }
    }

    fn patch(&mut self, ip: u32, bytes: &[u8]) -> CodeGenResult<()> {
        let offset = page_offset(ip) as usize;
        self.pages
            .get_mut(page_index(ip) as usize)
            .and_then(|page| page.get_mut(offset..offset + bytes.len()))
            .ok_or(CoreError::OutOfBounds { ip, size: bytes.len(), length: self.length })?
            .copy_from_slice(bytes);
        Ok(())
    }

    /* ─────────────────────────── Finalisation ─────────────────────────── */

    fn fixup_function_targets(&mut self) -> CodeGenResult<()> {
        for fixup in std::mem::take(&mut self.function_fixups) {
            let ip = self
                .functions
                .get(&fixup.target)
                .map(|f| f.start)
                .ok_or_else(|| CodeGenError::UnknownFunction(fixup.target.clone()))?;
            if ip > MAX_FUNCTION_IP {
                return Err(CodeGenError::FunctionOutOfRange { name: fixup.target, ip });
            }
            let [b0, b1, b2, _] = ip.to_le_bytes();
            self.patch(fixup.ip, &[b0, b1, b2])?;
            trace!(function = %fixup.target, at = fixup.ip, ip, "function fixup");
        }
        Ok(())
    }

    fn fixup_label_targets(&mut self) -> CodeGenResult<()> {
        for fixup in std::mem::take(&mut self.label_fixups) {
            let Some((function, record)) = self.functions.get_index(fixup.function) else {
                return Err(CodeGenError::NoOpenFunction);
            };
            let target = record.labels.get(&fixup.label).copied().ok_or_else(|| CodeGenError::UnknownLabel {
                function: function.clone(),
                label: fixup.label.clone(),
            })?;
            let rel = relative_branch(fixup.ip, target).ok_or_else(|| CodeGenError::BranchOutOfRange {
                function: function.clone(),
                label: fixup.label.clone(),
                distance: i64::from(target) - i64::from(fixup.ip) - 2,
            })?;
            self.patch(fixup.ip, &rel.to_le_bytes())?;
            trace!(label = %fixup.label, at = fixup.ip, target, rel, "label fixup");
        }
        Ok(())
    }

    /// Resolves every pending reference and returns the pages and code length.
    ///
    /// Every page but the last is `PAGE_SIZE` bytes; the last is cut to the
    /// code length. Both fixup lists are empty afterwards.
    pub fn to_pages(&mut self) -> CodeGenResult<(Vec<Vec<u8>>, u32)> {
        if self.in_instruction {
            return Err(CodeGenError::InstructionAlreadyOpen);
        }
        self.fixup_function_targets()?;
        self.fixup_label_targets()?;

        let mut pages = self.pages.clone();
        if let Some(last) = pages.last_mut() {
            let tail = match page_offset(self.length) {
                0 => PAGE_SIZE,
                n => n,
            };
            last.truncate(tail as usize);
        }
        debug!(pages = pages.len(), length = self.length, functions = self.functions.len(), "code finalized");
        Ok((pages, self.length))
    }

    /// [`to_pages`](Self::to_pages) wrapped in a readable view.
    pub fn to_code(&mut self) -> CodeGenResult<PagedCode> {
        let (pages, length) = self.to_pages()?;
        Ok(PagedCode::new(pages, length)?)
    }

    /// Pending fixups, function targets then label targets.
    pub fn pending_fixups(&self) -> (usize, usize) { (self.function_fixups.len(), self.label_fixups.len()) }

    /// Declared functions with their ranges and labels, in declaration order.
    ///
    /// A function still open ends at the current IP.
    pub fn function_table(&self) -> Vec<FunctionInfo> {
        self.functions
            .iter()
            .map(|(name, record)| {
                let mut labels: Vec<LabelInfo> =
                    record.labels.iter().map(|(label, &ip)| LabelInfo { name: label.clone(), ip }).collect();
                labels.sort_by_key(|l| l.ip);
                FunctionInfo { name: name.clone(), start: record.start, end: record.end.unwrap_or(self.length), labels }
            })
            .collect()
    }
}

impl Default for CodeBuilder {
    fn default() -> Self { Self::new(AssemblerContext::default()) }
}

/* ─────────────────────────── Sink brut ─────────────────────────── */

impl InstructionSink for CodeBuilder {
    type Error = CodeGenError;

    fn u8(&mut self, v: u8) -> CodeGenResult<()> { self.write(&[v]) }

    fn u16(&mut self, v: u16) -> CodeGenResult<()> { self.write(&v.to_le_bytes()) }

    fn u24(&mut self, v: u32) -> CodeGenResult<()> {
        let [b0, b1, b2, _] = v.to_le_bytes();
        self.write(&[b0, b1, b2])
    }

    fn u32(&mut self, v: u32) -> CodeGenResult<()> { self.write(&v.to_le_bytes()) }

    fn label_target(&mut self, label: &str) -> CodeGenResult<()> {
        if !self.in_instruction {
            return Err(CodeGenError::NoOpenInstruction);
        }
        if label.trim().is_empty() {
            return Err(CodeGenError::EmptyLabel);
        }
        let function = self.current.as_ref().ok_or(CodeGenError::NoOpenFunction)?.id;
        self.label_fixups_in_instruction.push(self.label_fixups.len());
        self.label_fixups.push(LabelFixup { function, label: label.to_owned(), ip: self.buffer_ip() });
        self.write(&[0, 0])
    }

    fn function_target(&mut self, function: &str) -> CodeGenResult<()> {
        if !self.in_instruction {
            return Err(CodeGenError::NoOpenInstruction);
        }
        if function.trim().is_empty() {
            return Err(CodeGenError::EmptyFunctionName);
        }
        self.function_fixups_in_instruction.push(self.function_fixups.len());
        self.function_fixups.push(FunctionFixup { target: function.to_owned(), ip: self.buffer_ip() });
        self.write(&[0, 0, 0])
    }
}

/* ─────────────────────────── Sink de pseudo-instructions ─────────────────────────── */

impl HighLevelSink for CodeBuilder {
    fn emit(&mut self, opcode: Opcode, operands: &[Operand]) -> CodeGenResult<()> { Self::emit(self, opcode, operands) }

    fn add_or_get_string(&mut self, s: &str) -> CodeGenResult<u32> { Ok(self.context.strings.add_or_get(s)) }

    fn native_hash(&self, name: &str) -> CodeGenResult<u64> { self.context.natives.resolve(name) }

    fn add_or_get_native(&mut self, hash: u64) -> CodeGenResult<u16> { self.context.natives.add_or_get(hash) }

    fn static_offset(&self, name: &str) -> CodeGenResult<u32> { self.context.statics.offset(name) }

    fn local_offset(&self, name: &str) -> CodeGenResult<u32> { Self::local_offset(self, name) }
}
