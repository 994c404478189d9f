//! Whole-image disassembly driver.
//!
//! The function table handed over by the assembler only knows declared
//! labels. Branches emitted at page ends have none, so a discovery pass runs
//! first and names every remaining target `lbl_XXXXXX` after its IP.

use std::collections::BTreeSet;

use scasm_core::{page_index, CoreError, FunctionInfo, LabelInfo, Opcode, PagedCode};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::decoder::{scan_instruction, DecodedInstruction, OperandsDecoder};
use crate::error::{DisasmError, DisasmResult};

/// A function with its decoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecodedFunction {
    /// Function name.
    pub name: String,
    /// First IP.
    pub start: u32,
    /// One past the last IP.
    pub end: u32,
    /// Labels, declared and synthesized, in address order.
    pub labels: Vec<LabelInfo>,
    /// Instructions in address order.
    pub instructions: Vec<DecodedInstruction>,
}

impl DecodedFunction {
    /// Labels bound to `ip`.
    pub fn labels_at(&self, ip: u32) -> impl Iterator<Item = &str> {
        self.labels.iter().filter(move |l| l.ip == ip).map(|l| l.name.as_str())
    }
}

/// Name given to an unlabelled branch target.
pub fn synthetic_label(ip: u32) -> String { format!("lbl_{ip:06X}") }

/// Disassembler over a finalized code image.
#[derive(Debug, Clone)]
pub struct Disassembler {
    code: PagedCode,
    functions: Vec<FunctionInfo>,
}

impl Disassembler {
    /// Checks the function ranges and completes their label tables.
    pub fn new(code: PagedCode, mut functions: Vec<FunctionInfo>) -> DisasmResult<Self> {
        for f in &functions {
            if f.start > f.end || f.end > code.length() {
                return Err(DisasmError::BadFunctionRange {
                    name: f.name.clone(),
                    start: f.start,
                    end: f.end,
                    length: code.length(),
                });
            }
        }
        for f in &mut functions {
            discover_labels(&code, f)?;
        }
        Ok(Self { code, functions })
    }

    /// Builds the function table with [`scan_functions`].
    pub fn with_scanned_functions(code: PagedCode) -> DisasmResult<Self> {
        let functions = scan_functions(&code)?;
        Self::new(code, functions)
    }

    /// Code image.
    pub const fn code(&self) -> &PagedCode { &self.code }

    /// Function table, synthesized labels included.
    pub fn functions(&self) -> &[FunctionInfo] { &self.functions }

    /// Decodes every function.
    pub fn disassemble(&self) -> DisasmResult<Vec<DecodedFunction>> {
        (0..self.functions.len()).map(|i| self.disassemble_function(i)).collect()
    }

    /// Decodes the function at `index` of the table.
    pub fn disassemble_function(&self, index: usize) -> DisasmResult<DecodedFunction> {
        let info = self.functions.get(index).ok_or(DisasmError::NoSuchFunction(index))?;
        let mut decoder = OperandsDecoder::new(&self.code, &self.functions);
        let mut instructions = Vec::new();

        let mut ip = info.start;
        while ip < info.end {
            let insn = decoder.decode(index, ip)?;
            ip += insn.size;
            if ip > info.end {
                return Err(DisasmError::Overrun { function: info.name.clone(), ip: insn.ip, end: info.end });
            }
            instructions.push(insn);
        }
        debug!(function = %info.name, instructions = instructions.len(), "disassembled");

        Ok(DecodedFunction {
            name: info.name.clone(),
            start: info.start,
            end: info.end,
            labels: info.labels.clone(),
            instructions,
        })
    }

    /// Walks the whole image and fails on the first instruction spanning two
    /// pages. Returns the instruction count.
    pub fn verify_containment(&self) -> DisasmResult<usize> {
        let mut count = 0;
        let mut ip = 0;
        while ip < self.code.length() {
            let raw = match scan_instruction(&self.code, ip) {
                Ok(raw) => raw,
                // A multi-byte operand read across the boundary: report it like any other crossing.
                Err(DisasmError::Core(CoreError::PageStraddle { ip: at, size })) => {
                    let opcode = Opcode::from_byte(self.code.byte(ip)?).unwrap_or(Opcode::NOP);
                    return Err(DisasmError::PageCrossing { opcode, ip, size: at + size as u32 - ip });
                }
                Err(e) => return Err(e),
            };
            let last = ip + raw.size - 1;
            if page_index(ip) != page_index(last) {
                return Err(DisasmError::PageCrossing { opcode: raw.opcode.unwrap_or(Opcode::NOP), ip, size: raw.size });
            }
            ip += raw.size;
            count += 1;
        }
        debug!(instructions = count, pages = self.code.pages().len(), "page containment verified");
        Ok(count)
    }
}

/// Adds a synthetic label for every branch target of `function` that has none.
///
/// Targets outside `[start, end]` are left alone; decoding reports them.
fn discover_labels(code: &PagedCode, function: &mut FunctionInfo) -> DisasmResult<()> {
    let mut targets = BTreeSet::new();
    let mut ip = function.start;
    while ip < function.end {
        let raw = scan_instruction(code, ip)?;
        targets.extend(raw.label_targets);
        ip += raw.size;
    }

    let mut added = 0;
    for target in targets.range(function.start..=function.end) {
        if function.label_at(*target).is_none() {
            function.insert_label(synthetic_label(*target), *target);
            added += 1;
        }
    }
    if added > 0 {
        debug!(function = %function.name, added, "synthesized labels");
    }
    Ok(())
}

/// Rebuilds a function table from raw code.
///
/// IP 0, every `ENTER` and every `CALL` target start a function; each runs
/// until the next start. Functions are named `func_N` in address order and
/// carry no labels.
pub fn scan_functions(code: &PagedCode) -> DisasmResult<Vec<FunctionInfo>> {
    let mut starts = BTreeSet::new();
    if code.length() > 0 {
        starts.insert(0);
    }

    let mut ip = 0;
    while ip < code.length() {
        let raw = scan_instruction(code, ip)?;
        if raw.opcode == Some(Opcode::ENTER) {
            starts.insert(ip);
        }
        starts.extend(raw.call_targets.into_iter().filter(|&t| t < code.length()));
        ip += raw.size;
    }

    let starts: Vec<u32> = starts.into_iter().collect();
    let functions: Vec<FunctionInfo> = starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(code.length());
            FunctionInfo::new(format!("func_{i}"), start, end)
        })
        .collect();
    debug!(functions = functions.len(), "function scan");
    Ok(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scasm_core::{Operand, PAGE_SIZE};

    fn code(bytes: &[u8]) -> PagedCode { PagedCode::from_raw(bytes).unwrap() }

    #[test]
    fn undeclared_targets_get_synthetic_labels() -> DisasmResult<()> {
        // J +1 ; NOP ; NOP
        let code = code(&[85, 1, 0, 0, 0]);
        let dis = Disassembler::new(code, vec![FunctionInfo::new("f", 0, 5)])?;
        assert_eq!(dis.functions()[0].labels, vec![LabelInfo { name: "lbl_000004".into(), ip: 4 }]);

        let f = dis.disassemble_function(0)?;
        assert_eq!(f.instructions[0].operands, vec![Operand::ident("lbl_000004")]);
        assert_eq!(f.instructions.len(), 3);
        assert_eq!(f.labels_at(4).collect::<Vec<_>>(), vec!["lbl_000004"]);
        Ok(())
    }

    #[cfg(feature = "serde")]
    #[test]
    fn decoded_functions_survive_json() -> DisasmResult<()> {
        let dis = Disassembler::new(code(&[85, 1, 0, 0, 0]), vec![FunctionInfo::new("f", 0, 5)])?;
        let functions = dis.disassemble()?;

        let json = serde_json::to_string(&functions).unwrap();
        assert!(json.contains(r#""opcode":"J""#), "{json}");
        assert!(json.contains(r#"{"identifier":"lbl_000004"}"#), "{json}");
        let back: Vec<DecodedFunction> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, functions);
        Ok(())
    }

    #[test]
    fn declared_labels_win() -> DisasmResult<()> {
        let code = code(&[85, 0xFD, 0xFF]);
        let mut f = FunctionInfo::new("f", 0, 3);
        f.insert_label("again", 0);
        let dis = Disassembler::new(code, vec![f])?;
        assert_eq!(dis.functions()[0].labels.len(), 1);
        assert_eq!(dis.disassemble()?[0].instructions[0].operands, vec![Operand::ident("again")]);
        Ok(())
    }

    #[test]
    fn bad_ranges_are_rejected() {
        let err = Disassembler::new(code(&[0, 0]), vec![FunctionInfo::new("f", 0, 3)]).unwrap_err();
        assert!(matches!(err, DisasmError::BadFunctionRange { end: 3, length: 2, .. }));
    }

    #[test]
    fn overrun_is_reported() {
        // PUSH_CONST_U8 declared as a 1-byte function
        let dis = Disassembler::new(code(&[37, 1]), vec![FunctionInfo::new("f", 0, 1)]);
        assert!(matches!(dis.and_then(|d| d.disassemble()), Err(DisasmError::Overrun { ip: 0, end: 1, .. })));
    }

    #[test]
    fn scan_splits_on_enter_and_calls() -> DisasmResult<()> {
        // 0: CALL 8 | 4: LEAVE 0 0 | 7: NOP | 8: NOP | 9: ENTER 0 2 "" | 14: LEAVE 0 0
        let bytes = [93, 8, 0, 0, 46, 0, 0, 0, 0, 45, 0, 2, 0, 0, 46, 0, 0];
        let functions = scan_functions(&code(&bytes))?;
        let ranges: Vec<_> = functions.iter().map(|f| (f.name.as_str(), f.start, f.end)).collect();
        assert_eq!(ranges, vec![("func_0", 0, 8), ("func_1", 8, 9), ("func_2", 9, 17)]);

        let dis = Disassembler::with_scanned_functions(code(&bytes))?;
        let listing = dis.disassemble()?;
        assert_eq!(listing[0].instructions[0].operands, vec![Operand::ident("func_1")]);
        Ok(())
    }

    #[test]
    fn scan_of_empty_code() -> DisasmResult<()> {
        assert!(scan_functions(&PagedCode::default())?.is_empty());
        Ok(())
    }

    #[test]
    fn containment_flags_crossing_instruction() -> DisasmResult<()> {
        let mut bytes = vec![0u8; PAGE_SIZE as usize + 4];
        let end = PAGE_SIZE as usize - 1;
        bytes[end] = Opcode::PUSH_CONST_U8.byte();
        let dis = Disassembler::new(code(&bytes), vec![])?;
        assert_eq!(
            dis.verify_containment(),
            Err(DisasmError::PageCrossing { opcode: Opcode::PUSH_CONST_U8, ip: PAGE_SIZE - 1, size: 2 })
        );

        bytes[end] = 0;
        let dis = Disassembler::new(code(&bytes), vec![])?;
        assert_eq!(dis.verify_containment()?, bytes.len());
        Ok(())
    }

    #[test]
    fn containment_flags_operand_read_across_pages() -> DisasmResult<()> {
        let mut bytes = vec![0u8; PAGE_SIZE as usize + 4];
        let at = PAGE_SIZE as usize - 2;
        bytes[at] = Opcode::J.byte();
        let dis = Disassembler::new(code(&bytes), vec![])?;
        assert_eq!(
            dis.verify_containment(),
            Err(DisasmError::PageCrossing { opcode: Opcode::J, ip: PAGE_SIZE - 2, size: 3 })
        );
        Ok(())
    }
}
