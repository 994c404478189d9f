//! Textual listings used by the CLI tooling.

use core::fmt::Write;

use scasm_core::Operand;

use crate::decoder::DecodedInstruction;
use crate::disassembler::DecodedFunction;

/// Multi-line listing with function headers and labels.
pub fn full(functions: &[DecodedFunction], title: &str) -> String {
    let count: usize = functions.iter().map(|f| f.instructions.len()).sum();
    let mut out = String::new();
    let _ = writeln!(out, "== {title} == (functions={}, instructions={count})", functions.len());

    for f in functions {
        let _ = writeln!(out);
        let _ = writeln!(out, ";; {} [0x{:06X}..0x{:06X}) {} byte(s)", f.name, f.start, f.end, f.end - f.start);
        let _ = writeln!(out, "{}:", f.name);
        for insn in &f.instructions {
            for label in f.labels_at(insn.ip) {
                let _ = writeln!(out, "  {label}:");
            }
            let _ = writeln!(out, "    {}", line(insn));
        }
        // labels bound to the end of the function
        for label in f.labels_at(f.end) {
            let _ = writeln!(out, "  {label}:");
        }
    }
    out
}

/// One line per instruction.
pub fn compact(functions: &[DecodedFunction]) -> String {
    let mut out = String::new();
    for f in functions {
        for insn in &f.instructions {
            let _ = writeln!(out, "{}", line(insn));
        }
    }
    out
}

fn line(insn: &DecodedInstruction) -> String {
    if insn.operands.is_empty() {
        format!("0x{:06X}: {}", insn.ip, insn.opcode)
    } else {
        format!("0x{:06X}: {} {}", insn.ip, insn.opcode, operands(&insn.operands))
    }
}

fn operands(ops: &[Operand]) -> String { ops.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ") }

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scasm_core::{LabelInfo, Opcode};

    fn sample() -> Vec<DecodedFunction> {
        vec![DecodedFunction {
            name: "main".into(),
            start: 0,
            end: 8,
            labels: vec![
                LabelInfo { name: "top".into(), ip: 5 },
                LabelInfo { name: "done".into(), ip: 8 },
            ],
            instructions: vec![
                DecodedInstruction {
                    ip: 0,
                    opcode: Opcode::ENTER,
                    size: 5,
                    operands: vec![Operand::U8(0), Operand::U16(2)],
                },
                DecodedInstruction { ip: 5, opcode: Opcode::J, size: 3, operands: vec![Operand::ident("top")] },
            ],
        }]
    }

    #[test]
    fn full_listing() {
        let expected = "\
== t.code == (functions=1, instructions=2)

;; main [0x000000..0x000008) 8 byte(s)
main:
    0x000000: ENTER 0, 2
  top:
    0x000005: J top
  done:
";
        assert_eq!(full(&sample(), "t.code"), expected);
    }

    #[test]
    fn compact_listing() {
        assert_eq!(compact(&sample()), "0x000000: ENTER 0, 2\n0x000005: J top\n");
    }
}
