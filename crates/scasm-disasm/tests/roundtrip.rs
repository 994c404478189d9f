// crates/scasm-disasm/tests/roundtrip.rs
//! Assemble with `CodeBuilder`, disassemble, compare symbol by symbol.

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use scasm_codegen::prelude::*;
use scasm_core::{page_index, page_offset, FunctionInfo, PAGE_SIZE};
use scasm_disasm::{listing, DecodedFunction, Disassembler};

type Insn = (Opcode, Vec<Operand>);

fn finish(mut b: CodeBuilder) -> (Disassembler, Vec<FunctionInfo>) {
    let code = b.to_code().expect("finalize");
    let table = b.function_table();
    let dis = Disassembler::new(code, table.clone()).expect("function table");
    (dis, table)
}

/// Decoded body without page padding (`NOP`s and jumps to synthetic labels).
fn stripped(f: &DecodedFunction) -> Vec<Insn> {
    f.instructions
        .iter()
        .filter(|i| i.opcode != Opcode::NOP)
        .filter(|i| {
            !(i.opcode == Opcode::J
                && i.operands.first().and_then(Operand::as_identifier).is_some_and(|l| l.starts_with("lbl_")))
        })
        .map(|i| (i.opcode, i.operands.clone()))
        .collect()
}

#[test]
fn symbols_survive_a_round_trip() {
    let mut b = CodeBuilder::default();
    let main = FunctionDef::new("main").with_arg("n", TypeDef::Scalar).with_local("i", TypeDef::Scalar);
    b.begin_function(main).unwrap();
    b.add_label("loop").unwrap();
    let body: Vec<Insn> = vec![
        (Opcode::LOCAL_U8_LOAD, vec![Operand::U8(3)]),
        (Opcode::JZ, vec![Operand::ident("done")]),
        (Opcode::CALL, vec![Operand::ident("helper")]),
        (Opcode::SWITCH, vec![Operand::case(1, "loop"), Operand::case(2, "done")]),
        (Opcode::J, vec![Operand::ident("loop")]),
    ];
    for (op, operands) in &body {
        b.emit(*op, operands).unwrap();
    }
    b.add_label("done").unwrap();
    b.end_function().unwrap();

    b.begin_function(FunctionDef::new("helper").returning(TypeDef::Scalar)).unwrap();
    b.emit(Opcode::PUSH_CONST_F, &[Operand::F32(0.25)]).unwrap();
    b.end_function().unwrap();

    let (dis, table) = finish(b);
    let decoded = dis.disassemble().unwrap();
    assert_eq!(decoded.len(), 2);

    let mut expected = vec![(Opcode::ENTER, vec![Operand::U8(1), Operand::U16(4)])];
    expected.extend(body);
    expected.push((Opcode::LEAVE, vec![Operand::U8(1), Operand::U8(0)]));
    assert_eq!(stripped(&decoded[0]), expected);
    assert_eq!(decoded[0].labels, table[0].labels);

    assert_eq!(
        stripped(&decoded[1]),
        vec![
            (Opcode::ENTER, vec![Operand::U8(0), Operand::U16(2)]),
            (Opcode::PUSH_CONST_F, vec![Operand::F32(0.25)]),
            (Opcode::LEAVE, vec![Operand::U8(0), Operand::U8(1)]),
        ]
    );

    let text = listing::full(&decoded, "unit");
    assert!(text.contains("CALL helper"));
    assert!(text.contains("SWITCH 1:loop, 2:done"));
}

#[test]
fn embedded_names_decode_as_identifiers() {
    let mut ctx = AssemblerContext::default();
    ctx.options.embed_function_names = true;
    let mut b = CodeBuilder::new(ctx);
    b.begin_function(FunctionDef::new("tick")).unwrap();
    b.end_function().unwrap();
    let (dis, _) = finish(b);
    let f = dis.disassemble_function(0).unwrap();
    assert_eq!(f.instructions[0].operands, vec![Operand::U8(0), Operand::U16(2), Operand::ident("tick")]);
}

#[test]
fn branches_across_pages() {
    let mut b = CodeBuilder::default();
    b.begin_function(FunctionDef::new("main").naked()).unwrap();
    b.add_label("start").unwrap();
    let mut expected = Vec::new();
    // three pages of 5-byte pushes: never a multiple of the page size
    for i in 0..(3 * PAGE_SIZE / 5) {
        let insn = (Opcode::PUSH_CONST_F, vec![Operand::F32(i as f32)]);
        b.emit(insn.0, &insn.1).unwrap();
        expected.push(insn);
    }
    let back = (Opcode::J, vec![Operand::ident("start")]);
    // too far for a 16-bit branch
    b.emit(back.0, &back.1).unwrap();
    b.end_function().unwrap();
    assert!(b.to_pages().is_err());

    let mut b = CodeBuilder::default();
    b.begin_function(FunctionDef::new("main").naked()).unwrap();
    b.add_label("start").unwrap();
    expected.truncate((PAGE_SIZE / 5 + 100) as usize);
    for (op, operands) in &expected {
        b.emit(*op, operands).unwrap();
    }
    b.emit(back.0, &back.1).unwrap();
    expected.push(back);
    b.end_function().unwrap();

    let (dis, _) = finish(b);
    dis.verify_containment().unwrap();
    let decoded = dis.disassemble().unwrap();
    assert_eq!(stripped(&decoded[0]), expected);

    // the page-end jump got a synthetic label on the next page
    let synthetic: Vec<_> = decoded[0].labels.iter().filter(|l| l.name.starts_with("lbl_")).collect();
    assert_eq!(synthetic.len(), 1);
    assert_eq!(synthetic[0].ip, PAGE_SIZE);
    assert_eq!(synthetic[0].name, "lbl_004000");
}

#[test]
fn calls_to_relocated_prologues() {
    let mut b = CodeBuilder::default();
    b.begin_function(FunctionDef::new("filler").naked()).unwrap();
    for _ in 0..PAGE_SIZE - 7 {
        b.emit(Opcode::IADD, &[]).unwrap();
    }
    b.emit(Opcode::CALL, &[Operand::ident("late")]).unwrap();
    b.end_function().unwrap();
    // three bytes left: the prologue moves to the next page behind a jump
    b.begin_function(FunctionDef::new("late")).unwrap();
    b.end_function().unwrap();

    let (dis, table) = finish(b);
    assert_eq!(table[1].start, PAGE_SIZE - 3);
    dis.verify_containment().unwrap();

    let decoded = dis.disassemble().unwrap();
    assert_eq!(decoded[0].instructions.last().unwrap().operands, vec![Operand::ident("late")]);
    let late: Vec<_> = decoded[1].instructions.iter().map(|i| (i.ip, i.opcode)).collect();
    assert_eq!(
        late,
        vec![(PAGE_SIZE - 3, Opcode::J), (PAGE_SIZE, Opcode::ENTER), (PAGE_SIZE + 5, Opcode::LEAVE)]
    );
    assert_eq!(decoded[1].instructions[0].operands, vec![Operand::ident("lbl_004000")]);
}

#[derive(Debug, Clone)]
enum Step {
    Add,
    Push(u8),
    PushF(f32),
    Label(usize),
    Jump(usize),
    JumpIfZero(usize),
    Call,
    Switch(u32, usize, usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => Just(Step::Add),
        4 => any::<u8>().prop_map(Step::Push),
        3 => (-1000i32..1000).prop_map(|v| Step::PushF(v as f32 / 8.0)),
        2 => (0usize..8).prop_map(Step::Label),
        1 => (0usize..8).prop_map(Step::Jump),
        1 => (0usize..8).prop_map(Step::JumpIfZero),
        1 => Just(Step::Call),
        1 => (any::<u32>(), 0usize..8, 0usize..8).prop_map(|(v, a, c)| Step::Switch(v, a, c)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn random_streams_round_trip(steps in prop::collection::vec(step(), 1..3000)) {
        let label = |i: usize| format!("l{i}");
        let mut placed = [false; 8];
        let mut expected: Vec<Insn> = Vec::new();
        let mut b = CodeBuilder::default();
        b.begin_function(FunctionDef::new("main").naked()).unwrap();

        let mut emit = |b: &mut CodeBuilder, insn: Insn| {
            b.emit(insn.0, &insn.1).unwrap();
            expected.push(insn);
        };
        for s in &steps {
            match *s {
                Step::Add => emit(&mut b, (Opcode::IADD, vec![])),
                Step::Push(v) => emit(&mut b, (Opcode::PUSH_CONST_U8, vec![Operand::U8(v)])),
                Step::PushF(v) => emit(&mut b, (Opcode::PUSH_CONST_F, vec![Operand::F32(v)])),
                Step::Label(i) if !placed[i] => {
                    placed[i] = true;
                    b.add_label(&label(i)).unwrap();
                    // keep one label per IP
                    emit(&mut b, (Opcode::IADD, vec![]));
                }
                Step::Label(_) => {}
                Step::Jump(i) => emit(&mut b, (Opcode::J, vec![Operand::ident(label(i))])),
                Step::JumpIfZero(i) => emit(&mut b, (Opcode::JZ, vec![Operand::ident(label(i))])),
                Step::Call => emit(&mut b, (Opcode::CALL, vec![Operand::ident("other")])),
                Step::Switch(v, x, y) => emit(
                    &mut b,
                    (Opcode::SWITCH, vec![Operand::case(v, label(x)), Operand::case(v.wrapping_add(1), label(y))]),
                ),
            }
        }
        for i in 0..placed.len() {
            if !placed[i] {
                b.add_label(&label(i)).unwrap();
                emit(&mut b, (Opcode::IADD, vec![]));
            }
        }
        b.end_function().unwrap();
        b.begin_function(FunctionDef::new("other").naked()).unwrap();
        b.emit(Opcode::LEAVE, &[Operand::U8(0), Operand::U8(0)]).unwrap();
        b.end_function().unwrap();

        let (dis, _) = finish(b);
        prop_assert!(dis.verify_containment().is_ok());
        let decoded = dis.disassemble().unwrap();
        prop_assert_eq!(stripped(&decoded[0]), expected);

        for insn in &decoded[0].instructions {
            let last = insn.ip + insn.size - 1;
            prop_assert_eq!(page_index(insn.ip), page_index(last));
            if insn.opcode.is_control_flow() || insn.opcode == Opcode::NOP {
                continue;
            }
            prop_assert!(page_offset(last) < PAGE_SIZE - 1);
        }
    }
}
