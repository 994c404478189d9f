//! Programme JSON consommé par `scasm-asm`.
//!
//! ```json
//! {
//!   "options": { "embed_function_names": true },
//!   "statics": [{ "name": "counter" }],
//!   "natives": { "WAIT": "0x4EDE34FBADD967A6" },
//!   "functions": [{
//!     "name": "main",
//!     "locals": [{ "name": "i", "initial": 0 }],
//!     "body": [
//!       { "label": "loop" },
//!       { "macro": "LOCAL_LOAD", "args": ["i"] },
//!       { "op": "JZ", "args": ["done"] },
//!       { "macro": "CALL_NATIVE", "args": ["WAIT", 1, 0] },
//!       { "op": "J", "args": ["loop"] },
//!       { "label": "done" }
//!     ]
//!   }]
//! }
//! ```

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use scasm_codegen::{AssemblerContext, CodeBuilder, CodeGenOptions, FunctionDef, HighLevelOp};
use scasm_core::{FunctionInfo, Opcode, Operand, PagedCode};

/// Unité de compilation complète.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// Options de génération.
    #[serde(default)]
    pub options: CodeGenOptions,
    /// Variables statiques, dans l'ordre d'allocation.
    #[serde(default)]
    pub statics: Vec<StaticDecl>,
    /// Natives connues : nom -> hash.
    #[serde(default)]
    pub natives: BTreeMap<String, HashLiteral>,
    /// Fonctions, dans l'ordre d'émission.
    pub functions: Vec<FunctionSource>,
}

/// Déclaration d'une statique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticDecl {
    /// Nom.
    pub name: String,
    /// Taille en slots.
    #[serde(default = "one")]
    pub size: u32,
}

const fn one() -> u32 { 1 }

/// Hash de native : entier ou chaîne `0x...`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HashLiteral {
    /// Valeur numérique.
    Int(u64),
    /// Texte hexadécimal.
    Hex(String),
}

impl HashLiteral {
    /// Valeur du hash.
    pub fn value(&self) -> Result<u64> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Hex(s) => {
                let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
                u64::from_str_radix(digits, 16).with_context(|| format!("hash invalide `{s}`"))
            }
        }
    }
}

/// Fonction : déclaration + corps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSource {
    /// Déclaration (nom, arguments, locales, retour, `naked`).
    #[serde(flatten)]
    pub def: FunctionDef,
    /// Lignes du corps.
    #[serde(default)]
    pub body: Vec<Line>,
}

/// Ligne de corps de fonction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Line {
    /// Pose un label.
    Label {
        /// Nom du label.
        label: String,
    },
    /// Instruction native.
    Op {
        /// Opcode.
        op: Opcode,
        /// Opérandes.
        #[serde(default)]
        args: Vec<Arg>,
    },
    /// Pseudo-instruction.
    Macro {
        /// Pseudo-opcode.
        #[serde(rename = "macro")]
        op: HighLevelOp,
        /// Opérandes.
        #[serde(default)]
        args: Vec<Arg>,
    },
}

/// Opérande tel qu'écrit dans le JSON.
///
/// Les entiers deviennent `u32` (ou `s16` s'ils sont négatifs et tiennent),
/// les flottants `f32`, les chaînes des identifiants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    /// Entier.
    Int(i64),
    /// Flottant.
    Float(f64),
    /// Identifiant (label, fonction, locale, statique, native).
    Ident(String),
    /// Cas de `SWITCH`.
    Case {
        /// Valeur comparée.
        value: u32,
        /// Label visé.
        label: String,
    },
    /// Opérande typé explicitement, ex. `{ "u8": 3 }`.
    Typed(Operand),
}

impl Arg {
    /// Convertit en opérande.
    pub fn to_operand(&self) -> Result<Operand> {
        Ok(match self {
            Self::Int(v) if *v >= 0 => Operand::U32(u32::try_from(*v).map_err(|_| anyhow!("{v} dépasse 32 bits"))?),
            Self::Int(v) => match i16::try_from(*v) {
                Ok(s) => Operand::S16(s),
                Err(_) => Operand::U32(i32::try_from(*v).map_err(|_| anyhow!("{v} dépasse 32 bits"))? as u32),
            },
            Self::Float(v) => Operand::F32(*v as f32),
            Self::Ident(s) => Operand::ident(s.as_str()),
            Self::Case { value, label } => Operand::case(*value, label.as_str()),
            Self::Typed(op) => op.clone(),
        })
    }
}

/// Résultat d'assemblage d'un programme.
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Pages finalisées (la dernière éventuellement courte).
    pub pages: Vec<Vec<u8>>,
    /// Longueur du code.
    pub length: u32,
    /// Table des fonctions.
    pub functions: Vec<FunctionInfo>,
    /// Tables annexes.
    pub tables: Tables,
}

/// Tables produites à côté du code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tables {
    /// Tas de chaînes (terminées par zéro).
    pub strings: Vec<String>,
    /// Hashes des natives, par slot.
    pub natives: Vec<u64>,
    /// Slots statiques alloués.
    pub statics_size: u32,
}

impl Assembly {
    /// Vue lisible du code.
    pub fn code(&self) -> Result<PagedCode> { Ok(PagedCode::new(self.pages.clone(), self.length)?) }

    /// Pages concaténées, telles qu'écrites sur disque.
    pub fn raw(&self) -> Vec<u8> { self.pages.concat() }
}

fn operands(args: &[Arg]) -> Result<Vec<Operand>> { args.iter().map(Arg::to_operand).collect() }

/// Assemble `program`.
pub fn assemble_program(program: &Program) -> Result<Assembly> {
    let mut ctx = AssemblerContext::new(program.options.clone());
    for s in &program.statics {
        ctx.statics.declare(s.name.as_str(), s.size)?;
    }
    for (name, hash) in &program.natives {
        ctx.natives.register(name.as_str(), hash.value()?);
    }

    let mut b = CodeBuilder::new(ctx);
    for f in &program.functions {
        let name = f.def.name.as_str();
        b.begin_function(f.def.clone()).with_context(|| format!("fonction `{name}`"))?;
        for (i, line) in f.body.iter().enumerate() {
            let res = match line {
                Line::Label { label } => b.add_label(label),
                Line::Op { op, args } => b.emit(*op, &operands(args)?),
                Line::Macro { op, args } => b.emit_high_level(*op, &operands(args)?),
            };
            res.with_context(|| format!("`{name}`, ligne {i}"))?;
        }
        b.end_function().with_context(|| format!("fin de `{name}`"))?;
    }

    let (pages, length) = b.to_pages().context("résolution des références")?;
    let ctx = b.context();
    let tables = Tables {
        strings: ctx.strings.iter().map(|(s, _)| s.to_owned()).collect(),
        natives: ctx.natives.hashes(),
        statics_size: ctx.statics.size(),
    };
    debug!(pages = pages.len(), length, functions = program.functions.len(), "program assembled");
    Ok(Assembly { pages, length, functions: b.function_table(), tables })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "options": { "embed_function_names": false },
        "statics": [{ "name": "counter" }, { "name": "grid", "size": 9 }],
        "natives": { "WAIT": "0x4EDE34FBADD967A6", "PRINT": 42 },
        "functions": [
            {
                "name": "main",
                "locals": [{ "name": "i", "initial": 3 }],
                "body": [
                    { "label": "loop" },
                    { "macro": "LOCAL_LOAD", "args": ["i"] },
                    { "op": "JZ", "args": ["done"] },
                    { "macro": "PUSH_STRING", "args": ["hello"] },
                    { "macro": "CALL_NATIVE", "args": ["PRINT", 1, 0] },
                    { "macro": "STATIC_STORE", "args": ["grid"] },
                    { "op": "CALL", "args": ["helper"] },
                    { "op": "SWITCH", "args": [{ "value": 1, "label": "loop" }] },
                    { "op": "J", "args": ["loop"] },
                    { "label": "done" }
                ]
            },
            {
                "name": "helper",
                "naked": true,
                "body": [
                    { "op": "PUSH_CONST_F", "args": [0.5] },
                    { "op": "PUSH_CONST_S16", "args": [-2] },
                    { "op": "LEAVE", "args": [0, 0] }
                ]
            }
        ]
    }"#;

    #[test]
    fn sample_program_assembles() -> Result<()> {
        let program: Program = serde_json::from_str(SAMPLE)?;
        assert!(matches!(program.functions[0].body[1], Line::Macro { op: HighLevelOp::LOCAL_LOAD, .. }));

        let asm = assemble_program(&program)?;
        assert_eq!(asm.functions.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(), vec!["main", "helper"]);
        assert_eq!(asm.tables.strings, vec!["hello".to_owned()]);
        assert_eq!(asm.tables.natives, vec![42]);
        assert_eq!(asm.tables.statics_size, 10);
        assert_eq!(asm.raw().len(), asm.length as usize);
        asm.code()?;
        Ok(())
    }

    #[test]
    fn errors_point_at_the_line() {
        let program: Program = serde_json::from_str(
            r#"{ "functions": [{ "name": "main", "body": [{ "op": "J", "args": [1] }] }] }"#,
        )
        .unwrap();
        let err = assemble_program(&program).unwrap_err();
        assert_eq!(err.to_string(), "`main`, ligne 0");
    }

    #[test]
    fn argument_conversion() -> Result<()> {
        assert_eq!(Arg::Int(7).to_operand()?, Operand::U32(7));
        assert_eq!(Arg::Int(-7).to_operand()?, Operand::S16(-7));
        assert_eq!(Arg::Int(-100_000).to_operand()?, Operand::U32((-100_000i32) as u32));
        assert!(Arg::Int(1 << 40).to_operand().is_err());
        assert_eq!(Arg::Float(0.5).to_operand()?, Operand::F32(0.5));
        let typed: Arg = serde_json::from_str(r#"{ "u8": 3 }"#)?;
        assert_eq!(typed.to_operand()?, Operand::U8(3));
        Ok(())
    }

    #[test]
    fn hash_literals() -> Result<()> {
        assert_eq!(HashLiteral::Hex("0x10".into()).value()?, 16);
        assert_eq!(HashLiteral::Hex("ff".into()).value()?, 255);
        assert!(HashLiteral::Hex("zz".into()).value().is_err());
        Ok(())
    }
}
