// src/lib.rs
//! scasm-codegen: assemblage de bytecode paginé
//!
//! - Entrée : déclarations de fonctions + flux d'instructions symboliques
//! - Sortie : pages de code (`PAGE_SIZE` octets, la dernière éventuellement courte) + longueur
//! - Fixups : appels absolus sur 24 bits, branchements relatifs sur 16 bits
//! - Pseudo-instructions (`HighLevelOp`) développées en opcodes natifs
//! - Contexte d'assemblage : chaînes, natives, statiques
//!
//! API principale :
//! ```ignore
//! use scasm_codegen::{AssemblerContext, CodeBuilder, FunctionDef, TypeDef};
//! use scasm_core::{Opcode, Operand};
//!
//! let mut b = CodeBuilder::new(AssemblerContext::default());
//! b.begin_function(FunctionDef::new("main").with_local("i", TypeDef::Scalar))?;
//! b.add_label("loop")?;
//! b.emit(Opcode::J, &[Operand::ident("loop")])?;
//! b.end_function()?;
//! let (pages, length) = b.to_pages()?;
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![warn(missing_docs)]

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod builder;
pub mod context;
pub mod error;
pub mod function;
pub mod highlevel;
pub mod types;

pub use builder::CodeBuilder;
pub use context::{AssemblerContext, NativeTable, StaticTable, StringTable};
pub use error::{CodeGenError, CodeGenResult};
pub use function::{FunctionDef, VarDef};
pub use highlevel::{HighLevelOp, HighLevelSink};
pub use types::{ArrayType, FieldDef, ScalarValue, StructType, TypeDef};

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// Options de génération de code
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CodeGenOptions {
    /// Insérer le nom de la fonction dans l'instruction `ENTER` du prologue
    pub embed_function_names: bool,
}

impl Default for CodeGenOptions {
    fn default() -> Self {
        Self { embed_function_names: false }
    }
}

/// Prélude pratique pour les émetteurs.
pub mod prelude {
    pub use crate::{
        AssemblerContext, CodeBuilder, CodeGenError, CodeGenOptions, CodeGenResult, FunctionDef, HighLevelOp,
        HighLevelSink, ScalarValue, TypeDef, VarDef,
    };
    pub use scasm_core::{InstructionSink, Opcode, Operand};
}
