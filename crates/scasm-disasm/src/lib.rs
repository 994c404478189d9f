// src/lib.rs
//! scasm-disasm: décodage du bytecode paginé
//!
//! - `OperandsDecoder` : décode une instruction à la fois, résout les cibles
//!   (labels de la fonction courante, débuts de fonctions)
//! - `Disassembler` : pilote sur `PagedCode` + table des fonctions
//!   (découverte des labels, décodage par fonction, contrôle des pages)
//! - `scan_functions` : reconstruit une table des fonctions sans métadonnées
//! - `listing` : rendu texte complet ou compact
//!
//! ```ignore
//! use scasm_disasm::{listing, Disassembler};
//!
//! let dis = Disassembler::new(code, functions)?;
//! dis.verify_containment()?;
//! print!("{}", listing::full(&dis.disassemble()?, "main.code"));
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![warn(missing_docs)]

pub mod decoder;
pub mod disassembler;
pub mod error;
pub mod listing;

pub use decoder::{DecodedInstruction, OperandsDecoder};
pub use disassembler::{scan_functions, DecodedFunction, Disassembler};
pub use error::{DisasmError, DisasmResult};

/// Prélude pratique.
pub mod prelude {
    pub use crate::{scan_functions, DecodedFunction, DecodedInstruction, Disassembler, DisasmError, DisasmResult, OperandsDecoder};
    pub use scasm_core::{FunctionInfo, Opcode, Operand, PagedCode};
}
