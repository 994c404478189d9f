//! scasm-core: primitives partagées par l'assembleur et le désassembleur
//!
//! Fournit :
//! - Pagination du code : `PAGE_SIZE`, `page_index`, `page_offset` (décomposition d'une IP)
//! - `Operand` : valeur d'opérande (entiers, flottant, identifiant, cas de switch)
//! - `Opcode` + table d'encodage (`Opcode::assemble` / `Opcode::decode`)
//! - Traits d'émission (`InstructionSink`) et de décodage (`InstructionDecoder`)
//! - `PagedCode` : stockage aléatoire adressé par IP, conscient des pages
//! - `FunctionInfo` / `LabelInfo` : table des fonctions échangée entre les deux sens
//! - `validate_pages` : contrôle de la forme d'un tableau de pages
//! - Erreurs `CoreError` + alias `CoreResult<T>`
//!
//! Features :
//! - `serde` (par défaut) : derive (dé)sérialisation sur opérandes, opcodes et tables

#![warn(missing_docs)]

/* ─────────────────────────── Imports ─────────────────────────── */

use std::borrow::Cow;

use thiserror::Error;

/* ─────────────────────────── Modules publics ─────────────────────────── */

/// Constantes de pagination et décomposition des adresses.
pub mod page;
/// Valeurs d'opérandes.
pub mod operand;
/// Jeu d'instructions de la VM cible.
pub mod opcode;
/// Table d'encodage : traits d'émission/décodage et formes d'opérandes.
pub mod encoding;
/// Stockage de code paginé (lecture seule).
pub mod code;
/// Table des fonctions et labels.
pub mod symbols;
/// Validation de la forme des pages.
pub mod helpers;

pub use code::PagedCode;
pub use encoding::{relative_branch, relative_target, InstructionDecoder, InstructionSink};
pub use helpers::validate_pages;
pub use opcode::{Opcode, OperandKind, OperandShape};
pub use operand::Operand;
pub use page::{page_index, page_offset, page_start, PageRead, MAX_INSTRUCTION_LEN, PAGE_MASK, PAGE_SHIFT, PAGE_SIZE};
pub use symbols::{FunctionInfo, LabelInfo};

/* ─────────────────────────── Résultat commun ─────────────────────────── */

/// Alias résultat commun au core.
pub type CoreResult<T> = core::result::Result<T, CoreError>;

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs de bas niveau communes (encodage, lecture des pages).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Nombre d'opérandes incorrect pour un opcode.
    #[error("{opcode}: expected {expected} operand(s), got {got}")]
    Arity {
        /// Opcode concerné.
        opcode: Opcode,
        /// Nombre attendu (description).
        expected: Cow<'static, str>,
        /// Nombre reçu.
        got: usize,
    },
    /// Opérande du mauvais type.
    #[error("{opcode}: operand #{index} must be {expected}, got {got}")]
    OperandMismatch {
        /// Opcode concerné.
        opcode: Opcode,
        /// Position de l'opérande.
        index: usize,
        /// Type attendu.
        expected: &'static str,
        /// Type reçu.
        got: &'static str,
    },
    /// Valeur entière hors de la plage du champ.
    #[error("{opcode}: operand #{index} value {value} does not fit in {field}")]
    OutOfRange {
        /// Opcode concerné.
        opcode: Opcode,
        /// Position de l'opérande.
        index: usize,
        /// Valeur fautive.
        value: i64,
        /// Champ cible.
        field: &'static str,
    },
    /// Octet d'opcode inconnu.
    #[error("invalid opcode 0x{byte:02X} at 0x{ip:06X}")]
    InvalidOpcode {
        /// Octet lu.
        byte: u8,
        /// Adresse de l'instruction.
        ip: u32,
    },
    /// Lecture au-delà de la longueur du code.
    #[error("read of {size} byte(s) at 0x{ip:06X} is past the end of code (length {length})")]
    OutOfBounds {
        /// Adresse lue.
        ip: u32,
        /// Taille lue.
        size: usize,
        /// Longueur totale du code.
        length: u32,
    },
    /// Lecture à cheval sur deux pages.
    #[error("read of {size} byte(s) at 0x{ip:06X} crosses a page boundary")]
    PageStraddle {
        /// Adresse lue.
        ip: u32,
        /// Taille lue.
        size: usize,
    },
    /// Cible de branchement hors de l'espace d'adressage.
    #[error("branch at 0x{ip:06X} targets invalid address {target}")]
    MalformedTarget {
        /// Adresse de l'instruction.
        ip: u32,
        /// Cible calculée.
        target: i64,
    },
    /// Données corrompues (forme des pages, tailles).
    #[error("corrupted: {0}")]
    Corrupted(Cow<'static, str>),
}

impl CoreError {
    /// Construit une erreur « corrompu ».
    pub fn corrupted(msg: impl Into<Cow<'static, str>>) -> Self { CoreError::Corrupted(msg.into()) }
}

/* ─────────────────────────── Prélude (reexports utiles) ─────────────────────────── */

/// Prélude pratique pour importer les types/funcs clés du crate.
pub mod prelude {
    /// Réexports utiles pour une importation rapide.
    pub use super::{
        page_index, page_offset, CoreError, CoreResult, FunctionInfo, InstructionDecoder, InstructionSink,
        LabelInfo, Opcode, Operand, PagedCode, PAGE_SIZE,
    };
}

/* ─────────────────────────── Tests ─────────────────────────── */
