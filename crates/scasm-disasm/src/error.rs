//! Erreurs du désassembleur.
//!
//! Sur du bytecode bien formé aucune ne doit survenir : elles signalent une
//! divergence entre la table de décodage et l'encodage de l'assembleur, ou
//! une table des fonctions qui ne correspond pas au code.

use scasm_core::CoreError;
use thiserror::Error;

/// Erreur de décodage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DisasmError {
    /// Lecture ou décodage de bas niveau.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Aucun label de la fonction courante ne porte cette adresse.
    #[error("no label of `{function}` at 0x{ip:06X}")]
    UnknownLabelTarget {
        /// Fonction courante.
        function: String,
        /// Adresse visée.
        ip: u32,
    },

    /// Aucune fonction ne commence à cette adresse.
    #[error("no function starts at 0x{ip:06X}")]
    UnknownFunctionTarget {
        /// Adresse visée.
        ip: u32,
    },

    /// Index hors de la table des fonctions.
    #[error("function #{0} is not in the function table")]
    NoSuchFunction(usize),

    /// Une instruction est déjà en cours de décodage.
    #[error("an instruction is already being decoded")]
    InstructionAlreadyOpen,

    /// Aucune instruction en cours.
    #[error("no instruction is being decoded")]
    NoOpenInstruction,

    /// Fonction qui déborde du code ou dont les bornes sont inversées.
    #[error("function `{name}` spans 0x{start:06X}..0x{end:06X}, outside code of length {length}")]
    BadFunctionRange {
        /// Fonction fautive.
        name: String,
        /// Début déclaré.
        start: u32,
        /// Fin déclarée.
        end: u32,
        /// Longueur du code.
        length: u32,
    },

    /// Dernière instruction d'une fonction qui dépasse sa fin.
    #[error("instruction at 0x{ip:06X} runs past the end of `{function}` (0x{end:06X})")]
    Overrun {
        /// Fonction en cours.
        function: String,
        /// Adresse de l'instruction.
        ip: u32,
        /// Fin de la fonction.
        end: u32,
    },

    /// Instruction à cheval sur deux pages.
    #[error("instruction {opcode} at 0x{ip:06X} ({size} bytes) crosses a page boundary")]
    PageCrossing {
        /// Opcode de l'instruction.
        opcode: scasm_core::Opcode,
        /// Adresse de l'instruction.
        ip: u32,
        /// Taille de l'instruction.
        size: u32,
    },
}

/// Alias résultat du désassembleur.
pub type DisasmResult<T> = core::result::Result<T, DisasmError>;
