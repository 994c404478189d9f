//! Erreurs de l'assembleur.
//!
//! Toutes signalent un bug de l'émetteur (front-end ou pseudo-instructions) :
//! l'unité de compilation en cours doit être abandonnée.

use scasm_core::CoreError;
use thiserror::Error;

use crate::highlevel::HighLevelOp;

/// Erreur d'assemblage.
#[derive(Debug, Error)]
pub enum CodeGenError {
    /// Erreur d'encodage ou de lecture remontée du core.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Une fonction est déjà ouverte.
    #[error("function `{0}` is still open")]
    FunctionAlreadyOpen(String),

    /// Aucune fonction ouverte.
    #[error("no function is open")]
    NoOpenFunction,

    /// Une instruction est déjà ouverte.
    #[error("an instruction is already open")]
    InstructionAlreadyOpen,

    /// Aucune instruction ouverte.
    #[error("no instruction is open")]
    NoOpenInstruction,

    /// Instruction fermée sans aucun octet.
    #[error("empty instruction")]
    EmptyInstruction,

    /// Instruction trop longue (plafond : une demi-page).
    #[error("instruction is {len} bytes long, the limit is {max}")]
    InstructionTooLong {
        /// Taille atteinte.
        len: usize,
        /// Taille maximale (exclue).
        max: usize,
    },

    /// Nom de fonction vide.
    #[error("empty function name")]
    EmptyFunctionName,

    /// Fonction déclarée deux fois.
    #[error("function `{0}` is already defined")]
    DuplicateFunction(String),

    /// Nom de label vide.
    #[error("empty label name")]
    EmptyLabel,

    /// Label déclaré deux fois dans la même fonction.
    #[error("label `{label}` is already defined in `{function}`")]
    DuplicateLabel {
        /// Fonction propriétaire.
        function: String,
        /// Label répété.
        label: String,
    },

    /// Accès à une locale nommée dans une fonction nue.
    #[error("named locals are not available in naked function `{0}`")]
    NakedLocals(String),

    /// Locale inconnue.
    #[error("unknown local `{name}` in `{function}`")]
    UnknownLocal {
        /// Fonction courante.
        function: String,
        /// Nom demandé.
        name: String,
    },

    /// Appel vers une fonction jamais déclarée.
    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    /// Branchement vers un label jamais déclaré.
    #[error("unknown label `{label}` in `{function}`")]
    UnknownLabel {
        /// Fonction du branchement.
        function: String,
        /// Label demandé.
        label: String,
    },

    /// Distance de branchement hors de la plage signée 16 bits.
    #[error("branch to `{label}` in `{function}` spans {distance} bytes, beyond 16-bit range")]
    BranchOutOfRange {
        /// Fonction du branchement.
        function: String,
        /// Label visé.
        label: String,
        /// Distance calculée.
        distance: i64,
    },

    /// Fonction placée au-delà de l'adressage 24 bits.
    #[error("function `{name}` starts at 0x{ip:X}, beyond 24-bit addressing")]
    FunctionOutOfRange {
        /// Fonction visée.
        name: String,
        /// Adresse de début.
        ip: u32,
    },

    /// Statique inconnue.
    #[error("unknown static `{0}`")]
    UnknownStatic(String),

    /// Statique déclarée deux fois.
    #[error("static `{0}` is already declared")]
    DuplicateStatic(String),

    /// Native inconnue (ni enregistrée, ni littéral hexadécimal).
    #[error("unknown native `{0}`")]
    UnknownNative(String),

    /// Table des natives pleine.
    #[error("native table is full ({0} entries)")]
    NativeTableFull(usize),

    /// Pseudo-instruction impossible à développer.
    #[error("{op}: {reason}")]
    Expansion {
        /// Pseudo-instruction fautive.
        op: HighLevelOp,
        /// Raison lisible.
        reason: String,
    },
}

/// Alias résultat de l'assembleur.
pub type CodeGenResult<T> = core::result::Result<T, CodeGenError>;

impl CodeGenError {
    pub(crate) fn expansion(op: HighLevelOp, reason: impl Into<String>) -> Self {
        Self::Expansion { op, reason: reason.into() }
    }
}
