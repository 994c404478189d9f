//! Function declarations handed to the assembler by the front end.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::types::{ScalarValue, TypeDef};

/// Slots every non-naked frame reserves between arguments and locals
/// (return address and frame marker).
pub const FRAME_HEADER_SIZE: u32 = 2;

/// Argument or local variable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VarDef {
    /// Variable name.
    pub name: String,
    /// Variable type.
    #[cfg_attr(feature = "serde", serde(rename = "type", default = "scalar"))]
    pub ty: TypeDef,
    /// Initial value, scalar locals only.
    #[cfg_attr(feature = "serde", serde(default))]
    pub initial: Option<ScalarValue>,
}

#[cfg(feature = "serde")]
const fn scalar() -> TypeDef { TypeDef::Scalar }

impl VarDef {
    /// Variable without initializer.
    pub fn new(name: impl Into<String>, ty: TypeDef) -> Self { Self { name: name.into(), ty, initial: None } }
}

/// A function as declared by the front end.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FunctionDef {
    /// Unique name within the unit.
    pub name: String,
    /// Arguments, in order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub args: Vec<VarDef>,
    /// Locals, in order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub locals: Vec<VarDef>,
    /// Return type, if any.
    #[cfg_attr(feature = "serde", serde(default))]
    pub return_type: Option<TypeDef>,
    /// Emit no prologue/epilogue.
    #[cfg_attr(feature = "serde", serde(default))]
    pub naked: bool,
}

impl FunctionDef {
    /// Function with no arguments, locals or return value.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), args: Vec::new(), locals: Vec::new(), return_type: None, naked: false }
    }

    /// Appends an argument.
    #[must_use]
    pub fn with_arg(mut self, name: impl Into<String>, ty: TypeDef) -> Self {
        self.args.push(VarDef::new(name, ty));
        self
    }

    /// Appends a local.
    #[must_use]
    pub fn with_local(mut self, name: impl Into<String>, ty: TypeDef) -> Self {
        self.locals.push(VarDef::new(name, ty));
        self
    }

    /// Appends a scalar local with an initial value.
    #[must_use]
    pub fn with_local_init(mut self, name: impl Into<String>, value: ScalarValue) -> Self {
        self.locals.push(VarDef { name: name.into(), ty: TypeDef::Scalar, initial: Some(value) });
        self
    }

    /// Sets the return type.
    #[must_use]
    pub fn returning(mut self, ty: TypeDef) -> Self {
        self.return_type = Some(ty);
        self
    }

    /// Marks the function naked.
    #[must_use]
    pub const fn naked(mut self) -> Self {
        self.naked = true;
        self
    }

    /// Total argument slots.
    pub fn args_size(&self) -> u32 { self.args.iter().map(|a| a.ty.size()).sum() }

    /// Total local slots, frame header excluded.
    pub fn locals_size(&self) -> u32 { self.locals.iter().map(|l| l.ty.size()).sum() }

    /// Frame size declared by `ENTER`: arguments, header and locals.
    pub fn frame_size(&self) -> u32 { self.args_size() + FRAME_HEADER_SIZE + self.locals_size() }

    /// Returned slots.
    pub fn return_size(&self) -> u32 { self.return_type.as_ref().map_or(0, TypeDef::size) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn frame_accounting() {
        let f = FunctionDef::new("f")
            .with_arg("a", TypeDef::Scalar)
            .with_arg("b", TypeDef::array(TypeDef::Scalar, 3))
            .with_local("x", TypeDef::Scalar)
            .returning(TypeDef::array(TypeDef::Scalar, 1));
        assert_eq!(f.args_size(), 5);
        assert_eq!(f.locals_size(), 1);
        assert_eq!(f.frame_size(), 8);
        assert_eq!(f.return_size(), 2);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_defaults() {
        let f: FunctionDef = serde_json::from_str(r#"{"name":"main","locals":[{"name":"i"}]}"#).unwrap();
        assert_eq!(f, FunctionDef::new("main").with_local("i", TypeDef::Scalar));
    }
}
