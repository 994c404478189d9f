//! Variable types as seen by the assembler: sizes in slots and initializers.

use scasm_core::Operand;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 32-bit constant used as the initial value of a scalar slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "ScalarLiteral", into = "ScalarLiteral"))]
pub struct ScalarValue(u32);

impl ScalarValue {
    /// Signed integer constant.
    pub const fn from_int(v: i32) -> Self { Self(v as u32) }
    /// Unsigned integer constant.
    pub const fn from_uint(v: u32) -> Self { Self(v) }
    /// Float constant.
    pub fn from_float(v: f32) -> Self { Self(v.to_bits()) }
    /// Raw bit pattern.
    pub const fn bits(self) -> u32 { self.0 }

    /// Non-zero bit pattern that reads as a normal float.
    pub fn is_float(self) -> bool { self.0 != 0 && f32::from_bits(self.0).is_normal() }

    /// Operand pushing this constant: a float when the pattern looks like one.
    pub fn to_operand(self) -> Operand {
        if self.is_float() {
            Operand::F32(f32::from_bits(self.0))
        } else {
            Operand::U32(self.0)
        }
    }
}

/// JSON-friendly spelling of a [`ScalarValue`].
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ScalarLiteral {
    Int(i64),
    Float(f32),
}

#[cfg(feature = "serde")]
impl TryFrom<ScalarLiteral> for ScalarValue {
    type Error = String;

    fn try_from(lit: ScalarLiteral) -> Result<Self, Self::Error> {
        match lit {
            ScalarLiteral::Int(v) => {
                if let Ok(v) = i32::try_from(v) {
                    Ok(Self::from_int(v))
                } else {
                    u32::try_from(v).map(Self::from_uint).map_err(|_| format!("{v} does not fit in 32 bits"))
                }
            }
            ScalarLiteral::Float(v) => Ok(Self::from_float(v)),
        }
    }
}

#[cfg(feature = "serde")]
impl From<ScalarValue> for ScalarLiteral {
    fn from(v: ScalarValue) -> Self {
        if v.is_float() {
            Self::Float(f32::from_bits(v.0))
        } else {
            Self::Int(i64::from(v.0 as i32))
        }
    }
}

/// Type of an argument, local or field.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TypeDef {
    /// One slot (int, float, bool, handle...).
    Scalar,
    /// Length-prefixed array.
    Array(ArrayType),
    /// Struct with precomputed field offsets.
    Struct(StructType),
}

impl TypeDef {
    /// Size in slots.
    pub fn size(&self) -> u32 {
        match self {
            Self::Scalar => 1,
            Self::Array(a) => a.size(),
            Self::Struct(s) => s.size(),
        }
    }

    /// Array of `length` items.
    pub fn array(item: Self, length: u32) -> Self { Self::Array(ArrayType::new(item, length)) }
}

/// Array type: one length slot followed by `length` items.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArrayType {
    item: Box<TypeDef>,
    length: u32,
}

impl ArrayType {
    /// New array type.
    pub fn new(item: TypeDef, length: u32) -> Self { Self { item: Box::new(item), length } }
    /// Item type.
    pub fn item(&self) -> &TypeDef { &self.item }
    /// Item count.
    pub const fn length(&self) -> u32 { self.length }
    /// Size in slots, length prefix included.
    pub fn size(&self) -> u32 { 1 + self.length * self.item.size() }
}

/// Struct field.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field type.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub ty: TypeDef,
    /// Initial value, scalar fields only.
    #[cfg_attr(feature = "serde", serde(default))]
    pub initial: Option<ScalarValue>,
}

impl FieldDef {
    /// Field without initializer.
    pub fn new(name: impl Into<String>, ty: TypeDef) -> Self { Self { name: name.into(), ty, initial: None } }

    /// Sets the initial value.
    #[must_use]
    pub const fn with_initial(mut self, value: ScalarValue) -> Self {
        self.initial = Some(value);
        self
    }
}

/// Struct type with field offsets computed at construction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "StructFields"))]
pub struct StructType {
    name: String,
    fields: Vec<FieldDef>,
    #[cfg_attr(feature = "serde", serde(skip))]
    offsets: Vec<u32>,
    #[cfg_attr(feature = "serde", serde(skip))]
    size: u32,
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct StructFields {
    name: String,
    fields: Vec<FieldDef>,
}

#[cfg(feature = "serde")]
impl From<StructFields> for StructType {
    fn from(raw: StructFields) -> Self { Self::new(raw.name, raw.fields) }
}

impl StructType {
    /// Lays out `fields` one after another.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut size = 0;
        for f in &fields {
            offsets.push(size);
            size += f.ty.size();
        }
        Self { name: name.into(), fields, offsets, size }
    }

    /// Struct name.
    pub fn name(&self) -> &str { &self.name }
    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDef] { &self.fields }
    /// Slot offset of each field.
    pub fn offsets(&self) -> &[u32] { &self.offsets }
    /// Size in slots.
    pub const fn size(&self) -> u32 { self.size }
}
