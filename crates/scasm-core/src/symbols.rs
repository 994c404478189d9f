//! Function table exchanged between the assembler and the disassembler.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A label bound to an IP inside its function.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LabelInfo {
    /// Label name, unique within the function.
    pub name: String,
    /// Bound IP.
    pub ip: u32,
}

/// Address range and labels of one function.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FunctionInfo {
    /// Function name, unique within the unit.
    pub name: String,
    /// IP of the first byte.
    pub start: u32,
    /// IP one past the last byte.
    pub end: u32,
    /// Labels in forward address order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub labels: Vec<LabelInfo>,
}

impl FunctionInfo {
    /// New function without labels.
    pub fn new(name: impl Into<String>, start: u32, end: u32) -> Self {
        Self { name: name.into(), start, end, labels: Vec::new() }
    }

    /// Whether `ip` falls in `[start, end)`.
    pub const fn contains(&self, ip: u32) -> bool { self.start <= ip && ip < self.end }

    /// First label bound exactly to `ip`.
    pub fn label_at(&self, ip: u32) -> Option<&str> {
        self.labels.iter().find(|l| l.ip == ip).map(|l| l.name.as_str())
    }

    /// IP of the label `name`.
    pub fn label_ip(&self, name: &str) -> Option<u32> {
        self.labels.iter().find(|l| l.name == name).map(|l| l.ip)
    }

    /// Inserts a label keeping forward address order.
    ///
    /// A label added at an already-labelled IP goes after the existing ones,
    /// so first-match lookups keep returning the earlier name.
    pub fn insert_label(&mut self, name: impl Into<String>, ip: u32) {
        let at = self.labels.partition_point(|l| l.ip <= ip);
        self.labels.insert(at, LabelInfo { name: name.into(), ip });
    }
}
