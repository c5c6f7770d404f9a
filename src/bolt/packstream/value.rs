//! PackStream value model.

use std::collections::HashMap;

use super::PackStreamError;

/// A value as it travels on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Bytes(Vec<u8>),
    String(String),
    List(Vec<PackStreamValue>),
    Map(HashMap<String, PackStreamValue>),
    Structure(PackStreamStructure),
}

/// A tagged structure: one signature byte followed by a field list.
///
/// Bolt messages and graph/temporal/spatial values are all structures.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamStructure {
    pub tag: u8,
    pub fields: Vec<PackStreamValue>,
}

impl PackStreamStructure {
    pub fn new(tag: u8, fields: Vec<PackStreamValue>) -> Self {
        Self { tag, fields }
    }

    /// Structure without fields (GOODBYE, RESET, COMMIT, ...).
    pub fn empty(tag: u8) -> Self {
        Self::new(tag, Vec::new())
    }

    /// Fails unless the field count lies within `min..=max`.
    pub fn expect_fields(&self, what: &str, min: usize, max: usize) -> Result<(), PackStreamError> {
        let n = self.fields.len();
        if n < min || n > max {
            return Err(PackStreamError::InvalidStructure(format!(
                "{} expects {}..={} fields, got {}",
                what, min, max, n
            )));
        }
        Ok(())
    }

    /// Field `idx`, or `Null` when absent.
    pub fn field(&self, idx: usize) -> &PackStreamValue {
        self.fields.get(idx).unwrap_or(&PackStreamValue::Null)
    }

    pub fn int_field(&self, idx: usize, what: &str) -> Result<i64, PackStreamError> {
        self.field(idx)
            .as_int()
            .ok_or_else(|| Self::field_error(what, idx, "integer"))
    }

    pub fn float_field(&self, idx: usize, what: &str) -> Result<f64, PackStreamError> {
        self.field(idx)
            .as_float()
            .ok_or_else(|| Self::field_error(what, idx, "float"))
    }

    pub fn str_field(&self, idx: usize, what: &str) -> Result<&str, PackStreamError> {
        self.field(idx)
            .as_str()
            .ok_or_else(|| Self::field_error(what, idx, "string"))
    }

    pub fn map_field(
        &self,
        idx: usize,
        what: &str,
    ) -> Result<&HashMap<String, PackStreamValue>, PackStreamError> {
        self.field(idx)
            .as_map()
            .ok_or_else(|| Self::field_error(what, idx, "map"))
    }

    pub fn list_field(&self, idx: usize, what: &str) -> Result<&[PackStreamValue], PackStreamError> {
        self.field(idx)
            .as_list()
            .ok_or_else(|| Self::field_error(what, idx, "list"))
    }

    fn field_error(what: &str, idx: usize, expected: &str) -> PackStreamError {
        PackStreamError::InvalidStructure(format!("{} field {} must be a {}", what, idx, expected))
    }
}

impl PackStreamValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PackStreamValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PackStreamValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PackStreamValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, or integers widened to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PackStreamValue::Float(f) => Some(*f),
            PackStreamValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PackStreamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PackStreamValue]> {
        match self {
            PackStreamValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, PackStreamValue>> {
        match self {
            PackStreamValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_structure(&self) -> Option<&PackStreamStructure> {
        match self {
            PackStreamValue::Structure(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_structure(self) -> Option<PackStreamStructure> {
        match self {
            PackStreamValue::Structure(s) => Some(s),
            _ => None,
        }
    }

    /// List of strings, skipping anything that is not a string.
    pub fn to_string_list(&self) -> Vec<String> {
        self.as_list()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PackStreamValue::Null => "Null",
            PackStreamValue::Boolean(_) => "Boolean",
            PackStreamValue::Integer(_) => "Integer",
            PackStreamValue::Float(_) => "Float",
            PackStreamValue::Bytes(_) => "Bytes",
            PackStreamValue::String(_) => "String",
            PackStreamValue::List(_) => "List",
            PackStreamValue::Map(_) => "Map",
            PackStreamValue::Structure(_) => "Structure",
        }
    }
}

impl From<bool> for PackStreamValue {
    fn from(v: bool) -> Self {
        PackStreamValue::Boolean(v)
    }
}

impl From<i64> for PackStreamValue {
    fn from(v: i64) -> Self {
        PackStreamValue::Integer(v)
    }
}

impl From<i32> for PackStreamValue {
    fn from(v: i32) -> Self {
        PackStreamValue::Integer(v as i64)
    }
}

impl From<f64> for PackStreamValue {
    fn from(v: f64) -> Self {
        PackStreamValue::Float(v)
    }
}

impl From<&str> for PackStreamValue {
    fn from(v: &str) -> Self {
        PackStreamValue::String(v.to_owned())
    }
}

impl From<String> for PackStreamValue {
    fn from(v: String) -> Self {
        PackStreamValue::String(v)
    }
}

impl From<Vec<u8>> for PackStreamValue {
    fn from(v: Vec<u8>) -> Self {
        PackStreamValue::Bytes(v)
    }
}

impl From<Vec<String>> for PackStreamValue {
    fn from(v: Vec<String>) -> Self {
        PackStreamValue::List(v.into_iter().map(PackStreamValue::String).collect())
    }
}

impl From<HashMap<String, PackStreamValue>> for PackStreamValue {
    fn from(v: HashMap<String, PackStreamValue>) -> Self {
        PackStreamValue::Map(v)
    }
}

impl From<PackStreamStructure> for PackStreamValue {
    fn from(v: PackStreamStructure) -> Self {
        PackStreamValue::Structure(v)
    }
}

impl<T: Into<PackStreamValue>> From<Option<T>> for PackStreamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(PackStreamValue::Null, Into::into)
    }
}
