//! Server responses.

use std::collections::HashMap;

use super::signature;
use crate::bolt::packstream::{PackStreamError, PackStreamStructure, PackStreamValue};

/// Every response a server can send.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success(Success),
    Record(Vec<PackStreamValue>),
    /// The server skipped the request because it is in a failed state.
    Ignored,
    Failure(Failure),
}

impl Response {
    pub fn name(&self) -> &'static str {
        match self {
            Response::Success(_) => "SUCCESS",
            Response::Record(_) => "RECORD",
            Response::Ignored => "IGNORED",
            Response::Failure(_) => "FAILURE",
        }
    }

    /// SUCCESS, IGNORED and FAILURE close a request; RECORD does not.
    pub fn is_summary(&self) -> bool {
        !matches!(self, Response::Record(_))
    }

    pub fn to_structure(&self) -> PackStreamStructure {
        match self {
            Response::Success(s) => PackStreamStructure::new(
                signature::SUCCESS,
                vec![PackStreamValue::Map(s.metadata.clone())],
            ),
            Response::Record(values) => PackStreamStructure::new(
                signature::RECORD,
                vec![PackStreamValue::List(values.clone())],
            ),
            Response::Ignored => PackStreamStructure::empty(signature::IGNORED),
            Response::Failure(f) => {
                let mut meta = HashMap::new();
                meta.insert("code".to_string(), PackStreamValue::String(f.code.clone()));
                meta.insert("message".to_string(), PackStreamValue::String(f.message.clone()));
                PackStreamStructure::new(signature::FAILURE, vec![PackStreamValue::Map(meta)])
            }
        }
    }

    pub fn from_structure(s: PackStreamStructure) -> Result<Self, PackStreamError> {
        match s.tag {
            signature::SUCCESS => {
                s.expect_fields("SUCCESS", 0, 1)?;
                let metadata = s.field(0).as_map().cloned().unwrap_or_default();
                Ok(Response::Success(Success { metadata }))
            }
            signature::RECORD => {
                s.expect_fields("RECORD", 1, 1)?;
                match s.fields.into_iter().next() {
                    Some(PackStreamValue::List(values)) => Ok(Response::Record(values)),
                    _ => Err(PackStreamError::InvalidStructure(
                        "RECORD field must be a list".into(),
                    )),
                }
            }
            signature::IGNORED => Ok(Response::Ignored),
            signature::FAILURE => {
                s.expect_fields("FAILURE", 1, 1)?;
                let meta = s.map_field(0, "FAILURE")?;
                let text = |key: &str| {
                    meta.get(key)
                        .and_then(PackStreamValue::as_str)
                        .unwrap_or_default()
                        .to_owned()
                };
                Ok(Response::Failure(Failure { code: text("code"), message: text("message") }))
            }
            other => Err(PackStreamError::InvalidStructure(format!(
                "unknown response signature 0x{:02X}",
                other
            ))),
        }
    }
}

/// SUCCESS metadata with typed accessors for the keys the engine reads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Success {
    pub metadata: HashMap<String, PackStreamValue>,
}

impl Success {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for servers and tests.
    pub fn with(mut self, key: &str, value: impl Into<PackStreamValue>) -> Self {
        self.metadata.insert(key.to_owned(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&PackStreamValue> {
        self.metadata.get(key)
    }

    fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PackStreamValue::as_str)
    }

    fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(PackStreamValue::as_int)
    }

    /// Field names declared by RUN.
    pub fn fields(&self) -> Option<Vec<String>> {
        self.get("fields").map(PackStreamValue::to_string_list)
    }

    pub fn qid(&self) -> Option<i64> {
        self.int("qid")
    }

    pub fn has_more(&self) -> bool {
        self.get("has_more").and_then(PackStreamValue::as_bool).unwrap_or(false)
    }

    pub fn bookmark(&self) -> Option<&str> {
        self.str("bookmark").filter(|b| !b.is_empty())
    }

    pub fn database(&self) -> Option<&str> {
        self.str("db")
    }

    /// `r`, `w`, `rw` or `s`.
    pub fn query_type(&self) -> Option<&str> {
        self.str("type")
    }

    pub fn stats(&self) -> Option<&HashMap<String, PackStreamValue>> {
        self.get("stats").and_then(PackStreamValue::as_map)
    }

    pub fn server(&self) -> Option<&str> {
        self.str("server")
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.str("connection_id")
    }

    /// Milliseconds until the first record was available.
    pub fn t_first(&self) -> Option<i64> {
        self.int("t_first")
    }

    /// Milliseconds until the last record was consumed.
    pub fn t_last(&self) -> Option<i64> {
        self.int("t_last")
    }
}

/// FAILURE code and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub code: String,
    pub message: String,
}

impl Failure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}
