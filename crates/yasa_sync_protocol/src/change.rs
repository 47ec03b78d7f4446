//! Change records and identifiers.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use yasa_codec::Value;

/// Identity of a file as assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub u64);

impl ServerId {
    /// Returns the raw id.
    pub fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn to_value(self) -> ProtocolResult<Value> {
        i64::try_from(self.0)
            .map(Value::Integer)
            .map_err(|_| ProtocolError::invalid_field("ID", self.0))
    }

    pub(crate) fn from_value(value: &Value) -> ProtocolResult<Self> {
        value
            .to_u64()
            .map(ServerId)
            .ok_or_else(|| ProtocolError::invalid_field("ID", value))
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ServerId {
    fn from(id: u64) -> Self {
        ServerId(id)
    }
}

/// Milliseconds since the Unix epoch.
///
/// Used for the last-sync checkpoint (`SINCE`) and tombstone times.
/// The default, zero, means "never synced".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The epoch; requests every change the server has.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Returns the current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Timestamp(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Returns the raw millisecond count.
    pub fn as_millis(self) -> u64 {
        self.0
    }

    pub(crate) fn to_value(self) -> ProtocolResult<Value> {
        i64::try_from(self.0)
            .map(Value::Integer)
            .map_err(|_| ProtocolError::invalid_field("SINCE", self.0))
    }

    pub(crate) fn from_value(value: &Value) -> ProtocolResult<Self> {
        value
            .to_u64()
            .map(Timestamp)
            .ok_or_else(|| ProtocolError::invalid_field("SINCE", value))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of change announced by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    /// A file was added on the server.
    New,
    /// A file was removed on the server.
    Delete,
}

impl ChangeType {
    /// Wire name of the change type.
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::New => "NEW",
            ChangeType::Delete => "DELETE",
        }
    }

    /// Parses the wire name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "NEW" => Some(ChangeType::New),
            "DELETE" => Some(ChangeType::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single delta item in a pull reply.
///
/// Encoded as a map with keys `ID` and `type` (lowercase, as the server
/// sends it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Server identity of the affected file.
    pub id: ServerId,
    /// What happened to it.
    pub change: ChangeType,
}

impl ChangeRecord {
    /// Creates a NEW record.
    pub fn new_file(id: u64) -> Self {
        Self {
            id: ServerId(id),
            change: ChangeType::New,
        }
    }

    /// Creates a DELETE record.
    pub fn deleted(id: u64) -> Self {
        Self {
            id: ServerId(id),
            change: ChangeType::Delete,
        }
    }

    /// Encodes to a record value.
    pub fn to_value(&self) -> ProtocolResult<Value> {
        Ok(Value::map([
            ("ID", self.id.to_value()?),
            ("type", Value::from(self.change.as_str())),
        ]))
    }

    /// Decodes from a record value.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let id = value.get("ID").ok_or(ProtocolError::MissingField("ID"))?;
        let change = value
            .get("type")
            .ok_or(ProtocolError::MissingField("type"))?;

        let change = change
            .as_text()
            .and_then(ChangeType::parse)
            .ok_or_else(|| ProtocolError::invalid_field("type", change))?;

        Ok(Self {
            id: ServerId::from_value(id)?,
            change,
        })
    }
}
