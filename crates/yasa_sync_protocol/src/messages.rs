//! Protocol messages for sync.
//!
//! On the wire every message is a loosely typed map. This module maps that
//! map onto a closed set of typed requests and replies, so the rest of the
//! client never performs open-ended key lookups.

use crate::change::{ChangeRecord, ServerId, Timestamp};
use crate::error::{ProtocolError, ProtocolResult};
use yasa_codec::{decode_frame, decode_list, encode_frame, encode_list, Value};

/// Key naming the requested action.
pub const KEY_ACTION: &str = "ACTION";
/// Key carrying a server id.
pub const KEY_ID: &str = "ID";
/// Key carrying the last-sync checkpoint.
pub const KEY_SINCE: &str = "SINCE";
/// Key naming the push type.
pub const KEY_TYPE: &str = "TYPE";
/// Key carrying the encoded change list.
pub const KEY_CHANGES: &str = "CHANGES";
/// Key a server may use to reject a request.
pub const KEY_ERROR: &str = "ERROR";

const ACTION_PULL: &str = "PULL";
const ACTION_PULL_FILE: &str = "PULL-FILE";
const ACTION_PUSH: &str = "PUSH";
const TYPE_NEW: &str = "NEW";
const TYPE_DELETE: &str = "DELETE";

/// A request sent from client to server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Ask for every change since the checkpoint.
    Pull {
        /// Last successful sync time.
        since: Timestamp,
    },
    /// Ask for the raw bytes of a file. A raw transfer follows.
    PullFile {
        /// File to fetch.
        id: ServerId,
    },
    /// Announce a new local file. The reply assigns its server id.
    PushNew,
    /// Announce a local deletion.
    PushDelete {
        /// File that was removed.
        id: ServerId,
    },
}

impl Request {
    /// Wire name of the action, for logging.
    pub fn action(&self) -> &'static str {
        match self {
            Request::Pull { .. } => ACTION_PULL,
            Request::PullFile { .. } => ACTION_PULL_FILE,
            Request::PushNew | Request::PushDelete { .. } => ACTION_PUSH,
        }
    }

    /// Converts to the wire map.
    pub fn to_value(&self) -> ProtocolResult<Value> {
        let action = (KEY_ACTION, Value::from(self.action()));
        let value = match self {
            Request::Pull { since } => Value::map([action, (KEY_SINCE, since.to_value()?)]),
            Request::PullFile { id } => Value::map([action, (KEY_ID, id.to_value()?)]),
            Request::PushNew => Value::map([action, (KEY_TYPE, Value::from(TYPE_NEW))]),
            Request::PushDelete { id } => Value::map([
                action,
                (KEY_TYPE, Value::from(TYPE_DELETE)),
                (KEY_ID, id.to_value()?),
            ]),
        };
        Ok(value)
    }

    /// Parses a wire map into a request.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let action = required_text(value, KEY_ACTION)?;

        match action {
            ACTION_PULL => {
                let since = value
                    .get(KEY_SINCE)
                    .map(Timestamp::from_value)
                    .transpose()?
                    .unwrap_or_default();
                Ok(Request::Pull { since })
            }
            ACTION_PULL_FILE => Ok(Request::PullFile {
                id: required_id(value)?,
            }),
            ACTION_PUSH => match required_text(value, KEY_TYPE)? {
                TYPE_NEW => Ok(Request::PushNew),
                TYPE_DELETE => Ok(Request::PushDelete {
                    id: required_id(value)?,
                }),
                other => Err(ProtocolError::invalid_field("TYPE", other)),
            },
            other => Err(ProtocolError::UnknownMessage(other.to_string())),
        }
    }

    /// Encodes to a single frame (without line terminator).
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(encode_frame(&self.to_value()?)?)
    }

    /// Decodes from a single frame.
    pub fn decode(frame: &str) -> ProtocolResult<Self> {
        Self::from_value(&decode_frame(frame)?)
    }

    /// Interprets the frame that answers this request.
    ///
    /// A `PULL` is answered by a change list and a `PUSH/NEW` by an id
    /// assignment. Any other request is answered by an acknowledgement whose
    /// body is not inspected. A frame carrying `ERROR` is a rejection.
    pub fn parse_reply(&self, value: &Value) -> ProtocolResult<Response> {
        if let Some(error) = value.get(KEY_ERROR) {
            let message = error
                .as_text()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{error:?}"));
            return Err(ProtocolError::ServerError(message));
        }

        match self {
            Request::Pull { .. } => {
                let field = value
                    .get(KEY_CHANGES)
                    .ok_or(ProtocolError::MissingField(KEY_CHANGES))?;
                let changes = decode_list(field)?
                    .iter()
                    .map(ChangeRecord::from_value)
                    .collect::<ProtocolResult<Vec<_>>>()?;
                Ok(Response::Changes(changes))
            }
            Request::PushNew => Ok(Response::Assigned {
                id: required_id(value)?,
            }),
            Request::PullFile { .. } | Request::PushDelete { .. } => Ok(Response::Ack),
        }
    }
}

/// A reply sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Ordered changes since the requested checkpoint.
    Changes(Vec<ChangeRecord>),
    /// Server id assigned to a newly announced file.
    Assigned {
        /// The fresh id.
        id: ServerId,
    },
    /// Bare acknowledgement.
    Ack,
}

impl Response {
    /// Converts to the wire map.
    pub fn to_value(&self) -> ProtocolResult<Value> {
        let value = match self {
            Response::Changes(changes) => {
                let records = changes
                    .iter()
                    .map(ChangeRecord::to_value)
                    .collect::<ProtocolResult<Vec<_>>>()?;
                Value::map([(KEY_CHANGES, encode_list(&records)?)])
            }
            Response::Assigned { id } => Value::map([(KEY_ID, id.to_value()?)]),
            Response::Ack => Value::map(Vec::<(String, Value)>::new()),
        };
        Ok(value)
    }

    /// Encodes to a single frame (without line terminator).
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(encode_frame(&self.to_value()?)?)
    }

    /// Returns the change list, or an error naming what arrived instead.
    pub fn into_changes(self) -> ProtocolResult<Vec<ChangeRecord>> {
        match self {
            Response::Changes(changes) => Ok(changes),
            other => Err(ProtocolError::UnknownMessage(format!(
                "expected change list, got {other:?}"
            ))),
        }
    }

    /// Returns the assigned id, or an error naming what arrived instead.
    pub fn into_assigned(self) -> ProtocolResult<ServerId> {
        match self {
            Response::Assigned { id } => Ok(id),
            other => Err(ProtocolError::UnknownMessage(format!(
                "expected id assignment, got {other:?}"
            ))),
        }
    }
}

fn required_text<'a>(value: &'a Value, key: &'static str) -> ProtocolResult<&'a str> {
    let field = value.get(key).ok_or(ProtocolError::MissingField(key))?;
    field
        .as_text()
        .ok_or_else(|| ProtocolError::invalid_field(key, field))
}

fn required_id(value: &Value) -> ProtocolResult<ServerId> {
    value
        .get(KEY_ID)
        .ok_or(ProtocolError::MissingField(KEY_ID))
        .and_then(ServerId::from_value)
}
