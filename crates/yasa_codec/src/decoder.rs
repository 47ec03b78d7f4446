//! Frame decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Maximum accepted length of a single frame, in bytes.
///
/// A change list for a large library fits comfortably; anything beyond
/// this is treated as a broken or hostile peer.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Decode a single frame (without its line terminator) into a value.
///
/// A trailing `\r` is tolerated for peers that write CRLF line endings.
///
/// # Errors
///
/// Returns an error if the frame is too long, contains a line terminator,
/// or is not a well-formed encoded value.
pub fn decode_frame(frame: &str) -> CodecResult<Value> {
    let frame = frame.strip_suffix('\r').unwrap_or(frame);

    if frame.len() > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLong {
            len: frame.len(),
            max: MAX_FRAME_LEN,
        });
    }
    if frame.contains('\n') {
        return Err(CodecError::EmbeddedNewline);
    }

    serde_json::from_str(frame).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

/// Decode the nested list format carried in a batch field.
///
/// The field is normally a text value holding an encoded list of encoded
/// records. Each element is decoded individually and returned in delivery
/// order. Elements that are already maps, and fields that are already
/// lists, are accepted as-is.
///
/// # Errors
///
/// Returns an error if the field or any element cannot be decoded.
pub fn decode_list(field: &Value) -> CodecResult<Vec<Value>> {
    let list = match field {
        Value::Text(encoded) => decode_frame(encoded)?,
        other => other.clone(),
    };

    let items = match list {
        Value::List(items) => items,
        other => {
            return Err(CodecError::invalid_structure(format!(
                "expected list, found {}",
                other.kind()
            )))
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Text(frame) => decode_frame(&frame),
            map @ Value::Map(_) => Ok(map),
            other => Err(CodecError::invalid_structure(format!(
                "expected encoded record, found {}",
                other.kind()
            ))),
        })
        .collect()
}
