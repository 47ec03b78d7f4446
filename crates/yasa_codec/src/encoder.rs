//! Frame encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Encode a value to a single wire frame.
///
/// The output is deterministic (map keys are sorted) and never contains a
/// line terminator, so the caller can append exactly one `\n` to delimit
/// the frame.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn encode_frame(value: &Value) -> CodecResult<String> {
    let frame =
        serde_json::to_string(value).map_err(|e| CodecError::encoding_failed(e.to_string()))?;

    // Compact JSON escapes control characters inside strings.
    if frame.contains('\n') {
        return Err(CodecError::EmbeddedNewline);
    }

    Ok(frame)
}

/// Encode a batch of records into the nested list format.
///
/// Each record is encoded to its own frame, and the list of frames is then
/// encoded again into a single text value. This is the shape the server
/// uses for the `CHANGES` field.
///
/// # Errors
///
/// Returns an error if any record fails to encode.
pub fn encode_list(records: &[Value]) -> CodecResult<Value> {
    let frames = records
        .iter()
        .map(|record| encode_frame(record).map(Value::Text))
        .collect::<CodecResult<Vec<_>>>()?;

    encode_frame(&Value::List(frames)).map(Value::Text)
}
