//! # YASA Codec
//!
//! Line-framed message encoding/decoding for the YASA sync protocol.
//!
//! Every message on the wire is one *frame*: a deterministic, single-line
//! encoding of a string-keyed [`Value::Map`], terminated by `\n`.
//!
//! ## Frame Rules
//!
//! - Map keys are sorted, so identical inputs produce identical frames
//! - A frame never contains a line terminator
//! - Values are text, integers, lists or maps; no floats, booleans or nulls
//! - Batches (the `CHANGES` field) are lists of individually encoded frames,
//!   themselves encoded into a single text value
//!
//! ## Usage
//!
//! ```
//! use yasa_codec::{decode_frame, encode_frame, Value};
//!
//! let value = Value::map([("ACTION", Value::from("PULL")), ("SINCE", Value::from(0))]);
//! let frame = encode_frame(&value).unwrap();
//! assert_eq!(decode_frame(&frame).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{decode_frame, decode_list, MAX_FRAME_LEN};
pub use encoder::{encode_frame, encode_list};
pub use error::{CodecError, CodecResult};
pub use value::Value;
