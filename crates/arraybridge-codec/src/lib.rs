//! Self-describing binary encoding of typed, possibly nested, arrays.
//!
//! Every value on the wire starts with a header:
//! - A 4-byte type tag from a closed set (numeric classes, string, cell, struct)
//! - An 8-byte rank followed by one 8-byte extent per dimension
//!
//! All integers are native-endian. Fixed-width payloads are written as one
//! contiguous run; strings, cells and structs recurse element by element.
//! Tag [`DIAGNOSTIC_TAG`] marks a top-level console-output frame and is only
//! accepted by [`decode_reply`].

pub mod codec;
pub mod element;
pub mod error;
pub mod tag;
pub mod value;

pub use codec::{
    decode_header, decode_reply, decode_value, encode_diagnostic, encode_header, encode_value,
    from_slice, to_bytes, CodecConfig, Header, DEFAULT_MAX_DEPTH, DEFAULT_MAX_RANK,
    HEADER_PREFIX_SIZE,
};
pub use element::{Complex, Element};
pub use error::{CodecError, Result};
pub use tag::{NumericClass, TypeTag, DIAGNOSTIC_TAG};
pub use value::{element_count, ArrayValue, DiagnosticFrame, Reply, STREAM_STDERR, STREAM_STDOUT};
