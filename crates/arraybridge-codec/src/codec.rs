use std::io::{Cursor, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{CodecError, Result};
use crate::tag::{NumericClass, TypeTag, DIAGNOSTIC_TAG};
use crate::value::{element_count, ArrayValue, DiagnosticFrame, Reply};

/// Fixed header prefix: type tag (4) + rank (8). Dims follow, 8 bytes each.
pub const HEADER_PREFIX_SIZE: usize = 12;

/// Default maximum nesting depth for cells and structs.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Default maximum rank accepted by the decoder.
pub const DEFAULT_MAX_RANK: usize = 64;

/// Payloads are read in steps of at most this many bytes, so a declared
/// length only costs memory once the bytes have actually arrived.
const READ_STEP: usize = 64 * 1024;

/// Decoder limits.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Maximum cell/struct nesting depth.
    pub max_depth: usize,
    /// Maximum number of dimensions in one header.
    pub max_rank: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_rank: DEFAULT_MAX_RANK,
        }
    }
}

/// A decoded value header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub type_tag: i32,
    pub dims: Vec<u64>,
}

/// Encode a header into `dst`.
///
/// Wire format (native-endian, no padding):
/// ```text
/// ┌──────────────┬────────────┬──────────────────────┐
/// │ type_tag i32 │ rank u64   │ dims u64 × rank      │
/// └──────────────┴────────────┴──────────────────────┘
/// ```
pub fn encode_header(type_tag: i32, dims: &[u64], dst: &mut BytesMut) {
    dst.reserve(HEADER_PREFIX_SIZE + dims.len() * 8);
    dst.put_i32_ne(type_tag);
    dst.put_u64_ne(dims.len() as u64);
    for dim in dims {
        dst.put_u64_ne(*dim);
    }
}

/// Encode one value, recursively, into `dst`.
///
/// The value's shape is validated first so a malformed value never leaves a
/// half-written frame on the stream.
pub fn encode_value<W: Write>(value: &ArrayValue, dst: &mut W) -> Result<()> {
    value.validate()?;
    let mut scratch = BytesMut::with_capacity(256);
    write_value(value, dst, &mut scratch)
}

/// Encode a diagnostic frame into `dst`.
pub fn encode_diagnostic<W: Write>(frame: &DiagnosticFrame, dst: &mut W) -> Result<()> {
    let count = element_count(&frame.dims)?;
    if count != frame.lines.len() {
        return Err(CodecError::ShapeMismatch {
            expected: count,
            actual: frame.lines.len(),
        });
    }
    let mut scratch = BytesMut::with_capacity(64);
    encode_header(DIAGNOSTIC_TAG, &frame.dims, &mut scratch);
    scratch.put_u8(frame.stream);
    dst.write_all(&scratch)?;
    for line in &frame.lines {
        write_string(line, dst, &mut scratch)?;
    }
    Ok(())
}

fn write_value<W: Write>(value: &ArrayValue, dst: &mut W, scratch: &mut BytesMut) -> Result<()> {
    scratch.clear();
    encode_header(value.type_tag().raw(), value.dims(), scratch);
    dst.write_all(scratch)?;

    match value {
        ArrayValue::Numeric { data, .. } => {
            dst.write_all(data)?;
        }
        ArrayValue::Text { elements, .. } => {
            for element in elements {
                write_string(element, dst, scratch)?;
            }
        }
        ArrayValue::Cell { elements, .. } => {
            for element in elements {
                write_value(element, dst, scratch)?;
            }
        }
        ArrayValue::Struct {
            fields, elements, ..
        } => {
            scratch.clear();
            scratch.put_u64_ne(fields.len() as u64);
            dst.write_all(scratch)?;
            for name in fields {
                write_string(name, dst, scratch)?;
            }
            for element in elements {
                for field_value in element {
                    write_value(field_value, dst, scratch)?;
                }
            }
        }
    }
    Ok(())
}

fn write_string<W: Write>(value: &str, dst: &mut W, scratch: &mut BytesMut) -> Result<()> {
    scratch.clear();
    scratch.put_u64_ne(value.len() as u64);
    dst.write_all(scratch)?;
    dst.write_all(value.as_bytes())?;
    Ok(())
}

/// Encode a value into a standalone buffer.
pub fn to_bytes(value: &ArrayValue) -> Result<Bytes> {
    let mut out = Vec::new();
    encode_value(value, &mut out)?;
    Ok(Bytes::from(out))
}

/// Decode exactly one value from a complete buffer.
pub fn from_slice(src: &[u8]) -> Result<ArrayValue> {
    let mut cursor = Cursor::new(src);
    let value = decode_value(&mut cursor, &CodecConfig::default())?;
    let consumed = usize::try_from(cursor.position()).map_err(|_| CodecError::LengthOverflow)?;
    if consumed != src.len() {
        return Err(CodecError::TrailingBytes(src.len() - consumed));
    }
    Ok(value)
}

/// Read one header.
pub fn decode_header<R: Read>(src: &mut R, config: &CodecConfig) -> Result<Header> {
    let type_tag = read_i32(src)?;
    let rank = read_u64(src)?;
    let rank_len = usize::try_from(rank)
        .ok()
        .filter(|r| *r <= config.max_rank)
        .ok_or(CodecError::RankTooLarge {
            rank,
            max: config.max_rank,
        })?;

    let mut raw = vec![0u8; rank_len * 8];
    src.read_exact(&mut raw)?;
    let dims = raw
        .chunks_exact(8)
        .map(|chunk| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            u64::from_ne_bytes(bytes)
        })
        .collect();

    Ok(Header { type_tag, dims })
}

/// Decode one value. The diagnostic tag is not accepted here.
pub fn decode_value<R: Read>(src: &mut R, config: &CodecConfig) -> Result<ArrayValue> {
    decode_nested(src, config, 0)
}

/// Decode one top-level reply: a value or a diagnostic frame.
pub fn decode_reply<R: Read>(src: &mut R, config: &CodecConfig) -> Result<Reply> {
    let header = decode_header(src, config)?;
    if header.type_tag == DIAGNOSTIC_TAG {
        let stream = read_u8(src)?;
        let lines = read_strings(src, &header.dims, "diagnostic text")?;
        trace!(stream, lines = lines.len(), "decoded diagnostic frame");
        return Ok(Reply::Diagnostic(DiagnosticFrame {
            stream,
            dims: header.dims,
            lines,
        }));
    }
    decode_body(src, config, header, 0).map(Reply::Value)
}

fn decode_nested<R: Read>(src: &mut R, config: &CodecConfig, depth: usize) -> Result<ArrayValue> {
    if depth > config.max_depth {
        return Err(CodecError::DepthExceeded(config.max_depth));
    }
    let header = decode_header(src, config)?;
    decode_body(src, config, header, depth)
}

fn decode_body<R: Read>(
    src: &mut R,
    config: &CodecConfig,
    header: Header,
    depth: usize,
) -> Result<ArrayValue> {
    let tag = TypeTag::from_raw(header.type_tag)
        .ok_or(CodecError::UnsupportedType(header.type_tag))?;
    let count = element_count(&header.dims)?;
    let dims = header.dims;

    match tag {
        TypeTag::Numeric(class) => read_numeric(src, class, dims, count),
        TypeTag::String => {
            let elements = read_strings(src, &dims, "string element")?;
            Ok(ArrayValue::Text { dims, elements })
        }
        TypeTag::Cell => {
            let mut elements = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                elements.push(decode_nested(src, config, depth + 1)?);
            }
            Ok(ArrayValue::Cell { dims, elements })
        }
        TypeTag::Struct => {
            let nfields = read_len(src)?;
            let mut fields = Vec::with_capacity(nfields.min(4096));
            for _ in 0..nfields {
                fields.push(read_string(src, "field name")?);
            }
            let mut elements = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                let mut element = Vec::with_capacity(fields.len());
                for _ in 0..fields.len() {
                    element.push(decode_nested(src, config, depth + 1)?);
                }
                elements.push(element);
            }
            Ok(ArrayValue::Struct {
                dims,
                fields,
                elements,
            })
        }
    }
}

fn read_numeric<R: Read>(
    src: &mut R,
    class: NumericClass,
    dims: Vec<u64>,
    count: usize,
) -> Result<ArrayValue> {
    let len = count
        .checked_mul(class.element_size())
        .ok_or(CodecError::LengthOverflow)?;
    let data = read_payload(src, len)?;
    Ok(ArrayValue::Numeric {
        class,
        dims,
        data: Bytes::from(data),
    })
}

fn read_strings<R: Read>(src: &mut R, dims: &[u64], context: &'static str) -> Result<Vec<String>> {
    let count = element_count(dims)?;
    let mut out = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        out.push(read_string(src, context)?);
    }
    Ok(out)
}

fn read_string<R: Read>(src: &mut R, context: &'static str) -> Result<String> {
    let len = read_len(src)?;
    let raw = read_payload(src, len)?;
    String::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8 { context })
}

fn read_payload<R: Read>(src: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(len.min(READ_STEP));
    let mut step = [0u8; READ_STEP];
    while out.len() < len {
        let want = (len - out.len()).min(READ_STEP);
        src.read_exact(&mut step[..want])?;
        out.extend_from_slice(&step[..want]);
    }
    Ok(out)
}

fn read_len<R: Read>(src: &mut R) -> Result<usize> {
    usize::try_from(read_u64(src)?).map_err(|_| CodecError::LengthOverflow)
}

fn read_u8<R: Read>(src: &mut R) -> Result<u8> {
    let mut raw = [0u8; 1];
    src.read_exact(&mut raw)?;
    Ok(raw[0])
}

fn read_i32<R: Read>(src: &mut R) -> Result<i32> {
    let mut raw = [0u8; 4];
    src.read_exact(&mut raw)?;
    Ok(i32::from_ne_bytes(raw))
}

fn read_u64<R: Read>(src: &mut R) -> Result<u64> {
    let mut raw = [0u8; 8];
    src.read_exact(&mut raw)?;
    Ok(u64::from_ne_bytes(raw))
}
