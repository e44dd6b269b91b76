/// Errors that can occur while encoding or decoding values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The decoder saw a type tag outside the closed set.
    #[error("unsupported value type tag {0}")]
    UnsupportedType(i32),

    /// A payload does not match the element count its dims declare.
    #[error("shape mismatch: dims declare {expected} elements, payload holds {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// A declared size does not fit in memory on this platform.
    #[error("declared length overflows addressable memory")]
    LengthOverflow,

    /// The header declares more dimensions than the decoder accepts.
    #[error("rank {rank} exceeds maximum {max}")]
    RankTooLarge { rank: u64, max: usize },

    /// Nested cells/structs exceed the configured depth.
    #[error("value nesting exceeds maximum depth {0}")]
    DepthExceeded(usize),

    /// A text element or field name is not valid UTF-8.
    #[error("invalid UTF-8 in {context}")]
    InvalidUtf8 { context: &'static str },

    /// Bytes remained after decoding a value from a complete buffer.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    /// An I/O error occurred while reading or writing the stream.
    #[error("codec I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Whether the failure came from the underlying stream rather than the data.
    pub fn is_io(&self) -> bool {
        matches!(self, CodecError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
