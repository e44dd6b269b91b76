use bytes::{Bytes, BytesMut};

use crate::element::Element;
use crate::error::{CodecError, Result};
use crate::tag::{NumericClass, TypeTag};

/// Diagnostic stream id for the worker's standard output.
pub const STREAM_STDOUT: u8 = 1;
/// Diagnostic stream id for the worker's standard error.
pub const STREAM_STDERR: u8 = 2;

/// One self-describing, possibly nested, typed array.
///
/// Elements are stored in the sender's element order (column-major for the
/// host). Every variant's element count equals the product of its dims; the
/// empty product of a rank-0 value is one element.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    /// Fixed-width elements in one contiguous native-endian buffer.
    Numeric {
        class: NumericClass,
        dims: Vec<u64>,
        data: Bytes,
    },
    /// One UTF-8 string per element.
    Text { dims: Vec<u64>, elements: Vec<String> },
    /// One nested value per element.
    Cell {
        dims: Vec<u64>,
        elements: Vec<ArrayValue>,
    },
    /// Shared field names; each element holds one value per field, in field order.
    Struct {
        dims: Vec<u64>,
        fields: Vec<String>,
        elements: Vec<Vec<ArrayValue>>,
    },
}

/// Number of elements declared by `dims`.
///
/// Any zero dimension makes the value empty, however large the others are.
pub fn element_count(dims: &[u64]) -> Result<usize> {
    if dims.contains(&0) {
        return Ok(0);
    }
    let count = dims
        .iter()
        .try_fold(1u64, |acc, dim| acc.checked_mul(*dim))
        .ok_or(CodecError::LengthOverflow)?;
    usize::try_from(count).map_err(|_| CodecError::LengthOverflow)
}

fn check_count(dims: &[u64], actual: usize) -> Result<()> {
    let expected = element_count(dims)?;
    if expected != actual {
        return Err(CodecError::ShapeMismatch { expected, actual });
    }
    Ok(())
}

impl ArrayValue {
    /// Build a fixed-width array from raw native-endian bytes.
    pub fn numeric(class: NumericClass, dims: Vec<u64>, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let size = class.element_size();
        if data.len() % size != 0 {
            return Err(CodecError::ShapeMismatch {
                expected: element_count(&dims)?,
                actual: data.len() / size,
            });
        }
        check_count(&dims, data.len() / size)?;
        Ok(ArrayValue::Numeric { class, dims, data })
    }

    /// Build a fixed-width array from typed elements.
    pub fn from_elements<T: Element>(dims: Vec<u64>, elements: &[T]) -> Result<Self> {
        check_count(&dims, elements.len())?;
        let mut buf = BytesMut::with_capacity(elements.len() * T::CLASS.element_size());
        for element in elements {
            element.put(&mut buf);
        }
        Ok(ArrayValue::Numeric {
            class: T::CLASS,
            dims,
            data: buf.freeze(),
        })
    }

    /// A 1×1 fixed-width scalar.
    pub fn scalar<T: Element>(value: T) -> Self {
        let mut buf = BytesMut::with_capacity(T::CLASS.element_size());
        value.put(&mut buf);
        ArrayValue::Numeric {
            class: T::CLASS,
            dims: vec![1, 1],
            data: buf.freeze(),
        }
    }

    /// A 1×N fixed-width row vector.
    pub fn row<T: Element>(elements: &[T]) -> Self {
        let mut buf = BytesMut::with_capacity(elements.len() * T::CLASS.element_size());
        for element in elements {
            element.put(&mut buf);
        }
        ArrayValue::Numeric {
            class: T::CLASS,
            dims: vec![1, elements.len() as u64],
            data: buf.freeze(),
        }
    }

    /// An empty 0×0 double array.
    pub fn empty() -> Self {
        ArrayValue::Numeric {
            class: NumericClass::Double,
            dims: vec![0, 0],
            data: Bytes::new(),
        }
    }

    /// A string array with explicit dims.
    pub fn text(dims: Vec<u64>, elements: Vec<String>) -> Result<Self> {
        check_count(&dims, elements.len())?;
        Ok(ArrayValue::Text { dims, elements })
    }

    /// A 1×1 string.
    pub fn string(value: impl Into<String>) -> Self {
        ArrayValue::Text {
            dims: vec![1, 1],
            elements: vec![value.into()],
        }
    }

    /// A cell array with explicit dims.
    pub fn cell(dims: Vec<u64>, elements: Vec<ArrayValue>) -> Result<Self> {
        check_count(&dims, elements.len())?;
        Ok(ArrayValue::Cell { dims, elements })
    }

    /// A 1×N cell row.
    pub fn cell_row(elements: Vec<ArrayValue>) -> Self {
        ArrayValue::Cell {
            dims: vec![1, elements.len() as u64],
            elements,
        }
    }

    /// A struct array with explicit dims. Each element must hold one value per field.
    pub fn structure(
        dims: Vec<u64>,
        fields: Vec<String>,
        elements: Vec<Vec<ArrayValue>>,
    ) -> Result<Self> {
        check_count(&dims, elements.len())?;
        if let Some(bad) = elements.iter().find(|e| e.len() != fields.len()) {
            return Err(CodecError::ShapeMismatch {
                expected: fields.len(),
                actual: bad.len(),
            });
        }
        Ok(ArrayValue::Struct {
            dims,
            fields,
            elements,
        })
    }

    /// A 1×1 struct from ordered `(name, value)` pairs.
    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, ArrayValue)>,
        S: Into<String>,
    {
        let (names, values): (Vec<String>, Vec<ArrayValue>) = fields
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .unzip();
        ArrayValue::Struct {
            dims: vec![1, 1],
            fields: names,
            elements: vec![values],
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            ArrayValue::Numeric { class, .. } => TypeTag::Numeric(*class),
            ArrayValue::Text { .. } => TypeTag::String,
            ArrayValue::Cell { .. } => TypeTag::Cell,
            ArrayValue::Struct { .. } => TypeTag::Struct,
        }
    }

    pub fn dims(&self) -> &[u64] {
        match self {
            ArrayValue::Numeric { dims, .. }
            | ArrayValue::Text { dims, .. }
            | ArrayValue::Cell { dims, .. }
            | ArrayValue::Struct { dims, .. } => dims,
        }
    }

    /// Number of elements actually held.
    pub fn len(&self) -> usize {
        match self {
            ArrayValue::Numeric { class, data, .. } => data.len() / class.element_size(),
            ArrayValue::Text { elements, .. } => elements.len(),
            ArrayValue::Cell { elements, .. } => elements.len(),
            ArrayValue::Struct { elements, .. } => elements.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that every level of the value holds as many elements as its dims declare.
    pub fn validate(&self) -> Result<()> {
        match self {
            ArrayValue::Numeric { class, dims, data } => {
                if data.len() % class.element_size() != 0 {
                    return Err(CodecError::ShapeMismatch {
                        expected: element_count(dims)?,
                        actual: data.len() / class.element_size(),
                    });
                }
                check_count(dims, self.len())
            }
            ArrayValue::Text { dims, elements } => check_count(dims, elements.len()),
            ArrayValue::Cell { dims, elements } => {
                check_count(dims, elements.len())?;
                elements.iter().try_for_each(ArrayValue::validate)
            }
            ArrayValue::Struct {
                dims,
                fields,
                elements,
            } => {
                check_count(dims, elements.len())?;
                for element in elements {
                    check_count(&[fields.len() as u64], element.len())?;
                    element.iter().try_for_each(ArrayValue::validate)?;
                }
                Ok(())
            }
        }
    }

    /// Typed copy of a fixed-width payload, if the class matches `T`.
    pub fn to_vec<T: Element>(&self) -> Option<Vec<T>> {
        match self {
            ArrayValue::Numeric { class, data, .. } if *class == T::CLASS => Some(
                data.chunks_exact(class.element_size())
                    .map(T::get)
                    .collect(),
            ),
            _ => None,
        }
    }

    /// The single element of a one-element fixed-width array.
    pub fn as_scalar<T: Element>(&self) -> Option<T> {
        match self.to_vec::<T>() {
            Some(values) if values.len() == 1 => values.into_iter().next(),
            _ => None,
        }
    }

    /// The single string of a one-element text array.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArrayValue::Text { elements, .. } if elements.len() == 1 => {
                elements.first().map(String::as_str)
            }
            _ => None,
        }
    }

    /// Field `name` of the first element of a struct array.
    pub fn field(&self, name: &str) -> Option<&ArrayValue> {
        match self {
            ArrayValue::Struct {
                fields, elements, ..
            } => {
                let index = fields.iter().position(|f| f == name)?;
                elements.first().and_then(|element| element.get(index))
            }
            _ => None,
        }
    }
}

/// Out-of-band console text from the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticFrame {
    /// Stream id ([`STREAM_STDOUT`], [`STREAM_STDERR`], or worker-defined).
    pub stream: u8,
    pub dims: Vec<u64>,
    pub lines: Vec<String>,
}

impl DiagnosticFrame {
    /// A single-line frame.
    pub fn new(stream: u8, text: impl Into<String>) -> Self {
        Self {
            stream,
            dims: vec![1, 1],
            lines: vec![text.into()],
        }
    }

    pub fn stream_name(&self) -> &'static str {
        match self.stream {
            STREAM_STDOUT => "stdout",
            STREAM_STDERR => "stderr",
            _ => "other",
        }
    }

    /// All lines joined with newlines.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// A top-level reply: either a value or a diagnostic frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Value(ArrayValue),
    Diagnostic(DiagnosticFrame),
}
