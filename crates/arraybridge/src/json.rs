//! JSON view of array values for the command line.
//!
//! Parsing builds 1×1 scalars, 1×N cells, and 1×1 structs. Rendering is lossy
//! the other way: numeric arrays flatten to their element order and a single
//! element collapses to a bare JSON scalar.

use arraybridge_codec::{ArrayValue, Complex, Element, NumericClass};
use serde_json::{Map, Value};

/// Build a request value from parsed JSON.
pub fn to_array(json: &Value) -> ArrayValue {
    match json {
        Value::Null => ArrayValue::empty(),
        Value::Bool(flag) => ArrayValue::scalar(*flag),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                ArrayValue::scalar(int)
            } else if let Some(uint) = number.as_u64() {
                ArrayValue::scalar(uint)
            } else {
                ArrayValue::scalar(number.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(text) => ArrayValue::string(text.as_str()),
        Value::Array(items) => ArrayValue::cell_row(items.iter().map(to_array).collect()),
        Value::Object(fields) => {
            ArrayValue::record(fields.iter().map(|(name, value)| (name.as_str(), to_array(value))))
        }
    }
}

/// Render a reply value as JSON.
pub fn from_array(value: &ArrayValue) -> Value {
    match value {
        ArrayValue::Numeric { class, .. } => collapse(numeric_elements(*class, value), true),
        ArrayValue::Text { elements, .. } => collapse(
            elements.iter().cloned().map(Value::String).collect(),
            false,
        ),
        ArrayValue::Cell { elements, .. } => {
            Value::Array(elements.iter().map(from_array).collect())
        }
        ArrayValue::Struct {
            fields, elements, ..
        } => {
            let records: Vec<Value> = elements
                .iter()
                .map(|element| {
                    let object: Map<String, Value> = fields
                        .iter()
                        .cloned()
                        .zip(element.iter().map(from_array))
                        .collect();
                    Value::Object(object)
                })
                .collect();
            collapse(records, false)
        }
    }
}

fn collapse(mut items: Vec<Value>, empty_is_null: bool) -> Value {
    match items.len() {
        0 if empty_is_null => Value::Null,
        1 => items.pop().unwrap_or(Value::Null),
        _ => Value::Array(items),
    }
}

fn real<T>(value: &ArrayValue) -> Vec<Value>
where
    T: Element + Into<Value>,
{
    value
        .to_vec::<T>()
        .unwrap_or_default()
        .into_iter()
        .map(Into::into)
        .collect()
}

fn complex<T>(value: &ArrayValue) -> Vec<Value>
where
    T: Copy + Into<Value>,
    Complex<T>: Element,
{
    value
        .to_vec::<Complex<T>>()
        .unwrap_or_default()
        .into_iter()
        .map(|c| {
            let mut object = Map::new();
            object.insert("re".to_string(), c.re.into());
            object.insert("im".to_string(), c.im.into());
            Value::Object(object)
        })
        .collect()
}

fn numeric_elements(class: NumericClass, value: &ArrayValue) -> Vec<Value> {
    match class {
        NumericClass::Logical => real::<bool>(value),
        NumericClass::Double => real::<f64>(value),
        NumericClass::Single => real::<f32>(value),
        NumericClass::Int8 => real::<i8>(value),
        NumericClass::UInt8 => real::<u8>(value),
        NumericClass::Int16 => real::<i16>(value),
        NumericClass::UInt16 => real::<u16>(value),
        NumericClass::Int32 => real::<i32>(value),
        NumericClass::UInt32 => real::<u32>(value),
        NumericClass::Int64 => real::<i64>(value),
        NumericClass::UInt64 => real::<u64>(value),
        NumericClass::ComplexDouble => complex::<f64>(value),
        NumericClass::ComplexSingle => complex::<f32>(value),
        NumericClass::ComplexInt8 => complex::<i8>(value),
        NumericClass::ComplexUInt8 => complex::<u8>(value),
        NumericClass::ComplexInt16 => complex::<i16>(value),
        NumericClass::ComplexUInt16 => complex::<u16>(value),
        NumericClass::ComplexInt32 => complex::<i32>(value),
        NumericClass::ComplexUInt32 => complex::<u32>(value),
        NumericClass::ComplexInt64 => complex::<i64>(value),
        NumericClass::ComplexUInt64 => complex::<u64>(value),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn scalars_map_to_host_classes() {
        assert_eq!(to_array(&json!(true)), ArrayValue::scalar(true));
        assert_eq!(to_array(&json!(-3)), ArrayValue::scalar(-3i64));
        assert_eq!(to_array(&json!(u64::MAX)), ArrayValue::scalar(u64::MAX));
        assert_eq!(to_array(&json!(2.5)), ArrayValue::scalar(2.5f64));
        assert_eq!(to_array(&json!("x")), ArrayValue::string("x"));
        assert_eq!(to_array(&json!(null)), ArrayValue::empty());
    }

    #[test]
    fn objects_become_records() {
        let value = to_array(&json!({"id": 42, "name": "x"}));
        match &value {
            ArrayValue::Struct { dims, fields, .. } => {
                assert_eq!(dims, &vec![1, 1]);
                assert_eq!(fields, &vec!["id".to_string(), "name".to_string()]);
            }
            other => panic!("expected struct, got {other:?}"),
        }
        assert_eq!(value.field("id").and_then(|v| v.as_scalar::<i64>()), Some(42));
    }

    #[test]
    fn arrays_become_cell_rows() {
        let value = to_array(&json!([1, "two", [3.5]]));
        assert_eq!(value.dims(), &[1, 3]);
        assert_eq!(from_array(&value), json!([1, "two", [3.5]]));
    }

    #[test]
    fn nested_request_renders_back() {
        let request = json!({"id": 42, "tags": ["a", "b"], "inner": {"ok": true}, "none": null});
        assert_eq!(from_array(&to_array(&request)), request);
    }

    #[test]
    fn numeric_rows_flatten() {
        assert_eq!(from_array(&ArrayValue::row(&[1u8, 2, 3])), json!([1, 2, 3]));
        assert_eq!(
            from_array(&ArrayValue::scalar(Complex::new(1.0f64, -2.0))),
            json!({"re": 1.0, "im": -2.0})
        );
    }

    #[test]
    fn struct_arrays_render_as_lists() {
        let value = ArrayValue::structure(
            vec![1, 2],
            vec!["n".to_string()],
            vec![vec![ArrayValue::scalar(1i32)], vec![ArrayValue::scalar(2i32)]],
        )
        .unwrap();
        assert_eq!(from_array(&value), json!([{"n": 1}, {"n": 2}]));
    }

    #[test]
    fn non_finite_doubles_render_as_null() {
        assert_eq!(from_array(&ArrayValue::scalar(f64::NAN)), Value::Null);
    }
}
