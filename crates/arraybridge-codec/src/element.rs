use bytes::{BufMut, BytesMut};

use crate::tag::NumericClass;

/// A complex element: real part followed by imaginary part on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

/// A Rust type with a fixed-width native-endian wire layout.
pub trait Element: Copy {
    const CLASS: NumericClass;

    /// Append the native-endian bytes of `self`.
    fn put(self, dst: &mut BytesMut);

    /// Read one element from exactly `Self::CLASS.element_size()` bytes.
    fn get(src: &[u8]) -> Self;
}

impl Element for bool {
    const CLASS: NumericClass = NumericClass::Logical;

    fn put(self, dst: &mut BytesMut) {
        dst.put_u8(u8::from(self));
    }

    fn get(src: &[u8]) -> Self {
        src[0] != 0
    }
}

macro_rules! numeric_element {
    ($ty:ty, $class:ident, $complex:ident) => {
        impl Element for $ty {
            const CLASS: NumericClass = NumericClass::$class;

            fn put(self, dst: &mut BytesMut) {
                dst.put_slice(&self.to_ne_bytes());
            }

            fn get(src: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(src);
                <$ty>::from_ne_bytes(raw)
            }
        }

        impl Element for Complex<$ty> {
            const CLASS: NumericClass = NumericClass::$complex;

            fn put(self, dst: &mut BytesMut) {
                self.re.put(dst);
                self.im.put(dst);
            }

            fn get(src: &[u8]) -> Self {
                let half = src.len() / 2;
                Complex {
                    re: <$ty>::get(&src[..half]),
                    im: <$ty>::get(&src[half..]),
                }
            }
        }
    };
}

numeric_element!(f64, Double, ComplexDouble);
numeric_element!(f32, Single, ComplexSingle);
numeric_element!(i8, Int8, ComplexInt8);
numeric_element!(u8, UInt8, ComplexUInt8);
numeric_element!(i16, Int16, ComplexInt16);
numeric_element!(u16, UInt16, ComplexUInt16);
numeric_element!(i32, Int32, ComplexInt32);
numeric_element!(u32, UInt32, ComplexUInt32);
numeric_element!(i64, Int64, ComplexInt64);
numeric_element!(u64, UInt64, ComplexUInt64);

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of<T: Element>(value: T) -> BytesMut {
        let mut buf = BytesMut::new();
        value.put(&mut buf);
        buf
    }

    #[test]
    fn widths_match_class() {
        assert_eq!(bytes_of(true).len(), bool::CLASS.element_size());
        assert_eq!(bytes_of(7u16).len(), u16::CLASS.element_size());
        assert_eq!(bytes_of(1.5f32).len(), f32::CLASS.element_size());
        assert_eq!(
            bytes_of(Complex::new(1i64, -1)).len(),
            <Complex<i64>>::CLASS.element_size()
        );
    }

    #[test]
    fn native_endian_layout() {
        assert_eq!(bytes_of(0x0102_0304u32).as_ref(), &0x0102_0304u32.to_ne_bytes());
    }

    #[test]
    fn complex_is_real_then_imaginary() {
        let buf = bytes_of(Complex::new(1.0f64, 2.0));
        assert_eq!(&buf[..8], &1.0f64.to_ne_bytes());
        assert_eq!(&buf[8..], &2.0f64.to_ne_bytes());
        assert_eq!(<Complex<f64>>::get(&buf), Complex::new(1.0, 2.0));
    }

    #[test]
    fn logical_nonzero_is_true() {
        assert!(bool::get(&[2]));
        assert!(!bool::get(&[0]));
    }
}
