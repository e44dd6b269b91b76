//! Wire type tags.
//!
//! Tag values follow the host's array-type enumeration. Tag 1 (the host's
//! `char` arrays) and everything above 24 are not part of the closed set.

/// Reserved tag marking a top-level diagnostic frame instead of a value.
pub const DIAGNOSTIC_TAG: i32 = 100;

/// Element class of a fixed-width (numeric, logical, or complex) array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum NumericClass {
    Logical = 0,
    Double = 3,
    Single = 4,
    Int8 = 5,
    UInt8 = 6,
    Int16 = 7,
    UInt16 = 8,
    Int32 = 9,
    UInt32 = 10,
    Int64 = 11,
    UInt64 = 12,
    ComplexDouble = 13,
    ComplexSingle = 14,
    ComplexInt8 = 15,
    ComplexUInt8 = 16,
    ComplexInt16 = 17,
    ComplexUInt16 = 18,
    ComplexInt32 = 19,
    ComplexUInt32 = 20,
    ComplexInt64 = 21,
    ComplexUInt64 = 22,
}

impl NumericClass {
    /// Every fixed-width class, in tag order.
    pub const ALL: [NumericClass; 21] = [
        NumericClass::Logical,
        NumericClass::Double,
        NumericClass::Single,
        NumericClass::Int8,
        NumericClass::UInt8,
        NumericClass::Int16,
        NumericClass::UInt16,
        NumericClass::Int32,
        NumericClass::UInt32,
        NumericClass::Int64,
        NumericClass::UInt64,
        NumericClass::ComplexDouble,
        NumericClass::ComplexSingle,
        NumericClass::ComplexInt8,
        NumericClass::ComplexUInt8,
        NumericClass::ComplexInt16,
        NumericClass::ComplexUInt16,
        NumericClass::ComplexInt32,
        NumericClass::ComplexUInt32,
        NumericClass::ComplexInt64,
        NumericClass::ComplexUInt64,
    ];

    /// Size of one element on the wire. Complex elements are two scalars.
    pub fn element_size(self) -> usize {
        let scalar = match self.real_class() {
            NumericClass::Logical | NumericClass::Int8 | NumericClass::UInt8 => 1,
            NumericClass::Int16 | NumericClass::UInt16 => 2,
            NumericClass::Single | NumericClass::Int32 | NumericClass::UInt32 => 4,
            _ => 8,
        };
        if self.is_complex() {
            scalar * 2
        } else {
            scalar
        }
    }

    pub fn is_complex(self) -> bool {
        (self as i32) >= NumericClass::ComplexDouble as i32
    }

    /// The scalar class of each complex component (identity for real classes).
    pub fn real_class(self) -> NumericClass {
        match self {
            NumericClass::ComplexDouble => NumericClass::Double,
            NumericClass::ComplexSingle => NumericClass::Single,
            NumericClass::ComplexInt8 => NumericClass::Int8,
            NumericClass::ComplexUInt8 => NumericClass::UInt8,
            NumericClass::ComplexInt16 => NumericClass::Int16,
            NumericClass::ComplexUInt16 => NumericClass::UInt16,
            NumericClass::ComplexInt32 => NumericClass::Int32,
            NumericClass::ComplexUInt32 => NumericClass::UInt32,
            NumericClass::ComplexInt64 => NumericClass::Int64,
            NumericClass::ComplexUInt64 => NumericClass::UInt64,
            real => real,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NumericClass::Logical => "logical",
            NumericClass::Double => "double",
            NumericClass::Single => "single",
            NumericClass::Int8 => "int8",
            NumericClass::UInt8 => "uint8",
            NumericClass::Int16 => "int16",
            NumericClass::UInt16 => "uint16",
            NumericClass::Int32 => "int32",
            NumericClass::UInt32 => "uint32",
            NumericClass::Int64 => "int64",
            NumericClass::UInt64 => "uint64",
            NumericClass::ComplexDouble => "complex double",
            NumericClass::ComplexSingle => "complex single",
            NumericClass::ComplexInt8 => "complex int8",
            NumericClass::ComplexUInt8 => "complex uint8",
            NumericClass::ComplexInt16 => "complex int16",
            NumericClass::ComplexUInt16 => "complex uint16",
            NumericClass::ComplexInt32 => "complex int32",
            NumericClass::ComplexUInt32 => "complex uint32",
            NumericClass::ComplexInt64 => "complex int64",
            NumericClass::ComplexUInt64 => "complex uint64",
        }
    }
}

/// Discriminant of every value in the closed type set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Numeric(NumericClass),
    String,
    Cell,
    Struct,
}

impl TypeTag {
    pub const STRING: i32 = 2;
    pub const CELL: i32 = 23;
    pub const STRUCT: i32 = 24;

    /// Map a raw wire tag into the closed set.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            Self::STRING => Some(TypeTag::String),
            Self::CELL => Some(TypeTag::Cell),
            Self::STRUCT => Some(TypeTag::Struct),
            _ => NumericClass::ALL
                .iter()
                .find(|class| **class as i32 == raw)
                .map(|class| TypeTag::Numeric(*class)),
        }
    }

    /// The raw wire value.
    pub fn raw(self) -> i32 {
        match self {
            TypeTag::Numeric(class) => class as i32,
            TypeTag::String => Self::STRING,
            TypeTag::Cell => Self::CELL,
            TypeTag::Struct => Self::STRUCT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Numeric(class) => class.name(),
            TypeTag::String => "string",
            TypeTag::Cell => "cell",
            TypeTag::Struct => "struct",
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_tags_map_back() {
        for class in NumericClass::ALL {
            let tag = TypeTag::Numeric(class);
            assert_eq!(TypeTag::from_raw(tag.raw()), Some(tag));
        }
        for tag in [TypeTag::String, TypeTag::Cell, TypeTag::Struct] {
            assert_eq!(TypeTag::from_raw(tag.raw()), Some(tag));
        }
    }

    #[test]
    fn tags_outside_closed_set_are_rejected() {
        assert_eq!(TypeTag::from_raw(1), None);
        assert_eq!(TypeTag::from_raw(25), None);
        assert_eq!(TypeTag::from_raw(-1), None);
        assert_eq!(TypeTag::from_raw(DIAGNOSTIC_TAG), None);
    }

    #[test]
    fn element_sizes() {
        assert_eq!(NumericClass::Logical.element_size(), 1);
        assert_eq!(NumericClass::Int16.element_size(), 2);
        assert_eq!(NumericClass::Single.element_size(), 4);
        assert_eq!(NumericClass::UInt64.element_size(), 8);
        assert_eq!(NumericClass::ComplexInt8.element_size(), 2);
        assert_eq!(NumericClass::ComplexSingle.element_size(), 8);
        assert_eq!(NumericClass::ComplexDouble.element_size(), 16);
        assert_eq!(NumericClass::ComplexUInt64.element_size(), 16);
    }

    #[test]
    fn complex_classes() {
        assert!(!NumericClass::UInt64.is_complex());
        assert!(NumericClass::ComplexDouble.is_complex());
        assert_eq!(NumericClass::ComplexInt32.real_class(), NumericClass::Int32);
        assert_eq!(NumericClass::Double.real_class(), NumericClass::Double);
    }
}
