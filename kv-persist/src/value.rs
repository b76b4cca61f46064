use std::fmt;

/// Declared type tag of an entity attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    UInt,
    Float,
    Text,
}

/// A concrete attribute value read off an entity.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::UInt(_) => ValueType::UInt,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
        }
    }

    /// Zero numbers and empty text are what a default-initialised entity
    /// carries, so query by example ignores them. Booleans always count.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Bool(_) => false,
            Value::Int(i) => *i == 0,
            Value::UInt(u) => *u == 0,
            Value::Float(f) => *f == 0.0,
            Value::Text(s) => s.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::UInt(u) => write!(f, "{}", u),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{:?}", s),
        }
    }
}

macro_rules! impl_from_for_value {
    ($variant:ident, $as:ty, $($t:ty),+) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v as $as)
                }
            }
        )+
    };
}

impl_from_for_value!(Int, i64, i32, i64);
impl_from_for_value!(UInt, u64, u32, u64);
impl_from_for_value!(Float, f64, f32, f64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// Maps a Rust field type onto an attribute type tag and reads it as a [`Value`].
///
/// Implemented for the scalar types prost generates, for `Option` of those and
/// for `Vec` (which is reported as an array attribute and never read).
pub trait AttributeValue {
    const VALUE_TYPE: ValueType;
    const IS_ARRAY: bool = false;

    /// `None` means unset.
    fn to_value(&self) -> Option<Value>;
}

macro_rules! impl_attribute_value {
    ($variant:ident, $as:ty, $($t:ty),+) => {
        $(
            impl AttributeValue for $t {
                const VALUE_TYPE: ValueType = ValueType::$variant;

                fn to_value(&self) -> Option<Value> {
                    Some(Value::$variant(*self as $as))
                }
            }
        )+
    };
}

impl_attribute_value!(Int, i64, i8, i16, i32, i64);
impl_attribute_value!(UInt, u64, u8, u16, u32, u64);
impl_attribute_value!(Float, f64, f32, f64);

impl AttributeValue for bool {
    const VALUE_TYPE: ValueType = ValueType::Bool;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Bool(*self))
    }
}

impl AttributeValue for String {
    const VALUE_TYPE: ValueType = ValueType::Text;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Text(self.clone()))
    }
}

impl AttributeValue for str {
    const VALUE_TYPE: ValueType = ValueType::Text;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Text(self.to_string()))
    }
}

impl<T: AttributeValue + ?Sized> AttributeValue for &T {
    const VALUE_TYPE: ValueType = T::VALUE_TYPE;
    const IS_ARRAY: bool = T::IS_ARRAY;

    fn to_value(&self) -> Option<Value> {
        (**self).to_value()
    }
}

impl<T: AttributeValue> AttributeValue for Option<T> {
    const VALUE_TYPE: ValueType = T::VALUE_TYPE;
    const IS_ARRAY: bool = T::IS_ARRAY;

    fn to_value(&self) -> Option<Value> {
        self.as_ref().and_then(AttributeValue::to_value)
    }
}

impl<T: AttributeValue> AttributeValue for Vec<T> {
    const VALUE_TYPE: ValueType = T::VALUE_TYPE;
    const IS_ARRAY: bool = true;

    fn to_value(&self) -> Option<Value> {
        None
    }
}
