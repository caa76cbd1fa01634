//! Payload shape checks.
//!
//! Payloads must be structured values (a struct or a map) so they can be
//! wrapped in an envelope and evolve field by field. Types are checked once
//! at bind time with [`describe`], which asks the type's `Deserialize` impl
//! which kind of input it expects without needing a value. Outgoing values
//! are checked with [`inspect`], which asks the value's `Serialize` impl
//! what it starts writing, so the check does not depend on any wire format.

use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::ser::{self, Impossible, Serializer};
use serde::Serialize;

use crate::error::ValidationError;

/// The serde data-model shape of a type or value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Struct,
    Map,
    Unit,
    Option,
    Sequence,
    Enum,
    Scalar(&'static str),
    /// Self-describing types (such as `serde_json::Value`) and anything the
    /// probe could not pin down.
    Unknown,
}

impl Shape {
    pub fn is_structured(&self) -> bool {
        matches!(self, Shape::Struct | Shape::Map)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Struct => f.write_str("struct"),
            Shape::Map => f.write_str("map"),
            Shape::Unit => f.write_str("unit"),
            Shape::Option => f.write_str("option"),
            Shape::Sequence => f.write_str("sequence"),
            Shape::Enum => f.write_str("enum"),
            Shape::Scalar(name) => f.write_str(name),
            Shape::Unknown => f.write_str("unknown"),
        }
    }
}

/// Shape of `T` as seen by its `Deserialize` impl.
pub fn describe<T: DeserializeOwned>() -> Shape {
    match T::deserialize(Probe) {
        Err(Found(shape)) => shape,
        Ok(_) => Shape::Unknown,
    }
}

/// Shape of a value as seen by its `Serialize` impl.
///
/// `Option` and newtype wrappers are looked through; `None` is [`Shape::Unit`].
/// Fails with the serializer's message if the value refuses to serialize.
pub fn inspect<T: Serialize + ?Sized>(value: &T) -> Result<Shape, String> {
    match value.serialize(Inspector) {
        Err(Inspected::Shape(shape)) => Ok(shape),
        Err(Inspected::Failed(message)) => Err(message),
        Ok(()) => Ok(Shape::Unknown),
    }
}

/// Require `T` to be a structured type.
pub(crate) fn check_type<T: DeserializeOwned>(
    target: &'static str,
    what: &str,
) -> Result<(), ValidationError> {
    match describe::<T>() {
        shape if shape.is_structured() => Ok(()),
        shape => Err(ValidationError::new(
            target,
            format!(
                "{} {} is not a struct (found {})",
                what,
                std::any::type_name::<T>(),
                shape
            ),
        )),
    }
}

/// Require an outgoing value to serialize as a structured value.
pub(crate) fn check_value<T: Serialize>(
    target: &'static str,
    value: &T,
) -> Result<(), ValidationError> {
    let shape = inspect(value)
        .map_err(|e| ValidationError::new(target, format!("value cannot be serialized: {}", e)))?;
    match shape {
        shape if shape.is_structured() => Ok(()),
        Shape::Unit => Err(ValidationError::new(target, "value may not be null, use a struct")),
        shape => Err(ValidationError::new(
            target,
            format!("value is not a struct (found {})", shape),
        )),
    }
}

/// Carries the observed shape out of the probe.
#[derive(Debug)]
struct Found(Shape);

impl fmt::Display for Found {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "probed shape {}", self.0)
    }
}

impl std::error::Error for Found {}

impl de::Error for Found {
    fn custom<T: fmt::Display>(_msg: T) -> Self {
        Found(Shape::Unknown)
    }
}

/// What the inspector saw first.
#[derive(Debug)]
enum Inspected {
    Shape(Shape),
    Failed(String),
}

impl fmt::Display for Inspected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inspected::Shape(shape) => write!(f, "inspected shape {}", shape),
            Inspected::Failed(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for Inspected {}

impl ser::Error for Inspected {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Inspected::Failed(msg.to_string())
    }
}

/// A serializer that stops at the first call, reporting what was written.
struct Inspector;

macro_rules! inspect_scalars {
    ($($method:ident($ty:ty) => $name:literal,)+) => {
        $(
            fn $method(self, _v: $ty) -> Result<(), Inspected> {
                Err(Inspected::Shape(Shape::Scalar($name)))
            }
        )+
    };
}

impl Serializer for Inspector {
    type Ok = ();
    type Error = Inspected;
    type SerializeSeq = Impossible<(), Inspected>;
    type SerializeTuple = Impossible<(), Inspected>;
    type SerializeTupleStruct = Impossible<(), Inspected>;
    type SerializeTupleVariant = Impossible<(), Inspected>;
    type SerializeMap = Impossible<(), Inspected>;
    type SerializeStruct = Impossible<(), Inspected>;
    type SerializeStructVariant = Impossible<(), Inspected>;

    inspect_scalars! {
        serialize_bool(bool) => "bool",
        serialize_i8(i8) => "i8",
        serialize_i16(i16) => "i16",
        serialize_i32(i32) => "i32",
        serialize_i64(i64) => "i64",
        serialize_i128(i128) => "i128",
        serialize_u8(u8) => "u8",
        serialize_u16(u16) => "u16",
        serialize_u32(u32) => "u32",
        serialize_u64(u64) => "u64",
        serialize_u128(u128) => "u128",
        serialize_f32(f32) => "f32",
        serialize_f64(f64) => "f64",
        serialize_char(char) => "char",
        serialize_str(&str) => "string",
        serialize_bytes(&[u8]) => "bytes",
    }

    fn serialize_none(self) -> Result<(), Inspected> {
        Err(Inspected::Shape(Shape::Unit))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), Inspected> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), Inspected> {
        Err(Inspected::Shape(Shape::Unit))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), Inspected> {
        Err(Inspected::Shape(Shape::Unit))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> Result<(), Inspected> {
        Err(Inspected::Shape(Shape::Enum))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), Inspected> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<(), Inspected> {
        Err(Inspected::Shape(Shape::Enum))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Inspected> {
        Err(Inspected::Shape(Shape::Sequence))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Inspected> {
        Err(Inspected::Shape(Shape::Sequence))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Inspected> {
        Err(Inspected::Shape(Shape::Sequence))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Inspected> {
        Err(Inspected::Shape(Shape::Enum))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Inspected> {
        Err(Inspected::Shape(Shape::Map))
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Inspected> {
        Err(Inspected::Shape(Shape::Struct))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Inspected> {
        Err(Inspected::Shape(Shape::Enum))
    }
}

/// A deserializer that fails on the first request, reporting what was asked.
struct Probe;

macro_rules! scalars {
    ($($method:ident => $name:literal,)+) => {
        $(
            fn $method<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Found> {
                Err(Found(Shape::Scalar($name)))
            }
        )+
    };
}

impl<'de> Deserializer<'de> for Probe {
    type Error = Found;

    scalars! {
        deserialize_bool => "bool",
        deserialize_i8 => "i8",
        deserialize_i16 => "i16",
        deserialize_i32 => "i32",
        deserialize_i64 => "i64",
        deserialize_u8 => "u8",
        deserialize_u16 => "u16",
        deserialize_u32 => "u32",
        deserialize_u64 => "u64",
        deserialize_f32 => "f32",
        deserialize_f64 => "f64",
        deserialize_char => "char",
        deserialize_str => "string",
        deserialize_string => "string",
        deserialize_bytes => "bytes",
        deserialize_byte_buf => "bytes",
    }

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Found> {
        Err(Found(Shape::Unknown))
    }

    fn deserialize_option<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Found> {
        Err(Found(Shape::Option))
    }

    fn deserialize_unit<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Found> {
        Err(Found(Shape::Unit))
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _visitor: V,
    ) -> Result<V::Value, Found> {
        Err(Found(Shape::Unit))
    }

    // Newtypes take the shape of what they wrap.
    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Found> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Found> {
        Err(Found(Shape::Sequence))
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, Found> {
        Err(Found(Shape::Sequence))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, Found> {
        Err(Found(Shape::Sequence))
    }

    fn deserialize_map<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Found> {
        Err(Found(Shape::Map))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Found> {
        Err(Found(Shape::Struct))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Found> {
        Err(Found(Shape::Enum))
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Found> {
        Err(Found(Shape::Unknown))
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Found> {
        Err(Found(Shape::Unknown))
    }
}
