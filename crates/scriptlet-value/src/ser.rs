//! Serde serializer producing [`DynamicValue`] trees.
//!
//! Shape mapping:
//!
//! | serde shape | dynamic value |
//! |---|---|
//! | bool | `Bool` |
//! | i8..i64 (i128 if it fits) | `Int` |
//! | u8..u64 (u128 if it fits) | `Uint` |
//! | f32, f64 | `Float` |
//! | char, str | `String` |
//! | bytes, seq, tuple, tuple struct | `List` |
//! | none, unit, unit struct | `None` |
//! | some, newtype struct | inner value |
//! | map | `Dict`, string keys only, sorted |
//! | struct | `Dict`, declaration order |
//! | unit variant | `String(variant)` |
//! | newtype / tuple / struct variant | `Dict { variant: payload }` |

use std::fmt;

use serde::ser::{self, Impossible, Serialize};

use crate::error::ConvertError;
use crate::value::{Dict, DynamicValue};

/// Newtype name marking a dictionary whose order must be kept as is.
pub(crate) const ORDERED_DICT_TOKEN: &str = "$scriptlet_value::private::OrderedDict";

/// Newtype name marking a value without a dynamic representation.
const UNRECOGNISED_TOKEN: &str = "$scriptlet_value::private::Unrecognised";

/// Convert any serializable host value into a [`DynamicValue`].
pub fn to_dynamic<T: ?Sized + Serialize>(value: &T) -> Result<DynamicValue, ConvertError> {
    value.serialize(Serializer::default())
}

/// `serialize_with` helper for fields that hold no data, such as callbacks,
/// channels or raw handles.
///
/// Converting a record with such a field fails with
/// [`ConvertError::UnsupportedType`]. Other serializers receive a
/// `(type_name, debug_repr)` pair.
///
/// ```ignore
/// #[derive(Serialize)]
/// struct Job {
///     name: String,
///     #[serde(serialize_with = "scriptlet_value::opaque")]
///     notify: std::sync::mpsc::Sender<u8>,
/// }
/// ```
pub fn opaque<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: fmt::Debug + ?Sized,
    S: ser::Serializer,
{
    let marker = (std::any::type_name::<T>(), format!("{value:?}"));
    serializer.serialize_newtype_struct(UNRECOGNISED_TOKEN, &marker)
}

/// Serializer whose output is a [`DynamicValue`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Serializer {
    /// Keep map entries in the order they arrive instead of sorting them.
    keep_order: bool,
}

impl ser::Serializer for Serializer {
    type Ok = DynamicValue;
    type Error = ConvertError;

    type SerializeSeq = SerializeList;
    type SerializeTuple = SerializeList;
    type SerializeTupleStruct = SerializeList;
    type SerializeTupleVariant = SerializeVariantList;
    type SerializeMap = SerializeDict;
    type SerializeStruct = SerializeRecord;
    type SerializeStructVariant = SerializeVariantRecord;

    fn serialize_bool(self, v: bool) -> Result<DynamicValue, ConvertError> {
        Ok(DynamicValue::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<DynamicValue, ConvertError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<DynamicValue, ConvertError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<DynamicValue, ConvertError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<DynamicValue, ConvertError> {
        Ok(DynamicValue::Int(v))
    }

    fn serialize_i128(self, v: i128) -> Result<DynamicValue, ConvertError> {
        i64::try_from(v)
            .map(DynamicValue::Int)
            .map_err(|_| ConvertError::UnsupportedType {
                type_name: "i128".to_string(),
                value: v.to_string(),
            })
    }

    fn serialize_u8(self, v: u8) -> Result<DynamicValue, ConvertError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<DynamicValue, ConvertError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<DynamicValue, ConvertError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<DynamicValue, ConvertError> {
        Ok(DynamicValue::Uint(v))
    }

    fn serialize_u128(self, v: u128) -> Result<DynamicValue, ConvertError> {
        u64::try_from(v)
            .map(DynamicValue::Uint)
            .map_err(|_| ConvertError::UnsupportedType {
                type_name: "u128".to_string(),
                value: v.to_string(),
            })
    }

    fn serialize_f32(self, v: f32) -> Result<DynamicValue, ConvertError> {
        Ok(DynamicValue::Float(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> Result<DynamicValue, ConvertError> {
        Ok(DynamicValue::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<DynamicValue, ConvertError> {
        Ok(DynamicValue::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<DynamicValue, ConvertError> {
        Ok(DynamicValue::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<DynamicValue, ConvertError> {
        Ok(DynamicValue::List(
            v.iter().map(|b| DynamicValue::Uint(u64::from(*b))).collect(),
        ))
    }

    fn serialize_none(self) -> Result<DynamicValue, ConvertError> {
        Ok(DynamicValue::None)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<DynamicValue, ConvertError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<DynamicValue, ConvertError> {
        Ok(DynamicValue::None)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<DynamicValue, ConvertError> {
        Ok(DynamicValue::None)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<DynamicValue, ConvertError> {
        Ok(DynamicValue::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<DynamicValue, ConvertError> {
        match name {
            ORDERED_DICT_TOKEN => value.serialize(Serializer { keep_order: true }),
            UNRECOGNISED_TOKEN => Err(unrecognised(value)),
            _ => value.serialize(self),
        }
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<DynamicValue, ConvertError> {
        let mut dict = Dict::with_capacity(1);
        dict.insert(variant.to_string(), to_dynamic(value)?);
        Ok(DynamicValue::Dict(dict))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeList, ConvertError> {
        Ok(SerializeList {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SerializeList, ConvertError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SerializeList, ConvertError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SerializeVariantList, ConvertError> {
        Ok(SerializeVariantList {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<SerializeDict, ConvertError> {
        Ok(SerializeDict {
            entries: Vec::with_capacity(len.unwrap_or(0)),
            pending_key: None,
            keep_order: self.keep_order,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SerializeRecord, ConvertError> {
        Ok(SerializeRecord {
            fields: Dict::with_capacity(len),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SerializeVariantRecord, ConvertError> {
        Ok(SerializeVariantRecord {
            variant,
            fields: Dict::with_capacity(len),
        })
    }
}

/// Decode the `(type_name, repr)` pair written by [`opaque`].
fn unrecognised<T: ?Sized + Serialize>(marker: &T) -> ConvertError {
    match to_dynamic(marker) {
        Ok(DynamicValue::List(parts)) => match parts.as_slice() {
            [DynamicValue::String(type_name), DynamicValue::String(value)] => {
                ConvertError::UnsupportedType {
                    type_name: type_name.clone(),
                    value: value.clone(),
                }
            }
            _ => ConvertError::Custom("malformed opaque marker".to_string()),
        },
        Ok(other) => ConvertError::Custom(format!("malformed opaque marker: {other}")),
        Err(e) => e,
    }
}

fn single_entry(key: &str, value: DynamicValue) -> DynamicValue {
    let mut dict = Dict::with_capacity(1);
    dict.insert(key.to_string(), value);
    DynamicValue::Dict(dict)
}

// ── Compound serializers ─────────────────────────────────────────

pub struct SerializeList {
    items: Vec<DynamicValue>,
}

impl ser::SerializeSeq for SerializeList {
    type Ok = DynamicValue;
    type Error = ConvertError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ConvertError> {
        self.items.push(to_dynamic(value)?);
        Ok(())
    }

    fn end(self) -> Result<DynamicValue, ConvertError> {
        Ok(DynamicValue::List(self.items))
    }
}

impl ser::SerializeTuple for SerializeList {
    type Ok = DynamicValue;
    type Error = ConvertError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ConvertError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<DynamicValue, ConvertError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SerializeList {
    type Ok = DynamicValue;
    type Error = ConvertError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ConvertError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<DynamicValue, ConvertError> {
        ser::SerializeSeq::end(self)
    }
}

pub struct SerializeVariantList {
    variant: &'static str,
    items: Vec<DynamicValue>,
}

impl ser::SerializeTupleVariant for SerializeVariantList {
    type Ok = DynamicValue;
    type Error = ConvertError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ConvertError> {
        self.items.push(to_dynamic(value)?);
        Ok(())
    }

    fn end(self) -> Result<DynamicValue, ConvertError> {
        Ok(single_entry(self.variant, DynamicValue::List(self.items)))
    }
}

pub struct SerializeDict {
    entries: Vec<(String, DynamicValue)>,
    pending_key: Option<String>,
    keep_order: bool,
}

impl ser::SerializeMap for SerializeDict {
    type Ok = DynamicValue;
    type Error = ConvertError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), ConvertError> {
        self.pending_key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ConvertError> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| ConvertError::Custom("map value without a key".to_string()))?;
        self.entries.push((key, to_dynamic(value)?));
        Ok(())
    }

    fn end(mut self) -> Result<DynamicValue, ConvertError> {
        if !self.keep_order {
            // Stable, so colliding keys keep their arrival order.
            self.entries.sort_by(|a, b| a.0.cmp(&b.0));
        }

        let mut dict = Dict::with_capacity(self.entries.len());
        for (key, value) in self.entries {
            dict.insert(key, value);
        }
        Ok(DynamicValue::Dict(dict))
    }
}

pub struct SerializeRecord {
    fields: Dict,
}

impl ser::SerializeStruct for SerializeRecord {
    type Ok = DynamicValue;
    type Error = ConvertError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ConvertError> {
        self.fields.insert(key.to_string(), to_dynamic(value)?);
        Ok(())
    }

    fn end(self) -> Result<DynamicValue, ConvertError> {
        Ok(DynamicValue::Dict(self.fields))
    }
}

pub struct SerializeVariantRecord {
    variant: &'static str,
    fields: Dict,
}

impl ser::SerializeStructVariant for SerializeVariantRecord {
    type Ok = DynamicValue;
    type Error = ConvertError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ConvertError> {
        self.fields.insert(key.to_string(), to_dynamic(value)?);
        Ok(())
    }

    fn end(self) -> Result<DynamicValue, ConvertError> {
        Ok(single_entry(self.variant, DynamicValue::Dict(self.fields)))
    }
}

// ── Map keys ─────────────────────────────────────────────────────

/// Accepts string-like keys only.
struct KeySerializer;

fn key_error(kind: &'static str) -> ConvertError {
    ConvertError::UnsupportedKeyType(kind)
}

impl ser::Serializer for KeySerializer {
    type Ok = String;
    type Error = ConvertError;

    type SerializeSeq = Impossible<String, ConvertError>;
    type SerializeTuple = Impossible<String, ConvertError>;
    type SerializeTupleStruct = Impossible<String, ConvertError>;
    type SerializeTupleVariant = Impossible<String, ConvertError>;
    type SerializeMap = Impossible<String, ConvertError>;
    type SerializeStruct = Impossible<String, ConvertError>;
    type SerializeStructVariant = Impossible<String, ConvertError>;

    fn serialize_str(self, v: &str) -> Result<String, ConvertError> {
        Ok(v.to_string())
    }

    fn serialize_char(self, v: char) -> Result<String, ConvertError> {
        Ok(v.to_string())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String, ConvertError> {
        value.serialize(self)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<String, ConvertError> {
        Ok(variant.to_string())
    }

    fn serialize_bool(self, _v: bool) -> Result<String, ConvertError> {
        Err(key_error("bool"))
    }

    fn serialize_i8(self, _v: i8) -> Result<String, ConvertError> {
        Err(key_error("int"))
    }

    fn serialize_i16(self, _v: i16) -> Result<String, ConvertError> {
        Err(key_error("int"))
    }

    fn serialize_i32(self, _v: i32) -> Result<String, ConvertError> {
        Err(key_error("int"))
    }

    fn serialize_i64(self, _v: i64) -> Result<String, ConvertError> {
        Err(key_error("int"))
    }

    fn serialize_i128(self, _v: i128) -> Result<String, ConvertError> {
        Err(key_error("int"))
    }

    fn serialize_u8(self, _v: u8) -> Result<String, ConvertError> {
        Err(key_error("uint"))
    }

    fn serialize_u16(self, _v: u16) -> Result<String, ConvertError> {
        Err(key_error("uint"))
    }

    fn serialize_u32(self, _v: u32) -> Result<String, ConvertError> {
        Err(key_error("uint"))
    }

    fn serialize_u64(self, _v: u64) -> Result<String, ConvertError> {
        Err(key_error("uint"))
    }

    fn serialize_u128(self, _v: u128) -> Result<String, ConvertError> {
        Err(key_error("uint"))
    }

    fn serialize_f32(self, _v: f32) -> Result<String, ConvertError> {
        Err(key_error("float"))
    }

    fn serialize_f64(self, _v: f64) -> Result<String, ConvertError> {
        Err(key_error("float"))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String, ConvertError> {
        Err(key_error("bytes"))
    }

    fn serialize_none(self) -> Result<String, ConvertError> {
        Err(key_error("none"))
    }

    fn serialize_some<T: ?Sized + Serialize>(self, _value: &T) -> Result<String, ConvertError> {
        Err(key_error("option"))
    }

    fn serialize_unit(self) -> Result<String, ConvertError> {
        Err(key_error("none"))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String, ConvertError> {
        Err(key_error("none"))
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String, ConvertError> {
        Err(key_error("variant"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, ConvertError> {
        Err(key_error("list"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, ConvertError> {
        Err(key_error("list"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, ConvertError> {
        Err(key_error("list"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, ConvertError> {
        Err(key_error("variant"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, ConvertError> {
        Err(key_error("dict"))
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, ConvertError> {
        Err(key_error("struct"))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, ConvertError> {
        Err(key_error("variant"))
    }
}
