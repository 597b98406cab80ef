//! Canonical JSON encoding used for cache keys and document size sampling.
//!
//! Any `Serialize` value is turned into a `serde_json::Value` whose object
//! keys are emitted in sorted order, so two values that differ only in field
//! or map insertion order encode to identical bytes. Encoding never fails:
//! nesting deeper than [`MAX_DEPTH`] (which is what a reference cycle looks
//! like from inside serde) is replaced by [`CIRCULAR_SENTINEL`], and a value
//! whose `Serialize` impl reports an error is replaced by
//! [`UNSERIALIZABLE_SENTINEL`].

use std::collections::BTreeMap;

use serde::ser::{self, Serialize};
use serde_json::{Map, Number, Value};

pub const CIRCULAR_SENTINEL: &str = "[Circular ~]";
pub const UNSERIALIZABLE_SENTINEL: &str = "[Unserializable]";

/// Nesting limit before a branch is treated as circular.
pub const MAX_DEPTH: usize = 64;

/// Canonical `Value` for `value`.
pub fn to_canonical_value<T: ?Sized + Serialize>(value: &T) -> Value {
    value
        .serialize(CanonicalSerializer { depth: 0 })
        .unwrap_or_else(|_| unserializable())
}

/// Canonical JSON text for `value`.
pub fn to_canonical_string<T: ?Sized + Serialize>(value: &T) -> String {
    to_canonical_value(value).to_string()
}

/// UTF-8 byte length of the canonical encoding.
pub fn encoded_len<T: ?Sized + Serialize>(value: &T) -> usize {
    to_canonical_string(value).len()
}

fn circular() -> Value {
    Value::String(CIRCULAR_SENTINEL.into())
}

fn unserializable() -> Value {
    Value::String(UNSERIALIZABLE_SENTINEL.into())
}

fn sorted_object(entries: BTreeMap<String, Value>) -> Value {
    let mut map = Map::with_capacity(entries.len());
    for (key, value) in entries {
        map.insert(key, value);
    }
    Value::Object(map)
}

fn tagged(variant: &'static str, value: Value) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(variant.to_owned(), value);
    Value::Object(map)
}

// ─── Error ───────────────────────────────────────────────────────

/// Raised only by user `Serialize` impls; absorbed before it leaves this
/// module.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CanonicalError(String);

impl ser::Error for CanonicalError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        CanonicalError(msg.to_string())
    }
}

// ─── Serializer ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct CanonicalSerializer {
    depth: usize,
}

impl CanonicalSerializer {
    fn exhausted(self) -> bool {
        self.depth >= MAX_DEPTH
    }

    /// Serialize a child one level deeper, absorbing errors and cycles.
    fn nested<T: ?Sized + Serialize>(self, value: &T) -> Value {
        if self.exhausted() {
            return circular();
        }
        value
            .serialize(CanonicalSerializer {
                depth: self.depth + 1,
            })
            .unwrap_or_else(|_| unserializable())
    }

    fn key<T: ?Sized + Serialize>(self, key: &T) -> String {
        match self.nested(key) {
            Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

impl ser::Serializer for CanonicalSerializer {
    type Ok = Value;
    type Error = CanonicalError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantMapBuilder;

    fn serialize_bool(self, v: bool) -> Result<Value, CanonicalError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, CanonicalError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> Result<Value, CanonicalError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> Result<Value, CanonicalError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> Result<Value, CanonicalError> {
        Ok(Value::from(v))
    }

    fn serialize_i128(self, v: i128) -> Result<Value, CanonicalError> {
        Ok(i64::try_from(v)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(v.to_string())))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, CanonicalError> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u16(self, v: u16) -> Result<Value, CanonicalError> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u32(self, v: u32) -> Result<Value, CanonicalError> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u64(self, v: u64) -> Result<Value, CanonicalError> {
        Ok(Value::from(v))
    }

    fn serialize_u128(self, v: u128) -> Result<Value, CanonicalError> {
        Ok(u64::try_from(v)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(v.to_string())))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, CanonicalError> {
        self.serialize_f64(v as f64)
    }

    // Non-finite floats have no JSON form; they encode as null.
    fn serialize_f64(self, v: f64) -> Result<Value, CanonicalError> {
        Ok(Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null))
    }

    fn serialize_char(self, v: char) -> Result<Value, CanonicalError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, CanonicalError> {
        Ok(Value::String(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, CanonicalError> {
        Ok(Value::Array(v.iter().map(|b| Value::from(*b)).collect()))
    }

    fn serialize_none(self) -> Result<Value, CanonicalError> {
        Ok(Value::Null)
    }

    fn serialize_some<T: ?Sized + Serialize>(
        self,
        value: &T,
    ) -> Result<Value, CanonicalError> {
        Ok(self.nested(value))
    }

    fn serialize_unit(self) -> Result<Value, CanonicalError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(
        self,
        _name: &'static str,
    ) -> Result<Value, CanonicalError> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value, CanonicalError> {
        Ok(Value::String(variant.to_owned()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, CanonicalError> {
        Ok(self.nested(value))
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, CanonicalError> {
        Ok(tagged(variant, self.nested(value)))
    }

    fn serialize_seq(
        self,
        len: Option<usize>,
    ) -> Result<SeqBuilder, CanonicalError> {
        Ok(SeqBuilder::new(self, len.unwrap_or(0)))
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, CanonicalError> {
        Ok(SeqBuilder::new(self, len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, CanonicalError> {
        Ok(SeqBuilder::new(self, len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqBuilder, CanonicalError> {
        Ok(VariantSeqBuilder {
            variant,
            inner: SeqBuilder::new(self, len),
        })
    }

    fn serialize_map(
        self,
        _len: Option<usize>,
    ) -> Result<MapBuilder, CanonicalError> {
        Ok(MapBuilder::new(self))
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<MapBuilder, CanonicalError> {
        Ok(MapBuilder::new(self))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantMapBuilder, CanonicalError> {
        Ok(VariantMapBuilder {
            variant,
            inner: MapBuilder::new(self),
        })
    }
}

// ─── Compound builders ───────────────────────────────────────────

/// Collects sequence elements. Once the depth limit is hit the children are
/// never visited and the whole sequence collapses into the sentinel.
struct SeqBuilder {
    ser: CanonicalSerializer,
    items: Vec<Value>,
    truncated: bool,
}

impl SeqBuilder {
    fn new(ser: CanonicalSerializer, len: usize) -> Self {
        let truncated = ser.exhausted();
        Self {
            ser,
            items: Vec::with_capacity(if truncated { 0 } else { len }),
            truncated,
        }
    }

    fn push<T: ?Sized + Serialize>(&mut self, value: &T) {
        if !self.truncated {
            self.items.push(self.ser.nested(value));
        }
    }

    fn finish(self) -> Value {
        if self.truncated {
            circular()
        } else {
            Value::Array(self.items)
        }
    }
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = CanonicalError;

    fn serialize_element<T: ?Sized + Serialize>(
        &mut self,
        value: &T,
    ) -> Result<(), CanonicalError> {
        self.push(value);
        Ok(())
    }

    fn end(self) -> Result<Value, CanonicalError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = CanonicalError;

    fn serialize_element<T: ?Sized + Serialize>(
        &mut self,
        value: &T,
    ) -> Result<(), CanonicalError> {
        self.push(value);
        Ok(())
    }

    fn end(self) -> Result<Value, CanonicalError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = CanonicalError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        value: &T,
    ) -> Result<(), CanonicalError> {
        self.push(value);
        Ok(())
    }

    fn end(self) -> Result<Value, CanonicalError> {
        Ok(self.finish())
    }
}

struct VariantSeqBuilder {
    variant: &'static str,
    inner: SeqBuilder,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Value;
    type Error = CanonicalError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        value: &T,
    ) -> Result<(), CanonicalError> {
        self.inner.push(value);
        Ok(())
    }

    fn end(self) -> Result<Value, CanonicalError> {
        Ok(tagged(self.variant, self.inner.finish()))
    }
}

/// Collects object entries into a `BTreeMap` so keys come out sorted no
/// matter what order the source produced them in.
struct MapBuilder {
    ser: CanonicalSerializer,
    entries: BTreeMap<String, Value>,
    pending_key: Option<String>,
    truncated: bool,
}

impl MapBuilder {
    fn new(ser: CanonicalSerializer) -> Self {
        Self {
            ser,
            entries: BTreeMap::new(),
            pending_key: None,
            truncated: ser.exhausted(),
        }
    }

    fn insert<T: ?Sized + Serialize>(&mut self, key: String, value: &T) {
        if !self.truncated {
            self.entries.insert(key, self.ser.nested(value));
        }
    }

    fn finish(self) -> Value {
        if self.truncated {
            circular()
        } else {
            sorted_object(self.entries)
        }
    }
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = CanonicalError;

    fn serialize_key<T: ?Sized + Serialize>(
        &mut self,
        key: &T,
    ) -> Result<(), CanonicalError> {
        if !self.truncated {
            self.pending_key = Some(self.ser.key(key));
        }
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(
        &mut self,
        value: &T,
    ) -> Result<(), CanonicalError> {
        let key = self.pending_key.take().unwrap_or_default();
        self.insert(key, value);
        Ok(())
    }

    fn end(self) -> Result<Value, CanonicalError> {
        Ok(self.finish())
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Value;
    type Error = CanonicalError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CanonicalError> {
        self.insert(key.to_owned(), value);
        Ok(())
    }

    fn end(self) -> Result<Value, CanonicalError> {
        Ok(self.finish())
    }
}

struct VariantMapBuilder {
    variant: &'static str,
    inner: MapBuilder,
}

impl ser::SerializeStructVariant for VariantMapBuilder {
    type Ok = Value;
    type Error = CanonicalError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CanonicalError> {
        self.inner.insert(key.to_owned(), value);
        Ok(())
    }

    fn end(self) -> Result<Value, CanonicalError> {
        Ok(tagged(self.variant, self.inner.finish()))
    }
}
