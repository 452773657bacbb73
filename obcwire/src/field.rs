//! Per-type field codecs.
//!
//! `FieldValue` is the object-safe face of one field of a message: the
//! engine in `codec` asks it whether it sits at its default, writes it
//! behind a tag, merges a wire value into it, and maps it to and from JSON.

use core::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value as JsonValue;

use crate::codec::{finish_region, Message};
use crate::config::CodecConfig;
use crate::error::{Result, WireError};
use crate::wire::{Reader, WireType, Writer};

pub trait FieldValue {
    fn is_default(&self) -> bool;
    /// Write tag and value. Called only for non-default values.
    fn encode(&self, number: u32, w: &mut Writer);
    /// Merge one wire value. `wire_type` has already been accepted by the
    /// field's descriptor.
    fn merge(&mut self, wire_type: WireType, r: &mut Reader<'_>) -> Result<()>;
    fn to_json(&self) -> JsonValue;
    fn merge_json(&mut self, value: &JsonValue, config: &CodecConfig) -> Result<()>;
}

/// Singular values with a fixed wire representation.
pub trait Scalar: Sized + Clone + Default + PartialEq {
    const WIRE_TYPE: WireType;
    fn write_raw(&self, w: &mut Writer);
    fn read_raw(r: &mut Reader<'_>) -> Result<Self>;
    fn to_json_value(&self) -> JsonValue;
    fn from_json_value(value: &JsonValue, config: &CodecConfig) -> Result<Self>;
}

impl Scalar for u32 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn write_raw(&self, w: &mut Writer) {
        w.uint32(*self);
    }

    fn read_raw(r: &mut Reader<'_>) -> Result<Self> {
        r.read_uint32()
    }

    fn to_json_value(&self) -> JsonValue {
        JsonValue::from(*self)
    }

    fn from_json_value(value: &JsonValue, _config: &CodecConfig) -> Result<Self> {
        let v = json_u64(value)?;
        u32::try_from(v).map_err(|_| WireError::json(format!("{} does not fit in uint32", v)))
    }
}

impl Scalar for u64 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn write_raw(&self, w: &mut Writer) {
        w.uint64(*self);
    }

    fn read_raw(r: &mut Reader<'_>) -> Result<Self> {
        r.read_uint64()
    }

    fn to_json_value(&self) -> JsonValue {
        JsonValue::from(*self)
    }

    fn from_json_value(value: &JsonValue, config: &CodecConfig) -> Result<Self> {
        config.check_u64(json_u64(value)?)
    }
}

// Signed integers are always zigzag (sint32 / sint64) in this protocol.
impl Scalar for i32 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn write_raw(&self, w: &mut Writer) {
        w.sint32(*self);
    }

    fn read_raw(r: &mut Reader<'_>) -> Result<Self> {
        r.read_sint32()
    }

    fn to_json_value(&self) -> JsonValue {
        JsonValue::from(*self)
    }

    fn from_json_value(value: &JsonValue, _config: &CodecConfig) -> Result<Self> {
        let v = json_i64(value)?;
        i32::try_from(v).map_err(|_| WireError::json(format!("{} does not fit in sint32", v)))
    }
}

impl Scalar for i64 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn write_raw(&self, w: &mut Writer) {
        w.sint64(*self);
    }

    fn read_raw(r: &mut Reader<'_>) -> Result<Self> {
        r.read_sint64()
    }

    fn to_json_value(&self) -> JsonValue {
        JsonValue::from(*self)
    }

    fn from_json_value(value: &JsonValue, config: &CodecConfig) -> Result<Self> {
        config.check_i64(json_i64(value)?)
    }
}

impl Scalar for bool {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn write_raw(&self, w: &mut Writer) {
        w.bool(*self);
    }

    fn read_raw(r: &mut Reader<'_>) -> Result<Self> {
        r.read_bool()
    }

    fn to_json_value(&self) -> JsonValue {
        JsonValue::Bool(*self)
    }

    fn from_json_value(value: &JsonValue, _config: &CodecConfig) -> Result<Self> {
        match value {
            JsonValue::Bool(b) => Ok(*b),
            JsonValue::String(s) if s == "true" => Ok(true),
            JsonValue::String(s) if s == "false" => Ok(false),
            other => Err(WireError::json(format!("expected a bool, found {}", json_kind(other)))),
        }
    }
}

impl Scalar for f64 {
    const WIRE_TYPE: WireType = WireType::Fixed64;

    fn write_raw(&self, w: &mut Writer) {
        w.double(*self);
    }

    fn read_raw(r: &mut Reader<'_>) -> Result<Self> {
        r.read_double()
    }

    fn to_json_value(&self) -> JsonValue {
        match serde_json::Number::from_f64(*self) {
            Some(n) => JsonValue::Number(n),
            None if self.is_nan() => JsonValue::from("NaN"),
            None if *self > 0.0 => JsonValue::from("Infinity"),
            None => JsonValue::from("-Infinity"),
        }
    }

    fn from_json_value(value: &JsonValue, _config: &CodecConfig) -> Result<Self> {
        match value {
            JsonValue::Number(n) => n
                .as_f64()
                .ok_or_else(|| WireError::json(format!("{} is not a double", n))),
            JsonValue::String(s) => match s.trim() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                t => t
                    .parse::<f64>()
                    .map_err(|_| WireError::json(format!("`{}` is not a double", s))),
            },
            other => Err(WireError::json(format!("expected a double, found {}", json_kind(other)))),
        }
    }
}

impl Scalar for String {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn write_raw(&self, w: &mut Writer) {
        w.string(self);
    }

    fn read_raw(r: &mut Reader<'_>) -> Result<Self> {
        Ok(r.read_string()?.to_string())
    }

    fn to_json_value(&self) -> JsonValue {
        JsonValue::String(self.clone())
    }

    fn from_json_value(value: &JsonValue, _config: &CodecConfig) -> Result<Self> {
        match value {
            JsonValue::String(s) => Ok(s.clone()),
            JsonValue::Number(n) => Ok(n.to_string()),
            JsonValue::Bool(b) => Ok(b.to_string()),
            other => Err(WireError::json(format!("expected a string, found {}", json_kind(other)))),
        }
    }
}

/// `bytes` fields; base64 in JSON.
impl Scalar for Vec<u8> {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn write_raw(&self, w: &mut Writer) {
        w.bytes(self);
    }

    fn read_raw(r: &mut Reader<'_>) -> Result<Self> {
        Ok(r.read_bytes()?.to_vec())
    }

    fn to_json_value(&self) -> JsonValue {
        JsonValue::String(BASE64.encode(self))
    }

    fn from_json_value(value: &JsonValue, _config: &CodecConfig) -> Result<Self> {
        match value {
            JsonValue::String(s) => BASE64
                .decode(s.trim())
                .map_err(|e| WireError::json(format!("invalid base64: {}", e))),
            other => Err(WireError::json(format!("expected base64 text, found {}", json_kind(other)))),
        }
    }
}

macro_rules! scalar_field {
    ($($ty:ty),* $(,)?) => {$(
        impl FieldValue for $ty {
            fn is_default(&self) -> bool {
                *self == <$ty>::default()
            }

            fn encode(&self, number: u32, w: &mut Writer) {
                w.tag(number, <$ty as Scalar>::WIRE_TYPE);
                self.write_raw(w);
            }

            fn merge(&mut self, _wire_type: WireType, r: &mut Reader<'_>) -> Result<()> {
                *self = <$ty as Scalar>::read_raw(r)?;
                Ok(())
            }

            fn to_json(&self) -> JsonValue {
                self.to_json_value()
            }

            fn merge_json(&mut self, value: &JsonValue, config: &CodecConfig) -> Result<()> {
                *self = <$ty as Scalar>::from_json_value(value, config)?;
                Ok(())
            }
        }
    )*};
}

scalar_field!(u32, u64, i32, i64, bool, f64, String, Vec<u8>);

/// Element type of a repeated field.
pub trait RepeatedElement: Sized + Clone + PartialEq {
    /// Numeric elements are written as one packed run.
    const PACKED: bool;
    const ELEMENT_WIRE_TYPE: WireType;
    fn write_element(&self, w: &mut Writer);
    fn read_element(r: &mut Reader<'_>) -> Result<Self>;
    fn element_to_json(&self) -> JsonValue;
    fn element_from_json(value: &JsonValue, config: &CodecConfig) -> Result<Self>;
}

macro_rules! packed_element {
    ($($ty:ty),* $(,)?) => {$(
        impl RepeatedElement for $ty {
            const PACKED: bool = true;
            const ELEMENT_WIRE_TYPE: WireType = <$ty as Scalar>::WIRE_TYPE;

            fn write_element(&self, w: &mut Writer) {
                self.write_raw(w);
            }

            fn read_element(r: &mut Reader<'_>) -> Result<Self> {
                <$ty as Scalar>::read_raw(r)
            }

            fn element_to_json(&self) -> JsonValue {
                self.to_json_value()
            }

            fn element_from_json(value: &JsonValue, config: &CodecConfig) -> Result<Self> {
                <$ty as Scalar>::from_json_value(value, config)
            }
        }
    )*};
}

packed_element!(u32, u64, i32, i64, bool, f64);

impl RepeatedElement for String {
    const PACKED: bool = false;
    const ELEMENT_WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn write_element(&self, w: &mut Writer) {
        w.string(self);
    }

    fn read_element(r: &mut Reader<'_>) -> Result<Self> {
        <String as Scalar>::read_raw(r)
    }

    fn element_to_json(&self) -> JsonValue {
        self.to_json_value()
    }

    fn element_from_json(value: &JsonValue, config: &CodecConfig) -> Result<Self> {
        <String as Scalar>::from_json_value(value, config)
    }
}

impl<M: Message> RepeatedElement for M {
    const PACKED: bool = false;
    const ELEMENT_WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn write_element(&self, w: &mut Writer) {
        w.fork();
        self.encode(w);
        w.ldelim();
    }

    fn read_element(r: &mut Reader<'_>) -> Result<Self> {
        let end = r.read_length()?;
        let mut msg = M::default();
        msg.merge_from(r, end)?;
        finish_region(r, end)?;
        Ok(msg)
    }

    fn element_to_json(&self) -> JsonValue {
        self.to_json()
    }

    fn element_from_json(value: &JsonValue, config: &CodecConfig) -> Result<Self> {
        M::from_json_with(value, config)
    }
}

impl<T: RepeatedElement> FieldValue for Vec<T> {
    fn is_default(&self) -> bool {
        self.is_empty()
    }

    fn encode(&self, number: u32, w: &mut Writer) {
        if T::PACKED {
            w.tag(number, WireType::LengthDelimited).fork();
            for item in self {
                item.write_element(w);
            }
            w.ldelim();
        } else {
            for item in self {
                w.tag(number, T::ELEMENT_WIRE_TYPE);
                item.write_element(w);
            }
        }
    }

    fn merge(&mut self, wire_type: WireType, r: &mut Reader<'_>) -> Result<()> {
        if T::PACKED && wire_type == WireType::LengthDelimited {
            let end = r.read_length()?;
            let mut run = Vec::new();
            while r.pos() < end {
                run.push(T::read_element(r)?);
            }
            if r.pos() != end {
                return Err(WireError::TruncatedMessage {
                    needed: r.pos() - end,
                    remaining: 0,
                });
            }
            self.extend(run);
        } else {
            self.push(T::read_element(r)?);
        }
        Ok(())
    }

    fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.iter().map(T::element_to_json).collect())
    }

    fn merge_json(&mut self, value: &JsonValue, config: &CodecConfig) -> Result<()> {
        // anything but an array leaves the field empty
        if let Some(items) = value.as_array() {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(T::element_from_json(item, config).map_err(|e| e.within(&i.to_string()))?);
            }
            *self = out;
        }
        Ok(())
    }
}

/// Optional embedded message; `None` is the default and is omitted.
impl<M: Message> FieldValue for Option<M> {
    fn is_default(&self) -> bool {
        self.is_none()
    }

    fn encode(&self, number: u32, w: &mut Writer) {
        if let Some(msg) = self {
            w.tag(number, WireType::LengthDelimited);
            msg.write_element(w);
        }
    }

    fn merge(&mut self, _wire_type: WireType, r: &mut Reader<'_>) -> Result<()> {
        *self = Some(M::read_element(r)?);
        Ok(())
    }

    fn to_json(&self) -> JsonValue {
        match self {
            Some(msg) => msg.to_json(),
            None => JsonValue::Null,
        }
    }

    fn merge_json(&mut self, value: &JsonValue, config: &CodecConfig) -> Result<()> {
        *self = Some(M::from_json_with(value, config)?);
        Ok(())
    }
}

/// Closed enumeration with an `UNRECOGNIZED` catch-all.
///
/// Unknown numbers and names map to the catch-all instead of failing.
pub trait Enumeration: Copy + Default + PartialEq + fmt::Debug + 'static {
    fn from_i32(value: i32) -> Self;
    fn to_i32(self) -> i32;
    fn as_str_name(self) -> &'static str;
    fn from_str_name(name: &str) -> Self;
}

impl<E: Enumeration> FieldValue for E {
    fn is_default(&self) -> bool {
        self.to_i32() == 0
    }

    fn encode(&self, number: u32, w: &mut Writer) {
        w.tag(number, WireType::Varint).int32(self.to_i32());
    }

    fn merge(&mut self, _wire_type: WireType, r: &mut Reader<'_>) -> Result<()> {
        *self = E::from_i32(r.read_int32()?);
        Ok(())
    }

    fn to_json(&self) -> JsonValue {
        JsonValue::from(self.as_str_name())
    }

    fn merge_json(&mut self, value: &JsonValue, _config: &CodecConfig) -> Result<()> {
        *self = match value {
            JsonValue::String(s) => match s.trim().parse::<i32>() {
                Ok(n) => E::from_i32(n),
                Err(_) => E::from_str_name(s),
            },
            JsonValue::Number(_) => {
                let n = json_i64(value)?;
                E::from_i32(i32::try_from(n).unwrap_or(-1))
            }
            other => {
                return Err(WireError::json(format!(
                    "expected an enum name or number, found {}",
                    json_kind(other)
                )))
            }
        };
        Ok(())
    }
}

pub(crate) fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a bool",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Non-negative integer from a JSON number or numeric string.
pub(crate) fn json_u64(value: &JsonValue) -> Result<u64> {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64)
                    .map(|f| f as u64)
            })
            .ok_or_else(|| WireError::json(format!("{} is not an unsigned integer", n))),
        JsonValue::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| WireError::json(format!("`{}` is not an unsigned integer", s))),
        other => Err(WireError::json(format!(
            "expected an unsigned integer, found {}",
            json_kind(other)
        ))),
    }
}

/// Signed integer from a JSON number or numeric string.
pub(crate) fn json_i64(value: &JsonValue) -> Result<i64> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| WireError::json(format!("{} is not an integer", n))),
        JsonValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| WireError::json(format!("`{}` is not an integer", s))),
        other => Err(WireError::json(format!("expected an integer, found {}", json_kind(other)))),
    }
}
