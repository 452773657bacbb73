//! `google.protobuf.Timestamp` carried as `Option<DateTime<Utc>>`.
//!
//! On the wire a timestamp is a nested message of `seconds` (int64, field 1)
//! and `nanos` (int32, field 2). Values cross the codec boundary at
//! millisecond precision: encoding drops sub-millisecond parts and decoding
//! truncates `nanos` to whole milliseconds.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;

use crate::codec::{finish_region, for_each_field};
use crate::config::CodecConfig;
use crate::error::{Result, WireError};
use crate::field::{json_i64, json_kind, FieldValue};
use crate::wire::{Reader, WireType, Writer};

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Raw wire form of a timestamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    /// Split a time into whole seconds and non-negative nanos.
    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        let millis = dt.timestamp_millis();
        Timestamp {
            seconds: millis.div_euclid(1000),
            nanos: (millis.rem_euclid(1000) * NANOS_PER_MILLI) as i32,
        }
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let millis = self
            .seconds
            .checked_mul(1000)?
            .checked_add(i64::from(self.nanos) / NANOS_PER_MILLI)?;
        DateTime::from_timestamp_millis(millis)
    }

    pub fn encode(&self, w: &mut Writer) {
        if self.seconds != 0 {
            w.tag(1, WireType::Varint).int64(self.seconds);
        }
        if self.nanos != 0 {
            w.tag(2, WireType::Varint).int32(self.nanos);
        }
    }

    pub fn merge_from(&mut self, r: &mut Reader<'_>, end: usize) -> Result<()> {
        for_each_field(r, end, |number, wire_type, r| match (number, wire_type) {
            (1, WireType::Varint) => {
                self.seconds = r.read_int64()?;
                Ok(())
            }
            (2, WireType::Varint) => {
                self.nanos = r.read_int32()?;
                Ok(())
            }
            (number, wire_type) => r.skip(number, wire_type),
        })
    }

    fn from_json_object(value: &JsonValue) -> Result<Self> {
        let part = |key: &str| -> Result<i64> {
            match value.get(key) {
                Some(v) if !v.is_null() => json_i64(v).map_err(|e| e.within(key)),
                _ => Ok(0),
            }
        };
        let nanos = part("nanos")?;
        Ok(Timestamp {
            seconds: part("seconds")?,
            nanos: i32::try_from(nanos)
                .map_err(|_| WireError::json(format!("nanos {} out of range", nanos)).within("nanos"))?,
        })
    }
}

fn out_of_range(ts: Timestamp) -> WireError {
    WireError::IntegerOverflow(i128::from(ts.seconds))
}

/// Parse the JSON forms a peer may send: an RFC 3339 string, epoch
/// milliseconds, or a `{seconds, nanos}` object.
pub fn datetime_from_json(value: &JsonValue) -> Result<DateTime<Utc>> {
    let dt = match value {
        JsonValue::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| WireError::json(format!("`{}` is not an RFC 3339 time: {}", s, e)))?,
        JsonValue::Number(_) => {
            let millis = json_i64(value)?;
            DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| WireError::json(format!("{} ms is outside the representable range", millis)))?
        }
        JsonValue::Object(_) => {
            let ts = Timestamp::from_json_object(value)?;
            ts.to_datetime().ok_or_else(|| out_of_range(ts))?
        }
        other => {
            return Err(WireError::json(format!(
                "expected a timestamp, found {}",
                json_kind(other)
            )))
        }
    };
    truncate_millis(dt).ok_or_else(|| WireError::json("timestamp out of range"))
}

pub fn datetime_to_json(dt: &DateTime<Utc>) -> JsonValue {
    JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn truncate_millis(dt: DateTime<Utc>) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(dt.timestamp_millis())
}

impl FieldValue for Option<DateTime<Utc>> {
    fn is_default(&self) -> bool {
        self.is_none()
    }

    fn encode(&self, number: u32, w: &mut Writer) {
        if let Some(dt) = self {
            w.tag(number, WireType::LengthDelimited).fork();
            Timestamp::from_datetime(dt).encode(w);
            w.ldelim();
        }
    }

    fn merge(&mut self, _wire_type: WireType, r: &mut Reader<'_>) -> Result<()> {
        let end = r.read_length()?;
        let mut ts = Timestamp::default();
        ts.merge_from(r, end)?;
        finish_region(r, end)?;
        *self = Some(ts.to_datetime().ok_or_else(|| out_of_range(ts))?);
        Ok(())
    }

    fn to_json(&self) -> JsonValue {
        match self {
            Some(dt) => datetime_to_json(dt),
            None => JsonValue::Null,
        }
    }

    fn merge_json(&mut self, value: &JsonValue, _config: &CodecConfig) -> Result<()> {
        *self = Some(datetime_from_json(value)?);
        Ok(())
    }
}
