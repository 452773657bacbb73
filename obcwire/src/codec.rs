//! Descriptor-driven encode, decode and JSON mapping.
//!
//! A message type supplies its descriptor and a way to reach each field by
//! number; every other operation is provided here once, for all messages.
//!
//! ```text
//!   encode:  for field in descriptor order, skip defaults, write tag + value
//!   decode:  loop { tag -> descriptor lookup -> merge | skip } until end
//! ```

use core::fmt;

use log::trace;
use serde_json::{Map, Value as JsonValue};

use crate::config::CodecConfig;
use crate::error::{Result, WireError};
use crate::field::FieldValue;
use crate::schema::MessageDescriptor;
use crate::wire::{tag_field_number, tag_wire_type, Reader, WireType, Writer};

pub trait Message: Default + Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    fn descriptor() -> MessageDescriptor;

    fn field(&self, number: u32) -> Option<&dyn FieldValue>;

    fn field_mut(&mut self, number: u32) -> Option<&mut dyn FieldValue>;

    /// Append this message's fields to `w`, without a length prefix.
    fn encode(&self, w: &mut Writer) {
        for fd in Self::descriptor().fields {
            if let Some(value) = self.field(fd.number) {
                if !value.is_default() {
                    value.encode(fd.number, w);
                }
            }
        }
    }

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.finish()
    }

    /// Merge fields from `r` until the absolute offset `end`.
    ///
    /// Unknown fields and fields framed with an unexpected wire type are
    /// skipped. A later occurrence of a singular field replaces the earlier
    /// one; repeated fields accumulate.
    fn merge_from(&mut self, r: &mut Reader<'_>, end: usize) -> Result<()> {
        let desc = Self::descriptor();
        for_each_field(r, end, |number, wire_type, r| {
            match (desc.field(number), self.field_mut(number)) {
                (Some(fd), Some(value)) if fd.accepts(wire_type) => value.merge(wire_type, r),
                _ => {
                    trace!("{}: skipping field {} ({:?})", desc.name, number, wire_type);
                    r.skip(number, wire_type)
                }
            }
        })
    }

    /// Decode from the reader's current position. With `length` set, exactly
    /// that many bytes are consumed; otherwise the rest of the buffer is.
    fn decode_from(r: &mut Reader<'_>, length: Option<usize>) -> Result<Self> {
        let end = match length {
            Some(len) if len > r.remaining() => {
                return Err(WireError::TruncatedMessage {
                    needed: len,
                    remaining: r.remaining(),
                })
            }
            Some(len) => r.pos() + len,
            None => r.len(),
        };
        let mut msg = Self::default();
        msg.merge_from(r, end)?;
        if length.is_some() {
            finish_region(r, end)?;
        }
        Ok(msg)
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        Self::decode_with(buf, CodecConfig::default())
    }

    fn decode_with(buf: &[u8], config: CodecConfig) -> Result<Self> {
        Self::decode_from(&mut Reader::with_config(buf, config), None)
    }

    /// JSON object with lowerCamelCase keys; default-valued fields omitted.
    fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        for fd in Self::descriptor().fields {
            if let Some(value) = self.field(fd.number) {
                if !value.is_default() {
                    map.insert(fd.json_name.to_string(), value.to_json());
                }
            }
        }
        JsonValue::Object(map)
    }

    fn from_json(value: &JsonValue) -> Result<Self> {
        Self::from_json_with(value, &CodecConfig::default())
    }

    /// Build a message from JSON. Missing and null keys keep their
    /// defaults, unknown keys are ignored, and either the JSON name or the
    /// field name is accepted as key.
    fn from_json_with(value: &JsonValue, config: &CodecConfig) -> Result<Self> {
        let desc = Self::descriptor();
        let obj = value.as_object().ok_or_else(|| {
            WireError::json(format!(
                "expected an object for {}, found {}",
                desc.name,
                crate::field::json_kind(value)
            ))
        })?;
        let mut msg = Self::default();
        for fd in desc.fields {
            let item = match obj.get(fd.json_name).or_else(|| obj.get(fd.name)) {
                Some(item) if !item.is_null() => item,
                _ => continue,
            };
            if let Some(field) = msg.field_mut(fd.number) {
                field
                    .merge_json(item, config)
                    .map_err(|e| e.within(fd.json_name))?;
            }
        }
        Ok(msg)
    }
}

/// Drive the tag loop of one message body ending at `end`.
///
/// A zero tag or an end-group marker stops the loop early. Reading past
/// `end` means the last field overran the body and is reported as
/// truncation.
/// A length-delimited body must be consumed up to its `end`; stopping
/// early on a terminator tag is malformed.
pub(crate) fn finish_region(r: &Reader<'_>, end: usize) -> Result<()> {
    if r.pos() < end {
        return Err(WireError::UnexpectedEndTag { pos: r.pos(), end });
    }
    Ok(())
}

pub fn for_each_field<F>(r: &mut Reader<'_>, end: usize, mut f: F) -> Result<()>
where
    F: FnMut(u32, WireType, &mut Reader<'_>) -> Result<()>,
{
    while r.pos() < end {
        let tag = r.read_tag()?;
        if tag == 0 || tag & 7 == WireType::EndGroup as u32 {
            break;
        }
        let wire_type = tag_wire_type(tag)?;
        f(tag_field_number(tag), wire_type, r)?;
    }
    if r.pos() > end {
        return Err(WireError::TruncatedMessage {
            needed: r.pos() - end,
            remaining: 0,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::field::Enumeration;
    use crate::schema::{FieldDescriptor, Kind};
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;
    use serde_json::json;

    #[allow(non_camel_case_types)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Mode {
        OFF,
        ON,
        UNRECOGNIZED,
    }

    impl Default for Mode {
        fn default() -> Self {
            Mode::OFF
        }
    }

    impl Enumeration for Mode {
        fn from_i32(value: i32) -> Self {
            match value {
                0 => Mode::OFF,
                1 => Mode::ON,
                _ => Mode::UNRECOGNIZED,
            }
        }

        fn to_i32(self) -> i32 {
            match self {
                Mode::OFF => 0,
                Mode::ON => 1,
                Mode::UNRECOGNIZED => -1,
            }
        }

        fn as_str_name(self) -> &'static str {
            match self {
                Mode::OFF => "OFF",
                Mode::ON => "ON",
                Mode::UNRECOGNIZED => "UNRECOGNIZED",
            }
        }

        fn from_str_name(name: &str) -> Self {
            match name {
                "OFF" => Mode::OFF,
                "ON" => Mode::ON,
                _ => Mode::UNRECOGNIZED,
            }
        }
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Inner {
        pub id: u32,
        pub label: String,
    }

    static INNER_FIELDS: [FieldDescriptor; 2] = [
        FieldDescriptor::new(1, "id", "id", Kind::Uint32),
        FieldDescriptor::new(2, "label", "label", Kind::String),
    ];

    impl Message for Inner {
        fn descriptor() -> MessageDescriptor {
            MessageDescriptor {
                name: "Inner",
                fields: &INNER_FIELDS,
            }
        }

        fn field(&self, number: u32) -> Option<&dyn FieldValue> {
            match number {
                1 => Some(&self.id as &dyn FieldValue),
                2 => Some(&self.label as &dyn FieldValue),
                _ => None,
            }
        }

        fn field_mut(&mut self, number: u32) -> Option<&mut dyn FieldValue> {
            match number {
                1 => Some(&mut self.id as &mut dyn FieldValue),
                2 => Some(&mut self.label as &mut dyn FieldValue),
                _ => None,
            }
        }
    }

    /// One field of every kind.
    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Sample {
        pub count: u32,
        pub total: u64,
        pub delta: i32,
        pub drift: i64,
        pub ok: bool,
        pub ratio: f64,
        pub name: String,
        pub blob: Vec<u8>,
        pub mode: Mode,
        pub at: Option<DateTime<Utc>>,
        pub inner: Option<Inner>,
        pub offsets: Vec<i32>,
        pub tags: Vec<String>,
        pub items: Vec<Inner>,
    }

    static SAMPLE_FIELDS: [FieldDescriptor; 14] = [
        FieldDescriptor::new(1, "count", "count", Kind::Uint32),
        FieldDescriptor::new(2, "total", "total", Kind::Uint64),
        FieldDescriptor::new(3, "delta", "delta", Kind::Sint32),
        FieldDescriptor::new(4, "drift", "drift", Kind::Sint64),
        FieldDescriptor::new(5, "ok", "ok", Kind::Bool),
        FieldDescriptor::new(6, "ratio", "ratio", Kind::Double),
        FieldDescriptor::new(7, "name", "name", Kind::String),
        FieldDescriptor::new(8, "blob", "blob", Kind::Bytes),
        FieldDescriptor::new(9, "mode", "mode", Kind::Enum("Mode")),
        FieldDescriptor::new(10, "at", "at", Kind::Timestamp),
        FieldDescriptor::new(11, "inner", "inner", Kind::Message("Inner")),
        FieldDescriptor::new(12, "offsets", "offsets", Kind::Sint32).repeated(),
        FieldDescriptor::new(13, "tags", "tags", Kind::String).repeated(),
        FieldDescriptor::new(14, "items", "items", Kind::Message("Inner")).repeated(),
    ];

    impl Message for Sample {
        fn descriptor() -> MessageDescriptor {
            MessageDescriptor {
                name: "Sample",
                fields: &SAMPLE_FIELDS,
            }
        }

        fn field(&self, number: u32) -> Option<&dyn FieldValue> {
            Some(match number {
                1 => &self.count as &dyn FieldValue,
                2 => &self.total,
                3 => &self.delta,
                4 => &self.drift,
                5 => &self.ok,
                6 => &self.ratio,
                7 => &self.name,
                8 => &self.blob,
                9 => &self.mode,
                10 => &self.at,
                11 => &self.inner,
                12 => &self.offsets,
                13 => &self.tags,
                14 => &self.items,
                _ => return None,
            })
        }

        fn field_mut(&mut self, number: u32) -> Option<&mut dyn FieldValue> {
            Some(match number {
                1 => &mut self.count as &mut dyn FieldValue,
                2 => &mut self.total,
                3 => &mut self.delta,
                4 => &mut self.drift,
                5 => &mut self.ok,
                6 => &mut self.ratio,
                7 => &mut self.name,
                8 => &mut self.blob,
                9 => &mut self.mode,
                10 => &mut self.at,
                11 => &mut self.inner,
                12 => &mut self.offsets,
                13 => &mut self.tags,
                14 => &mut self.items,
                _ => return None,
            })
        }
    }

    pub fn full_sample() -> Sample {
        Sample {
            count: 7,
            total: 5000,
            delta: -12,
            drift: -70_000,
            ok: true,
            ratio: 0.25,
            name: "obc".into(),
            blob: vec![0xDE, 0xAD],
            mode: Mode::ON,
            at: Some(Utc.timestamp_opt(1_704_067_200, 0).unwrap()),
            inner: Some(Inner {
                id: 3,
                label: "imu".into(),
            }),
            offsets: vec![-1, 0, 250],
            tags: vec!["a".into(), String::new()],
            items: vec![Inner::default(), Inner { id: 9, label: String::new() }],
        }
    }

    #[test]
    fn default_message_encodes_to_nothing() {
        assert!(Sample::default().encode_to_vec().is_empty());
        assert_eq!(Sample::decode(&[]), Ok(Sample::default()));
        assert_eq!(Sample::default().to_json(), json!({}));
    }

    #[test]
    fn full_round_trip() {
        let sample = full_sample();
        let bytes = sample.encode_to_vec();
        assert_eq!(Sample::decode(&bytes), Ok(sample.clone()));
        assert_eq!(Sample::from_json(&sample.to_json()), Ok(sample));
    }

    #[test]
    fn fields_are_written_in_descriptor_order() {
        let mut sample = Sample::default();
        sample.name = "x".into();
        sample.count = 1;
        assert_eq!(sample.encode_to_vec(), [0x08, 0x01, 0x3A, 0x01, b'x']);
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let mut w = Writer::new();
        w.tag(40, WireType::Varint).uint64(99);
        w.tag(1, WireType::Varint).uint32(5);
        w.tag(41, WireType::LengthDelimited).bytes(b"junk");
        w.tag(42, WireType::Fixed32).fixed32(1);
        w.tag(43, WireType::Fixed64).double(1.0);
        let sample = Sample::decode(&w.finish()).unwrap();
        assert_eq!(sample.count, 5);
        assert_eq!(sample, Sample { count: 5, ..Sample::default() });
    }

    #[test]
    fn mismatched_wire_type_is_skipped() {
        let mut w = Writer::new();
        // `count` is a varint; a length-delimited value under its number is ignored
        w.tag(1, WireType::LengthDelimited).bytes(b"zz");
        w.tag(5, WireType::Varint).bool(true);
        let sample = Sample::decode(&w.finish()).unwrap();
        assert_eq!(sample.count, 0);
        assert!(sample.ok);
    }

    #[test]
    fn later_singular_value_wins_and_repeated_accumulate() {
        let mut w = Writer::new();
        w.tag(1, WireType::Varint).uint32(1);
        w.tag(13, WireType::LengthDelimited).string("a");
        w.tag(1, WireType::Varint).uint32(2);
        w.tag(13, WireType::LengthDelimited).string("b");
        let sample = Sample::decode(&w.finish()).unwrap();
        assert_eq!(sample.count, 2);
        assert_eq!(sample.tags, vec!["a", "b"]);
    }

    #[test]
    fn unknown_enum_number_is_unrecognized() {
        let mut w = Writer::new();
        w.tag(9, WireType::Varint).int32(99);
        let sample = Sample::decode(&w.finish()).unwrap();
        assert_eq!(sample.mode, Mode::UNRECOGNIZED);
        assert_eq!(sample.to_json(), json!({ "mode": "UNRECOGNIZED" }));
    }

    #[test]
    fn truncation_and_bad_wire_types() {
        let bytes = full_sample().encode_to_vec();
        for cut in 1..bytes.len() {
            // every strict prefix either fails or decodes a subset, never panics
            let _ = Sample::decode(&bytes[..cut]);
        }
        assert!(matches!(
            Sample::decode(&[0x3A, 0x05, b'a']),
            Err(WireError::TruncatedMessage { .. })
        ));
        assert_eq!(Sample::decode(&[0x0E]), Err(WireError::InvalidWireType(6)));
        assert_eq!(Sample::decode(&[0x88]), Err(WireError::MalformedVarint));
    }

    #[test]
    fn decode_from_honours_length() {
        let inner = Inner {
            id: 4,
            label: "x".into(),
        };
        let mut bytes = inner.encode_to_vec();
        let body = bytes.len();
        bytes.extend_from_slice(&[0x08, 0x07]);
        let mut r = Reader::new(&bytes);
        assert_eq!(Inner::decode_from(&mut r, Some(body)), Ok(inner));
        assert_eq!(r.remaining(), 2);
        assert!(matches!(
            Inner::decode_from(&mut r, Some(9)),
            Err(WireError::TruncatedMessage { needed: 9, remaining: 2 })
        ));
    }

    #[test]
    fn zero_tag_ends_the_message() {
        let sample = Sample::decode(&[0x08, 0x03, 0x00, 0x08, 0x04]).unwrap();
        assert_eq!(sample.count, 3);
    }

    #[test]
    fn terminator_inside_nested_message_is_rejected() {
        // `inner` claims 4 bytes but stops on a zero tag after the first
        let bytes = [0x5A, 0x04, 0x00, 0x08, 0x03, 0x00];
        assert_eq!(
            Sample::decode(&bytes),
            Err(WireError::UnexpectedEndTag { pos: 3, end: 6 })
        );
        // same inside a repeated element
        let bytes = [0x72, 0x04, 0x08, 0x01, 0x0C, 0x08, 0x05];
        assert_eq!(
            Sample::decode(&bytes),
            Err(WireError::UnexpectedEndTag { pos: 5, end: 6 })
        );
        let mut r = Reader::new(&[0x08, 0x01, 0x00, 0x08, 0x02]);
        assert_eq!(
            Inner::decode_from(&mut r, Some(5)),
            Err(WireError::UnexpectedEndTag { pos: 3, end: 5 })
        );
    }

    #[test]
    fn runaway_group_nesting_fails_cleanly() {
        assert_eq!(
            Sample::decode(&vec![0x1B; 50_000]),
            Err(WireError::GroupTooDeep(crate::wire::MAX_GROUP_DEPTH))
        );
    }

    #[test]
    fn json_shape() {
        let json = full_sample().to_json();
        assert_eq!(json["total"], json!(5000));
        assert_eq!(json["blob"], json!("3q0="));
        assert_eq!(json["mode"], json!("ON"));
        assert_eq!(json["at"], json!("2024-01-01T00:00:00.000Z"));
        assert_eq!(json["inner"], json!({ "id": 3, "label": "imu" }));
        assert_eq!(json["items"], json!([{}, { "id": 9 }]));
    }

    #[test]
    fn json_import_reports_nested_path() {
        let err = Sample::from_json(&json!({ "inner": { "id": "three" } })).unwrap_err();
        assert!(matches!(err, WireError::InvalidJson { ref path, .. } if path == "inner.id"));
        assert!(Sample::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn json_import_is_lenient() {
        let sample = Sample::from_json(&json!({
            "count": "12",
            "mode": 1,
            "ratio": "NaN",
            "unknownKey": true,
            "name": null,
            "offsets": "not a list",
        }))
        .unwrap();
        assert_eq!(sample.count, 12);
        assert_eq!(sample.mode, Mode::ON);
        assert!(sample.ratio.is_nan());
        assert!(sample.name.is_empty());
        assert!(sample.offsets.is_empty());
    }

    fn arb_inner() -> impl Strategy<Value = Inner> {
        (any::<u32>(), "[a-z]{0,6}").prop_map(|(id, label)| Inner { id, label })
    }

    proptest! {
        #[test]
        fn wire_round_trip(
            count in any::<u32>(),
            total in 0u64..=crate::config::MAX_SAFE_INTEGER,
            delta in any::<i32>(),
            ratio in -1e9f64..1e9,
            name in ".{0,12}",
            blob in proptest::collection::vec(any::<u8>(), 0..16),
            millis in -62_135_596_800_000i64..253_402_300_799_000,
            inner in proptest::option::of(arb_inner()),
            offsets in proptest::collection::vec(any::<i32>(), 0..8),
            items in proptest::collection::vec(arb_inner(), 0..4),
        ) {
            let sample = Sample {
                count,
                total,
                delta,
                ratio,
                name,
                blob,
                at: DateTime::from_timestamp_millis(millis),
                inner,
                offsets,
                items,
                ..Sample::default()
            };
            let bytes = sample.encode_to_vec();
            prop_assert_eq!(Sample::decode(&bytes), Ok(sample.clone()));
            prop_assert_eq!(Sample::from_json(&sample.to_json()), Ok(sample));
        }
    }
}
