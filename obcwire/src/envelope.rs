#![allow(non_camel_case_types)]

//! Response envelope shared by every command.
//!
//! ```text
//! Response
//! | cmdInstId u64 | cmdId u32 | dateTime ts | flags u32 | dataHeader {code, execDatetime} | data? |
//! |      1        |     2     |      3      |     4     |               5                 |   6   |
//! ```
//!
//! Field 6 exists only for commands that define a payload; `Empty` marks
//! the ones that do not.

use chrono::{DateTime, Utc};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::codec::Message;
use crate::field::{Enumeration, FieldValue};
use crate::schema::{FieldDescriptor, Kind, MessageDescriptor};

/// Outcome of a command as reported by the OBC.
#[repr(i32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, FromPrimitive, IntoPrimitive)]
pub enum Code {
    NONE = 0,
    SUCCESS = 1,
    /// Accepted and scheduled for later execution.
    SUCCESS_SCHED = 2,
    ERROR = 3,
    /// Command does not exist.
    CMD_DNE = 4,
    NOT_IMPL = 5,
    #[num_enum(default)]
    UNRECOGNIZED = -1,
}

impl Default for Code {
    fn default() -> Self {
        Code::NONE
    }
}

impl Enumeration for Code {
    fn from_i32(value: i32) -> Self {
        Code::from(value)
    }

    fn to_i32(self) -> i32 {
        self.into()
    }

    fn as_str_name(self) -> &'static str {
        match self {
            Code::NONE => "NONE",
            Code::SUCCESS => "SUCCESS",
            Code::SUCCESS_SCHED => "SUCCESS_SCHED",
            Code::ERROR => "ERROR",
            Code::CMD_DNE => "CMD_DNE",
            Code::NOT_IMPL => "NOT_IMPL",
            Code::UNRECOGNIZED => "UNRECOGNIZED",
        }
    }

    fn from_str_name(name: &str) -> Self {
        match name {
            "NONE" => Code::NONE,
            "SUCCESS" => Code::SUCCESS,
            "SUCCESS_SCHED" => Code::SUCCESS_SCHED,
            "ERROR" => Code::ERROR,
            "CMD_DNE" => Code::CMD_DNE,
            "NOT_IMPL" => Code::NOT_IMPL,
            _ => Code::UNRECOGNIZED,
        }
    }
}

impl Code {
    pub fn is_success(self) -> bool {
        matches!(self, Code::SUCCESS | Code::SUCCESS_SCHED)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObcResponseDataHeader {
    pub code: Code,
    pub exec_datetime: Option<DateTime<Utc>>,
}

static DATA_HEADER_FIELDS: [FieldDescriptor; 2] = [
    FieldDescriptor::new(1, "code", "code", Kind::Enum("Code")),
    FieldDescriptor::new(2, "exec_datetime", "execDatetime", Kind::Timestamp),
];

impl Message for ObcResponseDataHeader {
    fn descriptor() -> MessageDescriptor {
        MessageDescriptor {
            name: "OBCResponseDataHeader",
            fields: &DATA_HEADER_FIELDS,
        }
    }

    fn field(&self, number: u32) -> Option<&dyn FieldValue> {
        match number {
            1 => Some(&self.code as &dyn FieldValue),
            2 => Some(&self.exec_datetime as &dyn FieldValue),
            _ => None,
        }
    }

    fn field_mut(&mut self, number: u32) -> Option<&mut dyn FieldValue> {
        match number {
            1 => Some(&mut self.code as &mut dyn FieldValue),
            2 => Some(&mut self.exec_datetime as &mut dyn FieldValue),
            _ => None,
        }
    }
}

/// Envelope fields of a response whose payload has type `data_type`.
pub const fn response_fields(data_type: &'static str) -> [FieldDescriptor; 6] {
    [
        FieldDescriptor::new(1, "cmd_inst_id", "cmdInstId", Kind::Uint64),
        FieldDescriptor::new(2, "cmd_id", "cmdId", Kind::Uint32),
        FieldDescriptor::new(3, "date_time", "dateTime", Kind::Timestamp),
        FieldDescriptor::new(4, "flags", "flags", Kind::Uint32),
        FieldDescriptor::new(
            5,
            "data_header",
            "dataHeader",
            Kind::Message("OBCResponseDataHeader"),
        ),
        FieldDescriptor::new(6, "data", "data", Kind::Message(data_type)),
    ]
}

static EMPTY_RESPONSE_FIELDS: [FieldDescriptor; 5] = {
    let [a, b, c, d, e, _] = response_fields("");
    [a, b, c, d, e]
};

/// Payload carried in field 6 of a command response.
pub trait Payload: Message {
    /// Descriptor of the full response wrapping this payload.
    const RESPONSE: MessageDescriptor;
    const HAS_DATA: bool = true;
}

/// Marker payload for commands that return only the envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Empty;

impl Message for Empty {
    fn descriptor() -> MessageDescriptor {
        MessageDescriptor {
            name: "Empty",
            fields: &[],
        }
    }

    fn field(&self, _number: u32) -> Option<&dyn FieldValue> {
        None
    }

    fn field_mut(&mut self, _number: u32) -> Option<&mut dyn FieldValue> {
        None
    }
}

impl Payload for Empty {
    const RESPONSE: MessageDescriptor = MessageDescriptor {
        name: "Response",
        fields: &EMPTY_RESPONSE_FIELDS,
    };
    const HAS_DATA: bool = false;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Response<D> {
    pub cmd_inst_id: u64,
    pub cmd_id: u32,
    pub date_time: Option<DateTime<Utc>>,
    pub flags: u32,
    pub data_header: Option<ObcResponseDataHeader>,
    pub data: Option<D>,
}

impl<D: Payload> Response<D> {
    pub fn new(cmd_id: u32) -> Self {
        Response {
            cmd_id,
            ..Self::default()
        }
    }

    /// Set the status code, creating the data header if needed.
    pub fn code(&mut self, code: Code) -> &mut Self {
        self.data_header.get_or_insert_with(Default::default).code = code;
        self
    }

    pub fn exec_datetime(&mut self, at: DateTime<Utc>) -> &mut Self {
        self.data_header.get_or_insert_with(Default::default).exec_datetime = Some(at);
        self
    }

    pub fn inst_id(&mut self, cmd_inst_id: u64) -> &mut Self {
        self.cmd_inst_id = cmd_inst_id;
        self
    }

    pub fn flags(&mut self, flags: u32) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Attach the payload. Ignored for payload-less commands.
    pub fn data(&mut self, data: D) -> &mut Self {
        if D::HAS_DATA {
            self.data = Some(data);
        }
        self
    }

    /// Status code; a response without a data header reports `NONE`.
    pub fn status(&self) -> Code {
        self.data_header.as_ref().map(|h| h.code).unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }
}

impl<D: Payload> Message for Response<D> {
    fn descriptor() -> MessageDescriptor {
        D::RESPONSE
    }

    fn field(&self, number: u32) -> Option<&dyn FieldValue> {
        Some(match number {
            1 => &self.cmd_inst_id as &dyn FieldValue,
            2 => &self.cmd_id,
            3 => &self.date_time,
            4 => &self.flags,
            5 => &self.data_header,
            6 if D::HAS_DATA => &self.data,
            _ => return None,
        })
    }

    fn field_mut(&mut self, number: u32) -> Option<&mut dyn FieldValue> {
        Some(match number {
            1 => &mut self.cmd_inst_id as &mut dyn FieldValue,
            2 => &mut self.cmd_id,
            3 => &mut self.date_time,
            4 => &mut self.flags,
            5 => &mut self.data_header,
            6 if D::HAS_DATA => &mut self.data,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::{full_sample, Sample};
    use crate::error::WireError;
    use crate::wire::{WireType, Writer};
    use chrono::TimeZone;
    use serde_json::json;

    impl Payload for Sample {
        const RESPONSE: MessageDescriptor = MessageDescriptor {
            name: "SampleCommandResponse",
            fields: &response_fields("Sample"),
        };
    }

    #[test]
    fn code_numbers_and_names() {
        assert_eq!(Code::from_i32(4), Code::CMD_DNE);
        assert_eq!(Code::from_i32(99), Code::UNRECOGNIZED);
        assert_eq!(Code::from_i32(-7), Code::UNRECOGNIZED);
        assert_eq!(Code::UNRECOGNIZED.to_i32(), -1);
        assert_eq!(Code::from_str_name("SUCCESS_SCHED"), Code::SUCCESS_SCHED);
        assert_eq!(Code::from_str_name("success"), Code::UNRECOGNIZED);
        assert!(Code::SUCCESS_SCHED.is_success());
        assert!(!Code::NOT_IMPL.is_success());
    }

    #[test]
    fn header_json() {
        let header = ObcResponseDataHeader {
            code: Code::SUCCESS,
            exec_datetime: Some(Utc.timestamp_opt(1_704_067_200, 0).unwrap()),
        };
        assert_eq!(
            header.to_json(),
            json!({ "code": "SUCCESS", "execDatetime": "2024-01-01T00:00:00.000Z" })
        );
        assert_eq!(ObcResponseDataHeader::from_json(&header.to_json()), Ok(header));
    }

    #[test]
    fn unknown_code_decodes_to_unrecognized() {
        let mut w = Writer::new();
        w.tag(1, WireType::Varint).int32(99);
        let header = ObcResponseDataHeader::decode(&w.finish()).unwrap();
        assert_eq!(header.code, Code::UNRECOGNIZED);
    }

    #[test]
    fn payload_less_response_has_no_field_six() {
        let desc = Response::<Empty>::descriptor();
        assert_eq!(desc.fields.len(), 5);
        assert!(desc.field(6).is_none());

        // a peer that sends field 6 anyway is skipped, not an error
        let mut w = Writer::new();
        w.tag(2, WireType::Varint).uint32(2);
        w.tag(6, WireType::LengthDelimited).bytes(&[0x08, 0x01]);
        let resp = Response::<Empty>::decode(&w.finish()).unwrap();
        assert_eq!(resp.cmd_id, 2);
        assert_eq!(resp.data, None);

        let mut resp = Response::<Empty>::new(2);
        resp.data(Empty);
        assert_eq!(resp.data, None);
    }

    #[test]
    fn response_round_trip_with_payload() {
        let mut resp = Response::<Sample>::new(9);
        resp.inst_id(77)
            .flags(0b101)
            .code(Code::SUCCESS)
            .exec_datetime(Utc.timestamp_opt(1_704_067_201, 0).unwrap())
            .data(full_sample());
        assert!(resp.is_success());
        assert_eq!(Response::<Sample>::descriptor().name, "SampleCommandResponse");

        let bytes = resp.encode_to_vec();
        assert_eq!(&bytes[..2], &[0x08, 77]);
        assert_eq!(Response::<Sample>::decode(&bytes), Ok(resp.clone()));

        let json = resp.to_json();
        assert_eq!(json["cmdInstId"], json!(77));
        assert_eq!(json["dataHeader"]["code"], json!("SUCCESS"));
        assert_eq!(Response::<Sample>::from_json(&json), Ok(resp));
    }

    #[test]
    fn missing_header_reads_as_none() {
        let resp = Response::<Empty>::decode(&[0x10, 0x02]).unwrap();
        assert_eq!(resp.status(), Code::NONE);
        assert!(matches!(
            Response::<Empty>::decode(&[0x2A, 0x04, 0x08]),
            Err(WireError::TruncatedMessage { .. })
        ));
    }
}
