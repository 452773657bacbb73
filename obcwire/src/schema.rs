//! Declarative message schemas.
//!
//! Every message type publishes a `MessageDescriptor`: its ordered field
//! list. The codec engine walks this list to encode, decode and map JSON,
//! so a message type only has to say which field lives behind which number.

use crate::wire::WireType;

/// Semantic type of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Bool,
    Double,
    String,
    Bytes,
    /// Named enumeration, encoded as an int32 varint.
    Enum(&'static str),
    /// `google.protobuf.Timestamp`, carried as a nested message.
    Timestamp,
    /// Named nested message.
    Message(&'static str),
}

impl Kind {
    pub const fn wire_type(self) -> WireType {
        match self {
            Kind::Uint32 | Kind::Uint64 | Kind::Sint32 | Kind::Sint64 | Kind::Bool | Kind::Enum(_) => {
                WireType::Varint
            }
            Kind::Double => WireType::Fixed64,
            Kind::String | Kind::Bytes | Kind::Timestamp | Kind::Message(_) => {
                WireType::LengthDelimited
            }
        }
    }

    /// Scalar kinds that may be packed when repeated.
    pub const fn is_packable(self) -> bool {
        matches!(self.wire_type(), WireType::Varint | WireType::Fixed64)
    }

    /// Name used in scheme files and descriptor listings.
    pub fn type_name(self) -> &'static str {
        match self {
            Kind::Uint32 => "uint32",
            Kind::Uint64 => "uint64",
            Kind::Sint32 => "sint32",
            Kind::Sint64 => "sint64",
            Kind::Bool => "bool",
            Kind::Double => "double",
            Kind::String => "string",
            Kind::Bytes => "bytes",
            Kind::Timestamp => "timestamp",
            Kind::Enum(name) | Kind::Message(name) => name,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Stable wire identity.
    pub number: u32,
    /// Rust field name.
    pub name: &'static str,
    /// lowerCamelCase key in the JSON mapping.
    pub json_name: &'static str,
    pub kind: Kind,
    pub repeated: bool,
}

impl FieldDescriptor {
    pub const fn new(number: u32, name: &'static str, json_name: &'static str, kind: Kind) -> Self {
        FieldDescriptor {
            number,
            name,
            json_name,
            kind,
            repeated: false,
        }
    }

    pub const fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    pub const fn is_packed(&self) -> bool {
        self.repeated && self.kind.is_packable()
    }

    /// Wire type used when this field is written.
    pub const fn wire_type(&self) -> WireType {
        if self.is_packed() {
            WireType::LengthDelimited
        } else {
            self.kind.wire_type()
        }
    }

    /// Whether a value framed as `wire_type` may be merged into this field.
    ///
    /// Repeated numerics take both the packed run and single elements.
    pub fn accepts(&self, wire_type: WireType) -> bool {
        wire_type == self.kind.wire_type() || (self.is_packed() && wire_type == WireType::LengthDelimited)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub name: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl MessageDescriptor {
    pub fn field(&self, number: u32) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.number == number)
    }

    pub fn field_by_json_name(&self, json_name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.json_name == json_name)
    }

    /// Check field numbers are non-zero, unique and within the tag range.
    pub fn validate(&self) -> Result<(), String> {
        for (i, f) in self.fields.iter().enumerate() {
            if f.number == 0 || f.number > (u32::MAX >> 3) {
                return Err(format!("{}.{}: field number {} out of range", self.name, f.name, f.number));
            }
            if let Some(dup) = self.fields[..i].iter().find(|g| g.number == f.number) {
                return Err(format!(
                    "{}: field number {} used by both `{}` and `{}`",
                    self.name, f.number, dup.name, f.name
                ));
            }
        }
        Ok(())
    }
}
