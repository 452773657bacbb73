//! Type-erased JSON <-> wire conversion, for tools that pick message types
//! by name at runtime.

use core::fmt;
use core::str::FromStr;

use serde_json::{json, Value as JsonValue};

use crate::catalog::Command;
use crate::codec::Message;
use crate::config::CodecConfig;
use crate::envelope::Response;
use crate::error::Result;
use crate::schema::MessageDescriptor;

/// Which half of a command exchange a payload belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Args,
    Response,
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s {
            "args" | "request" => Ok(Side::Args),
            "response" => Ok(Side::Response),
            other => Err(format!("expected `args` or `response`, got `{}`", other)),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Args => "args",
            Side::Response => "response",
        })
    }
}

/// Conversion entry points of one concrete message type.
#[derive(Clone, Copy)]
pub struct MessageCodec {
    pub descriptor: fn() -> MessageDescriptor,
    pub json_to_wire: fn(&JsonValue, &CodecConfig) -> Result<Vec<u8>>,
    pub wire_to_json: fn(&[u8], &CodecConfig) -> Result<JsonValue>,
}

impl MessageCodec {
    pub fn of<M: Message>() -> Self {
        MessageCodec {
            descriptor: M::descriptor,
            json_to_wire: json_to_wire::<M>,
            wire_to_json: wire_to_json::<M>,
        }
    }

    pub fn name(&self) -> &'static str {
        (self.descriptor)().name
    }
}

impl fmt::Debug for MessageCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageCodec").field(&self.name()).finish()
    }
}

/// Both halves of a command.
#[derive(Clone, Copy, Debug)]
pub struct CommandCodecs {
    pub args: MessageCodec,
    pub response: MessageCodec,
}

impl CommandCodecs {
    pub fn of<C: Command>() -> Self {
        CommandCodecs {
            args: MessageCodec::of::<C::Args>(),
            response: MessageCodec::of::<Response<C::Data>>(),
        }
    }

    pub fn side(&self, side: Side) -> &MessageCodec {
        match side {
            Side::Args => &self.args,
            Side::Response => &self.response,
        }
    }
}

pub fn json_to_wire<M: Message>(value: &JsonValue, config: &CodecConfig) -> Result<Vec<u8>> {
    Ok(M::from_json_with(value, config)?.encode_to_vec())
}

pub fn wire_to_json<M: Message>(bytes: &[u8], config: &CodecConfig) -> Result<JsonValue> {
    Ok(M::decode_with(bytes, *config)?.to_json())
}

/// Field table of a message as JSON, for listings.
pub fn describe(desc: &MessageDescriptor) -> JsonValue {
    let fields: Vec<JsonValue> = desc
        .fields
        .iter()
        .map(|f| {
            json!({
                "number": f.number,
                "name": f.json_name,
                "type": f.kind.type_name(),
                "repeated": f.repeated,
                "packed": f.is_packed(),
            })
        })
        .collect();
    json!({ "name": desc.name, "fields": fields })
}
