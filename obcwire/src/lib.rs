//! Protocol-Buffers compatible codec and unary command envelope for the
//! on-board computer link.

mod config;
mod error;

pub mod catalog;
pub mod codec;
pub mod envelope;
pub mod field;
pub mod rpc;
pub mod schema;
pub mod timestamp;
pub mod transcode;
pub mod varint;
pub mod wire;

pub use catalog::*;
pub use codec::Message;
pub use config::*;
pub use envelope::*;
pub use error::*;
pub use field::{Enumeration, FieldValue};
pub use rpc::*;
pub use schema::*;
pub use transcode::{CommandCodecs, MessageCodec, Side};
pub use wire::{Reader, WireType, Writer};

// used by generated code
pub use chrono;
