//! Static command catalog.

use chrono::{DateTime, Utc};

use crate::codec::Message;
use crate::envelope::Payload;

/// Arguments of a telecommand. Every command accepts `timeout` (field 1)
/// and `dateTime` (field 2); its own fields start at 3.
pub trait CommandArgs: Message {
    fn timeout(&self) -> u64;
    fn date_time(&self) -> Option<DateTime<Utc>>;
}

/// A unary command: one args message in, one response out.
pub trait Command: Send + Sync + 'static {
    const NAME: &'static str;
    const ID: u32;
    type Args: CommandArgs;
    type Data: Payload;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: &'static str,
    pub id: u32,
    pub request_type: &'static str,
    pub response_type: &'static str,
    pub request_stream: bool,
    pub response_stream: bool,
}

impl CommandInfo {
    pub const fn unary(
        name: &'static str,
        id: u32,
        request_type: &'static str,
        response_type: &'static str,
    ) -> Self {
        CommandInfo {
            name,
            id,
            request_type,
            response_type,
            request_stream: false,
            response_stream: false,
        }
    }
}

/// Immutable name and id index over the command set.
#[derive(Clone, Copy, Debug)]
pub struct Catalog {
    commands: &'static [CommandInfo],
}

impl Catalog {
    pub const fn new(commands: &'static [CommandInfo]) -> Self {
        Catalog { commands }
    }

    pub fn commands(&self) -> &'static [CommandInfo] {
        self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn by_name(&self, name: &str) -> Option<&'static CommandInfo> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn by_id(&self, id: u32) -> Option<&'static CommandInfo> {
        self.commands.iter().find(|c| c.id == id)
    }

    /// Names and ids must be unique; every entry is unary.
    pub fn validate(&self) -> Result<(), String> {
        for (i, cmd) in self.commands.iter().enumerate() {
            let earlier = &self.commands[..i];
            if earlier.iter().any(|c| c.name == cmd.name) {
                return Err(format!("duplicate command name `{}`", cmd.name));
            }
            if let Some(c) = earlier.iter().find(|c| c.id == cmd.id) {
                return Err(format!(
                    "command id {} used by both `{}` and `{}`",
                    cmd.id, c.name, cmd.name
                ));
            }
            if cmd.request_stream || cmd.response_stream {
                return Err(format!("command `{}` is not unary", cmd.name));
            }
        }
        Ok(())
    }
}
