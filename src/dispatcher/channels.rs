//! Channels between the serial link and the uplink task
//!
//! Serial readers push parsed commands into [`COMMAND_CHANNEL`]; the uplink
//! task is the single consumer. Every outgoing response goes through
//! [`RESPONSE_CHANNEL`].

use crate::commands::types::{Command, Response};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::pubsub::PubSubChannel;

/// Channel capacity for incoming commands
pub const COMMAND_CHANNEL_SIZE: usize = 8;

/// Identifies the source of a command for routing responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    /// Command received over the USB serial link
    Serial,
}

/// Envelope wrapping a command with metadata
#[derive(Debug, Clone)]
pub struct CommandEnvelope {
    pub command: Command,
    /// Source of the command (for routing the response)
    pub source: CommandSource,
    /// Sequence ID for matching responses to requests
    pub sequence_id: u16,
}

/// Message type for all outgoing responses
#[derive(Debug, Clone)]
pub enum ResponseMessage {
    /// Reply to a command, delivered only to its source
    Command {
        source: CommandSource,
        sequence_id: u16,
        response: Response,
    },
    /// Status pushed after a tick flushed stored messages
    Unsolicited(Response),
}

/// Global channel for commands from all sources
pub static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, CommandEnvelope, COMMAND_CHANNEL_SIZE> =
    Channel::new();

/// Unified channel for all responses
///
/// Parameters: CAP=8 messages, SUBS=1 subscriber (serial writer), PUBS=1 publisher
pub static RESPONSE_CHANNEL: PubSubChannel<CriticalSectionRawMutex, ResponseMessage, 8, 1, 1> =
    PubSubChannel::new();
