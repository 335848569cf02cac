#[cfg(feature = "embedded")]
pub mod channels;
pub mod handler;

#[cfg(feature = "embedded")]
pub use channels::{
    CommandEnvelope, CommandSource, ResponseMessage, COMMAND_CHANNEL, RESPONSE_CHANNEL,
};
pub use handler::CommandDispatcher;
