pub mod parser;
pub mod serialiser;
pub mod types;

pub use parser::CommandParser;
pub use serialiser::ResponseSerialiser;
pub use types::{Command, CommandId, Response, ResponseStatus, StatusReport};
