//! Serial modem plumbing shared by the cellular and satellite drivers

pub mod at;
pub mod port;

pub use at::{AtReply, AtSession};
pub use port::{ModemError, ModemPort};
#[cfg(feature = "embedded")]
pub use port::UartModemPort;
