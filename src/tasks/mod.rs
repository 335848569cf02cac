//! Embassy tasks module
//!
//! Contains all async tasks for the firmware, organised by functionality.

pub mod retained;
pub mod serial;
pub mod uplink;

pub use retained::RetainedStateStore;
pub use serial::{serial_reader_task, serial_writer_task, CommandReceiver, CommandSender};
pub use uplink::uplink_task;
