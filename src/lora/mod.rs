pub mod traits;

pub use traits::{LoraConfig, LoraError, LoraRadio, RxPacket};
