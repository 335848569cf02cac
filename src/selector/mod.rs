//! Transport selection and fallback

pub mod network;
pub mod scoring;

pub use network::{DeliveryError, DeliveryOutcome, NetworkSelector, SelectorStatus};
pub use scoring::{Candidate, SelectorConfig};
