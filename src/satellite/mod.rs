//! Satellite store-and-forward

pub mod backoff;
pub mod compress;
pub mod engine;
pub mod pass;
pub mod persist;
pub mod power;
pub mod queue;
pub mod usage;

pub use backoff::RetryPolicy;
pub use engine::{
    SatelliteConfig, SatelliteEngine, SatelliteError, SatelliteStatus, SendOutcome, StoreReason,
};
pub use persist::{PersistError, StateStore};
