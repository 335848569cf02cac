//! Per-channel transport drivers

pub mod cellular;
pub mod mesh;
pub mod satellite;
pub mod traits;
pub mod wifi;

pub use cellular::{CellularConfig, CellularModem};
pub use mesh::LoraMeshTransport;
pub use satellite::{SatelliteModem, SatelliteModule};
pub use traits::{
    probe, NoTransport, PowerClass, Priority, Transport, TransportError, TransportInfo,
    TransportKind,
};
pub use wifi::{WifiLink, WifiTransport};
