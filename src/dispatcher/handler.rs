//! Command dispatcher
//!
//! Maps host commands onto the network selector and turns the outcome into
//! a protocol response.

use crate::commands::types::{Command, Response, ResponseStatus, StatusReport};
use crate::config::protocol;
use crate::satellite::engine::SatelliteError;
use crate::selector::network::{DeliveryError, DeliveryOutcome, NetworkSelector, SelectorStatus};
use crate::time::Timebase;
use crate::transport::traits::{Priority, Transport, TransportError};

/// Command dispatcher
///
/// Stateless; the selector passed to [`CommandDispatcher::dispatch`] owns
/// everything that changes.
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Create a new command dispatcher
    pub fn new() -> Self {
        Self
    }

    /// Dispatch a command and return the response
    pub async fn dispatch<T, W, L, C, M>(
        &self,
        selector: &mut NetworkSelector<T, W, L, C, M>,
        command: Command,
    ) -> Response
    where
        T: Timebase,
        W: Transport,
        L: Transport,
        C: Transport,
        M: Transport,
    {
        let id = command.id();
        match command {
            Command::GetVersion => self.handle_get_version(),
            Command::SendData { priority, data } => {
                match self.handle_send(selector, &data, priority).await {
                    Ok(response) => response,
                    Err(status) => Response::error(status, id),
                }
            }
            Command::GetStatus => Response::Status(status_report(&selector.status())),
            Command::ResetDailyUsage => {
                selector.reset_daily_usage();
                Response::Ack
            }
            Command::SetBattery { percent } => {
                match selector.optimize_power_consumption(percent).await {
                    Ok(()) => Response::Ack,
                    Err(e) => Response::error(satellite_status(e), id),
                }
            }
            Command::SetEmergency { on } => {
                selector.set_emergency_mode(on);
                Response::Ack
            }
            Command::ScanNetworks => Response::Networks(*selector.scan_networks(0).await),
            Command::SetTime { unix_secs } => {
                selector.timebase().set_wall_clock(unix_secs);
                log::info!("dispatcher: wall clock set to {}", unix_secs);
                Response::Ack
            }
        }
    }

    fn handle_get_version(&self) -> Response {
        log::debug!(
            "Version requested. Responding {}.{}.{}",
            protocol::VERSION_MAJOR,
            protocol::VERSION_MINOR,
            protocol::VERSION_PATCH
        );
        Response::Version {
            major: protocol::VERSION_MAJOR,
            minor: protocol::VERSION_MINOR,
            patch: protocol::VERSION_PATCH,
        }
    }

    async fn handle_send<T, W, L, C, M>(
        &self,
        selector: &mut NetworkSelector<T, W, L, C, M>,
        data: &[u8],
        priority: Priority,
    ) -> Result<Response, ResponseStatus>
    where
        T: Timebase,
        W: Transport,
        L: Transport,
        C: Transport,
        M: Transport,
    {
        match selector.send_data(data, priority).await {
            Ok(DeliveryOutcome::Delivered(kind)) => Ok(Response::Delivered { kind }),
            Ok(DeliveryOutcome::Deferred { pending }) => Ok(Response::Deferred {
                pending: pending.min(u8::MAX as usize) as u8,
            }),
            Err(e) => Err(delivery_status(e)),
        }
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn delivery_status(error: DeliveryError) -> ResponseStatus {
    match error {
        DeliveryError::EmptyPayload => ResponseStatus::InvalidLength,
        DeliveryError::NoTransportAvailable => ResponseStatus::NoTransport,
        DeliveryError::SendFailed(_, TransportError::Timeout) => ResponseStatus::Timeout,
        DeliveryError::SendFailed(..) | DeliveryError::AllTransportsFailed => {
            ResponseStatus::SendFailed
        }
        DeliveryError::Satellite(e) => satellite_status(e),
    }
}

fn satellite_status(error: SatelliteError) -> ResponseStatus {
    match error {
        SatelliteError::Disabled => ResponseStatus::SatelliteDisabled,
        SatelliteError::EmptyPayload => ResponseStatus::InvalidLength,
        SatelliteError::PayloadTooLarge => ResponseStatus::PayloadTooLarge,
        SatelliteError::QueueFull => ResponseStatus::QueueFull,
        SatelliteError::InvalidBattery => ResponseStatus::InvalidParameter,
    }
}

/// Flatten selector status into the wire report
pub fn status_report(status: &SelectorStatus) -> StatusReport {
    let satellite = status.satellite.as_ref();
    StatusReport {
        satellite_fitted: satellite.is_some(),
        low_power: satellite.is_some_and(|s| s.low_power),
        emergency_mode: satellite.is_some_and(|s| s.emergency_mode),
        battery: satellite.and_then(|s| s.battery),
        messages_sent_today: satellite.map_or(0, |s| s.messages_sent_today),
        today_cost: satellite.map_or(0.0, |s| s.today_cost),
        pending: satellite.map_or(0, |s| s.pending.min(u8::MAX as usize) as u8),
        last_selected: status.last_selected,
        delivered: status.delivered,
        deferred: status.deferred,
        failed: status.failed,
    }
}
