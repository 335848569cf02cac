//! Uplink task: the single owner of the network selector
//!
//! Serves host commands as they arrive and runs the periodic tick (day
//! rollover, pass refresh, queue flush) on a fixed schedule. Satellite state
//! is written back to the store whenever it changed.

use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Ticker};

use crate::commands::Response;
use crate::config::timing::TICK_INTERVAL_MS;
use crate::dispatcher::handler::status_report;
use crate::dispatcher::{CommandDispatcher, ResponseMessage, RESPONSE_CHANNEL};
use crate::satellite::persist::{PersistError, StateStore};
use crate::selector::NetworkSelector;
use crate::time::Timebase;
use crate::transport::traits::Transport;

use super::serial::CommandReceiver;

pub async fn uplink_task<T, W, L, C, M, S>(
    mut selector: NetworkSelector<T, W, L, C, M>,
    mut store: S,
    command_receiver: CommandReceiver,
) where
    T: Timebase,
    W: Transport,
    L: Transport,
    C: Transport,
    M: Transport,
    S: StateStore,
{
    let dispatcher = CommandDispatcher::new();
    let response_pub = RESPONSE_CHANNEL.immediate_publisher();
    let mut ticker = Ticker::every(Duration::from_millis(TICK_INTERVAL_MS));

    if let Some(engine) = selector.satellite_mut() {
        match engine.restore_state(&mut store) {
            Ok(n) => log::info!("uplink: {} stored messages restored", n),
            Err(PersistError::Empty) => log::info!("uplink: no saved state"),
            Err(e) => log::warn!("uplink: saved state discarded ({:?})", e),
        }
    }

    loop {
        match select(command_receiver.receive(), ticker.next()).await {
            Either::First(envelope) => {
                let response = dispatcher.dispatch(&mut selector, envelope.command).await;
                response_pub.publish_immediate(ResponseMessage::Command {
                    source: envelope.source,
                    sequence_id: envelope.sequence_id,
                    response,
                });
            }
            Either::Second(()) => {
                let delivered = selector.tick().await;
                if delivered > 0 {
                    let report = status_report(&selector.status());
                    response_pub.publish_immediate(ResponseMessage::Unsolicited(
                        Response::Status(report),
                    ));
                }
            }
        }

        if let Some(engine) = selector.satellite_mut() {
            if engine.is_dirty() {
                if let Err(e) = engine.save_state(&mut store) {
                    log::warn!("uplink: saving state failed ({:?})", e);
                }
            }
        }
    }
}
