//! Clock and delay abstraction
//!
//! Everything in the uplink that waits or looks at the time goes through
//! [`Timebase`], so backoff and modem timeouts run cooperatively and can be
//! driven by virtual time in tests.

use core::future::Future;

/// Milliseconds in one calendar day
pub const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// Monotonic clock, async delay and optional wall-clock calendar
pub trait Timebase {
    /// Monotonic milliseconds since boot
    fn now_ms(&self) -> u64;

    /// Suspend the caller for `ms` milliseconds
    fn delay_ms(&self, ms: u32) -> impl Future<Output = ()>;

    /// Days since the Unix epoch, if wall time is known
    fn calendar_day(&self) -> Option<u32> {
        None
    }

    /// Anchor wall-clock time, e.g. from the host or a GNSS fix
    fn set_wall_clock(&self, _unix_secs: u64) {}
}

#[cfg(feature = "embedded")]
mod embassy {
    use super::{Timebase, MS_PER_DAY};
    use core::cell::Cell;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::blocking_mutex::Mutex;
    use embassy_time::{Instant, Timer};

    /// Wall clock anchor: (unix ms, monotonic ms) at the time it was set
    static WALL_CLOCK: Mutex<CriticalSectionRawMutex, Cell<Option<(u64, u64)>>> =
        Mutex::new(Cell::new(None));

    /// Timebase backed by the embassy time driver
    #[derive(Debug, Clone, Copy, Default)]
    pub struct EmbassyTimebase;

    impl Timebase for EmbassyTimebase {
        fn now_ms(&self) -> u64 {
            Instant::now().as_millis()
        }

        async fn delay_ms(&self, ms: u32) {
            Timer::after_millis(ms as u64).await;
        }

        fn calendar_day(&self) -> Option<u32> {
            let anchor = WALL_CLOCK.lock(|cell| cell.get());
            anchor.map(|(unix_ms, at)| {
                let elapsed = Instant::now().as_millis().saturating_sub(at);
                ((unix_ms + elapsed) / MS_PER_DAY) as u32
            })
        }

        fn set_wall_clock(&self, unix_secs: u64) {
            let now = Instant::now().as_millis();
            WALL_CLOCK.lock(|cell| cell.set(Some((unix_secs * 1000, now))));
        }
    }
}

#[cfg(feature = "embedded")]
pub use embassy::EmbassyTimebase;
