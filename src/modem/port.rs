//! Modem serial port trait for abstraction and testability
//!
//! This trait defines the byte-level interface to a cellular or satellite
//! modem, allowing the UART driver to be swapped with a mock for testing.

use crate::transport::traits::TransportError;
use core::future::Future;

/// Errors that can occur while talking to a modem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemError {
    /// No final result within the command timeout
    Timeout,
    /// Modem answered ERROR / +CME ERROR / an error status
    CommandRejected,
    /// Reply did not have the expected shape
    UnexpectedResponse,
    /// UART read or write failed
    PortError,
    /// Outgoing command or payload does not fit the buffers
    Overflow,
}

impl From<ModemError> for TransportError {
    fn from(error: ModemError) -> Self {
        match error {
            ModemError::Timeout => TransportError::Timeout,
            ModemError::CommandRejected | ModemError::UnexpectedResponse => {
                TransportError::Rejected
            }
            ModemError::PortError => TransportError::LinkError,
            ModemError::Overflow => TransportError::PayloadTooLarge,
        }
    }
}

/// Abstract modem port
pub trait ModemPort {
    /// Read whatever bytes are available into `buf`
    ///
    /// Returns 0 when nothing is waiting; never blocks for long.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize, ModemError>>;

    /// Write all bytes
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<(), ModemError>>;

    /// Flush the write buffer
    fn flush(&mut self) -> impl Future<Output = Result<(), ModemError>>;

    /// Drive the modem's enable / sleep line
    fn set_power(&mut self, on: bool) -> Result<(), ModemError>;
}

#[cfg(feature = "embedded")]
mod uart {
    use super::{ModemError, ModemPort};
    use embassy_time::{with_timeout, Duration};
    use embedded_hal::digital::OutputPin;
    use embedded_io_async::{Read, Write};

    /// How long a read waits for the first byte before reporting "nothing"
    const READ_WINDOW_MS: u64 = 20;

    /// UART-attached modem with a power control pin
    pub struct UartModemPort<U, P> {
        uart: U,
        power: P,
    }

    impl<U, P> UartModemPort<U, P>
    where
        U: Read + Write,
        P: OutputPin,
    {
        pub fn new(uart: U, power: P) -> Self {
            Self { uart, power }
        }
    }

    impl<U, P> ModemPort for UartModemPort<U, P>
    where
        U: Read + Write,
        P: OutputPin,
    {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ModemError> {
            match with_timeout(Duration::from_millis(READ_WINDOW_MS), self.uart.read(buf)).await {
                Ok(Ok(n)) => Ok(n),
                Ok(Err(_)) => Err(ModemError::PortError),
                Err(_) => Ok(0),
            }
        }

        async fn write(&mut self, data: &[u8]) -> Result<(), ModemError> {
            self.uart
                .write_all(data)
                .await
                .map_err(|_| ModemError::PortError)
        }

        async fn flush(&mut self) -> Result<(), ModemError> {
            self.uart.flush().await.map_err(|_| ModemError::PortError)
        }

        fn set_power(&mut self, on: bool) -> Result<(), ModemError> {
            let result = if on {
                self.power.set_high()
            } else {
                self.power.set_low()
            };
            result.map_err(|_| ModemError::PortError)
        }
    }
}

#[cfg(feature = "embedded")]
pub use uart::UartModemPort;
