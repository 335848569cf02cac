//! Transport driver trait and the types shared by every channel
//!
//! Each physical radio (WiFi, LoRa mesh, cellular, satellite) implements
//! [`Transport`]. Every call is fallible and bounded in time; no driver
//! retries internally.

use core::future::Future;

/// Physical channel kind
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportKind {
    None = 0x00,
    Wifi = 0x01,
    LocalMesh = 0x02,
    Cellular = 0x03,
    Satellite = 0x04,
}

impl TransportKind {
    /// Try to convert a byte to a TransportKind
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::None),
            0x01 => Some(Self::Wifi),
            0x02 => Some(Self::LocalMesh),
            0x03 => Some(Self::Cellular),
            0x04 => Some(Self::Satellite),
            _ => None,
        }
    }
}

/// Message priority, ordered Low < Normal < High < Emergency
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low = 0x00,
    Normal = 0x01,
    High = 0x02,
    Emergency = 0x03,
}

impl Priority {
    /// Try to convert a byte to a Priority
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Low),
            0x01 => Some(Self::Normal),
            0x02 => Some(Self::High),
            0x03 => Some(Self::Emergency),
            _ => None,
        }
    }
}

/// Relative power draw of a channel while transmitting
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerClass {
    Low = 0x00,
    Medium = 0x01,
    High = 0x02,
}

/// Snapshot of one channel's state, refreshed on every scan
///
/// `signal_strength` and `estimated_cost` are advisory and only meaningful
/// when `available` is true.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportInfo {
    pub kind: TransportKind,
    /// Signal quality in percent, `None` if unknown
    pub signal_strength: Option<u8>,
    /// Cost of sending the pending payload now, currency-agnostic
    pub estimated_cost: f32,
    pub power_class: PowerClass,
    pub available: bool,
}

impl TransportInfo {
    /// Placeholder for a channel that is not fitted
    pub const fn absent(kind: TransportKind) -> Self {
        Self {
            kind,
            signal_strength: None,
            estimated_cost: 0.0,
            power_class: PowerClass::High,
            available: false,
        }
    }
}

/// Errors that can occur during transport operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No link, not registered, or no sky view
    Unavailable,
    /// Device did not answer within its timeout
    Timeout,
    /// Device answered but refused the operation
    Rejected,
    /// Payload larger than the channel can carry
    PayloadTooLarge,
    /// Nothing to send
    EmptyPayload,
    /// Low-level I/O failure on the bus or serial line
    LinkError,
    /// Radio could not be initialised
    NotInitialised,
}

/// Abstract channel driver
pub trait Transport {
    /// Which channel this driver represents
    fn kind(&self) -> TransportKind;

    /// Power draw while transmitting
    fn power_class(&self) -> PowerClass;

    /// Cost of sending `payload_len` bytes now
    fn estimated_cost(&self, payload_len: usize) -> f32;

    /// Cheap link-layer / registration probe with a bounded timeout
    fn check_availability(&mut self) -> impl Future<Output = bool>;

    /// Best-effort signal quality in percent, `None` if unknown
    fn signal_quality(&mut self) -> impl Future<Output = Option<u8>>;

    /// One transmission attempt, no internal retry
    fn send(&mut self, payload: &[u8]) -> impl Future<Output = Result<(), TransportError>>;

    /// Put the radio into its low-power state
    fn sleep(&mut self) -> impl Future<Output = Result<(), TransportError>>;

    /// Bring the radio back; returns once usable or the wake timeout expires
    fn wake(&mut self) -> impl Future<Output = Result<(), TransportError>>;
}

/// Refresh a channel snapshot for a payload of `payload_len` bytes
pub async fn probe<T: Transport>(transport: &mut T, payload_len: usize) -> TransportInfo {
    let available = transport.check_availability().await;
    let signal_strength = if available {
        transport.signal_quality().await
    } else {
        None
    };

    TransportInfo {
        kind: transport.kind(),
        signal_strength,
        estimated_cost: transport.estimated_cost(payload_len),
        power_class: transport.power_class(),
        available,
    }
}

/// Empty slot for a channel that is not fitted on this board
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransport;

impl Transport for NoTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::None
    }

    fn power_class(&self) -> PowerClass {
        PowerClass::High
    }

    fn estimated_cost(&self, _payload_len: usize) -> f32 {
        0.0
    }

    async fn check_availability(&mut self) -> bool {
        false
    }

    async fn signal_quality(&mut self) -> Option<u8> {
        None
    }

    async fn send(&mut self, _payload: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Unavailable)
    }

    async fn sleep(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn wake(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    //! Mock transport for testing

    use super::*;
    use core::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::vec::Vec;

    struct State {
        available: Cell<bool>,
        signal: Cell<Option<u8>>,
        cost: Cell<f32>,
        /// Scripted results for upcoming send() calls; empty means success
        send_results: RefCell<VecDeque<Result<(), TransportError>>>,
        /// Fail every send while set
        always_fail: Cell<Option<TransportError>>,
        sent: RefCell<Vec<Vec<u8>>>,
        send_attempts: Cell<usize>,
        asleep: Cell<bool>,
        wake_calls: Cell<usize>,
    }

    /// Mock transport; clones share state so tests keep a handle
    #[derive(Clone)]
    pub struct MockTransport {
        kind: TransportKind,
        power: PowerClass,
        state: Rc<State>,
    }

    impl MockTransport {
        pub fn new(kind: TransportKind, power: PowerClass, cost: f32) -> Self {
            Self {
                kind,
                power,
                state: Rc::new(State {
                    available: Cell::new(true),
                    signal: Cell::new(None),
                    cost: Cell::new(cost),
                    send_results: RefCell::new(VecDeque::new()),
                    always_fail: Cell::new(None),
                    sent: RefCell::new(Vec::new()),
                    send_attempts: Cell::new(0),
                    asleep: Cell::new(false),
                    wake_calls: Cell::new(0),
                }),
            }
        }

        pub fn set_available(&self, available: bool) {
            self.state.available.set(available);
        }

        pub fn set_signal(&self, signal: Option<u8>) {
            self.state.signal.set(signal);
        }

        pub fn set_cost(&self, cost: f32) {
            self.state.cost.set(cost);
        }

        /// Queue the result of the next send() call
        pub fn push_send_result(&self, result: Result<(), TransportError>) {
            self.state.send_results.borrow_mut().push_back(result);
        }

        /// Make every send fail with `error` until cleared
        pub fn fail_sends(&self, error: Option<TransportError>) {
            self.state.always_fail.set(error);
        }

        /// Payloads that were accepted
        pub fn sent(&self) -> Vec<Vec<u8>> {
            self.state.sent.borrow().clone()
        }

        /// All send() calls, successful or not
        pub fn send_attempts(&self) -> usize {
            self.state.send_attempts.get()
        }

        pub fn is_asleep(&self) -> bool {
            self.state.asleep.get()
        }

        pub fn wake_calls(&self) -> usize {
            self.state.wake_calls.get()
        }
    }

    impl Transport for MockTransport {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        fn power_class(&self) -> PowerClass {
            self.power
        }

        fn estimated_cost(&self, _payload_len: usize) -> f32 {
            self.state.cost.get()
        }

        async fn check_availability(&mut self) -> bool {
            self.state.available.get()
        }

        async fn signal_quality(&mut self) -> Option<u8> {
            self.state.signal.get()
        }

        async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
            self.state.send_attempts.set(self.state.send_attempts.get() + 1);

            if let Some(error) = self.state.always_fail.get() {
                return Err(error);
            }
            if let Some(result) = self.state.send_results.borrow_mut().pop_front() {
                result?;
            }

            self.state.sent.borrow_mut().push(payload.to_vec());
            Ok(())
        }

        async fn sleep(&mut self) -> Result<(), TransportError> {
            self.state.asleep.set(true);
            Ok(())
        }

        async fn wake(&mut self) -> Result<(), TransportError> {
            self.state.wake_calls.set(self.state.wake_calls.get() + 1);
            self.state.asleep.set(false);
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_probe_unavailable_hides_signal() {
            let mut transport = MockTransport::new(TransportKind::Cellular, PowerClass::Medium, 5.0);
            transport.set_signal(Some(90));
            transport.set_available(false);

            let info = futures::executor::block_on(probe(&mut transport, 100));

            assert!(!info.available);
            assert_eq!(info.signal_strength, None);
            assert_eq!(info.kind, TransportKind::Cellular);
        }

        #[test]
        fn test_scripted_failure_then_success() {
            let mut transport = MockTransport::new(TransportKind::LocalMesh, PowerClass::Low, 0.0);
            let handle = transport.clone();
            transport.push_send_result(Err(TransportError::Timeout));

            futures::executor::block_on(async {
                assert_eq!(transport.send(&[1]).await, Err(TransportError::Timeout));
                transport.send(&[2]).await.unwrap();
            });

            assert_eq!(handle.send_attempts(), 2);
            assert_eq!(handle.sent(), vec![vec![2]]);
        }

        #[test]
        fn test_no_transport_never_available() {
            let mut slot = NoTransport;
            futures::executor::block_on(async {
                assert!(!slot.check_availability().await);
                assert_eq!(slot.send(&[1]).await, Err(TransportError::Unavailable));
            });
        }
    }
}
