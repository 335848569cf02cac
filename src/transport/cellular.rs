//! Cellular modem driver (SIM800/SIM7000-style AT command set)
//!
//! Registration is read with `AT+CREG?`, signal with `AT+CSQ`, and payloads
//! are uploaded over a short-lived TCP connection (`AT+CIPSTART` /
//! `AT+CIPSEND`). The modem sleeps in slow clock mode between uploads.

use crate::config::cellular::{
    COMMAND_TIMEOUT_MS, CONNECT_TIMEOUT_MS, COST_PER_KIB, SEND_CHUNK, SEND_TIMEOUT_MS,
    WAKE_TIMEOUT_MS,
};
use crate::config::ConfigError;
use crate::modem::at::{format_line, AtSession};
use crate::modem::port::{ModemError, ModemPort};
use crate::time::Timebase;
use crate::transport::traits::{PowerClass, Transport, TransportError, TransportKind};
use heapless::String;

/// Cellular bearer and upload endpoint
#[derive(Debug, Clone)]
pub struct CellularConfig {
    pub apn: String<32>,
    pub server_host: String<64>,
    pub server_port: u16,
    /// Data cost per started KiB
    pub cost_per_kib: f32,
}

impl CellularConfig {
    pub fn new(apn: &str, server_host: &str, server_port: u16) -> Result<Self, ConfigError> {
        let mut config = Self {
            apn: String::new(),
            server_host: String::new(),
            server_port,
            cost_per_kib: COST_PER_KIB,
        };
        config
            .apn
            .push_str(apn)
            .map_err(|_| ConfigError::MissingEndpoint)?;
        config
            .server_host
            .push_str(server_host)
            .map_err(|_| ConfigError::MissingEndpoint)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.apn.is_empty() || self.server_host.is_empty() || self.server_port == 0 {
            return Err(ConfigError::MissingEndpoint);
        }
        if !self.cost_per_kib.is_finite() || self.cost_per_kib < 0.0 {
            return Err(ConfigError::InvalidCostLimit);
        }
        Ok(())
    }
}

/// Parse `<n>,<stat>` from `+CREG:` and report home/roaming registration
fn parse_registration(field: &str) -> bool {
    matches!(
        field.split(',').nth(1).map(str::trim).and_then(|s| s.parse::<u8>().ok()),
        Some(1) | Some(5)
    )
}

/// Convert `+CSQ: <rssi>,<ber>` to percent; 99 means unknown
fn parse_csq(field: &str) -> Option<u8> {
    let rssi: u8 = field.split(',').next()?.trim().parse().ok()?;
    if rssi > 31 {
        return None;
    }
    Some((rssi as u16 * 100 / 31) as u8)
}

/// Cellular modem driver
pub struct CellularModem<P, T> {
    session: AtSession<P, T>,
    config: CellularConfig,
    registered: bool,
    bearer_up: bool,
    asleep: bool,
}

impl<P: ModemPort, T: Timebase> CellularModem<P, T> {
    pub fn new(port: P, timebase: T, config: CellularConfig) -> Self {
        Self {
            session: AtSession::new(port, timebase),
            config,
            registered: false,
            bearer_up: false,
            asleep: false,
        }
    }

    /// Registration state seen by the last probe
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    async fn bring_up_bearer(&mut self) -> Result<(), ModemError> {
        if self.bearer_up {
            return Ok(());
        }

        let cstt = format_line(format_args!("AT+CSTT=\"{}\"", self.config.apn))?;
        self.session.command(&cstt, COMMAND_TIMEOUT_MS).await?;
        self.session.command("AT+CIICR", CONNECT_TIMEOUT_MS).await?;
        // AT+CIFSR answers with the bare IP address and no OK
        self.session
            .command_until("AT+CIFSR", COMMAND_TIMEOUT_MS, |line| {
                line.bytes().next().is_some_and(|b| b.is_ascii_digit())
            })
            .await?;

        self.bearer_up = true;
        Ok(())
    }

    async fn upload(&mut self, payload: &[u8]) -> Result<(), ModemError> {
        self.bring_up_bearer().await?;

        let start = format_line(format_args!(
            "AT+CIPSTART=\"TCP\",\"{}\",{}",
            self.config.server_host, self.config.server_port
        ))?;
        let reply = self
            .session
            .command_until(&start, CONNECT_TIMEOUT_MS, |line| {
                line.starts_with("CONNECT") || line == "ALREADY CONNECT"
            })
            .await?;
        if reply.final_line() == "CONNECT FAIL" {
            return Err(ModemError::CommandRejected);
        }

        for chunk in payload.chunks(SEND_CHUNK) {
            let send = format_line(format_args!("AT+CIPSEND={}\r", chunk.len()))?;

            self.session.drain().await?;
            self.session.write_raw(send.as_bytes()).await?;
            self.session.wait_for_prompt(b'>', COMMAND_TIMEOUT_MS).await?;
            self.session.write_raw(chunk).await?;

            let reply = self
                .session
                .read_reply(SEND_TIMEOUT_MS, |line| line == "SEND OK" || line == "SEND FAIL")
                .await?;
            if reply.final_line() != "SEND OK" {
                return Err(ModemError::CommandRejected);
            }
        }

        Ok(())
    }

    async fn close_connection(&mut self) {
        let _ = self
            .session
            .command_until("AT+CIPCLOSE", COMMAND_TIMEOUT_MS, |line| {
                line == "CLOSE OK" || line == "OK"
            })
            .await;
    }
}

impl<P: ModemPort, T: Timebase> Transport for CellularModem<P, T> {
    fn kind(&self) -> TransportKind {
        TransportKind::Cellular
    }

    fn power_class(&self) -> PowerClass {
        PowerClass::Medium
    }

    fn estimated_cost(&self, payload_len: usize) -> f32 {
        let kib = payload_len.div_ceil(1024).max(1);
        kib as f32 * self.config.cost_per_kib
    }

    async fn check_availability(&mut self) -> bool {
        if self.asleep {
            // Asleep: report what we last saw rather than waking it
            return self.registered;
        }

        self.registered = match self.session.command("AT+CREG?", COMMAND_TIMEOUT_MS).await {
            Ok(reply) => reply.field("+CREG:").is_some_and(parse_registration),
            Err(_) => false,
        };
        self.registered
    }

    async fn signal_quality(&mut self) -> Option<u8> {
        if self.asleep {
            return None;
        }
        let reply = self.session.command("AT+CSQ", COMMAND_TIMEOUT_MS).await.ok()?;
        reply.field("+CSQ:").and_then(parse_csq)
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if payload.is_empty() {
            return Err(TransportError::EmptyPayload);
        }
        if self.asleep {
            return Err(TransportError::Unavailable);
        }

        let result = self.upload(payload).await;
        self.close_connection().await;

        match result {
            Ok(()) => {
                log::debug!("cellular: uploaded {} bytes", payload.len());
                Ok(())
            }
            Err(e) => {
                log::warn!("cellular: upload failed ({:?})", e);
                self.bearer_up = false;
                Err(e.into())
            }
        }
    }

    async fn sleep(&mut self) -> Result<(), TransportError> {
        if self.asleep {
            return Ok(());
        }
        // Slow clock mode 1: the modem sleeps while the DTR/enable line is low
        self.session
            .command("AT+CSCLK=1", COMMAND_TIMEOUT_MS)
            .await
            .map_err(TransportError::from)?;
        self.session
            .port_mut()
            .set_power(false)
            .map_err(TransportError::from)?;
        self.asleep = true;
        self.bearer_up = false;
        Ok(())
    }

    async fn wake(&mut self) -> Result<(), TransportError> {
        if !self.asleep {
            return Ok(());
        }
        self.session
            .port_mut()
            .set_power(true)
            .map_err(TransportError::from)?;
        self.session
            .wait_ready(WAKE_TIMEOUT_MS)
            .await
            .map_err(TransportError::from)?;
        self.session
            .command("AT+CSCLK=0", COMMAND_TIMEOUT_MS)
            .await
            .map_err(TransportError::from)?;
        self.asleep = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::port::mock::MockModemPort;
    use crate::time::mock::MockTimebase;

    fn modem() -> (CellularModem<MockModemPort, MockTimebase>, MockModemPort) {
        let port = MockModemPort::new();
        let config = CellularConfig::new("iot.apn", "collector.local", 5000).unwrap();
        (CellularModem::new(port.clone(), MockTimebase::new(), config), port)
    }

    #[test]
    fn test_registration_and_signal() {
        let (mut modem, port) = modem();
        port.expect_reply("\r\n+CREG: 0,5\r\n\r\nOK\r\n");
        port.expect_reply("\r\n+CSQ: 31,0\r\n\r\nOK\r\n");

        futures::executor::block_on(async {
            assert!(modem.check_availability().await);
            assert_eq!(modem.signal_quality().await, Some(100));
        });
    }

    #[test]
    fn test_searching_is_unavailable() {
        let (mut modem, port) = modem();
        port.expect_reply("\r\n+CREG: 0,2\r\n\r\nOK\r\n");

        assert!(!futures::executor::block_on(modem.check_availability()));
    }

    #[test]
    fn test_unknown_csq() {
        assert_eq!(parse_csq("99,99"), None);
        assert_eq!(parse_csq("0,0"), Some(0));
    }

    #[test]
    fn test_upload_flow() {
        let (mut modem, port) = modem();
        port.expect_reply("\r\nOK\r\n"); // CSTT
        port.expect_reply("\r\nOK\r\n"); // CIICR
        port.expect_reply("\r\n10.0.0.7\r\n"); // CIFSR
        port.expect_reply("\r\nOK\r\n\r\nCONNECT OK\r\n"); // CIPSTART
        port.expect_reply("\r\n> "); // CIPSEND prompt
        port.expect_reply("\r\nSEND OK\r\n"); // payload
        port.expect_reply("\r\nCLOSE OK\r\n"); // CIPCLOSE

        futures::executor::block_on(modem.send(b"hello")).unwrap();

        let text = port.written_text();
        assert!(text.contains("AT+CSTT=\"iot.apn\""));
        assert!(text.contains("AT+CIPSTART=\"TCP\",\"collector.local\",5000"));
        assert!(text.contains("AT+CIPSEND=5\rhello"));
        assert!(text.ends_with("AT+CIPCLOSE\r"));
    }

    #[test]
    fn test_connect_fail_is_rejected() {
        let (mut modem, port) = modem();
        port.expect_reply("\r\nOK\r\n");
        port.expect_reply("\r\nOK\r\n");
        port.expect_reply("\r\n10.0.0.7\r\n");
        port.expect_reply("\r\nOK\r\n\r\nCONNECT FAIL\r\n");
        port.expect_reply("\r\nCLOSE OK\r\n");

        let result = futures::executor::block_on(modem.send(b"hello"));
        assert_eq!(result, Err(TransportError::Rejected));
    }

    #[test]
    fn test_cost_per_started_kib() {
        let (modem, _) = modem();
        assert_eq!(modem.estimated_cost(1), COST_PER_KIB);
        assert_eq!(modem.estimated_cost(1025), 2.0 * COST_PER_KIB);
    }

    #[test]
    fn test_sleep_and_wake() {
        let (mut modem, port) = modem();
        port.expect_reply("\r\nOK\r\n"); // CSCLK=1
        port.expect_reply("\r\nOK\r\n"); // AT
        port.expect_reply("\r\nOK\r\n"); // CSCLK=0

        futures::executor::block_on(async {
            modem.sleep().await.unwrap();
            assert!(!port.is_powered());
            assert_eq!(modem.send(b"x").await, Err(TransportError::Unavailable));

            modem.wake().await.unwrap();
            assert!(port.is_powered());
        });
    }

    #[test]
    fn test_missing_endpoint() {
        assert_eq!(
            CellularConfig::new("", "host", 1).unwrap_err(),
            ConfigError::MissingEndpoint
        );
    }
}
