//! Satellite modem driver
//!
//! Two command families are supported:
//! - Iridium 9602/9603 and RockBLOCK: SBD over AT commands. The payload is
//!   written to the mobile-originated buffer with `AT+SBDWB` plus a 16-bit
//!   checksum, then `AT+SBDIX` runs the session.
//! - Swarm M138: NMEA-style `$CMD body*XX` lines, payload queued with `$TD`.

use crate::config::satellite::{
    COMMAND_TIMEOUT_MS, IRIDIUM_COST_PER_MESSAGE, IRIDIUM_MAX_PAYLOAD, IRIDIUM_MIN_BARS,
    IRIDIUM_ORBITAL_PERIOD_MS, IRIDIUM_PASS_DURATION_MS, ROCKBLOCK_COST_PER_MESSAGE,
    SESSION_TIMEOUT_MS, SWARM_COST_PER_MESSAGE, SWARM_MAX_NOISE_DBM, SWARM_MAX_PAYLOAD,
    SWARM_ORBITAL_PERIOD_MS, SWARM_PASS_DURATION_MS, WAKE_TIMEOUT_MS,
};
use crate::modem::at::{format_line, is_final_result, AtReply, AtSession};
use crate::modem::port::{ModemError, ModemPort};
use crate::time::Timebase;
use crate::transport::traits::{PowerClass, Transport, TransportError, TransportKind};
use heapless::Vec;

/// Satellite module family
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatelliteModule {
    Iridium = 0x00,
    RockBlock = 0x01,
    Swarm = 0x02,
}

impl SatelliteModule {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Iridium),
            0x01 => Some(Self::RockBlock),
            0x02 => Some(Self::Swarm),
            _ => None,
        }
    }

    pub fn cost_per_message(self) -> f32 {
        match self {
            Self::Iridium => IRIDIUM_COST_PER_MESSAGE,
            Self::RockBlock => ROCKBLOCK_COST_PER_MESSAGE,
            Self::Swarm => SWARM_COST_PER_MESSAGE,
        }
    }

    pub fn max_payload(self) -> usize {
        match self {
            Self::Iridium | Self::RockBlock => IRIDIUM_MAX_PAYLOAD,
            Self::Swarm => SWARM_MAX_PAYLOAD,
        }
    }

    pub fn orbital_period_ms(self) -> u64 {
        match self {
            Self::Iridium | Self::RockBlock => IRIDIUM_ORBITAL_PERIOD_MS,
            Self::Swarm => SWARM_ORBITAL_PERIOD_MS,
        }
    }

    pub fn pass_duration_ms(self) -> u64 {
        match self {
            Self::Iridium | Self::RockBlock => IRIDIUM_PASS_DURATION_MS,
            Self::Swarm => SWARM_PASS_DURATION_MS,
        }
    }

    fn is_sbd(self) -> bool {
        !matches!(self, Self::Swarm)
    }
}

/// SBD checksum: low 16 bits of the byte sum, big endian
pub fn sbd_checksum(payload: &[u8]) -> [u8; 2] {
    let sum = payload
        .iter()
        .fold(0u16, |acc, &byte| acc.wrapping_add(byte as u16));
    sum.to_be_bytes()
}

/// XOR of every byte between `$` and `*`
pub fn nmea_checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |acc, &byte| acc ^ byte)
}

/// Check and strip the `*XX` suffix of a Swarm line, returning the body
/// without the leading `$`
pub fn verify_swarm_line(line: &str) -> Option<&str> {
    let line = line.strip_prefix('$')?;
    let (body, checksum) = line.rsplit_once('*')?;
    let expected = u8::from_str_radix(checksum.trim(), 16).ok()?;
    (nmea_checksum(body.as_bytes()) == expected).then_some(body)
}

/// MO status 0-4 means the message reached the gateway
fn mo_status_ok(status: u8) -> bool {
    status <= 4
}

/// Largest Swarm command line: `$TD ` + hex payload + `*XX\n`
const SWARM_LINE_MAX: usize = 4 + SWARM_MAX_PAYLOAD * 2 + 4;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Satellite modem driver
pub struct SatelliteModem<P, T> {
    session: AtSession<P, T>,
    module: SatelliteModule,
    asleep: bool,
    /// Last signal reading taken while awake
    last_signal: Option<u8>,
    last_mo_status: Option<u8>,
}

impl<P: ModemPort, T: Timebase> SatelliteModem<P, T> {
    pub fn new(port: P, timebase: T, module: SatelliteModule) -> Self {
        Self {
            session: AtSession::new(port, timebase),
            module,
            asleep: false,
            last_signal: None,
            last_mo_status: None,
        }
    }

    pub fn module(&self) -> SatelliteModule {
        self.module
    }

    /// MO status of the last SBD session, for diagnostics
    pub fn last_mo_status(&self) -> Option<u8> {
        self.last_mo_status
    }

    pub fn timebase(&self) -> &T {
        self.session.timebase()
    }

    // SBD (Iridium / RockBLOCK)

    async fn sbd_bars(&mut self) -> Option<u8> {
        let reply = self.session.command("AT+CSQF", COMMAND_TIMEOUT_MS).await.ok()?;
        reply.field("+CSQF:")?.parse::<u8>().ok().filter(|bars| *bars <= 5)
    }

    async fn sbd_send(&mut self, payload: &[u8]) -> Result<(), ModemError> {
        let write = format_line(format_args!("AT+SBDWB={}", payload.len()))?;
        self.session
            .command_until(&write, COMMAND_TIMEOUT_MS, |line| line == "READY")
            .await?;

        let mut buffer: Vec<u8, { IRIDIUM_MAX_PAYLOAD + 2 }> = Vec::new();
        buffer
            .extend_from_slice(payload)
            .map_err(|_| ModemError::Overflow)?;
        buffer
            .extend_from_slice(&sbd_checksum(payload))
            .map_err(|_| ModemError::Overflow)?;
        self.session.write_raw(&buffer).await?;

        // 0 = written, 1 = timeout, 2 = bad checksum, 3 = wrong size
        let reply = self
            .session
            .read_reply(COMMAND_TIMEOUT_MS, is_final_result)
            .await?;
        if reply.lines().first().map(|l| l.as_str()) != Some("0") {
            return Err(ModemError::UnexpectedResponse);
        }

        let reply = self.session.command("AT+SBDIX", SESSION_TIMEOUT_MS).await?;
        let status = parse_sbdix(&reply).ok_or(ModemError::UnexpectedResponse)?;
        self.last_mo_status = Some(status);

        if mo_status_ok(status) {
            Ok(())
        } else {
            log::warn!("satellite: SBD session failed, MO status {}", status);
            Err(ModemError::CommandRejected)
        }
    }

    // Swarm

    /// Send `$<body>*XX` and wait for the matching checksummed reply
    async fn swarm_command(
        &mut self,
        body: &[u8],
        timeout_ms: u32,
    ) -> Result<AtReply, ModemError> {
        let mut line: Vec<u8, SWARM_LINE_MAX> = Vec::new();
        let checksum = nmea_checksum(body);
        line.push(b'$').map_err(|_| ModemError::Overflow)?;
        line.extend_from_slice(body)
            .map_err(|_| ModemError::Overflow)?;
        line.extend_from_slice(&[
            b'*',
            HEX[(checksum >> 4) as usize],
            HEX[(checksum & 0x0f) as usize],
            b'\n',
        ])
        .map_err(|_| ModemError::Overflow)?;

        self.session.drain().await?;
        self.session.write_raw(&line).await?;

        let reply = self
            .session
            .read_reply(timeout_ms, |line| line.starts_with('$'))
            .await?;

        let command = body.get(..2).ok_or(ModemError::Overflow)?;
        let answered = verify_swarm_line(reply.final_line())
            .is_some_and(|reply_body| reply_body.as_bytes().starts_with(command));
        if answered {
            Ok(reply)
        } else {
            Err(ModemError::UnexpectedResponse)
        }
    }

    async fn swarm_noise_dbm(&mut self) -> Option<i16> {
        let reply = self.swarm_command(b"RT @", COMMAND_TIMEOUT_MS).await.ok()?;
        let body = verify_swarm_line(reply.final_line())?;
        let rssi = body.split_once("RSSI=")?.1;
        let end = rssi.find(|c: char| c != '-' && !c.is_ascii_digit()).unwrap_or(rssi.len());
        rssi[..end].parse().ok()
    }

    async fn swarm_send(&mut self, payload: &[u8]) -> Result<(), ModemError> {
        let mut body: Vec<u8, SWARM_LINE_MAX> = Vec::new();
        body.extend_from_slice(b"TD ")
            .map_err(|_| ModemError::Overflow)?;
        for &byte in payload {
            body.extend_from_slice(&[HEX[(byte >> 4) as usize], HEX[(byte & 0x0f) as usize]])
                .map_err(|_| ModemError::Overflow)?;
        }

        let reply = self.swarm_command(&body, COMMAND_TIMEOUT_MS).await?;
        let reply_body = verify_swarm_line(reply.final_line()).unwrap_or_default();
        if reply_body.starts_with("TD OK") {
            Ok(())
        } else {
            log::warn!("satellite: Swarm rejected message ({})", reply_body);
            Err(ModemError::CommandRejected)
        }
    }

    async fn swarm_wait_ready(&mut self) -> Result<(), ModemError> {
        let deadline = self.session.timebase().now_ms() + WAKE_TIMEOUT_MS as u64;
        loop {
            match self.swarm_command(b"CS", 500).await {
                Ok(_) => return Ok(()),
                Err(ModemError::PortError) => return Err(ModemError::PortError),
                Err(_) if self.session.timebase().now_ms() >= deadline => {
                    return Err(ModemError::Timeout)
                }
                Err(_) => self.session.timebase().delay_ms(250).await,
            }
        }
    }
}

/// MO status from `+SBDIX: <MO status>, <MOMSN>, ...`
fn parse_sbdix(reply: &AtReply) -> Option<u8> {
    reply
        .field("+SBDIX:")?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

fn swarm_noise_to_percent(noise_dbm: i16) -> u8 {
    ((SWARM_MAX_NOISE_DBM as i32 - noise_dbm as i32) * 100 / 30).clamp(0, 100) as u8
}

impl<P: ModemPort, T: Timebase> Transport for SatelliteModem<P, T> {
    fn kind(&self) -> TransportKind {
        TransportKind::Satellite
    }

    fn power_class(&self) -> PowerClass {
        PowerClass::High
    }

    fn estimated_cost(&self, _payload_len: usize) -> f32 {
        self.module.cost_per_message()
    }

    async fn check_availability(&mut self) -> bool {
        // A sleeping modem is still a candidate; senders wake it first
        if self.asleep {
            return true;
        }
        if self.module.is_sbd() {
            let bars = self.sbd_bars().await;
            self.last_signal = bars.map(|bars| bars * 20);
            bars.is_some_and(|bars| bars >= IRIDIUM_MIN_BARS)
        } else {
            let noise = self.swarm_noise_dbm().await;
            self.last_signal = noise.map(swarm_noise_to_percent);
            noise.is_some_and(|noise| noise <= SWARM_MAX_NOISE_DBM)
        }
    }

    async fn signal_quality(&mut self) -> Option<u8> {
        if self.asleep {
            return self.last_signal;
        }
        self.last_signal = if self.module.is_sbd() {
            self.sbd_bars().await.map(|bars| bars * 20)
        } else {
            self.swarm_noise_dbm().await.map(swarm_noise_to_percent)
        };
        self.last_signal
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if payload.is_empty() {
            return Err(TransportError::EmptyPayload);
        }
        if payload.len() > self.module.max_payload() {
            return Err(TransportError::PayloadTooLarge);
        }
        if self.asleep {
            return Err(TransportError::Unavailable);
        }

        let result = if self.module.is_sbd() {
            let result = self.sbd_send(payload).await;
            if result.is_err() {
                // Leave nothing in the MO buffer for a later session to pick up
                let _ = self.session.command("AT+SBDD0", COMMAND_TIMEOUT_MS).await;
            }
            result
        } else {
            self.swarm_send(payload).await
        };

        result.map_err(TransportError::from)
    }

    async fn sleep(&mut self) -> Result<(), TransportError> {
        if self.asleep {
            return Ok(());
        }
        if self.module.is_sbd() {
            // Flush pending writes to EEPROM before cutting power
            let _ = self.session.command("AT*F", COMMAND_TIMEOUT_MS).await;
        }
        self.session.port_mut().set_power(false)?;
        self.asleep = true;
        Ok(())
    }

    async fn wake(&mut self) -> Result<(), TransportError> {
        if !self.asleep {
            return Ok(());
        }
        self.session.port_mut().set_power(true)?;

        if self.module.is_sbd() {
            self.session.wait_ready(WAKE_TIMEOUT_MS).await?;
            // No RTS/CTS on the 3-wire UART
            self.session.command("AT&K0", COMMAND_TIMEOUT_MS).await?;
        } else {
            self.swarm_wait_ready().await?;
        }

        self.asleep = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::port::mock::MockModemPort;
    use crate::time::mock::MockTimebase;

    fn modem(module: SatelliteModule) -> (SatelliteModem<MockModemPort, MockTimebase>, MockModemPort) {
        let port = MockModemPort::new();
        (SatelliteModem::new(port.clone(), MockTimebase::new(), module), port)
    }

    fn swarm_line(body: &str) -> std::string::String {
        format!("${}*{:02x}\n", body, nmea_checksum(body.as_bytes()))
    }

    #[test]
    fn test_module_constants() {
        assert_eq!(SatelliteModule::Iridium.cost_per_message(), 0.50);
        assert_eq!(SatelliteModule::RockBlock.cost_per_message(), 0.15);
        assert_eq!(SatelliteModule::Swarm.max_payload(), 192);
        assert_eq!(SatelliteModule::Swarm.orbital_period_ms(), 95 * 60 * 1000);
        assert_eq!(SatelliteModule::from_byte(2), Some(SatelliteModule::Swarm));
        assert_eq!(SatelliteModule::from_byte(3), None);
    }

    #[test]
    fn test_sbd_checksum() {
        assert_eq!(sbd_checksum(b"hello"), [0x02, 0x14]);
        assert_eq!(sbd_checksum(&[0xff; 300]), ((300u32 * 0xff) as u16).to_be_bytes());
    }

    #[test]
    fn test_swarm_checksum_round_trip() {
        let line = swarm_line("RT RSSI=-102");
        assert_eq!(verify_swarm_line(line.trim()), Some("RT RSSI=-102"));
        assert_eq!(verify_swarm_line("$RT RSSI=-102*00"), None);
    }

    #[test]
    fn test_iridium_availability_from_bars() {
        let (mut modem, port) = modem(SatelliteModule::Iridium);
        port.expect_reply("\r\n+CSQF:3\r\n\r\nOK\r\n");
        port.expect_reply("\r\n+CSQF:0\r\n\r\nOK\r\n");

        futures::executor::block_on(async {
            assert!(modem.check_availability().await);
            assert!(!modem.check_availability().await);
        });
    }

    #[test]
    fn test_iridium_send_session() {
        let (mut modem, port) = modem(SatelliteModule::RockBlock);
        port.expect_reply("READY\r\n");
        port.expect_reply("0\r\n\r\nOK\r\n");
        port.expect_reply("\r\n+SBDIX: 0, 12, 0, 0, 0, 0\r\n\r\nOK\r\n");

        futures::executor::block_on(modem.send(b"hello")).unwrap();

        let written = port.written();
        let mut expected = b"AT+SBDWB=5\rhello".to_vec();
        expected.extend_from_slice(&[0x02, 0x14]);
        expected.extend_from_slice(b"AT+SBDIX\r");
        assert_eq!(written, expected);
        assert_eq!(modem.last_mo_status(), Some(0));
    }

    #[test]
    fn test_iridium_failed_session_clears_buffer() {
        let (mut modem, port) = modem(SatelliteModule::Iridium);
        port.expect_reply("READY\r\n");
        port.expect_reply("0\r\n\r\nOK\r\n");
        port.expect_reply("\r\n+SBDIX: 32, 12, 2, 0, 0, 0\r\n\r\nOK\r\n");
        port.expect_reply("\r\nOK\r\n");

        let result = futures::executor::block_on(modem.send(b"hi"));

        assert_eq!(result, Err(TransportError::Rejected));
        assert_eq!(modem.last_mo_status(), Some(32));
        assert!(port.written_text().ends_with("AT+SBDD0\r"));
    }

    #[test]
    fn test_payload_limits() {
        let (mut modem, _) = modem(SatelliteModule::Swarm);

        futures::executor::block_on(async {
            assert_eq!(modem.send(&[]).await, Err(TransportError::EmptyPayload));
            assert_eq!(
                modem.send(&[0u8; 193]).await,
                Err(TransportError::PayloadTooLarge)
            );
        });
    }

    #[test]
    fn test_swarm_send() {
        let (mut modem, port) = modem(SatelliteModule::Swarm);
        port.expect_reply(&swarm_line("TD OK,5354468575"));

        futures::executor::block_on(modem.send(&[0xab, 0x01])).unwrap();

        let expected = swarm_line("TD ab01");
        assert_eq!(port.written_text(), expected);
    }

    #[test]
    fn test_swarm_rejection() {
        let (mut modem, port) = modem(SatelliteModule::Swarm);
        port.expect_reply(&swarm_line("TD ERR,BADDATA"));

        let result = futures::executor::block_on(modem.send(b"x"));
        assert_eq!(result, Err(TransportError::Rejected));
    }

    #[test]
    fn test_swarm_noise_gates_availability() {
        let (mut modem, port) = modem(SatelliteModule::Swarm);
        port.expect_reply(&swarm_line("RT RSSI=-102"));
        port.expect_reply(&swarm_line("RT RSSI=-80"));

        futures::executor::block_on(async {
            assert!(modem.check_availability().await);
            assert!(!modem.check_availability().await);
        });
    }

    #[test]
    fn test_sleep_and_wake_drive_power_line() {
        let (mut modem, port) = modem(SatelliteModule::Iridium);
        port.expect_reply("\r\n+CSQF:4\r\n\r\nOK\r\n");
        port.expect_reply("\r\nOK\r\n"); // AT*F
        port.expect_reply("\r\nOK\r\n"); // AT
        port.expect_reply("\r\nOK\r\n"); // AT&K0

        futures::executor::block_on(async {
            assert!(modem.check_availability().await);
            modem.sleep().await.unwrap();
            assert!(!port.is_powered());

            // Still a candidate while powered down, with the last reading
            let written = port.written().len();
            assert!(modem.check_availability().await);
            assert_eq!(modem.signal_quality().await, Some(80));
            assert_eq!(port.written().len(), written);

            modem.wake().await.unwrap();
        });

        assert!(port.is_powered());
    }
}
