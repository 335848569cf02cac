//! Line-oriented AT command session
//!
//! Sends a command, then collects response lines until a final result or
//! a bounded timeout. Shared by the cellular and satellite drivers.

use core::fmt::Write;

use crate::config::protocol::MAX_AT_LINE;
use crate::config::timing::MODEM_POLL_MS;
use crate::modem::port::{ModemError, ModemPort};
use crate::protocol::framing::FrameAccumulator;
use crate::time::Timebase;
use heapless::{String, Vec};

/// Informational lines kept per reply; extra lines are dropped
pub const MAX_REPLY_LINES: usize = 8;

pub type AtLine = String<MAX_AT_LINE>;

/// Most unprompted bytes discarded before a command is sent
const DRAIN_LIMIT: usize = 512;

/// Lines returned by the modem for one command
#[derive(Debug, Clone, Default)]
pub struct AtReply {
    lines: Vec<AtLine, MAX_REPLY_LINES>,
    final_line: AtLine,
}

impl AtReply {
    /// Informational lines before the final result
    pub fn lines(&self) -> &[AtLine] {
        &self.lines
    }

    /// The line that ended the reply (`OK`, `READY`, ...)
    pub fn final_line(&self) -> &str {
        &self.final_line
    }

    /// Text after `prefix` on the first line that starts with it,
    /// searching informational lines and then the final line
    pub fn field(&self, prefix: &str) -> Option<&str> {
        self.lines
            .iter()
            .map(|line| line.as_str())
            .chain(core::iter::once(self.final_line.as_str()))
            .find_map(|line| line.strip_prefix(prefix))
            .map(str::trim)
    }
}

/// `OK`, `ERROR` or a `+CME`/`+CMS` error
pub fn is_final_result(line: &str) -> bool {
    line == "OK" || is_error_result(line)
}

pub fn is_error_result(line: &str) -> bool {
    line == "ERROR" || line.starts_with("+CME ERROR") || line.starts_with("+CMS ERROR")
}

/// Format a command line into a bounded buffer
pub fn format_line(args: core::fmt::Arguments) -> Result<AtLine, ModemError> {
    let mut line = AtLine::new();
    line.write_fmt(args).map_err(|_| ModemError::Overflow)?;
    Ok(line)
}

/// AT session over a modem port
pub struct AtSession<P, T> {
    port: P,
    timebase: T,
    accumulator: FrameAccumulator<MAX_AT_LINE>,
}

impl<P: ModemPort, T: Timebase> AtSession<P, T> {
    pub fn new(port: P, timebase: T) -> Self {
        Self {
            port,
            timebase,
            accumulator: FrameAccumulator::lines(),
        }
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn timebase(&self) -> &T {
        &self.timebase
    }

    /// Discard anything the modem sent unprompted (URCs, stale echoes)
    ///
    /// Gives up after `DRAIN_LIMIT` bytes; a chattering line is then left to
    /// the reply deadline.
    pub async fn drain(&mut self) -> Result<(), ModemError> {
        let mut buf = [0u8; 64];
        let mut drained = 0;
        while drained < DRAIN_LIMIT {
            let n = self.port.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            drained += n;
        }
        if drained >= DRAIN_LIMIT {
            log::debug!("modem: line still busy after {} bytes", drained);
        }
        self.accumulator.reset();
        Ok(())
    }

    /// Write raw bytes (binary payloads after a prompt)
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<(), ModemError> {
        self.port.write(data).await?;
        self.port.flush().await
    }

    /// Run a command and wait for `OK` / `ERROR`
    pub async fn command(&mut self, command: &str, timeout_ms: u32) -> Result<AtReply, ModemError> {
        self.command_until(command, timeout_ms, is_final_result).await
    }

    /// Run a command and wait until `is_final` accepts a line
    ///
    /// Error results always end the reply and map to `CommandRejected`.
    pub async fn command_until(
        &mut self,
        command: &str,
        timeout_ms: u32,
        is_final: fn(&str) -> bool,
    ) -> Result<AtReply, ModemError> {
        self.drain().await?;

        let mut line: Vec<u8, { MAX_AT_LINE + 1 }> = Vec::new();
        line.extend_from_slice(command.as_bytes())
            .map_err(|_| ModemError::Overflow)?;
        line.push(b'\r').map_err(|_| ModemError::Overflow)?;
        self.write_raw(&line).await?;

        self.read_reply(timeout_ms, is_final).await
    }

    /// Collect lines until a final line or the timeout
    pub async fn read_reply(
        &mut self,
        timeout_ms: u32,
        is_final: fn(&str) -> bool,
    ) -> Result<AtReply, ModemError> {
        let deadline = self.timebase.now_ms() + timeout_ms as u64;
        let mut reply = AtReply::default();
        let mut buf = [0u8; 64];

        loop {
            let n = self.port.read(&mut buf).await?;

            for &byte in &buf[..n] {
                let Some(frame) = self.accumulator.push(byte) else {
                    continue;
                };
                let Ok(text) = core::str::from_utf8(&frame) else {
                    continue;
                };
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }

                let mut owned = AtLine::new();
                // text came from a MAX_AT_LINE frame, so it always fits
                let _ = owned.push_str(text);

                if is_error_result(text) {
                    log::debug!("modem: rejected ({})", text);
                    return Err(ModemError::CommandRejected);
                }
                if is_final(text) {
                    reply.final_line = owned;
                    return Ok(reply);
                }
                if reply.lines.push(owned).is_err() {
                    log::debug!("modem: reply line dropped ({})", text);
                }
            }

            if self.timebase.now_ms() >= deadline {
                return Err(ModemError::Timeout);
            }
            if n == 0 {
                self.timebase.delay_ms(MODEM_POLL_MS).await;
            }
        }
    }

    /// Wait for a prompt byte that is not followed by a line ending
    pub async fn wait_for_prompt(&mut self, prompt: u8, timeout_ms: u32) -> Result<(), ModemError> {
        let deadline = self.timebase.now_ms() + timeout_ms as u64;
        let mut buf = [0u8; 1];

        loop {
            if self.port.read(&mut buf).await? == 1 {
                if buf[0] == prompt {
                    self.accumulator.reset();
                    return Ok(());
                }
                if let Some(frame) = self.accumulator.push(buf[0]) {
                    if let Ok(text) = core::str::from_utf8(&frame) {
                        if is_error_result(text.trim()) {
                            return Err(ModemError::CommandRejected);
                        }
                    }
                }
                if self.timebase.now_ms() >= deadline {
                    return Err(ModemError::Timeout);
                }
                continue;
            }

            if self.timebase.now_ms() >= deadline {
                return Err(ModemError::Timeout);
            }
            self.timebase.delay_ms(MODEM_POLL_MS).await;
        }
    }

    /// Poll `AT` until the modem answers or `timeout_ms` elapses
    pub async fn wait_ready(&mut self, timeout_ms: u32) -> Result<(), ModemError> {
        let deadline = self.timebase.now_ms() + timeout_ms as u64;

        loop {
            match self.command("AT", 500).await {
                Ok(_) => return Ok(()),
                Err(ModemError::PortError) => return Err(ModemError::PortError),
                Err(_) if self.timebase.now_ms() >= deadline => return Err(ModemError::Timeout),
                Err(_) => self.timebase.delay_ms(250).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::port::mock::MockModemPort;
    use crate::time::mock::MockTimebase;

    #[test]
    fn test_command_collects_lines() {
        let port = MockModemPort::new();
        port.expect_reply("\r\n+CSQ: 17,99\r\n\r\nOK\r\n");
        let mut session = AtSession::new(port.clone(), MockTimebase::new());

        let reply = futures::executor::block_on(session.command("AT+CSQ", 1000)).unwrap();

        assert_eq!(reply.final_line(), "OK");
        assert_eq!(reply.field("+CSQ:"), Some("17,99"));
        assert_eq!(port.written(), b"AT+CSQ\r");
    }

    #[test]
    fn test_error_is_rejected() {
        let port = MockModemPort::new();
        port.expect_reply("\r\n+CME ERROR: 10\r\n");
        let mut session = AtSession::new(port, MockTimebase::new());

        let result = futures::executor::block_on(session.command("AT+CREG?", 1000));
        assert!(matches!(result, Err(ModemError::CommandRejected)));
    }

    #[test]
    fn test_silence_times_out_on_virtual_clock() {
        let clock = MockTimebase::new();
        let mut session = AtSession::new(MockModemPort::new(), clock.clone());

        let result = futures::executor::block_on(session.command("AT", 200));

        assert!(matches!(result, Err(ModemError::Timeout)));
        assert!(clock.now_ms() >= 200);
    }

    #[test]
    fn test_custom_final_line() {
        let port = MockModemPort::new();
        port.expect_reply("READY\r\n");
        let mut session = AtSession::new(port, MockTimebase::new());

        let reply = futures::executor::block_on(session.command_until(
            "AT+SBDWB=4",
            1000,
            |line| line == "READY",
        ))
        .unwrap();
        assert_eq!(reply.final_line(), "READY");
    }

    #[test]
    fn test_prompt() {
        let port = MockModemPort::new();
        port.expect_reply("\r\n> ");
        let mut session = AtSession::new(port, MockTimebase::new());

        futures::executor::block_on(async {
            session.write_raw(b"AT+CIPSEND=3\r").await.unwrap();
            session.wait_for_prompt(b'>', 1000).await.unwrap();
        });
    }

    /// Port that never stops talking; each read takes 10 ms of virtual time
    struct ChatteringPort {
        clock: MockTimebase,
        reads: usize,
    }

    impl ModemPort for ChatteringPort {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ModemError> {
            self.reads += 1;
            self.clock.advance(10);
            buf.fill(b'~');
            Ok(buf.len())
        }

        async fn write(&mut self, _data: &[u8]) -> Result<(), ModemError> {
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ModemError> {
            Ok(())
        }

        fn set_power(&mut self, _on: bool) -> Result<(), ModemError> {
            Ok(())
        }
    }

    #[test]
    fn test_chattering_line_still_times_out() {
        let clock = MockTimebase::new();
        let port = ChatteringPort {
            clock: clock.clone(),
            reads: 0,
        };
        let mut session = AtSession::new(port, clock.clone());

        let result = futures::executor::block_on(session.command("AT+CSQF", 2_000));

        assert!(matches!(result, Err(ModemError::Timeout)));
        // Drain budget plus the reply window, one read of slack
        let drain_reads = DRAIN_LIMIT.div_ceil(64) as u64;
        assert!(clock.now_ms() <= (drain_reads + 1) * 10 + 2_000 + 10);
        assert!(session.port_mut().reads < 1_000);
    }

    #[test]
    fn test_surplus_lines_are_dropped() {
        let port = MockModemPort::new();
        let mut reply = std::string::String::new();
        for i in 0..MAX_REPLY_LINES + 3 {
            reply.push_str(&format!("+LINE: {}\r\n", i));
        }
        reply.push_str("OK\r\n");
        port.expect_reply(&reply);
        let mut session = AtSession::new(port, MockTimebase::new());

        let reply = futures::executor::block_on(session.command("AT+LIST", 1000)).unwrap();

        assert_eq!(reply.lines().len(), MAX_REPLY_LINES);
        assert_eq!(reply.final_line(), "OK");
    }

    #[test]
    fn test_format_line_overflow() {
        let long = [b'A'; MAX_AT_LINE + 1];
        let text = core::str::from_utf8(&long).unwrap();
        assert_eq!(
            format_line(format_args!("{}", text)).unwrap_err(),
            ModemError::Overflow
        );
    }
}
