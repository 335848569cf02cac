//! Device communication client.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::Result;
use serialport::SerialPort;

use crate::protocol::{
    build_command, build_command_payload, cobs_decode, cobs_encode, parse_networks,
    parse_response, CommandId, NetworkEntry, Priority, Response, ResponseId, StatusReport,
};

/// Find available data ports by scanning ttyACM devices and testing with GetVersion.
pub fn find_data_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports()?;
    let mut data_ports = Vec::new();

    for port_info in ports {
        // USB Serial JTAG enumerates as CDC-ACM
        if !port_info.port_name.contains("ttyACM") {
            continue;
        }

        if let Ok(mut client) = DeviceClient::new(&port_info.port_name, 115200) {
            client.set_timeout(Duration::from_millis(500));
            if let Ok(response) = client.send_command(CommandId::GetVersion, &[]) {
                if response.resp_id == ResponseId::Version {
                    data_ports.push(port_info.port_name.clone());
                }
            }
        }
    }

    Ok(data_ports)
}

/// Resolve a port argument - returns the port path if not "auto", otherwise auto-detects.
pub fn resolve_port(port_arg: &str) -> Result<String> {
    if port_arg != "auto" {
        return Ok(port_arg.to_string());
    }
    match find_data_ports()?.into_iter().next() {
        Some(port) => Ok(port),
        None => anyhow::bail!("No data port found - ensure device is connected"),
    }
}

/// Client for communicating with the uplink controller.
pub struct DeviceClient {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl DeviceClient {
    /// Create a new device client.
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_secs(2))
            .open()?;

        Ok(Self {
            port,
            timeout: Duration::from_secs(2),
        })
    }

    /// Set the response timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Clear any pending data in the serial buffer.
    pub fn clear_buffer(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }

    /// Send a command and wait for its response.
    ///
    /// The firmware pushes an unsolicited Status after a tick delivers queued
    /// messages; those are skipped unless a Status is what was asked for.
    pub fn send_command(&mut self, cmd_id: CommandId, payload: &[u8]) -> Result<Response> {
        let frame = build_command(cmd_id, payload);
        self.port.write_all(&frame)?;
        self.port.flush()?;

        loop {
            let response = self.read_response()?;
            if response.resp_id == ResponseId::Status && cmd_id != CommandId::GetStatus {
                continue;
            }
            return Ok(response);
        }
    }

    /// Send a raw command with custom command ID (for testing invalid commands).
    pub fn send_raw_command(&mut self, cmd_id: u8, payload: &[u8]) -> Result<Response> {
        let frame = build_command_payload(cmd_id, payload);
        self.send_raw_frame(&frame)
    }

    /// Send an already-built frame, COBS encoding it first.
    pub fn send_raw_frame(&mut self, frame: &[u8]) -> Result<Response> {
        let encoded = cobs_encode(frame);
        self.port.write_all(&encoded)?;
        self.port.flush()?;
        self.read_response()
    }

    pub fn send_data(&mut self, priority: Priority, data: &[u8]) -> Result<Response> {
        let mut payload = Vec::with_capacity(data.len() + 1);
        payload.push(priority as u8);
        payload.extend_from_slice(data);
        self.send_command(CommandId::SendData, &payload)
    }

    pub fn status(&mut self) -> Result<StatusReport> {
        let response = self.send_command(CommandId::GetStatus, &[])?;
        if response.resp_id != ResponseId::Status {
            anyhow::bail!("Expected Status response, got {:?}", response.resp_id);
        }
        StatusReport::parse(&response.payload)
    }

    pub fn scan_networks(&mut self) -> Result<Vec<NetworkEntry>> {
        let response = self.send_command(CommandId::ScanNetworks, &[])?;
        if response.resp_id != ResponseId::Networks {
            anyhow::bail!("Expected Networks response, got {:?}", response.resp_id);
        }
        parse_networks(&response.payload)
    }

    pub fn set_battery(&mut self, percent: u8) -> Result<Response> {
        self.send_command(CommandId::SetBattery, &[percent])
    }

    pub fn set_emergency(&mut self, on: bool) -> Result<Response> {
        self.send_command(CommandId::SetEmergency, &[on as u8])
    }

    pub fn set_time(&mut self, unix_secs: u64) -> Result<Response> {
        self.send_command(CommandId::SetTime, &unix_secs.to_le_bytes())
    }

    fn read_response(&mut self) -> Result<Response> {
        let mut frame = self.read_frame()?;
        // corncobs expects the delimiter
        frame.push(0x00);
        let decoded = cobs_decode(&frame)?;
        parse_response(&decoded)
    }

    /// Read bytes until zero delimiter.
    fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut buf = [0u8; 1];
        let start = Instant::now();

        while start.elapsed() < self.timeout {
            match self.port.read(&mut buf) {
                Ok(1) => {
                    if buf[0] == 0x00 {
                        if !data.is_empty() {
                            return Ok(data);
                        }
                    } else {
                        data.push(buf[0]);
                    }
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }

        anyhow::bail!(
            "Timeout waiting for response, got {} bytes: {:02x?}",
            data.len(),
            data
        );
    }
}
