//! Serial tasks bridging the host control link
//!
//! The reader turns COBS frames into command envelopes for the uplink task;
//! the writer serialises every response addressed to the serial source. Both
//! are generic over `embedded_io_async`, so USB Serial JTAG or a UART work.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embedded_io_async::{Read, Write};

use crate::commands::serialiser::cobs_decode;
use crate::commands::{Command, CommandParser, Response, ResponseSerialiser, ResponseStatus};
use crate::config::protocol::MAX_FRAME_SIZE;
use crate::dispatcher::channels::COMMAND_CHANNEL_SIZE;
use crate::dispatcher::{CommandEnvelope, CommandSource, ResponseMessage, RESPONSE_CHANNEL};
use crate::protocol::framing::FrameAccumulator;

/// Result of attempting to parse a frame
enum ReadResult {
    Command(Command),
    /// Parse error (should send error response)
    ParseError(ResponseStatus, u8),
}

pub type CommandSender =
    Sender<'static, CriticalSectionRawMutex, CommandEnvelope, COMMAND_CHANNEL_SIZE>;

pub type CommandReceiver =
    Receiver<'static, CriticalSectionRawMutex, CommandEnvelope, COMMAND_CHANNEL_SIZE>;

/// Task that reads commands from a serial interface.
pub async fn serial_reader_task<R: Read>(mut reader: R, command_sender: CommandSender) {
    let mut accumulator = FrameAccumulator::<MAX_FRAME_SIZE>::new();
    let parser = CommandParser::new();
    let mut sequence_counter: u16 = 0;

    // Parse errors are answered here without reaching the uplink task
    let response_pub = RESPONSE_CHANNEL.immediate_publisher();

    loop {
        let mut buf = [0u8; 64];
        match reader.read(&mut buf).await {
            Ok(0) => continue,
            Ok(n) => {
                for &byte in &buf[..n] {
                    let Some(frame) = accumulator.push(byte) else {
                        continue;
                    };
                    let seq_id = sequence_counter;
                    sequence_counter = sequence_counter.wrapping_add(1);

                    match process_frame(&parser, frame) {
                        Some(ReadResult::Command(command)) => {
                            log::debug!("serial: {:?} (seq {})", command.id(), seq_id);
                            command_sender
                                .send(CommandEnvelope {
                                    command,
                                    source: CommandSource::Serial,
                                    sequence_id: seq_id,
                                })
                                .await;
                        }
                        Some(ReadResult::ParseError(status, cmd_id)) => {
                            log::warn!("serial: bad frame for 0x{:02x} ({:?})", cmd_id, status);
                            response_pub.publish_immediate(ResponseMessage::Command {
                                source: CommandSource::Serial,
                                sequence_id: seq_id,
                                response: Response::error_raw(status, cmd_id),
                            });
                        }
                        None => {}
                    }
                }
            }
            Err(_) => {
                embassy_time::Timer::after(embassy_time::Duration::from_millis(10)).await;
            }
        }
    }
}

/// Process a complete COBS frame
fn process_frame(
    parser: &CommandParser,
    mut frame: heapless::Vec<u8, MAX_FRAME_SIZE>,
) -> Option<ReadResult> {
    // Add back the zero delimiter that FrameAccumulator strips
    // (corncobs::decode_buf expects it)
    let _ = frame.push(0x00);

    let decoded = cobs_decode(&frame).ok()?;
    if decoded.len() < 2 {
        return None;
    }

    // [version][cmd_id]...
    let command_id = decoded[1];

    match parser.parse(&decoded) {
        Ok(cmd) => Some(ReadResult::Command(cmd)),
        Err(status) => Some(ReadResult::ParseError(status, command_id)),
    }
}

/// Task that writes responses to a serial interface.
pub async fn serial_writer_task<W: Write>(mut writer: W) {
    let serialiser = ResponseSerialiser::new();

    let Ok(mut response_sub) = RESPONSE_CHANNEL.subscriber() else {
        log::error!("serial: no response subscriber slot");
        return;
    };

    loop {
        let response = match response_sub.next_message_pure().await {
            ResponseMessage::Command {
                source, response, ..
            } if source == CommandSource::Serial => response,
            ResponseMessage::Command { .. } => continue,
            ResponseMessage::Unsolicited(response) => response,
        };

        let encoded = serialiser.serialise(&response);
        if writer.write_all(&encoded).await.is_err() {
            log::warn!("serial: write failed");
        }
    }
}
