//! Persistence of the queue and daily counters across reboots
//!
//! Snapshot layout (little endian):
//! ```text
//! ["TC"][version u8][day u32][sent u32][cost f32][count u8]
//! count * [priority u8][seq u32][attempts u8][len u16][payload]
//! [crc16 u16]
//! ```
//! `day` is `u32::MAX` when the calendar day is unknown. The CRC is
//! CRC-16/XMODEM over everything before it.

use crate::config::queue::CAPACITY;
use crate::config::satellite::MAX_PAYLOAD;
use crate::satellite::queue::StoredMessage;
use crate::satellite::usage::DailyUsage;
use crate::transport::traits::Priority;
use crc::{Crc, CRC_16_XMODEM};
use heapless::Vec;

const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

const MAGIC: [u8; 2] = *b"TC";
pub const SNAPSHOT_VERSION: u8 = 1;

const HEADER_LEN: usize = 2 + 1 + 4 + 4 + 4 + 1;
const MESSAGE_HEADER_LEN: usize = 1 + 4 + 1 + 2;
const NO_DAY: u32 = u32::MAX;

/// Largest possible snapshot
pub const SNAPSHOT_MAX: usize = HEADER_LEN + CAPACITY * (MESSAGE_HEADER_LEN + MAX_PAYLOAD) + 2;

/// Errors from state persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistError {
    /// Storage backend failed
    Io,
    /// Nothing stored yet
    Empty,
    BadMagic,
    UnsupportedVersion,
    /// Snapshot ends early or a field is out of range
    Truncated,
    Checksum,
    /// Output buffer too small
    Overflow,
}

/// Non-volatile storage for one snapshot
pub trait StateStore {
    /// Read the stored snapshot into `buf`, returning its length
    fn load(&mut self, buf: &mut [u8]) -> Result<usize, PersistError>;

    /// Replace the stored snapshot
    fn save(&mut self, data: &[u8]) -> Result<(), PersistError>;
}

/// Decoded engine state
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub usage: DailyUsage,
    pub messages: Vec<StoredMessage, CAPACITY>,
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn put(&mut self, bytes: &[u8]) -> Result<(), PersistError> {
        let end = self.pos + bytes.len();
        self.buf
            .get_mut(self.pos..end)
            .ok_or(PersistError::Overflow)?
            .copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], PersistError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + len)
            .ok_or(PersistError::Truncated)?;
        self.pos += len;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, PersistError> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], PersistError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

/// Encode usage and queued messages into `out`, returning the length
pub fn encode<'m>(
    usage: &DailyUsage,
    messages: impl Iterator<Item = &'m StoredMessage>,
    out: &mut [u8],
) -> Result<usize, PersistError> {
    let mut w = Writer { buf: out, pos: 0 };

    w.put(&MAGIC)?;
    w.put(&[SNAPSHOT_VERSION])?;
    w.put(&usage.day.unwrap_or(NO_DAY).to_le_bytes())?;
    w.put(&usage.messages_sent.to_le_bytes())?;
    w.put(&usage.cost.to_le_bytes())?;

    let count_pos = w.pos;
    w.put(&[0])?;

    let mut count = 0u8;
    for message in messages {
        w.put(&[message.priority as u8])?;
        w.put(&message.seq.to_le_bytes())?;
        w.put(&[message.attempts])?;
        w.put(&(message.payload.len() as u16).to_le_bytes())?;
        w.put(&message.payload)?;
        count += 1;
    }
    w.buf[count_pos] = count;

    let crc = CRC.checksum(&w.buf[..w.pos]);
    w.put(&crc.to_le_bytes())?;
    Ok(w.pos)
}

/// Decode and verify a snapshot
pub fn decode(data: &[u8]) -> Result<Snapshot, PersistError> {
    if data.len() < HEADER_LEN + 2 {
        return Err(PersistError::Truncated);
    }
    if data[..2] != MAGIC {
        return Err(PersistError::BadMagic);
    }
    if data[2] != SNAPSHOT_VERSION {
        return Err(PersistError::UnsupportedVersion);
    }

    let mut r = Reader { buf: data, pos: 3 };
    let day = u32::from_le_bytes(r.array()?);
    let messages_sent = u32::from_le_bytes(r.array()?);
    let cost = f32::from_le_bytes(r.array()?);
    let count = r.u8()? as usize;
    if count > CAPACITY || !cost.is_finite() {
        return Err(PersistError::Truncated);
    }

    let mut messages = Vec::new();
    for _ in 0..count {
        let priority = Priority::from_byte(r.u8()?).ok_or(PersistError::Truncated)?;
        let seq = u32::from_le_bytes(r.array()?);
        let attempts = r.u8()?;
        let len = u16::from_le_bytes(r.array()?) as usize;
        let payload = Vec::from_slice(r.take(len)?).map_err(|_| PersistError::Truncated)?;

        // count <= CAPACITY was checked above
        let _ = messages.push(StoredMessage {
            priority,
            seq,
            attempts,
            payload,
        });
    }

    let body_len = r.pos;
    let stored_crc = u16::from_le_bytes(r.array()?);
    if CRC.checksum(&data[..body_len]) != stored_crc {
        return Err(PersistError::Checksum);
    }

    Ok(Snapshot {
        usage: DailyUsage {
            messages_sent,
            cost,
            day: (day != NO_DAY).then_some(day),
        },
        messages,
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (DailyUsage, std::vec::Vec<StoredMessage>) {
        let usage = DailyUsage {
            messages_sent: 3,
            cost: 1.5,
            day: Some(20_000),
        };
        let messages = vec![
            StoredMessage {
                priority: Priority::High,
                seq: 7,
                attempts: 1,
                payload: Vec::from_slice(b"\x00alert").unwrap(),
            },
            StoredMessage {
                priority: Priority::Low,
                seq: 9,
                attempts: 0,
                payload: Vec::from_slice(b"\x00tick").unwrap(),
            },
        ];
        (usage, messages)
    }

    #[test]
    fn test_snapshot_restores_state() {
        let (usage, messages) = sample();
        let mut buf = [0u8; SNAPSHOT_MAX];

        let len = encode(&usage, messages.iter(), &mut buf).unwrap();
        let snapshot = decode(&buf[..len]).unwrap();

        assert_eq!(snapshot.usage, usage);
        assert_eq!(snapshot.messages.as_slice(), messages.as_slice());
    }

    #[test]
    fn test_unknown_day_survives() {
        let usage = DailyUsage::default();
        let mut buf = [0u8; 64];
        let len = encode(&usage, core::iter::empty(), &mut buf).unwrap();

        assert_eq!(decode(&buf[..len]).unwrap().usage.day, None);
    }

    #[test]
    fn test_corruption_detected() {
        let (usage, messages) = sample();
        let mut buf = [0u8; SNAPSHOT_MAX];
        let len = encode(&usage, messages.iter(), &mut buf).unwrap();

        let mut corrupt = buf;
        corrupt[10] ^= 0x40;
        assert_eq!(decode(&corrupt[..len]), Err(PersistError::Checksum));

        assert_eq!(decode(&buf[..len - 3]), Err(PersistError::Truncated));

        let mut wrong_magic = buf;
        wrong_magic[0] = b'X';
        assert_eq!(decode(&wrong_magic[..len]), Err(PersistError::BadMagic));

        let mut wrong_version = buf;
        wrong_version[2] = 9;
        assert_eq!(
            decode(&wrong_version[..len]),
            Err(PersistError::UnsupportedVersion)
        );
    }

    #[test]
    fn test_small_buffer_overflows() {
        let (usage, messages) = sample();
        let mut buf = [0u8; 20];
        assert_eq!(
            encode(&usage, messages.iter(), &mut buf),
            Err(PersistError::Overflow)
        );
    }
}
