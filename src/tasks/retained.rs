//! State store in RTC fast memory
//!
//! Survives software resets, watchdog resets and deep sleep, not power loss.

use crate::satellite::persist::{PersistError, StateStore, SNAPSHOT_MAX};

/// Marks a valid length word
const VALID: u32 = 0x5443_5354;

#[repr(C)]
struct Retained {
    valid: u32,
    len: u32,
    data: [u8; SNAPSHOT_MAX],
}

#[esp_hal::ram(unstable(rtc_fast, persistent))]
static mut RETAINED: Retained = Retained {
    valid: 0,
    len: 0,
    data: [0; SNAPSHOT_MAX],
};

/// Handle to the retained snapshot buffer; create only one
pub struct RetainedStateStore {
    _private: (),
}

impl RetainedStateStore {
    /// # Safety
    ///
    /// Must be the only `RetainedStateStore` in the program.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }

    fn cell(&mut self) -> &mut Retained {
        // Exclusive by construction contract and &mut self
        unsafe { &mut *core::ptr::addr_of_mut!(RETAINED) }
    }
}

impl StateStore for RetainedStateStore {
    fn load(&mut self, buf: &mut [u8]) -> Result<usize, PersistError> {
        let cell = self.cell();
        let len = cell.len as usize;
        if cell.valid != VALID || len == 0 || len > SNAPSHOT_MAX {
            return Err(PersistError::Empty);
        }
        buf.get_mut(..len)
            .ok_or(PersistError::Overflow)?
            .copy_from_slice(&cell.data[..len]);
        Ok(len)
    }

    fn save(&mut self, data: &[u8]) -> Result<(), PersistError> {
        let cell = self.cell();
        let dest = cell.data.get_mut(..data.len()).ok_or(PersistError::Overflow)?;
        cell.valid = 0;
        dest.copy_from_slice(data);
        cell.len = data.len() as u32;
        cell.valid = VALID;
        Ok(())
    }
}
