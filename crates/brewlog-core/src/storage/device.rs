//! Narrow interface to the page-erase serial flash chip.
//!
//! The chip exposes two SRAM staging buffers. Data is written into a buffer at
//! a byte offset and then committed to a page as one erase + program
//! operation; reads go the other way, copying a page into a buffer first.
//! Chip select is owned by the implementation and framed around each call,
//! like an `embedded_hal::spi::SpiDevice` transaction.

use embedded_hal::delay::DelayNs;

use super::MAX_PAGE_INDEX;
use crate::error::WaitError;

/// Ready bit of the status register
pub const STATUS_READY: u8 = 0x80;

/// One of the chip's two staging buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingBuffer {
    One = 1,
    Two = 2,
}

impl StagingBuffer {
    /// The buffer that is not `self`.
    pub const fn other(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
        }
    }
}

pub trait BlockDevice {
    type Error: core::fmt::Debug;

    /// Highest valid page index on this device
    fn last_page(&self) -> u16 {
        MAX_PAGE_INDEX
    }

    /// Writes `bytes` into a staging buffer starting at `offset`.
    fn buffer_write(
        &mut self,
        buffer: StagingBuffer,
        offset: u16,
        bytes: &[u8],
    ) -> Result<(), Self::Error>;

    /// Fills `out` from a staging buffer starting at `offset`.
    fn buffer_read(
        &mut self,
        buffer: StagingBuffer,
        offset: u16,
        out: &mut [u8],
    ) -> Result<(), Self::Error>;

    /// Erases `page` and programs it with the buffer contents.
    fn commit_buffer_to_page(
        &mut self,
        buffer: StagingBuffer,
        page: u16,
    ) -> Result<(), Self::Error>;

    /// Copies `page` into a staging buffer.
    fn load_page_to_buffer(
        &mut self,
        buffer: StagingBuffer,
        page: u16,
    ) -> Result<(), Self::Error>;

    fn read_status(&mut self) -> Result<u8, Self::Error>;

    /// Spins on the status register until the ready bit is set.
    ///
    /// There is no timeout; the stall is bounded by the chip's page
    /// erase-and-program time.
    fn wait_ready(&mut self) -> Result<u8, Self::Error> {
        loop {
            let status = self.read_status()?;
            if status & STATUS_READY == STATUS_READY {
                return Ok(status);
            }
        }
    }
}

/// Bounded variant of [`BlockDevice::wait_ready`].
///
/// Polls every `poll_us` microseconds and gives up once `timeout_us` has
/// elapsed without the ready bit.
pub fn wait_ready_timeout<D, T>(
    device: &mut D,
    delay: &mut T,
    poll_us: u32,
    timeout_us: u32,
) -> Result<u8, WaitError<D::Error>>
where
    D: BlockDevice,
    T: DelayNs,
{
    let poll_us = poll_us.max(1);
    let mut waited: u32 = 0;

    loop {
        let status = device.read_status().map_err(WaitError::Device)?;
        if status & STATUS_READY == STATUS_READY {
            return Ok(status);
        }
        if waited >= timeout_us {
            return Err(WaitError::Timeout(timeout_us));
        }
        delay.delay_us(poll_us);
        waited = waited.saturating_add(poll_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ram_flash::RamFlash;

    struct CountingDelay {
        total_us: u32,
    }

    impl DelayNs for CountingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_us += ns / 1000;
        }

        fn delay_us(&mut self, us: u32) {
            self.total_us += us;
        }
    }

    #[test]
    fn test_staging_buffers_alternate() {
        assert_eq!(StagingBuffer::One.other(), StagingBuffer::Two);
        assert_eq!(StagingBuffer::Two.other(), StagingBuffer::One);
        assert_eq!(StagingBuffer::Two as u8, 2);
    }

    #[test]
    fn test_wait_ready_returns_after_busy_polls() {
        let mut flash = RamFlash::new(4);
        flash.set_busy_polls(3);

        let status = flash.wait_ready().unwrap();
        assert_eq!(status & STATUS_READY, STATUS_READY);
        assert_eq!(flash.status_reads(), 4);
    }

    #[test]
    fn test_wait_ready_timeout_gives_up() {
        let mut flash = RamFlash::new(4);
        flash.set_busy_polls(u32::MAX);
        let mut delay = CountingDelay { total_us: 0 };

        let result = wait_ready_timeout(&mut flash, &mut delay, 100, 1_000);
        assert_eq!(result, Err(WaitError::Timeout(1_000)));
        assert_eq!(delay.total_us, 1_000);
    }

    #[test]
    fn test_wait_ready_timeout_succeeds_within_bound() {
        let mut flash = RamFlash::new(4);
        flash.set_busy_polls(2);
        let mut delay = CountingDelay { total_us: 0 };

        let status = wait_ready_timeout(&mut flash, &mut delay, 100, 1_000).unwrap();
        assert_eq!(status & STATUS_READY, STATUS_READY);
        assert_eq!(delay.total_us, 200);
    }
}
