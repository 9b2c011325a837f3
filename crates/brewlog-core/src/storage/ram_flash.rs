//! Heap-backed model of the dual-buffer page-erase flash chip.

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use thiserror_no_std::Error;

use super::device::{BlockDevice, STATUS_READY, StagingBuffer};
use super::{ERASED_BYTE, PAGE_SIZE};

/// Status byte reported when idle (ready bit plus the 32 Mbit density code)
const STATUS_IDLE: u8 = STATUS_READY | 0x2C;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamFlashError {
    #[error("page {0} is beyond the last page")]
    PageOutOfRange(u16),
    #[error("{len} bytes at offset {offset} overrun the staging buffer")]
    OffsetOutOfRange { offset: u16, len: usize },
}

/// In-memory flash chip.
///
/// Pages start erased. The staging buffers are volatile: [`power_cycle`]
/// leaves them holding garbage, as the real chip does after power-up.
///
/// [`power_cycle`]: RamFlash::power_cycle
pub struct RamFlash {
    pages: Vec<u8>,
    buffers: [[u8; PAGE_SIZE]; 2],
    last_page: u16,
    busy_polls: u32,
    status_reads: u32,
    commits: u32,
    loads: u32,
    last_commit: Option<(StagingBuffer, u16)>,
}

impl RamFlash {
    /// Create an erased device with pages `0..=last_page`.
    pub fn new(last_page: u16) -> Self {
        Self {
            pages: vec![ERASED_BYTE; (last_page as usize + 1) * PAGE_SIZE],
            buffers: [[ERASED_BYTE; PAGE_SIZE]; 2],
            last_page,
            busy_polls: 0,
            status_reads: 0,
            commits: 0,
            loads: 0,
            last_commit: None,
        }
    }

    /// Contents of a committed page.
    pub fn page(&self, page: u16) -> &[u8] {
        let start = page as usize * PAGE_SIZE;
        &self.pages[start..start + PAGE_SIZE]
    }

    /// Mutable page contents, for injecting corruption.
    pub fn page_mut(&mut self, page: u16) -> &mut [u8] {
        let start = page as usize * PAGE_SIZE;
        &mut self.pages[start..start + PAGE_SIZE]
    }

    pub fn buffer(&self, buffer: StagingBuffer) -> &[u8; PAGE_SIZE] {
        &self.buffers[buffer.index()]
    }

    /// Number of buffer-to-page commits so far
    pub fn commits(&self) -> u32 {
        self.commits
    }

    /// Number of page-to-buffer loads so far
    pub fn loads(&self) -> u32 {
        self.loads
    }

    pub fn last_commit(&self) -> Option<(StagingBuffer, u16)> {
        self.last_commit
    }

    pub fn status_reads(&self) -> u32 {
        self.status_reads
    }

    /// Report busy for the next `polls` status reads.
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_polls = polls;
    }

    /// Drop power: staging buffers lose their contents, pages are kept.
    pub fn power_cycle(&mut self) {
        for (i, buffer) in self.buffers.iter_mut().enumerate() {
            for (j, byte) in buffer.iter_mut().enumerate() {
                *byte = (i * 31 + j * 7) as u8;
            }
        }
        self.busy_polls = 0;
    }

    /// Mark every page as written with `count` copies of `record`, leaving the
    /// tail of each page erased.
    pub fn fill_pages(&mut self, pages: core::ops::RangeInclusive<u16>, record: &[u8], count: usize) {
        for page in pages {
            let bytes = self.page_mut(page);
            bytes.fill(ERASED_BYTE);
            for i in 0..count {
                let start = i * record.len();
                bytes[start..start + record.len()].copy_from_slice(record);
            }
        }
    }

    fn check_page(&self, page: u16) -> Result<usize, RamFlashError> {
        if page > self.last_page {
            return Err(RamFlashError::PageOutOfRange(page));
        }
        Ok(page as usize * PAGE_SIZE)
    }

    fn check_span(offset: u16, len: usize) -> Result<usize, RamFlashError> {
        let start = offset as usize;
        if start + len > PAGE_SIZE {
            return Err(RamFlashError::OffsetOutOfRange { offset, len });
        }
        Ok(start)
    }
}

impl BlockDevice for RamFlash {
    type Error = RamFlashError;

    fn last_page(&self) -> u16 {
        self.last_page
    }

    fn buffer_write(
        &mut self,
        buffer: StagingBuffer,
        offset: u16,
        bytes: &[u8],
    ) -> Result<(), Self::Error> {
        let start = Self::check_span(offset, bytes.len())?;
        self.buffers[buffer.index()][start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn buffer_read(
        &mut self,
        buffer: StagingBuffer,
        offset: u16,
        out: &mut [u8],
    ) -> Result<(), Self::Error> {
        let start = Self::check_span(offset, out.len())?;
        out.copy_from_slice(&self.buffers[buffer.index()][start..start + out.len()]);
        Ok(())
    }

    fn commit_buffer_to_page(
        &mut self,
        buffer: StagingBuffer,
        page: u16,
    ) -> Result<(), Self::Error> {
        let start = self.check_page(page)?;
        self.pages[start..start + PAGE_SIZE].copy_from_slice(&self.buffers[buffer.index()]);
        self.commits += 1;
        self.last_commit = Some((buffer, page));
        Ok(())
    }

    fn load_page_to_buffer(
        &mut self,
        buffer: StagingBuffer,
        page: u16,
    ) -> Result<(), Self::Error> {
        let start = self.check_page(page)?;
        self.buffers[buffer.index()].copy_from_slice(&self.pages[start..start + PAGE_SIZE]);
        self.loads += 1;
        Ok(())
    }

    fn read_status(&mut self) -> Result<u8, Self::Error> {
        self.status_reads += 1;
        if self.busy_polls > 0 {
            self.busy_polls -= 1;
            return Ok(STATUS_IDLE & !STATUS_READY);
        }
        Ok(STATUS_IDLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_device_is_erased() {
        let flash = RamFlash::new(3);
        assert!(flash.page(0).iter().all(|&b| b == ERASED_BYTE));
        assert!(flash.page(3).iter().all(|&b| b == ERASED_BYTE));
    }

    #[test]
    fn test_commit_and_load_through_buffers() {
        let mut flash = RamFlash::new(3);
        flash.buffer_write(StagingBuffer::One, 10, &[1, 2, 3]).unwrap();
        flash.commit_buffer_to_page(StagingBuffer::One, 2).unwrap();
        assert_eq!(&flash.page(2)[10..13], &[1, 2, 3]);

        flash.load_page_to_buffer(StagingBuffer::Two, 2).unwrap();
        let mut out = [0u8; 3];
        flash.buffer_read(StagingBuffer::Two, 10, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3]);
        assert_eq!(flash.commits(), 1);
        assert_eq!(flash.loads(), 1);
    }

    #[test]
    fn test_bounds_are_checked() {
        let mut flash = RamFlash::new(3);
        assert_eq!(
            flash.commit_buffer_to_page(StagingBuffer::One, 4),
            Err(RamFlashError::PageOutOfRange(4))
        );
        assert_eq!(
            flash.buffer_write(StagingBuffer::One, 527, &[0, 0]),
            Err(RamFlashError::OffsetOutOfRange {
                offset: 527,
                len: 2
            })
        );
    }
}
