//! Sequential walk over committed pages.
//!
//! Pages are filled from page 0 upwards with records packed from offset 0,
//! so the first header that fails to decode marks the end of the written
//! data in that page. A page counts as full when no record fits in the space
//! left after that point, in which case the walk continues on the next page.
//!
//! A bit flip inside a header makes it look like free space: the walk stops
//! there and any records after it are lost to the scan. That is not corrected
//! here; the scanner only reports it when the bytes after the stop point are
//! not erased.

use log::{debug, info, warn};

use super::device::{BlockDevice, StagingBuffer};
use super::record::{self, EncodedRecord, HEADER_SIZE, RECORD_SIZE};
use super::{DataSet, ERASED_BYTE, PAGE_SIZE, Payload};

/// Where logging can resume after a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Nothing has been written: page 0 starts with blank flash
    Empty,
    /// The next record goes to `offset` in `page`
    ResumeAt { page: u16, offset: u16 },
    /// Every page up to the device's last one is full
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub outcome: ScanOutcome,
    /// Records found before the stop point
    pub records: u32,
    /// Headers with an unexpected size plus non-erased bytes after the stop point
    pub integrity_faults: u16,
}

/// A record read back from flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredRecord {
    pub page: u16,
    pub offset: u16,
    pub payload: Payload,
    /// Always true unless the `checksum` feature is on and the byte mismatched
    pub checksum_ok: bool,
}

impl StoredRecord {
    pub fn data_set(&self) -> DataSet {
        DataSet::from_payload(&self.payload)
    }
}

enum Step {
    Record { page: u16, offset: u16, size: u8 },
    Gap { page: u16, offset: u16 },
    Exhausted,
}

struct PageWalker {
    scratch: StagingBuffer,
    page: u16,
    offset: u16,
    loaded: bool,
}

impl PageWalker {
    fn new(scratch: StagingBuffer, first_page: u16) -> Self {
        Self {
            scratch,
            page: first_page,
            offset: 0,
            loaded: false,
        }
    }

    fn step<D: BlockDevice>(&mut self, device: &mut D) -> Result<Step, D::Error> {
        loop {
            if !self.loaded {
                if self.page > device.last_page() {
                    return Ok(Step::Exhausted);
                }
                device.load_page_to_buffer(self.scratch, self.page)?;
                device.wait_ready()?;
                self.loaded = true;
                self.offset = 0;
            }

            if self.offset as usize + HEADER_SIZE <= PAGE_SIZE {
                let mut header = [0u8; HEADER_SIZE];
                device.buffer_read(self.scratch, self.offset, &mut header)?;

                if let Some(size) = record::decode_header(header) {
                    let offset = self.offset;
                    self.offset += size as u16;
                    return Ok(Step::Record {
                        page: self.page,
                        offset,
                        size,
                    });
                }
            }

            // Mis-sized headers can leave the offset anywhere, even past the end.
            if self.offset as usize + RECORD_SIZE > PAGE_SIZE {
                match self.page.checked_add(1) {
                    Some(next) => {
                        self.page = next;
                        self.loaded = false;
                    }
                    None => return Ok(Step::Exhausted),
                }
                continue;
            }

            return Ok(Step::Gap {
                page: self.page,
                offset: self.offset,
            });
        }
    }
}

fn is_well_formed(offset: u16, size: u8) -> bool {
    size as usize == RECORD_SIZE && offset as usize + RECORD_SIZE <= PAGE_SIZE
}

/// Find the first free slot after the last record on the device.
///
/// `scratch` must be the staging buffer not claimed by the logging session;
/// its contents are overwritten.
pub fn locate_resume_point<D: BlockDevice>(
    device: &mut D,
    scratch: StagingBuffer,
) -> Result<ScanReport, D::Error> {
    let mut walker = PageWalker::new(scratch, 0);
    let mut records: u32 = 0;
    let mut integrity_faults: u16 = 0;

    let outcome = loop {
        match walker.step(device)? {
            Step::Record { page, offset, size } => {
                records += 1;
                if !is_well_formed(offset, size) {
                    warn!(
                        "Header at page {} offset {} declares {} bytes, expected {}",
                        page, offset, size, RECORD_SIZE
                    );
                    integrity_faults = integrity_faults.saturating_add(1);
                }
            }
            Step::Gap { page, offset } => {
                if !tail_is_erased(device, scratch, offset)? {
                    warn!(
                        "Page {} holds data after offset {}; records past a damaged header are lost",
                        page, offset
                    );
                    integrity_faults = integrity_faults.saturating_add(1);
                }

                if page == 0 && offset == 0 {
                    break ScanOutcome::Empty;
                }
                break ScanOutcome::ResumeAt { page, offset };
            }
            Step::Exhausted => break ScanOutcome::Full,
        }
    };

    match outcome {
        ScanOutcome::Empty => info!("The device is empty"),
        ScanOutcome::Full => info!("The device is full ({} records)", records),
        ScanOutcome::ResumeAt { page, offset } => info!(
            "Found {} records; next data set goes to page {:#06X} offset {:#06X}",
            records, page, offset
        ),
    }

    Ok(ScanReport {
        outcome,
        records,
        integrity_faults,
    })
}

fn tail_is_erased<D: BlockDevice>(
    device: &mut D,
    scratch: StagingBuffer,
    from: u16,
) -> Result<bool, D::Error> {
    let mut chunk = [0u8; 32];
    let mut offset = from as usize;

    while offset < PAGE_SIZE {
        let len = (PAGE_SIZE - offset).min(chunk.len());
        device.buffer_read(scratch, offset as u16, &mut chunk[..len])?;
        if chunk[..len].iter().any(|&b| b != ERASED_BYTE) {
            return Ok(false);
        }
        offset += len;
    }

    Ok(true)
}

/// Iterator over committed records in write order, starting at page 0.
///
/// Records still sitting in the active staging buffer are not visible until
/// they are committed.
pub struct RecordReader<'a, D: BlockDevice> {
    device: &'a mut D,
    walker: PageWalker,
    done: bool,
}

impl<'a, D: BlockDevice> RecordReader<'a, D> {
    pub fn new(device: &'a mut D, scratch: StagingBuffer) -> Self {
        Self {
            device,
            walker: PageWalker::new(scratch, 0),
            done: false,
        }
    }
}

impl<D: BlockDevice> Iterator for RecordReader<'_, D> {
    type Item = Result<StoredRecord, D::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.walker.step(&mut *self.device) {
                Ok(Step::Record { page, offset, size }) => {
                    if !is_well_formed(offset, size) {
                        debug!("Skipping {}-byte record at page {} offset {}", size, page, offset);
                        continue;
                    }
                    return Some(read_record(&mut *self.device, self.walker.scratch, page, offset));
                }
                Ok(_) => self.done = true,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

fn read_record<D: BlockDevice>(
    device: &mut D,
    scratch: StagingBuffer,
    page: u16,
    offset: u16,
) -> Result<StoredRecord, D::Error> {
    let mut bytes: EncodedRecord = [0u8; RECORD_SIZE];
    device.buffer_read(scratch, offset, &mut bytes)?;

    let checksum_ok = record::verify(&bytes);
    if !checksum_ok {
        warn!("Checksum mismatch in record at page {} offset {}", page, offset);
    }

    Ok(StoredRecord {
        page,
        offset,
        payload: record::payload_of(&bytes),
        checksum_ok,
    })
}

/// Fetch the `index`-th record stored in `page`.
pub fn retrieve<D: BlockDevice>(
    device: &mut D,
    scratch: StagingBuffer,
    page: u16,
    index: u16,
) -> Result<Option<StoredRecord>, D::Error> {
    if page > device.last_page() {
        return Ok(None);
    }

    let mut walker = PageWalker::new(scratch, page);
    let mut remaining = index;

    loop {
        match walker.step(device)? {
            Step::Record {
                page: found,
                offset,
                size,
            } if found == page => {
                if remaining == 0 {
                    if !is_well_formed(offset, size) {
                        return Ok(None);
                    }
                    return read_record(device, scratch, page, offset).map(Some);
                }
                remaining -= 1;
            }
            _ => return Ok(None),
        }
    }
}
