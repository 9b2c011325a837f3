use log::{debug, error, info, warn};

use super::accumulator::RunningAverage;
use super::device::{BlockDevice, StagingBuffer};
use super::record::{self, MAX_RECORD_SIZE, RECORD_SIZE};
use super::scanner::{self, RecordReader, ScanOutcome, StoredRecord};
use super::schedule::Schedule;
use super::{DataSet, ERASED_BYTE, PAGE_SIZE, Payload, Timestamp};
use crate::clock::{Clock, TimeAndDate};
use crate::config::{DataloggerConfig, InitMode};
use crate::error::{ConfigError, DataloggerError};
use crate::sampling::SampleSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerState {
    Uninitialized,
    Initialized,
    Started,
    /// The device was full and restarting was not allowed
    Failed,
}

/// Position where the next record will be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub page: u16,
    pub offset: u16,
    /// Staging buffer collecting the current page
    pub buffer: StagingBuffer,
}

impl Cursor {
    const fn origin() -> Self {
        Self {
            page: 0,
            offset: 0,
            buffer: StagingBuffer::One,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Append requested and nothing was found on the device
    Empty,
    /// Append requested and logging continues after existing records
    Resumed { page: u16, offset: u16 },
    /// Logging starts over at page 0
    Overwritten,
    /// Append requested, the device was full, and logging starts over at page 0
    RestartedAfterFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The logger is not initialized; nothing was written
    Skipped,
    /// The record is in the staging buffer; `offset` is the new cursor offset
    Buffered { offset: u16 },
    /// The record filled the page and the buffer was committed to `page`
    PageCommitted { page: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Skipped,
    Committed { page: u16, status: u8 },
}

/// What a call to [`Datalogger::process`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tick {
    pub sampled: bool,
    pub saved: Option<AppendOutcome>,
}

/// Append-only datalogger over a dual-buffer page flash.
///
/// ## Lifecycle
///
/// `Uninitialized → Initialized → Started`. [`initialize`](Self::initialize)
/// positions the cursor, [`start`](Self::start) arms the minute schedule and
/// [`process`](Self::process) is then called from the main loop at least once
/// a minute. Until the logger is initialized every write path is a silent
/// no-op.
///
/// ## Usage
///
/// ```rust,ignore
/// let mut logger = Datalogger::new(flash, DataloggerConfig::default())?;
/// logger.initialize(InitMode::APPEND | InitMode::RESTART_IF_FULL)?;
/// logger.start(clock.now().minute);
///
/// loop {
///     logger.poll(&mut clock, &mut sensors)?;
/// }
/// ```
pub struct Datalogger<D: BlockDevice> {
    device: D,
    config: DataloggerConfig,
    state: LoggerState,
    cursor: Cursor,
    average: RunningAverage,
    schedule: Schedule,
    integrity_faults: u16,
    failed_samples: u32,
}

impl<D: BlockDevice> Datalogger<D> {
    pub fn new(device: D, config: DataloggerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            device,
            config,
            state: LoggerState::Uninitialized,
            cursor: Cursor::origin(),
            average: RunningAverage::new(),
            schedule: Schedule::starting_at(0, &config),
            integrity_faults: 0,
            failed_samples: 0,
        })
    }

    pub fn state(&self) -> LoggerState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, LoggerState::Initialized | LoggerState::Started)
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn config(&self) -> &DataloggerConfig {
        &self.config
    }

    pub fn average(&self) -> &RunningAverage {
        &self.average
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Integrity problems seen by resume scans since construction
    pub fn integrity_faults(&self) -> u16 {
        self.integrity_faults
    }

    /// Sample reads that failed and were left out of the average
    pub fn failed_samples(&self) -> u32 {
        self.failed_samples
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Give the device back, dropping any records not yet committed.
    pub fn release(self) -> D {
        self.device
    }

    /// Position the append cursor according to `mode`.
    ///
    /// With [`InitMode::APPEND`] the device is scanned for the first free slot.
    /// A full device restarts at page 0 when [`InitMode::RESTART_IF_FULL`] is
    /// set; otherwise the logger ends up [`LoggerState::Failed`] and
    /// [`DataloggerError::DeviceFull`] is returned. Any other mode starts over
    /// at page 0.
    pub fn initialize(&mut self, mode: InitMode) -> Result<InitOutcome, DataloggerError<D::Error>> {
        self.state = LoggerState::Uninitialized;
        self.cursor = Cursor::origin();

        debug!("Record size: {} bytes", RECORD_SIZE);
        debug!("Records per page: {}", PAGE_SIZE / RECORD_SIZE);

        let outcome = if mode.contains(InitMode::APPEND) {
            let report = scanner::locate_resume_point(&mut self.device, self.cursor.buffer.other())
                .map_err(DataloggerError::device)?;
            self.integrity_faults = self.integrity_faults.saturating_add(report.integrity_faults);

            match report.outcome {
                ScanOutcome::Empty => InitOutcome::Empty,
                ScanOutcome::ResumeAt { page, offset } => {
                    self.cursor.page = page;
                    self.cursor.offset = offset;
                    InitOutcome::Resumed { page, offset }
                }
                ScanOutcome::Full if mode.contains(InitMode::RESTART_IF_FULL) => {
                    warn!("Device full, restarting data collection at page 0");
                    InitOutcome::RestartedAfterFull
                }
                ScanOutcome::Full => {
                    error!("Device full, data collection not started");
                    self.state = LoggerState::Failed;
                    return Err(DataloggerError::DeviceFull);
                }
            }
        } else {
            InitOutcome::Overwritten
        };

        self.prepare_active_buffer()?;
        self.state = LoggerState::Initialized;

        info!(
            "Starting data collection in page {:#06X} at offset {:#06X}",
            self.cursor.page, self.cursor.offset
        );
        Ok(outcome)
    }

    /// Arm the minute schedule from the current clock minute.
    ///
    /// Clears the pending average, time fields included. Does nothing unless
    /// the logger is initialized.
    pub fn start(&mut self, minute: u8) -> bool {
        if !self.is_initialized() {
            debug!("start ignored: datalogger not initialized");
            return false;
        }

        self.schedule = Schedule::starting_at(minute, &self.config);
        self.average.reset();
        self.state = LoggerState::Started;

        info!(
            "Time is {} min, next data set at {} min, next save at {} min",
            minute,
            self.schedule.next_sample_minute(),
            self.schedule.next_save_minute()
        );
        true
    }

    /// Run the sample and save schedule for the current time.
    ///
    /// Safe to call many times per minute: each phase fires once on its
    /// minute and then moves on to the next one.
    pub fn process<S: SampleSource>(
        &mut self,
        now: &TimeAndDate,
        source: &mut S,
    ) -> Result<Tick, DataloggerError<D::Error>> {
        let mut tick = Tick::default();
        if self.state != LoggerState::Started {
            return Ok(tick);
        }

        if self.schedule.sample_due(now.minute) {
            match source.read_sample() {
                Ok(sample) => {
                    self.average.fold_in(&sample);
                    tick.sampled = true;
                    debug!(
                        "Sample {} folded: {}",
                        self.average.samples(),
                        DataSet::from_payload(self.average.payload())
                    );
                }
                Err(e) => {
                    self.failed_samples = self.failed_samples.saturating_add(1);
                    warn!("Skipping sample at minute {}: {}", now.minute, e);
                }
            }
            self.schedule.advance_sample();
            debug!("Next time to take data at {} min", self.schedule.next_sample_minute());
        }

        if self.schedule.save_due(now.minute) {
            self.average.stamp(Timestamp {
                month: now.month,
                day: now.day,
                hour: now.hour,
                minute: now.minute,
            });

            let payload = *self.average.payload();
            let outcome = self.append_record(&payload)?;
            info!("Saving at min {}: {}", now.minute, DataSet::from_payload(&payload));

            self.schedule.advance_save();
            debug!("Next time to save data at {} min", self.schedule.next_save_minute());

            self.average.reset();
            tick.saved = Some(outcome);
        }

        Ok(tick)
    }

    /// Read the clock and run [`process`](Self::process).
    pub fn poll<C: Clock, S: SampleSource>(
        &mut self,
        clock: &mut C,
        source: &mut S,
    ) -> Result<Tick, DataloggerError<D::Error>> {
        let now = clock.now();
        self.process(&now, source)
    }

    /// Write one record at the cursor.
    ///
    /// When the next record would no longer fit in the page, the active
    /// buffer is committed, the buffers swap and the cursor moves to the
    /// start of the next page, wrapping to page 0 after the last one.
    pub fn append_record(
        &mut self,
        payload: &Payload,
    ) -> Result<AppendOutcome, DataloggerError<D::Error>> {
        if !self.is_initialized() {
            debug!("append ignored: datalogger not initialized");
            return Ok(AppendOutcome::Skipped);
        }

        let encoded = record::encode(payload);
        self.device
            .buffer_write(self.cursor.buffer, self.cursor.offset, &encoded)
            .map_err(DataloggerError::device)?;

        // The cursor only moves once the record is safely staged, so a failed
        // append can be retried at the same offset.
        let next_offset = self.cursor.offset + RECORD_SIZE as u16;
        debug!(
            "Buffer {:?}, page {}, offset {}",
            self.cursor.buffer, self.cursor.page, next_offset
        );

        if next_offset as usize + MAX_RECORD_SIZE > PAGE_SIZE {
            let page = self.commit_page()?;
            return Ok(AppendOutcome::PageCommitted { page });
        }

        self.cursor.offset = next_offset;
        Ok(AppendOutcome::Buffered {
            offset: next_offset,
        })
    }

    /// Commit the partially filled page and wait for the chip.
    ///
    /// Call before a reset or an expected power loss. The cursor does not
    /// move, so later records keep filling the same page.
    pub fn flush(&mut self) -> Result<FlushOutcome, DataloggerError<D::Error>> {
        if !self.is_initialized() {
            return Ok(FlushOutcome::Skipped);
        }

        let page = self.cursor.page;
        self.device
            .commit_buffer_to_page(self.cursor.buffer, page)
            .map_err(DataloggerError::device)?;
        let status = self.device.wait_ready().map_err(DataloggerError::device)?;

        info!("Flushed buffer {:?} to page {}", self.cursor.buffer, page);
        Ok(FlushOutcome::Committed { page, status })
    }

    /// Committed records in write order.
    pub fn records(&mut self) -> RecordReader<'_, D> {
        let scratch = self.cursor.buffer.other();
        RecordReader::new(&mut self.device, scratch)
    }

    /// Up to `count` committed records from the start of the device.
    pub fn read_back<const N: usize>(
        &mut self,
        count: usize,
    ) -> Result<heapless::Vec<StoredRecord, N>, DataloggerError<D::Error>> {
        let mut out = heapless::Vec::new();

        for record in self.records().take(count.min(N)) {
            let record = record.map_err(DataloggerError::device)?;
            if out.push(record).is_err() {
                break;
            }
        }

        Ok(out)
    }

    /// The `index`-th committed record in `page`.
    pub fn retrieve(
        &mut self,
        page: u16,
        index: u16,
    ) -> Result<Option<StoredRecord>, DataloggerError<D::Error>> {
        let scratch = self.cursor.buffer.other();
        scanner::retrieve(&mut self.device, scratch, page, index).map_err(DataloggerError::device)
    }

    fn commit_page(&mut self) -> Result<u16, DataloggerError<D::Error>> {
        let page = self.cursor.page;
        info!("Writing buffer {:?} to page {}", self.cursor.buffer, page);

        self.device
            .commit_buffer_to_page(self.cursor.buffer, page)
            .map_err(DataloggerError::device)?;

        let next_buffer = self.cursor.buffer.other();
        self.erase_buffer(next_buffer)?;

        self.cursor = Cursor {
            page: self.next_page(page),
            offset: 0,
            buffer: next_buffer,
        };
        Ok(page)
    }

    fn next_page(&self, page: u16) -> u16 {
        if page >= self.device.last_page() { 0 } else { page + 1 }
    }

    // The staging buffer is committed whole, so it must hold the page's
    // existing records (or erased bytes) before new ones are added.
    fn prepare_active_buffer(&mut self) -> Result<(), DataloggerError<D::Error>> {
        if self.cursor.offset == 0 {
            return self.erase_buffer(self.cursor.buffer);
        }

        self.device
            .load_page_to_buffer(self.cursor.buffer, self.cursor.page)
            .map_err(DataloggerError::device)?;
        self.device.wait_ready().map_err(DataloggerError::device)?;
        Ok(())
    }

    fn erase_buffer(&mut self, buffer: StagingBuffer) -> Result<(), DataloggerError<D::Error>> {
        let blank = [ERASED_BYTE; 48];
        let mut offset = 0;

        while offset < PAGE_SIZE {
            let len = (PAGE_SIZE - offset).min(blank.len());
            self.device
                .buffer_write(buffer, offset as u16, &blank[..len])
                .map_err(DataloggerError::device)?;
            offset += len;
        }
        Ok(())
    }
}
