//! Desktop simulator for the brewlog datalogger.
//!
//! Runs the datalogger engine against an in-memory flash chip with a
//! simulated wall clock and synthetic brewing-heater readings, then simulates
//! a power loss and checks that logging resumes after the existing records.
//!
//! # Usage
//!
//! ```text
//! brewlog-simulator [--config brewlog.json] [--hours 24]
//! ```
//!
//! `RUST_LOG=debug` shows every sample and buffer write.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use brewlog_core::clock::{Clock, TimeAndDate};
use brewlog_core::config::DataloggerConfig;
use brewlog_core::error::SampleError;
use brewlog_core::sampling::SampleSource;
use brewlog_core::storage::ram_flash::RamFlash;
use brewlog_core::storage::{DataSet, Datalogger, Payload, READING_COUNT, Timestamp};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Last page of the simulated chip (the real part has 0x1FFF).
const SIM_LAST_PAGE: u16 = 15;

/// How often the main loop calls into the logger per simulated minute.
const POLLS_PER_MINUTE: u32 = 4;

/// Simulated hours before the power loss, unless given on the command line.
const DEFAULT_HOURS: u32 = 24;

/// Simulated hours after the power loss.
const HOURS_AFTER_RESTART: u32 = 3;

/// Records printed by the read-back at the end.
const READ_BACK_COUNT: usize = 10;

// ---------------------------------------------------------------------------
// Simulated clock
// ---------------------------------------------------------------------------

/// Wall clock that only moves when told to.
struct SimClock {
    now: TimeAndDate,
}

impl SimClock {
    fn new(start: TimeAndDate) -> Self {
        Self { now: start }
    }

    /// Advance by one minute, rolling hours, days and (30-day) months.
    fn tick_minute(&mut self) {
        let t = &mut self.now;
        t.minute += 1;
        if t.minute < 60 {
            return;
        }
        t.minute = 0;
        t.hour += 1;
        if t.hour < 24 {
            return;
        }
        t.hour = 0;
        t.dow = t.dow % 7 + 1;
        t.day += 1;
        if t.day <= 30 {
            return;
        }
        t.day = 1;
        t.month = t.month % 12 + 1;
    }
}

impl Clock for SimClock {
    fn now(&mut self) -> TimeAndDate {
        self.now
    }
}

// ---------------------------------------------------------------------------
// Mock data generation
// ---------------------------------------------------------------------------

/// Generates synthetic ADC readings for the heater channels.
///
/// Channel 0 is the wort thermistor, channel 1 the heater plate, channel 2
/// ambient; the rest are slow drifts standing in for the spare inputs.
struct MockSensorGenerator {
    elapsed_minutes: f64,
    /// Every n-th read times out, to exercise the skip path
    failures_every: u32,
    reads: u32,
}

impl MockSensorGenerator {
    fn new() -> Self {
        Self {
            elapsed_minutes: 0.0,
            failures_every: 97,
            reads: 0,
        }
    }

    fn advance(&mut self, minutes: f64) {
        self.elapsed_minutes += minutes;
    }

    fn counts(&self, centre: f64, swing: f64, period_min: f64) -> u16 {
        let t = self.elapsed_minutes;
        (centre + swing * (t / period_min).sin()).clamp(0.0, u16::MAX as f64) as u16
    }
}

impl SampleSource for MockSensorGenerator {
    fn read_sample(&mut self) -> Result<Payload, SampleError> {
        self.reads += 1;
        if self.reads % self.failures_every == 0 {
            return Err(SampleError::Timeout);
        }

        let mut readings = [0u16; READING_COUNT];
        readings[0] = self.counts(32_000.0, 1_500.0, 45.0);
        readings[1] = self.counts(41_000.0, 6_000.0, 12.0);
        readings[2] = self.counts(18_500.0, 400.0, 720.0);
        for (i, reading) in readings.iter_mut().enumerate().skip(3) {
            *reading = self.counts(10_000.0 * i as f64, 250.0, 90.0 + 30.0 * i as f64);
        }

        Ok(DataSet::new(Timestamp::default(), readings).to_payload())
    }
}

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Run the brewlog datalogger against a simulated flash chip
#[derive(Parser, Debug)]
#[command(name = "brewlog-simulator", version, about)]
struct Args {
    /// JSON datalogger configuration (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Simulated hours to log before the power loss
    #[arg(long, default_value_t = DEFAULT_HOURS)]
    hours: u32,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<DataloggerConfig> {
    let Some(path) = path else {
        return Ok(DataloggerConfig::default());
    };

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: DataloggerConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("validating {}", path.display()))?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Simulation loop
// ---------------------------------------------------------------------------

fn run_hours(
    logger: &mut Datalogger<RamFlash>,
    clock: &mut SimClock,
    sensors: &mut MockSensorGenerator,
    hours: u32,
) -> Result<u32> {
    let mut saves = 0;

    for _ in 0..hours * 60 {
        for _ in 0..POLLS_PER_MINUTE {
            let tick = logger
                .poll(clock, sensors)
                .with_context(|| format!("polling at minute {}", clock.now.minute))?;
            if tick.saved.is_some() {
                saves += 1;
            }
        }
        clock.tick_minute();
        sensors.advance(1.0);
    }

    Ok(saves)
}

fn simulate(config: DataloggerConfig, hours: u32) -> Result<()> {
    let mut clock = SimClock::new(TimeAndDate {
        year: 2013,
        month: 2,
        day: 17,
        dow: 1,
        hour: 14,
        minute: 17,
        second: 0,
    });
    let mut sensors = MockSensorGenerator::new();

    let mut logger = Datalogger::new(RamFlash::new(SIM_LAST_PAGE), config)?;
    let outcome = logger.initialize(config.init_mode).context("initializing datalogger")?;
    info!("Initialized: {:?}", outcome);
    logger.start(clock.now().minute);

    let saves = run_hours(&mut logger, &mut clock, &mut sensors, hours)?;
    info!("Saved {} data sets in {} h, cursor {:?}", saves, hours, logger.cursor());

    // --- Power loss -------------------------------------------------------
    logger.flush().context("flushing before power loss")?;
    let mut flash = logger.release();
    flash.power_cycle();
    info!("Power cycled the device");

    let mut logger = Datalogger::new(flash, config)?;
    let outcome = logger
        .initialize(config.init_mode)
        .context("initializing datalogger after restart")?;
    info!("Re-initialized: {:?}", outcome);
    if logger.integrity_faults() > 0 {
        warn!("Resume scan reported {} integrity faults", logger.integrity_faults());
    }
    logger.start(clock.now().minute);

    let saves = run_hours(&mut logger, &mut clock, &mut sensors, HOURS_AFTER_RESTART)?;
    info!("Saved {} more data sets after restart", saves);
    logger.flush().context("flushing after restart")?;

    // --- Read back --------------------------------------------------------
    let total = logger.records().filter(|r| r.is_ok()).count();
    info!("{} records on flash", total);

    let records = logger
        .read_back::<READ_BACK_COUNT>(READ_BACK_COUNT)
        .context("reading back records")?;
    for record in &records {
        info!("p{:04} @{:03}: {}", record.page, record.offset, record.data_set());
    }

    info!("Failed sample reads: {}", logger.failed_samples());
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    info!("Starting brewlog simulator");

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Bad configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Sampling every {} min, saving every {} min, init mode {:#04X}",
        config.sample_interval_minutes,
        config.save_interval_minutes,
        config.init_mode.bits()
    );

    if let Err(e) = simulate(config, args.hours) {
        error!("Simulation failed: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("Simulator exiting");
    ExitCode::SUCCESS
}
