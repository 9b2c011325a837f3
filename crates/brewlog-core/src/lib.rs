//! Hardware-independent core library for the brewing heater datalogger
//!
//! This crate contains the platform-agnostic logic that turns periodic sensor
//! samples into averaged records on page-erase serial flash: the on-media
//! record format, the resume scanner, the append engine and its minute
//! schedule, and the running-average preprocessing stage.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both the
//! microcontroller target and desktop hosts (for the simulator and tests). The `std` feature adds `std::error::Error`
//! impls to the error types for hosted callers.

#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod clock;
pub mod config;
pub mod error;
pub mod sampling;
pub mod storage;
