//! Bus and timing capabilities consumed by the driver core.

use std::thread;
use std::time::{Duration, Instant};

/// The physical transfer failed. Implementations keep their own detail
/// (errno, NACK, ...); the protocol core only needs to know the
/// transaction did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusError;

/// One atomic register transaction against the reader IC.
///
/// Every call owns the bus for exactly its duration: speed/mode fixed and
/// the select line asserted from start to end of the transfer. The core
/// never issues overlapping calls, it holds the bus handle exclusively.
pub trait RegisterBus {
    /// Reads one register.
    fn read(&mut self, reg: u8) -> Result<u8, BusError>;
    /// Writes one register, returning the byte clocked back during the
    /// data phase (meaningless on buses that clock nothing back).
    fn write(&mut self, reg: u8, value: u8) -> Result<u8, BusError>;
    /// Writes a run of bytes into one register address, used to fill the
    /// device FIFO in a single transaction.
    fn write_burst(&mut self, reg: u8, values: &[u8]) -> Result<(), BusError>;
}

/// Monotonic millisecond clock plus a sleep primitive.
///
/// All protocol deadlines are wall-clock against [`Clock::now_ms`], never
/// iteration-counted, so timeout behaviour does not depend on how fast the
/// bus happens to be polled.
pub trait Clock {
    fn now_ms(&mut self) -> u64;
    fn sleep_ms(&mut self, ms: u64);
}

/// [`Clock`] over `std::time::Instant` / `std::thread::sleep`.
pub struct SysClock {
    epoch: Instant,
}

impl SysClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SysClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SysClock {
    fn now_ms(&mut self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn sleep_ms(&mut self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}
