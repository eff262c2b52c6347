//! Contactless-card detection and identification for ISO/IEC 14443-3
//! Type A ("PICC") readers built around an MFRC522-style IC.
//!
//! The driver talks to the reader through a [`RegisterBus`] (one atomic
//! register transaction per call) and a [`Clock`] (monotonic milliseconds
//! plus sleep), so the protocol core runs unchanged against Linux spidev,
//! an `embedded-hal` I2C peripheral, or a fake device in tests.
//!
//! ```no_run
//! use picc_reader::spi::SpiBus;
//! use picc_reader::{Mfrc522, SysClock};
//!
//! # fn main() -> std::io::Result<()> {
//! let bus = SpiBus::open("/dev/spidev0.0")?;
//! let mut reader = Mfrc522::new(bus, SysClock::new());
//! if reader.init().is_ok() && reader.detect_presence().is_ok() {
//!     if let Ok(uid) = reader.resolve_uid() {
//!         println!("card {:02x?}", uid.as_bytes());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod i2c;
pub mod mfrc522;
pub mod picc;
pub mod spi;

#[cfg(test)]
pub(crate) mod testutil;

/// Protocol failure statuses. Every fallible operation in this crate
/// returns exactly one of these through [`Result`]; distinct kinds are
/// never collapsed because callers branch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The bus transaction itself failed.
    TransactionFailed,
    /// Completion flags inconsistent after a bounded wait. A device or
    /// bus fault, not a normal absence of card.
    NoRxInterrupt,
    /// The caller buffer cannot hold the device's response. Nothing is
    /// drained, so the call is retryable with a larger buffer.
    BufferTooSmall,
    /// The device never signalled completion within budget. Usually
    /// means no card answered in time.
    TimedOut,
    /// More than one PICC answered the same anticollision slot.
    Collision,
    /// Device-reported framing/parity/CRC fault, or a failed resolver
    /// integrity check (BCC mismatch, wrong response length, cascade
    /// exhaustion).
    Protocol,
}

pub type Result<T> = core::result::Result<T, Error>;

pub use bus::{BusError, Clock, RegisterBus, SysClock};
pub use mfrc522::Mfrc522;
pub use picc::Uid;
