//! [`RegisterBus`] over a Linux spidev device.

use std::io;
use std::io::Write;
use std::path::Path;

use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};

use crate::bus::{BusError, RegisterBus};

/// MFRC522 SPI address byte: register address in bits 6..1, MSB set for
/// reads, LSB always 0.
fn read_address(reg: u8) -> u8 {
    ((reg << 1) | 0b1000_0000) & 0b1111_1110
}

fn write_address(reg: u8) -> u8 {
    (reg << 1) & 0b0111_1110
}

/// SPI register bus. The kernel driver asserts the chip select for the
/// duration of each transfer, which gives the per-transaction atomicity
/// the [`RegisterBus`] contract asks for.
pub struct SpiBus {
    spi: Spidev,
}

impl SpiBus {
    /// Opens a spidev node (e.g. `/dev/spidev0.0`) configured for the
    /// reader IC: mode 0, 8 bits per word.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut spi = Spidev::open(path)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(1_000_000)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.configure(&options)?;
        Ok(Self { spi })
    }
}

impl RegisterBus for SpiBus {
    fn read(&mut self, reg: u8) -> Result<u8, BusError> {
        let tx_buf = [read_address(reg), 0];
        let mut rx_buf = [0u8; 2];
        let mut transfer = SpidevTransfer::read_write(&tx_buf, &mut rx_buf);
        self.spi.transfer(&mut transfer).map_err(|_| BusError)?;
        Ok(rx_buf[1])
    }

    fn write(&mut self, reg: u8, value: u8) -> Result<u8, BusError> {
        let tx_buf = [write_address(reg), value];
        let mut rx_buf = [0u8; 2];
        let mut transfer = SpidevTransfer::read_write(&tx_buf, &mut rx_buf);
        self.spi.transfer(&mut transfer).map_err(|_| BusError)?;
        Ok(rx_buf[1])
    }

    fn write_burst(&mut self, reg: u8, values: &[u8]) -> Result<(), BusError> {
        let tx_buf = [&[write_address(reg)], values].concat();
        self.spi.write_all(&tx_buf).map_err(|_| BusError)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_encoding() {
        assert_eq!(read_address(0x01), 0b1000_0010);
        assert_eq!(read_address(0x03), 0b1000_0110);
        assert_eq!(read_address(0x3B), 0b1111_0110);
        assert_eq!(write_address(0x01), 0b0000_0010);
        assert_eq!(write_address(0x2D), 0b0101_1010);
    }
}
