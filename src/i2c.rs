//! [`RegisterBus`] over an `embedded-hal` blocking I2C peripheral, for
//! reader boards wired to the I2C interface instead of SPI.

use embedded_hal::blocking::i2c;

use crate::bus::{BusError, RegisterBus};

pub struct I2cBus<I2C> {
    i2c: I2C,
    addr: u8,
}

impl<I2C> I2cBus<I2C> {
    pub fn new(i2c: I2C, addr: u8) -> Self {
        Self { i2c, addr }
    }
}

impl<I2C> RegisterBus for I2cBus<I2C>
where
    I2C: i2c::Read + i2c::Write,
{
    fn read(&mut self, reg: u8) -> Result<u8, BusError> {
        self.i2c.write(self.addr, &[reg]).map_err(|_| BusError)?;
        let mut value = [0u8; 1];
        self.i2c.read(self.addr, &mut value).map_err(|_| BusError)?;
        Ok(value[0])
    }

    fn write(&mut self, reg: u8, value: u8) -> Result<u8, BusError> {
        self.i2c
            .write(self.addr, &[reg, value])
            .map_err(|_| BusError)?;
        // I2C clocks nothing back during a write.
        Ok(value)
    }

    fn write_burst(&mut self, reg: u8, values: &[u8]) -> Result<(), BusError> {
        let tx_buf = [&[reg], values].concat();
        self.i2c.write(self.addr, &tx_buf).map_err(|_| BusError)?;
        Ok(())
    }
}
