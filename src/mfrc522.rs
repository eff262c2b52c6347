//! MFRC522-style reader IC: register map, device bring-up, the CRC16-A
//! coprocessor and the frame-exchange state machine.

use log::{debug, trace};

use crate::bus::{Clock, RegisterBus};
use crate::{Error, Result};

#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    CommandReg = 0x01,
    ComlEnReg = 0x02,
    DivlEnReg = 0x03,
    ComIrqReg = 0x04,
    DivIrqReg = 0x05,
    ErrorReg = 0x06,
    Status1Reg = 0x07,
    Status2Reg = 0x08,
    FIFODataReg = 0x09,
    FIFOLevelReg = 0x0A,
    WaterLevelReg = 0x0B,
    ControlReg = 0x0C,
    BitFramingReg = 0x0D,
    CollReg = 0x0E,
    ModeReg = 0x11,
    TxModeReg = 0x12,
    RxModeReg = 0x13,
    TxControlReg = 0x14,
    TxASKReg = 0x15,
    TxSelReg = 0x16,
    RxSelReg = 0x17,
    RxThresholdReg = 0x18,
    DemodReg = 0x19,
    MfTxReg = 0x1C,
    MfRxReg = 0x1D,
    SerialSpeedReg = 0x1F,
    CRCResultRegLow = 0x21,
    CRCResultRegHigh = 0x22,
    ModWidthReg = 0x24,
    RFCfgReg = 0x26,
    GsNReg = 0x27,
    CWGsPReg = 0x28,
    ModGsPReg = 0x29,
    TModeReg = 0x2A,
    TPrescalerReg = 0x2B,
    TReloadRegHigh = 0x2C,
    TReloadRegLow = 0x2D,
    TCounterValRegHigh = 0x2E,
    TCounterValRegLow = 0x2F,
    VersionReg = 0x37,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Idle = 0b0000,
    Mem = 0b0001,
    GenerateRandomId = 0b0010,
    CalcCRC = 0b0011,
    Transmit = 0b0100,
    NoCmdChange = 0b0111,
    Receive = 0b1000,
    Transceive = 0b1100,
    MFAuthent = 0b1110,
    SoftReset = 0b1111,
}

/// FIFOLevelReg FlushBuffer bit.
const FIFO_FLUSH: u8 = 0x80;
/// ComIrqReg: write-1-to-clear for all seven request bits.
const IRQ_CLEAR_ALL: u8 = 0x7F;
/// ComIrqReg RxIRq | IdleIRq, the completion bits of a transceive.
const RX_OR_IDLE_IRQ: u8 = 0x30;
/// ComIrqReg TimerIRq: the hardware timeout fired before reception.
const TIMER_IRQ: u8 = 0x01;
/// DivIrqReg CRCIRq: the CRC coprocessor finished.
const CRC_DONE_IRQ: u8 = 0x04;
/// ErrorReg CollErr.
const COLLISION_ERR: u8 = 0x08;

/// Wall-clock budget for one frame exchange.
const EXCHANGE_DEADLINE_MS: u64 = 50;
/// Wall-clock budget for one CRC computation.
const CRC_DEADLINE_MS: u64 = 50;
/// Gap between interrupt-register polls.
const POLL_INTERVAL_MS: u64 = 1;

/// The reader IC.
///
/// The device and its bus are one shared mutable resource with no internal
/// reentrancy. Owning the bus handle and taking `&mut self` for every
/// operation serialises all device access from the type system: no frame
/// exchange, CRC computation or register transaction can overlap another.
pub struct Mfrc522<B, C> {
    pub(crate) bus: B,
    pub(crate) clock: C,
}

impl<B: RegisterBus, C: Clock> Mfrc522<B, C> {
    pub fn new(bus: B, clock: C) -> Self {
        Self { bus, clock }
    }

    pub fn read_register(&mut self, reg: Register) -> Result<u8> {
        self.bus
            .read(reg as u8)
            .map_err(|_| Error::TransactionFailed)
    }

    pub fn write_register(&mut self, reg: Register, value: u8) -> Result<()> {
        self.bus
            .write(reg as u8, value)
            .map_err(|_| Error::TransactionFailed)?;
        Ok(())
    }

    fn write_fifo(&mut self, data: &[u8]) -> Result<()> {
        self.bus
            .write_burst(Register::FIFODataReg as u8, data)
            .map_err(|_| Error::TransactionFailed)
    }

    fn command(&mut self, command: Command) -> Result<()> {
        self.write_register(Register::CommandReg, command as u8)
    }

    pub fn set_register_bitmask(&mut self, reg: Register, mask: u8) -> Result<()> {
        let tmp = self.read_register(reg)?;
        self.write_register(reg, tmp | mask)
    }

    pub fn clear_register_bitmask(&mut self, reg: Register, mask: u8) -> Result<()> {
        let tmp = self.read_register(reg)?;
        self.write_register(reg, tmp & !mask)
    }

    /// Soft-resets the device, then applies the one-time configuration:
    /// 25 ms hardware receive timeout, forced 100 % ASK modulation, CRC
    /// preset 0x6363 (ISO 14443-3 6.2.4) and antenna on.
    pub fn init(&mut self) -> Result<()> {
        self.reset()?;

        self.write_register(Register::TxModeReg, 0x00)?;
        self.write_register(Register::RxModeReg, 0x00)?;
        self.write_register(Register::ModWidthReg, 0x26)?;
        // TAuto=1: the timer starts automatically when transmission ends,
        // so a silent field raises TimerIRq by itself.
        self.write_register(Register::TModeReg, 0x80)?;
        // TPreScaler 0x0A9 = 169 => f_timer = 40 kHz, a 25us tick.
        self.write_register(Register::TPrescalerReg, 0xA9)?;
        // Reload 0x3E8 = 1000 ticks => 25 ms before TimerIRq.
        self.write_register(Register::TReloadRegHigh, 0x03)?;
        self.write_register(Register::TReloadRegLow, 0xE8)?;
        self.write_register(Register::TxASKReg, 0x40)?;
        self.write_register(Register::ModeReg, 0x3D)?;
        self.enable_antenna()?;
        Ok(())
    }

    /// Issues SoftReset and waits for the power-down bit to clear.
    pub fn reset(&mut self) -> Result<()> {
        self.command(Command::SoftReset)?;
        let mut count = 0;
        loop {
            self.clock.sleep_ms(50);
            let cmd_val = self.read_register(Register::CommandReg)?;
            if cmd_val & (1 << 4) == 0 || count >= 3 {
                break;
            }
            count += 1;
        }
        Ok(())
    }

    pub fn enable_antenna(&mut self) -> Result<()> {
        let control_reg = self.read_register(Register::TxControlReg)?;
        if (control_reg & 0x03) != 0x03 {
            self.write_register(Register::TxControlReg, control_reg | 0x03)?;
        }
        Ok(())
    }

    pub fn version(&mut self) -> Result<u8> {
        self.read_register(Register::VersionReg)
    }

    /// Offloads a CRC16-A computation to the device, returning the result
    /// as `[low, high]`, the order in which the bytes go onto the wire.
    ///
    /// Weak guarantee: if the CRC-done flag is not raised within 50 ms the
    /// current content of the result registers is returned as-is rather
    /// than an error. The device does not report failure here, only
    /// lateness.
    pub fn calculate_crc(&mut self, data: &[u8]) -> Result<[u8; 2]> {
        self.command(Command::Idle)?;
        self.write_register(Register::DivIrqReg, CRC_DONE_IRQ)?;
        self.write_register(Register::FIFOLevelReg, FIFO_FLUSH)?;
        self.write_fifo(data)?;
        self.command(Command::CalcCRC)?;

        let deadline = self.clock.now_ms() + CRC_DEADLINE_MS;
        loop {
            let irq = self.read_register(Register::DivIrqReg)?;
            if irq & CRC_DONE_IRQ != 0 {
                break;
            }
            if self.clock.now_ms() >= deadline {
                trace!("CRC not done within {} ms, reading anyway", CRC_DEADLINE_MS);
                break;
            }
            self.clock.sleep_ms(POLL_INTERVAL_MS);
        }

        self.command(Command::Idle)?;
        let low = self.read_register(Register::CRCResultRegLow)?;
        let high = self.read_register(Register::CRCResultRegHigh)?;
        Ok([low, high])
    }

    /// Runs one request/response frame exchange: sends `send` with the
    /// given BitFramingReg value, waits for completion and drains the
    /// response into `recv`. Returns the number of bytes drained.
    ///
    /// `bit_framing` both configures bit-level send parameters (e.g. the
    /// 7-bit short frame for REQA) and, through its StartSend bit, begins
    /// the transmission, which is why it is written after the Transceive
    /// command is already committed.
    ///
    /// On [`Error::BufferTooSmall`] nothing is drained and `recv` is left
    /// untouched; the stale bytes sit in the device FIFO until the next
    /// exchange flushes it.
    pub fn transceive(&mut self, send: &[u8], recv: &mut [u8], bit_framing: u8) -> Result<usize> {
        // Clear any stale partial-frame state from a previous call. The
        // device's leftover FIFO/interrupt contents are never trusted.
        self.command(Command::Idle)?;
        self.write_register(Register::BitFramingReg, 0x00)?;
        self.write_register(Register::FIFOLevelReg, FIFO_FLUSH)?;
        self.write_register(Register::ComIrqReg, IRQ_CLEAR_ALL)?;

        self.write_fifo(send)?;
        self.command(Command::Transceive)?;
        self.write_register(Register::BitFramingReg, bit_framing)?;

        let deadline = self.clock.now_ms() + EXCHANGE_DEADLINE_MS;
        let mut irq;
        loop {
            irq = self.read_register(Register::ComIrqReg)?;
            if irq & RX_OR_IDLE_IRQ != 0 {
                break;
            }
            if irq & TIMER_IRQ != 0 {
                trace!("transceive: hardware timer fired, nothing received");
                return Err(Error::TimedOut);
            }
            if self.clock.now_ms() >= deadline {
                trace!("transceive: {} ms elapsed without completion", EXCHANGE_DEADLINE_MS);
                return Err(Error::TimedOut);
            }
            self.clock.sleep_ms(POLL_INTERVAL_MS);
        }

        // Close the race where the completion bits landed only after the
        // budget was already spent.
        if self.clock.now_ms() >= deadline {
            return Err(Error::TimedOut);
        }
        if irq & RX_OR_IDLE_IRQ == 0 {
            return Err(Error::NoRxInterrupt);
        }

        let errors = self.read_register(Register::ErrorReg)?;
        if errors & COLLISION_ERR != 0 {
            return Err(Error::Collision);
        }
        if errors != 0 {
            debug!("transceive: ErrorReg 0x{:02x}", errors);
            return Err(Error::Protocol);
        }

        let count = self.read_register(Register::FIFOLevelReg)? as usize;
        if count > recv.len() {
            return Err(Error::BufferTooSmall);
        }
        for slot in recv[..count].iter_mut() {
            *slot = self.read_register(Register::FIFODataReg)?;
        }
        self.command(Command::Idle)?;
        Ok(count)
    }

    /// Logs the state of every documented register at trace level.
    pub fn dump_registers(&mut self) -> Result<()> {
        for &reg in [
            Register::CommandReg,
            Register::ComlEnReg,
            Register::DivlEnReg,
            Register::ComIrqReg,
            Register::DivIrqReg,
            Register::ErrorReg,
            Register::Status1Reg,
            Register::Status2Reg,
            Register::FIFOLevelReg,
            Register::WaterLevelReg,
            Register::ControlReg,
            Register::BitFramingReg,
            Register::CollReg,
            Register::ModeReg,
            Register::TxModeReg,
            Register::RxModeReg,
            Register::TxControlReg,
            Register::TxASKReg,
            Register::TxSelReg,
            Register::RxSelReg,
            Register::RxThresholdReg,
            Register::DemodReg,
            Register::MfTxReg,
            Register::MfRxReg,
            Register::SerialSpeedReg,
            Register::CRCResultRegLow,
            Register::CRCResultRegHigh,
            Register::ModWidthReg,
            Register::RFCfgReg,
            Register::GsNReg,
            Register::CWGsPReg,
            Register::ModGsPReg,
            Register::TModeReg,
            Register::TPrescalerReg,
            Register::TReloadRegHigh,
            Register::TReloadRegLow,
            Register::TCounterValRegHigh,
            Register::TCounterValRegLow,
            Register::VersionReg,
        ]
        .iter()
        {
            let value = self.read_register(reg)?;
            trace!("{:?}: 0x{:02x}", reg, value);
        }
        Ok(())
    }
}
