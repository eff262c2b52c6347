//! Test doubles: a fake reader IC behind the [`RegisterBus`] trait and a
//! fake [`Clock`], so the transceive state machine and the resolver run
//! against scripted card behaviour with deterministic time.

use std::collections::VecDeque;

use crc::{Crc, CRC_16_ISO_IEC_14443_3_A};

use crate::bus::{BusError, Clock, RegisterBus};

const COMMAND_REG: usize = 0x01;
const COM_IRQ_REG: usize = 0x04;
const DIV_IRQ_REG: usize = 0x05;
const ERROR_REG: usize = 0x06;
const FIFO_DATA_REG: usize = 0x09;
const FIFO_LEVEL_REG: usize = 0x0A;
const BIT_FRAMING_REG: usize = 0x0D;
const CRC_RESULT_LOW_REG: usize = 0x21;
const CRC_RESULT_HIGH_REG: usize = 0x22;

const CMD_CALC_CRC: u8 = 0x03;
const CMD_TRANSCEIVE: u8 = 0x0C;
const START_SEND: u8 = 0x80;

/// What the field does when the next frame goes out.
pub enum Exchange {
    /// A card answers with `data`; `error_bits` land in ErrorReg.
    Reply { data: Vec<u8>, error_bits: u8 },
    /// Nothing answers and the hardware timer never fires either.
    Silent,
    /// Nothing answers and the hardware timer raises TimerIRq.
    TimerExpired,
}

impl Exchange {
    pub fn reply(data: &[u8]) -> Self {
        Exchange::Reply {
            data: data.to_vec(),
            error_bits: 0,
        }
    }

    pub fn with_errors(data: &[u8], error_bits: u8) -> Self {
        Exchange::Reply {
            data: data.to_vec(),
            error_bits,
        }
    }
}

/// Simulates the device's FIFO/IRQ register behaviour. A transmission is
/// triggered the way the real part triggers it: the Transceive command is
/// active and the StartSend bit lands in BitFramingReg.
pub struct FakeBus {
    pub regs: [u8; 64],
    fifo: VecDeque<u8>,
    exchanges: VecDeque<Exchange>,
    /// Every frame that went out, in order.
    pub sent_frames: Vec<Vec<u8>>,
    /// The BitFramingReg value each frame was sent with.
    pub framings: Vec<u8>,
    /// When false the CRC coprocessor never completes.
    pub crc_enabled: bool,
}

impl FakeBus {
    pub fn new() -> Self {
        Self {
            regs: [0; 64],
            fifo: VecDeque::new(),
            exchanges: VecDeque::new(),
            sent_frames: Vec::new(),
            framings: Vec::new(),
            crc_enabled: true,
        }
    }

    pub fn queue(&mut self, exchange: Exchange) {
        self.exchanges.push_back(exchange);
    }

    pub fn fifo_len(&self) -> usize {
        self.fifo.len()
    }

    fn fire_exchange(&mut self) {
        let sent: Vec<u8> = self.fifo.drain(..).collect();
        self.sent_frames.push(sent);
        self.framings.push(self.regs[BIT_FRAMING_REG]);

        // An empty script behaves like an empty field.
        match self.exchanges.pop_front().unwrap_or(Exchange::Silent) {
            Exchange::Reply { data, error_bits } => {
                self.fifo.extend(data);
                self.regs[ERROR_REG] = error_bits;
                self.regs[COM_IRQ_REG] |= 0x30;
            }
            Exchange::Silent => {}
            Exchange::TimerExpired => {
                self.regs[COM_IRQ_REG] |= 0x01;
            }
        }
    }

    fn fire_crc(&mut self) {
        if !self.crc_enabled {
            return;
        }
        let data: Vec<u8> = self.fifo.drain(..).collect();
        let crc = Crc::<u16>::new(&CRC_16_ISO_IEC_14443_3_A).checksum(&data);
        self.regs[CRC_RESULT_LOW_REG] = (crc & 0xFF) as u8;
        self.regs[CRC_RESULT_HIGH_REG] = (crc >> 8) as u8;
        self.regs[DIV_IRQ_REG] |= 0x04;
    }
}

impl RegisterBus for FakeBus {
    fn read(&mut self, reg: u8) -> Result<u8, BusError> {
        match reg as usize {
            FIFO_DATA_REG => Ok(self.fifo.pop_front().unwrap_or(0)),
            FIFO_LEVEL_REG => Ok(self.fifo.len() as u8),
            r => Ok(self.regs[r]),
        }
    }

    fn write(&mut self, reg: u8, value: u8) -> Result<u8, BusError> {
        match reg as usize {
            COMMAND_REG => {
                self.regs[COMMAND_REG] = value;
                if value == CMD_CALC_CRC {
                    self.fire_crc();
                }
            }
            // Interrupt requests are write-1-to-clear.
            COM_IRQ_REG => self.regs[COM_IRQ_REG] &= !(value & 0x7F),
            DIV_IRQ_REG => self.regs[DIV_IRQ_REG] &= !(value & 0x7F),
            FIFO_LEVEL_REG => {
                if value & 0x80 != 0 {
                    self.fifo.clear();
                }
            }
            FIFO_DATA_REG => self.fifo.push_back(value),
            BIT_FRAMING_REG => {
                self.regs[BIT_FRAMING_REG] = value;
                if value & START_SEND != 0 && self.regs[COMMAND_REG] == CMD_TRANSCEIVE {
                    self.fire_exchange();
                }
            }
            r => self.regs[r] = value,
        }
        Ok(value)
    }

    fn write_burst(&mut self, reg: u8, values: &[u8]) -> Result<(), BusError> {
        if reg as usize == FIFO_DATA_REG {
            self.fifo.extend(values.iter().copied());
        }
        Ok(())
    }
}

/// Deterministic clock: `sleep_ms` advances time, and `step` lets a test
/// burn time on every `now_ms` call to force deadline races.
pub struct FakeClock {
    pub now: u64,
    step: u64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { now: 0, step: 0 }
    }

    pub fn stepping(step: u64) -> Self {
        Self { now: 0, step }
    }
}

impl Clock for FakeClock {
    fn now_ms(&mut self) -> u64 {
        let t = self.now;
        self.now += self.step;
        t
    }

    fn sleep_ms(&mut self, ms: u64) {
        self.now += ms;
    }
}
