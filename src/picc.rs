//! PICC-side protocol: ISO/IEC 14443-3A command bytes, SAK decoding and
//! the anticollision/select cascade that resolves a card UID.

use log::{debug, trace};

use crate::bus::{Clock, RegisterBus};
use crate::mfrc522::Mfrc522;
use crate::{Error, Result};

/// REQuest command, Type A. Invites PICCs in state IDLE to go to READY
/// and prepare for anticollision or selection. 7 bit frame.
pub const REQA: u8 = 0x26;
/// Wake-UP command, Type A. Also invites PICCs in state HALT. 7 bit frame.
pub const WUPA: u8 = 0x52;
/// Cascade Tag. Not a command: marks a UID that continues at the next
/// cascade level.
pub const CT: u8 = 0x88;

/// NVB "no UID bits known yet": 2 whole bytes (SEL + NVB), 0 extra bits.
const NVB_NO_BITS: u8 = 0x20;
/// NVB "all 40 bits of this level known": 7 whole bytes.
const NVB_ALL_BITS: u8 = 0x70;
/// SAK bit flagging that the UID is not complete at this level.
const SAK_CASCADE: u8 = 0x04;

/// BitFramingReg for short frames: StartSend + 7 valid bits in the last
/// (and only) byte. REQA/WUPA use this.
const SHORT_FRAME: u8 = 0x87;
/// BitFramingReg for standard frames: StartSend, all bits valid.
const STANDARD_FRAME: u8 = 0x80;

/// One round of the anticollision/select cascade. The level picks the SEL
/// command byte and the offset where this level's UID bytes land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeLevel {
    One,
    Two,
    Three,
}

impl CascadeLevel {
    pub fn sel_byte(self) -> u8 {
        match self {
            CascadeLevel::One => 0x93,
            CascadeLevel::Two => 0x95,
            CascadeLevel::Three => 0x97,
        }
    }

    pub fn uid_offset(self) -> usize {
        match self {
            CascadeLevel::One => 0,
            CascadeLevel::Two => 3,
            CascadeLevel::Three => 6,
        }
    }

    fn next(self) -> Option<CascadeLevel> {
        match self {
            CascadeLevel::One => Some(CascadeLevel::Two),
            CascadeLevel::Two => Some(CascadeLevel::Three),
            CascadeLevel::Three => None,
        }
    }
}

/// A fully resolved card identifier: 4, 7 or 10 bytes, plus the SAK byte
/// returned by the final SELECT. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uid {
    bytes: [u8; 10],
    len: usize,
    sak: u8,
}

impl Uid {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The SAK byte of the final cascade level.
    pub fn sak(&self) -> u8 {
        self.sak
    }

    pub fn card_type(&self) -> Type {
        get_type(self.sak)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Unknown,
    Iso14443_4,
    Iso18092,
    MifareMini,
    Mifare1k,
    Mifare4k,
    MifareUL,
    MifarePlus,
    MifareDesfire,
    TNP3XXX,
    NotComplete,
}

/// Decodes a SAK byte per NXP AN10833 3.2. Bit 8 is ignored (ISO 14443
/// numbers bits from 1); this also fixes the type reported for Infineon
/// cards.
pub fn get_type(sak: u8) -> Type {
    match sak & 0x7F {
        0x04 => Type::NotComplete,
        0x09 => Type::MifareMini,
        0x08 => Type::Mifare1k,
        0x18 => Type::Mifare4k,
        0x00 => Type::MifareUL,
        0x10 | 0x11 => Type::MifarePlus,
        0x01 => Type::TNP3XXX,
        0x20 => Type::Iso14443_4,
        0x40 => Type::Iso18092,
        _ => Type::Unknown,
    }
}

/// Block Check Character: XOR over the four UID bytes of one cascade
/// level. Detects transmission corruption only, nothing more.
pub fn bcc(candidate: &[u8; 4]) -> u8 {
    candidate[0] ^ candidate[1] ^ candidate[2] ^ candidate[3]
}

impl<B: RegisterBus, C: Clock> Mfrc522<B, C> {
    /// Sends REQA as a short frame and returns the 2-byte ATQA. No
    /// retries; any deviation is surfaced as-is.
    pub fn detect_presence(&mut self) -> Result<[u8; 2]> {
        self.request_type_a(REQA)
    }

    /// REQA variant that also wakes HALTed cards (WUPA).
    pub fn detect_presence_wakeup(&mut self) -> Result<[u8; 2]> {
        self.request_type_a(WUPA)
    }

    fn request_type_a(&mut self, command: u8) -> Result<[u8; 2]> {
        let mut atqa = [0u8; 2];
        let n = self.transceive(&[command], &mut atqa, SHORT_FRAME)?;
        if n != 2 {
            debug!("ATQA was {} bytes, expected 2", n);
            return Err(Error::Protocol);
        }
        trace!("ATQA {:02x?}", atqa);
        Ok(atqa)
    }

    /// Runs the anticollision/select cascade and returns the card's UID.
    ///
    /// Levels 1..3 each contribute 4 candidate bytes; a SAK with the
    /// cascade bit set means the first candidate byte is the cascade tag
    /// (dropped) and the next level continues the UID. A detected
    /// collision ends the attempt: bit-level collision recovery is not
    /// implemented.
    pub fn resolve_uid(&mut self) -> Result<Uid> {
        let mut uid = [0u8; 10];
        let mut level = CascadeLevel::One;
        loop {
            let candidate = self.anticollision(level)?;
            let sak = self.select(level, &candidate)?;
            let offset = level.uid_offset();

            if sak & SAK_CASCADE == 0 {
                // This level is final: all four candidate bytes are UID.
                uid[offset..offset + 4].copy_from_slice(&candidate);
                let len = offset + 4;
                debug!("UID complete: {:02x?}, SAK 0x{:02x}", &uid[..len], sak);
                return Ok(Uid {
                    bytes: uid,
                    len,
                    sak,
                });
            }

            // Not final: the first candidate byte must be the cascade tag,
            // a structural marker rather than UID data.
            if candidate[0] != CT {
                debug!("cascade continues but candidate lacks the cascade tag");
                return Err(Error::Protocol);
            }
            uid[offset..offset + 3].copy_from_slice(&candidate[1..4]);
            level = match level.next() {
                Some(next) => next,
                None => {
                    debug!("SAK still cascaded after level 3");
                    return Err(Error::Protocol);
                }
            };
        }
    }

    /// One anticollision round: `[SEL, NVB=0x20]`, expecting 4 candidate
    /// UID bytes plus their BCC.
    fn anticollision(&mut self, level: CascadeLevel) -> Result<[u8; 4]> {
        let frame = [level.sel_byte(), NVB_NO_BITS];
        let mut response = [0u8; 5];
        let n = match self.transceive(&frame, &mut response, STANDARD_FRAME) {
            Ok(n) => n,
            // Colliding cards end the attempt; resending only the
            // non-colliding prefix is out of scope.
            Err(Error::Collision) => {
                debug!("collision at {:?}", level);
                return Err(Error::Protocol);
            }
            Err(e) => return Err(e),
        };
        if n != 5 {
            debug!("anticollision response was {} bytes, expected 5", n);
            return Err(Error::Protocol);
        }

        let candidate = [response[0], response[1], response[2], response[3]];
        if bcc(&candidate) != response[4] {
            debug!(
                "BCC mismatch: card sent 0x{:02x}, computed 0x{:02x}",
                response[4],
                bcc(&candidate)
            );
            return Err(Error::Protocol);
        }
        Ok(candidate)
    }

    /// One SELECT round: `[SEL, NVB=0x70, candidate, BCC, CRC_A]`,
    /// expecting the SAK byte plus its CRC (not separately verified).
    fn select(&mut self, level: CascadeLevel, candidate: &[u8; 4]) -> Result<u8> {
        let mut frame = [0u8; 9];
        frame[0] = level.sel_byte();
        frame[1] = NVB_ALL_BITS;
        frame[2..6].copy_from_slice(candidate);
        frame[6] = bcc(candidate);
        let crc = self.calculate_crc(&frame[..7])?;
        frame[7] = crc[0];
        frame[8] = crc[1];

        let mut response = [0u8; 3];
        let n = self.transceive(&frame, &mut response, STANDARD_FRAME)?;
        if n != 3 {
            debug!("SELECT response was {} bytes, expected 3", n);
            return Err(Error::Protocol);
        }
        Ok(response[0])
    }
}
