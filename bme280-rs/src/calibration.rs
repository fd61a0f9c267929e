//! Factory calibration block and the coefficients packed into it.
//!
//! The block is kept verbatim and addressed by absolute register address, so
//! the field table below reads like the register map in the datasheet.
//! The humidity coefficients H4 and H5 share a byte and are not aligned to
//! byte boundaries, which is why nothing here relies on struct layout.
#[cfg(feature = "defmt")]
use defmt::{trace, Format};

use crate::registers::{CALIB_A_ADDR, CALIB_A_LEN, CALIB_B_ADDR, CALIB_B_LEN};

/// Reinterpret a 16-bit register pair as two's complement.
#[inline]
pub const fn to_signed16(raw: u16) -> i16 {
    if raw & 0x8000 != 0 {
        (raw as i32 - 0x1_0000) as i16
    } else {
        raw as i16
    }
}

/// Reinterpret a single register as two's complement.
#[inline]
pub const fn to_signed8(raw: u8) -> i8 {
    if raw & 0x80 != 0 {
        (raw as i16 - 0x100) as i8
    } else {
        raw as i8
    }
}

/// Reinterpret the low 12 bits of `raw` as two's complement.
#[inline]
pub const fn to_signed12(raw: u16) -> i16 {
    let raw = raw & 0x0FFF;
    if raw & 0x0800 != 0 {
        raw as i16 - 0x1000
    } else {
        raw as i16
    }
}

/// Raw calibration registers, `0x88..=0xA1` and `0xE1..=0xF0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub struct CalibrationBlock {
    block_a: [u8; CALIB_A_LEN],
    block_b: [u8; CALIB_B_LEN],
}

/// Names of the calibration coefficients.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum Coefficient {
    T1,
    T2,
    T3,
    P1,
    P2,
    P3,
    P4,
    P5,
    P6,
    P7,
    P8,
    P9,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
}

impl CalibrationBlock {
    /// Build the block from the two register ranges read from the device.
    pub fn from_registers(block_a: &[u8; CALIB_A_LEN], block_b: &[u8; CALIB_B_LEN]) -> Self {
        #[cfg(feature = "defmt")]
        {
            trace!("CALIB[0x88]: {=[u8]:#04x}", block_a[..]);
            trace!("CALIB[0xE1]: {=[u8]:#04x}", block_b[..]);
        }
        Self {
            block_a: *block_a,
            block_b: *block_b,
        }
    }

    /// Byte stored at `address`. Addresses outside both ranges read as 0.
    pub fn byte(&self, address: u8) -> u8 {
        let a_end = CALIB_A_ADDR as usize + CALIB_A_LEN;
        let b_end = CALIB_B_ADDR as usize + CALIB_B_LEN;
        match address as usize {
            addr if (CALIB_A_ADDR as usize..a_end).contains(&addr) => {
                self.block_a[addr - CALIB_A_ADDR as usize]
            }
            addr if (CALIB_B_ADDR as usize..b_end).contains(&addr) => {
                self.block_b[addr - CALIB_B_ADDR as usize]
            }
            _ => 0,
        }
    }

    fn le_u16(&self, lsb: u8) -> u16 {
        (self.byte(lsb + 1) as u16) << 8 | self.byte(lsb) as u16
    }

    /// Reconstruct one coefficient, sign recovery included.
    pub fn coefficient(&self, name: Coefficient) -> i32 {
        use Coefficient::*;
        match name {
            T1 => self.le_u16(0x88) as i32,
            T2 => to_signed16(self.le_u16(0x8A)) as i32,
            T3 => to_signed16(self.le_u16(0x8C)) as i32,
            P1 => self.le_u16(0x8E) as i32,
            P2 => to_signed16(self.le_u16(0x90)) as i32,
            P3 => to_signed16(self.le_u16(0x92)) as i32,
            P4 => to_signed16(self.le_u16(0x94)) as i32,
            P5 => to_signed16(self.le_u16(0x96)) as i32,
            P6 => to_signed16(self.le_u16(0x98)) as i32,
            P7 => to_signed16(self.le_u16(0x9A)) as i32,
            P8 => to_signed16(self.le_u16(0x9C)) as i32,
            P9 => to_signed16(self.le_u16(0x9E)) as i32,
            H1 => self.byte(0xA1) as i32,
            H2 => to_signed16(self.le_u16(0xE1)) as i32,
            H3 => self.byte(0xE3) as i32,
            // 0xE4 holds H4[11:4], 0xE5[3:0] holds H4[3:0]
            H4 => {
                let raw = (self.byte(0xE4) as u16) << 4 | (self.byte(0xE5) & 0x0F) as u16;
                to_signed12(raw) as i32
            }
            // 0xE5[7:4] holds H5[3:0], 0xE6 holds H5[11:4]
            H5 => {
                let raw = ((self.byte(0xE5) & 0xF0) >> 4) as u16 | (self.byte(0xE6) as u16) << 4;
                to_signed12(raw) as i32
            }
            H6 => to_signed8(self.byte(0xE7)) as i32,
        }
    }
}

/// Typed calibration coefficients, decoded once from a [`CalibrationBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub struct CalibrationCoefficients {
    pub(crate) dig_t1: u16,
    pub(crate) dig_t2: i16,
    pub(crate) dig_t3: i16,
    pub(crate) dig_p1: u16,
    pub(crate) dig_p2: i16,
    pub(crate) dig_p3: i16,
    pub(crate) dig_p4: i16,
    pub(crate) dig_p5: i16,
    pub(crate) dig_p6: i16,
    pub(crate) dig_p7: i16,
    pub(crate) dig_p8: i16,
    pub(crate) dig_p9: i16,
    pub(crate) dig_h1: u8,
    pub(crate) dig_h2: i16,
    pub(crate) dig_h3: u8,
    pub(crate) dig_h4: i16,
    pub(crate) dig_h5: i16,
    pub(crate) dig_h6: i8,
}

impl CalibrationCoefficients {
    /// Decode every coefficient of `block`.
    pub fn from_block(block: &CalibrationBlock) -> Self {
        use Coefficient::*;
        let c = |name| block.coefficient(name);
        Self {
            dig_t1: c(T1) as u16,
            dig_t2: c(T2) as i16,
            dig_t3: c(T3) as i16,
            dig_p1: c(P1) as u16,
            dig_p2: c(P2) as i16,
            dig_p3: c(P3) as i16,
            dig_p4: c(P4) as i16,
            dig_p5: c(P5) as i16,
            dig_p6: c(P6) as i16,
            dig_p7: c(P7) as i16,
            dig_p8: c(P8) as i16,
            dig_p9: c(P9) as i16,
            dig_h1: c(H1) as u8,
            dig_h2: c(H2) as i16,
            dig_h3: c(H3) as u8,
            dig_h4: c(H4) as i16,
            dig_h5: c(H5) as i16,
            dig_h6: c(H6) as i8,
        }
    }

    /// Value of a single coefficient.
    pub fn get(&self, name: Coefficient) -> i32 {
        use Coefficient::*;
        match name {
            T1 => self.dig_t1 as i32,
            T2 => self.dig_t2 as i32,
            T3 => self.dig_t3 as i32,
            P1 => self.dig_p1 as i32,
            P2 => self.dig_p2 as i32,
            P3 => self.dig_p3 as i32,
            P4 => self.dig_p4 as i32,
            P5 => self.dig_p5 as i32,
            P6 => self.dig_p6 as i32,
            P7 => self.dig_p7 as i32,
            P8 => self.dig_p8 as i32,
            P9 => self.dig_p9 as i32,
            H1 => self.dig_h1 as i32,
            H2 => self.dig_h2 as i32,
            H3 => self.dig_h3 as i32,
            H4 => self.dig_h4 as i32,
            H5 => self.dig_h5 as i32,
            H6 => self.dig_h6 as i32,
        }
    }
}
