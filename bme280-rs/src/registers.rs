use bitfield_struct::bitfield;
#[cfg(feature = "defmt")]
use defmt::{debug, Format};

pub(crate) const BME280_CHIP_ID: u8 = 0x60;

pub(crate) trait Register {
    const ADDRESS: u8;
    fn from_u8(value: u8) -> Self
    where
        Self: Sized;
    fn to_u8(&self) -> u8;
}

macro_rules! impl_register {
    ($reg:ident, $addr:expr) => {
        impl Register for $reg {
            const ADDRESS: u8 = $addr;
            #[inline(always)]
            fn from_u8(value: u8) -> Self {
                Self::from_bits(value)
            }
            #[inline(always)]
            fn to_u8(&self) -> u8 {
                self.into_bits()
            }
        }
    };
    ($addr:expr, $reg:ident) => {
        impl Register for $reg {
            const ADDRESS: u8 = $addr;
            #[inline(always)]
            fn from_u8(value: u8) -> Self {
                Self(value)
            }
            #[inline(always)]
            fn to_u8(&self) -> u8 {
                self.0
            }
        }
    };
}

/// Chip ID register, address 0xD0
pub(crate) struct ChipId(pub(crate) u8);
impl_register!(0xD0, ChipId);

impl ChipId {
    pub(crate) fn validate(&self) -> bool {
        #[cfg(feature = "defmt")]
        {
            debug!("Chip ID read: {:#x}", self.0);
        }
        self.0 == BME280_CHIP_ID
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Reset register, address 0xE0
pub(crate) enum Command {
    /// Power-on-reset procedure. Any other value is ignored by the device.
    SoftReset = 0xB6,
}

impl Register for Command {
    const ADDRESS: u8 = 0xE0;
    #[inline(always)]
    fn from_u8(_value: u8) -> Self {
        Self::SoftReset
    }
    #[inline(always)]
    fn to_u8(&self) -> u8 {
        *self as u8
    }
}

#[bitfield(u8)]
#[cfg_attr(feature = "defmt", derive(Format))]
/// Humidity control register, address 0xF2
///
/// Changes only take effect after a write to [`CtrlMeas`].
pub(crate) struct CtrlHum {
    #[bits(3, from = Oversampling::from_u8, default = Oversampling::Skip)]
    /// Humidity oversampling
    pub osrs_h: Oversampling,
    #[bits(5)]
    __: u8,
}

impl_register!(CtrlHum, 0xF2);

#[bitfield(u8)]
#[cfg_attr(feature = "defmt", derive(Format))]
/// Status register, address 0xF3
pub(crate) struct StatusReg {
    #[bits(1, access = RO)]
    /// NVM data is being copied to the image registers.
    pub im_update: bool,
    #[bits(2)]
    __: u8,
    #[bits(1, access = RO)]
    /// A conversion is running.
    pub measuring: bool,
    #[bits(4)]
    __: u8,
}

impl_register!(StatusReg, 0xF3);

#[bitfield(u8)]
#[cfg_attr(feature = "defmt", derive(Format))]
/// Measurement control register, address 0xF4
pub(crate) struct CtrlMeas {
    #[bits(2, from = SensorMode::from_u8, default = SensorMode::Sleep)]
    /// Sensor mode
    pub mode: SensorMode,
    #[bits(3, from = Oversampling::from_u8, default = Oversampling::Skip)]
    /// Pressure oversampling
    pub osrs_p: Oversampling,
    #[bits(3, from = Oversampling::from_u8, default = Oversampling::Skip)]
    /// Temperature oversampling
    pub osrs_t: Oversampling,
}

impl_register!(CtrlMeas, 0xF4);

#[bitfield(u8)]
#[cfg_attr(feature = "defmt", derive(Format))]
/// Configuration register, address 0xF5
///
/// Writes in normal mode may be ignored, so this is written while sleeping.
pub(crate) struct ConfigReg {
    #[bits(1, default = false)]
    /// 3-wire SPI. Always disabled.
    pub spi3w_en: bool,
    #[bits(1)]
    __: u8,
    #[bits(3, from = IIRFilter::from_u8, default = IIRFilter::Off)]
    /// IIR filter coefficient
    pub filter: IIRFilter,
    #[bits(3, from = StandbyTime::from_u8, default = StandbyTime::Ms0_5)]
    /// Inactive duration between conversions in normal mode
    pub t_sb: StandbyTime,
}

impl_register!(ConfigReg, 0xF5);

/// First calibration block, `calib00..calib25`, 0x88 to 0xA1.
pub(crate) const CALIB_A_ADDR: u8 = 0x88;
pub(crate) const CALIB_A_LEN: usize = 26;
/// Second calibration block, `calib26..calib41`, 0xE1 to 0xF0.
pub(crate) const CALIB_B_ADDR: u8 = 0xE1;
pub(crate) const CALIB_B_LEN: usize = 16;

/// 8 bytes of measurement data starting at `press_msb`:
/// pressure (3), temperature (3), humidity (2), all MSB first.
pub(crate) const DATA_ADDR: u8 = 0xF7;
pub(crate) const DATA_LEN: usize = 8;

/// Sensor mode
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Default)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum SensorMode {
    /// No conversions, lowest power
    Sleep = 0x0,
    /// A single conversion, then back to sleep
    Forced = 0x1,
    /// Second encoding of forced mode
    ForcedAlt = 0x2,
    /// Continuous conversions separated by the standby time
    #[default]
    Normal = 0x3,
}

impl SensorMode {
    pub(crate) const fn into_bits(self) -> u8 {
        self as u8
    }
    /// Decode a mode selector. Only the two low bits are used.
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x3 {
            0x0 => Self::Sleep,
            0x1 => Self::Forced,
            0x2 => Self::ForcedAlt,
            _ => Self::Normal,
        }
    }

    /// Both `0b01` and `0b10` trigger a single conversion.
    pub const fn is_forced(self) -> bool {
        matches!(self, Self::Forced | Self::ForcedAlt)
    }
}

/// Oversampling settings
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Default)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum Oversampling {
    /// Skipped (output set to 0x80000 for pressure and temperature, 0x8000 for humidity)
    Skip = 0x0,
    /// 1x oversampling
    #[default]
    X1 = 0x1,
    /// 2x oversampling
    X2 = 0x2,
    /// 4x oversampling
    X4 = 0x3,
    /// 8x oversampling
    X8 = 0x4,
    /// 16x oversampling
    X16 = 0x5,
    /// Reserved encoding, the device converts it like `X16`
    Reserved6 = 0x6,
    /// Reserved encoding, the device converts it like `X16`
    Reserved7 = 0x7,
}

impl Oversampling {
    pub(crate) const fn into_bits(self) -> u8 {
        self as u8
    }
    /// Decode a 3-bit oversampling selector. The bits are kept as given.
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x7 {
            0x0 => Self::Skip,
            0x1 => Self::X1,
            0x2 => Self::X2,
            0x3 => Self::X4,
            0x4 => Self::X8,
            0x5 => Self::X16,
            0x6 => Self::Reserved6,
            _ => Self::Reserved7,
        }
    }

    /// `2^(n-1)` for selector `n`, 0 when skipped. The reserved encodings
    /// give 32 and 64, which only lengthens the conversion wait.
    pub const fn factor(self) -> u32 {
        match self {
            Self::Skip => 0,
            _ => 1 << (self as u32 - 1),
        }
    }
}

/// Standby time between conversions in normal mode
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum StandbyTime {
    /// 0.5 ms
    Ms0_5 = 0x0,
    /// 62.5 ms
    Ms62_5 = 0x1,
    /// 125 ms
    Ms125 = 0x2,
    /// 250 ms
    Ms250 = 0x3,
    /// 500 ms
    Ms500 = 0x4,
    /// 1000 ms
    #[default]
    Ms1000 = 0x5,
    /// 10 ms
    Ms10 = 0x6,
    /// 20 ms
    Ms20 = 0x7,
}

impl StandbyTime {
    pub(crate) const fn into_bits(self) -> u8 {
        self as u8
    }
    /// Decode a 3-bit standby selector.
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x7 {
            0x0 => Self::Ms0_5,
            0x1 => Self::Ms62_5,
            0x2 => Self::Ms125,
            0x3 => Self::Ms250,
            0x4 => Self::Ms500,
            0x5 => Self::Ms1000,
            0x6 => Self::Ms10,
            _ => Self::Ms20,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Default)]
#[cfg_attr(feature = "defmt", derive(Format))]
/// IIR filter coefficients
pub enum IIRFilter {
    /// Filter disabled
    #[default]
    Off = 0x0,
    #[allow(missing_docs)]
    Coeff2 = 0x1,
    #[allow(missing_docs)]
    Coeff4 = 0x2,
    #[allow(missing_docs)]
    Coeff8 = 0x3,
    #[allow(missing_docs)]
    Coeff16 = 0x4,
    /// Reserved encoding, filters like `Coeff16`
    Reserved5 = 0x5,
    /// Reserved encoding, filters like `Coeff16`
    Reserved6 = 0x6,
    /// Reserved encoding, filters like `Coeff16`
    Reserved7 = 0x7,
}

impl IIRFilter {
    pub(crate) const fn into_bits(self) -> u8 {
        self as u8
    }
    /// Decode a 3-bit filter selector. The bits are kept as given.
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x7 {
            0x0 => Self::Off,
            0x1 => Self::Coeff2,
            0x2 => Self::Coeff4,
            0x3 => Self::Coeff8,
            0x4 => Self::Coeff16,
            0x5 => Self::Reserved5,
            0x6 => Self::Reserved6,
            _ => Self::Reserved7,
        }
    }
}
