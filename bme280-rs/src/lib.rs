#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]
//! Embassy-compatible driver for the BME280 temperature, pressure and humidity sensor
//!
//! The driver reads the factory calibration once during [`init`](SyncFunctions::init)
//! and keeps it for the lifetime of the instance. Every measurement is compensated
//! temperature first: the fine temperature of that stage feeds the pressure and
//! humidity formulas.
//!
//! Both power modes go through the same sequencer:
//! - [`SensorMode::Normal`]: the configuration is written once and the device
//!   free-runs; [`measure`](SyncFunctions::measure) reads the latest result.
//! - [`SensorMode::Forced`]: each [`measure`](SyncFunctions::measure) call
//!   rewrites the configuration, triggers one conversion, waits for it to
//!   finish and reads it.
pub use crate::{
    calibration::{
        to_signed12, to_signed16, to_signed8, CalibrationBlock, CalibrationCoefficients,
        Coefficient,
    },
    config::{Bme280Config, EncodedConfig},
    conversion::{CompensationError, Measurement, RawSample},
    interface::{I2cInterface, SpiInterface},
    registers::{IIRFilter, Oversampling, SensorMode, StandbyTime},
    sampler::{Clock, ReadingSink, SampleRecord, Sampler, SamplerConfig, SamplerStats},
};

#[cfg(feature = "async")]
mod r#async;
mod calibration;
mod config;
mod conversion;
mod interface;
mod registers;
mod sampler;
#[cfg(feature = "sync")]
mod sync;

pub use uom::si::f64::{Length, Pressure, Ratio, ThermodynamicTemperature};
pub use uom::si::length::{foot, meter};
pub use uom::si::pressure::{hectopascal, millibar, pascal};
pub use uom::si::ratio::percent;
pub use uom::si::thermodynamic_temperature::degree_celsius;

/// Default I2C address for the BME280 sensor (SDO pulled low)
pub const DEFAULT_I2C_ADDRESS: u8 = 0x76;
/// Alternate I2C address for the BME280 sensor (SDO pulled high)
pub const SECONDARY_I2C_ADDRESS: u8 = 0x77;

#[cfg(feature = "async")]
pub use crate::r#async::AsyncFunctions;
#[cfg(feature = "async")]
pub use crate::sampler::AsyncSampling;
#[cfg(feature = "sync")]
pub use crate::sampler::SyncSampling;
#[cfg(feature = "sync")]
pub use crate::sync::SyncFunctions;

/// BME280 temperature, pressure and humidity sensor
pub struct Bme280<IFACE, D> {
    iface: IFACE,
    delay: D,
    config: Bme280Config,
    calibration: Option<CalibrationCoefficients>,
    state: SequencerState,
}

impl<I2C, D> Bme280<I2cInterface<I2C>, D> {
    /// Create a new instance of the [`Bme280`] device.
    ///
    /// # Arguments
    /// * `i2c` - The I2C peripheral to use.
    /// * `address` - The I2C address of the device. Use [`DEFAULT_I2C_ADDRESS`] or [`SECONDARY_I2C_ADDRESS`].
    /// * `config` - The configuration to use.
    /// * `delay` - A delay provider for resets and forced conversions.
    pub fn new_with_i2c(i2c: I2C, address: u8, config: Bme280Config, delay: D) -> Self {
        Self::with_interface(I2cInterface { i2c, address }, config, delay)
    }

    /// Give back the I2C peripheral and the delay provider.
    pub fn release(self) -> (I2C, D) {
        (self.iface.i2c, self.delay)
    }
}

impl<SPI, D> Bme280<SpiInterface<SPI>, D> {
    /// Create a new instance of the [`Bme280`] device on a 4-wire SPI bus.
    ///
    /// # Arguments
    /// * `spi` - The SPI device to use.
    /// * `config` - The configuration to use.
    /// * `delay` - A delay provider for resets and forced conversions.
    pub fn new_with_spi(spi: SPI, config: Bme280Config, delay: D) -> Self {
        Self::with_interface(SpiInterface { spi }, config, delay)
    }

    /// Give back the SPI device and the delay provider.
    pub fn release(self) -> (SPI, D) {
        (self.iface.spi, self.delay)
    }
}

impl<IFACE, D> Bme280<IFACE, D> {
    fn with_interface(iface: IFACE, config: Bme280Config, delay: D) -> Self {
        Self {
            iface,
            delay,
            config,
            calibration: None,
            state: SequencerState::Idle,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> Bme280Config {
        self.config
    }

    /// Calibration coefficients, once loaded.
    pub fn calibration(&self) -> Option<&CalibrationCoefficients> {
        self.calibration.as_ref()
    }

    /// Current sequencer state.
    pub fn state(&self) -> SequencerState {
        self.state
    }

    fn coefficients<E>(&self) -> Result<CalibrationCoefficients, Bme280Error<E>> {
        self.calibration.ok_or(Bme280Error::CalibrationNotLoaded)
    }
}

/// Acquisition sequencer states.
///
/// `Idle -> Configuring -> Sampling` in normal mode,
/// `Idle -> Triggering -> Waiting -> Reading -> Idle` for each forced conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequencerState {
    /// Not converting; forced conversions start from here
    Idle,
    /// Control registers are being written
    Configuring,
    /// Normal mode is free-running; results can be read at any time
    Sampling,
    /// A forced conversion is being requested
    Triggering,
    /// Waiting for a forced conversion to finish
    Waiting,
    /// Result registers are being read
    Reading,
}

/// Errors that can occur when interacting with the BME280 sensor.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bme280Error<CommError> {
    /// Bus communication error
    Comm(CommError),
    /// Invalid device (wrong chip ID)
    InvalidDevice,
    /// Compensation requested before the calibration block was read
    CalibrationNotLoaded,
    /// The pressure denominator derived from P1 is zero
    InvalidPressureDenominator,
    /// Driver not ready (e.g., normal mode not started)
    NotReady,
    /// No new data available to read
    NoDataAvailable,
}

impl<CommError> From<CommError> for Bme280Error<CommError> {
    fn from(err: CommError) -> Self {
        Bme280Error::Comm(err)
    }
}

const MAX_LOOPS: usize = 100;
/// Power-on and soft-reset start-up time, milliseconds
const STARTUP_DELAY_MS: u32 = 2;
/// Status poll interval once the computed conversion time has elapsed, milliseconds
const POLL_DELAY_MS: u32 = 1;
