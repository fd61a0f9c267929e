#[cfg(feature = "defmt")]
use defmt::{trace, Format};

use libm::pow;
use uom::si::f64::{Length, Pressure, Ratio, ThermodynamicTemperature};
use uom::si::length::foot;
use uom::si::pressure::{hectopascal, pascal};
use uom::si::ratio::percent;
use uom::si::thermodynamic_temperature::degree_celsius;

use crate::{calibration::CalibrationCoefficients, Bme280Error};

/// Uncompensated ADC outputs of one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub struct RawSample {
    /// 20-bit temperature
    pub temperature: u32,
    /// 20-bit pressure
    pub pressure: u32,
    /// 16-bit humidity
    pub humidity: u16,
}

impl RawSample {
    /// Unpack the 8-byte burst read starting at `press_msb` (0xF7).
    pub fn from_registers(data: &[u8; 8]) -> Self {
        Self {
            pressure: (data[0] as u32) << 12 | (data[1] as u32) << 4 | (data[2] as u32) >> 4,
            temperature: (data[3] as u32) << 12 | (data[4] as u32) << 4 | (data[5] as u32) >> 4,
            humidity: (data[6] as u16) << 8 | data[7] as u16,
        }
    }
}

/// Compensation results that are properties of the data, not of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum CompensationError {
    /// The P1-derived pressure denominator is zero; no pressure can be computed.
    InvalidPressureDenominator,
}

impl CompensationError {
    /// The matching driver error.
    pub fn into_error<E>(self) -> Bme280Error<E> {
        match self {
            CompensationError::InvalidPressureDenominator => Bme280Error::InvalidPressureDenominator,
        }
    }
}

/// Compensated sensor readout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Fine temperature shared by the pressure and humidity stages
    pub t_fine: i32,
    /// Temperature in hundredths of a degree Celsius
    pub temperature: i32,
    /// Pressure in pascals
    pub pressure: Result<f64, CompensationError>,
    /// Relative humidity in percent, within `0.0..=100.0`
    pub humidity: f64,
}

impl Measurement {
    /// Temperature as a unit-aware quantity.
    pub fn temperature(&self) -> ThermodynamicTemperature {
        ThermodynamicTemperature::new::<degree_celsius>(self.temperature as f64 / 100.0)
    }

    /// Pressure as a unit-aware quantity.
    pub fn pressure(&self) -> Result<Pressure, CompensationError> {
        self.pressure.map(Pressure::new::<pascal>)
    }

    /// Pressure, with an invalid reading turned into a driver error.
    pub fn checked_pressure<E>(&self) -> Result<Pressure, Bme280Error<E>> {
        self.pressure().map_err(CompensationError::into_error)
    }

    /// Relative humidity as a unit-aware ratio.
    pub fn humidity(&self) -> Ratio {
        Ratio::new::<percent>(self.humidity)
    }

    /// Pressure altitude relative to `sea_level`, `None` if the pressure is invalid.
    pub fn altitude(&self, sea_level: Pressure) -> Option<Length> {
        self.pressure().ok().map(|p| calculate_altitude(p, sea_level))
    }
}

impl CalibrationCoefficients {
    /// Fine temperature from a raw temperature reading.
    ///
    /// 32-bit integer arithmetic with wrapping multiplication and arithmetic
    /// shifts, as in the vendor reference code.
    pub fn t_fine(&self, raw_temperature: u32) -> i32 {
        let adc_t = raw_temperature as i32;
        let t1 = self.dig_t1 as i32;
        let var1 = ((adc_t >> 3) - (t1 << 1)).wrapping_mul(self.dig_t2 as i32) >> 11;
        let delta = (adc_t >> 4) - t1;
        let var2 = (delta.wrapping_mul(delta) >> 12).wrapping_mul(self.dig_t3 as i32) >> 14;
        var1.wrapping_add(var2)
    }

    /// Temperature in hundredths of a degree Celsius.
    pub fn compensate_temperature(t_fine: i32) -> i32 {
        t_fine.wrapping_mul(5).wrapping_add(128) >> 8
    }

    /// Pressure in pascals.
    ///
    /// # Errors
    /// [`CompensationError::InvalidPressureDenominator`] when the P1-derived
    /// denominator is zero (for instance an erased calibration block).
    pub fn compensate_pressure(
        &self,
        raw_pressure: u32,
        t_fine: i32,
    ) -> Result<f64, CompensationError> {
        let mut var1 = (t_fine as f64 / 2.0) - 64000.0;
        let mut var2 = var1 * var1 * self.dig_p6 as f64 / 32768.0;
        var2 += var1 * self.dig_p5 as f64 * 2.0;
        var2 = (var2 / 4.0) + (self.dig_p4 as f64 * 65536.0);
        var1 = (self.dig_p3 as f64 * var1 * var1 / 524288.0 + self.dig_p2 as f64 * var1) / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * self.dig_p1 as f64;
        if var1 == 0.0 {
            return Err(CompensationError::InvalidPressureDenominator);
        }
        let mut pressure = 1048576.0 - raw_pressure as f64;
        pressure = (pressure - (var2 / 4096.0)) * 6250.0 / var1;
        var1 = self.dig_p9 as f64 * pressure * pressure / 2147483648.0;
        var2 = pressure * self.dig_p8 as f64 / 32768.0;
        Ok(pressure + (var1 + var2 + self.dig_p7 as f64) / 16.0)
    }

    /// Relative humidity in percent, clamped to `0.0..=100.0`.
    pub fn compensate_humidity(&self, raw_humidity: u16, t_fine: i32) -> f64 {
        let base = t_fine as f64 - 76800.0;
        let mut humidity = (raw_humidity as f64
            - (self.dig_h4 as f64 * 64.0 + self.dig_h5 as f64 / 16384.0 * base))
            * (self.dig_h2 as f64 / 65536.0
                * (1.0
                    + self.dig_h6 as f64 / 67108864.0
                        * base
                        * (1.0 + self.dig_h3 as f64 / 67108864.0 * base)));
        humidity *= 1.0 - self.dig_h1 as f64 * humidity / 524288.0;
        humidity.clamp(0.0, 100.0)
    }

    /// Compensate a full raw sample. Temperature is computed first and its
    /// `t_fine` feeds the pressure and humidity stages.
    pub fn compensate(&self, raw: RawSample) -> Measurement {
        let t_fine = self.t_fine(raw.temperature);
        let meas = Measurement {
            t_fine,
            temperature: Self::compensate_temperature(t_fine),
            pressure: self.compensate_pressure(raw.pressure, t_fine),
            humidity: self.compensate_humidity(raw.humidity, t_fine),
        };
        #[cfg(feature = "defmt")]
        {
            trace!(
                "t_fine={} T={}cC P={}Pa H={}%",
                meas.t_fine,
                meas.temperature,
                meas.pressure.unwrap_or(f64::NAN),
                meas.humidity
            );
        }
        meas
    }
}

/// Calculate the altitude based on the pressure and the sea level pressure.
///
/// The altitude is calculated following the [NOAA formula](https://www.weather.gov/media/epz/wxcalc/pressureAltitude.pdf).
fn calculate_altitude(pressure: Pressure, sea_level: Pressure) -> Length {
    let ratio = pressure.get::<hectopascal>() / sea_level.get::<hectopascal>();
    Length::new::<foot>(145366.45 * (1.0 - pow(ratio, 0.190284)))
}
