use crate::{
    registers::{ConfigReg, CtrlHum, CtrlMeas, Register},
    IIRFilter, Oversampling, SensorMode, StandbyTime,
};

/// Register values for one configuration, plus the worst-case conversion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncodedConfig {
    /// `config` register (0xF5): standby, filter, 3-wire SPI off
    pub config: u8,
    /// `ctrl_meas` register (0xF4): temperature/pressure oversampling and mode
    pub ctrl_meas: u8,
    /// `ctrl_hum` register (0xF2): humidity oversampling
    pub ctrl_hum: u8,
    /// Maximum time for a forced conversion to complete, in milliseconds
    pub wait_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Configuration for the BME280 sensor.
pub struct Bme280Config {
    pub(crate) sensor_mode: SensorMode,
    pub(crate) temp_ovsamp: Oversampling,
    pub(crate) pres_ovsamp: Oversampling,
    pub(crate) hum_ovsamp: Oversampling,
    pub(crate) standby: StandbyTime,
    pub(crate) filter: IIRFilter,
}

impl Default for Bme280Config {
    /// Continuous sampling of all three channels.
    /// - Mode: Normal
    /// - Temperature, pressure and humidity oversampling: x1
    /// - Standby time: 1000 ms
    /// - IIR filter: Off
    fn default() -> Self {
        Self {
            sensor_mode: SensorMode::Normal,
            temp_ovsamp: Oversampling::X1,
            pres_ovsamp: Oversampling::X1,
            hum_ovsamp: Oversampling::X1,
            standby: StandbyTime::Ms1000,
            filter: IIRFilter::Off,
        }
    }
}

impl Bme280Config {
    /// One conversion per [`measure`](crate::SyncFunctions::measure) call, x1
    /// oversampling on every channel and no filtering.
    pub fn forced() -> Self {
        Self::default().with_sensor_mode(SensorMode::Forced)
    }

    /// Build a configuration from raw register selectors.
    ///
    /// Out-of-range values are not rejected: each selector is truncated to its
    /// field width and the remaining bits are written unchanged.
    pub fn from_selectors(os_t: u8, os_p: u8, os_h: u8, standby: u8, filter: u8, mode: u8) -> Self {
        Self {
            sensor_mode: SensorMode::from_u8(mode),
            temp_ovsamp: Oversampling::from_u8(os_t),
            pres_ovsamp: Oversampling::from_u8(os_p),
            hum_ovsamp: Oversampling::from_u8(os_h),
            standby: StandbyTime::from_u8(standby),
            filter: IIRFilter::from_u8(filter),
        }
    }

    /// Set the sensor mode.
    pub fn with_sensor_mode(mut self, mode: SensorMode) -> Self {
        self.sensor_mode = mode;
        self
    }
    /// Set the temperature oversampling.
    pub fn with_temperature_oversampling(mut self, os: Oversampling) -> Self {
        self.temp_ovsamp = os;
        self
    }
    /// Set the pressure oversampling.
    pub fn with_pressure_oversampling(mut self, os: Oversampling) -> Self {
        self.pres_ovsamp = os;
        self
    }
    /// Set the humidity oversampling.
    pub fn with_humidity_oversampling(mut self, os: Oversampling) -> Self {
        self.hum_ovsamp = os;
        self
    }
    /// Set the standby time used in normal mode.
    pub fn with_standby_time(mut self, standby: StandbyTime) -> Self {
        self.standby = standby;
        self
    }
    /// Set the IIR filter coefficient.
    pub fn with_iir_filter(mut self, filter: IIRFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Get the current sensor mode.
    pub fn sensor_mode(&self) -> SensorMode {
        self.sensor_mode
    }
    /// Get the current temperature oversampling.
    pub fn temperature_oversampling(&self) -> Oversampling {
        self.temp_ovsamp
    }
    /// Get the current pressure oversampling.
    pub fn pressure_oversampling(&self) -> Oversampling {
        self.pres_ovsamp
    }
    /// Get the current humidity oversampling.
    pub fn humidity_oversampling(&self) -> Oversampling {
        self.hum_ovsamp
    }
    /// Get the current standby time.
    pub fn standby_time(&self) -> StandbyTime {
        self.standby
    }
    /// Get the current IIR filter coefficient.
    pub fn iir_filter(&self) -> IIRFilter {
        self.filter
    }

    /// Worst-case duration of one conversion with this oversampling, in
    /// milliseconds, rounded up.
    ///
    /// `1.25 + 2.3 * T + (2.3 * P + 0.575) + (2.3 * H + 0.575)` ms, where T, P
    /// and H are the oversampling factors (0 when skipped).
    pub fn measurement_time_ms(&self) -> u32 {
        let samples =
            self.temp_ovsamp.factor() + self.pres_ovsamp.factor() + self.hum_ovsamp.factor();
        let micros = 1_250 + 2_300 * samples + 575 + 575;
        micros.div_ceil(1_000)
    }

    /// Encode the register values for this configuration.
    pub fn encode(&self) -> EncodedConfig {
        EncodedConfig {
            config: self.config_reg().to_u8(),
            ctrl_meas: self.ctrl_meas(self.sensor_mode).to_u8(),
            ctrl_hum: self.ctrl_hum().to_u8(),
            wait_ms: self.measurement_time_ms(),
        }
    }

    #[must_use]
    pub(crate) fn config_reg(&self) -> ConfigReg {
        ConfigReg::new()
            .with_t_sb(self.standby)
            .with_filter(self.filter)
            .with_spi3w_en(false)
    }

    #[must_use]
    pub(crate) fn ctrl_hum(&self) -> CtrlHum {
        CtrlHum::new().with_osrs_h(self.hum_ovsamp)
    }

    #[must_use]
    pub(crate) fn ctrl_meas(&self, mode: SensorMode) -> CtrlMeas {
        CtrlMeas::new()
            .with_osrs_t(self.temp_ovsamp)
            .with_osrs_p(self.pres_ovsamp)
            .with_mode(mode)
    }
}
