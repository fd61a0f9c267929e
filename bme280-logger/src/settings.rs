use std::{env, error::Error, fmt};

use bme280_rs::{Bme280Config, SamplerConfig, SensorMode, DEFAULT_I2C_ADDRESS};

pub const DEVICE_VAR: &str = "BME280_I2C_DEVICE";
pub const ADDRESS_VAR: &str = "BME280_ADDRESS";
pub const MODE_VAR: &str = "BME280_MODE";
pub const PERIOD_VAR: &str = "BME280_PERIOD_MS";
pub const CYCLES_VAR: &str = "BME280_CYCLES";

const DEFAULT_DEVICE: &str = "/dev/i2c-1";

/// Logger settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub device: String,
    pub address: u8,
    pub mode: SensorMode,
    pub period_ms: u32,
    pub cycles: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsError {
    var: &'static str,
    value: String,
    reason: &'static str,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}={:?}: {}", self.var, self.value, self.reason)
    }
}

impl Error for SettingsError {}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let device = lookup(DEVICE_VAR).unwrap_or_else(|| DEFAULT_DEVICE.to_string());
        let address = match lookup(ADDRESS_VAR) {
            Some(value) => parse_address(&value)
                .ok_or_else(|| invalid(ADDRESS_VAR, value, "expected a 7-bit address"))?,
            None => DEFAULT_I2C_ADDRESS,
        };
        let mode = match lookup(MODE_VAR).as_deref().map(str::trim) {
            None | Some("normal") => SensorMode::Normal,
            Some("forced") => SensorMode::Forced,
            Some(other) => {
                return Err(invalid(MODE_VAR, other.to_string(), "expected normal or forced"))
            }
        };
        let period_ms = match lookup(PERIOD_VAR) {
            Some(value) => match value.trim().parse::<u32>() {
                Ok(ms) if ms > 0 => ms,
                _ => return Err(invalid(PERIOD_VAR, value, "expected a positive integer")),
            },
            None => SamplerConfig::for_mode(mode).period_ms,
        };
        let cycles = match lookup(CYCLES_VAR) {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) => Some(n),
                Err(_) => return Err(invalid(CYCLES_VAR, value, "expected a cycle count")),
            },
            None => None,
        };
        Ok(Self {
            device,
            address,
            mode,
            period_ms,
            cycles,
        })
    }

    pub fn driver_config(&self) -> Bme280Config {
        Bme280Config::default().with_sensor_mode(self.mode)
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig::for_mode(self.mode).with_period_ms(self.period_ms)
    }
}

fn invalid(var: &'static str, value: String, reason: &'static str) -> SettingsError {
    SettingsError { var, value, reason }
}

/// `0x77` or `119`.
fn parse_address(value: &str) -> Option<u8> {
    let value = value.trim();
    let address = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16).ok()?,
        None => value.parse().ok()?,
    };
    (address < 0x80).then_some(address)
}
