mod settings;

use std::{error::Error, fmt::Debug, time::Instant};

use bme280_rs::{
    Bme280, Bme280Error, Clock, ReadingSink, SampleRecord, Sampler, SyncFunctions as _,
    SyncSampling as _,
};
use linux_embedded_hal::{Delay, I2cdev};
use log::{debug, info, warn};

use crate::settings::Settings;

struct MonotonicClock(Instant);

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.0.elapsed().as_millis() as u64
    }
}

struct LogSink;

impl ReadingSink for LogSink {
    fn emit(&mut self, record: SampleRecord) {
        info!("{}", format_record(&record));
    }

    fn failed<E: Debug>(&mut self, timestamp_ms: u64, error: &Bme280Error<E>) {
        warn!("t={} measurement failed: {:?}", timestamp_ms, error);
    }
}

fn format_record(record: &SampleRecord) -> String {
    let pressure = match record.pressure_pa {
        Some(pa) => format!("{:.2}", pa / 100.0),
        None => "invalid".to_string(),
    };
    format!(
        "t={} temperature={:.2} pressure={} humidity={:.2}",
        record.timestamp_ms, record.temperature_celsius, pressure, record.humidity_percent
    )
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let settings = Settings::from_env()?;
    info!(
        "BME280 at {:#04x} on {}, {:?} mode, every {} ms",
        settings.address, settings.device, settings.mode, settings.period_ms
    );

    let i2c = I2cdev::new(&settings.device)?;
    let mut bme = Bme280::new_with_i2c(i2c, settings.address, settings.driver_config(), Delay);
    bme.init()
        .map_err(|e| format!("BME280 initialization failed: {e:?}"))?;
    debug!("Calibration: {:?}", bme.calibration());

    let mut sampler = Sampler::new(
        bme,
        Delay,
        MonotonicClock(Instant::now()),
        LogSink,
        settings.sampler_config(),
    );
    let stats = sampler.run(settings.cycles);
    info!(
        "{} cycles: {} succeeded, {} failed",
        stats.cycles(),
        stats.succeeded,
        stats.failed
    );

    let (mut bme, ..) = sampler.release();
    bme.stop()
        .map_err(|e| format!("BME280 stop failed: {e:?}"))?;
    Ok(())
}
