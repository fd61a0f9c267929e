//! Periodic acquisition on top of the driver.
//!
//! A [`Sampler`] runs one measurement cycle per period and hands every
//! successful reading to a [`ReadingSink`]. Cycles never overlap: when a cycle
//! takes longer than the period the next one starts right after it.
#[cfg(feature = "defmt")]
use defmt::{debug, warn};

use core::fmt::Debug;

use crate::{Bme280Error, Measurement, SensorMode};

/// Monotonic millisecond time source.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;
}

/// Destination of the readings produced by a [`Sampler`].
pub trait ReadingSink {
    /// Called once per successful cycle.
    fn emit(&mut self, record: SampleRecord);

    /// Called once per failed cycle started at `timestamp_ms`, and again when
    /// re-arming normal mode after that cycle fails. Does nothing by default.
    fn failed<E: Debug>(&mut self, timestamp_ms: u64, error: &Bme280Error<E>) {
        let _ = (timestamp_ms, error);
    }
}

/// Cadence of a [`Sampler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SamplerConfig {
    /// Time between the starts of two cycles, in milliseconds
    pub period_ms: u32,
}

impl SamplerConfig {
    /// One reading per minute in forced mode, one per second otherwise.
    pub fn for_mode(mode: SensorMode) -> Self {
        let period_ms = if mode.is_forced() { 60_000 } else { 1_000 };
        Self { period_ms }
    }

    /// Set the period.
    pub fn with_period_ms(mut self, period_ms: u32) -> Self {
        self.period_ms = period_ms;
        self
    }
}

/// One successful reading.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SampleRecord {
    /// Start of the cycle, in milliseconds since the sampler was created
    pub timestamp_ms: u64,
    /// Temperature in degrees Celsius
    pub temperature_celsius: f32,
    /// Pressure in pascals, `None` when the calibration makes it undefined
    pub pressure_pa: Option<f64>,
    /// Relative humidity in percent
    pub humidity_percent: f64,
}

impl SampleRecord {
    /// Flatten a [`Measurement`] taken at `timestamp_ms`.
    pub fn from_measurement(timestamp_ms: u64, measurement: &Measurement) -> Self {
        Self {
            timestamp_ms,
            temperature_celsius: measurement.temperature as f32 / 100.0,
            pressure_pa: measurement.pressure.ok(),
            humidity_percent: measurement.humidity,
        }
    }
}

/// Cycle counters returned by `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SamplerStats {
    /// Cycles that produced a record
    pub succeeded: usize,
    /// Cycles that failed
    pub failed: usize,
}

impl SamplerStats {
    /// Total number of cycles.
    pub fn cycles(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Periodic measurement loop.
///
/// `DEV` is an initialized driver, `T` the delay used between cycles, `C` the
/// clock and `S` the sink.
pub struct Sampler<DEV, T, C, S> {
    device: DEV,
    delay: T,
    clock: C,
    sink: S,
    config: SamplerConfig,
    origin_ms: u64,
}

impl<DEV, T, C, S> Sampler<DEV, T, C, S>
where
    C: Clock,
{
    /// Create a sampler. Record timestamps count from this call.
    pub fn new(device: DEV, delay: T, clock: C, sink: S, config: SamplerConfig) -> Self {
        let origin_ms = clock.now_ms();
        Self {
            device,
            delay,
            clock,
            sink,
            config,
            origin_ms,
        }
    }

    /// Cadence in use.
    pub fn config(&self) -> SamplerConfig {
        self.config
    }

    /// The driver.
    pub fn device_mut(&mut self) -> &mut DEV {
        &mut self.device
    }

    /// The sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Give back the driver, delay, clock and sink.
    pub fn release(self) -> (DEV, T, C, S) {
        (self.device, self.delay, self.clock, self.sink)
    }

    fn elapsed_ms(&self) -> u64 {
        self.clock.now_ms().saturating_sub(self.origin_ms)
    }

    fn remaining_ms(&self, cycle_start: u64) -> u32 {
        let spent = self.elapsed_ms().saturating_sub(cycle_start);
        (self.config.period_ms as u64).saturating_sub(spent) as u32
    }
}

impl<DEV, T, C, S> Sampler<DEV, T, C, S>
where
    C: Clock,
    S: ReadingSink,
{
    fn emit(&mut self, timestamp_ms: u64, measurement: &Measurement) -> SampleRecord {
        let record = SampleRecord::from_measurement(timestamp_ms, measurement);
        #[cfg(feature = "defmt")]
        {
            debug!("Sample at {} ms: {}", timestamp_ms, record);
        }
        self.sink.emit(record);
        record
    }
}

#[cfg(any(feature = "sync", feature = "async"))]
fn limit_reached(stats: &SamplerStats, limit: Option<usize>) -> bool {
    limit.is_some_and(|n| stats.cycles() >= n)
}

#[cfg(feature = "sync")]
mod blocking {
    use embedded_hal::delay::DelayNs;

    use super::*;
    use crate::SyncFunctions;

    /// Blocking sampling loop.
    pub trait SyncSampling<E> {
        /// Run a single cycle and emit its record.
        fn cycle(&mut self) -> Result<SampleRecord, Bme280Error<E>>;

        /// Run cycles until `limit` is reached, forever if `None`.
        fn run(&mut self, limit: Option<usize>) -> SamplerStats;
    }

    impl<DEV, E, T, C, S> SyncSampling<E> for Sampler<DEV, T, C, S>
    where
        DEV: SyncFunctions<E>,
        E: Debug,
        T: DelayNs,
        C: Clock,
        S: ReadingSink,
    {
        fn cycle(&mut self) -> Result<SampleRecord, Bme280Error<E>> {
            let start = self.elapsed_ms();
            let measurement = self.device.measure()?;
            Ok(self.emit(start, &measurement))
        }

        fn run(&mut self, limit: Option<usize>) -> SamplerStats {
            let mut stats = SamplerStats::default();
            while !limit_reached(&stats, limit) {
                let start = self.elapsed_ms();
                match self.device.measure() {
                    Ok(measurement) => {
                        self.emit(start, &measurement);
                        stats.succeeded += 1;
                    }
                    Err(err) => {
                        stats.failed += 1;
                        #[cfg(feature = "defmt")]
                        {
                            warn!("Sample cycle {} failed", stats.cycles());
                        }
                        self.sink.failed(start, &err);
                        if matches!(err, Bme280Error::NotReady) {
                            // normal mode dropped out of sampling, re-arm for the next tick
                            if let Err(rearm) = self.device.configure() {
                                #[cfg(feature = "defmt")]
                                {
                                    warn!("Re-arming normal mode failed");
                                }
                                let now = self.elapsed_ms();
                                self.sink.failed(now, &rearm);
                            }
                        }
                    }
                }
                if limit_reached(&stats, limit) {
                    break;
                }
                let wait = self.remaining_ms(start);
                self.delay.delay_ms(wait);
            }
            stats
        }
    }
}

#[cfg(feature = "async")]
mod nonblocking {
    use embedded_hal_async::delay::DelayNs;

    use super::*;
    use crate::AsyncFunctions;

    /// Async sampling loop.
    #[allow(async_fn_in_trait)]
    pub trait AsyncSampling<E> {
        /// Run a single cycle and emit its record.
        async fn cycle(&mut self) -> Result<SampleRecord, Bme280Error<E>>;

        /// Run cycles until `limit` is reached, forever if `None`.
        async fn run(&mut self, limit: Option<usize>) -> SamplerStats;
    }

    impl<DEV, E, T, C, S> AsyncSampling<E> for Sampler<DEV, T, C, S>
    where
        DEV: AsyncFunctions<E>,
        E: Debug,
        T: DelayNs,
        C: Clock,
        S: ReadingSink,
    {
        async fn cycle(&mut self) -> Result<SampleRecord, Bme280Error<E>> {
            let start = self.elapsed_ms();
            let measurement = self.device.measure().await?;
            Ok(self.emit(start, &measurement))
        }

        async fn run(&mut self, limit: Option<usize>) -> SamplerStats {
            let mut stats = SamplerStats::default();
            while !limit_reached(&stats, limit) {
                let start = self.elapsed_ms();
                match self.device.measure().await {
                    Ok(measurement) => {
                        self.emit(start, &measurement);
                        stats.succeeded += 1;
                    }
                    Err(err) => {
                        stats.failed += 1;
                        #[cfg(feature = "defmt")]
                        {
                            warn!("Sample cycle {} failed", stats.cycles());
                        }
                        self.sink.failed(start, &err);
                        if matches!(err, Bme280Error::NotReady) {
                            if let Err(rearm) = self.device.configure().await {
                                #[cfg(feature = "defmt")]
                                {
                                    warn!("Re-arming normal mode failed");
                                }
                                let now = self.elapsed_ms();
                                self.sink.failed(now, &rearm);
                            }
                        }
                    }
                }
                if limit_reached(&stats, limit) {
                    break;
                }
                let wait = self.remaining_ms(start);
                self.delay.delay_ms(wait).await;
            }
            stats
        }
    }
}

#[cfg(feature = "sync")]
pub use blocking::SyncSampling;
#[cfg(feature = "async")]
pub use nonblocking::AsyncSampling;
