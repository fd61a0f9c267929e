#[cfg(feature = "defmt")]
use defmt::{debug, error, trace, warn};
use embedded_hal_async::{delay::DelayNs, i2c, spi};

use crate::{
    calibration::{CalibrationBlock, CalibrationCoefficients},
    interface::{Interface, SPI_READ, SPI_WRITE_MASK},
    registers::{
        ChipId, Command, ConfigReg, CtrlHum, CtrlMeas, Register, StatusReg, CALIB_A_ADDR,
        CALIB_A_LEN, CALIB_B_ADDR, CALIB_B_LEN, DATA_ADDR, DATA_LEN,
    },
    Bme280, Bme280Config, Bme280Error, I2cInterface, Measurement, RawSample, SensorMode,
    SequencerState, SpiInterface, MAX_LOOPS, POLL_DELAY_MS, STARTUP_DELAY_MS,
};

pub(crate) trait AsyncInterface: Interface {
    type Error;
    async fn write_register(&mut self, address: u8, value: u8) -> Result<(), Self::Error>;
    async fn read_registers(&mut self, start: u8, buffer: &mut [u8]) -> Result<(), Self::Error>;
}

impl<I2C, E> AsyncInterface for I2cInterface<I2C>
where
    I2C: i2c::I2c<Error = E>,
{
    type Error = E;

    async fn write_register(&mut self, address: u8, value: u8) -> Result<(), Self::Error> {
        self.i2c.write(self.address, &[address, value]).await
    }

    async fn read_registers(&mut self, start: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.i2c.write_read(self.address, &[start], buffer).await?;
        #[cfg(feature = "defmt")]
        {
            trace!("I2C Read from {:#x}: {=[u8]:#x}", start, buffer);
        }
        Ok(())
    }
}

impl<SPI, E> AsyncInterface for SpiInterface<SPI>
where
    SPI: spi::SpiDevice<Error = E>,
{
    type Error = E;

    async fn write_register(&mut self, address: u8, value: u8) -> Result<(), Self::Error> {
        #[cfg(feature = "defmt")]
        {
            trace!("SPI Write to {:#x}: {:#x}", address, value);
        }
        self.spi.write(&[address & SPI_WRITE_MASK, value]).await
    }

    async fn read_registers(&mut self, start: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.spi
            .transaction(&mut [
                spi::Operation::Write(&[start | SPI_READ]),
                spi::Operation::Read(buffer),
            ])
            .await?;
        #[cfg(feature = "defmt")]
        {
            trace!("SPI Read from {:#x}: {=[u8]:#x}", start, buffer);
        }
        Ok(())
    }
}

pub(crate) trait AsyncRegister<IFACE>
where
    IFACE: AsyncInterface,
    Self: Register + Sized,
{
    async fn read_register(iface: &mut IFACE) -> Result<Self, IFACE::Error> {
        let mut data = [0u8; 1];
        iface.read_registers(Self::ADDRESS, &mut data).await?;
        Ok(Self::from_u8(data[0]))
    }

    async fn write_register(&self, iface: &mut IFACE) -> Result<(), IFACE::Error> {
        iface.write_register(Self::ADDRESS, self.to_u8()).await
    }
}

macro_rules! impl_async_register {
    ($($reg:ty),+) => {
        $(
            impl<IFACE> AsyncRegister<IFACE> for $reg
            where
                IFACE: AsyncInterface,
            {}
        )+
    };
}

impl_async_register! {ChipId, Command, CtrlHum, StatusReg, CtrlMeas, ConfigReg}

/// Asynchronous functions for the BME280 sensor.
#[allow(async_fn_in_trait)]
pub trait AsyncFunctions<E> {
    /// Initialize the device: check the chip ID, soft-reset, read the
    /// calibration block and apply the configuration.
    async fn init(&mut self) -> Result<(), Bme280Error<E>>;

    /// Soft-resets the device and waits for the NVM copy to finish.
    async fn reset(&mut self) -> Result<(), Bme280Error<E>>;

    /// Reads both calibration ranges and keeps the decoded coefficients.
    async fn load_calibration(&mut self) -> Result<CalibrationCoefficients, Bme280Error<E>>;

    /// Writes the control registers. Starts continuous conversions in normal mode.
    async fn configure(&mut self) -> Result<(), Bme280Error<E>>;

    /// Replaces the configuration and applies it.
    async fn set_config(&mut self, config: Bme280Config) -> Result<(), Bme280Error<E>>;

    /// Burst-reads the raw result registers.
    async fn read_raw(&mut self) -> Result<RawSample, Bme280Error<E>>;

    /// Reads a compensated measurement, triggering a conversion in forced mode.
    async fn measure(&mut self) -> Result<Measurement, Bme280Error<E>>;

    /// Puts the device to sleep.
    async fn stop(&mut self) -> Result<(), Bme280Error<E>>;
}

impl<IFACE, E, D> AsyncFunctions<E> for Bme280<IFACE, D>
where
    IFACE: AsyncInterface<Error = E>,
    D: DelayNs,
{
    async fn init(&mut self) -> Result<(), Bme280Error<E>> {
        self.delay.delay_ms(STARTUP_DELAY_MS).await;
        let chip_id = ChipId::read_register(&mut self.iface).await?;
        if !chip_id.validate() {
            #[cfg(feature = "defmt")]
            {
                error!("Unexpected chip ID {=u8:#x}", chip_id.0);
            }
            return Err(Bme280Error::InvalidDevice);
        }
        self.reset().await?;
        self.load_calibration().await?;
        self.configure().await
    }

    async fn reset(&mut self) -> Result<(), Bme280Error<E>> {
        self.state = SequencerState::Idle;
        Command::SoftReset.write_register(&mut self.iface).await?;
        self.delay.delay_ms(STARTUP_DELAY_MS).await;
        for _ in 0..MAX_LOOPS {
            if !StatusReg::read_register(&mut self.iface).await?.im_update() {
                #[cfg(feature = "defmt")]
                {
                    debug!("BME280 reset complete");
                }
                return Ok(());
            }
            self.delay.delay_ms(POLL_DELAY_MS).await;
        }
        #[cfg(feature = "defmt")]
        {
            error!("BME280 NVM copy did not finish after reset");
        }
        Err(Bme280Error::NotReady)
    }

    async fn load_calibration(&mut self) -> Result<CalibrationCoefficients, Bme280Error<E>> {
        let mut block_a = [0u8; CALIB_A_LEN];
        let mut block_b = [0u8; CALIB_B_LEN];
        self.iface.read_registers(CALIB_A_ADDR, &mut block_a).await?;
        self.iface.read_registers(CALIB_B_ADDR, &mut block_b).await?;
        let coeffs =
            CalibrationCoefficients::from_block(&CalibrationBlock::from_registers(&block_a, &block_b));
        self.calibration = Some(coeffs);
        Ok(coeffs)
    }

    async fn configure(&mut self) -> Result<(), Bme280Error<E>> {
        // config writes are ignored while converting in normal mode
        if self.state == SequencerState::Sampling {
            self.config
                .ctrl_meas(SensorMode::Sleep)
                .write_register(&mut self.iface)
                .await?;
        }
        self.state = SequencerState::Configuring;
        let mode = match self.config.sensor_mode {
            SensorMode::Normal => SensorMode::Normal,
            _ => SensorMode::Sleep,
        };
        let res = self.write_config_async(mode).await;
        self.state = match res {
            Ok(()) if mode == SensorMode::Normal => SequencerState::Sampling,
            _ => SequencerState::Idle,
        };
        res
    }

    async fn set_config(&mut self, config: Bme280Config) -> Result<(), Bme280Error<E>> {
        self.config = config;
        self.configure().await
    }

    async fn read_raw(&mut self) -> Result<RawSample, Bme280Error<E>> {
        let resume = match self.state {
            SequencerState::Sampling => SequencerState::Sampling,
            _ => SequencerState::Idle,
        };
        self.state = SequencerState::Reading;
        let mut buf = [0u8; DATA_LEN];
        let res = self.iface.read_registers(DATA_ADDR, &mut buf).await;
        self.state = resume;
        res?;
        Ok(RawSample::from_registers(&buf))
    }

    async fn measure(&mut self) -> Result<Measurement, Bme280Error<E>> {
        let coeffs = self.coefficients()?;
        let raw = match self.config.sensor_mode {
            mode if mode.is_forced() => {
                let raw = self.forced_conversion_async().await;
                self.state = SequencerState::Idle;
                raw?
            }
            SensorMode::Normal if self.state == SequencerState::Sampling => {
                self.read_raw().await?
            }
            _ => return Err(Bme280Error::NotReady),
        };
        Ok(coeffs.compensate(raw))
    }

    async fn stop(&mut self) -> Result<(), Bme280Error<E>> {
        let res = self
            .config
            .ctrl_meas(SensorMode::Sleep)
            .write_register(&mut self.iface)
            .await;
        self.state = SequencerState::Idle;
        Ok(res?)
    }
}

impl<IFACE, E, D> Bme280<IFACE, D>
where
    IFACE: AsyncInterface<Error = E>,
    D: DelayNs,
{
    async fn write_config_async(&mut self, mode: SensorMode) -> Result<(), Bme280Error<E>> {
        let config = self.config.config_reg();
        let ctrl_hum = self.config.ctrl_hum();
        let ctrl_meas = self.config.ctrl_meas(mode);
        #[cfg(feature = "defmt")]
        {
            debug!("Config [{=u8:#x}]: {=u8:#b}", ConfigReg::ADDRESS, config.to_u8());
            debug!("Ctrl Hum [{=u8:#x}]: {=u8:#b}", CtrlHum::ADDRESS, ctrl_hum.to_u8());
            debug!("Ctrl Meas [{=u8:#x}]: {=u8:#b}", CtrlMeas::ADDRESS, ctrl_meas.to_u8());
        }
        config.write_register(&mut self.iface).await?;
        ctrl_hum.write_register(&mut self.iface).await?;
        ctrl_meas.write_register(&mut self.iface).await?;
        Ok(())
    }

    async fn forced_conversion_async(&mut self) -> Result<RawSample, Bme280Error<E>> {
        self.state = SequencerState::Triggering;
        self.write_config_async(self.config.sensor_mode).await?;
        self.state = SequencerState::Waiting;
        self.delay
            .delay_ms(self.config.measurement_time_ms())
            .await;
        let mut ctr = MAX_LOOPS;
        while StatusReg::read_register(&mut self.iface)
            .await?
            .measuring()
        {
            ctr -= 1;
            if ctr == 0 {
                #[cfg(feature = "defmt")]
                {
                    warn!("Forced conversion still running");
                }
                return Err(Bme280Error::NoDataAvailable);
            }
            self.delay.delay_ms(POLL_DELAY_MS).await;
        }
        self.read_raw().await
    }
}
