#[cfg(feature = "defmt")]
use defmt::{debug, error, trace, warn};
use embedded_hal::{delay::DelayNs, i2c, spi};

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

pub(crate) trait SyncInterface: Interface {
    type Error;
    fn write_register(&mut self, address: u8, value: u8) -> Result<(), Self::Error>;
    fn read_registers(&mut self, start: u8, buffer: &mut [u8]) -> Result<(), Self::Error>;
}

impl<I2C, E> SyncInterface for I2cInterface<I2C>
where
    I2C: i2c::I2c<Error = E>,
{
    type Error = E;

    fn write_register(&mut self, address: u8, value: u8) -> Result<(), Self::Error> {
        self.i2c.write(self.address, &[address, value])
    }

    fn read_registers(&mut self, start: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.i2c.write_read(self.address, &[start], buffer)?;
        #[cfg(feature = "defmt")]
        {
            trace!("I2C Read from {:#x}: {=[u8]:#x}", start, buffer);
        }
        Ok(())
    }
}

impl<SPI, E> SyncInterface for SpiInterface<SPI>
where
    SPI: spi::SpiDevice<Error = E>,
{
    type Error = E;

    fn write_register(&mut self, address: u8, value: u8) -> Result<(), Self::Error> {
        #[cfg(feature = "defmt")]
        {
            trace!("SPI Write to {:#x}: {:#x}", address, value);
        }
        self.spi.write(&[address & SPI_WRITE_MASK, value])
    }

    fn read_registers(&mut self, start: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.spi.transaction(&mut [
            spi::Operation::Write(&[start | SPI_READ]),
            spi::Operation::Read(buffer),
        ])?;
        #[cfg(feature = "defmt")]
        {
            trace!("SPI Read from {:#x}: {=[u8]:#x}", start, buffer);
        }
        Ok(())
    }
}

pub(crate) trait SyncRegister<IFACE>
where
    IFACE: SyncInterface,
    Self: Register + Sized,
{
    fn read_register(iface: &mut IFACE) -> Result<Self, IFACE::Error> {
        let mut data = [0u8; 1];
        iface.read_registers(Self::ADDRESS, &mut data)?;
        Ok(Self::from_u8(data[0]))
    }

    fn write_register(&self, iface: &mut IFACE) -> Result<(), IFACE::Error> {
        iface.write_register(Self::ADDRESS, self.to_u8())
    }
}

macro_rules! impl_sync_register {
    ($($reg:ty),+) => {
        $(
            impl<IFACE> SyncRegister<IFACE> for $reg
            where
                IFACE: SyncInterface,
            {}
        )+
    };
}

impl_sync_register! {ChipId, Command, CtrlHum, StatusReg, CtrlMeas, ConfigReg}

/// Synchronous functions for the BME280 sensor.
pub trait SyncFunctions<E> {
    /// Initialize the device: check the chip ID, soft-reset, read the
    /// calibration block and apply the configuration.
    fn init(&mut self) -> Result<(), Bme280Error<E>>;

    /// Soft-resets the device and waits for the NVM copy to finish.
    fn reset(&mut self) -> Result<(), Bme280Error<E>>;

    /// Reads both calibration ranges and keeps the decoded coefficients.
    fn load_calibration(&mut self) -> Result<CalibrationCoefficients, Bme280Error<E>>;

    /// Writes the control registers. Starts continuous conversions in normal mode.
    fn configure(&mut self) -> Result<(), Bme280Error<E>>;

    /// Replaces the configuration and applies it.
    fn set_config(&mut self, config: Bme280Config) -> Result<(), Bme280Error<E>>;

    /// Burst-reads the raw result registers.
    fn read_raw(&mut self) -> Result<RawSample, Bme280Error<E>>;

    /// Reads a compensated measurement, triggering a conversion in forced mode.
    fn measure(&mut self) -> Result<Measurement, Bme280Error<E>>;

    /// Puts the device to sleep.
    fn stop(&mut self) -> Result<(), Bme280Error<E>>;
}

impl<IFACE, E, D> SyncFunctions<E> for Bme280<IFACE, D>
where
    IFACE: SyncInterface<Error = E>,
    D: DelayNs,
{
    fn init(&mut self) -> Result<(), Bme280Error<E>> {
        self.delay.delay_ms(STARTUP_DELAY_MS);
        let chip_id = ChipId::read_register(&mut self.iface)?;
        if !chip_id.validate() {
            #[cfg(feature = "defmt")]
            {
                error!("Unexpected chip ID {=u8:#x}", chip_id.0);
            }
            return Err(Bme280Error::InvalidDevice);
        }
        self.reset()?;
        self.load_calibration()?;
        self.configure()
    }

    fn reset(&mut self) -> Result<(), Bme280Error<E>> {
        self.state = SequencerState::Idle;
        Command::SoftReset.write_register(&mut self.iface)?;
        self.delay.delay_ms(STARTUP_DELAY_MS);
        for _ in 0..MAX_LOOPS {
            if !StatusReg::read_register(&mut self.iface)?.im_update() {
                #[cfg(feature = "defmt")]
                {
                    debug!("BME280 reset complete");
                }
                return Ok(());
            }
            self.delay.delay_ms(POLL_DELAY_MS);
        }
        #[cfg(feature = "defmt")]
        {
            error!("BME280 NVM copy did not finish after reset");
        }
        Err(Bme280Error::NotReady)
    }

    fn load_calibration(&mut self) -> Result<CalibrationCoefficients, Bme280Error<E>> {
        let mut block_a = [0u8; CALIB_A_LEN];
        let mut block_b = [0u8; CALIB_B_LEN];
        self.iface.read_registers(CALIB_A_ADDR, &mut block_a)?;
        self.iface.read_registers(CALIB_B_ADDR, &mut block_b)?;
        let coeffs =
            CalibrationCoefficients::from_block(&CalibrationBlock::from_registers(&block_a, &block_b));
        self.calibration = Some(coeffs);
        Ok(coeffs)
    }

    fn configure(&mut self) -> Result<(), Bme280Error<E>> {
        // config writes are ignored while converting in normal mode
        if self.state == SequencerState::Sampling {
            self.config
                .ctrl_meas(SensorMode::Sleep)
                .write_register(&mut self.iface)?;
        }
        self.state = SequencerState::Configuring;
        let mode = match self.config.sensor_mode {
            SensorMode::Normal => SensorMode::Normal,
            _ => SensorMode::Sleep,
        };
        match self.write_config(mode) {
            Ok(()) if mode == SensorMode::Normal => {
                self.state = SequencerState::Sampling;
                Ok(())
            }
            Ok(()) => {
                self.state = SequencerState::Idle;
                Ok(())
            }
            Err(e) => {
                self.state = SequencerState::Idle;
                Err(e)
            }
        }
    }

    fn set_config(&mut self, config: Bme280Config) -> Result<(), Bme280Error<E>> {
        self.config = config;
        self.configure()
    }

    fn read_raw(&mut self) -> Result<RawSample, Bme280Error<E>> {
        let resume = match self.state {
            SequencerState::Sampling => SequencerState::Sampling,
            _ => SequencerState::Idle,
        };
        self.state = SequencerState::Reading;
        let mut buf = [0u8; DATA_LEN];
        let res = self.iface.read_registers(DATA_ADDR, &mut buf);
        self.state = resume;
        res?;
        Ok(RawSample::from_registers(&buf))
    }

    fn measure(&mut self) -> Result<Measurement, Bme280Error<E>> {
        let coeffs = self.coefficients()?;
        let raw = match self.config.sensor_mode {
            mode if mode.is_forced() => {
                let raw = self.forced_conversion();
                self.state = SequencerState::Idle;
                raw?
            }
            SensorMode::Normal if self.state == SequencerState::Sampling => self.read_raw()?,
            _ => return Err(Bme280Error::NotReady),
        };
        Ok(coeffs.compensate(raw))
    }

    fn stop(&mut self) -> Result<(), Bme280Error<E>> {
        let res = self
            .config
            .ctrl_meas(SensorMode::Sleep)
            .write_register(&mut self.iface);
        self.state = SequencerState::Idle;
        Ok(res?)
    }
}

impl<IFACE, E, D> Bme280<IFACE, D>
where
    IFACE: SyncInterface<Error = E>,
    D: DelayNs,
{
    /// `ctrl_hum` must be written before `ctrl_meas` to take effect.
    fn write_config(&mut self, mode: SensorMode) -> Result<(), Bme280Error<E>> {
        let config = self.config.config_reg();
        let ctrl_hum = self.config.ctrl_hum();
        let ctrl_meas = self.config.ctrl_meas(mode);
        #[cfg(feature = "defmt")]
        {
            debug!("Config [{=u8:#x}]: {=u8:#b}", ConfigReg::ADDRESS, config.to_u8());
            debug!("Ctrl Hum [{=u8:#x}]: {=u8:#b}", CtrlHum::ADDRESS, ctrl_hum.to_u8());
            debug!("Ctrl Meas [{=u8:#x}]: {=u8:#b}", CtrlMeas::ADDRESS, ctrl_meas.to_u8());
        }
        config.write_register(&mut self.iface)?;
        ctrl_hum.write_register(&mut self.iface)?;
        ctrl_meas.write_register(&mut self.iface)?;
        Ok(())
    }

    fn forced_conversion(&mut self) -> Result<RawSample, Bme280Error<E>> {
        self.state = SequencerState::Triggering;
        self.write_config(self.config.sensor_mode)?;
        self.state = SequencerState::Waiting;
        self.delay.delay_ms(self.config.measurement_time_ms());
        let mut ctr = MAX_LOOPS;
        while StatusReg::read_register(&mut self.iface)?.measuring() {
            ctr -= 1;
            if ctr == 0 {
                #[cfg(feature = "defmt")]
                {
                    warn!("Forced conversion still running");
                }
                return Err(Bme280Error::NoDataAvailable);
            }
            self.delay.delay_ms(POLL_DELAY_MS);
        }
        self.read_raw()
    }
}

#[cfg(test)]
mod tests {
    use core::cell::RefCell;
    use std::rc::Rc;
    use std::vec;
    use std::vec::Vec;

    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    use super::*;
    use crate::calibration::fixtures::{registers, DATASHEET};
    use crate::DEFAULT_I2C_ADDRESS as ADDR;

    const RAW: [u8; 8] = [0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x75, 0x30];

    fn init_transactions(config: &Bme280Config) -> Vec<I2cTransaction> {
        let (a, b) = registers(&DATASHEET);
        let enc = config.encode();
        let ctrl_meas = match config.sensor_mode() {
            SensorMode::Normal => enc.ctrl_meas,
            _ => enc.ctrl_meas & !0x3,
        };
        vec![
            I2cTransaction::write_read(ADDR, vec![0xD0], vec![0x60]),
            I2cTransaction::write(ADDR, vec![0xE0, 0xB6]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x00]),
            I2cTransaction::write_read(ADDR, vec![0x88], a.to_vec()),
            I2cTransaction::write_read(ADDR, vec![0xE1], b.to_vec()),
            I2cTransaction::write(ADDR, vec![0xF5, enc.config]),
            I2cTransaction::write(ADDR, vec![0xF2, enc.ctrl_hum]),
            I2cTransaction::write(ADDR, vec![0xF4, ctrl_meas]),
        ]
    }

    #[test]
    fn init_normal_mode() {
        let config = Bme280Config::default();
        let expectations = init_transactions(&config);
        let mut i2c = I2cMock::new(&expectations);
        let mut bme = Bme280::new_with_i2c(i2c.clone(), ADDR, config, NoopDelay::new());
        bme.init().unwrap();
        assert_eq!(bme.state(), SequencerState::Sampling);
        assert_eq!(bme.calibration().unwrap().get(crate::Coefficient::T1), 27504);
        i2c.done();
    }

    #[test]
    fn init_rejects_wrong_chip() {
        let expectations = [I2cTransaction::write_read(ADDR, vec![0xD0], vec![0x58])];
        let mut i2c = I2cMock::new(&expectations);
        let mut bme =
            Bme280::new_with_i2c(i2c.clone(), ADDR, Bme280Config::default(), NoopDelay::new());
        assert!(matches!(bme.init(), Err(Bme280Error::InvalidDevice)));
        assert!(bme.calibration().is_none());
        i2c.done();
    }

    #[test]
    fn reset_waits_for_nvm_copy() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0xE0, 0xB6]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x01]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x01]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x00]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut bme =
            Bme280::new_with_i2c(i2c.clone(), ADDR, Bme280Config::default(), NoopDelay::new());
        bme.reset().unwrap();
        i2c.done();
    }

    #[test]
    fn measure_before_calibration_touches_nothing() {
        let mut i2c = I2cMock::new(&[]);
        let mut bme =
            Bme280::new_with_i2c(i2c.clone(), ADDR, Bme280Config::forced(), NoopDelay::new());
        assert!(matches!(
            bme.measure(),
            Err(Bme280Error::CalibrationNotLoaded)
        ));
        assert_eq!(bme.state(), SequencerState::Idle);
        i2c.done();
    }

    #[test]
    fn normal_mode_measure_reads_burst() {
        let config = Bme280Config::default();
        let mut expectations = init_transactions(&config);
        expectations.push(I2cTransaction::write_read(ADDR, vec![0xF7], RAW.to_vec()));
        let mut i2c = I2cMock::new(&expectations);
        let mut bme = Bme280::new_with_i2c(i2c.clone(), ADDR, config, NoopDelay::new());
        bme.init().unwrap();
        let meas = bme.measure().unwrap();
        assert_eq!(meas.t_fine, 128422);
        assert_eq!(meas.temperature, 2508);
        assert_eq!(bme.state(), SequencerState::Sampling);
        i2c.done();
    }

    #[test]
    fn normal_mode_requires_configuration() {
        let (a, b) = registers(&DATASHEET);
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0x88], a.to_vec()),
            I2cTransaction::write_read(ADDR, vec![0xE1], b.to_vec()),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut bme =
            Bme280::new_with_i2c(i2c.clone(), ADDR, Bme280Config::default(), NoopDelay::new());
        bme.load_calibration().unwrap();
        assert!(matches!(bme.measure(), Err(Bme280Error::NotReady)));
        i2c.done();
    }

    #[test]
    fn failed_calibration_read_stores_nothing() {
        let (a, b) = registers(&DATASHEET);
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0x88], a.to_vec()),
            I2cTransaction::write_read(ADDR, vec![0xE1], b.to_vec()).with_error(ErrorKind::Other),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut bme =
            Bme280::new_with_i2c(i2c.clone(), ADDR, Bme280Config::forced(), NoopDelay::new());
        assert!(matches!(
            bme.load_calibration(),
            Err(Bme280Error::Comm(ErrorKind::Other))
        ));
        assert!(bme.calibration().is_none());
        assert!(matches!(
            bme.measure(),
            Err(Bme280Error::CalibrationNotLoaded)
        ));
        i2c.done();
    }

    #[test]
    fn alternate_forced_encoding_triggers_with_its_own_bits() {
        let config = Bme280Config::from_selectors(1, 1, 1, 5, 0, 2);
        let mut expectations = init_transactions(&config);
        expectations.extend_from_slice(&[
            I2cTransaction::write(ADDR, vec![0xF5, 0xA0]),
            I2cTransaction::write(ADDR, vec![0xF2, 0x01]),
            I2cTransaction::write(ADDR, vec![0xF4, 0x26]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x00]),
            I2cTransaction::write_read(ADDR, vec![0xF7], RAW.to_vec()),
        ]);
        let mut i2c = I2cMock::new(&expectations);
        let mut bme = Bme280::new_with_i2c(i2c.clone(), ADDR, config, NoopDelay::new());
        bme.init().unwrap();
        assert_eq!(bme.state(), SequencerState::Idle);
        assert_eq!(bme.measure().unwrap().temperature, 2508);
        assert_eq!(bme.state(), SequencerState::Idle);
        i2c.done();
    }

    #[test]
    fn forced_cycle_rewrites_config_then_reads() {
        let config = Bme280Config::forced();
        let mut expectations = init_transactions(&config);
        expectations.extend_from_slice(&[
            I2cTransaction::write(ADDR, vec![0xF5, 0xA0]),
            I2cTransaction::write(ADDR, vec![0xF2, 0x01]),
            I2cTransaction::write(ADDR, vec![0xF4, 0x25]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x08]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x00]),
            I2cTransaction::write_read(ADDR, vec![0xF7], RAW.to_vec()),
        ]);
        let mut i2c = I2cMock::new(&expectations);
        let mut bme = Bme280::new_with_i2c(i2c.clone(), ADDR, config, NoopDelay::new());
        bme.init().unwrap();
        assert_eq!(bme.state(), SequencerState::Idle);
        let meas = bme.measure().unwrap();
        assert_eq!(meas.temperature, 2508);
        assert!((meas.humidity - 55.000_712_8).abs() < 1e-6);
        assert_eq!(bme.state(), SequencerState::Idle);
        i2c.done();
    }

    #[test]
    fn bus_error_ends_the_cycle() {
        let config = Bme280Config::forced();
        let mut expectations = init_transactions(&config);
        expectations.extend_from_slice(&[
            I2cTransaction::write(ADDR, vec![0xF5, 0xA0]),
            I2cTransaction::write(ADDR, vec![0xF2, 0x01]).with_error(ErrorKind::Other),
            // next cycle starts from scratch
            I2cTransaction::write(ADDR, vec![0xF5, 0xA0]),
            I2cTransaction::write(ADDR, vec![0xF2, 0x01]),
            I2cTransaction::write(ADDR, vec![0xF4, 0x25]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x00]),
            I2cTransaction::write_read(ADDR, vec![0xF7], RAW.to_vec()),
        ]);
        let mut i2c = I2cMock::new(&expectations);
        let mut bme = Bme280::new_with_i2c(i2c.clone(), ADDR, config, NoopDelay::new());
        bme.init().unwrap();
        assert!(matches!(
            bme.measure(),
            Err(Bme280Error::Comm(ErrorKind::Other))
        ));
        assert_eq!(bme.state(), SequencerState::Idle);
        assert_eq!(bme.measure().unwrap().temperature, 2508);
        i2c.done();
    }

    #[test]
    fn normal_mode_read_error_keeps_sampling() {
        let config = Bme280Config::default();
        let mut expectations = init_transactions(&config);
        expectations.extend_from_slice(&[
            I2cTransaction::write_read(ADDR, vec![0xF7], RAW.to_vec()).with_error(ErrorKind::Other),
            I2cTransaction::write_read(ADDR, vec![0xF7], RAW.to_vec()),
        ]);
        let mut i2c = I2cMock::new(&expectations);
        let mut bme = Bme280::new_with_i2c(i2c.clone(), ADDR, config, NoopDelay::new());
        bme.init().unwrap();
        assert!(bme.measure().is_err());
        assert_eq!(bme.state(), SequencerState::Sampling);
        assert!(bme.measure().is_ok());
        i2c.done();
    }

    #[test]
    fn reconfigure_from_normal_sleeps_first() {
        let config = Bme280Config::default();
        let mut expectations = init_transactions(&config);
        expectations.extend_from_slice(&[
            I2cTransaction::write(ADDR, vec![0xF4, 0x24]),
            I2cTransaction::write(ADDR, vec![0xF5, 0xA0]),
            I2cTransaction::write(ADDR, vec![0xF2, 0x01]),
            I2cTransaction::write(ADDR, vec![0xF4, 0x24]),
            I2cTransaction::write(ADDR, vec![0xF4, 0x24]),
        ]);
        let mut i2c = I2cMock::new(&expectations);
        let mut bme = Bme280::new_with_i2c(i2c.clone(), ADDR, config, NoopDelay::new());
        bme.init().unwrap();
        bme.set_config(Bme280Config::forced()).unwrap();
        assert_eq!(bme.state(), SequencerState::Idle);
        bme.stop().unwrap();
        i2c.done();
    }

    #[test]
    fn spi_reads_set_the_direction_bit() {
        let expectations = [
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0xF7 | 0x80]),
            SpiTransaction::read_vec(RAW.to_vec()),
            SpiTransaction::transaction_end(),
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0xF4 & 0x7F, 0x24]),
            SpiTransaction::transaction_end(),
        ];
        let mut spi = SpiMock::new(&expectations);
        let mut bme = Bme280::new_with_spi(spi.clone(), Bme280Config::forced(), NoopDelay::new());
        let raw = bme.read_raw().unwrap();
        assert_eq!(raw.pressure, 415148);
        bme.stop().unwrap();
        spi.done();
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Write(u8, u8),
        Read(u8, u64),
        Delay(u64),
    }

    /// Bus and delay sharing a virtual clock. The result registers only hold
    /// a finished conversion once the conversion time has elapsed.
    #[derive(Default)]
    struct Sim {
        now_us: u64,
        ready_at_us: Option<u64>,
        conversion_us: u64,
        log: Vec<Event>,
    }

    struct SimBus(Rc<RefCell<Sim>>);
    struct SimDelay(Rc<RefCell<Sim>>);

    impl ErrorType for SimBus {
        type Error = ErrorKind;
    }

    impl i2c::I2c for SimBus {
        fn transaction(
            &mut self,
            _address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            let mut sim = self.0.borrow_mut();
            let mut reg = 0u8;
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(bytes) => {
                        reg = bytes[0];
                        if bytes.len() == 2 {
                            sim.log.push(Event::Write(bytes[0], bytes[1]));
                            if reg == 0xF4 && bytes[1] & 0x3 == 0x1 {
                                sim.ready_at_us = Some(sim.now_us + sim.conversion_us);
                            }
                        }
                    }
                    Operation::Read(buf) => {
                        let now = sim.now_us;
                        sim.log.push(Event::Read(reg, now));
                        let done = sim.ready_at_us.is_some_and(|t| now >= t);
                        match reg {
                            0xF3 => buf[0] = if done { 0x00 } else { 0x08 },
                            0xF7 if done => buf.copy_from_slice(&RAW),
                            0xF7 => return Err(ErrorKind::Other),
                            _ => buf.fill(0),
                        }
                    }
                }
            }
            Ok(())
        }
    }

    impl DelayNs for SimDelay {
        fn delay_ns(&mut self, ns: u32) {
            let mut sim = self.0.borrow_mut();
            sim.now_us += (ns as u64).div_ceil(1000);
            let now = sim.now_us;
            sim.log.push(Event::Delay(now));
        }
    }

    #[test]
    fn forced_read_waits_for_conversion_time() {
        let config = Bme280Config::forced()
            .with_temperature_oversampling(crate::Oversampling::X2)
            .with_pressure_oversampling(crate::Oversampling::X16);
        let wait_ms = config.measurement_time_ms() as u64;
        // the device is never slower than the computed worst case
        let sim = Rc::new(RefCell::new(Sim {
            conversion_us: wait_ms * 1000 - 100,
            ..Default::default()
        }));
        let mut bme = Bme280::new_with_i2c(
            SimBus(sim.clone()),
            ADDR,
            config,
            SimDelay(sim.clone()),
        );
        let (a, b) = registers(&DATASHEET);
        bme.calibration = Some(CalibrationCoefficients::from_block(
            &CalibrationBlock::from_registers(&a, &b),
        ));
        for _ in 0..3 {
            sim.borrow_mut().log.clear();
            let start = sim.borrow().now_us;
            let meas = bme.measure().unwrap();
            assert_eq!(meas.temperature, 2508);
            let sim = sim.borrow();
            let trigger = sim
                .log
                .iter()
                .position(|e| matches!(e, Event::Write(0xF4, v) if v & 0x3 == 1))
                .unwrap();
            let data_read = sim
                .log
                .iter()
                .position(|e| matches!(e, Event::Read(0xF7, _)))
                .unwrap();
            assert!(trigger < data_read);
            match sim.log[data_read] {
                Event::Read(_, at) => assert!(at >= start + wait_ms * 1000),
                _ => unreachable!(),
            }
            assert_eq!(
                sim.log.iter().filter(|e| matches!(e, Event::Read(0xF7, _))).count(),
                1
            );
        }
    }

    #[test]
    fn slow_conversion_is_polled() {
        let config = Bme280Config::forced();
        let wait_ms = config.measurement_time_ms() as u64;
        let sim = Rc::new(RefCell::new(Sim {
            conversion_us: wait_ms * 1000 + 2500,
            ..Default::default()
        }));
        let mut bme =
            Bme280::new_with_i2c(SimBus(sim.clone()), ADDR, config, SimDelay(sim.clone()));
        let (a, b) = registers(&DATASHEET);
        bme.calibration = Some(CalibrationCoefficients::from_block(
            &CalibrationBlock::from_registers(&a, &b),
        ));
        bme.measure().unwrap();
        let sim = sim.borrow();
        let status_polls = sim
            .log
            .iter()
            .filter(|e| matches!(e, Event::Read(0xF3, _)))
            .count();
        assert_eq!(status_polls, 4);
    }
}
