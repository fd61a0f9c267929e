/// Marker for the bus wrappers the driver can talk through.
pub trait Interface {}

/// I2C interface for the BME280 sensor.
pub struct I2cInterface<I2C> {
    pub(crate) i2c: I2C,
    pub(crate) address: u8,
}

/// SPI interface for the BME280 sensor.
pub struct SpiInterface<SPI> {
    pub(crate) spi: SPI,
}

impl<I2C> Interface for I2cInterface<I2C> {}
impl<SPI> Interface for SpiInterface<SPI> {}

/// SPI register addresses carry the transfer direction in bit 7.
pub(crate) const SPI_READ: u8 = 0x80;
pub(crate) const SPI_WRITE_MASK: u8 = 0x7F;
