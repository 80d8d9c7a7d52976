//! Low-level register map and bus interface for the TSL2561
//!
//! The device speaks an SMBus-compatible protocol: every transaction starts
//! with a command byte made of a register address and protocol flags. The
//! register block in `device.yaml` is addressed by those command bytes, and
//! [`DeviceInterface`] maps its 8-bit and 16-bit accesses onto the byte and
//! word transactions of an [`SmbusInterface`].

use embedded_hal::i2c::I2c;

/// I2C address with the ADDR SEL pin tied to ground
pub const ADDRESS_GND: u8 = 0x29;
/// I2C address with the ADDR SEL pin floating
pub const ADDRESS_FLOAT: u8 = 0x39;
/// I2C address with the ADDR SEL pin tied to VDD
pub const ADDRESS_VDD: u8 = 0x49;
/// Address used by [`crate::Tsl2561::new`]
pub const DEFAULT_ADDRESS: u8 = ADDRESS_FLOAT;

// Allow missing docs for generated device code
#[allow(missing_docs)]
mod device_generated {
    device_driver::create_device!(
        device_name: Device,
        manifest: "device.yaml"
    );
}
pub use device_generated::*;

/// A transport bound to a single device address
pub trait DeviceAddress {
    /// 7-bit address of the device, used for logging
    fn address(&self) -> u8;
}

/// Blocking SMBus-style transport bound to a single device address
pub trait SmbusInterface: DeviceAddress {
    /// Error reported by the underlying bus
    type Error;

    /// Write one data byte after `command`
    fn write_byte(&mut self, command: u8, data: u8) -> Result<(), Self::Error>;

    /// Read one data byte after `command`
    fn read_byte(&mut self, command: u8) -> Result<u8, Self::Error>;

    /// Read two bytes after `command`, assembled little-endian
    fn read_word(&mut self, command: u8) -> Result<u16, Self::Error>;
}

/// Async SMBus-style transport bound to a single device address
#[cfg(feature = "async")]
#[allow(async_fn_in_trait)]
pub trait AsyncSmbusInterface: DeviceAddress {
    /// Error reported by the underlying bus
    type Error;

    /// Write one data byte after `command`
    async fn write_byte_async(&mut self, command: u8, data: u8) -> Result<(), Self::Error>;

    /// Read one data byte after `command`
    async fn read_byte_async(&mut self, command: u8) -> Result<u8, Self::Error>;

    /// Read two bytes after `command`, assembled little-endian
    async fn read_word_async(&mut self, command: u8) -> Result<u16, Self::Error>;
}

/// [`SmbusInterface`] over an `embedded-hal` I2C bus
#[derive(Debug)]
pub struct I2cInterface<I2C> {
    /// The I2C interface
    pub i2c: I2C,
    address: u8,
}

impl<I2C> I2cInterface<I2C> {
    /// Bind `i2c` to the device at `address`
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Give back the I2C bus
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C> DeviceAddress for I2cInterface<I2C> {
    fn address(&self) -> u8 {
        self.address
    }
}

impl<I2cTrait: I2c> SmbusInterface for I2cInterface<I2cTrait> {
    type Error = I2cTrait::Error;

    fn write_byte(&mut self, command: u8, data: u8) -> Result<(), Self::Error> {
        self.i2c.write(self.address, &[command, data])
    }

    fn read_byte(&mut self, command: u8) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        self.i2c.write_read(self.address, &[command], &mut buf)?;
        Ok(buf[0])
    }

    fn read_word(&mut self, command: u8) -> Result<u16, Self::Error> {
        let mut buf = [0u8; 2];
        self.i2c.write_read(self.address, &[command], &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }
}

#[cfg(feature = "async")]
impl<I2cTrait: embedded_hal_async::i2c::I2c> AsyncSmbusInterface for I2cInterface<I2cTrait> {
    type Error = I2cTrait::Error;

    async fn write_byte_async(&mut self, command: u8, data: u8) -> Result<(), Self::Error> {
        self.i2c.write(self.address, &[command, data]).await
    }

    async fn read_byte_async(&mut self, command: u8) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[command], &mut buf)
            .await?;
        Ok(buf[0])
    }

    async fn read_word_async(&mut self, command: u8) -> Result<u16, Self::Error> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[command], &mut buf)
            .await?;
        Ok(u16::from_le_bytes(buf))
    }
}

impl<T: DeviceAddress + ?Sized> DeviceAddress for &mut T {
    fn address(&self) -> u8 {
        (**self).address()
    }
}

impl<T: SmbusInterface + ?Sized> SmbusInterface for &mut T {
    type Error = T::Error;

    fn write_byte(&mut self, command: u8, data: u8) -> Result<(), Self::Error> {
        (**self).write_byte(command, data)
    }

    fn read_byte(&mut self, command: u8) -> Result<u8, Self::Error> {
        (**self).read_byte(command)
    }

    fn read_word(&mut self, command: u8) -> Result<u16, Self::Error> {
        (**self).read_word(command)
    }
}

#[cfg(feature = "async")]
impl<T: AsyncSmbusInterface + ?Sized> AsyncSmbusInterface for &mut T {
    type Error = T::Error;

    async fn write_byte_async(&mut self, command: u8, data: u8) -> Result<(), Self::Error> {
        (**self).write_byte_async(command, data).await
    }

    async fn read_byte_async(&mut self, command: u8) -> Result<u8, Self::Error> {
        (**self).read_byte_async(command).await
    }

    async fn read_word_async(&mut self, command: u8) -> Result<u16, Self::Error> {
        (**self).read_word_async(command).await
    }
}

/// Register interface for the generated [`Device`], on top of an SMBus transport
///
/// 16-bit registers use the word protocol, everything else the byte protocol.
/// Only the 8-bit control and timing registers are writable.
#[derive(Debug)]
pub struct DeviceInterface<B> {
    /// The SMBus transport
    pub bus: B,
}

impl<B> DeviceInterface<B> {
    /// Wrap an SMBus transport
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<B: SmbusInterface> device_driver::RegisterInterface for DeviceInterface<B> {
    type AddressType = u8;
    type Error = B::Error;

    fn read_register(
        &mut self,
        address: Self::AddressType,
        _size_bits: u32,
        data: &mut [u8],
    ) -> Result<(), Self::Error> {
        match data {
            [low, high] => {
                [*low, *high] = self.bus.read_word(address)?.to_le_bytes();
            }
            [byte, ..] => *byte = self.bus.read_byte(address)?,
            [] => {}
        }
        Ok(())
    }

    fn write_register(
        &mut self,
        address: Self::AddressType,
        _size_bits: u32,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        match data.first() {
            Some(&byte) => self.bus.write_byte(address, byte),
            None => Ok(()),
        }
    }
}

#[cfg(feature = "async")]
impl<B: AsyncSmbusInterface> device_driver::AsyncRegisterInterface for DeviceInterface<B> {
    type AddressType = u8;
    type Error = B::Error;

    async fn read_register(
        &mut self,
        address: Self::AddressType,
        _size_bits: u32,
        data: &mut [u8],
    ) -> Result<(), Self::Error> {
        match data {
            [low, high] => {
                [*low, *high] = self.bus.read_word_async(address).await?.to_le_bytes();
            }
            [byte, ..] => *byte = self.bus.read_byte_async(address).await?,
            [] => {}
        }
        Ok(())
    }

    async fn write_register(
        &mut self,
        address: Self::AddressType,
        _size_bits: u32,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        match data.first() {
            Some(&byte) => self.bus.write_byte_async(address, byte).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    extern crate std;
    use std::vec;

    #[test]
    fn test_register_command_bytes() {
        let expectations = [
            I2cTransaction::write(ADDRESS_FLOAT, vec![0x80, 0x03]),
            I2cTransaction::write(ADDRESS_FLOAT, vec![0x81, 0x11]),
            I2cTransaction::write_read(ADDRESS_FLOAT, vec![0x8A], vec![0x52]),
            I2cTransaction::write_read(ADDRESS_FLOAT, vec![0xAC], vec![0x34, 0x12]),
            I2cTransaction::write_read(ADDRESS_FLOAT, vec![0xAE], vec![0xCD, 0xAB]),
        ];
        let mut bus = I2cInterface::new(I2cMock::new(&expectations), ADDRESS_FLOAT);
        let mut device = Device::new(DeviceInterface::new(&mut bus));

        device
            .control()
            .write(|reg| reg.set_power(crate::PowerState::On))
            .unwrap();
        device
            .timing()
            .write(|reg| {
                reg.set_integ(crate::IntegrationTime::Medium);
                reg.set_gain(crate::Gain::X16);
            })
            .unwrap();

        let id = device.id().read().unwrap();
        assert_eq!(id.part_number(), 0x5);
        assert_eq!(id.revision(), 0x2);
        assert_eq!(device.broadband_data().read().unwrap().count(), 0x1234);
        assert_eq!(device.infrared_data().read().unwrap().count(), 0xABCD);

        bus.release().done();
    }

    #[test]
    fn test_register_bus_error_is_passed_through() {
        let expectations = [
            I2cTransaction::write_read(ADDRESS_FLOAT, vec![0xAC], vec![0x00, 0x00])
                .with_error(ErrorKind::Other),
        ];
        let mut bus = I2cInterface::new(I2cMock::new(&expectations), ADDRESS_FLOAT);
        let mut device = Device::new(DeviceInterface::new(&mut bus));

        assert!(matches!(
            device.broadband_data().read(),
            Err(ErrorKind::Other)
        ));

        bus.release().done();
    }

    #[test]
    fn test_word_read_is_little_endian() {
        let expectations = [I2cTransaction::write_read(
            ADDRESS_FLOAT,
            vec![0xAC],
            vec![0x34, 0x12],
        )];
        let mut bus = I2cInterface::new(I2cMock::new(&expectations), ADDRESS_FLOAT);

        assert_eq!(bus.read_word(0xAC).unwrap(), 0x1234);

        bus.release().done();
    }

    #[test]
    fn test_byte_transactions_use_bound_address() {
        let expectations = [
            I2cTransaction::write(ADDRESS_VDD, vec![0x80, 0x03]),
            I2cTransaction::write_read(ADDRESS_VDD, vec![0x8A], vec![0x50]),
        ];
        let mut bus = I2cInterface::new(I2cMock::new(&expectations), ADDRESS_VDD);

        bus.write_byte(0x80, 0x03).unwrap();
        assert_eq!(bus.read_byte(0x8A).unwrap(), 0x50);
        assert_eq!(bus.address(), ADDRESS_VDD);

        bus.release().done();
    }
}
