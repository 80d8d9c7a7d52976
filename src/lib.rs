//! # TSL2560/TSL2561 Light-to-Digital Converter Driver
//!
//! This is a platform-agnostic Rust driver for the TSL2560 and TSL2561 ambient light sensors,
//! built using the [`embedded-hal`] traits for I2C communication and delays.
//!
//! The TSL256x integrates light on two photodiodes and provides:
//! - A broadband channel (visible + infrared) and an infrared-only channel, 16 bits each
//! - Programmable gain (1x or 16x)
//! - Programmable integration time (13.7ms, 101ms or 402ms)
//! - An SMBus-compatible interface at address 0x29, 0x39 or 0x49
//!
//! ## Features
//!
//! - **Power management**: the ADCs are only powered for the duration of a timing change
//!   or a measurement
//! - **Blocking read cycle** that waits out the integration window
//! - **Lux calculation** using the datasheet's fixed-point, package-dependent model
//! - **Async/await support** with feature gating (optional)
//! - **Logging** through `defmt` or `log` (optional)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tsl2561::{Gain, IntegrationTime, Tsl2561};
//!
//! # fn main() {
//! # let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
//! # let delay = embedded_hal_mock::eh1::delay::NoopDelay::new();
//! let mut sensor = Tsl2561::new(i2c, delay);
//!
//! // Identify the device
//! let device_type = sensor.init().unwrap();
//!
//! // Configure measurement settings
//! sensor.set_timing(IntegrationTime::Medium, Gain::X16).unwrap();
//!
//! // Power up, wait for the integration window, read both channels, power down
//! let reading = sensor.read().unwrap();
//!
//! let lux = sensor.compute_lux(reading.visible, reading.infrared);
//! # let _ = (device_type, lux);
//! # }
//! ```
//!
//! ## Async Usage
//!
//! Enable the `async` feature to use async/await patterns:
//!
//! ```toml
//! [dependencies]
//! tsl2561 = { version = "0.1", features = ["async"] }
//! ```
//!
//! ```rust,ignore
//! use tsl2561::{Gain, IntegrationTime, Tsl2561};
//!
//! let mut sensor = Tsl2561::new(i2c, delay);
//! sensor.init_async().await?;
//! sensor.set_timing_async(IntegrationTime::Short, Gain::X1).await?;
//! let lux = sensor.read_lux_async().await?;
//! ```
//!
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal

#![no_std]
#![deny(missing_docs)]

#[macro_use]
mod fmt;

pub mod ll;
pub mod lux;

use core::fmt::{Debug, Display, Formatter};

use embedded_hal::delay::DelayNs;

#[cfg(feature = "async")]
use embedded_hal_async::delay::DelayNs as AsyncDelayNs;

use ll::{Device, DeviceInterface};

#[cfg(feature = "async")]
pub use ll::AsyncSmbusInterface;
pub use ll::{
    DeviceAddress, I2cInterface, SmbusInterface, ADDRESS_FLOAT, ADDRESS_GND, ADDRESS_VDD,
    DEFAULT_ADDRESS,
};

/// Recognised members of the TSL256x family, from the high nibble of the ID register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum DeviceType {
    /// TSL2560CS (Chipscale)
    Tsl2560Cs = 0b0000,
    /// TSL2561CS (Chipscale)
    Tsl2561Cs = 0b0001,
    /// TSL2560T/FN/CL (TMB-6, Dual Flat No-Lead-6 or ChipLED-6)
    Tsl2560TFnCl = 0b0100,
    /// TSL2561T/FN/CL (TMB-6, Dual Flat No-Lead-6 or ChipLED-6)
    Tsl2561TFnCl = 0b0101,
    /// No supported device has been detected
    Invalid = 0b1111,
}

impl DeviceType {
    /// Decode a device type code, `None` for anything unsupported
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0b0000 => Some(DeviceType::Tsl2560Cs),
            0b0001 => Some(DeviceType::Tsl2561Cs),
            0b0100 => Some(DeviceType::Tsl2560TFnCl),
            0b0101 => Some(DeviceType::Tsl2561TFnCl),
            _ => None,
        }
    }

    /// The 4-bit device type code
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Integration time, assuming the default internal oscillator frequency of 735 kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum IntegrationTime {
    /// 13.7ms
    Short = 0x00,
    /// 101ms
    Medium = 0x01,
    /// 402ms
    Long = 0x02,
}

impl IntegrationTime {
    /// Minimum time to wait after power-up before both channels hold a complete
    /// conversion
    pub fn settle_ms(self) -> u32 {
        match self {
            IntegrationTime::Short => 15,
            IntegrationTime::Medium => 120,
            IntegrationTime::Long => 450,
        }
    }
}

impl TryFrom<u8> for IntegrationTime {
    type Error = u8;

    /// Decode the INTEG field. `0b11` selects manual integration, which is not supported.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(IntegrationTime::Short),
            0x01 => Ok(IntegrationTime::Medium),
            0x02 => Ok(IntegrationTime::Long),
            _ => Err(value),
        }
    }
}

impl From<IntegrationTime> for u8 {
    fn from(value: IntegrationTime) -> Self {
        value as u8
    }
}

/// Analog gain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Gain {
    /// 1x gain
    X1 = 0,
    /// 16x gain
    X16 = 1,
}

impl From<u8> for Gain {
    /// Decode the one-bit GAIN field
    fn from(value: u8) -> Self {
        if value & 0x01 == 0 {
            Gain::X1
        } else {
            Gain::X16
        }
    }
}

impl From<Gain> for u8 {
    fn from(value: Gain) -> Self {
        value as u8
    }
}

/// Contents of the timing register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Timing {
    /// Integration time
    pub integration: IntegrationTime,
    /// Analog gain
    pub gain: Gain,
}

impl Timing {
    /// Timing register value
    pub fn bits(self) -> u8 {
        let mut reg = ll::field_sets::Timing::new();
        self.apply(&mut reg);
        let bits: [u8; 1] = reg.into();
        bits[0]
    }

    fn apply(self, reg: &mut ll::field_sets::Timing) {
        reg.set_integ(self.integration);
        reg.set_gain(self.gain);
    }
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            integration: IntegrationTime::Long,
            gain: Gain::X1,
        }
    }
}

impl TryFrom<u8> for Timing {
    /// The rejected register value
    type Error = u8;

    /// Decode a timing register value. Manual integration (`0b11`) and any bit outside the
    /// integration and gain fields are rejected.
    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        let reg = ll::field_sets::Timing::from([bits]);
        let timing = Timing {
            integration: reg.integ().map_err(|_| bits)?,
            gain: reg.gain(),
        };
        // Reserved, manual and start bits must round-trip as zero
        if timing.bits() == bits {
            Ok(timing)
        } else {
            Err(bits)
        }
    }
}

/// Power state of the ADCs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum PowerState {
    /// Powered down, no conversions
    Off = 0b00,
    /// Powered up and integrating
    On = 0b11,
}

impl TryFrom<u8> for PowerState {
    type Error = u8;

    /// Decode the POWER field of the control register
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0b00 => Ok(PowerState::Off),
            0b11 => Ok(PowerState::On),
            _ => Err(value),
        }
    }
}

impl From<PowerState> for u8 {
    fn from(value: PowerState) -> Self {
        value as u8
    }
}

/// Contents of the ID register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct DeviceId {
    /// Decoded part number, [`DeviceType::Invalid`] for unsupported codes
    pub device_type: DeviceType,
    /// Raw 4-bit part number as read from the device
    pub code: u8,
    /// Silicon revision
    pub revision: u8,
}

impl DeviceId {
    fn from_register(reg: ll::field_sets::Id) -> Self {
        let code = reg.part_number();
        DeviceId {
            device_type: DeviceType::from_code(code).unwrap_or(DeviceType::Invalid),
            code,
            revision: reg.revision(),
        }
    }
}

/// One measurement of both channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Reading {
    /// Broadband minus infrared count, wrapping
    pub visible: u16,
    /// Infrared channel count
    pub infrared: u16,
}

impl Reading {
    /// Split raw channel data into visible and infrared parts
    pub fn from_channels(ch0: u16, ch1: u16) -> Self {
        Reading {
            visible: ch0.wrapping_sub(ch1),
            infrared: ch1,
        }
    }

    /// The broadband (visible + infrared) channel count
    pub fn broadband(&self) -> u16 {
        self.visible.wrapping_add(self.infrared)
    }
}

/// All possible errors in this crate
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error<E> {
    /// Bus communication error
    Bus(E),
    /// The driver has not been initialised
    NotInitialized,
    /// Invalid argument
    InvalidArgument(&'static str),
    /// The ID register reports a device this driver does not support
    UnsupportedDevice {
        /// High nibble of the ID register
        device_type: u8,
    },
}

impl<E: Debug> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus error: {e:?}"),
            Error::NotInitialized => f.write_str("driver not initialised"),
            Error::InvalidArgument(what) => write!(f, "invalid argument: {what}"),
            Error::UnsupportedDevice { device_type } => {
                write!(f, "unsupported device type {device_type:#x}")
            }
        }
    }
}

/// High-level TSL2561 driver
///
/// The driver owns the bus interface and delay for its lifetime; pass `&mut`
/// references to keep using them elsewhere. It is not meant to be shared between
/// concurrent callers: a read cycle spans several transactions and a sleep.
pub struct Tsl2561<B, D> {
    bus: B,
    delay: D,
    // Device state tracking
    initialized: bool,
    power: PowerState,
    device_type: DeviceType,
    timing: Timing,
}

impl<I2C, D> Tsl2561<I2cInterface<I2C>, D> {
    /// Create a new driver instance for a device at [`DEFAULT_ADDRESS`]
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::new_with_address(i2c, DEFAULT_ADDRESS, delay)
    }

    /// Create a new driver instance for a device at `address`
    pub fn new_with_address(i2c: I2C, address: u8, delay: D) -> Self {
        Self::from_interface(I2cInterface::new(i2c, address), delay)
    }

    /// Destroy the driver and return the I2C interface and delay
    pub fn destroy(self) -> (I2C, D) {
        (self.bus.release(), self.delay)
    }
}

impl<B, D> Tsl2561<B, D> {
    /// Create a new driver instance on top of any bus interface
    ///
    /// The driver starts uninitialised; call [`Tsl2561::init`] before anything else.
    pub fn from_interface(bus: B, delay: D) -> Self {
        Self {
            bus,
            delay,
            initialized: false,
            power: PowerState::Off,
            device_type: DeviceType::Invalid,
            timing: Timing::default(),
        }
    }

    /// Destroy the driver and return the bus interface and delay
    pub fn release(self) -> (B, D) {
        (self.bus, self.delay)
    }

    /// True once [`Tsl2561::init`] has read the ID register
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Detected device type, [`DeviceType::Invalid`] until a supported device is found
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// The last timing written to the device
    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// The last power state written to the device
    pub fn power_state(&self) -> PowerState {
        self.power
    }

    /// True if the ADCs are powered
    pub fn is_powered(&self) -> bool {
        self.power == PowerState::On
    }

    /// Calculate lux from a reading using the current timing and device type
    ///
    /// Never touches the bus. Returns 0 on an uninitialised driver.
    pub fn compute_lux(&self, visible: u16, infrared: u16) -> u32 {
        if !self.initialized {
            return 0;
        }
        lux::compute_lux(self.device_type, self.timing, visible, infrared)
    }

    fn ensure_initialized<E>(&self) -> Result<(), Error<E>> {
        if self.initialized {
            Ok(())
        } else {
            error!("driver is not initialised");
            Err(Error::NotInitialized)
        }
    }

    // Register block over a borrow of the transport
    fn ll(&mut self) -> Device<DeviceInterface<&mut B>> {
        Device::new(DeviceInterface::new(&mut self.bus))
    }

    fn reset_state(&mut self) {
        self.initialized = false;
        self.power = PowerState::Off;
        self.device_type = DeviceType::Invalid;
        self.timing = Timing::default();
    }
}

fn timing_from_bits<E>(bits: u8) -> Result<Timing, Error<E>> {
    Timing::try_from(bits).map_err(|bits| {
        error!("undefined timing register value {:#x}", bits);
        Error::InvalidArgument("undefined timing register value")
    })
}

impl<B: DeviceAddress, D> Tsl2561<B, D> {
    /// 7-bit I2C address of the device
    pub fn address(&self) -> u8 {
        self.bus.address()
    }

    // An unsupported device still leaves the driver initialised, with
    // `DeviceType::Invalid` selecting the T/FN/CL lux model.
    fn identify<E>(&mut self, id: DeviceId) -> Result<DeviceType, Error<E>> {
        self.initialized = true;
        if id.device_type == DeviceType::Invalid {
            error!(
                "unsupported device type {:#x} at address {:#x}",
                id.code,
                self.bus.address()
            );
            return Err(Error::UnsupportedDevice {
                device_type: id.code,
            });
        }
        info!(
            "detected {:?} revision {} at address {:#x}",
            id.device_type,
            id.revision,
            self.bus.address()
        );
        self.device_type = id.device_type;
        Ok(id.device_type)
    }
}

impl<B, E, D> Tsl2561<B, D>
where
    B: SmbusInterface<Error = E>,
{
    /// Initialise the driver and identify the device
    ///
    /// Resets the tracked state to 402ms integration, 1x gain and powered down, then reads
    /// the ID register. The device itself is not powered up.
    pub fn init(&mut self) -> Result<DeviceType, Error<E>> {
        self.reset_state();
        let id = self.read_id().inspect_err(|_| {
            error!("failed to read ID register");
        })?;
        self.identify(id)
    }

    /// Get the device type and revision
    ///
    /// Unsupported type codes are reported as [`DeviceType::Invalid`], with the raw part
    /// number kept in [`DeviceId::code`].
    pub fn device_id(&mut self) -> Result<DeviceId, Error<E>> {
        self.ensure_initialized()?;
        self.read_id()
    }

    /// Set the integration time and gain
    ///
    /// Both live in the same register. The device is powered up for the write and
    /// powered down again even when the write fails; a power-down failure is reported
    /// in preference to a successful write.
    pub fn set_timing(&mut self, integration: IntegrationTime, gain: Gain) -> Result<(), Error<E>> {
        self.ensure_initialized()?;
        self.power_up()?;

        let timing = Timing { integration, gain };
        let written = self
            .ll()
            .timing()
            .write(|reg| timing.apply(reg))
            .map_err(Error::Bus);
        if written.is_ok() {
            debug!("timing set to {:?}", timing);
            self.timing = timing;
        }

        let powered_down = self.power_down();
        powered_down.and(written)
    }

    /// Set the integration time and gain from a raw timing register value
    pub fn set_timing_bits(&mut self, bits: u8) -> Result<(), Error<E>> {
        self.ensure_initialized()?;
        let timing = timing_from_bits(bits)?;
        self.set_timing(timing.integration, timing.gain)
    }

    /// Power the ADCs up. Does nothing if they already are.
    pub fn power_up(&mut self) -> Result<(), Error<E>> {
        self.ensure_initialized()?;
        if self.power == PowerState::On {
            warn!("device already powered");
            return Ok(());
        }
        self.write_control(PowerState::On)?;
        self.power = PowerState::On;
        Ok(())
    }

    /// Power the ADCs down. Does nothing if they already are.
    pub fn power_down(&mut self) -> Result<(), Error<E>> {
        self.ensure_initialized()?;
        if self.power == PowerState::Off {
            warn!("device not powered");
            return Ok(());
        }
        self.write_control(PowerState::Off)?;
        self.power = PowerState::Off;
        Ok(())
    }

    // Helper methods for register access
    fn read_id(&mut self) -> Result<DeviceId, Error<E>> {
        let reg = self.ll().id().read().map_err(Error::Bus)?;
        Ok(DeviceId::from_register(reg))
    }

    fn write_control(&mut self, state: PowerState) -> Result<(), Error<E>> {
        trace!("control <- {:?}", state);
        self.ll()
            .control()
            .write(|reg| reg.set_power(state))
            .map_err(Error::Bus)
    }

    fn read_channels(&mut self) -> Result<(u16, u16), Error<E>> {
        let ch0 = self.ll().broadband_data().read().map_err(Error::Bus)?;
        let ch1 = self.ll().infrared_data().read().map_err(Error::Bus)?;
        Ok((ch0.count(), ch1.count()))
    }
}

impl<B, E, D> Tsl2561<B, D>
where
    B: SmbusInterface<Error = E>,
    D: DelayNs,
{
    /// Perform a complete measurement cycle
    ///
    /// Powers the device up, sleeps for the integration window, reads both channels and
    /// powers the device down. On a bus error the device is left as it is and no
    /// reading is returned.
    pub fn read(&mut self) -> Result<Reading, Error<E>> {
        self.ensure_initialized()?;
        self.power_up()?;

        self.delay.delay_ms(self.timing.integration.settle_ms());

        let (ch0, ch1) = self.read_channels()?;
        self.power_down()?;

        let reading = Reading::from_channels(ch0, ch1);
        debug!(
            "visible {}, infrared {}",
            reading.visible,
            reading.infrared
        );
        Ok(reading)
    }

    /// Perform a measurement cycle and convert it to lux
    pub fn read_lux(&mut self) -> Result<u32, Error<E>> {
        let reading = self.read()?;
        Ok(self.compute_lux(reading.visible, reading.infrared))
    }
}

#[cfg(feature = "async")]
impl<B, E, D> Tsl2561<B, D>
where
    B: AsyncSmbusInterface<Error = E>,
{
    /// Initialise the driver and identify the device (async version)
    pub async fn init_async(&mut self) -> Result<DeviceType, Error<E>> {
        self.reset_state();
        let id = self.read_id_async().await.inspect_err(|_| {
            error!("failed to read ID register");
        })?;
        self.identify(id)
    }

    /// Get the device type and revision (async version)
    pub async fn device_id_async(&mut self) -> Result<DeviceId, Error<E>> {
        self.ensure_initialized()?;
        self.read_id_async().await
    }

    /// Set the integration time and gain (async version)
    pub async fn set_timing_async(
        &mut self,
        integration: IntegrationTime,
        gain: Gain,
    ) -> Result<(), Error<E>> {
        self.ensure_initialized()?;
        self.power_up_async().await?;

        let timing = Timing { integration, gain };
        let written = self
            .ll()
            .timing()
            .write_async(|reg| timing.apply(reg))
            .await
            .map_err(Error::Bus);
        if written.is_ok() {
            debug!("timing set to {:?}", timing);
            self.timing = timing;
        }

        let powered_down = self.power_down_async().await;
        powered_down.and(written)
    }

    /// Set the integration time and gain from a raw timing register value (async version)
    pub async fn set_timing_bits_async(&mut self, bits: u8) -> Result<(), Error<E>> {
        self.ensure_initialized()?;
        let timing = timing_from_bits(bits)?;
        self.set_timing_async(timing.integration, timing.gain).await
    }

    /// Power the ADCs up (async version)
    pub async fn power_up_async(&mut self) -> Result<(), Error<E>> {
        self.ensure_initialized()?;
        if self.power == PowerState::On {
            warn!("device already powered");
            return Ok(());
        }
        self.write_control_async(PowerState::On).await?;
        self.power = PowerState::On;
        Ok(())
    }

    /// Power the ADCs down (async version)
    pub async fn power_down_async(&mut self) -> Result<(), Error<E>> {
        self.ensure_initialized()?;
        if self.power == PowerState::Off {
            warn!("device not powered");
            return Ok(());
        }
        self.write_control_async(PowerState::Off).await?;
        self.power = PowerState::Off;
        Ok(())
    }

    // Helper methods for async register access
    async fn read_id_async(&mut self) -> Result<DeviceId, Error<E>> {
        let reg = self.ll().id().read_async().await.map_err(Error::Bus)?;
        Ok(DeviceId::from_register(reg))
    }

    async fn write_control_async(&mut self, state: PowerState) -> Result<(), Error<E>> {
        trace!("control <- {:?}", state);
        self.ll()
            .control()
            .write_async(|reg| reg.set_power(state))
            .await
            .map_err(Error::Bus)
    }

    async fn read_channels_async(&mut self) -> Result<(u16, u16), Error<E>> {
        let ch0 = self
            .ll()
            .broadband_data()
            .read_async()
            .await
            .map_err(Error::Bus)?;
        let ch1 = self
            .ll()
            .infrared_data()
            .read_async()
            .await
            .map_err(Error::Bus)?;
        Ok((ch0.count(), ch1.count()))
    }
}

#[cfg(feature = "async")]
impl<B, E, D> Tsl2561<B, D>
where
    B: AsyncSmbusInterface<Error = E>,
    D: AsyncDelayNs,
{
    /// Perform a complete measurement cycle (async version)
    pub async fn read_async(&mut self) -> Result<Reading, Error<E>> {
        self.ensure_initialized()?;
        self.power_up_async().await?;

        self.delay
            .delay_ms(self.timing.integration.settle_ms())
            .await;

        let (ch0, ch1) = self.read_channels_async().await?;
        self.power_down_async().await?;

        let reading = Reading::from_channels(ch0, ch1);
        debug!(
            "visible {}, infrared {}",
            reading.visible,
            reading.infrared
        );
        Ok(reading)
    }

    /// Perform a measurement cycle and convert it to lux (async version)
    pub async fn read_lux_async(&mut self) -> Result<u32, Error<E>> {
        let reading = self.read_async().await?;
        Ok(self.compute_lux(reading.visible, reading.infrared))
    }
}
