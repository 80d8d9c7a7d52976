//! Periodic lux reading example
//!
//! This example demonstrates how to:
//! - Initialize the TSL2561 sensor and identify the package
//! - Configure gain and integration time
//! - Read the visible and infrared channels
//! - Calculate lux
//!
//! Usage: `read_lux [short|medium|long] [1x|16x]`

use tsl2561::{Gain, IntegrationTime, Tsl2561};

// This example uses linux-embedded-hal for demonstration
// Replace with your platform's I2C implementation
use linux_embedded_hal::{Delay, I2cdev};

use embedded_hal::delay::DelayNs;

fn parse_args() -> Result<(IntegrationTime, Gain), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let integration = match args.next().as_deref() {
        None | Some("long") => IntegrationTime::Long,
        Some("medium") => IntegrationTime::Medium,
        Some("short") => IntegrationTime::Short,
        Some(other) => return Err(format!("unknown integration time {other}").into()),
    };
    let gain = match args.next().as_deref() {
        None | Some("1x") => Gain::X1,
        Some("16x") => Gain::X16,
        Some(other) => return Err(format!("unknown gain {other}").into()),
    };
    Ok((integration, gain))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let (integration, gain) = parse_args()?;

    // Initialize I2C interface
    let i2c = I2cdev::new("/dev/i2c-1")?;
    let mut delay = Delay;

    let mut sensor = Tsl2561::new(i2c, Delay);

    println!("Initializing TSL2561 sensor...");
    let device_type = sensor.init().map_err(|e| format!("{e}"))?;
    let id = sensor.device_id().map_err(|e| format!("{e}"))?;
    println!("Device: {device_type:?}, revision {}", id.revision);

    sensor
        .set_timing(integration, gain)
        .map_err(|e| format!("{e}"))?;
    println!("Integration {integration:?}, gain {gain:?}. Press Ctrl+C to exit\n");

    loop {
        match sensor.read() {
            Ok(reading) => {
                let lux = sensor.compute_lux(reading.visible, reading.infrared);
                println!(
                    "Visible: {:6} IR: {:6} | Lux: {:6}",
                    reading.visible, reading.infrared, lux
                );
            }
            Err(e) => {
                println!("Read failed: {e}");
                // the device may still be powered; the next read powers it down
            }
        }

        delay.delay_ms(1000);
    }
}
