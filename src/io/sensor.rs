//! Doorway sensor input
//!
//! Two digital lines at the doorway, one per side, read through the
//! Raspberry Pi GPIO header. Both pins are pulled to a defined idle level
//! when claimed; active-low wiring is inverted at read time so callers only
//! ever see "active". Reads are instantaneous levels with no buffering: a
//! pulse shorter than the poll interval can be missed.

use crate::domain::types::SensorLevels;
use crate::infra::config::Config;
use anyhow::Context;
use rppal::gpio::{Gpio, InputPin};
use tracing::info;

/// Pin assignment and polarity for the two lines
#[derive(Debug, Clone, Copy)]
pub struct SensorPins {
    pub entry_pin: u8,
    pub exit_pin: u8,
    pub active_low: bool,
}

impl SensorPins {
    pub fn from_config(config: &Config) -> Self {
        Self {
            entry_pin: config.entry_pin(),
            exit_pin: config.exit_pin(),
            active_low: config.sensor_active_low(),
        }
    }
}

/// A source of instantaneous doorway line levels
///
/// The polling loop owns its source exclusively for the lifetime of one
/// monitoring run; dropping it releases the underlying hardware.
pub trait SensorSource: Send {
    /// Read the current level of both lines. Non-blocking.
    fn poll(&mut self) -> anyhow::Result<SensorLevels>;
}

/// Builds a fresh sensor source each time monitoring starts
pub type SensorFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn SensorSource>> + Send + Sync>;

/// GPIO-backed sensor source
pub struct GpioSensorSource {
    entry: InputPin,
    exit: InputPin,
    active_low: bool,
}

impl GpioSensorSource {
    /// Claim both pins as pulled-down inputs
    pub fn open(pins: SensorPins) -> anyhow::Result<Self> {
        let gpio = Gpio::new().context("failed to open GPIO controller")?;
        let entry = gpio
            .get(pins.entry_pin)
            .with_context(|| format!("failed to claim entry pin {}", pins.entry_pin))?
            .into_input_pulldown();
        let exit = gpio
            .get(pins.exit_pin)
            .with_context(|| format!("failed to claim exit pin {}", pins.exit_pin))?
            .into_input_pulldown();

        info!(
            entry_pin = %pins.entry_pin,
            exit_pin = %pins.exit_pin,
            active_low = %pins.active_low,
            "sensor_lines_claimed"
        );

        Ok(Self { entry, exit, active_low: pins.active_low })
    }

    #[inline]
    fn level_active(&self, high: bool) -> bool {
        if self.active_low {
            !high
        } else {
            high
        }
    }
}

impl SensorSource for GpioSensorSource {
    fn poll(&mut self) -> anyhow::Result<SensorLevels> {
        Ok(SensorLevels {
            entry_active: self.level_active(self.entry.is_high()),
            exit_active: self.level_active(self.exit.is_high()),
        })
    }
}

/// Factory claiming the configured GPIO pins on each monitor start
pub fn gpio_factory(config: &Config) -> SensorFactory {
    let pins = SensorPins::from_config(config);
    Box::new(move || {
        let source = GpioSensorSource::open(pins)?;
        Ok(Box::new(source) as Box<dyn SensorSource>)
    })
}
