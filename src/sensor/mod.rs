//! Temperature acquisition.
//!
//! This module contains:
//! - [`AdcSource`]: one raw ADC channel
//! - [`sample_average`]: averaging with out-of-range rejection
//! - [`ThermistorModel`]: raw average to resistance to temperature
//! - [`OneshotAdc`]: ESP-IDF oneshot ADC driver (ESP32 only)
//! - [`SimulatedAdc`]: a thermistor at a fixed temperature (host)

#[cfg(feature = "esp32")]
mod adc;
mod simulated;
mod thermistor;

#[cfg(feature = "esp32")]
pub use adc::OneshotAdc;
pub use simulated::SimulatedAdc;
pub use thermistor::ThermistorModel;

use crate::platform::Delay;
use crate::watchdog::LivenessGuard;
use log::{debug, warn};
use std::fmt;

/// One physical ADC channel.
pub trait AdcSource {
    /// Take a single raw reading.
    fn read_raw(&mut self) -> Result<u16, SensorFault>;
}

/// Sensor failures. All of them abort the current measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorFault {
    /// The ADC driver returned an error.
    Read(String),
    /// Every sample was outside the valid raw range.
    AllZeroSamples,
    /// Averaged reading at full scale; the divider relation is undefined.
    Saturated,
    /// Reading maps to a non-physical resistance or temperature.
    OutOfModel,
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(msg) => write!(f, "ADC read failed: {}", msg),
            Self::AllZeroSamples => write!(f, "no valid ADC samples"),
            Self::Saturated => write!(f, "ADC saturated at full scale"),
            Self::OutOfModel => write!(f, "reading outside thermistor model"),
        }
    }
}

impl std::error::Error for SensorFault {}

/// Average `samples` raw readings taken `delay_ms` apart.
///
/// Readings above `max_raw` are discarded. A driver error aborts the whole
/// average. The guard is acknowledged before every sample.
pub fn sample_average(
    adc: &mut dyn AdcSource,
    delay: &mut dyn Delay,
    guard: &mut dyn LivenessGuard,
    samples: usize,
    delay_ms: u32,
    max_raw: u16,
) -> Result<f32, SensorFault> {
    let mut sum: u64 = 0;
    let mut valid: u32 = 0;

    for i in 0..samples {
        guard.acknowledge();
        let raw = adc.read_raw()?;
        if raw > max_raw {
            warn!("Invalid ADC reading: {}", raw);
        } else {
            sum += raw as u64;
            valid += 1;
        }
        if i + 1 < samples {
            delay.delay_ms(delay_ms);
        }
    }

    if valid == 0 {
        return Err(SensorFault::AllZeroSamples);
    }

    let average = sum as f32 / valid as f32;
    debug!("ADC average {:.1} over {}/{} samples", average, valid, samples);
    Ok(average)
}
