//! Simulated thermistor for host runs.

use super::{AdcSource, SensorFault, ThermistorModel};
use rand_core::{OsRng, RngCore};

/// Produces the raw readings a real divider would at a fixed temperature,
/// with a little ADC noise.
pub struct SimulatedAdc {
    center: f32,
    max_raw: u16,
    noise: u16,
}

impl SimulatedAdc {
    /// ADC reading `celsius` through `model` with the given series reference.
    pub fn at_temperature(model: &ThermistorModel, celsius: f64, reference: f32) -> Self {
        Self {
            center: model.raw_for(celsius, reference),
            max_raw: model.params().max_raw,
            noise: 2,
        }
    }

    /// Peak noise in raw counts.
    pub fn with_noise(mut self, noise: u16) -> Self {
        self.noise = noise;
        self
    }
}

impl AdcSource for SimulatedAdc {
    fn read_raw(&mut self) -> Result<u16, SensorFault> {
        let offset = if self.noise == 0 {
            0.0
        } else {
            let span = 2 * self.noise as u32 + 1;
            (OsRng.next_u32() % span) as f32 - self.noise as f32
        };
        let raw = (self.center + offset).round().clamp(0.0, self.max_raw as f32);
        Ok(raw as u16)
    }
}
