//! Beta-model thermistor conversion.
//!
//! The thermistor is the low side of a divider, so
//! `R = Rs · Vout / (Vref − Vout)` and calibration inverts it as
//! `Rs = R · (Vref − Vout) / Vout`. Temperature follows
//! `T = Beta / (ln(R / R_nominal) + Beta / T_nominal)`.
//!
//! Math is done in `f64`; only the stored reference is `f32`.

use super::SensorFault;
use crate::config::{ThermistorParams, KELVIN_OFFSET};

/// Conversion between raw ADC averages, resistance and temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermistorModel {
    params: ThermistorParams,
}

impl ThermistorModel {
    pub fn new(params: ThermistorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ThermistorParams {
        &self.params
    }

    /// Divider output voltage for a raw average.
    pub fn voltage(&self, raw: f32) -> f64 {
        raw as f64 / self.params.max_raw as f64 * self.params.vref
    }

    /// Thermistor resistance for a raw average and series reference.
    ///
    /// A raw value at full scale puts the whole supply across the thermistor
    /// and would divide by zero; it is reported as [`SensorFault::Saturated`].
    pub fn resistance(&self, raw: f32, reference: f32) -> Result<f64, SensorFault> {
        if raw >= self.params.max_raw as f32 {
            return Err(SensorFault::Saturated);
        }
        let v_out = self.voltage(raw);
        let resistance = reference as f64 * v_out / (self.params.vref - v_out);
        if !resistance.is_finite() || resistance <= 0.0 {
            return Err(SensorFault::OutOfModel);
        }
        Ok(resistance)
    }

    /// Temperature in °C.
    pub fn to_temperature(&self, raw: f32, reference: f32) -> Result<f32, SensorFault> {
        let resistance = self.resistance(raw, reference)?;
        let p = &self.params;
        let kelvin = p.beta / ((resistance / p.nominal_resistance).ln() + p.beta / p.nominal_kelvin);
        let celsius = kelvin - KELVIN_OFFSET;
        if !celsius.is_finite() || kelvin <= 0.0 {
            return Err(SensorFault::OutOfModel);
        }
        Ok(celsius as f32)
    }

    /// Model resistance of the thermistor at `celsius`.
    pub fn resistance_at(&self, celsius: f64) -> f64 {
        let p = &self.params;
        let kelvin = celsius + KELVIN_OFFSET;
        p.nominal_resistance * (p.beta / kelvin - p.beta / p.nominal_kelvin).exp()
    }

    /// Series reference that makes `raw` read as `celsius`.
    pub fn reference_for(&self, raw: f32, celsius: f64) -> Result<f32, SensorFault> {
        if raw >= self.params.max_raw as f32 {
            return Err(SensorFault::Saturated);
        }
        let v_out = self.voltage(raw);
        if v_out <= 0.0 {
            return Err(SensorFault::OutOfModel);
        }
        let reference = self.resistance_at(celsius) * (self.params.vref - v_out) / v_out;
        if !reference.is_finite() || reference <= 0.0 {
            return Err(SensorFault::OutOfModel);
        }
        Ok(reference as f32)
    }

    /// Raw average the model predicts at `celsius` (inverse of
    /// [`to_temperature`](Self::to_temperature)).
    pub fn raw_for(&self, celsius: f64, reference: f32) -> f32 {
        let r = self.resistance_at(celsius);
        (self.params.max_raw as f64 * r / (reference as f64 + r)) as f32
    }
}

impl Default for ThermistorModel {
    fn default() -> Self {
        Self::new(ThermistorParams::default())
    }
}
