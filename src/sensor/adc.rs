//! ESP-IDF oneshot ADC driver.
//!
//! The thermistor divider is wired to ADC1 channel 0 (GPIO36) with 12 dB
//! attenuation and 12-bit width.

use super::{AdcSource, SensorFault};
use esp_idf_hal::adc::attenuation::DB_12;
use esp_idf_hal::adc::oneshot::config::AdcChannelConfig;
use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_hal::adc::ADC1;
use esp_idf_hal::gpio::Gpio36;
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_sys::EspError;

/// Single-channel oneshot reader.
pub struct OneshotAdc<'d> {
    channel: AdcChannelDriver<'d, Gpio36, AdcDriver<'d, ADC1>>,
}

impl<'d> OneshotAdc<'d> {
    pub fn new(
        adc: impl Peripheral<P = ADC1> + 'd,
        pin: impl Peripheral<P = Gpio36> + 'd,
    ) -> Result<Self, EspError> {
        let driver = AdcDriver::new(adc)?;
        let config = AdcChannelConfig {
            attenuation: DB_12,
            ..Default::default()
        };
        let channel = AdcChannelDriver::new(driver, pin, &config)?;
        Ok(Self { channel })
    }
}

impl AdcSource for OneshotAdc<'_> {
    fn read_raw(&mut self) -> Result<u16, SensorFault> {
        self.channel
            .read_raw()
            .map_err(|e| SensorFault::Read(format!("{:?}", e)))
    }
}
