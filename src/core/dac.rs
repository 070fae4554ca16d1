use crate::compare_floats::clamp_between;
use thiserror::Error;

/// Linear mapping from a return temperature setpoint to the output voltage of the rig's DAC.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DacMapping {
    min_temp: f64,
    max_temp: f64,
    min_voltage: f64,
    max_voltage: f64,
    correction_factor: f64,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DacMappingError {
    #[error("DAC temperature range must be increasing and finite, got {min} to {max} deg C")]
    InvalidTemperatureRange { min: f64, max: f64 },
    #[error("DAC voltage range must be non-decreasing and finite, got {min} to {max} V")]
    InvalidVoltageRange { min: f64, max: f64 },
    #[error("DAC correction factor must be finite, got {0}")]
    InvalidCorrectionFactor(f64),
}

impl DacMapping {
    pub fn new(
        min_temp: f64,
        max_temp: f64,
        min_voltage: f64,
        max_voltage: f64,
        correction_factor: f64,
    ) -> Result<Self, DacMappingError> {
        if !(min_temp.is_finite() && max_temp.is_finite() && min_temp < max_temp) {
            return Err(DacMappingError::InvalidTemperatureRange {
                min: min_temp,
                max: max_temp,
            });
        }
        if !(min_voltage.is_finite() && max_voltage.is_finite() && min_voltage <= max_voltage) {
            return Err(DacMappingError::InvalidVoltageRange {
                min: min_voltage,
                max: max_voltage,
            });
        }
        if !correction_factor.is_finite() {
            return Err(DacMappingError::InvalidCorrectionFactor(correction_factor));
        }

        Ok(Self {
            min_temp,
            max_temp,
            min_voltage,
            max_voltage,
            correction_factor,
        })
    }

    /// Voltage (V) for a temperature (deg C): linear over the temperature range, scaled by the
    /// correction factor, then clamped to the voltage range.
    pub fn temp_to_voltage(&self, temperature: f64) -> f64 {
        let voltage = ((temperature - self.min_temp) / (self.max_temp - self.min_temp))
            * (self.max_voltage - self.min_voltage)
            + self.min_voltage;

        clamp_between(
            voltage * self.correction_factor,
            self.min_voltage,
            self.max_voltage,
        )
    }

    /// Inverse of the uncorrected, unclamped mapping.
    pub fn voltage_to_temp(&self, voltage: f64) -> f64 {
        if self.max_voltage == self.min_voltage {
            return self.min_temp;
        }
        (voltage - self.min_voltage) / (self.max_voltage - self.min_voltage)
            * (self.max_temp - self.min_temp)
            + self.min_temp
    }

    pub fn min_voltage(&self) -> f64 {
        self.min_voltage
    }

    pub fn max_voltage(&self) -> f64 {
        self.max_voltage
    }
}

impl Default for DacMapping {
    /// 0 to 100 deg C onto the rig's 0 to 5 V output, uncorrected.
    fn default() -> Self {
        Self {
            min_temp: 0.,
            max_temp: 100.,
            min_voltage: 0.,
            max_voltage: 5.,
            correction_factor: 1.,
        }
    }
}
