use crate::core::building::parameters::{
    DEFAULT_BUILDING_TEMPERATURE, DEFAULT_TIME_CONSTANT_BUILDING, DEFAULT_TIME_CONSTANT_TRANSFER,
};
use crate::core::dac::{DacMapping, DacMappingError};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::ops::RangeInclusive;
use strum::{Display, EnumString};
use thiserror::Error;

pub const AMBIENT_TEMPERATURE_RANGE: RangeInclusive<f64> = -40. ..=40.;
pub const INITIAL_RETURN_TEMPERATURE_RANGE: RangeInclusive<f64> = 10. ..=90.;
pub const DEFAULT_BOOST_HEATER_POWER: f64 = 6_000.;

pub fn ingest_settings(json: impl Read) -> Result<OperatorSettings, anyhow::Error> {
    let settings: OperatorSettings = serde_json::from_reader(json)?;
    settings.validate()?;
    Ok(settings)
}

/// The operator-facing settings of a test, as entered before Initialize or Update Settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct OperatorSettings {
    /// Ambient temperature of the test point, in deg C
    pub ambient_temperature: f64,
    /// Overrides the design heating power from the test point table, in W
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_heating_power: Option<f64>,
    /// Return temperature reported until the first simulation step, in deg C
    pub initial_return_temperature: f64,
    /// Maximum output of the virtual booster heater, in W
    #[serde(default = "default_boost_heater_power")]
    pub boost_heater_power: f64,
    /// Target temperature sent to the rig's own thermostat on Initialize, in deg C
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_temperature: Option<f64>,
    /// Tolerance sent to the rig's own thermostat on Initialize, in K
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub rig: RigConfig,
}

fn default_boost_heater_power() -> f64 {
    DEFAULT_BOOST_HEATER_POWER
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("Ambient temperature must be between -40 and 40 deg C, got {0}")]
    AmbientTemperatureOutOfRange(f64),
    #[error("Design heating power must be positive, got {0} W")]
    DesignHeatingPowerNotPositive(f64),
    #[error("Initial return temperature must be between 10 and 90 deg C, got {0}")]
    InitialReturnTemperatureOutOfRange(f64),
    #[error("Booster heater power must not be negative, got {0} W")]
    BoostHeaterPowerNegative(f64),
    #[error("Thermostat tolerance must not be negative, got {0} K")]
    ToleranceNegative(f64),
    #[error("{name} must be a finite number")]
    NotFinite { name: &'static str },
    #[error("Rig step size must be positive, got {0} s")]
    StepSizeNotPositive(f64),
    #[error(transparent)]
    Dac(#[from] DacMappingError),
    #[error("Unknown setting '{0}'")]
    UnknownSetting(String),
    #[error("Value '{value}' for setting '{key}' is not a number")]
    NotANumber { key: String, value: String },
}

/// Settings that can be changed from the operator console with `update key=value`.
#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq)]
pub enum SettingKey {
    #[strum(serialize = "ambient", serialize = "ambient_temperature")]
    AmbientTemperature,
    #[strum(serialize = "power", serialize = "design_heating_power")]
    DesignHeatingPower,
    #[strum(serialize = "return", serialize = "initial_return_temperature")]
    InitialReturnTemperature,
    #[strum(serialize = "boost", serialize = "boost_heater_power")]
    BoostHeaterPower,
}

impl OperatorSettings {
    pub fn new(ambient_temperature: f64, initial_return_temperature: f64) -> Self {
        Self {
            ambient_temperature,
            design_heating_power: None,
            initial_return_temperature,
            boost_heater_power: DEFAULT_BOOST_HEATER_POWER,
            target_temperature: None,
            tolerance: None,
            rig: Default::default(),
        }
    }

    /// Reject settings the building model must never see.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !AMBIENT_TEMPERATURE_RANGE.contains(&self.ambient_temperature) {
            return Err(SettingsError::AmbientTemperatureOutOfRange(
                self.ambient_temperature,
            ));
        }
        if let Some(power) = self.design_heating_power {
            // NaN fails this comparison too
            if !(power > 0. && power.is_finite()) {
                return Err(SettingsError::DesignHeatingPowerNotPositive(power));
            }
        }
        if !INITIAL_RETURN_TEMPERATURE_RANGE.contains(&self.initial_return_temperature) {
            return Err(SettingsError::InitialReturnTemperatureOutOfRange(
                self.initial_return_temperature,
            ));
        }
        if !self.boost_heater_power.is_finite() {
            return Err(SettingsError::NotFinite {
                name: "Booster heater power",
            });
        }
        if self.boost_heater_power < 0. {
            return Err(SettingsError::BoostHeaterPowerNegative(
                self.boost_heater_power,
            ));
        }
        if let Some(target) = self.target_temperature {
            if !target.is_finite() {
                return Err(SettingsError::NotFinite {
                    name: "Target temperature",
                });
            }
        }
        if let Some(tolerance) = self.tolerance {
            if !tolerance.is_finite() {
                return Err(SettingsError::NotFinite { name: "Tolerance" });
            }
            if tolerance < 0. {
                return Err(SettingsError::ToleranceNegative(tolerance));
            }
        }
        self.rig.validate()
    }

    /// Copy of these settings with one value changed, validated.
    pub fn with_update(&self, key: SettingKey, value: f64) -> Result<Self, SettingsError> {
        let mut updated = self.clone();
        match key {
            SettingKey::AmbientTemperature => updated.ambient_temperature = value,
            SettingKey::DesignHeatingPower => updated.design_heating_power = Some(value),
            SettingKey::InitialReturnTemperature => updated.initial_return_temperature = value,
            SettingKey::BoostHeaterPower => updated.boost_heater_power = value,
        }
        updated.validate()?;
        Ok(updated)
    }

    /// Apply `key=value` pairs as typed by the operator, all or nothing.
    pub fn with_text_updates<'a>(
        &self,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, SettingsError> {
        pairs.into_iter().try_fold(self.clone(), |settings, (key, value)| {
            let setting_key = key
                .trim()
                .parse::<SettingKey>()
                .map_err(|_| SettingsError::UnknownSetting(key.trim().to_string()))?;
            let number = value
                .trim()
                .parse::<f64>()
                .map_err(|_| SettingsError::NotANumber {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                })?;
            settings.with_update(setting_key, number)
        })
    }
}

/// Constants of the rig and the building it emulates. Rarely changed; every field has a default.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(default, deny_unknown_fields)]
pub struct RigConfig {
    /// in deg C
    pub building_temperature: f64,
    /// in s
    pub time_constant_building: f64,
    /// in s
    pub time_constant_transfer: f64,
    /// Simulated time per sensor sample, in s
    pub step_size_seconds: f64,
    /// Mass flow assumed for the parameter derivation before the rig has reported a flow rate, in kg/s
    pub initial_mass_flow: f64,
    pub dac: DacConfig,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            building_temperature: DEFAULT_BUILDING_TEMPERATURE,
            time_constant_building: DEFAULT_TIME_CONSTANT_BUILDING,
            time_constant_transfer: DEFAULT_TIME_CONSTANT_TRANSFER,
            step_size_seconds: 1.,
            initial_mass_flow: 0.25,
            dac: Default::default(),
        }
    }
}

impl RigConfig {
    fn validate(&self) -> Result<(), SettingsError> {
        for (name, value) in [
            ("Building temperature", self.building_temperature),
            ("Building time constant", self.time_constant_building),
            ("Transfer system time constant", self.time_constant_transfer),
            ("Initial mass flow", self.initial_mass_flow),
        ] {
            if !value.is_finite() {
                return Err(SettingsError::NotFinite { name });
            }
        }
        if !(self.step_size_seconds > 0. && self.step_size_seconds.is_finite()) {
            return Err(SettingsError::StepSizeNotPositive(self.step_size_seconds));
        }
        self.dac.mapping()?;
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(default, deny_unknown_fields)]
pub struct DacConfig {
    pub min_temp: f64,
    pub max_temp: f64,
    pub min_voltage: f64,
    pub max_voltage: f64,
    pub correction_factor: f64,
}

impl Default for DacConfig {
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

impl DacConfig {
    pub fn mapping(&self) -> Result<DacMapping, DacMappingError> {
        DacMapping::new(
            self.min_temp,
            self.max_temp,
            self.min_voltage,
            self.max_voltage,
            self.correction_factor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::io::Cursor;

    #[fixture]
    fn settings() -> OperatorSettings {
        OperatorSettings::new(7., 30.)
    }

    #[test]
    fn test_ingest_minimal_settings() {
        let json = r#"{"ambient_temperature": -7, "initial_return_temperature": 35}"#;
        let settings = ingest_settings(Cursor::new(json)).unwrap();

        assert_eq!(settings, OperatorSettings::new(-7., 35.));
        assert_eq!(settings.boost_heater_power, 6_000.);
        assert_eq!(settings.rig, RigConfig::default());
    }

    #[test]
    fn test_ingest_full_settings() {
        let json = r#"{
            "ambient_temperature": 2,
            "design_heating_power": 4200,
            "initial_return_temperature": 35,
            "boost_heater_power": 3000,
            "target_temperature": 25,
            "tolerance": 0.1,
            "rig": {"time_constant_building": 150000, "dac": {"correction_factor": 1.02}}
        }"#;
        let settings = ingest_settings(Cursor::new(json)).unwrap();

        assert_eq!(settings.design_heating_power, Some(4_200.));
        assert_eq!(settings.target_temperature, Some(25.));
        assert_eq!(settings.rig.time_constant_building, 150_000.);
        assert_eq!(settings.rig.time_constant_transfer, 1_957.);
        assert_eq!(settings.rig.dac.correction_factor, 1.02);
        assert_eq!(settings.rig.dac.max_voltage, 5.);
    }

    #[test]
    fn test_ingest_rejects_unknown_fields() {
        let json = r#"{"ambient_temperature": 2, "initial_return_temperature": 35, "colour": 1}"#;
        assert!(ingest_settings(Cursor::new(json)).is_err());
    }

    #[test]
    fn test_ingest_rejects_out_of_range_settings() {
        let json = r#"{"ambient_temperature": 55, "initial_return_temperature": 35}"#;
        let error = ingest_settings(Cursor::new(json)).unwrap_err();
        assert_eq!(
            error.downcast_ref::<SettingsError>(),
            Some(&SettingsError::AmbientTemperatureOutOfRange(55.))
        );
    }

    #[rstest]
    #[case(-40., 10., None)]
    #[case(40., 90., None)]
    #[case(-40.5, 30., Some(SettingsError::AmbientTemperatureOutOfRange(-40.5)))]
    #[case(7., 9.9, Some(SettingsError::InitialReturnTemperatureOutOfRange(9.9)))]
    #[case(7., 90.1, Some(SettingsError::InitialReturnTemperatureOutOfRange(90.1)))]
    fn test_validate_ranges(
        #[case] ambient: f64,
        #[case] initial_return: f64,
        #[case] expected: Option<SettingsError>,
    ) {
        let result = OperatorSettings::new(ambient, initial_return).validate();
        assert_eq!(result.err(), expected);
    }

    #[rstest]
    fn test_validate_design_power(settings: OperatorSettings) {
        let with_power = |power| OperatorSettings {
            design_heating_power: Some(power),
            ..settings.clone()
        };
        assert!(with_power(3_000.).validate().is_ok());
        assert_eq!(
            with_power(0.).validate(),
            Err(SettingsError::DesignHeatingPowerNotPositive(0.))
        );
        assert!(with_power(f64::NAN).validate().is_err());
    }

    #[rstest]
    fn test_validate_rejects_negative_boost_power(settings: OperatorSettings) {
        let settings = OperatorSettings {
            boost_heater_power: -1.,
            ..settings
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::BoostHeaterPowerNegative(-1.))
        );
    }

    #[rstest]
    fn test_validate_rejects_bad_dac_config(mut settings: OperatorSettings) {
        settings.rig.dac.max_temp = settings.rig.dac.min_temp;
        assert!(matches!(settings.validate(), Err(SettingsError::Dac(_))));
    }

    #[rstest]
    fn test_with_text_updates(settings: OperatorSettings) {
        let updated = settings
            .with_text_updates([("ambient", "-10"), ("boost_heater_power", " 4500 ")])
            .unwrap();
        assert_eq!(updated.ambient_temperature, -10.);
        assert_eq!(updated.boost_heater_power, 4_500.);
        assert_eq!(updated.initial_return_temperature, 30.);
    }

    #[rstest]
    fn test_with_text_updates_is_all_or_nothing(settings: OperatorSettings) {
        assert_eq!(
            settings.with_text_updates([("ambient", "-10"), ("return", "95")]),
            Err(SettingsError::InitialReturnTemperatureOutOfRange(95.))
        );
        assert_eq!(
            settings.with_text_updates([("humidity", "50")]),
            Err(SettingsError::UnknownSetting("humidity".to_string()))
        );
        assert!(matches!(
            settings.with_text_updates([("power", "lots")]),
            Err(SettingsError::NotANumber { .. })
        ));
    }
}
