use crate::core::building::two_mass_model::ThermalModel;
use crate::core::units::SPECIFIC_HEAT_CAPACITY_WATER;
use thiserror::Error;

/// This module derives the coefficients of the two-mass building model from the design data of
/// the heat pump under test.

pub const DEFAULT_BUILDING_TEMPERATURE: f64 = 20.;
/// Fitted time constant of the building mass, in s.
pub const DEFAULT_TIME_CONSTANT_BUILDING: f64 = 209_125.;
/// Fitted time constant of the transfer system mass, in s.
pub const DEFAULT_TIME_CONSTANT_TRANSFER: f64 = 1_957.;
/// Condenser temperature difference used when the rig is not run at constant mass flow, in K.
pub const DEFAULT_CONDENSER_TEMPERATURE_DIFFERENCE: f64 = 5.;

/// Denominators smaller than this (in K) are treated as zero.
const DENOMINATOR_TOLERANCE: f64 = 1e-9;

/// How the temperature drop over the condenser at the design point is determined.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CondenserSizing {
    /// Derived from the design heating power carried by a constant mass flow (kg/s).
    ConstantMassFlow { mass_flow: f64 },
    /// A fixed temperature difference between flow and return, in K.
    FixedTemperatureDifference { delta_t: f64 },
}

/// Nameplate design conditions of the heat pump, plus the fitted time constants of the building.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DesignConditions {
    pub ambient_temperature: f64,
    pub design_heating_power: f64,
    pub design_flow_temperature: f64,
    pub condenser_sizing: CondenserSizing,
    pub building_temperature: f64,
    pub time_constant_building: f64,
    pub time_constant_transfer: f64,
    pub boost_enabled: bool,
    pub boost_max_power: f64,
}

impl DesignConditions {
    /// Design conditions at constant mass flow, with the default building temperature and time
    /// constants and no booster heater.
    pub fn new(
        ambient_temperature: f64,
        design_heating_power: f64,
        design_flow_temperature: f64,
        mass_flow: f64,
    ) -> Self {
        Self {
            ambient_temperature,
            design_heating_power,
            design_flow_temperature,
            condenser_sizing: CondenserSizing::ConstantMassFlow { mass_flow },
            building_temperature: DEFAULT_BUILDING_TEMPERATURE,
            time_constant_building: DEFAULT_TIME_CONSTANT_BUILDING,
            time_constant_transfer: DEFAULT_TIME_CONSTANT_TRANSFER,
            boost_enabled: false,
            boost_max_power: 0.,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DerivationError {
    #[error("{name} must be a finite number, got {value}")]
    NonFiniteInput { name: &'static str, value: f64 },
    #[error("Design heating power must be positive, got {0} W")]
    NonPositiveDesignPower(f64),
    #[error("Mass flow must be positive, got {0} kg/s")]
    NonPositiveMassFlow(f64),
    #[error("Condenser temperature difference must be positive, got {0} K")]
    NonPositiveCondenserDelta(f64),
    #[error("Building temperature ({building} deg C) must be above the ambient temperature ({ambient} deg C)")]
    BuildingNotAboveAmbient { building: f64, ambient: f64 },
    #[error("Design flow temperature leaves no temperature difference to drive heat from transfer system to building (denominator {denominator} K)")]
    NoTransferTemperatureDifference { denominator: f64 },
    #[error("Derived {name} must be positive, got {value}")]
    NonPositiveCoefficient { name: &'static str, value: f64 },
}

/// Coefficients of a two-mass building model, derived once from design conditions.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSet {
    conditions: DesignConditions,
    delta_t_condenser: f64,
    conductance_ba: f64,
    conductance_hb: f64,
    start_temperature_h: f64,
    heat_capacity_b: f64,
    heat_capacity_h: f64,
}

impl ParameterSet {
    pub fn derive(conditions: DesignConditions) -> Result<Self, DerivationError> {
        check_finite(&conditions)?;

        let DesignConditions {
            ambient_temperature,
            design_heating_power,
            design_flow_temperature,
            condenser_sizing,
            building_temperature,
            time_constant_building,
            time_constant_transfer,
            ..
        } = conditions;

        if design_heating_power <= 0. {
            return Err(DerivationError::NonPositiveDesignPower(
                design_heating_power,
            ));
        }

        let delta_t_condenser = match condenser_sizing {
            CondenserSizing::ConstantMassFlow { mass_flow } => {
                if mass_flow <= 0. {
                    return Err(DerivationError::NonPositiveMassFlow(mass_flow));
                }
                design_heating_power / (mass_flow * SPECIFIC_HEAT_CAPACITY_WATER)
            }
            CondenserSizing::FixedTemperatureDifference { delta_t } => {
                if delta_t <= 0. {
                    return Err(DerivationError::NonPositiveCondenserDelta(delta_t));
                }
                delta_t
            }
        };

        let building_ambient_difference = building_temperature - ambient_temperature;
        if building_ambient_difference < DENOMINATOR_TOLERANCE {
            return Err(DerivationError::BuildingNotAboveAmbient {
                building: building_temperature,
                ambient: ambient_temperature,
            });
        }
        let conductance_ba = design_heating_power / building_ambient_difference;

        let transfer_difference =
            design_flow_temperature - 0.5 * delta_t_condenser - building_temperature;
        if transfer_difference < DENOMINATOR_TOLERANCE {
            return Err(DerivationError::NoTransferTemperatureDifference {
                denominator: transfer_difference,
            });
        }
        let conductance_hb = design_heating_power / transfer_difference;

        let start_temperature_h = design_flow_temperature - delta_t_condenser;
        let heat_capacity_b = positive(
            "building heat capacity",
            time_constant_building * conductance_ba,
        )?;
        let heat_capacity_h = positive(
            "transfer system heat capacity",
            time_constant_transfer * conductance_hb,
        )?;

        Ok(Self {
            conditions,
            delta_t_condenser,
            conductance_ba,
            conductance_hb,
            start_temperature_h,
            heat_capacity_b,
            heat_capacity_h,
        })
    }

    /// Build a fresh model, with the transfer system at its design return temperature and the
    /// building at its design temperature.
    pub fn create(&self) -> ThermalModel {
        ThermalModel::new(
            self.conductance_hb,
            self.conductance_ba,
            self.heat_capacity_h,
            self.heat_capacity_b,
            self.conditions.ambient_temperature,
            self.start_temperature_h,
            self.conditions.building_temperature,
            self.conditions.design_flow_temperature,
            self.conditions.boost_enabled,
            self.conditions.boost_max_power,
        )
    }

    pub fn conditions(&self) -> &DesignConditions {
        &self.conditions
    }

    pub fn delta_t_condenser(&self) -> f64 {
        self.delta_t_condenser
    }

    pub fn conductance_ba(&self) -> f64 {
        self.conductance_ba
    }

    pub fn conductance_hb(&self) -> f64 {
        self.conductance_hb
    }

    pub fn start_temperature_h(&self) -> f64 {
        self.start_temperature_h
    }

    pub fn heat_capacity_b(&self) -> f64 {
        self.heat_capacity_b
    }

    pub fn heat_capacity_h(&self) -> f64 {
        self.heat_capacity_h
    }
}

fn check_finite(conditions: &DesignConditions) -> Result<(), DerivationError> {
    let sizing_value = match conditions.condenser_sizing {
        CondenserSizing::ConstantMassFlow { mass_flow } => ("mass flow", mass_flow),
        CondenserSizing::FixedTemperatureDifference { delta_t } => {
            ("condenser temperature difference", delta_t)
        }
    };
    [
        ("ambient temperature", conditions.ambient_temperature),
        ("design heating power", conditions.design_heating_power),
        ("design flow temperature", conditions.design_flow_temperature),
        sizing_value,
        ("building temperature", conditions.building_temperature),
        ("building time constant", conditions.time_constant_building),
        ("transfer system time constant", conditions.time_constant_transfer),
        ("booster heater power", conditions.boost_max_power),
    ]
    .into_iter()
    .find(|(_, value)| !value.is_finite())
    .map_or(Ok(()), |(name, value)| {
        Err(DerivationError::NonFiniteInput { name, value })
    })
}

fn positive(name: &'static str, value: f64) -> Result<f64, DerivationError> {
    if value > 0. {
        Ok(value)
    } else {
        Err(DerivationError::NonPositiveCoefficient { name, value })
    }
}
