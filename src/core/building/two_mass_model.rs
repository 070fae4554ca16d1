use crate::compare_floats::min_of_2;
use crate::core::building::thermal_mass::ThermalMass;
use crate::core::units::water_heat_flow;
use serde::Serialize;

/// This module provides a two-mass model of a heated building, used to predict the return
/// temperature a real building would send back to the heat pump under test.
///
/// Mass H represents the heat transfer system (emitters and their water), mass B the building
/// fabric and air. The temperature of mass H is taken to be the return temperature.

/// Read-only view of a model after a step, for display and logging.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ModelSnapshot {
    pub heat_flow_hp: f64,
    pub heat_flow_hb: f64,
    pub heat_flow_ba: f64,
    pub heat_flow_internal: f64,
    pub heat_flow_boost: f64,
    pub temperature_h: f64,
    pub temperature_b: f64,
    pub return_temperature: f64,
}

#[derive(Clone, Debug)]
pub struct ThermalModel {
    mass_h: ThermalMass,
    mass_b: ThermalMass,
    conductance_hb: f64, // W/K
    conductance_ba: f64, // W/K
    ambient_temperature: f64,
    design_flow_temperature: f64,
    boost_enabled: bool,
    boost_max_power: f64, // W
    heat_flow_hp: f64,
    heat_flow_hb: f64,
    heat_flow_ba: f64,
    heat_flow_internal: f64,
    heat_flow_boost: f64,
}

impl ThermalModel {
    /// Arguments
    /// * `conductance_hb` - thermal conductance between transfer system and building, in W/K
    /// * `conductance_ba` - thermal conductance between building and ambient, in W/K
    /// * `heat_capacity_h` - heat capacity of the transfer system, in J/K
    /// * `heat_capacity_b` - heat capacity of the building, in J/K
    /// * `ambient_temperature` - in deg C
    /// * `start_temperature_h` - initial temperature of the transfer system, in deg C
    /// * `start_temperature_b` - initial temperature of the building, in deg C
    /// * `design_flow_temperature` - in deg C; the booster heater tops the supply up to this
    /// * `boost_enabled` - whether the virtual booster heater is active
    /// * `boost_max_power` - maximum output of the booster heater, in W
    pub fn new(
        conductance_hb: f64,
        conductance_ba: f64,
        heat_capacity_h: f64,
        heat_capacity_b: f64,
        ambient_temperature: f64,
        start_temperature_h: f64,
        start_temperature_b: f64,
        design_flow_temperature: f64,
        boost_enabled: bool,
        boost_max_power: f64,
    ) -> Self {
        Self {
            mass_h: ThermalMass::new(heat_capacity_h, start_temperature_h),
            mass_b: ThermalMass::new(heat_capacity_b, start_temperature_b),
            conductance_hb,
            conductance_ba,
            ambient_temperature,
            design_flow_temperature,
            boost_enabled,
            boost_max_power,
            heat_flow_hp: 0.,
            heat_flow_hb: 0.,
            heat_flow_ba: 0.,
            heat_flow_internal: 0.,
            heat_flow_boost: 0.,
        }
    }

    /// Advance the model by one step.
    ///
    /// Arguments
    /// * `supply_temperature` - measured supply (flow) temperature from the heat pump, in deg C
    /// * `measured_return_temperature` - measured return temperature, in deg C
    /// * `mass_flow` - in kg/s, must be positive
    /// * `step_size_seconds` - length of the step, in s
    /// * `internal_gain_watts` - heat gain going straight into the building mass, in W
    pub fn step(
        &mut self,
        supply_temperature: f64,
        measured_return_temperature: f64,
        mass_flow: f64,
        step_size_seconds: f64,
        internal_gain_watts: f64,
    ) {
        self.heat_flow_internal = internal_gain_watts;
        self.heat_flow_boost = self.boost_heat_flow(supply_temperature, mass_flow);
        self.heat_flow_hp =
            water_heat_flow(mass_flow, supply_temperature - measured_return_temperature);
        // mass H stands in for the return side of the loop, so it is averaged with the supply
        self.heat_flow_hb = self.conductance_hb
            * ((supply_temperature + self.mass_h.temperature()) / 2.
                - self.mass_b.temperature());
        self.heat_flow_ba =
            self.conductance_ba * (self.mass_b.temperature() - self.ambient_temperature);

        self.mass_h.apply_energy(
            (self.heat_flow_hp + self.heat_flow_boost - self.heat_flow_hb) * step_size_seconds,
        );
        self.mass_b.apply_energy(
            (self.heat_flow_hb - self.heat_flow_ba + self.heat_flow_internal) * step_size_seconds,
        );
    }

    fn boost_heat_flow(&self, supply_temperature: f64, mass_flow: f64) -> f64 {
        if self.boost_enabled && supply_temperature < self.design_flow_temperature {
            min_of_2(
                water_heat_flow(mass_flow, self.design_flow_temperature - supply_temperature),
                self.boost_max_power,
            )
        } else {
            0.
        }
    }

    /// Predicted return temperature, in deg C. Always the temperature of the transfer system.
    pub fn return_temperature(&self) -> f64 {
        self.mass_h.temperature()
    }

    pub fn mass_h(&self) -> &ThermalMass {
        &self.mass_h
    }

    pub fn mass_b(&self) -> &ThermalMass {
        &self.mass_b
    }

    pub fn conductance_hb(&self) -> f64 {
        self.conductance_hb
    }

    pub fn conductance_ba(&self) -> f64 {
        self.conductance_ba
    }

    pub fn ambient_temperature(&self) -> f64 {
        self.ambient_temperature
    }

    pub fn design_flow_temperature(&self) -> f64 {
        self.design_flow_temperature
    }

    pub fn boost_enabled(&self) -> bool {
        self.boost_enabled
    }

    pub fn boost_max_power(&self) -> f64 {
        self.boost_max_power
    }

    pub fn heat_flow_hp(&self) -> f64 {
        self.heat_flow_hp
    }

    pub fn heat_flow_hb(&self) -> f64 {
        self.heat_flow_hb
    }

    pub fn heat_flow_ba(&self) -> f64 {
        self.heat_flow_ba
    }

    pub fn heat_flow_internal(&self) -> f64 {
        self.heat_flow_internal
    }

    pub fn heat_flow_boost(&self) -> f64 {
        self.heat_flow_boost
    }

    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            heat_flow_hp: self.heat_flow_hp,
            heat_flow_hb: self.heat_flow_hb,
            heat_flow_ba: self.heat_flow_ba,
            heat_flow_internal: self.heat_flow_internal,
            heat_flow_boost: self.heat_flow_boost,
            temperature_h: self.mass_h.temperature(),
            temperature_b: self.mass_b.temperature(),
            return_temperature: self.return_temperature(),
        }
    }
}
