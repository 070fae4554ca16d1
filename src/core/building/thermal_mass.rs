/// A lumped thermal capacitance: a single heat capacity at a single temperature.
#[derive(Clone, Debug, PartialEq)]
pub struct ThermalMass {
    heat_capacity: f64, // J/K
    temperature: f64,   // deg C
}

impl ThermalMass {
    /// Arguments
    /// * `heat_capacity` - in J/K, must be positive
    /// * `temperature` - initial temperature, in deg C
    pub fn new(heat_capacity: f64, temperature: f64) -> Self {
        debug_assert!(heat_capacity > 0., "heat capacity must be positive");
        Self {
            heat_capacity,
            temperature,
        }
    }

    pub fn heat_capacity(&self) -> f64 {
        self.heat_capacity
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Add `energy` (J, positive for heating) to the mass and update its temperature.
    pub fn apply_energy(&mut self, energy: f64) {
        self.temperature += energy / self.heat_capacity;
    }
}
