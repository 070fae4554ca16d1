pub mod parameters;
pub mod thermal_mass;
pub mod two_mass_model;
