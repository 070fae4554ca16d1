pub mod building;
pub mod dac;
pub mod design_point;
pub mod units;
