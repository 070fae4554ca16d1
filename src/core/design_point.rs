use std::sync::LazyLock;
use thiserror::Error;

/// This module maps the ambient temperature of a test to the design data of the heat pump
/// under test, following the test points of the load-based test method.

/// At or below this ambient temperature (deg C) the virtual booster heater is switched on.
pub const BOOST_ACTIVATION_TEMPERATURE: f64 = -10.;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DesignPoint {
    pub part_load_ratio: f64,
    /// Rated heating power at this test point, in W
    pub design_heating_power: f64,
    /// in deg C
    pub design_flow_temperature: f64,
}

/// Result of looking up an ambient temperature in a [DesignPointTable].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdjustedDesign {
    /// The breakpoint that was selected, in deg C
    pub breakpoint: f64,
    pub part_load_ratio: f64,
    /// Rated power scaled by the part-load ratio, in W
    pub design_heating_power: f64,
    pub design_flow_temperature: f64,
    pub boost_enabled: bool,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DesignPointTableError {
    #[error("A design point table needs at least one breakpoint")]
    Empty,
    #[error("Design point breakpoint {0} is not a finite temperature")]
    NonFiniteBreakpoint(f64),
    #[error("Design point breakpoint {0} appears more than once")]
    DuplicateBreakpoint(f64),
}

/// Breakpoints (ambient temperature in deg C) with the design point that applies from that
/// temperature upwards. Kept sorted ascending and never empty.
#[derive(Clone, Debug, PartialEq)]
pub struct DesignPointTable {
    breakpoints: Vec<(f64, DesignPoint)>,
}

impl DesignPointTable {
    pub fn new(mut breakpoints: Vec<(f64, DesignPoint)>) -> Result<Self, DesignPointTableError> {
        if breakpoints.is_empty() {
            return Err(DesignPointTableError::Empty);
        }
        if let Some((temp, _)) = breakpoints.iter().find(|(temp, _)| !temp.is_finite()) {
            return Err(DesignPointTableError::NonFiniteBreakpoint(*temp));
        }
        breakpoints.sort_by(|(a, _), (b, _)| a.total_cmp(b));
        if let Some(pair) = breakpoints.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(DesignPointTableError::DuplicateBreakpoint(pair[0].0));
        }

        Ok(Self { breakpoints })
    }

    pub fn breakpoints(&self) -> &[(f64, DesignPoint)] {
        &self.breakpoints
    }

    /// Select the design point for an ambient temperature: the largest breakpoint that is less
    /// than or equal to the ambient temperature, or the coldest breakpoint when the ambient
    /// temperature is below all of them. There is no interpolation between breakpoints.
    pub fn adjust_design_parameters(&self, ambient_temperature: f64) -> AdjustedDesign {
        let (breakpoint, design_point) = self
            .breakpoints
            .iter()
            .rev()
            .find(|(temp, _)| *temp <= ambient_temperature)
            .unwrap_or(&self.breakpoints[0]);

        AdjustedDesign {
            breakpoint: *breakpoint,
            part_load_ratio: design_point.part_load_ratio,
            design_heating_power: design_point.design_heating_power * design_point.part_load_ratio,
            design_flow_temperature: design_point.design_flow_temperature,
            boost_enabled: ambient_temperature <= BOOST_ACTIVATION_TEMPERATURE,
        }
    }
}

impl Default for DesignPointTable {
    fn default() -> Self {
        STANDARD_TEST_POINTS.clone()
    }
}

fn design_point(
    part_load_ratio: f64,
    design_heating_power: f64,
    design_flow_temperature: f64,
) -> DesignPoint {
    DesignPoint {
        part_load_ratio,
        design_heating_power,
        design_flow_temperature,
    }
}

/// The rig's standard test points.
pub static STANDARD_TEST_POINTS: LazyLock<DesignPointTable> = LazyLock::new(|| DesignPointTable {
    breakpoints: vec![
        (-10., design_point(1.0, 5_500., 55.)),
        (-7., design_point(0.885, 5_000., 52.)),
        (2., design_point(0.538, 7_000., 42.)),
        (7., design_point(0.346, 10_800., 36.)),
        (12., design_point(0.154, 24_300., 30.)),
    ],
});

/// Look up an ambient temperature in the standard test points.
pub fn adjust_design_parameters(ambient_temperature: f64) -> AdjustedDesign {
    STANDARD_TEST_POINTS.adjust_design_parameters(ambient_temperature)
}
