use crate::compare_floats::max_of_2;

/// Specific heat capacity of the rig's heating water, in J/(kg.K).
pub const SPECIFIC_HEAT_CAPACITY_WATER: f64 = 4183.;
/// The rig's flow meter reports a volume flow; the water is taken to weigh 1 kg per litre.
pub const KILOGRAMS_PER_LITRE_WATER: f64 = 1.;
pub const SECONDS_PER_HOUR: f64 = 3_600.;

/// Smallest mass flow (kg/s) handed to the building model, so that a stopped pump never
/// produces a division by zero in the parameter derivation.
pub const MINIMUM_MASS_FLOW: f64 = 0.001;

/// Convert the volume flow reported by the rig (L/s) into the mass flow (kg/s) used by every
/// internal API. This is the only place a flow unit conversion happens.
pub fn litres_per_second_to_kg_per_second(flow_rate_litres_per_second: f64) -> f64 {
    flow_rate_litres_per_second * KILOGRAMS_PER_LITRE_WATER
}

/// Mass flow with the model's floor applied. Non-finite values also fall back to the floor.
pub fn floored_mass_flow(mass_flow_kg_per_second: f64) -> f64 {
    if !mass_flow_kg_per_second.is_finite() {
        return MINIMUM_MASS_FLOW;
    }
    max_of_2(mass_flow_kg_per_second, MINIMUM_MASS_FLOW)
}

/// Heat flow (W) carried by water at `mass_flow` (kg/s) across a temperature difference (K).
pub(crate) fn water_heat_flow(mass_flow: f64, temperature_difference: f64) -> f64 {
    mass_flow * SPECIFIC_HEAT_CAPACITY_WATER * temperature_difference
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    #[case(0.31, 0.31)]
    #[case(0., 0.)]
    fn test_litres_per_second_to_kg_per_second(#[case] litres: f64, #[case] expected: f64) {
        assert_relative_eq!(litres_per_second_to_kg_per_second(litres), expected);
    }

    #[rstest]
    #[case(0.2, 0.2)]
    #[case(0., MINIMUM_MASS_FLOW)]
    #[case(-0.4, MINIMUM_MASS_FLOW)]
    #[case(f64::NAN, MINIMUM_MASS_FLOW)]
    #[case(f64::INFINITY, MINIMUM_MASS_FLOW)]
    fn test_floored_mass_flow(#[case] mass_flow: f64, #[case] expected: f64) {
        assert_eq!(floored_mass_flow(mass_flow), expected);
    }

    #[test]
    fn test_water_heat_flow() {
        assert_relative_eq!(water_heat_flow(0.05, 10.), 2091.5);
    }
}
