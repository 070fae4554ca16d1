use crate::core::building::parameters::{CondenserSizing, DesignConditions, ParameterSet};
use crate::core::building::two_mass_model::{ModelSnapshot, ThermalModel};
use crate::core::dac::DacMapping;
use crate::core::design_point::DesignPointTable;
use crate::core::units::{floored_mass_flow, litres_per_second_to_kg_per_second};
use crate::errors::LbtError;
use crate::input::{OperatorSettings, SettingsError};
use crate::protocol::{DeviceCommand, SensorFrame};
use crate::session_time::{SessionClock, SessionTimeIteration};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

/// Predicted return temperatures below this (deg C) are not plausible for a water-filled system.
pub const MINIMUM_PLAUSIBLE_RETURN_TEMPERATURE: f64 = 0.;
/// Until the rig reports a return temperature, it is assumed to be this much below the supply, in K.
pub const FALLBACK_RETURN_TEMPERATURE_OFFSET: f64 = 5.;
/// Voltage sent to the rig when the test is stopped.
pub const STOP_VOLTAGE: f64 = 0.;

/// Holds the building model in use, if any. [ModelSlot::replace] is the only way a model gets in.
#[derive(Clone, Debug, Default)]
pub struct ModelSlot {
    model: Option<ThermalModel>,
}

impl ModelSlot {
    pub fn empty() -> Self {
        Self { model: None }
    }

    /// Swap in a new model, handing back the one it replaces.
    pub fn replace(&mut self, model: ThermalModel) -> Option<ThermalModel> {
        self.model.replace(model)
    }

    pub fn clear(&mut self) -> Option<ThermalModel> {
        self.model.take()
    }

    pub fn get(&self) -> Option<&ThermalModel> {
        self.model.as_ref()
    }

    pub(crate) fn get_mut(&mut self) -> Option<&mut ThermalModel> {
        self.model.as_mut()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ControllerStats {
    pub steps: u64,
    /// Frames that carried no supply temperature, so could not drive a step
    pub frames_without_supply: u64,
    /// Frames received while no model was loaded
    pub frames_while_stopped: u64,
    pub implausible_outputs: u64,
    pub derivation_failures: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Plausibility {
    Plausible,
    /// Prediction was below the minimum plausible return temperature and was clamped to it
    BelowMinimum,
    /// Prediction was NaN or infinite; the last plausible temperature was used instead
    NonFinite,
}

/// What one sample did to the model, and what was sent to the rig as a result.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StepOutcome {
    pub time: SessionTimeIteration,
    pub snapshot: ModelSnapshot,
    pub supply_temperature: f64,
    pub measured_return_temperature: f64,
    /// in kg/s
    pub mass_flow: f64,
    /// Return temperature the setpoint was computed from, after the plausibility check, in deg C
    pub setpoint_temperature: f64,
    pub voltage: f64,
    pub plausibility: Plausibility,
}

/// Couples the building model to the rig: turns each sensor frame into one model step and one
/// voltage setpoint, and owns the model's lifecycle (Initialize, Update Settings, Stop).
#[derive(Debug)]
pub struct RigController {
    settings: OperatorSettings,
    design_points: DesignPointTable,
    dac: DacMapping,
    slot: ModelSlot,
    parameters: Option<ParameterSet>,
    clock: SessionClock,
    last_measured_return_temperature: Option<f64>,
    last_mass_flow: Option<f64>,
    last_plausible_return_temperature: f64,
    pending_commands: VecDeque<DeviceCommand>,
    stats: ControllerStats,
}

impl RigController {
    pub fn new(settings: OperatorSettings) -> Result<Self, LbtError> {
        Self::with_design_points(settings, DesignPointTable::default())
    }

    pub fn with_design_points(
        settings: OperatorSettings,
        design_points: DesignPointTable,
    ) -> Result<Self, LbtError> {
        settings.validate()?;
        let dac = settings.rig.dac.mapping()?;

        Ok(Self {
            dac,
            design_points,
            slot: ModelSlot::empty(),
            parameters: None,
            clock: SessionClock::new(settings.rig.step_size_seconds),
            last_measured_return_temperature: None,
            last_mass_flow: None,
            last_plausible_return_temperature: settings.initial_return_temperature,
            pending_commands: Default::default(),
            stats: Default::default(),
            settings,
        })
    }

    /// Derive a model from the current settings and start using it. The session clock restarts.
    /// If derivation fails, whatever model was loaded before stays loaded.
    pub fn initialize(&mut self) -> Result<(), LbtError> {
        let parameters = self.derive_or_count(&self.settings.clone())?;
        self.load(parameters);
        self.clock = SessionClock::new(self.settings.rig.step_size_seconds);
        self.last_plausible_return_temperature = self.settings.initial_return_temperature;

        if let Some(target) = self.settings.target_temperature {
            self.pending_commands.push_back(DeviceCommand::SetTemp(target));
        }
        if let Some(tolerance) = self.settings.tolerance {
            self.pending_commands
                .push_back(DeviceCommand::SetTolerance(tolerance));
        }
        info!(
            "Initialized building model for {} deg C ambient",
            self.settings.ambient_temperature
        );
        Ok(())
    }

    /// Validate new settings and re-derive the model from them. On success the new model
    /// replaces the running one (if any) and the settings are kept; on failure nothing changes.
    pub fn update_settings(&mut self, settings: OperatorSettings) -> Result<(), LbtError> {
        if let Err(e) = settings.validate() {
            error!("Rejected settings update: {e}");
            return Err(e.into());
        }
        let dac = settings.rig.dac.mapping()?;
        let parameters = self.derive_or_count(&settings)?;

        self.settings = settings;
        self.dac = dac;
        if self.slot.is_loaded() {
            self.load(parameters);
            info!("Replaced building model after settings update");
        } else {
            self.parameters = Some(parameters);
            info!("Settings updated; they take effect on initialize");
        }
        Ok(())
    }

    /// Apply `key=value` updates as typed on the console.
    pub fn update_settings_from_text<'a>(
        &mut self,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<(), LbtError> {
        let settings = self.settings.with_text_updates(pairs).inspect_err(|e| {
            error!("Rejected settings update: {e}");
        })?;
        self.update_settings(settings)
    }

    /// Unload the model and set the rig's output to zero.
    pub fn stop(&mut self) {
        if self.slot.clear().is_some() {
            info!(
                "Stopped after {} steps ({} simulated)",
                self.stats.steps,
                self.clock.hms()
            );
        }
        self.pending_commands
            .push_back(DeviceCommand::SetVoltage(STOP_VOLTAGE));
    }

    /// Take in one frame from the rig. A frame with a supply temperature advances the model by
    /// one step and queues a new voltage setpoint; other frames only update the remembered return
    /// temperature and flow rate.
    pub fn handle_frame(&mut self, frame: &SensorFrame) -> Option<StepOutcome> {
        if let Some(return_temperature) = frame.measured_return_temperature {
            self.last_measured_return_temperature = Some(return_temperature);
        }
        if let Some(flow_rate) = frame.flow_rate_litres_per_second {
            self.last_mass_flow = Some(floored_mass_flow(litres_per_second_to_kg_per_second(
                flow_rate,
            )));
        }

        let Some(supply_temperature) = frame.supply_temperature else {
            self.stats.frames_without_supply += 1;
            return None;
        };

        let measured_return_temperature = self
            .last_measured_return_temperature
            .unwrap_or(supply_temperature - FALLBACK_RETURN_TEMPERATURE_OFFSET);
        let mass_flow = self.mass_flow();
        let step_size = self.settings.rig.step_size_seconds;

        let Some(model) = self.slot.get_mut() else {
            self.stats.frames_while_stopped += 1;
            debug!("Ignoring supply temperature {supply_temperature} while stopped");
            return None;
        };
        model.step(
            supply_temperature,
            measured_return_temperature,
            mass_flow,
            step_size,
            0.,
        );
        let snapshot = model.snapshot();

        let (setpoint_temperature, plausibility) =
            self.check_plausibility(snapshot.return_temperature);
        let voltage = self.dac.temp_to_voltage(setpoint_temperature);
        self.pending_commands
            .push_back(DeviceCommand::SetVoltage(voltage));
        self.stats.steps += 1;
        let time = self.clock.advance();

        debug!(
            "t={} supply={supply_temperature:.2} return={measured_return_temperature:.2} m={mass_flow:.3} -> T_h={:.2} T_b={:.2} Q_hp={:.0} Q_boost={:.0} U={voltage:.2}",
            self.clock.hms(),
            snapshot.temperature_h,
            snapshot.temperature_b,
            snapshot.heat_flow_hp,
            snapshot.heat_flow_boost,
        );

        Some(StepOutcome {
            time,
            snapshot,
            supply_temperature,
            measured_return_temperature,
            mass_flow,
            setpoint_temperature,
            voltage,
            plausibility,
        })
    }

    /// Commands waiting to be sent to the rig, oldest first.
    pub fn take_pending_commands(&mut self) -> Vec<DeviceCommand> {
        self.pending_commands.drain(..).collect()
    }

    /// Set the target temperature of the rig's own thermostat.
    pub fn request_target_temperature(&mut self, temperature: f64) -> Result<(), LbtError> {
        if !temperature.is_finite() {
            return Err(SettingsError::NotFinite {
                name: "Target temperature",
            }
            .into());
        }
        self.pending_commands
            .push_back(DeviceCommand::SetTemp(temperature));
        Ok(())
    }

    pub fn request_tolerance(&mut self, tolerance: f64) -> Result<(), LbtError> {
        if !tolerance.is_finite() {
            return Err(SettingsError::NotFinite { name: "Tolerance" }.into());
        }
        if tolerance < 0. {
            return Err(SettingsError::ToleranceNegative(tolerance).into());
        }
        self.pending_commands
            .push_back(DeviceCommand::SetTolerance(tolerance));
        Ok(())
    }

    pub fn activate_virtual_heater(&mut self) {
        self.pending_commands
            .push_back(DeviceCommand::ActivateVirtualHeater);
    }

    pub fn settings(&self) -> &OperatorSettings {
        &self.settings
    }

    pub fn parameters(&self) -> Option<&ParameterSet> {
        self.parameters.as_ref()
    }

    pub fn model(&self) -> Option<&ThermalModel> {
        self.slot.get()
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_loaded()
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    /// The return temperature currently being reported to the rig, in deg C
    pub fn reported_return_temperature(&self) -> f64 {
        self.last_plausible_return_temperature
    }

    pub fn last_measured_return_temperature(&self) -> Option<f64> {
        self.last_measured_return_temperature
    }

    /// Mass flow used for derivation and stepping: the last measured flow, or the configured
    /// initial flow before the rig has reported one. Never below the mass flow floor. In kg/s.
    pub fn mass_flow(&self) -> f64 {
        self.last_mass_flow
            .unwrap_or_else(|| floored_mass_flow(self.settings.rig.initial_mass_flow))
    }

    fn derive_parameters(&self, settings: &OperatorSettings) -> Result<ParameterSet, LbtError> {
        let design = self
            .design_points
            .adjust_design_parameters(settings.ambient_temperature);
        let design_heating_power = settings
            .design_heating_power
            .unwrap_or(design.design_heating_power);
        let rig = &settings.rig;

        Ok(ParameterSet::derive(DesignConditions {
            ambient_temperature: settings.ambient_temperature,
            design_heating_power,
            design_flow_temperature: design.design_flow_temperature,
            condenser_sizing: CondenserSizing::ConstantMassFlow {
                mass_flow: self.mass_flow(),
            },
            building_temperature: rig.building_temperature,
            time_constant_building: rig.time_constant_building,
            time_constant_transfer: rig.time_constant_transfer,
            boost_enabled: design.boost_enabled,
            boost_max_power: settings.boost_heater_power,
        })?)
    }

    fn derive_or_count(&mut self, settings: &OperatorSettings) -> Result<ParameterSet, LbtError> {
        self.derive_parameters(settings).inspect_err(|e| {
            self.stats.derivation_failures += 1;
            error!("{e}; keeping the previous building model");
        })
    }

    fn load(&mut self, parameters: ParameterSet) {
        self.slot.replace(parameters.create());
        self.parameters = Some(parameters);
    }

    fn check_plausibility(&mut self, predicted: f64) -> (f64, Plausibility) {
        if !predicted.is_finite() {
            self.stats.implausible_outputs += 1;
            warn!(
                "Predicted return temperature is {predicted}; holding {} deg C",
                self.last_plausible_return_temperature
            );
            return (self.last_plausible_return_temperature, Plausibility::NonFinite);
        }
        if predicted < MINIMUM_PLAUSIBLE_RETURN_TEMPERATURE {
            self.stats.implausible_outputs += 1;
            warn!(
                "Predicted return temperature {predicted:.2} deg C is implausible; clamping to {MINIMUM_PLAUSIBLE_RETURN_TEMPERATURE} deg C"
            );
            return (MINIMUM_PLAUSIBLE_RETURN_TEMPERATURE, Plausibility::BelowMinimum);
        }
        self.last_plausible_return_temperature = predicted;
        (predicted, Plausibility::Plausible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::units::MINIMUM_MASS_FLOW;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn supply(temperature: f64) -> SensorFrame {
        SensorFrame {
            supply_temperature: Some(temperature),
            ..Default::default()
        }
    }

    fn full_frame(supply: f64, measured_return: f64, flow_rate: f64) -> SensorFrame {
        SensorFrame {
            supply_temperature: Some(supply),
            measured_return_temperature: Some(measured_return),
            flow_rate_litres_per_second: Some(flow_rate),
            dac_voltage: None,
        }
    }

    #[fixture]
    fn settings() -> OperatorSettings {
        OperatorSettings::new(7., 30.)
    }

    #[fixture]
    fn controller(settings: OperatorSettings) -> RigController {
        RigController::new(settings).unwrap()
    }

    #[fixture]
    fn running(mut controller: RigController) -> RigController {
        controller.initialize().unwrap();
        controller.take_pending_commands();
        controller
    }

    #[test]
    fn test_model_slot() {
        let mut slot = ModelSlot::empty();
        assert!(!slot.is_loaded());
        assert!(slot.get().is_none());

        let first = ThermalModel::new(500., 300., 1e6, 6e7, 7., 30., 20., 36., false, 0.);
        let second = ThermalModel::new(500., 300., 1e6, 6e7, -7., 40., 20., 52., true, 6e3);
        assert!(slot.replace(first).is_none());
        let replaced = slot.replace(second).unwrap();
        assert_eq!(replaced.ambient_temperature(), 7.);
        assert_eq!(slot.get().unwrap().ambient_temperature(), -7.);

        assert!(slot.clear().is_some());
        assert!(!slot.is_loaded());
    }

    #[test]
    fn test_new_rejects_invalid_settings() {
        assert_eq!(
            RigController::new(OperatorSettings::new(50., 30.)).err(),
            Some(LbtError::InvalidSettings(
                SettingsError::AmbientTemperatureOutOfRange(50.)
            ))
        );
    }

    #[rstest]
    fn test_no_step_without_model(mut controller: RigController) {
        assert!(controller.handle_frame(&supply(40.)).is_none());
        assert_eq!(controller.stats().steps, 0);
        assert_eq!(controller.stats().frames_while_stopped, 1);
        assert!(controller.take_pending_commands().is_empty());
    }

    #[rstest]
    fn test_initialize_loads_model_from_design_points(mut controller: RigController) {
        controller.initialize().unwrap();

        assert!(controller.is_running());
        let parameters = controller.parameters().unwrap();
        // 7 deg C test point: 10.8 kW at part-load ratio 0.346, flow at 36 deg C
        assert_relative_eq!(
            parameters.conditions().design_heating_power,
            10_800. * 0.346
        );
        assert_eq!(parameters.conditions().design_flow_temperature, 36.);
        assert!(!parameters.conditions().boost_enabled);
        assert_eq!(controller.model().unwrap().ambient_temperature(), 7.);
        assert_eq!(controller.reported_return_temperature(), 30.);
    }

    #[rstest]
    fn test_initialize_enables_boost_when_cold(mut settings: OperatorSettings) {
        settings.ambient_temperature = -12.;
        settings.boost_heater_power = 4_000.;
        let mut controller = RigController::new(settings).unwrap();
        controller.initialize().unwrap();

        let model = controller.model().unwrap();
        assert!(model.boost_enabled());
        assert_eq!(model.boost_max_power(), 4_000.);
        assert_eq!(model.design_flow_temperature(), 55.);
    }

    #[rstest]
    fn test_operator_design_power_overrides_table(mut settings: OperatorSettings) {
        settings.design_heating_power = Some(3_750.);
        let mut controller = RigController::new(settings).unwrap();
        controller.initialize().unwrap();

        assert_eq!(
            controller.parameters().unwrap().conditions().design_heating_power,
            3_750.
        );
    }

    #[rstest]
    fn test_initialize_queues_thermostat_commands(mut settings: OperatorSettings) {
        settings.target_temperature = Some(25.);
        settings.tolerance = Some(0.2);
        let mut controller = RigController::new(settings).unwrap();
        controller.initialize().unwrap();

        assert_eq!(
            controller.take_pending_commands(),
            vec![DeviceCommand::SetTemp(25.), DeviceCommand::SetTolerance(0.2)]
        );
    }

    #[rstest]
    fn test_step_sends_one_voltage_per_supply_sample(mut running: RigController) {
        let outcome = running.handle_frame(&full_frame(36., 30., 0.3)).unwrap();

        assert_eq!(outcome.time.index, 1);
        assert_eq!(outcome.plausibility, Plausibility::Plausible);
        assert_eq!(
            outcome.snapshot.return_temperature,
            running.model().unwrap().return_temperature()
        );
        assert_relative_eq!(
            outcome.voltage,
            DacMapping::default().temp_to_voltage(outcome.snapshot.return_temperature)
        );
        assert_eq!(
            running.take_pending_commands(),
            vec![DeviceCommand::SetVoltage(outcome.voltage)]
        );
        assert_eq!(running.stats().steps, 1);
    }

    #[rstest]
    fn test_frames_without_supply_only_update_measurements(mut running: RigController) {
        let frame = SensorFrame {
            measured_return_temperature: Some(33.),
            flow_rate_litres_per_second: Some(0.4),
            ..Default::default()
        };
        assert!(running.handle_frame(&frame).is_none());
        assert_eq!(running.stats().frames_without_supply, 1);
        assert_eq!(running.last_measured_return_temperature(), Some(33.));

        let outcome = running.handle_frame(&supply(38.)).unwrap();
        assert_eq!(outcome.measured_return_temperature, 33.);
        assert_eq!(outcome.mass_flow, 0.4);
    }

    #[rstest]
    fn test_fallback_return_temperature_before_first_measurement(mut running: RigController) {
        let outcome = running.handle_frame(&supply(40.)).unwrap();
        assert_eq!(outcome.measured_return_temperature, 35.);
    }

    #[rstest]
    fn test_flow_rate_is_converted_once_and_floored(mut running: RigController) {
        let outcome = running.handle_frame(&full_frame(36., 30., 0.31)).unwrap();
        assert_eq!(outcome.mass_flow, 0.31);

        let outcome = running.handle_frame(&full_frame(36., 30., 0.)).unwrap();
        assert_eq!(outcome.mass_flow, MINIMUM_MASS_FLOW);

        let outcome = running.handle_frame(&full_frame(36., 30., -0.2)).unwrap();
        assert_eq!(outcome.mass_flow, MINIMUM_MASS_FLOW);
    }

    #[rstest]
    fn test_negative_prediction_is_clamped_and_counted(mut running: RigController) {
        // a very cold supply drains the transfer system well below freezing in one step
        let outcome = running.handle_frame(&full_frame(-400., 30., 50.)).unwrap();

        assert!(outcome.snapshot.return_temperature < 0.);
        assert_eq!(outcome.plausibility, Plausibility::BelowMinimum);
        assert_eq!(outcome.setpoint_temperature, 0.);
        assert_eq!(outcome.voltage, 0.);
        assert_eq!(running.stats().implausible_outputs, 1);
        // the model itself is left alone
        assert_eq!(
            running.model().unwrap().return_temperature(),
            outcome.snapshot.return_temperature
        );
    }

    #[rstest]
    fn test_failed_update_keeps_previous_model(mut running: RigController) {
        let before = running.model().unwrap().snapshot();
        let mut settings = running.settings().clone();
        // the building set point must stay above ambient
        settings.rig.building_temperature = settings.ambient_temperature;

        assert!(matches!(
            running.update_settings(settings),
            Err(LbtError::Derivation(_))
        ));
        assert_eq!(running.stats().derivation_failures, 1);
        assert_eq!(running.model().unwrap().snapshot(), before);
        assert_eq!(running.settings().rig.building_temperature, 20.);
    }

    #[rstest]
    fn test_invalid_update_is_rejected_before_derivation(mut running: RigController) {
        assert!(matches!(
            running.update_settings_from_text([("ambient", "-41")]),
            Err(LbtError::InvalidSettings(
                SettingsError::AmbientTemperatureOutOfRange(_)
            ))
        ));
        assert_eq!(running.stats().derivation_failures, 0);
        assert_eq!(running.settings().ambient_temperature, 7.);
    }

    #[rstest]
    fn test_update_replaces_running_model(mut running: RigController) {
        running.handle_frame(&supply(36.));
        running
            .update_settings_from_text([("ambient", "-7")])
            .unwrap();

        let model = running.model().unwrap();
        assert_eq!(model.ambient_temperature(), -7.);
        assert_eq!(model.design_flow_temperature(), 52.);
        // the session carries on
        assert_eq!(running.clock().index(), 1);
    }

    #[rstest]
    fn test_update_while_stopped_only_stores_settings(mut controller: RigController) {
        controller
            .update_settings_from_text([("ambient", "2")])
            .unwrap();
        assert!(!controller.is_running());
        assert_eq!(controller.settings().ambient_temperature, 2.);
    }

    #[rstest]
    fn test_stop_unloads_model_and_zeroes_voltage(mut running: RigController) {
        running.stop();

        assert!(!running.is_running());
        assert_eq!(
            running.take_pending_commands(),
            vec![DeviceCommand::SetVoltage(0.)]
        );
        assert_eq!(
            DeviceCommand::SetVoltage(STOP_VOLTAGE).to_line(),
            "setVoltage 0.00\n"
        );
        assert!(running.handle_frame(&supply(40.)).is_none());
    }

    #[rstest]
    fn test_thermostat_requests(mut controller: RigController) {
        controller.request_target_temperature(24.).unwrap();
        controller.request_tolerance(0.5).unwrap();
        controller.activate_virtual_heater();
        assert!(controller.request_tolerance(-1.).is_err());
        assert!(controller.request_target_temperature(f64::NAN).is_err());

        assert_eq!(
            controller.take_pending_commands(),
            vec![
                DeviceCommand::SetTemp(24.),
                DeviceCommand::SetTolerance(0.5),
                DeviceCommand::ActivateVirtualHeater,
            ]
        );
    }
}
