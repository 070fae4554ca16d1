use crate::core::dac::DacMapping;
use crate::protocol::{DeviceCommand, RigLink};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64;
use tracing::debug;

/// First line the mock rig sends, as the real firmware announces itself before streaming frames.
pub const MOCK_RIG_BANNER: &str = "Mock rig ready";

const DEFAULT_SUPPLY_TEMPERATURE: f64 = 36.;
const DEFAULT_SUPPLY_JITTER: f64 = 0.2;
/// Fraction of the gap to the setpoint the simulated return temperature closes per frame.
const RETURN_RESPONSE: f64 = 0.2;
const FLOW_RATE_RANGE: std::ops::Range<f64> = 0.2..0.4;

/// A stand-in for the rig's microcontroller. Sends frames with a jittered supply temperature,
/// a return temperature that follows the last voltage setpoint, and a varying flow rate.
#[derive(Debug)]
pub struct MockRig {
    rng: Pcg64,
    dac: DacMapping,
    supply_temperature: f64,
    supply_jitter: Normal<f64>,
    return_temperature: f64,
    setpoint_temperature: f64,
    voltage: f64,
    virtual_heater_active: bool,
    lines_sent: u64,
    line_limit: Option<u64>,
    received: Vec<DeviceCommand>,
}

impl MockRig {
    pub fn new(seed: u64, dac: DacMapping) -> anyhow::Result<Self> {
        let voltage = dac.min_voltage();
        let return_temperature = dac.voltage_to_temp(voltage);
        Ok(Self {
            rng: Pcg64::seed_from_u64(seed),
            dac,
            supply_temperature: DEFAULT_SUPPLY_TEMPERATURE,
            supply_jitter: Normal::new(0., DEFAULT_SUPPLY_JITTER)?,
            return_temperature,
            setpoint_temperature: return_temperature,
            voltage,
            virtual_heater_active: false,
            lines_sent: 0,
            line_limit: None,
            received: vec![],
        })
    }

    /// Close the link after this many lines, banner included.
    pub fn with_line_limit(self, line_limit: Option<u64>) -> Self {
        Self { line_limit, ..self }
    }

    /// Commands received so far, oldest first.
    pub fn received(&self) -> &[DeviceCommand] {
        &self.received
    }

    pub fn virtual_heater_active(&self) -> bool {
        self.virtual_heater_active
    }

    fn next_frame(&mut self) -> String {
        self.return_temperature +=
            (self.setpoint_temperature - self.return_temperature) * RETURN_RESPONSE;
        let supply_temperature =
            self.supply_temperature + self.supply_jitter.sample(&mut self.rng);
        let flow_rate = self.rng.random_range(FLOW_RATE_RANGE);

        format!(
            "STemp:{supply_temperature:.2},RTemp:{:.2},FlowRate:{flow_rate:.2},DACVolt:{:.2}",
            self.return_temperature, self.voltage
        )
    }
}

impl RigLink for MockRig {
    fn receive_line(&mut self) -> anyhow::Result<Option<String>> {
        if self
            .line_limit
            .is_some_and(|line_limit| self.lines_sent >= line_limit)
        {
            return Ok(None);
        }
        let line = if self.lines_sent == 0 {
            MOCK_RIG_BANNER.to_string()
        } else {
            self.next_frame()
        };
        self.lines_sent += 1;
        Ok(Some(line))
    }

    fn send(&mut self, command: &DeviceCommand) -> anyhow::Result<()> {
        debug!("Mock rig received: {command}");
        match *command {
            DeviceCommand::SetVoltage(voltage) => {
                self.voltage = voltage;
                self.setpoint_temperature = self.dac.voltage_to_temp(voltage);
            }
            DeviceCommand::SetTemp(temperature) => self.supply_temperature = temperature,
            DeviceCommand::SetTolerance(tolerance) => {
                self.supply_jitter = Normal::new(0., tolerance)?;
            }
            DeviceCommand::ActivateVirtualHeater => self.virtual_heater_active = true,
        }
        self.received.push(*command);
        Ok(())
    }
}
