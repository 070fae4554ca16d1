use crate::controller::RigController;
use crate::errors::LbtError;
use parking_lot::Mutex;
use std::io::BufRead;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{error, info};

/// Commands the operator can type while a session runs.
#[derive(Clone, Debug, PartialEq)]
pub enum ConsoleCommand {
    Initialize,
    UpdateSettings(Vec<(String, String)>),
    Stop,
    SetTemperature(f64),
    SetTolerance(f64),
    ActivateVirtualHeater,
    Status,
    Quit,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConsoleError {
    #[error("Unknown command '{0}'; expected one of init, update, stop, temp, tolerance, heater, status, quit")]
    UnknownCommand(String),
    #[error("Command '{0}' needs a value")]
    MissingValue(&'static str),
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("Expected key=value, got '{0}'")]
    MalformedUpdate(String),
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();

        Ok(match command.to_ascii_lowercase().as_str() {
            "init" | "initialize" => Self::Initialize,
            "update" => {
                let pairs = words
                    .map(|word| {
                        word.split_once('=')
                            .map(|(key, value)| (key.to_string(), value.to_string()))
                            .ok_or_else(|| ConsoleError::MalformedUpdate(word.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if pairs.is_empty() {
                    return Err(ConsoleError::MissingValue("update"));
                }
                Self::UpdateSettings(pairs)
            }
            "stop" => Self::Stop,
            "temp" => Self::SetTemperature(number(words.next(), "temp")?),
            "tolerance" => Self::SetTolerance(number(words.next(), "tolerance")?),
            "heater" => Self::ActivateVirtualHeater,
            "status" => Self::Status,
            "quit" | "exit" => Self::Quit,
            _ => return Err(ConsoleError::UnknownCommand(command.to_string())),
        })
    }
}

fn number(word: Option<&str>, command: &'static str) -> Result<f64, ConsoleError> {
    let word = word.ok_or(ConsoleError::MissingValue(command))?;
    word.parse()
        .map_err(|_| ConsoleError::NotANumber(word.to_string()))
}

impl ConsoleCommand {
    /// Carry out the command. Returns a line to show the operator, if the command has one.
    pub fn apply(&self, controller: &mut RigController) -> Result<Option<String>, LbtError> {
        match self {
            Self::Initialize => controller.initialize()?,
            Self::UpdateSettings(pairs) => controller.update_settings_from_text(
                pairs
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str())),
            )?,
            Self::Stop => controller.stop(),
            Self::SetTemperature(temperature) => {
                controller.request_target_temperature(*temperature)?
            }
            Self::SetTolerance(tolerance) => controller.request_tolerance(*tolerance)?,
            Self::ActivateVirtualHeater => controller.activate_virtual_heater(),
            Self::Status => return Ok(Some(status_line(controller))),
            Self::Quit => {}
        }
        Ok(None)
    }
}

pub fn status_line(controller: &RigController) -> String {
    let stats = controller.stats();
    format!(
        "{} | t={} | ambient {} deg C | return {:.2} deg C | mass flow {:.3} kg/s | {} steps, {} implausible, {} failed derivations",
        if controller.is_running() { "running" } else { "stopped" },
        controller.clock().hms(),
        controller.settings().ambient_temperature,
        controller.reported_return_temperature(),
        controller.mass_flow(),
        stats.steps,
        stats.implausible_outputs,
        stats.derivation_failures,
    )
}

/// Read operator commands line by line until `quit` or the end of input. Bad commands are
/// reported and skipped. `quit` sets `shutdown`.
pub fn run_console(input: impl BufRead, controller: &Mutex<RigController>, shutdown: &AtomicBool) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Could not read operator input: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(e) => {
                error!("{e}");
                continue;
            }
        };
        if command == ConsoleCommand::Quit {
            info!("Quitting at operator request");
            shutdown.store(true, Ordering::Relaxed);
            break;
        }
        match command.apply(&mut controller.lock()) {
            Ok(Some(message)) => info!("{message}"),
            Ok(None) => {}
            Err(e) => error!("{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::OperatorSettings;
    use crate::protocol::DeviceCommand;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::io::Cursor;

    #[fixture]
    fn controller() -> RigController {
        RigController::new(OperatorSettings::new(7., 30.)).unwrap()
    }

    #[rstest]
    #[case("init", ConsoleCommand::Initialize)]
    #[case("  STOP ", ConsoleCommand::Stop)]
    #[case("temp 25", ConsoleCommand::SetTemperature(25.))]
    #[case("tolerance 0.1", ConsoleCommand::SetTolerance(0.1))]
    #[case("heater", ConsoleCommand::ActivateVirtualHeater)]
    #[case("status", ConsoleCommand::Status)]
    #[case("exit", ConsoleCommand::Quit)]
    #[case(
        "update ambient=-7 power=4200",
        ConsoleCommand::UpdateSettings(vec![
            ("ambient".to_string(), "-7".to_string()),
            ("power".to_string(), "4200".to_string()),
        ])
    )]
    fn test_parse(#[case] line: &str, #[case] expected: ConsoleCommand) {
        assert_eq!(line.parse::<ConsoleCommand>().unwrap(), expected);
    }

    #[rstest]
    #[case("launch", ConsoleError::UnknownCommand("launch".to_string()))]
    #[case("temp", ConsoleError::MissingValue("temp"))]
    #[case("tolerance wide", ConsoleError::NotANumber("wide".to_string()))]
    #[case("update", ConsoleError::MissingValue("update"))]
    #[case("update ambient", ConsoleError::MalformedUpdate("ambient".to_string()))]
    fn test_parse_errors(#[case] line: &str, #[case] expected: ConsoleError) {
        assert_eq!(line.parse::<ConsoleCommand>(), Err(expected));
    }

    #[rstest]
    fn test_apply(mut controller: RigController) {
        ConsoleCommand::Initialize.apply(&mut controller).unwrap();
        assert!(controller.is_running());

        ConsoleCommand::SetTemperature(25.)
            .apply(&mut controller)
            .unwrap();
        ConsoleCommand::Stop.apply(&mut controller).unwrap();
        assert!(!controller.is_running());
        assert_eq!(
            controller.take_pending_commands(),
            vec![DeviceCommand::SetTemp(25.), DeviceCommand::SetVoltage(0.)]
        );

        let status = ConsoleCommand::Status.apply(&mut controller).unwrap().unwrap();
        assert!(status.starts_with("stopped"));
    }

    #[rstest]
    fn test_apply_rejected_update(mut controller: RigController) {
        let result = ConsoleCommand::UpdateSettings(vec![("return".into(), "5".into())])
            .apply(&mut controller);
        assert!(matches!(result, Err(LbtError::InvalidSettings(_))));
    }

    #[rstest]
    fn test_run_console(controller: RigController) {
        let controller = Mutex::new(controller);
        let shutdown = AtomicBool::new(false);
        let input = Cursor::new("init\nnonsense\n\nupdate ambient=2\nquit\ninit\n");

        run_console(input, &controller, &shutdown);

        assert!(shutdown.load(Ordering::Relaxed));
        let controller = controller.lock();
        assert!(controller.is_running());
        assert_eq!(controller.settings().ambient_temperature, 2.);
    }
}
