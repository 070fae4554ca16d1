use std::fmt::{Display, Formatter};
use std::io::{BufRead, Write};
use strum::EnumString;
use thiserror::Error;

/// This module covers the text protocol spoken with the rig's microcontroller: sensor frames
/// such as `STemp:45.2,RTemp:38.1,FlowRate:0.31,DACVolt:2.10` come in, one per line, and
/// commands such as `setVoltage 1.91` go out.

/// Keys of the fields in a sensor frame that the controller understands.
#[derive(Clone, Copy, Debug, strum::Display, EnumString, PartialEq, Eq, Hash)]
pub enum FrameKey {
    #[strum(serialize = "STemp")]
    SupplyTemperature,
    #[strum(serialize = "RTemp")]
    ReturnTemperature,
    #[strum(serialize = "FlowRate")]
    FlowRate,
    #[strum(serialize = "DACVolt")]
    DacVoltage,
}

/// The values of one sensor frame. Any field may be missing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SensorFrame {
    /// in deg C
    pub supply_temperature: Option<f64>,
    /// in deg C
    pub measured_return_temperature: Option<f64>,
    /// Volume flow as reported by the flow meter, in L/s
    pub flow_rate_litres_per_second: Option<f64>,
    /// Voltage the DAC is currently putting out, in V
    pub dac_voltage: Option<f64>,
}

impl SensorFrame {
    fn set(&mut self, key: FrameKey, value: f64) {
        match key {
            FrameKey::SupplyTemperature => self.supply_temperature = Some(value),
            FrameKey::ReturnTemperature => self.measured_return_temperature = Some(value),
            FrameKey::FlowRate => self.flow_rate_litres_per_second = Some(value),
            FrameKey::DacVoltage => self.dac_voltage = Some(value),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("Line is not a sensor frame: {0:?}")]
    NotAFrame(String),
    #[error("Field {key} has a value that is not a finite number: {value:?}")]
    BadValue { key: FrameKey, value: String },
}

/// A parsed frame along with the problems found in individual fields. Fields with problems are
/// left out of the frame; the rest of the frame is still usable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedFrame {
    pub frame: SensorFrame,
    pub field_errors: Vec<ProtocolError>,
    pub unknown_keys: Vec<String>,
}

pub fn parse_frame(line: &str) -> Result<ParsedFrame, ProtocolError> {
    let line = line.trim();
    if !line.contains(':') {
        return Err(ProtocolError::NotAFrame(line.to_string()));
    }

    let mut parsed = ParsedFrame::default();
    for (key, value) in line.split(',').filter_map(|field| field.split_once(':')) {
        let (key, value) = (key.trim(), value.trim());
        let Ok(frame_key) = key.parse::<FrameKey>() else {
            parsed.unknown_keys.push(key.to_string());
            continue;
        };
        match value.parse::<f64>() {
            Ok(number) if number.is_finite() => parsed.frame.set(frame_key, number),
            _ => parsed.field_errors.push(ProtocolError::BadValue {
                key: frame_key,
                value: value.to_string(),
            }),
        }
    }

    Ok(parsed)
}

/// Commands understood by the rig's firmware.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeviceCommand {
    /// Output voltage of the DAC, in V
    SetVoltage(f64),
    /// Target temperature of the rig's own thermostat, in deg C
    SetTemp(f64),
    /// Tolerance of the rig's own thermostat, in K
    SetTolerance(f64),
    ActivateVirtualHeater,
}

impl DeviceCommand {
    /// The command as written to the serial link, including the line ending.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl Display for DeviceCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceCommand::SetVoltage(voltage) => write!(f, "setVoltage {voltage:.2}"),
            DeviceCommand::SetTemp(temperature) => write!(f, "setTemp {temperature}"),
            DeviceCommand::SetTolerance(tolerance) => write!(f, "setTolerance {tolerance}"),
            DeviceCommand::ActivateVirtualHeater => write!(f, "activateVirtualHeater"),
        }
    }
}

/// A line-oriented connection to the rig.
pub trait RigLink {
    /// The next line received from the rig, without its line ending, or `None` once the link
    /// has been closed.
    fn receive_line(&mut self) -> anyhow::Result<Option<String>>;

    fn send(&mut self, command: &DeviceCommand) -> anyhow::Result<()>;
}

/// A [RigLink] over any reader and writer: a serial device node opened as a file, a recorded
/// log replayed against stdout, or in-memory buffers.
#[derive(Debug)]
pub struct LineLink<R, W> {
    reader: R,
    writer: W,
    buffer: Vec<u8>,
}

impl<R: BufRead, W: Write> LineLink<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buffer: Vec::with_capacity(64),
        }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R: BufRead, W: Write> RigLink for LineLink<R, W> {
    fn receive_line(&mut self) -> anyhow::Result<Option<String>> {
        self.buffer.clear();
        if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
            return Ok(None);
        }
        // line noise on the serial link must not end the session
        let line = String::from_utf8_lossy(&self.buffer);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn send(&mut self, command: &DeviceCommand) -> anyhow::Result<()> {
        self.writer.write_all(command.to_line().as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}
