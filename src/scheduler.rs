use crate::controller::{ControllerStats, RigController, StepOutcome};
use crate::protocol::{parse_frame, ProtocolError, RigLink};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tick interval when driving a live rig.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pacing {
    /// At most one frame per interval
    Fixed(Duration),
    /// As fast as frames arrive, for replaying recorded logs
    Unpaced,
}

impl Default for Pacing {
    fn default() -> Self {
        Self::Fixed(DEFAULT_TICK_INTERVAL)
    }
}

/// What happened on one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tick {
    Stepped(StepOutcome),
    /// A line was read but did not advance the model
    Idle,
    /// The link has no more lines
    Closed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub lines_read: u64,
    pub frames: u64,
    pub non_frames: u64,
    pub field_errors: u64,
    pub commands_sent: u64,
    pub controller: ControllerStats,
}

/// Drives a [RigController] from a [RigLink]: each tick pulls at most one line, steps the
/// controller at most once, and sends whatever commands the controller has queued.
#[derive(Clone, Copy, Debug, Default)]
pub struct Scheduler {
    pacing: Pacing,
    max_steps: Option<u64>,
}

impl Scheduler {
    pub fn new(pacing: Pacing) -> Self {
        Self {
            pacing,
            max_steps: None,
        }
    }

    /// Stop the session after this many model steps.
    pub fn with_max_steps(self, max_steps: Option<u64>) -> Self {
        Self { max_steps, ..self }
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    /// Tick until the link closes, `shutdown` is set, or the step limit is reached. Commands
    /// still queued at that point are sent before returning.
    pub fn run<L: RigLink + ?Sized>(
        &self,
        controller: &Mutex<RigController>,
        link: &mut L,
        shutdown: &AtomicBool,
    ) -> anyhow::Result<SessionSummary> {
        let mut summary = SessionSummary::default();
        let mut steps = 0;

        while !shutdown.load(Ordering::Relaxed) {
            let started = Instant::now();
            match self.tick(controller, link, &mut summary)? {
                Tick::Closed => {
                    info!("Rig link closed");
                    break;
                }
                Tick::Stepped(_) => steps += 1,
                Tick::Idle => {}
            }
            if self.max_steps.is_some_and(|max_steps| steps >= max_steps) {
                info!("Reached step limit of {steps}");
                break;
            }
            if let Pacing::Fixed(interval) = self.pacing {
                thread::sleep(interval.saturating_sub(started.elapsed()));
            }
        }

        self.send_pending_commands(controller, link, &mut summary)?;
        summary.controller = controller.lock().stats();
        Ok(summary)
    }

    pub fn tick<L: RigLink + ?Sized>(
        &self,
        controller: &Mutex<RigController>,
        link: &mut L,
        summary: &mut SessionSummary,
    ) -> anyhow::Result<Tick> {
        // console commands may have queued something since the last tick
        self.send_pending_commands(controller, link, summary)?;

        let Some(line) = link.receive_line()? else {
            return Ok(Tick::Closed);
        };
        summary.lines_read += 1;

        let parsed = match parse_frame(&line) {
            Ok(parsed) => parsed,
            Err(ProtocolError::NotAFrame(line)) => {
                summary.non_frames += 1;
                debug!("Ignoring line from rig: {line:?}");
                return Ok(Tick::Idle);
            }
            Err(e) => {
                summary.field_errors += 1;
                warn!("{e}");
                return Ok(Tick::Idle);
            }
        };
        summary.frames += 1;
        for field_error in &parsed.field_errors {
            summary.field_errors += 1;
            warn!("{field_error}");
        }
        if !parsed.unknown_keys.is_empty() {
            debug!("Ignoring unknown frame keys {:?}", parsed.unknown_keys);
        }

        let outcome = controller.lock().handle_frame(&parsed.frame);
        self.send_pending_commands(controller, link, summary)?;

        Ok(match outcome {
            Some(outcome) => Tick::Stepped(outcome),
            None => Tick::Idle,
        })
    }

    /// Send whatever the controller has queued.
    pub fn send_pending_commands<L: RigLink + ?Sized>(
        &self,
        controller: &Mutex<RigController>,
        link: &mut L,
        summary: &mut SessionSummary,
    ) -> anyhow::Result<()> {
        let commands = controller.lock().take_pending_commands();
        for command in commands {
            link.send(&command)?;
            summary.commands_sent += 1;
        }
        Ok(())
    }
}
