#![allow(clippy::too_many_arguments)]

mod compare_floats;
pub mod console;
pub mod controller;
pub mod core;
pub mod errors;
pub mod input;
pub mod mock_rig;
pub mod protocol;
pub mod scheduler;
pub mod session_time;


pub use crate::controller::RigController;
use crate::input::ingest_settings;
use crate::protocol::RigLink;
pub use crate::scheduler::{Pacing, Scheduler, SessionSummary};
use parking_lot::Mutex;
use std::io::Read;
use std::sync::atomic::AtomicBool;

/// Build a controller from a settings file and initialize its building model.
pub fn initialized_controller(settings: impl Read) -> Result<RigController, anyhow::Error> {
    let settings = ingest_settings(settings)?;
    let mut controller = RigController::new(settings)?;
    controller.initialize()?;
    Ok(controller)
}

/// Run a whole session without operator input: initialize from the settings, then drive the
/// controller from `link` until it closes or the scheduler's step limit is reached.
pub fn run_session(
    settings: impl Read,
    link: &mut impl RigLink,
    scheduler: &Scheduler,
) -> Result<SessionSummary, anyhow::Error> {
    let controller = Mutex::new(initialized_controller(settings)?);
    scheduler.run(&controller, link, &AtomicBool::new(false))
}
