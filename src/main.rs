extern crate lbt;

use clap::{Args, Parser};
use lbt::console::run_console;
use lbt::mock_rig::MockRig;
use lbt::protocol::{LineLink, RigLink};
use lbt::{initialized_controller, Pacing, Scheduler, SessionSummary};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct LbtArgs {
    /// JSON file with the operator settings
    settings_file: String,
    #[command(flatten)]
    link: LinkChoice,
    /// Tick interval in live and mock mode, in ms
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,
    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,
    /// End the session after this many model steps
    #[arg(long)]
    max_steps: Option<u64>,
    /// Seed for the mock rig
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Args, Clone, Debug)]
#[group(required = true, multiple = false)]
struct LinkChoice {
    /// Serial device node of the rig, e.g. /dev/ttyACM0
    #[arg(long)]
    device: Option<String>,
    /// Recorded frame log to replay; commands are written to stdout
    #[arg(long)]
    replay: Option<String>,
    /// Run against a simulated rig
    #[arg(long)]
    mock: bool,
}

fn main() -> anyhow::Result<()> {
    let args = LbtArgs::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let controller = Arc::new(Mutex::new(initialized_controller(BufReader::new(
        File::open(&args.settings_file)?,
    ))?));
    let shutdown = Arc::new(AtomicBool::new(false));
    let live = Pacing::Fixed(Duration::from_millis(args.tick_ms));

    let (mut link, pacing, interactive): (Box<dyn RigLink>, Pacing, bool) = match args.link {
        LinkChoice {
            device: Some(device),
            ..
        } => {
            let port = OpenOptions::new().read(true).write(true).open(&device)?;
            info!("Connected to rig on {device}");
            (
                Box::new(LineLink::new(BufReader::new(port.try_clone()?), port)),
                live,
                true,
            )
        }
        LinkChoice {
            replay: Some(replay),
            ..
        } => (
            Box::new(LineLink::new(
                BufReader::new(File::open(&replay)?),
                io::stdout().lock(),
            )),
            Pacing::Unpaced,
            false,
        ),
        LinkChoice { .. } => {
            let dac = controller.lock().settings().rig.dac.mapping()?;
            (Box::new(MockRig::new(args.seed, dac)?), live, true)
        }
    };

    if interactive {
        let controller = Arc::clone(&controller);
        let shutdown = Arc::clone(&shutdown);
        // not joined: the thread stays blocked on stdin until the process exits
        thread::spawn(move || run_console(io::stdin().lock(), &controller, &shutdown));
    }

    let scheduler = Scheduler::new(pacing).with_max_steps(args.max_steps);
    let summary = scheduler.run(&controller, &mut *link, &shutdown)?;

    if interactive {
        controller.lock().stop();
        scheduler.send_pending_commands(&controller, &mut *link, &mut SessionSummary::default())?;
    }
    info!("Session finished: {}", serde_json::to_string(&summary)?);

    Ok(())
}
