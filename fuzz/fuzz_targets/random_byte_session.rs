#![no_main]

use lbt::protocol::LineLink;
use lbt::{run_session, Pacing, Scheduler};
use libfuzzer_sys::fuzz_target;
use std::io::{self, Cursor};

const SETTINGS: &str = r#"{"ambient_temperature": -12, "initial_return_temperature": 30}"#;

fuzz_target!(|data: &[u8]| {
    // arbitrary bytes from the serial link must never bring the session down
    let mut link = LineLink::new(Cursor::new(data), io::sink());
    let summary = run_session(
        Cursor::new(SETTINGS),
        &mut link,
        &Scheduler::new(Pacing::Unpaced),
    )
    .unwrap();
    assert_eq!(summary.controller.derivation_failures, 0);
});
