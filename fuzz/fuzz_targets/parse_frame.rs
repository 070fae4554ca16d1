#![no_main]

use lbt::protocol::parse_frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|line: &str| {
    if let Ok(parsed) = parse_frame(line) {
        let frame = parsed.frame;
        for value in [
            frame.supply_temperature,
            frame.measured_return_temperature,
            frame.flow_rate_litres_per_second,
            frame.dac_voltage,
        ]
        .into_iter()
        .flatten()
        {
            assert!(value.is_finite());
        }
    }
});
