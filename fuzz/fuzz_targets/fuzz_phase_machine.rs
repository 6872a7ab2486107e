#![no_main]

use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use minebench::phase::{Phase, PhaseMachine, PhaseTimings};
use minebench::signal::classify;
use tokio::time::Instant;

const LINES: [&str; 4] = [
    "starting mining attempt on thread 0",
    "mining threads started with 8 threads",
    "received new candidate block header",
    "noise",
];

// Each byte is one step: the low two bits pick a line to observe, the rest
// advance the clock in milliseconds before a tick.
fuzz_target!(|data: &[u8]| {
    let start = Instant::now();
    let timings = PhaseTimings {
        warmup: Duration::from_millis(200),
        measure: Duration::from_millis(500),
        hard_start_timeout: Duration::from_millis(300),
    };
    let mut machine = PhaseMachine::new(timings, start);
    let mut now = start;
    let mut last = Phase::Starting;

    for byte in data {
        let signals = classify(LINES[usize::from(byte & 0b11)]);
        machine.observe(&signals, now);
        now += Duration::from_millis(u64::from(byte >> 2));
        machine.tick(now);

        let phase = machine.phase();
        assert!(phase >= last, "phase went backwards: {last:?} -> {phase:?}");
        last = phase;

        let counters = machine.counters();
        assert!(counters.attempts_in_window <= counters.attempts_total);
        if !counters.saw_threads_started {
            assert_eq!(counters.attempts_total, 0);
        }
    }
});
