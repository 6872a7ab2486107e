#![no_main]

use libfuzzer_sys::fuzz_target;
use minebench::signal::classify;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    let signals = classify(&line);

    // A reported thread count must appear in the line.
    if let Some(threads) = signals.threads_started() {
        assert!(line.contains(&threads.to_string()));
    }
});
