//! Log line classification.
//!
//! Turns one line of node output into the set of semantic events it
//! carries. The classifier is a pure function: it holds no state, never
//! fails, and unmatched text simply yields an empty [`SignalSet`].

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static ATTEMPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)starting mining attempt on thread").expect("attempt pattern is valid")
});

static THREADS_STARTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)mining threads started with\s+([0-9]+)\s+threads")
        .expect("threads-started pattern is valid")
});

static MINE_EFFECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\breceived new candidate block header\b|\[%mining-on\b")
        .expect("mine-effect pattern is valid")
});

/// A semantic event extracted from a single line of node output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", content = "threads", rename_all = "snake_case")]
pub enum LogSignal {
    /// The node started one mining attempt on a worker thread.
    Attempt,
    /// The node confirmed its mining thread pool is running, with the
    /// reported thread count.
    ThreadsStarted(u32),
    /// The node received mining work (a new candidate block header or a
    /// `%mining-on` effect).
    MineEffect,
}

impl std::fmt::Display for LogSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attempt => f.write_str("attempt"),
            Self::ThreadsStarted(n) => write!(f, "threads_started({n})"),
            Self::MineEffect => f.write_str("mine_effect"),
        }
    }
}

/// The signals found on one line.
///
/// Each signal kind appears at most once per line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalSet {
    attempt: bool,
    threads_started: Option<u32>,
    mine_effect: bool,
}

impl SignalSet {
    /// Returns a set with no signals.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            attempt: false,
            threads_started: None,
            mine_effect: false,
        }
    }

    /// Builds a set from individual signals. Later `ThreadsStarted` values
    /// replace earlier ones.
    #[must_use]
    pub fn from_signals(signals: &[LogSignal]) -> Self {
        let mut set = Self::empty();
        for signal in signals {
            match *signal {
                LogSignal::Attempt => set.attempt = true,
                LogSignal::ThreadsStarted(n) => set.threads_started = Some(n),
                LogSignal::MineEffect => set.mine_effect = true,
            }
        }
        set
    }

    /// Whether the line reported a mining attempt.
    #[must_use]
    pub const fn has_attempt(&self) -> bool {
        self.attempt
    }

    /// The thread count from a thread-start confirmation, if present.
    #[must_use]
    pub const fn threads_started(&self) -> Option<u32> {
        self.threads_started
    }

    /// Whether the line carried a mine effect.
    #[must_use]
    pub const fn has_mine_effect(&self) -> bool {
        self.mine_effect
    }

    /// Returns `true` if no signal was found.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.attempt && self.threads_started.is_none() && !self.mine_effect
    }

    /// Iterates the signals in a fixed order: mine effect, threads started,
    /// attempt.
    pub fn iter(&self) -> impl Iterator<Item = LogSignal> + use<> {
        let mine = self.mine_effect.then_some(LogSignal::MineEffect);
        let threads = self.threads_started.map(LogSignal::ThreadsStarted);
        let attempt = self.attempt.then_some(LogSignal::Attempt);
        [mine, threads, attempt].into_iter().flatten()
    }
}

/// Classifies one line of node output.
///
/// Matching is case-insensitive. Thread counts are ASCII digits only; a
/// count too large for `u32` saturates to `u32::MAX` rather than dropping
/// the confirmation.
#[must_use]
pub fn classify(line: &str) -> SignalSet {
    let threads_started = THREADS_STARTED.captures(line).map(|caps| {
        caps.get(1)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(u32::MAX)
    });

    SignalSet {
        attempt: ATTEMPT.is_match(line),
        threads_started,
        mine_effect: MINE_EFFECT.is_match(line),
    }
}
