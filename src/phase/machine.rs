//! Phase transition logic.
//!
//! The machine is fed two kinds of input: the signals of each output line
//! ([`PhaseMachine::observe`]) and bare clock ticks ([`PhaseMachine::tick`])
//! so time gates still fire while the node is silent. Both take the
//! observation instant explicitly, which keeps the machine deterministic
//! under test.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::signal::SignalSet;

use super::state::{Counters, Phase, PhaseTransition, TransitionReason};

/// Time gates for one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimings {
    /// Time to spend in `Warming` before counting.
    pub warmup: Duration,
    /// Length of the measurement window.
    pub measure: Duration,
    /// Maximum time in `Starting` without a thread-start confirmation.
    pub hard_start_timeout: Duration,
}

/// Per-trial state machine.
///
/// Phases only move forward. Attempts are ignored until a thread-start
/// confirmation has been seen, in every phase.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    timings: PhaseTimings,
    phase: Phase,
    counters: Counters,
    launched_at: Instant,
    warming_at: Option<Instant>,
    measuring_at: Option<Instant>,
    done_at: Option<Instant>,
}

impl PhaseMachine {
    /// Creates a machine in [`Phase::Starting`] for a node launched at
    /// `launched_at`.
    #[must_use]
    pub fn new(timings: PhaseTimings, launched_at: Instant) -> Self {
        Self {
            timings,
            phase: Phase::Starting,
            counters: Counters::default(),
            launched_at,
            warming_at: None,
            measuring_at: None,
            done_at: None,
        }
    }

    /// Applies the signals of one line observed at `now`, then evaluates
    /// transitions.
    ///
    /// Counting happens before transitions: an attempt on the line that
    /// opens the window is not part of it, one on the line that closes the
    /// window is.
    pub fn observe(&mut self, signals: &SignalSet, now: Instant) -> Vec<PhaseTransition> {
        if self.phase == Phase::Done {
            return Vec::new();
        }

        if signals.has_mine_effect() {
            self.counters.saw_mine_effect = true;
        }

        if let Some(threads) = signals.threads_started() {
            self.counters.saw_threads_started = true;
            self.counters.threads_reported = Some(threads);
        }

        if signals.has_attempt() {
            if self.counters.saw_threads_started {
                self.counters.attempts_total = self.counters.attempts_total.saturating_add(1);
                if self.phase == Phase::Measuring {
                    self.counters.attempts_in_window =
                        self.counters.attempts_in_window.saturating_add(1);
                }
            } else {
                debug!("attempt before thread start dropped");
            }
        }

        self.advance(now)
    }

    /// Evaluates time-based transitions at `now` without new signals.
    pub fn tick(&mut self, now: Instant) -> Vec<PhaseTransition> {
        self.advance(now)
    }

    /// Applies every transition due at `now`. A zero warmup can take a
    /// trial from `Starting` straight through to `Measuring` in one call.
    fn advance(&mut self, now: Instant) -> Vec<PhaseTransition> {
        let mut transitions = Vec::new();
        while let Some(transition) = self.next_transition(now) {
            transitions.push(transition);
        }
        transitions
    }

    fn next_transition(&mut self, now: Instant) -> Option<PhaseTransition> {
        let reason = match self.phase {
            Phase::Starting => {
                if self.counters.saw_threads_started {
                    TransitionReason::ThreadsStarted
                } else if now.saturating_duration_since(self.launched_at)
                    >= self.timings.hard_start_timeout
                {
                    TransitionReason::HardStartTimeout
                } else {
                    return None;
                }
            }
            Phase::Warming => {
                let entered = self.warming_at?;
                if now.saturating_duration_since(entered) < self.timings.warmup {
                    return None;
                }
                TransitionReason::WarmupElapsed
            }
            Phase::Measuring => {
                let entered = self.measuring_at?;
                if now.saturating_duration_since(entered) < self.timings.measure {
                    return None;
                }
                TransitionReason::MeasureElapsed
            }
            Phase::Done => return None,
        };

        let from = self.phase;
        let to = from.next()?;
        self.enter(to, now);

        Some(PhaseTransition {
            from,
            to,
            at: now,
            since_launch: now.saturating_duration_since(self.launched_at),
            reason,
        })
    }

    fn enter(&mut self, phase: Phase, now: Instant) {
        match phase {
            Phase::Starting => {}
            Phase::Warming => self.warming_at = Some(now),
            Phase::Measuring => {
                self.measuring_at = Some(now);
                self.counters.attempts_in_window = 0;
            }
            Phase::Done => self.done_at = Some(now),
        }
        self.phase = phase;
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Snapshot of the counters.
    #[must_use]
    pub const fn counters(&self) -> Counters {
        self.counters
    }

    /// Returns `true` once the measurement window has closed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// The configured time gates.
    #[must_use]
    pub const fn timings(&self) -> PhaseTimings {
        self.timings
    }

    /// When the node was launched.
    #[must_use]
    pub const fn launched_at(&self) -> Instant {
        self.launched_at
    }

    /// When `Warming` was entered.
    #[must_use]
    pub const fn warming_entered_at(&self) -> Option<Instant> {
        self.warming_at
    }

    /// When `Measuring` was entered.
    #[must_use]
    pub const fn measuring_entered_at(&self) -> Option<Instant> {
        self.measuring_at
    }

    /// When `Done` was entered.
    #[must_use]
    pub const fn done_at(&self) -> Option<Instant> {
        self.done_at
    }

    /// Actual length of the measurement window.
    ///
    /// Measured from `Measuring` entry to `Done` entry, or to `now` if the
    /// window is still open. `None` if `Measuring` was never entered.
    #[must_use]
    pub fn window_at(&self, now: Instant) -> Option<Duration> {
        let start = self.measuring_at?;
        let end = self.done_at.unwrap_or(now);
        Some(end.saturating_duration_since(start))
    }

    /// Actual length of a closed measurement window.
    #[must_use]
    pub fn window(&self) -> Option<Duration> {
        let done = self.done_at?;
        self.window_at(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{LogSignal, SignalSet, classify};
    use proptest::prelude::*;

    fn timings(warmup: u64, measure: u64) -> PhaseTimings {
        PhaseTimings {
            warmup: Duration::from_secs(warmup),
            measure: Duration::from_secs(measure),
            hard_start_timeout: Duration::from_secs(90),
        }
    }

    fn at(base: Instant, secs: f64) -> Instant {
        base + Duration::from_secs_f64(secs)
    }

    fn threads(n: u32) -> SignalSet {
        SignalSet::from_signals(&[LogSignal::ThreadsStarted(n)])
    }

    fn attempt() -> SignalSet {
        SignalSet::from_signals(&[LogSignal::Attempt])
    }

    #[test]
    fn starts_in_starting() {
        let machine = PhaseMachine::new(timings(45, 180), Instant::now());
        assert_eq!(machine.phase(), Phase::Starting);
        assert_eq!(machine.counters(), Counters::default());
        assert!(machine.window().is_none());
    }

    #[test]
    fn hard_start_timeout_enters_warming_at_ninety_seconds() {
        let base = Instant::now();
        let mut machine = PhaseMachine::new(timings(45, 180), base);

        let mut fired = Vec::new();
        for second in 1..=95 {
            fired.extend(machine.tick(at(base, f64::from(second))));
        }

        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].reason, TransitionReason::HardStartTimeout);
        assert_eq!(fired[0].to, Phase::Warming);
        assert_eq!(machine.warming_entered_at(), Some(at(base, 90.0)));
        assert_eq!(machine.phase(), Phase::Warming);
        assert!(!machine.counters().saw_threads_started);
    }

    #[test]
    fn warmup_attempts_do_not_reach_the_window() {
        let base = Instant::now();
        let mut machine = PhaseMachine::new(timings(45, 180), base);

        let t = machine.observe(&threads(64), at(base, 5.0));
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].reason, TransitionReason::ThreadsStarted);
        assert_eq!(machine.warming_entered_at(), Some(at(base, 5.0)));

        assert!(machine.observe(&attempt(), at(base, 6.0)).is_empty());

        let t = machine.observe(&attempt(), at(base, 50.0));
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].to, Phase::Measuring);
        assert_eq!(machine.measuring_entered_at(), Some(at(base, 50.0)));

        let counters = machine.counters();
        assert_eq!(counters.attempts_in_window, 0);
        assert_eq!(counters.attempts_total, 2);
        assert_eq!(counters.threads_reported, Some(64));
    }

    #[test]
    fn attempts_before_thread_start_are_dropped_in_every_phase() {
        let base = Instant::now();
        let mut machine = PhaseMachine::new(timings(10, 60), base);

        machine.observe(&attempt(), at(base, 1.0));
        machine.tick(at(base, 90.0));
        assert_eq!(machine.phase(), Phase::Warming);
        machine.observe(&attempt(), at(base, 95.0));
        machine.tick(at(base, 100.0));
        assert_eq!(machine.phase(), Phase::Measuring);
        machine.observe(&attempt(), at(base, 101.0));

        assert_eq!(machine.counters().attempts_total, 0);
        assert_eq!(machine.counters().attempts_in_window, 0);

        machine.observe(&threads(4), at(base, 102.0));
        machine.observe(&attempt(), at(base, 103.0));
        assert_eq!(machine.counters().attempts_total, 1);
        assert_eq!(machine.counters().attempts_in_window, 1);
    }

    #[test]
    fn evenly_spaced_attempts_give_expected_rate() {
        let base = Instant::now();
        let mut machine = PhaseMachine::new(timings(45, 180), base);
        machine.observe(&threads(64), at(base, 5.0));
        machine.tick(at(base, 50.0));
        assert_eq!(machine.phase(), Phase::Measuring);

        for k in 1..=360 {
            machine.observe(&attempt(), at(base, 50.0 + f64::from(k) * 0.5));
        }

        assert!(machine.is_done());
        let window = machine.window().unwrap().as_secs_f64();
        let attempts = machine.counters().attempts_in_window;
        assert_eq!(attempts, 360);
        #[allow(clippy::cast_precision_loss)]
        let apm = attempts as f64 * 60.0 / window;
        assert!((apm - 120.0).abs() < 1e-6, "apm = {apm}");
    }

    #[test]
    fn silent_window_closes_on_tick() {
        let base = Instant::now();
        let mut machine = PhaseMachine::new(timings(1, 3), base);
        machine.observe(&threads(2), base);
        machine.tick(at(base, 1.0));
        assert_eq!(machine.phase(), Phase::Measuring);
        let t = machine.tick(at(base, 4.0));
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].reason, TransitionReason::MeasureElapsed);
        assert_eq!(machine.counters().attempts_in_window, 0);
        assert_eq!(machine.window(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn zero_warmup_cascades_into_measuring() {
        let base = Instant::now();
        let mut machine = PhaseMachine::new(timings(0, 30), base);
        let t = machine.observe(&threads(8), at(base, 2.0));
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].to, Phase::Warming);
        assert_eq!(t[1].to, Phase::Measuring);
        assert_eq!(machine.measuring_entered_at(), Some(at(base, 2.0)));
    }

    #[test]
    fn done_ignores_further_input() {
        let base = Instant::now();
        let mut machine = PhaseMachine::new(timings(0, 1), base);
        machine.observe(&threads(1), base);
        machine.observe(&attempt(), at(base, 0.5));
        machine.tick(at(base, 1.0));
        assert!(machine.is_done());
        let before = machine.counters();

        let effect = classify("received new candidate block header");
        assert!(machine.observe(&effect, at(base, 2.0)).is_empty());
        assert!(machine.observe(&attempt(), at(base, 3.0)).is_empty());
        assert!(machine.tick(at(base, 500.0)).is_empty());
        assert_eq!(machine.counters(), before);
    }

    #[test]
    fn mine_effect_is_recorded() {
        let base = Instant::now();
        let mut machine = PhaseMachine::new(timings(45, 180), base);
        machine.observe(&classify("[%mining-on abc]"), base);
        assert!(machine.counters().saw_mine_effect);
        assert_eq!(machine.phase(), Phase::Starting);
    }

    #[test]
    fn window_at_tracks_open_window() {
        let base = Instant::now();
        let mut machine = PhaseMachine::new(timings(0, 100), base);
        machine.observe(&threads(1), base);
        assert_eq!(
            machine.window_at(at(base, 12.0)),
            Some(Duration::from_secs(12))
        );
        assert_eq!(machine.window(), None);
    }

    #[derive(Debug, Clone)]
    enum Input {
        Line(u8),
        Tick,
    }

    fn input() -> impl Strategy<Value = (Input, u64)> {
        (
            prop_oneof![(0u8..8).prop_map(Input::Line), Just(Input::Tick)],
            0u64..20_000,
        )
    }

    proptest! {
        #[test]
        fn phases_never_regress(inputs in prop::collection::vec(input(), 0..200)) {
            let base = Instant::now();
            let mut machine = PhaseMachine::new(
                PhaseTimings {
                    warmup: Duration::from_secs(5),
                    measure: Duration::from_secs(30),
                    hard_start_timeout: Duration::from_secs(20),
                },
                base,
            );
            let mut now = base;
            let mut last = machine.phase();

            for (input, step_ms) in inputs {
                now += Duration::from_millis(step_ms);
                let transitions = match input {
                    Input::Line(bits) => {
                        let mut signals = Vec::new();
                        if bits & 1 != 0 { signals.push(LogSignal::Attempt); }
                        if bits & 2 != 0 { signals.push(LogSignal::ThreadsStarted(16)); }
                        if bits & 4 != 0 { signals.push(LogSignal::MineEffect); }
                        machine.observe(&SignalSet::from_signals(&signals), now)
                    }
                    Input::Tick => machine.tick(now),
                };
                for t in &transitions {
                    prop_assert!(t.to > t.from);
                    prop_assert_eq!(t.from.next(), Some(t.to));
                }
                prop_assert!(machine.phase() >= last);
                last = machine.phase();

                let c = machine.counters();
                prop_assert!(c.attempts_in_window <= c.attempts_total);
                if machine.phase() < Phase::Measuring {
                    prop_assert_eq!(c.attempts_in_window, 0);
                }
            }
        }
    }
}
