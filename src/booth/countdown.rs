use std::time::{Duration, Instant};

/// Timings of the capture countdown
#[derive(Clone, Copy, Debug)]
pub struct CountdownConfig {
    /// First number shown
    pub start: u8,
    /// Time each number stays on screen
    pub step: Duration,
    /// Pause after a capture before the trigger is enabled again
    pub cooldown: Duration,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            start: 3,
            step: Duration::from_secs(1),
            cooldown: Duration::from_millis(500),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountdownState {
    Idle,
    CountingDown { remaining: u8, deadline: Instant },
    Capturing,
    Cooldown { until: Instant },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountdownEvent {
    Trigger(Instant),
    Tick(Instant),
    Captured(Instant),
    Cancel,
}

/// What the owner should do after a transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountdownSignal {
    Show(u8),
    Capture,
    Ready,
    Cancelled,
}

#[derive(Debug)]
pub struct Countdown {
    config: CountdownConfig,
    state: CountdownState,
}

impl Countdown {
    pub fn new(config: CountdownConfig) -> Self {
        Self {
            config,
            state: CountdownState::Idle,
        }
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    /// Capture can only be triggered from idle
    pub fn is_trigger_enabled(&self) -> bool {
        self.state == CountdownState::Idle
    }

    /// Text for the overlay, if one should be shown
    pub fn label(&self) -> Option<String> {
        match self.state {
            CountdownState::CountingDown { remaining, .. } => Some(remaining.to_string()),
            CountdownState::Capturing | CountdownState::Cooldown { .. } => {
                Some("📸".to_string())
            }
            CountdownState::Idle => None,
        }
    }

    /// The single transition function. Events that do not apply to the
    /// current state are ignored.
    pub fn apply(&mut self, event: CountdownEvent) -> Option<CountdownSignal> {
        let (next, signal) = match (self.state, event) {
            (CountdownState::Idle, CountdownEvent::Trigger(now)) => (
                CountdownState::CountingDown {
                    remaining: self.config.start,
                    deadline: now + self.config.step,
                },
                Some(CountdownSignal::Show(self.config.start)),
            ),
            (CountdownState::CountingDown { remaining, deadline }, CountdownEvent::Tick(now))
                if now >= deadline =>
            {
                if remaining > 1 {
                    (
                        CountdownState::CountingDown {
                            remaining: remaining - 1,
                            deadline: deadline + self.config.step,
                        },
                        Some(CountdownSignal::Show(remaining - 1)),
                    )
                } else {
                    (CountdownState::Capturing, Some(CountdownSignal::Capture))
                }
            }
            (CountdownState::CountingDown { .. }, CountdownEvent::Cancel) => {
                (CountdownState::Idle, Some(CountdownSignal::Cancelled))
            }
            (CountdownState::Capturing, CountdownEvent::Captured(now)) => (
                CountdownState::Cooldown {
                    until: now + self.config.cooldown,
                },
                None,
            ),
            (CountdownState::Cooldown { until }, CountdownEvent::Tick(now)) if now >= until => {
                (CountdownState::Idle, Some(CountdownSignal::Ready))
            }
            (state, _) => (state, None),
        };

        if next != self.state {
            tracing::debug!("countdown {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        signal
    }
}
