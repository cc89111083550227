//! Per-side turn clock with pause and resume for special actions.
//!
//! Times are absolute milliseconds supplied by the caller; the clock never
//! reads the wall clock itself.

use go_engine::Stone;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Milliseconds, absolute (epoch) or relative depending on context.
pub type Millis = i64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> Millis {
    chrono::Utc::now().timestamp_millis()
}

/// What the clock is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ClockState {
    /// Not started, or the game has ended.
    Stopped,
    /// `side` is thinking; `deadline` is `None` for untimed play or an
    /// exhausted bank.
    Running {
        /// Side to move.
        side: Stone,
        /// Absolute time at which `side` runs out.
        deadline: Option<Millis>,
    },
    /// Frozen while a special action is open.
    Paused {
        /// Side whose time is frozen.
        side: Stone,
        /// Snapshot of its remaining time.
        remaining: Millis,
    },
}

/// Why a clock operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ClockError {
    /// The clock is not running.
    #[display("Clock is not running")]
    NotRunning,
    /// The clock is not paused.
    #[display("Clock is not paused")]
    NotPaused,
    /// Resume was asked for a side that is not paused.
    #[display("Clock is paused for {expected}, not {got}")]
    WrongSide {
        /// The paused side.
        expected: Stone,
        /// The requested side.
        got: Stone,
    },
}

impl std::error::Error for ClockError {}

/// Chess-style clock: each side owns a bank that only drains on its turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TurnClock {
    time_limit: Option<Millis>,
    black: Millis,
    white: Millis,
    state: ClockState,
}

impl TurnClock {
    /// Creates a stopped clock; `None` means untimed.
    pub fn new(time_limit: Option<Millis>) -> Self {
        let bank = time_limit.unwrap_or(0);
        Self {
            time_limit,
            black: bank,
            white: bank,
            state: ClockState::Stopped,
        }
    }

    /// Current state.
    pub fn state(&self) -> ClockState {
        self.state
    }

    /// Checks if the game is timed.
    pub fn is_timed(&self) -> bool {
        self.time_limit.is_some()
    }

    /// Checks if the clock is paused.
    pub fn is_paused(&self) -> bool {
        matches!(self.state, ClockState::Paused { .. })
    }

    /// Checks if the clock is running.
    pub fn is_running(&self) -> bool {
        matches!(self.state, ClockState::Running { .. })
    }

    /// Starts `side`'s turn from a stopped clock.
    #[instrument(skip(self))]
    pub fn start(&mut self, now: Millis, side: Stone) {
        self.state = ClockState::Running {
            side,
            deadline: self.deadline_from(now, self.bank(side)),
        };
        debug!(state = ?self.state, "Clock started");
    }

    /// Ends the running turn and starts `next`'s.
    ///
    /// # Errors
    ///
    /// [`ClockError::NotRunning`] unless the clock is running.
    #[instrument(skip(self))]
    pub fn switch_turn(&mut self, now: Millis, next: Stone) -> Result<(), ClockError> {
        let ClockState::Running { side, .. } = self.state else {
            return Err(ClockError::NotRunning);
        };
        let left = self.remaining(side, now);
        *self.bank_mut(side) = left;
        self.state = ClockState::Running {
            side: next,
            deadline: self.deadline_from(now, self.bank(next)),
        };
        debug!(from = %side, to = %next, left, "Turn switched");
        Ok(())
    }

    /// Freezes the running side and returns the deadline of a `grant`-long
    /// window.
    ///
    /// # Errors
    ///
    /// [`ClockError::NotRunning`] unless the clock is running.
    #[instrument(skip(self))]
    pub fn pause(&mut self, now: Millis, grant: Millis) -> Result<Millis, ClockError> {
        let ClockState::Running { side, .. } = self.state else {
            return Err(ClockError::NotRunning);
        };
        let remaining = self.remaining(side, now);
        *self.bank_mut(side) = remaining;
        self.state = ClockState::Paused { side, remaining };
        debug!(%side, remaining, "Clock paused");
        Ok(now.saturating_add(grant))
    }

    /// Restarts `side` with its frozen remaining time.
    ///
    /// # Errors
    ///
    /// [`ClockError::NotPaused`] unless paused, [`ClockError::WrongSide`] if
    /// another side is frozen.
    #[instrument(skip(self))]
    pub fn resume(&mut self, now: Millis, side: Stone) -> Result<(), ClockError> {
        let ClockState::Paused {
            side: paused,
            remaining,
        } = self.state
        else {
            return Err(ClockError::NotPaused);
        };
        if paused != side {
            return Err(ClockError::WrongSide {
                expected: paused,
                got: side,
            });
        }
        *self.bank_mut(side) = remaining;
        self.state = ClockState::Running {
            side,
            deadline: self.deadline_from(now, remaining),
        };
        debug!(%side, remaining, "Clock resumed");
        Ok(())
    }

    /// Stops the clock, banking the running side's time.
    pub fn stop(&mut self, now: Millis) {
        match self.state {
            ClockState::Running { side, .. } => {
                let left = self.remaining(side, now);
                *self.bank_mut(side) = left;
            }
            ClockState::Paused { side, remaining } => *self.bank_mut(side) = remaining,
            ClockState::Stopped => {}
        }
        self.state = ClockState::Stopped;
    }

    /// Time `side` has left at `now`.
    pub fn remaining(&self, side: Stone, now: Millis) -> Millis {
        match self.state {
            ClockState::Running {
                side: running,
                deadline: Some(deadline),
            } if running == side => (deadline - now).max(0),
            ClockState::Paused {
                side: paused,
                remaining,
            } if paused == side => remaining,
            _ => self.bank(side),
        }
    }

    /// The running side, if it has run out of time at `now`.
    pub fn expired_side(&self, now: Millis) -> Option<Stone> {
        if !self.is_timed() {
            return None;
        }
        match self.state {
            ClockState::Running { side, deadline } => {
                let out = match deadline {
                    Some(deadline) => now >= deadline,
                    None => self.bank(side) <= 0,
                };
                out.then_some(side)
            }
            _ => None,
        }
    }

    /// Checks if the running side is out of time.
    pub fn is_expired(&self, now: Millis) -> bool {
        self.expired_side(now).is_some()
    }

    fn deadline_from(&self, now: Millis, remaining: Millis) -> Option<Millis> {
        (self.is_timed() && remaining > 0).then_some(now.saturating_add(remaining))
    }

    fn bank(&self, side: Stone) -> Millis {
        match side {
            Stone::Black => self.black,
            Stone::White => self.white,
        }
    }

    fn bank_mut(&mut self, side: Stone) -> &mut Millis {
        match side {
            Stone::Black => &mut self.black,
            Stone::White => &mut self.white,
        }
    }
}
