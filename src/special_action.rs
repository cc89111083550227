//! Special-action sub-state machine: `Idle → Selecting → Executing → Idle`.
//!
//! This module owns the state and its timing decisions. The board, history,
//! resource and clock effects of each transition are applied by
//! [`GameSession`](crate::GameSession).

use crate::clock::Millis;
use derive_getters::Getters;
use go_engine::{Point, Stone};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Kinds of special action.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ActionKind {
    /// Relocate one of the actor's stones along a straight line.
    Missile,
}

/// Animation descriptor, one variant per visible effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Animation {
    /// A stone flying from `from` to `to`.
    Missile {
        /// Launch point.
        from: Point,
        /// Landing point.
        to: Point,
        /// Launching side.
        actor: Stone,
        /// Animation start time.
        start: Millis,
        /// Planned duration.
        duration: Millis,
    },
    /// A missile flight that uncovered a hidden stone.
    HiddenMissile {
        /// Launch point.
        from: Point,
        /// Landing point.
        to: Point,
        /// Launching side.
        actor: Stone,
        /// Animation start time.
        start: Millis,
        /// Planned duration.
        duration: Millis,
        /// The uncovered stone.
        revealed: Point,
    },
}

impl Animation {
    /// Launch point.
    pub fn from(&self) -> Point {
        match *self {
            Animation::Missile { from, .. } | Animation::HiddenMissile { from, .. } => from,
        }
    }

    /// Landing point.
    pub fn to(&self) -> Point {
        match *self {
            Animation::Missile { to, .. } | Animation::HiddenMissile { to, .. } => to,
        }
    }

    /// Launching side.
    pub fn actor(&self) -> Stone {
        match *self {
            Animation::Missile { actor, .. } | Animation::HiddenMissile { actor, .. } => actor,
        }
    }

    /// Start time, also the animation's identity for commit signals.
    pub fn start(&self) -> Millis {
        match *self {
            Animation::Missile { start, .. } | Animation::HiddenMissile { start, .. } => start,
        }
    }

    /// Planned duration.
    pub fn duration(&self) -> Millis {
        match *self {
            Animation::Missile { duration, .. } | Animation::HiddenMissile { duration, .. } => {
                duration
            }
        }
    }

    /// The uncovered stone, if any.
    pub fn revealed(&self) -> Option<Point> {
        match *self {
            Animation::Missile { .. } => None,
            Animation::HiddenMissile { revealed, .. } => Some(revealed),
        }
    }
}

/// An open special action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SpecialAction {
    /// Waiting for the actor's target.
    Selecting {
        /// Action kind.
        kind: ActionKind,
        /// Acting side.
        actor: Stone,
        /// The window closes at this time.
        window_deadline: Millis,
    },
    /// Effect computed, waiting for the commit.
    Executing {
        /// Action kind.
        kind: ActionKind,
        /// Acting side.
        actor: Stone,
        /// What clients are animating.
        animation: Animation,
    },
}

impl SpecialAction {
    /// Acting side.
    pub fn actor(&self) -> Stone {
        match *self {
            SpecialAction::Selecting { actor, .. } | SpecialAction::Executing { actor, .. } => {
                actor
            }
        }
    }

    /// Action kind.
    pub fn kind(&self) -> ActionKind {
        match *self {
            SpecialAction::Selecting { kind, .. } | SpecialAction::Executing { kind, .. } => kind,
        }
    }
}

/// Why an `Executing` action is being committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommitTrigger {
    /// A participant reported the animation finished.
    Signal,
    /// The planned duration elapsed.
    Elapsed,
    /// The animation outlived the staleness threshold.
    Stale,
}

/// When a lingering animation is forced to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Getters)]
pub struct StalenessPolicy {
    factor: i64,
    ceiling: Millis,
}

impl StalenessPolicy {
    /// Creates a policy forcing the commit after `min(duration * factor, ceiling)`.
    pub fn new(factor: i64, ceiling: Millis) -> Self {
        Self { factor, ceiling }
    }

    /// Elapsed time after which an animation of `duration` is stale.
    pub fn threshold(&self, duration: Millis) -> Millis {
        duration.saturating_mul(self.factor).min(self.ceiling)
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(5, 15_000)
    }
}

/// Time-driven step the session has to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueTransition {
    /// The selection window closed.
    WindowExpired {
        /// Acting side.
        actor: Stone,
        /// When the window closed.
        window_deadline: Millis,
    },
    /// The animation should be committed.
    Commit(CommitTrigger),
}

/// Outcome of a commit signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommitOutcome {
    /// The animation's effects were applied.
    Applied,
    /// The animation was committed before; nothing changed.
    AlreadyCommitted,
    /// A stuck `Executing` state for a committed animation was cleared.
    Repaired,
    /// The signal matches no known animation.
    Ignored,
}

impl CommitOutcome {
    /// Whether the animation is committed after the signal.
    pub fn committed(self) -> bool {
        !matches!(self, CommitOutcome::Ignored)
    }
}

/// Special-action slot of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Getters)]
pub struct SpecialActionState {
    /// Open action, if any.
    current: Option<SpecialAction>,
    /// Start time of the last committed animation.
    last_committed: Option<Millis>,
}

impl SpecialActionState {
    /// Checks if no action is open.
    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    /// Checks if an animation is waiting for its commit.
    pub fn is_executing(&self) -> bool {
        matches!(self.current, Some(SpecialAction::Executing { .. }))
    }

    /// Opens the selection window.
    pub(crate) fn begin(&mut self, kind: ActionKind, actor: Stone, window_deadline: Millis) {
        self.current = Some(SpecialAction::Selecting {
            kind,
            actor,
            window_deadline,
        });
    }

    /// Moves `Selecting` to `Executing`.
    pub(crate) fn execute(&mut self, animation: Animation) {
        if let Some(SpecialAction::Selecting { kind, actor, .. }) = self.current {
            self.current = Some(SpecialAction::Executing {
                kind,
                actor,
                animation,
            });
        }
    }

    /// Returns to idle, recording `animation_start` as committed when given.
    pub(crate) fn finish(&mut self, animation_start: Option<Millis>) {
        self.current = None;
        if animation_start.is_some() {
            self.last_committed = animation_start;
        }
    }

    /// Classifies a commit signal for `animation_start`.
    pub fn classify_signal(&self, animation_start: Millis) -> CommitOutcome {
        match self.current {
            Some(SpecialAction::Executing { animation, .. })
                if animation.start() == animation_start =>
            {
                if self.last_committed == Some(animation_start) {
                    CommitOutcome::Repaired
                } else {
                    CommitOutcome::Applied
                }
            }
            _ if self.last_committed == Some(animation_start) => CommitOutcome::AlreadyCommitted,
            _ => CommitOutcome::Ignored,
        }
    }

    /// The time-driven transition due at `now`, if any.
    #[instrument(skip(self, policy))]
    pub fn due(&self, now: Millis, policy: &StalenessPolicy) -> Option<DueTransition> {
        match self.current? {
            SpecialAction::Selecting {
                actor,
                window_deadline,
                ..
            } => (now > window_deadline).then_some(DueTransition::WindowExpired {
                actor,
                window_deadline,
            }),
            SpecialAction::Executing { animation, .. } => {
                let elapsed = now - animation.start();
                if elapsed >= policy.threshold(animation.duration()) {
                    warn!(
                        elapsed,
                        duration = animation.duration(),
                        "Animation is stale, forcing commit"
                    );
                    Some(DueTransition::Commit(CommitTrigger::Stale))
                } else if elapsed >= animation.duration() {
                    debug!(elapsed, "Animation finished");
                    Some(DueTransition::Commit(CommitTrigger::Elapsed))
                } else {
                    None
                }
            }
        }
    }
}
