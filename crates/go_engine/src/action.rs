//! Rejection types for move evaluation.
//!
//! Rule violations are values, not panics: the engine reports why a move
//! was refused and leaves every input untouched.

use super::types::Point;
use serde::{Deserialize, Serialize};

/// Coarse rejection reason, as reported to players.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    strum::Display,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RejectReason {
    /// The target cell cannot take a stone.
    Occupied,
    /// The move would immediately retake a ko.
    Ko,
    /// The move would leave its own group without liberties.
    Suicide,
}

/// Why a target counted as occupied, in validation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum OccupiedCause {
    /// The pass sentinel was submitted as a placement.
    PassSentinel,
    /// The coordinates are outside the board.
    OutOfBounds,
    /// The mover already has a stone there.
    OwnStone,
    /// The mode forbids overwriting the stone there.
    ForbiddenOverwrite,
    /// Catch-all for any other non-empty cell.
    NotEmpty,
}

/// A refused move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Rejection {
    /// The target cell is unusable.
    #[display("Point {at} is occupied ({cause})")]
    Occupied {
        /// Requested point.
        at: Point,
        /// Which check refused it.
        cause: OccupiedCause,
    },

    /// The target is the live ko point.
    #[display("Point {at} is forbidden by ko")]
    Ko {
        /// Requested point.
        at: Point,
    },

    /// The placed group would have no liberties.
    #[display("Playing {at} would be suicide")]
    Suicide {
        /// Requested point.
        at: Point,
    },
}

impl Rejection {
    /// The coarse reason reported to players.
    pub fn reason(&self) -> RejectReason {
        match self {
            Rejection::Occupied { .. } => RejectReason::Occupied,
            Rejection::Ko { .. } => RejectReason::Ko,
            Rejection::Suicide { .. } => RejectReason::Suicide,
        }
    }

    /// The requested point.
    pub fn point(&self) -> Point {
        match self {
            Rejection::Occupied { at, .. } | Rejection::Ko { at } | Rejection::Suicide { at } => {
                *at
            }
        }
    }
}

impl std::error::Error for Rejection {}
