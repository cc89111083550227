//! Pure Go move engine.
//!
//! Everything here is a function of its inputs: boards are values, moves are
//! values, and rule violations come back as [`Rejection`]s. The authoritative
//! session core and client-side predictors link the same code, so a
//! prediction only diverges from the server when its inputs do.
//!
//! # Example
//!
//! ```
//! use go_engine::{Board, EvaluationOptions, Move, Point, Stone, evaluate_move};
//!
//! let board = Board::new(9);
//! let placement = evaluate_move(
//!     &board,
//!     Move::new(Stone::Black, Point::new(4, 4)),
//!     None,
//!     0,
//!     EvaluationOptions::default(),
//! )
//! .expect("empty board accepts any point");
//! assert!(placement.captured.is_empty());
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod action;
mod group;
mod missile;
mod rules;
mod types;

pub use action::{OccupiedCause, RejectReason, Rejection};
pub use group::{Group, find_group};
pub use missile::{Concealment, Direction, MissilePath, NothingConcealed, PathError, missile_path};
pub use rules::{EvaluationOptions, Placement, PlayMode, evaluate_move};
pub use types::{Board, BoardError, Cell, CellChange, KoRecord, Move, Point, Stone};
