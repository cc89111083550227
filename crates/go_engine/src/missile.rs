//! Missile path: where a launched stone comes to rest.

use super::types::{Board, Cell, Point, Stone};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Launch direction.
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
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    /// Towards row 0.
    Up,
    /// Towards the last row.
    Down,
    /// Towards column 0.
    Left,
    /// Towards the last column.
    Right,
}

impl Direction {
    /// Unit step `(dx, dy)`.
    pub fn step(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// Tells the path function which opponent stones are still hidden.
pub trait Concealment {
    /// Checks if the stone at `point` is hidden and not yet revealed.
    fn is_concealed(&self, point: Point) -> bool;
}

impl<F> Concealment for F
where
    F: Fn(Point) -> bool,
{
    fn is_concealed(&self, point: Point) -> bool {
        self(point)
    }
}

/// No stone is hidden.
#[derive(Debug, Clone, Copy, Default)]
pub struct NothingConcealed;

impl Concealment for NothingConcealed {
    fn is_concealed(&self, _point: Point) -> bool {
        false
    }
}

/// A computed, valid missile flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissilePath {
    /// Launch point.
    pub from: Point,
    /// Resting point, always empty and different from `from`.
    pub to: Point,
    /// Hidden opponent stone uncovered at the end of the flight.
    pub revealed: Option<Point>,
}

/// Why a launch cannot happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum PathError {
    /// The origin is not on the board.
    #[display("Origin {_0} is off the board")]
    OffBoard(Point),

    /// The origin does not hold the launcher's stone.
    #[display("No {stone} stone at {at}")]
    NotOwnStone {
        /// Requested origin.
        at: Point,
        /// The launcher's colour.
        stone: Stone,
    },

    /// The stone cannot move in that direction.
    #[display("Stone at {at} cannot move {direction}")]
    Blocked {
        /// Requested origin.
        at: Point,
        /// Requested direction.
        direction: Direction,
    },

    /// The flight ends on a cell that is not empty.
    #[display("Landing point {_0} is occupied")]
    LandingOccupied(Point),
}

impl std::error::Error for PathError {}

/// Computes where the stone at `from` lands when launched towards `direction`.
///
/// The stone slides over empty cells and over concealed opponent stones. It
/// stops before its own stones, before revealed opponent stones and at the
/// board edge. Resting on a concealed opponent stone reveals it and backs the
/// missile up one cell (or back onto the origin when that cell is off the
/// board).
///
/// # Errors
///
/// Returns a [`PathError`] when the origin is unusable or the stone would not
/// move; no partial result is produced.
#[instrument(skip(board, concealment), fields(size = board.size()))]
pub fn missile_path(
    board: &Board,
    from: Point,
    direction: Direction,
    launcher: Stone,
    concealment: &impl Concealment,
) -> Result<MissilePath, PathError> {
    match board.get(from) {
        None => return Err(PathError::OffBoard(from)),
        Some(Cell::Occupied(stone)) if stone == launcher => {}
        Some(_) => {
            return Err(PathError::NotOwnStone {
                at: from,
                stone: launcher,
            });
        }
    }

    let (dx, dy) = direction.step();
    let opponent = launcher.opponent();
    let hidden_opponent =
        |p: Point| board.get(p) == Some(Cell::Occupied(opponent)) && concealment.is_concealed(p);

    let mut current = from;
    loop {
        let next = current.offset(dx, dy);
        match board.get(next) {
            None => break,
            Some(Cell::Empty) => current = next,
            Some(Cell::Occupied(_)) if hidden_opponent(next) => current = next,
            Some(Cell::Occupied(_)) => break,
        }
    }

    let mut revealed = None;
    if current != from && hidden_opponent(current) {
        debug!(revealed = %current, "Missile uncovers hidden stone");
        revealed = Some(current);
        let back = current.offset(-dx, -dy);
        current = if board.contains(back) { back } else { from };
    }

    if current == from {
        return Err(PathError::Blocked { at: from, direction });
    }

    if board.get(current) != Some(Cell::Empty) {
        return Err(PathError::LandingOccupied(current));
    }

    Ok(MissilePath {
        from,
        to: current,
        revealed,
    })
}
