//! Read-only views of a session for broadcast and on-demand fetches.

use crate::clock::{ClockState, Millis};
use crate::session::{GameSession, GameStatus, PlayerId, Seat, SessionId};
use crate::special_action::SpecialAction;
use go_engine::{Board, BoardError, KoRecord, Point, Stone};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The grid as rows of `.`, `B` and `W`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BoardView {
    /// Side length.
    pub size: usize,
    /// `rows[y]`, one character per column.
    pub rows: Vec<String>,
}

impl BoardView {
    /// Parses the view back into a board.
    pub fn to_board(&self) -> Result<Board, BoardError> {
        Board::from_diagram(&self.rows.join("\n"))
    }
}

impl From<&Board> for BoardView {
    fn from(board: &Board) -> Self {
        Self {
            size: board.size(),
            rows: board.display().lines().map(str::to_string).collect(),
        }
    }
}

/// Clock as seen at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClockView {
    /// Raw state.
    pub state: ClockState,
    /// Black's remaining time.
    pub black_remaining: Millis,
    /// White's remaining time.
    pub white_remaining: Millis,
}

/// Session state sent to participants and spectators.
///
/// The grid is left out unless asked for; clients follow it through the
/// cell deltas carried by every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionSnapshot {
    /// Session ID.
    pub session_id: SessionId,
    /// State version, bumped on every change.
    pub version: u64,
    /// Lifecycle.
    pub status: GameStatus,
    /// Side to move.
    pub to_move: Stone,
    /// History length.
    pub move_count: usize,
    /// Live ko record.
    pub ko: Option<KoRecord>,
    /// Clock.
    pub clock: ClockView,
    /// Open special action.
    pub special: Option<SpecialAction>,
    /// Start time of the last committed animation.
    pub last_committed_animation: Option<Millis>,
    /// Seated players.
    pub seats: Vec<Seat>,
    /// Spectator IDs.
    pub spectators: Vec<PlayerId>,
    /// Uncovered hidden stones.
    pub revealed: Vec<Point>,
    /// The grid, when requested.
    pub board: Option<BoardView>,
}

impl SessionSnapshot {
    /// Captures `session` at `now`. The board, if included, is the view of
    /// `viewer` (`None` for the public view).
    pub fn capture(
        session: &GameSession,
        now: Millis,
        include_board: bool,
        viewer: Option<Stone>,
    ) -> Self {
        let clock = session.clock();
        Self {
            session_id: session.id().clone(),
            version: *session.version(),
            status: *session.status(),
            to_move: *session.to_move(),
            move_count: session.move_count(),
            ko: *session.ko(),
            clock: ClockView {
                state: clock.state(),
                black_remaining: clock.remaining(Stone::Black, now),
                white_remaining: clock.remaining(Stone::White, now),
            },
            special: *session.special().current(),
            last_committed_animation: *session.special().last_committed(),
            seats: [Stone::Black, Stone::White]
                .into_iter()
                .filter_map(|stone| session.seat(stone).cloned())
                .collect(),
            spectators: session.spectators().iter().cloned().collect(),
            revealed: session.revealed().iter().copied().collect(),
            board: include_board.then(|| BoardView::from(&session.visible_board(viewer))),
        }
    }
}
