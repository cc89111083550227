//! Clock exclusivity: the clock runs exactly when no special action is open.

use super::Invariant;
use crate::GameSession;
use crate::clock::ClockState;
use crate::session::GameStatus;

/// Invariant: while playing, the clock runs for the side to move XOR is
/// paused for the actor of the open special action. Otherwise it is stopped
/// and no action is open.
pub struct ClockExclusiveInvariant;

impl Invariant<GameSession> for ClockExclusiveInvariant {
    fn holds(session: &GameSession) -> bool {
        let special = session.special().current();
        match (session.status(), session.clock().state(), special) {
            (GameStatus::Playing, ClockState::Running { side, .. }, None) => {
                side == *session.to_move()
            }
            (GameStatus::Playing, ClockState::Paused { side, .. }, Some(action)) => {
                side == action.actor() && side == *session.to_move()
            }
            (GameStatus::Waiting | GameStatus::Finished { .. }, ClockState::Stopped, None) => true,
            _ => false,
        }
    }

    fn description() -> &'static str {
        "Clock runs for the side to move XOR is paused for the special action"
    }
}
