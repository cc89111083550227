//! Resource bounds: seats never hold more items than the game grants.

use super::Invariant;
use crate::GameSession;
use go_engine::Stone;

/// Invariant: each seat's missiles and hidden stones stay within the
/// per-seat allowance.
pub struct ResourceBoundsInvariant;

impl Invariant<GameSession> for ResourceBoundsInvariant {
    fn holds(session: &GameSession) -> bool {
        let settings = session.settings();
        [Stone::Black, Stone::White]
            .into_iter()
            .filter_map(|stone| session.seat(stone))
            .all(|seat| {
                seat.missiles() <= settings.missile_count()
                    && seat.hidden_stones() <= settings.hidden_stone_count()
            })
    }

    fn description() -> &'static str {
        "Seats hold no more missiles or hidden stones than granted"
    }
}
