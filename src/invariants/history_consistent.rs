//! History consistency: every stone on the board has a live history entry.

use super::Invariant;
use crate::GameSession;
use go_engine::{Point, Stone};
use std::collections::HashMap;

/// Invariant: the most recent history entry at each occupied point records
/// a stone of the same colour.
///
/// Missile relocations rewrite history instead of appending duplicates, so
/// this holds across the whole launch/commit protocol.
pub struct HistoryConsistentInvariant;

impl Invariant<GameSession> for HistoryConsistentInvariant {
    fn holds(session: &GameSession) -> bool {
        let mut latest: HashMap<Point, Stone> = HashMap::new();
        for entry in session.history() {
            if let Some(point) = entry.point() {
                latest.insert(point, entry.player());
            }
        }
        session
            .board()
            .stones()
            .all(|(point, stone)| latest.get(&point) == Some(&stone))
    }

    fn description() -> &'static str {
        "Every stone matches the latest history entry at its point"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GameSettings, PlayerType};

    #[test]
    fn test_holds_after_capture() {
        let mut session =
            GameSession::new("hist".into(), GameSettings::default().with_board_size(3));
        session
            .register_player("a".into(), "A".into(), PlayerType::Human, 0)
            .unwrap();
        session
            .register_player("b".into(), "B".into(), PlayerType::Human, 0)
            .unwrap();

        // White (0, 0) is captured by black (1, 0) and (0, 1).
        session.play_move("a", Point::new(1, 0), false, 1).unwrap();
        session.play_move("b", Point::new(0, 0), false, 2).unwrap();
        let outcome = session.play_move("a", Point::new(0, 1), false, 3).unwrap();
        assert_eq!(outcome.captured, vec![Point::new(0, 0)]);
        assert!(HistoryConsistentInvariant::holds(&session));
    }
}
