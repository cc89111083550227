//! Move legality, capture and ko.
//!
//! [`evaluate_move`] is a pure function: identical inputs give identical
//! outputs, so the authoritative server and a predicting client can run the
//! same code and only diverge when their inputs do.

use super::action::{OccupiedCause, Rejection};
use super::group::find_group;
use super::types::{Board, Cell, KoRecord, Move, Point, Stone};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Who the mover is playing against.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PlayMode {
    /// Two human players.
    #[default]
    Versus,
    /// One human against a bot playing `bot`.
    SinglePlayer {
        /// The bot's colour.
        bot: Stone,
    },
}

/// Knobs for [`evaluate_move`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationOptions {
    /// Accept moves that leave the placed group without liberties.
    pub ignore_suicide: bool,
    /// Mode-specific overwrite rules.
    pub mode: PlayMode,
}

/// Result of a legal placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// The board after placement and captures.
    pub board: Board,
    /// Removed opponent stones, grouped in discovery order.
    pub captured: Vec<Point>,
    /// Ko record binding the next move, if the placement made a ko.
    pub ko: Option<KoRecord>,
}

/// Evaluates `mv` against `board` without touching it.
///
/// `move_count` is the number of moves already played; the ko record binds
/// only while its `turn_index` equals it.
///
/// # Errors
///
/// Returns the first failing check as a [`Rejection`].
#[instrument(skip(board), fields(size = board.size()))]
pub fn evaluate_move(
    board: &Board,
    mv: Move,
    ko: Option<KoRecord>,
    move_count: usize,
    options: EvaluationOptions,
) -> Result<Placement, Rejection> {
    let Move { position, player } = mv;
    let opponent = player.opponent();

    check_target(board, mv, options)?;

    if ko.is_some_and(|record| record.point == position && record.turn_index == move_count) {
        debug!(%position, move_count, "Ko recapture refused");
        return Err(Rejection::Ko { at: position });
    }

    let mut next = board.clone();
    next.set(position, Cell::Occupied(player))
        .map_err(|_| Rejection::Occupied {
            at: position,
            cause: OccupiedCause::OutOfBounds,
        })?;

    let mut captured = Vec::new();
    let mut seen: HashSet<Point> = HashSet::new();
    let neighbors: Vec<Point> = next.neighbors(position).collect();
    for neighbor in neighbors {
        if next.get(neighbor) != Some(Cell::Occupied(opponent)) || seen.contains(&neighbor) {
            continue;
        }
        let Some(group) = find_group(&next, neighbor) else {
            continue;
        };
        seen.extend(group.stones().iter().copied());
        if group.liberty_count() == 0 {
            captured.extend_from_slice(group.stones());
        }
    }

    for stone in &captured {
        next.set(*stone, Cell::Empty).map_err(|_| Rejection::Occupied {
            at: position,
            cause: OccupiedCause::OutOfBounds,
        })?;
    }

    let own = find_group(&next, position).ok_or(Rejection::Occupied {
        at: position,
        cause: OccupiedCause::NotEmpty,
    })?;

    if own.liberty_count() == 0 && !options.ignore_suicide {
        debug!(%position, "Suicide refused");
        return Err(Rejection::Suicide { at: position });
    }

    let ko = match captured.as_slice() {
        [single] if own.stones().len() == 1 && own.liberty_count() == 1 => Some(KoRecord {
            point: *single,
            turn_index: move_count + 1,
        }),
        _ => None,
    };

    debug!(%position, captured = captured.len(), ko = ?ko, "Move accepted");
    Ok(Placement {
        board: next,
        captured,
        ko,
    })
}

/// Checks 1–5: coordinates and the target cell, before any stone is placed.
fn check_target(board: &Board, mv: Move, options: EvaluationOptions) -> Result<(), Rejection> {
    let Move { position, player } = mv;
    let occupied = |cause| Rejection::Occupied { at: position, cause };

    if position.is_pass() {
        return Err(occupied(OccupiedCause::PassSentinel));
    }

    let Some(cell) = board.get(position) else {
        return Err(occupied(OccupiedCause::OutOfBounds));
    };

    if cell == Cell::Occupied(player) {
        return Err(occupied(OccupiedCause::OwnStone));
    }

    let forbidden = match options.mode {
        PlayMode::Versus => player.opponent(),
        PlayMode::SinglePlayer { bot } => bot,
    };
    if cell == Cell::Occupied(forbidden) {
        return Err(occupied(OccupiedCause::ForbiddenOverwrite));
    }

    if !cell.is_empty() {
        return Err(occupied(OccupiedCause::NotEmpty));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::RejectReason;

    fn black(x: i32, y: i32) -> Move {
        Move::new(Stone::Black, Point::new(x, y))
    }

    fn white(x: i32, y: i32) -> Move {
        Move::new(Stone::White, Point::new(x, y))
    }

    fn play(board: &Board, mv: Move) -> Result<Placement, Rejection> {
        evaluate_move(board, mv, None, 0, EvaluationOptions::default())
    }

    #[test]
    fn test_pass_sentinel_rejected_before_bounds() {
        let board = Board::new(9);
        let err = play(&board, Move::new(Stone::Black, Point::PASS)).unwrap_err();
        assert_eq!(
            err,
            Rejection::Occupied {
                at: Point::PASS,
                cause: OccupiedCause::PassSentinel
            }
        );
        assert_eq!(err.reason(), RejectReason::Occupied);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let board = Board::new(9);
        for point in [Point::new(9, 0), Point::new(0, -1), Point::new(-1, 4)] {
            let err = play(&board, Move::new(Stone::White, point)).unwrap_err();
            assert!(matches!(
                err,
                Rejection::Occupied {
                    cause: OccupiedCause::OutOfBounds,
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_own_stone_checked_before_opponent_stone() {
        let board = Board::from_diagram(
            "
            BW.
            ...
            ...
            ",
        )
        .unwrap();

        let own = play(&board, black(0, 0)).unwrap_err();
        assert!(matches!(
            own,
            Rejection::Occupied {
                cause: OccupiedCause::OwnStone,
                ..
            }
        ));

        let theirs = play(&board, black(1, 0)).unwrap_err();
        assert!(matches!(
            theirs,
            Rejection::Occupied {
                cause: OccupiedCause::ForbiddenOverwrite,
                ..
            }
        ));
    }

    #[test]
    fn test_single_player_mode_forbids_bot_stones() {
        let board = Board::from_diagram(
            "
            W..
            ...
            ...
            ",
        )
        .unwrap();
        let options = EvaluationOptions {
            ignore_suicide: false,
            mode: PlayMode::SinglePlayer { bot: Stone::White },
        };
        let err = evaluate_move(&board, black(0, 0), None, 0, options).unwrap_err();
        assert!(matches!(
            err,
            Rejection::Occupied {
                cause: OccupiedCause::ForbiddenOverwrite,
                ..
            }
        ));
    }

    fn dead_white_group() -> Board {
        // The three white stones have a single liberty at (3, 0).
        Board::from_diagram(
            "
            .BW..
            BWWB.
            .BB..
            .....
            .....
            ",
        )
        .unwrap()
    }

    #[test]
    fn test_capture_removes_exactly_the_dead_group() {
        let board = dead_white_group();
        let placement = play(&board, black(3, 0)).unwrap();

        let mut captured = placement.captured.clone();
        captured.sort();
        assert_eq!(
            captured,
            vec![Point::new(1, 1), Point::new(2, 0), Point::new(2, 1)]
        );
        assert_eq!(placement.board.count(Stone::White), 0);
        assert_eq!(placement.board.count(Stone::Black), board.count(Stone::Black) + 1);
        // Input board is untouched.
        assert_eq!(board.count(Stone::White), 3);
    }

    #[test]
    fn test_group_touching_twice_is_captured_once() {
        // (1, 1) touches the black group through both (1, 0) and (0, 1).
        let board = Board::from_diagram(
            "
            BBW
            B..
            W..
            ",
        )
        .unwrap();
        let placement = play(&board, white(1, 1)).unwrap();
        let mut captured = placement.captured.clone();
        captured.sort();
        assert_eq!(
            captured,
            vec![Point::new(0, 0), Point::new(0, 1), Point::new(1, 0)]
        );
    }

    #[test]
    fn test_suicide_rejected_and_board_unchanged() {
        let board = Board::from_diagram(
            "
            .....
            ..W..
            .W.W.
            ..W..
            .....
            ",
        )
        .unwrap();
        let before = board.clone();
        let err = play(&board, black(2, 2)).unwrap_err();
        assert_eq!(err, Rejection::Suicide { at: Point::new(2, 2) });
        assert_eq!(err.reason(), RejectReason::Suicide);
        assert_eq!(board, before);
    }

    #[test]
    fn test_suicide_allowed_when_ignored() {
        let board = Board::from_diagram(
            "
            .W.
            W.W
            .W.
            ",
        )
        .unwrap();
        let options = EvaluationOptions {
            ignore_suicide: true,
            ..EvaluationOptions::default()
        };
        let placement = evaluate_move(&board, black(1, 1), None, 0, options).unwrap();
        assert_eq!(placement.board.get(Point::new(1, 1)), Some(Cell::Occupied(Stone::Black)));
    }

    #[test]
    fn test_capture_is_not_suicide() {
        // (0, 0) has no empty neighbour, but both white stones die first.
        let board = Board::from_diagram(
            "
            .WB..
            WB...
            B....
            .....
            .....
            ",
        )
        .unwrap();
        let placement = play(&board, black(0, 0)).unwrap();
        assert_eq!(placement.captured.len(), 2);
    }

    fn ko_board() -> Board {
        // The white stone at (2, 2) has a single liberty at (3, 2), and a
        // black stone there would itself keep only (2, 2).
        Board::from_diagram(
            "
            .....
            ..BW.
            .BW.W
            ..BW.
            .....
            ",
        )
        .unwrap()
    }

    #[test]
    fn test_single_capture_creates_ko_record() {
        let board = ko_board();
        let placement = evaluate_move(&board, black(3, 2), None, 10, EvaluationOptions::default())
            .unwrap();
        assert_eq!(placement.captured, vec![Point::new(2, 2)]);
        assert_eq!(
            placement.ko,
            Some(KoRecord {
                point: Point::new(2, 2),
                turn_index: 11
            })
        );
    }

    #[test]
    fn test_ko_binds_only_the_next_move() {
        let board = ko_board();
        let placement = evaluate_move(&board, black(3, 2), None, 10, EvaluationOptions::default())
            .unwrap();

        let retake = evaluate_move(
            &placement.board,
            white(2, 2),
            placement.ko,
            11,
            EvaluationOptions::default(),
        );
        assert_eq!(retake.unwrap_err(), Rejection::Ko { at: Point::new(2, 2) });

        let later = evaluate_move(
            &placement.board,
            white(2, 2),
            placement.ko,
            13,
            EvaluationOptions::default(),
        )
        .unwrap();
        assert_eq!(later.captured, vec![Point::new(3, 2)]);
    }

    #[test]
    fn test_multi_stone_capture_sets_no_ko() {
        let placement = play(&dead_white_group(), black(3, 0)).unwrap();
        assert!(placement.ko.is_none());
    }

    #[test]
    fn test_same_inputs_same_outputs() {
        let board = ko_board();
        let a = evaluate_move(&board, black(3, 2), None, 4, EvaluationOptions::default());
        let b = evaluate_move(&board, black(3, 2), None, 4, EvaluationOptions::default());
        assert_eq!(a, b);
    }
}
