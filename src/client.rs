//! Client-side shadow of a session for optimistic move display.
//!
//! The shadow runs the same engine as the server against its last
//! authoritative board. Predictions are shown immediately and thrown away
//! as soon as the server's answer or a newer event arrives.

use crate::events::SessionEvent;
use crate::snapshot::SessionSnapshot;
use crate::wire::MoveResponse;
use derive_getters::Getters;
use go_engine::{
    Board, BoardError, CellChange, EvaluationOptions, KoRecord, Move, Point, Rejection, Stone,
    evaluate_move,
};
use tracing::{debug, instrument, warn};

/// Optimistic result of a local move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    /// Predicted placement.
    pub position: Point,
    /// Predicted board after the move.
    pub board: Board,
    /// Cells the move is expected to change.
    pub delta: Vec<CellChange>,
    /// Predicted captures.
    pub captured: Vec<Point>,
}

/// How an authoritative answer related to the local prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The server produced the predicted board.
    Confirmed,
    /// The server's board differs; the prediction was replaced.
    Corrected,
    /// The server refused the move; the prediction was rolled back.
    RolledBack,
    /// There was no prediction to compare.
    Untracked,
}

/// Last authoritative state plus at most one pending prediction.
#[derive(Debug, Clone, Getters)]
pub struct ShadowSession {
    /// Colour this client plays.
    stone: Stone,
    /// Last authoritative board, as this client may see it.
    confirmed: Board,
    /// Ko record from the server.
    ko: Option<KoRecord>,
    /// History length from the server.
    move_count: usize,
    /// Side to move per the server.
    to_move: Stone,
    /// Last applied snapshot version.
    version: u64,
    /// Engine options matching the session's settings.
    options: EvaluationOptions,
    /// Pending optimistic move.
    pending: Option<Prediction>,
}

impl ShadowSession {
    /// Builds a shadow from a snapshot that includes the board.
    #[instrument(skip(snapshot, options), fields(session_id = %snapshot.session_id))]
    pub fn from_snapshot(
        snapshot: &SessionSnapshot,
        stone: Stone,
        options: EvaluationOptions,
    ) -> Result<Self, BoardError> {
        let confirmed = snapshot
            .board
            .as_ref()
            .ok_or(BoardError::Malformed("snapshot carries no board"))?
            .to_board()?;
        Ok(Self {
            stone,
            confirmed,
            ko: snapshot.ko,
            move_count: snapshot.move_count,
            to_move: snapshot.to_move,
            version: snapshot.version,
            options,
            pending: None,
        })
    }

    /// The board to display: the prediction if one is pending.
    pub fn display_board(&self) -> &Board {
        self.pending
            .as_ref()
            .map_or(&self.confirmed, |prediction| &prediction.board)
    }

    /// Evaluates a move locally and keeps it as the pending prediction.
    ///
    /// Concealed opponent stones are invisible here, so the server may still
    /// refuse a move the shadow accepts.
    #[instrument(skip(self), fields(stone = %self.stone))]
    pub fn predict_move(&mut self, position: Point) -> Result<&Prediction, Rejection> {
        let placement = evaluate_move(
            &self.confirmed,
            Move::new(self.stone, position),
            self.ko,
            self.move_count,
            self.options,
        )?;
        let delta = self.confirmed.diff(&placement.board);
        debug!(%position, changed = delta.len(), "Predicted move");
        Ok(&*self.pending.insert(Prediction {
            position,
            board: placement.board,
            delta,
            captured: placement.captured,
        }))
    }

    /// Folds the server's answer to the pending move into the shadow.
    #[instrument(skip(self, response), fields(accepted = response.accepted))]
    pub fn reconcile_move(&mut self, response: &MoveResponse) -> Result<Reconciliation, BoardError> {
        let pending = self.pending.take();
        if !response.accepted {
            if let Some(reason) = &response.reject_reason {
                warn!(code = %reason.code, "Server refused predicted move");
            }
            return Ok(match pending {
                Some(_) => Reconciliation::RolledBack,
                None => Reconciliation::Untracked,
            });
        }

        self.confirmed.apply(&response.board_delta)?;
        self.ko = response.ko_record;
        self.move_count += 1;
        if let Some(next) = response.next_turn {
            self.to_move = next;
        }
        Ok(match pending {
            Some(prediction) if prediction.board == self.confirmed => Reconciliation::Confirmed,
            Some(_) => Reconciliation::Corrected,
            None => Reconciliation::Untracked,
        })
    }

    /// Applies a broadcast event; older events are ignored.
    #[instrument(skip(self, event), fields(version = event.snapshot.version))]
    pub fn apply_event(&mut self, event: &SessionEvent) -> Result<(), BoardError> {
        if event.snapshot.version <= self.version {
            debug!(current = self.version, "Ignoring stale event");
            return Ok(());
        }
        self.confirmed.apply(&event.delta)?;
        self.ko = event.snapshot.ko;
        self.move_count = event.snapshot.move_count;
        self.to_move = event.snapshot.to_move;
        self.version = event.snapshot.version;
        self.pending = None;
        Ok(())
    }
}
