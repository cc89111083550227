//! Request and response types exchanged with clients.

use crate::clock::Millis;
use crate::config::GameSettings;
use crate::error::{RejectInfo, SessionError};
use crate::session::{PlayerId, PlayerType, SessionId};
use crate::snapshot::{BoardView, SessionSnapshot};
use crate::special_action::{ActionKind, Animation, CommitOutcome};
use go_engine::{CellChange, Direction, KoRecord, Point, Stone};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────
//  Sessions
// ─────────────────────────────────────────────────────────────

/// Request for creating a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CreateSessionRequest {
    /// Desired ID; generated when absent.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// Overrides the server's default game settings.
    #[serde(default)]
    pub settings: Option<GameSettings>,
}

/// Request for taking a seat.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JoinRequest {
    /// Player ID.
    pub player_id: PlayerId,
    /// Display name.
    pub name: String,
    /// Player type.
    #[serde(default, rename = "type")]
    pub player_type: PlayerType,
}

/// Response to a seat request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JoinResponse {
    /// Whether the seat was granted.
    pub accepted: bool,
    /// Why not.
    pub reject_reason: Option<RejectInfo>,
    /// Colour assigned.
    pub stone: Option<Stone>,
    /// Secret for this seat's private views; only sent when the seat is new.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_token: Option<String>,
}

/// Request for watching a session.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SpectateRequest {
    /// Spectator ID.
    pub spectator_id: PlayerId,
}

// ─────────────────────────────────────────────────────────────
//  Moves
// ─────────────────────────────────────────────────────────────

/// Request for placing a stone or passing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MoveRequest {
    /// Session ID.
    pub session_id: SessionId,
    /// Acting player.
    pub actor_id: PlayerId,
    /// Target point; ignored when passing.
    #[serde(default)]
    pub position: Option<Point>,
    /// Pass instead of placing.
    #[serde(default)]
    pub pass: bool,
    /// Place the stone face down.
    #[serde(default)]
    pub hidden: bool,
}

/// Response to a move request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MoveResponse {
    /// Whether the move was applied.
    pub accepted: bool,
    /// Why not.
    pub reject_reason: Option<RejectInfo>,
    /// Cells changed by the request, as the mover sees them.
    pub board_delta: Vec<CellChange>,
    /// Removed stones.
    pub captured: Vec<Point>,
    /// Side to move next.
    pub next_turn: Option<Stone>,
    /// Ko record binding the next move.
    pub ko_record: Option<KoRecord>,
}

// ─────────────────────────────────────────────────────────────
//  Special actions
// ─────────────────────────────────────────────────────────────

/// Request for opening a special action.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StartActionRequest {
    /// Session ID.
    pub session_id: SessionId,
    /// Acting player.
    pub actor_id: PlayerId,
    /// Action to open.
    pub action_kind: ActionKind,
}

/// Response to a start request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StartActionResponse {
    /// Whether the action was opened.
    pub accepted: bool,
    /// Why not.
    pub reject_reason: Option<RejectInfo>,
    /// Selection window deadline.
    pub window_deadline: Option<Millis>,
}

/// Request for launching a missile.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubmitActionRequest {
    /// Session ID.
    pub session_id: SessionId,
    /// Acting player.
    pub actor_id: PlayerId,
    /// Stone to launch.
    pub origin: Point,
    /// Launch direction.
    pub direction: Direction,
}

/// Animation clients should play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnimationView {
    /// Launch point.
    pub from: Point,
    /// Landing point.
    pub to: Point,
    /// Start time; echo it in the commit signal.
    pub start_time: Millis,
    /// Planned duration.
    pub duration_ms: Millis,
    /// Uncovered hidden stone.
    pub revealed_point: Option<Point>,
}

impl From<Animation> for AnimationView {
    fn from(animation: Animation) -> Self {
        Self {
            from: animation.from(),
            to: animation.to(),
            start_time: animation.start(),
            duration_ms: animation.duration(),
            revealed_point: animation.revealed(),
        }
    }
}

/// Response to a submit request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SubmitActionResponse {
    /// Whether the missile was launched.
    pub accepted: bool,
    /// Why not.
    pub reject_reason: Option<RejectInfo>,
    /// The flight to animate.
    pub animation: Option<AnimationView>,
    /// Cells changed by the request, public view.
    pub board_delta: Vec<CellChange>,
}

/// Animation-complete signal.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommitRequest {
    /// Session ID.
    pub session_id: SessionId,
    /// Start time of the finished animation.
    pub animation_start_time: Millis,
}

/// Response to a commit signal.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommitResponse {
    /// Whether the animation is committed.
    pub committed: bool,
    /// What the signal did.
    pub outcome: Option<CommitOutcome>,
    /// Why it failed.
    pub reject_reason: Option<RejectInfo>,
    /// Cells changed by the request, public view.
    pub board_delta: Vec<CellChange>,
}

// ─────────────────────────────────────────────────────────────
//  Rejections
// ─────────────────────────────────────────────────────────────

impl MoveResponse {
    /// A refused move.
    pub fn rejected(err: &SessionError) -> Self {
        Self {
            reject_reason: Some(err.to_reject()),
            ..Self::default()
        }
    }
}

impl StartActionResponse {
    /// A refused start.
    pub fn rejected(err: &SessionError) -> Self {
        Self {
            reject_reason: Some(err.to_reject()),
            ..Self::default()
        }
    }
}

impl SubmitActionResponse {
    /// A refused launch.
    pub fn rejected(err: &SessionError) -> Self {
        Self {
            reject_reason: Some(err.to_reject()),
            ..Self::default()
        }
    }
}

impl CommitResponse {
    /// A failed commit.
    pub fn rejected(err: &SessionError) -> Self {
        Self {
            committed: false,
            outcome: None,
            reject_reason: Some(err.to_reject()),
            board_delta: Vec::new(),
        }
    }
}

impl JoinResponse {
    /// A refused seat.
    pub fn rejected(err: &SessionError) -> Self {
        Self {
            accepted: false,
            reject_reason: Some(err.to_reject()),
            stone: None,
            seat_token: None,
        }
    }
}

/// JSON schemas of every wire type, keyed by type name.
pub fn schemas() -> serde_json::Value {
    serde_json::json!({
        "CreateSessionRequest": schemars::schema_for!(CreateSessionRequest),
        "JoinRequest": schemars::schema_for!(JoinRequest),
        "JoinResponse": schemars::schema_for!(JoinResponse),
        "SpectateRequest": schemars::schema_for!(SpectateRequest),
        "MoveRequest": schemars::schema_for!(MoveRequest),
        "MoveResponse": schemars::schema_for!(MoveResponse),
        "StartActionRequest": schemars::schema_for!(StartActionRequest),
        "StartActionResponse": schemars::schema_for!(StartActionResponse),
        "SubmitActionRequest": schemars::schema_for!(SubmitActionRequest),
        "SubmitActionResponse": schemars::schema_for!(SubmitActionResponse),
        "CommitRequest": schemars::schema_for!(CommitRequest),
        "CommitResponse": schemars::schema_for!(CommitResponse),
        "SessionSnapshot": schemars::schema_for!(SessionSnapshot),
        "BoardView": schemars::schema_for!(BoardView),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_request_defaults() {
        let req: MoveRequest = serde_json::from_str(
            r#"{"session_id":"s","actor_id":"a","position":{"x":3,"y":4}}"#,
        )
        .unwrap();
        assert_eq!(req.position, Some(Point::new(3, 4)));
        assert!(!req.pass);
        assert!(!req.hidden);
    }

    #[test]
    fn test_rejected_response_carries_code() {
        let response = MoveResponse::rejected(&SessionError::GameOver);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["accepted"], false);
        assert_eq!(json["reject_reason"]["code"], "game-over");
    }

    #[test]
    fn test_schemas_cover_requests() {
        let schemas = schemas();
        assert!(schemas.get("MoveRequest").is_some());
        assert!(schemas.get("CommitResponse").is_some());
    }
}
