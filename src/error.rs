//! Session error types and their wire codes.

use go_engine::{PathError, RejectReason, Rejection, Stone};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Stable, machine-readable rejection code.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorCode {
    /// Target cell unusable.
    Occupied,
    /// Immediate ko recapture.
    Ko,
    /// Placement without liberties.
    Suicide,
    /// The actor is not the side to move.
    NotYourTurn,
    /// The request does not fit the current special-action state.
    InvalidActionState,
    /// No missiles or hidden stones left.
    ActionResourceExhausted,
    /// The selection window has closed.
    ActionWindowExpired,
    /// Missile origin or direction unusable.
    InvalidTarget,
    /// The actor is not seated in the session.
    UnknownPlayer,
    /// A player-specific view was asked for without that seat's token.
    InvalidSeatToken,
    /// No session with that id.
    SessionNotFound,
    /// A session with that id already exists.
    SessionExists,
    /// Both seats are taken.
    SessionFull,
    /// The game has ended or not started.
    GameOver,
    /// Session settings out of range.
    InvalidSettings,
    /// Session state failed a consistency check.
    CorruptState,
}

impl From<RejectReason> for ErrorCode {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::Occupied => ErrorCode::Occupied,
            RejectReason::Ko => ErrorCode::Ko,
            RejectReason::Suicide => ErrorCode::Suicide,
        }
    }
}

/// Why a session operation was refused.
///
/// A refused operation leaves the session exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum SessionError {
    /// The engine refused the move.
    #[display("{_0}")]
    Rejected(Rejection),

    /// The other side is to move.
    #[display("Not your turn, {expected} to move")]
    NotYourTurn {
        /// Side whose turn it is.
        expected: Stone,
    },

    /// The request does not fit the special-action state.
    #[display("Invalid action state: {_0}")]
    InvalidActionState(&'static str),

    /// No resource units left.
    #[display("No {_0} left")]
    ResourceExhausted(&'static str),

    /// The selection window closed before the submit.
    #[display("Action window expired at {_0}")]
    WindowExpired(i64),

    /// Missile origin or direction unusable.
    #[display("Invalid target: {_0}")]
    InvalidTarget(PathError),

    /// The actor has no seat in the session.
    #[display("Unknown player: {_0}")]
    UnknownPlayer(String),

    /// The seat token does not match the player.
    #[display("Invalid seat token for {_0}")]
    InvalidSeatToken(String),

    /// No such session.
    #[display("Session not found: {_0}")]
    SessionNotFound(String),

    /// The id is taken.
    #[display("Session already exists: {_0}")]
    SessionExists(String),

    /// Both seats are taken.
    #[display("Session already has 2 players")]
    SessionFull,

    /// The game is not being played.
    #[display("Game is not in progress")]
    GameOver,

    /// Settings a session cannot run with.
    #[display("Invalid settings: {_0}")]
    InvalidSettings(String),

    /// Session state failed a consistency check.
    #[display("Corrupt session state: {_0}")]
    CorruptState(String),
}

impl SessionError {
    /// The wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::Rejected(rejection) => rejection.reason().into(),
            SessionError::NotYourTurn { .. } => ErrorCode::NotYourTurn,
            SessionError::InvalidActionState(_) => ErrorCode::InvalidActionState,
            SessionError::ResourceExhausted(_) => ErrorCode::ActionResourceExhausted,
            SessionError::WindowExpired(_) => ErrorCode::ActionWindowExpired,
            SessionError::InvalidTarget(_) => ErrorCode::InvalidTarget,
            SessionError::UnknownPlayer(_) => ErrorCode::UnknownPlayer,
            SessionError::InvalidSeatToken(_) => ErrorCode::InvalidSeatToken,
            SessionError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            SessionError::SessionExists(_) => ErrorCode::SessionExists,
            SessionError::SessionFull => ErrorCode::SessionFull,
            SessionError::GameOver => ErrorCode::GameOver,
            SessionError::InvalidSettings(_) => ErrorCode::InvalidSettings,
            SessionError::CorruptState(_) => ErrorCode::CorruptState,
        }
    }

    /// Checks if the error is a refusal by the game rules, answered in-band
    /// with `accepted: false` rather than as a transport failure.
    pub fn is_rule_violation(&self) -> bool {
        !matches!(
            self,
            SessionError::UnknownPlayer(_)
                | SessionError::InvalidSeatToken(_)
                | SessionError::SessionNotFound(_)
                | SessionError::SessionExists(_)
                | SessionError::InvalidSettings(_)
                | SessionError::CorruptState(_)
        )
    }

    /// The `{ code, reason }` pair sent to clients.
    pub fn to_reject(&self) -> RejectInfo {
        RejectInfo {
            code: self.code(),
            reason: self.to_string(),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<Rejection> for SessionError {
    fn from(rejection: Rejection) -> Self {
        SessionError::Rejected(rejection)
    }
}

impl From<PathError> for SessionError {
    fn from(err: PathError) -> Self {
        SessionError::InvalidTarget(err)
    }
}

/// Rejection as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RejectInfo {
    /// Stable code.
    pub code: ErrorCode,
    /// Human-readable explanation.
    pub reason: String,
}
