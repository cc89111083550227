//! Missile Go session core - authoritative live matches over a shared Go engine
//!
//! A session owns the board, move history, turn clock and the special-action
//! state machine of one match. Every request is applied under the session's
//! lock by the [`Reconciler`], which also fires timed transitions and
//! publishes each change with its cell delta.
//!
//! # Architecture
//!
//! - **Engine** (`go_engine`): pure placement, capture, ko and missile rules
//! - **Session**: seats, history, hidden stones, clock and special actions
//! - **Reconciler**: single writer per session plus the deadline sweep
//! - **Server**: thin axum adapter over the reconciler
//! - **Client**: optimistic shadow predictor using the same engine
//!
//! # Example
//!
//! ```
//! use missile_go::{GameSession, GameSettings, PlayerType, Point};
//!
//! let mut session = GameSession::new("demo".to_string(), GameSettings::default());
//! session.register_player("alice".into(), "Alice".into(), PlayerType::Human, 0)?;
//! session.register_player("bob".into(), "Bob".into(), PlayerType::Human, 0)?;
//!
//! let outcome = session.play_move("alice", Point::new(3, 3), false, 1_000)?;
//! assert!(outcome.captured.is_empty());
//! # Ok::<(), missile_go::SessionError>(())
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cli;
mod client;
mod clock;
mod config;
mod error;
mod events;
mod invariants;
mod reconciler;
mod server;
mod session;
mod snapshot;
mod special_action;
mod wire;

// Crate-level exports - Engine types
pub use go_engine::{
    Board, Cell, CellChange, Direction, KoRecord, PlayMode, Point, RejectReason, Rejection, Stone,
};

// Crate-level exports - Clock
pub use clock::{ClockError, ClockState, Millis, TurnClock, now_millis};

// Crate-level exports - Configuration
pub use config::{
    ConfigError, GameSettings, MAX_BOARD_SIZE, MAX_TIME_LIMIT_SECS, MAX_WINDOW_MS, ServerConfig,
};

// Crate-level exports - Errors
pub use error::{ErrorCode, RejectInfo, SessionError};

// Crate-level exports - Special actions
pub use special_action::{
    ActionKind, Animation, CommitOutcome, CommitTrigger, SpecialAction, SpecialActionState,
    StalenessPolicy,
};

// Crate-level exports - Session management
pub use session::{
    GameSession, GameStatus, HistoryEntry, MoveOutcome, Outcome, PlayerId, PlayerType, Seat,
    SessionId, SessionManager, SharedSession, Transition, lock_session,
};

// Crate-level exports - Invariants
pub use invariants::{Invariant, InvariantSet, InvariantViolation, SessionInvariants};

// Crate-level exports - Views and events
pub use events::{BroadcastSink, Publisher, SessionEvent, SnapshotSink, TracingSink};
pub use snapshot::{BoardView, ClockView, SessionSnapshot};

// Crate-level exports - Reconciler and transport
pub use reconciler::{Reconciler, spawn_sweeper};
pub use server::{AppState, ApiError, BoardQuery, SnapshotQuery, SpectateResponse, router, serve};
pub use wire::{
    AnimationView, CommitRequest, CommitResponse, CreateSessionRequest, JoinRequest, JoinResponse,
    MoveRequest, MoveResponse, SpectateRequest, StartActionRequest, StartActionResponse,
    SubmitActionRequest, SubmitActionResponse, schemas,
};

// Crate-level exports - Client prediction
pub use client::{Prediction, Reconciliation, ShadowSession};
