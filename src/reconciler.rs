//! The single authority that applies client requests to sessions.
//!
//! Every operation takes the session lock, applies the deadlines that have
//! passed, runs the request, then publishes the change with the public cell
//! delta. Callers supply the time so tests can drive it.

use crate::clock::{Millis, now_millis};
use crate::config::GameSettings;
use crate::error::SessionError;
use crate::events::{Publisher, SessionEvent};
use crate::session::{GameSession, SessionId, SessionManager, Transition, lock_session};
use crate::snapshot::{BoardView, SessionSnapshot};
use crate::special_action::CommitOutcome;
use crate::wire::{
    CommitRequest, CommitResponse, CreateSessionRequest, JoinRequest, MoveRequest, MoveResponse,
    SpectateRequest, StartActionRequest, StartActionResponse, SubmitActionRequest,
    SubmitActionResponse,
};
use go_engine::{CellChange, Point, Stone};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Applies requests and time to the registered sessions.
#[derive(Debug, Clone)]
pub struct Reconciler {
    sessions: SessionManager,
    publisher: Publisher,
    defaults: GameSettings,
    next_id: Arc<AtomicU64>,
}

impl Reconciler {
    /// Creates a reconciler over `sessions`, using `defaults` for sessions
    /// created without settings.
    pub fn new(sessions: SessionManager, publisher: Publisher, defaults: GameSettings) -> Self {
        Self {
            sessions,
            publisher,
            defaults,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The session registry.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Runs `op` on a session after applying due deadlines, then publishes
    /// the change if the session moved.
    fn with_session<T>(
        &self,
        session_id: &str,
        now: Millis,
        op: impl FnOnce(&mut GameSession, &[Transition]) -> Result<T, SessionError>,
    ) -> Result<(T, Vec<CellChange>), SessionError> {
        self.with_session_as(session_id, None, now, op)
    }

    /// Like [`Self::with_session`], but the returned delta is the board as
    /// `viewer_id`'s seat sees it. Published events stay public.
    fn with_session_as<T>(
        &self,
        session_id: &str,
        viewer_id: Option<&str>,
        now: Millis,
        op: impl FnOnce(&mut GameSession, &[Transition]) -> Result<T, SessionError>,
    ) -> Result<(T, Vec<CellChange>), SessionError> {
        let shared = self.sessions.get_session(session_id)?;
        let mut session = lock_session(&shared)?;

        let before = session.visible_board(None);
        let before_viewer = viewer_id
            .and_then(|id| session.seat_of(id))
            .map(|seat| (*seat.stone(), session.visible_board(Some(*seat.stone()))));
        let version = *session.version();
        let transitions = session.advance(now);
        let result = op(&mut *session, &transitions);
        let delta = before.diff(&session.visible_board(None));
        let reply = match before_viewer {
            Some((stone, board)) => board.diff(&session.visible_board(Some(stone))),
            None => delta.clone(),
        };

        if *session.version() != version {
            self.publisher
                .publish(SessionEvent::capture(&session, now, delta, transitions));
        }
        result.map(|value| (value, reply))
    }

    // ─────────────────────────────────────────────────────────────
    //  Sessions and seats
    // ─────────────────────────────────────────────────────────────

    /// Creates a session and returns its first snapshot.
    #[instrument(skip(self, request), fields(session_id = ?request.session_id))]
    pub fn create_session(
        &self,
        request: CreateSessionRequest,
        now: Millis,
    ) -> Result<SessionSnapshot, SessionError> {
        let settings = request.settings.unwrap_or_else(|| self.defaults.clone());
        settings
            .validate()
            .map_err(|e| SessionError::InvalidSettings(e.message))?;

        let id = request.session_id.unwrap_or_else(|| self.generate_id(now));
        let shared = self.sessions.create_session(id, settings)?;
        let session = lock_session(&shared)?;
        Ok(SessionSnapshot::capture(&session, now, true, None))
    }

    fn generate_id(&self, now: Millis) -> SessionId {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("game_{now}_{seq}")
    }

    /// Seats a player and returns their colour, plus their seat token when
    /// the seat is new. Joining again never repeats the token.
    #[instrument(skip(self, request), fields(player_id = %request.player_id))]
    pub fn join_player(
        &self,
        session_id: &str,
        request: JoinRequest,
        now: Millis,
    ) -> Result<(Stone, Option<String>), SessionError> {
        let (seated, _) = self.with_session(session_id, now, |session, _| {
            let fresh = session.seat_of(&request.player_id).is_none();
            let player_id = request.player_id.clone();
            let stone =
                session.register_player(request.player_id, request.name, request.player_type, now)?;
            let token = if fresh {
                session.seat_token(&player_id).map(str::to_string)
            } else {
                None
            };
            Ok((stone, token))
        })?;
        Ok(seated)
    }

    /// Adds a spectator; returns `false` if already watching or seated.
    #[instrument(skip(self, request), fields(spectator_id = %request.spectator_id))]
    pub fn join_spectator(
        &self,
        session_id: &str,
        request: SpectateRequest,
        now: Millis,
    ) -> Result<bool, SessionError> {
        let (added, _) = self.with_session(session_id, now, |session, _| {
            Ok(session.add_spectator(request.spectator_id))
        })?;
        Ok(added)
    }

    // ─────────────────────────────────────────────────────────────
    //  Moves and special actions
    // ─────────────────────────────────────────────────────────────

    /// Places a stone or passes.
    ///
    /// A placement request without a position is read as the pass sentinel
    /// and refused as occupied. The returned delta is the mover's view, so
    /// it includes their own hidden stone.
    #[instrument(skip(self, request), fields(session_id = %request.session_id, actor_id = %request.actor_id))]
    pub fn handle_move(
        &self,
        request: &MoveRequest,
        now: Millis,
    ) -> Result<MoveResponse, SessionError> {
        let (outcome, board_delta) = self.with_session_as(
            &request.session_id,
            Some(&request.actor_id),
            now,
            |session, _| {
                if request.pass {
                    session.pass(&request.actor_id, now)
                } else {
                    let position = request.position.unwrap_or(Point::PASS);
                    session.play_move(&request.actor_id, position, request.hidden, now)
                }
            },
        )?;
        Ok(MoveResponse {
            accepted: true,
            reject_reason: None,
            board_delta,
            captured: outcome.captured,
            next_turn: Some(outcome.next_turn),
            ko_record: outcome.ko,
        })
    }

    /// Opens a special action.
    #[instrument(skip(self, request), fields(session_id = %request.session_id, actor_id = %request.actor_id))]
    pub fn start_action(
        &self,
        request: &StartActionRequest,
        now: Millis,
    ) -> Result<StartActionResponse, SessionError> {
        let (window_deadline, _) = self.with_session(&request.session_id, now, |session, _| {
            session.start_action(&request.actor_id, request.action_kind, now)
        })?;
        Ok(StartActionResponse {
            accepted: true,
            reject_reason: None,
            window_deadline: Some(window_deadline),
        })
    }

    /// Launches a missile.
    ///
    /// A submit that is the first event after the window closed is refused
    /// with the window's deadline; once a sweep has closed the window, later
    /// submits find no selecting action.
    #[instrument(skip(self, request), fields(session_id = %request.session_id, actor_id = %request.actor_id))]
    pub fn submit_action(
        &self,
        request: &SubmitActionRequest,
        now: Millis,
    ) -> Result<SubmitActionResponse, SessionError> {
        let (animation, board_delta) =
            self.with_session(&request.session_id, now, |session, transitions| {
                let actor = session.seat_of(&request.actor_id).map(|seat| *seat.stone());
                let expired = transitions.iter().find_map(|transition| match *transition {
                    Transition::WindowExpired {
                        actor: expired,
                        window_deadline,
                    } if Some(expired) == actor => Some(window_deadline),
                    _ => None,
                });
                if let Some(window_deadline) = expired {
                    warn!(window_deadline, "Submit arrived after the selection window");
                    return Err(SessionError::WindowExpired(window_deadline));
                }
                session.submit_action(&request.actor_id, request.origin, request.direction, now)
            })?;
        Ok(SubmitActionResponse {
            accepted: true,
            reject_reason: None,
            animation: Some(animation.into()),
            board_delta,
        })
    }

    /// Handles an animation-complete signal. Repeated signals are harmless.
    #[instrument(skip(self, request), fields(session_id = %request.session_id, start = request.animation_start_time))]
    pub fn commit_action(
        &self,
        request: &CommitRequest,
        now: Millis,
    ) -> Result<CommitResponse, SessionError> {
        let (outcome, board_delta) = self.with_session(&request.session_id, now, |session, _| {
            session.commit_action(request.animation_start_time, now)
        })?;
        if outcome == CommitOutcome::Ignored {
            debug!("Commit signal ignored");
        }
        Ok(CommitResponse {
            committed: outcome.committed(),
            outcome: Some(outcome),
            reject_reason: None,
            board_delta,
        })
    }

    // ─────────────────────────────────────────────────────────────
    //  Reads
    // ─────────────────────────────────────────────────────────────

    /// Current snapshot; the board is the view of `viewer_id`, public if
    /// the viewer holds no seat. Seated viewers must present their seat token.
    #[instrument(skip(self, seat_token))]
    pub fn snapshot(
        &self,
        session_id: &str,
        include_board: bool,
        viewer_id: Option<&str>,
        seat_token: Option<&str>,
        now: Millis,
    ) -> Result<SessionSnapshot, SessionError> {
        let (snapshot, _) = self.with_session(session_id, now, |session, _| {
            let viewer = session.authorize_viewer(viewer_id, seat_token)?;
            Ok(SessionSnapshot::capture(session, now, include_board, viewer))
        })?;
        Ok(snapshot)
    }

    /// The board as `viewer_id` may see it.
    #[instrument(skip(self, seat_token))]
    pub fn board(
        &self,
        session_id: &str,
        viewer_id: Option<&str>,
        seat_token: Option<&str>,
        now: Millis,
    ) -> Result<BoardView, SessionError> {
        let (view, _) = self.with_session(session_id, now, |session, _| {
            let viewer = session.authorize_viewer(viewer_id, seat_token)?;
            Ok(BoardView::from(&session.visible_board(viewer)))
        })?;
        Ok(view)
    }

    /// A copy of the full session state, for persistence.
    pub fn export_session(&self, session_id: &str) -> Result<GameSession, SessionError> {
        let shared = self.sessions.get_session(session_id)?;
        let session = lock_session(&shared)?;
        Ok(session.clone())
    }

    /// Installs an exported session and applies whatever deadlines passed
    /// while it was away.
    #[instrument(skip(self, session), fields(session_id = %session.id()))]
    pub fn restore_session(
        &self,
        session: GameSession,
        now: Millis,
    ) -> Result<SessionSnapshot, SessionError> {
        let id = session.id().clone();
        self.sessions.restore(session)?;
        self.snapshot(&id, false, None, None, now)
    }

    // ─────────────────────────────────────────────────────────────
    //  Time
    // ─────────────────────────────────────────────────────────────

    /// Applies due deadlines to every session; returns how many changed.
    #[instrument(skip(self))]
    pub fn sweep(&self, now: Millis) -> usize {
        let sessions = match self.sessions.all() {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "Sweep could not read the registry");
                return 0;
            }
        };

        let mut changed = 0;
        for shared in sessions {
            let mut session = match lock_session(&shared) {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, "Skipping session during sweep");
                    continue;
                }
            };
            let before = session.visible_board(None);
            let transitions = session.advance(now);
            if transitions.is_empty() {
                continue;
            }
            let delta = before.diff(&session.visible_board(None));
            debug!(session_id = %session.id(), ?transitions, "Sweep applied deadlines");
            self.publisher
                .publish(SessionEvent::capture(&session, now, delta, transitions));
            changed += 1;
        }
        changed
    }
}

/// Sweeps `reconciler` every `interval` on the wall clock.
pub fn spawn_sweeper(reconciler: Reconciler, interval: Duration) -> JoinHandle<()> {
    info!(interval_ms = interval.as_millis() as u64, "Starting deadline sweeper");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let changed = reconciler.sweep(now_millis());
            if changed > 0 {
                debug!(changed, "Deadline sweep");
            }
        }
    })
}
