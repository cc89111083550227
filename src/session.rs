//! Authoritative game sessions and the session registry.

use crate::clock::{Millis, TurnClock};
use crate::config::GameSettings;
use crate::error::SessionError;
use crate::invariants::{InvariantSet, SessionInvariants};
use crate::special_action::{
    ActionKind, Animation, CommitOutcome, CommitTrigger, DueTransition, SpecialAction,
    SpecialActionState,
};
use derive_getters::Getters;
use go_engine::{
    Board, Cell, Direction, KoRecord, Move, PlayMode, Point, Stone, evaluate_move, missile_path,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

/// Unique identifier for a game session.
pub type SessionId = String;

/// Unique identifier for a player or spectator.
pub type PlayerId = String;

/// Type of player.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum PlayerType {
    /// A person at a client.
    #[default]
    Human,
    /// A bot seated by single-player mode.
    Bot,
}

/// A seated player and the items they hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Getters)]
pub struct Seat {
    /// Player's unique ID.
    player_id: PlayerId,
    /// Display name.
    name: String,
    /// Human or bot.
    player_type: PlayerType,
    /// Colour played.
    stone: Stone,
    /// Missiles left.
    missiles: u32,
    /// Hidden placements left.
    hidden_stones: u32,
}

/// One entry of the move history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    /// A stone put on `point`.
    Stone {
        /// Where.
        point: Point,
        /// By whom.
        player: Stone,
        /// Placed face down.
        hidden: bool,
    },
    /// A pass.
    Pass {
        /// By whom.
        player: Stone,
    },
}

impl HistoryEntry {
    /// The side that made the entry.
    pub fn player(&self) -> Stone {
        match *self {
            HistoryEntry::Stone { player, .. } | HistoryEntry::Pass { player } => player,
        }
    }

    /// The board point, `None` for passes.
    pub fn point(&self) -> Option<Point> {
        match *self {
            HistoryEntry::Stone { point, .. } => Some(point),
            HistoryEntry::Pass { .. } => None,
        }
    }
}

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// Both sides passed in a row.
    TwoPasses,
    /// `loser` ran out of time.
    Timeout {
        /// The side whose clock expired.
        loser: Stone,
    },
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GameStatus {
    /// Waiting for the second seat.
    Waiting,
    /// Moves are accepted.
    Playing,
    /// The game has ended.
    Finished {
        /// How it ended.
        outcome: Outcome,
    },
}

/// A state change driven by time rather than by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// The selection window closed; one missile forfeited.
    WindowExpired {
        /// Side that lost the missile.
        actor: Stone,
        /// When the window closed.
        window_deadline: Millis,
    },
    /// An animation was committed.
    Committed {
        /// What forced the commit.
        trigger: CommitTrigger,
        /// The committed animation.
        animation: Animation,
    },
    /// An inconsistent `Executing` state was cleared without board effects.
    Repaired {
        /// The discarded animation.
        animation: Animation,
    },
    /// A side ran out of time and lost.
    TimedOut {
        /// The side whose clock expired.
        loser: Stone,
    },
}

/// Result of an accepted move or pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Removed opponent stones.
    pub captured: Vec<Point>,
    /// Ko record binding the next move.
    pub ko: Option<KoRecord>,
    /// Side to move next.
    pub next_turn: Stone,
}

/// A live match: board, history, clock and special-action state.
#[derive(Debug, Clone, Serialize, Deserialize, Getters)]
pub struct GameSession {
    /// Session ID.
    id: SessionId,
    /// Rules and timings.
    settings: GameSettings,
    /// Authoritative board.
    board: Board,
    /// Ordered move history; its length is the move count.
    history: Vec<HistoryEntry>,
    /// Side to move.
    to_move: Stone,
    /// Live ko record.
    ko: Option<KoRecord>,
    /// Turn clock.
    clock: TurnClock,
    /// Special-action slot.
    special: SpecialActionState,
    /// Black seat.
    black: Option<Seat>,
    /// White seat.
    white: Option<Seat>,
    /// Per-seat secrets unlocking the owner's view of hidden stones.
    #[serde(default)]
    #[getter(skip)]
    seat_tokens: BTreeMap<PlayerId, String>,
    /// Broadcast-only viewers.
    spectators: BTreeSet<PlayerId>,
    /// Hidden stones that have been uncovered for good.
    revealed: BTreeSet<Point>,
    /// Lifecycle.
    status: GameStatus,
    /// Passes in a row.
    consecutive_passes: u8,
    /// Bumped on every state change.
    version: u64,
}

impl GameSession {
    /// Creates a session waiting for players.
    #[instrument(skip(settings), fields(board_size = settings.board_size()))]
    pub fn new(id: SessionId, settings: GameSettings) -> Self {
        info!(session_id = %id, "Creating new game session");
        Self {
            board: Board::new(*settings.board_size()),
            clock: TurnClock::new(settings.time_limit()),
            id,
            settings,
            history: Vec::new(),
            to_move: Stone::Black,
            ko: None,
            special: SpecialActionState::default(),
            black: None,
            white: None,
            seat_tokens: BTreeMap::new(),
            spectators: BTreeSet::new(),
            revealed: BTreeSet::new(),
            status: GameStatus::Waiting,
            consecutive_passes: 0,
            version: 0,
        }
    }

    /// Number of history entries, the index of the next move.
    pub fn move_count(&self) -> usize {
        self.history.len()
    }

    /// Seat playing `stone`.
    pub fn seat(&self, stone: Stone) -> Option<&Seat> {
        match stone {
            Stone::Black => self.black.as_ref(),
            Stone::White => self.white.as_ref(),
        }
    }

    fn seat_mut(&mut self, stone: Stone) -> Option<&mut Seat> {
        match stone {
            Stone::Black => self.black.as_mut(),
            Stone::White => self.white.as_mut(),
        }
    }

    /// Seat held by `player_id`.
    pub fn seat_of(&self, player_id: &str) -> Option<&Seat> {
        [self.black.as_ref(), self.white.as_ref()]
            .into_iter()
            .flatten()
            .find(|seat| seat.player_id == player_id)
    }

    /// Token handed to `player_id` when seated.
    pub fn seat_token(&self, player_id: &str) -> Option<&str> {
        self.seat_tokens.get(player_id).map(String::as_str)
    }

    /// Resolves whose view of hidden stones a caller may have.
    ///
    /// Seated viewers must present their seat token; anyone else gets the
    /// public view.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidSeatToken`] when a seated viewer's token is
    /// missing or wrong.
    pub fn authorize_viewer(
        &self,
        viewer_id: Option<&str>,
        seat_token: Option<&str>,
    ) -> Result<Option<Stone>, SessionError> {
        let Some(seat) = viewer_id.and_then(|id| self.seat_of(id)) else {
            return Ok(None);
        };
        if seat_token.is_some() && seat_token == self.seat_token(&seat.player_id) {
            Ok(Some(seat.stone))
        } else {
            warn!(player_id = %seat.player_id, "Seat token rejected");
            Err(SessionError::InvalidSeatToken(seat.player_id.clone()))
        }
    }

    /// Everyone who receives broadcasts.
    pub fn audience(&self) -> Vec<PlayerId> {
        [self.black.as_ref(), self.white.as_ref()]
            .into_iter()
            .flatten()
            .map(|seat| seat.player_id.clone())
            .chain(self.spectators.iter().cloned())
            .collect()
    }

    /// Checks if `id` is seated or spectating.
    pub fn is_participant(&self, id: &str) -> bool {
        self.seat_of(id).is_some() || self.spectators.contains(id)
    }

    /// Registers a player; the first seat is Black, the second White.
    ///
    /// In single-player mode the bot takes its seat together with the human.
    /// Filling both seats starts the game. Registering an already seated
    /// player returns their colour.
    #[instrument(skip(self, name), fields(session_id = %self.id))]
    pub fn register_player(
        &mut self,
        player_id: PlayerId,
        name: String,
        player_type: PlayerType,
        now: Millis,
    ) -> Result<Stone, SessionError> {
        if let Some(seat) = self.seat_of(&player_id) {
            debug!(stone = %seat.stone, "Player already seated");
            return Ok(seat.stone);
        }

        let mode = *self.settings.mode();
        let stone = match mode {
            PlayMode::SinglePlayer { bot } if self.black.is_none() && self.white.is_none() => {
                let bot_seat = self.new_seat(format!("{}_bot", self.id), "Bot", PlayerType::Bot, bot);
                self.place_seat(bot_seat);
                bot.opponent()
            }
            _ if self.black.is_none() => Stone::Black,
            _ if self.white.is_none() => Stone::White,
            _ => {
                warn!(player_id = %player_id, "Session already has 2 players");
                return Err(SessionError::SessionFull);
            }
        };

        info!(player_id = %player_id, %stone, "Registering player");
        self.spectators.remove(&player_id);
        let seat = self.new_seat(player_id, &name, player_type, stone);
        self.place_seat(seat);

        if self.black.is_some() && self.white.is_some() {
            self.status = GameStatus::Playing;
            self.to_move = Stone::Black;
            self.clock.start(now, Stone::Black);
            info!("Both seats taken, game started");
        }
        self.touch();
        Ok(stone)
    }

    fn new_seat(&self, player_id: PlayerId, name: &str, player_type: PlayerType, stone: Stone) -> Seat {
        Seat {
            player_id,
            name: name.to_string(),
            player_type,
            stone,
            missiles: *self.settings.missile_count(),
            hidden_stones: *self.settings.hidden_stone_count(),
        }
    }

    fn place_seat(&mut self, seat: Seat) {
        self.seat_tokens
            .insert(seat.player_id.clone(), format!("{:032x}", rand::random::<u128>()));
        match seat.stone {
            Stone::Black => self.black = Some(seat),
            Stone::White => self.white = Some(seat),
        }
    }

    /// Adds a spectator; returns `false` if already present or seated.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn add_spectator(&mut self, spectator_id: PlayerId) -> bool {
        if self.seat_of(&spectator_id).is_some() {
            return false;
        }
        let added = self.spectators.insert(spectator_id);
        if added {
            self.touch();
        }
        added
    }

    /// Checks if the stone on `point` is hidden and not yet uncovered.
    pub fn is_concealed(&self, point: Point) -> bool {
        !self.revealed.contains(&point)
            && self.latest_entry(point).is_some_and(|entry| {
                matches!(entry, HistoryEntry::Stone { hidden: true, .. })
            })
    }

    fn latest_entry(&self, point: Point) -> Option<HistoryEntry> {
        self.history
            .iter()
            .rev()
            .find(|entry| entry.point() == Some(point))
            .copied()
    }

    /// The board as `viewer` may see it: concealed stones of the other side
    /// read as empty. `None` is the public view.
    pub fn visible_board(&self, viewer: Option<Stone>) -> Board {
        let mut board = self.board.clone();
        for (point, stone) in self.board.stones() {
            if Some(stone) != viewer && self.is_concealed(point) {
                // Points come from the board itself.
                let _ = board.set(point, Cell::Empty);
            }
        }
        board
    }

    // ─────────────────────────────────────────────────────────────
    //  Deadlines
    // ─────────────────────────────────────────────────────────────

    /// Applies every deadline that has passed at `now`.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn advance(&mut self, now: Millis) -> Vec<Transition> {
        let mut transitions = Vec::new();
        if self.status != GameStatus::Playing {
            return transitions;
        }

        if let Some(SpecialAction::Executing {
            actor, animation, ..
        }) = *self.special.current()
        {
            let landed = self.board.get(animation.to()) == Some(Cell::Occupied(actor));
            let committed = *self.special.last_committed() == Some(animation.start());
            if !landed || committed {
                warn!(
                    landed,
                    committed,
                    start = animation.start(),
                    "Clearing stuck missile animation"
                );
                self.special.finish(Some(animation.start()));
                self.resume_for(actor, now);
                transitions.push(Transition::Repaired { animation });
            }
        }

        match self.special.due(now, &self.settings.staleness()) {
            Some(DueTransition::WindowExpired {
                actor,
                window_deadline,
            }) => {
                self.expire_selection(actor, now);
                transitions.push(Transition::WindowExpired {
                    actor,
                    window_deadline,
                });
            }
            Some(DueTransition::Commit(trigger)) => match self
                .transact(|session| session.apply_commit(trigger, now))
            {
                Ok(animation) => transitions.push(Transition::Committed { trigger, animation }),
                Err(e) => error!(error = %e, "Timed commit failed"),
            },
            None => {}
        }

        if let Some(loser) = self.clock.expired_side(now) {
            self.finish(Outcome::Timeout { loser }, now);
            transitions.push(Transition::TimedOut { loser });
        }

        if !transitions.is_empty() {
            self.touch();
        }
        transitions
    }

    fn expire_selection(&mut self, actor: Stone, now: Millis) {
        warn!(%actor, "Missile selection window expired");
        self.special.finish(None);
        if let Some(seat) = self.seat_mut(actor) {
            seat.missiles = seat.missiles.saturating_sub(1);
        }
        self.resume_for(actor, now);
    }

    fn resume_for(&mut self, actor: Stone, now: Millis) {
        if let Err(e) = self.clock.resume(now, actor) {
            warn!(error = %e, %actor, "Clock was not paused for the actor");
        }
    }

    fn finish(&mut self, outcome: Outcome, now: Millis) {
        info!(?outcome, "Game finished");
        self.status = GameStatus::Finished { outcome };
        self.clock.stop(now);
    }

    // ─────────────────────────────────────────────────────────────
    //  Moves
    // ─────────────────────────────────────────────────────────────

    fn actor_stone(&self, player_id: &str) -> Result<Stone, SessionError> {
        self.seat_of(player_id).map(|seat| seat.stone).ok_or_else(|| {
            warn!(player_id, "Unknown player");
            SessionError::UnknownPlayer(player_id.to_string())
        })
    }

    fn ready_to_act(&self, player_id: &str) -> Result<Stone, SessionError> {
        let actor = self.actor_stone(player_id)?;
        if self.status != GameStatus::Playing {
            return Err(SessionError::GameOver);
        }
        if !self.special.is_idle() {
            return Err(SessionError::InvalidActionState(
                "a special action is in progress",
            ));
        }
        if actor != self.to_move {
            warn!(player_id, %actor, expected = %self.to_move, "Player tried to move out of turn");
            return Err(SessionError::NotYourTurn {
                expected: self.to_move,
            });
        }
        Ok(actor)
    }

    /// Places a stone for `player_id`, optionally hidden.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn play_move(
        &mut self,
        player_id: &str,
        position: Point,
        hidden: bool,
        now: Millis,
    ) -> Result<MoveOutcome, SessionError> {
        self.transact(|session| session.place_stone(player_id, position, hidden, now))
    }

    fn place_stone(
        &mut self,
        player_id: &str,
        position: Point,
        hidden: bool,
        now: Millis,
    ) -> Result<MoveOutcome, SessionError> {
        let actor = self.ready_to_act(player_id)?;
        if hidden && self.seat(actor).is_none_or(|seat| seat.hidden_stones == 0) {
            return Err(SessionError::ResourceExhausted("hidden stones"));
        }

        let placement = evaluate_move(
            &self.board,
            Move::new(actor, position),
            self.ko,
            self.move_count(),
            self.settings.evaluation_options(),
        )
        .inspect_err(|rejection| warn!(%rejection, "Move rejected"))?;

        for point in &placement.captured {
            self.revealed.remove(point);
        }
        self.board = placement.board;
        self.history.push(HistoryEntry::Stone {
            point: position,
            player: actor,
            hidden,
        });
        if hidden {
            if let Some(seat) = self.seat_mut(actor) {
                seat.hidden_stones -= 1;
            }
        }
        self.ko = placement.ko;
        self.consecutive_passes = 0;
        self.end_turn(actor, now)?;
        self.touch();
        self.checked()?;

        info!(
            %actor,
            %position,
            hidden,
            captured = placement.captured.len(),
            move_count = self.move_count(),
            "Move completed successfully"
        );
        Ok(MoveOutcome {
            captured: placement.captured,
            ko: self.ko,
            next_turn: self.to_move,
        })
    }

    /// Passes for `player_id`; the second pass in a row ends the game.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn pass(&mut self, player_id: &str, now: Millis) -> Result<MoveOutcome, SessionError> {
        self.transact(|session| session.record_pass(player_id, now))
    }

    fn record_pass(&mut self, player_id: &str, now: Millis) -> Result<MoveOutcome, SessionError> {
        let actor = self.ready_to_act(player_id)?;
        self.history.push(HistoryEntry::Pass { player: actor });
        self.ko = None;
        self.consecutive_passes += 1;
        if self.consecutive_passes >= 2 {
            self.to_move = actor.opponent();
            self.finish(Outcome::TwoPasses, now);
        } else {
            self.end_turn(actor, now)?;
        }
        self.touch();
        self.checked()?;

        info!(%actor, passes = self.consecutive_passes, "Pass recorded");
        Ok(MoveOutcome {
            captured: Vec::new(),
            ko: None,
            next_turn: self.to_move,
        })
    }

    fn end_turn(&mut self, actor: Stone, now: Millis) -> Result<(), SessionError> {
        let next = actor.opponent();
        self.to_move = next;
        self.clock
            .switch_turn(now, next)
            .map_err(|e| SessionError::CorruptState(e.to_string()))
    }

    // ─────────────────────────────────────────────────────────────
    //  Special actions
    // ─────────────────────────────────────────────────────────────

    /// Opens a special action for `player_id` and returns the window deadline.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn start_action(
        &mut self,
        player_id: &str,
        kind: ActionKind,
        now: Millis,
    ) -> Result<Millis, SessionError> {
        self.transact(|session| session.begin_action(player_id, kind, now))
    }

    fn begin_action(
        &mut self,
        player_id: &str,
        kind: ActionKind,
        now: Millis,
    ) -> Result<Millis, SessionError> {
        let actor = self.ready_to_act(player_id)?;
        let left = match kind {
            ActionKind::Missile => self.seat(actor).map_or(0, |seat| seat.missiles),
        };
        if left == 0 {
            warn!(%actor, %kind, "No resource left for special action");
            return Err(SessionError::ResourceExhausted("missiles"));
        }

        let window_deadline = self
            .clock
            .pause(now, *self.settings.selection_window_ms())
            .map_err(|e| SessionError::CorruptState(e.to_string()))?;
        self.special.begin(kind, actor, window_deadline);
        self.touch();
        self.checked()?;

        info!(%actor, %kind, window_deadline, "Special action selecting");
        Ok(window_deadline)
    }

    /// Launches the missile chosen by `player_id`.
    ///
    /// The landing point receives the stone at once; the origin keeps its
    /// stone until the commit.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn submit_action(
        &mut self,
        player_id: &str,
        origin: Point,
        direction: Direction,
        now: Millis,
    ) -> Result<Animation, SessionError> {
        self.transact(|session| session.launch(player_id, origin, direction, now))
    }

    fn launch(
        &mut self,
        player_id: &str,
        origin: Point,
        direction: Direction,
        now: Millis,
    ) -> Result<Animation, SessionError> {
        let actor = self.actor_stone(player_id)?;
        if self.status != GameStatus::Playing {
            return Err(SessionError::GameOver);
        }
        let (kind, window_deadline) = match *self.special.current() {
            None => {
                return Err(SessionError::InvalidActionState(
                    "no special action is selecting",
                ));
            }
            Some(SpecialAction::Executing { .. }) => {
                return Err(SessionError::InvalidActionState(
                    "an animation is in progress",
                ));
            }
            Some(SpecialAction::Selecting { actor: owner, .. }) if owner != actor => {
                return Err(SessionError::NotYourTurn { expected: owner });
            }
            Some(SpecialAction::Selecting {
                kind,
                window_deadline,
                ..
            }) => (kind, window_deadline),
        };
        if now > window_deadline {
            return Err(SessionError::WindowExpired(window_deadline));
        }

        let path = missile_path(&self.board, origin, direction, actor, &|p: Point| {
            self.is_concealed(p)
        })
        .inspect_err(|e| warn!(error = %e, "Missile target rejected"))?;

        self.board
            .set(path.to, Cell::Occupied(actor))
            .map_err(|e| SessionError::CorruptState(e.to_string()))?;
        self.history.push(HistoryEntry::Stone {
            point: path.to,
            player: actor,
            hidden: false,
        });
        if let Some(seat) = self.seat_mut(actor) {
            seat.missiles = seat.missiles.saturating_sub(1);
        }
        if let Some(revealed) = path.revealed {
            self.revealed.insert(revealed);
        }

        let duration = *self.settings.animation_ms();
        let animation = match (kind, path.revealed) {
            (ActionKind::Missile, None) => Animation::Missile {
                from: path.from,
                to: path.to,
                actor,
                start: now,
                duration,
            },
            (ActionKind::Missile, Some(revealed)) => Animation::HiddenMissile {
                from: path.from,
                to: path.to,
                actor,
                start: now,
                duration,
                revealed,
            },
        };
        self.special.execute(animation);
        self.touch();
        self.checked()?;

        info!(%actor, from = %path.from, to = %path.to, revealed = ?path.revealed, "Missile launched");
        Ok(animation)
    }

    /// Handles an animation-complete signal. Idempotent.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn commit_action(
        &mut self,
        animation_start: Millis,
        now: Millis,
    ) -> Result<CommitOutcome, SessionError> {
        let outcome = self.special.classify_signal(animation_start);
        match outcome {
            CommitOutcome::Applied => {
                self.transact(|session| session.apply_commit(CommitTrigger::Signal, now))?;
            }
            CommitOutcome::Repaired => {
                if let Some(SpecialAction::Executing { actor, .. }) = *self.special.current() {
                    warn!(animation_start, "Duplicate commit clears stuck animation");
                    self.special.finish(Some(animation_start));
                    self.resume_for(actor, now);
                    self.touch();
                }
            }
            CommitOutcome::AlreadyCommitted => {
                debug!(animation_start, "Animation already committed");
            }
            CommitOutcome::Ignored => {
                warn!(animation_start, "Commit signal matches no animation");
            }
        }
        Ok(outcome)
    }

    fn apply_commit(&mut self, trigger: CommitTrigger, now: Millis) -> Result<Animation, SessionError> {
        let Some(SpecialAction::Executing {
            actor, animation, ..
        }) = *self.special.current()
        else {
            return Err(SessionError::InvalidActionState("no animation to commit"));
        };

        let from = animation.from();
        if self.board.get(from) == Some(Cell::Occupied(actor)) {
            self.board
                .set(from, Cell::Empty)
                .map_err(|e| SessionError::CorruptState(e.to_string()))?;
        }
        let stale = self.history.iter().rposition(|entry| {
            matches!(*entry, HistoryEntry::Stone { point, player, .. } if point == from && player == actor)
        });
        if let Some(index) = stale {
            self.history.remove(index);
        }
        if let Some(revealed) = animation.revealed() {
            self.revealed.insert(revealed);
        }

        self.special.finish(Some(animation.start()));
        self.resume_for(actor, now);
        self.touch();
        self.checked()?;

        info!(%trigger, %actor, from = %from, to = %animation.to(), "Missile committed");
        Ok(animation)
    }

    // ─────────────────────────────────────────────────────────────
    //  Consistency
    // ─────────────────────────────────────────────────────────────

    /// Runs every session invariant.
    pub fn verify(&self) -> Result<(), SessionError> {
        SessionInvariants::check_all(self).map_err(|violations| {
            let descriptions = violations
                .iter()
                .map(|v| v.description.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            error!(session_id = %self.id, %descriptions, "Session invariant violated");
            SessionError::CorruptState(descriptions)
        })
    }

    fn checked(&self) -> Result<(), SessionError> {
        if cfg!(debug_assertions) {
            self.verify()
        } else {
            Ok(())
        }
    }

    /// Runs `op` and puts the session back as it was if `op` fails.
    fn transact<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let saved = self.clone();
        let result = op(self);
        if result.is_err() {
            *self = saved;
        }
        result
    }

    fn touch(&mut self) {
        self.version += 1;
    }
}

/// A session behind its own lock; holding the lock makes the caller the
/// session's single writer.
pub type SharedSession = Arc<Mutex<GameSession>>;

/// Locks a session.
pub fn lock_session(session: &SharedSession) -> Result<MutexGuard<'_, GameSession>, SessionError> {
    session
        .lock()
        .map_err(|_| SessionError::CorruptState("session lock poisoned".to_string()))
}

/// Registry of live sessions.
#[derive(Debug, Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<SessionId, SharedSession>>>,
}

impl SessionManager {
    /// Creates an empty registry.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating session manager");
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn registry(&self) -> Result<MutexGuard<'_, HashMap<SessionId, SharedSession>>, SessionError> {
        self.sessions
            .lock()
            .map_err(|_| SessionError::CorruptState("session registry lock poisoned".to_string()))
    }

    /// Creates a new session.
    #[instrument(skip(self, settings))]
    pub fn create_session(
        &self,
        id: SessionId,
        settings: GameSettings,
    ) -> Result<SharedSession, SessionError> {
        let session = Arc::new(Mutex::new(GameSession::new(id.clone(), settings)));
        let mut sessions = self.registry()?;
        if sessions.contains_key(&id) {
            warn!(session_id = %id, "Session already exists");
            return Err(SessionError::SessionExists(id));
        }
        sessions.insert(id.clone(), Arc::clone(&session));
        info!(session_id = %id, "Created new session");
        Ok(session)
    }

    /// Gets a session by ID.
    #[instrument(skip(self))]
    pub fn get_session(&self, id: &str) -> Result<SharedSession, SessionError> {
        let sessions = self.registry()?;
        sessions.get(id).cloned().ok_or_else(|| {
            debug!(session_id = id, "Session not found");
            SessionError::SessionNotFound(id.to_string())
        })
    }

    /// Installs a previously exported session, replacing any live copy.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub fn restore(&self, session: GameSession) -> Result<SharedSession, SessionError> {
        session.verify()?;
        let id = session.id.clone();
        let shared = Arc::new(Mutex::new(session));
        self.registry()?.insert(id, Arc::clone(&shared));
        info!("Session restored");
        Ok(shared)
    }

    /// Removes a session.
    #[instrument(skip(self))]
    pub fn remove_session(&self, id: &str) -> Result<Option<SharedSession>, SessionError> {
        Ok(self.registry()?.remove(id))
    }

    /// Lists all session IDs.
    #[instrument(skip(self))]
    pub fn list_sessions(&self) -> Result<Vec<SessionId>, SessionError> {
        let sessions = self.registry()?;
        let ids: Vec<_> = sessions.keys().cloned().collect();
        debug!(count = ids.len(), "Listed sessions");
        Ok(ids)
    }

    /// Handles to every session, for sweeping.
    pub fn all(&self) -> Result<Vec<SharedSession>, SessionError> {
        Ok(self.registry()?.values().cloned().collect())
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
