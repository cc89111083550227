//! HTTP adapter exposing the reconciler as JSON.
//!
//! Refusals by the game rules are answered `200` with `accepted: false`
//! and a `{ code, reason }` pair. Missing sessions, unknown players and
//! broken state map to HTTP error statuses with the same body shape.
//!
//! Player-specific views of hidden stones need the seat token handed out
//! at join. Actors in move and action requests are taken at their word;
//! deployments put an authenticating proxy in front.

use crate::clock::{Millis, now_millis};
use crate::config::ServerConfig;
use crate::error::{ErrorCode, SessionError};
use crate::events::{BroadcastSink, Publisher, SnapshotSink, TracingSink};
use crate::reconciler::{Reconciler, spawn_sweeper};
use crate::session::SessionManager;
use crate::snapshot::{BoardView, SessionSnapshot};
use crate::wire::{
    CommitRequest, CommitResponse, CreateSessionRequest, JoinRequest, JoinResponse, MoveRequest,
    MoveResponse, SpectateRequest, StartActionRequest, StartActionResponse, SubmitActionRequest,
    SubmitActionResponse,
};
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{Request, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower::util::MapRequestLayer;
use tracing::{debug, info, instrument, warn};

/// Events buffered per slow event-stream subscriber.
const EVENT_BUFFER: usize = 256;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    reconciler: Reconciler,
    events: BroadcastSink,
    now: fn() -> Millis,
}

impl AppState {
    /// State reading the wall clock. `events` must be one of the
    /// reconciler's publisher sinks.
    pub fn new(reconciler: Reconciler, events: BroadcastSink) -> Self {
        Self::with_time_source(reconciler, events, now_millis)
    }

    /// State reading time from `now`.
    pub fn with_time_source(
        reconciler: Reconciler,
        events: BroadcastSink,
        now: fn() -> Millis,
    ) -> Self {
        Self {
            reconciler,
            events,
            now,
        }
    }

    /// The wrapped reconciler.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }
}

/// A session error that is not a rule refusal.
#[derive(Debug)]
pub struct ApiError(SessionError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.code() {
            ErrorCode::SessionNotFound => StatusCode::NOT_FOUND,
            ErrorCode::SessionExists => StatusCode::CONFLICT,
            ErrorCode::UnknownPlayer | ErrorCode::InvalidSeatToken => StatusCode::FORBIDDEN,
            ErrorCode::InvalidSettings => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(%status, error = %self.0, "Request failed");
        (status, Json(self.0.to_reject())).into_response()
    }
}

fn respond<T>(
    result: Result<T, SessionError>,
    rejected: fn(&SessionError) -> T,
) -> Result<Json<T>, ApiError> {
    match result {
        Ok(body) => Ok(Json(body)),
        Err(e) if e.is_rule_violation() => {
            debug!(code = %e.code(), "Request refused");
            Ok(Json(rejected(&e)))
        }
        Err(e) => Err(ApiError(e)),
    }
}

/// Query of the snapshot route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotQuery {
    /// Include the grid.
    #[serde(default)]
    pub board: bool,
    /// Player whose view of hidden stones is wanted.
    pub viewer: Option<String>,
    /// The viewer's seat token.
    pub token: Option<String>,
}

/// Query of the board route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardQuery {
    /// Player whose view of hidden stones is wanted.
    pub viewer: Option<String>,
    /// The viewer's seat token.
    pub token: Option<String>,
}

/// Answer of the spectate route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectateResponse {
    /// `false` if already watching or seated.
    pub added: bool,
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/{id}", get(snapshot))
        .route("/sessions/{id}/board", get(board))
        .route("/sessions/{id}/events", get(session_events))
        .route("/sessions/{id}/players", post(join_player))
        .route("/sessions/{id}/spectators", post(join_spectator))
        .route("/move", post(make_move))
        .route("/actions/start", post(start_action))
        .route("/actions/submit", post(submit_action))
        .route("/actions/commit", post(commit_action))
        .layer(MapRequestLayer::new(|req: Request<Body>| {
            debug!(method = %req.method(), uri = %req.uri(), "Incoming HTTP request");
            req
        }))
        .with_state(state)
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let snapshot = state
        .reconciler
        .create_session(request, (state.now)())
        .map_err(ApiError)?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn list_sessions(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let mut ids = state
        .reconciler
        .sessions()
        .list_sessions()
        .map_err(ApiError)?;
    ids.sort();
    Ok(Json(ids))
}

async fn snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state
        .reconciler
        .snapshot(
            &id,
            query.board,
            query.viewer.as_deref(),
            query.token.as_deref(),
            (state.now)(),
        )
        .map(Json)
        .map_err(ApiError)
}

async fn board(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<BoardQuery>,
) -> Result<Json<BoardView>, ApiError> {
    state
        .reconciler
        .board(
            &id,
            query.viewer.as_deref(),
            query.token.as_deref(),
            (state.now)(),
        )
        .map(Json)
        .map_err(ApiError)
}

/// Streams the public events of one session as server-sent events.
async fn session_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    state
        .reconciler
        .sessions()
        .get_session(&id)
        .map_err(ApiError)?;
    info!(session_id = %id, "Event stream opened");
    let stream = state
        .events
        .session_stream(id)
        .map(|event| Event::default().event("session").json_data(&event));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn join_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, ApiError> {
    let result = state
        .reconciler
        .join_player(&id, request, (state.now)())
        .map(|(stone, seat_token)| JoinResponse {
            accepted: true,
            reject_reason: None,
            stone: Some(stone),
            seat_token,
        });
    respond(result, JoinResponse::rejected)
}

async fn join_spectator(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SpectateRequest>,
) -> Result<Json<SpectateResponse>, ApiError> {
    state
        .reconciler
        .join_spectator(&id, request, (state.now)())
        .map(|added| Json(SpectateResponse { added }))
        .map_err(ApiError)
}

async fn make_move(
    State(state): State<AppState>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<MoveResponse>, ApiError> {
    respond(
        state.reconciler.handle_move(&request, (state.now)()),
        MoveResponse::rejected,
    )
}

async fn start_action(
    State(state): State<AppState>,
    Json(request): Json<StartActionRequest>,
) -> Result<Json<StartActionResponse>, ApiError> {
    respond(
        state.reconciler.start_action(&request, (state.now)()),
        StartActionResponse::rejected,
    )
}

async fn submit_action(
    State(state): State<AppState>,
    Json(request): Json<SubmitActionRequest>,
) -> Result<Json<SubmitActionResponse>, ApiError> {
    respond(
        state.reconciler.submit_action(&request, (state.now)()),
        SubmitActionResponse::rejected,
    )
}

async fn commit_action(
    State(state): State<AppState>,
    Json(request): Json<CommitRequest>,
) -> Result<Json<CommitResponse>, ApiError> {
    respond(
        state.reconciler.commit_action(&request, (state.now)()),
        CommitResponse::rejected,
    )
}

/// Runs the HTTP server with its publisher and deadline sweeper until the
/// listener fails.
#[instrument(skip(config), fields(host = %config.host(), port = config.port()))]
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let events = BroadcastSink::new(EVENT_BUFFER);
    let sinks: Vec<Arc<dyn SnapshotSink>> = vec![Arc::new(TracingSink), Arc::new(events.clone())];
    let (publisher, _publisher_task) = Publisher::spawn(sinks);
    let reconciler = Reconciler::new(SessionManager::new(), publisher, config.game().clone());
    let _sweeper = spawn_sweeper(
        reconciler.clone(),
        Duration::from_millis(*config.sweep_interval_ms()),
    );

    let app = router(AppState::new(reconciler, events));
    let listener = tokio::net::TcpListener::bind((config.host().as_str(), *config.port())).await?;
    info!("Server ready at http://{}:{}/", config.host(), config.port());
    axum::serve(listener, app).await?;
    Ok(())
}
