//! HTTP adapter tests through `tower::ServiceExt::oneshot`.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use missile_go::{
    AppState, BroadcastSink, GameSettings, Millis, Publisher, Reconciler, SessionManager,
    SnapshotSink, router,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn fixed_now() -> Millis {
    1_000
}

fn app() -> Router {
    let events = BroadcastSink::new(16);
    let sinks: Vec<Arc<dyn SnapshotSink>> = vec![Arc::new(events.clone())];
    let (publisher, _handle) = Publisher::spawn(sinks);
    let settings = GameSettings::default().with_board_size(5);
    let reconciler = Reconciler::new(SessionManager::new(), publisher, settings);
    router(AppState::with_time_source(reconciler, events, fixed_now))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Seats alice and bob in `g1`; returns their seat tokens.
async fn seated_game(app: &Router) -> HashMap<&'static str, String> {
    let (status, _) = call(app, "POST", "/sessions", Some(json!({ "session_id": "g1" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let mut tokens = HashMap::new();
    for id in ["alice", "bob"] {
        let (status, body) = call(
            app,
            "POST",
            "/sessions/g1/players",
            Some(json!({ "player_id": id, "name": id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepted"], true);
        let token = body["seat_token"].as_str().unwrap().to_string();
        tokens.insert(id, token);
    }
    tokens
}

#[tokio::test]
async fn move_flow_over_http() {
    let app = app();
    seated_game(&app).await;

    let (status, body) = call(
        &app,
        "POST",
        "/move",
        Some(json!({ "session_id": "g1", "actor_id": "bob", "position": { "x": 0, "y": 0 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], false);
    assert_eq!(body["reject_reason"]["code"], "not-your-turn");

    let (status, body) = call(
        &app,
        "POST",
        "/move",
        Some(json!({ "session_id": "g1", "actor_id": "alice", "position": { "x": 2, "y": 2 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], true);
    assert_eq!(body["next_turn"], "white");
    assert_eq!(body["board_delta"].as_array().unwrap().len(), 1);

    let (status, body) = call(&app, "GET", "/sessions/g1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["move_count"], 1);
    assert!(body["board"].is_null());

    let (status, body) = call(&app, "GET", "/sessions/g1?board=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["board"]["rows"][2], "..B..");
}

#[tokio::test]
async fn hidden_stone_only_visible_to_owner() {
    let app = app();
    let tokens = seated_game(&app).await;

    let (_, body) = call(
        &app,
        "POST",
        "/move",
        Some(json!({
            "session_id": "g1",
            "actor_id": "alice",
            "position": { "x": 1, "y": 1 },
            "hidden": true
        })),
    )
    .await;
    assert_eq!(body["accepted"], true);
    assert_eq!(
        body["board_delta"],
        json!([{ "point": { "x": 1, "y": 1 }, "cell": { "occupied": "black" } }])
    );

    let (_, public) = call(&app, "GET", "/sessions/g1/board", None).await;
    assert_eq!(public["rows"][1], ".....");

    let mine_uri = format!("/sessions/g1/board?viewer=alice&token={}", tokens["alice"]);
    let theirs_uri = format!("/sessions/g1/board?viewer=bob&token={}", tokens["bob"]);
    let (_, mine) = call(&app, "GET", &mine_uri, None).await;
    let (_, theirs) = call(&app, "GET", &theirs_uri, None).await;
    assert_eq!(mine["rows"][1], ".B...");
    assert_eq!(theirs["rows"][1], ".....");

    let (status, body) = call(&app, "GET", "/sessions/g1/board?viewer=alice", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "invalid-seat-token");

    let stolen = format!("/sessions/g1?board=true&viewer=alice&token={}", tokens["bob"]);
    let (status, _) = call(&app, "GET", &stolen, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        "POST",
        "/sessions/g1/players",
        Some(json!({ "player_id": "alice", "name": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stone"], "black");
    assert!(body.get("seat_token").is_none());
}

#[tokio::test]
async fn session_events_stream_over_sse() {
    let app = app();
    seated_game(&app).await;

    let request = Request::builder()
        .uri("/sessions/g1/events")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    let mut body = response.into_body();

    call(
        &app,
        "POST",
        "/move",
        Some(json!({ "session_id": "g1", "actor_id": "alice", "position": { "x": 2, "y": 2 } })),
    )
    .await;

    // Seat events queued before the subscription may arrive first.
    let event = loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
        assert!(text.starts_with("event: session\n"), "{text}");
        let data = text
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap();
        let event: Value = serde_json::from_str(data).unwrap();
        if event["snapshot"]["move_count"] == 1 {
            break event;
        }
    };
    assert_eq!(event["session_id"], "g1");
    assert_eq!(event["delta"].as_array().unwrap().len(), 1);

    let (status, _) = call(&app, "GET", "/sessions/missing/events", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missile_round_trip_over_http() {
    let app = app();
    seated_game(&app).await;
    for (actor, x, y) in [("alice", 0, 0), ("bob", 4, 4)] {
        call(
            &app,
            "POST",
            "/move",
            Some(json!({ "session_id": "g1", "actor_id": actor, "position": { "x": x, "y": y } })),
        )
        .await;
    }

    let (_, body) = call(
        &app,
        "POST",
        "/actions/start",
        Some(json!({ "session_id": "g1", "actor_id": "alice", "action_kind": "missile" })),
    )
    .await;
    assert_eq!(body["accepted"], true);
    assert_eq!(body["window_deadline"], 31_000);

    let (_, body) = call(
        &app,
        "POST",
        "/actions/submit",
        Some(json!({
            "session_id": "g1",
            "actor_id": "alice",
            "origin": { "x": 0, "y": 0 },
            "direction": "down"
        })),
    )
    .await;
    assert_eq!(body["accepted"], true);
    assert_eq!(body["animation"]["to"], json!({ "x": 0, "y": 4 }));
    let start = body["animation"]["start_time"].clone();

    for expected in ["applied", "already_committed"] {
        let (status, body) = call(
            &app,
            "POST",
            "/actions/commit",
            Some(json!({ "session_id": "g1", "animation_start_time": start })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["committed"], true);
        assert_eq!(body["outcome"], expected);
    }
}

#[tokio::test]
async fn session_errors_map_to_statuses() {
    let app = app();
    seated_game(&app).await;

    let (status, body) = call(&app, "GET", "/sessions/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "session-not-found");

    let (status, _) = call(&app, "POST", "/sessions", Some(json!({ "session_id": "g1" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(
        &app,
        "POST",
        "/move",
        Some(json!({ "session_id": "g1", "actor_id": "mallory", "pass": true })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "unknown-player");

    let (status, body) = call(
        &app,
        "POST",
        "/sessions/g1/players",
        Some(json!({ "player_id": "carol", "name": "Carol" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], false);
    assert_eq!(body["reject_reason"]["code"], "session-full");

    let (status, body) = call(
        &app,
        "POST",
        "/sessions/g1/spectators",
        Some(json!({ "spectator_id": "carol" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], true);

    let (_, body) = call(&app, "GET", "/sessions", None).await;
    assert_eq!(body, json!(["g1"]));
}
