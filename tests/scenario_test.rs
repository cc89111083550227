//! End-to-end match scenarios driven through the session and reconciler.

use missile_go::{
    ActionKind, Animation, Cell, ClockState, CommitOutcome, CommitRequest, CommitTrigger,
    CreateSessionRequest, Direction, ErrorCode, GameSession, GameSettings, JoinRequest,
    MoveRequest, PlayerType, Point, Publisher, Reconciler, RejectReason, Reconciliation,
    SessionError, SessionManager, ShadowSession, StartActionRequest, Stone, SubmitActionRequest,
    Transition,
};

fn settings() -> GameSettings {
    GameSettings::default()
        .with_board_size(9)
        .with_time_limit_secs(600)
}

fn started(settings: GameSettings) -> GameSession {
    let mut session = GameSession::new("scenario".to_string(), settings);
    session
        .register_player("black".into(), "Black".into(), PlayerType::Human, 0)
        .unwrap();
    session
        .register_player("white".into(), "White".into(), PlayerType::Human, 0)
        .unwrap();
    session
}

/// Plays alternating moves starting with Black, one second apart.
fn play(session: &mut GameSession, moves: &[(i32, i32)], start: i64) -> i64 {
    let mut now = start;
    for (i, &(x, y)) in moves.iter().enumerate() {
        now += 1_000;
        let actor = match *session.to_move() {
            Stone::Black => "black",
            Stone::White => "white",
        };
        session
            .play_move(actor, Point::new(x, y), false, now)
            .unwrap_or_else(|e| panic!("move {i} at ({x},{y}) refused: {e}"));
    }
    now
}

#[test]
fn suicide_is_rejected_and_board_unchanged() {
    let mut session = started(settings());
    let now = play(
        &mut session,
        &[
            (0, 0),
            (4, 3),
            (8, 8),
            (3, 4),
            (0, 8),
            (5, 4),
            (8, 0),
            (4, 5),
        ],
        0,
    );

    let board = session.board().clone();
    let version = *session.version();
    let err = session
        .play_move("black", Point::new(4, 4), false, now + 1_000)
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Suicide);
    assert_eq!(*session.board(), board);
    assert_eq!(*session.version(), version);
    assert_eq!(session.move_count(), 8);
    assert_eq!(*session.to_move(), Stone::Black);
}

#[test]
fn ko_binds_only_the_next_move() {
    let mut session = started(settings());
    let now = play(
        &mut session,
        &[
            (2, 2),
            (2, 1),
            (4, 2),
            (1, 2),
            (3, 1),
            (2, 3),
            (3, 3),
            (3, 2),
        ],
        0,
    );
    assert_eq!(session.board().get(Point::new(2, 2)), Some(Cell::Empty));
    assert!(session.ko().is_some());

    let err = session
        .play_move("black", Point::new(2, 2), false, now + 1_000)
        .unwrap_err();
    match err {
        SessionError::Rejected(rejection) => assert_eq!(rejection.reason(), RejectReason::Ko),
        other => panic!("expected ko, got {other}"),
    }

    session
        .play_move("black", Point::new(8, 8), false, now + 2_000)
        .unwrap();
    session
        .play_move("white", Point::new(8, 0), false, now + 3_000)
        .unwrap();
    let outcome = session
        .play_move("black", Point::new(2, 2), false, now + 4_000)
        .unwrap();
    assert_eq!(outcome.captured, vec![Point::new(3, 2)]);
}

#[test]
fn expired_selection_forfeits_charge_and_restores_clock() {
    let mut session = started(settings().with_missile_count(1));
    session
        .play_move("black", Point::new(4, 4), false, 2_000)
        .unwrap();
    session
        .play_move("white", Point::new(0, 0), false, 5_000)
        .unwrap();

    let before = session.clock().remaining(Stone::Black, 7_000);
    let deadline = session
        .start_action("black", ActionKind::Missile, 7_000)
        .unwrap();
    assert_eq!(deadline, 37_000);
    assert!(session.clock().is_paused());
    assert!(session.advance(deadline).is_empty());

    let transitions = session.advance(deadline + 1);
    assert_eq!(
        transitions,
        vec![Transition::WindowExpired {
            actor: Stone::Black,
            window_deadline: deadline
        }]
    );
    assert!(session.special().is_idle());
    assert_eq!(*session.seat(Stone::Black).unwrap().missiles(), 0);
    assert_eq!(session.clock().remaining(Stone::Black, deadline + 1), before);
    assert_eq!(*session.to_move(), Stone::Black);

    let err = session
        .start_action("black", ActionKind::Missile, deadline + 2)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ActionResourceExhausted);
}

#[test]
fn missile_commit_is_idempotent_and_keeps_the_turn() {
    let mut session = started(settings());
    session
        .play_move("black", Point::new(0, 4), false, 1_000)
        .unwrap();
    session
        .play_move("white", Point::new(8, 8), false, 2_000)
        .unwrap();

    let before = session.clock().remaining(Stone::Black, 3_000);
    session
        .start_action("black", ActionKind::Missile, 3_000)
        .unwrap();
    let animation = session
        .submit_action("black", Point::new(0, 4), Direction::Right, 4_000)
        .unwrap();
    assert_eq!(animation.to(), Point::new(8, 4));
    assert_eq!(
        session.board().get(Point::new(0, 4)),
        Some(Cell::Occupied(Stone::Black))
    );

    let err = session
        .start_action("black", ActionKind::Missile, 4_500)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidActionState);

    let first = session.commit_action(animation.start(), 5_000).unwrap();
    assert_eq!(first, CommitOutcome::Applied);
    let board = session.board().clone();
    let version = *session.version();

    let second = session.commit_action(animation.start(), 5_100).unwrap();
    assert_eq!(second, CommitOutcome::AlreadyCommitted);
    assert_eq!(*session.board(), board);
    assert_eq!(*session.version(), version);

    assert_eq!(session.board().get(Point::new(0, 4)), Some(Cell::Empty));
    assert_eq!(session.move_count(), 2);
    assert_eq!(*session.to_move(), Stone::Black);
    assert_eq!(session.clock().remaining(Stone::Black, 5_000), before);
    assert_eq!(
        session.clock().state(),
        ClockState::Running {
            side: Stone::Black,
            deadline: Some(5_000 + before)
        }
    );
}

#[test]
fn missile_uncovers_hidden_stone_at_the_edge() {
    let mut session = started(settings().with_board_size(5));
    session
        .play_move("black", Point::new(0, 2), false, 1_000)
        .unwrap();
    session
        .play_move("white", Point::new(4, 2), true, 2_000)
        .unwrap();
    assert!(session.is_concealed(Point::new(4, 2)));
    assert_eq!(
        session.visible_board(None).get(Point::new(4, 2)),
        Some(Cell::Empty)
    );

    session
        .start_action("black", ActionKind::Missile, 3_000)
        .unwrap();
    let animation = session
        .submit_action("black", Point::new(0, 2), Direction::Right, 3_500)
        .unwrap();
    assert!(matches!(animation, Animation::HiddenMissile { .. }));
    assert_eq!(animation.to(), Point::new(3, 2));
    assert_eq!(animation.revealed(), Some(Point::new(4, 2)));
    assert!(!session.is_concealed(Point::new(4, 2)));

    let transitions = session.advance(3_500 + 2_000);
    assert!(matches!(
        transitions.as_slice(),
        [Transition::Committed {
            trigger: CommitTrigger::Elapsed,
            ..
        }]
    ));
    assert_eq!(
        session.visible_board(None).get(Point::new(4, 2)),
        Some(Cell::Occupied(Stone::White))
    );
    assert_eq!(session.board().get(Point::new(0, 2)), Some(Cell::Empty));
}

#[test]
fn blocked_missile_is_rejected_without_consuming_a_charge() {
    let mut session = started(settings().with_board_size(5));
    session
        .play_move("black", Point::new(4, 0), false, 1_000)
        .unwrap();
    session
        .play_move("white", Point::new(2, 2), false, 2_000)
        .unwrap();
    session
        .start_action("black", ActionKind::Missile, 3_000)
        .unwrap();

    let err = session
        .submit_action("black", Point::new(4, 0), Direction::Right, 3_100)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidTarget);
    assert_eq!(*session.seat(Stone::Black).unwrap().missiles(), 2);
    assert!(!session.special().is_idle());
    assert!(!session.special().is_executing());
}

#[test]
fn stale_animation_is_committed_after_restore() {
    let (publisher, _rx) = Publisher::channel();
    let reconciler = Reconciler::new(SessionManager::new(), publisher, settings());
    reconciler
        .create_session(
            CreateSessionRequest {
                session_id: Some("restart".into()),
                settings: None,
            },
            0,
        )
        .unwrap();
    for id in ["black", "white"] {
        reconciler
            .join_player(
                "restart",
                JoinRequest {
                    player_id: id.into(),
                    name: id.into(),
                    player_type: PlayerType::Human,
                },
                0,
            )
            .unwrap();
    }
    for (actor, x, y, now) in [("black", 0, 0, 1_000), ("white", 8, 8, 2_000)] {
        reconciler
            .handle_move(
                &MoveRequest {
                    session_id: "restart".into(),
                    actor_id: actor.into(),
                    position: Some(Point::new(x, y)),
                    pass: false,
                    hidden: false,
                },
                now,
            )
            .unwrap();
    }
    reconciler
        .start_action(
            &StartActionRequest {
                session_id: "restart".into(),
                actor_id: "black".into(),
                action_kind: ActionKind::Missile,
            },
            3_000,
        )
        .unwrap();
    let submitted = reconciler
        .submit_action(
            &SubmitActionRequest {
                session_id: "restart".into(),
                actor_id: "black".into(),
                origin: Point::new(0, 0),
                direction: Direction::Down,
            },
            4_000,
        )
        .unwrap();
    let start = submitted.animation.unwrap().start_time;

    let saved = serde_json::to_string(&reconciler.export_session("restart").unwrap()).unwrap();
    let restored: GameSession = serde_json::from_str(&saved).unwrap();
    assert!(restored.special().is_executing());

    let (publisher, mut rx) = Publisher::channel();
    let fresh = Reconciler::new(SessionManager::new(), publisher, settings());
    let snapshot = fresh.restore_session(restored, start + 20_000).unwrap();

    assert!(snapshot.special.is_none());
    assert_eq!(snapshot.last_committed_animation, Some(start));
    let event = rx.try_recv().unwrap();
    assert!(matches!(
        event.transitions.as_slice(),
        [Transition::Committed {
            trigger: CommitTrigger::Stale,
            ..
        }]
    ));

    let late = fresh
        .commit_action(
            &CommitRequest {
                session_id: "restart".into(),
                animation_start_time: start,
            },
            start + 21_000,
        )
        .unwrap();
    assert_eq!(late.outcome, Some(CommitOutcome::AlreadyCommitted));
}

#[test]
fn shadow_keeps_its_own_hidden_stone() {
    let (publisher, _rx) = Publisher::channel();
    let reconciler = Reconciler::new(SessionManager::new(), publisher, settings());
    reconciler
        .create_session(
            CreateSessionRequest {
                session_id: Some("shadow".into()),
                settings: None,
            },
            0,
        )
        .unwrap();
    let mut tokens = Vec::new();
    for id in ["black", "white"] {
        let (_, token) = reconciler
            .join_player(
                "shadow",
                JoinRequest {
                    player_id: id.into(),
                    name: id.into(),
                    player_type: PlayerType::Human,
                },
                0,
            )
            .unwrap();
        tokens.push(token.unwrap());
    }

    let snapshot = reconciler
        .snapshot("shadow", true, Some("black"), Some(&tokens[0]), 500)
        .unwrap();
    let options = reconciler
        .export_session("shadow")
        .unwrap()
        .settings()
        .evaluation_options();
    let mut shadow = ShadowSession::from_snapshot(&snapshot, Stone::Black, options).unwrap();

    let target = Point::new(3, 3);
    shadow.predict_move(target).unwrap();
    let response = reconciler
        .handle_move(
            &MoveRequest {
                session_id: "shadow".into(),
                actor_id: "black".into(),
                position: Some(target),
                pass: false,
                hidden: true,
            },
            1_000,
        )
        .unwrap();

    assert_eq!(
        shadow.reconcile_move(&response).unwrap(),
        Reconciliation::Confirmed
    );
    assert_eq!(
        shadow.confirmed().get(target),
        Some(Cell::Occupied(Stone::Black))
    );
    let err = shadow.predict_move(target).unwrap_err();
    assert_eq!(err.reason(), RejectReason::Occupied);
}
