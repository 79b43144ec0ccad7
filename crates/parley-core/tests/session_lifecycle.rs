mod common;

use std::sync::Arc;
use std::thread;

use common::{count, tags, FakeCapture, Harness, RecordingView};
use parley_core::{
    ManualExecutor, ParleyError, ParleyEvent, ParticipantSnapshot, Publication, SessionEvent,
    SessionState, TrackHandle, TrackKind, ViewId,
};

#[test]
fn connect_then_connected_emits_room_connected() {
    let h = Harness::new();
    let mut stream = h.session.subscribe();
    h.join(vec![]);

    assert_eq!(h.session.state(), SessionState::Connected);
    assert_eq!(
        stream.drain(),
        vec![ParleyEvent::RoomConnected {
            room: "standup".into()
        }]
    );
    assert_eq!(h.engine.calls()[..2], ["speaker:true", "connect:standup"]);
}

#[test]
fn connect_rejects_empty_token_without_state_change() {
    let h = Harness::new();
    let err = h.session.connect("", "standup").unwrap_err();
    assert!(matches!(err, ParleyError::ArgumentInvalid(_)));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(h.engine.calls().is_empty());
    assert!(h.capture.calls().is_empty());
}

#[test]
fn connect_while_active_is_rejected() {
    let h = Harness::new();
    h.join(vec![]);
    assert!(matches!(
        h.session.connect("token", "other"),
        Err(ParleyError::AlreadyConnected)
    ));
    assert_eq!(h.session.room_name().as_deref(), Some("standup"));
    let connects = h.engine.calls().iter().filter(|c| c.starts_with("connect")).count();
    assert_eq!(connects, 1);
}

#[test]
fn participant_replay_emits_snapshot_in_engine_order() {
    let h = Harness::new();
    let mut stream = h.session.subscribe();
    h.session.connect("token", "standup").unwrap();
    h.engine.send(SessionEvent::Connected {
        room: "standup".into(),
        local_identity: "me".into(),
        participants: vec![ParticipantSnapshot::new("bob"), ParticipantSnapshot::new("alice")],
    });

    let events = stream.drain();
    assert_eq!(
        events,
        vec![
            ParleyEvent::RoomConnected {
                room: "standup".into()
            },
            ParleyEvent::ParticipantConnected {
                identity: "bob".into()
            },
            ParleyEvent::ParticipantConnected {
                identity: "alice".into()
            },
        ]
    );

    // A late duplicate join for a replayed participant is not reported again.
    h.engine
        .send(SessionEvent::ParticipantConnected(ParticipantSnapshot::new("bob")));
    assert!(stream.drain().is_empty());
    assert_eq!(h.session.participants(), vec!["alice", "bob"]);
}

#[test]
fn replayed_participant_with_subscribed_video_is_bound() {
    let h = Harness::new();
    let track = TrackHandle::remote("TC", TrackKind::Video);
    let mut publication = Publication::new("PC", TrackKind::Video, true);
    publication.track = Some(track.clone());
    h.join(vec![ParticipantSnapshot {
        identity: "carol".into(),
        publications: vec![publication],
    }]);

    let view = Arc::new(RecordingView::default());
    h.session.register_view(ViewId::remote("carol"), view.clone());
    assert_eq!(view.calls(), vec!["attach:TC"]);
}

#[test]
fn connect_failure_returns_to_idle() {
    let h = Harness::new();
    let mut stream = h.session.subscribe();
    h.session.connect("token", "standup").unwrap();
    h.engine.send(SessionEvent::ConnectFailed {
        error: "signal timeout".into(),
    });

    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(h.session.local_audio_track().is_none());
    assert!(h.session.local_video_track().is_none());
    assert_eq!(
        stream.drain(),
        vec![ParleyEvent::ConnectionFailed {
            error: "signal timeout".into()
        }]
    );

    // Recoverable by connecting again.
    h.session.connect("token", "standup").unwrap();
    assert_eq!(h.session.state(), SessionState::Connecting);
}

#[test]
fn events_from_an_abandoned_attempt_are_ignored() {
    let h = Harness::new();
    h.session.connect("token", "first").unwrap();
    let stale = h.engine.events();
    h.session.disconnect().unwrap();

    h.session.connect("token", "second").unwrap();
    let mut stream = h.session.subscribe();
    stale.send(SessionEvent::Connected {
        room: "first".into(),
        local_identity: "me".into(),
        participants: vec![ParticipantSnapshot::new("ghost")],
    });

    assert_eq!(h.session.state(), SessionState::Connecting);
    assert!(h.session.participants().is_empty());
    assert!(stream.drain().is_empty());
    assert!(h.engine.events().generation() > stale.generation());
}

#[test]
fn disconnect_mid_connecting_tears_down() {
    let h = Harness::new();
    let mut stream = h.session.subscribe();
    h.session.connect("token", "standup").unwrap();
    let late = h.engine.events();
    h.session.disconnect().unwrap();

    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(h.engine.calls().contains(&"disconnect".to_string()));
    assert_eq!(h.capture.released().len(), 2);

    late.send(SessionEvent::Connected {
        room: "standup".into(),
        local_identity: "me".into(),
        participants: vec![],
    });
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(tags(&stream.drain()), vec!["room_disconnected"]);
}

#[test]
fn disconnect_while_idle_is_a_noop() {
    let h = Harness::new();
    let mut stream = h.session.subscribe();
    h.session.disconnect().unwrap();
    assert!(stream.drain().is_empty());
    assert!(h.engine.calls().is_empty());
}

#[test]
fn teardown_completeness() {
    let h = Harness::new();
    let view_a = Arc::new(RecordingView::default());
    h.session.register_view(ViewId::remote("A"), view_a.clone());

    h.join(vec![ParticipantSnapshot::new("A"), ParticipantSnapshot::new("B")]);
    h.subscribe_video("A", "PA", "TA");
    h.subscribe_video("B", "PB", "TB");
    let views = h.session.views();
    assert_eq!(views.inspect(|r| r.binding_count()), 1);
    // B has no view yet; neither has the local preview.
    assert_eq!(views.inspect(|r| r.pending_count()), 2);

    let mut stream = h.session.subscribe();
    let local = [
        h.session.local_audio_track().unwrap(),
        h.session.local_video_track().unwrap(),
    ];
    h.session.disconnect().unwrap();

    assert!(views.inspect(|r| r.is_empty()));
    assert_eq!(view_a.calls(), vec!["attach:TA", "detach:TA"]);
    assert!(h.session.local_audio_track().is_none());
    assert!(h.session.local_video_track().is_none());
    assert!(h.session.room_name().is_none());
    assert!(h.session.participants().is_empty());
    assert!(h.session.active_camera().is_none());

    let mut released = h.capture.released();
    released.sort();
    let mut expected: Vec<String> = local.iter().map(|t| t.sid().to_string()).collect();
    expected.sort();
    assert_eq!(released, expected);
    assert_eq!(h.capture.calls().last().map(String::as_str), Some("stop_capture"));

    let view_b = Arc::new(RecordingView::default());
    h.session.register_view(ViewId::remote("A"), view_b.clone());
    h.session.register_view(ViewId::remote("B"), view_b.clone());
    assert!(view_b.calls().is_empty());

    assert_eq!(
        stream.drain(),
        vec![ParleyEvent::RoomDisconnected {
            room: "standup".into()
        }]
    );
}

#[test]
fn local_tracks_are_unpublished_before_release() {
    let h = Harness::new();
    h.join(vec![]);
    let video = h.session.local_video_track().unwrap();
    h.engine.send(SessionEvent::LocalTrackPublished { track: video.clone() });
    h.session.disconnect().unwrap();

    let calls = h.engine.calls();
    assert!(calls.contains(&format!("unpublish:{}", video.sid())));
    assert!(h.capture.released().contains(&video.sid().to_string()));
}

#[test]
fn engine_disconnect_tears_down_and_reports() {
    let h = Harness::new();
    h.join(vec![ParticipantSnapshot::new("A")]);
    let mut stream = h.session.subscribe();
    h.engine.send(SessionEvent::Disconnected {
        error: Some("server shutdown".into()),
    });

    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(h.session.participants().is_empty());
    assert_eq!(
        stream.drain(),
        vec![ParleyEvent::RoomDisconnected {
            room: "standup".into()
        }]
    );
}

#[test]
fn reconnecting_keeps_bindings_and_participants() {
    let h = Harness::new();
    let view = Arc::new(RecordingView::default());
    h.session.register_view(ViewId::remote("A"), view.clone());
    h.join(vec![ParticipantSnapshot::new("A")]);
    h.subscribe_video("A", "PA", "TA");

    let mut stream = h.session.subscribe();
    h.engine.send(SessionEvent::Reconnecting {
        error: "network lost".into(),
    });
    assert_eq!(h.session.state(), SessionState::Reconnecting);
    assert!(h.session.local_video_track().is_some());
    assert_eq!(h.session.participants(), vec!["A"]);

    h.engine.send(SessionEvent::Reconnected);
    assert_eq!(h.session.state(), SessionState::Connected);
    assert_eq!(view.calls(), vec!["attach:TA"]);
    assert_eq!(
        stream.drain(),
        vec![
            ParleyEvent::Reconnecting {
                error: "network lost".into()
            },
            ParleyEvent::Reconnected {
                room: "standup".into()
            },
        ]
    );
}

#[test]
fn stale_commands_after_disconnect_are_silent() {
    let h = Harness::new();
    h.join(vec![]);
    h.session.disconnect().unwrap();
    let mut stream = h.session.subscribe();
    let capture_calls = h.capture.calls();
    let engine_calls = h.engine.calls();

    h.session.mute_audio().unwrap();
    h.session.unmute_audio().unwrap();
    h.session.enable_video().unwrap();
    h.session.disable_video().unwrap();
    h.session.switch_camera().unwrap();
    h.session.reattach_local_video_track().unwrap();
    h.session.pause_local_video_track().unwrap();

    assert!(stream.drain().is_empty());
    assert_eq!(h.capture.calls(), capture_calls);
    assert_eq!(h.engine.calls(), engine_calls);
}

#[test]
fn synchronous_engine_callbacks_do_not_deadlock() {
    let h = Harness::new();
    *h.engine.connect_reply.lock().unwrap() = Some(SessionEvent::Connected {
        room: "standup".into(),
        local_identity: "me".into(),
        participants: vec![ParticipantSnapshot::new("A")],
    });
    let mut stream = h.session.subscribe();

    h.session.connect("token", "standup").unwrap();

    assert_eq!(h.session.state(), SessionState::Connected);
    assert_eq!(
        tags(&stream.drain()),
        vec!["room_connected", "participant_connected"]
    );
}

#[test]
fn events_from_many_threads_are_all_applied() {
    let h = Harness::new();
    h.join(vec![]);
    let events = h.engine.events();

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let events = events.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    events.send(SessionEvent::ParticipantConnected(ParticipantSnapshot::new(
                        format!("p{worker}-{i}"),
                    )));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(h.session.participants().len(), 100);
}

#[test]
fn events_are_dropped_after_the_session_is_gone() {
    let h = Harness::new();
    h.session.connect("token", "standup").unwrap();
    let events = h.engine.events();
    drop(h);
    events.send(SessionEvent::Reconnected);
}

#[test]
fn recording_status_is_reported_with_room() {
    let h = Harness::new();
    h.join(vec![]);
    let mut stream = h.session.subscribe();
    h.engine.send(SessionEvent::RecordingStarted);
    h.engine.send(SessionEvent::RecordingStopped);
    assert_eq!(
        stream.drain(),
        vec![
            ParleyEvent::RecordingStarted {
                room: "standup".into()
            },
            ParleyEvent::RecordingStopped {
                room: "standup".into()
            },
        ]
    );
}

#[test]
fn view_work_completes_when_the_host_drains_it() {
    let executor = Arc::new(ManualExecutor::new());
    let h = Harness::with(FakeCapture::with_two_cameras(), executor.clone());
    let view = Arc::new(RecordingView::default());
    h.session.register_view(ViewId::remote("A"), view.clone());
    h.join(vec![ParticipantSnapshot::new("A")]);
    h.subscribe_video("A", "PA", "TA");

    assert!(view.calls().is_empty());
    executor.run_pending();
    assert_eq!(view.calls(), vec!["attach:TA"]);

    let video = h.session.local_video_track().unwrap();
    h.session.disconnect().unwrap();
    // Video release waits behind the local detach on the UI context.
    assert!(!h.capture.released().contains(&video.sid().to_string()));

    executor.run_pending();
    assert!(h.capture.released().contains(&video.sid().to_string()));
    assert_eq!(view.calls(), vec!["attach:TA", "detach:TA"]);
    assert!(h.session.views().inspect(|r| r.is_empty()));
}

#[test]
fn quick_reconnect_keeps_the_new_capture_running() {
    let executor = Arc::new(ManualExecutor::new());
    let h = Harness::with(FakeCapture::with_two_cameras(), executor.clone());
    h.session.connect("token", "one").unwrap();
    let first_audio = h.session.local_audio_track().unwrap();
    let first_video = h.session.local_video_track().unwrap();
    h.session.disconnect().unwrap();
    h.session.connect("token", "two").unwrap();
    let audio = h.session.local_audio_track().unwrap();
    let video = h.session.local_video_track().unwrap();

    executor.run_pending();

    let calls = h.capture.calls();
    let last_start = calls.iter().rposition(|c| c.starts_with("start_")).unwrap();
    assert!(!calls[last_start..].contains(&"stop_capture".to_string()));
    assert_eq!(
        h.capture.released(),
        vec![first_audio.sid().to_string(), first_video.sid().to_string()]
    );
    assert!(!h.capture.released().contains(&audio.sid().to_string()));
    assert!(!h.capture.released().contains(&video.sid().to_string()));

    h.session.disconnect().unwrap();
    executor.run_pending();
    assert_eq!(h.capture.calls().last().map(String::as_str), Some("stop_capture"));
}

#[test]
fn view_registered_between_sessions_survives_queued_teardown() {
    let executor = Arc::new(ManualExecutor::new());
    let h = Harness::with(FakeCapture::with_two_cameras(), executor.clone());
    h.session.connect("token", "one").unwrap();
    h.session.disconnect().unwrap();

    let view = Arc::new(RecordingView::default());
    h.session.register_view(ViewId::Local, view.clone());
    h.session.connect("token", "two").unwrap();
    let video = h.session.local_video_track().unwrap();

    executor.run_pending();

    let views = h.session.views();
    assert!(views.inspect(|r| r.is_registered(&ViewId::Local)));
    assert_eq!(views.inspect(|r| r.bound_track(&ViewId::Local).cloned()), Some(video.clone()));
    assert_eq!(view.calls(), vec![format!("attach:{}", video.sid())]);
}

#[test]
fn event_records_match_wire_shape() {
    let h = Harness::new();
    let mut stream = h.session.subscribe();
    h.join(vec![ParticipantSnapshot::new("alice")]);
    let events = stream.drain();
    assert_eq!(count(&events, "participant_connected"), 1);
    assert_eq!(
        events[1].to_record().unwrap(),
        serde_json::json!({ "event": "participant_connected", "identity": "alice" })
    );
}
