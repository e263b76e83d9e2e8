//! End-to-end pipeline scenarios: raw hardware events in, refined events
//! out, through the same task-and-channel plumbing the app runs.

use std::time::Duration;

use tabula::geometry::Point;
use tabula::input::events::{
    AnnotatedKeyEvent, KeyEvent, TapEvent, TapPhase, TouchEvent, TouchReport,
};
use tabula::input::gestures::Tapstream;
use tabula::input::keycode::KeyCode;
use tabula::input::keystream::Keystream;
use tabula::settings::Settings;

fn run_local<F: std::future::Future>(fut: F) -> F::Output {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    tokio::task::LocalSet::new().block_on(&rt, fut)
}

fn press_release(key: KeyCode) -> Vec<KeyEvent> {
    vec![KeyEvent::pressed(key), KeyEvent::released(key)]
}

async fn run_keystream(composes: bool, events: Vec<KeyEvent>) -> Vec<AnnotatedKeyEvent> {
    let settings = Settings::for_test();
    let mut stream = Keystream::build(&settings, composes);
    let tx = stream.sender().unwrap();
    for event in events {
        tx.send(event).await.unwrap();
    }
    drop(tx);
    stream.close_input();
    let mut out = Vec::new();
    while let Some(event) = stream.events.recv().await {
        out.push(event);
    }
    out
}

async fn run_tapstream(reports: Vec<TouchReport>) -> Vec<TapEvent> {
    let mut stream = Tapstream::build();
    let tx = stream.sender().unwrap();
    for report in reports {
        tx.send(report).await.unwrap();
    }
    drop(tx);
    stream.close_input();
    let mut out = Vec::new();
    while let Some(event) = stream.events.recv().await {
        out.push(event);
    }
    out
}

fn touch_frame(x: i32, y: i32, pressure: i32, millis: u64) -> TouchReport {
    TouchReport {
        touches: vec![TouchEvent {
            x,
            y,
            pressure,
            slot: 0,
        }],
        timestamp: Duration::from_millis(millis),
    }
}

fn empty_frame(millis: u64) -> TouchReport {
    TouchReport {
        touches: vec![],
        timestamp: Duration::from_millis(millis),
    }
}

#[test]
fn simple_typing_produces_shifted_then_plain_characters() {
    let events = run_local(async {
        let mut input = vec![KeyEvent::pressed(KeyCode::KEY_LEFTSHIFT)];
        input.extend(press_release(KeyCode::KEY_T));
        input.push(KeyEvent::released(KeyCode::KEY_LEFTSHIFT));
        input.extend(press_release(KeyCode::KEY_A));
        input.extend(press_release(KeyCode::KEY_B));
        run_keystream(false, input).await
    });
    let typed: String = events.iter().filter_map(|e| e.character).collect();
    assert_eq!(typed, "Tab");
}

#[test]
fn capslock_shifts_letters_but_not_digits_or_punctuation() {
    let events = run_local(async {
        let mut input = press_release(KeyCode::KEY_CAPSLOCK);
        input.extend(press_release(KeyCode::KEY_A));
        input.extend(press_release(KeyCode::KEY_1));
        input.extend(press_release(KeyCode::KEY_EQUAL));
        run_keystream(false, input).await
    });
    let typed: String = events.iter().filter_map(|e| e.character).collect();
    assert_eq!(typed, "A1=");
}

#[test]
fn compose_guillemet_round_trip() {
    let settings = Settings::for_test();
    let events = run_local(async {
        let mut input = press_release(settings.compose_key);
        for _ in 0..2 {
            input.push(KeyEvent::pressed(KeyCode::KEY_LEFTSHIFT));
            input.extend(press_release(KeyCode::KEY_COMMA));
            input.push(KeyEvent::released(KeyCode::KEY_LEFTSHIFT));
        }
        run_keystream(true, input).await
    });

    // first visible event is the compose sentinel, for the LED
    assert_eq!(events[0].key, KeyCode::KEY_COMPOSE);
    assert!(events[0].annotation.compose);
    assert!(events[0].is_led_able);

    // exactly one character-bearing event escapes, carrying the guillemet;
    // the devoured '<' keys never surface
    let characters: Vec<&AnnotatedKeyEvent> =
        events.iter().filter(|e| e.character.is_some()).collect();
    assert_eq!(characters.len(), 1);
    assert_eq!(characters[0].character, Some('«'));
    assert_eq!(characters[0].key, KeyCode::KEY_COMPOSE);
}

#[test]
fn compose_failure_replays_devoured_events_in_order() {
    let settings = Settings::for_test();
    let events = run_local(async {
        let mut input = press_release(settings.compose_key);
        input.extend(press_release(KeyCode::KEY_MINUS)); // '-' starts sequences
        input.extend(press_release(KeyCode::KEY_Q)); // "- q" is a dead end
        run_keystream(true, input).await
    });
    assert_eq!(events.len(), 4);
    assert!(events[0].annotation.compose);
    // the terminating marker drops the compose annotation
    assert_eq!(events[1].key, KeyCode::KEY_COMPOSE);
    assert!(!events[1].annotation.compose);
    // devoured events replayed with their original annotations
    assert_eq!(events[2].character, Some('-'));
    assert_eq!(events[3].character, Some('q'));
}

#[test]
fn compose_doubletap_synthesizes_the_sprint_key() {
    let settings = Settings::for_test();
    let events = run_local(async {
        let mut input = press_release(settings.compose_key);
        input.extend(press_release(settings.compose_key));
        run_keystream(true, input).await
    });
    let compose_marked = events
        .iter()
        .filter(|e| e.key == KeyCode::KEY_COMPOSE && e.annotation.compose)
        .count();
    assert!(compose_marked >= 2, "expected two compose-marked events");
    assert_eq!(
        events.last().map(|e| e.key),
        Some(KeyCode::SYNTHETIC_COMPOSE_DOUBLETAP)
    );
}

#[test]
fn simple_tap_is_recognized() {
    let taps = run_local(async {
        let mut reports: Vec<TouchReport> =
            (0..8).map(|i| touch_frame(601, 618, 38, i * 20)).collect();
        reports.push(empty_frame(170));
        run_tapstream(reports).await
    });
    assert_eq!(
        taps,
        vec![
            TapEvent {
                location: Point::new(601, 618),
                phase: TapPhase::Initiated
            },
            TapEvent {
                location: Point::new(601, 618),
                phase: TapPhase::Completed
            },
        ]
    );
}

#[test]
fn swipe_initiates_once_then_cancels() {
    let taps = run_local(async {
        let mut reports: Vec<TouchReport> = (0..16)
            .map(|i| touch_frame(600 + i * 12, 618, 38, (i as u64) * 16))
            .collect();
        reports.push(empty_frame(260));
        run_tapstream(reports).await
    });
    assert_eq!(taps.len(), 2);
    assert_eq!(taps[0].phase, TapPhase::Initiated);
    assert_eq!(taps[1].phase, TapPhase::Canceled);
}

#[test]
fn light_touch_never_reports() {
    let taps = run_local(async {
        let mut reports: Vec<TouchReport> = (0..11u64)
            .map(|i| touch_frame(771, 944, 21 + (i % 3) as i32, i * 16))
            .collect();
        reports.push(empty_frame(180));
        run_tapstream(reports).await
    });
    assert!(taps.is_empty());
}

#[test]
fn two_finger_touch_never_completes() {
    let taps = run_local(async {
        let reports = vec![
            touch_frame(200, 300, 40, 0),
            TouchReport {
                touches: vec![
                    TouchEvent {
                        x: 200,
                        y: 300,
                        pressure: 40,
                        slot: 0,
                    },
                    TouchEvent {
                        x: 600,
                        y: 700,
                        pressure: 40,
                        slot: 1,
                    },
                ],
                timestamp: Duration::from_millis(30),
            },
            empty_frame(60),
        ];
        run_tapstream(reports).await
    });
    assert!(taps.iter().any(|t| t.phase == TapPhase::Canceled));
    assert!(!taps.iter().any(|t| t.phase == TapPhase::Completed));
}

#[test]
fn every_initiation_gets_exactly_one_terminator() {
    // a run of distinct tap cycles through one pipeline instance
    let taps = run_local(async {
        let mut reports = Vec::new();
        for round in 0u64..4 {
            let base = round * 1000;
            reports.push(touch_frame(300, 400, 38, base));
            reports.push(touch_frame(300, 400, 38, base + 30));
            reports.push(empty_frame(base + 60));
        }
        run_tapstream(reports).await
    });
    let initiated = taps.iter().filter(|t| t.phase == TapPhase::Initiated).count();
    let terminated = taps
        .iter()
        .filter(|t| matches!(t.phase, TapPhase::Completed | TapPhase::Canceled))
        .count();
    assert_eq!(initiated, 4);
    assert_eq!(terminated, 4);
}
