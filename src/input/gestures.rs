//! The gesture pipeline: raw touch reports in, tap events out.
//!
//! Two stages: `MakePersistent` gives contacts a stable identity across
//! frames, and `TapRecognizer` turns short, firm, stationary contacts into
//! tap events. Timing uses the timestamps carried in the reports, so no
//! timers are involved.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::input::events::{
    PersistentTouch, PersistentTouchReport, TapEvent, TapPhase, TouchPhase, TouchReport,
};

const STAGE_CHANNEL_CAPACITY: usize = 4;

/// Movement below this many pixels keeps a touch STATIONARY.
const MOVE_THRESHOLD: f64 = 10.0;

/// Stage 1: fold per-frame touch snapshots into persistent touches.
pub struct MakePersistent {
    id_counter: u64,
    slots: [Option<PersistentTouch>; 2],
}

impl Default for MakePersistent {
    fn default() -> Self {
        Self::new()
    }
}

impl MakePersistent {
    pub fn new() -> Self {
        Self {
            id_counter: 0,
            slots: [None, None],
        }
    }

    /// Digests one raw report; returns a persistent report when anything
    /// began, moved, or ended.
    pub fn digest(&mut self, report: &TouchReport) -> Option<PersistentTouchReport> {
        let mut by_slot: [Option<&crate::input::events::TouchEvent>; 2] = [None, None];
        for touch in &report.touches {
            if touch.slot < 2 {
                by_slot[touch.slot] = Some(touch);
            }
        }

        let mut out = PersistentTouchReport {
            began: Vec::new(),
            moved: Vec::new(),
            ended: Vec::new(),
            timestamp: report.timestamp,
        };

        for slot in 0..2 {
            match (self.slots[slot], by_slot[slot]) {
                (None, None) => {}
                (None, Some(touch)) => {
                    self.id_counter += 1;
                    let pt = PersistentTouch {
                        touch_id: self.id_counter,
                        location: touch.point(),
                        max_pressure: touch.pressure,
                        phase: TouchPhase::Began,
                    };
                    out.began.push(pt);
                    self.slots[slot] = Some(pt);
                }
                (Some(mut pt), None) => {
                    pt.phase = TouchPhase::Ended;
                    out.ended.push(pt);
                    self.slots[slot] = None;
                }
                (Some(mut pt), Some(touch)) => {
                    pt.phase = TouchPhase::Stationary;
                    pt.max_pressure = pt.max_pressure.max(touch.pressure);
                    let new_location = touch.point();
                    if new_location.distance(pt.location) > MOVE_THRESHOLD {
                        pt.phase = TouchPhase::Moved;
                    }
                    pt.location = new_location;
                    if pt.phase == TouchPhase::Moved {
                        out.moved.push(pt);
                    }
                    self.slots[slot] = Some(pt);
                }
            }
        }

        (!out.is_empty()).then_some(out)
    }

    pub async fn pump(
        mut self,
        mut rx: mpsc::Receiver<TouchReport>,
        tx: mpsc::Sender<PersistentTouchReport>,
    ) {
        while let Some(report) = rx.recv().await {
            if let Some(out) = self.digest(&report) {
                if tx.send(out).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecognitionState {
    Possible,
    Failed,
    Initiated,
    Recognized,
}

/// Stage 2: recognize single-touch taps with bounded pressure, movement, and
/// duration.
pub struct TapRecognizer {
    touch: Option<PersistentTouch>,
    current_touch_ids: HashSet<u64>,
    start_timestamp: Duration,
    state: RecognitionState,
}

impl Default for TapRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TapRecognizer {
    /// Longest contact that still counts as a tap.
    pub const MAX_DURATION: Duration = Duration::from_millis(300);
    /// Peak pressure a contact must reach.
    pub const REQUIRED_PRESSURE: i32 = 26;

    pub fn new() -> Self {
        Self {
            touch: None,
            current_touch_ids: HashSet::new(),
            start_timestamp: Duration::ZERO,
            state: RecognitionState::Possible,
        }
    }

    fn reset(&mut self) {
        self.touch = None;
        self.current_touch_ids.clear();
        self.start_timestamp = Duration::ZERO;
        self.state = RecognitionState::Possible;
    }

    /// Digests one persistent report; returns the tap events to emit. Resets
    /// for a fresh recognition cycle once all touches have lifted.
    pub fn digest(&mut self, report: &PersistentTouchReport) -> Vec<TapEvent> {
        let mut out = Vec::new();
        self.handle_report(report, &mut out);
        if self.current_touch_ids.is_empty() {
            self.reset();
        }
        out
    }

    fn handle_report(&mut self, report: &PersistentTouchReport, out: &mut Vec<TapEvent>) {
        for touch in &report.ended {
            self.current_touch_ids.remove(&touch.touch_id);
        }
        for touch in &report.began {
            self.current_touch_ids.insert(touch.touch_id);
        }

        for touch in &report.began {
            if let Some(tracked) = self.touch {
                // a second contact arrived; this is no tap
                if self.state == RecognitionState::Initiated {
                    out.push(TapEvent {
                        location: tracked.location,
                        phase: TapPhase::Canceled,
                    });
                }
                self.state = RecognitionState::Failed;
                return;
            }
            self.touch = Some(*touch);
            self.start_timestamp = report.timestamp;
            self.state = RecognitionState::Possible;
            if touch.max_pressure >= Self::REQUIRED_PRESSURE {
                self.state = RecognitionState::Initiated;
                out.push(TapEvent {
                    location: touch.location,
                    phase: TapPhase::Initiated,
                });
            }
        }

        for touch in &report.moved {
            if self.tracks(touch) {
                // a moved persistent touch has already exceeded the move
                // threshold, so it can no longer be a tap
                if self.state == RecognitionState::Initiated {
                    out.push(TapEvent {
                        location: touch.location,
                        phase: TapPhase::Canceled,
                    });
                }
                self.state = RecognitionState::Failed;
                return;
            }
        }

        for touch in &report.ended {
            if self.tracks(touch) {
                if touch.max_pressure < Self::REQUIRED_PRESSURE {
                    self.state = RecognitionState::Failed;
                    return;
                }
                let duration = report.timestamp.saturating_sub(self.start_timestamp);
                if duration > Self::MAX_DURATION {
                    let was_initiated = self.state == RecognitionState::Initiated;
                    self.state = RecognitionState::Failed;
                    if was_initiated {
                        out.push(TapEvent {
                            location: touch.location,
                            phase: TapPhase::Canceled,
                        });
                    }
                    return;
                }
                if matches!(
                    self.state,
                    RecognitionState::Possible | RecognitionState::Initiated
                ) {
                    // the pressure threshold may have been crossed while
                    // stationary, which no report shows; initiate late so
                    // every completion has an initiation
                    if self.state == RecognitionState::Possible {
                        out.push(TapEvent {
                            location: touch.location,
                            phase: TapPhase::Initiated,
                        });
                    }
                    self.state = RecognitionState::Recognized;
                    out.push(TapEvent {
                        location: touch.location,
                        phase: TapPhase::Completed,
                    });
                }
            }
        }
    }

    fn tracks(&self, touch: &PersistentTouch) -> bool {
        self.touch.is_some_and(|t| t.touch_id == touch.touch_id)
    }

    pub async fn pump(
        mut self,
        mut rx: mpsc::Receiver<PersistentTouchReport>,
        tx: mpsc::Sender<TapEvent>,
    ) {
        'outer: while let Some(report) = rx.recv().await {
            for event in self.digest(&report) {
                if tx.send(event).await.is_err() {
                    break 'outer;
                }
            }
        }
    }
}

/// A running gesture pipeline, torn down like the keystream: dropping the
/// handle aborts the stage tasks.
pub struct Tapstream {
    raw_tx: Option<mpsc::Sender<TouchReport>>,
    pub events: mpsc::Receiver<TapEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl Default for Tapstream {
    fn default() -> Self {
        Self::build()
    }
}

impl Tapstream {
    pub fn build() -> Self {
        let mut tasks = Vec::new();
        let (raw_tx, raw_rx) = mpsc::channel::<TouchReport>(STAGE_CHANNEL_CAPACITY);
        let (tx1, rx1) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        tasks.push(tokio::task::spawn_local(
            MakePersistent::new().pump(raw_rx, tx1),
        ));
        let (tx2, out_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        tasks.push(tokio::task::spawn_local(TapRecognizer::new().pump(rx1, tx2)));
        Self {
            raw_tx: Some(raw_tx),
            events: out_rx,
            tasks,
        }
    }

    pub fn sender(&self) -> Option<mpsc::Sender<TouchReport>> {
        self.raw_tx.clone()
    }

    pub fn close_input(&mut self) {
        self.raw_tx = None;
    }
}

impl Drop for Tapstream {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::input::events::TouchEvent;

    fn report(touches: Vec<TouchEvent>, millis: u64) -> TouchReport {
        TouchReport {
            touches,
            timestamp: Duration::from_millis(millis),
        }
    }

    fn touch(x: i32, y: i32, pressure: i32, slot: usize) -> TouchEvent {
        TouchEvent {
            x,
            y,
            pressure,
            slot,
        }
    }

    fn run_taps(reports: Vec<TouchReport>) -> Vec<TapEvent> {
        let mut persist = MakePersistent::new();
        let mut recognizer = TapRecognizer::new();
        let mut out = Vec::new();
        for r in reports {
            if let Some(pr) = persist.digest(&r) {
                out.extend(recognizer.digest(&pr));
            }
        }
        out
    }

    #[test]
    fn make_persistent_allocates_increasing_ids() {
        let mut persist = MakePersistent::new();
        let first = persist
            .digest(&report(vec![touch(10, 10, 30, 0)], 0))
            .unwrap();
        assert_eq!(first.began.len(), 1);
        assert_eq!(first.began[0].touch_id, 1);
        let _ = persist.digest(&report(vec![], 10)).unwrap();
        let second = persist
            .digest(&report(vec![touch(20, 20, 30, 0)], 20))
            .unwrap();
        assert_eq!(second.began[0].touch_id, 2);
    }

    #[test]
    fn make_persistent_tracks_max_pressure_monotonically() {
        let mut persist = MakePersistent::new();
        persist.digest(&report(vec![touch(10, 10, 40, 0)], 0));
        // pressure drops, but a later move still reports the earlier peak
        let moved = persist
            .digest(&report(vec![touch(40, 10, 20, 0)], 10))
            .unwrap();
        assert_eq!(moved.moved[0].max_pressure, 40);
    }

    #[test]
    fn make_persistent_skips_stationary_frames() {
        let mut persist = MakePersistent::new();
        persist.digest(&report(vec![touch(10, 10, 30, 0)], 0));
        // tiny drift below the threshold produces no report at all
        assert!(persist
            .digest(&report(vec![touch(12, 11, 30, 0)], 10))
            .is_none());
    }

    #[test]
    fn simple_tap_initiates_then_completes() {
        let mut reports = Vec::new();
        for i in 0..8 {
            reports.push(report(vec![touch(601, 618, 38, 0)], i * 20));
        }
        reports.push(report(vec![], 160));
        let taps = run_taps(reports);
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
    fn swipe_is_canceled_not_completed() {
        let mut reports = Vec::new();
        for i in 0..16i32 {
            reports.push(report(
                vec![touch(600 + i * 12, 618, 38, 0)],
                (i as u64) * 16,
            ));
        }
        reports.push(report(vec![], 260));
        let taps = run_taps(reports);
        assert_eq!(taps.len(), 2);
        assert_eq!(taps[0].phase, TapPhase::Initiated);
        assert_eq!(taps[1].phase, TapPhase::Canceled);
    }

    #[test]
    fn light_touch_emits_nothing() {
        let mut reports = Vec::new();
        for i in 0..10 {
            reports.push(report(vec![touch(771, 944, 21, 0)], i * 16));
        }
        reports.push(report(vec![], 170));
        assert!(run_taps(reports).is_empty());
    }

    #[test]
    fn second_finger_cancels() {
        let reports = vec![
            report(vec![touch(200, 300, 38, 0)], 0),
            report(vec![touch(200, 300, 38, 0), touch(500, 700, 38, 1)], 30),
            report(vec![], 60),
        ];
        let taps = run_taps(reports);
        assert_eq!(taps.len(), 2);
        assert_eq!(taps[0].phase, TapPhase::Initiated);
        assert_eq!(taps[1].phase, TapPhase::Canceled);
        assert!(!taps.iter().any(|t| t.phase == TapPhase::Completed));
    }

    #[test]
    fn overlong_press_is_canceled_after_initiation() {
        let reports = vec![
            report(vec![touch(100, 100, 38, 0)], 0),
            report(vec![], 500),
        ];
        let taps = run_taps(reports);
        assert_eq!(taps.len(), 2);
        assert_eq!(taps[0].phase, TapPhase::Initiated);
        assert_eq!(taps[1].phase, TapPhase::Canceled);
    }

    #[test]
    fn recognizer_resets_between_cycles() {
        let mut reports = Vec::new();
        for round in 0u64..3 {
            let base = round * 1000;
            reports.push(report(vec![touch(300, 400, 38, 0)], base));
            reports.push(report(vec![], base + 50));
        }
        let taps = run_taps(reports);
        let completed = taps.iter().filter(|t| t.phase == TapPhase::Completed).count();
        assert_eq!(completed, 3);
    }

    #[test]
    fn pressure_reached_while_stationary_still_initiates() {
        // begins light, peaks while stationary, lifts in time
        let mut persist = MakePersistent::new();
        let mut recognizer = TapRecognizer::new();
        let mut out = Vec::new();
        for (ms, p) in [(0, 20), (16, 30)] {
            if let Some(pr) = persist.digest(&report(vec![touch(50, 60, p, 0)], ms)) {
                out.extend(recognizer.digest(&pr));
            }
        }
        if let Some(pr) = persist.digest(&report(vec![], 40)) {
            out.extend(recognizer.digest(&pr));
        }
        assert_eq!(
            out.iter().map(|t| t.phase).collect::<Vec<_>>(),
            vec![TapPhase::Initiated, TapPhase::Completed]
        );
    }
}
