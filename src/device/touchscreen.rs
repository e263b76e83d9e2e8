//! Touchscreen frame assembly.
//!
//! Two wire protocols are in the field: proper slot-based multitouch
//! ("type B"), where the kernel tracks contacts per slot, and the "snow"
//! protocol, where `ABS_MT_TRACKING_ID` doubles as the slot index and every
//! contact is re-reported each frame, terminated by `SYN_MT_REPORT`.

use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, UNIX_EPOCH};

use evdev::{AbsoluteAxisType, InputEventKind, Key, Synchronization};
use serde::{Deserialize, Serialize};

use crate::input::events::{TouchEvent, TouchReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultitouchVariant {
    TypeB,
    #[default]
    Snow,
}

#[derive(Debug, Clone, Copy, Default)]
struct WipTouch {
    tracking_id: Option<i32>,
    x: Option<i32>,
    y: Option<i32>,
    pressure: Option<i32>,
}

impl WipTouch {
    fn finalize(&self) -> Option<TouchEvent> {
        let slot = self.tracking_id?;
        if !(0..2).contains(&slot) {
            return None;
        }
        Some(TouchEvent {
            x: self.x?,
            y: self.y?,
            pressure: self.pressure.unwrap_or(0),
            slot: slot as usize,
        })
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Assembles raw evdev events into complete [`TouchReport`]s.
pub struct FrameAssembler {
    variant: MultitouchVariant,
    /// Snow: contacts finalized so far this frame. Type B: kernel slot state,
    /// persistent across frames.
    slots: [Option<TouchEvent>; 2],
    wip: WipTouch,
    current_slot: usize,
    disregard: bool,
}

impl FrameAssembler {
    pub fn new(variant: MultitouchVariant) -> Self {
        Self {
            variant,
            slots: [None, None],
            wip: WipTouch::default(),
            current_slot: 0,
            disregard: false,
        }
    }

    fn active_touches(&self) -> Vec<TouchEvent> {
        self.slots.iter().flatten().copied().collect()
    }

    fn slot_mut(&mut self) -> &mut Option<TouchEvent> {
        &mut self.slots[self.current_slot.min(1)]
    }

    /// Feeds one event; returns a report at each clean SYN boundary.
    pub fn handle(
        &mut self,
        kind: InputEventKind,
        value: i32,
        timestamp: Duration,
    ) -> Option<TouchReport> {
        match kind {
            InputEventKind::Synchronization(Synchronization::SYN_DROPPED) => {
                self.disregard = true;
                None
            }
            InputEventKind::Synchronization(Synchronization::SYN_MT_REPORT) => {
                if self.variant == MultitouchVariant::Snow && !self.disregard {
                    if let Some(touch) = self.wip.finalize() {
                        self.slots[touch.slot] = Some(touch);
                    }
                    self.wip.clear();
                }
                None
            }
            InputEventKind::Synchronization(Synchronization::SYN_REPORT) => {
                if self.disregard {
                    // the kernel dropped events; the frame in progress is garbage
                    self.disregard = false;
                    if self.variant == MultitouchVariant::Snow {
                        self.slots = [None, None];
                    }
                    self.wip.clear();
                    return None;
                }
                let report = TouchReport {
                    touches: self.active_touches(),
                    timestamp,
                };
                if self.variant == MultitouchVariant::Snow {
                    self.slots = [None, None];
                    self.wip.clear();
                }
                Some(report)
            }
            InputEventKind::AbsAxis(axis) if !self.disregard => {
                match (self.variant, axis) {
                    (MultitouchVariant::TypeB, AbsoluteAxisType::ABS_MT_SLOT) => {
                        self.current_slot = value.max(0) as usize;
                    }
                    (MultitouchVariant::TypeB, AbsoluteAxisType::ABS_MT_TRACKING_ID) => {
                        if value < 0 {
                            *self.slot_mut() = None;
                        } else {
                            let slot = self.current_slot.min(1);
                            self.slots[slot].get_or_insert(TouchEvent {
                                x: 0,
                                y: 0,
                                pressure: 0,
                                slot,
                            });
                        }
                    }
                    (MultitouchVariant::TypeB, AbsoluteAxisType::ABS_MT_POSITION_X) => {
                        if let Some(touch) = self.slot_mut() {
                            touch.x = value;
                        }
                    }
                    (MultitouchVariant::TypeB, AbsoluteAxisType::ABS_MT_POSITION_Y) => {
                        if let Some(touch) = self.slot_mut() {
                            touch.y = value;
                        }
                    }
                    (MultitouchVariant::TypeB, AbsoluteAxisType::ABS_MT_PRESSURE) => {
                        if let Some(touch) = self.slot_mut() {
                            touch.pressure = value;
                        }
                    }
                    (MultitouchVariant::Snow, AbsoluteAxisType::ABS_MT_TRACKING_ID) => {
                        self.wip.tracking_id = Some(value);
                    }
                    (MultitouchVariant::Snow, AbsoluteAxisType::ABS_MT_POSITION_X) => {
                        self.wip.x = Some(value);
                    }
                    (MultitouchVariant::Snow, AbsoluteAxisType::ABS_MT_POSITION_Y) => {
                        self.wip.y = Some(value);
                    }
                    (MultitouchVariant::Snow, AbsoluteAxisType::ABS_MT_PRESSURE) => {
                        self.wip.pressure = Some(value);
                    }
                    _ => {}
                }
                None
            }
            InputEventKind::Key(key) if key == Key::BTN_TOUCH && value == 0 => {
                // lift-off: everything is gone
                self.wip.clear();
                self.slots = [None, None];
                None
            }
            _ => None,
        }
    }
}

/// Reads the touchscreen device forever, feeding assembled reports into the
/// adapter. The touchscreen is a fixed device; read errors are logged and
/// retried.
pub async fn run_touchscreen(
    hardware: Rc<crate::device::Hardware>,
    path: PathBuf,
    variant: MultitouchVariant,
) {
    loop {
        let device = match evdev::Device::open(&path) {
            Ok(device) => device,
            Err(err) => {
                log::warn!("could not open touchscreen {}: {err}", path.display());
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };
        let mut stream = match device.into_event_stream() {
            Ok(stream) => stream,
            Err(err) => {
                log::warn!("could not stream touchscreen {}: {err}", path.display());
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };
        log::info!("reading touchscreen at {}", path.display());
        let mut assembler = FrameAssembler::new(variant);
        loop {
            match stream.next_event().await {
                Ok(event) => {
                    let timestamp = event
                        .timestamp()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default();
                    if let Some(report) =
                        assembler.handle(event.kind(), event.value(), timestamp)
                    {
                        hardware.touch_report(report).await;
                    }
                }
                Err(err) => {
                    log::warn!("touchscreen read failed: {err}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: Duration = Duration::from_millis(5);

    fn feed(assembler: &mut FrameAssembler, events: &[(InputEventKind, i32)]) -> Vec<TouchReport> {
        events
            .iter()
            .filter_map(|(kind, value)| assembler.handle(*kind, *value, TS))
            .collect()
    }

    fn abs(axis: AbsoluteAxisType) -> InputEventKind {
        InputEventKind::AbsAxis(axis)
    }

    fn syn(code: Synchronization) -> InputEventKind {
        InputEventKind::Synchronization(code)
    }

    #[test]
    fn snow_frame_assembles_one_touch() {
        let mut assembler = FrameAssembler::new(MultitouchVariant::Snow);
        let reports = feed(
            &mut assembler,
            &[
                (abs(AbsoluteAxisType::ABS_MT_TRACKING_ID), 0),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_X), 601),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_Y), 618),
                (abs(AbsoluteAxisType::ABS_MT_PRESSURE), 38),
                (syn(Synchronization::SYN_MT_REPORT), 0),
                (syn(Synchronization::SYN_REPORT), 0),
            ],
        );
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].touches,
            vec![TouchEvent {
                x: 601,
                y: 618,
                pressure: 38,
                slot: 0
            }]
        );
    }

    #[test]
    fn snow_empty_frame_reports_no_touches() {
        let mut assembler = FrameAssembler::new(MultitouchVariant::Snow);
        let reports = feed(&mut assembler, &[(syn(Synchronization::SYN_REPORT), 0)]);
        assert_eq!(reports.len(), 1);
        assert!(reports[0].touches.is_empty());
    }

    #[test]
    fn snow_two_touches_in_one_frame() {
        let mut assembler = FrameAssembler::new(MultitouchVariant::Snow);
        let reports = feed(
            &mut assembler,
            &[
                (abs(AbsoluteAxisType::ABS_MT_TRACKING_ID), 0),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_X), 100),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_Y), 200),
                (abs(AbsoluteAxisType::ABS_MT_PRESSURE), 30),
                (syn(Synchronization::SYN_MT_REPORT), 0),
                (abs(AbsoluteAxisType::ABS_MT_TRACKING_ID), 1),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_X), 400),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_Y), 500),
                (abs(AbsoluteAxisType::ABS_MT_PRESSURE), 31),
                (syn(Synchronization::SYN_MT_REPORT), 0),
                (syn(Synchronization::SYN_REPORT), 0),
            ],
        );
        assert_eq!(reports[0].touches.len(), 2);
        assert_eq!(reports[0].touches[1].slot, 1);
    }

    #[test]
    fn syn_dropped_discards_the_frame_in_progress() {
        let mut assembler = FrameAssembler::new(MultitouchVariant::Snow);
        let reports = feed(
            &mut assembler,
            &[
                (abs(AbsoluteAxisType::ABS_MT_TRACKING_ID), 0),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_X), 100),
                (syn(Synchronization::SYN_DROPPED), 0),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_Y), 200),
                (syn(Synchronization::SYN_REPORT), 0),
                // next frame is clean again
                (syn(Synchronization::SYN_REPORT), 0),
            ],
        );
        assert_eq!(reports.len(), 1);
        assert!(reports[0].touches.is_empty());
    }

    #[test]
    fn btn_touch_zero_clears_all_state() {
        let mut assembler = FrameAssembler::new(MultitouchVariant::Snow);
        let reports = feed(
            &mut assembler,
            &[
                (abs(AbsoluteAxisType::ABS_MT_TRACKING_ID), 0),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_X), 100),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_Y), 200),
                (abs(AbsoluteAxisType::ABS_MT_PRESSURE), 30),
                (syn(Synchronization::SYN_MT_REPORT), 0),
                (InputEventKind::Key(Key::BTN_TOUCH), 0),
                (syn(Synchronization::SYN_REPORT), 0),
            ],
        );
        assert!(reports[0].touches.is_empty());
    }

    #[test]
    fn type_b_slots_persist_across_frames() {
        let mut assembler = FrameAssembler::new(MultitouchVariant::TypeB);
        let reports = feed(
            &mut assembler,
            &[
                (abs(AbsoluteAxisType::ABS_MT_SLOT), 0),
                (abs(AbsoluteAxisType::ABS_MT_TRACKING_ID), 71),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_X), 300),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_Y), 400),
                (abs(AbsoluteAxisType::ABS_MT_PRESSURE), 35),
                (syn(Synchronization::SYN_REPORT), 0),
                // only pressure changes in the next frame
                (abs(AbsoluteAxisType::ABS_MT_PRESSURE), 40),
                (syn(Synchronization::SYN_REPORT), 0),
                // contact lifts
                (abs(AbsoluteAxisType::ABS_MT_TRACKING_ID), -1),
                (syn(Synchronization::SYN_REPORT), 0),
            ],
        );
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].touches[0].x, 300);
        assert_eq!(reports[1].touches[0].pressure, 40);
        assert_eq!(reports[1].touches[0].x, 300);
        assert!(reports[2].touches.is_empty());
    }

    #[test]
    fn type_b_second_slot() {
        let mut assembler = FrameAssembler::new(MultitouchVariant::TypeB);
        let reports = feed(
            &mut assembler,
            &[
                (abs(AbsoluteAxisType::ABS_MT_SLOT), 0),
                (abs(AbsoluteAxisType::ABS_MT_TRACKING_ID), 1),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_X), 100),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_Y), 150),
                (abs(AbsoluteAxisType::ABS_MT_SLOT), 1),
                (abs(AbsoluteAxisType::ABS_MT_TRACKING_ID), 2),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_X), 800),
                (abs(AbsoluteAxisType::ABS_MT_POSITION_Y), 850),
                (syn(Synchronization::SYN_REPORT), 0),
            ],
        );
        assert_eq!(reports[0].touches.len(), 2);
        assert_eq!(reports[0].touches[0].slot, 0);
        assert_eq!(reports[0].touches[1].slot, 1);
        assert_eq!(reports[0].touches[1].x, 800);
    }
}
