//! Keyboard discovery and exclusive reading.
//!
//! Scans the evdev enumeration on a fixed cadence for devices that report a
//! typical keyboard key. Devices sharing a bus identity (a USB or Bluetooth
//! keyboard often exposes several event nodes) are one logical keyboard; the
//! first discovered group becomes active and its nodes are merged into one
//! ordered stream. Everything found is grabbed exclusively so stray daemons
//! never see our keystrokes; non-active groups stay grabbed-but-silent.

use std::rc::Rc;
use std::time::Duration;

use evdev::{Device, EventType, InputEvent, LedType};
use tokio::sync::mpsc;

use crate::device::Hardware;
use crate::input::events::{KeyEvent, SetLed};
use crate::input::keycode::{KeyCode, KeyPress, Led};

const SCAN_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyboardIdentity {
    vendor: u16,
    product: u16,
    name: String,
}

struct Candidate {
    identity: KeyboardIdentity,
    device: Device,
}

/// A keyboard key every real keyboard reports; fitness test for candidates.
fn looks_like_keyboard(device: &Device) -> bool {
    device
        .supported_keys()
        .is_some_and(|keys| keys.contains(evdev::Key::KEY_Q))
}

fn scan_and_grab() -> Vec<Candidate> {
    let mut found = Vec::new();
    for (path, mut device) in evdev::enumerate() {
        if !looks_like_keyboard(&device) {
            continue;
        }
        if let Err(err) = device.grab() {
            log::debug!("could not grab {}: {err}", path.display());
            continue;
        }
        let id = device.input_id();
        found.push(Candidate {
            identity: KeyboardIdentity {
                vendor: id.vendor(),
                product: id.product(),
                name: device.name().unwrap_or("unknown").to_string(),
            },
            device,
        });
    }
    found
}

enum ReaderMessage {
    Key(KeyEvent),
    Gone,
}

enum Wake {
    Primary(std::io::Result<InputEvent>),
    Sibling(Option<ReaderMessage>),
    Led(Option<SetLed>),
}

async fn read_node(mut stream: evdev::EventStream, tx: mpsc::Sender<ReaderMessage>) {
    loop {
        match stream.next_event().await {
            Ok(event) => {
                if let Some(key_event) = key_event_from(&event) {
                    if tx.send(ReaderMessage::Key(key_event)).await.is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                if err.raw_os_error() != Some(libc::ENODEV) {
                    log::warn!("keyboard read failed: {err}");
                }
                let _ = tx.send(ReaderMessage::Gone).await;
                return;
            }
        }
    }
}

fn key_event_from(event: &InputEvent) -> Option<KeyEvent> {
    if event.event_type() != EventType::KEY {
        return None;
    }
    let key = KeyCode::from_evdev(event.code())?;
    let press = KeyPress::from_repr(event.value())?;
    Some(KeyEvent { key, press })
}

fn apply_led(device: &mut Device, set: SetLed) {
    let code = match set.led {
        Led::CapsLock => LedType::LED_CAPSL,
        Led::Compose => LedType::LED_COMPOSE,
    };
    let value = i32::from(set.state);
    if let Err(err) = device.send_events(&[InputEvent::new(EventType::LED, code.0, value)]) {
        log::warn!("could not set keyboard LED: {err}");
    }
}

/// Owns keyboard hotplug for the life of the app. One logical keyboard is
/// active at a time; on disconnect every grab is released, a
/// `KeyboardDisconnect` event surfaces, and scanning resumes.
pub async fn run_keyboards(hardware: Rc<Hardware>, mut led_rx: mpsc::Receiver<SetLed>) {
    let mut ever_had_keyboard = false;
    let mut notified_disconnect = false;

    loop {
        let mut candidates = scan_and_grab();
        if candidates.is_empty() {
            if ever_had_keyboard && !notified_disconnect {
                hardware.keyboard_disconnect().await;
                notified_disconnect = true;
            }
            tokio::time::sleep(SCAN_INTERVAL).await;
            continue;
        }
        ever_had_keyboard = true;
        notified_disconnect = false;

        let active_identity = candidates[0].identity.clone();
        log::info!(
            "active keyboard: {} ({:04x}:{:04x})",
            active_identity.name,
            active_identity.vendor,
            active_identity.product
        );

        // split the group out; everything else stays grabbed and silent
        let mut group: Vec<Device> = Vec::new();
        let mut silent: Vec<Device> = Vec::new();
        for candidate in candidates.drain(..) {
            if candidate.identity == active_identity {
                group.push(candidate.device);
            } else {
                silent.push(candidate.device);
            }
        }

        let mut primary = match group.remove(0).into_event_stream() {
            Ok(stream) => stream,
            Err(err) => {
                log::warn!("could not stream keyboard: {err}");
                tokio::time::sleep(SCAN_INTERVAL).await;
                continue;
            }
        };

        let (reader_tx, mut reader_rx) = mpsc::channel::<ReaderMessage>(16);
        let mut readers = Vec::new();
        for device in group {
            match device.into_event_stream() {
                Ok(stream) => readers.push(tokio::task::spawn_local(read_node(
                    stream,
                    reader_tx.clone(),
                ))),
                Err(err) => log::warn!("could not stream keyboard node: {err}"),
            }
        }
        drop(reader_tx);

        'active: loop {
            // resolve the wake reason first; `primary` stays free for the
            // LED write below
            let wake = tokio::select! {
                event = primary.next_event() => Wake::Primary(event),
                message = reader_rx.recv() => Wake::Sibling(message),
                set = led_rx.recv() => Wake::Led(set),
            };
            match wake {
                Wake::Primary(Ok(event)) => {
                    if let Some(key_event) = key_event_from(&event) {
                        hardware.key_event(key_event).await;
                    }
                }
                Wake::Primary(Err(err)) => {
                    if err.raw_os_error() != Some(libc::ENODEV) {
                        log::warn!("keyboard read failed: {err}");
                    }
                    break 'active;
                }
                Wake::Sibling(Some(ReaderMessage::Key(key_event))) => {
                    hardware.key_event(key_event).await;
                }
                Wake::Sibling(Some(ReaderMessage::Gone)) | Wake::Sibling(None) => break 'active,
                Wake::Led(Some(set)) => apply_led(primary.device_mut(), set),
                Wake::Led(None) => return,
            }
        }

        // the active keyboard vanished: drop all grabs and start over
        for reader in &readers {
            reader.abort();
        }
        drop(silent);
        drop(primary);
        hardware.keyboard_disconnect().await;
        notified_disconnect = true;
        tokio::time::sleep(SCAN_INTERVAL).await;
    }
}
