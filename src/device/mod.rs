//! The device adapter: one place that owns the input pipelines, the event
//! bus toward the dispatcher, and the LED cache.
//!
//! Raw events arrive from the evdev tasks (or from tests) through
//! [`Hardware::key_event`] and [`Hardware::touch_report`]; annotated events
//! and taps leave through the single event channel the dispatcher hands to
//! the active screen. Pipelines are rebuilt wholesale on screen transitions.

pub mod keyboard;
pub mod touchscreen;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::geometry::{ScreenInfo, Size, TouchCoordinateTransform};
use crate::input::events::{Event, KeyEvent, SetLed, TouchReport};
use crate::input::gestures::Tapstream;
use crate::input::keycode::Led;
use crate::input::keystream::Keystream;
use crate::settings::Settings;

pub struct Hardware {
    event_tx: mpsc::Sender<Event>,
    settings: RefCell<Rc<Settings>>,
    screen_size: Cell<Size>,
    touch_transform: Cell<TouchCoordinateTransform>,
    keystream_tx: RefCell<Option<mpsc::Sender<KeyEvent>>>,
    keystream_relay: RefCell<Option<JoinHandle<()>>>,
    tapstream_tx: RefCell<Option<mpsc::Sender<TouchReport>>>,
    tapstream_relay: RefCell<Option<JoinHandle<()>>>,
    led_tx: RefCell<Option<mpsc::Sender<SetLed>>>,
    capslock_led: Cell<bool>,
    compose_led: Cell<bool>,
    input_tasks: RefCell<Vec<JoinHandle<()>>>,
}

impl Hardware {
    pub fn new(event_tx: mpsc::Sender<Event>, settings: Rc<Settings>) -> Rc<Self> {
        let hardware = Rc::new(Self {
            event_tx,
            settings: RefCell::new(settings),
            screen_size: Cell::new(Size::new(0, 0)),
            touch_transform: Cell::new(TouchCoordinateTransform::Identity),
            keystream_tx: RefCell::new(None),
            keystream_relay: RefCell::new(None),
            tapstream_tx: RefCell::new(None),
            tapstream_relay: RefCell::new(None),
            led_tx: RefCell::new(None),
            capslock_led: Cell::new(false),
            compose_led: Cell::new(false),
            input_tasks: RefCell::new(Vec::new()),
        });
        hardware.reset_keystream(false);
        hardware.reset_tapstream();
        hardware
    }

    /// Remembers the panel geometry so touch coordinates can be mapped into
    /// rotated screen space at the adapter boundary.
    pub fn configure_screen(&self, info: &ScreenInfo) {
        self.screen_size.set(info.size);
        self.touch_transform.set(info.touch_coordinate_transform());
    }

    pub fn set_settings(&self, settings: Rc<Settings>) {
        *self.settings.borrow_mut() = settings;
    }

    /// Starts the evdev readers. Tests skip this and feed events directly.
    pub fn start_input_tasks(self: &Rc<Self>) {
        let (led_tx, led_rx) = mpsc::channel(8);
        *self.led_tx.borrow_mut() = Some(led_tx);
        let mut tasks = self.input_tasks.borrow_mut();
        tasks.push(tokio::task::spawn_local(keyboard::run_keyboards(
            Rc::clone(self),
            led_rx,
        )));
        let settings = self.settings.borrow().clone();
        tasks.push(tokio::task::spawn_local(touchscreen::run_touchscreen(
            Rc::clone(self),
            settings.touch_device.clone(),
            settings.multitouch_variant,
        )));
    }

    /// Test hook: route LED writes to a channel instead of a device.
    pub fn set_led_channel(&self, led_tx: mpsc::Sender<SetLed>) {
        *self.led_tx.borrow_mut() = Some(led_tx);
    }

    /// Tears down the current keystream (discarding buffered input) and
    /// builds a fresh one. Called on every screen transition.
    pub fn reset_keystream(self: &Rc<Self>, enable_composes: bool) {
        if let Some(relay) = self.keystream_relay.borrow_mut().take() {
            relay.abort();
        }
        let settings = self.settings.borrow().clone();
        let stream = Keystream::build(&settings, enable_composes);
        *self.keystream_tx.borrow_mut() = stream.sender();
        let relay = tokio::task::spawn_local(keystream_relay(Rc::clone(self), stream));
        *self.keystream_relay.borrow_mut() = Some(relay);
    }

    /// Same for the gesture pipeline.
    pub fn reset_tapstream(self: &Rc<Self>) {
        if let Some(relay) = self.tapstream_relay.borrow_mut().take() {
            relay.abort();
        }
        let stream = Tapstream::build();
        *self.tapstream_tx.borrow_mut() = stream.sender();
        let relay = tokio::task::spawn_local(tapstream_relay(Rc::clone(self), stream));
        *self.tapstream_relay.borrow_mut() = Some(relay);
    }

    /// Feeds one raw key event into the current keystream.
    pub async fn key_event(&self, event: KeyEvent) {
        let tx = self.keystream_tx.borrow().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    /// Feeds one raw touch report, mapped into screen coordinates, into the
    /// current gesture pipeline.
    pub async fn touch_report(&self, report: TouchReport) {
        let transform = self.touch_transform.get();
        let screen_size = self.screen_size.get();
        let report = TouchReport {
            touches: report
                .touches
                .into_iter()
                .map(|touch| touch.apply_transform(transform, screen_size))
                .collect(),
            timestamp: report.timestamp,
        };
        let tx = self.tapstream_tx.borrow().clone();
        if let Some(tx) = tx {
            let _ = tx.send(report).await;
        }
    }

    pub async fn keyboard_disconnect(&self) {
        let _ = self.event_tx.send(Event::KeyboardDisconnect).await;
    }

    /// Writes LED state, caching so only changes hit the wire.
    async fn sync_leds(&self, capslock: bool, compose: bool) {
        if self.capslock_led.get() != capslock {
            self.capslock_led.set(capslock);
            self.send_led(SetLed {
                led: Led::CapsLock,
                state: capslock,
            })
            .await;
        }
        if self.compose_led.get() != compose {
            self.compose_led.set(compose);
            self.send_led(SetLed {
                led: Led::Compose,
                state: compose,
            })
            .await;
        }
    }

    async fn send_led(&self, set: SetLed) {
        let tx = self.led_tx.borrow().clone();
        if let Some(tx) = tx {
            let _ = tx.send(set).await;
        }
    }

    /// Aborts every task the adapter owns. Part of dispatcher shutdown.
    pub fn shutdown(&self) {
        if let Some(relay) = self.keystream_relay.borrow_mut().take() {
            relay.abort();
        }
        if let Some(relay) = self.tapstream_relay.borrow_mut().take() {
            relay.abort();
        }
        for task in self.input_tasks.borrow_mut().drain(..) {
            task.abort();
        }
    }
}

async fn keystream_relay(hardware: Rc<Hardware>, mut stream: Keystream) {
    // fresh pipeline, fresh lock state: dark LEDs
    hardware.sync_leds(false, false).await;
    while let Some(event) = stream.events.recv().await {
        if event.is_led_able {
            hardware
                .sync_leds(event.annotation.capslock, event.annotation.compose)
                .await;
        }
        if hardware.event_tx.send(Event::Key(event)).await.is_err() {
            break;
        }
    }
}

async fn tapstream_relay(hardware: Rc<Hardware>, mut stream: Tapstream) {
    while let Some(event) = stream.events.recv().await {
        if hardware.event_tx.send(Event::Tap(event)).await.is_err() {
            break;
        }
    }
}
