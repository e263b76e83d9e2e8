//! The keystream pipeline: raw key transitions in, annotated
//! character-bearing events out.
//!
//! Each stage owns its state and pumps events from a bounded receiver into a
//! bounded sender. Stages run as tasks on the single-threaded event loop;
//! closing the raw sender unwinds the whole chain in order, and aborting the
//! task handles (on a pipeline rebuild) discards any buffered input.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::input::events::{AnnotatedKeyEvent, KeyEvent, ModifierAnnotation};
use crate::input::keycode::{KeyCode, KeyPress};
use crate::input::trie::SequenceTrie;
use crate::settings::Settings;

const STAGE_CHANNEL_CAPACITY: usize = 4;

/// Stage 1: track modifier key-down/up and annotate the stream with the
/// current modifier state.
pub struct ModifierTracking {
    momentary: HashMap<KeyCode, bool>,
    locks: HashMap<KeyCode, bool>,
}

impl Default for ModifierTracking {
    fn default() -> Self {
        Self::new()
    }
}

impl ModifierTracking {
    pub fn new() -> Self {
        let momentary = [
            KeyCode::KEY_LEFTALT,
            KeyCode::KEY_RIGHTALT,
            KeyCode::KEY_LEFTCTRL,
            KeyCode::KEY_RIGHTCTRL,
            KeyCode::KEY_LEFTMETA,
            KeyCode::KEY_RIGHTMETA,
            KeyCode::KEY_LEFTSHIFT,
            KeyCode::KEY_RIGHTSHIFT,
        ]
        .into_iter()
        .map(|k| (k, false))
        .collect();
        let locks = [(KeyCode::KEY_CAPSLOCK, false)].into_iter().collect();
        Self { momentary, locks }
    }

    fn held(&self, key: KeyCode) -> bool {
        self.momentary.get(&key).copied().unwrap_or(false)
    }

    fn annotation(&self) -> ModifierAnnotation {
        ModifierAnnotation {
            alt: self.held(KeyCode::KEY_LEFTALT) || self.held(KeyCode::KEY_RIGHTALT),
            ctrl: self.held(KeyCode::KEY_LEFTCTRL) || self.held(KeyCode::KEY_RIGHTCTRL),
            meta: self.held(KeyCode::KEY_LEFTMETA) || self.held(KeyCode::KEY_RIGHTMETA),
            shift: self.held(KeyCode::KEY_LEFTSHIFT) || self.held(KeyCode::KEY_RIGHTSHIFT),
            capslock: self.locks.get(&KeyCode::KEY_CAPSLOCK).copied().unwrap_or(false),
            compose: false,
        }
    }

    pub fn annotate(&mut self, event: KeyEvent) -> AnnotatedKeyEvent {
        let mut is_modifier = false;
        let mut is_led_able = false;
        if let Some(held) = self.momentary.get_mut(&event.key) {
            is_modifier = true;
            *held = event.press != KeyPress::Released;
        }
        if let Some(latched) = self.locks.get_mut(&event.key) {
            is_modifier = true;
            is_led_able = true;
            if event.press == KeyPress::Pressed {
                *latched = !*latched;
            }
        }
        AnnotatedKeyEvent {
            key: event.key,
            press: event.press,
            annotation: self.annotation(),
            character: None,
            is_modifier,
            is_led_able,
        }
    }

    pub async fn pump(
        mut self,
        mut rx: mpsc::Receiver<KeyEvent>,
        tx: mpsc::Sender<AnnotatedKeyEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            if tx.send(self.annotate(event)).await.is_err() {
                break;
            }
        }
    }
}

/// Stage 2: everything downstream is press-only.
pub struct OnlyPresses;

impl OnlyPresses {
    pub async fn pump(
        self,
        mut rx: mpsc::Receiver<AnnotatedKeyEvent>,
        tx: mpsc::Sender<AnnotatedKeyEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            if event.press == KeyPress::Pressed && tx.send(event).await.is_err() {
                break;
            }
        }
    }
}

/// Stage 3: resolve key + modifiers into a character via the keymap.
///
/// Capslock inverts shift only for letter keys; digits and punctuation follow
/// shift alone.
pub struct MakeCharacter {
    keymaps: HashMap<KeyCode, [char; 2]>,
}

impl MakeCharacter {
    pub fn new(keymaps: HashMap<KeyCode, [char; 2]>) -> Self {
        Self { keymaps }
    }

    pub fn apply(&self, event: AnnotatedKeyEvent) -> AnnotatedKeyEvent {
        let Some(keymap) = self.keymaps.get(&event.key) else {
            return event;
        };
        let mut is_shifted = event.annotation.shift;
        if keymap[0].is_alphabetic() {
            is_shifted ^= event.annotation.capslock;
        }
        let level = usize::from(is_shifted);
        AnnotatedKeyEvent {
            character: Some(keymap[level]),
            ..event
        }
    }

    pub async fn pump(
        self,
        mut rx: mpsc::Receiver<AnnotatedKeyEvent>,
        tx: mpsc::Sender<AnnotatedKeyEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            if tx.send(self.apply(event)).await.is_err() {
                break;
            }
        }
    }
}

/// Stage 4: normalize the configured compose key into the sentinel
/// `KEY_COMPOSE` event. Kept separate from synthesis so the synthetic trie
/// only ever sees the sentinel.
pub struct ComposeKey {
    compose_key: KeyCode,
}

impl ComposeKey {
    pub fn new(compose_key: KeyCode) -> Self {
        Self { compose_key }
    }

    pub fn apply(&self, event: AnnotatedKeyEvent) -> AnnotatedKeyEvent {
        if event.key != self.compose_key {
            return event;
        }
        AnnotatedKeyEvent {
            key: KeyCode::KEY_COMPOSE,
            press: KeyPress::Pressed,
            annotation: ModifierAnnotation {
                compose: true,
                capslock: event.annotation.capslock,
                ..ModifierAnnotation::default()
            },
            character: None,
            is_modifier: true,
            is_led_able: true,
        }
    }

    pub async fn pump(
        self,
        mut rx: mpsc::Receiver<AnnotatedKeyEvent>,
        tx: mpsc::Sender<AnnotatedKeyEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            if tx.send(self.apply(event)).await.is_err() {
                break;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeystreamState {
    Passthrough,
    Collecting,
}

/// Stage 5: recognize multi-key sequences and append a synthetic key event.
///
/// Collected events always pass through; only the synthesized key is added.
pub struct SynthesizeKeys {
    sequences: SequenceTrie<KeyCode, KeyCode>,
    state: KeystreamState,
    collected: Vec<KeyCode>,
}

impl Default for SynthesizeKeys {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthesizeKeys {
    pub fn new() -> Self {
        let mut sequences = SequenceTrie::new();
        sequences.insert(
            [KeyCode::KEY_COMPOSE, KeyCode::KEY_COMPOSE],
            KeyCode::SYNTHETIC_COMPOSE_DOUBLETAP,
        );
        Self {
            sequences,
            state: KeystreamState::Passthrough,
            collected: Vec::new(),
        }
    }

    /// Returns the synthesized event to emit after `event`, if the sequence
    /// just completed.
    pub fn observe(&mut self, event: &AnnotatedKeyEvent) -> Option<AnnotatedKeyEvent> {
        match self.state {
            KeystreamState::Passthrough => {
                if self.sequences.has_node(&[event.key]) {
                    self.state = KeystreamState::Collecting;
                    self.collected.push(event.key);
                }
                None
            }
            KeystreamState::Collecting => {
                self.collected.push(event.key);
                if let Some(&synthesized) = self.sequences.get(&self.collected) {
                    self.collected.clear();
                    self.state = KeystreamState::Passthrough;
                    return Some(AnnotatedKeyEvent {
                        key: synthesized,
                        press: KeyPress::Pressed,
                        annotation: ModifierAnnotation::capslock(event.annotation.capslock),
                        character: None,
                        is_modifier: false,
                        is_led_able: false,
                    });
                }
                if !self.sequences.has_node(&self.collected) {
                    self.collected.clear();
                    self.state = KeystreamState::Passthrough;
                }
                None
            }
        }
    }

    pub async fn pump(
        mut self,
        mut rx: mpsc::Receiver<AnnotatedKeyEvent>,
        tx: mpsc::Sender<AnnotatedKeyEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            if tx.send(event).await.is_err() {
                break;
            }
            if let Some(synthesized) = self.observe(&event) {
                if tx.send(synthesized).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Stage 6: resolve compose sequences against the configured trie.
///
/// While collecting, every event is devoured. A terminal match emits a single
/// character-bearing `KEY_COMPOSE` event; a dead end emits a terminating
/// `compose=false` marker followed by the devoured events in order.
pub struct ComposeCharacters {
    sequences: SequenceTrie<char, char>,
    state: KeystreamState,
    devoured: Vec<AnnotatedKeyEvent>,
    devoured_characters: Vec<char>,
}

impl ComposeCharacters {
    pub fn new(sequences: SequenceTrie<char, char>) -> Self {
        Self {
            sequences,
            state: KeystreamState::Passthrough,
            devoured: Vec::new(),
            devoured_characters: Vec::new(),
        }
    }

    /// Feeds one event through the state machine, returning the events to
    /// emit in order.
    pub fn feed(&mut self, event: AnnotatedKeyEvent) -> Vec<AnnotatedKeyEvent> {
        let mut out = Vec::new();
        match self.state {
            KeystreamState::Passthrough => {
                if event.key == KeyCode::KEY_COMPOSE {
                    self.state = KeystreamState::Collecting;
                    self.devoured.clear();
                    self.devoured_characters.clear();
                }
                // pass through so the compose LED state stays visible
                out.push(event);
            }
            KeystreamState::Collecting => {
                self.devoured.push(event);
                if event.is_modifier && !event.is_led_able {
                    return out;
                }
                let mut still_matching = false;
                if let Some(c) = event.character {
                    self.devoured_characters.push(c);
                    still_matching = self.sequences.has_node(&self.devoured_characters);
                }
                if !(still_matching || event.is_modifier) {
                    // dead end: terminate the compose annotation, then
                    // replay everything we swallowed
                    self.state = KeystreamState::Passthrough;
                    out.push(AnnotatedKeyEvent {
                        key: KeyCode::KEY_COMPOSE,
                        press: KeyPress::Pressed,
                        annotation: ModifierAnnotation {
                            compose: false,
                            ..event.annotation
                        },
                        character: None,
                        is_modifier: true,
                        is_led_able: true,
                    });
                    out.append(&mut self.devoured);
                } else {
                    if let Some(&resolved) = self.sequences.get(&self.devoured_characters) {
                        self.state = KeystreamState::Passthrough;
                        out.push(AnnotatedKeyEvent {
                            key: KeyCode::KEY_COMPOSE,
                            press: KeyPress::Pressed,
                            annotation: ModifierAnnotation::capslock(event.annotation.capslock),
                            character: Some(resolved),
                            is_modifier: false,
                            is_led_able: true,
                        });
                    }
                    if event.is_led_able {
                        // keep the lock-key event visible, marked as composing
                        out.push(AnnotatedKeyEvent {
                            annotation: ModifierAnnotation {
                                compose: true,
                                ..event.annotation
                            },
                            ..event
                        });
                    }
                }
            }
        }
        out
    }

    pub async fn pump(
        mut self,
        mut rx: mpsc::Receiver<AnnotatedKeyEvent>,
        tx: mpsc::Sender<AnnotatedKeyEvent>,
    ) {
        'outer: while let Some(event) = rx.recv().await {
            for out in self.feed(event) {
                if tx.send(out).await.is_err() {
                    break 'outer;
                }
            }
        }
    }
}

/// A running keystream pipeline.
///
/// Dropping the handle aborts every stage task, which is how
/// `Hardware::reset_keystream` discards in-flight state.
pub struct Keystream {
    raw_tx: Option<mpsc::Sender<KeyEvent>>,
    pub events: mpsc::Receiver<AnnotatedKeyEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl Keystream {
    /// Builds and starts the stage tasks. The compose stages are only
    /// installed when the active screen asked for them.
    pub fn build(settings: &Settings, enable_composes: bool) -> Self {
        let mut tasks = Vec::new();

        let (raw_tx, raw_rx) = mpsc::channel::<KeyEvent>(STAGE_CHANNEL_CAPACITY);
        let (tx1, rx1) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        tasks.push(tokio::task::spawn_local(
            ModifierTracking::new().pump(raw_rx, tx1),
        ));

        let (tx2, rx2) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        tasks.push(tokio::task::spawn_local(OnlyPresses.pump(rx1, tx2)));

        let (tx3, rx3) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        tasks.push(tokio::task::spawn_local(
            MakeCharacter::new(settings.keymaps.clone()).pump(rx2, tx3),
        ));

        let (tx4, mut out_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        tasks.push(tokio::task::spawn_local(
            ComposeKey::new(settings.compose_key).pump(rx3, tx4),
        ));

        if enable_composes {
            let (tx5, rx5) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
            tasks.push(tokio::task::spawn_local(
                SynthesizeKeys::new().pump(out_rx, tx5),
            ));
            let (tx6, rx6) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
            tasks.push(tokio::task::spawn_local(
                ComposeCharacters::new(settings.compose_sequences.clone()).pump(rx5, tx6),
            ));
            out_rx = rx6;
        }

        Self {
            raw_tx: Some(raw_tx),
            events: out_rx,
            tasks,
        }
    }

    pub fn sender(&self) -> Option<mpsc::Sender<KeyEvent>> {
        self.raw_tx.clone()
    }

    /// Closes the raw input, letting the stages drain and shut down in order.
    pub fn close_input(&mut self) {
        self.raw_tx = None;
    }
}

impl Drop for Keystream {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
