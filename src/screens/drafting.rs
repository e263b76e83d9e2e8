//! The drafting screen: where the writing happens.
//!
//! Composes are enabled here and nowhere else. The paragraph area above the
//! pinned cursor line is laid out by the layout manager; a status strip at
//! the bottom shows the word count, the clock (or sprint countdown), and the
//! lock-key state.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::{AppContext, ScreenTarget, SprintOutcome, StackBehavior, Verb};
use crate::display::WaveformMode;
use crate::doc::DocumentModel;
use crate::durations::timer_display;
use crate::geometry::{Point, Rect, Size};
use crate::input::events::{AnnotatedKeyEvent, Event};
use crate::input::keycode::KeyCode;
use crate::layout::LayoutManager;
use crate::render::{Alignment, Canvas};
use crate::screens::widgets::UI_FONT;
use crate::time_utils::{format_clock, now_local};

const TICK: Duration = Duration::from_secs(15);
const STATUS_HEIGHT: i32 = 80;

pub struct Drafting {
    layout: LayoutManager,
    capslock: bool,
    compose: bool,
    pending_sprint: Option<oneshot::Receiver<SprintOutcome>>,
}

impl Drafting {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            layout: LayoutManager::new(ctx.renderer.clone(), ctx.screen_info.size),
            capslock: false,
            compose: false,
            pending_sprint: None,
        }
    }

    pub async fn run(
        &mut self,
        ctx: &mut AppContext,
        events: &mut mpsc::Receiver<Event>,
    ) -> anyhow::Result<Verb> {
        // a sprint dialog appended earlier has resolved by the time we run again
        if let Some(reply) = self.pending_sprint.take() {
            let outcome = reply.await.unwrap_or(SprintOutcome::Cancel);
            if let Some(verb) = self.apply_sprint_outcome(ctx, outcome) {
                return Ok(verb);
            }
        }

        ctx.hardware.reset_keystream(true);
        ctx.hardware.reset_tapstream();
        self.capslock = false;
        self.compose = false;
        // fast non-flashing updates while typing
        ctx.display.set_waveform_mode(WaveformMode::A2);
        ctx.display.clear().await?;
        self.render_document(ctx).await?;
        self.render_status(ctx).await?;

        let mut ticker = tokio::time::interval(TICK);
        ticker.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(Event::Key(key)) => {
                        if let Some(verb) = self.handle_key(ctx, key).await? {
                            return Ok(verb);
                        }
                    }
                    Some(Event::Tap(_)) => {}
                    Some(Event::KeyboardDisconnect) => {
                        self.save_session(ctx);
                        return Ok(Verb::change(
                            ScreenTarget::KeyboardDetect { on_startup: false },
                            StackBehavior::Append,
                        ));
                    }
                    None => anyhow::bail!("event channel closed"),
                },
                _ = ticker.tick() => {
                    if let Some(verb) = self.tick(ctx).await? {
                        return Ok(verb);
                    }
                }
            }
        }
    }

    async fn handle_key(
        &mut self,
        ctx: &mut AppContext,
        event: AnnotatedKeyEvent,
    ) -> anyhow::Result<Option<Verb>> {
        if event.is_led_able {
            self.capslock = event.annotation.capslock;
            self.compose = event.annotation.compose;
        }

        if let Some(c) = event
            .character
            .filter(|&c| DocumentModel::graphical_char(c))
        {
            ctx.document.borrow_mut().keystroke(c);
            self.render_document(ctx).await?;
        } else {
            match event.key {
                KeyCode::KEY_ENTER => {
                    ctx.document.borrow_mut().new_para();
                    self.render_document(ctx).await?;
                    if let Some(verb) = self.save_or_complain(ctx) {
                        return Ok(Some(verb));
                    }
                }
                KeyCode::KEY_BACKSPACE => {
                    ctx.document.borrow_mut().backspace();
                    self.render_document(ctx).await?;
                }
                KeyCode::KEY_F1 => {
                    self.save_session(ctx);
                    return Ok(Some(Verb::change(
                        ScreenTarget::Help,
                        StackBehavior::Append,
                    )));
                }
                KeyCode::SYNTHETIC_COMPOSE_DOUBLETAP => {
                    self.save_session(ctx);
                    let (tx, rx) = oneshot::channel();
                    self.pending_sprint = Some(rx);
                    return Ok(Some(Verb::change(
                        ScreenTarget::SprintControl { reply: tx },
                        StackBehavior::Append,
                    )));
                }
                KeyCode::KEY_F12 => {
                    let empty = ctx.document.borrow().wordcount() == 0;
                    if empty {
                        ctx.document.borrow_mut().delete_session(&ctx.db)?;
                    } else if let Some(verb) = self.save_or_complain(ctx) {
                        return Ok(Some(verb));
                    }
                    return Ok(Some(Verb::change(
                        ScreenTarget::SystemMenu,
                        StackBehavior::ReplaceAll,
                    )));
                }
                _ => {}
            }
        }

        self.render_status(ctx).await?;
        Ok(None)
    }

    async fn tick(&mut self, ctx: &mut AppContext) -> anyhow::Result<Option<Verb>> {
        self.save_session(ctx);
        let sprint_over = ctx
            .document
            .borrow()
            .sprint()
            .is_some_and(|sprint| sprint.completed());
        if sprint_over {
            ctx.document.borrow_mut().end_sprint(&ctx.db)?;
            self.render_document(ctx).await?;
        }
        self.render_status(ctx).await?;
        Ok(None)
    }

    fn apply_sprint_outcome(
        &mut self,
        ctx: &mut AppContext,
        outcome: SprintOutcome,
    ) -> Option<Verb> {
        let result = match outcome {
            SprintOutcome::Begin(duration) => {
                ctx.document.borrow_mut().begin_sprint(&ctx.db, duration)
            }
            SprintOutcome::End => ctx.document.borrow_mut().end_sprint(&ctx.db),
            SprintOutcome::Cancel => Ok(()),
        };
        if let Err(err) = result {
            log::warn!("sprint bookkeeping failed: {err}");
            return Some(storage_complaint());
        }
        None
    }

    /// Saves quietly; autosave or a later explicit save will retry.
    fn save_session(&self, ctx: &mut AppContext) {
        if let Err(err) = ctx.document.borrow_mut().save_session(&ctx.db) {
            log::warn!("could not save session: {err}");
        }
    }

    /// Saves loudly: a failure raises a dialog so the writer knows their
    /// words are not on disk yet. The document stays dirty for a retry.
    fn save_or_complain(&self, ctx: &mut AppContext) -> Option<Verb> {
        match ctx.document.borrow_mut().save_session(&ctx.db) {
            Ok(()) => None,
            Err(err) => {
                log::warn!("could not save session: {err}");
                Some(storage_complaint())
            }
        }
    }

    async fn render_document(&mut self, ctx: &mut AppContext) -> anyhow::Result<()> {
        let rendered = {
            let document = ctx.document.borrow();
            self.layout
                .render_update(&ctx.settings.current_font_spec(), &document)?
        };
        ctx.display.display_rendered(&rendered).await?;
        Ok(())
    }

    async fn render_status(&mut self, ctx: &mut AppContext) -> anyhow::Result<()> {
        let screen = ctx.screen_info.size;
        let line = {
            let document = ctx.document.borrow();
            let words = crate::doc::wordcount::format_wordcount(document.wordcount());
            let middle = match document.sprint() {
                Some(sprint) if sprint.completed() => "sprint finished".to_string(),
                Some(sprint) => format!("{} left", timer_display(sprint.remaining())),
                None => format_clock(now_local()),
            };
            let mut line = format!("{words} · {middle}");
            if self.capslock {
                line.push_str(" · CAPS");
            }
            if self.compose {
                line.push_str(" · compose");
            }
            line
        };

        let strip_size = Size::new(screen.width, STATUS_HEIGHT);
        let mut canvas = Canvas::new(strip_size);
        let text = ctx.renderer.render_markup_aligned(
            &crate::render::markup::escape_for_markup(&line),
            UI_FONT,
            screen.width - 40,
            Alignment::Center,
        )?;
        canvas.draw_text(Point::new(20, (STATUS_HEIGHT - text.size.height).max(0) / 2), &text);

        let mut rendered = canvas.into_rendered();
        rendered.extent = Rect::new(
            Point::new(0, screen.height - STATUS_HEIGHT),
            strip_size,
        );
        ctx.display.display_rendered(&rendered).await?;
        Ok(())
    }
}

fn storage_complaint() -> Verb {
    Verb::change(
        ScreenTarget::OkDialog {
            message: "Saving failed. Check the storage and try again.".to_string(),
        },
        StackBehavior::Append,
    )
}
