//! Actions on one stored session: load it for editing, export it, delete it.
//!
//! Sessions past the editable age (or already exported and unchanged) can
//! only be exported or deleted; the writing itself is done.

use tokio::sync::{mpsc, oneshot};

use super::{AppContext, ScreenTarget, StackBehavior, Verb};
use crate::doc::{self, Session};
use crate::input::events::{AnnotatedKeyEvent, Event, TapEvent, TapPhase};
use crate::render::{Canvas, markup::escape_for_markup};
use crate::screens::widgets::{BUTTON_FONT, Button, UI_FONT, button_column};
use crate::time_utils::{format_date, now_local};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Load,
    Export,
    Delete,
    Back,
}

pub struct SessionActions {
    session: Session,
    buttons: Vec<Button<(char, Action)>>,
    pending_delete: Option<oneshot::Receiver<bool>>,
}

impl SessionActions {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            buttons: Vec::new(),
            pending_delete: None,
        }
    }

    fn editable(&self, ctx: &AppContext) -> bool {
        let age = now_local() - self.session.updated_at;
        let age: std::time::Duration = age.try_into().unwrap_or_default();
        age <= ctx.settings.max_editable_age
    }

    fn make_buttons(&mut self, ctx: &AppContext) {
        let mut entries = Vec::new();
        if self.editable(ctx) {
            entries.push(('1', "Load Session", Action::Load));
        }
        entries.push(('2', "Export Session", Action::Export));
        entries.push(('3', "Delete Session", Action::Delete));
        entries.push(('0', "Back", Action::Back));

        let rects = button_column(ctx.screen_info.size, entries.len());
        self.buttons = entries
            .into_iter()
            .zip(rects)
            .map(|((shortcut, label, action), rect)| {
                Button::new(rect, format!("{shortcut} · {label}"), (shortcut, action))
            })
            .collect();
    }

    pub async fn run(
        &mut self,
        ctx: &mut AppContext,
        events: &mut mpsc::Receiver<Event>,
    ) -> anyhow::Result<Verb> {
        // a delete confirmation resolves here, after the dialog closed
        if let Some(reply) = self.pending_delete.take() {
            if reply.await.unwrap_or(false) {
                ctx.db.delete_session(self.session.id)?;
                return Ok(Verb::change(
                    ScreenTarget::SessionList,
                    StackBehavior::ReplaceAll,
                ));
            }
        }

        ctx.hardware.reset_keystream(false);
        ctx.hardware.reset_tapstream();
        self.make_buttons(ctx);
        self.paint(ctx).await?;

        loop {
            let action = match events.recv().await {
                Some(Event::Key(key)) => self.action_for_key(&key),
                Some(Event::Tap(tap)) => self.action_for_tap(&tap),
                Some(Event::KeyboardDisconnect) => {
                    return Ok(Verb::change(
                        ScreenTarget::KeyboardDetect { on_startup: false },
                        StackBehavior::Append,
                    ));
                }
                None => anyhow::bail!("event channel closed"),
            };
            let Some(action) = action else { continue };
            match action {
                Action::Load => {
                    ctx.document
                        .borrow_mut()
                        .load_session(self.session.id, &ctx.db)?;
                    return Ok(Verb::change(
                        ScreenTarget::Drafting,
                        StackBehavior::ReplaceAll,
                    ));
                }
                Action::Export => {
                    doc::export_stored_session(&ctx.db, self.session.id, &ctx.settings.export_path)?;
                    return Ok(Verb::change(
                        ScreenTarget::OkDialog {
                            message: "Export complete!".to_string(),
                        },
                        StackBehavior::Append,
                    ));
                }
                Action::Delete => {
                    let (tx, rx) = oneshot::channel();
                    self.pending_delete = Some(rx);
                    return Ok(Verb::change(
                        ScreenTarget::YesNoDialog {
                            message: "Really delete this session?".to_string(),
                            reply: tx,
                        },
                        StackBehavior::Append,
                    ));
                }
                Action::Back => {
                    return Ok(Verb::change(
                        ScreenTarget::SessionList,
                        StackBehavior::ReplaceAll,
                    ));
                }
            }
        }
    }

    fn action_for_key(&self, key: &AnnotatedKeyEvent) -> Option<Action> {
        let c = key.character?;
        self.buttons
            .iter()
            .find(|b| b.value.0 == c)
            .map(|b| b.value.1)
    }

    fn action_for_tap(&self, tap: &TapEvent) -> Option<Action> {
        if tap.phase != TapPhase::Completed {
            return None;
        }
        self.buttons
            .iter()
            .find(|b| b.contains(tap.location))
            .map(|b| b.value.1)
    }

    async fn paint(&self, ctx: &mut AppContext) -> anyhow::Result<()> {
        let screen = ctx.screen_info.size;
        let mut canvas = Canvas::new(screen);
        let header = format!(
            "Session started {} — {} words{}",
            format_date(self.session.started_on),
            self.session.wordcount,
            if self.editable(ctx) {
                ""
            } else {
                " (too old to edit)"
            }
        );
        let header = ctx
            .renderer
            .render_markup(&escape_for_markup(&header), UI_FONT, screen.width - 100)?;
        canvas.draw_text(crate::geometry::Point::new(50, 40), &header);
        for button in &self.buttons {
            button.render(&mut canvas, ctx.renderer.as_ref(), BUTTON_FONT)?;
        }
        ctx.display
            .display_rendered(&canvas.into_rendered())
            .await?;
        Ok(())
    }
}
