//! The system menu: session lifecycle, fonts, export, shutdown.

use tokio::sync::mpsc;

use super::{AppContext, ScreenTarget, StackBehavior, Verb};
use crate::input::events::{AnnotatedKeyEvent, Event, TapEvent, TapPhase};
use crate::render::Canvas;
use crate::screens::widgets::{BUTTON_FONT, Button, button_column};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuAction {
    NewSession,
    ResumeSession,
    SetFont,
    ExportSession,
    ResumeDrafting,
    Shutdown,
}

pub struct SystemMenu {
    buttons: Vec<Button<(char, MenuAction)>>,
}

impl Default for SystemMenu {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMenu {
    pub fn new() -> Self {
        Self {
            buttons: Vec::new(),
        }
    }

    fn make_buttons(&mut self, ctx: &AppContext) {
        let has_session = ctx.document.borrow().has_session();
        let mut entries = vec![
            ('1', "New Session", MenuAction::NewSession),
            ('2', "Resume Session", MenuAction::ResumeSession),
            ('3', "Set Font", MenuAction::SetFont),
        ];
        if has_session {
            entries.push(('4', "Export Session", MenuAction::ExportSession));
            entries.push(('5', "Resume Drafting", MenuAction::ResumeDrafting));
        }
        entries.push(('0', "Shutdown", MenuAction::Shutdown));

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
                MenuAction::NewSession => {
                    let session_id = ctx.db.new_session()?;
                    ctx.document.borrow_mut().load_session(session_id, &ctx.db)?;
                    return Ok(Verb::change(
                        ScreenTarget::Drafting,
                        StackBehavior::ReplaceAll,
                    ));
                }
                MenuAction::ResumeSession => {
                    return Ok(Verb::change(
                        ScreenTarget::SessionList,
                        StackBehavior::ReplaceAll,
                    ));
                }
                MenuAction::SetFont => {
                    return Ok(Verb::change(ScreenTarget::Fonts, StackBehavior::ReplaceAll));
                }
                MenuAction::ExportSession => {
                    {
                        let mut document = ctx.document.borrow_mut();
                        document.save_session(&ctx.db)?;
                        document.export_session(&ctx.db, &ctx.settings.export_path)?;
                    }
                    return Ok(Verb::change(
                        ScreenTarget::OkDialog {
                            message: "Export complete!".to_string(),
                        },
                        StackBehavior::Append,
                    ));
                }
                MenuAction::ResumeDrafting => {
                    return Ok(Verb::change(
                        ScreenTarget::Drafting,
                        StackBehavior::ReplaceAll,
                    ));
                }
                MenuAction::Shutdown => return Ok(Verb::Shutdown),
            }
        }
    }

    fn action_for_key(&self, key: &AnnotatedKeyEvent) -> Option<MenuAction> {
        let c = key.character?;
        self.buttons
            .iter()
            .find(|b| b.value.0 == c)
            .map(|b| b.value.1)
    }

    fn action_for_tap(&self, tap: &TapEvent) -> Option<MenuAction> {
        if tap.phase != TapPhase::Completed {
            return None;
        }
        self.buttons
            .iter()
            .find(|b| b.contains(tap.location))
            .map(|b| b.value.1)
    }

    async fn paint(&self, ctx: &mut AppContext) -> anyhow::Result<()> {
        let mut canvas = Canvas::new(ctx.screen_info.size);
        for button in &self.buttons {
            button.render(&mut canvas, ctx.renderer.as_ref(), BUTTON_FONT)?;
        }
        ctx.display
            .display_rendered(&canvas.into_rendered())
            .await?;
        Ok(())
    }
}
