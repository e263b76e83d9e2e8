//! A page of stored sessions; picking one opens its actions screen.

use tokio::sync::mpsc;

use super::{AppContext, ScreenTarget, StackBehavior, Verb};
use crate::doc::Session;
use crate::input::events::{AnnotatedKeyEvent, Event, TapEvent, TapPhase};
use crate::render::Canvas;
use crate::screens::widgets::{BUTTON_FONT, Button, button_column};
use crate::time_utils::format_date;

const PAGE_SIZE: usize = 9;

enum RowAction {
    Open(usize),
    Back,
}

pub struct SessionList {
    sessions: Vec<Session>,
    buttons: Vec<Button<char>>,
}

impl Default for SessionList {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionList {
    pub fn new() -> Self {
        Self {
            sessions: Vec::new(),
            buttons: Vec::new(),
        }
    }

    fn refresh(&mut self, ctx: &AppContext) -> anyhow::Result<()> {
        self.sessions = ctx.db.list_sessions(Some(PAGE_SIZE), false)?;
        let rects = button_column(ctx.screen_info.size, self.sessions.len() + 1);
        self.buttons = self
            .sessions
            .iter()
            .enumerate()
            .map(|(i, session)| {
                let shortcut = char::from_digit(i as u32 + 1, 10).unwrap_or('?');
                let marker = if session.needs_export() { " •" } else { "" };
                Button::new(
                    rects[i],
                    format!(
                        "{shortcut} · {} — {} words{marker}",
                        format_date(session.started_on),
                        session.wordcount
                    ),
                    shortcut,
                )
            })
            .collect();
        self.buttons.push(Button::new(
            rects[self.sessions.len()],
            "0 · Back",
            '0',
        ));
        Ok(())
    }

    pub async fn run(
        &mut self,
        ctx: &mut AppContext,
        events: &mut mpsc::Receiver<Event>,
    ) -> anyhow::Result<Verb> {
        ctx.hardware.reset_keystream(false);
        ctx.hardware.reset_tapstream();
        self.refresh(ctx)?;
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
            match action {
                Some(RowAction::Open(index)) => {
                    let session = self.sessions[index].clone();
                    return Ok(Verb::change(
                        ScreenTarget::SessionActions { session },
                        StackBehavior::ReplaceAll,
                    ));
                }
                Some(RowAction::Back) => {
                    return Ok(Verb::change(
                        ScreenTarget::SystemMenu,
                        StackBehavior::ReplaceAll,
                    ));
                }
                None => {}
            }
        }
    }

    fn action_for_shortcut(&self, shortcut: char) -> Option<RowAction> {
        match shortcut {
            '0' => Some(RowAction::Back),
            '1'..='9' => {
                let index = shortcut as usize - '1' as usize;
                (index < self.sessions.len()).then_some(RowAction::Open(index))
            }
            _ => None,
        }
    }

    fn action_for_key(&self, key: &AnnotatedKeyEvent) -> Option<RowAction> {
        self.action_for_shortcut(key.character?)
    }

    fn action_for_tap(&self, tap: &TapEvent) -> Option<RowAction> {
        if tap.phase != TapPhase::Completed {
            return None;
        }
        let shortcut = self
            .buttons
            .iter()
            .find(|b| b.contains(tap.location))
            .map(|b| b.value)?;
        self.action_for_shortcut(shortcut)
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
