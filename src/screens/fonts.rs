//! Font menu: each drafting font renders its own row, so the choice is made
//! by eye.

use tokio::sync::mpsc;

use super::{AppContext, ScreenTarget, StackBehavior, Verb};
use crate::input::events::{AnnotatedKeyEvent, Event, TapEvent, TapPhase};
use crate::render::Canvas;
use crate::screens::widgets::{Button, button_column};

enum RowAction {
    Pick(usize),
    Back,
}

pub struct Fonts {
    buttons: Vec<Button<char>>,
    fonts: Vec<String>,
}

impl Default for Fonts {
    fn default() -> Self {
        Self::new()
    }
}

impl Fonts {
    pub fn new() -> Self {
        Self {
            buttons: Vec::new(),
            fonts: Vec::new(),
        }
    }

    fn make_buttons(&mut self, ctx: &AppContext) {
        self.fonts = ctx.settings.drafting_fonts.clone();
        let rects = button_column(ctx.screen_info.size, self.fonts.len() + 1);
        self.buttons = self
            .fonts
            .iter()
            .enumerate()
            .map(|(i, font)| {
                let shortcut = char::from_digit(i as u32 + 1, 10).unwrap_or('?');
                let mut button = Button::new(rects[i], format!("{shortcut} · {font}"), shortcut);
                button.selected = *font == ctx.settings.current_font;
                button
            })
            .collect();
        self.buttons
            .push(Button::new(rects[self.fonts.len()], "0 · Back", '0'));
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
            match action {
                Some(RowAction::Pick(index)) => {
                    let font = self.fonts[index].clone();
                    let updated = ctx.settings.with_current_font(&font)?;
                    ctx.update_settings(updated);
                    let target = if ctx.document.borrow().has_session() {
                        ScreenTarget::Drafting
                    } else {
                        ScreenTarget::SystemMenu
                    };
                    return Ok(Verb::change(target, StackBehavior::ReplaceAll));
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
                (index < self.fonts.len()).then_some(RowAction::Pick(index))
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
        for (i, button) in self.buttons.iter().enumerate() {
            // each font row previews itself; the back row uses the UI font
            let font_name = self.fonts.get(i).cloned();
            let font = match &font_name {
                Some(name) => format!("{name} 10"),
                None => crate::screens::widgets::BUTTON_FONT.to_string(),
            };
            button.render(&mut canvas, ctx.renderer.as_ref(), &font)?;
        }
        ctx.display
            .display_rendered(&canvas.into_rendered())
            .await?;
        Ok(())
    }
}
