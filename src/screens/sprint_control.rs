//! Sprint control dialog: pick a length and begin, or end the running
//! sprint. Opened from the drafting screen by double-tapping compose.

use tokio::sync::{mpsc, oneshot};

use super::{AppContext, SprintOutcome, Verb};
use crate::durations::{format_duration, timer_display};
use crate::geometry::{Point, Rect, Size};
use crate::input::events::{Event, TapPhase};
use crate::input::keycode::KeyCode;
use crate::render::{Alignment, Canvas};
use crate::screens::widgets::{BUTTON_FONT, BUTTON_SIZE, Button, UI_FONT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tap {
    Length(usize),
    Begin,
    End,
    Cancel,
}

pub struct SprintControl {
    lengths: Vec<std::time::Duration>,
    selected: Option<usize>,
    length_buttons: Vec<Button<Tap>>,
    action_buttons: Vec<Button<Tap>>,
    reply: Option<oneshot::Sender<SprintOutcome>>,
}

impl SprintControl {
    pub fn new(ctx: &AppContext, reply: oneshot::Sender<SprintOutcome>) -> Self {
        Self {
            lengths: ctx.settings.sprint_lengths.clone(),
            selected: None,
            length_buttons: Vec::new(),
            action_buttons: Vec::new(),
            reply: Some(reply),
        }
    }

    fn make_buttons(&mut self, ctx: &AppContext) {
        let screen = ctx.screen_info.size;
        let has_sprint = ctx.document.borrow().has_sprint();

        self.length_buttons.clear();
        if !has_sprint {
            let size = Size::new(120, 120);
            let between = 40;
            let total = self.lengths.len() as i32 * (size.width + between) - between;
            let mut x = (screen.width - total).max(0) / 2;
            for (i, length) in self.lengths.iter().enumerate() {
                let mut button = Button::new(
                    Rect::new(Point::new(x, screen.height * 45 / 100), size),
                    format_duration(*length),
                    Tap::Length(i),
                );
                button.selected = self.selected == Some(i);
                self.length_buttons.push(button);
                x += size.width + between;
            }
        }

        let button_x = (screen.width - BUTTON_SIZE.width) / 2;
        self.action_buttons.clear();
        if has_sprint {
            self.action_buttons.push(Button::new(
                Rect::new(Point::new(button_x, screen.height * 60 / 100), BUTTON_SIZE),
                "End Sprint",
                Tap::End,
            ));
        } else {
            self.action_buttons.push(Button::new(
                Rect::new(Point::new(button_x, screen.height * 60 / 100), BUTTON_SIZE),
                "Begin Sprint",
                Tap::Begin,
            ));
        }
        self.action_buttons.push(Button::new(
            Rect::new(Point::new(button_x, screen.height * 72 / 100), BUTTON_SIZE),
            "Cancel",
            Tap::Cancel,
        ));
    }

    pub async fn run(
        &mut self,
        ctx: &mut AppContext,
        events: &mut mpsc::Receiver<Event>,
    ) -> anyhow::Result<Verb> {
        ctx.hardware.reset_keystream(false);
        ctx.hardware.reset_tapstream();
        ctx.display.save_screen();

        let outcome = loop {
            self.make_buttons(ctx);
            self.paint(ctx).await?;

            let tapped = loop {
                match events.recv().await {
                    Some(Event::Key(key)) if key.key == KeyCode::KEY_ESC => break Tap::Cancel,
                    Some(Event::Tap(tap)) if tap.phase == TapPhase::Completed => {
                        let hit = self
                            .length_buttons
                            .iter()
                            .chain(&self.action_buttons)
                            .find(|b| b.contains(tap.location))
                            .map(|b| b.value);
                        if let Some(hit) = hit {
                            break hit;
                        }
                    }
                    Some(_) => {}
                    None => anyhow::bail!("event channel closed"),
                }
            };

            match tapped {
                Tap::Length(index) => {
                    self.selected = Some(index);
                    // repaint with the new selection
                }
                Tap::Begin => {
                    if let Some(index) = self.selected {
                        break SprintOutcome::Begin(self.lengths[index]);
                    }
                }
                Tap::End => break SprintOutcome::End,
                Tap::Cancel => break SprintOutcome::Cancel,
            }
        };

        if let Some(reply) = self.reply.take() {
            let _ = reply.send(outcome);
        }
        ctx.display.restore_screen().await?;
        Ok(Verb::Close)
    }

    async fn paint(&self, ctx: &mut AppContext) -> anyhow::Result<()> {
        let screen = ctx.screen_info.size;
        let mut canvas = Canvas::new(screen);

        let header = {
            let document = ctx.document.borrow();
            match document.sprint() {
                Some(sprint) => format!(
                    "Sprint running — {} left",
                    timer_display(sprint.remaining())
                ),
                None => "Start a sprint?".to_string(),
            }
        };
        let header = ctx.renderer.render_markup_aligned(
            &header,
            UI_FONT,
            screen.width,
            Alignment::Center,
        )?;
        canvas.draw_text(Point::new(0, screen.height / 4), &header);

        for button in self.length_buttons.iter().chain(&self.action_buttons) {
            button.render(&mut canvas, ctx.renderer.as_ref(), BUTTON_FONT)?;
        }
        ctx.display
            .display_rendered(&canvas.into_rendered())
            .await?;
        Ok(())
    }
}
