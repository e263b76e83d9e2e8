//! Modal dialogs: appended to the screen stack, they deliver their answer
//! through a one-shot channel and close. The display content underneath is
//! saved on entry and restored on exit, so the caller never repaints.

use tokio::sync::{mpsc, oneshot};

use super::{AppContext, Verb};
use crate::geometry::{Point, Rect};
use crate::input::events::{Event, TapPhase};
use crate::input::keycode::KeyCode;
use crate::render::{Alignment, Canvas, markup::escape_for_markup};
use crate::screens::widgets::{BUTTON_FONT, BUTTON_SIZE, Button, TITLE_FONT, UI_FONT};

async fn paint_message(
    ctx: &mut AppContext,
    message: &str,
    buttons: &[&Button<bool>],
) -> anyhow::Result<()> {
    let screen = ctx.screen_info.size;
    let mut canvas = Canvas::new(screen);

    let title = ctx.renderer.render_markup_aligned(
        "Tabula",
        TITLE_FONT,
        screen.width,
        Alignment::Center,
    )?;
    canvas.draw_text(Point::new(0, screen.height / 8), &title);

    let body = ctx.renderer.render_markup_aligned(
        &escape_for_markup(message),
        UI_FONT,
        screen.width,
        Alignment::Center,
    )?;
    canvas.draw_text(Point::new(0, screen.height * 4 / 10), &body);

    for button in buttons {
        button.render(&mut canvas, ctx.renderer.as_ref(), BUTTON_FONT)?;
    }
    ctx.display
        .display_rendered(&canvas.into_rendered())
        .await?;
    Ok(())
}

/// One message, one button.
pub struct OkDialog {
    message: String,
    button: Button<bool>,
}

impl OkDialog {
    pub fn new(ctx: &AppContext, message: String) -> Self {
        let screen = ctx.screen_info.size;
        let origin = Point::new(
            (screen.width - BUTTON_SIZE.width) / 2,
            screen.height * 2 / 3,
        );
        Self {
            message,
            button: Button::new(Rect::new(origin, BUTTON_SIZE), "OK", true),
        }
    }

    pub async fn run(
        &mut self,
        ctx: &mut AppContext,
        events: &mut mpsc::Receiver<Event>,
    ) -> anyhow::Result<Verb> {
        ctx.hardware.reset_keystream(false);
        ctx.hardware.reset_tapstream();
        ctx.display.save_screen();
        paint_message(ctx, &self.message, &[&self.button]).await?;

        loop {
            match events.recv().await {
                Some(Event::Key(key)) if key.key == KeyCode::KEY_ENTER => break,
                Some(Event::Tap(tap))
                    if tap.phase == TapPhase::Completed && self.button.contains(tap.location) =>
                {
                    break;
                }
                Some(_) => {}
                None => anyhow::bail!("event channel closed"),
            }
        }
        ctx.display.restore_screen().await?;
        Ok(Verb::Close)
    }
}

/// A question with No and Yes buttons; answers through the reply channel.
pub struct YesNoDialog {
    message: String,
    no: Button<bool>,
    yes: Button<bool>,
    reply: Option<oneshot::Sender<bool>>,
}

impl YesNoDialog {
    pub fn new(ctx: &AppContext, message: String, reply: oneshot::Sender<bool>) -> Self {
        let screen = ctx.screen_info.size;
        let y = screen.height * 2 / 3;
        Self {
            message,
            no: Button::new(
                Rect::new(Point::new(100, y), BUTTON_SIZE),
                "No",
                false,
            ),
            yes: Button::new(
                Rect::new(
                    Point::new(screen.width - BUTTON_SIZE.width - 100, y),
                    BUTTON_SIZE,
                ),
                "Yes",
                true,
            ),
            reply: Some(reply),
        }
    }

    pub async fn run(
        &mut self,
        ctx: &mut AppContext,
        events: &mut mpsc::Receiver<Event>,
    ) -> anyhow::Result<Verb> {
        ctx.hardware.reset_keystream(false);
        ctx.hardware.reset_tapstream();
        ctx.display.save_screen();
        paint_message(ctx, &self.message, &[&self.no, &self.yes]).await?;

        let answer = loop {
            match events.recv().await {
                Some(Event::Key(key)) => match key.character {
                    Some('y') | Some('Y') => break true,
                    Some('n') | Some('N') => break false,
                    _ => {}
                },
                Some(Event::Tap(tap)) if tap.phase == TapPhase::Completed => {
                    if self.yes.contains(tap.location) {
                        break true;
                    }
                    if self.no.contains(tap.location) {
                        break false;
                    }
                }
                Some(_) => {}
                None => anyhow::bail!("event channel closed"),
            }
        };
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(answer);
        }
        ctx.display.restore_screen().await?;
        Ok(Verb::Close)
    }
}
