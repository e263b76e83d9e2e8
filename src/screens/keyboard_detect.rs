//! Shown at startup and whenever the keyboard vanishes. Any keystroke
//! continues; tapping the exit button shuts the appliance down.

use tokio::sync::mpsc;

use super::{AppContext, ScreenTarget, StackBehavior, Verb};
use crate::display::WaveformMode;
use crate::geometry::{Point, Rect};
use crate::input::events::{Event, TapPhase};
use crate::render::{Alignment, Canvas};
use crate::screens::widgets::{BUTTON_FONT, BUTTON_SIZE, Button, SMALL_FONT, TITLE_FONT, UI_FONT};

pub struct KeyboardDetect {
    on_startup: bool,
    button: Button<()>,
}

impl KeyboardDetect {
    pub fn new(ctx: &AppContext, on_startup: bool) -> Self {
        let screen = ctx.screen_info.size;
        let origin = Point::new(
            (screen.width - BUTTON_SIZE.width) / 2,
            screen.height * 2 / 3,
        );
        Self {
            on_startup,
            button: Button::new(Rect::new(origin, BUTTON_SIZE), "Exit", ()),
        }
    }

    pub async fn run(
        &mut self,
        ctx: &mut AppContext,
        events: &mut mpsc::Receiver<Event>,
    ) -> anyhow::Result<Verb> {
        ctx.hardware.reset_keystream(false);
        ctx.hardware.reset_tapstream();
        ctx.display.set_waveform_mode(WaveformMode::Gc16);
        self.paint(ctx).await?;

        loop {
            match events.recv().await {
                Some(Event::Key(_)) => {
                    return Ok(if self.on_startup {
                        Verb::change(ScreenTarget::SystemMenu, StackBehavior::ReplaceAll)
                    } else {
                        Verb::Close
                    });
                }
                Some(Event::Tap(tap)) => {
                    if tap.phase == TapPhase::Completed && self.button.contains(tap.location) {
                        return Ok(Verb::Shutdown);
                    }
                }
                Some(Event::KeyboardDisconnect) => {}
                None => anyhow::bail!("event channel closed"),
            }
        }
    }

    async fn paint(&self, ctx: &mut AppContext) -> anyhow::Result<()> {
        let screen = ctx.screen_info.size;
        let mut canvas = Canvas::new(screen);

        let title = ctx.renderer.render_markup_aligned(
            "Tabula",
            TITLE_FONT,
            screen.width,
            Alignment::Center,
        )?;
        canvas.draw_text(Point::new(0, screen.height / 8), &title);

        let message = ctx.renderer.render_markup(
            "Connect a keyboard and press a key to continue, or tap the button to exit.",
            UI_FONT,
            screen.width - 100,
        )?;
        canvas.draw_text(Point::new(50, screen.height * 4 / 10), &message);

        self.button.render(&mut canvas, ctx.renderer.as_ref(), BUTTON_FONT)?;

        let footer_text = if self.on_startup {
            "Presented by Straylight Labs"
        } else {
            "Keyboard was disconnected"
        };
        let footer = ctx.renderer.render_markup_aligned(
            footer_text,
            SMALL_FONT,
            screen.width,
            Alignment::Center,
        )?;
        canvas.draw_text(Point::new(0, screen.height * 9 / 10), &footer);

        ctx.display
            .display_rendered(&canvas.into_rendered())
            .await?;
        Ok(())
    }
}
