//! Static help pages. F-keys swap between general help and the compose
//! table; any other key returns to writing.

use tokio::sync::mpsc;

use super::{AppContext, ScreenTarget, StackBehavior, Verb};
use crate::geometry::Point;
use crate::input::events::Event;
use crate::input::keycode::KeyCode;
use crate::render::{Canvas, markup::escape_for_markup};
use crate::screens::widgets::SMALL_FONT;

const HELP_TEXT: &str = "\
<b>Tabula</b>

Type, and keep typing. The cursor stays at the end; \
there is no going back to fiddle.

<tt>Enter</tt>   start a new paragraph
<tt>Backspace</tt>   delete within the current paragraph
<tt>F1</tt>   this help
<tt>F12</tt>   system menu
<tt>compose, compose</tt>   sprint control

Paragraphs starting with # are session notes and are not counted.

Press any other key to return to your draft.";

async fn paint_page(ctx: &mut AppContext, markup: &str) -> anyhow::Result<()> {
    let screen = ctx.screen_info.size;
    let mut canvas = Canvas::new(screen);
    let body = ctx
        .renderer
        .render_markup(markup, SMALL_FONT, screen.width - 120)?;
    canvas.draw_text(Point::new(60, 60), &body);
    ctx.display
        .display_rendered(&canvas.into_rendered())
        .await?;
    Ok(())
}

async fn run_page(
    ctx: &mut AppContext,
    events: &mut mpsc::Receiver<Event>,
    markup: &str,
    other_page: ScreenTarget,
    other_key: KeyCode,
) -> anyhow::Result<Verb> {
    ctx.hardware.reset_keystream(false);
    ctx.hardware.reset_tapstream();
    ctx.display.save_screen();
    paint_page(ctx, markup).await?;

    let verb = loop {
        match events.recv().await {
            Some(Event::Key(key)) if key.is_modifier => {}
            Some(Event::Key(key)) if key.key == other_key => {
                break Verb::change(other_page, StackBehavior::ReplaceLast);
            }
            Some(Event::Key(key)) if key.key == KeyCode::KEY_F12 => {
                break Verb::change(ScreenTarget::SystemMenu, StackBehavior::ReplaceAll);
            }
            Some(Event::Key(_)) => break Verb::Close,
            Some(_) => {}
            None => anyhow::bail!("event channel closed"),
        }
    };
    if matches!(verb, Verb::Close) {
        ctx.display.restore_screen().await?;
    }
    Ok(verb)
}

pub struct Help;

impl Default for Help {
    fn default() -> Self {
        Self::new()
    }
}

impl Help {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(
        &mut self,
        ctx: &mut AppContext,
        events: &mut mpsc::Receiver<Event>,
    ) -> anyhow::Result<Verb> {
        run_page(
            ctx,
            events,
            HELP_TEXT,
            ScreenTarget::ComposeHelp,
            KeyCode::KEY_F2,
        )
        .await
    }
}

pub struct ComposeHelp;

impl Default for ComposeHelp {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposeHelp {
    pub fn new() -> Self {
        Self
    }

    fn make_markup(ctx: &AppContext) -> String {
        let mut lines = vec![
            "<b>Compose sequences</b>".to_string(),
            String::new(),
            "Tap the compose key, then type a sequence:".to_string(),
            String::new(),
        ];
        // show the table as configured, straight from the settings file
        for (sequence, output) in ctx.settings.raw_compose_sequences() {
            lines.push(format!(
                "<tt>{}</tt> → {}",
                escape_for_markup(sequence),
                escape_for_markup(output)
            ));
        }
        lines.push(String::new());
        lines.push("Press any other key to return to your draft.".to_string());
        lines.join("\n")
    }

    pub async fn run(
        &mut self,
        ctx: &mut AppContext,
        events: &mut mpsc::Receiver<Event>,
    ) -> anyhow::Result<Verb> {
        let markup = Self::make_markup(ctx);
        run_page(ctx, events, &markup, ScreenTarget::Help, KeyCode::KEY_F1).await
    }
}
