//! The app root: wires the device adapter, display, renderer, document, and
//! database together, then runs the dispatcher loop over the screen stack.
//!
//! Everything runs on one current-thread runtime inside a `LocalSet`; the
//! pipelines, device readers, the autosave ticker, and the active screen are
//! all cooperative tasks on it.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;

use crate::cli::Cli;
use crate::db::Db;
use crate::device::Hardware;
use crate::display::{Display, DummySink, FramebufferSink};
use crate::doc::DocumentModel;
use crate::geometry::Size;
use crate::render::TextRenderer;
use crate::render::pango::PangoRenderer;
use crate::screens::{AppContext, Screen, ScreenTarget, StackBehavior, Verb};
use crate::settings::Settings;

const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(5);

/// Panel geometry used when no real framebuffer is attached.
const FALLBACK_SCREEN: Size = Size {
    width: 1072,
    height: 1448,
};

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings =
        Settings::load(&cli.settings).context("settings are malformed; refusing to start")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .enable_io()
        .build()
        .context("could not build the event loop")?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run_app(settings))
}

async fn run_app(settings: Settings) -> anyhow::Result<()> {
    let db = Rc::new(Db::open(&settings.db_path).context("could not open the session store")?);
    let settings = Rc::new(settings);
    let document = Rc::new(RefCell::new(DocumentModel::new()));

    let (event_tx, mut event_rx) = mpsc::channel(16);
    let hardware = Hardware::new(event_tx, Rc::clone(&settings));

    // the fbink-backed sink is linked in on the device; elsewhere the dummy
    // sink keeps the whole stack runnable
    let sink: Box<dyn FramebufferSink> = Box::new(DummySink::new(FALLBACK_SCREEN, 300.0));
    let mut display = Display::new(sink);
    let screen_info = display.screen_info();
    hardware.configure_screen(&screen_info);
    hardware.start_input_tasks();

    let renderer: Rc<dyn TextRenderer> = Rc::new(PangoRenderer::new(screen_info.dpi));

    let autosave = tokio::task::spawn_local(autosave_task(
        Rc::clone(&document),
        Rc::clone(&db),
    ));

    display.clear().await?;
    let mut ctx = AppContext {
        settings,
        db,
        document,
        hardware,
        display,
        renderer,
        screen_info,
    };

    let mut stack = vec![
        Screen::create(ScreenTarget::SystemMenu, &ctx),
        Screen::create(ScreenTarget::KeyboardDetect { on_startup: true }, &ctx),
    ];

    let result = dispatch(&mut stack, &mut ctx, &mut event_rx).await;

    autosave.abort();
    ctx.hardware.shutdown();
    result
}

/// The dispatcher: run the top screen, interpret its verb, repeat.
async fn dispatch(
    stack: &mut Vec<Screen>,
    ctx: &mut AppContext,
    events: &mut mpsc::Receiver<crate::input::events::Event>,
) -> anyhow::Result<()> {
    loop {
        let Some(screen) = stack.last_mut() else {
            // a Close emptied the stack; fall back to the menu
            stack.push(Screen::create(ScreenTarget::SystemMenu, ctx));
            continue;
        };

        match screen.run(ctx, events).await? {
            Verb::Change { target, behavior } => {
                let next = Screen::create(target, ctx);
                match behavior {
                    StackBehavior::ReplaceAll => {
                        stack.clear();
                        stack.push(next);
                    }
                    StackBehavior::ReplaceLast => {
                        stack.pop();
                        stack.push(next);
                    }
                    StackBehavior::Append => stack.push(next),
                }
            }
            Verb::Close => {
                stack.pop();
            }
            Verb::Shutdown => {
                log::info!("shutting down");
                if let Err(err) = ctx.document.borrow_mut().save_session(&ctx.db) {
                    log::warn!("final save failed: {err}");
                }
                if let Err(err) = ctx.settings.save() {
                    log::warn!("could not save settings: {err}");
                }
                ctx.display.clear().await?;
                return Ok(());
            }
        }
    }
}

async fn autosave_task(document: Rc<RefCell<DocumentModel>>, db: Rc<Db>) {
    let mut ticker = tokio::time::interval(AUTOSAVE_INTERVAL);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(err) = document.borrow_mut().save_session(&db) {
            log::warn!("autosave failed: {err}");
        }
    }
}
