//! The screen set and the verbs screens answer the dispatcher with.
//!
//! A screen is a variant of [`Screen`] with an async `run` that consumes
//! events until it has an answer: switch somewhere else, close, or shut the
//! appliance down. Dialogs are ordinary screens that additionally carry a
//! one-shot result channel; they are appended to the stack and the caller
//! awaits the result when control comes back.

pub mod dialogs;
pub mod drafting;
pub mod fonts;
pub mod help;
pub mod keyboard_detect;
pub mod session_actions;
pub mod session_list;
pub mod sprint_control;
pub mod system_menu;
pub mod widgets;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::db::Db;
use crate::device::Hardware;
use crate::display::DynDisplay;
use crate::doc::{DocumentModel, Session};
use crate::geometry::ScreenInfo;
use crate::input::events::Event;
use crate::render::TextRenderer;
use crate::settings::Settings;

/// Everything a screen needs, owned by the app root.
pub struct AppContext {
    pub settings: Rc<Settings>,
    pub db: Rc<Db>,
    pub document: Rc<RefCell<DocumentModel>>,
    pub hardware: Rc<Hardware>,
    pub display: DynDisplay,
    pub renderer: Rc<dyn TextRenderer>,
    pub screen_info: ScreenInfo,
}

impl AppContext {
    /// Swaps in a new immutable settings record and lets the adapter know.
    pub fn update_settings(&mut self, settings: Settings) {
        let settings = Rc::new(settings);
        self.hardware.set_settings(Rc::clone(&settings));
        self.settings = settings;
    }
}

/// How a screen change manipulates the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackBehavior {
    ReplaceAll,
    ReplaceLast,
    Append,
}

/// What the sprint dialog resolved to.
#[derive(Debug)]
pub enum SprintOutcome {
    Begin(Duration),
    End,
    Cancel,
}

/// Construction request for the next screen.
pub enum ScreenTarget {
    KeyboardDetect { on_startup: bool },
    SystemMenu,
    SessionList,
    SessionActions { session: Session },
    Fonts,
    Drafting,
    Help,
    ComposeHelp,
    SprintControl { reply: oneshot::Sender<SprintOutcome> },
    OkDialog { message: String },
    YesNoDialog { message: String, reply: oneshot::Sender<bool> },
}

/// A screen's answer to the dispatcher.
pub enum Verb {
    Change {
        target: ScreenTarget,
        behavior: StackBehavior,
    },
    Close,
    Shutdown,
}

impl Verb {
    pub fn change(target: ScreenTarget, behavior: StackBehavior) -> Self {
        Self::Change { target, behavior }
    }
}

pub enum Screen {
    KeyboardDetect(keyboard_detect::KeyboardDetect),
    SystemMenu(system_menu::SystemMenu),
    SessionList(session_list::SessionList),
    SessionActions(session_actions::SessionActions),
    Fonts(fonts::Fonts),
    Drafting(drafting::Drafting),
    Help(help::Help),
    ComposeHelp(help::ComposeHelp),
    OkDialog(dialogs::OkDialog),
    YesNoDialog(dialogs::YesNoDialog),
    SprintControl(sprint_control::SprintControl),
}

impl Screen {
    pub fn create(target: ScreenTarget, ctx: &AppContext) -> Self {
        match target {
            ScreenTarget::KeyboardDetect { on_startup } => Self::KeyboardDetect(
                keyboard_detect::KeyboardDetect::new(ctx, on_startup),
            ),
            ScreenTarget::SystemMenu => Self::SystemMenu(system_menu::SystemMenu::new()),
            ScreenTarget::SessionList => Self::SessionList(session_list::SessionList::new()),
            ScreenTarget::SessionActions { session } => {
                Self::SessionActions(session_actions::SessionActions::new(session))
            }
            ScreenTarget::Fonts => Self::Fonts(fonts::Fonts::new()),
            ScreenTarget::Drafting => Self::Drafting(drafting::Drafting::new(ctx)),
            ScreenTarget::Help => Self::Help(help::Help::new()),
            ScreenTarget::ComposeHelp => Self::ComposeHelp(help::ComposeHelp::new()),
            ScreenTarget::SprintControl { reply } => {
                Self::SprintControl(sprint_control::SprintControl::new(ctx, reply))
            }
            ScreenTarget::OkDialog { message } => {
                Self::OkDialog(dialogs::OkDialog::new(ctx, message))
            }
            ScreenTarget::YesNoDialog { message, reply } => {
                Self::YesNoDialog(dialogs::YesNoDialog::new(ctx, message, reply))
            }
        }
    }

    /// Runs the screen until it yields a verb. Only the top of the stack is
    /// ever running, so it has the event receiver to itself.
    pub async fn run(
        &mut self,
        ctx: &mut AppContext,
        events: &mut mpsc::Receiver<Event>,
    ) -> anyhow::Result<Verb> {
        match self {
            Self::KeyboardDetect(screen) => screen.run(ctx, events).await,
            Self::SystemMenu(screen) => screen.run(ctx, events).await,
            Self::SessionList(screen) => screen.run(ctx, events).await,
            Self::SessionActions(screen) => screen.run(ctx, events).await,
            Self::Fonts(screen) => screen.run(ctx, events).await,
            Self::Drafting(screen) => screen.run(ctx, events).await,
            Self::Help(screen) => screen.run(ctx, events).await,
            Self::ComposeHelp(screen) => screen.run(ctx, events).await,
            Self::OkDialog(screen) => screen.run(ctx, events).await,
            Self::YesNoDialog(screen) => screen.run(ctx, events).await,
            Self::SprintControl(screen) => screen.run(ctx, events).await,
        }
    }
}
