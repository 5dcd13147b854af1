//! Companion session controller.
//!
//! One tokio task owns the session state, the dispatcher and the auto-trigger scheduler;
//! everything that mutates the session runs on that task, so no locks are needed. Callers
//! talk to it through a cloneable [`CompanionHandle`] and observe it through a `watch`
//! channel carrying [`CompanionView`] snapshots.

use crate::backend::Transport;
use crate::checkin::CheckinSnapshot;
use crate::config::Config;
use crate::dispatch::{DispatchKind, DispatchUpdate, Dispatcher};
use crate::scheduler::AutoTrigger;
use crate::session::{SessionState, SessionView};
use crate::suggest::{suggest, Prompt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// What the renderer sees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanionView {
    pub session: SessionView,
    pub checkin: CheckinSnapshot,
    pub suggestions: Vec<Prompt>,
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("companion session has shut down")]
    Closed,
}

#[derive(Debug)]
enum Command {
    Send(String),
    UpdateCheckin(CheckinSnapshot),
    Shutdown,
}

/// Handle to a running session. Dropping every handle tears the session down.
#[derive(Clone)]
pub struct CompanionHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<CompanionView>,
}

impl CompanionHandle {
    /// Send a user message. Blank input is ignored.
    pub fn send_message(&self, text: impl Into<String>) -> Result<(), ControllerError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Ok(());
        }
        self.command(Command::Send(text))
    }

    /// Report the caregiver's current check-in.
    pub fn update_checkin(&self, checkin: CheckinSnapshot) -> Result<(), ControllerError> {
        self.command(Command::UpdateCheckin(checkin))
    }

    /// Cancel any turn in flight, clear the debounce timer and stop the session.
    pub fn shutdown(&self) -> Result<(), ControllerError> {
        self.command(Command::Shutdown)
    }

    /// Latest snapshot.
    pub fn view(&self) -> CompanionView {
        self.view.borrow().clone()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<CompanionView> {
        self.view.clone()
    }

    fn command(&self, cmd: Command) -> Result<(), ControllerError> {
        self.commands.send(cmd).map_err(|_| ControllerError::Closed)
    }
}

/// Start a session on the current tokio runtime.
pub fn spawn_session(
    config: &Config,
    transport: Arc<dyn Transport>,
) -> (CompanionHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (update_tx, update_rx) = mpsc::unbounded_channel();
    let initial = CompanionView {
        suggestions: suggest(&CheckinSnapshot::default()),
        ..CompanionView::default()
    };
    let (view_tx, view_rx) = watch::channel(initial);
    let controller = Controller {
        id: format!("companion-{}", uuid::Uuid::new_v4()),
        state: SessionState::new(),
        checkin: CheckinSnapshot::default(),
        dispatcher: Dispatcher::new(transport, config, update_tx),
        scheduler: AutoTrigger::new(config.session.checkin_debounce()),
        commands: command_rx,
        updates: update_rx,
        view: view_tx,
    };
    let task = tokio::spawn(controller.run());
    (
        CompanionHandle {
            commands: command_tx,
            view: view_rx,
        },
        task,
    )
}

struct Controller {
    id: String,
    state: SessionState,
    checkin: CheckinSnapshot,
    dispatcher: Dispatcher,
    scheduler: AutoTrigger,
    commands: mpsc::UnboundedReceiver<Command>,
    updates: mpsc::UnboundedReceiver<DispatchUpdate>,
    view: watch::Sender<CompanionView>,
}

impl Controller {
    async fn run(mut self) {
        log::info!("{}: started", self.id);
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(update) = self.updates.recv() => {
                    if self.dispatcher.handle(&mut self.state, update) {
                        self.publish();
                    }
                }
                trigger = self.scheduler.due() => {
                    log::debug!("{}: check-in settled, sending update turn", self.id);
                    self.dispatch(DispatchKind::SystemTrigger(trigger));
                }
            }
        }
        self.dispatcher.cancel();
        self.scheduler.clear();
        log::info!("{}: stopped", self.id);
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Send(text) => self.dispatch(DispatchKind::UserMessage(text)),
            Command::UpdateCheckin(checkin) => {
                self.checkin = checkin.clamped();
                if let Some(trigger) = self.scheduler.observe(&self.checkin) {
                    log::debug!("{}: first check-in, sending greeting", self.id);
                    self.dispatch(DispatchKind::SystemTrigger(trigger));
                } else {
                    self.publish();
                }
            }
            Command::Shutdown => {}
        }
    }

    fn dispatch(&mut self, kind: DispatchKind) {
        self.dispatcher.dispatch(&mut self.state, &self.checkin, kind);
        self.publish();
    }

    fn publish(&self) {
        self.view.send_replace(CompanionView {
            session: self.state.view(),
            checkin: self.checkin,
            suggestions: suggest(&self.checkin),
        });
    }
}
