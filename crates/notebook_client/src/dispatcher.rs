//! Turns user intents into outbound commands or local broadcasts, and is
//! the single handler for inbound note snapshots.

use std::sync::Arc;

use shared::{
    domain::{LookAndFeel, ParagraphId},
    protocol::{ClientCommand, Note, NoteConfig, ServerEvent},
};
use thiserror::Error;
use tokio::{
    runtime::Handle,
    sync::{
        broadcast,
        mpsc::{self, error::TrySendError},
    },
};
use tracing::{debug, error, info, warn};

use crate::{
    bindings::{BindingError, BindingsApi},
    config::Settings,
    events::{LocalEvent, Scope, UserPrompt},
    focus::{find_visible_sibling, FocusDirection},
    reconcile::{reconcile, ReconcileError, ReconcileReport},
    session::{narrow_to_paragraph, FetchResult, NoteSession},
};

const DELETE_NOTE_PROMPT: &str = "Do you want to delete this notebook?";
const RUN_NOTE_PROMPT: &str = "Run all paragraphs?";
const INSERT_AFTER_LAST_NOTICE: &str = "Cannot insert after the last paragraph.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// One command was queued for the transport.
    Sent,
    /// A local event was broadcast; nothing left the client.
    Broadcast,
    /// The user declined the confirmation.
    Declined,
    /// Nothing to do (unknown paragraph, index out of range, empty name).
    Skipped,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no note is loaded")]
    NoNote,
    #[error("cannot insert after the last paragraph")]
    InsertAfterLast,
    #[error("outbound command queue is full; dropped {op}")]
    QueueFull { op: &'static str },
    #[error("outbound command transport is closed; dropped {op}")]
    TransportClosed { op: &'static str },
}

pub struct CommandDispatcher {
    commands: mpsc::Sender<ClientCommand>,
    local_events: broadcast::Sender<LocalEvent>,
    prompt: Arc<dyn UserPrompt>,
    bindings_api: Arc<dyn BindingsApi>,
}

impl CommandDispatcher {
    pub fn new(
        commands: mpsc::Sender<ClientCommand>,
        local_events: broadcast::Sender<LocalEvent>,
        prompt: Arc<dyn UserPrompt>,
        bindings_api: Arc<dyn BindingsApi>,
    ) -> Self {
        Self {
            commands,
            local_events,
            prompt,
            bindings_api,
        }
    }

    /// Builds a dispatcher with fresh channels sized from `settings`; the
    /// returned receiver is the outbound side for the transport.
    pub fn with_settings(
        settings: &Settings,
        prompt: Arc<dyn UserPrompt>,
        bindings_api: Arc<dyn BindingsApi>,
    ) -> (Self, mpsc::Receiver<ClientCommand>) {
        let (commands, outbound) = mpsc::channel(settings.command_queue_capacity.max(1));
        let (local_events, _) = broadcast::channel(settings.event_capacity.max(1));
        (Self::new(commands, local_events, prompt, bindings_api), outbound)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LocalEvent> {
        self.local_events.subscribe()
    }

    /// Requests the initial snapshot for the session's note.
    pub fn open_note(&self, session: &NoteSession) -> Result<Outcome, DispatchError> {
        self.send(ClientCommand::GetNote {
            id: session.note_id.clone(),
        })
    }

    pub fn remove_note(&self, session: &NoteSession) -> Result<Outcome, DispatchError> {
        if !self.prompt.confirm(DELETE_NOTE_PROMPT) {
            return Ok(Outcome::Declined);
        }
        self.send(ClientCommand::DelNote {
            id: session.note_id.clone(),
        })
    }

    pub fn run_note(&self) -> Outcome {
        if !self.prompt.confirm(RUN_NOTE_PROMPT) {
            return Outcome::Declined;
        }
        self.broadcast(LocalEvent::RunAllParagraphs)
    }

    pub fn toggle_editor(&self, session: &mut NoteSession, scope: Scope) -> Outcome {
        let show = match &scope {
            Scope::All => {
                session.editor_toggled = !session.editor_toggled;
                session.editor_toggled
            }
            Scope::One(id) => match paragraph_config(session, id) {
                Some((editor_hide, _)) => editor_hide,
                None => return Outcome::Skipped,
            },
        };
        self.set_editor_visible(session, scope, show)
    }

    pub fn set_editor_visible(
        &self,
        session: &mut NoteSession,
        scope: Scope,
        show: bool,
    ) -> Outcome {
        session.set_editor_hidden(&scope, !show);
        if show {
            self.broadcast(LocalEvent::OpenEditor(scope))
        } else {
            self.broadcast(LocalEvent::CloseEditor(scope))
        }
    }

    pub fn toggle_table(&self, session: &mut NoteSession, scope: Scope) -> Outcome {
        let show = match &scope {
            Scope::All => {
                session.table_toggled = !session.table_toggled;
                session.table_toggled
            }
            Scope::One(id) => match paragraph_config(session, id) {
                Some((_, table_hide)) => table_hide,
                None => return Outcome::Skipped,
            },
        };
        self.set_table_visible(session, scope, show)
    }

    pub fn set_table_visible(
        &self,
        session: &mut NoteSession,
        scope: Scope,
        show: bool,
    ) -> Outcome {
        session.set_table_hidden(&scope, !show);
        if show {
            self.broadcast(LocalEvent::OpenTable(scope))
        } else {
            self.broadcast(LocalEvent::CloseTable(scope))
        }
    }

    /// Commits a new note name. An empty name closes the editor without
    /// sending anything.
    pub fn rename_note(
        &self,
        session: &mut NoteSession,
        name: &str,
    ) -> Result<Outcome, DispatchError> {
        session.show_name_editor = false;
        let name = name.trim();
        if name.is_empty() {
            return Ok(Outcome::Skipped);
        }
        let note = session.note.as_mut().ok_or(DispatchError::NoNote)?;
        note.name = name.to_string();
        self.send_note_update(note)
    }

    pub fn set_look_and_feel(
        &self,
        session: &mut NoteSession,
        value: LookAndFeel,
    ) -> Result<Outcome, DispatchError> {
        let note = session.note.as_mut().ok_or(DispatchError::NoNote)?;
        note.config.looknfeel = Some(value);
        self.send_note_update(note)
    }

    /// `None` or an empty expression clears the schedule.
    pub fn set_cron_schedule(
        &self,
        session: &mut NoteSession,
        expr: Option<&str>,
    ) -> Result<Outcome, DispatchError> {
        let note = session.note.as_mut().ok_or(DispatchError::NoNote)?;
        note.config.cron = expr.filter(|e| !e.is_empty()).map(str::to_string);
        self.send_note_update(note)
    }

    /// Sends the current config, replacing it first when one is given.
    pub fn set_config(
        &self,
        session: &mut NoteSession,
        config: Option<NoteConfig>,
    ) -> Result<Outcome, DispatchError> {
        let note = session.note.as_mut().ok_or(DispatchError::NoNote)?;
        if let Some(config) = config {
            note.config = config;
        }
        self.send_note_update(note)
    }

    pub fn move_paragraph(
        &self,
        session: &NoteSession,
        id: &ParagraphId,
        direction: MoveDirection,
    ) -> Result<Outcome, DispatchError> {
        let paragraphs = session.paragraphs();
        let Some(current) = paragraphs.iter().position(|p| &p.id == id) else {
            return Ok(Outcome::Skipped);
        };
        let target = match direction {
            MoveDirection::Up => current.checked_sub(1),
            MoveDirection::Down => Some(current + 1).filter(|i| *i < paragraphs.len()),
        };
        let Some(index) = target else {
            return Ok(Outcome::Skipped);
        };
        self.send(ClientCommand::MoveParagraph {
            id: id.clone(),
            index,
        })
    }

    /// Asks the backend for a new paragraph right after `id`. The protocol
    /// has no append, so the last paragraph is refused with a notice.
    pub fn insert_paragraph_after(
        &self,
        session: &NoteSession,
        id: &ParagraphId,
    ) -> Result<Outcome, DispatchError> {
        let paragraphs = session.paragraphs();
        let Some(current) = paragraphs.iter().position(|p| &p.id == id) else {
            return Ok(Outcome::Skipped);
        };
        let index = current + 1;
        if index == paragraphs.len() {
            self.prompt.notify(INSERT_AFTER_LAST_NOTICE);
            return Err(DispatchError::InsertAfterLast);
        }
        self.send(ClientCommand::InsertParagraph { index })
    }

    pub fn move_focus(
        &self,
        session: &NoteSession,
        from: &ParagraphId,
        direction: FocusDirection,
    ) -> Outcome {
        match find_visible_sibling(session.paragraphs(), from, direction) {
            Some(target) => self.broadcast(LocalEvent::FocusParagraph(target.clone())),
            None => Outcome::Skipped,
        }
    }

    /// Inbound sink for a full note snapshot.
    ///
    /// Reconciles the local note, forwards per-paragraph updates and settles
    /// the look-and-feel without suspending. The interpreter binding refresh
    /// is started in the background; its result is applied by
    /// [`run_inbound`](Self::run_inbound) or
    /// [`settle_bindings`](Self::settle_bindings). A rejected snapshot stops
    /// before any of the follow-up steps.
    pub fn on_note_replaced(
        &self,
        session: &mut NoteSession,
        incoming: Note,
    ) -> Result<ReconcileReport, ReconcileError> {
        let incoming = match session.single_paragraph() {
            Some(paragraph_id) => {
                let narrowed = narrow_to_paragraph(incoming, paragraph_id);
                self.broadcast(LocalEvent::SetIframe(session.as_iframe()));
                narrowed
            }
            None => incoming,
        };

        let report = reconcile(&mut session.note, incoming)?;

        for paragraph in &report.updated {
            session.apply_paragraph_update(paragraph);
            self.broadcast(LocalEvent::UpdateParagraph(paragraph.clone()));
        }

        self.initialize_look_and_feel(session);
        self.spawn_binding_refresh(session);
        Ok(report)
    }

    pub fn handle_server_event(&self, session: &mut NoteSession, event: ServerEvent) {
        match event {
            ServerEvent::NoteContentReplaced { note } => {
                if let Err(err) = self.on_note_replaced(session, note) {
                    warn!(note_id = %session.note_id, error = %err, "note snapshot rejected");
                }
            }
            ServerEvent::Error(err) => {
                error!(code = ?err.code, status = ?err.status, message = %err.message, "server reported an error");
            }
        }
    }

    /// Drains inbound events in arrival order until the sender side closes.
    /// Binding refreshes are applied as they complete, between events.
    pub async fn run_inbound(
        &self,
        session: &mut NoteSession,
        mut events: mpsc::Receiver<ServerEvent>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_server_event(session, event),
                    None => break,
                },
                Some(result) = session.refreshes.done_rx.recv() => {
                    self.apply_binding_refresh(session, result);
                }
            }
        }
        info!(
            note_id = %session.note_id,
            pending_binding_refreshes = session.refreshes.pending,
            "inbound event stream closed"
        );
    }

    /// Waits for every outstanding binding refresh and applies the results in
    /// completion order.
    pub async fn settle_bindings(&self, session: &mut NoteSession) {
        while session.refreshes.pending > 0 {
            let Some(result) = session.refreshes.done_rx.recv().await else {
                break;
            };
            self.apply_binding_refresh(session, result);
        }
    }

    pub async fn open_settings(&self, session: &mut NoteSession) -> Result<(), BindingError> {
        session
            .bindings
            .open(self.bindings_api.as_ref(), &session.note_id)
            .await
    }

    pub fn close_settings(&self, session: &mut NoteSession) -> bool {
        session.bindings.close(self.prompt.as_ref())
    }

    /// Returns whether the panel is shown afterwards.
    pub async fn toggle_settings(&self, session: &mut NoteSession) -> Result<bool, BindingError> {
        session
            .bindings
            .toggle(
                self.bindings_api.as_ref(),
                &session.note_id,
                self.prompt.as_ref(),
            )
            .await
    }

    pub async fn save_settings(&self, session: &mut NoteSession) -> Result<(), BindingError> {
        session
            .bindings
            .save(self.bindings_api.as_ref(), &session.note_id)
            .await
    }

    fn spawn_binding_refresh(&self, session: &mut NoteSession) {
        let Ok(runtime) = Handle::try_current() else {
            debug!(note_id = %session.note_id, "no async runtime; binding refresh skipped");
            return;
        };
        let api = Arc::clone(&self.bindings_api);
        let note_id = session.note_id.clone();
        let done = session.refreshes.done_tx.clone();
        session.refreshes.pending += 1;
        runtime.spawn(async move {
            let result = api.fetch_bindings(&note_id).await;
            if done.send(result).is_err() {
                debug!(note_id = %note_id, "session dropped before binding refresh completed");
            }
        });
    }

    /// Last completed fetch wins; the list is replaced wholesale.
    fn apply_binding_refresh(&self, session: &mut NoteSession, result: FetchResult) {
        session.refreshes.pending = session.refreshes.pending.saturating_sub(1);
        match session.bindings.apply_fetch(&session.note_id, result) {
            Ok(()) => {
                session.bindings.default_select_if_none_selected();
            }
            Err(err) => {
                debug!(note_id = %session.note_id, error = %err, "binding refresh skipped");
            }
        }
    }

    fn initialize_look_and_feel(&self, session: &mut NoteSession) {
        let Some(note) = session.note.as_mut() else {
            return;
        };
        let value = *note.config.looknfeel.get_or_insert(LookAndFeel::Default);
        self.broadcast(LocalEvent::SetLookAndFeel(value));
    }

    fn send_note_update(&self, note: &Note) -> Result<Outcome, DispatchError> {
        self.send(ClientCommand::NoteUpdate {
            id: note.id.clone(),
            name: note.name.clone(),
            config: note.config.clone(),
        })
    }

    fn send(&self, cmd: ClientCommand) -> Result<Outcome, DispatchError> {
        let op = cmd.op();
        match self.commands.try_send(cmd) {
            Ok(()) => {
                debug!(op, "queued outbound command");
                Ok(Outcome::Sent)
            }
            Err(TrySendError::Full(_)) => Err(DispatchError::QueueFull { op }),
            Err(TrySendError::Closed(_)) => Err(DispatchError::TransportClosed { op }),
        }
    }

    fn broadcast(&self, event: LocalEvent) -> Outcome {
        let name = event.name();
        if self.local_events.send(event).is_err() {
            debug!(event = name, "no local subscribers");
        }
        Outcome::Broadcast
    }
}

fn paragraph_config(session: &NoteSession, id: &ParagraphId) -> Option<(bool, bool)> {
    session
        .paragraphs()
        .iter()
        .find(|p| &p.id == id)
        .map(|p| (p.config.editor_hide, p.config.table_hide))
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
