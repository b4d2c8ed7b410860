//! Per-view state for one open note. The view controller owns a
//! `NoteSession` and hands it to every dispatcher call.

use shared::{
    domain::{LookAndFeel, NoteId, ParagraphId},
    error::ApiError,
    protocol::{InterpreterBinding, Note, Paragraph},
};
use tokio::sync::mpsc;

use crate::{bindings::InterpreterBindingModel, events::Scope};

pub(crate) type FetchResult = Result<Vec<InterpreterBinding>, ApiError>;

/// Binding fetches started in the background for this session. Results are
/// applied by the session owner in completion order.
#[derive(Debug)]
pub(crate) struct BindingRefreshes {
    pub(crate) done_tx: mpsc::UnboundedSender<FetchResult>,
    pub(crate) done_rx: mpsc::UnboundedReceiver<FetchResult>,
    pub(crate) pending: usize,
}

impl BindingRefreshes {
    fn new() -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            done_tx,
            done_rx,
            pending: 0,
        }
    }
}

#[derive(Debug)]
pub struct NoteSession {
    pub note_id: NoteId,
    pub note: Option<Note>,
    pub bindings: InterpreterBindingModel,
    pub editor_toggled: bool,
    pub table_toggled: bool,
    pub show_name_editor: bool,
    single_paragraph: Option<ParagraphId>,
    as_iframe: bool,
    pub(crate) refreshes: BindingRefreshes,
}

impl NoteSession {
    pub fn new(note_id: impl Into<NoteId>) -> Self {
        Self {
            note_id: note_id.into(),
            note: None,
            bindings: InterpreterBindingModel::default(),
            editor_toggled: false,
            table_toggled: false,
            show_name_editor: false,
            single_paragraph: None,
            as_iframe: false,
            refreshes: BindingRefreshes::new(),
        }
    }

    /// Restricts the view to a single paragraph, optionally embedded.
    pub fn with_single_paragraph(
        mut self,
        paragraph_id: impl Into<ParagraphId>,
        as_iframe: bool,
    ) -> Self {
        self.single_paragraph = Some(paragraph_id.into());
        self.as_iframe = as_iframe;
        self
    }

    pub fn single_paragraph(&self) -> Option<&ParagraphId> {
        self.single_paragraph.as_ref()
    }

    pub fn as_iframe(&self) -> bool {
        self.as_iframe
    }

    /// Binding fetches started by snapshots whose results are not applied yet.
    pub fn pending_binding_refreshes(&self) -> usize {
        self.refreshes.pending
    }

    pub fn paragraphs(&self) -> &[Paragraph] {
        self.note
            .as_ref()
            .map(|note| note.paragraphs.as_slice())
            .unwrap_or_default()
    }

    pub fn look_and_feel(&self) -> Option<LookAndFeel> {
        self.note.as_ref().and_then(|note| note.config.looknfeel)
    }

    pub fn is_view_only(&self) -> bool {
        self.note
            .as_ref()
            .is_some_and(|note| note.config.is_view_only())
    }

    pub fn is_note_running(&self) -> bool {
        self.paragraphs().iter().any(|p| p.status.is_active())
    }

    /// Applies incoming server fields to the local paragraph with the same
    /// ID. Client-only `view` state is kept.
    pub fn apply_paragraph_update(&mut self, incoming: &Paragraph) -> bool {
        let Some(local) = self
            .note
            .as_mut()
            .and_then(|note| note.paragraphs.iter_mut().find(|p| p.id == incoming.id))
        else {
            return false;
        };
        local.status = incoming.status;
        local.config = incoming.config.clone();
        local.extra = incoming.extra.clone();
        true
    }

    pub fn set_editor_hidden(&mut self, scope: &Scope, hidden: bool) {
        for paragraph in self.paragraphs_in_scope(scope) {
            paragraph.config.editor_hide = hidden;
        }
    }

    pub fn set_table_hidden(&mut self, scope: &Scope, hidden: bool) {
        for paragraph in self.paragraphs_in_scope(scope) {
            paragraph.config.table_hide = hidden;
        }
    }

    fn paragraphs_in_scope<'a>(
        &'a mut self,
        scope: &'a Scope,
    ) -> impl Iterator<Item = &'a mut Paragraph> + 'a {
        self.note
            .iter_mut()
            .flat_map(|note| note.paragraphs.iter_mut())
            .filter(move |p| match scope {
                Scope::All => true,
                Scope::One(id) => &p.id == id,
            })
    }
}

/// Narrows a snapshot to one paragraph for the single-paragraph view: the
/// editor is hidden and the result table shown.
pub fn narrow_to_paragraph(mut note: Note, paragraph_id: &ParagraphId) -> Note {
    let kept = note
        .paragraphs
        .drain(..)
        .find(|p| &p.id == paragraph_id)
        .map(|mut paragraph| {
            paragraph.config.editor_hide = true;
            paragraph.config.table_hide = false;
            paragraph
        });
    note.paragraphs = kept.into_iter().collect();
    note
}
