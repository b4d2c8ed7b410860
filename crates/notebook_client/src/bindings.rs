//! Interpreter bindings attached to a note, plus the settings panel state.
//!
//! The list is replaced wholesale on every fetch and a copy of the fetched
//! list is kept as the baseline for dirty checks.

use std::collections::HashSet;

use async_trait::async_trait;
use shared::{
    domain::{BindingId, NoteId},
    error::{ApiError, ApiException, ErrorCode},
    protocol::InterpreterBinding,
};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::events::UserPrompt;

const DISCARD_CHANGES_PROMPT: &str = "Changes will be discarded";

#[async_trait]
pub trait BindingsApi: Send + Sync {
    async fn fetch_bindings(&self, note_id: &NoteId) -> Result<Vec<InterpreterBinding>, ApiError>;
    async fn save_bindings(&self, note_id: &NoteId, selected: &[BindingId]) -> Result<(), ApiError>;
}

pub struct MissingBindingsApi;

#[async_trait]
impl BindingsApi for MissingBindingsApi {
    async fn fetch_bindings(&self, note_id: &NoteId) -> Result<Vec<InterpreterBinding>, ApiError> {
        Err(ApiError::new(
            ErrorCode::Transport,
            format!("binding endpoint unavailable for note {note_id}"),
        ))
    }

    async fn save_bindings(&self, note_id: &NoteId, _selected: &[BindingId]) -> Result<(), ApiError> {
        Err(ApiError::new(
            ErrorCode::Transport,
            format!("binding endpoint unavailable for note {note_id}"),
        ))
    }
}

#[derive(Debug, Error)]
pub enum BindingError {
    #[error("failed to fetch interpreter bindings: {0}")]
    Fetch(ApiException),
    #[error("failed to save interpreter bindings: {0}")]
    Save(ApiException),
}

#[derive(Debug, Clone, Default)]
pub struct InterpreterBindingModel {
    bindings: Vec<InterpreterBinding>,
    original: Vec<InterpreterBinding>,
    show_settings: bool,
}

impl InterpreterBindingModel {
    pub fn bindings(&self) -> &[InterpreterBinding] {
        &self.bindings
    }

    pub fn show_settings(&self) -> bool {
        self.show_settings
    }

    /// Installs a freshly fetched list and resets the dirty baseline.
    pub fn replace(&mut self, bindings: Vec<InterpreterBinding>) {
        self.original = bindings.clone();
        self.bindings = bindings;
    }

    pub async fn fetch(
        &mut self,
        api: &dyn BindingsApi,
        note_id: &NoteId,
    ) -> Result<&[InterpreterBinding], BindingError> {
        let result = api.fetch_bindings(note_id).await;
        self.apply_fetch(note_id, result)?;
        Ok(self.bindings.as_slice())
    }

    /// Installs the outcome of a fetch that completed elsewhere. A failed
    /// fetch leaves the current list untouched.
    pub fn apply_fetch(
        &mut self,
        note_id: &NoteId,
        result: Result<Vec<InterpreterBinding>, ApiError>,
    ) -> Result<(), BindingError> {
        match result {
            Ok(bindings) => {
                debug!(note_id = %note_id, count = bindings.len(), "interpreter bindings fetched");
                self.replace(bindings);
                Ok(())
            }
            Err(err) => {
                error!(note_id = %note_id, status = ?err.status, message = %err.message, "interpreter binding fetch failed");
                Err(BindingError::Fetch(err.into()))
            }
        }
    }

    /// When nothing is selected, selects the first binding of every group and
    /// opens the settings panel. Returns whether a default was applied.
    pub fn default_select_if_none_selected(&mut self) -> bool {
        if self.bindings.iter().any(|b| b.selected) {
            return false;
        }

        let mut seen_groups = HashSet::new();
        for binding in &mut self.bindings {
            if seen_groups.insert(binding.group.clone()) {
                binding.selected = true;
            }
        }
        self.show_settings = true;
        info!(groups = seen_groups.len(), "applied default interpreter selection");
        true
    }

    pub fn set_selected(&mut self, id: &BindingId, selected: bool) -> bool {
        match self.bindings.iter_mut().find(|b| &b.id == id) {
            Some(binding) => {
                binding.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Moves a binding to a new position; order is the interpreter priority.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        if from >= self.bindings.len() || to >= self.bindings.len() {
            return false;
        }
        let binding = self.bindings.remove(from);
        self.bindings.insert(to, binding);
        true
    }

    pub fn selected_ids(&self) -> Vec<BindingId> {
        self.bindings
            .iter()
            .filter(|b| b.selected)
            .map(|b| b.id.clone())
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.bindings != self.original
    }

    pub async fn open(
        &mut self,
        api: &dyn BindingsApi,
        note_id: &NoteId,
    ) -> Result<(), BindingError> {
        self.show_settings = true;
        self.fetch(api, note_id).await.map(|_| ())
    }

    /// Hides the panel. Unsaved edits need the user's consent; returns
    /// `false` when they declined and the panel stays open.
    pub fn close(&mut self, prompt: &dyn UserPrompt) -> bool {
        if self.is_dirty() && !prompt.confirm(DISCARD_CHANGES_PROMPT) {
            return false;
        }
        self.show_settings = false;
        true
    }

    /// Returns whether the panel is shown afterwards.
    pub async fn toggle(
        &mut self,
        api: &dyn BindingsApi,
        note_id: &NoteId,
        prompt: &dyn UserPrompt,
    ) -> Result<bool, BindingError> {
        if !self.show_settings {
            self.open(api, note_id).await?;
            return Ok(true);
        }
        if !self.close(prompt) {
            info!(note_id = %note_id, "settings panel kept open with unsaved binding changes");
        }
        Ok(self.show_settings)
    }

    pub async fn save(
        &mut self,
        api: &dyn BindingsApi,
        note_id: &NoteId,
    ) -> Result<(), BindingError> {
        let selected = self.selected_ids();
        if let Err(err) = api.save_bindings(note_id, &selected).await {
            error!(note_id = %note_id, status = ?err.status, message = %err.message, "interpreter binding save failed");
            return Err(BindingError::Save(err.into()));
        }

        info!(note_id = %note_id, selected = ?selected, "interpreter bindings saved");
        self.original = self.bindings.clone();
        self.show_settings = false;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/bindings_tests.rs"]
mod tests;
