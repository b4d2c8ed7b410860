//! Positional, ID-keyed reconciliation of a local note against a full
//! incoming snapshot.
//!
//! Each snapshot is expected to carry at most one structural change relative
//! to the local copy: a single insertion, a single removal, or a reordering
//! of the same paragraphs. Local `Paragraph` values (and the client-only
//! `view` state attached to them) are kept wherever their ID survives in
//! place. Snapshots that break this shape are rejected before anything is
//! touched.

use std::collections::HashSet;

use shared::{
    domain::ParagraphId,
    protocol::{Note, Paragraph},
};
use thiserror::Error;
use tracing::debug;

pub fn paragraph_ids(paragraphs: &[Paragraph]) -> Vec<ParagraphId> {
    paragraphs.iter().map(|p| p.id.clone()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphMove {
    pub id: ParagraphId,
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralChange {
    /// No local note existed; the snapshot was taken as-is.
    Adopted,
    Unchanged,
    Inserted { index: usize, id: ParagraphId },
    Removed { index: usize, id: ParagraphId },
    Reordered { moves: Vec<ParagraphMove> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub change: StructuralChange,
    /// Incoming content for every paragraph whose position did not change,
    /// in sequence order. Only produced when the paragraph count is unchanged.
    pub updated: Vec<Paragraph>,
}

impl ReconcileReport {
    fn structural(change: StructuralChange) -> Self {
        Self {
            change,
            updated: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error(
        "snapshot holds more than one structural change: local {} paragraphs, incoming {}",
        local.len(),
        incoming.len()
    )]
    MultipleStructuralChanges {
        local: Vec<ParagraphId>,
        incoming: Vec<ParagraphId>,
    },
}

/// Brings `local` in line with `incoming`.
///
/// Note-level fields are last-writer-wins. The paragraph sequence is patched
/// with one insert, one removal, or a left-to-right series of moves,
/// depending on whether the snapshot grew, shrank or kept its size.
///
/// # Errors
/// Returns [`ReconcileError::MultipleStructuralChanges`] when the snapshot
/// cannot be expressed as a single change; `local` is left untouched.
pub fn reconcile(
    local: &mut Option<Note>,
    incoming: Note,
) -> Result<ReconcileReport, ReconcileError> {
    let Some(note) = local.as_mut() else {
        debug!(note_id = %incoming.id, paragraphs = incoming.paragraphs.len(), "adopting first note snapshot");
        *local = Some(incoming);
        return Ok(ReconcileReport::structural(StructuralChange::Adopted));
    };

    let old_ids = paragraph_ids(&note.paragraphs);
    let new_ids = paragraph_ids(&incoming.paragraphs);
    check_single_change(&old_ids, &new_ids)?;

    let Note {
        name,
        config,
        paragraphs: incoming_paragraphs,
        info,
        ..
    } = incoming;

    if note.name != name {
        debug!(note_id = %note.id, from = %note.name, to = %name, "note renamed");
    }
    note.name = name;
    note.config = config;
    note.info = info;

    let report = if new_ids.len() > old_ids.len() {
        let index = first_mismatch(&old_ids, &new_ids);
        let mut incoming_paragraphs = incoming_paragraphs;
        let paragraph = incoming_paragraphs.swap_remove(index);
        let id = paragraph.id.clone();
        note.paragraphs.insert(index, paragraph);
        ReconcileReport::structural(StructuralChange::Inserted { index, id })
    } else if new_ids.len() < old_ids.len() {
        let index = first_mismatch(&old_ids, &new_ids);
        let removed = note.paragraphs.remove(index);
        ReconcileReport::structural(StructuralChange::Removed {
            index,
            id: removed.id,
        })
    } else {
        reorder_and_collect_updates(note, incoming_paragraphs, old_ids)
    };

    debug!(note_id = %note.id, change = ?report.change, updated = report.updated.len(), "note reconciled");
    Ok(report)
}

fn reorder_and_collect_updates(
    note: &mut Note,
    incoming_paragraphs: Vec<Paragraph>,
    mut old_ids: Vec<ParagraphId>,
) -> ReconcileReport {
    let mut updated = Vec::new();
    let mut moves = Vec::new();

    for (index, entry) in incoming_paragraphs.into_iter().enumerate() {
        if old_ids[index] == entry.id {
            updated.push(entry);
            continue;
        }

        // Positions before `index` already match, so the ID sits further right.
        let Some(from) = old_ids.iter().skip(index).position(|id| *id == entry.id) else {
            continue;
        };
        let from = from + index;
        note.paragraphs.remove(from);
        moves.push(ParagraphMove {
            id: entry.id.clone(),
            from,
            to: index,
        });
        note.paragraphs.insert(index, entry);
        old_ids = paragraph_ids(&note.paragraphs);
    }

    let change = if moves.is_empty() {
        StructuralChange::Unchanged
    } else {
        StructuralChange::Reordered { moves }
    };
    ReconcileReport { change, updated }
}

fn first_mismatch(a: &[ParagraphId], b: &[ParagraphId]) -> usize {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .unwrap_or_else(|| a.len().min(b.len()))
}

fn check_single_change(
    old_ids: &[ParagraphId],
    new_ids: &[ParagraphId],
) -> Result<(), ReconcileError> {
    let new: HashSet<_> = new_ids.iter().collect();
    let ok = new.len() == new_ids.len()
        && match new_ids.len() as isize - old_ids.len() as isize {
            0 => {
                let old: HashSet<_> = old_ids.iter().collect();
                old.len() == old_ids.len() && old == new
            }
            1 => {
                let k = first_mismatch(old_ids, new_ids);
                old_ids[k..] == new_ids[k + 1..]
            }
            -1 => {
                let k = first_mismatch(old_ids, new_ids);
                new_ids[k..] == old_ids[k + 1..]
            }
            _ => false,
        };

    if ok {
        Ok(())
    } else {
        Err(ReconcileError::MultipleStructuralChanges {
            local: old_ids.to_vec(),
            incoming: new_ids.to_vec(),
        })
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
