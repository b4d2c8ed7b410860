//! Local UI broadcasts and the user-facing prompt seam.

use shared::{
    domain::{LookAndFeel, ParagraphId},
    protocol::Paragraph,
};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    One(ParagraphId),
}

/// Events that never leave the client; paragraph views and the page chrome
/// subscribe to them.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEvent {
    OpenEditor(Scope),
    CloseEditor(Scope),
    OpenTable(Scope),
    CloseTable(Scope),
    FocusParagraph(ParagraphId),
    RunAllParagraphs,
    SetLookAndFeel(LookAndFeel),
    SetIframe(bool),
    /// Incoming content for a paragraph that kept its position.
    UpdateParagraph(Paragraph),
}

impl LocalEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenEditor(_) => "open_editor",
            Self::CloseEditor(_) => "close_editor",
            Self::OpenTable(_) => "open_table",
            Self::CloseTable(_) => "close_table",
            Self::FocusParagraph(_) => "focus_paragraph",
            Self::RunAllParagraphs => "run_all_paragraphs",
            Self::SetLookAndFeel(_) => "set_look_and_feel",
            Self::SetIframe(_) => "set_iframe",
            Self::UpdateParagraph(_) => "update_paragraph",
        }
    }
}

pub trait UserPrompt: Send + Sync {
    /// Asks a yes/no question; `false` means the user declined.
    fn confirm(&self, question: &str) -> bool;
    fn notify(&self, message: &str);
}

/// Non-interactive prompt: accepts every confirmation and logs notices.
pub struct AutoConfirm;

impl UserPrompt for AutoConfirm {
    fn confirm(&self, question: &str) -> bool {
        info!(question, "auto-confirming prompt");
        true
    }

    fn notify(&self, message: &str) {
        warn!(message, "user notice");
    }
}
