use shared::{domain::ParagraphId, protocol::Paragraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusDirection {
    Previous,
    Next,
}

/// Nearest paragraph before/after `from` that is not fully hidden
/// (editor and table both hidden). `None` when `from` is unknown or the
/// boundary is reached.
pub fn find_visible_sibling<'a>(
    paragraphs: &'a [Paragraph],
    from: &ParagraphId,
    direction: FocusDirection,
) -> Option<&'a ParagraphId> {
    let start = paragraphs.iter().position(|p| &p.id == from)?;
    let visible = |p: &&Paragraph| !p.is_fully_hidden();
    let found = match direction {
        FocusDirection::Previous => paragraphs[..start].iter().rev().find(visible),
        FocusDirection::Next => paragraphs[start + 1..].iter().find(visible),
    };
    found.map(|p| &p.id)
}
