use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{BindingId, LookAndFeel, NoteId, ParagraphId, ParagraphStatus},
    error::ApiError,
};

/// The server sends `null` for config and collections it never populated.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: NoteConfig,
    #[serde(default, deserialize_with = "null_as_default")]
    pub paragraphs: Vec<Paragraph>,
    #[serde(default)]
    pub info: Value,
}

impl Note {
    pub fn paragraph(&self, id: &ParagraphId) -> Option<&Paragraph> {
        self.paragraphs.iter().find(|p| &p.id == id)
    }

    pub fn position_of(&self, id: &ParagraphId) -> Option<usize> {
        self.paragraphs.iter().position(|p| &p.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub looknfeel: Option<LookAndFeel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NoteConfig {
    pub fn is_view_only(&self) -> bool {
        self.looknfeel.is_some_and(LookAndFeel::is_view_only)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub id: ParagraphId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: ParagraphStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: ParagraphConfig,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Client-side state; never sent or received.
    #[serde(skip)]
    pub view: ParagraphView,
}

impl Paragraph {
    pub fn new(id: impl Into<ParagraphId>) -> Self {
        Self {
            id: id.into(),
            status: ParagraphStatus::default(),
            config: ParagraphConfig::default(),
            extra: Map::new(),
            view: ParagraphView::default(),
        }
    }

    pub fn with_status(mut self, status: ParagraphStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_fully_hidden(&self) -> bool {
        self.config.editor_hide && self.config.table_hide
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub editor_hide: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub table_hide: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParagraphView {
    pub focused: bool,
    pub pending_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpreterBinding {
    pub id: BindingId,
    #[serde(default)]
    pub name: String,
    pub group: String,
    #[serde(default)]
    pub selected: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InterpreterBinding {
    pub fn new(id: impl Into<BindingId>, group: impl Into<String>) -> Self {
        let group = group.into();
        Self {
            id: id.into(),
            name: group.clone(),
            group,
            selected: false,
            extra: Map::new(),
        }
    }
}

/// Envelope returned by the REST endpoints: `{ status, message, body }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestResponse<T> {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub body: Option<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientCommand {
    GetNote {
        id: NoteId,
    },
    DelNote {
        id: NoteId,
    },
    NoteUpdate {
        id: NoteId,
        name: String,
        config: NoteConfig,
    },
    MoveParagraph {
        id: ParagraphId,
        index: usize,
    },
    InsertParagraph {
        index: usize,
    },
}

impl ClientCommand {
    pub fn op(&self) -> &'static str {
        match self {
            Self::GetNote { .. } => "GET_NOTE",
            Self::DelNote { .. } => "DEL_NOTE",
            Self::NoteUpdate { .. } => "NOTE_UPDATE",
            Self::MoveParagraph { .. } => "MOVE_PARAGRAPH",
            Self::InsertParagraph { .. } => "INSERT_PARAGRAPH",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "NOTE")]
    NoteContentReplaced { note: Note },
    #[serde(rename = "ERROR")]
    Error(ApiError),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn commands_serialize_as_op_data_envelope() {
        let cmd = ClientCommand::MoveParagraph {
            id: ParagraphId::new("p2"),
            index: 0,
        };
        let value = serde_json::to_value(&cmd).expect("serialize");
        assert_eq!(
            value,
            json!({"op": "MOVE_PARAGRAPH", "data": {"id": "p2", "index": 0}})
        );
        assert_eq!(cmd.op(), "MOVE_PARAGRAPH");

        let insert = serde_json::to_value(ClientCommand::InsertParagraph { index: 2 })
            .expect("serialize");
        assert_eq!(insert, json!({"op": "INSERT_PARAGRAPH", "data": {"index": 2}}));
    }

    #[test]
    fn note_update_omits_unset_config_fields() {
        let cmd = ClientCommand::NoteUpdate {
            id: NoteId::new("n1"),
            name: "daily".into(),
            config: NoteConfig {
                cron: None,
                looknfeel: Some(LookAndFeel::Report),
                extra: Map::new(),
            },
        };
        let value = serde_json::to_value(&cmd).expect("serialize");
        assert_eq!(
            value,
            json!({
                "op": "NOTE_UPDATE",
                "data": {"id": "n1", "name": "daily", "config": {"looknfeel": "report"}}
            })
        );
    }

    #[test]
    fn paragraph_keeps_unknown_fields_and_defaults_config() {
        let raw = json!({
            "id": "p1",
            "status": "FINISHED",
            "text": "%md hello",
            "dateUpdated": "Mar 25, 2015 2:21:00 PM"
        });
        let paragraph: Paragraph = serde_json::from_value(raw).expect("deserialize");
        assert_eq!(paragraph.status, ParagraphStatus::Finished);
        assert!(!paragraph.config.editor_hide);
        assert!(!paragraph.config.table_hide);
        assert_eq!(paragraph.extra.get("text"), Some(&json!("%md hello")));

        let back = serde_json::to_value(&paragraph).expect("serialize");
        assert_eq!(back["dateUpdated"], json!("Mar 25, 2015 2:21:00 PM"));
        assert_eq!(back["config"], json!({"editorHide": false, "tableHide": false}));
    }

    #[test]
    fn null_fields_fall_back_to_defaults() {
        let raw = json!({
            "op": "NOTE",
            "data": {"note": {
                "id": "n1",
                "name": null,
                "config": null,
                "paragraphs": [
                    {"id": "p1", "config": null, "status": null},
                    {"id": "p2", "config": {"editorHide": null, "tableHide": true}}
                ]
            }}
        });
        let ServerEvent::NoteContentReplaced { note } =
            serde_json::from_value(raw).expect("parse event")
        else {
            panic!("expected note event");
        };
        assert_eq!(note.name, "");
        assert_eq!(note.config, NoteConfig::default());
        assert_eq!(note.paragraphs[0].config, ParagraphConfig::default());
        assert_eq!(note.paragraphs[0].status, ParagraphStatus::Ready);
        assert!(!note.paragraphs[1].config.editor_hide);
        assert!(note.paragraphs[1].config.table_hide);

        let back = serde_json::to_value(&note.paragraphs[0]).expect("serialize");
        assert_eq!(back["config"], json!({"editorHide": false, "tableHide": false}));

        let empty: Note =
            serde_json::from_value(json!({"id": "n2", "paragraphs": null})).expect("parse note");
        assert!(empty.paragraphs.is_empty());
    }

    #[test]
    fn unknown_status_is_tolerated() {
        let paragraph: Paragraph =
            serde_json::from_value(json!({"id": "p1", "status": "SCHEDULED"})).expect("parse");
        assert_eq!(paragraph.status, ParagraphStatus::Unknown);
        assert!(!paragraph.status.is_active());
    }

    #[test]
    fn inbound_note_event_parses() {
        let raw = json!({
            "op": "NOTE",
            "data": {"note": {
                "id": "n1",
                "name": "demo",
                "config": {"looknfeel": "simple", "cron": "0 0/5 * * * ?"},
                "paragraphs": [{"id": "p1"}, {"id": "p2", "status": "RUNNING"}],
                "info": {}
            }}
        });
        let ServerEvent::NoteContentReplaced { note } =
            serde_json::from_value(raw).expect("parse event")
        else {
            panic!("expected note event");
        };
        assert_eq!(note.paragraphs.len(), 2);
        assert_eq!(note.config.looknfeel, Some(LookAndFeel::Simple));
        assert_eq!(note.config.cron.as_deref(), Some("0 0/5 * * * ?"));
        assert!(note.paragraphs[1].status.is_active());
    }
}
