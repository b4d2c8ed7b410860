use std::sync::Arc;

use notebook_client::{
    config::Settings, AutoConfirm, CommandDispatcher, FocusDirection, LocalEvent,
    MissingBindingsApi, MoveDirection, NoteSession, StructuralChange,
};
use serde_json::json;
use shared::{
    domain::ParagraphId,
    protocol::{ClientCommand, ServerEvent},
};

fn note_event(paragraphs: serde_json::Value) -> ServerEvent {
    serde_json::from_value(json!({
        "op": "NOTE",
        "data": {"note": {
            "id": "2A94M5J1Z",
            "name": "Zeppelin Tutorial",
            "config": {"looknfeel": "default"},
            "paragraphs": paragraphs,
            "info": {}
        }}
    }))
    .expect("note event")
}

fn pid(value: &str) -> ParagraphId {
    ParagraphId::new(value)
}

#[tokio::test]
async fn edit_cycle_keeps_local_state_for_surviving_paragraphs() {
    let (dispatcher, mut outbound) = CommandDispatcher::with_settings(
        &Settings::default(),
        Arc::new(AutoConfirm),
        Arc::new(MissingBindingsApi),
    );
    let mut local_events = dispatcher.subscribe();
    let mut session = NoteSession::new("2A94M5J1Z");

    dispatcher.open_note(&session).expect("open");
    assert_eq!(outbound.try_recv().expect("GET_NOTE").op(), "GET_NOTE");

    let ServerEvent::NoteContentReplaced { note } = note_event(json!([
        {"id": "p1", "status": "FINISHED", "text": "%md intro"},
        {"id": "p2", "status": "FINISHED", "text": "val x = 1"},
        {"id": "p3", "status": "READY", "text": "x + 1"}
    ])) else {
        panic!("expected note");
    };
    let report = dispatcher
        .on_note_replaced(&mut session, note)
        .expect("adopt");
    assert_eq!(report.change, StructuralChange::Adopted);

    // The user is typing in p2 when the next snapshot arrives.
    {
        let note = session.note.as_mut().expect("note");
        note.paragraphs[1].view.focused = true;
        note.paragraphs[1].view.pending_text = Some("val x = 42".into());
    }

    dispatcher
        .insert_paragraph_after(&session, &pid("p1"))
        .expect("insert");
    assert_eq!(
        outbound.try_recv().expect("INSERT_PARAGRAPH"),
        ClientCommand::InsertParagraph { index: 1 }
    );

    let ServerEvent::NoteContentReplaced { note } = note_event(json!([
        {"id": "p1", "status": "FINISHED"},
        {"id": "new", "status": "READY"},
        {"id": "p2", "status": "FINISHED"},
        {"id": "p3", "status": "READY"}
    ])) else {
        panic!("expected note");
    };
    dispatcher
        .on_note_replaced(&mut session, note)
        .expect("insert");

    let p2 = session
        .note
        .as_ref()
        .and_then(|n| n.paragraph(&pid("p2")))
        .expect("p2");
    assert!(p2.view.focused);
    assert_eq!(p2.view.pending_text.as_deref(), Some("val x = 42"));

    dispatcher
        .move_paragraph(&session, &pid("p3"), MoveDirection::Up)
        .expect("move");
    assert_eq!(
        outbound.try_recv().expect("MOVE_PARAGRAPH"),
        ClientCommand::MoveParagraph {
            id: pid("p3"),
            index: 2
        }
    );

    let ServerEvent::NoteContentReplaced { note } = note_event(json!([
        {"id": "p1", "status": "FINISHED"},
        {"id": "new", "status": "READY"},
        {"id": "p3", "status": "RUNNING"},
        {"id": "p2", "status": "FINISHED"}
    ])) else {
        panic!("expected note");
    };
    dispatcher
        .on_note_replaced(&mut session, note)
        .expect("move");

    let ids: Vec<_> = session.paragraphs().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "new", "p3", "p2"]);

    dispatcher.move_focus(&session, &pid("new"), FocusDirection::Next);

    let mut events = Vec::new();
    while let Ok(event) = local_events.try_recv() {
        events.push(event);
    }
    assert_eq!(
        events.last(),
        Some(&LocalEvent::FocusParagraph(pid("p3")))
    );
    assert!(events
        .iter()
        .all(|e| !matches!(e, LocalEvent::SetIframe(_))));

    let ServerEvent::NoteContentReplaced { note } = note_event(json!([
        {"id": "p1", "status": "FINISHED"},
        {"id": "p3", "status": "FINISHED"},
        {"id": "p2", "status": "FINISHED"}
    ])) else {
        panic!("expected note");
    };
    let report = dispatcher
        .on_note_replaced(&mut session, note)
        .expect("remove");
    assert_eq!(
        report.change,
        StructuralChange::Removed {
            index: 1,
            id: pid("new")
        }
    );
    // Removal snapshots carry no field updates; p3 keeps its last status.
    assert!(session.is_note_running());
}
