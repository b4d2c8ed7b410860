use super::*;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct BindingServerState {
    saved: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

async fn list_bindings(Path(note_id): Path<String>) -> impl IntoResponse {
    if note_id == "broken" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "INTERNAL_SERVER_ERROR",
                "message": "interpreter setting not found",
            })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "status": "OK",
            "message": "",
            "body": [
                {"id": "2AJXGMUUJ", "name": "spark", "group": "spark", "selected": true,
                 "interpreters": [{"name": "spark", "class": "SparkInterpreter"}]},
                {"id": "2AK8HVB4U", "name": "md", "group": "md", "selected": false}
            ]
        })),
    )
}

async fn save_bindings(
    State(state): State<BindingServerState>,
    Path(note_id): Path<String>,
    Json(ids): Json<Vec<String>>,
) -> impl IntoResponse {
    if note_id == "locked" {
        return (StatusCode::FORBIDDEN, Json(json!({"status": "FORBIDDEN"})));
    }
    state.saved.lock().await.push((note_id, ids));
    (StatusCode::OK, Json(json!({"status": "OK", "message": ""})))
}

async fn spawn_binding_server() -> anyhow::Result<(String, BindingServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = BindingServerState::default();
    let app = Router::new()
        .route(
            "/api/notebook/interpreter/bind/:note_id",
            get(list_bindings).put(save_bindings),
        )
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api"), state))
}

#[test]
fn binding_url_appends_note_id_under_base_path() {
    let api = HttpBindingsApi::new("http://localhost:8080/api").expect("url");
    assert_eq!(
        api.binding_url(&NoteId::new("2A94M5J1Z"))
            .expect("join")
            .as_str(),
        "http://localhost:8080/api/notebook/interpreter/bind/2A94M5J1Z"
    );

    let trailing = HttpBindingsApi::new("http://localhost:8080/api/").expect("url");
    assert_eq!(
        trailing
            .binding_url(&NoteId::new("n1"))
            .expect("join")
            .as_str(),
        "http://localhost:8080/api/notebook/interpreter/bind/n1"
    );
}

#[test]
fn binding_url_escapes_reserved_characters_in_note_id() {
    let api = HttpBindingsApi::new("http://localhost:8080/api").expect("url");
    let url = |id: &str| {
        api.binding_url(&NoteId::new(id))
            .expect("join")
            .to_string()
    };

    assert_eq!(
        url("a#b"),
        "http://localhost:8080/api/notebook/interpreter/bind/a%23b"
    );
    assert_eq!(
        url("x:y"),
        "http://localhost:8080/api/notebook/interpreter/bind/x:y"
    );
    assert_eq!(
        url("a/b?c"),
        "http://localhost:8080/api/notebook/interpreter/bind/a%2Fb%3Fc"
    );
}

#[tokio::test]
async fn fetch_routes_reserved_note_id_to_its_own_path() {
    let (base, state) = spawn_binding_server().await.expect("spawn server");
    let api = HttpBindingsApi::new(&base).expect("url");

    api.save_bindings(&NoteId::new("a#b"), &[BindingId::new("md")])
        .await
        .expect("save");

    let saved = state.saved.lock().await.clone();
    assert_eq!(saved, vec![("a#b".to_string(), vec!["md".to_string()])]);
}

#[test]
fn rejects_unparseable_base() {
    assert!(HttpBindingsApi::new("not a url").is_err());
}

#[tokio::test]
async fn fetch_reads_rest_envelope_body() {
    let (base, _state) = spawn_binding_server().await.expect("spawn server");
    let api = HttpBindingsApi::new(&base).expect("url");

    let bindings = api
        .fetch_bindings(&NoteId::new("n1"))
        .await
        .expect("fetch");

    assert_eq!(bindings.len(), 2);
    assert_eq!(bindings[0].id, BindingId::new("2AJXGMUUJ"));
    assert!(bindings[0].selected);
    assert!(bindings[0].extra.contains_key("interpreters"));
    assert_eq!(bindings[1].group, "md");
    assert!(!bindings[1].selected);
}

#[tokio::test]
async fn fetch_failure_carries_status_and_server_message() {
    let (base, _state) = spawn_binding_server().await.expect("spawn server");
    let api = HttpBindingsApi::new(&base).expect("url");

    let err = api
        .fetch_bindings(&NoteId::new("broken"))
        .await
        .expect_err("must fail");

    assert_eq!(err.status, Some(500));
    assert_eq!(err.code, ErrorCode::Internal);
    assert_eq!(err.message, "interpreter setting not found");
}

#[tokio::test]
async fn save_puts_selected_ids() {
    let (base, state) = spawn_binding_server().await.expect("spawn server");
    let api = HttpBindingsApi::new(&base).expect("url");

    api.save_bindings(
        &NoteId::new("n1"),
        &[BindingId::new("2AJXGMUUJ"), BindingId::new("2AK8HVB4U")],
    )
    .await
    .expect("save");

    let saved = state.saved.lock().await.clone();
    assert_eq!(
        saved,
        vec![(
            "n1".to_string(),
            vec!["2AJXGMUUJ".to_string(), "2AK8HVB4U".to_string()]
        )]
    );

    let err = api
        .save_bindings(&NoteId::new("locked"), &[])
        .await
        .expect_err("forbidden");
    assert_eq!(err.code, ErrorCode::Forbidden);
    assert_eq!(err.status, Some(403));
    assert_eq!(err.message, "Forbidden");
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let api = HttpBindingsApi::new(&format!("http://{addr}/api")).expect("url");
    let err = api
        .fetch_bindings(&NoteId::new("n1"))
        .await
        .expect_err("unreachable");
    assert_eq!(err.code, ErrorCode::Transport);
}
