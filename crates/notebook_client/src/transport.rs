//! REST client for the interpreter binding endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{BindingId, NoteId},
    error::{ApiError, ErrorCode},
    protocol::{InterpreterBinding, RestResponse},
};
use tracing::debug;
use url::Url;

use crate::bindings::BindingsApi;

const BINDING_PATH: &str = "notebook/interpreter/bind/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpBindingsApi {
    http: Client,
    base: Url,
}

impl HttpBindingsApi {
    pub fn new(rest_api_base: &str) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(rest_api_base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base,
        })
    }

    /// The note ID is pushed as one escaped path segment, never parsed as a
    /// relative reference.
    pub fn binding_url(&self, note_id: &NoteId) -> Result<Url, ApiError> {
        let mut url = self
            .base
            .join(BINDING_PATH)
            .map_err(|err| ApiError::new(ErrorCode::Validation, err.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| {
                ApiError::new(
                    ErrorCode::Validation,
                    format!("'{}' cannot carry a path", self.base),
                )
            })?
            .pop_if_empty()
            .push(note_id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl BindingsApi for HttpBindingsApi {
    async fn fetch_bindings(&self, note_id: &NoteId) -> Result<Vec<InterpreterBinding>, ApiError> {
        let url = self.binding_url(note_id)?;
        debug!(%url, "fetching interpreter bindings");
        let response = self
            .http
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        let body: RestResponse<Vec<InterpreterBinding>> = read_body(response).await?;
        Ok(body.body.unwrap_or_default())
    }

    async fn save_bindings(&self, note_id: &NoteId, selected: &[BindingId]) -> Result<(), ApiError> {
        let url = self.binding_url(note_id)?;
        debug!(%url, count = selected.len(), "saving interpreter bindings");
        let response = self
            .http
            .put(url)
            .timeout(REQUEST_TIMEOUT)
            .json(selected)
            .send()
            .await
            .map_err(transport)?;
        let _: RestResponse<Value> = read_body(response).await?;
        Ok(())
    }
}

async fn read_body<T: DeserializeOwned>(response: Response) -> Result<RestResponse<T>, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let message = match response.json::<RestResponse<Value>>().await {
            Ok(body) if !body.message.is_empty() => body.message,
            _ => status.canonical_reason().unwrap_or("request failed").to_string(),
        };
        return Err(ApiError::from_http(status.as_u16(), message));
    }
    response.json().await.map_err(|err| ApiError {
        code: ErrorCode::Validation,
        status: Some(status.as_u16()),
        message: format!("malformed response body: {err}"),
    })
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError {
        code: ErrorCode::Transport,
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
