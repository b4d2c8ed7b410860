use std::{fs, path::Path};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "notebook.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub rest_api_base: String,
    pub command_queue_capacity: usize,
    pub event_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rest_api_base: "http://127.0.0.1:8080/api".into(),
            command_queue_capacity: 64,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    rest_api_base: Option<String>,
    command_queue_capacity: Option<usize>,
    event_capacity: Option<usize>,
}

/// Defaults, then `path` (if it exists), then environment variables.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
        apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?;
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file.rest_api_base {
        settings.rest_api_base = v;
    }
    if let Some(v) = file.command_queue_capacity {
        settings.command_queue_capacity = v.max(1);
    }
    if let Some(v) = file.event_capacity {
        settings.event_capacity = v.max(1);
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("APP__REST_API_BASE") {
        settings.rest_api_base = v;
    }

    if let Some(parsed) = lookup("APP__COMMAND_QUEUE_CAPACITY").and_then(|v| v.parse().ok()) {
        settings.command_queue_capacity = usize::max(parsed, 1);
    }
    if let Some(parsed) = lookup("APP__EVENT_CAPACITY").and_then(|v| v.parse().ok()) {
        settings.event_capacity = usize::max(parsed, 1);
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
