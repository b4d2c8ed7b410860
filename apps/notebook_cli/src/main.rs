use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notebook_client::{
    config::{load_settings, Settings, DEFAULT_CONFIG_FILE},
    AutoConfirm, BindingsApi, CommandDispatcher, HttpBindingsApi, MissingBindingsApi, NoteSession,
};
use shared::protocol::{Note, ServerEvent};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feed note snapshots through the engine in the given order.
    Replay {
        #[arg(long)]
        note_id: String,
        /// Fetch interpreter bindings from the configured REST base after each snapshot.
        #[arg(long)]
        online: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Fetch the interpreter bindings of a note, applying the default selection.
    Bindings {
        #[arg(long)]
        note_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();
    let settings = load_settings(&args.config)?;

    match args.command {
        Command::Replay {
            note_id,
            online,
            files,
        } => {
            let api: Arc<dyn BindingsApi> = if online {
                Arc::new(HttpBindingsApi::new(&settings.rest_api_base)?)
            } else {
                Arc::new(MissingBindingsApi)
            };
            replay(&settings, api, note_id, files).await
        }
        Command::Bindings { note_id } => {
            let api = HttpBindingsApi::new(&settings.rest_api_base)?;
            let mut session = NoteSession::new(note_id);
            session.bindings.fetch(&api, &session.note_id).await?;
            if session.bindings.default_select_if_none_selected() {
                println!("No interpreter was selected; applied group defaults.");
            }
            for binding in session.bindings.bindings() {
                let mark = if binding.selected { "x" } else { " " };
                println!("[{mark}] {} ({}) id={}", binding.name, binding.group, binding.id);
            }
            Ok(())
        }
    }
}

async fn replay(
    settings: &Settings,
    api: Arc<dyn BindingsApi>,
    note_id: String,
    files: Vec<PathBuf>,
) -> Result<()> {
    let (dispatcher, mut outbound) =
        CommandDispatcher::with_settings(settings, Arc::new(AutoConfirm), api);
    let mut local_events = dispatcher.subscribe();
    let mut session = NoteSession::new(note_id);

    dispatcher.open_note(&session)?;

    for path in files {
        let event = read_event(&path)?;
        info!(file = %path.display(), "replaying snapshot");
        match event {
            ServerEvent::NoteContentReplaced { note } => {
                match dispatcher.on_note_replaced(&mut session, note) {
                    Ok(report) => println!("{}: {:?}", path.display(), report.change),
                    Err(err) => println!("{}: rejected ({err})", path.display()),
                }
            }
            other => dispatcher.handle_server_event(&mut session, other),
        }
        dispatcher.settle_bindings(&mut session).await;

        let order: Vec<_> = session.paragraphs().iter().map(|p| p.id.as_str()).collect();
        println!("  paragraphs: [{}]", order.join(", "));

        while let Ok(command) = outbound.try_recv() {
            println!("  command: {}", serde_json::to_string(&command)?);
        }
        while let Ok(event) = local_events.try_recv() {
            println!("  event: {}", event.name());
        }
        let selected = session.bindings.selected_ids();
        if !selected.is_empty() {
            let ids: Vec<_> = selected.iter().map(|id| id.as_str()).collect();
            println!("  bindings: [{}]", ids.join(", "));
        }
    }
    Ok(())
}

/// Accepts either a `{op, data}` envelope or a bare note object.
fn read_event(path: &Path) -> Result<ServerEvent> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot '{}'", path.display()))?;
    if let Ok(event) = serde_json::from_str::<ServerEvent>(&raw) {
        return Ok(event);
    }
    let note: Note = serde_json::from_str(&raw)
        .with_context(|| format!("'{}' is neither a server event nor a note", path.display()))?;
    Ok(ServerEvent::NoteContentReplaced { note })
}
