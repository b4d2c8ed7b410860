//! Client-side engine for a collaborative notebook view: keeps the local
//! note in step with server snapshots and turns user intents into commands.

pub mod bindings;
pub mod config;
pub mod cron;
pub mod dispatcher;
pub mod events;
pub mod focus;
pub mod reconcile;
pub mod session;
pub mod transport;

pub use bindings::{BindingError, BindingsApi, InterpreterBindingModel, MissingBindingsApi};
pub use dispatcher::{CommandDispatcher, DispatchError, MoveDirection, Outcome};
pub use events::{AutoConfirm, LocalEvent, Scope, UserPrompt};
pub use focus::{find_visible_sibling, FocusDirection};
pub use reconcile::{paragraph_ids, reconcile, ReconcileError, ReconcileReport, StructuralChange};
pub use session::NoteSession;
pub use transport::HttpBindingsApi;
