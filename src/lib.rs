//! Terminal client for a CREST-style contact list: OAuth implicit-grant
//! login, a cached contact list kept in sync with the server, and a
//! long-poll notification reader that triggers refreshes.

pub mod api;
pub mod auth;
pub mod consts;
pub mod contacts;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod poll;
pub mod render;
pub mod settings;
pub mod stream;
pub(crate) mod util;

pub use api::{CrestClient, Endpoints};
pub use auth::{CsrfStore, Session};
pub use contacts::{ContactSync, ContactView};
pub use diagnostics::{ConnectionState, RuntimeDiagnostics};
pub use error::{Error, Result};
pub use model::{Contact, ContactChanges, ContactList, Standing};
pub use settings::Settings;
pub use stream::{NotificationReader, PollConfig, PollEvent, PollListener};
