//! Embeddable support-chat core: realtime channel, message feed, grouping,
//! and the REST client of a helpdesk backend.
//!
//! The crate is UI-agnostic. An embedder drives [`widget::SupportWidget`],
//! renders [`feed::ConversationFeed`] through the [`grouping`] passes, and
//! reacts to the [`widget::UiEvent`] stream.

pub mod api;
pub mod config;
pub mod error;
pub mod feed;
pub mod grouping;
pub mod models;
pub mod realtime;
pub mod session;
pub mod utils;
pub mod widget;

pub use api::{ApiClient, OutgoingAttachment};
pub use config::{ReconnectPolicy, WidgetConfig};
pub use error::{Error, Result};
pub use feed::ConversationFeed;
pub use session::{MemorySessionStore, Session, SessionStore, SqliteSessionStore};
pub use widget::{Screen, SupportWidget, UiEvent};
