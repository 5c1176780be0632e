//! The canonical ordered message list behind the conversation view.
//!
//! The feed owns the only mutable copy of the message list and the presence
//! snapshot. The grouping engine (`grouping`) only ever reads a snapshot.
//! All mutation happens on one consumer task, so no locking lives here.

use std::time::Duration;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::error::Result;
use crate::models::{Message, RawMessage, UserStatusMap};

/// Backend-defined history page size.
pub const PAGE_SIZE: usize = 20;

/// How long a message with not-yet-ready attachments is held before the
/// driver re-ingests it. Covers backend post-processing lag for uploads.
pub const ATTACHMENT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Scroll is deferred after an attachment message so layout can settle on
/// the rendered image/file card.
pub const ATTACHMENT_SCROLL_DELAY: Duration = Duration::from_secs(1);

/// Outcome of offering one realtime arrival to the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// In the feed; scroll to bottom after `scroll_delay`.
    Accepted { scroll_delay: Duration },
    /// Already present, silently dropped.
    Duplicate,
    /// Attachments not ready; not in the feed. Re-ingest after `retry_after`.
    Held { retry_after: Duration },
}

#[derive(Debug, Default)]
pub struct ConversationFeed {
    messages: Vec<Message>,
    status: UserStatusMap,
    display_name: Option<String>,
    history_end: bool,
    loading_older: bool,
}

impl ConversationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages the renderer should show: the feed minus deleted ones.
    pub fn visible_messages(&self) -> Vec<Message> {
        self.messages.iter().filter(|m| !m.is_deleted()).cloned().collect()
    }

    pub fn status(&self) -> &UserStatusMap {
        &self.status
    }

    /// Visitor display name derived from history, if any.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn is_history_end(&self) -> bool {
        self.history_end
    }

    /// Seeds the feed from the most recent history page, replacing it
    /// wholesale.
    pub async fn load_initial(
        &mut self,
        api: &ApiClient,
        contact: &str,
        conversation: i64,
    ) -> Result<()> {
        let page = api.get_messages(contact, conversation, None).await?;
        let mut messages: Vec<Message> = page.into_iter().map(Message::normalize).collect();
        messages.sort_by_key(|m| m.created_at);

        self.display_name = messages
            .iter()
            .find(|m| m.is_visitor() && m.sender.name.is_some())
            .and_then(|m| m.sender.name.clone());

        info!(count = messages.len(), conversation, "seeded conversation feed");
        self.messages = messages;
        self.history_end = false;
        Ok(())
    }

    /// Whether a scroll-to-top should trigger pagination at all. Guards
    /// against re-entrant loads, exhausted history, and short initial pages.
    pub fn should_load_older(&self) -> bool {
        !self.loading_older && !self.history_end && self.messages.len() >= PAGE_SIZE
    }

    /// Fetches and prepends the page older than the current head. Returns
    /// true when messages were added.
    pub async fn load_older(
        &mut self,
        api: &ApiClient,
        contact: &str,
        conversation: i64,
    ) -> Result<bool> {
        if !self.should_load_older() {
            return Ok(false);
        }
        let Some(before) = self.messages.first().and_then(|m| m.id) else {
            return Ok(false);
        };

        self.loading_older = true;
        let result = api.get_messages(contact, conversation, Some(before)).await;
        self.loading_older = false;

        debug!(before, "fetched older history page");
        Ok(self.apply_older_page(result?))
    }

    fn apply_older_page(&mut self, page: Vec<RawMessage>) -> bool {
        if page.is_empty() {
            info!("history exhausted, disabling further pagination");
            self.history_end = true;
            return false;
        }
        let mut older: Vec<Message> = page.into_iter().map(Message::normalize).collect();
        older.sort_by_key(|m| m.created_at);
        older.extend(self.messages.drain(..));
        self.messages = older;
        true
    }

    /// Offers one realtime arrival to the feed.
    pub fn ingest(&mut self, raw: RawMessage) -> Ingest {
        self.ingest_message(Message::normalize(raw))
    }

    pub fn ingest_message(&mut self, msg: Message) -> Ingest {
        let has_attachments = !msg.attachments.is_empty();
        if has_attachments && !msg.all_attachments_ready() {
            debug!(id = ?msg.id, "attachments not ready, holding message");
            return Ingest::Held {
                retry_after: ATTACHMENT_RETRY_DELAY,
            };
        }
        if self.contains(&msg) {
            debug!(id = ?msg.id, created_at = msg.created_at, "dropping duplicate realtime message");
            return Ingest::Duplicate;
        }

        // Insert at the last position that keeps created_at non-decreasing,
        // so equal timestamps preserve arrival order.
        let idx = self.messages.partition_point(|m| m.created_at <= msg.created_at);
        self.messages.insert(idx, msg);

        let scroll_delay = if has_attachments {
            ATTACHMENT_SCROLL_DELAY
        } else {
            Duration::ZERO
        };
        Ingest::Accepted { scroll_delay }
    }

    /// Identity: id when both sides have one, exact created_at otherwise.
    fn contains(&self, msg: &Message) -> bool {
        self.messages.iter().any(|m| match (m.id, msg.id) {
            (Some(a), Some(b)) => a == b,
            _ => m.created_at == msg.created_at,
        })
    }

    /// Wholesale replacement of the presence snapshot.
    pub fn on_presence(&mut self, status: UserStatusMap) {
        self.status = status;
    }
}
