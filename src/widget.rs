//! Bootstrap glue: session handling, screen/step transitions, and the event
//! pump that bridges the realtime channel into the feed.
//!
//! Everything timing-sensitive (held-message retry, deferred scroll, preview
//! while minimized) lives here so [`ConversationFeed`] stays synchronous and
//! unit-testable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, OutgoingAttachment};
use crate::config::WidgetConfig;
use crate::error::{Error, Result};
use crate::feed::{ConversationFeed, Ingest};
use crate::models::{Agent, ContactInput, ContactRecord, Conversation, Message, ValidateExt};
use crate::realtime::{ChannelEvent, RealtimeClient, RealtimeConfig};
use crate::session::{Session, SessionStore};
use crate::utils::validation;

/// How long the unsupported-attachment banner stays up.
pub const ERROR_BANNER_DISMISS: Duration = Duration::from_secs(4);

/// Which screen the embedder should render first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Start,
    Guest,
    Chat,
}

/// Render cues the core pushes to the embedder.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    ScrollToBottom,
    /// Raised while minimized so the launcher can badge and preview.
    NewMessagePreview { sender_name: String, content: String },
    PresenceChanged,
    /// Transient banner listing the rejected extensions.
    AttachmentsRejected {
        extensions: Vec<String>,
        dismiss_after: Duration,
    },
}

pub struct SupportWidget {
    config: WidgetConfig,
    api: ApiClient,
    store: Arc<dyn SessionStore>,
    feed: Arc<Mutex<ConversationFeed>>,
    minimized: Arc<AtomicBool>,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
    realtime: Option<RealtimeClient>,
}

impl SupportWidget {
    /// Builds the widget and hands back the UI-event stream.
    pub fn new(
        config: WidgetConfig,
        store: Arc<dyn SessionStore>,
    ) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let api = ApiClient::new(config.clone());
        let widget = Self {
            config,
            api,
            store,
            feed: Arc::new(Mutex::new(ConversationFeed::new())),
            minimized: Arc::new(AtomicBool::new(true)),
            ui_tx,
            realtime: None,
        };
        (widget, ui_rx)
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn feed(&self) -> Arc<Mutex<ConversationFeed>> {
        self.feed.clone()
    }

    pub fn set_minimized(&self, minimized: bool) {
        self.minimized.store(minimized, Ordering::SeqCst);
    }

    /// A persisted session jumps straight to the chat screen.
    pub fn initial_screen(&self) -> Screen {
        match self.store.get() {
            Ok(Some(_)) => Screen::Chat,
            _ => Screen::Start,
        }
    }

    fn session(&self) -> Result<Session> {
        self.store
            .get()?
            .ok_or_else(|| Error::Session("no persisted session".to_string()))
    }

    /// Validates the guest form, registers the contact, opens a conversation,
    /// and persists the session record.
    pub async fn submit_guest_form(&self, input: ContactInput) -> Result<Session> {
        input.validate_input()?;
        let contact = self.api.create_contact(&input).await?;
        let conversation = self.api.create_conversation(&contact.source_id).await?;
        let session = Session {
            contact_identifier: contact.source_id,
            conversation_id: conversation.id,
            pubsub_token: contact.pubsub_token,
            contact_id: contact.id,
        };
        self.store.set(&session)?;
        info!(conversation = session.conversation_id, "guest registered");
        Ok(session)
    }

    /// Seeds the feed from history and arms the realtime channel.
    pub async fn open_conversation(&mut self) -> Result<()> {
        let session = self.session()?;
        self.feed
            .lock()
            .await
            .load_initial(&self.api, &session.contact_identifier, session.conversation_id)
            .await?;
        self.start_realtime(&session);
        Ok(())
    }

    /// Tears down any previous channel before arming a new one, so no two
    /// heartbeats run concurrently for this instance.
    fn start_realtime(&mut self, session: &Session) {
        self.realtime = None;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let client = RealtimeClient::spawn(
            RealtimeConfig {
                ws_url: self.config.ws_url.clone(),
                pubsub_token: session.pubsub_token.clone(),
                account_id: self.config.account_id,
                reconnect: self.config.reconnect.clone(),
            },
            events_tx,
        );
        self.realtime = Some(client);
        tokio::spawn(pump(
            self.api.clone(),
            session.contact_identifier.clone(),
            session.conversation_id,
            events_rx,
            self.feed.clone(),
            self.ui_tx.clone(),
            self.minimized.clone(),
        ));
    }

    pub fn is_realtime_connected(&self) -> bool {
        self.realtime.as_ref().is_some_and(RealtimeClient::is_connected)
    }

    pub fn disconnect(&mut self) {
        if let Some(realtime) = self.realtime.take() {
            realtime.disconnect();
        }
    }

    /// Sends a text message. The echo arrives via the realtime channel; there
    /// is no optimistic local placeholder.
    pub async fn send_text(&self, content: &str) -> Result<()> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        let session = self.session()?;
        self.api
            .send_message(&session.contact_identifier, session.conversation_id, trimmed, Vec::new())
            .await?;
        Ok(())
    }

    /// Sends the allowed files from a batch. A batch with no allowed file
    /// raises the rejection banner instead of hitting the backend.
    pub async fn send_files(&self, files: Vec<OutgoingAttachment>) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        let valid: Vec<OutgoingAttachment> = files
            .iter()
            .filter(|f| validation::is_allowed_file(&f.file_name))
            .cloned()
            .collect();
        if valid.is_empty() {
            warn!(?names, "rejecting upload batch, no allowed extensions");
            let _ = self.ui_tx.send(UiEvent::AttachmentsRejected {
                extensions: validation::extension_list(names),
                dismiss_after: ERROR_BANNER_DISMISS,
            });
            return Ok(());
        }
        let session = self.session()?;
        self.api
            .send_message(&session.contact_identifier, session.conversation_id, "", valid)
            .await?;
        Ok(())
    }

    /// Scroll-to-top hook. Returns true when older messages were prepended.
    pub async fn load_older(&self) -> Result<bool> {
        let session = self.session()?;
        self.feed
            .lock()
            .await
            .load_older(&self.api, &session.contact_identifier, session.conversation_id)
            .await
    }

    pub async fn agents(&self) -> Result<Vec<Agent>> {
        self.api.get_agents().await
    }

    pub async fn conversation_history(&self) -> Result<Vec<Conversation>> {
        let session = self.session()?;
        self.api.get_all_conversations(session.contact_id).await
    }

    pub async fn contact_profile(&self) -> Result<ContactRecord> {
        let session = self.session()?;
        self.api.get_contact(&session.contact_identifier).await
    }

    pub async fn update_contact_profile(&self, input: ContactInput) -> Result<ContactRecord> {
        input.validate_input()?;
        let session = self.session()?;
        self.api.update_contact(&session.contact_identifier, &input).await
    }
}

/// Bridges channel events into the feed, scheduling the held-message retry
/// and the deferred scroll/preview cues.
///
/// A held message is re-offered once after the retry delay, with its payload
/// refreshed from the newest history page so an upload the backend has since
/// finished processing lands with its final URLs.
async fn pump(
    api: ApiClient,
    contact: String,
    conversation: i64,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    feed: Arc<Mutex<ConversationFeed>>,
    ui: mpsc::UnboundedSender<UiEvent>,
    minimized: Arc<AtomicBool>,
) {
    let (retry_tx, mut retry_rx) = mpsc::unbounded_channel::<Message>();

    loop {
        let (msg, is_retry) = tokio::select! {
            event = events.recv() => match event {
                Some(ChannelEvent::Message(raw)) => (Message::normalize(raw), false),
                Some(ChannelEvent::Presence(status)) => {
                    feed.lock().await.on_presence(status);
                    let _ = ui.send(UiEvent::PresenceChanged);
                    continue;
                }
                None => break,
            },
            Some(held) = retry_rx.recv() => {
                (refreshed(&api, &contact, conversation, held).await, true)
            }
        };

        let outcome = feed.lock().await.ingest_message(msg.clone());
        match outcome {
            Ingest::Accepted { scroll_delay } => {
                let ui = ui.clone();
                let minimized = minimized.clone();
                let sender_name = msg
                    .sender
                    .display_name()
                    .unwrap_or("Agent")
                    .to_string();
                let content = msg.content;
                tokio::spawn(async move {
                    if !scroll_delay.is_zero() {
                        tokio::time::sleep(scroll_delay).await;
                    }
                    let _ = ui.send(UiEvent::ScrollToBottom);
                    if minimized.load(Ordering::SeqCst) {
                        let _ = ui.send(UiEvent::NewMessagePreview { sender_name, content });
                    }
                });
            }
            Ingest::Duplicate => {}
            Ingest::Held { retry_after } => {
                if is_retry {
                    warn!(id = ?msg.id, "attachments still not ready after retry, dropping message");
                    continue;
                }
                let retry_tx = retry_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(retry_after).await;
                    let _ = retry_tx.send(msg);
                });
            }
        }
    }
}

/// Looks for a fresher copy of a held message on the newest history page.
/// Falls back to the held payload when the fetch fails or the page no longer
/// carries the message.
async fn refreshed(
    api: &ApiClient,
    contact: &str,
    conversation: i64,
    held: Message,
) -> Message {
    match api.get_messages(contact, conversation, None).await {
        Ok(page) => page
            .into_iter()
            .map(Message::normalize)
            .find(|m| match (m.id, held.id) {
                (Some(a), Some(b)) => a == b,
                _ => m.created_at == held.created_at,
            })
            .unwrap_or(held),
        Err(e) => {
            debug!(error = %e, "could not refresh held message");
            held
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use tokio::time::timeout;

    fn widget_with_store(store: Arc<dyn SessionStore>) -> (SupportWidget, mpsc::UnboundedReceiver<UiEvent>) {
        let config = WidgetConfig::new("https://support.example.com", "INBOX", 1);
        SupportWidget::new(config, store)
    }

    fn persisted_store() -> Arc<dyn SessionStore> {
        let store = MemorySessionStore::new();
        store
            .set(&Session {
                contact_identifier: "abc".into(),
                conversation_id: 5,
                pubsub_token: "tok".into(),
                contact_id: 11,
            })
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn initial_screen_follows_persisted_session() {
        let (fresh, _rx) = widget_with_store(Arc::new(MemorySessionStore::new()));
        assert_eq!(fresh.initial_screen(), Screen::Start);

        let (returning, _rx) = widget_with_store(persisted_store());
        assert_eq!(returning.initial_screen(), Screen::Chat);
    }

    #[tokio::test]
    async fn invalid_guest_form_is_rejected_before_any_network_call() {
        let (widget, _rx) = widget_with_store(Arc::new(MemorySessionStore::new()));
        let result = widget
            .submit_guest_form(ContactInput {
                name: "".into(),
                email: "broken".into(),
                phone: "1".into(),
            })
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn disallowed_batch_raises_banner_without_network() {
        let (widget, mut rx) = widget_with_store(persisted_store());
        widget
            .send_files(vec![OutgoingAttachment {
                file_name: "tool.exe".into(),
                mime_type: None,
                bytes: vec![0u8; 4],
            }])
            .await
            .unwrap();

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(
            event,
            UiEvent::AttachmentsRejected {
                extensions: vec![".exe".to_string()],
                dismiss_after: ERROR_BANNER_DISMISS,
            }
        );
    }

    #[tokio::test]
    async fn empty_text_is_a_silent_no_op() {
        let (widget, _rx) = widget_with_store(persisted_store());
        widget.send_text("   ").await.unwrap();
    }

    #[tokio::test]
    async fn pump_accepts_and_cues_scroll() {
        let feed = Arc::new(Mutex::new(ConversationFeed::new()));
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let minimized = Arc::new(AtomicBool::new(false));
        tokio::spawn(pump(dummy_api(), "abc".into(), 5, events_rx, feed.clone(), ui_tx, minimized));

        let raw: crate::models::RawMessage = serde_json::from_value(serde_json::json!({
            "id": 1,
            "content": "hello",
            "message_type": 1,
            "created_at": 1000,
            "sender": { "id": 7, "name": "Ana" }
        }))
        .unwrap();
        events_tx.send(ChannelEvent::Message(raw)).unwrap();

        let event = timeout(Duration::from_secs(1), ui_rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(event, UiEvent::ScrollToBottom);
        assert_eq!(feed.lock().await.messages().len(), 1);
    }

    #[tokio::test]
    async fn pump_previews_while_minimized() {
        let feed = Arc::new(Mutex::new(ConversationFeed::new()));
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let minimized = Arc::new(AtomicBool::new(true));
        tokio::spawn(pump(dummy_api(), "abc".into(), 5, events_rx, feed, ui_tx, minimized));

        let raw: crate::models::RawMessage = serde_json::from_value(serde_json::json!({
            "id": 2,
            "content": "are you there?",
            "message_type": 1,
            "created_at": 1100,
            "sender": { "id": 7, "name": "Ana" }
        }))
        .unwrap();
        events_tx.send(ChannelEvent::Message(raw)).unwrap();

        let scroll = timeout(Duration::from_secs(1), ui_rx.recv()).await.unwrap().unwrap();
        assert_eq!(scroll, UiEvent::ScrollToBottom);
        let preview = timeout(Duration::from_secs(1), ui_rx.recv()).await.unwrap().unwrap();
        assert_eq!(
            preview,
            UiEvent::NewMessagePreview {
                sender_name: "Ana".into(),
                content: "are you there?".into(),
            }
        );
    }

    #[tokio::test]
    async fn pump_replaces_presence_wholesale() {
        let feed = Arc::new(Mutex::new(ConversationFeed::new()));
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(dummy_api(), "abc".into(), 5, events_rx, feed.clone(), ui_tx, Arc::new(AtomicBool::new(false))));

        let status = serde_json::from_value(serde_json::json!({ "7": "online" })).unwrap();
        events_tx.send(ChannelEvent::Presence(status)).unwrap();

        let event = timeout(Duration::from_secs(1), ui_rx.recv()).await.unwrap().unwrap();
        assert_eq!(event, UiEvent::PresenceChanged);
        assert_eq!(feed.lock().await.status().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pump_drops_held_message_when_refresh_fails() {
        let feed = Arc::new(Mutex::new(ConversationFeed::new()));
        let (ui_tx, _ui_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(dummy_api(), "abc".into(), 5, events_rx, feed.clone(), ui_tx, Arc::new(AtomicBool::new(false))));

        let raw: crate::models::RawMessage = serde_json::from_value(serde_json::json!({
            "id": 3,
            "created_at": 1200,
            "attachments": [{ "file_type": "file", "data_url": "" }]
        }))
        .unwrap();
        events_tx.send(ChannelEvent::Message(raw)).unwrap();

        // Held: nothing lands before the retry delay.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(feed.lock().await.messages().is_empty());

        // The backend is unreachable, so the retry falls back to the stale
        // payload and drops it for good. The feed never sees a half-ready
        // attachment.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(feed.lock().await.messages().is_empty());
    }

    #[tokio::test]
    async fn pump_retry_lands_the_refreshed_payload() {
        let page = serde_json::json!([{
            "id": 9,
            "created_at": 1500,
            "message_type": 1,
            "attachments": [{ "file_type": "image", "data_url": "https://cdn/x.png" }]
        }])
        .to_string();
        let base = history_stub(page).await;

        let api = ApiClient::new(WidgetConfig::new(base, "INBOX", 1));
        let feed = Arc::new(Mutex::new(ConversationFeed::new()));
        let (ui_tx, _ui_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(api, "abc".into(), 5, events_rx, feed.clone(), ui_tx, Arc::new(AtomicBool::new(false))));

        // The channel delivers the message before its upload has a URL.
        let raw: crate::models::RawMessage = serde_json::from_value(serde_json::json!({
            "id": 9,
            "created_at": 1500,
            "message_type": 1,
            "attachments": [{ "file_type": "image", "data_url": "" }]
        }))
        .unwrap();
        events_tx.send(ChannelEvent::Message(raw)).unwrap();

        // The retry re-reads history and lands the finished upload.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            if !feed.lock().await.messages().is_empty() {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "held message never landed");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let feed = feed.lock().await;
        assert_eq!(feed.messages()[0].id, Some(9));
        assert!(feed.messages()[0].all_attachments_ready());
    }

    fn dummy_api() -> ApiClient {
        ApiClient::new(WidgetConfig::new("http://127.0.0.1:9", "INBOX", 1))
    }

    /// Minimal HTTP endpoint answering every request with the given JSON body.
    async fn history_stub(body: String) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = stream.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        format!("http://127.0.0.1:{port}")
    }
}
