//! Typed client for the helpdesk REST backend.
//!
//! Two URL families: public inbox endpoints keyed by the opaque contact
//! identifier, and account-scoped endpoints guarded by an access token.
//! Failures are terminal per call; nothing here retries.

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::WidgetConfig;
use crate::error::{Error, Result};
use crate::models::{Agent, ContactInput, ContactRecord, Conversation, RawMessage};

/// A file the visitor picked for upload.
#[derive(Debug, Clone)]
pub struct OutgoingAttachment {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    config: WidgetConfig,
}

impl ApiClient {
    pub fn new(config: WidgetConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn inbox_url(&self, rest: &str) -> String {
        format!(
            "{}/public/api/v1/inboxes/{}{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.inbox_identifier,
            rest
        )
    }

    fn account_url(&self, rest: &str) -> String {
        format!(
            "{}/api/v1/accounts/{}{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_id,
            rest
        )
    }

    fn account_request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.get(url);
        if let Some(token) = &self.config.api_access_token {
            req = req.header("api_access_token", token);
        }
        req
    }

    async fn check(res: Response) -> Result<Response> {
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        Err(Error::Backend { status, body })
    }

    /// Registers a visitor with the inbox. The response carries the contact
    /// identifier (`source_id`) and the pubsub token for the realtime channel.
    pub async fn create_contact(&self, input: &ContactInput) -> Result<ContactRecord> {
        let url = self.inbox_url("/contacts");
        debug!(%url, "creating contact");
        let res = self
            .http
            .post(&url)
            .json(&json!({
                "name": input.name,
                "email": input.email,
                "phone_number": input.phone,
            }))
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }

    pub async fn create_conversation(&self, contact: &str) -> Result<Conversation> {
        let url = self.inbox_url(&format!("/contacts/{contact}/conversations"));
        debug!(%url, "creating conversation");
        let res = self.http.post(&url).send().await?;
        Ok(Self::check(res).await?.json().await?)
    }

    /// Sends a message, multipart like the upload form. The echo arrives via
    /// the realtime channel; callers should not append the response locally.
    pub async fn send_message(
        &self,
        contact: &str,
        conversation: i64,
        content: &str,
        attachments: Vec<OutgoingAttachment>,
    ) -> Result<RawMessage> {
        let url = self.inbox_url(&format!(
            "/contacts/{contact}/conversations/{conversation}/messages"
        ));
        debug!(%url, attachments = attachments.len(), "sending message");

        let mut form = Form::new().text("content", content.to_string());
        for att in attachments {
            let mut part = Part::bytes(att.bytes).file_name(att.file_name);
            if let Some(mime) = &att.mime_type {
                part = part.mime_str(mime)?;
            }
            form = form.part("attachments[]", part);
        }

        let res = self.http.post(&url).multipart(form).send().await?;
        Ok(Self::check(res).await?.json().await?)
    }

    /// Newest page when `before` is absent, the page older than `before`
    /// otherwise. An empty page signals history exhausted.
    pub async fn get_messages(
        &self,
        contact: &str,
        conversation: i64,
        before: Option<i64>,
    ) -> Result<Vec<RawMessage>> {
        let mut url = self.inbox_url(&format!(
            "/contacts/{contact}/conversations/{conversation}/messages"
        ));
        if let Some(before) = before {
            url.push_str(&format!("?before={before}"));
        }
        let res = self.http.get(&url).send().await?;
        Ok(Self::check(res).await?.json().await?)
    }

    pub async fn get_contact(&self, contact: &str) -> Result<ContactRecord> {
        let url = self.inbox_url(&format!("/contacts/{contact}"));
        let res = self.http.get(&url).send().await?;
        Ok(Self::check(res).await?.json().await?)
    }

    pub async fn update_contact(&self, contact: &str, input: &ContactInput) -> Result<ContactRecord> {
        let url = self.inbox_url(&format!("/contacts/{contact}"));
        debug!(%url, "updating contact");
        let res = self
            .http
            .patch(&url)
            .json(&json!({
                "name": input.name,
                "email": input.email,
                "phone_number": input.phone,
            }))
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }

    pub async fn get_agents(&self) -> Result<Vec<Agent>> {
        let url = self.account_url("/agents");
        let res = self.account_request(&url).send().await?;
        Ok(Self::check(res).await?.json().await?)
    }

    /// All conversation threads of one contact, for the history list.
    pub async fn get_all_conversations(&self, contact_id: i64) -> Result<Vec<Conversation>> {
        let url = self.account_url(&format!("/contacts/{contact_id}/conversations"));
        let res = self.account_request(&url).send().await?;
        let value: Value = Self::check(res).await?.json().await?;
        Ok(parse_conversation_list(value))
    }
}

/// The history endpoint wraps its list in a `payload` envelope; tolerate a
/// bare array too.
fn parse_conversation_list(value: Value) -> Vec<Conversation> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("payload") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect()
}
