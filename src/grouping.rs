//! Pure clustering of a chronological message stream for rendering.
//!
//! Both groupings are adjacency-based, not full partitions: a key that
//! re-appears after an intervening different key starts a fresh group. That
//! matches the render semantics (avatar/timestamp collapsing) without ever
//! reordering the timeline, and keeps both passes O(n) so they are safe to
//! recompute on every render of a long history.

use chrono::{Local, NaiveDate, TimeZone};
use std::fmt;

use crate::models::{Message, Sender};

/// Width of the same-sender clustering window, in seconds.
pub const SENDER_WINDOW_SECS: i64 = 120;

/// Calendar bucket key. The current day gets a sentinel so the renderer can
/// label it without re-deriving "today".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayKey {
    Today,
    Date(NaiveDate),
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayKey::Today => f.write_str("today"),
            DayKey::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// One calendar-day bucket. Derived, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DayGroup {
    pub date: DayKey,
    pub messages: Vec<Message>,
}

/// Who a run of messages is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenderKey {
    Id(i64),
    Me,
    Other,
}

/// A run of consecutive messages from one sender inside one time window.
/// Carries the sender snapshot of its first message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageGroup {
    pub sender_key: SenderKey,
    pub minute: i64,
    pub sender: Sender,
    pub messages: Vec<Message>,
}

fn local_date(unix: i64) -> NaiveDate {
    Local
        .timestamp_opt(unix, 0)
        .single()
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

fn sender_key(msg: &Message) -> SenderKey {
    match msg.sender.id {
        Some(id) => SenderKey::Id(id),
        None if msg.is_visitor() => SenderKey::Me,
        None => SenderKey::Other,
    }
}

/// Buckets an already-chronological sequence into calendar-day groups, using
/// the local wall-clock date of each `created_at`.
pub fn group_by_day(messages: &[Message]) -> Vec<DayGroup> {
    group_by_day_at(messages, Local::now().date_naive())
}

/// Like [`group_by_day`], but with "today" pinned by the caller. `today` is
/// computed exactly once per invocation, never per message.
pub fn group_by_day_at(messages: &[Message], today: NaiveDate) -> Vec<DayGroup> {
    let mut groups: Vec<DayGroup> = Vec::new();
    let mut current: Option<DayGroup> = None;

    for msg in messages {
        let date = local_date(msg.created_at);
        let key = if date == today { DayKey::Today } else { DayKey::Date(date) };
        match current.as_mut() {
            Some(group) if group.date == key => group.messages.push(msg.clone()),
            _ => {
                if let Some(group) = current.take() {
                    groups.push(group);
                }
                current = Some(DayGroup {
                    date: key,
                    messages: vec![msg.clone()],
                });
            }
        }
    }
    if let Some(group) = current {
        groups.push(group);
    }
    groups
}

/// Clusters consecutive messages from the same sender inside a sliding
/// two-minute window into one visual group.
pub fn group_by_sender_window(messages: &[Message]) -> Vec<MessageGroup> {
    let mut groups: Vec<MessageGroup> = Vec::new();
    let mut current: Option<MessageGroup> = None;

    for msg in messages {
        let key = sender_key(msg);
        let minute = msg.created_at.div_euclid(SENDER_WINDOW_SECS);
        match current.as_mut() {
            Some(group) if group.sender_key == key && group.minute == minute => {
                group.messages.push(msg.clone());
            }
            _ => {
                if let Some(group) = current.take() {
                    groups.push(group);
                }
                current = Some(MessageGroup {
                    sender_key: key,
                    minute,
                    sender: msg.sender.clone(),
                    messages: vec![msg.clone()],
                });
            }
        }
    }
    if let Some(group) = current {
        groups.push(group);
    }
    groups
}
