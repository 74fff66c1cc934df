//! Session data types.

use chrono::{DateTime, Utc};
use keel_types::{Message, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted conversation thread.
///
/// `timestamp` is the recency key used for eviction: higher is newer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub timestamp: i64,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Session {
    /// Create a new empty session stamped with the current time.
    pub fn new() -> Self {
        Self::with_timestamp(Uuid::new_v4().to_string(), Utc::now().timestamp_millis())
    }

    /// Create an empty session with an explicit id and recency key.
    pub fn with_timestamp(id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            timestamp,
            messages: Vec::new(),
            label: None,
        }
    }

    /// Short prefix of the session ID for display.
    pub fn short_id(&self) -> &str {
        clip(&self.id, 8)
    }

    /// Bytes this session contributes to storage usage.
    pub fn byte_size(&self) -> u64 {
        self.messages.iter().map(Message::byte_size).sum()
    }

    /// Preview string from the first user message.
    pub fn preview(&self) -> String {
        match self.first_user_text() {
            Some(text) if text.chars().count() > 80 => format!("{}...", clip(text, 77)),
            Some(text) => text.to_string(),
            None => String::new(),
        }
    }

    /// Set the label from the first non-empty user message.
    /// No-op if a label is already set.
    pub fn auto_label(&mut self) {
        if self.label.is_some() {
            return;
        }
        if let Some(text) = self.first_user_text() {
            self.label = Some(clip(text, 60).to_string());
        }
    }

    /// Build a summary for listing.
    pub fn to_summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            timestamp: self.timestamp,
            message_count: self.messages.len(),
            byte_size: self.byte_size(),
            label: self.label.clone(),
            preview: self.preview(),
        }
    }

    fn first_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.text.trim())
            .find(|t| !t.is_empty())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Lightweight summary for session listing.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub timestamp: i64,
    pub message_count: usize,
    pub byte_size: u64,
    pub label: Option<String>,
    pub preview: String,
}

impl SessionSummary {
    pub fn short_id(&self) -> &str {
        clip(&self.id, 8)
    }

    /// Human-readable age string (e.g. "2h ago", "3d ago").
    pub fn age(&self) -> String {
        let Some(created) = DateTime::<Utc>::from_timestamp_millis(self.timestamp) else {
            return "unknown".to_string();
        };
        let minutes = (Utc::now() - created).num_minutes();
        if minutes < 1 {
            "just now".to_string()
        } else if minutes < 60 {
            format!("{minutes}m ago")
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// First `max_chars` characters of `s`, never splitting a codepoint.
fn clip(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
