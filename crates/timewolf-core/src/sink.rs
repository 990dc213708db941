//! Message sink: the human-readable progress and error channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{error, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

impl Severity {
    pub fn from_is_error(is_error: bool) -> Self {
        if is_error {
            Severity::Error
        } else {
            Severity::Info
        }
    }
}

/// One published message, attributed to the module that sent it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub source: String,
    pub text: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(source: impl Into<String>, text: impl Into<String>, severity: Severity) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
            severity,
            timestamp: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

pub trait MessageSink: Send + Sync {
    fn publish(&self, source: &str, text: &str, severity: Severity);
}

/// Forwards messages to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn publish(&self, source: &str, text: &str, severity: Severity) {
        match severity {
            Severity::Info => info!(module = source, "{}", text),
            Severity::Error => error!(module = source, "{}", text),
        }
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<Message>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.text).collect()
    }

    pub fn errors(&self) -> Vec<Message> {
        self.messages().into_iter().filter(Message::is_error).collect()
    }

    pub fn contains(&self, text: &str, severity: Severity) -> bool {
        self.messages()
            .iter()
            .any(|m| m.text == text && m.severity == severity)
    }
}

impl MessageSink for RecordingSink {
    fn publish(&self, source: &str, text: &str, severity: Severity) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Message::new(source, text, severity));
    }
}

/// Fans messages out to live subscribers. Messages published while nobody
/// listens are dropped.
pub struct BroadcastSink {
    tx: broadcast::Sender<Message>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }
}

impl MessageSink for BroadcastSink {
    fn publish(&self, source: &str, text: &str, severity: Severity) {
        let _ = self.tx.send(Message::new(source, text, severity));
    }
}
