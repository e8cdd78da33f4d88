//! Webhook deliveries and the matches they produce.

use crate::definition::domain::WebhookProvider;
use crate::run::domain::{RunData, TaskName};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

/// An authenticated, decoded webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookDelivery {
    /// Provider that sent the webhook.
    pub provider: WebhookProvider,
    /// Provider event name, e.g. `push` or `Push Hook`.
    pub event: String,
    /// Provider delivery identifier, if sent.
    pub delivery_id: Option<String>,
    /// Decoded JSON payload.
    pub payload: Value,
    /// Time the server received the webhook.
    pub received_at: DateTime<Utc>,
}

impl WebhookDelivery {
    /// Creates a delivery without a delivery identifier.
    #[must_use]
    pub fn new(
        provider: WebhookProvider,
        event: impl Into<String>,
        payload: Value,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            provider,
            event: event.into(),
            delivery_id: None,
            payload,
            received_at,
        }
    }

    /// Sets the provider delivery identifier.
    #[must_use]
    pub fn with_delivery_id(mut self, delivery_id: impl Into<String>) -> Self {
        self.delivery_id = Some(delivery_id.into());
        self
    }
}

/// Cache key of one compiled trigger entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TriggerKey {
    /// Task declaring the entry.
    pub task: TaskName,
    /// Provider section the entry belongs to.
    pub provider: WebhookProvider,
    /// Position of the entry within the provider section.
    pub index: usize,
}

/// A trigger entry that matched a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatch {
    /// Entry that matched.
    pub key: TriggerKey,
    /// Run data extracted from the payload.
    pub run_data: RunData,
    /// Delay before the run becomes due.
    pub delay: Duration,
}
