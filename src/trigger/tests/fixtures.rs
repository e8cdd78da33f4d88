//! Shared builders for trigger tests.

use crate::definition::domain::{
    TaskDefinition, TaskTrigger, WebhookProvider, WebhookTrigger, WebhookTriggerEntry,
};
use crate::run::domain::{TaskHash, TaskName};
use crate::trigger::domain::WebhookDelivery;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use std::time::Duration;

pub(super) fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0)
        .single()
        .expect("valid test timestamp")
}

pub(super) fn task_name(name: &str) -> TaskName {
    TaskName::new(name).expect("valid task name")
}

/// A task listening to GitHub `entries` with the given webhook delay.
pub(super) fn github_task(name: &str, delay: Duration, entries: Vec<WebhookTriggerEntry>) -> TaskDefinition {
    TaskDefinition::new(task_name(name), TaskHash::new(format!("hash-{name}"))).with_trigger(TaskTrigger {
        cron: None,
        webhook: Some(WebhookTrigger {
            delay,
            github: entries,
            gitlab: Vec::new(),
        }),
    })
}

pub(super) fn main_push_payload() -> Value {
    json!({
        "ref": "refs/heads/main",
        "after": "4f2c9e1",
        "repository": { "full_name": "acme/api", "size": 42 },
        "commits": [{ "id": "4f2c9e1" }],
    })
}

pub(super) fn github_push(payload: Value) -> WebhookDelivery {
    WebhookDelivery::new(WebhookProvider::Github, "push", payload, at(12, 0))
        .with_delivery_id("delivery-1")
}
