//! Trigger configuration declared by task definitions.

use super::DefinitionError;
use chrono::{DateTime, Utc};
use croner::Cron;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Five-field cron schedule.
#[derive(Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
}

impl CronSchedule {
    /// Parses a cron expression.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::InvalidCron`] when the expression is not a
    /// valid cron pattern.
    pub fn parse(expression: &str) -> Result<Self, DefinitionError> {
        let trimmed = expression.trim();
        compile_cron(trimmed)?;
        Ok(Self {
            expression: trimmed.to_owned(),
        })
    }

    /// Returns the expression as written.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Returns the first tick strictly after `after`.
    ///
    /// Returns `None` when the schedule has no further ticks.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        compile_cron(&self.expression)
            .ok()?
            .find_next_occurrence(&after, false)
            .ok()
    }
}

fn compile_cron(expression: &str) -> Result<Cron, DefinitionError> {
    Cron::new(expression)
        .parse()
        .map_err(|err| DefinitionError::InvalidCron {
            expression: expression.to_owned(),
            reason: err.to_string(),
        })
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

/// Source-code host a webhook comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookProvider {
    /// GitHub webhooks.
    Github,
    /// GitLab webhooks.
    Gitlab,
}

impl WebhookProvider {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
        }
    }
}

impl fmt::Display for WebhookProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One webhook trigger entry for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookTriggerEntry {
    /// Event name that must match the inbound event exactly.
    pub event: String,
    /// jq filters; every filter must pass for the entry to match.
    pub filters: Vec<String>,
    /// jq expressions extracting named run data from the payload.
    pub run_data: BTreeMap<String, String>,
}

impl WebhookTriggerEntry {
    /// Creates an entry matching `event` with no filters.
    #[must_use]
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            filters: Vec::new(),
            run_data: BTreeMap::new(),
        }
    }

    /// Adds a filter expression.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Adds a run-data extraction expression.
    #[must_use]
    pub fn with_run_data(mut self, key: impl Into<String>, expression: impl Into<String>) -> Self {
        self.run_data.insert(key.into(), expression.into());
        self
    }
}

/// Webhook block of a task trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookTrigger {
    /// Delay between receiving a matching webhook and the run becoming due.
    pub delay: Duration,
    /// GitHub entries, in declaration order.
    pub github: Vec<WebhookTriggerEntry>,
    /// GitLab entries, in declaration order.
    pub gitlab: Vec<WebhookTriggerEntry>,
}

impl WebhookTrigger {
    /// Returns the entries for `provider`.
    #[must_use]
    pub fn entries(&self, provider: WebhookProvider) -> &[WebhookTriggerEntry] {
        match provider {
            WebhookProvider::Github => &self.github,
            WebhookProvider::Gitlab => &self.gitlab,
        }
    }
}

/// Trigger block of a task definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTrigger {
    /// Cron schedule for recurring runs.
    pub cron: Option<CronSchedule>,
    /// Webhook triggers.
    pub webhook: Option<WebhookTrigger>,
}
