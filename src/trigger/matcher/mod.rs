//! Compiled webhook trigger cache and the thread that evaluates it.

mod filter;

use super::domain::{TriggerKey, TriggerMatch, WebhookDelivery};
use crate::definition::domain::{TaskCatalog, WebhookProvider};
use crate::run::domain::{RunData, TaskName};
use filter::{FilterCompiler, first_output};
use jaq_interpret::Filter;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Errors raised while compiling trigger expressions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TriggerCompileError {
    /// A filter or run-data expression failed to compile.
    #[error("task {task}: {provider} trigger #{index}: invalid expression `{expression}`: {reason}")]
    InvalidExpression {
        /// Task declaring the trigger.
        task: TaskName,
        /// Provider section of the trigger.
        provider: WebhookProvider,
        /// Position of the entry within the section.
        index: usize,
        /// Offending expression.
        expression: String,
        /// Compiler message.
        reason: String,
    },

    /// The matcher thread could not be started.
    #[error("trigger matcher thread failed: {0}")]
    Thread(String),
}

/// The matcher thread stopped before answering.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("trigger matcher is no longer running")]
pub struct MatcherUnavailable;

/// Expressions of one trigger entry, as declared.
#[derive(Debug)]
struct EntrySource {
    key: TriggerKey,
    event: String,
    filters: Vec<String>,
    run_data: BTreeMap<String, String>,
    delay: Duration,
}

struct CompiledEntry {
    event: String,
    filters: Vec<Filter>,
    run_data: Vec<(String, Filter)>,
    delay: Duration,
}

struct MatchRequest {
    provider: WebhookProvider,
    event: String,
    payload: Value,
    reply: oneshot::Sender<Vec<TriggerMatch>>,
}

/// Handle to the thread holding every compiled webhook trigger.
///
/// Entries are compiled once, up front; a bad expression in any task fails
/// construction. Dropping the handle stops the thread.
#[derive(Debug)]
pub struct TriggerMatcher {
    requests: mpsc::Sender<MatchRequest>,
    entries: usize,
}

impl std::fmt::Debug for MatchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchRequest")
            .field("provider", &self.provider)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

impl TriggerMatcher {
    /// Compiles the webhook triggers of every active task in `catalog`.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerCompileError::InvalidExpression`] naming the first
    /// expression that does not compile.
    pub fn compile(catalog: &TaskCatalog) -> Result<Self, TriggerCompileError> {
        let sources = collect_sources(catalog);
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<usize, TriggerCompileError>>(1);
        let (request_tx, request_rx) = mpsc::channel::<MatchRequest>();

        thread::Builder::new()
            .name("trigger-matcher".to_owned())
            .spawn(move || match compile_entries(sources) {
                Ok(cache) => {
                    if ready_tx.send(Ok(cache.len())).is_ok() {
                        serve(&cache, &request_rx);
                    }
                }
                Err(err) => {
                    if ready_tx.send(Err(err)).is_err() {
                        debug!("trigger compilation abandoned");
                    }
                }
            })
            .map_err(|err| TriggerCompileError::Thread(err.to_string()))?;

        let entries = ready_rx
            .recv()
            .map_err(|err| TriggerCompileError::Thread(err.to_string()))??;
        Ok(Self {
            requests: request_tx,
            entries,
        })
    }

    /// Returns the number of compiled entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries
    }

    /// Returns `true` when no task declares a webhook trigger.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Evaluates `delivery` against the compiled entries.
    ///
    /// Entries are visited per task in declaration order and the first
    /// matching entry of a task wins, so each task matches at most once.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherUnavailable`] when the matcher thread has stopped.
    pub async fn matches(&self, delivery: &WebhookDelivery) -> Result<Vec<TriggerMatch>, MatcherUnavailable> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(MatchRequest {
                provider: delivery.provider,
                event: delivery.event.clone(),
                payload: delivery.payload.clone(),
                reply,
            })
            .map_err(|_| MatcherUnavailable)?;
        response.await.map_err(|_| MatcherUnavailable)
    }
}

fn collect_sources(catalog: &TaskCatalog) -> Vec<EntrySource> {
    let mut sources = Vec::new();
    for definition in catalog.iter().filter(|definition| definition.is_active()) {
        let Some(webhook) = &definition.trigger().webhook else {
            continue;
        };
        for provider in [WebhookProvider::Github, WebhookProvider::Gitlab] {
            for (index, entry) in webhook.entries(provider).iter().enumerate() {
                sources.push(EntrySource {
                    key: TriggerKey {
                        task: definition.name().clone(),
                        provider,
                        index,
                    },
                    event: entry.event.clone(),
                    filters: entry.filters.clone(),
                    run_data: entry.run_data.clone(),
                    delay: webhook.delay,
                });
            }
        }
    }
    sources
}

fn compile_entries(
    sources: Vec<EntrySource>,
) -> Result<BTreeMap<TriggerKey, CompiledEntry>, TriggerCompileError> {
    let mut compiler = FilterCompiler::new();
    let mut cache = BTreeMap::new();
    for source in sources {
        let mut compile = |expression: &str| {
            compiler
                .compile(expression)
                .map_err(|reason| TriggerCompileError::InvalidExpression {
                    task: source.key.task.clone(),
                    provider: source.key.provider,
                    index: source.key.index,
                    expression: expression.to_owned(),
                    reason,
                })
        };
        let filters = source
            .filters
            .iter()
            .map(|expression| compile(expression))
            .collect::<Result<Vec<_>, _>>()?;
        let run_data = source
            .run_data
            .iter()
            .map(|(key, expression)| compile(expression).map(|filter| (key.clone(), filter)))
            .collect::<Result<Vec<_>, _>>()?;
        cache.insert(
            source.key,
            CompiledEntry {
                event: source.event,
                filters,
                run_data,
                delay: source.delay,
            },
        );
    }
    Ok(cache)
}

fn serve(cache: &BTreeMap<TriggerKey, CompiledEntry>, requests: &mpsc::Receiver<MatchRequest>) {
    while let Ok(request) = requests.recv() {
        let matches = evaluate(cache, request.provider, &request.event, &request.payload);
        if request.reply.send(matches).is_err() {
            debug!(event = %request.event, "trigger match requester went away");
        }
    }
}

fn evaluate(
    cache: &BTreeMap<TriggerKey, CompiledEntry>,
    provider: WebhookProvider,
    event: &str,
    payload: &Value,
) -> Vec<TriggerMatch> {
    let mut matched_tasks = BTreeSet::new();
    let mut matches = Vec::new();
    for (key, entry) in cache {
        if key.provider != provider || entry.event != event || matched_tasks.contains(&key.task) {
            continue;
        }
        if !entry_passes(key, entry, payload) {
            continue;
        }
        matched_tasks.insert(key.task.clone());
        matches.push(TriggerMatch {
            key: key.clone(),
            run_data: extract_run_data(key, entry, payload),
            delay: entry.delay,
        });
    }
    matches
}

fn entry_passes(key: &TriggerKey, entry: &CompiledEntry, payload: &Value) -> bool {
    entry.filters.iter().all(|filter| match first_output(filter, payload) {
        Ok(output) => output.passes(),
        Err(reason) => {
            debug!(task = %key.task, provider = %key.provider, index = key.index, %reason, "trigger filter failed");
            false
        }
    })
}

fn extract_run_data(key: &TriggerKey, entry: &CompiledEntry, payload: &Value) -> RunData {
    let mut run_data = RunData::new();
    for (name, filter) in &entry.run_data {
        match first_output(filter, payload) {
            Ok(output) => {
                if let Some(text) = output.into_text() {
                    run_data.insert(name.clone(), text);
                }
            }
            Err(reason) => {
                warn!(task = %key.task, provider = %key.provider, key = %name, %reason, "run data extraction failed");
            }
        }
    }
    run_data
}
