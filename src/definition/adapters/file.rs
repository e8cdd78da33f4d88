//! Loads task definitions from a directory of TOML task files.

use crate::definition::domain::{
    CronSchedule, DefinitionError, TaskCatalog, TaskDefinition, TaskInput, TaskTrigger,
    WebhookTrigger, WebhookTriggerEntry,
};
use crate::run::domain::{TaskHash, TaskName};
use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const TASK_FILE_EXTENSION: &str = ".toml";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskFile {
    name: String,
    #[serde(default = "default_active")]
    active: bool,
    #[serde(default)]
    auto_merge: bool,
    #[serde(default)]
    inputs: Vec<InputFile>,
    #[serde(default)]
    plugins: Vec<PluginFile>,
    #[serde(default)]
    trigger: Option<TriggerFile>,
}

const fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct InputFile {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    validation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PluginFile {
    path: String,
}

#[derive(Debug, Deserialize)]
struct TriggerFile {
    #[serde(default)]
    cron: Option<String>,
    #[serde(default)]
    webhook: Option<WebhookFile>,
}

#[derive(Debug, Deserialize)]
struct WebhookFile {
    #[serde(default)]
    delay: u64,
    #[serde(default)]
    github: Vec<WebhookEntryFile>,
    #[serde(default)]
    gitlab: Vec<WebhookEntryFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEntryFile {
    #[serde(default)]
    event: String,
    #[serde(default)]
    filters: Vec<String>,
    #[serde(default)]
    run_data: BTreeMap<String, String>,
}

fn io_error(path: &str, err: &std::io::Error) -> DefinitionError {
    DefinitionError::Io {
        path: path.to_owned(),
        reason: err.to_string(),
    }
}

/// Loads every `*.toml` task file in `dir` into a catalog.
///
/// The hash of each definition covers the task file followed by every
/// plugin it lists, in declaration order. Plugin paths are resolved inside
/// `dir`.
///
/// # Errors
///
/// Returns [`DefinitionError`] when the directory or a file cannot be read,
/// a file does not parse, or a definition is invalid.
pub fn load_task_catalog(dir: &Utf8Path) -> Result<TaskCatalog, DefinitionError> {
    let root = Dir::open_ambient_dir(dir, ambient_authority())
        .map_err(|err| io_error(dir.as_str(), &err))?;

    let mut file_names = Vec::new();
    for listed in root.entries().map_err(|err| io_error(dir.as_str(), &err))? {
        let entry = listed.map_err(|err| io_error(dir.as_str(), &err))?;
        let file_name = entry
            .file_name()
            .map_err(|err| io_error(dir.as_str(), &err))?;
        let is_file = entry
            .file_type()
            .map_err(|err| io_error(&file_name, &err))?
            .is_file();
        if is_file && file_name.ends_with(TASK_FILE_EXTENSION) {
            file_names.push(file_name);
        }
    }
    file_names.sort();

    let mut definitions = Vec::with_capacity(file_names.len());
    for file_name in file_names {
        let definition = load_task_file(&root, &file_name)?.with_source(dir.join(&file_name));
        debug!(task = %definition.name(), hash = %definition.hash(), "loaded task definition");
        definitions.push(definition);
    }
    TaskCatalog::new(definitions)
}

fn load_task_file(root: &Dir, file_name: &str) -> Result<TaskDefinition, DefinitionError> {
    let bytes = root.read(file_name).map_err(|err| io_error(file_name, &err))?;
    let text = std::str::from_utf8(&bytes).map_err(|err| DefinitionError::Parse {
        path: file_name.to_owned(),
        reason: err.to_string(),
    })?;
    let file: TaskFile = toml::from_str(text).map_err(|err| DefinitionError::Parse {
        path: file_name.to_owned(),
        reason: err.to_string(),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    for plugin in &file.plugins {
        let plugin_bytes = root
            .read(&plugin.path)
            .map_err(|err| io_error(&plugin.path, &err))?;
        hasher.update(&plugin_bytes);
    }
    let hash = TaskHash::new(hex::encode(hasher.finalize()));

    build_definition(file, hash)
}

/// Parses a single task file's contents with an explicit hash.
///
/// # Errors
///
/// Returns [`DefinitionError`] when the text does not parse or describes an
/// invalid definition.
pub fn parse_task_definition(text: &str, hash: TaskHash) -> Result<TaskDefinition, DefinitionError> {
    let file: TaskFile = toml::from_str(text).map_err(|err| DefinitionError::Parse {
        path: "<inline>".to_owned(),
        reason: err.to_string(),
    })?;
    build_definition(file, hash)
}

fn build_definition(file: TaskFile, hash: TaskHash) -> Result<TaskDefinition, DefinitionError> {
    let name = TaskName::new(file.name)?;
    let mut definition = TaskDefinition::new(name.clone(), hash)
        .with_active(file.active)
        .with_auto_merge(file.auto_merge);

    for input_file in file.inputs {
        definition = definition.with_input(build_input(input_file)?);
    }
    if let Some(trigger_file) = file.trigger {
        definition = definition.with_trigger(build_trigger(&name, trigger_file)?);
    }
    Ok(definition)
}

fn build_input(file: InputFile) -> Result<TaskInput, DefinitionError> {
    let mut input = TaskInput::new(file.name).with_options(file.options);
    if let Some(description) = file.description {
        input = input.with_description(description);
    }
    if let Some(default) = file.default {
        input = input.with_default(default);
    }
    match file.validation {
        Some(pattern) => input.with_validation(&pattern),
        None => Ok(input),
    }
}

fn build_trigger(task: &TaskName, file: TriggerFile) -> Result<TaskTrigger, DefinitionError> {
    let cron = file.cron.as_deref().map(CronSchedule::parse).transpose()?;
    let webhook = file
        .webhook
        .map(|webhook| {
            Ok::<_, DefinitionError>(WebhookTrigger {
                delay: Duration::from_secs(webhook.delay),
                github: build_entries(task, webhook.github)?,
                gitlab: build_entries(task, webhook.gitlab)?,
            })
        })
        .transpose()?;
    Ok(TaskTrigger { cron, webhook })
}

fn build_entries(
    task: &TaskName,
    entries: Vec<WebhookEntryFile>,
) -> Result<Vec<WebhookTriggerEntry>, DefinitionError> {
    entries
        .into_iter()
        .map(|entry| {
            if entry.event.trim().is_empty() {
                return Err(DefinitionError::MissingEvent { task: task.clone() });
            }
            Ok(WebhookTriggerEntry {
                event: entry.event,
                filters: entry.filters,
                run_data: entry.run_data,
            })
        })
        .collect()
}
