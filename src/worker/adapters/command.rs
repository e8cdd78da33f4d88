//! Processor that hands each unit of work to an external program.
//!
//! The program receives the work through environment variables and prints a
//! JSON array of repository outcomes on stdout:
//!
//! ```json
//! [{"repositoryName": "org/repo", "result": 0, "state": "open",
//!   "pullRequestUrl": "https://example.test/org/repo/pull/1"}]
//! ```

use crate::definition::domain::TaskCatalog;
use crate::run::domain::RepositoryOutcome;
use crate::worker::{
    domain::WorkItem,
    ports::{Processor, ProcessorError},
};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

/// Environment variable carrying the run ID.
pub const RUN_ID_ENV: &str = "REPOWRIGHT_RUN_ID";
/// Environment variable carrying the task name.
pub const TASK_NAME_ENV: &str = "REPOWRIGHT_TASK_NAME";
/// Environment variable carrying the task file path.
pub const TASK_FILE_ENV: &str = "REPOWRIGHT_TASK_FILE";
/// Environment variable carrying the JSON array of repository names.
pub const REPOSITORIES_ENV: &str = "REPOWRIGHT_REPOSITORIES";
/// Environment variable carrying the JSON object of run data.
pub const RUN_DATA_ENV: &str = "REPOWRIGHT_RUN_DATA";

/// Runs a configured program once per work item.
///
/// The worker's own task catalog must hold the task with the hash the server
/// reported; otherwise the item fails without starting the program.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    program: String,
    args: Vec<String>,
    catalog: Arc<TaskCatalog>,
}

impl CommandProcessor {
    /// Creates a processor invoking `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>, catalog: Arc<TaskCatalog>) -> Self {
        Self {
            program: program.into(),
            args,
            catalog,
        }
    }
}

#[async_trait]
impl Processor for CommandProcessor {
    async fn process(&self, item: &WorkItem) -> Result<Vec<RepositoryOutcome>, ProcessorError> {
        let definition = self
            .catalog
            .get(&item.task_name)
            .ok_or_else(|| ProcessorError::UnknownTask(item.task_name.clone()))?;
        if definition.hash() != &item.task_hash {
            return Err(ProcessorError::HashMismatch {
                task: item.task_name.clone(),
                expected: item.task_hash.as_str().to_owned(),
                actual: definition.hash().as_str().to_owned(),
            });
        }

        let repositories = serde_json::to_string(&item.repositories)
            .map_err(|err| ProcessorError::Execution(err.to_string()))?;
        let run_data = serde_json::to_string(&item.run_data)
            .map_err(|err| ProcessorError::Execution(err.to_string()))?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env(RUN_ID_ENV, item.run_id.to_string())
            .env(TASK_NAME_ENV, item.task_name.as_str())
            .env(REPOSITORIES_ENV, repositories)
            .env(RUN_DATA_ENV, run_data)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(source) = definition.source() {
            command.env(TASK_FILE_ENV, source.as_str());
        }

        debug!(run_id = %item.run_id, program = %self.program, "starting processor");
        let output = command.output().await.map_err(|err| {
            ProcessorError::Execution(format!("failed to start {}: {err}", self.program))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessorError::Execution(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        parse_outcomes(&output.stdout)
    }
}

/// Parses the processor's stdout; blank output means no repositories.
fn parse_outcomes(stdout: &[u8]) -> Result<Vec<RepositoryOutcome>, ProcessorError> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(stdout)
        .map_err(|err| ProcessorError::Execution(format!("invalid processor output: {err}")))
}

#[cfg(test)]
mod tests {
    use super::parse_outcomes;
    use crate::run::domain::TaskResultState;
    use rstest::rstest;

    #[rstest]
    fn blank_output_means_no_outcomes() {
        let outcomes = parse_outcomes(b"  \n").expect("blank output parses");
        assert!(outcomes.is_empty());
    }

    #[rstest]
    fn outcomes_are_read_from_json() {
        let outcomes = parse_outcomes(
            br#"[{"repositoryName":"org/a","result":0,"state":"merged"}]"#,
        )
        .expect("valid output parses");
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes.first().map(|o| o.state), Some(TaskResultState::Merged));
    }

    #[rstest]
    fn malformed_output_is_an_execution_error() {
        let err = parse_outcomes(b"not json").expect_err("garbage must fail");
        assert!(err.to_string().contains("invalid processor output"));
    }
}
