//! Diesel schema for the `SQLite` run ledger.

diesel::table! {
    /// Task records synced from task definitions.
    tasks (id) {
        /// Row identifier.
        id -> BigInt,
        /// Unique task name.
        name -> Text,
        /// Content hash of the most recently synced definition.
        hash -> Text,
        /// Whether the task is active.
        active -> Bool,
    }
}

diesel::table! {
    /// Scheduled, running and completed runs.
    runs (id) {
        /// Monotonic run identifier.
        id -> BigInt,
        /// Task the run executes.
        task_name -> Text,
        /// Lifecycle status.
        status -> Text,
        /// Creation reason.
        reason -> Text,
        /// Earliest claim time, UTC microseconds.
        schedule_after -> BigInt,
        /// Claim time, UTC microseconds.
        started_at -> Nullable<BigInt>,
        /// Completion time, UTC microseconds.
        finished_at -> Nullable<BigInt>,
        /// Failure message.
        error -> Nullable<Text>,
        /// JSON array of repository names.
        repository_names -> Text,
        /// JSON object of run data.
        run_data -> Text,
    }
}

diesel::table! {
    /// Per-repository outcomes of completed runs.
    task_results (id) {
        /// Row identifier.
        id -> BigInt,
        /// Owning run.
        run_id -> BigInt,
        /// Full repository name.
        repository_name -> Text,
        /// Processor outcome code.
        result -> Integer,
        /// Pull request state.
        state -> Text,
        /// Pull request URL.
        pull_request_url -> Nullable<Text>,
        /// Repository-level error.
        error -> Nullable<Text>,
        /// Record time, UTC microseconds.
        created_at -> BigInt,
    }
}

diesel::joinable!(task_results -> runs (run_id));
diesel::allow_tables_to_appear_in_same_query!(runs, task_results);
