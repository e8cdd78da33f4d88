//! Input validation, cron schedules and catalog construction.

use crate::definition::domain::{
    CronSchedule, DefinitionError, InputProblem, TaskCatalog, TaskDefinition, TaskInput,
};
use crate::run::domain::{RunData, TaskHash, TaskName};
use chrono::{DateTime, TimeZone, Utc};
use rstest::{fixture, rstest};

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0)
        .single()
        .expect("valid test timestamp")
}

fn name(value: &str) -> TaskName {
    TaskName::new(value).expect("valid task name")
}

fn data(pairs: &[(&str, &str)]) -> RunData {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

#[fixture]
fn release() -> TaskDefinition {
    TaskDefinition::new(name("release"), TaskHash::new("h"))
        .with_input(TaskInput::new("version").with_validation(r"^\d+\.\d+\.\d+$").expect("valid pattern"))
        .with_input(
            TaskInput::new("channel")
                .with_options(["stable".to_owned(), "beta".to_owned()])
                .with_default("stable"),
        )
}

#[rstest]
fn valid_run_data_passes(release: TaskDefinition) {
    let result = release.validate_inputs(&data(&[("version", "1.2.3"), ("channel", "beta")]));
    assert_eq!(result, Ok(()));
}

#[rstest]
fn defaulted_inputs_may_be_omitted(release: TaskDefinition) {
    assert_eq!(release.validate_inputs(&data(&[("version", "0.1.0")])), Ok(()));
}

#[rstest]
fn every_problem_is_reported_in_declaration_order(release: TaskDefinition) {
    let err = release
        .validate_inputs(&data(&[("version", "latest"), ("channel", "nightly")]))
        .expect_err("both inputs are invalid");

    assert_eq!(err.task, name("release"));
    assert_eq!(
        err.problems,
        vec![
            InputProblem::PatternMismatch {
                input: "version".to_owned(),
                pattern: r"^\d+\.\d+\.\d+$".to_owned(),
            },
            InputProblem::NotAnOption {
                input: "channel".to_owned(),
                options: vec!["stable".to_owned(), "beta".to_owned()],
            },
        ]
    );
}

#[rstest]
fn empty_value_counts_as_missing(release: TaskDefinition) {
    let err = release
        .validate_inputs(&data(&[("version", "")]))
        .expect_err("version is required");

    assert_eq!(
        err.problems,
        vec![InputProblem::Missing {
            input: "version".to_owned()
        }]
    );
    assert!(err.to_string().contains("input 'version' is required"));
}

#[rstest]
fn undeclared_keys_are_ignored(release: TaskDefinition) {
    let result = release.validate_inputs(&data(&[("version", "2.0.0"), ("extra", "x")]));
    assert_eq!(result, Ok(()));
}

#[rstest]
fn invalid_validation_pattern_is_rejected() {
    let result = TaskInput::new("version").with_validation("(unclosed");

    assert!(matches!(
        result,
        Err(DefinitionError::InvalidInputPattern { input, .. }) if input == "version"
    ));
}

#[rstest]
#[case("*/15 * * * *", at(12, 7), at(12, 15))]
#[case("*/15 * * * *", at(12, 15), at(12, 30))]
#[case("0 9 * * *", at(12, 0), at(9, 0) + chrono::Duration::days(1))]
fn cron_next_tick_is_strictly_after(
    #[case] expression: &str,
    #[case] after: DateTime<Utc>,
    #[case] expected: DateTime<Utc>,
) {
    let schedule = CronSchedule::parse(expression).expect("valid cron");
    assert_eq!(schedule.next_after(after), Some(expected));
}

#[rstest]
#[case("not a cron")]
#[case("61 * * * *")]
fn invalid_cron_is_rejected(#[case] expression: &str) {
    assert!(matches!(
        CronSchedule::parse(expression),
        Err(DefinitionError::InvalidCron { .. })
    ));
}

#[rstest]
fn catalog_rejects_duplicate_names() {
    let result = TaskCatalog::new([
        TaskDefinition::new(name("deps"), TaskHash::new("a")),
        TaskDefinition::new(name("deps"), TaskHash::new("b")),
    ]);

    assert!(matches!(result, Err(DefinitionError::DuplicateTask(task)) if task == name("deps")));
}

#[rstest]
fn catalog_iterates_in_name_order() {
    let catalog = TaskCatalog::new([
        TaskDefinition::new(name("zeta"), TaskHash::new("z")),
        TaskDefinition::new(name("alpha"), TaskHash::new("a")),
    ])
    .expect("unique names");

    let names: Vec<&str> = catalog.iter().map(|definition| definition.name().as_str()).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
    assert_eq!(catalog.len(), 2);
    assert!(catalog.get(&name("alpha")).is_some());
}
