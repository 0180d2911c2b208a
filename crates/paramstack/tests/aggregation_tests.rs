//! End-to-end tests for ordered aggregation across every source kind.

mod common;

use common::{AppSettings, CollectingProblems, Mode, TestHarness};
use serde_json::json;
use serial_test::serial;

use paramstack::{
    Aggregator, BuildError, CommandLineSource, EnvironmentSource, Format, FnSource, ProblemKind,
    SecretsSource, Services, SourceError, SystemProperties,
};

fn builder() -> paramstack::AggregatorBuilder<AppSettings> {
    Aggregator::builder().with_constructor(AppSettings::default)
}

#[test]
fn test_properties_then_environment_scenario() {
    let harness = TestHarness::new();
    let file = harness.write_config("app.properties", "value=17\nlist[0]=first\n");

    let aggregator = builder()
        .with_file(&file, Format::Properties)
        .with_source(EnvironmentSource::from_map(
            [("PREFIX_VALUE", "19"), ("PREFIX_LIST[1]", "second")],
            "prefix",
        ))
        .build()
        .unwrap();

    let settings = aggregator.gather();
    assert_eq!(settings.value, 19);
    assert_eq!(settings.list, vec!["first", "second"]);
}

#[test]
fn test_later_source_wins_for_scalars() {
    let harness = TestHarness::new();
    let a = harness.write_config("a.yaml", "value: 1\ndb:\n  url: from-a\n");
    let b = harness.write_config("b.json", r#"{"value": 2}"#);

    let forward = builder()
        .with_file(&a, Format::Yaml)
        .with_file(&b, Format::Json)
        .build()
        .unwrap()
        .gather();
    assert_eq!(forward.value, 2);
    assert_eq!(forward.db.url, "from-a");

    let reversed = builder()
        .with_file(&b, Format::Json)
        .with_file(&a, Format::Yaml)
        .build()
        .unwrap()
        .gather();
    assert_eq!(reversed.value, 1);
}

#[test]
fn test_lists_and_maps_are_additive() {
    let harness = TestHarness::new();
    let a = harness.write_config(
        "a.yaml",
        "list: [a1, a2]\nlabels:\n  team: core\nendpoints:\n  - host: one\n    port: 80\n",
    );
    let b = harness.write_config(
        "b.toml",
        "list = [\"b1\"]\n[labels]\ntier = \"gold\"\n[[endpoints]]\nhost = \"two\"\nport = 81\n",
    );

    let settings = builder()
        .with_file(&a, Format::Yaml)
        .with_file(&b, Format::Toml)
        .build()
        .unwrap()
        .gather();

    assert_eq!(settings.list, vec!["a1", "a2", "b1"]);
    assert_eq!(settings.labels.len(), 2);
    let hosts: Vec<_> = settings.endpoints.iter().map(|e| e.host.as_str()).collect();
    assert_eq!(hosts, vec!["one", "two"]);
    assert_eq!(settings.endpoints[1].port, 81);
}

#[test]
fn test_running_a_source_twice_duplicates_list_entries() {
    let harness = TestHarness::new();
    let file = harness.write_config("a.yaml", "list: [x]\nvalue: 3\n");
    let settings = builder()
        .with_file(&file, Format::Yaml)
        .with_file(&file, Format::Yaml)
        .build()
        .unwrap()
        .gather();
    assert_eq!(settings.value, 3);
    assert_eq!(settings.list, vec!["x", "x"]);
}

#[test]
fn test_prefix_filtering() {
    let properties: SystemProperties = [("app.value", "1"), ("other.value", "2")]
        .into_iter()
        .collect();
    let settings = builder()
        .with_system_properties(properties, "app")
        .build()
        .unwrap()
        .gather();
    assert_eq!(settings.value, 1);
}

#[test]
fn test_every_source_kind_in_order() {
    let harness = TestHarness::new();
    harness.write_config("10-base.yaml", "value: 1\nmode: safe\n");
    harness.write_config("20-more.properties", "list[0]=from-dir\n");
    harness.write_secret("db/password", "s3cret");
    harness.write_secret("db/user", "svc");

    let properties = SystemProperties::new();
    properties.set("app.db.pool_size", "16");

    let settings = builder()
        .with_embedded("defaults", "value: 0\nlist: [embedded]\n", Format::Yaml)
        .with_dir(&harness.config_dir, [Format::Yaml, Format::Properties])
        .with_secrets(SecretsSource::new(&harness.secrets_dir))
        .with_system_properties(properties, "app")
        .with_source(CommandLineSource::new(["--app.check", "app.value=5"], "app"))
        .build()
        .unwrap()
        .gather();

    assert_eq!(settings.value, 5);
    assert_eq!(settings.mode, Mode::Safe);
    assert_eq!(settings.list, vec!["embedded", "from-dir"]);
    assert_eq!(settings.db.password, "s3cret");
    assert_eq!(settings.db.user.as_deref(), Some("svc"));
    assert_eq!(settings.db.pool_size, 16);
    assert_eq!(settings.check, Some(true));
}

#[test]
fn test_failing_source_is_skipped() {
    let harness = TestHarness::new();
    let good = harness.write_config("good.yaml", "value: 4\n");
    let broken = harness.write_config("broken.yaml", "value: [unterminated\n");

    let failing = FnSource::new(
        "always fails",
        |_: &Services<'_, AppSettings>, _: AppSettings| -> Result<AppSettings, SourceError> {
            Err(SourceError::Other("unavailable".to_string()))
        },
    );

    let settings = builder()
        .with_file(&good, Format::Yaml)
        .with_file(&broken, Format::Yaml)
        .with_source(failing)
        .with_command_line(["list=after"], "")
        .build()
        .unwrap()
        .gather();

    assert_eq!(settings.value, 4);
    assert_eq!(settings.list, vec!["after"]);
}

#[test]
fn test_problems_are_reported_and_do_not_abort() {
    let harness = TestHarness::new();
    let file = harness.write_config(
        "app.properties",
        "value=seventeen\nunknown.key=1\nmode=turbo\ndb.url=jdbc:x\n",
    );
    let problems = CollectingProblems::default();

    let settings = builder()
        .with_problem_handler(problems.handler())
        .with_file(&file, Format::Properties)
        .build()
        .unwrap()
        .gather();

    assert_eq!(settings.value, 0);
    assert_eq!(settings.mode, Mode::Fast);
    assert_eq!(settings.db.url, "jdbc:x");

    let reported: Vec<_> = problems
        .problems()
        .into_iter()
        .map(|p| (p.kind, p.path))
        .collect();
    assert_eq!(
        reported,
        vec![
            (ProblemKind::MalformedValue, "value".to_string()),
            (ProblemKind::UnknownProperty, "unknown".to_string()),
            (ProblemKind::MalformedValue, "mode".to_string()),
        ]
    );
}

#[test]
fn test_snapshot_tracks_last_gather() {
    let aggregator = builder()
        .with_command_line(["value=8"], "")
        .build()
        .unwrap();
    assert!(aggregator.last_snapshot().is_none());

    aggregator.gather();
    let snapshot = aggregator.last_snapshot().unwrap();
    assert_eq!(snapshot["value"], json!(8));
    assert_eq!(snapshot["db"]["pool_size"], json!(4));
}

#[test]
fn test_missing_constructor_is_a_build_error() {
    let result = Aggregator::<AppSettings>::builder()
        .with_command_line(["value=1"], "")
        .build();
    assert!(matches!(result, Err(BuildError::MissingConstructor)));
}

#[test]
#[serial]
fn test_process_environment() {
    std::env::set_var("PSTEST_VALUE", "21");
    std::env::set_var("PSTEST_DB_POOL_SIZE", "9");
    std::env::set_var("PSTEST_LABELS_OWNER", "ops");

    let settings = builder().with_environment("pstest").build().unwrap().gather();

    std::env::remove_var("PSTEST_VALUE");
    std::env::remove_var("PSTEST_DB_POOL_SIZE");
    std::env::remove_var("PSTEST_LABELS_OWNER");

    assert_eq!(settings.value, 21);
    assert_eq!(settings.db.pool_size, 9);
    assert_eq!(settings.labels.get("owner").map(String::as_str), Some("ops"));
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
struct Volume {
    name: String,
    size: u32,
}

#[derive(
    Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize, schemars::JsonSchema,
)]
#[serde(default)]
struct Storage {
    value: i32,
    volume: Option<Volume>,
}

#[test]
fn test_incomplete_nested_value_does_not_sink_the_file() {
    let harness = TestHarness::new();
    let file = harness.write_config("storage.properties", "value=5\nvolume.size=4\n");
    let problems = CollectingProblems::default();

    let settings = Aggregator::builder()
        .with_constructor(Storage::default)
        .with_problem_handler(problems.handler())
        .with_file(&file, Format::Properties)
        .build()
        .unwrap()
        .gather();

    assert_eq!(settings.value, 5);
    assert_eq!(settings.volume, None);
    let reported: Vec<_> = problems
        .problems()
        .into_iter()
        .map(|p| (p.kind, p.path))
        .collect();
    assert_eq!(reported, vec![(ProblemKind::MalformedValue, "volume".to_string())]);
}
