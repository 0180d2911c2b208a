//! Property catalog of derived settings types.

mod common;

use regex::Regex;

use common::{AppSettings, RecursiveSettings};
use paramstack::catalog::walk;
use paramstack::{Aggregator, CatalogOptions, PropertyDescriptor};

fn catalog(options: &CatalogOptions) -> Vec<PropertyDescriptor> {
    walk(&AppSettings::default(), options)
}

fn find<'a>(entries: &'a [PropertyDescriptor], name: &str) -> &'a PropertyDescriptor {
    entries
        .iter()
        .find(|entry| entry.name == name)
        .unwrap_or_else(|| panic!("{} not listed in {:?}", name, names(entries)))
}

fn names(entries: &[PropertyDescriptor]) -> Vec<&str> {
    let mut names: Vec<_> = entries.iter().map(|entry| entry.name.as_str()).collect();
    names.sort_unstable();
    names
}

#[test]
fn test_lists_every_leaf_property() {
    let entries = catalog(&CatalogOptions::default());
    assert_eq!(
        names(&entries),
        vec![
            "check",
            "db.password",
            "db.pool_size",
            "db.url",
            "db.user",
            "endpoints[<n>].host",
            "endpoints[<n>].port",
            "labels.<xxx>",
            "list[<n>]",
            "mode",
            "started",
            "timeout",
            "value",
        ]
    );
}

#[test]
fn test_types_and_env_eligibility() {
    let entries = catalog(&CatalogOptions::default());

    let pool = find(&entries, "db.pool_size");
    assert_eq!(pool.type_name, "integer(uint32)");
    assert!(pool.can_be_env_var);
    assert_eq!(pool.default_value.as_deref(), Some("4"));

    assert_eq!(find(&entries, "value").type_name, "integer(int32)");
    assert_eq!(find(&entries, "check").type_name, "boolean");
    assert_eq!(find(&entries, "check").default_value, None);
    assert_eq!(find(&entries, "mode").type_name, "Mode");
    assert_eq!(find(&entries, "mode").default_value.as_deref(), Some("fast"));
    assert_eq!(find(&entries, "endpoints[<n>].port").type_name, "integer(uint16)");

    assert!(!find(&entries, "list[<n>]").can_be_env_var);
    assert!(!find(&entries, "endpoints[<n>].host").can_be_env_var);
    assert!(find(&entries, "labels.<xxx>").can_be_env_var);
    assert_eq!(find(&entries, "labels.<xxx>").default_value, None);
}

#[test]
fn test_comments_join_parent_and_child() {
    let entries = catalog(&CatalogOptions::default());

    assert_eq!(
        find(&entries, "db.url").comment.as_deref(),
        Some("Primary database, Connection URL")
    );
    assert_eq!(
        find(&entries, "db.pool_size").comment.as_deref(),
        Some("Primary database")
    );
    assert_eq!(
        find(&entries, "list[<n>]").comment.as_deref(),
        Some("Items appended by every source")
    );
    assert_eq!(find(&entries, "labels.<xxx>").comment.as_deref(), Some("Free-form labels"));
    assert_eq!(find(&entries, "endpoints[<n>].host").comment, None);
    assert_eq!(
        find(&entries, "timeout").comment.as_deref(),
        Some("How long to wait for a reply")
    );
}

#[test]
fn test_secret_defaults_are_masked() {
    let entries = catalog(&CatalogOptions::default());
    assert_eq!(find(&entries, "db.password").default_value.as_deref(), Some("********"));
    assert_eq!(
        find(&entries, "db.url").default_value.as_deref(),
        Some("postgres://localhost/app")
    );

    let mut blank = AppSettings::default();
    blank.db.password.clear();
    let entries = walk(&blank, &CatalogOptions::default());
    assert_eq!(find(&entries, "db.password").default_value.as_deref(), Some(""));
}

#[test]
fn test_time_types_are_single_values() {
    let entries = catalog(&CatalogOptions::default());

    let timeout = find(&entries, "timeout");
    assert_eq!(timeout.type_name, "Duration");
    assert!(!timeout.undocumented);

    let started = find(&entries, "started");
    assert_eq!(started.type_name, "string(date-time)");
    assert_eq!(started.default_value.as_deref(), Some("2024-01-01T00:00:00Z"));
}

#[test]
fn test_self_referential_types_terminate() {
    let entries = walk(&RecursiveSettings::default(), &CatalogOptions::default());
    assert_eq!(names(&entries), vec!["ping.label", "ping.pong.count", "tree.name"]);
}

#[test]
fn test_terminal_and_undocumented_patterns() {
    let options = CatalogOptions::default()
        .terminal_type(Regex::new("^DataSource$").unwrap())
        .undocumented_type(Regex::new("^Endpoint$").unwrap());
    let entries = catalog(&options);

    let db = find(&entries, "db");
    assert_eq!(db.type_name, "DataSource");
    assert!(!db.undocumented);
    assert!(db.default_value.as_deref().unwrap().contains("postgres://localhost/app"));
    assert!(!entries.iter().any(|entry| entry.name.starts_with("db.")));

    let endpoints = find(&entries, "endpoints[<n>]");
    assert!(endpoints.undocumented);
    assert_eq!(endpoints.type_name, "Endpoint");
    assert!(!entries.iter().any(|entry| entry.name.starts_with("endpoints[<n>].")));
}

#[test]
fn test_prefix_is_joined_with_a_dot() {
    for prefix in ["app", "app."] {
        let entries = catalog(&CatalogOptions::new(prefix));
        assert_eq!(find(&entries, "app.db.url").type_name, "string");
        assert!(find(&entries, "app.list[<n>]").env_var_name("app").is_none());
        assert!(entries.iter().all(|entry| entry.name.starts_with("app.")));
    }
}

#[test]
fn test_documentation_through_aggregator() {
    let aggregator = Aggregator::builder()
        .with_constructor(AppSettings::default)
        .build()
        .unwrap();
    let entries = aggregator.documentation(&AppSettings::default(), &CatalogOptions::default());
    assert_eq!(entries, catalog(&CatalogOptions::default()));

    let json = serde_json::to_value(find(&entries, "db.url")).unwrap();
    assert_eq!(json["typeName"], "string");
    assert_eq!(json["canBeEnvVar"], true);
    assert!(json.get("comment").is_some());
}
