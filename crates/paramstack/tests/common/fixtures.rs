//! Settings types used across the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DataSource {
    /// Connection URL
    pub url: String,
    /// Login user
    pub user: Option<String>,
    /// Login password
    #[schemars(extend("x-secret" = true))]
    pub password: String,
    pub pool_size: u32,
}

impl Default for DataSource {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/app".to_string(),
            user: None,
            password: "changeme".to_string(),
            pool_size: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Fast,
    Safe,
}

/// Settings exercised by the aggregation and watch tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AppSettings {
    /// The main value
    pub value: i32,
    /// Items appended by every source
    pub list: Vec<String>,
    pub check: Option<bool>,
    pub mode: Mode,
    /// Primary database
    pub db: DataSource,
    /// Free-form labels
    pub labels: BTreeMap<String, String>,
    pub endpoints: Vec<Endpoint>,
    #[schemars(extend("x-comment" = "How long to wait for a reply"))]
    pub timeout: Duration,
    pub started: DateTime<Utc>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            value: 0,
            list: Vec::new(),
            check: None,
            mode: Mode::Fast,
            db: DataSource::default(),
            labels: BTreeMap::new(),
            endpoints: Vec::new(),
            timeout: Duration::from_secs(30),
            started: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }
}

/// A type that contains itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TreeNode {
    pub name: String,
    pub children: Vec<TreeNode>,
    pub parent: Option<Box<TreeNode>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Ping {
    pub label: String,
    pub pong: Option<Box<Pong>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Pong {
    pub count: u32,
    pub ping: Option<Box<Ping>>,
}

/// Settings whose graph loops back on itself directly and through a pair of
/// types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RecursiveSettings {
    pub tree: TreeNode,
    pub ping: Ping,
    pub again: Option<Box<RecursiveSettings>>,
}
