use serde::{Deserialize, Serialize};

/// A story item as served by the Hacker News item API. `id` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Story {
    pub id: u64,
    #[serde(default)]
    pub by: String,
    #[serde(default)]
    pub descendants: u64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Absent for text posts such as "Ask HN".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
