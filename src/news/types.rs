use serde::{Deserialize, Serialize};

/// A news headline. `link` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub source: String,
    pub title: String,
    pub link: String,
}
