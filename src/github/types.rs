use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Contributor {
    pub username: String,
    pub href: String,
    pub avatar: String,
}

/// One entry of the trending page. `(author, name)` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub author: String,
    pub name: String,
    pub avatar: String,
    pub url: String,
    pub description: String,
    pub language: String,
    pub language_color: String,
    pub stars: u64,
    pub forks: u64,
    pub current_period_stars: u64,
    #[serde(default)]
    pub built_by: Vec<Contributor>,
}

impl Repository {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.author, self.name)
    }
}
