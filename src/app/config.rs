use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "today.toml";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Comma separated host names, or `*` for any origin.
    pub allowed_hosts: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            allowed_hosts: "*".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/today.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GithubConfig {
    pub trending_url: String,
    pub freshness_secs: u64,
    pub refresh_interval_secs: u64,
    pub timeout_secs: u64,
    pub limit: usize,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            trending_url: "https://github.com/trending?since=daily".to_string(),
            freshness_secs: 60 * 60,
            refresh_interval_secs: 60 * 60,
            timeout_secs: 20,
            limit: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HackerNewsConfig {
    pub api_base: String,
    pub top_stories: usize,
    pub freshness_secs: u64,
    pub refresh_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HackerNewsConfig {
    fn default() -> Self {
        Self {
            api_base: "https://hacker-news.firebaseio.com/v0".to_string(),
            top_stories: 10,
            freshness_secs: 5 * 60,
            refresh_interval_secs: 15 * 60,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

impl FeedSource {
    fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NewsConfig {
    pub entries_per_feed: usize,
    pub limit: usize,
    pub freshness_secs: u64,
    pub refresh_interval_secs: u64,
    pub timeout_secs: u64,
    pub feeds: Vec<FeedSource>,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            entries_per_feed: 5,
            limit: 25,
            freshness_secs: 60 * 60,
            refresh_interval_secs: 30 * 60,
            timeout_secs: 15,
            feeds: vec![
                FeedSource::new("TechCrunch", "http://feeds.feedburner.com/TechCrunch/"),
                FeedSource::new("Wired", "https://www.wired.com/feed/rss"),
                FeedSource::new("The Verge", "https://www.theverge.com/rss/index.xml"),
                FeedSource::new("Ars Technica", "http://feeds.arstechnica.com/arstechnica/index"),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TickersConfig {
    pub symbols: Vec<String>,
    pub chart_url: String,
    pub freshness_secs: u64,
    pub refresh_interval_secs: u64,
    pub timeout_secs: u64,
    pub rate_limit_backoff_ms: u64,
    pub rate_limit_extension_secs: u64,
}

impl Default for TickersConfig {
    fn default() -> Self {
        Self {
            symbols: ["SPY", "QQQ", "VTI", "VT", "SCHD", "REIT", "IAU"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            chart_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            freshness_secs: 2 * 60,
            refresh_interval_secs: 15 * 60,
            timeout_secs: 10,
            rate_limit_backoff_ms: 2000,
            rate_limit_extension_secs: 30 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub github: GithubConfig,
    pub hackernews: HackerNewsConfig,
    pub news: NewsConfig,
    pub tickers: TickersConfig,
}

impl Config {
    /// Loads the config file (explicit path, else `./today.toml` when present,
    /// else defaults) and applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid config")
    }

    /// `PORT`, `ALLOWED_HOSTS` and `DATABASE_PATH` win over the file.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").filter(|v| !v.trim().is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }
        if let Some(hosts) = lookup("ALLOWED_HOSTS").filter(|v| !v.trim().is_empty()) {
            self.server.allowed_hosts = hosts;
        }
        if let Some(path) = lookup("DATABASE_PATH").filter(|v| !v.trim().is_empty()) {
            self.database.path = PathBuf::from(path);
        }
        Ok(())
    }
}

macro_rules! source_timings {
    ($($config:ty),+ $(,)?) => {
        $(
            impl $config {
                pub fn freshness(&self) -> Duration {
                    Duration::from_secs(self.freshness_secs)
                }

                /// `None` when the scheduled job is disabled.
                pub fn refresh_interval(&self) -> Option<Duration> {
                    (self.refresh_interval_secs > 0)
                        .then(|| Duration::from_secs(self.refresh_interval_secs))
                }

                pub fn timeout(&self) -> Duration {
                    Duration::from_secs(self.timeout_secs)
                }
            }
        )+
    };
}

source_timings!(GithubConfig, HackerNewsConfig, NewsConfig, TickersConfig);
