pub mod config;

pub use config::{
    Config, DatabaseConfig, FeedSource, GithubConfig, HackerNewsConfig, LogLevel, LoggingConfig,
    NewsConfig, ServerConfig, TickersConfig,
};
