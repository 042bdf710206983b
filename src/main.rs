use std::fs::File;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use today::app::{Config, LoggingConfig};
use today::cache::{FreshnessWindow, MemoryCache};
use today::github::{Repository, TrendingClient};
use today::hackernews::{HackerNewsClient, Story};
use today::http::{self, AppState};
use today::news::{FeedClient, NewsItem};
use today::pipeline::RefreshPipeline;
use today::scheduler::JobScheduler;
use today::storage::{Database, SqliteCache};
use today::tickers::{TickerClient, TickerQuote};

#[derive(Parser)]
#[command(
    name = "today",
    about = "Serves trending repositories, top stories, tech news and ticker quotes",
    version = env!("BUILD_VERSION")
)]
struct Cli {
    /// Config file. Defaults to ./today.toml when present.
    #[arg(long, short, env = "TODAY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overriding the config file.
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on, overriding the config file and PORT.
    #[arg(long, short)]
    port: Option<u16>,

    /// SQLite database path, overriding the config file and DATABASE_PATH.
    #[arg(long)]
    database: Option<PathBuf>,
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

/// Logs to the configured file, or to stderr when there is none or it
/// cannot be opened.
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        format!("today={}", logging.level.as_directive())
            .parse()
            .context("Invalid log directive")?,
    );

    let mut open_failure = None;
    if let Some(path) = &logging.file {
        match open_log_file(path) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .init();
                return Ok(());
            }
            Err(e) => open_failure = Some((path, e)),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    if let Some((path, e)) = open_failure {
        tracing::warn!("Cannot open log file {}, logging to stderr: {}", path.display(), e);
    }
    Ok(())
}

fn schedule<T: Clone + Send + Sync + 'static>(
    scheduler: &mut JobScheduler,
    pipeline: &Arc<RefreshPipeline<T>>,
    interval: Option<Duration>,
) {
    let Some(interval) = interval else {
        tracing::info!("[Scheduler] Scheduled refresh of {} is disabled", pipeline.name());
        return;
    };

    let pipeline = pipeline.clone();
    scheduler.add_job(pipeline.name().to_string(), interval, move || {
        let pipeline = pipeline.clone();
        async move {
            pipeline.refresh().await?;
            Ok::<(), anyhow::Error>(())
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(database) = cli.database {
        config.database.path = database;
    }

    init_logging(&config.logging)?;
    tracing::info!("Starting today {}", env!("BUILD_VERSION"));

    let db = Database::open(&config.database.path)?;
    tracing::info!("Database ready at {}", config.database.path.display());

    let github = Arc::new(RefreshPipeline::<Repository>::new(
        "GitHub",
        Arc::new(TrendingClient::new(
            &config.github.trending_url,
            config.github.timeout(),
        )?),
        Arc::new(SqliteCache::<Repository>::new(
            "github_repos",
            db.clone(),
            config.github.freshness(),
            config.github.limit,
        )),
    ));

    let hackernews = Arc::new(RefreshPipeline::<Story>::new(
        "HackerNews",
        Arc::new(HackerNewsClient::new(
            &config.hackernews.api_base,
            config.hackernews.top_stories,
            config.hackernews.timeout(),
        )?),
        Arc::new(SqliteCache::<Story>::new(
            "hn_stories",
            db.clone(),
            config.hackernews.freshness(),
            config.hackernews.top_stories,
        )),
    ));

    let news = Arc::new(RefreshPipeline::<NewsItem>::new(
        "RSS",
        Arc::new(FeedClient::new(
            config.news.feeds.clone(),
            config.news.entries_per_feed,
            config.news.timeout(),
        )?),
        Arc::new(SqliteCache::<NewsItem>::new(
            "rss_news",
            db.clone(),
            config.news.freshness(),
            config.news.limit,
        )),
    ));

    let ticker_window = Arc::new(FreshnessWindow::new(config.tickers.freshness()));
    let tickers = Arc::new(RefreshPipeline::<TickerQuote>::new(
        "Tickers",
        Arc::new(TickerClient::new(&config.tickers, ticker_window.clone())?),
        Arc::new(MemoryCache::<TickerQuote>::new("tickers", ticker_window)),
    ));

    let mut scheduler = JobScheduler::new();
    schedule(&mut scheduler, &github, config.github.refresh_interval());
    schedule(&mut scheduler, &hackernews, config.hackernews.refresh_interval());
    schedule(&mut scheduler, &news, config.news.refresh_interval());
    schedule(&mut scheduler, &tickers, config.tickers.refresh_interval());
    scheduler.start();

    let state = AppState {
        github,
        hackernews,
        news,
        tickers,
    };
    let router = http::router(state, &config.server.allowed_hosts);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    http::serve(addr, router).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("today.log");
        assert!(open_log_file(&path).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_open_log_file_under_a_regular_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        assert!(open_log_file(&blocker.join("today.log")).is_err());
    }
}
