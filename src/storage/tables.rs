use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, Row};

use super::Database;
use crate::cache::{CacheStore, CachedRecordSet, PutReport};
use crate::github::{Contributor, Repository};
use crate::hackernews::Story;
use crate::news::NewsItem;

/// A record type persisted as rows of one table, deduplicated by its
/// natural key with replace-on-conflict.
pub trait TableRecord: Clone + Send + Sync + 'static {
    const TABLE: &'static str;

    /// Selects fresh rows: `?1` is the exclusive cutoff in unix millis and
    /// `?2` the row limit. Must include the `fetched_at` column.
    const SELECT_FRESH: &'static str;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn upsert(&self, conn: &Connection, fetched_at_ms: i64) -> anyhow::Result<()>;

    /// Natural key, for log lines.
    fn describe(&self) -> String;
}

impl TableRecord for Repository {
    const TABLE: &'static str = "github_repositories";

    const SELECT_FRESH: &'static str = r#"
        SELECT author, name, avatar, url, description, language, language_color,
               stars, forks, current_period_stars, built_by, fetched_at
        FROM github_repositories
        WHERE fetched_at > ?1
        ORDER BY current_period_stars DESC, stars DESC
        LIMIT ?2
    "#;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut repo = Repository {
            author: row.get("author")?,
            name: row.get("name")?,
            avatar: row.get("avatar")?,
            url: row.get("url")?,
            description: row.get("description")?,
            language: row.get("language")?,
            language_color: row.get("language_color")?,
            stars: row.get::<_, i64>("stars")?.max(0) as u64,
            forks: row.get::<_, i64>("forks")?.max(0) as u64,
            current_period_stars: row.get::<_, i64>("current_period_stars")?.max(0) as u64,
            built_by: Vec::new(),
        };

        let built_by: Option<String> = row.get("built_by")?;
        if let Some(json) = built_by {
            match serde_json::from_str::<Vec<Contributor>>(&json) {
                Ok(contributors) => repo.built_by = contributors,
                Err(e) => tracing::warn!(
                    "Failed to decode contributors for {}: {}",
                    repo.full_name(),
                    e
                ),
            }
        }

        Ok(repo)
    }

    fn upsert(&self, conn: &Connection, fetched_at_ms: i64) -> anyhow::Result<()> {
        let built_by = serde_json::to_string(&self.built_by)?;
        // Without a language the colour is meaningless.
        let language_color = if self.language.is_empty() {
            ""
        } else {
            self.language_color.as_str()
        };

        conn.execute(
            r#"
            INSERT INTO github_repositories
                (author, name, avatar, url, description, language, language_color,
                 stars, forks, current_period_stars, built_by, fetched_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(author, name) DO UPDATE SET
                avatar = excluded.avatar,
                url = excluded.url,
                description = excluded.description,
                language = excluded.language,
                language_color = excluded.language_color,
                stars = excluded.stars,
                forks = excluded.forks,
                current_period_stars = excluded.current_period_stars,
                built_by = excluded.built_by,
                fetched_at = MAX(fetched_at, excluded.fetched_at)
            "#,
            params![
                self.author,
                self.name,
                self.avatar,
                self.url,
                self.description,
                self.language,
                language_color,
                self.stars as i64,
                self.forks as i64,
                self.current_period_stars as i64,
                built_by,
                fetched_at_ms,
            ],
        )?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.full_name()
    }
}

impl TableRecord for Story {
    const TABLE: &'static str = "hackernews_stories";

    const SELECT_FRESH: &'static str = r#"
        SELECT id, by, descendants, score, time, title, type, url, fetched_at
        FROM hackernews_stories
        WHERE fetched_at > ?1
        ORDER BY score DESC
        LIMIT ?2
    "#;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Story {
            id: row.get::<_, i64>("id")? as u64,
            by: row.get("by")?,
            descendants: row.get::<_, i64>("descendants")?.max(0) as u64,
            score: row.get("score")?,
            time: row.get("time")?,
            title: row.get("title")?,
            kind: row.get("type")?,
            url: row.get("url")?,
        })
    }

    fn upsert(&self, conn: &Connection, fetched_at_ms: i64) -> anyhow::Result<()> {
        conn.execute(
            r#"
            INSERT INTO hackernews_stories
                (id, by, descendants, score, time, title, type, url, fetched_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                by = excluded.by,
                descendants = excluded.descendants,
                score = excluded.score,
                time = excluded.time,
                title = excluded.title,
                type = excluded.type,
                url = excluded.url,
                fetched_at = MAX(fetched_at, excluded.fetched_at)
            "#,
            params![
                self.id as i64,
                self.by,
                self.descendants as i64,
                self.score,
                self.time,
                self.title,
                self.kind,
                self.url,
                fetched_at_ms,
            ],
        )?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("story {}", self.id)
    }
}

impl TableRecord for NewsItem {
    const TABLE: &'static str = "rss_news";

    const SELECT_FRESH: &'static str = r#"
        SELECT source, title, link, fetched_at
        FROM rss_news
        WHERE fetched_at > ?1
        ORDER BY fetched_at DESC, id ASC
        LIMIT ?2
    "#;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(NewsItem {
            source: row.get("source")?,
            title: row.get("title")?,
            link: row.get("link")?,
        })
    }

    fn upsert(&self, conn: &Connection, fetched_at_ms: i64) -> anyhow::Result<()> {
        conn.execute(
            r#"
            INSERT INTO rss_news (source, title, link, fetched_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(link) DO UPDATE SET
                source = excluded.source,
                title = excluded.title,
                fetched_at = MAX(fetched_at, excluded.fetched_at)
            "#,
            params![self.source, self.title, self.link, fetched_at_ms],
        )?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.link.clone()
    }
}

/// Table-backed [`CacheStore`]: a hit is a time-bounded query that returns
/// at least one row.
pub struct SqliteCache<T> {
    key: String,
    db: Database,
    window: Duration,
    limit: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: TableRecord> SqliteCache<T> {
    pub fn new(key: impl Into<String>, db: Database, window: Duration, limit: usize) -> Self {
        Self {
            key: key.into(),
            db,
            window,
            limit,
            _record: PhantomData,
        }
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

#[async_trait]
impl<T: TableRecord> CacheStore<T> for SqliteCache<T> {
    fn key(&self) -> &str {
        &self.key
    }

    async fn get(&self) -> anyhow::Result<Option<CachedRecordSet<T>>> {
        let window_ms = i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp_millis().saturating_sub(window_ms);
        let limit = i64::try_from(self.limit).unwrap_or(i64::MAX);
        let key = self.key.clone();

        let rows = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(T::SELECT_FRESH)?;
                let mapped = stmt.query_map(params![cutoff, limit], |row| {
                    Ok((row.get::<_, i64>("fetched_at")?, T::from_row(row)))
                })?;

                let mut rows = Vec::new();
                for item in mapped {
                    match item? {
                        (fetched_at, Ok(record)) => rows.push((fetched_at, record)),
                        (_, Err(e)) => {
                            tracing::warn!("[{}] Failed to read row from {}: {}", key, T::TABLE, e)
                        }
                    }
                }
                Ok(rows)
            })
            .await?;

        let Some(newest) = rows.iter().map(|(fetched_at, _)| *fetched_at).max() else {
            return Ok(None);
        };

        Ok(Some(CachedRecordSet {
            records: rows.into_iter().map(|(_, record)| record).collect(),
            fetched_at: millis_to_datetime(newest),
        }))
    }

    async fn put(&self, records: &[T]) -> anyhow::Result<PutReport> {
        let records = records.to_vec();
        let fetched_at_ms = Utc::now().timestamp_millis();
        let key = self.key.clone();

        self.db
            .call(move |conn| {
                let mut report = PutReport::default();
                for record in &records {
                    match record.upsert(conn, fetched_at_ms) {
                        Ok(()) => report.stored += 1,
                        Err(e) => {
                            tracing::warn!(
                                "[{}] Failed to store {} in {}: {}",
                                key,
                                record.describe(),
                                T::TABLE,
                                e
                            );
                            report.failed += 1;
                        }
                    }
                }
                Ok(report)
            })
            .await
    }
}
