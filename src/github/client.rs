use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use scraper::{ElementRef, Html, Selector};

use super::types::{Contributor, Repository};
use crate::error::{check_status, FetchError};
use crate::pipeline::Fetcher;
use crate::util::{extract_color, extract_int, squash_whitespace};

const GITHUB_BASE_URL: &str = "https://github.com";

// GitHub serves a reduced page to unknown clients.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

pub struct TrendingClient {
    client: reqwest::Client,
    trending_url: String,
}

impl TrendingClient {
    pub fn new(trending_url: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            trending_url: trending_url.to_string(),
        })
    }

    pub async fn fetch_trending(&self) -> Result<Vec<Repository>, FetchError> {
        let url = self.trending_url.as_str();
        tracing::info!("[GitHub] Fetching trending repositories from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::request(url, e))?;

        tracing::info!("[GitHub] Response status from {}: {}", url, response.status());

        let body = check_status(response, url)?
            .text()
            .await
            .map_err(|e| FetchError::request(url, e))?;

        let repos = parse_trending(&body)?;
        tracing::info!("[GitHub] Parsed {} repositories from HTML", repos.len());
        Ok(repos)
    }
}

#[async_trait]
impl Fetcher<Repository> for TrendingClient {
    async fn fetch(&self) -> Result<Vec<Repository>, FetchError> {
        self.fetch_trending().await
    }
}

struct Selectors {
    article: Selector,
    title_link: Selector,
    description: Selector,
    language: Selector,
    language_color: Selector,
    stars: Selector,
    forks: Selector,
    period_stars: Selector,
    span: Selector,
    link: Selector,
    img: Selector,
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::parse(format!("selector {}", css), e))
}

impl Selectors {
    fn new() -> Result<Self, FetchError> {
        Ok(Self {
            article: selector("article.Box-row")?,
            title_link: selector("h2 a")?,
            description: selector("p")?,
            language: selector("span[itemprop='programmingLanguage']")?,
            language_color: selector(".repo-language-color")?,
            stars: selector("a[href$='/stargazers']")?,
            forks: selector("a[href$='/forks']")?,
            period_stars: selector("span.float-sm-right")?,
            span: selector("span")?,
            link: selector("a")?,
            img: selector("img")?,
        })
    }
}

/// Parses the trending page. Entries missing their repository link are
/// skipped; a page that yields no repository at all is a parse failure.
pub fn parse_trending(html: &str) -> Result<Vec<Repository>, FetchError> {
    let document = Html::parse_document(html);
    let sel = Selectors::new()?;

    let articles: Vec<ElementRef> = document.select(&sel.article).collect();
    if articles.is_empty() {
        return Err(FetchError::parse(
            "GitHub trending page",
            "no repository entries found",
        ));
    }

    let mut repos = Vec::with_capacity(articles.len());
    for (i, article) in articles.into_iter().enumerate() {
        match parse_article(article, &sel) {
            Some(repo) => repos.push(repo),
            None => tracing::warn!(
                "[GitHub Parser] Skipping entry {}: could not determine repository",
                i
            ),
        }
    }
    if repos.is_empty() {
        return Err(FetchError::parse(
            "GitHub trending page",
            "no entry could be parsed",
        ));
    }
    Ok(repos)
}

fn text_of(element: ElementRef) -> String {
    squash_whitespace(&element.text().collect::<String>())
}

fn owner_and_repo(path: &str) -> Option<(String, String)> {
    let mut parts = path.split('/').map(str::trim).filter(|p| !p.is_empty());
    let owner = parts.next()?;
    let repo = parts.next()?;
    Some((owner.to_string(), repo.to_string()))
}

fn absolute_url(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", GITHUB_BASE_URL, href)
    } else {
        format!("{}/{}", GITHUB_BASE_URL, href)
    }
}

fn parse_article(article: ElementRef, sel: &Selectors) -> Option<Repository> {
    let link = article.select(&sel.title_link).next()?;
    let href = link.value().attr("href")?.trim();

    let full_name = text_of(link).replace(' ', "");
    let (author, name) = owner_and_repo(&full_name).or_else(|| owner_and_repo(href))?;

    let language = article
        .select(&sel.language)
        .next()
        .map(text_of)
        .unwrap_or_default();
    let language_color = if language.is_empty() {
        String::new()
    } else {
        article
            .select(&sel.language_color)
            .next()
            .and_then(|el| el.value().attr("style"))
            .and_then(extract_color)
            .unwrap_or_default()
    };

    let period_stars_text = article
        .select(&sel.period_stars)
        .next()
        .map(text_of)
        .or_else(|| {
            article
                .select(&sel.span)
                .map(text_of)
                .find(|text| text.contains("stars today"))
        })
        .unwrap_or_default();

    let built_by = parse_contributors(article, sel, &author, &name);

    Some(Repository {
        avatar: format!("{}/{}.png?size=40", GITHUB_BASE_URL, author),
        url: absolute_url(href),
        description: article
            .select(&sel.description)
            .next()
            .map(text_of)
            .unwrap_or_default(),
        language,
        language_color,
        stars: article.select(&sel.stars).next().map(text_of).map_or(0, |t| extract_int(&t)),
        forks: article.select(&sel.forks).next().map(text_of).map_or(0, |t| extract_int(&t)),
        current_period_stars: extract_int(&period_stars_text),
        built_by,
        author,
        name,
    })
}

fn parse_contributors(
    article: ElementRef,
    sel: &Selectors,
    author: &str,
    name: &str,
) -> Vec<Contributor> {
    let Some(built_by) = article
        .select(&sel.span)
        .find(|span| text_of(*span).starts_with("Built by"))
    else {
        return Vec::new();
    };

    let mut contributors = Vec::new();
    for link in built_by.select(&sel.link) {
        let href = link.value().attr("href");
        let img = link.select(&sel.img).next();
        let avatar = img.and_then(|img| img.value().attr("src"));

        let username = href
            .and_then(|h| h.trim_start_matches('/').split('/').next())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .or_else(|| {
                img.and_then(|img| img.value().attr("alt"))
                    .map(|alt| alt.trim_start_matches('@').to_string())
                    .filter(|u| !u.is_empty())
            });

        match (href, avatar, username) {
            (Some(href), Some(avatar), Some(username)) => contributors.push(Contributor {
                username,
                href: absolute_url(href.trim()),
                avatar: avatar.to_string(),
            }),
            (href, avatar, username) => tracing::debug!(
                "[GitHub Parser] Incomplete contributor for {}/{} (href: {}, avatar: {}, user: {:?})",
                author,
                name,
                href.is_some(),
                avatar.is_some(),
                username
            ),
        }
    }
    contributors
}
