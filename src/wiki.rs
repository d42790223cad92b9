use crate::cache::{Cache, CacheError};
use crate::lookups::{async_trait, USER_AGENT};
use crate::markup::clean_html;
use crate::ResearchConfig;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Hard cap on `list=search` results per request
pub const MAX_SEARCH_LIMIT: usize = 500;

const CACHE_NAMESPACE: &str = "mediawiki";

#[derive(Error, Debug)]
pub enum WikiError {
    #[error("Article not found: {0}")]
    ArticleNotFound(String),
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("MediaWiki API error {code}: {info}")]
    Api { code: String, info: String },
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("Rate limited, try again later")]
    RateLimited,
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Section entry as reported by `action=parse`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionInfo {
    pub heading: String,
    pub level: u8,
    pub anchor: String,
}

/// Everything fetched for one article revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub page_id: Option<u64>,
    pub revision_id: Option<u64>,
    /// Rendered HTML
    pub html: String,
    /// Wikitext
    pub raw_source: String,
    pub sections: Vec<SectionInfo>,
    pub categories: Vec<String>,
    /// Main-namespace internal links
    pub links: Vec<String>,
    pub external_links: Vec<String>,
    pub canonical_url: String,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub page_id: Option<u64>,
}

/// Where articles come from
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_article(&self, title: &str) -> Result<Article, WikiError>;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, WikiError>;

    /// Titles of main-namespace articles linked from `title`
    async fn get_links(&self, title: &str) -> Result<Vec<String>, WikiError>;

    /// Wikipedia language code
    fn language(&self) -> &str;
}

/// Client for one Wikipedia language edition
pub struct WikipediaClient {
    client: Client,
    api_url: String,
    language: String,
    cache: Cache,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl WikipediaClient {
    pub fn new(config: &ResearchConfig) -> Result<Self, WikiError> {
        let cache = if config.cache_enabled {
            Cache::new(true, config.cache_ttl)?
        } else {
            Cache::disabled()
        };

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            api_url: format!("https://{}.wikipedia.org/w/api.php", config.language),
            language: config.language.clone(),
            cache,
            min_interval: config.request_interval,
            last_request: Mutex::new(None),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Block until `min_interval` has passed since the previous request
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn request(&self, params: &[(&str, String)]) -> Result<Value, WikiError> {
        let mut params = params.to_vec();
        params.push(("format", "json".to_string()));

        let key = format!(
            "{}?{}",
            self.api_url,
            params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&")
        );

        if let Some(cached) = self.cache.get::<Value>(CACHE_NAMESPACE, &key) {
            debug!(%key, "MediaWiki cache hit");
            return Ok(cached);
        }

        self.throttle().await;
        debug!(%key, "MediaWiki request");

        let response = self.client.get(&self.api_url).query(&params).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(WikiError::RateLimited);
        }

        let data: Value = response
            .error_for_status()?
            .json()
            .await
            .map_err(|e| WikiError::ParseError(e.to_string()))?;

        if data.get("error").is_none() {
            if let Err(e) = self.cache.set(CACHE_NAMESPACE, &key, &data) {
                warn!("Failed to cache MediaWiki response: {}", e);
            }
        }

        Ok(data)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct ParseEnvelope {
    parse: Option<ParsePayload>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ParsePayload {
    title: String,
    pageid: Option<u64>,
    revid: Option<u64>,
    text: Option<Starred>,
    wikitext: Option<Starred>,
    #[serde(default)]
    categories: Vec<Starred>,
    #[serde(default)]
    links: Vec<ParseLink>,
    #[serde(default)]
    externallinks: Vec<String>,
    #[serde(default)]
    sections: Vec<ParseSection>,
}

/// Legacy JSON format keeps content under `*`
#[derive(Debug, Deserialize)]
struct Starred {
    #[serde(rename = "*")]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ParseLink {
    ns: i64,
    #[serde(rename = "*")]
    title: String,
}

#[derive(Debug, Deserialize)]
struct ParseSection {
    line: String,
    level: String,
    anchor: String,
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope<T> {
    query: Option<T>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<RawSearchHit>,
}

#[derive(Debug, Deserialize)]
struct RawSearchHit {
    title: String,
    #[serde(default)]
    snippet: String,
    pageid: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LinksQuery {
    #[serde(default)]
    pages: HashMap<String, PageLinks>,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    #[serde(default)]
    links: Vec<LinkTitle>,
}

#[derive(Debug, Deserialize)]
struct LinkTitle {
    title: String,
}

fn api_error(body: ApiErrorBody, title: &str) -> WikiError {
    match body.code.as_str() {
        "missingtitle" | "invalidtitle" | "pagecannotexist" | "missing" => {
            WikiError::ArticleNotFound(title.to_string())
        }
        _ => WikiError::Api {
            code: body.code,
            info: body.info,
        },
    }
}

fn decode<T: serde::de::DeserializeOwned>(data: Value) -> Result<T, WikiError> {
    serde_json::from_value(data).map_err(|e| WikiError::ParseError(e.to_string()))
}

/// MediaWiki titles use underscores in URLs and API lookups
pub fn title_key(title: &str) -> String {
    title.trim().replace(' ', "_")
}

#[async_trait]
impl ArticleSource for WikipediaClient {
    async fn fetch_article(&self, title: &str) -> Result<Article, WikiError> {
        let page = title_key(title);
        let data = self
            .request(&[
                ("action", "parse".to_string()),
                ("page", page.clone()),
                (
                    "prop",
                    "text|wikitext|categories|links|externallinks|sections|revid".to_string(),
                ),
                ("disableeditsection", "true".to_string()),
                ("redirects", "true".to_string()),
            ])
            .await?;

        let envelope: ParseEnvelope = decode(data)?;
        if let Some(error) = envelope.error {
            return Err(api_error(error, title));
        }
        let parse = envelope
            .parse
            .ok_or_else(|| WikiError::ArticleNotFound(title.to_string()))?;

        let sections = parse
            .sections
            .into_iter()
            .map(|s| SectionInfo {
                heading: clean_html(&s.line),
                level: s.level.parse().unwrap_or(2),
                anchor: s.anchor,
            })
            .collect();

        Ok(Article {
            canonical_url: format!(
                "https://{}.wikipedia.org/wiki/{}",
                self.language,
                title_key(&parse.title)
            ),
            title: parse.title,
            page_id: parse.pageid,
            revision_id: parse.revid,
            html: parse.text.map(|t| t.content).unwrap_or_default(),
            raw_source: parse.wikitext.map(|t| t.content).unwrap_or_default(),
            sections,
            categories: parse.categories.into_iter().map(|c| c.content).collect(),
            links: parse
                .links
                .into_iter()
                .filter(|link| link.ns == 0)
                .map(|link| link.title)
                .collect(),
            external_links: parse.externallinks,
            extracted_at: Utc::now(),
        })
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, WikiError> {
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
        let data = self
            .request(&[
                ("action", "query".to_string()),
                ("list", "search".to_string()),
                ("srsearch", query.to_string()),
                ("srlimit", limit.to_string()),
                ("srnamespace", "0".to_string()),
            ])
            .await?;

        let envelope: QueryEnvelope<SearchQuery> = decode(data)?;
        if let Some(error) = envelope.error {
            return Err(api_error(error, query));
        }

        Ok(envelope
            .query
            .map(|q| q.search)
            .unwrap_or_default()
            .into_iter()
            .map(|hit| SearchHit {
                title: hit.title,
                snippet: clean_html(&hit.snippet),
                page_id: hit.pageid,
            })
            .collect())
    }

    async fn get_links(&self, title: &str) -> Result<Vec<String>, WikiError> {
        let data = self
            .request(&[
                ("action", "query".to_string()),
                ("titles", title_key(title)),
                ("prop", "links".to_string()),
                ("plnamespace", "0".to_string()),
                ("pllimit", "500".to_string()),
            ])
            .await?;

        let envelope: QueryEnvelope<LinksQuery> = decode(data)?;
        if let Some(error) = envelope.error {
            return Err(api_error(error, title));
        }

        Ok(envelope
            .query
            .map(|q| q.pages)
            .unwrap_or_default()
            .into_values()
            .flat_map(|page| page.links)
            .map(|link| link.title)
            .collect())
    }

    fn language(&self) -> &str {
        &self.language
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    fn client(server: &ServerGuard) -> WikipediaClient {
        let config = ResearchConfig {
            cache_enabled: false,
            request_interval: Duration::ZERO,
            ..ResearchConfig::default()
        };
        WikipediaClient::new(&config)
            .unwrap()
            .with_api_url(format!("{}/w/api.php", server.url()))
    }

    const PARSE_BODY: &str = r#"{
        "parse": {
            "title": "Test Town",
            "pageid": 42,
            "revid": 1234,
            "text": {"*": "<p>Body</p>"},
            "wikitext": {"*": "Body<ref>{{cite web |url=https://a.example}}</ref>"},
            "categories": [{"sortkey": "", "*": "Towns"}],
            "links": [{"ns": 0, "exists": "", "*": "River"}, {"ns": 14, "*": "Category:Towns"}],
            "externallinks": ["https://a.example"],
            "sections": [
                {"toclevel": 1, "level": "2", "line": "<i>History</i>", "number": "1", "anchor": "History"},
                {"toclevel": 2, "level": "3", "line": "Founding", "number": "1.1", "anchor": "Founding"}
            ]
        }
    }"#;

    #[tokio::test]
    async fn test_fetch_article() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/w/api.php")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("action".into(), "parse".into()),
                Matcher::UrlEncoded("page".into(), "Test_Town".into()),
            ]))
            .with_body(PARSE_BODY)
            .create_async()
            .await;

        let article = client(&server).fetch_article("Test Town").await.unwrap();
        assert_eq!(article.title, "Test Town");
        assert_eq!(article.page_id, Some(42));
        assert_eq!(article.revision_id, Some(1234));
        assert_eq!(article.canonical_url, "https://en.wikipedia.org/wiki/Test_Town");
        assert_eq!(article.categories, vec!["Towns"]);
        assert_eq!(article.links, vec!["River"]);
        assert_eq!(article.sections.len(), 2);
        assert_eq!(article.sections[0].heading, "History");
        assert_eq!(article.sections[1].level, 3);
        assert!(article.raw_source.contains("<ref>"));
    }

    #[tokio::test]
    async fn test_missing_article() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/w/api.php")
            .match_query(Matcher::UrlEncoded("action".into(), "parse".into()))
            .with_body(r#"{"error": {"code": "missingtitle", "info": "The page you specified doesn't exist."}}"#)
            .create_async()
            .await;

        let err = client(&server).fetch_article("No Such Page").await.unwrap_err();
        assert!(matches!(err, WikiError::ArticleNotFound(t) if t == "No Such Page"));
    }

    #[tokio::test]
    async fn test_search_caps_limit_and_cleans_snippets() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/w/api.php")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("list".into(), "search".into()),
                Matcher::UrlEncoded("srlimit".into(), "500".into()),
            ]))
            .with_body(
                r#"{"query": {"search": [
                    {"ns": 0, "title": "Photosynthesis", "pageid": 24544,
                     "snippet": "<span class=\"searchmatch\">Photosynthesis</span> is a process"}
                ]}}"#,
            )
            .create_async()
            .await;

        let hits = client(&server).search("photosynthesis", 10_000).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snippet, "Photosynthesis is a process");
        assert_eq!(hits[0].page_id, Some(24544));
    }

    #[tokio::test]
    async fn test_get_links() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/w/api.php")
            .match_query(Matcher::UrlEncoded("prop".into(), "links".into()))
            .with_body(
                r#"{"query": {"pages": {"42": {"pageid": 42, "ns": 0, "title": "Test Town",
                    "links": [{"ns": 0, "title": "River"}, {"ns": 0, "title": "Mill"}]}}}}"#,
            )
            .create_async()
            .await;

        let links = client(&server).get_links("Test Town").await.unwrap();
        assert_eq!(links, vec!["River", "Mill"]);
    }

    #[tokio::test]
    async fn test_throttle_spaces_requests() {
        let server = Server::new_async().await;
        let config = ResearchConfig {
            cache_enabled: false,
            request_interval: Duration::from_millis(50),
            ..ResearchConfig::default()
        };
        let client = WikipediaClient::new(&config)
            .unwrap()
            .with_api_url(format!("{}/w/api.php", server.url()));

        let start = Instant::now();
        client.throttle().await;
        client.throttle().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
