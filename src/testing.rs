use crate::lookups::{async_trait, LookupError, Resolver};
use crate::wiki::{Article, ArticleSource, SearchHit, SectionInfo, WikiError};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Resolver answering from fixed tables; anything not listed fails the HEAD
/// check and is unknown to the identifier services.
#[derive(Default)]
pub struct FakeResolver {
    heads: HashMap<String, u16>,
    dois: HashMap<String, bool>,
    pmids: HashMap<String, bool>,
    snapshots: HashMap<String, String>,
    calls: AtomicUsize,
    snapshot_calls: AtomicUsize,
}

impl FakeResolver {
    pub fn head(mut self, url: &str, status: u16) -> Self {
        self.heads.insert(url.to_string(), status);
        self
    }

    pub fn doi(mut self, doi: &str, valid: bool) -> Self {
        self.dois.insert(doi.to_string(), valid);
        self
    }

    pub fn snapshot(mut self, url: &str, snapshot: &str) -> Self {
        self.snapshots.insert(url.to_string(), snapshot.to_string());
        self
    }

    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn head_status(&self, url: &str) -> Result<u16, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.heads
            .get(url)
            .copied()
            .ok_or_else(|| LookupError::ParseError(format!("connection refused: {}", url)))
    }

    async fn doi_exists(&self, doi: &str) -> Result<bool, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.dois.get(doi).copied().unwrap_or(false))
    }

    async fn pmid_exists(&self, pmid: &str) -> Result<bool, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pmids
            .get(pmid)
            .copied()
            .ok_or(LookupError::RateLimited)
    }

    async fn find_snapshot(&self, url: &str) -> Result<Option<String>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshots.get(url).cloned())
    }
}

/// Article source serving prebuilt articles by title
#[derive(Default)]
pub struct FakeSource {
    articles: HashMap<String, Article>,
    links: HashMap<String, Vec<String>>,
    hits: Vec<SearchHit>,
}

impl FakeSource {
    pub fn with_article(mut self, article: Article) -> Self {
        self.links.entry(article.title.clone()).or_insert_with(|| article.links.clone());
        self.articles.insert(article.title.clone(), article);
        self
    }

    pub fn with_hits(mut self, titles: &[&str]) -> Self {
        self.hits = titles
            .iter()
            .map(|title| SearchHit {
                title: title.to_string(),
                snippet: String::new(),
                page_id: None,
            })
            .collect();
        self
    }
}

#[async_trait]
impl ArticleSource for FakeSource {
    async fn fetch_article(&self, title: &str) -> Result<Article, WikiError> {
        self.articles
            .get(title)
            .cloned()
            .ok_or_else(|| WikiError::ArticleNotFound(title.to_string()))
    }

    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchHit>, WikiError> {
        Ok(self.hits.iter().take(limit).cloned().collect())
    }

    async fn get_links(&self, title: &str) -> Result<Vec<String>, WikiError> {
        Ok(self.links.get(title).cloned().unwrap_or_default())
    }

    fn language(&self) -> &str {
        "en"
    }
}

/// Reference superscript as rendered by MediaWiki
pub fn marker(anchor: &str) -> String {
    format!(
        r##"<sup id="cite_ref-{0}" class="reference"><a href="#cite_note-{0}">[1]</a></sup>"##,
        anchor
    )
}

/// Article whose wikitext is `raw_source` and whose rendered lead is `html`
pub fn article(title: &str, raw_source: &str, html: &str) -> Article {
    Article {
        title: title.to_string(),
        page_id: Some(1),
        revision_id: Some(100),
        html: html.to_string(),
        raw_source: raw_source.to_string(),
        sections: Vec::<SectionInfo>::new(),
        categories: Vec::new(),
        links: Vec::new(),
        external_links: Vec::new(),
        canonical_url: format!("https://en.wikipedia.org/wiki/{}", title.replace(' ', "_")),
        extracted_at: Utc::now(),
    }
}
