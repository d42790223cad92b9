use super::{build_client, LookupError};
use reqwest::{redirect, Client, StatusCode};
use std::time::Duration;
use tracing::debug;

const DOI_RESOLVER_BASE: &str = "https://doi.org";

const DOI_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// Checks DOIs against the doi.org handle resolver without following redirects
pub struct DoiClient {
    client: Client,
    base_url: String,
}

impl DoiClient {
    pub fn new(timeout: Duration) -> Result<Self, LookupError> {
        Ok(Self {
            client: build_client(timeout, redirect::Policy::none())?,
            base_url: DOI_RESOLVER_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// A DOI is valid when the resolver answers 200 or redirects to the landing page
    pub async fn exists(&self, doi: &str) -> Result<bool, LookupError> {
        let doi = clean_doi(doi)?;
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), doi);
        debug!(%doi, "resolving DOI");

        let status = self.client.get(&url).send().await?.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LookupError::RateLimited);
        }

        Ok(matches!(status.as_u16(), 200 | 301 | 302 | 303))
    }
}

/// Strip resolver prefixes and reject strings that cannot be DOIs
pub fn clean_doi(doi: &str) -> Result<&str, LookupError> {
    let trimmed = doi.trim();
    let bare = DOI_PREFIXES
        .iter()
        .find_map(|prefix| {
            trimmed
                .get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .map(|_| &trimmed[prefix.len()..])
        })
        .unwrap_or(trimmed)
        .trim();

    match bare.split_once('/') {
        Some((prefix, suffix)) if prefix.starts_with("10.") && !suffix.is_empty() => Ok(bare),
        _ => Err(LookupError::InvalidIdentifier(doi.to_string())),
    }
}
