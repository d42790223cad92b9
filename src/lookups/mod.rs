pub use async_trait::async_trait;

pub mod doi;
pub mod pubmed;
pub mod url;
pub mod wayback;

use doi::DoiClient;
use pubmed::PubMedClient;
use reqwest::{redirect, Client};
use std::time::Duration;
use thiserror::Error;
use self::url::UrlChecker;
use wayback::WaybackClient;

pub const USER_AGENT: &str = concat!(
    "wikicite/",
    env!("CARGO_PKG_VERSION"),
    " (citation reachability checks)"
);

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("Rate limited, try again later")]
    RateLimited,
    #[error("Malformed identifier: {0}")]
    InvalidIdentifier(String),
}

/// Network signals used to verify a citation.
///
/// Each method makes at most one request; callers turn errors into negative
/// or unknown signals.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Status code of a HEAD request (redirects followed)
    async fn head_status(&self, url: &str) -> Result<u16, LookupError>;

    /// Whether doi.org knows the DOI
    async fn doi_exists(&self, doi: &str) -> Result<bool, LookupError>;

    /// Whether PubMed knows the PMID
    async fn pmid_exists(&self, pmid: &str) -> Result<bool, LookupError>;

    /// Closest archived snapshot of a URL, if any
    async fn find_snapshot(&self, url: &str) -> Result<Option<String>, LookupError>;
}

/// Resolver backed by the live services
pub struct HttpResolver {
    url: UrlChecker,
    doi: DoiClient,
    pubmed: PubMedClient,
    wayback: WaybackClient,
}

impl HttpResolver {
    pub fn new(timeout: Duration) -> Result<Self, LookupError> {
        Ok(Self {
            url: UrlChecker::new(timeout)?,
            doi: DoiClient::new(timeout)?,
            pubmed: PubMedClient::new(timeout)?,
            wayback: WaybackClient::new(timeout)?,
        })
    }
}

#[async_trait]
impl Resolver for HttpResolver {
    async fn head_status(&self, url: &str) -> Result<u16, LookupError> {
        self.url.head_status(url).await
    }

    async fn doi_exists(&self, doi: &str) -> Result<bool, LookupError> {
        self.doi.exists(doi).await
    }

    async fn pmid_exists(&self, pmid: &str) -> Result<bool, LookupError> {
        self.pubmed.exists(pmid).await
    }

    async fn find_snapshot(&self, url: &str) -> Result<Option<String>, LookupError> {
        self.wayback.closest_snapshot(url).await
    }
}

pub(crate) fn build_client(timeout: Duration, policy: redirect::Policy) -> Result<Client, LookupError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .redirect(policy)
        .build()
        .map_err(LookupError::from)
}
