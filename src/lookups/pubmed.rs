use super::{build_client, LookupError};
use reqwest::{redirect, Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const ESUMMARY_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esummary.fcgi";

/// PubMed E-utilities summary lookups
pub struct PubMedClient {
    client: Client,
    base_url: String,
}

impl PubMedClient {
    pub fn new(timeout: Duration) -> Result<Self, LookupError> {
        Ok(Self {
            client: build_client(timeout, redirect::Policy::limited(5))?,
            base_url: ESUMMARY_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The PMID exists when esummary returns a record for it without an error
    pub async fn exists(&self, pmid: &str) -> Result<bool, LookupError> {
        let pmid = pmid.trim();
        if pmid.is_empty() || !pmid.chars().all(|c| c.is_ascii_digit()) {
            return Err(LookupError::InvalidIdentifier(pmid.to_string()));
        }

        debug!(%pmid, "PubMed esummary");
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("db", "pubmed"), ("id", pmid), ("retmode", "json")])
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(LookupError::RateLimited);
        }
        if !response.status().is_success() {
            return Ok(false);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LookupError::ParseError(e.to_string()))?;

        Ok(body
            .get("result")
            .and_then(|result| result.get(pmid))
            .map_or(false, |record| record.is_object() && record.get("error").is_none()))
    }
}
