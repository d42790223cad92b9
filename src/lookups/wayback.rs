use super::{build_client, LookupError};
use reqwest::{redirect, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const AVAILABILITY_URL: &str = "https://archive.org/wayback/available";

/// Wayback Machine availability API
pub struct WaybackClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    #[serde(default)]
    archived_snapshots: ArchivedSnapshots,
}

#[derive(Debug, Default, Deserialize)]
struct ArchivedSnapshots {
    closest: Option<Snapshot>,
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(default)]
    available: bool,
    url: String,
}

impl WaybackClient {
    pub fn new(timeout: Duration) -> Result<Self, LookupError> {
        Ok(Self {
            client: build_client(timeout, redirect::Policy::limited(5))?,
            base_url: AVAILABILITY_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn closest_snapshot(&self, url: &str) -> Result<Option<String>, LookupError> {
        debug!(%url, "Wayback availability");
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("url", url)])
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(LookupError::RateLimited);
        }
        if !response.status().is_success() {
            return Ok(None);
        }

        let availability: AvailabilityResponse = response
            .json()
            .await
            .map_err(|e| LookupError::ParseError(e.to_string()))?;

        Ok(availability
            .archived_snapshots
            .closest
            .filter(|snapshot| snapshot.available)
            .map(|snapshot| snapshot.url))
    }
}
