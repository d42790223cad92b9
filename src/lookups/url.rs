use super::{build_client, LookupError};
use reqwest::{redirect, Client};
use std::time::Duration;
use tracing::debug;

/// Issues HEAD requests against citation URLs
pub struct UrlChecker {
    client: Client,
}

impl UrlChecker {
    pub fn new(timeout: Duration) -> Result<Self, LookupError> {
        Ok(Self {
            client: build_client(timeout, redirect::Policy::limited(10))?,
        })
    }

    pub async fn head_status(&self, url: &str) -> Result<u16, LookupError> {
        debug!(%url, "HEAD");
        let response = self.client.head(url).send().await?;
        Ok(response.status().as_u16())
    }
}
