use crate::citation::Citation;
use crate::lookups::Resolver;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of checking a single citation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Accessible,
    Archived,
    DeadLink,
    Unverified,
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::Accessible => "accessible",
            VerificationStatus::Archived => "archived",
            VerificationStatus::DeadLink => "dead_link",
            VerificationStatus::Unverified => "unverified",
        };
        write!(f, "{}", name)
    }
}

/// Which signals to collect. A disabled check is reported as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckSet {
    pub urls: bool,
    pub doi: bool,
    pub pmid: bool,
    pub archive: bool,
}

impl Default for CheckSet {
    fn default() -> Self {
        Self {
            urls: true,
            doi: true,
            pmid: true,
            archive: true,
        }
    }
}

/// Signals gathered for one citation. The status is derived from the
/// signals when the result is built or loaded and cannot be set independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredResult")]
pub struct VerificationResult {
    citation_id: String,
    status: VerificationStatus,
    url_checked: bool,
    url_accessible: bool,
    doi_valid: Option<bool>,
    pmid_valid: Option<bool>,
    archive_url: Option<String>,
    notes: Vec<String>,
    checked_at: DateTime<Utc>,
}

impl VerificationResult {
    /// `url_checked` is true when a URL was present and the URL check ran
    pub fn new(
        citation_id: impl Into<String>,
        url_checked: bool,
        url_accessible: bool,
        doi_valid: Option<bool>,
        pmid_valid: Option<bool>,
        archive_url: Option<String>,
        notes: Vec<String>,
    ) -> Self {
        let status = derive_status(
            url_checked,
            url_accessible,
            doi_valid,
            pmid_valid,
            archive_url.as_deref(),
        );
        Self {
            citation_id: citation_id.into(),
            status,
            url_checked,
            url_accessible,
            doi_valid,
            pmid_valid,
            archive_url,
            notes,
            checked_at: Utc::now(),
        }
    }

    pub fn citation_id(&self) -> &str {
        &self.citation_id
    }

    pub fn status(&self) -> VerificationStatus {
        self.status
    }

    pub fn url_checked(&self) -> bool {
        self.url_checked
    }

    pub fn url_accessible(&self) -> bool {
        self.url_accessible
    }

    pub fn doi_valid(&self) -> Option<bool> {
        self.doi_valid
    }

    pub fn pmid_valid(&self) -> Option<bool> {
        self.pmid_valid
    }

    pub fn archive_url(&self) -> Option<&str> {
        self.archive_url.as_deref()
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }
}

/// Serialized form of a result; any stored `status` is ignored
#[derive(Deserialize)]
struct StoredResult {
    citation_id: String,
    #[serde(default)]
    url_checked: bool,
    url_accessible: bool,
    doi_valid: Option<bool>,
    pmid_valid: Option<bool>,
    archive_url: Option<String>,
    #[serde(default)]
    notes: Vec<String>,
    checked_at: DateTime<Utc>,
}

impl From<StoredResult> for VerificationResult {
    fn from(stored: StoredResult) -> Self {
        let mut result = VerificationResult::new(
            stored.citation_id,
            stored.url_checked,
            stored.url_accessible,
            stored.doi_valid,
            stored.pmid_valid,
            stored.archive_url,
            stored.notes,
        );
        result.checked_at = stored.checked_at;
        result
    }
}

/// Status precedence: identifier confirmed, then live URL, then archive,
/// then dead link (a URL was checked and nothing rescued it).
pub fn derive_status(
    url_checked: bool,
    url_accessible: bool,
    doi_valid: Option<bool>,
    pmid_valid: Option<bool>,
    archive_url: Option<&str>,
) -> VerificationStatus {
    if doi_valid == Some(true) || pmid_valid == Some(true) {
        VerificationStatus::Verified
    } else if url_accessible {
        VerificationStatus::Accessible
    } else if archive_url.is_some() {
        VerificationStatus::Archived
    } else if url_checked {
        VerificationStatus::DeadLink
    } else {
        VerificationStatus::Unverified
    }
}

/// Check one citation. Lookup failures become negative signals plus a note;
/// this never fails.
pub async fn verify<R: Resolver + ?Sized>(
    citation: &Citation,
    resolver: &R,
    checks: CheckSet,
) -> VerificationResult {
    let mut notes = Vec::new();
    let mut url_checked = false;
    let mut url_accessible = false;
    let mut doi_valid = None;
    let mut pmid_valid = None;
    let mut archive_url = None;

    let url = citation.url.as_deref().filter(|_| checks.urls);

    if let Some(url) = url {
        url_checked = true;
        match resolver.head_status(url).await {
            Ok(200) => url_accessible = true,
            Ok(403) => notes.push("URL returns 403 (possibly paywalled)".to_string()),
            Ok(404) => notes.push("URL returns 404 (not found)".to_string()),
            Ok(code) => notes.push(format!("URL returns {}", code)),
            Err(e) => notes.push(format!("URL check failed: {}", e)),
        }
    }

    if let Some(doi) = citation.doi.as_deref().filter(|_| checks.doi) {
        let valid = match resolver.doi_exists(doi).await {
            Ok(valid) => valid,
            Err(e) => {
                debug!(%doi, "DOI lookup failed: {}", e);
                false
            }
        };
        notes.push(if valid {
            format!("DOI {} is valid", doi)
        } else {
            format!("DOI {} could not be verified", doi)
        });
        doi_valid = Some(valid);
    }

    if let Some(pmid) = citation.pmid.as_deref().filter(|_| checks.pmid) {
        let valid = match resolver.pmid_exists(pmid).await {
            Ok(valid) => valid,
            Err(e) => {
                debug!(%pmid, "PMID lookup failed: {}", e);
                false
            }
        };
        notes.push(if valid {
            format!("PMID {} is valid", pmid)
        } else {
            format!("PMID {} could not be verified", pmid)
        });
        pmid_valid = Some(valid);
    }

    if let Some(url) = url.filter(|_| !url_accessible && checks.archive) {
        match resolver.find_snapshot(url).await {
            Ok(Some(snapshot)) => {
                notes.push(format!("Archive found: {}", snapshot));
                archive_url = Some(snapshot);
            }
            Ok(None) => notes.push("No archived snapshot found".to_string()),
            Err(e) => notes.push(format!("Archive lookup failed: {}", e)),
        }
    }

    VerificationResult::new(
        citation.id.clone(),
        url_checked,
        url_accessible,
        doi_valid,
        pmid_valid,
        archive_url,
        notes,
    )
}
