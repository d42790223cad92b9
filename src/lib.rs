pub mod cache;
pub mod citation;
pub mod claims;
pub mod collector;
pub mod entities;
pub mod extract;
pub mod lookups;
pub mod markup;
pub mod normalize;
pub mod quality;
pub mod report;
pub mod uncertainty;
pub mod verifier;
pub mod wiki;

#[cfg(test)]
pub(crate) mod testing;

use citation::Citation;
use extract::ArticleResearch;
use lookups::{HttpResolver, LookupError, Resolver};
use report::{detect_inconsistencies, generate_verification_report, VerificationReport};
use verifier::{verify, CheckSet, VerificationResult};

use futures::{stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

/// Settings shared by the Wikipedia client and the verifier
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// Wikipedia language edition
    pub language: String,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    /// Minimum delay between MediaWiki requests
    pub request_interval: Duration,
    /// Per-request network timeout
    pub timeout: Duration,
    /// Citations verified at once
    pub concurrency: usize,
    pub check_urls: bool,
    pub check_doi: bool,
    pub check_pmid: bool,
    pub check_archive: bool,
    pub show_progress: bool,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            cache_enabled: true,
            cache_ttl: Duration::from_secs(3600),
            request_interval: Duration::from_millis(1000),
            timeout: Duration::from_secs(10),
            concurrency: 8,
            check_urls: true,
            check_doi: true,
            check_pmid: true,
            check_archive: true,
            show_progress: true,
        }
    }
}

impl ResearchConfig {
    pub fn checks(&self) -> CheckSet {
        CheckSet {
            urls: self.check_urls,
            doi: self.check_doi,
            pmid: self.check_pmid,
            archive: self.check_archive,
        }
    }
}

/// Verifies citations concurrently against a resolver
pub struct SourceVerifier<R = HttpResolver> {
    resolver: R,
    checks: CheckSet,
    concurrency: usize,
    show_progress: bool,
}

impl SourceVerifier<HttpResolver> {
    pub fn new(config: &ResearchConfig) -> Result<Self, LookupError> {
        Ok(Self::with_resolver(HttpResolver::new(config.timeout)?, config))
    }
}

impl<R: Resolver> SourceVerifier<R> {
    pub fn with_resolver(resolver: R, config: &ResearchConfig) -> Self {
        Self {
            resolver,
            checks: config.checks(),
            concurrency: config.concurrency.max(1),
            show_progress: config.show_progress,
        }
    }

    /// Verify every citation; results are keyed by citation id
    pub async fn verify_citations(&self, citations: &[Citation]) -> BTreeMap<String, VerificationResult> {
        let pb = if self.show_progress {
            ProgressBar::new(citations.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let results: Vec<VerificationResult> = stream::iter(citations)
            .map(|citation| verify(citation, &self.resolver, self.checks))
            .buffer_unordered(self.concurrency)
            .inspect(|_| pb.inc(1))
            .collect()
            .await;

        pb.finish_and_clear();
        info!(checked = results.len(), "verified citations");

        results
            .into_iter()
            .map(|result| (result.citation_id().to_string(), result))
            .collect()
    }

    /// Verify an extracted article and build its report
    pub async fn verify_article(&self, research: &ArticleResearch) -> VerificationReport {
        let results = self.verify_citations(&research.citations).await;
        let inconsistencies = detect_inconsistencies(&research.sections);

        generate_verification_report(
            &research.citations,
            results,
            inconsistencies,
            research.uncertainty_flags.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::research_article;
    use crate::report::Reliability;
    use crate::testing::{article, FakeResolver};
    use crate::verifier::VerificationStatus;

    fn quiet() -> ResearchConfig {
        ResearchConfig {
            show_progress: false,
            concurrency: 3,
            ..ResearchConfig::default()
        }
    }

    const WIKITEXT: &str = concat!(
        "<ref>{{cite web |url=https://live.example |title=Live}}</ref>",
        "<ref>{{cite web |url=https://gone.example |title=Gone}}</ref>",
        "<ref>{{cite journal |doi=10.1000/ok |title=Paper}}</ref>",
        "<ref>{{cite book |title=Offline Book}}</ref>",
        "{{citation needed}}",
    );

    fn resolver() -> FakeResolver {
        FakeResolver::default()
            .head("https://live.example", 200)
            .head("https://gone.example", 404)
            .doi("10.1000/ok", true)
    }

    #[tokio::test]
    async fn test_verify_citations_keys_by_id() {
        let research = research_article(&article("Sample", WIKITEXT, ""), "en");
        let verifier = SourceVerifier::with_resolver(resolver(), &quiet());

        let results = verifier.verify_citations(&research.citations).await;
        assert_eq!(results.len(), 4);
        assert_eq!(results["ref_1"].status(), VerificationStatus::Accessible);
        assert_eq!(results["ref_2"].status(), VerificationStatus::DeadLink);
        assert_eq!(results["ref_3"].status(), VerificationStatus::Verified);
        assert_eq!(results["ref_4"].status(), VerificationStatus::Unverified);
    }

    #[tokio::test]
    async fn test_verify_article_report() {
        let research = research_article(&article("Sample", WIKITEXT, ""), "en");
        let verifier = SourceVerifier::with_resolver(resolver(), &quiet());

        let report = verifier.verify_article(&research).await;
        let summary = &report.verification_summary;
        assert_eq!(summary.total_citations, 4);
        assert_eq!(summary.verified_count, 2);
        assert_eq!(summary.verification_score, 0.5);
        assert_eq!(summary.dead_links, 1);
        assert_eq!(report.reliability(), Reliability::Low);
        assert_eq!(report.uncertainty_flags.len(), 1);
        assert!(report.inconsistencies.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_checks_leave_everything_unverified() {
        let research = research_article(&article("Sample", WIKITEXT, ""), "en");
        let config = ResearchConfig {
            check_urls: false,
            check_doi: false,
            check_pmid: false,
            check_archive: false,
            ..quiet()
        };
        let resolver = resolver();
        let verifier = SourceVerifier::with_resolver(resolver, &config);

        let results = verifier.verify_citations(&research.citations).await;
        assert!(results
            .values()
            .all(|r| r.status() == VerificationStatus::Unverified));
        assert_eq!(verifier.resolver.total_calls(), 0);
    }
}
