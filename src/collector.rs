use crate::citation::{normalize_string, Citation};
use crate::entities::{
    build_timeline, extract_entities, extract_relationships, Entity, Relationship, TimelineEvent,
};
use crate::extract::{
    extract_article, extract_citations, extract_summary, ArticleResearch, Depth, EXTRACTION_METHOD,
};
use crate::quality::{assess, round_to, ReliabilityAssessment};
use crate::wiki::{title_key, ArticleSource, WikiError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Cross-referenced citations kept in a bundle
const MAX_CROSS_REFERENCES: usize = 20;
/// Outbound links taken from each article when following links
const LINKS_PER_ARTICLE: usize = 20;
/// Outbound links inspected by related-article discovery
const MAX_RELATED_CANDIDATES: usize = 50;

/// Word overlap above which a claim counts as supporting evidence
const SUPPORT_OVERLAP: f64 = 0.5;
/// Word overlap above which a claim counts as related content
const RELATED_OVERLAP: f64 = 0.3;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{path} contains no articles")]
    Empty { path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BundleFormat {
    /// Whole bundle, pretty-printed
    #[default]
    Json,
    /// One article per line
    Jsonl,
}

impl BundleFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jsonl") => BundleFormat::Jsonl,
            _ => BundleFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossReference {
    pub citation: Citation,
    pub used_in: Vec<String>,
    pub usage_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSummary {
    pub articles_analyzed: usize,
    pub total_citations: usize,
    pub total_claims_extracted: usize,
    /// Counted before the list is truncated
    pub cross_referenced_citations: usize,
    pub source_quality: ReliabilityAssessment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleProvenance {
    pub tool: String,
    pub version: String,
    pub language: String,
    pub extraction_method: String,
    pub generated_at: DateTime<Utc>,
}

/// Research over several articles with citations merged across them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchBundle {
    pub research_query: String,
    pub research_date: DateTime<Utc>,
    pub summary: BundleSummary,
    pub articles: Vec<ArticleResearch>,
    pub all_citations: Vec<Citation>,
    pub cross_referenced_citations: Vec<CrossReference>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    /// Each article's title is the subject of its relationships
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    pub provenance: BundleProvenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedArticle {
    pub title: String,
    pub shared_citations: usize,
    pub shared_citation_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportLevel {
    StronglySupported,
    Supported,
    PartiallySupported,
    WeaklySupported,
    InsufficientEvidence,
}

impl SupportLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            SupportLevel::StronglySupported
        } else if score >= 0.6 {
            SupportLevel::Supported
        } else if score >= 0.4 {
            SupportLevel::PartiallySupported
        } else if score >= 0.2 {
            SupportLevel::WeaklySupported
        } else {
            SupportLevel::InsufficientEvidence
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub article: String,
    pub section: String,
    pub text: String,
    pub citation_ids: Vec<String>,
    pub confidence: f64,
    /// Share of the claim's words found in this text
    pub relevance: f64,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimVerification {
    pub claim: String,
    pub verification_score: f64,
    pub status: SupportLevel,
    pub supporting_evidence: Vec<Evidence>,
    pub related_content: Vec<Evidence>,
    pub articles_checked: Vec<String>,
    pub verified_at: DateTime<Utc>,
}

/// Citation key for cross-article merging; keyless citations stay per article
fn merge_key(article_title: &str, citation: &Citation) -> String {
    citation
        .dedup_key()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}#{}", article_title, citation.id))
}

/// Merge article results into a bundle. Citations keep first-seen order.
pub fn build_bundle(query: &str, language: &str, articles: Vec<ArticleResearch>) -> ResearchBundle {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, (Citation, Vec<String>)> = HashMap::new();

    for research in &articles {
        let title = &research.article.title;
        for citation in &research.citations {
            let key = merge_key(title, citation);
            let (_, used_in) = merged.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                (citation.clone(), Vec::new())
            });
            if !used_in.contains(title) {
                used_in.push(title.clone());
            }
        }
    }

    let mut all_citations = Vec::with_capacity(order.len());
    let mut cross_referenced = Vec::new();
    for key in &order {
        if let Some((citation, used_in)) = merged.remove(key) {
            if used_in.len() > 1 {
                cross_referenced.push(CrossReference {
                    citation: citation.clone(),
                    usage_count: used_in.len(),
                    used_in,
                });
            }
            all_citations.push(citation);
        }
    }
    cross_referenced.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
    let cross_referenced_count = cross_referenced.len();
    cross_referenced.truncate(MAX_CROSS_REFERENCES);

    let entities = extract_entities(articles.iter().flat_map(|a| &a.sections));
    let relationships = articles
        .iter()
        .flat_map(|a| extract_relationships(&a.sections, &entities, &a.article.title))
        .collect();
    let timeline = build_timeline(articles.iter().flat_map(|a| &a.sections), &entities);

    let now = Utc::now();
    ResearchBundle {
        research_query: query.to_string(),
        research_date: now,
        summary: BundleSummary {
            articles_analyzed: articles.len(),
            total_citations: all_citations.len(),
            total_claims_extracted: articles.iter().map(ArticleResearch::total_claims).sum(),
            cross_referenced_citations: cross_referenced_count,
            source_quality: assess(&all_citations),
        },
        articles,
        all_citations,
        cross_referenced_citations: cross_referenced,
        entities,
        relationships,
        timeline,
        provenance: BundleProvenance {
            tool: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            language: language.to_string(),
            extraction_method: EXTRACTION_METHOD.to_string(),
            generated_at: now,
        },
    }
}

pub struct ResearchCollector<S> {
    source: S,
}

impl<S: ArticleSource> ResearchCollector<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    async fn collect(&self, title: &str, depth: Depth) -> Result<ArticleResearch, WikiError> {
        match depth {
            Depth::Comprehensive => extract_article(&self.source, title).await,
            Depth::Summary => extract_summary(&self.source, title).await,
        }
    }

    /// Collect one article, logging and skipping it on failure
    async fn collect_logged(&self, title: &str, depth: Depth) -> Option<ArticleResearch> {
        match self.collect(title, depth).await {
            Ok(research) => {
                info!(%title, citations = research.citations.len(), "collected article");
                Some(research)
            }
            Err(WikiError::ArticleNotFound(_)) => {
                warn!(%title, "article not found, skipping");
                None
            }
            Err(e) => {
                warn!(%title, "failed to collect article: {}", e);
                None
            }
        }
    }

    /// Research the given titles; titles that fail are skipped
    pub async fn research_articles(&self, titles: &[String], depth: Depth) -> ResearchBundle {
        let mut articles = Vec::with_capacity(titles.len());
        for title in titles {
            if let Some(research) = self.collect_logged(&title_key(title), depth).await {
                articles.push(research);
            }
        }

        build_bundle(
            &format!("Articles: {}", titles.join(", ")),
            self.source.language(),
            articles,
        )
    }

    /// Search for a topic and research the top results.
    ///
    /// With `follow_links`, a short result list is topped up with
    /// summary-depth articles linked from the ones already collected.
    pub async fn research_topic(
        &self,
        query: &str,
        max_articles: usize,
        depth: Depth,
        follow_links: bool,
    ) -> Result<ResearchBundle, WikiError> {
        let hits = self.source.search(query, max_articles.saturating_mul(2)).await?;
        debug!(%query, hits = hits.len(), "search results");

        let mut processed: HashSet<String> = HashSet::new();
        let mut articles = Vec::new();

        for hit in hits.iter().take(max_articles) {
            let title = title_key(&hit.title);
            if !processed.insert(title.clone()) {
                continue;
            }
            if let Some(research) = self.collect_logged(&title, depth).await {
                articles.push(research);
            }
        }

        if follow_links && articles.len() < max_articles {
            let wanted = max_articles - articles.len();
            let extra = self.follow_links(&articles, &mut processed, wanted).await;
            articles.extend(extra);
        }

        Ok(build_bundle(query, self.source.language(), articles))
    }

    async fn follow_links(
        &self,
        articles: &[ArticleResearch],
        processed: &mut HashSet<String>,
        wanted: usize,
    ) -> Vec<ArticleResearch> {
        let mut candidates = BTreeSet::new();
        for research in articles {
            match self.source.get_links(&research.article.title).await {
                Ok(links) => candidates.extend(links.into_iter().take(LINKS_PER_ARTICLE)),
                Err(e) => warn!(title = %research.article.title, "failed to fetch links: {}", e),
            }
        }

        let mut extra = Vec::new();
        for link in candidates {
            if extra.len() >= wanted {
                break;
            }
            let title = title_key(&link);
            if !processed.insert(title.clone()) {
                continue;
            }
            if let Some(research) = self.collect_logged(&title, Depth::Summary).await {
                extra.push(research);
            }
        }
        extra
    }

    /// Linked articles citing at least `min_shared` of the same sources as `title`
    pub async fn find_related_by_citations(
        &self,
        title: &str,
        min_shared: usize,
    ) -> Result<Vec<RelatedArticle>, WikiError> {
        let own = extract_citations(&self.source, title).await?;
        let own_keys: HashSet<&str> = own.iter().filter_map(Citation::dedup_key).collect();

        let links = self.source.get_links(title).await?;
        let mut related = Vec::new();

        for link in links.into_iter().take(MAX_RELATED_CANDIDATES) {
            let citations = match extract_citations(&self.source, &link).await {
                Ok(citations) => citations,
                Err(e) => {
                    debug!(title = %link, "skipping linked article: {}", e);
                    continue;
                }
            };

            let shared: Vec<String> = citations
                .iter()
                .filter(|c| c.dedup_key().map_or(false, |key| own_keys.contains(key)))
                .map(|c| c.id.clone())
                .collect();

            if shared.len() >= min_shared {
                related.push(RelatedArticle {
                    title: link,
                    shared_citations: shared.len(),
                    shared_citation_ids: shared,
                });
            }
        }

        related.sort_by(|a, b| b.shared_citations.cmp(&a.shared_citations));
        Ok(related)
    }

    /// Look for extracted claims resembling `claim` in the given articles
    pub async fn verify_claim(&self, claim: &str, articles: &[String]) -> ClaimVerification {
        let normalized = normalize_string(claim);
        let claim_words: HashSet<&str> = normalized.split_whitespace().collect();

        let mut supporting = Vec::new();
        let mut related = Vec::new();

        for title in articles {
            if claim_words.is_empty() {
                break;
            }
            let research = match extract_article(&self.source, title).await {
                Ok(research) => research,
                Err(e) => {
                    warn!(%title, "failed to check article: {}", e);
                    continue;
                }
            };

            for section in &research.sections {
                for candidate in &section.claims {
                    let text = normalize_string(&candidate.text);
                    let words: HashSet<&str> = text.split_whitespace().collect();
                    let overlap =
                        claim_words.intersection(&words).count() as f64 / claim_words.len() as f64;

                    if overlap <= RELATED_OVERLAP {
                        continue;
                    }

                    let evidence = Evidence {
                        article: title.clone(),
                        section: section.heading.clone(),
                        text: candidate.text.clone(),
                        citation_ids: candidate.citation_ids.clone(),
                        confidence: candidate.confidence,
                        relevance: round_to(overlap, 2),
                        citations: research
                            .citations
                            .iter()
                            .filter(|c| candidate.citation_ids.contains(&c.id))
                            .cloned()
                            .collect(),
                    };

                    if overlap > SUPPORT_OVERLAP {
                        supporting.push(evidence);
                    } else {
                        related.push(evidence);
                    }
                }
            }
        }

        let score = if supporting.is_empty() {
            0.0
        } else {
            let n = supporting.len() as f64;
            let confidence: f64 = supporting.iter().map(|e| e.confidence).sum::<f64>() / n;
            let relevance: f64 = supporting.iter().map(|e| e.relevance).sum::<f64>() / n;
            confidence * 0.6 + relevance * 0.4
        };

        ClaimVerification {
            claim: claim.to_string(),
            verification_score: round_to(score, 2),
            status: SupportLevel::from_score(score),
            supporting_evidence: supporting,
            related_content: related,
            articles_checked: articles.to_vec(),
            verified_at: Utc::now(),
        }
    }
}

/// Write a bundle; parent directories are created as needed
pub fn save_bundle(bundle: &ResearchBundle, path: &Path, format: BundleFormat) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(fs::File::create(path)?);
    match format {
        BundleFormat::Json => serde_json::to_writer_pretty(&mut writer, bundle)?,
        BundleFormat::Jsonl => {
            for article in &bundle.articles {
                serde_json::to_writer(&mut writer, article)?;
                writer.write_all(b"\n")?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

/// Read a bundle written by `save_bundle`. JSONL files hold articles only,
/// so the bundle around them is rebuilt.
pub fn load_bundle(path: &Path) -> Result<ResearchBundle, StoreError> {
    let content = fs::read_to_string(path)?;

    match BundleFormat::from_path(path) {
        BundleFormat::Json => Ok(serde_json::from_str(&content)?),
        BundleFormat::Jsonl => {
            let articles = content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(serde_json::from_str::<ArticleResearch>)
                .collect::<Result<Vec<_>, _>>()?;

            let first = articles.first().ok_or_else(|| StoreError::Empty {
                path: path.display().to_string(),
            })?;
            let language = first.article.language.clone();
            let titles: Vec<&str> = articles.iter().map(|a| a.article.title.as_str()).collect();
            let query = format!("Articles: {}", titles.join(", "));

            Ok(build_bundle(&query, &language, articles))
        }
    }
}
