use crate::citation::{Citation, Section};
use crate::claims::parse_sections;
use crate::markup::parse_references;
use crate::normalize::normalize_reference;
use crate::uncertainty::{extract_uncertainty_flags, UncertaintyFlag};
use crate::wiki::{Article, ArticleSource, WikiError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const EXTRACTION_METHOD: &str = "MediaWiki API + wikitext parsing";
pub const SOURCE_NAME: &str = "Wikipedia";

/// Summary extraction keeps this many categories
const SUMMARY_CATEGORIES: usize = 10;
/// Summary extraction keeps this many section headings
const SUMMARY_SECTIONS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    /// Metadata and headings only, no citation parsing
    Summary,
    #[default]
    Comprehensive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleMeta {
    pub title: String,
    pub url: String,
    pub revision_id: String,
    pub extracted_at: DateTime<Utc>,
    pub language: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub source_url: String,
    pub extraction_method: String,
    pub tool_version: String,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleStats {
    pub depth: Depth,
    pub total_citations: usize,
    pub total_sections: usize,
    pub total_claims: usize,
    pub links_count: usize,
    #[serde(default)]
    pub external_links: Vec<String>,
}

/// Everything extracted from one article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleResearch {
    pub article: ArticleMeta,
    pub sections: Vec<Section>,
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub uncertainty_flags: Vec<UncertaintyFlag>,
    pub provenance: Provenance,
    pub metadata: ArticleStats,
}

impl ArticleResearch {
    pub fn total_claims(&self) -> usize {
        self.sections.iter().map(|s| s.claims.len()).sum()
    }
}

/// One section with only the citations its claims point at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionExtract {
    pub section: Section,
    pub citations: Vec<Citation>,
    pub article: ArticleMeta,
    pub provenance: Provenance,
}

/// Parse every `<ref>` in the wikitext into a citation, in document order
pub fn citations_from_wikitext(wikitext: &str) -> Vec<Citation> {
    parse_references(wikitext)
        .iter()
        .map(normalize_reference)
        .collect()
}

fn article_meta(article: &Article, language: &str, categories: Vec<String>) -> ArticleMeta {
    ArticleMeta {
        title: article.title.clone(),
        url: article.canonical_url.clone(),
        revision_id: article.revision_id.map(|r| r.to_string()).unwrap_or_default(),
        extracted_at: article.extracted_at,
        language: language.to_string(),
        categories,
    }
}

fn provenance(article: &Article) -> Provenance {
    Provenance {
        source: SOURCE_NAME.to_string(),
        source_url: article.canonical_url.clone(),
        extraction_method: EXTRACTION_METHOD.to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        extracted_at: Utc::now(),
    }
}

/// Full extraction of an already fetched article
pub fn research_article(article: &Article, language: &str) -> ArticleResearch {
    let citations = citations_from_wikitext(&article.raw_source);
    let table: HashMap<String, Citation> = citations
        .iter()
        .map(|c| (c.id.clone(), c.clone()))
        .collect();

    let sections = parse_sections(&article.html, &article.sections, &table);
    let total_claims = sections.iter().map(|s| s.claims.len()).sum();
    debug!(
        title = %article.title,
        citations = citations.len(),
        sections = sections.len(),
        claims = total_claims,
        "extracted article"
    );

    ArticleResearch {
        article: article_meta(article, language, article.categories.clone()),
        metadata: ArticleStats {
            depth: Depth::Comprehensive,
            total_citations: citations.len(),
            total_sections: sections.len(),
            total_claims,
            links_count: article.links.len(),
            external_links: article.external_links.clone(),
        },
        uncertainty_flags: extract_uncertainty_flags(&article.raw_source),
        provenance: provenance(article),
        sections,
        citations,
    }
}

/// Headings and metadata only
pub fn summarize_article(article: &Article, language: &str) -> ArticleResearch {
    let categories = article
        .categories
        .iter()
        .take(SUMMARY_CATEGORIES)
        .cloned()
        .collect();
    let sections: Vec<Section> = article
        .sections
        .iter()
        .take(SUMMARY_SECTIONS)
        .map(|info| Section {
            heading: info.heading.clone(),
            level: info.level,
            content: String::new(),
            claims: Vec::new(),
        })
        .collect();

    ArticleResearch {
        article: article_meta(article, language, categories),
        metadata: ArticleStats {
            depth: Depth::Summary,
            total_citations: 0,
            total_sections: sections.len(),
            total_claims: 0,
            links_count: article.links.len(),
            external_links: Vec::new(),
        },
        sections,
        citations: Vec::new(),
        uncertainty_flags: Vec::new(),
        provenance: provenance(article),
    }
}

pub async fn extract_article<S: ArticleSource + ?Sized>(
    source: &S,
    title: &str,
) -> Result<ArticleResearch, WikiError> {
    let article = source.fetch_article(title).await?;
    Ok(research_article(&article, source.language()))
}

pub async fn extract_summary<S: ArticleSource + ?Sized>(
    source: &S,
    title: &str,
) -> Result<ArticleResearch, WikiError> {
    let article = source.fetch_article(title).await?;
    Ok(summarize_article(&article, source.language()))
}

pub async fn extract_citations<S: ArticleSource + ?Sized>(
    source: &S,
    title: &str,
) -> Result<Vec<Citation>, WikiError> {
    let article = source.fetch_article(title).await?;
    Ok(citations_from_wikitext(&article.raw_source))
}

/// Extract one section by heading (case-insensitive). `Ok(None)` when the
/// article has no such heading.
pub async fn extract_section<S: ArticleSource + ?Sized>(
    source: &S,
    title: &str,
    heading: &str,
) -> Result<Option<SectionExtract>, WikiError> {
    let research = extract_article(source, title).await?;
    let wanted = heading.to_lowercase();

    let Some(section) = research
        .sections
        .into_iter()
        .find(|s| s.heading.to_lowercase() == wanted)
    else {
        return Ok(None);
    };

    let referenced: HashSet<&str> = section
        .claims
        .iter()
        .flat_map(|claim| claim.citation_ids.iter().map(String::as_str))
        .collect();
    let citations = research
        .citations
        .iter()
        .filter(|c| referenced.contains(c.id.as_str()))
        .cloned()
        .collect();

    Ok(Some(SectionExtract {
        section,
        citations,
        article: research.article,
        provenance: research.provenance,
    }))
}
