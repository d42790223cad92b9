use crate::citation::{Citation, Claim, Section};
use crate::markup::{clean_html, sanitize_id};
use crate::wiki::SectionInfo;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Heading given to the untitled lead section
pub const LEAD_SECTION_HEADING: &str = "Introduction";

/// Fragments shorter than this (after cleanup) are treated as noise
const MIN_CLAIM_LEN: usize = 10;

/// Lead section length cap when the page has no headings
const LEAD_FALLBACK_CHARS: usize = 5000;

const BASE_SCORE: f64 = 0.5;
const DOI_BOOST: f64 = 0.20;
const PMID_BOOST: f64 = 0.15;
const ISBN_BOOST: f64 = 0.10;
const URL_BOOST: f64 = 0.05;
const AUTHOR_BOOST: f64 = 0.10;
const CONTAINER_BOOST: f64 = 0.05;
const UNRESOLVED_SCORE: f64 = 0.3;

// Text back to the previous sentence boundary, then a run of reference superscripts.
// Whole tags are skipped so punctuation inside attributes is not a boundary.
static CLAIM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)((?:<[^>]*>|[^.!?<])*?[.!?]?)\s*((?:<sup\b[^>]*\bclass="[^"]*\breference\b[^"]*"[^>]*>.*?</sup>\s*)+)"#,
    )
    .expect("valid regex")
});
static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r##"#cite_note-([^"]+)"##).expect("valid regex"));
static HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<h[23]\b").expect("valid regex"));
static HEADING_CLOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</h[1-6]\s*>|</span\s*>").expect("valid regex"));

/// Find prose fragments followed by citation markers in rendered section HTML.
///
/// Marker anchors are turned into citation ids even when no citation with
/// that id exists. Fragments with no resolvable marker never become claims.
pub fn associate_claims(
    section_html: &str,
    section: &str,
    citations: &HashMap<String, Citation>,
) -> Vec<Claim> {
    let mut claims = Vec::new();

    for caps in CLAIM_RE.captures_iter(section_html) {
        let fragment = caps.get(1).map_or("", |m| m.as_str());
        let markers = caps.get(2).map_or("", |m| m.as_str());

        let text = clean_html(fragment);
        if text.chars().count() < MIN_CLAIM_LEN {
            continue;
        }

        let citation_ids: Vec<String> = ANCHOR_RE
            .captures_iter(markers)
            .filter_map(|anchor| anchor.get(1))
            .map(|anchor| resolve_anchor(anchor.as_str(), citations))
            .collect();

        if citation_ids.is_empty() {
            continue;
        }

        let confidence = claim_confidence(&citation_ids, citations);
        claims.push(Claim {
            text,
            citation_ids,
            section: section.to_string(),
            confidence,
        });
    }

    claims
}

/// Map a `cite_note-...` anchor to a citation id.
///
/// Named references render as `NAME-N`, so the numeric suffix is dropped when
/// the full anchor does not match. Unknown anchors still yield an id.
pub fn resolve_anchor(anchor: &str, citations: &HashMap<String, Citation>) -> String {
    let decoded = urlencoding::decode(anchor)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| anchor.to_string());

    let direct = format!("ref_{}", sanitize_id(&decoded));
    if citations.contains_key(&direct) {
        return direct;
    }

    if let Some((name, counter)) = decoded.rsplit_once('-') {
        if !name.is_empty() && !counter.is_empty() && counter.chars().all(|c| c.is_ascii_digit()) {
            let named = format!("ref_{}", sanitize_id(name));
            if citations.contains_key(&named) {
                return named;
            }
        }
    }

    direct
}

/// Quality score for one citation id; unresolved ids get a flat score
pub fn citation_confidence(citation: Option<&Citation>) -> f64 {
    let Some(citation) = citation else {
        return UNRESOLVED_SCORE;
    };

    let mut score = BASE_SCORE;
    if citation.doi.is_some() {
        score += DOI_BOOST;
    }
    if citation.pmid.is_some() {
        score += PMID_BOOST;
    }
    if citation.isbn.is_some() {
        score += ISBN_BOOST;
    }
    if citation.url.is_some() {
        score += URL_BOOST;
    }
    if !citation.authors.is_empty() {
        score += AUTHOR_BOOST;
    }
    if citation.container_title.is_some() {
        score += CONTAINER_BOOST;
    }

    score.min(1.0)
}

/// Mean citation score over a claim's ids (0.0 when there are none)
pub fn claim_confidence(citation_ids: &[String], citations: &HashMap<String, Citation>) -> f64 {
    if citation_ids.is_empty() {
        return 0.0;
    }

    let total: f64 = citation_ids
        .iter()
        .map(|id| citation_confidence(citations.get(id)))
        .sum();
    total / citation_ids.len() as f64
}

/// Split rendered article HTML into the lead section plus one entry per
/// API-reported section, each with its claims.
pub fn parse_sections(
    html: &str,
    sections: &[SectionInfo],
    citations: &HashMap<String, Citation>,
) -> Vec<Section> {
    let mut parsed = Vec::with_capacity(sections.len() + 1);

    let lead = lead_html(html);
    parsed.push(Section {
        heading: LEAD_SECTION_HEADING.to_string(),
        level: 1,
        content: clean_html(lead),
        claims: associate_claims(lead, LEAD_SECTION_HEADING, citations),
    });

    for info in sections {
        let body = section_html(html, &info.anchor);
        parsed.push(Section {
            heading: info.heading.clone(),
            level: info.level,
            content: clean_html(body),
            claims: associate_claims(body, &info.heading, citations),
        });
    }

    parsed
}

fn lead_html(html: &str) -> &str {
    match HEADING_RE.find(html) {
        Some(heading) => &html[..heading.start()],
        None => match html.char_indices().nth(LEAD_FALLBACK_CHARS) {
            Some((end, _)) => &html[..end],
            None => html,
        },
    }
}

/// HTML between the heading carrying `id="anchor"` and the next h2/h3
fn section_html<'a>(html: &'a str, anchor: &str) -> &'a str {
    if anchor.is_empty() {
        return "";
    }

    let needle = format!("id=\"{}\"", anchor);
    let Some(at) = html.find(&needle) else {
        return "";
    };

    let start = HEADING_CLOSE_RE
        .find(&html[at..])
        .map_or(at + needle.len(), |close| at + close.end());
    let end = HEADING_RE
        .find(&html[start..])
        .map_or(html.len(), |next| start + next.start());

    &html[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::{Author, CitationType};
    use crate::testing::marker;

    fn table(citations: Vec<Citation>) -> HashMap<String, Citation> {
        citations.into_iter().map(|c| (c.id.clone(), c)).collect()
    }

    #[test]
    fn test_associates_trailing_markers() {
        let citations = table(vec![
            Citation::new("ref_smith".to_string(), CitationType::Book),
            Citation::new("ref_2".to_string(), CitationType::Webpage),
        ]);
        let html = format!(
            "<p>The city was founded in 1850 by settlers.{} Its population exceeds one million people.{}{}</p>",
            marker("smith-1"),
            marker("ghost-9"),
            marker("2"),
        );

        let claims = associate_claims(&html, "History", &citations);
        assert_eq!(claims.len(), 2);

        assert_eq!(claims[0].text, "The city was founded in 1850 by settlers.");
        assert_eq!(claims[0].citation_ids, vec!["ref_smith"]);
        assert_eq!(claims[0].section, "History");

        assert_eq!(claims[1].text, "Its population exceeds one million people.");
        assert_eq!(claims[1].citation_ids, vec!["ref_ghost-9", "ref_2"]);
    }

    #[test]
    fn test_dotted_attributes_are_not_sentence_boundaries() {
        let html = format!(
            concat!(
                "<p>Austin is the capital of the ",
                "<a href=\"/wiki/U.S._state\" title=\"U.S. state\">state</a> of Texas.{}",
                " It lies on the <a href=\"/wiki/Colorado_River_(Texas)\" title=\"Colorado River (Texas)\">",
                "Colorado River</a> near <a href=\"/wiki/St._Louis\">St</a> Edward's hills.{}</p>"
            ),
            marker("1"),
            marker("2"),
        );

        let claims = associate_claims(&html, "Lead", &HashMap::new());
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0].text, "Austin is the capital of the state of Texas.");
        assert_eq!(claims[1].text, "It lies on the Colorado River near St Edward's hills.");
        assert!(claims.iter().all(|c| !c.text.contains('<') && !c.text.contains('"')));
    }

    #[test]
    fn test_short_fragments_are_dropped() {
        let citations = table(vec![Citation::new("ref_1".to_string(), CitationType::Book)]);
        let html = format!("<p>It grew.{}</p>", marker("1"));
        assert!(associate_claims(&html, "Lead", &citations).is_empty());
    }

    #[test]
    fn test_dangling_marker_still_produces_claim() {
        let html = format!("<p>Nobody defined this reference anywhere.{}</p>", marker("missing-3"));
        let claims = associate_claims(&html, "Lead", &HashMap::new());
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].citation_ids, vec!["ref_missing-3"]);
        assert!((claims[0].confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_text_without_markers_yields_nothing() {
        let html = "<p>Plain prose without any references at all.</p>";
        assert!(associate_claims(html, "Lead", &HashMap::new()).is_empty());
    }

    #[test]
    fn test_confidence_weights() {
        let mut citation = Citation::new("ref_a".to_string(), CitationType::ArticleJournal);
        citation.doi = Some("10.1000/a".to_string());
        citation.authors = vec![Author::new("Doe", "Jane")];
        citation.container_title = Some("Nature".to_string());
        let citations = table(vec![citation]);

        let confidence = claim_confidence(&["ref_a".to_string()], &citations);
        assert!((confidence - 0.85).abs() < 1e-9);

        let mixed = claim_confidence(&["ref_a".to_string(), "ref_zzz".to_string()], &citations);
        assert!((mixed - (0.85 + 0.3) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_is_capped() {
        let mut citation = Citation::new("ref_full".to_string(), CitationType::ArticleJournal);
        citation.doi = Some("10.1/x".to_string());
        citation.pmid = Some("123".to_string());
        citation.isbn = Some("978".to_string());
        citation.url = Some("https://x".to_string());
        citation.authors = vec![Author::new("A", "B")];
        citation.container_title = Some("J".to_string());
        assert_eq!(citation_confidence(Some(&citation)), 1.0);
    }

    #[test]
    fn test_resolve_anchor_decodes_and_strips_counter() {
        let citations = table(vec![Citation::new("ref_caf_".to_string(), CitationType::Book)]);
        assert_eq!(resolve_anchor("caf%C3%A9-4", &citations), "ref_caf_");
        assert_eq!(resolve_anchor("other-4", &citations), "ref_other-4");
    }

    #[test]
    fn test_parse_sections() {
        let html = format!(
            concat!(
                "<p>Alpha is a town in the north of the region.{}</p>",
                "<div class=\"mw-heading mw-heading2\"><h2 id=\"History\">History</h2></div>",
                "<p>Alpha was first settled around the year 1200.{}</p>",
                "<h2><span class=\"mw-headline\" id=\"Economy\">Economy</span></h2>",
                "<p>Farming.</p>"
            ),
            marker("1"),
            marker("2"),
        );
        let infos = vec![
            SectionInfo {
                heading: "History".to_string(),
                level: 2,
                anchor: "History".to_string(),
            },
            SectionInfo {
                heading: "Economy".to_string(),
                level: 2,
                anchor: "Economy".to_string(),
            },
            SectionInfo {
                heading: "Missing".to_string(),
                level: 3,
                anchor: "Missing".to_string(),
            },
        ];

        let sections = parse_sections(&html, &infos, &HashMap::new());
        assert_eq!(sections.len(), 4);

        assert_eq!(sections[0].heading, LEAD_SECTION_HEADING);
        assert_eq!(sections[0].level, 1);
        assert_eq!(sections[0].claims.len(), 1);

        assert_eq!(sections[1].heading, "History");
        assert_eq!(sections[1].claims[0].citation_ids, vec!["ref_2"]);
        assert_eq!(sections[1].claims[0].section, "History");

        assert_eq!(sections[2].content, "Farming.");
        assert!(sections[3].content.is_empty());
    }
}
