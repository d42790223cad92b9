use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Characters of wikitext kept on each side of a flagged template
const CONTEXT_RADIUS: usize = 100;

const UNKNOWN_SECTION: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    CitationNeeded,
    Disputed,
    OriginalResearch,
    PrimarySource,
    UnreliableSource,
    Outdated,
    VagueTime,
    VagueAttribution,
    PeacockLanguage,
    WeaselWords,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyFlag {
    /// Nearest heading above the template, or "Unknown"
    pub section: String,
    #[serde(rename = "type")]
    pub kind: FlagKind,
    pub context: String,
    /// Template text as written
    pub template: String,
}

static TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}|]+?)\s*(?:\|[^{}]*)?\}\}").expect("valid regex"));
static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(={2,6})\s*([^=\n]+?)\s*={2,6}\s*$").expect("valid regex"));

fn classify(name: &str) -> Option<FlagKind> {
    let name = name.to_lowercase();
    let kind = match name.as_str() {
        "citation needed" | "cn" | "fact" => FlagKind::CitationNeeded,
        "disputed" | "dubious" => FlagKind::Disputed,
        "or" | "original research" => FlagKind::OriginalResearch,
        "unreliable source" => FlagKind::UnreliableSource,
        "update" | "out of date" => FlagKind::Outdated,
        "when" => FlagKind::VagueTime,
        "who" => FlagKind::VagueAttribution,
        "peacock" => FlagKind::PeacockLanguage,
        "weasel" => FlagKind::WeaselWords,
        other if other.starts_with("primary source") => FlagKind::PrimarySource,
        _ => return None,
    };
    Some(kind)
}

/// Find maintenance templates in wikitext, in document order
pub fn extract_uncertainty_flags(wikitext: &str) -> Vec<UncertaintyFlag> {
    let headings: Vec<(usize, &str)> = HEADING_RE
        .captures_iter(wikitext)
        .filter_map(|caps| Some((caps.get(0)?.start(), caps.get(2)?.as_str())))
        .collect();

    TEMPLATE_RE
        .captures_iter(wikitext)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let kind = classify(caps.get(1)?.as_str())?;

            let section = headings
                .iter()
                .take_while(|(pos, _)| *pos < whole.start())
                .last()
                .map_or(UNKNOWN_SECTION, |(_, heading)| *heading);

            Some(UncertaintyFlag {
                section: section.trim().to_string(),
                kind,
                context: context_window(wikitext, whole.start(), whole.end()).trim().to_string(),
                template: whole.as_str().to_string(),
            })
        })
        .collect()
}

fn context_window(text: &str, start: usize, end: usize) -> &str {
    let mut lo = start.saturating_sub(CONTEXT_RADIUS);
    while !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (end + CONTEXT_RADIUS).min(text.len());
    while !text.is_char_boundary(hi) {
        hi += 1;
    }
    &text[lo..hi]
}
