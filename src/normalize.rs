use crate::citation::{Author, Citation, CitationType, DateParts};
use crate::markup::{parse_template_fields, RawReference};
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Known template names in match order. Matching is by substring, so the
/// order decides ties (`citation` must stay last).
pub const TEMPLATE_TYPES: &[(&str, CitationType)] = &[
    ("cite web", CitationType::Webpage),
    ("cite news", CitationType::ArticleNewspaper),
    ("cite journal", CitationType::ArticleJournal),
    ("cite book", CitationType::Book),
    ("cite magazine", CitationType::ArticleMagazine),
    ("cite conference", CitationType::PaperConference),
    ("cite encyclopedia", CitationType::EntryEncyclopedia),
    ("cite thesis", CitationType::Thesis),
    ("cite report", CitationType::Report),
    ("cite press release", CitationType::Article),
    ("cite arxiv", CitationType::Article),
    ("cite av media", CitationType::Broadcast),
    ("citation", CitationType::Article),
];

/// Numbered author slots checked (`last`..`last9`)
const MAX_AUTHOR_SLOTS: usize = 9;

static YEAR_ONLY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").expect("valid regex"));
static BARE_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)((?:19|20)\d{2})(?:\D|$)").expect("valid regex"));

/// Parse a raw reference body and build its citation record
pub fn normalize_reference(reference: &RawReference) -> Citation {
    let fields = parse_template_fields(&reference.template);
    normalize(&reference.id, &reference.template, &fields)
}

/// Build a citation from template fields.
///
/// `template` is the raw reference text, used for type detection and kept
/// verbatim as `raw_source`. Only fields present in `fields` are set.
pub fn normalize(id: &str, template: &str, fields: &BTreeMap<String, String>) -> Citation {
    let mut citation = Citation::new(id.to_string(), classify_type(template));

    citation.title = field(fields, &["title"]);
    citation.authors = parse_authors(fields);
    citation.url = field(fields, &["url"]);
    citation.doi = field(fields, &["doi"]);
    citation.isbn = field(fields, &["isbn"]);
    citation.pmid = field(fields, &["pmid"]);
    citation.issued = field_ref(fields, &["date", "year"]).and_then(parse_date);
    citation.accessed = field_ref(fields, &["access-date", "accessdate"]).and_then(parse_date);
    citation.publisher = field(fields, &["publisher"]);
    citation.container_title = field(fields, &["journal", "work", "website"]);
    citation.volume = field(fields, &["volume"]);
    citation.issue = field(fields, &["issue"]);
    citation.page = field(fields, &["pages", "page"]);
    citation.quote = field(fields, &["quote"]);
    citation.language = field(fields, &["language"]);
    citation.archive_url = field(fields, &["archive-url", "archiveurl"]);

    if !template.is_empty() {
        citation.raw_source = Some(template.to_string());
    }

    citation
}

fn field_ref<'a>(fields: &'a BTreeMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| fields.get(*key))
        .map(String::as_str)
}

fn field(fields: &BTreeMap<String, String>, keys: &[&str]) -> Option<String> {
    field_ref(fields, keys).map(str::to_string)
}

/// Map template text to a CSL type; first listed name found wins
pub fn classify_type(template: &str) -> CitationType {
    let lower = template.to_lowercase();
    TEMPLATE_TYPES
        .iter()
        .find(|(name, _)| lower.contains(name))
        .map(|(_, kind)| *kind)
        .unwrap_or(CitationType::Article)
}

/// Collect authors from `author` and the numbered `last`/`first` slots.
///
/// Both forms can appear in one template; the single `author` entry comes
/// first and nothing is deduplicated.
pub fn parse_authors(fields: &BTreeMap<String, String>) -> Vec<Author> {
    let mut authors = Vec::new();

    if let Some(author) = fields.get("author") {
        match author.split_once(',') {
            Some((family, given)) => authors.push(Author::new(family.trim(), given.trim())),
            None => authors.push(Author::new(author.trim(), "")),
        }
    }

    for slot in 1..=MAX_AUTHOR_SLOTS {
        let numbered_last = format!("last{}", slot);
        let numbered_first = format!("first{}", slot);
        let (last, first) = if slot == 1 {
            (
                field_ref(fields, &["last", numbered_last.as_str()]),
                field_ref(fields, &["first", numbered_first.as_str()]),
            )
        } else {
            (
                field_ref(fields, &[numbered_last.as_str()]),
                field_ref(fields, &[numbered_first.as_str()]),
            )
        };

        if let Some(last) = last.filter(|l| !l.is_empty()) {
            authors.push(Author::new(last, first.unwrap_or("")));
        }
    }

    authors
}

/// Parse a free-form date, most precise format first.
///
/// Falls back to the first 19xx/20xx year anywhere in the string.
pub fn parse_date(text: &str) -> Option<DateParts> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%d", "%B %d, %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return DateParts::new(vec![date.year(), date.month() as i32, date.day() as i32]);
        }
    }

    // Month precision: pin the day so chrono can build a full date
    let month_candidates = [
        (format!("{}-01", text), "%Y-%m-%d"),
        (format!("1 {}", text), "%d %B %Y"),
    ];
    for (candidate, format) in &month_candidates {
        if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
            return DateParts::new(vec![date.year(), date.month() as i32]);
        }
    }

    if YEAR_ONLY_RE.is_match(text) {
        if let Ok(year) = text.parse() {
            return Some(DateParts::year(year));
        }
    }

    BARE_YEAR_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .map(DateParts::year)
}
