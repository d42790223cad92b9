use serde::{Deserialize, Serialize};

/// Normalized bibliographic record in CSL-JSON shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Stable reference id (`ref_...`), unique within one article
    pub id: String,
    /// CSL item type
    #[serde(rename = "type")]
    pub kind: CitationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Authors in order of appearance in the template
    #[serde(rename = "author", default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(rename = "URL", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "DOI", skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(rename = "ISBN", skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(rename = "PMID", skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued: Option<DateParts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessed: Option<DateParts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Journal, newspaper or website name
    #[serde(rename = "container-title", skip_serializing_if = "Option::is_none")]
    pub container_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "archive-URL", skip_serializing_if = "Option::is_none")]
    pub archive_url: Option<String>,
    /// Verbatim template text the record was built from
    #[serde(rename = "raw-source", skip_serializing_if = "Option::is_none")]
    pub raw_source: Option<String>,
}

impl Citation {
    pub fn new(id: String, kind: CitationType) -> Self {
        Self {
            id,
            kind,
            title: None,
            authors: Vec::new(),
            url: None,
            doi: None,
            isbn: None,
            pmid: None,
            issued: None,
            accessed: None,
            publisher: None,
            container_title: None,
            volume: None,
            issue: None,
            page: None,
            quote: None,
            language: None,
            archive_url: None,
            raw_source: None,
        }
    }

    /// Key used to merge the same source cited by different articles.
    ///
    /// URL wins over DOI, DOI over title. Returns `None` when the record
    /// exposes none of them.
    pub fn dedup_key(&self) -> Option<&str> {
        self.url
            .as_deref()
            .or(self.doi.as_deref())
            .or(self.title.as_deref())
    }

    /// DOI or PMID present
    pub fn is_peer_reviewed(&self) -> bool {
        self.doi.is_some() || self.pmid.is_some()
    }
}

/// Date as `[year]`, `[year, month]` or `[year, month, day]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateParts(Vec<i32>);

impl DateParts {
    pub fn new(parts: Vec<i32>) -> Option<Self> {
        if (1..=3).contains(&parts.len()) {
            Some(Self(parts))
        } else {
            None
        }
    }

    pub fn year(year: i32) -> Self {
        Self(vec![year])
    }

    pub fn parts(&self) -> &[i32] {
        &self.0
    }
}

impl Serialize for DateParts {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("date-parts", &[&self.0])?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for DateParts {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(rename = "date-parts")]
            date_parts: Vec<Vec<i32>>,
        }

        let raw = Raw::deserialize(deserializer)?;
        let parts = raw
            .date_parts
            .into_iter()
            .next()
            .ok_or_else(|| serde::de::Error::custom("empty date-parts"))?;
        DateParts::new(parts).ok_or_else(|| serde::de::Error::custom("date-parts must hold 1-3 values"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub family: String,
    pub given: String,
}

impl Author {
    pub fn new(family: impl Into<String>, given: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            given: given.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CitationType {
    Webpage,
    ArticleJournal,
    ArticleNewspaper,
    Book,
    ArticleMagazine,
    PaperConference,
    EntryEncyclopedia,
    Thesis,
    Report,
    Article,
    Broadcast,
}

impl std::fmt::Display for CitationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CitationType::Webpage => "webpage",
            CitationType::ArticleJournal => "article-journal",
            CitationType::ArticleNewspaper => "article-newspaper",
            CitationType::Book => "book",
            CitationType::ArticleMagazine => "article-magazine",
            CitationType::PaperConference => "paper-conference",
            CitationType::EntryEncyclopedia => "entry-encyclopedia",
            CitationType::Thesis => "thesis",
            CitationType::Report => "report",
            CitationType::Article => "article",
            CitationType::Broadcast => "broadcast",
        };
        write!(f, "{}", name)
    }
}

/// A span of prose backed by at least one citation marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    /// May contain ids with no entry in the citation table
    pub citation_ids: Vec<String>,
    /// Heading of the section the claim was found under
    pub section: String,
    /// Mean per-citation quality score (0.0 to 1.0)
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    /// 1 for the lead section, otherwise the heading level reported by the API
    pub level: u8,
    pub content: String,
    pub claims: Vec<Claim>,
}

/// Normalize a string for comparison: lowercase, collapse whitespace, remove punctuation
pub fn normalize_string(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_csl_field_names_and_skips_absent_fields() {
        let mut citation = Citation::new("ref_smith".to_string(), CitationType::ArticleJournal);
        citation.doi = Some("10.1000/xyz".to_string());
        citation.container_title = Some("Nature".to_string());
        citation.issued = DateParts::new(vec![2024, 1, 15]);

        let json = serde_json::to_value(&citation).unwrap();
        assert_eq!(json["type"], "article-journal");
        assert_eq!(json["DOI"], "10.1000/xyz");
        assert_eq!(json["container-title"], "Nature");
        assert_eq!(json["issued"]["date-parts"], serde_json::json!([[2024, 1, 15]]));
        assert!(json.get("URL").is_none());
        assert!(json.get("author").is_none());
    }

    #[test]
    fn date_parts_rejects_bad_arity() {
        assert!(DateParts::new(vec![]).is_none());
        assert!(DateParts::new(vec![2024, 1, 2, 3]).is_none());
        assert_eq!(DateParts::year(1999).parts(), &[1999]);
    }

    #[test]
    fn dedup_key_prefers_url_then_doi_then_title() {
        let mut citation = Citation::new("ref_1".to_string(), CitationType::Article);
        assert_eq!(citation.dedup_key(), None);

        citation.title = Some("Title".to_string());
        assert_eq!(citation.dedup_key(), Some("Title"));

        citation.doi = Some("10.1/a".to_string());
        assert_eq!(citation.dedup_key(), Some("10.1/a"));

        citation.url = Some("https://example.org".to_string());
        assert_eq!(citation.dedup_key(), Some("https://example.org"));
    }
}
