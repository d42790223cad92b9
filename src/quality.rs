use crate::citation::Citation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source reliability grade. F is only given to an empty citation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Grade::A
        } else if score >= 0.6 {
            Grade::B
        } else if score >= 0.4 {
            Grade::C
        } else if score >= 0.2 {
            Grade::D
        } else {
            Grade::E
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Grade::A => "Completely reliable",
            Grade::B => "Usually reliable",
            Grade::C => "Fairly reliable",
            Grade::D => "Not usually reliable",
            Grade::E => "Unreliable",
            Grade::F => "Reliability cannot be judged",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
            Grade::F => "F",
        };
        write!(f, "{}", letter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityAssessment {
    pub rating: Grade,
    /// 0.0 to 1.0, two decimals
    pub score: f64,
    /// Signal name to percentage of citations carrying it (one decimal)
    pub breakdown: BTreeMap<String, f64>,
}

/// Signal name and weight in the overall score
const SIGNALS: &[(&str, f64)] = &[
    ("has_doi", 0.25),
    ("has_url", 0.20),
    ("has_author", 0.20),
    ("has_date", 0.15),
    ("peer_reviewed", 0.20),
];

/// Grade a set of citations by how many carry identifying metadata.
///
/// Percentages are rounded before weighting, so the score is reproducible
/// from the breakdown alone.
pub fn assess(citations: &[Citation]) -> ReliabilityAssessment {
    if citations.is_empty() {
        return ReliabilityAssessment {
            rating: Grade::F,
            score: 0.0,
            breakdown: BTreeMap::new(),
        };
    }

    let total = citations.len() as f64;
    let count = |pred: fn(&Citation) -> bool| citations.iter().filter(|c| pred(c)).count() as f64;

    let counts = [
        ("has_doi", count(|c| c.doi.is_some())),
        ("has_url", count(|c| c.url.is_some())),
        ("has_author", count(|c| !c.authors.is_empty())),
        ("has_date", count(|c| c.issued.is_some())),
        ("peer_reviewed", count(Citation::is_peer_reviewed)),
        // reported only, carries no weight
        ("accessible", count(|c| c.url.is_some())),
    ];

    let breakdown: BTreeMap<String, f64> = counts
        .iter()
        .map(|(name, n)| (name.to_string(), round_to(n / total * 100.0, 1)))
        .collect();

    let score: f64 = SIGNALS
        .iter()
        .map(|(name, weight)| breakdown.get(*name).copied().unwrap_or(0.0) * weight)
        .sum::<f64>()
        / 100.0;

    ReliabilityAssessment {
        rating: Grade::from_score(score),
        score: round_to(score, 2),
        breakdown,
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::{Author, CitationType, DateParts};

    #[test]
    fn test_mixed_set_grades_c() {
        let citations: Vec<Citation> = (0..10)
            .map(|i| {
                let mut c = Citation::new(format!("ref_{}", i + 1), CitationType::ArticleJournal);
                if i < 8 {
                    c.doi = Some(format!("10.1000/{}", i));
                }
                if i < 5 {
                    c.authors = vec![Author::new("Doe", "Jane")];
                }
                if i >= 4 {
                    c.url = Some(format!("https://example.org/{}", i));
                }
                c
            })
            .collect();

        let assessment = assess(&citations);
        assert_eq!(assessment.breakdown["has_doi"], 80.0);
        assert_eq!(assessment.breakdown["has_url"], 60.0);
        assert_eq!(assessment.breakdown["has_author"], 50.0);
        assert_eq!(assessment.breakdown["has_date"], 0.0);
        assert_eq!(assessment.breakdown["peer_reviewed"], 80.0);
        assert_eq!(assessment.breakdown["accessible"], 60.0);
        assert!((assessment.score - 0.58).abs() < 1e-9);
        assert_eq!(assessment.rating, Grade::C);
    }

    #[test]
    fn test_empty_set_is_f() {
        let assessment = assess(&[]);
        assert_eq!(assessment.rating, Grade::F);
        assert_eq!(assessment.score, 0.0);
        assert!(assessment.breakdown.is_empty());
    }

    #[test]
    fn test_bare_citations_score_zero() {
        let citations = vec![Citation::new("ref_1".to_string(), CitationType::Book)];
        let assessment = assess(&citations);
        assert_eq!(assessment.rating, Grade::E);
        assert_eq!(assessment.score, 0.0);
        assert_eq!(assessment.breakdown.len(), 6);
    }

    #[test]
    fn test_fully_described_source_is_a() {
        let mut c = Citation::new("ref_1".to_string(), CitationType::ArticleJournal);
        c.doi = Some("10.1/x".to_string());
        c.url = Some("https://x".to_string());
        c.authors = vec![Author::new("A", "B")];
        c.issued = Some(DateParts::year(2020));
        let assessment = assess(&[c]);
        assert_eq!(assessment.score, 1.0);
        assert_eq!(assessment.rating, Grade::A);
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(Grade::from_score(0.8), Grade::A);
        assert_eq!(Grade::from_score(0.79), Grade::B);
        assert_eq!(Grade::from_score(0.4), Grade::C);
        assert_eq!(Grade::from_score(0.2), Grade::D);
        assert_eq!(Grade::from_score(0.01), Grade::E);
        assert_eq!(Grade::from_score(0.0), Grade::E);
    }
}
