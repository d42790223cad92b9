use crate::citation::{Citation, Section};
use crate::quality::{assess, round_to, ReliabilityAssessment};
use crate::uncertainty::UncertaintyFlag;
use crate::verifier::{VerificationResult, VerificationStatus};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Longest context kept per uncertainty flag in a report
const FLAG_CONTEXT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    High,
    Moderate,
    Low,
}

impl Reliability {
    pub fn from_score(verification_score: f64, inconsistencies: usize) -> Self {
        if verification_score >= 0.8 && inconsistencies == 0 {
            Reliability::High
        } else if verification_score >= 0.6 && inconsistencies <= 2 {
            Reliability::Moderate
        } else {
            Reliability::Low
        }
    }
}

impl std::fmt::Display for Reliability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Reliability::High => "high",
            Reliability::Moderate => "moderate",
            Reliability::Low => "low",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Minor,
    Moderate,
    Major,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSource {
    pub source: String,
    pub value: String,
}

/// Two sources disagreeing about the same fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyIssue {
    pub claim: String,
    pub field: String,
    pub sources: Vec<IssueSource>,
    pub severity: IssueSeverity,
}

/// Cross-claim contradiction detection.
///
/// Not implemented: always returns an empty list. The signature is kept so
/// the report pipeline and its reliability label already account for it.
pub fn detect_inconsistencies(_sections: &[Section]) -> Vec<ConsistencyIssue> {
    Vec::new()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total_citations: usize,
    /// Verified plus accessible
    pub verified_count: usize,
    pub verification_score: f64,
    pub dead_links: usize,
    pub archived_recoveries: usize,
    pub status_counts: BTreeMap<VerificationStatus, usize>,
    pub reliability_assessment: Reliability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub verification_summary: VerificationSummary,
    pub source_quality: ReliabilityAssessment,
    pub citation_details: BTreeMap<String, VerificationResult>,
    pub inconsistencies: Vec<ConsistencyIssue>,
    pub uncertainty_flags: Vec<UncertaintyFlag>,
    pub verified_at: DateTime<Utc>,
}

/// Aggregate per-citation results into a report.
///
/// `total_citations` counts verification results, not `citations`; the
/// citation set only feeds the metadata quality grade.
pub fn generate_verification_report(
    citations: &[Citation],
    results: BTreeMap<String, VerificationResult>,
    inconsistencies: Vec<ConsistencyIssue>,
    uncertainty_flags: Vec<UncertaintyFlag>,
) -> VerificationReport {
    let mut status_counts: BTreeMap<VerificationStatus, usize> = BTreeMap::new();
    for result in results.values() {
        *status_counts.entry(result.status()).or_default() += 1;
    }
    let count = |status: VerificationStatus| status_counts.get(&status).copied().unwrap_or(0);

    let total = results.len();
    let verified_count = count(VerificationStatus::Verified) + count(VerificationStatus::Accessible);
    let verification_score = if total > 0 {
        verified_count as f64 / total as f64
    } else {
        0.0
    };

    let summary = VerificationSummary {
        total_citations: total,
        verified_count,
        verification_score: round_to(verification_score, 2),
        dead_links: count(VerificationStatus::DeadLink),
        archived_recoveries: count(VerificationStatus::Archived),
        reliability_assessment: Reliability::from_score(verification_score, inconsistencies.len()),
        status_counts,
    };

    let uncertainty_flags = uncertainty_flags
        .into_iter()
        .map(|mut flag| {
            if flag.context.chars().count() > FLAG_CONTEXT_CHARS {
                flag.context = flag.context.chars().take(FLAG_CONTEXT_CHARS).collect();
            }
            flag
        })
        .collect();

    VerificationReport {
        verification_summary: summary,
        source_quality: assess(citations),
        citation_details: results,
        inconsistencies,
        uncertainty_flags,
        verified_at: Utc::now(),
    }
}

impl VerificationReport {
    pub fn reliability(&self) -> Reliability {
        self.verification_summary.reliability_assessment
    }

    /// Print the report to stdout with colors
    pub fn print(&self, title: &str) {
        let summary = &self.verification_summary;

        println!();
        println!("{}", format!("Citation report: {}", title).bold());
        println!("{}", "=".repeat(50));
        println!();

        println!("Checked: {} citations", summary.total_citations);
        println!(
            "  {} verified, {} archived, {} dead links, {} unverified",
            summary.verified_count.to_string().green(),
            summary.archived_recoveries.to_string().cyan(),
            summary.dead_links.to_string().red(),
            summary
                .status_counts
                .get(&VerificationStatus::Unverified)
                .copied()
                .unwrap_or(0)
                .to_string()
                .dimmed()
        );

        let reliability = match summary.reliability_assessment {
            Reliability::High => "HIGH".green(),
            Reliability::Moderate => "MODERATE".yellow(),
            Reliability::Low => "LOW".red(),
        };
        println!(
            "  Verification score {:.2}, reliability {}",
            summary.verification_score, reliability
        );
        println!(
            "  Source quality {} ({}, score {:.2})",
            self.source_quality.rating.to_string().bold(),
            self.source_quality.rating.description(),
            self.source_quality.score
        );
        println!();

        self.print_status(VerificationStatus::DeadLink, "DEAD LINKS", |s| s.red().bold());
        self.print_status(VerificationStatus::Archived, "ARCHIVED", |s| s.cyan().bold());

        if !self.uncertainty_flags.is_empty() {
            println!(
                "{}",
                format!("UNCERTAINTY FLAGS ({})", self.uncertainty_flags.len())
                    .yellow()
                    .bold()
            );
            for flag in &self.uncertainty_flags {
                println!(
                    "  {} {}",
                    format!("[{}]", flag.section).dimmed(),
                    truncate(&flag.template, 60)
                );
            }
            println!();
        }
    }

    fn print_status(
        &self,
        status: VerificationStatus,
        label: &str,
        style: impl Fn(String) -> colored::ColoredString,
    ) {
        let matching: Vec<&VerificationResult> = self
            .citation_details
            .values()
            .filter(|r| r.status() == status)
            .collect();
        if matching.is_empty() {
            return;
        }

        println!("{}", style(format!("{} ({})", label, matching.len())));
        for result in matching {
            let key = format!("[{}]", result.citation_id());
            for note in result.notes() {
                println!("  {} {}", key.dimmed(), truncate(note, 80));
            }
        }
        println!();
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::CitationType;
    use crate::uncertainty::FlagKind;

    fn result(id: &str, status: VerificationStatus) -> (String, VerificationResult) {
        let result = match status {
            VerificationStatus::Verified => VerificationResult::new(id, false, false, Some(true), None, None, vec![]),
            VerificationStatus::Accessible => VerificationResult::new(id, true, true, None, None, None, vec![]),
            VerificationStatus::Archived => {
                VerificationResult::new(id, true, false, None, None, Some("http://archive".into()), vec![])
            }
            VerificationStatus::DeadLink => VerificationResult::new(id, true, false, None, None, None, vec![]),
            VerificationStatus::Unverified => VerificationResult::new(id, false, false, None, None, None, vec![]),
        };
        assert_eq!(result.status(), status);
        (id.to_string(), result)
    }

    fn issue() -> ConsistencyIssue {
        ConsistencyIssue {
            claim: "founded".to_string(),
            field: "date".to_string(),
            sources: vec![],
            severity: IssueSeverity::Minor,
        }
    }

    #[test]
    fn test_summary_counts() {
        let results: BTreeMap<_, _> = vec![
            result("ref_1", VerificationStatus::Verified),
            result("ref_2", VerificationStatus::Accessible),
            result("ref_3", VerificationStatus::Archived),
            result("ref_4", VerificationStatus::DeadLink),
            result("ref_5", VerificationStatus::Unverified),
        ]
        .into_iter()
        .collect();

        let report = generate_verification_report(&[], results, vec![], vec![]);
        let summary = &report.verification_summary;
        assert_eq!(summary.total_citations, 5);
        assert_eq!(summary.verified_count, 2);
        assert_eq!(summary.verification_score, 0.4);
        assert_eq!(summary.dead_links, 1);
        assert_eq!(summary.archived_recoveries, 1);
        assert_eq!(summary.reliability_assessment, Reliability::Low);
        assert_eq!(report.source_quality.rating, crate::quality::Grade::F);
    }

    #[test]
    fn test_reliability_labels() {
        assert_eq!(Reliability::from_score(0.9, 0), Reliability::High);
        assert_eq!(Reliability::from_score(0.9, 1), Reliability::Moderate);
        assert_eq!(Reliability::from_score(0.6, 2), Reliability::Moderate);
        assert_eq!(Reliability::from_score(0.6, 3), Reliability::Low);
        assert_eq!(Reliability::from_score(0.59, 0), Reliability::Low);
    }

    #[test]
    fn test_inconsistencies_lower_reliability() {
        let results: BTreeMap<_, _> = vec![result("ref_1", VerificationStatus::Verified)]
            .into_iter()
            .collect();
        let report = generate_verification_report(&[], results, vec![issue()], vec![]);
        assert_eq!(report.reliability(), Reliability::Moderate);
    }

    #[test]
    fn test_empty_results_are_low() {
        let citations = vec![Citation::new("ref_1".to_string(), CitationType::Book)];
        let report = generate_verification_report(&citations, BTreeMap::new(), vec![], vec![]);
        assert_eq!(report.verification_summary.total_citations, 0);
        assert_eq!(report.verification_summary.verification_score, 0.0);
        assert_eq!(report.reliability(), Reliability::Low);
        assert_eq!(report.source_quality.rating, crate::quality::Grade::E);
    }

    #[test]
    fn test_flag_context_truncated() {
        let flag = UncertaintyFlag {
            section: "History".to_string(),
            kind: FlagKind::CitationNeeded,
            context: "x".repeat(250),
            template: "{{cn}}".to_string(),
        };
        let report = generate_verification_report(&[], BTreeMap::new(), vec![], vec![flag]);
        assert_eq!(report.uncertainty_flags[0].context.len(), 200);
    }

    #[test]
    fn test_detect_inconsistencies_is_empty() {
        assert!(detect_inconsistencies(&[]).is_empty());
    }

    #[test]
    fn test_report_serializes_status_keys() {
        let results: BTreeMap<_, _> = vec![result("ref_1", VerificationStatus::DeadLink)]
            .into_iter()
            .collect();
        let report = generate_verification_report(&[], results, vec![], vec![]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["verification_summary"]["status_counts"]["dead_link"], 1);
        assert_eq!(json["verification_summary"]["reliability_assessment"], "low");
        assert_eq!(json["citation_details"]["ref_1"]["status"], "dead_link");
    }
}
