use crate::citation::{normalize_string, Claim, Section};
use crate::wiki::{title_key, ArticleSource};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Shortest entity name kept (acronyms like MIT are three letters)
const MIN_NAME_LEN: usize = 3;

const COLLABORATION_CONFIDENCE: f64 = 0.7;
const AFFILIATION_CONFIDENCE: f64 = 0.8;
const CITED_EVENT_CONFIDENCE: f64 = 0.7;
const UNCITED_EVENT_CONFIDENCE: f64 = 0.5;

/// Description prefix used when deduplicating timeline events
const EVENT_KEY_CHARS: usize = 50;

const ORG_KEYWORDS: &str = "University|Institute|College|School|Laboratory|Lab|Center|Centre";

const COLLABORATION_INDICATORS: &[&str] = &[
    "collaborator",
    "collaborated",
    "with",
    "and",
    "co-author",
    "together",
    "joint",
    "partnership",
];

const EMPLOYMENT_INDICATORS: &[&str] = &[
    "professor at",
    "faculty",
    "director of",
    "member of",
    "works at",
    "employed",
    "position at",
    "joined",
];

const EDUCATION_INDICATORS: &[&str] = &[
    "degree from",
    "graduated from",
    "phd at",
    "studied at",
    "thesis",
    "undergraduate",
    "doctoral",
];

/// Event keywords in match order; the first group with a hit wins
const EVENT_KEYWORDS: &[(EventKind, &[&str])] = &[
    (
        EventKind::Education,
        &["degree", "graduated", "phd", "thesis", "university", "studied"],
    ),
    (
        EventKind::Position,
        &["appointed", "joined", "became", "professor", "director"],
    ),
    (
        EventKind::Award,
        &["awarded", "received", "prize", "fellow", "honored"],
    ),
    (
        EventKind::Publication,
        &["published", "paper", "article", "journal"],
    ),
    (
        EventKind::Founding,
        &["founded", "established", "created", "started"],
    ),
];

static PERSON_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\b(?:Dr\.?|Prof\.?|Professor)\s+([A-Z][a-z]+(?:\s+[A-Z]\.?)?\s+[A-Z][a-z]+)")
            .expect("valid regex"),
        Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z]\.?)?\s+[A-Z][a-z]+)(?:\s+(?:and|with)\b|,)")
            .expect("valid regex"),
    ]
});

// Capitalized words ending in an institution keyword, or "<keyword> of <Name>"
static ORGANIZATION_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    let named = format!(
        r"\b((?:[A-Z][A-Za-z]+\s+)+(?:{0})\b(?:\s+of(?:\s+[A-Z][A-Za-z]+)+)?|(?:{0})\s+of(?:\s+[A-Z][A-Za-z]+)+)",
        ORG_KEYWORDS
    );
    vec![
        Regex::new(&named).expect("valid regex"),
        Regex::new(r"\b(MIT|NIH|NSF|ISCB)\b").expect("valid regex"),
    ]
});

static PUBLICATION_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(
            r"(?i:published\s+in|appeared\s+in|journal)\s+(?:the\s+)?([A-Z][A-Za-z]*(?:\s+(?:&\s+)?[A-Z][A-Za-z]*)*)",
        )
        .expect("valid regex"),
        Regex::new(r"\b(Nature(?:\s+Biotechnology)?|Science|Cell|PNAS|PL[oO][sS]\s+ONE|eLife)\b")
            .expect("valid regex"),
    ]
});

static SENTENCE_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").expect("valid regex"));
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Organization,
    PublicationVenue,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Person => "person",
            EntityKind::Organization => "organization",
            EntityKind::PublicationVenue => "publication_venue",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub section: String,
    /// Text matched around the name
    pub context: String,
}

/// A named entity found by pattern matching; names are not disambiguated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wikipedia_url: Option<String>,
    pub mentions: Vec<Mention>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Collaborator,
    Employment,
    Education,
    Affiliation,
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RelationshipKind::Collaborator => "collaborator",
            RelationshipKind::Employment => "employment",
            RelationshipKind::Education => "education",
            RelationshipKind::Affiliation => "affiliation",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    /// One line per section the pair was seen in
    pub evidence: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Education,
    Position,
    Award,
    Publication,
    Founding,
    General,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::Education => "education",
            EventKind::Position => "position",
            EventKind::Award => "award",
            EventKind::Publication => "publication",
            EventKind::Founding => "founding",
            EventKind::General => "general",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub year: i32,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// The sentence the year was found in
    pub description: String,
    pub entities_involved: Vec<String>,
    pub citation_ids: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    /// `subject` or the entity kind
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wikipedia_url: Option<String>,
    pub mention_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    /// Relationship kind, or `event_<kind>` for timeline edges
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub total_entities: usize,
    pub total_relationships: usize,
    pub timeline_events: usize,
    pub entity_types: BTreeMap<EntityKind, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub subject: String,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub timeline: Vec<TimelineEvent>,
    pub statistics: GraphStatistics,
}

/// Find people, organizations and publication venues in section text.
///
/// Entities keep first-seen order. A name seen again in a later section
/// gains a mention; within one section only the first match counts.
pub fn extract_entities<'a>(sections: impl IntoIterator<Item = &'a Section>) -> Vec<Entity> {
    let mut entities: Vec<Entity> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for section in sections {
        let mut seen = HashSet::new();
        let groups = [
            (EntityKind::Person, &*PERSON_RES),
            (EntityKind::Organization, &*ORGANIZATION_RES),
            (EntityKind::PublicationVenue, &*PUBLICATION_RES),
        ];

        for (kind, patterns) in groups {
            for caps in patterns.iter().flat_map(|re| re.captures_iter(&section.content)) {
                let (Some(whole), Some(raw)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let Some(name) = candidate_name(kind, raw.as_str()) else {
                    continue;
                };
                if !seen.insert(name.clone()) {
                    continue;
                }

                let mention = Mention {
                    section: section.heading.clone(),
                    context: whole.as_str().trim().to_string(),
                };
                match index.get(&name) {
                    Some(&at) => entities[at].mentions.push(mention),
                    None => {
                        index.insert(name.clone(), entities.len());
                        entities.push(Entity {
                            name,
                            kind,
                            wikipedia_url: None,
                            mentions: vec![mention],
                        });
                    }
                }
            }
        }
    }

    entities
}

fn candidate_name(kind: EntityKind, raw: &str) -> Option<String> {
    let name = raw.trim();
    let name = name.strip_prefix("The ").unwrap_or(name).trim();
    if name.chars().count() < MIN_NAME_LEN {
        return None;
    }
    // "Medical School, ..." looks like a two-word name to the person patterns
    if kind == EntityKind::Person && name.split_whitespace().any(is_org_keyword) {
        return None;
    }
    Some(name.to_string())
}

fn is_org_keyword(word: &str) -> bool {
    ORG_KEYWORDS.split('|').any(|keyword| keyword == word)
}

/// Look up a Wikipedia article for each person entity without a URL.
/// Lookup failures leave the URL empty.
pub async fn resolve_entity_urls<S: ArticleSource>(source: &S, entities: &mut [Entity]) {
    for entity in entities
        .iter_mut()
        .filter(|e| e.kind == EntityKind::Person && e.wikipedia_url.is_none())
    {
        match source.search(&entity.name, 1).await {
            Ok(hits) => {
                entity.wikipedia_url = hits.first().map(|hit| {
                    format!(
                        "https://{}.wikipedia.org/wiki/{}",
                        source.language(),
                        title_key(&hit.title)
                    )
                });
            }
            Err(e) => debug!(name = %entity.name, "entity lookup failed: {}", e),
        }
    }
}

/// Relate `subject` to the entities named alongside it.
///
/// A person in a section with collaboration wording is a collaborator; an
/// organization is employment, education or a plain affiliation depending on
/// the section's wording. Each (target, kind) pair appears once, with one
/// evidence line per section.
pub fn extract_relationships<'a>(
    sections: impl IntoIterator<Item = &'a Section>,
    entities: &[Entity],
    subject: &str,
) -> Vec<Relationship> {
    let mut relationships: Vec<Relationship> = Vec::new();

    for section in sections {
        let lower = section.content.to_lowercase();

        for entity in entities {
            if entity.name == subject || !section.content.contains(&entity.name) {
                continue;
            }

            let found = match entity.kind {
                EntityKind::Person if mentions_any(&lower, COLLABORATION_INDICATORS) => Some((
                    RelationshipKind::Collaborator,
                    COLLABORATION_CONFIDENCE,
                    format!("Mentioned together in {}", section.heading),
                )),
                EntityKind::Organization => Some((
                    affiliation_kind(&lower),
                    AFFILIATION_CONFIDENCE,
                    format!("Mentioned in {}", section.heading),
                )),
                _ => None,
            };
            let Some((kind, confidence, evidence)) = found else {
                continue;
            };

            match relationships
                .iter_mut()
                .find(|r| r.target == entity.name && r.kind == kind)
            {
                Some(existing) => {
                    if !existing.evidence.contains(&evidence) {
                        existing.evidence.push(evidence);
                    }
                }
                None => relationships.push(Relationship {
                    source: subject.to_string(),
                    target: entity.name.clone(),
                    kind,
                    evidence: vec![evidence],
                    confidence,
                }),
            }
        }
    }

    relationships
}

fn affiliation_kind(lower: &str) -> RelationshipKind {
    if mentions_any(lower, EMPLOYMENT_INDICATORS) {
        RelationshipKind::Employment
    } else if mentions_any(lower, EDUCATION_INDICATORS) {
        RelationshipKind::Education
    } else {
        RelationshipKind::Affiliation
    }
}

fn mentions_any(lower: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| contains_phrase(lower, phrase))
}

/// Substring match that does not start or end inside a word
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.match_indices(phrase).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + phrase.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// One event per distinct 19xx/20xx year per sentence, sorted by year.
///
/// Sentences matching one of the section's claims carry its citation ids.
/// Events sharing year, kind and the start of their description are kept once.
pub fn build_timeline<'a>(
    sections: impl IntoIterator<Item = &'a Section>,
    entities: &[Entity],
) -> Vec<TimelineEvent> {
    let mut events = Vec::new();

    for section in sections {
        for sentence in SENTENCE_SPLIT_RE.split(&section.content) {
            let sentence = sentence.trim();

            let mut years: Vec<i32> = Vec::new();
            for found in YEAR_RE.find_iter(sentence) {
                if let Ok(year) = found.as_str().parse() {
                    if !years.contains(&year) {
                        years.push(year);
                    }
                }
            }
            if years.is_empty() {
                continue;
            }

            let lower = sentence.to_lowercase();
            let kind = EVENT_KEYWORDS
                .iter()
                .find(|(_, keywords)| keywords.iter().any(|keyword| lower.contains(*keyword)))
                .map_or(EventKind::General, |(kind, _)| *kind);

            let citation_ids = matching_claim(section, sentence)
                .map(|claim| claim.citation_ids.clone())
                .unwrap_or_default();
            let confidence = if citation_ids.is_empty() {
                UNCITED_EVENT_CONFIDENCE
            } else {
                CITED_EVENT_CONFIDENCE
            };
            let involved: Vec<String> = entities
                .iter()
                .filter(|e| sentence.contains(&e.name))
                .map(|e| e.name.clone())
                .collect();

            for year in years {
                events.push(TimelineEvent {
                    year,
                    kind,
                    description: sentence.to_string(),
                    entities_involved: involved.clone(),
                    citation_ids: citation_ids.clone(),
                    confidence,
                });
            }
        }
    }

    events.sort_by_key(|event| event.year);

    let mut seen = HashSet::new();
    events.retain(|event| {
        let prefix: String = event.description.chars().take(EVENT_KEY_CHARS).collect();
        seen.insert((event.year, event.kind, prefix))
    });
    events
}

fn matching_claim<'s>(section: &'s Section, sentence: &str) -> Option<&'s Claim> {
    let sentence = normalize_string(sentence);
    if sentence.is_empty() {
        return None;
    }

    section.claims.iter().find(|claim| {
        let text = normalize_string(&claim.text);
        !text.is_empty() && (text.contains(&sentence) || sentence.contains(&text))
    })
}

/// Assemble entities, relationships and timeline into a graph around `subject`
pub fn generate_knowledge_graph(
    subject: &str,
    entities: &[Entity],
    relationships: &[Relationship],
    timeline: &[TimelineEvent],
) -> KnowledgeGraph {
    let mut nodes = Vec::with_capacity(entities.len() + 1);
    nodes.push(GraphNode {
        id: subject.to_string(),
        kind: "subject".to_string(),
        label: subject.to_string(),
        wikipedia_url: None,
        mention_count: 0,
    });
    nodes.extend(entities.iter().map(|entity| GraphNode {
        id: entity.name.clone(),
        kind: entity.kind.to_string(),
        label: entity.name.clone(),
        wikipedia_url: entity.wikipedia_url.clone(),
        mention_count: entity.mentions.len(),
    }));

    let mut edges: Vec<GraphEdge> = relationships
        .iter()
        .map(|rel| GraphEdge {
            source: rel.source.clone(),
            target: rel.target.clone(),
            kind: rel.kind.to_string(),
            year: None,
            confidence: rel.confidence,
        })
        .collect();

    for event in timeline {
        for entity in &event.entities_involved {
            edges.push(GraphEdge {
                source: subject.to_string(),
                target: entity.clone(),
                kind: format!("event_{}", event.kind),
                year: Some(event.year),
                confidence: event.confidence,
            });
        }
    }

    let mut entity_types = BTreeMap::new();
    for entity in entities {
        *entity_types.entry(entity.kind).or_insert(0) += 1;
    }

    KnowledgeGraph {
        subject: subject.to_string(),
        nodes,
        edges,
        timeline: timeline.to_vec(),
        statistics: GraphStatistics {
            total_entities: entities.len(),
            total_relationships: relationships.len(),
            timeline_events: timeline.len(),
            entity_types,
        },
    }
}
