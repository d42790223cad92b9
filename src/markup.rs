use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

/// Longest sanitized name kept in a reference id
pub const MAX_ID_LEN: usize = 50;

static REF_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<ref\b([^>]*?)(/?)>").expect("valid regex"));
static REF_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</ref\s*>").expect("valid regex"));
static REF_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bname\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'/>]+))"#).expect("valid regex")
});
static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\]|]*)(?:\|([^\]]*))?\]\]").expect("valid regex"));
static EMPHASIS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"'{2,3}").expect("valid regex"));
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<style\b[^>]*>.*?</style>|<script\b[^>]*>.*?</script>").expect("valid regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// One `<ref>...</ref>` body, keyed by its reference id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReference {
    pub id: String,
    /// Trimmed text between the opening and closing tags
    pub template: String,
}

/// Scan article source for reference spans, in document order.
///
/// Named references get `ref_<sanitized name>`; the first definition of a
/// name wins and self-closing re-uses (`<ref name="x" />`) are skipped.
/// Unnamed references get `ref_<n>` where `n` counts the distinct references
/// seen so far, skipping any id a named reference anywhere in the source
/// sanitizes to. Spans without a closing tag are dropped. Malformed markup
/// is never an error, it just does not match.
pub fn parse_references(source: &str) -> Vec<RawReference> {
    let mut references = Vec::new();
    let mut seen = HashSet::new();
    let reserved: HashSet<String> = REF_OPEN_RE
        .captures_iter(source)
        .filter_map(|caps| reference_name(caps.get(1).map_or("", |m| m.as_str())))
        .map(|name| format!("ref_{}", sanitize_id(name)))
        .collect();
    let mut pos = 0;

    while let Some(open) = REF_OPEN_RE.captures(&source[pos..]) {
        let Some(tag) = open.get(0) else { break };
        let attrs = open.get(1).map_or("", |m| m.as_str());
        let self_closing = open.get(2).is_some_and(|m| !m.as_str().is_empty());
        pos += tag.end();

        if self_closing {
            continue;
        }

        let Some(close) = REF_CLOSE_RE.find(&source[pos..]) else {
            break;
        };
        let body = &source[pos..pos + close.start()];

        // A second opening tag before the close means this span never closed;
        // resume scanning at the nested tag.
        if contains_open_ref(body) {
            continue;
        }
        pos += close.end();

        let id = match reference_name(attrs) {
            Some(name) => format!("ref_{}", sanitize_id(name)),
            None => next_unnamed_id(&seen, &reserved, references.len()),
        };

        if !seen.insert(id.clone()) {
            continue;
        }

        references.push(RawReference {
            id,
            template: body.trim().to_string(),
        });
    }

    references
}

fn contains_open_ref(body: &str) -> bool {
    REF_OPEN_RE
        .captures_iter(body)
        .any(|caps| caps.get(2).map_or(true, |m| m.as_str().is_empty()))
}

fn reference_name(attrs: &str) -> Option<&str> {
    let caps = REF_NAME_RE.captures(attrs)?;
    let name = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))?
        .as_str()
        .trim();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn next_unnamed_id(seen: &HashSet<String>, reserved: &HashSet<String>, count: usize) -> String {
    let mut n = count + 1;
    loop {
        let id = format!("ref_{}", n);
        if !seen.contains(&id) && !reserved.contains(&id) {
            return id;
        }
        n += 1;
    }
}

/// Replace everything outside `[A-Za-z0-9_-]` with `_` and cap the length
pub fn sanitize_id(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_ID_LEN)
        .collect()
}

/// Extract `|key=value` pairs from every top-level template in `text`.
///
/// Keys are lowercased. Link markup is collapsed to its display text (or
/// target), emphasis quotes and nested templates are stripped, and empty
/// values are left out. When a key repeats, the first value wins.
pub fn parse_template_fields(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    for body in top_level_templates(text) {
        // First segment is the template name
        for segment in split_top_level(body).into_iter().skip(1) {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };

            let key = key.trim().to_lowercase();
            if key.is_empty()
                || !key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                continue;
            }

            let value = clean_field_value(value);
            if !value.is_empty() {
                fields.entry(key).or_insert(value);
            }
        }
    }

    fields
}

/// Bodies of the outermost `{{...}}` spans; an unterminated span runs to the end
fn top_level_templates(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut templates = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'{', b'{') => {
                if depth == 0 {
                    start = i + 2;
                }
                depth += 1;
                i += 2;
            }
            (b'}', b'}') if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    templates.push(&text[start..i]);
                }
                i += 2;
            }
            _ => i += 1,
        }
    }

    if depth > 0 && start <= text.len() {
        templates.push(&text[start..]);
    }

    templates
}

/// Split on `|` that sits outside nested `{{ }}` and `[[ ]]`
fn split_top_level(body: &str) -> Vec<&str> {
    let bytes = body.as_bytes();
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let pair = bytes.get(i + 1).map(|&next| (bytes[i], next));
        match pair {
            Some((b'{', b'{')) | Some((b'[', b'[')) => {
                depth += 1;
                i += 2;
            }
            Some((b'}', b'}')) | Some((b']', b']')) if depth > 0 => {
                depth -= 1;
                i += 2;
            }
            _ => {
                if bytes[i] == b'|' && depth == 0 {
                    segments.push(&body[start..i]);
                    start = i + 1;
                }
                i += 1;
            }
        }
    }

    segments.push(&body[start..]);
    segments
}

fn clean_field_value(value: &str) -> String {
    let value = COMMENT_RE.replace_all(value, "");
    let value = strip_templates(&value);
    let value = LINK_RE.replace_all(&value, |caps: &regex::Captures| {
        let target = caps.get(1).map_or("", |m| m.as_str()).trim();
        let display = caps.get(2).map_or("", |m| m.as_str()).trim();
        if display.is_empty() {
            target.to_string()
        } else {
            display.to_string()
        }
    });
    let value = EMPHASIS_RE.replace_all(&value, "");
    value.trim().to_string()
}

fn strip_templates(value: &str) -> String {
    if !value.contains("{{") {
        return value.to_string();
    }

    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut depth = 0usize;
    let mut last = 0;
    let mut i = 0;

    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'{', b'{') => {
                if depth == 0 {
                    out.push_str(&value[last..i]);
                }
                depth += 1;
                i += 2;
            }
            (b'}', b'}') if depth > 0 => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    last = i;
                }
            }
            _ => i += 1,
        }
    }

    if depth == 0 {
        out.push_str(&value[last..]);
    }
    out
}

/// Strip tags and common entities from rendered HTML and collapse whitespace
pub fn clean_html(html: &str) -> String {
    let text = BLOCK_RE.replace_all(html, "");
    let text = TAG_RE.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
Alpha was founded in 1901.<ref name="smith">{{cite book |last=Smith |first=John |title=History of Alpha |year=1999}}</ref>
It grew quickly.<ref>{{cite web |url=https://example.org/a |title=Growth}}</ref>
Later it shrank.<ref name="smith" />
It was renamed.<ref name='Jones 2003'>{{cite news |title=Renamed}}</ref>
"#;

    #[test]
    fn test_named_and_unnamed_ids() {
        let refs = parse_references(SOURCE);
        let ids: Vec<_> = refs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ref_smith", "ref_2", "ref_Jones_2003"]);
        assert!(refs[0].template.starts_with("{{cite book"));
    }

    #[test]
    fn test_self_closing_reuse_does_not_swallow_following_text() {
        let source = r#"A.<ref name="a" /> B.<ref name="a">{{cite web |title=Late definition}}</ref>"#;
        let refs = parse_references(source);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].id, "ref_a");
        assert_eq!(refs[0].template, "{{cite web |title=Late definition}}");
    }

    #[test]
    fn test_first_definition_wins() {
        let source = r#"<ref name="x">first</ref><ref name="x">second</ref>"#;
        let refs = parse_references(source);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].template, "first");
    }

    #[test]
    fn test_unterminated_span_is_skipped() {
        let source = "<ref>{{cite web |title=Broken}} text <ref>{{cite web |title=Fine}}</ref>";
        let refs = parse_references(source);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].template, "{{cite web |title=Fine}}");

        assert!(parse_references("<ref>never closed").is_empty());
    }

    #[test]
    fn test_references_tag_is_not_a_ref() {
        let refs = parse_references("Text<ref>one</ref>\n<references />");
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn test_parsing_is_idempotent() {
        assert_eq!(parse_references(SOURCE), parse_references(SOURCE));
    }

    #[test]
    fn test_ids_are_sanitized_and_bounded() {
        let long_name = "n".repeat(80);
        let source = format!(r#"<ref name="{}">x</ref><ref name="a.b/c">y</ref>"#, long_name);
        let re = Regex::new(r"^ref_[A-Za-z0-9_-]{1,50}$").unwrap();
        for reference in parse_references(&source) {
            assert!(re.is_match(&reference.id), "bad id {}", reference.id);
        }
        assert_eq!(sanitize_id("a.b/c"), "a_b_c");
    }

    #[test]
    fn test_unnamed_counter_skips_taken_ids() {
        let source = r#"<ref name="2">named</ref><ref>unnamed</ref>"#;
        let refs = parse_references(source);
        let ids: Vec<_> = refs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ref_2", "ref_3"]);
    }

    #[test]
    fn test_later_numeric_name_keeps_its_definition() {
        let source = concat!(
            "<ref>One</ref><ref>Two</ref><ref>Three</ref>",
            r#"<ref name="3">{{cite book |title=Named three}}</ref>"#,
        );
        let refs = parse_references(source);
        let ids: Vec<_> = refs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ref_1", "ref_2", "ref_4", "ref_3"]);
        assert_eq!(refs[2].template, "Three");
        assert_eq!(refs[3].template, "{{cite book |title=Named three}}");
    }

    #[test]
    fn test_template_fields() {
        let fields = parse_template_fields(
            "{{Cite Journal |Last=Doe |first= Jane |title='''Bold''' claims about [[Physics|physics]] and [[Chemistry]] |journal= |doi=10.1000/xyz}}",
        );
        assert_eq!(fields.get("last").map(String::as_str), Some("Doe"));
        assert_eq!(fields.get("first").map(String::as_str), Some("Jane"));
        assert_eq!(
            fields.get("title").map(String::as_str),
            Some("Bold claims about physics and Chemistry")
        );
        assert!(!fields.contains_key("journal"));
        assert_eq!(fields.get("doi").map(String::as_str), Some("10.1000/xyz"));
    }

    #[test]
    fn test_nested_templates_do_not_split_fields() {
        let fields = parse_template_fields(
            "{{cite web |url=https://example.org/?a=b |date={{Start date|2020|1|2}} |title=Page{{!}}Name}}",
        );
        assert_eq!(fields.get("url").map(String::as_str), Some("https://example.org/?a=b"));
        assert!(!fields.contains_key("date"));
        assert_eq!(fields.get("title").map(String::as_str), Some("PageName"));
    }

    #[test]
    fn test_plain_text_reference_has_no_fields() {
        assert!(parse_template_fields("Smith 2001, p. 4").is_empty());
    }

    #[test]
    fn test_clean_html() {
        let html = "<p>Alpha&nbsp;&amp; <b>Beta</b>\n\n<style>.x{}</style>gamma</p>";
        assert_eq!(clean_html(html), "Alpha & Beta gamma");
    }
}
