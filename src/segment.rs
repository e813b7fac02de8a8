//! Pull "requirements" and "responsibilities" sections out of a free-form
//! (often HTML) vacancy description.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::warn;

use crate::error::Result;
use crate::model::Vacancy;

/// Cleaned sections must be longer than this many characters.
const MIN_SECTION_CHARS: usize = 10;

const REQUIREMENTS_LABEL: &str = "(?:Требования|Requirements)";
const RESPONSIBILITIES_LABEL: &str = "(?:Обязанности|Responsibilities)";
const TASKS_LABEL: &str = "(?:Задачи|Tasks)";

/// A section header plus the marker where its content stops.
/// Content runs from the end of `head` to the next `stop` or end of text.
struct SectionPattern {
    head: Regex,
    stop: Regex,
}

impl SectionPattern {
    /// `<p><strong>Label</strong></p>` followed by block content.
    fn paragraph(tag: &str, label: &str) -> Self {
        let head = format!(
            r"(?i)<p(?:\s[^>]*)?>\s*<{tag}(?:\s[^>]*)?>\s*{label}[^<]*</{tag}\s*>\s*</p\s*>"
        );
        let stop = format!(r"(?i)<p(?:\s[^>]*)?>\s*<{tag}(?:\s[^>]*)?>");
        Self::build(&head, &stop)
    }

    /// Inline `<strong>Label</strong>` running to the next emphasized label.
    fn inline(tag: &str, label: &str) -> Self {
        let head = format!(r"(?i)<{tag}(?:\s[^>]*)?>\s*{label}[^<]*</{tag}\s*>");
        let stop = format!(r"(?i)<{tag}(?:\s[^>]*)?>");
        Self::build(&head, &stop)
    }

    /// `Label:` in plain text, running to the next `Word:` line.
    fn plain(label: &str) -> Self {
        let head = format!(r"(?i){label}\s*:");
        Self::build(&head, r"(?i)\n[ \t]*[а-яёa-z]+:")
    }

    fn build(head: &str, stop: &str) -> Self {
        SectionPattern {
            head: Regex::new(head).unwrap(),
            stop: Regex::new(stop).unwrap(),
        }
    }

    fn capture<'t>(&self, text: &'t str) -> Option<&'t str> {
        let head = self.head.find(text)?;
        let rest = &text[head.end()..];
        // at least one character of content
        let first = rest.chars().next()?;
        let end = self
            .stop
            .find_at(rest, first.len_utf8())
            .map_or(rest.len(), |m| m.start());
        Some(&rest[..end])
    }
}

fn patterns_for(labels: &[&str]) -> Vec<SectionPattern> {
    let mut out = Vec::new();
    for label in labels {
        out.push(SectionPattern::paragraph("strong", label));
        out.push(SectionPattern::paragraph("b", label));
        out.push(SectionPattern::inline("strong", label));
        out.push(SectionPattern::inline("b", label));
    }
    for label in labels {
        out.push(SectionPattern::plain(label));
    }
    out
}

static REQUIREMENTS: LazyLock<Vec<SectionPattern>> =
    LazyLock::new(|| patterns_for(&[REQUIREMENTS_LABEL]));
static RESPONSIBILITIES: LazyLock<Vec<SectionPattern>> =
    LazyLock::new(|| patterns_for(&[RESPONSIBILITIES_LABEL, TASKS_LABEL]));

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#\d+|[a-zA-Z]+);").unwrap());
static LI_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<li(?:\s[^>]*)?>").unwrap());
static LI_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</li\s*>").unwrap());
static LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?(?:ul|ol)(?:\s[^>]*)?>").unwrap());
static P_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<p(?:\s[^>]*)?>").unwrap());
static BLOCK_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</p\s*>|</div\s*>|<br\s*/?>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\S\n]+").unwrap());
static NEWLINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\n\s*").unwrap());

/// Decode named and numeric HTML entities in one pass.
pub fn decode_entities(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |caps: &Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or(body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match body {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    "laquo" => Some('«'),
                    "raquo" => Some('»'),
                    "mdash" => Some('—'),
                    "ndash" => Some('–'),
                    "hellip" => Some('…'),
                    "bull" => Some('•'),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Strip markup down to text: list items become `• ` bullets, block ends
/// become newlines, whitespace runs collapse.
pub fn clean_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let text = decode_entities(html);
    let text = LI_OPEN_RE.replace_all(&text, "• ");
    let text = LI_CLOSE_RE.replace_all(&text, "\n");
    let text = LIST_RE.replace_all(&text, "");
    let text = P_OPEN_RE.replace_all(&text, "");
    let text = BLOCK_END_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = SPACES_RE.replace_all(&text, " ");
    let text = NEWLINES_RE.replace_all(&text, "\n");
    text.trim().to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segments {
    pub requirements: Option<String>,
    pub responsibilities: Option<String>,
}

pub type Cleaner = fn(&str) -> Result<String>;

fn default_cleaner(raw: &str) -> Result<String> {
    Ok(clean_html(raw))
}

pub struct Segmenter {
    cleaner: Cleaner,
}

impl Default for Segmenter {
    fn default() -> Self {
        Segmenter {
            cleaner: default_cleaner,
        }
    }
}

impl Segmenter {
    pub fn with_cleaner(cleaner: Cleaner) -> Self {
        Segmenter { cleaner }
    }

    /// Best effort: any failure is logged and yields empty segments.
    pub fn extract(&self, description: &str) -> Segments {
        if description.trim().is_empty() {
            return Segments::default();
        }
        match self.try_extract(description) {
            Ok(segments) => segments,
            Err(e) => {
                warn!(error = %e, len = description.len(), "Failed to segment description");
                Segments::default()
            }
        }
    }

    fn try_extract(&self, description: &str) -> Result<Segments> {
        Ok(Segments {
            requirements: self.first_accepted(&REQUIREMENTS, description)?,
            responsibilities: self.first_accepted(&RESPONSIBILITIES, description)?,
        })
    }

    fn first_accepted(&self, patterns: &[SectionPattern], text: &str) -> Result<Option<String>> {
        for pattern in patterns {
            let Some(raw) = pattern.capture(text) else {
                continue;
            };
            let cleaned = (self.cleaner)(raw)?;
            if cleaned.chars().count() > MIN_SECTION_CHARS {
                return Ok(Some(cleaned));
            }
        }
        Ok(None)
    }
}

pub fn extract_sections(description: &str) -> Segments {
    Segmenter::default().extract(description)
}

fn has_text(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// Fill blank requirements/responsibilities from the description.
/// Fields that already hold text are left alone.
pub fn fill_missing_sections(vacancy: &mut Vacancy) {
    let has_req = has_text(&vacancy.requirements);
    let has_resp = has_text(&vacancy.responsibilities);
    if has_req && has_resp {
        return;
    }
    let Some(description) = vacancy.description.as_deref() else {
        return;
    };
    let found = extract_sections(description);
    if !has_req && found.requirements.is_some() {
        vacancy.requirements = found.requirements;
    }
    if !has_resp && found.responsibilities.is_some() {
        vacancy.responsibilities = found.responsibilities;
    }
}
