//! Example extraction from standards documents.
//!
//! Markdown is parsed with `pulldown-cmark` into a flat list of headings,
//! prose elements and fenced code blocks. A code block becomes a
//! `CodeExample` when a GOOD/BAD marker sits directly before it, on its first
//! comment line, or directly after it within the same section.
//!
//! Broken fences do not abort the document: an unterminated fence, or a fence
//! opened inside another block, is reported as an extraction warning and
//! parsing resumes on the line after the broken opener.

use crate::error::{Error, Result};
use crate::models::document::{CodeExample, Document, Section};
use crate::models::{Diagnostic, Language, Polarity};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// A document together with the warnings raised while extracting it.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub document: Document,
    pub warnings: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Heading { level: usize, text: String, line: usize },
    Prose { text: String, line: usize },
    Code { info: String, content: String, line: usize },
    /// Placeholder for a skipped broken block; markers never cross it.
    Broken,
}

enum Segment {
    Complete,
    /// Resume at absolute byte offset `at`.
    Restart { at: usize, reason: &'static str },
}

/// Read and extract a document from disk. `display` is the path recorded on
/// the document and its exemplar ids.
pub fn load_document(path: &Path, display: &str) -> Result<Extraction> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(extract(display, &text))
}

/// Extract a document from raw Markdown text.
pub fn extract(path: &str, text: &str) -> Extraction {
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    let line_of = |offset: usize| line_starts.partition_point(|&s| s <= offset);

    let mut items: Vec<Item> = Vec::new();
    let mut warnings = Vec::new();
    let mut front_title: Option<String> = None;
    let mut offset = 0usize;
    loop {
        match parse_segment(text, offset, &line_of, &mut items, &mut front_title) {
            Segment::Complete => break,
            Segment::Restart { at, reason } => {
                let line = line_of(at.saturating_sub(1));
                log::warn!("{}:{}: {}", path, line, reason);
                warnings.push(Diagnostic::ExtractionWarning {
                    document: path.to_string(),
                    line,
                    message: reason.to_string(),
                });
                offset = at;
            }
        }
    }
    let document = assemble(path, items, front_title);
    Extraction { document, warnings }
}

fn parse_segment(
    text: &str,
    base: usize,
    line_of: &dyn Fn(usize) -> usize,
    items: &mut Vec<Item>,
    front_title: &mut Option<String>,
) -> Segment {
    let seg = &text[base..];
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_TABLES);
    if base == 0 {
        opts.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    }

    let mut prose = String::new();
    let mut prose_line = 0usize;
    let mut heading: Option<(usize, usize, String)> = None;
    let mut code: Option<(String, usize, String)> = None;
    let mut in_indented = false;
    let mut meta: Option<String> = None;

    for (event, range) in Parser::new_ext(seg, opts).into_offset_iter() {
        let abs = base + range.start;
        match event {
            Event::Start(Tag::MetadataBlock(_)) => meta = Some(String::new()),
            Event::End(TagEnd::MetadataBlock(_)) => {
                if let Some(m) = meta.take() {
                    *front_title = front_matter_title(&m);
                }
            }
            Event::Start(Tag::Heading { level, .. }) => {
                flush_prose(&mut prose, prose_line, items);
                heading = Some((level as usize, line_of(abs), String::new()));
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, line, t)) = heading.take() {
                    items.push(Item::Heading {
                        level,
                        text: t.trim().to_string(),
                        line,
                    });
                }
            }
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                flush_prose(&mut prose, prose_line, items);
                let raw = &seg[range.clone()];
                if let Some((reason, restart)) = check_fence(raw) {
                    items.push(Item::Broken);
                    return Segment::Restart {
                        at: abs + restart,
                        reason,
                    };
                }
                code = Some((info.to_string(), line_of(abs) + 1, String::new()));
            }
            Event::Start(Tag::CodeBlock(CodeBlockKind::Indented)) => {
                flush_prose(&mut prose, prose_line, items);
                in_indented = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((info, line, content)) = code.take() {
                    items.push(Item::Code {
                        info,
                        content,
                        line,
                    });
                }
                in_indented = false;
            }
            Event::Text(t) | Event::Code(t) | Event::Html(t) | Event::InlineHtml(t) => {
                if let Some(m) = meta.as_mut() {
                    m.push_str(&t);
                } else if let Some((_, _, h)) = heading.as_mut() {
                    h.push_str(&t);
                } else if let Some((_, _, c)) = code.as_mut() {
                    c.push_str(&t);
                } else if !in_indented {
                    if prose.is_empty() {
                        prose_line = line_of(abs);
                    }
                    prose.push_str(&t);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if heading.is_none() && code.is_none() {
                    prose.push('\n');
                }
            }
            Event::End(TagEnd::Paragraph | TagEnd::Item | TagEnd::Table) | Event::Rule => {
                flush_prose(&mut prose, prose_line, items);
            }
            _ => {}
        }
    }
    flush_prose(&mut prose, prose_line, items);
    Segment::Complete
}

fn flush_prose(prose: &mut String, line: usize, items: &mut Vec<Item>) {
    let t = prose.trim();
    if !t.is_empty() {
        items.push(Item::Prose {
            text: t.to_string(),
            line,
        });
    }
    prose.clear();
}

/// Validate a fenced block's raw source. Returns the warning text and the
/// byte offset (relative to `raw`) to resume parsing at.
fn check_fence(raw: &str) -> Option<(&'static str, usize)> {
    let first_len = raw.find('\n').unwrap_or(raw.len());
    let opener = unquote(&raw[..first_len]);
    let fence_char = opener.chars().next()?;
    let fence_len = opener.chars().take_while(|&c| c == fence_char).count();
    let resume = (first_len + 1).min(raw.len());

    let body: Vec<&str> = raw[resume..].lines().collect();
    let closed = body.last().is_some_and(|l| {
        let t = unquote(l).trim_end();
        t.chars().count() >= fence_len && t.chars().all(|c| c == fence_char)
    });
    if !closed {
        return Some(("unterminated code fence", resume));
    }
    let inner = &body[..body.len() - 1];
    let nested = inner.iter().any(|l| {
        let t = unquote(l);
        let run = t.chars().take_while(|&c| c == fence_char).count();
        run >= fence_len && !t[run * fence_char.len_utf8()..].trim().is_empty()
    });
    if nested {
        return Some(("code fence opened inside another code block", resume));
    }
    None
}

/// Strip indentation and blockquote markers from a fence line.
fn unquote(line: &str) -> &str {
    line.trim_start_matches(|c: char| c == '>' || c.is_whitespace())
}

fn front_matter_title(yaml: &str) -> Option<String> {
    let value: serde_yaml::Value = serde_yaml::from_str(yaml).ok()?;
    value
        .get("name")
        .or_else(|| value.get("title"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn good_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:(?:✅|✔|☑|👍|🟢)\x{FE0F}?\s*[^\w\s]*\s*(?:good|correct)\b|^[\s#/;*>_\-\[(]*good\b\s*(?:[:\-—)\]*_]|$))",
        )
        .expect("static regex")
    })
}

fn bad_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:(?:❌|✗|✘|✖|🚫|⛔|👎|🔴)\x{FE0F}?\s*[^\w\s]*\s*(?:bad|wrong|incorrect|avoid)\b|^[\s#/;*>_\-\[(]*bad\b\s*(?:[:\-—)\]*_]|$))",
        )
        .expect("static regex")
    })
}

/// Polarity announced by a single line, if unambiguous.
pub fn polarity_of_line(line: &str) -> Option<Polarity> {
    match (good_re().is_match(line), bad_re().is_match(line)) {
        (true, false) => Some(Polarity::Good),
        (false, true) => Some(Polarity::Bad),
        _ => None,
    }
}

/// Polarity of a prose element: last line first, then upwards.
fn polarity_of_text(text: &str) -> Option<(Polarity, String)> {
    text.lines()
        .rev()
        .find_map(|l| polarity_of_line(l).map(|p| (p, l.trim().to_string())))
}

/// Polarity from the first line of a code block when it is a comment.
fn polarity_of_code(content: &str) -> Option<(Polarity, String)> {
    let first = content.lines().find(|l| !l.trim().is_empty())?;
    let t = first.trim_start();
    let is_comment = ["#", "//", ";", "/*", "--"].iter().any(|c| t.starts_with(c));
    if !is_comment {
        return None;
    }
    polarity_of_line(t).map(|p| (p, t.to_string()))
}

fn item_text(item: &Item) -> Option<&str> {
    match item {
        Item::Heading { text, .. } | Item::Prose { text, .. } => Some(text),
        _ => None,
    }
}

fn resolve_polarity(items: &[Item], k: usize, content: &str) -> Option<(Polarity, String)> {
    if k > 0 {
        if let Some(found) = item_text(&items[k - 1]).and_then(polarity_of_text) {
            return Some(found);
        }
    }
    if let Some(found) = polarity_of_code(content) {
        return Some(found);
    }
    if let Some(Item::Prose { text, .. }) = items.get(k + 1) {
        let claimed_by_next = matches!(items.get(k + 2), Some(Item::Code { .. }));
        if !claimed_by_next {
            return polarity_of_text(text);
        }
    }
    None
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

fn assemble(path: &str, items: Vec<Item>, front_title: Option<String>) -> Document {
    let first_h1 = items.iter().find_map(|i| match i {
        Item::Heading { level: 1, text, .. } => Some(text.clone()),
        _ => None,
    });
    let title = front_title.or(first_h1).unwrap_or_else(|| file_stem(path));

    let mut sections = vec![Section {
        heading: title.clone(),
        level: 0,
        line: 1,
        body: String::new(),
        examples: Vec::new(),
    }];
    let mut ordinal = 0usize;
    for (k, item) in items.iter().enumerate() {
        match item {
            Item::Heading { level, text, line } => sections.push(Section {
                heading: text.clone(),
                level: *level,
                line: *line,
                body: String::new(),
                examples: Vec::new(),
            }),
            Item::Prose { text, .. } => {
                if let Some(cur) = sections.last_mut() {
                    if !cur.body.is_empty() {
                        cur.body.push('\n');
                    }
                    cur.body.push_str(text);
                }
            }
            Item::Code {
                info,
                content,
                line,
            } => {
                ordinal += 1;
                let Some((polarity, marker)) = resolve_polarity(&items, k, content) else {
                    log::debug!("{}:{}: code block without polarity marker", path, line);
                    continue;
                };
                let section = sections.len() - 1;
                if let Some(cur) = sections.last_mut() {
                    cur.examples.push(CodeExample {
                        id: format!("{}#{}", path, ordinal),
                        language: Language::from_info(info),
                        polarity,
                        source: content.clone(),
                        section,
                        line: *line,
                        marker,
                    });
                }
            }
            Item::Broken => {}
        }
    }
    Document {
        path: path.to_string(),
        title,
        sections,
    }
}
