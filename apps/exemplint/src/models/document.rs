//! Document model produced by the extractor.

use super::{Language, Polarity};
use crate::extract::polarity_of_line;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// A loaded standards document. Immutable once extracted.
pub struct Document {
    pub path: String,
    pub title: String,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// A heading with its prose and code exemplars.
pub struct Section {
    pub heading: String,
    /// Heading level; 0 for the preamble before the first heading.
    pub level: usize,
    pub line: usize,
    pub body: String,
    pub examples: Vec<CodeExample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// A fenced code block marked GOOD or BAD.
pub struct CodeExample {
    pub id: String,
    pub language: Language,
    pub polarity: Polarity,
    pub source: String,
    /// Index of the owning section in `Document::sections`.
    pub section: usize,
    /// First content line of the block in the document (1-indexed).
    pub line: usize,
    pub marker: String,
}

impl Document {
    /// Iterate all exemplars in document order. Each call starts over.
    pub fn examples(&self) -> impl Iterator<Item = &CodeExample> + '_ {
        self.sections.iter().flat_map(|s| s.examples.iter())
    }

    pub fn section_of(&self, example: &CodeExample) -> Option<&Section> {
        self.sections.get(example.section)
    }
}

impl Section {
    /// First sentence of the section prose, skipping GOOD/BAD marker lines.
    pub fn lead_sentence(&self) -> Option<&str> {
        let first_line = self
            .body
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && polarity_of_line(l).is_none())?;
        let end = first_line
            .find(". ")
            .map(|i| i + 1)
            .unwrap_or(first_line.len());
        let sentence = first_line[..end].trim();
        if sentence.is_empty() {
            None
        } else {
            Some(sentence)
        }
    }

    /// The GOOD exemplar paired with `bad`: the nearest GOOD one in the same
    /// section and language, preferring those that follow it.
    pub fn paired_good(&self, bad: &CodeExample) -> Option<&CodeExample> {
        let goods = self
            .examples
            .iter()
            .filter(|e| e.polarity == Polarity::Good && e.language == bad.language);
        let mut best: Option<&CodeExample> = None;
        for g in goods {
            let dist = g.line.abs_diff(bad.line);
            let after = g.line > bad.line;
            best = match best {
                None => Some(g),
                Some(b) => {
                    let bdist = b.line.abs_diff(bad.line);
                    let bafter = b.line > bad.line;
                    if (after && !bafter) || (after == bafter && dist < bdist) {
                        Some(g)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        best
    }
}
