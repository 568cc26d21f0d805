//! Shared data models for extraction, rules, findings and diagnostics.

pub mod document;
pub mod rule;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Languages exemplars and target files are classified into.
pub enum Language {
    Clojure,
    Python,
    TypeScript,
    Other,
}

impl Language {
    /// Map a fence info string (first word) to a language.
    pub fn from_info(info: &str) -> Self {
        let word = info
            .split(|c: char| c.is_whitespace() || c == ',' || c == '{')
            .next()
            .unwrap_or("")
            .trim_start_matches('.')
            .to_ascii_lowercase();
        match word.as_str() {
            "clojure" | "clj" | "cljs" | "cljc" | "edn" | "clojurescript" | "reagent" => {
                Language::Clojure
            }
            "python" | "py" | "python3" | "py3" | "fastapi" => Language::Python,
            "typescript" | "ts" | "tsx" | "javascript" | "js" | "jsx" | "react" => {
                Language::TypeScript
            }
            _ => Language::Other,
        }
    }

    /// Map a file extension (without the dot) to a language.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "clj" | "cljs" | "cljc" | "edn" => Some(Language::Clojure),
            "py" | "pyi" => Some(Language::Python),
            "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => Some(Language::TypeScript),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Clojure => "clojure",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::Other => "other",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Language::from_info(s) {
            Language::Other if !s.eq_ignore_ascii_case("other") => {
                Err(format!("unknown language '{}'", s))
            }
            lang => Ok(lang),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Whether an exemplar shows the recommended or the discouraged form.
pub enum Polarity {
    Good,
    Bad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Finding severity. Ordered so that `Info < Warn < Error`.
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" | "low" => Ok(Severity::Info),
            "warn" | "warning" | "medium" => Ok(Severity::Warn),
            "error" | "high" => Ok(Severity::Error),
            other => Err(format!("unknown severity '{}' (expected info|warn|error)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// A single rule violation at a file location.
pub struct Finding {
    pub rule_id: String,
    pub path: String,
    pub line_start: usize,
    pub line_end: usize,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Non-fatal conditions met while extracting, building or scanning.
pub enum Diagnostic {
    ExtractionWarning {
        document: String,
        line: usize,
        message: String,
    },
    DocumentSkipped {
        path: String,
        reason: String,
    },
    DuplicateRuleWarning {
        rule_id: String,
        kept: String,
        dropped: String,
    },
    FileSkipped {
        path: String,
        reason: String,
    },
    RuleFailure {
        rule_id: String,
        path: String,
        message: String,
    },
    ScanCancelled {
        completed: usize,
        total: usize,
    },
}

impl Diagnostic {
    /// Stable ordering key: variant rank, then the identifying fields.
    pub fn sort_key(&self) -> (u8, String, String) {
        match self {
            Diagnostic::ExtractionWarning {
                document, line, ..
            } => (0, document.clone(), format!("{:010}", line)),
            Diagnostic::DocumentSkipped { path, .. } => (0, path.clone(), String::new()),
            Diagnostic::DuplicateRuleWarning { rule_id, dropped, .. } => {
                (1, rule_id.clone(), dropped.clone())
            }
            Diagnostic::FileSkipped { path, .. } => (2, path.clone(), String::new()),
            Diagnostic::RuleFailure { rule_id, path, .. } => (3, path.clone(), rule_id.clone()),
            Diagnostic::ScanCancelled { .. } => (4, String::new(), String::new()),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ExtractionWarning {
                document,
                line,
                message,
            } => write!(f, "extraction warning: {}:{}: {}", document, line, message),
            Diagnostic::DocumentSkipped { path, reason } => {
                write!(f, "document skipped: {}: {}", path, reason)
            }
            Diagnostic::DuplicateRuleWarning {
                rule_id,
                kept,
                dropped,
            } => write!(
                f,
                "duplicate rule: {} from {} merged into {}",
                rule_id, dropped, kept
            ),
            Diagnostic::FileSkipped { path, reason } => {
                write!(f, "file skipped: {}: {}", path, reason)
            }
            Diagnostic::RuleFailure {
                rule_id,
                path,
                message,
            } => write!(f, "rule failure: {} on {}: {}", rule_id, path, message),
            Diagnostic::ScanCancelled { completed, total } => write!(
                f,
                "scan cancelled: {} of {} files completed",
                completed, total
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
/// Aggregated counts used by printers.
pub struct Summary {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub files: usize,
    pub diagnostics: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
/// Scan output: findings, diagnostics and bookkeeping.
pub struct ScanReport {
    pub findings: Vec<Finding>,
    pub diagnostics: Vec<Diagnostic>,
    pub files_scanned: usize,
    pub cancelled: bool,
}

impl ScanReport {
    pub fn summary(&self) -> Summary {
        let mut s = Summary {
            files: self.files_scanned,
            diagnostics: self.diagnostics.len(),
            ..Summary::default()
        };
        for f in &self.findings {
            match f.severity {
                Severity::Error => s.errors += 1,
                Severity::Warn => s.warnings += 1,
                Severity::Info => s.infos += 1,
            }
        }
        s
    }
}
