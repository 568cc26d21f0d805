//! Rule registry: built once per run, shared read-only by scanner workers.

use crate::config::{CustomRule, RuleSetting};
use crate::error::{Error, Result};
use crate::extract::{self, Extraction};
use crate::models::document::Document;
use crate::models::rule::{Matcher, Rule, RuleSource};
use crate::models::{Diagnostic, Language};
use crate::synth;
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
    by_id: HashMap<String, usize>,
    by_language: BTreeMap<Language, Vec<usize>>,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    pub registry: RuleRegistry,
    pub diagnostics: Vec<Diagnostic>,
}

/// Raw text of a standards document, as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Display path (relative to the repository root when possible).
    pub path: String,
    pub text: String,
}

impl RuleRegistry {
    /// Synthesize rules from `documents` (processed in path order). The first
    /// rule with a given id wins; later ones become duplicate warnings.
    pub fn build(documents: &[Document]) -> BuildOutcome {
        let mut ordered: Vec<&Document> = documents.iter().collect();
        ordered.sort_by(|a, b| a.path.cmp(&b.path));
        let rules = ordered
            .into_iter()
            .flat_map(synth::synthesize_document)
            .collect();
        Self::from_rules(rules)
    }

    /// Index an ordered rule list, dropping duplicate ids.
    pub fn from_rules(rules: Vec<Rule>) -> BuildOutcome {
        let mut registry = RuleRegistry::default();
        let mut diagnostics = Vec::new();
        for rule in rules {
            if let Some(&at) = registry.by_id.get(&rule.id) {
                let kept = &registry.rules[at];
                log::warn!(
                    "duplicate rule {} from {} (kept {})",
                    rule.id,
                    rule.source.example,
                    kept.source.example
                );
                diagnostics.push(Diagnostic::DuplicateRuleWarning {
                    rule_id: rule.id.clone(),
                    kept: kept.source.example.clone(),
                    dropped: rule.source.example.clone(),
                });
                continue;
            }
            registry.push(rule);
        }
        BuildOutcome {
            registry,
            diagnostics,
        }
    }

    fn push(&mut self, rule: Rule) {
        let at = self.rules.len();
        self.by_id.insert(rule.id.clone(), at);
        self.by_language.entry(rule.language).or_default().push(at);
        self.rules.push(rule);
    }

    /// Rules applicable to `language`, in registry order.
    pub fn lookup(&self, language: Language) -> Vec<&Rule> {
        self.by_language
            .get(&language)
            .map(|idx| idx.iter().map(|&i| &self.rules[i]).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.by_id.get(id).map(|&i| &self.rules[i])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Languages that have at least one rule.
    pub fn languages(&self) -> Vec<Language> {
        self.by_language.keys().copied().collect()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn into_rules(self) -> Vec<Rule> {
        self.rules
    }

    /// Apply configured per-rule settings and append custom pattern rules.
    /// `origin` names the configuration file for custom rule provenance.
    pub fn with_overrides(
        self,
        settings: &BTreeMap<String, RuleSetting>,
        custom: &[CustomRule],
        origin: &str,
    ) -> Result<Self> {
        let mut rules = self.rules;
        for c in custom {
            let language: Language = c.language.parse().map_err(Error::Config)?;
            if rules.iter().any(|r| r.id == c.id) {
                return Err(Error::Config(format!(
                    "custom rule '{}' clashes with a synthesized rule",
                    c.id
                )));
            }
            rules.push(Rule {
                id: c.id.clone(),
                language,
                severity: c.severity,
                matcher: Matcher::Pattern {
                    regex: c.pattern.clone(),
                },
                message: c.message.clone().unwrap_or_else(|| c.id.clone()),
                source: RuleSource {
                    document: origin.to_string(),
                    example: format!("{}#custom.{}", origin, c.id),
                },
                good_example: None,
                suggestion: None,
            });
        }
        for id in settings.keys() {
            if !rules.iter().any(|r| &r.id == id) {
                log::warn!("configuration references unknown rule {}", id);
            }
        }
        let mut out = RuleRegistry::default();
        for mut rule in rules {
            match settings.get(&rule.id) {
                Some(s) if s.disabled => {
                    log::debug!("rule {} disabled by configuration", rule.id);
                    continue;
                }
                Some(RuleSetting {
                    severity: Some(sev),
                    ..
                }) => rule.severity = *sev,
                _ => {}
            }
            if out.by_id.contains_key(&rule.id) {
                return Err(Error::Config(format!("duplicate custom rule '{}'", rule.id)));
            }
            out.push(rule);
        }
        Ok(out)
    }
}

/// SHA-1 over the tool version and every document's path and text, in path
/// order. Any change to the inputs changes the key.
pub fn content_hash(sources: &[SourceDocument]) -> String {
    let mut ordered: Vec<&SourceDocument> = sources.iter().collect();
    ordered.sort_by(|a, b| a.path.cmp(&b.path));
    let mut hasher = Sha1::new();
    hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
    for s in ordered {
        hasher.update([0u8]);
        hasher.update(s.path.as_bytes());
        hasher.update([0u8]);
        hasher.update(s.text.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Expand document globs relative to `root` into a sorted, deduplicated
/// list of files.
pub fn discover_documents(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for pat in patterns {
        let full = root.join(pat).to_string_lossy().to_string();
        let paths = glob::glob(&full).map_err(|source| Error::Glob {
            pattern: pat.clone(),
            source,
        })?;
        out.extend(paths.flatten().filter(|p| p.is_file()));
    }
    out.sort();
    out.dedup();
    Ok(out)
}

/// Documents read from disk, plus one `DocumentSkipped` per file that could
/// not be read.
#[derive(Debug, Clone, Default)]
pub struct LoadedDocuments {
    pub sources: Vec<SourceDocument>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Read every document. Unreadable or undecodable documents are skipped with
/// a diagnostic; the build fails only when none of `files` is loadable.
pub fn read_documents(root: &Path, files: &[PathBuf]) -> Result<LoadedDocuments> {
    let mut loaded = LoadedDocuments::default();
    for p in files {
        let path = crate::utils::display_path(root, p);
        match std::fs::read_to_string(p) {
            Ok(text) => loaded.sources.push(SourceDocument { path, text }),
            Err(e) => {
                log::warn!("skipping standards document {}: {}", path, e);
                loaded.diagnostics.push(Diagnostic::DocumentSkipped {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }
    if loaded.sources.is_empty() && !files.is_empty() {
        return Err(Error::RegistryBuildFailed(format!(
            "none of the {} standards documents could be read",
            files.len()
        )));
    }
    Ok(loaded)
}

/// Extract all documents and build the registry. Extraction warnings come
/// first in the diagnostics, followed by duplicate warnings.
pub fn build_from_sources(sources: &[SourceDocument]) -> BuildOutcome {
    let mut diagnostics = Vec::new();
    let mut documents = Vec::with_capacity(sources.len());
    for s in sources {
        let Extraction { document, warnings } = extract::extract(&s.path, &s.text);
        diagnostics.extend(warnings);
        documents.push(document);
    }
    let mut outcome = RuleRegistry::build(&documents);
    diagnostics.append(&mut outcome.diagnostics);
    outcome.diagnostics = diagnostics;
    log::debug!(
        "registry built: {} rules from {} documents",
        outcome.registry.len(),
        sources.len()
    );
    outcome
}
