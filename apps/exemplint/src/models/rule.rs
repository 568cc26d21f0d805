//! Rule schema shared by the synthesizer, registry, cache and scanner.
//!
//! A rule pairs a declarative `Matcher` with reporting metadata. Matchers are
//! closed variants evaluated against a `Sketch`; `Pattern` is the escape
//! hatch for rules declared in configuration.

use super::{Language, Severity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// An executable check derived from a BAD exemplar or declared in config.
pub struct Rule {
    pub id: String,
    pub language: Language,
    pub severity: Severity,
    pub matcher: Matcher,
    pub message: String,
    pub source: RuleSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good_example: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Provenance of a rule: the document and exemplar it was derived from.
pub struct RuleSource {
    pub document: String,
    pub example: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Declarative predicates over a syntax sketch.
pub enum Matcher {
    /// A catalogued blocking call inside an async function or go block.
    BlockingCallInAsync { calls: Vec<String> },
    /// An interpolated string reaching a query/shell/eval sink.
    InterpolatedSink { sinks: Vec<String> },
    /// A mutable collection annotation on a frozen/readonly model field.
    MutableFieldInFrozenModel,
    /// A mutable literal used as a Python default argument.
    MutableDefaultArgument,
    /// `useEffect(async ...)`.
    AsyncEffectCallback,
    /// A Reagent atom created inside a form-1 render function.
    AtomInRender,
    /// A regular expression applied per line (configured rules only).
    Pattern { regex: String },
}

impl Matcher {
    /// Kebab-case kind used in rule ids.
    pub fn kind(&self) -> &'static str {
        match self {
            Matcher::BlockingCallInAsync { .. } => "blocking-call-in-async",
            Matcher::InterpolatedSink { .. } => "interpolated-sink",
            Matcher::MutableFieldInFrozenModel => "mutable-field-in-frozen-model",
            Matcher::MutableDefaultArgument => "mutable-default-argument",
            Matcher::AsyncEffectCallback => "async-effect-callback",
            Matcher::AtomInRender => "atom-in-render",
            Matcher::Pattern { .. } => "pattern",
        }
    }

    /// Human phrase describing what the matcher flags.
    pub fn summary(&self) -> String {
        match self {
            Matcher::BlockingCallInAsync { calls } => {
                format!("blocking call inside async function: {}", calls.join(", "))
            }
            Matcher::InterpolatedSink { sinks } => format!(
                "interpolated string passed to query/shell execution: {}",
                sinks.join(", ")
            ),
            Matcher::MutableFieldInFrozenModel => {
                "mutable collection field on an immutable model".to_string()
            }
            Matcher::MutableDefaultArgument => "mutable default argument".to_string(),
            Matcher::AsyncEffectCallback => "async function passed to useEffect".to_string(),
            Matcher::AtomInRender => "reagent atom created inside render function".to_string(),
            Matcher::Pattern { regex } => format!("pattern match: {}", regex),
        }
    }

    /// Optional discriminator appended to the rule id.
    pub fn discriminator(&self) -> Option<String> {
        let names = match self {
            Matcher::BlockingCallInAsync { calls } => calls,
            Matcher::InterpolatedSink { sinks } => sinks,
            _ => return None,
        };
        Some(
            names
                .iter()
                .map(|n| n.trim_start_matches('.'))
                .collect::<Vec<_>>()
                .join("+"),
        )
    }

    /// Whether the matcher understands sketches of `language`.
    pub fn supports(&self, language: Language) -> bool {
        match self {
            Matcher::BlockingCallInAsync { .. } | Matcher::InterpolatedSink { .. } => matches!(
                language,
                Language::Python | Language::TypeScript | Language::Clojure
            ),
            Matcher::MutableFieldInFrozenModel => {
                matches!(language, Language::Python | Language::TypeScript)
            }
            Matcher::MutableDefaultArgument => language == Language::Python,
            Matcher::AsyncEffectCallback => language == Language::TypeScript,
            Matcher::AtomInRender => language == Language::Clojure,
            Matcher::Pattern { .. } => true,
        }
    }
}

/// Compose the stable id of a synthesized rule.
pub fn rule_id(language: Language, matcher: &Matcher) -> String {
    match matcher.discriminator() {
        Some(d) if !d.is_empty() => format!("{}.{}.{}", language, matcher.kind(), d),
        _ => format!("{}.{}", language, matcher.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_id_includes_discriminator() {
        let m = Matcher::BlockingCallInAsync {
            calls: vec!["time.sleep".into()],
        };
        assert_eq!(
            rule_id(Language::Python, &m),
            "python.blocking-call-in-async.time.sleep"
        );
        assert_eq!(
            rule_id(Language::Python, &Matcher::MutableDefaultArgument),
            "python.mutable-default-argument"
        );
    }

    #[test]
    fn test_matcher_serializes_with_kind_tag() {
        let m = Matcher::InterpolatedSink {
            sinks: vec!["execute".into()],
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["kind"], "interpolated_sink");
        assert_eq!(v["sinks"][0], "execute");
    }
}
