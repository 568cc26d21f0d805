//! Pattern synthesis: BAD exemplar -> zero or one rule.
//!
//! Candidates are tried in a fixed order. The first whose matcher flags the
//! BAD snippet and stays silent on the paired GOOD snippet becomes the rule.

use crate::matchers::{self, blocking_catalog, name_matches, sink_catalog};
use crate::models::document::{CodeExample, Document, Section};
use crate::models::rule::{rule_id, Matcher, Rule, RuleSource};
use crate::models::{Polarity, Severity};
use crate::sketch::Sketch;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Synthesize rules for every BAD exemplar of `document`, in document order.
pub fn synthesize_document(document: &Document) -> Vec<Rule> {
    document
        .examples()
        .filter(|e| e.polarity == Polarity::Bad)
        .filter_map(|e| synthesize(document, e))
        .collect()
}

/// Synthesize the rule for one BAD exemplar, if a structural pattern is
/// derivable from it.
pub fn synthesize(document: &Document, bad: &CodeExample) -> Option<Rule> {
    if bad.polarity != Polarity::Bad {
        return None;
    }
    let section = document.section_of(bad)?;
    let bad_sketch = Sketch::new(&bad.source, bad.language);
    let good = section.paired_good(bad);
    let good_sketch = good.map(|g| Sketch::new(&g.source, g.language));

    let matcher = candidates(&bad_sketch).into_iter().find(|m| {
        let flags_bad = matchers::find(m, &bad_sketch).is_ok_and(|s| !s.is_empty());
        let flags_good = good_sketch
            .as_ref()
            .is_some_and(|g| matchers::find(m, g).is_ok_and(|s| !s.is_empty()));
        if flags_bad && flags_good {
            log::debug!(
                "{}: {} also flags the paired GOOD example, skipped",
                bad.id,
                m.kind()
            );
        }
        flags_bad && !flags_good
    });
    let Some(matcher) = matcher else {
        log::debug!("{}: no structural pattern", bad.id);
        return None;
    };

    let id = rule_id(bad.language, &matcher);
    log::debug!("{}: synthesized {}", bad.id, id);
    Some(Rule {
        message: format!("{} ({})", matcher.summary(), context(section)),
        severity: severity_for(bad, section),
        id,
        language: bad.language,
        matcher,
        source: RuleSource {
            document: document.path.clone(),
            example: bad.id.clone(),
        },
        good_example: good.map(|g| g.id.clone()),
        suggestion: good.map(|g| g.source.trim_end().to_string()),
    })
}

/// Candidate matchers for a BAD sketch, most specific first.
fn candidates(bad: &Sketch) -> Vec<Matcher> {
    let language = bad.language;
    let mut out = Vec::new();

    let catalog: Vec<String> = blocking_catalog(language)
        .iter()
        .map(|s| s.to_string())
        .collect();
    let calls: BTreeSet<String> = matchers::blocking_calls(bad, &catalog)
        .into_iter()
        .map(|(name, _)| {
            // Wildcard entries generalize; everything else is kept concrete.
            catalog
                .iter()
                .find(|e| e.starts_with('*') && name_matches(&name, e))
                .cloned()
                .unwrap_or(name)
        })
        .collect();
    if !calls.is_empty() {
        out.push(Matcher::BlockingCallInAsync {
            calls: calls.into_iter().collect(),
        });
    }

    let sinks_catalog: Vec<String> = sink_catalog(language)
        .iter()
        .map(|s| s.to_string())
        .collect();
    let sinks: BTreeSet<String> = matchers::interpolated_sinks(bad, &sinks_catalog)
        .into_iter()
        .map(|(entry, _)| entry)
        .collect();
    if !sinks.is_empty() {
        out.push(Matcher::InterpolatedSink {
            sinks: sinks.into_iter().collect(),
        });
    }

    out.extend(
        [
            Matcher::MutableFieldInFrozenModel,
            Matcher::MutableDefaultArgument,
            Matcher::AsyncEffectCallback,
            Matcher::AtomInRender,
        ]
        .into_iter()
        .filter(|m| m.supports(language)),
    );
    out
}

fn context(section: &Section) -> String {
    match section.lead_sentence() {
        Some(lead) if lead != section.heading => format!("{}: {}", section.heading, lead),
        _ => section.heading.clone(),
    }
}

fn vocabulary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:security|injection|vulnerab|unsafe|exploit|attack|critical|bug|incorrect|race|deadlock|corrupt|data loss|leak|crash)",
        )
        .expect("static regex")
    })
}

fn severity_for(bad: &CodeExample, section: &Section) -> Severity {
    let vocab = vocabulary();
    if vocab.is_match(&bad.marker) || vocab.is_match(&section.heading) || vocab.is_match(&section.body)
    {
        Severity::Error
    } else {
        Severity::Warn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;

    fn doc(text: &str) -> Document {
        extract("skills/doc.md", text).document
    }

    #[test]
    fn test_time_sleep_rule() {
        let d = doc("## Async Endpoints\n\nNever block the event loop.\n\n❌ BAD\n```python\nasync def h():\n    time.sleep(1)\n```\n\n✅ GOOD\n```python\nasync def h():\n    await asyncio.sleep(1)\n```\n");
        let rules = synthesize_document(&d);
        assert_eq!(rules.len(), 1);
        let r = &rules[0];
        assert_eq!(r.id, "python.blocking-call-in-async.time.sleep");
        assert_eq!(r.severity, Severity::Warn);
        assert_eq!(
            r.message,
            "blocking call inside async function: time.sleep (Async Endpoints: Never block the event loop.)"
        );
        assert_eq!(r.source.example, "skills/doc.md#1");
        assert_eq!(r.good_example.as_deref(), Some("skills/doc.md#2"));
        assert!(r.suggestion.as_deref().unwrap().contains("asyncio.sleep"));
    }

    #[test]
    fn test_rules_flag_their_bad_example_but_not_the_good_one() {
        let d = doc("## SQL Injection\n\n❌ BAD\n```python\ncursor.execute(f\"SELECT * FROM u WHERE id = {uid}\")\n```\n\n✅ GOOD\n```python\ncursor.execute(\"SELECT * FROM u WHERE id = %s\", (uid,))\n```\n\n## Defaults\n\n❌ BAD\n```python\ndef f(x=[]):\n    return x\n```\n\n✅ GOOD\n```python\ndef f(x=None):\n    return x or []\n```\n");
        let rules = synthesize_document(&d);
        assert_eq!(rules.len(), 2);
        for rule in &rules {
            let bad = d.examples().find(|e| e.id == rule.source.example).unwrap();
            let good = d
                .examples()
                .find(|e| Some(&e.id) == rule.good_example.as_ref())
                .unwrap();
            let flagged = matchers::find(&rule.matcher, &Sketch::new(&bad.source, bad.language));
            assert!(!flagged.unwrap().is_empty());
            let clean = matchers::find(&rule.matcher, &Sketch::new(&good.source, good.language));
            assert!(clean.unwrap().is_empty());
        }
        assert_eq!(rules[0].id, "python.interpolated-sink.execute");
        assert_eq!(rules[0].severity, Severity::Error);
        assert_eq!(rules[1].id, "python.mutable-default-argument");
    }

    #[test]
    fn test_no_rule_when_good_example_matches_too() {
        let d = doc("## Sleep\n\n❌ BAD\n```python\nasync def h():\n    time.sleep(1)\n```\n\n✅ GOOD\n```python\nasync def h():\n    time.sleep(0)\n```\n");
        assert!(synthesize_document(&d).is_empty());
    }

    #[test]
    fn test_style_only_exemplar_yields_nothing() {
        let d = doc("## Naming\n\n❌ BAD\n```python\ndef DoThing(): pass\n```\n\n✅ GOOD\n```python\ndef do_thing(): pass\n```\n");
        assert!(synthesize_document(&d).is_empty());
    }

    #[test]
    fn test_typescript_sync_calls_generalize() {
        let d = doc("## Files\n\n❌ BAD\n```ts\nasync function load() {\n  const s = fs.readFileSync(p);\n}\n```\n");
        let rules = synthesize_document(&d);
        assert_eq!(rules.len(), 1);
        assert_eq!(
            rules[0].matcher,
            Matcher::BlockingCallInAsync {
                calls: vec!["*Sync".into()]
            }
        );
        assert_eq!(rules[0].good_example, None);
    }
}
