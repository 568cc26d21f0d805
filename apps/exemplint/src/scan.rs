//! Parallel scanner: evaluates registry rules over a target file set.
//!
//! Each file is read, classified by extension, sketched once and matched
//! against `lookup(language)`. Files are independent; the only merge happens
//! after every task has finished, which keeps the report a pure function of
//! the registry and the file set.

use crate::error::{Error, Result};
use crate::matchers::{self, MatchError, Span};
use crate::models::rule::{Matcher, Rule};
use crate::models::{Diagnostic, Finding, Language, ScanReport};
use crate::registry::RuleRegistry;
use crate::sketch::Sketch;
use crate::utils::display_path;
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bytes inspected for a NUL when deciding whether a file is binary.
const BINARY_SNIFF_LEN: usize = 8 * 1024;

#[derive(Debug, Clone, Default)]
/// Cooperative cancellation: an explicit flag plus an optional deadline.
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Worker pool size; 0 uses rayon's default.
    pub jobs: usize,
    pub cancel: CancelToken,
    /// Extra `extension -> language` mappings taking precedence over the
    /// built-in table.
    pub extensions: BTreeMap<String, Language>,
    /// Findings and diagnostics show paths relative to this root.
    pub root: PathBuf,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            jobs: 0,
            cancel: CancelToken::new(),
            extensions: BTreeMap::new(),
            root: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Scanning,
    Aggregating,
    Done,
}

#[derive(Debug)]
/// One scan run. Moves through the phases in order and always ends in `Done`.
pub struct ScanSession {
    phase: Phase,
}

enum Outcome {
    Done(FileResult),
    NotStarted,
    Discarded,
}

/// A registry rule ready for evaluation. Custom patterns are compiled once
/// per scan.
struct PreparedRule<'r> {
    rule: &'r Rule,
    pattern: Option<std::result::Result<Regex, MatchError>>,
}

impl<'r> PreparedRule<'r> {
    fn new(rule: &'r Rule) -> Self {
        let pattern = match &rule.matcher {
            Matcher::Pattern { regex } => Some(matchers::compile_pattern(regex)),
            _ => None,
        };
        Self { rule, pattern }
    }

    fn find(&self, sketch: &Sketch) -> std::result::Result<Vec<Span>, MatchError> {
        match &self.pattern {
            Some(Ok(re)) => Ok(matchers::pattern_lines(sketch, re)),
            Some(Err(e)) => Err(e.clone()),
            None => matchers::find(&self.rule.matcher, sketch),
        }
    }
}

#[derive(Default)]
struct FileResult {
    findings: Vec<Finding>,
    diagnostics: Vec<Diagnostic>,
    scanned: bool,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanSession {
    pub fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn advance(&mut self, next: Phase) {
        log::debug!("scan phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    pub fn run(
        &mut self,
        registry: &RuleRegistry,
        files: &[PathBuf],
        options: &ScanOptions,
    ) -> Result<ScanReport> {
        self.advance(Phase::Loading);
        let tasks: Vec<(&PathBuf, Language)> = files
            .iter()
            .filter_map(|p| language_of(p, &options.extensions).map(|l| (p, l)))
            .collect();
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(options.jobs)
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                self.advance(Phase::Done);
                return Err(Error::from(e));
            }
        };

        let prepared: BTreeMap<Language, Vec<PreparedRule>> = registry
            .languages()
            .into_iter()
            .map(|l| (l, registry.lookup(l).into_iter().map(PreparedRule::new).collect()))
            .collect();

        self.advance(Phase::Scanning);
        let cancel = &options.cancel;
        let outcomes: Vec<Outcome> = pool.install(|| {
            tasks
                .par_iter()
                .map(|(path, language)| {
                    if cancel.is_cancelled() {
                        return Outcome::NotStarted;
                    }
                    let display = display_path(&options.root, path);
                    let rules = prepared.get(language).map(Vec::as_slice).unwrap_or(&[]);
                    let result = scan_file(path, &display, rules, *language);
                    if cancel.is_cancelled() {
                        Outcome::Discarded
                    } else {
                        Outcome::Done(result)
                    }
                })
                .collect()
        });

        self.advance(Phase::Aggregating);
        let total = outcomes.len();
        let mut report = ScanReport::default();
        let mut completed = 0usize;
        for outcome in outcomes {
            if let Outcome::Done(mut r) = outcome {
                completed += 1;
                if r.scanned {
                    report.files_scanned += 1;
                }
                report.findings.append(&mut r.findings);
                report.diagnostics.append(&mut r.diagnostics);
            }
        }
        if completed < total {
            log::warn!("scan cancelled after {} of {} files", completed, total);
            report.cancelled = true;
            report
                .diagnostics
                .push(Diagnostic::ScanCancelled { completed, total });
        }
        report.findings.sort_by(|a, b| {
            (&a.path, a.line_start, a.line_end, &a.rule_id).cmp(&(
                &b.path,
                b.line_start,
                b.line_end,
                &b.rule_id,
            ))
        });
        report.diagnostics.sort_by_key(|d| d.sort_key());
        self.advance(Phase::Done);
        Ok(report)
    }
}

/// Scan `files` with `registry`. See [`ScanSession::run`].
pub fn scan(registry: &RuleRegistry, files: &[PathBuf], options: &ScanOptions) -> Result<ScanReport> {
    ScanSession::new().run(registry, files, options)
}

/// Resolve a file's language, honoring configured extension mappings.
pub fn language_of(path: &Path, extensions: &BTreeMap<String, Language>) -> Option<Language> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    extensions
        .get(&ext)
        .copied()
        .or_else(|| Language::from_extension(&ext))
}

fn skipped(display: &str, reason: impl Into<String>) -> FileResult {
    let reason = reason.into();
    log::warn!("skipping {}: {}", display, reason);
    FileResult {
        diagnostics: vec![Diagnostic::FileSkipped {
            path: display.to_string(),
            reason,
        }],
        ..FileResult::default()
    }
}

fn scan_file(path: &Path, display: &str, rules: &[PreparedRule], language: Language) -> FileResult {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => return skipped(display, e.to_string()),
    };
    if bytes[..bytes.len().min(BINARY_SNIFF_LEN)].contains(&0) {
        return skipped(display, "binary file");
    }
    let text = match String::from_utf8(bytes) {
        Ok(t) => t,
        Err(_) => return skipped(display, "not valid UTF-8"),
    };

    let mut result = FileResult {
        scanned: true,
        ..FileResult::default()
    };
    if rules.is_empty() {
        return result;
    }
    let sketch = Sketch::new(&text, language);
    for prepared in rules {
        let rule = prepared.rule;
        match prepared.find(&sketch) {
            Ok(spans) => result.findings.extend(spans.into_iter().map(|s| Finding {
                rule_id: rule.id.clone(),
                path: display.to_string(),
                line_start: s.line_start,
                line_end: s.line_end,
                message: rule.message.clone(),
                severity: rule.severity,
            })),
            Err(e) => {
                log::warn!("rule {} failed on {}: {}", rule.id, display, e);
                result.diagnostics.push(Diagnostic::RuleFailure {
                    rule_id: rule.id.clone(),
                    path: display.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
    result
}

/// Walk `target` (honoring ignore files) and return the sorted list of files
/// with a known language. A file target is returned as is.
pub fn collect_files(target: &Path, extensions: &BTreeMap<String, Language>) -> Result<Vec<PathBuf>> {
    let meta = fs::metadata(target).map_err(|e| Error::io(target, e))?;
    if meta.is_file() {
        return Ok(vec![target.to_path_buf()]);
    }
    let mut out = Vec::new();
    for entry in ignore::WalkBuilder::new(target).require_git(false).build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("walk error under {}: {}", target.display(), e);
                continue;
            }
        };
        if entry.file_type().is_some_and(|ft| ft.is_file())
            && language_of(entry.path(), extensions).is_some()
        {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rule::{Matcher, RuleSource};
    use crate::models::Severity;
    use std::fs;
    use tempfile::tempdir;

    fn sleep_rule() -> Rule {
        Rule {
            id: "python.blocking-call-in-async.time.sleep".into(),
            language: Language::Python,
            severity: Severity::Warn,
            matcher: Matcher::BlockingCallInAsync {
                calls: vec!["time.sleep".into()],
            },
            message: "blocking call inside async function: time.sleep (Async)".into(),
            source: RuleSource {
                document: "SKILL.md".into(),
                example: "SKILL.md#1".into(),
            },
            good_example: None,
            suggestion: None,
        }
    }

    fn registry(rules: Vec<Rule>) -> RuleRegistry {
        RuleRegistry::from_rules(rules).registry
    }

    fn options(root: &Path) -> ScanOptions {
        ScanOptions {
            jobs: 2,
            root: root.to_path_buf(),
            ..ScanOptions::default()
        }
    }

    #[test]
    fn test_time_sleep_scenario() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("app.py"),
            "import time\n\nasync def handler():\n    time.sleep(5)\n",
        )
        .unwrap();
        let reg = registry(vec![sleep_rule()]);
        let files = collect_files(root, &BTreeMap::new()).unwrap();
        let report = scan(&reg, &files, &options(root)).unwrap();
        assert_eq!(report.files_scanned, 1);
        assert_eq!(report.findings.len(), 1);
        let f = &report.findings[0];
        assert_eq!(f.path, "app.py");
        assert_eq!((f.line_start, f.line_end), (4, 4));
        assert_eq!(f.rule_id, "python.blocking-call-in-async.time.sleep");
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_empty_file_set() {
        let reg = registry(vec![sleep_rule()]);
        let mut session = ScanSession::new();
        let report = session.run(&reg, &[], &ScanOptions::default()).unwrap();
        assert!(report.findings.is_empty());
        assert!(report.diagnostics.is_empty());
        assert!(!report.cancelled);
        assert_eq!(session.phase(), Phase::Done);
    }

    #[test]
    fn test_undecodable_and_binary_files_are_skipped() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("latin1.py"), [0x61u8, 0xe9, 0x0a]).unwrap();
        fs::write(root.join("blob.py"), [0x61u8, 0x00, 0x62]).unwrap();
        fs::write(
            root.join("ok.py"),
            "async def f():\n    time.sleep(1)\n",
        )
        .unwrap();
        let reg = registry(vec![sleep_rule()]);
        let files = collect_files(root, &BTreeMap::new()).unwrap();
        let report = scan(&reg, &files, &options(root)).unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].path, "ok.py");
        assert_eq!(
            report.diagnostics,
            vec![
                Diagnostic::FileSkipped {
                    path: "blob.py".into(),
                    reason: "binary file".into()
                },
                Diagnostic::FileSkipped {
                    path: "latin1.py".into(),
                    reason: "not valid UTF-8".into()
                },
            ]
        );
    }

    #[test]
    fn test_scan_is_idempotent_and_sorted() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        for name in ["b.py", "a.py", "c.py"] {
            fs::write(
                root.join(name),
                "async def f():\n    time.sleep(1)\n    x = 1\n    time.sleep(2)\n",
            )
            .unwrap();
        }
        let reg = registry(vec![sleep_rule()]);
        let files = collect_files(root, &BTreeMap::new()).unwrap();
        let first = scan(&reg, &files, &options(root)).unwrap();
        let second = scan(&reg, &files, &options(root)).unwrap();
        assert_eq!(first, second);
        let keys: Vec<_> = first
            .findings
            .iter()
            .map(|f| (f.path.as_str(), f.line_start))
            .collect();
        assert_eq!(
            keys,
            vec![("a.py", 2), ("a.py", 4), ("b.py", 2), ("b.py", 4), ("c.py", 2), ("c.py", 4)]
        );
    }

    #[test]
    fn test_invalid_pattern_is_rule_failure() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.py"), "print(1)\n").unwrap();
        let mut bad = sleep_rule();
        bad.id = "python.custom".into();
        bad.matcher = Matcher::Pattern {
            regex: "print(".into(),
        };
        let reg = registry(vec![bad, sleep_rule()]);
        let files = collect_files(root, &BTreeMap::new()).unwrap();
        let report = scan(&reg, &files, &options(root)).unwrap();
        assert!(report.findings.is_empty());
        assert_eq!(report.diagnostics.len(), 1);
        assert!(matches!(
            &report.diagnostics[0],
            Diagnostic::RuleFailure { rule_id, .. } if rule_id == "python.custom"
        ));
    }

    #[test]
    fn test_custom_pattern_applies_to_every_file() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.py"), "print(1)\n").unwrap();
        fs::write(root.join("b.py"), "x = 1\nprint(x)\n").unwrap();
        let mut good = sleep_rule();
        good.id = "python.print".into();
        good.matcher = Matcher::Pattern {
            regex: r"\bprint\(".into(),
        };
        let mut broken = sleep_rule();
        broken.id = "python.broken".into();
        broken.matcher = Matcher::Pattern {
            regex: "print(".into(),
        };
        let reg = registry(vec![good, broken]);
        let files = collect_files(root, &BTreeMap::new()).unwrap();
        let report = scan(&reg, &files, &options(root)).unwrap();
        let hits: Vec<_> = report
            .findings
            .iter()
            .map(|f| (f.path.as_str(), f.line_start))
            .collect();
        assert_eq!(hits, vec![("a.py", 1), ("b.py", 2)]);
        let failed: Vec<_> = report
            .diagnostics
            .iter()
            .filter_map(|d| match d {
                Diagnostic::RuleFailure { rule_id, path, .. } if rule_id == "python.broken" => {
                    Some(path.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec!["a.py", "b.py"]);
    }

    #[test]
    fn test_good_pattern_only_has_no_findings() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("app.py"),
            "import asyncio\n\nasync def handler():\n    await asyncio.sleep(5)\n",
        )
        .unwrap();
        let reg = registry(vec![sleep_rule()]);
        let files = collect_files(root, &BTreeMap::new()).unwrap();
        let report = scan(&reg, &files, &options(root)).unwrap();
        assert_eq!(report.files_scanned, 1);
        assert!(report.findings.is_empty());
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_executor_offload_is_not_flagged() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("app.py"),
            "async def handler():\n    def work():\n        time.sleep(1)\n    return await loop.run_in_executor(None, work)\n",
        )
        .unwrap();
        let reg = registry(vec![sleep_rule()]);
        let files = collect_files(root, &BTreeMap::new()).unwrap();
        let report = scan(&reg, &files, &options(root)).unwrap();
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_expired_deadline_cancels_scan() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.py"), "x = 1\n").unwrap();
        fs::write(root.join("b.py"), "x = 2\n").unwrap();
        assert!(!CancelToken::with_timeout(Duration::from_secs(3600)).is_cancelled());
        let opts = ScanOptions {
            cancel: CancelToken::with_timeout(Duration::ZERO),
            ..options(root)
        };
        assert!(opts.cancel.is_cancelled());
        let files = collect_files(root, &BTreeMap::new()).unwrap();
        let report = scan(&registry(vec![sleep_rule()]), &files, &opts).unwrap();
        assert!(report.cancelled);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::ScanCancelled {
                completed: 0,
                total: 2
            }]
        );
    }

    #[test]
    fn test_cancelled_scan_reports_progress() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.py"), "x = 1\n").unwrap();
        let opts = options(root);
        opts.cancel.cancel();
        let files = collect_files(root, &BTreeMap::new()).unwrap();
        let report = scan(&registry(vec![sleep_rule()]), &files, &opts).unwrap();
        assert!(report.cancelled);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::ScanCancelled {
                completed: 0,
                total: 1
            }]
        );
    }

    #[test]
    fn test_collect_files_respects_extensions_and_gitignore() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("build")).unwrap();
        fs::write(root.join(".gitignore"), "build/\n").unwrap();
        fs::write(root.join("build/gen.py"), "x = 1\n").unwrap();
        fs::write(root.join("main.py"), "x = 1\n").unwrap();
        fs::write(root.join("README.md"), "# hi\n").unwrap();
        fs::write(root.join("tool.pyw"), "x = 1\n").unwrap();
        let mut ext = BTreeMap::new();
        ext.insert("pyw".to_string(), Language::Python);
        let files = collect_files(root, &ext).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["main.py", "tool.pyw"]);
    }
}
