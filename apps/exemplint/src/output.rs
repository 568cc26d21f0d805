//! Report rendering for the `check`, `rules` and `extract` commands.
//!
//! Supports `human` (default), `json` and `github` outputs. Rendering is pure:
//! callers receive the stdout and stderr text and decide where it goes.

use crate::models::document::Document;
use crate::models::rule::Rule;
use crate::models::{Diagnostic, Finding, ScanReport, Severity};
use owo_colors::OwoColorize;
use serde_json::json;
use serde_json::Value as JsonVal;
use std::fmt;
use std::io::IsTerminal;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Human,
    Json,
    Github,
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(OutputMode::Human),
            "json" => Ok(OutputMode::Json),
            "github" => Ok(OutputMode::Github),
            other => Err(format!(
                "unknown output mode '{}' (expected human|json|github)",
                other
            )),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputMode::Human => "human",
            OutputMode::Json => "json",
            OutputMode::Github => "github",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which findings are reported. Everything below `min_severity` is dropped.
pub struct ReportPolicy {
    pub min_severity: Severity,
}

impl ReportPolicy {
    /// Review triage stance: only problems worth a reviewer's attention.
    pub const TRIAGE: ReportPolicy = ReportPolicy {
        min_severity: Severity::Warn,
    };

    pub const ALL: ReportPolicy = ReportPolicy {
        min_severity: Severity::Info,
    };

    pub fn new(min_severity: Severity, triage: bool) -> Self {
        if triage {
            ReportPolicy {
                min_severity: min_severity.max(Self::TRIAGE.min_severity),
            }
        } else {
            ReportPolicy { min_severity }
        }
    }

    pub fn reports(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }

    /// Drop findings this policy does not report. Diagnostics are kept.
    pub fn apply(&self, mut report: ScanReport) -> ScanReport {
        report.findings.retain(|f| self.reports(f.severity));
        report
    }
}

impl Default for ReportPolicy {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedReport {
    pub stdout: String,
    pub stderr: String,
}

/// Whether human output on stdout should be colored.
pub fn use_colors(mode: OutputMode) -> bool {
    mode == OutputMode::Human
        && std::env::var_os("NO_COLOR").is_none()
        && std::io::stdout().is_terminal()
}

/// Exit status for a (filtered) report: 1 when an error finding remains.
pub fn exit_code(report: &ScanReport) -> i32 {
    if report.findings.iter().any(|f| f.severity == Severity::Error) {
        1
    } else {
        0
    }
}

/// Render a scan report without color.
pub fn format(report: &ScanReport, mode: OutputMode) -> RenderedReport {
    render(report, mode, false)
}

/// Render a scan report, coloring human output when `color` is set.
pub fn render(report: &ScanReport, mode: OutputMode, color: bool) -> RenderedReport {
    match mode {
        OutputMode::Json => RenderedReport {
            stdout: pretty(&compose_report_json(report)),
            stderr: String::new(),
        },
        OutputMode::Github => RenderedReport {
            stdout: report.findings.iter().map(github_line).collect(),
            stderr: human_stderr(report),
        },
        OutputMode::Human => {
            let mut stdout = String::new();
            for f in &report.findings {
                stdout.push_str(&human_line(f, color));
                stdout.push('\n');
            }
            RenderedReport {
                stdout,
                stderr: human_stderr(report),
            }
        }
    }
}

fn pretty(v: &JsonVal) -> String {
    // Serializing a `Value` cannot fail.
    let mut s = serde_json::to_string_pretty(v).unwrap_or_default();
    s.push('\n');
    s
}

fn human_line(f: &Finding, color: bool) -> String {
    let sev = format!("[{}]", f.severity);
    let (path, sev) = if color {
        let sev = match f.severity {
            Severity::Error => sev.red().bold().to_string(),
            Severity::Warn => sev.yellow().bold().to_string(),
            Severity::Info => sev.blue().bold().to_string(),
        };
        (f.path.bold().to_string(), sev)
    } else {
        (f.path.clone(), sev)
    };
    format!(
        "{}:{}-{}: {} {}: {}",
        path, f.line_start, f.line_end, sev, f.rule_id, f.message
    )
}

fn human_stderr(report: &ScanReport) -> String {
    let mut out = String::new();
    for d in &report.diagnostics {
        out.push_str(&format!("warning: {}\n", d));
    }
    let s = report.summary();
    out.push_str(&format!(
        "summary: errors={} warnings={} infos={} files={} diagnostics={}\n",
        s.errors, s.warnings, s.infos, s.files, s.diagnostics
    ));
    out
}

fn github_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warn => "warning",
        Severity::Info => "notice",
    }
}

fn escape_data(s: &str) -> String {
    s.replace('%', "%25").replace('\r', "%0D").replace('\n', "%0A")
}

fn escape_property(s: &str) -> String {
    escape_data(s).replace(':', "%3A").replace(',', "%2C")
}

fn github_line(f: &Finding) -> String {
    format!(
        "::{} file={},line={},endLine={},title={}::{}\n",
        github_level(f.severity),
        escape_property(&f.path),
        f.line_start,
        f.line_end,
        escape_property(&f.rule_id),
        escape_data(&f.message)
    )
}

/// Compose the JSON report object (pure) for testing/snapshot purposes.
pub fn compose_report_json(report: &ScanReport) -> JsonVal {
    json!({
        "findings": report.findings,
        "diagnostics": report.diagnostics,
        "summary": report.summary(),
    })
}

/// Render the rule listing of the `rules` command.
pub fn format_rules(rules: &[&Rule], diagnostics: &[Diagnostic], mode: OutputMode) -> RenderedReport {
    match mode {
        OutputMode::Json => RenderedReport {
            stdout: pretty(&json!({ "rules": rules, "diagnostics": diagnostics })),
            stderr: String::new(),
        },
        _ => {
            let mut stdout = String::new();
            for r in rules {
                stdout.push_str(&format!(
                    "{} [{}] {}\n    from {}\n",
                    r.id, r.severity, r.message, r.source.example
                ));
            }
            let mut stderr: String = diagnostics
                .iter()
                .map(|d| format!("warning: {}\n", d))
                .collect();
            stderr.push_str(&format!("{} rules\n", rules.len()));
            RenderedReport { stdout, stderr }
        }
    }
}

/// Render the exemplars of one document for the `extract` command.
pub fn format_document(doc: &Document, warnings: &[Diagnostic], mode: OutputMode) -> RenderedReport {
    match mode {
        OutputMode::Json => RenderedReport {
            stdout: pretty(&json!({
                "path": doc.path,
                "title": doc.title,
                "examples": doc.examples().collect::<Vec<_>>(),
                "diagnostics": warnings,
            })),
            stderr: String::new(),
        },
        _ => {
            let mut stdout = format!("{}\n", doc.title);
            for ex in doc.examples() {
                let heading = doc
                    .section_of(ex)
                    .map(|s| s.heading.as_str())
                    .unwrap_or_default();
                stdout.push_str(&format!(
                    "{} {:?} {} line {} ({})\n",
                    ex.id, ex.polarity, ex.language, ex.line, heading
                ));
            }
            let stderr = warnings.iter().map(|d| format!("warning: {}\n", d)).collect();
            RenderedReport { stdout, stderr }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(path: &str, line: usize, severity: Severity) -> Finding {
        Finding {
            rule_id: "python.blocking-call-in-async.time.sleep".into(),
            path: path.into(),
            line_start: line,
            line_end: line,
            message: "blocking call inside async function: time.sleep (Async)".into(),
            severity,
        }
    }

    fn report() -> ScanReport {
        ScanReport {
            findings: vec![
                finding("app.py", 4, Severity::Warn),
                finding("app.py", 9, Severity::Error),
                finding("lib.py", 2, Severity::Info),
            ],
            diagnostics: vec![Diagnostic::FileSkipped {
                path: "blob.py".into(),
                reason: "binary file".into(),
            }],
            files_scanned: 2,
            cancelled: false,
        }
    }

    #[test]
    fn test_human_lines_and_summary() {
        let out = format(&report(), OutputMode::Human);
        let lines: Vec<_> = out.stdout.lines().collect();
        assert_eq!(
            lines[0],
            "app.py:4-4: [warn] python.blocking-call-in-async.time.sleep: blocking call inside async function: time.sleep (Async)"
        );
        assert_eq!(lines.len(), 3);
        assert!(out.stderr.contains("warning: file skipped: blob.py: binary file"));
        assert!(out
            .stderr
            .contains("summary: errors=1 warnings=1 infos=1 files=2 diagnostics=1"));
    }

    #[test]
    fn test_compose_report_json_shape() {
        let out = compose_report_json(&report());
        assert_eq!(out["summary"]["errors"], 1);
        assert_eq!(out["findings"][0]["line_start"], 4);
        assert_eq!(out["findings"][1]["severity"], "error");
        assert_eq!(out["diagnostics"][0]["kind"], "file_skipped");
    }

    #[test]
    fn test_github_annotations() {
        let out = format(&report(), OutputMode::Github);
        let first = out.stdout.lines().next().unwrap();
        assert_eq!(
            first,
            "::warning file=app.py,line=4,endLine=4,title=python.blocking-call-in-async.time.sleep::blocking call inside async function: time.sleep (Async)"
        );
        assert!(out.stdout.contains("::error file=app.py,line=9"));
        assert!(out.stdout.contains("::notice file=lib.py"));
    }

    #[test]
    fn test_policy_and_exit_code() {
        assert!(ReportPolicy::ALL.reports(Severity::Info));
        assert!(!ReportPolicy::TRIAGE.reports(Severity::Info));
        assert!(ReportPolicy::TRIAGE.reports(Severity::Warn));
        assert_eq!(
            ReportPolicy::new(Severity::Error, true).min_severity,
            Severity::Error
        );

        let r = ReportPolicy::TRIAGE.apply(report());
        assert_eq!(r.findings.len(), 2);
        assert_eq!(exit_code(&r), 1);
        let r = ReportPolicy::new(Severity::Info, false).apply(ScanReport::default());
        assert_eq!(exit_code(&r), 0);
    }

    #[test]
    fn test_output_mode_parse() {
        assert_eq!("JSON".parse::<OutputMode>(), Ok(OutputMode::Json));
        assert!("xml".parse::<OutputMode>().is_err());
    }
}
