//! Configuration discovery and effective settings resolution.
//!
//! exemplint reads `exemplint.toml|yaml|yml` from the repository root (or
//! closest ancestor) and merges it with CLI flags to produce an `Effective`
//! config. Defaults:
//! - `docs`: `**/SKILL.md`, `skills/**/*.md`, `agents/**/*.md`
//! - `target`: the repository root
//! - `output`: `human`
//! - `jobs`: available parallelism
//! - `min_severity`: `info`
//! - `cache`: true, under `.exemplint/cache`
//!
//! Overrides precedence: CLI > config file > defaults.

use crate::error::{Error, Result};
use crate::models::{Language, Severity};
use crate::output::{OutputMode, ReportPolicy};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILES: [&str; 3] = ["exemplint.toml", "exemplint.yaml", "exemplint.yml"];

pub const DEFAULT_DOCS: [&str; 3] = ["**/SKILL.md", "skills/**/*.md", "agents/**/*.md"];

const DEFAULT_CACHE_DIR: &str = ".exemplint/cache";

#[derive(Debug, Default, Deserialize, Clone)]
/// Root configuration loaded from `exemplint.toml|yaml`.
pub struct ExemplintConfig {
    pub docs: Option<Vec<String>>,
    pub target: Option<String>,
    pub output: Option<String>,
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub min_severity: Option<String>,
    pub cache: Option<bool>,
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub extensions: BTreeMap<String, String>, // ext -> language
    #[serde(default)]
    pub rules: BTreeMap<String, RuleSetting>, // [rules.<id>]
    #[serde(default)]
    pub custom: Vec<CustomRule>, // [[custom]]
}

#[derive(Debug, Default, Deserialize, Clone, PartialEq, Eq)]
/// Per-rule override under `[rules.<id>]`.
pub struct RuleSetting {
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub disabled: bool,
}

fn default_custom_severity() -> Severity {
    Severity::Warn
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
/// A configured line-pattern rule under `[[custom]]`.
pub struct CustomRule {
    pub id: String,
    pub language: String,
    pub pattern: String,
    pub message: Option<String>,
    #[serde(default = "default_custom_severity")]
    pub severity: Severity,
}

#[derive(Debug, Clone, Default)]
/// Values given on the command line; `None`/empty means "not given".
pub struct CliOverrides {
    pub repo_root: Option<String>,
    pub docs: Vec<String>,
    pub target: Option<String>,
    pub output: Option<String>,
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub min_severity: Option<String>,
    pub triage: bool,
    pub no_cache: bool,
}

#[derive(Debug, Clone)]
/// Fully-resolved configuration used by commands after applying precedence.
pub struct Effective {
    pub repo_root: PathBuf,
    /// The configuration file in use, if any.
    pub config_file: Option<PathBuf>,
    pub docs: Vec<String>,
    pub target: PathBuf,
    pub output: OutputMode,
    pub jobs: usize,
    pub timeout: Option<Duration>,
    pub policy: ReportPolicy,
    pub cache: bool,
    pub cache_dir: PathBuf,
    pub extensions: BTreeMap<String, Language>,
    pub rules: BTreeMap<String, RuleSetting>,
    pub custom: Vec<CustomRule>,
}

impl Effective {
    /// Config file name relative to the root, for rule provenance.
    pub fn config_origin(&self) -> String {
        self.config_file
            .as_deref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| CONFIG_FILES[0].to_string())
    }
}

/// Nearest ancestor of `start` holding a config file or a `.git` directory.
pub fn detect_repo_root(start: &Path) -> PathBuf {
    let mut cur = start;
    loop {
        if CONFIG_FILES.iter().any(|f| cur.join(f).exists()) || cur.join(".git").exists() {
            return cur.to_path_buf();
        }
        match cur.parent() {
            Some(p) if !p.as_os_str().is_empty() => cur = p,
            _ => return start.to_path_buf(),
        }
    }
}

/// Locate and parse the config file under `root`.
pub fn load_config(root: &Path) -> Result<Option<(PathBuf, ExemplintConfig)>> {
    for name in CONFIG_FILES {
        let path = root.join(name);
        if !path.exists() {
            continue;
        }
        let s = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let cfg: ExemplintConfig = if name.ends_with(".toml") {
            toml::from_str(&s).map_err(|e| Error::Config(format!("{}: {}", name, e)))?
        } else {
            serde_yaml::from_str(&s).map_err(|e| Error::Config(format!("{}: {}", name, e)))?
        };
        return Ok(Some((path, cfg)));
    }
    Ok(None)
}

fn parse_with<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T> {
    value.parse().map_err(Error::Config)
}

pub fn resolve_effective(cli: &CliOverrides) -> Result<Effective> {
    let start = PathBuf::from(cli.repo_root.as_deref().unwrap_or("."));
    let repo_root = detect_repo_root(&start);
    let (config_file, cfg) = match load_config(&repo_root)? {
        Some((path, cfg)) => (Some(path), cfg),
        None => (None, ExemplintConfig::default()),
    };

    let docs = if !cli.docs.is_empty() {
        cli.docs.clone()
    } else {
        cfg.docs
            .unwrap_or_else(|| DEFAULT_DOCS.iter().map(|s| s.to_string()).collect())
    };

    let target = match (cli.target.as_deref(), cfg.target.as_deref()) {
        (Some(t), _) => PathBuf::from(t),
        (None, Some(t)) => repo_root.join(t),
        (None, None) => repo_root.clone(),
    };

    let output = parse_with::<OutputMode>(
        cli.output
            .as_deref()
            .or(cfg.output.as_deref())
            .unwrap_or("human"),
    )?;

    let jobs = match cli.jobs.or(cfg.jobs) {
        Some(0) => return Err(Error::Config("jobs must be at least 1".to_string())),
        Some(n) => n,
        None => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    };

    let timeout = cli
        .timeout_secs
        .or(cfg.timeout_secs)
        .map(Duration::from_secs);

    let min_severity = parse_with::<Severity>(
        cli.min_severity
            .as_deref()
            .or(cfg.min_severity.as_deref())
            .unwrap_or("info"),
    )?;

    let cache = !cli.no_cache && cfg.cache.unwrap_or(true);
    let cache_dir = repo_root.join(cfg.cache_dir.as_deref().unwrap_or(DEFAULT_CACHE_DIR));

    let extensions = cfg
        .extensions
        .iter()
        .map(|(ext, lang)| {
            let lang = parse_with::<Language>(lang)?;
            Ok((ext.trim_start_matches('.').to_ascii_lowercase(), lang))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;

    Ok(Effective {
        repo_root,
        config_file,
        docs,
        target,
        output,
        jobs,
        timeout,
        policy: ReportPolicy::new(min_severity, cli.triage),
        cache,
        cache_dir,
        extensions,
        rules: cfg.rules,
        custom: cfg.custom,
    })
}
