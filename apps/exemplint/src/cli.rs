//! CLI argument parsing via `clap`.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "exemplint",
    version,
    about = "Lint code against the GOOD/BAD exemplars of your standards documents",
    long_about = "exemplint extracts ✅ GOOD / ❌ BAD code examples from Markdown standards documents, synthesizes lint rules from the BAD ones and scans a source tree with them.\n\nConfiguration precedence: CLI > exemplint.toml > defaults.",
    after_help = "Examples:\n  exemplint check\n  exemplint check --docs 'skills/**/*.md' --target src --output github\n  exemplint rules --language python\n  exemplint extract skills/fastapi/SKILL.md",
    arg_required_else_help = true
)]
/// Top-level CLI options and subcommands.
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
/// Supported subcommands.
pub enum Commands {
    /// Show version
    #[command(
        about = "Show version",
        long_about = "Print the current exemplint version."
    )]
    Version,
    /// Scan a source tree
    #[command(
        about = "Run rule checks",
        long_about = "Build the rule registry from the standards documents and scan the target. Exits 1 when an error finding is reported, 2 on tool failure.",
        after_help = "Examples:\n  exemplint check --target src\n  exemplint check --triage --output json"
    )]
    Check {
        #[arg(long, help = "Repository root (default: current dir)")]
        repo_root: Option<String>,
        #[arg(long, help = "Glob for standards documents, relative to the root (repeatable)")]
        docs: Vec<String>,
        #[arg(long, help = "Directory or file to scan (default: repository root)")]
        target: Option<String>,
        #[arg(long, help = "Output mode: human|json|github (default: human)")]
        output: Option<String>,
        #[arg(long, help = "Worker threads (default: available parallelism)")]
        jobs: Option<usize>,
        #[arg(long, help = "Cancel the scan after this many seconds")]
        timeout: Option<u64>,
        #[arg(long, help = "Lowest reported severity: info|warn|error (default: info)")]
        min_severity: Option<String>,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Review triage: report warn and above only")]
        triage: bool,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Do not read or write the registry cache")]
        no_cache: bool,
    },
    /// List synthesized rules
    #[command(
        about = "List rules",
        long_about = "Build the registry and list its rules in document order, optionally for one language."
    )]
    Rules {
        #[arg(long, help = "Repository root (default: current dir)")]
        repo_root: Option<String>,
        #[arg(long, help = "Glob for standards documents, relative to the root (repeatable)")]
        docs: Vec<String>,
        #[arg(long, help = "Only rules for this language: clojure|python|typescript")]
        language: Option<String>,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
    },
    /// Show the exemplars of one document
    #[command(
        about = "Extract exemplars",
        long_about = "Print the GOOD/BAD code examples found in one Markdown document, with extraction warnings."
    )]
    Extract {
        /// Markdown document to read
        file: String,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
    },
    /// Registry cache management
    Cache {
        #[command(subcommand)]
        cmd: CacheCmd,
    },
}

#[derive(Subcommand)]
/// Subcommands for `exemplint cache`
pub enum CacheCmd {
    /// Remove cached registries
    #[command(
        about = "Prune registry cache",
        long_about = "Delete every cached registry artifact under the configured cache directory."
    )]
    Prune {
        #[arg(long, help = "Repository root (default: current dir)")]
        repo_root: Option<String>,
    },
}
