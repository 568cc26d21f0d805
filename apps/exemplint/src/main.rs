//! exemplint CLI binary entry point.
//! Delegates to the library for registry building and scanning and prints
//! results.

use clap::Parser;
use exemplint::cache::{self, CachedRegistry};
use exemplint::cli::{CacheCmd, Cli, Commands};
use exemplint::config::{self, CliOverrides, Effective};
use exemplint::models::Language;
use exemplint::output::{self, OutputMode, RenderedReport};
use exemplint::registry::{self, BuildOutcome, RuleRegistry};
use exemplint::scan::{self, CancelToken, ScanOptions};
use exemplint::utils::{error_prefix, info_prefix, note_prefix};
use exemplint::{extract, Error, Result};

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", error_prefix(), e);
            2
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.cmd {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Commands::Check {
            repo_root,
            docs,
            target,
            output,
            jobs,
            timeout,
            min_severity,
            triage,
            no_cache,
        } => run_check(CliOverrides {
            repo_root,
            docs,
            target,
            output,
            jobs,
            timeout_secs: timeout,
            min_severity,
            triage,
            no_cache,
        }),
        Commands::Rules {
            repo_root,
            docs,
            language,
            output,
        } => {
            let eff = config::resolve_effective(&CliOverrides {
                repo_root,
                docs,
                output,
                ..CliOverrides::default()
            })?;
            let outcome = load_registry(&eff)?;
            let registry = outcome
                .registry
                .with_overrides(&eff.rules, &eff.custom, &eff.config_origin())?;
            let rules = match language {
                Some(l) => registry.lookup(l.parse::<Language>().map_err(Error::Config)?),
                None => registry.rules().iter().collect(),
            };
            emit(output::format_rules(&rules, &outcome.diagnostics, eff.output));
            Ok(0)
        }
        Commands::Extract { file, output } => {
            let mode = match output {
                Some(o) => o.parse::<OutputMode>().map_err(Error::Config)?,
                None => OutputMode::Human,
            };
            let ex = extract::load_document(std::path::Path::new(&file), &file)?;
            emit(output::format_document(&ex.document, &ex.warnings, mode));
            Ok(0)
        }
        Commands::Cache { cmd } => match cmd {
            CacheCmd::Prune { repo_root } => {
                let eff = config::resolve_effective(&CliOverrides {
                    repo_root,
                    ..CliOverrides::default()
                })?;
                let removed = cache::prune(&eff.cache_dir)?;
                eprintln!(
                    "{} removed {} cached registr{}",
                    info_prefix(),
                    removed,
                    if removed == 1 { "y" } else { "ies" }
                );
                Ok(0)
            }
        },
    }
}

fn run_check(cli: CliOverrides) -> Result<i32> {
    let eff = config::resolve_effective(&cli)?;
    if eff.config_file.is_none() && eff.output == OutputMode::Human {
        eprintln!("{} No exemplint.toml found; using defaults.", note_prefix());
    }
    let outcome = load_registry(&eff)?;
    let registry = outcome
        .registry
        .with_overrides(&eff.rules, &eff.custom, &eff.config_origin())?;
    if registry.is_empty() && eff.output == OutputMode::Human {
        eprintln!(
            "{} No rules could be derived from the standards documents.",
            info_prefix()
        );
    }

    let files = scan::collect_files(&eff.target, &eff.extensions)?;
    let options = ScanOptions {
        jobs: eff.jobs,
        cancel: eff
            .timeout
            .map(CancelToken::with_timeout)
            .unwrap_or_default(),
        extensions: eff.extensions.clone(),
        root: eff.repo_root.clone(),
    };
    let mut report = scan::scan(&registry, &files, &options)?;
    let mut diagnostics = outcome.diagnostics;
    diagnostics.append(&mut report.diagnostics);
    report.diagnostics = diagnostics;

    let report = eff.policy.apply(report);
    emit(output::render(
        &report,
        eff.output,
        output::use_colors(eff.output),
    ));
    Ok(output::exit_code(&report))
}

/// Build the registry from the configured documents, going through the
/// cache when enabled.
fn load_registry(eff: &Effective) -> Result<BuildOutcome> {
    let files = registry::discover_documents(&eff.repo_root, &eff.docs)?;
    if files.is_empty() {
        return Err(Error::RegistryBuildFailed(format!(
            "no standards documents match {}",
            eff.docs.join(", ")
        )));
    }
    let loaded = registry::read_documents(&eff.repo_root, &files)?;
    let hash = registry::content_hash(&loaded.sources);
    let cached = if eff.cache {
        cache::load(&eff.cache_dir, &hash)
    } else {
        None
    };
    let mut outcome = match cached {
        Some(cached) => {
            let mut hit = RuleRegistry::from_rules(cached.rules);
            hit.diagnostics = cached.diagnostics;
            hit
        }
        None => {
            let built = registry::build_from_sources(&loaded.sources);
            if eff.cache {
                let entry = CachedRegistry {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    hash,
                    rules: built.registry.rules().to_vec(),
                    diagnostics: built.diagnostics.clone(),
                };
                if let Err(e) = cache::store(&eff.cache_dir, &entry) {
                    log::warn!("cannot write registry cache: {}", e);
                }
            }
            built
        }
    };
    // Read failures are not part of the cached artifact.
    let mut diagnostics = loaded.diagnostics;
    diagnostics.append(&mut outcome.diagnostics);
    outcome.diagnostics = diagnostics;
    Ok(outcome)
}

fn emit(rendered: RenderedReport) {
    print!("{}", rendered.stdout);
    eprint!("{}", rendered.stderr);
}
