//! On-disk registry cache keyed by the documents' content hash.

use crate::error::{Error, Result};
use crate::models::rule::Rule;
use crate::models::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const PREFIX: &str = "registry-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Serialized registry build: rules in order plus the build diagnostics.
pub struct CachedRegistry {
    pub version: String,
    pub hash: String,
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

pub fn artifact_path(dir: &Path, hash: &str) -> PathBuf {
    dir.join(format!("{}{}.json", PREFIX, hash))
}

fn is_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(PREFIX) && n.ends_with(".json"))
}

/// Load the artifact for `hash`. Missing, corrupt or mismatched artifacts
/// are a miss.
pub fn load(dir: &Path, hash: &str) -> Option<CachedRegistry> {
    let path = artifact_path(dir, hash);
    let text = match fs::read_to_string(&path) {
        Ok(t) => t,
        Err(_) => {
            log::debug!("registry cache miss: {}", path.display());
            return None;
        }
    };
    match serde_json::from_str::<CachedRegistry>(&text) {
        Ok(c) if c.hash == hash && c.version == env!("CARGO_PKG_VERSION") => {
            log::debug!("registry cache hit: {}", path.display());
            Some(c)
        }
        Ok(_) => {
            log::debug!("registry cache stale: {}", path.display());
            None
        }
        Err(e) => {
            log::warn!("ignoring corrupt registry cache {}: {}", path.display(), e);
            None
        }
    }
}

/// Write the artifact for `entry.hash` and remove artifacts for other hashes.
pub fn store(dir: &Path, entry: &CachedRegistry) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let path = artifact_path(dir, &entry.hash);
    let body = serde_json::to_string_pretty(entry).map_err(|e| Error::Cache(e.to_string()))?;
    fs::write(&path, body).map_err(|e| Error::io(&path, e))?;
    prune_except(dir, Some(&path))?;
    Ok(path)
}

/// Remove every registry artifact in `dir`. Returns the number removed.
pub fn prune(dir: &Path) -> Result<usize> {
    prune_except(dir, None)
}

fn prune_except(dir: &Path, keep: Option<&Path>) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::io(dir, e)),
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !is_artifact(&path) || Some(path.as_path()) == keep {
            continue;
        }
        fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
        log::debug!("removed stale registry cache {}", path.display());
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{build_from_sources, content_hash, SourceDocument};
    use tempfile::tempdir;

    fn sources() -> Vec<SourceDocument> {
        vec![SourceDocument {
            path: "skills/SKILL.md".into(),
            text: "## Async\n\n❌ BAD\n```python\nasync def h():\n    time.sleep(1)\n```\n\n## Defaults\n\n❌ BAD\n```python\ndef f(x=[]):\n    pass\n```\n".into(),
        }]
    }

    fn entry() -> CachedRegistry {
        let src = sources();
        let outcome = build_from_sources(&src);
        CachedRegistry {
            version: env!("CARGO_PKG_VERSION").into(),
            hash: content_hash(&src),
            rules: outcome.registry.into_rules(),
            diagnostics: outcome.diagnostics,
        }
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = tempdir().unwrap();
        let e = entry();
        assert_eq!(e.rules.len(), 2);
        store(dir.path(), &e).unwrap();
        let loaded = load(dir.path(), &e.hash).unwrap();
        assert_eq!(loaded, e);
    }

    #[test]
    fn test_store_removes_stale_and_corrupt_is_miss() {
        let dir = tempdir().unwrap();
        let mut old = entry();
        old.hash = "0".repeat(40);
        store(dir.path(), &old).unwrap();
        let e = entry();
        store(dir.path(), &e).unwrap();
        assert!(!artifact_path(dir.path(), &old.hash).exists());
        assert!(artifact_path(dir.path(), &e.hash).exists());

        fs::write(artifact_path(dir.path(), &e.hash), "{not json").unwrap();
        assert!(load(dir.path(), &e.hash).is_none());
    }

    #[test]
    fn test_prune() {
        let dir = tempdir().unwrap();
        store(dir.path(), &entry()).unwrap();
        fs::write(dir.path().join("keep.txt"), "x").unwrap();
        assert_eq!(prune(dir.path()).unwrap(), 1);
        assert!(dir.path().join("keep.txt").exists());
        assert_eq!(prune(&dir.path().join("missing")).unwrap(), 0);
    }
}
