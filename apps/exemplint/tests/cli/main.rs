//! CLI integration tests for exemplint.
//!
//! These tests execute the compiled binary and verify CLI behavior including:
//! - Subcommand behavior (check, rules, extract, cache)
//! - Exit codes
//! - Output modes

mod check;
mod common;
mod extract;
mod rules;

use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub const FASTAPI_SKILL: &str = r#"---
name: fastapi-expert
---

# FastAPI Expert

## Async Endpoints

Never block the event loop inside async handlers.

❌ BAD:
```python
@app.get("/items")
async def list_items():
    time.sleep(1)
    return []
```

✅ GOOD:
```python
@app.get("/items")
async def list_items():
    await asyncio.sleep(1)
    return []
```

## SQL Injection

❌ BAD:
```python
cursor.execute(f"SELECT * FROM users WHERE id = {user_id}")
```

✅ GOOD:
```python
cursor.execute("SELECT * FROM users WHERE id = %s", (user_id,))
```
"#;

/// A throwaway repository with one standards document and a `.git` marker.
pub fn repo_with_skill() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join(".git")).unwrap();
    fs::create_dir_all(root.join("skills/fastapi")).unwrap();
    fs::write(root.join("skills/fastapi/SKILL.md"), FASTAPI_SKILL).unwrap();
    dir
}

pub fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}
