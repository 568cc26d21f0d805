//! Small helpers shared by the binary and the library: colored stderr
//! prefixes and path display.

use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::path::Path;

/// Whether stderr should be colored.
fn stderr_colors() -> bool {
    std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal()
}

fn prefix(label: &str, paint: fn(&str) -> String) -> String {
    if stderr_colors() {
        paint(label)
    } else {
        label.to_string()
    }
}

pub fn error_prefix() -> String {
    prefix("error:", |s| s.red().bold().to_string())
}

pub fn note_prefix() -> String {
    prefix("note:", |s| s.cyan().bold().to_string())
}

pub fn info_prefix() -> String {
    prefix("info:", |s| s.blue().bold().to_string())
}

/// `path` relative to `root` when it lies beneath it, with `/` separators.
pub fn display_path(root: &Path, path: &Path) -> String {
    let rel = match pathdiff::diff_paths(path, root) {
        Some(r) if !r.as_os_str().is_empty() && !r.starts_with("..") => r,
        _ => path.to_path_buf(),
    };
    let s = rel.to_string_lossy().replace('\\', "/");
    s.strip_prefix("./").map(str::to_string).unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_path() {
        assert_eq!(
            display_path(Path::new("/repo"), Path::new("/repo/src/a.py")),
            "src/a.py"
        );
        assert_eq!(display_path(Path::new("."), Path::new("./src/a.py")), "src/a.py");
        assert_eq!(
            display_path(Path::new("/repo"), Path::new("/other/a.py")),
            "/other/a.py"
        );
    }
}
