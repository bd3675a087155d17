//! Import allowlist checks for generated fragments.
//!
//! This is a coarse line-based scan of `import` statements, not an isolation
//! mechanism. Dynamic imports (`__import__`, `importlib`) are not detected.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(.+)$").expect("import regex"));
static FROM_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*from\s+([A-Za-z_][\w.]*)\s+import\b").expect("from import regex")
});

/// Top-level module names imported by `code`, sorted and deduplicated.
pub fn imported_modules(code: &str) -> BTreeSet<String> {
    let mut modules = BTreeSet::new();
    for line in code.lines() {
        let line = line.split('#').next().unwrap_or_default();
        for statement in line.split(';') {
            if let Some(caps) = FROM_IMPORT_RE.captures(statement) {
                modules.insert(top_level(&caps[1]));
            } else if let Some(caps) = IMPORT_RE.captures(statement) {
                for item in caps[1].split(',') {
                    let module = item.split_whitespace().next().unwrap_or_default();
                    if !module.is_empty() {
                        modules.insert(top_level(module));
                    }
                }
            }
        }
    }
    modules
}

/// Modules imported by `code` that are not in `allowlist`.
pub fn disallowed_imports(code: &str, allowlist: &[String]) -> Vec<String> {
    imported_modules(code)
        .into_iter()
        .filter(|module| !allowlist.iter().any(|allowed| allowed == module))
        .collect()
}

fn top_level(module: &str) -> String {
    module.split('.').next().unwrap_or(module).to_string()
}
