//! Static security gate for user-supplied detector scripts
//!
//! Runs before any part of the script executes: the source is
//! syntax-parsed (a parse failure is itself a violation) and scanned for
//! forbidden module imports and forbidden function calls, matched both as
//! bare names and in `module::func` / `value.func` form. All violations
//! are collected so the load error lists every problem at once; a script
//! with any violation never runs and never registers anything.

use once_cell::sync::Lazy;
use regex::Regex;
use rhai::Engine;

/// Modules a detector script may not import
pub const FORBIDDEN_IMPORTS: &[&str] = &["os", "subprocess", "sys", "shutil"];

/// Functions a detector script may not call.
///
/// Environment access is deliberately not on this list: the engine
/// injects a `getenv(name)` host function, so scripts read environment
/// variables without needing any forbidden module.
pub const FORBIDDEN_CALLS: &[&str] = &["eval", "exec", "open", "compile", "input"];

static IMPORT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*import\s+"([^"]+)""#).expect("import pattern"));

static CALL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\b([A-Za-z_][A-Za-z0-9_]*)\s*(?:::|\.)\s*)?\b(eval|exec|open|compile|input)\s*\(")
        .expect("call pattern")
});

/// Scan script source for forbidden constructs, returning every issue
/// found. An empty list means the script is safe to load.
pub fn static_code_analysis(source: &str) -> Vec<String> {
    let mut issues = Vec::new();

    // syntax gate: compiling parses without executing anything
    let engine = Engine::new();
    if let Err(error) = engine.compile(source) {
        issues.push(format!("- Failed to parse custom detectors module: {error}"));
    }

    for (index, raw_line) in source.lines().enumerate() {
        let line_no = index + 1;
        // ignore line-comment tails; string literals are scanned as-is,
        // matching the source-level nature of this gate
        let line = raw_line.split("//").next().unwrap_or(raw_line);

        if let Some(captures) = IMPORT_PATTERN.captures(line) {
            let module = &captures[1];
            let root = module.split(['/', ':']).next().unwrap_or(module);
            if FORBIDDEN_IMPORTS.contains(&root) {
                issues.push(format!("- Forbidden import: {module} (line {line_no})"));
            }
        }

        for captures in CALL_PATTERN.captures_iter(line) {
            let name = match captures.get(1) {
                Some(qualifier) => format!("{}.{}", qualifier.as_str(), &captures[2]),
                None => captures[2].to_string(),
            };
            issues.push(format!("- Forbidden function call: {name} (line {line_no})"));
        }
    }

    issues
}
