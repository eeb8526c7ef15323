use crate::variants::{is_eligible_base, strip_variants};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use indexmap::IndexSet;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub content: String,
    pub files_scanned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    pub message: String,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ScanError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanGlobOptions {
    pub base_path: PathBuf,
    pub include_node_modules: bool,
    pub ignore: Vec<String>,
}

impl Default for ScanGlobOptions {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            include_node_modules: false,
            ignore: Vec::new(),
        }
    }
}

/// Reads every file under `options.base_path` matching one of `patterns`
/// and concatenates their text, one trailing newline per file.
pub fn scan_globs(patterns: &[String], options: &ScanGlobOptions) -> Result<ScanResult, ScanError> {
    let paths = collect_paths(patterns, options)?;
    read_content(&paths)
}

pub fn collect_paths(
    patterns: &[String],
    options: &ScanGlobOptions,
) -> Result<Vec<PathBuf>, ScanError> {
    if patterns.is_empty() {
        return Err(ScanError {
            message: "scan_globs requires at least one pattern".to_string(),
        });
    }

    let globset = build_globset(patterns)?;
    let ignore_set = build_globset(&options.ignore)?;
    let mut paths = Vec::new();
    let mut seen = HashSet::new();

    let mut builder = WalkBuilder::new(&options.base_path);
    builder
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false);

    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::debug!("skipping unreadable entry: {}", err);
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let relative_path = path.strip_prefix(&options.base_path).unwrap_or(path);
        if !globset.is_match(relative_path) {
            continue;
        }
        if ignore_set.is_match(relative_path) {
            continue;
        }
        if !options.include_node_modules && is_in_node_modules(relative_path) {
            continue;
        }
        if seen.insert(path.to_path_buf()) {
            paths.push(path.to_path_buf());
        }
    }

    paths.sort();
    Ok(paths)
}

pub fn read_content(paths: &[PathBuf]) -> Result<ScanResult, ScanError> {
    let mut content = String::new();
    for path in paths {
        let text = fs::read_to_string(path).map_err(|err| ScanError {
            message: format!("failed to read {}: {}", path.display(), err),
        })?;
        content.push_str(&text);
        content.push('\n');
    }
    Ok(ScanResult {
        content,
        files_scanned: paths.len(),
    })
}

pub(crate) fn is_in_node_modules(path: &Path) -> bool {
    path.components()
        .any(|component| component.as_os_str() == "node_modules")
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet, ScanError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(normalize_pattern(pattern)).map_err(|err| ScanError {
            message: format!("invalid glob pattern {}: {}", pattern, err),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|err| ScanError {
        message: format!("failed to build glob set: {}", err),
    })
}

/// Globs are matched against paths relative to the scan root, so a leading
/// `./` would never match.
pub fn normalize_pattern(pattern: &str) -> &str {
    let mut pattern = pattern;
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest;
    }
    pattern
}

fn class_attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)(?:class|className)\s*=\s*["'`](.*?)["'`]"#)
            .expect("class attribute pattern is valid")
    })
}

/// Every whitespace-separated token inside a `class=` or `className=`
/// attribute literal, in order of appearance.
pub fn extract_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for captures in class_attribute_pattern().captures_iter(text) {
        let Some(value) = captures.get(1) else {
            continue;
        };
        tokens.extend(value.as_str().split_whitespace().map(str::to_string));
    }
    tokens
}

/// The distinct tokens of `text` whose base class is an `if-` or `is-`
/// class, in order of first appearance.
pub fn extract_classes(text: &str) -> IndexSet<String> {
    extract_tokens(text)
        .into_iter()
        .filter(|token| is_eligible_base(strip_variants(token)))
        .collect()
}
