pub mod aggregate;
pub mod config;
pub mod generator;
pub mod metadata;
pub mod runtime;
pub mod scanner;
pub mod subset;
pub mod variants;

use crate::aggregate::{Aggregator, preamble};
use crate::config::{CONFIG_FILE, Config, FONT_FILE, InitOutcome};
use crate::metadata::MetadataStore;
use crate::scanner::{
    ScanGlobOptions, build_globset, extract_classes, is_in_node_modules, normalize_pattern,
    scan_globs,
};
use crate::subset::{FontOutput, FontSubsetter, FontcullSubsetter, subset_icon_font};
use clap::{Parser, Subcommand};
use globset::GlobSet;
use indexmap::IndexSet;
use notify::Watcher;
use std::collections::HashSet;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::time::{Duration, Instant};

const WATCH_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(name = "iconforge", version, about = "Generate the icon and utility CSS a project uses")]
pub struct Cli {
    /// Configuration file.
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Write a default iconforge.toml.
    Init,
    /// Generate iconforge.css and iconforge.woff2 once.
    Build {
        /// Scan this glob instead of the configured content globs.
        glob: Option<String>,
    },
    /// Build, then rebuild whenever scanned files change.
    Watch {
        /// Scan this glob instead of the configured content globs.
        glob: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliError {
    pub message: String,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

pub fn run_from_env() -> Result<(), CliError> {
    run(Cli::parse())
}

pub fn run(cli: Cli) -> Result<(), CliError> {
    let root = env::current_dir().map_err(|err| CliError {
        message: format!("failed to resolve current directory: {}", err),
    })?;
    let config_path = root.join(&cli.config);

    match cli.command.unwrap_or(Command::Build { glob: None }) {
        Command::Init => run_init(&config_path),
        Command::Build { glob } => {
            let config = load_config(&config_path)?;
            let content = content_globs(&config, glob.as_deref());
            build_project(&root, &config, &content).map(|_| ())
        }
        Command::Watch { glob } => run_watch(&root, &config_path, glob.as_deref()),
    }
}

fn run_init(config_path: &Path) -> Result<(), CliError> {
    let outcome = crate::config::write_default(config_path).map_err(|err| CliError {
        message: err.message,
    })?;
    match outcome {
        InitOutcome::Created => log::info!("created {}", config_path.display()),
        InitOutcome::AlreadyExists => {
            log::info!("{} already exists, leaving it untouched", config_path.display())
        }
    }
    Ok(())
}

fn load_config(config_path: &Path) -> Result<Config, CliError> {
    crate::config::load_or_default(config_path).map_err(|err| CliError {
        message: err.message,
    })
}

/// An explicit glob replaces the configured content list.
pub fn content_globs(config: &Config, glob: Option<&str>) -> Vec<String> {
    match glob {
        Some(glob) => vec![glob.to_string()],
        None => config.content_globs(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub files_scanned: usize,
    pub tokens: usize,
    pub rules: usize,
    pub css_path: PathBuf,
    pub font_path: Option<PathBuf>,
    pub font: Option<FontOutput>,
}

/// Runs the whole pipeline for the project rooted at `root`, subsetting the
/// icon font with `fontcull`.
pub fn build_project(
    root: &Path,
    config: &Config,
    content: &[String],
) -> Result<BuildReport, CliError> {
    build_project_with(root, config, content, &FontcullSubsetter)
}

pub fn build_project_with(
    root: &Path,
    config: &Config,
    content: &[String],
    subsetter: &dyn FontSubsetter,
) -> Result<BuildReport, CliError> {
    let options = ScanGlobOptions {
        base_path: root.to_path_buf(),
        ignore: output_ignore_patterns(&config.output_dir),
        ..ScanGlobOptions::default()
    };
    let scan = scan_globs(content, &options).map_err(|err| CliError {
        message: err.message,
    })?;
    log::debug!("scanned {} files", scan.files_scanned);

    let mut tokens = config.safelist.iter().cloned().collect::<IndexSet<_>>();
    tokens.extend(extract_classes(&scan.content));

    let metadata = MetadataStore::load(&root.join(&config.meta_dir)).map_err(|err| CliError {
        message: err.message,
    })?;

    let mut aggregator = Aggregator::new();
    aggregator.absorb(&metadata, &tokens);

    let mut css = preamble(&config.font_family, FONT_FILE);
    css.push_str(&aggregator.stylesheet());
    append_custom_css(&mut css, root, &config.custom_css);

    let output_dir = root.join(&config.output_dir);
    fs::create_dir_all(&output_dir).map_err(|err| CliError {
        message: format!("failed to create {}: {}", output_dir.display(), err),
    })?;
    let css_path = root.join(config.css_output_path());
    fs::write(&css_path, css).map_err(|err| CliError {
        message: format!("failed to write {}: {}", css_path.display(), err),
    })?;
    let rules = aggregator.buckets().rule_count();
    log::info!("CSS generated: {} ({} rules)", css_path.display(), rules);

    let font_path = root.join(config.font_output_path());
    let font = write_font(
        &root.join(&config.font),
        &font_path,
        &metadata,
        aggregator.used_icons(),
        subsetter,
    )?;

    Ok(BuildReport {
        files_scanned: scan.files_scanned,
        tokens: tokens.len(),
        rules,
        css_path,
        font_path: font.as_ref().map(|_| font_path),
        font,
    })
}

fn output_ignore_patterns(output_dir: &Path) -> Vec<String> {
    if output_dir.is_absolute() {
        return Vec::new();
    }
    let dir = output_dir.to_string_lossy();
    let dir = normalize_pattern(dir.trim_end_matches('/'));
    if dir.is_empty() || dir == "." {
        return Vec::new();
    }
    vec![format!("{}/**", dir)]
}

fn append_custom_css(css: &mut String, root: &Path, files: &[PathBuf]) {
    for file in files {
        let path = root.join(file);
        match fs::read_to_string(&path) {
            Ok(text) => {
                css.push_str(&text);
                css.push('\n');
            }
            Err(err) => log::warn!("Custom CSS file not found: {} ({})", path.display(), err),
        }
    }
}

fn write_font<'a, I>(
    source: &Path,
    target: &Path,
    metadata: &MetadataStore,
    used_icons: I,
    subsetter: &dyn FontSubsetter,
) -> Result<Option<FontOutput>, CliError>
where
    I: IntoIterator<Item = &'a String>,
{
    let font = match fs::read(source) {
        Ok(font) => font,
        Err(err) => {
            log::warn!(
                "icon font {} unavailable, skipping font output: {}",
                source.display(),
                err
            );
            return Ok(None);
        }
    };

    let output = subset_icon_font(&font, metadata, used_icons, subsetter);
    fs::write(target, &output.bytes).map_err(|err| CliError {
        message: format!("failed to write {}: {}", target.display(), err),
    })?;
    match output.reduction_percent() {
        Some(percent) => log::info!(
            "Font subsetted: {} ({} -> {} bytes, {:.1}% smaller)",
            target.display(),
            font.len(),
            output.bytes.len(),
            percent
        ),
        None => log::info!("Font written: {}", target.display()),
    }
    Ok(Some(output))
}

fn run_watch(root: &Path, config_path: &Path, glob: Option<&str>) -> Result<(), CliError> {
    let rebuild = || -> Config {
        let config = load_watch_config(config_path);
        let content = content_globs(&config, glob);
        if let Err(err) = build_project(root, &config, &content) {
            log::error!("build failed: {}", err);
        }
        config
    };

    let config = rebuild();
    let mut filter = WatchFilter::for_config(root, config_path, &config, glob)?;

    let (tx, rx) = channel();
    let mut watcher = notify::recommended_watcher(tx).map_err(|err| CliError {
        message: format!("failed to start watcher: {}", err),
    })?;
    rewatch(&mut watcher, &[], &filter.roots)?;
    if config_path.exists() {
        watcher
            .watch(config_path, notify::RecursiveMode::NonRecursive)
            .map_err(|err| CliError {
                message: format!("failed to watch {}: {}", config_path.display(), err),
            })?;
    }

    log::info!("watching for changes (press Ctrl+C to stop)...");

    let mut pending = false;
    loop {
        if !pending {
            match rx.recv() {
                Ok(Ok(event)) if filter.wants(&event) => {}
                Ok(Ok(_)) => continue,
                Ok(Err(err)) => {
                    log::warn!("watch error: {}", err);
                    continue;
                }
                Err(_) => break,
            }
        }

        let deadline = Instant::now() + WATCH_DEBOUNCE;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }

        log::info!("change detected, rebuilding...");
        let config = rebuild();
        match WatchFilter::for_config(root, config_path, &config, glob) {
            Ok(next) => {
                if next.roots != filter.roots {
                    rewatch(&mut watcher, &filter.roots, &next.roots)?;
                }
                filter = next;
            }
            Err(err) => log::warn!("keeping previous watch globs: {}", err),
        }

        // Everything that arrived while building collapses into one rerun.
        pending = false;
        while let Ok(event) = rx.try_recv() {
            if let Ok(event) = event {
                pending |= filter.wants(&event);
            }
        }
    }

    Ok(())
}

/// Like `load_config`, but a broken file only logs: watching continues on
/// defaults until the file is fixed.
fn load_watch_config(config_path: &Path) -> Config {
    match load_config(config_path) {
        Ok(config) => config,
        Err(err) => {
            log::warn!("{}; using defaults until it is fixed", err);
            Config::default()
        }
    }
}

fn rewatch(
    watcher: &mut dyn Watcher,
    previous: &[PathBuf],
    next: &[PathBuf],
) -> Result<(), CliError> {
    for dir in previous.iter().filter(|dir| !next.contains(dir)) {
        if let Err(err) = watcher.unwatch(dir) {
            log::debug!("failed to unwatch {}: {}", dir.display(), err);
        }
    }
    for dir in next.iter().filter(|dir| !previous.contains(dir)) {
        watcher
            .watch(dir, notify::RecursiveMode::Recursive)
            .map_err(|err| CliError {
                message: format!("failed to watch {}: {}", dir.display(), err),
            })?;
    }
    Ok(())
}

/// Decides which filesystem events trigger a rebuild, and which directories
/// are watched for them.
struct WatchFilter {
    root: PathBuf,
    config_path: PathBuf,
    output_dir: PathBuf,
    content: GlobSet,
    roots: Vec<PathBuf>,
}

impl WatchFilter {
    fn new(
        root: &Path,
        config_path: &Path,
        output_dir: &Path,
        content: &[String],
    ) -> Result<Self, CliError> {
        let globset = build_globset(content).map_err(|err| CliError {
            message: err.message,
        })?;
        Ok(Self {
            root: root.to_path_buf(),
            config_path: config_path.to_path_buf(),
            output_dir: root.join(output_dir),
            content: globset,
            roots: watch_roots(content)
                .into_iter()
                .map(|dir| root.join(dir))
                .collect(),
        })
    }

    fn for_config(
        root: &Path,
        config_path: &Path,
        config: &Config,
        glob: Option<&str>,
    ) -> Result<Self, CliError> {
        Self::new(
            root,
            config_path,
            &config.output_dir,
            &content_globs(config, glob),
        )
    }

    fn wants(&self, event: &notify::Event) -> bool {
        if matches!(event.kind, notify::EventKind::Access(_)) {
            return false;
        }
        event.paths.iter().any(|path| self.wants_path(path))
    }

    fn wants_path(&self, path: &Path) -> bool {
        if path == self.config_path {
            return true;
        }
        if path.starts_with(&self.output_dir) {
            return false;
        }
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        if is_in_node_modules(relative) {
            return false;
        }
        self.content.is_match(relative)
    }
}

fn watch_roots(patterns: &[String]) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    let mut seen = HashSet::new();
    for pattern in patterns {
        let root = glob_root(normalize_pattern(pattern));
        if seen.insert(root.clone()) {
            roots.push(root);
        }
    }
    roots
}

/// The directory part of `pattern` before its first glob metacharacter.
fn glob_root(pattern: &str) -> PathBuf {
    let prefix = match pattern.find(['*', '?', '[', '{']) {
        Some(idx) => &pattern[..idx],
        None if Path::new(pattern).extension().is_none() && !pattern.is_empty() => {
            return PathBuf::from(pattern);
        }
        None => pattern,
    };
    match prefix.rfind(['/', '\\']) {
        Some(idx) if idx > 0 => PathBuf::from(&prefix[..idx]),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Cli, Command, WatchFilter, build_project_with, content_globs, glob_root,
        load_watch_config, output_ignore_patterns, watch_roots,
    };
    use crate::config::Config;
    use crate::subset::{FontOutcome, FontSubsetter, SubsetError, SubsetRequest};
    use clap::Parser;
    use std::fs;
    use std::path::{Path, PathBuf};

    struct EchoSubsetter;

    impl FontSubsetter for EchoSubsetter {
        fn subset(&self, _font: &[u8], request: &SubsetRequest) -> Result<Vec<u8>, SubsetError> {
            Ok(request.text.as_bytes().to_vec())
        }
    }

    fn write_project(root: &Path) {
        fs::create_dir_all(root.join("src")).expect("create src");
        fs::create_dir_all(root.join("dist/meta")).expect("create meta");
        fs::write(
            root.join("src/index.html"),
            r#"<i class="if-home md:is-p-[4px] foo"></i><b class="is-flex"></b>"#,
        )
        .expect("write html");
        fs::write(
            root.join("dist/meta/iconforge-icons.json"),
            r#"{"if-home": ".if-home:before { content: '\\e900'; }", "if-star": ".if-star:before { content: '\\e901'; }"}"#,
        )
        .expect("write icons");
        fs::write(
            root.join("dist/meta/iconforge-styles.json"),
            r#"{"is-flex": ".is-flex { display: flex; }"}"#,
        )
        .expect("write styles");
        fs::write(root.join("dist/iconforge.woff2"), b"full font bytes").expect("write font");
    }

    #[test]
    fn no_subcommand_means_build() {
        let cli = Cli::try_parse_from(["iconforge"]).expect("cli should parse");
        assert_eq!(cli.command, None);
        assert_eq!(cli.config, PathBuf::from("iconforge.toml"));
    }

    #[test]
    fn parses_subcommands_with_glob_and_config() {
        let cli = Cli::try_parse_from(["iconforge", "build", "src/**/*.html", "-c", "alt.toml"])
            .expect("cli should parse");
        assert_eq!(
            cli.command,
            Some(Command::Build {
                glob: Some("src/**/*.html".to_string())
            })
        );
        assert_eq!(cli.config, PathBuf::from("alt.toml"));

        let cli = Cli::try_parse_from(["iconforge", "watch"]).expect("cli should parse");
        assert_eq!(cli.command, Some(Command::Watch { glob: None }));
        let cli = Cli::try_parse_from(["iconforge", "init"]).expect("cli should parse");
        assert_eq!(cli.command, Some(Command::Init));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["iconforge", "serve"]).is_err());
    }

    #[test]
    fn explicit_glob_overrides_config_content() {
        let config = Config::default();
        assert_eq!(content_globs(&config, Some("a/*.vue")), vec!["a/*.vue".to_string()]);
        assert_eq!(content_globs(&config, None), config.content_globs());
    }

    #[test]
    fn build_writes_css_and_subset_font() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write_project(root);
        let config = Config {
            safelist: vec!["if-star".to_string()],
            ..Config::default()
        };

        let report = build_project_with(root, &config, &config.content_globs(), &EchoSubsetter)
            .expect("build should succeed");

        assert_eq!(report.files_scanned, 1);
        assert_eq!(report.rules, 4);
        let css = fs::read_to_string(&report.css_path).expect("read css");
        assert!(css.starts_with("@font-face { font-family: 'IconForge';"));
        assert!(css.contains(".if-home:before { content: '\\e900'; }\n"));
        assert!(css.contains(".if-star:before { content: '\\e901'; }\n"));
        assert!(css.contains(".is-flex { display: flex; }\n"));
        assert!(css.ends_with(
            "@media (min-width: 768px) {\n  .md\\:is-p-\\[4px\\] { padding: 4px; }\n}\n"
        ));
        assert!(!css.contains("foo"));

        let font = fs::read(root.join("iconforge-output/iconforge.woff2")).expect("read font");
        assert_eq!(font, "\u{e900}\u{e901}".as_bytes());
        let output = report.font.expect("font should be written");
        assert!(matches!(output.outcome, FontOutcome::Subsetted { .. }));
    }

    #[test]
    fn build_appends_custom_css_and_skips_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write_project(root);
        fs::write(root.join("extra.css"), ".extra { color: red; }").expect("write extra");
        let config = Config {
            custom_css: vec![PathBuf::from("missing.css"), PathBuf::from("extra.css")],
            ..Config::default()
        };

        let report = build_project_with(root, &config, &config.content_globs(), &EchoSubsetter)
            .expect("build should succeed");
        let css = fs::read_to_string(report.css_path).expect("read css");
        assert!(css.ends_with(".extra { color: red; }\n"));
    }

    #[test]
    fn missing_metadata_fails_the_build() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write_project(root);
        fs::remove_file(root.join("dist/meta/iconforge-styles.json")).expect("remove styles");

        let config = Config::default();
        let err = build_project_with(root, &config, &config.content_globs(), &EchoSubsetter)
            .expect_err("build should fail");
        assert!(err.message.contains("iconforge-styles.json"));
        assert!(!root.join("iconforge-output/iconforge.css").exists());
    }

    #[test]
    fn missing_font_skips_font_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write_project(root);
        fs::remove_file(root.join("dist/iconforge.woff2")).expect("remove font");

        let config = Config::default();
        let report = build_project_with(root, &config, &config.content_globs(), &EchoSubsetter)
            .expect("build should succeed");
        assert!(report.font.is_none());
        assert!(report.font_path.is_none());
        assert!(report.css_path.exists());
    }

    #[test]
    fn generated_output_is_not_rescanned() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write_project(root);
        fs::create_dir_all(root.join("iconforge-output")).expect("create output");
        fs::write(
            root.join("iconforge-output/preview.html"),
            r#"<i class="if-star"></i>"#,
        )
        .expect("write preview");

        let config = Config::default();
        let report = build_project_with(root, &config, &config.content_globs(), &EchoSubsetter)
            .expect("build should succeed");
        assert_eq!(report.files_scanned, 1);
        let css = fs::read_to_string(report.css_path).expect("read css");
        assert!(!css.contains("if-star"));
    }

    #[test]
    fn output_dir_becomes_ignore_glob() {
        assert_eq!(
            output_ignore_patterns(Path::new("./public/icons/")),
            vec!["public/icons/**".to_string()]
        );
        assert!(output_ignore_patterns(Path::new(".")).is_empty());
    }

    #[test]
    fn glob_root_stops_at_first_metacharacter() {
        assert_eq!(glob_root("src/**/*.html"), PathBuf::from("src"));
        assert_eq!(glob_root("src/pages/*.vue"), PathBuf::from("src/pages"));
        assert_eq!(glob_root("**/*.{html,js}"), PathBuf::from("."));
        assert_eq!(glob_root("index.html"), PathBuf::from("."));
        assert_eq!(glob_root("src/index.html"), PathBuf::from("src"));
        assert_eq!(glob_root("templates"), PathBuf::from("templates"));
    }

    #[test]
    fn watch_roots_are_deduplicated() {
        let roots = watch_roots(&[
            "./src/**/*.html".to_string(),
            "src/*.ts".to_string(),
            "**/*.vue".to_string(),
        ]);
        assert_eq!(roots, vec![PathBuf::from("src"), PathBuf::from(".")]);
    }

    #[test]
    fn watch_filter_ignores_output_and_unmatched_paths() {
        let root = Path::new("/project");
        let filter = WatchFilter::new(
            root,
            &root.join("iconforge.toml"),
            Path::new("iconforge-output"),
            &["**/*.html".to_string()],
        )
        .expect("filter should build");

        assert!(filter.wants_path(&root.join("src/index.html")));
        assert!(filter.wants_path(&root.join("iconforge.toml")));
        assert!(!filter.wants_path(&root.join("src/app.rs")));
        assert!(!filter.wants_path(&root.join("iconforge-output/preview.html")));
        assert!(!filter.wants_path(&root.join("node_modules/x/index.js")));
        assert!(!filter.wants_path(&root.join("node_modules/x/index.html")));
        assert!(!filter.wants_path(&root.join("src/node_modules/x/page.html")));
    }

    #[test]
    fn malformed_config_falls_back_to_defaults_while_watching() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("iconforge.toml");
        fs::write(&config_path, "content = [\"src/**/*.html\"").expect("write config");

        assert_eq!(load_watch_config(&config_path), Config::default());

        fs::write(&config_path, "content = [\"src/**/*.html\"]").expect("write config");
        assert_eq!(
            load_watch_config(&config_path).content,
            vec!["src/**/*.html".to_string()]
        );
    }

    #[test]
    fn watch_filter_follows_config_changes() {
        let root = Path::new("/project");
        let config_path = root.join("iconforge.toml");
        let before = Config {
            content: vec!["src/**/*.html".to_string()],
            ..Config::default()
        };
        let after = Config {
            content: vec!["pages/**/*.vue".to_string()],
            output_dir: PathBuf::from("public/icons"),
            ..Config::default()
        };

        let first = WatchFilter::for_config(root, &config_path, &before, None)
            .expect("filter should build");
        assert_eq!(first.roots, vec![root.join("src")]);
        assert!(first.wants_path(&root.join("src/index.html")));
        assert!(!first.wants_path(&root.join("pages/home.vue")));

        let second = WatchFilter::for_config(root, &config_path, &after, None)
            .expect("filter should build");
        assert_eq!(second.roots, vec![root.join("pages")]);
        assert!(second.wants_path(&root.join("pages/home.vue")));
        assert!(!second.wants_path(&root.join("src/index.html")));
        assert!(!second.wants_path(&root.join("public/icons/iconforge.css")));

        let explicit = WatchFilter::for_config(root, &config_path, &after, Some("lib/*.html"))
            .expect("filter should build");
        assert_eq!(explicit.roots, vec![root.join("lib")]);
    }
}
