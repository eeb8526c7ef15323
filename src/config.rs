use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "iconforge.toml";
pub const DEFAULT_CONTENT_GLOB: &str = "**/*.{html,js,ts,vue,jsx,tsx}";
pub const CSS_FILE: &str = "iconforge.css";
pub const FONT_FILE: &str = "iconforge.woff2";

pub const DEFAULT_CONFIG_TOML: &str = r#"# iconforge configuration

# Files scanned for class="..." and className="..." attributes.
content = ["**/*.{html,js,ts,vue,jsx,tsx}"]

# Classes generated dynamically and not found by the scanner.
safelist = []

# Stylesheets appended verbatim to the generated CSS.
custom_css = []

# output_dir = "iconforge-output"
# meta_dir = "dist/meta"
# font = "dist/iconforge.woff2"
# font_family = "IconForge"
"#;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub content: Vec<String>,
    pub safelist: Vec<String>,
    #[serde(alias = "customCSS")]
    pub custom_css: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub meta_dir: PathBuf,
    pub font: PathBuf,
    pub font_family: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            content: vec![DEFAULT_CONTENT_GLOB.to_string()],
            safelist: Vec::new(),
            custom_css: Vec::new(),
            output_dir: PathBuf::from("iconforge-output"),
            meta_dir: PathBuf::from("dist/meta"),
            font: PathBuf::from("dist").join(FONT_FILE),
            font_family: "IconForge".to_string(),
        }
    }
}

impl Config {
    pub fn css_output_path(&self) -> PathBuf {
        self.output_dir.join(CSS_FILE)
    }

    pub fn font_output_path(&self) -> PathBuf {
        self.output_dir.join(FONT_FILE)
    }

    /// The configured content globs, or the default when the list is empty.
    pub fn content_globs(&self) -> Vec<String> {
        if self.content.is_empty() {
            vec![DEFAULT_CONTENT_GLOB.to_string()]
        } else {
            self.content.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConfigError {}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path).map_err(|err| ConfigError {
        message: format!("failed to read config {}: {}", path.display(), err),
    })?;
    toml::from_str(&text).map_err(|err| ConfigError {
        message: format!("failed to parse config {}: {}", path.display(), err),
    })
}

/// Loads `path` if it exists, otherwise falls back to defaults.
pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        load(path)
    } else {
        Ok(Config::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    AlreadyExists,
}

/// Writes the default configuration to `path` unless a file is already there.
pub fn write_default(path: &Path) -> Result<InitOutcome, ConfigError> {
    if path.exists() {
        return Ok(InitOutcome::AlreadyExists);
    }
    fs::write(path, DEFAULT_CONFIG_TOML).map_err(|err| ConfigError {
        message: format!("failed to write config {}: {}", path.display(), err),
    })?;
    Ok(InitOutcome::Created)
}
