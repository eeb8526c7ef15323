use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

pub const ICONS_FILE: &str = "iconforge-icons.json";
pub const STYLES_FILE: &str = "iconforge-styles.json";

/// A metadata entry after normalization. Both the string and the object
/// shapes of the JSON documents end up here, so rule synthesis never looks
/// at the source shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSource {
    pub declarations: Option<String>,
    pub keyframes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataStore {
    icons: BTreeMap<String, RuleSource>,
    styles: BTreeMap<String, RuleSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataError {
    pub message: String,
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for MetadataError {}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStyle {
    Rule(String),
    Structured {
        #[serde(default)]
        class: Option<String>,
        #[serde(default)]
        keyframes: Option<String>,
    },
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawIcon {
    Rule(String),
    Structured {
        #[serde(default)]
        value: Option<String>,
    },
    Other(serde_json::Value),
}

impl MetadataStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads `iconforge-icons.json` and `iconforge-styles.json` from `meta_dir`.
    pub fn load(meta_dir: &Path) -> Result<Self, MetadataError> {
        let icons_path = meta_dir.join(ICONS_FILE);
        let styles_path = meta_dir.join(STYLES_FILE);
        let icons = fs::read_to_string(&icons_path).map_err(|err| MetadataError {
            message: format!(
                "failed to read icon metadata {}: {}",
                icons_path.display(),
                err
            ),
        })?;
        let styles = fs::read_to_string(&styles_path).map_err(|err| MetadataError {
            message: format!(
                "failed to read style metadata {}: {}",
                styles_path.display(),
                err
            ),
        })?;
        Self::from_json(&icons, &styles)
    }

    pub fn from_json(icons_json: &str, styles_json: &str) -> Result<Self, MetadataError> {
        let raw_icons: BTreeMap<String, RawIcon> =
            serde_json::from_str(icons_json).map_err(|err| MetadataError {
                message: format!("failed to parse icon metadata: {}", err),
            })?;
        let raw_styles: BTreeMap<String, RawStyle> =
            serde_json::from_str(styles_json).map_err(|err| MetadataError {
                message: format!("failed to parse style metadata: {}", err),
            })?;

        let icons = raw_icons
            .into_iter()
            .filter_map(|(name, raw)| {
                let rule = match raw {
                    RawIcon::Rule(rule) => Some(rule),
                    RawIcon::Structured { value } => value,
                    RawIcon::Other(_) => None,
                }?;
                let source = RuleSource {
                    declarations: extract_declarations(&rule).map(str::to_string),
                    keyframes: None,
                };
                Some((name, source))
            })
            .collect();

        let styles = raw_styles
            .into_iter()
            .filter_map(|(name, raw)| {
                let (rule, keyframes) = match raw {
                    RawStyle::Rule(rule) => (Some(rule), None),
                    RawStyle::Structured { class, keyframes } => (class, keyframes),
                    RawStyle::Other(_) => return None,
                };
                let source = RuleSource {
                    declarations: rule
                        .as_deref()
                        .and_then(extract_declarations)
                        .map(str::to_string),
                    keyframes: keyframes.filter(|block| !block.trim().is_empty()),
                };
                if source.declarations.is_none() && source.keyframes.is_none() {
                    return None;
                }
                Some((name, source))
            })
            .collect();

        Ok(Self { icons, styles })
    }

    pub fn icon(&self, base: &str) -> Option<&RuleSource> {
        self.icons.get(base)
    }

    pub fn style(&self, base: &str) -> Option<&RuleSource> {
        self.styles.get(base)
    }

    pub fn icon_count(&self) -> usize {
        self.icons.len()
    }

    pub fn style_count(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty() && self.styles.is_empty()
    }
}

/// Returns the text between the first `{` and the next `}`, trimmed.
///
/// This is deliberately not a CSS parser: nested blocks are not understood
/// and only the first non-empty brace pair counts. A rule with no `{` at all
/// is taken to be a bare declaration list.
pub fn extract_declarations(rule: &str) -> Option<&str> {
    if !rule.contains('{') {
        let trimmed = rule.trim();
        return (!trimmed.is_empty()).then_some(trimmed);
    }

    let mut search_from = 0usize;
    while let Some(offset) = rule[search_from..].find('{') {
        let open = search_from + offset;
        let body_start = open + 1;
        let close = body_start + rule[body_start..].find('}')?;
        if close > body_start {
            let body = rule[body_start..close].trim();
            return (!body.is_empty()).then_some(body);
        }
        search_from = body_start;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{MetadataStore, RuleSource, extract_declarations};
    use std::fs;

    #[test]
    fn extracts_first_brace_pair() {
        assert_eq!(
            extract_declarations(".if-home:before { content: '\\e900'; }"),
            Some("content: '\\e900';")
        );
        assert_eq!(
            extract_declarations("a{color:red} b{color:blue}"),
            Some("color:red")
        );
    }

    #[test]
    fn nested_braces_stop_at_first_close() {
        assert_eq!(
            extract_declarations("@media x { .a { color: red } }"),
            Some(".a { color: red")
        );
    }

    #[test]
    fn skips_empty_brace_pairs() {
        assert_eq!(extract_declarations("a{}b{margin:0}"), Some("margin:0"));
        assert_eq!(extract_declarations("a{ }"), None);
        assert_eq!(extract_declarations("a{unterminated"), None);
    }

    #[test]
    fn braceless_rule_is_taken_whole() {
        assert_eq!(
            extract_declarations("  display: flex;  "),
            Some("display: flex;")
        );
        assert_eq!(extract_declarations("   "), None);
    }

    #[test]
    fn normalizes_both_entry_shapes() {
        let store = MetadataStore::from_json(
            r#"{
                "if-home": ".if-home:before{content:'\\e900'}",
                "if-star": {"value": ".if-star:before{content:'\\e901'}"},
                "if-broken": 42
            }"#,
            r#"{
                "is-flex": ".is-flex{display:flex}",
                "is-pulse": {"class": ".is-pulse{animation:pulse 1s}", "keyframes": "@keyframes pulse{0%{opacity:0}100%{opacity:1}}"},
                "is-empty": {"class": ".is-empty{}"}
            }"#,
        )
        .expect("metadata should parse");

        assert_eq!(
            store.icon("if-home").and_then(|s| s.declarations.as_deref()),
            Some("content:'\\e900'")
        );
        assert_eq!(
            store.icon("if-star").and_then(|s| s.declarations.as_deref()),
            Some("content:'\\e901'")
        );
        assert!(store.icon("if-broken").is_none());
        assert_eq!(
            store.style("is-flex"),
            Some(&RuleSource {
                declarations: Some("display:flex".to_string()),
                keyframes: None,
            })
        );
        assert_eq!(
            store.style("is-pulse").and_then(|s| s.keyframes.as_deref()),
            Some("@keyframes pulse{0%{opacity:0}100%{opacity:1}}")
        );
        assert!(store.style("is-empty").is_none());
        assert_eq!(store.icon_count(), 2);
        assert_eq!(store.style_count(), 2);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = MetadataStore::from_json("{", "{}").expect_err("icons should fail");
        assert!(err.message.contains("icon metadata"));
        let err = MetadataStore::from_json("{}", "[1, 2]").expect_err("styles should fail");
        assert!(err.message.contains("style metadata"));
    }

    #[test]
    fn loads_from_meta_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("iconforge-icons.json"),
            r#"{"if-home": ".if-home:before{content:'\\e900'}"}"#,
        )
        .expect("write icons");
        fs::write(dir.path().join("iconforge-styles.json"), "{}").expect("write styles");

        let store = MetadataStore::load(dir.path()).expect("metadata should load");
        assert!(store.icon("if-home").is_some());
        assert!(!store.is_empty());
    }

    #[test]
    fn missing_meta_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = MetadataStore::load(dir.path()).expect_err("load should fail");
        assert!(err.message.contains("iconforge-icons.json"));
    }
}
