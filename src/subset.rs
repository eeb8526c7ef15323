use crate::metadata::MetadataStore;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFormat {
    Woff2,
}

/// The glyphs to keep and the container to write them in. Family names are
/// left as they are in the source font.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetRequest {
    pub text: String,
    pub target_format: FontFormat,
}

impl SubsetRequest {
    pub fn new(text: String) -> Self {
        Self {
            text,
            target_format: FontFormat::Woff2,
        }
    }

    pub fn chars(&self) -> HashSet<char> {
        self.text.chars().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetError {
    pub message: String,
}

impl fmt::Display for SubsetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SubsetError {}

/// Produces a font containing only the glyphs a request asks for.
pub trait FontSubsetter {
    fn subset(&self, font: &[u8], request: &SubsetRequest) -> Result<Vec<u8>, SubsetError>;
}

/// Subsets with `fontcull`: unpack WOFF/WOFF2 to sfnt, drop unused glyphs,
/// repack as WOFF2.
#[derive(Debug, Clone, Copy, Default)]
pub struct FontcullSubsetter;

impl FontSubsetter for FontcullSubsetter {
    fn subset(&self, font: &[u8], request: &SubsetRequest) -> Result<Vec<u8>, SubsetError> {
        let sfnt = fontcull::decompress_font(font).map_err(|err| SubsetError {
            message: format!("failed to decompress font: {}", err),
        })?;
        let subsetted =
            fontcull::subset_font_data(&sfnt, &request.chars()).map_err(|err| SubsetError {
                message: format!("failed to subset font: {}", err),
            })?;
        match request.target_format {
            FontFormat::Woff2 => fontcull::compress_to_woff2(&subsetted).map_err(|err| SubsetError {
                message: format!("failed to compress font to woff2: {}", err),
            }),
        }
    }
}

fn code_point_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"content:\s*'\\([0-9a-fA-F]+)'").expect("code point pattern is valid")
    })
}

/// Reads the glyph code point out of a `content: '\e900'` declaration.
pub fn extract_code_point(declarations: &str) -> Option<char> {
    let captures = code_point_pattern().captures(declarations)?;
    let hex = captures.get(1)?.as_str();
    let value = u32::from_str_radix(hex, 16).ok()?;
    char::from_u32(value)
}

/// One character per used icon that has a readable code point, in the
/// iteration order of `used_icons`.
pub fn icon_code_points<I, S>(metadata: &MetadataStore, used_icons: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    used_icons
        .into_iter()
        .filter(|base| base.as_ref().starts_with("if-"))
        .filter_map(|base| {
            metadata
                .icon(base.as_ref())?
                .declarations
                .as_deref()
                .and_then(extract_code_point)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontOutcome {
    Subsetted { original_size: usize, subset_size: usize },
    NoIcons,
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontOutput {
    pub bytes: Vec<u8>,
    pub outcome: FontOutcome,
}

impl FontOutput {
    /// Size reduction in percent, for subsetted fonts.
    pub fn reduction_percent(&self) -> Option<f64> {
        match self.outcome {
            FontOutcome::Subsetted {
                original_size,
                subset_size,
            } if original_size > 0 => {
                Some((original_size as f64 - subset_size as f64) / original_size as f64 * 100.0)
            }
            _ => None,
        }
    }
}

/// Subsets `font` down to the glyphs of `used_icons`.
///
/// With no icons in use, or when subsetting fails for any reason, the full
/// font is returned unchanged.
pub fn subset_icon_font<I, S>(
    font: &[u8],
    metadata: &MetadataStore,
    used_icons: I,
    subsetter: &dyn FontSubsetter,
) -> FontOutput
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let text = icon_code_points(metadata, used_icons);
    if text.is_empty() {
        log::info!("No icons to subset, copying full font...");
        return FontOutput {
            bytes: font.to_vec(),
            outcome: FontOutcome::NoIcons,
        };
    }

    let request = SubsetRequest::new(text);
    match subsetter.subset(font, &request) {
        Ok(bytes) if !bytes.is_empty() => FontOutput {
            outcome: FontOutcome::Subsetted {
                original_size: font.len(),
                subset_size: bytes.len(),
            },
            bytes,
        },
        Ok(_) => fallback(font, "subsetter returned an empty font".to_string()),
        Err(err) => fallback(font, err.message),
    }
}

fn fallback(font: &[u8], reason: String) -> FontOutput {
    log::warn!("Error during font subsetting: {}", reason);
    FontOutput {
        bytes: font.to_vec(),
        outcome: FontOutcome::Fallback { reason },
    }
}
