use crate::metadata::MetadataStore;
use crate::variants::VariantDescriptor;
use std::fmt;

/// Which resolution path produced a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Arbitrary,
    Style,
    Icon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedRule {
    pub kind: RuleKind,
    pub selector: String,
    pub declarations: String,
    pub media_query: Option<String>,
}

impl SynthesizedRule {
    /// The rule without its media query.
    pub fn to_css(&self) -> String {
        format!("{} {{ {} }}", self.selector, self.declarations)
    }

    /// The rule wrapped in its media query, if it has one.
    pub fn to_wrapped_css(&self) -> String {
        match self.media_query.as_deref() {
            Some(query) => format!("{} {{ {} }}", query, self.to_css()),
            None => self.to_css(),
        }
    }
}

impl fmt::Display for SynthesizedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wrapped_css())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Synthesis {
    pub keyframes: Option<String>,
    pub rule: Option<SynthesizedRule>,
}

impl Synthesis {
    pub fn is_empty(&self) -> bool {
        self.keyframes.is_none() && self.rule.is_none()
    }
}

/// Resolves one token to CSS.
///
/// `token` is the full class as written (it becomes the selector), `base` is
/// the token with its variant prefixes stripped. Arbitrary values are tried
/// first, then the style metadata, then the icon metadata. A token none of
/// them recognizes yields an empty [`Synthesis`].
pub fn synthesize(
    token: &str,
    base: &str,
    variant: &VariantDescriptor,
    metadata: &MetadataStore,
) -> Synthesis {
    if let Some(declarations) = arbitrary_rule_declarations(base) {
        return Synthesis {
            keyframes: None,
            rule: Some(build_rule(
                RuleKind::Arbitrary,
                token,
                variant,
                declarations,
            )),
        };
    }

    if let Some(style) = metadata.style(base) {
        return Synthesis {
            keyframes: style.keyframes.clone(),
            rule: style.declarations.as_ref().map(|declarations| {
                build_rule(RuleKind::Style, token, variant, declarations.clone())
            }),
        };
    }

    if let Some(icon) = metadata.icon(base) {
        return Synthesis {
            keyframes: None,
            rule: icon.declarations.as_ref().map(|declarations| {
                build_rule(RuleKind::Icon, token, variant, declarations.clone())
            }),
        };
    }

    Synthesis::default()
}

fn build_rule(
    kind: RuleKind,
    token: &str,
    variant: &VariantDescriptor,
    declarations: String,
) -> SynthesizedRule {
    let mut selector = format!(
        "{}.{}{}",
        variant.dark_prefix(),
        escape_selector(token),
        variant.pseudo_selectors()
    );
    if kind == RuleKind::Icon {
        selector.push_str(":before");
    }
    SynthesizedRule {
        kind,
        selector,
        declarations,
        media_query: variant.media_query(),
    }
}

/// Splits `is-<kind>-[<value>]` into its kind and raw value.
pub fn split_arbitrary_class(base: &str) -> Option<(&str, &str)> {
    let rest = base.strip_prefix("is-")?;
    let open = rest.find('[')?;
    let kind = rest[..open].strip_suffix('-')?;
    let value = rest[open + 1..].strip_suffix(']')?;
    if kind.is_empty() || value.is_empty() {
        return None;
    }
    Some((kind, value))
}

pub fn arbitrary_rule_declarations(base: &str) -> Option<String> {
    let (kind, value) = split_arbitrary_class(base)?;
    arbitrary_declarations(kind, value)
}

/// Declarations for an arbitrary-value class, or `None` when `kind` is not a
/// known property keyword.
pub fn arbitrary_declarations(kind: &str, value: &str) -> Option<String> {
    let declarations = match kind {
        "color" => format!("color: {};", value),
        "bg" => format!("background-color: {};", value),
        "w" => format!("width: {};", value),
        "h" => format!("height: {};", value),
        "sq" => format!("width: {}; height: {};", value, value),
        "size" => format!("font-size: {};", value),
        "p" => format!("padding: {};", value),
        "pt" => format!("padding-top: {};", value),
        "pr" => format!("padding-right: {};", value),
        "pb" => format!("padding-bottom: {};", value),
        "pl" => format!("padding-left: {};", value),
        "px" => format!("padding-left: {}; padding-right: {};", value, value),
        "py" => format!("padding-top: {}; padding-bottom: {};", value, value),
        "m" => format!("margin: {};", value),
        "mt" => format!("margin-top: {};", value),
        "mr" => format!("margin-right: {};", value),
        "mb" => format!("margin-bottom: {};", value),
        "ml" => format!("margin-left: {};", value),
        "mx" => format!("margin-left: {}; margin-right: {};", value, value),
        "my" => format!("margin-top: {}; margin-bottom: {};", value, value),
        "z" => format!("z-index: {};", value),
        "scale" => format!("transform: scale({});", value),
        "opacity" => format!("opacity: {};", value),
        "rot" => format!("transform: rotate({});", value),
        "grid-cols" => format!("grid-template-columns: repeat({}, minmax(0, 1fr));", value),
        "grid-rows" => format!("grid-template-rows: repeat({}, minmax(0, 1fr));", value),
        "gap" => format!("gap: {};", value),
        "top" => format!("top: {};", value),
        "bottom" => format!("bottom: {};", value),
        "left" => format!("left: {};", value),
        "right" => format!("right: {};", value),
        "translate" => format!("transform: translate({}, {});", value, value),
        "translate-x" => format!("transform: translateX({});", value),
        "translate-y" => format!("transform: translateY({});", value),
        "border" => format!(
            "border-width: {} {} {} {}; border-style: solid;",
            value, value, value, value
        ),
        "border-t" => format!("border-top-width: {}; border-style: solid;", value),
        "border-b" => format!("border-bottom-width: {}; border-style: solid;", value),
        "border-l" => format!("border-left-width: {}; border-style: solid;", value),
        "border-r" => format!("border-right-width: {}; border-style: solid;", value),
        "outline" => format!("outline: 1px solid {};", value),
        "outline-dashed" => format!("outline: 1px dashed {};", value),
        "outline-dotted" => format!("outline: 1px dotted {};", value),
        "outline-double" => format!("outline: 2px solid {};", value),
        "blur" => format!("filter: blur({});", value),
        "backdrop-blur" => format!("backdrop-filter: blur({});", value),
        "brightness" => format!("filter: brightness({});", value),
        "contrast" => format!("filter: contrast({});", value),
        "grayscale" => format!("filter: grayscale({});", value),
        "saturate" => format!("filter: saturate({});", value),
        "fixed-bg" => format!(
            "position: fixed; top: 0; left: 0; width: 100dvw; height: 100dvh; z-index: -1; background-repeat: no-repeat; background-size: cover; background-image: url(\"{}\");",
            value.replace('"', "\\\"")
        ),
        "gradient-linear" => gradient_text_declarations("linear-gradient", value),
        "gradient-radial" => gradient_text_declarations("radial-gradient", value),
        "gradient-conic" => gradient_text_declarations("conic-gradient", value),
        _ => return None,
    };
    Some(declarations)
}

// Underscores stand in for spaces so gradients fit in a single class token.
fn gradient_text_declarations(function: &str, value: &str) -> String {
    format!(
        "background-image: {}({}); color: transparent; -webkit-background-clip: text; background-clip: text;",
        function,
        value.replace('_', " ")
    )
}

/// Backslash-escapes every character that is significant inside a CSS
/// selector.
pub fn escape_selector(class: &str) -> String {
    let mut escaped = String::with_capacity(class.len() * 2);

    for ch in class.chars() {
        match ch {
            ' ' | '!' | '"' | '#' | '$' | '%' | '&' | '\'' | '(' | ')' | '*' | '+' | ','
            | '.' | '/' | ':' | ';' | '<' | '=' | '>' | '?' | '@' | '[' | '\\' | ']' | '^'
            | '`' | '{' | '|' | '}' | '~' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }

    escaped
}
