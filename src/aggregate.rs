use crate::generator::{RuleKind, SynthesizedRule, synthesize};
use crate::metadata::MetadataStore;
use crate::variants::{Breakpoint, parse_variants};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Rules resolved in one pass, bucketed the way they are serialized:
/// keyframes, then unscoped rules, then one block per breakpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleBuckets {
    pub keyframes: Vec<String>,
    pub default: Vec<String>,
    pub media: BTreeMap<Breakpoint, Vec<String>>,
}

impl RuleBuckets {
    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty() && self.default.is_empty() && self.media.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.default.len() + self.media.values().map(Vec::len).sum::<usize>()
    }

    fn push_rule(&mut self, breakpoint: Option<Breakpoint>, rule: &SynthesizedRule) {
        match breakpoint {
            Some(bp) => self.media.entry(bp).or_default().push(rule.to_css()),
            None => self.default.push(rule.to_css()),
        }
    }

    fn extend(&mut self, other: RuleBuckets) {
        self.keyframes.extend(other.keyframes);
        self.default.extend(other.default);
        for (bp, rules) in other.media {
            self.media.entry(bp).or_default().extend(rules);
        }
    }

    /// Keyframes first, then unscoped rules, then the media blocks in
    /// ascending breakpoint order with their rules indented.
    pub fn to_css(&self) -> String {
        let mut css = String::new();
        for block in &self.keyframes {
            css.push_str(block);
            css.push('\n');
        }
        for rule in &self.default {
            css.push_str(rule);
            css.push('\n');
        }
        for bp in Breakpoint::ALL {
            let Some(rules) = self.media.get(&bp) else {
                continue;
            };
            if rules.is_empty() {
                continue;
            }
            css.push_str(&bp.media_query());
            css.push_str(" {\n");
            for rule in rules {
                css.push_str("  ");
                css.push_str(rule);
                css.push('\n');
            }
            css.push_str("}\n");
        }
        css
    }
}

/// Accumulates the rules for every distinct token it is fed.
///
/// A token is synthesized at most once per aggregator: feeding the same
/// content again produces an empty delta. Keyframes are shared across
/// tokens and emitted once per animation name.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    resolved: HashSet<String>,
    keyframe_keys: HashSet<String>,
    used_icons: BTreeSet<String>,
    buckets: RuleBuckets,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves every token not seen before and returns only what is new.
    pub fn absorb<I, S>(&mut self, metadata: &MetadataStore, tokens: I) -> RuleBuckets
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut delta = RuleBuckets::default();

        for token in tokens {
            let token = token.as_ref();
            if token.is_empty() || self.resolved.contains(token) {
                continue;
            }
            let parsed = parse_variants(token);
            if !parsed.is_eligible() {
                continue;
            }
            let synthesis = synthesize(token, parsed.base, &parsed.variant, metadata);
            if synthesis.is_empty() {
                log::debug!("no rule for {}", parsed);
                continue;
            }

            if let Some(block) = synthesis.keyframes {
                if self.keyframe_keys.insert(keyframes_key(&block)) {
                    delta.keyframes.push(block);
                }
            }
            if let Some(rule) = synthesis.rule {
                if rule.kind == RuleKind::Icon {
                    self.used_icons.insert(parsed.base.to_string());
                }
                delta.push_rule(parsed.variant.breakpoint, &rule);
            }
            self.resolved.insert(token.to_string());
        }

        self.buckets.extend(delta.clone());
        delta
    }

    /// Everything resolved so far, serialized from scratch.
    pub fn stylesheet(&self) -> String {
        self.buckets.to_css()
    }

    pub fn buckets(&self) -> &RuleBuckets {
        &self.buckets
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    /// Base classes of the icons that produced a rule.
    pub fn used_icons(&self) -> &BTreeSet<String> {
        &self.used_icons
    }
}

/// Dedup key for a keyframes block: its animation name, or the trimmed text
/// when no name can be read.
pub fn keyframes_key(block: &str) -> String {
    let trimmed = block.trim();
    let name = trimmed
        .find("@keyframes")
        .map(|idx| &trimmed[idx + "@keyframes".len()..])
        .and_then(|rest| {
            let rest = rest.trim_start();
            let end = rest
                .find(|ch: char| ch == '{' || ch.is_whitespace())
                .unwrap_or(rest.len());
            let name = &rest[..end];
            (!name.is_empty()).then_some(name)
        });
    match name {
        Some(name) => name.to_string(),
        None => trimmed.to_string(),
    }
}

/// The fixed header of every generated stylesheet: the icon font face and
/// the rule that applies it to `if-` classes.
pub fn preamble(font_family: &str, font_url: &str) -> String {
    format!(
        "@font-face {{ font-family: '{family}'; src: url('{url}') format('woff2'); font-style: normal; font-display: block; }}\n\
         [class^=\"if-\"], [class*=\" if-\"] {{ font-family: '{family}' !important; display: inline-block; font-style: normal; font-weight: normal; font-variant: normal; text-transform: none; line-height: 1; -webkit-font-smoothing: antialiased; -moz-osx-font-smoothing: grayscale; }}\n",
        family = font_family,
        url = font_url
    )
}

#[cfg(test)]
mod tests {
    use super::{Aggregator, keyframes_key, preamble};
    use crate::metadata::MetadataStore;
    use lightningcss::stylesheet::{ParserOptions, StyleSheet};
    use pretty_assertions::assert_eq;

    fn store() -> MetadataStore {
        MetadataStore::from_json(
            r#"{"if-home": ".if-home:before { content: '\\e900'; }"}"#,
            r#"{
                "is-pulse": {"class": ".is-pulse{animation:pulse 1s}", "keyframes": "@keyframes pulse{0%{opacity:0}100%{opacity:1}}"},
                "is-pulse-slow": {"class": ".is-pulse-slow{animation:pulse 3s}", "keyframes": "@keyframes pulse{0%{opacity:0}100%{opacity:1}}"}
            }"#,
        )
        .expect("metadata should parse")
    }

    #[test]
    fn serializes_keyframes_default_then_media_blocks() {
        let mut aggregator = Aggregator::new();
        aggregator.absorb(
            &store(),
            ["xl:is-w-[1px]", "sm:is-h-[2px]", "is-pulse", "xs:is-p-[3px]"],
        );

        assert_eq!(
            aggregator.stylesheet(),
            "@keyframes pulse{0%{opacity:0}100%{opacity:1}}\n\
             .is-pulse { animation:pulse 1s }\n\
             @media (min-width: 420px) {\n  .xs\\:is-p-\\[3px\\] { padding: 3px; }\n}\n\
             @media (min-width: 640px) {\n  .sm\\:is-h-\\[2px\\] { height: 2px; }\n}\n\
             @media (min-width: 1280px) {\n  .xl\\:is-w-\\[1px\\] { width: 1px; }\n}\n"
        );
    }

    #[test]
    fn full_stylesheet_parses_as_css() {
        let mut aggregator = Aggregator::new();
        aggregator.absorb(
            &store(),
            [
                "is-w-[50%]",
                "is-w-[calc(100%/3)]",
                "is-opacity-[.5]",
                "md:is-bg-[#fff]",
                "is-fixed-bg-[a\"b.png]",
                "is-gradient-linear-[to_right,_red,_blue]",
                "is-pulse",
                "dark:hover:is-color-[red]",
                "focus:active:if-home",
                "xl:if-home",
            ],
        );
        let mut css = preamble("IconForge", "iconforge.woff2");
        css.push_str(&aggregator.stylesheet());

        let sheet = StyleSheet::parse(
            &css,
            ParserOptions {
                error_recovery: false,
                ..ParserOptions::default()
            },
        )
        .expect("generated css should parse");
        // font-face, icon base rule, keyframes, eight rules, two media blocks
        assert_eq!(sheet.rules.0.len(), 13);
    }

    #[test]
    fn shared_keyframes_are_emitted_once() {
        let mut aggregator = Aggregator::new();
        aggregator.absorb(&store(), ["is-pulse", "hover:is-pulse", "is-pulse-slow"]);

        let css = aggregator.stylesheet();
        assert_eq!(css.matches("@keyframes pulse").count(), 1);
        assert!(css.contains(".is-pulse { animation:pulse 1s }"));
        assert!(css.contains(".hover\\:is-pulse:hover { animation:pulse 1s }"));
        assert!(css.contains(".is-pulse-slow { animation:pulse 3s }"));
        assert_eq!(aggregator.buckets().rule_count(), 3);
    }

    #[test]
    fn second_pass_over_same_tokens_adds_nothing() {
        let metadata = store();
        let tokens = ["if-home", "is-p-[4px]", "md:is-bg-[#fff]", "foo", "bar"];
        let mut aggregator = Aggregator::new();
        let first = aggregator.absorb(&metadata, tokens);
        let css = aggregator.stylesheet();
        let second = aggregator.absorb(&metadata, tokens);

        assert_eq!(first.rule_count(), 3);
        assert!(second.is_empty());
        assert_eq!(aggregator.stylesheet(), css);
        assert_eq!(aggregator.resolved_count(), 3);
    }

    #[test]
    fn scenario_resolves_three_rules_and_ignores_noise() {
        let mut aggregator = Aggregator::new();
        let delta = aggregator.absorb(
            &store(),
            ["if-home", "is-p-[4px]", "md:is-bg-[#fff]", "foo", "bar"],
        );

        assert_eq!(
            delta.default,
            vec![
                ".if-home:before { content: '\\e900'; }".to_string(),
                ".is-p-\\[4px\\] { padding: 4px; }".to_string(),
            ]
        );
        assert_eq!(delta.media.len(), 1);
        assert!(delta.to_css().contains(
            "@media (min-width: 768px) {\n  .md\\:is-bg-\\[\\#fff\\] { background-color: #fff; }\n}"
        ));
        assert!(!delta.to_css().contains("foo"));
        assert!(aggregator.used_icons().contains("if-home"));
    }

    #[test]
    fn delta_contains_only_new_rules() {
        let metadata = store();
        let mut aggregator = Aggregator::new();
        aggregator.absorb(&metadata, ["is-pulse"]);
        let delta = aggregator.absorb(&metadata, ["is-pulse", "hover:is-pulse"]);

        assert!(delta.keyframes.is_empty());
        assert_eq!(
            delta.default,
            vec![".hover\\:is-pulse:hover { animation:pulse 1s }".to_string()]
        );
    }

    #[test]
    fn empty_aggregator_serializes_to_nothing() {
        assert_eq!(Aggregator::new().stylesheet(), "");
    }

    #[test]
    fn keyframes_key_reads_animation_name() {
        assert_eq!(keyframes_key("@keyframes spin{to{}}"), "spin");
        assert_eq!(keyframes_key("  @keyframes  fade {from{}}"), "fade");
        assert_eq!(keyframes_key("not keyframes"), "not keyframes");
    }

    #[test]
    fn preamble_names_font_family() {
        let css = preamble("IconForge", "iconforge.woff2");
        assert!(css.starts_with("@font-face { font-family: 'IconForge'; src: url('iconforge.woff2')"));
        assert!(css.contains("[class^=\"if-\"], [class*=\" if-\"] { font-family: 'IconForge' !important;"));
        assert_eq!(css.lines().count(), 2);
    }
}
