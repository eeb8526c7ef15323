use std::fmt;

/// Responsive breakpoints, in the ascending order their media blocks are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Breakpoint {
    Xs,
    Sm,
    Md,
    Lg,
    Xl,
}

impl Breakpoint {
    pub const ALL: [Breakpoint; 5] = [
        Breakpoint::Xs,
        Breakpoint::Sm,
        Breakpoint::Md,
        Breakpoint::Lg,
        Breakpoint::Xl,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Breakpoint::Xs => "xs:",
            Breakpoint::Sm => "sm:",
            Breakpoint::Md => "md:",
            Breakpoint::Lg => "lg:",
            Breakpoint::Xl => "xl:",
        }
    }

    pub fn predicate(self) -> &'static str {
        match self {
            Breakpoint::Xs => "(min-width: 420px)",
            Breakpoint::Sm => "(min-width: 640px)",
            Breakpoint::Md => "(min-width: 768px)",
            Breakpoint::Lg => "(min-width: 1024px)",
            Breakpoint::Xl => "(min-width: 1280px)",
        }
    }

    pub fn media_query(self) -> String {
        format!("@media {}", self.predicate())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PseudoState {
    Hover,
    Focus,
    Active,
    Disabled,
}

impl PseudoState {
    pub const ALL: [PseudoState; 4] = [
        PseudoState::Hover,
        PseudoState::Focus,
        PseudoState::Active,
        PseudoState::Disabled,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            PseudoState::Hover => "hover:",
            PseudoState::Focus => "focus:",
            PseudoState::Active => "active:",
            PseudoState::Disabled => "disabled:",
        }
    }

    pub fn selector(self) -> &'static str {
        match self {
            PseudoState::Hover => ":hover",
            PseudoState::Focus => ":focus",
            PseudoState::Active => ":active",
            PseudoState::Disabled => ":disabled",
        }
    }
}

pub const DARK_PREFIX: &str = "dark:";
pub const DARK_ANCESTOR: &str = ".dark ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VariantPrefix {
    Breakpoint(Breakpoint),
    Pseudo(PseudoState),
    Dark,
}

impl VariantPrefix {
    fn literal(self) -> &'static str {
        match self {
            VariantPrefix::Breakpoint(bp) => bp.prefix(),
            VariantPrefix::Pseudo(state) => state.prefix(),
            VariantPrefix::Dark => DARK_PREFIX,
        }
    }
}

// Scan priority: breakpoints, then pseudo-states, then dark.
const PREFIX_TABLE: [VariantPrefix; 10] = [
    VariantPrefix::Breakpoint(Breakpoint::Xs),
    VariantPrefix::Breakpoint(Breakpoint::Sm),
    VariantPrefix::Breakpoint(Breakpoint::Md),
    VariantPrefix::Breakpoint(Breakpoint::Lg),
    VariantPrefix::Breakpoint(Breakpoint::Xl),
    VariantPrefix::Pseudo(PseudoState::Hover),
    VariantPrefix::Pseudo(PseudoState::Focus),
    VariantPrefix::Pseudo(PseudoState::Active),
    VariantPrefix::Pseudo(PseudoState::Disabled),
    VariantPrefix::Dark,
];

/// How a token's rule is scoped: at most one media query, any set of
/// pseudo-classes, and an optional `.dark ` ancestor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VariantDescriptor {
    pub breakpoint: Option<Breakpoint>,
    pub pseudo_states: Vec<PseudoState>,
    pub dark: bool,
}

impl VariantDescriptor {
    pub fn is_empty(&self) -> bool {
        self.breakpoint.is_none() && self.pseudo_states.is_empty() && !self.dark
    }

    /// `@media (min-width: ...)`, or `None` for unscoped rules.
    pub fn media_query(&self) -> Option<String> {
        self.breakpoint.map(Breakpoint::media_query)
    }

    pub fn pseudo_selectors(&self) -> String {
        self.pseudo_states
            .iter()
            .map(|state| state.selector())
            .collect()
    }

    pub fn dark_prefix(&self) -> &'static str {
        if self.dark { DARK_ANCESTOR } else { "" }
    }

    fn add_pseudo(&mut self, state: PseudoState) {
        if let Err(idx) = self.pseudo_states.binary_search(&state) {
            self.pseudo_states.insert(idx, state);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken<'a> {
    pub base: &'a str,
    pub variant: VariantDescriptor,
}

impl ParsedToken<'_> {
    /// Only `if-` and `is-` bases are candidates for rule synthesis.
    pub fn is_eligible(&self) -> bool {
        is_eligible_base(self.base)
    }
}

impl fmt::Display for ParsedToken<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(bp) = self.variant.breakpoint {
            f.write_str(bp.prefix())?;
        }
        if self.variant.dark {
            f.write_str(DARK_PREFIX)?;
        }
        for state in &self.variant.pseudo_states {
            f.write_str(state.prefix())?;
        }
        f.write_str(self.base)
    }
}

pub fn is_eligible_base(base: &str) -> bool {
    base.starts_with("if-") || base.starts_with("is-")
}

/// Strips every recognized variant prefix from the front of `token`, in any
/// order and any number of times.
///
/// Each pass walks the prefix table in priority order and restarts from the
/// top after a match. When several breakpoints are stacked the last one
/// stripped is kept. Pseudo-states are kept in table order without
/// duplicates, so `hover:focus:` and `focus:hover:` describe the same rule.
pub fn parse_variants(token: &str) -> ParsedToken<'_> {
    let mut rest = token;
    let mut variant = VariantDescriptor::default();

    'scan: loop {
        for prefix in PREFIX_TABLE {
            if let Some(remainder) = rest.strip_prefix(prefix.literal()) {
                match prefix {
                    VariantPrefix::Breakpoint(bp) => variant.breakpoint = Some(bp),
                    VariantPrefix::Pseudo(state) => variant.add_pseudo(state),
                    VariantPrefix::Dark => variant.dark = true,
                }
                rest = remainder;
                continue 'scan;
            }
        }
        break;
    }

    ParsedToken {
        base: rest,
        variant,
    }
}

/// The base class of `token`, with all variant prefixes removed.
pub fn strip_variants(token: &str) -> &str {
    parse_variants(token).base
}
