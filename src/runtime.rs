//! The in-page variant of the generator, without a DOM.
//!
//! A host (a browser binding, a test) reports class attribute changes and
//! drives time explicitly: [`Session::tick`] on its timer and
//! [`Session::on_frame`] from its animation-frame callback. Rules are never
//! removed once injected; each cycle only appends what is new.

use crate::aggregate::{Aggregator, preamble};
use crate::metadata::MetadataStore;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Default debounce window, about one display frame.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(16);

/// Largest serialized payload the session cache accepts.
pub const CACHE_CEILING_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// A node whose `class` attribute was added or changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassChange {
    pub node: NodeId,
    pub classes: String,
}

/// Collects change notifications and releases them as one batch once the
/// window since the first pending notification has elapsed.
#[derive(Debug, Clone)]
pub struct MutationBatcher {
    window: Duration,
    pending: Vec<ClassChange>,
    first_at: Option<Instant>,
}

impl MutationBatcher {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            first_at: None,
        }
    }

    /// Queues `change`. A node already pending keeps its position and takes
    /// the newer attribute value.
    pub fn push(&mut self, change: ClassChange, now: Instant) {
        if self.first_at.is_none() {
            self.first_at = Some(now);
        }
        match self.pending.iter_mut().find(|queued| queued.node == change.node) {
            Some(queued) => queued.classes = change.classes,
            None => self.pending.push(change),
        }
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        self.first_at
            .is_some_and(|first| now.saturating_duration_since(first) >= self.window)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The batch in arrival order, or `None` while the window is still open.
    pub fn drain(&mut self, now: Instant) -> Option<Vec<ClassChange>> {
        if !self.is_ready(now) {
            return None;
        }
        self.first_at = None;
        Some(std::mem::take(&mut self.pending))
    }
}

impl Default for MutationBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_WINDOW)
    }
}

/// The dedicated stylesheet element, placed right after the base stylesheet.
pub trait StylesheetSink {
    fn append(&mut self, css: &str);
}

impl StylesheetSink for String {
    fn append(&mut self, css: &str) {
        self.push_str(css);
    }
}

/// Buffers stylesheet text until the next animation frame so a burst of
/// synthesis results costs a single style recalculation.
#[derive(Debug, Clone, Default)]
pub struct FrameScheduler {
    pending: String,
    frame_requested: bool,
}

impl FrameScheduler {
    /// Queues `css`. Returns `true` when the caller must request a frame.
    pub fn queue(&mut self, css: &str) -> bool {
        if css.is_empty() {
            return false;
        }
        self.pending.push_str(css);
        if self.frame_requested {
            return false;
        }
        self.frame_requested = true;
        true
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn flush(&mut self, sink: &mut dyn StylesheetSink) {
        self.frame_requested = false;
        if self.pending.is_empty() {
            return;
        }
        sink.append(&self.pending);
        self.pending.clear();
    }
}

/// One page's generator state: metadata, resolved rules, pending work.
#[derive(Debug)]
pub struct Session<S: StylesheetSink> {
    metadata: MetadataStore,
    aggregator: Aggregator,
    batcher: MutationBatcher,
    frames: FrameScheduler,
    sink: S,
}

impl<S: StylesheetSink> Session<S> {
    /// Starts a session, writing the font preamble into `sink` immediately.
    pub fn new(metadata: MetadataStore, mut sink: S, font_family: &str, font_url: &str) -> Self {
        sink.append(&preamble(font_family, font_url));
        Self {
            metadata,
            aggregator: Aggregator::new(),
            batcher: MutationBatcher::default(),
            frames: FrameScheduler::default(),
            sink,
        }
    }

    pub fn with_batch_window(mut self, window: Duration) -> Self {
        self.batcher = MutationBatcher::new(window);
        self
    }

    /// Scans class attributes directly, bypassing the batcher. Used for the
    /// initial document scan. Returns `true` when a frame must be requested.
    pub fn scan<I, A>(&mut self, class_attrs: I) -> bool
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        let mut tokens = Vec::new();
        for attr in class_attrs {
            tokens.extend(attr.as_ref().split_whitespace().map(str::to_string));
        }
        let delta = self.aggregator.absorb(&self.metadata, &tokens);
        self.frames.queue(&delta.to_css())
    }

    pub fn observe(&mut self, change: ClassChange, now: Instant) {
        self.batcher.push(change, now);
    }

    /// Processes the pending batch if its window has elapsed. Returns `true`
    /// when a frame must be requested.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(batch) = self.batcher.drain(now) else {
            return false;
        };
        self.scan(batch.iter().map(|change| change.classes.as_str()))
    }

    pub fn on_frame(&mut self) {
        self.frames.flush(&mut self.sink);
    }

    /// Swaps in freshly loaded metadata. Already injected rules stay.
    pub fn reload_metadata(&mut self, metadata: MetadataStore) {
        self.metadata = metadata;
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaDocument {
    Icons,
    Styles,
}

impl MetaDocument {
    pub fn cache_key(self) -> &'static str {
        match self {
            MetaDocument::Icons => "iconforge_icons",
            MetaDocument::Styles => "iconforge_styles",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub message: String,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FetchError {}

/// Where metadata documents come from, usually a CDN.
pub trait MetadataSource {
    fn fetch(&mut self, document: MetaDocument) -> Result<String, FetchError>;
}

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), doubling each time.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry))
    }
}

pub fn fetch_with_retry(
    source: &mut dyn MetadataSource,
    document: MetaDocument,
    policy: RetryPolicy,
    sleeper: &mut dyn Sleeper,
) -> Result<String, FetchError> {
    let attempts = policy.attempts.max(1);
    let mut last_error = None;
    for attempt in 0..attempts {
        match source.fetch(document) {
            Ok(body) => return Ok(body),
            Err(err) => {
                log::warn!(
                    "fetching {} failed (attempt {}/{}): {}",
                    document.cache_key(),
                    attempt + 1,
                    attempts,
                    err
                );
                last_error = Some(err);
            }
        }
        if attempt + 1 < attempts {
            sleeper.sleep(policy.backoff(attempt));
        }
    }
    Err(last_error.unwrap_or_else(|| FetchError {
        message: format!("no attempts made for {}", document.cache_key()),
    }))
}

/// Page-session storage with a hard per-entry size ceiling.
#[derive(Debug, Clone)]
pub struct SessionCache {
    entries: HashMap<String, String>,
    ceiling: usize,
}

impl SessionCache {
    pub fn new(ceiling: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ceiling,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Stores `value` unless it exceeds the ceiling. Returns whether it was
    /// stored.
    pub fn put(&mut self, key: &str, value: &str) -> bool {
        if value.len() > self.ceiling {
            log::warn!("skipping cache write for {}: {} bytes", key, value.len());
            return false;
        }
        self.entries.insert(key.to_string(), value.to_string());
        true
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(CACHE_CEILING_BYTES)
    }
}

/// Loads metadata for a page session: from `cache` when both documents are
/// there, otherwise from `source` with retries. Any failure yields empty
/// mappings so the page keeps working without generated rules.
pub fn load_session_metadata(
    cache: &mut SessionCache,
    source: &mut dyn MetadataSource,
    policy: RetryPolicy,
    sleeper: &mut dyn Sleeper,
) -> MetadataStore {
    let cached = (
        cache.get(MetaDocument::Icons.cache_key()),
        cache.get(MetaDocument::Styles.cache_key()),
    );
    if let (Some(icons), Some(styles)) = cached {
        match MetadataStore::from_json(icons, styles) {
            Ok(store) => return store,
            Err(err) => log::warn!("ignoring cached metadata: {}", err),
        }
    }

    let fetched = fetch_with_retry(source, MetaDocument::Icons, policy, sleeper).and_then(
        |icons| {
            fetch_with_retry(source, MetaDocument::Styles, policy, sleeper)
                .map(|styles| (icons, styles))
        },
    );
    let (icons, styles) = match fetched {
        Ok(documents) => documents,
        Err(err) => {
            log::warn!("Failed to load meta data: {}", err);
            return MetadataStore::empty();
        }
    };

    match MetadataStore::from_json(&icons, &styles) {
        Ok(store) => {
            cache.put(MetaDocument::Icons.cache_key(), &icons);
            cache.put(MetaDocument::Styles.cache_key(), &styles);
            store
        }
        Err(err) => {
            log::warn!("Failed to load meta data: {}", err);
            MetadataStore::empty()
        }
    }
}
