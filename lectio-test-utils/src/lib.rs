//! Lectio Test Utilities
//!
//! Centralized test infrastructure for the Lectio workspace:
//! - Mock generator with call counting and a release gate
//! - Store wrappers that count calls and inject failures
//! - Proptest generators for passages and ranges
//! - Test fixtures for common scenarios
//! - Custom assertions for resolved records

pub use lectio_core::{
    books, derive_keys, find_book, AnchorError, Book, CacheError, CacheKey, CommentaryRecord,
    GenerationError, PassageAnchor, RandomVerse, RemoteError, RemoteRow, SourceTier, VerseRange,
};
pub use lectio_llm::{CommentaryGenerator, GeneratedCommentary, GenerationRequest};
pub use lectio_storage::{
    CacheStats, InMemoryLocalCache, InMemoryRemoteStore, LocalCacheStore, RemoteCommentaryStore,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

// ============================================================================
// MOCK GENERATOR
// ============================================================================

type Responder =
    dyn Fn(&GenerationRequest) -> Result<GeneratedCommentary, GenerationError> + Send + Sync;

/// Scripted commentary generator.
///
/// Records every request it receives. When gated, each call blocks until the
/// test releases a permit, which makes interleavings deterministic.
pub struct MockCommentaryGenerator {
    responder: Box<Responder>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
    gate: Option<Arc<Semaphore>>,
    started: Arc<Notify>,
}

impl MockCommentaryGenerator {
    /// Respond with `f(request)`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Result<GeneratedCommentary, GenerationError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            responder: Box::new(f),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            gate: None,
            started: Arc::new(Notify::new()),
        }
    }

    /// Comment on exactly the requested range.
    pub fn echo() -> Self {
        Self::from_fn(|request| {
            let range = request.fallback_range();
            Ok(GeneratedCommentary {
                commentary: format!(
                    "Commentary on {} {}:{}-{}",
                    request.book(),
                    request.chapter(),
                    range.start,
                    range.end
                ),
                range,
                anchor_verse: request.anchor_verse(),
                random_verse: None,
            })
        })
    }

    /// Always report `start..=end` as the commented range.
    pub fn with_range(text: impl Into<String>, start: u32, end: u32) -> Self {
        let text = text.into();
        Self::from_fn(move |request| {
            Ok(GeneratedCommentary {
                commentary: text.clone(),
                range: VerseRange::new(start, end),
                anchor_verse: request.anchor_verse(),
                random_verse: None,
            })
        })
    }

    /// Fail every call with `error`.
    pub fn failing(error: GenerationError) -> Self {
        Self::from_fn(move |_| Err(error.clone()))
    }

    /// Hold every call until [`release`](Self::release) grants a permit.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `n` gated calls complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Wait until a call has entered `generate`.
    pub async fn wait_started(&self) {
        self.wait_for_calls(1).await;
    }

    /// Wait until at least `n` calls have entered `generate`.
    pub async fn wait_for_calls(&self, n: usize) {
        // Each call stores a notification, so none is lost between the check and the wait
        while self.call_count() < n {
            self.started.notified().await;
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommentaryGenerator for MockCommentaryGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedCommentary, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|e| GenerationError::Transport {
                reason: format!("gate closed: {}", e),
            })?;
            permit.forget();
        }

        (self.responder)(request)
    }
}

// ============================================================================
// STORE WRAPPERS
// ============================================================================

/// Counters for calls made against a wrapped store.
#[derive(Debug, Default)]
pub struct CallCounts {
    reads: AtomicUsize,
    writes: AtomicUsize,
    removes: AtomicUsize,
}

impl CallCounts {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.reads() + self.writes() + self.removes()
    }
}

/// In-memory local cache that counts calls and can be told to fail.
#[derive(Debug, Default)]
pub struct MockLocalCache {
    inner: InMemoryLocalCache,
    counts: CallCounts,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MockLocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation fails.
    pub fn broken() -> Self {
        let cache = Self::default();
        cache.fail_reads(true);
        cache.fail_writes(true);
        cache
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryLocalCache {
        &self.inner
    }

    pub fn counts(&self) -> &CallCounts {
        &self.counts
    }
}

#[async_trait]
impl LocalCacheStore for MockLocalCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.counts.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Read {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.counts.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Write {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.counts.removes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Write {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.remove(key).await
    }

    async fn stats(&self) -> CacheStats {
        self.inner.stats().await
    }
}

/// In-memory remote store that counts calls and can be told to fail.
#[derive(Debug, Default)]
pub struct MockRemoteStore {
    inner: InMemoryRemoteStore,
    counts: CallCounts,
    fail_queries: AtomicBool,
    fail_inserts: AtomicBool,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<RemoteRow>) -> Self {
        Self {
            inner: InMemoryRemoteStore::with_rows(rows),
            ..Self::default()
        }
    }

    pub fn with_unique_constraint() -> Self {
        Self {
            inner: InMemoryRemoteStore::with_unique_constraint(),
            ..Self::default()
        }
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryRemoteStore {
        &self.inner
    }

    pub fn counts(&self) -> &CallCounts {
        &self.counts
    }

    pub fn rows(&self) -> Vec<RemoteRow> {
        self.inner.rows()
    }

    fn query(&self) -> Result<(), RemoteError> {
        self.counts.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(RemoteError::Query {
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCommentaryStore for MockRemoteStore {
    async fn find_by_anchor_key(
        &self,
        book: &str,
        chapter: u32,
        range: VerseRange,
        anchor: u32,
    ) -> Result<Option<RemoteRow>, RemoteError> {
        self.query()?;
        self.inner.find_by_anchor_key(book, chapter, range, anchor).await
    }

    async fn find_by_range_key(
        &self,
        book: &str,
        chapter: u32,
        range: VerseRange,
    ) -> Result<Option<RemoteRow>, RemoteError> {
        self.query()?;
        self.inner.find_by_range_key(book, chapter, range).await
    }

    async fn find_by_single_verse_key(
        &self,
        book: &str,
        chapter: u32,
        verse: u32,
    ) -> Result<Option<RemoteRow>, RemoteError> {
        self.query()?;
        self.inner.find_by_single_verse_key(book, chapter, verse).await
    }

    async fn find_by_anchor_verse(
        &self,
        book: &str,
        chapter: u32,
        anchor: u32,
    ) -> Result<Option<RemoteRow>, RemoteError> {
        self.query()?;
        self.inner.find_by_anchor_verse(book, chapter, anchor).await
    }

    async fn insert(&self, row: &RemoteRow) -> Result<(), RemoteError> {
        self.counts.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(RemoteError::Insert {
                reason: "injected failure".to_string(),
            });
        }
        self.inner.insert(row).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies producing canon-valid passages.

    use super::*;
    use proptest::prelude::*;

    /// Any book in the canon.
    pub fn arb_book() -> impl Strategy<Value = &'static Book> {
        proptest::sample::select(books().iter().collect::<Vec<_>>())
    }

    /// A (book, chapter) pair that exists.
    pub fn arb_chapter() -> impl Strategy<Value = (&'static Book, u32)> {
        arb_book().prop_flat_map(|book| (Just(book), 1..=book.chapters()))
    }

    /// A range inside an existing chapter.
    pub fn arb_verse_range(max_verse: u32) -> impl Strategy<Value = VerseRange> {
        (1..=max_verse)
            .prop_flat_map(move |start| (Just(start), start..=max_verse))
            .prop_map(|(start, end)| VerseRange::new(start, end))
    }

    /// A valid explicit-range passage, with or without an anchor verse.
    pub fn arb_range_anchor() -> impl Strategy<Value = PassageAnchor> {
        arb_chapter().prop_flat_map(|(book, chapter)| {
            let verses = book.verses_in(chapter).unwrap_or(1);
            (arb_verse_range(verses), proptest::option::of(1..=verses)).prop_map(
                move |(range, anchor)| {
                    let passage = PassageAnchor::range(book.name(), chapter, range.start, range.end);
                    match anchor {
                        Some(verse) => passage.with_anchor(verse),
                        None => passage,
                    }
                },
            )
        })
    }

    /// A valid anchor-only ("surprise me") passage.
    pub fn arb_open_anchor() -> impl Strategy<Value = PassageAnchor> {
        arb_chapter().prop_flat_map(|(book, chapter)| {
            let verses = book.verses_in(chapter).unwrap_or(1);
            (1..=verses).prop_map(move |verse| PassageAnchor::anchor_only(book.name(), chapter, verse))
        })
    }

    /// Any valid passage.
    pub fn arb_valid_anchor() -> impl Strategy<Value = PassageAnchor> {
        prop_oneof![3 => arb_range_anchor(), 1 => arb_open_anchor()]
    }

    /// A passage that fails validation.
    pub fn arb_invalid_anchor() -> impl Strategy<Value = PassageAnchor> {
        prop_oneof![
            (1u32..=50).prop_map(|chapter| PassageAnchor::range("", chapter, 1, 1)),
            (2u32..=30, 1u32..=29).prop_filter_map("inverted", |(start, end)| {
                (end < start).then(|| PassageAnchor::range("Genesis", 1, start, end))
            }),
            Just(PassageAnchor::range("Genesis", 0, 1, 1)),
            Just(PassageAnchor::range("Genesis", 1, 0, 2)),
            Just(PassageAnchor::range("Genesis", 51, 1, 1)),
            Just(PassageAnchor::range("Hezekiah", 1, 1, 1)),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::Utc;

    /// A remote row created now.
    pub fn remote_row(
        book: &str,
        chapter: u32,
        start: u32,
        end: u32,
        anchor: Option<u32>,
        commentary: &str,
    ) -> RemoteRow {
        RemoteRow {
            book: book.to_string(),
            chapter,
            start_verse: start,
            end_verse: end,
            anchor_verse: anchor,
            commentary: commentary.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Genesis 1:1, the canonical single-verse request.
    pub fn genesis_1_1() -> PassageAnchor {
        PassageAnchor::verse("Genesis", 1, 1)
    }

    /// John 3:16-18 centred on verse 17.
    pub fn john_3_16_anchored() -> PassageAnchor {
        PassageAnchor::range("John", 3, 16, 18).with_anchor(17)
    }

    /// Anchor-only Genesis 1:6.
    pub fn genesis_1_6_open() -> PassageAnchor {
        PassageAnchor::anchor_only("Genesis", 1, 6)
    }

    /// Psalm 23, the whole chapter.
    pub fn psalm_23() -> PassageAnchor {
        PassageAnchor::range("Psalms", 23, 1, 6)
    }

    /// Shared handles for the three tiers.
    pub struct Tiers {
        pub local: Arc<MockLocalCache>,
        pub remote: Arc<MockRemoteStore>,
        pub generator: Arc<MockCommentaryGenerator>,
    }

    impl Tiers {
        pub fn new(generator: MockCommentaryGenerator) -> Self {
            Self {
                local: Arc::new(MockLocalCache::new()),
                remote: Arc::new(MockRemoteStore::new()),
                generator: Arc::new(generator),
            }
        }

        pub fn with_remote(mut self, remote: MockRemoteStore) -> Self {
            self.remote = Arc::new(remote);
            self
        }

        /// Number of remote queries plus generator calls made so far.
        pub fn network_calls(&self) -> usize {
            self.remote.counts().total() + self.generator.call_count()
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for resolved commentary.

    use super::*;

    #[track_caller]
    pub fn assert_tier(record: &CommentaryRecord, tier: SourceTier) {
        assert_eq!(
            record.source_tier, tier,
            "Expected record from {:?}, got {:?}",
            tier, record.source_tier
        );
    }

    #[track_caller]
    pub fn assert_resolved_range(record: &CommentaryRecord, start: u32, end: u32) {
        assert_eq!(
            record.resolved_range,
            VerseRange::new(start, end),
            "Unexpected resolved range"
        );
    }

    /// Assert the local cache holds a value under `key`.
    #[track_caller]
    pub fn assert_cached(cache: &InMemoryLocalCache, key: &str) {
        assert!(
            cache.contains(key),
            "Expected local cache key {}, have {:?}",
            key,
            cache.keys()
        );
    }

    /// Assert no I/O reached either store or the generator.
    #[track_caller]
    pub fn assert_no_io(tiers: &fixtures::Tiers) {
        assert_eq!(tiers.local.counts().total(), 0, "local cache was touched");
        assert_eq!(tiers.network_calls(), 0, "network tier was touched");
    }
}

// ============================================================================
// TESTS
// ============================================================================
