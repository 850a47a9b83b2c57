//! Tiered commentary resolution.
//!
//! A resolution walks `Validating → ProbingLocal → ProbingRemote → Generating
//! → WritingBack → Resolved`, stopping at the first tier that answers, with
//! `Errored` reachable from any step. Tiers are always probed local, remote,
//! generative, each with the derived keys in specificity order. A refresh
//! purges the local keys and starts at `ProbingRemote`.
//!
//! Resolutions are single-flight per most specific key: a second request for
//! a key already in flight joins the running resolution instead of repeating
//! remote or generative work. A lookup also joins a refresh of the same
//! passage that is already running. The walk runs on its own task, so a
//! caller that stops waiting does not stop write-back.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use lectio_core::{
    derive_keys, CacheKey, CommentaryRecord, DerivedKeys, LectioConfig, LectioError, PassageAnchor,
    RemoteError, RemoteRow,
};
use lectio_llm::{CommentaryGenerator, GenerationRequest, HttpCommentaryGenerator};
use lectio_storage::{
    CachedEntry, LmdbLocalCache, LocalCacheStore, PostgrestCommentaryStore, RemoteCommentaryStore,
};
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::error::ResolveError;

// ============================================================================
// STATE MACHINE
// ============================================================================

/// Where a resolution currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionPhase {
    Validating,
    ProbingLocal,
    ProbingRemote,
    Generating,
    WritingBack,
    Resolved,
    Errored,
}

impl ResolutionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResolutionPhase::Resolved | ResolutionPhase::Errored)
    }
}

impl fmt::Display for ResolutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionPhase::Validating => "validating",
            ResolutionPhase::ProbingLocal => "probing_local",
            ResolutionPhase::ProbingRemote => "probing_remote",
            ResolutionPhase::Generating => "generating",
            ResolutionPhase::WritingBack => "writing_back",
            ResolutionPhase::Resolved => "resolved",
            ResolutionPhase::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Receives every phase transition of every resolution.
///
/// Called synchronously from the resolving task; implementations must not
/// block.
pub trait ResolutionObserver: Send + Sync {
    fn on_phase(&self, flight_key: &str, phase: ResolutionPhase);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Lookup,
    Refresh,
}

type SharedOutcome = Shared<BoxFuture<'static, Result<CommentaryRecord, ResolveError>>>;
type FlightTable = Arc<Mutex<HashMap<String, Flight>>>;

struct Flight {
    phase: watch::Receiver<ResolutionPhase>,
    outcome: SharedOutcome,
}

/// Handle on a started (or joined) resolution.
pub struct Resolution {
    key: String,
    joined: bool,
    phase: watch::Receiver<ResolutionPhase>,
    outcome: SharedOutcome,
}

impl Resolution {
    /// The single-flight key this resolution runs under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// True when this handle joined a resolution that was already running.
    pub fn joined(&self) -> bool {
        self.joined
    }

    pub fn phase(&self) -> ResolutionPhase {
        *self.phase.borrow()
    }

    /// A receiver that observes phase changes.
    pub fn phases(&self) -> watch::Receiver<ResolutionPhase> {
        self.phase.clone()
    }

    /// Wait for the resolution to finish.
    pub async fn outcome(self) -> Result<CommentaryRecord, ResolveError> {
        self.outcome.await
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("key", &self.key)
            .field("joined", &self.joined)
            .field("phase", &self.phase())
            .finish()
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

struct Backends {
    local: Arc<dyn LocalCacheStore>,
    remote: Arc<dyn RemoteCommentaryStore>,
    generator: Arc<dyn CommentaryGenerator>,
    observer: Option<Arc<dyn ResolutionObserver>>,
}

/// Resolves passages to commentary through local, remote and generative tiers.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct CommentaryResolver {
    backends: Arc<Backends>,
    in_flight: FlightTable,
}

impl CommentaryResolver {
    pub fn new(
        local: Arc<dyn LocalCacheStore>,
        remote: Arc<dyn RemoteCommentaryStore>,
        generator: Arc<dyn CommentaryGenerator>,
    ) -> Self {
        Self {
            backends: Arc::new(Backends {
                local,
                remote,
                generator,
                observer: None,
            }),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wire LMDB, PostgREST and the HTTP generator from configuration.
    pub fn from_config(config: &LectioConfig) -> Result<Self, LectioError> {
        config.validate()?;
        let local = LmdbLocalCache::from_config(&config.local)?;
        let remote = PostgrestCommentaryStore::from_config(&config.remote)?;
        let generator = HttpCommentaryGenerator::from_config(&config.generator)?;

        tracing::info!(
            cache_path = %config.local.path.display(),
            remote_url = %config.remote.base_url,
            generator_url = %config.generator.endpoint,
            "Commentary resolver configured"
        );

        Ok(Self::new(Arc::new(local), Arc::new(remote), Arc::new(generator)))
    }

    /// Publish every phase transition to `observer`.
    ///
    /// Must be called before the resolver is shared.
    pub fn with_observer(mut self, observer: Arc<dyn ResolutionObserver>) -> Self {
        if let Some(backends) = Arc::get_mut(&mut self.backends) {
            backends.observer = Some(observer);
        }
        self
    }

    /// Resolve a passage, local tier first.
    pub async fn resolve(&self, anchor: &PassageAnchor) -> Result<CommentaryRecord, ResolveError> {
        self.begin(anchor)?.outcome().await
    }

    /// Discard local entries for a passage and resolve it again from the
    /// remote tier down.
    pub async fn refresh(&self, anchor: &PassageAnchor) -> Result<CommentaryRecord, ResolveError> {
        self.begin_refresh(anchor)?.outcome().await
    }

    /// Start (or join) a resolution without waiting for it.
    ///
    /// Validation happens here, before any I/O. Must be called from within a
    /// Tokio runtime.
    pub fn begin(&self, anchor: &PassageAnchor) -> Result<Resolution, ResolveError> {
        self.start(anchor, Mode::Lookup)
    }

    /// Start (or join) a refresh without waiting for it.
    pub fn begin_refresh(&self, anchor: &PassageAnchor) -> Result<Resolution, ResolveError> {
        self.start(anchor, Mode::Refresh)
    }

    /// Number of resolutions currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().map(|t| t.len()).unwrap_or(0)
    }

    fn start(&self, anchor: &PassageAnchor, mode: Mode) -> Result<Resolution, ResolveError> {
        let keys = match derive_keys(anchor) {
            Ok(keys) => keys,
            Err(err) => {
                tracing::debug!(passage = %anchor, error = %err, "Rejected invalid passage");
                if let Some(observer) = &self.backends.observer {
                    observer.on_phase(&anchor.to_string(), ResolutionPhase::Errored);
                }
                return Err(err.into());
            }
        };

        // Anchor-only requests send a different payload than an explicit
        // range with the same anchor, so they never share a flight
        let lookup_key = if anchor.open_range {
            format!("open:{}", keys.most_specific())
        } else {
            keys.most_specific().to_string()
        };
        let refresh_key = format!("refresh:{}", lookup_key);
        let key = match mode {
            Mode::Lookup => lookup_key,
            Mode::Refresh => refresh_key.clone(),
        };

        let mut table = self.in_flight.lock().map_err(|_| ResolveError::Aborted {
            reason: "in-flight table lock poisoned".to_string(),
        })?;

        // A lookup joins a running refresh of the same passage; a refresh
        // never joins a lookup, since it must not be answered from the purge
        let existing = match mode {
            Mode::Lookup => table
                .get_key_value(refresh_key.as_str())
                .or_else(|| table.get_key_value(key.as_str())),
            Mode::Refresh => table.get_key_value(key.as_str()),
        };
        if let Some((joined_key, flight)) = existing {
            tracing::debug!(key = %joined_key, "Joining in-flight resolution");
            return Ok(Resolution {
                key: joined_key.clone(),
                joined: true,
                phase: flight.phase.clone(),
                outcome: flight.outcome.clone(),
            });
        }

        let runtime = Handle::try_current().map_err(|e| ResolveError::Aborted {
            reason: format!("no async runtime: {}", e),
        })?;

        let (phase_tx, phase_rx) = watch::channel(ResolutionPhase::Validating);
        let walk = Walk {
            backends: Arc::clone(&self.backends),
            anchor: anchor.clone(),
            keys,
            key: key.clone(),
            phase: phase_tx,
        };
        let guard = FlightGuard {
            table: Arc::clone(&self.in_flight),
            key: key.clone(),
        };

        let handle = runtime.spawn(async move {
            let _guard = guard;
            walk.run(mode).await
        });
        let outcome: SharedOutcome = async move {
            handle.await.unwrap_or_else(|e| {
                Err(ResolveError::Aborted {
                    reason: e.to_string(),
                })
            })
        }
        .boxed()
        .shared();

        table.insert(
            key.clone(),
            Flight {
                phase: phase_rx.clone(),
                outcome: outcome.clone(),
            },
        );

        Ok(Resolution {
            key,
            joined: false,
            phase: phase_rx,
            outcome,
        })
    }
}

impl fmt::Debug for CommentaryResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommentaryResolver")
            .field("in_flight", &self.in_flight())
            .field("observed", &self.backends.observer.is_some())
            .finish()
    }
}

/// Drops the in-flight entry when the walk ends, even by panic.
struct FlightGuard {
    table: FlightTable,
    key: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Ok(mut table) = self.table.lock() {
            table.remove(&self.key);
        }
    }
}

// ============================================================================
// TIER WALK
// ============================================================================

struct Walk {
    backends: Arc<Backends>,
    anchor: PassageAnchor,
    keys: DerivedKeys,
    key: String,
    phase: watch::Sender<ResolutionPhase>,
}

impl Walk {
    async fn run(self, mode: Mode) -> Result<CommentaryRecord, ResolveError> {
        self.enter(ResolutionPhase::Validating);
        let outcome = self.walk(mode).await;
        match &outcome {
            Ok(record) => {
                tracing::info!(
                    key = %self.key,
                    tier = ?record.source_tier,
                    start_verse = record.resolved_range.start,
                    end_verse = record.resolved_range.end,
                    "Commentary resolved"
                );
                self.enter(ResolutionPhase::Resolved);
            }
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "Commentary resolution failed");
                self.enter(ResolutionPhase::Errored);
            }
        }
        outcome
    }

    async fn walk(&self, mode: Mode) -> Result<CommentaryRecord, ResolveError> {
        match mode {
            Mode::Lookup => {
                self.enter(ResolutionPhase::ProbingLocal);
                if let Some(record) = self.probe_local().await {
                    return Ok(record);
                }
            }
            Mode::Refresh => self.purge_local().await,
        }

        self.enter(ResolutionPhase::ProbingRemote);
        if let Some(row) = self.probe_remote().await? {
            let record = row.into_record();
            self.enter(ResolutionPhase::WritingBack);
            self.store_locally(&record).await;
            return Ok(record);
        }

        self.enter(ResolutionPhase::Generating);
        let request = GenerationRequest::for_anchor(&self.anchor, self.book());
        let record = self
            .backends
            .generator
            .generate(&request)
            .await?
            .into_record()
            .with_anchor_verse(self.anchor.anchor_verse);
        if record.resolved_range != self.anchor.requested_range() {
            tracing::debug!(
                key = %self.key,
                requested_start = self.anchor.start_verse,
                requested_end = self.anchor.end_verse,
                start_verse = record.resolved_range.start,
                end_verse = record.resolved_range.end,
                "Generator corrected the passage range"
            );
        }

        self.enter(ResolutionPhase::WritingBack);
        self.store_remotely(&record).await;
        self.store_locally(&record).await;
        Ok(record)
    }

    fn enter(&self, phase: ResolutionPhase) {
        self.phase.send_replace(phase);
        tracing::debug!(key = %self.key, phase = %phase, "Resolution phase");
        if let Some(observer) = &self.backends.observer {
            observer.on_phase(&self.key, phase);
        }
    }

    /// Canonical book name, as validated.
    fn book(&self) -> &str {
        self.keys.most_specific().book()
    }

    async fn probe_local(&self) -> Option<CommentaryRecord> {
        for key in &self.keys {
            let raw_key = key.to_string();
            match self.read_local(&raw_key, key).await {
                Some(CachedEntry::Commentary(entry)) => {
                    tracing::debug!(key = %raw_key, "Local cache hit");
                    return Some(entry.into_record());
                }
                Some(CachedEntry::Alias { key: target }) => {
                    if let Some(record) = self.follow_alias(&raw_key, &target).await {
                        return Some(record);
                    }
                }
                None => {}
            }
        }
        tracing::debug!(key = %self.key, "Local cache miss");
        None
    }

    /// One hop only; an alias pointing at another alias is a miss.
    async fn follow_alias(&self, alias: &str, target: &str) -> Option<CommentaryRecord> {
        let target_key = match target.parse::<CacheKey>() {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(key = %alias, error = %err, "Ignoring alias with malformed target");
                return None;
            }
        };
        match self.read_local(target, &target_key).await {
            Some(CachedEntry::Commentary(entry)) => {
                tracing::debug!(key = %alias, target = %target, "Local cache hit through alias");
                Some(entry.into_record())
            }
            _ => {
                tracing::debug!(key = %alias, target = %target, "Dangling local alias");
                None
            }
        }
    }

    async fn read_local(&self, raw_key: &str, key: &CacheKey) -> Option<CachedEntry> {
        match self.backends.local.get(raw_key).await {
            Ok(Some(raw)) => CachedEntry::decode(&raw, key),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(key = %raw_key, error = %err, "Local cache read failed, treating as miss");
                None
            }
        }
    }

    async fn write_local(&self, raw_key: &str, entry: &CachedEntry) {
        let raw = match entry.encode() {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key = %raw_key, error = %err, "Failed to encode local cache entry");
                return;
            }
        };
        if let Err(err) = self.backends.local.set(raw_key, &raw).await {
            tracing::warn!(key = %raw_key, error = %err, "Local cache write failed, ignoring");
        }
    }

    async fn remove_local(&self, raw_key: &str) {
        if let Err(err) = self.backends.local.remove(raw_key).await {
            tracing::warn!(key = %raw_key, error = %err, "Local cache remove failed, ignoring");
        }
    }

    /// Remove every derived key, plus the target of any alias among them.
    async fn purge_local(&self) {
        for key in &self.keys {
            let raw_key = key.to_string();
            if let Some(CachedEntry::Alias { key: target }) = self.read_local(&raw_key, key).await {
                self.remove_local(&target).await;
            }
            self.remove_local(&raw_key).await;
        }
        tracing::debug!(key = %self.key, keys = self.keys.len(), "Purged local cache for refresh");
    }

    /// First non-empty result wins; a query error aborts the walk.
    async fn probe_remote(&self) -> Result<Option<RemoteRow>, RemoteError> {
        let remote = &self.backends.remote;
        for key in &self.keys {
            let row = match key {
                // The service picked the range, so only the anchor identifies the row
                CacheKey::Anchored {
                    book,
                    chapter,
                    anchor,
                    ..
                } if self.anchor.open_range => remote.find_by_anchor_verse(book, *chapter, *anchor).await?,
                _ => remote.find(key).await?,
            };
            if let Some(row) = row {
                tracing::debug!(key = %key, "Remote store hit");
                return Ok(Some(row));
            }
        }
        tracing::debug!(key = %self.key, "Remote store miss");
        Ok(None)
    }

    /// Insert the generated record with its corrected range.
    async fn store_remotely(&self, record: &CommentaryRecord) {
        let row = RemoteRow {
            book: self.book().to_string(),
            chapter: self.anchor.chapter,
            start_verse: record.resolved_range.start,
            end_verse: record.resolved_range.end,
            // Range-only lookups match `anchor_verse IS NULL`
            anchor_verse: self.anchor.anchor_verse,
            commentary: record.text.clone(),
            created_at: Utc::now(),
        };
        match self.backends.remote.insert(&row).await {
            Ok(()) => tracing::debug!(key = %self.key, "Stored generated commentary remotely"),
            Err(RemoteError::Duplicate { reason }) => {
                tracing::info!(key = %self.key, reason = %reason, "Remote already holds this commentary")
            }
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "Remote insert failed, continuing with local copy")
            }
        }
    }

    /// Write under the corrected most specific key, and alias the requested
    /// key to it when they differ.
    async fn store_locally(&self, record: &CommentaryRecord) {
        let corrected = CacheKey::most_specific(
            self.book(),
            self.anchor.chapter,
            record.resolved_range,
            self.anchor.anchor_verse,
        );
        let corrected_raw = corrected.to_string();
        self.write_local(&corrected_raw, &CachedEntry::commentary(record))
            .await;

        let requested = self.keys.most_specific();
        if *requested != corrected {
            self.write_local(&requested.to_string(), &CachedEntry::alias(&corrected))
                .await;
        }
        tracing::debug!(key = %corrected_raw, "Wrote commentary to local cache");
    }
}
