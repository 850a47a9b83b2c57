//! Scenario Tests for Tiered Commentary Resolution
//!
//! Each test wires a resolver against in-memory tiers (or LMDB) and checks
//! which tiers were touched, what was written back, and what the caller saw.

use std::sync::Arc;

use lectio_core::{GenerationError, PassageAnchor, RemoteError, SourceTier, VerseRange};
use lectio_llm::GenerateResponse;
use lectio_resolver::{CommentaryResolver, ResolveError};
use lectio_storage::{InMemoryRemoteStore, LmdbLocalCache, LocalCacheStore};
use lectio_test_utils::assertions::{assert_cached, assert_resolved_range, assert_tier};
use lectio_test_utils::fixtures::{self, Tiers};
use lectio_test_utils::{MockCommentaryGenerator, MockLocalCache, MockRemoteStore};
use tempfile::TempDir;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn resolver(tiers: &Tiers) -> CommentaryResolver {
    CommentaryResolver::new(
        tiers.local.clone(),
        tiers.remote.clone(),
        tiers.generator.clone(),
    )
}

/// A second client: its own local cache, the same remote and generator.
fn second_client(tiers: &Tiers) -> (CommentaryResolver, Arc<MockLocalCache>) {
    let local = Arc::new(MockLocalCache::new());
    let resolver = CommentaryResolver::new(
        local.clone(),
        tiers.remote.clone(),
        tiers.generator.clone(),
    );
    (resolver, local)
}

// ============================================================================
// TIER ORDER
// ============================================================================

#[tokio::test]
async fn test_genesis_range_correction_round_trip() {
    let tiers = Tiers::new(MockCommentaryGenerator::with_range("In the beginning.", 1, 3));
    let resolver = resolver(&tiers);

    let first = resolver.resolve(&fixtures::genesis_1_1()).await.expect("first resolve");
    assert_tier(&first, SourceTier::Generated);
    assert_resolved_range(&first, 1, 3);
    assert_cached(tiers.local.inner(), "commentary:Genesis:1:1-3");

    let network_before = tiers.network_calls();
    let second = resolver.resolve(&fixtures::genesis_1_1()).await.expect("second resolve");
    assert_tier(&second, SourceTier::Local);
    assert_resolved_range(&second, 1, 3);
    assert_eq!(second.text, first.text);
    assert_eq!(tiers.network_calls(), network_before, "second resolve touched the network");
    assert_eq!(tiers.generator.call_count(), 1);
}

#[tokio::test]
async fn test_local_hit_skips_remote_and_generator() {
    let tiers = Tiers::new(MockCommentaryGenerator::echo());
    tiers
        .local
        .inner()
        .set("commentary:John:3:16-18:17", "So loved.")
        .await
        .expect("seed");

    let record = resolver(&tiers)
        .resolve(&fixtures::john_3_16_anchored())
        .await
        .expect("resolve");

    assert_tier(&record, SourceTier::Local);
    assert_eq!(record.text, "So loved.");
    assert_eq!(record.anchor_verse, Some(17));
    assert_eq!(tiers.network_calls(), 0);
}

#[tokio::test]
async fn test_less_specific_local_key_still_hits() {
    let tiers = Tiers::new(MockCommentaryGenerator::echo());
    tiers
        .local
        .inner()
        .set("commentary:Genesis:1:1", "Legacy single verse.")
        .await
        .expect("seed");

    let record = resolver(&tiers)
        .resolve(&fixtures::genesis_1_1())
        .await
        .expect("resolve");

    assert_tier(&record, SourceTier::Local);
    assert_eq!(record.text, "Legacy single verse.");
    assert_resolved_range(&record, 1, 1);
    assert_eq!(tiers.local.counts().reads(), 2);
}

#[tokio::test]
async fn test_remote_probed_in_specificity_order() {
    let tiers = Tiers::new(MockCommentaryGenerator::echo()).with_remote(MockRemoteStore::with_rows(
        vec![
            fixtures::remote_row("John", 3, 16, 18, None, "range row"),
            fixtures::remote_row("John", 3, 16, 18, Some(17), "anchored row"),
        ],
    ));

    let record = resolver(&tiers)
        .resolve(&fixtures::john_3_16_anchored())
        .await
        .expect("resolve");

    assert_tier(&record, SourceTier::Remote);
    assert_eq!(record.text, "anchored row");
    assert_eq!(tiers.remote.counts().reads(), 1, "first hit must short-circuit");
    assert_eq!(tiers.generator.call_count(), 0);
}

#[tokio::test]
async fn test_anchored_row_never_answers_range_query() {
    let tiers = Tiers::new(MockCommentaryGenerator::echo()).with_remote(MockRemoteStore::with_rows(
        vec![fixtures::remote_row("Psalms", 23, 1, 6, Some(1), "anchored only")],
    ));

    let record = resolver(&tiers)
        .resolve(&fixtures::psalm_23())
        .await
        .expect("resolve");

    assert_tier(&record, SourceTier::Generated);
    assert_eq!(tiers.generator.call_count(), 1);
}

// ============================================================================
// WRITE-BACK
// ============================================================================

#[tokio::test]
async fn test_open_anchor_range_correction() {
    let tiers = Tiers::new(MockCommentaryGenerator::with_range("Waters divided.", 5, 7));
    let record = resolver(&tiers)
        .resolve(&fixtures::genesis_1_6_open())
        .await
        .expect("resolve");

    assert_resolved_range(&record, 5, 7);
    assert_eq!(record.anchor_verse, Some(6));

    let rows = tiers.remote.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].start_verse, rows[0].end_verse), (5, 7));
    assert_eq!(rows[0].anchor_verse, Some(6));
    assert_eq!(rows[0].book, "Genesis");

    assert_cached(tiers.local.inner(), "commentary:Genesis:1:5-7:6");
    assert_cached(tiers.local.inner(), "commentary:Genesis:1:6-6:6");

    let requests = tiers.generator.requests();
    assert_eq!(
        requests,
        vec![lectio_llm::GenerationRequest::AnchorOnly {
            book: "Genesis".to_string(),
            chapter: 1,
            anchor_verse: 6,
        }]
    );
}

#[tokio::test]
async fn test_open_anchor_found_remotely_on_fresh_device() {
    let tiers = Tiers::new(MockCommentaryGenerator::with_range("Waters divided.", 5, 7));
    resolver(&tiers)
        .resolve(&fixtures::genesis_1_6_open())
        .await
        .expect("first device");

    let (other, other_local) = second_client(&tiers);
    let record = other
        .resolve(&fixtures::genesis_1_6_open())
        .await
        .expect("second device");

    assert_tier(&record, SourceTier::Remote);
    assert_resolved_range(&record, 5, 7);
    assert_eq!(tiers.generator.call_count(), 1);
    assert_cached(other_local.inner(), "commentary:Genesis:1:5-7:6");
}

#[tokio::test]
async fn test_remote_insert_failure_still_resolves() {
    let tiers = Tiers::new(MockCommentaryGenerator::echo());
    tiers.remote.fail_inserts(true);

    let record = resolver(&tiers)
        .resolve(&fixtures::psalm_23())
        .await
        .expect("resolve");

    assert_tier(&record, SourceTier::Generated);
    assert!(tiers.remote.rows().is_empty());
    assert_cached(tiers.local.inner(), "commentary:Psalms:23:1-6");
}

#[tokio::test]
async fn test_broken_local_cache_is_absorbed() {
    let tiers = Tiers {
        local: Arc::new(MockLocalCache::broken()),
        ..Tiers::new(MockCommentaryGenerator::echo())
    };
    let resolver = resolver(&tiers);

    let first = resolver.resolve(&fixtures::psalm_23()).await.expect("first");
    assert_tier(&first, SourceTier::Generated);

    // Nothing stuck locally, so the second resolve falls through to remote
    let second = resolver.resolve(&fixtures::psalm_23()).await.expect("second");
    assert_tier(&second, SourceTier::Remote);
    assert_eq!(second.text, first.text);
    assert_eq!(tiers.generator.call_count(), 1);
}

#[tokio::test]
async fn test_write_back_persists_in_lmdb() {
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    let local = Arc::new(LmdbLocalCache::new(temp_dir.path(), 16).expect("open LMDB"));
    let generator = Arc::new(MockCommentaryGenerator::with_range("In the beginning.", 1, 3));

    let first = CommentaryResolver::new(
        local.clone(),
        Arc::new(InMemoryRemoteStore::new()),
        generator.clone(),
    );
    first.resolve(&fixtures::genesis_1_1()).await.expect("generate");

    // Fresh resolver, empty remote: only the device cache can answer
    let second = CommentaryResolver::new(
        local.clone(),
        Arc::new(InMemoryRemoteStore::new()),
        generator.clone(),
    );
    let record = second.resolve(&fixtures::genesis_1_1()).await.expect("local hit");

    assert_tier(&record, SourceTier::Local);
    assert_resolved_range(&record, 1, 3);
    assert_eq!(generator.call_count(), 1);
    assert!(local
        .get("commentary:Genesis:1:1-3")
        .await
        .expect("read")
        .is_some());
}

// ============================================================================
// ERRORS
// ============================================================================

#[tokio::test]
async fn test_remote_query_error_aborts_before_generation() {
    let tiers = Tiers::new(MockCommentaryGenerator::echo());
    tiers.remote.fail_queries(true);

    let err = resolver(&tiers)
        .resolve(&fixtures::psalm_23())
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::Remote(RemoteError::Query { .. })));
    assert_eq!(tiers.generator.call_count(), 0);
    assert!(tiers.local.inner().is_empty());
}

#[tokio::test]
async fn test_empty_generation_is_user_facing_error() {
    let tiers = Tiers::new(MockCommentaryGenerator::failing(GenerationError::Empty));

    let err = resolver(&tiers)
        .resolve(&fixtures::psalm_23())
        .await
        .unwrap_err();

    assert_eq!(err, ResolveError::Generation(GenerationError::Empty));
    assert!(!err.user_message().is_empty());
    assert!(!err.is_retryable());
    assert!(tiers.remote.rows().is_empty());
}

#[tokio::test]
async fn test_invalid_anchor_touches_nothing() {
    let tiers = Tiers::new(MockCommentaryGenerator::echo());
    let resolver = resolver(&tiers);

    for anchor in [
        PassageAnchor::range("", 1, 1, 1),
        PassageAnchor::range("Genesis", 1, 4, 2),
        PassageAnchor::range("Genesis", 0, 1, 1),
        PassageAnchor::range("Obadiah", 2, 1, 1),
        PassageAnchor::range("Gospel of Thomas", 1, 1, 1),
    ] {
        let err = resolver.resolve(&anchor).await.unwrap_err();
        assert!(matches!(err, ResolveError::InvalidAnchor(_)), "{}", anchor);
    }
    lectio_test_utils::assertions::assert_no_io(&tiers);
}

// ============================================================================
// SINGLE-FLIGHT
// ============================================================================

#[tokio::test]
async fn test_concurrent_requests_share_one_generation() {
    let tiers = Tiers::new(MockCommentaryGenerator::with_range("Shared.", 1, 3).gated());
    let resolver = resolver(&tiers);

    let first = resolver.begin(&fixtures::genesis_1_1()).expect("begin");
    let second = resolver.begin(&fixtures::genesis_1_1()).expect("begin");
    assert!(!first.joined());
    assert!(second.joined());
    assert_eq!(first.key(), second.key());

    tiers.generator.wait_started().await;
    tiers.generator.release(1);

    let (a, b) = tokio::join!(first.outcome(), second.outcome());
    assert_eq!(a.expect("first"), b.expect("second"));
    assert_eq!(tiers.generator.call_count(), 1);
    assert_eq!(tiers.remote.rows().len(), 1);
    assert_eq!(resolver.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_resolves_generate_once() {
    let tiers = Tiers::new(MockCommentaryGenerator::echo().gated());
    let resolver = Arc::new(resolver(&tiers));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let resolver = Arc::clone(&resolver);
        handles.push(tokio::spawn(async move {
            resolver.resolve(&fixtures::psalm_23()).await
        }));
    }
    tiers.generator.wait_started().await;
    tiers.generator.release(16);

    for handle in handles {
        let record = handle.await.expect("join").expect("resolve");
        assert_resolved_range(&record, 1, 6);
    }
    assert_eq!(tiers.generator.call_count(), 1);
}

#[tokio::test]
async fn test_independent_clients_both_generate() {
    let tiers = Tiers::new(MockCommentaryGenerator::echo().gated())
        .with_remote(MockRemoteStore::with_unique_constraint());
    let first = resolver(&tiers);
    let (second, _) = second_client(&tiers);

    let a = first.begin(&fixtures::psalm_23()).expect("begin");
    let b = second.begin(&fixtures::psalm_23()).expect("begin");
    tiers.generator.wait_for_calls(2).await;
    tiers.generator.release(2);

    // The losing insert is a duplicate and is not an error for its caller
    let (a, b) = tokio::join!(a.outcome(), b.outcome());
    assert_tier(&a.expect("first client"), SourceTier::Generated);
    assert_tier(&b.expect("second client"), SourceTier::Generated);
    assert_eq!(tiers.generator.call_count(), 2);
    assert_eq!(tiers.remote.rows().len(), 1);
}

// ============================================================================
// REFRESH
// ============================================================================

#[tokio::test]
async fn test_refresh_skips_local_and_rewrites_it() {
    let tiers = Tiers::new(MockCommentaryGenerator::echo());
    let resolver = resolver(&tiers);
    resolver.resolve(&fixtures::psalm_23()).await.expect("seed");
    let reads_before = tiers.local.counts().reads();

    let record = resolver.refresh(&fixtures::psalm_23()).await.expect("refresh");

    assert_tier(&record, SourceTier::Remote);
    assert_eq!(tiers.generator.call_count(), 1);
    assert!(tiers.local.counts().removes() >= 1);
    // Only the alias check during the purge reads locally
    assert_eq!(tiers.local.counts().reads() - reads_before, 1);
    assert_cached(tiers.local.inner(), "commentary:Psalms:23:1-6");
}

#[tokio::test]
async fn test_refresh_removes_alias_target() {
    let tiers = Tiers::new(MockCommentaryGenerator::with_range("In the beginning.", 1, 3));
    let resolver = resolver(&tiers);
    resolver.resolve(&fixtures::genesis_1_1()).await.expect("seed");
    assert_eq!(
        tiers.local.inner().keys(),
        vec!["commentary:Genesis:1:1-1", "commentary:Genesis:1:1-3"]
    );

    // The remote tier fails, so the purge is all that remains visible
    tiers.remote.fail_queries(true);
    let err = resolver.refresh(&fixtures::genesis_1_1()).await.unwrap_err();
    assert!(matches!(err, ResolveError::Remote(_)));
    assert!(tiers.local.inner().is_empty());
}

#[tokio::test]
async fn test_refresh_regenerates_when_remote_empty() {
    let tiers = Tiers::new(MockCommentaryGenerator::echo());
    let resolver = resolver(&tiers);
    tiers
        .local
        .inner()
        .set("commentary:Ruth:1:16-17", "Stale local text.")
        .await
        .expect("seed");

    let record = resolver
        .refresh(&PassageAnchor::range("Ruth", 1, 16, 17))
        .await
        .expect("refresh");

    assert_tier(&record, SourceTier::Generated);
    assert_eq!(record.resolved_range, VerseRange::new(16, 17));
    assert_ne!(record.text, "Stale local text.");
}

#[tokio::test]
async fn test_lookup_during_refresh_shares_its_generation() {
    let tiers = Tiers::new(MockCommentaryGenerator::echo().gated());
    let resolver = resolver(&tiers);

    let refresh = resolver.begin_refresh(&fixtures::psalm_23()).expect("begin refresh");
    tiers.generator.wait_started().await;
    let lookup = resolver.begin(&fixtures::psalm_23()).expect("begin lookup");
    assert!(lookup.joined());

    tiers.generator.release(2);
    let (refreshed, looked_up) = tokio::join!(refresh.outcome(), lookup.outcome());
    assert_eq!(refreshed.expect("refresh"), looked_up.expect("lookup"));
    assert_eq!(tiers.generator.call_count(), 1);
    assert_eq!(tiers.remote.rows().len(), 1);
}

// ============================================================================
// SERVICE-REPORTED ANCHORS
// ============================================================================

#[tokio::test]
async fn test_reported_anchor_does_not_hide_range_row() {
    let generator = MockCommentaryGenerator::from_fn(|request| {
        GenerateResponse {
            commentary: Some("text".to_string()),
            start_verse: Some(1),
            end_verse: Some(3),
            anchor_verse: Some(2),
            random_verse: None,
        }
        .normalize(request)
    });
    let tiers = Tiers::new(generator);
    let request = PassageAnchor::range("Genesis", 1, 1, 3);

    let first = resolver(&tiers).resolve(&request).await.expect("first device");
    assert_eq!(first.anchor_verse, None);
    assert_eq!(tiers.remote.rows()[0].anchor_verse, None);

    let (other, _) = second_client(&tiers);
    let record = other.resolve(&request).await.expect("second device");
    assert_tier(&record, SourceTier::Remote);
    assert_eq!(tiers.generator.call_count(), 1);
}
