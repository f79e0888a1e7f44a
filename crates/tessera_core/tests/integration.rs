//! Integration tests for repositories, pagination and the cache tier
//! against the fake backend.

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::cache::{Cache, CacheConfig, ManualClock};
use tessera_core::{
    ConflictCause, FailureKind, Filter, JsonCodec, LoadOutcome, LocalRepository, Method, PageQuery,
    PaginatedList, PaginationConfig, PaginationController, PaginationState, RemoteRepository,
    Repository, RepositoryPageSource, Sort,
};
use tessera_testkit::prelude::*;

fn seeded_backend(count: usize) -> Arc<FakeBackend> {
    let backend = Arc::new(FakeBackend::new());
    for i in 0..count {
        let folder = if i % 2 == 0 { "work" } else { "home" };
        let note = Note::new(format!("note {i:02}"), "body").in_folder(folder);
        backend.seed("notes", serde_json::to_value(&note).expect("Failed to encode"));
    }
    backend
}

fn notes_repo(backend: &Arc<FakeBackend>) -> RemoteRepository<Note, JsonCodec<Note>> {
    RemoteRepository::new(backend.clone(), "notes", note_codec())
}

#[tokio::test]
async fn remote_repository_crud() {
    let backend = Arc::new(FakeBackend::new());
    let repo = notes_repo(&backend);

    let created = repo.create(&Note::new("hello", "world")).await.unwrap();
    assert_eq!(created.version, 1);

    let fetched = repo.get_by_id(&created.id).await.unwrap();
    assert_eq!(fetched, created);

    let updated = repo.update(&created.edited("again")).await.unwrap();
    assert_eq!(updated.version, 2);

    let stale = repo.update(&created.edited("stale")).await.unwrap_err();
    assert_eq!(stale.conflict_cause(), Some(ConflictCause::ConcurrentModification));

    let duplicate = repo.create(&updated).await.unwrap_err();
    assert_eq!(duplicate.conflict_cause(), Some(ConflictCause::UniqueViolation));
    assert_eq!(duplicate.code(), Some("409"));
    assert!(!duplicate.user_message().contains("id already exists"));
    assert!(!duplicate.user_message().contains('{'));

    repo.delete(&created.id).await.unwrap();
    let missing = repo.delete(&created.id).await.unwrap_err();
    assert_eq!(missing.kind(), FailureKind::NotFound);
    assert!(!missing.user_message().is_empty());
}

#[tokio::test]
async fn remote_failures_map_to_taxonomy() {
    let backend = Arc::new(FakeBackend::new());
    let repo = notes_repo(&backend);
    let query = PageQuery::first(10);

    backend.fail_next(1, Fault::Offline);
    assert_eq!(repo.get_all(&query).await.unwrap_err().kind(), FailureKind::Network);

    for (status, kind) in [
        (401, FailureKind::Unauthorized),
        (403, FailureKind::Forbidden),
        (429, FailureKind::RateLimited),
        (503, FailureKind::Server),
    ] {
        backend.fail_next(1, Fault::Status(status));
        let failure = repo.get_all(&query).await.unwrap_err();
        assert_eq!(failure.kind(), kind, "status {status}");
    }
    assert!(repo.get_all(&query).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn remote_timeout_is_a_failure() {
    let backend = Arc::new(FakeBackend::new());
    let repo = notes_repo(&backend).with_timeout(Duration::from_millis(50));
    backend.fail_next(1, Fault::Delay(Duration::from_secs(1)));

    let failure = repo.get_all(&PageQuery::first(10)).await.unwrap_err();
    assert_eq!(failure.kind(), FailureKind::Timeout);
    assert!(failure.is_retryable());
}

#[tokio::test]
async fn filtered_sorted_listing_goes_over_the_wire() {
    let backend = seeded_backend(9);
    let repo = notes_repo(&backend);
    let query = PageQuery::new(2, 2)
        .with_filter(Filter::eq("folder", "work"))
        .with_sort(Sort::descending("title"));

    let page = repo.get_all(&query).await.unwrap();
    let titles: Vec<_> = page.items().iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, ["note 04", "note 02"]);
    assert_eq!(page.total_items(), 5);
    assert!(page.has_more());

    let call = backend.calls_with(Method::Get).pop().unwrap();
    assert!(call.params.contains(&("folder".to_string(), "work".to_string())));
    assert!(call.params.contains(&("order".to_string(), "desc".to_string())));

    let beyond = repo.get_all(&query.with_page(10)).await.unwrap();
    assert!(beyond.is_empty());
    assert_eq!(beyond.total_items(), 5);
}

#[tokio::test]
async fn controller_scrolls_remote_collection() {
    let backend = seeded_backend(25);
    let source = RepositoryPageSource::new(
        notes_repo(&backend),
        PageQuery::first(10).with_sort(Sort::ascending("title")),
    );
    let controller = PaginationController::start(Arc::new(source), PaginationConfig::new(10)).await;

    let state = controller.state();
    assert!(matches!(state, PaginationState::Idle(_)));
    assert_eq!(state.items().len(), 10);

    assert_eq!(controller.load_more().await, LoadOutcome::Loaded);
    assert_eq!(controller.load_more().await, LoadOutcome::Loaded);
    let data = controller.state().data().cloned().unwrap();
    assert_eq!(data.len(), 25);
    assert_eq!(data.page(), 3);
    assert!(!data.has_more());
    assert_eq!(data.items()[0].title, "note 00");
    assert_eq!(data.items()[24].title, "note 24");

    // Nothing left to load.
    assert_eq!(controller.load_more().await, LoadOutcome::Ignored);
    assert_eq!(backend.calls_with(Method::Get).len(), 3);
}

#[tokio::test]
async fn controller_keeps_items_when_a_page_fails() {
    let backend = seeded_backend(15);
    let source = RepositoryPageSource::new(notes_repo(&backend), PageQuery::first(10));
    let controller = PaginationController::start(Arc::new(source), PaginationConfig::new(10)).await;

    backend.fail_next(1, Fault::Status(500));
    assert_eq!(controller.load_more().await, LoadOutcome::Failed);
    match controller.state() {
        PaginationState::Error { data, failure } => {
            assert_eq!(data.map(|d| d.len()), Some(10));
            assert_eq!(failure.kind(), FailureKind::Server);
        }
        other => panic!("expected error state, got {other:?}"),
    }

    assert_eq!(controller.retry().await, LoadOutcome::Loaded);
    assert_eq!(controller.state().items().len(), 15);
}

#[tokio::test]
async fn controller_over_local_repository_refreshes() {
    let repo = LocalRepository::new(memory_store(), "notes", note_codec());
    for i in 0..3 {
        repo.upsert(&Note::new(format!("n{i}"), "")).unwrap();
    }
    let source = RepositoryPageSource::new(repo.clone(), PageQuery::first(20));
    let controller = PaginationController::start(Arc::new(source), PaginationConfig::default()).await;
    assert_eq!(controller.state().items().len(), 3);

    repo.upsert(&Note::new("late", "")).unwrap();
    assert_eq!(controller.refresh().await, LoadOutcome::Loaded);
    assert_eq!(controller.state().items().len(), 4);
}

#[tokio::test]
async fn cache_fronts_remote_reads() {
    let backend = seeded_backend(3);
    let repo = notes_repo(&backend);
    let clock = Arc::new(ManualClock::default());
    let cache: Cache<PaginatedList<Note>> = Cache::with_clock(
        CacheConfig::development().with_default_ttl(Duration::from_secs(60)),
        clock.clone(),
    );
    let query = PageQuery::first(10);

    for _ in 0..3 {
        let page = cache
            .get_or_fetch("notes/page/1", None, || repo.get_all(&query))
            .await
            .unwrap();
        assert_eq!(page.len(), 3);
    }
    assert_eq!(backend.call_count(), 1);

    clock.advance(Duration::from_secs(61));
    cache
        .get_or_fetch("notes/page/1", None, || repo.get_all(&query))
        .await
        .unwrap();
    assert_eq!(backend.call_count(), 2);

    backend.fail_next(1, Fault::Offline);
    cache.invalidate("notes/page/1").unwrap();
    let failure = cache
        .get_or_fetch("notes/page/1", None, || repo.get_all(&query))
        .await
        .unwrap_err();
    assert_eq!(failure.kind(), FailureKind::Network);
    assert!(cache.get("notes/page/1").unwrap().is_none());
}

proptest! {
    #[test]
    fn paging_a_collection_visits_every_item_once(
        notes in notes_strategy(40),
        page_size in 1u32..=12,
    ) {
        let total = notes.len() as u64;
        let mut seen = Vec::new();
        let mut page = 1;
        loop {
            let slice = PaginatedList::from_slice(&notes, page, page_size);
            prop_assert_eq!(slice.total_items(), total);
            seen.extend(slice.items().iter().map(|n| n.id));
            if !slice.has_more() {
                prop_assert_eq!(u64::from(page), slice.total_pages().max(1));
                break;
            }
            page += 1;
        }
        let expected: Vec<_> = notes.iter().map(|n| n.id).collect();
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn window_invariants_hold((page, page_size, total) in page_window_strategy()) {
        let list: PaginatedList<()> = PaginatedList::new(Vec::new(), page, page_size, total);
        prop_assert_eq!(list.total_pages(), total.div_ceil(u64::from(page_size)));
        prop_assert_eq!(
            list.has_more(),
            u64::from(page) * u64::from(page_size) < total
        );
    }
}
