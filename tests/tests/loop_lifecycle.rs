//! Commitment extraction -> open loop -> idempotent close (spec §4.1, §4.4).

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use salience_memory_core::config::MemoryConfig;
use salience_memory_core::service::MemoryService;
use salience_memory_core::types::LoopOwner;
use salience_memory_test_utils::{FakeEmbedder, FakeGateway, FakeVectorStore};

type TestService = MemoryService<FakeGateway, FakeEmbedder, FakeVectorStore>;

fn build_service() -> TestService {
    let gateway = Arc::new(FakeGateway::new());
    MemoryService::new(gateway, None, None, None, MemoryConfig::default())
}

#[tokio::test]
async fn owing_dan_the_q2_draft_creates_an_open_loop_closeable_once() {
    let service = build_service();

    let outcome = service
        .store_memory("alex", "I owe Dan the Q2 draft by Friday", &HashSet::new(), None, false, &CancellationToken::new())
        .await
        .expect("store succeeds");
    assert_eq!(outcome.loops_created, 1);

    let loops = service
        .list_loops("alex", Some("Dan"), None, false)
        .await
        .expect("list loops");
    assert_eq!(loops.len(), 1);
    let the_loop = &loops[0];
    assert_eq!(the_loop.owner, LoopOwner::SelfOwner);
    assert_eq!(the_loop.other_party.as_deref(), Some("Dan"));
    assert!(the_loop.due_date.is_some(), "a 'by Friday' commitment should carry a due date");
    assert!(the_loop.closed_at.is_none());

    let first_close = service
        .close_loop(the_loop.id, Some("sent the draft".to_string()))
        .await
        .expect("close succeeds");

    let second_close = service
        .close_loop(the_loop.id, Some("different note".to_string()))
        .await
        .expect("closing an already-closed loop is idempotent");

    assert_eq!(first_close, second_close, "double-close must return the original closedAt");

    let still_open = service
        .list_loops("alex", Some("Dan"), None, false)
        .await
        .expect("list loops");
    assert!(still_open.is_empty(), "a closed loop must not appear in the open-loop listing");
}

#[tokio::test]
async fn overdue_filter_only_returns_loops_past_their_due_date() {
    let service = build_service();
    service
        .store_memory("alex", "I owe Dan the Q2 draft by Friday", &HashSet::new(), None, false, &CancellationToken::new())
        .await
        .expect("store succeeds");
    service
        .store_memory("alex", "I'll call Priya about the lease renewal", &HashSet::new(), None, false, &CancellationToken::new())
        .await
        .expect("store succeeds");

    let overdue = service
        .list_loops("alex", None, None, true)
        .await
        .expect("list overdue loops");
    assert!(overdue.is_empty(), "neither loop has a due date already in the past");
}
