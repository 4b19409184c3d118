//! Quantified invariants (spec §8): properties that must hold regardless
//! of the exact scenario that produced the state.

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use salience_memory_core::config::MemoryConfig;
use salience_memory_core::enrichment::{ImportOptions, ReassociateEdit};
use salience_memory_core::retrieval::RecallQuery;
use salience_memory_core::salience::{SalienceScorer, ScoringContext};
use salience_memory_core::service::MemoryService;
use salience_memory_core::types::{ExtractedFeatures, ForgetMode, SecurityTier};
use salience_memory_test_utils::{create_test_memory, FakeEmbedder, FakeGateway, FakeVectorStore};

type TestService = MemoryService<FakeGateway, FakeEmbedder, FakeVectorStore>;

fn build_service() -> (Arc<FakeGateway>, TestService) {
    let gateway = Arc::new(FakeGateway::new());
    let embedder = Arc::new(FakeEmbedder::default());
    let vector_store = Arc::new(FakeVectorStore::new());
    let service = MemoryService::new(gateway.clone(), None, Some(embedder), Some(vector_store), MemoryConfig::default());
    (gateway, service)
}

#[tokio::test]
async fn salience_scoring_is_idempotent_over_an_identical_scoring_context() {
    let context = ScoringContext {
        context_people: HashSet::new(),
        context_topics: HashSet::new(),
        context_activity: None,
        recent_memories: Vec::new(),
        relationships: Vec::new(),
        now: chrono::Utc::now(),
    };
    let features = ExtractedFeatures::default();
    let text = "Sarah is allergic to shellfish";
    let first = SalienceScorer::score(text, &features, &context);
    let second = SalienceScorer::score(text, &features, &context);
    assert_eq!(SalienceScorer::salience_from_factors(&first), SalienceScorer::salience_from_factors(&second));
}

#[tokio::test]
async fn recall_excludes_suppressed_memories_unless_explicitly_included() {
    let (gateway, service) = build_service();
    let outcome = service
        .store_memory("alex", "Had lunch with Dan downtown", &HashSet::new(), None, false, &CancellationToken::new())
        .await
        .expect("store succeeds");

    service
        .forget(&outcome.id, ForgetMode::Suppress, Some("no longer relevant".to_string()))
        .await
        .expect("forget succeeds");

    let visible = service
        .recall("alex", &RecallQuery { limit: 10, ..Default::default() }, &CancellationToken::new())
        .await
        .expect("recall succeeds");
    assert!(visible.is_empty(), "a suppressed memory must not appear in a default recall");

    let included = service
        .recall(
            "alex",
            &RecallQuery {
                limit: 10,
                include_suppressed: true,
                ..Default::default()
            },
            &CancellationToken::new(),
        )
        .await
        .expect("recall succeeds");
    assert_eq!(included.len(), 1);

    drop(gateway);
}

#[tokio::test]
async fn forget_then_restore_round_trips_back_to_active() {
    let (_gateway, service) = build_service();
    let outcome = service
        .store_memory("alex", "Had lunch with Dan downtown", &HashSet::new(), None, false, &CancellationToken::new())
        .await
        .expect("store succeeds");

    service
        .forget(&outcome.id, ForgetMode::Archive, None)
        .await
        .expect("forget succeeds");
    service.restore(&outcome.id).await.expect("restore succeeds");

    let hits = service
        .recall("alex", &RecallQuery { limit: 10, ..Default::default() }, &CancellationToken::new())
        .await
        .expect("recall succeeds");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.forgotten_state, salience_memory_core::types::ForgottenState::Active);
    assert!(hits[0].memory.forgotten_at.is_none());
}

#[tokio::test]
async fn restoring_a_never_forgotten_memory_is_rejected() {
    let (_gateway, service) = build_service();
    let outcome = service
        .store_memory("alex", "Had lunch with Dan downtown", &HashSet::new(), None, false, &CancellationToken::new())
        .await
        .expect("store succeeds");

    let result = service.restore(&outcome.id).await;
    assert!(result.is_err(), "restore must require a prior Suppressed/Archived state");
}

#[tokio::test]
async fn export_then_import_round_trips_without_rederiving_salience() {
    let (_gateway, service) = build_service();
    let outcome = service
        .store_memory("alex", "I owe Dan the Q2 draft by Friday", &HashSet::new(), None, false, &CancellationToken::new())
        .await
        .expect("store succeeds");

    let export = service.export_memories("alex").await.expect("export succeeds");
    assert_eq!(export.memories.len(), 1);
    assert_eq!(export.loops.len(), 1);
    let original_salience = export.memories[0].salience;

    // A fresh, empty service represents a different deployment receiving
    // the export; importing it must restore state byte-for-byte rather
    // than re-running extraction or salience scoring.
    let (_gateway2, service2) = build_service();
    let imported = service2
        .import_memories(&export, ImportOptions::default())
        .await
        .expect("import succeeds");
    assert_eq!(imported, 1);

    let hits = service2
        .recall("alex", &RecallQuery { limit: 10, ..Default::default() }, &CancellationToken::new())
        .await
        .expect("recall succeeds");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.salience, original_salience);
    assert_eq!(hits[0].memory.id, outcome.id);

    // Re-importing without overwrite is a no-op rather than a conflict.
    let reimported = service2
        .import_memories(&export, ImportOptions::default())
        .await
        .expect("re-import succeeds");
    assert_eq!(reimported, 0);
}

#[tokio::test]
async fn reassociate_rescoring_reflects_added_topics_immediately() {
    let (_gateway, service) = build_service();
    let outcome = service
        .store_memory("alex", "Went for a walk", &HashSet::new(), None, false, &CancellationToken::new())
        .await
        .expect("store succeeds");

    let edit = ReassociateEdit {
        add_topics: vec!["health".to_string()],
        add_people: vec!["Sarah".to_string()],
        ..Default::default()
    };
    service
        .reassociate("alex", &outcome.id, &edit, None, &CancellationToken::new())
        .await
        .expect("reassociate succeeds");

    let hits = service
        .recall(
            "alex",
            &RecallQuery {
                people: Some(vec!["Sarah".to_string()]),
                limit: 10,
                ..Default::default()
            },
            &CancellationToken::new(),
        )
        .await
        .expect("recall succeeds");
    assert_eq!(hits.len(), 1);
    assert!(hits[0].memory.all_topics().contains("health"));
}

#[tokio::test]
async fn a_fixture_memory_defaults_to_the_general_tier_and_can_be_vault_classified() {
    let memory = create_test_memory("alex", "just a normal day");
    assert_eq!(memory.security_tier, SecurityTier::General);
}
