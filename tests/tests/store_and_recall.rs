//! End-to-end store -> recall over the `MemoryService` facade, using the
//! in-memory fakes so the full C1-C5 path runs without a database.

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use salience_memory_core::config::MemoryConfig;
use salience_memory_core::retrieval::RecallQuery;
use salience_memory_core::service::MemoryService;
use salience_memory_test_utils::{FakeEmbedder, FakeGateway, FakeLLMProvider, FakeVectorStore};

type TestService = MemoryService<FakeGateway, FakeEmbedder, FakeVectorStore>;

fn build_service() -> TestService {
    let gateway = Arc::new(FakeGateway::new());
    let embedder = Arc::new(FakeEmbedder::default());
    let vector_store = Arc::new(FakeVectorStore::new());
    MemoryService::new(gateway, None, Some(embedder), Some(vector_store), MemoryConfig::default())
}

#[tokio::test]
async fn storing_a_memory_about_sarah_surfaces_her_shellfish_allergy_on_recall() {
    let service = build_service();
    let known = HashSet::new();

    let outcome = service
        .store_memory(
            "alex",
            "Sarah prefers morning meetings and is allergic to shellfish",
            &known,
            None,
            false,
            &CancellationToken::new(),
        )
        .await
        .expect("store succeeds");
    assert!(outcome.salience > 0, "a memory naming a sensitivity should score above zero");

    let hits = service
        .recall(
            "alex",
            &RecallQuery {
                query: "shellfish".to_string(),
                limit: 10,
                ..Default::default()
            },
            &CancellationToken::new(),
        )
        .await
        .expect("recall succeeds");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.id, outcome.id);
    assert!(hits[0].memory.extracted_features.people.contains("Sarah"));
    assert!(hits[0].memory.extracted_features.sensitivities.iter().any(|s| s == "allerg"));
}

#[tokio::test]
async fn recall_excludes_unrelated_memories_by_person_filter() {
    let service = build_service();
    let known = HashSet::new();

    service
        .store_memory("alex", "Sarah prefers morning meetings", &known, None, false, &CancellationToken::new())
        .await
        .expect("store sarah memory");
    service
        .store_memory("alex", "Dan asked about the Q2 budget", &known, None, false, &CancellationToken::new())
        .await
        .expect("store dan memory");

    let hits = service
        .recall(
            "alex",
            &RecallQuery {
                people: Some(vec!["Dan".to_string()]),
                limit: 10,
                ..Default::default()
            },
            &CancellationToken::new(),
        )
        .await
        .expect("recall succeeds");

    assert_eq!(hits.len(), 1);
    assert!(hits[0].memory.text.contains("Dan"));
}

#[tokio::test]
async fn heuristic_extraction_falls_back_when_llm_errors() {
    let gateway = Arc::new(FakeGateway::new());
    let llm = Arc::new(FakeLLMProvider::default());
    llm.fail_next(1);
    let embedder = Arc::new(FakeEmbedder::default());
    let vector_store = Arc::new(FakeVectorStore::new());
    let service: TestService = MemoryService::new(
        gateway,
        Some(llm.clone()),
        Some(embedder),
        Some(vector_store),
        MemoryConfig::default(),
    );

    let outcome = service
        .store_memory(
            "alex",
            "Sarah prefers morning meetings and is allergic to shellfish",
            &HashSet::new(),
            None,
            true,
            &CancellationToken::new(),
        )
        .await
        .expect("store succeeds despite llm failure");

    assert_eq!(llm.prompts_seen().len(), 1, "llm should have been attempted once");
    let hits = service
        .recall("alex", &RecallQuery { limit: 10, ..Default::default() }, &CancellationToken::new())
        .await
        .expect("recall succeeds");
    assert_eq!(hits[0].memory.id, outcome.id);
    assert!(hits[0].memory.extracted_features.people.contains("Sarah"));
}
