//! Vault-tier isolation (spec §4.1, §4.4): a memory naming a brokerage
//! PIN is classified `Vault` and must never reach the vector index, even
//! though every other memory for the same user does.

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use salience_memory_core::config::MemoryConfig;
use salience_memory_core::retrieval::RecallQuery;
use salience_memory_core::service::MemoryService;
use salience_memory_core::types::SecurityTier;
use salience_memory_test_utils::{FakeEmbedder, FakeGateway, FakeVectorStore};

type TestService = MemoryService<FakeGateway, FakeEmbedder, FakeVectorStore>;

#[tokio::test]
async fn a_brokerage_pin_is_classified_vault_and_excluded_from_the_vector_index() {
    let gateway = Arc::new(FakeGateway::new());
    let embedder = Arc::new(FakeEmbedder::default());
    let vector_store = Arc::new(FakeVectorStore::new());
    let service: TestService = MemoryService::new(
        gateway,
        None,
        Some(embedder),
        Some(vector_store.clone()),
        MemoryConfig::default(),
    );

    let vault_outcome = service
        .store_memory(
            "alex",
            "My brokerage PIN is 4471, don't share it",
            &HashSet::new(),
            None,
            false,
            &CancellationToken::new(),
        )
        .await
        .expect("store succeeds even for vault-tier content");

    let general_outcome = service
        .store_memory("alex", "Went for a run in the park", &HashSet::new(), None, false, &CancellationToken::new())
        .await
        .expect("store succeeds");

    assert_eq!(vector_store.len(), 1, "only the non-vault memory should have reached the vector index");

    let hits = service
        .recall("alex", &RecallQuery { limit: 10, ..Default::default() }, &CancellationToken::new())
        .await
        .expect("recall succeeds");
    let vault_hit = hits.iter().find(|h| h.memory.id == vault_outcome.id).expect("vault memory still recallable by metadata");
    assert_eq!(vault_hit.memory.security_tier, SecurityTier::Vault);
    assert!(vault_hit.memory.encryption_envelope.is_some());

    let general_hit = hits.iter().find(|h| h.memory.id == general_outcome.id).expect("general memory recallable");
    assert_eq!(general_hit.memory.security_tier, SecurityTier::General);
    assert!(general_hit.memory.encryption_envelope.is_none());
}

#[tokio::test]
async fn vector_store_rejects_a_direct_vault_upsert_attempt() {
    use salience_memory_core::providers::{Deadline, VectorFilters, VectorStore};
    use salience_memory_core::types::ForgottenState;

    let vector_store = FakeVectorStore::new();
    let result = vector_store
        .upsert(
            "m-vault",
            &[1.0, 0.0],
            VectorFilters {
                user: "alex".to_string(),
                tier: SecurityTier::Vault,
                forgotten_state: ForgottenState::Active,
            },
            Deadline::from_secs(1),
        )
        .await;
    assert!(result.is_err(), "the vector store must refuse to index Vault-tier content even if asked directly");
}
