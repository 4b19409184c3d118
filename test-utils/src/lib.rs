//! # Test Utilities
//!
//! Shared fakes and fixtures for exercising `salience-memory-core` and its
//! storage backends without a real LLM, embedder, vector index, or redb
//! file.
//!
//! Provides:
//! - An in-memory [`FakeGateway`] implementing [`PersistenceGateway`]
//! - [`FakeLLMProvider`], [`FakeEmbedder`], [`FakeVectorStore`] implementing
//!   the three external-collaborator traits
//! - Fixture builders for the common entity types

mod gateway;
mod providers;

pub use gateway::FakeGateway;
pub use providers::{FakeEmbedder, FakeLLMProvider, FakeVectorStore};

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use salience_memory_core::types::{
    ExtractedFeatures, ExtractionStatus, ForgottenState, Memory, SalienceFactors, SecurityTier,
};
use uuid::Uuid;

/// A test memory with minimal configuration: `Active`, `General` tier,
/// empty extracted features, salience 0.
#[must_use]
pub fn create_test_memory(user: &str, text: &str) -> Memory {
    create_test_memory_at(user, text, Utc::now())
}

/// A test memory stamped with a specific `created_at`, useful for
/// exercising time-windowed queries (novelty decay, recall time ranges,
/// the 30-day relationship trend window).
#[must_use]
pub fn create_test_memory_at(user: &str, text: &str, created_at: DateTime<Utc>) -> Memory {
    Memory {
        id: Uuid::new_v4().to_string(),
        user: user.to_string(),
        created_at,
        text: text.to_string(),
        normalized_text: text.to_lowercase(),
        extracted_features: ExtractedFeatures::default(),
        extraction_status: ExtractionStatus::Empty,
        salience: 0,
        salience_factors: SalienceFactors {
            emotion: 0.0,
            novelty: 0.0,
            relevance: 0.0,
            social: 0.0,
            consequential: 0.0,
        },
        security_tier: SecurityTier::General,
        encryption_envelope: None,
        forgotten_state: ForgottenState::Active,
        forgotten_at: None,
        forgotten_reason: None,
        pending_vector_retry: false,
        project_tag: None,
        added_tags: HashSet::new(),
        added_topics: HashSet::new(),
    }
}

/// A test memory mentioning `people`, useful for relationship/loop/event
/// fixtures that need a populated `extracted_features.people` set.
#[must_use]
pub fn create_test_memory_with_people(user: &str, text: &str, people: &[&str]) -> Memory {
    let mut memory = create_test_memory(user, text);
    memory.extracted_features.people = people.iter().map(|p| (*p).to_string()).collect();
    memory
}

/// A test memory already classified at a given security tier, as produced
/// by `classify_security_tier` for vault-keyword text.
#[must_use]
pub fn create_test_memory_with_tier(user: &str, text: &str, tier: SecurityTier) -> Memory {
    let mut memory = create_test_memory(user, text);
    memory.security_tier = tier;
    memory
}

/// A deterministic `HashMap<String, u32>` topic frequency table, useful as
/// a `BehavioralFingerprint.topics` fixture without going through the full
/// `identify` pipeline.
#[must_use]
pub fn topic_counts(topics: &[&str]) -> HashMap<String, u32> {
    let mut out = HashMap::new();
    for topic in topics {
        *out.entry((*topic).to_string()).or_insert(0) += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_test_memory_defaults_to_active_general() {
        let memory = create_test_memory("sarah", "went for a run");
        assert_eq!(memory.forgotten_state, ForgottenState::Active);
        assert_eq!(memory.security_tier, SecurityTier::General);
        assert!(memory.extracted_features.is_empty());
    }

    #[test]
    fn create_test_memory_with_people_populates_features() {
        let memory = create_test_memory_with_people("sarah", "lunch with Dan", &["Dan"]);
        assert!(memory.extracted_features.people.contains("Dan"));
    }
}
