//! Salience scorer (C3, spec §4.3): combines five `[0,1]` factors into a
//! 0-100 integer salience, with the factor breakdown kept for
//! auditability. Pure function of its inputs — no I/O, no locks — so it
//! can be unit-tested exhaustively and composed inside the enrichment
//! pipeline without threading a gateway handle through it.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::types::{ExtractedFeatures, Memory, Relationship, SalienceFactors};

/// Context snapshot the scorer needs beyond the raw text and features
/// (spec §4.3 "relevance": Jaccard vs. current context frame).
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    /// People currently in the active context frame.
    pub context_people: HashSet<String>,
    /// Topics currently in the active context frame.
    pub context_topics: HashSet<String>,
    /// Current activity, folded into the relevance set as a pseudo-topic.
    pub context_activity: Option<String>,
    /// The user's memories from the last 30 days, used for novelty.
    pub recent_memories: Vec<Memory>,
    /// Relationship records for people mentioned, used for the social factor.
    pub relationships: Vec<Relationship>,
    /// Evaluation instant; threaded explicitly so scoring is deterministic
    /// under test and the "byte-equal under identical inputs" invariant
    /// (spec §4.3) doesn't depend on wall-clock `Utc::now()`.
    pub now: DateTime<Utc>,
}

static EMOTION_MARKERS: &[&str] = &[
    "love", "hate", "excited", "thrilled", "worried", "scared", "furious", "anxious",
    "heartbroken", "devastated", "overjoyed", "terrified", "grateful", "!", "can't believe",
    "prefers", "favorite", "allerg",
];
static CONSEQUENTIAL_MARKERS: &[&str] = &[
    "allerg", "deadline", "owe", "medical", "emergency", "urgent", "surgery", "diagnos",
    "legal", "contract", "payment due", "eviction", "fired", "layoff",
];

/// Computes the five salience factors and the final integer score.
pub struct SalienceScorer;

impl SalienceScorer {
    /// Score `text`/`features` under `context` (spec §4.3).
    #[must_use]
    pub fn score(text: &str, features: &ExtractedFeatures, context: &ScoringContext) -> SalienceFactors {
        SalienceFactors {
            emotion: Self::emotion_factor(text),
            novelty: Self::novelty_factor(features, context),
            relevance: Self::relevance_factor(features, context),
            social: Self::social_factor(features, context),
            consequential: Self::consequential_factor(text, features),
        }
    }

    /// `salience = round(100 * sum(weight * factor))`.
    #[must_use]
    pub fn salience_from_factors(factors: &SalienceFactors) -> u8 {
        let raw = (factors.weighted_sum() * 100.0).round();
        raw.clamp(0.0, 100.0) as u8
    }

    fn emotion_factor(text: &str) -> f64 {
        let lower = text.to_lowercase();
        let hits = EMOTION_MARKERS.iter().filter(|m| lower.contains(*m)).count();
        (hits as f64 / 2.0).min(1.0)
    }

    fn novelty_factor(features: &ExtractedFeatures, context: &ScoringContext) -> f64 {
        if features.people.is_empty() && features.topics.is_empty() {
            return 0.3; // baseline novelty for content with no trackable entities
        }
        let window_start = context.now - chrono::Duration::days(30);
        let recent: Vec<&Memory> = context
            .recent_memories
            .iter()
            .filter(|m| m.created_at >= window_start)
            .collect();
        if recent.is_empty() {
            return 1.0;
        }
        let mut seen_before = 0usize;
        let mut total = 0usize;
        for person in &features.people {
            total += 1;
            if recent.iter().any(|m| m.extracted_features.people.contains(person)) {
                seen_before += 1;
            }
        }
        for topic in &features.topics {
            total += 1;
            if recent.iter().any(|m| m.all_topics().contains(topic)) {
                seen_before += 1;
            }
        }
        if total == 0 {
            return 1.0;
        }
        1.0 - (seen_before as f64 / total as f64)
    }

    fn relevance_factor(features: &ExtractedFeatures, context: &ScoringContext) -> f64 {
        let mut context_set: HashSet<String> = context
            .context_people
            .iter()
            .chain(context.context_topics.iter())
            .cloned()
            .collect();
        if let Some(activity) = &context.context_activity {
            context_set.insert(activity.clone());
        }
        if context_set.is_empty() {
            return 0.0;
        }
        let feature_set: HashSet<String> = features.people.iter().chain(features.topics.iter()).cloned().collect();
        jaccard(&feature_set, &context_set)
    }

    fn social_factor(features: &ExtractedFeatures, context: &ScoringContext) -> f64 {
        if features.people.is_empty() {
            return 0.0;
        }
        let base = 0.6;
        let recency_boost = features
            .people
            .iter()
            .filter_map(|name| context.relationships.iter().find(|r| &r.contact_name == name))
            .map(|rel| {
                let days = rel.days_since_last_interaction(context.now);
                if days <= 7 {
                    0.4
                } else if days <= 30 {
                    0.2
                } else {
                    0.0
                }
            })
            .fold(0.0_f64, f64::max);
        (base + recency_boost).min(1.0)
    }

    fn consequential_factor(text: &str, features: &ExtractedFeatures) -> f64 {
        let lower = text.to_lowercase();
        let marker_hits = CONSEQUENTIAL_MARKERS.iter().filter(|m| lower.contains(*m)).count();
        let has_commitment = !features.commitments.is_empty();
        let has_sensitivity = !features.sensitivities.is_empty();
        let mut score = (marker_hits as f64 / 2.0).min(1.0);
        if has_commitment {
            score = (score + 0.4).min(1.0);
        }
        if has_sensitivity {
            score = (score + 0.4).min(1.0);
        }
        score
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::types::{Commitment, LoopOwner, LoopType};

    fn ctx(now: DateTime<Utc>) -> ScoringContext {
        ScoringContext {
            now,
            ..Default::default()
        }
    }

    #[test]
    fn sarah_shellfish_scores_high() {
        let now = Utc::now();
        let features = ExtractedFeatures {
            people: ["Sarah".to_string()].into_iter().collect(),
            topics: ["shellfish".to_string()].into_iter().collect(),
            commitments: Vec::new(),
            events: Vec::new(),
            sensitivities: vec!["allerg".to_string()],
        };
        let factors = SalienceScorer::score(
            "Sarah prefers morning meetings and is allergic to shellfish",
            &features,
            &ctx(now),
        );
        let salience = SalienceScorer::salience_from_factors(&factors);
        assert!(salience >= 65, "expected salience >= 65, got {salience}");
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let now = Utc::now();
        let features = ExtractedFeatures {
            people: ["Dan".to_string()].into_iter().collect(),
            topics: HashSet::new(),
            commitments: vec![Commitment {
                text: "I owe Dan the Q2 draft".into(),
                owner: LoopOwner::SelfOwner,
                other_party: Some("Dan".into()),
                due_date: None,
                loop_type: LoopType::Task,
            }],
            events: Vec::new(),
            sensitivities: Vec::new(),
        };
        let context = ctx(now);
        let a = SalienceScorer::score("I owe Dan the Q2 draft", &features, &context);
        let b = SalienceScorer::score("I owe Dan the Q2 draft", &features, &context);
        assert_eq!(
            SalienceScorer::salience_from_factors(&a),
            SalienceScorer::salience_from_factors(&b)
        );
    }

    #[test]
    fn empty_context_has_zero_relevance() {
        let features = ExtractedFeatures::default();
        let factors = SalienceScorer::score("hello there", &features, &ctx(Utc::now()));
        assert_eq!(factors.relevance, 0.0);
        assert_eq!(factors.social, 0.0);
    }

    proptest! {
        /// Spec §4.3: scoring is a pure function of its inputs, so calling it
        /// twice on the same `(text, features, context)` must produce
        /// byte-identical factors and the same integer salience.
        #[test]
        fn score_is_idempotent(
            text in ".{0,80}",
            people in proptest::collection::hash_set("[A-Za-z]{2,10}", 0..4),
            topics in proptest::collection::hash_set("[a-z]{2,10}", 0..4),
        ) {
            let features = ExtractedFeatures {
                people,
                topics,
                commitments: Vec::new(),
                events: Vec::new(),
                sensitivities: Vec::new(),
            };
            let context = ctx(Utc::now());
            let a = SalienceScorer::score(&text, &features, &context);
            let b = SalienceScorer::score(&text, &features, &context);
            prop_assert_eq!(a, b);
            prop_assert_eq!(
                SalienceScorer::salience_from_factors(&a),
                SalienceScorer::salience_from_factors(&b)
            );
        }
    }
}
