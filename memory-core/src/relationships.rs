//! Relationship aggregate maintenance (spec §3, §4.3 step 9): every
//! memory write that mentions a person folds into that person's
//! [`Relationship`], recomputing the derived engagement trend. Kept as
//! its own module since both enrichment (writes) and briefing/retrieval
//! (reads `daysSinceLastInteraction`) depend on the same trend logic.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::types::{EngagementTrend, Relationship};

/// A single fold-in of a mention into a contact's relationship state.
#[derive(Debug, Clone)]
pub struct InteractionDelta {
    /// When the interaction happened.
    pub at: DateTime<Utc>,
    /// Sensitivities surfaced alongside this mention, unioned into the
    /// relationship's running `sensitivity_set`.
    pub sensitivities: Vec<String>,
}

/// Start a brand-new relationship from a first-ever mention.
#[must_use]
pub fn new_relationship(user: String, contact_name: String, delta: &InteractionDelta, cold_threshold_days: i64) -> Relationship {
    let mut rel = Relationship {
        user,
        contact_name,
        total_interactions: 0,
        last_interaction_at: delta.at,
        recent_interactions: Vec::new(),
        engagement_trend: EngagementTrend::Stable,
        sensitivity_set: HashSet::new(),
        cold_threshold_days,
    };
    apply(&mut rel, delta);
    rel
}

/// Fold `delta` into an existing relationship, recomputing the trend.
/// Idempotent on identical deltas only in the sense that replaying the
/// exact same `(at, sensitivities)` twice is harmless bookkeeping-wise;
/// callers are responsible for not double-counting a single memory.
pub fn apply(rel: &mut Relationship, delta: &InteractionDelta) {
    rel.total_interactions += 1;
    if delta.at > rel.last_interaction_at || rel.total_interactions == 1 {
        rel.last_interaction_at = delta.at;
    }
    rel.recent_interactions.push(delta.at);
    let cutoff = delta.at - Duration::days(30);
    rel.recent_interactions.retain(|t| *t >= cutoff);
    rel.sensitivity_set.extend(delta.sensitivities.iter().cloned());
    rel.engagement_trend = recompute_trend(rel, delta.at);
}

/// Recompute `engagementTrend` as of `now` (spec §4.3 step 9): "rising"
/// if the 7-day count exceeds the 30-day mean (scaled to a weekly rate),
/// "falling" if the inverse, "cold" if `daysSinceLastInteraction` exceeds
/// `coldThresholdDays`, else "stable". Cold takes priority over the
/// rising/falling comparison since a contact with zero recent activity
/// has no meaningful weekly rate to compare against.
#[must_use]
pub fn recompute_trend(rel: &Relationship, now: DateTime<Utc>) -> EngagementTrend {
    let days_since = rel.days_since_last_interaction(now);
    if days_since > rel.cold_threshold_days {
        return EngagementTrend::Cold;
    }
    let thirty_cutoff = now - Duration::days(30);
    let seven_cutoff = now - Duration::days(7);
    let thirty_day_count = rel.recent_interactions.iter().filter(|t| **t >= thirty_cutoff).count();
    let seven_day_count = rel.recent_interactions.iter().filter(|t| **t >= seven_cutoff).count();
    let weekly_mean = thirty_day_count as f64 / 30.0 * 7.0;
    if (seven_day_count as f64) > weekly_mean {
        EngagementTrend::Rising
    } else if (seven_day_count as f64) < weekly_mean {
        EngagementTrend::Falling
    } else {
        EngagementTrend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_interaction_starts_stable() {
        let now = Utc::now();
        let rel = new_relationship(
            "u1".into(),
            "Sarah".into(),
            &InteractionDelta {
                at: now,
                sensitivities: vec!["allerg".into()],
            },
            30,
        );
        assert_eq!(rel.total_interactions, 1);
        assert!(rel.sensitivity_set.contains("allerg"));
    }

    #[test]
    fn long_silence_marks_cold() {
        let now = Utc::now();
        let mut rel = new_relationship(
            "u1".into(),
            "Dan".into(),
            &InteractionDelta {
                at: now - Duration::days(60),
                sensitivities: vec![],
            },
            30,
        );
        rel.engagement_trend = recompute_trend(&rel, now);
        assert_eq!(rel.engagement_trend, EngagementTrend::Cold);
    }

    #[test]
    fn burst_of_recent_activity_rises() {
        let now = Utc::now();
        let mut rel = new_relationship(
            "u1".into(),
            "Dan".into(),
            &InteractionDelta {
                at: now - Duration::days(20),
                sensitivities: vec![],
            },
            30,
        );
        for days_ago in [1, 2, 3, 4] {
            apply(
                &mut rel,
                &InteractionDelta {
                    at: now - Duration::days(days_ago),
                    sensitivities: vec![],
                },
            );
        }
        assert_eq!(rel.engagement_trend, EngagementTrend::Rising);
    }
}
