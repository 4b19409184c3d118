//! Anticipation engine (C8, spec §4.7): turns context observations into
//! recurring patterns and, once formed, pre-surfaces predicted contexts
//! ahead of calendar events.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{Datelike, Duration, Timelike, Utc};
use tracing::instrument;
use uuid::Uuid;

use tokio_util::sync::CancellationToken;

use crate::config::MemoryConfig;
use crate::constants::anticipation_weights as w;
use crate::error::Result;
use crate::retrieval::{RecallQuery, RetrievalEngine};
use crate::storage::PersistenceGateway;
use crate::types::{
    AnticipatedContext, AnticipationReadiness, CalendarEvent, ContextFrame, ContextObservation,
    ContextPrototype, FeatureKey, Pattern, PatternFeedback, PatternFeedbackAction, PatternStatus,
    TimeOfDay,
};

/// Result of one `anticipate` call (spec §4.7): either a not-ready
/// status, or the set of forecasts that crossed `minConfidenceSurface`.
#[derive(Debug, Clone)]
pub enum AnticipationResult {
    /// Not enough observation history yet.
    NotReady(AnticipationReadiness),
    /// Forecasts for calendar events in the look-ahead window.
    Ready(Vec<AnticipatedContext>),
}

/// `dayOutlook` response (spec §4.7).
#[derive(Debug, Clone)]
pub struct DayOutlook {
    /// Short natural-language summary of the day ahead.
    pub outlook: String,
    /// Summaries of the user's formed patterns.
    pub insights: Vec<String>,
    /// Up to 5 upcoming context-switch predictions.
    pub upcoming_context_switches: Vec<AnticipatedContext>,
}

/// Pattern-formation and prediction engine, layered over the
/// persistence gateway and the retrieval engine (for `suggestedMemories`).
pub struct AnticipationEngine<G, E, V> {
    gateway: Arc<G>,
    retrieval: Arc<RetrievalEngine<G, E, V>>,
    config: MemoryConfig,
}

impl<G, E, V> AnticipationEngine<G, E, V>
where
    G: PersistenceGateway + 'static,
    E: crate::providers::Embedder + 'static,
    V: crate::providers::VectorStore + 'static,
{
    /// Construct an anticipation engine.
    #[must_use]
    pub fn new(gateway: Arc<G>, retrieval: Arc<RetrievalEngine<G, E, V>>, config: MemoryConfig) -> Self {
        Self { gateway, retrieval, config }
    }

    /// Emit a [`ContextObservation`] from a just-updated frame (spec §4.7
    /// "Whenever a frame is set ... emit a ContextObservation"). Called
    /// by the context frame manager on every `setContext`.
    #[instrument(skip(self, frame))]
    pub async fn observe(&self, user: &str, frame: &ContextFrame) -> Result<()> {
        let now = frame.last_updated;
        let recurring_event_title = frame
            .calendar
            .as_ref()
            .and_then(|c| c.value.iter().find(|e| e.starts_at <= now && now <= e.ends_at))
            .map(|e| e.title.clone());
        let location_bucket = frame.location.as_ref().map(|d| location_bucket(&d.value));
        let observation = ContextObservation {
            user: user.to_string(),
            observed_at: now,
            time_of_day: TimeOfDay::from_hour(now.hour()),
            day_of_week: u8::try_from(now.weekday().num_days_from_monday()).unwrap_or(0),
            location_bucket,
            people: frame.people.as_ref().map(|d| d.value.clone()).unwrap_or_default(),
            activity: frame.activity.as_ref().map(|d| d.value.clone()),
            recurring_event_title,
        };
        self.gateway.append_observation(observation).await
    }

    /// Scheduled pattern-formation pass (spec §4.7 "a scheduled pass
    /// (e.g., hourly)"). Buckets every observation on file by
    /// `featureKey`, rebuilding prototypes and counts from scratch — the
    /// observation ledger is the source of truth, patterns are a derived
    /// cache over it.
    #[instrument(skip(self))]
    pub async fn form_patterns(&self, user: &str) -> Result<usize> {
        let observations = self.gateway.list_observations(user).await?;
        let mut buckets: HashMap<FeatureKey, Vec<&ContextObservation>> = HashMap::new();
        for obs in &observations {
            let key = FeatureKey {
                time_of_day: obs.time_of_day,
                day_of_week: obs.day_of_week,
                location_bucket: obs.location_bucket,
                recurring_event_title: obs.recurring_event_title.clone(),
            };
            buckets.entry(key).or_default().push(obs);
        }

        let existing = self.gateway.list_patterns(user).await?;
        let mut by_key: HashMap<FeatureKey, Pattern> =
            existing.into_iter().map(|p| (p.feature_key.clone(), p)).collect();

        let mut formed_count = 0usize;
        for (key, obs) in buckets {
            if obs.len() < self.config.pattern_min_count as usize {
                continue;
            }
            let first_observed_at = obs.iter().map(|o| o.observed_at).min().expect("non-empty bucket");
            let last_observed_at = obs.iter().map(|o| o.observed_at).max().expect("non-empty bucket");
            let prototype = build_prototype(&obs);

            let pattern = by_key.entry(key.clone()).or_insert_with(|| Pattern {
                id: Uuid::new_v4(),
                user: user.to_string(),
                feature_key: key.clone(),
                associated_context: ContextPrototype::default(),
                count: 0,
                confidence: 0.0,
                last_observed_at,
                first_observed_at,
                formed_at: None,
                feedback_ledger: Vec::new(),
            });
            pattern.count = u32::try_from(obs.len()).unwrap_or(u32::MAX);
            pattern.associated_context = prototype;
            pattern.first_observed_at = first_observed_at;
            pattern.last_observed_at = last_observed_at;
            pattern.confidence = compute_confidence(pattern.count, &pattern.feedback_ledger);

            let status = pattern.status(self.config.pattern_min_count, self.config.pattern_formation_days);
            if status == PatternStatus::Formed && pattern.formed_at.is_none() {
                pattern.formed_at = Some(last_observed_at);
                formed_count += 1;
            }
            self.gateway.put_pattern(pattern.clone()).await?;
        }
        Ok(formed_count)
    }

    /// `anticipate(user, calendar?, lookAheadMinutes)` (spec §4.7).
    #[instrument(skip(self, calendar))]
    pub async fn anticipate(
        &self,
        user: &str,
        calendar: &[CalendarEvent],
        look_ahead_minutes: i64,
    ) -> Result<AnticipationResult> {
        let observations = self.gateway.list_observations(user).await?;
        let patterns = self.gateway.list_patterns(user).await?;
        let formed: Vec<&Pattern> = patterns
            .iter()
            .filter(|p| p.status(self.config.pattern_min_count, self.config.pattern_formation_days) == PatternStatus::Formed)
            .collect();

        let observed_days = observation_window_days(&observations);
        if formed.is_empty() || observed_days < self.config.pattern_formation_days {
            return Ok(AnticipationResult::NotReady(AnticipationReadiness {
                ready_for_prediction: false,
                days_until_ready: (self.config.pattern_formation_days - observed_days).max(0),
            }));
        }

        let now = Utc::now();
        let horizon = now + Duration::minutes(look_ahead_minutes);
        let mut forecasts = Vec::new();
        for event in calendar.iter().filter(|e| e.starts_at >= now && e.starts_at <= horizon) {
            let key = FeatureKey {
                time_of_day: TimeOfDay::from_hour(event.starts_at.hour()),
                day_of_week: u8::try_from(event.starts_at.weekday().num_days_from_monday()).unwrap_or(0),
                location_bucket: None,
                recurring_event_title: Some(event.title.clone()),
            };
            for pattern in &formed {
                if !pattern_matches(&pattern.feature_key, &key) {
                    continue;
                }
                if pattern.confidence < self.config.min_confidence_surface {
                    continue;
                }
                let suggested_memories = self.suggest_memories(user, &pattern.associated_context).await?;
                forecasts.push(AnticipatedContext {
                    trigger_time: event.starts_at,
                    confidence: pattern.confidence,
                    features: pattern.associated_context.clone(),
                    suggested_briefings: pattern.associated_context.people.clone(),
                    suggested_topics: suggested_memories.iter().flat_map(|m| m.all_topics()).collect(),
                    suggested_memories,
                    pattern_id: pattern.id,
                });
            }
        }
        Ok(AnticipationResult::Ready(forecasts))
    }

    async fn suggest_memories(&self, user: &str, prototype: &ContextPrototype) -> Result<Vec<crate::types::Memory>> {
        let query = RecallQuery {
            query: prototype.activity.clone().unwrap_or_default(),
            limit: 3,
            people: if prototype.people.is_empty() { None } else { Some(prototype.people.clone()) },
            ..Default::default()
        };
        let hits = self.retrieval.recall(user, &query, &CancellationToken::new()).await?;
        Ok(hits.into_iter().take(3).map(|h| h.memory).collect())
    }

    /// `dayOutlook` (spec §4.7).
    #[instrument(skip(self, calendar))]
    pub async fn day_outlook(&self, user: &str, calendar: &[CalendarEvent]) -> Result<DayOutlook> {
        let patterns = self.gateway.list_patterns(user).await?;
        let formed: Vec<&Pattern> = patterns
            .iter()
            .filter(|p| p.status(self.config.pattern_min_count, self.config.pattern_formation_days) == PatternStatus::Formed)
            .collect();
        let insights = formed
            .iter()
            .map(|p| describe_pattern(p))
            .collect::<Vec<_>>();

        let switches = match self.anticipate(user, calendar, 24 * 60).await? {
            AnticipationResult::Ready(mut forecasts) => {
                forecasts.sort_by(|a, b| a.trigger_time.cmp(&b.trigger_time));
                forecasts.truncate(5);
                forecasts
            }
            AnticipationResult::NotReady(_) => Vec::new(),
        };

        let outlook = if formed.is_empty() {
            "Still learning your routines — check back in a couple of weeks.".to_string()
        } else {
            format!("{} recurring pattern(s) recognized for today.", formed.len())
        };

        Ok(DayOutlook {
            outlook,
            insights,
            upcoming_context_switches: switches,
        })
    }

    /// `patternStats(user)`: raw pattern list with derived status, for
    /// the `patternStats` tool surface (spec §6).
    #[instrument(skip(self))]
    pub async fn pattern_stats(&self, user: &str) -> Result<Vec<(Pattern, PatternStatus)>> {
        let patterns = self.gateway.list_patterns(user).await?;
        Ok(patterns
            .into_iter()
            .map(|p| {
                let status = p.status(self.config.pattern_min_count, self.config.pattern_formation_days);
                (p, status)
            })
            .collect())
    }

    /// `memoryFeedback`-adjacent pattern feedback (spec §4.7 confidence
    /// reinforcement/decay rules).
    #[instrument(skip(self))]
    pub async fn pattern_feedback(&self, pattern_id: Uuid, action: PatternFeedbackAction) -> Result<Option<Pattern>> {
        let Some(mut pattern) = self.gateway.get_pattern(pattern_id).await? else {
            return Ok(None);
        };
        pattern.feedback_ledger.push(PatternFeedback { action, at: Utc::now() });
        pattern.confidence = compute_confidence(pattern.count, &pattern.feedback_ledger);
        pattern.confidence = match action {
            PatternFeedbackAction::Used => (pattern.confidence + w::REINFORCE_USED).min(1.0),
            PatternFeedbackAction::Dismissed => (pattern.confidence - w::DECAY_DISMISSED).max(0.0),
            PatternFeedbackAction::Ignored => (pattern.confidence - w::DECAY_IGNORED).max(0.0),
        };
        self.gateway.put_pattern(pattern.clone()).await?;
        Ok(Some(pattern))
    }
}

fn describe_pattern(pattern: &Pattern) -> String {
    let people = if pattern.associated_context.people.is_empty() {
        String::new()
    } else {
        format!(" with {}", pattern.associated_context.people.join(", "))
    };
    format!(
        "{:?} {}{}{}",
        pattern.feature_key.time_of_day,
        pattern.feature_key.recurring_event_title.as_deref().unwrap_or("routine"),
        people,
        if let Some(loc) = pattern.associated_context.location.as_deref() {
            format!(" at {loc}")
        } else {
            String::new()
        }
    )
}

fn pattern_matches(pattern_key: &FeatureKey, candidate: &FeatureKey) -> bool {
    pattern_key.time_of_day == candidate.time_of_day
        && pattern_key.day_of_week == candidate.day_of_week
        && (pattern_key.recurring_event_title.is_none() || pattern_key.recurring_event_title == candidate.recurring_event_title)
}

/// Low-cardinality hash bucket for a location string (spec §4.7
/// "locationBucket (low-cardinality hash of location)"). Truncated to 12
/// bits so nearby-but-distinct raw strings still group coarsely once a
/// real geocoder feeds this; here it just hashes the normalized string.
fn location_bucket(location: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    location.trim().to_lowercase().hash(&mut hasher);
    hasher.finish() & 0xFFF
}

fn build_prototype(observations: &[&ContextObservation]) -> ContextPrototype {
    let mut location_counts: HashMap<u64, u32> = HashMap::new();
    let mut people_counts: HashMap<String, u32> = HashMap::new();
    let mut activity_counts: HashMap<String, u32> = HashMap::new();

    for obs in observations {
        if let Some(bucket) = obs.location_bucket {
            *location_counts.entry(bucket).or_insert(0) += 1;
        }
        for person in &obs.people {
            *people_counts.entry(person.clone()).or_insert(0) += 1;
        }
        if let Some(activity) = &obs.activity {
            *activity_counts.entry(activity.clone()).or_insert(0) += 1;
        }
    }

    let location = location_counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(bucket, _)| format!("bucket-{bucket}"));

    let mut people: Vec<(String, u32)> = people_counts.into_iter().collect();
    people.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let activity = activity_counts.into_iter().max_by_key(|(_, count)| *count).map(|(a, _)| a);

    ContextPrototype {
        location,
        people: people.into_iter().map(|(name, _)| name).collect(),
        activity,
    }
}

fn observation_window_days(observations: &[ContextObservation]) -> i64 {
    let Some(first) = observations.iter().map(|o| o.observed_at).min() else {
        return 0;
    };
    let last = observations.iter().map(|o| o.observed_at).max().unwrap_or(first);
    (last - first).num_days()
}

/// `confidence = 0.5*normalizedSupport + 0.5*feedbackRatio` (spec §4.7).
fn compute_confidence(count: u32, feedback_ledger: &[PatternFeedback]) -> f64 {
    let normalized_support = (f64::from(count) / w::SUPPORT_SATURATION_COUNT).min(1.0);
    let used = feedback_ledger.iter().filter(|f| f.action == PatternFeedbackAction::Used).count() as f64;
    let ignored = feedback_ledger.iter().filter(|f| f.action == PatternFeedbackAction::Ignored).count() as f64;
    let dismissed = feedback_ledger.iter().filter(|f| f.action == PatternFeedbackAction::Dismissed).count() as f64;
    let other = ignored + dismissed;
    let feedback_ratio = (used + 0.5 * other) / (used + ignored + dismissed + f64::EPSILON);
    let feedback_ratio = if feedback_ledger.is_empty() { 0.5 } else { feedback_ratio };
    (w::SUPPORT * normalized_support + w::FEEDBACK * feedback_ratio).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_scales_with_support() {
        let low = compute_confidence(3, &[]);
        let high = compute_confidence(30, &[]);
        assert!(high > low);
    }

    #[test]
    fn confidence_empty_feedback_defaults_neutral() {
        let conf = compute_confidence(0, &[]);
        assert!((conf - 0.25).abs() < 1e-9);
    }

    #[test]
    fn feature_key_match_requires_time_and_day() {
        let a = FeatureKey {
            time_of_day: TimeOfDay::Morning,
            day_of_week: 0,
            location_bucket: None,
            recurring_event_title: None,
        };
        let b = FeatureKey {
            time_of_day: TimeOfDay::Morning,
            day_of_week: 0,
            location_bucket: Some(7),
            recurring_event_title: None,
        };
        assert!(pattern_matches(&a, &b));
        let c = FeatureKey {
            time_of_day: TimeOfDay::Evening,
            day_of_week: 0,
            location_bucket: None,
            recurring_event_title: None,
        };
        assert!(!pattern_matches(&a, &c));
    }
}
