//! Briefing & status (C7, spec §4.6-adjacent, §6): per-person briefings,
//! a daily status summary, and thin loop-lifecycle wrappers used by the
//! service facade.

use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;
use crate::extraction::canonicalize_against;
use crate::storage::{MemoryFilter, PersistenceGateway};
use crate::types::{Memory, OpenLoop, TimelineEvent};

/// A quick or full briefing on one person (spec §6 `getBriefing`).
#[derive(Debug, Clone)]
pub struct PersonBriefing {
    /// Canonicalized person name.
    pub name: String,
    /// Open loops involving this person.
    pub open_loops: Vec<OpenLoop>,
    /// Timeline events in the next 14 days.
    pub upcoming_events: Vec<TimelineEvent>,
    /// Recent high-salience memories, capped for a "quick" briefing.
    pub recent_memories: Vec<Memory>,
    /// Sensitivities on file for this person.
    pub sensitivities: Vec<String>,
    /// Days since last interaction, if a relationship exists.
    pub days_since_last_interaction: Option<i64>,
}

/// Aggregate counters for `getStatus` (spec §6).
#[derive(Debug, Clone, Default)]
pub struct StatusSummary {
    /// Total memories stored for the user.
    pub memory_count: usize,
    /// Open (unclosed) loops.
    pub open_loop_count: usize,
    /// Loops past their due date.
    pub overdue_loop_count: usize,
    /// Upcoming timeline events in the next 14 days.
    pub upcoming_event_count: usize,
    /// Memories still waiting on a vector upsert.
    pub pending_vector_retry_count: usize,
}

/// A one-line summary of the day ahead (spec §4.7 `dayOutlook`'s
/// non-anticipation half: greeting + loop/event counts; the anticipation
/// engine supplies `insights`/`upcomingContextSwitches` separately).
#[derive(Debug, Clone)]
pub struct DailyStatus {
    /// Time-of-day-appropriate greeting.
    pub greeting: String,
    /// Loops due today or overdue.
    pub loops_due_today: Vec<OpenLoop>,
    /// Events happening today.
    pub events_today: Vec<TimelineEvent>,
}

/// Briefing and status reads, layered over the persistence gateway.
pub struct BriefingService<G> {
    gateway: Arc<G>,
}

impl<G> BriefingService<G>
where
    G: PersistenceGateway + 'static,
{
    /// Construct a briefing service.
    #[must_use]
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// `getBriefing({person, quick?})` (spec §6).
    #[instrument(skip(self))]
    pub async fn person_briefing(&self, user: &str, person: &str, quick: bool) -> Result<PersonBriefing> {
        let canonical = canonicalize_against(self.gateway.as_ref(), user, person).await?;
        let now = Utc::now();
        let horizon = now + Duration::days(14);

        let open_loops = self.gateway.find_loops(user, Some(&canonical), true).await?;
        let upcoming_events = self
            .gateway
            .find_timeline_events(user, Some(&canonical), now, horizon)
            .await?;

        let filter = MemoryFilter {
            user: Some(user.to_string()),
            people: Some(vec![canonical.clone()]),
            min_salience: if quick { Some(70) } else { None },
            ..Default::default()
        };
        let mut recent_memories = self.gateway.find_memories(&filter).await?;
        recent_memories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent_memories.truncate(if quick { 3 } else { 20 });

        let relationship = self.gateway.get_relationship(user, &canonical).await?;
        let sensitivities = relationship
            .as_ref()
            .map(|r| r.sensitivity_set.iter().cloned().collect())
            .unwrap_or_default();
        let days_since_last_interaction = relationship.map(|r| r.days_since_last_interaction(now));

        Ok(PersonBriefing {
            name: canonical,
            open_loops,
            upcoming_events,
            recent_memories,
            sensitivities,
            days_since_last_interaction,
        })
    }

    /// `listLoops({owner?, person?, includeOverdue?})` (spec §6). `owner`
    /// is applied client-side since the gateway indexes loops by
    /// `(user, person)`, not by owner.
    #[instrument(skip(self))]
    pub async fn list_loops(
        &self,
        user: &str,
        person: Option<&str>,
        owner: Option<crate::types::LoopOwner>,
        include_overdue_only: bool,
    ) -> Result<Vec<OpenLoop>> {
        let mut loops = self.gateway.find_loops(user, person, true).await?;
        if let Some(owner) = owner {
            loops.retain(|l| l.owner == owner);
        }
        if include_overdue_only {
            let now = Utc::now();
            loops.retain(|l| l.is_overdue(now));
        }
        Ok(loops)
    }

    /// `closeLoop({loopId, note?})` (spec §4.1): idempotent, returns the
    /// original `closedAt` on a double-close.
    #[instrument(skip(self, note))]
    pub async fn close_loop(&self, loop_id: Uuid, note: Option<String>) -> Result<DateTime<Utc>> {
        self.gateway.close_loop(loop_id, note).await
    }

    /// `getStatus({})` (spec §6).
    #[instrument(skip(self))]
    pub async fn status(&self, user: &str) -> Result<StatusSummary> {
        let filter = MemoryFilter::for_user(user);
        let memories = self.gateway.find_memories(&filter).await?;
        let loops = self.gateway.find_loops(user, None, true).await?;
        let now = Utc::now();
        let horizon = now + Duration::days(14);
        let events = self.gateway.find_timeline_events(user, None, now, horizon).await?;
        let pending_vector_retry_count = memories.iter().filter(|m| m.pending_vector_retry).count();
        let overdue_loop_count = loops.iter().filter(|l| l.is_overdue(now)).count();

        Ok(StatusSummary {
            memory_count: memories.len(),
            open_loop_count: loops.len(),
            overdue_loop_count,
            upcoming_event_count: events.len(),
            pending_vector_retry_count,
        })
    }

    /// `dayOutlook`'s non-anticipation half: a greeting plus today's due
    /// loops and events (the anticipation engine supplies the rest; see
    /// [`crate::anticipation::AnticipationEngine::day_outlook`]).
    #[instrument(skip(self))]
    pub async fn daily_status(&self, user: &str) -> Result<DailyStatus> {
        let now = Utc::now();
        let end_of_day = now + (chrono::Duration::days(1) - chrono::Duration::seconds(now.time().num_seconds_from_midnight().into()));
        let loops = self.gateway.find_loops(user, None, true).await?;
        let loops_due_today: Vec<OpenLoop> = loops
            .into_iter()
            .filter(|l| l.due_date.is_some_and(|d| d <= end_of_day) || l.is_overdue(now))
            .collect();
        let events = self
            .gateway
            .find_timeline_events(user, None, now, end_of_day)
            .await?;

        Ok(DailyStatus {
            greeting: greeting_for_hour(now),
            loops_due_today,
            events_today: events,
        })
    }
}

fn greeting_for_hour(now: DateTime<Utc>) -> String {
    match now.hour() {
        5..=11 => "Good morning".to_string(),
        12..=16 => "Good afternoon".to_string(),
        17..=20 => "Good evening".to_string(),
        _ => "Hello".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_matches_hour_bucket() {
        let morning = Utc::now().date_naive().and_hms_opt(8, 0, 0).unwrap().and_utc();
        assert_eq!(greeting_for_hour(morning), "Good morning");
        let night = Utc::now().date_naive().and_hms_opt(23, 0, 0).unwrap().and_utc();
        assert_eq!(greeting_for_hour(night), "Hello");
    }
}
