//! Context frame manager (C6, spec §4.6): per-device frames, unified
//! fusion across active devices, and "what matters now" lookups.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::instrument;

use crate::concurrency::KeyedLocks;
use crate::error::{Error, Result};
use crate::storage::PersistenceGateway;
use crate::types::{
    CalendarEvent, ContextFrame, DeviceType, Dimension, OpenLoop, PersonContext, Provenance,
    RelevanceSnapshot, TimelineEvent, UnifiedUserContext,
};

/// Which dimensions `setContext` is updating; all `None` fields are left
/// untouched on the stored frame (spec §4.6).
#[derive(Debug, Clone, Default)]
pub struct ContextUpdate {
    /// New location, if changing.
    pub location: Option<String>,
    /// New people set, if changing.
    pub people: Option<HashSet<String>>,
    /// New activity, if changing.
    pub activity: Option<String>,
    /// New mood, if changing.
    pub mood: Option<String>,
    /// New calendar snapshot, if changing.
    pub calendar: Option<Vec<CalendarEvent>>,
}

/// Dimensions `clearContext` should reset; `None` clears everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearDimensions {
    /// Clear location.
    pub location: bool,
    /// Clear people.
    pub people: bool,
    /// Clear activity.
    pub activity: bool,
    /// Clear mood.
    pub mood: bool,
    /// Clear calendar.
    pub calendar: bool,
}

impl ClearDimensions {
    /// Clear every dimension.
    #[must_use]
    pub fn all() -> Self {
        Self {
            location: true,
            people: true,
            activity: true,
            mood: true,
            calendar: true,
        }
    }
}

/// Manages per-(user, device) context frames and their fused view.
pub struct ContextFrameManager<G> {
    gateway: Arc<G>,
    frame_locks: KeyedLocks<(String, String)>,
    max_devices_per_user: usize,
    unified_fusion_window_min: i64,
}

impl<G> ContextFrameManager<G>
where
    G: PersistenceGateway + 'static,
{
    /// Construct a manager over `gateway`.
    #[must_use]
    pub fn new(gateway: Arc<G>, max_devices_per_user: usize, unified_fusion_window_min: i64) -> Self {
        Self {
            gateway,
            frame_locks: KeyedLocks::new(),
            max_devices_per_user,
            unified_fusion_window_min,
        }
    }

    /// `setContext(user, update, {deviceId, deviceType})` (spec §4.6).
    /// Returns the updated frame and its immediately-computed
    /// [`RelevanceSnapshot`].
    #[instrument(skip(self, update))]
    pub async fn set_context(
        &self,
        user: &str,
        device_id: &str,
        device_type: DeviceType,
        update: &ContextUpdate,
    ) -> Result<(ContextFrame, RelevanceSnapshot)> {
        let key = (user.to_string(), device_id.to_string());
        self.frame_locks
            .with_lock(key, || self.set_context_locked(user, device_id, device_type, update))
            .await
    }

    async fn set_context_locked(
        &self,
        user: &str,
        device_id: &str,
        device_type: DeviceType,
        update: &ContextUpdate,
    ) -> Result<(ContextFrame, RelevanceSnapshot)> {
        let now = Utc::now();
        let mut frame = match self.gateway.get_context_frame(user, device_id).await? {
            Some(existing) => existing,
            None => {
                self.evict_if_at_capacity(user).await?;
                ContextFrame::new(device_id.to_string(), device_type, now)
            }
        };

        if let Some(location) = &update.location {
            frame.location = Some(Dimension::user_set(location.clone(), now));
        }
        if let Some(people) = &update.people {
            frame.people = Some(Dimension::user_set(people.clone(), now));
        }
        if let Some(activity) = &update.activity {
            frame.activity = Some(Dimension::user_set(activity.clone(), now));
        }
        if let Some(mood) = &update.mood {
            frame.mood = Some(Dimension::user_set(mood.clone(), now));
        }
        if let Some(calendar) = &update.calendar {
            frame.calendar = Some(Dimension::user_set(calendar.clone(), now));
        }
        frame.last_updated = now;

        self.gateway.put_context_frame(user, frame.clone()).await?;
        let snapshot = self.relevance_snapshot(user, &frame).await?;
        Ok((frame, snapshot))
    }

    async fn evict_if_at_capacity(&self, user: &str) -> Result<()> {
        let mut frames = self.gateway.list_context_frames(user).await?;
        if frames.len() < self.max_devices_per_user {
            return Ok(());
        }
        frames.sort_by_key(|f| f.last_updated);
        if let Some(oldest) = frames.first() {
            self.gateway.delete_context_frame(user, &oldest.device_id).await?;
        }
        Ok(())
    }

    /// `whatMattersNow(user, deviceId?)` (spec §4.6).
    #[instrument(skip(self))]
    pub async fn what_matters_now(
        &self,
        user: &str,
        device_id: Option<&str>,
    ) -> Result<Option<(ContextFrame, RelevanceSnapshot)>> {
        let Some(device_id) = device_id else {
            return Ok(None);
        };
        let Some(frame) = self.gateway.get_context_frame(user, device_id).await? else {
            return Ok(None);
        };
        let snapshot = self.relevance_snapshot(user, &frame).await?;
        Ok(Some((frame, snapshot)))
    }

    async fn relevance_snapshot(&self, user: &str, frame: &ContextFrame) -> Result<RelevanceSnapshot> {
        let people: Vec<String> = frame
            .people
            .as_ref()
            .map(|d| d.value.iter().cloned().collect())
            .unwrap_or_default();

        let mut about_people = Vec::with_capacity(people.len());
        let mut sensitivities = HashSet::new();
        let mut suggested_topics = HashSet::new();
        let now = Utc::now();
        let horizon = now + Duration::days(14);

        for person in &people {
            let open_loops: Vec<OpenLoop> = self
                .gateway
                .find_loops(user, Some(person), true)
                .await?;
            let upcoming_events: Vec<TimelineEvent> = self
                .gateway
                .find_timeline_events(user, Some(person), now, horizon)
                .await?;
            let filter = crate::storage::MemoryFilter {
                user: Some(user.to_string()),
                people: Some(vec![person.clone()]),
                min_salience: Some(60),
                ..Default::default()
            };
            let mut recent_memories = self.gateway.find_memories(&filter).await?;
            recent_memories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            recent_memories.truncate(5);

            if let Some(rel) = self.gateway.get_relationship(user, person).await? {
                sensitivities.extend(rel.sensitivity_set.iter().cloned());
            }
            for memory in &recent_memories {
                suggested_topics.extend(memory.all_topics());
            }

            about_people.push(PersonContext {
                name: person.clone(),
                open_loops,
                upcoming_events,
                recent_memories,
            });
        }

        Ok(RelevanceSnapshot {
            about_people,
            suggested_topics: suggested_topics.into_iter().collect(),
            sensitivities: sensitivities.into_iter().collect(),
        })
    }

    /// `getUnifiedUserContext(user)` (spec §4.6 fusion rule).
    #[instrument(skip(self))]
    pub async fn unified_context(&self, user: &str) -> Result<UnifiedUserContext> {
        let frames = self.gateway.list_context_frames(user).await?;
        let now = Utc::now();
        let window = Duration::minutes(self.unified_fusion_window_min);
        let mut active: Vec<&ContextFrame> = frames.iter().filter(|f| now - f.last_updated <= window).collect();
        active.sort_by_key(|f| f.device_type.fusion_priority());

        let mut people = HashSet::new();
        for frame in &active {
            if let Some(p) = &frame.people {
                people.extend(p.value.iter().cloned());
            }
        }

        let location = fused_by_priority_then_recency(&active, |f| f.location.as_ref());
        let mood = fused_by_priority_then_recency(&active, |f| f.mood.as_ref());
        let activity = most_recent(&active, |f| f.activity.as_ref());

        let mut by_recency: Vec<&&ContextFrame> = active.iter().collect();
        by_recency.sort_by(|a, b| {
            b.last_updated
                .cmp(&a.last_updated)
                .then_with(|| a.device_type.fusion_priority().cmp(&b.device_type.fusion_priority()))
        });
        let primary_device = by_recency.first().map(|f| f.device_id.clone());
        let mut active_devices: Vec<String> = active.iter().map(|f| f.device_id.clone()).collect();
        active_devices.sort();

        Ok(UnifiedUserContext {
            user: user.to_string(),
            location,
            people,
            activity,
            mood,
            primary_device,
            active_devices,
        })
    }

    /// `clearContext(user, dimensions?, deviceId?)` (spec §4.6). Omitting
    /// `device_id` clears only the synthetic user-level aggregate view —
    /// modeled here as a no-op against device frames, since the unified
    /// context is always recomputed rather than stored.
    #[instrument(skip(self))]
    pub async fn clear_context(
        &self,
        user: &str,
        device_id: Option<&str>,
        dimensions: ClearDimensions,
    ) -> Result<Option<ContextFrame>> {
        let Some(device_id) = device_id else {
            return Ok(None);
        };
        let key = (user.to_string(), device_id.to_string());
        self.frame_locks
            .with_lock(key, || self.clear_context_locked(user, device_id, dimensions))
            .await
    }

    async fn clear_context_locked(
        &self,
        user: &str,
        device_id: &str,
        dimensions: ClearDimensions,
    ) -> Result<Option<ContextFrame>> {
        let Some(mut frame) = self.gateway.get_context_frame(user, device_id).await? else {
            return Err(Error::NotFound(format!("context frame for device {device_id}")));
        };
        if dimensions.location {
            frame.location = None;
        }
        if dimensions.people {
            frame.people = None;
        }
        if dimensions.activity {
            frame.activity = None;
        }
        if dimensions.mood {
            frame.mood = None;
        }
        if dimensions.calendar {
            frame.calendar = None;
        }
        frame.last_updated = Utc::now();
        self.gateway.put_context_frame(user, frame.clone()).await?;
        Ok(Some(frame))
    }
}

/// Mobile wins ties by fusion priority; among equal-priority frames the
/// most recently set dimension wins (spec §4.6 "most-recent among ties").
/// Device id breaks any remaining tie so the result never depends on the
/// order `active` was listed in.
fn fused_by_priority_then_recency<'a, F>(active: &[&'a ContextFrame], select: F) -> Option<String>
where
    F: Fn(&'a ContextFrame) -> Option<&'a Dimension<String>>,
{
    active
        .iter()
        .filter_map(|f| select(f).map(|d| (f.device_type.fusion_priority(), d.set_at, &f.device_id, d.value.clone())))
        .min_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)).then_with(|| a.2.cmp(b.2)))
        .map(|(_, _, _, value)| value)
}

fn most_recent<'a, F>(active: &[&'a ContextFrame], select: F) -> Option<String>
where
    F: Fn(&'a ContextFrame) -> Option<&'a Dimension<String>>,
{
    active
        .iter()
        .filter_map(|f| select(f).map(|d| (d.set_at, &f.device_id, d.value.clone())))
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(a.1)))
        .map(|(_, _, value)| value)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn frame_with_location(device_type: DeviceType, value: &str, minutes_ago: i64) -> ContextFrame {
        let now = Utc::now();
        let set_at = now - Duration::minutes(minutes_ago);
        let mut frame = ContextFrame::new("dev".into(), device_type, set_at);
        frame.location = Some(Dimension {
            value: value.to_string(),
            provenance: Provenance::UserSet,
            set_at,
        });
        frame.last_updated = set_at;
        frame
    }

    #[test]
    fn mobile_wins_location_ties() {
        let mobile = frame_with_location(DeviceType::Mobile, "home", 5);
        let desktop = frame_with_location(DeviceType::Desktop, "office", 5);
        let active = vec![&mobile, &desktop];
        let fused = fused_by_priority_then_recency(&active, |f| f.location.as_ref());
        assert_eq!(fused.as_deref(), Some("home"));
    }

    #[test]
    fn most_recent_wins_when_same_priority() {
        let older = frame_with_location(DeviceType::Desktop, "office", 20);
        let newer = frame_with_location(DeviceType::Desktop, "cafe", 2);
        let active = vec![&older, &newer];
        let fused = fused_by_priority_then_recency(&active, |f| f.location.as_ref());
        assert_eq!(fused.as_deref(), Some("cafe"));
    }

    fn device_type_strategy() -> impl Strategy<Value = DeviceType> {
        prop_oneof![
            Just(DeviceType::Mobile),
            Just(DeviceType::Desktop),
            Just(DeviceType::Web),
            Just(DeviceType::Api),
            Just(DeviceType::Mcp),
        ]
    }

    proptest! {
        /// Spec §4.6: the fusion rule (priority, then most-recent among
        /// ties) picks a winner from the *set* of active frames, so its
        /// result must not depend on the order they're listed in.
        #[test]
        fn fusion_is_permutation_invariant(
            frames in proptest::collection::vec(
                (device_type_strategy(), "[a-z]{2,10}", 0i64..120),
                1..6,
            )
        ) {
            let owned: Vec<ContextFrame> = frames
                .into_iter()
                .enumerate()
                .map(|(i, (device_type, value, minutes_ago))| {
                    let mut frame = frame_with_location(device_type, &value, minutes_ago);
                    frame.device_id = format!("dev{i}");
                    frame
                })
                .collect();
            let forward: Vec<&ContextFrame> = owned.iter().collect();
            let mut reversed = forward.clone();
            reversed.reverse();

            let fused_forward = fused_by_priority_then_recency(&forward, |f| f.location.as_ref());
            let fused_reversed = fused_by_priority_then_recency(&reversed, |f| f.location.as_ref());
            prop_assert_eq!(fused_forward, fused_reversed);

            let recent_forward = most_recent(&forward, |f| f.location.as_ref());
            let recent_reversed = most_recent(&reversed, |f| f.location.as_ref());
            prop_assert_eq!(recent_forward, recent_reversed);
        }
    }
}
