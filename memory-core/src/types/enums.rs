//! Enumerated domain vocabulary (spec §3).

use serde::{Deserialize, Serialize};

/// Security classification governing encryption and vector visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityTier {
    /// No special handling.
    General,
    /// Personal-sensitivity content; still vector-indexed.
    Personal,
    /// Never vector-indexed; stored behind an encryption envelope.
    Vault,
}

/// Lifecycle state of a [`crate::types::Memory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForgottenState {
    /// Normal, retrievable state.
    Active,
    /// Hidden from retrieval, loops/events untouched, vector kept.
    Suppressed,
    /// Hidden from retrieval, vector removed, loops/events kept.
    Archived,
    /// Queued for hard deletion 30 days after `forgottenAt`.
    PendingDelete,
}

/// Mode argument to `forget`/`forgetPerson` (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForgetMode {
    /// → [`ForgottenState::Suppressed`].
    Suppress,
    /// → [`ForgottenState::Archived`].
    Archive,
    /// → [`ForgottenState::PendingDelete`].
    Delete,
}

impl ForgetMode {
    /// The resulting [`ForgottenState`] for this mode.
    #[must_use]
    pub fn target_state(self) -> ForgottenState {
        match self {
            ForgetMode::Suppress => ForgottenState::Suppressed,
            ForgetMode::Archive => ForgottenState::Archived,
            ForgetMode::Delete => ForgottenState::PendingDelete,
        }
    }
}

/// Who owns a commitment/open loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopOwner {
    /// The user owes the action.
    #[serde(rename = "self")]
    SelfOwner,
    /// Someone else owes the action.
    Them,
    /// Shared commitment.
    Mutual,
}

/// Coarse classification of a commitment or timeline event, used to group
/// open loops and to match anticipation patterns against calendar titles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopType {
    /// A task the user owes.
    Task,
    /// A follow-up question or reply owed.
    FollowUp,
    /// A scheduled meeting or appointment.
    Meeting,
    /// A payment or reimbursement.
    Financial,
    /// Anything not covered above.
    Other(String),
}

/// Category of a derived [`crate::types::TimelineEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Birthdays, anniversaries, recurring personal dates.
    Anniversary,
    /// Medical appointments or health-related dates.
    Health,
    /// Travel dates.
    Travel,
    /// Work-related deadlines or milestones.
    Work,
    /// Anything not covered above.
    Other(String),
}

/// Direction of a relationship's recent engagement (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngagementTrend {
    /// 7-day interaction count exceeds the 30-day mean.
    Rising,
    /// Within normal variance of the 30-day mean.
    Stable,
    /// 7-day interaction count is below the 30-day mean.
    Falling,
    /// No interaction within `coldThresholdDays`.
    Cold,
}

/// Kind of device a context frame belongs to (spec §3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    /// Mobile handset — wins location/mood ties in fusion.
    Mobile,
    /// Desktop workstation.
    Desktop,
    /// Browser-based client.
    Web,
    /// Headless API client.
    Api,
    /// Model-context-protocol client.
    Mcp,
}

impl DeviceType {
    /// Fusion priority order: lower is higher priority
    /// (mobile > desktop > web > api > mcp), per spec §4.6.
    #[must_use]
    pub fn fusion_priority(self) -> u8 {
        match self {
            DeviceType::Mobile => 0,
            DeviceType::Desktop => 1,
            DeviceType::Web => 2,
            DeviceType::Api => 3,
            DeviceType::Mcp => 4,
        }
    }
}

/// Up/down vote on a memory's salience (spec §4.5 `voteOnMemories`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vote {
    /// Nudge salience up.
    Up,
    /// Nudge salience down.
    Down,
}

impl Vote {
    /// Salience adjustment applied by this vote, before clamping.
    #[must_use]
    pub fn delta(self) -> i32 {
        match self {
            Vote::Up => 3,
            Vote::Down => -3,
        }
    }
}

/// Whether a feature-extraction call used the LLM path, fell back to
/// heuristics, or produced nothing (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractionStatus {
    /// LLM-assisted extraction succeeded.
    Ok,
    /// LLM path failed or was unavailable; heuristic path used instead.
    Fallback,
    /// Neither path produced any features.
    Empty,
}

/// Time-of-day bucket used by context observations (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeOfDay {
    /// [5, 12)
    Morning,
    /// [12, 17)
    Afternoon,
    /// [17, 21)
    Evening,
    /// [21, 5)
    Night,
}

impl TimeOfDay {
    /// Bucket the given hour-of-day (0-23) into a [`TimeOfDay`].
    #[must_use]
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=20 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }
}

/// Feedback recorded against a formed-or-forming pattern (spec §3, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternFeedbackAction {
    /// The anticipated context was acted on.
    Used,
    /// It was shown but not acted on.
    Ignored,
    /// It was explicitly dismissed.
    Dismissed,
}

/// Lifecycle state of a [`crate::types::Pattern`] (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternStatus {
    /// Fewer than `patternMinCount` observations.
    New,
    /// `count >= patternMinCount` but window too short.
    Candidate,
    /// `count >= patternMinCount` and window `>= patternFormationDays`.
    Formed,
    /// Confidence sustained below 0.2; retired from anticipation.
    Decayed,
}

/// Outcome of a [`crate::types::Prediction`]'s feedback loop (spec §4.8).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionFeedback {
    /// The predicted user was correct.
    Confirmed,
    /// The predicted user was wrong; the real author is named.
    CorrectedTo(String),
}
