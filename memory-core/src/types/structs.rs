//! Entity and value types for the salience-memory data model (spec §3).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{
    DeviceType, EngagementTrend, EventCategory, ExtractionStatus, ForgottenState, LoopOwner,
    LoopType, PatternFeedbackAction, PatternStatus, PredictionFeedback, SecurityTier,
};

/// The five factor scores that make up a memory's salience (spec §4.3).
/// Each factor is in `[0, 1]`; `salience = round(100 * sum(weight * factor))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SalienceFactors {
    /// Presence/intensity of emotion markers.
    pub emotion: f64,
    /// Inverse recency of matching topics/people in the last 30 days.
    pub novelty: f64,
    /// Jaccard of features vs. the current context frame.
    pub relevance: f64,
    /// Non-empty people set x interaction-recency boost.
    pub social: f64,
    /// Safety/commitment markers.
    pub consequential: f64,
}

impl SalienceFactors {
    /// Weighted sum in `[0, 1]`, before the `*100` and rounding spec §4.3
    /// applies to get the integer salience.
    #[must_use]
    pub fn weighted_sum(&self) -> f64 {
        use crate::constants::salience_weights as w;
        w::EMOTION * self.emotion
            + w::NOVELTY * self.novelty
            + w::RELEVANCE * self.relevance
            + w::SOCIAL * self.social
            + w::CONSEQUENTIAL * self.consequential
    }
}

/// A commitment extracted from a memory ("I owe Dan the Q2 draft by Friday").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commitment {
    /// Verbatim or lightly-normalized commitment text.
    pub text: String,
    /// Who owes the action.
    pub owner: LoopOwner,
    /// Canonicalized counterparty name, if any.
    pub other_party: Option<String>,
    /// Parsed due date, if the text named one.
    pub due_date: Option<DateTime<Utc>>,
    /// Coarse classification used for grouping and anticipation matching.
    pub loop_type: LoopType,
}

/// A dated fact extracted from a memory ("Mom's surgery is on the 14th").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Verbatim or lightly-normalized description.
    pub description: String,
    /// Parsed date.
    pub event_date: DateTime<Utc>,
    /// Coarse classification.
    pub category: EventCategory,
}

/// Structured features pulled out of raw memory text (spec §3, §4.2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFeatures {
    /// Canonicalized people names mentioned.
    pub people: HashSet<String>,
    /// Topics mentioned.
    pub topics: HashSet<String>,
    /// Commitments found in the text.
    pub commitments: Vec<Commitment>,
    /// Dated events found in the text.
    pub events: Vec<EventRecord>,
    /// Sensitivity markers (allergy, medical, financial, etc).
    pub sensitivities: Vec<String>,
}

impl ExtractedFeatures {
    /// True if every field is empty — the "empty" `extraction_status`
    /// case described in spec §4.2.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
            && self.topics.is_empty()
            && self.commitments.is_empty()
            && self.events.is_empty()
            && self.sensitivities.is_empty()
    }
}

/// A single stored observation (spec §3 Memory).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Globally-unique opaque id.
    pub id: String,
    /// Owning user.
    pub user: String,
    /// Monotonic creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Raw input text.
    pub text: String,
    /// Lightly normalized text (whitespace/case folded) used for matching.
    pub normalized_text: String,
    /// Structured features derived from `text`.
    pub extracted_features: ExtractedFeatures,
    /// How extraction produced `extracted_features`.
    pub extraction_status: ExtractionStatus,
    /// 0-100 integer priority score.
    pub salience: u8,
    /// Factor breakdown behind `salience`, kept for auditability.
    pub salience_factors: SalienceFactors,
    /// Security classification.
    pub security_tier: SecurityTier,
    /// Opaque encryption envelope, present only for `Vault` memories.
    pub encryption_envelope: Option<Vec<u8>>,
    /// Lifecycle state.
    pub forgotten_state: ForgottenState,
    /// When `forgotten_state` left `Active`, if it has.
    pub forgotten_at: Option<DateTime<Utc>>,
    /// Free-text reason passed to `forget`, if any.
    pub forgotten_reason: Option<String>,
    /// Whether the vector upsert for this memory is still pending retry.
    pub pending_vector_retry: bool,
    /// Optional project grouping tag.
    pub project_tag: Option<String>,
    /// User- or API-added tags, beyond anything extraction found.
    pub added_tags: HashSet<String>,
    /// User- or API-added topics, merged into retrieval's topic view.
    pub added_topics: HashSet<String>,
}

impl Memory {
    /// Union of extracted and manually-added topics.
    #[must_use]
    pub fn all_topics(&self) -> HashSet<String> {
        self.extracted_features
            .topics
            .union(&self.added_topics)
            .cloned()
            .collect()
    }
}

/// An unresolved commitment derived from a memory (spec §3 OpenLoop).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenLoop {
    /// Unique id.
    pub id: Uuid,
    /// Owning user.
    pub user: String,
    /// Description of the commitment.
    pub description: String,
    /// Who owes the action.
    pub owner: LoopOwner,
    /// Canonicalized counterparty, if any.
    pub other_party: Option<String>,
    /// Due date, if known.
    pub due_date: Option<DateTime<Utc>>,
    /// Coarse classification.
    pub loop_type: LoopType,
    /// Memory this loop was derived from. `None` for person-level loops
    /// created by `forgetPerson` semantics.
    pub source_memory_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When closed, if it has been.
    pub closed_at: Option<DateTime<Utc>>,
    /// Free-text note supplied at close time.
    pub closed_note: Option<String>,
}

impl OpenLoop {
    /// Derived: `now > due_date && !closed_at`.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.closed_at.is_none() && self.due_date.is_some_and(|due| now > due)
    }
}

/// A dated fact derived from a memory (spec §3 TimelineEvent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Unique id.
    pub id: Uuid,
    /// Owning user.
    pub user: String,
    /// Description.
    pub description: String,
    /// Canonicalized associated person, if any.
    pub person: Option<String>,
    /// Event date.
    pub event_date: DateTime<Utc>,
    /// Coarse classification.
    pub category: EventCategory,
    /// Source memory id.
    pub source_memory_id: String,
}

/// Aggregated relationship state with one contact (spec §3 Relationship).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// Owning user.
    pub user: String,
    /// Canonicalized contact name; primary key alongside `user`.
    pub contact_name: String,
    /// Total interactions observed.
    pub total_interactions: u64,
    /// Last interaction timestamp.
    pub last_interaction_at: DateTime<Utc>,
    /// Interaction timestamps in the trailing 30 days, used to recompute
    /// `engagement_trend` without re-scanning all memories.
    pub recent_interactions: Vec<DateTime<Utc>>,
    /// Most recently computed trend.
    pub engagement_trend: EngagementTrend,
    /// Sensitivities ever recorded in a memory mentioning this contact.
    pub sensitivity_set: HashSet<String>,
    /// Days of inactivity before this relationship is considered cold.
    pub cold_threshold_days: i64,
}

impl Relationship {
    /// Derived: days since `last_interaction_at`, as of `now`.
    #[must_use]
    pub fn days_since_last_interaction(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_interaction_at).num_days().max(0)
    }
}

/// Provenance of one context-frame dimension: did the device/app set it
/// explicitly, or was it derived (e.g. from a calendar feed)?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    /// Explicitly set by the user or client.
    UserSet,
    /// Derived by the system.
    Derived,
}

/// A single context dimension with its provenance and set time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension<T> {
    /// The value.
    pub value: T,
    /// Where it came from.
    pub provenance: Provenance,
    /// When it was set.
    pub set_at: DateTime<Utc>,
}

impl<T> Dimension<T> {
    /// Construct a user-set dimension stamped with `now`.
    pub fn user_set(value: T, now: DateTime<Utc>) -> Self {
        Self {
            value,
            provenance: Provenance::UserSet,
            set_at: now,
        }
    }
}

/// Per-`(user, device)` context snapshot (spec §3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextFrame {
    /// Device identifier.
    pub device_id: String,
    /// Device kind, used in fusion priority.
    pub device_type: DeviceType,
    /// Current location, if set.
    pub location: Option<Dimension<String>>,
    /// Current people in context.
    pub people: Option<Dimension<HashSet<String>>>,
    /// Current activity.
    pub activity: Option<Dimension<String>>,
    /// Current mood.
    pub mood: Option<Dimension<String>>,
    /// Calendar snapshot (free-form, opaque to the core beyond title/time
    /// matching done by anticipation).
    pub calendar: Option<Dimension<Vec<CalendarEvent>>>,
    /// Last time any dimension was updated.
    pub last_updated: DateTime<Utc>,
}

impl ContextFrame {
    /// A freshly-registered frame with nothing set yet.
    #[must_use]
    pub fn new(device_id: String, device_type: DeviceType, now: DateTime<Utc>) -> Self {
        Self {
            device_id,
            device_type,
            location: None,
            people: None,
            activity: None,
            mood: None,
            calendar: None,
            last_updated: now,
        }
    }
}

/// A calendar event as surfaced to context/anticipation (title + window).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Event title, matched against recurring-pattern feature keys.
    pub title: String,
    /// Start time.
    pub starts_at: DateTime<Utc>,
    /// End time.
    pub ends_at: DateTime<Utc>,
}

/// Fused view across a user's active device frames (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedUserContext {
    /// Owning user.
    pub user: String,
    /// Fused location (mobile wins ties; most-recent among ties).
    pub location: Option<String>,
    /// Union of people across active devices.
    pub people: HashSet<String>,
    /// Most-recently-set activity across active devices.
    pub activity: Option<String>,
    /// Fused mood (mobile preferred, else most-recent).
    pub mood: Option<String>,
    /// Most-recently-active device, priority-ordered on ties.
    pub primary_device: Option<String>,
    /// Devices considered active (updated within the fusion window).
    pub active_devices: Vec<String>,
}

/// Returned by `setContext`/`whatMattersNow` (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceSnapshot {
    /// People present in the frame, each with brief context.
    pub about_people: Vec<PersonContext>,
    /// Topics suggested from recent high-salience memories.
    pub suggested_topics: Vec<String>,
    /// Sensitivities to keep in mind for the people present.
    pub sensitivities: Vec<String>,
}

/// Brief per-person context bundled into a [`RelevanceSnapshot`] or
/// [`crate::briefing::PersonBriefing`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonContext {
    /// Canonicalized person name.
    pub name: String,
    /// Open loops involving this person.
    pub open_loops: Vec<OpenLoop>,
    /// Timeline events in the next 14 days involving this person.
    pub upcoming_events: Vec<TimelineEvent>,
    /// Recent high-salience memories mentioning this person.
    pub recent_memories: Vec<Memory>,
}

/// A context observation emitted whenever a frame changes (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextObservation {
    /// Owning user.
    pub user: String,
    /// When this observation was recorded.
    pub observed_at: DateTime<Utc>,
    /// Time-of-day bucket.
    pub time_of_day: super::enums::TimeOfDay,
    /// Day of week, 0 = Monday.
    pub day_of_week: u8,
    /// Low-cardinality hash bucket of location, if known.
    pub location_bucket: Option<u64>,
    /// People present at observation time.
    pub people: HashSet<String>,
    /// Activity at observation time.
    pub activity: Option<String>,
    /// Calendar event title in progress, if any.
    pub recurring_event_title: Option<String>,
}

/// Canonicalized grouping key a [`Pattern`] is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureKey {
    /// Time-of-day bucket.
    pub time_of_day: super::enums::TimeOfDay,
    /// Day of week, 0 = Monday.
    pub day_of_week: u8,
    /// Low-cardinality location hash, if the bucket has one.
    pub location_bucket: Option<u64>,
    /// Recurring event title, if the bucket is keyed to one.
    pub recurring_event_title: Option<String>,
}

/// Prototype context reconstructed from a pattern's observations (the
/// "mode of each feature" from spec §4.7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextPrototype {
    /// Most common location, if any.
    pub location: Option<String>,
    /// People observed across the bucket's observations, ranked by
    /// frequency (most frequent first).
    pub people: Vec<String>,
    /// Most common activity, if any.
    pub activity: Option<String>,
}

/// One entry in a pattern's append-only feedback ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternFeedback {
    /// Which action was recorded.
    pub action: PatternFeedbackAction,
    /// When it was recorded.
    pub at: DateTime<Utc>,
}

/// A recurring feature bucket learned from context observations (spec §3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// Unique id.
    pub id: Uuid,
    /// Owning user.
    pub user: String,
    /// The bucket this pattern groups observations by.
    pub feature_key: FeatureKey,
    /// Reconstructed prototype context.
    pub associated_context: ContextPrototype,
    /// Observation count backing this pattern.
    pub count: u32,
    /// Current confidence in `[0, 1]`.
    pub confidence: f64,
    /// Most recent observation folded into this pattern.
    pub last_observed_at: DateTime<Utc>,
    /// First observation folded into this pattern (start of the
    /// observation window used for the 21-day formation check).
    pub first_observed_at: DateTime<Utc>,
    /// When the pattern crossed into FORMED, if it has.
    pub formed_at: Option<DateTime<Utc>>,
    /// Append-only feedback history.
    pub feedback_ledger: Vec<PatternFeedback>,
}

impl Pattern {
    /// Current lifecycle status (spec §4.8 state machine).
    #[must_use]
    pub fn status(&self, pattern_min_count: u32, pattern_formation_days: i64) -> PatternStatus {
        if self.confidence < 0.2 && self.formed_at.is_some() {
            return PatternStatus::Decayed;
        }
        let window_days = (self.last_observed_at - self.first_observed_at).num_days();
        if self.count >= pattern_min_count && window_days >= pattern_formation_days {
            PatternStatus::Formed
        } else if self.count >= pattern_min_count {
            PatternStatus::Candidate
        } else {
            PatternStatus::New
        }
    }
}

/// A forecast produced by the anticipation engine (spec §3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnticipatedContext {
    /// When the trigger (calendar event) begins.
    pub trigger_time: DateTime<Utc>,
    /// Confidence of the backing pattern.
    pub confidence: f64,
    /// Prototype features behind this forecast.
    pub features: ContextPrototype,
    /// People suggested for briefing.
    pub suggested_briefings: Vec<String>,
    /// Topics suggested.
    pub suggested_topics: Vec<String>,
    /// Top memories recalled against the prototype context.
    pub suggested_memories: Vec<Memory>,
    /// The pattern this forecast was derived from.
    pub pattern_id: Uuid,
}

/// Whether anticipation has enough data to predict for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnticipationReadiness {
    /// `true` once the observation window is long enough and at least
    /// one pattern has formed.
    pub ready_for_prediction: bool,
    /// Days remaining before `patternFormationDays` is reached, if not ready.
    pub days_until_ready: i64,
}

/// Per-user stylometric signature (spec §3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehavioralFingerprint {
    /// Owning user.
    pub user: String,
    /// Number of messages folded into this fingerprint.
    pub sample_count: u64,
    /// Character-trigram block.
    pub char_ngrams: CharNGramBlock,
    /// Function-word block.
    pub function_words: FunctionWordBlock,
    /// Vocabulary-metrics block.
    pub vocabulary: VocabularyMetrics,
    /// Syntax-metrics block.
    pub syntax: SyntaxMetrics,
    /// Style-metrics block.
    pub style: StyleMetrics,
    /// Timing block.
    pub timing: TimingBlock,
    /// Topics block.
    pub topics: HashMap<String, u32>,
    /// Last time this fingerprint was updated.
    pub last_updated: DateTime<Utc>,
}

impl BehavioralFingerprint {
    /// A fresh, empty fingerprint for a new user.
    #[must_use]
    pub fn new(user: String, now: DateTime<Utc>) -> Self {
        Self {
            user,
            sample_count: 0,
            char_ngrams: CharNGramBlock::default(),
            function_words: FunctionWordBlock::default(),
            vocabulary: VocabularyMetrics::default(),
            syntax: SyntaxMetrics::default(),
            style: StyleMetrics::default(),
            timing: TimingBlock::default(),
            topics: HashMap::new(),
            last_updated: now,
        }
    }

    /// Whether this fingerprint has enough samples to be trusted for
    /// identification (spec §4.8).
    #[must_use]
    pub fn is_identification_ready(&self, fingerprint_ready_samples: u64) -> bool {
        self.sample_count >= fingerprint_ready_samples
    }
}

/// Character-trigram distribution block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharNGramBlock {
    /// Top-K trigram -> normalized frequency.
    pub top_trigrams: HashMap<String, f64>,
    /// Stable hash summarizing the full distribution.
    pub signature: u64,
}

/// Function-word frequency block over a fixed 150-word vocabulary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionWordBlock {
    /// word -> normalized frequency (fraction of all function-word hits).
    pub frequencies: HashMap<String, f64>,
    /// Stable hash summarizing the distribution.
    pub signature: u64,
}

/// Vocabulary-level metrics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VocabularyMetrics {
    /// Average word length in characters.
    pub avg_word_length: f64,
    /// Fraction of words that are abbreviations (all-caps or `.`-suffixed).
    pub abbreviation_ratio: f64,
    /// Type-token ratio (unique words / total words).
    pub type_token_ratio: f64,
    /// Fraction of words occurring exactly once (hapax legomena).
    pub hapax_ratio: f64,
    /// Average syllables per word (heuristic count).
    pub avg_syllables: f64,
}

/// Syntax-level metrics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SyntaxMetrics {
    /// Average sentence length in words.
    pub avg_sentence_length: f64,
    /// Fraction of letters that are uppercase.
    pub capitalization_ratio: f64,
    /// Commas per sentence.
    pub comma_frequency: f64,
    /// Count of subordinate-clause markers per sentence ("because",
    /// "although", "which", ...).
    pub clause_complexity: f64,
    /// Coarse punctuation-style class (e.g. "terse", "expressive").
    pub punctuation_style: String,
    /// Whether the author ever uses semicolons.
    pub uses_semicolons: bool,
    /// Whether the author ever uses ellipses.
    pub uses_ellipses: bool,
}

/// Style-level metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StyleMetrics {
    /// Formality score in `[0, 1]`.
    pub formality: f64,
    /// Emoji density (emoji per 100 chars).
    pub emoji_density: f64,
    /// Politeness-marker count per message ("please", "thanks", ...).
    pub politeness: f64,
    /// Fraction of contractible constructs that were contracted.
    pub contraction_ratio: f64,
    /// Coarse number-style class ("digits", "words", "mixed").
    pub number_style: String,
    /// Whether the author tends to use list formatting.
    pub uses_lists: bool,
}

/// Timing block: when a user is typically active.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingBlock {
    /// Hours (0-23) the user has been observed active in.
    pub active_hours: HashSet<u8>,
    /// Days of week (0 = Monday) the user has been observed active in.
    pub active_days: HashSet<u8>,
}

/// Per-block similarity scores from a single `identifyUser` comparison.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BlockScores {
    /// Character-trigram similarity.
    pub char_ngrams: f64,
    /// Function-word similarity.
    pub function_words: f64,
    /// Vocabulary-metrics similarity.
    pub vocabulary: f64,
    /// Syntax-metrics similarity.
    pub syntax: f64,
    /// Style-metrics similarity.
    pub style: f64,
    /// Timing similarity.
    pub timing: f64,
    /// Topic-overlap similarity.
    pub topics: f64,
}

impl BlockScores {
    /// Weighted confidence, clamped to `[0, 1]` (spec §4.8).
    #[must_use]
    pub fn confidence(&self) -> f64 {
        use crate::constants::identity_weights as w;
        let raw = w::CHAR_NGRAMS * self.char_ngrams
            + w::FUNCTION_WORDS * self.function_words
            + w::VOCABULARY * self.vocabulary
            + w::SYNTAX * self.syntax
            + w::STYLE * self.style
            + w::TIMING * self.timing
            + w::TOPICS * self.topics;
        raw.clamp(0.0, 1.0)
    }
}

/// A recorded identification attempt, pending feedback (spec §3 Prediction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Unique id.
    pub id: Uuid,
    /// Stable hash of the message that was classified (not the raw text).
    pub message_hash: u64,
    /// Predicted author, if confidence crossed the threshold.
    pub predicted_user: Option<String>,
    /// Confidence of the top candidate.
    pub confidence: f64,
    /// Per-block scores for the top candidate.
    pub per_block_scores: BlockScores,
    /// When the identification was made.
    pub observed_at: DateTime<Utc>,
    /// Feedback, if supplied.
    pub feedback: Option<PredictionFeedback>,
    /// When feedback was supplied, if it was.
    pub feedback_at: Option<DateTime<Utc>>,
}
