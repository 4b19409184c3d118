//! Common types shared across every component (spec §3 DATA MODEL).

mod enums;
mod structs;

pub use enums::{
    DeviceType, EngagementTrend, EventCategory, ExtractionStatus, ForgetMode, ForgottenState,
    LoopOwner, LoopType, PatternFeedbackAction, PatternStatus, PredictionFeedback, SecurityTier,
    TimeOfDay, Vote,
};
pub use structs::{
    AnticipatedContext, AnticipationReadiness, BehavioralFingerprint, BlockScores,
    CalendarEvent, CharNGramBlock, Commitment, ContextFrame, ContextObservation,
    ContextPrototype, Dimension, EventRecord, ExtractedFeatures, FeatureKey,
    FunctionWordBlock, Memory, OpenLoop, Pattern, PatternFeedback, PersonContext, Prediction,
    Provenance, RelevanceSnapshot, Relationship, SalienceFactors, StyleMetrics, SyntaxMetrics,
    TimelineEvent, TimingBlock, UnifiedUserContext, VocabularyMetrics,
};
