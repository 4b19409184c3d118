//! Magic numbers pulled out of the algorithms so they read as configuration,
//! not arithmetic. Mirrors the teacher's `constants::defaults` module.

/// Default configuration values for the salience-memory core.
pub mod defaults {
    /// `coldThresholdDays` — days since last interaction before a
    /// relationship's engagement trend is considered `cold`.
    pub const COLD_THRESHOLD_DAYS: i64 = 30;

    /// `minConfidenceSurface` — floor below which an `AnticipatedContext`
    /// is not returned.
    pub const MIN_CONFIDENCE_SURFACE: f64 = 0.5;

    /// `patternFormationDays` — minimum observation-window span (calendar
    /// days) before a candidate pattern can become FORMED.
    pub const PATTERN_FORMATION_DAYS: i64 = 21;

    /// `patternMinCount` — minimum observation count before a bucket is a
    /// candidate pattern.
    pub const PATTERN_MIN_COUNT: u32 = 5;

    /// `identificationThreshold` — minimum confidence for `identifyUser`
    /// to fire a positive identification.
    pub const IDENTIFICATION_THRESHOLD: f64 = 0.75;

    /// `fingerprintReadySamples` — sample count after which a fingerprint
    /// is considered identification-ready.
    pub const FINGERPRINT_READY_SAMPLES: u64 = 50;

    /// `llmTimeoutMs` — default deadline for `LLMProvider` calls.
    pub const LLM_TIMEOUT_MS: u64 = 30_000;

    /// `embedderTimeoutMs` — default deadline for `Embedder` calls.
    pub const EMBEDDER_TIMEOUT_MS: u64 = 15_000;

    /// Default deadline for `VectorStore` calls. Not a named field in the
    /// original operation table (only `llmTimeoutMs`/`embedderTimeoutMs`
    /// are), but spec §5 lists vector-store calls among the four
    /// suspension points that must be deadline-bound.
    pub const VECTOR_STORE_TIMEOUT_MS: u64 = 10_000;

    /// Initial retry backoff, milliseconds.
    pub const RETRY_BACKOFF_INITIAL_MS: u64 = 100;

    /// Retry backoff exponential multiplier.
    pub const RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;

    /// Retry backoff cap, milliseconds.
    pub const RETRY_BACKOFF_CAP_MS: u64 = 2000;

    /// `maxDevicesPerUser` — cold-start device registration limit.
    pub const MAX_DEVICES_PER_USER: usize = 16;

    /// `unifiedFusionWindowMin` — active-device window for context fusion.
    pub const UNIFIED_FUSION_WINDOW_MIN: i64 = 30;

    /// `hardDeleteAfterDays` — days after `forgottenAt` before a
    /// `PendingDelete` memory is hard-deleted.
    pub const HARD_DELETE_AFTER_DAYS: i64 = 30;

    /// Default suspension-point deadline when no override is given (§5).
    pub const DEFAULT_DEADLINE_SECS: u64 = 30;

    /// Default per-provider concurrency gate width.
    pub const DEFAULT_PROVIDER_CONCURRENCY: usize = 8;

    /// Default bounded queue depth before a provider request degrades.
    pub const DEFAULT_PROVIDER_QUEUE_DEPTH: usize = 64;
}

/// Salience factor weights (spec §4.3). Must sum to 1.0.
pub mod salience_weights {
    /// Weight of the emotion factor.
    pub const EMOTION: f64 = 0.30;
    /// Weight of the novelty factor.
    pub const NOVELTY: f64 = 0.20;
    /// Weight of the relevance-to-context factor.
    pub const RELEVANCE: f64 = 0.20;
    /// Weight of the social factor.
    pub const SOCIAL: f64 = 0.15;
    /// Weight of the consequential factor.
    pub const CONSEQUENTIAL: f64 = 0.15;
}

/// Retrieval ranking weights (spec §4.5).
pub mod retrieval_weights {
    /// Weight of normalized vector/text relevance in the rank score.
    pub const RELEVANCE: f64 = 0.65;
    /// Weight of normalized salience in the rank score.
    pub const SALIENCE: f64 = 0.35;
}

/// Anticipation confidence weights (spec §4.7).
pub mod anticipation_weights {
    /// Weight of normalized observation support.
    pub const SUPPORT: f64 = 0.5;
    /// Weight of the feedback ratio.
    pub const FEEDBACK: f64 = 0.5;
    /// Reinforcement applied on a `used` feedback event.
    pub const REINFORCE_USED: f64 = 0.1;
    /// Decay applied on a `dismissed` feedback event.
    pub const DECAY_DISMISSED: f64 = 0.2;
    /// Decay applied on an `ignored` feedback event.
    pub const DECAY_IGNORED: f64 = 0.02;
    /// Support normalization cap (count considered "full support" at this size).
    pub const SUPPORT_SATURATION_COUNT: f64 = 30.0;
}

/// Behavioral-identity block weights (spec §4.8).
pub mod identity_weights {
    /// Weight of the character-trigram block.
    pub const CHAR_NGRAMS: f64 = 0.25;
    /// Weight of the function-word block.
    pub const FUNCTION_WORDS: f64 = 0.20;
    /// Weight of the vocabulary-metrics block.
    pub const VOCABULARY: f64 = 0.15;
    /// Weight of the syntax-metrics block.
    pub const SYNTAX: f64 = 0.15;
    /// Weight of the style-metrics block.
    pub const STYLE: f64 = 0.10;
    /// Weight of the timing block.
    pub const TIMING: f64 = 0.10;
    /// Weight of the topics block.
    pub const TOPICS: f64 = 0.05;
}
