//! Behavioral identity (C9, spec §4.8): seven-block stylometric
//! fingerprinting, candidate matching, and feedback-driven reinforcement.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::config::MemoryConfig;
use crate::error::{Error, Result};
use crate::storage::PersistenceGateway;
use crate::types::{
    BehavioralFingerprint, BlockScores, CharNGramBlock, FunctionWordBlock, Prediction,
    PredictionFeedback, StyleMetrics, SyntaxMetrics, TimingBlock, VocabularyMetrics,
};

/// A fixed function-word vocabulary (spec §4.8 "over a fixed vocabulary
/// (150 words)").
static FUNCTION_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "if", "of", "to", "in", "on", "at", "by", "for",
    "with", "about", "as", "into", "like", "through", "after", "over", "between", "out",
    "against", "during", "without", "before", "under", "around", "among", "i", "you", "he",
    "she", "it", "we", "they", "me", "him", "her", "us", "them", "my", "your", "his", "its",
    "our", "their", "this", "that", "these", "those", "is", "am", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "do", "does", "did", "will", "would", "shall",
    "should", "can", "could", "may", "might", "must", "not", "so", "very", "just", "also",
    "above", "below", "beside", "besides", "beneath", "behind", "beyond", "inside", "outside",
    "within", "upon", "toward", "towards", "across", "along", "amid", "amidst", "concerning",
    "despite", "except", "near", "off", "onto", "per", "since", "than", "until", "till", "up",
    "down", "unlike", "via", "plus", "regarding", "because", "although", "though", "unless",
    "while", "whereas", "whether", "yet", "nor", "either", "neither", "both", "whenever",
    "wherever", "however", "therefore", "thus", "hence", "moreover", "nonetheless", "some",
    "any", "all", "each", "every", "no", "none", "few", "many", "much", "more", "most",
    "several", "such", "other",
];

static STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "to", "of", "and", "in", "on", "for", "i",
    "i'll", "will", "my", "me", "at", "by", "with", "it", "that", "this",
];

/// A single incoming sample to fingerprint or classify against an
/// existing fingerprint (spec §4.8 `identifyUser(message, candidates?)`).
#[derive(Debug, Clone)]
pub struct MessageSample<'a> {
    /// Raw message text.
    pub text: &'a str,
    /// When it was sent, used for the timing block.
    pub at: DateTime<Utc>,
}

/// Result of a single `identifyUser` call.
#[derive(Debug, Clone)]
pub struct IdentificationResult {
    /// The recorded prediction (always created, win or not).
    pub prediction: Prediction,
    /// Positive identification only if confidence crossed the threshold.
    pub identified_user: Option<String>,
}

/// Behavioral fingerprinting, matching, and feedback, layered over the
/// persistence gateway.
pub struct IdentityEngine<G> {
    gateway: Arc<G>,
    config: MemoryConfig,
    audit: AuditLogger,
}

impl<G> IdentityEngine<G>
where
    G: PersistenceGateway + 'static,
{
    /// Construct an identity engine. Audit logging is disabled by default;
    /// call [`Self::with_audit`] to turn it on.
    #[must_use]
    pub fn new(gateway: Arc<G>, config: MemoryConfig) -> Self {
        Self { gateway, config, audit: AuditLogger::disabled() }
    }

    /// Attach an audit logger; every `behavioralFeedback` correction is
    /// then recorded (spec's ambient audit-trail supplement).
    #[must_use]
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    /// Fold `sample` into `user`'s fingerprint (used on every ingested
    /// message, independent of identification — this is how a
    /// fingerprint accumulates `sampleCount`).
    #[instrument(skip(self, sample))]
    pub async fn record_sample(&self, user: &str, sample: &MessageSample<'_>) -> Result<BehavioralFingerprint> {
        let signals = build_signals(sample);
        let mut fingerprint = match self.gateway.get_fingerprint(user).await? {
            Some(existing) => existing,
            None => BehavioralFingerprint::new(user.to_string(), sample.at),
        };
        let learning_rate = 1.0 / (fingerprint.sample_count as f64 + 1.0);
        blend(&mut fingerprint, &signals, learning_rate);
        fingerprint.sample_count += 1;
        fingerprint.last_updated = sample.at;
        self.gateway.put_fingerprint(fingerprint.clone()).await?;
        Ok(fingerprint)
    }

    /// `identifyUser(message, candidates?)` (spec §4.8).
    #[instrument(skip(self, sample, candidates))]
    pub async fn identify_user(
        &self,
        sample: &MessageSample<'_>,
        candidates: Option<&[String]>,
    ) -> Result<IdentificationResult> {
        let signals = build_signals(sample);
        let pool = match candidates {
            Some(users) => {
                let mut fingerprints = Vec::with_capacity(users.len());
                for user in users {
                    if let Some(fp) = self.gateway.get_fingerprint(user).await? {
                        fingerprints.push(fp);
                    }
                }
                fingerprints
            }
            None => self.gateway.list_fingerprints().await?,
        };

        let mut best: Option<(String, BlockScores, f64)> = None;
        for fingerprint in &pool {
            let scores = score_blocks(&signals, fingerprint);
            let confidence = scores.confidence();
            if best.as_ref().is_none_or(|(_, _, c)| confidence > *c) {
                best = Some((fingerprint.user.clone(), scores, confidence));
            }
        }

        let (predicted_user, per_block_scores, confidence) = match best {
            Some((user, scores, confidence)) if confidence >= self.config.identification_threshold => {
                (Some(user), scores, confidence)
            }
            Some((_, scores, confidence)) => (None, scores, confidence),
            None => (None, BlockScores::default(), 0.0),
        };

        let prediction = Prediction {
            id: Uuid::new_v4(),
            message_hash: hash_text(sample.text),
            predicted_user: predicted_user.clone(),
            confidence,
            per_block_scores,
            observed_at: sample.at,
            feedback: None,
            feedback_at: None,
        };
        self.gateway.put_prediction(prediction.clone()).await?;

        Ok(IdentificationResult {
            prediction,
            identified_user: predicted_user,
        })
    }

    /// `behavioralFeedback(predictionId, correct, actualUserId?)` (spec §4.8).
    #[instrument(skip(self))]
    pub async fn behavioral_feedback(
        &self,
        prediction_id: Uuid,
        correct: bool,
        actual_user: Option<&str>,
        sample: &MessageSample<'_>,
    ) -> Result<()> {
        let mut prediction = self
            .gateway
            .get_prediction(prediction_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("prediction {prediction_id}")))?;

        let target_user = if correct {
            prediction.feedback = Some(PredictionFeedback::Confirmed);
            prediction.predicted_user.clone()
        } else {
            let actual = actual_user.map(str::to_string);
            prediction.feedback = actual.clone().map(PredictionFeedback::CorrectedTo);
            actual
        };
        prediction.feedback_at = Some(Utc::now());
        self.gateway.put_prediction(prediction).await?;

        let entry = AuditEntry::new(AuditEventType::BehavioralFeedback, Uuid::new_v4())
            .with_resource(prediction_id.to_string())
            .with_detail("correct", correct.to_string());
        match target_user {
            Some(user) => {
                self.audit.log(entry.with_user(&user));
                self.record_sample(&user, sample).await?;
            }
            None => self.audit.log(entry),
        }
        Ok(())
    }

    /// `behavioralMetrics(user)` (spec §6): readiness and sample count.
    #[instrument(skip(self))]
    pub async fn behavioral_metrics(&self, user: &str) -> Result<Option<(BehavioralFingerprint, bool)>> {
        let Some(fingerprint) = self.gateway.get_fingerprint(user).await? else {
            return Ok(None);
        };
        let ready = fingerprint.is_identification_ready(self.config.fingerprint_ready_samples);
        Ok(Some((fingerprint, ready)))
    }
}

/// Build a one-message fingerprint-shaped signal block (spec §4.8
/// "Build a `BehavioralSignals` from the message (same blocks)").
fn build_signals(sample: &MessageSample<'_>) -> BehavioralFingerprint {
    let text = sample.text;
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut fp = BehavioralFingerprint::new(String::new(), sample.at);
    fp.sample_count = 1;
    fp.char_ngrams = char_ngram_block(text);
    fp.function_words = function_word_block(&words);
    fp.vocabulary = vocabulary_metrics(&words);
    fp.syntax = syntax_metrics(text);
    fp.style = style_metrics(text, &words);
    fp.timing = TimingBlock {
        active_hours: HashSet::from([u8::try_from(sample.at.hour()).unwrap_or(0)]),
        active_days: HashSet::from([u8::try_from(sample.at.weekday().num_days_from_monday()).unwrap_or(0)]),
    };
    fp.topics = topic_counts(&words);
    fp
}

fn char_ngram_block(text: &str) -> CharNGramBlock {
    let lower: Vec<char> = text.to_lowercase().chars().collect();
    let mut counts: HashMap<String, u32> = HashMap::new();
    for window in lower.windows(3) {
        let trigram: String = window.iter().collect();
        if trigram.trim().is_empty() {
            continue;
        }
        *counts.entry(trigram).or_insert(0) += 1;
    }
    let total: u32 = counts.values().sum();
    let mut sorted: Vec<(String, u32)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(10);
    let top_trigrams: HashMap<String, f64> = sorted
        .iter()
        .map(|(k, v)| (k.clone(), if total == 0 { 0.0 } else { f64::from(*v) / f64::from(total) }))
        .collect();
    let signature = stable_hash(&sorted.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>().join(","));
    CharNGramBlock { top_trigrams, signature }
}

fn function_word_block(words: &[&str]) -> FunctionWordBlock {
    let mut counts: HashMap<String, u32> = HashMap::new();
    let mut total = 0u32;
    for word in words {
        let cleaned = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'').to_lowercase();
        if FUNCTION_WORDS.contains(&cleaned.as_str()) {
            *counts.entry(cleaned).or_insert(0) += 1;
            total += 1;
        }
    }
    let frequencies: HashMap<String, f64> = counts
        .iter()
        .map(|(k, v)| (k.clone(), if total == 0 { 0.0 } else { f64::from(*v) / f64::from(total) }))
        .collect();
    let mut keys: Vec<&String> = frequencies.keys().collect();
    keys.sort();
    let signature = stable_hash(&keys.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(","));
    FunctionWordBlock { frequencies, signature }
}

fn vocabulary_metrics(words: &[&str]) -> VocabularyMetrics {
    if words.is_empty() {
        return VocabularyMetrics::default();
    }
    let lowered: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
    let total_chars: usize = words.iter().map(|w| w.chars().count()).sum();
    let avg_word_length = total_chars as f64 / words.len() as f64;

    let abbreviations = words
        .iter()
        .filter(|w| (w.chars().all(char::is_uppercase) && w.len() > 1) || w.ends_with('.'))
        .count();
    let abbreviation_ratio = abbreviations as f64 / words.len() as f64;

    let unique: HashSet<&String> = lowered.iter().collect();
    let type_token_ratio = unique.len() as f64 / lowered.len() as f64;

    let mut freq: HashMap<&String, u32> = HashMap::new();
    for w in &lowered {
        *freq.entry(w).or_insert(0) += 1;
    }
    let hapax = freq.values().filter(|c| **c == 1).count();
    let hapax_ratio = hapax as f64 / lowered.len() as f64;

    let avg_syllables = words.iter().map(|w| estimate_syllables(w) as f64).sum::<f64>() / words.len() as f64;

    VocabularyMetrics {
        avg_word_length,
        abbreviation_ratio,
        type_token_ratio,
        hapax_ratio,
        avg_syllables,
    }
}

fn estimate_syllables(word: &str) -> usize {
    let lower = word.to_lowercase();
    let mut count = 0usize;
    let mut prev_vowel = false;
    for c in lower.chars() {
        let is_vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if is_vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = is_vowel;
    }
    count.max(1)
}

fn syntax_metrics(text: &str) -> SyntaxMetrics {
    let sentences: Vec<&str> = text
        .split(|c| c == '.' || c == '!' || c == '?')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let sentence_count = sentences.len().max(1);
    let word_count = text.split_whitespace().count().max(1);
    let avg_sentence_length = word_count as f64 / sentence_count as f64;

    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    let capitalization_ratio = if letters.is_empty() {
        0.0
    } else {
        letters.iter().filter(|c| c.is_uppercase()).count() as f64 / letters.len() as f64
    };

    let comma_frequency = text.matches(',').count() as f64 / sentence_count as f64;

    static CLAUSE_MARKERS: &[&str] = &["because", "although", "which", "while", "since", "though", "whereas"];
    let lower = text.to_lowercase();
    let clause_complexity = CLAUSE_MARKERS.iter().filter(|m| lower.contains(*m)).count() as f64 / sentence_count as f64;

    let uses_semicolons = text.contains(';');
    let uses_ellipses = text.contains("...");
    let punctuation_style = if comma_frequency > 1.5 || uses_semicolons {
        "expressive".to_string()
    } else {
        "terse".to_string()
    };

    SyntaxMetrics {
        avg_sentence_length,
        capitalization_ratio,
        comma_frequency,
        clause_complexity,
        punctuation_style,
        uses_semicolons,
        uses_ellipses,
    }
}

fn style_metrics(text: &str, words: &[&str]) -> StyleMetrics {
    let lower = text.to_lowercase();
    static POLITE_MARKERS: &[&str] = &["please", "thanks", "thank you", "appreciate", "kindly"];
    let politeness = POLITE_MARKERS.iter().filter(|m| lower.contains(*m)).count() as f64;

    let contractions = words.iter().filter(|w| w.contains('\'')).count();
    static CONTRACTIBLE: &[&str] = &["i am", "you are", "do not", "did not", "cannot", "will not", "it is"];
    let contractible_opportunities = CONTRACTIBLE.iter().filter(|m| lower.contains(*m)).count() + contractions;
    let contraction_ratio = if contractible_opportunities == 0 {
        0.0
    } else {
        contractions as f64 / contractible_opportunities as f64
    };

    let emoji_count = text.chars().filter(|c| (*c as u32) >= 0x1F300 && (*c as u32) <= 0x1FAFF).count();
    let emoji_density = emoji_count as f64 / (text.chars().count().max(1) as f64 / 100.0);

    let digit_heavy = text.chars().filter(char::is_ascii_digit).count();
    let number_words = ["one", "two", "three", "four", "five", "first", "second", "third"];
    let spelled_numbers = words.iter().filter(|w| number_words.contains(&w.to_lowercase().as_str())).count();
    let number_style = if digit_heavy > spelled_numbers {
        "digits".to_string()
    } else if spelled_numbers > 0 {
        "words".to_string()
    } else {
        "mixed".to_string()
    };

    let uses_lists = text.lines().any(|l| {
        let trimmed = l.trim_start();
        trimmed.starts_with('-') || trimmed.starts_with('*') || trimmed.starts_with(|c: char| c.is_ascii_digit())
    });

    let formality = 1.0 - contraction_ratio.min(1.0) * 0.5 - (emoji_density.min(5.0) / 10.0);

    StyleMetrics {
        formality: formality.clamp(0.0, 1.0),
        emoji_density,
        politeness,
        contraction_ratio,
        number_style,
        uses_lists,
    }
}

fn topic_counts(words: &[&str]) -> HashMap<String, u32> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for word in words {
        let cleaned = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        if cleaned.len() > 3 && !STOPWORDS.contains(&cleaned.as_str()) {
            *counts.entry(cleaned).or_insert(0) += 1;
        }
    }
    counts
}

fn stable_hash(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

fn hash_text(s: &str) -> u64 {
    stable_hash(s)
}

/// Blend `sample` into `fingerprint` with `learning_rate` (spec §4.8
/// feedback rule: "reinforce by re-blending message blocks into
/// fingerprint with learning rate 1/(sampleCount+1)").
fn blend(fingerprint: &mut BehavioralFingerprint, sample: &BehavioralFingerprint, rate: f64) {
    blend_map(&mut fingerprint.char_ngrams.top_trigrams, &sample.char_ngrams.top_trigrams, rate);
    fingerprint.char_ngrams.signature = sample.char_ngrams.signature;

    blend_map(&mut fingerprint.function_words.frequencies, &sample.function_words.frequencies, rate);
    fingerprint.function_words.signature = sample.function_words.signature;

    fingerprint.vocabulary.avg_word_length = lerp(fingerprint.vocabulary.avg_word_length, sample.vocabulary.avg_word_length, rate);
    fingerprint.vocabulary.abbreviation_ratio = lerp(fingerprint.vocabulary.abbreviation_ratio, sample.vocabulary.abbreviation_ratio, rate);
    fingerprint.vocabulary.type_token_ratio = lerp(fingerprint.vocabulary.type_token_ratio, sample.vocabulary.type_token_ratio, rate);
    fingerprint.vocabulary.hapax_ratio = lerp(fingerprint.vocabulary.hapax_ratio, sample.vocabulary.hapax_ratio, rate);
    fingerprint.vocabulary.avg_syllables = lerp(fingerprint.vocabulary.avg_syllables, sample.vocabulary.avg_syllables, rate);

    fingerprint.syntax.avg_sentence_length = lerp(fingerprint.syntax.avg_sentence_length, sample.syntax.avg_sentence_length, rate);
    fingerprint.syntax.capitalization_ratio = lerp(fingerprint.syntax.capitalization_ratio, sample.syntax.capitalization_ratio, rate);
    fingerprint.syntax.comma_frequency = lerp(fingerprint.syntax.comma_frequency, sample.syntax.comma_frequency, rate);
    fingerprint.syntax.clause_complexity = lerp(fingerprint.syntax.clause_complexity, sample.syntax.clause_complexity, rate);
    fingerprint.syntax.punctuation_style = sample.syntax.punctuation_style.clone();
    fingerprint.syntax.uses_semicolons |= sample.syntax.uses_semicolons;
    fingerprint.syntax.uses_ellipses |= sample.syntax.uses_ellipses;

    fingerprint.style.formality = lerp(fingerprint.style.formality, sample.style.formality, rate);
    fingerprint.style.emoji_density = lerp(fingerprint.style.emoji_density, sample.style.emoji_density, rate);
    fingerprint.style.politeness = lerp(fingerprint.style.politeness, sample.style.politeness, rate);
    fingerprint.style.contraction_ratio = lerp(fingerprint.style.contraction_ratio, sample.style.contraction_ratio, rate);
    fingerprint.style.number_style = sample.style.number_style.clone();
    fingerprint.style.uses_lists |= sample.style.uses_lists;

    fingerprint.timing.active_hours.extend(sample.timing.active_hours.iter().copied());
    fingerprint.timing.active_days.extend(sample.timing.active_days.iter().copied());

    for (topic, count) in &sample.topics {
        *fingerprint.topics.entry(topic.clone()).or_insert(0) += count;
    }
}

fn blend_map(existing: &mut HashMap<String, f64>, sample: &HashMap<String, f64>, rate: f64) {
    for (k, v) in sample {
        let entry = existing.entry(k.clone()).or_insert(0.0);
        *entry = lerp(*entry, *v, rate);
    }
}

fn lerp(current: f64, sample: f64, rate: f64) -> f64 {
    current * (1.0 - rate) + sample * rate
}

/// Compute per-block similarity scores between a message's signals and a
/// candidate fingerprint (spec §4.8 "Matching").
fn score_blocks(signals: &BehavioralFingerprint, candidate: &BehavioralFingerprint) -> BlockScores {
    let char_ngrams = 0.7 * jaccard_keys(&signals.char_ngrams.top_trigrams, &candidate.char_ngrams.top_trigrams)
        + 0.3 * f64::from(u8::from(signals.char_ngrams.signature == candidate.char_ngrams.signature));

    let function_words = (cosine(&signals.function_words.frequencies, &candidate.function_words.frequencies)
        + if signals.function_words.signature == candidate.function_words.signature { 0.2 } else { 0.0 })
    .min(1.0);

    let vocabulary = 1.0
        - average(&[
            normalized_diff(signals.vocabulary.avg_word_length, candidate.vocabulary.avg_word_length, 10.0),
            normalized_diff(signals.vocabulary.abbreviation_ratio, candidate.vocabulary.abbreviation_ratio, 1.0),
            normalized_diff(signals.vocabulary.type_token_ratio, candidate.vocabulary.type_token_ratio, 1.0),
            normalized_diff(signals.vocabulary.hapax_ratio, candidate.vocabulary.hapax_ratio, 1.0),
            normalized_diff(signals.vocabulary.avg_syllables, candidate.vocabulary.avg_syllables, 3.0),
        ]);

    let syntax = 1.0
        - average(&[
            normalized_diff(signals.syntax.avg_sentence_length, candidate.syntax.avg_sentence_length, 20.0),
            normalized_diff(signals.syntax.capitalization_ratio, candidate.syntax.capitalization_ratio, 1.0),
            normalized_diff(signals.syntax.comma_frequency, candidate.syntax.comma_frequency, 5.0),
            normalized_diff(signals.syntax.clause_complexity, candidate.syntax.clause_complexity, 3.0),
        ]);

    let style = 1.0
        - average(&[
            normalized_diff(signals.style.formality, candidate.style.formality, 1.0),
            normalized_diff(signals.style.emoji_density, candidate.style.emoji_density, 10.0),
            normalized_diff(signals.style.politeness, candidate.style.politeness, 3.0),
            normalized_diff(signals.style.contraction_ratio, candidate.style.contraction_ratio, 1.0),
        ]);

    let hour_hit = signals
        .timing
        .active_hours
        .iter()
        .any(|h| candidate.timing.active_hours.contains(h));
    let day_hit = signals
        .timing
        .active_days
        .iter()
        .any(|d| candidate.timing.active_days.contains(d));
    let timing = 0.5 * f64::from(u8::from(hour_hit)) + 0.5 * f64::from(u8::from(day_hit));

    let topics = jaccard_keys(
        &signals.topics.iter().map(|(k, _)| (k.clone(), 1.0)).collect(),
        &candidate.topics.iter().map(|(k, _)| (k.clone(), 1.0)).collect(),
    );

    BlockScores {
        char_ngrams: char_ngrams.clamp(0.0, 1.0),
        function_words: function_words.clamp(0.0, 1.0),
        vocabulary: vocabulary.clamp(0.0, 1.0),
        syntax: syntax.clamp(0.0, 1.0),
        style: style.clamp(0.0, 1.0),
        timing: timing.clamp(0.0, 1.0),
        topics: topics.clamp(0.0, 1.0),
    }
}

fn jaccard_keys(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let keys_a: HashSet<&String> = a.keys().collect();
    let keys_b: HashSet<&String> = b.keys().collect();
    if keys_a.is_empty() && keys_b.is_empty() {
        return 0.0;
    }
    let intersection = keys_a.intersection(&keys_b).count();
    let union = keys_a.union(&keys_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    let keys: HashSet<&String> = a.keys().chain(b.keys()).collect();
    for key in keys {
        let va = a.get(key).copied().unwrap_or(0.0);
        let vb = b.get(key).copied().unwrap_or(0.0);
        dot += va * vb;
        norm_a += va * va;
        norm_b += vb * vb;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

fn normalized_diff(a: f64, b: f64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 0.0;
    }
    ((a - b).abs() / scale).min(1.0)
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_messages_score_near_one() {
        let now = Utc::now();
        let sample = MessageSample {
            text: "Hey, just wanted to say thanks for the help earlier!",
            at: now,
        };
        let signals = build_signals(&sample);
        let scores = score_blocks(&signals, &signals);
        assert!(scores.confidence() > 0.9, "confidence was {}", scores.confidence());
    }

    #[test]
    fn blend_moves_toward_sample() {
        let now = Utc::now();
        let mut fp = BehavioralFingerprint::new("u".into(), now);
        let sample = build_signals(&MessageSample {
            text: "I will definitely be there, thanks!",
            at: now,
        });
        blend(&mut fp, &sample, 1.0);
        assert_eq!(fp.vocabulary.avg_word_length, sample.vocabulary.avg_word_length);
    }

    #[test]
    fn fingerprint_not_ready_below_threshold() {
        let fp = BehavioralFingerprint::new("u".into(), Utc::now());
        assert!(!fp.is_identification_ready(50));
    }
}
