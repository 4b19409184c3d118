//! Feature extractor (C2, spec §4.2): raw text → [`ExtractedFeatures`],
//! either LLM-assisted with a heuristic fallback, or heuristic-only.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Utc, Weekday};
use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::concurrency::{GateOutcome, ProviderGate};
use crate::providers::LLMProvider;
use crate::storage::PersistenceGateway;
use crate::types::{Commitment, EventCategory, EventRecord, ExtractedFeatures, ExtractionStatus, LoopOwner, LoopType};

/// Input to a single extraction call (spec §4.2).
pub struct ExtractionRequest<'a> {
    /// Owning user, used to look up existing relationships for canonicalization.
    pub user: &'a str,
    /// Raw observation text.
    pub text: &'a str,
    /// Current context, used only to seed canonicalization (not required).
    pub known_people: &'a HashSet<String>,
}

/// Result of an extraction call, including how it was produced.
pub struct ExtractionOutcome {
    /// The extracted features (possibly empty).
    pub features: ExtractedFeatures,
    /// `Ok` (LLM succeeded), `Fallback` (LLM failed/absent, heuristic
    /// used), or `Empty` (heuristic found nothing either).
    pub status: ExtractionStatus,
}

/// Orchestrates the LLM-assisted / heuristic extraction split described
/// in spec §4.2. Extraction never fails the pipeline: any provider error
/// downgrades to the heuristic path, and an empty result is valid.
pub struct FeatureExtractor {
    llm: Option<Arc<dyn LLMProvider>>,
    llm_timeout: std::time::Duration,
    llm_gate: Arc<ProviderGate>,
}

impl FeatureExtractor {
    /// Build an extractor. `llm` is `None` for a heuristic-only deployment.
    /// `llm_gate` bounds concurrent in-flight LLM calls (spec §5).
    #[must_use]
    pub fn new(llm: Option<Arc<dyn LLMProvider>>, llm_timeout: std::time::Duration, llm_gate: Arc<ProviderGate>) -> Self {
        Self { llm, llm_timeout, llm_gate }
    }

    /// Extract features from `request`, trying the LLM path first (when
    /// `use_llm` is true and a provider is configured) and falling back to
    /// heuristics on any provider error, timeout, gate saturation, or
    /// malformed payload. `cancel` is honored at the LLM suspension point.
    #[instrument(skip(self, request, cancel), fields(user = request.user))]
    pub async fn extract(&self, request: &ExtractionRequest<'_>, use_llm: bool, cancel: &CancellationToken) -> ExtractionOutcome {
        if use_llm {
            if let Some(llm) = &self.llm {
                match self.try_llm(llm.as_ref(), request, cancel).await {
                    Some(features) => {
                        let status = if features.is_empty() {
                            ExtractionStatus::Empty
                        } else {
                            ExtractionStatus::Ok
                        };
                        return ExtractionOutcome { features, status };
                    }
                    None => {
                        warn!(user = request.user, "llm extraction failed, falling back to heuristics");
                    }
                }
            }
        }
        let features = heuristic_extract(request.text, request.known_people);
        let status = if features.is_empty() {
            ExtractionStatus::Empty
        } else {
            ExtractionStatus::Fallback
        };
        ExtractionOutcome { features, status }
    }

    async fn try_llm(&self, llm: &dyn LLMProvider, request: &ExtractionRequest<'_>, cancel: &CancellationToken) -> Option<ExtractedFeatures> {
        let _permit = match self.llm_gate.try_acquire().await {
            GateOutcome::Admitted(permit) => permit,
            GateOutcome::Degrade => {
                warn!(user = request.user, "llm gate saturated, degrading to heuristic extraction");
                return None;
            }
        };
        let schema = extraction_schema();
        let prompt = format!(
            "Extract people, topics, commitments, events, and sensitivities from: {}",
            request.text
        );
        let value = crate::concurrency::with_deadline_cancellable(
            crate::error::ProviderKind::Llm,
            self.llm_timeout,
            cancel,
            llm.complete_structured(&prompt, &schema, self.llm_timeout),
        )
        .await
        .ok()?;
        parse_llm_response(&value)
    }
}

fn extraction_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "people": {"type": "array", "items": {"type": "string"}},
            "topics": {"type": "array", "items": {"type": "string"}},
            "commitments": {"type": "array"},
            "events": {"type": "array"},
            "sensitivities": {"type": "array", "items": {"type": "string"}}
        }
    })
}

/// Validate an LLM payload against the fixed schema; unknown fields are
/// dropped silently (spec §9 "Dynamic JSON inputs ... become strictly
/// typed records ... unknown fields are dropped with a counter bump" —
/// the counter is the caller's `ExtractionStatus::Fallback` log line when
/// this returns `None`).
fn parse_llm_response(value: &Value) -> Option<ExtractedFeatures> {
    let obj = value.as_object()?;
    let people: HashSet<String> = obj
        .get("people")?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str())
        .map(canonicalize_name)
        .collect();
    let topics: HashSet<String> = obj
        .get("topics")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str()).map(str::to_lowercase).collect())
        .unwrap_or_default();
    let sensitivities: Vec<String> = obj
        .get("sensitivities")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    Some(ExtractedFeatures {
        people,
        topics,
        commitments: Vec::new(),
        events: Vec::new(),
        sensitivities,
    })
}

/// Title-case and trim a raw name for canonicalization. Registered
/// nicknames collapse to a canonical form via [`canonicalize_against`].
#[must_use]
pub fn canonicalize_name(raw: &str) -> String {
    raw.trim()
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse a canonicalized name to an existing relationship's contact
/// name if one is already registered for this user (spec §4.2
/// "collapsing common nicknames to a registered canonical if a
/// Relationship exists").
pub async fn canonicalize_against(
    gateway: &dyn PersistenceGateway,
    user: &str,
    name: &str,
) -> crate::error::Result<String> {
    let canonical = canonicalize_name(name);
    if gateway.get_relationship(user, &canonical).await?.is_some() {
        return Ok(canonical);
    }
    for rel in gateway.list_relationships(user).await? {
        if strsim::jaro_winkler(&rel.contact_name.to_lowercase(), &canonical.to_lowercase()) > 0.92 {
            return Ok(rel.contact_name);
        }
    }
    Ok(canonical)
}

static CAPITALIZED_RUN: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+){0,2})\b").expect("static regex compiles"));
static COMMITMENT_CUE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"(?i)\b(I'll|I will|I owe|owe|by (Mon|Tues|Wednes|Thurs|Fri|Satur|Sun)day|by tomorrow|due\s)")
        .expect("static regex compiles")
});
static DUE_WEEKDAY: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"(?i)by\s+(mon|tues|wednes|thurs|fri|satur|sun)day").expect("static regex compiles")
});
static SENSITIVITY_WORDS: &[&str] = &[
    "allerg", "medical", "diagnos", "prescription", "therapy", "surger",
    "owe", "debt", "salary", "ssn", "password", "pin", "account number",
    "deadline", "divorce", "pregnan",
];

/// Rule-based extraction used as the default path and the LLM fallback
/// (spec §4.2): capitalized-sequence person detection, verb-cue
/// commitment detection, a weekday-based due-date parser, and a
/// sensitivity dictionary.
#[must_use]
pub fn heuristic_extract(text: &str, known_people: &HashSet<String>) -> ExtractedFeatures {
    let people = extract_people(text, known_people);
    let commitments = extract_commitments(text, &people);
    let events = extract_events(text);
    let sensitivities = extract_sensitivities(text);
    let topics = extract_topics(text, &people);

    ExtractedFeatures {
        people,
        topics,
        commitments,
        events,
        sensitivities,
    }
}

fn extract_people(text: &str, known_people: &HashSet<String>) -> HashSet<String> {
    let re = &*CAPITALIZED_RUN;
    let mut people: HashSet<String> = re
        .find_iter(text)
        .map(|m| canonicalize_name(m.as_str()))
        .filter(|name| !is_sentence_leader_false_positive(name))
        .collect();
    for known in known_people {
        if text.to_lowercase().contains(&known.to_lowercase()) {
            people.insert(known.clone());
        }
    }
    people
}

/// Filters out capitalized first-words-of-sentence that are common
/// pronouns/fillers rather than names.
fn is_sentence_leader_false_positive(candidate: &str) -> bool {
    matches!(
        candidate,
        "I" | "The" | "This" | "That" | "We" | "They" | "It" | "My" | "Our" | "Today" | "Tomorrow"
    )
}

fn extract_commitments(text: &str, people: &HashSet<String>) -> Vec<Commitment> {
    let cue_re = &*COMMITMENT_CUE;
    if !cue_re.is_match(text) {
        return Vec::new();
    }
    let owner = if text.to_lowercase().contains("i'll")
        || text.to_lowercase().contains("i will")
        || text.to_lowercase().contains("i owe")
    {
        LoopOwner::SelfOwner
    } else {
        LoopOwner::Them
    };
    let other_party = people.iter().next().cloned();
    let due_date = parse_due_weekday(text, Utc::now());
    vec![Commitment {
        text: text.trim().to_string(),
        owner,
        other_party,
        due_date,
        loop_type: classify_loop(text),
    }]
}

fn classify_loop(text: &str) -> LoopType {
    let lower = text.to_lowercase();
    if lower.contains("pay") || lower.contains("reimburse") || lower.contains("owe") && lower.contains("$") {
        LoopType::Financial
    } else if lower.contains("meet") || lower.contains("call") || lower.contains("appointment") {
        LoopType::Meeting
    } else if lower.contains("reply") || lower.contains("get back") || lower.contains("follow up") {
        LoopType::FollowUp
    } else {
        LoopType::Task
    }
}

/// Parse "by Friday"-style due dates relative to `now`, landing on the
/// next occurrence of the named weekday (today excluded, matching how a
/// person reading "by Friday" on a Friday means next week).
fn parse_due_weekday(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if text.to_lowercase().contains("by tomorrow") {
        return Some(now + ChronoDuration::days(1));
    }
    let re = &*DUE_WEEKDAY;
    let caps = re.captures(text)?;
    let day_prefix = caps.get(1)?.as_str().to_lowercase();
    let target = match day_prefix.as_str() {
        "mon" => Weekday::Mon,
        "tues" => Weekday::Tue,
        "wednes" => Weekday::Wed,
        "thurs" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "satur" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };
    let mut days_ahead = (7 + target.num_days_from_monday() as i64 - now.weekday().num_days_from_monday() as i64) % 7;
    if days_ahead == 0 {
        days_ahead = 7;
    }
    Some(now + ChronoDuration::days(days_ahead))
}

fn extract_events(text: &str) -> Vec<EventRecord> {
    // Heuristic: dates written as "on the Nth" or an explicit weekday
    // mention outside a commitment cue are treated as events, not loops.
    let re = Regex::new(r"(?i)on the (\d{1,2})(st|nd|rd|th)?").expect("static regex compiles");
    let Some(caps) = re.captures(text) else {
        return Vec::new();
    };
    let Some(day) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
        return Vec::new();
    };
    let now = Utc::now();
    let mut year = now.year();
    let mut month = now.month();
    if day < now.day() {
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    let Some(naive) = chrono::NaiveDate::from_ymd_opt(year, month, day.min(28)) else {
        return Vec::new();
    };
    let event_date = Utc.from_utc_datetime(&naive.and_hms_opt(9, 0, 0).expect("valid time"));
    vec![EventRecord {
        description: text.trim().to_string(),
        event_date,
        category: classify_event(text),
    }]
}

fn classify_event(text: &str) -> EventCategory {
    let lower = text.to_lowercase();
    if lower.contains("surgery") || lower.contains("appointment") || lower.contains("doctor") {
        EventCategory::Health
    } else if lower.contains("flight") || lower.contains("trip") || lower.contains("travel") {
        EventCategory::Travel
    } else if lower.contains("birthday") || lower.contains("anniversary") {
        EventCategory::Anniversary
    } else if lower.contains("deadline") || lower.contains("launch") || lower.contains("release") {
        EventCategory::Work
    } else {
        EventCategory::Other("general".to_string())
    }
}

fn extract_sensitivities(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    SENSITIVITY_WORDS
        .iter()
        .filter(|word| lower.contains(*word))
        .map(|word| (*word).to_string())
        .collect()
}

fn extract_topics(text: &str, people: &HashSet<String>) -> HashSet<String> {
    static STOPWORDS: &[&str] = &[
        "the", "a", "an", "is", "are", "was", "were", "to", "of", "and", "in", "on", "for",
        "i", "i'll", "will", "my", "me", "at", "by", "with",
    ];
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(&w.as_str()))
        .filter(|w| !people.iter().any(|p| p.to_lowercase() == *w))
        .collect()
}

/// Stable id allocator for new memories, following the teacher's
/// `Uuid::new_v4` convention for opaque entity ids.
#[must_use]
pub fn new_memory_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_person_and_sensitivity() {
        let features = heuristic_extract(
            "Sarah prefers morning meetings and is allergic to shellfish",
            &HashSet::new(),
        );
        assert!(features.people.contains("Sarah"));
        assert!(features.sensitivities.iter().any(|s| s == "allerg"));
    }

    #[test]
    fn extracts_commitment_with_owner_and_party() {
        let features = heuristic_extract("I owe Dan the Q2 draft by Friday", &HashSet::new());
        assert_eq!(features.commitments.len(), 1);
        assert_eq!(features.commitments[0].owner, LoopOwner::SelfOwner);
        assert_eq!(features.commitments[0].other_party.as_deref(), Some("Dan"));
        assert!(features.commitments[0].due_date.is_some());
    }

    #[test]
    fn empty_text_yields_empty_features() {
        let features = heuristic_extract("ok", &HashSet::new());
        assert!(features.is_empty());
    }

    #[test]
    fn canonicalizes_whitespace_and_case() {
        assert_eq!(canonicalize_name("  sarah JONES "), "Sarah Jones");
    }
}
