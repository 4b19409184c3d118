//! Behavioral-identity round trip (C9, spec §4.8): two distinctly-styled
//! writers build separate fingerprints, a new message in one style is
//! identified against the other candidate, and feedback reinforces the
//! fingerprint it was attributed to.

use std::sync::Arc;

use chrono::Utc;
use salience_memory_core::config::MemoryConfig;
use salience_memory_core::identity::MessageSample;
use salience_memory_core::service::MemoryService;
use salience_memory_test_utils::{FakeEmbedder, FakeGateway, FakeVectorStore};

type TestService = MemoryService<FakeGateway, FakeEmbedder, FakeVectorStore>;

const FORMAL_STYLE: &str = "I would like to confirm our meeting regarding the quarterly projections, please.";
const CASUAL_STYLE: &str = "lol yeah sure see u there, gonna be late tho but i'll try not to be";

fn build_service() -> TestService {
    let gateway = Arc::new(FakeGateway::new());
    MemoryService::new(gateway, None, None, None, MemoryConfig::default())
}

#[tokio::test]
async fn a_formally_styled_message_is_attributed_to_the_formal_writer() {
    let service = build_service();
    let now = Utc::now();

    for _ in 0..10 {
        service
            .record_behavioral_sample("priya", &MessageSample { text: FORMAL_STYLE, at: now })
            .await
            .expect("record formal sample");
        service
            .record_behavioral_sample("sam", &MessageSample { text: CASUAL_STYLE, at: now })
            .await
            .expect("record casual sample");
    }

    let sample = MessageSample {
        text: "I would like to confirm our meeting regarding the budget, please.",
        at: now,
    };
    let candidates = vec!["priya".to_string(), "sam".to_string()];
    let result = service
        .identify_user(&sample, Some(&candidates))
        .await
        .expect("identify succeeds");

    assert_eq!(result.identified_user.as_deref(), Some("priya"));
    assert!(result.prediction.confidence >= MemoryConfig::default().identification_threshold);

    service
        .behavioral_feedback(result.prediction.id, true, None, &sample)
        .await
        .expect("feedback succeeds");

    let stored = service
        .get_prediction(result.prediction.id)
        .await
        .expect("get prediction")
        .expect("prediction exists");
    assert_eq!(
        stored.feedback,
        Some(salience_memory_core::types::PredictionFeedback::Confirmed)
    );
}

#[tokio::test]
async fn identification_below_threshold_leaves_the_user_unidentified() {
    let service = build_service();
    let now = Utc::now();
    service
        .record_behavioral_sample("priya", &MessageSample { text: FORMAL_STYLE, at: now })
        .await
        .expect("record sample");

    let sample = MessageSample { text: "hey what's up", at: now };
    let result = service
        .identify_user(&sample, Some(&["priya".to_string()]))
        .await
        .expect("identify succeeds");

    assert!(result.identified_user.is_none());
}
