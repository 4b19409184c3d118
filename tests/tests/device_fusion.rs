//! Multi-device context fusion (C6, spec §4.6): mobile wins location ties,
//! the most recently updated device wins activity regardless of type.

use std::sync::Arc;

use salience_memory_core::config::MemoryConfig;
use salience_memory_core::context::ContextUpdate;
use salience_memory_core::service::MemoryService;
use salience_memory_core::types::DeviceType;
use salience_memory_test_utils::{FakeEmbedder, FakeGateway, FakeVectorStore};

type TestService = MemoryService<FakeGateway, FakeEmbedder, FakeVectorStore>;

fn build_service() -> TestService {
    let gateway = Arc::new(FakeGateway::new());
    MemoryService::new(gateway, None, None, None, MemoryConfig::default())
}

#[tokio::test]
async fn mobile_device_wins_location_fusion_over_desktop() {
    let service = build_service();

    service
        .set_context(
            "alex",
            "desktop-1",
            DeviceType::Desktop,
            &ContextUpdate {
                location: Some("Home Office".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("set desktop context");

    service
        .set_context(
            "alex",
            "phone-1",
            DeviceType::Mobile,
            &ContextUpdate {
                location: Some("Downtown Cafe".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("set mobile context");

    let (unified, _device) = service
        .whats_relevant("alex", None, true)
        .await
        .expect("whats relevant succeeds");
    let unified = unified.expect("unified context requested");

    assert_eq!(unified.location.as_deref(), Some("Downtown Cafe"));
    assert_eq!(unified.primary_device.as_deref(), Some("phone-1"));
    assert!(unified.active_devices.contains(&"desktop-1".to_string()));
    assert!(unified.active_devices.contains(&"phone-1".to_string()));
}

#[tokio::test]
async fn activity_fusion_prefers_most_recent_device_regardless_of_type() {
    let service = build_service();

    service
        .set_context(
            "alex",
            "phone-1",
            DeviceType::Mobile,
            &ContextUpdate {
                activity: Some("commuting".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("set mobile context");

    service
        .set_context(
            "alex",
            "desktop-1",
            DeviceType::Desktop,
            &ContextUpdate {
                activity: Some("drafting the Q2 report".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("set desktop context");

    let (unified, _device) = service
        .whats_relevant("alex", None, true)
        .await
        .expect("whats relevant succeeds");
    let unified = unified.expect("unified context requested");

    assert_eq!(unified.activity.as_deref(), Some("drafting the Q2 report"));
}

#[tokio::test]
async fn clearing_a_dimension_removes_it_from_the_frame() {
    let service = build_service();
    service
        .set_context(
            "alex",
            "phone-1",
            DeviceType::Mobile,
            &ContextUpdate {
                location: Some("Downtown Cafe".to_string()),
                mood: Some("focused".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("set context");

    let cleared = service
        .clear_context(
            "alex",
            Some("phone-1"),
            salience_memory_core::context::ClearDimensions {
                location: true,
                ..Default::default()
            },
        )
        .await
        .expect("clear context")
        .expect("frame still exists");

    assert!(cleared.location.is_none());
    assert!(cleared.mood.is_some(), "clearing location must not touch mood");
}
