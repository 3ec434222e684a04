//! Scenario F (spec.md §7/§8): replaying a staged PATCH against a stale
//! `If-Match` generation is rejected with 409 and leaves `staged`/
//! `active` untouched, exercised over the real Connection API HTTP
//! surface rather than `ConnectionResource` directly.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use nmos_connection::{ActivationScheduler, ConnectionApiState, ConnectionStore, IdentityAutoResolver};
use nmos_contract_tests::StaticTransportfileSetter;
use nmos_core::{Clock, MockClock, ResourceData, ResourceId, ResourceStore, SenderData, TaiTimestamp, Version};
use tower::ServiceExt;

fn router_with_sender(sender_id: ResourceId) -> (axum::Router, Arc<ConnectionStore>, Arc<dyn Clock>) {
    let resources = ResourceStore::new(true);
    resources
        .insert(nmos_core::Resource::new(
            sender_id,
            Version(TaiTimestamp::ZERO),
            ResourceData::Sender(SenderData {
                flow_id: ResourceId::random(),
                device_id: ResourceId::random(),
                transport: "urn:x-nmos:transport:rtp".into(),
                subscription: Default::default(),
                extra: serde_json::Value::Null,
            }),
            nmos_core::Health::NeverExpire,
        ))
        .unwrap();

    let connections = Arc::new(ConnectionStore::new());
    connections.insert(sender_id, nmos_connection::ConnectionResourceKind::Sender, serde_json::json!({}));

    let clock: Arc<dyn Clock> = MockClock::new(TaiTimestamp::ZERO);
    let scheduler = Arc::new(ActivationScheduler::new(
        connections.clone(),
        resources,
        Arc::new(IdentityAutoResolver),
        StaticTransportfileSetter::new("v=0\r\n"),
        clock.clone(),
    ));

    let state = ConnectionApiState {
        connections: connections.clone(),
        scheduler,
        clock: clock.clone(),
    };
    (nmos_connection::http::router(state), connections, clock)
}

fn patch_request(sender_id: ResourceId, body: serde_json::Value, if_match: Option<u64>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("PATCH")
        .uri(format!("/single/senders/{sender_id}/staged"))
        .header("content-type", "application/json");
    if let Some(generation) = if_match {
        builder = builder.header("if-match", generation.to_string());
    }
    builder.body(Body::from(serde_json::to_vec(&body).unwrap())).unwrap()
}

#[tokio::test]
async fn stale_if_match_is_rejected_with_409_and_fresh_one_succeeds() {
    let sender_id = ResourceId::random();
    let (router, connections, _clock) = router_with_sender(sender_id);

    // First PATCH with no precondition always succeeds and bumps the
    // generation via the implicit immediate activation on `master_enable`.
    let response = router
        .clone()
        .oneshot(patch_request(sender_id, serde_json::json!({"master_enable": true}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let generation_after_first = connections.generation(sender_id).unwrap();
    assert!(generation_after_first > 0);

    // Replaying against the now-stale generation 0 must be rejected.
    let stale_response = router
        .clone()
        .oneshot(patch_request(sender_id, serde_json::json!({"master_enable": false}), Some(0)))
        .await
        .unwrap();
    assert_eq!(stale_response.status(), StatusCode::CONFLICT);
    assert_eq!(connections.generation(sender_id).unwrap(), generation_after_first);

    // PATCHing with the current generation succeeds.
    let fresh_response = router
        .oneshot(patch_request(
            sender_id,
            serde_json::json!({"master_enable": false}),
            Some(generation_after_first),
        ))
        .await
        .unwrap();
    assert_eq!(fresh_response.status(), StatusCode::OK);
    assert!(connections.generation(sender_id).unwrap() > generation_after_first);
}

#[tokio::test]
async fn get_staged_and_active_reflect_the_latest_patch() {
    let sender_id = ResourceId::random();
    let (router, _connections, _clock) = router_with_sender(sender_id);

    let response = router
        .clone()
        .oneshot(patch_request(
            sender_id,
            serde_json::json!({"transport_params": [{"destination_ip": "239.0.0.1"}]}),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let get_response = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/single/senders/{sender_id}/staged"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get_response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(get_response.into_body(), usize::MAX).await.unwrap();
    let staged: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        staged["transport_params"],
        serde_json::json!([{"destination_ip": "239.0.0.1"}])
    );
}
