//! spec.md §4.5's Query API pagination and expiry contract, exercised
//! over the real Registration/Query HTTP surface: `GET /nodes` carries a
//! `Link` header with `rel=prev|next|first|last`, and `GET /nodes/:id`
//! 404s once a resource's health has expired even before the garbage
//! collector has swept it.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use nmos_core::{Health, NodeData, Resource, ResourceData, ResourceId, Settings, SettingsHandle, TaiTimestamp, Version};
use nmos_registry::RegistryModel;
use tower::ServiceExt;

fn node_at(seconds: u64, health: Health) -> Resource {
    Resource::new(
        ResourceId::random(),
        Version(TaiTimestamp::new(seconds, 0)),
        ResourceData::Node(NodeData {
            hostname: None,
            api_versions: vec![],
            href: "http://localhost".into(),
            services: vec![],
            extra: serde_json::Value::Null,
        }),
        health,
    )
}

#[tokio::test]
async fn listing_nodes_returns_a_link_header_with_all_four_rels() {
    let registry = RegistryModel::new(SettingsHandle::new(Settings::default()));
    for seconds in [1, 2, 3] {
        registry.store.insert(node_at(seconds, Health::NeverExpire)).unwrap();
    }
    let router = nmos_registry::http::router(registry);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/nodes?paging.limit=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let link = response
        .headers()
        .get("Link")
        .expect("Link header must be present")
        .to_str()
        .unwrap()
        .to_string();
    assert!(link.contains("rel=\"prev\""), "{link}");
    assert!(link.contains("rel=\"next\""), "{link}");
    assert!(link.contains("rel=\"first\""), "{link}");
    assert!(link.contains("rel=\"last\""), "{link}");
}

#[tokio::test]
async fn getting_a_single_node_omits_the_link_header_but_still_succeeds() {
    let registry = RegistryModel::new(SettingsHandle::new(Settings::default()));
    let id = ResourceId::random();
    let mut resource = node_at(1, Health::NeverExpire);
    resource.id = id;
    registry.store.insert(resource).unwrap();
    let router = nmos_registry::http::router(registry);

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/nodes/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn getting_an_expired_node_404s_even_before_the_garbage_collector_sweeps_it() {
    let registry = RegistryModel::new(SettingsHandle::new(Settings::default()));
    let id = ResourceId::random();
    // A heartbeat from the first second of the TAI epoch is always more
    // than `registry_expiry_interval` behind wall-clock "now".
    let mut resource = node_at(1, Health::LastHeartbeat(1));
    resource.id = id;
    registry.store.insert(resource).unwrap();
    assert!(registry.store.find(id).is_some(), "sanity: the GC hasn't run, the resource is still in the store");

    let router = nmos_registry::http::router(registry);
    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/nodes/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
