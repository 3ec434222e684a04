//! Peer-to-peer fallback (spec.md §4.3): once registration has given up
//! on discovering a registry, the Node serves its own Node API locally
//! and advertises `_nmos-node._tcp` so controllers on the same segment
//! can still find it, while registration keeps browsing in the
//! background for a registry to appear.

use std::net::SocketAddr;
use std::sync::Arc;

use nmos_core::ShutdownToken;
use nmos_discovery::{Advertisement, ServiceType, TxtRecords};

use crate::http;
use crate::model::NodeModel;

/// Advertises the Node API and serves it until `shutdown` fires. The
/// advertisement is withdrawn on the way out.
pub async fn run(model: Arc<NodeModel>, bind_addr: SocketAddr, shutdown: ShutdownToken) {
    let settings = model.settings.load();
    let mut txt = TxtRecords::default();
    txt.insert("pri", "100");
    txt.insert(
        "api_ver",
        settings
            .api_versions
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(","),
    );
    txt.insert("api_proto", settings.api_proto.as_str());
    txt.insert("api_auth", settings.api_auth.to_string());

    let advertisement: Option<Box<dyn Advertisement>> =
        match model.dns.advertise(ServiceType::Node, bind_addr.port(), txt).await {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(error = %err, "failed to advertise Node API for peer-to-peer fallback");
                None
            }
        };

    let router = http::router(model);
    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, "failed to bind Node API listener");
            return;
        }
    };

    let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
        shutdown.cancelled().await;
    });
    if let Err(err) = serve.await {
        tracing::error!(error = %err, "Node API server exited with an error");
    }

    if let Some(advertisement) = advertisement {
        let _ = advertisement.withdraw().await;
    }
}
