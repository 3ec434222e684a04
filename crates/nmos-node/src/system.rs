//! System API Behaviour, per spec.md §4.8: discover `_nmos-system._tcp`,
//! fetch `/global`, validate, deliver, then re-fetch on a randomized
//! interval. On HTTP error the current candidate is dropped and
//! discovery restarts under the same backoff law as §4.3.

use std::sync::Arc;
use std::time::Duration;

use nmos_core::callbacks::{SchemaValidator, SystemChangedHandler};
use nmos_core::{ApiVersion, ResourceType, ShutdownToken};
use nmos_discovery::{discover_candidates, ResolveTimeouts, ResolvedInstance, ServiceType};
use rand::Rng;

use crate::backoff::Backoff;
use crate::model::NodeModel;

/// Runs until `shutdown` is triggered.
pub async fn run(
    model: Arc<NodeModel>,
    validator: Arc<dyn SchemaValidator>,
    handler: Arc<dyn SystemChangedHandler>,
    shutdown: ShutdownToken,
) {
    let settings = model.settings.load();
    let mut backoff = Backoff::new(
        settings.discovery_backoff_min,
        settings.discovery_backoff_max,
        settings.discovery_backoff_factor,
    );

    loop {
        if shutdown.is_shutdown() {
            return;
        }

        let candidates = discover_system_apis(&model, &settings).await;
        if candidates.is_empty() {
            if !sleep_or_shutdown(&model, &shutdown, backoff_wait(&mut backoff)).await {
                return;
            }
            continue;
        }
        backoff.reset();

        for candidate in &candidates {
            if shutdown.is_shutdown() {
                return;
            }
            if !serve_candidate(&model, candidate, &validator, &handler, &settings, &shutdown).await {
                continue;
            }
            // `serve_candidate` only returns true on shutdown.
            return;
        }

        if !sleep_or_shutdown(&model, &shutdown, backoff_wait(&mut backoff)).await {
            return;
        }
    }
}

fn backoff_wait(backoff: &mut Backoff) -> Duration {
    let mut rng = rand::thread_rng();
    backoff.next_wait(&mut rng)
}

async fn sleep_or_shutdown(model: &NodeModel, shutdown: &ShutdownToken, wait: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = model.clock.sleep(wait) => true,
    }
}

async fn discover_system_apis(model: &NodeModel, settings: &nmos_core::Settings) -> Vec<ResolvedInstance> {
    match discover_candidates(
        model.dns.as_ref(),
        ServiceType::System,
        "local",
        settings.registration_timeout,
        ResolveTimeouts::default(),
    )
    .await
    {
        Ok(found) => found,
        Err(err) => {
            tracing::debug!(error = %err, "System API discovery failed");
            Vec::new()
        }
    }
}

/// Fetch/validate/deliver/sleep against one candidate until it errors or
/// shutdown fires. Returns `true` only on shutdown; `false` means "try
/// the next candidate".
async fn serve_candidate(
    model: &NodeModel,
    candidate: &ResolvedInstance,
    validator: &Arc<dyn SchemaValidator>,
    handler: &Arc<dyn SystemChangedHandler>,
    settings: &nmos_core::Settings,
    shutdown: &ShutdownToken,
) -> bool {
    loop {
        let uri = format!("{}/global", candidate.base_url());
        match model.transport.get(&uri, settings.system_fetch_timeout).await {
            Ok((200, document)) => {
                let api_version = model.settings.load().api_versions.first().copied().unwrap_or(ApiVersion::new(1, 3));
                match validator.validate(api_version, ResourceType::Node, &document).await {
                    Ok(()) => handler.system_changed(&uri, &document).await,
                    Err(err) => {
                        tracing::warn!(error = %err, "System API document failed schema validation, ignoring");
                    }
                }
            }
            Ok((status, _)) => {
                tracing::debug!(status, candidate = %candidate.base_url(), "System API returned non-200, trying next candidate");
                return false;
            }
            Err(err) => {
                tracing::debug!(error = %err, candidate = %candidate.base_url(), "System API fetch failed, trying next candidate");
                return false;
            }
        }

        let wait = {
            let settings = model.settings.load();
            let min = settings.system_interval_min.as_secs_f64();
            let max = settings.system_interval_max.as_secs_f64();
            let mut rng = rand::thread_rng();
            Duration::from_secs_f64(rng.gen_range(min..=max))
        };
        if !sleep_or_shutdown(model, shutdown, wait).await {
            return true;
        }
    }
}
