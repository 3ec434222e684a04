//! Node Registration Behaviour, per spec.md §4.3: discover → register →
//! heartbeat → fail → back off → rediscover, with peer-to-peer fallback
//! after repeated discovery failure.

use std::sync::Arc;
use std::time::Duration;

use nmos_core::{NmosError, Resource, ResourceType, Result, ShutdownToken};
use nmos_discovery::{discover_candidates, ResolveTimeouts, ResolvedInstance, ServiceType};

use crate::backoff::Backoff;
use crate::model::NodeModel;

/// What the heartbeat loop observed when it stopped.
enum HeartbeatOutcome {
    /// Registry returned 404: it forgot us. Re-register against the same
    /// candidate.
    ReRegister,
    /// Any other failure: give up on this candidate and rediscover.
    CandidateFailed,
    Shutdown,
}

/// Runs until `shutdown` is triggered. Intended to be spawned as its own
/// long-lived task per spec.md §5.
pub async fn run(model: Arc<NodeModel>, shutdown: ShutdownToken) {
    let settings = model.settings.load();
    let mut backoff = Backoff::new(
        settings.discovery_backoff_min,
        settings.discovery_backoff_max,
        settings.discovery_backoff_factor,
    );
    let mut peer_to_peer_failures: u32 = 0;

    loop {
        if shutdown.is_shutdown() {
            return;
        }

        let candidates = discover_registries(&model, &settings).await;
        if candidates.is_empty() {
            peer_to_peer_failures += 1;
            if peer_to_peer_failures >= settings.peer_to_peer_discovery_attempts {
                tracing::warn!(
                    attempts = peer_to_peer_failures,
                    "no registry discovered, Node continues in peer-to-peer mode"
                );
            }
            if !sleep_or_shutdown(&model, &shutdown, backoff_wait(&mut backoff)).await {
                return;
            }
            continue;
        }
        peer_to_peer_failures = 0;

        for candidate in &candidates {
            if shutdown.is_shutdown() {
                return;
            }
            match register_with_candidate(&model, candidate, &settings).await {
                Ok(()) => {
                    backoff.reset();
                    match heartbeat_until_failure(&model, candidate, &settings, &shutdown).await {
                        HeartbeatOutcome::ReRegister => {
                            match register_with_candidate(&model, candidate, &settings).await {
                                Ok(()) => {
                                    match heartbeat_until_failure(&model, candidate, &settings, &shutdown).await
                                    {
                                        HeartbeatOutcome::Shutdown => return,
                                        _ => continue,
                                    }
                                }
                                Err(err) => {
                                    tracing::warn!(error = %err, "re-registration after 404 failed");
                                    continue;
                                }
                            }
                        }
                        HeartbeatOutcome::CandidateFailed => continue,
                        HeartbeatOutcome::Shutdown => return,
                    }
                }
                Err(err) => {
                    tracing::debug!(candidate = %candidate.base_url(), error = %err, "registration failed, trying next candidate");
                    continue;
                }
            }
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

/// Returns `false` if shutdown fired during the sleep.
async fn sleep_or_shutdown(model: &NodeModel, shutdown: &ShutdownToken, wait: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = model.clock.sleep(wait) => true,
    }
}

async fn discover_registries(model: &NodeModel, settings: &nmos_core::Settings) -> Vec<ResolvedInstance> {
    let browse_timeout = settings.registration_timeout;
    let resolve_timeout = ResolveTimeouts::default();
    match discover_candidates(
        model.dns.as_ref(),
        ServiceType::Register,
        "local",
        browse_timeout,
        resolve_timeout,
    )
    .await
    {
        Ok(found) if !found.is_empty() => found,
        _ => match discover_candidates(
            model.dns.as_ref(),
            ServiceType::LegacyRegistration,
            "local",
            browse_timeout,
            resolve_timeout,
        )
        .await
        {
            Ok(found) => found,
            Err(err) => {
                tracing::debug!(error = %err, "registry discovery failed");
                Vec::new()
            }
        },
    }
}

/// spec.md §4.3 "Registration": POST `self`, then every owned
/// sub-resource in topological order.
async fn register_with_candidate(
    model: &NodeModel,
    candidate: &ResolvedInstance,
    settings: &nmos_core::Settings,
) -> Result<()> {
    let self_resource = model
        .store
        .find(model.self_id)
        .ok_or_else(|| NmosError::fatal("Node has no self resource to register"))?;
    register_one(model, candidate, &self_resource, settings).await?;

    for sub_resource in model.owned_sub_resources_in_registration_order() {
        register_one(model, candidate, &sub_resource, settings).await?;
    }
    Ok(())
}

/// POST one resource, handling the 200/201/409/4xx/5xx outcomes of
/// spec.md §4.3 step 1.
async fn register_one(
    model: &NodeModel,
    candidate: &ResolvedInstance,
    resource: &Resource,
    settings: &nmos_core::Settings,
) -> Result<()> {
    let url = format!("{}/resource", candidate.base_url());
    let (status, _body) = model
        .transport
        .post(&url, resource.to_wire(), settings.registration_timeout)
        .await?;

    match status {
        200 | 201 => Ok(()),
        409 => {
            let delete_url = format!(
                "{}/resource/{}/{}",
                candidate.base_url(),
                resource.resource_type().plural(),
                resource.id
            );
            let _ = model.transport.delete(&delete_url, settings.registration_timeout).await;
            let (retry_status, _) = model
                .transport
                .post(&url, resource.to_wire(), settings.registration_timeout)
                .await?;
            if retry_status == 200 || retry_status == 201 {
                Ok(())
            } else {
                Err(NmosError::conflict(format!(
                    "resource {} still conflicts after delete+retry",
                    resource.id
                )))
            }
        }
        401 => Err(NmosError::unauthorized("registry rejected registration token")),
        403 => Err(NmosError::forbidden("registry token lacks registration scope")),
        400..=499 => Err(NmosError::validation(format!(
            "registry rejected {} with status {status}",
            resource.id
        ))),
        _ => Err(NmosError::transient(format!(
            "registry returned {status} registering {}",
            resource.id
        ))),
    }
}

/// spec.md §4.3 "Heartbeat": fixed-interval POSTs, re-registering any
/// locally changed resource immediately beforehand.
async fn heartbeat_until_failure(
    model: &Arc<NodeModel>,
    candidate: &ResolvedInstance,
    settings: &nmos_core::Settings,
    shutdown: &ShutdownToken,
) -> HeartbeatOutcome {
    let mut changes = model.store.subscribe_changes();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return HeartbeatOutcome::Shutdown,
            _ = model.clock.sleep(settings.heartbeat_interval) => {}
        }

        // Re-register anything that changed locally since the last tick
        // before heartbeating, per spec.md §4.3.
        loop {
            match changes.try_recv() {
                Ok(change) => {
                    if let Some(post) = change.post {
                        if post.resource_type() != ResourceType::Node || post.id == model.self_id {
                            if let Err(err) = register_one(model, candidate, &post, settings).await {
                                tracing::warn!(id = %post.id, error = %err, "failed to re-register changed resource");
                            }
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::TryRecvError::Empty) => break,
                Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::TryRecvError::Closed) => break,
            }
        }

        let url = format!("{}/health/nodes/{}", candidate.base_url(), model.self_id);
        match model.transport.heartbeat(&url, settings.heartbeat_timeout).await {
            Ok(200) => continue,
            Ok(404) => return HeartbeatOutcome::ReRegister,
            _ => return HeartbeatOutcome::CandidateFailed,
        }
    }
}
