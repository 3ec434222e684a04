//! The activation scheduler of spec.md §4.7: "a single prioritised timer
//! queue ordered by scheduled TAI time. Tie-break by resource id, then by
//! request arrival order."

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nmos_core::{Clock, ResourceId, ResourceStore, ShutdownToken, TaiTimestamp};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::callbacks::{AutoResolver, TransportfileSetter};
use crate::connection_resource::ConnectionResourceKind;
use crate::store::ConnectionStore;

#[derive(Clone, Debug, Eq, PartialEq)]
struct ScheduledEntry {
    fire_time: TaiTimestamp,
    resource_id: ResourceId,
    arrival_seq: u64,
    generation: u64,
}

impl Ord for ScheduledEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.fire_time, self.resource_id, self.arrival_seq).cmp(&(
            other.fire_time,
            other.resource_id,
            other.arrival_seq,
        ))
    }
}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Drives activations for every Sender/Receiver's [`crate::connection_resource::ConnectionResource`].
/// One instance per Node (or per Node/Registry test harness); [`Self::run`]
/// should be spawned as its own long-lived task (spec.md §5).
pub struct ActivationScheduler {
    connections: Arc<ConnectionStore>,
    resources: ResourceStore,
    auto_resolver: Arc<dyn AutoResolver>,
    transportfile_setter: Arc<dyn TransportfileSetter>,
    clock: Arc<dyn Clock>,
    queue: Mutex<BinaryHeap<Reverse<ScheduledEntry>>>,
    wake: Notify,
    arrival_counter: AtomicU64,
}

impl ActivationScheduler {
    pub fn new(
        connections: Arc<ConnectionStore>,
        resources: ResourceStore,
        auto_resolver: Arc<dyn AutoResolver>,
        transportfile_setter: Arc<dyn TransportfileSetter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connections,
            resources,
            auto_resolver,
            transportfile_setter,
            clock,
            queue: Mutex::new(BinaryHeap::new()),
            wake: Notify::new(),
            arrival_counter: AtomicU64::new(0),
        }
    }

    /// Queue an activation for `resource_id` to fire at `fire_time`.
    /// Immediate activations (spec.md §4.7: "Immediate activations
    /// bypass the queue but obey the same steps") should call
    /// [`Self::fire_now`] directly instead of this.
    pub fn schedule(&self, resource_id: ResourceId, fire_time: TaiTimestamp) {
        let Some(generation) = self.connections.generation(resource_id) else {
            return;
        };
        let arrival_seq = self.arrival_counter.fetch_add(1, Ordering::Relaxed);
        self.queue.lock().push(Reverse(ScheduledEntry {
            fire_time,
            resource_id,
            arrival_seq,
            generation,
        }));
        self.wake.notify_one();
    }

    /// Fire an `activate_immediate` activation right away, bypassing the
    /// timer queue but running the identical sequence as a scheduled fire.
    pub async fn fire_now(&self, resource_id: ResourceId) {
        self.fire(resource_id).await;
    }

    /// Run the scheduler loop until `shutdown` is signalled. Every wait
    /// (the sleep until the next fire time) is woken early by a new
    /// `schedule()` call or by shutdown, per spec.md §5.
    pub async fn run(&self, shutdown: ShutdownToken) {
        loop {
            let next_wait = {
                let queue = self.queue.lock();
                queue.peek().map(|Reverse(e)| e.fire_time)
            };

            let wait_fut = async {
                match next_wait {
                    Some(fire_time) => self.clock.sleep_until(fire_time).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("activation scheduler shutting down");
                    return;
                }
                _ = wait_fut => {}
                _ = self.wake.notified() => {
                    // A new entry may have landed ahead of whatever we
                    // were waiting on; loop back and recompute next_wait.
                    continue;
                }
            }

            self.drain_due().await;
        }
    }

    async fn drain_due(&self) {
        let now = self.clock.now();
        loop {
            let due = {
                let mut queue = self.queue.lock();
                match queue.peek() {
                    Some(Reverse(entry)) if entry.fire_time <= now => queue.pop().map(|Reverse(e)| e),
                    _ => None,
                }
            };
            let Some(entry) = due else { break };

            let current_generation = self.connections.generation(entry.resource_id);
            if current_generation != Some(entry.generation) {
                tracing::debug!(resource = %entry.resource_id, "scheduled activation superseded or cancelled");
                continue;
            }
            self.fire(entry.resource_id).await;
        }
    }

    /// The firing sequence of spec.md §4.7 steps 2-6, shared by scheduled
    /// and immediate activations.
    async fn fire(&self, resource_id: ResourceId) {
        let Some(staged_params) = self.connections.staged_transport_params(resource_id) else {
            return;
        };
        let Some(resource) = self.resources.find(resource_id) else {
            tracing::warn!(resource = %resource_id, "activation fired for a resource no longer in the store");
            return;
        };
        let kind = self.connections.kind(resource_id);

        // Step 2: auto-resolve "auto" placeholders, without the
        // connection lock held (spec.md §5: no I/O across a held lock).
        let resolved = self.auto_resolver.resolve(&resource, staged_params).await;

        match resolved {
            Ok(resolved_params) => {
                // Steps 3 + 6: copy staged into active (with the resolved
                // params substituted) and clear the staged activation.
                let commit_result = self.connections.with_mut(resource_id, |cr| {
                    cr.commit_activation(resolved_params.clone());
                    Ok(())
                });
                if commit_result.is_err() {
                    return;
                }
                // Step 4: rebuild the SDP for Senders only.
                if kind == Some(ConnectionResourceKind::Sender) {
                    if let Some(active) = self.connections.active_snapshot(resource_id) {
                        match self.transportfile_setter.set_transportfile(&resource, &active).await {
                            Ok(sdp) => {
                                let _ = self.connections.with_mut(resource_id, |cr| {
                                    cr.set_transportfile(sdp);
                                    Ok(())
                                });
                            }
                            Err(err) => {
                                tracing::warn!(resource = %resource_id, error = %err, "transportfile-setter failed after activation");
                            }
                        }
                    }
                }
                // Step 5: bump the resource version so subscribers see a
                // change grain. The main envelope's JSON is untouched —
                // connection state lives in `ConnectionStore` — so the
                // mutator is a no-op; `modify` still stamps a fresh
                // version and broadcasts.
                if let Err(err) = self.resources.modify(resource_id, |_| Ok(())) {
                    tracing::warn!(resource = %resource_id, error = %err, "failed to bump version after activation");
                }
            }
            Err(err) => {
                tracing::warn!(resource = %resource_id, error = %err, "auto-resolver failed, activation aborted");
                // §8 atomicity: `active` is left untouched; `staged`'s
                // activation request is still cleared so a failed
                // activation doesn't silently retry forever.
                let _ = self.connections.with_mut(resource_id, |cr| {
                    cr.clear_activation();
                    Ok(())
                });
            }
        }
    }
}
