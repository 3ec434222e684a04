//! A Sender's or Receiver's three transport-parameter documents
//! (constraints / staged / active), per spec.md §4.7.

use nmos_core::{NmosError, Result, ResourceId, TaiTimestamp};
use serde_json::Value as Json;

use crate::activation::ActivationRequest;
use crate::merge::deep_merge;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionResourceKind {
    Sender,
    Receiver,
}

/// Outcome of a staged PATCH: either nothing needs scheduling (a plain
/// parameter edit with no activation request), or a fire time the caller
/// must hand to the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOutcome {
    NoActivation,
    ScheduleAt(TaiTimestamp),
    Cancelled,
}

/// The staged/active documents for one Sender or Receiver.
///
/// `constraints`/`staged`/`active` are kept as [`serde_json::Value`]
/// objects rather than a typed struct, per spec.md §9's design note: a
/// systems-language rewrite should keep *runtime* payloads dynamic and
/// verify them through a schema registry, converting to typed data only
/// at the HTTP boundary — the activation scheduler and the deep-merge
/// rule both operate perfectly well on the JSON tree directly.
pub struct ConnectionResource {
    pub id: ResourceId,
    pub kind: ConnectionResourceKind,
    pub constraints: Json,
    pub staged: Json,
    pub active: Json,
    /// The SDP last produced by the `TransportfileSetter` for a Sender's
    /// `active` document (spec.md §4.7 step 4). `None` for Receivers and
    /// for a Sender that hasn't activated yet.
    pub transportfile: Option<String>,
    generation: u64,
}

fn empty_document() -> Json {
    serde_json::json!({
        "master_enable": false,
        "activation": null,
        "transport_params": [],
        "receiver_id": null,
        "sender_id": null,
    })
}

impl ConnectionResource {
    pub fn new(id: ResourceId, kind: ConnectionResourceKind, constraints: Json) -> Self {
        Self {
            id,
            kind,
            constraints,
            staged: empty_document(),
            active: empty_document(),
            transportfile: None,
            generation: 0,
        }
    }

    pub fn set_transportfile(&mut self, sdp: String) {
        self.transportfile = Some(sdp);
    }

    /// Monotonically increasing counter bumped every time the staged
    /// activation request changes (new request, cancellation, or a
    /// commit). The scheduler stamps each queued entry with the
    /// generation observed at enqueue time and discards it on firing if
    /// the generation has since moved on — spec.md §4.7: "Scheduled
    /// activations may be cancelled by PATCHing `{activation: null}`
    /// before their time fires."
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn master_enable(&self, active: bool) -> bool {
        let doc = if active { &self.active } else { &self.staged };
        doc.get("master_enable").and_then(Json::as_bool).unwrap_or(false)
    }

    fn current_activation(&self) -> Option<ActivationRequest> {
        self.staged
            .get("activation")
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Apply a PATCH body to the staged document, per spec.md §4.7:
    /// deep-merge the body in (null clears, objects recurse, arrays
    /// replace), then handle the separate `activation` request field.
    ///
    /// `expected_generation`, if given, is an optimistic-concurrency guard:
    /// a client that fetched `staged` at [`Self::generation`] `g` and PATCHes
    /// expecting still-`g` gets rejected with `Conflict` (and `staged`/
    /// `active` left untouched) if another activation request already
    /// landed in between. Not part of the IS-05 wire schema itself — the
    /// HTTP layer threads it through from an `If-Match`-style precondition.
    ///
    /// Per the "Master-enable edge" note, a bare `master_enable` edit
    /// with no accompanying `activation` key is itself treated as an
    /// implicit immediate activation, so the change reaches `active`
    /// (and therefore a subscription grain) without requiring the client
    /// to additionally PATCH an activation.
    pub fn patch_staged(
        &mut self,
        mut patch: Json,
        receive_time: TaiTimestamp,
        expected_generation: Option<u64>,
    ) -> Result<PatchOutcome> {
        if let Some(expected) = expected_generation {
            if expected != self.generation {
                return Err(NmosError::conflict(format!(
                    "staged document for {} has moved on to generation {}, PATCH was against {expected}",
                    self.id, self.generation
                )));
            }
        }
        let activation_field = patch
            .as_object_mut()
            .ok_or_else(|| NmosError::validation("PATCH body must be a JSON object"))?
            .remove("activation");
        let touched_master_enable = patch
            .get("master_enable")
            .map(|_| true)
            .unwrap_or(false);

        deep_merge(&mut self.staged, &patch);

        match activation_field {
            Some(Json::Null) => {
                self.clear_activation();
                Ok(PatchOutcome::Cancelled)
            }
            Some(value) => {
                let request: ActivationRequest =
                    serde_json::from_value(value).map_err(|e| NmosError::validation(e.to_string()))?;
                let fire_time = request.resolve_fire_time(receive_time)?;
                self.set_activation(request);
                Ok(PatchOutcome::ScheduleAt(fire_time))
            }
            None if touched_master_enable => {
                self.set_activation(ActivationRequest {
                    mode: crate::activation::ActivationMode::ActivateImmediate,
                    offset: None,
                    requested_time: None,
                });
                Ok(PatchOutcome::ScheduleAt(receive_time))
            }
            None => Ok(PatchOutcome::NoActivation),
        }
    }

    pub(crate) fn set_activation(&mut self, request: ActivationRequest) {
        if let Some(obj) = self.staged.as_object_mut() {
            obj.insert(
                "activation".to_string(),
                serde_json::to_value(&request).unwrap_or(Json::Null),
            );
        }
        self.generation += 1;
    }

    pub(crate) fn clear_activation(&mut self) {
        if let Some(obj) = self.staged.as_object_mut() {
            obj.insert("activation".to_string(), Json::Null);
        }
        self.generation += 1;
    }

    pub fn staged_transport_params(&self) -> Json {
        self.staged
            .get("transport_params")
            .cloned()
            .unwrap_or_else(|| Json::Array(vec![]))
    }

    /// Step 3 of the scheduler's firing sequence (spec.md §4.7): copy
    /// staged into active, with the auto-resolved transport params
    /// substituted in, then clear the staged activation request.
    pub fn commit_activation(&mut self, resolved_transport_params: Json) {
        if let Some(obj) = self.staged.as_object_mut() {
            obj.insert("transport_params".to_string(), resolved_transport_params);
        }
        self.active = self.staged.clone();
        if let Some(obj) = self.active.as_object_mut() {
            obj.insert("activation".to_string(), Json::Null);
        }
        self.clear_activation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource() -> ConnectionResource {
        ConnectionResource::new(ResourceId::random(), ConnectionResourceKind::Sender, Json::Null)
    }

    #[test]
    fn bare_master_enable_patch_schedules_an_implicit_immediate_activation() {
        let mut r = resource();
        let outcome = r
            .patch_staged(json!({"master_enable": false}), TaiTimestamp::new(10, 0), None)
            .unwrap();
        assert_eq!(outcome, PatchOutcome::ScheduleAt(TaiTimestamp::new(10, 0)));
    }

    #[test]
    fn cancelling_clears_activation_and_bumps_generation() {
        let mut r = resource();
        r.patch_staged(
            json!({"activation": {"mode": "activate_scheduled_absolute", "requested_time": {"seconds": 20, "nanoseconds": 0}}}),
            TaiTimestamp::new(10, 0),
            None,
        )
        .unwrap();
        let gen_after_schedule = r.generation();
        let outcome = r
            .patch_staged(json!({"activation": null}), TaiTimestamp::new(11, 0), None)
            .unwrap();
        assert_eq!(outcome, PatchOutcome::Cancelled);
        assert!(r.generation() > gen_after_schedule);
        assert!(r.current_activation().is_none());
    }

    #[test]
    fn commit_copies_staged_to_active_and_clears_activation() {
        let mut r = resource();
        r.patch_staged(
            json!({"transport_params": [{"destination_ip": "auto"}], "activation": {"mode": "activate_immediate"}}),
            TaiTimestamp::new(10, 0),
            None,
        )
        .unwrap();
        r.commit_activation(json!([{"destination_ip": "239.0.0.1"}]));
        assert_eq!(r.active["transport_params"], json!([{"destination_ip": "239.0.0.1"}]));
        assert_eq!(r.active["activation"], Json::Null);
        assert_eq!(r.staged["activation"], Json::Null);
    }

    #[test]
    fn stale_generation_guard_rejects_and_leaves_documents_untouched() {
        let mut r = resource();
        r.patch_staged(json!({"master_enable": false}), TaiTimestamp::new(10, 0), None)
            .unwrap();
        let current_generation = r.generation();
        let stale = current_generation.saturating_sub(1);

        let staged_before = r.staged.clone();
        let active_before = r.active.clone();
        let err = r
            .patch_staged(json!({"master_enable": true}), TaiTimestamp::new(11, 0), Some(stale))
            .unwrap_err();
        assert_eq!(err.category(), nmos_core::ErrorCategory::Conflict);
        assert_eq!(r.staged, staged_before);
        assert_eq!(r.active, active_before);
        assert_eq!(r.generation(), current_generation);
    }
}
