//! Activation requests, per spec.md §4.7.

use nmos_core::{NmosError, Result, TaiTimestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How far from "now" an `activate_scheduled_absolute` request may lie
/// before it's rejected at PATCH time (spec.md §4.7: "Unrealistic
/// absolute times (>30 s in the future or in the past) are rejected").
pub const MAX_ABSOLUTE_SKEW: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    ActivateImmediate,
    ActivateScheduledRelative,
    ActivateScheduledAbsolute,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub mode: ActivationMode,
    /// Present for `activate_scheduled_relative` (an offset from receipt
    /// time) — represented as a `Duration` once resolved.
    #[serde(default, with = "duration_seconds_opt")]
    pub offset: Option<Duration>,
    /// Present for `activate_scheduled_absolute`.
    pub requested_time: Option<TaiTimestamp>,
}

impl ActivationRequest {
    /// Resolve this request (as received at `receive_time`) to the
    /// absolute TAI instant it should fire at, validating it per
    /// spec.md §4.7. `activate_immediate` resolves to `receive_time`
    /// itself — callers that bypass the scheduler for immediate
    /// activations never consult this, but it keeps the function total.
    pub fn resolve_fire_time(&self, receive_time: TaiTimestamp) -> Result<TaiTimestamp> {
        match self.mode {
            ActivationMode::ActivateImmediate => Ok(receive_time),
            ActivationMode::ActivateScheduledRelative => {
                let offset = self.offset.ok_or_else(|| {
                    NmosError::validation("activate_scheduled_relative requires an offset")
                })?;
                Ok(receive_time.saturating_add(offset))
            }
            ActivationMode::ActivateScheduledAbsolute => {
                let requested = self.requested_time.ok_or_else(|| {
                    NmosError::validation("activate_scheduled_absolute requires requested_time")
                })?;
                let skew = if requested >= receive_time {
                    requested.saturating_duration_since(receive_time)
                } else {
                    receive_time.saturating_duration_since(requested)
                };
                if skew > MAX_ABSOLUTE_SKEW {
                    return Err(NmosError::validation(format!(
                        "requested_time {requested} is {skew:?} from now, exceeding the {MAX_ABSOLUTE_SKEW:?} bound"
                    )));
                }
                Ok(requested)
            }
        }
    }

    pub fn is_immediate(&self) -> bool {
        self.mode == ActivationMode::ActivateImmediate
    }
}

mod duration_seconds_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => ser.serialize_some(&d.as_secs_f64()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        let value: Option<f64> = Option::deserialize(de)?;
        Ok(value.map(Duration::from_secs_f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_within_skew_resolves_unchanged() {
        let now = TaiTimestamp::new(1_000, 0);
        let req = ActivationRequest {
            mode: ActivationMode::ActivateScheduledAbsolute,
            offset: None,
            requested_time: Some(TaiTimestamp::new(1_010, 0)),
        };
        assert_eq!(req.resolve_fire_time(now).unwrap(), TaiTimestamp::new(1_010, 0));
    }

    #[test]
    fn absolute_beyond_skew_is_rejected() {
        let now = TaiTimestamp::new(1_000, 0);
        let req = ActivationRequest {
            mode: ActivationMode::ActivateScheduledAbsolute,
            offset: None,
            requested_time: Some(TaiTimestamp::new(1_100, 0)),
        };
        assert!(req.resolve_fire_time(now).is_err());
    }

    #[test]
    fn relative_adds_offset_to_receive_time() {
        let now = TaiTimestamp::new(1_000, 0);
        let req = ActivationRequest {
            mode: ActivationMode::ActivateScheduledRelative,
            offset: Some(Duration::from_secs(2)),
            requested_time: None,
        };
        assert_eq!(req.resolve_fire_time(now).unwrap(), TaiTimestamp::new(1_002, 0));
    }
}
