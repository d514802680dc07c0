// crates/lwm2m-client/src/observe/condition.rs

//! Notification condition evaluation (spec §4.7): `pmin`/`pmax` timing gates
//! plus the `lt`/`gt`/`st`/`edge` change-value triggers, and the "next
//! deadline" calculation the core uses for sleep scheduling.

use super::attributes::Attributes;
use crate::dm::ResourceValue;

/// Compares `prev` and `current` against the effective change-value
/// attributes; true if any configured condition fires (§4.7 "Any of").
///
/// Per §4.7, if no change-value attribute is set at all, any value update
/// counts as a trigger (subject to the `pmin` gate applied by the caller).
pub fn value_condition_met(attrs: &Attributes, prev: Option<&ResourceValue>, current: &ResourceValue) -> bool {
    if !attrs.has_change_value_condition() {
        return true;
    }
    let Some(prev) = prev else {
        return true;
    };

    if let (ResourceValue::Bool(was), ResourceValue::Bool(is)) = (prev, current) {
        if attrs.edge == Some(true) && *was != *is {
            return true;
        }
    }

    let (Some(p), Some(c)) = (prev.as_f64(), current.as_f64()) else {
        return false;
    };

    if let Some(st) = attrs.st {
        if (c - p).abs() >= st {
            return true;
        }
    }
    if let Some(lt) = attrs.lt {
        if (p > lt) != (c > lt) {
            return true;
        }
    }
    if let Some(gt) = attrs.gt {
        if (p > gt) != (c > gt) {
            return true;
        }
    }
    false
}

/// Whether `pmin` has elapsed since the last notification; with no `pmin`
/// configured, the gate is always open.
fn pmin_elapsed(attrs: &Attributes, now_ms: u64, last_notify_ms: u64) -> bool {
    attrs
        .pmin
        .map(|p| now_ms.saturating_sub(last_notify_ms) >= (p as u64) * 1000)
        .unwrap_or(true)
}

/// Whether `pmax` has been reached since the last notification.
fn pmax_reached(attrs: &Attributes, now_ms: u64, last_notify_ms: u64) -> bool {
    attrs
        .pmax
        .map(|p| now_ms.saturating_sub(last_notify_ms) >= (p as u64) * 1000)
        .unwrap_or(false)
}

/// Decides whether one observation is due for a notification right now.
///
/// `pending` records that a change-value condition already fired but was
/// deferred behind `pmin`; it only actually triggers once `pmin` releases.
pub fn due(attrs: &Attributes, now_ms: u64, last_notify_ms: u64, pending: bool) -> bool {
    if now_ms < last_notify_ms {
        return true; // wall-clock reversal, §5 "triggers immediate notification"
    }
    if pmax_reached(attrs, now_ms, last_notify_ms) {
        return true;
    }
    pending && pmin_elapsed(attrs, now_ms, last_notify_ms)
}

/// Earliest absolute deadline (ms) this observation next needs attention by,
/// for the core's sleep-duration calculation (§4.7 "Next notification time").
pub fn next_deadline_ms(attrs: &Attributes, now_ms: u64, last_notify_ms: u64, pending: bool) -> Option<u64> {
    if now_ms < last_notify_ms {
        return Some(now_ms);
    }
    let pmax_deadline = attrs.pmax.map(|p| last_notify_ms + (p as u64) * 1000);
    let pmin_deadline = if pending { attrs.pmin.map(|p| last_notify_ms + (p as u64) * 1000) } else { None };
    match (pmax_deadline, pmin_deadline) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}
