//! Guest network mirror
//!
//! Mirrors the first guest-flagged WLAN's enabled state into the sink, and
//! carries the single actuator of the agent: toggling that WLAN. The toggle is
//! committed optimistically; the next data-sync cycle reconciles any drift.

use serde_json::json;

use crate::config::ControllerConfig;
use crate::sink::{VariableSink, GUEST_PORTAL_IDENT};
use crate::unifi::{ControllerApi, WlanConf};

/// First guest-flagged entry, if any
pub fn find_guest(wlans: &[WlanConf]) -> Option<&WlanConf> {
    wlans.iter().find(|w| w.is_guest)
}

/// Enabled flag of the guest WLAN; `None` when no guest network is configured,
/// which is nothing to mirror rather than an error.
pub fn read_state(wlans: &[WlanConf]) -> Option<bool> {
    find_guest(wlans).map(|w| w.enabled)
}

/// Push a commanded guest-network state to the controller and mirror it into
/// the sink. Returns false, touching nothing, when no guest WLAN exists or
/// the controller round-trip fails. One request, no retry.
pub async fn set_state(
    api: &dyn ControllerApi,
    sink: &dyn VariableSink,
    creds: &ControllerConfig,
    desired: bool,
) -> bool {
    let wlans = match api.list_wlanconf(creds).await {
        Ok(wlans) => wlans,
        Err(e) => {
            tracing::warn!("[Guest] wlanconf fetch failed: {}", e);
            return false;
        }
    };

    let Some(guest) = find_guest(&wlans) else {
        tracing::debug!("[Guest] No guest network configured, toggle ignored");
        return false;
    };

    // The controller primitive is "disable", so the flag is inverted
    match api.disable_wlan(creds, &guest.id, !desired).await {
        Ok(true) => {
            sink.set_value(GUEST_PORTAL_IDENT, json!(desired)).await;
            tracing::info!("[Guest] Guest network set to {}", desired);
            true
        }
        Ok(false) => {
            tracing::warn!("[Guest] Controller rejected guest toggle");
            false
        }
        Err(e) => {
            tracing::warn!("[Guest] Guest toggle failed: {}", e);
            false
        }
    }
}
