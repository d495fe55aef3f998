//! Direct method dispatch — maps remote method calls onto registry operations.
//!
//! Unknown method names are answered with success and an "unknown method"
//! marker rather than an error status, so newer cloud-side callers never see
//! a failure from an older device.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::hub::HubSession;
use crate::led::{LedRegistry, Rgb, SharedRegistry};
use crate::twin;

pub const TURN_LEDS_OFF: &str = "TurnLedsOff";
pub const SCROLL_LEDS: &str = "ScrollLeds";

/// HTTP-style status used for every direct method response.
pub const STATUS_OK: u16 = 200;

/// A direct method call delivered by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodRequest {
    pub request_id: String,
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

/// Status code and JSON payload returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResponse {
    pub status: u16,
    pub payload: Value,
}

impl MethodResponse {
    /// `200` with `{"result": true, "data": message}`.
    pub fn ok(message: &str) -> Self {
        MethodResponse {
            status: STATUS_OK,
            payload: json!({ "result": true, "data": message }),
        }
    }
}

/// Recognized direct methods. Matching is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteMethod {
    TurnLedsOff,
    ScrollLeds,
    Unknown(String),
}

impl RemoteMethod {
    pub fn from_name(name: &str) -> Self {
        match name {
            TURN_LEDS_OFF => RemoteMethod::TurnLedsOff,
            SCROLL_LEDS => RemoteMethod::ScrollLeds,
            other => RemoteMethod::Unknown(other.to_string()),
        }
    }
}

/// Apply a method to the registry and build its response. No I/O.
pub fn dispatch(registry: &mut LedRegistry, method: &RemoteMethod) -> MethodResponse {
    match method {
        RemoteMethod::TurnLedsOff => {
            registry.set_all_leds_off();
            MethodResponse::ok("Leds are all off")
        }
        RemoteMethod::ScrollLeds => {
            registry.set_all_leds_off();
            registry.set_all_leds_color(Rgb::WHITE);
            registry.start_scrolling();
            MethodResponse::ok("Leds are now scrolling")
        }
        RemoteMethod::Unknown(_) => MethodResponse::ok("unknown method"),
    }
}

/// Handle one method request end to end: dispatch under a single registry
/// lock, answer through the hub, then report the new state.
///
/// The registry change and the report happen even if the response cannot be
/// delivered; the send error is returned so the listener can log it.
pub fn handle_method_request(
    registry: &SharedRegistry,
    hub: &impl HubSession,
    request: &MethodRequest,
) -> crate::hub::Result<MethodResponse> {
    let method = RemoteMethod::from_name(&request.name);
    let response = registry.update(|reg| dispatch(reg, &method));
    match method {
        RemoteMethod::Unknown(ref name) => log::info!("[method] executed unknown method: {name}"),
        _ => log::info!("[method] executed {}", request.name),
    }

    let sent = hub.send_method_response(request, &response);
    twin::report(registry, hub);
    sent.map(|()| response)
}
