//! Simulated weather telemetry — message construction and send helpers.

use std::collections::BTreeMap;
use std::ops::Range;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::hub::HubSession;
use crate::led::{self, SharedRegistry};
use crate::shutdown::ShutdownToken;
use crate::twin;

/// Fixed location reported by the simulated station.
pub const LOCATION: &str = "28.424911, -81.468962";

/// Correlation id attached to every message.
pub const CORRELATION_ID: &str = "correlation-1234";

/// Custom property flagging alert messages (`"yes"` / `"no"`).
pub const ALERT_PROPERTY: &str = "Alert";

const NORMAL_TEMPERATURE: Range<i32> = 65..75;
const ALERT_TEMPERATURE: Range<i32> = 76..80;
const HUMIDITY: Range<i32> = 40..60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weather {
    #[serde(rename = "Temperature")]
    pub temperature: i32,
    #[serde(rename = "Humidity")]
    pub humidity: i32,
}

/// JSON body of a telemetry message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryBody {
    #[serde(rename = "Weather")]
    pub weather: Weather,
    #[serde(rename = "Location")]
    pub location: String,
}

/// A device-to-cloud message with its system and custom properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub message_id: String,
    pub correlation_id: String,
    pub content_type: String,
    pub content_encoding: String,
    pub custom_properties: BTreeMap<String, String>,
    /// Serialized [`TelemetryBody`].
    pub body: String,
}

impl TelemetryMessage {
    /// Wrap a body with a fresh message id and the alert flag.
    pub fn new(body: &TelemetryBody, alert: bool) -> crate::error::Result<Self> {
        let mut custom_properties = BTreeMap::new();
        custom_properties.insert(
            ALERT_PROPERTY.to_string(),
            if alert { "yes" } else { "no" }.to_string(),
        );
        Ok(TelemetryMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            correlation_id: CORRELATION_ID.to_string(),
            content_type: "application/json".to_string(),
            content_encoding: "utf-8".to_string(),
            custom_properties,
            body: serde_json::to_string(body)?,
        })
    }

    pub fn is_alert(&self) -> bool {
        self.custom_properties
            .get(ALERT_PROPERTY)
            .is_some_and(|v| v == "yes")
    }

    /// Decode the JSON body.
    pub fn parse_body(&self) -> crate::error::Result<TelemetryBody> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Produces random weather readings.
pub struct SensorSimulator<R: Rng> {
    rng: R,
}

impl SensorSimulator<rand::rngs::ThreadRng> {
    pub fn from_thread_rng() -> Self {
        SensorSimulator::new(rand::thread_rng())
    }
}

impl<R: Rng> SensorSimulator<R> {
    pub fn new(rng: R) -> Self {
        SensorSimulator { rng }
    }

    fn reading(&mut self, temperature: Range<i32>) -> TelemetryBody {
        TelemetryBody {
            weather: Weather {
                temperature: self.rng.gen_range(temperature),
                humidity: self.rng.gen_range(HUMIDITY),
            },
            location: LOCATION.to_string(),
        }
    }

    /// Temperature 65..75, humidity 40..60.
    pub fn normal_reading(&mut self) -> TelemetryBody {
        self.reading(NORMAL_TEMPERATURE)
    }

    /// Temperature 76..80, humidity 40..60.
    pub fn alert_reading(&mut self) -> TelemetryBody {
        self.reading(ALERT_TEMPERATURE)
    }
}

/// Send `count` normal readings, one every `interval`.
///
/// After each successful send, LED `n % 8` blinks green. Failed sends are
/// logged and skipped. Stops early if `token` is cancelled. Reports the
/// registry once at the end. Returns the number of messages delivered.
pub fn send_test_batch<R: Rng>(
    hub: &impl HubSession,
    registry: &SharedRegistry,
    simulator: &mut SensorSimulator<R>,
    count: usize,
    interval: Duration,
    token: &ShutdownToken,
) -> usize {
    let mut delivered = 0;
    for n in 0..count {
        if token.is_cancelled() {
            break;
        }
        let body = simulator.normal_reading();
        match TelemetryMessage::new(&body, false)
            .and_then(|msg| hub.send_telemetry(&msg).map_err(Into::into))
        {
            Ok(()) => {
                log::info!("[telemetry] message #{} sent", n + 1);
                registry.update(|reg| led::mark_message_sent(reg, n));
                delivered += 1;
            }
            Err(e) => log::warn!("[telemetry] message #{} not sent: {e}", n + 1),
        }
        if n + 1 < count && !token.sleep(interval) {
            break;
        }
    }
    twin::report(registry, hub);
    delivered
}

/// Send one alert reading.
pub fn send_alert<R: Rng>(
    hub: &impl HubSession,
    simulator: &mut SensorSimulator<R>,
) -> crate::error::Result<TelemetryMessage> {
    let message = TelemetryMessage::new(&simulator.alert_reading(), true)?;
    hub.send_telemetry(&message)?;
    log::info!("[telemetry] alert sent from {}", hub.device_id());
    Ok(message)
}
