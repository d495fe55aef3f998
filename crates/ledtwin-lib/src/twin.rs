//! Device twin sync — registry ⇄ flat property map codec and the
//! reported/desired synchronization built on it.
//!
//! Key scheme (wire contract with the cloud twin): LED index `i` (0-based)
//! maps to `led{i+1}_status`, `led{i+1}_blink`, `led{i+1}_r`, `led{i+1}_g`
//! and `led{i+1}_b`.

use serde_json::Value;

use crate::hub::HubSession;
use crate::led::{LED_COUNT, Led, LedRegistry, SharedRegistry};

/// Flat twin property map, as sent to and received from the hub.
pub type PropertyMap = serde_json::Map<String, Value>;

/// One LED attribute in the key scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedAttr {
    Status,
    Blink,
    R,
    G,
    B,
}

impl LedAttr {
    pub const ALL: [LedAttr; 5] = [
        LedAttr::Status,
        LedAttr::Blink,
        LedAttr::R,
        LedAttr::G,
        LedAttr::B,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            LedAttr::Status => "status",
            LedAttr::Blink => "blink",
            LedAttr::R => "r",
            LedAttr::G => "g",
            LedAttr::B => "b",
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        LedAttr::ALL.into_iter().find(|a| a.suffix() == s)
    }

    fn value_of(self, led: &Led) -> Value {
        match self {
            LedAttr::Status => Value::Bool(led.status),
            LedAttr::Blink => Value::Bool(led.blink),
            LedAttr::R => Value::from(led.color.r),
            LedAttr::G => Value::from(led.color.g),
            LedAttr::B => Value::from(led.color.b),
        }
    }

    /// Store a coerced value into `led`. Returns `false` if the value has the wrong shape.
    fn assign(self, led: &mut Led, value: &Value) -> bool {
        match self {
            LedAttr::Status => coerce_bool(value).map(|v| led.status = v).is_some(),
            LedAttr::Blink => coerce_bool(value).map(|v| led.blink = v).is_some(),
            LedAttr::R => coerce_channel(value).map(|v| led.color.r = v).is_some(),
            LedAttr::G => coerce_channel(value).map(|v| led.color.g = v).is_some(),
            LedAttr::B => coerce_channel(value).map(|v| led.color.b = v).is_some(),
        }
    }
}

/// Twin key for LED `index` (0-based) and `attr`.
pub fn property_key(index: usize, attr: LedAttr) -> String {
    format!("led{}_{}", index + 1, attr.suffix())
}

/// Inverse of [`property_key`]. Returns `None` for keys outside the scheme.
pub fn parse_property_key(key: &str) -> Option<(usize, LedAttr)> {
    let rest = key.strip_prefix("led")?;
    let (number, suffix) = rest.split_once('_')?;
    if number.starts_with('0') || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: usize = number.parse().ok()?;
    if !(1..=LED_COUNT).contains(&n) {
        return None;
    }
    Some((n - 1, LedAttr::from_suffix(suffix)?))
}

/// Every key in the scheme, LED by LED.
pub fn all_property_keys() -> Vec<String> {
    (0..LED_COUNT)
        .flat_map(|i| LedAttr::ALL.into_iter().map(move |a| property_key(i, a)))
        .collect()
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Some(true),
            "off" | "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_channel(value: &Value) -> Option<u8> {
    let n = value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0)
            .map(|f| f as u64)
    })?;
    u8::try_from(n).ok()
}

/// Flatten the registry into the reported-properties key scheme.
pub fn reported_properties(registry: &LedRegistry) -> PropertyMap {
    let mut map = PropertyMap::new();
    for (i, led) in registry.leds().iter().enumerate() {
        for attr in LedAttr::ALL {
            map.insert(property_key(i, attr), attr.value_of(led));
        }
    }
    map
}

/// What [`apply_patch`] did with each key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Number of LED attributes written from the patch.
    pub applied: usize,
    /// Scheme keys whose values could not be coerced (stored value kept).
    pub rejected: Vec<String>,
    /// Keys outside the scheme (hub metadata keys starting with `$` are not listed).
    pub unknown: Vec<String>,
}

/// Apply a desired-properties patch.
///
/// For each LED, starts from the stored attributes, overwrites only the
/// attributes present in `patch`, and writes the merged result with one
/// `set_led` call. Omitted keys are untouched.
pub fn apply_patch(registry: &mut LedRegistry, patch: &PropertyMap) -> PatchOutcome {
    let mut outcome = PatchOutcome::default();
    for key in patch.keys() {
        if !key.starts_with('$') && parse_property_key(key).is_none() {
            log::debug!("[twin] ignoring unknown desired property {key}");
            outcome.unknown.push(key.clone());
        }
    }

    for i in 0..LED_COUNT {
        let mut led = *registry.led(i);
        for attr in LedAttr::ALL {
            let key = property_key(i, attr);
            let Some(value) = patch.get(&key) else {
                continue;
            };
            if attr.assign(&mut led, value) {
                outcome.applied += 1;
            } else {
                log::warn!("[twin] ignoring {key}: unsupported value {value}");
                outcome.rejected.push(key);
            }
        }
        registry.set_led(i, led.status, led.color, led.blink);
    }
    outcome
}

/// Push the current registry state to the hub as reported properties.
///
/// Returns the snapshot that was sent. A failed send is logged and otherwise
/// ignored; the caller decides whether to retry.
pub fn report(registry: &SharedRegistry, hub: &impl HubSession) -> PropertyMap {
    let reported = registry.read(reported_properties);
    match hub.patch_reported_properties(&reported) {
        Ok(()) => log::info!("[twin] reported properties updated"),
        Err(e) => log::warn!("[twin] could not update reported properties: {e}"),
    }
    reported
}

/// Apply a desired-properties patch under one registry lock, then report.
pub fn apply_desired_patch(
    registry: &SharedRegistry,
    hub: &impl HubSession,
    patch: &PropertyMap,
) -> PropertyMap {
    let outcome = registry.update(|reg| apply_patch(reg, patch));
    log::info!(
        "[twin] desired patch applied ({} attributes, {} rejected)",
        outcome.applied,
        outcome.rejected.len()
    );
    report(registry, hub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::local::LocalHub;
    use crate::led::Rgb;
    use serde_json::json;

    fn patch(value: Value) -> PropertyMap {
        value.as_object().unwrap().clone()
    }

    // ── key scheme ──

    #[test]
    fn keys_are_one_based() {
        assert_eq!(property_key(0, LedAttr::Status), "led1_status");
        assert_eq!(property_key(7, LedAttr::B), "led8_b");
        assert_eq!(property_key(2, LedAttr::Blink), "led3_blink");
    }

    #[test]
    fn parse_key_inverts_property_key() {
        for i in 0..LED_COUNT {
            for attr in LedAttr::ALL {
                assert_eq!(parse_property_key(&property_key(i, attr)), Some((i, attr)));
            }
        }
    }

    #[test]
    fn parse_key_rejects_outside_scheme() {
        for key in [
            "led0_r", "led9_r", "led01_r", "led1_x", "led1", "ledx_r", "$version", "led+1_r",
        ] {
            assert_eq!(parse_property_key(key), None, "{key}");
        }
    }

    #[test]
    fn all_keys_cover_forty_attributes() {
        let keys = all_property_keys();
        assert_eq!(keys.len(), LED_COUNT * 5);
        assert_eq!(keys[0], "led1_status");
        assert_eq!(keys[39], "led8_b");
    }

    // ── reported_properties ──

    #[test]
    fn reported_contains_every_key_with_typed_values() {
        let mut reg = LedRegistry::new();
        reg.set_led(0, true, Rgb::new(10, 20, 30), true);
        let map = reported_properties(&reg);
        assert_eq!(map.len(), 40);
        assert_eq!(map["led1_status"], json!(true));
        assert_eq!(map["led1_blink"], json!(true));
        assert_eq!(map["led1_r"], json!(10));
        assert_eq!(map["led1_g"], json!(20));
        assert_eq!(map["led1_b"], json!(30));
        assert_eq!(map["led2_status"], json!(false));
        assert_eq!(map["led2_r"], json!(255));
    }

    #[test]
    fn reported_ignores_scrolling_flag() {
        let mut reg = LedRegistry::new();
        reg.set_led(5, true, Rgb::RED, false);
        let before = reported_properties(&reg);
        reg.start_scrolling();
        assert_eq!(reported_properties(&reg), before);
    }

    // ── apply_patch ──

    #[test]
    fn single_key_patch_touches_only_that_attribute() {
        let mut reg = LedRegistry::new();
        for i in 0..LED_COUNT {
            reg.set_led(i, i % 2 == 0, Rgb::new(i as u8, 100, 200), i % 3 == 0);
        }
        let before = reg.clone();

        let outcome = apply_patch(&mut reg, &patch(json!({"led3_r": 10})));

        assert_eq!(outcome.applied, 1);
        let mut expected = before.clone();
        expected.set_color(2, Rgb::new(10, 100, 200));
        assert_eq!(reg, expected);
    }

    #[test]
    fn patch_roundtrip_reproduces_registry() {
        let mut source = LedRegistry::new();
        source.set_led(0, true, Rgb::new(1, 2, 3), false);
        source.set_led(3, true, Rgb::GREEN, true);
        source.set_led(7, false, Rgb::new(9, 8, 7), true);

        let mut target = LedRegistry::new();
        target.set_all_leds_color(Rgb::BLUE);
        let outcome = apply_patch(&mut target, &reported_properties(&source));

        assert_eq!(outcome.applied, 40);
        assert_eq!(target.leds(), source.leds());
    }

    #[test]
    fn patch_does_not_touch_scrolling() {
        let mut reg = LedRegistry::new();
        reg.start_scrolling();
        apply_patch(&mut reg, &patch(json!({"led1_status": true})));
        assert!(reg.is_scrolling());
        assert!(reg.led(0).status);
    }

    #[test]
    fn status_values_are_coerced() {
        let mut reg = LedRegistry::new();
        let outcome = apply_patch(
            &mut reg,
            &patch(json!({
                "led1_status": "On",
                "led2_status": 1,
                "led3_status": "true",
                "led4_blink": "yes",
                "led5_status": "Off"
            })),
        );
        assert_eq!(outcome.applied, 5);
        assert!(reg.led(0).status);
        assert!(reg.led(1).status);
        assert!(reg.led(2).status);
        assert!(reg.led(3).blink);
        assert!(!reg.led(4).status);
    }

    #[test]
    fn bad_values_are_rejected_and_keep_stored_value() {
        let mut reg = LedRegistry::new();
        reg.set_led(0, true, Rgb::new(5, 6, 7), false);
        let outcome = apply_patch(
            &mut reg,
            &patch(json!({
                "led1_r": 256,
                "led1_g": -1,
                "led1_b": "blue",
                "led1_status": null,
                "led1_blink": true
            })),
        );
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.rejected.len(), 4);
        let led = reg.led(0);
        assert_eq!(led.color, Rgb::new(5, 6, 7));
        assert!(led.status);
        assert!(led.blink);
    }

    #[test]
    fn integral_float_channels_are_accepted() {
        let mut reg = LedRegistry::new();
        apply_patch(&mut reg, &patch(json!({"led2_g": 12.0, "led2_b": 12.5})));
        assert_eq!(reg.led(1).color.g, 12);
        assert_eq!(reg.led(1).color.b, 255, "fractional value rejected");
    }

    #[test]
    fn metadata_and_unknown_keys_are_ignored() {
        let mut reg = LedRegistry::new();
        let before = reg.clone();
        let outcome = apply_patch(
            &mut reg,
            &patch(json!({"$version": 4, "led9_r": 1, "temperature": 70})),
        );
        assert_eq!(reg, before);
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.unknown.len(), 2);
        assert!(!outcome.unknown.contains(&"$version".to_string()));
    }

    #[test]
    fn empty_patch_is_noop() {
        let mut reg = LedRegistry::new();
        reg.set_led(4, true, Rgb::RED, true);
        let before = reg.clone();
        assert_eq!(apply_patch(&mut reg, &PropertyMap::new()), PatchOutcome::default());
        assert_eq!(reg, before);
    }

    // ── report / apply_desired_patch ──

    fn connected_hub() -> LocalHub {
        let hub = LocalHub::new("dev-1");
        hub.connect().unwrap();
        hub
    }

    #[test]
    fn report_sends_snapshot_to_hub() {
        let hub = connected_hub();
        let registry = SharedRegistry::default();
        registry.update(|reg| reg.set_status(1, true));

        let sent = report(&registry, &hub);

        assert_eq!(hub.last_reported(), Some(sent.clone()));
        assert_eq!(sent["led2_status"], json!(true));
    }

    #[test]
    fn report_survives_send_failure() {
        let hub = connected_hub();
        hub.set_fail_outbound(true);
        let registry = SharedRegistry::default();
        let sent = report(&registry, &hub);
        assert_eq!(sent.len(), 40);
        assert!(hub.reported().is_empty());
    }

    #[test]
    fn apply_desired_patch_updates_and_reports() {
        let hub = connected_hub();
        let registry = SharedRegistry::default();
        let reported = apply_desired_patch(
            &registry,
            &hub,
            &patch(json!({"led8_status": true, "led8_g": 0})),
        );
        let led = registry.read(|reg| *reg.led(7));
        assert!(led.status);
        assert_eq!(led.color, Rgb::new(255, 0, 255));
        assert_eq!(reported["led8_g"], json!(0));
        assert_eq!(hub.reported().len(), 1);
    }

    #[test]
    fn report_before_connect_is_dropped() {
        let hub = LocalHub::new("dev-1");
        let registry = SharedRegistry::default();
        let sent = report(&registry, &hub);
        assert_eq!(sent.len(), 40);
        assert_eq!(hub.last_reported(), None);
    }
}
