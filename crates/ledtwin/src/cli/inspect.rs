//! `keys`, `method` and `patch` subcommands — exercise the twin codec and
//! method dispatch on a fresh registry, without a hub.

use ledtwin_lib::led::{LED_COUNT, LedRegistry};
use ledtwin_lib::methods::{self, RemoteMethod};

use super::{
    KeysOutput, MethodOutput, PatchOutput, Result, kv, kv_width, led, parse_patch,
    print_json, twin,
};

pub(super) fn cmd_keys(json: bool) -> Result<()> {
    let keys = twin::all_property_keys();
    if json {
        return print_json(&KeysOutput {
            count: keys.len(),
            keys,
        });
    }
    for chunk in keys.chunks(keys.len() / LED_COUNT) {
        println!("{}", chunk.join("  "));
    }
    Ok(())
}

pub(super) fn cmd_method(name: &str, json: bool) -> Result<()> {
    let mut registry = LedRegistry::new();
    let response = methods::dispatch(&mut registry, &RemoteMethod::from_name(name));
    let reported = twin::reported_properties(&registry);

    if json {
        return print_json(&MethodOutput {
            method: name.to_string(),
            response,
            reported,
        });
    }

    let w = kv_width(&["Method:", "Status:", "Payload:", "Scrolling:"], &[]);
    kv("Method:", name, w);
    kv("Status:", response.status, w);
    kv("Payload:", &response.payload, w);
    kv("Scrolling:", registry.is_scrolling(), w);
    println!();
    print_leds(&registry);
    Ok(())
}

pub(super) fn cmd_patch(text: &str, json: bool) -> Result<()> {
    let patch = parse_patch(text)?;
    let mut registry = LedRegistry::new();
    let outcome = twin::apply_patch(&mut registry, &patch);
    let reported = twin::reported_properties(&registry);

    if json {
        return print_json(&PatchOutput {
            applied: outcome.applied,
            rejected: outcome.rejected,
            unknown: outcome.unknown,
            reported,
        });
    }

    let w = kv_width(&["Applied:", "Rejected:", "Unknown:"], &[]);
    kv("Applied:", outcome.applied, w);
    if !outcome.rejected.is_empty() {
        kv("Rejected:", outcome.rejected.join(", "), w);
    }
    if !outcome.unknown.is_empty() {
        kv("Unknown:", outcome.unknown.join(", "), w);
    }
    println!();
    print_leds(&registry);
    Ok(())
}

fn print_leds(registry: &LedRegistry) {
    for (i, l) in registry.leds().iter().enumerate() {
        println!(
            "LED {}  {:<3}  {:<8}  {}",
            i + 1,
            if l.status { "on" } else { "off" },
            if l.blink { "blinking" } else { "steady" },
            led::format_color(l.color),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_succeeds() {
        assert!(cmd_keys(false).is_ok());
        assert!(cmd_keys(true).is_ok());
    }

    #[test]
    fn method_known_and_unknown_succeed() {
        assert!(cmd_method("ScrollLeds", false).is_ok());
        assert!(cmd_method("TurnLedsOff", true).is_ok());
        assert!(cmd_method("Bogus", false).is_ok());
    }

    #[test]
    fn patch_with_bad_values_still_succeeds() {
        assert!(cmd_patch(r#"{"led1_r": 999, "led2_status": "on", "x": 1}"#, false).is_ok());
    }

    #[test]
    fn patch_rejects_invalid_json() {
        assert!(cmd_patch("not json", true).is_err());
    }
}
