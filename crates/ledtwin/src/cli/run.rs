//! `run` subcommand — device session against the in-process hub, driven from
//! an interactive console.

use std::io::BufRead;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ledtwin_lib::hub::local::LocalHub;
use ledtwin_lib::reconnect::ReconnectState;
use ledtwin_lib::session::{DeviceSession, SessionSettings};
use ledtwin_lib::telemetry::{self, SensorSimulator};

use ledtwin_lib::led::LED_COUNT;
use ledtwin_lib::twin::LedAttr;

use super::{
    Config, ConnectionString, LedtwinError, PropertyMap, Result, ShutdownToken, led, parse_patch,
    twin,
};
use crate::display::TerminalDisplay;

/// How long the console waits for the device to answer a method.
const METHOD_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the failure indicator stays up after the hub connect gives up.
const FAILURE_HOLD: Duration = Duration::from_secs(3);

/// How often the console re-checks for Ctrl+C while waiting for input.
const INPUT_POLL: Duration = Duration::from_millis(200);

type Session = DeviceSession<LocalHub, TerminalDisplay<std::io::Stdout>>;

const HELP: &str = "\
Commands:
  s             send a telemetry test batch
  a             send an alert message
  m <Method>    invoke a direct method (TurnLedsOff, ScrollLeds, ...)
  p <json>      push a desired-properties patch
  l <n> <color> light LED n (1-8) in a color (name or #RRGGBB) via a patch
  r             print the last reported properties
  h             show this help
  q             quit";

/// A parsed console line.
#[derive(Debug, PartialEq)]
enum ConsoleCommand {
    SendBatch,
    SendAlert,
    Method(String),
    Patch(String),
    Light(String),
    Reported,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl ConsoleCommand {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        match (head, rest) {
            ("", _) => ConsoleCommand::Empty,
            ("s", "") => ConsoleCommand::SendBatch,
            ("a", "") => ConsoleCommand::SendAlert,
            ("m", name) if !name.is_empty() => ConsoleCommand::Method(name.to_string()),
            ("p", json) if !json.is_empty() => ConsoleCommand::Patch(json.to_string()),
            ("l", args) if !args.is_empty() => ConsoleCommand::Light(args.to_string()),
            ("r", "") => ConsoleCommand::Reported,
            ("h" | "?" | "help", "") => ConsoleCommand::Help,
            ("q" | "quit" | "exit", "") => ConsoleCommand::Quit,
            _ => ConsoleCommand::Unknown(line.to_string()),
        }
    }
}

/// Resolve the hub identity from the environment or config.
fn connection(config: &Config) -> Result<ConnectionString> {
    let raw = config.effective_connection_string().ok_or_else(|| {
        LedtwinError::Config(format!(
            "no connection string; set {} or connection_string in the config file",
            ledtwin_lib::config::CONNECTION_STRING_ENV
        ))
    })?;
    ConnectionString::parse(&raw)
}

/// Desired patch lighting one LED (`"<n> <color>"`, n is 1-based).
fn light_patch(args: &str) -> Result<PropertyMap> {
    let (number, color) = args
        .split_once(char::is_whitespace)
        .ok_or_else(|| LedtwinError::Config("usage: l <n> <color>".into()))?;
    let Some(index) = number
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=LED_COUNT).contains(n))
        .map(|n| n - 1)
    else {
        return Err(LedtwinError::Config(format!(
            "LED number must be 1-{LED_COUNT}, got {number}"
        )));
    };
    let rgb = led::parse_color(color.trim())?;

    let mut patch = PropertyMap::new();
    patch.insert(twin::property_key(index, LedAttr::Status), true.into());
    patch.insert(twin::property_key(index, LedAttr::R), rgb.r.into());
    patch.insert(twin::property_key(index, LedAttr::G), rgb.g.into());
    patch.insert(twin::property_key(index, LedAttr::B), rgb.b.into());
    Ok(patch)
}

/// Forward stdin lines over a channel so the console can poll for Ctrl+C.
/// The channel disconnects at end of input.
fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

pub(super) fn cmd_run(config_path: Option<&Path>, token: ShutdownToken) -> Result<()> {
    let config = super::load_config(config_path);
    if let Err(errors) = config.validate() {
        let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(LedtwinError::Config(joined.join("; ")));
    }
    let cs = connection(&config)?;
    log::info!("device {cs}");

    let hub = Arc::new(LocalHub::from_connection_string(&cs));
    let display = Arc::new(Mutex::new(TerminalDisplay::stdout()));
    let mut session = DeviceSession::start_with_token(
        hub,
        display,
        SessionSettings::from_config(&config),
        token,
    )?;

    let mut backoff = ReconnectState::new(config.reconnect_config());
    if let Err(e) = session.connect(&mut backoff) {
        // Leave the failure indicator up briefly before the display is cleared.
        session.token().sleep(FAILURE_HOLD);
        return Err(e);
    }
    println!("Connected as {}. Type h for help.", cs.device_id);

    let input = spawn_stdin_reader()?;
    console(&session, &config, &input);

    println!();
    session.shutdown();
    Ok(())
}

fn console(session: &Session, config: &Config, input: &Receiver<String>) {
    let mut simulator = SensorSimulator::from_thread_rng();
    while !session.token().is_cancelled() {
        let line = match input.recv_timeout(INPUT_POLL) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match ConsoleCommand::parse(&line) {
            ConsoleCommand::SendBatch => {
                let sent = telemetry::send_test_batch(
                    session.hub(),
                    session.registry(),
                    &mut simulator,
                    config.telemetry.batch_size,
                    config.batch_interval(),
                    session.token(),
                );
                println!("\nSent {sent}/{} messages", config.telemetry.batch_size);
            }
            ConsoleCommand::SendAlert => match telemetry::send_alert(session.hub(), &mut simulator) {
                Ok(msg) => println!("\nAlert sent ({})", msg.message_id),
                Err(e) => println!("\nAlert not sent: {e}"),
            },
            ConsoleCommand::Method(name) => {
                let id = session.hub().invoke_method(&name, serde_json::Value::Null);
                match session.hub().wait_for_response(&id, METHOD_TIMEOUT) {
                    Some(resp) => println!("\n{name}: {} {}", resp.status, resp.payload),
                    None => println!("\n{name}: no response"),
                }
            }
            ConsoleCommand::Patch(text) => match parse_patch(&text) {
                Ok(patch) => {
                    session.hub().push_desired_patch(patch);
                    println!("\nPatch queued");
                }
                Err(e) => println!("\nInvalid patch: {e}"),
            },
            ConsoleCommand::Light(args) => match light_patch(&args) {
                Ok(patch) => {
                    session.hub().push_desired_patch(patch);
                    println!("\nPatch queued");
                }
                Err(e) => println!("\n{e}"),
            },
            ConsoleCommand::Reported => match session.hub().last_reported() {
                Some(reported) => match serde_json::to_string_pretty(&reported) {
                    Ok(text) => println!("\n{text}"),
                    Err(e) => println!("\n{e}"),
                },
                None => println!("\n(nothing reported yet)"),
            },
            ConsoleCommand::Help => println!("\n{HELP}"),
            ConsoleCommand::Quit => break,
            ConsoleCommand::Empty => {}
            ConsoleCommand::Unknown(line) => println!("\nUnknown command: {line} (h for help)"),
        }
    }
}
