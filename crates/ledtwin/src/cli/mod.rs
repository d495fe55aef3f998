//! CLI subcommands — device session, configuration, twin inspection.

mod config_cmd;
mod inspect;
mod run;

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

pub(super) use ledtwin_lib::config::{Config, ConnectionString};
pub(super) use ledtwin_lib::error::Result;
pub(super) use ledtwin_lib::methods::MethodResponse;
pub(super) use ledtwin_lib::shutdown::ShutdownToken;
pub(super) use ledtwin_lib::twin::{self, PropertyMap};
pub(super) use ledtwin_lib::{LedtwinError, led};

const PADDING: usize = 2;

/// Options shared by every subcommand.
pub struct Context {
    pub json: bool,
    pub config_path: Option<PathBuf>,
    /// Cancelled by the Ctrl+C handler.
    pub token: ShutdownToken,
}

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

/// Load config from `custom_path` if given, else the platform default.
/// Parse problems are logged and defaults used.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    match custom_path {
        Some(path) => {
            let (config, warnings) = Config::load_from(path);
            for w in &warnings {
                log::warn!("{w}");
            }
            config
        }
        None => Config::load(),
    }
}

/// Parse a JSON object given on the command line.
pub(super) fn parse_patch(text: &str) -> Result<PropertyMap> {
    match serde_json::from_str(text)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(LedtwinError::Config(format!(
            "patch must be a JSON object, got {other}"
        ))),
    }
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    /// Where the connection string came from: "environment", "config" or null.
    pub connection_source: Option<&'static str>,
    pub device_id: Option<String>,
    pub settings: Config,
    pub problems: Vec<String>,
}

#[derive(Serialize)]
pub(super) struct KeysOutput {
    pub count: usize,
    pub keys: Vec<String>,
}

#[derive(Serialize)]
pub(super) struct MethodOutput {
    pub method: String,
    pub response: MethodResponse,
    pub reported: PropertyMap,
}

#[derive(Serialize)]
pub(super) struct PatchOutput {
    pub applied: usize,
    pub rejected: Vec<String>,
    pub unknown: Vec<String>,
    pub reported: PropertyMap,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the device against an in-process hub with an interactive console
    Run,

    /// Show current configuration and file paths
    Config {
        /// Write a default config file if none exists yet
        #[arg(long)]
        init: bool,
    },

    /// List the reported/desired property keys
    Keys,

    /// Dispatch a direct method on a fresh registry and print the result
    Method {
        /// Method name (case-sensitive), e.g. ScrollLeds
        name: String,
    },

    /// Apply a desired-properties patch to a fresh registry
    Patch {
        /// JSON object, e.g. '{"led1_status": true, "led1_r": 0}'
        #[arg(value_name = "JSON")]
        patch: String,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, ctx: &Context) -> Result<()> {
    let config_path = ctx.config_path.as_deref();
    match cmd {
        Command::Run => {
            if ctx.json {
                warn_json_unsupported("run");
            }
            run::cmd_run(config_path, ctx.token.clone())
        }
        Command::Config { init: true } => config_cmd::cmd_init(config_path),
        Command::Config { init: false } => config_cmd::cmd_config(ctx.json, config_path),
        Command::Keys => inspect::cmd_keys(ctx.json),
        Command::Method { name } => inspect::cmd_method(&name, ctx.json),
        Command::Patch { patch } => inspect::cmd_patch(&patch, ctx.json),
    }
}
