//! `config` subcommand — show current configuration and file paths, or write
//! a default file with `--init`.

use std::path::Path;

use ledtwin_lib::config::CONNECTION_STRING_ENV;

use super::{
    Config, ConfigOutput, ConnectionString, LedtwinError, Result, kv, kv_indent, kv_width,
};

/// Where the effective connection string comes from.
fn connection_source(config: &Config) -> Option<&'static str> {
    let from_env = std::env::var(CONNECTION_STRING_ENV).is_ok_and(|v| !v.trim().is_empty());
    if from_env {
        Some("environment")
    } else if !config.connection_string.trim().is_empty() {
        Some("config")
    } else {
        None
    }
}

/// Write the default config to `custom_path` or the platform path.
/// An existing file is left alone.
pub(super) fn cmd_init(custom_path: Option<&Path>) -> Result<()> {
    let path = custom_path
        .map(Path::to_path_buf)
        .or_else(Config::path)
        .ok_or_else(|| LedtwinError::Config("no config directory".into()))?;
    if path.exists() {
        return Err(LedtwinError::Config(format!(
            "{} already exists",
            path.display()
        )));
    }
    Config::default().save_to(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(custom_path);
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());

    let source = connection_source(&config);
    let connection = config
        .effective_connection_string()
        .map(|s| ConnectionString::parse(&s));
    let problems: Vec<String> = match config.validate() {
        Ok(()) => vec![],
        Err(errors) => errors.iter().map(ToString::to_string).collect(),
    };

    if json {
        let output = ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            connection_source: source,
            device_id: connection
                .as_ref()
                .and_then(|c| c.as_ref().ok())
                .map(|c| c.device_id.clone()),
            settings: config,
            problems,
        };
        return super::print_json(&output);
    }

    // Human-readable output
    let w = kv_width(
        &["Config file:", "Connection:"],
        &[
            "brightness:",
            "listen_poll_ms:",
            "max_connect_attempts:",
            "render.steady_tick_ms:",
            "render.scroll_step_ms:",
            "render.scroll_idle_ms:",
            "telemetry.batch_size:",
            "telemetry.batch_interval_ms:",
        ],
    );

    match &config_path {
        Some(p) if config_exists => kv("Config file:", format_args!("{} (loaded)", p.display()), w),
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    match (&connection, source) {
        (Some(Ok(cs)), Some(src)) => kv("Connection:", format_args!("{cs} (from {src})"), w),
        (Some(Err(e)), _) => kv("Connection:", format_args!("invalid ({e})"), w),
        _ => kv(
            "Connection:",
            format_args!("(not set; set {CONNECTION_STRING_ENV})"),
            w,
        ),
    }
    println!();

    println!("Settings:");
    kv_indent("brightness:", config.brightness, w);
    kv_indent("listen_poll_ms:", config.listen_poll_ms, w);
    kv_indent("max_connect_attempts:", config.max_connect_attempts, w);
    kv_indent("render.steady_tick_ms:", config.render.steady_tick_ms, w);
    kv_indent("render.scroll_step_ms:", config.render.scroll_step_ms, w);
    kv_indent("render.scroll_idle_ms:", config.render.scroll_idle_ms, w);
    kv_indent("telemetry.batch_size:", config.telemetry.batch_size, w);
    kv_indent(
        "telemetry.batch_interval_ms:",
        config.telemetry.batch_interval_ms,
        w,
    );

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &problems {
            println!("  {p}");
        }
    }
    Ok(())
}
