//! Device session — one device lifetime from render start to disconnect.
//!
//! Startup order: fresh registry, display brightness, render scheduler, then
//! [`DeviceSession::connect`] shows the connecting indicator, retries the hub
//! with backoff, reports the initial state and starts the two listeners.
//! Shutdown runs in reverse: cancel, join listeners, blank the display,
//! disconnect.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::Config;
use crate::display::DisplaySink;
use crate::error::Result;
use crate::hub::{HubError, HubSession};
use crate::led::{self, SharedRegistry};
use crate::methods;
use crate::reconnect::{self, ReconnectState};
use crate::render::{RenderScheduler, RenderTimings};
use crate::shutdown::ShutdownToken;
use crate::twin;

/// Default bounded wait used by the listeners.
pub const DEFAULT_LISTEN_POLL: Duration = Duration::from_millis(250);

/// Runtime knobs for a session, usually derived from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub brightness: f32,
    pub timings: RenderTimings,
    pub listen_poll: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            brightness: 0.1,
            timings: RenderTimings::default(),
            listen_poll: DEFAULT_LISTEN_POLL,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            brightness: config.brightness,
            timings: config.render_timings(),
            listen_poll: config.listen_poll(),
        }
    }
}

pub struct DeviceSession<H: HubSession + 'static, D: DisplaySink + 'static> {
    hub: Arc<H>,
    registry: SharedRegistry,
    token: ShutdownToken,
    settings: SessionSettings,
    scheduler: Option<RenderScheduler<D>>,
    listeners: Vec<JoinHandle<()>>,
    connected: bool,
}

impl<H: HubSession + 'static, D: DisplaySink + 'static> DeviceSession<H, D> {
    /// Create a fresh registry and start rendering it to `display`.
    pub fn start(hub: Arc<H>, display: Arc<Mutex<D>>, settings: SessionSettings) -> Result<Self> {
        Self::start_with_token(hub, display, settings, ShutdownToken::new())
    }

    /// Like [`start`](Self::start), but stopped by an externally owned token
    /// (e.g. one cancelled from a Ctrl+C handler).
    pub fn start_with_token(
        hub: Arc<H>,
        display: Arc<Mutex<D>>,
        settings: SessionSettings,
        token: ShutdownToken,
    ) -> Result<Self> {
        display
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_brightness(settings.brightness);

        let registry = SharedRegistry::default();
        let scheduler =
            RenderScheduler::spawn(registry.clone(), display, settings.timings, token.clone())?;

        Ok(Self {
            hub,
            registry,
            token,
            settings,
            scheduler: Some(scheduler),
            listeners: Vec::new(),
            connected: false,
        })
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn hub(&self) -> &H {
        &self.hub
    }

    /// Token shared by every session thread. Cancelling it stops the session.
    pub fn token(&self) -> &ShutdownToken {
        &self.token
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Connect to the hub, retrying with backoff.
    ///
    /// On success the initial state is reported and the method and patch
    /// listeners start. When the attempt limit runs out the failure indicator
    /// is shown and stays rendered until the session ends. Cancellation stops
    /// the retries without it, since the render loops are already stopping.
    pub fn connect(&mut self, reconnect: &mut ReconnectState) -> Result<()> {
        self.registry.update(led::show_connecting);
        log::info!("[session] connecting as {}", self.hub.device_id());

        while !reconnect::try_connect(reconnect, &*self.hub) {
            if reconnect.is_exhausted() {
                self.registry.update(led::show_connect_failure);
                return Err(HubError::ConnectFailed(format!(
                    "gave up after {} failed attempt(s)",
                    reconnect.consecutive_failures()
                ))
                .into());
            }
            if !self.token.sleep(reconnect.current_delay()) {
                return Err(HubError::ConnectFailed(format!(
                    "cancelled after {} failed attempt(s)",
                    reconnect.consecutive_failures()
                ))
                .into());
            }
        }

        self.connected = true;
        self.registry.update(led::show_connected);
        log::info!("[session] connected");
        twin::report(&self.registry, &*self.hub);
        self.spawn_listeners()
    }

    fn spawn_listeners(&mut self) -> Result<()> {
        let poll = self.settings.listen_poll;

        let (hub, registry, token) = (
            Arc::clone(&self.hub),
            self.registry.clone(),
            self.token.clone(),
        );
        let methods = thread::Builder::new()
            .name("method-listener".into())
            .spawn(move || run_method_listener(&*hub, &registry, poll, &token))?;
        self.listeners.push(methods);

        let (hub, registry, token) = (
            Arc::clone(&self.hub),
            self.registry.clone(),
            self.token.clone(),
        );
        let patches = thread::Builder::new()
            .name("patch-listener".into())
            .spawn(move || run_patch_listener(&*hub, &registry, poll, &token))?;
        self.listeners.push(patches);
        Ok(())
    }

    fn stop(&mut self) {
        self.token.cancel();
        for handle in self.listeners.drain(..) {
            if handle.join().is_err() {
                log::warn!("[session] listener thread panicked");
            }
        }
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown();
        }
        if std::mem::take(&mut self.connected) {
            if let Err(e) = self.hub.disconnect() {
                log::warn!("[session] disconnect failed: {e}");
            }
            log::info!("[session] disconnected");
        }
    }

    /// Cancel every session thread, blank the display and disconnect.
    pub fn shutdown(mut self) {
        self.stop();
    }
}

impl<H: HubSession + 'static, D: DisplaySink + 'static> Drop for DeviceSession<H, D> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handle direct method calls until `token` is cancelled.
pub fn run_method_listener(
    hub: &impl HubSession,
    registry: &SharedRegistry,
    poll: Duration,
    token: &ShutdownToken,
) {
    while !token.is_cancelled() {
        match hub.next_method_request(poll) {
            Ok(Some(request)) => {
                if let Err(e) = methods::handle_method_request(registry, hub, &request) {
                    log::warn!("[method] could not answer {}: {e}", request.name);
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("[method] {e}");
                if !token.sleep(poll) {
                    break;
                }
            }
        }
    }
    log::debug!("[method] listener stopped");
}

/// Apply desired-property patches until `token` is cancelled.
pub fn run_patch_listener(
    hub: &impl HubSession,
    registry: &SharedRegistry,
    poll: Duration,
    token: &ShutdownToken,
) {
    while !token.is_cancelled() {
        match hub.next_desired_patch(poll) {
            Ok(Some(patch)) => {
                twin::apply_desired_patch(registry, hub, &patch);
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("[twin] {e}");
                if !token.sleep(poll) {
                    break;
                }
            }
        }
    }
    log::debug!("[twin] listener stopped");
}
