//! Hub session — trait over the cloud IoT hub connection + in-process loopback.
//!
//! Transport, authentication and provisioning all live behind
//! [`HubSession`]. The core only needs the session lifecycle, outbound
//! telemetry and reported properties, and two inbound streams (desired
//! property patches and direct method calls).

use std::fmt;
use std::time::Duration;

use crate::methods::{MethodRequest, MethodResponse};
use crate::telemetry::TelemetryMessage;
use crate::twin::PropertyMap;

// ── Error type ──

/// Hub session errors.
///
/// String payloads follow the convention **"context: details"** where the
/// context names the failing step.
#[derive(Debug)]
pub enum HubError {
    NotConnected,
    ConnectFailed(String),
    SendFailed(String),
    ReceiveFailed(String),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::NotConnected => write!(f, "Hub session is not connected"),
            HubError::ConnectFailed(e) => write!(f, "Failed to connect to hub: {e}"),
            HubError::SendFailed(e) => write!(f, "Hub send failed: {e}"),
            HubError::ReceiveFailed(e) => write!(f, "Hub receive failed: {e}"),
        }
    }
}

impl std::error::Error for HubError {}

pub type Result<T> = std::result::Result<T, HubError>;

// ── Trait ──

/// A device's session with the cloud hub.
///
/// Methods take `&self` so one session can be shared (`Arc`) between the
/// method listener, the patch listener and the foreground thread.
pub trait HubSession: Send + Sync {
    fn connect(&self) -> Result<()>;
    fn disconnect(&self) -> Result<()>;
    fn device_id(&self) -> &str;
    /// Fire-and-forget device-to-cloud message.
    fn send_telemetry(&self, message: &TelemetryMessage) -> Result<()>;
    fn patch_reported_properties(&self, reported: &PropertyMap) -> Result<()>;
    /// Wait up to `timeout` for the next desired-properties patch.
    /// Returns `Ok(None)` on timeout.
    fn next_desired_patch(&self, timeout: Duration) -> Result<Option<PropertyMap>>;
    /// Wait up to `timeout` for the next direct method call.
    /// Returns `Ok(None)` on timeout.
    fn next_method_request(&self, timeout: Duration) -> Result<Option<MethodRequest>>;
    fn send_method_response(
        &self,
        request: &MethodRequest,
        response: &MethodResponse,
    ) -> Result<()>;
}

// ── Loopback implementation ──

/// In-process hub standing in for the cloud.
///
/// The device side implements [`HubSession`]; the cloud side
/// (`push_desired_patch`, `invoke_method`, `reported`, ...) lets a console or
/// a test play the role of the service. Used by the CLI and by tests.
pub mod local {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
    use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
    use std::time::Instant;

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocking FIFO with timed receive.
    struct Inbox<T> {
        queue: Mutex<VecDeque<T>>,
        ready: Condvar,
    }

    impl<T> Inbox<T> {
        fn new() -> Self {
            Inbox {
                queue: Mutex::new(VecDeque::new()),
                ready: Condvar::new(),
            }
        }

        fn push(&self, item: T) {
            lock(&self.queue).push_back(item);
            self.ready.notify_all();
        }

        fn pop_timeout(&self, timeout: Duration) -> Option<T> {
            let guard = lock(&self.queue);
            let (mut guard, _) = match self
                .ready
                .wait_timeout_while(guard, timeout, |q| q.is_empty())
            {
                Ok(r) => r,
                Err(e) => e.into_inner(),
            };
            guard.pop_front()
        }
    }

    pub struct LocalHub {
        device_id: String,
        connected: AtomicBool,
        fail_outbound: AtomicBool,
        connect_failures_left: AtomicU32,
        next_request_id: AtomicU64,
        patches: Inbox<PropertyMap>,
        methods: Inbox<MethodRequest>,
        reported: Mutex<Vec<PropertyMap>>,
        telemetry: Mutex<Vec<TelemetryMessage>>,
        responses: Mutex<Vec<(MethodRequest, MethodResponse)>>,
        response_signal: Condvar,
    }

    impl LocalHub {
        pub fn new(device_id: impl Into<String>) -> Self {
            LocalHub {
                device_id: device_id.into(),
                connected: AtomicBool::new(false),
                fail_outbound: AtomicBool::new(false),
                connect_failures_left: AtomicU32::new(0),
                next_request_id: AtomicU64::new(1),
                patches: Inbox::new(),
                methods: Inbox::new(),
                reported: Mutex::new(Vec::new()),
                telemetry: Mutex::new(Vec::new()),
                responses: Mutex::new(Vec::new()),
                response_signal: Condvar::new(),
            }
        }

        /// Loopback hub for the device named in a connection string.
        pub fn from_connection_string(cs: &crate::config::ConnectionString) -> Self {
            Self::new(cs.device_id.clone())
        }

        pub fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        /// Make the next `n` calls to `connect` fail.
        pub fn fail_connect_attempts(&self, n: u32) {
            self.connect_failures_left.store(n, Ordering::SeqCst);
        }

        /// Make every outbound call (telemetry, reported properties, method
        /// responses) fail while set.
        pub fn set_fail_outbound(&self, fail: bool) {
            self.fail_outbound.store(fail, Ordering::SeqCst);
        }

        // ── Cloud side ──

        /// Queue a desired-properties patch for the device.
        pub fn push_desired_patch(&self, patch: PropertyMap) {
            self.patches.push(patch);
        }

        /// Queue a direct method call for the device. Returns the request id.
        pub fn invoke_method(&self, name: &str, payload: serde_json::Value) -> String {
            let id = self.next_request_id.fetch_add(1, Ordering::SeqCst).to_string();
            self.methods.push(MethodRequest {
                request_id: id.clone(),
                name: name.to_string(),
                payload,
            });
            id
        }

        /// Every reported-properties patch received, oldest first.
        pub fn reported(&self) -> Vec<PropertyMap> {
            lock(&self.reported).clone()
        }

        pub fn last_reported(&self) -> Option<PropertyMap> {
            lock(&self.reported).last().cloned()
        }

        /// Every telemetry message received, oldest first.
        pub fn telemetry(&self) -> Vec<TelemetryMessage> {
            lock(&self.telemetry).clone()
        }

        /// Every method response received, oldest first.
        pub fn method_responses(&self) -> Vec<(MethodRequest, MethodResponse)> {
            lock(&self.responses).clone()
        }

        /// Wait up to `timeout` for the response to request `request_id`.
        pub fn wait_for_response(
            &self,
            request_id: &str,
            timeout: Duration,
        ) -> Option<MethodResponse> {
            let deadline = Instant::now() + timeout;
            let mut responses = lock(&self.responses);
            loop {
                if let Some((_, resp)) = responses
                    .iter()
                    .find(|(req, _)| req.request_id == request_id)
                {
                    return Some(resp.clone());
                }
                let now = Instant::now();
                if now >= deadline {
                    return None;
                }
                responses = match self.response_signal.wait_timeout(responses, deadline - now) {
                    Ok((guard, _)) => guard,
                    Err(e) => e.into_inner().0,
                };
            }
        }

        fn check_outbound(&self, what: &str) -> Result<()> {
            if !self.is_connected() {
                return Err(HubError::NotConnected);
            }
            if self.fail_outbound.load(Ordering::SeqCst) {
                return Err(HubError::SendFailed(format!(
                    "{what}: outbound failure injected"
                )));
            }
            Ok(())
        }
    }

    impl HubSession for LocalHub {
        fn connect(&self) -> Result<()> {
            let left = self.connect_failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.connect_failures_left.store(left - 1, Ordering::SeqCst);
                return Err(HubError::ConnectFailed(
                    "loopback: connect failure injected".into(),
                ));
            }
            self.connected.store(true, Ordering::SeqCst);
            log::info!("[hub] {} connected (loopback)", self.device_id);
            Ok(())
        }

        fn disconnect(&self) -> Result<()> {
            self.connected.store(false, Ordering::SeqCst);
            log::info!("[hub] {} disconnected", self.device_id);
            Ok(())
        }

        fn device_id(&self) -> &str {
            &self.device_id
        }

        fn send_telemetry(&self, message: &TelemetryMessage) -> Result<()> {
            self.check_outbound("telemetry")?;
            log::debug!("[hub] telemetry {}: {}", message.message_id, message.body);
            lock(&self.telemetry).push(message.clone());
            Ok(())
        }

        fn patch_reported_properties(&self, reported: &PropertyMap) -> Result<()> {
            self.check_outbound("reported properties")?;
            lock(&self.reported).push(reported.clone());
            Ok(())
        }

        fn next_desired_patch(&self, timeout: Duration) -> Result<Option<PropertyMap>> {
            if !self.is_connected() {
                return Err(HubError::NotConnected);
            }
            Ok(self.patches.pop_timeout(timeout))
        }

        fn next_method_request(&self, timeout: Duration) -> Result<Option<MethodRequest>> {
            if !self.is_connected() {
                return Err(HubError::NotConnected);
            }
            Ok(self.methods.pop_timeout(timeout))
        }

        fn send_method_response(
            &self,
            request: &MethodRequest,
            response: &MethodResponse,
        ) -> Result<()> {
            self.check_outbound("method response")?;
            lock(&self.responses).push((request.clone(), response.clone()));
            self.response_signal.notify_all();
            Ok(())
        }
    }
}
