//! The local control engine.
//!
//! One [`Controller`] owns the shared UDP socket, the device registry, and
//! the background tasks: an inbound receiver, a periodic discovery
//! broadcaster, and a periodic status poller. Commands are serialized per
//! device through on-demand worker tasks, so two intents for the same
//! device can never race each other on the wire while commands for
//! different devices proceed concurrently.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::channel::{mpsc, oneshot};
use log::{debug, info, warn};
use serde_json::{Value, json};

use crate::capabilities::CapabilitySet;
use crate::config::ControllerConfig;
use crate::device::{Device, DeviceState, DeviceSummary, DeviceVersions};
use crate::errors::Error;
use crate::event::{Event, EventCallback};
use crate::payload::CommandFrame;
use crate::registry::{DeviceRegistry, UpsertOutcome};
use crate::response::{self, Announcement, ResponseFrame};
use crate::runtime::{self, AsyncUdpSocket, Mutex, RwLock, UdpSocket};
use crate::session::{Outcome, RetrySession, SessionVerdict};
use crate::translate::{CommandRequest, translate};

/// How often blocking loops wake up to notice a shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Pause between a command frame and the status query that follows it,
/// so the device is not spammed while it applies the change.
const PROBE_DELAY: Duration = Duration::from_millis(100);

/// Local command-and-control engine for Govee devices.
///
/// # Example
///
/// ```ignore
/// use govee_lan_rs::{Controller, ControllerConfig, CommandRequest, PowerState};
///
/// let controller = Controller::start(ControllerConfig::default()).await?;
/// controller.discover_once().await;
/// for device in controller.list_devices().await {
///     let outcome = controller
///         .send_command(&device.id, CommandRequest::Power(PowerState::On))
///         .await?;
///     println!("{}: {:?}", device.id, outcome);
/// }
/// controller.shutdown().await;
/// ```
pub struct Controller {
    inner: Arc<Inner>,
    tasks: Vec<runtime::JoinHandle<()>>,
}

struct Inner {
    config: ControllerConfig,
    socket: UdpSocket,
    registry: RwLock<DeviceRegistry>,
    temperature_only: AtomicBool,
    discovery_enabled: AtomicBool,
    discovery_interval_ms: AtomicU64,
    running: AtomicBool,
    /// Intents queued or in flight, for the shutdown drain.
    pending: AtomicUsize,
    queues: Mutex<HashMap<String, mpsc::UnboundedSender<QueuedIntent>>>,
    /// Status forwarders for devices with an active retry session.
    watchers: Mutex<HashMap<String, mpsc::UnboundedSender<DeviceState>>>,
    /// Addresses scanned by unicast even when periodic discovery is off.
    manual_addresses: Mutex<HashSet<Ipv4Addr>>,
    event_callback: std::sync::Mutex<Option<EventCallback>>,
    scan_bytes: Vec<u8>,
    probe_bytes: Vec<u8>,
}

struct QueuedIntent {
    session: RetrySession,
    frame_bytes: Vec<u8>,
    address: SocketAddr,
    cancelled: Arc<AtomicBool>,
    outcome_tx: oneshot::Sender<Outcome>,
}

/// Marks a queued intent cancelled if the caller stops waiting before the
/// first frame goes out. Once dispatched, the session ignores the flag and
/// runs to a terminal state: a sent datagram cannot be unsent.
struct PendingCancelGuard {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for PendingCancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::Release);
        }
    }
}

impl Controller {
    /// Bind the shared socket and launch the background tasks.
    pub async fn start(config: ControllerConfig) -> Result<Self, Error> {
        let bind_addr = format!("{}:{}", config.listen_address, config.listen_port);
        let socket = UdpSocket::bind(&bind_addr)
            .await
            .map_err(|e| Error::socket("bind", e))?;
        socket
            .set_broadcast(true)
            .map_err(|e| Error::socket("set_broadcast", e))?;
        if config.broadcast_address.is_multicast() {
            // Membership lets us hear devices that announce to the group
            // unprompted; scanning still works without it.
            if let Err(e) = socket.join_multicast_v4(config.broadcast_address, config.listen_address)
            {
                warn!(
                    "could not join multicast group {}: {e}",
                    config.broadcast_address
                );
            }
        }
        if let Ok(addr) = socket.local_addr() {
            info!("controller listening on {addr}");
        }

        let scan_bytes = CommandFrame::scan().encode()?;
        let probe_bytes = CommandFrame::status_query().encode()?;

        let inner = Arc::new(Inner {
            temperature_only: AtomicBool::new(config.temperature_only),
            discovery_enabled: AtomicBool::new(config.discovery_enabled),
            discovery_interval_ms: AtomicU64::new(config.discovery_interval.as_millis() as u64),
            config,
            socket,
            registry: RwLock::new(DeviceRegistry::new()),
            running: AtomicBool::new(true),
            pending: AtomicUsize::new(0),
            queues: Mutex::new(HashMap::new()),
            watchers: Mutex::new(HashMap::new()),
            manual_addresses: Mutex::new(HashSet::new()),
            event_callback: std::sync::Mutex::new(None),
            scan_bytes,
            probe_bytes,
        });

        let tasks = vec![
            runtime::spawn(run_receiver(Arc::clone(&inner))),
            runtime::spawn(run_discovery(Arc::clone(&inner))),
            runtime::spawn(run_refresh(Arc::clone(&inner))),
        ];

        Ok(Controller { inner, tasks })
    }

    /// Send one discovery scan right now, regardless of the periodic
    /// discovery setting. Responses arrive asynchronously.
    pub async fn discover_once(&self) {
        self.inner.send_scan().await;
    }

    /// Run the periodic discovery broadcast at the given interval. The new
    /// interval applies from the next cycle.
    pub fn start_discovery(&self, interval: Duration) {
        self.inner
            .discovery_interval_ms
            .store(interval.as_millis() as u64, Ordering::SeqCst);
        self.inner.discovery_enabled.store(true, Ordering::SeqCst);
    }

    /// Enable or disable the periodic discovery broadcast.
    pub fn set_discovery_enabled(&self, enabled: bool) {
        self.inner.discovery_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn discovery_enabled(&self) -> bool {
        self.inner.discovery_enabled.load(Ordering::SeqCst)
    }

    /// Toggle the temperature-only policy at runtime. Takes effect for the
    /// next command; no re-discovery is needed.
    pub fn set_temperature_only_mode(&self, enabled: bool) {
        self.inner.temperature_only.store(enabled, Ordering::SeqCst);
        info!("temperature-only mode {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn temperature_only_mode(&self) -> bool {
        self.inner.temperature_only.load(Ordering::SeqCst)
    }

    /// Register the callback that receives [`Event`]s.
    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        *self.inner.event_callback.lock().unwrap() = Some(Box::new(callback));
    }

    /// Add an address that gets a unicast scan every discovery cycle, for
    /// devices that do not answer the group scan (other subnet rules,
    /// multicast-unfriendly APs). The first scan goes out immediately.
    pub async fn add_device_address(&self, address: Ipv4Addr) {
        self.inner.manual_addresses.lock().await.insert(address);
        let target = SocketAddr::new(IpAddr::V4(address), self.inner.config.discovery_port);
        self.inner.send_bytes(&self.inner.scan_bytes, target).await;
    }

    /// Forget a device. It will reappear if it answers a later scan.
    pub async fn remove_device(&self, device_id: &str) -> Result<(), Error> {
        self.inner
            .registry
            .write()
            .await
            .remove(device_id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(device_id.to_string()))
    }

    /// Summaries of every device seen within the staleness threshold.
    pub async fn list_devices(&self) -> Vec<DeviceSummary> {
        self.inner
            .registry
            .read()
            .await
            .list_reachable(self.inner.config.device_timeout, Instant::now())
            .iter()
            .map(Device::summary)
            .collect()
    }

    /// Snapshot of one device.
    pub async fn device(&self, device_id: &str) -> Result<DeviceSummary, Error> {
        self.inner
            .registry
            .read()
            .await
            .get(device_id)
            .map(Device::summary)
            .ok_or_else(|| Error::NotFound(device_id.to_string()))
    }

    /// Issue a command and wait for its terminal outcome.
    ///
    /// Precondition failures (unknown device, capability or policy gate,
    /// out-of-range value) return synchronously with zero packets sent.
    /// Otherwise the intent is queued FIFO behind any other intent for the
    /// same device, and resolves to [`Outcome::Confirmed`] only when the
    /// device itself reports the expected state, or [`Outcome::Failed`]
    /// after `max_attempts` transmissions. Dropping the returned future
    /// abandons the intent only while it is still queued.
    pub async fn send_command(
        &self,
        device_id: &str,
        request: CommandRequest,
    ) -> Result<Outcome, Error> {
        let inner = &self.inner;
        if !inner.running.load(Ordering::SeqCst) {
            return Err(Error::Shutdown);
        }

        let device = inner
            .registry
            .read()
            .await
            .get(device_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(device_id.to_string()))?;
        if device.is_stale(inner.config.device_timeout, Instant::now()) {
            // Past the staleness threshold the device is unreachable for
            // new commands, even if eviction has not run yet.
            return Err(Error::NotFound(device_id.to_string()));
        }

        let temperature_only = inner.temperature_only.load(Ordering::SeqCst);
        let frame = translate(&device, &request, temperature_only)?;
        let frame_bytes = frame.encode()?;

        let session = RetrySession::new(
            device_id,
            request.capability(),
            request.predicate(),
            inner.config.max_attempts,
            &inner.config.retry_backoff,
        );
        debug!(
            "queueing intent {} ({}) for device {device_id}",
            session.intent_id(),
            request.capability()
        );

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let intent = QueuedIntent {
            session,
            frame_bytes,
            address: device.address(),
            cancelled: Arc::clone(&cancelled),
            outcome_tx,
        };
        enqueue_intent(inner, device_id, intent).await;

        let mut guard = PendingCancelGuard {
            flag: cancelled,
            armed: true,
        };
        let result = outcome_rx.await;
        guard.armed = false;
        result.map_err(|_| Error::Shutdown)
    }

    /// Controller state and per-device snapshots for host debugging
    /// surfaces.
    pub async fn diagnostics(&self) -> Value {
        let inner = &self.inner;
        let devices: Vec<DeviceSummary> = inner
            .registry
            .read()
            .await
            .all()
            .iter()
            .map(Device::summary)
            .collect();
        json!({
            "running": inner.running.load(Ordering::SeqCst),
            "temperature_only": inner.temperature_only.load(Ordering::SeqCst),
            "discovery_enabled": inner.discovery_enabled.load(Ordering::SeqCst),
            "commands_in_flight": inner.pending.load(Ordering::SeqCst),
            "devices": serde_json::to_value(devices).unwrap_or(Value::Null),
        })
    }

    /// Stop the engine: no new commands are accepted, in-flight retry
    /// sessions are drained best-effort under the configured ceiling, then
    /// the background tasks are torn down.
    pub async fn shutdown(self) {
        info!("controller shutting down");
        self.inner.running.store(false, Ordering::SeqCst);

        let drained = runtime::timeout(self.inner.config.shutdown_ceiling, async {
            while self.inner.pending.load(Ordering::SeqCst) > 0 {
                runtime::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                "shutdown ceiling reached with {} command(s) unresolved",
                self.inner.pending.load(Ordering::SeqCst)
            );
        }

        for task in self.tasks {
            // Loops notice the cleared running flag within one poll
            // interval; anything slower is abandoned.
            let _ = runtime::timeout(Duration::from_secs(1), task).await;
        }
    }
}

impl Inner {
    async fn send_bytes(&self, bytes: &[u8], address: SocketAddr) {
        if let Err(e) = self.socket.send_to(bytes, &address.to_string()).await {
            warn!("socket send_to {address} error: {e}");
        }
    }

    /// Broadcast a scan to the discovery group and every manual address.
    async fn send_scan(&self) {
        let target = SocketAddr::new(
            IpAddr::V4(self.config.broadcast_address),
            self.config.discovery_port,
        );
        self.send_bytes(&self.scan_bytes, target).await;
        self.send_manual_scans().await;
    }

    async fn send_manual_scans(&self) {
        let addresses: Vec<Ipv4Addr> = self.manual_addresses.lock().await.iter().copied().collect();
        for address in addresses {
            let target = SocketAddr::new(IpAddr::V4(address), self.config.discovery_port);
            self.send_bytes(&self.scan_bytes, target).await;
        }
    }

    fn emit(&self, event: Event) {
        if let Some(callback) = self.event_callback.lock().unwrap().as_ref() {
            callback(event);
        }
    }

    /// Sleep that wakes early when the controller stops running.
    async fn pause(&self, duration: Duration) {
        let clock = runtime::Instant::now();
        while self.running.load(Ordering::SeqCst) {
            let Some(remaining) = duration.checked_sub(clock.elapsed()) else {
                return;
            };
            runtime::sleep(remaining.min(POLL_INTERVAL)).await;
        }
    }

    async fn handle_datagram(&self, data: &[u8], source: SocketAddr) {
        let frame = match response::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("dropping packet from {source}: {e}");
                return;
            }
        };
        match frame {
            ResponseFrame::Announcement(announcement) => {
                self.handle_announcement(announcement, source).await;
            }
            ResponseFrame::Status(state) => self.handle_status(state, source).await,
        }
    }

    async fn handle_announcement(&self, announcement: Announcement, source: SocketAddr) {
        let ip = announcement.ip.or(match source.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        });
        let Some(ip) = ip else {
            debug!("announcement from {source} with no usable IPv4 address");
            return;
        };
        let address = SocketAddr::new(IpAddr::V4(ip), self.config.command_port);
        let capabilities = CapabilitySet::for_model(&announcement.model);
        let versions = DeviceVersions {
            ble_hardware: announcement.ble_hardware,
            ble_software: announcement.ble_software,
            wifi_hardware: announcement.wifi_hardware,
            wifi_software: announcement.wifi_software,
        };

        let mut registry = self.registry.write().await;
        let outcome = registry.upsert(
            &announcement.device_id,
            address,
            &announcement.model,
            capabilities,
            versions,
            Instant::now(),
        );
        let summary = registry.get(&announcement.device_id).map(Device::summary);
        drop(registry);

        if matches!(outcome, UpsertOutcome::Created | UpsertOutcome::Replaced) {
            if let Some(summary) = summary {
                self.emit(Event::DeviceDiscovered(summary));
            }
        }
    }

    async fn handle_status(&self, state: DeviceState, source: SocketAddr) {
        // Status frames carry no device id; the source address is the only
        // correlation handle. Statuses are applied in arrival order whether
        // they answer a query or arrived unprompted.
        let mut registry = self.registry.write().await;
        let Some(device_id) = registry.id_by_ip(source.ip()) else {
            debug!("status from unknown address {source}, dropping");
            return;
        };
        let changed = registry.record_status(&device_id, state.clone(), Instant::now());
        let summary = registry.get(&device_id).map(Device::summary);
        drop(registry);

        if changed == Some(true) {
            if let Some(summary) = summary {
                self.emit(Event::DeviceStateChanged(summary));
            }
        }
        if let Some(watcher) = self.watchers.lock().await.get(&device_id) {
            let _ = watcher.unbounded_send(state);
        }
    }

    /// Drive one retry session to a terminal state.
    async fn run_session(&self, intent: QueuedIntent) {
        let QueuedIntent {
            mut session,
            frame_bytes,
            address,
            cancelled,
            outcome_tx,
        } = intent;
        let device_id = session.device_id().to_string();

        if cancelled.load(Ordering::Acquire) {
            debug!(
                "intent {} for {device_id} cancelled before dispatch",
                session.intent_id()
            );
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return;
        }

        let (watch_tx, mut watch_rx) = mpsc::unbounded();
        self.watchers
            .lock()
            .await
            .insert(device_id.clone(), watch_tx);

        let outcome = loop {
            session.on_dispatched();
            debug!(
                "intent {}: attempt {}/{} to {device_id} at {address}",
                session.intent_id(),
                session.attempts(),
                self.config.max_attempts
            );
            self.send_bytes(&frame_bytes, address).await;
            runtime::sleep(PROBE_DELAY).await;
            self.send_bytes(&self.probe_bytes, address).await;
            session.on_listening();

            let verdict = match runtime::timeout(self.config.response_deadline, watch_rx.next())
                .await
            {
                Ok(Some(state)) => session.on_status(&state),
                // Channel closed or deadline elapsed: either way no
                // confirming status arrived in time.
                Ok(None) | Err(_) => session.on_deadline(),
            };

            match verdict {
                SessionVerdict::Confirmed | SessionVerdict::Failed => break session.outcome(),
                SessionVerdict::Retry(delay) => {
                    debug!(
                        "intent {}: retrying {device_id} in {delay:?}",
                        session.intent_id()
                    );
                    runtime::sleep(delay).await;
                }
            }
        };

        self.watchers.lock().await.remove(&device_id);
        match &outcome {
            Outcome::Confirmed { attempts, .. } => {
                info!(
                    "intent {} confirmed by {device_id} after {attempts} attempt(s)",
                    session.intent_id()
                );
            }
            Outcome::Failed { attempts, .. } => {
                warn!(
                    "intent {} failed: {device_id} did not confirm after {attempts} attempt(s)",
                    session.intent_id()
                );
            }
        }
        let _ = outcome_tx.send(outcome);
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Hand an intent to the device's worker, spawning one if the device has
/// no commands in flight. The per-device channel is what gives same-device
/// intents their strict FIFO order.
async fn enqueue_intent(inner: &Arc<Inner>, device_id: &str, intent: QueuedIntent) {
    let mut queues = inner.queues.lock().await;
    inner.pending.fetch_add(1, Ordering::SeqCst);
    if let Some(sender) = queues.get(device_id) {
        match sender.unbounded_send(intent) {
            Ok(()) => return,
            Err(err) => {
                // Worker died without deregistering; rebuild its queue.
                let intent = err.into_inner();
                queues.remove(device_id);
                spawn_worker(inner, &mut queues, device_id, intent);
                return;
            }
        }
    }
    spawn_worker(inner, &mut queues, device_id, intent);
}

fn spawn_worker(
    inner: &Arc<Inner>,
    queues: &mut HashMap<String, mpsc::UnboundedSender<QueuedIntent>>,
    device_id: &str,
    intent: QueuedIntent,
) {
    let (sender, receiver) = mpsc::unbounded();
    let _ = sender.unbounded_send(intent);
    queues.insert(device_id.to_string(), sender);
    let inner = Arc::clone(inner);
    let device_id = device_id.to_string();
    runtime::spawn(run_device_worker(inner, device_id, receiver)).detach();
}

/// Drains one device's command queue, one session at a time, and exits
/// when the queue is empty.
async fn run_device_worker(
    inner: Arc<Inner>,
    device_id: String,
    mut queue: mpsc::UnboundedReceiver<QueuedIntent>,
) {
    loop {
        match queue.try_next() {
            Ok(Some(intent)) => inner.run_session(intent).await,
            _ => {
                // Deregister under the queues lock so a concurrent enqueue
                // either lands in this queue before removal or observes the
                // removal and spawns a fresh worker.
                let mut queues = inner.queues.lock().await;
                match queue.try_next() {
                    Ok(Some(intent)) => {
                        drop(queues);
                        inner.run_session(intent).await;
                    }
                    _ => {
                        queues.remove(&device_id);
                        return;
                    }
                }
            }
        }
    }
}

/// Shared inbound receiver: every packet on the listening socket funnels
/// through here, for all devices.
async fn run_receiver(inner: Arc<Inner>) {
    let mut buffer = [0u8; 4096];
    while inner.running.load(Ordering::SeqCst) {
        match runtime::timeout(POLL_INTERVAL, inner.socket.recv_from(&mut buffer)).await {
            Ok(Ok((size, source))) => inner.handle_datagram(&buffer[..size], source).await,
            Ok(Err(e)) => {
                warn!("socket receive error: {e}");
                runtime::sleep(Duration::from_millis(100)).await;
            }
            Err(_) => {}
        }
    }
}

/// Periodic discovery: broadcast a scan, then evict devices that stayed
/// silent past the staleness threshold. Best-effort by design; a cycle
/// with no responses is not an error.
async fn run_discovery(inner: Arc<Inner>) {
    while inner.running.load(Ordering::SeqCst) {
        if inner.discovery_enabled.load(Ordering::SeqCst) {
            inner.send_scan().await;
        } else {
            inner.send_manual_scans().await;
        }

        let expired = inner
            .registry
            .write()
            .await
            .expire(inner.config.device_timeout, Instant::now());
        for device in expired {
            info!("device {} lost, evicting", device.id());
            inner.emit(Event::DeviceLost(device.summary()));
        }

        let interval = Duration::from_millis(inner.discovery_interval_ms.load(Ordering::SeqCst));
        inner.pause(interval).await;
    }
}

/// Periodic status poll of every known device. Keeps `last_state` warm and
/// doubles as an ambient confirmation source for in-flight sessions.
async fn run_refresh(inner: Arc<Inner>) {
    while inner.running.load(Ordering::SeqCst) {
        if inner.config.refresh_enabled {
            let devices = inner.registry.read().await.all();
            for device in devices {
                inner.send_bytes(&inner.probe_bytes, device.address()).await;
            }
        }
        inner.pause(inner.config.refresh_interval).await;
    }
}
