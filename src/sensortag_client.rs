use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::TransportError;
use crate::protocol::ADVERTISED_NAMES;
use crate::session::SensorTag;
use crate::transport::{NotificationHandler, Transport};

type HandlerMap = Arc<Mutex<HashMap<Uuid, NotificationHandler>>>;

fn lock_handlers(
    handlers: &Mutex<HashMap<Uuid, NotificationHandler>>,
) -> MutexGuard<'_, HashMap<Uuid, NotificationHandler>> {
    handlers.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── SensorTagDevice ───────────────────────────────────────────────────────────

/// A SensorTag discovered during a BLE scan.
///
/// Returned by [`SensorTagClient::scan_all`]; pass to
/// [`SensorTagClient::connect_to`] to open a session.
#[derive(Clone, Debug)]
pub struct SensorTagDevice {
    /// Advertised local name, one of [`SensorTagClientConfig::name_filters`].
    pub name: String,
    /// Platform BLE identifier.
    /// • macOS / Windows: a UUID string
    /// • Linux: a Bluetooth MAC address (`AA:BB:CC:DD:EE:FF`)
    pub id: String,
    pub(crate) peripheral: Peripheral,
    /// The adapter that discovered this device, reused for the disconnect
    /// watcher.
    pub(crate) adapter: Adapter,
}

// ── SensorTagClientConfig ─────────────────────────────────────────────────────

/// Configuration for [`SensorTagClient`].
#[derive(Debug, Clone)]
pub struct SensorTagClientConfig {
    /// BLE scan duration in seconds before giving up. Default: `15`.
    pub scan_timeout_secs: u64,
    /// Upper bound on `Peripheral::connect`. Default: `10`.
    pub connect_timeout_secs: u64,
    /// Upper bound on GATT service discovery. Default: `15`.
    pub discover_timeout_secs: u64,
    /// A peripheral matches when its local name equals one of these.
    ///
    /// Defaults to [`ADVERTISED_NAMES`]. Narrow it to pick one board out of
    /// several in range.
    pub name_filters: Vec<String>,
}

impl Default for SensorTagClientConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 15,
            connect_timeout_secs: 10,
            discover_timeout_secs: 15,
            name_filters: ADVERTISED_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }
}

// ── SensorTagClient ───────────────────────────────────────────────────────────

/// BLE client for CC2650 SensorTags.
///
/// Scans, connects and discovers services, then hands back a
/// [`SensorTag`] session running on a [`BleTransport`]. Which sensors are
/// switched on and subscribed is left entirely to the session.
pub struct SensorTagClient {
    config: SensorTagClientConfig,
}

impl SensorTagClient {
    pub fn new(config: SensorTagClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SensorTagClientConfig {
        &self.config
    }

    /// `true` if an advertised local name is one this client connects to.
    pub fn matches(&self, local_name: &str) -> bool {
        self.config.name_filters.iter().any(|n| n == local_name)
    }

    // ── Public: scan ─────────────────────────────────────────────────────────

    /// Scan for **all** nearby SensorTags and return them.
    ///
    /// The scan runs for the full `config.scan_timeout_secs` so every board
    /// in range has a chance to advertise.
    pub async fn scan_all(&self) -> Result<Vec<SensorTagDevice>> {
        let adapter = first_adapter().await?;

        info!(
            "scan_all: scanning for {} s …",
            self.config.scan_timeout_secs
        );
        adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(Duration::from_secs(self.config.scan_timeout_secs)).await;
        adapter.stop_scan().await.ok();

        let mut found = vec![];
        for p in adapter.peripherals().await? {
            if let Ok(Some(props)) = p.properties().await {
                if let Some(name) = props.local_name {
                    if self.matches(&name) {
                        let id = p.id().to_string();
                        info!("scan_all: found {name}  id={id}");
                        found.push(SensorTagDevice {
                            name,
                            id,
                            peripheral: p,
                            adapter: adapter.clone(),
                        });
                    }
                }
            }
        }
        info!("scan_all: {} device(s) found", found.len());
        Ok(found)
    }

    // ── Public: connect_to ────────────────────────────────────────────────────

    /// Connect to a device returned by [`SensorTagClient::scan_all`].
    pub async fn connect_to(&self, device: SensorTagDevice) -> Result<SensorTag<BleTransport>> {
        self.setup_peripheral(device.peripheral, device.name, device.adapter)
            .await
    }

    // ── Public: connect (convenience) ────────────────────────────────────────

    /// Connect to the first SensorTag that shows up during the scan.
    pub async fn connect(&self) -> Result<SensorTag<BleTransport>> {
        let adapter = first_adapter().await?;

        info!(
            "Scanning for SensorTags (timeout: {} s) …",
            self.config.scan_timeout_secs
        );
        adapter.start_scan(ScanFilter::default()).await?;
        let found = self.find_first(&adapter).await;
        adapter.stop_scan().await.ok();
        let (peripheral, device_name) = found?;
        info!("Found device: {device_name}");

        self.setup_peripheral(peripheral, device_name, adapter)
            .await
    }

    // ── Private: setup_peripheral ─────────────────────────────────────────────

    /// Connect, discover services, start the notification pump and the
    /// disconnect watcher.
    async fn setup_peripheral(
        &self,
        peripheral: Peripheral,
        device_name: String,
        adapter: Adapter,
    ) -> Result<SensorTag<BleTransport>> {
        let connect_secs = self.config.connect_timeout_secs;
        tokio::time::timeout(Duration::from_secs(connect_secs), peripheral.connect())
            .await
            .map_err(|_| anyhow!("BLE connect() timed out after {connect_secs} s"))?
            .with_context(|| format!("connecting to {device_name}"))?;

        // BlueZ reports the connection before the remote GATT cache is
        // populated; discovering too early returns an empty set.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        let discover_secs = self.config.discover_timeout_secs;
        tokio::time::timeout(
            Duration::from_secs(discover_secs),
            peripheral.discover_services(),
        )
        .await
        .map_err(|_| anyhow!("discover_services() timed out after {discover_secs} s"))?
        .with_context(|| format!("discovering services on {device_name}"))?;

        let characteristics = peripheral.characteristics();
        info!(
            "Connected and services discovered: {device_name} ({} characteristics)",
            characteristics.len()
        );

        let (link_tx, _) = watch::channel(true);
        let link_tx = Arc::new(link_tx);
        let handlers: HandlerMap = Arc::new(Mutex::new(HashMap::new()));

        // ── Disconnect watcher ────────────────────────────────────────────────
        // DeviceDisconnected on the adapter usually fires before the
        // notification stream closes.
        let watcher_link = Arc::clone(&link_tx);
        let peripheral_id = peripheral.id();
        tokio::spawn(async move {
            match adapter.events().await {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        if let CentralEvent::DeviceDisconnected(id) = event {
                            if id == peripheral_id {
                                info!("Disconnect watcher: device {id:?} disconnected.");
                                watcher_link.send_replace(false);
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Disconnect watcher: could not subscribe to adapter events: {e}");
                }
            }
        });

        // ── Notification pump ─────────────────────────────────────────────────
        let mut notifications = peripheral
            .notifications()
            .await
            .context("opening notification stream")?;
        let pump_handlers = Arc::clone(&handlers);
        let pump_link = Arc::clone(&link_tx);
        let pump_name = device_name.clone();
        tokio::spawn(async move {
            let mut notif_count: u64 = 0;
            while let Some(notif) = notifications.next().await {
                notif_count += 1;
                if notif_count <= 3 || notif_count % 500 == 0 {
                    debug!(
                        "{pump_name}: notif #{notif_count} uuid={} len={}",
                        notif.uuid,
                        notif.value.len()
                    );
                }
                let handlers = lock_handlers(&pump_handlers);
                match handlers.get(&notif.uuid) {
                    Some(handler) => handler(notif.value.as_slice()),
                    None => debug!("{pump_name}: unrouted notification from {}", notif.uuid),
                }
            }
            info!("{pump_name}: notification stream ended, device disconnected.");
            pump_link.send_replace(false);
        });

        let transport = BleTransport {
            peripheral,
            name: device_name,
            characteristics,
            handlers,
            link: link_tx,
        };
        Ok(SensorTag::new(Arc::new(transport)))
    }

    // ── Private: find_first ───────────────────────────────────────────────────

    /// Poll until the first matching peripheral appears or the timeout expires.
    async fn find_first(&self, adapter: &Adapter) -> Result<(Peripheral, String)> {
        use tokio::time::{sleep, timeout};

        let timeout_secs = self.config.scan_timeout_secs;
        let result = timeout(Duration::from_secs(timeout_secs), async {
            loop {
                let peripherals = adapter.peripherals().await.unwrap_or_default();
                for p in peripherals {
                    if let Ok(Some(props)) = p.properties().await {
                        if let Some(name) = props.local_name {
                            if self.matches(&name) {
                                return (p, name);
                            }
                        }
                    }
                }
                sleep(Duration::from_millis(250)).await;
            }
        })
        .await;

        result.map_err(|_| anyhow!("Timed out scanning for a SensorTag after {timeout_secs} s"))
    }
}

/// First Bluetooth adapter on the system, ready to scan.
async fn first_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;

    #[cfg(target_os = "macos")]
    wait_powered_on(&adapter).await;

    Ok(adapter)
}

/// CBCentralManager starts in an "unknown" state and silently ignores scans
/// until it reports PoweredOn.
#[cfg(target_os = "macos")]
async fn wait_powered_on(adapter: &Adapter) {
    use btleplug::api::CentralState;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        match adapter.adapter_state().await {
            Ok(CentralState::PoweredOn) => {
                info!("macOS: adapter is PoweredOn");
                break;
            }
            Ok(state) => {
                if tokio::time::Instant::now() >= deadline {
                    warn!("macOS: adapter still in state {state:?} after 3 s, proceeding anyway");
                    break;
                }
                debug!("macOS: adapter state = {state:?}, waiting…");
            }
            Err(e) => {
                warn!("macOS: adapter_state() error: {e}");
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
}

// ── BleTransport ──────────────────────────────────────────────────────────────

/// [`Transport`] over a connected btleplug peripheral.
///
/// Notifications from every subscribed characteristic arrive on one stream
/// and are routed by UUID to the handler registered in
/// [`Transport::subscribe`], one at a time.
pub struct BleTransport {
    peripheral: Peripheral,
    name: String,
    characteristics: BTreeSet<Characteristic>,
    handlers: HandlerMap,
    link: Arc<watch::Sender<bool>>,
}

impl BleTransport {
    /// Advertised name of the connected device.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `false` once the link has dropped or [`BleTransport::disconnect`] ran.
    pub fn is_connected(&self) -> bool {
        *self.link.borrow()
    }

    /// Resolves when the link drops.
    pub async fn wait_disconnected(&self) {
        let mut link = self.link.subscribe();
        let _ = link.wait_for(|up| !*up).await;
    }

    pub async fn disconnect(&self) -> Result<(), TransportError> {
        lock_handlers(&self.handlers).clear();
        let result = self.peripheral.disconnect().await;
        self.link.send_replace(false);
        result?;
        info!("{}: disconnected", self.name);
        Ok(())
    }

    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::CharacteristicNotFound(uuid))
    }
}

impl Transport for BleTransport {
    async fn write_configuration(
        &self,
        characteristic: Uuid,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        let c = self.characteristic(characteristic)?;
        self.peripheral
            .write(c, bytes, WriteType::WithResponse)
            .await?;
        debug!("{}: wrote {bytes:02x?} to {characteristic}", self.name);
        Ok(())
    }

    async fn subscribe(
        &self,
        characteristic: Uuid,
        on_notify: NotificationHandler,
    ) -> Result<(), TransportError> {
        let c = self.characteristic(characteristic)?;
        // Routed before the CCCD write so the first notification is not lost.
        lock_handlers(&self.handlers).insert(characteristic, on_notify);
        if let Err(e) = self.peripheral.subscribe(c).await {
            lock_handlers(&self.handlers).remove(&characteristic);
            return Err(e.into());
        }
        debug!("{}: notifications on for {characteristic}", self.name);
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<(), TransportError> {
        let c = self.characteristic(characteristic)?;
        self.peripheral.unsubscribe(c).await?;
        lock_handlers(&self.handlers).remove(&characteristic);
        debug!("{}: notifications off for {characteristic}", self.name);
        Ok(())
    }
}

impl SensorTag<BleTransport> {
    /// End the session: unsubscribe every stream, then drop the BLE link.
    ///
    /// The link is dropped even when an unsubscribe fails; the first error
    /// is returned.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        let closed = self.close().await;
        self.transport().disconnect().await?;
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_accepts_both_advertised_names() {
        let client = SensorTagClient::new(SensorTagClientConfig::default());
        assert!(client.matches("CC2650 SensorTag"));
        assert!(client.matches("SensorTag 2.0"));
        assert_eq!(client.config().scan_timeout_secs, 15);
        assert_eq!(client.config().connect_timeout_secs, 10);
    }

    #[test]
    fn name_filter_is_exact() {
        let client = SensorTagClient::new(SensorTagClientConfig::default());
        assert!(!client.matches("CC2650 SensorTag 2"));
        assert!(!client.matches("SensorTag"));
        assert!(!client.matches("cc2650 sensortag"));
        assert!(!client.matches(""));
    }

    #[test]
    fn custom_name_filters_replace_defaults() {
        let client = SensorTagClient::new(SensorTagClientConfig {
            name_filters: vec!["Lab Tag".into()],
            ..SensorTagClientConfig::default()
        });
        assert!(client.matches("Lab Tag"));
        assert!(!client.matches("CC2650 SensorTag"));
    }
}
