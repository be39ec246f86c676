//! Device Registry: the process-wide mapping from serial path to Device
//! Connection. Owns periodic rescan and the connect/disconnect lifecycle.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use mup1_proto::{CoapMethod, CoapPayload};
use tokio::sync::Mutex;

use crate::{
    config::RegistryConfig,
    connection::ConnectionHandle,
    device_info::DeviceInfo,
    error::RegistryError,
    event::{DeviceEventSink, TracingEventSink},
};

/// Lists candidate serial device paths. Pluggable so tests and non-Linux
/// hosts can substitute a fixed list.
pub trait EndpointEnumerator: Send + Sync {
    /// Enumerate current candidate paths, in a stable order.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures listing the device directory.
    fn enumerate(&self) -> std::io::Result<Vec<PathBuf>>;
}

/// Default enumerator: lists `/dev/ttyACM*` and `/dev/ttyUSB*`, sorted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevEnumerator;

impl EndpointEnumerator for DevEnumerator {
    fn enumerate(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir("/dev")? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("ttyACM") || name.starts_with("ttyUSB") {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Process-wide mapping from serial path to live [`ConnectionHandle`].
///
/// The map is guarded by a `tokio::sync::Mutex` with short critical
/// sections: lookup-then-dispatch into the per-connection actor, never a
/// cross-device hold.
pub struct DeviceRegistry {
    config: RegistryConfig,
    enumerator: Arc<dyn EndpointEnumerator>,
    sink: Arc<dyn DeviceEventSink>,
    connections: Mutex<HashMap<PathBuf, ConnectionHandle>>,
    auto_scan: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl DeviceRegistry {
    /// Create a registry with the default `/dev/ttyACM*`/`/dev/ttyUSB*`
    /// enumerator and a tracing-backed event sink.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_components(config, Arc::new(DevEnumerator), Arc::new(TracingEventSink))
    }

    /// Create a registry with a pluggable enumerator and event sink.
    #[must_use]
    pub fn with_components(
        config: RegistryConfig,
        enumerator: Arc<dyn EndpointEnumerator>,
        sink: Arc<dyn DeviceEventSink>,
    ) -> Self {
        Self {
            config,
            enumerator,
            sink,
            connections: Mutex::new(HashMap::new()),
            auto_scan: Mutex::new(None),
        }
    }

    /// Enumerate endpoints; connect every new path, disconnect every known
    /// path no longer listed. Idempotent: a membership check guards each
    /// insert, so concurrent scans never duplicate a connection.
    ///
    /// # Errors
    ///
    /// Propagates the enumerator's I/O failure.
    pub async fn scan(&self) -> Result<(), RegistryError> {
        let seen: Vec<PathBuf> = self.enumerator.enumerate()?;
        let seen_set: std::collections::HashSet<&PathBuf> = seen.iter().collect();

        let stale: Vec<PathBuf> = {
            let connections = self.connections.lock().await;
            connections.keys().filter(|path| !seen_set.contains(path)).cloned().collect()
        };
        for path in stale {
            self.disconnect(&path).await;
        }

        for path in seen {
            let already_connected = self.connections.lock().await.contains_key(&path);
            if !already_connected {
                if let Err(err) = self.connect(path.clone(), self.config.connection.baud_rate).await {
                    tracing::warn!(path = %path.display(), %err, "failed to connect during scan");
                }
            }
        }

        Ok(())
    }

    /// Open a connection for `path` at `baud_rate`, registering it under the
    /// registry's membership map.
    ///
    /// # Errors
    ///
    /// Propagates the underlying serial open failure.
    pub async fn connect(&self, path: PathBuf, baud_rate: u32) -> Result<(), RegistryError> {
        let mut config = self.config.connection;
        config.baud_rate = baud_rate;

        let mut connections = self.connections.lock().await;
        if connections.contains_key(&path) {
            return Ok(());
        }

        let handle = ConnectionHandle::connect(path.clone(), config, Arc::clone(&self.sink))?;
        connections.insert(path, handle);
        Ok(())
    }

    /// Disconnect and remove `path`, if present. Every outstanding waiter on
    /// that connection rejects with [`RequestError::Disconnected`].
    pub async fn disconnect(&self, path: &Path) {
        let handle = self.connections.lock().await.remove(path);
        if let Some(handle) = handle {
            handle.disconnect().await;
        }
    }

    /// Latest [`DeviceInfo`] snapshot for `path`, if connected.
    pub async fn get(&self, path: &Path) -> Option<DeviceInfo> {
        let handle = self.connections.lock().await.get(path).cloned();
        match handle {
            Some(handle) => Some(handle.device_info().await),
            None => None,
        }
    }

    /// The raw [`ConnectionHandle`] for `path`, if connected. Lets callers
    /// reach handle-only operations such as `queryDeviceInfo()` directly.
    pub async fn handle(&self, path: &Path) -> Option<ConnectionHandle> {
        self.connections.lock().await.get(path).cloned()
    }

    /// Snapshot of every currently registered device.
    pub async fn all(&self) -> Vec<DeviceInfo> {
        let handles: Vec<ConnectionHandle> = self.connections.lock().await.values().cloned().collect();
        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            infos.push(handle.device_info().await);
        }
        infos
    }

    /// Execute a request against `path`'s connection.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DeviceNotFound`] if `path` has no connection;
    /// otherwise whatever [`ConnectionHandle::request`] returns.
    pub async fn execute(
        &self,
        path: &Path,
        method: CoapMethod,
        uri: &str,
        payload: Option<Vec<u8>>,
    ) -> Result<CoapPayload, RegistryError> {
        let handle = self
            .connections
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| RegistryError::DeviceNotFound(path.to_path_buf()))?;

        handle.request(method, uri.to_string(), payload).await.map_err(RegistryError::Request)
    }

    /// Cancel any prior periodic scan, run one scan immediately, then
    /// schedule scans every `interval` (the registry's configured
    /// `scan_interval` by default).
    pub async fn start_auto_scan(self: &Arc<Self>) {
        self.stop_auto_scan().await;

        if let Err(err) = self.scan().await {
            tracing::warn!(%err, "initial scan failed");
        }

        let registry = Arc::clone(self);
        let interval = self.config.scan_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; already scanned above
            loop {
                ticker.tick().await;
                if let Err(err) = registry.scan().await {
                    tracing::warn!(%err, "periodic scan failed");
                }
            }
        });

        *self.auto_scan.lock().await = Some(handle);
    }

    /// Stop the periodic scanner, if running.
    pub async fn stop_auto_scan(&self) {
        if let Some(handle) = self.auto_scan.lock().await.take() {
            handle.abort();
        }
    }

    /// Stop the scanner and disconnect every device, ensuring every
    /// outstanding waiter rejects and every serial handle closes.
    pub async fn shutdown(&self) {
        self.stop_auto_scan().await;

        let paths: Vec<PathBuf> = self.connections.lock().await.keys().cloned().collect();
        for path in paths {
            self.disconnect(&path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[derive(Default)]
    struct FixedEnumerator {
        paths: StdMutex<Vec<PathBuf>>,
    }

    impl EndpointEnumerator for FixedEnumerator {
        fn enumerate(&self) -> std::io::Result<Vec<PathBuf>> {
            Ok(self.paths.lock().expect("lock not poisoned").clone())
        }
    }

    #[tokio::test]
    async fn get_and_all_are_empty_before_any_connect() {
        let registry = DeviceRegistry::with_components(
            RegistryConfig::default(),
            Arc::new(FixedEnumerator::default()),
            Arc::new(TracingEventSink),
        );

        assert!(registry.get(Path::new("/dev/ttyACM0")).await.is_none());
        assert!(registry.all().await.is_empty());
    }

    #[tokio::test]
    async fn execute_reports_device_not_found() {
        let registry = DeviceRegistry::with_components(
            RegistryConfig::default(),
            Arc::new(FixedEnumerator::default()),
            Arc::new(TracingEventSink),
        );

        let err = registry
            .execute(Path::new("/dev/ttyACM0"), CoapMethod::Get, "/c?d=a", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::DeviceNotFound(path) if path == Path::new("/dev/ttyACM0")));
    }
}
