//! Device Connection: one actor task per serial endpoint, owning the serial
//! handle, the Stream Reassembler, the CoAP codec, and the Request Tracker.
//!
//! Rearchitected from the callback-driven original as a per-connection task
//! that awaits the read stream and dispatches to the reassembler; requests
//! are submitted over a channel, so the pending map has a single writer.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use mup1_proto::{coap, mup1, CoapMethod, CoapPayload, DecodedFrame, MupType};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::{mpsc, oneshot, watch, Mutex},
};
use tokio_serial::{DataBits, FlowControl, Parity, SerialStream, StopBits};

use crate::{
    config::ConnectionConfig,
    device_info::DeviceInfo,
    error::RequestError,
    event::DeviceEventSink,
    reassembler::{ReassemblyEvent, StreamReassembler},
    tracker::RequestTracker,
};

/// Lifecycle state of a [`ConnectionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No serial handle; the initial and terminal state.
    Closed,
    /// Serial port is being opened.
    Opening,
    /// Serial handle live; `request()` and `queryDeviceInfo()` are valid.
    Open,
    /// Shutting down; draining pending requests.
    Closing,
}

/// Work submitted to a connection's actor task.
enum ConnectionCommand {
    Request {
        method: CoapMethod,
        uri: String,
        payload: Option<Vec<u8>>,
        reply: oneshot::Sender<Result<CoapPayload, RequestError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a live Device Connection.
///
/// Cloning shares the same actor task: every clone submits work over the
/// same command channel.
#[derive(Clone)]
pub struct ConnectionHandle {
    path: PathBuf,
    commands: mpsc::Sender<ConnectionCommand>,
    state: watch::Receiver<ConnectionState>,
    device_info: Arc<Mutex<DeviceInfo>>,
    config: ConnectionConfig,
}

impl ConnectionHandle {
    /// Open a serial connection and spawn its actor task.
    ///
    /// # Errors
    ///
    /// Propagates the underlying `tokio_serial` open failure.
    pub fn connect(
        path: PathBuf,
        config: ConnectionConfig,
        sink: Arc<dyn DeviceEventSink>,
    ) -> std::io::Result<Self> {
        let serial = tokio_serial::new(path.to_string_lossy(), config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(std::io::Error::from)?;

        let (command_tx, command_rx) = mpsc::channel(config.command_channel_capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Opening);
        let device_info = Arc::new(Mutex::new(DeviceInfo::new(path.clone(), config.baud_rate)));

        tokio::spawn(run_connection(
            path.clone(),
            config,
            serial,
            command_rx,
            state_tx,
            Arc::clone(&device_info),
            sink,
        ));

        Ok(Self { path, commands: command_tx, state: state_rx, device_info, config })
    }

    /// Serial device path this connection owns.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Latest known [`DeviceInfo`] snapshot.
    pub async fn device_info(&self) -> DeviceInfo {
        self.device_info.lock().await.clone()
    }

    /// Issue a CoAP request and await its response.
    ///
    /// Fails fast with [`RequestError::NotConnected`] when not Open.
    pub async fn request(
        &self,
        method: CoapMethod,
        uri: impl Into<String>,
        payload: Option<Vec<u8>>,
    ) -> Result<CoapPayload, RequestError> {
        if self.state() != ConnectionState::Open {
            return Err(RequestError::NotConnected);
        }

        let (reply, waiter) = oneshot::channel();
        self.commands
            .send(ConnectionCommand::Request { method, uri: uri.into(), payload, reply })
            .await
            .map_err(|_| RequestError::Disconnected)?;

        waiter.await.unwrap_or(Err(RequestError::Disconnected))
    }

    /// Issue `GET /c?d=a`, project the response into [`DeviceInfo`], and
    /// return the updated snapshot. Missing YANG keys leave existing fields
    /// unchanged.
    pub async fn query_device_info(&self) -> Result<DeviceInfo, RequestError> {
        let payload = self.request(CoapMethod::Get, "/c?d=a", None).await?;

        let mut info = self.device_info.lock().await;
        if let CoapPayload::Cbor(value) = &payload {
            info.apply_query_response(value, SystemTime::now());
        }
        info.connected = self.state() == ConnectionState::Open;
        Ok(info.clone())
    }

    /// Close the connection: rejects all pending waiters and releases the
    /// serial handle.
    pub async fn disconnect(&self) {
        let (reply, waiter) = oneshot::channel();
        if self.commands.send(ConnectionCommand::Disconnect { reply }).await.is_ok() {
            let _ = waiter.await;
        }
    }

    /// Configuration this connection was opened with.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_connection(
    path: PathBuf,
    config: ConnectionConfig,
    mut serial: SerialStream,
    mut commands: mpsc::Receiver<ConnectionCommand>,
    state_tx: watch::Sender<ConnectionState>,
    device_info: Arc<Mutex<DeviceInfo>>,
    sink: Arc<dyn DeviceEventSink>,
) {
    let _ = state_tx.send(ConnectionState::Open);
    {
        let mut info = device_info.lock().await;
        info.connected = true;
    }

    tokio::time::sleep(config.ping_delay).await;
    let ping = mup1::encode(MupType::Ping, &[]);
    if serial.write_all(&ping).await.is_err() {
        close(&state_tx, &device_info).await;
        return;
    }

    let mut reassembler = StreamReassembler::new(config.reassembler_max_bytes);
    let mut tracker = RequestTracker::new();
    let (timeout_tx, mut timeout_rx) = mpsc::channel::<u16>(config.command_channel_capacity);
    let mut read_buf = [0u8; 1024];

    loop {
        tokio::select! {
            read_result = serial.read(&mut read_buf) => {
                match read_result {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        for event in reassembler.push(&read_buf[..n]) {
                            dispatch_event(event, &path, &mut tracker, sink.as_ref());
                        }
                    },
                }
            },
            Some(command) = commands.recv() => {
                match command {
                    ConnectionCommand::Request { method, uri, payload, reply } => {
                        handle_request(
                            method, uri, payload, reply,
                            &mut serial, &mut tracker, &timeout_tx, config.request_timeout,
                        ).await;
                    },
                    ConnectionCommand::Disconnect { reply } => {
                        let _ = reply.send(());
                        break;
                    },
                }
            },
            Some(message_id) = timeout_rx.recv() => {
                tracker.on_timeout(message_id);
            },
        }
    }

    tracker.on_disconnect();
    close(&state_tx, &device_info).await;
}

async fn close(state_tx: &watch::Sender<ConnectionState>, device_info: &Arc<Mutex<DeviceInfo>>) {
    let _ = state_tx.send(ConnectionState::Closed);
    device_info.lock().await.connected = false;
}

async fn handle_request(
    method: CoapMethod,
    uri: String,
    payload: Option<Vec<u8>>,
    reply: oneshot::Sender<Result<CoapPayload, RequestError>>,
    serial: &mut SerialStream,
    tracker: &mut RequestTracker,
    timeout_tx: &mpsc::Sender<u16>,
    timeout: Duration,
) {
    let begun = tracker.begin(method, uri.clone(), Instant::now());
    let message_id = begun.message_id;
    let coap_bytes = coap::build(method, &uri, payload.as_deref(), message_id);
    let frame = mup1::encode(MupType::Coap, &coap_bytes);

    if serial.write_all(&frame).await.is_err() {
        tracker.cancel(message_id);
    }

    let timeout_tx = timeout_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = timeout_tx.send(message_id).await;
    });

    tokio::spawn(async move {
        if let Ok(result) = begun.waiter.await {
            let _ = reply.send(result);
        }
    });
}

/// Dispatch one reassembled frame (or drop) to its side channel or the
/// request tracker. Wrapped in [`std::panic::catch_unwind`] so a bug in a
/// single frame's handling logs and moves on rather than taking the whole
/// connection down.
fn dispatch_event(
    event: ReassemblyEvent,
    path: &Path,
    tracker: &mut RequestTracker,
    sink: &dyn DeviceEventSink,
) {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| match event {
        ReassemblyEvent::Dropped(reason) => sink.frame_dropped(path, reason),
        ReassemblyEvent::Frame(frame) => dispatch_frame(&frame, path, tracker, sink),
    }));

    if outcome.is_err() {
        tracing::error!(path = %path.display(), "panic while dispatching a reassembled frame");
    }
}

fn dispatch_frame(frame: &DecodedFrame, path: &Path, tracker: &mut RequestTracker, sink: &dyn DeviceEventSink) {
    match frame.mup_type() {
        Some(MupType::Coap) => match coap::parse(&frame.payload) {
            Ok(parsed) => {
                sink.coap_response(path, &parsed);
                if !tracker.on_response(&parsed) {
                    tracing::debug!(path = %path.display(), message_id = parsed.message_id, "unmatched coap response");
                }
            },
            Err(err) => tracing::warn!(path = %path.display(), %err, "malformed coap payload"),
        },
        Some(MupType::Announce) => sink.announcement(path, &String::from_utf8_lossy(&frame.payload)),
        Some(MupType::Trace) => sink.trace(path, &String::from_utf8_lossy(&frame.payload)),
        Some(MupType::Ping) => sink.pong(path),
        Some(MupType::System) => sink.system(path, &frame.payload),
        None => tracing::warn!(path = %path.display(), kind = frame.kind, "unknown mup1 frame type"),
    }
}
