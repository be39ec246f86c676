//! Configuration for device connections and the registry.

use std::time::Duration;

/// Tunables for a single [`crate::connection::ConnectionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Serial baud rate. The wire is always 8 data bits, no parity, 1 stop
    /// bit, no flow control.
    pub baud_rate: u32,
    /// Per-request timeout, from send to either a match or this deadline.
    pub request_timeout: Duration,
    /// Delay before the keepalive Ping is emitted after the link opens.
    pub ping_delay: Duration,
    /// Cap on the reassembler's scratch buffer before it resets.
    pub reassembler_max_bytes: usize,
    /// Bound on the command channel feeding the connection's actor task.
    pub command_channel_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            request_timeout: Duration::from_millis(15_000),
            ping_delay: Duration::from_millis(500),
            reassembler_max_bytes: 64 * 1024,
            command_channel_capacity: 32,
        }
    }
}

/// Tunables for [`crate::registry::DeviceRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Interval between automatic rescans.
    pub scan_interval: Duration,
    /// Configuration handed to every connection the registry opens.
    pub connection: ConnectionConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { scan_interval: Duration::from_millis(5_000), connection: ConnectionConfig::default() }
    }
}
