//! Connection, correlation, and registry layer for VelocityDRIVE serial
//! devices: everything in `mup1-proto` wired to real serial I/O and a clock.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod connection;
pub mod device_info;
pub mod error;
pub mod event;
pub mod reassembler;
pub mod registry;
pub mod tracker;

pub use config::{ConnectionConfig, RegistryConfig};
pub use connection::{ConnectionHandle, ConnectionState};
pub use device_info::{Bridge, DeviceInfo, Interface};
pub use error::{FrameDropReason, RegistryError, RequestError};
pub use event::{DeviceEventSink, TracingEventSink};
pub use reassembler::{ReassemblyEvent, StreamReassembler};
pub use registry::{DevEnumerator, DeviceRegistry, EndpointEnumerator};
pub use tracker::{Begun, MessageIdAllocator, RequestTracker};
