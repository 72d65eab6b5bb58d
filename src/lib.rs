//! NVMe over Fabrics target registry
//!
//! This crate implements the coordinating core of an NVMe-oF target: it owns
//! the target configuration, the set of registered fabric transports, the
//! active listen addresses, and the cooperative polling entry point that
//! drives connection acceptance. Transport backends (RDMA, TCP, FC) plug in
//! through the [`Transport`] trait; capsule handling and actual fabric I/O
//! live in those backends, not here.

pub mod config;
pub mod target;
pub mod trace;
pub mod transport;

pub use config::{Config, ConfigError};
pub use target::{
    ListenAddr, Subsystem, Target, TargetError, TargetOpts, TargetResult, MAX_SUBSYSTEMS,
};
pub use trace::{IoTracePoint, LogRecorder, TraceEvent, TracePhase, TraceRecorder};
pub use transport::{
    AddressFamily, Transport, TransportError, TransportId, TransportResult, TransportType,
};
