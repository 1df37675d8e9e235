//! Runtime of the LPP correction relay.
//!
//! - [`nmea`]: ingestion socket, line framing, the record window and its
//!   store publisher, and TCP fan-out to subscribers.
//! - [`process`]: the correction client supervisor and the loop that
//!   restarts or hot-patches it as configuration changes.
//! - [`client`]: command lines for the supported client releases.

#![deny(unsafe_code)]

#[cfg(not(unix))]
compile_error!("lpp-relay-runtime requires a Unix platform");

pub mod client;
pub mod nmea;
pub mod process;

pub use client::{ClientCommandBuilder, ClientVersion, LaunchCommand};
pub use nmea::{
    BroadcastHub, IngestError, IngestServer, LineFramer, ListenerError, NmeaWindow,
    RecordPipeline, StorePublisher, SubscriberListener,
};
pub use process::{
    ChildControl, LAUNCH_FAILED, LoopState, ProcessState, ProcessSupervisor, ReconfigureLoop,
};
