//! NMEA ingestion and fan-out.
//!
//! ```text
//! correction client -> IngestServer -> LineFramer -> RecordPipeline
//!                                                      |-> NmeaWindow -> StorePublisher
//!                                                      '-> BroadcastHub -> subscribers
//! ```

pub mod cache;
pub mod framer;
pub mod hub;
pub mod ingest;
pub mod listener;
pub mod publisher;

pub use cache::NmeaWindow;
pub use framer::{FrameError, LineFramer};
pub use hub::{BroadcastHub, SubscriberId};
pub use ingest::{IngestError, IngestServer, RecordPipeline};
pub use listener::{ListenerError, SubscriberListener};
pub use publisher::StorePublisher;
