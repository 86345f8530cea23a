//! Transport abstraction: byte-oriented and event-oriented drivers behind a
//! common discovery/obtain contract.
//!
//! Byte-oriented transports deliver raw chunks to a [`DataSubscriber`]; the
//! framing channel reassembles frames. Event-oriented transports deliver
//! pre-parsed [`SensorEvent`]s directly.

#[cfg(test)]
pub(crate) mod mock;
pub mod network;
pub mod registry;
pub mod serial;
pub mod test_sensor;

use std::sync::Arc;

use crate::error::{Result, TransportError};
use crate::types::{SensorDesc, SensorEvent};

/// Receives raw bytes from a byte-oriented transport's reader task.
pub trait DataSubscriber: Send + Sync {
    /// Called with each received chunk, on the transport reader thread.
    fn process_data(&self, data: &[u8]);

    /// Called once if the reader task dies on an unexpected error. Not
    /// called on orderly close.
    fn link_down(&self, error: TransportError);
}

/// Receives parsed events from an event-oriented transport.
pub trait EventSubscriber: Send + Sync {
    /// Called with each received event, on the transport reader thread.
    fn process_event(&self, event: SensorEvent);

    /// Called once if the reader task dies on an unexpected error.
    fn link_down(&self, error: TransportError);
}

/// Both sinks a sensor offers when obtaining a transport; the driver uses
/// whichever matches its interface shape.
#[derive(Clone)]
pub struct Subscribers {
    pub data: Arc<dyn DataSubscriber>,
    pub events: Arc<dyn EventSubscriber>,
}

/// An open byte channel to a sensor.
pub trait ByteTransport: Send {
    /// Writes the whole slice to the device.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    fn baud_rate(&self) -> Result<u32>;

    fn set_baud_rate(&mut self, rate: u32) -> Result<()>;

    fn supported_baud_rates(&self) -> Vec<u32>;

    /// Registry key of the owning transport system.
    fn io_type(&self) -> &'static str;

    /// Whether this open channel is the one `desc` describes.
    fn matches(&self, desc: &SensorDesc) -> bool;

    /// Stops the reader task and releases the handle. After this returns no
    /// subscriber callback will run.
    fn close(&mut self) -> Result<()>;
}

/// An open event channel to a sensor (no local frame parsing).
pub trait EventTransport: Send {
    fn io_type(&self) -> &'static str;

    fn matches(&self, desc: &SensorDesc) -> bool;

    /// Stops the reader task. After this returns no subscriber callback
    /// will run.
    fn close(&mut self) -> Result<()>;
}

/// The two interface shapes a transport system can hand out.
pub enum TransportHandle {
    Bytes(Box<dyn ByteTransport>),
    Events(Box<dyn EventTransport>),
}

/// A factory for one kind of transport, registered under a short key.
pub trait TransportSystem: Send + Sync {
    /// Registry key; also the `io_type` of descriptors it produces.
    fn key(&self) -> &'static str;

    /// Whether the backing driver can be used in this process.
    fn available(&self) -> bool {
        true
    }

    /// Enumerates currently attached endpoints.
    fn discover(&self) -> Result<Vec<SensorDesc>>;

    /// Opens the endpoint `desc` describes, wiring received data into the
    /// matching subscriber.
    fn obtain(&self, desc: &SensorDesc, subscribers: &Subscribers) -> Result<TransportHandle>;
}
