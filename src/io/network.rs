//! Network publish/subscribe transport.
//!
//! An event-oriented interface: connects to a publisher endpoint
//! (`host:port`) and receives pre-parsed sensor events as newline-delimited
//! JSON. No frame parsing happens locally.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::io::{EventSubscriber, EventTransport, Subscribers, TransportHandle, TransportSystem};
use crate::types::{SensorDesc, SensorEvent};
use crate::util::ThreadFence;

pub const KEY: &str = "network";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct NetworkSystem;

impl NetworkSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NetworkSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportSystem for NetworkSystem {
    fn key(&self) -> &'static str {
        KEY
    }

    /// Network endpoints cannot be enumerated; callers construct a
    /// descriptor with [`SensorDesc::for_endpoint`].
    fn discover(&self) -> Result<Vec<SensorDesc>> {
        Ok(Vec::new())
    }

    fn obtain(&self, desc: &SensorDesc, subscribers: &Subscribers) -> Result<TransportHandle> {
        let transport = NetworkTransport::connect(desc, subscribers.events.clone())?;
        Ok(TransportHandle::Events(Box::new(transport)))
    }
}

pub struct NetworkTransport {
    identifier: String,
    fence: Arc<ThreadFence>,
    reader: Option<JoinHandle<()>>,
}

impl NetworkTransport {
    pub fn connect(desc: &SensorDesc, subscriber: Arc<dyn EventSubscriber>) -> Result<Self> {
        let open_failed = |source: std::io::Error| TransportError::OpenFailed {
            target: desc.identifier.clone(),
            source,
        };

        let addr = desc
            .identifier
            .to_socket_addrs()
            .map_err(open_failed)?
            .next()
            .ok_or_else(|| {
                open_failed(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "endpoint did not resolve",
                ))
            })?;

        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(open_failed)?;
        stream.set_read_timeout(Some(READ_TIMEOUT)).map_err(open_failed)?;

        let fence = Arc::new(ThreadFence::new());
        let reader = {
            let fence = fence.clone();
            let identifier = desc.identifier.clone();
            std::thread::spawn(move || read_loop(stream, subscriber, fence, identifier))
        };

        info!(endpoint = %desc.identifier, "subscribed to network event stream");
        Ok(Self {
            identifier: desc.identifier.clone(),
            fence,
            reader: Some(reader),
        })
    }
}

fn read_loop(
    mut stream: TcpStream,
    subscriber: Arc<dyn EventSubscriber>,
    fence: Arc<ThreadFence>,
    identifier: String,
) {
    let mut pending = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        if fence.terminated() {
            break;
        }
        match stream.read(&mut buf) {
            Ok(0) => {
                if !fence.terminated() {
                    warn!(endpoint = %identifier, "event publisher closed the connection");
                    subscriber.link_down(TransportError::ReadFailed(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "publisher closed connection",
                    )));
                }
                break;
            }
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                dispatch_lines(&mut pending, subscriber.as_ref());
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::Interrupted =>
            {
                continue
            }
            Err(e) => {
                if !fence.terminated() {
                    subscriber.link_down(TransportError::ReadFailed(e));
                }
                break;
            }
        }
    }
    debug!(endpoint = %identifier, "network reader stopped");
}

fn dispatch_lines(pending: &mut Vec<u8>, subscriber: &dyn EventSubscriber) {
    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = pending.drain(..=pos).collect();
        let line = &line[..line.len() - 1];
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<SensorEvent>(line) {
            Ok(event) => subscriber.process_event(event),
            Err(e) => warn!(error = %e, "dropping undecodable event message"),
        }
    }
}

impl EventTransport for NetworkTransport {
    fn io_type(&self) -> &'static str {
        KEY
    }

    fn matches(&self, desc: &SensorDesc) -> bool {
        desc.io_type == KEY && desc.identifier == self.identifier
    }

    fn close(&mut self) -> Result<()> {
        self.fence.terminate();
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl Drop for NetworkTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
