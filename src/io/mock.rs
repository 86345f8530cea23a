//! In-memory byte transport for channel and session tests.

use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::io::ByteTransport;
use crate::types::SensorDesc;

pub(crate) const KEY: &str = "mock";

type OnSend = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Records sent frames and optionally answers them synchronously through
/// a captured subscriber.
pub(crate) struct MockByteTransport {
    identifier: String,
    pub(crate) sent: Arc<Mutex<Vec<Vec<u8>>>>,
    on_send: Option<OnSend>,
    baud_rate: u32,
}

impl MockByteTransport {
    pub(crate) fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            sent: Arc::new(Mutex::new(Vec::new())),
            on_send: None,
            baud_rate: 921_600,
        }
    }

    pub(crate) fn with_on_send(mut self, on_send: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Box::new(on_send));
        self
    }

    /// Shares an external log for the sent frames, so a test can inspect
    /// traffic after the transport moved into the session.
    pub(crate) fn with_sent_log(mut self, log: Arc<Mutex<Vec<Vec<u8>>>>) -> Self {
        self.sent = log;
        self
    }
}

impl ByteTransport for MockByteTransport {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.sent.lock().unwrap().push(data.to_vec());
        if let Some(on_send) = &self.on_send {
            on_send(data);
        }
        Ok(())
    }

    fn baud_rate(&self) -> Result<u32> {
        Ok(self.baud_rate)
    }

    fn set_baud_rate(&mut self, rate: u32) -> Result<()> {
        self.baud_rate = rate;
        Ok(())
    }

    fn supported_baud_rates(&self) -> Vec<u32> {
        vec![self.baud_rate]
    }

    fn io_type(&self) -> &'static str {
        KEY
    }

    fn matches(&self, desc: &SensorDesc) -> bool {
        desc.io_type == KEY && desc.identifier == self.identifier
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
